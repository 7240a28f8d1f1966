// Confidence Scoring
// Additive 0-100 conviction score for a single green candidate

use anyhow::bail;
use common::NewsEvidence;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::anomaly::CandidateVerdict;

pub const MAX_SCORE: u32 = 100;

/// Scored candidate with an audit trail of the rules that fired, in evaluation order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfidenceResult {
    pub score: u8,
    pub reasons: Vec<String>,
}

impl ConfidenceResult {
    fn no_anomaly() -> Self {
        Self {
            score: 0,
            reasons: vec!["No anomaly detected".to_string()],
        }
    }
}

/// Rule table: thresholds (percent / ratio) and the points each band adds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfidenceRules {
    pub strong_green_pct: f64,
    pub moderate_green_pct: f64,
    pub strong_green_points: u32,
    pub moderate_green_points: u32,
    pub weak_green_points: u32,

    pub strong_red_pct: f64,
    pub moderate_red_pct: f64,
    pub strong_red_points: u32,
    pub moderate_red_points: u32,

    pub news_points: u32,

    /// Green share below this is a strong anomaly
    pub strong_ratio: f64,
    /// Green share below this (and at least `strong_ratio`) is moderate
    pub moderate_ratio: f64,
    pub strong_ratio_points: u32,
    pub moderate_ratio_points: u32,
}

impl Default for ConfidenceRules {
    fn default() -> Self {
        Self {
            strong_green_pct: 2.0,
            moderate_green_pct: 1.0,
            strong_green_points: 25,
            moderate_green_points: 15,
            weak_green_points: 5,

            strong_red_pct: 2.0,
            moderate_red_pct: 1.0,
            strong_red_points: 20,
            moderate_red_points: 15,

            news_points: 15,

            strong_ratio: 0.2,
            moderate_ratio: 0.3,
            strong_ratio_points: 20,
            moderate_ratio_points: 10,
        }
    }
}

impl ConfidenceRules {
    /// Every band must fit inside the score range on its own
    pub fn validate(&self) -> anyhow::Result<()> {
        let bands = [
            ("strong_green_points", self.strong_green_points),
            ("moderate_green_points", self.moderate_green_points),
            ("weak_green_points", self.weak_green_points),
            ("strong_red_points", self.strong_red_points),
            ("moderate_red_points", self.moderate_red_points),
            ("news_points", self.news_points),
            ("strong_ratio_points", self.strong_ratio_points),
            ("moderate_ratio_points", self.moderate_ratio_points),
        ];
        for (name, points) in bands {
            if points > MAX_SCORE {
                bail!("{} must be at most {}, got {}", name, MAX_SCORE, points);
            }
        }
        Ok(())
    }
}

/// Evaluates [`ConfidenceRules`] against a narrowed verdict
#[derive(Debug, Clone, Default)]
pub struct ConfidenceScorer {
    rules: ConfidenceRules,
}

impl ConfidenceScorer {
    pub fn new(rules: ConfidenceRules) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &ConfidenceRules {
        &self.rules
    }

    /// Score one candidate; never fails, a non-anomaly scores 0
    pub fn score(&self, verdict: &CandidateVerdict, news: Option<&NewsEvidence>) -> ConfidenceResult {
        if !verdict.is_anomaly {
            return ConfidenceResult::no_anomaly();
        }

        let rules = &self.rules;
        let mut points = 0u32;
        let mut reasons = Vec::new();

        // Factor 1: candidate's own strength
        let green = verdict.candidate.change_pct;
        if green > rules.strong_green_pct {
            points = points.saturating_add(rules.strong_green_points);
            reasons.push(format!("Strong green performance (+{:.2}%)", green));
        } else if green > rules.moderate_green_pct {
            points = points.saturating_add(rules.moderate_green_points);
            reasons.push(format!("Moderate green performance (+{:.2}%)", green));
        } else {
            points = points.saturating_add(rules.weak_green_points);
            reasons.push(format!("Weak green performance (+{:.2}%)", green));
        }

        // Factor 2: how hard the rest of the market is selling
        let red = verdict.red_intensity();
        if red > rules.strong_red_pct {
            points = points.saturating_add(rules.strong_red_points);
            reasons.push(format!("Strong red market intensity (-{:.2}%)", red));
        } else if red > rules.moderate_red_pct {
            points = points.saturating_add(rules.moderate_red_points);
            reasons.push(format!("Moderate red market intensity (-{:.2}%)", red));
        }

        // Factor 3: news coverage
        if let Some(evidence) = news.filter(|n| n.article_count > 0) {
            points = points.saturating_add(rules.news_points);
            reasons.push(format!(
                "Positive news coverage ({} articles)",
                evidence.article_count
            ));
        }

        // Factor 4: how much of a minority the green bucket is
        let ratio = verdict.green_ratio();
        if ratio < rules.strong_ratio {
            points = points.saturating_add(rules.strong_ratio_points);
            reasons.push(format!(
                "Strong anomaly ratio ({}/{} green, {:.2})",
                verdict.green_count, verdict.total_assets, ratio
            ));
        } else if ratio < rules.moderate_ratio {
            points = points.saturating_add(rules.moderate_ratio_points);
            reasons.push(format!(
                "Moderate anomaly ratio ({}/{} green, {:.2})",
                verdict.green_count, verdict.total_assets, ratio
            ));
        }

        let score = points.min(MAX_SCORE) as u8;

        debug!(
            asset = %verdict.candidate.asset_id,
            score,
            green,
            red_intensity = red,
            ratio,
            "Candidate scored"
        );

        ConfidenceResult { score, reasons }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::Candidate;
    use proptest::prelude::*;

    fn candidate(asset: &str, change: f64) -> Candidate {
        Candidate {
            asset_id: asset.to_string(),
            change_pct: change,
            price: 100.0,
        }
    }

    fn verdict(green: f64, reds: &[f64], green_count: usize, total: usize) -> CandidateVerdict {
        CandidateVerdict {
            candidate: candidate("A", green),
            is_anomaly: true,
            green_count,
            red: reds
                .iter()
                .enumerate()
                .map(|(i, c)| candidate(&format!("R{i}"), *c))
                .collect(),
            total_assets: total,
        }
    }

    #[test]
    fn test_reference_scenario_breakdown() {
        // A +3.0 against B -2.0, C -1.5, D -1.2
        let v = verdict(3.0, &[-2.0, -1.5, -1.2], 1, 4);
        let result = ConfidenceScorer::default().score(&v, None);

        // 25 (green > 2%) + 15 (red 1.57% in (1, 2]) + 10 (ratio 0.25)
        assert_eq!(result.score, 50);
        assert_eq!(
            result.reasons,
            vec![
                "Strong green performance (+3.00%)".to_string(),
                "Moderate red market intensity (-1.57%)".to_string(),
                "Moderate anomaly ratio (1/4 green, 0.25)".to_string(),
            ]
        );
    }

    #[test]
    fn test_not_anomaly_fails_closed() {
        let mut v = verdict(3.0, &[-2.0, -2.0, -2.0], 1, 10);
        v.is_anomaly = false;

        let result = ConfidenceScorer::default().score(&v, Some(&NewsEvidence { article_count: 9 }));
        assert_eq!(result.score, 0);
        assert_eq!(result.reasons, vec!["No anomaly detected".to_string()]);
    }

    #[test]
    fn test_maximum_default_score() {
        let v = verdict(5.0, &[-3.0, -4.0, -5.0], 1, 10);
        let result = ConfidenceScorer::default().score(&v, Some(&NewsEvidence { article_count: 3 }));

        assert_eq!(result.score, 80);
        assert_eq!(result.reasons.len(), 4);
        assert_eq!(result.reasons[2], "Positive news coverage (3 articles)");
        assert_eq!(result.reasons[3], "Strong anomaly ratio (1/10 green, 0.10)");
    }

    #[test]
    fn test_band_edges() {
        let scorer = ConfidenceScorer::default();

        // exactly 2.0 green is moderate, exactly 1.0 is weak
        let r = scorer.score(&verdict(2.0, &[-1.0, -1.0, -1.0], 1, 3), None);
        assert_eq!(r.reasons[0], "Moderate green performance (+2.00%)");
        let r = scorer.score(&verdict(1.0, &[-1.0, -1.0, -1.0], 1, 3), None);
        assert_eq!(r.reasons[0], "Weak green performance (+1.00%)");

        // red intensity of exactly 1.0 adds nothing, ratio 1/3 adds nothing
        assert_eq!(r.score, 5);
        assert_eq!(r.reasons.len(), 1);
    }

    #[test]
    fn test_zero_articles_is_no_evidence() {
        let scorer = ConfidenceScorer::default();
        let v = verdict(3.0, &[-2.0, -1.5, -1.2], 1, 4);

        assert_eq!(
            scorer.score(&v, Some(&NewsEvidence { article_count: 0 })),
            scorer.score(&v, None)
        );
    }

    #[test]
    fn test_score_is_clamped() {
        let rules = ConfidenceRules {
            strong_green_points: 60,
            strong_red_points: 60,
            ..Default::default()
        };
        let v = verdict(5.0, &[-3.0, -4.0, -5.0], 1, 10);
        let result = ConfidenceScorer::new(rules).score(&v, None);

        assert_eq!(result.score, 100);
        assert_eq!(result.reasons.len(), 3);
    }

    #[test]
    fn test_oversized_points_saturate_instead_of_overflowing() {
        let rules = ConfidenceRules {
            strong_green_points: u32::MAX,
            strong_red_points: 10,
            ..Default::default()
        };
        assert!(rules.validate().is_err());

        let v = verdict(5.0, &[-3.0, -3.0, -3.0], 1, 10);
        let result = ConfidenceScorer::new(rules).score(&v, Some(&NewsEvidence { article_count: 2 }));
        assert_eq!(result.score, 100);
        assert_eq!(result.reasons.len(), 4);
    }

    #[test]
    fn test_default_rules_are_valid() {
        assert!(ConfidenceRules::default().validate().is_ok());
    }

    #[test]
    fn test_scoring_is_repeatable() {
        let scorer = ConfidenceScorer::default();
        let v = verdict(3.0, &[-2.0, -1.5, -1.2], 1, 4);
        let news = NewsEvidence { article_count: 4 };

        let first = scorer.score(&v, Some(&news));
        let second = scorer.score(&v, Some(&news));
        assert_eq!(first, second);
        assert_eq!(first.reasons, second.reasons);
    }

    proptest! {
        #[test]
        fn prop_monotonic_in_green_strength(a in 0.5f64..10.0, b in 0.5f64..10.0, red in 1.0f64..6.0) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            let scorer = ConfidenceScorer::default();
            let reds = [-red, -red, -red];

            let low = scorer.score(&verdict(lo, &reds, 1, 6), None);
            let high = scorer.score(&verdict(hi, &reds, 1, 6), None);
            prop_assert!(low.score <= high.score);
            prop_assert!(high.score <= 100);
        }

        #[test]
        fn prop_monotonic_in_red_intensity(a in 1.0f64..8.0, b in 1.0f64..8.0, green in 0.5f64..5.0) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            let scorer = ConfidenceScorer::default();

            let low = scorer.score(&verdict(green, &[-lo, -lo, -lo], 1, 5), None);
            let high = scorer.score(&verdict(green, &[-hi, -hi, -hi], 1, 5), None);
            prop_assert!(low.score <= high.score);
        }

        #[test]
        fn prop_news_never_lowers_score(green in 0.5f64..5.0, red in 1.0f64..5.0, articles in 0u32..50) {
            let scorer = ConfidenceScorer::default();
            let v = verdict(green, &[-red, -red, -red], 2, 8);

            let without = scorer.score(&v, None);
            let with = scorer.score(&v, Some(&NewsEvidence { article_count: articles }));
            prop_assert!(without.score <= with.score);
            prop_assert!(with.score <= 100);
        }
    }
}
