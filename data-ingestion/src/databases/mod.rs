pub mod signals;

pub use signals::{SqliteSignalStore, StoredSignal};
