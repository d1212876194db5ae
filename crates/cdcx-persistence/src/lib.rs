//! Persistence for cdcx-arb.
//!
//! - [`JsonFileStore`]: pretty-printed JSON documents in the data directory
//! - [`Artifacts`]: typed load/save of pairs, opportunities, depth analyses and execution logs
//! - [`FileRateStore`]: rate cache backed by `exchange_rates.json`
//! - [`AttemptJournal`]: append-only JSON Lines record of every finished attempt

pub mod artifact;
pub mod error;
pub mod journal;
pub mod rate_file;

pub use artifact::{ArtifactKind, ArtifactStore, Artifacts, DynArtifactStore, JsonFileStore};
pub use error::{PersistenceError, PersistenceResult};
pub use journal::{read_journal, AttemptJournal, JournalRecord};
pub use rate_file::FileRateStore;
