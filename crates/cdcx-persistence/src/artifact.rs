//! Artifact documents exchanged between CLI stages.
//!
//! `pairs` writes candidate groups, `detect` reads them and writes
//! opportunities, `depth` and `execute` read opportunities. Each stage's
//! output is one pretty-printed JSON document in the data directory.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use cdcx_core::{ArbitrageOpportunity, CandidateGroup, ExecutionResult};
use cdcx_detector::DepthAnalysis;

use crate::error::{PersistenceError, PersistenceResult};

/// Well-known documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Pairs,
    Opportunities,
    DepthAnalysis,
}

impl ArtifactKind {
    pub fn file_name(&self) -> &'static str {
        match self {
            Self::Pairs => "arbitrage_pairs.json",
            Self::Opportunities => "arbitrage_opportunities.json",
            Self::DepthAnalysis => "depth_analysis.json",
        }
    }
}

/// Opaque document store keyed by file name.
pub trait ArtifactStore: Send + Sync {
    fn save(&self, id: &str, document: &Value) -> PersistenceResult<()>;

    /// `None` if no document with this id exists.
    fn load(&self, id: &str) -> PersistenceResult<Option<Value>>;
}

pub type DynArtifactStore = Arc<dyn ArtifactStore>;

/// Documents as files in one directory.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    data_dir: PathBuf,
}

impl JsonFileStore {
    /// Create the store, creating `data_dir` if needed.
    pub fn new(data_dir: impl AsRef<Path>) -> PersistenceResult<Self> {
        let data_dir = data_dir.as_ref().to_path_buf();
        fs::create_dir_all(&data_dir)?;
        Ok(Self { data_dir })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn path_of(&self, id: &str) -> PathBuf {
        self.data_dir.join(id)
    }
}

impl ArtifactStore for JsonFileStore {
    /// Written to a temporary file first, then renamed over the target.
    fn save(&self, id: &str, document: &Value) -> PersistenceResult<()> {
        let path = self.path_of(id);
        let tmp = self.path_of(&format!(".{id}.tmp"));
        fs::write(&tmp, serde_json::to_string_pretty(document)?)?;
        fs::rename(&tmp, &path)?;
        debug!(path = %path.display(), "Artifact saved");
        Ok(())
    }

    fn load(&self, id: &str) -> PersistenceResult<Option<Value>> {
        let path = self.path_of(id);
        match fs::read_to_string(&path) {
            Ok(text) => Ok(Some(serde_json::from_str(&text)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// Typed access to the documents of each stage.
#[derive(Clone)]
pub struct Artifacts {
    store: DynArtifactStore,
}

impl Artifacts {
    pub fn new(store: DynArtifactStore) -> Self {
        Self { store }
    }

    fn save_as<T: Serialize + ?Sized>(&self, id: &str, value: &T) -> PersistenceResult<()> {
        self.store.save(id, &serde_json::to_value(value)?)
    }

    fn load_as<T: DeserializeOwned>(&self, id: &str) -> PersistenceResult<T> {
        let document = self
            .store
            .load(id)?
            .ok_or_else(|| PersistenceError::NotFound(id.to_string()))?;
        Ok(serde_json::from_value(document)?)
    }

    pub fn save_pairs(&self, groups: &[CandidateGroup]) -> PersistenceResult<()> {
        self.save_as(ArtifactKind::Pairs.file_name(), groups)?;
        info!(groups = groups.len(), "Saved candidate groups");
        Ok(())
    }

    pub fn load_pairs(&self) -> PersistenceResult<Vec<CandidateGroup>> {
        self.load_as(ArtifactKind::Pairs.file_name())
    }

    pub fn save_opportunities(&self, opportunities: &[ArbitrageOpportunity]) -> PersistenceResult<()> {
        self.save_as(ArtifactKind::Opportunities.file_name(), opportunities)?;
        info!(opportunities = opportunities.len(), "Saved opportunities");
        Ok(())
    }

    pub fn load_opportunities(&self) -> PersistenceResult<Vec<ArbitrageOpportunity>> {
        self.load_as(ArtifactKind::Opportunities.file_name())
    }

    pub fn save_depth(&self, analyses: &[DepthAnalysis]) -> PersistenceResult<()> {
        self.save_as(ArtifactKind::DepthAnalysis.file_name(), analyses)?;
        info!(analyses = analyses.len(), "Saved depth analyses");
        Ok(())
    }

    pub fn load_depth(&self) -> PersistenceResult<Vec<DepthAnalysis>> {
        self.load_as(ArtifactKind::DepthAnalysis.file_name())
    }

    /// Save a run result as `execution_log_{label}_{unix}.json`. Returns the id.
    pub fn save_execution_log(
        &self,
        label: &str,
        result: &ExecutionResult,
        at: DateTime<Utc>,
    ) -> PersistenceResult<String> {
        let id = format!("execution_log_{}_{}.json", label, at.timestamp());
        self.save_as(&id, result)?;
        info!(%id, attempts = result.attempts.len(), "Saved execution log");
        Ok(id)
    }

    pub fn load_execution_log(&self, id: &str) -> PersistenceResult<ExecutionResult> {
        self.load_as(id)
    }
}
