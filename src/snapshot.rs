//! The compiled output (spec §3 "Compilation result", §4.12). A [`Snapshot`]
//! is the fully-resolved data tree plus the metadata needed to audit how it
//! was produced; a [`CompilationResult`] wraps it with the diagnostics
//! accumulated along the way.

use std::path::PathBuf;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::diagnostic::Diagnostic;
use crate::merge::ProvenanceMap;
use crate::value::Map;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Snapshot {
    pub data: Map,
    pub metadata: Metadata,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Metadata {
    pub input_files: Vec<PathBuf>,
    pub provider_aliases: Vec<String>,
    #[serde(with = "humantime_serde_compat")]
    pub started_at: SystemTime,
    #[serde(with = "humantime_serde_compat")]
    pub ended_at: SystemTime,
    pub provenance: ProvenanceMap,
    /// Rendered error/warning messages (spec §3: "error strings, warning
    /// strings"), a flat summary alongside the structured diagnostics on
    /// [`CompilationResult`] for consumers that only want text.
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

/// [`SystemTime`] doesn't implement [`Serialize`]/[`Deserialize`] directly;
/// this mirrors it through Unix-epoch seconds rather than pulling in a whole
/// extra crate for two fields.
mod humantime_serde_compat {
    use std::time::{Duration, SystemTime, UNIX_EPOCH};

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(time: &SystemTime, serializer: S) -> Result<S::Ok, S::Error> {
        let secs = time.duration_since(UNIX_EPOCH).unwrap_or_default().as_secs_f64();
        secs.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<SystemTime, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Ok(UNIX_EPOCH + Duration::from_secs_f64(secs))
    }
}

/// The outcome of one `compile` call (spec §4.12). `snapshot.data` reflects
/// best-effort partial resolution even when `errors` is non-empty, so a
/// caller can inspect what *did* resolve.
#[derive(Clone, Debug)]
pub struct CompilationResult {
    pub snapshot: Snapshot,
    pub errors: Vec<Diagnostic>,
    pub warnings: Vec<Diagnostic>,
}

impl CompilationResult {
    pub fn has_errors(&self) -> bool {
        self.errors.iter().any(Diagnostic::is_error)
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    pub fn all_diagnostics(&self) -> Vec<Diagnostic> {
        self.errors.iter().chain(self.warnings.iter()).cloned().collect()
    }
}
