//! Messages exchanged with a background sync worker.
//!
//! Every message crosses the boundary as a self-contained CBOR frame; the
//! worker and the caller share no in-memory state.
//!
//! | direction       | message    |
//! |-----------------|------------|
//! | caller → worker | `start`, `stop` |
//! | worker → caller | `progress`, `complete`, `error` |

use crate::config::SyncRunConfig;
use crate::engine::SyncProgress;
use pcache_core::{CacheError, CacheResult};
use serde::{Deserialize, Serialize};

/// A worker protocol message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerMessage {
    /// Begin a run with the given configuration.
    Start {
        /// Run parameters.
        config: SyncRunConfig,
    },
    /// Cumulative progress.
    Progress {
        /// Records committed so far.
        progress: u64,
        /// Equal to `progress`.
        total: u64,
        /// True only on the final report.
        #[serde(rename = "isComplete")]
        is_complete: bool,
    },
    /// The run finished successfully.
    Complete {
        /// Epoch milliseconds of completion.
        #[serde(rename = "lastSync")]
        last_sync: i64,
    },
    /// The run failed.
    Error {
        /// Human-readable failure.
        message: String,
        /// Set when the run ended because cancellation was requested.
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        aborted: bool,
    },
    /// Request cancellation.
    Stop,
}

impl WorkerMessage {
    /// Encodes to a CBOR frame.
    pub fn encode(&self) -> CacheResult<Vec<u8>> {
        let mut frame = Vec::new();
        ciborium::into_writer(self, &mut frame)
            .map_err(|e| CacheError::Protocol(format!("failed to encode {}: {e}", self.name())))?;
        Ok(frame)
    }

    /// Decodes a CBOR frame.
    pub fn decode(frame: &[u8]) -> CacheResult<Self> {
        ciborium::from_reader(frame)
            .map_err(|e| CacheError::Protocol(format!("undecodable worker message: {e}")))
    }

    /// Returns the wire name of the message.
    pub fn name(&self) -> &'static str {
        match self {
            WorkerMessage::Start { .. } => "start",
            WorkerMessage::Progress { .. } => "progress",
            WorkerMessage::Complete { .. } => "complete",
            WorkerMessage::Error { .. } => "error",
            WorkerMessage::Stop => "stop",
        }
    }

    /// Returns true for messages that end a run.
    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkerMessage::Complete { .. } | WorkerMessage::Error { .. })
    }
}

impl From<SyncProgress> for WorkerMessage {
    fn from(p: SyncProgress) -> Self {
        WorkerMessage::Progress {
            progress: p.progress,
            total: p.total,
            is_complete: p.is_complete,
        }
    }
}
