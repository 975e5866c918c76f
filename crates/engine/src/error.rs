use opsdeck_client::RemoteError;
use opsdeck_core::{CoreError, OperationId, ResourceRef, TimestampMs};
use opsdeck_storage::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// A pre-mutation fetch failed: the whole operation aborts before any
    /// remote write (fail closed).
    #[error("failed to fetch {target}: {source}")]
    RemoteFetch {
        target: String,
        source: RemoteError,
    },

    /// Record store write failure. Fatal to the confirmation step unless the
    /// operator explicitly re-runs with best-effort auditing.
    #[error("record store error: {0}")]
    Persistence(#[from] StorageError),

    #[error("core error: {0}")]
    Core(#[from] CoreError),

    #[error("record {0} not found")]
    RecordNotFound(OperationId),

    #[error("operation {0} was already rolled back")]
    AlreadyRolledBack(OperationId),

    /// The before-state is older than the staleness threshold; remote state
    /// may have drifted too far for a blind inverse.
    #[error("before-state captured at {captured_at} exceeds the staleness threshold of {threshold_ms} ms")]
    StaleRecord {
        captured_at: TimestampMs,
        threshold_ms: i64,
    },

    /// The change does not fit the target, e.g. a membership operation on a
    /// skill. Rejected before any remote call.
    #[error("invalid change: {0}")]
    InvalidChange(String),
}

impl EngineError {
    pub(crate) fn remote_fetch(target: &ResourceRef, source: RemoteError) -> Self {
        Self::RemoteFetch {
            target: target.to_string(),
            source,
        }
    }
}
