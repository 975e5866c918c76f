use opsdeck_core::{ItemResult, OperationId, OperationRecord, ResourceRef, TimestampMs};

use crate::error::StorageError;

/// Durable, append-only log of operation records, indexed by id and target.
///
/// Records are appended in pending form (before-state captured, no items)
/// *before* any mutation runs, then finalized with per-item results once the
/// executor completes. Nothing is ever deleted except by operator purge.
pub trait RecordStore: Send {
    fn append(&mut self, record: &OperationRecord) -> Result<(), StorageError>;

    /// Fill in per-item results for a previously-appended record.
    /// `NotFound` if the record was never appended.
    fn finalize(
        &mut self,
        id: OperationId,
        items: &[ItemResult],
        executed_at: TimestampMs,
    ) -> Result<(), StorageError>;

    fn get(&self, id: OperationId) -> Result<Option<OperationRecord>, StorageError>;

    /// All records for one target, most recent first.
    fn list_for_target(&self, target: &ResourceRef) -> Result<Vec<OperationRecord>, StorageError>;

    /// Set the one-shot rollback backlink. `NotFound` if the original record
    /// does not exist; `ConstraintViolation` if the backlink is already set.
    fn mark_rolled_back_by(
        &mut self,
        original: OperationId,
        rollback: OperationId,
    ) -> Result<(), StorageError>;

    fn len(&self) -> Result<u64, StorageError>;

    fn is_empty(&self) -> Result<bool, StorageError> {
        Ok(self.len()? == 0)
    }

    /// Operator-initiated purge of the entire log. Returns records removed.
    fn purge(&mut self) -> Result<u64, StorageError>;
}
