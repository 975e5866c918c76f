//! Bulk-operation engine: capture, assess, execute, record, roll back.
//!
//! The [`Console`] facade ties the pieces together in the one ordering that
//! matters: validate, lock the target, capture its before-state, persist the
//! pending record, and only then mutate. Rollback reuses the same path with a
//! derived inverse change.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use opsdeck_client::RemoteDirectory;
use opsdeck_core::{
    ChangeSpec, OperationId, OperationRecord, OperationStatus, ResourceRef, ResourceState, now_ms,
};
use opsdeck_storage::RecordStore;

pub mod assess;
pub mod capture;
pub mod error;
pub mod executor;
pub mod locks;
pub mod rollback;

pub use assess::{AssessedItem, AssessmentReport, ItemImpact};
pub use error::EngineError;
pub use executor::CancelFlag;
pub use locks::TargetLocks;

const DEFAULT_STALENESS_THRESHOLD_MS: i64 = 24 * 60 * 60 * 1000;

#[derive(Debug, Clone, Copy)]
pub struct ConsoleConfig {
    /// Maximum age of a captured before-state that a rollback will accept
    /// without an explicit override.
    pub staleness_threshold_ms: i64,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            staleness_threshold_ms: DEFAULT_STALENESS_THRESHOLD_MS,
        }
    }
}

/// What to do when the record store cannot persist the pending record.
///
/// `Required` fails the operation before any mutation (the default).
/// `BestEffort` is the operator's explicit choice to proceed without an
/// audit trail after a persistence failure has been surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuditMode {
    #[default]
    Required,
    BestEffort,
}

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub audit: AuditMode,
    pub cancel: CancelFlag,
}

pub struct Console {
    remote: Arc<dyn RemoteDirectory>,
    store: Mutex<Box<dyn RecordStore>>,
    locks: TargetLocks,
    config: ConsoleConfig,
}

impl Console {
    pub fn new(
        remote: Arc<dyn RemoteDirectory>,
        store: Box<dyn RecordStore>,
        config: ConsoleConfig,
    ) -> Self {
        Self {
            remote,
            store: Mutex::new(store),
            locks: TargetLocks::new(),
            config,
        }
    }

    fn store(&self) -> MutexGuard<'_, Box<dyn RecordStore>> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Dry run: classify every item against live state. Read-only and
    /// lock-free, so it can run while another operation holds the target.
    pub fn assess(
        &self,
        target: &ResourceRef,
        change: &ChangeSpec,
    ) -> Result<AssessmentReport, EngineError> {
        validate_change(target, change)?;
        assess::assess(self.remote.as_ref(), target, change)
    }

    pub fn run(
        &self,
        target: &ResourceRef,
        change: ChangeSpec,
    ) -> Result<OperationRecord, EngineError> {
        self.run_with(target, change, &RunOptions::default())
    }

    /// Apply a change: capture before-state, persist the pending record,
    /// execute, finalize. Holds the target lock throughout.
    pub fn run_with(
        &self,
        target: &ResourceRef,
        change: ChangeSpec,
        options: &RunOptions,
    ) -> Result<OperationRecord, EngineError> {
        validate_change(target, &change)?;
        let _guard = self.locks.acquire(target);

        let before = capture::capture_before_state(self.remote.as_ref(), target, &change)?;
        let mut record = OperationRecord::pending(target.clone(), change, before);
        let audited = self.append_pending(&record, options.audit)?;

        record.items = executor::execute(
            self.remote.as_ref(),
            target,
            &record.change,
            &options.cancel,
        );
        record.executed_at = now_ms();

        if audited {
            let finalized = self
                .store()
                .finalize(record.id, &record.items, record.executed_at);
            match options.audit {
                AuditMode::Required => finalized?,
                AuditMode::BestEffort => {}
            }
        }
        Ok(record)
    }

    fn append_pending(
        &self,
        record: &OperationRecord,
        audit: AuditMode,
    ) -> Result<bool, EngineError> {
        match self.store().append(record) {
            Ok(()) => Ok(true),
            Err(e) => match audit {
                AuditMode::Required => Err(EngineError::Persistence(e)),
                AuditMode::BestEffort => Ok(false),
            },
        }
    }

    /// Revert a recorded operation. Fails with `AlreadyRolledBack` if the
    /// record carries a backlink; a rollback's own record can in turn be
    /// rolled back by its explicit id. The backlink is set on full *and*
    /// partial rollback success.
    pub fn rollback(
        &self,
        id: OperationId,
        override_staleness: bool,
    ) -> Result<OperationRecord, EngineError> {
        let original = self
            .store()
            .get(id)?
            .ok_or(EngineError::RecordNotFound(id))?;
        let _guard = self.locks.acquire(&original.target);
        // Re-read under the lock; a concurrent rollback may have won the race.
        let original = self
            .store()
            .get(id)?
            .ok_or(EngineError::RecordNotFound(id))?;
        rollback::validate_rollback(
            &original,
            self.config.staleness_threshold_ms,
            override_staleness,
            now_ms(),
        )?;

        let target = original.target.clone();
        let (inverse, before) = if original.change.is_membership() {
            let current = self
                .remote
                .list_members(&target)
                .map_err(|e| EngineError::remote_fetch(&target, e))?;
            let inverse = rollback::derive_inverse(&original, Some(&current))?;
            let before = ResourceState::membership_snapshot(target.clone(), now_ms(), current);
            (inverse, before)
        } else {
            let inverse = rollback::derive_inverse(&original, None)?;
            let before =
                capture::capture_before_state(self.remote.as_ref(), &target, &inverse)?;
            (inverse, before)
        };

        let mut record = OperationRecord::pending(target.clone(), inverse, before);
        record.reverts = Some(id);
        self.store().append(&record)?;

        record.items = executor::execute(
            self.remote.as_ref(),
            &target,
            &record.change,
            &CancelFlag::new(),
        );
        record.executed_at = now_ms();

        let mut store = self.store();
        store.finalize(record.id, &record.items, record.executed_at)?;
        // Partial success still consumes the original's one rollback. Only a
        // wholly failed revert leaves it retryable.
        if record.status() != OperationStatus::Failed {
            store.mark_rolled_back_by(id, record.id)?;
        }
        Ok(record)
    }

    /// All records touching a target, most recent first.
    pub fn history(&self, target: &ResourceRef) -> Result<Vec<OperationRecord>, EngineError> {
        Ok(self.store().list_for_target(target)?)
    }

    pub fn record(&self, id: OperationId) -> Result<Option<OperationRecord>, EngineError> {
        Ok(self.store().get(id)?)
    }

    /// Operator-initiated wipe of the record log. Returns records removed.
    pub fn purge_history(&self) -> Result<u64, EngineError> {
        Ok(self.store().purge()?)
    }
}

fn validate_change(target: &ResourceRef, change: &ChangeSpec) -> Result<(), EngineError> {
    if change.item_count() == 0 {
        return Err(EngineError::InvalidChange("change contains no items".into()));
    }
    match change {
        ChangeSpec::AddMembers(members) | ChangeSpec::RemoveMembers(members) => {
            let Some(member_type) = target.rtype.member_type() else {
                return Err(EngineError::InvalidChange(format!(
                    "{target} does not hold members"
                )));
            };
            for member in members {
                if member.rtype != member_type {
                    return Err(EngineError::InvalidChange(format!(
                        "{target} holds {} members, not {}",
                        member_type.as_str(),
                        member.rtype.as_str()
                    )));
                }
            }
        }
        ChangeSpec::PatchFields(fields) => {
            if fields.keys().any(|name| name.is_empty()) {
                return Err(EngineError::InvalidChange("empty field name".into()));
            }
        }
    }
    Ok(())
}
