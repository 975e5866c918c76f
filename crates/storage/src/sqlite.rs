use rusqlite::{Connection, OptionalExtension};

use opsdeck_core::{
    ChangeSpec, ItemResult, OperationId, OperationKind, OperationRecord, ResourceRef,
    ResourceState, ResourceType, TimestampMs,
};

use crate::error::StorageError;
use crate::traits::RecordStore;

/// Convert Vec<u8> to fixed-size array with proper error handling.
fn to_array<const N: usize>(v: Vec<u8>, label: &str) -> Result<[u8; N], StorageError> {
    v.try_into()
        .map_err(|_| StorageError::Serialization(format!("invalid {label} length")))
}

pub struct SqliteRecordStore {
    conn: Connection,
}

impl SqliteRecordStore {
    pub fn open(path: &str) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        crate::schema::init_schema(&conn)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        crate::schema::init_schema(&conn)?;
        Ok(Self { conn })
    }
}

fn read_record(row: &rusqlite::Row) -> Result<OperationRecord, StorageError> {
    let op_id_bytes: Vec<u8> = row.get(0)?;
    let kind_str: String = row.get(1)?;
    let target_type: String = row.get(2)?;
    let target_id: String = row.get(3)?;
    let before_bytes: Vec<u8> = row.get(4)?;
    let change_bytes: Vec<u8> = row.get(5)?;
    let items_bytes: Vec<u8> = row.get(6)?;
    let executed_at: TimestampMs = row.get(7)?;
    let rolled_back_by: Option<Vec<u8>> = row.get(8)?;
    let reverts: Option<Vec<u8>> = row.get(9)?;

    let id = OperationId::from_bytes(to_array::<16>(op_id_bytes, "op_id")?);
    let kind = OperationKind::parse(&kind_str)?;
    let target = ResourceRef::new(ResourceType::parse(&target_type)?, target_id);
    let before = ResourceState::from_msgpack(&before_bytes)?;
    let change = ChangeSpec::from_msgpack(&change_bytes)?;
    let items = OperationRecord::items_from_msgpack(&items_bytes)?;
    let rolled_back_by = rolled_back_by
        .map(|b| to_array::<16>(b, "rolled_back_by").map(OperationId::from_bytes))
        .transpose()?;
    let reverts = reverts
        .map(|b| to_array::<16>(b, "reverts").map(OperationId::from_bytes))
        .transpose()?;

    Ok(OperationRecord {
        id,
        kind,
        target,
        before,
        change,
        items,
        executed_at,
        rolled_back_by,
        reverts,
    })
}

const SELECT_COLS: &str = "op_id, kind, target_type, target_id, before_state, change_spec, \
                           items, executed_at, rolled_back_by, reverts";

impl RecordStore for SqliteRecordStore {
    fn append(&mut self, record: &OperationRecord) -> Result<(), StorageError> {
        let before_bytes = record.before.to_msgpack()?;
        let change_bytes = record.change.to_msgpack()?;
        let items_bytes = OperationRecord::items_to_msgpack(&record.items)?;
        let result = self.conn.execute(
            "INSERT INTO operations (op_id, kind, target_type, target_id, before_state, \
             change_spec, items, executed_at, rolled_back_by, reverts) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            rusqlite::params![
                record.id.as_bytes().as_slice(),
                record.kind.as_str(),
                record.target.rtype.as_str(),
                record.target.id,
                before_bytes,
                change_bytes,
                items_bytes,
                record.executed_at,
                record.rolled_back_by.map(|id| id.as_bytes().to_vec()),
                record.reverts.map(|id| id.as_bytes().to_vec()),
            ],
        );
        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(StorageError::ConstraintViolation(format!(
                    "record {} already appended",
                    record.id
                )))
            }
            Err(e) => Err(StorageError::Sqlite(e)),
        }
    }

    fn finalize(
        &mut self,
        id: OperationId,
        items: &[ItemResult],
        executed_at: TimestampMs,
    ) -> Result<(), StorageError> {
        let items_bytes = OperationRecord::items_to_msgpack(items)?;
        let changed = self.conn.execute(
            "UPDATE operations SET items = ?1, executed_at = ?2 WHERE op_id = ?3",
            rusqlite::params![items_bytes, executed_at, id.as_bytes().as_slice()],
        )?;
        if changed == 0 {
            return Err(StorageError::NotFound(id.to_string()));
        }
        Ok(())
    }

    fn get(&self, id: OperationId) -> Result<Option<OperationRecord>, StorageError> {
        let record = self
            .conn
            .query_row(
                &format!("SELECT {SELECT_COLS} FROM operations WHERE op_id = ?1"),
                rusqlite::params![id.as_bytes().as_slice()],
                |row| Ok(read_record(row)),
            )
            .optional()?;
        match record {
            None => Ok(None),
            Some(record) => Ok(Some(record?)),
        }
    }

    fn list_for_target(
        &self,
        target: &ResourceRef,
    ) -> Result<Vec<OperationRecord>, StorageError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {SELECT_COLS} FROM operations \
             WHERE target_type = ?1 AND target_id = ?2 \
             ORDER BY executed_at DESC, recorded_at DESC, rowid DESC"
        ))?;
        let rows = stmt.query_map(
            rusqlite::params![target.rtype.as_str(), target.id],
            |row| Ok(read_record(row)),
        )?;
        let mut records = Vec::new();
        for row in rows {
            records.push(row??);
        }
        Ok(records)
    }

    fn mark_rolled_back_by(
        &mut self,
        original: OperationId,
        rollback: OperationId,
    ) -> Result<(), StorageError> {
        let changed = self.conn.execute(
            "UPDATE operations SET rolled_back_by = ?1 \
             WHERE op_id = ?2 AND rolled_back_by IS NULL",
            rusqlite::params![
                rollback.as_bytes().as_slice(),
                original.as_bytes().as_slice()
            ],
        )?;
        if changed == 0 {
            let exists: bool = self.conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM operations WHERE op_id = ?1)",
                rusqlite::params![original.as_bytes().as_slice()],
                |row| row.get(0),
            )?;
            if exists {
                return Err(StorageError::ConstraintViolation(format!(
                    "record {original} already has a rollback backlink"
                )));
            }
            return Err(StorageError::NotFound(original.to_string()));
        }
        Ok(())
    }

    fn len(&self) -> Result<u64, StorageError> {
        let count: u64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM operations", [], |row| row.get(0))?;
        Ok(count)
    }

    fn purge(&mut self) -> Result<u64, StorageError> {
        let removed = self.conn.execute("DELETE FROM operations", [])?;
        Ok(removed as u64)
    }
}
