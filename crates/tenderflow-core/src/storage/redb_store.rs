//! # redb-backed Tender Storage
//!
//! A disk-backed tender store using the redb embedded database.
//!
//! redb provides:
//! - ACID transactions
//! - Crash safety (copy-on-write B-trees)
//! - MVCC (concurrent readers, single writer)
//!
//! Every mutation is exactly one write transaction: the tender is read,
//! checked and rewritten, and its audit entries appended, before commit. A
//! failing check aborts the transaction, so nothing reaches disk. Because redb
//! admits a single writer at a time, two racing finalize calls for the same
//! stage serialize; the second one sees the first one's record.

use crate::formats::{decode_record, encode_record};
use crate::store::{CreateFn, MutateFn, TenderStore, tender_id_for};
use crate::types::{AuditEntry, Tender, TenderId, TenderflowError};
use redb::{
    Database, ReadableDatabase, ReadableTable, ReadableTableMetadata, TableDefinition,
    WriteTransaction,
};
use std::path::Path;

/// Table for tenders: tender id -> encoded Tender
const TENDERS: TableDefinition<&str, &[u8]> = TableDefinition::new("tenders");

/// Table for the audit log: (tender id, sequence) -> encoded AuditEntry
const AUDIT: TableDefinition<(&str, u64), &[u8]> = TableDefinition::new("audit");

/// Table for counters: key -> value
const METADATA: TableDefinition<&str, u64> = TableDefinition::new("metadata");

const LAST_TENDER_NUMBER: &str = "last_tender_number";
const LAST_AUDIT_SEQUENCE: &str = "last_audit_sequence";

fn storage_err(e: impl std::fmt::Display) -> TenderflowError {
    TenderflowError::Storage(e.to_string())
}

/// A disk-backed tender store.
pub struct RedbStore {
    db: Database,
}

impl std::fmt::Debug for RedbStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbStore").finish_non_exhaustive()
    }
}

impl RedbStore {
    /// Open or create a tender database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, TenderflowError> {
        let db = Database::create(path.as_ref()).map_err(storage_err)?;

        // Initialize tables if they don't exist
        {
            let write_txn = db.begin_write().map_err(storage_err)?;
            let _ = write_txn.open_table(TENDERS).map_err(storage_err)?;
            let _ = write_txn.open_table(AUDIT).map_err(storage_err)?;
            let _ = write_txn.open_table(METADATA).map_err(storage_err)?;
            write_txn.commit().map_err(storage_err)?;
        }

        Ok(Self { db })
    }

    fn read_counter(txn: &WriteTransaction, key: &str) -> Result<u64, TenderflowError> {
        let table = txn.open_table(METADATA).map_err(storage_err)?;
        Ok(table
            .get(key)
            .map_err(storage_err)?
            .map(|v| v.value())
            .unwrap_or(0))
    }

    fn write_tender(txn: &WriteTransaction, tender: &Tender) -> Result<(), TenderflowError> {
        let bytes = encode_record(tender)?;
        let mut table = txn.open_table(TENDERS).map_err(storage_err)?;
        table
            .insert(tender.tender_id.as_str(), bytes.as_slice())
            .map_err(storage_err)?;
        Ok(())
    }

    fn read_tender_in(
        txn: &WriteTransaction,
        id: &TenderId,
    ) -> Result<Option<Tender>, TenderflowError> {
        let table = txn.open_table(TENDERS).map_err(storage_err)?;
        let Some(raw) = table.get(id.as_str()).map_err(storage_err)? else {
            return Ok(None);
        };
        decode_record(raw.value()).map(Some)
    }

    fn append_audit(
        txn: &WriteTransaction,
        entries: Vec<AuditEntry>,
    ) -> Result<(), TenderflowError> {
        if entries.is_empty() {
            return Ok(());
        }
        let mut sequence = Self::read_counter(txn, LAST_AUDIT_SEQUENCE)?;
        {
            let mut table = txn.open_table(AUDIT).map_err(storage_err)?;
            for mut entry in entries {
                sequence = sequence.saturating_add(1);
                entry.sequence = sequence;
                let bytes = encode_record(&entry)?;
                table
                    .insert((entry.tender_id.as_str(), sequence), bytes.as_slice())
                    .map_err(storage_err)?;
            }
        }
        let mut meta = txn.open_table(METADATA).map_err(storage_err)?;
        meta.insert(LAST_AUDIT_SEQUENCE, sequence)
            .map_err(storage_err)?;
        Ok(())
    }
}

impl TenderStore for RedbStore {
    fn get(&self, id: &TenderId) -> Result<Option<Tender>, TenderflowError> {
        let read_txn = self.db.begin_read().map_err(storage_err)?;
        let table = read_txn.open_table(TENDERS).map_err(storage_err)?;
        match table.get(id.as_str()).map_err(storage_err)? {
            Some(raw) => decode_record(raw.value()).map(Some),
            None => Ok(None),
        }
    }

    fn list(&self) -> Result<Vec<Tender>, TenderflowError> {
        let read_txn = self.db.begin_read().map_err(storage_err)?;
        let table = read_txn.open_table(TENDERS).map_err(storage_err)?;
        let mut tenders = Vec::new();
        for entry in table.iter().map_err(storage_err)? {
            let (_, value) = entry.map_err(storage_err)?;
            tenders.push(decode_record(value.value())?);
        }
        Ok(tenders)
    }

    fn count(&self) -> Result<usize, TenderflowError> {
        let read_txn = self.db.begin_read().map_err(storage_err)?;
        let table = read_txn.open_table(TENDERS).map_err(storage_err)?;
        let len = table.len().map_err(storage_err)?;
        Ok(len as usize)
    }

    fn put(&mut self, tender: Tender, audit: Vec<AuditEntry>) -> Result<(), TenderflowError> {
        let write_txn = self.db.begin_write().map_err(storage_err)?;
        Self::write_tender(&write_txn, &tender)?;
        Self::append_audit(&write_txn, audit)?;
        write_txn.commit().map_err(storage_err)?;
        Ok(())
    }

    fn put_all(&mut self, batch: Vec<(Tender, Vec<AuditEntry>)>) -> Result<(), TenderflowError> {
        let write_txn = self.db.begin_write().map_err(storage_err)?;
        for (tender, audit) in batch {
            Self::write_tender(&write_txn, &tender)?;
            Self::append_audit(&write_txn, audit)?;
        }
        write_txn.commit().map_err(storage_err)?;
        Ok(())
    }

    fn create(&mut self, build: &mut CreateFn<'_>) -> Result<Tender, TenderflowError> {
        let write_txn = self.db.begin_write().map_err(storage_err)?;

        let mut n = Self::read_counter(&write_txn, LAST_TENDER_NUMBER)?;
        let id = loop {
            n = n.saturating_add(1);
            let candidate = tender_id_for(n);
            if Self::read_tender_in(&write_txn, &candidate)?.is_none() {
                break candidate;
            }
        };

        let (tender, audit) = match build(id) {
            Ok(built) => built,
            Err(e) => {
                write_txn.abort().map_err(storage_err)?;
                return Err(e);
            }
        };

        Self::write_tender(&write_txn, &tender)?;
        Self::append_audit(&write_txn, audit)?;
        {
            let mut meta = write_txn.open_table(METADATA).map_err(storage_err)?;
            meta.insert(LAST_TENDER_NUMBER, n).map_err(storage_err)?;
        }
        write_txn.commit().map_err(storage_err)?;
        Ok(tender)
    }

    fn mutate(
        &mut self,
        id: &TenderId,
        apply: &mut MutateFn<'_>,
    ) -> Result<Tender, TenderflowError> {
        let write_txn = self.db.begin_write().map_err(storage_err)?;

        let Some(mut tender) = Self::read_tender_in(&write_txn, id)? else {
            write_txn.abort().map_err(storage_err)?;
            return Err(TenderflowError::TenderNotFound(id.clone()));
        };

        let audit = match apply(&mut tender) {
            Ok(audit) => audit,
            Err(e) => {
                write_txn.abort().map_err(storage_err)?;
                return Err(e);
            }
        };

        Self::write_tender(&write_txn, &tender)?;
        Self::append_audit(&write_txn, audit)?;
        write_txn.commit().map_err(storage_err)?;
        Ok(tender)
    }

    fn audit_log(&self, id: &TenderId) -> Result<Vec<AuditEntry>, TenderflowError> {
        let read_txn = self.db.begin_read().map_err(storage_err)?;
        let table = read_txn.open_table(AUDIT).map_err(storage_err)?;
        let mut entries = Vec::new();
        for entry in table
            .range((id.as_str(), 0u64)..=(id.as_str(), u64::MAX))
            .map_err(storage_err)?
        {
            let (_, value) = entry.map_err(storage_err)?;
            entries.push(decode_record(value.value())?);
        }
        Ok(entries)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::StageId;
    use crate::types::{StageCompletionRecord, Timestamp, UserId};
    use tempfile::tempdir;

    fn created(id: TenderId) -> Result<(Tender, Vec<AuditEntry>), TenderflowError> {
        let audit = AuditEntry::new(
            id.clone(),
            "TENDER_CREATED",
            UserId::new("u1"),
            Timestamp::from_millis(1),
        );
        Ok((Tender::new(id, "Dam repair"), vec![audit]))
    }

    #[test]
    fn create_and_get() {
        let temp = tempdir().expect("temp dir");
        let mut store = RedbStore::open(temp.path().join("t.redb")).expect("open db");

        let tender = store.create(&mut created).expect("create");
        assert_eq!(tender.tender_id.as_str(), "TND-000001");

        let loaded = store.get(&tender.tender_id).expect("get").expect("exists");
        assert_eq!(loaded, tender);
        assert_eq!(store.count().expect("count"), 1);
        assert_eq!(store.audit_log(&tender.tender_id).expect("audit").len(), 1);
    }

    #[test]
    fn aborted_mutation_leaves_disk_untouched() {
        let temp = tempdir().expect("temp dir");
        let mut store = RedbStore::open(temp.path().join("t.redb")).expect("open db");
        let tender = store.create(&mut created).expect("create");

        let result = store.mutate(&tender.tender_id, &mut |t| {
            t.progress_percent = 99;
            Err(TenderflowError::ConditionsNotMet(StageId::Boq))
        });
        assert!(result.is_err());

        let loaded = store.get(&tender.tender_id).expect("get").expect("exists");
        assert_eq!(loaded.progress_percent, 0);
        assert_eq!(store.audit_log(&tender.tender_id).expect("audit").len(), 1);
    }

    #[test]
    fn completions_persist_after_reopen() {
        let temp = tempdir().expect("temp dir");
        let path = temp.path().join("t.redb");

        let id;
        {
            let mut store = RedbStore::open(&path).expect("open db");
            id = store.create(&mut created).expect("create").tender_id;
            store
                .mutate(&id, &mut |t| {
                    t.stage_completion.insert(
                        StageId::Identification,
                        StageCompletionRecord::completed(
                            UserId::new("u1"),
                            Timestamp::from_millis(3),
                            Vec::new(),
                        ),
                    );
                    Ok(Vec::new())
                })
                .expect("mutate");
        }

        {
            let mut store = RedbStore::open(&path).expect("reopen db");
            let loaded = store.get(&id).expect("get").expect("exists");
            assert!(loaded.is_stage_done(StageId::Identification));

            let next = store.create(&mut created).expect("create");
            assert_eq!(next.tender_id.as_str(), "TND-000002");
        }
    }

    #[test]
    fn audit_log_is_per_tender() {
        let temp = tempdir().expect("temp dir");
        let mut store = RedbStore::open(temp.path().join("t.redb")).expect("open db");
        let a = store.create(&mut created).expect("create");
        let b = store.create(&mut created).expect("create");

        let log_a = store.audit_log(&a.tender_id).expect("audit");
        let log_b = store.audit_log(&b.tender_id).expect("audit");
        assert_eq!(log_a.len(), 1);
        assert_eq!(log_b.len(), 1);
        assert!(log_a[0].sequence < log_b[0].sequence);
    }

    #[test]
    fn missing_tender_is_not_found() {
        let temp = tempdir().expect("temp dir");
        let mut store = RedbStore::open(temp.path().join("t.redb")).expect("open db");
        let result = store.mutate(&TenderId::new("TND-999999"), &mut |_| Ok(Vec::new()));
        assert!(matches!(result, Err(TenderflowError::TenderNotFound(_))));
    }
}
