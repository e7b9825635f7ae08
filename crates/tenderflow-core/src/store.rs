//! # Tender Store
//!
//! The storage abstraction the workflow runs against, and its in-memory
//! implementation.
//!
//! `mutate` is the only way a stored tender changes after creation. The
//! closure receives a working copy; if it returns an error the copy is
//! dropped and neither the tender nor the audit log is touched. Backends
//! must run the read, the closure and the write as one atomic unit.

use crate::primitives::TENDER_ID_PREFIX;
use crate::types::{AuditEntry, Tender, TenderId, TenderflowError};
use std::collections::BTreeMap;

/// Closure applied by [`TenderStore::mutate`]. Returns the audit entries to append.
pub type MutateFn<'a> = dyn FnMut(&mut Tender) -> Result<Vec<AuditEntry>, TenderflowError> + 'a;

/// Closure applied by [`TenderStore::create`] to build a tender for a fresh id.
pub type CreateFn<'a> =
    dyn FnMut(TenderId) -> Result<(Tender, Vec<AuditEntry>), TenderflowError> + 'a;

/// Storage operations shared by every backend.
pub trait TenderStore {
    /// Fetch a tender.
    fn get(&self, id: &TenderId) -> Result<Option<Tender>, TenderflowError>;

    /// All tenders, ordered by id.
    fn list(&self) -> Result<Vec<Tender>, TenderflowError>;

    /// Number of stored tenders.
    fn count(&self) -> Result<usize, TenderflowError>;

    /// Insert or replace a tender as-is, appending `audit`.
    fn put(&mut self, tender: Tender, audit: Vec<AuditEntry>) -> Result<(), TenderflowError>;

    /// [`TenderStore::put`] for a whole batch, committed together or not at all.
    fn put_all(&mut self, batch: Vec<(Tender, Vec<AuditEntry>)>) -> Result<(), TenderflowError>;

    /// Allocate the next free id and store what `build` returns for it.
    fn create(&mut self, build: &mut CreateFn<'_>) -> Result<Tender, TenderflowError>;

    /// Atomic read-check-write of one tender.
    fn mutate(
        &mut self,
        id: &TenderId,
        apply: &mut MutateFn<'_>,
    ) -> Result<Tender, TenderflowError>;

    /// Audit entries for one tender, oldest first.
    fn audit_log(&self, id: &TenderId) -> Result<Vec<AuditEntry>, TenderflowError>;
}

/// Format the n-th generated tender id, e.g. `TND-000001`.
#[must_use]
pub fn tender_id_for(n: u64) -> TenderId {
    TenderId::new(format!("{TENDER_ID_PREFIX}-{n:06}"))
}

// =============================================================================
// IN-MEMORY STORE
// =============================================================================

/// Volatile store. Deterministic ordering through `BTreeMap`.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tenders: BTreeMap<TenderId, Tender>,
    audit: BTreeMap<TenderId, Vec<AuditEntry>>,
    next_sequence: u64,
    last_allocated: u64,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a store from exported tenders and audit entries.
    ///
    /// Audit entries keep their relative order and are renumbered from 1.
    #[must_use]
    pub fn restore(tenders: Vec<Tender>, mut audit: Vec<AuditEntry>) -> Self {
        let mut store = Self::new();
        for tender in tenders {
            store.tenders.insert(tender.tender_id.clone(), tender);
        }
        audit.sort_by_key(|entry| entry.sequence);
        store.append_audit(audit);
        store
    }

    fn append_audit(&mut self, entries: Vec<AuditEntry>) {
        for mut entry in entries {
            self.next_sequence = self.next_sequence.saturating_add(1);
            entry.sequence = self.next_sequence;
            self.audit
                .entry(entry.tender_id.clone())
                .or_default()
                .push(entry);
        }
    }
}

impl TenderStore for MemoryStore {
    fn get(&self, id: &TenderId) -> Result<Option<Tender>, TenderflowError> {
        Ok(self.tenders.get(id).cloned())
    }

    fn list(&self) -> Result<Vec<Tender>, TenderflowError> {
        Ok(self.tenders.values().cloned().collect())
    }

    fn count(&self) -> Result<usize, TenderflowError> {
        Ok(self.tenders.len())
    }

    fn put(&mut self, tender: Tender, audit: Vec<AuditEntry>) -> Result<(), TenderflowError> {
        self.tenders.insert(tender.tender_id.clone(), tender);
        self.append_audit(audit);
        Ok(())
    }

    fn put_all(&mut self, batch: Vec<(Tender, Vec<AuditEntry>)>) -> Result<(), TenderflowError> {
        for (tender, audit) in batch {
            self.put(tender, audit)?;
        }
        Ok(())
    }

    fn create(&mut self, build: &mut CreateFn<'_>) -> Result<Tender, TenderflowError> {
        let mut n = self.last_allocated;
        let id = loop {
            n = n.saturating_add(1);
            let candidate = tender_id_for(n);
            if !self.tenders.contains_key(&candidate) {
                break candidate;
            }
        };
        let (tender, audit) = build(id)?;
        self.last_allocated = n;
        self.put(tender.clone(), audit)?;
        Ok(tender)
    }

    fn mutate(
        &mut self,
        id: &TenderId,
        apply: &mut MutateFn<'_>,
    ) -> Result<Tender, TenderflowError> {
        let mut working = self
            .tenders
            .get(id)
            .cloned()
            .ok_or_else(|| TenderflowError::TenderNotFound(id.clone()))?;
        let audit = apply(&mut working)?;
        self.tenders.insert(id.clone(), working.clone());
        self.append_audit(audit);
        Ok(working)
    }

    fn audit_log(&self, id: &TenderId) -> Result<Vec<AuditEntry>, TenderflowError> {
        Ok(self.audit.get(id).cloned().unwrap_or_default())
    }
}

// =============================================================================
// TESTS
// =============================================================================
