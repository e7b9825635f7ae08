//! # Workflow
//!
//! The facade the binary talks to: one store, one finalizer, every entry point.
//!
//! ## Storage Backends
//!
//! - `InMemory`: `MemoryStore` (fast, volatile unless exported)
//! - `Persistent`: `RedbStore` for disk-backed ACID storage
//!
//! The caller supplies the current time on every mutating call so the engine
//! itself never reads the clock.

use crate::eligibility;
use crate::finalizer::{
    AwardRequest, CompletionOrigin, FinalizeRequest, StageFinalizer, WorkflowPolicy, apply_award,
    apply_completion, award_audit, completion_audit, recompute_progress, require_caller,
    system_actor,
};
use crate::primitives::{MAX_IMPORT_BATCH, MAX_TITLE_LENGTH, OWNER_ROLE};
use crate::storage::RedbStore;
use crate::store::{MemoryStore, TenderStore};
use crate::system::{ProgressSummary, STAGE_ORDER, StageId, get_stage_definition};
use crate::types::{
    Approvals, AuditEntry, BoqState, DocumentChecklistItem, Role, StageCompletionRecord, Tender,
    TenderId, TenderStatus, TenderflowError, Timestamp, UserId,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Storage backend for a Workflow.
#[derive(Debug)]
pub enum StorageBackend {
    /// In-memory store (fast, volatile).
    InMemory(MemoryStore),
    /// Disk-backed store using redb (ACID, persistent).
    Persistent(RedbStore),
}

impl Default for StorageBackend {
    fn default() -> Self {
        Self::InMemory(MemoryStore::new())
    }
}

/// Input for [`Workflow::create_tender`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTender {
    pub title: String,
    #[serde(default)]
    pub status: Option<TenderStatus>,
    #[serde(default)]
    pub members_map: BTreeMap<UserId, Role>,
    #[serde(default)]
    pub document_checklist: Option<BTreeMap<String, DocumentChecklistItem>>,
    #[serde(default)]
    pub boq: Option<BoqState>,
    #[serde(default)]
    pub approvals: Option<Approvals>,
}

impl NewTender {
    #[must_use]
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_member(mut self, user: impl Into<String>, role: impl Into<String>) -> Self {
        self.members_map
            .insert(UserId::new(user), Role::new(role));
        self
    }
}

/// Result of a successful finalize or award.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageOutcome {
    pub tender: Tender,
    pub stage: StageId,
    pub message: &'static str,
}

/// Result of [`Workflow::auto_advance`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdvanceOutcome {
    pub tender: Tender,
    pub completed: Vec<StageId>,
}

/// Counts reported by [`Workflow::backfill_identification`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackfillReport {
    pub migrated: usize,
    pub skipped: usize,
}

/// Progress view of one tender.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TenderProgress {
    pub tender_id: TenderId,
    #[serde(flatten)]
    pub summary: ProgressSummary,
    pub eligibility: BTreeMap<StageId, bool>,
}

/// The workflow engine.
#[derive(Debug, Default)]
pub struct Workflow {
    backend: StorageBackend,
    finalizer: StageFinalizer,
}

impl Workflow {
    /// Create an empty workflow with in-memory storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a workflow over persistent redb storage.
    pub fn with_redb(path: impl AsRef<Path>) -> Result<Self, TenderflowError> {
        Ok(Self::with_backend(StorageBackend::Persistent(
            RedbStore::open(path)?,
        )))
    }

    #[must_use]
    pub fn with_backend(backend: StorageBackend) -> Self {
        Self {
            backend,
            finalizer: StageFinalizer::default(),
        }
    }

    /// Replace the finalizer policy.
    #[must_use]
    pub fn with_policy(mut self, policy: WorkflowPolicy) -> Self {
        self.finalizer = StageFinalizer::new(policy);
        self
    }

    #[must_use]
    pub fn policy(&self) -> WorkflowPolicy {
        self.finalizer.policy()
    }

    /// Check if using persistent storage.
    #[must_use]
    pub fn is_persistent(&self) -> bool {
        matches!(self.backend, StorageBackend::Persistent(_))
    }

    fn store(&self) -> &dyn TenderStore {
        match &self.backend {
            StorageBackend::InMemory(store) => store,
            StorageBackend::Persistent(store) => store,
        }
    }

    fn store_mut(&mut self) -> &mut dyn TenderStore {
        match &mut self.backend {
            StorageBackend::InMemory(store) => store,
            StorageBackend::Persistent(store) => store,
        }
    }

    // =========================================================================
    // READS
    // =========================================================================

    pub fn tender(&self, id: &TenderId) -> Result<Tender, TenderflowError> {
        self.store()
            .get(id)?
            .ok_or_else(|| TenderflowError::TenderNotFound(id.clone()))
    }

    pub fn tenders(&self) -> Result<Vec<Tender>, TenderflowError> {
        self.store().list()
    }

    /// A tender as seen by `caller`, who must be one of its members.
    pub fn tender_for(
        &self,
        caller: Option<&UserId>,
        id: &TenderId,
    ) -> Result<Tender, TenderflowError> {
        let caller = require_caller(caller)?;
        let tender = self.tender(id)?;
        if tender.role_of(caller).is_none() {
            return Err(TenderflowError::NotAMember(tender.tender_id));
        }
        Ok(tender)
    }

    /// Tenders that list `caller` in their membership map.
    pub fn tenders_for(&self, caller: Option<&UserId>) -> Result<Vec<Tender>, TenderflowError> {
        let caller = require_caller(caller)?;
        Ok(self
            .tenders()?
            .into_iter()
            .filter(|tender| tender.role_of(caller).is_some())
            .collect())
    }

    pub fn tender_count(&self) -> Result<usize, TenderflowError> {
        self.store().count()
    }

    pub fn audit_log(&self, id: &TenderId) -> Result<Vec<AuditEntry>, TenderflowError> {
        self.tender(id)?;
        self.store().audit_log(id)
    }

    /// Progress summary plus the current eligibility map.
    pub fn progress(&self, id: &TenderId) -> Result<TenderProgress, TenderflowError> {
        let tender = self.tender(id)?;
        Ok(TenderProgress {
            summary: ProgressSummary::of(Some(&tender.stage_completion)),
            eligibility: eligibility::evaluate(&tender),
            tender_id: tender.tender_id,
        })
    }

    // =========================================================================
    // CREATION
    // =========================================================================

    /// Create a tender and complete stage 1 on behalf of the creator.
    pub fn create_tender(
        &mut self,
        caller: Option<&UserId>,
        draft: NewTender,
        now: Timestamp,
    ) -> Result<Tender, TenderflowError> {
        let creator = require_caller(caller)?.clone();
        validate_title(&draft.title)?;
        let finalizer = self.finalizer;

        self.store_mut().create(&mut |id: TenderId| {
            let mut tender = Tender::new(id, draft.title.trim());
            tender.status = draft.status.unwrap_or_default();
            tender.members_map = draft.members_map.clone();
            tender
                .members_map
                .entry(creator.clone())
                .or_insert_with(|| Role::new(OWNER_ROLE));
            tender.document_checklist = draft.document_checklist.clone();
            tender.boq = draft.boq.clone();
            tender.approvals = draft.approvals.clone();
            tender.created_by = Some(creator.clone());
            tender.created_at = now;
            tender.last_modified_by = Some(creator.clone());
            tender.last_modified_at = now;

            let created = AuditEntry::new(
                tender.tender_id.clone(),
                "TENDER_CREATED",
                creator.clone(),
                now,
            )
            .with("title", tender.title.clone());

            finalizer.check_system(&tender, StageId::Identification)?;
            apply_completion(
                &mut tender,
                StageId::Identification,
                &creator,
                now,
                Vec::new(),
            )?;
            let stage_one = completion_audit(
                &tender,
                StageId::Identification,
                &creator,
                now,
                CompletionOrigin::System,
                None,
            );
            Ok((tender, vec![created, stage_one]))
        })
    }

    // =========================================================================
    // FINALIZATION
    // =========================================================================

    /// Manual finalize of one stage by an authenticated member.
    pub fn finalize_stage(
        &mut self,
        caller: Option<&UserId>,
        request: &FinalizeRequest,
        now: Timestamp,
    ) -> Result<StageOutcome, TenderflowError> {
        let caller = require_caller(caller)?.clone();
        request.validate()?;
        let finalizer = self.finalizer;
        let stage = request.stage;

        let tender = self.store_mut().mutate(&request.tender_id, &mut |tender| {
            finalizer.check_manual(tender, &caller, stage)?;
            apply_completion(tender, stage, &caller, now, request.evidence_refs.clone())?;
            Ok(vec![completion_audit(
                tender,
                stage,
                &caller,
                now,
                CompletionOrigin::Manual,
                request.notes.as_deref(),
            )])
        })?;

        Ok(StageOutcome {
            tender,
            stage,
            message: get_stage_definition(stage).completion_phrase,
        })
    }

    /// Record the LOA and mark the tender awarded. Admins only.
    pub fn award_tender(
        &mut self,
        caller: Option<&UserId>,
        request: &AwardRequest,
        now: Timestamp,
    ) -> Result<StageOutcome, TenderflowError> {
        let caller = require_caller(caller)?.clone();
        request.validate()?;
        let finalizer = self.finalizer;

        let tender = self.store_mut().mutate(&request.tender_id, &mut |tender| {
            finalizer.check_award(tender, &caller)?;
            apply_award(tender, &caller, now, &request.loa_ref)?;
            Ok(vec![award_audit(
                tender,
                &caller,
                now,
                &request.loa_ref,
                request.notes.as_deref(),
            )])
        })?;

        Ok(StageOutcome {
            tender,
            stage: StageId::Loa,
            message: get_stage_definition(StageId::Loa).completion_phrase,
        })
    }

    /// Complete every pending auto or hybrid stage whose condition holds.
    ///
    /// When `on_behalf_of` is given it must be a member; completions are then
    /// attributed to that user, otherwise to `system`.
    pub fn auto_advance(
        &mut self,
        tender_id: &TenderId,
        on_behalf_of: Option<&UserId>,
        now: Timestamp,
    ) -> Result<AdvanceOutcome, TenderflowError> {
        let finalizer = self.finalizer;
        let actor = system_actor(on_behalf_of);
        let mut completed = Vec::new();

        let tender = self.store_mut().mutate(tender_id, &mut |tender| {
            completed.clear();
            if on_behalf_of.is_some_and(|user| tender.role_of(user).is_none()) {
                return Err(TenderflowError::NotAMember(tender.tender_id.clone()));
            }

            let mut audit = Vec::new();
            for stage in STAGE_ORDER {
                if finalizer.check_system(tender, stage).is_err() {
                    continue;
                }
                apply_completion(tender, stage, &actor, now, Vec::new())?;
                audit.push(completion_audit(
                    tender,
                    stage,
                    &actor,
                    now,
                    CompletionOrigin::System,
                    None,
                ));
                completed.push(stage);
            }
            Ok(audit)
        })?;

        Ok(AdvanceOutcome { tender, completed })
    }

    // =========================================================================
    // MAINTENANCE
    // =========================================================================

    /// Add the stage-1 record to every tender that lacks one.
    ///
    /// Attribution falls back to `operator` and the timestamp to `now` when
    /// the tender carries no creator or creation time. Running it twice
    /// migrates nothing the second time.
    pub fn backfill_identification(
        &mut self,
        operator: &UserId,
        now: Timestamp,
    ) -> Result<BackfillReport, TenderflowError> {
        let mut report = BackfillReport::default();
        let ids: Vec<TenderId> = self
            .store()
            .list()?
            .into_iter()
            .map(|tender| tender.tender_id)
            .collect();

        for id in ids {
            let mut migrated = false;
            self.store_mut().mutate(&id, &mut |tender| {
                migrated = false;
                if tender.stage_completion.contains_key(&StageId::Identification) {
                    return Ok(Vec::new());
                }
                let by = tender.created_by.clone().unwrap_or_else(|| operator.clone());
                let at = if tender.created_at.millis() == 0 {
                    now
                } else {
                    tender.created_at
                };
                tender.stage_completion.insert(
                    StageId::Identification,
                    StageCompletionRecord::completed(by.clone(), at, Vec::new()),
                );
                recompute_progress(tender);
                migrated = true;
                let entry = AuditEntry::new(
                    tender.tender_id.clone(),
                    "STAGE1_BACKFILLED",
                    operator.clone(),
                    now,
                )
                .with("stageId", StageId::Identification.as_str())
                .with("by", by.as_str())
                .with("progressPercent", tender.progress_percent.to_string());
                Ok(vec![entry])
            })?;
            if migrated {
                report.migrated += 1;
            } else {
                report.skipped += 1;
            }
        }
        Ok(report)
    }

    /// Upsert tenders verbatim, except that `progress_percent` is recomputed
    /// from the completion map. The batch is written in one transaction.
    pub fn import_tenders(
        &mut self,
        tenders: Vec<Tender>,
        operator: &UserId,
        now: Timestamp,
    ) -> Result<usize, TenderflowError> {
        if tenders.len() > MAX_IMPORT_BATCH {
            return Err(TenderflowError::InvalidArgument(format!(
                "import batch of {} exceeds {}",
                tenders.len(),
                MAX_IMPORT_BATCH
            )));
        }
        for tender in &tenders {
            if tender.tender_id.as_str().trim().is_empty() {
                return Err(TenderflowError::InvalidArgument(
                    "imported tender without tenderId".to_string(),
                ));
            }
        }

        let batch: Vec<(Tender, Vec<AuditEntry>)> = tenders
            .into_iter()
            .map(|mut tender| {
                recompute_progress(&mut tender);
                let entry = AuditEntry::new(
                    tender.tender_id.clone(),
                    "TENDER_IMPORTED",
                    operator.clone(),
                    now,
                )
                .with("progressPercent", tender.progress_percent.to_string());
                (tender, vec![entry])
            })
            .collect();
        let count = batch.len();
        self.store_mut().put_all(batch)?;
        Ok(count)
    }
}

fn validate_title(title: &str) -> Result<(), TenderflowError> {
    if title.trim().is_empty() {
        return Err(TenderflowError::InvalidArgument(
            "title is required".to_string(),
        ));
    }
    if title.len() > MAX_TITLE_LENGTH {
        return Err(TenderflowError::InvalidArgument(format!(
            "title exceeds {MAX_TITLE_LENGTH} bytes"
        )));
    }
    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn at(ms: u64) -> Timestamp {
        Timestamp::from_millis(ms)
    }

    fn user(id: &str) -> UserId {
        UserId::new(id)
    }

    #[test]
    fn creation_completes_stage_one() {
        let mut workflow = Workflow::new();
        let tender = workflow
            .create_tender(Some(&user("u1")), NewTender::titled("Ring road"), at(10))
            .expect("create");

        assert_eq!(tender.progress_percent, 6);
        let record = tender
            .stage_completion
            .get(&StageId::Identification)
            .expect("stage 1");
        assert_eq!(record.by, Some(user("u1")));
        assert_eq!(tender.role_of(&user("u1")), Some(&Role::new("owner")));

        let actions: Vec<String> = workflow
            .audit_log(&tender.tender_id)
            .expect("audit")
            .into_iter()
            .map(|e| e.action)
            .collect();
        assert_eq!(
            actions,
            vec!["TENDER_CREATED", "STAGE_1_IDENTIFICATION_COMPLETED"]
        );
    }

    #[test]
    fn creator_keeps_explicit_role() {
        let mut workflow = Workflow::new();
        let tender = workflow
            .create_tender(
                Some(&user("u1")),
                NewTender::titled("Ring road").with_member("u1", "admin"),
                at(1),
            )
            .expect("create");
        assert_eq!(tender.role_of(&user("u1")), Some(&Role::new("admin")));
    }

    #[test]
    fn anonymous_creation_rejected() {
        let mut workflow = Workflow::new();
        let err = workflow
            .create_tender(None, NewTender::titled("x"), at(1))
            .expect_err("anonymous");
        assert_eq!(err, TenderflowError::Unauthenticated);
        let err = workflow
            .create_tender(Some(&user("u1")), NewTender::titled("  "), at(1))
            .expect_err("blank");
        assert!(matches!(err, TenderflowError::InvalidArgument(_)));
    }

    #[test]
    fn backfill_is_idempotent() {
        let mut workflow = Workflow::new();
        let mut legacy = Tender::new(TenderId::new("LEGACY-1"), "Old tender");
        legacy.created_by = Some(user("founder"));
        legacy.created_at = at(500);
        workflow
            .import_tenders(vec![legacy], &user("ops"), at(900))
            .expect("import");

        let first = workflow
            .backfill_identification(&user("ops"), at(1000))
            .expect("backfill");
        assert_eq!(first, BackfillReport { migrated: 1, skipped: 0 });

        let tender = workflow.tender(&TenderId::new("LEGACY-1")).expect("get");
        let record = tender
            .stage_completion
            .get(&StageId::Identification)
            .expect("stage 1");
        assert_eq!(record.by, Some(user("founder")));
        assert_eq!(record.at, at(500));
        assert_eq!(tender.progress_percent, 6);

        let second = workflow
            .backfill_identification(&user("ops"), at(2000))
            .expect("backfill");
        assert_eq!(second, BackfillReport { migrated: 0, skipped: 1 });
    }

    #[test]
    fn import_normalizes_progress() {
        let mut workflow = Workflow::new();
        let mut tender = Tender::new(TenderId::new("IMP-1"), "Imported");
        tender.progress_percent = 77;
        workflow
            .import_tenders(vec![tender], &user("ops"), at(1))
            .expect("import");
        assert_eq!(
            workflow
                .tender(&TenderId::new("IMP-1"))
                .expect("get")
                .progress_percent,
            0
        );
    }

    #[test]
    fn member_scoped_reads() {
        let mut workflow = Workflow::new();
        let tender = workflow
            .create_tender(
                Some(&user("alice")),
                NewTender::titled("Scoped").with_member("bob", "engineer"),
                at(1),
            )
            .expect("create");
        let id = tender.tender_id;

        assert!(workflow.tender_for(Some(&user("bob")), &id).is_ok());
        assert_eq!(
            workflow.tender_for(Some(&user("carol")), &id),
            Err(TenderflowError::NotAMember(id.clone()))
        );
        assert_eq!(
            workflow.tender_for(None, &id),
            Err(TenderflowError::Unauthenticated)
        );
        assert_eq!(
            workflow
                .tenders_for(Some(&user("alice")))
                .expect("list")
                .len(),
            1
        );
        assert!(
            workflow
                .tenders_for(Some(&user("carol")))
                .expect("list")
                .is_empty()
        );
    }
}
