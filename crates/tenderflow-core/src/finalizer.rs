//! # Stage Finalizer
//!
//! The single mutation path that moves a stage from pending to done.
//!
//! Two callers exist:
//! - **Manual**: an authenticated user asks to finalize a stage.
//! - **System**: the engine completes an auto or hybrid stage on its own
//!   (tender creation, auto-advance) once the stage's condition holds.
//!
//! Checks and application are split. Checks only read the tender; the
//! application functions are what write `stage_completion`, `progress_percent`
//! and (for the award) `award` and `status`. Callers run both inside one
//! storage transaction so a failed check writes nothing.

use crate::eligibility::stage_eligibility;
use crate::primitives::{MAX_EVIDENCE_REFS, MAX_NOTES_LENGTH, MAX_REF_LENGTH, SYSTEM_ACTOR};
use crate::system::{StageId, TriggerType, get_stage_definition, progress_percent};
use crate::types::{
    AuditEntry, Award, StageCompletionRecord, Tender, TenderId, TenderStatus, TenderflowError,
    Timestamp, UserId,
};
use serde::{Deserialize, Serialize};

// =============================================================================
// POLICY
// =============================================================================

/// Deployment-level switches for the finalizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WorkflowPolicy {
    /// Require every earlier stage to be done before a stage may complete.
    #[serde(default)]
    pub strict_order: bool,
}

impl WorkflowPolicy {
    #[must_use]
    pub fn strict() -> Self {
        Self { strict_order: true }
    }
}

// =============================================================================
// REQUESTS
// =============================================================================

/// A validated manual finalize request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalizeRequest {
    pub tender_id: TenderId,
    pub stage: StageId,
    pub evidence_refs: Vec<String>,
    pub notes: Option<String>,
}

impl FinalizeRequest {
    #[must_use]
    pub fn new(tender_id: TenderId, stage: StageId) -> Self {
        Self {
            tender_id,
            stage,
            evidence_refs: Vec::new(),
            notes: None,
        }
    }

    /// Build from raw wire strings.
    ///
    /// Empty identifiers are invalid arguments; a non-empty but unknown stage
    /// id is not found.
    pub fn parse(
        tender_id: &str,
        stage_id: &str,
        evidence_refs: Vec<String>,
        notes: Option<String>,
    ) -> Result<Self, TenderflowError> {
        if tender_id.trim().is_empty() {
            return Err(TenderflowError::InvalidArgument(
                "tenderId is required".to_string(),
            ));
        }
        if stage_id.trim().is_empty() {
            return Err(TenderflowError::InvalidArgument(
                "stageId is required".to_string(),
            ));
        }
        let request = Self {
            tender_id: TenderId::new(tender_id),
            stage: stage_id.parse()?,
            evidence_refs,
            notes,
        };
        request.validate()?;
        Ok(request)
    }

    #[must_use]
    pub fn with_evidence(mut self, evidence_refs: Vec<String>) -> Self {
        self.evidence_refs = evidence_refs;
        self
    }

    #[must_use]
    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    /// Bound the caller-supplied payload before any storage access.
    pub fn validate(&self) -> Result<(), TenderflowError> {
        if self.evidence_refs.len() > MAX_EVIDENCE_REFS {
            return Err(TenderflowError::InvalidArgument(format!(
                "at most {} evidence references are allowed, got {}",
                MAX_EVIDENCE_REFS,
                self.evidence_refs.len()
            )));
        }
        for reference in &self.evidence_refs {
            validate_reference("evidence reference", reference)?;
        }
        validate_notes(self.notes.as_deref())
    }
}

/// A validated award request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AwardRequest {
    pub tender_id: TenderId,
    pub loa_ref: String,
    pub notes: Option<String>,
}

impl AwardRequest {
    pub fn parse(
        tender_id: &str,
        loa_ref: &str,
        notes: Option<String>,
    ) -> Result<Self, TenderflowError> {
        if tender_id.trim().is_empty() {
            return Err(TenderflowError::InvalidArgument(
                "tenderId is required".to_string(),
            ));
        }
        let request = Self {
            tender_id: TenderId::new(tender_id),
            loa_ref: loa_ref.to_string(),
            notes,
        };
        request.validate()?;
        Ok(request)
    }

    pub fn validate(&self) -> Result<(), TenderflowError> {
        if self.loa_ref.trim().is_empty() {
            return Err(TenderflowError::InvalidArgument(
                "LOA reference is required".to_string(),
            ));
        }
        validate_reference("LOA reference", &self.loa_ref)?;
        validate_notes(self.notes.as_deref())
    }
}

fn validate_reference(label: &str, reference: &str) -> Result<(), TenderflowError> {
    if reference.is_empty() {
        return Err(TenderflowError::InvalidArgument(format!(
            "{label} must not be empty"
        )));
    }
    if reference.len() > MAX_REF_LENGTH {
        return Err(TenderflowError::InvalidArgument(format!(
            "{label} exceeds {MAX_REF_LENGTH} bytes"
        )));
    }
    Ok(())
}

fn validate_notes(notes: Option<&str>) -> Result<(), TenderflowError> {
    match notes {
        Some(text) if text.len() > MAX_NOTES_LENGTH => Err(TenderflowError::InvalidArgument(
            format!("notes exceed {MAX_NOTES_LENGTH} bytes"),
        )),
        _ => Ok(()),
    }
}

/// Require an authenticated caller.
pub fn require_caller(caller: Option<&UserId>) -> Result<&UserId, TenderflowError> {
    caller.ok_or(TenderflowError::Unauthenticated)
}

// =============================================================================
// STAGE FINALIZER
// =============================================================================

/// Who completed a stage, for the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionOrigin {
    Manual,
    System,
}

impl CompletionOrigin {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            CompletionOrigin::Manual => "manual",
            CompletionOrigin::System => "system",
        }
    }
}

/// Precondition checks and completion application.
#[derive(Debug, Clone, Copy, Default)]
pub struct StageFinalizer {
    policy: WorkflowPolicy,
}

impl StageFinalizer {
    #[must_use]
    pub fn new(policy: WorkflowPolicy) -> Self {
        Self { policy }
    }

    #[must_use]
    pub fn policy(&self) -> WorkflowPolicy {
        self.policy
    }

    /// Manual path checks, in order:
    /// membership (and role for manual stages), already done, auto stage,
    /// hybrid eligibility-or-role, then the optional ordering policy.
    ///
    /// Stage 1 is auto but its condition is only that the tender exists, so
    /// any member may record it while it has no record.
    pub fn check_manual(
        &self,
        tender: &Tender,
        caller: &UserId,
        stage: StageId,
    ) -> Result<(), TenderflowError> {
        let definition = get_stage_definition(stage);
        let role = tender
            .role_of(caller)
            .ok_or_else(|| TenderflowError::NotAMember(tender.tender_id.clone()))?;
        let permitted = definition.permits(role);

        if definition.trigger_type == TriggerType::Manual && !permitted {
            return Err(TenderflowError::RoleNotPermitted {
                role: role.clone(),
                stage,
            });
        }

        if tender.is_stage_done(stage) {
            return Err(TenderflowError::AlreadyCompleted(stage));
        }

        match definition.trigger_type {
            TriggerType::Auto if stage == StageId::Identification => {}
            TriggerType::Auto => return Err(TenderflowError::AutoStage(stage)),
            TriggerType::Hybrid => {
                let eligible = stage_eligibility(stage, tender).unwrap_or(false);
                if !eligible && !permitted {
                    return Err(TenderflowError::RoleNotPermitted {
                        role: role.clone(),
                        stage,
                    });
                }
            }
            TriggerType::Manual => {}
        }

        self.check_order(tender, stage)
    }

    /// System path checks: only auto and hybrid stages, and only while the
    /// stage's condition holds. Stage 1 always holds.
    pub fn check_system(&self, tender: &Tender, stage: StageId) -> Result<(), TenderflowError> {
        let definition = get_stage_definition(stage);
        if tender.is_stage_done(stage) {
            return Err(TenderflowError::AlreadyCompleted(stage));
        }
        if definition.trigger_type == TriggerType::Manual {
            return Err(TenderflowError::ManualStage(stage));
        }
        if !system_condition_holds(stage, tender) {
            return Err(TenderflowError::ConditionsNotMet(stage));
        }
        self.check_order(tender, stage)
    }

    /// Award checks. The role must be literally `admin`.
    pub fn check_award(&self, tender: &Tender, caller: &UserId) -> Result<(), TenderflowError> {
        let role = tender
            .role_of(caller)
            .ok_or_else(|| TenderflowError::NotAMember(tender.tender_id.clone()))?;
        if !role.is_admin() {
            return Err(TenderflowError::AdminOnly);
        }
        let awarded = tender.award.as_ref().is_some_and(|award| award.awarded);
        if awarded || tender.is_stage_done(StageId::Loa) {
            return Err(TenderflowError::AlreadyCompleted(StageId::Loa));
        }
        self.check_order(tender, StageId::Loa)
    }

    fn check_order(&self, tender: &Tender, stage: StageId) -> Result<(), TenderflowError> {
        if !self.policy.strict_order {
            return Ok(());
        }
        match stage
            .predecessors()
            .iter()
            .find(|earlier| !tender.is_stage_done(**earlier))
        {
            Some(blocking) => Err(TenderflowError::OutOfOrder {
                stage,
                blocking: *blocking,
            }),
            None => Ok(()),
        }
    }
}

/// Whether the engine may complete `stage` on its own right now.
#[must_use]
pub fn system_condition_holds(stage: StageId, tender: &Tender) -> bool {
    match stage {
        StageId::Identification => true,
        _ => stage_eligibility(stage, tender).unwrap_or(false),
    }
}

/// Identity recorded for a system completion.
#[must_use]
pub fn system_actor(on_behalf_of: Option<&UserId>) -> UserId {
    on_behalf_of
        .cloned()
        .unwrap_or_else(|| UserId::new(SYSTEM_ACTOR))
}

// =============================================================================
// APPLICATION
// =============================================================================

/// Write a completion record and recompute derived fields.
///
/// Refuses to overwrite a record that is already done.
pub fn apply_completion(
    tender: &mut Tender,
    stage: StageId,
    by: &UserId,
    at: Timestamp,
    evidence_refs: Vec<String>,
) -> Result<(), TenderflowError> {
    if tender.is_stage_done(stage) {
        return Err(TenderflowError::AlreadyCompleted(stage));
    }
    tender.stage_completion.insert(
        stage,
        StageCompletionRecord::completed(by.clone(), at, evidence_refs),
    );
    recompute_progress(tender);
    tender.last_modified_by = Some(by.clone());
    tender.last_modified_at = at;
    Ok(())
}

/// Mark the tender awarded: stage 16 record, award block, status.
pub fn apply_award(
    tender: &mut Tender,
    by: &UserId,
    at: Timestamp,
    loa_ref: &str,
) -> Result<(), TenderflowError> {
    apply_completion(tender, StageId::Loa, by, at, vec![loa_ref.to_string()])?;
    let recommendation_ref = tender
        .award
        .as_ref()
        .and_then(|award| award.recommendation_ref.clone());
    tender.award = Some(Award {
        awarded: true,
        loa_ref: Some(loa_ref.to_string()),
        recommendation_ref,
        awarded_at: Some(at),
        awarded_by: Some(by.clone()),
    });
    tender.status = TenderStatus::Awarded;
    Ok(())
}

/// Bring `progress_percent` in line with the completion map.
pub fn recompute_progress(tender: &mut Tender) {
    tender.progress_percent = progress_percent(Some(&tender.stage_completion));
}

// =============================================================================
// AUDIT
// =============================================================================

/// Audit action name for a stage completion, e.g. `STAGE_6_BOQ_COMPLETED`.
#[must_use]
pub fn completion_action(stage: StageId) -> String {
    format!("STAGE_{}_COMPLETED", stage.as_str().to_uppercase())
}

/// Audit entry describing a completion that was just applied to `tender`.
#[must_use]
pub fn completion_audit(
    tender: &Tender,
    stage: StageId,
    by: &UserId,
    at: Timestamp,
    origin: CompletionOrigin,
    notes: Option<&str>,
) -> AuditEntry {
    let evidence = tender
        .stage_completion
        .get(&stage)
        .map(|record| record.evidence_refs.join(","))
        .unwrap_or_default();
    let mut entry = AuditEntry::new(
        tender.tender_id.clone(),
        completion_action(stage),
        by.clone(),
        at,
    )
    .with("stageId", stage.as_str())
    .with("origin", origin.as_str())
    .with("progressPercent", tender.progress_percent.to_string());
    if !evidence.is_empty() {
        entry = entry.with("evidenceRefs", evidence);
    }
    if let Some(text) = notes {
        entry = entry.with("notes", text);
    }
    entry
}

/// Audit entry for an award.
#[must_use]
pub fn award_audit(
    tender: &Tender,
    by: &UserId,
    at: Timestamp,
    loa_ref: &str,
    notes: Option<&str>,
) -> AuditEntry {
    let entry = AuditEntry::new(tender.tender_id.clone(), "TENDER_AWARDED", by.clone(), at)
        .with("stageId", StageId::Loa.as_str())
        .with("loaRef", loa_ref)
        .with("progressPercent", tender.progress_percent.to_string());
    match notes {
        Some(text) => entry.with("notes", text),
        None => entry,
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BoqState, RateAnalysisStatus, Role};

    fn user(id: &str) -> UserId {
        UserId::new(id)
    }

    fn tender_with(members: &[(&str, &str)]) -> Tender {
        let mut tender = Tender::new(TenderId::new("TND-000001"), "Canal lining");
        for (id, role) in members {
            tender.members_map.insert(user(id), Role::new(*role));
        }
        tender
    }

    fn complete(tender: &mut Tender, stage: StageId) {
        apply_completion(tender, stage, &user("u1"), Timestamp::from_millis(5), Vec::new())
            .expect("apply");
    }

    #[test]
    fn non_member_is_forbidden() {
        let tender = tender_with(&[("u1", "admin")]);
        let finalizer = StageFinalizer::default();
        let err = finalizer
            .check_manual(&tender, &user("stranger"), StageId::FollowUp)
            .expect_err("non-member");
        assert!(matches!(err, TenderflowError::NotAMember(_)));
    }

    #[test]
    fn manual_stage_role_gate() {
        let tender = tender_with(&[("eng", "engineer"), ("mgr", "tender_manager")]);
        let finalizer = StageFinalizer::default();
        assert!(
            finalizer
                .check_manual(&tender, &user("mgr"), StageId::FollowUp)
                .is_ok()
        );
        let err = finalizer
            .check_manual(&tender, &user("eng"), StageId::FollowUp)
            .expect_err("engineer");
        assert!(matches!(err, TenderflowError::RoleNotPermitted { .. }));
    }

    #[test]
    fn role_check_precedes_already_completed() {
        let mut tender = tender_with(&[("eng", "engineer")]);
        complete(&mut tender, StageId::Loa);
        let err = StageFinalizer::default()
            .check_manual(&tender, &user("eng"), StageId::Loa)
            .expect_err("role first");
        assert!(matches!(err, TenderflowError::RoleNotPermitted { .. }));
    }

    #[test]
    fn already_completed_precedes_auto_rejection() {
        let mut tender = tender_with(&[("u1", "admin")]);
        complete(&mut tender, StageId::Identification);
        let err = StageFinalizer::default()
            .check_manual(&tender, &user("u1"), StageId::Identification)
            .expect_err("done");
        assert_eq!(err, TenderflowError::AlreadyCompleted(StageId::Identification));
    }

    #[test]
    fn identification_open_to_any_member() {
        let tender = tender_with(&[("clerk", "viewer")]);
        assert!(
            StageFinalizer::default()
                .check_manual(&tender, &user("clerk"), StageId::Identification)
                .is_ok()
        );
    }

    #[test]
    fn auto_stage_rejected_even_for_admin() {
        let tender = tender_with(&[("u1", "admin")]);
        let err = StageFinalizer::default()
            .check_manual(&tender, &user("u1"), StageId::Boq)
            .expect_err("auto");
        assert_eq!(err, TenderflowError::AutoStage(StageId::Boq));
    }

    #[test]
    fn hybrid_stage_role_or_eligibility() {
        let tender = tender_with(&[("viewer", "viewer"), ("mgr", "tender_manager")]);
        let finalizer = StageFinalizer::default();
        assert!(
            finalizer
                .check_manual(&tender, &user("mgr"), StageId::Costing)
                .is_ok()
        );
        assert!(
            finalizer
                .check_manual(&tender, &user("viewer"), StageId::Costing)
                .is_err()
        );
    }

    #[test]
    fn strict_order_blocks_skipping() {
        let mut tender = tender_with(&[("u1", "admin")]);
        complete(&mut tender, StageId::Identification);
        let finalizer = StageFinalizer::new(WorkflowPolicy::strict());
        let err = finalizer
            .check_manual(&tender, &user("u1"), StageId::SiteVisit)
            .expect_err("ordered");
        assert_eq!(
            err,
            TenderflowError::OutOfOrder {
                stage: StageId::SiteVisit,
                blocking: StageId::Documents
            }
        );
        assert!(
            StageFinalizer::default()
                .check_manual(&tender, &user("u1"), StageId::SiteVisit)
                .is_ok()
        );
    }

    #[test]
    fn system_path_requires_condition() {
        let mut tender = tender_with(&[]);
        let finalizer = StageFinalizer::default();
        assert!(finalizer.check_system(&tender, StageId::Identification).is_ok());
        assert_eq!(
            finalizer.check_system(&tender, StageId::Boq),
            Err(TenderflowError::ConditionsNotMet(StageId::Boq))
        );
        assert_eq!(
            finalizer.check_system(&tender, StageId::Costing),
            Err(TenderflowError::ConditionsNotMet(StageId::Costing))
        );
        assert_eq!(
            finalizer.check_system(&tender, StageId::FollowUp),
            Err(TenderflowError::ManualStage(StageId::FollowUp))
        );

        tender.boq = Some(BoqState {
            uploaded: true,
            rate_analysis_status: RateAnalysisStatus::Completed,
            summary_ref: Some("boq.xlsx".into()),
        });
        assert!(finalizer.check_system(&tender, StageId::Boq).is_ok());
    }

    #[test]
    fn award_requires_literal_admin() {
        let tender = tender_with(&[("mgr", "tender_manager"), ("boss", "admin")]);
        let finalizer = StageFinalizer::default();
        assert_eq!(
            finalizer.check_award(&tender, &user("mgr")),
            Err(TenderflowError::AdminOnly)
        );
        assert!(finalizer.check_award(&tender, &user("boss")).is_ok());
    }

    #[test]
    fn apply_award_fills_block() {
        let mut tender = tender_with(&[("boss", "admin")]);
        apply_award(
            &mut tender,
            &user("boss"),
            Timestamp::from_millis(9),
            "loa/123.pdf",
        )
        .expect("award");
        assert_eq!(tender.status, TenderStatus::Awarded);
        assert_eq!(tender.progress_percent, 6);
        let record = tender.stage_completion.get(&StageId::Loa).expect("record");
        assert_eq!(record.evidence_refs, vec!["loa/123.pdf".to_string()]);
        assert!(tender.award.as_ref().is_some_and(|a| a.awarded));
        assert_eq!(
            StageFinalizer::default().check_award(&tender, &user("boss")),
            Err(TenderflowError::AlreadyCompleted(StageId::Loa))
        );
    }

    #[test]
    fn apply_never_overwrites() {
        let mut tender = tender_with(&[]);
        complete(&mut tender, StageId::Documents);
        let again = apply_completion(
            &mut tender,
            StageId::Documents,
            &user("other"),
            Timestamp::from_millis(99),
            Vec::new(),
        );
        assert!(again.is_err());
        let record = tender.stage_completion.get(&StageId::Documents).expect("record");
        assert_eq!(record.by, Some(user("u1")));
    }

    #[test]
    fn request_validation_limits() {
        let too_many = vec!["x".to_string(); MAX_EVIDENCE_REFS + 1];
        assert!(matches!(
            FinalizeRequest::parse("TND-000001", "4_sitevisit", too_many, None),
            Err(TenderflowError::InvalidArgument(_))
        ));
        assert!(matches!(
            FinalizeRequest::parse("", "4_sitevisit", Vec::new(), None),
            Err(TenderflowError::InvalidArgument(_))
        ));
        assert!(matches!(
            FinalizeRequest::parse("TND-000001", "99_nope", Vec::new(), None),
            Err(TenderflowError::UnknownStage(_))
        ));
        assert!(matches!(
            AwardRequest::parse("TND-000001", "", None),
            Err(TenderflowError::InvalidArgument(_))
        ));
    }

    #[test]
    fn action_names() {
        assert_eq!(completion_action(StageId::Boq), "STAGE_6_BOQ_COMPLETED");
        assert_eq!(
            completion_action(StageId::Identification),
            "STAGE_1_IDENTIFICATION_COMPLETED"
        );
    }
}
