//! # Core Type Definitions
//!
//! This module contains the data model shared by every part of the engine:
//! - Identifiers (`TenderId`, `UserId`, `Role`, `Timestamp`)
//! - The stored tender document and its completion records
//! - Read-only projections owned by other subsystems (checklist, BOQ, approvals)
//! - Audit entries
//! - Error types (`TenderflowError`, `ErrorKind`)
//!
//! ## Determinism Guarantees
//!
//! All maps use `BTreeMap` so iteration order (and therefore serialized
//! output) is stable. No floating-point fields exist in the model.

use crate::primitives::ADMIN_ROLE;
use crate::system::StageId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

// =============================================================================
// IDENTIFIERS
// =============================================================================

/// Identifier of a tender document.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenderId(pub String);

impl TenderId {
    #[must_use]
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TenderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of an authenticated user (or the engine itself, see `SYSTEM_ACTOR`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    #[must_use]
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A role name from a tender's membership map.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Role(pub String);

impl Role {
    #[must_use]
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `admin` passes every role gate.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.0 == ADMIN_ROLE
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Server-assigned time, milliseconds since the Unix epoch.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct Timestamp(pub u64);

impl Timestamp {
    #[must_use]
    pub const fn from_millis(millis: u64) -> Self {
        Self(millis)
    }

    /// Current wall-clock time. A clock before the epoch reads as zero.
    #[must_use]
    pub fn now() -> Self {
        let millis = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        Self(millis)
    }

    #[must_use]
    pub const fn millis(self) -> u64 {
        self.0
    }
}

// =============================================================================
// STAGE COMPLETION
// =============================================================================

/// The stored fact that a stage is done.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageCompletionRecord {
    pub done: bool,
    pub by: Option<UserId>,
    pub at: Timestamp,
    #[serde(default)]
    pub evidence_refs: Vec<String>,
}

impl StageCompletionRecord {
    /// Create a completed record.
    #[must_use]
    pub fn completed(by: UserId, at: Timestamp, evidence_refs: Vec<String>) -> Self {
        Self {
            done: true,
            by: Some(by),
            at,
            evidence_refs,
        }
    }
}

/// Per-tender completion mapping, keyed by stage.
pub type CompletionMap = BTreeMap<StageId, StageCompletionRecord>;

// =============================================================================
// RELATED STATE (owned by other subsystems, read-only here)
// =============================================================================

/// One entry of the tender's document checklist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct DocumentChecklistItem {
    pub required: bool,
    pub uploaded: bool,
    #[serde(default)]
    pub file_ref: Option<String>,
}

/// Rate-analysis state of the BOQ.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RateAnalysisStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
}

/// BOQ tracking block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct BoqState {
    pub uploaded: bool,
    pub rate_analysis_status: RateAnalysisStatus,
    #[serde(default)]
    pub summary_ref: Option<String>,
}

/// Decision state of one internal approval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

/// One internal approval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalInfo {
    pub status: ApprovalStatus,
    #[serde(default)]
    pub by: Option<UserId>,
    #[serde(default)]
    pub at: Option<Timestamp>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl ApprovalInfo {
    #[must_use]
    pub fn with_status(status: ApprovalStatus) -> Self {
        Self {
            status,
            ..Self::default()
        }
    }
}

/// The three approvals a tender may require.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Approvals {
    #[serde(default)]
    pub engineering: Option<ApprovalInfo>,
    #[serde(default)]
    pub finance: Option<ApprovalInfo>,
    #[serde(default)]
    pub management: Option<ApprovalInfo>,
}

impl Approvals {
    /// The approvals that are defined, in fixed order.
    pub fn defined(&self) -> impl Iterator<Item = &ApprovalInfo> {
        [&self.engineering, &self.finance, &self.management]
            .into_iter()
            .flatten()
    }
}

/// Award block, written only by the award path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Award {
    pub awarded: bool,
    #[serde(default)]
    pub loa_ref: Option<String>,
    #[serde(default)]
    pub recommendation_ref: Option<String>,
    #[serde(default)]
    pub awarded_at: Option<Timestamp>,
    #[serde(default)]
    pub awarded_by: Option<UserId>,
}

/// Business status of a tender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TenderStatus {
    #[default]
    Draft,
    Active,
    ToSubmit,
    Submitted,
    Won,
    Lost,
    Archived,
    Awarded,
}

// =============================================================================
// TENDER
// =============================================================================

/// A tender document.
///
/// This engine owns `stage_completion`, `progress_percent`, and (on award)
/// `award` and `status`. Everything else is read-only input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tender {
    pub tender_id: TenderId,
    pub title: String,
    #[serde(default)]
    pub status: TenderStatus,
    #[serde(default)]
    pub members_map: BTreeMap<UserId, Role>,
    #[serde(default)]
    pub created_by: Option<UserId>,
    #[serde(default)]
    pub created_at: Timestamp,
    #[serde(default)]
    pub last_modified_by: Option<UserId>,
    #[serde(default)]
    pub last_modified_at: Timestamp,
    #[serde(default)]
    pub stage_completion: CompletionMap,
    #[serde(default)]
    pub progress_percent: u8,
    #[serde(default)]
    pub document_checklist: Option<BTreeMap<String, DocumentChecklistItem>>,
    #[serde(default)]
    pub boq: Option<BoqState>,
    #[serde(default)]
    pub approvals: Option<Approvals>,
    #[serde(default)]
    pub award: Option<Award>,
}

impl Tender {
    /// Create a tender with no completed stages.
    #[must_use]
    pub fn new(tender_id: TenderId, title: impl Into<String>) -> Self {
        Self {
            tender_id,
            title: title.into(),
            status: TenderStatus::Draft,
            members_map: BTreeMap::new(),
            created_by: None,
            created_at: Timestamp::default(),
            last_modified_by: None,
            last_modified_at: Timestamp::default(),
            stage_completion: CompletionMap::new(),
            progress_percent: 0,
            document_checklist: None,
            boq: None,
            approvals: None,
            award: None,
        }
    }

    /// Role of `user` in this tender, if a member.
    #[must_use]
    pub fn role_of(&self, user: &UserId) -> Option<&Role> {
        self.members_map.get(user)
    }

    /// Whether `stage` has a record with `done == true`.
    #[must_use]
    pub fn is_stage_done(&self, stage: StageId) -> bool {
        self.stage_completion
            .get(&stage)
            .is_some_and(|record| record.done)
    }
}

// =============================================================================
// AUDIT
// =============================================================================

/// One audit log line. Appended in the same transaction as the change it describes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    /// Assigned by the store; zero until committed.
    pub sequence: u64,
    pub tender_id: TenderId,
    pub action: String,
    pub performed_by: UserId,
    pub timestamp: Timestamp,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl AuditEntry {
    #[must_use]
    pub fn new(
        tender_id: TenderId,
        action: impl Into<String>,
        performed_by: UserId,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            sequence: 0,
            tender_id,
            action: action.into(),
            performed_by,
            timestamp,
            metadata: BTreeMap::new(),
        }
    }

    /// Attach a metadata key.
    #[must_use]
    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Failure taxonomy exposed to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    Unauthenticated,
    Forbidden,
    NotFound,
    AlreadyCompleted,
    InvalidArgument,
    Internal,
}

impl ErrorKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Unauthenticated => "unauthenticated",
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::NotFound => "not-found",
            ErrorKind::AlreadyCompleted => "already-completed",
            ErrorKind::InvalidArgument => "invalid-argument",
            ErrorKind::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur in the workflow engine.
///
/// - No silent failures
/// - Use `Result<T, TenderflowError>` for fallible operations
/// - The engine never panics; every failure is a value
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TenderflowError {
    /// No caller identity was presented.
    #[error("User must be authenticated")]
    Unauthenticated,

    /// The caller is not in the tender's membership map.
    #[error("You do not have access to tender {0}")]
    NotAMember(TenderId),

    /// The caller's role is not allowed to finalize the stage.
    #[error("Role '{role}' cannot complete stage {stage}")]
    RoleNotPermitted { role: Role, stage: StageId },

    /// Auto stages only complete through the system path.
    #[error("Stage {0} completes automatically and cannot be finalized manually")]
    AutoStage(StageId),

    /// Manual stages only complete through an explicit user request.
    #[error("Stage {0} requires explicit user action")]
    ManualStage(StageId),

    /// The stage's derived conditions do not currently hold.
    #[error("Stage {0} conditions not met")]
    ConditionsNotMet(StageId),

    /// Only a member with role `admin` may award a tender.
    #[error("Only admins can award tenders")]
    AdminOnly,

    /// Sequential ordering is enforced and an earlier stage is still pending.
    #[error("Stage {stage} cannot be completed before stage {blocking}")]
    OutOfOrder { stage: StageId, blocking: StageId },

    /// The tender does not exist.
    #[error("Tender not found: {0}")]
    TenderNotFound(TenderId),

    /// The stage identifier is not one of the 16 known ids.
    #[error("Unknown stage: {0}")]
    UnknownStage(String),

    /// The stage is already done; the existing record is left untouched.
    #[error("Stage {0} already completed")]
    AlreadyCompleted(StageId),

    /// A request field is missing, empty, or out of bounds.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The storage layer failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// A stored record could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl TenderflowError {
    /// Collapse onto the caller-facing taxonomy.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            TenderflowError::Unauthenticated => ErrorKind::Unauthenticated,
            TenderflowError::NotAMember(_)
            | TenderflowError::RoleNotPermitted { .. }
            | TenderflowError::AutoStage(_)
            | TenderflowError::ManualStage(_)
            | TenderflowError::ConditionsNotMet(_)
            | TenderflowError::AdminOnly
            | TenderflowError::OutOfOrder { .. } => ErrorKind::Forbidden,
            TenderflowError::TenderNotFound(_) | TenderflowError::UnknownStage(_) => {
                ErrorKind::NotFound
            }
            TenderflowError::AlreadyCompleted(_) => ErrorKind::AlreadyCompleted,
            TenderflowError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            TenderflowError::Storage(_) | TenderflowError::Serialization(_) => ErrorKind::Internal,
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_role_detection() {
        assert!(Role::new("admin").is_admin());
        assert!(!Role::new("Admin").is_admin());
        assert!(!Role::new("tender_manager").is_admin());
    }

    #[test]
    fn approvals_defined_skips_missing() {
        let approvals = Approvals {
            engineering: Some(ApprovalInfo::with_status(ApprovalStatus::Approved)),
            finance: None,
            management: Some(ApprovalInfo::with_status(ApprovalStatus::Pending)),
        };
        assert_eq!(approvals.defined().count(), 2);
    }

    #[test]
    fn new_tender_has_no_progress() {
        let tender = Tender::new(TenderId::new("TND-000001"), "Road works");
        assert!(tender.stage_completion.is_empty());
        assert_eq!(tender.progress_percent, 0);
        assert!(!tender.is_stage_done(StageId::Identification));
    }

    #[test]
    fn error_kinds_follow_taxonomy() {
        assert_eq!(
            TenderflowError::Unauthenticated.kind(),
            ErrorKind::Unauthenticated
        );
        assert_eq!(
            TenderflowError::AutoStage(StageId::Boq).kind(),
            ErrorKind::Forbidden
        );
        assert_eq!(
            TenderflowError::UnknownStage("17_party".into()).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            TenderflowError::AlreadyCompleted(StageId::Loa).kind(),
            ErrorKind::AlreadyCompleted
        );
        assert_eq!(
            TenderflowError::Storage("disk".into()).kind(),
            ErrorKind::Internal
        );
        assert_eq!(ErrorKind::NotFound.as_str(), "not-found");
    }
}
