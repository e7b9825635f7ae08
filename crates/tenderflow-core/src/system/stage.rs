//! # Stage Registry
//!
//! The authoritative, ordered catalogue of the 16 tender stages.
//!
//! ## Stage Definitions
//!
//! | # | Id | Trigger | Required roles |
//! |---|----|---------|----------------|
//! | 1 | `1_identification` | auto | any member |
//! | 2 | `2_documents` | auto | any member |
//! | 3 | `3_prebid` | hybrid | admin, tender_manager, engineer |
//! | 4 | `4_sitevisit` | manual | admin, tender_manager, engineer |
//! | 5 | `5_technical` | manual | admin, tender_manager, engineer |
//! | 6 | `6_boq` | auto | any member |
//! | 7 | `7_costing` | hybrid | admin, tender_manager |
//! | 8 | `8_docu_prep` | hybrid | admin, tender_manager |
//! | 9 | `9_approvals` | auto | any member |
//! | 10 | `10_submission` | hybrid | admin, tender_manager |
//! | 11 | `11_followup` | manual | admin, tender_manager |
//! | 12 | `12_tech_opening` | manual | admin, tender_manager |
//! | 13 | `13_fin_opening` | manual | admin, tender_manager |
//! | 14 | `14_negotiation` | manual | admin, tender_manager |
//! | 15 | `15_recommendation` | manual | admin, tender_manager |
//! | 16 | `16_loa` | manual | admin |
//!
//! The table is compiled in and never changes at runtime. Every lookup is a
//! total function over [`StageId`]; there is no "unknown stage" case once a
//! string has been parsed.

use crate::primitives::TOTAL_STAGES;
use crate::types::{Role, TenderflowError};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::str::FromStr;

// =============================================================================
// STAGE ID
// =============================================================================

/// The 16 stage identifiers, in lifecycle order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StageId {
    Identification,
    Documents,
    PreBid,
    SiteVisit,
    Technical,
    Boq,
    Costing,
    DocumentPreparation,
    Approvals,
    Submission,
    FollowUp,
    TechnicalOpening,
    FinancialOpening,
    Negotiation,
    Recommendation,
    Loa,
}

/// Fixed iteration order used by every other component.
pub const STAGE_ORDER: [StageId; TOTAL_STAGES] = [
    StageId::Identification,
    StageId::Documents,
    StageId::PreBid,
    StageId::SiteVisit,
    StageId::Technical,
    StageId::Boq,
    StageId::Costing,
    StageId::DocumentPreparation,
    StageId::Approvals,
    StageId::Submission,
    StageId::FollowUp,
    StageId::TechnicalOpening,
    StageId::FinancialOpening,
    StageId::Negotiation,
    StageId::Recommendation,
    StageId::Loa,
];

impl StageId {
    /// Wire identifier, e.g. `"6_boq"`.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            StageId::Identification => "1_identification",
            StageId::Documents => "2_documents",
            StageId::PreBid => "3_prebid",
            StageId::SiteVisit => "4_sitevisit",
            StageId::Technical => "5_technical",
            StageId::Boq => "6_boq",
            StageId::Costing => "7_costing",
            StageId::DocumentPreparation => "8_docu_prep",
            StageId::Approvals => "9_approvals",
            StageId::Submission => "10_submission",
            StageId::FollowUp => "11_followup",
            StageId::TechnicalOpening => "12_tech_opening",
            StageId::FinancialOpening => "13_fin_opening",
            StageId::Negotiation => "14_negotiation",
            StageId::Recommendation => "15_recommendation",
            StageId::Loa => "16_loa",
        }
    }

    /// Zero-based position in [`STAGE_ORDER`].
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// One-based stage number.
    #[must_use]
    pub const fn number(self) -> u8 {
        (self as u8).saturating_add(1)
    }

    /// The registry entry for this stage.
    #[must_use]
    pub fn definition(self) -> &'static StageDefinition {
        get_stage_definition(self)
    }

    /// Get the next stage, if any.
    #[must_use]
    pub fn next(self) -> Option<StageId> {
        STAGE_ORDER.get(self.index().saturating_add(1)).copied()
    }

    /// Get the previous stage, if any.
    #[must_use]
    pub fn previous(self) -> Option<StageId> {
        self.index()
            .checked_sub(1)
            .and_then(|i| STAGE_ORDER.get(i))
            .copied()
    }

    /// Stages that come before this one, in order.
    #[must_use]
    pub fn predecessors(self) -> &'static [StageId] {
        &STAGE_ORDER[..self.index()]
    }

    /// Check if this stage is terminal (award / LOA).
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, StageId::Loa)
    }
}

impl std::fmt::Display for StageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StageId {
    type Err = TenderflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        STAGE_ORDER
            .iter()
            .find(|id| id.as_str() == s)
            .copied()
            .ok_or_else(|| TenderflowError::UnknownStage(s.to_string()))
    }
}

impl Serialize for StageId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for StageId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

// =============================================================================
// TRIGGER TYPE
// =============================================================================

/// How a stage may become complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerType {
    /// Completes only from derived conditions (system path).
    Auto,
    /// Requires explicit user action.
    Manual,
    /// Either derived conditions or a permitted user.
    Hybrid,
}

impl TriggerType {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerType::Auto => "auto",
            TriggerType::Manual => "manual",
            TriggerType::Hybrid => "hybrid",
        }
    }
}

// =============================================================================
// STAGE DEFINITION
// =============================================================================

/// Immutable metadata for one stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StageDefinition {
    pub id: StageId,
    pub number: u8,
    pub title: &'static str,
    pub description: &'static str,
    pub completion_phrase: &'static str,
    pub trigger_type: TriggerType,
    /// Empty means any member may finalize.
    pub required_roles: &'static [&'static str],
    /// Advisory only; not enforced.
    pub evidence_required: bool,
    /// Human-readable description of the derived predicate. Not parsed.
    pub auto_conditions: Option<&'static str>,
}

impl StageDefinition {
    /// Whether a member holding `role` may finalize this stage by hand.
    ///
    /// Empty `required_roles` admits any member; `admin` always passes.
    #[must_use]
    pub fn permits(&self, role: &Role) -> bool {
        self.required_roles.is_empty()
            || role.is_admin()
            || self.required_roles.contains(&role.as_str())
    }
}

const ENGINEERING_ROLES: &[&str] = &["admin", "tender_manager", "engineer"];
const MANAGER_ROLES: &[&str] = &["admin", "tender_manager"];
const ADMIN_ONLY: &[&str] = &["admin"];
const ANY_MEMBER: &[&str] = &[];

/// The registry, indexed by [`StageId::index`].
pub const STAGE_DEFINITIONS: [StageDefinition; TOTAL_STAGES] = [
    StageDefinition {
        id: StageId::Identification,
        number: 1,
        title: "Tender Identification",
        description: "Basic tender information added to the system",
        completion_phrase: "Basic Tender information added. Stage 1 completed.",
        trigger_type: TriggerType::Auto,
        required_roles: ANY_MEMBER,
        evidence_required: false,
        auto_conditions: Some("Auto-completes when tender document is created"),
    },
    StageDefinition {
        id: StageId::Documents,
        number: 2,
        title: "Tender Document Download",
        description: "All mandatory tender documents uploaded",
        completion_phrase: "All mandatory tender documents uploaded. Stage 2 completed.",
        trigger_type: TriggerType::Auto,
        required_roles: ANY_MEMBER,
        evidence_required: false,
        auto_conditions: Some(
            "Auto-completes when all mandatory documents in checklist are uploaded",
        ),
    },
    StageDefinition {
        id: StageId::PreBid,
        number: 3,
        title: "Pre-Bid Preparation",
        description: "Pre-bid queries addressed or meeting status set",
        completion_phrase: "Pre-bid queries addressed / pre-bid meeting status set. Stage 3 completed.",
        trigger_type: TriggerType::Hybrid,
        required_roles: ENGINEERING_ROLES,
        evidence_required: false,
        auto_conditions: Some("Auto when prebid.queries entered or user marks \"No Query\""),
    },
    StageDefinition {
        id: StageId::SiteVisit,
        number: 4,
        title: "Site Visit",
        description: "Site visit report uploaded or marked not required",
        completion_phrase: "Site visit report uploaded or marked not required. Stage 4 completed.",
        trigger_type: TriggerType::Manual,
        required_roles: ENGINEERING_ROLES,
        evidence_required: true,
        auto_conditions: Some(
            "Manual when siteVisit.reportRef uploaded or user marks \"Not Required\"",
        ),
    },
    StageDefinition {
        id: StageId::Technical,
        number: 5,
        title: "Technical Study & Compliance Check",
        description: "Technical compliance reviewed and Go/No-Go decision made",
        completion_phrase: "Technical compliance reviewed and summary marked. Stage 5 completed (Go).",
        trigger_type: TriggerType::Manual,
        required_roles: ENGINEERING_ROLES,
        evidence_required: true,
        auto_conditions: None,
    },
    StageDefinition {
        id: StageId::Boq,
        number: 6,
        title: "BOQ Study & Rate Analysis",
        description: "BOQ rate analysis completed for all items",
        completion_phrase: "BOQ rate analysis completed and BOQ summary generated. Stage 6 completed.",
        trigger_type: TriggerType::Auto,
        required_roles: ANY_MEMBER,
        evidence_required: false,
        auto_conditions: Some(
            "Auto when every BOQ item has rateAnalysis.status == \"completed\" and boq.summaryRef exists",
        ),
    },
    StageDefinition {
        id: StageId::Costing,
        number: 7,
        title: "Tender Costing & Financial Compilation",
        description: "Final financial summary created and approved",
        completion_phrase: "Final financial summary created and approved. Stage 6-7 completed.",
        trigger_type: TriggerType::Hybrid,
        required_roles: MANAGER_ROLES,
        evidence_required: true,
        auto_conditions: Some("Auto when financialSummary.approved == true or Manager confirms"),
    },
    StageDefinition {
        id: StageId::DocumentPreparation,
        number: 8,
        title: "Tender Document Preparation",
        description: "All technical documents uploaded and checklist complete",
        completion_phrase: "All technical documents uploaded and checklist complete. Stage 8 completed.",
        trigger_type: TriggerType::Hybrid,
        required_roles: MANAGER_ROLES,
        evidence_required: false,
        auto_conditions: Some(
            "Auto when technical document checklist is complete plus user confirmation",
        ),
    },
    StageDefinition {
        id: StageId::Approvals,
        number: 9,
        title: "Internal Approvals",
        description: "All required internal approvals obtained",
        completion_phrase: "All required internal approvals obtained. Stage 9 completed.",
        trigger_type: TriggerType::Auto,
        required_roles: ANY_MEMBER,
        evidence_required: false,
        auto_conditions: Some(
            "Auto when all required approvers in approvals have status == \"approved\"",
        ),
    },
    StageDefinition {
        id: StageId::Submission,
        number: 10,
        title: "Tender Submission",
        description: "Tender submitted online or physical proof uploaded",
        completion_phrase: "Tender submitted (Online/Physical) and proof uploaded. Stage 10 completed.",
        trigger_type: TriggerType::Hybrid,
        required_roles: MANAGER_ROLES,
        evidence_required: true,
        auto_conditions: Some(
            "Cloud Function validates online submission or physical proof uploaded",
        ),
    },
    StageDefinition {
        id: StageId::FollowUp,
        number: 11,
        title: "Post-Submission Follow-up",
        description: "All post-submission clarifications addressed",
        completion_phrase: "All post-submission clarifications addressed. Stage 11 completed.",
        trigger_type: TriggerType::Manual,
        required_roles: MANAGER_ROLES,
        evidence_required: false,
        auto_conditions: None,
    },
    StageDefinition {
        id: StageId::TechnicalOpening,
        number: 12,
        title: "Technical Bid Opening",
        description: "Technical evaluation captured and sheet uploaded",
        completion_phrase: "Technical evaluation captured and sheet uploaded. Stage 12 completed.",
        trigger_type: TriggerType::Manual,
        required_roles: MANAGER_ROLES,
        evidence_required: true,
        auto_conditions: None,
    },
    StageDefinition {
        id: StageId::FinancialOpening,
        number: 13,
        title: "Financial Bid Opening",
        description: "Financial opening recorded and ranking entered",
        completion_phrase: "Financial opening recorded and ranking entered. Stage 13 completed.",
        trigger_type: TriggerType::Manual,
        required_roles: MANAGER_ROLES,
        evidence_required: true,
        auto_conditions: None,
    },
    StageDefinition {
        id: StageId::Negotiation,
        number: 14,
        title: "Negotiation / Justification",
        description: "Negotiation completed or marked not applicable",
        completion_phrase: "Negotiation / justification completed (or not applicable). Stage 14 completed.",
        trigger_type: TriggerType::Manual,
        required_roles: MANAGER_ROLES,
        evidence_required: false,
        auto_conditions: None,
    },
    StageDefinition {
        id: StageId::Recommendation,
        number: 15,
        title: "Award Recommendation",
        description: "Award recommendation document uploaded and recorded",
        completion_phrase: "Award recommendation recorded. Stage 15 completed.",
        trigger_type: TriggerType::Manual,
        required_roles: MANAGER_ROLES,
        evidence_required: true,
        auto_conditions: None,
    },
    StageDefinition {
        id: StageId::Loa,
        number: 16,
        title: "LOA / Work Order (Award)",
        description: "LOA received and tender marked as awarded",
        completion_phrase: "LOA received and tender marked as Awarded. Stage 16 completed.",
        trigger_type: TriggerType::Manual,
        required_roles: ADMIN_ONLY,
        evidence_required: true,
        auto_conditions: None,
    },
];

// =============================================================================
// LOOKUPS
// =============================================================================

/// Registry lookup. Total over the closed set of ids.
#[must_use]
pub fn get_stage_definition(id: StageId) -> &'static StageDefinition {
    &STAGE_DEFINITIONS[id.index()]
}

/// The 16 ids in lifecycle order.
#[must_use]
pub fn get_ordered_stage_ids() -> &'static [StageId; TOTAL_STAGES] {
    &STAGE_ORDER
}

/// All definitions in lifecycle order.
pub fn stage_definitions() -> impl Iterator<Item = &'static StageDefinition> {
    STAGE_ORDER.iter().map(|id| get_stage_definition(*id))
}

// =============================================================================
// TESTS
// =============================================================================
