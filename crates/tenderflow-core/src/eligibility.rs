//! # Eligibility Evaluator
//!
//! Derived auto-completion predicates over the state other subsystems own.
//!
//! Only three stages carry a computable predicate:
//! - `2_documents`: every mandatory checklist entry is uploaded
//! - `6_boq`: BOQ uploaded, summary present, rate analysis completed
//! - `9_approvals`: every defined internal approval is approved
//!
//! Every function here is read-only and may be called speculatively, for
//! instance to render "ready to complete" hints in a client.

use crate::system::StageId;
use crate::types::{ApprovalStatus, RateAnalysisStatus, Tender};
use std::collections::BTreeMap;

/// Stage 2: checklist exists, has at least one mandatory entry, and all
/// mandatory entries are uploaded.
#[must_use]
pub fn is_documents_eligible(tender: &Tender) -> bool {
    let Some(checklist) = &tender.document_checklist else {
        return false;
    };
    let mut mandatory = checklist.values().filter(|item| item.required).peekable();
    if mandatory.peek().is_none() {
        return false;
    }
    mandatory.all(|item| item.uploaded)
}

/// Stage 6: BOQ uploaded with a non-empty summary and completed rate analysis.
#[must_use]
pub fn is_boq_eligible(tender: &Tender) -> bool {
    tender.boq.as_ref().is_some_and(|boq| {
        boq.uploaded
            && boq.summary_ref.as_deref().is_some_and(|s| !s.is_empty())
            && boq.rate_analysis_status == RateAnalysisStatus::Completed
    })
}

/// Stage 9: at least one approval defined, and every defined approval approved.
#[must_use]
pub fn is_approvals_eligible(tender: &Tender) -> bool {
    let Some(approvals) = &tender.approvals else {
        return false;
    };
    let mut defined = approvals.defined().peekable();
    if defined.peek().is_none() {
        return false;
    }
    defined.all(|approval| approval.status == ApprovalStatus::Approved)
}

/// Predicate for a single stage, `None` when the stage has no predicate.
#[must_use]
pub fn stage_eligibility(stage: StageId, tender: &Tender) -> Option<bool> {
    match stage {
        StageId::Documents => Some(is_documents_eligible(tender)),
        StageId::Boq => Some(is_boq_eligible(tender)),
        StageId::Approvals => Some(is_approvals_eligible(tender)),
        _ => None,
    }
}

/// All predicates at once. Stages without a predicate are absent.
#[must_use]
pub fn evaluate(tender: &Tender) -> BTreeMap<StageId, bool> {
    [StageId::Documents, StageId::Boq, StageId::Approvals]
        .into_iter()
        .filter_map(|stage| stage_eligibility(stage, tender).map(|ok| (stage, ok)))
        .collect()
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ApprovalInfo, Approvals, BoqState, DocumentChecklistItem, TenderId};

    fn tender() -> Tender {
        Tender::new(TenderId::new("TND-000001"), "Bridge")
    }

    fn item(required: bool, uploaded: bool) -> DocumentChecklistItem {
        DocumentChecklistItem {
            required,
            uploaded,
            file_ref: None,
        }
    }

    #[test]
    fn documents_require_a_mandatory_entry() {
        let mut t = tender();
        assert!(!is_documents_eligible(&t));

        t.document_checklist = Some(BTreeMap::new());
        assert!(!is_documents_eligible(&t));

        t.document_checklist = Some(BTreeMap::from([("nit".to_string(), item(false, true))]));
        assert!(!is_documents_eligible(&t));
    }

    #[test]
    fn documents_ignore_optional_entries() {
        let mut t = tender();
        t.document_checklist = Some(BTreeMap::from([
            ("nit".to_string(), item(true, true)),
            ("drawings".to_string(), item(false, false)),
        ]));
        assert!(is_documents_eligible(&t));

        if let Some(checklist) = t.document_checklist.as_mut() {
            checklist.insert("emd".to_string(), item(true, false));
        }
        assert!(!is_documents_eligible(&t));
    }

    #[test]
    fn boq_needs_all_three_conditions() {
        let mut t = tender();
        t.boq = Some(BoqState {
            uploaded: true,
            rate_analysis_status: RateAnalysisStatus::Completed,
            summary_ref: Some("boq/summary.pdf".into()),
        });
        assert!(is_boq_eligible(&t));

        if let Some(boq) = t.boq.as_mut() {
            boq.summary_ref = Some(String::new());
        }
        assert!(!is_boq_eligible(&t));

        t.boq = Some(BoqState {
            uploaded: true,
            rate_analysis_status: RateAnalysisStatus::InProgress,
            summary_ref: Some("boq/summary.pdf".into()),
        });
        assert!(!is_boq_eligible(&t));
    }

    #[test]
    fn approvals_all_defined_must_approve() {
        let mut t = tender();
        t.approvals = Some(Approvals::default());
        assert!(!is_approvals_eligible(&t));

        t.approvals = Some(Approvals {
            engineering: Some(ApprovalInfo::with_status(ApprovalStatus::Approved)),
            finance: Some(ApprovalInfo::with_status(ApprovalStatus::Approved)),
            management: None,
        });
        assert!(is_approvals_eligible(&t));

        t.approvals = Some(Approvals {
            engineering: Some(ApprovalInfo::with_status(ApprovalStatus::Approved)),
            finance: Some(ApprovalInfo::with_status(ApprovalStatus::Rejected)),
            management: None,
        });
        assert!(!is_approvals_eligible(&t));
    }

    #[test]
    fn evaluate_covers_only_predicate_stages() {
        let result = evaluate(&tender());
        assert_eq!(result.len(), 3);
        assert_eq!(result.get(&StageId::Documents), Some(&false));
        assert!(!result.contains_key(&StageId::Identification));
        assert_eq!(stage_eligibility(StageId::Costing, &tender()), None);
    }
}
