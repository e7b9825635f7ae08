//! # tenderflow-core
//!
//! The tender stage workflow engine - THE LOGIC.
//!
//! Every tender moves through a fixed catalogue of 16 stages, from
//! identification to the letter of award. This crate owns:
//! - the stage registry and the integer progress rollup (`system`)
//! - the derived auto-completion predicates (`eligibility`)
//! - the single authoritative completion path (`finalizer`)
//! - tender storage, in memory or on redb (`store`, `storage`, `formats`)
//! - whole-workflow snapshots for file storage and export (`export`)
//! - the facade the binary drives (`workflow`)
//!
//! ## Architectural Constraints
//!
//! - No async, no network dependencies (pure Rust)
//! - No floats: progress is `(100 * k + 8) / 16`
//! - No clock reads: callers pass the current `Timestamp`
//! - A completed stage is never overwritten and never un-completed

// =============================================================================
// MODULES
// =============================================================================

pub mod eligibility;
pub mod export;
pub mod finalizer;
pub mod formats;
pub mod primitives;
pub mod storage;
pub mod store;
pub mod system;
pub mod types;
pub mod workflow;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{
    ApprovalInfo, ApprovalStatus, Approvals, AuditEntry, Award, BoqState, CompletionMap,
    DocumentChecklistItem, ErrorKind, RateAnalysisStatus, Role, StageCompletionRecord, Tender,
    TenderId, TenderStatus, TenderflowError, Timestamp, UserId,
};

// =============================================================================
// RE-EXPORTS: Workflow Engine
// =============================================================================

pub use eligibility::{evaluate, stage_eligibility};
pub use export::{Snapshot, export_snapshot, import_snapshot};
pub use finalizer::{AwardRequest, FinalizeRequest, StageFinalizer, WorkflowPolicy};
pub use storage::RedbStore;
pub use store::{MemoryStore, TenderStore};
pub use workflow::{
    AdvanceOutcome, BackfillReport, NewTender, StageOutcome, StorageBackend, TenderProgress,
    Workflow,
};

// =============================================================================
// RE-EXPORTS: System (from system module)
// =============================================================================

pub use system::{
    ProgressSummary, STAGE_ORDER, StageDefinition, StageId, TriggerType, completed_count,
    get_ordered_stage_ids, get_stage_definition, next_incomplete_stage, progress_percent,
};
