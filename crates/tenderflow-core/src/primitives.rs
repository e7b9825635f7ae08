//! # Innate Primitives
//!
//! Hardcoded constants for the workflow engine.
//!
//! These values are compiled into the binary and are immutable at runtime.

/// Number of stages in every tender lifecycle.
pub const TOTAL_STAGES: usize = 16;

/// Role that passes every role gate.
pub const ADMIN_ROLE: &str = "admin";

/// Role given to the creator of a tender when no explicit role was supplied.
pub const OWNER_ROLE: &str = "owner";

/// Identity recorded in `by` when the engine completes a stage on its own.
pub const SYSTEM_ACTOR: &str = "system";

/// Prefix for generated tender identifiers (`TND-000001`).
pub const TENDER_ID_PREFIX: &str = "TND";

/// Magic bytes for stored records.
///
/// - Record = Magic Bytes ("TNDR") + Version (u8) before payload.
pub const MAGIC_BYTES: &[u8; 4] = b"TNDR";

/// Current record format version.
///
/// Increment this when making breaking changes to stored tender or audit records.
pub const FORMAT_VERSION: u8 = 1;

// =============================================================================
// INPUT VALIDATION LIMITS
// =============================================================================

/// Maximum number of evidence references accepted in a single finalize call.
pub const MAX_EVIDENCE_REFS: usize = 32;

/// Maximum length of one evidence reference (or an LOA reference).
pub const MAX_REF_LENGTH: usize = 1024;

/// Maximum length of the free-text notes attached to a finalize or award call.
pub const MAX_NOTES_LENGTH: usize = 4096;

/// Maximum length of a tender title.
pub const MAX_TITLE_LENGTH: usize = 512;

/// Maximum number of tenders accepted by a single import.
pub const MAX_IMPORT_BATCH: usize = 10_000;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sixteen_stages() {
        assert_eq!(TOTAL_STAGES, 16);
    }

    #[test]
    fn magic_bytes_correct() {
        assert_eq!(MAGIC_BYTES, b"TNDR");
    }
}
