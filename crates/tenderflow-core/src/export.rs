//! # Snapshot Export
//!
//! A whole workflow (tenders plus audit log) as one portable value.
//!
//! The binary uses it for the `file` backend and for `export`/`import`.
//! Two encodings are offered: the `Snapshot` struct itself (serde, so the
//! binary can write JSON) and a framed postcard stream:
//!
//! ```text
//! [header_len: u32 LE] [SnapshotHeader (postcard)] [Snapshot (postcard)]
//! ```
//!
//! The header carries the counts, which are checked against the limits
//! before the body is decoded.

use crate::store::MemoryStore;
use crate::types::{AuditEntry, Tender, TenderflowError};
use crate::workflow::{StorageBackend, Workflow};
use serde::{Deserialize, Serialize};

/// Magic bytes for snapshot streams.
pub const SNAPSHOT_MAGIC: [u8; 4] = *b"TNDX";

/// Current snapshot version.
pub const SNAPSHOT_VERSION: u8 = 1;

/// Maximum tenders accepted from one snapshot.
pub const MAX_SNAPSHOT_TENDERS: u64 = 1_000_000;

/// Maximum audit entries accepted from one snapshot.
pub const MAX_SNAPSHOT_AUDIT_ENTRIES: u64 = 10_000_000;

// =============================================================================
// HEADER
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotHeader {
    pub magic: [u8; 4],
    pub version: u8,
    pub tender_count: u64,
    pub audit_count: u64,
}

impl SnapshotHeader {
    #[must_use]
    pub fn new(tender_count: u64, audit_count: u64) -> Self {
        Self {
            magic: SNAPSHOT_MAGIC,
            version: SNAPSHOT_VERSION,
            tender_count,
            audit_count,
        }
    }

    pub fn validate(&self) -> Result<(), TenderflowError> {
        if self.magic != SNAPSHOT_MAGIC {
            return Err(TenderflowError::Serialization(
                "Invalid snapshot magic".to_string(),
            ));
        }
        if self.version != SNAPSHOT_VERSION {
            return Err(TenderflowError::Serialization(format!(
                "Unsupported snapshot version: {}",
                self.version
            )));
        }
        if self.tender_count > MAX_SNAPSHOT_TENDERS {
            return Err(TenderflowError::Serialization(format!(
                "Tender count {} exceeds maximum allowed {}",
                self.tender_count, MAX_SNAPSHOT_TENDERS
            )));
        }
        if self.audit_count > MAX_SNAPSHOT_AUDIT_ENTRIES {
            return Err(TenderflowError::Serialization(format!(
                "Audit count {} exceeds maximum allowed {}",
                self.audit_count, MAX_SNAPSHOT_AUDIT_ENTRIES
            )));
        }
        Ok(())
    }
}

// =============================================================================
// SNAPSHOT
// =============================================================================

/// Every tender and every audit entry of a workflow.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub tenders: Vec<Tender>,
    #[serde(default)]
    pub audit: Vec<AuditEntry>,
}

impl Snapshot {
    /// Capture the current state. Audit entries are grouped by tender.
    pub fn of(workflow: &Workflow) -> Result<Self, TenderflowError> {
        let tenders = workflow.tenders()?;
        let mut audit = Vec::new();
        for tender in &tenders {
            audit.extend(workflow.audit_log(&tender.tender_id)?);
        }
        Ok(Self { tenders, audit })
    }

    /// In-memory workflow holding exactly this snapshot.
    #[must_use]
    pub fn into_workflow(self) -> Workflow {
        Workflow::with_backend(StorageBackend::InMemory(MemoryStore::restore(
            self.tenders,
            self.audit,
        )))
    }
}

// =============================================================================
// BINARY ENCODING
// =============================================================================

/// Encode a workflow as a framed postcard stream.
pub fn export_snapshot(workflow: &Workflow) -> Result<Vec<u8>, TenderflowError> {
    encode_snapshot(&Snapshot::of(workflow)?)
}

pub fn encode_snapshot(snapshot: &Snapshot) -> Result<Vec<u8>, TenderflowError> {
    let header = SnapshotHeader::new(snapshot.tenders.len() as u64, snapshot.audit.len() as u64);

    let header_bytes = postcard::to_stdvec(&header)
        .map_err(|e| TenderflowError::Serialization(format!("Header: {}", e)))?;
    let data_bytes = postcard::to_stdvec(snapshot)
        .map_err(|e| TenderflowError::Serialization(format!("Data: {}", e)))?;

    let mut result = Vec::with_capacity(4 + header_bytes.len() + data_bytes.len());
    result.extend_from_slice(&(header_bytes.len() as u32).to_le_bytes());
    result.extend_from_slice(&header_bytes);
    result.extend_from_slice(&data_bytes);
    Ok(result)
}

/// Decode a stream written by [`encode_snapshot`].
pub fn import_snapshot(data: &[u8]) -> Result<Snapshot, TenderflowError> {
    let (len_bytes, rest) = data
        .split_first_chunk::<4>()
        .ok_or_else(|| TenderflowError::Serialization("Data too short".to_string()))?;
    let header_len = u32::from_le_bytes(*len_bytes) as usize;

    if rest.len() < header_len {
        return Err(TenderflowError::Serialization(
            "Data too short for header".to_string(),
        ));
    }
    let (header_bytes, body) = rest.split_at(header_len);

    let header: SnapshotHeader = postcard::from_bytes(header_bytes)
        .map_err(|e| TenderflowError::Serialization(format!("Header: {}", e)))?;
    header.validate()?;

    let snapshot: Snapshot = postcard::from_bytes(body)
        .map_err(|e| TenderflowError::Serialization(format!("Data: {}", e)))?;

    if snapshot.tenders.len() as u64 != header.tender_count {
        return Err(TenderflowError::Serialization(
            "Tender count mismatch".to_string(),
        ));
    }
    if snapshot.audit.len() as u64 != header.audit_count {
        return Err(TenderflowError::Serialization(
            "Audit count mismatch".to_string(),
        ));
    }
    Ok(snapshot)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::finalizer::FinalizeRequest;
    use crate::system::StageId;
    use crate::types::{Timestamp, UserId};
    use crate::workflow::NewTender;

    fn sample() -> Workflow {
        let admin = UserId::new("admin-1");
        let mut workflow = Workflow::new();
        let tender = workflow
            .create_tender(
                Some(&admin),
                NewTender::titled("Bridge").with_member("admin-1", "admin"),
                Timestamp::from_millis(1),
            )
            .expect("create");
        workflow
            .finalize_stage(
                Some(&admin),
                &FinalizeRequest::new(tender.tender_id, StageId::PreBid),
                Timestamp::from_millis(2),
            )
            .expect("finalize");
        workflow
    }

    #[test]
    fn stream_restores_workflow() {
        let original = sample();
        let bytes = export_snapshot(&original).expect("export");
        let restored = import_snapshot(&bytes).expect("import").into_workflow();

        assert_eq!(
            Snapshot::of(&restored).expect("snapshot"),
            Snapshot::of(&original).expect("snapshot")
        );
    }

    #[test]
    fn truncated_stream_rejected() {
        let bytes = export_snapshot(&sample()).expect("export");
        assert!(import_snapshot(&bytes[..2]).is_err());
        assert!(import_snapshot(&bytes[..bytes.len() / 2]).is_err());
    }

    #[test]
    fn foreign_magic_rejected() {
        let mut header = SnapshotHeader::new(0, 0);
        header.magic = *b"ABCD";
        assert!(header.validate().is_err());
        assert!(SnapshotHeader::new(MAX_SNAPSHOT_TENDERS + 1, 0).validate().is_err());
    }
}
