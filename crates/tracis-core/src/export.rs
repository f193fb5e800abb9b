//! # Canonical Export Module
//!
//! Deterministic, bit-exact serialization of one version's live state.
//!
//! redb files are not guaranteed bit-identical across runs, so exchange
//! and verification go through this canonical form instead: sorted
//! artifacts and links behind a validated header, postcard-encoded. Two
//! stores holding the same logical state at a version produce identical
//! bytes.

use crate::primitives::{FORMAT_VERSION, MAGIC_BYTES};
use crate::types::{
    ApprovalState, Artifact, ArtifactContent, TraceKind, TraceLink, TraceState, TracisError,
    VersionId,
};
use serde::{Deserialize, Serialize};

// =============================================================================
// LIMITS
// =============================================================================

/// Maximum allowed artifact count in canonical imports.
///
/// This prevents memory exhaustion from malicious or corrupted data.
pub const MAX_IMPORT_ARTIFACT_COUNT: u64 = 1_000_000;

/// Maximum allowed link count in canonical imports.
pub const MAX_IMPORT_LINK_COUNT: u64 = 10_000_000;

/// Maximum payload size accepted before deserialization (500 MB).
pub const MAX_EXPORT_PAYLOAD_SIZE: usize = 500 * 1024 * 1024;

// =============================================================================
// HEADER
// =============================================================================

/// Header for canonical export files.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CanonicalHeader {
    /// Magic bytes to identify the format.
    pub magic: [u8; 4],

    /// Format version for compatibility.
    pub version: u8,

    /// Number of artifacts in the export.
    pub artifact_count: u64,

    /// Number of links in the export.
    pub link_count: u64,

    /// Checksum of the payload section (XOR-rotate, deterministic).
    pub checksum: u64,
}

impl CanonicalHeader {
    /// Create a new header with the given counts.
    #[must_use]
    pub fn new(artifact_count: u64, link_count: u64, checksum: u64) -> Self {
        Self {
            magic: *MAGIC_BYTES,
            version: FORMAT_VERSION,
            artifact_count,
            link_count,
            checksum,
        }
    }

    /// Validate the header. Error messages are intentionally generic.
    pub fn validate(&self) -> Result<(), TracisError> {
        if &self.magic != MAGIC_BYTES {
            return Err(TracisError::Serialization("invalid file format".to_string()));
        }
        if self.version != FORMAT_VERSION {
            return Err(TracisError::Serialization(
                "unsupported file version".to_string(),
            ));
        }
        if self.artifact_count > MAX_IMPORT_ARTIFACT_COUNT
            || self.link_count > MAX_IMPORT_LINK_COUNT
        {
            return Err(TracisError::Serialization(
                "entity count exceeds import limits".to_string(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// CANONICAL ENTITIES (Sorted, Deterministic)
// =============================================================================

/// An artifact in canonical form, sorted by id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct CanonicalArtifact {
    /// The artifact id (sort key).
    pub id: u64,
    /// Owning project.
    pub project: u64,
    /// Canonical type name.
    pub type_name: String,
    /// Project-unique name.
    pub name: String,
    /// Version summary text.
    pub summary: String,
}

/// A trace link in canonical form, sorted by id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct CanonicalLink {
    /// The link id (sort key).
    pub id: u64,
    /// Source artifact id.
    pub source: u64,
    /// Target artifact id.
    pub target: u64,
    /// Manual or generated.
    pub kind: TraceKind,
    /// Confidence in thousandths.
    pub confidence: u16,
    /// Review state.
    pub approval: ApprovalState,
    /// Visibility flag.
    pub visible: bool,
}

/// The canonical snapshot of one version's live state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CanonicalSnapshot {
    /// The exported version.
    pub version: u64,
    /// Live artifacts sorted by id.
    pub artifacts: Vec<CanonicalArtifact>,
    /// Live links sorted by id.
    pub links: Vec<CanonicalLink>,
}

impl CanonicalSnapshot {
    /// Build a snapshot from a version's live entity sets.
    #[must_use]
    pub fn from_live(
        version: VersionId,
        artifacts: &[(Artifact, ArtifactContent)],
        links: &[(TraceLink, TraceState)],
    ) -> Self {
        let mut canonical_artifacts: Vec<CanonicalArtifact> = artifacts
            .iter()
            .map(|(artifact, content)| CanonicalArtifact {
                id: artifact.id.0,
                project: artifact.project.0,
                type_name: artifact.type_name.as_str().to_string(),
                name: artifact.name.clone(),
                summary: content.summary.clone(),
            })
            .collect();
        canonical_artifacts.sort();

        let mut canonical_links: Vec<CanonicalLink> = links
            .iter()
            .map(|(link, state)| CanonicalLink {
                id: link.id.0,
                source: link.source.0,
                target: link.target.0,
                kind: state.kind,
                confidence: state.confidence.thousandths(),
                approval: state.approval,
                visible: state.visible,
            })
            .collect();
        canonical_links.sort();

        Self {
            version: version.0,
            artifacts: canonical_artifacts,
            links: canonical_links,
        }
    }
}

// =============================================================================
// CHECKSUM & SERIALIZATION
// =============================================================================

/// XOR-rotate checksum over a byte stream.
///
/// Not cryptographic; catches truncation and corruption while staying
/// fully deterministic and dependency-free.
#[must_use]
pub fn canonical_checksum(payload: &[u8]) -> u64 {
    let mut checksum: u64 = 0;
    for &byte in payload {
        checksum = checksum.rotate_left(7) ^ u64::from(byte);
    }
    checksum
}

/// Serialize a snapshot to bytes: header followed by payload.
pub fn export_canonical(snapshot: &CanonicalSnapshot) -> Result<Vec<u8>, TracisError> {
    let payload = postcard::to_allocvec(snapshot)
        .map_err(|e| TracisError::Serialization(e.to_string()))?;
    let header = CanonicalHeader::new(
        snapshot.artifacts.len() as u64,
        snapshot.links.len() as u64,
        canonical_checksum(&payload),
    );
    let mut bytes = postcard::to_allocvec(&header)
        .map_err(|e| TracisError::Serialization(e.to_string()))?;
    bytes.extend_from_slice(&payload);
    Ok(bytes)
}

/// Deserialize and validate a canonical export.
///
/// The header is validated before the payload is parsed, so oversized or
/// malformed inputs are rejected without large allocations.
pub fn import_canonical(bytes: &[u8]) -> Result<CanonicalSnapshot, TracisError> {
    if bytes.len() > MAX_EXPORT_PAYLOAD_SIZE {
        return Err(TracisError::Serialization(
            "export exceeds maximum payload size".to_string(),
        ));
    }

    let (header, payload): (CanonicalHeader, &[u8]) = postcard::take_from_bytes(bytes)
        .map_err(|e| TracisError::Serialization(e.to_string()))?;
    header.validate()?;

    if canonical_checksum(payload) != header.checksum {
        return Err(TracisError::Serialization("checksum mismatch".to_string()));
    }

    let snapshot: CanonicalSnapshot = postcard::from_bytes(payload)
        .map_err(|e| TracisError::Serialization(e.to_string()))?;

    if snapshot.artifacts.len() as u64 != header.artifact_count
        || snapshot.links.len() as u64 != header.link_count
    {
        return Err(TracisError::Serialization(
            "header counts disagree with payload".to_string(),
        ));
    }
    Ok(snapshot)
}

/// Check whether bytes hold a valid canonical export.
#[must_use]
pub fn verify_canonical(bytes: &[u8]) -> bool {
    import_canonical(bytes).is_ok()
}

// =============================================================================
// TESTS
// =============================================================================
