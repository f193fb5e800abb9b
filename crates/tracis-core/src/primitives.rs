//! # Engine Limits
//!
//! Hardcoded runtime constants for the Tracis engine.
//!
//! The engine starts with zero data but fixed limits. These are compiled
//! into the binary and are immutable at runtime.

/// Confidence scores are stored as integer thousandths of certainty.
///
/// - `0` means no confidence, `CONFIDENCE_SCALE` means full certainty.
/// - Integer scoring keeps the engine free of float arithmetic.
pub const CONFIDENCE_SCALE: u16 = 1000;

/// Magic bytes for the Tracis binary snapshot header.
///
/// - File Header = Magic Bytes ("TRCS") + Version (u8) before payload.
pub const MAGIC_BYTES: &[u8; 4] = b"TRCS";

/// Current serialization format version.
///
/// Increment this when making breaking changes to the snapshot format.
pub const FORMAT_VERSION: u8 = 1;

// =============================================================================
// INPUT VALIDATION LIMITS
// =============================================================================

/// Maximum length for artifact and project-scoped names.
///
/// Names longer than this are rejected during draft validation.
pub const MAX_NAME_LEN: usize = 256;

/// Maximum length for artifact type names (post-normalization).
pub const MAX_TYPE_NAME_LEN: usize = 64;

/// Maximum length for artifact summary text.
pub const MAX_SUMMARY_LEN: usize = 1024;

/// Maximum length for artifact body text (64KB).
///
/// This prevents memory exhaustion from malicious or malformed input.
pub const MAX_BODY_LEN: usize = 65536;

/// Maximum number of drafts in a single change set.
///
/// Change sets larger than this are rejected to prevent DoS.
pub const MAX_CHANGESET_LEN: usize = 10000;

/// Maximum number of type names in a neighborhood query.
///
/// Limits the computational cost of type-filtered traversals.
pub const MAX_NEIGHBORHOOD_TYPES: usize = 100;
