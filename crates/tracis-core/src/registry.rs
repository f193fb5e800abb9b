//! # Project & Type Registry
//!
//! Draft validation and name resolution for the commit pipeline.
//!
//! - Normalize artifact type names to canonical lowercase
//! - Reject malformed drafts before any graph mutation
//! - Resolve artifact existence by project + name
//! - No semantic inference or enrichment

use crate::commit::{ArtifactDraft, TraceDraft};
use crate::primitives::{MAX_BODY_LEN, MAX_NAME_LEN, MAX_SUMMARY_LEN, MAX_TYPE_NAME_LEN};
use crate::store::VersionStore;
use crate::types::{Artifact, ProjectId, TracisError, TypeName};

/// The Registry validates drafts and resolves artifact identity.
///
/// Validation happens up front: an invalid draft must never reach the
/// store or allocate an id.
pub struct Registry;

impl Registry {
    /// Normalize a raw type name to its canonical form, validating limits.
    pub fn canonical_type(raw: &str) -> Result<TypeName, TracisError> {
        let type_name = TypeName::new(raw);
        if type_name.is_empty() {
            return Err(TracisError::Validation("empty artifact type".to_string()));
        }
        if type_name.as_str().len() > MAX_TYPE_NAME_LEN {
            return Err(TracisError::Validation(format!(
                "type name exceeds {} bytes",
                MAX_TYPE_NAME_LEN
            )));
        }
        Ok(type_name)
    }

    /// Validate an artifact name.
    pub fn validate_name(name: &str) -> Result<(), TracisError> {
        if name.trim().is_empty() {
            return Err(TracisError::Validation("empty artifact name".to_string()));
        }
        if name.len() > MAX_NAME_LEN {
            return Err(TracisError::Validation(format!(
                "name exceeds {} bytes",
                MAX_NAME_LEN
            )));
        }
        Ok(())
    }

    /// Validate an artifact draft.
    ///
    /// A draft is valid if:
    /// - Name is non-empty and within length limits
    /// - Type name normalizes to a non-empty, bounded string
    /// - Summary and body are within length limits
    pub fn validate_artifact(draft: &ArtifactDraft) -> Result<TypeName, TracisError> {
        Self::validate_name(&draft.name)?;
        let type_name = Self::canonical_type(&draft.type_name)?;
        if draft.content.summary.len() > MAX_SUMMARY_LEN {
            return Err(TracisError::Validation(format!(
                "summary exceeds {} bytes",
                MAX_SUMMARY_LEN
            )));
        }
        if draft.content.body.len() > MAX_BODY_LEN {
            return Err(TracisError::Validation(format!(
                "body exceeds {} bytes",
                MAX_BODY_LEN
            )));
        }
        Ok(type_name)
    }

    /// Validate a trace draft's endpoint names.
    pub fn validate_trace(draft: &TraceDraft) -> Result<(), TracisError> {
        Self::validate_name(&draft.source)?;
        Self::validate_name(&draft.target)?;
        Ok(())
    }

    /// Resolve an artifact by project and name against the store.
    ///
    /// Returns `NotFound` when the project has no artifact of that name.
    pub fn resolve_artifact<S: VersionStore>(
        store: &S,
        project: ProjectId,
        name: &str,
    ) -> Result<Artifact, TracisError> {
        store.find_artifact(project, name)?.ok_or_else(|| {
            TracisError::NotFound(format!(
                "artifact '{}' in project {}",
                name, project.0
            ))
        })
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ArtifactContent;

    fn draft(name: &str, type_name: &str) -> ArtifactDraft {
        ArtifactDraft {
            project: ProjectId(1),
            type_name: type_name.to_string(),
            name: name.to_string(),
            content: ArtifactContent::default(),
        }
    }

    #[test]
    fn canonical_type_lowercases() {
        let type_name = Registry::canonical_type("Requirement").expect("valid");
        assert_eq!(type_name.as_str(), "requirement");
    }

    #[test]
    fn empty_type_rejected() {
        assert!(Registry::canonical_type("").is_err());
        assert!(Registry::canonical_type("   ").is_err());
    }

    #[test]
    fn oversized_type_rejected() {
        let long = "t".repeat(MAX_TYPE_NAME_LEN + 1);
        assert!(Registry::canonical_type(&long).is_err());
    }

    #[test]
    fn valid_draft_yields_canonical_type() {
        let type_name = Registry::validate_artifact(&draft("R1", "Requirement")).expect("valid");
        assert_eq!(type_name.as_str(), "requirement");
    }

    #[test]
    fn empty_name_rejected() {
        assert!(Registry::validate_artifact(&draft("", "requirement")).is_err());
        assert!(Registry::validate_artifact(&draft("  ", "requirement")).is_err());
    }

    #[test]
    fn oversized_body_rejected() {
        let mut d = draft("R1", "requirement");
        d.content.body = "b".repeat(MAX_BODY_LEN + 1);
        assert!(Registry::validate_artifact(&d).is_err());
    }

    #[test]
    fn resolve_missing_artifact_is_not_found() {
        let store = crate::store::MemoryStore::new();
        let err = Registry::resolve_artifact(&store, ProjectId(1), "R1").expect_err("missing");
        assert!(matches!(err, TracisError::NotFound(_)));
    }
}
