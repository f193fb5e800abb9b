//! # API Request/Response Types
//!
//! This module defines the JSON structures for the HTTP API. Drafts and
//! commit options reuse the engine's serde representations; responses are
//! flattened into JSON-friendly rows.

use serde::{Deserialize, Serialize};
use tracis_core::{
    ChangeDescription, ChangeSet, CommitError, CommitOptions, CommitOutcome, ReachabilitySet,
    TraceMatrix, TracisError,
    primitives::MAX_CHANGESET_LEN,
};

// =============================================================================
// HEALTH RESPONSE
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

// =============================================================================
// STATUS RESPONSE
// =============================================================================

/// Store status response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub artifact_count: usize,
    pub link_count: usize,
    pub artifact_records: usize,
    pub trace_records: usize,
}

// =============================================================================
// COMMIT REQUEST/RESPONSE
// =============================================================================

/// Commit request: one change set against one version target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitRequest {
    pub version: u64,
    pub actor: String,
    #[serde(default)]
    pub options: CommitOptions,
    #[serde(default)]
    pub changes: ChangeSet,
}

impl CommitRequest {
    /// Validate boundary limits before the request reaches the engine.
    pub fn validate(&self) -> Result<(), TracisError> {
        if self.actor.trim().is_empty() {
            return Err(TracisError::Validation("empty actor".to_string()));
        }
        if self.changes.len() > MAX_CHANGESET_LEN {
            return Err(TracisError::Validation(format!(
                "change set exceeds {} drafts",
                MAX_CHANGESET_LEN
            )));
        }
        Ok(())
    }
}

/// One written version record, flattened for JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordJson {
    pub entity: u64,
    pub modification: String,
}

/// Commit response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitResponse {
    pub success: bool,
    pub version: Option<u64>,
    #[serde(default)]
    pub artifact_records: Vec<RecordJson>,
    #[serde(default)]
    pub trace_records: Vec<RecordJson>,
    #[serde(default)]
    pub errors: Vec<CommitError>,
    pub error: Option<String>,
}

impl CommitResponse {
    pub fn success(outcome: &CommitOutcome) -> Self {
        Self {
            success: true,
            version: Some(outcome.version.0),
            artifact_records: outcome
                .artifact_records
                .iter()
                .map(|r| RecordJson {
                    entity: r.artifact.0,
                    modification: format!("{:?}", r.modification),
                })
                .collect(),
            trace_records: outcome
                .trace_records
                .iter()
                .map(|r| RecordJson {
                    entity: r.link.0,
                    modification: format!("{:?}", r.modification),
                })
                .collect(),
            errors: outcome.errors.clone(),
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            version: None,
            artifact_records: vec![],
            trace_records: vec![],
            errors: vec![],
            error: Some(msg.into()),
        }
    }
}

// =============================================================================
// QUERY REQUEST/RESPONSE
// =============================================================================

/// Query request (tagged union).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueryRequest {
    Lookup {
        project: u64,
        name: String,
    },
    Reachability {
        version: u64,
        artifact_id: u64,
    },
    Neighborhood {
        version: u64,
        artifact_id: u64,
        types: Vec<String>,
    },
    TraceMatrix {
        version: u64,
    },
}

/// Reachability sets flattened for JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReachabilityJson {
    pub parents: Vec<u64>,
    pub children: Vec<u64>,
    pub ancestors: Vec<u64>,
    pub descendants: Vec<u64>,
    pub neighbors: Vec<u64>,
}

impl From<&ReachabilitySet> for ReachabilityJson {
    fn from(set: &ReachabilitySet) -> Self {
        Self {
            parents: set.parents.iter().map(|id| id.0).collect(),
            children: set.children.iter().map(|id| id.0).collect(),
            ancestors: set.ancestors.iter().map(|id| id.0).collect(),
            descendants: set.descendants.iter().map(|id| id.0).collect(),
            neighbors: set.neighbors().iter().map(|id| id.0).collect(),
        }
    }
}

/// One trace-matrix row flattened for JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatrixRowJson {
    pub source_type: String,
    pub target_type: String,
    pub total: u64,
    pub generated_total: u64,
    pub approved_generated: u64,
}

/// Query response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    pub success: bool,
    pub found: bool,
    #[serde(default)]
    pub artifacts: Vec<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(default)]
    pub reachability: Option<ReachabilityJson>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    #[serde(default)]
    pub matrix: Vec<MatrixRowJson>,
    pub error: Option<String>,
}

impl QueryResponse {
    pub fn not_found() -> Self {
        Self {
            success: true,
            found: false,
            artifacts: vec![],
            reachability: None,
            matrix: vec![],
            error: None,
        }
    }

    pub fn with_artifacts(artifacts: Vec<u64>) -> Self {
        Self {
            success: true,
            found: !artifacts.is_empty(),
            artifacts,
            reachability: None,
            matrix: vec![],
            error: None,
        }
    }

    pub fn with_reachability(set: &ReachabilitySet) -> Self {
        Self {
            success: true,
            found: true,
            artifacts: vec![],
            reachability: Some(ReachabilityJson::from(set)),
            matrix: vec![],
            error: None,
        }
    }

    pub fn with_matrix(matrix: &TraceMatrix) -> Self {
        let rows: Vec<MatrixRowJson> = matrix
            .entries()
            .map(|(key, entry)| MatrixRowJson {
                source_type: key.source_type.as_str().to_string(),
                target_type: key.target_type.as_str().to_string(),
                total: entry.total,
                generated_total: entry.generated_total,
                approved_generated: entry.approved_generated,
            })
            .collect();
        Self {
            success: true,
            found: !rows.is_empty(),
            artifacts: vec![],
            reachability: None,
            matrix: rows,
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            found: false,
            artifacts: vec![],
            reachability: None,
            matrix: vec![],
            error: Some(msg.into()),
        }
    }
}

// =============================================================================
// EXPORT REQUEST/RESPONSE
// =============================================================================

/// Export request: one version to snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportRequest {
    pub version: u64,
}

/// Export response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportResponse {
    pub success: bool,
    pub data: Option<String>, // Base64 encoded
    pub checksum: Option<u64>,
    pub error: Option<String>,
}

impl ExportResponse {
    pub fn success(data: &[u8], checksum: u64) -> Self {
        Self {
            success: true,
            data: Some(base64::Engine::encode(
                &base64::engine::general_purpose::STANDARD,
                data,
            )),
            checksum: Some(checksum),
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            checksum: None,
            error: Some(msg.into()),
        }
    }
}

// =============================================================================
// CHANGE FEED RESPONSE
// =============================================================================

/// Recent change descriptions, newest last.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangesResponse {
    pub changes: Vec<ChangeDescription>,
}
