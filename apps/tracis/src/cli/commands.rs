//! # CLI Command Implementations
//!
//! This module contains the actual implementations of CLI commands.

use crate::api;
use crate::config::ServerConfig;
use std::path::{Path, PathBuf};
use tracis_core::{
    Actor, ArtifactId, ChangeSet, CommitOptions, Engine, ProjectId, Query, QueryType,
    TracisError, VersionId, export_canonical, verify_canonical,
};

// =============================================================================
// FILE SIZE LIMITS
// =============================================================================

/// Maximum file size for change set files (100 MB).
///
/// This prevents memory exhaustion from malicious or accidental large files.
const MAX_CHANGESET_FILE_SIZE: u64 = 100 * 1024 * 1024;

/// Maximum file size for canonical export verification (500 MB).
const MAX_VERIFY_FILE_SIZE: u64 = 500 * 1024 * 1024;

/// Validate file size before reading.
fn validate_file_size(path: &Path, max_size: u64) -> Result<(), TracisError> {
    let metadata = std::fs::metadata(path)
        .map_err(|e| TracisError::Storage(format!("Cannot read file metadata: {}", e)))?;

    if metadata.len() > max_size {
        return Err(TracisError::Validation(format!(
            "File size {} bytes exceeds maximum allowed {} bytes",
            metadata.len(),
            max_size
        )));
    }
    Ok(())
}

/// Validate an input file path.
///
/// Canonicalizes the path (resolving ".." and symlinks) and ensures it is
/// a regular file, so a path like "../../etc/passwd" cannot escape scrutiny.
fn validate_file_path(path: &Path) -> Result<PathBuf, TracisError> {
    let canonical = path.canonicalize().map_err(|e| {
        TracisError::Storage(format!("Invalid file path '{}': {}", path.display(), e))
    })?;

    if !canonical.is_file() {
        return Err(TracisError::Storage(format!(
            "Path '{}' is not a regular file",
            path.display()
        )));
    }

    Ok(canonical)
}

/// Validate an output path: the parent directory must exist.
fn validate_output_path(path: &Path) -> Result<PathBuf, TracisError> {
    let parent = path.parent().unwrap_or(Path::new("."));

    let canonical_parent = parent.canonicalize().map_err(|e| {
        TracisError::Storage(format!(
            "Invalid output directory '{}': {}",
            parent.display(),
            e
        ))
    })?;

    if !canonical_parent.is_dir() {
        return Err(TracisError::Storage(format!(
            "Output directory '{}' is not a valid directory",
            parent.display()
        )));
    }

    let filename = path
        .file_name()
        .ok_or_else(|| TracisError::Storage("Output path has no filename".to_string()))?;

    Ok(canonical_parent.join(filename))
}

// =============================================================================
// ENGINE LOADING
// =============================================================================

/// Open an engine over the selected backend.
fn load_engine(db_path: &Path, backend: &str) -> Result<Engine, TracisError> {
    match backend {
        "memory" => {
            tracing::warn!("Using in-memory backend: state is volatile");
            Ok(Engine::new())
        }
        "redb" => Engine::with_redb(db_path),
        other => Err(TracisError::Validation(format!(
            "unknown backend '{}' (expected 'memory' or 'redb')",
            other
        ))),
    }
}

// =============================================================================
// SERVER COMMAND
// =============================================================================

/// Start the HTTP server.
pub async fn cmd_server(
    db_path: &Path,
    backend: &str,
    host: Option<String>,
    port: Option<u16>,
    config_path: Option<&Path>,
) -> Result<(), TracisError> {
    let config = match config_path {
        Some(path) => ServerConfig::load(path)?,
        None => ServerConfig::default(),
    };
    let (host, port) = config.resolve_addr(host, port);
    let db_path = config.database.as_deref().unwrap_or(db_path);
    let backend = config.backend.as_deref().unwrap_or(backend);

    let engine = load_engine(db_path, backend)?;

    println!("Tracis Versioned Traceability Server Starting...");
    println!();
    println!("Configuration:");
    println!("  Host:     {}", host);
    println!("  Port:     {}", port);
    println!("  Backend:  {}", backend);
    println!("  Database: {:?}", db_path);
    println!();
    println!("Endpoints:");
    println!("  POST /commit  - Commit a change set");
    println!("  POST /query   - Execute a query");
    println!("  POST /export  - Export a version");
    println!("  GET  /changes - Change feed");
    println!("  GET  /status  - Get store status");
    println!("  GET  /health  - Health check");
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    let addr = format!("{}:{}", host, port);
    api::run_server(&addr, engine).await
}

// =============================================================================
// STATUS COMMAND
// =============================================================================

/// Show store status.
pub fn cmd_status(db_path: &Path, backend: &str, json_mode: bool) -> Result<(), TracisError> {
    let engine = load_engine(db_path, backend)?;
    let counts = engine.counts()?;

    if json_mode {
        let output = serde_json::json!({
            "database": db_path.to_string_lossy(),
            "backend": backend,
            "artifact_count": counts.artifacts,
            "link_count": counts.links,
            "artifact_records": counts.artifact_records,
            "trace_records": counts.trace_records,
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&output).unwrap_or_default()
        );
        return Ok(());
    }

    println!("Tracis Store Status");
    println!("===================");
    println!("Database: {:?}", db_path);
    println!("Backend:  {}", backend);
    println!();
    println!("Artifacts:        {}", counts.artifacts);
    println!("Trace Links:      {}", counts.links);
    println!("Artifact Records: {}", counts.artifact_records);
    println!("Trace Records:    {}", counts.trace_records);

    Ok(())
}

// =============================================================================
// COMMIT COMMAND
// =============================================================================

/// Commit a change set from a JSON file.
pub fn cmd_commit(
    db_path: &Path,
    backend: &str,
    json_mode: bool,
    file: &Path,
    version: u64,
    actor: &str,
    fail_on_error: bool,
    complete_set: bool,
) -> Result<(), TracisError> {
    let file = validate_file_path(file)?;
    validate_file_size(&file, MAX_CHANGESET_FILE_SIZE)?;

    let raw = std::fs::read_to_string(&file)
        .map_err(|e| TracisError::Storage(format!("Cannot read change set: {}", e)))?;
    let change_set: ChangeSet = serde_json::from_str(&raw)
        .map_err(|e| TracisError::Serialization(format!("Invalid change set: {}", e)))?;

    let mut engine = load_engine(db_path, backend)?;
    let outcome = engine.commit(
        VersionId(version),
        change_set,
        &Actor::new(actor),
        CommitOptions {
            fail_on_error,
            as_complete_set: complete_set,
        },
    )?;

    if json_mode {
        let output = serde_json::json!({
            "version": outcome.version.0,
            "artifact_records": outcome.artifact_records.len(),
            "trace_records": outcome.trace_records.len(),
            "errors": outcome.errors,
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&output).unwrap_or_default()
        );
        return Ok(());
    }

    println!("Committed version {}", outcome.version.0);
    println!("  Artifact records: {}", outcome.artifact_records.len());
    println!("  Trace records:    {}", outcome.trace_records.len());
    if !outcome.errors.is_empty() {
        println!("  Skipped entities:");
        for error in &outcome.errors {
            println!("    - {}", error);
        }
    }

    Ok(())
}

// =============================================================================
// QUERY COMMAND
// =============================================================================

/// Parse CLI flags into a structured query.
fn parse_query(
    query_type: &str,
    version: u64,
    artifact: Option<u64>,
    project: Option<u64>,
    name: Option<String>,
    types: Option<String>,
) -> Result<Query, TracisError> {
    let version = VersionId(version);
    match query_type {
        "lookup" => {
            let project = project
                .ok_or_else(|| TracisError::Validation("lookup requires --project".to_string()))?;
            let name = name
                .ok_or_else(|| TracisError::Validation("lookup requires --name".to_string()))?;
            Ok(Query::lookup(ProjectId(project), name))
        }
        "reachability" => {
            let artifact = artifact.ok_or_else(|| {
                TracisError::Validation("reachability requires --artifact".to_string())
            })?;
            Ok(Query::reachability(version, ArtifactId(artifact)))
        }
        "neighborhood" => {
            let artifact = artifact.ok_or_else(|| {
                TracisError::Validation("neighborhood requires --artifact".to_string())
            })?;
            let types: Vec<String> = types
                .ok_or_else(|| TracisError::Validation("neighborhood requires --types".to_string()))?
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
            Ok(Query::neighborhood(version, ArtifactId(artifact), types))
        }
        "matrix" => Ok(Query::trace_matrix(version)),
        other => Err(TracisError::Validation(format!(
            "unknown query type '{}' (expected lookup, reachability, neighborhood, matrix)",
            other
        ))),
    }
}

/// Execute a structural query.
pub fn cmd_query(
    db_path: &Path,
    backend: &str,
    json_mode: bool,
    query_type: &str,
    version: u64,
    artifact: Option<u64>,
    project: Option<u64>,
    name: Option<String>,
    types: Option<String>,
) -> Result<(), TracisError> {
    let engine = load_engine(db_path, backend)?;
    let query = parse_query(query_type, version, artifact, project, name, types)?;

    match query.query_type {
        QueryType::Lookup { project, name } => {
            match engine.artifact_by_name(project, &name)? {
                Some(found) => {
                    if json_mode {
                        let output = serde_json::json!({
                            "id": found.id.0,
                            "project": found.project.0,
                            "type": found.type_name.as_str(),
                            "name": found.name,
                        });
                        println!("{}", serde_json::to_string_pretty(&output).unwrap_or_default());
                    } else {
                        println!(
                            "Artifact {} ({}) id={}",
                            found.name,
                            found.type_name.as_str(),
                            found.id.0
                        );
                    }
                }
                None => println!("Not found"),
            }
        }

        QueryType::Reachability { version, artifact } => {
            match engine.reachability(version, artifact)? {
                Some(set) => {
                    if json_mode {
                        let output = serde_json::json!({
                            "parents": set.parents.iter().map(|id| id.0).collect::<Vec<_>>(),
                            "children": set.children.iter().map(|id| id.0).collect::<Vec<_>>(),
                            "ancestors": set.ancestors.iter().map(|id| id.0).collect::<Vec<_>>(),
                            "descendants": set.descendants.iter().map(|id| id.0).collect::<Vec<_>>(),
                        });
                        println!("{}", serde_json::to_string_pretty(&output).unwrap_or_default());
                    } else {
                        println!("Ancestors:   {:?}", set.ancestors.iter().map(|id| id.0).collect::<Vec<_>>());
                        println!("Descendants: {:?}", set.descendants.iter().map(|id| id.0).collect::<Vec<_>>());
                        println!("Neighbors:   {:?}", set.neighbors().iter().map(|id| id.0).collect::<Vec<_>>());
                    }
                }
                None => println!("Not live at version {}", version.0),
            }
        }

        QueryType::Neighborhood {
            version,
            artifact,
            types,
        } => {
            match engine.neighborhood_with_types(version, artifact, &types)? {
                Some(ids) => {
                    let ids: Vec<u64> = ids.iter().map(|id| id.0).collect();
                    if json_mode {
                        println!("{}", serde_json::json!({ "artifacts": ids }));
                    } else {
                        println!("Neighborhood: {:?}", ids);
                    }
                }
                None => println!("Not live at version {}", version.0),
            }
        }

        QueryType::TraceMatrix { version } => {
            let matrix = engine.trace_matrix(version)?;
            if json_mode {
                let rows: Vec<_> = matrix
                    .entries()
                    .map(|(key, entry)| {
                        serde_json::json!({
                            "source_type": key.source_type.as_str(),
                            "target_type": key.target_type.as_str(),
                            "total": entry.total,
                            "generated_total": entry.generated_total,
                            "approved_generated": entry.approved_generated,
                        })
                    })
                    .collect();
                println!(
                    "{}",
                    serde_json::to_string_pretty(&rows).unwrap_or_default()
                );
            } else {
                println!("Trace matrix at version {}:", version.0);
                for (key, entry) in matrix.entries() {
                    println!(
                        "  {} -> {}: total={} generated={} approved_generated={}",
                        key.source_type.as_str(),
                        key.target_type.as_str(),
                        entry.total,
                        entry.generated_total,
                        entry.approved_generated
                    );
                }
                if matrix.is_empty() {
                    println!("  (empty)");
                }
            }
        }
    }

    Ok(())
}

// =============================================================================
// EXPORT & VERIFY COMMANDS
// =============================================================================

/// Export one version's live state in canonical format.
pub fn cmd_export(
    db_path: &Path,
    backend: &str,
    version: u64,
    output: &Path,
) -> Result<(), TracisError> {
    let output = validate_output_path(output)?;
    let engine = load_engine(db_path, backend)?;

    let snapshot = engine.export_snapshot(VersionId(version))?;
    let bytes = export_canonical(&snapshot)?;
    std::fs::write(&output, &bytes)
        .map_err(|e| TracisError::Storage(format!("Cannot write export: {}", e)))?;

    println!(
        "Exported version {} ({} artifacts, {} links, {} bytes) to {:?}",
        version,
        snapshot.artifacts.len(),
        snapshot.links.len(),
        bytes.len(),
        output
    );
    Ok(())
}

/// Verify a canonical export file.
pub fn cmd_verify(input: &Path, json_mode: bool) -> Result<(), TracisError> {
    let input = validate_file_path(input)?;
    validate_file_size(&input, MAX_VERIFY_FILE_SIZE)?;

    let bytes = std::fs::read(&input)
        .map_err(|e| TracisError::Storage(format!("Cannot read export: {}", e)))?;
    let valid = verify_canonical(&bytes);

    if json_mode {
        println!("{}", serde_json::json!({ "valid": valid }));
    } else if valid {
        println!("OK: {:?} is a valid canonical export", input);
    } else {
        println!("INVALID: {:?} failed verification", input);
    }

    if valid {
        Ok(())
    } else {
        Err(TracisError::Serialization(
            "canonical export failed verification".to_string(),
        ))
    }
}

// =============================================================================
// INIT COMMAND
// =============================================================================

/// Initialize a new empty database.
pub fn cmd_init(db_path: &Path, backend: &str, force: bool) -> Result<(), TracisError> {
    if backend != "redb" {
        return Err(TracisError::Validation(
            "init only applies to the redb backend".to_string(),
        ));
    }

    if db_path.exists() {
        if !force {
            return Err(TracisError::Validation(format!(
                "database {:?} already exists (use --force to overwrite)",
                db_path
            )));
        }
        std::fs::remove_file(db_path)
            .map_err(|e| TracisError::Storage(format!("Cannot remove database: {}", e)))?;
    }

    let engine = Engine::with_redb(db_path)?;
    let counts = engine.counts()?;
    println!(
        "Initialized {:?} ({} artifacts, {} links)",
        db_path, counts.artifacts, counts.links
    );
    Ok(())
}
