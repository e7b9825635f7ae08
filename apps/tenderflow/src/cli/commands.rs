//! # CLI Command Implementations
//!
//! This module contains the actual implementations of CLI commands.
//!
//! Every command loads the workflow from the configured backend, runs one
//! engine call with the current time, and for the `file` backend writes the
//! snapshot back.

use super::{Backend, Context};
use crate::api;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tenderflow_core::{
    AwardRequest, FinalizeRequest, NewTender, Role, Snapshot, Tender, TenderId, TenderflowError,
    Timestamp, UserId, Workflow, export_snapshot, import_snapshot, system::stage_definitions,
};

// =============================================================================
// FILE SIZE LIMITS
// =============================================================================

/// Maximum size for draft and import files (100 MB).
const MAX_INPUT_FILE_SIZE: u64 = 100 * 1024 * 1024;

/// Maximum size for a snapshot database file (500 MB).
const MAX_SNAPSHOT_FILE_SIZE: u64 = 500 * 1024 * 1024;

/// Validate file size before reading.
fn validate_file_size(path: &Path, max_size: u64) -> Result<(), TenderflowError> {
    let metadata = std::fs::metadata(path)
        .map_err(|e| TenderflowError::Storage(format!("Cannot read file metadata: {}", e)))?;

    if metadata.len() > max_size {
        return Err(TenderflowError::InvalidArgument(format!(
            "File size {} bytes exceeds maximum allowed {} bytes",
            metadata.len(),
            max_size
        )));
    }
    Ok(())
}

/// Canonicalize an input path and require a regular file.
fn validate_file_path(path: &Path) -> Result<PathBuf, TenderflowError> {
    let canonical = path.canonicalize().map_err(|e| {
        TenderflowError::InvalidArgument(format!("Invalid file path '{}': {}", path.display(), e))
    })?;

    if !canonical.is_file() {
        return Err(TenderflowError::InvalidArgument(format!(
            "Path '{}' is not a regular file",
            path.display()
        )));
    }

    Ok(canonical)
}

/// Canonicalize the parent directory of an output path.
fn validate_output_path(path: &Path) -> Result<PathBuf, TenderflowError> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let canonical_parent = parent.canonicalize().map_err(|e| {
        TenderflowError::InvalidArgument(format!(
            "Invalid output directory '{}': {}",
            parent.display(),
            e
        ))
    })?;

    if !canonical_parent.is_dir() {
        return Err(TenderflowError::InvalidArgument(format!(
            "Output directory '{}' is not a valid directory",
            parent.display()
        )));
    }

    let filename = path.file_name().ok_or_else(|| {
        TenderflowError::InvalidArgument("Output path has no filename".to_string())
    })?;

    Ok(canonical_parent.join(filename))
}

fn read_input(path: &Path) -> Result<Vec<u8>, TenderflowError> {
    let validated = validate_file_path(path)?;
    validate_file_size(&validated, MAX_INPUT_FILE_SIZE)?;
    std::fs::read(&validated)
        .map_err(|e| TenderflowError::Storage(format!("Read file: {}", e)))
}

fn print_json<T: Serialize>(value: &T) -> Result<(), TenderflowError> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| TenderflowError::Serialization(e.to_string()))?;
    println!("{}", text);
    Ok(())
}

// =============================================================================
// SERVER COMMAND
// =============================================================================

/// Start the HTTP server.
pub async fn cmd_server(
    ctx: &Context,
    host: Option<String>,
    port: Option<u16>,
) -> Result<(), TenderflowError> {
    let workflow = load_workflow(ctx)?;
    let host = host.unwrap_or_else(|| ctx.config.server.host.clone());
    let port = port.unwrap_or(ctx.config.server.port);

    println!("Tenderflow Server Starting...");
    println!();
    println!("Configuration:");
    println!("  Host:         {}", host);
    println!("  Port:         {}", port);
    println!("  Backend:      {}", ctx.backend.as_str());
    println!("  Database:     {:?}", ctx.database);
    println!("  Strict order: {}", ctx.config.workflow.strict_order);
    println!();
    println!("Endpoints:");
    println!("  POST /finalizeStage             - Finalize a stage");
    println!("  POST /awardTender               - Award a tender");
    println!("  GET  /stages                    - Stage registry");
    println!("  POST /tenders                   - Create a tender");
    println!("  GET  /tenders                   - List tenders");
    println!("  GET  /tenders/{{id}}              - Get a tender");
    println!("  GET  /tenders/{{id}}/progress     - Progress and eligibility");
    println!("  GET  /tenders/{{id}}/audit        - Audit log");
    println!("  POST /tenders/{{id}}/auto-advance - Complete eligible auto stages");
    println!("  GET  /health                    - Health check");
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    let addr = format!("{}:{}", host, port);
    let state = api::AppState::new(workflow, &ctx.config);
    api::run_server(&addr, state.clone()).await?;

    // The file backend keeps everything in memory while serving.
    let workflow = state.workflow.read().await;
    save_workflow(&workflow, &ctx.database)
}

// =============================================================================
// INIT COMMAND
// =============================================================================

/// Initialize a new database.
pub fn cmd_init(ctx: &Context, force: bool) -> Result<(), TenderflowError> {
    if ctx.database.exists() {
        if !force {
            return Err(TenderflowError::InvalidArgument(
                "Database already exists. Use --force to overwrite.".to_string(),
            ));
        }
        std::fs::remove_file(&ctx.database)
            .map_err(|e| TenderflowError::Storage(format!("Remove database: {}", e)))?;
    }

    match ctx.backend {
        Backend::Redb => {
            let _workflow = Workflow::with_redb(&ctx.database)?;
            println!("Initialized new redb database at {:?}", ctx.database);
        }
        Backend::File => {
            save_workflow(&Workflow::new(), &ctx.database)?;
            println!("Initialized new file database at {:?}", ctx.database);
        }
    }

    Ok(())
}

// =============================================================================
// STAGES COMMAND
// =============================================================================

/// List the stage registry.
pub fn cmd_stages(ctx: &Context) -> Result<(), TenderflowError> {
    if ctx.json_mode {
        return print_json(&api::StagesResponse::default());
    }

    println!("Tender Stages");
    println!("=============");
    for def in stage_definitions() {
        let roles = if def.required_roles.is_empty() {
            "any member".to_string()
        } else {
            def.required_roles.join(", ")
        };
        println!(
            "{:>2}. {:<22} {:<6}  {}  [{}]",
            def.number,
            def.id.as_str(),
            def.trigger_type.as_str(),
            def.title,
            roles
        );
    }
    Ok(())
}

// =============================================================================
// CREATE COMMAND
// =============================================================================

/// Parse a `user:role` member argument.
pub fn parse_member(raw: &str) -> Result<(UserId, Role), TenderflowError> {
    match raw.split_once(':') {
        Some((user, role)) if !user.trim().is_empty() && !role.trim().is_empty() => {
            Ok((UserId::new(user.trim()), Role::new(role.trim())))
        }
        _ => Err(TenderflowError::InvalidArgument(format!(
            "Invalid member '{}'. Use user:role",
            raw
        ))),
    }
}

/// Create a tender.
pub fn cmd_create(
    ctx: &Context,
    user: &str,
    title: Option<String>,
    members: &[String],
    draft: Option<&Path>,
) -> Result<(), TenderflowError> {
    let mut new_tender = match draft {
        Some(path) => serde_json::from_slice::<NewTender>(&read_input(path)?)
            .map_err(|e| TenderflowError::InvalidArgument(format!("Invalid draft: {}", e)))?,
        None => NewTender::default(),
    };
    if let Some(title) = title {
        new_tender.title = title;
    }
    for raw in members {
        let (member, role) = parse_member(raw)?;
        new_tender.members_map.insert(member, role);
    }

    let mut workflow = load_workflow(ctx)?;
    let tender = workflow.create_tender(Some(&UserId::new(user)), new_tender, Timestamp::now())?;
    save_workflow(&workflow, &ctx.database)?;

    tracing::info!(event = "tender_created", tender_id = %tender.tender_id, "Tender created");
    if ctx.json_mode {
        return print_json(&tender);
    }
    println!("Created {} \"{}\"", tender.tender_id, tender.title);
    println!("Progress: {}%", tender.progress_percent);
    Ok(())
}

// =============================================================================
// SHOW COMMAND
// =============================================================================

/// Show a tender with its progress.
pub fn cmd_show(ctx: &Context, tender_id: &str) -> Result<(), TenderflowError> {
    let workflow = load_workflow(ctx)?;
    let id = TenderId::new(tender_id);
    let tender = workflow.tender(&id)?;
    let progress = workflow.progress(&id)?;

    if ctx.json_mode {
        let output = serde_json::json!({
            "tender": tender,
            "progress": progress,
        });
        return print_json(&output);
    }

    print_tender(&tender);
    println!();
    println!(
        "Progress: {}/{} stages ({}%)",
        progress.summary.completed, progress.summary.total, progress.summary.percent
    );
    match progress.summary.next_stage {
        Some(next) => println!("Next:     {} {}", next.as_str(), next.definition().title),
        None => println!("Next:     all stages complete"),
    }
    println!();
    for def in stage_definitions() {
        let mark = match tender.stage_completion.get(&def.id) {
            Some(record) if record.done => {
                let by = record.by.as_ref().map(UserId::as_str).unwrap_or("-");
                format!("done by {}", by)
            }
            _ => match progress.eligibility.get(&def.id) {
                Some(true) => "eligible".to_string(),
                _ => "pending".to_string(),
            },
        };
        println!("  {:>2}. {:<22} {}", def.number, def.id.as_str(), mark);
    }
    Ok(())
}

fn print_tender(tender: &Tender) {
    println!("Tender {}", tender.tender_id);
    println!("==================");
    println!("Title:   {}", tender.title);
    println!("Status:  {:?}", tender.status);
    println!(
        "Created: {} by {}",
        tender.created_at.millis(),
        tender.created_by.as_ref().map(UserId::as_str).unwrap_or("-")
    );
    println!("Members:");
    for (user, role) in &tender.members_map {
        println!("  {:<16} {}", user.as_str(), role.as_str());
    }
}

// =============================================================================
// FINALIZE / AWARD / ADVANCE COMMANDS
// =============================================================================

/// Finalize one stage.
pub fn cmd_finalize(
    ctx: &Context,
    tender_id: &str,
    stage: &str,
    user: &str,
    evidence: Vec<String>,
    notes: Option<String>,
) -> Result<(), TenderflowError> {
    let request = FinalizeRequest::parse(tender_id, stage, evidence, notes)?;
    let mut workflow = load_workflow(ctx)?;
    let outcome = workflow.finalize_stage(Some(&UserId::new(user)), &request, Timestamp::now())?;
    save_workflow(&workflow, &ctx.database)?;

    tracing::info!(
        event = "stage_finalized",
        tender_id = %outcome.tender.tender_id,
        stage = outcome.stage.as_str(),
        "Stage finalized"
    );
    if ctx.json_mode {
        return print_json(&api::StageResponse::completed(outcome.tender, outcome.message));
    }
    println!("{}", outcome.message);
    println!("Progress: {}%", outcome.tender.progress_percent);
    Ok(())
}

/// Record the LOA and award a tender.
pub fn cmd_award(
    ctx: &Context,
    tender_id: &str,
    loa_ref: &str,
    user: &str,
    notes: Option<String>,
) -> Result<(), TenderflowError> {
    let request = AwardRequest::parse(tender_id, loa_ref, notes)?;
    let mut workflow = load_workflow(ctx)?;
    let outcome = workflow.award_tender(Some(&UserId::new(user)), &request, Timestamp::now())?;
    save_workflow(&workflow, &ctx.database)?;

    tracing::info!(
        event = "tender_awarded",
        tender_id = %outcome.tender.tender_id,
        stage = outcome.stage.as_str(),
        "Tender awarded"
    );
    if ctx.json_mode {
        return print_json(&api::StageResponse::completed(outcome.tender, outcome.message));
    }
    println!("{}", outcome.message);
    println!("Status: {:?}", outcome.tender.status);
    Ok(())
}

/// Complete every eligible auto stage.
pub fn cmd_advance(
    ctx: &Context,
    tender_id: &str,
    user: Option<&str>,
) -> Result<(), TenderflowError> {
    let on_behalf_of = user.map(UserId::new);
    let mut workflow = load_workflow(ctx)?;
    let outcome = workflow.auto_advance(
        &TenderId::new(tender_id),
        on_behalf_of.as_ref(),
        Timestamp::now(),
    )?;
    save_workflow(&workflow, &ctx.database)?;

    if ctx.json_mode {
        return print_json(&outcome);
    }
    if outcome.completed.is_empty() {
        println!("No stage is currently eligible");
    } else {
        for stage in &outcome.completed {
            println!("Completed {}", stage.as_str());
        }
    }
    println!("Progress: {}%", outcome.tender.progress_percent);
    Ok(())
}

// =============================================================================
// MAINTENANCE COMMANDS
// =============================================================================

/// Add the stage-1 record to tenders that lack it.
pub fn cmd_backfill(ctx: &Context, operator: &str) -> Result<(), TenderflowError> {
    let mut workflow = load_workflow(ctx)?;
    let report = workflow.backfill_identification(&UserId::new(operator), Timestamp::now())?;
    save_workflow(&workflow, &ctx.database)?;

    tracing::info!(
        event = "stage1_backfill",
        migrated = report.migrated,
        skipped = report.skipped,
        "Backfill finished"
    );
    if ctx.json_mode {
        return print_json(&report);
    }
    println!("Migrated: {}", report.migrated);
    println!("Skipped:  {}", report.skipped);
    Ok(())
}

/// Tenders from an import file: a JSON array, a JSON snapshot, or a binary snapshot.
pub fn parse_import(data: &[u8]) -> Result<Vec<Tender>, TenderflowError> {
    if let Ok(tenders) = serde_json::from_slice::<Vec<Tender>>(data) {
        return Ok(tenders);
    }
    if let Ok(snapshot) = serde_json::from_slice::<Snapshot>(data) {
        return Ok(snapshot.tenders);
    }
    import_snapshot(data).map(|snapshot| snapshot.tenders).map_err(|_| {
        TenderflowError::InvalidArgument(
            "Import file is neither a JSON tender list nor a snapshot".to_string(),
        )
    })
}

/// Import tenders.
pub fn cmd_import(ctx: &Context, input: &Path, operator: &str) -> Result<(), TenderflowError> {
    let tenders = parse_import(&read_input(input)?)?;
    let mut workflow = load_workflow(ctx)?;
    let count = workflow.import_tenders(tenders, &UserId::new(operator), Timestamp::now())?;
    save_workflow(&workflow, &ctx.database)?;

    if ctx.json_mode {
        return print_json(&serde_json::json!({ "imported": count }));
    }
    println!("Imported {} tenders", count);
    Ok(())
}

/// Export tenders and audit log.
pub fn cmd_export(ctx: &Context, output: &Path, format: &str) -> Result<(), TenderflowError> {
    let validated_output = validate_output_path(output)?;
    let workflow = load_workflow(ctx)?;

    let data = match format {
        "json" => serde_json::to_vec_pretty(&Snapshot::of(&workflow)?)
            .map_err(|e| TenderflowError::Serialization(e.to_string()))?,
        "snapshot" => export_snapshot(&workflow)?,
        _ => {
            return Err(TenderflowError::InvalidArgument(format!(
                "Unknown format: {}. Use: json, snapshot",
                format
            )));
        }
    };

    std::fs::write(&validated_output, &data)
        .map_err(|e| TenderflowError::Storage(format!("Write file: {}", e)))?;

    println!("Exported {} bytes to {:?}", data.len(), validated_output);
    Ok(())
}

/// Show a tender's audit log.
pub fn cmd_audit(ctx: &Context, tender_id: &str) -> Result<(), TenderflowError> {
    let workflow = load_workflow(ctx)?;
    let id = TenderId::new(tender_id);
    let entries = workflow.audit_log(&id)?;

    if ctx.json_mode {
        return print_json(&api::AuditResponse {
            tender_id: id,
            entries,
        });
    }

    println!("Audit log for {}", id);
    println!("==================");
    for entry in &entries {
        println!(
            "#{:<5} {:>14} {:<36} {}",
            entry.sequence,
            entry.timestamp.millis(),
            entry.action,
            entry.performed_by
        );
        for (key, value) in &entry.metadata {
            println!("        {} = {}", key, value);
        }
    }
    Ok(())
}

// =============================================================================
// HELPER FUNCTIONS
// =============================================================================

/// Open the workflow for the configured backend and policy.
pub fn load_workflow(ctx: &Context) -> Result<Workflow, TenderflowError> {
    let workflow = match ctx.backend {
        Backend::Redb => Workflow::with_redb(&ctx.database)?,
        Backend::File => load_snapshot_file(&ctx.database)?,
    };
    Ok(workflow.with_policy(ctx.config.workflow))
}

fn load_snapshot_file(path: &Path) -> Result<Workflow, TenderflowError> {
    if !path.exists() {
        return Ok(Workflow::new());
    }
    validate_file_size(path, MAX_SNAPSHOT_FILE_SIZE)?;
    let data = std::fs::read(path)
        .map_err(|e| TenderflowError::Storage(format!("Read db: {}", e)))?;

    if let Ok(snapshot) = import_snapshot(&data) {
        return Ok(snapshot.into_workflow());
    }
    if let Ok(snapshot) = serde_json::from_slice::<Snapshot>(&data) {
        return Ok(snapshot.into_workflow());
    }
    Err(TenderflowError::Serialization(
        "Could not parse database file".to_string(),
    ))
}

/// Write the snapshot for the file backend. Redb has already committed.
pub fn save_workflow(workflow: &Workflow, path: &Path) -> Result<(), TenderflowError> {
    if workflow.is_persistent() {
        return Ok(());
    }
    let data = export_snapshot(workflow)?;
    std::fs::write(path, &data).map_err(|e| TenderflowError::Storage(format!("Write db: {}", e)))
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use tenderflow_core::StageId;

    fn file_context(dir: &Path) -> Context {
        Context {
            database: dir.join("tenders.snapshot"),
            backend: Backend::File,
            json_mode: true,
            config: Config::default(),
        }
    }

    #[test]
    fn member_arguments_parse() {
        let (user, role) = parse_member("alice:technical").expect("parse");
        assert_eq!(user, UserId::new("alice"));
        assert_eq!(role, Role::new("technical"));
        assert!(parse_member("alice").is_err());
        assert!(parse_member(":admin").is_err());
    }

    #[test]
    fn file_backend_persists_between_commands() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ctx = file_context(dir.path());

        cmd_init(&ctx, false).expect("init");
        assert!(cmd_init(&ctx, false).is_err());

        cmd_create(
            &ctx,
            "alice",
            Some("Harbour dredging".to_string()),
            &["alice:admin".to_string()],
            None,
        )
        .expect("create");
        cmd_finalize(&ctx, "TND-000001", "3_prebid", "alice", Vec::new(), None)
            .expect("finalize");

        let workflow = load_workflow(&ctx).expect("load");
        let tender = workflow.tender(&TenderId::new("TND-000001")).expect("get");
        assert!(tender.is_stage_done(StageId::Identification));
        assert!(tender.is_stage_done(StageId::PreBid));
        assert_eq!(tender.progress_percent, 13);
        assert_eq!(
            workflow
                .audit_log(&tender.tender_id)
                .expect("audit")
                .len(),
            3
        );
    }

    #[test]
    fn redb_backend_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ctx = Context {
            database: dir.path().join("tenders.db"),
            backend: Backend::Redb,
            json_mode: true,
            config: Config::default(),
        };

        cmd_create(&ctx, "bob", Some("Depot".to_string()), &[], None).expect("create");
        let err = cmd_award(&ctx, "TND-000001", "LOA-1", "bob", None).expect_err("owner");
        assert_eq!(err, TenderflowError::AdminOnly);
    }

    #[test]
    fn import_accepts_array_and_snapshot() {
        let tender = Tender::new(TenderId::new("LEGACY-9"), "Legacy");
        let array = serde_json::to_vec(&vec![tender.clone()]).expect("json");
        assert_eq!(parse_import(&array).expect("array").len(), 1);

        let snapshot = Snapshot {
            tenders: vec![tender],
            audit: Vec::new(),
        };
        let object = serde_json::to_vec(&snapshot).expect("json");
        assert_eq!(parse_import(&object).expect("object").len(), 1);

        assert!(parse_import(b"not json").is_err());
    }

    #[test]
    fn export_rejects_unknown_format() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ctx = file_context(dir.path());
        let err = cmd_export(&ctx, &dir.path().join("out.bin"), "xml").expect_err("format");
        assert!(matches!(err, TenderflowError::InvalidArgument(_)));
    }
}
