use crate::backup;
use crate::db;
use crate::ipc::error::{ok, HandlerErr};
use crate::ipc::params::req_str;
use crate::ipc::types::{AppState, Request};
use serde_json::{json, Value};
use std::path::PathBuf;

fn workspace_param(state: &AppState, params: &Value) -> Result<PathBuf, HandlerErr> {
    if let Some(p) = params.get("workspacePath").and_then(|v| v.as_str()) {
        return Ok(PathBuf::from(p));
    }
    state
        .workspace
        .clone()
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))
}

fn backup_export(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let workspace = workspace_param(state, params)?;
    let out_path = PathBuf::from(req_str(params, "outPath")?);

    let summary = backup::export_workspace_bundle(&workspace, &out_path)
        .map_err(|e| HandlerErr::new("io_failed", format!("{e:#}")))?;

    Ok(json!({
        "bundleFormat": summary.bundle_format,
        "entryCount": summary.entry_count,
        "dbSha256": summary.db_sha256,
        "outPath": out_path.to_string_lossy()
    }))
}

fn backup_import(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let workspace = workspace_param(state, params)?;
    let in_path = PathBuf::from(req_str(params, "inPath")?);

    // Drop the live handle before swapping the database file underneath it.
    let restore_into_open_workspace = state.workspace.as_deref() == Some(workspace.as_path());
    if restore_into_open_workspace {
        state.db = None;
    }

    let summary = backup::import_workspace_bundle(&in_path, &workspace)
        .map_err(|e| HandlerErr::new("io_failed", format!("{e:#}")))?;

    if restore_into_open_workspace {
        let conn = db::open_db(&workspace)
            .map_err(|e| HandlerErr::new("db_open_failed", format!("{e:?}")))?;
        state.db = Some(conn);
    }

    Ok(json!({
        "bundleFormatDetected": summary.bundle_format_detected,
        "workspacePath": workspace.to_string_lossy()
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "backup.exportWorkspaceBundle" => Some(match backup_export(state, &req.params) {
            Ok(v) => ok(&req.id, v),
            Err(e) => e.response(&req.id),
        }),
        "backup.importWorkspaceBundle" => Some(match backup_import(state, &req.params) {
            Ok(v) => ok(&req.id, v),
            Err(e) => e.response(&req.id),
        }),
        _ => None,
    }
}
