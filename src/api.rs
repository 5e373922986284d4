//! JSON API handlers: preferences, global stats, proxy reload, and the
//! Caddyfile logging patch. Response bodies follow the panel's wire shape,
//! `{"status": "...", "message": "...", ...}`.

use std::fs;
use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::admin::{require_api_auth, PanelState};
use crate::caddy::{self, ReloadOutcome};
use crate::stats;

pub fn json_response(status: StatusCode, value: Value) -> Response {
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "application/json")
        .body(axum::body::Body::from(value.to_string()))
        .unwrap_or_else(|_| {
            (StatusCode::INTERNAL_SERVER_ERROR, "response build failed").into_response()
        })
}

pub fn json_ok(value: Value) -> Response {
    json_response(StatusCode::OK, value)
}

pub fn json_error(status: StatusCode, message: &str) -> Response {
    json_response(status, json!({ "status": "error", "message": message }))
}

pub async fn get_preferences(
    State(state): State<Arc<PanelState>>,
    headers: HeaderMap,
) -> Response {
    if let Err(resp) = require_api_auth(&headers, &state) {
        return resp;
    }
    let prefs = state.prefs.load();
    json_ok(json!(prefs))
}

pub async fn post_preferences(
    State(state): State<Arc<PanelState>>,
    headers: HeaderMap,
    axum::Json(body): axum::Json<Value>,
) -> Response {
    if let Err(resp) = require_api_auth(&headers, &state) {
        return resp;
    }
    let input = match body.as_object() {
        Some(input) => input,
        None => return json_error(StatusCode::BAD_REQUEST, "Invalid data format"),
    };

    let mut prefs = state.prefs.load();
    let errors = prefs.merge_update(input);

    if let Err(e) = state.prefs.save(&prefs) {
        warn!(error = %e, "failed to save preferences");
        return json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to save preferences");
    }

    if errors.is_empty() {
        json_ok(json!({
            "status": "success",
            "message": "Preferences saved",
            "saved_prefs": prefs,
        }))
    } else {
        // Valid keys are still saved; the caller sees which ones were not.
        json_ok(json!({
            "status": "warning",
            "message": "Preferences saved with errors.",
            "errors": errors,
            "saved_prefs": prefs,
        }))
    }
}

/// Run the stats query against the current on-disk log tail. Always returns
/// a well-formed report; when nothing usable was read, an advisory in
/// `log_read_error` tells the operator whether the log file is missing or
/// just has no processable entries.
pub async fn global_stats(State(state): State<Arc<PanelState>>, headers: HeaderMap) -> Response {
    if let Err(resp) = require_api_auth(&headers, &state) {
        return resp;
    }

    let log_path = state.config.caddy.access_log.clone();
    let report = tokio::task::spawn_blocking(move || {
        let mut report = stats::compute_stats(&log_path, stats::MAX_LOG_RECORDS);
        if report.total_requests == 0 {
            report.log_read_error = Some(if !log_path.exists() {
                format!(
                    "Log file {} not found. Configure Caddy for JSON logging to stdout.",
                    log_path.display()
                )
            } else {
                format!(
                    "No processable log entries in {}. Check Caddy log format.",
                    log_path.display()
                )
            });
        }
        report
    })
    .await;

    match report {
        Ok(report) => json_ok(json!(report)),
        Err(e) => {
            warn!(error = %e, "stats task failed");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "Server error processing logs")
        }
    }
}

pub async fn reload_caddy(State(state): State<Arc<PanelState>>, headers: HeaderMap) -> Response {
    if let Err(resp) = require_api_auth(&headers, &state) {
        return resp;
    }
    let command = state.prefs.load().caddy_reload_cmd;
    if command.is_empty() {
        return json_error(StatusCode::BAD_REQUEST, "Reload command not configured.");
    }

    match caddy::run_reload(&command).await {
        ReloadOutcome::Success { stdout } => json_ok(json!({
            "status": "success",
            "message": "Caddy reloaded.",
            "output": stdout,
        })),
        ReloadOutcome::Failed { code, detail } => json_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            json!({
                "status": "error",
                "message": format!("Reload failed. Code: {}.", code.map_or_else(|| "?".to_string(), |c| c.to_string())),
                "details": detail,
            }),
        ),
        ReloadOutcome::CommandNotFound => {
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "Caddy command not found.")
        }
        ReloadOutcome::TimedOut => {
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "Reload command timed out.")
        }
    }
}

/// Patch the Caddyfile for JSON logging to stdout, then reload the proxy.
/// A missing reload command or a failed reload downgrades to a warning: the
/// file edit already happened and the operator needs to know both facts.
pub async fn configure_logging(
    State(state): State<Arc<PanelState>>,
    headers: HeaderMap,
) -> Response {
    if let Err(resp) = require_api_auth(&headers, &state) {
        return resp;
    }

    let caddyfile = &state.config.caddy.config_file;
    if !caddyfile.exists() {
        return json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            &format!(
                "Caddyfile not found at {}. Cannot configure logging.",
                caddyfile.display()
            ),
        );
    }

    let content = match fs::read_to_string(caddyfile) {
        Ok(content) => content,
        Err(e) => {
            warn!(error = %e, path = %caddyfile.display(), "failed to read Caddyfile");
            return json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to read Caddyfile");
        }
    };

    let patched = match caddy::inject_log_directive(&content) {
        Ok(patched) => patched,
        Err(e) => {
            warn!(error = %e, "logging patch failed");
            return json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                &format!("Could not update Caddyfile: {e}"),
            );
        }
    };

    if let Err(e) = fs::write(caddyfile, patched) {
        if e.kind() == std::io::ErrorKind::PermissionDenied {
            return json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                &format!("Permission denied modifying Caddyfile at {}", caddyfile.display()),
            );
        }
        warn!(error = %e, "failed to write patched Caddyfile");
        return json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to write Caddyfile");
    }
    info!(path = %caddyfile.display(), "Caddyfile patched for JSON logging");

    let command = state.prefs.load().caddy_reload_cmd;
    if command.is_empty() {
        return json_ok(json!({
            "status": "warning",
            "message": "Caddyfile updated for logging, but reload command not configured. Please reload Caddy manually.",
        }));
    }

    match caddy::run_reload(&command).await {
        ReloadOutcome::Success { .. } => json_ok(json!({
            "status": "success",
            "message": "Caddyfile updated for JSON logging and Caddy reloaded successfully.",
        })),
        ReloadOutcome::Failed { code, detail } => json_ok(json!({
            "status": "warning",
            "message": format!(
                "Caddyfile updated for JSON logging, but Caddy reload failed (Code: {}). Check Caddy logs or Caddyfile syntax.",
                code.map_or_else(|| "?".to_string(), |c| c.to_string())
            ),
            "details": detail,
        })),
        ReloadOutcome::CommandNotFound => json_ok(json!({
            "status": "warning",
            "message": "Caddyfile updated for JSON logging, but the Caddy command was not found.",
        })),
        ReloadOutcome::TimedOut => json_ok(json!({
            "status": "warning",
            "message": "Caddyfile updated for JSON logging, but the Caddy reload timed out.",
        })),
    }
}
