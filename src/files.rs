//! Sandboxed filesystem access for the editor UI: directory browsing, file
//! reads, and saving the Caddyfile. Every path coming from the client is
//! resolved against the configured browse root and rejected if it escapes.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::Response;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::admin::{require_api_auth, PanelState};
use crate::api::{json_error, json_ok};

#[derive(Debug, Serialize)]
pub struct BrowseItem {
    pub name: String,
    pub path: String,
    pub is_dir: bool,
}

#[derive(Debug, Serialize)]
pub struct BrowseListing {
    pub current_path: String,
    pub parent_path: Option<String>,
    pub items: Vec<BrowseItem>,
}

#[derive(Debug)]
pub enum SandboxError {
    Forbidden,
    NotFound,
    Io(std::io::Error),
}

/// Resolve a client-supplied relative path inside `base`, refusing anything
/// that escapes it. The target must exist; resolution canonicalizes symlinks
/// so a link pointing outside the sandbox is caught too.
fn resolve_sandboxed(base: &Path, requested: &str) -> Result<PathBuf, SandboxError> {
    let base = base.canonicalize().map_err(SandboxError::Io)?;
    let joined = base.join(requested.trim_start_matches('/'));
    let resolved = match joined.canonicalize() {
        Ok(p) => p,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(SandboxError::NotFound),
        Err(e) => return Err(SandboxError::Io(e)),
    };
    if !resolved.starts_with(&base) {
        return Err(SandboxError::Forbidden);
    }
    Ok(resolved)
}

fn relative_display(base: &Path, path: &Path) -> String {
    let base = base.canonicalize().unwrap_or_else(|_| base.to_path_buf());
    match path.strip_prefix(&base) {
        Ok(rel) if rel.as_os_str().is_empty() => ".".to_string(),
        Ok(rel) => rel.to_string_lossy().replace('\\', "/"),
        Err(_) => path.to_string_lossy().to_string(),
    }
}

/// List a directory inside the sandbox: directories first, then files,
/// case-insensitive name order.
pub fn list_directory(base: &Path, requested: &str) -> Result<BrowseListing, SandboxError> {
    let dir = resolve_sandboxed(base, requested)?;
    if !dir.is_dir() {
        return Err(SandboxError::NotFound);
    }

    let mut items = Vec::new();
    for entry in fs::read_dir(&dir).map_err(SandboxError::Io)? {
        let entry = match entry {
            Ok(entry) => entry,
            Err(_) => continue,
        };
        let path = entry.path();
        items.push(BrowseItem {
            name: entry.file_name().to_string_lossy().to_string(),
            path: relative_display(base, &path),
            is_dir: path.is_dir(),
        });
    }
    items.sort_by(|a, b| {
        (!a.is_dir, a.name.to_lowercase()).cmp(&(!b.is_dir, b.name.to_lowercase()))
    });

    let current = relative_display(base, &dir);
    let parent_path = if current == "." {
        None
    } else {
        dir.parent().map(|p| {
            let rel = relative_display(base, p);
            if rel == "." {
                String::new()
            } else {
                rel
            }
        })
    };

    Ok(BrowseListing {
        current_path: current,
        parent_path,
        items,
    })
}

/// Read a file inside the sandbox as UTF-8 text.
pub fn read_sandboxed_file(base: &Path, requested: &str) -> Result<String, SandboxError> {
    let path = resolve_sandboxed(base, requested)?;
    if !path.is_file() {
        return Err(SandboxError::NotFound);
    }
    fs::read_to_string(&path).map_err(SandboxError::Io)
}

#[derive(Deserialize)]
pub struct BrowseQuery {
    #[serde(default = "default_browse_path")]
    path: String,
}

fn default_browse_path() -> String {
    ".".to_string()
}

pub async fn browse_handler(
    State(state): State<Arc<PanelState>>,
    headers: axum::http::HeaderMap,
    Query(query): Query<BrowseQuery>,
) -> Response {
    if let Err(resp) = require_api_auth(&headers, &state) {
        return resp;
    }
    match list_directory(&state.config.panel.browse_root, &query.path) {
        Ok(listing) => json_ok(serde_json::json!(listing)),
        Err(SandboxError::Forbidden) => json_error(StatusCode::FORBIDDEN, "Path is outside the allowed directory"),
        Err(SandboxError::NotFound) => json_error(StatusCode::NOT_FOUND, "Directory not found"),
        Err(SandboxError::Io(e)) => {
            warn!(error = %e, path = %query.path, "browse failed");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to list directory")
        }
    }
}

#[derive(Deserialize)]
pub struct ReadFileQuery {
    path: Option<String>,
}

pub async fn readfile_handler(
    State(state): State<Arc<PanelState>>,
    headers: axum::http::HeaderMap,
    Query(query): Query<ReadFileQuery>,
) -> Response {
    if let Err(resp) = require_api_auth(&headers, &state) {
        return resp;
    }
    let requested = match query.path {
        Some(path) if !path.is_empty() => path,
        _ => return json_error(StatusCode::BAD_REQUEST, "No path"),
    };
    match read_sandboxed_file(&state.config.panel.browse_root, &requested) {
        Ok(content) => json_ok(serde_json::json!({
            "status": "success",
            "path": requested,
            "content": content,
        })),
        Err(SandboxError::Forbidden) => json_error(StatusCode::FORBIDDEN, "Path is outside the allowed directory"),
        Err(SandboxError::NotFound) => json_error(StatusCode::NOT_FOUND, "Not a file"),
        Err(SandboxError::Io(e)) => {
            if e.kind() == std::io::ErrorKind::PermissionDenied {
                json_error(StatusCode::FORBIDDEN, "Permission denied")
            } else {
                warn!(error = %e, path = %requested, "readfile failed");
                json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to read file")
            }
        }
    }
}

#[derive(Deserialize)]
pub struct SaveCaddyfileBody {
    content: Option<String>,
}

pub async fn save_caddyfile_handler(
    State(state): State<Arc<PanelState>>,
    headers: axum::http::HeaderMap,
    axum::Json(body): axum::Json<SaveCaddyfileBody>,
) -> Response {
    if let Err(resp) = require_api_auth(&headers, &state) {
        return resp;
    }
    let content = match body.content {
        Some(content) => content,
        None => return json_error(StatusCode::BAD_REQUEST, "No content"),
    };
    let target = &state.config.caddy.config_file;
    if let Some(parent) = target.parent() {
        if let Err(e) = fs::create_dir_all(parent) {
            warn!(error = %e, "failed to create Caddyfile directory");
            return json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to create Caddyfile directory");
        }
    }
    match fs::write(target, content) {
        Ok(()) => {
            info!(path = %target.display(), "Caddyfile saved");
            json_ok(serde_json::json!({
                "status": "success",
                "message": format!("Caddyfile saved to {}", target.display()),
            }))
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            &format!("Permission denied writing to {}", target.display()),
        ),
        Err(e) => {
            warn!(error = %e, path = %target.display(), "failed to save Caddyfile");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to save Caddyfile")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("Caddyfile"), "example.com {\n}\n").unwrap();
        fs::write(dir.path().join("sub/notes.txt"), "hello").unwrap();
        dir
    }

    #[test]
    fn lists_root_with_dirs_first() {
        let dir = fixture();
        let listing = list_directory(dir.path(), ".").unwrap();
        assert_eq!(listing.current_path, ".");
        assert_eq!(listing.parent_path, None);
        let names: Vec<&str> = listing.items.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["sub", "Caddyfile"]);
        assert!(listing.items[0].is_dir);
    }

    #[test]
    fn subdirectory_gets_a_parent_link() {
        let dir = fixture();
        let listing = list_directory(dir.path(), "sub").unwrap();
        assert_eq!(listing.current_path, "sub");
        assert_eq!(listing.parent_path.as_deref(), Some(""));
        assert_eq!(listing.items.len(), 1);
        assert_eq!(listing.items[0].name, "notes.txt");
    }

    #[test]
    fn dotdot_escape_is_rejected() {
        let dir = fixture();
        match list_directory(dir.path().join("sub").as_path(), "..") {
            Err(SandboxError::Forbidden) => {}
            other => panic!("expected Forbidden, got {:?}", other.map(|l| l.current_path)),
        }
    }

    #[test]
    fn missing_directory_is_not_found() {
        let dir = fixture();
        assert!(matches!(
            list_directory(dir.path(), "does-not-exist"),
            Err(SandboxError::NotFound)
        ));
    }

    #[test]
    fn file_path_is_not_a_directory() {
        let dir = fixture();
        assert!(matches!(
            list_directory(dir.path(), "Caddyfile"),
            Err(SandboxError::NotFound)
        ));
    }

    #[test]
    fn reads_files_inside_the_sandbox() {
        let dir = fixture();
        let content = read_sandboxed_file(dir.path(), "sub/notes.txt").unwrap();
        assert_eq!(content, "hello");
    }

    #[test]
    fn read_rejects_escapes() {
        let dir = fixture();
        assert!(matches!(
            read_sandboxed_file(dir.path().join("sub").as_path(), "../Caddyfile"),
            Err(SandboxError::Forbidden)
        ));
    }

    #[test]
    fn read_rejects_directories() {
        let dir = fixture();
        assert!(matches!(
            read_sandboxed_file(dir.path(), "sub"),
            Err(SandboxError::NotFound)
        ));
    }
}
