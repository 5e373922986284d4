//! Authentication and page handlers for the panel: the single admin
//! account, cookie sessions, and the login/setup/editor/stats pages.

use std::fs;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Form, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{Html, IntoResponse, Redirect, Response};
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::api::json_error;
use crate::store::{AccountStore, AdminAccount, PrefsStore};
use crate::ui;
use crate::Config;

const SESSION_COOKIE: &str = "caddypanel_session";
const SESSION_TIMEOUT_HOURS: i64 = 24;
const MIN_PASSWORD_LEN: usize = 8;

/// Session for an authenticated operator.
#[derive(Clone, Debug)]
struct Session {
    token: String,
    created_at: DateTime<Utc>,
    username: String,
}

/// Shared application state: configuration, the on-disk stores, and the
/// in-memory session table.
pub struct PanelState {
    pub config: Config,
    pub accounts: AccountStore,
    pub prefs: PrefsStore,
    sessions: RwLock<Vec<Session>>,
}

impl PanelState {
    pub fn new(config: Config) -> Self {
        let accounts = AccountStore::new(config.panel.data_dir.join("users.json"));
        let prefs = PrefsStore::new(
            config.panel.data_dir.join("preferences.json"),
            config.caddy.config_file.clone(),
        );
        Self {
            config,
            accounts,
            prefs,
            sessions: RwLock::new(Vec::new()),
        }
    }

    fn create_session(&self, username: &str) -> String {
        let token = Uuid::new_v4().to_string();
        let session = Session {
            token: token.clone(),
            created_at: Utc::now(),
            username: username.to_string(),
        };

        // Expired sessions are swept here rather than on a timer.
        let mut sessions = self.sessions.write();
        let cutoff = Utc::now() - Duration::hours(SESSION_TIMEOUT_HOURS);
        sessions.retain(|s| s.created_at > cutoff);
        sessions.push(session);

        token
    }

    fn validate_session(&self, token: &str) -> Option<String> {
        let sessions = self.sessions.read();
        let cutoff = Utc::now() - Duration::hours(SESSION_TIMEOUT_HOURS);
        sessions
            .iter()
            .find(|s| s.token == token && s.created_at > cutoff)
            .map(|s| s.username.clone())
    }

    fn remove_session(&self, token: &str) {
        let mut sessions = self.sessions.write();
        sessions.retain(|s| s.token != token);
    }
}

fn get_session_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::COOKIE)?
        .to_str()
        .ok()?
        .split(';')
        .find_map(|cookie| {
            let parts: Vec<&str> = cookie.trim().splitn(2, '=').collect();
            if parts.len() == 2 && parts[0] == SESSION_COOKIE {
                Some(parts[1].to_string())
            } else {
                None
            }
        })
}

fn is_authenticated(headers: &HeaderMap, state: &PanelState) -> Option<String> {
    let token = get_session_token(headers)?;
    state.validate_session(&token)
}

/// Auth guard for page routes: unauthenticated requests are redirected to
/// the login page.
pub fn require_page_auth(headers: &HeaderMap, state: &PanelState) -> Result<String, Response> {
    is_authenticated(headers, state).ok_or_else(|| Redirect::to("/login").into_response())
}

/// Auth guard for `/api/*` routes: unauthenticated requests get 401 JSON.
pub fn require_api_auth(headers: &HeaderMap, state: &PanelState) -> Result<String, Response> {
    is_authenticated(headers, state)
        .ok_or_else(|| json_error(StatusCode::UNAUTHORIZED, "Authentication required"))
}

fn session_redirect(target: &str, cookie: &str) -> Response {
    Response::builder()
        .status(StatusCode::SEE_OTHER)
        .header(header::LOCATION, target)
        .header(header::SET_COOKIE, cookie)
        .body(Body::empty())
        .unwrap_or_else(|_| Redirect::to(target).into_response())
}

#[derive(Deserialize)]
pub struct LoginForm {
    username: String,
    password: String,
}

#[derive(Deserialize)]
pub struct SetupForm {
    username: String,
    password: String,
    confirm_password: String,
}

pub async fn login_page(State(state): State<Arc<PanelState>>, headers: HeaderMap) -> Response {
    if is_authenticated(&headers, &state).is_some() {
        return Redirect::to("/").into_response();
    }
    if state.accounts.load().is_none() {
        return Redirect::to("/setup").into_response();
    }
    Html(ui::login_page(None)).into_response()
}

pub async fn login_handler(
    State(state): State<Arc<PanelState>>,
    Form(form): Form<LoginForm>,
) -> Response {
    let account = match state.accounts.load() {
        Some(account) => account,
        None => return Redirect::to("/setup").into_response(),
    };

    if form.username == account.username
        && bcrypt::verify(&form.password, &account.password_hash).unwrap_or(false)
    {
        let token = state.create_session(&form.username);
        info!(username = %form.username, "operator logged in");
        return session_redirect(
            "/",
            &format!("{SESSION_COOKIE}={token}; Path=/; HttpOnly; SameSite=Strict"),
        );
    }

    warn!(username = %form.username, "failed login attempt");
    Html(ui::login_page(Some("Invalid username or password."))).into_response()
}

pub async fn logout_handler(State(state): State<Arc<PanelState>>, headers: HeaderMap) -> Response {
    if let Some(token) = get_session_token(&headers) {
        state.remove_session(&token);
    }
    session_redirect(
        "/login",
        &format!("{SESSION_COOKIE}=; Path=/; HttpOnly; Max-Age=0"),
    )
}

pub async fn setup_page(State(state): State<Arc<PanelState>>, headers: HeaderMap) -> Response {
    if state.accounts.load().is_some() {
        // Setup is one-shot; once an admin exists the page goes away.
        if is_authenticated(&headers, &state).is_some() {
            return Redirect::to("/").into_response();
        }
        return Redirect::to("/login").into_response();
    }
    Html(ui::setup_page(None)).into_response()
}

pub async fn setup_handler(
    State(state): State<Arc<PanelState>>,
    Form(form): Form<SetupForm>,
) -> Response {
    if state.accounts.load().is_some() {
        return Redirect::to("/login").into_response();
    }

    if form.username.is_empty() || form.password.is_empty() || form.confirm_password.is_empty() {
        return Html(ui::setup_page(Some("All fields are required."))).into_response();
    }
    if form.password != form.confirm_password {
        return Html(ui::setup_page(Some("Passwords do not match."))).into_response();
    }
    if form.password.len() < MIN_PASSWORD_LEN {
        return Html(ui::setup_page(Some(
            "Password must be at least 8 characters long.",
        )))
        .into_response();
    }

    let password_hash = match bcrypt::hash(&form.password, bcrypt::DEFAULT_COST) {
        Ok(hash) => hash,
        Err(e) => {
            warn!(error = %e, "failed to hash admin password");
            return Html(ui::setup_page(Some("Error saving admin account."))).into_response();
        }
    };
    let account = AdminAccount {
        username: form.username.clone(),
        password_hash,
    };
    match state.accounts.save(&account) {
        Ok(()) => {
            info!(username = %form.username, "admin account created");
            Redirect::to("/login").into_response()
        }
        Err(e) => {
            warn!(error = %e, "failed to save admin account");
            Html(ui::setup_page(Some(
                "Error saving admin account. Check server logs.",
            )))
            .into_response()
        }
    }
}

/// The Caddyfile editor page. The current file content is embedded into the
/// page; a missing or unreadable file becomes an advisory banner instead of
/// an error.
pub async fn index_page(State(state): State<Arc<PanelState>>, headers: HeaderMap) -> Response {
    let username = match require_page_auth(&headers, &state) {
        Ok(username) => username,
        Err(resp) => return resp,
    };

    let caddyfile = &state.config.caddy.config_file;
    let (content, notice) = if caddyfile.exists() {
        if caddyfile.is_file() {
            match fs::read_to_string(caddyfile) {
                Ok(content) => (content, None),
                Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => (
                    String::new(),
                    Some(format!(
                        "Error: Permission denied reading Caddyfile at '{}'.",
                        caddyfile.display()
                    )),
                ),
                Err(e) => (String::new(), Some(format!("Error reading Caddyfile: {e}"))),
            }
        } else {
            (
                String::new(),
                Some(format!(
                    "Error: Configured Caddyfile path '{}' is not a file.",
                    caddyfile.display()
                )),
            )
        }
    } else {
        (
            String::new(),
            Some(format!(
                "Warning: Caddyfile at '{}' not found.",
                caddyfile.display()
            )),
        )
    };

    Html(ui::editor_page(&username, &content, notice.as_deref())).into_response()
}

pub async fn stats_page(State(state): State<Arc<PanelState>>, headers: HeaderMap) -> Response {
    match require_page_auth(&headers, &state) {
        Ok(username) => Html(ui::stats_page(&username)).into_response(),
        Err(resp) => resp,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> (tempfile::TempDir, PanelState) {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.panel.data_dir = dir.path().to_path_buf();
        let state = PanelState::new(config);
        (dir, state)
    }

    fn headers_with_cookie(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            format!("other=1; {SESSION_COOKIE}={token}")
                .parse()
                .unwrap(),
        );
        headers
    }

    #[test]
    fn session_round_trip() {
        let (_dir, state) = state();
        let token = state.create_session("admin");
        assert_eq!(state.validate_session(&token).as_deref(), Some("admin"));
        state.remove_session(&token);
        assert_eq!(state.validate_session(&token), None);
    }

    #[test]
    fn cookie_parsing_finds_the_session_token() {
        let headers = headers_with_cookie("abc-123");
        assert_eq!(get_session_token(&headers).as_deref(), Some("abc-123"));
        assert_eq!(get_session_token(&HeaderMap::new()), None);
    }

    #[test]
    fn authenticated_lookup_goes_through_the_session_table() {
        let (_dir, state) = state();
        let token = state.create_session("admin");
        let headers = headers_with_cookie(&token);
        assert_eq!(is_authenticated(&headers, &state).as_deref(), Some("admin"));

        let bogus = headers_with_cookie("not-a-token");
        assert_eq!(is_authenticated(&bogus, &state), None);
    }
}
