//! On-disk state for the panel: the single admin account and the UI
//! preferences. Both are small JSON documents re-read on each use, so edits
//! made behind the panel's back are picked up without a restart.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

/// The panel has at most one privileged identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminAccount {
    pub username: String,
    pub password_hash: String,
}

/// Store for the optional admin account, persisted as a single JSON object.
#[derive(Clone)]
pub struct AccountStore {
    path: PathBuf,
}

impl AccountStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// `None` when no admin has been set up yet. A corrupt file is treated
    /// the same way, with a diagnostic, so a broken store forces re-setup
    /// instead of locking the operator out.
    pub fn load(&self) -> Option<AdminAccount> {
        let data = match fs::read_to_string(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "failed to read account store");
                return None;
            }
        };
        match serde_json::from_str(&data) {
            Ok(account) => Some(account),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "account store is corrupt, assuming no admin");
                None
            }
        }
    }

    pub fn save(&self, account: &AdminAccount) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating data dir {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(account)?;
        fs::write(&self.path, json)
            .with_context(|| format!("writing account store {}", self.path.display()))
    }
}

/// UI preferences, persisted as JSON with the original panel's camelCase
/// key names so existing preference files keep working.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Preferences {
    pub theme: String,
    /// Always forced to the configured Caddyfile path on load and save;
    /// clients cannot point the editor elsewhere.
    pub caddyfile_path: String,
    pub caddy_reload_cmd: String,
    pub global_admin_email: String,
    pub default_authentik_enabled: bool,
    pub default_authentik_outpost_url: String,
    pub default_authentik_uri: String,
    pub default_authentik_copy_headers: String,
    pub default_authentik_trusted_proxies: String,
    pub default_skip_tls_verify: bool,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            theme: "theme-light-gray".to_string(),
            caddyfile_path: String::new(),
            caddy_reload_cmd: String::new(),
            global_admin_email: String::new(),
            default_authentik_enabled: false,
            default_authentik_outpost_url: "http://authentik.local:9000".to_string(),
            default_authentik_uri: "/outpost.goauthentik.io/auth/caddy".to_string(),
            default_authentik_copy_headers: "X-Authentik-Username X-Authentik-Groups \
                 X-Authentik-Email X-Authentik-Name X-Authentik-Uid X-Authentik-Jwt \
                 X-Authentik-Meta-Jwks"
                .to_string(),
            default_authentik_trusted_proxies: "private_ranges".to_string(),
            default_skip_tls_verify: false,
        }
    }
}

impl Preferences {
    fn defaults_for(caddy_config: &Path) -> Self {
        let mut prefs = Self::default();
        prefs.caddyfile_path = caddy_config.display().to_string();
        prefs.caddy_reload_cmd = format!(
            "caddy reload --config {} --adapter caddyfile",
            caddy_config.display()
        );
        prefs
    }

    /// Apply a client-supplied update. Each known key is validated
    /// independently; an invalid value keeps the current one and is reported
    /// in the returned error list. Unknown keys are ignored.
    pub fn merge_update(&mut self, input: &serde_json::Map<String, Value>) -> Vec<String> {
        let mut errors = Vec::new();

        take_string(input, "theme", &mut self.theme, &mut errors);

        if let Some(value) = input.get("globalAdminEmail") {
            match value.as_str() {
                Some(email) if email.is_empty() || email_looks_valid(email) => {
                    self.global_admin_email = email.to_string();
                }
                Some(_) => errors.push("Invalid format for 'globalAdminEmail'".to_string()),
                None => errors.push("Invalid type for 'globalAdminEmail'".to_string()),
            }
        }

        if let Some(value) = input.get("caddyReloadCmd") {
            match value.as_str() {
                Some(cmd) if !cmd.is_empty() => self.caddy_reload_cmd = cmd.to_string(),
                Some(_) => {
                    errors.push("Invalid value for 'caddyReloadCmd': Cannot be empty.".to_string())
                }
                None => errors.push("Invalid type for 'caddyReloadCmd'".to_string()),
            }
        }

        // caddyfilePath is accepted but never honored; it is pinned to the
        // server configuration.

        take_bool(input, "defaultAuthentikEnabled", &mut self.default_authentik_enabled, &mut errors);
        take_string(input, "defaultAuthentikOutpostUrl", &mut self.default_authentik_outpost_url, &mut errors);
        take_string(input, "defaultAuthentikUri", &mut self.default_authentik_uri, &mut errors);
        take_string(input, "defaultAuthentikCopyHeaders", &mut self.default_authentik_copy_headers, &mut errors);
        take_string(input, "defaultAuthentikTrustedProxies", &mut self.default_authentik_trusted_proxies, &mut errors);
        take_bool(input, "defaultSkipTlsVerify", &mut self.default_skip_tls_verify, &mut errors);

        errors
    }
}

fn take_string(
    input: &serde_json::Map<String, Value>,
    key: &str,
    target: &mut String,
    errors: &mut Vec<String>,
) {
    if let Some(value) = input.get(key) {
        match value.as_str() {
            Some(s) => *target = s.to_string(),
            None => errors.push(format!("Invalid type for '{key}'")),
        }
    }
}

fn take_bool(
    input: &serde_json::Map<String, Value>,
    key: &str,
    target: &mut bool,
    errors: &mut Vec<String>,
) {
    if let Some(value) = input.get(key) {
        match value.as_bool() {
            Some(b) => *target = b,
            None => errors.push(format!("Invalid type for '{key}'")),
        }
    }
}

fn email_looks_valid(email: &str) -> bool {
    // Same loose shape the original panel accepted.
    match Regex::new(r"^[^@]+@[^@]+\.[^@]+$") {
        Ok(re) => re.is_match(email),
        Err(_) => false,
    }
}

/// Store for the preferences file.
#[derive(Clone)]
pub struct PrefsStore {
    path: PathBuf,
    caddy_config: PathBuf,
}

impl PrefsStore {
    pub fn new(path: PathBuf, caddy_config: PathBuf) -> Self {
        Self { path, caddy_config }
    }

    /// Load preferences, falling back to defaults when the file is missing
    /// or corrupt. Missing keys are filled with their defaults and the
    /// Caddyfile path is pinned either way.
    pub fn load(&self) -> Preferences {
        let mut prefs = match fs::read_to_string(&self.path) {
            Ok(data) => match serde_json::from_str::<Preferences>(&data) {
                Ok(prefs) => prefs,
                Err(e) => {
                    warn!(path = %self.path.display(), error = %e, "preferences file is corrupt, using defaults");
                    Preferences::defaults_for(&self.caddy_config)
                }
            },
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = %self.path.display(), error = %e, "failed to read preferences, using defaults");
                }
                Preferences::defaults_for(&self.caddy_config)
            }
        };
        self.pin_defaults(&mut prefs);
        prefs
    }

    pub fn save(&self, prefs: &Preferences) -> Result<()> {
        let mut prefs = prefs.clone();
        self.pin_defaults(&mut prefs);
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating data dir {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(&prefs)?;
        fs::write(&self.path, json)
            .with_context(|| format!("writing preferences {}", self.path.display()))
    }

    fn pin_defaults(&self, prefs: &mut Preferences) {
        prefs.caddyfile_path = self.caddy_config.display().to_string();
        if prefs.caddy_reload_cmd.is_empty() {
            prefs.caddy_reload_cmd = format!(
                "caddy reload --config {} --adapter caddyfile",
                self.caddy_config.display()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stores(dir: &Path) -> (AccountStore, PrefsStore) {
        (
            AccountStore::new(dir.join("users.json")),
            PrefsStore::new(dir.join("preferences.json"), PathBuf::from("/etc/caddy/Caddyfile")),
        )
    }

    #[test]
    fn account_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let (accounts, _) = stores(dir.path());
        assert!(accounts.load().is_none());

        let account = AdminAccount {
            username: "admin".to_string(),
            password_hash: "$2b$12$fake".to_string(),
        };
        accounts.save(&account).unwrap();
        let loaded = accounts.load().unwrap();
        assert_eq!(loaded.username, "admin");
        assert_eq!(loaded.password_hash, "$2b$12$fake");
    }

    #[test]
    fn corrupt_account_store_means_no_admin() {
        let dir = tempfile::tempdir().unwrap();
        let (accounts, _) = stores(dir.path());
        fs::write(dir.path().join("users.json"), "{broken").unwrap();
        assert!(accounts.load().is_none());
    }

    #[test]
    fn missing_preferences_yield_pinned_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let (_, prefs_store) = stores(dir.path());
        let prefs = prefs_store.load();
        assert_eq!(prefs.theme, "theme-light-gray");
        assert_eq!(prefs.caddyfile_path, "/etc/caddy/Caddyfile");
        assert!(prefs.caddy_reload_cmd.contains("caddy reload"));
    }

    #[test]
    fn preferences_round_trip_pins_caddyfile_path() {
        let dir = tempfile::tempdir().unwrap();
        let (_, prefs_store) = stores(dir.path());
        let mut prefs = prefs_store.load();
        prefs.theme = "theme-dark".to_string();
        prefs.caddyfile_path = "/tmp/elsewhere".to_string();
        prefs_store.save(&prefs).unwrap();

        let loaded = prefs_store.load();
        assert_eq!(loaded.theme, "theme-dark");
        assert_eq!(loaded.caddyfile_path, "/etc/caddy/Caddyfile");
    }

    #[test]
    fn merge_update_validates_per_key() {
        let mut prefs = Preferences::defaults_for(Path::new("/etc/caddy/Caddyfile"));
        let input = serde_json::json!({
            "theme": "theme-dark",
            "globalAdminEmail": "not-an-email",
            "caddyReloadCmd": "",
            "defaultSkipTlsVerify": "yes",
            "unknownKey": 42,
        });
        let errors = prefs.merge_update(input.as_object().unwrap());

        assert_eq!(prefs.theme, "theme-dark");
        assert_eq!(prefs.global_admin_email, "");
        assert!(prefs.caddy_reload_cmd.contains("caddy reload"));
        assert!(!prefs.default_skip_tls_verify);
        assert_eq!(errors.len(), 3);
        assert!(errors.iter().any(|e| e.contains("globalAdminEmail")));
        assert!(errors.iter().any(|e| e.contains("caddyReloadCmd")));
        assert!(errors.iter().any(|e| e.contains("defaultSkipTlsVerify")));
    }

    #[test]
    fn merge_update_accepts_valid_email() {
        let mut prefs = Preferences::default();
        let input = serde_json::json!({ "globalAdminEmail": "ops@example.com" });
        let errors = prefs.merge_update(input.as_object().unwrap());
        assert!(errors.is_empty());
        assert_eq!(prefs.global_admin_email, "ops@example.com");
    }

    #[test]
    fn preferences_serialize_with_camel_case_keys() {
        let prefs = Preferences::default();
        let json = serde_json::to_value(&prefs).unwrap();
        assert!(json.get("caddyReloadCmd").is_some());
        assert!(json.get("globalAdminEmail").is_some());
        assert!(json.get("defaultSkipTlsVerify").is_some());
    }
}
