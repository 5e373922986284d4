use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use axum::routing::{get, post};
use axum::Router;
use serde::Deserialize;
use tokio::fs;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod admin;
mod api;
mod caddy;
mod files;
mod stats;
mod store;
mod ui;

use admin::PanelState;

const CONFIG_FILE: &str = "caddypanel.toml";

const DEFAULT_CONFIG: &str = r#"[server]
host = "0.0.0.0"
port = 5000

[caddy]
config_file = "/etc/caddy/Caddyfile"
access_log = "/var/log/caddy_access.json.log"

[panel]
data_dir = "."
browse_root = "."
"#;

#[derive(Deserialize, Clone, Debug, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub caddy: CaddyConfig,
    #[serde(default)]
    pub panel: PanelConfig,
}

#[derive(Deserialize, Clone, Debug)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Deserialize, Clone, Debug)]
pub struct CaddyConfig {
    /// The Caddyfile the editor reads and writes.
    #[serde(default = "default_caddyfile")]
    pub config_file: PathBuf,
    /// Caddy's JSON access log, consumed by the stats page.
    #[serde(default = "default_access_log")]
    pub access_log: PathBuf,
}

fn default_caddyfile() -> PathBuf {
    PathBuf::from("/etc/caddy/Caddyfile")
}

fn default_access_log() -> PathBuf {
    PathBuf::from("/var/log/caddy_access.json.log")
}

impl Default for CaddyConfig {
    fn default() -> Self {
        Self {
            config_file: default_caddyfile(),
            access_log: default_access_log(),
        }
    }
}

#[derive(Deserialize, Clone, Debug)]
pub struct PanelConfig {
    /// Where users.json and preferences.json live.
    #[serde(default = "default_dir")]
    pub data_dir: PathBuf,
    /// Root of the file browser sandbox.
    #[serde(default = "default_dir")]
    pub browse_root: PathBuf,
}

fn default_dir() -> PathBuf {
    PathBuf::from(".")
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self {
            data_dir: default_dir(),
            browse_root: default_dir(),
        }
    }
}

async fn load_config() -> anyhow::Result<Config> {
    let config_str = match fs::read_to_string(CONFIG_FILE).await {
        Ok(s) => s,
        Err(_) => {
            eprintln!("Configuration file '{CONFIG_FILE}' not found. Creating default.");
            fs::write(CONFIG_FILE, DEFAULT_CONFIG)
                .await
                .with_context(|| format!("writing default {CONFIG_FILE}"))?;
            DEFAULT_CONFIG.to_string()
        }
    };
    toml::from_str(&config_str).with_context(|| format!("parsing {CONFIG_FILE}"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    println!(
        r#"
   ____          _     _       ____                  _
  / ___|__ _  __| | __| |_   _|  _ \ __ _ _ __   ___| |
 | |   / _` |/ _` |/ _` | | | | |_) / _` | '_ \ / _ \ |
 | |__| (_| | (_| | (_| | |_| |  __/ (_| | | | |  __/ |
  \____\__,_|\__,_|\__,_|\__, |_|   \__,_|_| |_|\___|_|
                         |___/
"#
    );

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = load_config().await?;

    fs::create_dir_all(&config.panel.data_dir)
        .await
        .with_context(|| format!("creating data dir {}", config.panel.data_dir.display()))?;
    if let Some(parent) = config.caddy.config_file.parent() {
        fs::create_dir_all(parent)
            .await
            .with_context(|| format!("creating Caddyfile dir {}", parent.display()))?;
    }

    let state = Arc::new(PanelState::new(config.clone()));

    // Seed the preferences file so first GET /api/preferences reflects what
    // is actually on disk.
    if !config.panel.data_dir.join("preferences.json").exists() {
        let defaults = state.prefs.load();
        state.prefs.save(&defaults)?;
        info!("created default preferences file");
    }

    let app = Router::new()
        .route("/", get(admin::index_page))
        .route("/login", get(admin::login_page).post(admin::login_handler))
        .route("/logout", get(admin::logout_handler))
        .route("/setup", get(admin::setup_page).post(admin::setup_handler))
        .route("/stats", get(admin::stats_page))
        .route(
            "/api/preferences",
            get(api::get_preferences).post(api::post_preferences),
        )
        .route("/api/browse", get(files::browse_handler))
        .route("/api/readfile", get(files::readfile_handler))
        .route("/api/caddyfile/save", post(files::save_caddyfile_handler))
        .route("/api/caddy/reload", post(api::reload_caddy))
        .route(
            "/api/caddyfile/configure_logging",
            post(api::configure_logging),
        )
        .route("/api/stats/global", get(api::global_stats))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .with_context(|| "invalid [server] host/port")?;
    println!("CaddyPanel listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
