use anyhow::{Context, Result};
use clap::{value_parser, Arg, ArgAction, Command, ValueEnum};
use config::{Config, File as ConfigFile};
use docreg_registry::{
    DocumentRegistry, MemoryBackend, RegistryEvent, RegistryOptions, SledBackend,
    DEFAULT_EVENT_CAPACITY,
};
use docreg_rpc::{start_server, AppState, DEFAULT_MAX_CLOCK_SKEW_SECS};
use docreg_time::{Clock, SystemClock};
use serde::Serialize;
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod version;

use version::{git_commit_hash, DOCREG_VERSION};

const DEFAULT_CONFIG_PATH: &str = "config/docreg.toml";
const DEFAULT_RPC_HOST: &str = "127.0.0.1";
const DEFAULT_RPC_PORT: u16 = 8080;
const DEFAULT_DATA_DIR: &str = "./data";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
enum StorageBackendKind {
    Memory,
    Sled,
}

impl StorageBackendKind {
    fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "sled" => Ok(Self::Sled),
            other => {
                anyhow::bail!("unknown storage backend '{other}'; expected 'memory' or 'sled'")
            }
        }
    }
}

impl fmt::Display for StorageBackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageBackendKind::Memory => write!(f, "memory"),
            StorageBackendKind::Sled => write!(f, "sled"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct AppConfig {
    config_path: Option<PathBuf>,
    rpc_host: String,
    rpc_port: u16,
    storage_backend: StorageBackendKind,
    data_dir: String,
    max_clock_skew_secs: u64,
    event_capacity: usize,
    log_level: String,
    log_format: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            config_path: None,
            rpc_host: DEFAULT_RPC_HOST.to_string(),
            rpc_port: DEFAULT_RPC_PORT,
            storage_backend: StorageBackendKind::Sled,
            data_dir: DEFAULT_DATA_DIR.to_string(),
            max_clock_skew_secs: DEFAULT_MAX_CLOCK_SKEW_SECS,
            event_capacity: DEFAULT_EVENT_CAPACITY,
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
        }
    }
}

impl AppConfig {
    fn load(config_path_override: Option<&str>) -> Result<Self> {
        let resolved_path = if let Some(path) = config_path_override {
            let path = PathBuf::from(path);
            if !path.exists() {
                anyhow::bail!(
                    "Configuration file {} not found (specified via --config)",
                    path.display()
                );
            }
            Some(path)
        } else {
            let path = PathBuf::from(DEFAULT_CONFIG_PATH);
            path.exists().then_some(path)
        };

        let mut builder = Config::builder();
        if let Some(path) = &resolved_path {
            builder = builder.add_source(ConfigFile::from(path.as_path()));
        }
        builder = builder.add_source(config::Environment::with_prefix("DOCREG"));
        let config = builder.build()?;

        Self::from_config(&config, resolved_path)
    }

    /// Resolve each setting from a TOML key (`rpc.port`) or its flat
    /// environment form (`DOCREG_RPC_PORT` arrives as `rpc_port`).
    fn from_config(config: &Config, config_path: Option<PathBuf>) -> Result<Self> {
        let defaults = Self::default();

        let storage_backend =
            match get_string_value(config, &["storage.backend", "storage_backend"]) {
                Some(value) => StorageBackendKind::parse(&value)?,
                None => defaults.storage_backend,
            };

        Ok(Self {
            config_path,
            rpc_host: get_string_value(config, &["rpc.host", "rpc_host"])
                .unwrap_or(defaults.rpc_host),
            rpc_port: get_parsed_value(config, &["rpc.port", "rpc_port"])?
                .unwrap_or(defaults.rpc_port),
            storage_backend,
            data_dir: get_string_value(
                config,
                &["storage.data_dir", "storage_data_dir", "data_dir"],
            )
            .unwrap_or(defaults.data_dir),
            max_clock_skew_secs: get_parsed_value(
                config,
                &["auth.max_clock_skew_secs", "auth_max_clock_skew_secs"],
            )?
            .unwrap_or(defaults.max_clock_skew_secs),
            event_capacity: get_parsed_value(config, &["events.capacity", "events_capacity"])?
                .unwrap_or(defaults.event_capacity),
            log_level: get_string_value(config, &["log.level", "log_level"])
                .unwrap_or(defaults.log_level),
            log_format: get_string_value(config, &["log.format", "log_format"])
                .unwrap_or(defaults.log_format),
        })
    }

    fn validate(&self) -> Result<()> {
        if self.rpc_host.trim().is_empty() {
            anyhow::bail!("rpc.host must not be empty");
        }
        if self.rpc_port == 0 {
            anyhow::bail!("rpc.port must be greater than zero");
        }
        if self.storage_backend == StorageBackendKind::Sled && self.data_dir.trim().is_empty() {
            anyhow::bail!("storage.data_dir must not be empty for the sled backend");
        }
        if self.event_capacity == 0 {
            anyhow::bail!("events.capacity must be greater than zero");
        }
        if self.log_format != "pretty" && self.log_format != "json" {
            anyhow::bail!(
                "log.format must be 'pretty' or 'json', got '{}'",
                self.log_format
            );
        }
        Ok(())
    }

    fn rpc_addr(&self) -> String {
        format!("{}:{}", self.rpc_host, self.rpc_port)
    }

    fn db_path(&self) -> PathBuf {
        Path::new(&self.data_dir).join("registry")
    }
}

fn get_string_value(config: &Config, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| {
        config
            .get_string(key)
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    })
}

fn get_parsed_value<T>(config: &Config, keys: &[&str]) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: fmt::Display,
{
    for key in keys {
        if let Some(raw) = get_string_value(config, &[key]) {
            let parsed = raw
                .parse::<T>()
                .map_err(|err| anyhow::anyhow!("invalid value '{raw}' for {key}: {err}"))?;
            return Ok(Some(parsed));
        }
    }
    Ok(None)
}

fn load_config_with_overrides(matches: &clap::ArgMatches) -> Result<AppConfig> {
    let config_path = matches
        .get_one::<String>("config")
        .map(|value| value.as_str());
    let mut config = AppConfig::load(config_path)?;
    apply_overrides(matches, &mut config);
    config.validate()?;
    Ok(config)
}

fn apply_overrides(matches: &clap::ArgMatches, config: &mut AppConfig) {
    if let Some(data_dir) = matches.get_one::<String>("data-dir") {
        config.data_dir = data_dir.clone();
    }

    if let Some(backend) = matches.get_one::<StorageBackendKind>("storage-backend") {
        config.storage_backend = *backend;
    }

    if let Some(log_level) = matches.get_one::<String>("log-level") {
        config.log_level = log_level.clone();
    }

    if let Some(log_format) = matches.get_one::<String>("log-format") {
        config.log_format = log_format.clone();
    }

    if let Some(rpc_host) = matches.get_one::<String>("rpc-host") {
        config.rpc_host = rpc_host.clone();
    }

    if let Some(rpc_port) = matches.get_one::<u16>("rpc-port") {
        config.rpc_port = *rpc_port;
    }

    if matches.get_flag("dev") {
        config.storage_backend = StorageBackendKind::Memory;
        config.log_level = "debug".to_string();
        config.log_format = "pretty".to_string();
    }
}

fn build_cli() -> Command {
    Command::new("docreg-node")
        .version(DOCREG_VERSION)
        .about("Document Registry node")
        .disable_version_flag(true)
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .global(true),
        )
        .arg(
            Arg::new("data-dir")
                .short('d')
                .long("data-dir")
                .value_name("DIR")
                .help("Data directory")
                .global(true),
        )
        .arg(
            Arg::new("storage-backend")
                .long("storage-backend")
                .value_name("BACKEND")
                .value_parser(value_parser!(StorageBackendKind))
                .help("Registry storage backend (memory, sled)")
                .global(true),
        )
        .arg(
            Arg::new("dev")
                .long("dev")
                .action(ArgAction::SetTrue)
                .help("Run with an in-memory registry and debug logging")
                .global(true),
        )
        .arg(
            Arg::new("version_flag")
                .short('V')
                .long("version")
                .action(ArgAction::SetTrue)
                .help("Print detailed version information and exit")
                .global(true),
        )
        .arg(
            Arg::new("check")
                .long("check")
                .action(ArgAction::SetTrue)
                .help("Run configuration and environment self-checks, then exit")
                .global(true),
        )
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .value_name("LEVEL")
                .value_parser(["trace", "debug", "info", "warn", "error"])
                .help("Override the log level")
                .global(true),
        )
        .arg(
            Arg::new("log-format")
                .long("log-format")
                .value_name("FORMAT")
                .value_parser(["pretty", "json"])
                .help("Select log output format")
                .global(true),
        )
        .arg(
            Arg::new("rpc-host")
                .long("rpc-host")
                .value_name("HOST")
                .help("Override RPC bind host")
                .global(true),
        )
        .arg(
            Arg::new("rpc-port")
                .long("rpc-port")
                .value_name("PORT")
                .value_parser(value_parser!(u16))
                .help("Override RPC port")
                .global(true),
        )
        .subcommand(Command::new("start").about("Start the registry node (default)"))
        .subcommand(
            Command::new("status")
                .about("Check the /health endpoint of a running node")
                .arg(
                    Arg::new("health-path")
                        .long("health-path")
                        .value_name("PATH")
                        .default_value("/health")
                        .help("Health endpoint path to query"),
                ),
        )
}

async fn check_status(config: &AppConfig, health_path: &str) -> Result<()> {
    let mut path = health_path.to_string();
    if !path.starts_with('/') {
        path = format!("/{path}");
    }
    let url = format!("http://{}{}", config.rpc_addr(), path);
    let response = reqwest::Client::new().get(&url).send().await?;
    let status = response.status();
    let body = response.text().await?;
    println!("GET {url} -> {status}");
    println!("{body}");
    if status.is_success() {
        Ok(())
    } else {
        anyhow::bail!("Health check failed with status {status}")
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = build_cli().get_matches();

    if let Some(status_matches) = matches.subcommand_matches("status") {
        let config = load_config_with_overrides(status_matches)?;
        let health_path = status_matches
            .get_one::<String>("health-path")
            .map(|value| value.as_str())
            .unwrap_or("/health");
        return check_status(&config, health_path).await;
    }

    let config = load_config_with_overrides(&matches)?;

    if matches.get_flag("version_flag") {
        print_version_info(&config);
        return Ok(());
    }

    if matches.get_flag("check") {
        return run_self_check(&config);
    }

    init_logging(&config)?;
    info!(
        version = DOCREG_VERSION,
        commit = git_commit_hash(),
        backend = %config.storage_backend,
        "starting document registry node"
    );
    if let Some(path) = &config.config_path {
        info!("Loaded configuration from {}", path.display());
    }

    let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());
    let registry = Arc::new(open_registry(&config, clock.clone())?);
    info!("Registry holds {} document(s)", registry.count()?);

    let audit_task = tokio::spawn(audit_events(registry.subscribe()));

    let state =
        AppState::new(registry.clone(), clock).with_max_clock_skew(config.max_clock_skew_secs);
    let rpc_addr = config.rpc_addr();
    let mut rpc_handle = tokio::spawn(async move {
        if let Err(err) = start_server(state, &rpc_addr).await {
            error!("RPC server failed: {err:#}");
        }
    });

    info!("RPC API available at: http://{}", config.rpc_addr());

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("failed to listen for shutdown signal")?;
            info!("Shutting down document registry node");
        }
        _ = &mut rpc_handle => {
            warn!("RPC server stopped; shutting down");
        }
    }

    rpc_handle.abort();
    audit_task.abort();
    registry.flush()?;

    info!("Document registry node shutdown complete");
    Ok(())
}

fn open_registry(config: &AppConfig, clock: Arc<dyn Clock>) -> Result<DocumentRegistry> {
    let options = RegistryOptions {
        event_capacity: config.event_capacity,
        ..RegistryOptions::default()
    };

    let registry = match config.storage_backend {
        StorageBackendKind::Memory => {
            warn!("Using in-memory storage; registrations are lost on shutdown");
            DocumentRegistry::with_options(MemoryBackend::new(), clock, options)
        }
        StorageBackendKind::Sled => {
            fs::create_dir_all(&config.data_dir)
                .with_context(|| format!("failed to create data directory {}", config.data_dir))?;
            let path = config.db_path();
            let backend = SledBackend::open(&path)
                .with_context(|| format!("failed to open registry database {}", path.display()))?;
            DocumentRegistry::with_options(backend, clock, options)
        }
    };

    Ok(registry)
}

/// Log every committed registry event until the channel closes.
async fn audit_events(mut events: broadcast::Receiver<RegistryEvent>) {
    loop {
        match events.recv().await {
            Ok(event) => {
                let payload = serde_json::to_string(&event).unwrap_or_default();
                info!(target: "docreg::audit", fingerprint = %event.fingerprint(), "{payload}");
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(target: "docreg::audit", "audit log lagged; {skipped} event(s) not logged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

fn init_logging(config: &AppConfig) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    if config.log_format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().pretty())
            .try_init()?;
    }

    Ok(())
}

fn print_version_info(config: &AppConfig) {
    println!(
        "docreg-node {} (commit {}) [{} storage]",
        DOCREG_VERSION,
        git_commit_hash(),
        config.storage_backend
    );
}

fn run_self_check(config: &AppConfig) -> Result<()> {
    println!("Running document registry self-check...");
    println!("{}", serde_json::to_string_pretty(config)?);
    let mut issues = Vec::new();

    if let Err(err) = ensure_port_available(&config.rpc_host, config.rpc_port) {
        issues.push(err);
    }

    if config.storage_backend == StorageBackendKind::Sled {
        if let Err(err) = ensure_storage_directory(&config.data_dir) {
            issues.push(err);
        }
    }

    if issues.is_empty() {
        println!("OK");
        Ok(())
    } else {
        for issue in &issues {
            eprintln!("- {issue}");
        }
        anyhow::bail!("self-check failed")
    }
}

fn ensure_port_available(host: &str, port: u16) -> Result<(), String> {
    let addr = format!("{host}:{port}");
    TcpListener::bind(&addr)
        .map(drop)
        .map_err(|err| format!("RPC port {addr} is not available for binding: {err}"))
}

fn ensure_storage_directory(path: &str) -> Result<(), String> {
    let dir = Path::new(path);
    if !dir.exists() {
        return Err(format!(
            "Storage directory {} does not exist; it is created on first start",
            dir.display()
        ));
    }
    if !dir.is_dir() {
        return Err(format!("Storage path {} is not a directory", dir.display()));
    }

    let marker = dir.join(".docreg_write_test");
    let written = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&marker)
        .and_then(|mut file| file.write_all(b"ok"));
    let _ = fs::remove_file(&marker);
    written.map_err(|err| format!("Unable to write into {}: {}", dir.display(), err))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture_config() -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("..")
            .join("config")
            .join("docreg.toml")
    }

    fn config_from_toml(contents: &str) -> Result<AppConfig> {
        let config = Config::builder()
            .add_source(ConfigFile::from_str(contents, config::FileFormat::Toml))
            .build()?;
        AppConfig::from_config(&config, None)
    }

    #[test]
    fn shipped_config_loads_defaults() {
        let path = fixture_config();
        let config = AppConfig::load(Some(path.to_str().unwrap())).unwrap();

        assert_eq!(config.rpc_host, "127.0.0.1");
        assert_eq!(config.rpc_port, 8080);
        assert_eq!(config.storage_backend, StorageBackendKind::Sled);
        assert_eq!(config.max_clock_skew_secs, 300);
        assert_eq!(config.event_capacity, 1024);
        assert_eq!(config.db_path(), Path::new("./data").join("registry"));
        config.validate().unwrap();
    }

    #[test]
    fn missing_explicit_config_file_is_an_error() {
        let err = AppConfig::load(Some("/definitely/not/here.toml")).unwrap_err();
        assert!(err.to_string().contains("not found"), "unexpected error: {err}");
    }

    #[test]
    fn toml_values_override_defaults() {
        let config = config_from_toml(
            r#"
            [rpc]
            port = 9090
            [storage]
            backend = "memory"
            [auth]
            max_clock_skew_secs = 30
            "#,
        )
        .unwrap();

        assert_eq!(config.rpc_port, 9090);
        assert_eq!(config.storage_backend, StorageBackendKind::Memory);
        assert_eq!(config.max_clock_skew_secs, 30);
        assert_eq!(config.rpc_host, DEFAULT_RPC_HOST);
    }

    #[test]
    fn unknown_backend_is_rejected() {
        let err = config_from_toml("[storage]\nbackend = \"postgres\"\n").unwrap_err();
        assert!(err.to_string().contains("unknown storage backend"));
    }

    #[test]
    fn validate_rejects_zero_port_and_capacity() {
        let config = AppConfig {
            rpc_port: 0,
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());

        let config = AppConfig {
            event_capacity: 0,
            ..AppConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("events.capacity"));
    }

    #[test]
    fn cli_overrides_take_precedence() {
        let matches = build_cli()
            .try_get_matches_from([
                "docreg-node",
                "--rpc-port",
                "7000",
                "--storage-backend",
                "memory",
                "--data-dir",
                "/tmp/registry-data",
            ])
            .unwrap();
        let mut config = AppConfig::default();
        apply_overrides(&matches, &mut config);

        assert_eq!(config.rpc_port, 7000);
        assert_eq!(config.storage_backend, StorageBackendKind::Memory);
        assert_eq!(config.data_dir, "/tmp/registry-data");
    }

    #[test]
    fn sled_registry_opens_under_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig {
            data_dir: dir.path().join("nested").to_string_lossy().into_owned(),
            ..AppConfig::default()
        };
        let registry = open_registry(&config, Arc::new(SystemClock::new())).unwrap();

        assert_eq!(registry.count().unwrap(), 0);
        assert!(config.db_path().exists());
        assert!(ensure_storage_directory(&config.data_dir).is_ok());
    }
}
