//! Configuration loading and root folder resolution
//!
//! Every setting resolves in the same priority order:
//! 1. Command-line argument (applied by the binary)
//! 2. `JOBTRACK_*` environment variable
//! 3. TOML config file (`~/.config/jobtrack/config.toml`, then `/etc/jobtrack/config.toml`)
//! 4. Compiled default
//!
//! A missing or unreadable config file is never fatal: a warning is logged and
//! the compiled defaults are used.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, warn};

/// Database file name inside the root folder
pub const DATABASE_FILE_NAME: &str = "jobtrack.db";

/// Environment variable naming the root folder
pub const ROOT_FOLDER_ENV: &str = "JOBTRACK_ROOT_FOLDER";

/// Compiled fallback values used when nothing else is configured
#[derive(Debug, Clone)]
pub struct CompiledDefaults {
    pub root_folder: PathBuf,
    pub bind_address: String,
    pub log_level: String,
}

impl CompiledDefaults {
    /// Defaults for the platform this binary was built for
    pub fn for_current_platform() -> Self {
        let root_folder = if cfg!(target_os = "linux") {
            dirs::data_local_dir()
                .map(|d| d.join("jobtrack"))
                .unwrap_or_else(|| PathBuf::from("/var/lib/jobtrack"))
        } else if cfg!(target_os = "macos") {
            dirs::data_dir()
                .map(|d| d.join("jobtrack"))
                .unwrap_or_else(|| PathBuf::from("/Library/Application Support/jobtrack"))
        } else if cfg!(target_os = "windows") {
            dirs::data_local_dir()
                .map(|d| d.join("jobtrack"))
                .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\jobtrack"))
        } else {
            PathBuf::from("./jobtrack_data")
        };

        Self {
            root_folder,
            bind_address: "127.0.0.1:5780".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Top-level TOML config file
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TomlConfig {
    pub root_folder: Option<PathBuf>,
    pub bind_address: Option<String>,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub gmail: GmailConfig,
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub pagination: PaginationConfig,
}

/// `[logging]` section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// `[gmail]` section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GmailConfig {
    /// OAuth authorized-user token file
    pub token_file: Option<PathBuf>,
    /// Mailbox to read, `me` when unset
    pub delegated_user: Option<String>,
    pub query_window_days: u32,
    pub max_messages: u32,
    pub page_size: u32,
}

impl Default for GmailConfig {
    fn default() -> Self {
        Self {
            token_file: None,
            delegated_user: None,
            query_window_days: 30,
            max_messages: 200,
            page_size: 50,
        }
    }
}

/// `[scan]` section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScanConfig {
    pub cooldown_seconds: u64,
    pub fetch_workers: usize,
    pub progress_idle_timeout_seconds: u64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            cooldown_seconds: 60,
            fetch_workers: 4,
            progress_idle_timeout_seconds: 60,
        }
    }
}

/// `[pagination]` section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PaginationConfig {
    pub limit_default: i64,
    pub offset_default: i64,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            limit_default: 50,
            offset_default: 0,
        }
    }
}

impl TomlConfig {
    /// Parse a config file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Invalid config file {}: {}", path.display(), e)))
    }

    /// Load the first config file found, or defaults when none is usable
    pub fn load_or_default() -> Self {
        let Some(path) = config_file_path() else {
            warn!("No config file found, using compiled defaults");
            return Self::default();
        };

        match Self::from_file(&path) {
            Ok(config) => {
                debug!("Loaded config from {}", path.display());
                config
            }
            Err(e) => {
                warn!("{}, using compiled defaults", e);
                Self::default()
            }
        }
    }

    /// Overlay `JOBTRACK_*` environment variables onto the file values
    ///
    /// Unparseable values are ignored with a warning.
    pub fn apply_env_overrides(&mut self) {
        if let Some(v) = env_string(ROOT_FOLDER_ENV) {
            self.root_folder = Some(PathBuf::from(v));
        }
        if let Some(v) = env_string("JOBTRACK_BIND_ADDRESS") {
            self.bind_address = Some(v);
        }
        if let Some(v) = env_string("JOBTRACK_LOG_LEVEL") {
            self.logging.level = v;
        }
        if let Some(v) = env_string("JOBTRACK_GMAIL_TOKEN_FILE") {
            self.gmail.token_file = Some(PathBuf::from(v));
        }
        if let Some(v) = env_string("JOBTRACK_GMAIL_DELEGATED_USER") {
            self.gmail.delegated_user = Some(v);
        }
        override_parsed("JOBTRACK_GMAIL_QUERY_WINDOW_DAYS", &mut self.gmail.query_window_days);
        override_parsed("JOBTRACK_GMAIL_MAX_MESSAGES", &mut self.gmail.max_messages);
        override_parsed("JOBTRACK_GMAIL_PAGE_SIZE", &mut self.gmail.page_size);
        override_parsed("JOBTRACK_SCAN_COOLDOWN_SECONDS", &mut self.scan.cooldown_seconds);
        override_parsed("JOBTRACK_SCAN_FETCH_WORKERS", &mut self.scan.fetch_workers);
        override_parsed(
            "JOBTRACK_SCAN_PROGRESS_IDLE_TIMEOUT_SECONDS",
            &mut self.scan.progress_idle_timeout_seconds,
        );
        override_parsed("JOBTRACK_PAGINATION_LIMIT_DEFAULT", &mut self.pagination.limit_default);
        override_parsed("JOBTRACK_PAGINATION_OFFSET_DEFAULT", &mut self.pagination.offset_default);
    }
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn override_parsed<T: FromStr>(name: &str, target: &mut T) {
    if let Some(raw) = env_string(name) {
        match raw.trim().parse::<T>() {
            Ok(value) => *target = value,
            Err(_) => warn!("Ignoring {}={:?}: not a valid value", name, raw),
        }
    }
}

/// Locate the config file: user config first, then system-wide
pub fn config_file_path() -> Option<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join("jobtrack").join("config.toml"));
    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
    }

    let system_config = PathBuf::from("/etc/jobtrack/config.toml");
    if cfg!(unix) && system_config.exists() {
        return Some(system_config);
    }

    None
}

/// Resolves the root folder holding the database
pub struct RootFolderResolver {
    defaults: CompiledDefaults,
}

impl RootFolderResolver {
    pub fn new() -> Self {
        Self {
            defaults: CompiledDefaults::for_current_platform(),
        }
    }

    /// Resolve the root folder
    ///
    /// `toml` is the file config before environment overrides, so the
    /// environment variable is consulted here directly.
    pub fn resolve(&self, cli_arg: Option<&Path>, toml: &TomlConfig) -> PathBuf {
        if let Some(path) = cli_arg {
            return path.to_path_buf();
        }

        if let Some(path) = env_string(ROOT_FOLDER_ENV) {
            return PathBuf::from(path);
        }

        if let Some(path) = &toml.root_folder {
            return path.clone();
        }

        self.defaults.root_folder.clone()
    }
}

impl Default for RootFolderResolver {
    fn default() -> Self {
        Self::new()
    }
}

/// Creates the root folder and locates the database within it
pub struct RootFolderInitializer {
    root_folder: PathBuf,
}

impl RootFolderInitializer {
    pub fn new(root_folder: PathBuf) -> Self {
        Self { root_folder }
    }

    /// Create the root folder (and parents) if missing
    pub fn ensure_directory_exists(&self) -> Result<()> {
        if !self.root_folder.exists() {
            std::fs::create_dir_all(&self.root_folder)?;
            debug!("Created root folder {}", self.root_folder.display());
        }
        Ok(())
    }

    pub fn database_path(&self) -> PathBuf {
        self.root_folder.join(DATABASE_FILE_NAME)
    }

    pub fn database_exists(&self) -> bool {
        self.database_path().exists()
    }
}
