//! Service configuration for jobtrack-scan
//!
//! Merges command-line values over `JOBTRACK_*` environment variables over
//! the TOML file over compiled defaults.

use jobtrack_common::config::{CompiledDefaults, RootFolderResolver, TomlConfig};
use std::path::PathBuf;
use std::time::Duration;

use crate::services::{FetchWindow, ScanSettings};

/// Values given on the command line; `None` defers to lower tiers
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub root_folder: Option<PathBuf>,
    pub bind_address: Option<String>,
    pub log_level: Option<String>,
    pub gmail_token_file: Option<PathBuf>,
}

/// Default page for list endpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaginationDefaults {
    pub limit: i64,
    pub offset: i64,
}

impl Default for PaginationDefaults {
    fn default() -> Self {
        Self { limit: 50, offset: 0 }
    }
}

/// Fully resolved service configuration
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub root_folder: PathBuf,
    pub bind_address: String,
    pub log_level: String,
    pub gmail_token_file: Option<PathBuf>,
    pub gmail_delegated_user: Option<String>,
    pub scan: ScanSettings,
    pub fetch_workers: usize,
    /// Progress stream is cancelled after this long without an event
    pub progress_idle_timeout: Duration,
    pub pagination: PaginationDefaults,
}

impl ServiceConfig {
    /// Resolve from CLI values and the config file as read from disk
    pub fn resolve(cli: &CliOverrides, file: &TomlConfig) -> Self {
        let defaults = CompiledDefaults::for_current_platform();
        let root_folder = RootFolderResolver::new().resolve(cli.root_folder.as_deref(), file);

        let mut merged = file.clone();
        merged.apply_env_overrides();

        let bind_address = cli
            .bind_address
            .clone()
            .or(merged.bind_address)
            .unwrap_or(defaults.bind_address);
        let log_level = cli.log_level.clone().unwrap_or(merged.logging.level);
        let gmail_token_file = cli.gmail_token_file.clone().or(merged.gmail.token_file);

        let window = FetchWindow::new(
            merged.gmail.query_window_days,
            merged.gmail.max_messages as usize,
            merged.gmail.page_size as usize,
        );

        Self {
            root_folder,
            bind_address,
            log_level,
            gmail_token_file,
            gmail_delegated_user: merged.gmail.delegated_user,
            scan: ScanSettings {
                window,
                cooldown: Duration::from_secs(merged.scan.cooldown_seconds),
            },
            fetch_workers: merged.scan.fetch_workers.max(1),
            progress_idle_timeout: Duration::from_secs(merged.scan.progress_idle_timeout_seconds.max(1)),
            pagination: PaginationDefaults {
                limit: merged.pagination.limit_default.max(0),
                offset: merged.pagination.offset_default.max(0),
            },
        }
    }
}
