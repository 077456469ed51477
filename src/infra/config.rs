//! Configuration loading from TOML files
//!
//! Config file is selected via:
//! 1. --config <path> command line argument
//! 2. CONFIG_FILE environment variable
//! 3. Default: config/dev.toml

use anyhow::Context;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct ScannerConfig {
    /// Characters closer together than this look like a scanner
    #[serde(default = "default_char_gap_ms")]
    pub char_gap_ms: u64,
    /// Silence longer than this starts a fresh scan
    #[serde(default = "default_new_scan_gap_ms")]
    pub new_scan_gap_ms: u64,
    /// Silence that completes a scan without terminator
    #[serde(default = "default_end_timeout_ms")]
    pub end_timeout_ms: u64,
    /// Shorter codes are discarded
    #[serde(default = "default_min_length")]
    pub min_length: usize,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            char_gap_ms: default_char_gap_ms(),
            new_scan_gap_ms: default_new_scan_gap_ms(),
            end_timeout_ms: default_end_timeout_ms(),
            min_length: default_min_length(),
        }
    }
}

fn default_char_gap_ms() -> u64 {
    45
}

fn default_new_scan_gap_ms() -> u64 {
    160
}

fn default_end_timeout_ms() -> u64 {
    90
}

fn default_min_length() -> usize {
    4
}

#[derive(Debug, Clone, Deserialize)]
pub struct FormConfig {
    /// Fields that must be filled before a record can be saved
    #[serde(default = "default_required_fields")]
    pub required_fields: Vec<String>,
    /// Quantity put back into the form on reset
    #[serde(default = "default_qty")]
    pub default_qty: i64,
}

impl Default for FormConfig {
    fn default() -> Self {
        Self { required_fields: default_required_fields(), default_qty: default_qty() }
    }
}

fn default_required_fields() -> Vec<String> {
    ["barcode", "name", "category", "price", "tags"].iter().map(|s| s.to_string()).collect()
}

fn default_qty() -> i64 {
    1
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// JSON snapshot of the inventory
    #[serde(default = "default_store_path")]
    pub path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { path: default_store_path() }
    }
}

fn default_store_path() -> String {
    "inventory.json".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct CameraConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Decoder command printing one code per line
    #[serde(default = "default_camera_command")]
    pub command: String,
    /// Delay between detection attempts
    #[serde(default = "default_camera_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            command: default_camera_command(),
            poll_interval_ms: default_camera_poll_interval_ms(),
        }
    }
}

fn default_camera_command() -> String {
    "zbarcam --raw --nodisplay".to_string()
}

fn default_camera_poll_interval_ms() -> u64 {
    16
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    /// Write store snapshots after saves and renames
    #[serde(default = "default_sync_enabled")]
    pub enabled: bool,
    #[serde(default = "default_sync_queue_size")]
    pub queue_size: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self { enabled: default_sync_enabled(), queue_size: default_sync_queue_size() }
    }
}

fn default_sync_enabled() -> bool {
    true
}

fn default_sync_queue_size() -> usize {
    64
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_interval")]
    pub interval_secs: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { interval_secs: default_metrics_interval() }
    }
}

fn default_metrics_interval() -> u64 {
    30
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub scanner: ScannerConfig,
    #[serde(default)]
    pub form: FormConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    char_gap_ms: u64,
    new_scan_gap_ms: u64,
    end_timeout_ms: u64,
    min_length: usize,
    required_fields: Vec<String>,
    default_qty: i64,
    store_path: String,
    camera_enabled: bool,
    camera_command: String,
    camera_poll_interval_ms: u64,
    sync_enabled: bool,
    sync_queue_size: usize,
    metrics_interval_secs: u64,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_toml(TomlConfig::default(), "default".to_string())
    }
}

impl Config {
    fn from_toml(toml_config: TomlConfig, config_file: String) -> Self {
        Self {
            char_gap_ms: toml_config.scanner.char_gap_ms,
            new_scan_gap_ms: toml_config.scanner.new_scan_gap_ms,
            end_timeout_ms: toml_config.scanner.end_timeout_ms,
            min_length: toml_config.scanner.min_length,
            required_fields: toml_config.form.required_fields,
            default_qty: toml_config.form.default_qty,
            store_path: toml_config.store.path,
            camera_enabled: toml_config.camera.enabled,
            camera_command: toml_config.camera.command,
            camera_poll_interval_ms: toml_config.camera.poll_interval_ms,
            sync_enabled: toml_config.sync.enabled,
            sync_queue_size: toml_config.sync.queue_size,
            metrics_interval_secs: toml_config.metrics.interval_secs,
            config_file,
        }
    }

    /// Config path when `--config` is not given: `CONFIG_FILE`, else `config/dev.toml`
    pub fn resolve_config_path() -> String {
        env::var("CONFIG_FILE").unwrap_or_else(|_| "config/dev.toml".to_string())
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        let config = Self::from_toml(toml_config, path.display().to_string());
        config.validate().with_context(|| format!("Invalid config file {}", path.display()))?;
        Ok(config)
    }

    /// Reject scanner thresholds the classifier cannot disambiguate
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.char_gap_ms >= self.new_scan_gap_ms {
            anyhow::bail!(
                "scanner.char_gap_ms ({}) must be less than scanner.new_scan_gap_ms ({})",
                self.char_gap_ms,
                self.new_scan_gap_ms
            );
        }
        if self.min_length == 0 {
            anyhow::bail!("scanner.min_length must be at least 1");
        }
        if self.sync_queue_size == 0 {
            anyhow::bail!("sync.queue_size must be at least 1");
        }
        Ok(())
    }

    /// Load configuration from an explicit path, falling back to defaults
    pub fn load_from_path(path: &str) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Warning: {:#}. Using defaults.", e);
                Self::default()
            }
        }
    }

    // Getters for all config fields
    pub fn char_gap_ms(&self) -> u64 {
        self.char_gap_ms
    }

    pub fn new_scan_gap_ms(&self) -> u64 {
        self.new_scan_gap_ms
    }

    pub fn end_timeout_ms(&self) -> u64 {
        self.end_timeout_ms
    }

    pub fn min_length(&self) -> usize {
        self.min_length
    }

    pub fn required_fields(&self) -> &[String] {
        &self.required_fields
    }

    pub fn default_qty(&self) -> i64 {
        self.default_qty
    }

    pub fn store_path(&self) -> &str {
        &self.store_path
    }

    pub fn camera_enabled(&self) -> bool {
        self.camera_enabled
    }

    pub fn camera_command(&self) -> &str {
        &self.camera_command
    }

    pub fn camera_poll_interval_ms(&self) -> u64 {
        self.camera_poll_interval_ms
    }

    pub fn sync_enabled(&self) -> bool {
        self.sync_enabled
    }

    pub fn sync_queue_size(&self) -> usize {
        self.sync_queue_size
    }

    pub fn metrics_interval_secs(&self) -> u64 {
        self.metrics_interval_secs
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }
}
