//! Integration tests for configuration loading

use scan_intake::infra::Config;
use scan_intake::services::ClassifierSettings;
use std::io::Write;
use tempfile::NamedTempFile;

fn write_config(content: &str) -> NamedTempFile {
    let mut temp_file = NamedTempFile::new().unwrap();
    temp_file.write_all(content.as_bytes()).unwrap();
    temp_file.flush().unwrap();
    temp_file
}

#[test]
fn test_load_config_from_file() {
    let temp_file = write_config(
        r#"
[scanner]
char_gap_ms = 30
new_scan_gap_ms = 200
end_timeout_ms = 120
min_length = 6

[form]
required_fields = ["barcode", "name"]
default_qty = 0

[store]
path = "/tmp/test-inventory.json"

[camera]
enabled = true
command = "zbarcam --raw /dev/video2"
poll_interval_ms = 33

[sync]
enabled = false
queue_size = 8

[metrics]
interval_secs = 15
"#,
    );

    let config = Config::from_file(temp_file.path()).unwrap();

    assert_eq!(config.char_gap_ms(), 30);
    assert_eq!(config.new_scan_gap_ms(), 200);
    assert_eq!(config.end_timeout_ms(), 120);
    assert_eq!(config.min_length(), 6);
    assert_eq!(config.required_fields(), &["barcode".to_string(), "name".to_string()]);
    assert_eq!(config.default_qty(), 0);
    assert_eq!(config.store_path(), "/tmp/test-inventory.json");
    assert!(config.camera_enabled());
    assert_eq!(config.camera_command(), "zbarcam --raw /dev/video2");
    assert_eq!(config.camera_poll_interval_ms(), 33);
    assert!(!config.sync_enabled());
    assert_eq!(config.sync_queue_size(), 8);
    assert_eq!(config.metrics_interval_secs(), 15);
    assert_eq!(config.config_file(), temp_file.path().display().to_string());

    let settings = ClassifierSettings::from_config(&config);
    assert_eq!(settings.char_gap_ms, 30);
    assert_eq!(settings.min_length, 6);
}

#[test]
fn test_missing_sections_use_defaults() {
    let temp_file = write_config("[scanner]\nmin_length = 8\n");

    let config = Config::from_file(temp_file.path()).unwrap();

    assert_eq!(config.min_length(), 8);
    assert_eq!(config.char_gap_ms(), 45);
    assert_eq!(config.new_scan_gap_ms(), 160);
    assert_eq!(config.end_timeout_ms(), 90);
    assert_eq!(config.required_fields().len(), 5);
    assert_eq!(config.default_qty(), 1);
    assert!(!config.camera_enabled());
    assert!(config.sync_enabled());
}

#[test]
fn test_overlapping_gaps_are_rejected() {
    let temp_file = write_config("[scanner]\nchar_gap_ms = 200\nnew_scan_gap_ms = 100\n");

    let err = Config::from_file(temp_file.path()).unwrap_err();

    assert!(format!("{:#}", err).contains("char_gap_ms"));
}

#[test]
fn test_load_from_path_fallback() {
    let config = Config::load_from_path("/nonexistent/config.toml");
    assert_eq!(config.char_gap_ms(), 45);
    assert_eq!(config.store_path(), "inventory.json");
    assert_eq!(config.config_file(), "default");
}

#[test]
fn test_dev_config_is_valid() {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/config/dev.toml");
    let config = Config::from_file(path).unwrap();
    assert_eq!(config.min_length(), 4);
    assert_eq!(config.store_path(), "data/inventory.json");
}
