use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use tempfile::TempDir;
use travai::session::ControllerSettings;

#[allow(dead_code)]
pub fn temp_config_file(contents: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("failed to create tempdir");
    let config_path = temp_dir.path().join("config.yaml");
    fs::write(&config_path, contents).expect("failed to write config file");
    (temp_dir, config_path)
}

/// Controller settings with a 1ms reveal tick so turns finish quickly
#[allow(dead_code)]
pub fn fast_settings() -> ControllerSettings {
    ControllerSettings {
        tick_interval: Duration::from_millis(1),
        ..ControllerSettings::default()
    }
}

/// The answer used across tests, with its trailing citation block
#[allow(dead_code)]
pub const GRAND_PALACE_ANSWER: &str =
    "It's in Bangkok.\n```json\n{\"sources\": [{\"page\": 12}]}\n```";
