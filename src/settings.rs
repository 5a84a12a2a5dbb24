use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::host::UploadPolicy;
use crate::pdf::{
    ExternalLinkTarget, MAX_RELOAD_COUNT_ON_ERROR, SessionConfig, WorkerConfig,
    clamp_initial_scale,
};

pub const CURRENT_VERSION: u32 = 1;
const SETTINGS_FILENAME: &str = "config.yaml";
const APP_NAME: &str = "pdfpane";

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("could not determine config directory")]
    NoConfigDir,

    #[error("failed to read {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse {path:?}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("failed to write {path:?}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_version")]
    pub version: u32,

    /// Trailing-edge window for resize renders
    #[serde(default = "default_resize_throttle_ms")]
    pub resize_throttle_ms: u64,

    /// Automatic reloads after runtime faults before giving up
    #[serde(default = "default_max_reload_attempts")]
    pub max_reload_attempts: u32,

    #[serde(default = "default_initial_scale")]
    pub initial_scale: f32,

    #[serde(default)]
    pub external_link_target: ExternalLinkTarget,

    #[serde(default)]
    pub upload: UploadPolicy,

    #[serde(default)]
    pub worker: WorkerConfig,
}

fn default_version() -> u32 {
    CURRENT_VERSION
}

fn default_resize_throttle_ms() -> u64 {
    100
}

fn default_max_reload_attempts() -> u32 {
    MAX_RELOAD_COUNT_ON_ERROR
}

fn default_initial_scale() -> f32 {
    1.0
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: CURRENT_VERSION,
            resize_throttle_ms: default_resize_throttle_ms(),
            max_reload_attempts: default_max_reload_attempts(),
            initial_scale: default_initial_scale(),
            external_link_target: ExternalLinkTarget::default(),
            upload: UploadPolicy::default(),
            worker: WorkerConfig::default(),
        }
    }
}

impl Settings {
    /// Session parameters derived from these settings
    #[must_use]
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            initial_scale: clamp_initial_scale(self.initial_scale),
            max_reload_attempts: self.max_reload_attempts,
            resize_throttle: Duration::from_millis(self.resize_throttle_ms),
            link_target: self.external_link_target,
            upload: self.upload.clone(),
            worker: self.worker.clone(),
        }
    }
}

#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|config| config.join(APP_NAME).join(SETTINGS_FILENAME))
}

/// Load settings from the default location, creating the file with defaults
/// when it does not exist yet
#[must_use]
pub fn load_settings() -> Settings {
    let Some(path) = default_config_path() else {
        warn!("Could not determine config directory, using default settings");
        return Settings::default();
    };
    load_or_create(&path)
}

/// Load settings from `path`. A missing file is created with defaults; an
/// unreadable one is logged and defaults are used.
#[must_use]
pub fn load_or_create(path: &Path) -> Settings {
    if !path.exists() {
        info!("Settings file not found, creating with defaults at {path:?}");
        let settings = Settings::default();
        if let Err(e) = save_settings_to_file(&settings, path) {
            error!("{e}");
        }
        return settings;
    }

    match load_settings_from_path(path) {
        Ok(settings) => settings,
        Err(e) => {
            error!("{e}");
            Settings::default()
        }
    }
}

pub fn load_settings_from_path(path: &Path) -> Result<Settings, SettingsError> {
    let content = fs::read_to_string(path).map_err(|source| SettingsError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let mut settings =
        serde_yaml::from_str::<Settings>(&content).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
    debug!("Loaded settings from {path:?}");

    if settings.version < CURRENT_VERSION {
        migrate_settings(&mut settings);
        if let Err(e) = save_settings_to_file(&settings, path) {
            warn!("Could not persist migrated settings: {e}");
        }
    }
    Ok(settings)
}

fn migrate_settings(settings: &mut Settings) {
    info!(
        "Migrating settings from v{} to v{}",
        settings.version, CURRENT_VERSION
    );
    settings.version = CURRENT_VERSION;
}

pub fn save_settings_to_file(settings: &Settings, path: &Path) -> Result<(), SettingsError> {
    let write_error = |source| SettingsError::Write {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(write_error)?;
        }
    }

    fs::write(path, generate_settings_yaml(settings)).map_err(write_error)?;
    debug!("Saved settings to {path:?}");
    Ok(())
}

fn generate_settings_yaml(settings: &Settings) -> String {
    let mut content = String::new();

    content.push_str(&format!("version: {}\n", settings.version));
    content.push('\n');
    content.push_str("# Milliseconds between re-fits while the container is resized\n");
    content.push_str(&format!(
        "resize_throttle_ms: {}\n",
        settings.resize_throttle_ms
    ));
    content.push_str("# Automatic reloads after a display fault before the error screen\n");
    content.push_str(&format!(
        "max_reload_attempts: {}\n",
        settings.max_reload_attempts
    ));
    content.push_str(&format!("initial_scale: {}\n", settings.initial_scale));
    content.push_str("# Window for external links: none, self, blank, parent, top\n");
    let target = match settings.external_link_target {
        ExternalLinkTarget::None => "none",
        ExternalLinkTarget::SelfFrame => "self",
        ExternalLinkTarget::Blank => "blank",
        ExternalLinkTarget::Parent => "parent",
        ExternalLinkTarget::Top => "top",
    };
    content.push_str(&format!("external_link_target: {target}\n"));
    content.push('\n');

    content.push_str("upload:\n");
    if settings.upload.accept.is_empty() {
        content.push_str("  accept: []\n");
    } else {
        content.push_str("  accept:\n");
        for mime in &settings.upload.accept {
            content.push_str(&format!("    - {}\n", yaml_string(mime)));
        }
    }
    content.push_str(&format!("  max_size_kb: {}\n", settings.upload.max_size_kb));
    content.push('\n');

    content.push_str("worker:\n");
    content.push_str(&format!(
        "  thread_name: {}\n",
        yaml_string(&settings.worker.thread_name)
    ));
    if let Some(kb) = settings.worker.stack_size_kb {
        content.push_str(&format!("  stack_size_kb: {kb}\n"));
    }

    content
}

/// Quote a free-form value as a single-line YAML scalar
fn yaml_string(value: &str) -> String {
    match serde_yaml::to_string(value) {
        Ok(yaml) if !yaml.trim_end().contains('\n') => yaml.trim_end().to_string(),
        // Block scalars do not fit on one line
        Ok(_) => format!("{value:?}"),
        Err(e) => {
            warn!("Could not quote {value:?} for YAML: {e}");
            format!("{value:?}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_is_created_with_defaults() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("nested").join(SETTINGS_FILENAME);

        let settings = load_or_create(&path);
        assert_eq!(settings, Settings::default());
        assert!(path.exists());
        assert_eq!(
            load_settings_from_path(&path).expect("written file parses"),
            Settings::default()
        );
    }

    #[test]
    fn generated_yaml_round_trips_custom_values() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join(SETTINGS_FILENAME);
        let settings = Settings {
            resize_throttle_ms: 250,
            max_reload_attempts: 5,
            initial_scale: 1.5,
            external_link_target: ExternalLinkTarget::SelfFrame,
            upload: UploadPolicy {
                accept: vec!["application/pdf".into(), "*/*".into()],
                max_size_kb: 2048,
            },
            worker: WorkerConfig {
                thread_name: "viewer".into(),
                stack_size_kb: Some(4096),
            },
            ..Settings::default()
        };

        save_settings_to_file(&settings, &path).expect("save");
        assert_eq!(load_settings_from_path(&path).expect("load"), settings);
    }

    #[test]
    fn generated_yaml_keeps_quotes_and_backslashes() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join(SETTINGS_FILENAME);
        let settings = Settings {
            upload: UploadPolicy {
                accept: vec!["application/\"pdf\"".into(), "x\\y: z".into()],
                max_size_kb: 10,
            },
            worker: WorkerConfig {
                thread_name: "say \"hi\" \\ #1".into(),
                stack_size_kb: None,
            },
            ..Settings::default()
        };

        save_settings_to_file(&settings, &path).expect("save");
        assert_eq!(load_settings_from_path(&path).expect("load"), settings);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join(SETTINGS_FILENAME);
        fs::write(&path, "version: 1\nexternal_link_target: top\n").expect("write");

        let settings = load_settings_from_path(&path).expect("load");
        assert_eq!(settings.external_link_target, ExternalLinkTarget::Top);
        assert_eq!(settings.resize_throttle_ms, 100);
        assert_eq!(settings.max_reload_attempts, 2);
        assert_eq!(settings.upload, UploadPolicy::default());
    }

    #[test]
    fn outdated_version_is_migrated_and_saved() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join(SETTINGS_FILENAME);
        fs::write(&path, "version: 0\n").expect("write");

        let settings = load_settings_from_path(&path).expect("load");
        assert_eq!(settings.version, CURRENT_VERSION);
        let on_disk = fs::read_to_string(&path).expect("read back");
        assert!(on_disk.starts_with(&format!("version: {CURRENT_VERSION}\n")));
    }

    #[test]
    fn broken_yaml_falls_back_to_defaults() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join(SETTINGS_FILENAME);
        fs::write(&path, "resize_throttle_ms: [not a number\n").expect("write");

        assert!(matches!(
            load_settings_from_path(&path),
            Err(SettingsError::Parse { .. })
        ));
        assert_eq!(load_or_create(&path), Settings::default());
    }

    #[test]
    fn session_config_uses_settings() {
        let settings = Settings {
            resize_throttle_ms: 40,
            initial_scale: -3.0,
            ..Settings::default()
        };
        let config = settings.session_config();
        assert_eq!(config.resize_throttle, Duration::from_millis(40));
        assert_eq!(config.initial_scale, 1.0);
        assert_eq!(config.max_reload_attempts, 2);
        assert_eq!(config.worker.thread_name, "pdfpane-render");
    }
}
