use super::filter::FilterSettings;
use super::handle::HandleSettings;
use crate::error::Result;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

const APP_DIR: &str = "divert";
const FILE_NAME: &str = "config.toml";

/// Persisted settings, stored as TOML.
///
/// ```toml
/// [handle]
/// filter = "udp"
/// layer = "network"
/// sniff = true
/// excluded_ports = [1420]
///
/// [filter]
/// remotes = ["10.0.0.0/8"]
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Settings {
    #[serde(default)]
    pub handle: HandleSettings,
    #[serde(default)]
    pub filter: FilterSettings,
}

impl Settings {
    /// Location of the settings file when none is given: the user's config
    /// directory, or a `configs` directory next to the executable when the
    /// platform has none.
    pub fn default_path() -> Result<PathBuf> {
        let dir = match dirs::config_dir() {
            Some(dir) => dir.join(APP_DIR),
            None => {
                let exe = env::current_exe()?;
                exe.parent()
                    .map(|p| p.to_path_buf())
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join("configs")
            }
        };
        Ok(dir.join(FILE_NAME))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let settings: Settings = toml::from_str(&contents)?;
        info!("Loaded configuration from {}", path.display());
        Ok(settings)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let toml_string = toml::to_string_pretty(self)?;
        let mut file = fs::File::create(path)?;
        file.write_all(toml_string.as_bytes())?;

        info!("Saved configuration to {}", path.display());
        Ok(())
    }

    /// Loads `path` when given. Without a path, the default location is read
    /// if it exists and defaults are used otherwise.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load(path);
        }

        let default = Self::default_path()?;
        if default.exists() {
            Self::load(&default)
        } else {
            debug!("No configuration at {}, using defaults", default.display());
            Ok(Settings::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::types::Layer;

    fn scratch_path(name: &str) -> PathBuf {
        env::temp_dir()
            .join(format!("divert-settings-{}-{}", std::process::id(), name))
            .join(FILE_NAME)
    }

    #[test]
    fn test_save_and_load() {
        let path = scratch_path("save");
        let settings = Settings {
            handle: HandleSettings {
                filter: "tcp.DstPort == 443".into(),
                layer: Layer::Flow,
                sniff: true,
                recv_only: true,
                excluded_ports: vec![1420],
                ..Default::default()
            },
            filter: FilterSettings {
                remotes: vec!["10.0.0.0/8".into()],
                ..Default::default()
            },
        };

        settings.save(&path).unwrap();
        let loaded = Settings::load(&path).unwrap();
        assert_eq!(loaded, settings);

        let _ = fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_missing_sections_use_defaults() {
        let settings: Settings = toml::from_str("[handle]\nsniff = true\n").unwrap();
        assert_eq!(settings.handle.filter, "true");
        assert_eq!(settings.handle.layer, Layer::Network);
        assert!(settings.handle.sniff);
        assert!(settings.filter.is_empty());
    }

    #[test]
    fn test_unknown_layer_is_rejected() {
        let result: std::result::Result<Settings, _> =
            toml::from_str("[handle]\nlayer = \"datalink\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_load_missing_file_fails() {
        let path = scratch_path("missing");
        assert!(Settings::load_or_default(Some(&path)).is_err());
    }
}
