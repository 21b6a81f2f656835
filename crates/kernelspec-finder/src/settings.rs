//! Finder settings persistence.
//!
//! Settings are stored in a JSON file in the user's config directory:
//! - macOS: ~/Library/Application Support/kernelspec-finder/settings.json
//! - Linux: ~/.config/kernelspec-finder/settings.json
//! - Windows: C:\Users\<User>\AppData\Roaming\kernelspec-finder\settings.json

use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{FinderError, Result};

/// Settings controlling discovery and the trust gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinderSettings {
    /// Extra directories whose kernelspecs may trigger interpreter probing
    #[serde(default, deserialize_with = "deserialize_path_list")]
    pub trusted_kernel_paths: Vec<PathBuf>,

    /// Also scan environments the Python integration knows but the host has
    /// not resolved yet
    #[serde(default = "default_true")]
    pub include_global_environments: bool,

    /// Trust `share/jupyter/kernels` inside resolved environments
    #[serde(default = "default_true")]
    pub trust_environment_kernel_dirs: bool,
}

fn default_true() -> bool {
    true
}

impl Default for FinderSettings {
    fn default() -> Self {
        Self {
            trusted_kernel_paths: vec![],
            include_global_environments: true,
            trust_environment_kernel_dirs: true,
        }
    }
}

/// Deserialize a path list that accepts both:
/// - `"/a/kernels:/b/kernels"` (platform path-list string, like `JUPYTER_PATH`)
/// - `["/a/kernels", "/b/kernels"]` (JSON array)
fn deserialize_path_list<'de, D>(deserializer: D) -> std::result::Result<Vec<PathBuf>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de;

    struct PathListVisitor;

    impl<'de> de::Visitor<'de> for PathListVisitor {
        type Value = Vec<PathBuf>;

        fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
            formatter.write_str("a path-list string or array of paths")
        }

        fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<Vec<PathBuf>, E> {
            Ok(std::env::split_paths(v)
                .filter(|p| !p.as_os_str().is_empty())
                .collect())
        }

        fn visit_seq<A: de::SeqAccess<'de>>(
            self,
            mut seq: A,
        ) -> std::result::Result<Vec<PathBuf>, A::Error> {
            let mut items = Vec::new();
            while let Some(item) = seq.next_element::<String>()? {
                let trimmed = item.trim();
                if !trimmed.is_empty() {
                    items.push(PathBuf::from(trimmed));
                }
            }
            Ok(items)
        }
    }

    deserializer.deserialize_any(PathListVisitor)
}

/// Get the path to the settings file
pub fn settings_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("kernelspec-finder")
        .join("settings.json")
}

/// Load settings from disk, returning defaults if the file is missing or
/// unreadable
pub fn load_settings() -> FinderSettings {
    load_settings_or_default(&settings_path())
}

fn load_settings_or_default(path: &Path) -> FinderSettings {
    load_settings_from(path).unwrap_or_else(|e| {
        log::warn!("[kernelspec] Using default settings: {}", e);
        FinderSettings::default()
    })
}

/// Load settings from an explicit path. A missing file yields defaults.
pub fn load_settings_from(path: &Path) -> Result<FinderSettings> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(FinderSettings::default())
        }
        Err(e) => return Err(e.into()),
    };
    serde_json::from_str(&contents)
        .map_err(|e| FinderError::Settings(format!("{}: {}", path.display(), e)))
}

/// Save settings to an explicit path, creating parent directories.
pub fn save_settings_to(path: &Path, settings: &FinderSettings) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(settings)
        .map_err(|e| FinderError::Settings(e.to_string()))?;
    std::fs::write(path, json)?;
    Ok(())
}
