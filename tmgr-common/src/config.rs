//! Configuration loading and root folder resolution

use std::path::{Path, PathBuf};

use crate::Result;

/// Environment variable naming the root data folder
pub const ROOT_ENV_VAR: &str = "TMGR_ROOT";

/// Resolve the root data folder with 4-tier priority:
/// 1. Command-line argument (highest priority)
/// 2. `TMGR_ROOT` environment variable
/// 3. `root_folder` key in the user config file
/// 4. OS-dependent compiled default (fallback)
pub fn resolve_root_folder(cli_arg: Option<&Path>) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(ROOT_ENV_VAR) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Some(config_path) = user_config_file() {
        if let Ok(toml_content) = std::fs::read_to_string(&config_path) {
            if let Ok(config) = toml::from_str::<toml::Value>(&toml_content) {
                if let Some(root_folder) = config.get("root_folder").and_then(|v| v.as_str()) {
                    return PathBuf::from(root_folder);
                }
            }
        }
    }

    default_root_folder()
}

/// Create the root folder if it does not exist yet
pub fn ensure_root_folder(root: &Path) -> Result<()> {
    if !root.exists() {
        std::fs::create_dir_all(root)?;
        tracing::info!("Created root folder {}", root.display());
    }
    Ok(())
}

/// Shared database file location inside the root folder
pub fn database_path(root: &Path) -> PathBuf {
    root.join("tmgr.db")
}

/// User config file path (`~/.config/tmgr/config.toml` on Linux)
fn user_config_file() -> Option<PathBuf> {
    let path = dirs::config_dir()?.join("tmgr").join("config.toml");
    if path.exists() {
        Some(path)
    } else {
        None
    }
}

/// OS-dependent default root folder path
fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("tmgr"))
        .unwrap_or_else(|| PathBuf::from("./tmgr_data"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_argument_wins() {
        let root = resolve_root_folder(Some(Path::new("/tmp/tmgr-test-root")));
        assert_eq!(root, PathBuf::from("/tmp/tmgr-test-root"));
    }

    #[test]
    fn database_path_is_under_root() {
        let db = database_path(Path::new("/data/tmgr"));
        assert_eq!(db, PathBuf::from("/data/tmgr/tmgr.db"));
    }
}
