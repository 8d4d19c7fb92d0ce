use note_engine::EngineConfig;
use std::path::PathBuf;

/// Resolved command line configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Store root directory
    pub root: PathBuf,
    pub engine: EngineConfig,
}

impl Config {
    /// Build configuration from the raw `--root` value (supports ~ for the
    /// home directory).
    pub fn new(root: &str, create_root_files: bool) -> Result<Self, ConfigError> {
        let root = root.trim();
        if root.is_empty() {
            return Err(ConfigError::MissingRoot);
        }

        Ok(Self {
            root: expand_tilde(root),
            engine: EngineConfig { create_root_files },
        })
    }
}

/// Expand ~ or ~/ prefix to the user's home directory.
fn expand_tilde(path: &str) -> PathBuf {
    if path == "~" {
        dirs::home_dir().unwrap_or_else(|| PathBuf::from("~"))
    } else if let Some(rest) = path.strip_prefix("~/") {
        dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| PathBuf::from(path))
    } else {
        PathBuf::from(path)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Store root is empty; pass --root or set NOTE_STORE_ROOT")]
    MissingRoot,
}
