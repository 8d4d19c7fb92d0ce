use serde::Deserialize;

/// Engine behaviour switches.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Write `root.md` / `root.schema.yml` on init when the store has none,
    /// instead of keeping the root as an in-memory stub.
    pub create_root_files: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_keys_use_defaults() {
        let config: EngineConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert!(!config.create_root_files);
    }

    #[test]
    fn test_parse_create_root_files() {
        let config: EngineConfig = serde_json::from_str(r#"{"create_root_files": true}"#).unwrap();
        assert!(config.create_root_files);
    }
}
