//! Project configuration files
//!
//! A project may carry `cnext.config.json`, `.cnext.json`, or `.cnextrc`
//! (all JSON) at its root. CLI flags always override config values; the
//! config only supplies defaults for an invocation that omits them.

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Configuration file names, searched in this order
pub const CONFIG_FILE_NAMES: &[&str] = &["cnext.config.json", ".cnext.json", ".cnextrc"];

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProjectConfig {
    /// Code output directory
    pub out_dir: Option<PathBuf>,
    /// Header output directory
    pub header_out_dir: Option<PathBuf>,
    /// Extra include search directories
    pub include_dirs: Vec<PathBuf>,
    /// Target name, same values as `#pragma target`
    pub target: Option<String>,
    /// Emit C++ instead of C
    pub cpp: Option<bool>,
}

impl ProjectConfig {
    pub fn from_json(content: &str) -> Result<Self, String> {
        serde_json::from_str(content).map_err(|e| format!("Failed to parse config: {}", e))
    }

    /// Load the first config file found in `root`, or defaults when none
    /// exists. Relative directories are resolved against the config's
    /// location.
    pub fn load(root: &Path) -> Result<Self, String> {
        for name in CONFIG_FILE_NAMES {
            let path = root.join(name);
            if !path.is_file() {
                continue;
            }
            let content = std::fs::read_to_string(&path)
                .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
            let mut config = Self::from_json(&content)
                .map_err(|e| format!("{}: {}", path.display(), e))?;
            config.anchor(root);
            return Ok(config);
        }
        Ok(ProjectConfig::default())
    }

    fn anchor(&mut self, root: &Path) {
        let rebase = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = root.join(std::mem::take(p));
            }
        };
        if let Some(dir) = &mut self.out_dir {
            rebase(dir);
        }
        if let Some(dir) = &mut self.header_out_dir {
            rebase(dir);
        }
        for dir in &mut self.include_dirs {
            rebase(dir);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_parse_full_config() {
        let config = ProjectConfig::from_json(
            r#"{
                "outDir": "build",
                "headerOutDir": "include",
                "includeDirs": ["lib", "vendor"],
                "target": "cortex-m4",
                "cpp": true
            }"#,
        )
        .unwrap();
        assert_eq!(config.out_dir, Some(PathBuf::from("build")));
        assert_eq!(config.header_out_dir, Some(PathBuf::from("include")));
        assert_eq!(config.include_dirs.len(), 2);
        assert_eq!(config.target.as_deref(), Some("cortex-m4"));
        assert_eq!(config.cpp, Some(true));
    }

    #[test]
    fn test_empty_config_defaults() {
        let config = ProjectConfig::from_json("{}").unwrap();
        assert!(config.out_dir.is_none());
        assert!(config.include_dirs.is_empty());
    }

    #[test]
    fn test_load_anchors_relative_paths() {
        let temp = tempdir().unwrap();
        let root = temp.path();
        fs::write(
            root.join(".cnext.json"),
            r#"{"outDir": "build", "includeDirs": ["lib"]}"#,
        )
        .unwrap();
        let config = ProjectConfig::load(root).unwrap();
        assert_eq!(config.out_dir, Some(root.join("build")));
        assert_eq!(config.include_dirs[0], root.join("lib"));
    }

    #[test]
    fn test_load_without_config_is_default() {
        let temp = tempdir().unwrap();
        let config = ProjectConfig::load(temp.path()).unwrap();
        assert!(config.out_dir.is_none());
    }

    #[test]
    fn test_invalid_config_reports_file() {
        let temp = tempdir().unwrap();
        fs::write(temp.path().join(".cnextrc"), "{ not json").unwrap();
        let err = ProjectConfig::load(temp.path()).unwrap_err();
        assert!(err.contains(".cnextrc"));
    }
}
