//! Configuration file and state-path layout.
//!
//! `~/.summarize/config.json` must be a JSON object at the top level;
//! anything else is rejected immediately with the file path. Env overrides
//! and CLI flags layer on top: CLI flag > env > config > built-in default.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use smz_cache::VerifyMode;
use smz_llm::Preset;

use crate::context::RuntimeContext;
use crate::error::{CoreError, CoreResult};

const CONFIG_DIR: &str = ".summarize";

/// Metadata-cache settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CacheSection {
    pub enabled: bool,
    pub max_mb: u64,
    pub ttl_days: u64,
    pub path: Option<PathBuf>,
    pub media: MediaSection,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            enabled: true,
            max_mb: 512,
            ttl_days: 30,
            path: None,
            media: MediaSection::default(),
        }
    }
}

/// Media-cache settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MediaSection {
    pub enabled: bool,
    pub max_mb: u64,
    pub ttl_days: u64,
    pub path: Option<PathBuf>,
    pub verify: VerifyMode,
}

impl Default for MediaSection {
    fn default() -> Self {
        Self {
            enabled: true,
            max_mb: 2048,
            ttl_days: 7,
            path: None,
            verify: VerifyMode::Size,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct OpenaiSection {
    pub base_url: Option<String>,
    pub use_chat_completions: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct AnthropicSection {
    pub base_url: Option<String>,
}

/// The parsed configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    /// Default model selector (id or preset name).
    pub model: Option<String>,
    /// Named presets.
    pub models: HashMap<String, Preset>,
    pub language: Option<String>,
    pub openai: OpenaiSection,
    pub anthropic: AnthropicSection,
    pub cache: CacheSection,
}

impl FileConfig {
    /// Load from `path`. A missing file is the default config; a present
    /// file must hold a JSON object.
    pub fn load(path: &Path) -> CoreResult<Self> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => {
                return Err(CoreError::Config {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                })
            }
        };

        let value: serde_json::Value =
            serde_json::from_str(&raw).map_err(|e| CoreError::Config {
                path: path.to_path_buf(),
                message: format!("invalid JSON: {e}"),
            })?;
        if !value.is_object() {
            return Err(CoreError::Config {
                path: path.to_path_buf(),
                message: "top-level value must be an object".to_string(),
            });
        }

        serde_json::from_value(value).map_err(|e| CoreError::Config {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Write `models.free.rules[0].candidates` back, preserving every other
    /// key in the file verbatim.
    pub fn persist_free_candidates(path: &Path, candidates: &[String]) -> CoreResult<()> {
        let mut value: serde_json::Value = match std::fs::read_to_string(path) {
            Ok(raw) => serde_json::from_str(&raw).map_err(|e| CoreError::Config {
                path: path.to_path_buf(),
                message: format!("invalid JSON: {e}"),
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => serde_json::json!({}),
            Err(e) => {
                return Err(CoreError::Config {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                })
            }
        };
        if !value.is_object() {
            return Err(CoreError::Config {
                path: path.to_path_buf(),
                message: "top-level value must be an object".to_string(),
            });
        }

        value["models"]["free"] = serde_json::json!({
            "mode": "auto",
            "rules": [{"candidates": candidates}],
        });

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(&value)?)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }
}

/// Persisted state layout under the config root.
#[derive(Debug, Clone)]
pub struct Paths {
    pub root: PathBuf,
}

impl Paths {
    pub fn new(ctx: &RuntimeContext) -> Self {
        Self {
            root: ctx.home_dir.join(CONFIG_DIR),
        }
    }

    pub fn config_file(&self) -> PathBuf {
        self.root.join("config.json")
    }

    pub fn cache_db(&self, config: &CacheSection) -> PathBuf {
        config
            .path
            .clone()
            .unwrap_or_else(|| self.root.join("cache.sqlite"))
    }

    pub fn media_dir(&self, media: &MediaSection) -> PathBuf {
        media
            .path
            .clone()
            .unwrap_or_else(|| self.root.join("cache").join("media"))
    }

    pub fn slides_dir(&self) -> PathBuf {
        self.root.join("cache").join("slides")
    }

    pub fn daemon_file(&self) -> PathBuf {
        self.root.join("daemon.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_is_default() {
        let dir = TempDir::new().unwrap();
        let config = FileConfig::load(&dir.path().join("config.json")).unwrap();
        assert_eq!(config, FileConfig::default());
        assert!(config.cache.enabled);
        assert_eq!(config.cache.max_mb, 512);
        assert_eq!(config.cache.media.max_mb, 2048);
    }

    #[test]
    fn test_non_object_top_level_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "[1, 2, 3]").unwrap();
        let err = FileConfig::load(&path).unwrap_err();
        let text = err.to_string();
        assert!(text.contains("config.json"));
        assert!(text.contains("object"));
    }

    #[test]
    fn test_bad_json_names_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(FileConfig::load(&path)
            .unwrap_err()
            .to_string()
            .contains("config.json"));
    }

    #[test]
    fn test_parses_sections() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{
                "model": "free",
                "language": "de",
                "openai": {"baseUrl": "https://gw/v1", "useChatCompletions": true},
                "cache": {"maxMb": 128, "media": {"verify": "hash"}}
            }"#,
        )
        .unwrap();
        let config = FileConfig::load(&path).unwrap();
        assert_eq!(config.model.as_deref(), Some("free"));
        assert_eq!(config.openai.base_url.as_deref(), Some("https://gw/v1"));
        assert!(config.openai.use_chat_completions);
        assert_eq!(config.cache.max_mb, 128);
        assert_eq!(config.cache.media.verify, VerifyMode::Hash);
        // Unset fields keep defaults.
        assert_eq!(config.cache.ttl_days, 30);
    }

    #[test]
    fn test_persist_free_candidates_preserves_other_keys() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"language": "fr", "custom": {"x": 1}}"#).unwrap();

        FileConfig::persist_free_candidates(
            &path,
            &["openrouter/a:free".to_string(), "openrouter/b:free".to_string()],
        )
        .unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["language"], "fr");
        assert_eq!(value["custom"]["x"], 1);
        assert_eq!(
            value["models"]["free"]["rules"][0]["candidates"][0],
            "openrouter/a:free"
        );

        // And it round-trips through the typed loader.
        let config = FileConfig::load(&path).unwrap();
        let preset = config.models.get("free").unwrap();
        assert_eq!(preset.rules[0].candidates.len(), 2);
    }
}
