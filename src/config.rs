//! Application configuration module / 应用配置模块
//!
//! Configuration for the demo binary, loaded from config.json
//! Creates default config file on first run / 首次运行时创建默认配置文件

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application configuration / 应用配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct AppConfig {
    /// Bucket configuration / 存储桶配置
    #[serde(default)]
    pub bucket: BucketSection,
    /// Demo run configuration / 演示配置
    #[serde(default)]
    pub demo: DemoSection,
}

/// Bucket configuration / 存储桶配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketSection {
    /// Bucket URL; empty means a temporary local directory / 存储桶URL，为空时使用临时目录
    pub url: String,
    /// Virtual directory delimiter / 虚拟目录分隔符
    pub delimiter: String,
}

/// Demo configuration / 演示配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DemoSection {
    /// Keys written before listing / 写入的键
    pub keys: Vec<String>,
    /// Value stored under every key / 写入的内容
    pub value: String,
    /// Largest page size tried; sizes go down to 1 / 最大分页大小
    pub max_page_size: usize,
}

impl Default for BucketSection {
    fn default() -> Self {
        Self {
            url: "".to_string(), // Empty means temp dir
            delimiter: "/".to_string(),
        }
    }
}

impl Default for DemoSection {
    fn default() -> Self {
        Self {
            keys: ["testFile1", "t/t/t", "t-/t.", "dir1/testFile1dir1", "dir2/testFile1dir2", "d"]
                .iter()
                .map(|k| k.to_string())
                .collect(),
            value: "Go Cloud Development Kit".to_string(),
            max_page_size: 10,
        }
    }
}

impl AppConfig {
    /// Whether the demo should create its own temporary bucket / 是否使用临时存储桶
    pub fn uses_temp_bucket(&self) -> bool {
        self.bucket.url.trim().is_empty()
    }
}

/// Get the config file path / 获取配置文件路径
pub fn get_config_path() -> PathBuf {
    std::env::current_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join("config.json")
}

/// Load configuration from file, or create default if not exists / 加载配置文件，不存在则创建默认配置
pub fn load_config() -> Result<AppConfig, String> {
    load_config_from(&get_config_path())
}

/// Same as `load_config` with an explicit path / 指定路径加载配置
pub fn load_config_from(config_path: &Path) -> Result<AppConfig, String> {
    if config_path.exists() {
        // Load existing config / 加载现有配置
        let content = std::fs::read_to_string(config_path)
            .map_err(|e| format!("Failed to read config file: {}", e))?;

        let config: AppConfig = serde_json::from_str(&content)
            .map_err(|e| format!("Failed to parse config file: {}", e))?;

        tracing::info!("Loaded configuration from {:?}", config_path);
        Ok(config)
    } else {
        // Create default config / 创建默认配置
        let config = AppConfig::default();
        save_config_to(&config, config_path)?;
        tracing::info!("Created default configuration at {:?}", config_path);
        Ok(config)
    }
}

/// Save configuration to file / 保存配置到文件
fn save_config_to(config: &AppConfig, config_path: &Path) -> Result<(), String> {
    let content = serde_json::to_string_pretty(config)
        .map_err(|e| format!("Failed to serialize config: {}", e))?;

    std::fs::write(config_path, content)
        .map_err(|e| format!("Failed to write config file: {}", e))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_first_run_creates_default() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");

        let config = load_config_from(&path).unwrap();
        assert_eq!(config, AppConfig::default());
        assert!(config.uses_temp_bucket());
        assert!(path.exists());

        // second run reads what the first one wrote
        assert_eq!(load_config_from(&path).unwrap(), config);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"bucket":{"url":"mem://","delimiter":"/"}}"#).unwrap();

        let config = load_config_from(&path).unwrap();
        assert_eq!(config.bucket.url, "mem://");
        assert!(!config.uses_temp_bucket());
        assert_eq!(config.demo, DemoSection::default());
    }

    #[test]
    fn test_broken_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(load_config_from(&path).unwrap_err().contains("parse"));
    }
}
