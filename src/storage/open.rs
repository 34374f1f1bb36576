//! Driver selection from a URL or config / 根据URL或配置选择驱动
//!
//! Backends form a closed set resolved once at open time; there is no global
//! registry and nothing depends on module initialisation order.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use url::Url;

use super::BlobDriver;
use crate::drivers::local::{LocalConfig, LocalDriver};
use crate::drivers::memory::MemoryDriver;
use crate::drivers::s3::{S3Config, S3Driver};
use crate::error::{BlobError, Result};

/// Bucket backend configuration / 存储桶后端配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "driver", rename_all = "lowercase")]
pub enum BucketConfig {
    /// `file:///path/to/dir`
    Local(LocalConfig),
    /// `s3://bucket?endpoint=...&region=...`
    S3(S3Config),
    /// `mem://`
    Memory,
}

impl BucketConfig {
    /// Parse a bucket URL / 解析存储桶URL
    pub fn from_url(raw: &str) -> Result<Self> {
        let url = Url::parse(raw).map_err(|e| BlobError::InvalidConfig(format!("{}: {}", raw, e)))?;

        match url.scheme() {
            "file" => {
                let root = url
                    .to_file_path()
                    .map_err(|_| BlobError::InvalidConfig(format!("{}: not a local path", raw)))?;
                let mut config = LocalConfig::new(root);
                for (name, value) in url.query_pairs() {
                    match name.as_ref() {
                        "create_dir" => config.create_dir = parse_bool(&name, &value)?,
                        _ => return Err(unknown_param(raw, &name)),
                    }
                }
                Ok(BucketConfig::Local(config))
            }
            "s3" => {
                let bucket = url.host_str().unwrap_or_default();
                if bucket.is_empty() {
                    return Err(BlobError::InvalidConfig(format!("{}: missing bucket name", raw)));
                }
                let mut config = S3Config { bucket: bucket.to_string(), ..Default::default() };
                for (name, value) in url.query_pairs() {
                    match name.as_ref() {
                        "endpoint" => config.endpoint = value.into_owned(),
                        "region" => config.region = value.into_owned(),
                        "prefix" => config.key_prefix = value.into_owned(),
                        "path_style" | "s3ForcePathStyle" => {
                            config.force_path_style = parse_bool(&name, &value)?
                        }
                        _ => return Err(unknown_param(raw, &name)),
                    }
                }
                let config = config.with_env_credentials();
                config.validate()?;
                Ok(BucketConfig::S3(config))
            }
            "mem" => {
                if let Some((name, _)) = url.query_pairs().next() {
                    return Err(unknown_param(raw, &name));
                }
                Ok(BucketConfig::Memory)
            }
            other => Err(BlobError::UnsupportedScheme(other.to_string())),
        }
    }

    /// URL scheme of this backend / 后端对应的URL scheme
    pub fn scheme(&self) -> &'static str {
        match self {
            BucketConfig::Local(_) => "file",
            BucketConfig::S3(_) => "s3",
            BucketConfig::Memory => "mem",
        }
    }
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        _ => Err(BlobError::InvalidConfig(format!("{}: expected a boolean, got {:?}", name, value))),
    }
}

fn unknown_param(raw: &str, name: &str) -> BlobError {
    BlobError::InvalidConfig(format!("{}: unknown query parameter {:?}", raw, name))
}

/// Create the driver instance for a config / 创建驱动实例
pub fn open_driver(config: BucketConfig) -> Result<Arc<dyn BlobDriver>> {
    let driver: Arc<dyn BlobDriver> = match config {
        BucketConfig::Local(config) => Arc::new(LocalDriver::new(config)?),
        BucketConfig::S3(config) => Arc::new(S3Driver::new(config)?),
        BucketConfig::Memory => Arc::new(MemoryDriver::new()),
    };
    tracing::debug!("Driver opened: {}", driver.name());
    Ok(driver)
}
