//! S3驱动配置

use serde::{Deserialize, Serialize};

use crate::error::{BlobError, Result};

/// S3配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct S3Config {
    /// 存储桶名称
    pub bucket: String,
    /// S3端点地址
    /// AWS: https://s3.{region}.amazonaws.com
    /// MinIO: http://localhost:9000
    #[serde(default)]
    pub endpoint: String,
    /// 区域
    #[serde(default = "default_region")]
    pub region: String,
    /// Access Key ID
    #[serde(default)]
    pub access_key_id: String,
    /// Secret Access Key
    #[serde(default)]
    pub secret_access_key: String,
    /// Session Token（用于临时凭证）
    #[serde(default)]
    pub session_token: String,
    /// Key prefix inside the bucket, prepended to every object key / 键前缀
    #[serde(default)]
    pub key_prefix: String,
    /// 强制使用路径风格（而非虚拟主机风格）
    /// MinIO等需要设置为true
    #[serde(default)]
    pub force_path_style: bool,
}

fn default_region() -> String {
    "us-east-1".to_string()
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            bucket: String::new(),
            endpoint: String::new(),
            region: default_region(),
            access_key_id: String::new(),
            secret_access_key: String::new(),
            session_token: String::new(),
            key_prefix: String::new(),
            force_path_style: false,
        }
    }
}

impl S3Config {
    /// Fill credentials from AWS_ACCESS_KEY_ID / AWS_SECRET_ACCESS_KEY / AWS_SESSION_TOKEN
    /// when they are not set explicitly / 从环境变量读取凭证
    pub fn with_env_credentials(mut self) -> Self {
        let read = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());
        if self.access_key_id.is_empty() {
            if let Some(v) = read("AWS_ACCESS_KEY_ID") {
                self.access_key_id = v;
            }
        }
        if self.secret_access_key.is_empty() {
            if let Some(v) = read("AWS_SECRET_ACCESS_KEY") {
                self.secret_access_key = v;
            }
        }
        if self.session_token.is_empty() {
            if let Some(v) = read("AWS_SESSION_TOKEN") {
                self.session_token = v;
            }
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.bucket.is_empty() {
            return Err(BlobError::InvalidConfig("s3 bucket name is empty".to_string()));
        }
        if self.region.is_empty() && self.endpoint.is_empty() {
            return Err(BlobError::InvalidConfig("s3 needs a region or an endpoint".to_string()));
        }
        Ok(())
    }
}
