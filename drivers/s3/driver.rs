//! S3驱动核心实现
//!
//! 设计原则：
//! - 只提供原语（put, get, delete, list_page等）
//! - 列举返回扁平键，目录折叠由上层完成
//! - 不保证写后立即可列举（最终一致）

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use s3::bucket::Bucket;
use s3::creds::Credentials;
use s3::error::S3Error;
use s3::Region;

use crate::error::{BlobError, Result};
use crate::storage::{Attributes, BlobDriver, Capability, ListQuery, RawObject, RawPage, WriteOptions};
use crate::utils::list_start_after;

use super::config::S3Config;

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// S3驱动
pub struct S3Driver {
    config: S3Config,
    bucket: Box<Bucket>,
}

impl S3Driver {
    /// 创建新的S3驱动实例
    pub fn new(config: S3Config) -> Result<Self> {
        config.validate()?;
        let bucket = Self::create_bucket(&config)?;
        tracing::info!("S3 driver initialized, bucket: {}, endpoint: {:?}", config.bucket, config.endpoint);
        Ok(Self { config, bucket })
    }

    /// 创建S3 Bucket客户端
    fn create_bucket(config: &S3Config) -> Result<Box<Bucket>> {
        let credentials = Credentials::new(
            Some(&config.access_key_id),
            Some(&config.secret_access_key),
            if config.session_token.is_empty() { None } else { Some(&config.session_token) },
            None,
            None,
        )
        .map_err(|e| BlobError::InvalidConfig(format!("创建S3凭证失败: {}", e)))?;

        let region = if config.endpoint.is_empty() {
            Region::Custom {
                region: config.region.clone(),
                endpoint: format!("https://s3.{}.amazonaws.com", config.region),
            }
        } else {
            Region::Custom {
                region: config.region.clone(),
                endpoint: config.endpoint.clone(),
            }
        };

        let bucket = Bucket::new(&config.bucket, region, credentials)
            .map_err(|e| BlobError::InvalidConfig(format!("创建S3 Bucket失败: {}", e)))?;

        let bucket = if config.force_path_style {
            bucket.with_path_style()
        } else {
            bucket
        };

        Ok(bucket)
    }

    /// 获取完整的对象键
    fn object_key(&self, key: &str) -> String {
        format!("{}{}", self.config.key_prefix, key)
    }

    async fn head(&self, key: &str) -> Result<Attributes> {
        let object_key = self.object_key(key);
        let (head, code) = self.bucket.head_object(&object_key).await.map_err(|e| map_s3_error(e, key))?;
        check_status(code, key, "head")?;

        Ok(Attributes {
            size: head.content_length.unwrap_or_default().max(0) as u64,
            modified: head.last_modified.as_deref().and_then(parse_http_date),
            content_type: head.content_type,
            metadata: head.metadata.unwrap_or_default().into_iter().collect(),
            etag: head.e_tag.map(|t| t.trim_matches('"').to_string()),
        })
    }
}

/// Map a non-2xx status to the typed error taxonomy / 状态码映射
fn check_status(code: u16, key: &str, op: &str) -> Result<()> {
    match code {
        200..=299 => Ok(()),
        404 => Err(BlobError::NotFound(key.to_string())),
        401 | 403 => Err(BlobError::PermissionDenied(key.to_string())),
        507 => Err(BlobError::QuotaExceeded(key.to_string())),
        _ => Err(BlobError::transport(anyhow::anyhow!("S3 {} {} 返回状态码 {}", op, key, code))),
    }
}

fn map_s3_error(err: S3Error, key: &str) -> BlobError {
    match err {
        S3Error::HttpFailWithBody(code, body) => match check_status(code, key, "request") {
            Err(BlobError::Transport(_)) => {
                BlobError::transport(anyhow::anyhow!("S3请求失败: {} {}", code, body))
            }
            Err(e) => e,
            Ok(()) => BlobError::transport(anyhow::anyhow!("S3请求失败: {} {}", code, body)),
        },
        other => BlobError::transport(other),
    }
}

/// HEAD returns RFC 2822 dates, ListObjects returns RFC 3339 / 解析时间
fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(value)
        .or_else(|_| DateTime::parse_from_rfc3339(value))
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[async_trait]
impl BlobDriver for S3Driver {
    fn name(&self) -> &str {
        "s3"
    }

    fn capabilities(&self) -> Capability {
        Capability {
            strong_consistency: false,
            can_range_read: true,
            can_server_side_copy: true,
            can_store_metadata: false,
            max_object_size: Some(5 * 1024 * 1024 * 1024),
        }
    }

    async fn put(&self, key: &str, data: Bytes, options: &WriteOptions) -> Result<()> {
        let object_key = self.object_key(key);
        let content_type = options.content_type.as_deref().unwrap_or(DEFAULT_CONTENT_TYPE);
        if !options.metadata.is_empty() {
            tracing::debug!("S3 put: user metadata is not persisted for {}", key);
        }

        let response = self
            .bucket
            .put_object_with_content_type(&object_key, &data, content_type)
            .await
            .map_err(|e| map_s3_error(e, key))?;
        check_status(response.status_code(), key, "put")?;

        tracing::debug!("S3 put: key={}, size={}", object_key, data.len());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Bytes> {
        let object_key = self.object_key(key);
        let response = self.bucket.get_object(&object_key).await.map_err(|e| map_s3_error(e, key))?;
        check_status(response.status_code(), key, "get")?;
        Ok(Bytes::from(response.bytes().to_vec()))
    }

    async fn get_range(&self, key: &str, offset: u64, length: Option<u64>) -> Result<Bytes> {
        if length == Some(0) {
            // Still report NotFound for missing keys
            self.head(key).await?;
            return Ok(Bytes::new());
        }
        let object_key = self.object_key(key);
        // S3 range end is inclusive
        let end = length.map(|l| offset.saturating_add(l - 1));
        let response = self
            .bucket
            .get_object_range(&object_key, offset, end)
            .await
            .map_err(|e| map_s3_error(e, key))?;
        if response.status_code() == 416 {
            return Ok(Bytes::new());
        }
        check_status(response.status_code(), key, "get_range")?;
        Ok(Bytes::from(response.bytes().to_vec()))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        // S3 DeleteObject succeeds for missing keys, so check first
        self.head(key).await?;

        let object_key = self.object_key(key);
        let response = self
            .bucket
            .delete_object(&object_key)
            .await
            .map_err(|e| map_s3_error(e, key))?;
        check_status(response.status_code(), key, "delete")?;

        tracing::debug!("S3 delete: key={}", object_key);
        Ok(())
    }

    async fn attributes(&self, key: &str) -> Result<Attributes> {
        self.head(key).await
    }

    /// S3 CopyObject - 使用copy_object_internal，验证复制结果
    async fn copy(&self, dst: &str, src: &str) -> Result<()> {
        self.head(src).await?;

        let src_key = self.object_key(src);
        let dst_key = self.object_key(dst);
        // copy_object_internal的from参数需要URL编码（中文等非ASCII字符）
        let encoded_src = urlencoding::encode(&src_key);

        let code = self
            .bucket
            .copy_object_internal(&encoded_src, &dst_key)
            .await
            .map_err(|e| map_s3_error(e, src))?;
        check_status(code, dst, "copy")?;

        tracing::debug!("S3 CopyObject: {} -> {}", src_key, dst_key);
        Ok(())
    }

    async fn list_page(&self, query: ListQuery<'_>) -> Result<RawPage> {
        let prefix = self.object_key(query.prefix);
        let start_after = list_start_after(query.page_token, query.prefix, query.delimiter)
            .map(|t| self.object_key(&t));

        // Flat listing: no delimiter, so keys under a collapsed directory still come
        // back and are dropped by `accepts`; `start_after` already jumps past most of them
        let (result, code) = self
            .bucket
            .list_page(prefix.clone(), None, None, start_after, Some(query.page_size.max(1)))
            .await
            .map_err(|e| map_s3_error(e, &prefix))?;
        check_status(code, &prefix, "list")?;

        let listed = result.contents.iter().map(|obj| Listed {
            key: &obj.key,
            size: obj.size as u64,
            last_modified: &obj.last_modified,
        });
        Ok(raw_page(listed, result.is_truncated, &self.config.key_prefix, &query))
    }
}

/// One entry of a ListObjectsV2 response / 列举结果中的对象
struct Listed<'a> {
    key: &'a str,
    size: u64,
    last_modified: &'a str,
}

/// Map one listing response to a raw page / 列举结果转换为原始分页
///
/// The page may be empty after filtering; the token still moves forward to the
/// last key S3 returned.
fn raw_page<'a, I>(listed: I, is_truncated: bool, key_prefix: &str, query: &ListQuery<'_>) -> RawPage
where
    I: IntoIterator<Item = Listed<'a>>,
{
    let mut objects = Vec::new();
    let mut last_raw = None;
    for obj in listed {
        let Some(key) = obj.key.strip_prefix(key_prefix) else {
            continue;
        };
        last_raw = Some(key);
        if !query.accepts(key) {
            continue;
        }
        objects.push(RawObject {
            key: key.to_string(),
            size: obj.size,
            modified: parse_http_date(obj.last_modified),
        });
    }

    let next_token = if is_truncated { last_raw.map(str::to_string) } else { None };
    RawPage { objects, next_token }
}
