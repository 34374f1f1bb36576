use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{BlobError, Result};

/// Options applied when writing an object / 写入选项
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WriteOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    /// User metadata stored alongside the object / 用户元数据
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

impl WriteOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn content_type(mut self, val: &str) -> Self {
        self.content_type = Some(val.to_string());
        self
    }

    pub fn metadata(mut self, key: &str, val: &str) -> Self {
        self.metadata.insert(key.to_string(), val.to_string());
        self
    }
}

/// Object attributes / 对象属性
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attributes {
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
}

/// A raw stored object as returned by a driver listing / 驱动原始对象
#[derive(Debug, Clone, PartialEq)]
pub struct RawObject {
    pub key: String,
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
}

/// One page of raw keys from a driver / 驱动原始分页
#[derive(Debug, Clone, Default)]
pub struct RawPage {
    /// Raw keys in ascending byte order / 按字节升序
    pub objects: Vec<RawObject>,
    /// Key to resume after; None when the driver has nothing further / 续传键
    pub next_token: Option<String>,
}

/// Raw listing request handed to a driver / 驱动列举请求
#[derive(Debug, Clone, Copy)]
pub struct ListQuery<'a> {
    pub prefix: &'a str,
    /// Drivers may use it to skip the subtree of a collapsed directory token.
    /// Returned keys are never collapsed.
    pub delimiter: &'a str,
    /// Return only keys strictly after this one / 只返回此键之后的键
    pub page_token: Option<&'a str>,
    pub page_size: usize,
}

impl<'a> ListQuery<'a> {
    /// Whether a raw key belongs in this page / 判断键是否属于本页
    pub fn accepts(&self, key: &str) -> bool {
        key.starts_with(self.prefix)
            && crate::utils::after_token(key, self.page_token, self.prefix, self.delimiter)
    }
}

/// Driver capability declaration / 驱动能力声明
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Capability {
    /// A write is immediately visible to read and list / 写入后立即可见
    pub strong_consistency: bool,
    /// Support range reading without fetching the whole object / 支持范围读取
    pub can_range_read: bool,
    /// Support server-side copy (no download needed) / 支持服务端复制
    pub can_server_side_copy: bool,
    /// Persist content type and user metadata / 保存内容类型与元数据
    pub can_store_metadata: bool,
    /// Maximum object size limit (None means no limit) / 最大对象大小限制
    pub max_object_size: Option<u64>,
}

impl Default for Capability {
    fn default() -> Self {
        Self {
            strong_consistency: false,
            can_range_read: false,
            can_server_side_copy: false,
            can_store_metadata: false,
            max_object_size: None,
        }
    }
}

/// Blob storage driver interface (provides only primitive operations) / 存储驱动接口
///
/// Implementations must be safe to call concurrently. Deleting a key that does not
/// exist is an error (`NotFound`), never a no-op.
#[async_trait]
pub trait BlobDriver: Send + Sync {
    /// Driver name / 驱动名称
    fn name(&self) -> &str;

    /// Driver capabilities / 驱动能力
    fn capabilities(&self) -> Capability;

    /// Create or overwrite `key` atomically / 原子写入
    async fn put(&self, key: &str, data: Bytes, options: &WriteOptions) -> Result<()>;

    /// Read the full object / 读取完整对象
    async fn get(&self, key: &str) -> Result<Bytes>;

    /// Read `length` bytes from `offset` (None reads to the end) / 范围读取
    /// Default implementation slices the full object; drivers with native ranges override it.
    async fn get_range(&self, key: &str, offset: u64, length: Option<u64>) -> Result<Bytes> {
        let data = self.get(key).await?;
        Ok(slice_range(data, offset, length))
    }

    /// Delete `key`; `NotFound` if absent / 删除对象
    async fn delete(&self, key: &str) -> Result<()>;

    /// Check existence / 判断是否存在
    async fn exists(&self, key: &str) -> Result<bool> {
        match self.attributes(key).await {
            Ok(_) => Ok(true),
            Err(BlobError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Object attributes / 获取对象属性
    async fn attributes(&self, key: &str) -> Result<Attributes>;

    /// Copy `src` to `dst` with its attributes (default implementation: read then write) / 复制对象
    async fn copy(&self, dst: &str, src: &str) -> Result<()> {
        let attrs = self.attributes(src).await?;
        let data = self.get(src).await?;
        let options = WriteOptions {
            content_type: attrs.content_type,
            metadata: attrs.metadata,
        };
        self.put(dst, data, &options).await
    }

    /// One page of raw keys / 列举一页原始键
    async fn list_page(&self, query: ListQuery<'_>) -> Result<RawPage>;

    /// Release backend resources; idempotent / 释放资源
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Slice `data` to `offset..offset+length`, clamped to its bounds / 截取范围
pub fn slice_range(data: Bytes, offset: u64, length: Option<u64>) -> Bytes {
    let len = data.len() as u64;
    let start = offset.min(len);
    let end = match length {
        Some(l) => start.saturating_add(l).min(len),
        None => len,
    };
    data.slice(start as usize..end as usize)
}

/// Take up to `page_size` accepted keys from an ordered iterator / 按序取一页
///
/// Shared by drivers that hold the whole key set in sorted order.
pub fn page_from_sorted<I>(objects: I, query: &ListQuery<'_>) -> RawPage
where
    I: IntoIterator<Item = RawObject>,
{
    let page_size = query.page_size.max(1);
    let mut out = Vec::with_capacity(page_size.min(1024));
    let mut more = false;

    for obj in objects.into_iter().filter(|o| query.accepts(&o.key)) {
        if out.len() == page_size {
            more = true;
            break;
        }
        out.push(obj);
    }

    let next_token = if more {
        out.last().map(|o: &RawObject| o.key.clone())
    } else {
        None
    };
    RawPage { objects: out, next_token }
}

pub mod open;

pub use open::{BucketConfig, open_driver};
