//! Bucket facade / 存储桶门面
//!
//! The public handle. It checks keys and the closed flag, then dispatches to the
//! driver chosen at open time. Every listing goes through the key hierarchy
//! view and the pagination engine. Retries are left to callers.

use bytes::Bytes;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{BlobError, Result};
use crate::hierarchy::ObjectEntry;
use crate::pagination::{fetch_page, Cursor, ListIterator, ListOptions};
use crate::storage::{open_driver, Attributes, BlobDriver, BucketConfig, Capability, WriteOptions};
use crate::utils::validate_key;
use crate::walk::Walker;

struct BucketInner {
    /// Random per-open id stamped into cursors / 游标中的存储桶标识
    id: u64,
    driver: Arc<dyn BlobDriver>,
    closed: AtomicBool,
}

/// Handle to one bucket; cheap to clone, clones share state / 存储桶句柄
#[derive(Clone)]
pub struct Bucket {
    inner: Arc<BucketInner>,
}

impl std::fmt::Debug for Bucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bucket")
            .field("id", &format_args!("{:016x}", self.inner.id))
            .field("driver", &self.inner.driver.name())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Bucket {
    /// Open a bucket from a URL such as `file:///data`, `s3://name?region=...` or `mem://` / 通过URL打开
    pub fn open(url: &str) -> Result<Self> {
        Self::open_config(BucketConfig::from_url(url)?)
    }

    /// Open a bucket from an explicit config / 通过配置打开
    pub fn open_config(config: BucketConfig) -> Result<Self> {
        let driver = open_driver(config)?;
        Ok(Self::from_driver(driver))
    }

    /// Wrap an already constructed driver / 包装已有驱动
    pub fn from_driver(driver: Arc<dyn BlobDriver>) -> Self {
        let id = rand::random::<u64>();
        tracing::info!("Bucket opened: {:016x} ({})", id, driver.name());
        Self {
            inner: Arc::new(BucketInner {
                id,
                driver,
                closed: AtomicBool::new(false),
            }),
        }
    }

    fn driver(&self) -> Result<&dyn BlobDriver> {
        if self.is_closed() {
            return Err(BlobError::Closed);
        }
        Ok(self.inner.driver.as_ref())
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    pub fn driver_name(&self) -> &str {
        self.inner.driver.name()
    }

    pub fn capabilities(&self) -> Capability {
        self.inner.driver.capabilities()
    }

    /// Write the whole object; replaces any previous value / 写入完整对象
    pub async fn write_all(&self, key: &str, data: impl Into<Bytes>, options: Option<&WriteOptions>) -> Result<()> {
        let driver = self.driver()?;
        validate_key(key)?;
        let data = data.into();
        match options {
            Some(options) => driver.put(key, data, options).await,
            None => driver.put(key, data, &WriteOptions::default()).await,
        }
    }

    /// Read the whole object / 读取完整对象
    pub async fn read_all(&self, key: &str) -> Result<Bytes> {
        let driver = self.driver()?;
        validate_key(key)?;
        driver.get(key).await
    }

    /// Read `length` bytes starting at `offset`; None reads to the end / 范围读取
    pub async fn read_range(&self, key: &str, offset: u64, length: Option<u64>) -> Result<Bytes> {
        let driver = self.driver()?;
        validate_key(key)?;
        driver.get_range(key, offset, length).await
    }

    /// Delete an object; `NotFound` when it does not exist / 删除对象
    pub async fn delete(&self, key: &str) -> Result<()> {
        let driver = self.driver()?;
        validate_key(key)?;
        driver.delete(key).await
    }

    pub async fn exists(&self, key: &str) -> Result<bool> {
        let driver = self.driver()?;
        validate_key(key)?;
        driver.exists(key).await
    }

    pub async fn attributes(&self, key: &str) -> Result<Attributes> {
        let driver = self.driver()?;
        validate_key(key)?;
        driver.attributes(key).await
    }

    /// Copy `src` to `dst`, attributes included / 复制对象
    pub async fn copy(&self, dst: &str, src: &str) -> Result<()> {
        let driver = self.driver()?;
        validate_key(dst)?;
        validate_key(src)?;
        driver.copy(dst, src).await
    }

    /// Lazy listing with a page size fixed now / 惰性列举
    pub fn list(&self, options: ListOptions) -> ListIterator {
        ListIterator::new(self.clone(), options)
    }

    /// One page of entries plus the cursor for the next one / 分页列举
    ///
    /// Start with `Cursor::Start` and stop when the returned cursor is `Cursor::End`.
    /// The page size may differ between calls.
    pub async fn list_page(
        &self,
        cursor: &Cursor,
        page_size: usize,
        options: &ListOptions,
    ) -> Result<(Vec<ObjectEntry>, Cursor)> {
        let driver = self.driver()?;
        fetch_page(driver, self.inner.id, cursor, page_size, options).await
    }

    /// Depth-first walk through virtual directories / 递归遍历虚拟目录
    pub fn walk(&self, options: ListOptions) -> Walker {
        Walker::new(self.clone(), options)
    }

    /// Release the driver; later calls fail with `Closed`. Idempotent / 关闭
    pub async fn close(&self) -> Result<()> {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        tracing::info!("Bucket closed: {:016x} ({})", self.inner.id, self.inner.driver.name());
        self.inner.driver.close().await
    }
}
