//! In-process memory driver / 内存驱动
//!
//! Strongly consistent and cheap to create; backs the `mem://` scheme and tests.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{BlobError, Result};
use crate::storage::{
    page_from_sorted, Attributes, BlobDriver, Capability, ListQuery, RawObject, RawPage, WriteOptions,
};
use crate::utils::{content_etag, is_collapsed_dir, prefix_successor};

#[derive(Debug, Clone)]
struct StoredObject {
    data: Bytes,
    modified: DateTime<Utc>,
    options: WriteOptions,
    etag: String,
}

#[derive(Default)]
pub struct MemoryDriver {
    objects: RwLock<BTreeMap<String, StoredObject>>,
    closed: AtomicBool,
}

impl MemoryDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored objects / 对象数量
    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }
}

#[async_trait]
impl BlobDriver for MemoryDriver {
    fn name(&self) -> &str {
        "memory"
    }

    fn capabilities(&self) -> Capability {
        Capability {
            strong_consistency: true,
            can_range_read: true,
            can_server_side_copy: true,
            can_store_metadata: true,
            max_object_size: None,
        }
    }

    async fn put(&self, key: &str, data: Bytes, options: &WriteOptions) -> Result<()> {
        let object = StoredObject {
            etag: content_etag(&data),
            data,
            modified: Utc::now(),
            options: options.clone(),
        };
        self.objects.write().insert(key.to_string(), object);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Bytes> {
        self.objects
            .read()
            .get(key)
            .map(|o| o.data.clone())
            .ok_or_else(|| BlobError::NotFound(key.to_string()))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.objects
            .write()
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| BlobError::NotFound(key.to_string()))
    }

    async fn attributes(&self, key: &str) -> Result<Attributes> {
        let objects = self.objects.read();
        let object = objects.get(key).ok_or_else(|| BlobError::NotFound(key.to_string()))?;
        Ok(Attributes {
            size: object.data.len() as u64,
            modified: Some(object.modified),
            content_type: object.options.content_type.clone(),
            metadata: object.options.metadata.clone(),
            etag: Some(object.etag.clone()),
        })
    }

    async fn copy(&self, dst: &str, src: &str) -> Result<()> {
        let mut objects = self.objects.write();
        let mut object = objects.get(src).cloned().ok_or_else(|| BlobError::NotFound(src.to_string()))?;
        object.modified = Utc::now();
        objects.insert(dst.to_string(), object);
        Ok(())
    }

    async fn list_page(&self, query: ListQuery<'_>) -> Result<RawPage> {
        let objects = self.objects.read();
        // Resuming after a collapsed directory jumps straight past its subtree
        let successor = query
            .page_token
            .filter(|token| is_collapsed_dir(token, query.prefix, query.delimiter))
            .and_then(prefix_successor);
        let lower = match (query.page_token, successor.as_deref()) {
            (_, Some(successor)) => Bound::Included(successor),
            (Some(token), None) if token >= query.prefix => Bound::Excluded(token),
            _ => Bound::Included(query.prefix),
        };

        // Keys sharing the prefix are contiguous, stop at the first one that doesn't match
        let candidates = objects
            .range::<str, _>((lower, Bound::Unbounded))
            .take_while(|(key, _)| key.starts_with(query.prefix))
            .map(|(key, object)| RawObject {
                key: key.clone(),
                size: object.data.len() as u64,
                modified: Some(object.modified),
            });
        Ok(page_from_sorted(candidates, &query))
    }

    async fn close(&self) -> Result<()> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            tracing::debug!("Memory driver closed with {} objects", self.len());
        }
        Ok(())
    }
}
