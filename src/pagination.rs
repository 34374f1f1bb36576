//! Cursor-based pagination over driver listings / 基于游标的分页
//!
//! A page is filled from as many raw driver round-trips as it takes, so page
//! boundaries never depend on the page size a backend prefers. The cursor only
//! records the last entry handed out, which is why the page size can change
//! from one call to the next.

use futures::Stream;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::bucket::Bucket;
use crate::error::{BlobError, Result};
use crate::hierarchy::{HierarchyView, ObjectEntry};
use crate::storage::{BlobDriver, ListQuery};

/// Page size used when none (or zero) is given / 默认分页大小
pub const DEFAULT_PAGE_SIZE: usize = 1000;

const TOKEN_HEADER: usize = 8;

/// Position within a listing / 列举位置
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Cursor {
    /// Start from the beginning / 从头开始
    Start,
    /// Resume after a previous page; opaque to callers / 续传令牌
    Token(Vec<u8>),
    /// No more pages / 没有更多
    End,
}

impl Cursor {
    pub fn is_end(&self) -> bool {
        matches!(self, Cursor::End)
    }

    /// Token carries the issuing bucket id followed by the last entry key.
    pub(crate) fn resume(bucket_id: u64, key: &str) -> Self {
        let mut bytes = Vec::with_capacity(TOKEN_HEADER + key.len());
        bytes.extend_from_slice(&bucket_id.to_be_bytes());
        bytes.extend_from_slice(key.as_bytes());
        Cursor::Token(bytes)
    }

    /// Decode a token issued by `bucket_id` / 解码令牌
    pub(crate) fn resume_key(bytes: &[u8], bucket_id: u64) -> Result<&str> {
        if bytes.len() < TOKEN_HEADER {
            return Err(BlobError::InvalidCursor);
        }
        let (header, key) = bytes.split_at(TOKEN_HEADER);
        if header != bucket_id.to_be_bytes() {
            return Err(BlobError::InvalidCursor);
        }
        std::str::from_utf8(key).map_err(|_| BlobError::InvalidCursor)
    }
}

/// Listing options / 列举选项
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListOptions {
    /// Only keys starting with this string / 键前缀
    #[serde(default)]
    pub prefix: String,
    /// Collapse everything after the first delimiter past the prefix; empty lists flat / 分隔符
    #[serde(default)]
    pub delimiter: String,
    /// Maximum entries per page / 每页最大条目数
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

impl Default for ListOptions {
    fn default() -> Self {
        Self {
            prefix: String::new(),
            delimiter: String::new(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl ListOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn prefix(mut self, val: &str) -> Self {
        self.prefix = val.to_string();
        self
    }

    pub fn delimiter(mut self, val: &str) -> Self {
        self.delimiter = val.to_string();
        self
    }

    pub fn page_size(mut self, val: usize) -> Self {
        self.page_size = val;
        self
    }
}

fn effective_page_size(page_size: usize) -> usize {
    if page_size == 0 {
        DEFAULT_PAGE_SIZE
    } else {
        page_size
    }
}

/// Fetch one page of collapsed entries / 获取一页折叠后的条目
///
/// `next` is `Cursor::End` exactly when nothing follows: after filling the page
/// the engine keeps reading until it sees one more entry or the driver runs out.
pub(crate) async fn fetch_page(
    driver: &dyn BlobDriver,
    bucket_id: u64,
    cursor: &Cursor,
    page_size: usize,
    options: &ListOptions,
) -> Result<(Vec<ObjectEntry>, Cursor)> {
    let after = match cursor {
        Cursor::Start => None,
        Cursor::Token(bytes) => Some(Cursor::resume_key(bytes, bucket_id)?.to_string()),
        Cursor::End => return Ok((Vec::new(), Cursor::End)),
    };
    let page_size = effective_page_size(page_size);

    let mut view = HierarchyView::new(&options.prefix, &options.delimiter, after.clone());
    let mut driver_token = after;
    let mut entries: Vec<ObjectEntry> = Vec::with_capacity(page_size.min(DEFAULT_PAGE_SIZE));

    loop {
        let raw = driver
            .list_page(ListQuery {
                prefix: &options.prefix,
                delimiter: &options.delimiter,
                page_token: driver_token.as_deref(),
                page_size: page_size.saturating_add(1),
            })
            .await?;

        for obj in raw.objects {
            if let Some(entry) = view.push(obj) {
                if entries.len() == page_size {
                    // One more entry exists, so the page ends with a resumable cursor
                    let next = entries
                        .last()
                        .map(|last| Cursor::resume(bucket_id, &last.key))
                        .unwrap_or(Cursor::End);
                    return Ok((entries, next));
                }
                entries.push(entry);
            }
        }

        match raw.next_token {
            Some(token) => {
                if driver_token.as_deref().is_some_and(|prev| token.as_str() <= prev) {
                    return Err(BlobError::transport(anyhow::anyhow!(
                        "driver {} returned a page token that does not advance: {:?}",
                        driver.name(),
                        token
                    )));
                }
                tracing::debug!("list {:?}: next raw page after {:?}", options.prefix, token);
                driver_token = Some(token);
            }
            None => return Ok((entries, Cursor::End)),
        }
    }
}

/// Lazy single-pass listing / 惰性单次遍历
///
/// Buffers one page and fetches the next when it runs dry. The page size is
/// fixed when the iterator is created. An error is yielded once and ends the
/// sequence; call `Bucket::list` again for a fresh pass.
pub struct ListIterator {
    bucket: Bucket,
    options: ListOptions,
    buffer: VecDeque<ObjectEntry>,
    cursor: Cursor,
}

impl ListIterator {
    pub(crate) fn new(bucket: Bucket, options: ListOptions) -> Self {
        Self {
            bucket,
            options,
            buffer: VecDeque::new(),
            cursor: Cursor::Start,
        }
    }

    pub fn options(&self) -> &ListOptions {
        &self.options
    }

    /// Next entry, or None once the listing is exhausted / 下一个条目
    pub async fn next(&mut self) -> Option<Result<ObjectEntry>> {
        loop {
            if let Some(entry) = self.buffer.pop_front() {
                return Some(Ok(entry));
            }
            if self.cursor.is_end() {
                return None;
            }

            let page_size = self.options.page_size;
            match self.bucket.list_page(&self.cursor, page_size, &self.options).await {
                Ok((entries, next)) => {
                    self.buffer.extend(entries);
                    self.cursor = next;
                }
                Err(e) => {
                    self.cursor = Cursor::End;
                    return Some(Err(e));
                }
            }
        }
    }

    /// Drain the remaining entries / 收集剩余条目
    pub async fn try_collect(mut self) -> Result<Vec<ObjectEntry>> {
        let mut out = Vec::new();
        while let Some(entry) = self.next().await {
            out.push(entry?);
        }
        Ok(out)
    }

    /// Adapt into a `Stream` / 转换为Stream
    pub fn into_stream(self) -> impl Stream<Item = Result<ObjectEntry>> + Send {
        futures::stream::unfold(self, |mut iter| async move {
            iter.next().await.map(|item| (item, iter))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::memory::MemoryDriver;
    use crate::storage::{RawPage, WriteOptions};
    use async_trait::async_trait;
    use bytes::Bytes;
    use futures::StreamExt;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    const KEYS: [&str; 6] = ["testFile1", "t/t/t", "t-/t.", "dir1/testFile1dir1", "dir2/testFile1dir2", "d"];

    async fn bucket_with(keys: &[&str]) -> Bucket {
        let bucket = Bucket::from_driver(Arc::new(MemoryDriver::new()));
        for key in keys {
            bucket.write_all(key, Bytes::from_static(b"Go Cloud Development Kit"), None).await.unwrap();
        }
        bucket
    }

    async fn walk_pages(bucket: &Bucket, page_size: usize, options: &ListOptions) -> Vec<ObjectEntry> {
        let mut out = Vec::new();
        let mut cursor = Cursor::Start;
        loop {
            let (entries, next) = bucket.list_page(&cursor, page_size, options).await.unwrap();
            assert!(entries.len() <= page_size);
            out.extend(entries);
            if next.is_end() {
                break;
            }
            cursor = next;
        }
        out
    }

    #[test]
    fn test_token_roundtrip_and_foreign_bucket() {
        let Cursor::Token(bytes) = Cursor::resume(7, "dir1/") else {
            panic!("expected token");
        };
        assert_eq!(Cursor::resume_key(&bytes, 7).unwrap(), "dir1/");
        assert!(matches!(Cursor::resume_key(&bytes, 8), Err(BlobError::InvalidCursor)));
        assert!(matches!(Cursor::resume_key(b"abc", 7), Err(BlobError::InvalidCursor)));
    }

    #[tokio::test]
    async fn test_decreasing_page_sizes_agree() {
        let bucket = bucket_with(&KEYS).await;
        let options = ListOptions::new().delimiter("/");
        let expected = bucket.list(options.clone()).try_collect().await.unwrap();
        let keys: Vec<_> = expected.iter().map(|e| e.key.as_str()).collect();
        assert_eq!(keys, vec!["d", "dir1/", "dir2/", "t-/", "t/", "testFile1"]);

        for page_size in (1..=10).rev() {
            assert_eq!(walk_pages(&bucket, page_size, &options).await, expected, "page size {}", page_size);
        }
    }

    #[tokio::test]
    async fn test_exact_end_signal() {
        let bucket = bucket_with(&KEYS).await;
        let options = ListOptions::new().delimiter("/");

        // six entries in pages of three: the second page must already report End
        let (first, next) = bucket.list_page(&Cursor::Start, 3, &options).await.unwrap();
        assert_eq!(first.len(), 3);
        assert!(!next.is_end());
        let (second, next) = bucket.list_page(&next, 3, &options).await.unwrap();
        assert_eq!(second.len(), 3);
        assert!(next.is_end());

        let (empty, next) = bucket.list_page(&Cursor::End, 3, &options).await.unwrap();
        assert!(empty.is_empty());
        assert!(next.is_end());
    }

    #[tokio::test]
    async fn test_varying_page_size_per_call() {
        let bucket = bucket_with(&KEYS).await;
        let options = ListOptions::new().delimiter("/");

        let mut cursor = Cursor::Start;
        let mut keys = Vec::new();
        for size in [1, 4, 2, 10].iter().cycle() {
            let (entries, next) = bucket.list_page(&cursor, *size, &options).await.unwrap();
            keys.extend(entries.into_iter().map(|e| e.key));
            if next.is_end() {
                break;
            }
            cursor = next;
        }
        assert_eq!(keys, vec!["d", "dir1/", "dir2/", "t-/", "t/", "testFile1"]);
    }

    /// Expected entries straight from the hierarchy view over the sorted key set.
    fn reference(keys: &[String], prefix: &str, delimiter: &str) -> Vec<(String, bool)> {
        let mut sorted: Vec<&String> = keys.iter().collect();
        sorted.sort();
        sorted.dedup();
        let raw = sorted
            .into_iter()
            .map(|k| crate::storage::RawObject { key: k.clone(), size: 0, modified: None });
        crate::hierarchy::collapse_all(raw, prefix, delimiter)
            .into_iter()
            .map(|e| (e.key, e.is_prefix))
            .collect()
    }

    fn shape(entries: &[ObjectEntry]) -> Vec<(String, bool)> {
        entries.iter().map(|e| (e.key.clone(), e.is_prefix)).collect()
    }

    #[tokio::test]
    async fn test_random_key_sets_agree_across_page_sizes() {
        let mut rng = StdRng::seed_from_u64(0x5eed);
        let alphabet = ['a', 'b', '/', '-', '.', ':'];

        for _ in 0..20 {
            let count = rng.gen_range(1..40);
            let mut keys = Vec::new();
            for _ in 0..count {
                let len = rng.gen_range(1..7);
                let key: String = (0..len).map(|_| alphabet[rng.gen_range(0..alphabet.len())]).collect();
                keys.push(key);
            }
            let refs: Vec<&str> = keys.iter().map(String::as_str).collect();
            let bucket = bucket_with(&refs).await;

            for delimiter in ["", "/", "::"] {
                for prefix in ["", "a", "a:"] {
                    let options = ListOptions::new().prefix(prefix).delimiter(delimiter).page_size(3);
                    let expected = reference(&keys, prefix, delimiter);
                    let listed = bucket.list(options.clone()).try_collect().await.unwrap();
                    assert_eq!(shape(&listed), expected, "prefix {:?} delimiter {:?}", prefix, delimiter);
                    // strictly ascending, hence no duplicates
                    assert!(listed.windows(2).all(|w| w[0].key < w[1].key));
                    for page_size in 1..=8 {
                        let paged = walk_pages(&bucket, page_size, &options).await;
                        assert_eq!(shape(&paged), expected, "page size {}", page_size);
                    }
                }
            }
        }
    }

    #[tokio::test]
    async fn test_multi_char_delimiter_leaf_resumes() {
        let bucket = bucket_with(&["a::", "a::b"]).await;
        let options = ListOptions::new().prefix("a:").delimiter("::");
        for page_size in [10, 2, 1] {
            let keys: Vec<_> = walk_pages(&bucket, page_size, &options).await.into_iter().map(|e| e.key).collect();
            assert_eq!(keys, vec!["a::", "a::b"], "page size {}", page_size);
        }
    }

    #[tokio::test]
    async fn test_zero_page_size_uses_default() {
        let bucket = bucket_with(&KEYS).await;
        let (entries, next) = bucket.list_page(&Cursor::Start, 0, &ListOptions::new()).await.unwrap();
        assert_eq!(entries.len(), KEYS.len());
        assert!(next.is_end());
    }

    #[tokio::test]
    async fn test_stream_adapter() {
        let bucket = bucket_with(&KEYS).await;
        let stream = bucket.list(ListOptions::new().prefix("dir").delimiter("/").page_size(1)).into_stream();
        let keys: Vec<String> = stream.map(|e| e.unwrap().key).collect().await;
        assert_eq!(keys, vec!["dir1/", "dir2/"]);
    }

    /// Driver that serves raw pages of one key and fails on a chosen call.
    struct FlakyDriver {
        inner: MemoryDriver,
        calls: AtomicUsize,
        fail_on: usize,
    }

    #[async_trait]
    impl BlobDriver for FlakyDriver {
        fn name(&self) -> &str {
            "flaky"
        }
        fn capabilities(&self) -> crate::storage::Capability {
            self.inner.capabilities()
        }
        async fn put(&self, key: &str, data: Bytes, options: &WriteOptions) -> Result<()> {
            self.inner.put(key, data, options).await
        }
        async fn get(&self, key: &str) -> Result<Bytes> {
            self.inner.get(key).await
        }
        async fn delete(&self, key: &str) -> Result<()> {
            self.inner.delete(key).await
        }
        async fn attributes(&self, key: &str) -> Result<crate::storage::Attributes> {
            self.inner.attributes(key).await
        }
        async fn list_page(&self, query: ListQuery<'_>) -> Result<RawPage> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call == self.fail_on {
                return Err(BlobError::transport(anyhow::anyhow!("connection reset")));
            }
            self.inner.list_page(ListQuery { page_size: 1, ..query }).await
        }
    }

    #[tokio::test]
    async fn test_error_terminates_iterator() {
        let driver = Arc::new(FlakyDriver { inner: MemoryDriver::new(), calls: AtomicUsize::new(0), fail_on: 2 });
        let bucket = Bucket::from_driver(driver.clone());
        for key in KEYS {
            bucket.write_all(key, Bytes::new(), None).await.unwrap();
        }

        let mut iter = bucket.list(ListOptions::new().page_size(10));
        // raw pages hold one key each, so the third driver call fails while the first page is filling
        assert!(matches!(iter.next().await, Some(Err(BlobError::Transport(_)))));
        assert!(iter.next().await.is_none());
        assert_eq!(driver.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_small_raw_pages_fill_a_page() {
        let driver = Arc::new(FlakyDriver { inner: MemoryDriver::new(), calls: AtomicUsize::new(0), fail_on: usize::MAX });
        let bucket = Bucket::from_driver(driver);
        for key in KEYS {
            bucket.write_all(key, Bytes::new(), None).await.unwrap();
        }
        let options = ListOptions::new().delimiter("/");
        let (entries, next) = bucket.list_page(&Cursor::Start, 4, &options).await.unwrap();
        let keys: Vec<_> = entries.iter().map(|e| e.key.as_str()).collect();
        assert_eq!(keys, vec!["d", "dir1/", "dir2/", "t-/"]);
        assert!(!next.is_end());
    }

    /// Driver whose raw listing never moves forward.
    struct StuckDriver(MemoryDriver);

    #[async_trait]
    impl BlobDriver for StuckDriver {
        fn name(&self) -> &str {
            "stuck"
        }
        fn capabilities(&self) -> crate::storage::Capability {
            self.0.capabilities()
        }
        async fn put(&self, key: &str, data: Bytes, options: &WriteOptions) -> Result<()> {
            self.0.put(key, data, options).await
        }
        async fn get(&self, key: &str) -> Result<Bytes> {
            self.0.get(key).await
        }
        async fn delete(&self, key: &str) -> Result<()> {
            self.0.delete(key).await
        }
        async fn attributes(&self, key: &str) -> Result<crate::storage::Attributes> {
            self.0.attributes(key).await
        }
        async fn list_page(&self, _query: ListQuery<'_>) -> Result<RawPage> {
            Ok(RawPage { objects: Vec::new(), next_token: Some("a".to_string()) })
        }
    }

    #[tokio::test]
    async fn test_non_advancing_driver_is_an_error() {
        let bucket = Bucket::from_driver(Arc::new(StuckDriver(MemoryDriver::new())));
        let result = bucket.list_page(&Cursor::Start, 5, &ListOptions::new()).await;
        assert!(matches!(result, Err(BlobError::Transport(_))));
    }
}
