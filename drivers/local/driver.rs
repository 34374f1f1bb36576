use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::collections::BinaryHeap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tempfile::NamedTempFile;

use crate::error::{BlobError, Result};
use crate::storage::{Attributes, BlobDriver, Capability, ListQuery, RawObject, RawPage, WriteOptions};
use crate::utils::{decode_key, encode_key, RESERVED_MARK};

use super::LocalConfig;

/// Sidecar directory holding content type and metadata / 属性文件目录
const ATTRS_DIR: &str = "#attrs";
const STAGING_PREFIX: &str = "#tmp-";
/// Longest piece of an encoded key kept in one path component (NAME_MAX is 255) / 单级文件名长度
const NAME_CHUNK: usize = 200;

/// Sidecar attributes persisted next to an object / 对象旁存的属性
#[derive(Debug, Default, serde::Serialize, serde::Deserialize)]
struct Sidecar {
    #[serde(default)]
    content_type: Option<String>,
    #[serde(default)]
    metadata: std::collections::BTreeMap<String, String>,
}

/// Filesystem-backed driver. Every key maps to one file under `root` named
/// after the percent-encoded key, so `d` and `d/x` can coexist.
///
/// Encoded names longer than `NAME_CHUNK` are split into continuation
/// directories, each named after one chunk plus a trailing `#`. Encoded names
/// never contain `#`, so those directories cannot clash with object files.
pub struct LocalDriver {
    root: PathBuf,
    closed: AtomicBool,
}

impl LocalDriver {
    pub fn new(config: LocalConfig) -> Result<Self> {
        let root = config.root;

        if !root.exists() {
            if !config.create_dir {
                return Err(BlobError::InvalidConfig(format!("root {:?} does not exist", root)));
            }
            std::fs::create_dir_all(&root).map_err(|e| BlobError::from_io(e, &root.to_string_lossy()))?;
        }
        let canonical_root = root
            .canonicalize()
            .map_err(|e| BlobError::from_io(e, &root.to_string_lossy()))?;
        if !canonical_root.is_dir() {
            return Err(BlobError::InvalidConfig(format!("root {:?} is not a directory", canonical_root)));
        }

        tracing::info!("Local driver initialized, root: {:?}", canonical_root);
        Ok(Self { root: canonical_root, closed: AtomicBool::new(false) })
    }

    /// Get root directory / 获取根目录
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, key: &str) -> PathBuf {
        self.root.join(relative_path(key))
    }

    fn sidecar_path(&self, key: &str) -> PathBuf {
        self.root.join(ATTRS_DIR).join(relative_path(key))
    }
}

/// Path of `key` relative to a root / 键对应的相对路径
fn relative_path(key: &str) -> PathBuf {
    let encoded = encode_key(key);
    let mut path = PathBuf::new();
    let mut rest = encoded.as_str();
    // Encoded keys are ASCII, any byte offset is a char boundary
    while rest.len() > NAME_CHUNK {
        let (chunk, tail) = rest.split_at(NAME_CHUNK);
        path.push(format!("{}{}", chunk, RESERVED_MARK));
        rest = tail;
    }
    path.push(rest);
    path
}

/// Create a staging file in the directory of `target` / 在目标目录创建暂存文件
fn stage_for(target: &Path) -> std::io::Result<NamedTempFile> {
    let dir = target
        .parent()
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidInput, "path has no parent"))?;
    let mut attempts = 0;
    loop {
        std::fs::create_dir_all(dir)?;
        match tempfile::Builder::new().prefix(STAGING_PREFIX).tempfile_in(dir) {
            // a concurrent delete pruned the directory in between
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && attempts < 3 => attempts += 1,
            other => return other,
        }
    }
}

/// Write `data` to a staging file, then rename it over `target` / 暂存后原子替换
fn write_atomic(target: &Path, data: &[u8]) -> std::io::Result<()> {
    let mut tmp = stage_for(target)?;
    tmp.write_all(data)?;
    tmp.as_file().sync_all()?;
    tmp.persist(target).map_err(|e| e.error)?;
    Ok(())
}

fn remove_if_exists(path: &Path) -> std::io::Result<()> {
    match std::fs::remove_file(path) {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

fn write_sidecar(path: &Path, options: &WriteOptions) -> std::io::Result<()> {
    if options.content_type.is_none() && options.metadata.is_empty() {
        return remove_if_exists(path);
    }
    let sidecar = Sidecar {
        content_type: options.content_type.clone(),
        metadata: options.metadata.clone(),
    };
    let body = serde_json::to_vec(&sidecar).map_err(std::io::Error::other)?;
    write_atomic(path, &body)
}

fn read_sidecar_raw(path: &Path) -> std::io::Result<Option<Vec<u8>>> {
    match std::fs::read(path) {
        Ok(body) => Ok(Some(body)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

fn read_sidecar(path: &Path) -> std::io::Result<Sidecar> {
    match read_sidecar_raw(path)? {
        Some(body) => serde_json::from_slice(&body).map_err(std::io::Error::other),
        None => Ok(Sidecar::default()),
    }
}

/// Publish a staged object together with its attributes / 提交暂存对象与属性
///
/// Attributes are replaced first and the object last. If the object rename
/// fails the previous attributes are put back, so the prior value stays whole.
fn commit(staged: NamedTempFile, target: &Path, sidecar: &Path, options: &WriteOptions) -> std::io::Result<()> {
    let previous = read_sidecar_raw(sidecar)?;
    write_sidecar(sidecar, options)?;

    if let Err(e) = staged.persist(target) {
        let restored = match previous {
            Some(body) => write_atomic(sidecar, &body),
            None => remove_if_exists(sidecar),
        };
        if let Err(restore) = restored {
            tracing::warn!("local put: failed to restore attributes {:?}: {}", sidecar, restore);
        }
        return Err(e.error);
    }
    Ok(())
}

/// Remove continuation directories left empty below `stop` / 清理空的续接目录
fn prune_empty_dirs(stop: &Path, path: &Path) {
    let mut dir = path.parent();
    while let Some(current) = dir {
        if current == stop || !current.starts_with(stop) {
            break;
        }
        // fails on the first directory that still has entries
        if std::fs::remove_dir(current).is_err() {
            break;
        }
        dir = current.parent();
    }
}

fn modified_of(metadata: &std::fs::Metadata) -> Option<DateTime<Utc>> {
    metadata.modified().ok().map(DateTime::<Utc>::from)
}

/// Object files must be regular files; anything else at the path reads as absent.
fn stat_object(path: &Path, key: &str) -> Result<std::fs::Metadata> {
    let metadata = std::fs::metadata(path).map_err(|e| BlobError::from_io(e, key))?;
    if metadata.is_file() {
        Ok(metadata)
    } else {
        Err(BlobError::NotFound(key.to_string()))
    }
}

/// Collect the smallest `limit` keys accepted by `query`, plus one to tell whether more exist.
///
/// Walks the root and its continuation directories with an explicit stack.
/// Every raw page rescans the whole tree: O(N log limit) per page, so a full
/// listing costs O(N * N / limit) directory reads.
fn scan_keys(root: &Path, query: &ListQuery<'_>, limit: usize) -> Result<Vec<(String, PathBuf)>> {
    let mut best: BinaryHeap<(String, PathBuf)> = BinaryHeap::with_capacity(limit + 1);
    let mut stack = vec![(root.to_path_buf(), String::new())];

    while let Some((dir, encoded_prefix)) = stack.pop() {
        let entries = std::fs::read_dir(&dir).map_err(|e| BlobError::from_io(e, query.prefix))?;
        for entry in entries {
            let entry = entry.map_err(|e| BlobError::from_io(e, query.prefix))?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                tracing::warn!("local list: skipping non UTF-8 file name {:?}", entry.file_name());
                continue;
            };
            // attributes and staging files
            if name.starts_with(RESERVED_MARK) {
                continue;
            }
            let path = entry.path();
            // Follow symlinks like reads do
            let is_dir = match std::fs::metadata(&path) {
                Ok(metadata) => metadata.is_dir(),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(BlobError::from_io(e, query.prefix)),
            };
            if is_dir {
                match name.strip_suffix(RESERVED_MARK) {
                    Some(chunk) => stack.push((path, format!("{}{}", encoded_prefix, chunk))),
                    None => tracing::warn!("local list: skipping foreign directory {:?}", path),
                }
                continue;
            }

            let encoded = format!("{}{}", encoded_prefix, name);
            match decode_key(&encoded) {
                Some(key) if query.accepts(&key) => {
                    best.push((key, path));
                    if best.len() > limit + 1 {
                        best.pop();
                    }
                }
                Some(_) => {}
                None => tracing::warn!("local list: skipping foreign file {:?}", path),
            }
        }
    }
    Ok(best.into_sorted_vec())
}

#[async_trait]
impl BlobDriver for LocalDriver {
    fn name(&self) -> &str {
        "local"
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
        let target = self.object_path(key);
        let sidecar = self.sidecar_path(key);
        let options = options.clone();
        let key_owned = key.to_string();
        let len = data.len();

        // Use sync IO inside spawn_blocking / 使用同步IO
        tokio::task::spawn_blocking(move || {
            let stage = || -> std::io::Result<NamedTempFile> {
                let mut tmp = stage_for(&target)?;
                tmp.write_all(&data)?;
                tmp.as_file().sync_all()?;
                Ok(tmp)
            };
            let staged = stage().map_err(|e| BlobError::from_io(e, &key_owned))?;
            commit(staged, &target, &sidecar, &options).map_err(|e| BlobError::from_io(e, &key_owned))
        })
        .await
        .map_err(BlobError::transport)??;

        tracing::debug!("local put: {} ({} bytes)", key, len);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Bytes> {
        let path = self.object_path(key);
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) => {
                // A directory at the object path is not an object
                if path.is_dir() {
                    Err(BlobError::NotFound(key.to_string()))
                } else {
                    Err(BlobError::from_io(e, key))
                }
            }
        }
    }

    async fn get_range(&self, key: &str, offset: u64, length: Option<u64>) -> Result<Bytes> {
        let path = self.object_path(key);
        let key_owned = key.to_string();

        let data = tokio::task::spawn_blocking(move || {
            use std::io::{Read, Seek};
            stat_object(&path, &key_owned)?;
            let mut file = std::fs::File::open(&path).map_err(|e| BlobError::from_io(e, &key_owned))?;
            file.seek(std::io::SeekFrom::Start(offset))
                .map_err(|e| BlobError::from_io(e, &key_owned))?;
            let mut buf = Vec::new();
            match length {
                Some(l) => file.take(l).read_to_end(&mut buf),
                None => file.read_to_end(&mut buf),
            }
            .map_err(|e| BlobError::from_io(e, &key_owned))?;
            Ok::<Vec<u8>, BlobError>(buf)
        })
        .await
        .map_err(BlobError::transport)??;

        Ok(Bytes::from(data))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = self.object_path(key);
        if path.is_dir() {
            return Err(BlobError::NotFound(key.to_string()));
        }
        tokio::fs::remove_file(&path).await.map_err(|e| BlobError::from_io(e, key))?;

        let sidecar = self.sidecar_path(key);
        match tokio::fs::remove_file(&sidecar).await {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => {
                tracing::warn!("local delete: stale attributes for {}: {}", key, e);
            }
            _ => {}
        }

        let root = self.root.clone();
        tokio::task::spawn_blocking(move || {
            prune_empty_dirs(&root, &path);
            prune_empty_dirs(&root.join(ATTRS_DIR), &sidecar);
        })
        .await
        .map_err(BlobError::transport)?;

        tracing::debug!("local delete: {}", key);
        Ok(())
    }

    async fn attributes(&self, key: &str) -> Result<Attributes> {
        let path = self.object_path(key);
        let sidecar = self.sidecar_path(key);
        let key_owned = key.to_string();

        tokio::task::spawn_blocking(move || {
            let metadata = stat_object(&path, &key_owned)?;
            let extra = read_sidecar(&sidecar).map_err(|e| BlobError::from_io(e, &key_owned))?;
            let modified = modified_of(&metadata);
            let etag = modified.map(|m| {
                format!("{:x}-{:x}", m.timestamp_nanos_opt().unwrap_or_default(), metadata.len())
            });
            Ok::<Attributes, BlobError>(Attributes {
                size: metadata.len(),
                modified,
                content_type: extra.content_type,
                metadata: extra.metadata,
                etag,
            })
        })
        .await
        .map_err(BlobError::transport)?
    }

    /// Server-side copy: std::fs::copy into a staging file, then commit / 服务端复制
    async fn copy(&self, dst: &str, src: &str) -> Result<()> {
        let src_path = self.object_path(src);
        let dst_path = self.object_path(dst);
        let src_sidecar = self.sidecar_path(src);
        let dst_sidecar = self.sidecar_path(dst);
        let (src_key, dst_key) = (src.to_string(), dst.to_string());

        tokio::task::spawn_blocking(move || {
            stat_object(&src_path, &src_key)?;
            let extra = read_sidecar(&src_sidecar).map_err(|e| BlobError::from_io(e, &src_key))?;

            let tmp = stage_for(&dst_path).map_err(|e| BlobError::from_io(e, &dst_key))?;
            std::fs::copy(&src_path, tmp.path()).map_err(|e| BlobError::from_io(e, &src_key))?;

            let options = WriteOptions { content_type: extra.content_type, metadata: extra.metadata };
            commit(tmp, &dst_path, &dst_sidecar, &options).map_err(|e| BlobError::from_io(e, &dst_key))
        })
        .await
        .map_err(BlobError::transport)??;

        tracing::debug!("local copy: {} -> {}", src, dst);
        Ok(())
    }

    async fn list_page(&self, query: ListQuery<'_>) -> Result<RawPage> {
        let root = self.root.clone();
        let prefix = query.prefix.to_string();
        let delimiter = query.delimiter.to_string();
        let page_token = query.page_token.map(str::to_string);
        let page_size = query.page_size;

        tokio::task::spawn_blocking(move || {
            let query = ListQuery {
                prefix: &prefix,
                delimiter: &delimiter,
                page_token: page_token.as_deref(),
                page_size,
            };
            let limit = page_size.max(1);

            // Select names first, stat only the page we return / 先筛选再读取元数据
            let candidates = scan_keys(&root, &query, limit)?;
            let more = candidates.len() > limit;
            let next_token = if more { Some(candidates[limit - 1].0.clone()) } else { None };

            let mut objects = Vec::with_capacity(limit.min(candidates.len()));
            for (key, path) in candidates.into_iter().take(limit) {
                match std::fs::metadata(&path) {
                    Ok(metadata) if metadata.is_file() => objects.push(RawObject {
                        key,
                        size: metadata.len(),
                        modified: modified_of(&metadata),
                    }),
                    // removed since the scan
                    Ok(_) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => return Err(BlobError::from_io(e, &key)),
                }
            }

            Ok::<RawPage, BlobError>(RawPage { objects, next_token })
        })
        .await
        .map_err(BlobError::transport)?
    }

    async fn close(&self) -> Result<()> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            tracing::info!("Local driver closed, root: {:?}", self.root);
        }
        Ok(())
    }
}
