//! Virtual directory view over a flat key space / 扁平键空间上的虚拟目录视图
//!
//! Keys are stored flat. Given a prefix and a delimiter, every key under the
//! prefix is either a direct child object or folds into the first
//! `prefix + segment + delimiter` it contains. Because keys sharing a prefix are
//! contiguous in byte order, the folded sequence of an ordered listing is itself
//! ordered, and duplicates are always adjacent.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::storage::RawObject;

/// Listing entry: a stored object or a virtual directory / 列举条目
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectEntry {
    pub key: String,
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
    /// True for a virtual directory (common prefix ending in the delimiter) / 是否为虚拟目录
    pub is_prefix: bool,
}

impl ObjectEntry {
    pub fn object(raw: RawObject) -> Self {
        Self {
            key: raw.key,
            size: raw.size,
            modified: raw.modified,
            is_prefix: false,
        }
    }

    pub fn prefix(key: &str) -> Self {
        Self {
            key: key.to_string(),
            size: 0,
            modified: None,
            is_prefix: true,
        }
    }
}

/// How a raw key appears one level below `prefix` / 键在当前层级的形态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collapsed<'a> {
    /// Direct child object
    Leaf(&'a str),
    /// Virtual directory, always ends with the delimiter
    Dir(&'a str),
}

impl<'a> Collapsed<'a> {
    pub fn key(&self) -> &'a str {
        match *self {
            Collapsed::Leaf(k) | Collapsed::Dir(k) => k,
        }
    }
}

/// Collapse `key` relative to `prefix`; None when the key is outside the prefix.
///
/// A key equal to `prefix` itself (for example `t/` listed under `t/`) has no
/// delimiter after the prefix and stays a leaf.
pub fn collapse<'a>(key: &'a str, prefix: &str, delimiter: &str) -> Option<Collapsed<'a>> {
    let rest = key.strip_prefix(prefix)?;
    if delimiter.is_empty() {
        return Some(Collapsed::Leaf(key));
    }
    match rest.find(delimiter) {
        Some(pos) => Some(Collapsed::Dir(&key[..prefix.len() + pos + delimiter.len()])),
        None => Some(Collapsed::Leaf(key)),
    }
}

/// Stateful folding of an ordered raw key stream into listing entries / 有状态的折叠器
///
/// Drops keys outside the prefix, folds adjacent keys sharing a directory, and
/// drops anything at or before `after` so a listing can resume mid-stream.
#[derive(Debug, Clone)]
pub struct HierarchyView {
    prefix: String,
    delimiter: String,
    last: Option<String>,
}

impl HierarchyView {
    pub fn new(prefix: &str, delimiter: &str, after: Option<String>) -> Self {
        Self {
            prefix: prefix.to_string(),
            delimiter: delimiter.to_string(),
            last: after,
        }
    }

    /// Key of the last entry emitted (or the resume point) / 最后输出的键
    pub fn last_key(&self) -> Option<&str> {
        self.last.as_deref()
    }

    /// Feed the next raw object; returns a new entry when it starts one / 输入下一个原始对象
    pub fn push(&mut self, raw: RawObject) -> Option<ObjectEntry> {
        let collapsed = collapse(&raw.key, &self.prefix, &self.delimiter)?;
        if let Some(last) = &self.last {
            if collapsed.key() <= last.as_str() {
                return None;
            }
        }

        let entry = match collapsed {
            Collapsed::Dir(dir) => ObjectEntry::prefix(dir),
            Collapsed::Leaf(_) => ObjectEntry::object(raw),
        };
        self.last = Some(entry.key.clone());
        Some(entry)
    }
}

/// Collapse one ordered batch of raw objects / 折叠一批有序原始对象
pub fn collapse_all<I>(raw: I, prefix: &str, delimiter: &str) -> Vec<ObjectEntry>
where
    I: IntoIterator<Item = RawObject>,
{
    let mut view = HierarchyView::new(prefix, delimiter, None);
    raw.into_iter().filter_map(|obj| view.push(obj)).collect()
}
