//! Recursive listing over virtual directories / 虚拟目录递归遍历
//!
//! Depth-first, pre-order, driven by an explicit stack of list iterators so
//! deep hierarchies never grow the call stack.

use serde::Serialize;

use crate::bucket::Bucket;
use crate::error::Result;
use crate::hierarchy::ObjectEntry;
use crate::pagination::{ListIterator, ListOptions};

/// Entry produced by a walk / 遍历条目
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WalkEntry {
    pub entry: ObjectEntry,
    /// 0 for entries directly under the starting prefix / 深度
    pub depth: usize,
}

/// Pre-order tree walker / 前序遍历器
pub struct Walker {
    bucket: Bucket,
    options: ListOptions,
    stack: Vec<ListIterator>,
    max_depth: Option<usize>,
}

impl Walker {
    pub(crate) fn new(bucket: Bucket, options: ListOptions) -> Self {
        let root = bucket.list(options.clone());
        Self {
            bucket,
            options,
            stack: vec![root],
            max_depth: None,
        }
    }

    /// Do not descend below `depth`; 0 lists only the starting level / 最大深度
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    /// Next entry in pre-order / 下一个条目
    pub async fn next(&mut self) -> Option<Result<WalkEntry>> {
        loop {
            let depth = self.stack.len().checked_sub(1)?;
            let top = self.stack.last_mut()?;

            let entry = match top.next().await {
                None => {
                    self.stack.pop();
                    continue;
                }
                Some(Err(e)) => {
                    self.stack.clear();
                    return Some(Err(e));
                }
                Some(Ok(entry)) => entry,
            };

            let descend = entry.is_prefix && self.max_depth.map_or(true, |max| depth < max);
            if descend {
                let child = ListOptions {
                    prefix: entry.key.clone(),
                    ..self.options.clone()
                };
                self.stack.push(self.bucket.list(child));
            }
            return Some(Ok(WalkEntry { entry, depth }));
        }
    }

    /// Drain the walk / 收集全部条目
    pub async fn try_collect(mut self) -> Result<Vec<WalkEntry>> {
        let mut out = Vec::new();
        while let Some(entry) = self.next().await {
            out.push(entry?);
        }
        Ok(out)
    }
}
