//! Provider-agnostic blob buckets / 与后端无关的对象存储桶
//!
//! A `Bucket` binds one driver (local filesystem, S3 or memory) and exposes a
//! flat key space with delimiter-based virtual directories and cursor paging.

pub mod config;
pub mod error;
pub mod utils;
pub mod storage;
pub mod hierarchy;
pub mod pagination;
pub mod walk;
pub mod bucket;

// Driver modules (point to project root drivers via path attribute) / 驱动模块
#[path = "../drivers/mod.rs"]
pub mod drivers;

pub use bucket::Bucket;
pub use error::{BlobError, Result};
pub use hierarchy::ObjectEntry;
pub use pagination::{Cursor, ListIterator, ListOptions};
pub use storage::{Attributes, BlobDriver, BucketConfig, Capability, WriteOptions};
pub use walk::{WalkEntry, Walker};
