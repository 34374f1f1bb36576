//! Local filesystem driver / 本地文件系统驱动

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

mod driver;

pub use driver::LocalDriver;

/// Local driver configuration / 本地驱动配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalConfig {
    /// Root directory holding the objects / 根目录
    pub root: PathBuf,
    /// Create the root directory when missing / 根目录不存在时创建
    #[serde(default = "default_create_dir")]
    pub create_dir: bool,
}

fn default_create_dir() -> bool {
    true
}

impl LocalConfig {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            create_dir: default_create_dir(),
        }
    }
}
