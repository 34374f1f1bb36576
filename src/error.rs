//! Error model shared by the bucket facade and every driver / 统一错误模型

use thiserror::Error;

pub type Result<T> = std::result::Result<T, BlobError>;

/// Every failure surfaced by a bucket or driver / 存储桶与驱动的所有错误
#[derive(Debug, Error)]
pub enum BlobError {
    #[error("object not found: {0}")]
    NotFound(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),

    #[error("bucket is closed")]
    Closed,

    #[error("cursor was not issued by this bucket")]
    InvalidCursor,

    #[error("invalid bucket config: {0}")]
    InvalidConfig(String),

    /// Backend-specific failure (network, unexpected status, decode...) / 后端传输错误
    #[error("transport error: {0}")]
    Transport(#[source] anyhow::Error),
}

impl BlobError {
    pub fn transport(err: impl Into<anyhow::Error>) -> Self {
        BlobError::Transport(err.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, BlobError::NotFound(_))
    }

    /// Map an io error for `key`, keeping the typed categories callers match on / 映射IO错误
    pub fn from_io(err: std::io::Error, key: &str) -> Self {
        use std::io::ErrorKind;

        #[cfg(unix)]
        {
            match err.raw_os_error() {
                Some(libc::ENOSPC) | Some(libc::EDQUOT) => {
                    return BlobError::QuotaExceeded(format!("{}: {}", key, err));
                }
                Some(libc::ENAMETOOLONG) => {
                    return BlobError::InvalidKey(format!("{}: {}", key, err));
                }
                _ => {}
            }
        }

        match err.kind() {
            ErrorKind::NotFound => BlobError::NotFound(key.to_string()),
            ErrorKind::PermissionDenied => BlobError::PermissionDenied(key.to_string()),
            ErrorKind::InvalidInput => BlobError::InvalidKey(format!("{}: {}", key, err)),
            _ => BlobError::Transport(anyhow::Error::new(err).context(format!("key {}", key))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_io_kinds() {
        let e = BlobError::from_io(std::io::Error::from(std::io::ErrorKind::NotFound), "a/b");
        assert!(e.is_not_found());

        let e = BlobError::from_io(std::io::Error::from(std::io::ErrorKind::PermissionDenied), "a");
        assert!(matches!(e, BlobError::PermissionDenied(k) if k == "a"));

        let e = BlobError::from_io(std::io::Error::new(std::io::ErrorKind::Other, "boom"), "a");
        assert!(matches!(e, BlobError::Transport(_)));
    }

    #[cfg(unix)]
    #[test]
    fn test_from_io_errno() {
        let e = BlobError::from_io(std::io::Error::from_raw_os_error(libc::ENOSPC), "k");
        assert!(matches!(e, BlobError::QuotaExceeded(_)));

        let e = BlobError::from_io(std::io::Error::from_raw_os_error(libc::ENAMETOOLONG), "k");
        assert!(matches!(e, BlobError::InvalidKey(_)));
    }
}
