/// Key handling utility functions / 对象键工具函数

use crate::error::{BlobError, Result};
use crate::hierarchy::{collapse, Collapsed};

/// Maximum key length in bytes (matches the S3 limit) / 键最大字节长度
pub const MAX_KEY_LEN: usize = 1024;

/// Prefix reserved for staging and sidecar files in the local driver.
/// `#` is always percent-encoded by `encode_key`, so it never starts an object file name.
pub const RESERVED_MARK: char = '#';

/// Validate an object key / 校验对象键
/// 1. Non-empty / 非空
/// 2. At most MAX_KEY_LEN bytes / 不超过最大长度
/// 3. No NUL byte / 不含NUL
pub fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(BlobError::InvalidKey("key must not be empty".to_string()));
    }
    if key.len() > MAX_KEY_LEN {
        return Err(BlobError::InvalidKey(format!(
            "key is {} bytes, limit is {}",
            key.len(),
            MAX_KEY_LEN
        )));
    }
    if key.contains('\0') {
        return Err(BlobError::InvalidKey(format!("{:?} contains a NUL byte", key)));
    }
    Ok(())
}

/// Encode a key into a single flat file name / 将键编码为单层文件名
pub fn encode_key(key: &str) -> String {
    match key {
        "." => "%2E".to_string(),
        ".." => "%2E%2E".to_string(),
        _ => urlencoding::encode(key).into_owned(),
    }
}

/// Decode a file name produced by `encode_key`; None for foreign files / 解码文件名
pub fn decode_key(file_name: &str) -> Option<String> {
    if file_name.starts_with(RESERVED_MARK) {
        return None;
    }
    let decoded = urlencoding::decode(file_name).ok()?.into_owned();
    // Only accept names that encode back to themselves, so stray files never alias a key
    if encode_key(&decoded) == file_name {
        Some(decoded)
    } else {
        None
    }
}

/// Check if `token` is the collapsed directory it folds into below `prefix` / 判断是否为折叠目录
///
/// Ending with the delimiter is not enough: with a multi-character delimiter a
/// leaf such as `a::` under `a:` ends with `::` but holds no delimiter past the prefix.
pub fn is_collapsed_dir(token: &str, prefix: &str, delimiter: &str) -> bool {
    matches!(collapse(token, prefix, delimiter), Some(Collapsed::Dir(dir)) if dir == token)
}

/// Check whether a raw key lies past the resume point `page_token` / 判断键是否在续传位置之后
///
/// Keys must be strictly greater than the token. When the token is a collapsed
/// directory, the whole subtree under it is skipped as well.
pub fn after_token(key: &str, page_token: Option<&str>, prefix: &str, delimiter: &str) -> bool {
    match page_token {
        None => true,
        Some(token) => {
            if key <= token {
                return false;
            }
            !(is_collapsed_dir(token, prefix, delimiter) && key.starts_with(token))
        }
    }
}

/// Smallest string greater than every string starting with `prefix` / 前缀后继
///
/// None when every character of `prefix` is `char::MAX`, or it is empty.
pub fn prefix_successor(prefix: &str) -> Option<String> {
    let mut chars: Vec<char> = prefix.chars().collect();
    while let Some(last) = chars.pop() {
        let next = match last as u32 + 1 {
            // skip the surrogate range
            0xD800 => Some('\u{E000}'),
            code => char::from_u32(code),
        };
        if let Some(next) = next {
            chars.push(next);
            return Some(chars.into_iter().collect());
        }
    }
    None
}

/// Exclusive `start-after` bound for a backend listing resumed at `page_token` / 列举起点
///
/// After a collapsed directory the bound jumps past its subtree. No finite string
/// sits right below the prefix successor, so the bound is the token followed by
/// `char::MAX`: keys it fails to skip are still dropped by `after_token`.
pub fn list_start_after(page_token: Option<&str>, prefix: &str, delimiter: &str) -> Option<String> {
    let token = page_token?;
    if is_collapsed_dir(token, prefix, delimiter) {
        Some(format!("{}{}", token, char::MAX))
    } else {
        Some(token.to_string())
    }
}

/// Hex md5 of a payload, used as ETag by drivers without a native one / 计算ETag
pub fn content_etag(data: &[u8]) -> String {
    hex::encode(md5::compute(data).0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_key() {
        assert!(validate_key("a").is_ok());
        assert!(validate_key("t/t/t").is_ok());
        assert!(validate_key("dir/").is_ok());
        assert!(matches!(validate_key(""), Err(BlobError::InvalidKey(_))));
        assert!(matches!(validate_key("a\0b"), Err(BlobError::InvalidKey(_))));
        assert!(validate_key(&"x".repeat(MAX_KEY_LEN)).is_ok());
        assert!(validate_key(&"x".repeat(MAX_KEY_LEN + 1)).is_err());
    }

    #[test]
    fn test_encode_decode_key() {
        assert_eq!(encode_key("testFile1"), "testFile1");
        assert_eq!(encode_key("t/t/t"), "t%2Ft%2Ft");
        assert_eq!(encode_key("a#b"), "a%23b");
        assert_eq!(decode_key("t%2Ft%2Ft").as_deref(), Some("t/t/t"));
        assert_eq!(decode_key("t-%2Ft.").as_deref(), Some("t-/t."));
        assert_eq!(decode_key("#tmp-123"), None);
        assert_eq!(decode_key("t%2ft"), None);
        assert_eq!(decode_key("a b"), None);
        assert_eq!(encode_key(".."), "%2E%2E");
        assert_eq!(decode_key("%2E").as_deref(), Some("."));
        assert_eq!(decode_key("."), None);
        assert_eq!(decode_key(".hidden").as_deref(), Some(".hidden"));
    }

    #[test]
    fn test_after_token() {
        assert!(after_token("a", None, "", "/"));
        assert!(!after_token("a", Some("a"), "", "/"));
        assert!(after_token("b", Some("a"), "", "/"));
        assert!(!after_token("dir1/x", Some("dir1/"), "", "/"));
        assert!(after_token("dir10", Some("dir1/"), "", "/"));
        // token equal to the prefix is a leaf, not a directory to skip
        assert!(after_token("t/t", Some("t/"), "t/", "/"));
        // flat listing never skips subtrees
        assert!(after_token("dir1/x", Some("dir1/"), "", ""));
    }

    #[test]
    fn test_multi_char_delimiter_leaf_is_not_a_directory() {
        // `a::` under `a:` holds no `::` past the prefix, so it is a leaf
        assert!(!is_collapsed_dir("a::", "a:", "::"));
        assert!(after_token("a::b", Some("a::"), "a:", "::"));
        assert!(is_collapsed_dir("a::", "", "::"));
        assert!(!after_token("a::b", Some("a::"), "", "::"));
        // a directory token must be exactly the folded key
        assert!(!is_collapsed_dir("a/b/", "", "/"));
        assert!(!is_collapsed_dir("t/", "t/", "/"));
    }

    #[test]
    fn test_prefix_successor() {
        assert_eq!(prefix_successor("dir1/").as_deref(), Some("dir10"));
        assert_eq!(prefix_successor("a").as_deref(), Some("b"));
        assert_eq!(prefix_successor("\u{D7FF}").as_deref(), Some("\u{E000}"));
        assert_eq!(prefix_successor("a\u{10FFFF}").as_deref(), Some("b"));
        assert_eq!(prefix_successor("\u{10FFFF}"), None);
        assert_eq!(prefix_successor(""), None);
    }

    #[test]
    fn test_list_start_after() {
        assert_eq!(list_start_after(None, "", "/"), None);
        // leaf token: resume right after it
        assert_eq!(list_start_after(Some("d"), "", "/").as_deref(), Some("d"));
        assert_eq!(list_start_after(Some("a::"), "a:", "::").as_deref(), Some("a::"));
        // directory token: jump over everything below it
        let bound = list_start_after(Some("dir1/"), "", "/").unwrap();
        assert!(bound.as_str() > "dir1/testFile1dir1");
        assert!(bound.as_str() > "dir1/\u{10FFFE}");
        assert!(bound.as_str() < "dir10");
        assert!(bound.as_str() < prefix_successor("dir1/").unwrap().as_str());
        // flat listings never skip subtrees
        assert_eq!(list_start_after(Some("dir1/"), "", "").as_deref(), Some("dir1/"));
    }

    #[test]
    fn test_content_etag() {
        assert_eq!(content_etag(b""), "d41d8cd98f00b204e9800998ecf8427e");
    }
}
