use std::path::Path;

use crate::TransferError;

/// Validates a destination object key.
///
/// Rejects:
/// - Empty keys
/// - Keys starting with `/` (absolute)
/// - `.` or `..` segments (directory traversal on file-backed stores)
/// - Empty segments (`a//b`)
/// - Backslashes and NUL bytes
pub fn validate_object_key(key: &str) -> Result<(), TransferError> {
    if key.is_empty() {
        return Err(TransferError::InvalidKey("empty key".into()));
    }
    if key.starts_with('/') {
        return Err(TransferError::InvalidKey(format!(
            "absolute key not allowed: {key}"
        )));
    }
    if key.contains('\\') || key.contains('\0') {
        return Err(TransferError::InvalidKey(format!(
            "illegal character in key: {key:?}"
        )));
    }

    for segment in key.split('/') {
        match segment {
            "" => {
                return Err(TransferError::InvalidKey(format!(
                    "empty path segment in key: {key}"
                )));
            }
            "." | ".." => {
                return Err(TransferError::InvalidKey(format!(
                    "relative segment not allowed: {key}"
                )));
            }
            _ => {}
        }
    }

    Ok(())
}

/// Builds an object key from a folder prefix and a local file's name.
///
/// The prefix may be empty or carry leading/trailing slashes; the result
/// joins the parts with exactly one `/`.
pub fn object_key_for(prefix: &str, file_path: &Path) -> Result<String, TransferError> {
    let name = file_path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| {
            TransferError::InvalidKey(format!("no file name in {}", file_path.display()))
        })?;

    let prefix = prefix.trim_matches('/');
    let key = if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}/{name}")
    };
    validate_object_key(&key)?;
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_key() {
        assert!(validate_object_key("").is_err());
    }

    #[test]
    fn rejects_parent_dir_traversal() {
        assert!(validate_object_key("../../../etc/passwd").is_err());
        assert!(validate_object_key("sub/../../escape").is_err());
        assert!(validate_object_key("..").is_err());
    }

    #[test]
    fn rejects_absolute_key() {
        assert!(validate_object_key("/tmp/malicious").is_err());
    }

    #[test]
    fn rejects_empty_segment_and_backslash() {
        assert!(validate_object_key("a//b").is_err());
        assert!(validate_object_key("a/").is_err());
        assert!(validate_object_key("a\\b").is_err());
    }

    #[test]
    fn accepts_nested_keys() {
        assert!(validate_object_key("exports/2024/prices.csv").is_ok());
        assert!(validate_object_key(".config/settings.json").is_ok());
    }

    #[test]
    fn key_for_joins_prefix() {
        let path = Path::new("/data/out/prices.csv");
        assert_eq!(object_key_for("exports/", path).unwrap(), "exports/prices.csv");
        assert_eq!(object_key_for("/exports", path).unwrap(), "exports/prices.csv");
        assert_eq!(object_key_for("", path).unwrap(), "prices.csv");
    }

    #[test]
    fn key_for_requires_file_name() {
        assert!(object_key_for("exports", Path::new("/")).is_err());
    }
}
