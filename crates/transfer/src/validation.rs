use crate::TransferError;

/// Longest file name accepted, in bytes (common filesystem limit).
pub const MAX_NAME_LEN: usize = 255;

/// Validates that `name` is a single, bare file name.
///
/// The receiver joins the name onto its destination directory, so anything
/// that could address another location is rejected:
/// - Empty names, `.` and `..`
/// - Path separators (`/` and `\`), which also covers absolute and
///   drive-prefixed paths
/// - NUL bytes
/// - Names longer than [`MAX_NAME_LEN`] bytes
pub fn validate_file_name(name: &str) -> Result<(), TransferError> {
    if name.is_empty() {
        return Err(TransferError::InvalidName("empty name".into()));
    }

    if name == "." || name == ".." {
        return Err(TransferError::InvalidName(format!(
            "relative directory not allowed: {name}"
        )));
    }

    if name.len() > MAX_NAME_LEN {
        return Err(TransferError::InvalidName(format!(
            "name too long: {} bytes (max {MAX_NAME_LEN})",
            name.len()
        )));
    }

    if let Some(c) = name.chars().find(|c| matches!(c, '/' | '\\' | '\0')) {
        return Err(TransferError::InvalidName(format!(
            "separator or NUL ({c:?}) not allowed: {name:?}"
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_name() {
        assert!(validate_file_name("").is_err());
    }

    #[test]
    fn rejects_dot_entries() {
        assert!(validate_file_name(".").is_err());
        assert!(validate_file_name("..").is_err());
    }

    #[test]
    fn rejects_parent_dir_traversal() {
        assert!(validate_file_name("../../../etc/passwd").is_err());
    }

    #[test]
    fn rejects_absolute_unix_path() {
        assert!(validate_file_name("/tmp/malicious").is_err());
    }

    #[test]
    fn rejects_windows_paths() {
        assert!(validate_file_name("C:\\Windows\\evil").is_err());
        assert!(validate_file_name("\\\\server\\share").is_err());
    }

    #[test]
    fn rejects_nul_byte() {
        assert!(validate_file_name("file\0.txt").is_err());
    }

    #[test]
    fn rejects_overlong_name() {
        assert!(validate_file_name(&"a".repeat(MAX_NAME_LEN)).is_ok());
        assert!(validate_file_name(&"a".repeat(MAX_NAME_LEN + 1)).is_err());
    }

    #[test]
    fn accepts_simple_filename() {
        assert!(validate_file_name("report.pdf").is_ok());
    }

    #[test]
    fn accepts_dotfile_and_odd_characters() {
        assert!(validate_file_name(".env").is_ok());
        assert!(validate_file_name("a|b c.txt").is_ok());
        assert!(validate_file_name("archive.tar.gz").is_ok());
    }
}
