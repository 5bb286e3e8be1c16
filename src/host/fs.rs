//! Managed file writes.

use std::fs;
use std::io::{self, Write};
use std::os::unix::fs::{DirBuilderExt, OpenOptionsExt, PermissionsExt};
use std::path::Path;

/// Write `contents` to `path` with `mode` unless the file already holds exactly that.
///
/// Returns whether the file was (re)written. The mode is enforced either way.
pub fn write_if_changed(path: &Path, contents: &str, mode: u32) -> io::Result<bool> {
    let changed = match fs::read_to_string(path) {
        Ok(current) => current != contents,
        Err(e) if e.kind() == io::ErrorKind::NotFound => true,
        Err(e) => return Err(e),
    };
    if !changed {
        tracing::debug!(path = %path.display(), "File unchanged");
        fs::set_permissions(path, fs::Permissions::from_mode(mode))?;
        return Ok(false);
    }

    // New files are created with `mode`; existing ones are narrowed before
    // any new contents land in them.
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(mode)
        .open(path)?;
    file.set_permissions(fs::Permissions::from_mode(mode))?;
    file.write_all(contents.as_bytes())?;
    file.sync_all()?;
    tracing::info!(path = %path.display(), "Rendered file");
    Ok(true)
}

/// Create `path` and its parents, new directories getting `mode`.
pub fn ensure_dir(path: &Path, mode: u32) -> io::Result<()> {
    if path.is_dir() {
        return Ok(());
    }
    fs::DirBuilder::new().recursive(true).mode(mode).create(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_if_changed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("iscsid.conf");

        assert!(write_if_changed(&path, "a = b\n", 0o600).unwrap());
        assert!(!write_if_changed(&path, "a = b\n", 0o600).unwrap());
        assert!(write_if_changed(&path, "a = c\n", 0o600).unwrap());

        let mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
    }

    #[test]
    fn test_rewrite_narrows_loose_mode() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("iscsid.conf");
        fs::write(&path, "old\n").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).unwrap();

        assert!(write_if_changed(&path, "node.session.auth.password = secret\n", 0o600).unwrap());

        let mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "node.session.auth.password = secret\n"
        );
    }

    #[test]
    fn test_created_with_mode() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("initiatorname.iscsi");
        write_if_changed(&path, "InitiatorName=iqn\n", 0o600).unwrap();
        let mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
    }

    #[test]
    fn test_ensure_dir_nested() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("multipath").join("conf.d");
        ensure_dir(&nested, 0o750).unwrap();
        ensure_dir(&nested, 0o750).unwrap();
        assert!(nested.is_dir());
    }
}
