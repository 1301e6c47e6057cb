//! Per-operation scratch directories.
//!
//! Every CA interaction gets its own private directory. Nothing inside
//! it is shared between concurrent operations, and the directory is
//! removed when the [`ScratchWorkspace`] is dropped, whether the
//! operation succeeded, failed, or was cancelled by a timeout.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::error::PkiError;

pub struct ScratchWorkspace {
    dir: TempDir,
}

impl ScratchWorkspace {
    /// Create a fresh directory readable only by the current user.
    pub fn acquire(operation: &str) -> Result<Self, PkiError> {
        let dir = tempfile::Builder::new()
            .prefix(&format!("stepward-{operation}-"))
            .tempdir()?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(dir.path(), fs::Permissions::from_mode(0o700))?;
        }
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Path of `name` inside the workspace. The file need not exist.
    pub fn file(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Write `contents` to `name` with owner-only permissions.
    pub fn write_private(&self, name: &str, contents: &[u8]) -> Result<PathBuf, PkiError> {
        let path = self.file(name);
        let mut options = fs::OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(&path)?;
        file.write_all(contents)?;
        file.flush()?;
        Ok(path)
    }

    /// Read a file the external tool was expected to produce.
    ///
    /// A missing or empty file means the tool reported success without
    /// doing its job; that surfaces as [`PkiError::UnexpectedOutput`].
    pub fn read_output(&self, operation: &'static str, name: &str) -> Result<Vec<u8>, PkiError> {
        let path = self.file(name);
        match fs::read(&path) {
            Ok(bytes) if !bytes.is_empty() => Ok(bytes),
            Ok(_) => Err(PkiError::UnexpectedOutput {
                operation,
                message: format!("{name} was written empty"),
            }),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(PkiError::UnexpectedOutput {
                    operation,
                    message: format!("{name} was not written"),
                })
            }
            Err(err) => Err(PkiError::Workspace(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workspace_is_removed_on_drop() {
        let workspace = ScratchWorkspace::acquire("test").unwrap();
        let path = workspace.path().to_path_buf();
        workspace.write_private("cert.pem", b"data").unwrap();
        assert!(path.exists());

        drop(workspace);
        assert!(!path.exists());
    }

    #[test]
    fn workspaces_never_share_a_directory() {
        let a = ScratchWorkspace::acquire("issue").unwrap();
        let b = ScratchWorkspace::acquire("issue").unwrap();
        assert_ne!(a.path(), b.path());
    }

    #[cfg(unix)]
    #[test]
    fn workspace_and_files_are_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let workspace = ScratchWorkspace::acquire("perm").unwrap();
        let dir_mode = fs::metadata(workspace.path()).unwrap().permissions().mode();
        assert_eq!(dir_mode & 0o777, 0o700);

        let file = workspace.write_private("pw.txt", b"secret").unwrap();
        let file_mode = fs::metadata(file).unwrap().permissions().mode();
        assert_eq!(file_mode & 0o777, 0o600);
    }

    #[test]
    fn missing_output_is_unexpected() {
        let workspace = ScratchWorkspace::acquire("read").unwrap();
        let err = workspace.read_output("issue", "cert.pem").unwrap_err();
        assert!(matches!(err, PkiError::UnexpectedOutput { operation: "issue", .. }));

        workspace.write_private("empty.pem", b"").unwrap();
        let err = workspace.read_output("issue", "empty.pem").unwrap_err();
        assert!(matches!(err, PkiError::UnexpectedOutput { .. }));
    }
}
