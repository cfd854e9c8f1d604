//! Per-user state directory.
//!
//! Every cross-process artifact (clearer pointer file, cancellation FIFOs,
//! lock files, the advertisement socket and the config file) lives in one
//! directory private to the current user:
//!
//! | Source | Path |
//! |--------|------|
//! | `MNU_STATE_DIR` | value of the variable |
//! | default | `~/.config/mnu` |

use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::error::{Error, Result};

/// Environment variable overriding the state directory.
pub const STATE_DIR_ENV: &str = "MNU_STATE_DIR";

/// Name of the pointer file naming the current clearer token.
pub const POINTER_FILE_NAME: &str = "clipboard_clearer.id";

/// Name of the advertisement socket.
pub const ADVERTISE_SOCKET_NAME: &str = "serve.sock";

/// Name of the configuration file.
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Handle to the per-user state directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateDir {
    root: PathBuf,
}

impl StateDir {
    /// Resolve the default state directory and create it if missing.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StateDir`] if no home directory can be found or the
    /// directory cannot be created.
    pub fn resolve() -> Result<Self> {
        let root = match std::env::var_os(STATE_DIR_ENV) {
            Some(dir) if !dir.is_empty() => PathBuf::from(dir),
            _ => directories::BaseDirs::new()
                .map(|dirs| dirs.home_dir().join(".config").join("mnu"))
                .ok_or_else(|| Error::StateDir("no home directory for current user".into()))?,
        };
        Self::at(root)
    }

    /// Use `root` as the state directory, creating it with owner-only access.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StateDir`] if the directory cannot be created.
    pub fn at(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        create_private_dir(&root)
            .map_err(|e| Error::StateDir(format!("{}: {e}", root.display())))?;
        Ok(Self { root })
    }

    /// Directory path.
    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Path of the clearer pointer file.
    pub fn pointer_file(&self) -> PathBuf {
        self.root.join(POINTER_FILE_NAME)
    }

    /// Path of the cancellation FIFO owned by the clearer with `token`.
    pub fn clearer_fifo(&self, token: &Uuid) -> PathBuf {
        self.root.join(format!("clipboard_clearer_{token}.fifo"))
    }

    /// Path of the advertisement socket.
    pub fn advertise_socket(&self) -> PathBuf {
        self.root.join(ADVERTISE_SOCKET_NAME)
    }

    /// Path of a named lock file.
    pub fn lock_file(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// Path of the configuration file.
    pub fn config_file(&self) -> PathBuf {
        self.root.join(CONFIG_FILE_NAME)
    }
}

fn create_private_dir(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;

    std::fs::DirBuilder::new()
        .recursive(true)
        .mode(0o700)
        .create(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_are_inside_root() {
        let temp = tempfile::tempdir().unwrap();
        let state = StateDir::at(temp.path().join("nested/mnu")).unwrap();

        assert!(state.path().is_dir());
        assert_eq!(
            state.pointer_file(),
            temp.path().join("nested/mnu/clipboard_clearer.id")
        );
        assert!(state.advertise_socket().ends_with("serve.sock"));
        assert!(state.lock_file("mnu.lock").starts_with(state.path()));
    }

    #[test]
    fn test_fifo_name_embeds_token() {
        let temp = tempfile::tempdir().unwrap();
        let state = StateDir::at(temp.path()).unwrap();
        let token = Uuid::new_v4();

        let fifo = state.clearer_fifo(&token);
        assert_eq!(
            fifo.file_name().unwrap().to_string_lossy(),
            format!("clipboard_clearer_{token}.fifo")
        );
    }

    #[test]
    fn test_dir_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let temp = tempfile::tempdir().unwrap();
        let state = StateDir::at(temp.path().join("private")).unwrap();
        let mode = std::fs::metadata(state.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o700);
    }
}
