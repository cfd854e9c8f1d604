//! Common test utilities for `mnu` integration tests.

#![allow(dead_code)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use mnu_core::state::StateDir;

/// Create a temporary directory together with a state directory inside it.
///
/// The directory is removed when the returned `TempDir` is dropped.
pub fn temp_state() -> (tempfile::TempDir, StateDir) {
    let temp = tempfile::tempdir().expect("Failed to create temp directory");
    let state = StateDir::at(temp.path().join("state")).expect("Failed to create state dir");
    (temp, state)
}

/// Write an executable shell script.
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("Failed to write script");
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
        .expect("Failed to make script executable");
    path
}

/// Poll `condition` until it holds or `timeout` elapses.
pub fn wait_for(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    condition()
}
