// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@mitander.dev>

use crate::domain::error::AppError;
use std::path::{Path, PathBuf};

const DATA_DIR_ENV: &str = "DATA_DIR";

fn non_empty(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
}

fn absolute(path: PathBuf) -> PathBuf {
    if path.is_absolute() {
        return path;
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(&path))
        .unwrap_or(path)
}

/// `../data` next to the installed binary.
fn beside_executable() -> Option<PathBuf> {
    let exe = std::env::current_exe().ok()?;
    Some(absolute(exe.parent()?.join("..").join("data")))
}

/// Where asset graphs, market snapshots and request files live.
///
/// Precedence: an explicit directory (config `data_dir`), then `DATA_DIR`, then
/// `../data` beside the binary when it exists, then `./data`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DataDir {
    configured: Option<PathBuf>,
}

impl DataDir {
    pub fn new(explicit: Option<&str>) -> Self {
        let configured = non_empty(explicit)
            .or_else(|| non_empty(std::env::var(DATA_DIR_ENV).ok().as_deref()))
            .map(|dir| absolute(PathBuf::from(dir)));
        Self { configured }
    }

    pub fn root(&self) -> PathBuf {
        if let Some(dir) = &self.configured {
            return dir.clone();
        }
        match beside_executable() {
            Some(dir) if dir.exists() => dir,
            _ => absolute(PathBuf::from("data")),
        }
    }

    /// Absolute form of `raw`. Relative paths may carry a leading `data/`, which
    /// is dropped when joining onto a configured root.
    pub fn locate(&self, raw: &str) -> PathBuf {
        let path = Path::new(raw.trim());
        if path.is_absolute() {
            return path.to_path_buf();
        }
        let inner = path.strip_prefix("data").unwrap_or(path);
        if let Some(dir) = &self.configured {
            return dir.join(inner);
        }
        if let Some(candidate) = beside_executable().map(|dir| dir.join(inner))
            && candidate.exists()
        {
            return candidate;
        }
        absolute(path.to_path_buf())
    }

    /// Like [`DataDir::locate`], but the file must exist.
    pub fn require(&self, raw: &str, what: &str) -> Result<PathBuf, AppError> {
        let located = self.locate(raw);
        if located.exists() {
            return Ok(located);
        }
        Err(AppError::Config(format!(
            "{what} not found at {}; set DATA_DIR or an absolute path",
            located.display()
        )))
    }
}
