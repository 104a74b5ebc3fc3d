use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

/// Persisted id of the newest message already forwarded.
pub trait CursorStore: Send + Sync {
    /// Never fails: an unreadable value counts as a fresh start (0).
    fn load(&self) -> u64;

    fn save(&self, id: u64) -> Result<()>;
}

/// Cursor kept as a decimal string in a small text file.
#[derive(Debug, Clone)]
pub struct FileCursorStore {
    path: PathBuf,
}

impl FileCursorStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "cursor".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl CursorStore for FileCursorStore {
    fn load(&self) -> u64 {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No previous messages tracked, starting fresh");
                return 0;
            }
            Err(e) => {
                warn!(
                    "Failed to read cursor file {}: {}; starting from 0",
                    self.path.display(),
                    e
                );
                return 0;
            }
        };

        match content.trim().parse::<u64>() {
            Ok(id) => {
                info!("Last processed message ID: {}", id);
                id
            }
            Err(_) => {
                warn!(
                    "Cursor file {} holds {:?}, not a message id; starting from 0",
                    self.path.display(),
                    content.trim()
                );
                0
            }
        }
    }

    fn save(&self, id: u64) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        // Write-then-rename: a crash leaves either the old file or the new one.
        let tmp = self.temp_path();
        {
            let mut file = std::fs::File::create(&tmp)
                .with_context(|| format!("Failed to create {}", tmp.display()))?;
            file.write_all(id.to_string().as_bytes())
                .with_context(|| format!("Failed to write {}", tmp.display()))?;
            file.sync_all()
                .with_context(|| format!("Failed to sync {}", tmp.display()))?;
        }
        std::fs::rename(&tmp, &self.path).with_context(|| {
            format!(
                "Failed to move {} over {}",
                tmp.display(),
                self.path.display()
            )
        })?;

        debug!("Cursor saved to {}: {}", self.path.display(), id);
        Ok(())
    }
}
