//! The JSON config file backing the desired state.
//!
//! On first run the file is created with defaults. External edits are
//! picked up by a filesystem watcher and re-read; interactive geometry
//! changes are written back unless the config's `freeze` flag is set.

use anyhow::{Context, Result};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use marquee::config::{DesiredState, DisplaySpec};

pub struct ConfigFile {
    path: PathBuf,
    current: DesiredState,
}

impl ConfigFile {
    /// Reads the config file, creating it with defaults when missing.
    pub async fn load_or_create(path: &Path) -> Result<Self> {
        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            let defaults = DesiredState::default();
            let mut config = Self {
                path: path.to_path_buf(),
                current: defaults,
            };
            info!("config file {:?} missing, writing defaults", path);
            config.write().await?;
            return Ok(config);
        }

        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read config file {path:?}"))?;
        let current: DesiredState = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse config file {path:?}"))?;
        Ok(Self {
            path: path.to_path_buf(),
            current,
        })
    }

    pub fn current(&self) -> &DesiredState {
        &self.current
    }

    /// Re-reads the file after an external change. Returns the new state
    /// only when it differs from the in-memory copy.
    pub async fn reload(&mut self) -> Result<Option<DesiredState>> {
        let raw = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("failed to read config file {:?}", self.path))?;
        let parsed: DesiredState = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse config file {:?}", self.path))?;
        if parsed == self.current {
            debug!("config file unchanged after reload");
            return Ok(None);
        }
        self.current = parsed.clone();
        Ok(Some(parsed))
    }

    /// Applies an interactively-modified spec and persists it, unless the
    /// config is frozen.
    pub async fn update_display(&mut self, id: &str, spec: DisplaySpec) -> Result<()> {
        self.current.displays.insert(id.to_string(), spec);
        if self.current.freeze {
            debug!("config frozen, not persisting modified spec for \"{id}\"");
            return Ok(());
        }
        self.write().await
    }

    async fn write(&mut self) -> Result<()> {
        debug!("writing config file to {:?}", self.path);
        let raw = serde_json::to_string_pretty(&self.current)?;
        tokio::fs::write(&self.path, raw)
            .await
            .with_context(|| format!("failed to write config file {:?}", self.path))
    }
}

/// Watches the config file's directory and signals when the file changes.
/// The watcher must stay alive for the channel to keep producing.
pub fn watch_config_file(
    path: &Path,
) -> Result<(RecommendedWatcher, mpsc::UnboundedReceiver<()>)> {
    let (tx, rx) = mpsc::unbounded_channel();
    let file_name = path.file_name().map(|name| name.to_os_string());

    let mut watcher = RecommendedWatcher::new(
        move |result: notify::Result<notify::Event>| match result {
            Ok(event) => {
                let relevant = event.paths.iter().any(|changed| {
                    changed.file_name().map(|name| name.to_os_string()) == file_name
                });
                if relevant {
                    let _ = tx.send(());
                }
            }
            Err(err) => warn!("config watcher error: {err}"),
        },
        notify::Config::default(),
    )
    .context("failed to initialize config watcher")?;

    // Watch the parent directory: editors typically replace the file, which
    // would invalidate a watch on the file itself.
    let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
    let watch_root = dir.unwrap_or_else(|| Path::new("."));
    watcher
        .watch(watch_root, RecursiveMode::NonRecursive)
        .with_context(|| format!("failed to watch {watch_root:?}"))?;

    Ok((watcher, rx))
}
