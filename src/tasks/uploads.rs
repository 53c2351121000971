use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use notify::{Event, EventKind, RecursiveMode, Watcher, recommended_watcher};
use tokio::sync::mpsc::{self, Sender};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument};
use walkdir::WalkDir;

use crate::events::ViewerCommand;
use crate::sampler::ImageSource;

/// Quiet period after the last filesystem event before rescanning.
const SETTLE: Duration = Duration::from_millis(300);

#[inline]
fn is_image(p: &Path) -> bool {
    matches!(
        p.extension()
            .and_then(OsStr::to_str)
            .map(|s| s.to_ascii_lowercase()),
        Some(ref e) if ["jpg", "jpeg", "png", "gif", "webp"].contains(&e.as_str())
    )
}

/// Image files directly inside `dir`, sorted by file name.
pub fn scan_uploads(dir: &Path) -> Vec<PathBuf> {
    let mut found: Vec<PathBuf> = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| is_image(p))
        .collect();
    found.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    found
}

/// Uploads task: every settled change to `dir` replaces the gallery image set.
#[instrument(skip(to_viewer, cancel), fields(dir = %dir.display()))]
pub async fn run(
    dir: PathBuf,
    to_viewer: Sender<ViewerCommand>,
    cancel: CancellationToken,
) -> Result<()> {
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create uploads directory {}", dir.display()))?;

    let mut current = scan_uploads(&dir);
    if !current.is_empty() {
        info!(images = current.len(), "using existing uploads");
        send(&to_viewer, &current).await;
    }

    let (watch_tx, mut watch_rx) = mpsc::channel::<notify::Result<Event>>(128);
    let mut watcher = recommended_watcher(move |res| {
        let _ = watch_tx.blocking_send(res);
    })?;
    watcher.watch(&dir, RecursiveMode::NonRecursive)?;
    info!("watching uploads directory");

    let mut dirty = false;
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("cancel received; exiting uploads task");
                break;
            }

            Some(res) = watch_rx.recv() => match res {
                Ok(event) => {
                    debug!(kind = ?event.kind, paths = ?event.paths, "notify event");
                    let relevant = matches!(
                        event.kind,
                        EventKind::Create(_) | EventKind::Remove(_) | EventKind::Modify(_)
                    ) && event.paths.iter().any(|p| is_image(p));
                    dirty |= relevant;
                }
                Err(err) => error!("watch error: {err}"),
            },

            _ = tokio::time::sleep(SETTLE), if dirty => {
                dirty = false;
                let scanned = scan_uploads(&dir);
                if scanned.is_empty() {
                    debug!("uploads directory empty; keeping current gallery");
                } else if scanned != current {
                    info!(images = scanned.len(), "uploads changed; replacing gallery images");
                    send(&to_viewer, &scanned).await;
                    current = scanned;
                }
            }
        }
    }
    Ok(())
}

async fn send(to_viewer: &Sender<ViewerCommand>, paths: &[PathBuf]) {
    let images = paths.iter().cloned().map(ImageSource::Path).collect();
    if to_viewer
        .send(ViewerCommand::SetGalleryImages(images))
        .await
        .is_err()
    {
        debug!("viewer gone; dropping upload update");
    }
}
