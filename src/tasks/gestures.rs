use std::path::PathBuf;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::select;
use tokio::sync::mpsc::Sender;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::config::GestureThresholds;
use crate::events::ViewerCommand;
use crate::gesture::{self, HandFrame};

/// Where landmark frames come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GestureFeed {
    Stdin,
    File(PathBuf),
}

impl GestureFeed {
    /// `-` selects stdin, anything else is a file path.
    pub fn parse(raw: &str) -> Self {
        if raw == "-" {
            Self::Stdin
        } else {
            Self::File(PathBuf::from(raw))
        }
    }
}

/// Gesture feed task: one JSON object per line, each a [`HandFrame`].
///
/// Every frame is classified and forwarded to the viewer. Malformed lines are
/// logged and skipped.
#[instrument(skip_all, fields(feed = ?feed))]
pub async fn run(
    feed: GestureFeed,
    thresholds: GestureThresholds,
    to_viewer: Sender<ViewerCommand>,
    cancel: CancellationToken,
) -> Result<()> {
    match &feed {
        GestureFeed::Stdin => {
            let reader = BufReader::new(tokio::io::stdin());
            pump(reader, thresholds, to_viewer, cancel).await
        }
        GestureFeed::File(path) => {
            let file = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("failed to open gesture feed {}", path.display()))?;
            pump(BufReader::new(file), thresholds, to_viewer, cancel).await
        }
    }
}

async fn pump<R>(
    reader: R,
    thresholds: GestureThresholds,
    to_viewer: Sender<ViewerCommand>,
    cancel: CancellationToken,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut frames = 0usize;
    loop {
        let line = select! {
            _ = cancel.cancelled() => break,
            line = lines.next_line() => line.context("failed to read gesture feed")?,
        };
        let Some(line) = line else {
            info!(frames, "gesture feed ended");
            break;
        };
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let frame: HandFrame = match serde_json::from_str(line) {
            Ok(frame) => frame,
            Err(err) => {
                warn!(error = %err, "skipping malformed gesture frame");
                continue;
            }
        };
        if let Some(wait) = frame.after {
            select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(wait) => {}
            }
        }
        let reading = gesture::classify(&frame.hands, &thresholds);
        debug!(hands = frame.hands.len(), state = %reading.state, "gesture classified");
        frames += 1;
        if to_viewer.send(ViewerCommand::Gesture(reading)).await.is_err() {
            debug!("viewer gone; stopping gesture feed");
            break;
        }
    }
    Ok(())
}
