//! Attachment notifications
//!
//! An [`AttachmentSource`] pushes [`AttachmentNotice`]s into the monitor's
//! channel until it runs dry, the channel closes, or shutdown is requested.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::models::{AttachmentNotice, MessageId};

#[async_trait]
pub trait AttachmentSource: Send {
    /// Announce attachments on `tx` until done or `shutdown` fires
    async fn run(
        self: Box<Self>,
        tx: mpsc::Sender<AttachmentNotice>,
        shutdown: CancellationToken,
    ) -> std::io::Result<()>;
}

/// Polls `<inbox>/<message_id>/<filename>` and announces each file once
/// while it stays in the inbox.
///
/// Pair it with [`SpoolFetcher::consuming`](crate::fetch::SpoolFetcher::consuming)
/// so fetched files leave the inbox; a file that disappears is forgotten and
/// announced again if it is spooled anew.
#[derive(Debug)]
pub struct SpoolWatcher {
    inbox: PathBuf,
    interval: Duration,
    seen: HashSet<AttachmentNotice>,
}

impl SpoolWatcher {
    pub fn new(inbox: impl Into<PathBuf>, interval: Duration) -> Self {
        Self {
            inbox: inbox.into(),
            interval,
            seen: HashSet::new(),
        }
    }

    fn is_settled(name: &str) -> bool {
        !name.starts_with('.') && !name.ends_with(".part")
    }

    async fn list_dir(dir: &Path, want_dirs: bool) -> std::io::Result<Vec<String>> {
        let mut names = Vec::new();
        let mut entries = tokio::fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() != want_dirs {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if Self::is_settled(name) {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    /// Notices for files that appeared since the previous scan
    pub async fn scan(&mut self) -> std::io::Result<Vec<AttachmentNotice>> {
        let mut present = HashSet::new();
        let mut fresh = Vec::new();
        for message_dir in Self::list_dir(&self.inbox, true).await? {
            let files = match Self::list_dir(&self.inbox.join(&message_dir), false).await {
                Ok(files) => files,
                Err(e) => {
                    warn!(
                        message_id = %message_dir,
                        error = %e,
                        "Skipping unreadable message directory"
                    );
                    continue;
                },
            };
            for filename in files {
                let notice = AttachmentNotice::new(message_dir.as_str(), filename);
                if self.seen.insert(notice.clone()) {
                    fresh.push(notice.clone());
                }
                present.insert(notice);
            }
        }
        self.seen.retain(|notice| present.contains(notice));
        Ok(fresh)
    }
}

#[async_trait]
impl AttachmentSource for SpoolWatcher {
    async fn run(
        self: Box<Self>,
        tx: mpsc::Sender<AttachmentNotice>,
        shutdown: CancellationToken,
    ) -> std::io::Result<()> {
        let mut watcher = *self;
        info!(
            inbox = %watcher.inbox.display(),
            interval = ?watcher.interval,
            "Watching spool directory"
        );

        let mut ticker = tokio::time::interval(watcher.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {},
            }

            let notices = match watcher.scan().await {
                Ok(notices) => notices,
                Err(e) => {
                    warn!(inbox = %watcher.inbox.display(), error = %e, "Spool scan failed");
                    continue;
                },
            };

            for notice in notices {
                debug!(
                    message_id = %notice.message_id,
                    filename = %notice.filename,
                    "New spooled attachment"
                );
                if tx.send(notice).await.is_err() {
                    return Ok(());
                }
            }
        }

        Ok(())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum WireId {
    Text(String),
    Number(i64),
}

#[derive(Deserialize)]
struct WireNotice {
    message_id: WireId,
    filename: String,
}

impl From<WireNotice> for AttachmentNotice {
    fn from(wire: WireNotice) -> Self {
        let message_id = match wire.message_id {
            WireId::Text(id) => MessageId::from(id),
            WireId::Number(id) => MessageId::from(id),
        };
        AttachmentNotice::new(message_id, wire.filename)
    }
}

/// Parse one `{"message_id": .., "filename": ..}` line
pub fn parse_notice(line: &str) -> Result<AttachmentNotice, serde_json::Error> {
    serde_json::from_str::<WireNotice>(line).map(AttachmentNotice::from)
}

/// Newline-delimited JSON notices from any async reader
pub struct JsonLinesSource<R> {
    reader: R,
}

impl<R> JsonLinesSource<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    pub fn new(reader: R) -> Self {
        Self { reader }
    }
}

#[async_trait]
impl<R> AttachmentSource for JsonLinesSource<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    async fn run(
        self: Box<Self>,
        tx: mpsc::Sender<AttachmentNotice>,
        shutdown: CancellationToken,
    ) -> std::io::Result<()> {
        let mut lines = self.reader.lines();
        loop {
            let line = tokio::select! {
                _ = shutdown.cancelled() => break,
                line = lines.next_line() => line?,
            };
            let Some(line) = line else {
                debug!("Notice stream closed");
                break;
            };
            if line.trim().is_empty() {
                continue;
            }
            match parse_notice(&line) {
                Ok(notice) => {
                    if tx.send(notice).await.is_err() {
                        break;
                    }
                },
                Err(e) => warn!(error = %e, "Ignoring malformed notice line"),
            }
        }
        Ok(())
    }
}
