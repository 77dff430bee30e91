//! Concurrent attachment monitor
//!
//! Notices arrive on an mpsc channel. Each one runs through the pipeline on
//! its own task, at most `max_concurrent` at a time. A failing or panicking
//! attachment never stops the loop. On shutdown, intake stops and every
//! in-flight attachment is awaited to its terminal outcome.

use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::models::{AttachmentNotice, Outcome};
use crate::pipeline::IngestionPipeline;

/// Default number of attachments processed concurrently
pub const DEFAULT_MAX_CONCURRENT: usize = 4;

/// Totals for one monitor run
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MonitorStats {
    pub received: usize,
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
    pub inserted: usize,
}

impl MonitorStats {
    pub fn record(&mut self, outcome: &Outcome) {
        match outcome {
            Outcome::Success(inserted) => {
                self.succeeded += 1;
                self.inserted += inserted;
            },
            Outcome::Skipped(_) => self.skipped += 1,
            Outcome::Failed { .. } => self.failed += 1,
        }
    }

    fn record_join(&mut self, joined: Result<Outcome, JoinError>) {
        match joined {
            Ok(outcome) => self.record(&outcome),
            Err(e) => {
                error!(error = %e, "Attachment task aborted");
                self.failed += 1;
            },
        }
    }

    /// Attachments that reached a terminal state
    pub fn completed(&self) -> usize {
        self.succeeded + self.skipped + self.failed
    }
}

pub struct Monitor {
    pipeline: Arc<IngestionPipeline>,
    max_concurrent: usize,
}

impl Monitor {
    pub fn new(pipeline: Arc<IngestionPipeline>, max_concurrent: usize) -> Self {
        Self {
            pipeline,
            max_concurrent: max_concurrent.max(1),
        }
    }

    /// Consume notices until the channel closes or `shutdown` fires
    pub async fn run(
        &self,
        mut rx: mpsc::Receiver<AttachmentNotice>,
        shutdown: CancellationToken,
    ) -> MonitorStats {
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let mut tasks: JoinSet<Outcome> = JoinSet::new();
        let mut stats = MonitorStats::default();

        info!(max_concurrent = self.max_concurrent, "Monitor started");

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    info!(
                        in_flight = tasks.len(),
                        "Shutdown requested, draining in-flight attachments"
                    );
                    break;
                },
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    stats.record_join(joined);
                },
                notice = rx.recv() => {
                    let Some(notice) = notice else {
                        info!("Notice channel closed");
                        break;
                    };
                    stats.received += 1;

                    let Ok(permit) = semaphore.clone().acquire_owned().await else {
                        break;
                    };
                    let pipeline = self.pipeline.clone();
                    tasks.spawn(async move {
                        let _permit = permit;
                        pipeline.handle_attachment(notice).await
                    });
                },
            }
        }

        while let Some(joined) = tasks.join_next().await {
            stats.record_join(joined);
        }

        info!(
            received = stats.received,
            succeeded = stats.succeeded,
            skipped = stats.skipped,
            failed = stats.failed,
            inserted = stats.inserted,
            "Monitor stopped"
        );
        stats
    }
}
