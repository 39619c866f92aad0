use log::{debug, error, info, warn};
use std::io::BufRead;
use streamer_core::StreamId;
use tokio::task::JoinSet;
use tokio_graceful_shutdown::SubsystemHandle;
use tokio_util::sync::CancellationToken;

use crate::resolver::ResolvedStream;

use super::{EndReason, ReplayError, ReplayReport, ReplayWorker, WorkerOptions};

/// What one worker came back with
pub type WorkerOutcome = (StreamId, Result<ReplayReport, ReplayError>);

/// Totals over all workers of a run
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReplaySummary {
    pub completed: usize,
    pub cancelled: usize,
    pub failed: usize,
    pub records_sent: u64,
}

impl ReplaySummary {
    pub fn from_outcomes(outcomes: &[WorkerOutcome]) -> Self {
        let mut summary = ReplaySummary::default();
        for (_, result) in outcomes {
            match result {
                Ok(report) => {
                    summary.records_sent += report.records_sent;
                    match report.end {
                        EndReason::EndOfFile => summary.completed += 1,
                        EndReason::Cancelled => summary.cancelled += 1,
                    }
                }
                Err(_) => summary.failed += 1,
            }
        }
        summary
    }
}

/// Runs one [`ReplayWorker`] per stream, all at once.
pub struct ReplayCoordinator {
    streams: Vec<ResolvedStream>,
    options: WorkerOptions,
}

impl ReplayCoordinator {
    pub fn new(streams: Vec<ResolvedStream>, options: WorkerOptions) -> Self {
        Self { streams, options }
    }

    /// Spawn every worker and wait for all of them.
    ///
    /// Each worker gets a child of `cancel`, so cancelling it stops them all.
    /// Outcomes are returned in completion order.
    pub async fn run(self, cancel: CancellationToken) -> Vec<WorkerOutcome> {
        let mut set = JoinSet::new();
        for stream in self.streams {
            let worker = ReplayWorker::new(stream.path, stream.descriptor, self.options.clone());
            let id = worker.stream_id().clone();
            let token = cancel.child_token();
            set.spawn(async move { (id, worker.run(token).await) });
        }
        debug!("Started {} replay workers", set.len());

        let mut outcomes = Vec::with_capacity(set.len());
        while let Some(join_result) = set.join_next().await {
            match join_result {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => error!("Replay task failed: {}", e),
            }
        }
        outcomes
    }

    /// Run as a subsystem: stop on a shutdown request (or Enter, if
    /// `prompt` is set) and request shutdown once every stream is done.
    pub async fn run_subsystem(
        self,
        subsys: SubsystemHandle,
        prompt: bool,
    ) -> Result<(), ReplayError> {
        let cancel = subsys.create_cancellation_token();
        if prompt {
            watch_stdin(cancel.clone());
        }

        let outcomes = self.run(cancel).await;
        let summary = ReplaySummary::from_outcomes(&outcomes);
        info!(
            "Replay finished: {} completed, {} cancelled, {} failed, {} records sent",
            summary.completed, summary.cancelled, summary.failed, summary.records_sent
        );

        subsys.request_shutdown();
        Ok(())
    }
}

/// Cancel `cancel` when a line is entered on stdin.
///
/// Runs on a plain thread: a blocking stdin read must not hold up runtime
/// shutdown. End of input leaves the replay running.
fn watch_stdin(cancel: CancellationToken) {
    println!("Press enter to cancel streaming");
    let spawned = std::thread::Builder::new()
        .name("stdin".to_string())
        .spawn(move || {
            let mut line = String::new();
            match std::io::stdin().lock().read_line(&mut line) {
                Ok(0) => debug!("stdin closed, Enter will not cancel streaming"),
                Ok(_) => {
                    info!("Cancelling streams");
                    cancel.cancel();
                }
                Err(e) => debug!("Cannot read stdin: {}", e),
            }
        });
    if let Err(e) = spawned {
        warn!("Cannot watch stdin: {}", e);
    }
}
