use anyhow::{Context, Result};
use rollcall_core::{AttendanceLedger, Config, Directory};
use rollcall_hw::{FeedSource, FrameError, PrecomputedAnalyzer};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

mod operator;
mod scan;

use operator::TerminalOperator;
use scan::{ScanHandle, ScanLoop, ScanSummary, StopReason};

/// How long to wait for the scan thread after a stop request. The loop only
/// sees the request between frames, so a stalled feed can hold it up.
const STOP_GRACE: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = Config::load().context("loading configuration")?;
    tracing::info!(?config, "rollcalld starting");

    let directory = Directory::load(&config.roster_path, &config.enroll_dir)
        .context("loading roster and enrollments")?;
    if directory.gallery.matchable_count() == 0 {
        tracing::warn!("no identity has a usable enrollment; nothing can be matched");
    }

    let source = FeedSource::open(
        &config.feed_path,
        Duration::from_millis(config.frame_interval_ms),
    )
    .with_context(|| format!("opening frame feed {}", config.feed_path.display()))?;

    let ledger = AttendanceLedger::new(&config.ledger_path);
    let directory = Arc::new(directory);
    let operator = Arc::new(TerminalOperator::stdio());
    let threshold = config.match_threshold;

    let ScanHandle { stop, mut done } = scan::spawn(move |stop_rx| {
        ScanLoop::new(
            source,
            PrecomputedAnalyzer,
            directory,
            threshold,
            ledger,
            operator,
            stop_rx,
        )
    })?;

    tracing::info!("rollcalld ready");

    let result = tokio::select! {
        result = &mut done => result,
        signal = tokio::signal::ctrl_c() => {
            signal.context("listening for ctrl-c")?;
            tracing::info!("interrupt received; stopping scan loop");
            let _ = stop.send(true);
            match tokio::time::timeout(STOP_GRACE, done).await {
                Ok(result) => result,
                Err(_) => {
                    tracing::warn!("scan loop did not stop in time; exiting without summary");
                    return Ok(());
                }
            }
        }
    };

    let summary = result.context("scan loop exited without reporting")??;
    report(&summary);

    tracing::info!("rollcalld shutting down");
    match summary.stop {
        StopReason::FrameFailure(FrameError::EndOfStream)
        | StopReason::Stopped
        | StopReason::OperatorQuit => Ok(()),
        StopReason::FrameFailure(err) => Err(err).context("frame acquisition failed"),
    }
}

fn report(summary: &ScanSummary) {
    tracing::info!(
        frames = summary.frames,
        handoffs = summary.handoffs,
        saves = summary.saves,
        stop = ?summary.stop,
        "session summary"
    );
    for batch in &summary.unsaved {
        let marks = batch
            .marks
            .iter()
            .map(|m| format!("{}={}", m.member, if m.present { "P" } else { "-" }))
            .collect::<Vec<_>>()
            .join(", ");
        tracing::error!(
            identity = %batch.identity,
            taken_at = %batch.taken_at,
            marks = %marks,
            "unsaved attendance; re-apply with `rollcall mark`"
        );
    }
}
