use crate::operator::{Answer, Operator};
use chrono::{DateTime, Utc};
use rollcall_core::{
    AttendanceLedger, Directory, EuclideanMatcher, LedgerError, Mark, MatchOutcome, Matcher,
    SessionController,
};
use rollcall_hw::{FaceAnalyzer, Frame, FrameError, FrameSource};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("failed to spawn {0} thread: {1}")]
    Spawn(&'static str, #[source] std::io::Error),
}

/// Messages background tasks send to the scan loop.
#[derive(Debug)]
pub enum SessionEvent {
    /// The operator answered the scan prompt.
    ScanAnswer(bool),
    /// The record flow for a locked identity finished.
    RecordsTaken(RecordOutcome),
    /// The operator asked to shut down.
    Quit,
}

#[derive(Debug)]
pub struct RecordOutcome {
    pub identity: String,
    pub marks: Vec<Mark>,
    pub taken_at: DateTime<Utc>,
    pub status: RecordStatus,
}

#[derive(Debug)]
pub enum RecordStatus {
    Saved { rows: usize },
    SaveFailed(LedgerError),
    PromptFailed(std::io::Error),
}

/// Marks that could not be written; kept so the operator can re-apply them.
#[derive(Debug, Clone)]
pub struct UnsavedBatch {
    pub identity: String,
    pub marks: Vec<Mark>,
    pub taken_at: DateTime<Utc>,
}

#[derive(Debug)]
pub enum StopReason {
    /// Stop signal (Ctrl-C) observed.
    Stopped,
    /// Operator answered "quit" at a prompt.
    OperatorQuit,
    /// Frame acquisition failed or the stream ended.
    FrameFailure(FrameError),
}

#[derive(Debug)]
pub struct ScanSummary {
    pub frames: u64,
    pub handoffs: u64,
    pub saves: u64,
    pub unsaved: Vec<UnsavedBatch>,
    pub stop: StopReason,
}

/// Frame-by-frame scanning driven by the session state machine.
///
/// The loop thread is the only owner of [`SessionController`]. Prompts and
/// record flows run on detached threads and report back over `events`.
pub struct ScanLoop<S, A> {
    source: S,
    analyzer: A,
    directory: Arc<Directory>,
    threshold: f32,
    ledger: AttendanceLedger,
    operator: Arc<dyn Operator>,
    session: SessionController,
    events_tx: mpsc::UnboundedSender<SessionEvent>,
    events_rx: mpsc::UnboundedReceiver<SessionEvent>,
    stop: watch::Receiver<bool>,
    frames: u64,
    handoffs: u64,
    saves: u64,
    unsaved: Vec<UnsavedBatch>,
}

impl<S: FrameSource, A: FaceAnalyzer> ScanLoop<S, A> {
    pub fn new(
        source: S,
        analyzer: A,
        directory: Arc<Directory>,
        threshold: f32,
        ledger: AttendanceLedger,
        operator: Arc<dyn Operator>,
        stop: watch::Receiver<bool>,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            source,
            analyzer,
            directory,
            threshold,
            ledger,
            operator,
            session: SessionController::new(),
            events_tx,
            events_rx,
            stop,
            frames: 0,
            handoffs: 0,
            saves: 0,
            unsaved: Vec::new(),
        }
    }

    /// Run until stopped, quit, or the frame source fails.
    pub fn run(mut self) -> Result<ScanSummary, ScanError> {
        self.spawn_prompt()?;

        let stop = loop {
            if *self.stop.borrow() {
                break StopReason::Stopped;
            }
            if let Some(reason) = self.drain_events()? {
                break reason;
            }

            let frame = match self.source.next_frame() {
                Ok(frame) => frame,
                Err(err) => break StopReason::FrameFailure(err),
            };
            self.frames += 1;

            if self.session.is_armed() {
                self.match_frame(&frame)?;
            }
        };

        // Record outcomes that landed while the last frame was being read still
        // count; no new prompt is spawned once the loop has stopped.
        while let Ok(event) = self.events_rx.try_recv() {
            if let SessionEvent::RecordsTaken(outcome) = event {
                self.complete_record(outcome);
            }
        }
        if let Some(identity) = self.session.pending_identity() {
            tracing::warn!(identity, "stopping with attendance still open; it will not be saved");
        }

        Ok(ScanSummary {
            frames: self.frames,
            handoffs: self.handoffs,
            saves: self.saves,
            unsaved: self.unsaved,
            stop,
        })
    }

    /// Apply every pending event without blocking.
    fn drain_events(&mut self) -> Result<Option<StopReason>, ScanError> {
        while let Ok(event) = self.events_rx.try_recv() {
            match event {
                SessionEvent::ScanAnswer(armed) => {
                    tracing::info!(armed, "operator answered scan prompt");
                    if let Err(err) = self.session.answer(armed) {
                        tracing::warn!(error = %err, "scan answer rejected");
                    }
                }
                SessionEvent::RecordsTaken(outcome) => {
                    if self.complete_record(outcome) {
                        self.spawn_prompt()?;
                    }
                }
                SessionEvent::Quit => return Ok(Some(StopReason::OperatorQuit)),
            }
        }
        Ok(None)
    }

    /// Account for a finished record flow and unlock the session. Returns
    /// false if no identity was locked.
    fn complete_record(&mut self, outcome: RecordOutcome) -> bool {
        self.finish_record(outcome);
        match self.session.release() {
            Ok(_) => true,
            Err(err) => {
                tracing::warn!(error = %err, "record outcome without a locked session");
                false
            }
        }
    }

    fn finish_record(&mut self, outcome: RecordOutcome) {
        let RecordOutcome {
            identity,
            marks,
            taken_at,
            status,
        } = outcome;
        match status {
            RecordStatus::Saved { rows } => {
                self.saves += 1;
                tracing::info!(identity = %identity, rows, taken_at = %taken_at, "attendance updated");
            }
            RecordStatus::SaveFailed(err) => {
                tracing::error!(
                    identity = %identity,
                    error = %err,
                    "attendance not saved; keeping marks in memory"
                );
                self.unsaved.push(UnsavedBatch {
                    identity,
                    marks,
                    taken_at,
                });
            }
            RecordStatus::PromptFailed(err) => {
                tracing::warn!(identity = %identity, error = %err, "attendance prompt failed; nothing recorded");
            }
        }
    }

    /// Match each face in the frame; hand off at most once.
    fn match_frame(&mut self, frame: &Frame) -> Result<(), ScanError> {
        let embeddings = match self.analyzer.embeddings(frame) {
            Ok(embeddings) => embeddings,
            Err(err) => {
                tracing::warn!(seq = frame.sequence, error = %err, "face analysis failed; skipping frame");
                return Ok(());
            }
        };

        for embedding in &embeddings {
            let outcome =
                EuclideanMatcher.compare(embedding, self.directory.gallery.identities(), self.threshold);
            match outcome {
                MatchOutcome::Accepted {
                    identity, distance, ..
                } => {
                    if !self.session.lock(&identity) {
                        return Ok(());
                    }
                    self.handoffs += 1;
                    tracing::info!(identity = %identity, distance, seq = frame.sequence, "detected");
                    self.spawn_record(identity)?;
                    return Ok(());
                }
                MatchOutcome::NoMatch { nearest } => {
                    tracing::trace!(seq = frame.sequence, ?nearest, "no match");
                }
            }
        }
        Ok(())
    }

    /// Ask the operator whether to scan, on a fresh detached thread.
    fn spawn_prompt(&self) -> Result<(), ScanError> {
        let operator = Arc::clone(&self.operator);
        let tx = self.events_tx.clone();
        std::thread::Builder::new()
            .name("rollcall-prompt".into())
            .spawn(move || {
                let event = match operator.ask_scan() {
                    Answer::Yes => SessionEvent::ScanAnswer(true),
                    Answer::No => SessionEvent::ScanAnswer(false),
                    Answer::Quit => SessionEvent::Quit,
                };
                // The loop may be gone already; a late answer is dropped.
                let _ = tx.send(event);
            })
            .map_err(|e| ScanError::Spawn("prompt", e))?;
        Ok(())
    }

    /// Take attendance for `identity` and save it, on a detached thread.
    fn spawn_record(&self, identity: String) -> Result<(), ScanError> {
        let operator = Arc::clone(&self.operator);
        let ledger = self.ledger.clone();
        let members = self.directory.members.members_of(&identity).to_vec();
        let tx = self.events_tx.clone();
        std::thread::Builder::new()
            .name("rollcall-record".into())
            .spawn(move || {
                let taken_at = Utc::now();
                let (marks, status) = match operator.take_attendance(&identity, &members) {
                    Ok(marks) => {
                        let status = match ledger.upsert(&identity, &marks) {
                            Ok(table) => RecordStatus::Saved { rows: table.len() },
                            Err(err) => RecordStatus::SaveFailed(err),
                        };
                        (marks, status)
                    }
                    Err(err) => (Vec::new(), RecordStatus::PromptFailed(err)),
                };
                let _ = tx.send(SessionEvent::RecordsTaken(RecordOutcome {
                    identity,
                    marks,
                    taken_at,
                    status,
                }));
            })
            .map_err(|e| ScanError::Spawn("record", e))?;
        Ok(())
    }
}

/// Handle to a scan loop running on its own thread.
pub struct ScanHandle {
    pub stop: watch::Sender<bool>,
    pub done: oneshot::Receiver<Result<ScanSummary, ScanError>>,
}

/// Spawn the scan loop on a dedicated OS thread.
pub fn spawn<S, A, F>(build: F) -> Result<ScanHandle, ScanError>
where
    S: FrameSource + Send + 'static,
    A: FaceAnalyzer + Send + 'static,
    F: FnOnce(watch::Receiver<bool>) -> ScanLoop<S, A>,
{
    let (stop_tx, stop_rx) = watch::channel(false);
    let (done_tx, done_rx) = oneshot::channel();
    let scan = build(stop_rx);

    std::thread::Builder::new()
        .name("rollcall-scan".into())
        .spawn(move || {
            tracing::info!("scan loop started");
            let result = scan.run();
            tracing::info!("scan loop exiting");
            let _ = done_tx.send(result);
        })
        .map_err(|e| ScanError::Spawn("scan", e))?;

    Ok(ScanHandle {
        stop: stop_tx,
        done: done_rx,
    })
}
