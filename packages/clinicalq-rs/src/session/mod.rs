//! Session orchestration
//!
//! `SessionOrchestrator` owns the board for the whole session and walks the
//! validated [`SessionPlan`]:
//!
//! ```text
//! Idle -> BoardStarting -> Capturing{mode} -> BoardStopping -> Done
//!  |              \______________|______________/
//!  |                              -> BoardStopping -> Failed
//!  \-> Failed   (plan rejected; the board is never touched)
//! ```
//!
//! The board is stopped on every path once `start` has been attempted.
//! Validation failures go straight from `Idle` to `Failed` without
//! `BoardStarting` or `BoardStopping`.

mod capture;
mod plan;
mod reposition;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::analysis::{AnalysisReport, ClinicalAnalyzer, SessionAnalyzer, SessionResult};
use crate::board::{create_board, Board};
use crate::config::SessionConfig;
use crate::error::Result;
use crate::events::{EventSink, SessionEvent};
use crate::pacing::{ticker_for, Ticker};
use crate::types::{AcquisitionMode, EpochCapture, SessionRecord};

use capture::{EpochCapturer, LiveFeedback};
use reposition::Repositioner;

pub use capture::fit_to_length;
pub use plan::{SequencePlan, SessionPlan};

/// Lifecycle of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    BoardStarting,
    Capturing { mode: AcquisitionMode },
    BoardStopping,
    Done,
    Failed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Idle => f.write_str("idle"),
            SessionState::BoardStarting => f.write_str("board_starting"),
            SessionState::Capturing { mode } => write!(f, "capturing ({})", mode),
            SessionState::BoardStopping => f.write_str("board_stopping"),
            SessionState::Done => f.write_str("done"),
            SessionState::Failed => f.write_str("failed"),
        }
    }
}

/// Captured record plus the analyzer's verdict
#[derive(Debug, Clone)]
pub struct SessionOutcome {
    pub record: SessionRecord,
    pub report: AnalysisReport,
}

impl SessionOutcome {
    pub fn into_result(self) -> SessionResult {
        SessionResult::new(self.record, self.report)
    }
}

pub struct SessionOrchestrator {
    board: Box<dyn Board>,
    sink: Arc<dyn EventSink>,
    ticker: Arc<dyn Ticker>,
    analyzer: Arc<dyn SessionAnalyzer>,
    readiness: Option<mpsc::Receiver<String>>,
    state: SessionState,
}

impl SessionOrchestrator {
    pub fn new(board: Box<dyn Board>, sink: Arc<dyn EventSink>, ticker: Arc<dyn Ticker>) -> Self {
        Self {
            board,
            sink,
            ticker,
            analyzer: Arc::new(ClinicalAnalyzer),
            readiness: None,
            state: SessionState::Idle,
        }
    }

    /// Orchestrator with the board and pacing described by `config`
    pub fn from_config(config: &SessionConfig, sink: Arc<dyn EventSink>) -> Result<Self> {
        let ticker = ticker_for(config.fast_mode);
        let board = create_board(&config.board, config.sampling_rate, ticker.clone())?;
        Ok(Self::new(board, sink, ticker))
    }

    /// Channel the operator posts readiness lines into during manual repositioning
    pub fn with_readiness(mut self, readiness: mpsc::Receiver<String>) -> Self {
        self.readiness = Some(readiness);
        self
    }

    pub fn with_analyzer(mut self, analyzer: Arc<dyn SessionAnalyzer>) -> Self {
        self.analyzer = analyzer;
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    fn transition(&mut self, next: SessionState) {
        log::info!("Session state: {} -> {}", self.state, next);
        self.state = next;
    }

    /// Run a full session. Configuration problems are reported before the
    /// board is started; capture failures are reported after it is stopped.
    pub async fn run(&mut self, config: &SessionConfig) -> Result<SessionOutcome> {
        let plan = match SessionPlan::from_config(config) {
            Ok(plan) => plan,
            Err(e) => {
                log::error!("Rejected session config: {}", e);
                self.transition(SessionState::Failed);
                return Err(e);
            }
        };

        self.sink.emit(&SessionEvent::SessionStart { mode: plan.mode });

        self.transition(SessionState::BoardStarting);
        let captured = self.acquire(&plan).await;

        self.transition(SessionState::BoardStopping);
        self.board.stop().await;
        self.sink.emit(&SessionEvent::BoardStopped);

        let epochs = match captured {
            Ok(epochs) => epochs,
            Err(e) => {
                log::error!("Session failed: {}", e);
                self.transition(SessionState::Failed);
                return Err(e);
            }
        };

        let record = SessionRecord {
            mode: plan.mode,
            sampling_rate: self.board.sampling_rate(),
            epoch_seconds: plan.epoch_seconds,
            channels: plan.channels.clone(),
            epochs,
        };

        let report = self.analyzer.analyze(&record);
        self.sink.emit(&SessionEvent::AnalysisComplete {
            metrics: report.metrics.len(),
            out_of_range: report.summary.out_of_range,
        });

        self.transition(SessionState::Done);
        Ok(SessionOutcome { record, report })
    }

    /// Start the board and capture every planned sequence
    async fn acquire(&mut self, plan: &SessionPlan) -> Result<Vec<EpochCapture>> {
        self.board.start().await?;

        let eeg_channels = self.board.eeg_channels();
        self.sink.emit(&SessionEvent::BoardReady {
            sampling_rate: self.board.sampling_rate(),
            eeg_channels: eeg_channels.clone(),
        });
        log::info!(
            "Board {} ready: {} Hz, channels {:?}",
            self.board.name(),
            self.board.sampling_rate(),
            eeg_channels
        );
        for (site, ch) in &plan.channels {
            if !eeg_channels.contains(ch) {
                log::warn!("{} is mapped to channel {}, which the board does not report", site, ch);
            }
        }

        self.transition(SessionState::Capturing { mode: plan.mode });

        let repositioner = Repositioner {
            sink: self.sink.as_ref(),
            ticker: self.ticker.as_ref(),
            policy: plan.reposition,
            countdown_seconds: plan.reposition_seconds,
        };
        let mut capturer = EpochCapturer {
            board: self.board.as_mut(),
            sink: self.sink.as_ref(),
            ticker: self.ticker.as_ref(),
            channels: &plan.channels,
            live: LiveFeedback {
                enabled: plan.live_bandpower,
                window_seconds: plan.live_window_seconds,
            },
        };

        let mut epochs = Vec::with_capacity(plan.total_epochs());
        for (position, sequence) in plan.sequences.iter().enumerate() {
            if plan.mode == AcquisitionMode::Sequential && position > 0 {
                repositioner
                    .run(&sequence.name, self.readiness.as_mut())
                    .await;
            }

            self.sink.emit(&SessionEvent::SequenceStart {
                sequence: sequence.name.clone(),
                locations: sequence.locations.clone(),
                total_epochs: sequence.epochs.len(),
            });

            for spec in &sequence.epochs {
                let capture = capturer
                    .capture(&sequence.name, spec, &sequence.locations)
                    .await?;
                epochs.push(capture);
            }

            self.sink.emit(&SessionEvent::SequenceComplete {
                sequence: sequence.name.clone(),
            });
        }

        Ok(epochs)
    }
}
