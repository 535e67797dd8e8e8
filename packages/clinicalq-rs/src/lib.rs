pub mod analysis;
pub mod bands;
pub mod board;
pub mod config;
pub mod error;
pub mod events;
pub mod pacing;
pub mod protocol;
pub mod readiness;
pub mod session;
pub mod types;

pub use analysis::{AnalysisReport, ClinicalAnalyzer, MetricResult, MetricStatus, SessionAnalyzer, SessionResult};
pub use bands::{band_amplitude, extract_features, peak_alpha_frequency, Band};
pub use board::{create_board, Board, CytonBoard, SyntheticBoard};
pub use config::{BoardConfig, SessionConfig};
pub use error::{Result, SessionError};
pub use events::{EventSink, SessionEvent};
pub use pacing::{InstantTicker, RealTimeTicker, Ticker};
pub use session::{SessionOrchestrator, SessionOutcome, SessionPlan, SessionState};
pub use types::*;
