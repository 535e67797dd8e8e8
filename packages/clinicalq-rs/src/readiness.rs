// Operator readiness signalling for manual electrode repositioning
//
// Any transport (console, socket, UI button) posts raw lines into an mpsc
// channel; the session waits on the receiving end. Closing the channel counts
// as end-of-input and releases the wait.

use serde::Deserialize;
use tokio::sync::mpsc;

/// Plain-text tokens that resume a manual reposition
pub const READY_TOKENS: &[&str] = &["ready", "r", "ok", "next"];

/// Structured readiness command: `{"command": "ready", "next_location": "Cz"}`
#[derive(Debug, Clone, Deserialize)]
struct ReadyCommand {
    command: Option<String>,
    #[serde(default)]
    next_location: Option<String>,
}

/// Classification of one readiness line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadinessSignal {
    /// Bare ready token
    Ready,
    /// Structured ready command, optionally naming the site it is meant for
    ReadyFor(Option<String>),
    /// Empty, unparseable or unrelated input
    Ignored,
}

impl ReadinessSignal {
    pub fn parse(line: &str) -> Self {
        let text = line.trim();
        if text.is_empty() {
            return Self::Ignored;
        }

        let lowered = text.to_lowercase();
        if READY_TOKENS.contains(&lowered.as_str()) {
            return Self::Ready;
        }

        match serde_json::from_str::<ReadyCommand>(text) {
            Ok(cmd) if cmd.command.as_deref() == Some("ready") => Self::ReadyFor(cmd.next_location),
            _ => Self::Ignored,
        }
    }

    /// Whether this signal releases the wait for `pending_location`
    pub fn resumes(&self, pending_location: &str) -> bool {
        match self {
            Self::Ready => true,
            Self::ReadyFor(None) => true,
            Self::ReadyFor(Some(loc)) => loc.is_empty() || loc == pending_location,
            Self::Ignored => false,
        }
    }
}

/// How a manual reposition wait ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyOutcome {
    Ready,
    InputClosed,
}

/// Block until a line on `rx` resumes `next_location`, or the channel closes.
///
/// There is no timeout.
pub async fn wait_for_ready(rx: &mut mpsc::Receiver<String>, next_location: &str) -> ReadyOutcome {
    while let Some(line) = rx.recv().await {
        let signal = ReadinessSignal::parse(&line);
        if signal.resumes(next_location) {
            log::info!("Operator ready for {}", next_location);
            return ReadyOutcome::Ready;
        }
        log::debug!("Ignoring readiness input {:?} while waiting for {}", line.trim(), next_location);
    }
    log::warn!("Readiness input closed while waiting for {}", next_location);
    ReadyOutcome::InputClosed
}
