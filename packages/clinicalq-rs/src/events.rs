// Session event stream
//
// The orchestrator reports progress as a flat, ordered stream of events with a
// string discriminator (`"event"`). Consumers plug in through `EventSink`;
// several sinks compose by wrapping them in a `FanoutSink`.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::types::{AcquisitionMode, FeatureVector, RepositionPolicy};

/// Events emitted during a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    SessionStart {
        mode: AcquisitionMode,
    },
    BoardReady {
        sampling_rate: u32,
        eeg_channels: Vec<u32>,
    },
    SequenceStart {
        sequence: String,
        locations: Vec<String>,
        total_epochs: usize,
    },
    EpochStart {
        sequence: String,
        index: u32,
        label: String,
        instruction: String,
        seconds: u32,
        locations: Vec<String>,
    },
    EpochTick {
        sequence: String,
        index: u32,
        label: String,
        seconds_remaining: u32,
    },
    /// Live sliding-window features, streaming capture only
    Bandpower {
        sequence: String,
        index: u32,
        label: String,
        seconds_elapsed: u32,
        seconds_remaining: u32,
        window_seconds: f64,
        features: BTreeMap<String, FeatureVector>,
    },
    EpochComplete {
        sequence: String,
        index: u32,
        label: String,
        captured_locations: Vec<String>,
    },
    RepositionStart {
        next_location: String,
        mode: RepositionPolicy,
        seconds: Option<u32>,
        message: String,
    },
    RepositionTick {
        seconds_remaining: u32,
        next_location: String,
    },
    RepositionComplete {
        next_location: String,
        mode: RepositionPolicy,
    },
    RepositionInputEof {
        next_location: String,
    },
    SequenceComplete {
        sequence: String,
    },
    BoardStopped,
    AnalysisComplete {
        metrics: usize,
        out_of_range: usize,
    },
    SessionComplete {
        output_path: String,
    },
    Error {
        message: String,
    },
}

impl SessionEvent {
    /// Discriminator as it appears on the wire
    pub fn name(&self) -> &'static str {
        match self {
            SessionEvent::SessionStart { .. } => "session_start",
            SessionEvent::BoardReady { .. } => "board_ready",
            SessionEvent::SequenceStart { .. } => "sequence_start",
            SessionEvent::EpochStart { .. } => "epoch_start",
            SessionEvent::EpochTick { .. } => "epoch_tick",
            SessionEvent::Bandpower { .. } => "bandpower",
            SessionEvent::EpochComplete { .. } => "epoch_complete",
            SessionEvent::RepositionStart { .. } => "reposition_start",
            SessionEvent::RepositionTick { .. } => "reposition_tick",
            SessionEvent::RepositionComplete { .. } => "reposition_complete",
            SessionEvent::RepositionInputEof { .. } => "reposition_input_eof",
            SessionEvent::SequenceComplete { .. } => "sequence_complete",
            SessionEvent::BoardStopped => "board_stopped",
            SessionEvent::AnalysisComplete { .. } => "analysis_complete",
            SessionEvent::SessionComplete { .. } => "session_complete",
            SessionEvent::Error { .. } => "error",
        }
    }
}

/// Consumer of session events
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &SessionEvent);
}

impl<S: EventSink + ?Sized> EventSink for Arc<S> {
    fn emit(&self, event: &SessionEvent) {
        (**self).emit(event)
    }
}

/// Writes one JSON object per line and flushes after each event
pub struct JsonLinesSink<W: Write + Send> {
    writer: Mutex<W>,
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

impl JsonLinesSink<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write + Send> EventSink for JsonLinesSink<W> {
    fn emit(&self, event: &SessionEvent) {
        let line = match serde_json::to_string(event) {
            Ok(line) => line,
            Err(e) => {
                log::error!("Failed to serialize {} event: {}", event.name(), e);
                return;
            }
        };
        let mut writer = self.writer.lock();
        if let Err(e) = writeln!(writer, "{}", line).and_then(|_| writer.flush()) {
            log::warn!("Failed to write {} event: {}", event.name(), e);
        }
    }
}

/// Forwards events into an unbounded channel (e.g. for a UI task)
pub struct ChannelSink {
    sender: mpsc::UnboundedSender<SessionEvent>,
}

impl ChannelSink {
    pub fn new(sender: mpsc::UnboundedSender<SessionEvent>) -> Self {
        Self { sender }
    }

    /// Sink plus the receiving end of its channel
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: &SessionEvent) {
        if self.sender.send(event.clone()).is_err() {
            log::debug!("Event receiver dropped, {} not delivered", event.name());
        }
    }
}

/// Mirrors events into the `log` facade
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl EventSink for LogSink {
    fn emit(&self, event: &SessionEvent) {
        match event {
            SessionEvent::EpochTick { .. } | SessionEvent::Bandpower { .. } => {
                log::debug!("{:?}", event)
            }
            SessionEvent::Error { message } => log::error!("Session error: {}", message),
            _ => log::info!("{:?}", event),
        }
    }
}

/// Wraps a closure as a sink
pub struct CallbackSink<F>
where
    F: Fn(&SessionEvent) + Send + Sync,
{
    callback: F,
}

impl<F> CallbackSink<F>
where
    F: Fn(&SessionEvent) + Send + Sync,
{
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

impl<F> EventSink for CallbackSink<F>
where
    F: Fn(&SessionEvent) + Send + Sync,
{
    fn emit(&self, event: &SessionEvent) {
        (self.callback)(event)
    }
}

/// Delivers every event to each wrapped sink, in order
#[derive(Default)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl EventSink for FanoutSink {
    fn emit(&self, event: &SessionEvent) {
        for sink in &self.sinks {
            sink.emit(event);
        }
    }
}

/// Keeps every event in memory
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<SessionEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<SessionEvent> {
        self.events.lock().clone()
    }

    /// Event discriminators in emission order
    pub fn names(&self) -> Vec<&'static str> {
        self.events.lock().iter().map(SessionEvent::name).collect()
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: &SessionEvent) {
        self.events.lock().push(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_serialize_flat_with_discriminator() {
        let event = SessionEvent::EpochTick {
            sequence: "MASTER".to_string(),
            index: 3,
            label: "EC".to_string(),
            seconds_remaining: 7,
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event"], "epoch_tick");
        assert_eq!(value["sequence"], "MASTER");
        assert_eq!(value["seconds_remaining"], 7);
    }

    #[test]
    fn test_unit_and_null_fields() {
        let value = serde_json::to_value(SessionEvent::BoardStopped).unwrap();
        assert_eq!(value, serde_json::json!({"event": "board_stopped"}));

        let value = serde_json::to_value(SessionEvent::RepositionStart {
            next_location: "Cz".to_string(),
            mode: RepositionPolicy::Manual,
            seconds: None,
            message: "Move".to_string(),
        })
        .unwrap();
        assert_eq!(value["mode"], "manual");
        assert!(value["seconds"].is_null());
    }

    #[test]
    fn test_name_matches_wire_tag() {
        let events = vec![
            SessionEvent::SessionStart {
                mode: AcquisitionMode::Sequential,
            },
            SessionEvent::RepositionInputEof {
                next_location: "F3".to_string(),
            },
            SessionEvent::AnalysisComplete {
                metrics: 3,
                out_of_range: 1,
            },
        ];
        for event in events {
            let value = serde_json::to_value(&event).unwrap();
            assert_eq!(value["event"], event.name());
        }
    }

    #[test]
    fn test_json_lines_sink_writes_one_line_per_event() {
        let sink = JsonLinesSink::new(Vec::new());
        sink.emit(&SessionEvent::BoardStopped);
        sink.emit(&SessionEvent::SequenceComplete {
            sequence: "O1".to_string(),
        });
        let out = String::from_utf8(sink.into_inner()).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 2);
        let parsed: SessionEvent = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(
            parsed,
            SessionEvent::SequenceComplete {
                sequence: "O1".to_string()
            }
        );
    }

    #[test]
    fn test_fanout_reaches_every_sink() {
        let first = Arc::new(RecordingSink::new());
        let second = Arc::new(RecordingSink::new());
        let fanout = FanoutSink::new()
            .with(first.clone())
            .with(second.clone());
        fanout.emit(&SessionEvent::BoardStopped);
        assert_eq!(first.names(), vec!["board_stopped"]);
        assert_eq!(second.names(), vec!["board_stopped"]);
    }

    #[tokio::test]
    async fn test_channel_sink_forwards() {
        let (sink, mut rx) = ChannelSink::channel();
        sink.emit(&SessionEvent::BoardStopped);
        assert_eq!(rx.recv().await, Some(SessionEvent::BoardStopped));
    }

    #[test]
    fn test_callback_sink() {
        let seen = Arc::new(Mutex::new(0usize));
        let counter = seen.clone();
        let sink = CallbackSink::new(move |_e: &SessionEvent| *counter.lock() += 1);
        sink.emit(&SessionEvent::BoardStopped);
        sink.emit(&SessionEvent::BoardStopped);
        assert_eq!(*seen.lock(), 2);
    }
}
