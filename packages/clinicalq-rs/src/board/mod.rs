// Acquisition board capability
//
// The session engine only talks to hardware through the `Board` trait. New
// boards are added by:
// 1. Implementing the Board trait
// 2. Registering an id for it in `create_board`
//
// Current implementations:
// - Synthetic: deterministic band-shaped generator for tests and demos
// - Cyton: OpenBCI Cyton over a serial port

mod cyton;
mod synthetic;

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use crate::config::BoardConfig;
use crate::error::{Result, SessionError};
use crate::pacing::Ticker;
use crate::types::ChannelData;

pub use cyton::{CytonBoard, PacketParser, CYTON_SAMPLING_RATE};
pub use synthetic::SyntheticBoard;

/// Per-second countdown callback used by blocking epoch reads
pub type TickCallback<'a> = &'a mut (dyn FnMut(u32) + Send);

/// Hardware (or simulated) EEG acquisition device
///
/// The session owns its board exclusively: `start` is always paired with
/// `stop`, including on failure paths.
#[async_trait]
pub trait Board: Send {
    /// Acquire the device and begin streaming
    async fn start(&mut self) -> Result<()>;

    /// Best-effort release. Failures are logged, never returned.
    async fn stop(&mut self);

    /// Discard buffered-but-unread samples
    async fn flush(&mut self) {}

    /// Whether `read_chunk` delivers incremental data suitable for live feedback
    fn supports_streaming(&self) -> bool;

    /// Non-blocking read of recent data. May return fewer samples than
    /// requested, or none at all.
    async fn read_chunk(&mut self, n_samples: usize, label: &str) -> Result<ChannelData>;

    /// Blocking whole-epoch capture. Calls `on_tick(seconds_remaining)` once
    /// per elapsed second.
    async fn read_epoch(
        &mut self,
        seconds: u32,
        label: &str,
        on_tick: TickCallback<'_>,
    ) -> Result<ChannelData>;

    /// Samples per second per channel
    fn sampling_rate(&self) -> u32;

    /// Physically available channel indices (1-based)
    fn eeg_channels(&self) -> Vec<u32>;

    /// Short human-readable name for logs
    fn name(&self) -> &str;
}

/// Board ids accepted in `board.board_id`
pub const SUPPORTED_BOARD_IDS: &[&str] = &[
    "synthetic",
    "synthetic_board",
    "-1",
    "cyton",
    "cyton_board",
    "0",
];

/// Known board families
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoardKind {
    Synthetic,
    Cyton,
}

impl BoardKind {
    /// Resolve a configured board id (name or numeric id)
    pub fn resolve(config: &BoardConfig) -> Result<Self> {
        if config.use_synthetic {
            return Ok(Self::Synthetic);
        }

        let normalized = match &config.board_id {
            Value::String(s) => s.trim().to_lowercase(),
            Value::Number(n) => n.to_string(),
            other => return Err(unsupported_board(other)),
        };

        match normalized.as_str() {
            "synthetic" | "synthetic_board" | "-1" => Ok(Self::Synthetic),
            "cyton" | "cyton_board" | "0" => Ok(Self::Cyton),
            _ => Err(unsupported_board(&config.board_id)),
        }
    }
}

fn unsupported_board(board_id: &Value) -> SessionError {
    SessionError::Configuration(format!(
        "Unsupported board_id value: {} (supported: {})",
        board_id,
        SUPPORTED_BOARD_IDS.join(", ")
    ))
}

/// Factory: build the board described by `config`.
///
/// `sampling_rate` applies to the synthetic board; hardware reports its own.
pub fn create_board(
    config: &BoardConfig,
    sampling_rate: u32,
    ticker: Arc<dyn Ticker>,
) -> Result<Box<dyn Board>> {
    match BoardKind::resolve(config)? {
        BoardKind::Synthetic => {
            let channels = if config.available_channels.is_empty() {
                (1..=8).collect()
            } else {
                config.available_channels.clone()
            };
            Ok(Box::new(SyntheticBoard::new(
                sampling_rate,
                channels,
                config.seed,
                ticker,
            )))
        }
        BoardKind::Cyton => Ok(Box::new(CytonBoard::new(config.serial_port.clone(), ticker))),
    }
}

/// Keep the most recent `n` samples; pad the front with the oldest value when short
pub(crate) fn fit_tail(signal: &[f64], n: usize) -> Vec<f64> {
    if signal.len() >= n {
        return signal[signal.len() - n..].to_vec();
    }
    match signal.first() {
        Some(&first) => {
            let mut out = vec![first; n - signal.len()];
            out.extend_from_slice(signal);
            out
        }
        None => vec![0.0; n],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pacing::InstantTicker;

    #[test]
    fn test_resolve_board_ids() {
        let mut config = BoardConfig::default();
        assert_eq!(BoardKind::resolve(&config).unwrap(), BoardKind::Synthetic);

        config.use_synthetic = false;
        assert_eq!(BoardKind::resolve(&config).unwrap(), BoardKind::Cyton);

        config.board_id = Value::String("Synthetic_Board".to_string());
        assert_eq!(BoardKind::resolve(&config).unwrap(), BoardKind::Synthetic);

        config.board_id = serde_json::json!(0);
        assert_eq!(BoardKind::resolve(&config).unwrap(), BoardKind::Cyton);

        config.board_id = Value::String("ganglion".to_string());
        assert!(BoardKind::resolve(&config).unwrap_err().is_configuration());
    }

    #[test]
    fn test_daisy_and_other_numeric_ids_are_rejected() {
        let mut config = BoardConfig {
            use_synthetic: false,
            ..Default::default()
        };
        for id in [
            serde_json::json!("cyton_daisy"),
            serde_json::json!("cyton_daisy_board"),
            serde_json::json!(2),
            serde_json::json!(38),
            serde_json::json!(null),
        ] {
            config.board_id = id.clone();
            match BoardKind::resolve(&config) {
                Err(SessionError::Configuration(msg)) => {
                    assert!(msg.contains("supported: synthetic, synthetic_board, -1, cyton, cyton_board, 0"), "{}", msg)
                }
                other => panic!("{} resolved to {:?}", id, other),
            }
        }
    }

    #[test]
    fn test_factory_uses_configured_channels() {
        let config = BoardConfig {
            available_channels: vec![1, 2, 3],
            ..Default::default()
        };
        let board = create_board(&config, 200, Arc::new(InstantTicker)).unwrap();
        assert_eq!(board.eeg_channels(), vec![1, 2, 3]);
        assert_eq!(board.sampling_rate(), 200);
        assert!(board.supports_streaming());
    }

    #[test]
    fn test_fit_tail() {
        assert_eq!(fit_tail(&[1.0, 2.0, 3.0, 4.0], 2), vec![3.0, 4.0]);
        assert_eq!(fit_tail(&[5.0, 6.0], 4), vec![5.0, 5.0, 5.0, 6.0]);
        assert_eq!(fit_tail(&[], 3), vec![0.0, 0.0, 0.0]);
    }
}
