// Single-epoch capture
//
// Streaming boards are read one chunk per second and feed live sliding-window
// features; other boards are read in one blocking call. Either way every
// channel ends up with exactly `seconds * sampling_rate` samples before the
// final feature extraction, and a site whose channel yields nothing is left
// out of the epoch.

use std::collections::{BTreeMap, BTreeSet};

use crate::bands::extract_features;
use crate::board::Board;
use crate::error::Result;
use crate::events::{EventSink, SessionEvent};
use crate::pacing::{Ticker, ONE_SECOND};
use crate::types::{ChannelData, ChannelMap, EpochCapture, EpochSpec};

/// Truncate to `target`, or pad the end by repeating the last sample.
/// An empty signal becomes `target` zeros.
pub fn fit_to_length(mut signal: Vec<f64>, target: usize) -> Vec<f64> {
    match signal.last().copied() {
        None => vec![0.0; target],
        Some(_) if signal.len() >= target => {
            signal.truncate(target);
            signal
        }
        Some(last) => {
            signal.resize(target, last);
            signal
        }
    }
}

/// Live feedback settings for streaming capture
#[derive(Debug, Clone, Copy)]
pub(crate) struct LiveFeedback {
    pub enabled: bool,
    pub window_seconds: f64,
}

/// Borrowed session resources needed to capture one epoch
pub(crate) struct EpochCapturer<'a> {
    pub board: &'a mut dyn Board,
    pub sink: &'a dyn EventSink,
    pub ticker: &'a dyn Ticker,
    pub channels: &'a ChannelMap,
    pub live: LiveFeedback,
}

impl EpochCapturer<'_> {
    pub async fn capture(
        &mut self,
        sequence: &str,
        spec: &EpochSpec,
        locations: &[String],
    ) -> Result<EpochCapture> {
        self.sink.emit(&SessionEvent::EpochStart {
            sequence: sequence.to_string(),
            index: spec.index,
            label: spec.label.clone(),
            instruction: spec.instruction.clone(),
            seconds: spec.seconds,
            locations: locations.to_vec(),
        });

        let sites: Vec<(&str, u32)> = locations
            .iter()
            .filter_map(|loc| self.channels.get(loc).map(|&ch| (loc.as_str(), ch)))
            .collect();
        let needed: BTreeSet<u32> = sites.iter().map(|&(_, ch)| ch).collect();

        let data = if self.live.enabled && self.board.supports_streaming() {
            self.capture_streaming(sequence, spec, &sites, &needed).await?
        } else {
            self.capture_block(sequence, spec, &needed).await?
        };

        let sampling_rate = self.board.sampling_rate();
        let features: BTreeMap<String, _> = sites
            .iter()
            .filter_map(|&(loc, ch)| {
                data.get(&ch)
                    .map(|signal| (loc.to_string(), extract_features(signal, sampling_rate)))
            })
            .collect();

        self.sink.emit(&SessionEvent::EpochComplete {
            sequence: sequence.to_string(),
            index: spec.index,
            label: spec.label.clone(),
            captured_locations: features.keys().cloned().collect(),
        });

        Ok(EpochCapture {
            sequence: sequence.to_string(),
            index: spec.index,
            label: spec.label.clone(),
            instruction: spec.instruction.clone(),
            seconds: spec.seconds,
            features,
        })
    }

    fn emit_tick(sink: &dyn EventSink, sequence: &str, spec: &EpochSpec, seconds_remaining: u32) {
        sink.emit(&SessionEvent::EpochTick {
            sequence: sequence.to_string(),
            index: spec.index,
            label: spec.label.clone(),
            seconds_remaining,
        });
    }

    async fn capture_streaming(
        &mut self,
        sequence: &str,
        spec: &EpochSpec,
        sites: &[(&str, u32)],
        needed: &BTreeSet<u32>,
    ) -> Result<ChannelData> {
        self.board.flush().await;

        let rate = self.board.sampling_rate();
        let chunk_samples = rate as usize;
        let target = spec.seconds as usize * chunk_samples;
        let window = ((self.live.window_seconds * f64::from(rate)) as usize).max(1);

        let mut buffers: ChannelData = needed
            .iter()
            .map(|&ch| (ch, Vec::with_capacity(target)))
            .collect();

        for sec in 0..spec.seconds {
            self.ticker.sleep(ONE_SECOND).await;
            let seconds_remaining = spec.seconds - sec - 1;

            let chunk = self.board.read_chunk(chunk_samples, &spec.label).await?;
            for (ch, buffer) in buffers.iter_mut() {
                if let Some(samples) = chunk.get(ch) {
                    buffer.extend_from_slice(samples);
                }
            }
            log::debug!(
                "{} #{} second {}: {} channels delivered",
                sequence,
                spec.index,
                sec + 1,
                chunk.len()
            );

            Self::emit_tick(self.sink, sequence, spec, seconds_remaining);

            let live: BTreeMap<String, _> = sites
                .iter()
                .filter_map(|&(loc, ch)| {
                    let buffer = buffers.get(&ch).filter(|b| !b.is_empty())?;
                    let start = buffer.len().saturating_sub(window);
                    Some((loc.to_string(), extract_features(&buffer[start..], rate)))
                })
                .collect();

            if !live.is_empty() {
                self.sink.emit(&SessionEvent::Bandpower {
                    sequence: sequence.to_string(),
                    index: spec.index,
                    label: spec.label.clone(),
                    seconds_elapsed: sec + 1,
                    seconds_remaining,
                    window_seconds: self.live.window_seconds,
                    features: live,
                });
            }
        }

        // Channels the board neither reports nor delivered stay absent, as in a block read
        let reported: BTreeSet<u32> = self.board.eeg_channels().into_iter().collect();
        Ok(buffers
            .into_iter()
            .filter(|(ch, buffer)| {
                let keep = !buffer.is_empty() || reported.contains(ch);
                if !keep {
                    log::warn!("Board returned no data for channel {}", ch);
                }
                keep
            })
            .map(|(ch, buffer)| {
                if buffer.len() != target {
                    log::warn!(
                        "Channel {} delivered {} of {} samples, fitting to length",
                        ch,
                        buffer.len(),
                        target
                    );
                }
                (ch, fit_to_length(buffer, target))
            })
            .collect())
    }

    async fn capture_block(
        &mut self,
        sequence: &str,
        spec: &EpochSpec,
        needed: &BTreeSet<u32>,
    ) -> Result<ChannelData> {
        let sink = self.sink;
        let mut on_tick = |seconds_remaining: u32| Self::emit_tick(sink, sequence, spec, seconds_remaining);
        let mut data = self
            .board
            .read_epoch(spec.seconds, &spec.label, &mut on_tick)
            .await?;

        let target = spec.seconds as usize * self.board.sampling_rate() as usize;
        let mut fitted = ChannelData::new();
        for &ch in needed {
            match data.remove(&ch) {
                Some(signal) => {
                    fitted.insert(ch, fit_to_length(signal, target));
                }
                None => log::warn!("Board returned no data for channel {}", ch),
            }
        }
        Ok(fitted)
    }
}
