// Deterministic synthetic EEG board
//
// Generates band-shaped sinusoids plus Gaussian noise with a condition-
// dependent gain profile. Every channel owns a seeded RNG, so the stream a
// channel produces is the same whether it is read in one block or in
// one-second chunks.

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;
use std::f64::consts::PI;
use std::sync::Arc;

use super::{Board, TickCallback};
use crate::error::Result;
use crate::pacing::{Ticker, ONE_SECOND};
use crate::types::ChannelData;

const NOISE_SIGMA: f64 = 0.9;

/// Component amplitudes for one behavioural condition
#[derive(Debug, Clone, Copy, PartialEq)]
struct ConditionGains {
    theta: f64,
    alpha: f64,
    beta: f64,
    hibeta: f64,
    delta: f64,
}

impl ConditionGains {
    fn for_label(label: &str) -> Self {
        let eyes_closed = matches!(label, "EC" | "FRONTAL_EC");
        let mut gains = Self {
            theta: 5.0,
            alpha: if eyes_closed { 8.0 } else { 4.5 },
            beta: 3.4,
            hibeta: 1.4,
            delta: 0.8,
        };

        match label {
            "READ" | "COUNT" => {
                gains.theta += 1.3;
                gains.beta -= 0.7;
            }
            "OMNI" => gains.theta -= 0.8,
            "TEST" | "HARMONIC" => {
                gains.alpha += 0.6;
                gains.beta += 0.3;
            }
            _ => {}
        }
        gains
    }
}

pub struct SyntheticBoard {
    sampling_rate: u32,
    channels: Vec<u32>,
    rngs: BTreeMap<u32, StdRng>,
    sample_cursor: u64,
    ticker: Arc<dyn Ticker>,
}

impl SyntheticBoard {
    pub fn new(sampling_rate: u32, channels: Vec<u32>, seed: u64, ticker: Arc<dyn Ticker>) -> Self {
        let mut channels = channels;
        channels.sort_unstable();
        channels.dedup();

        let rngs = channels
            .iter()
            .map(|&ch| {
                let channel_seed = seed ^ u64::from(ch).wrapping_mul(0x9E37_79B9_7F4A_7C15);
                (ch, StdRng::seed_from_u64(channel_seed))
            })
            .collect();

        Self {
            sampling_rate,
            channels,
            rngs,
            sample_cursor: 0,
            ticker,
        }
    }

    fn generate(&mut self, n_samples: usize, label: &str) -> ChannelData {
        let gains = ConditionGains::for_label(label);
        let rate = f64::from(self.sampling_rate);
        let cursor = self.sample_cursor;

        let mut data = ChannelData::new();
        for &ch in &self.channels {
            let Some(rng) = self.rngs.get_mut(&ch) else {
                continue;
            };
            let phase = f64::from(ch);
            let ch_factor = 1.0 + f64::from(ch % 5) * 0.04;

            let samples = (0..n_samples)
                .map(|i| {
                    let t = (cursor + i as u64) as f64 / rate;
                    let theta = gains.theta * (2.0 * PI * 5.2 * t + phase * 0.31).sin();
                    let alpha = gains.alpha * (2.0 * PI * 10.1 * t + phase * 0.22).sin();
                    let beta = gains.beta * (2.0 * PI * 20.4 * t + phase * 0.47).sin();
                    let hibeta = gains.hibeta * (2.0 * PI * 33.0 * t + phase * 0.61).sin();
                    let delta = gains.delta * (2.0 * PI * 2.0 * t + phase * 0.09).sin();
                    let noise = gaussian(rng) * NOISE_SIGMA;
                    ch_factor * (theta + alpha + beta + hibeta + delta + noise)
                })
                .collect();
            data.insert(ch, samples);
        }

        self.sample_cursor += n_samples as u64;
        data
    }
}

/// Standard normal draw (Box-Muller)
fn gaussian(rng: &mut StdRng) -> f64 {
    let u1: f64 = 1.0 - rng.random::<f64>();
    let u2: f64 = rng.random::<f64>();
    (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
}

#[async_trait]
impl Board for SyntheticBoard {
    async fn start(&mut self) -> Result<()> {
        log::info!(
            "Synthetic board ready: {} channels @ {} Hz",
            self.channels.len(),
            self.sampling_rate
        );
        Ok(())
    }

    async fn stop(&mut self) {
        log::info!("Synthetic board stopped");
    }

    fn supports_streaming(&self) -> bool {
        true
    }

    async fn read_chunk(&mut self, n_samples: usize, label: &str) -> Result<ChannelData> {
        if n_samples == 0 {
            return Ok(ChannelData::new());
        }
        Ok(self.generate(n_samples, label))
    }

    async fn read_epoch(
        &mut self,
        seconds: u32,
        label: &str,
        on_tick: TickCallback<'_>,
    ) -> Result<ChannelData> {
        let seconds = seconds.max(1);
        for sec in 0..seconds {
            self.ticker.sleep(ONE_SECOND).await;
            on_tick(seconds - sec - 1);
        }
        let n_samples = seconds as usize * self.sampling_rate as usize;
        Ok(self.generate(n_samples, label))
    }

    fn sampling_rate(&self) -> u32 {
        self.sampling_rate
    }

    fn eeg_channels(&self) -> Vec<u32> {
        self.channels.clone()
    }

    fn name(&self) -> &str {
        "synthetic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bands::extract_features;
    use crate::pacing::InstantTicker;

    fn board(seed: u64) -> SyntheticBoard {
        SyntheticBoard::new(250, vec![3, 1, 2, 2], seed, Arc::new(InstantTicker))
    }

    #[test]
    fn test_channels_are_sorted_and_unique() {
        assert_eq!(board(1).eeg_channels(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_chunked_reads_match_block_read() {
        let mut chunked = board(42);
        let mut block = board(42);

        let mut joined: Vec<f64> = Vec::new();
        for _ in 0..3 {
            let chunk = chunked.read_chunk(250, "EO").await.unwrap();
            joined.extend(&chunk[&2]);
        }

        let mut ticks = Vec::new();
        let whole = block
            .read_epoch(3, "EO", &mut |s: u32| ticks.push(s))
            .await
            .unwrap();

        assert_eq!(ticks, vec![2, 1, 0]);
        assert_eq!(whole[&2].len(), 750);
        for (a, b) in joined.iter().zip(whole[&2].iter()) {
            assert!((a - b).abs() < 1e-12);
        }
    }

    #[tokio::test]
    async fn test_eyes_closed_raises_alpha() {
        let mut b = board(7);
        let eo = b.read_chunk(2500, "EO").await.unwrap();
        let ec = b.read_chunk(2500, "EC").await.unwrap();
        let eo_alpha = extract_features(&eo[&1], 250).alpha;
        let ec_alpha = extract_features(&ec[&1], 250).alpha;
        assert!(ec_alpha > eo_alpha * 1.4, "EO {} EC {}", eo_alpha, ec_alpha);
    }

    #[tokio::test]
    async fn test_zero_sample_chunk_is_empty() {
        assert!(board(1).read_chunk(0, "EO").await.unwrap().is_empty());
    }

    #[test]
    fn test_gain_profile() {
        let read = ConditionGains::for_label("READ");
        let eo = ConditionGains::for_label("EO");
        assert!(read.theta > eo.theta);
        assert!(read.beta < eo.beta);
        assert!(ConditionGains::for_label("OMNI").theta < eo.theta);
        assert!(ConditionGains::for_label("FRONTAL_EC").alpha > eo.alpha);
    }
}
