// OpenBCI Cyton board over a serial port
//
// The Cyton streams fixed 33-byte binary packets at 250 Hz once it receives
// the `b` command:
//
//   [0]      0xA0 header
//   [1]      sample counter
//   [2..26]  8 channels, 24-bit big-endian two's complement
//   [26..32] auxiliary data (ignored)
//   [32]     0xC0..=0xCF footer
//
// A background task parses packets into a drop-oldest ring; reads drain it.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::task::JoinHandle;
use tokio_serial::{SerialPortBuilderExt, SerialStream};

use super::{fit_tail, Board, TickCallback};
use crate::error::{Result, SessionError};
use crate::pacing::{Ticker, ONE_SECOND};
use crate::types::ChannelData;

pub const CYTON_SAMPLING_RATE: u32 = 250;
const CYTON_CHANNELS: usize = 8;
const BAUD_RATE: u32 = 115_200;
const PACKET_LEN: usize = 33;
const HEADER: u8 = 0xA0;
/// Two minutes of samples
const RING_CAPACITY: usize = CYTON_SAMPLING_RATE as usize * 120;

/// Microvolts per count at gain 24
fn scale_uv() -> f64 {
    4.5 / 24.0 / ((1u32 << 23) - 1) as f64 * 1e6
}

type Frame = [f64; CYTON_CHANNELS];

/// Incremental Cyton packet decoder
#[derive(Debug, Default)]
pub struct PacketParser {
    pending: Vec<u8>,
    dropped_bytes: usize,
}

impl PacketParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes; returns every complete frame, in microvolts
    pub fn push(&mut self, bytes: &[u8]) -> Vec<Frame> {
        self.pending.extend_from_slice(bytes);
        let mut frames = Vec::new();
        let mut pos = 0;

        while self.pending.len() - pos >= PACKET_LEN {
            let packet = &self.pending[pos..pos + PACKET_LEN];
            if packet[0] == HEADER && packet[PACKET_LEN - 1] & 0xF0 == 0xC0 {
                frames.push(decode_channels(packet));
                pos += PACKET_LEN;
            } else {
                // Resync one byte at a time
                pos += 1;
                self.dropped_bytes += 1;
            }
        }

        self.pending.drain(..pos);
        frames
    }

    /// Bytes discarded while searching for a packet boundary
    pub fn dropped_bytes(&self) -> usize {
        self.dropped_bytes
    }
}

fn decode_channels(packet: &[u8]) -> Frame {
    let scale = scale_uv();
    let mut frame = [0.0; CYTON_CHANNELS];
    for (ch, value) in frame.iter_mut().enumerate() {
        let offset = 2 + ch * 3;
        let raw = (i32::from(packet[offset]) << 16)
            | (i32::from(packet[offset + 1]) << 8)
            | i32::from(packet[offset + 2]);
        // Sign-extend from 24 bits
        let signed = (raw << 8) >> 8;
        *value = f64::from(signed) * scale;
    }
    frame
}

/// Bounded sample ring shared with the reader task
#[derive(Debug)]
struct SampleRing {
    frames: VecDeque<Frame>,
    capacity: usize,
}

impl SampleRing {
    fn new(capacity: usize) -> Self {
        Self {
            frames: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    fn extend(&mut self, frames: Vec<Frame>) {
        for frame in frames {
            if self.frames.len() == self.capacity {
                self.frames.pop_front();
            }
            self.frames.push_back(frame);
        }
    }

    fn clear(&mut self) {
        self.frames.clear();
    }

    /// Take everything buffered, one Vec per 1-based channel
    fn drain(&mut self) -> ChannelData {
        let mut data = ChannelData::new();
        if self.frames.is_empty() {
            return data;
        }
        for ch in 0..CYTON_CHANNELS {
            data.insert(ch as u32 + 1, self.frames.iter().map(|f| f[ch]).collect());
        }
        self.frames.clear();
        data
    }
}

pub struct CytonBoard {
    port: String,
    ticker: Arc<dyn Ticker>,
    ring: Arc<Mutex<SampleRing>>,
    writer: Option<WriteHalf<SerialStream>>,
    reader_task: Option<JoinHandle<()>>,
}

impl CytonBoard {
    pub fn new(port: String, ticker: Arc<dyn Ticker>) -> Self {
        Self {
            port,
            ticker,
            ring: Arc::new(Mutex::new(SampleRing::new(RING_CAPACITY))),
            writer: None,
            reader_task: None,
        }
    }

    async fn send_command(&mut self, command: &[u8]) -> std::io::Result<()> {
        if let Some(writer) = self.writer.as_mut() {
            writer.write_all(command).await?;
            writer.flush().await?;
        }
        Ok(())
    }

    fn spawn_reader(mut reader: ReadHalf<SerialStream>, ring: Arc<Mutex<SampleRing>>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut parser = PacketParser::new();
            let mut buf = [0u8; 1024];
            loop {
                match reader.read(&mut buf).await {
                    Ok(0) => {
                        log::warn!("Serial port closed unexpectedly");
                        break;
                    }
                    Ok(n) => {
                        let frames = parser.push(&buf[..n]);
                        if !frames.is_empty() {
                            ring.lock().extend(frames);
                        }
                    }
                    Err(e) => {
                        log::error!("Serial read error: {}", e);
                        break;
                    }
                }
            }
            log::debug!(
                "Cyton reader exiting, {} bytes dropped during resync",
                parser.dropped_bytes()
            );
        })
    }
}

#[async_trait]
impl Board for CytonBoard {
    async fn start(&mut self) -> Result<()> {
        log::info!("Opening Cyton on {} at {} baud", self.port, BAUD_RATE);

        let stream = tokio_serial::new(&self.port, BAUD_RATE)
            .open_native_async()
            .map_err(|e| {
                SessionError::HardwareUnavailable(format!(
                    "Failed to open serial port {}: {}",
                    self.port, e
                ))
            })?;

        let (reader, writer) = tokio::io::split(stream);
        self.writer = Some(writer);
        self.reader_task = Some(Self::spawn_reader(reader, self.ring.clone()));

        self.send_command(b"b").await.map_err(|e| {
            SessionError::HardwareUnavailable(format!("Failed to start Cyton stream: {}", e))
        })?;

        // Let the stream settle, then discard the startup burst
        self.ticker.sleep(ONE_SECOND).await;
        self.ring.lock().clear();

        log::info!("Cyton streaming on {}", self.port);
        Ok(())
    }

    async fn stop(&mut self) {
        if let Err(e) = self.send_command(b"s").await {
            log::warn!("Failed to send stop command to Cyton: {}", e);
        }
        if let Some(task) = self.reader_task.take() {
            task.abort();
        }
        self.writer = None;
        log::info!("Cyton released");
    }

    async fn flush(&mut self) {
        self.ring.lock().clear();
    }

    fn supports_streaming(&self) -> bool {
        true
    }

    async fn read_chunk(&mut self, _n_samples: usize, _label: &str) -> Result<ChannelData> {
        Ok(self.ring.lock().drain())
    }

    async fn read_epoch(
        &mut self,
        seconds: u32,
        _label: &str,
        on_tick: TickCallback<'_>,
    ) -> Result<ChannelData> {
        let seconds = seconds.max(1);
        for sec in 0..seconds {
            self.ticker.sleep(ONE_SECOND).await;
            on_tick(seconds - sec - 1);
        }

        let n_samples = seconds as usize * CYTON_SAMPLING_RATE as usize;
        let mut buffered = self.ring.lock().drain();
        if buffered.is_empty() {
            log::warn!(
                "No samples received from Cyton on {} during {} s epoch, padding with zeros",
                self.port,
                seconds
            );
        }

        Ok(self
            .eeg_channels()
            .into_iter()
            .map(|ch| {
                let signal = buffered.remove(&ch).unwrap_or_default();
                (ch, fit_tail(&signal, n_samples))
            })
            .collect())
    }

    fn sampling_rate(&self) -> u32 {
        CYTON_SAMPLING_RATE
    }

    fn eeg_channels(&self) -> Vec<u32> {
        (1..=CYTON_CHANNELS as u32).collect()
    }

    fn name(&self) -> &str {
        "cyton"
    }
}

impl Drop for CytonBoard {
    fn drop(&mut self) {
        if let Some(task) = self.reader_task.take() {
            task.abort();
        }
    }
}
