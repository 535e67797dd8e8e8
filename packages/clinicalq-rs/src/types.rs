use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::bands::Band;
use crate::error::{Result, SessionError};

/// Site name to 1-based board channel index
pub type ChannelMap = BTreeMap<String, u32>;

/// Raw samples keyed by board channel index
pub type ChannelData = BTreeMap<u32, Vec<f64>>;

/// One timed recording segment of a protocol sequence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochSpec {
    pub index: u32,
    pub label: String,
    pub instruction: String,
    pub seconds: u32,
}

impl EpochSpec {
    /// Copy of this epoch with its duration replaced by the session epoch length
    pub fn with_seconds(&self, seconds: u32) -> Self {
        Self {
            seconds,
            ..self.clone()
        }
    }
}

/// Band amplitudes for one site over one analysis window
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FeatureVector {
    pub delta: f64,
    pub theta: f64,
    pub alpha: f64,
    pub lo_alpha: f64,
    pub hi_alpha: f64,
    pub smr: f64,
    pub beta: f64,
    pub hibeta: f64,
    pub total_amp_basic: f64,
    pub hibeta_plus_beta: f64,
    pub peak_alpha: f64,
}

impl FeatureVector {
    pub fn band(&self, band: Band) -> f64 {
        match band {
            Band::Delta => self.delta,
            Band::Theta => self.theta,
            Band::Alpha => self.alpha,
            Band::LoAlpha => self.lo_alpha,
            Band::HiAlpha => self.hi_alpha,
            Band::Smr => self.smr,
            Band::Beta => self.beta,
            Band::HiBeta => self.hibeta,
        }
    }

    pub(crate) fn set_band(&mut self, band: Band, value: f64) {
        match band {
            Band::Delta => self.delta = value,
            Band::Theta => self.theta = value,
            Band::Alpha => self.alpha = value,
            Band::LoAlpha => self.lo_alpha = value,
            Band::HiAlpha => self.hi_alpha = value,
            Band::Smr => self.smr = value,
            Band::Beta => self.beta = value,
            Band::HiBeta => self.hibeta = value,
        }
    }

    /// Element-wise mean. Returns `None` when `rows` is empty.
    pub fn mean<'a, I>(rows: I) -> Option<FeatureVector>
    where
        I: IntoIterator<Item = &'a FeatureVector>,
    {
        let mut acc = FeatureVector::default();
        let mut count = 0usize;
        for row in rows {
            for band in Band::ALL {
                acc.set_band(band, acc.band(band) + row.band(band));
            }
            acc.total_amp_basic += row.total_amp_basic;
            acc.hibeta_plus_beta += row.hibeta_plus_beta;
            acc.peak_alpha += row.peak_alpha;
            count += 1;
        }
        if count == 0 {
            return None;
        }
        let n = count as f64;
        for band in Band::ALL {
            acc.set_band(band, acc.band(band) / n);
        }
        acc.total_amp_basic /= n;
        acc.hibeta_plus_beta /= n;
        acc.peak_alpha /= n;
        Some(acc)
    }
}

/// Features captured for one completed epoch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochCapture {
    pub sequence: String,
    pub index: u32,
    pub label: String,
    pub instruction: String,
    pub seconds: u32,
    pub features: BTreeMap<String, FeatureVector>,
}

/// Capture topology of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AcquisitionMode {
    /// All sites recorded at once against the shared MASTER sequence
    Simultaneous,
    /// One site at a time with electrode repositioning in between
    Sequential,
}

impl AcquisitionMode {
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_lowercase().as_str() {
            "simultaneous" => Ok(Self::Simultaneous),
            "sequential" => Ok(Self::Sequential),
            _ => Err(SessionError::UnsupportedMode(value.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Simultaneous => "simultaneous",
            Self::Sequential => "sequential",
        }
    }
}

impl fmt::Display for AcquisitionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the session waits while the operator moves the electrode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepositionPolicy {
    Timer,
    Manual,
}

impl RepositionPolicy {
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_lowercase().as_str() {
            "timer" => Ok(Self::Timer),
            "manual" => Ok(Self::Manual),
            _ => Err(SessionError::UnsupportedPolicy(value.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Timer => "timer",
            Self::Manual => "manual",
        }
    }
}

/// Everything captured during one session; the input of the analysis step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub mode: AcquisitionMode,
    pub sampling_rate: u32,
    pub epoch_seconds: u32,
    pub channels: ChannelMap,
    pub epochs: Vec<EpochCapture>,
}
