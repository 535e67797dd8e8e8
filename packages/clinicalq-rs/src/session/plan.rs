//! Session plan: the validated form of a `SessionConfig`
//!
//! Everything that can be rejected is rejected here, before the board is
//! touched.

use std::collections::{BTreeMap, BTreeSet};

use crate::config::SessionConfig;
use crate::error::{Result, SessionError};
use crate::protocol::{
    master_sequence, sequence_with_seconds, MASTER_SEQUENCE, REQUIRED_LOCATIONS, SEQUENTIAL_ORDER,
    SIMULTANEOUS_LOCATIONS,
};
use crate::types::{AcquisitionMode, ChannelMap, EpochSpec, RepositionPolicy};

/// One sequence to capture, with the sites read during each of its epochs
#[derive(Debug, Clone, PartialEq)]
pub struct SequencePlan {
    pub name: String,
    pub locations: Vec<String>,
    pub epochs: Vec<EpochSpec>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionPlan {
    pub mode: AcquisitionMode,
    pub reposition: RepositionPolicy,
    pub epoch_seconds: u32,
    pub reposition_seconds: u32,
    pub live_bandpower: bool,
    pub live_window_seconds: f64,
    pub channels: ChannelMap,
    /// Captured in order; sequential mode repositions before every entry but the first
    pub sequences: Vec<SequencePlan>,
}

impl SessionPlan {
    pub fn from_config(config: &SessionConfig) -> Result<Self> {
        let channels = validate_channels(&config.channels)?;
        let reposition = RepositionPolicy::parse(&config.reposition_mode)?;
        let mode = AcquisitionMode::parse(&config.mode)?;

        if config.epoch_seconds == 0 {
            return Err(SessionError::Configuration(
                "epoch_seconds must be at least 1".to_string(),
            ));
        }
        if config.sampling_rate == 0 {
            return Err(SessionError::Configuration(
                "sampling_rate must be positive".to_string(),
            ));
        }
        if !(config.live_window_seconds.is_finite() && config.live_window_seconds > 0.0) {
            return Err(SessionError::Configuration(format!(
                "live_window_seconds must be positive, got {}",
                config.live_window_seconds
            )));
        }

        let sequences = match mode {
            AcquisitionMode::Simultaneous => vec![SequencePlan {
                name: MASTER_SEQUENCE.to_string(),
                locations: SIMULTANEOUS_LOCATIONS.iter().map(|s| s.to_string()).collect(),
                epochs: master_sequence(config.epoch_seconds, config.include_frontal_baseline),
            }],
            AcquisitionMode::Sequential => validate_order(&config.sequential_order)?
                .into_iter()
                .map(|location| {
                    Ok(SequencePlan {
                        epochs: sequence_with_seconds(&location, config.epoch_seconds)?,
                        locations: vec![location.clone()],
                        name: location,
                    })
                })
                .collect::<Result<Vec<_>>>()?,
        };

        Ok(Self {
            mode,
            reposition,
            epoch_seconds: config.epoch_seconds,
            reposition_seconds: config.reposition_seconds,
            live_bandpower: config.live_bandpower,
            live_window_seconds: config.live_window_seconds,
            channels,
            sequences,
        })
    }

    pub fn total_epochs(&self) -> usize {
        self.sequences.iter().map(|s| s.epochs.len()).sum()
    }
}

/// Every required site must map to a unique channel >= 1
fn validate_channels(raw: &BTreeMap<String, i64>) -> Result<ChannelMap> {
    let missing: Vec<&str> = REQUIRED_LOCATIONS
        .iter()
        .copied()
        .filter(|loc| !raw.contains_key(*loc))
        .collect();
    if !missing.is_empty() {
        return Err(SessionError::Configuration(format!(
            "Missing required channel mappings: {}",
            missing.join(", ")
        )));
    }

    let as_channel = |value: i64| u32::try_from(value).ok().filter(|&ch| ch >= 1);

    let invalid: Vec<&str> = REQUIRED_LOCATIONS
        .iter()
        .copied()
        .filter(|loc| raw.get(*loc).copied().and_then(as_channel).is_none())
        .collect();
    if !invalid.is_empty() {
        return Err(SessionError::Configuration(format!(
            "Invalid channel index (must be >= 1) for: {}",
            invalid.join(", ")
        )));
    }

    let mut seen: BTreeMap<u32, &str> = BTreeMap::new();
    let mut duplicates = Vec::new();
    for &loc in REQUIRED_LOCATIONS {
        let ch = raw.get(loc).copied().and_then(as_channel).unwrap_or_default();
        match seen.get(&ch) {
            Some(first) => duplicates.push(format!("{} and {} both map to channel {}", first, loc, ch)),
            None => {
                seen.insert(ch, loc);
            }
        }
    }
    if !duplicates.is_empty() {
        return Err(SessionError::Configuration(format!(
            "Duplicate channel mappings are not allowed: {}",
            duplicates.join("; ")
        )));
    }

    let mut channels = ChannelMap::new();
    for (site, &value) in raw {
        match as_channel(value) {
            Some(ch) => {
                channels.insert(site.clone(), ch);
            }
            None => log::warn!("Ignoring mapping {} -> {}: not a valid channel", site, value),
        }
    }
    Ok(channels)
}

/// Sequential order must name each required site exactly once
fn validate_order(order: &[String]) -> Result<Vec<String>> {
    if order.is_empty() {
        return Ok(SEQUENTIAL_ORDER.iter().map(|s| s.to_string()).collect());
    }

    let given: BTreeSet<&str> = order.iter().map(String::as_str).collect();
    let required: BTreeSet<&str> = REQUIRED_LOCATIONS.iter().copied().collect();
    if order.len() != REQUIRED_LOCATIONS.len() || given != required {
        return Err(SessionError::Configuration(format!(
            "Sequential mode must record all required sites exactly once: {}",
            REQUIRED_LOCATIONS.join(", ")
        )));
    }
    Ok(order.to_vec())
}
