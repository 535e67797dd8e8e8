//! ClinicalQ protocol catalog
//!
//! Static epoch sequences per electrode site. Lookups always hand out owned
//! copies so overriding durations never touches the catalog itself.

use serde::Serialize;

use crate::error::{Result, SessionError};
use crate::types::EpochSpec;

/// Default duration of every catalog epoch in seconds
pub const DEFAULT_EPOCH_SECONDS: u32 = 15;

/// Name of the shared simultaneous-mode sequence
pub const MASTER_SEQUENCE: &str = "MASTER";

/// Primary site carrying the full ten-epoch protocol
pub const PRIMARY_SITE: &str = "Cz";

/// Secondary site carrying the eyes-open/eyes-closed baseline
pub const SECONDARY_SITE: &str = "O1";

/// Sites recorded with a single eyes-closed epoch
pub const FRONTAL_SITES: &[&str] = &["Fz", "F3", "F4"];

/// Every site a ClinicalQ session must cover
pub const REQUIRED_LOCATIONS: &[&str] = &["O1", "Cz", "Fz", "F3", "F4"];

/// Default sequential recording order
pub const SEQUENTIAL_ORDER: &[&str] = &["O1", "Cz", "Fz", "F3", "F4"];

/// Site order of the simultaneous MASTER sequence
pub const SIMULTANEOUS_LOCATIONS: &[&str] = &["Cz", "O1", "Fz", "F3", "F4"];

/// Static epoch definition
#[derive(Debug, Clone, Copy, Serialize)]
pub struct EpochTemplate {
    pub index: u32,
    pub label: &'static str,
    pub instruction: &'static str,
}

impl EpochTemplate {
    pub fn to_spec(&self, seconds: u32) -> EpochSpec {
        EpochSpec {
            index: self.index,
            label: self.label.to_string(),
            instruction: self.instruction.to_string(),
            seconds,
        }
    }
}

const EO: &str = "Eyes open, relaxed gaze.";
const EC: &str = "Eyes closed, still and relaxed.";

// =============================================================================
// SEQUENCES
// =============================================================================

/// Cz: baseline EO/EC, EO recheck, two cognitive loads, sound stimulus and
/// two stimulus-effect probes
pub const CZ_SEQUENCE: &[EpochTemplate] = &[
    EpochTemplate { index: 1, label: "EO", instruction: EO },
    EpochTemplate { index: 2, label: "EO", instruction: EO },
    EpochTemplate { index: 3, label: "EC", instruction: EC },
    EpochTemplate { index: 4, label: "EO", instruction: EO },
    EpochTemplate {
        index: 5,
        label: "READ",
        instruction: "Cognitive challenge: read silently.",
    },
    EpochTemplate {
        index: 6,
        label: "OMNI",
        instruction: "Apply OR/Omni/UCS sound as configured.",
    },
    EpochTemplate {
        index: 7,
        label: "COUNT",
        instruction: "Cognitive challenge: serial counting.",
    },
    EpochTemplate { index: 8, label: "EO", instruction: EO },
    EpochTemplate {
        index: 9,
        label: "TEST",
        instruction: "Test immediate UCS effect.",
    },
    EpochTemplate {
        index: 10,
        label: "HARMONIC",
        instruction: "Harmonic/UCS therapeutic test.",
    },
];

/// O1: eyes-open/eyes-closed/eyes-open baseline
pub const O1_SEQUENCE: &[EpochTemplate] = &[
    EpochTemplate { index: 1, label: "EO", instruction: EO },
    EpochTemplate { index: 2, label: "EO", instruction: EO },
    EpochTemplate { index: 3, label: "EC", instruction: EC },
    EpochTemplate { index: 4, label: "EO", instruction: EO },
];

/// Fz, F3, F4: one eyes-closed epoch
pub const EC_SINGLE_SEQUENCE: &[EpochTemplate] = &[EpochTemplate { index: 1, label: "EC", instruction: EC }];

/// Shared frontal eyes-closed baseline appended to MASTER when enabled
pub const SIMULTANEOUS_EXTRA: &[EpochTemplate] = &[EpochTemplate {
    index: 11,
    label: "FRONTAL_EC",
    instruction: "Eyes closed baseline for frontal channels.",
}];

/// Templates for one site
pub fn templates_for(location: &str) -> Result<&'static [EpochTemplate]> {
    match location {
        PRIMARY_SITE => Ok(CZ_SEQUENCE),
        SECONDARY_SITE => Ok(O1_SEQUENCE),
        loc if FRONTAL_SITES.contains(&loc) => Ok(EC_SINGLE_SEQUENCE),
        other => Err(SessionError::UnsupportedLocation(other.to_string())),
    }
}

/// Owned epoch sequence for one site at the catalog's default duration
pub fn sequence_for(location: &str) -> Result<Vec<EpochSpec>> {
    sequence_with_seconds(location, DEFAULT_EPOCH_SECONDS)
}

/// Owned epoch sequence for one site with every duration set to `seconds`
pub fn sequence_with_seconds(location: &str, seconds: u32) -> Result<Vec<EpochSpec>> {
    Ok(templates_for(location)?
        .iter()
        .map(|t| t.to_spec(seconds))
        .collect())
}

/// The simultaneous-mode MASTER sequence
pub fn master_sequence(seconds: u32, include_frontal_baseline: bool) -> Vec<EpochSpec> {
    let extra: &[EpochTemplate] = if include_frontal_baseline {
        SIMULTANEOUS_EXTRA
    } else {
        &[]
    };
    CZ_SEQUENCE
        .iter()
        .chain(extra.iter())
        .map(|t| t.to_spec(seconds))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_lengths() {
        assert_eq!(sequence_for("Cz").unwrap().len(), 10);
        assert_eq!(sequence_for("O1").unwrap().len(), 4);
        for site in FRONTAL_SITES {
            let seq = sequence_for(site).unwrap();
            assert_eq!(seq.len(), 1);
            assert_eq!(seq[0].label, "EC");
        }
    }

    #[test]
    fn test_unknown_site_is_rejected() {
        let err = sequence_for("Pz").unwrap_err();
        assert!(matches!(err, SessionError::UnsupportedLocation(ref s) if s == "Pz"));
    }

    #[test]
    fn test_duration_override_leaves_catalog_untouched() {
        let short = sequence_with_seconds("Cz", 2).unwrap();
        assert!(short.iter().all(|s| s.seconds == 2));
        let again = sequence_for("Cz").unwrap();
        assert!(again.iter().all(|s| s.seconds == DEFAULT_EPOCH_SECONDS));
    }

    #[test]
    fn test_master_sequence_with_and_without_extra() {
        let with_extra = master_sequence(5, true);
        assert_eq!(with_extra.len(), CZ_SEQUENCE.len() + 1);
        assert_eq!(with_extra.last().unwrap().label, "FRONTAL_EC");
        assert_eq!(master_sequence(5, false).len(), CZ_SEQUENCE.len());
    }

    #[test]
    fn test_indices_are_sequential() {
        let seq = sequence_for("Cz").unwrap();
        for (i, spec) in seq.iter().enumerate() {
            assert_eq!(spec.index, i as u32 + 1);
        }
    }
}
