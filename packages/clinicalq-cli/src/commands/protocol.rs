use clinicalq_rs::protocol::{
    templates_for, EpochTemplate, MASTER_SEQUENCE, SEQUENTIAL_ORDER, SIMULTANEOUS_EXTRA,
    CZ_SEQUENCE,
};
use serde::Serialize;

use crate::cli::ProtocolArgs;
use crate::exit_codes;
use crate::output;

#[derive(Debug, Serialize)]
struct SequenceInfo {
    sequence: String,
    epochs: Vec<EpochTemplate>,
}

fn catalog(site: Option<&str>) -> Result<Vec<SequenceInfo>, String> {
    let sites: Vec<&str> = match site {
        Some(site) => vec![site],
        None => SEQUENTIAL_ORDER.to_vec(),
    };

    let mut sequences = sites
        .into_iter()
        .map(|site| {
            templates_for(site)
                .map(|epochs| SequenceInfo {
                    sequence: site.to_string(),
                    epochs: epochs.to_vec(),
                })
                .map_err(|e| e.to_string())
        })
        .collect::<Result<Vec<_>, String>>()?;

    if site.is_none() {
        sequences.push(SequenceInfo {
            sequence: MASTER_SEQUENCE.to_string(),
            epochs: CZ_SEQUENCE.iter().chain(SIMULTANEOUS_EXTRA).copied().collect(),
        });
    }
    Ok(sequences)
}

pub fn execute(args: ProtocolArgs) -> i32 {
    let sequences = match catalog(args.site.as_deref()) {
        Ok(sequences) => sequences,
        Err(e) => {
            eprintln!("Error: {}", e);
            return exit_codes::CONFIG_ERROR;
        }
    };

    if args.json {
        match output::to_json(&sequences, false) {
            Ok(json) => {
                if let Err(e) = output::write_output(&json, None) {
                    eprintln!("Error: {}", e);
                    return exit_codes::EXECUTION_ERROR;
                }
            }
            Err(e) => {
                eprintln!("Error: {}", e);
                return exit_codes::EXECUTION_ERROR;
            }
        }
    } else {
        for seq in &sequences {
            println!("{} ({} epochs)", seq.sequence, seq.epochs.len());
            println!("  {:<4} {:<12} {}", "#", "Label", "Instruction");
            println!("  {}", "-".repeat(56));
            for epoch in &seq.epochs {
                println!("  {:<4} {:<12} {}", epoch.index, epoch.label, epoch.instruction);
            }
            println!();
        }
        if args.site.is_none() {
            println!("MASTER is recorded in simultaneous mode; FRONTAL_EC is optional.");
        }
    }

    exit_codes::SUCCESS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_catalog() {
        let sequences = catalog(None).unwrap();
        let names: Vec<&str> = sequences.iter().map(|s| s.sequence.as_str()).collect();
        assert_eq!(names, vec!["O1", "Cz", "Fz", "F3", "F4", "MASTER"]);
        assert_eq!(sequences[5].epochs.len(), 11);
    }

    #[test]
    fn test_unknown_site() {
        assert!(catalog(Some("Pz")).unwrap_err().contains("Pz"));
    }
}
