use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "clinicalq",
    version,
    about = "ClinicalQ acquisition and analysis command-line tool",
    long_about = "Run guided ClinicalQ EEG acquisition sessions and score them against clinical ranges.\n\
                  Session events are written to stdout as JSON lines; logs go to stderr."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run a guided acquisition and analysis session
    Run(RunArgs),
    /// Write a starter config file
    InitConfig(InitConfigArgs),
    /// Show the epoch sequences of the protocol
    Protocol(ProtocolArgs),
}

#[derive(Args)]
pub struct RunArgs {
    /// Path to JSON config (merged over the defaults)
    #[arg(long, env = "CLINICALQ_CONFIG")]
    pub config: Option<String>,

    /// Where to write the result JSON
    #[arg(short, long)]
    pub output: String,

    /// Skip real-time waits (overrides fast_mode in the config)
    #[arg(long, default_value_t = false)]
    pub fast: bool,

    /// Compact result JSON (no indentation)
    #[arg(long, default_value_t = false)]
    pub compact: bool,
}

#[derive(Args)]
pub struct InitConfigArgs {
    /// Path for the starter config JSON
    #[arg(short, long)]
    pub output: String,
}

#[derive(Args)]
pub struct ProtocolArgs {
    /// Only show the sequence for this site (O1, Cz, Fz, F3, F4)
    #[arg(long)]
    pub site: Option<String>,

    /// Output as JSON
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_is_global() {
        let cli = Cli::try_parse_from(["clinicalq", "protocol", "-vv"]).unwrap();
        assert_eq!(cli.verbose, 2);
    }

    #[test]
    fn test_run_requires_output() {
        assert!(Cli::try_parse_from(["clinicalq", "run"]).is_err());
        let cli = Cli::try_parse_from(["clinicalq", "run", "--output", "out.json", "--fast"]).unwrap();
        match cli.command {
            Command::Run(args) => {
                assert_eq!(args.output, "out.json");
                assert!(args.fast);
                assert!(!args.compact);
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn test_init_config_subcommand_name() {
        let cli = Cli::try_parse_from(["clinicalq", "init-config", "-o", "c.json"]).unwrap();
        assert!(matches!(cli.command, Command::InitConfig(_)));
    }
}
