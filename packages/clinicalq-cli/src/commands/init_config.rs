use clinicalq_rs::SessionConfig;

use crate::cli::InitConfigArgs;
use crate::exit_codes;
use crate::output;

pub fn execute(args: InitConfigArgs) -> i32 {
    if let Err(e) = SessionConfig::default().save(&args.output) {
        eprintln!("Error: failed to write config '{}': {}", args.output, e);
        return exit_codes::EXECUTION_ERROR;
    }
    println!("{}", output::resolved(&args.output).display());
    exit_codes::SUCCESS
}
