use std::sync::Arc;

use clinicalq_rs::events::{EventSink, JsonLinesSink};
use clinicalq_rs::{RepositionPolicy, SessionConfig, SessionError, SessionEvent, SessionOrchestrator};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use crate::cli::RunArgs;
use crate::exit_codes;
use crate::output;

pub async fn execute(args: RunArgs) -> i32 {
    let sink: Arc<dyn EventSink> = Arc::new(JsonLinesSink::stdout());

    let mut config = match &args.config {
        Some(path) => match SessionConfig::load(path) {
            Ok(config) => config,
            Err(e) => {
                return fail(
                    sink.as_ref(),
                    format!("Failed to load config '{}': {}", path, e),
                    exit_codes::CONFIG_ERROR,
                )
            }
        },
        None => SessionConfig::default(),
    };
    if args.fast {
        config.fast_mode = true;
    }

    let mut orchestrator = match SessionOrchestrator::from_config(&config, sink.clone()) {
        Ok(orchestrator) => orchestrator,
        Err(e) => return fail(sink.as_ref(), e.to_string(), exit_code_for(&e)),
    };
    if matches!(
        RepositionPolicy::parse(&config.reposition_mode),
        Ok(RepositionPolicy::Manual)
    ) {
        orchestrator = orchestrator.with_readiness(forward_stdin());
    }

    let outcome = match orchestrator.run(&config).await {
        Ok(outcome) => outcome,
        Err(e) => return fail(sink.as_ref(), e.to_string(), exit_code_for(&e)),
    };

    let result = outcome.into_result();
    let json = match output::to_json(&result, args.compact) {
        Ok(json) => json,
        Err(e) => return fail(sink.as_ref(), e, exit_codes::EXECUTION_ERROR),
    };
    if let Err(e) = output::write_output(&json, Some(&args.output)) {
        return fail(sink.as_ref(), e, exit_codes::EXECUTION_ERROR);
    }

    sink.emit(&SessionEvent::SessionComplete {
        output_path: output::resolved(&args.output).display().to_string(),
    });
    exit_codes::SUCCESS
}

fn fail(sink: &dyn EventSink, message: String, code: i32) -> i32 {
    log::error!("{}", message);
    sink.emit(&SessionEvent::Error { message });
    code
}

fn exit_code_for(err: &SessionError) -> i32 {
    match err {
        e if e.is_configuration() => exit_codes::CONFIG_ERROR,
        SessionError::HardwareUnavailable(_) => exit_codes::HARDWARE_UNAVAILABLE,
        _ => exit_codes::EXECUTION_ERROR,
    }
}

/// Feed stdin lines to the session as readiness signals.
/// The channel closes when stdin reaches end-of-input.
fn forward_stdin() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(16);
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if tx.send(line).await.is_err() {
                        break;
                    }
                }
                Ok(None) => {
                    log::debug!("stdin closed");
                    break;
                }
                Err(e) => {
                    log::warn!("Failed to read stdin: {}", e);
                    break;
                }
            }
        }
    });
    rx
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_by_error_kind() {
        assert_eq!(
            exit_code_for(&SessionError::Configuration("bad".into())),
            exit_codes::CONFIG_ERROR
        );
        assert_eq!(
            exit_code_for(&SessionError::UnsupportedMode("parallel".into())),
            exit_codes::CONFIG_ERROR
        );
        assert_eq!(
            exit_code_for(&SessionError::HardwareUnavailable("no port".into())),
            exit_codes::HARDWARE_UNAVAILABLE
        );
        assert_eq!(
            exit_code_for(&SessionError::Acquisition("lost".into())),
            exit_codes::EXECUTION_ERROR
        );
    }
}
