// Electrode repositioning between sequential sites

use tokio::sync::mpsc;

use crate::events::{EventSink, SessionEvent};
use crate::pacing::{Ticker, ONE_SECOND};
use crate::readiness::{wait_for_ready, ReadyOutcome};
use crate::types::RepositionPolicy;

pub(crate) struct Repositioner<'a> {
    pub sink: &'a dyn EventSink,
    pub ticker: &'a dyn Ticker,
    pub policy: RepositionPolicy,
    pub countdown_seconds: u32,
}

impl Repositioner<'_> {
    /// Run one repositioning phase ahead of `next_location`.
    ///
    /// A missing readiness channel behaves like one that is already closed.
    pub async fn run(&self, next_location: &str, readiness: Option<&mut mpsc::Receiver<String>>) {
        match self.policy {
            RepositionPolicy::Timer => self.countdown(next_location).await,
            RepositionPolicy::Manual => self.wait_for_operator(next_location, readiness).await,
        }
    }

    async fn countdown(&self, next_location: &str) {
        // Accelerated runs skip the countdown entirely
        let seconds = if self.ticker.is_accelerated() {
            0
        } else {
            self.countdown_seconds
        };

        self.sink.emit(&SessionEvent::RepositionStart {
            next_location: next_location.to_string(),
            mode: RepositionPolicy::Timer,
            seconds: Some(seconds),
            message: format!("Move active electrode to {}.", next_location),
        });

        for remaining in (1..=seconds).rev() {
            self.sink.emit(&SessionEvent::RepositionTick {
                seconds_remaining: remaining,
                next_location: next_location.to_string(),
            });
            self.ticker.sleep(ONE_SECOND).await;
        }

        self.sink.emit(&SessionEvent::RepositionComplete {
            next_location: next_location.to_string(),
            mode: RepositionPolicy::Timer,
        });
    }

    async fn wait_for_operator(
        &self,
        next_location: &str,
        readiness: Option<&mut mpsc::Receiver<String>>,
    ) {
        self.sink.emit(&SessionEvent::RepositionStart {
            next_location: next_location.to_string(),
            mode: RepositionPolicy::Manual,
            seconds: None,
            message: format!(
                "Move active electrode to {}, then signal ready.",
                next_location
            ),
        });

        let outcome = match readiness {
            Some(rx) => wait_for_ready(rx, next_location).await,
            None => ReadyOutcome::InputClosed,
        };

        match outcome {
            ReadyOutcome::Ready => self.sink.emit(&SessionEvent::RepositionComplete {
                next_location: next_location.to_string(),
                mode: RepositionPolicy::Manual,
            }),
            ReadyOutcome::InputClosed => self.sink.emit(&SessionEvent::RepositionInputEof {
                next_location: next_location.to_string(),
            }),
        }
    }
}
