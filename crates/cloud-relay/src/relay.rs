//! The poll loop.
//!
//! One cooperative loop, one request at a time:
//!
//! 1. Drain session events into [`RelayContext`]. While disconnected, sleep
//!    the disconnected backoff and try again.
//! 2. Read the queue id. Sentinels and the last claimed id are ignored.
//! 3. On a new id: read the request, skip it if empty, otherwise decode it,
//!    write the acknowledgement sentinel, and ask the generator.
//! 4. Encode the answer, split it into slots, and write slots 8 down to 1
//!    with a short delay after each write. Failed writes are logged and skipped.
//! 5. Sleep the poll interval. A failed cycle sleeps the error backoff instead.
//!
//! All sleeps go through `tokio::time`, so tests run the loop against a
//! paused clock.

use thiserror::Error;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use protocol::{codec, vars, ResponseSlots};

use crate::config::PollTimings;
use crate::generator::{AnswerGenerator, TextGenerator};
use crate::session::{CloudSession, SessionError, SessionEvent, SessionEvents};
use crate::state_machine::{IllegalTransition, RelayContext, RelayState};

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("failed to acknowledge request {queue_id}: {source}")]
    Acknowledge {
        queue_id: String,
        #[source]
        source: SessionError,
    },

    #[error(transparent)]
    State(#[from] IllegalTransition),
}

/// What one poll cycle did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Session not connected; nothing was read.
    Offline,
    /// Queue id was a sentinel or already claimed.
    NoRequest,
    /// A new queue id arrived with no request payload.
    EmptyRequest { queue_id: String },
    /// A request was answered.
    Answered {
        queue_id: String,
        slots_written: usize,
        slots_failed: usize,
        truncated: bool,
    },
}

struct PublishReport {
    written: usize,
    failed: usize,
}

pub struct Relay<S, G> {
    session: S,
    events: SessionEvents,
    generator: AnswerGenerator<G>,
    timings: PollTimings,
    ctx: RelayContext,
}

impl<S, G> Relay<S, G>
where
    S: CloudSession,
    G: TextGenerator,
{
    pub fn new(session: S, events: SessionEvents, generator: G, timings: PollTimings) -> Self {
        Self {
            session,
            events,
            generator: AnswerGenerator::new(generator),
            timings,
            ctx: RelayContext::new(),
        }
    }

    pub fn context(&self) -> &RelayContext {
        &self.ctx
    }

    pub fn session(&self) -> &S {
        &self.session
    }

    /// Fold every pending session event into the context.
    pub fn drain_events(&mut self) {
        loop {
            match self.events.try_recv() {
                Ok(event) => {
                    match &event {
                        SessionEvent::Open => info!("Connected!"),
                        SessionEvent::Error(reason) => {
                            error!(%reason, "Connection error")
                        }
                        SessionEvent::Closed => warn!("Connection closed"),
                    }
                    self.ctx.apply_event(&event);
                }
                Err(TryRecvError::Empty) => break,
                // Sender gone: the transport task has ended for good.
                Err(TryRecvError::Disconnected) => {
                    if self.ctx.is_connected() {
                        self.ctx.apply_event(&SessionEvent::Closed);
                    }
                    break;
                }
            }
        }
    }

    /// Wait the settle interval, then report whether the session opened.
    pub async fn wait_for_open(&mut self) -> bool {
        sleep(self.timings.settle).await;
        self.drain_events();
        self.ctx.is_connected()
    }

    /// One loop iteration including its trailing sleep.
    pub async fn step(&mut self) -> Result<CycleOutcome, RelayError> {
        self.drain_events();
        if !self.ctx.is_connected() {
            info!("Not connected. Waiting...");
            sleep(self.timings.disconnected_backoff).await;
            return Ok(CycleOutcome::Offline);
        }

        match self.poll_once().await {
            Ok(outcome) => {
                sleep(self.timings.poll_interval).await;
                Ok(outcome)
            }
            Err(e) => {
                error!(error = %e, "Cycle failed");
                self.ctx.recover("cycle failed");
                sleep(self.timings.error_backoff).await;
                Err(e)
            }
        }
    }

    /// Run forever. Only startup failures end the process; cycle errors are
    /// logged and retried after the error backoff.
    pub async fn run(&mut self) {
        info!(
            poll_ms = self.timings.poll_interval.as_millis() as u64,
            "Polling for requests"
        );
        loop {
            // Errors are logged inside step().
            let _ = self.step().await;
        }
    }

    /// Check for a new request and, if there is one, answer it.
    pub async fn poll_once(&mut self) -> Result<CycleOutcome, RelayError> {
        let queue_id = self
            .session
            .get(vars::QUEUE_ID)
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| vars::NO_REQUEST.to_string());

        if !self.ctx.claim(&queue_id)? {
            return Ok(CycleOutcome::NoRequest);
        }
        info!(%queue_id, "New request");

        let payload = self
            .session
            .get(vars::REQUEST)
            .filter(|v| !v.is_empty() && v != vars::NO_REQUEST);
        let Some(payload) = payload else {
            info!(%queue_id, "Empty request, skipping");
            self.ctx.advance(RelayState::Idle, Some("empty request"))?;
            return Ok(CycleOutcome::EmptyRequest { queue_id });
        };
        debug!(%payload, "Encoded question");

        let prompt = codec::decode(&payload);
        info!(%queue_id, question = %prompt, "Question");

        self.session
            .set(vars::REQUEST, vars::ACKNOWLEDGED)
            .await
            .map_err(|source| RelayError::Acknowledge {
                queue_id: queue_id.clone(),
                source,
            })?;
        info!(%queue_id, "Processing request");

        let answer = self.generator.answer(&prompt).await;
        info!(%queue_id, answer = %answer, "Answer");

        let slots = ResponseSlots::split(&codec::encode(&answer));
        self.ctx.advance(RelayState::Publishing, None)?;
        let report = self.publish(&slots).await;
        self.ctx.advance(RelayState::Idle, Some("published"))?;

        info!(
            %queue_id,
            written = report.written,
            failed = report.failed,
            "Done with request"
        );
        Ok(CycleOutcome::Answered {
            queue_id,
            slots_written: report.written,
            slots_failed: report.failed,
            truncated: slots.is_truncated(),
        })
    }

    /// Write slots last to first; slot 1 landing tells the consumer the answer is complete.
    async fn publish(&self, slots: &ResponseSlots) -> PublishReport {
        let mut report = PublishReport {
            written: 0,
            failed: 0,
        };

        for (index, value) in slots.transmission_order() {
            let name = vars::response_slot(index);
            match self.session.set(&name, value).await {
                Ok(()) => {
                    debug!(%name, digits = value.len(), "Sent slot");
                    report.written += 1;
                }
                Err(e) => {
                    warn!(%name, error = %e, "Failed to send slot");
                    report.failed += 1;
                }
            }
            sleep(self.timings.write_delay).await;
        }

        report
    }
}
