//! Establishes the IPC session with retries, backoff and slot rotation

use std::time::Duration;

use tokio::sync::watch;

use super::traits::{PresenceTransport, TransportError, TransportFactory};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;

/// Discord listens on the first free slot of `discord-ipc-0` .. `discord-ipc-9`
const DEFAULT_SLOTS: std::ops::RangeInclusive<u8> = 0..=9;

const BACKOFF_SEED: Duration = Duration::from_secs(1);
const BACKOFF_CAP: Duration = Duration::from_secs(30);

/// Delay slept after failed attempt `attempt` (1-based): `min(2^(attempt-1), 30)` seconds.
pub fn delay_after_attempt(attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(31);
    BACKOFF_SEED
        .saturating_mul(1u32 << exponent)
        .min(BACKOFF_CAP)
}

/// Doubling delay, capped
#[derive(Debug, Clone, Default)]
pub struct Backoff {
    failures: u32,
}

impl Backoff {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_delay(&mut self) -> Duration {
        self.failures = self.failures.saturating_add(1);
        delay_after_attempt(self.failures)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ConnectError {
    #[error("Discord RPC is unavailable")]
    Unavailable,

    #[error("shutdown requested while connecting")]
    ShuttingDown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Attempt {
    number: u32,
    slot: u8,
}

/// Attempt counter, backoff and candidate index for one `connect()` call
#[derive(Debug)]
struct RetryState<'a> {
    slots: &'a [u8],
    max_attempts: u32,
    attempt: u32,
    candidate: usize,
    backoff: Backoff,
}

impl<'a> RetryState<'a> {
    fn new(slots: &'a [u8], max_attempts: u32) -> Self {
        Self {
            slots,
            max_attempts,
            attempt: 0,
            candidate: 0,
            backoff: Backoff::new(),
        }
    }

    fn next_attempt(&mut self) -> Option<Attempt> {
        if self.attempt >= self.max_attempts {
            return None;
        }
        let slot = *self.slots.get(self.candidate)?;

        self.attempt = self.attempt.saturating_add(1);
        Some(Attempt {
            number: self.attempt,
            slot,
        })
    }

    fn is_last(&self) -> bool {
        self.attempt >= self.max_attempts
    }

    /// Moves to the next candidate slot and returns how long to wait first.
    fn advance(&mut self) -> Duration {
        self.candidate = self
            .candidate
            .checked_add(1)
            .filter(|next| *next < self.slots.len())
            .unwrap_or(0);
        self.backoff.next_delay()
    }
}

/// Resolves once the flag is set. A dropped sender means nobody can ask us to stop.
pub(crate) async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Opens presence transports, retrying until one answers
pub struct Connector<F> {
    factory: F,
    slots: Vec<u8>,
    max_attempts: u32,
}

impl<F: TransportFactory> Connector<F> {
    /// Uses the pinned slot if one is configured, otherwise rotates through all default slots.
    pub fn new(factory: F, pinned_slot: Option<u8>) -> Self {
        let slots = match pinned_slot {
            Some(slot) => vec![slot],
            None => DEFAULT_SLOTS.collect(),
        };

        Self {
            factory,
            slots,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Returns a connected transport. Gives up early if `shutdown` is set while
    /// an attempt or a backoff sleep is in progress.
    pub async fn connect(
        &self,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<Box<dyn PresenceTransport>, ConnectError> {
        let mut retry = RetryState::new(&self.slots, self.max_attempts);

        while let Some(attempt) = retry.next_attempt() {
            if *shutdown.borrow() {
                return Err(ConnectError::ShuttingDown);
            }

            let mut transport = self.factory.create(attempt.slot);

            tracing::info!(
                "Connecting to Discord RPC (attempt {}/{}, pipe={})",
                attempt.number,
                self.max_attempts,
                attempt.slot
            );

            let outcome = tokio::select! {
                result = transport.connect() => Some(result),
                () = wait_for_shutdown(shutdown) => None,
            };
            let Some(result) = outcome else {
                transport.close().await;
                return Err(ConnectError::ShuttingDown);
            };

            match result {
                Ok(()) => {
                    tracing::info!("Discord RPC connected on pipe {}", transport.slot());
                    return Ok(transport);
                }
                Err(TransportError::NotFound) => {
                    tracing::error!(
                        "Discord not found on pipe {}. Open the Discord desktop app, log in, then try again.",
                        attempt.slot
                    );
                    transport.close().await;
                    return Err(ConnectError::Unavailable);
                }
                Err(e) if e.is_retryable() => {
                    transport.close().await;

                    if retry.is_last() {
                        tracing::warn!(
                            "Discord RPC attempt {} on pipe {} failed: {}",
                            attempt.number,
                            attempt.slot,
                            e
                        );
                        break;
                    }

                    let delay = retry.advance();
                    tracing::warn!(
                        "Discord RPC attempt {} on pipe {} failed: {}. Retrying in {}s...",
                        attempt.number,
                        attempt.slot,
                        e,
                        delay.as_secs()
                    );
                    tokio::select! {
                        () = tokio::time::sleep(delay) => {}
                        () = wait_for_shutdown(shutdown) => return Err(ConnectError::ShuttingDown),
                    }
                }
                Err(e) => {
                    tracing::error!(
                        "Discord RPC connection failed on pipe {} (attempt {}): {}",
                        attempt.slot,
                        attempt.number,
                        e
                    );
                    transport.close().await;
                    return Err(ConnectError::Unavailable);
                }
            }
        }

        tracing::error!(
            "Could not connect to Discord RPC (gave up after {} attempts)",
            self.max_attempts
        );
        Err(ConnectError::Unavailable)
    }
}

/// Closes and drops the handle, if there is one.
pub async fn close_connection(connection: &mut Option<Box<dyn PresenceTransport>>) {
    if let Some(mut transport) = connection.take() {
        tracing::debug!("Closing Discord RPC connection on pipe {}", transport.slot());
        transport.close().await;
    }
}
