// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Session Pin
//!
//! Owns the rotating session pin a client must sign to prove control of an
//! account. At most one current and one previous value exist at a time; a
//! signature over either is accepted so that a rotation in the middle of an
//! exchange does not fail the request.
//!
//! ## Lifecycle
//!
//! 1. `issue()` generates a fresh pin, demotes the old one to `previous` and
//!    arms the inactivity timer.
//! 2. `touch()` disarms the timer once a handler consumed the pin.
//! 3. If the timer fires first, both values are cleared and every consumer
//!    sees "session not open".
//! 4. `PinRotator` swaps the current value every rotation period while a
//!    session is open.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use rand::{distributions::Alphanumeric, Rng};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Number of alphanumeric characters in a pin.
pub const PIN_LENGTH: usize = 32;

/// Default inactivity window before an unconsumed pin is cleared.
pub const DEFAULT_PIN_INACTIVITY: Duration = Duration::from_millis(250);

/// Default period of the global pin rotation.
pub const DEFAULT_PIN_ROTATION: Duration = Duration::from_secs(30);

/// Point-in-time copy of the two pins a signature may be checked against.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PinSnapshot {
    pub current: Option<String>,
    pub previous: Option<String>,
}

impl PinSnapshot {
    /// A session is open only while a current pin exists.
    pub fn is_open(&self) -> bool {
        self.current.is_some()
    }
}

#[derive(Debug)]
struct IssuedPin {
    value: String,
    issued_at: Instant,
}

#[derive(Debug, Default)]
struct PinState {
    current: Option<IssuedPin>,
    previous: Option<String>,
    clear_timer: Option<JoinHandle<()>>,
    /// Bumped on every arm/disarm so a stale timer never clears a newer pin.
    generation: u64,
}

impl PinState {
    fn disarm(&mut self) {
        if let Some(timer) = self.clear_timer.take() {
            timer.abort();
        }
        self.generation = self.generation.wrapping_add(1);
    }

    fn reset(&mut self) {
        self.disarm();
        self.current = None;
        self.previous = None;
    }
}

/// Process-wide session pin manager.
///
/// Cloning shares the same underlying state.
#[derive(Debug, Clone)]
pub struct SessionManager {
    state: Arc<Mutex<PinState>>,
    inactivity: Duration,
}

impl SessionManager {
    pub fn new(inactivity: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(PinState::default())),
            inactivity,
        }
    }

    fn lock(&self) -> MutexGuard<'_, PinState> {
        lock_state(&self.state)
    }

    /// Generate a new pin, demote the current one and (re)arm the inactivity timer.
    ///
    /// Must be called from within a tokio runtime.
    pub fn issue(&self) -> String {
        let value = generate_pin();
        let mut state = self.lock();

        state.disarm();
        if let Some(old) = state.current.take() {
            state.previous = Some(old.value);
        }
        state.current = Some(IssuedPin {
            value: value.clone(),
            issued_at: Instant::now(),
        });

        let generation = state.generation;
        let shared = Arc::clone(&self.state);
        let inactivity = self.inactivity;
        state.clear_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(inactivity).await;
            let mut state = lock_state(&shared);
            if state.generation == generation {
                state.clear_timer = None;
                state.current = None;
                state.previous = None;
                debug!("Session pin expired after inactivity");
            }
        }));

        value
    }

    /// Current pin, without touching the timer.
    pub fn current(&self) -> Option<String> {
        self.lock().current.as_ref().map(|pin| pin.value.clone())
    }

    /// Both pins a signature may be recovered against.
    pub fn snapshot(&self) -> PinSnapshot {
        let state = self.lock();
        PinSnapshot {
            current: state.current.as_ref().map(|pin| pin.value.clone()),
            previous: state.previous.clone(),
        }
    }

    /// Time since the current pin was issued.
    pub fn age(&self) -> Option<Duration> {
        self.lock().current.as_ref().map(|pin| pin.issued_at.elapsed())
    }

    /// Keep-alive: cancel the pending clear after a handler consumed the pin.
    pub fn touch(&self) {
        self.lock().disarm();
    }

    /// Drop both pins. Idempotent.
    pub fn clear(&self) {
        self.lock().reset();
    }

    /// Replace the current pin while a session is open.
    ///
    /// Does nothing when no session is open and leaves the timer untouched.
    pub fn rotate(&self) -> Option<String> {
        let mut state = self.lock();
        let old = state.current.take()?;
        let value = generate_pin();
        state.previous = Some(old.value);
        state.current = Some(IssuedPin {
            value: value.clone(),
            issued_at: Instant::now(),
        });
        Some(value)
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new(DEFAULT_PIN_INACTIVITY)
    }
}

fn lock_state(state: &Mutex<PinState>) -> MutexGuard<'_, PinState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Random 32-character alphanumeric pin.
pub fn generate_pin() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(PIN_LENGTH)
        .map(char::from)
        .collect()
}

/// Background task rotating the session pin on a fixed period.
pub struct PinRotator {
    session: SessionManager,
    period: Duration,
}

impl PinRotator {
    pub fn new(session: SessionManager, period: Duration) -> Self {
        Self { session, period }
    }

    /// Run the rotation loop until the cancellation token is triggered.
    ///
    /// ```rust,ignore
    /// tokio::spawn(rotator.run(shutdown.clone()));
    /// ```
    pub async fn run(self, shutdown: CancellationToken) {
        info!(period_secs = self.period.as_secs(), "Pin rotator starting");

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.period) => {
                    if self.session.rotate().is_some() {
                        debug!("Session pin rotated");
                    }
                },
                _ = shutdown.cancelled() => {
                    info!("Pin rotator shutting down");
                    return;
                }
            }
        }
    }
}
