//! Periodic refresh scheduling.
//!
//! Every call to [`PollController::reconfigure`] mints a new [`Generation`]
//! and starts a fresh chain of ticks bound to it. A tick only marks the
//! panels dirty while its generation is still the active one, so a chain left
//! over from an older setting can never produce a refresh. The previous
//! chain's task is also cancelled outright; the generation check covers the
//! window where a tick was already due when the cancel landed.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use weatherdash_auth::AuthContext;
use weatherdash_core::Interval;

use crate::panel::PanelState;

/// Identifies one (re)configuration of the poller. Strictly increasing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Generation(u64);

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Default)]
struct PollState {
    active: Option<Generation>,
    minted: u64,
    interval: Interval,
    chain: Option<CancellationToken>,
}

struct PollShared {
    state: Mutex<PollState>,
    targets: Vec<Arc<PanelState>>,
    auth: Arc<dyn AuthContext>,
}

impl PollShared {
    fn mark_targets(&self) {
        for panel in &self.targets {
            panel.mark_dirty();
        }
    }

    fn tick(&self, generation: Generation) -> bool {
        let state = self.state.lock();
        if state.active != Some(generation) {
            tracing::debug!(
                "Dropping tick for generation {} (active {:?})",
                generation,
                state.active
            );
            return false;
        }
        if !self.auth.is_authenticated() {
            tracing::debug!("Dropping tick for generation {}: signed out", generation);
            return false;
        }

        tracing::debug!("Tick for generation {}", generation);
        // Marked while holding the lock so a concurrent reconfigure cannot
        // slip in between the check and the mark.
        self.mark_targets();
        !state.interval.is_manual()
    }
}

/// Owns the active generation and the timer chain that refreshes a set of
/// panels.
pub struct PollController {
    shared: Arc<PollShared>,
    runtime: Handle,
}

impl PollController {
    pub fn new(auth: Arc<dyn AuthContext>, targets: Vec<Arc<PanelState>>, runtime: Handle) -> Self {
        Self {
            shared: Arc::new(PollShared {
                state: Mutex::new(PollState::default()),
                targets,
                auth,
            }),
            runtime,
        }
    }

    /// Replace the refresh schedule.
    ///
    /// Both panels are marked dirty immediately. For `Every(d)` the next tick
    /// follows after `d`; `Manual` schedules nothing. Returns `None` and does
    /// nothing when no user is signed in.
    pub fn reconfigure(&self, interval: Interval) -> Option<Generation> {
        if !self.shared.auth.is_authenticated() {
            tracing::warn!("Ignoring interval change to {}: not signed in", interval);
            return None;
        }

        let mut state = self.shared.state.lock();
        if let Some(previous) = state.chain.take() {
            previous.cancel();
        }

        state.minted += 1;
        let generation = Generation(state.minted);
        state.active = Some(generation);
        state.interval = interval;

        if let Some(period) = interval.period() {
            let cancel = CancellationToken::new();
            state.chain = Some(cancel.clone());
            self.spawn_chain(generation, period, cancel);
        }

        tracing::info!("Refresh interval set to {} (generation {})", interval, generation);
        self.shared.mark_targets();
        Some(generation)
    }

    fn spawn_chain(&self, generation: Generation, period: Duration, cancel: CancellationToken) {
        // The first deadline is fixed here, not when the task first runs.
        let mut ticker = {
            let _guard = self.runtime.enter();
            time::interval_at(Instant::now() + period, period)
        };
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let shared = Arc::clone(&self.shared);
        self.runtime.spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        if !shared.tick(generation) {
                            break;
                        }
                    }
                }
            }
            cancel.cancel();
            tracing::debug!("Tick chain for generation {} ended", generation);
        });
    }

    /// Run one scheduled tick for `generation`. Returns whether the chain
    /// should keep going; a stale generation is a no-op returning `false`.
    pub fn tick(&self, generation: Generation) -> bool {
        self.shared.tick(generation)
    }

    /// Cancel the running chain and retire the active generation.
    pub fn stop(&self) {
        let mut state = self.shared.state.lock();
        if let Some(chain) = state.chain.take() {
            chain.cancel();
        }
        if let Some(generation) = state.active.take() {
            tracing::info!("Polling stopped (generation {})", generation);
        }
    }

    pub fn active_generation(&self) -> Option<Generation> {
        self.shared.state.lock().active
    }

    pub fn interval(&self) -> Interval {
        self.shared.state.lock().interval
    }

    /// Whether a timer chain is currently scheduled.
    pub fn is_running(&self) -> bool {
        self.shared
            .state
            .lock()
            .chain
            .as_ref()
            .is_some_and(|chain| !chain.is_cancelled())
    }
}

impl Drop for PollController {
    fn drop(&mut self) {
        if let Some(chain) = self.shared.state.lock().chain.take() {
            chain.cancel();
        }
    }
}
