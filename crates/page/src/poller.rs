//! Clearance poller.
//!
//! Watches the page until no challenge signature is present or a hard
//! deadline passes, whichever comes first. The page is sampled on entry, on
//! every interval tick, and whenever a structural-change observer nudges the
//! poller. Once an outcome is reached it is final for the page's lifetime.

use crate::error::PageResult;
use crate::signatures::SignatureMatcher;
use crate::traits::PageProbe;
use burner_core::config::ClearanceConfig;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::{Instant, MissedTickBehavior};

/// Terminal result of a watch. Both release injection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClearanceOutcome {
    Cleared,
    TimedOut,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClearanceState {
    Watching,
    Done(ClearanceOutcome),
}

pub struct ClearancePoller {
    probe: Arc<dyn PageProbe>,
    matcher: SignatureMatcher,
    interval: Duration,
    deadline: Duration,
    nudge: Notify,
    outcome: OnceLock<ClearanceOutcome>,
}

impl ClearancePoller {
    pub fn new(
        probe: Arc<dyn PageProbe>,
        matcher: SignatureMatcher,
        interval: Duration,
        deadline: Duration,
    ) -> Self {
        Self {
            probe,
            matcher,
            interval,
            deadline,
            nudge: Notify::new(),
            outcome: OnceLock::new(),
        }
    }

    pub fn from_config(probe: Arc<dyn PageProbe>, config: &ClearanceConfig) -> PageResult<Self> {
        Ok(Self::new(
            probe,
            SignatureMatcher::new(&config.signatures)?,
            config.interval(),
            config.deadline(),
        ))
    }

    pub fn state(&self) -> ClearanceState {
        match self.outcome.get() {
            Some(outcome) => ClearanceState::Done(*outcome),
            None => ClearanceState::Watching,
        }
    }

    /// Ask for an early sample. Coalesces; never ends a watch by itself.
    pub fn nudge(&self) {
        self.nudge.notify_one();
    }

    /// Watch until cleared or timed out.
    ///
    /// Dropping the future stops the timers. Calling again after an outcome
    /// was reached returns that outcome without sampling.
    pub async fn watch(&self) -> ClearanceOutcome {
        if let Some(outcome) = self.outcome.get() {
            return *outcome;
        }

        let started = Instant::now();
        let deadline = tokio::time::sleep_until(started + self.deadline);
        tokio::pin!(deadline);
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let outcome = loop {
            tokio::select! {
                biased;
                _ = &mut deadline => break ClearanceOutcome::TimedOut,
                _ = ticker.tick() => {}
                _ = self.nudge.notified() => {}
            }
            // A stalled sample must not hold the deadline off.
            tokio::select! {
                biased;
                _ = &mut deadline => break ClearanceOutcome::TimedOut,
                clear = self.sample_is_clear() => {
                    if clear {
                        break ClearanceOutcome::Cleared;
                    }
                }
            }
        };

        let outcome = *self.outcome.get_or_init(|| outcome);
        match outcome {
            ClearanceOutcome::Cleared => tracing::info!(
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Challenge cleared"
            ),
            ClearanceOutcome::TimedOut => {
                tracing::info!("Challenge check timed out, releasing anyway")
            }
        }
        outcome
    }

    async fn sample_is_clear(&self) -> bool {
        let snapshot = match self.probe.sample(self.matcher.selectors()).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!(error = %e, "Page sample failed, still watching");
                return false;
            }
        };
        match self.matcher.detect(&snapshot) {
            Some(detection) => {
                tracing::debug!(signature = ?detection, "Challenge still present");
                false
            }
            None => true,
        }
    }
}
