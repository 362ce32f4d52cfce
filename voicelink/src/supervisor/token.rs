/// Credential refresh state machine
///
/// Keeps a short-lived credential valid for a long-running session by
/// refreshing it before expiry. Fetch failures are retried with
/// exponential backoff while the existing (still valid) transport is left
/// untouched; only a successful fetch triggers re-establishment. A
/// generation counter fences late fetch results so a fetch that resolves
/// after `stop()` cannot mutate state.

use std::time::Duration;

use tracing::{debug, info, warn};

use super::backoff::BackoffPolicy;

/// How long before expiry a refresh should land
pub const REFRESH_MARGIN: Duration = Duration::from_secs(15);

/// Floor for the recurring refresh interval
pub const MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(30);

/// Side effects the driver must execute, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshAction {
    /// Arm (or re-arm) the recurring refresh timer
    ScheduleRecurring(Duration),

    /// Arm a one-shot retry after a failed refresh
    ScheduleRetry(Duration),

    /// Cancel every armed refresh timer
    CancelTimer,

    /// Fetch a new credential; the outcome must be reported back with
    /// this generation
    RefreshCredential(u64),

    /// Swap the transport over to the freshly fetched credential
    ReplaceTransport,

    /// Refresh budget exhausted; surface a terminal status
    ReportTerminalFailure,
}

/// Supervisor for one credential's refresh schedule
#[derive(Debug)]
pub struct TokenRefreshSupervisor {
    backoff: BackoffPolicy,

    /// Bumped on every start/stop; stale fetch outcomes are discarded
    generation: u64,

    /// Reentrancy guard: one refresh at a time
    refresh_in_flight: bool,

    /// Budget exhausted; only a restart clears this
    terminal: bool,

    /// Whether a schedule is currently armed
    active: bool,
}

impl TokenRefreshSupervisor {
    /// Create a supervisor with the given retry policy
    pub fn new(backoff: BackoffPolicy) -> Self {
        Self {
            backoff,
            generation: 0,
            refresh_in_flight: false,
            terminal: false,
            active: false,
        }
    }

    /// Recurring refresh interval for a credential lifetime:
    /// `max(expires_in - 15s, 30s)`
    pub fn refresh_interval(expires_in: Duration) -> Duration {
        expires_in
            .saturating_sub(REFRESH_MARGIN)
            .max(MIN_REFRESH_INTERVAL)
    }

    /// Current fence generation
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Refresh attempts consumed since the last success
    pub fn attempts(&self) -> u32 {
        self.backoff.attempts()
    }

    /// Whether a schedule is armed
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Whether the refresh budget was exhausted
    pub fn is_terminal(&self) -> bool {
        self.terminal
    }

    /// Start (or restart) the recurring refresh schedule
    ///
    /// Idempotent: any previously armed timer is replaced.
    pub fn start(&mut self, expires_in: Duration) -> Vec<RefreshAction> {
        self.generation += 1;
        self.refresh_in_flight = false;
        self.terminal = false;
        self.active = true;
        self.backoff.reset();
        let interval = Self::refresh_interval(expires_in);
        info!(
            interval_ms = interval.as_millis() as u64,
            "credential refresh schedule started"
        );
        vec![RefreshAction::ScheduleRecurring(interval)]
    }

    /// Stop the schedule; a fetch already in flight is fenced off
    pub fn stop(&mut self) -> Vec<RefreshAction> {
        if !self.active {
            return Vec::new();
        }
        self.generation += 1;
        self.refresh_in_flight = false;
        self.active = false;
        info!("credential refresh schedule stopped");
        vec![RefreshAction::CancelTimer]
    }

    /// The recurring timer or a retry timer fired
    pub fn refresh_tick(&mut self) -> Vec<RefreshAction> {
        if !self.active || self.terminal {
            return Vec::new();
        }
        if self.refresh_in_flight {
            debug!("refresh tick ignored, fetch already in flight");
            return Vec::new();
        }
        match self.backoff.next() {
            Some(_) => {
                self.refresh_in_flight = true;
                debug!(attempt = self.backoff.attempts(), "refreshing credential");
                vec![RefreshAction::RefreshCredential(self.generation)]
            }
            None => {
                self.terminal = true;
                self.active = false;
                warn!("credential refresh attempt budget exhausted");
                vec![
                    RefreshAction::CancelTimer,
                    RefreshAction::ReportTerminalFailure,
                ]
            }
        }
    }

    /// A refresh (fetch plus transport swap preparation) succeeded
    pub fn refresh_succeeded(&mut self, generation: u64) -> Vec<RefreshAction> {
        if generation != self.generation {
            debug!(generation, "stale refresh success ignored");
            return Vec::new();
        }
        self.refresh_in_flight = false;
        self.backoff.reset();
        info!("credential refreshed");
        vec![RefreshAction::ReplaceTransport]
    }

    /// A refresh failed; retry after backoff, leaving the old transport up
    pub fn refresh_failed(&mut self, generation: u64) -> Vec<RefreshAction> {
        if generation != self.generation {
            debug!(generation, "stale refresh failure ignored");
            return Vec::new();
        }
        self.refresh_in_flight = false;
        let delay = self.backoff.delay_for(self.backoff.attempts());
        warn!(
            attempt = self.backoff.attempts(),
            delay_ms = delay.as_millis() as u64,
            "credential refresh failed, retrying"
        );
        vec![RefreshAction::ScheduleRetry(delay)]
    }
}

impl Default for TokenRefreshSupervisor {
    fn default() -> Self {
        Self::new(BackoffPolicy::refresh())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refresh_interval_formula() {
        // 60s lifetime refreshes at 45s.
        assert_eq!(
            TokenRefreshSupervisor::refresh_interval(Duration::from_millis(60_000)),
            Duration::from_millis(45_000)
        );
        // Short lifetimes are clamped to the 30s floor.
        assert_eq!(
            TokenRefreshSupervisor::refresh_interval(Duration::from_millis(40_000)),
            Duration::from_millis(30_000)
        );
        assert_eq!(
            TokenRefreshSupervisor::refresh_interval(Duration::from_millis(10_000)),
            Duration::from_millis(30_000)
        );
        assert_eq!(
            TokenRefreshSupervisor::refresh_interval(Duration::from_millis(100_000)),
            Duration::from_millis(85_000)
        );
    }

    #[test]
    fn test_start_schedules_recurring_refresh() {
        let mut sup = TokenRefreshSupervisor::default();
        let actions = sup.start(Duration::from_millis(60_000));

        assert_eq!(
            actions,
            vec![RefreshAction::ScheduleRecurring(Duration::from_millis(45_000))]
        );
        assert!(sup.is_active());
    }

    #[test]
    fn test_restart_is_idempotent_and_fences_old_fetches() {
        let mut sup = TokenRefreshSupervisor::default();
        sup.start(Duration::from_millis(60_000));
        sup.refresh_tick();
        let old_generation = sup.generation();

        // Restart replaces the schedule and bumps the generation.
        let actions = sup.start(Duration::from_millis(120_000));
        assert_eq!(
            actions,
            vec![RefreshAction::ScheduleRecurring(Duration::from_millis(105_000))]
        );

        // The fetch begun under the old schedule resolves late.
        assert!(sup.refresh_succeeded(old_generation).is_empty());
        assert!(sup.refresh_failed(old_generation).is_empty());
    }

    #[test]
    fn test_failure_retries_with_growing_delay_then_reset() {
        let mut sup = TokenRefreshSupervisor::default();
        sup.start(Duration::from_millis(60_000));

        let generation = sup.generation();
        sup.refresh_tick();
        let actions = sup.refresh_failed(generation);
        assert_eq!(
            actions,
            vec![RefreshAction::ScheduleRetry(Duration::from_millis(1000))]
        );

        sup.refresh_tick();
        let actions = sup.refresh_failed(generation);
        assert_eq!(
            actions,
            vec![RefreshAction::ScheduleRetry(Duration::from_millis(2000))]
        );

        // A success resets the attempt counter.
        sup.refresh_tick();
        let actions = sup.refresh_succeeded(generation);
        assert_eq!(actions, vec![RefreshAction::ReplaceTransport]);
        assert_eq!(sup.attempts(), 0);
    }

    #[test]
    fn test_budget_exhaustion_is_terminal() {
        let mut sup = TokenRefreshSupervisor::default();
        sup.start(Duration::from_millis(60_000));
        let generation = sup.generation();

        for _ in 0..5 {
            sup.refresh_tick();
            sup.refresh_failed(generation);
        }

        let actions = sup.refresh_tick();
        assert_eq!(
            actions,
            vec![
                RefreshAction::CancelTimer,
                RefreshAction::ReportTerminalFailure
            ]
        );
        assert!(sup.is_terminal());
        assert!(!sup.is_active());

        // No further ticks do anything.
        assert!(sup.refresh_tick().is_empty());
    }

    #[test]
    fn test_restart_clears_terminal_state() {
        let mut sup = TokenRefreshSupervisor::default();
        sup.start(Duration::from_millis(60_000));
        let generation = sup.generation();
        for _ in 0..5 {
            sup.refresh_tick();
            sup.refresh_failed(generation);
        }
        sup.refresh_tick();
        assert!(sup.is_terminal());

        sup.start(Duration::from_millis(60_000));
        assert!(!sup.is_terminal());
        assert_eq!(
            sup.refresh_tick(),
            vec![RefreshAction::RefreshCredential(sup.generation())]
        );
    }

    #[test]
    fn test_tick_while_fetch_in_flight_is_ignored() {
        let mut sup = TokenRefreshSupervisor::default();
        sup.start(Duration::from_millis(60_000));

        assert_eq!(
            sup.refresh_tick(),
            vec![RefreshAction::RefreshCredential(sup.generation())]
        );
        // Overlapping tick must not start a second fetch.
        assert!(sup.refresh_tick().is_empty());
        assert_eq!(sup.attempts(), 1);
    }

    #[test]
    fn test_stop_cancels_and_fences() {
        let mut sup = TokenRefreshSupervisor::default();

        // Stop without a schedule is a no-op.
        assert!(sup.stop().is_empty());

        sup.start(Duration::from_millis(60_000));
        let generation = sup.generation();
        sup.refresh_tick();

        assert_eq!(sup.stop(), vec![RefreshAction::CancelTimer]);
        assert!(!sup.is_active());

        // The in-flight fetch resolves after the stop: ignored.
        assert!(sup.refresh_succeeded(generation).is_empty());
        assert!(sup.refresh_tick().is_empty());
    }
}
