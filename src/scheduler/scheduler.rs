use chrono::{DateTime, Utc};
use log::debug;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::time::Duration;

use crate::config::config::ScheduleConfig;

use super::timing::draw_delay_seconds;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// Playing with no timer armed yet.
    Playing,
    ManuallyPaused,
    /// Playing, with a scheduled pause pending.
    ScheduledPauseArmed,
    /// Paused by the scheduler, waiting for the presentation step to resume.
    ScheduledPauseActive,
    Ended,
}

/// Coarse playback view exposed to readers of the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Playing,
    ManuallyPaused,
    ScheduledPause,
    Ended,
}

impl SchedulerState {
    pub fn playback(&self) -> PlaybackState {
        match self {
            SchedulerState::Playing | SchedulerState::ScheduledPauseArmed => PlaybackState::Playing,
            SchedulerState::ManuallyPaused => PlaybackState::ManuallyPaused,
            SchedulerState::ScheduledPauseActive => PlaybackState::ScheduledPause,
            SchedulerState::Ended => PlaybackState::Ended,
        }
    }

    pub(crate) fn as_str(&self) -> &str {
        match self {
            SchedulerState::Playing => "PLAYING",
            SchedulerState::ManuallyPaused => "MANUALLY_PAUSED",
            SchedulerState::ScheduledPauseArmed => "ARMED",
            SchedulerState::ScheduledPauseActive => "SCHEDULED_PAUSE",
            SchedulerState::Ended => "ENDED",
        }
    }
}

/// Identifies one arming. A fire carrying any other token is stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerToken(u64);

impl TimerToken {
    pub fn id(&self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArmedTimer {
    pub token: TimerToken,
    pub delay: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PauseCycle {
    pub token: TimerToken,
    pub triggered_at_playback_time: f64,
    pub delay_chosen_ms: u64,
    pub started_at: DateTime<Utc>,
}

/// Emitted when the scheduler pauses playback.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PauseTriggered {
    pub token: TimerToken,
    pub at_time: f64,
}

/// Per-video pause state machine.
///
/// Does no IO: arming returns an [`ArmedTimer`] the caller is expected to
/// run, and the caller reports back through [`PauseScheduler::timer_fired`].
/// Only the most recently armed token can trigger a pause.
#[derive(Debug)]
pub struct PauseScheduler {
    config: ScheduleConfig,
    state: SchedulerState,
    rng: StdRng,
    next_token: u64,
    armed: Option<ArmedTimer>,
    cycle: Option<PauseCycle>,
    completed_cycles: u32,
}

impl PauseScheduler {
    pub fn new(config: ScheduleConfig) -> Self {
        Self::with_rng(config, StdRng::from_entropy())
    }

    pub fn with_rng(config: ScheduleConfig, rng: StdRng) -> Self {
        Self {
            config,
            state: SchedulerState::Playing,
            rng,
            next_token: 0,
            armed: None,
            cycle: None,
            completed_cycles: 0,
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn playback_state(&self) -> PlaybackState {
        self.state.playback()
    }

    pub fn armed_timer(&self) -> Option<ArmedTimer> {
        self.armed
    }

    pub fn active_cycle(&self) -> Option<&PauseCycle> {
        self.cycle.as_ref()
    }

    pub fn completed_cycles(&self) -> u32 {
        self.completed_cycles
    }

    /// Arms the first timer of a session that begins in `Playing`.
    pub fn start(&mut self) -> Option<ArmedTimer> {
        match self.state {
            SchedulerState::Playing => Some(self.arm()),
            _ => None,
        }
    }

    pub fn timer_fired(&mut self, token: TimerToken, at_time: f64) -> Option<PauseTriggered> {
        let armed = match self.armed {
            Some(armed) if armed.token == token => armed,
            _ => {
                debug!("Discarding stale timer {} in {}", token.id(), self.state.as_str());
                return None;
            }
        };
        if self.state != SchedulerState::ScheduledPauseArmed {
            debug!("Discarding timer {} fired in {}", token.id(), self.state.as_str());
            self.armed = None;
            return None;
        }

        self.armed = None;
        self.state = SchedulerState::ScheduledPauseActive;
        self.cycle = Some(PauseCycle {
            token,
            triggered_at_playback_time: at_time,
            delay_chosen_ms: armed.delay.as_millis() as u64,
            started_at: Utc::now(),
        });

        Some(PauseTriggered { token, at_time })
    }

    /// Presentation finished; playback continues with a freshly drawn delay.
    pub fn resume(&mut self) -> Option<ArmedTimer> {
        if self.state != SchedulerState::ScheduledPauseActive {
            debug!("Ignoring resume in {}", self.state.as_str());
            return None;
        }

        self.cycle = None;
        self.completed_cycles += 1;
        self.state = SchedulerState::Playing;
        Some(self.arm())
    }

    pub fn notify_manual_pause(&mut self) {
        match self.state {
            SchedulerState::Playing | SchedulerState::ScheduledPauseArmed => {
                self.armed = None;
                self.state = SchedulerState::ManuallyPaused;
            }
            _ => {}
        }
    }

    pub fn notify_manual_play(&mut self) -> Option<ArmedTimer> {
        match self.state {
            SchedulerState::ManuallyPaused => {
                self.state = SchedulerState::Playing;
                Some(self.arm())
            }
            // Playing past the overlay counts as finishing the cycle.
            SchedulerState::ScheduledPauseActive => self.resume(),
            _ => None,
        }
    }

    pub fn notify_ended(&mut self) {
        self.armed = None;
        self.cycle = None;
        self.state = SchedulerState::Ended;
    }

    fn arm(&mut self) -> ArmedTimer {
        let seconds = draw_delay_seconds(&mut self.rng, &self.config);
        self.next_token += 1;
        let armed = ArmedTimer {
            token: TimerToken(self.next_token),
            delay: Duration::from_secs(seconds),
        };
        self.armed = Some(armed);
        self.state = SchedulerState::ScheduledPauseArmed;
        armed
    }
}
