use rand::Rng;
use tokio::time::Instant;

use crate::config::config::ScheduleConfig;

/// Draws a whole number of seconds uniformly from the configured bounds, inclusive.
pub fn draw_delay_seconds<R: Rng>(rng: &mut R, config: &ScheduleConfig) -> u64 {
    rng.gen_range(config.min_interval_seconds()..=config.max_interval_seconds())
}

/// Estimates the video's playback position between reports from the client.
///
/// The client only reports `currentTime` alongside play/pause/timeUpdate
/// signals; while playing, the position advances with the monotonic clock.
#[derive(Debug, Clone, Copy)]
pub struct PlaybackClock {
    position: f64,
    playing_since: Option<Instant>,
}

impl PlaybackClock {
    pub fn new(position: f64, playing: bool, now: Instant) -> Self {
        Self {
            position: sanitize(position),
            playing_since: playing.then_some(now),
        }
    }

    pub fn observe(&mut self, position: f64, playing: bool, now: Instant) {
        self.position = sanitize(position);
        self.playing_since = playing.then_some(now);
    }

    /// Keeps the position estimate and changes only whether it advances.
    pub fn set_playing(&mut self, playing: bool, now: Instant) {
        self.position = self.current_time(now);
        self.playing_since = playing.then_some(now);
    }

    pub fn is_playing(&self) -> bool {
        self.playing_since.is_some()
    }

    pub fn current_time(&self, now: Instant) -> f64 {
        match self.playing_since {
            Some(since) => self.position + now.saturating_duration_since(since).as_secs_f64(),
            None => self.position,
        }
    }
}

fn sanitize(position: f64) -> f64 {
    if position.is_finite() && position > 0.0 {
        position
    } else {
        0.0
    }
}
