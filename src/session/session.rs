use chrono::{DateTime, Local, Utc};
use log::{debug, info, warn};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep};

use crate::config::config::{ConfigError, ScheduleConfig, Settings};
use crate::protocol::protocol::{ClientMessage, ServerMessage};
use crate::provider::segment::{SegmentProvider, TranslatedSegment};
use crate::scheduler::scheduler::{ArmedTimer, PauseScheduler, SchedulerState, TimerToken};
use crate::scheduler::timing::PlaybackClock;
use crate::similarity::similarity::SimilarityResult;

pub type ClientSender = mpsc::UnboundedSender<ClientMessage>;
pub type ClientReceiver = mpsc::UnboundedReceiver<ClientMessage>;
pub type OutboundSender = mpsc::UnboundedSender<ServerMessage>;
pub type OutboundReceiver = mpsc::UnboundedReceiver<ServerMessage>;

type EventSender = mpsc::UnboundedSender<SessionEvent>;
type EventReceiver = mpsc::UnboundedReceiver<SessionEvent>;

pub fn create_outbound_channel() -> (OutboundSender, OutboundReceiver) {
    mpsc::unbounded_channel()
}

/// What a session falls back to when `startSession` leaves fields out.
#[derive(Debug, Clone)]
pub struct SessionDefaults {
    pub language: String,
    pub schedule: ScheduleConfig,
}

impl SessionDefaults {
    pub fn from_settings(settings: &Settings) -> Result<Self, ConfigError> {
        Ok(Self {
            language: settings.language.clone(),
            schedule: settings.schedule()?,
        })
    }
}

// Events raised by tasks the session spawned. `video` is the generation of
// the video session that spawned them.
#[derive(Debug)]
enum SessionEvent {
    TimerFired {
        video: u64,
        token: TimerToken,
    },
    SegmentReady {
        video: u64,
        token: TimerToken,
        segment: TranslatedSegment,
    },
}

#[derive(Debug, Default)]
struct PracticeStats {
    attempts: u32,
    total_score: f64,
}

impl PracticeStats {
    fn record(&mut self, score: f64) {
        self.attempts += 1;
        self.total_score += score;
    }

    fn average(&self) -> Option<f64> {
        (self.attempts > 0).then(|| self.total_score / self.attempts as f64)
    }
}

struct VideoSession {
    generation: u64,
    video_id: String,
    target_lang: String,
    scheduler: PauseScheduler,
    clock: PlaybackClock,
    presented: Option<TranslatedSegment>,
    stats: PracticeStats,
    started_at: DateTime<Local>,
    timer: Option<JoinHandle<()>>,
}

impl VideoSession {
    fn apply_arm(&mut self, armed: Option<ArmedTimer>, events: &EventSender, outbox: &OutboundSender) {
        let Some(armed) = armed else {
            return;
        };
        self.cancel_timer();

        let tx = events.clone();
        let video = self.generation;
        self.timer = Some(tokio::spawn(async move {
            sleep(armed.delay).await;
            let _ = tx.send(SessionEvent::TimerFired {
                video,
                token: armed.token,
            });
        }));

        info!("Will pause {} in {} seconds", self.video_id, armed.delay.as_secs());
        let _ = outbox.send(ServerMessage::Scheduled {
            delay_seconds: armed.delay.as_secs(),
        });
    }

    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }

    fn finish(&mut self, reason: &str, outbox: &OutboundSender) {
        if self.scheduler.state() == SchedulerState::Ended {
            return;
        }
        self.scheduler.notify_ended();
        self.cancel_timer();
        self.presented = None;

        let minutes = (Local::now() - self.started_at).num_minutes();
        let cycles = self.scheduler.completed_cycles();
        let average = self.stats.average();
        info!(
            "Session for {} finished ({}): {} cycles, {} attempts, average {}, {} minutes",
            self.video_id,
            reason,
            cycles,
            self.stats.attempts,
            average.map_or_else(|| "n/a".to_string(), |a| format!("{:.1}%", a)),
            minutes
        );

        let _ = outbox.send(ServerMessage::Summary {
            video_id: self.video_id.clone(),
            cycles,
            attempts: self.stats.attempts,
            average_similarity: average,
            minutes,
        });
    }
}

/// One connected client. Owns at most one video session at a time and
/// processes client messages and its own timer/fetch events in arrival order.
pub struct PracticeSession {
    provider: Arc<SegmentProvider>,
    defaults: SessionDefaults,
    outbox: OutboundSender,
    events: EventSender,
    video: Option<VideoSession>,
    generations: u64,
}

pub fn spawn_session(
    provider: Arc<SegmentProvider>,
    defaults: SessionDefaults,
    outbox: OutboundSender,
) -> (ClientSender, JoinHandle<()>) {
    let (client_tx, client_rx) = mpsc::unbounded_channel();
    let (events_tx, events_rx) = mpsc::unbounded_channel();

    let session = PracticeSession {
        provider,
        defaults,
        outbox,
        events: events_tx,
        video: None,
        generations: 0,
    };
    let handle = tokio::spawn(session.run(client_rx, events_rx));
    (client_tx, handle)
}

impl PracticeSession {
    async fn run(mut self, mut inbox: ClientReceiver, mut events: EventReceiver) {
        loop {
            tokio::select! {
                biased;
                message = inbox.recv() => match message {
                    Some(message) => self.handle_client(message),
                    None => break,
                },
                Some(event) = events.recv() => self.handle_event(event),
            }
        }

        if let Some(video) = self.video.as_mut() {
            video.finish("client disconnected", &self.outbox);
        }
        debug!("Practice session closed");
    }

    fn send(&self, message: ServerMessage) {
        if self.outbox.send(message).is_err() {
            debug!("Client went away before a reply could be sent");
        }
    }

    fn handle_client(&mut self, message: ClientMessage) {
        debug!("Client message: {:?}", message);
        match message {
            ClientMessage::StartSession {
                video_id,
                target_lang,
                min_interval_seconds,
                max_interval_seconds,
                current_time,
                playing,
            } => self.start_video(
                video_id,
                target_lang,
                (min_interval_seconds, max_interval_seconds),
                current_time,
                playing,
            ),
            ClientMessage::Play { current_time } => {
                let Some(video) = self.video.as_mut() else {
                    return self.send(no_session());
                };
                video.clock.observe(current_time, true, Instant::now());
                let was_presenting = video.scheduler.state() == SchedulerState::ScheduledPauseActive;
                let armed = video.scheduler.notify_manual_play();
                if was_presenting && armed.is_some() {
                    video.presented = None;
                }
                video.apply_arm(armed, &self.events, &self.outbox);
                debug!("{} is {:?}", video.video_id, video.scheduler.playback_state());
            }
            ClientMessage::Pause { current_time } => {
                let Some(video) = self.video.as_mut() else {
                    return self.send(no_session());
                };
                video.clock.observe(current_time, false, Instant::now());
                video.scheduler.notify_manual_pause();
                if video.scheduler.armed_timer().is_none() {
                    video.cancel_timer();
                }
                debug!("{} is {:?}", video.video_id, video.scheduler.playback_state());
            }
            ClientMessage::TimeUpdate { current_time } => {
                if let Some(video) = self.video.as_mut() {
                    let playing = video.clock.is_playing();
                    video.clock.observe(current_time, playing, Instant::now());
                }
            }
            ClientMessage::Resume => {
                let Some(video) = self.video.as_mut() else {
                    return self.send(no_session());
                };
                if let Some(cycle) = video.scheduler.active_cycle() {
                    info!(
                        "Pause at {:.2}s (armed for {}ms) lasted {}s",
                        cycle.triggered_at_playback_time,
                        cycle.delay_chosen_ms,
                        (Utc::now() - cycle.started_at).num_seconds()
                    );
                }
                let armed = video.scheduler.resume();
                if armed.is_some() {
                    video.presented = None;
                    video.clock.set_playing(true, Instant::now());
                    info!("Video {} resumed", video.video_id);
                }
                video.apply_arm(armed, &self.events, &self.outbox);
            }
            ClientMessage::Ended => {
                if let Some(video) = self.video.as_mut() {
                    video.finish("video ended", &self.outbox);
                }
            }
            ClientMessage::Stop => {
                if let Some(mut video) = self.video.take() {
                    video.finish("practice stopped", &self.outbox);
                }
            }
            ClientMessage::Recognized { spoken } => self.score_recognized(spoken),
            ClientMessage::CheckSimilarity { original, spoken } => {
                if original.is_empty() || spoken.is_empty() {
                    return self.send(ServerMessage::invalid_input(
                        "Both original and spoken text are required",
                    ));
                }
                self.send(ServerMessage::similarity(SimilarityResult::compute(&original, &spoken)));
            }
            ClientMessage::Transcript { video_id } => {
                let provider = Arc::clone(&self.provider);
                let outbox = self.outbox.clone();
                tokio::spawn(async move {
                    let reply = match provider.fetch_transcript(&video_id).await {
                        Ok(transcript) => ServerMessage::Transcript {
                            video_id,
                            transcript,
                        },
                        Err(e) => e.into(),
                    };
                    let _ = outbox.send(reply);
                });
            }
            ClientMessage::RandomSegment {
                video_id,
                target_lang,
            } => {
                let target_lang = target_lang
                    .filter(|lang| !lang.is_empty())
                    .unwrap_or_else(|| self.defaults.language.clone());
                let provider = Arc::clone(&self.provider);
                let outbox = self.outbox.clone();
                tokio::spawn(async move {
                    let reply = match provider
                        .fetch_random_translated_segment(&video_id, &target_lang)
                        .await
                    {
                        Ok(segment) => ServerMessage::segment(segment),
                        Err(e) => e.into(),
                    };
                    let _ = outbox.send(reply);
                });
            }
        }
    }

    fn start_video(
        &mut self,
        video_id: String,
        target_lang: Option<String>,
        interval: (Option<u64>, Option<u64>),
        current_time: f64,
        playing: bool,
    ) {
        if video_id.trim().is_empty() {
            return self.send(ServerMessage::invalid_input("missing video id"));
        }

        let schedule = match interval {
            (None, None) => Ok(self.defaults.schedule),
            (min, max) => ScheduleConfig::new(
                min.unwrap_or(self.defaults.schedule.min_interval_seconds()),
                max.unwrap_or(self.defaults.schedule.max_interval_seconds()),
            ),
        };
        let schedule = match schedule {
            Ok(schedule) => schedule,
            Err(e) => return self.send(ServerMessage::invalid_input(e.to_string())),
        };

        if let Some(mut previous) = self.video.take() {
            previous.finish("replaced by a new session", &self.outbox);
        }

        self.generations += 1;
        let mut scheduler = PauseScheduler::new(schedule);
        let armed = if playing {
            scheduler.start()
        } else {
            scheduler.notify_manual_pause();
            None
        };

        let target_lang = target_lang
            .filter(|lang| !lang.is_empty())
            .unwrap_or_else(|| self.defaults.language.clone());
        info!(
            "Practice session for {} ({}), pausing every {}-{}s",
            video_id,
            target_lang,
            schedule.min_interval_seconds(),
            schedule.max_interval_seconds()
        );

        let mut video = VideoSession {
            generation: self.generations,
            video_id,
            target_lang,
            scheduler,
            clock: PlaybackClock::new(current_time, playing, Instant::now()),
            presented: None,
            stats: PracticeStats::default(),
            started_at: Local::now(),
            timer: None,
        };
        video.apply_arm(armed, &self.events, &self.outbox);
        self.video = Some(video);
    }

    fn score_recognized(&mut self, spoken: String) {
        let Some(video) = self.video.as_mut() else {
            return self.send(no_session());
        };
        let Some(presented) = video.presented.as_ref() else {
            return self.send(ServerMessage::invalid_input("no segment is being presented"));
        };

        let result = SimilarityResult::compute(&presented.translated_text, &spoken);
        video.stats.record(result.score_percent);
        info!(
            "You said {:?}: {:.1}% ({})",
            spoken,
            result.score_percent,
            result.grade().as_str()
        );
        self.send(ServerMessage::similarity(result));
    }

    fn handle_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::TimerFired { video, token } => {
                let Some(session) = self.video.as_mut().filter(|s| s.generation == video) else {
                    return;
                };
                let now = Instant::now();
                let at_time = session.clock.current_time(now);
                let Some(pause) = session.scheduler.timer_fired(token, at_time) else {
                    return;
                };
                session.timer = None;
                session.clock.set_playing(false, now);
                info!("Video {} paused at {:.2}s", session.video_id, pause.at_time);
                let _ = self.outbox.send(ServerMessage::Pause {
                    at_time: pause.at_time,
                });

                let provider = Arc::clone(&self.provider);
                let events = self.events.clone();
                let video_id = session.video_id.clone();
                let target_lang = session.target_lang.clone();
                tokio::spawn(async move {
                    let segment = provider.fetch_or_fallback(&video_id, &target_lang).await;
                    let _ = events.send(SessionEvent::SegmentReady {
                        video,
                        token: pause.token,
                        segment,
                    });
                });
            }
            SessionEvent::SegmentReady {
                video,
                token,
                segment,
            } => {
                let Some(session) = self.video.as_mut().filter(|s| s.generation == video) else {
                    return;
                };
                if session.scheduler.active_cycle().map(|cycle| cycle.token) != Some(token) {
                    warn!("Dropping segment for a pause cycle that already ended");
                    return;
                }
                info!("Original text: {}", segment.original_segment.text);
                info!("Translated text: {}", segment.translated_text);
                let _ = self.outbox.send(ServerMessage::present(&segment));
                session.presented = Some(segment);
            }
        }
    }
}

fn no_session() -> ServerMessage {
    ServerMessage::invalid_input("no practice session; send startSession first")
}
