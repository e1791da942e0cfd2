use crate::history::{HistoryEntry, HistoryStore};
use crate::question::{generate, GenerationConfig, Question, RandomSource};
use crate::runtime::{Scheduler, TimerHandle, TimerId};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::mpsc::{self, Receiver, Sender};
use std::time::Duration;

pub const SESSION_SECS: u32 = 120;
pub const TICK_INTERVAL: Duration = Duration::from_secs(1);
pub const ANSWER_EPSILON: f64 = 1e-9;
pub const TIME_UP_TEXT: &str = "Time is up!";

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum SessionStatus {
    Idle,
    Running,
    Finished,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionState {
    pub status: SessionStatus,
    pub seconds_remaining: u32,
    pub score: u32,
    pub current_question: Option<Question>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            status: SessionStatus::Idle,
            seconds_remaining: 0,
            score: 0,
            current_question: None,
        }
    }
}

/// Sent to subscribers after each state change.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Started { seconds_remaining: u32 },
    Ticked { seconds_remaining: u32 },
    Scored { score: u32 },
    /// The store rejected the final entry. The session still finishes.
    PersistFailed { message: String },
    Finished { entry: HistoryEntry },
    Abandoned,
}

/// True when `input` is within [`ANSWER_EPSILON`] of `expected`.
///
/// The bound is inclusive and widened by one relative ulp, so a decimal input
/// written exactly 1e-9 away (e.g. "2.000000001" for 2) still counts.
pub fn answer_matches(input: f64, expected: f64) -> bool {
    let slack = f64::EPSILON * input.abs().max(expected.abs()).max(1.0);
    (input - expected).abs() <= ANSWER_EPSILON + slack
}

/// Drives one timed run at a time for a single user.
///
/// All mutation goes through `&mut self`, so the owner of the controller is
/// the single writer: countdown ticks and answer edits are applied in the
/// order the owner receives them.
pub struct SessionController<S: HistoryStore> {
    username: String,
    config: GenerationConfig,
    state: SessionState,
    store: S,
    rng: Box<dyn RandomSource>,
    scheduler: Box<dyn Scheduler>,
    countdown: Option<Box<dyn TimerHandle>>,
    subscribers: Vec<Sender<SessionEvent>>,
    last_persist_error: Option<String>,
}

impl<S: HistoryStore> SessionController<S> {
    pub fn new(username: impl Into<String>, store: S, scheduler: Box<dyn Scheduler>) -> Self {
        Self {
            username: username.into(),
            config: GenerationConfig::default(),
            state: SessionState::default(),
            store,
            rng: Box::new(StdRng::from_entropy()),
            scheduler,
            countdown: None,
            subscribers: Vec::new(),
            last_persist_error: None,
        }
    }

    pub fn with_rng(mut self, rng: Box<dyn RandomSource>) -> Self {
        self.rng = rng;
        self
    }

    pub fn with_config(mut self, config: GenerationConfig) -> Self {
        self.config = config;
        self
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn config(&self) -> &GenerationConfig {
        &self.config
    }

    /// Replace the generation settings used by the next `start`.
    pub fn set_config(&mut self, config: GenerationConfig) {
        self.config = config;
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn status(&self) -> SessionStatus {
        self.state.status
    }

    pub fn is_running(&self) -> bool {
        self.state.status == SessionStatus::Running
    }

    pub fn score(&self) -> u32 {
        self.state.score
    }

    pub fn seconds_remaining(&self) -> u32 {
        self.state.seconds_remaining
    }

    pub fn current_question(&self) -> Option<&Question> {
        self.state.current_question.as_ref()
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn last_persist_error(&self) -> Option<&str> {
        self.last_persist_error.as_deref()
    }

    /// The id of the live countdown, if any.
    pub fn countdown_id(&self) -> Option<TimerId> {
        self.countdown.as_ref().map(|c| c.id())
    }

    pub fn subscribe(&mut self) -> Receiver<SessionEvent> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.push(tx);
        rx
    }

    /// Begin a new run. Returns `false`, changing nothing, while a run is
    /// already in progress.
    pub fn start(&mut self, config: GenerationConfig) -> bool {
        if self.is_running() {
            tracing::debug!(user = %self.username, "start ignored, session already running");
            return false;
        }

        self.cancel_countdown();
        self.config = config;
        self.last_persist_error = None;
        self.state = SessionState {
            status: SessionStatus::Running,
            seconds_remaining: SESSION_SECS,
            score: 0,
            current_question: Some(generate(&self.config, self.rng.as_mut())),
        };
        self.countdown = Some(self.scheduler.schedule_every(TICK_INTERVAL));

        tracing::info!(
            user = %self.username,
            operators = ?self.config.enabled_operators,
            "session started"
        );
        self.notify(SessionEvent::Started {
            seconds_remaining: SESSION_SECS,
        });
        true
    }

    /// Route a countdown tick. Ticks from a cancelled or replaced timer are
    /// dropped.
    pub fn on_timer(&mut self, id: TimerId) -> SessionStatus {
        if self.countdown_id() != Some(id) {
            tracing::debug!(timer = id, "dropping stale tick");
            return self.state.status;
        }
        self.tick()
    }

    /// One elapsed second.
    pub fn tick(&mut self) -> SessionStatus {
        if !self.is_running() {
            return self.state.status;
        }

        self.state.seconds_remaining = self.state.seconds_remaining.saturating_sub(1);
        if self.state.seconds_remaining == 0 {
            self.finish();
        } else {
            self.notify(SessionEvent::Ticked {
                seconds_remaining: self.state.seconds_remaining,
            });
        }
        self.state.status
    }

    /// Check the full text of the answer box. Returns `true` when it scored.
    pub fn submit_answer(&mut self, raw: &str) -> bool {
        if !self.is_running() {
            return false;
        }
        let Some(expected) = self
            .state
            .current_question
            .as_ref()
            .and_then(Question::expected_answer)
        else {
            return false;
        };
        let Ok(value) = raw.trim().parse::<f64>() else {
            return false;
        };
        if !answer_matches(value, expected) {
            return false;
        }

        self.state.score += 1;
        self.state.current_question = Some(generate(&self.config, self.rng.as_mut()));
        self.notify(SessionEvent::Scored {
            score: self.state.score,
        });
        true
    }

    /// Stop a run without recording it.
    pub fn abandon(&mut self) {
        if !self.is_running() {
            return;
        }
        self.cancel_countdown();
        self.state = SessionState::default();
        tracing::info!(user = %self.username, "session abandoned");
        self.notify(SessionEvent::Abandoned);
    }

    fn finish(&mut self) {
        self.cancel_countdown();
        self.state.status = SessionStatus::Finished;
        self.state.seconds_remaining = 0;
        self.state.current_question = Some(Question::message(TIME_UP_TEXT));

        let entry = HistoryEntry::now(self.state.score);
        if let Err(e) = self.store.append(&self.username, &entry) {
            tracing::warn!(user = %self.username, error = %e, "failed to save session score");
            let message = e.to_string();
            self.last_persist_error = Some(message.clone());
            self.notify(SessionEvent::PersistFailed { message });
        }

        tracing::info!(user = %self.username, score = entry.score, "session finished");
        self.notify(SessionEvent::Finished { entry });
    }

    fn cancel_countdown(&mut self) {
        if let Some(mut countdown) = self.countdown.take() {
            countdown.cancel();
        }
    }

    fn notify(&mut self, event: SessionEvent) {
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}

impl<S: HistoryStore> Drop for SessionController<S> {
    fn drop(&mut self) {
        self.cancel_countdown();
    }
}
