use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use crossterm::event::{self, Event as CtEvent, KeyEvent};

pub type TimerId = u64;

/// Unified event type consumed by the app runner. Keys, resizes and countdown
/// ticks share one queue so a single owner applies them in order.
#[derive(Clone, Debug)]
pub enum QuizEvent {
    Key(KeyEvent),
    Resize,
    Tick(TimerId),
}

/// Source of queued events
pub trait QuizEventSource {
    /// Block for up to `timeout` waiting for an event.
    fn recv_timeout(&self, timeout: Duration) -> Result<QuizEvent, RecvTimeoutError>;
}

/// Production event source: a background thread forwards crossterm input into
/// the shared queue.
pub struct CrosstermEventSource {
    rx: Receiver<QuizEvent>,
}

impl CrosstermEventSource {
    /// Returns the source and a sender for other producers (the countdown).
    pub fn new() -> (Self, Sender<QuizEvent>) {
        let (tx, rx) = mpsc::channel();
        let key_tx = tx.clone();

        std::thread::spawn(move || loop {
            let forwarded = match event::read() {
                Ok(CtEvent::Key(key)) => key_tx.send(QuizEvent::Key(key)),
                Ok(CtEvent::Resize(_, _)) => key_tx.send(QuizEvent::Resize),
                Ok(_) => Ok(()),
                Err(_) => break,
            };
            if forwarded.is_err() {
                break;
            }
        });

        (Self { rx }, tx)
    }
}

impl QuizEventSource for CrosstermEventSource {
    fn recv_timeout(&self, timeout: Duration) -> Result<QuizEvent, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }
}

/// Test event source for unit tests
pub struct TestEventSource {
    rx: Receiver<QuizEvent>,
}

impl TestEventSource {
    pub fn new(rx: Receiver<QuizEvent>) -> Self {
        Self { rx }
    }
}

impl QuizEventSource for TestEventSource {
    fn recv_timeout(&self, timeout: Duration) -> Result<QuizEvent, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }
}

/// Runner that hands the app one queued event at a time
pub struct Runner<E: QuizEventSource> {
    event_source: E,
    poll_interval: Duration,
}

impl<E: QuizEventSource> Runner<E> {
    pub fn new(event_source: E, poll_interval: Duration) -> Self {
        Self {
            event_source,
            poll_interval,
        }
    }

    /// Blocks up to the poll interval; `None` when nothing arrived.
    pub fn step(&self) -> Option<QuizEvent> {
        match self.event_source.recv_timeout(self.poll_interval) {
            Ok(ev) => Some(ev),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }
}

/// An owned, cancellable recurring timer.
pub trait TimerHandle {
    fn id(&self) -> TimerId;
    /// Stop future ticks. Calling it again has no further effect.
    fn cancel(&mut self);
    fn is_cancelled(&self) -> bool;
}

/// Creates recurring timers that deliver `QuizEvent::Tick(id)`.
pub trait Scheduler {
    fn schedule_every(&mut self, interval: Duration) -> Box<dyn TimerHandle>;
}

/// One sleeping thread per timer, ticking into the shared event queue.
pub struct ThreadScheduler {
    tx: Sender<QuizEvent>,
    next_id: TimerId,
}

impl ThreadScheduler {
    pub fn new(tx: Sender<QuizEvent>) -> Self {
        Self { tx, next_id: 1 }
    }
}

impl Scheduler for ThreadScheduler {
    fn schedule_every(&mut self, interval: Duration) -> Box<dyn TimerHandle> {
        let id = self.next_id;
        self.next_id += 1;

        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancelled);
        let tx = self.tx.clone();

        let thread = std::thread::spawn(move || loop {
            std::thread::sleep(interval);
            if flag.load(Ordering::SeqCst) || tx.send(QuizEvent::Tick(id)).is_err() {
                break;
            }
        });

        Box::new(ThreadTimer {
            id,
            cancelled,
            thread: Some(thread),
        })
    }
}

struct ThreadTimer {
    id: TimerId,
    cancelled: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl TimerHandle for ThreadTimer {
    fn id(&self) -> TimerId {
        self.id
    }

    fn cancel(&mut self) {
        self.cancelled.store(true, Ordering::SeqCst);
        // the thread notices on its next wake; ticks already queued are
        // filtered by id on the receiving side
        self.thread.take();
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

impl Drop for ThreadTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[derive(Debug, Default)]
struct TimerLog {
    scheduled: Vec<(TimerId, Duration)>,
    cancels: HashMap<TimerId, u32>,
}

/// Scheduler that never fires on its own. Tests drive ticks by hand and
/// inspect how timers were created and cancelled.
#[derive(Debug, Clone, Default)]
pub struct ManualScheduler {
    log: Arc<Mutex<TimerLog>>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scheduled(&self) -> Vec<TimerId> {
        self.with_log(|log| log.scheduled.iter().map(|(id, _)| *id).collect())
    }

    pub fn interval_of(&self, id: TimerId) -> Option<Duration> {
        self.with_log(|log| {
            log.scheduled
                .iter()
                .find(|(sid, _)| *sid == id)
                .map(|(_, interval)| *interval)
        })
    }

    /// How many times `cancel` was called on the timer `id`.
    pub fn cancel_count(&self, id: TimerId) -> u32 {
        self.with_log(|log| log.cancels.get(&id).copied().unwrap_or(0))
    }

    pub fn active(&self) -> Vec<TimerId> {
        self.with_log(|log| {
            log.scheduled
                .iter()
                .map(|(id, _)| *id)
                .filter(|id| !log.cancels.contains_key(id))
                .collect()
        })
    }

    fn with_log<T>(&self, f: impl FnOnce(&TimerLog) -> T) -> T {
        f(&self.log.lock().unwrap_or_else(|poisoned| poisoned.into_inner()))
    }
}

impl Scheduler for ManualScheduler {
    fn schedule_every(&mut self, interval: Duration) -> Box<dyn TimerHandle> {
        let mut log = self.log.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let id = log.scheduled.len() as TimerId + 1;
        log.scheduled.push((id, interval));
        drop(log);

        Box::new(ManualTimer {
            id,
            cancelled: false,
            log: Arc::clone(&self.log),
        })
    }
}

struct ManualTimer {
    id: TimerId,
    cancelled: bool,
    log: Arc<Mutex<TimerLog>>,
}

impl TimerHandle for ManualTimer {
    fn id(&self) -> TimerId {
        self.id
    }

    // every call is recorded so tests can catch double cancellation
    fn cancel(&mut self) {
        self.cancelled = true;
        let mut log = self.log.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *log.cancels.entry(self.id).or_insert(0) += 1;
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled
    }
}
