use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use crate::history::{sorted_by_timestamp, HistoryEntry, HistoryStore};
use crate::question::Operator;
use crate::runtime::QuizEvent;
use crate::session::{SessionController, SessionStatus};

pub const DIGITS_RANGE: (u32, u32) = (1, 5);
pub const DECIMALS_RANGE: (u32, u32) = (0, 3);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppState {
    Quiz,
    History,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Terminal front end around one [`SessionController`].
pub struct App<S: HistoryStore> {
    pub controller: SessionController<S>,
    pub state: AppState,
    /// Text in the answer box; re-checked after every edit.
    pub answer: String,
    /// Sorted oldest first, loaded when the history screen opens.
    pub history: Vec<HistoryEntry>,
    pub notice: Option<String>,
}

impl<S: HistoryStore> App<S> {
    pub fn new(controller: SessionController<S>) -> Self {
        Self {
            controller,
            state: AppState::Quiz,
            answer: String::new(),
            history: Vec::new(),
            notice: None,
        }
    }

    pub fn handle_event(&mut self, event: QuizEvent) -> Flow {
        match event {
            QuizEvent::Tick(id) => {
                let was_running = self.controller.is_running();
                if self.controller.on_timer(id) == SessionStatus::Finished && was_running {
                    self.answer.clear();
                    self.notice = self
                        .controller
                        .last_persist_error()
                        .map(|e| format!("Score not saved: {e}"));
                }
                Flow::Continue
            }
            QuizEvent::Resize => Flow::Continue,
            QuizEvent::Key(key) => self.handle_key(key),
        }
    }

    pub fn handle_key(&mut self, key: KeyEvent) -> Flow {
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            return Flow::Quit;
        }

        match self.state {
            AppState::History => {
                if matches!(
                    key.code,
                    KeyCode::Esc | KeyCode::Backspace | KeyCode::Char('b')
                ) {
                    self.state = AppState::Quiz;
                }
                Flow::Continue
            }
            AppState::Quiz if self.controller.is_running() => {
                match key.code {
                    KeyCode::Char(c) => {
                        self.answer.push(c);
                        self.check_answer();
                    }
                    KeyCode::Backspace => {
                        self.answer.pop();
                        self.check_answer();
                    }
                    KeyCode::Esc => {
                        self.controller.abandon();
                        self.answer.clear();
                    }
                    _ => {}
                }
                Flow::Continue
            }
            AppState::Quiz => self.handle_menu_key(key.code),
        }
    }

    fn check_answer(&mut self) {
        if self.controller.submit_answer(&self.answer) {
            self.answer.clear();
        }
    }

    fn handle_menu_key(&mut self, code: KeyCode) -> Flow {
        let mut config = self.controller.config().clone();
        match code {
            KeyCode::Esc | KeyCode::Char('q') => return Flow::Quit,
            KeyCode::Enter => {
                self.answer.clear();
                self.notice = None;
                self.controller.start(config);
                return Flow::Continue;
            }
            KeyCode::Char('h') => {
                self.open_history();
                return Flow::Continue;
            }
            KeyCode::Char(c @ '1'..='4') => {
                let op = Operator::ALL[(c as u8 - b'1') as usize];
                let enabled = config.enabled_operators.contains(&op);
                config.set_operator(op, !enabled);
            }
            KeyCode::Char('a') => {
                config.addition_max_digits = cycle(config.addition_max_digits, DIGITS_RANGE)
            }
            KeyCode::Char('d') => {
                config.addition_max_decimals = cycle(config.addition_max_decimals, DECIMALS_RANGE)
            }
            KeyCode::Char('s') => {
                config.subtraction_max_digits = cycle(config.subtraction_max_digits, DIGITS_RANGE)
            }
            KeyCode::Char('f') => {
                config.subtraction_max_decimals =
                    cycle(config.subtraction_max_decimals, DECIMALS_RANGE)
            }
            _ => return Flow::Continue,
        }
        self.controller.set_config(config);
        Flow::Continue
    }

    pub fn open_history(&mut self) {
        match self
            .controller
            .store()
            .read_all(self.controller.username())
        {
            Ok(entries) => {
                self.history = sorted_by_timestamp(&entries);
                self.notice = None;
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to read history");
                self.history.clear();
                self.notice = Some(format!("Could not load history: {e}"));
            }
        }
        self.state = AppState::History;
    }
}

/// Step to the next value in `min..=max`, wrapping to `min`. Out-of-range
/// values (from a hand-edited config) also wrap to `min`.
fn cycle(value: u32, (min, max): (u32, u32)) -> u32 {
    if value >= max || value < min {
        min
    } else {
        value + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::MemoryHistoryStore;
    use crate::question::GenerationConfig;
    use crate::runtime::ManualScheduler;
    use crate::session::SESSION_SECS;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn app(config: GenerationConfig) -> (App<MemoryHistoryStore>, ManualScheduler) {
        let scheduler = ManualScheduler::new();
        let controller =
            SessionController::new("alice", MemoryHistoryStore::new(), Box::new(scheduler.clone()))
                .with_rng(Box::new(StdRng::seed_from_u64(4)))
                .with_config(config);
        (App::new(controller), scheduler)
    }

    fn type_str(app: &mut App<MemoryHistoryStore>, s: &str) {
        for c in s.chars() {
            app.handle_key(key(KeyCode::Char(c)));
        }
    }

    fn expected_text(app: &App<MemoryHistoryStore>) -> String {
        app.controller
            .current_question()
            .and_then(|q| q.expected_answer())
            .map(|v| v.to_string())
            .unwrap()
    }

    #[test]
    fn enter_starts_and_typing_scores() {
        let (mut app, _) = app(GenerationConfig::only(&[Operator::Mul]));
        app.handle_key(key(KeyCode::Enter));
        assert!(app.controller.is_running());

        let answer = expected_text(&app);
        type_str(&mut app, &answer);

        assert_eq!(app.controller.score(), 1);
        assert!(app.answer.is_empty());
    }

    #[test]
    fn backspace_rechecks_answer() {
        let (mut app, _) = app(GenerationConfig::only(&[Operator::Div]));
        app.handle_key(key(KeyCode::Enter));

        // a wrong trailing digit already in the box
        app.answer = format!("{}9", expected_text(&app));
        app.handle_key(key(KeyCode::Backspace));

        assert_eq!(app.controller.score(), 1);
        assert!(app.answer.is_empty());
    }

    #[test]
    fn ticks_route_to_live_countdown_and_finish_clears_input() {
        let (mut app, scheduler) = app(GenerationConfig::only(&[Operator::Add]));
        app.handle_key(key(KeyCode::Enter));
        let id = scheduler.active()[0];
        type_str(&mut app, "x");

        for _ in 0..SESSION_SECS {
            assert_eq!(app.handle_event(QuizEvent::Tick(id)), Flow::Continue);
        }

        assert_eq!(app.controller.status(), SessionStatus::Finished);
        assert!(app.answer.is_empty());
        assert_eq!(app.controller.store().read_all("alice").unwrap().len(), 1);
    }

    #[test]
    fn menu_keys_edit_config() {
        let (mut app, _) = app(GenerationConfig::default());

        app.handle_key(key(KeyCode::Char('4')));
        app.handle_key(key(KeyCode::Char('a')));
        app.handle_key(key(KeyCode::Char('d')));

        let config = app.controller.config();
        assert!(!config.enabled_operators.contains(&Operator::Div));
        assert_eq!(config.addition_max_digits, 3);
        assert_eq!(config.addition_max_decimals, 3);

        app.handle_key(key(KeyCode::Char('d')));
        assert_eq!(app.controller.config().addition_max_decimals, 0);
    }

    #[test]
    fn menu_keys_ignored_while_running() {
        let (mut app, _) = app(GenerationConfig::only(&[Operator::Mul]));
        app.handle_key(key(KeyCode::Enter));

        app.handle_key(key(KeyCode::Char('h')));

        assert_eq!(app.state, AppState::Quiz);
        assert_eq!(app.answer, "h");
    }

    #[test]
    fn escape_abandons_then_quits() {
        let (mut app, _) = app(GenerationConfig::default());
        app.handle_key(key(KeyCode::Enter));

        assert_eq!(app.handle_key(key(KeyCode::Esc)), Flow::Continue);
        assert_eq!(app.controller.status(), SessionStatus::Idle);
        assert_eq!(app.handle_key(key(KeyCode::Esc)), Flow::Quit);
    }

    #[test]
    fn ctrl_c_quits_from_anywhere() {
        let (mut app, _) = app(GenerationConfig::default());
        app.handle_key(key(KeyCode::Enter));

        let flow = app.handle_key(KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL));

        assert_eq!(flow, Flow::Quit);
    }

    #[test]
    fn history_screen_loads_sorted_entries() {
        let scheduler = ManualScheduler::new();
        let mut store = MemoryHistoryStore::new();
        store
            .append("alice", &HistoryEntry::new("2024-05-01T00:00:00.000Z", 8))
            .unwrap();
        store
            .append("alice", &HistoryEntry::new("2024-04-01T00:00:00.000Z", 3))
            .unwrap();
        let mut app = App::new(SessionController::new(
            "alice",
            store,
            Box::new(scheduler),
        ));

        app.handle_key(key(KeyCode::Char('h')));

        assert_eq!(app.state, AppState::History);
        assert_eq!(
            app.history.iter().map(|e| e.score).collect::<Vec<_>>(),
            vec![3, 8]
        );

        app.handle_key(key(KeyCode::Char('b')));
        assert_eq!(app.state, AppState::Quiz);
    }

    #[test]
    fn cycle_wraps() {
        assert_eq!(cycle(1, DIGITS_RANGE), 2);
        assert_eq!(cycle(5, DIGITS_RANGE), 1);
        assert_eq!(cycle(9, DIGITS_RANGE), 1);
        assert_eq!(cycle(3, DECIMALS_RANGE), 0);
    }
}
