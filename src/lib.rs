// Library surface shared by the binary and the integration tests.
pub mod app;
pub mod app_dirs;
pub mod config;
pub mod error;
pub mod history;
pub mod question;
pub mod runtime;
pub mod session;
pub mod ui;

pub use error::{ConfigError, HistoryError};
pub use history::{HistoryEntry, HistoryStore};
pub use question::{generate, GenerationConfig, Operator, Question, RandomSource};
pub use session::{SessionController, SessionEvent, SessionState, SessionStatus};
