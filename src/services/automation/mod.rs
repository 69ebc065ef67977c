//! Автоматический ввод URL в UI чужого приложения.
//!
//! Сессия взводится на одну попытку, фильтрует события UI по целевому
//! приложению и гарантированно очищает URL при успехе, отмене или таймауте.

mod service;
mod session;

pub use service::AutomationService;
pub use session::{AutomationSession, EventOutcome, SuccessPredicate, AUTOMATION_TIMEOUT};
