//! Конвейер обработки URL.
//!
//! Движок прогоняет запись через обработчики до тех пор, пока никто не
//! предлагает изменений, затем уведомляет всех об итоговом значении.
//! Что именно делает обработчик, движок не решает.

pub mod engine;
pub mod handler;
pub mod record;
pub mod registry;

pub use engine::{PipelineEngine, MAX_ITERATIONS};
pub use handler::{HandlerOutcome, Phase, UrlHandler, UrlProposer};
pub use record::UrlRecord;
pub use registry::{DisplayState, HandlerRegistry};
