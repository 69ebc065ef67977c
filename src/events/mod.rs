pub mod intent;
pub mod ui;

pub use intent::{LaunchIntent, FLAG_ACTIVITY_NEW_TASK};
pub use ui::{UiAction, UiDriver, UiEvent, UiEventType, UiNode, UiSnapshot};
