pub mod automation;
pub mod compatibility;
pub mod incognito;
pub mod injection;
pub mod ui_source;

pub use automation::AutomationService;
pub use compatibility::CompatibilityResolver;
pub use incognito::IncognitoCompanion;
pub use ui_source::create_ui_source;
