pub mod drawer;
pub mod https_upgrade;
pub mod open;
pub mod status;

use crate::config::Config;
use crate::error::Result;
use crate::pipeline::{DisplayState, UrlHandler};
use crate::relay_error;
use crate::services::automation::AutomationService;
use crate::services::incognito::IncognitoCompanion;
use std::sync::Arc;

pub use drawer::DrawerHandler;
pub use https_upgrade::HttpsUpgrade;
pub use open::OpenHandler;
pub use status::StatusHandler;

/// Общие зависимости встроенных обработчиков
#[derive(Clone)]
pub struct HandlerContext {
    pub config: Arc<Config>,
    pub companion: Arc<IncognitoCompanion>,
    pub service: Arc<AutomationService>,
    pub target_app: Option<String>,
}

/// Factory function to create a built-in handler by its id
pub fn create_handler(
    id: &str,
    display: &Arc<DisplayState>,
    ctx: &HandlerContext,
) -> Result<Arc<dyn UrlHandler>> {
    match id {
        https_upgrade::ID => Ok(Arc::new(HttpsUpgrade)),
        status::ID => Ok(Arc::new(StatusHandler::new())),
        drawer::ID => Ok(Arc::new(DrawerHandler::new(display.clone()))),
        open::ID => Ok(Arc::new(OpenHandler::new(
            ctx.target_app.clone(),
            ctx.config.clone(),
            ctx.companion.clone(),
            ctx.service.clone(),
        ))),
        other => Err(relay_error!(unknown_handler, "{}", other)),
    }
}
