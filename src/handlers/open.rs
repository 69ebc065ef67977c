use crate::config::Config;
use crate::error::Result;
use crate::events::LaunchIntent;
use crate::pipeline::{UrlHandler, UrlRecord};
use crate::services::automation::AutomationService;
use crate::services::compatibility::Compatibility;
use crate::services::incognito::IncognitoCompanion;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const ID: &str = "open";

/// Открывает итоговый URL в целевом приложении.
///
/// Если приватный режим включён и приложение не умеет открывать ссылку
/// в нём напрямую, взводит сессию автоматизации для ввода URL.
pub struct OpenHandler {
    target_app: Option<String>,
    config: Arc<Config>,
    companion: Arc<IncognitoCompanion>,
    service: Arc<AutomationService>,
    last_launch: RwLock<Option<LaunchIntent>>,
}

impl OpenHandler {
    pub fn new(
        target_app: Option<String>,
        config: Arc<Config>,
        companion: Arc<IncognitoCompanion>,
        service: Arc<AutomationService>,
    ) -> Self {
        Self {
            target_app,
            config,
            companion,
            service,
            last_launch: RwLock::new(None),
        }
    }

    /// Последнее собранное намерение запуска
    #[allow(dead_code)]
    pub fn last_launch(&self) -> Option<LaunchIntent> {
        self.last_launch.read().clone()
    }

    fn build_intent(&self, target_app: &str, url: &str) -> Result<LaunchIntent> {
        let mut intent = LaunchIntent::view(url).with_package(target_app);
        let resolver = self.companion.resolver();
        let injector = resolver
            .matching_entry(self.config.as_ref(), &intent)
            .and_then(|entry| entry.injector(url));

        match self.companion.apply(self.config.as_ref(), &mut intent) {
            Compatibility::NeedsHelp => match injector {
                Some(predicate) => {
                    info!("{} требует ввода URL через автоматизацию", target_app);
                    self.service.request_injection(target_app, url, predicate)?;
                }
                None => warn!("Для {} нет способа ввода URL, ссылка откроется как есть", target_app),
            },
            Compatibility::Compatible => debug!("{} открывает ссылку в приватном режиме сам", target_app),
            Compatibility::NotCompatible => {}
        }

        Ok(intent)
    }
}

impl UrlHandler for OpenHandler {
    fn id(&self) -> &str {
        ID
    }

    fn on_display_url(&self, record: &UrlRecord) -> Result<()> {
        let Some(target_app) = self.target_app.as_deref() else {
            debug!("Целевое приложение не задано, открытие пропущено");
            return Ok(());
        };

        let intent = self.build_intent(target_app, record.url())?;
        info!("Запуск: {}", intent);
        *self.last_launch.write() = Some(intent);
        Ok(())
    }
}
