use crate::error::Result;
use crate::pipeline::{UrlHandler, UrlRecord};
use parking_lot::RwLock;
use tracing::info;

pub const ID: &str = "status";

/// Показывает итоговый URL
#[derive(Debug, Default)]
pub struct StatusHandler {
    last: RwLock<Option<UrlRecord>>,
}

impl StatusHandler {
    pub fn new() -> Self {
        Self::default()
    }

    #[allow(dead_code)]
    pub fn last(&self) -> Option<UrlRecord> {
        self.last.read().clone()
    }
}

impl UrlHandler for StatusHandler {
    fn id(&self) -> &str {
        ID
    }

    fn on_display_url(&self, record: &UrlRecord) -> Result<()> {
        info!("URL: {}", record.url());
        for (key, value) in record.metadata() {
            info!("  {} = {}", key, value);
        }
        *self.last.write() = Some(record.clone());
        Ok(())
    }
}
