use crate::error::Result;
use crate::pipeline::{DisplayState, UrlHandler, UrlRecord};
use std::sync::Arc;
use tracing::info;

pub const ID: &str = "drawer";

/// Отложенный обработчик: граница скрытой группы.
///
/// Отображается последним, поэтому видит окончательную видимость группы
/// и прячет себя, если в ней нечего показывать.
pub struct DrawerHandler {
    display: Arc<DisplayState>,
}

impl DrawerHandler {
    pub fn new(display: Arc<DisplayState>) -> Self {
        Self { display }
    }
}

impl UrlHandler for DrawerHandler {
    fn id(&self) -> &str {
        ID
    }

    fn on_display_url(&self, _record: &UrlRecord) -> Result<()> {
        let any_visible = self.display.any_deferred_visible();
        self.display.set_visible(ID, any_visible);
        if any_visible && !self.display.group_visible() {
            info!("Часть обработчиков скрыта, их можно раскрыть переключением группы");
        }
        Ok(())
    }
}
