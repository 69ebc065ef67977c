use crate::error::{RelayError, Result};
use crate::pipeline::UrlHandler;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info};

/// Видимое состояние обработчиков, общее для реестра, движка и самих обработчиков.
///
/// Обработчики после отложенного образуют скрытую по умолчанию группу,
/// которая раскрывается только целиком.
#[derive(Debug, Default)]
pub struct DisplayState {
    visible: DashMap<String, bool>,
    deferred_members: RwLock<HashSet<String>>,
    group_visible: AtomicBool,
    displayed: RwLock<Vec<String>>,
}

impl DisplayState {
    pub fn new() -> Self {
        Self::default()
    }

    fn add(&self, handler_id: &str, deferred_member: bool) {
        self.visible.insert(handler_id.to_string(), true);
        if deferred_member {
            self.deferred_members.write().insert(handler_id.to_string());
        }
    }

    pub fn set_visible(&self, handler_id: &str, visible: bool) {
        if let Some(mut entry) = self.visible.get_mut(handler_id) {
            *entry = visible;
        }
    }

    pub fn is_visible(&self, handler_id: &str) -> bool {
        self.visible.get(handler_id).map(|v| *v).unwrap_or(false)
    }

    pub fn group_visible(&self) -> bool {
        self.group_visible.load(Ordering::Relaxed)
    }

    pub fn set_group_visible(&self, visible: bool) {
        self.group_visible.store(visible, Ordering::Relaxed);
    }

    /// Переключает видимость скрытой группы, возвращает новое значение
    #[allow(dead_code)]
    pub fn toggle_group(&self) -> bool {
        !self.group_visible.fetch_xor(true, Ordering::Relaxed)
    }

    /// Есть ли в скрытой группе хоть один видимый обработчик
    pub fn any_deferred_visible(&self) -> bool {
        self.deferred_members
            .read()
            .iter()
            .any(|id| self.is_visible(id))
    }

    pub(crate) fn begin_display(&self) {
        self.displayed.write().clear();
    }

    pub(crate) fn mark_displayed(&self, handler_id: &str) {
        self.displayed.write().push(handler_id.to_string());
    }

    /// Порядок вызовов on_display_url в последнем цикле
    #[allow(dead_code)]
    pub fn displayed(&self) -> Vec<String> {
        self.displayed.read().clone()
    }
}

/// Упорядоченный набор обработчиков одного запроса на открытие
pub struct HandlerRegistry {
    handlers: Vec<Arc<dyn UrlHandler>>,
    deferred_id: Option<String>,
    deferred_index: Option<usize>,
    display: Arc<DisplayState>,
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            handlers: Vec::new(),
            deferred_id: None,
            deferred_index: None,
            display: Arc::new(DisplayState::new()),
        }
    }

    /// Назначает отложенный обработчик; указывается до регистрации
    pub fn with_deferred(mut self, handler_id: impl Into<String>) -> Self {
        self.deferred_id = Some(handler_id.into());
        self
    }

    /// Строит реестр по списку идентификаторов.
    /// Обработчик, который не удалось создать, пропускается с ошибкой в логе.
    pub fn from_ids<F>(ids: &[String], deferred: Option<&str>, mut factory: F) -> Self
    where
        F: FnMut(&str, &Arc<DisplayState>) -> Result<Arc<dyn UrlHandler>>,
    {
        let mut registry = Self::new();
        if let Some(deferred) = deferred {
            registry = registry.with_deferred(deferred);
        }

        for id in ids {
            let result = factory(id, &registry.display)
                .and_then(|handler| registry.register(handler));
            if let Err(e) = result {
                error!("Не удалось инициализировать обработчик '{}': {}", id, e);
            }
        }

        info!("Зарегистрировано обработчиков: {}", registry.len());
        registry
    }

    pub fn register(&mut self, handler: Arc<dyn UrlHandler>) -> Result<()> {
        let id = handler.id().to_string();
        if self.get(&id).is_some() {
            return Err(RelayError::DuplicateHandler(id));
        }

        let index = self.handlers.len();
        let deferred_member = self.deferred_index.is_some();
        if self.deferred_id.as_deref() == Some(id.as_str()) {
            self.deferred_index = Some(index);
        }

        self.display.add(&id, deferred_member);
        self.handlers.push(handler);
        Ok(())
    }

    pub fn get(&self, handler_id: &str) -> Option<&Arc<dyn UrlHandler>> {
        self.handlers.iter().find(|h| h.id() == handler_id)
    }

    pub fn is_deferred(&self, handler_id: &str) -> bool {
        self.deferred_index
            .and_then(|i| self.handlers.get(i))
            .is_some_and(|h| h.id() == handler_id)
    }

    /// Зарегистрирован ли обработчик после отложенного
    #[allow(dead_code)]
    pub fn in_deferred_group(&self, handler_id: &str) -> bool {
        match self.deferred_index {
            Some(deferred) => self
                .handlers
                .iter()
                .position(|h| h.id() == handler_id)
                .is_some_and(|i| i > deferred),
            None => false,
        }
    }

    pub fn deferred(&self) -> Option<&Arc<dyn UrlHandler>> {
        self.deferred_index.and_then(|i| self.handlers.get(i))
    }

    pub fn handlers(&self) -> &[Arc<dyn UrlHandler>] {
        &self.handlers
    }

    pub fn display_state(&self) -> &Arc<DisplayState> {
        &self.display
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    #[allow(dead_code)]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Named(&'static str);

    impl UrlHandler for Named {
        fn id(&self) -> &str {
            self.0
        }
    }

    fn registry(ids: &[&'static str]) -> HandlerRegistry {
        let mut registry = HandlerRegistry::new().with_deferred("drawer");
        for id in ids {
            registry.register(Arc::new(Named(*id))).unwrap();
        }
        registry
    }

    #[test]
    fn test_deferred_group_membership() {
        let registry = registry(&["a", "drawer", "b", "c"]);

        assert!(registry.is_deferred("drawer"));
        assert!(!registry.is_deferred("a"));
        assert!(!registry.in_deferred_group("a"));
        assert!(!registry.in_deferred_group("drawer"));
        assert!(registry.in_deferred_group("b"));
        assert!(registry.in_deferred_group("c"));
        assert_eq!(registry.deferred().map(|h| h.id().to_string()), Some("drawer".to_string()));
    }

    #[test]
    fn test_duplicate_rejected() {
        let mut registry = registry(&["a"]);
        let err = registry.register(Arc::new(Named("a"))).unwrap_err();
        assert!(matches!(err, RelayError::DuplicateHandler(id) if id == "a"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_group_hidden_by_default_and_toggles() {
        let registry = registry(&["a", "drawer", "b"]);
        let display = registry.display_state();

        assert!(!display.group_visible());
        assert!(display.toggle_group());
        assert!(display.group_visible());
        assert!(!display.toggle_group());

        assert!(display.any_deferred_visible());
        display.set_visible("b", false);
        assert!(!display.any_deferred_visible());
    }

    #[test]
    fn test_from_ids_skips_failed_factory() {
        let ids: Vec<String> = ["a", "broken", "drawer"].iter().map(|s| s.to_string()).collect();
        let registry = HandlerRegistry::from_ids(&ids, Some("drawer"), |id, _| match id {
            "a" => Ok(Arc::new(Named("a")) as Arc<dyn UrlHandler>),
            "drawer" => Ok(Arc::new(Named("drawer")) as Arc<dyn UrlHandler>),
            other => Err(RelayError::UnknownHandler(other.to_string())),
        });

        assert_eq!(registry.len(), 2);
        assert!(registry.is_deferred("drawer"));
        assert!(registry.get("broken").is_none());
    }
}
