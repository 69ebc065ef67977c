use std::collections::BTreeMap;
use std::fmt;

/// URL вместе с накопленными метаданными и флагами цикла обновления.
///
/// Значение неизменяемо с точки зрения движка: каждое принятое предложение
/// заменяет запись целиком, а метаданные предыдущей записи вливаются в новую.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UrlRecord {
    url: String,
    trigger: Option<String>,
    trigger_own: bool,
    disable_updates: bool,
    metadata: BTreeMap<String, String>,
}

impl UrlRecord {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Отмечает обработчик, вызвавший изменение.
    /// При `own == false` этот обработчик не получит уведомлений о своей же записи.
    pub fn with_trigger(mut self, handler_id: impl Into<String>, own: bool) -> Self {
        self.trigger = Some(handler_id.into());
        self.trigger_own = own;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Запрещает дальнейшие изменения в текущем цикле
    #[allow(dead_code)]
    pub fn with_updates_disabled(mut self) -> Self {
        self.disable_updates = true;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    #[allow(dead_code)]
    pub fn trigger(&self) -> Option<&str> {
        self.trigger.as_deref()
    }

    #[allow(dead_code)]
    pub fn trigger_own(&self) -> bool {
        self.trigger_own
    }

    pub fn updates_disabled(&self) -> bool {
        self.disable_updates
    }

    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }

    #[allow(dead_code)]
    pub fn metadata_value(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }

    /// Должен ли обработчик `handler_id` пропустить эту запись
    pub fn skips(&self, handler_id: &str) -> bool {
        !self.trigger_own && self.trigger.as_deref() == Some(handler_id)
    }

    /// Вливает метаданные `previous`; при конфликте побеждают ключи этой записи
    pub fn merged_with(mut self, previous: &UrlRecord) -> Self {
        for (key, value) in &previous.metadata {
            self.metadata
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }
        self
    }
}

impl fmt::Display for UrlRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.trigger {
            Some(trigger) => write!(f, "{} (от {})", self.url, trigger),
            None => write!(f, "{}", self.url),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_keeps_previous_metadata() {
        let previous = UrlRecord::new("http://example.com")
            .with_metadata("a", "1")
            .with_metadata("shared", "old");
        let next = UrlRecord::new("https://example.com")
            .with_metadata("b", "2")
            .with_metadata("shared", "new")
            .merged_with(&previous);

        assert_eq!(next.url(), "https://example.com");
        assert_eq!(next.metadata_value("a"), Some("1"));
        assert_eq!(next.metadata_value("b"), Some("2"));
        assert_eq!(next.metadata_value("shared"), Some("new"));
    }

    #[test]
    fn test_skip_rules() {
        let record = UrlRecord::new("x").with_trigger("cleaner", false);
        assert!(record.skips("cleaner"));
        assert!(!record.skips("other"));

        let own = UrlRecord::new("x").with_trigger("cleaner", true);
        assert!(!own.skips("cleaner"));

        assert!(!UrlRecord::new("x").skips("cleaner"));
    }
}
