use crate::events::LaunchIntent;
use crate::services::compatibility::{AppCatalog, Compatibility, CompatibilityResolver};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Начальное состояние инкогнито и видимость переключателя
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncognitoMode {
    /// Как во входящем намерении, переключатель виден
    #[default]
    Auto,
    /// Как во входящем намерении, переключатель скрыт
    Hidden,
    DefaultOn,
    DefaultOff,
    AlwaysOn,
    AlwaysOff,
}

/// Приватный режим открытия поверх таблицы совместимости
pub struct IncognitoCompanion {
    resolver: Arc<CompatibilityResolver>,
    mode: IncognitoMode,
    state: AtomicBool,
    visible: AtomicBool,
}

impl IncognitoCompanion {
    pub fn new(resolver: Arc<CompatibilityResolver>, mode: IncognitoMode) -> Self {
        Self {
            resolver,
            mode,
            state: AtomicBool::new(false),
            visible: AtomicBool::new(false),
        }
    }

    /// Начальное состояние по входящему намерению
    pub fn init_from(&self, intent: &LaunchIntent) {
        let (state, visible) = match self.mode {
            IncognitoMode::Auto => (self.is_incognito(intent), true),
            IncognitoMode::Hidden => (self.is_incognito(intent), false),
            IncognitoMode::DefaultOn => (true, true),
            IncognitoMode::DefaultOff => (false, true),
            IncognitoMode::AlwaysOn => (true, false),
            IncognitoMode::AlwaysOff => (false, false),
        };
        debug!("Инкогнито: режим {:?}, состояние {}, переключатель виден: {}", self.mode, state, visible);
        self.state.store(state, Ordering::Relaxed);
        self.visible.store(visible, Ordering::Relaxed);
    }

    /// Открывается ли намерение в приватном режиме (только по extras)
    pub fn is_incognito(&self, intent: &LaunchIntent) -> bool {
        self.resolver
            .possible_extras()
            .iter()
            .any(|extra| intent.bool_extra(extra))
    }

    pub fn state(&self) -> bool {
        self.state.load(Ordering::Relaxed)
    }

    /// Переключает состояние, возвращает новое
    pub fn toggle(&self) -> bool {
        !self.state.fetch_xor(true, Ordering::Relaxed)
    }

    pub fn is_visible(&self) -> bool {
        self.visible.load(Ordering::Relaxed)
    }

    /// Запрос пользователя через переключатель; скрытый переключатель не реагирует.
    /// Возвращает итоговое состояние.
    pub fn request(&self, wanted: bool) -> bool {
        if !self.is_visible() {
            warn!(
                "Переключатель инкогнито скрыт в режиме {:?}, запрос {} проигнорирован",
                self.mode, wanted
            );
            return self.state();
        }
        if self.state() != wanted {
            self.toggle();
        }
        self.state()
    }

    pub fn resolver(&self) -> &CompatibilityResolver {
        &self.resolver
    }

    fn remove_incognito(&self, intent: &mut LaunchIntent) {
        for extra in self.resolver.possible_extras() {
            intent.remove_extra(extra);
        }
    }

    /// Очищает extras инкогнито и, если режим включён, применяет таблицу совместимости
    pub fn apply(&self, catalog: &dyn AppCatalog, intent: &mut LaunchIntent) -> Compatibility {
        self.remove_incognito(intent);
        if !self.state() {
            return Compatibility::NotCompatible;
        }
        self.resolver.evaluate(catalog, intent)
    }

    /// Что сделает `apply`, не меняя намерение
    pub fn will_need_help(&self, catalog: &dyn AppCatalog, intent: &LaunchIntent) -> Compatibility {
        if !self.state() {
            return Compatibility::NotCompatible;
        }
        let mut cleaned = intent.clone();
        self.remove_incognito(&mut cleaned);
        self.resolver.simulate(catalog, &cleaned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AppEntry, Config};

    fn catalog() -> Config {
        let mut config = Config::default();
        config.apps = vec![
            AppEntry {
                package: "com.android.chrome".to_string(),
                main_activity: Some("com.google.android.apps.chrome.Main".to_string()),
                activities: vec![],
            },
            AppEntry {
                package: "org.mozilla.firefox".to_string(),
                main_activity: None,
                activities: vec!["org.mozilla.fenix.HomeActivity".to_string()],
            },
        ];
        config.build_indexes();
        config
    }

    fn companion(mode: IncognitoMode) -> IncognitoCompanion {
        IncognitoCompanion::new(Arc::new(CompatibilityResolver::with_builtin()), mode)
    }

    #[test]
    fn test_mode_table() {
        let private = {
            let mut intent = LaunchIntent::view("u");
            intent.put_extra("private_browsing_mode", true);
            intent
        };
        let plain = LaunchIntent::view("u");

        let cases = [
            (IncognitoMode::Auto, &private, true, true),
            (IncognitoMode::Auto, &plain, false, true),
            (IncognitoMode::Hidden, &private, true, false),
            (IncognitoMode::DefaultOn, &plain, true, true),
            (IncognitoMode::DefaultOff, &private, false, true),
            (IncognitoMode::AlwaysOn, &plain, true, false),
            (IncognitoMode::AlwaysOff, &private, false, false),
        ];

        for (mode, intent, state, visible) in cases {
            let companion = companion(mode);
            companion.init_from(intent);
            assert_eq!(companion.state(), state, "{:?}", mode);
            assert_eq!(companion.is_visible(), visible, "{:?}", mode);
        }
    }

    #[test]
    fn test_apply_strips_extras_when_off() {
        let companion = companion(IncognitoMode::AlwaysOff);
        companion.init_from(&LaunchIntent::view("u"));

        let mut intent = LaunchIntent::view("u").with_package("org.mozilla.firefox");
        intent.put_extra("EXTRA_OPEN_NEW_INCOGNITO_TAB", true);

        assert_eq!(companion.apply(&catalog(), &mut intent), Compatibility::NotCompatible);
        assert!(intent.extras.is_empty());
    }

    #[test]
    fn test_apply_when_on() {
        let companion = companion(IncognitoMode::AlwaysOn);
        companion.init_from(&LaunchIntent::view("u"));

        let chrome = LaunchIntent::view("https://y").with_package("com.android.chrome");
        assert_eq!(companion.will_need_help(&catalog(), &chrome), Compatibility::NeedsHelp);
        assert!(chrome.component.is_none());

        let mut firefox = LaunchIntent::view("https://y").with_package("org.mozilla.firefox");
        assert_eq!(companion.apply(&catalog(), &mut firefox), Compatibility::Compatible);
        assert!(companion.is_incognito(&firefox));
    }

    #[test]
    fn test_request_respects_hidden_toggle() {
        let plain = LaunchIntent::view("u");

        let visible = companion(IncognitoMode::Auto);
        visible.init_from(&plain);
        assert!(visible.request(true));
        assert!(visible.state());
        assert!(!visible.request(false));

        let hidden = companion(IncognitoMode::AlwaysOff);
        hidden.init_from(&plain);
        assert!(!hidden.request(true));

        let forced = companion(IncognitoMode::AlwaysOn);
        forced.init_from(&plain);
        assert!(forced.request(false));
    }

    #[test]
    fn test_will_need_help_leaves_intent_untouched() {
        let companion = companion(IncognitoMode::DefaultOff);
        companion.init_from(&LaunchIntent::view("u"));

        let mut chrome = LaunchIntent::view("https://y").with_package("com.android.chrome");
        chrome.put_extra("private_browsing_mode", true);
        assert_eq!(companion.will_need_help(&catalog(), &chrome), Compatibility::NotCompatible);

        companion.request(true);
        assert_eq!(companion.will_need_help(&catalog(), &chrome), Compatibility::NeedsHelp);
        assert!(chrome.component.is_none());
        assert!(chrome.bool_extra("private_browsing_mode"));
    }

    #[test]
    fn test_toggle() {
        let companion = companion(IncognitoMode::DefaultOff);
        companion.init_from(&LaunchIntent::view("u"));
        assert!(companion.toggle());
        assert!(companion.state());
        assert!(!companion.toggle());
    }
}
