//! CompatibilityResolver: может ли целевое приложение открыть URL в приватном режиме
//! и нужна ли для этого автоматизация ввода.
//!
//! Каждая запись таблицы проверяет, относится ли приложение к своему семейству,
//! и преобразует намерение. Поиск останавливается на первом совпадении.

use crate::events::{LaunchIntent, FLAG_ACTIVITY_NEW_TASK};
use crate::services::automation::SuccessPredicate;
use crate::services::injection;
use crate::debug_if_enabled;
use std::collections::{BTreeSet, HashSet};

/// Сведения об установленных приложениях
pub trait AppCatalog {
    fn activities(&self, package: &str) -> HashSet<String>;
    fn main_activity(&self, package: &str) -> Option<String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Compatibility {
    /// Достаточно прямого запуска
    Compatible,
    /// Нужен автоматический ввод URL в UI приложения
    NeedsHelp,
    NotCompatible,
}

type Matcher = Box<dyn Fn(&dyn AppCatalog, &LaunchIntent) -> bool + Send + Sync>;
type Transform = Box<dyn Fn(&mut LaunchIntent) -> bool + Send + Sync>;
pub type Injector = fn(&str) -> SuccessPredicate;

pub struct CompatibilityEntry {
    key: String,
    extras: Vec<String>,
    matches: Matcher,
    transform: Transform,
    injector: Option<Injector>,
}

impl CompatibilityEntry {
    /// `transform` возвращает `true`, если URL придётся вводить вручную
    pub fn new<M, T>(key: impl Into<String>, matches: M, transform: T) -> Self
    where
        M: Fn(&dyn AppCatalog, &LaunchIntent) -> bool + Send + Sync + 'static,
        T: Fn(&mut LaunchIntent) -> bool + Send + Sync + 'static,
    {
        Self {
            key: key.into(),
            extras: Vec::new(),
            matches: Box::new(matches),
            transform: Box::new(transform),
            injector: None,
        }
    }

    /// Extras, которыми семейство отмечает приватный запуск
    pub fn with_extras(mut self, extras: &[&str]) -> Self {
        self.extras = extras.iter().map(|e| e.to_string()).collect();
        self
    }

    pub fn with_injector(mut self, injector: Injector) -> Self {
        self.injector = Some(injector);
        self
    }

    #[allow(dead_code)]
    pub fn key(&self) -> &str {
        &self.key
    }

    #[allow(dead_code)]
    pub fn extras(&self) -> &[String] {
        &self.extras
    }

    pub fn matches(&self, catalog: &dyn AppCatalog, intent: &LaunchIntent) -> bool {
        (self.matches)(catalog, intent)
    }

    pub fn transform(&self, intent: &mut LaunchIntent) -> bool {
        (self.transform)(intent)
    }

    /// Предикат, вводящий `url` в UI приложения этого семейства
    pub fn injector(&self, url: &str) -> Option<SuccessPredicate> {
        self.injector.map(|build| build(url))
    }
}

impl std::fmt::Debug for CompatibilityEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompatibilityEntry")
            .field("key", &self.key)
            .field("extras", &self.extras)
            .field("injector", &self.injector.is_some())
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Default)]
pub struct CompatibilityResolver {
    entries: Vec<CompatibilityEntry>,
}

impl CompatibilityResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Таблица с известными семействами браузеров
    pub fn with_builtin() -> Self {
        let mut resolver = Self::new();
        resolver.register(fenix_entry());
        resolver.register(chromium_entry());
        resolver
    }

    pub fn register(&mut self, entry: CompatibilityEntry) {
        self.entries.push(entry);
    }

    #[allow(dead_code)]
    pub fn entries(&self) -> &[CompatibilityEntry] {
        &self.entries
    }

    #[allow(dead_code)]
    pub fn entry(&self, key: &str) -> Option<&CompatibilityEntry> {
        self.entries.iter().find(|e| e.key == key)
    }

    /// Все extras приватного режима из всех записей
    pub fn possible_extras(&self) -> BTreeSet<&str> {
        self.entries
            .iter()
            .flat_map(|e| e.extras.iter().map(String::as_str))
            .collect()
    }

    pub fn matching_entry(
        &self,
        catalog: &dyn AppCatalog,
        intent: &LaunchIntent,
    ) -> Option<&CompatibilityEntry> {
        self.entries.iter().find(|e| e.matches(catalog, intent))
    }

    /// Применяет первую подходящую запись к `intent`
    pub fn evaluate(&self, catalog: &dyn AppCatalog, intent: &mut LaunchIntent) -> Compatibility {
        let Some(entry) = self.matching_entry(catalog, intent) else {
            debug_if_enabled!("Нет подходящей записи совместимости для {:?}", intent.package);
            return Compatibility::NotCompatible;
        };

        let needs_help = entry.transform(intent);
        debug_if_enabled!(
            "Запись '{}' подошла для {:?}, нужна помощь: {}",
            entry.key,
            intent.package,
            needs_help
        );

        if needs_help {
            Compatibility::NeedsHelp
        } else {
            Compatibility::Compatible
        }
    }

    /// То же, что `evaluate`, но над копией: исходное намерение не меняется
    pub fn simulate(&self, catalog: &dyn AppCatalog, intent: &LaunchIntent) -> Compatibility {
        let mut simulation = intent.clone();
        self.evaluate(catalog, &mut simulation)
    }
}

pub const FENIX_KEY: &str = "fenix";
pub const CHROMIUM_KEY: &str = "chromium";

const FENIX_PRIVATE_EXTRA: &str = "private_browsing_mode";
const FENIX_HOME_ACTIVITY: &str = "org.mozilla.fenix.HomeActivity";
// Tor Browser и так всегда приватный
const FENIX_EXCLUDED: &[&str] = &["org.torproject.torbrowser"];

const CHROMIUM_INCOGNITO_EXTRAS: &[&str] = &[
    "com.google.android.apps.chrome.EXTRA_OPEN_NEW_INCOGNITO_TAB",
    "EXTRA_OPEN_NEW_INCOGNITO_TAB",
];
const CHROMIUM_MAIN_ACTIVITY: &str = "com.google.android.apps.chrome.Main";
const CHROMIUM_INCOGNITO_LAUNCHER: &str = "org.chromium.chrome.browser.incognito.IncognitoTabLauncher";

/// Firefox и форки: общая домашняя активность, приватность через extra
fn fenix_entry() -> CompatibilityEntry {
    CompatibilityEntry::new(
        FENIX_KEY,
        |catalog, intent| {
            let Some(package) = intent.package.as_deref() else {
                return false;
            };
            if FENIX_EXCLUDED.contains(&package) {
                return false;
            }
            catalog.activities(package).contains(FENIX_HOME_ACTIVITY)
        },
        |intent| {
            intent.put_extra(FENIX_PRIVATE_EXTRA, true);
            false
        },
    )
    .with_extras(&[FENIX_PRIVATE_EXTRA])
}

/// Chromium и форки: extras игнорируются, открываем лаунчер инкогнито
/// и вводим URL в адресную строку
fn chromium_entry() -> CompatibilityEntry {
    CompatibilityEntry::new(
        CHROMIUM_KEY,
        |catalog, intent| {
            intent
                .package
                .as_deref()
                .and_then(|package| catalog.main_activity(package))
                .is_some_and(|main| main == CHROMIUM_MAIN_ACTIVITY)
        },
        |intent| {
            let Some(package) = intent.package.clone() else {
                return false;
            };
            intent.set_component(package, CHROMIUM_INCOGNITO_LAUNCHER);
            intent.add_flags(FLAG_ACTIVITY_NEW_TASK);
            true
        },
    )
    .with_extras(CHROMIUM_INCOGNITO_EXTRAS)
    .with_injector(injection::omnibox_injector)
}
