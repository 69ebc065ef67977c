use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::time::Duration;

use crate::pipeline::MAX_ITERATIONS;
use crate::services::automation::AUTOMATION_TIMEOUT;
use crate::services::compatibility::AppCatalog;
use crate::services::incognito::IncognitoMode;

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub logging: LoggingConfig,
    pub pipeline: PipelineConfig,
    pub automation: AutomationConfig,
    pub incognito: IncognitoConfig,
    pub source: SourceConfig,
    pub apps: Vec<AppEntry>,
    // Индекс пакетов - не сериализуется, строится после загрузки
    #[serde(skip)]
    package_index: HashMap<String, usize>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub max_iterations: usize,
    /// Порядок обработчиков в конвейере
    pub handlers: Vec<String>,
    /// Обработчик, отображаемый последним; всё после него скрыто по умолчанию
    pub deferred: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AutomationConfig {
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct IncognitoConfig {
    pub mode: IncognitoMode,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SourceConfig {
    pub mode: String,
    pub interval_ms: u64,
}

/// Известное приложение: пакет и его активности
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AppEntry {
    pub package: String,
    pub main_activity: Option<String>,
    pub activities: Vec<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_iterations: MAX_ITERATIONS,
            handlers: ["https_upgrade", "status", "open", "drawer"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            deferred: Some("drawer".to_string()),
        }
    }
}

impl Default for AutomationConfig {
    fn default() -> Self {
        Self {
            timeout_secs: AUTOMATION_TIMEOUT.as_secs(),
        }
    }
}

impl Default for IncognitoConfig {
    fn default() -> Self {
        Self {
            mode: IncognitoMode::Auto,
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            mode: "dry_run".to_string(),
            interval_ms: 500,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let mut config = Self {
            logging: LoggingConfig::default(),
            pipeline: PipelineConfig::default(),
            automation: AutomationConfig::default(),
            incognito: IncognitoConfig::default(),
            source: SourceConfig::default(),
            apps: Vec::new(),
            package_index: HashMap::new(),
        };
        config.build_indexes();
        config
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        let config_path = config_path.as_ref();

        let figment = Figment::new()
            .merge(Toml::file(config_path))
            .merge(Env::prefixed("URL_RELAY_"));

        let mut config: Config = figment
            .extract()
            .with_context(|| format!("Не удалось загрузить конфигурацию из {:?}", config_path))?;

        config.validate()?;
        config.build_indexes();

        Ok(config)
    }

    /// Строит индекс пакетов для быстрого поиска приложения
    pub fn build_indexes(&mut self) {
        self.package_index = self
            .apps
            .iter()
            .enumerate()
            .map(|(i, app)| (app.package.clone(), i))
            .collect();
    }

    pub fn automation_timeout(&self) -> Duration {
        Duration::from_secs(self.automation.timeout_secs)
    }

    pub fn validate(&self) -> Result<()> {
        match self.logging.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!("Неверный уровень логирования: {}", self.logging.level),
        }

        if self.pipeline.max_iterations == 0 || self.pipeline.max_iterations > 1000 {
            anyhow::bail!(
                "max_iterations должно быть в диапазоне 1..=1000, получено {}",
                self.pipeline.max_iterations
            );
        }

        let mut seen = HashSet::new();
        for id in &self.pipeline.handlers {
            if !seen.insert(id.as_str()) {
                anyhow::bail!("Обработчик '{}' указан в конвейере дважды", id);
            }
        }

        if let Some(deferred) = &self.pipeline.deferred {
            if !seen.contains(deferred.as_str()) {
                anyhow::bail!("Отложенный обработчик '{}' отсутствует в списке handlers", deferred);
            }
        }

        if self.automation.timeout_secs == 0 {
            anyhow::bail!("timeout_secs должно быть больше 0");
        }

        match self.source.mode.as_str() {
            "dry_run" | "stdin" => {}
            _ => anyhow::bail!("Неверный источник UI событий: {}", self.source.mode),
        }

        if self.source.interval_ms < 10 {
            anyhow::bail!("interval_ms должно быть минимум 10");
        }

        for (i, app) in self.apps.iter().enumerate() {
            if app.package.is_empty() {
                anyhow::bail!("Пустой пакет в приложении #{}", i + 1);
            }
        }

        Ok(())
    }

    fn app(&self, package: &str) -> Option<&AppEntry> {
        self.package_index.get(package).and_then(|&i| self.apps.get(i))
    }
}

impl AppCatalog for Config {
    fn activities(&self, package: &str) -> HashSet<String> {
        self.app(package)
            .map(|app| {
                app.activities
                    .iter()
                    .chain(app.main_activity.iter())
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    fn main_activity(&self, package: &str) -> Option<String> {
        self.app(package).and_then(|app| app.main_activity.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_validation() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.pipeline.max_iterations, 100);
        assert_eq!(config.automation_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config = Config::default();
        config.automation.timeout_secs = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.pipeline.handlers.push("status".to_string());
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.pipeline.deferred = Some("missing".to_string());
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.source.mode = "dbus".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_app_catalog_lookup() {
        let mut config = Config::default();
        config.apps = vec![AppEntry {
            package: "com.android.chrome".to_string(),
            main_activity: Some("com.google.android.apps.chrome.Main".to_string()),
            activities: vec!["org.chromium.chrome.browser.Other".to_string()],
        }];
        config.build_indexes();

        assert_eq!(
            config.main_activity("com.android.chrome").as_deref(),
            Some("com.google.android.apps.chrome.Main")
        );
        let activities = config.activities("com.android.chrome");
        assert_eq!(activities.len(), 2);
        assert!(config.activities("org.unknown").is_empty());
        assert!(config.main_activity("org.unknown").is_none());
    }
}
