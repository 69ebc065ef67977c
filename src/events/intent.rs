use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Запуск новой задачи у целевого приложения
pub const FLAG_ACTIVITY_NEW_TASK: u32 = 0x1000_0000;

/// Явный компонент (пакет + класс активности)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ComponentName {
    pub package: String,
    pub class: String,
}

/// Намерение открыть URL в целевом приложении
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchIntent {
    pub package: Option<String>,
    pub component: Option<ComponentName>,
    pub data: Option<String>,
    pub flags: u32,
    pub extras: BTreeMap<String, bool>,
}

impl LaunchIntent {
    pub fn view(url: impl Into<String>) -> Self {
        Self {
            data: Some(url.into()),
            ..Self::default()
        }
    }

    pub fn with_package(mut self, package: impl Into<String>) -> Self {
        self.package = Some(package.into());
        self
    }

    pub fn put_extra(&mut self, key: impl Into<String>, value: bool) {
        self.extras.insert(key.into(), value);
    }

    pub fn remove_extra(&mut self, key: &str) {
        self.extras.remove(key);
    }

    /// Значение булевого extra, `false` если его нет
    pub fn bool_extra(&self, key: &str) -> bool {
        self.extras.get(key).copied().unwrap_or(false)
    }

    pub fn add_flags(&mut self, flags: u32) {
        self.flags |= flags;
    }

    pub fn set_component(&mut self, package: impl Into<String>, class: impl Into<String>) {
        self.component = Some(ComponentName {
            package: package.into(),
            class: class.into(),
        });
    }
}

impl fmt::Display for LaunchIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.data.as_deref().unwrap_or("<нет данных>"))?;
        match (&self.component, &self.package) {
            (Some(component), _) => write!(f, " -> {}/{}", component.package, component.class)?,
            (None, Some(package)) => write!(f, " -> {}", package)?,
            (None, None) => {}
        }
        if !self.extras.is_empty() {
            write!(f, " extras={:?}", self.extras)?;
        }
        Ok(())
    }
}
