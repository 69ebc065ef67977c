use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

/// Тип события UI чужого приложения
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UiEventType {
    WindowStateChanged,
    WindowContentChanged,
    ViewFocused,
    ViewClicked,
    #[serde(other)]
    Other,
}

impl UiEventType {
    /// Смена окна или его содержимого - только такие события интересны сессии
    pub fn is_window_change(&self) -> bool {
        matches!(
            self,
            UiEventType::WindowStateChanged | UiEventType::WindowContentChanged
        )
    }
}

/// Узел дерева UI чужого приложения (снимок)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UiNode {
    pub id: u64,
    pub class_name: String,
    pub text: Option<String>,
    pub content_description: Option<String>,
    pub resource_id: Option<String>,
    pub editable: bool,
    pub children: Vec<UiNode>,
}

impl UiNode {
    pub fn new(id: u64, class_name: impl Into<String>) -> Self {
        Self {
            id,
            class_name: class_name.into(),
            ..Self::default()
        }
    }

    pub fn with_resource_id(mut self, resource_id: impl Into<String>) -> Self {
        self.resource_id = Some(resource_id.into());
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn editable(mut self) -> Self {
        self.editable = true;
        self
    }

    pub fn with_child(mut self, child: UiNode) -> Self {
        self.children.push(child);
        self
    }

    /// Все узлы дерева в порядке обхода в ширину
    pub fn walk(&self) -> Vec<&UiNode> {
        let mut nodes = Vec::new();
        let mut queue = VecDeque::from([self]);
        while let Some(node) = queue.pop_front() {
            nodes.push(node);
            queue.extend(node.children.iter());
        }
        nodes
    }

    pub fn resource_id_ends_with(&self, suffix: &str) -> bool {
        self.resource_id
            .as_deref()
            .is_some_and(|id| id.ends_with(suffix))
    }
}

impl fmt::Display for UiNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{} {} text={:?} desc={:?} id={:?}",
            self.id, self.class_name, self.text, self.content_description, self.resource_id
        )
    }
}

/// Действие над узлом чужого приложения
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", content = "value", rename_all = "snake_case")]
pub enum UiAction {
    Focus,
    SetText(String),
    Click,
    ImeEnter,
}

/// Обратный канал к чужому приложению: выполняет действие над узлом
pub trait UiDriver: Send + Sync {
    fn perform(&self, app: &str, node_id: u64, action: UiAction) -> Result<()>;
}

/// Снимок дерева UI вместе с каналом для действий над ним
#[derive(Clone)]
pub struct UiSnapshot {
    app: String,
    root: UiNode,
    driver: Arc<dyn UiDriver>,
}

impl UiSnapshot {
    pub fn new(app: impl Into<String>, root: UiNode, driver: Arc<dyn UiDriver>) -> Self {
        Self {
            app: app.into(),
            root,
            driver,
        }
    }

    pub fn app(&self) -> &str {
        &self.app
    }

    pub fn root(&self) -> &UiNode {
        &self.root
    }

    pub fn perform(&self, node: &UiNode, action: UiAction) -> Result<()> {
        self.driver.perform(&self.app, node.id, action)
    }
}

impl fmt::Debug for UiSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UiSnapshot")
            .field("app", &self.app)
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

/// Событие UI чужого приложения
#[derive(Debug, Clone)]
pub struct UiEvent {
    pub source_app: String,
    pub event_type: UiEventType,
    pub snapshot: Option<UiSnapshot>,
    pub timestamp: std::time::Instant,
}

impl UiEvent {
    pub fn new(
        source_app: impl Into<String>,
        event_type: UiEventType,
        snapshot: Option<UiSnapshot>,
    ) -> Self {
        Self {
            source_app: source_app.into(),
            event_type,
            snapshot,
            timestamp: std::time::Instant::now(),
        }
    }

    pub fn content_changed(snapshot: UiSnapshot) -> Self {
        Self::new(
            snapshot.app().to_string(),
            UiEventType::WindowContentChanged,
            Some(snapshot),
        )
    }
}

impl fmt::Display for UiEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?} от {} ({}ms ago)",
            self.event_type,
            self.source_app,
            self.timestamp.elapsed().as_millis()
        )
    }
}
