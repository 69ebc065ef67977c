//! Источники событий UI чужих приложений.
//!
//! Источник только доставляет события (приложение + снимок дерева) в сервис
//! автоматизации. Решения о вводе URL принимает исключительно сессия.

use crate::config::Config;
use crate::error::{RelayError, Result};
use crate::events::{UiAction, UiDriver, UiEvent, UiEventType, UiNode, UiSnapshot};
use crate::services::automation::{AutomationService, EventOutcome};
use crate::debug_if_enabled;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{interval, Duration};
use tracing::{debug, info, warn};

/// Trait for UI event sources that can run in different modes
#[async_trait::async_trait]
pub trait UiEventSource {
    /// Run the source until it is exhausted or aborted
    async fn run(self: Box<Self>, service: Arc<AutomationService>) -> Result<()>;
}

/// Factory function to create an appropriate UI event source
pub fn create_ui_source(
    config: Arc<Config>,
    target_app: Option<String>,
    dry_run: bool,
) -> Result<Box<dyn UiEventSource + Send>> {
    if dry_run || config.source.mode == "dry_run" {
        return Ok(Box::new(DryRunUiSource::new(
            target_app.unwrap_or_else(|| "com.android.chrome".to_string()),
            Duration::from_millis(config.source.interval_ms),
        )));
    }

    match config.source.mode.as_str() {
        "stdin" => Ok(Box::new(StdinUiSource::new())),
        other => Err(RelayError::Internal(format!(
            "Неизвестный источник UI событий: {}",
            other
        ))),
    }
}

/// Драйвер, который только запоминает действия
#[derive(Debug, Default)]
pub struct RecordingDriver {
    actions: Mutex<Vec<(String, u64, UiAction)>>,
}

impl RecordingDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn actions(&self) -> Vec<(String, u64, UiAction)> {
        self.actions.lock().clone()
    }
}

impl UiDriver for RecordingDriver {
    fn perform(&self, app: &str, node_id: u64, action: UiAction) -> Result<()> {
        debug!("[DRY RUN] {} #{}: {:?}", app, node_id, action);
        self.actions.lock().push((app.to_string(), node_id, action));
        Ok(())
    }
}

/// Эмуляция: целевое приложение открывает новую вкладку, затем адресную строку
pub struct DryRunUiSource {
    target_app: String,
    interval: Duration,
    driver: Arc<RecordingDriver>,
}

impl DryRunUiSource {
    pub fn new(target_app: String, interval: Duration) -> Self {
        Self {
            target_app,
            interval,
            driver: Arc::new(RecordingDriver::new()),
        }
    }

    fn frames(&self) -> Vec<(String, UiNode)> {
        let id = |name: &str| format!("{}:id/{}", self.target_app, name);
        vec![
            (
                "com.android.launcher".to_string(),
                UiNode::new(1, "FrameLayout").with_child(UiNode::new(2, "TextView").with_text("Home")),
            ),
            (
                self.target_app.clone(),
                UiNode::new(1, "FrameLayout")
                    .with_child(UiNode::new(10, "TextView").with_resource_id(id("search_box_text"))),
            ),
            (
                self.target_app.clone(),
                UiNode::new(1, "FrameLayout").with_child(
                    UiNode::new(20, "EditText")
                        .with_resource_id(id("url_bar"))
                        .editable(),
                ),
            ),
        ]
    }
}

#[async_trait::async_trait]
impl UiEventSource for DryRunUiSource {
    async fn run(self: Box<Self>, service: Arc<AutomationService>) -> Result<()> {
        info!("Dry-run режим - источник UI событий работает в режиме эмуляции");

        let frames = self.frames();
        let mut frame_index = 0;
        let mut interval = interval(self.interval);

        loop {
            interval.tick().await;

            let (app, root) = frames[frame_index].clone();
            let snapshot = UiSnapshot::new(app, root, self.driver.clone());
            let event = UiEvent::content_changed(snapshot);

            let outcome = service.dispatch(&event);
            debug_if_enabled!("Dry-run: событие {} -> {:?}", event, outcome);
            if outcome == EventOutcome::Completed {
                info!("Dry-run: ввод выполнен, действий: {}", self.driver.actions().len());
            }

            frame_index = (frame_index + 1) % frames.len();
        }
    }
}

/// Строка протокола stdin: одно событие UI
#[derive(Debug, Clone, Deserialize)]
struct RawUiEvent {
    app: String,
    event_type: UiEventType,
    #[serde(default)]
    root: Option<UiNode>,
}

/// Строка протокола stdout: одно действие над узлом
#[derive(Debug, Clone, Serialize)]
struct RawUiAction<'a> {
    app: &'a str,
    node: u64,
    #[serde(flatten)]
    action: &'a UiAction,
}

/// Драйвер, пишущий действия JSON-строками в stdout
#[derive(Debug, Default)]
pub struct JsonLinesDriver;

impl UiDriver for JsonLinesDriver {
    fn perform(&self, app: &str, node_id: u64, action: UiAction) -> Result<()> {
        let line = serde_json::to_string(&RawUiAction {
            app,
            node: node_id,
            action: &action,
        })?;
        let mut stdout = std::io::stdout().lock();
        writeln!(stdout, "{}", line)?;
        stdout.flush()?;
        Ok(())
    }
}

/// Сколько прочитанных строк stdin может ждать обработки
const STDIN_BUFFER: usize = 64;

/// События JSON-строками из stdin, действия JSON-строками в stdout
pub struct StdinUiSource {
    driver: Arc<dyn UiDriver>,
}

impl Default for StdinUiSource {
    fn default() -> Self {
        Self::new()
    }
}

impl StdinUiSource {
    pub fn new() -> Self {
        Self {
            driver: Arc::new(JsonLinesDriver),
        }
    }

    fn parse(&self, line: &str) -> Result<UiEvent> {
        let raw: RawUiEvent = serde_json::from_str(line)?;
        let snapshot = raw
            .root
            .map(|root| UiSnapshot::new(raw.app.clone(), root, self.driver.clone()));
        Ok(UiEvent::new(raw.app, raw.event_type, snapshot))
    }

    /// Блокирующее чтение stdin в отдельном потоке.
    /// Поток не привязан к рантайму и не задерживает завершение процесса.
    fn spawn_reader() -> Result<mpsc::Receiver<String>> {
        let (tx, rx) = mpsc::channel(STDIN_BUFFER);
        std::thread::Builder::new()
            .name("ui-stdin".to_string())
            .spawn(move || {
                for line in std::io::stdin().lines() {
                    match line {
                        Ok(line) => {
                            if tx.blocking_send(line).is_err() {
                                break;
                            }
                        }
                        Err(e) => {
                            warn!("Ошибка чтения stdin: {}", e);
                            break;
                        }
                    }
                }
            })?;
        Ok(rx)
    }

    async fn consume(&self, mut lines: mpsc::Receiver<String>, service: &AutomationService) {
        while let Some(line) = lines.recv().await {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match self.parse(line) {
                Ok(event) => {
                    let outcome = service.dispatch(&event);
                    debug_if_enabled!("Событие {} -> {:?}", event, outcome);
                }
                Err(e) => warn!("Некорректное UI событие пропущено: {}", e),
            }
        }
    }
}

#[async_trait::async_trait]
impl UiEventSource for StdinUiSource {
    async fn run(self: Box<Self>, service: Arc<AutomationService>) -> Result<()> {
        info!("Чтение UI событий из stdin");

        let lines = Self::spawn_reader()?;
        self.consume(lines, &service).await;

        info!("stdin закрыт, источник UI событий остановлен");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::automation::AUTOMATION_TIMEOUT;
    use crate::services::injection::omnibox_injector;
    use tokio::runtime::Handle;

    #[test]
    fn test_parse_stdin_line() {
        let source = StdinUiSource::new();
        let event = source
            .parse(r#"{"app": "com.android.chrome", "event_type": "window_state_changed", "root": {"id": 1, "class_name": "FrameLayout"}}"#)
            .unwrap();

        assert_eq!(event.source_app, "com.android.chrome");
        assert_eq!(event.event_type, UiEventType::WindowStateChanged);
        assert_eq!(event.snapshot.as_ref().map(|s| s.root().id), Some(1));

        let unknown = source
            .parse(r#"{"app": "x", "event_type": "announcement"}"#)
            .unwrap();
        assert_eq!(unknown.event_type, UiEventType::Other);
        assert!(unknown.snapshot.is_none());

        assert!(source.parse("not json").is_err());
    }

    #[test]
    fn test_action_line_format() {
        let action = UiAction::SetText("https://y".to_string());
        let line = serde_json::to_string(&RawUiAction {
            app: "com.android.chrome",
            node: 20,
            action: &action,
        })
        .unwrap();
        assert_eq!(
            line,
            r#"{"app":"com.android.chrome","node":20,"action":"set_text","value":"https://y"}"#
        );
    }

    #[test]
    fn test_factory_respects_dry_run() {
        let mut config = Config::default();
        config.source.mode = "stdin".to_string();
        let config = Arc::new(config);

        assert!(create_ui_source(config.clone(), None, true).is_ok());
        assert!(create_ui_source(config, None, false).is_ok());
    }

    const URL_BAR_LINE: &str = r#"{"app": "com.android.chrome", "event_type": "window_content_changed", "root": {"id": 1, "class_name": "FrameLayout", "children": [{"id": 20, "class_name": "EditText", "resource_id": "com.android.chrome:id/url_bar", "editable": true}]}}"#;

    fn armed_service() -> Arc<AutomationService> {
        let service = Arc::new(AutomationService::new(Handle::current(), AUTOMATION_TIMEOUT));
        service.connect();
        service
            .request_injection("com.android.chrome", "https://y", omnibox_injector("https://y"))
            .unwrap();
        service
    }

    #[tokio::test(start_paused = true)]
    async fn test_stdin_lines_complete_and_source_stays_abortable() {
        let service = armed_service();
        let driver = Arc::new(RecordingDriver::new());
        let source = StdinUiSource {
            driver: driver.clone(),
        };

        let (tx, rx) = mpsc::channel(STDIN_BUFFER);
        let consumer_service = service.clone();
        let task = tokio::spawn(async move { source.consume(rx, &consumer_service).await });

        tx.send("garbage".to_string()).await.unwrap();
        tx.send(URL_BAR_LINE.to_string()).await.unwrap();
        tokio::time::timeout(Duration::from_secs(5), service.wait_idle())
            .await
            .expect("ввод должен завершиться до таймаута");
        assert_eq!(driver.actions().len(), 3);

        // писатель всё ещё открыт, но задача источника должна прерываться
        task.abort();
        let result = tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("прерванная задача должна завершиться сразу");
        assert!(result.unwrap_err().is_cancelled());
        drop(tx);
    }

    #[tokio::test]
    async fn test_stdin_consume_ends_on_closed_stream() {
        let service = armed_service();
        let source = StdinUiSource {
            driver: Arc::new(RecordingDriver::new()),
        };

        let (tx, rx) = mpsc::channel(STDIN_BUFFER);
        drop(tx);
        source.consume(rx, &service).await;
        assert!(service.is_armed());
        service.disconnect();
    }

    #[tokio::test(start_paused = true)]
    async fn test_dry_run_completes_injection() {
        let service = armed_service();

        let source = Box::new(DryRunUiSource::new(
            "com.android.chrome".to_string(),
            Duration::from_millis(100),
        ));
        let driver = source.driver.clone();
        let task = tokio::spawn(source.run(service.clone()));

        tokio::time::timeout(Duration::from_secs(5), service.wait_idle())
            .await
            .expect("ввод должен завершиться до таймаута");
        task.abort();

        let actions: Vec<UiAction> = driver.actions().into_iter().map(|(_, _, a)| a).collect();
        assert_eq!(
            actions,
            vec![
                UiAction::Click,
                UiAction::Focus,
                UiAction::SetText("https://y".to_string()),
                UiAction::ImeEnter
            ]
        );
    }
}
