use crate::error::{RelayError, Result};
use crate::events::UiEvent;
use crate::services::automation::{AutomationSession, EventOutcome, SuccessPredicate};
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::time::Duration;
use tracing::{info, warn};

/// Явный дескриптор сервиса автоматизации.
///
/// Пока сервис не подключён, запросы на ввод отклоняются, а события UI
/// игнорируются. Отключение закрывает взведённую сессию.
pub struct AutomationService {
    runtime: Handle,
    timeout: Duration,
    session: RwLock<Option<Arc<AutomationSession>>>,
}

impl AutomationService {
    pub fn new(runtime: Handle, timeout: Duration) -> Self {
        Self {
            runtime,
            timeout,
            session: RwLock::new(None),
        }
    }

    /// Подключает сервис; повторное подключение возвращает текущую сессию
    pub fn connect(&self) -> Arc<AutomationSession> {
        let mut session = self.session.write();
        if let Some(existing) = session.as_ref() {
            return existing.clone();
        }
        info!("Сервис автоматизации подключён");
        let created = Arc::new(AutomationSession::new(self.runtime.clone()));
        *session = Some(created.clone());
        created
    }

    pub fn disconnect(&self) {
        if let Some(session) = self.session.write().take() {
            session.cancel();
            info!("Сервис автоматизации отключён");
        }
    }

    #[allow(dead_code)]
    pub fn is_connected(&self) -> bool {
        self.session.read().is_some()
    }

    pub fn session(&self) -> Option<Arc<AutomationSession>> {
        self.session.read().clone()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Взводит сессию ввода `url` в приложение `target_app`
    pub fn request_injection(
        &self,
        target_app: &str,
        url: &str,
        predicate: SuccessPredicate,
    ) -> Result<()> {
        let Some(session) = self.session() else {
            warn!("Сервис автоматизации не подключён, ввод в {} невозможен", target_app);
            return RelayError::service_unavailable("сервис автоматизации не подключён");
        };
        session.arm(target_app, url, predicate, self.timeout);
        Ok(())
    }

    /// Передаёт событие UI в сессию
    pub fn dispatch(&self, event: &UiEvent) -> EventOutcome {
        match self.session() {
            Some(session) => session.on_foreign_ui_event(event),
            None => EventOutcome::Ignored,
        }
    }

    pub fn is_armed(&self) -> bool {
        self.session().is_some_and(|s| s.is_armed())
    }

    /// Ждёт завершения текущей попытки (сразу возвращается, если сервис отключён)
    pub async fn wait_idle(&self) {
        if let Some(session) = self.session() {
            session.wait_idle().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{UiNode, UiSnapshot};
    use crate::services::automation::AUTOMATION_TIMEOUT;
    use crate::services::ui_source::RecordingDriver;

    fn always(result: bool) -> SuccessPredicate {
        Box::new(move |_: &UiSnapshot| -> Result<bool> { Ok(result) })
    }

    fn event(app: &str) -> UiEvent {
        let driver = Arc::new(RecordingDriver::new());
        UiEvent::content_changed(UiSnapshot::new(app, UiNode::new(1, "FrameLayout"), driver))
    }

    #[tokio::test(start_paused = true)]
    async fn test_requests_rejected_until_connected() {
        let service = AutomationService::new(Handle::current(), AUTOMATION_TIMEOUT);

        let err = service
            .request_injection("app.chromium", "https://y", always(true))
            .unwrap_err();
        assert!(matches!(err, RelayError::ServiceUnavailable(_)));
        assert_eq!(service.dispatch(&event("app.chromium")), EventOutcome::Ignored);

        service.connect();
        service
            .request_injection("app.chromium", "https://y", always(true))
            .unwrap();
        assert!(service.is_armed());
        assert_eq!(service.dispatch(&event("app.chromium")), EventOutcome::Completed);
        assert!(!service.is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_is_idempotent() {
        let service = AutomationService::new(Handle::current(), AUTOMATION_TIMEOUT);
        let first = service.connect();
        let second = service.connect();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_scrubs_session() {
        let service = AutomationService::new(Handle::current(), AUTOMATION_TIMEOUT);
        let session = service.connect();
        service
            .request_injection("app.chromium", "https://y", always(false))
            .unwrap();

        service.disconnect();

        assert!(!service.is_connected());
        assert!(!session.snapshot().has_payload);
        assert_eq!(service.dispatch(&event("app.chromium")), EventOutcome::Ignored);
        // ожидание после отключения не блокируется
        service.wait_idle().await;
    }
}
