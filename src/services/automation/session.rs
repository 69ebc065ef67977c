use crate::error::Result;
use crate::events::{UiEvent, UiSnapshot};
use crate::debug_if_enabled;
use parking_lot::Mutex;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Weak};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration, Instant};
use tracing::{info, warn};

/// Срок жизни одной попытки автоматического ввода
pub const AUTOMATION_TIMEOUT: Duration = Duration::from_secs(10);

/// Вызывается на каждом подходящем снимке UI; выполняет ввод как побочный
/// эффект и возвращает `true`, когда ввод удался.
pub type SuccessPredicate = Box<dyn Fn(&UiSnapshot) -> Result<bool> + Send + Sync>;

/// Результат обработки события UI
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    /// Сессия не взведена или событие не относится к цели
    Ignored,
    /// Предикат вызван, ввод ещё не удался
    Pending,
    /// Ввод удался, сессия закрыта
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CloseReason {
    Completed,
    Cancelled,
    Expired,
    Replaced,
}

/// Внутреннее состояние; все поля кроме `generation` пусты, пока сессия не взведена
#[derive(Default)]
struct SessionState {
    armed: bool,
    target_app: Option<String>,
    payload: Option<String>,
    predicate: Option<SuccessPredicate>,
    deadline: Option<Instant>,
    timer: Option<JoinHandle<()>>,
    generation: u64,
}

impl SessionState {
    fn clear(&mut self) {
        self.armed = false;
        self.target_app = None;
        self.payload = None;
        self.predicate = None;
        self.deadline = None;
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

/// Наблюдаемое состояние сессии, без самого URL
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(dead_code)]
pub struct SessionSnapshot {
    pub armed: bool,
    pub target_app: Option<String>,
    pub has_payload: bool,
    pub has_predicate: bool,
    pub deadline: Option<Instant>,
}

struct Inner {
    state: Mutex<SessionState>,
    armed_tx: watch::Sender<bool>,
}

impl Inner {
    fn close(&self, state: &mut SessionState, reason: CloseReason) {
        info!(
            "Сессия автоматизации для {} закрыта: {:?}",
            state.target_app.as_deref().unwrap_or("?"),
            reason
        );
        state.clear();
        self.armed_tx.send_replace(false);
    }

    /// Срабатывание таймера; устаревшее поколение ничего не закрывает
    fn expire(&self, generation: u64) {
        let mut state = self.state.lock();
        if !state.armed || state.generation != generation {
            debug_if_enabled!("Устаревший таймер поколения {} проигнорирован", generation);
            return;
        }
        // собственный JoinHandle не прерываем, просто отпускаем
        state.timer.take();
        self.close(&mut state, CloseReason::Expired);
    }
}

/// Единственная попытка ввода URL в UI чужого приложения.
///
/// `arm`, обработка событий, `cancel` и истечение срока выполняются под одним
/// мьютексом, поэтому событие видит либо старую сессию целиком, либо новую.
/// Предикат вызывается под этим мьютексом и не должен обращаться к сессии.
pub struct AutomationSession {
    inner: Arc<Inner>,
    runtime: Handle,
}

impl AutomationSession {
    pub fn new(runtime: Handle) -> Self {
        let (armed_tx, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(SessionState::default()),
                armed_tx,
            }),
            runtime,
        }
    }

    /// Взводит сессию; уже взведённая предварительно закрывается и очищается
    pub fn arm(
        &self,
        target_app: impl Into<String>,
        payload: impl Into<String>,
        predicate: SuccessPredicate,
        timeout: Duration,
    ) {
        let target_app = target_app.into();
        let mut state = self.inner.state.lock();

        if state.armed {
            self.inner.close(&mut state, CloseReason::Replaced);
        }

        state.generation += 1;
        let generation = state.generation;

        state.armed = true;
        state.target_app = Some(target_app.clone());
        state.payload = Some(payload.into());
        state.predicate = Some(predicate);
        state.deadline = Some(Instant::now() + timeout);

        let inner: Weak<Inner> = Arc::downgrade(&self.inner);
        state.timer = Some(self.runtime.spawn(async move {
            sleep(timeout).await;
            if let Some(inner) = inner.upgrade() {
                inner.expire(generation);
            }
        }));

        self.inner.armed_tx.send_replace(true);
        info!(
            "Сессия автоматизации взведена для {} (таймаут {:?})",
            target_app, timeout
        );
    }

    /// Событие UI чужого приложения
    pub fn on_foreign_ui_event(&self, event: &UiEvent) -> EventOutcome {
        let mut state = self.inner.state.lock();

        if !state.armed || state.target_app.as_deref() != Some(event.source_app.as_str()) {
            return EventOutcome::Ignored;
        }

        // таймер мог не успеть сработать, срок проверяем и здесь
        if state.deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            self.inner.close(&mut state, CloseReason::Expired);
            return EventOutcome::Ignored;
        }

        if !event.event_type.is_window_change() {
            return EventOutcome::Ignored;
        }

        let (Some(snapshot), Some(predicate)) = (event.snapshot.as_ref(), state.predicate.as_ref()) else {
            return EventOutcome::Ignored;
        };

        debug_if_enabled!("Проверка события: {}", event);

        match panic::catch_unwind(AssertUnwindSafe(|| predicate(snapshot))) {
            Ok(Ok(true)) => {
                self.inner.close(&mut state, CloseReason::Completed);
                EventOutcome::Completed
            }
            Ok(Ok(false)) => EventOutcome::Pending,
            Ok(Err(e)) => {
                warn!("Ошибка ввода URL в {}: {}", event.source_app, e);
                EventOutcome::Pending
            }
            Err(_) => {
                warn!("Паника в предикате ввода для {}", event.source_app);
                EventOutcome::Pending
            }
        }
    }

    /// Досрочное закрытие; возвращает, была ли сессия взведена
    pub fn cancel(&self) -> bool {
        let mut state = self.inner.state.lock();
        if !state.armed {
            return false;
        }
        self.inner.close(&mut state, CloseReason::Cancelled);
        true
    }

    pub fn is_armed(&self) -> bool {
        self.inner.state.lock().armed
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let state = self.inner.state.lock();
        SessionSnapshot {
            armed: state.armed,
            target_app: state.target_app.clone(),
            has_payload: state.payload.is_some(),
            has_predicate: state.predicate.is_some(),
            deadline: state.deadline,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.inner.armed_tx.subscribe()
    }

    /// Ждёт, пока сессия не перейдёт в ожидание
    pub async fn wait_idle(&self) {
        let mut armed = self.subscribe();
        while *armed.borrow_and_update() {
            if armed.changed().await.is_err() {
                break;
            }
        }
    }
}

impl Drop for AutomationSession {
    fn drop(&mut self) {
        self.inner.state.lock().clear();
    }
}
