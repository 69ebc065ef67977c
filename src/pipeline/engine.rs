use crate::error::{RelayError, Result};
use crate::pipeline::{HandlerOutcome, HandlerRegistry, Phase, UrlHandler, UrlProposer, UrlRecord};
use crate::debug_if_enabled;
use parking_lot::RwLock;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Максимум принятых изменений за один цикл, защита от бесконечной перезаписи
pub const MAX_ITERATIONS: usize = 100;

type CapHook = Box<dyn Fn(&UrlRecord) + Send + Sync>;

/// Итог одного цикла обновления
#[derive(Debug, Clone)]
pub struct CycleReport {
    /// Запись, переданная в фазу отображения
    pub record: UrlRecord,
    /// Количество проходов prepare/modify
    pub passes: usize,
    /// Количество принятых предложений
    pub rewrites: usize,
    /// Были ли предложения отклонены из-за лимита
    pub capped: bool,
    pub failures: Vec<HandlerOutcome>,
}

/// Движок сходимости: единственный владелец записи на время цикла.
///
/// Цикл выполняется целиком в потоке вызывающего. Повторный вызов
/// `on_new_url` из обработчика отклоняется: для изменений есть `UrlProposer`.
pub struct PipelineEngine {
    registry: HandlerRegistry,
    max_iterations: usize,
    updating: AtomicBool,
    current: RwLock<UrlRecord>,
    cap_hook: Option<CapHook>,
}

/// Сбрасывает флаг обновления даже при панике внутри цикла
struct UpdatingGuard<'a>(&'a AtomicBool);

impl Drop for UpdatingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl PipelineEngine {
    pub fn new(registry: HandlerRegistry) -> Self {
        Self {
            registry,
            max_iterations: MAX_ITERATIONS,
            updating: AtomicBool::new(false),
            current: RwLock::new(UrlRecord::new("")),
            cap_hook: None,
        }
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Вызывается один раз за цикл, если предложения отклонялись из-за лимита
    pub fn with_cap_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(&UrlRecord) + Send + Sync + 'static,
    {
        self.cap_hook = Some(Box::new(hook));
        self
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    #[allow(dead_code)]
    pub fn current_url(&self) -> String {
        self.current.read().url().to_string()
    }

    #[allow(dead_code)]
    pub fn current_record(&self) -> UrlRecord {
        self.current.read().clone()
    }

    #[allow(dead_code)]
    pub fn is_updating(&self) -> bool {
        self.updating.load(Ordering::Acquire)
    }

    /// Новый URL извне: прогоняет цикл до сходимости
    pub fn on_new_url(&self, initial: UrlRecord) -> Result<CycleReport> {
        if self.updating.swap(true, Ordering::AcqRel) {
            error!("Вызов on_new_url во время обновления отклонён, используйте UrlProposer в on_modify_url");
            return Err(RelayError::ReentrantUpdate);
        }
        let _guard = UpdatingGuard(&self.updating);

        Ok(self.run_cycle(initial))
    }

    fn run_cycle(&self, initial: UrlRecord) -> CycleReport {
        let handlers = self.registry.handlers();
        let mut record = initial;
        *self.current.write() = record.clone();

        let mut passes = 0;
        let mut rewrites = 0;
        let mut capped = false;
        let mut failures = Vec::new();

        'main: loop {
            passes += 1;
            debug_if_enabled!("Проход #{}: {}", passes, record);

            for handler in handlers {
                if record.skips(handler.id()) {
                    continue;
                }
                let outcome = Self::invoke(handler, Phase::Prepare, || handler.on_prepare_url(&record));
                Self::collect(&mut failures, outcome);
            }

            for handler in handlers {
                if record.skips(handler.id()) {
                    continue;
                }
                let below_cap = rewrites < self.max_iterations;
                let mut proposer = UrlProposer::new(!record.updates_disabled() && below_cap);
                let outcome = Self::invoke(handler, Phase::Modify, || {
                    handler.on_modify_url(&record, &mut proposer)
                });
                let succeeded = outcome.is_ok();
                Self::collect(&mut failures, outcome);

                if !below_cap && !record.updates_disabled() && proposer.rejected() > 0 {
                    capped = true;
                }

                // предложение засчитывается, только если обработчик завершился без ошибки
                if let Some(next) = proposer.into_accepted().filter(|_| succeeded) {
                    debug_if_enabled!("Обработчик '{}' изменил URL: {} -> {}", handler.id(), record.url(), next.url());
                    record = next.merged_with(&record);
                    rewrites += 1;
                    *self.current.write() = record.clone();
                    continue 'main;
                }
            }

            break;
        }

        if capped {
            warn!(
                "Достигнут лимит изменений ({}), дальнейшие предложения отклонены: {}",
                self.max_iterations,
                record.url()
            );
            if let Some(hook) = &self.cap_hook {
                hook(&record);
            }
        }

        self.display(&record, &mut failures);

        info!(
            "Цикл обновления завершён: {} (проходов: {}, изменений: {}, ошибок: {})",
            record.url(),
            passes,
            rewrites,
            failures.len()
        );

        CycleReport {
            record,
            passes,
            rewrites,
            capped,
            failures,
        }
    }

    /// Фаза отображения: отложенный обработчик всегда последний
    fn display(&self, record: &UrlRecord, failures: &mut Vec<HandlerOutcome>) {
        let display_state = self.registry.display_state();
        display_state.begin_display();

        let deferred = self.registry.deferred();
        let ordered = self
            .registry
            .handlers()
            .iter()
            .filter(|h| !self.registry.is_deferred(h.id()))
            .chain(deferred);

        for handler in ordered {
            if record.skips(handler.id()) {
                continue;
            }
            let outcome = Self::invoke(handler, Phase::Display, || handler.on_display_url(record));
            display_state.mark_displayed(handler.id());
            Self::collect(failures, outcome);
        }
    }

    fn invoke<F>(handler: &Arc<dyn UrlHandler>, phase: Phase, call: F) -> HandlerOutcome
    where
        F: FnOnce() -> Result<()>,
    {
        let reason = match panic::catch_unwind(AssertUnwindSafe(call)) {
            Ok(Ok(())) => return HandlerOutcome::Ok,
            Ok(Err(e)) => e.to_string(),
            Err(payload) => panic_message(payload.as_ref()),
        };

        error!("Ошибка в {} обработчика '{}': {}", phase, handler.id(), reason);
        HandlerOutcome::Failed {
            handler: handler.id().to_string(),
            phase,
            reason,
        }
    }

    fn collect(failures: &mut Vec<HandlerOutcome>, outcome: HandlerOutcome) {
        if !outcome.is_ok() {
            failures.push(outcome);
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("паника: {}", message)
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("паника: {}", message)
    } else {
        "паника".to_string()
    }
}
