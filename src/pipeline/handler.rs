use crate::error::Result;
use crate::pipeline::UrlRecord;
use std::fmt;

/// Обработчик конвейера URL.
///
/// Все три метода необязательны. Обработчики разделяются между движком и
/// остальными сервисами через `Arc`, поэтому собственное состояние они держат
/// за внутренней изменяемостью.
pub trait UrlHandler: Send + Sync {
    /// Стабильный идентификатор обработчика
    fn id(&self) -> &str;

    /// Только наблюдение за текущей записью
    fn on_prepare_url(&self, _record: &UrlRecord) -> Result<()> {
        Ok(())
    }

    /// Может предложить замену записи через `proposer`
    fn on_modify_url(&self, _record: &UrlRecord, _proposer: &mut UrlProposer) -> Result<()> {
        Ok(())
    }

    /// Итоговая запись после сходимости
    fn on_display_url(&self, _record: &UrlRecord) -> Result<()> {
        Ok(())
    }
}

/// Канал предложения новой записи внутри цикла обновления.
///
/// Вместо повторного вызова `on_new_url` обработчик передаёт сюда замену.
/// `propose` возвращает `false`, если изменения сейчас не принимаются.
pub struct UrlProposer {
    accepting: bool,
    accepted: Option<UrlRecord>,
    rejected: usize,
}

impl UrlProposer {
    pub(crate) fn new(accepting: bool) -> Self {
        Self {
            accepting,
            accepted: None,
            rejected: 0,
        }
    }

    pub fn propose(&mut self, record: UrlRecord) -> bool {
        if !self.accepting {
            self.rejected += 1;
            return false;
        }
        // последнее принятое предложение обработчика побеждает
        self.accepted = Some(record);
        true
    }

    #[allow(dead_code)]
    pub fn is_accepting(&self) -> bool {
        self.accepting
    }

    pub(crate) fn rejected(&self) -> usize {
        self.rejected
    }

    pub(crate) fn into_accepted(self) -> Option<UrlRecord> {
        self.accepted
    }
}

/// Фаза цикла обновления
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Prepare,
    Modify,
    Display,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Prepare => "on_prepare_url",
            Phase::Modify => "on_modify_url",
            Phase::Display => "on_display_url",
        };
        write!(f, "{}", name)
    }
}

/// Результат одного вызова обработчика
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerOutcome {
    Ok,
    Failed {
        handler: String,
        phase: Phase,
        reason: String,
    },
}

impl HandlerOutcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, HandlerOutcome::Ok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_proposer_rejects_when_closed() {
        let mut closed = UrlProposer::new(false);
        assert!(!closed.propose(UrlRecord::new("a")));
        assert!(closed.into_accepted().is_none());
    }

    #[test]
    fn test_proposer_keeps_last_accepted() {
        let mut open = UrlProposer::new(true);
        assert!(open.propose(UrlRecord::new("a")));
        assert!(open.propose(UrlRecord::new("b")));
        assert_eq!(open.into_accepted().map(|r| r.url().to_string()), Some("b".to_string()));
    }
}
