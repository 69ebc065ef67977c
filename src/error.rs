use thiserror::Error;

#[derive(Error, Debug)]
pub enum RelayError {
    #[error("Ошибка конфигурации: {0}")]
    Config(#[from] anyhow::Error),

    #[error("Ошибка ввода-вывода: {0}")]
    Io(#[from] std::io::Error),

    #[error("Ошибка JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Повторный вызов on_new_url во время обновления, используйте UrlProposer из on_modify_url")]
    ReentrantUpdate,

    #[error("Обработчик '{0}' уже зарегистрирован")]
    DuplicateHandler(String),

    #[error("Неизвестный обработчик: {0}")]
    UnknownHandler(String),

    #[error("Сервис недоступен: {0}")]
    ServiceUnavailable(String),

    #[allow(dead_code)]
    #[error("Ошибка обработчика: {0}")]
    Handler(String),

    #[error("Некорректный ввод: {0}")]
    InvalidInput(String),

    #[error("Внутренняя ошибка: {0}")]
    Internal(String),
}

impl RelayError {
    pub fn service_unavailable<T>(msg: impl Into<String>) -> Result<T> {
        Err(RelayError::ServiceUnavailable(msg.into()))
    }
}

pub type Result<T> = std::result::Result<T, RelayError>;

// Удобные макросы для создания ошибок
#[macro_export]
macro_rules! relay_error {
    (handler, $($arg:tt)*) => {
        $crate::error::RelayError::Handler(format!($($arg)*))
    };
    (unknown_handler, $($arg:tt)*) => {
        $crate::error::RelayError::UnknownHandler(format!($($arg)*))
    };
    (invalid_input, $($arg:tt)*) => {
        $crate::error::RelayError::InvalidInput(format!($($arg)*))
    };
    (service_unavailable, $($arg:tt)*) => {
        $crate::error::RelayError::ServiceUnavailable(format!($($arg)*))
    };
    (internal, $($arg:tt)*) => {
        $crate::error::RelayError::Internal(format!($($arg)*))
    };
}
