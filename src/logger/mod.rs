//! Named, per-instance loggers in the spirit of `@firebase/logger`.
//!
//! Each module of the crate owns a static [`Logger`] identified by a
//! `sync/<area>` name. The default handler forwards to the [`log`] facade so
//! the embedding application decides where output goes; tests swap in a
//! capturing handler via [`Logger::set_log_handler`].

use std::fmt::Display;
use std::str::FromStr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, RwLock};

type SharedLogHandler = Arc<dyn Fn(&Logger, LogLevel, &str) + Send + Sync + 'static>;

#[derive(Clone)]
pub struct Logger {
    inner: Arc<LoggerInner>,
}

struct LoggerInner {
    name: String,
    level: AtomicU8,
    handler: RwLock<SharedLogHandler>,
}

impl Logger {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(LoggerInner {
                name: name.into(),
                level: AtomicU8::new(LogLevel::Info as u8),
                handler: RwLock::new(default_log_handler_arc()),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn log_level(&self) -> LogLevel {
        LogLevel::from_u8(self.inner.level.load(Ordering::SeqCst))
    }

    pub fn set_log_level(&self, level: LogLevel) {
        self.inner.level.store(level as u8, Ordering::SeqCst);
    }

    /// Replaces the output handler. The handler observes every emitted record
    /// regardless of the configured level; level filtering is the handler's
    /// job so capturing handlers can also see suppressed records.
    pub fn set_log_handler<F>(&self, handler: F)
    where
        F: Fn(&Logger, LogLevel, &str) + Send + Sync + 'static,
    {
        *self.inner.handler.write().unwrap() = Arc::new(handler);
    }

    pub fn reset_log_handler(&self) {
        *self.inner.handler.write().unwrap() = default_log_handler_arc();
    }

    pub fn debug(&self, message: impl Display) {
        self.dispatch(LogLevel::Debug, message);
    }

    pub fn info(&self, message: impl Display) {
        self.dispatch(LogLevel::Info, message);
    }

    pub fn warn(&self, message: impl Display) {
        self.dispatch(LogLevel::Warn, message);
    }

    pub fn error(&self, message: impl Display) {
        self.dispatch(LogLevel::Error, message);
    }

    fn dispatch(&self, level: LogLevel, message: impl Display) {
        let handler = self.inner.handler.read().unwrap().clone();
        handler(self, level, &message.to_string());
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum LogLevel {
    Debug = 0,
    Info = 1,
    Warn = 2,
    Error = 3,
    Silent = 4,
}

impl LogLevel {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => LogLevel::Debug,
            1 => LogLevel::Info,
            2 => LogLevel::Warn,
            3 => LogLevel::Error,
            _ => LogLevel::Silent,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
            LogLevel::Silent => "silent",
        }
    }

    fn to_facade(self) -> Option<log::Level> {
        match self {
            LogLevel::Debug => Some(log::Level::Debug),
            LogLevel::Info => Some(log::Level::Info),
            LogLevel::Warn => Some(log::Level::Warn),
            LogLevel::Error => Some(log::Level::Error),
            LogLevel::Silent => None,
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            "silent" => Ok(LogLevel::Silent),
            other => Err(format!("invalid log level: {other}")),
        }
    }
}

fn default_log_handler_arc() -> SharedLogHandler {
    Arc::new(default_log_handler)
}

fn default_log_handler(logger: &Logger, level: LogLevel, message: &str) {
    if level < logger.log_level() {
        return;
    }
    if let Some(facade_level) = level.to_facade() {
        log::log!(target: logger.name(), facade_level, "{message}");
    }
}
