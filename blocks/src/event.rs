use std::fmt;

/// Severity/category of a runtime log line, as shown in the run log panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogLevel {
    Info,
    Warning,
    Error,
    Execution,
    Success,
    Connection,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Info => "info",
            LogLevel::Warning => "warning",
            LogLevel::Error => "error",
            LogLevel::Execution => "execution",
            LogLevel::Success => "success",
            LogLevel::Connection => "connection",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LogEvent {
    pub level: LogLevel,
    pub message: String,
}

impl LogEvent {
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        LogEvent {
            level,
            message: message.into(),
        }
    }
}

impl fmt::Display for LogEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.level, self.message)
    }
}

/// Receives log lines in the order they happen.
pub trait LogSink {
    fn log(&mut self, event: LogEvent);
}

impl dyn LogSink + '_ {
    pub fn info(&mut self, message: impl Into<String>) {
        self.log(LogEvent::new(LogLevel::Info, message));
    }

    pub fn warning(&mut self, message: impl Into<String>) {
        self.log(LogEvent::new(LogLevel::Warning, message));
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.log(LogEvent::new(LogLevel::Error, message));
    }

    pub fn execution(&mut self, message: impl Into<String>) {
        self.log(LogEvent::new(LogLevel::Execution, message));
    }

    pub fn success(&mut self, message: impl Into<String>) {
        self.log(LogEvent::new(LogLevel::Success, message));
    }

    pub fn connection(&mut self, message: impl Into<String>) {
        self.log(LogEvent::new(LogLevel::Connection, message));
    }
}

/// Keeps every event in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryLog {
    events: Vec<LogEvent>,
}

impl MemoryLog {
    pub fn new() -> Self {
        MemoryLog::default()
    }

    pub fn events(&self) -> &[LogEvent] {
        &self.events
    }

    pub fn messages(&self) -> Vec<&str> {
        self.events.iter().map(|e| e.message.as_str()).collect()
    }

    pub fn count(&self, level: LogLevel) -> usize {
        self.events.iter().filter(|e| e.level == level).count()
    }

    pub fn with_level(&self, level: LogLevel) -> Vec<&str> {
        self.events
            .iter()
            .filter(|e| e.level == level)
            .map(|e| e.message.as_str())
            .collect()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

impl LogSink for MemoryLog {
    fn log(&mut self, event: LogEvent) {
        self.events.push(event);
    }
}
