//! Logging utilities using the tracing framework

use owo_colors::OwoColorize;
use std::fmt::Display;

/// Log an informational message (wrapper around tracing::info)
pub fn log_info<T: Display>(msg: T) {
    tracing::info!("{}", msg);
}

/// Log a warning message (wrapper around tracing::warn)
pub fn log_warn<T: Display>(msg: T) {
    tracing::warn!("{}", msg);
}

/// Log an error message (wrapper around tracing::error)
pub fn log_error<T: Display>(msg: T) {
    tracing::error!("{}", msg);
}

/// Log a debug message (wrapper around tracing::debug)
pub fn log_debug<T: Display>(msg: T) {
    tracing::debug!("{}", msg);
}

/// Highlight a value inside a log line
pub fn info<T: Display>(value: T) -> String {
    value.to_string().green().to_string()
}

/// Render a "question: answer" pair the way prompts echo defaulted choices
pub fn question_answer<Q: Display, A: Display>(question: Q, answer: A) -> String {
    format!("{} {}: {}", "?".green(), question.bold(), answer.cyan())
}

/// Render a boolean as yes/no
pub fn yes_no(value: bool) -> &'static str {
    if value { "Yes" } else { "No" }
}

/// Macro for convenient info logging
#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        $crate::utils::logger::log_info(format!($($arg)*))
    };
}

/// Macro for convenient warning logging
#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        $crate::utils::logger::log_warn(format!($($arg)*))
    };
}

/// Macro for convenient error logging
#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        $crate::utils::logger::log_error(format!($($arg)*))
    };
}

/// Macro for convenient debug logging
#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        $crate::utils::logger::log_debug(format!($($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_functions() {
        // These should not panic
        log_info("Test info message");
        log_warn("Test warning message");
        log_error("Test error message");
        log_debug("Test debug message");
    }

    #[test]
    fn test_info_keeps_value() {
        assert!(info("istio-system").contains("istio-system"));
    }

    #[test]
    fn test_question_answer() {
        let line = question_answer("Defaulting to machine type", "n1-standard-2");
        assert!(line.contains("Defaulting to machine type"));
        assert!(line.contains("n1-standard-2"));
    }

    #[test]
    fn test_yes_no() {
        assert_eq!(yes_no(true), "Yes");
        assert_eq!(yes_no(false), "No");
    }
}
