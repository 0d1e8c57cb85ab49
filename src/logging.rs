use flexi_logger::{Logger, LoggerHandle};

use crate::error::AppError;

pub const DEFAULT_LOG_LEVEL: &str = "warn";

/// Starts the stderr logger. The returned handle must stay alive for the whole run.
pub fn init_logging(level: Option<&str>) -> Result<LoggerHandle, AppError> {
    let level = normalize_level(level.unwrap_or(DEFAULT_LOG_LEVEL))?;
    Logger::try_with_str(level)
        .map_err(|err| AppError::Validation(format!("invalid log level `{level}`: {err}")))?
        .log_to_stderr()
        .format(flexi_logger::default_format)
        .start()
        .map_err(|err| AppError::Io(std::io::Error::other(format!("failed to start logger: {err}"))))
}

fn normalize_level(level: &str) -> Result<&'static str, AppError> {
    match level.trim().to_ascii_lowercase().as_str() {
        "trace" => Ok("trace"),
        "debug" => Ok("debug"),
        "info" => Ok("info"),
        "warn" | "warning" => Ok("warn"),
        "error" => Ok("error"),
        "off" => Ok("off"),
        other => Err(AppError::Validation(format!(
            "unsupported log level `{other}`; expected trace|debug|info|warn|error|off"
        ))),
    }
}
