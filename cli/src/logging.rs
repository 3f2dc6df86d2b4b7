use std::sync::OnceLock;

use blocks::LogLevel;
use owo_colors::OwoColorize;
use supports_color::Stream;
use tracing_subscriber::EnvFilter;

static ANSI_ENABLED: OnceLock<bool> = OnceLock::new();

/// Install the global subscriber. `RUST_LOG` wins over `verbose`.
pub fn init(verbose: bool, no_color: bool) -> Result<(), Box<dyn std::error::Error>> {
    let ansi = !no_color && detect_ansi();
    let _ = ANSI_ENABLED.set(ansi);

    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(ansi)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .try_init()
        .map_err(|err| std::io::Error::other(err.to_string()))?;
    Ok(())
}

pub fn ansi_enabled() -> bool {
    *ANSI_ENABLED.get_or_init(detect_ansi)
}

/// Fixed-width label for a runtime log line.
pub fn level_label(level: LogLevel) -> String {
    let text = format!("{:<10}", level.as_str().to_uppercase());
    if !ansi_enabled() {
        return text;
    }

    match level {
        LogLevel::Info => format!("{}", text.bright_blue()),
        LogLevel::Warning => format!("{}", text.bright_yellow().bold()),
        LogLevel::Error => format!("{}", text.bright_red().bold()),
        LogLevel::Execution => format!("{}", text.bright_magenta()),
        LogLevel::Success => format!("{}", text.bright_green().bold()),
        LogLevel::Connection => format!("{}", text.bright_cyan()),
    }
}

pub fn pass_label() -> String {
    if ansi_enabled() {
        format!("{}", "PASS".green())
    } else {
        "PASS".to_string()
    }
}

pub fn fail_label() -> String {
    if ansi_enabled() {
        format!("{}", "FAIL".red())
    } else {
        "FAIL".to_string()
    }
}

pub fn bold(s: &str) -> String {
    if ansi_enabled() {
        format!("{}", s.bold())
    } else {
        s.to_string()
    }
}

pub fn verdict(ok: bool) -> String {
    match (ok, ansi_enabled()) {
        (true, true) => format!("{}", "ok".green()),
        (true, false) => "ok".to_string(),
        (false, true) => format!("{}", "FAILED".red()),
        (false, false) => "FAILED".to_string(),
    }
}

fn detect_ansi() -> bool {
    if std::env::var_os("NO_COLOR").is_some() {
        return false;
    }
    if std::env::var_os("FORCE_COLOR").is_some() {
        return true;
    }
    supports_color::on_cached(Stream::Stderr).is_some()
}
