use env_logger::{Builder, Env, Target, WriteStyle};
use log::{error, info, warn};
use std::fs::OpenOptions;
use std::path::Path;

/// Initialize the logging system, appending to `log_file`.
///
/// The level defaults to `info` and can be overridden with `RUST_LOG`.
pub fn initialize_logging(log_file: &Path) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(parent) = log_file.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file)?;

    Builder::from_env(Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .format_module_path(true)
        .write_style(WriteStyle::Never)
        .target(Target::Pipe(Box::new(file)))
        .try_init()?;

    info!("Logging system initialized");
    Ok(())
}

/// Helper function to format sensitive data for logging
pub fn format_sensitive(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= 4 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..2].iter().collect();
    let tail: String = chars[chars.len() - 2..].iter().collect();
    format!("{}***{}", head, tail)
}

/// Structured logging for authentication events
pub fn log_auth_event(event_type: &str, username: &str, success: bool, details: Option<&str>) {
    if success {
        info!(
            "Auth event: type={}, user={}, success=true, details={:?}",
            event_type,
            format_sensitive(username),
            details
        );
    } else {
        warn!(
            "Auth event: type={}, user={}, success=false, details={:?}",
            event_type,
            format_sensitive(username),
            details
        );
    }
}

/// Structured logging for data operations
pub fn log_data_operation(
    operation: &str,
    user: &str,
    resource: &str,
    success: bool,
    details: Option<&str>,
) {
    if success {
        info!(
            "Data operation: op={}, user={}, resource={}, success=true, details={:?}",
            operation,
            format_sensitive(user),
            resource,
            details
        );
    } else {
        error!(
            "Data operation: op={}, user={}, resource={}, success=false, details={:?}",
            operation,
            format_sensitive(user),
            resource,
            details
        );
    }
}
