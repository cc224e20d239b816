// Desktop notifications after bulk commands. macOS only (via `osascript`);
// other platforms do nothing. Failures are logged and otherwise ignored.

use std::process::Command;

/// Post a notification. Never fails the calling command.
pub fn send(title: &str, message: &str) {
    if !cfg!(target_os = "macos") {
        return;
    }

    let script = format!(
        "display notification {} with title {} sound name \"Glass\"",
        applescript_string(message),
        applescript_string(title)
    );
    match Command::new("osascript").args(["-e", &script]).status() {
        Ok(status) if status.success() => {}
        Ok(status) => tracing::debug!(%status, "osascript exited unsuccessfully"),
        Err(e) => tracing::debug!(error = %e, "could not run osascript"),
    }
}

/// Quote `value` as an AppleScript string literal.
fn applescript_string(value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{escaped}\"")
}
