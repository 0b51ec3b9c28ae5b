use std::process::Command;

const GUIDE: &str = include_str!("preamble.txt");

/// The fixed behavioural guide, ending with the shell environment line.
pub fn system_preamble(shell_environment: &str) -> String {
    format!("{GUIDE}{shell_environment}")
}

/// Kernel name and release in `uname` terms, e.g. `Linux 6.8.0-45-generic`.
pub fn detect_shell_environment() -> String {
    let name = uname("-s").unwrap_or_else(|| fallback_os_name().to_string());
    match uname("-r") {
        Some(release) => format!("{name} {release}"),
        None => name,
    }
}

fn uname(flag: &str) -> Option<String> {
    let output = Command::new("uname").arg(flag).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let value = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!value.is_empty()).then_some(value)
}

fn fallback_os_name() -> &'static str {
    match std::env::consts::OS {
        "linux" => "Linux",
        "macos" => "Darwin",
        "windows" => "Windows",
        "freebsd" => "FreeBSD",
        other => other,
    }
}
