use std::path::{Path, PathBuf};

pub fn normalize_command_path(value: &str) -> String {
    let trimmed = value.trim();
    if let Some(inner) = trimmed
        .strip_prefix('"')
        .and_then(|candidate| candidate.strip_suffix('"'))
    {
        return inner.trim().to_string();
    }
    if let Some(inner) = trimmed
        .strip_prefix('\'')
        .and_then(|candidate| candidate.strip_suffix('\''))
    {
        return inner.trim().to_string();
    }
    trimmed.to_string()
}

fn sdk_adb(android_home: &str) -> PathBuf {
    let name = if cfg!(windows) { "adb.exe" } else { "adb" };
    Path::new(android_home).join("platform-tools").join(name)
}

/// Configured path first, then `$ANDROID_HOME/platform-tools/adb`, then `adb` on PATH.
pub fn resolve_adb_program(config_command_path: &str, android_home: Option<&str>) -> String {
    let normalized = normalize_command_path(config_command_path);
    if !normalized.is_empty() {
        return normalized;
    }
    if let Some(home) = android_home.map(str::trim).filter(|home| !home.is_empty()) {
        let candidate = sdk_adb(home);
        if candidate.is_file() {
            return candidate.to_string_lossy().to_string();
        }
    }
    "adb".to_string()
}

pub fn validate_adb_program(program: &str) -> Result<(), String> {
    if program.trim().is_empty() {
        return Err("ADB command is empty".to_string());
    }
    if program == "adb" {
        return Ok(());
    }
    let path = Path::new(program);
    if path.is_dir() {
        return Err("ADB path must point to an executable file".to_string());
    }
    if !path.exists() {
        return Err("ADB executable not found at the configured path".to_string());
    }
    Ok(())
}
