use crate::app::models::DeviceSummary;

pub fn parse_adb_devices(output: &str) -> Vec<DeviceSummary> {
    output
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter(|line| !line.trim_start().starts_with('*'))
        .filter(|line| !line.to_lowercase().contains("list of devices"))
        .filter_map(|line| {
            let tokens: Vec<&str> = line.split_whitespace().collect();
            if tokens.len() < 2 {
                return None;
            }
            let serial = tokens[0].to_string();
            let state = tokens[1].to_string();
            let mut model = None;
            let mut product = None;
            let mut device = None;
            let mut transport_id = None;
            for token in tokens.iter().skip(2) {
                if let Some(value) = token.strip_prefix("model:") {
                    model = Some(value.to_string());
                } else if let Some(value) = token.strip_prefix("product:") {
                    product = Some(value.to_string());
                } else if let Some(value) = token.strip_prefix("device:") {
                    device = Some(value.to_string());
                } else if let Some(value) = token.strip_prefix("transport_id:") {
                    transport_id = Some(value.to_string());
                }
            }
            Some(DeviceSummary {
                serial,
                state,
                model,
                product,
                device,
                transport_id,
            })
        })
        .collect()
}

/// First pid from `pidof <package>`; `pidof` prints nothing when the process is gone.
pub fn parse_pidof(output: &str) -> Option<u32> {
    output
        .split_whitespace()
        .next()
        .and_then(|token| token.parse::<u32>().ok())
        .filter(|pid| *pid > 0)
}

/// `adb connect` exits 0 even when it could not connect, so the text decides.
pub fn is_connect_success(output: &str) -> bool {
    let lowered = output.to_lowercase();
    (lowered.contains("connected to") || lowered.contains("already connected"))
        && !lowered.contains("failed")
        && !lowered.contains("unable")
}

/// Error text printed by `am profile`, if any.
pub fn parse_am_profile_error(output: &str) -> Option<String> {
    output
        .lines()
        .map(str::trim)
        .find(|line| {
            line.starts_with("Error")
                || line.contains("Exception")
                || line.contains("Unknown process")
                || line.contains("Process not found")
        })
        .map(str::to_string)
}
