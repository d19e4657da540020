//! Hardware-accelerated decode detection.

use std::process::Stdio;
use std::str::FromStr;
use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, warn};

/// Timeout for `ffmpeg -hwaccels`.
const DETECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Hardware acceleration setting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HwAccelMode {
    /// Use a supported method if FFmpeg reports one
    #[default]
    Auto,
    /// Use a supported method; warn if none is available
    On,
    /// Software decoding only
    Off,
}

impl FromStr for HwAccelMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(HwAccelMode::Auto),
            "on" | "true" | "1" => Ok(HwAccelMode::On),
            "off" | "false" | "0" => Ok(HwAccelMode::Off),
            other => Err(format!("unknown hwaccel mode: {}", other)),
        }
    }
}

/// Methods worth using on this platform, in preference order.
fn preferred_methods() -> &'static [&'static str] {
    if cfg!(target_os = "macos") {
        &["videotoolbox"]
    } else if cfg!(target_os = "linux") {
        &["cuda", "vaapi"]
    } else {
        &[]
    }
}

/// Parse `ffmpeg -hwaccels` output into method names.
fn parse_hwaccels(output: &str) -> Vec<String> {
    output
        .lines()
        .skip_while(|line| !line.trim_start().starts_with("Hardware acceleration methods"))
        .skip(1)
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Pick the first preferred method that FFmpeg supports.
fn select_method(available: &[String], preferred: &[&str]) -> Option<String> {
    preferred
        .iter()
        .find(|p| available.iter().any(|a| a == *p))
        .map(|p| p.to_string())
}

/// Query FFmpeg for a usable hardware decode method.
pub async fn detect() -> Option<String> {
    let run = Command::new("ffmpeg")
        .args(["-hide_banner", "-hwaccels"])
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .output();

    let output = match tokio::time::timeout(DETECT_TIMEOUT, run).await {
        Ok(Ok(output)) if output.status.success() => output,
        Ok(Ok(_)) => return None,
        Ok(Err(e)) => {
            debug!("Hardware acceleration probe failed: {}", e);
            return None;
        }
        Err(_) => {
            warn!("Hardware acceleration probe timed out");
            return None;
        }
    };

    let available = parse_hwaccels(&String::from_utf8_lossy(&output.stdout));
    let method = select_method(&available, preferred_methods());
    debug!(available = ?available, selected = ?method, "Detected hardware acceleration");
    method
}

/// Resolve a mode to the `-hwaccel` value to pass, if any.
pub async fn resolve(mode: HwAccelMode) -> Option<String> {
    match mode {
        HwAccelMode::Off => None,
        HwAccelMode::Auto => detect().await,
        HwAccelMode::On => {
            let method = detect().await;
            if method.is_none() {
                warn!("Hardware acceleration requested but no supported method found");
            }
            method
        }
    }
}
