//! Finding a debuggable browser, or starting one.

use chatmux_core::config::BrowserConfig;
use chatmux_core::{Error, Result};
use serde_json::Value;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info};

fn version_url(config: &BrowserConfig) -> String {
    format!("http://{}:{}/json/version", config.host, config.port)
}

/// One `/json/version` probe. `None` when nothing answers or the reply has no
/// debugger URL.
async fn probe(client: &reqwest::Client, url: &str) -> Option<String> {
    let resp = client.get(url).send().await.ok()?;
    let body: Value = resp.json().await.ok()?;
    body.get("webSocketDebuggerUrl")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
}

/// Poll the discovery endpoint up to `discovery_attempts` times.
pub async fn discover(config: &BrowserConfig) -> Option<String> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(2))
        .build()
        .ok()?;
    let url = version_url(config);
    let attempts = config.discovery_attempts.max(1);
    for attempt in 1..=attempts {
        if let Some(ws_url) = probe(&client, &url).await {
            debug!(attempt, ws_url = %ws_url, "Browser debugger discovered");
            return Some(ws_url);
        }
        if attempt < attempts {
            tokio::time::sleep(Duration::from_millis(config.discovery_interval_ms)).await;
        }
    }
    None
}

/// Attach to a running browser, launching one when allowed.
///
/// With launching enabled a single quick probe runs first so an
/// already-running instance is never launched twice. Otherwise the full
/// discovery budget is spent waiting for a browser that may still be starting.
pub async fn ensure_browser(config: &BrowserConfig, profile_dir: &Path) -> Result<String> {
    if !config.launch {
        return discover(config).await.ok_or_else(|| {
            Error::Connection(format!(
                "no debuggable browser at {}:{} after {} polls and launching is disabled",
                config.host,
                config.port,
                config.discovery_attempts.max(1)
            ))
        });
    }

    let quick = BrowserConfig {
        discovery_attempts: 1,
        ..config.clone()
    };
    if let Some(ws_url) = discover(&quick).await {
        return Ok(ws_url);
    }

    let binary = match &config.binary {
        Some(b) => b.clone(),
        None => find_browser_binary().ok_or_else(|| {
            Error::Connection("no Chromium-based browser found; set browser.binary".into())
        })?,
    };
    launch(&binary, config.port, profile_dir)?;

    discover(config).await.ok_or_else(|| {
        Error::Connection(format!(
            "browser launched but debugger did not answer on port {} after {} polls",
            config.port, config.discovery_attempts
        ))
    })
}

fn browser_args(port: u16, user_data_dir: &Path) -> Vec<String> {
    vec![
        format!("--remote-debugging-port={}", port),
        format!("--user-data-dir={}", user_data_dir.display()),
        "--no-first-run".to_string(),
        "--no-default-browser-check".to_string(),
        "--disable-features=Translate".to_string(),
        "about:blank".to_string(),
    ]
}

/// Start the browser detached; it outlives this process.
fn launch(binary: &str, port: u16, user_data_dir: &Path) -> Result<()> {
    std::fs::create_dir_all(user_data_dir)?;
    info!(binary, port, profile = %user_data_dir.display(), "Launching browser");
    Command::new(binary)
        .args(browser_args(port, user_data_dir))
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(false)
        .spawn()
        .map_err(|e| Error::Connection(format!("failed to launch {}: {}", binary, e)))?;
    Ok(())
}

/// First Chromium-family binary present on this machine.
pub fn find_browser_binary() -> Option<String> {
    let candidates: &[&str] = if cfg!(target_os = "macos") {
        &[
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
            "/Applications/Brave Browser.app/Contents/MacOS/Brave Browser",
            "/Applications/Microsoft Edge.app/Contents/MacOS/Microsoft Edge",
        ]
    } else if cfg!(target_os = "windows") {
        &[
            r"C:\Program Files\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Microsoft\Edge\Application\msedge.exe",
        ]
    } else {
        &[
            "google-chrome",
            "google-chrome-stable",
            "chromium",
            "chromium-browser",
            "brave-browser",
            "microsoft-edge",
        ]
    };

    for candidate in candidates {
        if Path::new(candidate).exists() {
            return Some(candidate.to_string());
        }
        if !candidate.contains('/') && !candidate.contains('\\') {
            if let Ok(path) = which::which(candidate) {
                return Some(path.display().to_string());
            }
        }
    }
    None
}
