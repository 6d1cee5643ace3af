//! Registration as a per-user OS service.
//!
//! Linux uses a systemd user unit, macOS a launchd agent. Both run the
//! current executable in daemon mode against an explicit config file.

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::info;

pub const SYSTEMD_UNIT: &str = "docsync.service";
pub const LAUNCHD_LABEL: &str = "com.docsync.daemon";

/// systemd user unit running `exe --config <config>`.
pub fn systemd_unit(exe: &Path, config: &Path) -> String {
    format!(
        "[Unit]\n\
         Description=docsync document sync daemon\n\
         After=network-online.target\n\
         \n\
         [Service]\n\
         ExecStart=\"{}\" --config \"{}\"\n\
         Restart=on-failure\n\
         RestartSec=10\n\
         \n\
         [Install]\n\
         WantedBy=default.target\n",
        exe.display(),
        config.display()
    )
}

/// launchd agent plist running `exe --config <config>`.
pub fn launchd_plist(exe: &Path, config: &Path, log_dir: &Path) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<dict>
    <key>Label</key>
    <string>{label}</string>
    <key>ProgramArguments</key>
    <array>
        <string>{exe}</string>
        <string>--config</string>
        <string>{config}</string>
    </array>
    <key>RunAtLoad</key>
    <true/>
    <key>KeepAlive</key>
    <true/>
    <key>StandardOutPath</key>
    <string>{log}/docsync.log</string>
    <key>StandardErrorPath</key>
    <string>{log}/docsync.log</string>
</dict>
</plist>
"#,
        label = LAUNCHD_LABEL,
        exe = xml_escape(&exe.display().to_string()),
        config = xml_escape(&config.display().to_string()),
        log = xml_escape(&log_dir.display().to_string()),
    )
}

fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn run(command: &mut Command) -> Result<String> {
    let output = command
        .output()
        .with_context(|| format!("Failed to run {:?}", command))?;
    if !output.status.success() {
        bail!(
            "{:?} exited with {}: {}",
            command,
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

fn home_dir() -> Result<PathBuf> {
    dirs::home_dir().context("Could not determine home directory")
}

fn write_file(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    std::fs::write(path, contents).with_context(|| format!("Failed to write {}", path.display()))
}

/// Install and start the service. Returns the path of the written unit.
pub fn install(config_path: &Path) -> Result<PathBuf> {
    let exe = std::env::current_exe().context("Could not locate the running executable")?;
    let config_path = std::path::absolute(config_path)
        .with_context(|| format!("Invalid config path {}", config_path.display()))?;

    if cfg!(target_os = "linux") {
        let unit_path = dirs::config_dir()
            .context("Could not determine config directory")?
            .join("systemd")
            .join("user")
            .join(SYSTEMD_UNIT);
        write_file(&unit_path, &systemd_unit(&exe, &config_path))?;
        run(Command::new("systemctl").args(["--user", "daemon-reload"]))?;
        run(Command::new("systemctl").args(["--user", "enable", "--now", SYSTEMD_UNIT]))?;
        info!("Installed {}", unit_path.display());
        Ok(unit_path)
    } else if cfg!(target_os = "macos") {
        let home = home_dir()?;
        let plist_path = home
            .join("Library")
            .join("LaunchAgents")
            .join(format!("{}.plist", LAUNCHD_LABEL));
        let log_dir = home.join("Library").join("Logs");
        write_file(&plist_path, &launchd_plist(&exe, &config_path, &log_dir))?;
        run(Command::new("launchctl").arg("load").arg("-w").arg(&plist_path))?;
        info!("Installed {}", plist_path.display());
        Ok(plist_path)
    } else {
        bail!("Service installation is not supported on this platform")
    }
}

/// Check that the installed service is running.
pub fn verify() -> Result<()> {
    if cfg!(target_os = "linux") {
        let output = Command::new("systemctl")
            .args(["--user", "is-active", SYSTEMD_UNIT])
            .output()
            .context("Failed to run systemctl")?;
        let state = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if state != "active" {
            bail!("Daemon is not running (status: {})", state);
        }
        Ok(())
    } else if cfg!(target_os = "macos") {
        let listing = run(Command::new("launchctl").args(["list", LAUNCHD_LABEL]))
            .context("Daemon is not installed")?;
        if !listing.contains("\"PID\"") {
            bail!("Daemon is installed but not running");
        }
        Ok(())
    } else {
        bail!("Service verification is not supported on this platform")
    }
}
