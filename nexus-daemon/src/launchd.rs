//! LaunchAgent management: run the daemon under launchd on macOS.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::{io_err, DaemonError};
use crate::paths::{self, DAEMON_LABEL};

/// Install location assumed when the running binary cannot be resolved.
const FALLBACK_BINARY: &str = "/usr/local/bin/nexus";

/// Render the LaunchAgent plist for the daemon.
///
/// launchd starts `<binary> daemon start` at login and restarts it whenever it
/// exits; stdout and stderr land in `~/.nexus/logs/`.
pub fn generate_plist(binary: &Path, home: &Path) -> String {
    let logs = paths::logs_dir(home);
    let program_arguments = [binary.display().to_string(), "daemon".into(), "start".into()]
        .iter()
        .map(|arg| format!("    <string>{arg}</string>"))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<dict>
  <key>Label</key>
  <string>{DAEMON_LABEL}</string>
  <key>ProgramArguments</key>
  <array>
{program_arguments}
  </array>
  <key>RunAtLoad</key>
  <true/>
  <key>KeepAlive</key>
  <true/>
  <key>ProcessType</key>
  <string>Background</string>
  <key>WorkingDirectory</key>
  <string>{home}</string>
  <key>StandardOutPath</key>
  <string>{stdout}</string>
  <key>StandardErrorPath</key>
  <string>{stderr}</string>
</dict>
</plist>
"#,
        home = home.display(),
        stdout = logs.join(paths::DAEMON_STDOUT_LOG).display(),
        stderr = logs.join(paths::DAEMON_STDERR_LOG).display(),
    )
}

/// Write the plist and (re)bootstrap the service in the user's gui domain.
///
/// Returns the path of the installed plist.
pub fn install(home: &Path) -> Result<PathBuf, DaemonError> {
    require_macos()?;

    for dir in [paths::launch_agents_dir(home), paths::logs_dir(home)] {
        fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;
    }

    let binary = env::current_exe().unwrap_or_else(|_| PathBuf::from(FALLBACK_BINARY));
    let plist = paths::launchd_plist_path(home);
    fs::write(&plist, generate_plist(&binary, home)).map_err(|e| io_err(&plist, e))?;

    let domain = gui_domain()?;
    let service = format!("{domain}/{DAEMON_LABEL}");

    // A stale registration makes bootstrap fail with EEXIST.
    let _ = launchctl(&["bootout", &service]);
    launchctl(&["bootstrap", &domain, &plist.display().to_string()])?;
    launchctl(&["kickstart", "-k", &service])?;

    Ok(plist)
}

/// Boot the service out of launchd and remove the plist and socket.
pub fn uninstall(home: &Path) -> Result<(), DaemonError> {
    require_macos()?;

    let plist = paths::launchd_plist_path(home);
    if plist.exists() {
        let service = format!("{}/{DAEMON_LABEL}", gui_domain()?);
        let _ = launchctl(&["bootout", &service]);
        fs::remove_file(&plist).map_err(|e| io_err(&plist, e))?;
    }

    // A daemon killed by bootout leaves its socket behind.
    let _ = fs::remove_file(paths::socket_path(home));

    Ok(())
}

#[cfg(target_os = "macos")]
fn require_macos() -> Result<(), DaemonError> {
    Ok(())
}

#[cfg(not(target_os = "macos"))]
fn require_macos() -> Result<(), DaemonError> {
    Err(DaemonError::Launchd(
        "LaunchAgent management requires macOS".to_string(),
    ))
}

fn launchctl(args: &[&str]) -> Result<(), DaemonError> {
    let output = Command::new("launchctl")
        .args(args)
        .output()
        .map_err(|e| io_err("launchctl", e))?;
    if output.status.success() {
        return Ok(());
    }
    Err(DaemonError::Launchd(format!(
        "launchctl {} exited with {}: {}",
        args.join(" "),
        output.status,
        String::from_utf8_lossy(&output.stderr).trim(),
    )))
}

/// The per-user launchd domain, `gui/<uid>`.
fn gui_domain() -> Result<String, DaemonError> {
    let output = Command::new("id")
        .arg("-u")
        .output()
        .map_err(|e| io_err("id -u", e))?;
    let uid = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if output.status.success() && !uid.is_empty() {
        Ok(format!("gui/{uid}"))
    } else {
        Err(DaemonError::Launchd(
            "could not resolve the current uid for the gui domain".to_string(),
        ))
    }
}
