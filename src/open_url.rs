//! Opens the Spotify authorization page in the user's browser.

#[cfg(target_os = "linux")]
use std::process::Command;

#[cfg(target_os = "linux")]
const SYSTEM_PATHS: &[&str] = &["/usr/bin", "/usr/local/bin", "/bin"];

/// Paths inside an AppImage mount point are not the user's real tools
#[cfg(target_os = "linux")]
fn is_system_path(path: &str) -> bool {
    let is_system =
        path.starts_with("/usr/") || path.starts_with("/bin/") || path.starts_with("/sbin/");
    let is_bundled = std::env::var("APPDIR").is_ok_and(|dir| !dir.is_empty() && path.starts_with(&dir));
    is_system && !is_bundled
}

#[cfg(target_os = "linux")]
fn find_xdg_open() -> Option<String> {
    if let Ok(browser) = std::env::var("BROWSER") {
        if !browser.is_empty() && is_system_path(&browser) {
            return Some(browser);
        }
    }

    SYSTEM_PATHS
        .iter()
        .map(|dir| format!("{dir}/xdg-open"))
        .find(|path| std::path::Path::new(path).exists())
}

#[cfg(target_os = "linux")]
pub fn open(url: &str) -> Result<(), String> {
    if let Some(xdg_open) = find_xdg_open() {
        let spawned = Command::new(&xdg_open)
            .arg(url)
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .spawn();

        match spawned {
            Ok(mut child) => {
                // reap it so it does not linger as a zombie
                std::thread::spawn(move || {
                    let _ = child.wait();
                });
                return Ok(());
            }
            Err(e) => tracing::debug!("{} failed to start: {}", xdg_open, e),
        }
    }

    open::that(url).map_err(|e| format!("Failed to open URL: {e}"))
}

#[cfg(not(target_os = "linux"))]
pub fn open(url: &str) -> Result<(), String> {
    open::that(url).map_err(|e| format!("Failed to open URL: {e}"))
}
