//! Locating and opening the Discord client's IPC endpoint

use std::io;
use std::path::PathBuf;

use tokio::io::{AsyncRead, AsyncWrite};

/// Anything the IPC codec can talk over
pub trait IpcStream: AsyncRead + AsyncWrite + Unpin + Send + Sync {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send + Sync> IpcStream for T {}

pub fn endpoint_name(slot: u8) -> String {
    format!("discord-ipc-{slot}")
}

/// Directories Discord may place its socket in, in lookup order.
#[cfg(unix)]
pub fn default_search_dirs() -> Vec<PathBuf> {
    let mut candidates: Vec<PathBuf> = ["XDG_RUNTIME_DIR", "TMPDIR", "TMP", "TEMP"]
        .iter()
        .filter_map(|var| std::env::var_os(var))
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
        .collect();

    if let Some(runtime) = dirs::runtime_dir() {
        if !candidates.contains(&runtime) {
            candidates.push(runtime);
        }
    }
    candidates.push(PathBuf::from("/tmp"));
    candidates
}

#[cfg(not(unix))]
pub fn default_search_dirs() -> Vec<PathBuf> {
    Vec::new()
}

/// Every slot the desktop client may listen on
#[cfg(unix)]
const ENDPOINT_SLOTS: std::ops::RangeInclusive<u8> = 0..=9;

#[cfg(unix)]
const SANDBOX_SUBDIRS: &[&str] = &[
    "",
    "app/com.discordapp.Discord",
    "app/com.discordapp.DiscordCanary",
    "snap.discord",
];

#[cfg(unix)]
fn find_exact(search_dirs: &[PathBuf], slot: u8) -> Option<PathBuf> {
    let name = endpoint_name(slot);
    let name = name.as_str();
    search_dirs
        .iter()
        .flat_map(|dir| SANDBOX_SUBDIRS.iter().map(move |sub| dir.join(sub).join(name)))
        .find(|path| path.exists())
}

/// Finds the socket for `slot`, including Flatpak and Snap installs.
///
/// Discord takes the first free slot, so when `slot` has no socket the lowest
/// slot that does is used instead. Returns the slot actually found.
#[cfg(unix)]
pub fn locate(search_dirs: &[PathBuf], slot: u8) -> Option<(u8, PathBuf)> {
    if let Some(path) = find_exact(search_dirs, slot) {
        return Some((slot, path));
    }

    let (found, path) = ENDPOINT_SLOTS
        .filter(|other| *other != slot)
        .find_map(|other| find_exact(search_dirs, other).map(|path| (other, path)))?;
    tracing::debug!("No Discord socket on pipe {}, using pipe {} instead", slot, found);
    Some((found, path))
}

#[cfg(windows)]
pub fn locate(_search_dirs: &[PathBuf], slot: u8) -> Option<(u8, PathBuf)> {
    Some((slot, PathBuf::from(format!(r"\\.\pipe\{}", endpoint_name(slot)))))
}

#[cfg(unix)]
pub async fn open(path: &std::path::Path) -> io::Result<Box<dyn IpcStream>> {
    let stream = tokio::net::UnixStream::connect(path).await?;
    Ok(Box::new(stream))
}

#[cfg(windows)]
pub async fn open(path: &std::path::Path) -> io::Result<Box<dyn IpcStream>> {
    use tokio::net::windows::named_pipe::ClientOptions;

    // ERROR_PIPE_BUSY: every instance is taken, worth retrying later
    const ERROR_PIPE_BUSY: i32 = 231;

    match ClientOptions::new().open(path) {
        Ok(pipe) => Ok(Box::new(pipe)),
        Err(e) if e.raw_os_error() == Some(ERROR_PIPE_BUSY) => {
            Err(io::Error::new(io::ErrorKind::TimedOut, e))
        }
        Err(e) => Err(e),
    }
}
