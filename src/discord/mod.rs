//! Discord Rich Presence over the desktop client's local IPC socket

mod client;
mod endpoint;
mod ipc;

pub use client::{DiscordIpcClient, DiscordIpcFactory};
