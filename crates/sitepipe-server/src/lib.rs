//! Preview server and change watcher for sitepipe.
//!
//! Serves the built site with live reload over WebSocket, and runs task
//! compositions when source files change.

pub mod server;
pub mod watcher;
pub mod websocket;

pub use server::{PreviewConfig, PreviewServer, ServerError};
pub use watcher::{FileWatcher, WatchBinding, WatchError, WatchSession};
pub use websocket::{ReloadHub, ReloadMessage};
