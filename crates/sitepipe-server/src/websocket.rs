//! WebSocket-based live reload.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Messages sent to connected browsers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReloadMessage {
    /// Full page reload
    Reload,

    /// Connection established
    Connected,
}

/// Hub for broadcasting reload messages to all connected clients.
#[derive(Debug, Clone)]
pub struct ReloadHub {
    sender: broadcast::Sender<ReloadMessage>,
}

impl ReloadHub {
    /// Create a new reload hub.
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(100);
        Self { sender }
    }

    /// Send a message to all connected clients.
    ///
    /// Returns the number of clients that will receive it.
    pub fn send(&self, msg: ReloadMessage) -> usize {
        // No receivers is not an error: nobody has the page open yet.
        self.sender.send(msg).unwrap_or(0)
    }

    /// Instruct every connected client to reload.
    pub fn reload(&self) -> usize {
        let clients = self.send(ReloadMessage::Reload);
        tracing::info!("Reloading {} connected browser(s)", clients);
        clients
    }

    /// Subscribe to reload messages.
    pub fn subscribe(&self) -> broadcast::Receiver<ReloadMessage> {
        self.sender.subscribe()
    }

    /// Get the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for ReloadHub {
    fn default() -> Self {
        Self::new()
    }
}

/// Path of the reload WebSocket endpoint.
pub const RELOAD_SOCKET_PATH: &str = "/__reload";

/// Path the client script is served from.
pub const RELOAD_SCRIPT_PATH: &str = "/__reload.js";

/// Generate the client-side reload script.
///
/// The script connects back to the host that served the page, so it works
/// on whichever port the server ended up on.
pub fn reload_client_script() -> String {
    format!(
        r#"
(function() {{
  'use strict';

  const protocol = location.protocol === 'https:' ? 'wss:' : 'ws:';
  const ws = new WebSocket(protocol + '//' + location.host + '{}');

  ws.onmessage = function(event) {{
    const msg = JSON.parse(event.data);

    switch (msg.type) {{
      case 'reload':
        location.reload();
        break;

      case 'connected':
        console.log('[sitepipe] Live reload connected');
        break;
    }}
  }};

  ws.onclose = function() {{
    console.log('[sitepipe] Live reload disconnected, retrying...');
    setTimeout(function() {{
      location.reload();
    }}, 1000);
  }};
}})();
"#,
        RELOAD_SOCKET_PATH
    )
}

/// Insert the reload script tag into an HTML document.
///
/// The tag goes before the last `</body>`; documents without one get it
/// appended.
pub fn inject_client_script(html: &str) -> String {
    let tag = format!(r#"<script src="{}"></script>"#, RELOAD_SCRIPT_PATH);

    match html.rfind("</body>") {
        Some(index) => {
            let mut out = String::with_capacity(html.len() + tag.len());
            out.push_str(&html[..index]);
            out.push_str(&tag);
            out.push_str(&html[index..]);
            out
        }
        None => format!("{}{}", html, tag),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hub_broadcasts_messages() {
        let hub = ReloadHub::new();
        let mut rx = hub.subscribe();

        assert_eq!(hub.reload(), 1);

        match rx.try_recv() {
            Ok(ReloadMessage::Reload) => {}
            _ => panic!("Expected Reload message"),
        }
    }

    #[test]
    fn every_subscriber_receives_the_reload() {
        let hub = ReloadHub::new();
        let mut first = hub.subscribe();
        let mut second = hub.subscribe();

        assert_eq!(hub.reload(), 2);

        tokio_test::block_on(async {
            assert!(matches!(first.recv().await, Ok(ReloadMessage::Reload)));
            assert!(matches!(second.recv().await, Ok(ReloadMessage::Reload)));
        });
    }

    #[test]
    fn sending_without_clients_is_harmless() {
        let hub = ReloadHub::new();

        assert_eq!(hub.send(ReloadMessage::Reload), 0);
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[test]
    fn serializes_messages() {
        let json = serde_json::to_string(&ReloadMessage::Reload).unwrap();

        assert_eq!(json, r#"{"type":"reload"}"#);
    }

    #[test]
    fn injects_script_before_closing_body() {
        let html = inject_client_script("<html><body><p>Hi</p></body></html>");

        assert_eq!(
            html,
            r#"<html><body><p>Hi</p><script src="/__reload.js"></script></body></html>"#
        );
    }

    #[test]
    fn appends_script_to_fragments() {
        let html = inject_client_script("<p>Hi</p>");

        assert!(html.ends_with(r#"<script src="/__reload.js"></script>"#));
    }

    #[test]
    fn client_script_uses_socket_path() {
        assert!(reload_client_script().contains("'/__reload'"));
    }
}
