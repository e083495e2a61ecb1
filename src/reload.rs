//! Live reload over WebSocket.
//!
//! Development builds embed a small client snippet into every generated
//! page; the watcher broadcasts a reload message after each successful
//! rebuild and the browser re-fetches the page. This is a page-level reload
//! signal - module-level hot swapping is the bundler's own territory and is
//! not replicated here.

use crate::{config::AppConfig, log};
use anyhow::{Context, Result};
use std::{
    net::{TcpListener, TcpStream},
    sync::{Arc, Mutex},
    thread,
};
use tungstenite::{Message, WebSocket};

/// Browser-side reload client (embedded at compile time)
const CLIENT_TEMPLATE: &str = include_str!("embed/reload.js");

/// The WebSocket endpoint listens one port above the HTTP server.
pub fn reload_port(config: &AppConfig) -> u16 {
    config.serve.port.saturating_add(1)
}

/// Script tag with the reload client, pointed at the configured endpoint.
pub fn client_script(config: &AppConfig) -> String {
    let snippet = CLIENT_TEMPLATE.replace("{port}", &reload_port(config).to_string());
    format!("<script>{snippet}</script>")
}

/// Handle for broadcasting reload messages to connected browsers.
#[derive(Clone)]
pub struct ReloadHandle {
    clients: Arc<Mutex<Vec<WebSocket<TcpStream>>>>,
}

impl ReloadHandle {
    /// Send a reload message to every connected client, dropping the ones
    /// that have gone away.
    pub fn broadcast(&self) {
        if let Ok(mut clients) = self.clients.lock() {
            let before = clients.len();
            clients.retain_mut(|ws| ws.send(Message::text("reload")).is_ok());
            if before > 0 {
                log!("reload"; "notified {} client(s)", clients.len());
            }
        }
    }
}

/// Start the WebSocket accept loop on a background thread.
pub fn spawn(config: &AppConfig) -> Result<ReloadHandle> {
    let addr = format!("{}:{}", config.serve.interface, reload_port(config));
    let listener = TcpListener::bind(&addr)
        .with_context(|| format!("Failed to bind reload endpoint on {addr}"))?;

    let clients: Arc<Mutex<Vec<WebSocket<TcpStream>>>> = Arc::new(Mutex::new(Vec::new()));
    let handle = ReloadHandle { clients: Arc::clone(&clients) };

    thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(stream) = stream else { continue };
            match tungstenite::accept(stream) {
                Ok(ws) => {
                    if let Ok(mut clients) = clients.lock() {
                        clients.push(ws);
                    }
                }
                Err(e) => log!("reload"; "handshake failed: {e}"),
            }
        }
    });

    Ok(handle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_script_points_at_reload_port() {
        let mut config = AppConfig::default();
        config.serve.port = 2019;

        let script = client_script(&config);
        assert!(script.starts_with("<script>"));
        assert!(script.ends_with("</script>"));
        assert!(script.contains("WebSocket"));
        assert!(script.contains(":2020"));
        assert!(!script.contains("{port}"));
    }

    #[test]
    fn test_reload_port_saturates() {
        let mut config = AppConfig::default();
        config.serve.port = u16::MAX;
        assert_eq!(reload_port(&config), u16::MAX);
    }

    #[test]
    fn test_broadcast_without_clients() {
        let handle = ReloadHandle { clients: Arc::new(Mutex::new(Vec::new())) };
        handle.broadcast();
    }
}
