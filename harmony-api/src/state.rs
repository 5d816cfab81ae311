//! Shared request state

use harmony_core::Harmony;
use std::sync::Arc;

/// Cloned into every handler; all fields are shared handles
#[derive(Clone)]
pub struct AppState {
    pub harmony: Arc<Harmony>,
}

impl AppState {
    pub fn new(harmony: Harmony) -> Self {
        Self {
            harmony: Arc::new(harmony),
        }
    }

    /// Base URL for invite links: the configured public URL, else the
    /// request's Host, else the bind address
    pub fn invite_base(&self, host: Option<&str>) -> String {
        let server = &self.harmony.config.server;
        match (&server.public_url, host) {
            (Some(url), _) => url.trim_end_matches('/').to_string(),
            (None, Some(host)) => format!("http://{}", host),
            (None, None) => format!("http://{}", server.bind_address),
        }
    }
}
