//! Pseudo-terminal parameters

use russh::Pty;

/// Terminal parameters carried by a `pty-req` channel request
#[derive(Debug, Clone, PartialEq)]
pub struct PtyRequest {
    /// `TERM` environment value (e.g. `xterm-256color`)
    pub term_env: String,
    /// Width in characters
    pub char_width: u32,
    /// Height in rows
    pub char_height: u32,
    /// Width in pixels
    pub px_width: u32,
    /// Height in pixels
    pub px_height: u32,
    /// Encoded terminal modes, replayed verbatim to the device
    pub term_modes: Vec<(Pty, u32)>,
}

impl PtyRequest {
    /// Build from the fields of a `pty-req` request
    pub fn new(
        term_env: impl Into<String>,
        char_width: u32,
        char_height: u32,
        px_width: u32,
        px_height: u32,
        term_modes: &[(Pty, u32)],
    ) -> Self {
        Self {
            term_env: term_env.into(),
            char_width,
            char_height,
            px_width,
            px_height,
            term_modes: term_modes.to_vec(),
        }
    }

    /// Apply a later `window-change` request
    pub fn resize(&mut self, change: WindowChange) {
        self.char_width = change.char_width;
        self.char_height = change.char_height;
        self.px_width = change.px_width;
        self.px_height = change.px_height;
    }
}

impl Default for PtyRequest {
    fn default() -> Self {
        Self {
            term_env: "vt100".to_string(),
            char_width: 80,
            char_height: 24,
            px_width: 0,
            px_height: 0,
            term_modes: Vec::new(),
        }
    }
}

/// Payload of a `window-change` channel request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowChange {
    pub char_width: u32,
    pub char_height: u32,
    pub px_width: u32,
    pub px_height: u32,
}
