//! Channel requests on an operator session

use tether_protocol::names::{REQUEST_EXEC, REQUEST_PTY, REQUEST_SHELL, REQUEST_WINDOW_CHANGE};
use tether_protocol::{ExecRequest, PtyRequest, WindowChange};

/// A channel request on an operator session, in arrival order
#[derive(Debug, Clone, PartialEq)]
pub enum SessionRequest {
    Pty(PtyRequest),
    WindowChange(WindowChange),
    Shell,
    Exec(ExecRequest),
}

impl SessionRequest {
    /// Request type name as it appears on the wire
    pub fn name(&self) -> &'static str {
        match self {
            SessionRequest::Pty(_) => REQUEST_PTY,
            SessionRequest::WindowChange(_) => REQUEST_WINDOW_CHANGE,
            SessionRequest::Shell => REQUEST_SHELL,
            SessionRequest::Exec(_) => REQUEST_EXEC,
        }
    }
}

/// What a session turned into
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionMode {
    Shell,
    Exec(String),
}

/// Collects requests until the session is started by `shell` or `exec`.
///
/// Terminal requests seen before that point are held back and handed out by
/// [`SessionSetup::into_replay`], so they take effect before anything that
/// arrives afterwards.
#[derive(Debug, Default)]
pub struct SessionSetup {
    buffered: Vec<SessionRequest>,
}

impl SessionSetup {
    /// Feed the next request. Returns the mode once the session starts.
    pub fn push(&mut self, request: SessionRequest) -> Option<SessionMode> {
        match request {
            SessionRequest::Shell => Some(SessionMode::Shell),
            SessionRequest::Exec(exec) => Some(SessionMode::Exec(exec.command_line)),
            other => {
                tracing::trace!("Buffering {} until the session starts", other.name());
                self.buffered.push(other);
                None
            }
        }
    }

    /// Requests held back, oldest first
    pub fn into_replay(self) -> Vec<SessionRequest> {
        self.buffered
    }
}

/// Fold a terminal request into the current terminal parameters
pub fn apply(terminal: &mut Option<PtyRequest>, request: SessionRequest) {
    let name = request.name();
    match request {
        SessionRequest::Pty(pty) => *terminal = Some(pty),
        SessionRequest::WindowChange(change) => match terminal {
            Some(pty) => pty.resize(change),
            None => tracing::debug!("Ignoring {} without a terminal", name),
        },
        SessionRequest::Shell | SessionRequest::Exec(_) => {
            tracing::debug!("Ignoring {} on a started session", name)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pty(term: &str) -> SessionRequest {
        SessionRequest::Pty(PtyRequest::new(term, 80, 24, 0, 0, &[]))
    }

    #[test]
    fn test_buffers_until_shell() {
        let mut setup = SessionSetup::default();
        assert_eq!(setup.push(pty("vt100")), None);
        assert_eq!(setup.push(pty("xterm")), None);
        assert_eq!(setup.push(SessionRequest::Shell), Some(SessionMode::Shell));

        assert_eq!(setup.into_replay(), vec![pty("vt100"), pty("xterm")]);
    }

    #[test]
    fn test_exec_carries_command_line() {
        let mut setup = SessionSetup::default();
        let exec = SessionRequest::Exec(ExecRequest::from_bytes(b"devices").unwrap());
        assert_eq!(
            setup.push(exec),
            Some(SessionMode::Exec("devices".to_string()))
        );
        assert!(setup.into_replay().is_empty());
    }

    #[test]
    fn test_replay_then_live_requests_in_order() {
        let mut setup = SessionSetup::default();
        setup.push(pty("vt100"));
        setup.push(SessionRequest::WindowChange(WindowChange {
            char_width: 100,
            char_height: 50,
            px_width: 0,
            px_height: 0,
        }));
        setup.push(SessionRequest::Shell);

        let mut terminal = None;
        for request in setup.into_replay() {
            apply(&mut terminal, request);
        }
        apply(&mut terminal, pty("xterm"));

        let terminal = terminal.unwrap();
        assert_eq!(terminal.term_env, "xterm");
        assert_eq!(terminal.char_width, 80);
    }

    #[test]
    fn test_window_change_resizes() {
        let mut terminal = None;
        apply(&mut terminal, pty("vt100"));
        apply(
            &mut terminal,
            SessionRequest::WindowChange(WindowChange {
                char_width: 132,
                char_height: 43,
                px_width: 0,
                px_height: 0,
            }),
        );
        let terminal = terminal.unwrap();
        assert_eq!((terminal.char_width, terminal.char_height), (132, 43));
        assert_eq!(terminal.term_env, "vt100");
    }
}
