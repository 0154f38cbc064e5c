//! Channel types and request names used on the wire

/// Interactive or exec session channel (operator only)
pub const CHANNEL_SESSION: &str = "session";

/// Direct-connect channel opened by a peer toward a named destination
pub const CHANNEL_DIRECT_TCPIP: &str = "direct-tcpip";

/// Channel opened by the broker to reach back into a device
pub const CHANNEL_FORWARDED_TCPIP: &str = "forwarded-tcpip";

/// Global request registering a forwarded address
pub const REQUEST_TCPIP_FORWARD: &str = "tcpip-forward";

/// Global request cancelling a forwarded address
pub const REQUEST_CANCEL_TCPIP_FORWARD: &str = "cancel-tcpip-forward";

/// Channel request carrying terminal parameters
pub const REQUEST_PTY: &str = "pty-req";

/// Channel request resizing an allocated terminal
pub const REQUEST_WINDOW_CHANGE: &str = "window-change";

/// Channel request starting an interactive shell
pub const REQUEST_SHELL: &str = "shell";

/// Channel request running a single command line
pub const REQUEST_EXEC: &str = "exec";

/// Outbound notification carrying a command's exit code
pub const REQUEST_EXIT_STATUS: &str = "exit-status";
