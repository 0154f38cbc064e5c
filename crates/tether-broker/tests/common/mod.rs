//! A device's own SSH daemon, served in-process over any byte stream

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use russh::server::{Auth, Config, Handler, Msg, Session};
use russh::{Channel, ChannelId, CryptoVec, MethodSet};
use russh_keys::key::KeyPair;
use tokio::io::{AsyncRead, AsyncWrite};

pub const DEVICE_USER: &str = "pi";
pub const DEVICE_PASSWORD: &str = "raspberry";

/// The daemon answers this command with a request failure
pub const REFUSED_COMMAND: &str = "refuse";
/// The daemon closes this command's channel without an exit status
pub const SILENT_COMMAND: &str = "vanish";
/// Exit status of every other command
pub const COMMAND_STATUS: u32 = 5;
/// Exit status of a shell once its input ends
pub const SHELL_STATUS: u32 = 3;

/// What the daemon has seen, across all connections
#[derive(Default)]
pub struct DeviceLog {
    pub logins: AtomicUsize,
    pub commands: Mutex<Vec<String>>,
}

impl DeviceLog {
    pub fn logins(&self) -> usize {
        self.logins.load(Ordering::SeqCst)
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }
}

pub struct DeviceDaemon {
    config: Arc<Config>,
    pub log: Arc<DeviceLog>,
}

impl DeviceDaemon {
    pub fn new() -> Self {
        let mut config = Config::default();
        config.keys.push(KeyPair::generate_ed25519().unwrap());
        config.methods = MethodSet::PASSWORD;
        config.auth_rejection_time = Duration::from_millis(10);
        config.auth_rejection_time_initial = Some(Duration::from_millis(0));

        Self {
            config: Arc::new(config),
            log: Arc::default(),
        }
    }

    /// Serve one client connection over `stream` on a new task
    pub fn serve<S>(&self, stream: S)
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let config = Arc::clone(&self.config);
        let handler = DeviceSession {
            log: Arc::clone(&self.log),
            shells: HashSet::new(),
        };

        tokio::spawn(async move {
            if let Ok(session) = russh::server::run_stream(config, stream, handler).await {
                let _ = session.await;
            }
        });
    }
}

/// Upper-cases shell input; runs commands by reporting them on both streams
struct DeviceSession {
    log: Arc<DeviceLog>,
    shells: HashSet<ChannelId>,
}

#[async_trait]
impl Handler for DeviceSession {
    type Error = russh::Error;

    async fn auth_password(&mut self, user: &str, password: &str) -> Result<Auth, Self::Error> {
        if user == DEVICE_USER && password == DEVICE_PASSWORD {
            self.log.logins.fetch_add(1, Ordering::SeqCst);
            Ok(Auth::Accept)
        } else {
            Ok(Auth::Reject {
                proceed_with_methods: None,
            })
        }
    }

    async fn channel_open_session(
        &mut self,
        _channel: Channel<Msg>,
        _session: &mut Session,
    ) -> Result<bool, Self::Error> {
        Ok(true)
    }

    async fn shell_request(
        &mut self,
        channel: ChannelId,
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        self.shells.insert(channel);
        session.channel_success(channel);
        Ok(())
    }

    async fn exec_request(
        &mut self,
        channel: ChannelId,
        data: &[u8],
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        let command = String::from_utf8_lossy(data).into_owned();
        self.log.commands.lock().unwrap().push(command.clone());

        match command.as_str() {
            REFUSED_COMMAND => session.channel_failure(channel),
            SILENT_COMMAND => {
                session.channel_success(channel);
                session.close(channel);
            }
            _ => {
                session.channel_success(channel);
                session.data(
                    channel,
                    CryptoVec::from_slice(format!("ran:{}\n", command).as_bytes()),
                );
                session.extended_data(
                    channel,
                    1,
                    CryptoVec::from_slice(format!("warn:{}\n", command).as_bytes()),
                );
                session.exit_status_request(channel, COMMAND_STATUS);
                session.eof(channel);
                session.close(channel);
            }
        }
        Ok(())
    }

    async fn data(
        &mut self,
        channel: ChannelId,
        data: &[u8],
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        if self.shells.contains(&channel) {
            session.data(channel, CryptoVec::from_slice(&data.to_ascii_uppercase()));
        }
        Ok(())
    }

    async fn channel_eof(
        &mut self,
        channel: ChannelId,
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        if self.shells.remove(&channel) {
            session.exit_status_request(channel, SHELL_STATUS);
            session.eof(channel);
            session.close(channel);
        }
        Ok(())
    }
}
