//! Operational triggers: upgrade and exit requests

use async_trait::async_trait;
use std::fmt;
use tokio::sync::mpsc;
use tracing::info;

/// Operational request delivered to the coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// Replace this generation with a fresh one
    Upgrade,
    /// Drain and exit
    Exit,
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trigger::Upgrade => write!(f, "upgrade"),
            Trigger::Exit => write!(f, "exit"),
        }
    }
}

/// Source of operational triggers
#[async_trait]
pub trait TriggerSource: Send + 'static {
    /// Next trigger, or `None` once the source is exhausted
    async fn next(&mut self) -> Option<Trigger>;
}

/// OS signals: `SIGHUP` requests an upgrade, `SIGTERM` and `SIGINT` an exit
#[derive(Debug)]
pub struct SignalTriggers {
    #[cfg(unix)]
    hangup: tokio::signal::unix::Signal,
    #[cfg(unix)]
    terminate: tokio::signal::unix::Signal,
    #[cfg(unix)]
    interrupt: tokio::signal::unix::Signal,
}

impl SignalTriggers {
    /// Install the signal handlers. Must be called within a tokio runtime.
    #[cfg(unix)]
    pub fn new() -> std::io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};

        Ok(Self {
            hangup: signal(SignalKind::hangup())?,
            terminate: signal(SignalKind::terminate())?,
            interrupt: signal(SignalKind::interrupt())?,
        })
    }

    /// Ctrl+C is the only signal available on this platform
    #[cfg(not(unix))]
    pub fn new() -> std::io::Result<Self> {
        Ok(Self {})
    }
}

#[async_trait]
impl TriggerSource for SignalTriggers {
    #[cfg(unix)]
    async fn next(&mut self) -> Option<Trigger> {
        let trigger = tokio::select! {
            received = self.hangup.recv() => {
                received?;
                info!("Received SIGHUP");
                Trigger::Upgrade
            }
            received = self.terminate.recv() => {
                received?;
                info!("Received SIGTERM");
                Trigger::Exit
            }
            received = self.interrupt.recv() => {
                received?;
                info!("Received SIGINT");
                Trigger::Exit
            }
        };
        Some(trigger)
    }

    #[cfg(not(unix))]
    async fn next(&mut self) -> Option<Trigger> {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received Ctrl+C");
                Some(Trigger::Exit)
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for Ctrl+C");
                None
            }
        }
    }
}

/// Triggers fed through a channel
#[derive(Debug)]
pub struct ChannelTriggers {
    receiver: mpsc::Receiver<Trigger>,
}

impl ChannelTriggers {
    /// Create a source and the sender that feeds it
    pub fn new(buffer: usize) -> (mpsc::Sender<Trigger>, Self) {
        let (sender, receiver) = mpsc::channel(buffer);
        (sender, Self { receiver })
    }
}

#[async_trait]
impl TriggerSource for ChannelTriggers {
    async fn next(&mut self) -> Option<Trigger> {
        self.receiver.recv().await
    }
}
