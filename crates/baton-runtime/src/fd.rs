//! Listener binding and generation handoff

use crate::pidfile::PidFile;
use async_trait::async_trait;
use baton_core::{Error, Network, Result};
use parking_lot::Mutex;
use socket2::{Domain, Protocol, Socket, Type};
use std::collections::HashMap;
use std::ffi::OsString;
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Environment variable naming the parent generation's handoff socket
pub const UPGRADE_SOCKET_ENV: &str = "BATON_UPGRADE_SOCKET";

const LISTEN_BACKLOG: i32 = 1024;

/// Obtains listening sockets and coordinates process generations
#[async_trait]
pub trait ListenerBinder: Send + Sync {
    /// Listener for `address` on `network`, reused when this generation
    /// already holds one
    async fn listen(&self, network: Network, address: &str) -> io::Result<TcpListener>;

    /// Signal that this generation is serving
    async fn ready(&self) -> Result<()>;

    /// Token cancelled once this generation should drain and exit
    fn exit(&self) -> CancellationToken;

    /// Start a successor generation and wait until it is ready
    async fn upgrade(&self) -> Result<()>;

    /// Request exit without an upgrade
    fn stop(&self);
}

/// Options of the [`Upgrader`]
#[derive(Debug, Clone)]
pub struct UpgraderOptions {
    /// Pid file rewritten by each ready generation
    pub pid_file: Option<PathBuf>,
    /// How long a successor may take to become ready
    pub upgrade_timeout: Duration,
    /// Binary started as the successor, the running executable when unset
    pub executable: Option<PathBuf>,
    /// Successor arguments, this process's arguments when unset
    pub args: Option<Vec<OsString>>,
}

impl Default for UpgraderOptions {
    fn default() -> Self {
        Self {
            pid_file: None,
            upgrade_timeout: Duration::from_secs(60),
            executable: None,
            args: None,
        }
    }
}

/// [`ListenerBinder`] that re-execs the current binary on upgrade.
///
/// Sockets are bound with `SO_REUSEADDR` and `SO_REUSEPORT`, so the successor
/// binds the same addresses while this generation keeps accepting. The
/// successor reports readiness over a unix socket named by
/// [`UPGRADE_SOCKET_ENV`].
#[derive(Debug)]
pub struct Upgrader {
    options: UpgraderOptions,
    pid_file: Option<PidFile>,
    parent: Option<PathBuf>,
    listeners: Mutex<HashMap<(Network, String), std::net::TcpListener>>,
    exit: CancellationToken,
    upgrading: AtomicBool,
    upgraded: AtomicBool,
}

impl Upgrader {
    /// Create the upgrader for this generation.
    ///
    /// Fails when the pid file is held by another live process, unless this
    /// generation was started by that process.
    pub fn new(options: UpgraderOptions) -> Result<Self> {
        let parent = std::env::var_os(UPGRADE_SOCKET_ENV).map(PathBuf::from);
        Self::with_parent(options, parent)
    }

    fn with_parent(options: UpgraderOptions, parent: Option<PathBuf>) -> Result<Self> {
        let pid_file = options.pid_file.clone().map(PidFile::new);

        if let (Some(pid_file), None) = (&pid_file, &parent) {
            pid_file.check_available()?;
        }

        if let Some(path) = &parent {
            info!(socket = %path.display(), "Started as successor generation");
        }

        Ok(Self {
            options,
            pid_file,
            parent,
            listeners: Mutex::new(HashMap::new()),
            exit: CancellationToken::new(),
            upgrading: AtomicBool::new(false),
            upgraded: AtomicBool::new(false),
        })
    }

    /// Whether a parent generation is waiting on this one
    pub fn has_parent(&self) -> bool {
        self.parent.is_some()
    }

    /// Whether this generation already handed off to a successor
    pub fn is_upgraded(&self) -> bool {
        self.upgraded.load(Ordering::SeqCst)
    }

    /// Close every listener this generation holds.
    ///
    /// Sockets handed to components stay open until their accept loops end,
    /// after which the kernel stops routing connections to this process.
    fn release_listeners(&self) {
        let released = std::mem::take(&mut *self.listeners.lock());
        if !released.is_empty() {
            info!(listeners = released.len(), "Released listeners");
        }
    }

    #[cfg(unix)]
    async fn notify_parent(&self) -> Result<()> {
        use tokio::io::AsyncWriteExt;

        let Some(path) = &self.parent else {
            return Ok(());
        };

        let mut stream = tokio::net::UnixStream::connect(path)
            .await
            .map_err(|e| Error::ReadinessSignal(format!("connect {}: {e}", path.display())))?;
        stream
            .write_all(format!("{}\n", std::process::id()).as_bytes())
            .await
            .map_err(|e| Error::ReadinessSignal(format!("write pid: {e}")))?;
        stream
            .shutdown()
            .await
            .map_err(|e| Error::ReadinessSignal(format!("close handoff socket: {e}")))?;

        info!(socket = %path.display(), "Parent generation notified");
        Ok(())
    }

    #[cfg(not(unix))]
    async fn notify_parent(&self) -> Result<()> {
        match &self.parent {
            Some(_) => Err(Error::ReadinessSignal(
                "generation handoff is only supported on unix".to_string(),
            )),
            None => Ok(()),
        }
    }

    #[cfg(unix)]
    async fn spawn_successor(&self) -> Result<u32> {
        use tokio::io::AsyncReadExt;

        let dir = tempfile::Builder::new()
            .prefix("baton-upgrade-")
            .tempdir()
            .map_err(|e| Error::Upgrade(format!("create handoff dir: {e}")))?;
        let socket_path = dir.path().join("handoff.sock");
        let handoff = tokio::net::UnixListener::bind(&socket_path)
            .map_err(|e| Error::Upgrade(format!("bind handoff socket: {e}")))?;

        let exe = match &self.options.executable {
            Some(exe) => exe.clone(),
            None => std::env::current_exe()
                .map_err(|e| Error::Upgrade(format!("locate current executable: {e}")))?,
        };
        let args = match &self.options.args {
            Some(args) => args.clone(),
            None => std::env::args_os().skip(1).collect(),
        };
        let mut child = tokio::process::Command::new(&exe)
            .args(args)
            .env(UPGRADE_SOCKET_ENV, &socket_path)
            .spawn()
            .map_err(|e| Error::Upgrade(format!("spawn {}: {e}", exe.display())))?;
        let child_pid = child.id().unwrap_or_default();

        info!(pid = child_pid, exe = %exe.display(), "Successor generation spawned");

        let handshake = async {
            let (mut stream, _) = handoff.accept().await?;
            let mut reply = String::new();
            stream.read_to_string(&mut reply).await?;
            reply
                .trim()
                .parse::<u32>()
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
        };

        let outcome = tokio::select! {
            reply = tokio::time::timeout(self.options.upgrade_timeout, handshake) => match reply {
                Ok(Ok(pid)) => Ok(pid),
                Ok(Err(e)) => Err(Error::Upgrade(format!("handoff failed: {e}"))),
                Err(_) => Err(Error::Upgrade(format!(
                    "successor not ready after {}ms",
                    self.options.upgrade_timeout.as_millis()
                ))),
            },
            status = child.wait() => Err(Error::Upgrade(match status {
                Ok(status) => format!("successor exited before becoming ready: {status}"),
                Err(e) => format!("wait for successor: {e}"),
            })),
        };

        if outcome.is_err() {
            if let Err(e) = child.start_kill() {
                debug!(pid = child_pid, error = %e, "Successor already gone");
            }
        }

        drop(handoff);
        if let Err(e) = dir.close() {
            debug!(error = %e, "Failed to remove handoff dir");
        }

        outcome
    }

    #[cfg(not(unix))]
    async fn spawn_successor(&self) -> Result<u32> {
        Err(Error::Upgrade(
            "upgrades are only supported on unix".to_string(),
        ))
    }
}

#[async_trait]
impl ListenerBinder for Upgrader {
    async fn listen(&self, network: Network, address: &str) -> io::Result<TcpListener> {
        let key = (network, address.to_string());

        let existing = self
            .listeners
            .lock()
            .get(&key)
            .map(std::net::TcpListener::try_clone)
            .transpose()?;
        if let Some(existing) = existing {
            debug!(%network, address, "Reusing listener");
            return TcpListener::from_std(existing);
        }

        let addr = resolve(network, address).await?;
        let listener = bind_reusable(addr)?;
        let clone = listener.try_clone()?;
        self.listeners.lock().insert(key, listener);

        info!(%network, address, local_addr = %clone.local_addr()?, "Listener bound");
        TcpListener::from_std(clone)
    }

    async fn ready(&self) -> Result<()> {
        if let Some(pid_file) = &self.pid_file {
            pid_file
                .write(std::process::id())
                .map_err(|e| Error::ReadinessSignal(format!("write pid file: {e}")))?;
        }
        self.notify_parent().await
    }

    fn exit(&self) -> CancellationToken {
        self.exit.clone()
    }

    async fn upgrade(&self) -> Result<()> {
        if self.upgraded.load(Ordering::SeqCst) {
            return Err(Error::AlreadyUpgraded);
        }
        if self.upgrading.swap(true, Ordering::SeqCst) {
            return Err(Error::UpgradeInProgress);
        }

        let result = self.spawn_successor().await;
        if let Ok(pid) = &result {
            self.upgraded.store(true, Ordering::SeqCst);
            info!(pid, "Successor generation is ready, exiting");
            self.release_listeners();
            self.exit.cancel();
        }

        self.upgrading.store(false, Ordering::SeqCst);
        result.map(|_| ())
    }

    fn stop(&self) {
        if !self.exit.is_cancelled() {
            info!("Exit requested");
        }
        self.release_listeners();
        self.exit.cancel();
    }
}

async fn resolve(network: Network, address: &str) -> io::Result<SocketAddr> {
    let mut candidates = tokio::net::lookup_host(address).await?;
    candidates.find(|addr| network.accepts(addr)).ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::AddrNotAvailable,
            format!("no {network} address for {address}"),
        )
    })
}

fn bind_reusable(addr: SocketAddr) -> io::Result<std::net::TcpListener> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    #[cfg(unix)]
    if let Err(e) = socket.set_reuse_port(true) {
        warn!(%addr, error = %e, "SO_REUSEPORT unavailable, upgrades will fail to rebind");
    }
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(LISTEN_BACKLOG)?;
    Ok(socket.into())
}
