//! Process lifecycle: bind, serve, signal readiness, await triggers, drain

use crate::fd::ListenerBinder;
use crate::registry::ServerRegistry;
use crate::trigger::{Trigger, TriggerSource};
use baton_core::{Error, Network, Result};
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::task::TaskTracker;
use tracing::{error, info, warn};

/// Coordinator lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorState {
    /// Constructed, not yet running
    Initializing,
    /// Obtaining listeners
    Binding,
    /// Handing listeners to components
    Serving,
    /// Signaling readiness
    Ready,
    /// Waiting for triggers
    Awaiting,
    /// A successor generation is starting
    Upgrading,
    /// Shutting components down
    Draining,
    /// Terminal
    Exited,
}

impl fmt::Display for CoordinatorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CoordinatorState::Initializing => "initializing",
            CoordinatorState::Binding => "binding",
            CoordinatorState::Serving => "serving",
            CoordinatorState::Ready => "ready",
            CoordinatorState::Awaiting => "awaiting",
            CoordinatorState::Upgrading => "upgrading",
            CoordinatorState::Draining => "draining",
            CoordinatorState::Exited => "exited",
        };
        f.write_str(name)
    }
}

impl CoordinatorState {
    /// Whether this generation's components are accepting connections
    pub fn is_serving(&self) -> bool {
        matches!(
            self,
            CoordinatorState::Serving
                | CoordinatorState::Ready
                | CoordinatorState::Awaiting
                | CoordinatorState::Upgrading
        )
    }
}

/// Cloneable read-only view of a coordinator's state
#[derive(Debug, Clone)]
pub struct StateView(Arc<RwLock<CoordinatorState>>);

impl StateView {
    /// Current lifecycle state
    pub fn get(&self) -> CoordinatorState {
        *self.0.read()
    }
}

/// Invoked when graceful shutdown misses its deadline
pub trait Terminator: Send + Sync + fmt::Debug {
    /// Terminate the process
    fn terminate(&self, timeout: Duration);
}

/// Default [`Terminator`]: exits the process with status 1
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessExit;

impl Terminator for ProcessExit {
    fn terminate(&self, timeout: Duration) {
        error!(
            timeout_ms = timeout.as_millis() as u64,
            "Graceful shutdown timed out, forcing exit"
        );
        std::process::exit(1);
    }
}

/// Coordinator options
#[derive(Debug, Clone)]
pub struct CoordinatorOptions {
    /// Network every listener is opened on
    pub network: Network,
    /// Deadline for draining all components
    pub shutdown_timeout: Duration,
}

impl Default for CoordinatorOptions {
    fn default() -> Self {
        Self {
            network: Network::Tcp,
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

/// Drives one process generation through its lifecycle
pub struct UpgradeCoordinator {
    registry: ServerRegistry,
    binder: Arc<dyn ListenerBinder>,
    options: CoordinatorOptions,
    terminator: Arc<dyn Terminator>,
    state: Arc<RwLock<CoordinatorState>>,
}

impl fmt::Debug for UpgradeCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpgradeCoordinator")
            .field("registry", &self.registry)
            .field("options", &self.options)
            .field("terminator", &self.terminator)
            .field("state", &self.state())
            .finish()
    }
}

impl UpgradeCoordinator {
    /// Create a coordinator over the registered components
    pub fn new(
        registry: ServerRegistry,
        binder: Arc<dyn ListenerBinder>,
        options: CoordinatorOptions,
    ) -> Self {
        Self {
            registry,
            binder,
            options,
            terminator: Arc::new(ProcessExit),
            state: Arc::new(RwLock::new(CoordinatorState::Initializing)),
        }
    }

    /// Replace the forced-exit action
    pub fn with_terminator(mut self, terminator: Arc<dyn Terminator>) -> Self {
        self.terminator = terminator;
        self
    }

    /// Current lifecycle state
    pub fn state(&self) -> CoordinatorState {
        *self.state.read()
    }

    /// View of the state that outlives borrows of the coordinator
    pub fn state_view(&self) -> StateView {
        StateView(Arc::clone(&self.state))
    }

    fn transition(&self, next: CoordinatorState) {
        set_state(&self.state, next);
    }

    /// Run the generation until it exits.
    ///
    /// Returns once every component drained, after a failed start-up, or with
    /// [`Error::ForcedShutdownTimeout`] once the terminator was invoked.
    pub async fn run<T: TriggerSource>(&self, triggers: T) -> Result<()> {
        let result = self.run_inner(triggers).await;
        self.transition(CoordinatorState::Exited);
        result
    }

    async fn run_inner<T: TriggerSource>(&self, triggers: T) -> Result<()> {
        self.transition(CoordinatorState::Binding);
        let mut bound = Vec::new();
        for (descriptor, component) in self.registry.bindings() {
            let listener = self
                .binder
                .listen(self.options.network, &descriptor.address)
                .await
                .map_err(|e| Error::bind(descriptor.clone(), e))?;
            bound.push((descriptor, component, listener));
        }

        self.transition(CoordinatorState::Serving);
        let serving = TaskTracker::new();
        for (descriptor, component, listener) in bound {
            serving.spawn(async move {
                if let Err(e) = component.serve(descriptor.mode, listener).await {
                    error!(
                        server = component.name(),
                        listener = %descriptor,
                        error = %e,
                        "Server stopped with error"
                    );
                }
            });
        }
        serving.close();

        self.transition(CoordinatorState::Ready);
        if let Err(e) = self.binder.ready().await {
            error!(error = %e, "Failed to signal readiness");
            if let Err(drain) = self.registry.shutdown_all().await {
                warn!(error = %drain, "Shutdown after readiness failure was incomplete");
            }
            return Err(e);
        }
        info!(
            pid = std::process::id(),
            servers = self.registry.len(),
            "Generation is ready"
        );

        self.transition(CoordinatorState::Awaiting);
        let exit = self.binder.exit();
        let receiver = tokio::spawn(receive_triggers(
            triggers,
            Arc::clone(&self.binder),
            Arc::clone(&self.state),
        ));
        exit.cancelled().await;
        receiver.abort();

        self.drain(&serving).await
    }

    async fn drain(&self, serving: &TaskTracker) -> Result<()> {
        self.transition(CoordinatorState::Draining);
        let timeout = self.options.shutdown_timeout;
        let started = Instant::now();
        info!(timeout_ms = timeout.as_millis() as u64, "Draining servers");

        let graceful = async {
            let result = self.registry.shutdown_all().await;
            serving.wait().await;
            result
        };

        tokio::select! {
            result = graceful => {
                info!(
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Servers drained"
                );
                result
            }
            _ = tokio::time::sleep(timeout) => {
                self.terminator.terminate(timeout);
                Err(Error::ForcedShutdownTimeout(timeout))
            }
        }
    }
}

fn set_state(state: &RwLock<CoordinatorState>, next: CoordinatorState) {
    let mut current = state.write();
    if *current != next {
        info!(from = %*current, to = %next, "Coordinator state changed");
        *current = next;
    }
}

/// Move to `next` only while in `expected`
fn set_state_from(
    state: &RwLock<CoordinatorState>,
    expected: CoordinatorState,
    next: CoordinatorState,
) -> bool {
    let mut current = state.write();
    if *current != expected {
        return false;
    }
    info!(from = %*current, to = %next, "Coordinator state changed");
    *current = next;
    true
}

async fn receive_triggers<T: TriggerSource>(
    mut triggers: T,
    binder: Arc<dyn ListenerBinder>,
    state: Arc<RwLock<CoordinatorState>>,
) {
    while let Some(trigger) = triggers.next().await {
        info!(%trigger, "Trigger received");
        match trigger {
            Trigger::Upgrade => {
                let binder = Arc::clone(&binder);
                let state = Arc::clone(&state);
                tokio::spawn(async move { attempt_upgrade(binder, state).await });
            }
            Trigger::Exit => binder.stop(),
        }
    }
    info!("Trigger source closed");
}

async fn attempt_upgrade(binder: Arc<dyn ListenerBinder>, state: Arc<RwLock<CoordinatorState>>) {
    set_state_from(&state, CoordinatorState::Awaiting, CoordinatorState::Upgrading);

    match binder.upgrade().await {
        Ok(()) => info!("Upgrade complete"),
        Err(e @ (Error::UpgradeInProgress | Error::AlreadyUpgraded)) => {
            warn!(error = %e, "Upgrade rejected");
            return;
        }
        Err(e) => {
            error!(error = %e, "Upgrade failed, staying on current generation");
            set_state_from(&state, CoordinatorState::Upgrading, CoordinatorState::Awaiting);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_display() {
        assert_eq!(CoordinatorState::Awaiting.to_string(), "awaiting");
        assert_eq!(CoordinatorState::Exited.to_string(), "exited");
    }

    #[test]
    fn test_serving_states() {
        assert!(!CoordinatorState::Binding.is_serving());
        assert!(CoordinatorState::Serving.is_serving());
        assert!(CoordinatorState::Upgrading.is_serving());
        assert!(!CoordinatorState::Draining.is_serving());
        assert!(!CoordinatorState::Exited.is_serving());
    }

    #[test]
    fn test_conditional_transition() {
        let state = RwLock::new(CoordinatorState::Draining);
        assert!(!set_state_from(
            &state,
            CoordinatorState::Awaiting,
            CoordinatorState::Upgrading
        ));
        assert_eq!(*state.read(), CoordinatorState::Draining);

        set_state(&state, CoordinatorState::Awaiting);
        assert!(set_state_from(
            &state,
            CoordinatorState::Awaiting,
            CoordinatorState::Upgrading
        ));
        assert_eq!(*state.read(), CoordinatorState::Upgrading);
    }
}
