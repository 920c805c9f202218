//! Server components and their listener declarations

use async_trait::async_trait;
use baton_core::{Error, ListenerDescriptor, Result, TransportMode};
use futures::future::join_all;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

/// A server owned by the process, serving one or more listeners
#[async_trait]
pub trait ServerComponent: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &str;

    /// Listeners this component needs
    fn descriptors(&self) -> Vec<ListenerDescriptor>;

    /// Serve connections from `listener` until [`ServerComponent::shutdown`]
    async fn serve(&self, mode: TransportMode, listener: TcpListener) -> Result<()>;

    /// Stop accepting and finish in-flight work
    async fn shutdown(&self) -> Result<()>;
}

/// Registered server components, in registration order
#[derive(Default)]
pub struct ServerRegistry {
    components: Vec<Arc<dyn ServerComponent>>,
    addresses: HashSet<String>,
}

impl std::fmt::Debug for ServerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerRegistry")
            .field(
                "components",
                &self.components.iter().map(|c| c.name()).collect::<Vec<_>>(),
            )
            .field("addresses", &self.addresses)
            .finish()
    }
}

impl ServerRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a component. Fails when one of its addresses is already
    /// claimed, leaving the registry unchanged.
    pub fn register(&mut self, component: Arc<dyn ServerComponent>) -> Result<()> {
        let descriptors = component.descriptors();

        let mut claimed = HashSet::new();
        for descriptor in &descriptors {
            if self.addresses.contains(&descriptor.address)
                || !claimed.insert(descriptor.address.clone())
            {
                return Err(Error::Config(format!(
                    "listener {descriptor} of server '{}' is already registered",
                    component.name()
                )));
            }
        }

        info!(
            server = component.name(),
            listeners = descriptors.len(),
            "Server registered"
        );
        self.addresses.extend(claimed);
        self.components.push(component);
        Ok(())
    }

    /// Number of registered components
    pub fn len(&self) -> usize {
        self.components.len()
    }

    /// Whether no component is registered
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Every declared listener with its owning component
    pub fn bindings(&self) -> Vec<(ListenerDescriptor, Arc<dyn ServerComponent>)> {
        self.components
            .iter()
            .flat_map(|component| {
                component
                    .descriptors()
                    .into_iter()
                    .map(move |descriptor| (descriptor, Arc::clone(component)))
            })
            .collect()
    }

    /// Shut every component down concurrently. Returns the first failure
    /// after all of them finished.
    pub async fn shutdown_all(&self) -> Result<()> {
        let results = join_all(self.components.iter().map(|component| async move {
            let result = component.shutdown().await;
            if let Err(e) = &result {
                error!(server = component.name(), error = %e, "Server shutdown failed");
            }
            result
        }))
        .await;

        results.into_iter().collect::<Result<Vec<_>>>().map(|_| ())
    }
}
