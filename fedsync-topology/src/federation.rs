//! The provisioned federation: one hub and its spokes.

use crate::config::FederationConfig;
use crate::error::{TopologyError, TopologyResult};
use crate::graph::Topology;
use crate::instance::Instance;
use crate::provision::Provisioner;
use crate::readiness::{ReadinessPolicy, wait_until_all_ready};
use fedsync_client::Connector;
use std::sync::Arc;
use tracing::info;

/// Every provisioned instance, hub first.
#[derive(Debug)]
pub struct Federation {
    hub: String,
    instances: Vec<Instance>,
}

impl Federation {
    /// Provisions the hub, then every spoke in configuration order.
    pub async fn provision(
        config: &FederationConfig,
        connector: Arc<dyn Connector>,
    ) -> TopologyResult<Self> {
        config.validate()?;
        let provisioner = Provisioner::new(connector);
        let mut instances = vec![provisioner.provision(config.hub()?).await?];
        for spoke in config.spokes() {
            instances.push(provisioner.provision(spoke).await?);
        }
        info!("Provisioned {} instances", instances.len());
        Ok(Self {
            hub: config.hub.clone(),
            instances,
        })
    }

    /// Provisions every instance and builds the default topology.
    pub async fn setup(
        config: &FederationConfig,
        connector: Arc<dyn Connector>,
    ) -> TopologyResult<Self> {
        let mut federation = Self::provision(config, connector).await?;
        let topology = federation.default_topology();
        federation.build(&topology).await?;
        Ok(federation)
    }

    /// Spokes hold a record of the hub and of every other spoke.
    pub fn default_topology(&self) -> Topology {
        let spokes: Vec<&str> = self.spokes().map(Instance::name).collect();
        Topology::star(&self.hub, spokes.iter().copied()).merge(Topology::mesh(spokes))
    }

    pub fn hub(&self) -> &Instance {
        // The hub is always provisioned first.
        &self.instances[0]
    }

    pub fn spokes(&self) -> impl Iterator<Item = &Instance> {
        self.instances.iter().skip(1)
    }

    pub fn instances(&self) -> impl Iterator<Item = &Instance> {
        self.instances.iter()
    }

    pub fn instance(&self, name: &str) -> TopologyResult<&Instance> {
        self.instances
            .iter()
            .find(|i| i.name() == name)
            .ok_or_else(|| TopologyError::UnknownInstance(name.to_string()))
    }

    pub fn instance_mut(&mut self, name: &str) -> TopologyResult<&mut Instance> {
        self.instances
            .iter_mut()
            .find(|i| i.name() == name)
            .ok_or_else(|| TopologyError::UnknownInstance(name.to_string()))
    }

    /// Waits until every instance, hub included, reports healthy workers.
    pub async fn wait_until_ready(&self, policy: &ReadinessPolicy) -> TopologyResult<()> {
        wait_until_all_ready(self.instances(), policy).await
    }
}
