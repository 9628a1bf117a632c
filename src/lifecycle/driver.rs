//! Server drivers
//!
//! A driver brings up the network side of a configuration instance once
//! its configuration is in place. Drivers are created per type name
//! through a [`DriverRegistry`].

use crate::error::{HostError, HostResult};
use crate::reconcile::ConfigEntry;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// Parameters handed to a driver factory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverParams {
    /// Owning package's instance id
    pub instance_id: u64,
    /// Configuration instance id (`<instanceId>-<slotSeq>`)
    pub config_id: String,
    /// Requested port, if the model declares an endpoint
    pub port: Option<u16>,
    /// Free-form helper value passed through from configure
    pub helper: Option<String>,
}

#[async_trait]
pub trait Driver: Send + Sync {
    async fn start(&self) -> HostResult<()>;

    async fn stop(&self) -> HostResult<()>;

    /// Configuration the driver sets up on its own
    fn provided_config(&self) -> Vec<ConfigEntry> {
        vec![]
    }
}

pub trait DriverFactory: Send + Sync {
    fn create(&self, params: &DriverParams) -> HostResult<Arc<dyn Driver>>;
}

impl<F> DriverFactory for F
where
    F: Fn(&DriverParams) -> HostResult<Arc<dyn Driver>> + Send + Sync,
{
    fn create(&self, params: &DriverParams) -> HostResult<Arc<dyn Driver>> {
        self(params)
    }
}

/// Driver factories by type name
#[derive(Default, Clone)]
pub struct DriverRegistry {
    factories: HashMap<String, Arc<dyn DriverFactory>>,
}

impl DriverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, driver_type: impl Into<String>, factory: Arc<dyn DriverFactory>) -> Self {
        self.factories.insert(driver_type.into(), factory);
        self
    }

    pub fn create(&self, driver_type: &str, params: &DriverParams) -> HostResult<Arc<dyn Driver>> {
        let factory = self
            .factories
            .get(driver_type)
            .ok_or_else(|| HostError::UnknownDriver(driver_type.to_string()))?;
        factory.create(params)
    }

    pub fn types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }
}
