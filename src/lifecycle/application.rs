//! Hosted applications and their configuration instances

use crate::assemble::ContainerInfo;
use crate::error::{HostError, HostResult};
use crate::lifecycle::driver::{Driver, DriverParams, DriverRegistry};
use crate::lifecycle::entry::PackageContext;
use crate::lifecycle::hooks::ShutdownHooks;
use crate::lifecycle::readiness::{ReadinessGate, ReadySignal};
use crate::lifecycle::slot::SingleAssignment;
use crate::package::HostedPackage;
use crate::reconcile::{
    reconcile, ConfigurationStore, LayeredStore, MemoryConfigurationStore, ServerConfigRequest,
    ServerConfigurationModel,
};
use crate::unit::{UnitHandle, UnitManager};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

static NEXT_INSTANCE_ID: AtomicU64 = AtomicU64::new(1);

/// Per-package lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LifecycleState {
    NotInstalled = 0,
    Installing = 1,
    Configured = 2,
    Starting = 3,
    Started = 4,
    Stopping = 5,
    Uninstalled = 6,
}

impl LifecycleState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Installing,
            2 => Self::Configured,
            3 => Self::Starting,
            4 => Self::Started,
            5 => Self::Stopping,
            6 => Self::Uninstalled,
            _ => Self::NotInstalled,
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NotInstalled => "not-installed",
            Self::Installing => "installing",
            Self::Configured => "configured",
            Self::Starting => "starting",
            Self::Started => "started",
            Self::Stopping => "stopping",
            Self::Uninstalled => "uninstalled",
        };
        write!(f, "{name}")
    }
}

/// Collaborators shared by every configuration instance
pub struct ConfigServices {
    /// Already-persisted configuration
    pub persisted: Arc<dyn ConfigurationStore>,
    pub units: Arc<UnitManager>,
    pub drivers: DriverRegistry,
}

struct Configured {
    model: ServerConfigurationModel,
    driver: Arc<dyn Driver>,
}

/// One server configuration request made by a hosted package
pub struct ConfigurationInstance {
    id: String,
    instance_id: u64,
    services: Arc<ConfigServices>,
    configured: SingleAssignment<Configured>,
    unit: Mutex<Option<UnitHandle>>,
    driver: Mutex<Option<Arc<dyn Driver>>>,
}

impl ConfigurationInstance {
    fn new(instance_id: u64, slot_seq: u32, services: Arc<ConfigServices>) -> Self {
        Self {
            id: format!("{instance_id}-{slot_seq}"),
            instance_id,
            services,
            configured: SingleAssignment::new(),
            unit: Mutex::new(None),
            driver: Mutex::new(None),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Reconcile `model` against persisted configuration and create the
    /// driver. Callable once.
    pub fn configure(
        &self,
        model: ServerConfigurationModel,
        driver_type: &str,
        helper: Option<String>,
    ) -> HostResult<()> {
        if self.configured.is_assigned() {
            return Err(HostError::AlreadyConfigured(self.id.clone()));
        }

        let port = model.port();
        let model = reconcile(model, self.services.persisted.as_ref())?;
        let params = DriverParams {
            instance_id: self.instance_id,
            config_id: self.id.clone(),
            port,
            helper,
        };
        let driver = self.services.drivers.create(driver_type, &params)?;

        self.configured
            .set(Configured { model, driver })
            .map_err(|_| HostError::AlreadyConfigured(self.id.clone()))?;
        debug!("Configuration instance {} configured", self.id);
        Ok(())
    }

    /// Install the configuration unit if still needed, then start the driver
    pub async fn start(&self) -> HostResult<()> {
        let Configured { model, driver } = self
            .configured
            .take()
            .ok_or_else(|| HostError::NoConfigurationSet(self.id.clone()))?;

        let provided: Arc<dyn ConfigurationStore> =
            Arc::new(MemoryConfigurationStore::with_entries(driver.provided_config()));
        let current = LayeredStore::new(vec![
            Arc::clone(&self.services.persisted),
            self.services.units.clone() as Arc<dyn ConfigurationStore>,
            provided,
        ]);
        let model = reconcile(model, &current)?;

        if model.has_endpoint_needs() {
            let handle = self.services.units.install(self.instance_id, model).await?;
            if let Ok(mut unit) = self.unit.lock() {
                *unit = Some(handle);
            }
        } else {
            debug!("Configuration instance {} needs no unit", self.id);
        }

        driver.start().await?;
        if let Ok(mut slot) = self.driver.lock() {
            *slot = Some(driver);
        }
        info!("Configuration instance {} started", self.id);
        Ok(())
    }

    /// Remove the unit and stop the driver; failures are logged only
    pub async fn stop(&self) {
        let unit = self.unit.lock().ok().and_then(|mut u| u.take());
        if let Some(handle) = unit {
            if let Err(e) = self.services.units.uninstall(&handle).await {
                warn!("Failed to uninstall unit {}: {}", handle.name, e);
            }
        }

        let driver = self.driver.lock().ok().and_then(|mut d| d.take());
        if let Some(driver) = driver {
            if let Err(e) = driver.stop().await {
                warn!("Failed to stop driver of {}: {}", self.id, e);
            }
        }
    }

    /// Handle of the installed unit, if any
    pub fn unit(&self) -> Option<UnitHandle> {
        self.unit.lock().ok().and_then(|u| u.clone())
    }
}

/// A package being hosted
pub struct HostedApplication {
    instance_id: u64,
    package: HostedPackage,
    state: AtomicU8,
    containers: SingleAssignment<Vec<ContainerInfo>>,
    configs: Mutex<Vec<Arc<ConfigurationInstance>>>,
    next_slot: AtomicU32,
    gate: ReadinessGate,
    hooks: ShutdownHooks,
    uninstalled: AtomicBool,
    services: Arc<ConfigServices>,
}

impl HostedApplication {
    pub(crate) fn new(package: HostedPackage, services: Arc<ConfigServices>) -> Self {
        Self {
            instance_id: NEXT_INSTANCE_ID.fetch_add(1, Ordering::Relaxed),
            package,
            state: AtomicU8::new(LifecycleState::NotInstalled as u8),
            containers: SingleAssignment::new(),
            configs: Mutex::new(vec![]),
            next_slot: AtomicU32::new(0),
            gate: ReadinessGate::new(),
            hooks: ShutdownHooks::new(),
            uninstalled: AtomicBool::new(false),
            services,
        }
    }

    pub fn name(&self) -> &str {
        &self.package.name
    }

    pub fn instance_id(&self) -> u64 {
        self.instance_id
    }

    pub fn package(&self) -> &HostedPackage {
        &self.package
    }

    pub fn state(&self) -> LifecycleState {
        LifecycleState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn set_state(&self, state: LifecycleState) {
        self.state.store(state as u8, Ordering::Release);
    }

    pub(crate) fn set_containers(&self, containers: Vec<ContainerInfo>) -> HostResult<()> {
        self.containers
            .set(containers)
            .map_err(|_| HostError::Internal(format!("containers of {} already set", self.name())))
    }

    /// Assembled classpath, empty before assembly finishes
    pub fn containers(&self) -> Arc<Vec<ContainerInfo>> {
        self.containers.get().unwrap_or_default()
    }

    pub fn context(&self) -> PackageContext {
        PackageContext {
            name: self.package.name.clone(),
            instance_id: self.instance_id,
            containers: self.containers(),
        }
    }

    /// Derive a model for `request` with the host's overrides applied
    pub fn server_model(&self, request: ServerConfigRequest) -> ServerConfigurationModel {
        let request = request.apply(&self.package.overrides);
        ServerConfigurationModel::derive(&request, self.instance_id)
    }

    /// Open a new configuration instance
    pub fn new_configuration(&self) -> Arc<ConfigurationInstance> {
        let seq = self.next_slot.fetch_add(1, Ordering::Relaxed);
        let instance = Arc::new(ConfigurationInstance::new(
            self.instance_id,
            seq,
            Arc::clone(&self.services),
        ));
        match self.configs.lock() {
            Ok(mut configs) => configs.push(Arc::clone(&instance)),
            Err(_) => warn!("Configuration registry of {} poisoned", self.name()),
        }
        instance
    }

    pub fn configurations(&self) -> Vec<Arc<ConfigurationInstance>> {
        self.configs.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn gate(&self) -> &ReadinessGate {
        &self.gate
    }

    pub fn signal(&self, signal: ReadySignal) -> bool {
        self.gate.signal(signal)
    }

    pub fn hooks(&self) -> &ShutdownHooks {
        &self.hooks
    }

    /// Flip the terminal flag; true only for the first caller
    pub(crate) fn mark_uninstalled(&self) -> bool {
        !self.uninstalled.swap(true, Ordering::AcqRel)
    }

    pub fn is_uninstalled(&self) -> bool {
        self.uninstalled.load(Ordering::Acquire)
    }
}

impl fmt::Debug for HostedApplication {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostedApplication")
            .field("name", &self.package.name)
            .field("instance_id", &self.instance_id)
            .field("state", &self.state())
            .finish()
    }
}

/// What the entry point sees of its host
pub struct LaunchContext {
    app: Arc<HostedApplication>,
    package: PackageContext,
    args: Vec<String>,
    runtime: tokio::runtime::Handle,
}

impl LaunchContext {
    pub(crate) fn new(app: Arc<HostedApplication>, extra_args: &[String]) -> Self {
        let mut args = app.package().args.clone();
        args.extend(extra_args.iter().cloned());
        Self {
            package: app.context(),
            app,
            args,
            runtime: tokio::runtime::Handle::current(),
        }
    }

    pub fn package(&self) -> &PackageContext {
        &self.package
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn application(&self) -> &Arc<HostedApplication> {
        &self.app
    }

    /// Configure and start a server for `request` through `driver_type`
    pub fn start_server(
        &self,
        request: ServerConfigRequest,
        driver_type: &str,
        helper: Option<String>,
    ) -> HostResult<Arc<ConfigurationInstance>> {
        let instance = self.app.new_configuration();
        instance.configure(self.app.server_model(request), driver_type, helper)?;
        self.runtime.block_on(instance.start())?;
        Ok(instance)
    }

    /// The application's own ready callback
    pub fn signal_ready(&self) {
        self.app.signal(ReadySignal::AppReady);
    }

    pub fn add_shutdown_hook<F>(&self, name: impl Into<String>, hook: F)
    where
        F: FnOnce() -> HostResult<()> + Send + 'static,
    {
        self.app.hooks().register(name, hook);
    }
}
