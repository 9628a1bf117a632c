//! Host orchestration
//!
//! Drives one hosted package at a time through thinning, assembly,
//! framework deployment and entry-point invocation. Installs run on a
//! spawned task; a failed or declined install is uninstalled before its
//! handle resolves.

use crate::assemble::{ContainerAssembler, ContainerInfo, PrefixStarterFilter};
use crate::audit::AuditLog;
use crate::config::HostSettings;
use crate::error::{HostError, HostResult};
use crate::lifecycle::application::{
    ConfigServices, HostedApplication, LaunchContext, LifecycleState,
};
use crate::lifecycle::driver::DriverRegistry;
use crate::lifecycle::entry::{self, EntryPoint};
use crate::lifecycle::readiness::ReadySignal;
use crate::lifecycle::slot::ActiveInstanceSlot;
use crate::package::{ArchiveReader, HostedPackage, PackageContents};
use crate::reconcile::{ConfigurationStore, ModelSerializer};
use crate::store::LibraryStore;
use crate::thin::{Thinner, ThinningPipeline};
use crate::unit::UnitManager;
use async_trait::async_trait;
use futures_util::future::join_all;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// The module framework a package is deployed into
#[async_trait]
pub trait HostingFramework: Send + Sync {
    /// Containers the framework adds to every package's classpath
    fn support_containers(&self) -> Vec<ContainerInfo>;

    /// Deploy an assembled package; `false` declines it
    async fn deploy(&self, app: Arc<HostedApplication>) -> HostResult<bool>;

    /// Resolve the package's main entry point
    async fn load_entry_point(&self, app: &HostedApplication) -> HostResult<Arc<dyn EntryPoint>>;

    async fn undeploy(&self, app: &HostedApplication) -> HostResult<()>;
}

/// External collaborators of the host
pub struct HostServices {
    pub framework: Arc<dyn HostingFramework>,
    pub thinner: Arc<dyn Thinner>,
    pub archives: Arc<dyn ArchiveReader>,
    /// Already-persisted configuration consulted by reconciliation
    pub persisted: Arc<dyn ConfigurationStore>,
    pub serializer: Arc<dyn ModelSerializer>,
    pub drivers: DriverRegistry,
}

/// Pending install
pub struct InstallHandle {
    app: Arc<HostedApplication>,
    task: JoinHandle<HostResult<bool>>,
}

impl InstallHandle {
    pub fn application(&self) -> &Arc<HostedApplication> {
        &self.app
    }

    /// Wait for the install to complete
    pub async fn wait(self) -> HostResult<bool> {
        self.task
            .await
            .map_err(|e| HostError::Internal(format!("install task failed: {e}")))?
    }
}

pub struct HostOrchestrator {
    settings: HostSettings,
    store: LibraryStore,
    pipeline: ThinningPipeline,
    assembler: ContainerAssembler,
    framework: Arc<dyn HostingFramework>,
    archives: Arc<dyn ArchiveReader>,
    config: Arc<ConfigServices>,
    slot: ActiveInstanceSlot,
    active: Mutex<Option<Arc<HostedApplication>>>,
    activated: AtomicBool,
    audit: AuditLog,
}

impl HostOrchestrator {
    pub fn new(settings: HostSettings, services: HostServices) -> Self {
        let store = LibraryStore::new(
            settings.library_root(),
            settings.shared_library_root.clone(),
            settings.derived_root(),
        );
        let pipeline = ThinningPipeline::new(
            services.thinner,
            store.clone(),
            settings.work_area.clone(),
            settings.thin_dir(),
        );
        let assembler = ContainerAssembler::new(
            store.clone(),
            Arc::new(PrefixStarterFilter::new(settings.framework_starters.clone())),
        );
        let units = Arc::new(UnitManager::new(
            settings.units_dir.clone(),
            settings.start_level,
            services.serializer,
        ));
        let config = Arc::new(ConfigServices {
            persisted: services.persisted,
            units,
            drivers: services.drivers,
        });

        Self {
            audit: AuditLog::new(&settings),
            settings,
            store,
            pipeline,
            assembler,
            framework: services.framework,
            archives: services.archives,
            config,
            slot: ActiveInstanceSlot::new(),
            active: Mutex::new(None),
            activated: AtomicBool::new(false),
        }
    }

    pub fn settings(&self) -> &HostSettings {
        &self.settings
    }

    pub fn store(&self) -> &LibraryStore {
        &self.store
    }

    pub fn units(&self) -> &Arc<UnitManager> {
        &self.config.units
    }

    /// The currently active package, if any
    pub fn active(&self) -> Option<Arc<HostedApplication>> {
        self.active.lock().ok().and_then(|a| a.clone())
    }

    /// Remove configuration units left by a previous run. Runs once;
    /// returns the number of units purged.
    pub async fn activate(&self) -> HostResult<usize> {
        if self.activated.swap(true, Ordering::AcqRel) {
            debug!("Host already activated");
            return Ok(0);
        }

        let purged = self.config.units.purge().await?;
        let names: Vec<&str> = purged.iter().map(|r| r.name.as_str()).collect();
        self.audit
            .log(
                "units.purged",
                &serde_json::json!({ "count": purged.len(), "units": names }),
            )
            .await;

        info!("Host activated, {} leftover units purged", purged.len());
        Ok(purged.len())
    }

    /// Start installing `package`.
    ///
    /// Fails immediately with `OnlyOneInstanceAllowed` when another package
    /// holds the active slot, or when a package of the same name is still
    /// installing; nothing of `package` is touched in that case. A started
    /// package of the same name is uninstalled before the new one deploys.
    pub fn install(self: &Arc<Self>, package: HostedPackage) -> HostResult<InstallHandle> {
        if !self.activated.load(Ordering::Acquire) {
            return Err(HostError::User(
                "Host must be activated before installing packages".to_string(),
            ));
        }

        self.slot
            .claim(&package.name)
            .map_err(|active| HostError::OnlyOneInstanceAllowed {
                active,
                requested: package.name.clone(),
            })?;

        let mut active = self
            .active
            .lock()
            .map_err(|_| HostError::Internal("active package lock poisoned".to_string()))?;

        // Re-installing a started package replaces it; one still installing
        // keeps the slot
        let replaced = match active.take() {
            Some(previous) if previous.name() == package.name && !previous.is_uninstalled() => {
                if previous.state() < LifecycleState::Started {
                    let name = previous.name().to_string();
                    *active = Some(previous);
                    return Err(HostError::OnlyOneInstanceAllowed {
                        active: name,
                        requested: package.name.clone(),
                    });
                }
                Some(previous)
            }
            _ => None,
        };

        let app = Arc::new(HostedApplication::new(package, Arc::clone(&self.config)));
        app.set_state(LifecycleState::Installing);
        *active = Some(Arc::clone(&app));
        drop(active);
        info!(
            "Installing {} (instance {})",
            app.name(),
            app.instance_id()
        );

        let host = Arc::clone(self);
        let task_app = Arc::clone(&app);
        let task = tokio::spawn(async move {
            if let Some(previous) = replaced {
                info!("Replacing running instance {} of {}", previous.instance_id(), previous.name());
                host.uninstall(&previous).await;
            }

            let result = host.deploy(Arc::clone(&task_app)).await;
            match &result {
                Ok(true) => {
                    host.audit
                        .log(
                            "package.installed",
                            &serde_json::json!({
                                "name": task_app.name(),
                                "instance_id": task_app.instance_id(),
                                "containers": task_app.containers().len(),
                            }),
                        )
                        .await;
                }
                Ok(false) => {
                    info!("Deployment of {} declined, uninstalling", task_app.name());
                    host.uninstall(&task_app).await;
                }
                Err(e) => {
                    warn!("Install of {} failed: {}", task_app.name(), e);
                    host.uninstall(&task_app).await;
                }
            }
            result
        });

        Ok(InstallHandle { app, task })
    }

    async fn deploy(&self, app: Arc<HostedApplication>) -> HostResult<bool> {
        let package = app.package().clone();
        let pipeline = self.pipeline.clone();
        let assembler = self.assembler.clone();
        let archives = Arc::clone(&self.archives);
        let supported = self.settings.supported_versions.clone();
        let support = self.framework.support_containers();

        let (containers, manifest) = tokio::task::spawn_blocking(move || {
            let contents = PackageContents::open(&package.source, &archives);
            let outcome = pipeline.prepare(&package.source, &contents)?;
            let source = outcome.deploy_source(&package.source);
            let contents = PackageContents::open(&source, &archives);

            let manifest = contents.manifest()?;
            if let Some(supported) = &supported {
                manifest.check_framework_version(supported)?;
            }
            let containers = assembler.assemble(&contents, &manifest, support)?;
            Ok::<_, HostError>((containers, manifest))
        })
        .await
        .map_err(|e| HostError::Internal(format!("assembly task failed: {e}")))??;

        debug!("{} assembled with {} containers", app.name(), containers.len());
        app.set_containers(containers)?;

        if !self.framework.deploy(Arc::clone(&app)).await? {
            return Ok(false);
        }
        app.set_state(LifecycleState::Configured);

        let start_class = manifest.require_start_class(app.name())?;
        debug!("{} launches {}", app.name(), start_class);
        let entry_point = self.framework.load_entry_point(&app).await?;
        app.set_state(LifecycleState::Starting);
        let launch = LaunchContext::new(Arc::clone(&app), &self.settings.app_args);
        entry::invoke(entry_point, launch).await?;

        app.signal(ReadySignal::ModuleStarted);
        app.set_state(LifecycleState::Started);
        info!("{} started", app.name());
        Ok(true)
    }

    /// Wait on the readiness gate, bounded by the readiness timeout.
    ///
    /// A timeout is logged and otherwise ignored. Returns whether the
    /// package became ready in time.
    pub async fn post_deploy(&self, app: &HostedApplication) -> bool {
        let ready = app.gate().wait(self.settings.readiness_timeout).await;
        if !ready {
            warn!(
                "{} did not report ready within {:?} ({} signal(s) outstanding), continuing",
                app.name(),
                self.settings.readiness_timeout,
                app.gate().remaining()
            );
        }
        ready
    }

    /// Uninstall `app`. The teardown runs once no matter how many callers
    /// race; only the first gets `true`.
    pub async fn uninstall(&self, app: &Arc<HostedApplication>) -> bool {
        if !app.mark_uninstalled() {
            return false;
        }

        app.set_state(LifecycleState::Stopping);
        app.gate().release_all();

        let failed = app.hooks().call_all();
        if failed > 0 {
            warn!("{} shutdown hook(s) of {} failed", failed, app.name());
        }

        let configs = app.configurations();
        join_all(configs.iter().map(|config| config.stop())).await;

        if let Err(e) = self.framework.undeploy(app).await {
            warn!("Failed to undeploy {}: {}", app.name(), e);
        }

        let was_active = self
            .active
            .lock()
            .ok()
            .map(|mut active| {
                let same = active.as_ref().is_some_and(|a| Arc::ptr_eq(a, app));
                if same {
                    *active = None;
                }
                same
            })
            .unwrap_or(false);
        if was_active {
            self.slot.release(app.name());
        }

        app.set_state(LifecycleState::Uninstalled);
        self.audit
            .log(
                "package.uninstalled",
                &serde_json::json!({ "name": app.name(), "instance_id": app.instance_id() }),
            )
            .await;
        info!("Uninstalled {}", app.name());
        true
    }

    /// Run the active package's shutdown hooks; returns how many failed
    pub fn call_shutdown_hooks(&self) -> usize {
        self.active()
            .map(|app| app.hooks().call_all())
            .unwrap_or(0)
    }

    /// Host shutdown: configuration units stay in place for the next
    /// activation to purge
    pub async fn shutdown(&self) {
        self.config.units.begin_shutdown();
        if let Some(app) = self.active() {
            self.uninstall(&app).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::entry::EntryPointError;
    use crate::package::PackageSource;
    use crate::reconcile::{MemoryConfigurationStore, TomlModelSerializer};
    use crate::thin::ThinRequest;
    use std::fs;
    use std::path::Path;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use tempfile::TempDir;

    struct NoThinner;

    impl Thinner for NoThinner {
        fn thin(&self, request: &ThinRequest<'_>, _store: &LibraryStore) -> HostResult<()> {
            Err(HostError::Thinning {
                source_archive: request.source.to_path_buf(),
                reason: "not expected".to_string(),
            })
        }
    }

    struct NoArchives;

    impl ArchiveReader for NoArchives {
        fn read_entry(&self, _archive: &Path, _entry: &str) -> HostResult<Option<Vec<u8>>> {
            Ok(None)
        }

        fn list_entries(&self, _archive: &Path, _prefix: &str) -> HostResult<Vec<String>> {
            Ok(vec![])
        }
    }

    struct Fails;

    impl EntryPoint for Fails {
        fn main(&self, _launch: &LaunchContext) -> Result<(), EntryPointError> {
            Err(EntryPointError::Other("boom".to_string()))
        }
    }

    struct Ready;

    impl EntryPoint for Ready {
        fn main(&self, launch: &LaunchContext) -> Result<(), EntryPointError> {
            launch.signal_ready();
            Ok(())
        }
    }

    struct Framework {
        entry: Arc<dyn EntryPoint>,
    }

    #[async_trait]
    impl HostingFramework for Framework {
        fn support_containers(&self) -> Vec<ContainerInfo> {
            vec![]
        }

        async fn deploy(&self, _app: Arc<HostedApplication>) -> HostResult<bool> {
            Ok(true)
        }

        async fn load_entry_point(&self, _app: &HostedApplication) -> HostResult<Arc<dyn EntryPoint>> {
            Ok(Arc::clone(&self.entry))
        }

        async fn undeploy(&self, _app: &HostedApplication) -> HostResult<()> {
            Ok(())
        }
    }

    fn host(dir: &TempDir, entry: Arc<dyn EntryPoint>) -> Arc<HostOrchestrator> {
        let mut settings = HostSettings::rooted_at(dir.path());
        settings.readiness_timeout = Duration::from_millis(50);
        Arc::new(HostOrchestrator::new(
            settings,
            HostServices {
                framework: Arc::new(Framework { entry }),
                thinner: Arc::new(NoThinner),
                archives: Arc::new(NoArchives),
                persisted: Arc::new(MemoryConfigurationStore::new()),
                serializer: Arc::new(TomlModelSerializer),
                drivers: DriverRegistry::new(),
            },
        ))
    }

    fn loose_package(dir: &TempDir, name: &str) -> HostedPackage {
        let root = dir.path().join(name);
        fs::create_dir_all(root.join("BOOT-INF/classes")).unwrap();
        fs::create_dir_all(root.join("META-INF")).unwrap();
        fs::write(root.join("META-INF/MANIFEST.MF"), "Start-Class: demo.App\n").unwrap();
        HostedPackage::new(name, PackageSource::Loose(root))
    }

    /// Registers one counting and one failing shutdown hook
    struct Hooked {
        calls: Arc<AtomicUsize>,
    }

    impl EntryPoint for Hooked {
        fn main(&self, launch: &LaunchContext) -> Result<(), EntryPointError> {
            let calls = Arc::clone(&self.calls);
            launch.add_shutdown_hook("count", move || {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
            launch.add_shutdown_hook("fail", || Err(HostError::Internal("hook failed".into())));
            launch.signal_ready();
            Ok(())
        }
    }

    #[tokio::test]
    async fn install_requires_activation() {
        let dir = TempDir::new().unwrap();
        let host = host(&dir, Arc::new(Ready));
        assert!(matches!(
            host.install(loose_package(&dir, "orders")),
            Err(HostError::User(_))
        ));
    }

    #[tokio::test]
    async fn successful_install_reaches_started() {
        let dir = TempDir::new().unwrap();
        let host = host(&dir, Arc::new(Ready));
        host.activate().await.unwrap();

        let handle = host.install(loose_package(&dir, "orders")).unwrap();
        let app = Arc::clone(handle.application());
        assert!(handle.wait().await.unwrap());

        assert_eq!(app.state(), LifecycleState::Started);
        assert_eq!(app.containers().len(), 1);
        assert!(host.post_deploy(&app).await);
    }

    #[tokio::test]
    async fn failed_entry_point_uninstalls_and_frees_slot() {
        let dir = TempDir::new().unwrap();
        let host = host(&dir, Arc::new(Fails));
        host.activate().await.unwrap();

        let handle = host.install(loose_package(&dir, "orders")).unwrap();
        let app = Arc::clone(handle.application());
        let err = handle.wait().await.unwrap_err();

        assert!(matches!(err, HostError::InvocationFailure(msg) if msg == "boom"));
        assert_eq!(app.state(), LifecycleState::Uninstalled);
        assert!(host.active().is_none());
        // Released gate never blocks
        assert!(host.post_deploy(&app).await);
        assert!(!host.uninstall(&app).await);

        let next = host.install(loose_package(&dir, "billing")).unwrap();
        assert!(next.wait().await.is_err());
    }

    #[tokio::test]
    async fn activate_runs_once() {
        let dir = TempDir::new().unwrap();
        let host = host(&dir, Arc::new(Ready));
        assert_eq!(host.activate().await.unwrap(), 0);
        assert_eq!(host.activate().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn missing_start_class_fails_and_uninstalls() {
        let dir = TempDir::new().unwrap();
        let host = host(&dir, Arc::new(Ready));
        host.activate().await.unwrap();

        let package = loose_package(&dir, "orders");
        fs::remove_file(package.source.path().join("META-INF/MANIFEST.MF")).unwrap();

        let handle = host.install(package).unwrap();
        let app = Arc::clone(handle.application());
        let err = handle.wait().await.unwrap_err();

        assert!(matches!(err, HostError::ManifestInvalid { ref package, .. } if package == "orders"));
        assert_eq!(app.state(), LifecycleState::Uninstalled);
        assert!(host.active().is_none());
    }

    #[tokio::test]
    async fn same_name_install_rejected_while_installing() {
        let dir = TempDir::new().unwrap();
        let host = host(&dir, Arc::new(Ready));
        host.activate().await.unwrap();

        let first = host.install(loose_package(&dir, "orders")).unwrap();
        let again = host.install(loose_package(&dir, "orders"));
        assert!(matches!(
            again,
            Err(HostError::OnlyOneInstanceAllowed { ref active, ref requested })
                if active == "orders" && requested == "orders"
        ));

        let app = Arc::clone(first.application());
        assert!(first.wait().await.unwrap());
        assert!(Arc::ptr_eq(&host.active().unwrap(), &app));
    }

    #[tokio::test]
    async fn same_name_install_replaces_started_package() {
        let dir = TempDir::new().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let host = host(
            &dir,
            Arc::new(Hooked {
                calls: Arc::clone(&calls),
            }),
        );
        host.activate().await.unwrap();

        let first = host.install(loose_package(&dir, "orders")).unwrap();
        let previous = Arc::clone(first.application());
        assert!(first.wait().await.unwrap());

        let second = host.install(loose_package(&dir, "orders")).unwrap();
        let current = Arc::clone(second.application());
        assert!(second.wait().await.unwrap());

        assert_eq!(previous.state(), LifecycleState::Uninstalled);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(current.state(), LifecycleState::Started);
        assert!(Arc::ptr_eq(&host.active().unwrap(), &current));

        // Replacing the previous instance must not free the slot
        assert!(matches!(
            host.install(loose_package(&dir, "billing")),
            Err(HostError::OnlyOneInstanceAllowed { .. })
        ));
    }

    #[tokio::test]
    async fn shutdown_hooks_of_active_package_run_once() {
        let dir = TempDir::new().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let host = host(
            &dir,
            Arc::new(Hooked {
                calls: Arc::clone(&calls),
            }),
        );
        host.activate().await.unwrap();
        assert_eq!(host.call_shutdown_hooks(), 0);

        let handle = host.install(loose_package(&dir, "orders")).unwrap();
        assert!(handle.wait().await.unwrap());

        assert_eq!(host.call_shutdown_hooks(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        assert_eq!(host.call_shutdown_hooks(), 0);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    /// Records the ambient package name seen by the entry point
    struct SeesContext {
        seen: Arc<std::sync::Mutex<Option<(String, u64)>>>,
    }

    impl EntryPoint for SeesContext {
        fn main(&self, launch: &LaunchContext) -> Result<(), EntryPointError> {
            let current = crate::lifecycle::current_context().map(|c| (c.name, c.instance_id));
            *self.seen.lock().unwrap() = current;
            launch.signal_ready();
            Ok(())
        }
    }

    #[tokio::test]
    async fn entry_point_runs_under_package_context() {
        let dir = TempDir::new().unwrap();
        let seen = Arc::new(std::sync::Mutex::new(None));
        let host = host(
            &dir,
            Arc::new(SeesContext {
                seen: Arc::clone(&seen),
            }),
        );
        host.activate().await.unwrap();

        let handle = host.install(loose_package(&dir, "orders")).unwrap();
        let app = Arc::clone(handle.application());
        assert!(handle.wait().await.unwrap());

        let seen = seen.lock().unwrap().clone();
        assert_eq!(seen, Some(("orders".to_string(), app.instance_id())));
        assert!(crate::lifecycle::current_context().is_none());
    }
}
