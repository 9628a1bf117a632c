use async_trait::async_trait;
use fathost::assemble::{ContainerInfo, ContainerKind};
use fathost::config::HostSettings;
use fathost::lifecycle::{
    Driver, DriverParams, DriverRegistry, EntryPoint, EntryPointError, HostOrchestrator,
    HostServices, HostedApplication, HostingFramework, LaunchContext, LifecycleState,
};
use fathost::package::{ArchiveReader, HostedPackage, PackageSource};
use fathost::reconcile::{MemoryConfigurationStore, ServerConfigRequest, TomlModelSerializer};
use fathost::store::{LibraryReference, LibraryStore, INDEX_ENTRY};
use fathost::thin::{ThinRequest, Thinner};
use fathost::{HostError, HostResult};
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

struct NoThinner;

impl Thinner for NoThinner {
    fn thin(&self, request: &ThinRequest<'_>, _store: &LibraryStore) -> HostResult<()> {
        Err(HostError::Thinning {
            source_archive: request.source.to_path_buf(),
            reason: "loose packages only".to_string(),
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

/// Starts one server on port 8080, optionally reporting ready
struct WebApp {
    ready: bool,
}

impl EntryPoint for WebApp {
    fn main(&self, launch: &LaunchContext) -> Result<(), EntryPointError> {
        launch
            .start_server(ServerConfigRequest::new(8080), "recording", None)
            .map_err(|e| EntryPointError::Other(e.to_string()))?;
        if self.ready {
            launch.signal_ready();
        }
        Ok(())
    }
}

/// Does nothing and never reports ready
struct Quiet;

impl EntryPoint for Quiet {
    fn main(&self, _launch: &LaunchContext) -> Result<(), EntryPointError> {
        Ok(())
    }
}

#[derive(Default)]
struct DriverLog {
    started: AtomicUsize,
    stopped: AtomicUsize,
    params: Mutex<Vec<DriverParams>>,
}

struct RecordingDriver {
    log: Arc<DriverLog>,
}

#[async_trait]
impl Driver for RecordingDriver {
    async fn start(&self) -> HostResult<()> {
        self.log.started.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&self) -> HostResult<()> {
        self.log.stopped.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct Framework {
    entry: Arc<dyn EntryPoint>,
    undeployed: AtomicUsize,
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
        self.undeployed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct Fixture {
    host: Arc<HostOrchestrator>,
    framework: Arc<Framework>,
    drivers: Arc<DriverLog>,
}

fn fixture(settings: HostSettings, entry: Arc<dyn EntryPoint>) -> Fixture {
    let framework = Arc::new(Framework {
        entry,
        undeployed: AtomicUsize::new(0),
    });
    let drivers = Arc::new(DriverLog::default());

    let log = Arc::clone(&drivers);
    let registry = DriverRegistry::new().register(
        "recording",
        Arc::new(move |params: &DriverParams| -> HostResult<Arc<dyn Driver>> {
            if let Ok(mut seen) = log.params.lock() {
                seen.push(params.clone());
            }
            Ok(Arc::new(RecordingDriver {
                log: Arc::clone(&log),
            }))
        }),
    );

    let host = Arc::new(HostOrchestrator::new(
        settings,
        HostServices {
            framework: framework.clone(),
            thinner: Arc::new(NoThinner),
            archives: Arc::new(NoArchives),
            persisted: Arc::new(MemoryConfigurationStore::new()),
            serializer: Arc::new(TomlModelSerializer),
            drivers: registry,
        },
    ));
    Fixture {
        host,
        framework,
        drivers,
    }
}

fn settings(dir: &TempDir) -> HostSettings {
    let mut settings = HostSettings::rooted_at(dir.path());
    settings.readiness_timeout = Duration::from_millis(100);
    settings
}

fn loose_package(dir: &Path, name: &str) -> HostedPackage {
    let root = dir.join("packages").join(name);
    fs::create_dir_all(root.join("BOOT-INF/classes")).unwrap();
    fs::create_dir_all(root.join("META-INF")).unwrap();
    fs::write(root.join("META-INF/MANIFEST.MF"), "Start-Class: demo.App\n").unwrap();
    HostedPackage::new(name, PackageSource::Loose(root))
}

/// Loose package whose one library is already cached in the writable root
fn indexed_package(dir: &Path, settings: &HostSettings, name: &str) -> HostedPackage {
    let library = dir.join(format!("{name}-core.jar"));
    fs::write(&library, name.as_bytes()).unwrap();
    let store = LibraryStore::new(settings.library_root(), None, settings.derived_root());
    let reference = store
        .store_file(&library, &format!("BOOT-INF/lib/{name}-core.jar"))
        .unwrap();

    let package = loose_package(dir, name);
    fs::write(package.source.path().join(INDEX_ENTRY), format!("{reference}\n")).unwrap();
    package
}

/// File names of libraries that own a raw-container cache
fn derived_libraries(settings: &HostSettings) -> Vec<String> {
    let raw = settings.derived_root().join("raw");
    let Ok(parents) = fs::read_dir(raw) else {
        return vec![];
    };
    let mut names = vec![];
    for parent in parents {
        for entry in fs::read_dir(parent.unwrap().path()).unwrap() {
            names.push(entry.unwrap().file_name().to_string_lossy().into_owned());
        }
    }
    names.sort();
    names
}

#[tokio::test]
async fn shared_root_resolution_leaves_writable_root_untouched() {
    let dir = TempDir::new().unwrap();
    let shared = dir.path().join("shared");
    let reference = LibraryReference::new("BOOT-INF/lib/app-core-1.0.jar", "0a1b2c3d4e5f");
    let cached = LibraryStore::location(&shared, &reference).unwrap();
    fs::create_dir_all(cached.parent().unwrap()).unwrap();
    fs::write(&cached, b"core").unwrap();

    let mut settings = settings(&dir);
    settings.shared_library_root = Some(shared);
    let writable = settings.library_root();
    let derived_root = settings.derived_root();
    let fx = fixture(settings, Arc::new(Quiet));
    fx.host.activate().await.unwrap();

    let package = loose_package(dir.path(), "orders");
    fs::write(package.source.path().join(INDEX_ENTRY), format!("{reference}\n")).unwrap();

    let handle = fx.host.install(package).unwrap();
    let app = Arc::clone(handle.application());
    assert!(handle.wait().await.unwrap());

    let containers = app.containers();
    assert_eq!(containers.len(), 2);
    assert_eq!(containers[0].kind, ContainerKind::Library);
    assert_eq!(containers[1].kind, ContainerKind::PrimaryClasses);
    assert!(!writable.exists());

    let derived = containers[0].derived.as_ref().unwrap();
    for dir in [&derived.raw_container, &derived.structural_adapt, &derived.overlay] {
        assert!(dir.is_dir());
        assert!(dir.starts_with(&derived_root));
        assert!(dir.ends_with("app-core-1.0.jar"));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_installs_have_one_winner() {
    let dir = TempDir::new().unwrap();
    let settings = settings(&dir);
    let packages = [
        indexed_package(dir.path(), &settings, "orders"),
        indexed_package(dir.path(), &settings, "billing"),
    ];
    let fx = fixture(settings.clone(), Arc::new(Quiet));
    fx.host.activate().await.unwrap();

    let barrier = Arc::new(tokio::sync::Barrier::new(packages.len()));
    let attempts: Vec<_> = packages
        .into_iter()
        .map(|package| {
            let host = Arc::clone(&fx.host);
            let barrier = Arc::clone(&barrier);
            tokio::spawn(async move {
                let name = package.name.clone();
                barrier.wait().await;
                (name, host.install(package))
            })
        })
        .collect();

    let mut winners = vec![];
    let mut losers = vec![];
    for attempt in attempts {
        match attempt.await.unwrap() {
            (name, Ok(handle)) => winners.push((name, handle)),
            (name, Err(err)) => losers.push((name, err)),
        }
    }
    assert_eq!(winners.len(), 1);
    assert_eq!(losers.len(), 1);

    let (winner, handle) = winners.pop().unwrap();
    let (loser, err) = losers.pop().unwrap();
    assert!(matches!(
        err,
        HostError::OnlyOneInstanceAllowed { ref active, ref requested }
            if *active == winner && *requested == loser
    ));
    assert!(handle.wait().await.unwrap());

    // Only the winner's library was resolved into derived caches
    assert_eq!(derived_libraries(&settings), vec![format!("{winner}-core.jar")]);
    assert_eq!(fx.host.active().unwrap().name(), winner);
    assert!(fx.host.units().discover().await.unwrap().is_empty());
}

#[tokio::test]
async fn missing_library_fails_install_without_residue() {
    let dir = TempDir::new().unwrap();
    let fx = fixture(settings(&dir), Arc::new(Quiet));
    fx.host.activate().await.unwrap();

    let package = loose_package(dir.path(), "orders");
    fs::create_dir_all(package.source.path().join("META-INF")).unwrap();
    fs::write(
        package.source.path().join(INDEX_ENTRY),
        "BOOT-INF/lib/gone.jar=ffeeddccbbaa\n",
    )
    .unwrap();

    let handle = fx.host.install(package).unwrap();
    let app = Arc::clone(handle.application());
    let err = handle.wait().await.unwrap_err();

    assert!(matches!(err, HostError::MissingLibrary { ref entry, .. } if entry == "BOOT-INF/lib/gone.jar"));
    assert_eq!(app.state(), LifecycleState::Uninstalled);
    assert!(fx.host.active().is_none());
}

#[tokio::test]
async fn second_package_is_rejected_while_first_is_active() {
    let dir = TempDir::new().unwrap();
    let fx = fixture(settings(&dir), Arc::new(WebApp { ready: true }));
    fx.host.activate().await.unwrap();

    let first = fx.host.install(loose_package(dir.path(), "orders")).unwrap();
    let rejected = fx.host.install(loose_package(dir.path(), "billing"));
    assert!(matches!(
        rejected,
        Err(HostError::OnlyOneInstanceAllowed { ref active, ref requested })
            if active == "orders" && requested == "billing"
    ));

    assert!(first.wait().await.unwrap());
    let active = fx.host.active().unwrap();
    assert_eq!(active.name(), "orders");
    // The rejected package never created a configuration instance
    assert_eq!(fx.drivers.params.lock().unwrap().len(), 1);
    assert_eq!(fx.host.units().discover().await.unwrap().len(), 1);
}

#[tokio::test]
async fn server_unit_follows_package_lifecycle() {
    let dir = TempDir::new().unwrap();
    let fx = fixture(settings(&dir), Arc::new(WebApp { ready: true }));
    fx.host.activate().await.unwrap();

    let handle = fx.host.install(loose_package(dir.path(), "orders")).unwrap();
    let app = Arc::clone(handle.application());
    assert!(handle.wait().await.unwrap());
    assert!(fx.host.post_deploy(&app).await);

    let units = fx.host.units().discover().await.unwrap();
    assert_eq!(units.len(), 1);
    assert_eq!(units[0].tag.instance_id, app.instance_id());
    assert_eq!(fx.drivers.started.load(Ordering::SeqCst), 1);

    let params = fx.drivers.params.lock().unwrap().clone();
    assert_eq!(params[0].port, Some(8080));
    assert_eq!(params[0].config_id, format!("{}-0", app.instance_id()));

    let configs = app.configurations();
    assert_eq!(configs.len(), 1);
    let again = configs[0].configure(
        app.server_model(ServerConfigRequest::new(8080)),
        "recording",
        None,
    );
    assert!(matches!(again, Err(HostError::AlreadyConfigured(_))));

    assert!(fx.host.uninstall(&app).await);
    assert_eq!(app.state(), LifecycleState::Uninstalled);
    assert!(fx.host.units().discover().await.unwrap().is_empty());
    assert_eq!(fx.drivers.stopped.load(Ordering::SeqCst), 1);
    assert_eq!(fx.framework.undeployed.load(Ordering::SeqCst), 1);
    assert!(fx.host.active().is_none());
}

#[tokio::test]
async fn readiness_timeout_is_not_an_error() {
    let dir = TempDir::new().unwrap();
    let fx = fixture(settings(&dir), Arc::new(Quiet));
    fx.host.activate().await.unwrap();

    let handle = fx.host.install(loose_package(dir.path(), "orders")).unwrap();
    let app = Arc::clone(handle.application());
    assert!(handle.wait().await.unwrap());

    assert!(!fx.host.post_deploy(&app).await);
    assert_eq!(app.gate().remaining(), 1);
    assert_eq!(app.state(), LifecycleState::Started);
}

#[tokio::test]
async fn units_left_at_shutdown_are_purged_on_next_activation() {
    let dir = TempDir::new().unwrap();
    {
        let fx = fixture(settings(&dir), Arc::new(WebApp { ready: true }));
        fx.host.activate().await.unwrap();
        let handle = fx.host.install(loose_package(dir.path(), "orders")).unwrap();
        assert!(handle.wait().await.unwrap());

        fx.host.shutdown().await;
        assert!(fx.host.active().is_none());
        assert_eq!(fx.host.units().discover().await.unwrap().len(), 1);
    }

    let restarted = fixture(settings(&dir), Arc::new(Quiet));
    assert_eq!(restarted.host.activate().await.unwrap(), 1);
    assert!(restarted.host.units().discover().await.unwrap().is_empty());
}
