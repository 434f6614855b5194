//! End-to-end bundle lifecycle against an in-process runtime.

use async_trait::async_trait;
use hyperos_core::{
    BundleManager, CoreError, ErrorKind, InstallerImage, MachineKind, MachineProfile,
    MachineState, ManagerConfig, ProfileRequest, StaticInstaller,
};
use hyperos_vm::{
    BootMode, RuntimeEvent, RuntimeSession, StopReason, VmConfiguration, VmError, VmRuntime, GIB,
};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::SystemTime;

/// Runtime double: records every start and replays scripted events.
#[derive(Default)]
struct FakeRuntime {
    events: Vec<RuntimeEvent>,
    reject: Option<String>,
    fail_start: Option<String>,
    starts: Mutex<Vec<VmConfiguration>>,
}

impl FakeRuntime {
    fn with_events(events: Vec<RuntimeEvent>) -> Self {
        Self {
            events,
            ..Default::default()
        }
    }

    fn start_count(&self) -> usize {
        self.starts.lock().unwrap().len()
    }

    fn last_start(&self) -> VmConfiguration {
        self.starts.lock().unwrap().last().cloned().unwrap()
    }
}

#[async_trait]
impl VmRuntime for FakeRuntime {
    fn validate(&self, _config: &VmConfiguration) -> hyperos_vm::Result<()> {
        match &self.reject {
            Some(reason) => Err(VmError::Config(reason.clone())),
            None => Ok(()),
        }
    }

    async fn start(&self, config: &VmConfiguration) -> hyperos_vm::Result<RuntimeSession> {
        self.starts.lock().unwrap().push(config.clone());
        if let Some(reason) = &self.fail_start {
            return Err(VmError::Start(reason.clone()));
        }

        let (tx, session) = RuntimeSession::channel(self.events.len().max(1));
        for event in &self.events {
            tx.send(event.clone()).await.unwrap();
        }
        Ok(session)
    }
}

struct Fixture {
    _tmp: tempfile::TempDir,
    root: PathBuf,
    iso: PathBuf,
    manager: BundleManager,
}

impl Fixture {
    async fn new(host_cpus: usize) -> Self {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("VirtualMachines");
        let iso = tmp.path().join("install.iso");
        tokio::fs::write(&iso, b"installer image").await.unwrap();

        let manager =
            BundleManager::new(ManagerConfig::new(&root).with_host_cpus(host_cpus)).unwrap();
        Self {
            _tmp: tmp,
            root,
            iso,
            manager,
        }
    }

    fn installer(&self) -> StaticInstaller {
        StaticInstaller::new(InstallerImage::new(&self.iso))
    }

    fn bundle_dir(&self, name: &str) -> PathBuf {
        self.root.join(format!("{name}.bundle"))
    }
}

fn linux(name: &str) -> MachineProfile {
    MachineProfile::preset(MachineKind::Linux, name).unwrap()
}

/// Names, sizes, contents and modification times of every bundle file.
async fn snapshot(dir: &Path) -> BTreeMap<String, (Vec<u8>, SystemTime)> {
    let mut files = BTreeMap::new();
    let mut entries = tokio::fs::read_dir(dir).await.unwrap();
    while let Some(entry) = entries.next_entry().await.unwrap() {
        let metadata = entry.metadata().await.unwrap();
        let name = entry.file_name().to_string_lossy().into_owned();
        let contents = if name == "Disk.img" {
            Vec::new()
        } else {
            tokio::fs::read(entry.path()).await.unwrap()
        };
        files.insert(name, (contents, metadata.modified().unwrap()));
    }
    files
}

#[tokio::test]
async fn test_first_start_installs() {
    let fx = Fixture::new(8).await;
    let runtime = FakeRuntime::default();

    let machine = fx
        .manager
        .start_machine(linux("demo"), &fx.installer(), &runtime)
        .await
        .unwrap();
    assert_eq!(machine.state(), MachineState::Running);

    let disk = tokio::fs::metadata(fx.bundle_dir("demo").join("Disk.img"))
        .await
        .unwrap();
    assert_eq!(disk.len(), 15 * GIB);
    assert!(fx.bundle_dir("demo").join("MachineIdentifier").is_file());
    assert!(fx.bundle_dir("demo").join("NVRAM").is_file());

    let config = runtime.last_start();
    assert_eq!(config.cpu_count, 7);
    assert_eq!(config.memory_bytes, 16 * GIB);
    assert_eq!(config.topology.mode, BootMode::Install);
    assert_eq!(config.topology.storage.len(), 2);
    assert_eq!(config.topology.storage[0].path, fx.iso);
    assert!(config.topology.storage[0].read_only);
    assert_eq!(
        config.topology.storage[1].path,
        fx.bundle_dir("demo").join("Disk.img")
    );
}

#[tokio::test]
async fn test_oversized_request_is_budgeted() {
    let fx = Fixture::new(8).await;
    let request = ProfileRequest {
        cpu_count: Some(16),
        memory_bytes: Some(64 * GIB),
        primary_disk_bytes: Some(20 * GIB),
        ..Default::default()
    };
    let profile = MachineProfile::new(MachineKind::Linux, "demo", request).unwrap();

    let machine = fx
        .manager
        .ensure_bundle(profile, &fx.installer())
        .await
        .unwrap();
    assert_eq!(machine.state(), MachineState::Ready(BootMode::Install));
    assert!(machine.needs_install());

    let disk = tokio::fs::metadata(fx.bundle_dir("demo").join("Disk.img"))
        .await
        .unwrap();
    assert_eq!(disk.len(), 20 * GIB);

    let config = machine.configuration(fx.manager.budgeter()).await.unwrap();
    assert_eq!(config.cpu_count, 7);
    assert_eq!(config.memory_bytes, 64 * GIB);
}

#[tokio::test]
async fn test_second_start_boots_without_writes() {
    let fx = Fixture::new(8).await;
    let first = fx
        .manager
        .ensure_bundle(linux("demo"), &fx.installer())
        .await
        .unwrap();
    let before = snapshot(&fx.bundle_dir("demo")).await;

    let runtime = FakeRuntime::default();
    let machine = fx
        .manager
        .start_machine(linux("demo"), &StaticInstaller::none(), &runtime)
        .await
        .unwrap();

    assert_eq!(machine.identity(), first.identity());
    let config = runtime.last_start();
    assert_eq!(config.topology.mode, BootMode::Boot);
    assert_eq!(config.topology.storage.len(), 1);
    assert_eq!(config.identity, first.identity());
    assert_eq!(snapshot(&fx.bundle_dir("demo")).await, before);
}

#[tokio::test]
async fn test_no_installer_fails_before_runtime() {
    let fx = Fixture::new(8).await;
    let runtime = FakeRuntime::default();

    let err = fx
        .manager
        .start_machine(linux("demo"), &StaticInstaller::none(), &runtime)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Precondition);
    assert_eq!(runtime.start_count(), 0);

    // Partial bundle is left behind and refuses to boot.
    assert!(fx.bundle_dir("demo").is_dir());
    assert!(!fx.bundle_dir("demo").join("MachineIdentifier").exists());

    let err = fx
        .manager
        .start_machine(linux("demo"), &fx.installer(), &runtime)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(runtime.start_count(), 0);
}

#[tokio::test]
async fn test_installer_digest_mismatch() {
    let fx = Fixture::new(8).await;
    let installer = StaticInstaller::new(InstallerImage::new(&fx.iso).with_sha256("00".repeat(32)));

    let err = fx
        .manager
        .provision(linux("demo"), &installer)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Precondition);
}

#[tokio::test]
async fn test_provision_existing_bundle() {
    let fx = Fixture::new(8).await;
    fx.manager
        .provision(linux("demo"), &fx.installer())
        .await
        .unwrap();
    let identity_path = fx.bundle_dir("demo").join("MachineIdentifier");
    let identity = tokio::fs::read(&identity_path).await.unwrap();

    let err = fx
        .manager
        .provision(linux("demo"), &fx.installer())
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::AlreadyExists(_)));
    assert_eq!(tokio::fs::read(&identity_path).await.unwrap(), identity);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_provisioning_has_one_winner() {
    let fx = Fixture::new(8).await;
    let installer = fx.installer();

    let (a, b) = tokio::join!(
        fx.manager.provision(linux("demo"), &installer),
        fx.manager.provision(linux("demo"), &installer),
    );

    let (winner, loser) = match (a, b) {
        (Ok(machine), Err(e)) | (Err(e), Ok(machine)) => (machine, e),
        (a, b) => panic!("expected one winner, got {a:?} and {b:?}"),
    };
    assert_eq!(loser.kind(), ErrorKind::AlreadyExists);

    let loaded = fx.manager.load(linux("demo")).await.unwrap();
    assert_eq!(loaded.identity(), winner.identity());
}

#[tokio::test]
async fn test_missing_identity_fails_closed() {
    let fx = Fixture::new(8).await;
    fx.manager
        .provision(linux("demo"), &fx.installer())
        .await
        .unwrap();
    tokio::fs::remove_file(fx.bundle_dir("demo").join("MachineIdentifier"))
        .await
        .unwrap();
    let before = snapshot(&fx.bundle_dir("demo")).await;

    let runtime = FakeRuntime::default();
    let err = fx
        .manager
        .start_machine(linux("demo"), &fx.installer(), &runtime)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(runtime.start_count(), 0);
    assert_eq!(snapshot(&fx.bundle_dir("demo")).await, before);
}

#[tokio::test]
async fn test_missing_firmware_store_fails_closed() {
    let fx = Fixture::new(8).await;
    fx.manager
        .provision(linux("demo"), &fx.installer())
        .await
        .unwrap();
    tokio::fs::remove_file(fx.bundle_dir("demo").join("NVRAM"))
        .await
        .unwrap();

    let err = fx.manager.load(linux("demo")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_corrupt_identity() {
    let fx = Fixture::new(8).await;
    fx.manager
        .provision(linux("demo"), &fx.installer())
        .await
        .unwrap();
    tokio::fs::write(
        fx.bundle_dir("demo").join("MachineIdentifier"),
        [0x8f, 0x00, 0xff, 0x13, 0x37],
    )
    .await
    .unwrap();

    let before = snapshot(&fx.bundle_dir("demo")).await;

    let err = fx.manager.load(linux("demo")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::CorruptData);
    assert_eq!(snapshot(&fx.bundle_dir("demo")).await, before);
}

#[tokio::test]
async fn test_runtime_rejects_configuration() {
    let fx = Fixture::new(8).await;
    let runtime = FakeRuntime {
        reject: Some("too many displays".into()),
        ..Default::default()
    };

    let mut machine = fx
        .manager
        .ensure_bundle(linux("demo"), &fx.installer())
        .await
        .unwrap();
    let err = fx.manager.start(&mut machine, &runtime).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Config);
    assert_eq!(machine.state(), MachineState::Stopped);
    assert_eq!(runtime.start_count(), 0);
}

#[tokio::test]
async fn test_start_failure_stops_machine() {
    let fx = Fixture::new(8).await;
    let runtime = FakeRuntime {
        fail_start: Some("hypervisor unavailable".into()),
        ..Default::default()
    };

    let mut machine = fx
        .manager
        .ensure_bundle(linux("demo"), &fx.installer())
        .await
        .unwrap();
    let err = fx.manager.start(&mut machine, &runtime).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Runtime);
    assert_eq!(machine.state(), MachineState::Stopped);
    assert!(matches!(machine.stop_reason(), Some(StopReason::Error(_))));

    // Stopped is terminal.
    let err = fx.manager.start(&mut machine, &runtime).await.unwrap_err();
    assert!(matches!(err, CoreError::InvalidState { .. }));
    assert_eq!(runtime.start_count(), 1);
}

#[tokio::test]
async fn test_wait_survives_peripheral_disconnect() {
    let fx = Fixture::new(8).await;
    let runtime = FakeRuntime::with_events(vec![
        RuntimeEvent::PeripheralDisconnected {
            device: "usb-mouse".into(),
            error: "unplugged".into(),
        },
        RuntimeEvent::GuestStopped,
    ]);

    let mut machine = fx
        .manager
        .start_machine(linux("demo"), &fx.installer(), &runtime)
        .await
        .unwrap();

    let reason = machine.wait().await.unwrap();
    assert_eq!(reason, StopReason::GuestShutdown);
    assert_eq!(machine.state(), MachineState::Stopped);
    assert_eq!(machine.stop_reason(), Some(&StopReason::GuestShutdown));
}

#[tokio::test]
async fn test_wait_reports_runtime_error() {
    let fx = Fixture::new(8).await;
    let runtime = FakeRuntime::with_events(vec![RuntimeEvent::StoppedWithError(
        "guest triple fault".into(),
    )]);

    let mut machine = fx
        .manager
        .start_machine(linux("demo"), &fx.installer(), &runtime)
        .await
        .unwrap();

    let reason = machine.wait().await.unwrap();
    assert_eq!(reason, StopReason::Error("guest triple fault".into()));
    assert!(!reason.is_clean());
    assert_eq!(machine.state(), MachineState::Stopped);
}

#[tokio::test]
async fn test_auxiliary_disks_attached_after_primary() {
    let fx = Fixture::new(8).await;
    fx.manager
        .provision(linux("demo"), &fx.installer())
        .await
        .unwrap();
    tokio::fs::write(fx.bundle_dir("demo").join("data.img"), b"")
        .await
        .unwrap();

    let request = ProfileRequest {
        auxiliary_disks: vec![PathBuf::from("data.img")],
        ..Default::default()
    };
    let profile = MachineProfile::new(MachineKind::Linux, "demo", request).unwrap();

    let runtime = FakeRuntime::default();
    fx.manager
        .start_machine(profile, &StaticInstaller::none(), &runtime)
        .await
        .unwrap();

    let storage = runtime.last_start().topology.storage;
    assert_eq!(storage.len(), 2);
    assert_eq!(storage[0].path, fx.bundle_dir("demo").join("Disk.img"));
    assert_eq!(storage[1].path, fx.bundle_dir("demo").join("data.img"));
    assert!(!storage[1].read_only);
}

#[tokio::test]
async fn test_missing_auxiliary_disk() {
    let fx = Fixture::new(8).await;
    fx.manager
        .provision(linux("demo"), &fx.installer())
        .await
        .unwrap();

    let request = ProfileRequest {
        auxiliary_disks: vec![PathBuf::from("gone.img")],
        ..Default::default()
    };
    let profile = MachineProfile::new(MachineKind::Linux, "demo", request).unwrap();

    let runtime = FakeRuntime::default();
    let err = fx
        .manager
        .start_machine(profile, &StaticInstaller::none(), &runtime)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(runtime.start_count(), 0);
}

#[tokio::test]
async fn test_auxiliary_disk_cannot_alias_bundle_files() {
    let fx = Fixture::new(8).await;
    fx.manager
        .provision(linux("demo"), &fx.installer())
        .await
        .unwrap();

    let runtime = FakeRuntime::default();
    for alias in ["Disk.img", "NVRAM", "MachineIdentifier"] {
        let request = ProfileRequest {
            auxiliary_disks: vec![PathBuf::from(alias)],
            ..Default::default()
        };
        let profile = MachineProfile::new(MachineKind::Linux, "demo", request).unwrap();

        let err = fx
            .manager
            .start_machine(profile, &StaticInstaller::none(), &runtime)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Precondition, "{alias}");
    }
    assert_eq!(runtime.start_count(), 0);
}

#[tokio::test]
async fn test_auxiliary_disk_cannot_alias_installer() {
    let fx = Fixture::new(8).await;
    let request = ProfileRequest {
        auxiliary_disks: vec![fx.iso.clone()],
        ..Default::default()
    };
    let profile = MachineProfile::new(MachineKind::Linux, "demo", request).unwrap();

    let runtime = FakeRuntime::default();
    let err = fx
        .manager
        .start_machine(profile, &fx.installer(), &runtime)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Config);
    assert_eq!(runtime.start_count(), 0);
}
