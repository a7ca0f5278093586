use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use ladb_core::{Error, InitResult, PairingRequest, Phase, SessionStatus};
use ladb_daemon::test_utils::{
    fake_bridge_calls, set_fake_devices, write_fake_bridge, FakeBrowser, GOOD_PAIRING_CODE,
};
use ladb_daemon::{BrowseEvent, DiscoveredService, PortDiscovery, ServiceKind};
use serial_test::serial;
use tempfile::TempDir;
use tokio::time::timeout;

use super::*;
use crate::config::{load_preferences, save_preferences, Preferences, TimingSettings};
use crate::debugging::fake::FakeToggle;
use crate::debugging::PlatformToggle;

const WAIT: Duration = Duration::from_secs(15);

struct Fixture {
    _temp: TempDir,
    bin_dir: PathBuf,
    bridge_path: PathBuf,
    paths: AppPaths,
}

impl Fixture {
    fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let bin_dir = temp.path().join("bin");
        std::fs::create_dir_all(&bin_dir).unwrap();
        let bridge_path = write_fake_bridge(&bin_dir);
        let paths = AppPaths::new(temp.path().join("data"));
        Self {
            _temp: temp,
            bin_dir,
            bridge_path,
            paths,
        }
    }

    fn seed_prefs(&self, paired: bool, last_connected_port: Option<u16>) {
        save_preferences(
            &self.paths.state_file,
            &Preferences {
                last_connected_port,
                paired,
            },
        )
        .unwrap();
    }

    fn prefs(&self) -> Preferences {
        load_preferences(&self.paths.state_file)
    }

    fn calls(&self) -> Vec<String> {
        fake_bridge_calls(&self.bin_dir)
    }

    fn spawn(&self, settings: Settings, discovery: PortDiscovery) -> SupervisorHandle {
        self.spawn_with(settings, PlatformToggle::Unmanaged, discovery)
    }

    fn spawn_with<D: DebugToggle + Sync + 'static>(
        &self,
        settings: Settings,
        toggle: D,
        discovery: PortDiscovery,
    ) -> SupervisorHandle {
        super::spawn(
            settings,
            self.paths.clone(),
            self.bridge_path.clone(),
            toggle,
            discovery,
        )
        .unwrap()
    }
}

fn fast_settings() -> Settings {
    let mut settings = Settings::default();
    settings.bridge.grant_command = String::new();
    settings.discovery.enabled = false;
    settings.timing = TimingSettings {
        enable_poll_ms: 10,
        toggle_settle_ms: 1,
        discovery_min_dwell_ms: 0,
        discovery_ceiling_ms: 200,
        discovery_poll_ms: 10,
        start_server_timeout_ms: 5_000,
        connect_timeout_ms: 5_000,
        pair_settle_ms: 50,
        pair_timeout_ms: 5_000,
        kill_server_timeout_ms: 5_000,
        restart_cooldown_ms: 300,
        output_poll_ms: 10,
    };
    settings
}

fn no_discovery() -> PortDiscovery {
    PortDiscovery::new(None)
}

async fn wait_for_status(
    handle: &SupervisorHandle,
    predicate: impl FnMut(&SessionStatus) -> bool,
) -> SessionStatus {
    let mut rx = handle.subscribe_status();
    let status = *timeout(WAIT, rx.wait_for(predicate))
        .await
        .expect("timed out waiting for status")
        .expect("status channel closed");
    status
}

async fn wait_for_output(handle: &SupervisorHandle, needle: &str) -> String {
    let mut rx = handle.subscribe_output();
    let text = timeout(WAIT, rx.wait_for(|text| text.contains(needle)))
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for output {:?}", needle))
        .expect("output channel closed")
        .clone();
    text
}

/// Poll a condition the supervisor can't signal, such as fake bridge calls
/// logged by a child process.
async fn wait_until(mut condition: impl FnMut() -> bool, what: &str) {
    timeout(WAIT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {}", what));
}

fn shell_spawns(calls: &[String]) -> usize {
    calls.iter().filter(|call| call.ends_with("shell")).count()
}

#[tokio::test]
#[serial]
async fn test_spawn_creates_working_dirs() {
    let fixture = Fixture::new();
    assert!(!fixture.paths.files_dir.exists());

    let _handle = fixture.spawn(fast_settings(), no_discovery());

    assert!(fixture.paths.files_dir.is_dir());
    assert!(fixture.paths.cache_dir.is_dir());
}

#[tokio::test]
#[serial]
async fn test_send_command_without_shell_is_noop() {
    let fixture = Fixture::new();
    let handle = fixture.spawn(fast_settings(), no_discovery());

    assert!(!handle.send_command("echo nobody home").await);
    assert_eq!(handle.status(), SessionStatus::default());
    assert!(fixture.calls().is_empty());
}

#[tokio::test]
#[serial]
async fn test_unpaired_device_needs_pairing() {
    let fixture = Fixture::new();
    let handle = fixture.spawn(fast_settings(), no_discovery());

    assert_eq!(handle.start().await, InitResult::NeedsPairing);
    assert_eq!(handle.status().phase, Phase::NeedsPairing);
    assert!(fixture.calls().is_empty());
}

#[tokio::test]
#[serial]
async fn test_no_port_needs_port_then_resume_connects() {
    let fixture = Fixture::new();
    fixture.seed_prefs(true, None);
    set_fake_devices(&fixture.bin_dir, &["localhost:37000"]);
    let handle = fixture.spawn(fast_settings(), no_discovery());

    assert_eq!(handle.start().await, InitResult::NeedsPort);
    assert_eq!(handle.status().phase, Phase::NeedsPort);
    wait_for_output(&handle, "No debug port found").await;

    assert_eq!(handle.resume_with_port(37000).await, InitResult::Success);
    let status = handle.status();
    assert_eq!(status.phase, Phase::Shelling);
    assert!(status.ready);

    assert!(fixture
        .calls()
        .contains(&"connect localhost:37000".to_string()));
    assert_eq!(fixture.prefs().last_connected_port, Some(37000));
    wait_for_output(&handle, "Entered adb shell").await;
}

#[tokio::test]
#[serial]
async fn test_discovered_port_is_used() {
    let fixture = Fixture::new();
    fixture.seed_prefs(true, None);
    set_fake_devices(&fixture.bin_dir, &["emulator-5554", "192.168.1.5:5555"]);

    let browser = Arc::new(FakeBrowser::new());
    let discovery = PortDiscovery::new(Some(IpAddr::V4(Ipv4Addr::new(192, 168, 1, 5))));
    discovery.start(browser.clone()).unwrap();
    browser.emit(BrowseEvent::Resolved(DiscoveredService {
        kind: ServiceKind::Connect,
        port: 38123,
        service_name: "adb-XYZ".to_string(),
        expiration_time: None,
        host_addresses: vec![IpAddr::V4(Ipv4Addr::new(192, 168, 1, 5))],
    }));
    let elected = discovery.clone();
    wait_until(|| elected.best_port() == Some(38123), "port election").await;

    let handle = fixture.spawn(fast_settings(), discovery);

    assert_eq!(handle.start().await, InitResult::Success);
    assert!(fixture
        .calls()
        .contains(&"connect localhost:38123".to_string()));
    wait_until(
        || fixture.calls().contains(&"-s 192.168.1.5:5555 shell".to_string()),
        "device shell",
    )
    .await;
    assert_eq!(fixture.prefs().last_connected_port, Some(38123));
}

#[tokio::test]
#[serial]
async fn test_stuck_resolution_is_cut_off_at_ceiling() {
    let fixture = Fixture::new();
    fixture.seed_prefs(true, Some(37000));
    set_fake_devices(&fixture.bin_dir, &["localhost:37000"]);

    let browser = Arc::new(FakeBrowser::new());
    let discovery = PortDiscovery::new(None);
    discovery.start(browser.clone()).unwrap();
    // Found but never resolved
    browser.emit(BrowseEvent::Found {
        kind: ServiceKind::Connect,
        name: "adb-STUCK".to_string(),
    });
    let pending = discovery.clone();
    wait_until(|| pending.is_resolving(), "pending resolution").await;

    let mut settings = fast_settings();
    settings.timing.discovery_min_dwell_ms = 0;
    settings.timing.discovery_ceiling_ms = 200;
    let handle = fixture.spawn(settings, discovery);

    let started = std::time::Instant::now();
    assert_eq!(handle.start().await, InitResult::Success);
    assert!(started.elapsed() >= Duration::from_millis(200));
    assert!(pending.is_resolving());

    let output = wait_for_output(&handle, "DNS resolver took too long! Skipping...").await;
    assert!(!output.contains("DNS resolver done..."));
}

#[tokio::test]
#[serial]
async fn test_idle_discovery_still_waits_minimum_dwell() {
    let fixture = Fixture::new();
    fixture.seed_prefs(true, Some(37000));
    set_fake_devices(&fixture.bin_dir, &["localhost:37000"]);

    let browser = Arc::new(FakeBrowser::new());
    let discovery = PortDiscovery::new(None);
    discovery.start(browser).unwrap();
    let started_at = discovery.started_at().unwrap();

    let mut settings = fast_settings();
    settings.timing.discovery_min_dwell_ms = 400;
    settings.timing.discovery_ceiling_ms = 5_000;
    let handle = fixture.spawn(settings, discovery);

    assert_eq!(handle.start().await, InitResult::Success);
    assert!(started_at.elapsed() >= Duration::from_millis(400));

    let output = wait_for_output(&handle, "DNS resolver done...").await;
    assert!(output.contains("Awaiting DNS resolver..."));
    assert!(!output.contains("took too long"));
}

#[tokio::test]
#[serial]
async fn test_empty_device_list_drops_remembered_port() {
    let fixture = Fixture::new();
    fixture.seed_prefs(true, Some(37000));
    let handle = fixture.spawn(fast_settings(), no_discovery());

    assert_eq!(handle.start().await, InitResult::NeedsPort);
    assert_eq!(fixture.prefs().last_connected_port, None);
    assert!(fixture.prefs().paired);
    wait_for_output(&handle, "No devices found after connect").await;
}

#[tokio::test]
#[serial]
async fn test_connect_timeout_is_failure() {
    let fixture = Fixture::new();
    fixture.seed_prefs(true, Some(37000));
    std::fs::write(fixture.bin_dir.join("connect_hangs"), "").unwrap();
    let mut settings = fast_settings();
    settings.timing.connect_timeout_ms = 200;
    let handle = fixture.spawn(settings, no_discovery());

    assert_eq!(handle.start().await, InitResult::Failure);
    assert_eq!(handle.status().phase, Phase::Failed);
    wait_for_output(&handle, "Your device didn't connect").await;
}

#[tokio::test]
#[serial]
async fn test_pairing_with_good_code_continues_to_shell() {
    let fixture = Fixture::new();
    fixture.seed_prefs(false, Some(37000));
    set_fake_devices(&fixture.bin_dir, &["localhost:37000"]);
    let handle = fixture.spawn(fast_settings(), no_discovery());

    assert_eq!(handle.start().await, InitResult::NeedsPairing);

    let paired = handle
        .pair(PairingRequest::new(Some(41000), GOOD_PAIRING_CODE))
        .await
        .unwrap();
    assert!(paired);
    assert!(fixture.prefs().paired);

    let status = wait_for_status(&handle, |status| status.ready).await;
    assert_eq!(status.phase, Phase::Shelling);
    assert!(fixture
        .calls()
        .contains(&"pair localhost:41000".to_string()));
}

#[tokio::test]
#[serial]
async fn test_pairing_with_wrong_code_stays_unpaired() {
    let fixture = Fixture::new();
    let handle = fixture.spawn(fast_settings(), no_discovery());
    assert_eq!(handle.start().await, InitResult::NeedsPairing);

    let paired = handle
        .pair(PairingRequest::new(Some(41000), "000000"))
        .await
        .unwrap();

    assert!(!paired);
    assert_eq!(handle.status().phase, Phase::NeedsPairing);
    assert!(!fixture.prefs().paired);

    // A fresh code may be tried straight away
    let paired = handle
        .pair(PairingRequest::new(Some(41000), GOOD_PAIRING_CODE))
        .await
        .unwrap();
    assert!(paired);
}

#[tokio::test]
#[serial]
async fn test_pairing_without_port_is_rejected() {
    let fixture = Fixture::new();
    let handle = fixture.spawn(fast_settings(), no_discovery());

    let result = handle
        .pair(PairingRequest::new(None, GOOD_PAIRING_CODE))
        .await;

    assert!(matches!(result, Err(Error::NoPort)));
    wait_for_output(&handle, "No debug port available").await;
}

#[tokio::test]
#[serial]
async fn test_pairing_while_shelling_is_rejected() {
    let fixture = Fixture::new();
    fixture.seed_prefs(true, Some(37000));
    set_fake_devices(&fixture.bin_dir, &["localhost:37000"]);
    let handle = fixture.spawn(fast_settings(), no_discovery());
    assert_eq!(handle.start().await, InitResult::Success);

    let result = handle
        .pair(PairingRequest::new(Some(41000), GOOD_PAIRING_CODE))
        .await;

    assert!(matches!(result, Err(Error::Pairing { .. })));
    assert!(handle.status().ready);
    wait_for_output(&handle, "a shell is already attached").await;
    assert!(!fixture
        .calls()
        .contains(&"pair localhost:41000".to_string()));
}

#[tokio::test]
#[serial]
async fn test_concurrent_pairing_is_rejected() {
    let fixture = Fixture::new();
    let handle = fixture.spawn(fast_settings(), no_discovery());

    let (first, second) = tokio::join!(
        handle.pair(PairingRequest::new(Some(41000), "000000")),
        handle.pair(PairingRequest::new(Some(41000), "000000")),
    );

    assert!(matches!(first, Ok(false)));
    assert!(matches!(second, Err(Error::PairingInFlight)));
}

#[tokio::test]
#[serial]
async fn test_shell_restarts_after_each_death() {
    let fixture = Fixture::new();
    fixture.seed_prefs(true, Some(37000));
    set_fake_devices(&fixture.bin_dir, &["localhost:37000"]);
    let handle = fixture.spawn(fast_settings(), no_discovery());

    assert_eq!(handle.start().await, InitResult::Success);

    for death in 1..=3 {
        assert!(handle.send_command("exit").await);
        wait_for_status(&handle, |status| !status.ready).await;
        let status = wait_for_status(&handle, |status| status.ready).await;
        assert_eq!(status.phase, Phase::Shelling);
        wait_until(|| shell_spawns(&fixture.calls()) > death, "shell respawn").await;
        assert_eq!(shell_spawns(&fixture.calls()), death + 1);
    }

    wait_for_output(&handle, "Shell is dead, resetting...").await;
}

#[tokio::test]
#[serial]
async fn test_run_script_executes_in_shell() {
    let fixture = Fixture::new();
    fixture.seed_prefs(true, Some(37000));
    set_fake_devices(&fixture.bin_dir, &["localhost:37000"]);
    let handle = fixture.spawn(fast_settings(), no_discovery());
    assert_eq!(handle.start().await, InitResult::Success);

    assert!(handle.run_script("echo scripted-run").await.unwrap());

    assert_eq!(
        std::fs::read_to_string(handle.script_path()).unwrap(),
        "echo scripted-run"
    );
    wait_for_output(&handle, "scripted-run\n").await;
}

#[tokio::test]
#[serial]
async fn test_reset_twice_matches_reset_once() {
    let fixture = Fixture::new();
    fixture.seed_prefs(true, Some(37000));
    set_fake_devices(&fixture.bin_dir, &["localhost:37000"]);
    let handle = fixture.spawn(fast_settings(), no_discovery());
    assert_eq!(handle.start().await, InitResult::Success);
    std::fs::write(fixture.paths.files_dir.join("leftover.txt"), "x").unwrap();

    handle.reset().await.unwrap();
    let once = handle.status();
    handle.reset().await.unwrap();
    let twice = handle.status();

    let closed = SessionStatus {
        phase: Phase::Closed,
        ready: false,
        closed: true,
    };
    assert_eq!(once, closed);
    assert_eq!(twice, closed);

    assert_eq!(fixture.prefs(), Preferences::default());
    assert!(fixture.paths.files_dir.is_dir());
    assert!(!fixture.paths.files_dir.join("leftover.txt").exists());
    assert!(!handle.send_command("echo gone").await);
    assert_eq!(handle.start().await, InitResult::Failure);
    assert_eq!(handle.resume_with_port(37000).await, InitResult::Failure);

    let calls = fixture.calls();
    assert!(calls.contains(&"disconnect".to_string()));
}

#[tokio::test]
#[serial]
async fn test_local_shell_skips_bridge() {
    let fixture = Fixture::new();
    let mut settings = fast_settings();
    settings.behavior.auto_shell = false;
    let handle = fixture.spawn(settings, no_discovery());

    assert_eq!(handle.start().await, InitResult::Success);
    assert!(handle.status().ready);

    wait_for_output(&handle, "Entered non-adb shell").await;
    assert!(fixture.calls().is_empty());
}

#[tokio::test]
#[serial]
async fn test_privileged_toggle_cycles_without_known_port() {
    let fixture = Fixture::new();
    fixture.seed_prefs(true, None);
    let toggle = Arc::new(FakeToggle::privileged());
    let handle = fixture.spawn_with(fast_settings(), toggle.clone(), no_discovery());

    assert_eq!(handle.start().await, InitResult::NeedsPort);
    assert_eq!(toggle.writes(), vec![true, false, true]);
    wait_for_output(&handle, "Cycling wireless debugging").await;
}

#[tokio::test]
#[serial]
async fn test_privileged_toggle_only_enables_with_known_port() {
    let fixture = Fixture::new();
    fixture.seed_prefs(true, Some(37000));
    let toggle = Arc::new(FakeToggle::privileged());
    let handle = fixture.spawn_with(fast_settings(), toggle.clone(), no_discovery());

    assert_eq!(handle.start().await, InitResult::NeedsPort);
    assert_eq!(toggle.writes(), vec![true]);
}

#[tokio::test]
#[serial]
async fn test_waits_for_user_to_enable_debugging() {
    let fixture = Fixture::new();
    fixture.seed_prefs(true, None);
    let toggle = Arc::new(FakeToggle::enabled_after(3));
    let handle = fixture.spawn_with(fast_settings(), toggle.clone(), no_discovery());

    assert_eq!(handle.start().await, InitResult::NeedsPort);
    assert!(toggle.writes().is_empty());

    let output = wait_for_output(&handle, "No debug port found").await;
    // The first disabled answer is the initial check
    assert_eq!(output.matches("Waiting for wireless debugging...").count(), 2);
}

#[tokio::test]
#[serial]
async fn test_start_while_shelling_is_noop() {
    let fixture = Fixture::new();
    fixture.seed_prefs(true, Some(37000));
    set_fake_devices(&fixture.bin_dir, &["localhost:37000"]);
    let handle = fixture.spawn(fast_settings(), no_discovery());

    assert_eq!(handle.start().await, InitResult::Success);
    wait_until(|| shell_spawns(&fixture.calls()) == 1, "first shell").await;

    assert_eq!(handle.start().await, InitResult::Success);
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(shell_spawns(&fixture.calls()), 1);
}
