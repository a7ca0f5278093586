//! Registered-service discovery of the bridge's ephemeral ports
//!
//! [`PortDiscovery`] browses both wireless-debugging service types through a
//! [`ServiceBrowser`], runs every resolved advertisement through the election
//! in [`election`], and publishes the winners as atomics that the supervisor
//! reads without locking.

pub mod election;
pub mod mdns;

use std::net::{IpAddr, Ipv4Addr, UdpSocket};
use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Instant;

use chrono::{DateTime, Utc};
use ladb_core::prelude::*;
use tokio::sync::mpsc;

pub use election::{DiscoveryState, ElectionState, ResolveRequest};
pub use mdns::MdnsBrowser;

/// Advertised by a device that is paired and ready to connect.
pub const CONNECT_SERVICE_TYPE: &str = "_adb-tls-connect._tcp.local.";

/// Advertised while the on-device pairing dialog is open.
pub const PAIRING_SERVICE_TYPE: &str = "_adb-tls-pairing._tcp.local.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceKind {
    Connect,
    Pairing,
}

impl ServiceKind {
    pub const ALL: [ServiceKind; 2] = [ServiceKind::Connect, ServiceKind::Pairing];

    pub fn service_type(&self) -> &'static str {
        match self {
            ServiceKind::Connect => CONNECT_SERVICE_TYPE,
            ServiceKind::Pairing => PAIRING_SERVICE_TYPE,
        }
    }
}

impl std::fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServiceKind::Connect => f.write_str("connect"),
            ServiceKind::Pairing => f.write_str("pairing"),
        }
    }
}

/// One resolved advertisement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredService {
    pub kind: ServiceKind,
    pub port: u16,
    /// Instance name, possibly with a counter suffix such as `(2)`
    pub service_name: String,
    pub expiration_time: Option<DateTime<Utc>>,
    pub host_addresses: Vec<IpAddr>,
}

/// Why a resolve did not complete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveFailure {
    /// A resolve for the same advertisement is still running; try again.
    AlreadyActive,
    Other(String),
}

/// Callback events from a [`ServiceBrowser`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrowseEvent {
    Found { kind: ServiceKind, name: String },
    Resolved(DiscoveredService),
    ResolveFailed {
        kind: ServiceKind,
        name: String,
        failure: ResolveFailure,
    },
    Lost { kind: ServiceKind, name: String },
}

/// The platform's registered-service browser.
///
/// Implementations deliver events for a browsed type into `sink` from any
/// thread. `resolve` asks for a found advertisement to be resolved; browsers
/// that resolve on their own may treat it as a no-op.
pub trait ServiceBrowser: Send + Sync + 'static {
    fn browse(&self, kind: ServiceKind, sink: mpsc::UnboundedSender<BrowseEvent>) -> Result<()>;

    fn resolve(&self, kind: ServiceKind, name: &str) -> Result<()>;
}

/// Values written by the election task and read by everyone else.
#[derive(Debug, Default)]
struct Published {
    /// 0 means no port elected
    connect_port: AtomicU16,
    pairing_port: AtomicU16,
    resolving: AtomicBool,
    started: AtomicBool,
    started_at: OnceLock<Instant>,
}

/// Finds the best connect and pairing ports for this device.
#[derive(Debug, Clone)]
pub struct PortDiscovery {
    local_address: Option<IpAddr>,
    published: Arc<Published>,
}

impl PortDiscovery {
    /// `local_address` filters out advertisements from other devices; `None`
    /// accepts any host.
    pub fn new(local_address: Option<IpAddr>) -> Self {
        Self {
            local_address,
            published: Arc::new(Published::default()),
        }
    }

    /// Start browsing. Only the first call has any effect.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start<B: ServiceBrowser>(&self, browser: Arc<B>) -> Result<()> {
        if self.published.started.swap(true, Ordering::SeqCst) {
            warn!("Port discovery already started");
            return Ok(());
        }
        let _ = self.published.started_at.set(Instant::now());

        let (tx, rx) = mpsc::unbounded_channel();
        let mut browsing = 0;
        for kind in ServiceKind::ALL {
            match browser.browse(kind, tx.clone()) {
                Ok(()) => {
                    info!("Browsing for {}", kind.service_type());
                    browsing += 1;
                }
                Err(e) => warn!("Failed to browse {}: {}", kind.service_type(), e),
            }
        }
        drop(tx);

        if browsing == 0 {
            return Err(Error::discovery("no service type could be browsed"));
        }

        tokio::spawn(run_election(
            browser,
            rx,
            DiscoveryState::new(self.local_address),
            self.published.clone(),
        ));
        Ok(())
    }

    pub fn is_started(&self) -> bool {
        self.published.started.load(Ordering::SeqCst)
    }

    /// Best port advertised for connecting.
    pub fn best_port(&self) -> Option<u16> {
        nonzero(self.published.connect_port.load(Ordering::SeqCst))
    }

    /// Best port advertised by an open pairing dialog.
    pub fn pairing_port(&self) -> Option<u16> {
        nonzero(self.published.pairing_port.load(Ordering::SeqCst))
    }

    /// True while found advertisements are still waiting to resolve.
    pub fn is_resolving(&self) -> bool {
        self.published.resolving.load(Ordering::SeqCst)
    }

    /// When browsing began, `None` before `start`.
    pub fn started_at(&self) -> Option<Instant> {
        self.published.started_at.get().copied()
    }

    pub fn local_address(&self) -> Option<IpAddr> {
        self.local_address
    }
}

fn nonzero(port: u16) -> Option<u16> {
    (port != 0).then_some(port)
}

/// Background task: the only writer of the published values.
async fn run_election<B: ServiceBrowser>(
    browser: Arc<B>,
    mut rx: mpsc::UnboundedReceiver<BrowseEvent>,
    mut state: DiscoveryState,
    published: Arc<Published>,
) {
    while let Some(event) = rx.recv().await {
        trace!("Browse event: {:?}", event);

        if let Some(request) = state.handle(event) {
            if let Err(e) = browser.resolve(request.kind, &request.name) {
                warn!("Failed to request resolve of {}: {}", request.name, e);
            }
        }

        let connect = state.election(ServiceKind::Connect).best_port();
        let pairing = state.election(ServiceKind::Pairing).best_port();
        published
            .connect_port
            .store(connect.unwrap_or(0), Ordering::SeqCst);
        published
            .pairing_port
            .store(pairing.unwrap_or(0), Ordering::SeqCst);
        published
            .resolving
            .store(state.is_resolving(), Ordering::SeqCst);
    }

    published.resolving.store(false, Ordering::SeqCst);
    debug!("Port discovery event stream ended");
}

/// Best-effort detection of this machine's outward-facing address.
///
/// Connecting a UDP socket sends nothing; it only selects the route.
pub fn detect_local_address() -> Option<IpAddr> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).ok()?;
    socket.connect((Ipv4Addr::new(192, 0, 2, 1), 9)).ok()?;
    let address = socket.local_addr().ok()?.ip();
    (!address.is_loopback() && !address.is_unspecified()).then_some(address)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::FakeBrowser;
    use std::time::Duration;

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    fn resolved(kind: ServiceKind, name: &str, port: u16) -> BrowseEvent {
        BrowseEvent::Resolved(DiscoveredService {
            kind,
            port,
            service_name: name.to_string(),
            expiration_time: None,
            host_addresses: vec![IpAddr::V4(Ipv4Addr::LOCALHOST)],
        })
    }

    #[tokio::test]
    async fn test_nothing_published_before_start() {
        let discovery = PortDiscovery::new(None);
        assert!(!discovery.is_started());
        assert!(discovery.started_at().is_none());
        assert_eq!(discovery.best_port(), None);
        assert!(!discovery.is_resolving());
    }

    #[tokio::test]
    async fn test_start_browses_both_service_types() {
        let browser = Arc::new(FakeBrowser::new());
        let discovery = PortDiscovery::new(None);

        discovery.start(browser.clone()).unwrap();

        assert!(discovery.started_at().is_some());
        assert!(browser.is_browsing(ServiceKind::Connect));
        assert!(browser.is_browsing(ServiceKind::Pairing));
    }

    #[tokio::test]
    async fn test_start_is_idempotent() {
        let browser = Arc::new(FakeBrowser::new());
        let discovery = PortDiscovery::new(None);

        discovery.start(browser.clone()).unwrap();
        let first = discovery.started_at();
        discovery.start(browser.clone()).unwrap();

        assert_eq!(discovery.started_at(), first);
        assert_eq!(browser.browse_count(), 2);
    }

    #[tokio::test]
    async fn test_found_then_resolved_publishes_port() {
        let browser = Arc::new(FakeBrowser::new());
        let discovery = PortDiscovery::new(None);
        discovery.start(browser.clone()).unwrap();

        browser.emit(BrowseEvent::Found {
            kind: ServiceKind::Connect,
            name: "ADB".to_string(),
        });
        settle().await;
        assert!(discovery.is_resolving());
        assert_eq!(browser.resolve_requests(), vec!["ADB".to_string()]);

        browser.emit(resolved(ServiceKind::Connect, "ADB", 40001));
        settle().await;
        assert!(!discovery.is_resolving());
        assert_eq!(discovery.best_port(), Some(40001));
        assert_eq!(discovery.pairing_port(), None);
    }

    #[tokio::test]
    async fn test_pairing_port_published_separately() {
        let browser = Arc::new(FakeBrowser::new());
        let discovery = PortDiscovery::new(None);
        discovery.start(browser.clone()).unwrap();

        browser.emit(resolved(ServiceKind::Pairing, "ADB", 41000));
        settle().await;

        assert_eq!(discovery.pairing_port(), Some(41000));
        assert_eq!(discovery.best_port(), None);
    }

    #[tokio::test]
    async fn test_already_active_reissues_resolve() {
        let browser = Arc::new(FakeBrowser::new());
        let discovery = PortDiscovery::new(None);
        discovery.start(browser.clone()).unwrap();

        browser.emit(BrowseEvent::Found {
            kind: ServiceKind::Connect,
            name: "ADB (2)".to_string(),
        });
        browser.emit(BrowseEvent::ResolveFailed {
            kind: ServiceKind::Connect,
            name: "ADB (2)".to_string(),
            failure: ResolveFailure::AlreadyActive,
        });
        settle().await;

        assert_eq!(browser.resolve_requests().len(), 2);
        assert!(discovery.is_resolving());
    }
}
