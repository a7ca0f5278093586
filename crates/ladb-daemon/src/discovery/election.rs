//! Port election and resolution bookkeeping
//!
//! Pure state, driven by [`BrowseEvent`]s. The async task in the parent module
//! feeds events in, issues the resolve requests handed back, and publishes the
//! results.

use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::LazyLock;

use chrono::{DateTime, NaiveDateTime, Utc};
use ladb_core::prelude::*;
use regex::Regex;

use super::{BrowseEvent, DiscoveredService, ResolveFailure, ServiceKind};

/// `expirationTime: 2024-05-01T12:00:00Z` inside the rendered TXT record
static EXPIRATION_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"expirationTime: (\S+)").expect("invalid expiration regex"));

/// Parenthesised counter suffix, e.g. the `3` in `ADB (3)`
static COUNTER_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\((\d+)\)").expect("invalid counter regex"));

const EXPIRATION_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Extract the advertisement's expiration time from its metadata text.
///
/// Anything that does not match the fixed format counts as absent.
pub fn parse_expiration_time(text: &str) -> Option<DateTime<Utc>> {
    let raw = EXPIRATION_PATTERN.captures(text)?.get(1)?.as_str();
    NaiveDateTime::parse_from_str(raw, EXPIRATION_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

/// Counter carried in a service name; unnumbered names count as 0.
pub fn service_counter(name: &str) -> u64 {
    COUNTER_PATTERN
        .captures(name)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(0)
}

/// The current winner for one service type.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ElectionState {
    best_port: Option<u16>,
    best_expiration_time: Option<DateTime<Utc>>,
    best_service_name: Option<String>,
}

impl ElectionState {
    pub fn best_port(&self) -> Option<u16> {
        self.best_port
    }

    pub fn best_service_name(&self) -> Option<&str> {
        self.best_service_name.as_deref()
    }

    pub fn best_expiration_time(&self) -> Option<DateTime<Utc>> {
        self.best_expiration_time
    }

    /// Adopt `candidate` if it is newer than the current winner.
    ///
    /// Returns `true` when the candidate was accepted.
    pub fn update_if_newest(&mut self, candidate: &DiscoveredService) -> bool {
        let accept = match (self.best_port, candidate.expiration_time) {
            (None, _) => {
                debug!("No port elected yet, taking {}", candidate.service_name);
                true
            }
            (Some(_), Some(expiration)) => match self.best_expiration_time {
                None => true,
                Some(best) => expiration > best,
            },
            (Some(_), None) => {
                let best_name = self.best_service_name.as_deref().unwrap_or("");
                service_counter(&candidate.service_name) > service_counter(best_name)
                    || candidate.service_name == best_name
            }
        };

        if accept {
            self.best_port = Some(candidate.port);
            self.best_expiration_time = candidate.expiration_time;
            self.best_service_name = Some(candidate.service_name.clone());
            info!(
                "Elected {} port {} ({:?})",
                candidate.kind, candidate.port, candidate.service_name
            );
        } else {
            trace!("Rejected {} port {}", candidate.service_name, candidate.port);
        }

        accept
    }
}

/// A resolve the caller must (re-)issue to the browser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveRequest {
    pub kind: ServiceKind,
    pub name: String,
}

/// Elections for both service types plus the pending set.
#[derive(Debug, Default)]
pub struct DiscoveryState {
    local_address: Option<IpAddr>,
    connect: ElectionState,
    pairing: ElectionState,
    pending: HashSet<(ServiceKind, String)>,
}

impl DiscoveryState {
    pub fn new(local_address: Option<IpAddr>) -> Self {
        Self {
            local_address,
            ..Default::default()
        }
    }

    pub fn election(&self, kind: ServiceKind) -> &ElectionState {
        match kind {
            ServiceKind::Connect => &self.connect,
            ServiceKind::Pairing => &self.pairing,
        }
    }

    fn election_mut(&mut self, kind: ServiceKind) -> &mut ElectionState {
        match kind {
            ServiceKind::Connect => &mut self.connect,
            ServiceKind::Pairing => &mut self.pairing,
        }
    }

    /// True while any found advertisement is still unresolved.
    pub fn is_resolving(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Port and host filters applied before an advertisement may take part
    /// in the election.
    pub fn accepts(&self, service: &DiscoveredService) -> bool {
        if service.port == 0 {
            debug!("Port is zero, skipping {}", service.service_name);
            return false;
        }

        if let Some(local) = self.local_address {
            if !service.host_addresses.contains(&local) {
                debug!(
                    "{} advertised from {:?}, not this device ({})",
                    service.service_name, service.host_addresses, local
                );
                return false;
            }
        }

        true
    }

    /// Apply one browse event. Returns the resolve to issue next, if any.
    pub fn handle(&mut self, event: BrowseEvent) -> Option<ResolveRequest> {
        match event {
            BrowseEvent::Found { kind, name } => {
                self.pending.insert((kind, name.clone()));
                debug!("Service found, pending: {}", self.pending.len());
                Some(ResolveRequest { kind, name })
            }
            BrowseEvent::Resolved(service) => {
                if self.accepts(&service) {
                    self.election_mut(service.kind).update_if_newest(&service);
                }
                self.pending
                    .remove(&(service.kind, service.service_name.clone()));
                debug!("Service resolved, pending: {}", self.pending.len());
                None
            }
            BrowseEvent::ResolveFailed {
                kind,
                name,
                failure: ResolveFailure::AlreadyActive,
            } => {
                debug!("Resolve of {} already active, retrying", name);
                Some(ResolveRequest { kind, name })
            }
            BrowseEvent::ResolveFailed {
                kind,
                name,
                failure: ResolveFailure::Other(reason),
            } => {
                warn!("Resolve of {} failed: {}", name, reason);
                self.pending.remove(&(kind, name));
                None
            }
            BrowseEvent::Lost { kind, name } => {
                debug!("Service lost: {}", name);
                self.pending.remove(&(kind, name));
                None
            }
        }
    }
}
