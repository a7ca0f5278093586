//! mDNS-SD implementation of [`ServiceBrowser`]

use std::fmt::Write as _;

use ladb_core::prelude::*;
use mdns_sd::{ServiceDaemon, ServiceEvent, ServiceInfo};
use tokio::sync::mpsc;

use super::election::parse_expiration_time;
use super::{BrowseEvent, DiscoveredService, ServiceBrowser, ServiceKind};

/// Browses through a shared `mdns-sd` daemon.
///
/// The daemon resolves every found instance by itself, so [`resolve`] has
/// nothing to do.
///
/// [`resolve`]: ServiceBrowser::resolve
pub struct MdnsBrowser {
    daemon: ServiceDaemon,
}

impl MdnsBrowser {
    pub fn new() -> Result<Self> {
        let daemon = ServiceDaemon::new()
            .map_err(|e| Error::discovery(format!("failed to start mDNS daemon: {}", e)))?;
        Ok(Self { daemon })
    }
}

impl std::fmt::Debug for MdnsBrowser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MdnsBrowser").finish_non_exhaustive()
    }
}

impl ServiceBrowser for MdnsBrowser {
    fn browse(&self, kind: ServiceKind, sink: mpsc::UnboundedSender<BrowseEvent>) -> Result<()> {
        let ty = kind.service_type();
        let rx = self
            .daemon
            .browse(ty)
            .map_err(|e| Error::discovery(format!("failed to browse {}: {}", ty, e)))?;

        tokio::spawn(async move {
            debug!("mDNS: browsing `{}`", ty);
            loop {
                let event = match rx.recv_async().await {
                    Ok(ServiceEvent::ServiceFound(_, fullname)) => {
                        trace!("mDNS: service found: {}", fullname);
                        BrowseEvent::Found {
                            kind,
                            name: instance_name(&fullname, ty),
                        }
                    }
                    Ok(ServiceEvent::ServiceResolved(info)) => {
                        BrowseEvent::Resolved(discovered_service(kind, ty, &info))
                    }
                    Ok(ServiceEvent::ServiceRemoved(_, fullname)) => {
                        debug!("mDNS: service removed: {}", fullname);
                        BrowseEvent::Lost {
                            kind,
                            name: instance_name(&fullname, ty),
                        }
                    }
                    Ok(ServiceEvent::SearchStarted(s)) => {
                        trace!("mDNS: search started: {}", s);
                        continue;
                    }
                    Ok(ServiceEvent::SearchStopped(s)) => {
                        trace!("mDNS: search stopped: {}", s);
                        continue;
                    }
                    #[allow(unreachable_patterns)]
                    Ok(_) => continue,
                    Err(e) => {
                        warn!("mDNS browse channel for {} closed: {}", ty, e);
                        break;
                    }
                };

                if sink.send(event).is_err() {
                    debug!("Discovery stopped listening for {}", ty);
                    break;
                }
            }
        });

        Ok(())
    }

    fn resolve(&self, _kind: ServiceKind, name: &str) -> Result<()> {
        trace!("mDNS resolves {} automatically", name);
        Ok(())
    }
}

impl Drop for MdnsBrowser {
    fn drop(&mut self) {
        if let Err(e) = self.daemon.shutdown() {
            debug!("mDNS daemon shutdown failed: {}", e);
        }
    }
}

/// `ADB (2)._adb-tls-connect._tcp.local.` → `ADB (2)`
fn instance_name(fullname: &str, ty: &str) -> String {
    fullname
        .strip_suffix(ty)
        .map(|name| name.trim_end_matches('.'))
        .unwrap_or(fullname)
        .to_string()
}

/// TXT properties rendered one `key: value` per line.
fn render_properties(info: &ServiceInfo) -> String {
    let mut text = String::new();
    for property in info.get_properties().iter() {
        let _ = writeln!(text, "{}: {}", property.key(), property.val_str());
    }
    text
}

fn discovered_service(kind: ServiceKind, ty: &str, info: &ServiceInfo) -> DiscoveredService {
    let metadata = render_properties(info);
    DiscoveredService {
        kind,
        port: info.get_port(),
        service_name: instance_name(info.get_fullname(), ty),
        expiration_time: parse_expiration_time(&metadata),
        host_addresses: info.get_addresses().iter().copied().collect(),
    }
}
