use std::net::IpAddr;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use mdns_sd::{ServiceDaemon, ServiceEvent, ServiceInfo};
use anyhow::{bail, Context, Result};
use shared::protocol::ROBOT_SERVICE_TYPE;
use crate::store::DiscoveredService;
use super::DiscoverySource;

/// Discovery source backed by an mDNS browse of [`ROBOT_SERVICE_TYPE`].
pub struct MdnsBrowser {
    daemon: ServiceDaemon,
    ports: Arc<[u16]>,
    tx: mpsc::Sender<DiscoveredService>,
    cancel: Option<CancellationToken>,
}

impl MdnsBrowser {
    /// Only services advertised on one of `ports` are reported
    pub fn new(ports: &[u16], tx: mpsc::Sender<DiscoveredService>) -> Result<Self> {
        if ports.is_empty() {
            bail!("mDNS browser needs at least one port to watch");
        }
        if ports.contains(&0) {
            bail!("Invalid mDNS browser port: 0");
        }

        let daemon = ServiceDaemon::new().context("Failed to create mDNS daemon")?;

        Ok(Self {
            daemon,
            ports: ports.into(),
            tx,
            cancel: None,
        })
    }
}

impl Drop for MdnsBrowser {
    fn drop(&mut self) {
        self.stop();
        if let Err(e) = self.daemon.shutdown() {
            tracing::error!("Failed to shutdown mDNS daemon: {}", e);
        }
    }
}

impl DiscoverySource for MdnsBrowser {
    fn start(&mut self) {
        if self.cancel.is_some() {
            return;
        }

        let receiver = match self.daemon.browse(ROBOT_SERVICE_TYPE) {
            Ok(receiver) => receiver,
            Err(e) => {
                tracing::error!("Failed to browse {}: {}", ROBOT_SERVICE_TYPE, e);
                return;
            }
        };

        let cancel = CancellationToken::new();
        tokio::spawn(run_browser(
            receiver,
            Arc::clone(&self.ports),
            self.tx.clone(),
            cancel.clone(),
        ));
        self.cancel = Some(cancel);
    }

    fn stop(&mut self) {
        let Some(cancel) = self.cancel.take() else {
            return;
        };

        cancel.cancel();
        if let Err(e) = self.daemon.stop_browse(ROBOT_SERVICE_TYPE) {
            tracing::warn!("Failed to stop browsing {}: {}", ROBOT_SERVICE_TYPE, e);
        }
    }
}

async fn run_browser(
    receiver: flume::Receiver<ServiceEvent>,
    ports: Arc<[u16]>,
    tx: mpsc::Sender<DiscoveredService>,
    cancel: CancellationToken,
) {
    tracing::info!("Starting mDNS browser for {}", ROBOT_SERVICE_TYPE);

    loop {
        tokio::select! {
            event = receiver.recv_async() => {
                match event {
                    Ok(ServiceEvent::ServiceResolved(info)) => {
                        for service in services_from_info(&info, &ports) {
                            tracing::debug!("Found {} at {}:{}", service.name, service.ip, service.port);
                            if tx.send(service).await.is_err() {
                                tracing::debug!("Discovery receiver dropped, mDNS browser exiting");
                                return;
                            }
                        }
                    }
                    Ok(ServiceEvent::ServiceRemoved(_typ, fullname)) => {
                        // goodbyes don't evict anything, health polling decides reachability
                        tracing::debug!("Service removed: {}", fullname);
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!("mDNS browse channel closed: {}", e);
                        break;
                    }
                }
            }

            _ = cancel.cancelled() => {
                tracing::info!("mDNS browser shutting down");
                break;
            }
        }
    }
}

/// One event per advertised address, or none if the port isn't watched
fn services_from_info(info: &ServiceInfo, ports: &[u16]) -> Vec<DiscoveredService> {
    let port = info.get_port();
    if !ports.contains(&port) {
        return Vec::new();
    }

    let name = instance_name(info.get_fullname());
    if name.is_empty() {
        tracing::debug!("Skipping service {} - no instance name", info.get_fullname());
        return Vec::new();
    }

    let mut addresses: Vec<&IpAddr> = info.get_addresses().iter().collect();
    addresses.sort();

    addresses
        .into_iter()
        .map(|ip| DiscoveredService::new(ip.to_string(), port, name))
        .collect()
}

/// `opentrons-dev._http._tcp.local.` -> `opentrons-dev`
fn instance_name(fullname: &str) -> &str {
    fullname
        .strip_suffix(ROBOT_SERVICE_TYPE)
        .and_then(|rest| rest.strip_suffix('.'))
        .unwrap_or_else(|| fullname.split('.').next().unwrap_or(""))
}
