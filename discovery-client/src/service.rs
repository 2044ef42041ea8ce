use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use anyhow::{Context, Result};
use shared::types::DiscoveryClientRobot;
use crate::client::{DiscoveryClient, DiscoveryClientConfig};
use crate::config::DiscoveryConfig;
use crate::health::poller::{HealthPoller, TokioHealthPoller};
use crate::health::transport::HealthTransport;
use crate::mdns::{DiscoverySource, MdnsBrowser};
use crate::store::{DiscoveredService, PollResult};

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Commands sent to the discovery task
pub enum DiscoveryCommand {
    Start(DiscoveryClientConfig),
    Stop,
    RemoveRobot(String),
    Shutdown,
}

/// Handle to a [`DiscoveryClient`] running on its own tokio task.
///
/// Every command, discovered service and poll result is processed in order on
/// that one task, so the store is never touched concurrently. Commands are
/// queued and return immediately.
#[derive(Clone)]
pub struct DiscoveryHandle {
    tx: mpsc::UnboundedSender<DiscoveryCommand>,
    robots_rx: watch::Receiver<Arc<Vec<DiscoveryClientRobot>>>,
}

impl DiscoveryHandle {
    /// Run `client` on a new task, feeding it from `services` and `poll_results`
    pub fn spawn<P, S>(
        mut client: DiscoveryClient<P, S>,
        services: mpsc::Receiver<DiscoveredService>,
        poll_results: mpsc::Receiver<PollResult>,
    ) -> (Self, JoinHandle<()>)
    where
        P: HealthPoller + Send + 'static,
        S: DiscoverySource + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let (robots_tx, robots_rx) = watch::channel(client.get_robots());

        let task = tokio::spawn(run(client, rx, services, poll_results, robots_tx));

        (Self { tx, robots_rx }, task)
    }

    /// Wire a client to an mDNS browser and a tokio health poller over
    /// `transport`
    pub fn with_mdns<T>(
        config: &DiscoveryConfig,
        transport: T,
        on_list_change: impl FnMut(Arc<Vec<DiscoveryClientRobot>>) + Send + 'static,
    ) -> Result<(Self, JoinHandle<()>)>
    where
        T: HealthTransport,
    {
        let (services_tx, services_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let (poll_tx, poll_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        let source = MdnsBrowser::new(&config.ports, services_tx)?;
        let poller = TokioHealthPoller::new(transport, poll_tx, config.request_timeout());
        let client = DiscoveryClient::new(poller, source, on_list_change);

        Ok(Self::spawn(client, services_rx, poll_rx))
    }

    /// Validate `config` and queue a start
    pub fn start(&self, config: DiscoveryClientConfig) -> Result<()> {
        config.validate()?;
        self.send(DiscoveryCommand::Start(config))
    }

    pub fn stop(&self) -> Result<()> {
        self.send(DiscoveryCommand::Stop)
    }

    pub fn remove_robot(&self, name: impl Into<String>) -> Result<()> {
        self.send(DiscoveryCommand::RemoveRobot(name.into()))
    }

    /// Stop the client and end its task
    pub fn shutdown(&self) -> Result<()> {
        self.send(DiscoveryCommand::Shutdown)
    }

    /// Latest robot list
    pub fn get_robots(&self) -> Arc<Vec<DiscoveryClientRobot>> {
        Arc::clone(&self.robots_rx.borrow())
    }

    /// Receiver that is marked changed whenever the robot list changes
    pub fn subscribe(&self) -> watch::Receiver<Arc<Vec<DiscoveryClientRobot>>> {
        self.robots_rx.clone()
    }

    fn send(&self, command: DiscoveryCommand) -> Result<()> {
        self.tx
            .send(command)
            .map_err(|_| anyhow::anyhow!("discovery task is not running"))
            .context("Failed to send discovery command")
    }
}

async fn run<P, S>(
    mut client: DiscoveryClient<P, S>,
    mut commands: mpsc::UnboundedReceiver<DiscoveryCommand>,
    mut services: mpsc::Receiver<DiscoveredService>,
    mut poll_results: mpsc::Receiver<PollResult>,
    robots_tx: watch::Sender<Arc<Vec<DiscoveryClientRobot>>>,
) where
    P: HealthPoller,
    S: DiscoverySource,
{
    loop {
        tokio::select! {
            command = commands.recv() => {
                match command {
                    Some(DiscoveryCommand::Start(config)) => {
                        if let Err(e) = client.start(config) {
                            tracing::error!("Failed to start discovery client: {:#}", e);
                        }
                    }
                    Some(DiscoveryCommand::Stop) => client.stop(),
                    Some(DiscoveryCommand::RemoveRobot(name)) => client.remove_robot(&name),
                    Some(DiscoveryCommand::Shutdown) | None => {
                        tracing::info!("Discovery task shutting down");
                        client.stop();
                        break;
                    }
                }
            }
            Some(service) = services.recv() => client.handle_service_found(service),
            Some(result) = poll_results.recv() => client.handle_poll_result(result),
        }

        let robots = client.get_robots();
        robots_tx.send_if_modified(|current| {
            if Arc::ptr_eq(current, &robots) {
                return false;
            }
            *current = robots;
            true
        });
    }
}
