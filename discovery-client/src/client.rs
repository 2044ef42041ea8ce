//! The discovery client orchestrator.
//!
//! [`DiscoveryClient`] owns the [`Store`] and is the only thing that
//! dispatches into it. Discovery and poll events arrive through
//! [`DiscoveryClient::handle_service_found`] and
//! [`DiscoveryClient::handle_poll_result`]; after every state change the
//! memoized selectors are re-run and
//!
//! - a new poll list restarts the [`HealthPoller`] with that list, keeping its
//!   interval
//! - a new robot list is handed to the `on_list_change` callback
//!
//! The client itself does no I/O and never blocks. See
//! [`crate::service::DiscoveryHandle`] for running it on a tokio task.

use std::sync::Arc;
use std::time::Duration;
use anyhow::{bail, Context, Result};
use shared::types::{Address, DiscoveryClientRobot, RobotSeed};
use crate::health::poller::{HealthPoller, PollerConfig};
use crate::mdns::DiscoverySource;
use crate::store::{Action, DiscoveredService, PollResult, Selectors, State, Store};

pub type ListChangeCallback = Box<dyn FnMut(Arc<Vec<DiscoveryClientRobot>>) + Send>;

/// Options for [`DiscoveryClient::start`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiscoveryClientConfig {
    /// Overrides the poller's interval
    pub health_poll_interval: Option<Duration>,
    /// Robots (and their addresses) known before discovery runs
    pub initial_robots: Option<Vec<RobotSeed>>,
    /// Addresses polled regardless of discovery
    pub manual_addresses: Option<Vec<Address>>,
}

impl DiscoveryClientConfig {
    pub fn validate(&self) -> Result<()> {
        if self.health_poll_interval == Some(Duration::ZERO) {
            bail!("Health poll interval must be greater than zero");
        }

        for address in self.manual_addresses.iter().flatten() {
            validate_address(address).context("Invalid manual address")?;
        }

        for robot in self.initial_robots.iter().flatten() {
            if robot.name.is_empty() {
                bail!("Initial robot has an empty name");
            }
            for address in &robot.addresses {
                validate_address(address)
                    .with_context(|| format!("Invalid address for initial robot {}", robot.name))?;
            }
        }

        Ok(())
    }
}

fn validate_address(address: &Address) -> Result<()> {
    if address.ip.is_empty() {
        bail!("Address has an empty ip");
    }
    if address.port == 0 {
        bail!("Address {} has invalid port 0", address.ip);
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Stopped,
    Running,
}

/// Last selector outputs seen by the change listener
struct Subscription {
    addresses: Arc<Vec<Address>>,
    robots: Arc<Vec<DiscoveryClientRobot>>,
}

pub struct DiscoveryClient<P, S> {
    store: Store,
    selectors: Selectors,
    poller: P,
    source: S,
    on_list_change: ListChangeCallback,
    subscription: Option<Subscription>,
    state: ClientState,
}

impl<P: HealthPoller, S: DiscoverySource> DiscoveryClient<P, S> {
    pub fn new(
        poller: P,
        source: S,
        on_list_change: impl FnMut(Arc<Vec<DiscoveryClientRobot>>) + Send + 'static,
    ) -> Self {
        Self {
            store: Store::new(),
            selectors: Selectors::new(),
            poller,
            source,
            on_list_change: Box::new(on_list_change),
            subscription: None,
            state: ClientState::Stopped,
        }
    }

    /// Seed the state from `config` and start polling and discovery.
    ///
    /// Nothing is touched if `config` is invalid.
    pub fn start(&mut self, config: DiscoveryClientConfig) -> Result<()> {
        config.validate()?;

        let DiscoveryClientConfig {
            health_poll_interval,
            initial_robots,
            manual_addresses,
        } = config;

        self.dispatch(&Action::InitializeState {
            initial_robots,
            manual_addresses,
        });

        let addresses = self.selectors.addresses(self.store.state());
        let robots = self.selectors.robots(self.store.state());

        self.poller.start(PollerConfig {
            list: Arc::clone(&addresses),
            interval: health_poll_interval,
        });
        self.source.start();

        if self.subscription.is_none() {
            self.subscription = Some(Subscription { addresses, robots });
        }

        self.state = ClientState::Running;
        tracing::info!("Discovery client started");
        Ok(())
    }

    pub fn stop(&mut self) {
        self.source.stop();
        self.poller.stop();
        self.subscription = None;
        self.state = ClientState::Stopped;
        tracing::info!("Discovery client stopped");
    }

    pub fn remove_robot(&mut self, name: &str) {
        self.dispatch(&Action::RemoveRobot {
            name: name.to_string(),
        });
    }

    /// Current robot list, best address first. Valid running or stopped.
    pub fn get_robots(&mut self) -> Arc<Vec<DiscoveryClientRobot>> {
        self.selectors.robots(self.store.state())
    }

    /// Current poll list
    pub fn get_addresses(&mut self) -> Arc<Vec<Address>> {
        self.selectors.addresses(self.store.state())
    }

    pub fn handle_service_found(&mut self, service: DiscoveredService) {
        self.dispatch(&Action::ServiceFound(service));
    }

    pub fn handle_poll_result(&mut self, result: PollResult) {
        let polled = self
            .selectors
            .addresses(self.store.state())
            .iter()
            .any(|address| address.ip == result.ip);
        if !polled {
            tracing::debug!("Poll result for {} which is not in the poll list", result.ip);
        }

        self.dispatch(&Action::HealthPolled(result));
    }

    pub fn state(&self) -> ClientState {
        self.state
    }

    pub fn store_state(&self) -> &State {
        self.store.state()
    }

    fn dispatch(&mut self, action: &Action) {
        if self.store.dispatch(action) {
            self.on_state_change();
        }
    }

    fn on_state_change(&mut self) {
        let Some(subscription) = self.subscription.as_mut() else {
            return;
        };

        let addresses = self.selectors.addresses(self.store.state());
        let robots = self.selectors.robots(self.store.state());

        if !Arc::ptr_eq(&addresses, &subscription.addresses) {
            tracing::debug!("Poll list changed, restarting health poller");
            self.poller.start(PollerConfig {
                list: Arc::clone(&addresses),
                interval: None,
            });
        }

        if !Arc::ptr_eq(&robots, &subscription.robots) {
            (self.on_list_change)(Arc::clone(&robots));
        }

        subscription.addresses = addresses;
        subscription.robots = robots;
    }
}
