//! Discovery state: identities, addresses and operator-pinned addresses.
//!
//! The state is only ever changed through [`Store::dispatch`], which runs the
//! pure transition in [`reducer::apply`]. Each slice lives behind an [`Arc`]
//! and a slice whose contents did not change keeps its previous pointer, so
//! readers detect changes with [`Arc::ptr_eq`] instead of deep comparison.

pub mod reducer;
pub mod selectors;

use std::sync::Arc;
use indexmap::IndexMap;
use shared::types::{
    Address, HealthErrorResponse, HealthResponse, HostState, RobotSeed, RobotState,
    ServerHealthResponse,
};

pub use reducer::apply;
pub use selectors::Selectors;

/// Robot identities keyed by name, in insertion order
pub type RobotsByName = IndexMap<String, RobotState>;

/// Host addresses keyed by ip, in insertion order
pub type HostsByIp = IndexMap<String, HostState>;

#[derive(Debug, Clone, Default)]
pub struct State {
    pub robots_by_name: Arc<RobotsByName>,
    pub hosts_by_ip: Arc<HostsByIp>,
    pub manual_addresses: Arc<Vec<Address>>,
}

impl State {
    /// True when every slice is the same allocation as in `other`
    pub fn ptr_eq(&self, other: &State) -> bool {
        Arc::ptr_eq(&self.robots_by_name, &other.robots_by_name)
            && Arc::ptr_eq(&self.hosts_by_ip, &other.hosts_by_ip)
            && Arc::ptr_eq(&self.manual_addresses, &other.manual_addresses)
    }
}

/// A discovery source saw `name` advertised at `ip:port`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredService {
    pub ip: String,
    pub port: u16,
    pub name: String,
}

impl DiscoveredService {
    pub fn new(ip: impl Into<String>, port: u16, name: impl Into<String>) -> Self {
        Self {
            ip: ip.into(),
            port,
            name: name.into(),
        }
    }
}

/// Outcome of polling both health endpoints of one address.
#[derive(Debug, Clone, PartialEq)]
pub struct PollResult {
    pub ip: String,
    pub port: u16,
    pub health: Option<HealthResponse>,
    pub server_health: Option<ServerHealthResponse>,
    pub health_error: Option<HealthErrorResponse>,
    pub server_health_error: Option<HealthErrorResponse>,
}

impl PollResult {
    pub fn address(&self) -> Address {
        Address::new(self.ip.clone(), self.port)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Seed the state. `None` leaves the corresponding slice untouched.
    InitializeState {
        initial_robots: Option<Vec<RobotSeed>>,
        manual_addresses: Option<Vec<Address>>,
    },
    ServiceFound(DiscoveredService),
    HealthPolled(PollResult),
    RemoveRobot { name: String },
}

/// Owner of the current [`State`].
#[derive(Debug, Default)]
pub struct Store {
    state: State,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    /// Apply `action`. Returns true if the state changed.
    pub fn dispatch(&mut self, action: &Action) -> bool {
        let next = apply(&self.state, action);
        if next.ptr_eq(&self.state) {
            return false;
        }

        self.state = next;
        true
    }
}
