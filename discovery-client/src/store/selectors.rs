use std::cmp::Ordering;
use std::sync::Arc;
use shared::types::{Address, DiscoveryClientRobot, HealthStatus, HostState, RobotState};
use super::{HostsByIp, RobotsByName, State};

pub fn get_robot_states(state: &State) -> Vec<RobotState> {
    state.robots_by_name.values().cloned().collect()
}

pub fn get_host_states(state: &State) -> Vec<HostState> {
    state.hosts_by_ip.values().cloned().collect()
}

/// Every known host address followed by the manual addresses not already
/// known as hosts. Each ip appears once.
pub fn get_addresses(state: &State) -> Vec<Address> {
    addresses_from(&state.hosts_by_ip, &state.manual_addresses)
}

/// Robot identities with their addresses attached, best address first
pub fn get_robots(state: &State) -> Vec<DiscoveryClientRobot> {
    robots_from(&state.robots_by_name, &state.hosts_by_ip)
}

fn addresses_from(hosts: &HostsByIp, manual: &[Address]) -> Vec<Address> {
    let mut addresses: Vec<Address> = hosts.values().map(HostState::address).collect();
    for address in manual {
        if !addresses.iter().any(|a| a.ip == address.ip) {
            addresses.push(address.clone());
        }
    }
    addresses
}

fn robots_from(robots: &RobotsByName, hosts: &HostsByIp) -> Vec<DiscoveryClientRobot> {
    robots
        .values()
        .map(|robot| {
            let mut addresses: Vec<HostState> = hosts
                .values()
                .filter(|host| host.robot_name.as_deref() == Some(robot.name.as_str()))
                .cloned()
                .collect();
            addresses.sort_by(compare_hosts_by_connectability);

            DiscoveryClientRobot {
                name: robot.name.clone(),
                health: robot.health.clone(),
                server_health: robot.server_health.clone(),
                addresses,
            }
        })
        .collect()
}

fn status_rank(status: Option<HealthStatus>) -> u8 {
    match status {
        Some(HealthStatus::Ok) => 0,
        Some(HealthStatus::NotOk) => 1,
        Some(HealthStatus::Unreachable) => 2,
        None => 3,
    }
}

/// Lower is closer: loopback, link-local v4, link-local v6, everything else.
/// Within a tier an ip literal beats the `localhost` hostname.
fn ip_rank(ip: &str) -> (u8, u8) {
    let lower = ip.to_ascii_lowercase();

    if lower == "localhost" {
        (0, 1)
    } else if lower.starts_with("127.") || lower == "::1" {
        (0, 0)
    } else if lower.starts_with("169.254.") {
        (1, 0)
    } else if lower.starts_with("fd00:") || lower.starts_with("fe80:") {
        (2, 0)
    } else {
        (3, 0)
    }
}

/// Total order over hosts, most connectable first.
///
/// Compares `/health` status, then `/server/update/health` status, then
/// address locality, then whether the address has ever been seen.
pub fn compare_hosts_by_connectability(a: &HostState, b: &HostState) -> Ordering {
    status_rank(a.health_status)
        .cmp(&status_rank(b.health_status))
        .then_with(|| status_rank(a.server_health_status).cmp(&status_rank(b.server_health_status)))
        .then_with(|| ip_rank(&a.ip).cmp(&ip_rank(&b.ip)))
        .then_with(|| b.seen.cmp(&a.seen))
}

struct Memo<I, O> {
    inputs: I,
    output: Arc<Vec<O>>,
}

/// Memoized selectors.
///
/// A call whose input slices are the same allocations as last time, or whose
/// result equals the previous one, hands back the previous `Arc`. Callers can
/// therefore detect changes with [`Arc::ptr_eq`].
#[derive(Default)]
pub struct Selectors {
    addresses: Option<Memo<(Arc<HostsByIp>, Arc<Vec<Address>>), Address>>,
    robots: Option<Memo<(Arc<RobotsByName>, Arc<HostsByIp>), DiscoveryClientRobot>>,
}

impl Selectors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Memoized [`get_addresses`]
    pub fn addresses(&mut self, state: &State) -> Arc<Vec<Address>> {
        if let Some(memo) = &self.addresses {
            let (hosts, manual) = &memo.inputs;
            if Arc::ptr_eq(hosts, &state.hosts_by_ip) && Arc::ptr_eq(manual, &state.manual_addresses) {
                return Arc::clone(&memo.output);
            }
        }

        let next = addresses_from(&state.hosts_by_ip, &state.manual_addresses);
        let output = match &self.addresses {
            Some(memo) if *memo.output == next => Arc::clone(&memo.output),
            _ => Arc::new(next),
        };

        self.addresses = Some(Memo {
            inputs: (Arc::clone(&state.hosts_by_ip), Arc::clone(&state.manual_addresses)),
            output: Arc::clone(&output),
        });
        output
    }

    /// Memoized [`get_robots`]
    pub fn robots(&mut self, state: &State) -> Arc<Vec<DiscoveryClientRobot>> {
        if let Some(memo) = &self.robots {
            let (robots, hosts) = &memo.inputs;
            if Arc::ptr_eq(robots, &state.robots_by_name) && Arc::ptr_eq(hosts, &state.hosts_by_ip) {
                return Arc::clone(&memo.output);
            }
        }

        let next = robots_from(&state.robots_by_name, &state.hosts_by_ip);
        let output = match &self.robots {
            Some(memo) if *memo.output == next => Arc::clone(&memo.output),
            _ => Arc::new(next),
        };

        self.robots = Some(Memo {
            inputs: (Arc::clone(&state.robots_by_name), Arc::clone(&state.hosts_by_ip)),
            output: Arc::clone(&output),
        });
        output
    }
}
