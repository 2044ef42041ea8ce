use serde::Serialize;
use sha2::{Digest, Sha256};
use shared::types::{DiscoveryClientRobot, HealthResponse, HealthStatus, ServerHealthResponse};

/// Error bodies are left out: transport failures carry free-form messages
/// that differ between polls without anything meaningful changing.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AddressView<'a> {
    ip: &'a str,
    port: u16,
    seen: bool,
    health_status: Option<HealthStatus>,
    server_health_status: Option<HealthStatus>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RobotView<'a> {
    name: &'a str,
    health: Option<&'a HealthResponse>,
    server_health: Option<&'a ServerHealthResponse>,
    addresses: Vec<AddressView<'a>>,
}

/// SHA-256 over the robot list, independent of robot order.
/// Address order is kept since it is the connectability ranking.
pub fn compute_hash(robots: &[DiscoveryClientRobot]) -> String {
    let mut indices: Vec<usize> = (0..robots.len()).collect();
    indices.sort_by(|&a, &b| robots[a].name.cmp(&robots[b].name));

    let views: Vec<RobotView<'_>> = indices
        .iter()
        .map(|&i| {
            let r = &robots[i];
            RobotView {
                name: &r.name,
                health: r.health.as_ref(),
                server_health: r.server_health.as_ref(),
                addresses: r
                    .addresses
                    .iter()
                    .map(|a| AddressView {
                        ip: &a.ip,
                        port: a.port,
                        seen: a.seen,
                        health_status: a.health_status,
                        server_health_status: a.server_health_status,
                    })
                    .collect(),
            }
        })
        .collect();

    let json = serde_json::to_string(&views)
        .expect("Failed to serialize robots for hashing");

    hex::encode(Sha256::digest(json.as_bytes()))
}
