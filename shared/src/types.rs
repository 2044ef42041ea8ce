use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A pollable `ip:port` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address {
    pub ip: String,
    pub port: u16,
}

impl Address {
    pub fn new(ip: impl Into<String>, port: u16) -> Self {
        Self { ip: ip.into(), port }
    }
}

/// Body of a robot's `/health` endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fw_version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub robot_model: Option<String>,

    /// Fields we don't interpret, kept so consumers see the full body
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Body of a robot's `/server/update/health` endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerHealthResponse {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_server_version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capabilities: Option<Value>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl HealthResponse {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

impl ServerHealthResponse {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

/// A failed health check.
///
/// `status` is the HTTP status for error responses, or
/// [`crate::protocol::FETCH_ERROR_STATUS`] when the host could not be reached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthErrorResponse {
    pub status: i32,
    pub body: Value,
}

/// Classification of a single health endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HealthStatus {
    Ok,
    NotOk,
    Unreachable,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Ok => "ok",
            HealthStatus::NotOk => "notOk",
            HealthStatus::Unreachable => "unreachable",
        }
    }
}

/// Everything known about one robot identity, independent of address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RobotState {
    pub name: String,
    pub health: Option<HealthResponse>,
    pub server_health: Option<ServerHealthResponse>,
}

/// Everything known about one network address.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostState {
    pub ip: String,
    pub port: u16,
    pub robot_name: Option<String>,
    /// Latches true once the address produced anything but "unreachable"
    pub seen: bool,
    pub health_status: Option<HealthStatus>,
    pub server_health_status: Option<HealthStatus>,
    pub health_error: Option<HealthErrorResponse>,
    pub server_health_error: Option<HealthErrorResponse>,
}

impl HostState {
    /// A fresh, never-polled host attributed to `robot_name`
    pub fn new(ip: impl Into<String>, port: u16, robot_name: impl Into<String>) -> Self {
        Self {
            ip: ip.into(),
            port,
            robot_name: Some(robot_name.into()),
            ..Default::default()
        }
    }

    pub fn address(&self) -> Address {
        Address::new(self.ip.clone(), self.port)
    }
}

/// A robot identity together with its addresses, best address first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryClientRobot {
    pub name: String,
    pub health: Option<HealthResponse>,
    pub server_health: Option<ServerHealthResponse>,
    pub addresses: Vec<HostState>,
}

/// A robot supplied up front to seed the client state.
///
/// Deserializes from a previously emitted [`DiscoveryClientRobot`] as well;
/// only `ip` and `port` of each address are kept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RobotSeed {
    pub name: String,
    #[serde(default)]
    pub health: Option<HealthResponse>,
    #[serde(default)]
    pub server_health: Option<ServerHealthResponse>,
    #[serde(default)]
    pub addresses: Vec<Address>,
}
