/// Port the robot HTTP server listens on
pub const DEFAULT_PORT: u16 = 31950;

/// mDNS service type robots advertise themselves under
pub const ROBOT_SERVICE_TYPE: &str = "_http._tcp.local.";

/// Robot API server health endpoint
pub const HEALTH_PATH: &str = "/health";

/// Update server health endpoint
pub const SERVER_HEALTH_PATH: &str = "/server/update/health";

/// Version header robots require on every request
pub const VERSION_HEADER: &str = "Opentrons-Version";
pub const VERSION_HEADER_ANY: &str = "*";

/// Status carried by a [`crate::types::HealthErrorResponse`] when the request
/// never produced an HTTP response
pub const FETCH_ERROR_STATUS: i32 = -1;

/// API path prefix
pub const API_PREFIX: &str = "/v1";
