use std::sync::Arc;
use shared::types::{Address, HealthErrorResponse, HealthStatus, HostState, RobotState};
use super::{Action, HostsByIp, RobotsByName, State};

/// Pure state transition. Slices that did not change keep their `Arc`.
pub fn apply(state: &State, action: &Action) -> State {
    State {
        robots_by_name: robots_by_name(&state.robots_by_name, action),
        hosts_by_ip: hosts_by_ip(&state.hosts_by_ip, action),
        manual_addresses: manual_addresses(&state.manual_addresses, action),
    }
}

/// OK if the endpoint returned a body, NOT_OK if it answered with an HTTP
/// error, UNREACHABLE otherwise.
pub fn health_status(has_response: bool, error: Option<&HealthErrorResponse>) -> HealthStatus {
    if has_response {
        return HealthStatus::Ok;
    }

    match error {
        Some(e) if e.status >= 400 => HealthStatus::NotOk,
        _ => HealthStatus::Unreachable,
    }
}

fn replace_if_changed<T: PartialEq>(prev: &Arc<T>, next: T) -> Arc<T> {
    if **prev == next {
        Arc::clone(prev)
    } else {
        Arc::new(next)
    }
}

fn non_empty(name: &str) -> Option<&str> {
    (!name.is_empty()).then_some(name)
}

fn robots_by_name(state: &Arc<RobotsByName>, action: &Action) -> Arc<RobotsByName> {
    match action {
        Action::InitializeState {
            initial_robots: Some(robots),
            ..
        } => {
            let next: RobotsByName = robots
                .iter()
                .map(|seed| {
                    let robot = RobotState {
                        name: seed.name.clone(),
                        health: seed.health.clone(),
                        server_health: seed.server_health.clone(),
                    };
                    (seed.name.clone(), robot)
                })
                .collect();

            replace_if_changed(state, next)
        }

        Action::RemoveRobot { name } => {
            if !state.contains_key(name) {
                return Arc::clone(state);
            }

            let mut next = (**state).clone();
            next.shift_remove(name);
            Arc::new(next)
        }

        Action::ServiceFound(service) => {
            if service.ip.is_empty() || service.name.is_empty() || state.contains_key(&service.name) {
                return Arc::clone(state);
            }

            let mut next = (**state).clone();
            next.insert(
                service.name.clone(),
                RobotState {
                    name: service.name.clone(),
                    health: None,
                    server_health: None,
                },
            );
            Arc::new(next)
        }

        Action::HealthPolled(result) => {
            let name = result
                .server_health
                .as_ref()
                .and_then(|h| non_empty(&h.name))
                .or_else(|| result.health.as_ref().and_then(|h| non_empty(&h.name)));

            let Some(name) = name else {
                return Arc::clone(state);
            };

            let prev = state.get(name);
            let robot = RobotState {
                name: name.to_string(),
                health: result
                    .health
                    .clone()
                    .or_else(|| prev.and_then(|r| r.health.clone())),
                server_health: result
                    .server_health
                    .clone()
                    .or_else(|| prev.and_then(|r| r.server_health.clone())),
            };

            if prev == Some(&robot) {
                return Arc::clone(state);
            }

            let mut next = (**state).clone();
            next.insert(name.to_string(), robot);
            Arc::new(next)
        }

        _ => Arc::clone(state),
    }
}

fn hosts_by_ip(state: &Arc<HostsByIp>, action: &Action) -> Arc<HostsByIp> {
    match action {
        Action::InitializeState {
            initial_robots: Some(robots),
            ..
        } => {
            let next: HostsByIp = robots
                .iter()
                .flat_map(|seed| {
                    seed.addresses
                        .iter()
                        .map(|addr| (addr.ip.clone(), HostState::new(&addr.ip, addr.port, &seed.name)))
                })
                .collect();

            replace_if_changed(state, next)
        }

        Action::RemoveRobot { name } => {
            let owned = state
                .values()
                .filter(|host| host.robot_name.as_deref() == Some(name.as_str()))
                .count();

            // A lone address is kept: it may belong to a service that was
            // found again right after the removal was requested.
            if owned <= 1 {
                return Arc::clone(state);
            }

            let mut next = (**state).clone();
            next.retain(|_, host| host.robot_name.as_deref() != Some(name.as_str()));
            Arc::new(next)
        }

        Action::ServiceFound(service) => {
            if service.ip.is_empty() || service.name.is_empty() {
                return Arc::clone(state);
            }

            let host = state.get(&service.ip);
            let same_robot = host
                .map(|h| h.robot_name.as_deref() == Some(service.name.as_str()))
                .unwrap_or(false);

            let mut next_host = HostState::new(&service.ip, service.port, &service.name);
            next_host.seen = true;
            if let (true, Some(prev)) = (same_robot, host) {
                next_host.health_status = prev.health_status;
                next_host.server_health_status = prev.server_health_status;
                next_host.health_error = prev.health_error.clone();
                next_host.server_health_error = prev.server_health_error.clone();
            }

            if host == Some(&next_host) {
                return Arc::clone(state);
            }

            let mut next = (**state).clone();
            next.insert(service.ip.clone(), next_host);
            Arc::new(next)
        }

        Action::HealthPolled(result) => {
            if result.ip.is_empty() {
                return Arc::clone(state);
            }

            let host = state.get(&result.ip);
            let robot_name = result
                .server_health
                .as_ref()
                .and_then(|h| non_empty(&h.name))
                .or_else(|| result.health.as_ref().and_then(|h| non_empty(&h.name)))
                .map(str::to_string)
                .or_else(|| host.and_then(|h| h.robot_name.clone()));

            let status = health_status(result.health.is_some(), result.health_error.as_ref());
            let server_status = health_status(
                result.server_health.is_some(),
                result.server_health_error.as_ref(),
            );
            let seen = host.map(|h| h.seen).unwrap_or(false)
                || status != HealthStatus::Unreachable
                || server_status != HealthStatus::Unreachable;

            let next_host = HostState {
                ip: result.ip.clone(),
                port: result.port,
                robot_name,
                seen,
                health_status: Some(status),
                server_health_status: Some(server_status),
                health_error: result.health_error.clone(),
                server_health_error: result.server_health_error.clone(),
            };

            // a good poll means this robot's never-seen, fully unreachable
            // siblings are leftovers we'd otherwise poll forever
            let address_is_good =
                status == HealthStatus::Ok && server_status == HealthStatus::Ok;
            let removals: Vec<&String> = if address_is_good {
                state
                    .iter()
                    .filter(|(ip, target)| {
                        **ip != result.ip
                            && target.robot_name == next_host.robot_name
                            && !target.seen
                            && target.health_status == Some(HealthStatus::Unreachable)
                            && target.server_health_status == Some(HealthStatus::Unreachable)
                    })
                    .map(|(ip, _)| ip)
                    .collect()
            } else {
                Vec::new()
            };

            if host == Some(&next_host) && removals.is_empty() {
                return Arc::clone(state);
            }

            let mut next = (**state).clone();
            for ip in removals {
                next.shift_remove(ip);
            }
            next.insert(result.ip.clone(), next_host);
            Arc::new(next)
        }

        _ => Arc::clone(state),
    }
}

fn manual_addresses(state: &Arc<Vec<Address>>, action: &Action) -> Arc<Vec<Address>> {
    match action {
        Action::InitializeState {
            manual_addresses: Some(addresses),
            ..
        } => replace_if_changed(state, addresses.clone()),
        _ => Arc::clone(state),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{DiscoveredService, PollResult};
    use serde_json::json;
    use shared::protocol::FETCH_ERROR_STATUS;
    use shared::types::{HealthResponse, RobotSeed, ServerHealthResponse};

    fn found(ip: &str, name: &str) -> Action {
        Action::ServiceFound(DiscoveredService::new(ip, 31950, name))
    }

    fn polled_ok(ip: &str, name: &str) -> Action {
        Action::HealthPolled(PollResult {
            ip: ip.to_string(),
            port: 31950,
            health: Some(HealthResponse::named(name)),
            server_health: Some(ServerHealthResponse::named(name)),
            health_error: None,
            server_health_error: None,
        })
    }

    fn unreachable_error() -> HealthErrorResponse {
        HealthErrorResponse {
            status: FETCH_ERROR_STATUS,
            body: json!("connection refused"),
        }
    }

    fn polled_unreachable(ip: &str) -> Action {
        Action::HealthPolled(PollResult {
            ip: ip.to_string(),
            port: 31950,
            health: None,
            server_health: None,
            health_error: Some(unreachable_error()),
            server_health_error: Some(unreachable_error()),
        })
    }

    fn run(actions: &[Action]) -> State {
        actions
            .iter()
            .fold(State::default(), |state, action| apply(&state, action))
    }

    fn seed(name: &str, ips: &[&str]) -> RobotSeed {
        RobotSeed {
            name: name.to_string(),
            health: None,
            server_health: None,
            addresses: ips.iter().map(|ip| Address::new(*ip, 31950)).collect(),
        }
    }

    #[test]
    fn test_health_status_classification() {
        let not_found = HealthErrorResponse { status: 404, body: json!({"message": "nope"}) };
        let redirect = HealthErrorResponse { status: 302, body: json!("") };

        assert_eq!(health_status(true, None), HealthStatus::Ok);
        assert_eq!(health_status(true, Some(&not_found)), HealthStatus::Ok);
        assert_eq!(health_status(false, Some(&not_found)), HealthStatus::NotOk);
        assert_eq!(health_status(false, Some(&redirect)), HealthStatus::Unreachable);
        assert_eq!(health_status(false, Some(&unreachable_error())), HealthStatus::Unreachable);
        assert_eq!(health_status(false, None), HealthStatus::Unreachable);
    }

    #[test]
    fn test_initialize_state_seeds_robots_and_hosts() {
        let mut robot = seed("opentrons-1", &["10.0.0.1", "10.0.0.2"]);
        robot.health = Some(HealthResponse::named("opentrons-1"));

        let state = run(&[Action::InitializeState {
            initial_robots: Some(vec![robot]),
            manual_addresses: Some(vec![Address::new("10.0.0.9", 31950)]),
        }]);

        let robot = &state.robots_by_name["opentrons-1"];
        assert_eq!(robot.health, Some(HealthResponse::named("opentrons-1")));
        assert_eq!(robot.server_health, None);

        let ips: Vec<&str> = state.hosts_by_ip.keys().map(String::as_str).collect();
        assert_eq!(ips, vec!["10.0.0.1", "10.0.0.2"]);
        assert_eq!(
            state.hosts_by_ip["10.0.0.2"],
            HostState::new("10.0.0.2", 31950, "opentrons-1")
        );
        assert_eq!(*state.manual_addresses, vec![Address::new("10.0.0.9", 31950)]);
    }

    #[test]
    fn test_initialize_state_without_fields_keeps_state() {
        let state = run(&[found("10.0.0.1", "opentrons-1")]);
        let next = apply(
            &state,
            &Action::InitializeState {
                initial_robots: None,
                manual_addresses: None,
            },
        );

        assert!(next.ptr_eq(&state));
    }

    #[test]
    fn test_initialize_state_with_identical_seed_is_noop() {
        let init = Action::InitializeState {
            initial_robots: Some(vec![seed("opentrons-1", &["10.0.0.1"])]),
            manual_addresses: Some(vec![Address::new("10.0.0.9", 31950)]),
        };
        let state = run(&[init.clone()]);
        let next = apply(&state, &init);

        assert!(next.ptr_eq(&state));
    }

    #[test]
    fn test_service_found_creates_robot_and_host() {
        let state = run(&[found("10.0.0.5", "bot-1")]);

        assert_eq!(
            state.robots_by_name["bot-1"],
            RobotState { name: "bot-1".to_string(), health: None, server_health: None }
        );

        let host = &state.hosts_by_ip["10.0.0.5"];
        assert!(host.seen);
        assert_eq!(host.robot_name.as_deref(), Some("bot-1"));
        assert_eq!(host.health_status, None);
    }

    #[test]
    fn test_service_found_again_is_noop() {
        let state = run(&[found("10.0.0.5", "bot-1"), polled_ok("10.0.0.5", "bot-1")]);
        let next = apply(&state, &found("10.0.0.5", "bot-1"));

        assert!(next.ptr_eq(&state));
        assert_eq!(next.hosts_by_ip["10.0.0.5"].health_status, Some(HealthStatus::Ok));
    }

    #[test]
    fn test_service_found_under_new_name_resets_health() {
        let state = run(&[
            found("10.0.0.5", "bot-1"),
            polled_ok("10.0.0.5", "bot-1"),
            found("10.0.0.5", "bot-2"),
        ]);

        let host = &state.hosts_by_ip["10.0.0.5"];
        assert_eq!(host.robot_name.as_deref(), Some("bot-2"));
        assert_eq!(host.health_status, None);
        assert_eq!(host.server_health_status, None);
        assert!(host.seen);
        assert!(state.robots_by_name.contains_key("bot-1"));
        assert!(state.robots_by_name.contains_key("bot-2"));
    }

    #[test]
    fn test_service_found_updates_port() {
        let state = run(&[found("10.0.0.5", "bot-1")]);
        let next = apply(
            &state,
            &Action::ServiceFound(DiscoveredService::new("10.0.0.5", 31951, "bot-1")),
        );

        assert_eq!(next.hosts_by_ip["10.0.0.5"].port, 31951);
        assert!(Arc::ptr_eq(&next.robots_by_name, &state.robots_by_name));
    }

    #[test]
    fn test_service_found_without_name_is_dropped() {
        let state = State::default();
        let next = apply(&state, &found("10.0.0.5", ""));
        assert!(next.ptr_eq(&state));

        let next = apply(&state, &found("", "bot-1"));
        assert!(next.ptr_eq(&state));
    }

    #[test]
    fn test_health_polled_ok_scenario() {
        let state = run(&[found("10.0.0.5", "bot-1"), polled_ok("10.0.0.5", "bot-1")]);

        assert_eq!(
            state.robots_by_name["bot-1"],
            RobotState {
                name: "bot-1".to_string(),
                health: Some(HealthResponse::named("bot-1")),
                server_health: Some(ServerHealthResponse::named("bot-1")),
            }
        );
        assert_eq!(
            state.hosts_by_ip["10.0.0.5"],
            HostState {
                ip: "10.0.0.5".to_string(),
                port: 31950,
                robot_name: Some("bot-1".to_string()),
                seen: true,
                health_status: Some(HealthStatus::Ok),
                server_health_status: Some(HealthStatus::Ok),
                health_error: None,
                server_health_error: None,
            }
        );
    }

    #[test]
    fn test_health_polled_repeat_is_noop() {
        let state = run(&[found("10.0.0.5", "bot-1"), polled_ok("10.0.0.5", "bot-1")]);
        let next = apply(&state, &polled_ok("10.0.0.5", "bot-1"));

        assert!(next.ptr_eq(&state));
    }

    #[test]
    fn test_health_polled_prefers_server_health_name() {
        let state = run(&[Action::HealthPolled(PollResult {
            ip: "10.0.0.5".to_string(),
            port: 31950,
            health: Some(HealthResponse::named("from-health")),
            server_health: Some(ServerHealthResponse::named("from-server")),
            health_error: None,
            server_health_error: None,
        })]);

        assert_eq!(
            state.hosts_by_ip["10.0.0.5"].robot_name.as_deref(),
            Some("from-server")
        );
        assert!(state.robots_by_name.contains_key("from-server"));
        assert!(!state.robots_by_name.contains_key("from-health"));
    }

    #[test]
    fn test_health_polled_keeps_prior_name_and_health_when_missing() {
        let state = run(&[found("10.0.0.5", "bot-1"), polled_ok("10.0.0.5", "bot-1")]);
        let next = apply(
            &state,
            &Action::HealthPolled(PollResult {
                ip: "10.0.0.5".to_string(),
                port: 31950,
                health: None,
                server_health: Some(ServerHealthResponse::named("bot-1")),
                health_error: Some(HealthErrorResponse { status: 503, body: json!({}) }),
                server_health_error: None,
            }),
        );

        let host = &next.hosts_by_ip["10.0.0.5"];
        assert_eq!(host.health_status, Some(HealthStatus::NotOk));
        assert_eq!(host.server_health_status, Some(HealthStatus::Ok));

        // the last good /health body stays on the identity
        assert_eq!(next.robots_by_name["bot-1"].health, Some(HealthResponse::named("bot-1")));
        assert!(Arc::ptr_eq(&next.robots_by_name, &state.robots_by_name));
    }

    #[test]
    fn test_health_polled_unreachable_keeps_robot_name() {
        let state = run(&[found("10.0.0.5", "bot-1"), polled_unreachable("10.0.0.5")]);

        let host = &state.hosts_by_ip["10.0.0.5"];
        assert_eq!(host.robot_name.as_deref(), Some("bot-1"));
        assert_eq!(host.health_status, Some(HealthStatus::Unreachable));
        assert_eq!(host.health_error, Some(unreachable_error()));
    }

    #[test]
    fn test_health_polled_classifies_each_endpoint_separately() {
        let state = run(&[
            found("10.0.0.5", "bot-1"),
            Action::HealthPolled(PollResult {
                ip: "10.0.0.5".to_string(),
                port: 31950,
                health: Some(HealthResponse::named("bot-1")),
                server_health: None,
                health_error: None,
                server_health_error: Some(unreachable_error()),
            }),
        ]);

        let host = &state.hosts_by_ip["10.0.0.5"];
        assert_eq!(host.health_status, Some(HealthStatus::Ok));
        assert_eq!(host.server_health_status, Some(HealthStatus::Unreachable));
        assert_eq!(host.health_error, None);
        assert_eq!(host.server_health_error, Some(unreachable_error()));
        assert!(host.seen);
    }

    #[test]
    fn test_health_polled_unknown_address_is_added() {
        let state = run(&[polled_unreachable("10.0.0.7")]);

        let host = &state.hosts_by_ip["10.0.0.7"];
        assert_eq!(host.robot_name, None);
        assert!(!host.seen);
        assert!(state.robots_by_name.is_empty());
    }

    #[test]
    fn test_seen_never_unlatches() {
        let state = run(&[
            found("10.0.0.5", "bot-1"),
            polled_unreachable("10.0.0.5"),
            polled_unreachable("10.0.0.5"),
        ]);
        assert!(state.hosts_by_ip["10.0.0.5"].seen);

        let state = run(&[
            polled_unreachable("10.0.0.6"),
            polled_ok("10.0.0.6", "bot-2"),
            polled_unreachable("10.0.0.6"),
        ]);
        assert!(state.hosts_by_ip["10.0.0.6"].seen);
    }

    #[test]
    fn test_not_ok_marks_seen() {
        let state = run(&[Action::HealthPolled(PollResult {
            ip: "10.0.0.5".to_string(),
            port: 31950,
            health: None,
            server_health: None,
            health_error: Some(HealthErrorResponse { status: 500, body: json!({}) }),
            server_health_error: Some(unreachable_error()),
        })]);

        assert!(state.hosts_by_ip["10.0.0.5"].seen);
    }

    #[test]
    fn test_good_poll_evicts_stale_siblings() {
        let state = run(&[
            Action::InitializeState {
                initial_robots: Some(vec![seed("bot-1", &["10.0.0.1", "10.0.0.2", "10.0.0.3"])]),
                manual_addresses: None,
            },
            polled_unreachable("10.0.0.1"),
            polled_unreachable("10.0.0.2"),
            found("10.0.0.4", "other"),
            polled_unreachable("10.0.0.4"),
        ]);
        assert_eq!(state.hosts_by_ip.len(), 4);

        let next = apply(&state, &polled_ok("10.0.0.3", "bot-1"));
        let ips: Vec<&str> = next.hosts_by_ip.keys().map(String::as_str).collect();

        // the other robot's address is seen (found via mDNS) and unrelated
        assert_eq!(ips, vec!["10.0.0.3", "10.0.0.4"]);
    }

    #[test]
    fn test_good_poll_keeps_seen_or_unpolled_siblings() {
        let state = run(&[
            Action::InitializeState {
                initial_robots: Some(vec![seed("bot-1", &["10.0.0.1", "10.0.0.2"])]),
                manual_addresses: None,
            },
            found("10.0.0.3", "bot-1"),
            polled_unreachable("10.0.0.3"),
        ]);

        let next = apply(&state, &polled_ok("10.0.0.1", "bot-1"));

        // 10.0.0.2 was never polled, 10.0.0.3 was seen
        assert!(next.hosts_by_ip.contains_key("10.0.0.2"));
        assert!(next.hosts_by_ip.contains_key("10.0.0.3"));
    }

    #[test]
    fn test_remove_robot_with_many_addresses() {
        let state = run(&[
            found("10.0.0.1", "bot-1"),
            found("10.0.0.2", "bot-1"),
            found("10.0.0.3", "bot-2"),
        ]);
        let next = apply(&state, &Action::RemoveRobot { name: "bot-1".to_string() });

        assert!(!next.robots_by_name.contains_key("bot-1"));
        let ips: Vec<&str> = next.hosts_by_ip.keys().map(String::as_str).collect();
        assert_eq!(ips, vec!["10.0.0.3"]);
    }

    #[test]
    fn test_remove_robot_with_single_address_keeps_host() {
        let state = run(&[found("10.0.0.5", "bot-1"), polled_ok("10.0.0.5", "bot-1")]);
        let next = apply(&state, &Action::RemoveRobot { name: "bot-1".to_string() });

        assert!(!next.robots_by_name.contains_key("bot-1"));
        assert!(Arc::ptr_eq(&next.hosts_by_ip, &state.hosts_by_ip));
        assert!(next.hosts_by_ip.contains_key("10.0.0.5"));
    }

    #[test]
    fn test_remove_unknown_robot_is_noop() {
        let state = run(&[found("10.0.0.5", "bot-1")]);
        let next = apply(&state, &Action::RemoveRobot { name: "nope".to_string() });

        assert!(next.ptr_eq(&state));
    }

    #[test]
    fn test_robot_order_survives_removal() {
        let state = run(&[
            found("10.0.0.1", "a"),
            found("10.0.0.2", "b"),
            found("10.0.0.3", "c"),
        ]);
        let next = apply(&state, &Action::RemoveRobot { name: "b".to_string() });

        let names: Vec<&str> = next.robots_by_name.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["a", "c"]);
    }
}
