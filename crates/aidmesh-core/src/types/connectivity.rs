//! Connectivity snapshot passed into router and proxy decisions.
//!
//! Always derived, never persisted, and never read from a mutable global:
//! every decision takes an explicit [`ConnectivityState`] value so the
//! routing logic stays a deterministic function of its inputs.

use serde::{Deserialize, Serialize};

/// Snapshot of the device's current reachability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ConnectivityState {
    /// The device can reach the backend over the internet
    pub has_internet: bool,
    /// The device is currently acting as a group host
    pub is_hosting: bool,
    /// The device is connected to a group host over the radio link
    pub is_connected_to_host: bool,
}

impl ConnectivityState {
    /// Fully offline: no internet, not hosting, no host reachable
    pub fn offline() -> Self {
        Self::default()
    }

    /// Online with direct backend reachability only
    pub fn online() -> Self {
        Self {
            has_internet: true,
            ..Self::default()
        }
    }

    /// Whether any submission route other than the offline queue exists
    pub fn any_route(&self) -> bool {
        self.has_internet || self.is_hosting || self.is_connected_to_host
    }
}

impl std::fmt::Display for ConnectivityState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "internet={} hosting={} host_link={}",
            self.has_internet, self.is_hosting, self.is_connected_to_host
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offline_has_no_route() {
        assert!(!ConnectivityState::offline().any_route());
    }

    #[test]
    fn test_any_route_variants() {
        assert!(ConnectivityState::online().any_route());
        assert!(ConnectivityState {
            is_connected_to_host: true,
            ..Default::default()
        }
        .any_route());
        assert!(ConnectivityState {
            is_hosting: true,
            ..Default::default()
        }
        .any_route());
    }
}
