//! Host tickets for joining a relay group.
//!
//! A host ticket contains everything a peer needs to reach a group host
//! over the radio link: the group id and the host's network address.
//! Tickets are encoded as `aidmesh-host:{base58}` strings for easy sharing
//! (QR code, shouted across a room). How the ticket travels is the
//! discovery problem and out of scope here.

use std::net::SocketAddr;

use iroh::{EndpointAddr, PublicKey, RelayUrl};
use serde::{Deserialize, Serialize};

use crate::error::ReportError;
use crate::types::GroupId;

/// Prefix for encoded host ticket strings
const TICKET_PREFIX: &str = "aidmesh-host:";

/// Current ticket format version
const TICKET_VERSION: u8 = 1;

/// Serializable representation of a host's network address.
///
/// A portable format that can be shared in tickets, containing all
/// information needed to connect to the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostAddrBytes {
    /// Host's public key (32 bytes)
    pub host_id: [u8; 32],
    /// Optional relay URL for NAT traversal
    pub relay_url: Option<String>,
    /// Direct socket addresses as strings (e.g., "192.168.1.1:4433")
    pub direct_addresses: Vec<String>,
}

impl HostAddrBytes {
    /// Create from an iroh EndpointAddr
    pub fn from_endpoint_addr(addr: &EndpointAddr) -> Self {
        Self {
            host_id: addr.id.as_bytes().to_owned(),
            relay_url: addr.relay_urls().next().map(|url| url.to_string()),
            direct_addresses: addr.ip_addrs().map(|a| a.to_string()).collect(),
        }
    }

    /// Convert back to an iroh EndpointAddr
    ///
    /// # Errors
    ///
    /// Returns `ReportError::Validation` if the public key, relay URL, or a
    /// socket address is malformed.
    pub fn to_endpoint_addr(&self) -> Result<EndpointAddr, ReportError> {
        let public_key = PublicKey::from_bytes(&self.host_id)
            .map_err(|e| ReportError::Validation(format!("invalid host key: {}", e)))?;

        let mut addr = EndpointAddr::new(public_key);

        if let Some(ref relay_str) = self.relay_url {
            let relay_url: RelayUrl = relay_str
                .parse()
                .map_err(|e| ReportError::Validation(format!("invalid relay URL: {}", e)))?;
            addr = addr.with_relay_url(relay_url);
        }

        for addr_str in &self.direct_addresses {
            let socket_addr: SocketAddr = addr_str
                .parse()
                .map_err(|e| ReportError::Validation(format!("invalid socket address: {}", e)))?;
            addr = addr.with_ip_addr(socket_addr);
        }

        Ok(addr)
    }
}

impl From<&EndpointAddr> for HostAddrBytes {
    fn from(addr: &EndpointAddr) -> Self {
        Self::from_endpoint_addr(addr)
    }
}

/// Everything a peer needs to join a host's relay group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostTicket {
    /// Ticket format version
    pub version: u8,
    /// The host's peer group
    pub group: GroupId,
    /// How to reach the host
    pub host: HostAddrBytes,
}

impl HostTicket {
    /// Create a ticket for the given group and host address.
    pub fn new(group: GroupId, host: HostAddrBytes) -> Self {
        Self {
            version: TICKET_VERSION,
            group,
            host,
        }
    }

    /// Encode as an `aidmesh-host:{base58}` string.
    pub fn encode(&self) -> Result<String, ReportError> {
        let bytes = postcard::to_allocvec(self)
            .map_err(|e| ReportError::Serialization(format!("failed to encode ticket: {}", e)))?;
        Ok(format!(
            "{}{}",
            TICKET_PREFIX,
            bs58::encode(&bytes).into_string()
        ))
    }

    /// Decode from an `aidmesh-host:{base58}` string.
    pub fn decode(s: &str) -> Result<Self, ReportError> {
        let data = s
            .strip_prefix(TICKET_PREFIX)
            .ok_or_else(|| ReportError::Validation("missing ticket prefix".to_string()))?;
        let bytes = bs58::decode(data)
            .into_vec()
            .map_err(|e| ReportError::Validation(format!("invalid ticket encoding: {}", e)))?;
        let ticket: Self = postcard::from_bytes(&bytes)
            .map_err(|e| ReportError::Serialization(format!("invalid ticket: {}", e)))?;
        if ticket.version != TICKET_VERSION {
            return Err(ReportError::Validation(format!(
                "unsupported ticket version {}",
                ticket.version
            )));
        }
        Ok(ticket)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr_bytes() -> HostAddrBytes {
        HostAddrBytes {
            host_id: [7u8; 32],
            relay_url: None,
            direct_addresses: vec!["192.168.1.10:4433".to_string()],
        }
    }

    #[test]
    fn test_ticket_encode_decode_roundtrip() {
        let ticket = HostTicket::new(GroupId::new(), addr_bytes());
        let encoded = ticket.encode().expect("Failed to encode");
        assert!(encoded.starts_with(TICKET_PREFIX));

        let decoded = HostTicket::decode(&encoded).expect("Failed to decode");
        assert_eq!(decoded, ticket);
    }

    #[test]
    fn test_decode_rejects_missing_prefix() {
        let err = HostTicket::decode("not-a-ticket").unwrap_err();
        assert!(matches!(err, ReportError::Validation(_)));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let err = HostTicket::decode("aidmesh-host:!!!not-base58!!!").unwrap_err();
        assert!(matches!(err, ReportError::Validation(_)));
    }

    #[test]
    fn test_addr_bytes_rejects_bad_socket_addr() {
        let mut bytes = addr_bytes();
        bytes.direct_addresses = vec!["not an address".to_string()];
        // Use a real key so the failure comes from the address parse
        let key = iroh::SecretKey::generate(&mut rand::rng()).public();
        bytes.host_id = *key.as_bytes();
        assert!(matches!(
            bytes.to_endpoint_addr(),
            Err(ReportError::Validation(_))
        ));
    }
}
