//! CIDR network rules for the access-control gate

use crate::error::RuleParseError;
use serde::Serialize;
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

/// Whether a matching network is always admitted or always refused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleAction {
    Allow,
    Deny,
}

/// An IPv4 or IPv6 network block.
///
/// A bare address is accepted as a host route (/32 or /128). Host bits set
/// below the prefix are rejected, so `10.0.0.1/8` is a configuration error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IpNetwork {
    addr: IpAddr,
    prefix_len: u8,
}

impl IpNetwork {
    pub fn new(addr: IpAddr, prefix_len: u8) -> Result<Self, RuleParseError> {
        let max = max_prefix(&addr);
        if prefix_len > max {
            return Err(RuleParseError {
                rule: format!("{}/{}", addr, prefix_len),
                reason: format!("prefix length must be at most {}", max),
            });
        }
        if mask_bits(&addr, prefix_len) != addr_bits(&addr) {
            return Err(RuleParseError {
                rule: format!("{}/{}", addr, prefix_len),
                reason: "host bits set".to_string(),
            });
        }
        Ok(Self { addr, prefix_len })
    }

    pub fn prefix_len(&self) -> u8 {
        self.prefix_len
    }

    /// Whether `ip` falls inside this network. Families never match each other.
    pub fn contains(&self, ip: &IpAddr) -> bool {
        let ip = ip.to_canonical();
        match (self.addr, ip) {
            (IpAddr::V4(_), IpAddr::V4(_)) | (IpAddr::V6(_), IpAddr::V6(_)) => {
                mask_bits(&ip, self.prefix_len) == addr_bits(&self.addr)
            }
            _ => false,
        }
    }
}

impl FromStr for IpNetwork {
    type Err = RuleParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let error = |reason: &str| RuleParseError {
            rule: s.to_string(),
            reason: reason.to_string(),
        };

        let (addr_part, prefix_part) = match s.split_once('/') {
            Some((addr, prefix)) => (addr, Some(prefix)),
            None => (s, None),
        };

        let addr: IpAddr = addr_part
            .parse()
            .map_err(|_| error("not an IP address"))?;
        let addr = addr.to_canonical();
        let prefix_len = match prefix_part {
            Some(p) => p.parse::<u8>().map_err(|_| error("invalid prefix length"))?,
            None => max_prefix(&addr),
        };

        IpNetwork::new(addr, prefix_len).map_err(|e| RuleParseError {
            rule: s.to_string(),
            reason: e.reason,
        })
    }
}

impl fmt::Display for IpNetwork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr, self.prefix_len)
    }
}

fn max_prefix(addr: &IpAddr) -> u8 {
    match addr {
        IpAddr::V4(_) => 32,
        IpAddr::V6(_) => 128,
    }
}

fn addr_bits(addr: &IpAddr) -> u128 {
    match addr {
        IpAddr::V4(v4) => u32::from(*v4) as u128,
        IpAddr::V6(v6) => u128::from(*v6),
    }
}

fn mask_bits(addr: &IpAddr, prefix_len: u8) -> u128 {
    let bits = addr_bits(addr);
    let width = max_prefix(addr) as u32;
    let prefix = prefix_len as u32;
    if prefix == 0 {
        return 0;
    }
    let host_bits = width - prefix;
    (bits >> host_bits) << host_bits
}

/// A CIDR block tagged allow or deny
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkRule {
    pub network: IpNetwork,
    pub action: RuleAction,
}

/// Immutable set of rules sharing one action
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    networks: Vec<IpNetwork>,
}

impl RuleSet {
    /// Parse a list of CIDR strings. Any invalid entry fails the whole set.
    pub fn parse<S: AsRef<str>>(entries: &[S]) -> Result<Self, RuleParseError> {
        let networks = entries
            .iter()
            .map(|e| e.as_ref().parse::<IpNetwork>())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { networks })
    }

    pub fn matches(&self, ip: &IpAddr) -> bool {
        self.networks.iter().any(|net| net.contains(ip))
    }

    pub fn len(&self) -> usize {
        self.networks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.networks.is_empty()
    }

    /// Tag every network with `action`
    pub fn rules(&self, action: RuleAction) -> impl Iterator<Item = NetworkRule> + '_ {
        self.networks
            .iter()
            .map(move |&network| NetworkRule { network, action })
    }
}
