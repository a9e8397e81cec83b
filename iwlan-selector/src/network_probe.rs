//! Reports which address families the underlying network currently has a routable local
//! address for, excluding link-local and unique-local ranges.

use std::net::{IpAddr, Ipv6Addr};

use ip_network::Ipv6Network;

/// Link addresses reported by the underlying network, and the derived family availability.
pub trait NetworkProbe: Send + Sync {
    fn local_addresses(&self) -> Vec<IpAddr>;

    fn has_ipv4(&self) -> bool {
        self.local_addresses().iter().any(|a| is_routable(*a) && a.is_ipv4())
    }

    fn has_ipv6(&self) -> bool {
        self.local_addresses().iter().any(|a| is_routable(*a) && a.is_ipv6())
    }
}

fn is_unique_local(addr: Ipv6Addr) -> bool {
    Ipv6Network::new(Ipv6Addr::new(0xfc00, 0, 0, 0, 0, 0, 0, 0), 7)
        .expect("fc00::/7 is a valid network")
        .contains(addr)
}

/// True if `addr` is not link-local and, for IPv6, not unique-local.
pub fn is_routable(addr: IpAddr) -> bool {
    match addr {
        IpAddr::V4(v4) => !v4.is_link_local(),
        IpAddr::V6(v6) => !v6.is_unicast_link_local() && !is_unique_local(v6),
    }
}

/// Simple [`NetworkProbe`] over a fixed address list, used by the daemon when the embedding
/// process already maintains its own link-properties view, and by tests.
pub struct StaticNetworkProbe {
    addresses: Vec<IpAddr>,
}

impl StaticNetworkProbe {
    pub fn new(addresses: Vec<IpAddr>) -> Self {
        Self { addresses }
    }
}

impl NetworkProbe for StaticNetworkProbe {
    fn local_addresses(&self) -> Vec<IpAddr> {
        self.addresses.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn excludes_link_local_v6() {
        let probe = StaticNetworkProbe::new(vec!["fe80::1".parse().unwrap()]);
        assert!(!probe.has_ipv6());
    }

    #[test]
    fn excludes_unique_local_v6() {
        let probe = StaticNetworkProbe::new(vec!["fd00::1".parse().unwrap()]);
        assert!(!probe.has_ipv6());
    }

    #[test]
    fn accepts_global_v6() {
        let probe = StaticNetworkProbe::new(vec!["2001:db8::1".parse().unwrap()]);
        assert!(probe.has_ipv6());
    }

    #[test]
    fn excludes_link_local_v4() {
        let probe = StaticNetworkProbe::new(vec!["169.254.1.1".parse().unwrap()]);
        assert!(!probe.has_ipv4());
    }
}
