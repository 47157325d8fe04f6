//! Pluggable providers for the two pieces of host information the resolver
//! and agent need from the OS: the system's configured nameservers, and
//! this host's own local addresses. Full OS-specific interface enumeration
//! (netlink, `getifaddrs`, IOCTLs) is out of scope; these defaults cover the
//! common case and both traits exist precisely so a host can swap in a
//! platform-specific implementation without touching the rest of the crate.
use std::fs;
use std::net::{IpAddr, Ipv4Addr, UdpSocket};

use log::warn;

use crate::error::{DnsError, DnsResult};

/// Supplies the nameserver addresses to use for unicast resolution.
pub trait SystemResolvers {
    fn resolvers(&self) -> DnsResult<Vec<IpAddr>>;
}

/// One address bound to a local interface, as reported by a
/// `LocalAddresses` provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalAddress {
    /// Interface name, e.g. `eth0`. Providers that can't resolve a name
    /// (such as the UDP-connect probe) use a synthetic placeholder.
    pub name: String,
    pub addr: IpAddr,
    /// Whether the interface is currently up. Down interfaces are reported
    /// rather than omitted so a caller can see why an address was skipped.
    pub up: bool,
}

/// Supplies this host's own local addresses, used by the service agent to
/// filter out responses that originated from itself and to pick a
/// multicast-join interface.
pub trait LocalAddresses {
    fn local_addresses(&self) -> DnsResult<Vec<LocalAddress>>;
}

/// Parses `nameserver` lines out of `/etc/resolv.conf`, the same file every
/// POSIX resolver library reads. Falls back to the public `1.1.1.1`
/// resolver when the file is absent or empty, so a fresh container with no
/// resolv.conf still gets a usable default.
#[derive(Debug, Clone)]
pub struct ResolvConfResolvers {
    path: String,
}

impl ResolvConfResolvers {
    pub fn new() -> Self {
        ResolvConfResolvers {
            path: "/etc/resolv.conf".to_owned(),
        }
    }

    /// Build a provider reading a custom path, for testing or containers
    /// with a nonstandard resolver config location.
    pub fn at_path<S: Into<String>>(path: S) -> Self {
        ResolvConfResolvers { path: path.into() }
    }
}

impl Default for ResolvConfResolvers {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemResolvers for ResolvConfResolvers {
    fn resolvers(&self) -> DnsResult<Vec<IpAddr>> {
        let mut addrs = Vec::new();

        if let Ok(content) = fs::read_to_string(&self.path) {
            for line in content.lines() {
                let line = line.trim();
                if let Some(rest) = line.strip_prefix("nameserver") {
                    if let Some(addr) = rest.split_whitespace().next() {
                        match addr.parse() {
                            Ok(ip) => addrs.push(ip),
                            Err(_) => warn!("ignoring unparsable nameserver line: {}", line),
                        }
                    }
                }
            }
        }

        if addrs.is_empty() {
            addrs.push(IpAddr::V4(Ipv4Addr::new(1, 1, 1, 1)));
        }

        Ok(addrs)
    }
}

/// Discovers this host's local address by connecting a UDP socket to a
/// well-known remote endpoint and reading back the address the kernel
/// picked for the connection; no datagram is actually exchanged. This is
/// the portable substitute for full interface enumeration.
#[derive(Debug, Clone)]
pub struct ConnectProbeAddresses {
    probe_targets: Vec<(IpAddr, u16)>,
}

impl ConnectProbeAddresses {
    pub fn new() -> Self {
        ConnectProbeAddresses {
            probe_targets: vec![(IpAddr::V4(Ipv4Addr::new(8, 8, 8, 8)), 80)],
        }
    }
}

impl Default for ConnectProbeAddresses {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalAddresses for ConnectProbeAddresses {
    fn local_addresses(&self) -> DnsResult<Vec<LocalAddress>> {
        let mut addrs = Vec::new();

        for (target, port) in &self.probe_targets {
            let socket = UdpSocket::bind("0.0.0.0:0")?;
            if socket.connect((*target, *port)).is_ok() {
                if let Ok(local) = socket.local_addr() {
                    // The probe can't name the interface or see its carrier
                    // state; a successful connect is the only signal we
                    // have, so the interface is reported up unconditionally.
                    addrs.push(LocalAddress {
                        name: "probe0".to_owned(),
                        addr: local.ip(),
                        up: true,
                    });
                }
            }
        }

        if addrs.is_empty() {
            return Err(DnsError::NoResolver);
        }
        Ok(addrs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parses_nameserver_lines() {
        let mut tmp = std::env::temp_dir();
        tmp.push("dnssd_test_resolv.conf");
        {
            let mut f = fs::File::create(&tmp).unwrap();
            writeln!(f, "# comment").unwrap();
            writeln!(f, "nameserver 9.9.9.9").unwrap();
            writeln!(f, "nameserver 1.0.0.1").unwrap();
        }

        let provider = ResolvConfResolvers::at_path(tmp.to_str().unwrap());
        let resolvers = provider.resolvers().unwrap();
        assert_eq!(
            resolvers,
            vec![
                IpAddr::V4(Ipv4Addr::new(9, 9, 9, 9)),
                IpAddr::V4(Ipv4Addr::new(1, 0, 0, 1)),
            ]
        );

        fs::remove_file(&tmp).ok();
    }

    #[test]
    fn falls_back_when_file_missing() {
        let provider = ResolvConfResolvers::at_path("/nonexistent/resolv.conf");
        let resolvers = provider.resolvers().unwrap();
        assert_eq!(resolvers, vec![IpAddr::V4(Ipv4Addr::new(1, 1, 1, 1))]);
    }
}
