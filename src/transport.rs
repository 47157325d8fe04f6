//! Datagram transport: a thin wrapper over a `std::net::UdpSocket` that
//! knows how to join an mDNS multicast group. All suspension happens at
//! `receive`'s `set_read_timeout`-bounded call; there is no background
//! thread or task runtime anywhere in this crate.
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket};
use std::time::Duration;

use log::debug;
use socket2::{Domain, Protocol, SockAddr, Socket, Type};

use crate::error::DnsResult;

pub const MDNS_PORT: u16 = 5353;
pub const MDNS_IPV4_GROUP: Ipv4Addr = Ipv4Addr::new(224, 0, 0, 251);
pub const MDNS_IPV6_GROUP: Ipv6Addr = Ipv6Addr::new(0xff02, 0, 0, 0, 0, 0, 0, 0xfb);

/// How a `Transport` binds its socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportMode {
    /// Bound to an ephemeral local port, connected to a single remote peer:
    /// the shape a unicast resolver query needs.
    Connected,
    /// Bound to the mDNS port on the wildcard address and joined to the
    /// mDNS multicast group: the shape the service agent needs.
    Multicast,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransportOptions {
    pub timeout: Duration,
    pub mode: TransportMode,
    /// Whether this socket should see its own multicast transmissions.
    pub loop_back_own_multicast: bool,
    pub multicast_ttl: u32,
}

impl Default for TransportOptions {
    fn default() -> Self {
        TransportOptions {
            timeout: Duration::from_millis(1000),
            mode: TransportMode::Connected,
            loop_back_own_multicast: true,
            multicast_ttl: 1,
        }
    }
}

/// An open datagram endpoint, either a unicast-connected socket or a
/// multicast-joined one, both presented through the same blocking
/// send/receive surface.
#[derive(Debug)]
pub struct Transport {
    socket: UdpSocket,
    options: TransportOptions,
}

impl Transport {
    /// Open a connected unicast socket to `remote`.
    pub fn connect(remote: SocketAddr, options: TransportOptions) -> DnsResult<Self> {
        let domain = if remote.is_ipv4() {
            Domain::IPV4
        } else {
            Domain::IPV6
        };
        let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_read_timeout(Some(options.timeout))?;
        socket.connect(&SockAddr::from(remote))?;
        debug!("connected transport to {}", remote);

        Ok(Transport {
            socket: socket.into(),
            options,
        })
    }

    /// Open a socket bound to the mDNS port on the wildcard IPv4 address,
    /// joined to the IPv4 mDNS group via `interface`.
    pub fn join_multicast_v4(interface: Ipv4Addr, options: TransportOptions) -> DnsResult<Self> {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_reuse_address(true)?;
        #[cfg(unix)]
        socket.set_reuse_port(true)?;

        let bind_addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), MDNS_PORT);
        socket.bind(&SockAddr::from(bind_addr))?;

        socket.join_multicast_v4(&MDNS_IPV4_GROUP, &interface)?;
        socket.set_multicast_loop_v4(options.loop_back_own_multicast)?;
        socket.set_multicast_ttl_v4(options.multicast_ttl)?;
        socket.set_read_timeout(Some(options.timeout))?;

        debug!(
            "joined multicast group {} on interface {}",
            MDNS_IPV4_GROUP, interface
        );

        Ok(Transport {
            socket: socket.into(),
            options,
        })
    }

    /// Open a socket bound to the mDNS port on the wildcard IPv6 address,
    /// joined to the IPv6 mDNS group on interface index `scope_id` (0 lets
    /// the OS pick a default interface).
    pub fn join_multicast_v6(scope_id: u32, options: TransportOptions) -> DnsResult<Self> {
        let socket = Socket::new(Domain::IPV6, Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_reuse_address(true)?;
        #[cfg(unix)]
        socket.set_reuse_port(true)?;
        socket.set_only_v6(true)?;

        let bind_addr = SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), MDNS_PORT);
        socket.bind(&SockAddr::from(bind_addr))?;

        socket.join_multicast_v6(&MDNS_IPV6_GROUP, scope_id)?;
        socket.set_multicast_loop_v6(options.loop_back_own_multicast)?;
        socket.set_read_timeout(Some(options.timeout))?;

        debug!(
            "joined multicast group {} on scope {}",
            MDNS_IPV6_GROUP, scope_id
        );

        Ok(Transport {
            socket: socket.into(),
            options,
        })
    }

    /// Send a datagram to the IPv4 mDNS group at the standard port.
    pub fn send_to_mdns_v4(&self, buffer: &[u8]) -> DnsResult<usize> {
        self.send_to(buffer, SocketAddr::new(IpAddr::V4(MDNS_IPV4_GROUP), MDNS_PORT))
    }

    /// Send a datagram to the IPv6 mDNS group at the standard port.
    pub fn send_to_mdns_v6(&self, buffer: &[u8]) -> DnsResult<usize> {
        self.send_to(buffer, SocketAddr::new(IpAddr::V6(MDNS_IPV6_GROUP), MDNS_PORT))
    }

    /// Send to the socket's connected peer (`Connected` mode).
    pub fn send(&self, buffer: &[u8]) -> DnsResult<usize> {
        Ok(self.socket.send(buffer)?)
    }

    /// Send to an explicit destination, as the mDNS group address.
    pub fn send_to(&self, buffer: &[u8], dest: SocketAddr) -> DnsResult<usize> {
        Ok(self.socket.send_to(buffer, dest)?)
    }

    /// Block until a datagram arrives or the configured timeout elapses.
    /// A timeout surfaces as `DnsError::Timeout` via the `io::Error` ->
    /// `DnsError` conversion.
    pub fn receive(&self, buffer: &mut [u8]) -> DnsResult<(usize, SocketAddr)> {
        Ok(self.socket.recv_from(buffer)?)
    }

    pub fn local_addr(&self) -> DnsResult<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    pub fn options(&self) -> &TransportOptions {
        &self.options
    }

    pub fn set_timeout(&mut self, timeout: Duration) -> DnsResult<()> {
        self.socket.set_read_timeout(Some(timeout))?;
        self.options.timeout = timeout;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connected_transport_roundtrips_locally() {
        let server = UdpSocket::bind("127.0.0.1:0").unwrap();
        let server_addr = server.local_addr().unwrap();

        let client = Transport::connect(server_addr, TransportOptions::default()).unwrap();
        client.send(b"ping").unwrap();

        let mut buf = [0u8; 16];
        let (n, from) = server.recv_from(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"ping");
        assert_eq!(from, client.local_addr().unwrap());
    }

    #[test]
    fn receive_times_out_with_no_traffic() {
        let server = UdpSocket::bind("127.0.0.1:0").unwrap();
        let server_addr = server.local_addr().unwrap();
        let mut options = TransportOptions::default();
        options.timeout = Duration::from_millis(50);

        let client = Transport::connect(server_addr, options).unwrap();
        let mut buf = [0u8; 16];
        let err = client.receive(&mut buf).unwrap_err();
        assert!(matches!(err, crate::error::DnsError::Timeout));
    }
}
