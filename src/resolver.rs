//! The resolver engine: dispatches a query to unicast or mDNS sockets
//! depending on the queried name's suffix, then streams decoded replies
//! back to the caller one at a time through `next()`.
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use log::{debug, trace};

use crate::error::{DnsError, DnsResult};
use crate::hostinfo::{ResolvConfResolvers, SystemResolvers};
use crate::message::{Message, Question, ResourceClass, ResourceType};
use crate::transport::{Transport, TransportMode, TransportOptions};

const DNS_PORT: u16 = 53;
const PER_PROBE_TIMEOUT: Duration = Duration::from_millis(100);
/// Consecutive round-robin probe failures that end an mDNS `next()` call.
/// Nine probes at 100ms each gives both groups roughly a second to drain.
const MDNS_MAX_CONSECUTIVE_TIMEOUTS: u32 = 9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Unicast,
    Mdns,
}

/// Holds the sockets opened for the in-flight query and drives `next()`'s
/// round-robin across them.
enum Sources {
    Unicast(Vec<Transport>),
    Mdns { v4: Transport, v6: Transport, next_is_v4: bool },
}

pub struct Resolver {
    system_resolvers: Box<dyn SystemResolvers>,
    sources: Option<Sources>,
}

impl Resolver {
    pub fn new() -> Self {
        Resolver {
            system_resolvers: Box::new(ResolvConfResolvers::new()),
            sources: None,
        }
    }

    pub fn with_providers(system_resolvers: Box<dyn SystemResolvers>) -> Self {
        Resolver {
            system_resolvers,
            sources: None,
        }
    }

    fn mode_for(name: &str) -> Mode {
        if name.to_ascii_lowercase().ends_with(".local") {
            Mode::Mdns
        } else {
            Mode::Unicast
        }
    }

    /// Begin a query for `name`/`qtype`, opening and sending over whichever
    /// sockets the name's suffix selects. Errors opening/binding a socket
    /// are fatal to this query and propagate; the caller may retry with a
    /// new `query()` call.
    pub fn query(&mut self, name: &str, qtype: ResourceType) -> DnsResult<()> {
        match Self::mode_for(name) {
            Mode::Unicast => self.query_unicast(name, qtype),
            Mode::Mdns => self.query_mdns(name, qtype),
        }
    }

    fn query_unicast(&mut self, name: &str, qtype: ResourceType) -> DnsResult<()> {
        let resolvers = self.system_resolvers.resolvers()?;
        if resolvers.is_empty() {
            return Err(DnsError::NoResolver);
        }

        let mut message = Message::new_query();
        message.header.flags.recursion_desired = true;
        message.header.flags.recursion_available = true;
        message.push_question(Question {
            qname: name.parse()?,
            qtype,
            qclass: ResourceClass::IN,
        });
        let bytes = message.to_bytes()?;

        let mut transports = Vec::with_capacity(resolvers.len());
        for addr in resolvers {
            let options = TransportOptions {
                timeout: Duration::from_millis(1000),
                mode: TransportMode::Connected,
                ..Default::default()
            };
            let transport = Transport::connect(SocketAddr::new(addr, DNS_PORT), options)?;
            transport.send(&bytes)?;
            transports.push(transport);
        }

        debug!("unicast query for {} sent to {} resolver(s)", name, transports.len());
        self.sources = Some(Sources::Unicast(transports));
        Ok(())
    }

    fn query_mdns(&mut self, name: &str, qtype: ResourceType) -> DnsResult<()> {
        let mut message = Message::default();
        message.header.id = 0;
        message.push_question(Question {
            qname: name.parse()?,
            qtype,
            qclass: ResourceClass::IN,
        });
        let bytes = message.to_bytes()?;

        let options = TransportOptions {
            timeout: PER_PROBE_TIMEOUT,
            mode: TransportMode::Multicast,
            ..Default::default()
        };
        let v4 = Transport::join_multicast_v4(Ipv4Addr::UNSPECIFIED, options)?;
        v4.send_to_mdns_v4(&bytes)?;

        let v6 = Transport::join_multicast_v6(0, options)?;
        v6.send_to_mdns_v6(&bytes)?;

        debug!("mdns query for {} sent on both address families", name);
        self.sources = Some(Sources::Mdns { v4, v6, next_is_v4: true });
        Ok(())
    }

    /// Return the next decodable reply, or `Ok(None)` once every source is
    /// exhausted or timing out. Timeouts, decode failures and empty-answer
    /// replies are swallowed and the engine simply advances.
    pub fn next(&mut self) -> DnsResult<Option<Message>> {
        match self.sources.as_mut() {
            None => Ok(None),
            Some(Sources::Unicast(transports)) => Self::next_unicast(transports),
            Some(Sources::Mdns { v4, v6, next_is_v4 }) => Self::next_mdns(v4, v6, next_is_v4),
        }
    }

    fn next_unicast(transports: &mut Vec<Transport>) -> DnsResult<Option<Message>> {
        let mut buf = [0u8; 512];
        while let Some(transport) = transports.first() {
            match transport.receive(&mut buf) {
                Ok((n, _from)) => {
                    transports.remove(0);
                    match Message::from_bytes(&buf[..n]) {
                        Ok(message) => return Ok(Some(message)),
                        Err(e) => {
                            trace!("discarding undecodable unicast reply: {}", e);
                            continue;
                        }
                    }
                }
                Err(DnsError::Timeout) => {
                    transports.remove(0);
                    continue;
                }
                Err(e) => return Err(e),
            }
        }
        Ok(None)
    }

    fn next_mdns(v4: &Transport, v6: &Transport, next_is_v4: &mut bool) -> DnsResult<Option<Message>> {
        let mut buf = [0u8; 512];
        let mut consecutive_timeouts = 0u32;

        while consecutive_timeouts < MDNS_MAX_CONSECUTIVE_TIMEOUTS {
            let transport = if *next_is_v4 { &*v4 } else { &*v6 };
            *next_is_v4 = !*next_is_v4;

            match transport.receive(&mut buf) {
                Ok((n, _from)) => {
                    consecutive_timeouts = 0;
                    match Message::from_bytes(&buf[..n]) {
                        Ok(message) => return Ok(Some(message)),
                        Err(e) => {
                            trace!("discarding undecodable mdns reply: {}", e);
                            continue;
                        }
                    }
                }
                Err(DnsError::Timeout) => {
                    consecutive_timeouts += 1;
                    continue;
                }
                Err(e) => return Err(e),
            }
        }
        Ok(None)
    }

    pub fn close(&mut self) {
        self.sources = None;
    }
}

impl Default for Resolver {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_suffix_selects_mdns_mode() {
        assert_eq!(Resolver::mode_for("printer.local"), Mode::Mdns);
        assert_eq!(Resolver::mode_for("PRINTER.LOCAL"), Mode::Mdns);
    }

    #[test]
    fn other_suffix_selects_unicast_mode() {
        assert_eq!(Resolver::mode_for("example.com"), Mode::Unicast);
    }

    #[test]
    fn next_without_a_query_returns_none() {
        let mut resolver = Resolver::new();
        assert!(resolver.next().unwrap().is_none());
    }
}
