//! The mDNS service agent: answers inbound queries for a caller-advertised
//! service instance and assembles discovered peers from PTR/SRV/A/AAAA
//! records observed on the wire, in whatever order they arrive.
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::{Duration, Instant};

use log::{debug, trace};

use crate::error::{DnsError, DnsResult};
use crate::hostinfo::{ConnectProbeAddresses, LocalAddresses};
use crate::message::{
    Message, OpCode, Question, Record, RecordData, ResourceClass, ResourceType, SrvData,
};
use crate::name::Name;
use crate::transport::{Transport, TransportOptions};

/// Reference peer-table capacity; entries beyond this are dropped rather
/// than grown without bound, the same way the resolver's receive buffer is
/// a fixed 512 octets rather than an arbitrarily growing one.
pub const PEER_TABLE_CAPACITY: usize = 64;

/// The DNS-SD service-enumeration meta-query name (RFC 6763 §9).
pub const META_QUERY_SERVICE_NAME: &str = "_services._dns-sd._udp.local";

/// A DNS-SD service type and port the agent advertises on this host's
/// behalf, e.g. `{name: "_hello._tcp.local", port: 8080}`.
#[derive(Debug, Clone)]
pub struct Service {
    pub name: String,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct AgentOptions {
    pub hostname: String,
    pub ttl_seconds: u32,
    pub probe_timeout: Duration,
}

impl Default for AgentOptions {
    fn default() -> Self {
        AgentOptions {
            hostname: "localhost".to_owned(),
            ttl_seconds: 600,
            probe_timeout: Duration::from_millis(200),
        }
    }
}

/// A discovered peer, assembled across one or more records sharing an
/// instance name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Peer {
    pub name: String,
    pub ttl_seconds: u32,
    pub addresses: Vec<SocketAddr>,
}

/// Partial peer state while PTR/SRV/A/AAAA arrive in arbitrary order.
#[derive(Debug, Clone, Default)]
struct PendingPeer {
    ttl_seconds: u32,
    target_host: Option<String>,
    port: Option<u16>,
    ips: Vec<IpAddr>,
    refreshed_at: Option<Instant>,
}

impl PendingPeer {
    fn addresses(&self) -> Vec<SocketAddr> {
        let port = self.port.unwrap_or(0);
        self.ips.iter().map(|ip| SocketAddr::new(*ip, port)).collect()
    }
}

pub struct ServiceAgent {
    service: Service,
    options: AgentOptions,
    local_addresses: Box<dyn LocalAddresses>,
    v4: Transport,
    v6: Transport,
    next_is_v4: bool,
    peers: HashMap<String, PendingPeer>,
    /// Addresses seen for a host before any SRV record claimed it, keyed by
    /// lowercased host name. Drained into a peer's `ips` as soon as a
    /// matching SRV arrives, so an A/AAAA that precedes its SRV (or lands in
    /// an earlier datagram) is not lost.
    pending_addresses: HashMap<String, Vec<IpAddr>>,
    own_instance_name: String,
}

impl ServiceAgent {
    pub fn new(service: Service, options: AgentOptions) -> DnsResult<Self> {
        Self::with_providers(service, options, Box::new(ConnectProbeAddresses::new()))
    }

    pub fn with_providers(
        service: Service,
        options: AgentOptions,
        local_addresses: Box<dyn LocalAddresses>,
    ) -> DnsResult<Self> {
        let transport_options = TransportOptions {
            timeout: options.probe_timeout,
            mode: crate::transport::TransportMode::Multicast,
            ..Default::default()
        };
        let v4 = Transport::join_multicast_v4(Ipv4Addr::UNSPECIFIED, transport_options)?;
        let v6 = Transport::join_multicast_v6(0, transport_options)?;

        let own_instance_name = format!("{}.{}", options.hostname, service.name);

        Ok(ServiceAgent {
            service,
            options,
            local_addresses,
            v4,
            v6,
            next_is_v4: true,
            peers: HashMap::new(),
            pending_addresses: HashMap::new(),
            own_instance_name,
        })
    }

    fn target_host(&self) -> String {
        format!("{}.local", self.options.hostname)
    }

    /// Emit a PTR question for the service name on both sockets.
    pub fn query(&mut self) -> DnsResult<()> {
        let mut message = Message::default();
        message.header.id = 0;
        message.push_question(Question {
            qname: self.service.name.parse()?,
            qtype: ResourceType::PTR,
            qclass: ResourceClass::IN,
        });
        let bytes = message.to_bytes()?;

        self.v4.send_to_mdns_v4(&bytes)?;
        self.v6.send_to_mdns_v6(&bytes)?;
        Ok(())
    }

    /// Perform one unit of work: read at most one datagram, and either
    /// respond to a matching query or fold a reply into peer state.
    pub fn handle(&mut self) -> DnsResult<Option<Peer>> {
        let mut buf = [0u8; 512];
        let transport_is_v4 = self.next_is_v4;
        self.next_is_v4 = !self.next_is_v4;
        let transport = if transport_is_v4 { &self.v4 } else { &self.v6 };

        let (n, _from) = match transport.receive(&mut buf) {
            Ok(result) => result,
            Err(DnsError::Timeout) => return Ok(None),
            Err(e) => return Err(e),
        };

        let message = match Message::from_bytes(&buf[..n]) {
            Ok(m) => m,
            Err(e) => {
                trace!("discarding undecodable mdns datagram: {}", e);
                return Ok(None);
            }
        };

        if message.header.flags.is_response {
            Ok(self.fold_reply(&message))
        } else {
            self.respond_to_query(&message, transport_is_v4)?;
            Ok(None)
        }
    }

    fn respond_to_query(&self, query: &Message, is_v4: bool) -> DnsResult<()> {
        let meta_query = query
            .questions
            .iter()
            .any(|q| q.qname.to_string().eq_ignore_ascii_case(META_QUERY_SERVICE_NAME));
        if meta_query {
            return self.respond_to_meta_query(query, is_v4);
        }

        let matches = query
            .questions
            .iter()
            .any(|q| q.qname.to_string().eq_ignore_ascii_case(&self.service.name));
        if !matches {
            return Ok(());
        }

        let instance_name: Name = self.own_instance_name.parse()?;
        let target_host: Name = self.target_host().parse()?;

        let mut response = Message::default();
        response.header.id = query.header.id;
        response.header.flags.is_response = true;
        response.header.flags.op_code = OpCode::Query;
        response.header.flags.authoritative = true;

        response.answers.push(Record {
            name: self.service.name.parse()?,
            class: ResourceClass::IN,
            ttl: self.options.ttl_seconds,
            data: RecordData::Ptr(instance_name),
        });
        response.header.an_count = 1;

        response.additionals.push(Record {
            name: self.own_instance_name.parse()?,
            class: ResourceClass::IN,
            ttl: self.options.ttl_seconds,
            data: RecordData::Srv {
                data: SrvData {
                    priority: 0,
                    weight: 0,
                    port: self.service.port,
                },
                target: target_host.clone(),
            },
        });

        let local_addrs = self.local_addresses.local_addresses().unwrap_or_default();
        for local in local_addrs {
            if !local.up || local.addr.is_loopback() {
                continue;
            }
            let data = match (is_v4, local.addr) {
                (true, IpAddr::V4(v4)) => Some(RecordData::A(v4)),
                (false, IpAddr::V6(v6)) => Some(RecordData::Aaaa(v6)),
                _ => None,
            };
            if let Some(data) = data {
                response.additionals.push(Record {
                    name: target_host.clone(),
                    class: ResourceClass::IN,
                    ttl: self.options.ttl_seconds,
                    data,
                });
            }
        }
        response.header.ar_count = response.additionals.len() as u16;

        let bytes = response.to_bytes()?;
        if is_v4 {
            self.v4.send_to_mdns_v4(&bytes)?;
        } else {
            self.v6.send_to_mdns_v6(&bytes)?;
        }
        debug!(
            "answered query for {} with {} additional record(s)",
            self.service.name,
            response.additionals.len()
        );
        Ok(())
    }

    /// Answer the `_services._dns-sd._udp.local` enumeration query with a
    /// PTR to this agent's own service type, so generic DNS-SD browsers can
    /// discover the service without already knowing its name.
    fn respond_to_meta_query(&self, query: &Message, is_v4: bool) -> DnsResult<()> {
        let mut response = Message::default();
        response.header.id = query.header.id;
        response.header.flags.is_response = true;
        response.header.flags.op_code = OpCode::Query;
        response.header.flags.authoritative = true;

        response.answers.push(Record {
            name: META_QUERY_SERVICE_NAME.parse()?,
            class: ResourceClass::IN,
            ttl: self.options.ttl_seconds,
            data: RecordData::Ptr(self.service.name.parse()?),
        });
        response.header.an_count = 1;

        let bytes = response.to_bytes()?;
        if is_v4 {
            self.v4.send_to_mdns_v4(&bytes)?;
        } else {
            self.v6.send_to_mdns_v6(&bytes)?;
        }
        debug!("answered DNS-SD service enumeration query");
        Ok(())
    }

    fn fold_reply(&mut self, message: &Message) -> Option<Peer> {
        let mut touched_instance = None;

        for record in message.answers.iter().chain(message.additionals.iter()) {
            match &record.data {
                RecordData::Ptr(instance) => {
                    let instance_name = instance.to_string();
                    if instance_name.eq_ignore_ascii_case(&self.own_instance_name) {
                        continue;
                    }
                    let entry = self.peers.entry(instance_name.clone()).or_default();
                    entry.ttl_seconds = record.ttl;
                    entry.refreshed_at = Some(Instant::now());
                    touched_instance = Some(instance_name);
                }
                RecordData::Srv { data, target } => {
                    let instance_name = record.name.to_string();
                    if instance_name.eq_ignore_ascii_case(&self.own_instance_name) {
                        continue;
                    }
                    if self.peers.len() >= PEER_TABLE_CAPACITY
                        && !self.peers.contains_key(&instance_name)
                    {
                        continue;
                    }
                    Self::bind_srv(
                        &mut self.peers,
                        &self.pending_addresses,
                        &instance_name,
                        &target.to_string(),
                        data.port,
                        record.ttl,
                    );
                    touched_instance = Some(instance_name);
                }
                RecordData::A(ip) => {
                    let touched = Self::record_address(
                        &mut self.peers,
                        &mut self.pending_addresses,
                        &record.name,
                        IpAddr::V4(*ip),
                    );
                    if touched.is_some() {
                        touched_instance = touched;
                    }
                }
                RecordData::Aaaa(ip) => {
                    let touched = Self::record_address(
                        &mut self.peers,
                        &mut self.pending_addresses,
                        &record.name,
                        IpAddr::V6(*ip),
                    );
                    if touched.is_some() {
                        touched_instance = touched;
                    }
                }
                _ => {}
            }
        }

        let instance_name = touched_instance?;
        let entry = self.peers.get(&instance_name)?;
        if entry.ips.is_empty() {
            return None;
        }
        Some(Peer {
            name: instance_name,
            ttl_seconds: entry.ttl_seconds,
            addresses: entry.addresses(),
        })
    }

    /// Record that `instance_name`'s service lives at `host`:`port`, and
    /// pull in any address already seen for that host before this SRV told
    /// us which instance it belongs to (an A/AAAA that arrived first, in an
    /// earlier datagram or earlier in this one).
    fn bind_srv(
        peers: &mut HashMap<String, PendingPeer>,
        pending_addresses: &HashMap<String, Vec<IpAddr>>,
        instance_name: &str,
        host: &str,
        port: u16,
        ttl: u32,
    ) {
        let host_key = host.to_ascii_lowercase();
        let entry = peers.entry(instance_name.to_owned()).or_default();
        entry.target_host = Some(host.to_owned());
        entry.port = Some(port);
        entry.ttl_seconds = ttl;
        entry.refreshed_at = Some(Instant::now());

        if let Some(addrs) = pending_addresses.get(&host_key) {
            for ip in addrs {
                if !entry.ips.contains(ip) {
                    entry.ips.push(*ip);
                }
            }
        }
    }

    /// Attach `ip` to every already-known peer whose SRV-supplied host
    /// matches, and also remember it under `record_name` regardless, in
    /// case the SRV naming this host hasn't arrived yet (arrives later, or
    /// in a later datagram). Returns the name of a peer instance it
    /// attached to, if any.
    fn record_address(
        peers: &mut HashMap<String, PendingPeer>,
        pending_addresses: &mut HashMap<String, Vec<IpAddr>>,
        record_name: &Name,
        ip: IpAddr,
    ) -> Option<String> {
        let host_key = record_name.to_string().to_ascii_lowercase();

        if pending_addresses.len() < PEER_TABLE_CAPACITY || pending_addresses.contains_key(&host_key)
        {
            let pending = pending_addresses.entry(host_key.clone()).or_default();
            if !pending.contains(&ip) {
                pending.push(ip);
            }
        }

        let mut touched = None;
        for (instance_name, entry) in peers.iter_mut() {
            let matches = entry
                .target_host
                .as_deref()
                .map(|h| h.eq_ignore_ascii_case(&host_key))
                .unwrap_or(false);
            if matches {
                if !entry.ips.contains(&ip) {
                    entry.ips.push(ip);
                }
                entry.refreshed_at = Some(Instant::now());
                touched = Some(instance_name.clone());
            }
        }
        touched
    }

    /// Currently valid (unexpired) peers. A TTL of zero is treated as
    /// "never expires" and is always retained.
    pub fn peers(&mut self) -> Vec<Peer> {
        let now = Instant::now();
        self.peers.retain(|_, entry| {
            entry.ttl_seconds == 0
                || entry
                    .refreshed_at
                    .map(|t| now < t + Duration::from_secs(entry.ttl_seconds as u64))
                    .unwrap_or(true)
        });

        self.peers
            .iter()
            .filter(|(_, entry)| !entry.ips.is_empty())
            .map(|(name, entry)| Peer {
                name: name.clone(),
                ttl_seconds: entry.ttl_seconds,
                addresses: entry.addresses(),
            })
            .collect()
    }

    pub fn close(&mut self) {
        self.peers.clear();
        self.pending_addresses.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer_with_ttl(ttl: u32, refreshed_secs_ago: u64) -> PendingPeer {
        PendingPeer {
            ttl_seconds: ttl,
            target_host: Some("host.local".to_owned()),
            port: Some(8080),
            ips: vec![IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1))],
            refreshed_at: Some(Instant::now() - Duration::from_secs(refreshed_secs_ago)),
        }
    }

    #[test]
    fn expired_peer_entries_are_pruned() {
        let mut peers = HashMap::new();
        peers.insert("fresh.instance".to_owned(), peer_with_ttl(10, 0));
        peers.insert("stale.instance".to_owned(), peer_with_ttl(1, 5));

        peers.retain(|_, entry| {
            entry.ttl_seconds == 0
                || entry
                    .refreshed_at
                    .map(|t| Instant::now() < t + Duration::from_secs(entry.ttl_seconds as u64))
                    .unwrap_or(true)
        });

        assert!(peers.contains_key("fresh.instance"));
        assert!(!peers.contains_key("stale.instance"));
    }

    #[test]
    fn zero_ttl_never_expires() {
        let mut peers = HashMap::new();
        peers.insert("forever.instance".to_owned(), peer_with_ttl(0, 100_000));
        peers.retain(|_, entry| entry.ttl_seconds == 0);
        assert!(peers.contains_key("forever.instance"));
    }

    #[test]
    fn pending_peer_addresses_use_srv_port() {
        let entry = peer_with_ttl(60, 0);
        let addrs = entry.addresses();
        assert_eq!(addrs, vec![SocketAddr::new(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)), 8080)]);
    }

    #[test]
    fn address_arriving_before_its_srv_is_bound_once_srv_arrives() {
        let mut peers = HashMap::new();
        let mut pending = HashMap::new();

        // The A record for "host.local" lands first, before any peer knows
        // that host belongs to an instance.
        let ip = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 5));
        let touched =
            ServiceAgent::record_address(&mut peers, &mut pending, &"host.local".parse().unwrap(), ip);
        assert!(touched.is_none());
        assert!(peers.get("printer._http._tcp.local").is_none());

        // The SRV naming the instance arrives afterwards, possibly in a
        // later datagram.
        ServiceAgent::bind_srv(
            &mut peers,
            &pending,
            "printer._http._tcp.local",
            "host.local",
            8080,
            120,
        );

        let entry = peers.get("printer._http._tcp.local").unwrap();
        assert_eq!(entry.addresses(), vec![SocketAddr::new(ip, 8080)]);
    }

    #[test]
    fn address_arriving_after_its_srv_attaches_immediately() {
        let mut peers = HashMap::new();
        let mut pending = HashMap::new();

        ServiceAgent::bind_srv(&mut peers, &pending, "printer._http._tcp.local", "host.local", 8080, 120);

        let ip = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 6));
        let touched =
            ServiceAgent::record_address(&mut peers, &mut pending, &"host.local".parse().unwrap(), ip);

        assert_eq!(touched.as_deref(), Some("printer._http._tcp.local"));
        let entry = peers.get("printer._http._tcp.local").unwrap();
        assert_eq!(entry.addresses(), vec![SocketAddr::new(ip, 8080)]);
    }

    #[test]
    fn address_host_match_is_case_insensitive() {
        let mut peers = HashMap::new();
        let mut pending = HashMap::new();

        ServiceAgent::bind_srv(&mut peers, &pending, "printer._http._tcp.local", "Host.Local", 8080, 120);

        let ip = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 7));
        let touched =
            ServiceAgent::record_address(&mut peers, &mut pending, &"host.LOCAL".parse().unwrap(), ip);

        assert_eq!(touched.as_deref(), Some("printer._http._tcp.local"));
    }
}
