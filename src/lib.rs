//! An embeddable library for Multicast DNS (mDNS), DNS-Based Service
//! Discovery (DNS-SD) and plain unicast DNS resolution.
//!
//! Three pieces compose the public surface: the wire [`message`] codec,
//! the [`resolver`] engine that dispatches unicast or mDNS lookups, and
//! the [`agent`] that responds to and discovers instances of a locally
//! advertised service.
pub mod agent;
pub mod error;
pub mod hostinfo;
pub mod message;
pub mod name;
pub mod resolver;
pub mod transport;
pub mod wire;

pub use agent::{AgentOptions, Peer, Service, ServiceAgent};
pub use error::{DnsError, DnsResult};
pub use message::{Header, Message, Question, Record, RecordData, ResourceClass, ResourceType};
pub use name::Name;
pub use resolver::Resolver;
pub use transport::{Transport, TransportMode, TransportOptions};
pub use wire::ToFromNetworkOrder;
