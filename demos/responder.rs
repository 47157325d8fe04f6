//! Demo: advertise a service on the local link and print peers as they are
//! discovered. Not part of the library surface.
use std::env;
use std::process;

use dnssd::agent::{AgentOptions, Service, ServiceAgent};

fn main() {
    env_logger::init();

    let mut args = env::args().skip(1);
    let service_name = args.next().unwrap_or_else(|| "_hello._tcp.local".to_owned());
    let port: u16 = args
        .next()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8080);

    let service = Service {
        name: service_name,
        port,
    };
    let hostname = env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_owned());
    let options = AgentOptions {
        hostname,
        ..Default::default()
    };

    let mut agent = match ServiceAgent::new(service, options) {
        Ok(a) => a,
        Err(e) => {
            eprintln!("failed to start agent: {}", e);
            process::exit(1);
        }
    };

    if let Err(e) = agent.query() {
        eprintln!("failed to send initial query: {}", e);
    }

    println!("responding and discovering peers; press Ctrl+C to stop");
    loop {
        match agent.handle() {
            Ok(Some(peer)) => println!("peer: {} ttl={} addrs={:?}", peer.name, peer.ttl_seconds, peer.addresses),
            Ok(None) => {}
            Err(e) => eprintln!("error: {}", e),
        }
    }
}
