//! Demo: resolve a name against the system (or mDNS) resolver and print
//! every decodable reply. Not part of the library surface.
use std::env;
use std::process;

use dnssd::message::ResourceType;
use dnssd::Resolver;

fn main() {
    env_logger::init();

    let mut args = env::args().skip(1);
    let name = match args.next() {
        Some(n) => n,
        None => {
            eprintln!("usage: dnsquery <name> [type]");
            process::exit(2);
        }
    };
    let qtype = match args.next().as_deref() {
        Some("AAAA") => ResourceType::AAAA,
        Some("PTR") => ResourceType::PTR,
        Some("SRV") => ResourceType::SRV,
        Some("TXT") => ResourceType::TXT,
        _ => ResourceType::A,
    };

    let mut resolver = Resolver::new();
    if let Err(e) = resolver.query(&name, qtype) {
        eprintln!("query failed: {}", e);
        process::exit(1);
    }

    let mut found_any = false;
    loop {
        match resolver.next() {
            Ok(Some(message)) => {
                found_any = true;
                for answer in &message.answers {
                    println!("{} {:?} ttl={} {:?}", answer.name, answer.class, answer.ttl, answer.data);
                }
            }
            Ok(None) => break,
            Err(e) => {
                eprintln!("error: {}", e);
                break;
            }
        }
    }

    if !found_any {
        println!("no replies");
    }
    resolver.close();
}
