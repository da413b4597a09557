//! Sends one datagram per argument, e.g. to exercise a running proxy.
//!
//! Run:
//! - cargo run -p middleman --example sender -- 127.0.0.1:3000 abcz hello

use std::{env, net::SocketAddr};

use middleman::UdpTransport;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = env::args().skip(1);
    let destination: SocketAddr = match args.next() {
        Some(addr) => addr.parse()?,
        None => SocketAddr::from(([127, 0, 0, 1], 3000)),
    };

    let mut transport = UdpTransport::new();
    for text in args {
        transport.send_text(&text, destination)?;
        println!("sent {:?} to {}", text, destination);
    }
    Ok(())
}
