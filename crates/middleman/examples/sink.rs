//! UDP sink that prints every datagram it receives. Handy as a proxy destination.
//!
//! Run:
//! - cargo run -p middleman --example sink
//! - cargo run -p middleman --example sink -- 127.0.0.1:3001

use std::{env, io, net::SocketAddr};

use middleman::UdpTransport;
use middleman_core::transport::Socket;
use middleman_utilities::{format_ip, hex_dump};

fn parse_bind_addr() -> Option<SocketAddr> {
    env::args().nth(1).and_then(|s| s.parse().ok())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let bind_addr = parse_bind_addr().unwrap_or_else(|| SocketAddr::from(([127, 0, 0, 1], 3001)));

    let mut transport = UdpTransport::new();
    transport.register_receive_handler(
        |_socket: &dyn Socket, source: SocketAddr, data: &mut [u8]| {
            println!("[{}] {} bytes: {}", format_ip(&source), data.len(), hex_dump(data));
        },
    );
    transport.listen(bind_addr, true)?;
    println!("sink listening on {}, press enter to quit", transport.local_addr()?);

    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    transport.stop();
    Ok(())
}
