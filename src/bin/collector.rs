//! Host-side telemetry collector.
//!
//! Binds a UDP port (5005, or the first argument) and prints every
//! datagram received, one per line, prefixed with the sender.
//!
//! ```text
//! $ cargo run --bin collector -- 5005
//! 192.168.1.42:50312  node-102030/uptime: 12000
//! ```

use std::net::UdpSocket;

use anyhow::{Context, Result};
use sensornode::adapters::udp_transport::MAX_DATAGRAM_LEN;

const DEFAULT_PORT: u16 = 5005;

fn main() -> Result<()> {
    let port = match std::env::args().nth(1) {
        Some(arg) => arg
            .parse::<u16>()
            .with_context(|| format!("invalid port '{arg}'"))?,
        None => DEFAULT_PORT,
    };

    let socket = UdpSocket::bind(("0.0.0.0", port)).with_context(|| format!("bind UDP {port}"))?;
    println!("collector listening on UDP {port}");

    let mut buf = [0u8; MAX_DATAGRAM_LEN];
    loop {
        let (n, from) = socket.recv_from(&mut buf).context("recv")?;
        let text = String::from_utf8_lossy(&buf[..n]);
        println!("{from}  {}", text.trim_end_matches('\n'));
    }
}
