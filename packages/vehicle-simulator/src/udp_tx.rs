//! udp_tx.rs — UDP transmitter for bus envelopes
//!
//! Sends every envelope the simulator produces to the supervisor's listen
//! address. Send errors are logged; the simulator never stops over them.

use std::net::UdpSocket;

use safety_types::Envelope;
use tracing::{debug, warn};

pub struct UdpTransmitter {
    socket: UdpSocket,
    target: String,
}

impl UdpTransmitter {
    pub fn new(target: &str) -> Result<Self, std::io::Error> {
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        socket.set_nonblocking(false)?;
        Ok(Self { socket, target: target.to_string() })
    }

    /// Send one epoch's worth of traffic.
    pub fn send_all(&self, envelopes: &[Envelope]) {
        for env in envelopes {
            self.send(env);
        }
    }

    fn send(&self, env: &Envelope) {
        let bytes = match env.encode() {
            Ok(b) => b,
            Err(e) => { warn!("UDP: serialize failed: {e}"); return; }
        };
        if let Err(e) = self.socket.send_to(&bytes, &self.target) {
            warn!("UDP: send to {} failed: {e}", self.target);
        } else {
            debug!("UDP → {} {} from {}", self.target, env.body.name(), env.src);
        }
    }
}
