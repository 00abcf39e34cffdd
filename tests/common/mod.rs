//! Scripted collaborators for driving the engine without a network.
#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::io;
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;
use tokio::time::Instant;

use hoptrace::lookup::NameResolver;
use hoptrace::probe::ProbeSocket;
use hoptrace::probe::ProbeId;
use hoptrace::probe::correlate::forge;

pub const LOCAL: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 10);
pub const IDENTIFIER: u16 = 0x4D54;

/// How a hop answers each probe sent with its TTL
#[derive(Debug, Clone, Copy)]
pub struct Responder {
    pub addr: Ipv4Addr,
    pub delay: Duration,
    /// Deliver a second copy of every reply 1ms after the first
    pub duplicate: bool,
    /// Answer with the next cycle's sequence instead of the probe's own
    pub stale: bool,
}

impl Responder {
    pub fn new(addr: Ipv4Addr, delay: Duration) -> Self {
        Self {
            addr,
            delay,
            duplicate: false,
            stale: false,
        }
    }
}

/// Something `recv` hands back at a scheduled instant
enum Delivery {
    Datagram(Vec<u8>),
    Error,
}

#[derive(Default)]
struct State {
    ttl: u8,
    queue: Vec<(Instant, Delivery)>,
    sent: Vec<(u8, u16)>,
}

/// In-memory stand-in for the raw socket
///
/// Echo Requests sent with TTL `t` are answered by `responders[t]`: a Time
/// Exceeded quoting the probe, or an Echo Reply when the responder is the
/// destination. Replies become readable after the responder's delay.
pub struct ScriptedSocket {
    destination: Ipv4Addr,
    responders: HashMap<u8, Responder>,
    /// TTLs whose sends fail
    failing_sends: HashSet<u8>,
    /// Sending at this TTL makes `recv` fail after the delay
    recv_errors: HashMap<u8, Duration>,
    /// Datagrams readable right away, before anything is sent
    noise: Mutex<Vec<Vec<u8>>>,
    state: Mutex<State>,
}

impl ScriptedSocket {
    pub fn new(destination: Ipv4Addr) -> Self {
        Self {
            destination,
            responders: HashMap::new(),
            failing_sends: HashSet::new(),
            recv_errors: HashMap::new(),
            noise: Mutex::new(Vec::new()),
            state: Mutex::new(State::default()),
        }
    }

    pub fn respond(mut self, hop: u8, responder: Responder) -> Self {
        self.responders.insert(hop, responder);
        self
    }

    pub fn fail_send(mut self, hop: u8) -> Self {
        self.failing_sends.insert(hop);
        self
    }

    pub fn fail_recv_after(mut self, hop: u8, delay: Duration) -> Self {
        self.recv_errors.insert(hop, delay);
        self
    }

    pub fn with_noise(self, datagram: Vec<u8>) -> Self {
        self.noise.lock().push(datagram);
        self
    }

    /// (ttl, sequence) of every probe sent so far
    pub fn sent(&self) -> Vec<(u8, u16)> {
        self.state.lock().sent.clone()
    }

    fn reply_for(&self, responder: &Responder, probe: ProbeId) -> Vec<u8> {
        if responder.addr == self.destination {
            forge::echo_reply(responder.addr, LOCAL, IDENTIFIER, probe)
        } else {
            forge::time_exceeded(responder.addr, LOCAL, self.destination, IDENTIFIER, probe)
        }
    }
}

#[async_trait]
impl ProbeSocket for ScriptedSocket {
    fn set_ttl(&self, ttl: u8) -> io::Result<()> {
        self.state.lock().ttl = ttl;
        Ok(())
    }

    fn send_to(&self, packet: &[u8], _dest: Ipv4Addr) -> io::Result<usize> {
        let sequence = u16::from_be_bytes([packet[6], packet[7]]);
        let mut state = self.state.lock();
        let ttl = state.ttl;
        if self.failing_sends.contains(&ttl) {
            return Err(io::Error::new(io::ErrorKind::NetworkUnreachable, "no route"));
        }
        state.sent.push((ttl, sequence));

        if let Some(delay) = self.recv_errors.get(&ttl) {
            state.queue.push((Instant::now() + *delay, Delivery::Error));
        }

        if let Some(responder) = self.responders.get(&ttl) {
            let mut probe = ProbeId::from_sequence(sequence);
            if responder.stale {
                probe.cycle = probe.cycle.wrapping_add(1);
            }
            let reply = self.reply_for(responder, probe);
            let at = Instant::now() + responder.delay;
            if responder.duplicate {
                let copy = Delivery::Datagram(reply.clone());
                state.queue.push((at + Duration::from_millis(1), copy));
            }
            state.queue.push((at, Delivery::Datagram(reply)));
        }
        Ok(packet.len())
    }

    async fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        if let Some(datagram) = self.noise.lock().pop() {
            buf[..datagram.len()].copy_from_slice(&datagram);
            return Ok(datagram.len());
        }

        loop {
            let next = {
                let state = self.state.lock();
                state.queue.iter().map(|(at, _)| *at).min()
            };
            let Some(at) = next else {
                // Nothing will ever arrive; the caller's deadline ends the wait
                std::future::pending::<()>().await;
                continue;
            };
            tokio::time::sleep_until(at).await;

            let mut state = self.state.lock();
            let Some(idx) = state.queue.iter().position(|(t, _)| *t == at) else {
                continue;
            };
            return match state.queue.remove(idx).1 {
                Delivery::Datagram(datagram) => {
                    buf[..datagram.len()].copy_from_slice(&datagram);
                    Ok(datagram.len())
                }
                Delivery::Error => Err(io::Error::other("socket went away")),
            };
        }
    }
}

/// Resolver backed by fixed tables
#[derive(Default)]
pub struct StaticResolver {
    pub hosts: HashMap<String, Vec<IpAddr>>,
    pub names: HashMap<Ipv4Addr, String>,
}

impl StaticResolver {
    pub fn host(mut self, name: &str, addr: Ipv4Addr) -> Self {
        self.hosts.insert(name.to_string(), vec![IpAddr::V4(addr)]);
        self
    }

    pub fn name(mut self, addr: Ipv4Addr, name: &str) -> Self {
        self.names.insert(addr, name.to_string());
        self
    }
}

#[async_trait]
impl NameResolver for StaticResolver {
    async fn lookup_host(&self, host: &str) -> Result<Vec<IpAddr>, String> {
        self.hosts
            .get(host)
            .cloned()
            .ok_or_else(|| format!("{host}: no such host"))
    }

    async fn reverse_lookup(&self, ip: Ipv4Addr) -> Option<String> {
        self.names.get(&ip).cloned()
    }
}

/// Resolver whose reverse lookups never complete
pub struct StalledResolver;

#[async_trait]
impl NameResolver for StalledResolver {
    async fn lookup_host(&self, host: &str) -> Result<Vec<IpAddr>, String> {
        Err(format!("{host}: lookups disabled"))
    }

    async fn reverse_lookup(&self, _ip: Ipv4Addr) -> Option<String> {
        std::future::pending().await
    }
}
