//! One measurement cycle: a send pass over every hop, a bounded receive pass,
//! then a full recompute of every hop's aggregates.

use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use std::net::Ipv4Addr;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::lookup::NameResolver;
use crate::probe::{ProbeId, ProbeSocket, build_echo_request, parse_reply};
use crate::state::MtrResult;

/// Largest datagram read from the socket
const RECV_BUFFER: usize = 1500;

/// Reverse lookups in flight at once
const MAX_CONCURRENT_LOOKUPS: usize = 10;

/// What happened during one cycle, for logging
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub cycle: u64,
    /// Probes handed to the socket (including failed sends)
    pub sent: u32,
    /// Replies attributed to a hop
    pub accepted: u32,
    /// Datagrams that were not ours, malformed, stale or duplicate
    pub discarded: u32,
    /// Destination answered during this cycle
    pub reached: bool,
    /// Send pass was cut short by cancellation; nothing was received
    pub cancelled: bool,
}

/// Borrowed view of everything one cycle needs
pub(crate) struct Cycle<'a, S: ?Sized, R: ?Sized> {
    pub config: &'a Config,
    pub identifier: u16,
    pub destination: Ipv4Addr,
    pub socket: &'a S,
    pub resolver: &'a R,
    pub result: &'a MtrResult,
}

impl<S, R> Cycle<'_, S, R>
where
    S: ProbeSocket + ?Sized,
    R: NameResolver + ?Sized,
{
    /// Run cycle number `cycle` to completion (or until cancelled mid-send)
    pub async fn run(&self, cycle: u64, cancel: &CancellationToken) -> CycleReport {
        let mut report = CycleReport {
            cycle,
            ..CycleReport::default()
        };

        // Send instants keyed by hop. An entry is removed by the first reply,
        // so later copies for the same hop find nothing and are dropped.
        let mut pending: HashMap<u8, Instant> = HashMap::with_capacity(self.config.max_hops as usize);

        if !self.send_phase(cycle, cancel, &mut pending, &mut report).await {
            report.cancelled = true;
            self.finalize();
            return report;
        }

        let renamed = self.receive_phase(cycle, &mut pending, &mut report).await;

        if self.config.resolve_names {
            self.resolve_names(&renamed, cancel).await;
        }

        self.finalize();
        report
    }

    /// Send one probe per hop. Returns false if cancelled before finishing.
    async fn send_phase(
        &self,
        cycle: u64,
        cancel: &CancellationToken,
        pending: &mut HashMap<u8, Instant>,
        report: &mut CycleReport,
    ) -> bool {
        for hop in 1..=self.config.max_hops {
            if cancel.is_cancelled() {
                return false;
            }

            let probe_id = ProbeId::new(cycle, hop);
            let packet = build_echo_request(self.identifier, probe_id, self.config.payload_size);

            // Register pending BEFORE sending to prevent race with fast responses
            pending.insert(hop, Instant::now());

            let sent = self
                .socket
                .set_ttl(hop)
                .and_then(|_| self.socket.send_to(&packet, self.destination));
            if let Err(e) = sent {
                // Counted as sent and never answered, so it shows up as lost
                pending.remove(&hop);
                tracing::debug!(hop, error = %e, "failed to send probe");
            }

            if let Some(stats) = self.result.hop(hop) {
                stats.lock().record_sent();
            }
            report.sent += 1;

            if !self.config.send_delay.is_zero() {
                tokio::time::sleep(self.config.send_delay).await;
            }
        }
        true
    }

    /// Read replies until the timeout elapses or nothing worth waiting for is
    /// left. Returns the hops whose responder address changed.
    async fn receive_phase(
        &self,
        cycle: u64,
        pending: &mut HashMap<u8, Instant>,
        report: &mut CycleReport,
    ) -> Vec<u8> {
        let deadline = Instant::now() + self.config.timeout;
        let mut buffer = [0u8; RECV_BUFFER];
        let mut renamed = Vec::new();
        // Lowest hop the destination itself answered for
        let mut dest_hop: Option<u8> = None;

        while !pending.is_empty() {
            if let Some(dest_hop) = dest_hop
                && pending.keys().all(|&hop| hop > dest_hop)
            {
                break;
            }

            let len = match tokio::time::timeout_at(deadline, self.socket.recv(&mut buffer)).await {
                Err(_elapsed) => break,
                Ok(Ok(len)) => len,
                Ok(Err(e)) => {
                    tracing::warn!(cycle, error = %e, "receive failed, ending cycle early");
                    break;
                }
            };
            let received_at = Instant::now();

            let Some(reply) = parse_reply(&buffer[..len], self.identifier, self.config.max_hops)
            else {
                report.discarded += 1;
                continue;
            };

            if !reply.probe_id.matches_cycle(cycle) {
                tracing::trace!(
                    hop = reply.probe_id.hop,
                    wire_cycle = reply.probe_id.cycle,
                    "stale reply from an earlier cycle"
                );
                report.discarded += 1;
                continue;
            }

            let hop = reply.probe_id.hop;
            let Some(sent_at) = pending.remove(&hop) else {
                tracing::trace!(hop, from = %reply.responder, "duplicate reply");
                report.discarded += 1;
                continue;
            };

            let rtt = received_at.duration_since(sent_at);
            let changed = match self.result.hop(hop) {
                Some(stats) => stats.lock().record_reply(reply.responder, rtt),
                None => false,
            };
            report.accepted += 1;

            if changed {
                tracing::debug!(hop, addr = %reply.responder, "new responder");
                renamed.push(hop);
            }

            if reply.responder == self.destination {
                report.reached = true;
                dest_hop = Some(dest_hop.map_or(hop, |d| d.min(hop)));
            }
        }

        renamed
    }

    /// Best-effort reverse lookups for hops with a new responder
    ///
    /// Lookups run concurrently; the whole batch is bounded by one timeout and
    /// abandoned as soon as `cancel` fires. Names that resolved before that
    /// are kept.
    async fn resolve_names(&self, hops: &[u8], cancel: &CancellationToken) {
        if hops.is_empty() {
            return;
        }

        let lookups = stream::iter(hops.iter().copied())
            .for_each_concurrent(MAX_CONCURRENT_LOOKUPS, |hop| self.resolve_hop(hop));

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!(hops = hops.len(), "reverse lookups abandoned");
            }
            finished = tokio::time::timeout(self.config.timeout, lookups) => {
                if finished.is_err() {
                    tracing::debug!(hops = hops.len(), "reverse lookups timed out");
                }
            }
        }
    }

    async fn resolve_hop(&self, hop: u8) {
        let Some(stats) = self.result.hop(hop) else {
            return;
        };
        let addr = stats.lock().addr;
        let Some(addr) = addr else {
            return;
        };

        let Some(hostname) = self.resolver.reverse_lookup(addr).await else {
            return;
        };
        let mut stats = stats.lock();
        // The address may have moved on while we were waiting
        if stats.addr == Some(addr) {
            stats.hostname = Some(hostname);
        }
    }

    fn finalize(&self) {
        for stats in self.result.hops() {
            stats.lock().finalize();
        }
    }
}
