use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::time::Duration;

use crate::state::duration_serde;

/// Live statistics for one hop (TTL position) in the path
///
/// Counters only grow within a run. The derived fields (`lost`, `loss_pct`
/// and the RTT aggregates) are refreshed by [`HopStats::finalize`] at the end
/// of each cycle.
#[derive(Debug, Clone)]
pub struct HopStats {
    hop: u8,
    pub addr: Option<Ipv4Addr>,
    pub hostname: Option<String>,

    // Counters
    pub sent: u64,
    pub received: u64,
    pub lost: u64,
    pub loss_pct: f64,

    // Latency stats
    pub last_rtt: Duration,
    pub avg_rtt: Duration,
    pub min_rtt: Duration,
    pub max_rtt: Duration,
    pub stddev: Duration,

    rtts: Vec<Duration>,
}

impl HopStats {
    pub fn new(hop: u8) -> Self {
        Self {
            hop,
            addr: None,
            hostname: None,
            sent: 0,
            received: 0,
            lost: 0,
            loss_pct: 0.0,
            last_rtt: Duration::ZERO,
            avg_rtt: Duration::ZERO,
            min_rtt: Duration::MAX,
            max_rtt: Duration::ZERO,
            stddev: Duration::ZERO,
            rtts: Vec::new(),
        }
    }

    pub fn hop(&self) -> u8 {
        self.hop
    }

    /// Raw RTT sample accumulated so far
    pub fn rtts(&self) -> &[Duration] {
        &self.rtts
    }

    /// Record a probe was sent for this hop
    pub fn record_sent(&mut self) {
        self.sent += 1;
    }

    /// Record a correlated reply.
    ///
    /// Returns true when the responder differs from the previously known one,
    /// in which case any resolved hostname is cleared.
    pub fn record_reply(&mut self, responder: Ipv4Addr, rtt: Duration) -> bool {
        // A reply without a matching send would break sent >= received
        if self.received >= self.sent {
            return false;
        }

        self.received += 1;
        self.last_rtt = rtt;
        self.rtts.push(rtt);

        if self.addr == Some(responder) {
            return false;
        }
        self.addr = Some(responder);
        self.hostname = None;
        true
    }

    /// Recompute loss and RTT aggregates from the full sample
    pub fn finalize(&mut self) {
        self.lost = self.sent - self.received;
        self.loss_pct = if self.sent == 0 {
            0.0
        } else {
            self.lost as f64 * 100.0 / self.sent as f64
        };

        let summary = RttSummary::from_samples(&self.rtts);
        self.min_rtt = summary.min;
        self.max_rtt = summary.max;
        self.avg_rtt = summary.avg;
        self.stddev = summary.stddev;
    }

    /// Copy of the derived view, without the raw sample
    pub fn snapshot(&self) -> HopSnapshot {
        HopSnapshot {
            hop: self.hop,
            addr: self.addr,
            hostname: self.hostname.clone(),
            sent: self.sent,
            received: self.received,
            lost: self.lost,
            loss_pct: self.loss_pct,
            last_rtt: self.last_rtt,
            avg_rtt: self.avg_rtt,
            min_rtt: self.min_rtt,
            max_rtt: self.max_rtt,
            stddev: self.stddev,
        }
    }
}

/// Aggregates over an RTT sample
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RttSummary {
    pub min: Duration,
    pub max: Duration,
    pub avg: Duration,
    pub stddev: Duration,
}

impl RttSummary {
    /// Min/max from a sorted copy, mean, and population standard deviation.
    ///
    /// An empty sample yields the sentinel `min = Duration::MAX` and zeros.
    pub fn from_samples(samples: &[Duration]) -> Self {
        if samples.is_empty() {
            return Self {
                min: Duration::MAX,
                max: Duration::ZERO,
                avg: Duration::ZERO,
                stddev: Duration::ZERO,
            };
        }

        let mut sorted = samples.to_vec();
        sorted.sort_unstable();

        let n = samples.len() as f64;
        let nanos: Vec<f64> = samples.iter().map(|d| d.as_nanos() as f64).collect();
        let mean = nanos.iter().sum::<f64>() / n;
        let variance = nanos.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;

        Self {
            min: sorted[0],
            max: sorted[sorted.len() - 1],
            avg: Duration::from_nanos(mean.round() as u64),
            stddev: Duration::from_nanos(variance.sqrt().round() as u64),
        }
    }
}

/// Point-in-time copy of a hop's derived statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HopSnapshot {
    pub hop: u8,
    pub addr: Option<Ipv4Addr>,
    pub hostname: Option<String>,
    pub sent: u64,
    pub received: u64,
    pub lost: u64,
    pub loss_pct: f64,
    #[serde(with = "duration_serde")]
    pub last_rtt: Duration,
    #[serde(with = "duration_serde")]
    pub avg_rtt: Duration,
    #[serde(with = "duration_serde")]
    pub min_rtt: Duration,
    #[serde(with = "duration_serde")]
    pub max_rtt: Duration,
    #[serde(with = "duration_serde")]
    pub stddev: Duration,
}

impl HopSnapshot {
    /// True once the hop has answered at least once
    pub fn is_active(&self) -> bool {
        self.addr.is_some()
    }

    /// Display name: hostname if resolved, else address, else `???`
    pub fn display_host(&self) -> String {
        match (&self.hostname, self.addr) {
            (Some(name), _) => name.clone(),
            (None, Some(ip)) => ip.to_string(),
            (None, None) => "???".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROUTER: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 1);

    #[test]
    fn test_initial_state() {
        let hop = HopStats::new(3);
        assert_eq!(hop.hop(), 3);
        assert_eq!(hop.addr, None);
        assert_eq!(hop.sent, 0);
        assert_eq!(hop.received, 0);
        assert_eq!(hop.min_rtt, Duration::MAX);
        assert_eq!(hop.max_rtt, Duration::ZERO);
        assert_eq!(hop.loss_pct, 0.0);
    }

    #[test]
    fn test_known_samples() {
        // Samples 10, 20, 30 ms: mean 20ms, population stddev ~8.165ms
        let summary = RttSummary::from_samples(&[
            Duration::from_millis(30),
            Duration::from_millis(10),
            Duration::from_millis(20),
        ]);
        assert_eq!(summary.min, Duration::from_millis(10));
        assert_eq!(summary.max, Duration::from_millis(30));
        assert_eq!(summary.avg, Duration::from_millis(20));
        let stddev = summary.stddev.as_micros();
        assert!((8160..=8170).contains(&stddev), "stddev was {stddev}us");
    }

    #[test]
    fn test_single_sample_has_zero_stddev() {
        let summary = RttSummary::from_samples(&[Duration::from_millis(7)]);
        assert_eq!(summary.min, Duration::from_millis(7));
        assert_eq!(summary.max, Duration::from_millis(7));
        assert_eq!(summary.stddev, Duration::ZERO);
    }

    #[test]
    fn test_loss_calculation() {
        let mut hop = HopStats::new(5);

        // No sends = 0% loss
        hop.finalize();
        assert_eq!(hop.loss_pct, 0.0);

        for _ in 0..10 {
            hop.record_sent();
        }
        hop.finalize();
        assert_eq!(hop.loss_pct, 100.0);
        assert_eq!(hop.lost, 10);

        for _ in 0..7 {
            hop.record_reply(ROUTER, Duration::from_millis(10));
        }
        hop.finalize();
        assert_eq!(hop.lost, 3);
        assert_eq!(hop.loss_pct, 30.0);
    }

    #[test]
    fn test_received_never_exceeds_sent() {
        let mut hop = HopStats::new(1);
        hop.record_sent();
        hop.record_reply(ROUTER, Duration::from_millis(1));
        hop.record_reply(ROUTER, Duration::from_millis(2));
        assert_eq!(hop.sent, 1);
        assert_eq!(hop.received, 1);
        assert_eq!(hop.rtts().len(), 1);
    }

    #[test]
    fn test_address_change_clears_hostname() {
        let other = Ipv4Addr::new(10, 9, 9, 9);
        let mut hop = HopStats::new(2);
        hop.record_sent();
        hop.record_sent();

        assert!(hop.record_reply(ROUTER, Duration::from_millis(1)));
        hop.hostname = Some("gw.lan".to_string());
        assert!(hop.record_reply(other, Duration::from_millis(1)));
        assert_eq!(hop.addr, Some(other));
        assert_eq!(hop.hostname, None);
    }

    #[test]
    fn test_same_address_not_a_change() {
        let mut hop = HopStats::new(2);
        hop.record_sent();
        hop.record_sent();
        assert!(hop.record_reply(ROUTER, Duration::from_millis(1)));
        assert!(!hop.record_reply(ROUTER, Duration::from_millis(2)));
        assert_eq!(hop.last_rtt, Duration::from_millis(2));
    }

    #[test]
    fn test_snapshot_display_host() {
        let mut hop = HopStats::new(4);
        assert_eq!(hop.snapshot().display_host(), "???");
        hop.record_sent();
        hop.record_reply(ROUTER, Duration::from_millis(1));
        assert_eq!(hop.snapshot().display_host(), "192.168.1.1");
        hop.hostname = Some("gw.lan".to_string());
        assert_eq!(hop.snapshot().display_host(), "gw.lan");
    }
}
