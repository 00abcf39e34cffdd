use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::time::Duration;

use crate::state::duration_serde;
use crate::state::hop::{HopSnapshot, HopStats};

/// Run-level counters
#[derive(Debug, Clone)]
struct Progress {
    cycles: u64,
    started_at: DateTime<Utc>,
    duration: Duration,
}

/// Live aggregate for one run
///
/// Each hop sits behind its own lock so snapshot readers only ever contend
/// with the hop currently being written.
#[derive(Debug)]
pub struct MtrResult {
    target: String,
    resolved: Ipv4Addr,
    hops: Vec<Mutex<HopStats>>,
    progress: Mutex<Progress>,
}

impl MtrResult {
    pub fn new(target: String, resolved: Ipv4Addr, max_hops: u8) -> Self {
        Self {
            target,
            resolved,
            hops: (1..=max_hops).map(|hop| Mutex::new(HopStats::new(hop))).collect(),
            progress: Mutex::new(Progress {
                cycles: 0,
                started_at: Utc::now(),
                duration: Duration::ZERO,
            }),
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn resolved(&self) -> Ipv4Addr {
        self.resolved
    }

    pub fn max_hops(&self) -> u8 {
        self.hops.len() as u8
    }

    /// Get hop by TTL (1-indexed)
    pub fn hop(&self, hop: u8) -> Option<&Mutex<HopStats>> {
        if hop == 0 {
            None
        } else {
            self.hops.get(hop as usize - 1)
        }
    }

    pub fn hops(&self) -> impl Iterator<Item = &Mutex<HopStats>> {
        self.hops.iter()
    }

    /// Number of completed cycles
    pub fn cycles(&self) -> u64 {
        self.progress.lock().cycles
    }

    /// Restart the run clock
    pub fn mark_started(&self) {
        let mut progress = self.progress.lock();
        progress.started_at = Utc::now();
        progress.duration = Duration::ZERO;
    }

    /// Count a completed cycle and add the time it took to the run duration
    pub fn complete_cycle(&self, elapsed: Duration) {
        let mut progress = self.progress.lock();
        progress.cycles += 1;
        progress.duration += elapsed;
    }

    /// Independent deep copy of the current state
    ///
    /// Scalars are copied first, then every hop under its own lock. Snapshots
    /// carry derived aggregates only, never the live RTT sample.
    pub fn snapshot(&self) -> ResultSnapshot {
        let progress = self.progress.lock().clone();
        let hops = self.hops.iter().map(|hop| hop.lock().snapshot()).collect();

        ResultSnapshot {
            target: self.target.clone(),
            resolved: self.resolved,
            hops,
            cycles: progress.cycles,
            started_at: progress.started_at,
            duration: progress.duration,
        }
    }
}

/// Point-in-time copy of a whole run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultSnapshot {
    pub target: String,
    pub resolved: Ipv4Addr,
    pub hops: Vec<HopSnapshot>,
    pub cycles: u64,
    pub started_at: DateTime<Utc>,
    #[serde(with = "duration_serde")]
    pub duration: Duration,
}

impl ResultSnapshot {
    /// Get hop by TTL (1-indexed)
    pub fn hop(&self, hop: u8) -> Option<&HopSnapshot> {
        if hop == 0 {
            None
        } else {
            self.hops.get(hop as usize - 1)
        }
    }

    /// Hops that have answered at least once
    pub fn active_hops(&self) -> impl Iterator<Item = &HopSnapshot> {
        self.hops.iter().filter(|h| h.is_active())
    }

    /// Hops up to and including the first one answered by the destination;
    /// all hops when the destination has not answered yet
    pub fn path(&self) -> &[HopSnapshot] {
        let end = self
            .hops
            .iter()
            .position(|h| h.addr == Some(self.resolved))
            .map(|idx| idx + 1)
            .unwrap_or(self.hops.len());
        &self.hops[..end]
    }
}
