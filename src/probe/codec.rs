//! Probe identity on the wire.
//!
//! Each probe's ICMP sequence number carries the hop in the low byte and the
//! cycle index (modulo 256) in the high byte. The identifier field carries a
//! run-scoped value chosen once at construction.

/// Identifies a specific probe for correlation
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub struct ProbeId {
    /// Cycle index truncated to the wire width
    pub cycle: u8,
    pub hop: u8,
}

impl ProbeId {
    /// Build a probe id from a full cycle counter; only the low 8 bits survive.
    pub fn new(cycle: u64, hop: u8) -> Self {
        Self {
            cycle: (cycle & 0xFF) as u8,
            hop,
        }
    }

    /// Encode into the 16-bit ICMP sequence field
    pub fn to_sequence(&self) -> u16 {
        ((self.cycle as u16) << 8) | (self.hop as u16)
    }

    /// Decode from a 16-bit ICMP sequence field
    pub fn from_sequence(seq: u16) -> Self {
        Self {
            cycle: (seq >> 8) as u8,
            hop: (seq & 0xFF) as u8,
        }
    }

    /// True if this probe belongs to the given (untruncated) cycle
    pub fn matches_cycle(&self, cycle: u64) -> bool {
        self.cycle == (cycle & 0xFF) as u8
    }
}

/// Derive the run identifier from the process id, masked to the wire width
pub fn process_identifier() -> u16 {
    (std::process::id() & 0xFFFF) as u16
}
