//! RTP/RTCP port pair allocation
//!
//! Pairs are an even RTP port followed by its RTCP port. The allocator hands
//! them out round-robin from a configured range; a call keeps one pair per
//! media session id so a renegotiated channel binds the same ports again.

use std::collections::{HashMap, HashSet};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, RtpFuzzError};

pub const DEFAULT_RTP_BASE: u16 = 5000;
pub const DEFAULT_RTP_MAX: u16 = 5999;

/// RTP port and the RTCP port next to it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PortPair {
    pub rtp: u16,
    pub rtcp: u16,
}

impl PortPair {
    pub fn new(rtp: u16) -> Self {
        Self {
            rtp,
            rtcp: rtp.wrapping_add(1),
        }
    }
}

/// Inclusive port range for media sockets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortRange {
    pub base: u16,
    pub max: u16,
}

impl Default for PortRange {
    fn default() -> Self {
        Self {
            base: DEFAULT_RTP_BASE,
            max: DEFAULT_RTP_MAX,
        }
    }
}

impl PortRange {
    pub fn new(base: u16, max: u16) -> Self {
        Self { base, max }
    }

    /// First even port of the range
    fn first_even(&self) -> u32 {
        let base = self.base as u32;
        base + (base & 1)
    }

    /// Number of complete pairs in the range
    pub fn pair_count(&self) -> usize {
        let first = self.first_even();
        let max = self.max as u32;
        if max < first + 1 {
            0
        } else {
            ((max - first - 1) / 2 + 1) as usize
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.pair_count() == 0 {
            return Err(RtpFuzzError::config(format!(
                "RTP port range {}-{} holds no even/odd port pair",
                self.base, self.max
            )));
        }
        Ok(())
    }
}

#[derive(Debug)]
struct AllocatorState {
    cursor: usize,
    in_use: HashSet<u16>,
}

/// Round-robin allocator shared by all calls
#[derive(Debug)]
pub struct RtpPortAllocator {
    range: PortRange,
    state: Mutex<AllocatorState>,
}

impl RtpPortAllocator {
    pub fn new(range: PortRange) -> Result<Self> {
        range.validate()?;
        Ok(Self {
            range,
            state: Mutex::new(AllocatorState {
                cursor: 0,
                in_use: HashSet::new(),
            }),
        })
    }

    pub fn range(&self) -> PortRange {
        self.range
    }

    /// Take the next free pair, wrapping around the range
    pub fn allocate(&self) -> Result<PortPair> {
        let pairs = self.range.pair_count();
        let first = self.range.first_even();
        let mut state = self.state.lock();

        for _ in 0..pairs {
            let rtp = (first + 2 * state.cursor as u32) as u16;
            state.cursor = (state.cursor + 1) % pairs;
            if state.in_use.insert(rtp) {
                debug!("Allocated RTP port pair {}/{}", rtp, rtp + 1);
                return Ok(PortPair::new(rtp));
            }
        }

        Err(RtpFuzzError::PortRangeExhausted {
            base: self.range.base,
            max: self.range.max,
        })
    }

    /// Return a pair to the pool
    pub fn release(&self, pair: PortPair) {
        if self.state.lock().in_use.remove(&pair.rtp) {
            debug!("Released RTP port pair {}/{}", pair.rtp, pair.rtcp);
        }
    }

    pub fn in_use(&self) -> usize {
        self.state.lock().in_use.len()
    }
}

/// Port pairs of one call, keyed by media session id
#[derive(Debug, Default)]
pub struct SessionPorts {
    ports: Mutex<HashMap<u32, PortPair>>,
}

impl SessionPorts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reuse the pair already bound to `session_id` or allocate a new one
    pub fn get_or_allocate(&self, session_id: u32, allocator: &RtpPortAllocator) -> Result<PortPair> {
        let mut ports = self.ports.lock();
        if let Some(pair) = ports.get(&session_id) {
            return Ok(*pair);
        }
        let pair = allocator.allocate()?;
        ports.insert(session_id, pair);
        Ok(pair)
    }

    pub fn get(&self, session_id: u32) -> Option<PortPair> {
        self.ports.lock().get(&session_id).copied()
    }

    /// Give every pair of the call back to the allocator
    pub fn release_all(&self, allocator: &RtpPortAllocator) {
        for (_, pair) in self.ports.lock().drain() {
            allocator.release(pair);
        }
    }
}
