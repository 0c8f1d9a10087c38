//! Delayed control-word delivery for streaming sinks.
//!
//! A relay serving live transport streams must not switch descrambler keys
//! the instant an ECM decodes - the scrambler side flips parity a little
//! later. The ECM decoder therefore stamps each CW packet with
//! `write_time = now + delay` and the streaming side drains only packets
//! whose time has come.
//!
//! One [`DelayedCwQueue`] covers a fixed number of connection slots. A slot
//! is bound to a service id while a connection is active; the decoder
//! appends to every slot bound to the ECM's service that does not receive
//! its own ECM stream. The mutex is held only for the slot-matching test
//! and the append, never across a decode.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Connection slots per queue.
pub const MAX_SLOTS: usize = 8;

/// Upper bound on pending packets per slot; the oldest packet is dropped
/// when a push would exceed it.
const MAX_PENDING: usize = 32;

/// One ECM's worth of CWs, stamped for delayed application.
#[derive(Debug, Clone)]
pub struct CwPacket {
    /// All eight class CWs in bundle order.
    pub cws: [[u8; 8]; 8],
    /// CSA (true) or DES (false) descrambling.
    pub csa_used: bool,
    /// Even-parity ECM.
    pub even: bool,
    /// Earliest instant the streaming side may apply the packet.
    pub write_time: Instant,
}

#[derive(Debug, Default)]
struct Slot {
    srvid: Option<u16>,
    /// The connection receives and decodes its own ECM stream; late-bound
    /// CWs from other decoders are not wanted.
    has_own_ecm: bool,
    pending: VecDeque<CwPacket>,
}

/// Per-slot delayed CW FIFO shared between ECM decoders and a streaming
/// server.
#[derive(Debug)]
pub struct DelayedCwQueue {
    slots: Mutex<[Slot; MAX_SLOTS]>,
    delay: Duration,
}

impl DelayedCwQueue {
    /// Create a queue applying `delay` to every pushed packet.
    pub fn new(delay: Duration) -> Self {
        DelayedCwQueue {
            slots: Mutex::new(Default::default()),
            delay,
        }
    }

    /// Bind `slot` to a service. Clears any stale pending packets.
    pub fn bind(&self, slot: usize, srvid: u16, has_own_ecm: bool) {
        let mut slots = self.slots.lock();
        slots[slot] = Slot {
            srvid: Some(srvid),
            has_own_ecm,
            pending: VecDeque::new(),
        };
    }

    /// Release `slot`.
    pub fn release(&self, slot: usize) {
        let mut slots = self.slots.lock();
        slots[slot] = Slot::default();
    }

    /// Does any bound slot want late-bound CWs for `srvid`?
    pub(crate) fn wants(&self, srvid: u16) -> bool {
        let slots = self.slots.lock();
        slots
            .iter()
            .any(|s| !s.has_own_ecm && s.srvid == Some(srvid))
    }

    /// Append a packet to every slot bound to `srvid` without its own ECM
    /// stream, stamped `now + delay`. Full slots drop their oldest packet.
    pub(crate) fn push(&self, srvid: u16, cws: [[u8; 8]; 8], csa_used: bool, even: bool) {
        let write_time = Instant::now() + self.delay;
        let mut slots = self.slots.lock();

        for slot in slots
            .iter_mut()
            .filter(|s| !s.has_own_ecm && s.srvid == Some(srvid))
        {
            if slot.pending.len() == MAX_PENDING {
                slot.pending.pop_front();
            }
            slot.pending.push_back(CwPacket {
                cws,
                csa_used,
                even,
                write_time,
            });
        }
    }

    /// Remove and return every packet of `slot` due at `now`, oldest first.
    pub fn drain_due(&self, slot: usize, now: Instant) -> Vec<CwPacket> {
        let mut slots = self.slots.lock();
        let pending = &mut slots[slot].pending;

        let mut due = Vec::new();
        while pending.front().is_some_and(|p| p.write_time <= now) {
            due.push(pending.pop_front().expect("front checked above"));
        }
        due
    }
}
