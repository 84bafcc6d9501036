// Copyright 2026 the Xsurf Authors
// SPDX-License-Identifier: Apache-2.0

//! Compositor frame synchronization over XSync counters.
//!
//! A toplevel owns two counters. The basic counter answers plain
//! `_NET_WM_SYNC_REQUEST` configure handshakes. The extended counter carries
//! the odd/even drawing protocol: odd while a frame is being drawn, even once
//! it is finished, with `_NET_WM_FRAME_DRAWN` acknowledging the even value.
//!
//! This module is deliberately free of X calls. Every method returns the
//! counter updates it wants as [`CounterWrite`] values; the surface turns
//! them into `sync_set_counter` requests. That keeps the whole protocol
//! testable without a server.

use x11rb::protocol::sync;

/// Where a toplevel is in the frame cycle.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum FrameState {
    /// No frame in progress.
    Idle,
    /// Between begin-frame and end-frame; drawing may be happening.
    InFrame,
    /// A frame was published and we are waiting for `_NET_WM_FRAME_DRAWN`.
    /// The surface's frame clock stays frozen until the ack arrives.
    AwaitingAck,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum CounterKind {
    Basic,
    Extended,
}

/// One `sync_set_counter` the caller should issue.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) struct CounterWrite {
    pub kind: CounterKind,
    pub value: i64,
}

/// The counter XIDs, created at first map and destroyed with the surface.
#[derive(Copy, Clone, Debug)]
pub(crate) struct SyncCounters {
    pub basic: sync::Counter,
    pub extended: sync::Counter,
}

/// A counter value received from the WM, not yet answered.
#[derive(Copy, Clone, Debug)]
struct Staged {
    value: i64,
    extended: bool,
}

/// Result of [`FrameSync::end_frame`].
#[derive(Debug, Default)]
pub(crate) struct EndFrame {
    pub writes: Vec<CounterWrite>,
    /// When false the frame is outstanding and the caller must freeze the
    /// surface's frame clock until the `_NET_WM_FRAME_DRAWN` ack.
    pub complete: bool,
}

pub(crate) struct FrameSync {
    counters: Option<SyncCounters>,
    state: FrameState,
    /// The last value published on the extended counter. Even outside a
    /// frame, odd while drawing. This is the only place raw parity lives.
    value: i64,
    /// Value from `_NET_WM_SYNC_REQUEST`, waiting for its ConfigureNotify.
    pending: Option<Staged>,
    /// Promoted by ConfigureNotify; consumed by the next frame.
    staged: Option<Staged>,
    /// Set when a frame began without known damage; the first damage
    /// notification flips the counter odd.
    damage_armed: bool,
    awaiting_serial: i64,
}

impl FrameSync {
    pub fn new() -> FrameSync {
        FrameSync {
            counters: None,
            state: FrameState::Idle,
            value: 0,
            pending: None,
            staged: None,
            damage_armed: false,
            awaiting_serial: 0,
        }
    }

    /// Called once the counter pair exists on the server.
    pub fn enable(&mut self, counters: SyncCounters) {
        self.counters = Some(counters);
    }

    pub fn counters(&self) -> Option<SyncCounters> {
        self.counters
    }

    pub fn enabled(&self) -> bool {
        self.counters.is_some()
    }

    #[cfg(test)]
    pub fn state(&self) -> FrameState {
        self.state
    }

    pub fn frame_pending(&self) -> bool {
        self.state == FrameState::AwaitingAck
    }

    /// `_NET_WM_SYNC_REQUEST` client message: stage the value until the
    /// matching ConfigureNotify arrives.
    pub fn handle_sync_request(&mut self, lo: u32, hi: u32, extended: bool) {
        let value = (lo as i64) | ((hi as i64) << 32);
        self.pending = Some(Staged { value, extended });
    }

    /// ConfigureNotify promotes the pending value; it now belongs to the
    /// next frame we draw.
    pub fn configure_received(&mut self) {
        if let Some(pending) = self.pending.take() {
            self.staged = Some(pending);
        }
    }

    /// Start a frame. Adopting a staged extended value, or `force`, makes the
    /// extended counter odd immediately; otherwise the first damage
    /// notification does it lazily.
    pub fn begin_frame(&mut self, force: bool) -> Option<CounterWrite> {
        if self.counters.is_none() || self.state != FrameState::Idle {
            return None;
        }
        self.state = FrameState::InFrame;
        self.damage_armed = false;

        let staged_extended = matches!(self.staged, Some(Staged { extended: true, .. }));
        if staged_extended {
            // This frame answers the WM's configure. Adopt its serial,
            // normalized to an even base, then go odd for the draw.
            if let Some(staged) = self.staged.take() {
                self.value = staged.value;
            }
            if self.value % 2 == 1 {
                self.value += 1;
            }
            self.value += 1;
            Some(self.extended_write())
        } else if force {
            debug_assert!(self.value % 2 == 0);
            self.value += 1;
            Some(self.extended_write())
        } else {
            self.damage_armed = true;
            None
        }
    }

    /// First damage inside a lazily-armed frame flips the counter odd.
    pub fn notify_damage(&mut self) -> Option<CounterWrite> {
        if self.state == FrameState::InFrame && self.damage_armed && self.value % 2 == 0 {
            self.damage_armed = false;
            self.value += 1;
            Some(self.extended_write())
        } else {
            None
        }
    }

    /// Finish a frame. `slept` reports that drawing was deliberately delayed
    /// to match a predicted presentation time; the counter then advances by 3
    /// instead of 1 so the compositor can tell the difference.
    /// `ack_supported` is whether the WM advertises `_NET_WM_FRAME_DRAWN`.
    pub fn end_frame(&mut self, slept: bool, ack_supported: bool) -> EndFrame {
        if self.counters.is_none() || self.state != FrameState::InFrame {
            return EndFrame {
                writes: Vec::new(),
                complete: true,
            };
        }
        self.damage_armed = false;
        let mut writes = Vec::new();
        let mut complete = true;

        if self.value % 2 == 1 {
            self.value += if slept { 3 } else { 1 };
            writes.push(self.extended_write());
            if ack_supported {
                self.state = FrameState::AwaitingAck;
                self.awaiting_serial = self.value;
                complete = false;
            } else {
                self.state = FrameState::Idle;
            }
        } else {
            // Nothing was drawn; the counter never went odd and there is
            // nothing to publish.
            self.state = FrameState::Idle;
        }

        // A basic-only WM gets its configure answered here.
        if matches!(self.staged, Some(Staged { extended: false, .. })) {
            if let Some(staged) = self.staged.take() {
                writes.push(CounterWrite {
                    kind: CounterKind::Basic,
                    value: staged.value,
                });
            }
        }

        EndFrame { writes, complete }
    }

    /// `_NET_WM_FRAME_DRAWN` ack. Returns true when this thaws the frame
    /// clock.
    pub fn handle_frame_drawn(&mut self, serial: i64) -> bool {
        if self.state == FrameState::AwaitingAck && serial >= self.awaiting_serial {
            self.state = FrameState::Idle;
            true
        } else {
            false
        }
    }

    /// The WM never acks an unmapped window; drop any outstanding frame.
    /// Returns true when the frame clock should be thawed.
    pub fn handle_unmap(&mut self) -> bool {
        self.pending = None;
        self.staged = None;
        if self.state == FrameState::AwaitingAck {
            self.state = FrameState::Idle;
            true
        } else {
            false
        }
    }

    fn extended_write(&self) -> CounterWrite {
        CounterWrite {
            kind: CounterKind::Extended,
            value: self.value,
        }
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;

    fn enabled() -> FrameSync {
        let mut fs = FrameSync::new();
        fs.enable(SyncCounters {
            basic: 101,
            extended: 102,
        });
        fs
    }

    #[test]
    fn disabled_controller_never_writes() {
        let mut fs = FrameSync::new();
        assert!(fs.begin_frame(true).is_none());
        let end = fs.end_frame(false, true);
        assert!(end.writes.is_empty());
        assert!(end.complete);
        assert_eq!(fs.state(), FrameState::Idle);
    }

    #[test]
    fn forced_frame_keeps_parity_invariant() {
        let mut fs = enabled();
        let begin = fs.begin_frame(true).unwrap();
        assert_eq!(begin.kind, CounterKind::Extended);
        assert_eq!(begin.value % 2, 1);
        let end = fs.end_frame(false, false);
        assert!(end.complete);
        assert_eq!(end.writes.len(), 1);
        assert_eq!(end.writes[0].value % 2, 0);
        assert_eq!(end.writes[0].value, begin.value + 1);
        assert_eq!(fs.state(), FrameState::Idle);
    }

    #[test]
    fn lazy_frame_publishes_on_first_damage_only() {
        let mut fs = enabled();
        assert!(fs.begin_frame(false).is_none());
        let first = fs.notify_damage().unwrap();
        assert_eq!(first.value % 2, 1);
        // Further damage in the same frame is already covered.
        assert!(fs.notify_damage().is_none());
        let end = fs.end_frame(false, false);
        assert_eq!(end.writes.len(), 1);
    }

    #[test]
    fn undamaged_frame_publishes_nothing() {
        let mut fs = enabled();
        assert!(fs.begin_frame(false).is_none());
        let end = fs.end_frame(false, true);
        assert!(end.writes.is_empty());
        assert!(end.complete);
        assert_eq!(fs.state(), FrameState::Idle);
    }

    #[test]
    fn sync_request_waits_for_configure() {
        let mut fs = enabled();
        fs.handle_sync_request(0x10, 0x2, true);
        // Not yet staged: a frame before the ConfigureNotify ignores it.
        assert!(fs.begin_frame(false).is_none());
        fs.end_frame(false, false);

        fs.configure_received();
        let begin = fs.begin_frame(false).unwrap();
        let requested = 0x10i64 | (0x2i64 << 32);
        assert_eq!(begin.kind, CounterKind::Extended);
        // Adopted serial, made odd.
        assert_eq!(begin.value, requested + 1);
        assert_eq!(begin.value % 2, 1);
    }

    #[test]
    fn basic_only_request_flushed_at_end_frame() {
        let mut fs = enabled();
        fs.handle_sync_request(42, 0, false);
        fs.configure_received();
        assert!(fs.begin_frame(false).is_none());
        let end = fs.end_frame(false, true);
        assert_eq!(end.writes.len(), 1);
        assert_eq!(
            end.writes[0],
            CounterWrite {
                kind: CounterKind::Basic,
                value: 42
            }
        );
        // Nothing went odd, so nothing is outstanding.
        assert!(end.complete);
    }

    #[test]
    fn frame_drawn_ack_thaws_matching_serial() {
        let mut fs = enabled();
        let begin = fs.begin_frame(true).unwrap();
        let end = fs.end_frame(false, true);
        assert!(!end.complete);
        assert_eq!(fs.state(), FrameState::AwaitingAck);
        assert!(fs.frame_pending());

        // A stale ack from an earlier frame does not thaw.
        assert!(!fs.handle_frame_drawn(begin.value - 2));
        assert_eq!(fs.state(), FrameState::AwaitingAck);

        assert!(fs.handle_frame_drawn(end.writes[0].value));
        assert_eq!(fs.state(), FrameState::Idle);
    }

    #[test]
    fn unmap_clears_outstanding_frame() {
        let mut fs = enabled();
        fs.begin_frame(true);
        let end = fs.end_frame(false, true);
        assert!(!end.complete);
        assert!(fs.handle_unmap());
        assert_eq!(fs.state(), FrameState::Idle);
        // And a second unmap has nothing left to thaw.
        assert!(!fs.handle_unmap());
    }

    #[test]
    fn slept_frame_advances_counter_by_three() {
        let mut fs = enabled();
        let begin = fs.begin_frame(true).unwrap();
        let end = fs.end_frame(true, false);
        assert_eq!(end.writes[0].value, begin.value + 3);
        assert_eq!(end.writes[0].value % 2, 0);
    }

    #[test]
    fn begin_frame_is_exclusive() {
        let mut fs = enabled();
        fs.begin_frame(true);
        assert!(fs.begin_frame(true).is_none());
        assert_eq!(fs.state(), FrameState::InFrame);
    }
}
