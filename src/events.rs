// Copyright 2026 the Xsurf Authors
// SPDX-License-Identifier: Apache-2.0

//! Event interest registration and the event pump.

use std::collections::{HashMap, VecDeque};

use x11rb::connection::Connection;
use x11rb::protocol::xproto::{self, ChangeWindowAttributesAux, ConnectionExt, EventMask};
use x11rb::protocol::Event;
use x11rb::xcb_ffi::XCBConnection;

use crate::display::Display;

/// What an event filter did with an event.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FilterResult {
    /// The filter swallowed the event; dispatch stops.
    Consumed,
    /// Not interesting to the filter; dispatch continues.
    Continue,
}

pub type EventFilter = Box<dyn Fn(&Display, &Event) -> FilterResult>;

/// Tracks which events each window is subscribed to.
///
/// X has one event mask per window per client, so independent interests have
/// to be merged before they reach the server. Registration is idempotent: a
/// mask that is already covered issues no request.
#[derive(Debug, Default)]
pub(crate) struct EventSource {
    interest: HashMap<xproto::Window, EventMask>,
}

impl EventSource {
    pub fn new() -> EventSource {
        EventSource::default()
    }

    /// Merge `mask` into the window's interest. Returns the combined mask if
    /// the server needs updating.
    fn merge(&mut self, window: xproto::Window, mask: EventMask) -> Option<EventMask> {
        let entry = self.interest.entry(window).or_insert(EventMask::NO_EVENT);
        let merged = *entry | mask;
        if merged != *entry {
            *entry = merged;
            Some(merged)
        } else {
            None
        }
    }

    pub fn register(
        &mut self,
        conn: &XCBConnection,
        window: xproto::Window,
        mask: EventMask,
    ) -> Result<(), anyhow::Error> {
        if let Some(merged) = self.merge(window, mask) {
            conn.change_window_attributes(
                window,
                &ChangeWindowAttributesAux::new().event_mask(merged),
            )?
            .ignore_error();
        }
        Ok(())
    }

    pub fn unregister(&mut self, window: xproto::Window) {
        self.interest.remove(&window);
    }
}

/// Drain everything the server already sent without blocking.
pub(crate) fn pump(
    conn: &XCBConnection,
    backlog: &mut VecDeque<Event>,
) -> Result<bool, anyhow::Error> {
    let mut received = false;
    while let Some(event) = conn.poll_for_event()? {
        backlog.push_back(event);
        received = true;
    }
    Ok(received)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_reports_only_new_bits() {
        let mut source = EventSource::new();
        assert_eq!(
            source.merge(5, EventMask::EXPOSURE),
            Some(EventMask::EXPOSURE)
        );
        // Same mask again: already covered, no server round trip.
        assert_eq!(source.merge(5, EventMask::EXPOSURE), None);
        // A subset of the current interest is also covered.
        assert_eq!(source.merge(5, EventMask::NO_EVENT), None);
        // New bits merge with the old ones.
        assert_eq!(
            source.merge(5, EventMask::STRUCTURE_NOTIFY),
            Some(EventMask::EXPOSURE | EventMask::STRUCTURE_NOTIFY)
        );
    }

    #[test]
    fn interest_is_per_window() {
        let mut source = EventSource::new();
        source.merge(1, EventMask::EXPOSURE);
        assert_eq!(
            source.merge(2, EventMask::EXPOSURE),
            Some(EventMask::EXPOSURE)
        );
    }

    #[test]
    fn unregister_forgets_the_window() {
        let mut source = EventSource::new();
        source.merge(1, EventMask::EXPOSURE);
        source.unregister(1);
        assert_eq!(
            source.merge(1, EventMask::EXPOSURE),
            Some(EventMask::EXPOSURE)
        );
    }
}
