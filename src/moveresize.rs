// Copyright 2026 the Xsurf Authors
// SPDX-License-Identifier: Apache-2.0

//! Interactive move and resize.
//!
//! When the WM supports `_NET_WM_MOVERESIZE` (and the drag doesn't come from
//! a touch device) the whole interaction is delegated to it. Otherwise we
//! emulate: an invisible InputOnly window takes a pointer grab and we
//! reconfigure the target surface ourselves on every motion.
//!
//! There is at most one drag session per display. The numeric session state
//! lives in [`SessionCore`], which makes no X calls; the controller around it
//! serializes its decisions.

use anyhow::Context;
use x11rb::connection::Connection;
use x11rb::protocol::xproto::{self, ConnectionExt, EventMask};
use x11rb::protocol::Event;

use crate::atoms::{
    MOVERESIZE_CANCEL, MOVERESIZE_MOVE, MOVERESIZE_SIZE_BOTTOM, MOVERESIZE_SIZE_BOTTOMLEFT,
    MOVERESIZE_SIZE_BOTTOMRIGHT, MOVERESIZE_SIZE_LEFT, MOVERESIZE_SIZE_RIGHT,
    MOVERESIZE_SIZE_TOP, MOVERESIZE_SIZE_TOPLEFT, MOVERESIZE_SIZE_TOPRIGHT,
    SOURCE_INDICATION_APPLICATION,
};
use crate::display::Display;
use crate::surface::{DeviceSource, Surface};
use crate::toplevel::{GeometryHints, StateFlags};

/// Dragging a window edge near the top of the screen maximizes.
const MAXIMIZE_EDGE_PX: i32 = 10;
/// Dragging a maximized or tiled window further than this unmaximizes.
const UNMAXIMIZE_DRAG_PX: i32 = 20;

/// Which edge or corner a resize drag pulls.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ResizeEdge {
    NorthWest,
    North,
    NorthEast,
    East,
    SouthEast,
    South,
    SouthWest,
    West,
}

impl ResizeEdge {
    /// The fixed `_NET_WM_MOVERESIZE` direction code.
    pub(crate) fn direction_code(self) -> u32 {
        match self {
            ResizeEdge::NorthWest => MOVERESIZE_SIZE_TOPLEFT,
            ResizeEdge::North => MOVERESIZE_SIZE_TOP,
            ResizeEdge::NorthEast => MOVERESIZE_SIZE_TOPRIGHT,
            ResizeEdge::East => MOVERESIZE_SIZE_RIGHT,
            ResizeEdge::SouthEast => MOVERESIZE_SIZE_BOTTOMRIGHT,
            ResizeEdge::South => MOVERESIZE_SIZE_BOTTOM,
            ResizeEdge::SouthWest => MOVERESIZE_SIZE_BOTTOMLEFT,
            ResizeEdge::West => MOVERESIZE_SIZE_LEFT,
        }
    }

    fn pulls_west(self) -> bool {
        matches!(
            self,
            ResizeEdge::NorthWest | ResizeEdge::West | ResizeEdge::SouthWest
        )
    }

    fn pulls_east(self) -> bool {
        matches!(
            self,
            ResizeEdge::NorthEast | ResizeEdge::East | ResizeEdge::SouthEast
        )
    }

    fn pulls_north(self) -> bool {
        matches!(
            self,
            ResizeEdge::NorthWest | ResizeEdge::North | ResizeEdge::NorthEast
        )
    }

    fn pulls_south(self) -> bool {
        matches!(
            self,
            ResizeEdge::SouthWest | ResizeEdge::South | ResizeEdge::SouthEast
        )
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum Op {
    Move,
    Resize(ResizeEdge),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) struct Motion {
    pub root_x: i32,
    pub root_y: i32,
    pub time: xproto::Timestamp,
}

/// What a processed motion does to the target geometry.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum DragUpdate {
    Move { x: i32, y: i32 },
    Resize { x: i32, y: i32, w: i32, h: i32 },
}

/// Policy decision for a move drag, from the screen-edge heuristics.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum MovePolicy {
    None,
    Maximize,
    Unmaximize,
}

/// An input event as the lookahead sees it.
#[derive(Copy, Clone, Debug)]
pub(crate) enum QueuedInput {
    Motion(xproto::Timestamp),
    ButtonRelease,
    Other,
}

/// The drag state, free of X resources.
#[derive(Clone, Debug)]
pub(crate) struct SessionCore {
    pub surface: xproto::Window,
    pub op: Op,
    pub button: u8,
    /// Root position of the initiating press.
    pub start_root: (i32, i32),
    /// Surface origin in root coordinates when the drag started.
    pub origin: (i32, i32),
    pub orig_size: (i32, i32),
    pub hints: Option<GeometryHints>,
    /// Timestamp of a motion found by lookahead; older motions are skipped
    /// until it arrives.
    pub process_time: xproto::Timestamp,
    /// Newest motion received while a resize was still unacknowledged.
    pub buffered_motion: Option<Motion>,
}

impl SessionCore {
    /// Buffer instead of process while the target has configures in flight.
    /// Only the newest motion is kept; stale intermediate positions are
    /// worthless once the server catches up.
    pub fn accept_motion(&mut self, resize_pending: bool, motion: Motion) -> bool {
        if resize_pending {
            self.buffered_motion = Some(motion);
            false
        } else {
            true
        }
    }

    /// Decide whether a motion at `time` should be processed now, peeking at
    /// the not-yet-dispatched input backlog. When newer motion is already
    /// queued we skip this one and remember the newest timestamp; a button
    /// release stops the scan so the drag still ends exactly where the user
    /// let go.
    pub fn motion_ready<I>(&mut self, time: xproto::Timestamp, backlog: I) -> bool
    where
        I: IntoIterator<Item = QueuedInput>,
    {
        if self.process_time != 0 {
            if time == self.process_time {
                self.process_time = 0;
                true
            } else {
                false
            }
        } else {
            let mut newest = 0;
            for queued in backlog {
                match queued {
                    QueuedInput::Motion(t) => newest = t,
                    QueuedInput::ButtonRelease => break,
                    QueuedInput::Other => {}
                }
            }
            if newest != 0 {
                self.process_time = newest;
                false
            } else {
                true
            }
        }
    }

    /// Geometry for the pointer at the given root position.
    pub fn drag_update(&self, root_x: i32, root_y: i32) -> DragUpdate {
        let dx = root_x - self.start_root.0;
        let dy = root_y - self.start_root.1;
        match self.op {
            Op::Move => DragUpdate::Move {
                x: self.origin.0 + dx,
                y: self.origin.1 + dy,
            },
            Op::Resize(edge) => {
                let (ow, oh) = self.orig_size;
                let mut w = ow;
                let mut h = oh;
                if edge.pulls_east() {
                    w = ow + dx;
                } else if edge.pulls_west() {
                    w = ow - dx;
                }
                if edge.pulls_south() {
                    h = oh + dy;
                } else if edge.pulls_north() {
                    h = oh - dy;
                }
                w = w.max(1);
                h = h.max(1);
                if let Some(hints) = self.hints {
                    let constrained = hints.constrain(w, h);
                    w = constrained.0;
                    h = constrained.1;
                }
                // Keep the opposite edge anchored.
                let x = if edge.pulls_west() {
                    self.origin.0 + (ow - w)
                } else {
                    self.origin.0
                };
                let y = if edge.pulls_north() {
                    self.origin.1 + (oh - h)
                } else {
                    self.origin.1
                };
                DragUpdate::Resize { x, y, w, h }
            }
        }
    }

    /// Screen-edge heuristics for move drags.
    pub fn move_policy(&self, flags: StateFlags, root_x: i32, root_y: i32) -> MovePolicy {
        if self.op != Op::Move {
            return MovePolicy::None;
        }
        if flags.intersects(StateFlags::MAXIMIZED | StateFlags::TILED) {
            let dx = root_x - self.start_root.0;
            let dy = root_y - self.start_root.1;
            if dx.abs() > UNMAXIMIZE_DRAG_PX || dy.abs() > UNMAXIMIZE_DRAG_PX {
                MovePolicy::Unmaximize
            } else {
                MovePolicy::None
            }
        } else if root_y < MAXIMIZE_EDGE_PX {
            MovePolicy::Maximize
        } else {
            MovePolicy::None
        }
    }
}

#[derive(Debug)]
pub(crate) struct Session {
    pub core: SessionCore,
    /// The InputOnly grab window for an emulated drag; `None` means the
    /// session was set up but the window isn't created yet.
    pub emulation_window: Option<xproto::Window>,
}

/// The per-display drag slot.
#[derive(Debug, Default)]
pub(crate) struct MoveResize {
    session: Option<Session>,
    /// Button of an in-flight delegated drag, kept so we can send CANCEL if
    /// the WM never takes over and we see the release ourselves.
    delegated_button: Option<u8>,
}

impl MoveResize {
    pub fn new() -> MoveResize {
        MoveResize::default()
    }

    pub fn active(&self) -> bool {
        self.session.is_some()
    }

    /// Both begin paths check this before touching the server. A delegated
    /// begin while a session is live would ungrab the pointer out from under
    /// it and leave the slot stuck until the surface dies.
    fn may_begin(&self) -> bool {
        if self.session.is_some() {
            tracing::debug!("ignoring drag request while another drag is active");
            false
        } else {
            true
        }
    }

    /// The surface a live session is dragging, if any.
    pub(crate) fn drag_target(&self) -> Option<xproto::Window> {
        self.session.as_ref().map(|session| session.core.surface)
    }

    /// Claim the slot. A drag already in progress wins; the new request is
    /// dropped without touching the existing session.
    pub(crate) fn install(&mut self, session: Session) -> bool {
        if self.session.is_some() {
            tracing::debug!("ignoring drag request while another drag is active");
            false
        } else {
            self.session = Some(session);
            true
        }
    }

    pub(crate) fn begin_delegated(
        &mut self,
        display: &Display,
        surface: &Surface,
        op: Op,
        button: u8,
        root_x: i32,
        root_y: i32,
    ) -> Result<(), anyhow::Error> {
        if !self.may_begin() {
            return Ok(());
        }
        // The WM takes its own grab; ours would fight it.
        display
            .connection()
            .ungrab_pointer(display.timestamp())?
            .ignore_error();
        self.delegated_button = Some(button);
        let direction = match op {
            Op::Move => MOVERESIZE_MOVE,
            Op::Resize(edge) => edge.direction_code(),
        };
        display.send_wm_message(
            surface.id,
            display.atoms()._NET_WM_MOVERESIZE,
            [
                root_x as u32,
                root_y as u32,
                direction,
                u32::from(button),
                SOURCE_INDICATION_APPLICATION,
            ],
        )
    }

    pub(crate) fn begin_emulated(
        &mut self,
        display: &Display,
        surface: &Surface,
        op: Op,
        button: u8,
        root_x: i32,
        root_y: i32,
    ) -> Result<(), anyhow::Error> {
        if !self.may_begin() {
            return Ok(());
        }
        let conn = display.connection();
        let geometry = conn
            .get_geometry(surface.id)?
            .reply()
            .context("drag target geometry")?;
        let origin = conn
            .translate_coordinates(surface.id, display.root(), 0, 0)?
            .reply()
            .context("drag target origin")?;
        let hints = {
            let tl = surface.toplevel_data()?;
            borrow!(tl.state)?.geometry_hints
        };

        let core = SessionCore {
            surface: surface.id,
            op,
            button,
            start_root: (root_x, root_y),
            origin: (i32::from(origin.dst_x), i32::from(origin.dst_y)),
            orig_size: (i32::from(geometry.width), i32::from(geometry.height)),
            hints,
            process_time: 0,
            buffered_motion: None,
        };

        let emulation_window = create_emulation_window(display)?;
        let grab = conn
            .grab_pointer(
                false,
                emulation_window,
                u32::from(EventMask::BUTTON_RELEASE | EventMask::POINTER_MOTION) as u16,
                xproto::GrabMode::ASYNC,
                xproto::GrabMode::ASYNC,
                x11rb::NONE,
                x11rb::NONE,
                display.timestamp(),
            )?
            .reply()
            .context("grab pointer for drag")?;
        if grab.status != xproto::GrabStatus::SUCCESS {
            // Someone else owns the pointer; the drag never happened.
            tracing::debug!("pointer grab failed, aborting emulated drag");
            conn.destroy_window(emulation_window)?.ignore_error();
            return Ok(());
        }

        self.install(Session {
            core,
            emulation_window: Some(emulation_window),
        });
        Ok(())
    }

    /// Runs before regular dispatch. Returns true when the event belonged to
    /// a drag and must not be seen by anything else.
    pub(crate) fn handle_event(&mut self, display: &Display, event: &Event) -> Result<bool, anyhow::Error> {
        if let Some(button) = self.delegated_button {
            if let Event::ButtonRelease(ev) = event {
                if ev.detail == button {
                    // The WM never reacted to the delegated drag; tell it the
                    // interaction is over.
                    self.delegated_button = None;
                    if let Ok(Some(surface)) = display.surface(ev.event) {
                        display.send_wm_message(
                            surface.id,
                            display.atoms()._NET_WM_MOVERESIZE,
                            [
                                ev.root_x as u32,
                                ev.root_y as u32,
                                MOVERESIZE_CANCEL,
                                u32::from(button),
                                SOURCE_INDICATION_APPLICATION,
                            ],
                        )?;
                    }
                }
            }
        }

        if self.session.is_none() {
            return Ok(false);
        }
        match event {
            Event::MotionNotify(ev) => {
                let motion = Motion {
                    root_x: i32::from(ev.root_x),
                    root_y: i32::from(ev.root_y),
                    time: ev.time,
                };
                self.handle_motion(display, motion)?;
                Ok(true)
            }
            Event::ButtonRelease(ev) => {
                let release_button = {
                    let session = match self.session.as_ref() {
                        Some(s) => s,
                        None => return Ok(false),
                    };
                    session.core.button
                };
                if ev.detail == release_button {
                    let motion = Motion {
                        root_x: i32::from(ev.root_x),
                        root_y: i32::from(ev.root_y),
                        time: ev.time,
                    };
                    self.apply_motion(display, motion, true)?;
                    self.finish(display)?;
                }
                Ok(true)
            }
            Event::ButtonPress(_) => Ok(true),
            _ => Ok(false),
        }
    }

    fn handle_motion(&mut self, display: &Display, motion: Motion) -> Result<(), anyhow::Error> {
        let ready = {
            let session = match self.session.as_mut() {
                Some(s) => s,
                None => return Ok(()),
            };
            let resize_pending = display
                .surface(session.core.surface)?
                .map_or(false, |s| s.resize_count.get() > 0);
            if !session.core.accept_motion(resize_pending, motion) {
                return Ok(());
            }
            session
                .core
                .motion_ready(motion.time, display.queued_input())
        };
        if ready {
            self.apply_motion(display, motion, false)?;
        }
        Ok(())
    }

    fn apply_motion(
        &mut self,
        display: &Display,
        motion: Motion,
        releasing: bool,
    ) -> Result<(), anyhow::Error> {
        let (update, policy, target) = {
            let session = match self.session.as_ref() {
                Some(s) => s,
                None => return Ok(()),
            };
            let surface = match display.surface(session.core.surface)? {
                Some(s) => s,
                None => return Ok(()),
            };
            let flags = {
                let tl = surface.toplevel_data()?;
                borrow!(tl.state)?.flags
            };
            (
                session.core.drag_update(motion.root_x, motion.root_y),
                session.core.move_policy(flags, motion.root_x, motion.root_y),
                surface,
            )
        };

        match policy {
            MovePolicy::Maximize if releasing => {
                // Dropped at the top edge: maximize instead of moving there.
                target.set_maximized(true)?;
                return Ok(());
            }
            MovePolicy::Unmaximize => {
                target.set_maximized(false)?;
            }
            _ => {}
        }

        let conn = display.connection();
        match update {
            DragUpdate::Move { x, y } => {
                conn.configure_window(
                    target.id,
                    &xproto::ConfigureWindowAux::new().x(x).y(y),
                )?
                .ignore_error();
            }
            DragUpdate::Resize { x, y, w, h } => {
                target.resize_count.set(target.resize_count.get() + 1);
                conn.configure_window(
                    target.id,
                    &xproto::ConfigureWindowAux::new()
                        .x(x)
                        .y(y)
                        .width(w as u32)
                        .height(h as u32),
                )?
                .ignore_error();
            }
        }
        Ok(())
    }

    /// The target acknowledged all outstanding resizes; replay the motion
    /// that arrived in the meantime, if any.
    pub(crate) fn configure_done(&mut self, display: &Display) -> Result<(), anyhow::Error> {
        let buffered = match self.session.as_mut() {
            Some(session) => session.core.buffered_motion.take(),
            None => return Ok(()),
        };
        if let Some(motion) = buffered {
            self.apply_motion(display, motion, false)?;
        }
        Ok(())
    }

    pub(crate) fn surface_destroyed(&mut self, display: &Display, id: xproto::Window) {
        let ours = self
            .session
            .as_ref()
            .map_or(false, |session| session.core.surface == id);
        if ours {
            log_x11!(self.finish(display));
        }
    }

    /// Tear the session down. Safe to call any number of times; only the
    /// first does anything.
    pub(crate) fn finish(&mut self, display: &Display) -> Result<(), anyhow::Error> {
        let session = match self.session.take() {
            Some(s) => s,
            None => return Ok(()),
        };
        if let Ok(Some(surface)) = display.surface(session.core.surface) {
            // Resizes still unacknowledged when the drag ends must not count
            // against the next session.
            surface.resize_count.set(0);
        }
        let conn = display.connection();
        conn.ungrab_pointer(display.timestamp())?.ignore_error();
        if let Some(window) = session.emulation_window {
            conn.destroy_window(window)?.ignore_error();
        }
        conn.flush()?;
        Ok(())
    }
}

fn create_emulation_window(display: &Display) -> Result<xproto::Window, anyhow::Error> {
    let conn = display.connection();
    let window = conn.generate_id()?;
    // Offscreen InputOnly window; it exists only to own the pointer grab.
    conn.create_window(
        0,
        window,
        display.root(),
        -100,
        -100,
        1,
        1,
        0,
        xproto::WindowClass::INPUT_ONLY,
        x11rb::COPY_FROM_PARENT,
        &xproto::CreateWindowAux::new()
            .override_redirect(1)
            .event_mask(EventMask::BUTTON_RELEASE | EventMask::POINTER_MOTION),
    )?
    .check()
    .context("create drag emulation window")?;
    conn.map_window(window)?.ignore_error();
    Ok(window)
}

impl Surface {
    pub(crate) fn begin_move_drag(
        &self,
        device: DeviceSource,
        button: u8,
        x: i16,
        y: i16,
    ) -> Result<(), anyhow::Error> {
        self.begin_drag(Op::Move, device, button, x, y)
    }

    pub(crate) fn begin_resize_drag(
        &self,
        edge: ResizeEdge,
        device: DeviceSource,
        button: u8,
        x: i16,
        y: i16,
    ) -> Result<(), anyhow::Error> {
        self.begin_drag(Op::Resize(edge), device, button, x, y)
    }

    fn begin_drag(
        &self,
        op: Op,
        device: DeviceSource,
        button: u8,
        x: i16,
        y: i16,
    ) -> Result<(), anyhow::Error> {
        if self.destroyed() || !self.mapped.get() {
            return Ok(());
        }
        let display = &self.display;
        let root_pos = display
            .connection()
            .translate_coordinates(self.id, display.root(), x, y)?
            .reply()
            .context("translate drag start")?;
        let root_x = i32::from(root_pos.dst_x);
        let root_y = i32::from(root_pos.dst_y);

        // Touch sequences confuse WMs that expect a hardware pointer behind
        // _NET_WM_MOVERESIZE, so touch always takes the emulated path.
        let delegate = device != DeviceSource::Touch
            && display.supports_net_wm_hint(display.atoms()._NET_WM_MOVERESIZE);

        let moveresize = display.moveresize();
        let mut controller = borrow_mut!(moveresize)?;
        if delegate {
            controller.begin_delegated(display, self, op, button, root_x, root_y)
        } else {
            controller.begin_emulated(display, self, op, button, root_x, root_y)
        }
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;

    fn core(op: Op) -> SessionCore {
        SessionCore {
            surface: 7,
            op,
            button: 1,
            start_root: (500, 300),
            origin: (100, 80),
            orig_size: (640, 480),
            hints: None,
            process_time: 0,
            buffered_motion: None,
        }
    }

    fn session(op: Op) -> Session {
        Session {
            core: core(op),
            emulation_window: None,
        }
    }

    #[test]
    fn slot_rejects_second_session_untouched() {
        let mut slot = MoveResize::new();
        assert!(slot.install(session(Op::Move)));
        assert!(slot.active());

        let mut second = session(Op::Resize(ResizeEdge::SouthEast));
        second.core.start_root = (9999, 9999);
        assert!(!slot.install(second));
        // The original anchors survive.
        let kept = slot.session.as_ref().unwrap();
        assert_eq!(kept.core.op, Op::Move);
        assert_eq!(kept.core.start_root, (500, 300));
    }

    #[test]
    fn no_drag_may_begin_while_session_active() {
        let mut slot = MoveResize::new();
        assert!(slot.may_begin());
        assert!(slot.install(session(Op::Move)));
        // Both begin paths bail here; the delegated one in particular must
        // never reach its ungrab while the live session holds the pointer.
        assert!(!slot.may_begin());
        assert_eq!(slot.delegated_button, None);
    }

    #[test]
    fn drag_target_names_live_session_surface() {
        let mut slot = MoveResize::new();
        assert_eq!(slot.drag_target(), None);
        slot.install(session(Op::Move));
        assert_eq!(slot.drag_target(), Some(7));
    }

    #[test]
    fn motion_buffered_while_resize_pending_keeps_newest_only() {
        let mut core = core(Op::Resize(ResizeEdge::SouthEast));
        let first = Motion {
            root_x: 510,
            root_y: 310,
            time: 1000,
        };
        let second = Motion {
            root_x: 530,
            root_y: 340,
            time: 1016,
        };
        assert!(!core.accept_motion(true, first));
        assert!(!core.accept_motion(true, second));
        assert_eq!(core.buffered_motion, Some(second));
        // Once acknowledged, motions flow through again.
        assert!(core.accept_motion(false, second));
    }

    #[test]
    fn lookahead_skips_stale_motions() {
        let mut core = core(Op::Move);
        // Two newer motions are queued; the current one is stale.
        let backlog = [
            QueuedInput::Motion(1010),
            QueuedInput::Other,
            QueuedInput::Motion(1020),
        ];
        assert!(!core.motion_ready(1000, backlog));
        assert_eq!(core.process_time, 1020);
        // Intermediate motion is still stale.
        assert!(!core.motion_ready(1010, []));
        // The newest one processes and clears the marker.
        assert!(core.motion_ready(1020, []));
        assert_eq!(core.process_time, 0);
    }

    #[test]
    fn lookahead_stops_at_button_release() {
        let mut core = core(Op::Move);
        let backlog = [
            QueuedInput::ButtonRelease,
            QueuedInput::Motion(2000),
        ];
        // The release ends the drag; motion beyond it belongs to no drag, so
        // the current motion still processes.
        assert!(core.motion_ready(1000, backlog));
    }

    #[test]
    fn empty_backlog_processes_immediately() {
        let mut core = core(Op::Move);
        assert!(core.motion_ready(1000, []));
    }

    #[test]
    fn move_update_tracks_pointer_delta() {
        let core = core(Op::Move);
        assert_eq!(
            core.drag_update(520, 290),
            DragUpdate::Move { x: 120, y: 70 }
        );
    }

    #[test]
    fn resize_southeast_grows_with_pointer() {
        let core = core(Op::Resize(ResizeEdge::SouthEast));
        assert_eq!(
            core.drag_update(550, 350),
            DragUpdate::Resize {
                x: 100,
                y: 80,
                w: 690,
                h: 530
            }
        );
    }

    #[test]
    fn resize_northwest_keeps_opposite_corner_anchored() {
        let core = core(Op::Resize(ResizeEdge::NorthWest));
        let update = core.drag_update(530, 320);
        // Shrinks by 30x20 and the origin moves by the same amount, keeping
        // the bottom-right corner at (740, 560).
        assert_eq!(
            update,
            DragUpdate::Resize {
                x: 130,
                y: 100,
                w: 610,
                h: 460
            }
        );
    }

    #[test]
    fn resize_clamps_to_one_pixel() {
        let core = core(Op::Resize(ResizeEdge::East));
        let update = core.drag_update(-5000, 300);
        assert_eq!(
            update,
            DragUpdate::Resize {
                x: 100,
                y: 80,
                w: 1,
                h: 480
            }
        );
    }

    #[test]
    fn resize_respects_geometry_hints() {
        let mut core = core(Op::Resize(ResizeEdge::SouthEast));
        core.hints = Some(GeometryHints {
            min_size: Some((200, 200)),
            max_size: Some((700, 500)),
            ..Default::default()
        });
        assert_eq!(
            core.drag_update(5000, 5000),
            DragUpdate::Resize {
                x: 100,
                y: 80,
                w: 700,
                h: 500
            }
        );
    }

    #[test]
    fn move_near_top_edge_maximizes() {
        let core = core(Op::Move);
        assert_eq!(
            core.move_policy(StateFlags::empty(), 400, 5),
            MovePolicy::Maximize
        );
        assert_eq!(
            core.move_policy(StateFlags::empty(), 400, 50),
            MovePolicy::None
        );
    }

    #[test]
    fn dragging_maximized_window_far_enough_unmaximizes() {
        let core = core(Op::Move);
        assert_eq!(
            core.move_policy(StateFlags::MAXIMIZED, 530, 300),
            MovePolicy::Unmaximize
        );
        // Within the slop nothing happens, even near the top edge.
        assert_eq!(
            core.move_policy(StateFlags::MAXIMIZED, 510, 305),
            MovePolicy::None
        );
        // Tiled counts like maximized.
        assert_eq!(
            core.move_policy(StateFlags::TILED, 500, 350),
            MovePolicy::Unmaximize
        );
    }

    #[test]
    fn resize_drags_ignore_move_policy() {
        let core = core(Op::Resize(ResizeEdge::North));
        assert_eq!(
            core.move_policy(StateFlags::empty(), 400, 0),
            MovePolicy::None
        );
    }

    #[test]
    fn edges_map_to_fixed_direction_codes() {
        assert_eq!(ResizeEdge::NorthWest.direction_code(), 0);
        assert_eq!(ResizeEdge::North.direction_code(), 1);
        assert_eq!(ResizeEdge::NorthEast.direction_code(), 2);
        assert_eq!(ResizeEdge::East.direction_code(), 3);
        assert_eq!(ResizeEdge::SouthEast.direction_code(), 4);
        assert_eq!(ResizeEdge::South.direction_code(), 5);
        assert_eq!(ResizeEdge::SouthWest.direction_code(), 6);
        assert_eq!(ResizeEdge::West.direction_code(), 7);
    }
}
