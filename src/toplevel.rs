// Copyright 2026 the Xsurf Authors
// SPDX-License-Identifier: Apache-2.0

//! Toplevel window-manager state.
//!
//! A toplevel's WM-visible state is reconciled with the window manager over
//! `_NET_WM_STATE` client messages while mapped, and over plain properties
//! before the first map. [`ToplevelState`] holds the local prediction of that
//! state and decides, as a pure value, what (if anything) goes on the wire;
//! the `Surface` impls below serialize those decisions.

use anyhow::Context;
use x11rb::properties::{WmHints, WmHintsState, WmSizeHints};
use x11rb::protocol::xproto::{self, AtomEnum, ConnectionExt, PropMode};
use x11rb::wrapper::ConnectionExt as _;

use crate::atoms::{
    Atoms, Decorations, Functions, MotifWmHints, FULLSCREEN_MONITORS_NONE, ICCCM_ICONIC_STATE,
    MWM_HINTS_DECORATIONS, MWM_HINTS_FUNCTIONS, NET_WM_STATE_ADD, NET_WM_STATE_REMOVE,
    SOURCE_INDICATION_APPLICATION,
};
use crate::moveresize::ResizeEdge;
use crate::surface::{DeviceSource, Surface, SurfaceHandle};

bitflags::bitflags! {
    /// WM-visible state bits of a toplevel. This is the local prediction;
    /// the WM is free to disagree and its PropertyNotify wins.
    pub struct StateFlags: u32 {
        const MAXIMIZED = 1 << 0;
        const FULLSCREEN = 1 << 1;
        const MINIMIZED = 1 << 2;
        const STICKY = 1 << 3;
        const MODAL = 1 << 4;
        const SKIP_TASKBAR = 1 << 5;
        const SKIP_PAGER = 1 << 6;
        const ABOVE = 1 << 7;
        const BELOW = 1 << 8;
        const DEMANDS_ATTENTION = 1 << 9;
        /// Set only by the window manager; never requested by us.
        const TILED = 1 << 10;
        /// Set only by the window manager.
        const FOCUSED = 1 << 11;
    }
}

/// Which monitors a fullscreen toplevel spans.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum FullscreenMode {
    /// The WM's default: the monitor the window is on.
    #[default]
    CurrentMonitor,
    /// Span every monitor, via `_NET_WM_FULLSCREEN_MONITORS`.
    AllMonitors,
}

/// Abstract window type, mapped to a `_NET_WM_WINDOW_TYPE` atom.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum WindowType {
    #[default]
    Normal,
    Dialog,
    Menu,
    Tooltip,
    Utility,
    Splash,
    DropdownMenu,
    PopupMenu,
}

impl WindowType {
    pub(crate) fn atom(self, atoms: &Atoms) -> xproto::Atom {
        match self {
            WindowType::Normal => atoms._NET_WM_WINDOW_TYPE_NORMAL,
            WindowType::Dialog => atoms._NET_WM_WINDOW_TYPE_DIALOG,
            WindowType::Menu => atoms._NET_WM_WINDOW_TYPE_MENU,
            WindowType::Tooltip => atoms._NET_WM_WINDOW_TYPE_TOOLTIP,
            WindowType::Utility => atoms._NET_WM_WINDOW_TYPE_UTILITY,
            WindowType::Splash => atoms._NET_WM_WINDOW_TYPE_SPLASH,
            WindowType::DropdownMenu => atoms._NET_WM_WINDOW_TYPE_DROPDOWN_MENU,
            WindowType::PopupMenu => atoms._NET_WM_WINDOW_TYPE_POPUP_MENU,
        }
    }
}

/// WM_NORMAL_HINTS, in pixels.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct GeometryHints {
    pub min_size: Option<(i32, i32)>,
    pub max_size: Option<(i32, i32)>,
    pub base_size: Option<(i32, i32)>,
    pub increments: Option<(i32, i32)>,
    /// Allowed width/height ratio range (min, max).
    pub aspect: Option<(f64, f64)>,
    pub gravity: Option<xproto::Gravity>,
}

impl GeometryHints {
    /// Constrain a candidate size the way the WM would, so interactive
    /// resizing never proposes a geometry the hints forbid.
    pub fn constrain(&self, width: i32, height: i32) -> (i32, i32) {
        let mut w = width.max(1);
        let mut h = height.max(1);

        if let Some((min_w, min_h)) = self.min_size {
            w = w.max(min_w);
            h = h.max(min_h);
        }
        if let Some((max_w, max_h)) = self.max_size {
            w = w.min(max_w.max(1));
            h = h.min(max_h.max(1));
        }
        if let Some((inc_w, inc_h)) = self.increments {
            let (base_w, base_h) = self.base_size.or(self.min_size).unwrap_or((0, 0));
            if inc_w > 0 && w > base_w {
                w = base_w + ((w - base_w) / inc_w) * inc_w;
            }
            if inc_h > 0 && h > base_h {
                h = base_h + ((h - base_h) / inc_h) * inc_h;
            }
        }
        if let Some((min_aspect, max_aspect)) = self.aspect {
            let ratio = w as f64 / h as f64;
            if min_aspect > 0.0 && ratio < min_aspect {
                // Too tall; shrink the height.
                h = ((w as f64 / min_aspect).round() as i32).max(1);
            } else if max_aspect > 0.0 && ratio > max_aspect {
                // Too wide; shrink the width.
                w = ((h as f64 * max_aspect).round() as i32).max(1);
            }
        }
        (w.max(1), h.max(1))
    }

    pub(crate) fn to_wm_size_hints(self) -> WmSizeHints {
        let mut hints = WmSizeHints::new();
        hints.min_size = self.min_size;
        hints.max_size = self.max_size;
        hints.base_size = self.base_size;
        hints.size_increment = self.increments;
        if let Some((min, max)) = self.aspect {
            let ratio = |v: f64| x11rb::properties::AspectRatio::new((v * 1000.0) as i32, 1000);
            hints.aspect = Some((ratio(min), ratio(max)));
        }
        hints.win_gravity = self.gravity;
        hints
    }
}

/// What a state change wants done on the wire. Pure so tests can count
/// messages without a server.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum StateChange {
    /// Unmapped: the change is folded into the initial properties at map.
    Deferred,
    /// The WM doesn't support this hint; the local flag changed, nothing is
    /// sent.
    LocalOnly,
    /// Send exactly one `_NET_WM_STATE` client message.
    Send {
        add: bool,
        first: xproto::Atom,
        second: Option<xproto::Atom>,
    },
}

/// Local prediction of a toplevel's WM state plus the cached hints that are
/// written at map time.
#[derive(Clone, Debug, Default)]
pub(crate) struct ToplevelState {
    pub flags: StateFlags,
    pub type_hint: WindowType,
    pub fullscreen_mode: FullscreenMode,
    /// Explicit `[top, bottom, left, right]` monitor indices while
    /// fullscreen, `None` for the WM default.
    pub fullscreen_monitors: Option<[u32; 4]>,
    pub decorations: Option<Decorations>,
    pub functions: Option<Functions>,
    pub geometry_hints: Option<GeometryHints>,
    pub group_leader: Option<xproto::Window>,
    pub desktop: Option<u32>,
    pub urgent: bool,
    pub title: String,
}

impl Default for StateFlags {
    fn default() -> StateFlags {
        StateFlags::empty()
    }
}

impl ToplevelState {
    /// Record a state change and decide what goes on the wire.
    pub fn change_state(
        &mut self,
        mapped: bool,
        supported: bool,
        add: bool,
        flag: StateFlags,
        first: xproto::Atom,
        second: Option<xproto::Atom>,
    ) -> StateChange {
        self.flags.set(flag, add);
        if !mapped {
            StateChange::Deferred
        } else if !supported {
            StateChange::LocalOnly
        } else {
            StateChange::Send { add, first, second }
        }
    }

    /// The `_NET_WM_STATE` atoms to write before the first map. Empty means
    /// the property must be deleted, not written as a zero-length array.
    pub fn initial_state_atoms(&self, atoms: &Atoms) -> Vec<u32> {
        let mut props = Vec::new();
        let push_if = |props: &mut Vec<u32>, flag, atom: xproto::Atom| {
            if self.flags.contains(flag) {
                props.push(atom);
            }
        };
        push_if(&mut props, StateFlags::MODAL, atoms._NET_WM_STATE_MODAL);
        push_if(
            &mut props,
            StateFlags::SKIP_TASKBAR,
            atoms._NET_WM_STATE_SKIP_TASKBAR,
        );
        push_if(
            &mut props,
            StateFlags::SKIP_PAGER,
            atoms._NET_WM_STATE_SKIP_PAGER,
        );
        push_if(&mut props, StateFlags::STICKY, atoms._NET_WM_STATE_STICKY);
        push_if(
            &mut props,
            StateFlags::FULLSCREEN,
            atoms._NET_WM_STATE_FULLSCREEN,
        );
        if self.flags.contains(StateFlags::MAXIMIZED) {
            props.push(atoms._NET_WM_STATE_MAXIMIZED_VERT);
            props.push(atoms._NET_WM_STATE_MAXIMIZED_HORZ);
        }
        push_if(&mut props, StateFlags::ABOVE, atoms._NET_WM_STATE_ABOVE);
        push_if(&mut props, StateFlags::BELOW, atoms._NET_WM_STATE_BELOW);
        push_if(
            &mut props,
            StateFlags::DEMANDS_ATTENTION,
            atoms._NET_WM_STATE_DEMANDS_ATTENTION,
        );
        props
    }

    /// The `_NET_WM_DESKTOP` value to write before the first map, `None`
    /// meaning delete the property.
    pub fn initial_desktop(&self) -> Option<u32> {
        if self.flags.contains(StateFlags::STICKY) {
            Some(0xFFFF_FFFF)
        } else {
            self.desktop
        }
    }

    /// Replace the flag prediction with what the WM published. Returns the
    /// new value if it differs.
    pub fn reconcile(&mut self, wm_flags: StateFlags) -> Option<StateFlags> {
        // MINIMIZED is tracked through WM_STATE/HIDDEN and map state, which
        // the caller folds into wm_flags before calling.
        if wm_flags == self.flags {
            None
        } else {
            self.flags = wm_flags;
            Some(wm_flags)
        }
    }
}

/// `_NET_WM_FULLSCREEN_MONITORS` payload. `None` asks the WM to revert to
/// its default single-monitor behavior via the sentinel indices.
pub(crate) fn fullscreen_monitors_payload(monitors: Option<[u32; 4]>) -> [u32; 5] {
    let m = monitors.unwrap_or([FULLSCREEN_MONITORS_NONE; 4]);
    [m[0], m[1], m[2], m[3], SOURCE_INDICATION_APPLICATION]
}

// Serialization of ToplevelState decisions onto the X connection. These are
// the toplevel-only operations; `SurfaceHandle` has the kind-agnostic core.
impl Surface {
    fn change_wm_state(
        &self,
        add: bool,
        flag: StateFlags,
        first: xproto::Atom,
        second: Option<xproto::Atom>,
    ) -> Result<(), anyhow::Error> {
        if self.destroyed() {
            return Ok(());
        }
        let tl = self.toplevel_data()?;
        let supported = self.display.supports_net_wm_hint(first);
        let action = borrow_mut!(tl.state)?.change_state(
            self.mapped.get(),
            supported,
            add,
            flag,
            first,
            second,
        );
        match action {
            StateChange::Send { add, first, second } => {
                let action = if add {
                    NET_WM_STATE_ADD
                } else {
                    NET_WM_STATE_REMOVE
                };
                self.display.send_wm_message(
                    self.id,
                    self.display.atoms()._NET_WM_STATE,
                    [
                        action,
                        first,
                        second.unwrap_or(0),
                        SOURCE_INDICATION_APPLICATION,
                        0,
                    ],
                )?;
            }
            StateChange::Deferred | StateChange::LocalOnly => {
                // No WM round trip is coming; report the predicted state now.
                let flags = borrow!(tl.state)?.flags;
                self.notify_state_changed(flags);
            }
        }
        Ok(())
    }

    pub(crate) fn set_maximized(&self, maximized: bool) -> Result<(), anyhow::Error> {
        let atoms = self.display.atoms();
        self.change_wm_state(
            maximized,
            StateFlags::MAXIMIZED,
            atoms._NET_WM_STATE_MAXIMIZED_VERT,
            Some(atoms._NET_WM_STATE_MAXIMIZED_HORZ),
        )
    }

    pub(crate) fn set_fullscreen(&self, fullscreen: bool) -> Result<(), anyhow::Error> {
        let atoms = self.display.atoms();
        self.change_wm_state(
            fullscreen,
            StateFlags::FULLSCREEN,
            atoms._NET_WM_STATE_FULLSCREEN,
            None,
        )?;
        if self.destroyed() {
            return Ok(());
        }
        let tl = self.toplevel_data()?;
        let (mode, monitors) = {
            let state = borrow!(tl.state)?;
            (state.fullscreen_mode, state.fullscreen_monitors)
        };
        if fullscreen
            && self.mapped.get()
            && (mode == FullscreenMode::AllMonitors || monitors.is_some())
        {
            self.apply_fullscreen_mode()?;
        }
        if !fullscreen {
            borrow_mut!(tl.state)?.fullscreen_monitors = None;
        }
        Ok(())
    }

    pub(crate) fn fullscreen_on_monitor(&self, monitor: u32) -> Result<(), anyhow::Error> {
        let tl = self.toplevel_data()?;
        borrow_mut!(tl.state)?.fullscreen_monitors = Some([monitor; 4]);
        self.set_fullscreen(true)
    }

    pub(crate) fn set_fullscreen_mode(&self, mode: FullscreenMode) -> Result<(), anyhow::Error> {
        let tl = self.toplevel_data()?;
        let (old, fullscreen) = {
            let mut state = borrow_mut!(tl.state)?;
            let old = state.fullscreen_mode;
            state.fullscreen_mode = mode;
            (old, state.flags.contains(StateFlags::FULLSCREEN))
        };
        if old != mode && fullscreen && self.mapped.get() {
            self.apply_fullscreen_mode()?;
        }
        Ok(())
    }

    /// Send the current fullscreen-monitors choice to the WM.
    ///
    /// Reverting uses the sentinel indices rather than deleting the property;
    /// that is what existing WMs are known to handle, spec or no spec.
    fn apply_fullscreen_mode(&self) -> Result<(), anyhow::Error> {
        let tl = self.toplevel_data()?;
        let monitors = {
            let state = borrow!(tl.state)?;
            match state.fullscreen_mode {
                FullscreenMode::AllMonitors => Some(
                    state
                        .fullscreen_monitors
                        .or_else(|| self.display.edge_monitors())
                        .unwrap_or([0; 4]),
                ),
                FullscreenMode::CurrentMonitor => state.fullscreen_monitors,
            }
        };
        self.display.send_wm_message(
            self.id,
            self.display.atoms()._NET_WM_FULLSCREEN_MONITORS,
            fullscreen_monitors_payload(monitors),
        )
    }

    pub(crate) fn minimize(&self) -> Result<(), anyhow::Error> {
        if self.destroyed() {
            return Ok(());
        }
        let tl = self.toplevel_data()?;
        borrow_mut!(tl.state)?.flags.insert(StateFlags::MINIMIZED);
        if self.mapped.get() {
            // XIconifyWindow is a WM_CHANGE_STATE client message to the root.
            self.display.send_wm_message(
                self.id,
                self.display.atoms().WM_CHANGE_STATE,
                [ICCCM_ICONIC_STATE, 0, 0, 0, 0],
            )?;
        } else {
            let flags = borrow!(tl.state)?.flags;
            self.notify_state_changed(flags);
        }
        Ok(())
    }

    pub(crate) fn unminimize(&self) -> Result<(), anyhow::Error> {
        if self.destroyed() {
            return Ok(());
        }
        let tl = self.toplevel_data()?;
        borrow_mut!(tl.state)?.flags.remove(StateFlags::MINIMIZED);
        if self.mapped.get() {
            // Deiconify is just a map request.
            self.display.connection().map_window(self.id)?;
        }
        Ok(())
    }

    pub(crate) fn set_sticky(&self, sticky: bool) -> Result<(), anyhow::Error> {
        let atoms = self.display.atoms();
        self.change_wm_state(sticky, StateFlags::STICKY, atoms._NET_WM_STATE_STICKY, None)?;
        if self.destroyed() || !self.mapped.get() {
            return Ok(());
        }
        if sticky {
            self.move_to_desktop(0xFFFF_FFFF)?;
        }
        Ok(())
    }

    pub(crate) fn set_keep_above(&self, above: bool) -> Result<(), anyhow::Error> {
        let atoms = self.display.atoms();
        if above {
            self.change_wm_state(false, StateFlags::BELOW, atoms._NET_WM_STATE_BELOW, None)?;
        }
        self.change_wm_state(above, StateFlags::ABOVE, atoms._NET_WM_STATE_ABOVE, None)
    }

    pub(crate) fn set_keep_below(&self, below: bool) -> Result<(), anyhow::Error> {
        let atoms = self.display.atoms();
        if below {
            self.change_wm_state(false, StateFlags::ABOVE, atoms._NET_WM_STATE_ABOVE, None)?;
        }
        self.change_wm_state(below, StateFlags::BELOW, atoms._NET_WM_STATE_BELOW, None)
    }

    pub(crate) fn set_modal_hint(&self, modal: bool) -> Result<(), anyhow::Error> {
        let atoms = self.display.atoms();
        self.change_wm_state(modal, StateFlags::MODAL, atoms._NET_WM_STATE_MODAL, None)
    }

    pub(crate) fn set_skip_taskbar_hint(&self, skip: bool) -> Result<(), anyhow::Error> {
        let atoms = self.display.atoms();
        self.change_wm_state(
            skip,
            StateFlags::SKIP_TASKBAR,
            atoms._NET_WM_STATE_SKIP_TASKBAR,
            None,
        )
    }

    pub(crate) fn set_skip_pager_hint(&self, skip: bool) -> Result<(), anyhow::Error> {
        let atoms = self.display.atoms();
        self.change_wm_state(
            skip,
            StateFlags::SKIP_PAGER,
            atoms._NET_WM_STATE_SKIP_PAGER,
            None,
        )
    }

    pub(crate) fn set_demands_attention(&self, urgent: bool) -> Result<(), anyhow::Error> {
        let atoms = self.display.atoms();
        self.change_wm_state(
            urgent,
            StateFlags::DEMANDS_ATTENTION,
            atoms._NET_WM_STATE_DEMANDS_ATTENTION,
            None,
        )
    }

    pub(crate) fn set_urgency_hint(&self, urgent: bool) -> Result<(), anyhow::Error> {
        if self.destroyed() {
            return Ok(());
        }
        let tl = self.toplevel_data()?;
        borrow_mut!(tl.state)?.urgent = urgent;
        if self.mapped.get() {
            self.update_wm_hints()?;
        }
        Ok(())
    }

    pub(crate) fn move_to_desktop(&self, desktop: u32) -> Result<(), anyhow::Error> {
        if self.destroyed() {
            return Ok(());
        }
        let tl = self.toplevel_data()?;
        borrow_mut!(tl.state)?.desktop = Some(desktop);
        if self.mapped.get() {
            self.display.send_wm_message(
                self.id,
                self.display.atoms()._NET_WM_DESKTOP,
                [desktop, SOURCE_INDICATION_APPLICATION, 0, 0, 0],
            )?;
        }
        Ok(())
    }

    pub(crate) fn set_group_leader(&self, leader: xproto::Window) -> Result<(), anyhow::Error> {
        if self.destroyed() {
            return Ok(());
        }
        let tl = self.toplevel_data()?;
        borrow_mut!(tl.state)?.group_leader = Some(leader);
        self.update_wm_hints()
    }

    /// WM_HINTS carries input focus model, initial iconic state, window
    /// group, and the urgency flag, so they are all rewritten together.
    pub(crate) fn update_wm_hints(&self) -> Result<(), anyhow::Error> {
        let tl = self.toplevel_data()?;
        let state = borrow!(tl.state)?;
        let mut hints = WmHints::new();
        hints.input = Some(true);
        hints.initial_state = Some(if state.flags.contains(StateFlags::MINIMIZED) {
            WmHintsState::Iconic
        } else {
            WmHintsState::Normal
        });
        hints.window_group = state.group_leader;
        hints.urgent = state.urgent;
        hints
            .set(self.display.connection().as_ref(), self.id)?
            .ignore_error();
        Ok(())
    }

    pub(crate) fn set_decorations(&self, decorations: Decorations) -> Result<(), anyhow::Error> {
        if self.destroyed() {
            return Ok(());
        }
        let tl = self.toplevel_data()?;
        let functions = {
            let mut state = borrow_mut!(tl.state)?;
            state.decorations = Some(decorations);
            state.functions
        };
        self.write_motif_hints(Some(decorations), functions)
    }

    pub(crate) fn set_functions(&self, functions: Functions) -> Result<(), anyhow::Error> {
        if self.destroyed() {
            return Ok(());
        }
        let tl = self.toplevel_data()?;
        let decorations = {
            let mut state = borrow_mut!(tl.state)?;
            state.functions = Some(functions);
            state.decorations
        };
        self.write_motif_hints(decorations, Some(functions))
    }

    fn write_motif_hints(
        &self,
        decorations: Option<Decorations>,
        functions: Option<Functions>,
    ) -> Result<(), anyhow::Error> {
        let mut hints = MotifWmHints::default();
        if let Some(d) = decorations {
            hints.flags |= MWM_HINTS_DECORATIONS;
            hints.decorations = d.bits();
        }
        if let Some(f) = functions {
            hints.flags |= MWM_HINTS_FUNCTIONS;
            hints.functions = f.bits();
        }
        let atoms = self.display.atoms();
        self.display
            .connection()
            .change_property32(
                PropMode::REPLACE,
                self.id,
                atoms._MOTIF_WM_HINTS,
                atoms._MOTIF_WM_HINTS,
                &hints.to_property(),
            )?
            .ignore_error();
        Ok(())
    }

    pub(crate) fn set_geometry_hints(&self, hints: GeometryHints) -> Result<(), anyhow::Error> {
        if self.destroyed() {
            return Ok(());
        }
        let tl = self.toplevel_data()?;
        borrow_mut!(tl.state)?.geometry_hints = Some(hints);
        hints
            .to_wm_size_hints()
            .set_normal_hints(self.display.connection().as_ref(), self.id)
            .context("set WM_NORMAL_HINTS")?
            .ignore_error();
        Ok(())
    }

    pub(crate) fn set_type_hint(&self, type_hint: WindowType) -> Result<(), anyhow::Error> {
        if self.destroyed() {
            return Ok(());
        }
        let tl = self.toplevel_data()?;
        borrow_mut!(tl.state)?.type_hint = type_hint;
        let atoms = self.display.atoms();
        self.display
            .connection()
            .change_property32(
                PropMode::REPLACE,
                self.id,
                atoms._NET_WM_WINDOW_TYPE,
                AtomEnum::ATOM,
                &[type_hint.atom(atoms)],
            )?
            .ignore_error();
        Ok(())
    }

    pub(crate) fn set_title(&self, title: &str) -> Result<(), anyhow::Error> {
        if self.destroyed() {
            return Ok(());
        }
        let tl = self.toplevel_data()?;
        borrow_mut!(tl.state)?.title = title.to_string();
        let atoms = self.display.atoms();
        let conn = self.display.connection();
        conn.change_property8(
            PropMode::REPLACE,
            self.id,
            AtomEnum::WM_NAME,
            AtomEnum::STRING,
            title.as_bytes(),
        )?
        .ignore_error();
        conn.change_property8(
            PropMode::REPLACE,
            self.id,
            atoms._NET_WM_NAME,
            atoms.UTF8_STRING,
            title.as_bytes(),
        )?
        .ignore_error();
        Ok(())
    }

    pub(crate) fn set_user_time(&self, time: xproto::Timestamp) -> Result<(), anyhow::Error> {
        if self.destroyed() {
            return Ok(());
        }
        let atoms = self.display.atoms();
        self.display
            .connection()
            .change_property32(
                PropMode::REPLACE,
                self.id,
                atoms._NET_WM_USER_TIME,
                AtomEnum::CARDINAL,
                &[time],
            )?
            .ignore_error();
        Ok(())
    }

    /// Ask the WM for keyboard focus, raising as a fallback when there is no
    /// EWMH-compliant WM to ask.
    pub(crate) fn focus(&self) -> Result<(), anyhow::Error> {
        if self.destroyed() {
            return Ok(());
        }
        let atoms = self.display.atoms();
        let conn = self.display.connection();
        let timestamp = self.display.timestamp();
        if self.display.supports_net_wm_hint(atoms._NET_ACTIVE_WINDOW) {
            self.display.send_wm_message(
                self.id,
                atoms._NET_ACTIVE_WINDOW,
                [SOURCE_INDICATION_APPLICATION, timestamp, 0, 0, 0],
            )?;
        } else {
            conn.configure_window(
                self.id,
                &xproto::ConfigureWindowAux::new().stack_mode(xproto::StackMode::ABOVE),
            )?
            .ignore_error();
            conn.set_input_focus(xproto::InputFocus::POINTER_ROOT, self.id, timestamp)?
                .ignore_error();
        }
        Ok(())
    }

    pub(crate) fn show_window_menu(&self, x: i16, y: i16) -> Result<(), anyhow::Error> {
        if self.destroyed() || !self.mapped.get() {
            return Ok(());
        }
        let atoms = self.display.atoms();
        if !self.display.supports_net_wm_hint(atoms._GTK_SHOW_WINDOW_MENU) {
            return Ok(());
        }
        let conn = self.display.connection();
        let root = self.display.root();
        let translated = conn
            .translate_coordinates(self.id, root, x, y)?
            .reply()
            .context("translate menu coordinates")?;
        // The WM owns the menu from here; drop our implicit grab first.
        conn.ungrab_pointer(x11rb::CURRENT_TIME)?.ignore_error();
        self.display.send_wm_message(
            self.id,
            atoms._GTK_SHOW_WINDOW_MENU,
            [
                0,
                translated.dst_x as u32,
                translated.dst_y as u32,
                0,
                0,
            ],
        )
    }

    /// Write the WM-facing properties that must be in place before the first
    /// map: WM_HINTS, the initial `_NET_WM_STATE` array, and
    /// `_NET_WM_DESKTOP`. Empty state means the property is deleted; a
    /// zero-length array would still be "present" to the WM.
    pub(crate) fn apply_initial_hints(&self) -> Result<(), anyhow::Error> {
        let tl = self.toplevel_data()?;
        let atoms = self.display.atoms();
        let conn = self.display.connection();

        self.update_wm_hints()?;

        let state = borrow!(tl.state)?;
        let props = state.initial_state_atoms(atoms);
        if props.is_empty() {
            conn.delete_property(self.id, atoms._NET_WM_STATE)?
                .ignore_error();
        } else {
            conn.change_property32(
                PropMode::REPLACE,
                self.id,
                atoms._NET_WM_STATE,
                AtomEnum::ATOM,
                &props,
            )?
            .ignore_error();
        }

        match state.initial_desktop() {
            Some(desktop) => {
                conn.change_property32(
                    PropMode::REPLACE,
                    self.id,
                    atoms._NET_WM_DESKTOP,
                    AtomEnum::CARDINAL,
                    &[desktop],
                )?
                .ignore_error();
            }
            None => {
                conn.delete_property(self.id, atoms._NET_WM_DESKTOP)?
                    .ignore_error();
            }
        }
        Ok(())
    }

    /// Re-read `_NET_WM_STATE` after the WM changed it and reconcile the
    /// local prediction.
    pub(crate) fn refresh_wm_state(&self) -> Result<(), anyhow::Error> {
        if self.destroyed() {
            return Ok(());
        }
        let tl = self.toplevel_data()?;
        let atoms = self.display.atoms();
        let reply = self
            .display
            .connection()
            .get_property(
                false,
                self.id,
                atoms._NET_WM_STATE,
                AtomEnum::ATOM,
                0,
                1024,
            )?
            .reply()
            .context("read _NET_WM_STATE")?;

        let mut wm_flags = StateFlags::empty();
        // TILED has no standard atom; leave whatever the WM told us through
        // _GTK_EDGE_CONSTRAINTS alone if it ever gets wired up.
        if let Some(values) = reply.value32() {
            let mut vert = false;
            let mut horz = false;
            for atom in values {
                if atom == atoms._NET_WM_STATE_MAXIMIZED_VERT {
                    vert = true;
                } else if atom == atoms._NET_WM_STATE_MAXIMIZED_HORZ {
                    horz = true;
                } else if atom == atoms._NET_WM_STATE_FULLSCREEN {
                    wm_flags.insert(StateFlags::FULLSCREEN);
                } else if atom == atoms._NET_WM_STATE_HIDDEN {
                    wm_flags.insert(StateFlags::MINIMIZED);
                } else if atom == atoms._NET_WM_STATE_STICKY {
                    wm_flags.insert(StateFlags::STICKY);
                } else if atom == atoms._NET_WM_STATE_MODAL {
                    wm_flags.insert(StateFlags::MODAL);
                } else if atom == atoms._NET_WM_STATE_SKIP_TASKBAR {
                    wm_flags.insert(StateFlags::SKIP_TASKBAR);
                } else if atom == atoms._NET_WM_STATE_SKIP_PAGER {
                    wm_flags.insert(StateFlags::SKIP_PAGER);
                } else if atom == atoms._NET_WM_STATE_ABOVE {
                    wm_flags.insert(StateFlags::ABOVE);
                } else if atom == atoms._NET_WM_STATE_BELOW {
                    wm_flags.insert(StateFlags::BELOW);
                } else if atom == atoms._NET_WM_STATE_DEMANDS_ATTENTION {
                    wm_flags.insert(StateFlags::DEMANDS_ATTENTION);
                } else if atom == atoms._NET_WM_STATE_FOCUSED {
                    wm_flags.insert(StateFlags::FOCUSED);
                }
            }
            if vert && horz {
                wm_flags.insert(StateFlags::MAXIMIZED);
            }
        }

        let changed = borrow_mut!(tl.state)?.reconcile(wm_flags);
        if let Some(flags) = changed {
            self.notify_state_changed(flags);
        }
        Ok(())
    }
}

/// Handle to a toplevel surface.
///
/// All common surface operations are reachable through `Deref` to
/// [`SurfaceHandle`]; the methods here only exist for toplevels.
#[derive(Clone, Default)]
pub struct Toplevel {
    pub(crate) handle: SurfaceHandle,
}

impl std::ops::Deref for Toplevel {
    type Target = SurfaceHandle;

    fn deref(&self) -> &SurfaceHandle {
        &self.handle
    }
}

impl Toplevel {
    fn with_surface(&self, f: impl FnOnce(&Surface) -> Result<(), anyhow::Error>) {
        if let Some(surface) = self.handle.surface.upgrade() {
            log_x11!(f(&surface));
        }
    }

    pub fn set_title(&self, title: &str) {
        self.with_surface(|s| s.set_title(title));
    }

    pub fn maximize(&self) {
        self.with_surface(|s| s.set_maximized(true));
    }

    pub fn unmaximize(&self) {
        self.with_surface(|s| s.set_maximized(false));
    }

    pub fn minimize(&self) {
        self.with_surface(|s| s.minimize());
    }

    pub fn unminimize(&self) {
        self.with_surface(|s| s.unminimize());
    }

    pub fn fullscreen(&self) {
        self.with_surface(|s| s.set_fullscreen(true));
    }

    pub fn unfullscreen(&self) {
        self.with_surface(|s| s.set_fullscreen(false));
    }

    /// Fullscreen across a single, explicit monitor.
    pub fn fullscreen_on_monitor(&self, monitor: u32) {
        self.with_surface(|s| s.fullscreen_on_monitor(monitor));
    }

    pub fn set_fullscreen_mode(&self, mode: FullscreenMode) {
        self.with_surface(|s| s.set_fullscreen_mode(mode));
    }

    pub fn stick(&self) {
        self.with_surface(|s| s.set_sticky(true));
    }

    pub fn unstick(&self) {
        self.with_surface(|s| s.set_sticky(false));
    }

    pub fn set_keep_above(&self, above: bool) {
        self.with_surface(|s| s.set_keep_above(above));
    }

    pub fn set_keep_below(&self, below: bool) {
        self.with_surface(|s| s.set_keep_below(below));
    }

    pub fn set_modal_hint(&self, modal: bool) {
        self.with_surface(|s| s.set_modal_hint(modal));
    }

    pub fn set_skip_taskbar_hint(&self, skip: bool) {
        self.with_surface(|s| s.set_skip_taskbar_hint(skip));
    }

    pub fn set_skip_pager_hint(&self, skip: bool) {
        self.with_surface(|s| s.set_skip_pager_hint(skip));
    }

    pub fn set_urgency_hint(&self, urgent: bool) {
        self.with_surface(|s| s.set_urgency_hint(urgent));
    }

    pub fn set_demands_attention(&self, urgent: bool) {
        self.with_surface(|s| s.set_demands_attention(urgent));
    }

    pub fn move_to_desktop(&self, desktop: u32) {
        self.with_surface(|s| s.move_to_desktop(desktop));
    }

    pub fn set_group_leader(&self, leader: xproto::Window) {
        self.with_surface(|s| s.set_group_leader(leader));
    }

    pub fn set_decorations(&self, decorations: Decorations) {
        self.with_surface(|s| s.set_decorations(decorations));
    }

    pub fn set_functions(&self, functions: Functions) {
        self.with_surface(|s| s.set_functions(functions));
    }

    pub fn set_geometry_hints(&self, hints: GeometryHints) {
        self.with_surface(|s| s.set_geometry_hints(hints));
    }

    pub fn set_type_hint(&self, type_hint: WindowType) {
        self.with_surface(|s| s.set_type_hint(type_hint));
    }

    pub fn set_user_time(&self, time: xproto::Timestamp) {
        self.with_surface(|s| s.set_user_time(time));
    }

    pub fn focus(&self) {
        self.with_surface(|s| s.focus());
    }

    /// Pop up the WM's window menu at surface-relative pixel coordinates.
    pub fn show_window_menu(&self, x: i16, y: i16) {
        self.with_surface(|s| s.show_window_menu(x, y));
    }

    /// Start an interactive move from a button press at the given
    /// surface-relative pixel position.
    pub fn begin_move_drag(&self, device: DeviceSource, button: u8, x: i16, y: i16) {
        self.with_surface(|s| s.begin_move_drag(device, button, x, y));
    }

    /// Start an interactive resize of `edge`.
    pub fn begin_resize_drag(
        &self,
        edge: ResizeEdge,
        device: DeviceSource,
        button: u8,
        x: i16,
        y: i16,
    ) {
        self.with_surface(|s| s.begin_resize_drag(edge, device, button, x, y));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_atoms() -> Atoms {
        // Distinct dummy ids; the decision layer only compares them.
        Atoms {
            WM_PROTOCOLS: 1,
            WM_DELETE_WINDOW: 2,
            WM_TAKE_FOCUS: 3,
            WM_CHANGE_STATE: 4,
            WM_CLIENT_LEADER: 5,
            UTF8_STRING: 6,
            _NET_SUPPORTED: 7,
            _NET_SUPPORTING_WM_CHECK: 8,
            _NET_ACTIVE_WINDOW: 9,
            _NET_CLOSE_WINDOW: 10,
            _NET_WM_NAME: 11,
            _NET_WM_PID: 12,
            _NET_WM_PING: 13,
            _NET_WM_DESKTOP: 14,
            _NET_WM_MOVERESIZE: 15,
            _NET_WM_USER_TIME: 16,
            _NET_FRAME_EXTENTS: 17,
            _NET_WM_FULLSCREEN_MONITORS: 18,
            _NET_WM_STATE: 19,
            _NET_WM_STATE_MAXIMIZED_VERT: 20,
            _NET_WM_STATE_MAXIMIZED_HORZ: 21,
            _NET_WM_STATE_FULLSCREEN: 22,
            _NET_WM_STATE_HIDDEN: 23,
            _NET_WM_STATE_STICKY: 24,
            _NET_WM_STATE_MODAL: 25,
            _NET_WM_STATE_SKIP_TASKBAR: 26,
            _NET_WM_STATE_SKIP_PAGER: 27,
            _NET_WM_STATE_ABOVE: 28,
            _NET_WM_STATE_BELOW: 29,
            _NET_WM_STATE_DEMANDS_ATTENTION: 30,
            _NET_WM_STATE_FOCUSED: 31,
            _NET_WM_WINDOW_TYPE: 32,
            _NET_WM_WINDOW_TYPE_NORMAL: 33,
            _NET_WM_WINDOW_TYPE_DIALOG: 34,
            _NET_WM_WINDOW_TYPE_MENU: 35,
            _NET_WM_WINDOW_TYPE_TOOLTIP: 36,
            _NET_WM_WINDOW_TYPE_UTILITY: 37,
            _NET_WM_WINDOW_TYPE_SPLASH: 38,
            _NET_WM_WINDOW_TYPE_DROPDOWN_MENU: 39,
            _NET_WM_WINDOW_TYPE_POPUP_MENU: 40,
            _NET_WM_SYNC_REQUEST: 41,
            _NET_WM_SYNC_REQUEST_COUNTER: 42,
            _NET_WM_FRAME_DRAWN: 43,
            _NET_WM_FRAME_TIMINGS: 44,
            _MOTIF_WM_HINTS: 45,
            _GTK_SHOW_WINDOW_MENU: 46,
        }
    }

    #[test]
    fn premap_changes_defer_and_stay_idempotent() {
        let atoms = test_atoms();
        let mut state = ToplevelState::default();
        for _ in 0..3 {
            let action = state.change_state(
                false,
                true,
                true,
                StateFlags::FULLSCREEN,
                atoms._NET_WM_STATE_FULLSCREEN,
                None,
            );
            assert_eq!(action, StateChange::Deferred);
        }
        assert!(state.flags.contains(StateFlags::FULLSCREEN));
        // The initial property carries the atom exactly once.
        let props = state.initial_state_atoms(&atoms);
        assert_eq!(
            props
                .iter()
                .filter(|&&a| a == atoms._NET_WM_STATE_FULLSCREEN)
                .count(),
            1
        );

        let action = state.change_state(
            false,
            true,
            false,
            StateFlags::FULLSCREEN,
            atoms._NET_WM_STATE_FULLSCREEN,
            None,
        );
        assert_eq!(action, StateChange::Deferred);
        assert!(state.initial_state_atoms(&atoms).is_empty());
    }

    #[test]
    fn mapped_change_sends_one_message() {
        let atoms = test_atoms();
        let mut state = ToplevelState::default();
        let action = state.change_state(
            true,
            true,
            true,
            StateFlags::MAXIMIZED,
            atoms._NET_WM_STATE_MAXIMIZED_VERT,
            Some(atoms._NET_WM_STATE_MAXIMIZED_HORZ),
        );
        assert_eq!(
            action,
            StateChange::Send {
                add: true,
                first: atoms._NET_WM_STATE_MAXIMIZED_VERT,
                second: Some(atoms._NET_WM_STATE_MAXIMIZED_HORZ),
            }
        );
        assert!(state.flags.contains(StateFlags::MAXIMIZED));
    }

    #[test]
    fn unsupported_hint_is_local_only() {
        let atoms = test_atoms();
        let mut state = ToplevelState::default();
        let action = state.change_state(
            true,
            false,
            true,
            StateFlags::ABOVE,
            atoms._NET_WM_STATE_ABOVE,
            None,
        );
        assert_eq!(action, StateChange::LocalOnly);
        assert!(state.flags.contains(StateFlags::ABOVE));
    }

    #[test]
    fn empty_initial_state_means_delete() {
        let atoms = test_atoms();
        let state = ToplevelState::default();
        assert!(state.initial_state_atoms(&atoms).is_empty());
        assert_eq!(state.initial_desktop(), None);
    }

    #[test]
    fn sticky_sets_desktop_sentinel() {
        let atoms = test_atoms();
        let mut state = ToplevelState::default();
        state.change_state(
            false,
            true,
            true,
            StateFlags::STICKY,
            atoms._NET_WM_STATE_STICKY,
            None,
        );
        assert_eq!(state.initial_desktop(), Some(0xFFFF_FFFF));
    }

    #[test]
    fn maximized_initial_state_carries_both_atoms() {
        let atoms = test_atoms();
        let mut state = ToplevelState::default();
        state.change_state(
            false,
            true,
            true,
            StateFlags::MAXIMIZED,
            atoms._NET_WM_STATE_MAXIMIZED_VERT,
            Some(atoms._NET_WM_STATE_MAXIMIZED_HORZ),
        );
        let props = state.initial_state_atoms(&atoms);
        assert!(props.contains(&atoms._NET_WM_STATE_MAXIMIZED_VERT));
        assert!(props.contains(&atoms._NET_WM_STATE_MAXIMIZED_HORZ));
    }

    #[test]
    fn monitors_payload_reverts_with_sentinels() {
        assert_eq!(
            fullscreen_monitors_payload(None),
            [
                FULLSCREEN_MONITORS_NONE,
                FULLSCREEN_MONITORS_NONE,
                FULLSCREEN_MONITORS_NONE,
                FULLSCREEN_MONITORS_NONE,
                SOURCE_INDICATION_APPLICATION,
            ]
        );
        assert_eq!(
            fullscreen_monitors_payload(Some([0, 1, 2, 3])),
            [0, 1, 2, 3, SOURCE_INDICATION_APPLICATION]
        );
    }

    #[test]
    fn reconcile_reports_only_real_changes() {
        let mut state = ToplevelState::default();
        state.flags = StateFlags::MAXIMIZED;
        assert_eq!(state.reconcile(StateFlags::MAXIMIZED), None);
        let new = StateFlags::MAXIMIZED | StateFlags::FOCUSED;
        assert_eq!(state.reconcile(new), Some(new));
        assert_eq!(state.flags, new);
    }

    #[test]
    fn constrain_applies_bounds_then_increments() {
        let hints = GeometryHints {
            min_size: Some((100, 50)),
            max_size: Some((800, 600)),
            increments: Some((10, 10)),
            base_size: Some((100, 50)),
            ..Default::default()
        };
        assert_eq!(hints.constrain(57, 23), (100, 50));
        assert_eq!(hints.constrain(1000, 1000), (800, 600));
        assert_eq!(hints.constrain(123, 77), (120, 70));
    }

    #[test]
    fn constrain_enforces_aspect_range() {
        let hints = GeometryHints {
            aspect: Some((1.0, 2.0)),
            ..Default::default()
        };
        // Too tall: height shrinks to the minimum ratio.
        assert_eq!(hints.constrain(100, 400), (100, 100));
        // Too wide: width shrinks to the maximum ratio.
        assert_eq!(hints.constrain(400, 100), (200, 100));
        // In range: untouched.
        assert_eq!(hints.constrain(150, 100), (150, 100));
    }

    #[test]
    fn constrain_never_returns_zero() {
        let hints = GeometryHints::default();
        assert_eq!(hints.constrain(0, -5), (1, 1));
    }
}
