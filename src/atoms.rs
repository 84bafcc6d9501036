// Copyright 2026 the Xsurf Authors
// SPDX-License-Identifier: Apache-2.0

//! Interned atoms and EWMH wire constants.

x11rb::atom_manager! {
    /// A collection of Atoms we are using.
    pub(crate) Atoms: AtomsCookie {
        // ICCCM
        WM_PROTOCOLS,
        WM_DELETE_WINDOW,
        WM_TAKE_FOCUS,
        WM_CHANGE_STATE,
        WM_CLIENT_LEADER,
        UTF8_STRING,

        // EWMH root window
        _NET_SUPPORTED,
        _NET_SUPPORTING_WM_CHECK,
        _NET_ACTIVE_WINDOW,
        _NET_CLOSE_WINDOW,

        // EWMH per-window
        _NET_WM_NAME,
        _NET_WM_PID,
        _NET_WM_PING,
        _NET_WM_DESKTOP,
        _NET_WM_MOVERESIZE,
        _NET_WM_USER_TIME,
        _NET_FRAME_EXTENTS,
        _NET_WM_FULLSCREEN_MONITORS,

        // _NET_WM_STATE and its property atoms
        _NET_WM_STATE,
        _NET_WM_STATE_MAXIMIZED_VERT,
        _NET_WM_STATE_MAXIMIZED_HORZ,
        _NET_WM_STATE_FULLSCREEN,
        _NET_WM_STATE_HIDDEN,
        _NET_WM_STATE_STICKY,
        _NET_WM_STATE_MODAL,
        _NET_WM_STATE_SKIP_TASKBAR,
        _NET_WM_STATE_SKIP_PAGER,
        _NET_WM_STATE_ABOVE,
        _NET_WM_STATE_BELOW,
        _NET_WM_STATE_DEMANDS_ATTENTION,
        _NET_WM_STATE_FOCUSED,

        // Window types
        _NET_WM_WINDOW_TYPE,
        _NET_WM_WINDOW_TYPE_NORMAL,
        _NET_WM_WINDOW_TYPE_DIALOG,
        _NET_WM_WINDOW_TYPE_MENU,
        _NET_WM_WINDOW_TYPE_TOOLTIP,
        _NET_WM_WINDOW_TYPE_UTILITY,
        _NET_WM_WINDOW_TYPE_SPLASH,
        _NET_WM_WINDOW_TYPE_DROPDOWN_MENU,
        _NET_WM_WINDOW_TYPE_POPUP_MENU,

        // Frame synchronization
        _NET_WM_SYNC_REQUEST,
        _NET_WM_SYNC_REQUEST_COUNTER,
        _NET_WM_FRAME_DRAWN,
        _NET_WM_FRAME_TIMINGS,

        // Non-standard extensions
        _MOTIF_WM_HINTS,
        _GTK_SHOW_WINDOW_MENU,
    }
}

/// `_NET_WM_STATE` client message action codes.
pub(crate) const NET_WM_STATE_REMOVE: u32 = 0;
pub(crate) const NET_WM_STATE_ADD: u32 = 1;

/// Source indication for client messages sent by a normal application.
pub(crate) const SOURCE_INDICATION_APPLICATION: u32 = 1;

/// `_NET_WM_MOVERESIZE` direction codes. The eight edge codes are fixed by
/// the EWMH spec and match [`crate::moveresize::ResizeEdge`] ordering.
pub(crate) const MOVERESIZE_SIZE_TOPLEFT: u32 = 0;
pub(crate) const MOVERESIZE_SIZE_TOP: u32 = 1;
pub(crate) const MOVERESIZE_SIZE_TOPRIGHT: u32 = 2;
pub(crate) const MOVERESIZE_SIZE_RIGHT: u32 = 3;
pub(crate) const MOVERESIZE_SIZE_BOTTOMRIGHT: u32 = 4;
pub(crate) const MOVERESIZE_SIZE_BOTTOM: u32 = 5;
pub(crate) const MOVERESIZE_SIZE_BOTTOMLEFT: u32 = 6;
pub(crate) const MOVERESIZE_SIZE_LEFT: u32 = 7;
pub(crate) const MOVERESIZE_MOVE: u32 = 8;
pub(crate) const MOVERESIZE_CANCEL: u32 = 11;

/// `_NET_WM_FULLSCREEN_MONITORS` sentinel meaning "revert to the default
/// single-monitor behavior". Window managers treat any out-of-range monitor
/// index this way; this is the value mutter historically checked for.
pub(crate) const FULLSCREEN_MONITORS_NONE: u32 = u32::MAX;

/// `WM_CHANGE_STATE` argument: ICCCM IconicState.
pub(crate) const ICCCM_ICONIC_STATE: u32 = 3;

// _MOTIF_WM_HINTS is a 5-element CARD32 property: flags, functions,
// decorations, input_mode, status.
pub(crate) const MWM_HINTS_FUNCTIONS: u32 = 1 << 0;
pub(crate) const MWM_HINTS_DECORATIONS: u32 = 1 << 1;

bitflags::bitflags! {
    /// Motif decoration mask. ALL means "everything", in which case the
    /// other bits subtract rather than add.
    pub struct Decorations: u32 {
        const ALL = 1 << 0;
        const BORDER = 1 << 1;
        const RESIZE_HANDLE = 1 << 2;
        const TITLE = 1 << 3;
        const MENU = 1 << 4;
        const MINIMIZE = 1 << 5;
        const MAXIMIZE = 1 << 6;
    }
}

bitflags::bitflags! {
    /// Motif function mask, same ALL convention as [`Decorations`].
    pub struct Functions: u32 {
        const ALL = 1 << 0;
        const RESIZE = 1 << 1;
        const MOVE = 1 << 2;
        const MINIMIZE = 1 << 3;
        const MAXIMIZE = 1 << 4;
        const CLOSE = 1 << 5;
    }
}

/// On-the-wire form of `_MOTIF_WM_HINTS`.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct MotifWmHints {
    pub flags: u32,
    pub functions: u32,
    pub decorations: u32,
}

impl MotifWmHints {
    pub(crate) fn to_property(self) -> [u32; 5] {
        [self.flags, self.functions, self.decorations, 0, 0]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn motif_hints_serialize_in_property_order() {
        let hints = MotifWmHints {
            flags: MWM_HINTS_DECORATIONS,
            functions: 0,
            decorations: (Decorations::TITLE | Decorations::BORDER).bits(),
        };
        assert_eq!(hints.to_property(), [2, 0, 0b1010, 0, 0]);
    }
}
