// Copyright 2026 the Xsurf Authors
// SPDX-License-Identifier: Apache-2.0

//! Window-manager capabilities and monitor layout.

use std::collections::HashSet;
use std::rc::Rc;

use anyhow::{anyhow, Context, Error};
use x11rb::protocol::randr::{ConnectionExt as _, ModeFlag};
use x11rb::protocol::xproto::{self, AtomEnum, ConnectionExt, Window};
use x11rb::xcb_ffi::XCBConnection;

use crate::atoms::Atoms;

/// Cached `_NET_SUPPORTED` contents of the running WM.
///
/// The cache is filled lazily on the first query and dropped whenever the WM
/// (or its advertised feature set) changes. No WM, or an unvalidated check
/// window, means no hint is supported.
#[derive(Debug, Default)]
pub(crate) struct WmCaps {
    fetched: bool,
    check_window: Option<Window>,
    supported: HashSet<xproto::Atom>,
}

impl WmCaps {
    pub fn supports(&mut self, conn: &XCBConnection, atoms: &Atoms, root: Window, atom: xproto::Atom) -> bool {
        if !self.fetched {
            *self = fetch_wm_caps(conn, atoms, root);
        }
        self.supported.contains(&atom)
    }

    /// The WM changed, restarted, or republished its feature list.
    pub fn invalidate(&mut self) {
        *self = WmCaps::default();
    }

    pub fn is_check_window(&self, window: Window) -> bool {
        self.check_window == Some(window)
    }
}

/// Read and validate the EWMH capability advertisement.
///
/// `_NET_SUPPORTING_WM_CHECK` on the root names a check window, which must
/// carry the same property pointing at itself; only then is `_NET_SUPPORTED`
/// trusted. A half-dead WM that fails validation yields an empty set.
fn fetch_wm_caps(conn: &XCBConnection, atoms: &Atoms, root: Window) -> WmCaps {
    let mut caps = WmCaps {
        fetched: true,
        check_window: None,
        supported: HashSet::new(),
    };
    let try_fetch = || -> Result<(Window, HashSet<xproto::Atom>), Error> {
        let reply = conn
            .get_property(
                false,
                root,
                atoms._NET_SUPPORTING_WM_CHECK,
                AtomEnum::WINDOW,
                0,
                1,
            )?
            .reply()
            .context("read _NET_SUPPORTING_WM_CHECK")?;
        let candidate = reply
            .value32()
            .and_then(|mut it| it.next())
            .ok_or_else(|| anyhow!("no _NET_SUPPORTING_WM_CHECK on root"))?;

        let check = conn
            .get_property(
                false,
                candidate,
                atoms._NET_SUPPORTING_WM_CHECK,
                AtomEnum::WINDOW,
                0,
                1,
            )?
            .reply()
            .context("validate WM check window")?;
        let confirmed = check.value32().and_then(|mut it| it.next());
        if confirmed != Some(candidate) {
            return Err(anyhow!("WM check window failed validation"));
        }

        let supported = conn
            .get_property(false, root, atoms._NET_SUPPORTED, AtomEnum::ATOM, 0, 4096)?
            .reply()
            .context("read _NET_SUPPORTED")?;
        let set = supported
            .value32()
            .map(|it| it.collect())
            .unwrap_or_default();
        Ok((candidate, set))
    };
    match try_fetch() {
        Ok((check_window, supported)) => {
            caps.check_window = Some(check_window);
            caps.supported = supported;
        }
        Err(e) => {
            tracing::debug!("no usable EWMH WM: {}", e);
        }
    }
    caps
}

/// `[top, bottom, left, right]`-most monitor indices for
/// `_NET_WM_FULLSCREEN_MONITORS`, from pixel rectangles `(x, y, w, h)`.
pub(crate) fn edge_monitor_indices(rects: &[(i32, i32, i32, i32)]) -> Option<[u32; 4]> {
    let first = rects.first()?;
    let mut top = (0u32, first.1);
    let mut bottom = (0u32, first.1 + first.3);
    let mut left = (0u32, first.0);
    let mut right = (0u32, first.0 + first.2);
    for (i, &(x, y, w, h)) in rects.iter().enumerate().skip(1) {
        let i = i as u32;
        if y < top.1 {
            top = (i, y);
        }
        if y + h > bottom.1 {
            bottom = (i, y + h);
        }
        if x < left.1 {
            left = (i, x);
        }
        if x + w > right.1 {
            right = (i, x + w);
        }
    }
    Some([top.0, bottom.0, left.0, right.0])
}

pub(crate) fn edge_monitors(conn: &Rc<XCBConnection>, root: Window) -> Option<[u32; 4]> {
    let reply = match conn.randr_get_monitors(root, true) {
        Ok(cookie) => match cookie.reply() {
            Ok(reply) => reply,
            Err(e) => {
                tracing::error!("failed to list monitors: {}", e);
                return None;
            }
        },
        Err(e) => {
            tracing::error!("failed to list monitors: {}", e);
            return None;
        }
    };
    let rects: Vec<_> = reply
        .monitors
        .iter()
        .map(|m| {
            (
                i32::from(m.x),
                i32::from(m.y),
                i32::from(m.width),
                i32::from(m.height),
            )
        })
        .collect();
    edge_monitor_indices(&rects)
}

// See: https://github.com/rtbo/rust-xcb/blob/master/examples/randr_screen_modes.rs
pub(crate) fn refresh_rate(conn: &Rc<XCBConnection>, window_id: Window) -> Option<f64> {
    let try_refresh_rate = || -> Result<f64, Error> {
        let reply = conn.randr_get_screen_resources(window_id)?.reply()?;

        // Assuming the first mode is the one we want to use. This is probably
        // wrong on some setups.
        reply
            .modes
            .first()
            .ok_or_else(|| anyhow!("didn't get any modes"))
            .and_then(|mode_info| {
                let flags = mode_info.mode_flags;
                let vtotal = {
                    let mut val = mode_info.vtotal;
                    if (flags & u32::from(ModeFlag::DOUBLE_SCAN)) != 0 {
                        val *= 2;
                    }
                    if (flags & u32::from(ModeFlag::INTERLACE)) != 0 {
                        val /= 2;
                    }
                    val
                };

                if vtotal != 0 && mode_info.htotal != 0 {
                    Ok((mode_info.dot_clock as f64) / (vtotal as f64 * mode_info.htotal as f64))
                } else {
                    Err(anyhow!("got nonsensical mode values"))
                }
            })
    };

    match try_refresh_rate() {
        Err(e) => {
            tracing::error!("failed to find refresh rate: {}", e);
            None
        }
        Ok(r) => Some(r),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edge_monitors_of_side_by_side_pair() {
        // Two 1920x1080 monitors, second to the right and 100px lower.
        let rects = [(0, 0, 1920, 1080), (1920, 100, 1920, 1080)];
        // Topmost is 0, bottommost is 1, leftmost 0, rightmost 1.
        assert_eq!(edge_monitor_indices(&rects), Some([0, 1, 0, 1]));
    }

    #[test]
    fn edge_monitors_single() {
        assert_eq!(edge_monitor_indices(&[(0, 0, 800, 600)]), Some([0, 0, 0, 0]));
    }

    #[test]
    fn edge_monitors_empty() {
        assert_eq!(edge_monitor_indices(&[]), None);
    }

    #[test]
    fn fresh_caps_support_nothing() {
        let caps = WmCaps::default();
        assert!(!caps.is_check_window(42));
        assert!(caps.supported.is_empty());
    }
}
