// Copyright 2026 the Xsurf Authors
// SPDX-License-Identifier: Apache-2.0

//! X11 window plumbing: toplevel lifecycle, EWMH window-manager state,
//! compositor frame synchronization over XSync counters, and interactive
//! move/resize.
//!
//! The entry point is [`Display`], a `!Send` session object wrapping one
//! X connection. Surfaces are created through [`SurfaceBuilder`]; WM-managed
//! windows come back as [`Toplevel`] handles, which carry the operations only
//! a managed window has. Everything runs on the thread that calls
//! [`Display::run`].
//!
//! Sizes and positions at the public boundary are in display points; the
//! pixel conversion is handled by [`Scale`], derived from `Xft.dpi` (or the
//! `XSURF_DPI` environment variable).

#[macro_use]
mod util;

mod atoms;
mod display;
mod error;
mod events;
mod frame_sync;
mod moveresize;
mod scale;
mod screen;
mod surface;
mod toplevel;

pub use atoms::{Decorations, Functions};
pub use display::Display;
pub use error::Error;
pub use events::{EventFilter, FilterResult};
pub use moveresize::ResizeEdge;
pub use scale::{Scalable, Scale, ScaledArea};
pub use surface::{DeviceSource, SurfaceBuilder, SurfaceHandle, SurfaceHandler, SurfaceKind};
pub use toplevel::{FullscreenMode, GeometryHints, StateFlags, Toplevel, WindowType};

pub use kurbo;
