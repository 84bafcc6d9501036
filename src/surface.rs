// Copyright 2026 the Xsurf Authors
// SPDX-License-Identifier: Apache-2.0

//! The surface core: one X window per surface, of whatever kind.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Error};
use kurbo::{Point, Size};
use x11rb::connection::Connection;
use x11rb::properties::WmSizeHints;
use x11rb::protocol::sync::{self, ConnectionExt as _};
use x11rb::protocol::xproto::{
    self, AtomEnum, ColormapAlloc, ConnectionExt, CreateWindowAux, EventMask, PropMode,
    WindowClass,
};
use x11rb::wrapper::ConnectionExt as _;

use crate::display::Display;
use crate::frame_sync::{CounterKind, CounterWrite, FrameSync, SyncCounters};
use crate::scale::{Scalable, Scale, ScaledArea};
use crate::toplevel::{StateFlags, Toplevel, ToplevelState, WindowType};

/// A frame that waited longer than this between damage and the tick was
/// deliberately delayed, which the sync counter reports to the compositor.
const DELAYED_FRAME: Duration = Duration::from_millis(17);

/// What kind of X window backs a surface.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SurfaceKind {
    /// A WM-managed window. The only kind with WM state, frame sync, and
    /// interactive move/resize; those operations live on [`Toplevel`].
    Toplevel,
    /// A child window inside another surface.
    Child,
    /// An override-redirect window the WM never manages (menus, tooltips).
    Temporary,
    /// A window some other client created; we track it but never destroy it.
    Foreign,
}

/// Where a drag gesture came from. Touch drags always take the emulated
/// path; WMs expect a hardware pointer behind `_NET_WM_MOVERESIZE`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DeviceSource {
    Mouse,
    Touch,
}

/// Callbacks a surface owner implements. Every method has an empty default;
/// implement what you need.
#[allow(unused_variables)]
pub trait SurfaceHandler {
    /// The surface exists and has a handle.
    fn connect(&mut self, handle: &SurfaceHandle) {}

    /// The size changed, in display points.
    fn size(&mut self, size: Size) {}

    /// The scale factor changed.
    fn scale(&mut self, scale: Scale) {}

    /// Paint hook, called once per frame tick between the sync counter
    /// begin and end. Report actual drawing through
    /// [`SurfaceHandle::notify_damage`].
    fn frame(&mut self) {}

    /// The WM-visible state changed (locally predicted or WM-confirmed).
    fn state_changed(&mut self, flags: StateFlags) {}

    /// The user asked the window to close. Nothing happens unless you call
    /// [`SurfaceHandle::close`].
    fn request_close(&mut self) {}

    /// The underlying window is gone.
    fn destroy(&mut self) {}

    fn button_down(&mut self, button: u8, pos: Point) {}

    fn button_up(&mut self, button: u8, pos: Point) {}

    fn pointer_move(&mut self, pos: Point) {}
}

/// State that only exists for [`SurfaceKind::Toplevel`].
pub(crate) struct ToplevelData {
    pub state: RefCell<ToplevelState>,
    pub frame_sync: RefCell<FrameSync>,
}

pub(crate) struct Surface {
    pub(crate) id: xproto::Window,
    pub(crate) display: Display,
    kind: SurfaceKind,
    handler: RefCell<Box<dyn SurfaceHandler>>,
    area: Cell<ScaledArea>,
    scale: Cell<Scale>,
    /// Set at the start of teardown; every entry point checks it. X11
    /// delivers events for a window even after it has been destroyed, so
    /// this flag is the only thing standing between them and use-after-free
    /// style bugs at the protocol level.
    destroyed: Cell<bool>,
    pub(crate) mapped: Cell<bool>,
    /// Damage was reported; the next frame tick paints.
    needs_frame: Cell<bool>,
    /// When the damage arrived, for the delayed-frame heuristic.
    damage_time: Cell<Option<Instant>>,
    /// Frame clock freeze counter; ticks are skipped while nonzero.
    freeze_count: Cell<u32>,
    /// Interactive resizes sent but not yet confirmed by ConfigureNotify.
    pub(crate) resize_count: Cell<u32>,
    toplevel: Option<ToplevelData>,
}

impl Surface {
    pub(crate) fn destroyed(&self) -> bool {
        self.destroyed.get()
    }

    pub(crate) fn kind(&self) -> SurfaceKind {
        self.kind
    }

    pub(crate) fn toplevel_data(&self) -> Result<&ToplevelData, Error> {
        self.toplevel
            .as_ref()
            .ok_or_else(|| anyhow!("surface {} is not a toplevel", self.id))
    }

    fn with_handler<T, F: FnOnce(&mut dyn SurfaceHandler) -> T>(&self, f: F) -> Option<T> {
        match self.handler.try_borrow_mut() {
            Ok(mut handler) => Some(f(&mut **handler)),
            Err(_) => {
                tracing::error!("failed to borrow handler for surface {}", self.id);
                None
            }
        }
    }

    pub(crate) fn notify_state_changed(&self, flags: StateFlags) {
        self.with_handler(|h| h.state_changed(flags));
    }

    // Teardown converges here from both directions: client-initiated
    // `close()` destroys the window and the later DestroyNotify is a no-op,
    // while a server-side destroy arrives as DestroyNotify first.

    pub(crate) fn destroy(&self) {
        if self.destroyed() {
            return;
        }
        self.destroyed.set(true);
        self.release_resources();
        if self.kind == SurfaceKind::Foreign {
            // No DestroyNotify is coming for a window we don't own; drop it
            // from the registry directly.
            self.display.forget_surface(self.id);
        } else {
            log_x11!(self.display.connection().destroy_window(self.id));
        }
    }

    pub(crate) fn handle_destroy_notify(&self) {
        self.destroyed.set(true);
        self.mapped.set(false);
        self.release_resources();
        self.with_handler(|h| h.destroy());
    }

    /// Free the XIDs owned by this surface other than the window itself.
    fn release_resources(&self) {
        if let Some(tl) = &self.toplevel {
            if let Ok(fs) = tl.frame_sync.try_borrow() {
                if let Some(counters) = fs.counters() {
                    let conn = self.display.connection();
                    log_x11!(conn.sync_destroy_counter(counters.basic));
                    log_x11!(conn.sync_destroy_counter(counters.extended));
                }
            }
        }
    }

    pub(crate) fn show(&self) -> Result<(), Error> {
        if self.destroyed() {
            return Ok(());
        }
        if self.toplevel.is_some() && !self.mapped.get() {
            // The WM reads these at map time; they must be current first.
            self.apply_initial_hints()?;
        }
        self.display.connection().map_window(self.id)?.ignore_error();
        Ok(())
    }

    pub(crate) fn hide(&self) -> Result<(), Error> {
        if self.destroyed() {
            return Ok(());
        }
        let conn = self.display.connection();
        if self.toplevel.is_some() {
            // ICCCM withdrawal: the WM only forgets a toplevel when the
            // unmap comes with a synthetic UnmapNotify on the root.
            let event = xproto::UnmapNotifyEvent {
                response_type: xproto::UNMAP_NOTIFY_EVENT,
                sequence: 0,
                event: self.display.root(),
                window: self.id,
                from_configure: false,
            };
            conn.send_event(
                false,
                self.display.root(),
                EventMask::SUBSTRUCTURE_NOTIFY | EventMask::SUBSTRUCTURE_REDIRECT,
                event,
            )?
            .ignore_error();
        }
        conn.unmap_window(self.id)?.ignore_error();
        Ok(())
    }

    pub(crate) fn invalidate(&self) {
        if self.destroyed() {
            return;
        }
        self.needs_frame.set(true);
        if self.damage_time.get().is_none() {
            self.damage_time.set(Some(Instant::now()));
        }
    }

    pub(crate) fn freeze(&self) {
        self.freeze_count.set(self.freeze_count.get() + 1);
    }

    pub(crate) fn thaw(&self) {
        let count = self.freeze_count.get();
        if count > 0 {
            self.freeze_count.set(count - 1);
        } else {
            tracing::warn!("unbalanced thaw on surface {}", self.id);
        }
    }

    pub(crate) fn frame_tick_due(&self) -> bool {
        !self.destroyed() && self.mapped.get() && self.freeze_count.get() == 0 && self.needs_frame.get()
    }

    /// One frame: adopt any staged sync value, run the paint hook, publish
    /// the counters, and freeze until the compositor acks if it said it
    /// would.
    pub(crate) fn frame_tick(&self) {
        if !self.frame_tick_due() {
            return;
        }
        self.needs_frame.set(false);
        let slept = self
            .damage_time
            .take()
            .map_or(false, |t| t.elapsed() > DELAYED_FRAME);

        let tl = match &self.toplevel {
            Some(tl) => tl,
            None => {
                self.with_handler(|h| h.frame());
                return;
            }
        };

        let begin = match tl.frame_sync.try_borrow_mut() {
            Ok(mut fs) => fs.begin_frame(false),
            Err(_) => {
                tracing::error!("frame sync busy on surface {}", self.id);
                None
            }
        };
        if let Some(write) = begin {
            self.apply_counter_write(write);
        }

        self.with_handler(|h| h.frame());

        let ack_supported = self
            .display
            .supports_net_wm_hint(self.display.atoms()._NET_WM_FRAME_DRAWN);
        let end = match tl.frame_sync.try_borrow_mut() {
            Ok(mut fs) => fs.end_frame(slept, ack_supported),
            Err(_) => return,
        };
        for write in &end.writes {
            self.apply_counter_write(*write);
        }
        if !end.complete {
            self.freeze();
        }
    }

    /// The paint hook (or any render layer) reports that pixels actually
    /// changed this frame.
    pub(crate) fn notify_damage(&self) {
        if let Some(tl) = &self.toplevel {
            let write = match tl.frame_sync.try_borrow_mut() {
                Ok(mut fs) => fs.notify_damage(),
                Err(_) => None,
            };
            if let Some(write) = write {
                self.apply_counter_write(write);
            }
        }
    }

    fn apply_counter_write(&self, write: CounterWrite) {
        let tl = match &self.toplevel {
            Some(tl) => tl,
            None => return,
        };
        let counters = match tl.frame_sync.try_borrow().ok().and_then(|fs| fs.counters()) {
            Some(counters) => counters,
            None => return,
        };
        let counter = match write.kind {
            CounterKind::Basic => counters.basic,
            CounterKind::Extended => counters.extended,
        };
        let value = sync::Int64 {
            hi: (write.value >> 32) as i32,
            lo: write.value as u32,
        };
        log_x11!(self.display.connection().sync_set_counter(counter, value));
    }

    /// Create the counter pair and advertise it. Published basic-first;
    /// that order is what tells the WM which counter is which.
    fn ensure_sync_counters(&self) -> Result<(), Error> {
        if !self.display.sync_supported() {
            return Ok(());
        }
        let tl = self.toplevel_data()?;
        if borrow!(tl.frame_sync)?.enabled() {
            return Ok(());
        }
        let conn = self.display.connection();
        let zero = sync::Int64 { hi: 0, lo: 0 };
        let basic = conn.generate_id()?;
        conn.sync_create_counter(basic, zero)?.ignore_error();
        let extended = conn.generate_id()?;
        conn.sync_create_counter(extended, zero)?.ignore_error();
        conn.change_property32(
            PropMode::REPLACE,
            self.id,
            self.display.atoms()._NET_WM_SYNC_REQUEST_COUNTER,
            AtomEnum::CARDINAL,
            &[basic, extended],
        )?
        .ignore_error();
        borrow_mut!(tl.frame_sync)?.enable(SyncCounters { basic, extended });
        Ok(())
    }

    // Event handling, called from the display's dispatch.

    pub(crate) fn handle_expose(&self, _ev: &xproto::ExposeEvent) {
        self.invalidate();
    }

    pub(crate) fn handle_client_message(&self, ev: &xproto::ClientMessageEvent) {
        if self.destroyed() {
            return;
        }
        let atoms = self.display.atoms();
        let data = ev.data.as_data32();
        if ev.type_ == atoms.WM_PROTOCOLS && ev.format == 32 {
            let protocol = data[0];
            if protocol == atoms.WM_DELETE_WINDOW {
                self.with_handler(|h| h.request_close());
            } else if protocol == atoms._NET_WM_PING {
                // Pong: same message, window swapped for the root.
                let mut reply = *ev;
                reply.window = self.display.root();
                log_x11!(self
                    .display
                    .connection()
                    .send_event(
                        false,
                        self.display.root(),
                        EventMask::SUBSTRUCTURE_NOTIFY | EventMask::SUBSTRUCTURE_REDIRECT,
                        reply,
                    )
                    .map(|cookie| cookie.ignore_error()));
            } else if protocol == atoms._NET_WM_SYNC_REQUEST {
                if let Some(tl) = &self.toplevel {
                    if let Ok(mut fs) = tl.frame_sync.try_borrow_mut() {
                        fs.handle_sync_request(data[2], data[3], data[4] != 0);
                    }
                }
            }
        } else if ev.type_ == atoms._NET_WM_FRAME_DRAWN {
            if let Some(tl) = &self.toplevel {
                let serial = (data[0] as i64) | ((data[1] as i64) << 32);
                let thawed = match tl.frame_sync.try_borrow_mut() {
                    Ok(mut fs) => fs.handle_frame_drawn(serial),
                    Err(_) => false,
                };
                if thawed {
                    self.thaw();
                }
            }
        }
    }

    /// Returns true when this configure acknowledged the last outstanding
    /// interactive resize.
    pub(crate) fn handle_configure_notify(
        &self,
        ev: &xproto::ConfigureNotifyEvent,
    ) -> Result<bool, Error> {
        if self.destroyed() {
            return Ok(false);
        }
        if let Some(tl) = &self.toplevel {
            borrow_mut!(tl.frame_sync)?.configure_received();
        }

        let dragging = {
            let moveresize = self.display.moveresize();
            borrow!(moveresize)?.drag_target() == Some(self.id)
        };
        let (outstanding, drag_ack) = resize_ack(dragging, self.resize_count.get());
        self.resize_count.set(outstanding);

        let size_px = Size::new(f64::from(ev.width), f64::from(ev.height));
        if self.area.get().size_px() != size_px {
            let new_area = ScaledArea::from_px(size_px, self.scale.get());
            self.area.set(new_area);
            let size_dp = new_area.size_dp();
            self.with_handler(|h| h.size(size_dp));
            self.invalidate();
        }
        Ok(drag_ack)
    }

    pub(crate) fn handle_map_notify(&self) {
        self.mapped.set(true);
        self.invalidate();
    }

    pub(crate) fn handle_unmap_notify(&self) {
        self.mapped.set(false);
        if let Some(tl) = &self.toplevel {
            let thawed = match tl.frame_sync.try_borrow_mut() {
                Ok(mut fs) => fs.handle_unmap(),
                Err(_) => false,
            };
            if thawed {
                // The compositor will never ack an unmapped window.
                self.thaw();
            }
        }
    }

    pub(crate) fn handle_button_press(&self, ev: &xproto::ButtonPressEvent) {
        let pos = self.event_point(ev.event_x, ev.event_y);
        self.with_handler(|h| h.button_down(ev.detail, pos));
    }

    pub(crate) fn handle_button_release(&self, ev: &xproto::ButtonReleaseEvent) {
        let pos = self.event_point(ev.event_x, ev.event_y);
        self.with_handler(|h| h.button_up(ev.detail, pos));
    }

    pub(crate) fn handle_motion_notify(&self, ev: &xproto::MotionNotifyEvent) {
        let pos = self.event_point(ev.event_x, ev.event_y);
        self.with_handler(|h| h.pointer_move(pos));
    }

    fn event_point(&self, x: i16, y: i16) -> Point {
        Point::new(f64::from(x), f64::from(y)).to_dp(self.scale.get())
    }

    // Geometry, in display points at the public boundary.

    pub(crate) fn size(&self) -> Size {
        self.area.get().size_dp()
    }

    pub(crate) fn scale(&self) -> Scale {
        self.scale.get()
    }

    pub(crate) fn set_position(&self, position: Point) -> Result<(), Error> {
        if self.destroyed() {
            return Ok(());
        }
        let px = position.to_px(self.scale.get());
        self.display
            .connection()
            .configure_window(
                self.id,
                &xproto::ConfigureWindowAux::new()
                    .x(px.x as i32)
                    .y(px.y as i32),
            )?
            .ignore_error();
        Ok(())
    }

    pub(crate) fn get_position(&self) -> Result<Point, Error> {
        if self.destroyed() {
            return Ok(Point::ZERO);
        }
        let reply = self
            .display
            .connection()
            .translate_coordinates(self.id, self.display.root(), 0, 0)?
            .reply()
            .context("translate window origin")?;
        Ok(
            Point::new(f64::from(reply.dst_x), f64::from(reply.dst_y))
                .to_dp(self.scale.get()),
        )
    }

    pub(crate) fn set_size(&self, size: Size) -> Result<(), Error> {
        if self.destroyed() {
            return Ok(());
        }
        let px = clamped_size_px(size, self.scale.get());
        self.display
            .connection()
            .configure_window(
                self.id,
                &xproto::ConfigureWindowAux::new()
                    .width(px.width as u32)
                    .height(px.height as u32),
            )?
            .ignore_error();
        Ok(())
    }

    fn restack(&self, mode: xproto::StackMode) -> Result<(), Error> {
        if self.destroyed() {
            return Ok(());
        }
        self.display
            .connection()
            .configure_window(
                self.id,
                &xproto::ConfigureWindowAux::new().stack_mode(mode),
            )?
            .ignore_error();
        Ok(())
    }
}

/// ConfigureNotify accounting for interactive resizes. The WM configures
/// windows on its own; only configures arriving while a drag targets this
/// surface may drain the outstanding-resize count.
fn resize_ack(dragging: bool, outstanding: u32) -> (u32, bool) {
    if dragging && outstanding > 0 {
        (outstanding - 1, outstanding == 1)
    } else {
        (outstanding, false)
    }
}

/// X wants sizes in whole pixels and dies on zero.
fn clamped_size_px(size: Size, scale: Scale) -> Size {
    let px = ScaledArea::from_dp(size, scale).size_px();
    Size::new(px.width.max(1.0), px.height.max(1.0))
}

fn size_hints(resizable: bool, size: Size, min_size: Option<Size>) -> WmSizeHints {
    let mut hints = WmSizeHints::new();
    if resizable {
        if let Some(min) = min_size {
            hints.min_size = Some((min.width as i32, min.height as i32));
        }
    } else {
        hints.min_size = Some((size.width as i32, size.height as i32));
        hints.max_size = Some((size.width as i32, size.height as i32));
    }
    hints
}

/// Builder for every surface kind.
pub struct SurfaceBuilder {
    display: Display,
    title: String,
    size: Size,
    min_size: Option<Size>,
    position: Option<Point>,
    resizable: bool,
    transparent: bool,
    type_hint: WindowType,
    initial_state: StateFlags,
    handler: Option<Box<dyn SurfaceHandler>>,
}

impl SurfaceBuilder {
    pub fn new(display: &Display) -> SurfaceBuilder {
        SurfaceBuilder {
            display: display.clone(),
            title: String::new(),
            size: Size::new(500.0, 400.0),
            min_size: None,
            position: None,
            resizable: true,
            transparent: false,
            type_hint: WindowType::Normal,
            initial_state: StateFlags::empty(),
            handler: None,
        }
    }

    pub fn handler(mut self, handler: Box<dyn SurfaceHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Logical size in display points.
    pub fn size(mut self, size: Size) -> Self {
        self.size = size;
        self
    }

    pub fn min_size(mut self, size: Size) -> Self {
        self.min_size = Some(size);
        self
    }

    pub fn position(mut self, position: Point) -> Self {
        self.position = Some(position);
        self
    }

    pub fn resizable(mut self, resizable: bool) -> Self {
        self.resizable = resizable;
        self
    }

    /// Ask for an ARGB visual. Honored only when a compositor owns the
    /// screen's `_NET_WM_CM_Sn` selection; there is nobody to blend with
    /// otherwise.
    pub fn transparent(mut self, transparent: bool) -> Self {
        self.transparent = transparent;
        self
    }

    pub fn window_type(mut self, type_hint: WindowType) -> Self {
        self.type_hint = type_hint;
        self
    }

    /// WM state applied before the first map (maximized, fullscreen, ...).
    pub fn initial_state(mut self, state: StateFlags) -> Self {
        self.initial_state = state;
        self
    }

    pub fn build_toplevel(self) -> Result<Toplevel, crate::Error> {
        let surface = self
            .build_inner(SurfaceKind::Toplevel, None)
            .map_err(crate::Error::from)?;
        Ok(Toplevel {
            handle: SurfaceHandle {
                id: surface.id,
                surface: Rc::downgrade(&surface),
            },
        })
    }

    /// An override-redirect surface (menu, tooltip). The WM never sees it.
    pub fn build_temporary(self) -> Result<SurfaceHandle, crate::Error> {
        let surface = self
            .build_inner(SurfaceKind::Temporary, None)
            .map_err(crate::Error::from)?;
        Ok(SurfaceHandle {
            id: surface.id,
            surface: Rc::downgrade(&surface),
        })
    }

    pub fn build_child(self, parent: &SurfaceHandle) -> Result<SurfaceHandle, crate::Error> {
        let parent_id = parent.id;
        let parent_alive = parent
            .surface
            .upgrade()
            .map_or(false, |surface| !surface.destroyed());
        if !parent_alive {
            return Err(crate::Error::SurfaceDestroyed);
        }
        let surface = self
            .build_inner(SurfaceKind::Child, Some(parent_id))
            .map_err(crate::Error::from)?;
        Ok(SurfaceHandle {
            id: surface.id,
            surface: Rc::downgrade(&surface),
        })
    }

    fn build_inner(
        self,
        kind: SurfaceKind,
        parent: Option<xproto::Window>,
    ) -> Result<Rc<Surface>, Error> {
        let display = self.display.clone();
        let conn = display.connection().clone();

        let env_dpi = std::env::var("XSURF_DPI").ok().map(|x| x.parse::<f64>());
        let scale = match env_dpi.or_else(|| display.rdb.get_value("Xft.dpi", "").transpose()) {
            Some(Ok(dpi)) => {
                let scale = dpi / 96.;
                Scale::new(scale, scale)
            }
            None => Scale::default(),
            Some(Err(err)) => {
                let default = Scale::default();
                tracing::warn!("Unable to parse dpi: {:?}, defaulting to {:?}", err, default);
                default
            }
        };

        let size_px = clamped_size_px(self.size, scale);
        let id = conn.generate_id()?;
        let parent_window = parent.unwrap_or_else(|| display.root());

        let (depth, visual, colormap) = if self.transparent {
            match display.argb_visual() {
                Some((depth, visual)) => {
                    let colormap = conn.generate_id()?;
                    conn.create_colormap(ColormapAlloc::NONE, colormap, display.root(), visual)?
                        .ignore_error();
                    (depth, visual, Some(colormap))
                }
                None => (0, x11rb::COPY_FROM_PARENT, None),
            }
        } else {
            (0, x11rb::COPY_FROM_PARENT, None)
        };

        let event_mask = EventMask::EXPOSURE
            | EventMask::STRUCTURE_NOTIFY
            | EventMask::PROPERTY_CHANGE
            | EventMask::BUTTON_PRESS
            | EventMask::BUTTON_RELEASE
            | EventMask::POINTER_MOTION
            | EventMask::FOCUS_CHANGE;
        let mut aux = CreateWindowAux::new()
            .event_mask(event_mask)
            .background_pixel(x11rb::NONE);
        if kind == SurfaceKind::Temporary {
            aux = aux.override_redirect(1);
        }
        if let Some(colormap) = colormap {
            aux = aux.colormap(colormap).border_pixel(0);
        }

        let (x, y) = match self.position {
            Some(pos) => {
                let px = pos.to_px(scale);
                (px.x as i16, px.y as i16)
            }
            None => (0, 0),
        };

        conn.create_window(
            depth,
            id,
            parent_window,
            x,
            y,
            size_px.width as u16,
            size_px.height as u16,
            0,
            WindowClass::INPUT_OUTPUT,
            visual,
            &aux,
        )?
        .check()
        .context("create window")?;

        if let Ok(mut source) = display.event_source().try_borrow_mut() {
            // create_window already selected the mask; this records it so
            // later registrations merge instead of clobbering.
            source.register(conn.as_ref(), id, event_mask)?;
        }

        let mut state = ToplevelState::default();
        state.flags = self.initial_state;
        state.type_hint = self.type_hint;
        state.title = self.title.clone();

        let surface = Rc::new(Surface {
            id,
            display: display.clone(),
            kind,
            handler: RefCell::new(self.handler.unwrap_or_else(|| Box::new(NoopHandler))),
            area: Cell::new(ScaledArea::from_px(size_px, scale)),
            scale: Cell::new(scale),
            destroyed: Cell::new(false),
            mapped: Cell::new(false),
            needs_frame: Cell::new(false),
            damage_time: Cell::new(None),
            freeze_count: Cell::new(0),
            resize_count: Cell::new(0),
            toplevel: (kind == SurfaceKind::Toplevel).then(|| ToplevelData {
                state: RefCell::new(state),
                frame_sync: RefCell::new(FrameSync::new()),
            }),
        });

        if kind == SurfaceKind::Toplevel {
            let atoms = display.atoms();
            conn.change_property32(
                PropMode::REPLACE,
                id,
                atoms.WM_PROTOCOLS,
                AtomEnum::ATOM,
                &[
                    atoms.WM_DELETE_WINDOW,
                    atoms._NET_WM_PING,
                    atoms._NET_WM_SYNC_REQUEST,
                ],
            )?
            .ignore_error();
            conn.change_property32(
                PropMode::REPLACE,
                id,
                atoms._NET_WM_PID,
                AtomEnum::CARDINAL,
                &[std::process::id()],
            )?
            .ignore_error();
            let class = instance_class();
            conn.change_property8(
                PropMode::REPLACE,
                id,
                AtomEnum::WM_CLASS,
                AtomEnum::STRING,
                class.as_bytes(),
            )?
            .ignore_error();
            surface.set_title(&self.title)?;
            surface.set_type_hint(self.type_hint)?;
            size_hints(self.resizable, size_px, self.min_size.map(|s| s.to_px(scale)))
                .set_normal_hints(conn.as_ref(), id)
                .context("set WM_NORMAL_HINTS")?
                .ignore_error();
            surface.ensure_sync_counters()?;
        }

        display.add_surface(id, Rc::clone(&surface))?;

        let handle = SurfaceHandle {
            id,
            surface: Rc::downgrade(&surface),
        };
        surface.with_handler(|h| h.connect(&handle));

        Ok(surface)
    }
}

/// `WM_CLASS`: instance and class both from the executable name.
fn instance_class() -> String {
    let name = std::env::current_exe()
        .ok()
        .and_then(|path| path.file_name().map(|n| n.to_string_lossy().into_owned()))
        .unwrap_or_else(|| "xsurf".to_string());
    format!("{}\0{}\0", name, name)
}

struct NoopHandler;

impl SurfaceHandler for NoopHandler {}

impl Display {
    /// Track a window some other client owns. Closing the handle forgets the
    /// window; it is never destroyed.
    pub fn wrap_foreign(&self, id: xproto::Window) -> Result<SurfaceHandle, crate::Error> {
        let surface = Rc::new(Surface {
            id,
            display: self.clone(),
            kind: SurfaceKind::Foreign,
            handler: RefCell::new(Box::new(NoopHandler)),
            area: Cell::new(ScaledArea::default()),
            scale: Cell::new(Scale::default()),
            destroyed: Cell::new(false),
            mapped: Cell::new(true),
            needs_frame: Cell::new(false),
            damage_time: Cell::new(None),
            freeze_count: Cell::new(0),
            resize_count: Cell::new(0),
            toplevel: None,
        });
        self.add_surface(id, Rc::clone(&surface))
            .map_err(crate::Error::from)?;
        Ok(SurfaceHandle {
            id,
            surface: Rc::downgrade(&surface),
        })
    }
}

/// Weak handle to any surface. Operations on a dead surface are no-ops.
#[derive(Clone, Default)]
pub struct SurfaceHandle {
    pub(crate) id: u32,
    pub(crate) surface: Weak<Surface>,
}

impl SurfaceHandle {
    /// The raw X window id, for embedding.
    pub fn raw_id(&self) -> u32 {
        self.id
    }

    pub fn show(&self) {
        if let Some(surface) = self.surface.upgrade() {
            log_x11!(surface.show());
        }
    }

    pub fn hide(&self) {
        if let Some(surface) = self.surface.upgrade() {
            log_x11!(surface.hide());
        }
    }

    pub fn close(&self) {
        if let Some(surface) = self.surface.upgrade() {
            surface.destroy();
        }
    }

    /// Mark the surface damaged; the next frame tick runs the paint hook.
    pub fn invalidate(&self) {
        if let Some(surface) = self.surface.upgrade() {
            surface.invalidate();
        }
    }

    /// Report actual drawing from inside the paint hook, so the frame sync
    /// counter can go busy.
    pub fn notify_damage(&self) {
        if let Some(surface) = self.surface.upgrade() {
            surface.notify_damage();
        }
    }

    pub fn set_position(&self, position: Point) {
        if let Some(surface) = self.surface.upgrade() {
            log_x11!(surface.set_position(position));
        }
    }

    pub fn get_position(&self) -> Point {
        if let Some(surface) = self.surface.upgrade() {
            match surface.get_position() {
                Ok(position) => return position,
                Err(e) => tracing::error!("failed to get position: {}", e),
            }
        }
        Point::ZERO
    }

    pub fn set_size(&self, size: Size) {
        if let Some(surface) = self.surface.upgrade() {
            log_x11!(surface.set_size(size));
        }
    }

    pub fn get_size(&self) -> Size {
        self.surface
            .upgrade()
            .map(|surface| surface.size())
            .unwrap_or(Size::ZERO)
    }

    pub fn raise(&self) {
        if let Some(surface) = self.surface.upgrade() {
            log_x11!(surface.restack(xproto::StackMode::ABOVE));
        }
    }

    pub fn lower(&self) {
        if let Some(surface) = self.surface.upgrade() {
            log_x11!(surface.restack(xproto::StackMode::BELOW));
        }
    }

    pub fn scale(&self) -> Scale {
        self.surface
            .upgrade()
            .map(|surface| surface.scale())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_size_clamps_to_one_pixel() {
        assert_eq!(
            clamped_size_px(Size::ZERO, Scale::default()),
            Size::new(1.0, 1.0)
        );
    }

    #[test]
    fn wm_configures_leave_resize_count_alone() {
        assert_eq!(resize_ack(false, 2), (2, false));
        assert_eq!(resize_ack(false, 0), (0, false));
    }

    #[test]
    fn drag_configures_drain_resize_count_and_ack_the_last() {
        assert_eq!(resize_ack(true, 2), (1, false));
        assert_eq!(resize_ack(true, 1), (0, true));
        assert_eq!(resize_ack(true, 0), (0, false));
    }

    #[test]
    fn size_hints_pin_unresizable_windows() {
        let hints = size_hints(false, Size::new(640.0, 480.0), None);
        assert_eq!(hints.min_size, Some((640, 480)));
        assert_eq!(hints.max_size, Some((640, 480)));
    }

    #[test]
    fn size_hints_leave_resizable_windows_free() {
        let hints = size_hints(true, Size::new(640.0, 480.0), Some(Size::new(100.0, 50.0)));
        assert_eq!(hints.min_size, Some((100, 50)));
        assert_eq!(hints.max_size, None);
    }

    #[test]
    fn instance_class_is_doubly_nul_terminated() {
        let class = instance_class();
        assert!(class.ends_with('\0'));
        assert_eq!(class.matches('\0').count(), 2);
    }
}
