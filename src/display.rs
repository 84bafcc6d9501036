// Copyright 2026 the Xsurf Authors
// SPDX-License-Identifier: Apache-2.0

//! The per-display session: connection, registry, run loop.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::convert::TryFrom;
use std::os::unix::io::RawFd;
use std::rc::Rc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Error};
use x11rb::connection::Connection;
use x11rb::protocol::sync::ConnectionExt as _;
use x11rb::protocol::xproto::{
    self, ConnectionExt, CreateWindowAux, EventMask, Timestamp, WindowClass,
};
use x11rb::protocol::Event;
use x11rb::resource_manager::{
    new_from_default as new_resource_db_from_default, Database as ResourceDb,
};
use x11rb::xcb_ffi::XCBConnection;

use crate::atoms::Atoms;
use crate::events::{self, EventFilter, EventSource, FilterResult};
use crate::moveresize::{MoveResize, QueuedInput};
use crate::screen::{self, WmCaps};
use crate::surface::Surface;

/// A connection to one X display, shared by every surface created on it.
///
/// `Display` is a cheap clone over shared internals. An `XCBConnection` is
/// *technically* safe to use from other threads, but there are subtleties;
/// the raw-pointer marker keeps the whole API `!Send` and `!Sync` so the
/// question never comes up.
#[derive(Clone)]
pub struct Display {
    connection: Rc<XCBConnection>,
    marker: std::marker::PhantomData<*mut XCBConnection>,
    /// The default screen of the connected display.
    screen_num: usize,
    root: xproto::Window,
    /// An input-only window created first and destroyed last; it receives
    /// session-level events and its destruction ends the run loop.
    event_window: u32,
    atoms: Rc<Atoms>,
    /// The X11 resource database used to query dpi.
    pub(crate) rdb: Rc<ResourceDb>,
    /// The mutable session state.
    state: Rc<RefCell<State>>,
    /// Events read from the server but not yet dispatched. Kept as a deque
    /// (rather than dispatching straight off the socket) so the move/resize
    /// lookahead can peek at what is coming.
    pending_events: Rc<RefCell<VecDeque<Event>>>,
    filters: Rc<RefCell<Vec<EventFilter>>>,
    event_source: Rc<RefCell<EventSource>>,
    caps: Rc<RefCell<WmCaps>>,
    moveresize: Rc<RefCell<MoveResize>>,
    /// Newest timestamp that we received.
    timestamp: Rc<Cell<Timestamp>>,
    /// Whether the server speaks XSync; without it frame sync is disabled.
    sync_supported: bool,
    /// The read end of the "idle pipe", which lets the loop be woken without
    /// X traffic.
    idle_read: RawFd,
    /// The write end of the "idle pipe".
    idle_write: RawFd,
}

struct State {
    /// Whether `Display::quit` has already been called.
    quitting: bool,
    /// Every live surface, keyed by its X window.
    surfaces: HashMap<xproto::Window, Rc<Surface>>,
}

impl Display {
    pub fn new() -> Result<Display, crate::Error> {
        Display::new_inner().map_err(Into::into)
    }

    fn new_inner() -> Result<Display, Error> {
        let (conn, screen_num) = XCBConnection::connect(None).context("connect to X server")?;
        let rdb = Rc::new(new_resource_db_from_default(&conn)?);
        let connection = Rc::new(conn);

        let root = connection
            .setup()
            .roots
            .get(screen_num)
            .ok_or_else(|| anyhow!("invalid screen num: {}", screen_num))?
            .root;

        let atoms = Rc::new(
            Atoms::new(connection.as_ref())?
                .reply()
                .context("get X11 atoms")?,
        );

        let event_window = Display::create_event_window(&connection, root)?;

        // XSync must be version-negotiated before any other sync request.
        let sync_supported = match connection.sync_initialize(3, 1) {
            Ok(cookie) => match cookie.reply() {
                Ok(version) => {
                    tracing::debug!(
                        "X server supports XSync version {}.{}",
                        version.major_version,
                        version.minor_version,
                    );
                    true
                }
                Err(e) => {
                    tracing::info!("XSync unavailable, frame sync disabled: {}", e);
                    false
                }
            },
            Err(e) => {
                tracing::info!("XSync unavailable, frame sync disabled: {}", e);
                false
            }
        };

        let (idle_read, idle_write) = nix::unistd::pipe2(nix::fcntl::OFlag::O_NONBLOCK)?;

        // The WM advertises capability changes through the root window.
        let mut event_source = EventSource::new();
        event_source.register(
            connection.as_ref(),
            root,
            EventMask::PROPERTY_CHANGE | EventMask::STRUCTURE_NOTIFY,
        )?;

        Ok(Display {
            connection,
            marker: std::marker::PhantomData,
            screen_num,
            root,
            event_window,
            atoms,
            rdb,
            state: Rc::new(RefCell::new(State {
                quitting: false,
                surfaces: HashMap::new(),
            })),
            pending_events: Default::default(),
            filters: Default::default(),
            event_source: Rc::new(RefCell::new(event_source)),
            caps: Rc::new(RefCell::new(WmCaps::default())),
            moveresize: Rc::new(RefCell::new(MoveResize::new())),
            timestamp: Rc::new(Cell::new(x11rb::CURRENT_TIME)),
            sync_supported,
            idle_read,
            idle_write,
        })
    }

    fn create_event_window(conn: &Rc<XCBConnection>, root: xproto::Window) -> Result<u32, Error> {
        let id = conn.generate_id()?;
        conn.create_window(
            0,
            id,
            root,
            0,
            0,
            1,
            1,
            0,
            WindowClass::INPUT_ONLY,
            x11rb::COPY_FROM_PARENT,
            &CreateWindowAux::new().event_mask(EventMask::STRUCTURE_NOTIFY),
        )?
        .check()
        .context("create input-only event window")?;
        Ok(id)
    }

    #[inline]
    pub(crate) fn connection(&self) -> &Rc<XCBConnection> {
        &self.connection
    }

    #[inline]
    pub(crate) fn atoms(&self) -> &Atoms {
        &self.atoms
    }

    #[inline]
    pub(crate) fn root(&self) -> xproto::Window {
        self.root
    }

    #[inline]
    pub(crate) fn timestamp(&self) -> Timestamp {
        self.timestamp.get()
    }

    #[inline]
    pub(crate) fn sync_supported(&self) -> bool {
        self.sync_supported
    }

    #[inline]
    pub(crate) fn moveresize(&self) -> &Rc<RefCell<MoveResize>> {
        &self.moveresize
    }

    #[inline]
    pub(crate) fn event_source(&self) -> &Rc<RefCell<EventSource>> {
        &self.event_source
    }

    /// Whether the running WM advertises `hint` in `_NET_SUPPORTED`.
    pub(crate) fn supports_net_wm_hint(&self, hint: xproto::Atom) -> bool {
        match self.caps.try_borrow_mut() {
            Ok(mut caps) => caps.supports(&self.connection, &self.atoms, self.root, hint),
            Err(_) => false,
        }
    }

    /// `[top, bottom, left, right]`-most monitor indices.
    pub(crate) fn edge_monitors(&self) -> Option<[u32; 4]> {
        screen::edge_monitors(&self.connection, self.root)
    }

    /// A 32-bit TrueColor visual, if a compositor is running to blend it.
    /// Without an owner on the screen's `_NET_WM_CM_Sn` selection an ARGB
    /// window would just render its alpha as garbage.
    pub(crate) fn argb_visual(&self) -> Option<(u8, xproto::Visualid)> {
        let selection = format!("_NET_WM_CM_S{}", self.screen_num);
        let atom = self
            .connection
            .intern_atom(false, selection.as_bytes())
            .ok()?
            .reply()
            .ok()?
            .atom;
        let owner = self
            .connection
            .get_selection_owner(atom)
            .ok()?
            .reply()
            .ok()?
            .owner;
        if owner == x11rb::NONE {
            return None;
        }
        let screen = self.connection.setup().roots.get(self.screen_num)?;
        screen
            .allowed_depths
            .iter()
            .find(|depth| depth.depth == 32)
            .and_then(|depth| {
                depth
                    .visuals
                    .iter()
                    .find(|visual| visual.class == xproto::VisualClass::TRUE_COLOR)
                    .map(|visual| (depth.depth, visual.visual_id))
            })
    }

    /// Send a WM-directed client message: 32-bit format, addressed to the
    /// root with the substructure masks, carrying `window` as its subject.
    pub(crate) fn send_wm_message(
        &self,
        window: xproto::Window,
        type_: xproto::Atom,
        data: [u32; 5],
    ) -> Result<(), Error> {
        let event = xproto::ClientMessageEvent {
            response_type: xproto::CLIENT_MESSAGE_EVENT,
            format: 32,
            sequence: 0,
            window,
            type_,
            data: data.into(),
        };
        self.connection
            .send_event(
                false,
                self.root,
                EventMask::SUBSTRUCTURE_NOTIFY | EventMask::SUBSTRUCTURE_REDIRECT,
                event,
            )?
            .ignore_error();
        Ok(())
    }

    /// Register a filter that sees every event before dispatch.
    pub fn add_event_filter(&self, filter: EventFilter) {
        if let Ok(mut filters) = self.filters.try_borrow_mut() {
            filters.push(filter);
        } else {
            tracing::error!("event filters already borrowed");
        }
    }

    pub(crate) fn add_surface(&self, id: xproto::Window, surface: Rc<Surface>) -> Result<(), Error> {
        borrow_mut!(self.state)?.surfaces.insert(id, surface);
        Ok(())
    }

    /// Remove a surface and return the number left.
    fn remove_surface(&self, id: xproto::Window) -> Result<usize, Error> {
        let mut state = borrow_mut!(self.state)?;
        state.surfaces.remove(&id);
        if let Ok(mut source) = self.event_source.try_borrow_mut() {
            source.unregister(id);
        }
        Ok(state.surfaces.len())
    }

    /// Drop a surface that will never get a DestroyNotify (foreign windows
    /// have no events selected on them).
    pub(crate) fn forget_surface(&self, id: xproto::Window) {
        match self.remove_surface(id) {
            Ok(0) => {
                let quitting = self.state.try_borrow().map_or(false, |state| state.quitting);
                if quitting {
                    self.finalize_quit();
                }
            }
            Ok(_) => {}
            Err(e) => tracing::error!("failed to forget surface {}: {}", id, e),
        }
    }

    pub(crate) fn surface(&self, id: xproto::Window) -> Result<Option<Rc<Surface>>, Error> {
        Ok(borrow!(self.state)?.surfaces.get(&id).cloned())
    }

    /// The undispatched input backlog, as the move/resize lookahead sees it.
    pub(crate) fn queued_input(&self) -> Vec<QueuedInput> {
        match self.pending_events.try_borrow() {
            Ok(pending) => pending
                .iter()
                .map(|event| match event {
                    Event::MotionNotify(ev) => QueuedInput::Motion(ev.time),
                    Event::ButtonRelease(_) => QueuedInput::ButtonRelease,
                    _ => QueuedInput::Other,
                })
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    /// Returns `Ok(true)` if we want to exit the main loop.
    fn dispatch_event(&self, ev: &Event) -> Result<bool, Error> {
        if ev.server_generated() {
            // Update our latest timestamp
            let timestamp = match ev {
                Event::KeyPress(ev) => ev.time,
                Event::KeyRelease(ev) => ev.time,
                Event::ButtonPress(ev) => ev.time,
                Event::ButtonRelease(ev) => ev.time,
                Event::MotionNotify(ev) => ev.time,
                Event::EnterNotify(ev) => ev.time,
                Event::LeaveNotify(ev) => ev.time,
                Event::PropertyNotify(ev) => ev.time,
                _ => self.timestamp.get(),
            };
            self.timestamp.set(timestamp);
        }

        {
            let filters = borrow!(self.filters)?;
            for filter in filters.iter() {
                if filter(self, ev) == FilterResult::Consumed {
                    return Ok(false);
                }
            }
        }
        if borrow_mut!(self.moveresize)?.handle_event(self, ev)? {
            return Ok(false);
        }

        match ev {
            Event::Expose(ev) => {
                if let Some(surface) = self.surface(ev.window)? {
                    surface.handle_expose(ev);
                }
            }
            Event::ClientMessage(ev) => {
                if let Some(surface) = self.surface(ev.window)? {
                    surface.handle_client_message(ev);
                }
            }
            Event::ConfigureNotify(ev) => {
                if ev.window != self.event_window {
                    if let Some(surface) = self.surface(ev.window)? {
                        let drag_ack = surface
                            .handle_configure_notify(ev)
                            .context("CONFIGURE_NOTIFY - failed to handle")?;
                        if drag_ack {
                            borrow_mut!(self.moveresize)?.configure_done(self)?;
                        }
                    }
                }
            }
            Event::MapNotify(ev) => {
                if let Some(surface) = self.surface(ev.window)? {
                    surface.handle_map_notify();
                }
            }
            Event::UnmapNotify(ev) => {
                if let Some(surface) = self.surface(ev.window)? {
                    surface.handle_unmap_notify();
                }
            }
            Event::DestroyNotify(ev) => {
                if ev.window == self.event_window {
                    // The destruction of the event window means that we need
                    // to quit the run loop.
                    return Ok(true);
                }
                if let Ok(mut caps) = self.caps.try_borrow_mut() {
                    if caps.is_check_window(ev.window) {
                        caps.invalidate();
                    }
                }
                borrow_mut!(self.moveresize)?.surface_destroyed(self, ev.window);
                if let Some(surface) = self.surface(ev.window)? {
                    surface.handle_destroy_notify();
                }
                let surfaces_left = self
                    .remove_surface(ev.window)
                    .context("DESTROY_NOTIFY - failed to remove surface")?;
                if surfaces_left == 0 && borrow!(self.state)?.quitting {
                    self.finalize_quit();
                }
            }
            Event::PropertyNotify(ev) => {
                if ev.window == self.root {
                    if ev.atom == self.atoms._NET_SUPPORTED
                        || ev.atom == self.atoms._NET_SUPPORTING_WM_CHECK
                    {
                        if let Ok(mut caps) = self.caps.try_borrow_mut() {
                            caps.invalidate();
                        }
                    }
                } else if ev.atom == self.atoms._NET_WM_STATE {
                    if let Some(surface) = self.surface(ev.window)? {
                        surface
                            .refresh_wm_state()
                            .context("PROPERTY_NOTIFY - failed to re-read state")?;
                    }
                }
            }
            Event::ButtonPress(ev) => {
                if let Some(surface) = self.surface(ev.event)? {
                    surface.handle_button_press(ev);
                }
            }
            Event::ButtonRelease(ev) => {
                if let Some(surface) = self.surface(ev.event)? {
                    surface.handle_button_release(ev);
                }
            }
            Event::MotionNotify(ev) => {
                if let Some(surface) = self.surface(ev.event)? {
                    surface.handle_motion_notify(ev);
                }
            }
            Event::Error(e) => {
                tracing::error!("X11 error event: {:?}", e);
            }
            _ => {}
        }
        Ok(false)
    }

    fn run_inner(self) -> Result<(), Error> {
        // The frame tick runs at the monitor's refresh rate. Rate-limiting it
        // has two purposes: damaged surfaces aren't drawn more often than
        // they can be shown, and an otherwise idle connection wakes up at
        // most once per frame.
        let refresh_rate =
            screen::refresh_rate(self.connection(), self.event_window).unwrap_or(60.0);
        let timeout = Duration::from_millis((1000.0 / refresh_rate) as u64);
        let mut last_tick_time = Instant::now();
        loop {
            let next_tick_time = last_tick_time + timeout;
            let frame_deadline = if self.frames_pending()? {
                Some(next_tick_time)
            } else {
                None
            };

            self.connection.flush()?;

            // Before we poll on the connection's file descriptor, check
            // whether there are any events ready; XCB may have buffered some
            // during the frame tick.
            events::pump(&self.connection, &mut *borrow_mut!(self.pending_events)?)?;
            if borrow!(self.pending_events)?.is_empty() {
                poll_with_timeout(
                    &self.connection,
                    self.idle_read,
                    frame_deadline,
                    next_tick_time,
                )
                .context("Error while waiting for X11 connection")?;
            }

            loop {
                events::pump(&self.connection, &mut *borrow_mut!(self.pending_events)?)?;
                let event = borrow_mut!(self.pending_events)?.pop_front();
                let event = match event {
                    Some(event) => event,
                    None => break,
                };
                match self.dispatch_event(&event) {
                    Ok(quit) => {
                        if quit {
                            return Ok(());
                        }
                    }
                    Err(e) => {
                        tracing::error!("Error handling event: {:#}", e);
                    }
                }
            }

            let now = Instant::now();
            if now >= next_tick_time {
                last_tick_time = now;
                drain_idle_pipe(self.idle_read)?;
                self.run_frame_tick()?;
            }
        }
    }

    fn frames_pending(&self) -> Result<bool, Error> {
        Ok(borrow!(self.state)?
            .surfaces
            .values()
            .any(|surface| surface.frame_tick_due()))
    }

    fn run_frame_tick(&self) -> Result<(), Error> {
        let surfaces = borrow!(self.state)?
            .surfaces
            .values()
            .cloned()
            .collect::<Vec<_>>();
        for surface in surfaces {
            surface.frame_tick();
        }
        Ok(())
    }

    /// Run the event loop until [`Display::quit`] finishes tearing down.
    pub fn run(self) {
        if let Err(e) = self.run_inner() {
            tracing::error!("{}", e);
        }
    }

    pub fn quit(&self) {
        // Collect first; destroying a foreign surface removes it from the
        // registry synchronously, which needs the state borrow back.
        let surfaces = match self.state.try_borrow_mut() {
            Ok(mut state) => {
                if state.quitting {
                    return;
                }
                state.quitting = true;
                state.surfaces.values().cloned().collect::<Vec<_>>()
            }
            Err(_) => {
                tracing::error!("session state already borrowed");
                return;
            }
        };
        if surfaces.is_empty() {
            // There are no surfaces left, so we can immediately finalize.
            self.finalize_quit();
        } else {
            // We need to queue up the destruction of all our surfaces.
            // Failure to do so will lead to resource leaks.
            for surface in surfaces {
                surface.destroy();
            }
        }
    }

    fn finalize_quit(&self) {
        log_x11!(self.connection.destroy_window(self.event_window));
        if let Err(e) = nix::unistd::close(self.idle_read) {
            tracing::error!("Error closing idle_read: {}", e);
        }
        if let Err(e) = nix::unistd::close(self.idle_write) {
            tracing::error!("Error closing idle_write: {}", e);
        }
    }

    /// Wake the run loop without any X traffic.
    pub fn wake(&self) {
        loop {
            match nix::unistd::write(self.idle_write, &[0]) {
                Err(nix::errno::Errno::EINTR) => {}
                // A full pipe means the loop is already due to wake up.
                Err(nix::errno::Errno::EAGAIN) => break,
                Err(e) => {
                    tracing::error!("Failed to write to idle pipe: {}", e);
                    break;
                }
                Ok(_) => break,
            }
        }
    }
}

/// Clears out our idle pipe; `idle_read` should be the reading end of a pipe
/// that was opened with O_NONBLOCK.
fn drain_idle_pipe(idle_read: RawFd) -> Result<(), Error> {
    // Each write to the idle pipe adds one byte; it's unlikely that there
    // will be much in it, but read it 16 bytes at a time just in case.
    let mut read_buf = [0u8; 16];
    loop {
        match nix::unistd::read(idle_read, &mut read_buf[..]) {
            Err(nix::errno::Errno::EINTR) => {}
            // According to write(2), this is the outcome of reading an empty,
            // O_NONBLOCK pipe.
            Err(nix::errno::Errno::EAGAIN) => {
                break;
            }
            Err(e) => {
                return Err(e).context("Failed to read from idle pipe");
            }
            // According to write(2), this is the outcome of reading an
            // O_NONBLOCK pipe when the other end has been closed. This
            // shouldn't happen to us because we own both ends, but just in
            // case.
            Ok(0) => {
                break;
            }
            Ok(_) => {}
        }
    }
    Ok(())
}

/// Returns when there is an event ready to read from `conn`, or we got
/// signalled through the idle pipe and the tick deadline has passed, or the
/// frame deadline has passed.
// This was taken, with minor modifications, from the xclock_utc example in
// the x11rb crate.
// https://github.com/psychon/x11rb/blob/a6bd1453fd8e931394b9b1f2185fad48b7cca5fe/examples/xclock_utc.rs
fn poll_with_timeout(
    conn: &Rc<XCBConnection>,
    idle: RawFd,
    frame_deadline: Option<Instant>,
    idle_deadline: Instant,
) -> Result<(), Error> {
    use nix::poll::{poll, PollFd, PollFlags};
    use std::os::raw::c_int;
    use std::os::unix::io::AsRawFd;

    let mut now = Instant::now();
    let earliest_deadline = idle_deadline.min(frame_deadline.unwrap_or(idle_deadline));
    let fd = conn.as_raw_fd();
    let mut both_poll_fds = [
        PollFd::new(fd, PollFlags::POLLIN),
        PollFd::new(idle, PollFlags::POLLIN),
    ];
    let mut just_connection = [PollFd::new(fd, PollFlags::POLLIN)];
    let mut poll_fds = &mut both_poll_fds[..];

    // We start with no timeout in the poll call. If we get something from the
    // idle pipe, we'll start setting one.
    let mut honor_idle_deadline = false;
    loop {
        fn readable(p: PollFd) -> bool {
            p.revents()
                .unwrap_or_else(PollFlags::empty)
                .contains(PollFlags::POLLIN)
        }

        // Compute the deadline for when poll() has to wakeup
        let deadline = if honor_idle_deadline {
            Some(earliest_deadline)
        } else {
            frame_deadline
        };
        // ...and convert the deadline into an argument for poll()
        let poll_timeout = if let Some(deadline) = deadline {
            if deadline <= now {
                break;
            } else {
                let millis = c_int::try_from(deadline.duration_since(now).as_millis())
                    .unwrap_or(c_int::MAX - 1);
                // The above .as_millis() rounds down. This means we would
                // wake up before the deadline is reached. Add one to
                // 'simulate' rounding up instead.
                millis + 1
            }
        } else {
            // No timeout
            -1
        };

        match poll(poll_fds, poll_timeout) {
            Ok(_) => {
                if readable(poll_fds[0]) {
                    // There is an X11 event ready to be handled.
                    break;
                }
                now = Instant::now();
                if frame_deadline.is_some() && now >= frame_deadline.unwrap() {
                    break;
                }
                if poll_fds.len() == 1 || readable(poll_fds[1]) {
                    // Now that we got signalled, stop polling from the idle
                    // pipe and use a timeout instead.
                    poll_fds = &mut just_connection;
                    honor_idle_deadline = true;
                    if now >= idle_deadline {
                        break;
                    }
                }
            }

            Err(nix::errno::Errno::EINTR) => {
                now = Instant::now();
            }
            Err(e) => return Err(e.into()),
        }
    }

    Ok(())
}
