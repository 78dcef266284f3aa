//! Implementation of a native windowing backend using X11.
//!
//! The backend is a single owned context, [`X11Backend`], created with
//! [`X11Backend::new`](self::X11Backend::new). Every operation goes through it: creating and
//! managing windows, querying monitors and video modes, reading and writing the clipboard, and
//! processing events from the X server. Windows, monitors and cursors are referred to by small
//! copyable ids.
//!
//! Events are delivered as [`X11Event`]s, either by driving the backend manually with
//! [`X11Backend::poll_events`] and [`X11Backend::wait_events`], or by inserting it into a
//! [`calloop::EventLoop`].
//!
//! ## Example usage
//!
//! ```rust,no_run
//! # use std::error::Error;
//! use x11_windowing::backend::x11::{X11Backend, X11Event, WindowBuilder};
//!
//! fn run() -> Result<(), Box<dyn Error>> {
//!     let mut backend = X11Backend::new()?;
//!
//!     let window = backend.create_window(WindowBuilder::new().title("Hello X11").size(640, 480))?;
//!     backend.show(window)?;
//!
//!     let mut running = true;
//!     while running {
//!         backend.wait_events(None, |event| {
//!             if let X11Event::CloseRequested { .. } = event {
//!                 running = false;
//!             }
//!         })?;
//!     }
//!
//!     backend.destroy_window(window)?;
//!     Ok(())
//! }
//! ```
//!
//! ## Calloop
//!
//! [`X11Backend`] implements [`calloop::EventSource`]. Once inserted, the loop callback receives
//! every event; operations on the backend can still be performed through the loop's access to the
//! source.

/*
A note for future contributors and maintainers:

Useful reading to understand this backend more deeply:

ICCCM: https://x.org/releases/X11R7.6/doc/xorg-docs/specs/ICCCM/icccm.html

EWMH: https://specifications.freedesktop.org/wm-spec/latest/

XDND: https://freedesktop.org/wiki/Specifications/XDND/
*/

mod atoms;
mod cursor;
mod dispatch;
mod dnd;
mod error;
mod event_loop;
#[macro_use]
mod extension;
mod ime;
mod input;
mod keyboard;
mod monitor;
mod selection;
mod window;

use std::{
    cell::RefCell,
    collections::{HashMap, VecDeque},
    fmt,
    os::unix::io::OwnedFd,
    path::PathBuf,
    sync::Arc,
    time::Duration,
};

use calloop::{EventSource, Poll, PostAction, Readiness, Token, TokenFactory};
use indexmap::IndexMap;
use rustix::pipe::{pipe_with, PipeFlags};
use tracing::{debug, error, info, warn};
use x11rb::{
    connection::Connection,
    protocol::{
        randr::{self, ConnectionExt as _},
        xinerama::ConnectionExt as _,
        xkb::{self, ConnectionExt as _},
        xproto::{
            Atom, ChangeWindowAttributesAux, ConnectionExt as _, CreateGCAux, CreateWindowAux,
            CursorWrapper, EventMask, GcontextWrapper, PixmapWrapper, Rectangle as XRectangle, Screen,
            Visualid, Window, WindowClass, WindowWrapper,
        },
        Event,
    },
    resource_manager::Database,
    rust_connection::RustConnection,
};

use self::{
    cursor::PointerState, dnd::DndState, ime::Ime, keyboard::KeyboardState, monitor::Monitor, monitor::ScreenSaver,
    selection::SelectionState, window::WindowRecord,
};
use crate::{
    backend::input::{Axis, ButtonState, KeyState, Modifiers, MouseButton},
    utils::{x11rb::X11Source, Logical, Point, Size},
};

pub use self::atoms::{detect_ewmh, Atoms, WmSupport};
pub use self::cursor::{CursorMode, CursorShape};
pub use self::dnd::parse_uri_list;
pub use self::error::*;
pub use self::event_loop::EventLoopWaker;
pub use self::extension::Extensions;
pub use self::keyboard::{translate_keysyms, CoreKeymap, Key, KeyTable};
pub use self::monitor::{choose_video_mode, MonitorChanges, VideoMode};
pub use self::selection::{SelectionKind, INCR_CHUNK_SIZE};
pub use self::window::{FrameExtents, FullscreenMode, GeometryHandle, WindowBuilder, WindowState};

/// Identifies a window created by an [`X11Backend`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WindowId(pub(crate) Window);

impl WindowId {
    /// The X11 window id.
    pub fn raw(&self) -> u32 {
        self.0
    }
}

/// Identifies a connected monitor, by its RandR output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MonitorId(pub(crate) randr::Output);

impl MonitorId {
    /// The RandR output id, `0` for the synthetic monitor used without RandR.
    pub fn raw(&self) -> u32 {
        self.0
    }
}

/// Identifies a cursor image created by an [`X11Backend`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CursorId(pub(crate) u32);

impl CursorId {
    /// The X11 cursor id.
    pub fn raw(&self) -> u32 {
        self.0
    }
}

/// An RGBA image with 8 bits per channel, not premultiplied, row by row from the top left.
#[derive(Debug, Clone, Copy)]
pub struct Image<'a> {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// The pixel data, `width * height * 4` bytes
    pub pixels: &'a [u8],
}

impl<'a> Image<'a> {
    pub(crate) fn validate(&self) -> Result<(), X11Error> {
        let expected = self.width as usize * self.height as usize * 4;
        if self.width == 0 || self.height == 0 || self.pixels.len() != expected {
            return Err(X11Error::InvalidImage {
                width: self.width,
                height: self.height,
                len: self.pixels.len(),
            });
        }
        Ok(())
    }

    /// The pixels as packed `0xAARRGGBB` values.
    pub(crate) fn argb(&self) -> impl Iterator<Item = u32> + 'a {
        self.pixels.chunks_exact(4).map(|pixel| {
            u32::from(pixel[3]) << 24
                | u32::from(pixel[0]) << 16
                | u32::from(pixel[1]) << 8
                | u32::from(pixel[2])
        })
    }
}

/// Configuration of an [`X11Backend`].
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// The display to connect to, `$DISPLAY` if unset.
    pub display: Option<String>,
    /// How long to wait for another client during a selection transfer.
    pub selection_timeout: Duration,
    /// Upper bound of the bytes accepted from an incremental selection transfer.
    pub max_selection_bytes: usize,
    /// Default class part of `WM_CLASS`.
    pub class_name: String,
    /// Default instance part of `WM_CLASS`.
    pub instance_name: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        BackendConfig {
            display: None,
            selection_timeout: Duration::from_secs(5),
            max_selection_bytes: 64 * 1024 * 1024,
            class_name: String::from("x11-windowing"),
            instance_name: String::from("x11-windowing"),
        }
    }
}

impl BackendConfig {
    /// Default configuration
    pub fn new() -> BackendConfig {
        BackendConfig::default()
    }

    /// Connects to `display` instead of `$DISPLAY`.
    pub fn display(mut self, display: impl Into<String>) -> Self {
        self.display = Some(display.into());
        self
    }

    /// Sets the timeout of each wait during a selection transfer.
    pub fn selection_timeout(mut self, timeout: Duration) -> Self {
        self.selection_timeout = timeout;
        self
    }

    /// Sets the maximum size of an incoming selection.
    pub fn max_selection_bytes(mut self, bytes: usize) -> Self {
        self.max_selection_bytes = bytes;
        self
    }

    /// Sets the default `WM_CLASS` of new windows.
    pub fn class(mut self, instance: impl Into<String>, class: impl Into<String>) -> Self {
        self.instance_name = instance.into();
        self.class_name = class.into();
        self
    }
}

/// An event emitted by the X11 backend.
#[derive(Debug, Clone, PartialEq)]
pub enum X11Event {
    /// The window was resized.
    Resized {
        /// The window
        window: WindowId,
        /// The new size of the content area
        size: Size<i32, Logical>,
    },

    /// The window was moved.
    Moved {
        /// The window
        window: WindowId,
        /// The new position, relative to the root window
        position: Point<i32, Logical>,
    },

    /// The window gained or lost the input focus.
    Focus {
        /// The window
        window: WindowId,
        /// Whether it is focused now
        focused: bool,
    },

    /// The window was iconified or restored.
    Minimized {
        /// The window
        window: WindowId,
        /// Whether it is iconified now
        minimized: bool,
    },

    /// The window was maximized or restored.
    Maximized {
        /// The window
        window: WindowId,
        /// Whether it is maximized now
        maximized: bool,
    },

    /// The window has received a request to be closed.
    CloseRequested {
        /// The window
        window: WindowId,
    },

    /// The X server has required the contents of the window to be redrawn.
    Refresh {
        /// The window
        window: WindowId,
    },

    /// A key was pressed, repeated or released.
    Key {
        /// The window
        window: WindowId,
        /// The logical key, if the scancode maps to one
        key: Option<Key>,
        /// The X11 keycode
        scancode: u8,
        /// Pressed, repeated or released
        state: KeyState,
        /// Modifiers held at the time
        mods: Modifiers,
    },

    /// Text was entered.
    Text {
        /// The window
        window: WindowId,
        /// The character
        ch: char,
        /// Modifiers held at the time
        mods: Modifiers,
    },

    /// A mouse button was pressed or released.
    MouseButton {
        /// The window
        window: WindowId,
        /// The button
        button: MouseButton,
        /// Pressed or released
        state: ButtonState,
        /// Modifiers held at the time
        mods: Modifiers,
    },

    /// The scroll wheel moved.
    Scroll {
        /// The window
        window: WindowId,
        /// Direction of the scroll
        axis: Axis,
        /// Steps scrolled, positive for up and left
        amount: f64,
    },

    /// The pointer moved.
    ///
    /// With a disabled cursor, the position is virtual and unbounded.
    CursorMoved {
        /// The window
        window: WindowId,
        /// Position relative to the content area
        position: Point<f64, Logical>,
    },

    /// The pointer entered or left the window.
    CursorEntered {
        /// The window
        window: WindowId,
        /// Whether the pointer is inside now
        entered: bool,
    },

    /// Files were dropped onto the window.
    FileDrop {
        /// The window
        window: WindowId,
        /// Paths of the dropped files
        paths: Vec<PathBuf>,
    },

    /// The global content scale changed.
    ContentScale {
        /// The new scale
        scale: f64,
    },

    /// A monitor was connected.
    MonitorConnected {
        /// The monitor
        monitor: MonitorId,
    },

    /// A monitor was disconnected.
    MonitorDisconnected {
        /// The monitor
        monitor: MonitorId,
    },

    /// The hot-plug descriptor reported a device change.
    DeviceHotplug,
}

type ErrorCallback = Box<dyn FnMut(ErrorKind, &str)>;

/// A connection to the X server, with every window, monitor and cursor created through it.
pub struct X11Backend {
    pub(crate) conn: Arc<RustConnection>,
    pub(crate) screen_number: usize,
    pub(crate) root: Window,
    pub(crate) root_depth: u8,
    pub(crate) root_visual: Visualid,
    pub(crate) config: BackendConfig,
    pub(crate) extensions: Extensions,
    /// RandR is missing or reports no CRTCs.
    pub(crate) randr_broken: bool,
    pub(crate) xinerama_active: bool,
    pub(crate) atoms: Atoms,
    pub(crate) wm: WmSupport,
    /// `_NET_WM_CM_S<screen>`, owned by a running compositing manager.
    pub(crate) net_wm_cm: Atom,
    pub(crate) errors: ErrorSlot,
    error_callback: RefCell<Option<ErrorCallback>>,
    pub(crate) content_scale: f64,
    /// Invisible window owning our selections.
    helper: Window,
    pub(crate) hidden_cursor: u32,
    pub(crate) windows: HashMap<Window, WindowRecord>,
    pub(crate) monitors: IndexMap<MonitorId, Monitor>,
    pub(crate) saver: ScreenSaver,
    pub(crate) keyboard: KeyboardState,
    pub(crate) selection: SelectionState,
    pub(crate) dnd: DndState,
    pub(crate) pointer: PointerState,
    /// Input method connection, `None` without a running server.
    pub(crate) ime: Option<Ime>,
    /// Events set aside by [`X11Backend::next_matching_event`].
    pub(crate) deferred: VecDeque<Event>,
    pub(crate) wake_read: OwnedFd,
    pub(crate) wake_write: Arc<OwnedFd>,
    pub(crate) hotplug: Option<OwnedFd>,
    source: X11Source,
    source_token: Option<Token>,
    closed: bool,
}

impl fmt::Debug for X11Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("X11Backend")
            .field("screen_number", &self.screen_number)
            .field("root", &self.root)
            .field("extensions", &self.extensions)
            .field("randr_broken", &self.randr_broken)
            .field("wm", &self.wm)
            .field("windows", &self.windows.len())
            .field("monitors", &self.monitors.len())
            .field("ime", &self.ime.is_some())
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

/// Reads the `Xft.dpi` resource as a scale factor.
fn content_scale_of(db: &Database) -> f64 {
    db.get_string("Xft.dpi", "")
        .and_then(|dpi| dpi.trim().parse::<f64>().ok())
        .filter(|dpi| *dpi > 0.0)
        .map(|dpi| dpi / 96.0)
        .unwrap_or(1.0)
}

impl X11Backend {
    /// Connects to the X server named by `$DISPLAY`, with the default configuration.
    pub fn new() -> Result<X11Backend, X11Error> {
        X11Backend::with_config(BackendConfig::default())
    }

    /// Connects to the X server.
    pub fn with_config(config: BackendConfig) -> Result<X11Backend, X11Error> {
        info!("Connecting to the X server");

        let (conn, screen_number) = RustConnection::connect(config.display.as_deref())?;
        let conn = Arc::new(conn);
        info!(screen = screen_number, "Connected to the X server");

        let screen = &conn.setup().roots[screen_number];
        let (root, root_depth, root_visual) = (screen.root, screen.root_depth, screen.root_visual);

        let extensions = Extensions::check_extensions(&*conn)?;

        let atoms = Atoms::new(&*conn)?.reply()?;
        let wm = detect_ewmh(&*conn, root, &atoms)?;
        let net_wm_cm = conn
            .intern_atom(false, format!("_NET_WM_CM_S{}", screen_number).as_bytes())?
            .reply()?
            .atom;

        let mut randr_broken = extensions.randr.is_none();
        if !randr_broken {
            let resources = conn.randr_get_screen_resources_current(root)?.reply()?;
            if resources.crtcs.is_empty() {
                // virtual servers may expose RandR without any output
                warn!("RandR reports no CRTCs, monitor management disabled");
                randr_broken = true;
            } else {
                conn.randr_select_input(root, randr::NotifyMask::OUTPUT_CHANGE)?;
            }
        }
        let xinerama_active = extensions.xinerama.is_some() && conn.xinerama_is_active()?.reply()?.state != 0;

        let mut keyboard = KeyboardState::default();
        let xkb_available = extensions.xkb.is_some() && conn.xkb_use_extension(1, 0)?.reply()?.supported;
        if xkb_available {
            let device: xkb::DeviceSpec = xkb::ID::USE_CORE_KBD.into();
            let flags = conn
                .xkb_per_client_flags(
                    device,
                    xkb::PerClientFlag::DETECTABLE_AUTO_REPEAT,
                    xkb::PerClientFlag::DETECTABLE_AUTO_REPEAT,
                    0u32.into(),
                    0u32.into(),
                    0u32.into(),
                )?
                .reply()?;
            keyboard.detectable_repeat = flags
                .supported
                .contains(xkb::PerClientFlag::DETECTABLE_AUTO_REPEAT);

            let events = xkb::EventType::STATE_NOTIFY
                | xkb::EventType::NEW_KEYBOARD_NOTIFY
                | xkb::EventType::MAP_NOTIFY;
            conn.xkb_select_events(
                device,
                0u8.into(),
                events,
                0u8.into(),
                0u8.into(),
                &xkb::SelectEventsAux::new(),
            )?;
            keyboard.group = u8::from(conn.xkb_get_state(device)?.reply()?.group);
        }
        keyboard.reload(&*conn, xkb_available)?;
        info!(
            xkb = xkb_available,
            detectable_repeat = keyboard.detectable_repeat,
            "Keyboard layout loaded"
        );

        let resources = x11rb::resource_manager::new_from_default(&*conn)?;
        let content_scale = content_scale_of(&resources);

        // RESOURCE_MANAGER changes carry new scale settings
        conn.change_window_attributes(
            root,
            &ChangeWindowAttributesAux::new().event_mask(EventMask::PROPERTY_CHANGE),
        )?;

        let helper = WindowWrapper::create_window(
            &*conn,
            x11rb::COPY_DEPTH_FROM_PARENT,
            root,
            0,
            0,
            1,
            1,
            0,
            WindowClass::INPUT_ONLY,
            x11rb::COPY_FROM_PARENT,
            &CreateWindowAux::new().event_mask(EventMask::PROPERTY_CHANGE),
        )?;
        let hidden_cursor = create_hidden_cursor(&conn, root)?;
        let ime = Ime::connect(conn.clone(), screen_number);

        let (wake_read, wake_write) = pipe_with(PipeFlags::NONBLOCK | PipeFlags::CLOEXEC)?;
        let source = X11Source::new(
            rustix::io::fcntl_dupfd_cloexec(conn.stream(), 0)?,
            rustix::io::fcntl_dupfd_cloexec(&wake_read, 0)?,
        );
        conn.flush()?;

        let mut backend = X11Backend {
            screen_number,
            root,
            root_depth,
            root_visual,
            config,
            extensions,
            randr_broken,
            xinerama_active,
            atoms,
            wm,
            net_wm_cm,
            errors: ErrorSlot::default(),
            error_callback: RefCell::new(None),
            content_scale,
            helper: helper.into_window(),
            hidden_cursor: hidden_cursor.into_cursor(),
            windows: HashMap::new(),
            monitors: IndexMap::new(),
            saver: ScreenSaver::default(),
            keyboard,
            selection: SelectionState::default(),
            dnd: DndState::default(),
            pointer: PointerState::default(),
            ime,
            deferred: VecDeque::new(),
            wake_read,
            wake_write: Arc::new(wake_write),
            hotplug: None,
            source,
            source_token: None,
            closed: false,
            conn,
        };
        backend.poll_monitors_inner()?;

        Ok(backend)
    }

    /// Closes the connection, cleaning up every resource.
    ///
    /// This also happens when the backend is dropped. A clipboard we own is offered to a clipboard
    /// manager first, and changed video modes are restored.
    pub fn shutdown(mut self) {
        self.teardown();
    }

    fn teardown(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        info!("Shutting down the X11 backend");

        if let Err(err) = self.push_to_clipboard_manager() {
            warn!("Failed to hand the clipboard over: {}", err);
        }
        if let Err(err) = self.restore_monitors() {
            warn!("Failed to restore monitors: {}", err);
        }

        let windows: Vec<Window> = self.windows.keys().copied().collect();
        for window in windows {
            if let Err(err) = self.destroy_window_inner(window) {
                warn!(window, "Failed to destroy window: {}", err);
            }
        }

        for cursor in self.pointer.cursors.drain() {
            let _ = self.conn.free_cursor(cursor);
        }
        if let Some(mut ime) = self.ime.take() {
            if let Err(err) = ime.close() {
                debug!("Failed to close the input method: {}", err);
            }
        }

        let _ = self.conn.free_cursor(self.hidden_cursor);
        let _ = self.conn.destroy_window(self.helper);
        let _ = self.conn.flush();
    }

    /// The underlying connection.
    pub fn connection(&self) -> &Arc<RustConnection> {
        &self.conn
    }

    /// The optional extensions the X server provides.
    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    /// EWMH hints supported by the running window manager.
    pub fn wm_support(&self) -> &WmSupport {
        &self.wm
    }

    /// The content scale derived from `Xft.dpi`.
    pub fn content_scale(&self) -> f64 {
        self.content_scale
    }

    /// The error code captured by the last error grab, `0` if the request succeeded.
    pub fn last_error_code(&self) -> u8 {
        self.errors.last_code()
    }

    /// Installs a callback receiving every error produced by an operation of this backend.
    ///
    /// The operation still returns the error.
    pub fn set_error_callback<F>(&mut self, callback: F)
    where
        F: FnMut(ErrorKind, &str) + 'static,
    {
        *self.error_callback.get_mut() = Some(Box::new(callback));
    }

    /// The scancode producing a key, if any.
    pub fn key_scancode(&self, key: Key) -> Option<u8> {
        self.keyboard.table.scancode(key)
    }

    /// The text the key with this scancode produces in the current layout.
    ///
    /// Scancodes outside of `0..=255` are rejected with [`X11Error::InvalidScancode`].
    pub fn scancode_name(&self, scancode: i32) -> Result<Option<String>, X11Error> {
        self.checked(|this| this.keyboard.scancode_name(scancode))
    }

    /// The layout table mapping scancodes to keys.
    pub fn key_table(&self) -> &KeyTable {
        &self.keyboard.table
    }

    pub(crate) fn screen(&self) -> &Screen {
        &self.conn.setup().roots[self.screen_number]
    }

    pub(crate) fn helper_window(&self) -> Window {
        self.helper
    }

    pub(crate) fn report(&self, err: &X11Error) {
        let kind = err.kind();
        warn!(%kind, "{}", err);
        if let Some(callback) = self.error_callback.borrow_mut().as_mut() {
            callback(kind, &err.to_string());
        }
    }

    /// Reports the error of a failed operation to the error callback.
    pub(crate) fn checked<'a, T>(
        &'a self,
        operation: impl FnOnce(&'a Self) -> Result<T, X11Error>,
    ) -> Result<T, X11Error> {
        let result = operation(self);
        if let Err(err) = &result {
            self.report(err);
        }
        result
    }

    pub(crate) fn checked_mut<T>(
        &mut self,
        operation: impl FnOnce(&mut Self) -> Result<T, X11Error>,
    ) -> Result<T, X11Error> {
        let result = operation(self);
        if let Err(err) = &result {
            self.report(err);
        }
        result
    }

    /// Re-reads the resource database, returning the new scale if it changed.
    pub(crate) fn reload_content_scale(&mut self) -> Result<Option<f64>, X11Error> {
        let resources = x11rb::resource_manager::new_from_default(&*self.conn)?;
        let scale = content_scale_of(&resources);
        if (scale - self.content_scale).abs() < f64::EPSILON {
            return Ok(None);
        }
        info!(scale, "Content scale changed");
        self.content_scale = scale;
        Ok(Some(scale))
    }

    pub(crate) fn report_protocol_error(&self, err: &x11rb::x11_utils::X11Error) {
        error!(
            code = err.error_code,
            major = err.major_opcode,
            minor = err.minor_opcode,
            "X11 protocol error: {:?}",
            err.error_kind
        );
        if let Some(callback) = self.error_callback.borrow_mut().as_mut() {
            callback(
                ErrorKind::PlatformError,
                &format!("X11 protocol error {:?}", err.error_kind),
            );
        }
    }
}

/// An invisible 1x1 cursor, set for hidden and disabled cursor modes.
fn create_hidden_cursor(conn: &RustConnection, root: Window) -> Result<CursorWrapper<&RustConnection>, X11Error> {
    let pixmap = PixmapWrapper::create_pixmap(conn, 1, root, 1, 1)?;
    let gc = GcontextWrapper::create_gc(conn, pixmap.pixmap(), &CreateGCAux::new().foreground(0))?;
    conn.poly_fill_rectangle(
        pixmap.pixmap(),
        gc.gcontext(),
        &[XRectangle {
            x: 0,
            y: 0,
            width: 1,
            height: 1,
        }],
    )?;

    Ok(CursorWrapper::create_cursor(
        conn,
        pixmap.pixmap(),
        pixmap.pixmap(),
        0,
        0,
        0,
        0,
        0,
        0,
        0,
        0,
    )?)
}

impl Drop for X11Backend {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl EventSource for X11Backend {
    type Event = X11Event;
    type Metadata = ();
    type Ret = ();
    type Error = X11Error;

    const NEEDS_EXTRA_LIFECYCLE_EVENTS: bool = true;

    fn process_events<F>(&mut self, readiness: Readiness, token: Token, mut callback: F) -> Result<PostAction, X11Error>
    where
        F: FnMut(Self::Event, &mut Self::Metadata) -> Self::Ret,
    {
        self.source.process_events(readiness, token, |_, _| {})?;

        // Replies read while waiting can pull events into the connection's queue, so always drain.
        self.poll_events(|event| callback(event, &mut ()))?;
        Ok(PostAction::Continue)
    }

    fn before_sleep(&mut self) -> calloop::Result<Option<(Readiness, Token)>> {
        let queued = self
            .conn
            .poll_for_queued_event()
            .map_err(|err| calloop::Error::OtherError(Box::new(err)))?;
        if let Some(event) = queued {
            self.deferred.push_back(event);
        }

        if self.deferred.is_empty() {
            return Ok(None);
        }
        Ok(self.source_token.map(|token| (Readiness::EMPTY, token)))
    }

    fn register(&mut self, poll: &mut Poll, token_factory: &mut TokenFactory) -> calloop::Result<()> {
        self.source_token = Some(token_factory.token());
        self.source.register(poll, token_factory)
    }

    fn reregister(&mut self, poll: &mut Poll, token_factory: &mut TokenFactory) -> calloop::Result<()> {
        self.source_token = Some(token_factory.token());
        self.source.reregister(poll, token_factory)
    }

    fn unregister(&mut self, poll: &mut Poll) -> calloop::Result<()> {
        self.source_token = None;
        self.source.unregister(poll)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_validation() {
        let pixels = [0u8; 16];
        assert!(Image {
            width: 2,
            height: 2,
            pixels: &pixels
        }
        .validate()
        .is_ok());

        let err = Image {
            width: 3,
            height: 2,
            pixels: &pixels,
        }
        .validate()
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidValue);

        assert!(Image {
            width: 0,
            height: 0,
            pixels: &[]
        }
        .validate()
        .is_err());
    }

    #[test]
    fn image_to_argb() {
        let pixels = [0x11, 0x22, 0x33, 0x44, 0xff, 0x00, 0x00, 0x80];
        let image = Image {
            width: 2,
            height: 1,
            pixels: &pixels,
        };
        assert_eq!(image.argb().collect::<Vec<_>>(), vec![0x44112233, 0x80ff0000]);
    }

    #[test]
    fn config_builder() {
        let config = BackendConfig::new()
            .display(":1")
            .selection_timeout(Duration::from_millis(250))
            .max_selection_bytes(1024)
            .class("demo", "Demo");

        assert_eq!(config.display.as_deref(), Some(":1"));
        assert_eq!(config.selection_timeout, Duration::from_millis(250));
        assert_eq!(config.max_selection_bytes, 1024);
        assert_eq!(config.instance_name, "demo");
        assert_eq!(config.class_name, "Demo");

        let config = BackendConfig::default();
        assert_eq!(config.selection_timeout, Duration::from_secs(5));
        assert_eq!(config.max_selection_bytes, 64 * 1024 * 1024);
    }

    #[test]
    fn dpi_resource_scale() {
        let db = Database::new_from_data(b"Xft.dpi: 144\n");
        assert_eq!(content_scale_of(&db), 1.5);

        let db = Database::new_from_data(b"Xcursor.size: 24\n");
        assert_eq!(content_scale_of(&db), 1.0);

        let db = Database::new_from_data(b"Xft.dpi: nonsense\n");
        assert_eq!(content_scale_of(&db), 1.0);
    }
}
