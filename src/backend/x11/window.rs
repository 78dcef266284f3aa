/*
A note for future contributors and maintainers:

When editing this file, grab the nearest copy of the ICCCM. Following the ICCCM is paramount to
X11 clients behaving properly and preventing scenarios such as windows not being resized in tiling
window managers.

Pay particular attention to "Section 4: Client to Window Manager Communication"

A link to the ICCCM Section 4: https://tronche.com/gui/x/icccm/sec-4.html
*/

//! Window creation, properties, geometry and state.

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use smallvec::SmallVec;
use tracing::{debug, info, trace, warn};
use x11rb::{
    connection::Connection,
    properties::{AspectRatio, WmHints, WmHintsState, WmSizeHints, WmSizeHintsSpecification},
    protocol::{
        shape::{self, ConnectionExt as _},
        xproto::{
            Atom, AtomEnum, ChangeWindowAttributesAux, ClientMessageEvent, ClipOrdering, ColormapAlloc,
            ConfigureWindowAux, ConnectionExt as _, CreateWindowAux, Depth, EventMask, Gravity, InputFocus,
            MapState, PropMode, StackMode, UnmapNotifyEvent, VisualClass, Visualid, Window,
            WindowClass, UNMAP_NOTIFY_EVENT,
        },
        Event,
    },
    wrapper::ConnectionExt as _,
    CURRENT_TIME, NONE,
};

use super::{
    cursor::CursorMode, dnd::DND_VERSION, input::KeyTracker, selection::encode_latin1, CreateWindowError, CursorId, Image,
    MonitorId, VideoMode, WindowId, WmSupport, X11Backend, X11Error,
};
use crate::utils::{Logical, Point, Rectangle, Size};

// _NET_WM_STATE actions
const NET_WM_STATE_REMOVE: u32 = 0;
const NET_WM_STATE_ADD: u32 = 1;

// WM_STATE values
pub(crate) const NORMAL_STATE: u32 = 1;
pub(crate) const ICONIC_STATE: u32 = 3;

/// Whether a `_NET_WM_STATE` value marks the window maximized in either direction.
pub(crate) fn is_maximized(net_state: &[Atom], wm: &WmSupport) -> bool {
    wm.state_maximized()
        .is_some_and(|(_, vert, horz)| net_state.iter().any(|&atom| atom == vert || atom == horz))
}

/// How long `show` waits for the window to become visible.
const VISIBILITY_TIMEOUT: Duration = Duration::from_millis(100);
/// How long `frame_size` waits for the window manager to publish the frame extents.
const FRAME_EXTENTS_TIMEOUT: Duration = Duration::from_millis(500);

/// How a fullscreen window got there.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FullscreenMode {
    /// The window manager honors `_NET_WM_STATE_FULLSCREEN`.
    State,
    /// No cooperative window manager, the window bypasses it and covers the monitor itself.
    OverrideRedirect,
}

/// State of a window, as derived from the X server and the window manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WindowState {
    /// Not mapped, nor iconified.
    Unmapped,
    /// Iconified by the window manager.
    Hidden,
    /// Mapped and viewable.
    Visible,
    /// Maximized in both directions or one of them.
    Maximized,
    /// Covering a monitor.
    Fullscreen(FullscreenMode),
}

/// Derives the window state from a set of fresh observations.
pub(crate) fn derive_state(
    map_state: MapState,
    iconic: bool,
    maximized: bool,
    fullscreen: Option<FullscreenMode>,
) -> WindowState {
    if iconic {
        return WindowState::Hidden;
    }
    if map_state == MapState::UNMAPPED {
        return WindowState::Unmapped;
    }
    if let Some(mode) = fullscreen {
        return WindowState::Fullscreen(mode);
    }
    if maximized {
        return WindowState::Maximized;
    }
    WindowState::Visible
}

/// A cross-thread view of the geometry of a window.
///
/// The event loop updates it on every `ConfigureNotify`, so it can be read from other threads
/// without a round trip to the X server.
#[derive(Debug, Clone)]
pub struct GeometryHandle(Arc<Mutex<Rectangle<i32, Logical>>>);

impl GeometryHandle {
    pub(crate) fn new(geometry: Rectangle<i32, Logical>) -> GeometryHandle {
        GeometryHandle(Arc::new(Mutex::new(geometry)))
    }

    /// Position and size of the content area, relative to the root window.
    pub fn geometry(&self) -> Rectangle<i32, Logical> {
        *self.0.lock().unwrap()
    }

    /// Position of the content area, relative to the root window.
    pub fn position(&self) -> Point<i32, Logical> {
        self.geometry().loc
    }

    /// Size of the content area.
    pub fn size(&self) -> Size<i32, Logical> {
        self.geometry().size
    }

    /// Stores a new size, returning whether it differs.
    pub(crate) fn set_size(&self, size: Size<i32, Logical>) -> bool {
        let mut geometry = self.0.lock().unwrap();
        let changed = geometry.size != size;
        geometry.size = size;
        changed
    }

    /// Stores a new position, returning whether it differs.
    pub(crate) fn set_position(&self, position: Point<i32, Logical>) -> bool {
        let mut geometry = self.0.lock().unwrap();
        let changed = geometry.loc != position;
        geometry.loc = position;
        changed
    }
}

/// Width of the window manager frame around the content area, on each side.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FrameExtents {
    #[allow(missing_docs)]
    pub left: i32,
    #[allow(missing_docs)]
    pub top: i32,
    #[allow(missing_docs)]
    pub right: i32,
    #[allow(missing_docs)]
    pub bottom: i32,
}

/// Size constraints communicated through `WM_NORMAL_HINTS`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SizeLimits {
    pub min: Option<Size<i32, Logical>>,
    pub max: Option<Size<i32, Logical>>,
    /// Numerator and denominator.
    pub aspect: Option<(i32, i32)>,
}

/// Builds the `WM_NORMAL_HINTS` of a window.
///
/// Fullscreen windows drop every constraint, non-resizable windows pin their current size.
pub(crate) fn normal_hints(
    limits: &SizeLimits,
    resizable: bool,
    fullscreen: bool,
    size: Size<i32, Logical>,
    position: Option<Point<i32, Logical>>,
) -> WmSizeHints {
    let mut hints = WmSizeHints::new();

    if !fullscreen {
        if resizable {
            hints.min_size = limits.min.map(|min| (min.w, min.h));
            hints.max_size = limits.max.map(|max| (max.w, max.h));
            hints.aspect = limits.aspect.map(|(numerator, denominator)| {
                let ratio = AspectRatio::new(numerator, denominator);
                (ratio, ratio)
            });
        } else {
            hints.min_size = Some((size.w, size.h));
            hints.max_size = Some((size.w, size.h));
        }
    }

    hints.position = position.map(|pos| (WmSizeHintsSpecification::ProgramSpecified, pos.x, pos.y));
    hints.win_gravity = Some(Gravity::STATIC);
    hints
}

/// Finds the depth and visual for a new window.
pub(crate) fn choose_visual(
    depths: &[Depth],
    root_depth: u8,
    root_visual: Visualid,
    transparent: bool,
) -> Result<(u8, Visualid), CreateWindowError> {
    if transparent {
        let argb = depths
            .iter()
            .filter(|depth| depth.depth == 32)
            .flat_map(|depth| depth.visuals.iter())
            // little endian ARGB
            .filter(|visual| visual.red_mask == 0xff0000)
            .find(|visual| visual.class == VisualClass::TRUE_COLOR);
        if let Some(visual) = argb {
            return Ok((32, visual.visual_id));
        }
        debug!("No 32-bit visual available, creating an opaque window");
    }

    depths
        .iter()
        .filter(|depth| depth.depth == root_depth)
        .flat_map(|depth| depth.visuals.iter())
        .any(|visual| visual.visual_id == root_visual)
        .then_some((root_depth, root_visual))
        .ok_or(CreateWindowError::NoVisual)
}

/// Window configuration used by [`X11Backend::create_window`].
#[derive(Debug, Clone)]
pub struct WindowBuilder {
    title: String,
    size: Size<i32, Logical>,
    position: Option<Point<i32, Logical>>,
    limits: SizeLimits,
    resizable: bool,
    decorated: bool,
    floating: bool,
    maximized: bool,
    visible: bool,
    focused: bool,
    focus_on_show: bool,
    mouse_passthrough: bool,
    transparent: bool,
    class: Option<(String, String)>,
    fullscreen: Option<MonitorId>,
    borderless: bool,
}

impl Default for WindowBuilder {
    fn default() -> Self {
        WindowBuilder {
            title: String::new(),
            size: (640, 480).into(),
            position: None,
            limits: SizeLimits::default(),
            resizable: true,
            decorated: true,
            floating: false,
            maximized: false,
            visible: true,
            focused: true,
            focus_on_show: true,
            mouse_passthrough: false,
            transparent: false,
            class: None,
            fullscreen: None,
            borderless: false,
        }
    }
}

impl WindowBuilder {
    /// A visible, decorated and resizable 640x480 window.
    pub fn new() -> WindowBuilder {
        WindowBuilder::default()
    }

    /// Title of the window.
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Size of the content area.
    pub fn size(mut self, width: i32, height: i32) -> Self {
        self.size = (width, height).into();
        self
    }

    /// Initial position, left to the window manager if unset.
    pub fn position(mut self, x: i32, y: i32) -> Self {
        self.position = Some((x, y).into());
        self
    }

    /// Minimum and maximum size of the content area.
    pub fn size_limits(mut self, min: Option<Size<i32, Logical>>, max: Option<Size<i32, Logical>>) -> Self {
        self.limits.min = min;
        self.limits.max = max;
        self
    }

    /// Fixed aspect ratio of the content area.
    pub fn aspect_ratio(mut self, numerator: i32, denominator: i32) -> Self {
        self.limits.aspect = Some((numerator, denominator));
        self
    }

    /// Whether the user may resize the window.
    pub fn resizable(mut self, resizable: bool) -> Self {
        self.resizable = resizable;
        self
    }

    /// Whether the window manager should draw decorations.
    pub fn decorated(mut self, decorated: bool) -> Self {
        self.decorated = decorated;
        self
    }

    /// Whether the window stays above others.
    pub fn floating(mut self, floating: bool) -> Self {
        self.floating = floating;
        self
    }

    /// Whether the window starts maximized.
    pub fn maximized(mut self, maximized: bool) -> Self {
        self.maximized = maximized;
        self
    }

    /// Whether the window is shown on creation.
    pub fn visible(mut self, visible: bool) -> Self {
        self.visible = visible;
        self
    }

    /// Whether the window is focused on creation.
    pub fn focused(mut self, focused: bool) -> Self {
        self.focused = focused;
        self
    }

    /// Whether [`X11Backend::show`] also focuses the window.
    pub fn focus_on_show(mut self, focus_on_show: bool) -> Self {
        self.focus_on_show = focus_on_show;
        self
    }

    /// Whether pointer input passes through to the windows below.
    pub fn mouse_passthrough(mut self, passthrough: bool) -> Self {
        self.mouse_passthrough = passthrough;
        self
    }

    /// Whether to use a visual with an alpha channel, if the server has one.
    pub fn transparent(mut self, transparent: bool) -> Self {
        self.transparent = transparent;
        self
    }

    /// `WM_CLASS` of the window, overriding the backend default.
    pub fn class(mut self, instance: impl Into<String>, class: impl Into<String>) -> Self {
        self.class = Some((instance.into(), class.into()));
        self
    }

    /// Makes the window fullscreen on `monitor` on creation.
    pub fn fullscreen(mut self, monitor: MonitorId, borderless: bool) -> Self {
        self.fullscreen = Some(monitor);
        self.borderless = borderless;
        self
    }
}

/// A fullscreen window and what to go back to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Fullscreen {
    pub monitor: MonitorId,
    pub borderless: bool,
    pub mode: FullscreenMode,
    /// Geometry before entering fullscreen.
    pub windowed: Rectangle<i32, Logical>,
}

/// Backend side state of a window, stored in the id map.
#[derive(Debug)]
pub(crate) struct WindowRecord {
    pub id: Window,
    pub colormap: u32,
    pub override_redirect: bool,
    pub resizable: bool,
    pub decorated: bool,
    pub floating: bool,
    pub focus_on_show: bool,
    pub mouse_passthrough: bool,
    pub limits: SizeLimits,
    pub geometry: GeometryHandle,
    /// Geometry recorded by `hide`, restored by the next `show`.
    pub hidden_geometry: Option<Rectangle<i32, Logical>>,
    pub fullscreen: Option<Fullscreen>,
    /// Last reported states.
    pub maximized: bool,
    pub minimized: bool,
    pub keys: KeyTracker,
    pub cursor: Option<CursorId>,
    pub cursor_mode: CursorMode,
    pub raw_motion: bool,
    pub last_cursor_position: Point<i32, Logical>,
    /// Position the pointer was last warped to, motion to it is ignored.
    pub warp_target: Option<Point<i32, Logical>>,
    pub virtual_cursor_position: Point<f64, Logical>,
}

impl WindowRecord {
    fn new(id: Window, colormap: u32, builder: &WindowBuilder) -> WindowRecord {
        WindowRecord {
            id,
            colormap,
            override_redirect: false,
            resizable: builder.resizable,
            decorated: builder.decorated,
            floating: builder.floating,
            focus_on_show: builder.focus_on_show,
            mouse_passthrough: builder.mouse_passthrough,
            limits: builder.limits,
            geometry: GeometryHandle::new(Rectangle::new(builder.position.unwrap_or_default(), builder.size)),
            hidden_geometry: None,
            fullscreen: None,
            maximized: builder.maximized,
            minimized: false,
            keys: KeyTracker::default(),
            cursor: None,
            cursor_mode: CursorMode::Normal,
            raw_motion: false,
            last_cursor_position: Point::default(),
            warp_target: None,
            virtual_cursor_position: Point::default(),
        }
    }
}

fn validate_size(size: Size<i32, Logical>) -> Result<(), X11Error> {
    if size.w <= 0 || size.h <= 0 {
        return Err(X11Error::InvalidValue("window size must be positive"));
    }
    if size.w > i32::from(u16::MAX) || size.h > i32::from(u16::MAX) {
        return Err(X11Error::InvalidValue("window size exceeds the X11 limit"));
    }
    Ok(())
}

fn validate_limits(limits: &SizeLimits) -> Result<(), X11Error> {
    if let Some(min) = limits.min {
        validate_size(min)?;
    }
    if let Some(max) = limits.max {
        validate_size(max)?;
    }
    if let (Some(min), Some(max)) = (limits.min, limits.max) {
        if min.w > max.w || min.h > max.h {
            return Err(X11Error::InvalidValue("minimum size exceeds maximum size"));
        }
    }
    if let Some((numerator, denominator)) = limits.aspect {
        if numerator <= 0 || denominator <= 0 {
            return Err(X11Error::InvalidValue("aspect ratio must be positive"));
        }
    }
    Ok(())
}

/// Packs images into the cardinals of `_NET_WM_ICON`.
pub(crate) fn pack_icons(images: &[Image<'_>]) -> Result<Vec<u32>, X11Error> {
    let mut data = Vec::with_capacity(images.iter().map(|image| 2 + image.pixels.len() / 4).sum());
    for image in images {
        image.validate()?;
        data.push(image.width);
        data.push(image.height);
        data.extend(image.argb());
    }
    Ok(data)
}

impl X11Backend {
    pub(crate) fn window(&self, id: WindowId) -> Result<&WindowRecord, X11Error> {
        self.windows.get(&id.0).ok_or(X11Error::InvalidWindow(id.0))
    }

    pub(crate) fn window_mut(&mut self, id: WindowId) -> Result<&mut WindowRecord, X11Error> {
        self.windows.get_mut(&id.0).ok_or(X11Error::InvalidWindow(id.0))
    }

    /// Creates a new top level window.
    #[profiling::function]
    pub fn create_window(&mut self, builder: WindowBuilder) -> Result<WindowId, X11Error> {
        self.checked_mut(|this| this.create_window_inner(builder))
    }

    fn create_window_inner(&mut self, builder: WindowBuilder) -> Result<WindowId, X11Error> {
        validate_size(builder.size)?;
        validate_limits(&builder.limits)?;

        let conn = self.conn.clone();
        let screen = self.screen();
        let (depth, visual) = choose_visual(&screen.allowed_depths, self.root_depth, self.root_visual, builder.transparent)?;
        let black_pixel = screen.black_pixel;

        let colormap = conn.generate_id()?;
        conn.create_colormap(ColormapAlloc::NONE, colormap, self.root, visual)?;
        let colormap = scopeguard::guard(colormap, |colormap| {
            let _ = conn.free_colormap(colormap);
        });

        // The event mask never includes `EventMask::RESIZE_REDIRECT`, we are not a window manager and
        // resizes are observed through ConfigureNotify.
        let event_mask = EventMask::STRUCTURE_NOTIFY
            | EventMask::KEY_PRESS
            | EventMask::KEY_RELEASE
            | EventMask::BUTTON_PRESS
            | EventMask::BUTTON_RELEASE
            | EventMask::POINTER_MOTION
            | EventMask::EXPOSURE
            | EventMask::FOCUS_CHANGE
            | EventMask::VISIBILITY_CHANGE
            | EventMask::ENTER_WINDOW
            | EventMask::LEAVE_WINDOW
            | EventMask::PROPERTY_CHANGE;

        // Border pixel and color map need to be set if our depth may differ from the root depth.
        let aux = CreateWindowAux::new()
            .event_mask(event_mask)
            .border_pixel(black_pixel)
            .colormap(*colormap);

        let position = builder.position.unwrap_or_default().clamp_to_i16();
        let window = conn.generate_id()?;
        {
            let grab = self.errors.grab();
            let cookie = conn.create_window(
                depth,
                window,
                self.root,
                position.x,
                position.y,
                builder.size.w as u16,
                builder.size.h as u16,
                0,
                WindowClass::INPUT_OUTPUT,
                visual,
                &aux,
            )?;
            if let Err(err) = grab.check(cookie) {
                return Err(match grab.code() {
                    0 => err.into(),
                    code => CreateWindowError::Refused(code).into(),
                });
            }
        }
        let window_guard = scopeguard::guard(window, |window| {
            let _ = conn.destroy_window(window);
        });

        let record = WindowRecord::new(window, *colormap, &builder);
        self.setup_window_properties(&record, &builder)?;

        let window = scopeguard::ScopeGuard::into_inner(window_guard);
        let colormap = scopeguard::ScopeGuard::into_inner(colormap);
        self.windows.insert(window, record);
        info!(window, colormap, depth, "Created window");
        self.attach_input_context(window);

        let id = WindowId(window);
        if let Err(err) = self.finish_window_setup(id, &builder) {
            let _ = self.destroy_window_inner(window);
            return Err(err);
        }
        Ok(id)
    }

    /// Properties the window manager reads when the window is mapped for the first time.
    fn setup_window_properties(&self, record: &WindowRecord, builder: &WindowBuilder) -> Result<(), X11Error> {
        let conn = &*self.conn;
        let window = record.id;
        let atoms = &self.atoms;

        let mut states: SmallVec<[Atom; 3]> = SmallVec::new();
        if builder.floating {
            states.extend(self.wm.wm_state_above);
        }
        if builder.maximized {
            if let Some((_, vert, horz)) = self.wm.state_maximized() {
                states.push(vert);
                states.push(horz);
            }
        }
        if !states.is_empty() && self.wm.wm_state.is_some() {
            conn.change_property32(PropMode::REPLACE, window, atoms._NET_WM_STATE, AtomEnum::ATOM, &states)?;
        }

        // Enable WM_DELETE_WINDOW so our client is not disconnected upon our toplevel window being destroyed.
        conn.change_property32(
            PropMode::REPLACE,
            window,
            atoms.WM_PROTOCOLS,
            AtomEnum::ATOM,
            &[atoms.WM_DELETE_WINDOW, atoms._NET_WM_PING],
        )?;

        let pid = rustix::process::getpid().as_raw_nonzero().get() as u32;
        conn.change_property32(PropMode::REPLACE, window, atoms._NET_WM_PID, AtomEnum::CARDINAL, &[pid])?;
        conn.change_property32(
            PropMode::REPLACE,
            window,
            atoms._NET_WM_WINDOW_TYPE,
            AtomEnum::ATOM,
            &[atoms._NET_WM_WINDOW_TYPE_NORMAL],
        )?;

        let mut wm_hints = WmHints::new();
        wm_hints.input = Some(true);
        wm_hints.initial_state = Some(WmHintsState::Normal);
        wm_hints.set(conn, window)?;

        normal_hints(&record.limits, record.resizable, false, builder.size, builder.position)
            .set_normal_hints(conn, window)?;

        // WM class cannot be safely changed later.
        let (instance, class) = match &builder.class {
            Some((instance, class)) => (instance.as_str(), class.as_str()),
            None => (self.config.instance_name.as_str(), self.config.class_name.as_str()),
        };
        let mut wm_class = Vec::with_capacity(instance.len() + class.len() + 2);
        wm_class.extend_from_slice(instance.as_bytes());
        wm_class.push(0);
        wm_class.extend_from_slice(class.as_bytes());
        wm_class.push(0);
        conn.change_property8(PropMode::REPLACE, window, AtomEnum::WM_CLASS, AtomEnum::STRING, &wm_class)?;

        conn.change_property32(PropMode::REPLACE, window, atoms.XdndAware, AtomEnum::ATOM, &[DND_VERSION])?;

        self.write_title(window, &builder.title)?;
        self.write_motif_hints(window, builder.decorated)?;
        if builder.mouse_passthrough {
            self.write_input_shape(window, true)?;
        }
        conn.flush()?;
        Ok(())
    }

    fn finish_window_setup(&mut self, id: WindowId, builder: &WindowBuilder) -> Result<(), X11Error> {
        if let Some(monitor) = builder.fullscreen {
            self.set_fullscreen_inner(id, Some(monitor), builder.borderless)?;
        } else if builder.visible {
            self.show_inner(id)?;
            if builder.focused {
                self.focus_inner(id)?;
            }
        }
        self.conn.flush()?;
        Ok(())
    }

    /// Destroys a window, releasing its cursor grab and the monitor it is fullscreen on.
    pub fn destroy_window(&mut self, id: WindowId) -> Result<(), X11Error> {
        self.checked_mut(|this| this.destroy_window_inner(id.0))
    }

    pub(crate) fn destroy_window_inner(&mut self, window: Window) -> Result<(), X11Error> {
        if !self.windows.contains_key(&window) {
            return Err(X11Error::InvalidWindow(window));
        }

        if let Err(err) = self.release_pointer(window) {
            warn!(window, "Failed to release the pointer: {}", err);
        }
        if let Err(err) = self.release_monitor(window) {
            warn!(window, "Failed to release the monitor: {}", err);
        }

        self.detach_input_context(window);

        // Events still in flight for this id are dropped from here on.
        let Some(record) = self.windows.remove(&window) else {
            return Err(X11Error::InvalidWindow(window));
        };

        self.conn.unmap_window(window)?;
        self.conn.destroy_window(window)?;
        self.conn.free_colormap(record.colormap)?;
        self.conn.flush()?;
        info!(window, "Destroyed window");
        Ok(())
    }

    /// Sets the title of the window.
    pub fn set_title(&self, id: WindowId, title: &str) -> Result<(), X11Error> {
        self.checked(|this| {
            this.window(id)?;
            this.write_title(id.0, title)?;
            this.conn.flush()?;
            Ok(())
        })
    }

    fn write_title(&self, window: Window, title: &str) -> Result<(), X11Error> {
        // _NET_WM_NAME should be preferred by window managers, but set both properties.
        self.conn.change_property8(
            PropMode::REPLACE,
            window,
            AtomEnum::WM_NAME,
            AtomEnum::STRING,
            &encode_latin1(title),
        )?;
        for property in [self.atoms._NET_WM_NAME, self.atoms._NET_WM_ICON_NAME] {
            self.conn.change_property8(
                PropMode::REPLACE,
                window,
                property,
                self.atoms.UTF8_STRING,
                title.as_bytes(),
            )?;
        }
        Ok(())
    }

    /// Sets the icon candidates of the window, `None` reverts to the default icon.
    pub fn set_icon(&self, id: WindowId, images: Option<&[Image<'_>]>) -> Result<(), X11Error> {
        self.checked(|this| {
            this.window(id)?;
            match images {
                Some(images) if !images.is_empty() => {
                    let data = pack_icons(images)?;
                    this.conn.change_property32(
                        PropMode::REPLACE,
                        id.0,
                        this.atoms._NET_WM_ICON,
                        AtomEnum::CARDINAL,
                        &data,
                    )?;
                }
                _ => {
                    this.conn.delete_property(id.0, this.atoms._NET_WM_ICON)?;
                }
            }
            this.conn.flush()?;
            Ok(())
        })
    }

    /// Asks the window manager to draw decorations or not.
    pub fn set_decorated(&mut self, id: WindowId, decorated: bool) -> Result<(), X11Error> {
        self.checked_mut(|this| {
            this.window_mut(id)?.decorated = decorated;
            this.write_motif_hints(id.0, decorated)?;
            this.conn.flush()?;
            Ok(())
        })
    }

    fn write_motif_hints(&self, window: Window, decorated: bool) -> Result<(), X11Error> {
        const MWM_HINTS_DECORATIONS: u32 = 1 << 1;
        self.conn.change_property32(
            PropMode::REPLACE,
            window,
            self.atoms._MOTIF_WM_HINTS,
            self.atoms._MOTIF_WM_HINTS,
            &[MWM_HINTS_DECORATIONS, 0, u32::from(decorated), 0, 0],
        )?;
        Ok(())
    }

    /// Keeps the window above others, if the window manager supports it.
    pub fn set_floating(&mut self, id: WindowId, floating: bool) -> Result<(), X11Error> {
        self.checked_mut(|this| {
            this.window_mut(id)?.floating = floating;
            let Some(above) = this.wm.wm_state_above.filter(|_| this.wm.wm_state.is_some()) else {
                debug!("The window manager does not support _NET_WM_STATE_ABOVE");
                return Ok(());
            };
            this.update_net_wm_state(id.0, floating, &[above])?;
            this.conn.flush()?;
            Ok(())
        })
    }

    /// Sets the opacity of the whole window, between `0.0` and `1.0`.
    pub fn set_opacity(&self, id: WindowId, opacity: f32) -> Result<(), X11Error> {
        self.checked(|this| {
            this.window(id)?;
            if !(0.0..=1.0).contains(&opacity) {
                return Err(X11Error::InvalidValue("opacity must be within 0.0 and 1.0"));
            }
            let value = (f64::from(u32::MAX) * f64::from(opacity)) as u32;
            this.conn.change_property32(
                PropMode::REPLACE,
                id.0,
                this.atoms._NET_WM_WINDOW_OPACITY,
                AtomEnum::CARDINAL,
                &[value],
            )?;
            this.conn.flush()?;
            Ok(())
        })
    }

    /// The opacity of the window, always `1.0` without a compositing manager.
    pub fn opacity(&self, id: WindowId) -> Result<f32, X11Error> {
        self.checked(|this| {
            this.window(id)?;
            let owner = this.conn.get_selection_owner(this.net_wm_cm)?.reply()?.owner;
            if owner == NONE {
                return Ok(1.0);
            }
            let value = this
                .property32(id.0, this.atoms._NET_WM_WINDOW_OPACITY, AtomEnum::CARDINAL.into())?
                .first()
                .copied();
            Ok(value.map_or(1.0, |value| (f64::from(value) / f64::from(u32::MAX)) as f32))
        })
    }

    /// Whether the user may resize the window.
    pub fn set_resizable(&mut self, id: WindowId, resizable: bool) -> Result<(), X11Error> {
        self.checked_mut(|this| {
            this.window_mut(id)?.resizable = resizable;
            this.update_normal_hints(id)
        })
    }

    /// Limits the size of the content area.
    pub fn set_size_limits(
        &mut self,
        id: WindowId,
        min: Option<Size<i32, Logical>>,
        max: Option<Size<i32, Logical>>,
    ) -> Result<(), X11Error> {
        self.checked_mut(|this| {
            let limits = SizeLimits {
                min,
                max,
                ..this.window(id)?.limits
            };
            validate_limits(&limits)?;
            this.window_mut(id)?.limits = limits;
            this.update_normal_hints(id)
        })
    }

    /// Constrains the content area to `numerator:denominator`, or removes the constraint.
    pub fn set_aspect_ratio(&mut self, id: WindowId, ratio: Option<(i32, i32)>) -> Result<(), X11Error> {
        self.checked_mut(|this| {
            let limits = SizeLimits {
                aspect: ratio,
                ..this.window(id)?.limits
            };
            validate_limits(&limits)?;
            this.window_mut(id)?.limits = limits;
            this.update_normal_hints(id)
        })
    }

    fn update_normal_hints(&self, id: WindowId) -> Result<(), X11Error> {
        let record = self.window(id)?;
        let size = self.query_size(id.0)?;
        normal_hints(&record.limits, record.resizable, record.fullscreen.is_some(), size, None)
            .set_normal_hints(&*self.conn, id.0)?;
        self.conn.flush()?;
        Ok(())
    }

    /// Lets pointer input pass through the window, requires the Shape extension.
    pub fn set_mouse_passthrough(&mut self, id: WindowId, passthrough: bool) -> Result<(), X11Error> {
        self.checked_mut(|this| {
            this.window_mut(id)?.mouse_passthrough = passthrough;
            this.write_input_shape(id.0, passthrough)?;
            this.conn.flush()?;
            Ok(())
        })
    }

    fn write_input_shape(&self, window: Window, passthrough: bool) -> Result<(), X11Error> {
        if self.extensions.shape.is_none() {
            debug!("Shape extension missing, mouse passthrough unavailable");
            return Ok(());
        }
        if passthrough {
            // an empty input region
            self.conn.shape_rectangles(
                shape::SO::SET,
                shape::SK::INPUT,
                ClipOrdering::UNSORTED,
                window,
                0,
                0,
                &[],
            )?;
        } else {
            self.conn
                .shape_mask(shape::SO::SET, shape::SK::INPUT, window, 0, 0, NONE)?;
        }
        Ok(())
    }

    /// Position of the content area, relative to the root window.
    pub fn position(&self, id: WindowId) -> Result<Point<i32, Logical>, X11Error> {
        self.checked(|this| {
            this.window(id)?;
            this.query_position(id.0)
        })
    }

    pub(crate) fn query_position(&self, window: Window) -> Result<Point<i32, Logical>, X11Error> {
        let reply = self.conn.translate_coordinates(window, self.root, 0, 0)?.reply()?;
        Ok((i32::from(reply.dst_x), i32::from(reply.dst_y)).into())
    }

    /// Moves the content area of the window.
    pub fn set_position(&self, id: WindowId, position: Point<i32, Logical>) -> Result<(), X11Error> {
        self.checked(|this| {
            this.window(id)?;
            this.conn.configure_window(
                id.0,
                &ConfigureWindowAux::new().x(position.x).y(position.y),
            )?;
            this.conn.flush()?;
            Ok(())
        })
    }

    /// Size of the content area.
    pub fn size(&self, id: WindowId) -> Result<Size<i32, Logical>, X11Error> {
        self.checked(|this| {
            this.window(id)?;
            this.query_size(id.0)
        })
    }

    pub(crate) fn query_size(&self, window: Window) -> Result<Size<i32, Logical>, X11Error> {
        let reply = self.conn.get_geometry(window)?.reply()?;
        Ok((i32::from(reply.width), i32::from(reply.height)).into())
    }

    /// Resizes the content area.
    ///
    /// A fullscreen window with a video mode switches to the mode closest to the new size instead.
    pub fn set_size(&mut self, id: WindowId, size: Size<i32, Logical>) -> Result<(), X11Error> {
        self.checked_mut(|this| {
            validate_size(size)?;
            let record = this.window(id)?;

            if let Some(fullscreen) = record.fullscreen {
                if !fullscreen.borderless {
                    let mode = VideoMode {
                        width: size.w as u32,
                        height: size.h as u32,
                        ..VideoMode::default()
                    };
                    this.acquire_monitor(id.0, fullscreen.monitor, Some(mode))?;
                    let geometry = this.monitor_geometry(fullscreen.monitor)?;
                    this.configure_geometry(id.0, geometry)?;
                }
                return Ok(());
            }

            if !record.resizable {
                normal_hints(&record.limits, false, false, size, None).set_normal_hints(&*this.conn, id.0)?;
            }
            this.conn.configure_window(
                id.0,
                &ConfigureWindowAux::new().width(size.w as u32).height(size.h as u32),
            )?;
            this.conn.flush()?;
            Ok(())
        })
    }

    fn configure_geometry(&self, window: Window, geometry: Rectangle<i32, Logical>) -> Result<(), X11Error> {
        self.conn.configure_window(
            window,
            &ConfigureWindowAux::new()
                .x(geometry.loc.x)
                .y(geometry.loc.y)
                .width(geometry.size.w.max(1) as u32)
                .height(geometry.size.h.max(1) as u32),
        )?;
        self.conn.flush()?;
        Ok(())
    }

    /// Size of the frame the window manager draws around the window.
    ///
    /// Hidden windows ask the window manager for an estimate, waiting for half a second at most.
    pub fn frame_size(&mut self, id: WindowId) -> Result<FrameExtents, X11Error> {
        self.checked_mut(|this| {
            let record = this.window(id)?;
            let Some(frame_extents) = this.wm.frame_extents else {
                return Ok(FrameExtents::default());
            };
            if !record.decorated || record.fullscreen.is_some() {
                return Ok(FrameExtents::default());
            }

            if !this.query_visible(id.0)? {
                if let Some(request) = this.wm.request_frame_extents {
                    this.send_wm_message(id.0, request, [0; 5])?;
                    let window = id.0;
                    let arrived = this.next_matching_event(
                        |event| {
                            matches!(event, Event::PropertyNotify(notify)
                                if notify.window == window && notify.atom == frame_extents)
                        },
                        FRAME_EXTENTS_TIMEOUT,
                    )?;
                    if arrived.is_none() {
                        warn!(window, "The window manager did not report frame extents in time");
                        return Ok(FrameExtents::default());
                    }
                }
            }

            let extents = this.property32(id.0, frame_extents, AtomEnum::CARDINAL.into())?;
            match extents[..] {
                [left, right, top, bottom, ..] => Ok(FrameExtents {
                    left: left as i32,
                    top: top as i32,
                    right: right as i32,
                    bottom: bottom as i32,
                }),
                _ => Ok(FrameExtents::default()),
            }
        })
    }

    /// Maps the window and waits briefly for it to become visible.
    pub fn show(&mut self, id: WindowId) -> Result<(), X11Error> {
        self.checked_mut(|this| {
            this.show_inner(id)?;
            if this.window(id)?.focus_on_show {
                this.focus_inner(id)?;
            }
            this.conn.flush()?;
            Ok(())
        })
    }

    fn show_inner(&mut self, id: WindowId) -> Result<(), X11Error> {
        self.window(id)?;
        if self.query_visible(id.0)? {
            return Ok(());
        }

        self.conn.map_window(id.0)?;
        let window = id.0;
        let visible = self.next_matching_event(
            |event| matches!(event, Event::VisibilityNotify(notify) if notify.window == window),
            VISIBILITY_TIMEOUT,
        )?;
        if visible.is_none() {
            trace!(window, "No VisibilityNotify after mapping");
        }

        // window managers are free to place a remapped window anywhere
        if let Some(geometry) = self.window_mut(id)?.hidden_geometry.take() {
            self.configure_geometry(window, geometry)?;
        }
        Ok(())
    }

    /// Unmaps the window, remembering its position and size for the next [`X11Backend::show`].
    pub fn hide(&mut self, id: WindowId) -> Result<(), X11Error> {
        self.checked_mut(|this| {
            this.window(id)?;
            if !this.query_visible(id.0)? {
                return Ok(());
            }

            let geometry = Rectangle {
                loc: this.query_position(id.0)?,
                size: this.query_size(id.0)?,
            };
            this.window_mut(id)?.hidden_geometry = Some(geometry);

            // ICCCM - Changing Window State
            //
            // Normal -> Withdrawn - The client should unmap the window and follow it with a synthetic
            // UnmapNotify event as described later in this section.
            this.conn.unmap_window(id.0)?;
            this.conn.send_event(
                false,
                this.root,
                EventMask::SUBSTRUCTURE_NOTIFY | EventMask::SUBSTRUCTURE_REDIRECT,
                UnmapNotifyEvent {
                    response_type: UNMAP_NOTIFY_EVENT,
                    sequence: 0, // Ignored by X server
                    event: this.root,
                    window: id.0,
                    from_configure: false,
                },
            )?;
            this.conn.flush()?;
            Ok(())
        })
    }

    /// Brings the window to the front and gives it the input focus.
    pub fn focus(&self, id: WindowId) -> Result<(), X11Error> {
        self.checked(|this| {
            this.focus_inner(id)?;
            this.conn.flush()?;
            Ok(())
        })
    }

    fn focus_inner(&self, id: WindowId) -> Result<(), X11Error> {
        self.window(id)?;
        if let Some(active_window) = self.wm.active_window {
            // source indication 1: a normal application
            self.send_wm_message(id.0, active_window, [1, 0, 0, 0, 0])?;
        } else if self.query_visible(id.0)? {
            self.conn
                .configure_window(id.0, &ConfigureWindowAux::new().stack_mode(StackMode::ABOVE))?;
            self.conn.set_input_focus(InputFocus::PARENT, id.0, CURRENT_TIME)?;
        }
        Ok(())
    }

    /// Maximizes the window, if the window manager supports it.
    pub fn maximize(&mut self, id: WindowId) -> Result<(), X11Error> {
        self.checked_mut(|this| {
            this.window(id)?;
            let Some((_, vert, horz)) = this.wm.state_maximized() else {
                debug!("The window manager does not support maximization");
                return Ok(());
            };
            this.update_net_wm_state(id.0, true, &[vert, horz])?;
            this.conn.flush()?;
            Ok(())
        })
    }

    /// Iconifies the window.
    pub fn minimize(&self, id: WindowId) -> Result<(), X11Error> {
        self.checked(|this| {
            if this.window(id)?.override_redirect {
                // Override-redirect windows cannot be iconified or restored, as those tasks are
                // performed by the window manager
                return Err(X11Error::WindowManagerRequired(
                    "Iconifying a full screen window without a cooperating window manager",
                ));
            }
            let message = ClientMessageEvent::new(32, id.0, this.atoms.WM_CHANGE_STATE, [ICONIC_STATE, 0, 0, 0, 0]);
            this.conn.send_event(
                false,
                this.root,
                EventMask::SUBSTRUCTURE_NOTIFY | EventMask::SUBSTRUCTURE_REDIRECT,
                message,
            )?;
            this.conn.flush()?;
            Ok(())
        })
    }

    /// Restores an iconified or maximized window.
    pub fn restore(&mut self, id: WindowId) -> Result<(), X11Error> {
        self.checked_mut(|this| {
            if this.window(id)?.override_redirect {
                return Err(X11Error::WindowManagerRequired(
                    "Restoring a full screen window without a cooperating window manager",
                ));
            }

            if this.query_wm_state(id.0)? == Some(ICONIC_STATE) {
                this.conn.map_window(id.0)?;
                let window = id.0;
                this.next_matching_event(
                    |event| matches!(event, Event::VisibilityNotify(notify) if notify.window == window),
                    VISIBILITY_TIMEOUT,
                )?;
            } else if this.query_visible(id.0)? {
                if let Some((_, vert, horz)) = this.wm.state_maximized() {
                    this.update_net_wm_state(id.0, false, &[vert, horz])?;
                }
            }
            this.conn.flush()?;
            Ok(())
        })
    }

    /// Asks the window manager to highlight the window.
    pub fn request_attention(&self, id: WindowId) -> Result<(), X11Error> {
        self.checked(|this| {
            this.window(id)?;
            if let (Some(state), Some(attention)) = (this.wm.wm_state, this.wm.wm_state_demands_attention) {
                this.send_wm_message(id.0, state, [NET_WM_STATE_ADD, attention, 0, 1, 0])?;
                this.conn.flush()?;
            }
            Ok(())
        })
    }

    /// Makes the window fullscreen on `monitor`, or windowed again with `None`.
    ///
    /// Unless `borderless`, the monitor switches to the video mode closest to the window size.
    pub fn set_fullscreen(&mut self, id: WindowId, monitor: Option<MonitorId>, borderless: bool) -> Result<(), X11Error> {
        self.checked_mut(|this| this.set_fullscreen_inner(id, monitor, borderless))
    }

    pub(crate) fn set_fullscreen_inner(
        &mut self,
        id: WindowId,
        monitor: Option<MonitorId>,
        borderless: bool,
    ) -> Result<(), X11Error> {
        let window = id.0;
        let previous = self.window(id)?.fullscreen;
        if let Some(monitor) = monitor {
            self.monitor(monitor)?;
        }

        if previous.is_some() {
            self.release_monitor(window)?;
        }

        match monitor {
            Some(monitor) => {
                let windowed = match previous {
                    Some(previous) => previous.windowed,
                    None => self.window(id)?.geometry.geometry(),
                };
                let size = self.query_size(window)?;

                if !self.query_visible(window)? {
                    self.show_inner(id)?;
                }

                let mode = (!borderless).then_some(VideoMode {
                    width: size.w as u32,
                    height: size.h as u32,
                    ..VideoMode::default()
                });
                self.acquire_monitor(window, monitor, mode)?;
                let fullscreen_mode = self.enter_fullscreen(window, monitor)?;

                self.window_mut(id)?.fullscreen = Some(Fullscreen {
                    monitor,
                    borderless,
                    mode: fullscreen_mode,
                    windowed,
                });
                self.update_normal_hints(id)?;

                let geometry = self.monitor_geometry(monitor)?;
                self.configure_geometry(window, geometry)?;
                info!(window, monitor = monitor.raw(), ?fullscreen_mode, "Window is now fullscreen");
            }
            None => {
                let Some(previous) = previous else {
                    return Ok(());
                };
                self.leave_fullscreen(window, previous.mode)?;
                self.window_mut(id)?.fullscreen = None;
                self.update_normal_hints(id)?;
                self.configure_geometry(window, previous.windowed)?;
                info!(window, "Window left fullscreen");
            }
        }
        self.conn.flush()?;
        Ok(())
    }

    fn enter_fullscreen(&mut self, window: Window, monitor: MonitorId) -> Result<FullscreenMode, X11Error> {
        if let (true, Some(fullscreen_monitors), Some(index)) = (
            self.xinerama_active,
            self.wm.wm_fullscreen_monitors,
            self.monitor(monitor)?.xinerama_index,
        ) {
            self.send_wm_message(window, fullscreen_monitors, [index, index, index, index, 1])?;
        }

        let mode = if let Some((state, fullscreen)) = self.wm.state_fullscreen() {
            self.send_wm_message(window, state, [NET_WM_STATE_ADD, fullscreen, 0, 1, 0])?;
            FullscreenMode::State
        } else {
            // Without a cooperating window manager, take the window out of its hands.
            debug!(window, "No EWMH fullscreen support, using override-redirect");
            self.conn.change_window_attributes(
                window,
                &ChangeWindowAttributesAux::new().override_redirect(1),
            )?;
            self.conn
                .configure_window(window, &ConfigureWindowAux::new().stack_mode(StackMode::ABOVE))?;
            self.conn.set_input_focus(InputFocus::PARENT, window, CURRENT_TIME)?;
            if let Some(record) = self.windows.get_mut(&window) {
                record.override_redirect = true;
            }
            FullscreenMode::OverrideRedirect
        };

        // compositors should not redirect fullscreen windows
        self.conn.change_property32(
            PropMode::REPLACE,
            window,
            self.atoms._NET_WM_BYPASS_COMPOSITOR,
            AtomEnum::CARDINAL,
            &[1],
        )?;
        Ok(mode)
    }

    fn leave_fullscreen(&mut self, window: Window, mode: FullscreenMode) -> Result<(), X11Error> {
        if self.xinerama_active {
            if let Some(fullscreen_monitors) = self.wm.wm_fullscreen_monitors {
                self.conn.delete_property(window, fullscreen_monitors)?;
            }
        }

        match mode {
            FullscreenMode::State => {
                if let Some((state, fullscreen)) = self.wm.state_fullscreen() {
                    self.send_wm_message(window, state, [NET_WM_STATE_REMOVE, fullscreen, 0, 1, 0])?;
                }
            }
            FullscreenMode::OverrideRedirect => {
                self.conn.change_window_attributes(
                    window,
                    &ChangeWindowAttributesAux::new().override_redirect(0),
                )?;
                if let Some(record) = self.windows.get_mut(&window) {
                    record.override_redirect = false;
                }
            }
        }

        self.conn.delete_property(window, self.atoms._NET_WM_BYPASS_COMPOSITOR)?;
        Ok(())
    }

    /// The monitor the window is fullscreen on.
    pub fn fullscreen_monitor(&self, id: WindowId) -> Result<Option<MonitorId>, X11Error> {
        self.checked(|this| Ok(this.window(id)?.fullscreen.map(|fullscreen| fullscreen.monitor)))
    }

    /// The current state of the window, queried from the server.
    pub fn state(&self, id: WindowId) -> Result<WindowState, X11Error> {
        self.checked(|this| this.query_state(id))
    }

    fn query_state(&self, id: WindowId) -> Result<WindowState, X11Error> {
        let record = self.window(id)?;
        let attributes = self.conn.get_window_attributes(id.0)?.reply()?;
        let iconic = self.query_wm_state(id.0)? == Some(ICONIC_STATE);
        let net_state = self.query_net_wm_state(id.0)?;

        let fullscreen = if self
            .wm
            .state_fullscreen()
            .is_some_and(|(_, fullscreen)| net_state.contains(&fullscreen))
        {
            Some(FullscreenMode::State)
        } else if record.override_redirect && record.fullscreen.is_some() {
            Some(FullscreenMode::OverrideRedirect)
        } else {
            None
        };

        Ok(derive_state(
            attributes.map_state,
            iconic,
            self.is_maximized_state(&net_state),
            fullscreen,
        ))
    }

    /// Whether the window is mapped and viewable.
    pub fn is_visible(&self, id: WindowId) -> Result<bool, X11Error> {
        self.checked(|this| {
            this.window(id)?;
            this.query_visible(id.0)
        })
    }

    pub(crate) fn query_visible(&self, window: Window) -> Result<bool, X11Error> {
        let attributes = self.conn.get_window_attributes(window)?.reply()?;
        Ok(attributes.map_state == MapState::VIEWABLE)
    }

    /// Whether the window has the input focus.
    pub fn is_focused(&self, id: WindowId) -> Result<bool, X11Error> {
        self.checked(|this| {
            this.window(id)?;
            this.query_focused(id.0)
        })
    }

    pub(crate) fn query_focused(&self, window: Window) -> Result<bool, X11Error> {
        Ok(self.conn.get_input_focus()?.reply()?.focus == window)
    }

    /// Whether the pointer is over the content area, and not over a window stacked above it.
    pub fn is_hovered(&self, id: WindowId) -> Result<bool, X11Error> {
        self.checked(|this| {
            this.window(id)?;
            let mut current = this.root;
            while current != NONE {
                let reply = this.conn.query_pointer(current)?.reply()?;
                if reply.child == id.0 {
                    return Ok(true);
                }
                current = reply.child;
            }
            Ok(false)
        })
    }

    /// Whether the window is maximized in either direction.
    pub fn is_maximized(&self, id: WindowId) -> Result<bool, X11Error> {
        self.checked(|this| {
            this.window(id)?;
            let state = this.query_net_wm_state(id.0)?;
            Ok(this.is_maximized_state(&state))
        })
    }

    pub(crate) fn is_maximized_state(&self, net_state: &[Atom]) -> bool {
        is_maximized(net_state, &self.wm)
    }

    /// Whether the window is iconified.
    pub fn is_minimized(&self, id: WindowId) -> Result<bool, X11Error> {
        self.checked(|this| {
            this.window(id)?;
            Ok(this.query_wm_state(id.0)? == Some(ICONIC_STATE))
        })
    }

    /// A handle to the cached geometry of the window, readable from any thread.
    pub fn geometry_handle(&self, id: WindowId) -> Result<GeometryHandle, X11Error> {
        self.checked(|this| Ok(this.window(id)?.geometry.clone()))
    }

    /// Reads a 32-bit property, empty if unset or of another type.
    pub(crate) fn property32(&self, window: Window, property: Atom, type_: Atom) -> Result<Vec<u32>, X11Error> {
        let reply = self
            .conn
            .get_property(false, window, property, type_, 0, u32::MAX / 4)?
            .reply()?;
        Ok(reply.value32().map(Iterator::collect).unwrap_or_default())
    }

    /// The ICCCM `WM_STATE` of a window, set by the window manager.
    pub(crate) fn query_wm_state(&self, window: Window) -> Result<Option<u32>, X11Error> {
        let state = self.property32(window, self.atoms.WM_STATE, self.atoms.WM_STATE)?;
        Ok(state
            .first()
            .copied()
            .filter(|state| matches!(*state, NORMAL_STATE | ICONIC_STATE)))
    }

    pub(crate) fn query_net_wm_state(&self, window: Window) -> Result<Vec<Atom>, X11Error> {
        match self.wm.wm_state {
            Some(state) => self.property32(window, state, AtomEnum::ATOM.into()),
            None => Ok(Vec::new()),
        }
    }

    /// Sends a client message to the window manager through the root window.
    pub(crate) fn send_wm_message(&self, window: Window, message_type: Atom, data: [u32; 5]) -> Result<(), X11Error> {
        let event = ClientMessageEvent::new(32, window, message_type, data);
        self.conn.send_event(
            false,
            self.root,
            EventMask::SUBSTRUCTURE_NOTIFY | EventMask::SUBSTRUCTURE_REDIRECT,
            event,
        )?;
        Ok(())
    }

    /// Adds or removes `_NET_WM_STATE` atoms.
    ///
    /// Mapped windows ask the window manager, unmapped windows get the property edited directly as
    /// the window manager only reads it on map.
    fn update_net_wm_state(&self, window: Window, enable: bool, states: &[Atom]) -> Result<(), X11Error> {
        let Some(net_wm_state) = self.wm.wm_state else {
            return Ok(());
        };

        if self.query_visible(window)? {
            let action = if enable { NET_WM_STATE_ADD } else { NET_WM_STATE_REMOVE };
            let first = states.first().copied().unwrap_or(NONE);
            let second = states.get(1).copied().unwrap_or(NONE);
            return self.send_wm_message(window, net_wm_state, [action, first, second, 1, 0]);
        }

        let mut current = self.query_net_wm_state(window)?;
        if enable {
            for state in states {
                if !current.contains(state) {
                    current.push(*state);
                }
            }
        } else {
            current.retain(|state| !states.contains(state));
        }
        self.conn
            .change_property32(PropMode::REPLACE, window, net_wm_state, AtomEnum::ATOM, &current)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use x11rb::protocol::xproto::Visualtype;

    fn visual(id: Visualid, class: VisualClass) -> Visualtype {
        Visualtype {
            visual_id: id,
            class,
            bits_per_rgb_value: 8,
            colormap_entries: 256,
            red_mask: 0xff0000,
            green_mask: 0xff00,
            blue_mask: 0xff,
        }
    }

    fn depths() -> Vec<Depth> {
        vec![
            Depth {
                depth: 24,
                visuals: vec![visual(0x21, VisualClass::TRUE_COLOR), visual(0x22, VisualClass::DIRECT_COLOR)],
            },
            Depth {
                depth: 32,
                visuals: vec![visual(0x40, VisualClass::TRUE_COLOR)],
            },
        ]
    }

    #[test]
    fn state_derivation() {
        assert_eq!(derive_state(MapState::UNMAPPED, false, false, None), WindowState::Unmapped);
        // iconified windows are unmapped by the window manager
        assert_eq!(derive_state(MapState::UNMAPPED, true, false, None), WindowState::Hidden);
        assert_eq!(derive_state(MapState::VIEWABLE, false, false, None), WindowState::Visible);
        assert_eq!(derive_state(MapState::VIEWABLE, false, true, None), WindowState::Maximized);
        assert_eq!(
            derive_state(MapState::VIEWABLE, false, true, Some(FullscreenMode::State)),
            WindowState::Fullscreen(FullscreenMode::State)
        );
        assert_eq!(
            derive_state(MapState::VIEWABLE, false, false, Some(FullscreenMode::OverrideRedirect)),
            WindowState::Fullscreen(FullscreenMode::OverrideRedirect)
        );
    }

    #[test]
    fn maximized_in_either_direction() {
        let wm = WmSupport {
            wm_state: Some(1),
            wm_state_maximized_vert: Some(2),
            wm_state_maximized_horz: Some(3),
            wm_state_fullscreen: Some(4),
            ..WmSupport::default()
        };
        assert!(is_maximized(&[2], &wm));
        assert!(is_maximized(&[4, 3], &wm));
        assert!(!is_maximized(&[4], &wm));
        assert!(!is_maximized(&[], &wm));

        // without EWMH support nothing is maximized
        assert!(!is_maximized(&[2, 3], &WmSupport::default()));
    }

    #[test]
    fn root_visual_is_default() {
        assert_eq!(choose_visual(&depths(), 24, 0x21, false).unwrap(), (24, 0x21));
    }

    #[test]
    fn transparent_visual() {
        assert_eq!(choose_visual(&depths(), 24, 0x21, true).unwrap(), (32, 0x40));

        // without a 32-bit visual the window is opaque
        let opaque = vec![depths().remove(0)];
        assert_eq!(choose_visual(&opaque, 24, 0x21, true).unwrap(), (24, 0x21));
    }

    #[test]
    fn unknown_root_visual() {
        assert!(matches!(
            choose_visual(&depths(), 24, 0x99, false),
            Err(CreateWindowError::NoVisual)
        ));
    }

    #[test]
    fn hints_of_resizable_window() {
        let limits = SizeLimits {
            min: Some((100, 50).into()),
            max: Some((800, 600).into()),
            aspect: Some((16, 9)),
        };
        let hints = normal_hints(&limits, true, false, (640, 480).into(), None);
        assert_eq!(hints.min_size, Some((100, 50)));
        assert_eq!(hints.max_size, Some((800, 600)));
        let (min_aspect, max_aspect) = hints.aspect.unwrap();
        assert_eq!((min_aspect.numerator, min_aspect.denominator), (16, 9));
        assert_eq!((max_aspect.numerator, max_aspect.denominator), (16, 9));
        assert_eq!(hints.win_gravity, Some(Gravity::STATIC));
        assert!(hints.position.is_none());
    }

    #[test]
    fn hints_pin_fixed_size() {
        let limits = SizeLimits {
            min: Some((100, 50).into()),
            ..SizeLimits::default()
        };
        let hints = normal_hints(&limits, false, false, (640, 480).into(), Some((10, 20).into()));
        assert_eq!(hints.min_size, Some((640, 480)));
        assert_eq!(hints.max_size, Some((640, 480)));
        assert!(hints.aspect.is_none());
        assert!(matches!(
            hints.position,
            Some((WmSizeHintsSpecification::ProgramSpecified, 10, 20))
        ));
    }

    #[test]
    fn fullscreen_drops_limits() {
        let limits = SizeLimits {
            min: Some((100, 50).into()),
            max: Some((800, 600).into()),
            aspect: None,
        };
        let hints = normal_hints(&limits, false, true, (640, 480).into(), None);
        assert!(hints.min_size.is_none());
        assert!(hints.max_size.is_none());
    }

    #[test]
    fn limit_validation() {
        assert!(validate_limits(&SizeLimits::default()).is_ok());
        assert!(validate_limits(&SizeLimits {
            min: Some((800, 600).into()),
            max: Some((100, 100).into()),
            aspect: None,
        })
        .is_err());
        assert!(validate_limits(&SizeLimits {
            aspect: Some((0, 1)),
            ..SizeLimits::default()
        })
        .is_err());
        assert!(validate_size((0, 10).into()).is_err());
        assert!(validate_size((70_000, 10).into()).is_err());
    }

    #[test]
    fn icon_packing() {
        let small = [0xff, 0x00, 0x00, 0xff];
        let large = [0u8; 2 * 2 * 4];
        let images = [
            Image {
                width: 1,
                height: 1,
                pixels: &small,
            },
            Image {
                width: 2,
                height: 2,
                pixels: &large,
            },
        ];
        let data = pack_icons(&images).unwrap();
        assert_eq!(data.len(), 2 + 1 + 2 + 4);
        assert_eq!(&data[..3], &[1, 1, 0xffff0000]);
        assert_eq!(&data[3..5], &[2, 2]);

        let broken = [Image {
            width: 4,
            height: 4,
            pixels: &small,
        }];
        assert!(pack_icons(&broken).is_err());
    }

    #[test]
    fn builder_defaults() {
        let builder = WindowBuilder::new().title("demo").size(320, 200).position(5, 6);
        assert_eq!(builder.title, "demo");
        assert_eq!(builder.size, Size::from((320, 200)));
        assert_eq!(builder.position, Some(Point::from((5, 6))));
        assert!(builder.visible && builder.focused && builder.resizable && builder.decorated);
        assert!(!builder.floating && !builder.maximized && !builder.transparent);
        assert!(builder.fullscreen.is_none());
    }

    #[test]
    fn geometry_handle_is_shared() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<GeometryHandle>();

        let handle = GeometryHandle::new(Rectangle::new((0, 0), (100, 100)));
        let other = handle.clone();
        assert!(handle.set_size((200, 150).into()));
        assert!(!handle.set_size((200, 150).into()));
        assert!(handle.set_position((10, 10).into()));

        let thread = std::thread::spawn(move || other.geometry());
        assert_eq!(thread.join().unwrap(), Rectangle::new((10, 10), (200, 150)));
    }
}
