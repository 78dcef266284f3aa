//! Cursor images, cursor modes and raw pointer motion.
//!
//! A window with a [`CursorMode::Disabled`] cursor hides the pointer and keeps it centered in the
//! content area while focused, reporting a virtual position that is not bound by the window or
//! the screen. Only one window holds the pointer grab at a time.

use std::collections::HashSet;

use tracing::{debug, info, warn};
use x11rb::{
    connection::Connection,
    cursor::Handle as CursorHandle,
    protocol::{
        render::{ConnectionExt as _, CreatePictureAux, PictType},
        xinput::{self, ConnectionExt as _, Fp3232},
        xproto::{
            ChangeWindowAttributesAux, ConnectionExt as _, CreateGCAux, EventMask, GcontextWrapper, GrabMode,
            GrabStatus, ImageFormat, ImageOrder, PixmapWrapper, Window,
        },
    },
    CURRENT_TIME, NONE,
};

pub use cursor_icon::CursorIcon as CursorShape;

use super::{CursorId, Image, WindowId, X11Backend, X11Error};
use crate::utils::{Logical, Point};

/// How the pointer behaves over a window.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CursorMode {
    /// Visible and free to move.
    #[default]
    Normal,
    /// Invisible over the content area, but free to move.
    Hidden,
    /// Hidden and grabbed, reporting unbounded virtual motion.
    Disabled,
    /// Visible but confined to the content area.
    Captured,
}

/// Pointer state shared by all windows of a connection.
#[derive(Debug, Default)]
pub(crate) struct PointerState {
    /// Window holding the pointer grab.
    pub capture: Option<Window>,
    /// Window with the cursor disabled, while focused.
    pub disabled: Option<Window>,
    /// Position to return the pointer to when the cursor is enabled again.
    pub restore_position: Point<f64, Logical>,
    /// Cursors created through the backend.
    pub cursors: HashSet<u32>,
}

/// Converts 32.32 fixed point to a float.
pub(crate) fn fp3232_to_f64(value: &Fp3232) -> f64 {
    f64::from(value.integral) + f64::from(value.frac) / (1u64 << 32) as f64
}

/// Relative motion carried by an XI2 raw motion event.
///
/// Only valuators present in the mask carry a value, in ascending order; valuators 0 and 1 are the
/// horizontal and vertical axes.
pub(crate) fn raw_motion_delta(valuator_mask: &[u32], values: &[Fp3232]) -> Point<f64, Logical> {
    let is_set = |bit: u32| valuator_mask.first().is_some_and(|mask| mask & (1 << bit) != 0);
    let mut values = values.iter().map(fp3232_to_f64);

    let dx = if is_set(0) { values.next().unwrap_or(0.0) } else { 0.0 };
    let dy = if is_set(1) { values.next().unwrap_or(0.0) } else { 0.0 };
    (dx, dy).into()
}

/// Moves the virtual position of a disabled cursor by the distance the real pointer traveled.
pub(crate) fn disabled_motion(
    virtual_position: Point<f64, Logical>,
    last: Point<i32, Logical>,
    current: Point<i32, Logical>,
) -> Point<f64, Logical> {
    virtual_position + (current - last).to_f64()
}

/// Premultiplies straight RGBA into the ARGB a Render cursor expects.
pub(crate) fn premultiplied_argb(image: &Image<'_>) -> Vec<u32> {
    image
        .pixels
        .chunks_exact(4)
        .map(|pixel| {
            let alpha = u32::from(pixel[3]);
            let scale = |channel: u8| u32::from(channel) * alpha / 255;
            alpha << 24 | scale(pixel[0]) << 16 | scale(pixel[1]) << 8 | scale(pixel[2])
        })
        .collect()
}

/// Glyph of the core `cursor` font for shapes that have one.
pub(crate) fn core_glyph(shape: CursorShape) -> Option<u16> {
    match shape {
        CursorShape::Default => Some(68),              // left_ptr
        CursorShape::Text => Some(152),                // xterm
        CursorShape::Crosshair => Some(34),            // crosshair
        CursorShape::Pointer => Some(60),              // hand2
        CursorShape::EwResize => Some(108),            // sb_h_double_arrow
        CursorShape::NsResize => Some(116),            // sb_v_double_arrow
        CursorShape::Move | CursorShape::AllScroll => Some(52), // fleur
        CursorShape::Wait => Some(150),                // watch
        _ => None,
    }
}

impl X11Backend {
    /// Creates a cursor from an RGBA image, requires the Render extension.
    pub fn create_cursor(&mut self, image: &Image<'_>, hot_x: u32, hot_y: u32) -> Result<CursorId, X11Error> {
        self.checked_mut(|this| this.create_cursor_inner(image, hot_x, hot_y))
    }

    fn create_cursor_inner(&mut self, image: &Image<'_>, hot_x: u32, hot_y: u32) -> Result<CursorId, X11Error> {
        if self.extensions.render.is_none() {
            return Err(X11Error::ApiUnavailable("RENDER"));
        }
        image.validate()?;
        if hot_x >= image.width || hot_y >= image.height {
            return Err(X11Error::InvalidValue("cursor hotspot outside of the image"));
        }
        let (width, height) = (
            u16::try_from(image.width).map_err(|_| X11Error::InvalidValue("cursor image too large"))?,
            u16::try_from(image.height).map_err(|_| X11Error::InvalidValue("cursor image too large"))?,
        );

        let conn = &*self.conn;
        let format = conn
            .render_query_pict_formats()?
            .reply()?
            .formats
            .iter()
            .find(|format| {
                format.type_ == PictType::DIRECT
                    && format.depth == 32
                    && format.direct.alpha_shift == 24
                    && format.direct.alpha_mask == 0xff
                    && format.direct.red_shift == 16
                    && format.direct.green_shift == 8
                    && format.direct.blue_shift == 0
            })
            .map(|format| format.id)
            .ok_or(X11Error::ApiUnavailable("ARGB32 picture format"))?;

        let lsb_first = conn.setup().image_byte_order == ImageOrder::LSB_FIRST;
        let data: Vec<u8> = premultiplied_argb(image)
            .into_iter()
            .flat_map(|pixel| if lsb_first { pixel.to_le_bytes() } else { pixel.to_be_bytes() })
            .collect();

        let pixmap = PixmapWrapper::create_pixmap(conn, 32, self.root, width, height)?;
        let gc = GcontextWrapper::create_gc(conn, pixmap.pixmap(), &CreateGCAux::new())?;
        conn.put_image(
            ImageFormat::Z_PIXMAP,
            pixmap.pixmap(),
            gc.gcontext(),
            width,
            height,
            0,
            0,
            0,
            32,
            &data,
        )?;

        let picture = conn.generate_id()?;
        conn.render_create_picture(picture, pixmap.pixmap(), format, &CreatePictureAux::new())?;
        let cursor = conn.generate_id()?;
        conn.render_create_cursor(cursor, picture, hot_x as u16, hot_y as u16)?;
        conn.render_free_picture(picture)?;
        conn.flush()?;

        self.pointer.cursors.insert(cursor);
        debug!(cursor, width, height, "Created cursor");
        Ok(CursorId(cursor))
    }

    /// Creates a cursor with a standard shape, from the cursor theme or the core cursor font.
    pub fn create_standard_cursor(&mut self, shape: CursorShape) -> Result<CursorId, X11Error> {
        self.checked_mut(|this| this.create_standard_cursor_inner(shape))
    }

    fn create_standard_cursor_inner(&mut self, shape: CursorShape) -> Result<CursorId, X11Error> {
        match self.load_themed_cursor(shape) {
            Ok(Some(cursor)) => {
                self.pointer.cursors.insert(cursor);
                return Ok(CursorId(cursor));
            }
            Ok(None) => {}
            Err(err) => debug!("Failed to load the cursor theme: {}", err),
        }

        let glyph = core_glyph(shape).ok_or(X11Error::CursorUnavailable(shape.name()))?;
        let conn = &*self.conn;
        let font = conn.generate_id()?;
        conn.open_font(font, b"cursor")?;
        let cursor = conn.generate_id()?;
        conn.create_glyph_cursor(cursor, font, font, glyph, glyph + 1, 0, 0, 0, 0xffff, 0xffff, 0xffff)?;
        conn.close_font(font)?;
        conn.flush()?;

        self.pointer.cursors.insert(cursor);
        Ok(CursorId(cursor))
    }

    fn load_themed_cursor(&self, shape: CursorShape) -> Result<Option<u32>, X11Error> {
        let conn = &*self.conn;
        let resources = x11rb::resource_manager::new_from_default(conn)?;
        let handle = CursorHandle::new(conn, self.screen_number, &resources)?.reply()?;

        for name in std::iter::once(shape.name()).chain(shape.alt_names().iter().copied()) {
            let cursor = handle.load_cursor(conn, name)?;
            if cursor != NONE {
                debug!(name, cursor, "Loaded themed cursor");
                return Ok(Some(cursor));
            }
        }
        Ok(None)
    }

    /// Destroys a cursor, windows using it fall back to the default cursor.
    pub fn destroy_cursor(&mut self, cursor: CursorId) -> Result<(), X11Error> {
        self.checked_mut(|this| {
            if !this.pointer.cursors.remove(&cursor.0) {
                return Err(X11Error::InvalidCursor(cursor.0));
            }

            let users: Vec<Window> = this
                .windows
                .values()
                .filter(|record| record.cursor == Some(cursor))
                .map(|record| record.id)
                .collect();
            for window in users {
                if let Some(record) = this.windows.get_mut(&window) {
                    record.cursor = None;
                }
                this.update_cursor_image(window)?;
            }

            this.conn.free_cursor(cursor.0)?;
            this.conn.flush()?;
            Ok(())
        })
    }

    /// Sets the cursor image shown over the window, `None` for the default cursor.
    pub fn set_cursor(&mut self, id: WindowId, cursor: Option<CursorId>) -> Result<(), X11Error> {
        self.checked_mut(|this| {
            if let Some(cursor) = cursor {
                if !this.pointer.cursors.contains(&cursor.0) {
                    return Err(X11Error::InvalidCursor(cursor.0));
                }
            }
            this.window_mut(id)?.cursor = cursor;
            this.update_cursor_image(id.0)?;
            this.conn.flush()?;
            Ok(())
        })
    }

    /// The cursor mode of the window.
    pub fn cursor_mode(&self, id: WindowId) -> Result<CursorMode, X11Error> {
        self.checked(|this| Ok(this.window(id)?.cursor_mode))
    }

    /// Changes how the pointer behaves over the window.
    ///
    /// Grabs only apply while the window is focused; they are taken and released again as the
    /// focus moves.
    pub fn set_cursor_mode(&mut self, id: WindowId, mode: CursorMode) -> Result<(), X11Error> {
        self.checked_mut(|this| {
            let window = id.0;
            let previous = this.window(id)?.cursor_mode;
            if previous == mode {
                return Ok(());
            }

            let position = this.cursor_position_of(window)?;
            {
                let record = this.window_mut(id)?;
                record.virtual_cursor_position = position;
                record.cursor_mode = mode;
            }

            if this.query_focused(window)? {
                if previous == CursorMode::Disabled && this.pointer.disabled == Some(window) {
                    this.enable_cursor(window)?;
                }
                match mode {
                    CursorMode::Disabled => this.disable_cursor(window)?,
                    CursorMode::Captured => this.capture_pointer(window)?,
                    CursorMode::Normal | CursorMode::Hidden => {
                        if this.pointer.capture == Some(window) {
                            this.release_capture()?;
                        }
                    }
                }
            }

            this.update_cursor_image(window)?;
            this.conn.flush()?;
            Ok(())
        })
    }

    /// Position of the pointer relative to the content area.
    ///
    /// With a disabled cursor this is the virtual position.
    pub fn cursor_position(&self, id: WindowId) -> Result<Point<f64, Logical>, X11Error> {
        self.checked(|this| {
            this.window(id)?;
            this.cursor_position_of(id.0)
        })
    }

    fn cursor_position_of(&self, window: Window) -> Result<Point<f64, Logical>, X11Error> {
        if let Some(record) = self.windows.get(&window) {
            if record.cursor_mode == CursorMode::Disabled {
                return Ok(record.virtual_cursor_position);
            }
        }
        let reply = self.conn.query_pointer(window)?.reply()?;
        Ok((f64::from(reply.win_x), f64::from(reply.win_y)).into())
    }

    /// Moves the pointer, relative to the content area. Only the focused window may do so.
    pub fn set_cursor_position(&mut self, id: WindowId, position: Point<f64, Logical>) -> Result<(), X11Error> {
        self.checked_mut(|this| {
            let mode = this.window(id)?.cursor_mode;
            if !this.query_focused(id.0)? {
                return Ok(());
            }

            if mode == CursorMode::Disabled {
                this.window_mut(id)?.virtual_cursor_position = position;
            } else {
                this.warp_pointer(id.0, position)?;
            }
            this.conn.flush()?;
            Ok(())
        })
    }

    /// Whether the server can report unaccelerated pointer motion.
    pub fn raw_mouse_motion_supported(&self) -> bool {
        self.extensions.raw_input()
    }

    /// Reports unaccelerated motion while the cursor of the window is disabled.
    pub fn set_raw_mouse_motion(&mut self, id: WindowId, enabled: bool) -> Result<(), X11Error> {
        self.checked_mut(|this| {
            if !this.raw_mouse_motion_supported() {
                return Err(X11Error::FeatureUnavailable("Raw mouse motion"));
            }
            let record = this.window_mut(id)?;
            if record.raw_motion == enabled {
                return Ok(());
            }
            record.raw_motion = enabled;

            if this.pointer.disabled == Some(id.0) {
                this.select_raw_motion(enabled)?;
                this.conn.flush()?;
            }
            Ok(())
        })
    }

    fn select_raw_motion(&self, enabled: bool) -> Result<(), X11Error> {
        let mask = if enabled {
            xinput::XIEventMask::RAW_MOTION
        } else {
            xinput::XIEventMask::from(0u32)
        };
        self.conn.xinput_xi_select_events(
            self.root,
            &[xinput::EventMask {
                deviceid: xinput::Device::ALL_MASTER.into(),
                mask: vec![mask],
            }],
        )?;
        debug!(enabled, "Raw pointer motion selection changed");
        Ok(())
    }

    /// Shows the image matching the cursor mode of the window.
    pub(crate) fn update_cursor_image(&self, window: Window) -> Result<(), X11Error> {
        let Some(record) = self.windows.get(&window) else {
            return Ok(());
        };
        let cursor = match record.cursor_mode {
            CursorMode::Normal | CursorMode::Captured => record.cursor.map_or(NONE, |cursor| cursor.0),
            CursorMode::Hidden | CursorMode::Disabled => self.hidden_cursor,
        };
        self.conn
            .change_window_attributes(window, &ChangeWindowAttributesAux::new().cursor(cursor))?;
        Ok(())
    }

    /// Moves the pointer, remembering the target so the resulting motion can be told apart.
    pub(crate) fn warp_pointer(&mut self, window: Window, position: Point<f64, Logical>) -> Result<(), X11Error> {
        let target = Point::<i32, Logical>::from((position.x as i32, position.y as i32)).clamp_to_i16();
        if let Some(record) = self.windows.get_mut(&window) {
            record.warp_target = Some((i32::from(target.x), i32::from(target.y)).into());
        }
        self.conn
            .warp_pointer(NONE, window, 0, 0, 0, 0, target.x, target.y)?;
        Ok(())
    }

    fn center_cursor(&mut self, window: Window) -> Result<(), X11Error> {
        let size = self.query_size(window)?;
        self.warp_pointer(window, (f64::from(size.w / 2), f64::from(size.h / 2)).into())
    }

    fn capture_pointer(&mut self, window: Window) -> Result<(), X11Error> {
        let reply = self
            .conn
            .grab_pointer(
                true,
                window,
                EventMask::BUTTON_PRESS | EventMask::BUTTON_RELEASE | EventMask::POINTER_MOTION,
                GrabMode::ASYNC,
                GrabMode::ASYNC,
                window,
                NONE,
                CURRENT_TIME,
            )?
            .reply()?;
        if reply.status != GrabStatus::SUCCESS {
            warn!(window, status = ?reply.status, "Failed to grab the pointer");
            return Ok(());
        }
        self.pointer.capture = Some(window);
        Ok(())
    }

    fn release_capture(&mut self) -> Result<(), X11Error> {
        if self.pointer.capture.take().is_some() {
            self.conn.ungrab_pointer(CURRENT_TIME)?;
        }
        Ok(())
    }

    fn disable_cursor(&mut self, window: Window) -> Result<(), X11Error> {
        let raw_motion = self.windows.get(&window).is_some_and(|record| record.raw_motion);
        if raw_motion {
            self.select_raw_motion(true)?;
        }

        let reply = self.conn.query_pointer(window)?.reply()?;
        self.pointer.restore_position = (f64::from(reply.win_x), f64::from(reply.win_y)).into();
        self.pointer.disabled = Some(window);

        self.update_cursor_image(window)?;
        self.center_cursor(window)?;
        self.capture_pointer(window)?;
        info!(window, "Cursor disabled");
        Ok(())
    }

    fn enable_cursor(&mut self, window: Window) -> Result<(), X11Error> {
        let raw_motion = self.windows.get(&window).is_some_and(|record| record.raw_motion);
        if raw_motion {
            self.select_raw_motion(false)?;
        }

        self.pointer.disabled = None;
        self.release_capture()?;
        let restore = self.pointer.restore_position;
        self.warp_pointer(window, restore)?;
        self.update_cursor_image(window)?;
        info!(window, "Cursor enabled");
        Ok(())
    }

    /// Reapplies the grab of a window gaining the focus.
    pub(crate) fn pointer_focus_in(&mut self, window: Window) -> Result<(), X11Error> {
        match self.windows.get(&window).map(|record| record.cursor_mode) {
            Some(CursorMode::Disabled) => self.disable_cursor(window),
            Some(CursorMode::Captured) => self.capture_pointer(window),
            _ => Ok(()),
        }
    }

    /// Releases the grab of a window losing the focus.
    pub(crate) fn pointer_focus_out(&mut self, window: Window) -> Result<(), X11Error> {
        match self.windows.get(&window).map(|record| record.cursor_mode) {
            Some(CursorMode::Disabled) if self.pointer.disabled == Some(window) => self.enable_cursor(window),
            Some(CursorMode::Captured) => self.release_capture(),
            _ => Ok(()),
        }
    }

    /// Releases every pointer resource held by a window that is going away.
    pub(crate) fn release_pointer(&mut self, window: Window) -> Result<(), X11Error> {
        if self.pointer.disabled == Some(window) {
            self.pointer.disabled = None;
            if self.windows.get(&window).is_some_and(|record| record.raw_motion) {
                self.select_raw_motion(false)?;
            }
        }
        if self.pointer.capture == Some(window) {
            self.release_capture()?;
        }
        Ok(())
    }

    /// Keeps the pointer of a disabled cursor in the middle of its window.
    pub(crate) fn recenter_disabled_cursor(&mut self) -> Result<(), X11Error> {
        let Some(window) = self.pointer.disabled else {
            return Ok(());
        };
        let Some(record) = self.windows.get(&window) else {
            return Ok(());
        };

        let size = record.geometry.size();
        let center: Point<i32, Logical> = (size.w / 2, size.h / 2).into();
        if record.last_cursor_position != center {
            self.warp_pointer(window, center.to_f64())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_point_conversion() {
        assert_eq!(fp3232_to_f64(&Fp3232 { integral: 3, frac: 0 }), 3.0);
        assert_eq!(
            fp3232_to_f64(&Fp3232 {
                integral: -2,
                frac: 1 << 31
            }),
            -1.5
        );
    }

    #[test]
    fn raw_motion_both_axes() {
        let values = [Fp3232 { integral: 4, frac: 0 }, Fp3232 { integral: -2, frac: 0 }];
        assert_eq!(raw_motion_delta(&[0b11], &values), Point::from((4.0, -2.0)));
    }

    #[test]
    fn raw_motion_single_axis() {
        // only the vertical valuator is present, its value comes first
        let values = [Fp3232 { integral: 7, frac: 0 }];
        assert_eq!(raw_motion_delta(&[0b10], &values), Point::from((0.0, 7.0)));
        assert_eq!(raw_motion_delta(&[0b01], &values), Point::from((7.0, 0.0)));
        assert_eq!(raw_motion_delta(&[], &values), Point::from((0.0, 0.0)));
    }

    #[test]
    fn raw_motion_ignores_other_valuators() {
        let values = [
            Fp3232 { integral: 1, frac: 0 },
            Fp3232 { integral: 2, frac: 0 },
            Fp3232 { integral: 100, frac: 0 },
        ];
        assert_eq!(raw_motion_delta(&[0b111], &values), Point::from((1.0, 2.0)));
    }

    #[test]
    fn disabled_motion_is_unbounded() {
        let mut position: Point<f64, Logical> = (0.0, 0.0).into();
        let center: Point<i32, Logical> = (50, 50).into();
        // the pointer is recentered after every move, so the deltas keep adding up
        for _ in 0..10 {
            position = disabled_motion(position, center, (40, 55).into());
        }
        assert_eq!(position, Point::from((-100.0, 50.0)));
    }

    #[test]
    fn premultiplied_pixels() {
        let pixels = [0xff, 0x80, 0x00, 0xff, 0xff, 0xff, 0xff, 0x00, 0xff, 0x00, 0x00, 0x80];
        let image = Image {
            width: 3,
            height: 1,
            pixels: &pixels,
        };
        assert_eq!(premultiplied_argb(&image), vec![0xffff8000, 0x00000000, 0x80800000]);
    }

    #[test]
    fn core_font_fallback() {
        assert_eq!(core_glyph(CursorShape::Default), Some(68));
        assert_eq!(core_glyph(CursorShape::Text), Some(152));
        assert_eq!(core_glyph(CursorShape::NwseResize), None);
        assert_eq!(core_glyph(CursorShape::NotAllowed), None);
    }

    #[test]
    fn default_mode() {
        assert_eq!(CursorMode::default(), CursorMode::Normal);
        assert!(PointerState::default().capture.is_none());
    }
}
