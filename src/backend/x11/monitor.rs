//! Monitors and video modes through RandR, with a Xinerama assisted fallback.
//!
//! Monitors are rebuilt by [`X11Backend::poll_monitors`] whenever RandR reports an output change.
//! When RandR is missing, or reports no CRTCs at all (as some virtual servers do), a single
//! synthetic monitor covering the whole screen is used.

use std::{cmp::Ordering, mem};

use indexmap::IndexMap;
use tracing::{debug, info, trace};
use x11rb::{
    connection::Connection,
    protocol::{
        randr::{self, ConnectionExt as _, ModeFlag, ModeInfo, Rotation, SetConfig},
        xinerama::{ConnectionExt as _, ScreenInfo},
        xproto::{AtomEnum, Blanking, ConnectionExt as _, Exposures, Window},
    },
    CURRENT_TIME,
};

use super::{MonitorId, WindowId, X11Backend, X11Error};
use crate::utils::{Logical, Point, Rectangle};

/// A display mode of a monitor.
///
/// When passed as the desired mode to [`X11Backend::set_video_mode`], a color depth or refresh
/// rate of `0` means "don't care".
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VideoMode {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Bits of the red channel
    pub red_bits: u8,
    /// Bits of the green channel
    pub green_bits: u8,
    /// Bits of the blue channel
    pub blue_bits: u8,
    /// Refresh rate in Hz, `0` if unknown
    pub refresh_rate: u32,
}

impl VideoMode {
    fn total_bits(&self) -> u32 {
        u32::from(self.red_bits) + u32::from(self.green_bits) + u32::from(self.blue_bits)
    }

    fn area(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }
}

impl PartialOrd for VideoMode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Modes sort by color depth first, then by resolution and refresh rate.
impl Ord for VideoMode {
    fn cmp(&self, other: &Self) -> Ordering {
        self.total_bits()
            .cmp(&other.total_bits())
            .then_with(|| self.area().cmp(&other.area()))
            .then_with(|| self.width.cmp(&other.width))
            .then_with(|| self.refresh_rate.cmp(&other.refresh_rate))
            .then_with(|| {
                (self.red_bits, self.green_bits, self.blue_bits, self.height).cmp(&(
                    other.red_bits,
                    other.green_bits,
                    other.blue_bits,
                    other.height,
                ))
            })
    }
}

/// Splits a visual depth into red, green and blue bits.
pub(crate) fn split_bpp(depth: u8) -> (u8, u8, u8) {
    // alpha does not count
    let bpp = if depth == 32 { 24 } else { depth };

    let mut red = bpp / 3;
    let mut green = red;
    let blue = red;

    let delta = bpp - red * 3;
    if delta >= 1 {
        green += 1;
    }
    if delta == 2 {
        red += 1;
    }

    (red, green, blue)
}

/// Refresh rate of a RandR mode, rounded to whole Hz.
pub(crate) fn refresh_rate(info: &ModeInfo) -> u32 {
    if info.htotal == 0 || info.vtotal == 0 {
        return 0;
    }
    (f64::from(info.dot_clock) / (f64::from(info.htotal) * f64::from(info.vtotal))).round() as u32
}

fn is_sideways(rotation: Rotation) -> bool {
    rotation == Rotation::ROTATE90 || rotation == Rotation::ROTATE270
}

fn video_mode_from_info(info: &ModeInfo, rotation: Rotation, depth: u8) -> VideoMode {
    let (mut width, mut height) = (u32::from(info.width), u32::from(info.height));
    if is_sideways(rotation) {
        mem::swap(&mut width, &mut height);
    }
    let (red_bits, green_bits, blue_bits) = split_bpp(depth);

    VideoMode {
        width,
        height,
        red_bits,
        green_bits,
        blue_bits,
        refresh_rate: refresh_rate(info),
    }
}

fn is_interlaced(info: &ModeInfo) -> bool {
    info.mode_flags.contains(ModeFlag::INTERLACE)
}

/// Picks the mode closest to `desired`.
///
/// Color depth is matched first, then the resolution and last the refresh rate.
pub fn choose_video_mode(modes: &[VideoMode], desired: &VideoMode) -> Option<VideoMode> {
    modes.iter().copied().min_by_key(|mode| {
        let channel = |have: u8, want: u8| if want == 0 { 0 } else { u32::from(have.abs_diff(want)) };
        let color = channel(mode.red_bits, desired.red_bits)
            + channel(mode.green_bits, desired.green_bits)
            + channel(mode.blue_bits, desired.blue_bits);

        let dw = i64::from(mode.width) - i64::from(desired.width);
        let dh = i64::from(mode.height) - i64::from(desired.height);
        let size = (dw * dw + dh * dh).unsigned_abs();

        let rate = if desired.refresh_rate == 0 {
            // prefer the fastest mode
            u32::MAX - mode.refresh_rate
        } else {
            mode.refresh_rate.abs_diff(desired.refresh_rate)
        };

        (color, size, rate)
    })
}

/// The work area of the current desktop, out of `_NET_WORKAREA`.
pub(crate) fn desktop_workarea(extents: &[u32], desktop: u32) -> Option<Rectangle<i32, Logical>> {
    let desktop = usize::try_from(desktop).ok()?;
    if extents.len() < 4 || desktop >= extents.len() / 4 {
        return None;
    }

    let area = &extents[desktop * 4..desktop * 4 + 4];
    Some(Rectangle::new(
        (area[0] as i32, area[1] as i32),
        (area[2] as i32, area[3] as i32),
    ))
}

/// The video mode a monitor had before it was changed, restored exactly once.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SavedMode(Option<randr::Mode>);

impl SavedMode {
    /// Remembers `mode` unless an earlier mode is already saved.
    pub fn remember(&mut self, mode: randr::Mode) {
        if self.0.is_none() {
            self.0 = Some(mode);
        }
    }

    pub fn saved(&self) -> Option<randr::Mode> {
        self.0
    }

    /// Returns the saved mode and forgets it.
    pub fn take(&mut self) -> Option<randr::Mode> {
        self.0.take()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ScreenSaverSettings {
    timeout: u16,
    interval: u16,
    blanking: Blanking,
    exposures: Exposures,
}

/// Screensaver override shared by all fullscreen monitors.
#[derive(Debug, Default)]
pub(crate) struct ScreenSaver {
    holders: usize,
    saved: Option<ScreenSaverSettings>,
}

impl ScreenSaver {
    /// Adds a holder, returning `true` for the first one.
    fn hold(&mut self) -> bool {
        self.holders += 1;
        self.holders == 1
    }

    /// Removes a holder, returning `true` when the last one left.
    fn unhold(&mut self) -> bool {
        match self.holders {
            0 => false,
            n => {
                self.holders = n - 1;
                self.holders == 0
            }
        }
    }

    fn disable<C: Connection>(&mut self, conn: &C) -> Result<(), X11Error> {
        let current = conn.get_screen_saver()?.reply()?;
        self.saved = Some(ScreenSaverSettings {
            timeout: current.timeout,
            interval: current.interval,
            blanking: current.prefer_blanking,
            exposures: current.allow_exposures,
        });
        conn.set_screen_saver(0, 0, Blanking::NOT_PREFERRED, Exposures::DEFAULT)?;
        debug!("Screensaver disabled");
        Ok(())
    }

    fn restore<C: Connection>(&mut self, conn: &C) -> Result<(), X11Error> {
        if let Some(saved) = self.saved.take() {
            conn.set_screen_saver(
                i16::try_from(saved.timeout).unwrap_or(i16::MAX),
                i16::try_from(saved.interval).unwrap_or(i16::MAX),
                saved.blanking,
                saved.exposures,
            )?;
            debug!("Screensaver restored");
        }
        Ok(())
    }
}

/// A connected monitor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Monitor {
    pub id: MonitorId,
    /// `0` for the synthetic monitor.
    pub output: randr::Output,
    pub crtc: randr::Crtc,
    pub name: String,
    /// Index among the Xinerama screens, needed for `_NET_WM_FULLSCREEN_MONITORS`.
    pub xinerama_index: Option<u32>,
    /// Physical size in millimeters.
    pub physical_size: (u32, u32),
    pub saved_mode: SavedMode,
    /// The fullscreen window currently owning the monitor.
    pub window: Option<Window>,
}

/// Monitors connected and disconnected by a call to [`X11Backend::poll_monitors`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MonitorChanges {
    /// Newly connected monitors
    pub connected: Vec<MonitorId>,
    /// Monitors that are gone
    pub disconnected: Vec<MonitorId>,
}

impl MonitorChanges {
    /// Whether the monitor set stayed the same.
    pub fn is_empty(&self) -> bool {
        self.connected.is_empty() && self.disconnected.is_empty()
    }
}

/// Replaces `current` with `found`, keeping per-monitor state of monitors that stayed.
///
/// The primary monitor is moved to the front. Also returns the fullscreen windows of monitors
/// that are gone.
pub(crate) fn reconcile(
    current: &mut IndexMap<MonitorId, Monitor>,
    found: Vec<Monitor>,
    primary: Option<MonitorId>,
) -> (MonitorChanges, Vec<Window>) {
    let mut previous = mem::take(current);
    let mut connected = Vec::new();
    let mut next = IndexMap::with_capacity(found.len());

    for mut monitor in found {
        match previous.shift_remove(&monitor.id) {
            Some(old) => {
                monitor.saved_mode = old.saved_mode;
                monitor.window = old.window;
            }
            None => connected.push(monitor.id),
        }
        next.insert(monitor.id, monitor);
    }

    if let Some(primary) = primary {
        if let Some(monitor) = next.shift_remove(&primary) {
            let mut ordered = IndexMap::with_capacity(next.len() + 1);
            ordered.insert(primary, monitor);
            ordered.extend(next.drain(..));
            next = ordered;
        }
    }

    *current = next;
    let orphaned = previous.values().filter_map(|monitor| monitor.window).collect();
    let changes = MonitorChanges {
        connected,
        disconnected: previous.into_keys().collect(),
    };
    (changes, orphaned)
}

fn xinerama_index(screens: &[ScreenInfo], crtc: &randr::GetCrtcInfoReply) -> Option<u32> {
    screens
        .iter()
        .position(|screen| {
            screen.x_org == crtc.x
                && screen.y_org == crtc.y
                && screen.width == crtc.width
                && screen.height == crtc.height
        })
        .map(|index| index as u32)
}

impl X11Backend {
    /// Re-reads the connected monitors.
    ///
    /// Calling this twice without a hardware change reports no changes the second time.
    #[profiling::function]
    pub fn poll_monitors(&mut self) -> Result<MonitorChanges, X11Error> {
        self.checked_mut(|this| this.poll_monitors_inner())
    }

    pub(crate) fn poll_monitors_inner(&mut self) -> Result<MonitorChanges, X11Error> {
        let (found, primary) = if self.randr_broken {
            (vec![self.synthetic_monitor()], None)
        } else {
            self.query_outputs()?
        };

        let (changes, orphaned) = reconcile(&mut self.monitors, found, primary);
        for id in &changes.connected {
            info!(monitor = id.raw(), "Monitor connected");
        }
        for id in &changes.disconnected {
            info!(monitor = id.raw(), "Monitor disconnected");
        }

        for window in orphaned {
            info!(window, "Fullscreen monitor is gone, leaving fullscreen");
            if self.saver.unhold() {
                self.saver.restore(&*self.conn)?;
            }
            if self.windows.contains_key(&window) {
                self.set_fullscreen_inner(WindowId(window), None, false)?;
            }
        }
        Ok(changes)
    }

    fn synthetic_monitor(&self) -> Monitor {
        let screen = self.screen();
        Monitor {
            id: MonitorId(0),
            output: 0,
            crtc: 0,
            name: String::from("Display"),
            xinerama_index: None,
            physical_size: (
                u32::from(screen.width_in_millimeters),
                u32::from(screen.height_in_millimeters),
            ),
            saved_mode: SavedMode::default(),
            window: None,
        }
    }

    fn query_outputs(&self) -> Result<(Vec<Monitor>, Option<MonitorId>), X11Error> {
        let conn = &*self.conn;
        let resources = conn.randr_get_screen_resources_current(self.root)?.reply()?;
        let primary = conn.randr_get_output_primary(self.root)?.reply()?.output;

        let screens = if self.xinerama_active {
            conn.xinerama_query_screens()?.reply()?.screen_info
        } else {
            Vec::new()
        };

        let mut found = Vec::with_capacity(resources.outputs.len());
        for &output in &resources.outputs {
            let info = conn
                .randr_get_output_info(output, resources.config_timestamp)?
                .reply()?;
            if info.connection != randr::Connection::CONNECTED || info.crtc == x11rb::NONE {
                continue;
            }

            let crtc = conn
                .randr_get_crtc_info(info.crtc, resources.config_timestamp)?
                .reply()?;
            let physical_size = if is_sideways(crtc.rotation) {
                (info.mm_height, info.mm_width)
            } else {
                (info.mm_width, info.mm_height)
            };

            let name = String::from_utf8_lossy(&info.name).into_owned();
            trace!(output, %name, "Found output");
            found.push(Monitor {
                id: MonitorId(output),
                output,
                crtc: info.crtc,
                name,
                xinerama_index: xinerama_index(&screens, &crtc),
                physical_size,
                saved_mode: SavedMode::default(),
                window: None,
            });
        }

        let primary = (primary != x11rb::NONE).then_some(MonitorId(primary));
        Ok((found, primary))
    }

    pub(crate) fn monitor(&self, id: MonitorId) -> Result<&Monitor, X11Error> {
        self.monitors.get(&id).ok_or(X11Error::InvalidMonitor(id.raw()))
    }

    fn monitor_mut(&mut self, id: MonitorId) -> Result<&mut Monitor, X11Error> {
        self.monitors.get_mut(&id).ok_or(X11Error::InvalidMonitor(id.raw()))
    }

    /// All connected monitors, the primary one first.
    pub fn monitors(&self) -> Vec<MonitorId> {
        self.monitors.keys().copied().collect()
    }

    /// The primary monitor, if any monitor is connected.
    pub fn primary_monitor(&self) -> Option<MonitorId> {
        self.monitors.keys().next().copied()
    }

    /// Human readable name of the monitor's output.
    pub fn monitor_name(&self, id: MonitorId) -> Result<&str, X11Error> {
        self.checked(|this| this.monitor(id).map(|monitor| monitor.name.as_str()))
    }

    /// Position of the monitor in the virtual screen.
    pub fn monitor_position(&self, id: MonitorId) -> Result<Point<i32, Logical>, X11Error> {
        self.checked(|this| this.monitor_geometry(id).map(|geometry| geometry.loc))
    }

    /// Physical size of the monitor in millimeters.
    pub fn monitor_physical_size(&self, id: MonitorId) -> Result<(u32, u32), X11Error> {
        self.checked(|this| this.monitor(id).map(|monitor| monitor.physical_size))
    }

    /// Content scale of the monitor.
    ///
    /// X11 only knows a single, global scale.
    pub fn monitor_content_scale(&self, id: MonitorId) -> Result<f64, X11Error> {
        self.checked(|this| this.monitor(id).map(|_| this.content_scale))
    }

    /// Area of the monitor not covered by panels, as advertised by the window manager.
    pub fn monitor_work_area(&self, id: MonitorId) -> Result<Rectangle<i32, Logical>, X11Error> {
        self.checked(|this| {
            let geometry = this.monitor_geometry(id)?;
            let (Some(workarea), Some(current_desktop)) = (this.wm.workarea, this.wm.current_desktop)
            else {
                return Ok(geometry);
            };

            let extents: Vec<u32> = this
                .conn
                .get_property(false, this.root, workarea, AtomEnum::CARDINAL, 0, u32::MAX / 4)?
                .reply()?
                .value32()
                .map(|values| values.collect())
                .unwrap_or_default();
            let desktop = this
                .conn
                .get_property(false, this.root, current_desktop, AtomEnum::CARDINAL, 0, 1)?
                .reply()?
                .value32()
                .and_then(|mut values| values.next());

            Ok(desktop
                .and_then(|desktop| desktop_workarea(&extents, desktop))
                .and_then(|area| geometry.intersection(area))
                .unwrap_or(geometry))
        })
    }

    /// The CRTC rectangle of a monitor.
    pub(crate) fn monitor_geometry(&self, id: MonitorId) -> Result<Rectangle<i32, Logical>, X11Error> {
        let monitor = self.monitor(id)?;
        if self.randr_broken {
            let screen = self.screen();
            return Ok(Rectangle::new(
                (0, 0),
                (i32::from(screen.width_in_pixels), i32::from(screen.height_in_pixels)),
            ));
        }

        let crtc = self
            .conn
            .randr_get_crtc_info(monitor.crtc, CURRENT_TIME)?
            .reply()?;
        Ok(Rectangle::new(
            (i32::from(crtc.x), i32::from(crtc.y)),
            (i32::from(crtc.width), i32::from(crtc.height)),
        ))
    }

    fn screen_mode(&self) -> VideoMode {
        let screen = self.screen();
        let (red_bits, green_bits, blue_bits) = split_bpp(screen.root_depth);
        VideoMode {
            width: u32::from(screen.width_in_pixels),
            height: u32::from(screen.height_in_pixels),
            red_bits,
            green_bits,
            blue_bits,
            refresh_rate: 0,
        }
    }

    /// All usable modes of a monitor, sorted ascending.
    pub fn video_modes(&self, id: MonitorId) -> Result<Vec<VideoMode>, X11Error> {
        self.checked(|this| this.available_video_modes(id))
    }

    fn available_video_modes(&self, id: MonitorId) -> Result<Vec<VideoMode>, X11Error> {
        let monitor = self.monitor(id)?;
        if self.randr_broken {
            return Ok(vec![self.screen_mode()]);
        }

        let resources = self.conn.randr_get_screen_resources_current(self.root)?.reply()?;
        let crtc = self
            .conn
            .randr_get_crtc_info(monitor.crtc, resources.config_timestamp)?
            .reply()?;
        let output = self
            .conn
            .randr_get_output_info(monitor.output, resources.config_timestamp)?
            .reply()?;

        let mut modes = Vec::with_capacity(output.modes.len());
        for mode in &output.modes {
            let Some(info) = resources.modes.iter().find(|info| info.id == *mode) else {
                continue;
            };
            if is_interlaced(info) {
                continue;
            }
            let mode = video_mode_from_info(info, crtc.rotation, self.root_depth);
            if !modes.contains(&mode) {
                modes.push(mode);
            }
        }
        modes.sort();
        Ok(modes)
    }

    /// The current mode of a monitor.
    pub fn video_mode(&self, id: MonitorId) -> Result<VideoMode, X11Error> {
        self.checked(|this| this.current_video_mode(id))
    }

    fn current_video_mode(&self, id: MonitorId) -> Result<VideoMode, X11Error> {
        let monitor = self.monitor(id)?;
        if self.randr_broken {
            return Ok(self.screen_mode());
        }

        let resources = self.conn.randr_get_screen_resources_current(self.root)?.reply()?;
        let crtc = self
            .conn
            .randr_get_crtc_info(monitor.crtc, resources.config_timestamp)?
            .reply()?;
        let info = resources
            .modes
            .iter()
            .find(|info| info.id == crtc.mode)
            .ok_or(X11Error::InvalidMonitor(id.raw()))?;
        Ok(video_mode_from_info(info, crtc.rotation, self.root_depth))
    }

    /// Switches the monitor to the mode closest to `desired`.
    ///
    /// The CRTC is only reprogrammed if the closest mode differs from the current one. The mode the
    /// monitor had before the first change is remembered for [`X11Backend::restore_video_mode`].
    pub fn set_video_mode(&mut self, id: MonitorId, desired: &VideoMode) -> Result<(), X11Error> {
        self.checked_mut(|this| this.set_video_mode_inner(id, desired))
    }

    fn set_video_mode_inner(&mut self, id: MonitorId, desired: &VideoMode) -> Result<(), X11Error> {
        let monitor = self.monitor(id)?;
        if self.randr_broken {
            return Ok(());
        }
        let (crtc_id, output_id) = (monitor.crtc, monitor.output);

        let modes = self.available_video_modes(id)?;
        let Some(best) = choose_video_mode(&modes, desired) else {
            return Ok(());
        };
        if best == self.current_video_mode(id)? {
            return Ok(());
        }

        let conn = &*self.conn;
        let resources = conn.randr_get_screen_resources_current(self.root)?.reply()?;
        let crtc = conn
            .randr_get_crtc_info(crtc_id, resources.config_timestamp)?
            .reply()?;
        let output = conn
            .randr_get_output_info(output_id, resources.config_timestamp)?
            .reply()?;

        let native = output.modes.iter().copied().find(|mode| {
            resources.modes.iter().any(|info| {
                info.id == *mode
                    && !is_interlaced(info)
                    && video_mode_from_info(info, crtc.rotation, self.root_depth) == best
            })
        });
        let Some(native) = native else {
            return Ok(());
        };

        let status = conn
            .randr_set_crtc_config(
                crtc_id,
                CURRENT_TIME,
                resources.config_timestamp,
                crtc.x,
                crtc.y,
                native,
                crtc.rotation,
                &crtc.outputs,
            )?
            .reply()?
            .status;
        if status != SetConfig::SUCCESS {
            return Err(X11Error::VideoModeRejected);
        }

        info!(
            monitor = id.raw(),
            width = best.width,
            height = best.height,
            refresh = best.refresh_rate,
            "Video mode changed"
        );
        self.monitor_mut(id)?.saved_mode.remember(crtc.mode);
        Ok(())
    }

    /// Restores the mode a monitor had before [`X11Backend::set_video_mode`].
    ///
    /// Does nothing if the mode was never changed or is already restored.
    pub fn restore_video_mode(&mut self, id: MonitorId) -> Result<(), X11Error> {
        self.checked_mut(|this| this.restore_video_mode_inner(id))
    }

    fn restore_video_mode_inner(&mut self, id: MonitorId) -> Result<(), X11Error> {
        let monitor = self.monitor_mut(id)?;
        let Some(mode) = monitor.saved_mode.take() else {
            return Ok(());
        };
        let crtc_id = monitor.crtc;

        let conn = &*self.conn;
        let resources = conn.randr_get_screen_resources_current(self.root)?.reply()?;
        let crtc = conn
            .randr_get_crtc_info(crtc_id, resources.config_timestamp)?
            .reply()?;
        let status = conn
            .randr_set_crtc_config(
                crtc_id,
                CURRENT_TIME,
                resources.config_timestamp,
                crtc.x,
                crtc.y,
                mode,
                crtc.rotation,
                &crtc.outputs,
            )?
            .reply()?
            .status;
        if status != SetConfig::SUCCESS {
            return Err(X11Error::VideoModeRejected);
        }
        info!(monitor = id.raw(), "Video mode restored");
        Ok(())
    }

    /// Makes `window` the fullscreen owner of a monitor, switching to `mode` if given.
    pub(crate) fn acquire_monitor(
        &mut self,
        window: Window,
        id: MonitorId,
        mode: Option<VideoMode>,
    ) -> Result<(), X11Error> {
        let owner = self.monitor(id)?.window;
        if owner.is_none() && self.saver.hold() {
            self.saver.disable(&*self.conn)?;
        }

        if let Some(mode) = mode {
            self.set_video_mode_inner(id, &mode)?;
        }
        self.monitor_mut(id)?.window = Some(window);
        Ok(())
    }

    /// Gives up the monitor `window` is fullscreen on, if any.
    pub(crate) fn release_monitor(&mut self, window: Window) -> Result<(), X11Error> {
        let Some(id) = self
            .monitors
            .values()
            .find(|monitor| monitor.window == Some(window))
            .map(|monitor| monitor.id)
        else {
            return Ok(());
        };

        self.monitor_mut(id)?.window = None;
        self.restore_video_mode_inner(id)?;
        if self.saver.unhold() {
            self.saver.restore(&*self.conn)?;
        }
        Ok(())
    }

    /// Restores every changed mode and the screensaver, used on shutdown.
    pub(crate) fn restore_monitors(&mut self) -> Result<(), X11Error> {
        let ids: Vec<MonitorId> = self.monitors.keys().copied().collect();
        for id in ids {
            if let Some(monitor) = self.monitors.get_mut(&id) {
                monitor.window = None;
            }
            self.restore_video_mode_inner(id)?;
        }
        self.saver.holders = 0;
        self.saver.restore(&*self.conn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mode(width: u32, height: u32, bits: u8, refresh_rate: u32) -> VideoMode {
        VideoMode {
            width,
            height,
            red_bits: bits,
            green_bits: bits,
            blue_bits: bits,
            refresh_rate,
        }
    }

    fn monitor(output: u32) -> Monitor {
        Monitor {
            id: MonitorId(output),
            output,
            crtc: output + 100,
            name: format!("OUT-{}", output),
            xinerama_index: None,
            physical_size: (300, 200),
            saved_mode: SavedMode::default(),
            window: None,
        }
    }

    #[test]
    fn bpp_split() {
        assert_eq!(split_bpp(24), (8, 8, 8));
        assert_eq!(split_bpp(32), (8, 8, 8));
        assert_eq!(split_bpp(16), (5, 6, 5));
        assert_eq!(split_bpp(15), (5, 5, 5));
        assert_eq!(split_bpp(8), (3, 3, 2));
    }

    #[test]
    fn refresh_rate_rounding() {
        let info = ModeInfo {
            dot_clock: 148_500_000,
            htotal: 2200,
            vtotal: 1125,
            ..Default::default()
        };
        assert_eq!(refresh_rate(&info), 60);

        let info = ModeInfo {
            dot_clock: 148_500_000,
            ..Default::default()
        };
        assert_eq!(refresh_rate(&info), 0);
    }

    #[test]
    fn sideways_modes_are_swapped() {
        let info = ModeInfo {
            width: 1920,
            height: 1080,
            ..Default::default()
        };
        let mode = video_mode_from_info(&info, Rotation::ROTATE90, 24);
        assert_eq!((mode.width, mode.height), (1080, 1920));
        let mode = video_mode_from_info(&info, Rotation::ROTATE0, 24);
        assert_eq!((mode.width, mode.height), (1920, 1080));
    }

    #[test]
    fn modes_sort_by_bits_then_area() {
        let mut modes = vec![
            mode(1920, 1080, 8, 60),
            mode(800, 600, 8, 60),
            mode(1920, 1080, 8, 144),
            mode(2560, 1440, 5, 60),
        ];
        modes.sort();
        assert_eq!(
            modes,
            vec![
                mode(2560, 1440, 5, 60),
                mode(800, 600, 8, 60),
                mode(1920, 1080, 8, 60),
                mode(1920, 1080, 8, 144),
            ]
        );
    }

    #[test]
    fn closest_mode() {
        let modes = [
            mode(800, 600, 8, 60),
            mode(1280, 720, 8, 60),
            mode(1920, 1080, 8, 60),
            mode(1920, 1080, 8, 144),
        ];

        let chosen = choose_video_mode(&modes, &mode(1300, 700, 8, 60)).unwrap();
        assert_eq!(chosen, mode(1280, 720, 8, 60));

        let chosen = choose_video_mode(&modes, &mode(1920, 1080, 8, 120)).unwrap();
        assert_eq!(chosen, mode(1920, 1080, 8, 144));

        // without a preference the fastest mode wins
        let chosen = choose_video_mode(&modes, &mode(1920, 1080, 0, 0)).unwrap();
        assert_eq!(chosen, mode(1920, 1080, 8, 144));

        assert_eq!(choose_video_mode(&[], &mode(1, 1, 8, 60)), None);
    }

    #[test]
    fn color_depth_beats_resolution() {
        let modes = [mode(1920, 1080, 5, 60), mode(640, 480, 8, 60)];
        let chosen = choose_video_mode(&modes, &mode(1920, 1080, 8, 60)).unwrap();
        assert_eq!(chosen, mode(640, 480, 8, 60));
    }

    #[test]
    fn workarea_of_current_desktop() {
        let extents = [0, 30, 1920, 1050, 0, 0, 1920, 1080];
        assert_eq!(
            desktop_workarea(&extents, 0),
            Some(Rectangle::new((0, 30), (1920, 1050)))
        );
        assert_eq!(
            desktop_workarea(&extents, 1),
            Some(Rectangle::new((0, 0), (1920, 1080)))
        );
        assert_eq!(desktop_workarea(&extents, 2), None);
        assert_eq!(desktop_workarea(&extents[..3], 0), None);
    }

    #[test]
    fn workarea_clips_monitor() {
        // right monitor of a dual head setup, panel on top of the whole screen
        let monitor = Rectangle::<i32, Logical>::new((1920, 0), (1920, 1080));
        let workarea = desktop_workarea(&[0, 30, 3840, 1050], 0).unwrap();
        assert_eq!(
            monitor.intersection(workarea),
            Some(Rectangle::new((1920, 30), (1920, 1050)))
        );
    }

    #[test]
    fn saved_mode_restores_once() {
        let mut saved = SavedMode::default();
        saved.remember(10);
        saved.remember(11);
        assert_eq!(saved.saved(), Some(10));
        assert_eq!(saved.take(), Some(10));
        assert_eq!(saved.take(), None);
    }

    #[test]
    fn screensaver_is_held_by_count() {
        let mut saver = ScreenSaver::default();
        assert!(saver.hold());
        assert!(!saver.hold());
        assert!(!saver.unhold());
        assert!(saver.unhold());
        // unbalanced release does not underflow
        assert!(!saver.unhold());
        assert!(saver.hold());
    }

    #[test]
    fn reconcile_reports_changes() {
        let mut monitors = IndexMap::new();
        let (changes, _) = reconcile(&mut monitors, vec![monitor(1), monitor(2)], Some(MonitorId(2)));
        assert_eq!(changes.connected, vec![MonitorId(1), MonitorId(2)]);
        assert!(changes.disconnected.is_empty());
        // primary first
        assert_eq!(monitors.keys().copied().collect::<Vec<_>>(), vec![MonitorId(2), MonitorId(1)]);

        let (changes, _) = reconcile(&mut monitors, vec![monitor(1), monitor(2)], Some(MonitorId(2)));
        assert!(changes.is_empty());

        let (changes, orphaned) = reconcile(&mut monitors, vec![monitor(2), monitor(3)], None);
        assert_eq!(changes.connected, vec![MonitorId(3)]);
        assert_eq!(changes.disconnected, vec![MonitorId(1)]);
        assert!(orphaned.is_empty());
    }

    #[test]
    fn unplugged_fullscreen_monitor_releases_its_window() {
        let mut monitors = IndexMap::new();
        let mut saver = ScreenSaver::default();
        reconcile(&mut monitors, vec![monitor(1), monitor(2)], None);

        for (id, window) in [(1, 7), (2, 8)] {
            monitors.get_mut(&MonitorId(id)).unwrap().window = Some(window);
            saver.hold();
        }

        let (changes, orphaned) = reconcile(&mut monitors, vec![monitor(2)], None);
        assert_eq!(changes.disconnected, vec![MonitorId(1)]);
        assert_eq!(orphaned, vec![7]);
        assert_eq!(monitors[&MonitorId(2)].window, Some(8));

        // the remaining fullscreen window still holds the screensaver
        assert!(!saver.unhold());
        let (_, orphaned) = reconcile(&mut monitors, vec![], None);
        assert_eq!(orphaned, vec![8]);
        assert!(saver.unhold());
    }

    #[test]
    fn reconcile_keeps_monitor_state() {
        let mut monitors = IndexMap::new();
        reconcile(&mut monitors, vec![monitor(1)], None);
        let state = monitors.get_mut(&MonitorId(1)).unwrap();
        state.saved_mode.remember(42);
        state.window = Some(7);

        reconcile(&mut monitors, vec![monitor(1)], None);
        let state = &monitors[&MonitorId(1)];
        assert_eq!(state.saved_mode.saved(), Some(42));
        assert_eq!(state.window, Some(7));
    }
}
