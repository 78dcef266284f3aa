//! Interned atoms and window manager capability detection.

use tracing::{debug, info};
use x11rb::{
    connection::Connection,
    protocol::xproto::{Atom, AtomEnum, ConnectionExt as _, Window},
};

use super::X11Error;

#[allow(missing_docs)]
mod atoms {
    x11rb::atom_manager! {
        /// Atoms used by the backend, interned once at startup.
        #[derive(Default)]
        pub Atoms: AtomsCookie {
            // ICCCM
            WM_PROTOCOLS,
            WM_DELETE_WINDOW,
            WM_STATE,
            WM_CHANGE_STATE,

            // selections
            CLIPBOARD,
            PRIMARY,
            TARGETS,
            MULTIPLE,
            INCR,
            ATOM_PAIR,
            SAVE_TARGETS,
            CLIPBOARD_MANAGER,
            NULL,
            UTF8_STRING,
            COMPOUND_TEXT,
            _X11_WINDOWING_SELECTION,

            // Xdnd
            XdndAware,
            XdndEnter,
            XdndPosition,
            XdndStatus,
            XdndActionCopy,
            XdndDrop,
            XdndFinished,
            XdndLeave,
            XdndSelection,
            XdndTypeList,
            TEXT_URI_LIST: b"text/uri-list",

            // EWMH atoms that are written by clients regardless of wm support
            _NET_SUPPORTING_WM_CHECK,
            _NET_SUPPORTED,
            _NET_WM_NAME,
            _NET_WM_ICON_NAME,
            _NET_WM_ICON,
            _NET_WM_PID,
            _NET_WM_PING,
            _NET_WM_WINDOW_TYPE,
            _NET_WM_WINDOW_TYPE_NORMAL,
            _NET_WM_WINDOW_OPACITY,
            _NET_WM_BYPASS_COMPOSITOR,
            _MOTIF_WM_HINTS,

            // EWMH atoms that are only used when the wm lists them in _NET_SUPPORTED
            _NET_WM_STATE,
            _NET_WM_STATE_ABOVE,
            _NET_WM_STATE_FULLSCREEN,
            _NET_WM_STATE_MAXIMIZED_VERT,
            _NET_WM_STATE_MAXIMIZED_HORZ,
            _NET_WM_STATE_DEMANDS_ATTENTION,
            _NET_WM_FULLSCREEN_MONITORS,
            _NET_WORKAREA,
            _NET_CURRENT_DESKTOP,
            _NET_ACTIVE_WINDOW,
            _NET_FRAME_EXTENTS,
            _NET_REQUEST_FRAME_EXTENTS,
        }
    }
}

pub use self::atoms::{Atoms, AtomsCookie};

/// EWMH hints the running window manager advertises.
///
/// A field is `None` when the window manager is missing or does not list the atom in
/// `_NET_SUPPORTED`; dependent features fall back to manual window manipulation then.
#[allow(missing_docs)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WmSupport {
    /// The checking window named by `_NET_SUPPORTING_WM_CHECK`.
    pub check_window: Option<Window>,
    pub wm_state: Option<Atom>,
    pub wm_state_above: Option<Atom>,
    pub wm_state_fullscreen: Option<Atom>,
    pub wm_state_maximized_vert: Option<Atom>,
    pub wm_state_maximized_horz: Option<Atom>,
    pub wm_state_demands_attention: Option<Atom>,
    pub wm_fullscreen_monitors: Option<Atom>,
    pub workarea: Option<Atom>,
    pub current_desktop: Option<Atom>,
    pub active_window: Option<Atom>,
    pub frame_extents: Option<Atom>,
    pub request_frame_extents: Option<Atom>,
}

impl WmSupport {
    /// Builds the capability set from the atoms listed in `_NET_SUPPORTED`.
    pub fn from_supported(check_window: Window, atoms: &Atoms, supported: &[Atom]) -> WmSupport {
        let pick = |atom: Atom| supported.contains(&atom).then_some(atom);

        WmSupport {
            check_window: Some(check_window),
            wm_state: pick(atoms._NET_WM_STATE),
            wm_state_above: pick(atoms._NET_WM_STATE_ABOVE),
            wm_state_fullscreen: pick(atoms._NET_WM_STATE_FULLSCREEN),
            wm_state_maximized_vert: pick(atoms._NET_WM_STATE_MAXIMIZED_VERT),
            wm_state_maximized_horz: pick(atoms._NET_WM_STATE_MAXIMIZED_HORZ),
            wm_state_demands_attention: pick(atoms._NET_WM_STATE_DEMANDS_ATTENTION),
            wm_fullscreen_monitors: pick(atoms._NET_WM_FULLSCREEN_MONITORS),
            workarea: pick(atoms._NET_WORKAREA),
            current_desktop: pick(atoms._NET_CURRENT_DESKTOP),
            active_window: pick(atoms._NET_ACTIVE_WINDOW),
            frame_extents: pick(atoms._NET_FRAME_EXTENTS),
            request_frame_extents: pick(atoms._NET_REQUEST_FRAME_EXTENTS),
        }
    }

    /// Whether fullscreen can be requested through `_NET_WM_STATE`.
    pub fn state_fullscreen(&self) -> Option<(Atom, Atom)> {
        self.wm_state.zip(self.wm_state_fullscreen)
    }

    /// Both maximization atoms, when maximizing through `_NET_WM_STATE` is possible.
    pub fn state_maximized(&self) -> Option<(Atom, Atom, Atom)> {
        match (
            self.wm_state,
            self.wm_state_maximized_vert,
            self.wm_state_maximized_horz,
        ) {
            (Some(state), Some(vert), Some(horz)) => Some((state, vert, horz)),
            _ => None,
        }
    }
}

/// Reads the single window id stored in a `WINDOW` property, if any.
fn window_property<C: Connection>(
    conn: &C,
    window: Window,
    property: Atom,
) -> Result<Option<Window>, X11Error> {
    let reply = conn
        .get_property(false, window, property, AtomEnum::WINDOW, 0, 1)?
        .reply()?;
    Ok(reply.value32().and_then(|mut values| values.next()))
}

/// Checks for a compliant window manager and the EWMH hints it supports.
pub fn detect_ewmh<C: Connection>(conn: &C, root: Window, atoms: &Atoms) -> Result<WmSupport, X11Error> {
    // The root property names a window created by the window manager.
    let Some(check_window) = window_property(conn, root, atoms._NET_SUPPORTING_WM_CHECK)? else {
        info!("No EWMH compliant window manager found");
        return Ok(WmSupport::default());
    };

    // The checking window must name itself, otherwise the root property is a leftover of a
    // window manager that has since exited.
    match window_property(conn, check_window, atoms._NET_SUPPORTING_WM_CHECK) {
        Ok(Some(mirrored)) if mirrored == check_window => {}
        Ok(_) | Err(X11Error::Protocol(_)) => {
            info!(check_window, "Stale _NET_SUPPORTING_WM_CHECK, ignoring EWMH hints");
            return Ok(WmSupport::default());
        }
        Err(err) => return Err(err),
    }

    let supported = conn
        .get_property(false, root, atoms._NET_SUPPORTED, AtomEnum::ATOM, 0, u32::MAX / 4)?
        .reply()?;
    let supported: Vec<Atom> = supported
        .value32()
        .map(|values| values.collect())
        .unwrap_or_default();

    let wm = WmSupport::from_supported(check_window, atoms, &supported);
    debug!(?wm, "Detected EWMH support");
    Ok(wm)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn atoms() -> Atoms {
        // Distinct values are enough for membership checks.
        let mut atoms = Atoms::default();
        atoms._NET_WM_STATE = 100;
        atoms._NET_WM_STATE_FULLSCREEN = 101;
        atoms._NET_WM_STATE_MAXIMIZED_VERT = 102;
        atoms._NET_WM_STATE_MAXIMIZED_HORZ = 103;
        atoms._NET_ACTIVE_WINDOW = 104;
        atoms._NET_WORKAREA = 105;
        atoms
    }

    #[test]
    fn unlisted_atoms_are_absent() {
        let atoms = atoms();
        let wm = WmSupport::from_supported(7, &atoms, &[100, 101, 104]);

        assert_eq!(wm.check_window, Some(7));
        assert_eq!(wm.state_fullscreen(), Some((100, 101)));
        assert_eq!(wm.active_window, Some(104));
        assert_eq!(wm.workarea, None);
        assert_eq!(wm.state_maximized(), None);
    }

    #[test]
    fn maximize_needs_all_three_atoms() {
        let atoms = atoms();
        let wm = WmSupport::from_supported(7, &atoms, &[100, 102, 103]);
        assert_eq!(wm.state_maximized(), Some((100, 102, 103)));

        let wm = WmSupport::from_supported(7, &atoms, &[102, 103]);
        assert_eq!(wm.state_maximized(), None);
    }

    #[test]
    fn no_wm_means_no_hints() {
        let wm = WmSupport::default();
        assert_eq!(wm.check_window, None);
        assert_eq!(wm.state_fullscreen(), None);
    }
}
