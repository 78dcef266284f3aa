//! Xdnd drop target.
//!
//! The protocol is driven by client messages from the drag source. [`DndState`] tracks the
//! session and tells the caller which message to send back, so the handshake itself does not touch
//! the connection.

use std::{ffi::OsString, os::unix::ffi::OsStringExt, path::PathBuf};

use tracing::{debug, trace, warn};
use x11rb::{
    protocol::xproto::{Atom, Timestamp, Window},
    CURRENT_TIME,
};

use super::{Atoms, X11Error};

/// Highest protocol version understood.
pub(crate) const DND_VERSION: u32 = 5;

/// An active drag over one of our windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct DndSession {
    pub source: Window,
    pub version: u32,
    /// `text/uri-list` if offered.
    pub format: Option<Atom>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DndState {
    #[default]
    Idle,
    Entered(DndSession),
}

/// What the caller has to do after feeding a message to the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DndAction {
    /// Send a client message to the drag source.
    Reply {
        source: Window,
        message_type: Atom,
        data: [u32; 5],
    },
    /// Request the dropped data by converting `XdndSelection`.
    Convert { format: Atom, time: Timestamp },
}

impl DndState {
    pub fn session(&self) -> Option<&DndSession> {
        match self {
            DndState::Idle => None,
            DndState::Entered(session) => Some(session),
        }
    }

    /// Handles `XdndEnter`. A new enter always supersedes the current session.
    ///
    /// `type_list` reads the `XdndTypeList` property of the source, used when the source offers more
    /// than three types.
    pub fn enter<F>(&mut self, data: [u32; 5], atoms: &Atoms, type_list: F) -> Result<(), X11Error>
    where
        F: FnOnce(Window) -> Result<Vec<Atom>, X11Error>,
    {
        let source = data[0];
        let version = data[1] >> 24;
        *self = DndState::Idle;

        if version > DND_VERSION {
            warn!(source, version, "Unsupported XDND version, ignoring drag");
            return Ok(());
        }

        let offered = if data[1] & 1 != 0 {
            type_list(source)?
        } else {
            data[2..5].to_vec()
        };
        let format = offered
            .iter()
            .copied()
            .find(|&atom| atom != x11rb::NONE && atom == atoms.TEXT_URI_LIST);

        debug!(source, version, ?format, "XDND drag entered");
        *self = DndState::Entered(DndSession {
            source,
            version,
            format,
        });
        Ok(())
    }

    /// Handles `XdndPosition`, answering with `XdndStatus`.
    pub fn position(&mut self, target: Window, data: [u32; 5], atoms: &Atoms) -> Option<DndAction> {
        let session = self.session_from(data[0])?;

        let mut reply = [target, 0, 0, 0, 0];
        if session.format.is_some() {
            // accept, with an empty rectangle
            reply[1] = 1;
            if session.version >= 2 {
                reply[4] = atoms.XdndActionCopy;
            }
        }

        Some(DndAction::Reply {
            source: session.source,
            message_type: atoms.XdndStatus,
            data: reply,
        })
    }

    /// Handles `XdndDrop`.
    ///
    /// Without a usable format the drop is rejected right away, which only version 2 and later can
    /// express.
    pub fn drop(&mut self, target: Window, data: [u32; 5], atoms: &Atoms) -> Option<DndAction> {
        let session = self.session_from(data[0])?;

        if let Some(format) = session.format {
            let time = if session.version >= 1 { data[2] } else { CURRENT_TIME };
            return Some(DndAction::Convert { format, time });
        }

        *self = DndState::Idle;
        (session.version >= 2).then_some(DndAction::Reply {
            source: session.source,
            message_type: atoms.XdndFinished,
            data: [target, 0, 0, 0, 0],
        })
    }

    /// Handles the arrival of the dropped data, ending the session.
    pub fn finish(&mut self, target: Window, success: bool, atoms: &Atoms) -> Option<DndAction> {
        let session = *self.session()?;
        *self = DndState::Idle;

        (session.version >= 2).then_some(DndAction::Reply {
            source: session.source,
            message_type: atoms.XdndFinished,
            data: [target, u32::from(success), atoms.XdndActionCopy, 0, 0],
        })
    }

    /// Handles `XdndLeave`.
    pub fn leave(&mut self, data: [u32; 5]) {
        if self.session_from(data[0]).is_some() {
            trace!(source = data[0], "XDND drag left");
            *self = DndState::Idle;
        }
    }

    fn session_from(&self, source: Window) -> Option<DndSession> {
        match self {
            DndState::Entered(session) if session.source == source => Some(*session),
            DndState::Entered(session) => {
                debug!(
                    "Received XDND message from unknown source (got: {}, expected: {}), ignoring..",
                    source, session.source
                );
                None
            }
            DndState::Idle => None,
        }
    }
}

/// Root relative pointer position packed into an `XdndPosition` message.
pub(crate) fn position_of(data: [u32; 5]) -> (i16, i16) {
    ((data[2] >> 16) as u16 as i16, (data[2] & 0xffff) as u16 as i16)
}

fn hex_value(digit: u8) -> Option<u8> {
    (digit as char).to_digit(16).map(|value| value as u8)
}

fn percent_decode(input: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(input.len());
    let mut i = 0;
    while i < input.len() {
        if input[i] == b'%' && i + 2 < input.len() {
            if let (Some(high), Some(low)) = (hex_value(input[i + 1]), hex_value(input[i + 2])) {
                out.push(high << 4 | low);
                i += 3;
                continue;
            }
        }
        out.push(input[i]);
        i += 1;
    }
    out
}

/// Parses a `text/uri-list` payload into local paths.
///
/// Comment lines are skipped, `file://` URIs lose their scheme and host, and percent escapes are
/// decoded.
pub fn parse_uri_list(data: &[u8]) -> Vec<PathBuf> {
    data.split(|&b| b == b'\r' || b == b'\n')
        .filter(|line| !line.is_empty() && line[0] != b'#')
        .map(|line| {
            let line = match line.strip_prefix(b"file://") {
                Some(rest) => {
                    let path_start = rest.iter().position(|&b| b == b'/').unwrap_or(rest.len());
                    &rest[path_start..]
                }
                None => line,
            };
            PathBuf::from(OsString::from_vec(percent_decode(line)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCE: Window = 0x200001;
    const TARGET: Window = 0x400001;

    fn atoms() -> Atoms {
        let mut atoms = Atoms::default();
        atoms.TEXT_URI_LIST = 10;
        atoms.XdndStatus = 11;
        atoms.XdndFinished = 12;
        atoms.XdndActionCopy = 13;
        atoms
    }

    fn enter(state: &mut DndState, version: u32, types: [u32; 3]) {
        let data = [SOURCE, version << 24, types[0], types[1], types[2]];
        state
            .enter(data, &atoms(), |_| panic!("type list not requested"))
            .unwrap();
    }

    #[test]
    fn newer_version_stays_idle() {
        let mut state = DndState::Idle;
        enter(&mut state, DND_VERSION + 1, [10, 0, 0]);
        assert_eq!(state, DndState::Idle);

        // messages of the ignored session have no effect
        assert_eq!(state.position(TARGET, [SOURCE, 0, 0, 0, 0], &atoms()), None);
        assert_eq!(state.drop(TARGET, [SOURCE, 0, 0, 0, 0], &atoms()), None);
    }

    #[test]
    fn newer_version_cancels_running_session() {
        let mut state = DndState::Idle;
        enter(&mut state, 5, [10, 0, 0]);
        assert!(state.session().is_some());
        enter(&mut state, 6, [10, 0, 0]);
        assert_eq!(state, DndState::Idle);
    }

    #[test]
    fn uri_list_is_negotiated() {
        let mut state = DndState::Idle;
        enter(&mut state, 5, [3, 10, 0]);
        assert_eq!(state.session().unwrap().format, Some(10));

        enter(&mut state, 5, [3, 4, 0]);
        assert_eq!(state.session().unwrap().format, None);
    }

    #[test]
    fn long_type_lists_are_fetched() {
        let mut state = DndState::Idle;
        let data = [SOURCE, (5 << 24) | 1, 0, 0, 0];
        state
            .enter(data, &atoms(), |source| {
                assert_eq!(source, SOURCE);
                Ok(vec![1, 2, 3, 4, 10])
            })
            .unwrap();
        assert_eq!(state.session().unwrap().format, Some(10));
    }

    #[test]
    fn rejected_drop_sends_single_finished() {
        let mut state = DndState::Idle;
        enter(&mut state, 5, [3, 0, 0]);

        let action = state.drop(TARGET, [SOURCE, 0, 1234, 0, 0], &atoms());
        assert_eq!(
            action,
            Some(DndAction::Reply {
                source: SOURCE,
                message_type: 12,
                data: [TARGET, 0, 0, 0, 0],
            })
        );
        assert_eq!(state, DndState::Idle);
        assert_eq!(state.drop(TARGET, [SOURCE, 0, 1234, 0, 0], &atoms()), None);
    }

    #[test]
    fn rejected_drop_is_silent_before_version_2() {
        let mut state = DndState::Idle;
        enter(&mut state, 1, [3, 0, 0]);
        assert_eq!(state.drop(TARGET, [SOURCE, 0, 1234, 0, 0], &atoms()), None);
        assert_eq!(state, DndState::Idle);
    }

    #[test]
    fn accepted_drop_converts_then_finishes() {
        let mut state = DndState::Idle;
        enter(&mut state, 5, [10, 0, 0]);

        let status = state.position(TARGET, [SOURCE, 0, (100 << 16) | 200, 0, 0], &atoms());
        assert_eq!(
            status,
            Some(DndAction::Reply {
                source: SOURCE,
                message_type: 11,
                data: [TARGET, 1, 0, 0, 13],
            })
        );

        let convert = state.drop(TARGET, [SOURCE, 0, 1234, 0, 0], &atoms());
        assert_eq!(convert, Some(DndAction::Convert { format: 10, time: 1234 }));

        let finished = state.finish(TARGET, true, &atoms());
        assert_eq!(
            finished,
            Some(DndAction::Reply {
                source: SOURCE,
                message_type: 12,
                data: [TARGET, 1, 13, 0, 0],
            })
        );
        assert_eq!(state, DndState::Idle);
    }

    #[test]
    fn version_0_drops_use_current_time() {
        let mut state = DndState::Idle;
        enter(&mut state, 0, [10, 0, 0]);
        let convert = state.drop(TARGET, [SOURCE, 0, 1234, 0, 0], &atoms());
        assert_eq!(
            convert,
            Some(DndAction::Convert {
                format: 10,
                time: CURRENT_TIME
            })
        );
        // no finished message exists in version 0
        assert_eq!(state.finish(TARGET, true, &atoms()), None);
    }

    #[test]
    fn foreign_source_is_ignored() {
        let mut state = DndState::Idle;
        enter(&mut state, 5, [10, 0, 0]);
        assert_eq!(state.position(TARGET, [SOURCE + 1, 0, 0, 0, 0], &atoms()), None);
        state.leave([SOURCE + 1, 0, 0, 0, 0]);
        assert!(state.session().is_some());
        state.leave([SOURCE, 0, 0, 0, 0]);
        assert_eq!(state, DndState::Idle);
    }

    #[test]
    fn position_unpacking() {
        assert_eq!(position_of([0, 0, (100 << 16) | 200, 0, 0]), (100, 200));
    }

    #[test]
    fn uri_lists() {
        let list = b"# comment\r\nfile:///home/user/a%20b.txt\r\nfile://host/tmp/c\r\n/plain/path\r\n";
        assert_eq!(
            parse_uri_list(list),
            vec![
                PathBuf::from("/home/user/a b.txt"),
                PathBuf::from("/tmp/c"),
                PathBuf::from("/plain/path"),
            ]
        );
    }

    #[test]
    fn broken_percent_escapes_are_kept() {
        assert_eq!(parse_uri_list(b"file:///x%2"), vec![PathBuf::from("/x%2")]);
        assert_eq!(parse_uri_list(b"file:///x%zz"), vec![PathBuf::from("/x%zz")]);
        assert_eq!(parse_uri_list(b"file:///%41"), vec![PathBuf::from("/A")]);
        assert!(parse_uri_list(b"").is_empty());
    }
}
