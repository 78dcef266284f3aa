//! ICCCM selections: the clipboard and the primary selection.
//!
//! The helper window owns our selections and receives converted data. Reading a selection from
//! another client is synchronous: the conversion is requested and the reply awaited with
//! [`X11Backend::next_matching_event`], including incremental (`INCR`) transfers. Serving our own
//! selections happens from the event loop.

use std::time::{Duration, Instant};

use tracing::{debug, trace, warn};
use x11rb::{
    connection::Connection,
    protocol::{
        xproto::{
            Atom, AtomEnum, ChangeWindowAttributesAux, ConnectionExt as _, EventMask, GetPropertyReply, PropMode,
            Property, PropertyNotifyEvent, SelectionClearEvent, SelectionNotifyEvent, SelectionRequestEvent, Window,
            SELECTION_NOTIFY_EVENT,
        },
        Event,
    },
    wrapper::ConnectionExt as _,
    CURRENT_TIME,
};

use super::{X11Backend, X11Error};

/// Payloads larger than this are served incrementally.
pub const INCR_CHUNK_SIZE: usize = 64 * 1024;

/// Which selection an operation acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SelectionKind {
    /// The `CLIPBOARD` selection, used for explicit copy and paste
    Clipboard,
    /// The `PRIMARY` selection, holding the last selected text
    Primary,
}

impl SelectionKind {
    fn name(self) -> &'static str {
        match self {
            SelectionKind::Clipboard => "CLIPBOARD",
            SelectionKind::Primary => "PRIMARY",
        }
    }
}

/// Data being sent to another client in chunks.
#[derive(Debug)]
pub(crate) struct OutgoingTransfer {
    requestor: Window,
    property: Atom,
    target: Atom,
    remaining: Vec<u8>,
    started: Instant,
    /// The final empty chunk has been written.
    sent_finished: bool,
}

impl OutgoingTransfer {
    fn new(request: &SelectionRequestEvent, property: Atom, data: Vec<u8>) -> OutgoingTransfer {
        OutgoingTransfer {
            requestor: request.requestor,
            property,
            target: request.target,
            remaining: data,
            started: Instant::now(),
            sent_finished: false,
        }
    }

    /// Splits off the next chunk. An empty chunk finishes the transfer.
    fn next_chunk(&mut self) -> Vec<u8> {
        let len = self.remaining.len().min(INCR_CHUNK_SIZE);
        if len == 0 {
            self.sent_finished = true;
        }

        let rest = self.remaining.split_off(len);
        std::mem::replace(&mut self.remaining, rest)
    }
}

/// Our side of both selections.
#[derive(Debug, Default)]
pub(crate) struct SelectionState {
    clipboard: Option<String>,
    primary: Option<String>,
    outgoing: Vec<OutgoingTransfer>,
}

impl SelectionState {
    fn cached(&self, kind: SelectionKind) -> Option<&str> {
        match kind {
            SelectionKind::Clipboard => self.clipboard.as_deref(),
            SelectionKind::Primary => self.primary.as_deref(),
        }
    }

    fn set_cached(&mut self, kind: SelectionKind, text: Option<String>) {
        match kind {
            SelectionKind::Clipboard => self.clipboard = text,
            SelectionKind::Primary => self.primary = text,
        }
    }

    /// Whether a property change belongs to one of our outgoing transfers.
    pub fn is_transfer_event(&self, event: &PropertyNotifyEvent) -> bool {
        event.state == Property::DELETE
            && self
                .outgoing
                .iter()
                .any(|transfer| transfer.requestor == event.window && transfer.property == event.atom)
    }
}

/// Decodes a `STRING` (ISO Latin-1) payload.
pub(crate) fn decode_latin1(data: &[u8]) -> String {
    encoding_rs::mem::decode_latin1(data).into_owned()
}

/// Encodes text for the `STRING` target, replacing characters outside of Latin-1 with `?`.
pub(crate) fn encode_latin1(text: &str) -> Vec<u8> {
    let mut encoded = Vec::with_capacity(text.len());
    let mut rest = text;
    while !rest.is_empty() {
        let valid = encoding_rs::mem::str_latin1_up_to(rest);
        encoded.extend_from_slice(&encoding_rs::mem::encode_latin1_lossy(&rest[..valid]));

        let mut unmappable = rest[valid..].chars();
        if unmappable.next().is_some() {
            encoded.push(b'?');
        }
        rest = unmappable.as_str();
    }
    encoded
}

/// What the owner of a selection answered a conversion with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ReplyFormat {
    /// The data, in the requested target
    Data,
    /// The announcement of an `INCR` transfer
    Incremental,
    /// Data of some other type, the next target is tried
    Mismatch,
}

pub(crate) fn reply_format(type_: Atom, target: Atom, incr: Atom) -> ReplyFormat {
    if type_ == incr {
        ReplyFormat::Incremental
    } else if type_ == target {
        ReplyFormat::Data
    } else {
        ReplyFormat::Mismatch
    }
}

/// Whether `event` announces a new value of `property` on `window`.
pub(crate) fn is_new_value(event: &Event, window: Window, property: Atom) -> bool {
    matches!(event, Event::PropertyNotify(notify)
        if notify.window == window && notify.atom == property && notify.state == Property::NEW_VALUE)
}

/// Reassembles the chunks of an incoming `INCR` transfer.
#[derive(Debug)]
pub(crate) struct IncomingTransfer {
    data: Vec<u8>,
    limit: usize,
}

impl IncomingTransfer {
    pub fn new(limit: usize) -> IncomingTransfer {
        IncomingTransfer { data: Vec::new(), limit }
    }

    /// Adds the property read after a change notification.
    ///
    /// Returns the data once the empty terminating chunk arrives. A property that does not exist
    /// belongs to a notification that was already consumed and is skipped.
    pub fn push(&mut self, chunk: &GetPropertyReply) -> Result<Option<Vec<u8>>, X11Error> {
        if chunk.type_ == x11rb::NONE {
            trace!("Skipping notification of a consumed chunk");
            return Ok(None);
        }
        if chunk.value.is_empty() {
            trace!(len = self.data.len(), "Incremental transfer complete");
            return Ok(Some(std::mem::take(&mut self.data)));
        }

        if self.data.len() + chunk.value.len() > self.limit {
            return Err(X11Error::SelectionTooLarge(self.limit));
        }
        self.data.extend_from_slice(&chunk.value);
        Ok(None)
    }

    /// Pulls chunks until the transfer completes.
    ///
    /// `next_chunk` waits for the next change notification and reads the property, `None` means
    /// the wait timed out.
    pub fn receive<F>(mut self, mut next_chunk: F) -> Result<Vec<u8>, X11Error>
    where
        F: FnMut() -> Result<Option<GetPropertyReply>, X11Error>,
    {
        loop {
            let Some(chunk) = next_chunk()? else {
                return Err(X11Error::SelectionTimeout);
            };
            if let Some(data) = self.push(&chunk)? {
                return Ok(data);
            }
        }
    }
}

impl X11Backend {
    fn selection_atom(&self, kind: SelectionKind) -> Atom {
        match kind {
            SelectionKind::Clipboard => self.atoms.CLIPBOARD,
            SelectionKind::Primary => self.atoms.PRIMARY,
        }
    }

    fn selection_kind(&self, atom: Atom) -> Option<SelectionKind> {
        if atom == self.atoms.CLIPBOARD {
            Some(SelectionKind::Clipboard)
        } else if atom == self.atoms.PRIMARY {
            Some(SelectionKind::Primary)
        } else {
            None
        }
    }

    /// Places `text` on the clipboard.
    pub fn set_clipboard(&mut self, text: &str) -> Result<(), X11Error> {
        self.checked_mut(|this| this.set_selection(SelectionKind::Clipboard, text))
    }

    /// Makes `text` the primary selection.
    pub fn set_primary_selection(&mut self, text: &str) -> Result<(), X11Error> {
        self.checked_mut(|this| this.set_selection(SelectionKind::Primary, text))
    }

    /// The text on the clipboard.
    ///
    /// Fails with [`X11Error::FormatUnavailable`] if the owner cannot provide text.
    pub fn clipboard(&mut self) -> Result<String, X11Error> {
        self.checked_mut(|this| this.read_selection(SelectionKind::Clipboard))
    }

    /// The text of the primary selection.
    pub fn primary_selection(&mut self) -> Result<String, X11Error> {
        self.checked_mut(|this| this.read_selection(SelectionKind::Primary))
    }

    fn set_selection(&mut self, kind: SelectionKind, text: &str) -> Result<(), X11Error> {
        let selection = self.selection_atom(kind);
        let helper = self.helper_window();
        self.selection.set_cached(kind, Some(text.to_owned()));

        self.conn.set_selection_owner(helper, selection, CURRENT_TIME)?;
        let owner = self.conn.get_selection_owner(selection)?.reply()?.owner;
        if owner != helper {
            self.selection.set_cached(kind, None);
            return Err(X11Error::SelectionOwnership(kind.name()));
        }

        debug!(selection = kind.name(), len = text.len(), "Took selection ownership");
        Ok(())
    }

    fn read_selection(&mut self, kind: SelectionKind) -> Result<String, X11Error> {
        let selection = self.selection_atom(kind);
        let helper = self.helper_window();

        let owner = self.conn.get_selection_owner(selection)?.reply()?.owner;
        if owner == helper {
            return Ok(self.selection.cached(kind).unwrap_or_default().to_owned());
        }
        if owner == x11rb::NONE {
            return Err(X11Error::FormatUnavailable(kind.name()));
        }

        let property = self.atoms._X11_WINDOWING_SELECTION;
        let timeout = self.config.selection_timeout;
        for target in [self.atoms.UTF8_STRING, AtomEnum::STRING.into()] {
            self.conn
                .convert_selection(helper, selection, target, property, CURRENT_TIME)?;
            self.conn.flush()?;

            let notify = self.next_matching_event(
                |event| {
                    matches!(event, Event::SelectionNotify(notify)
                        if notify.requestor == helper && notify.selection == selection)
                },
                timeout,
            )?;
            let Some(Event::SelectionNotify(notify)) = notify else {
                return Err(X11Error::SelectionTimeout);
            };
            if notify.property == x11rb::NONE {
                trace!(selection = kind.name(), target, "Conversion refused");
                continue;
            }

            let reply = self
                .conn
                .get_property(true, helper, notify.property, AtomEnum::ANY, 0, u32::MAX / 4)?
                .reply()?;
            let data = match reply_format(reply.type_, target, self.atoms.INCR) {
                ReplyFormat::Data => reply.value,
                ReplyFormat::Incremental => self.read_incremental(helper, notify.property)?,
                ReplyFormat::Mismatch => {
                    debug!(selection = kind.name(), target, type_ = reply.type_, "Selection owner sent another type");
                    continue;
                }
            };

            return Ok(if target == self.atoms.UTF8_STRING {
                String::from_utf8_lossy(&data).into_owned()
            } else {
                decode_latin1(&data)
            });
        }

        Err(X11Error::FormatUnavailable(kind.name()))
    }

    /// Receives the chunks of an `INCR` transfer until the empty terminator.
    fn read_incremental(&mut self, helper: Window, property: Atom) -> Result<Vec<u8>, X11Error> {
        let timeout = self.config.selection_timeout;
        debug!("Receiving incremental selection transfer");

        // writing the INCR announcement was a new value too, and it is already read
        self.discard_deferred(|event| is_new_value(event, helper, property));

        let transfer = IncomingTransfer::new(self.config.max_selection_bytes);
        let result = transfer.receive(|| {
            let event = self.next_matching_event(|event| is_new_value(event, helper, property), timeout)?;
            if event.is_none() {
                return Ok(None);
            }
            let chunk = self
                .conn
                .get_property(true, helper, property, AtomEnum::ANY, 0, u32::MAX / 4)?
                .reply()?;
            Ok(Some(chunk))
        });

        if result.is_err() {
            self.conn.delete_property(helper, property)?;
        }
        result
    }

    /// Answers a conversion request for a selection we own.
    pub(crate) fn handle_selection_request(&mut self, request: &SelectionRequestEvent) -> Result<(), X11Error> {
        let property = self.write_target(request)?;

        self.conn.send_event(
            false,
            request.requestor,
            EventMask::NO_EVENT,
            SelectionNotifyEvent {
                response_type: SELECTION_NOTIFY_EVENT,
                sequence: 0,
                time: request.time,
                requestor: request.requestor,
                selection: request.selection,
                target: request.target,
                property,
            },
        )?;
        self.conn.flush()?;
        Ok(())
    }

    /// Writes the requested target to the requestor, returning the property used or `NONE`.
    fn write_target(&mut self, request: &SelectionRequestEvent) -> Result<Atom, X11Error> {
        // obsolete clients
        if request.property == x11rb::NONE {
            return Ok(x11rb::NONE);
        }
        let text = self
            .selection_kind(request.selection)
            .and_then(|kind| self.selection.cached(kind))
            .map(str::to_owned);
        let atoms = self.atoms;
        let formats = [atoms.UTF8_STRING, AtomEnum::STRING.into()];

        if request.target == atoms.TARGETS {
            let targets = [atoms.TARGETS, atoms.MULTIPLE, atoms.UTF8_STRING, AtomEnum::STRING.into()];
            self.conn.change_property32(
                PropMode::REPLACE,
                request.requestor,
                request.property,
                AtomEnum::ATOM,
                &targets,
            )?;
            return Ok(request.property);
        }

        if request.target == atoms.MULTIPLE {
            let mut pairs: Vec<Atom> = self
                .conn
                .get_property(false, request.requestor, request.property, atoms.ATOM_PAIR, 0, u32::MAX / 4)?
                .reply()?
                .value32()
                .map(|values| values.collect())
                .unwrap_or_default();

            for pair in pairs.chunks_exact_mut(2) {
                let (target, property) = (pair[0], pair[1]);
                match text.as_deref() {
                    Some(text) if formats.contains(&target) => {
                        let data = self.encode_target(target, text);
                        self.conn
                            .change_property8(PropMode::REPLACE, request.requestor, property, target, &data)?;
                    }
                    _ => pair[1] = x11rb::NONE,
                }
            }

            self.conn.change_property32(
                PropMode::REPLACE,
                request.requestor,
                request.property,
                atoms.ATOM_PAIR,
                &pairs,
            )?;
            return Ok(request.property);
        }

        if request.target == atoms.SAVE_TARGETS {
            self.conn
                .change_property32(PropMode::REPLACE, request.requestor, request.property, atoms.NULL, &[])?;
            return Ok(request.property);
        }

        if let Some(text) = text.filter(|_| formats.contains(&request.target)) {
            let data = self.encode_target(request.target, &text);
            if data.len() > INCR_CHUNK_SIZE {
                self.start_outgoing(request, data)?;
            } else {
                self.conn.change_property8(
                    PropMode::REPLACE,
                    request.requestor,
                    request.property,
                    request.target,
                    &data,
                )?;
            }
            return Ok(request.property);
        }

        trace!(target = request.target, "Refusing selection conversion");
        Ok(x11rb::NONE)
    }

    fn encode_target(&self, target: Atom, text: &str) -> Vec<u8> {
        if target == self.atoms.UTF8_STRING {
            text.as_bytes().to_vec()
        } else {
            encode_latin1(text)
        }
    }

    fn start_outgoing(&mut self, request: &SelectionRequestEvent, data: Vec<u8>) -> Result<(), X11Error> {
        let timeout = self.config.selection_timeout;
        self.selection.outgoing.retain(|transfer| {
            let alive = transfer.started.elapsed() < timeout;
            if !alive {
                warn!(requestor = transfer.requestor, "Abandoning stalled incremental transfer");
            }
            alive
        });

        debug!(requestor = request.requestor, len = data.len(), "Starting incremental transfer");
        // property deletions on the requestor drive the transfer
        self.conn.change_window_attributes(
            request.requestor,
            &ChangeWindowAttributesAux::new().event_mask(EventMask::PROPERTY_CHANGE),
        )?;
        self.conn.change_property32(
            PropMode::REPLACE,
            request.requestor,
            request.property,
            self.atoms.INCR,
            &[data.len().min(u32::MAX as usize) as u32],
        )?;
        self.selection
            .outgoing
            .push(OutgoingTransfer::new(request, request.property, data));
        Ok(())
    }

    /// Sends the next chunk of an outgoing transfer after the requestor consumed the last one.
    pub(crate) fn handle_transfer_property(&mut self, event: &PropertyNotifyEvent) -> Result<(), X11Error> {
        let Some(index) = self
            .selection
            .outgoing
            .iter()
            .position(|transfer| transfer.requestor == event.window && transfer.property == event.atom)
        else {
            return Ok(());
        };

        let transfer = &mut self.selection.outgoing[index];
        let chunk = transfer.next_chunk();
        trace!(requestor = transfer.requestor, len = chunk.len(), "Sending selection chunk");
        self.conn.change_property8(
            PropMode::REPLACE,
            transfer.requestor,
            transfer.property,
            transfer.target,
            &chunk,
        )?;

        if transfer.sent_finished {
            let transfer = self.selection.outgoing.swap_remove(index);
            debug!(requestor = transfer.requestor, "Incremental transfer complete");
            self.conn.change_window_attributes(
                transfer.requestor,
                &ChangeWindowAttributesAux::new().event_mask(EventMask::NO_EVENT),
            )?;
        }
        self.conn.flush()?;
        Ok(())
    }

    /// Another client took over one of our selections.
    pub(crate) fn handle_selection_clear(&mut self, event: &SelectionClearEvent) {
        if let Some(kind) = self.selection_kind(event.selection) {
            debug!(selection = kind.name(), "Lost selection ownership");
            self.selection.set_cached(kind, None);
        }
    }

    /// Hands the clipboard to a clipboard manager so it outlives us.
    ///
    /// Serves conversion requests until the manager reports completion or the selection timeout
    /// passes. Having no clipboard manager is not an error.
    pub(crate) fn push_to_clipboard_manager(&mut self) -> Result<(), X11Error> {
        let helper = self.helper_window();
        let clipboard = self.atoms.CLIPBOARD;
        let save_targets = self.atoms.SAVE_TARGETS;

        let owner = self.conn.get_selection_owner(clipboard)?.reply()?.owner;
        if owner != helper || self.selection.clipboard.is_none() {
            return Ok(());
        }

        self.conn.convert_selection(
            helper,
            self.atoms.CLIPBOARD_MANAGER,
            save_targets,
            x11rb::NONE,
            CURRENT_TIME,
        )?;
        self.conn.flush()?;

        let deadline = Instant::now() + self.config.selection_timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining == Duration::ZERO {
                warn!("Clipboard manager did not finish in time");
                return Ok(());
            }

            let transfers: Vec<(Window, Atom)> = self
                .selection
                .outgoing
                .iter()
                .map(|transfer| (transfer.requestor, transfer.property))
                .collect();
            let event = self.next_matching_event(
                |event| match event {
                    Event::SelectionRequest(request) => request.owner == helper,
                    Event::SelectionNotify(notify) => {
                        notify.requestor == helper && notify.target == save_targets
                    }
                    Event::PropertyNotify(notify) => {
                        notify.state == Property::DELETE
                            && transfers.contains(&(notify.window, notify.atom))
                    }
                    _ => false,
                },
                remaining,
            )?;

            match event {
                Some(Event::SelectionRequest(request)) => self.handle_selection_request(&request)?,
                Some(Event::PropertyNotify(notify)) => self.handle_transfer_property(&notify)?,
                Some(Event::SelectionNotify(notify)) => {
                    if notify.property == x11rb::NONE {
                        debug!("No clipboard manager took the clipboard");
                    } else {
                        debug!("Clipboard handed to the clipboard manager");
                    }
                    return Ok(());
                }
                _ => {
                    warn!("Clipboard manager did not finish in time");
                    return Ok(());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> SelectionRequestEvent {
        SelectionRequestEvent {
            requestor: 0x200001,
            property: 77,
            target: 42,
            ..Default::default()
        }
    }

    #[test]
    fn outgoing_transfer_chunks() {
        let data = vec![7u8; 2 * INCR_CHUNK_SIZE + 100];
        let mut transfer = OutgoingTransfer::new(&request(), 77, data);

        assert_eq!(transfer.next_chunk().len(), INCR_CHUNK_SIZE);
        assert!(!transfer.sent_finished);
        assert_eq!(transfer.next_chunk().len(), INCR_CHUNK_SIZE);
        assert_eq!(transfer.next_chunk().len(), 100);
        assert!(!transfer.sent_finished);

        // terminated by an empty chunk
        assert!(transfer.next_chunk().is_empty());
        assert!(transfer.sent_finished);
    }

    #[test]
    fn outgoing_transfer_keeps_order() {
        let data: Vec<u8> = (0..INCR_CHUNK_SIZE + 3).map(|i| i as u8).collect();
        let mut transfer = OutgoingTransfer::new(&request(), 77, data.clone());

        let mut received = transfer.next_chunk();
        received.extend(transfer.next_chunk());
        assert_eq!(received, data);
    }

    #[test]
    fn transfer_events_match_requestor_and_property() {
        let mut state = SelectionState::default();
        state
            .outgoing
            .push(OutgoingTransfer::new(&request(), 77, vec![0; 10]));

        let mut event = PropertyNotifyEvent {
            window: 0x200001,
            atom: 77,
            state: Property::DELETE,
            ..Default::default()
        };
        assert!(state.is_transfer_event(&event));

        event.state = Property::NEW_VALUE;
        assert!(!state.is_transfer_event(&event));

        event.state = Property::DELETE;
        event.atom = 78;
        assert!(!state.is_transfer_event(&event));
    }

    #[test]
    fn latin1() {
        assert_eq!(decode_latin1(b"caf\xe9"), "café");
        assert_eq!(decode_latin1(b"\x80\xff"), "\u{80}\u{ff}");
        assert_eq!(decode_latin1(b""), "");
        assert_eq!(encode_latin1("café"), b"caf\xe9");
        assert_eq!(encode_latin1("日本"), b"??");
        assert_eq!(encode_latin1("a€b"), b"a?b");
    }

    const UTF8: Atom = 300;
    const INCR: Atom = 301;

    fn chunk(type_: Atom, value: &[u8]) -> GetPropertyReply {
        GetPropertyReply {
            format: 8,
            type_,
            value_len: value.len() as u32,
            value: value.to_vec(),
            ..Default::default()
        }
    }

    fn receive(limit: usize, chunks: Vec<Option<GetPropertyReply>>) -> Result<Vec<u8>, X11Error> {
        let mut chunks = chunks.into_iter();
        IncomingTransfer::new(limit).receive(|| Ok(chunks.next().expect("read past the terminator")))
    }

    #[test]
    fn incremental_chunks_are_joined() {
        let data = receive(
            1024,
            vec![
                Some(chunk(UTF8, b"hello ")),
                Some(chunk(UTF8, b"world")),
                Some(chunk(UTF8, b"")),
            ],
        )
        .unwrap();
        assert_eq!(data, b"hello world");
    }

    #[test]
    fn consumed_property_does_not_end_the_transfer() {
        // the announcement's own notification, read after the property was deleted
        let data = receive(
            1024,
            vec![
                Some(chunk(x11rb::NONE, b"")),
                Some(chunk(UTF8, b"payload")),
                Some(chunk(UTF8, b"")),
            ],
        )
        .unwrap();
        assert_eq!(data, b"payload");
    }

    #[test]
    fn empty_incremental_transfer() {
        assert_eq!(receive(1024, vec![Some(chunk(UTF8, b""))]).unwrap(), b"");
    }

    #[test]
    fn incremental_transfer_is_bounded() {
        let err = receive(8, vec![Some(chunk(UTF8, b"12345")), Some(chunk(UTF8, b"6789"))]).unwrap_err();
        assert!(matches!(err, X11Error::SelectionTooLarge(8)));

        let err = receive(8, vec![Some(chunk(UTF8, b"1234")), None]).unwrap_err();
        assert!(matches!(err, X11Error::SelectionTimeout));
    }

    #[test]
    fn replies_of_another_type_are_skipped() {
        assert_eq!(reply_format(UTF8, UTF8, INCR), ReplyFormat::Data);
        assert_eq!(reply_format(INCR, UTF8, INCR), ReplyFormat::Incremental);
        assert_eq!(reply_format(u32::from(AtomEnum::STRING), UTF8, INCR), ReplyFormat::Mismatch);
        assert_eq!(reply_format(x11rb::NONE, UTF8, INCR), ReplyFormat::Mismatch);
    }

    #[test]
    fn new_value_notifications() {
        let notify = |window, atom, state| {
            Event::PropertyNotify(PropertyNotifyEvent {
                window,
                atom,
                state,
                ..Default::default()
            })
        };
        assert!(is_new_value(&notify(5, 77, Property::NEW_VALUE), 5, 77));
        assert!(!is_new_value(&notify(5, 77, Property::DELETE), 5, 77));
        assert!(!is_new_value(&notify(6, 77, Property::NEW_VALUE), 5, 77));
        assert!(!is_new_value(&notify(5, 78, Property::NEW_VALUE), 5, 77));
    }

    #[test]
    fn cache_per_selection() {
        let mut state = SelectionState::default();
        state.set_cached(SelectionKind::Clipboard, Some(String::from("copy")));
        assert_eq!(state.cached(SelectionKind::Clipboard), Some("copy"));
        assert_eq!(state.cached(SelectionKind::Primary), None);

        state.set_cached(SelectionKind::Clipboard, None);
        assert_eq!(state.cached(SelectionKind::Clipboard), None);
    }
}
