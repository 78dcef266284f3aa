//! Text input through an XIM input method.
//!
//! When an input method server is running, every window gets an input context. Key presses are
//! forwarded to the input method, which either commits composed text or hands the key back
//! unconsumed. Without a server, text comes from the core keymap.
//!
//! Input contexts use the root style (`PreeditNothing | StatusNothing`): the input method draws
//! its own pre-edit and status windows.

use std::{
    collections::{HashMap, VecDeque},
    fmt,
    sync::Arc,
};

use tracing::{debug, trace, warn};
use x11rb::{
    protocol::{
        xproto::{KeyPressEvent, Window, KEY_PRESS_EVENT},
        Event,
    },
    rust_connection::RustConnection,
};
use xim::{x11rb::X11rbClient, AHashMap, AttributeName, Client, ClientError, ClientHandler, ForwardEventFlag, InputStyle};

use super::{input::modifiers, WindowId, X11Backend, X11Event};
use crate::backend::input::Modifiers;

pub(crate) type ImClient = X11rbClient<Arc<RustConnection>>;

/// The locale announced when opening the input method.
///
/// The first set variable of `LC_ALL`, `LC_CTYPE` and `LANG` wins, without codeset and modifier.
pub(crate) fn im_locale(lc_all: Option<&str>, lc_ctype: Option<&str>, lang: Option<&str>) -> String {
    let locale = [lc_all, lc_ctype, lang]
        .into_iter()
        .flatten()
        .find(|value| !value.is_empty())
        .unwrap_or("C");
    let end = locale.find(['.', '@']).unwrap_or(locale.len());
    match &locale[..end] {
        "" => String::from("C"),
        locale => locale.to_owned(),
    }
}

/// What the input method produced, drained after every call into the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ImeOutput {
    /// Text composed for a window
    Commit { window: Window, text: String },
    /// A key press the input method did not consume
    Forward(KeyPressEvent),
}

/// Input contexts by window.
///
/// Contexts are created asynchronously, and the server answers creation requests in order.
#[derive(Debug, Default)]
pub(crate) struct ContextTable {
    /// Windows created before the input method was open.
    waiting: Vec<Window>,
    /// Creation requests in flight, `None` once the window is gone.
    requested: VecDeque<Option<Window>>,
    contexts: HashMap<Window, u16>,
}

impl ContextTable {
    pub fn defer(&mut self, window: Window) {
        self.waiting.push(window);
    }

    pub fn take_waiting(&mut self) -> Vec<Window> {
        std::mem::take(&mut self.waiting)
    }

    pub fn requested(&mut self, window: Window) {
        self.requested.push_back(Some(window));
    }

    /// Attaches a newly created context, returning `None` if its window is already gone.
    pub fn created(&mut self, context: u16) -> Option<Window> {
        let window = self.requested.pop_front().flatten()?;
        self.contexts.insert(window, context);
        Some(window)
    }

    /// Detaches a window, returning the context to destroy.
    pub fn forget(&mut self, window: Window) -> Option<u16> {
        self.waiting.retain(|&waiting| waiting != window);
        for request in self.requested.iter_mut() {
            if *request == Some(window) {
                *request = None;
            }
        }
        self.contexts.remove(&window)
    }

    pub fn destroyed(&mut self, context: u16) {
        self.contexts.retain(|_, &mut existing| existing != context);
    }

    pub fn context(&self, window: Window) -> Option<u16> {
        self.contexts.get(&window).copied()
    }

    pub fn window(&self, context: u16) -> Option<Window> {
        self.contexts
            .iter()
            .find(|(_, &existing)| existing == context)
            .map(|(&window, _)| window)
    }

    /// Forgets every context, returning them.
    pub fn clear(&mut self) -> Vec<u16> {
        self.waiting.clear();
        self.requested.clear();
        self.contexts.drain().map(|(_, context)| context).collect()
    }
}

/// Receives the callbacks of the input method client.
#[derive(Debug, Default)]
pub(crate) struct ImeHandler {
    locale: String,
    /// Set once the input method is open and its styles were queried.
    im: Option<u16>,
    pub contexts: ContextTable,
    pub output: VecDeque<ImeOutput>,
    pub disconnected: bool,
}

impl ImeHandler {
    pub fn new(locale: String) -> ImeHandler {
        ImeHandler {
            locale,
            ..ImeHandler::default()
        }
    }

    pub fn input_method(&self) -> Option<u16> {
        self.im
    }

    /// Asks for an input context for `window`, or queues it until the input method is open.
    pub fn request_context<C: Client>(&mut self, client: &mut C, window: Window) -> Result<(), ClientError> {
        let Some(im) = self.im else {
            self.contexts.defer(window);
            return Ok(());
        };

        let attributes = client
            .build_ic_attributes()
            .push(
                AttributeName::InputStyle,
                InputStyle::PREEDIT_NOTHING | InputStyle::STATUS_NOTHING,
            )
            .push(AttributeName::ClientWindow, window)
            .push(AttributeName::FocusWindow, window)
            .build();
        client.create_ic(im, attributes)?;
        self.contexts.requested(window);
        Ok(())
    }
}

impl<C: Client<XEvent = KeyPressEvent>> ClientHandler<C> for ImeHandler {
    fn handle_connect(&mut self, client: &mut C) -> Result<(), ClientError> {
        debug!(locale = %self.locale, "Connected to the input method");
        client.open(&self.locale)
    }

    fn handle_disconnect(&mut self) {
        debug!("Input method disconnected");
        self.im = None;
        self.contexts.clear();
        self.disconnected = true;
    }

    fn handle_open(&mut self, client: &mut C, input_method_id: u16) -> Result<(), ClientError> {
        client.get_im_values(input_method_id, &[AttributeName::QueryInputStyle])
    }

    fn handle_close(&mut self, client: &mut C, _input_method_id: u16) -> Result<(), ClientError> {
        client.disconnect()
    }

    fn handle_query_extension(
        &mut self,
        _client: &mut C,
        _extensions: &[xim::Extension],
    ) -> Result<(), ClientError> {
        Ok(())
    }

    fn handle_get_im_values(
        &mut self,
        client: &mut C,
        input_method_id: u16,
        _attributes: AHashMap<AttributeName, Vec<u8>>,
    ) -> Result<(), ClientError> {
        self.im = Some(input_method_id);
        for window in self.contexts.take_waiting() {
            self.request_context(client, window)?;
        }
        Ok(())
    }

    fn handle_set_ic_values(
        &mut self,
        _client: &mut C,
        _input_method_id: u16,
        _input_context_id: u16,
    ) -> Result<(), ClientError> {
        Ok(())
    }

    fn handle_create_ic(
        &mut self,
        client: &mut C,
        input_method_id: u16,
        input_context_id: u16,
    ) -> Result<(), ClientError> {
        match self.contexts.created(input_context_id) {
            Some(window) => {
                trace!(window, context = input_context_id, "Input context created");
                Ok(())
            }
            None => client.destroy_ic(input_method_id, input_context_id),
        }
    }

    fn handle_destroy_ic(
        &mut self,
        _client: &mut C,
        _input_method_id: u16,
        input_context_id: u16,
    ) -> Result<(), ClientError> {
        self.contexts.destroyed(input_context_id);
        Ok(())
    }

    fn handle_commit(
        &mut self,
        _client: &mut C,
        _input_method_id: u16,
        input_context_id: u16,
        text: &str,
    ) -> Result<(), ClientError> {
        if let Some(window) = self.contexts.window(input_context_id) {
            self.output.push_back(ImeOutput::Commit {
                window,
                text: text.to_owned(),
            });
        }
        Ok(())
    }

    fn handle_forward_event(
        &mut self,
        _client: &mut C,
        _input_method_id: u16,
        _input_context_id: u16,
        _flag: ForwardEventFlag,
        xev: KeyPressEvent,
    ) -> Result<(), ClientError> {
        if xev.response_type & 0x7f == KEY_PRESS_EVENT {
            self.output.push_back(ImeOutput::Forward(xev));
        }
        Ok(())
    }

    fn handle_set_event_mask(
        &mut self,
        _client: &mut C,
        _input_method_id: u16,
        _input_context_id: u16,
        _forward_event_mask: u32,
        _synchronous_event_mask: u32,
    ) -> Result<(), ClientError> {
        Ok(())
    }

    // pre-edit text is drawn by the input method itself with the root style
    fn handle_preedit_draw(
        &mut self,
        _client: &mut C,
        _input_method_id: u16,
        _input_context_id: u16,
        _caret: i32,
        _chg_first: i32,
        _chg_len: i32,
        _status: xim::PreeditDrawStatus,
        _preedit_string: &str,
        _feedbacks: Vec<xim::Feedback>,
    ) -> Result<(), ClientError> {
        Ok(())
    }
}

/// A live input method connection.
pub(crate) struct Ime {
    pub client: ImClient,
    pub handler: ImeHandler,
}

impl fmt::Debug for Ime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ime").field("handler", &self.handler).finish_non_exhaustive()
    }
}

impl Ime {
    /// Connects to the input method server of the screen, if one is running.
    pub fn connect(conn: Arc<RustConnection>, screen_number: usize) -> Option<Ime> {
        let locale = im_locale(
            std::env::var("LC_ALL").ok().as_deref(),
            std::env::var("LC_CTYPE").ok().as_deref(),
            std::env::var("LANG").ok().as_deref(),
        );
        match X11rbClient::init(conn, screen_number, None) {
            Ok(client) => Some(Ime {
                client,
                handler: ImeHandler::new(locale),
            }),
            Err(err) => {
                debug!("No input method available: {}", err);
                None
            }
        }
    }

    pub fn request_context(&mut self, window: Window) -> Result<(), ClientError> {
        self.handler.request_context(&mut self.client, window)
    }

    pub fn destroy_context(&mut self, window: Window) -> Result<(), ClientError> {
        if let (Some(im), Some(context)) = (self.handler.input_method(), self.handler.contexts.forget(window)) {
            self.client.destroy_ic(im, context)?;
        }
        Ok(())
    }

    /// Forwards a key press to the input context of its window.
    ///
    /// Returns `false` if the window has no context yet.
    pub fn forward_key(&mut self, event: &KeyPressEvent) -> Result<bool, ClientError> {
        let (Some(im), Some(context)) = (self.handler.input_method(), self.handler.contexts.context(event.event)) else {
            return Ok(false);
        };
        self.client
            .forward_event(im, context, ForwardEventFlag::empty(), event)?;
        Ok(true)
    }

    pub fn set_focus(&mut self, window: Window, focused: bool) -> Result<(), ClientError> {
        let (Some(im), Some(context)) = (self.handler.input_method(), self.handler.contexts.context(window)) else {
            return Ok(());
        };
        if focused {
            self.client.set_focus(im, context)
        } else {
            self.client.unset_focus(im, context)
        }
    }

    /// Passes an event to the input method, returning whether it was meant for it.
    pub fn filter(&mut self, event: &Event) -> Result<bool, ClientError> {
        self.client.filter_event(event, &mut self.handler)
    }

    /// Destroys every input context, closes the input method and disconnects from the server.
    pub fn close(&mut self) -> Result<(), ClientError> {
        let contexts = self.handler.contexts.clear();
        if let Some(im) = self.handler.im.take() {
            for context in contexts {
                self.client.destroy_ic(im, context)?;
            }
            self.client.close(im)?;
        }
        self.client.disconnect()
    }
}

impl X11Backend {
    /// Gives the input method the first look at an event.
    ///
    /// Returns `true` if the event belonged to the input method protocol.
    pub(crate) fn filter_input_method(&mut self, event: &Event, callback: &mut dyn FnMut(X11Event)) -> bool {
        let Some(ime) = self.ime.as_mut() else {
            return false;
        };
        let filtered = match ime.filter(event) {
            Ok(filtered) => filtered,
            Err(err) => {
                self.input_method_failed(err);
                return false;
            }
        };
        self.drain_input_method(callback);
        filtered
    }

    fn drain_input_method(&mut self, callback: &mut dyn FnMut(X11Event)) {
        let Some(ime) = self.ime.as_mut() else {
            return;
        };
        let output: Vec<ImeOutput> = ime.handler.output.drain(..).collect();
        if ime.handler.disconnected {
            debug!("Falling back to keymap text input");
            self.ime = None;
        }

        for output in output {
            match output {
                ImeOutput::Commit { window, text } => {
                    if !self.windows.contains_key(&window) {
                        continue;
                    }
                    let window = WindowId(window);
                    for ch in text.chars().filter(|ch| !ch.is_control()) {
                        callback(X11Event::Text {
                            window,
                            ch,
                            mods: Modifiers::empty(),
                        });
                    }
                }
                ImeOutput::Forward(event) => {
                    if !self.windows.contains_key(&event.event) {
                        continue;
                    }
                    let mods = modifiers(event.state);
                    if let Some(ch) = self.keyboard.keymap.text(event.detail, self.keyboard.group, mods) {
                        callback(X11Event::Text {
                            window: WindowId(event.event),
                            ch,
                            mods,
                        });
                    }
                }
            }
        }
    }

    /// Hands a key press to the input context of its window.
    ///
    /// Returns `false` if text has to come from the keymap instead.
    pub(crate) fn forward_to_input_method(&mut self, event: &KeyPressEvent) -> bool {
        let Some(ime) = self.ime.as_mut() else {
            return false;
        };
        match ime.forward_key(event) {
            Ok(forwarded) => forwarded,
            Err(err) => {
                self.input_method_failed(err);
                false
            }
        }
    }

    pub(crate) fn attach_input_context(&mut self, window: Window) {
        let result = self.ime.as_mut().map(|ime| ime.request_context(window));
        if let Some(Err(err)) = result {
            self.input_method_failed(err);
        }
    }

    pub(crate) fn detach_input_context(&mut self, window: Window) {
        let result = self.ime.as_mut().map(|ime| ime.destroy_context(window));
        if let Some(Err(err)) = result {
            self.input_method_failed(err);
        }
    }

    pub(crate) fn focus_input_context(&mut self, window: Window, focused: bool) {
        let result = self.ime.as_mut().map(|ime| ime.set_focus(window, focused));
        if let Some(Err(err)) = result {
            self.input_method_failed(err);
        }
    }

    fn input_method_failed(&mut self, err: ClientError) {
        warn!("Input method failed, falling back to keymap text input: {}", err);
        self.ime = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locale_precedence() {
        assert_eq!(im_locale(Some("de_DE.UTF-8"), Some("fr_FR"), Some("en_US")), "de_DE");
        assert_eq!(im_locale(Some(""), Some("ja_JP.eucJP"), None), "ja_JP");
        assert_eq!(im_locale(None, None, Some("sr_RS@latin")), "sr_RS");
        assert_eq!(im_locale(None, None, None), "C");
        assert_eq!(im_locale(None, None, Some(".UTF-8")), "C");
    }

    #[test]
    fn contexts_attach_in_request_order() {
        let mut table = ContextTable::default();
        table.requested(10);
        table.requested(20);

        assert_eq!(table.created(1), Some(10));
        assert_eq!(table.created(2), Some(20));
        assert_eq!(table.context(20), Some(2));
        assert_eq!(table.window(1), Some(10));
        // a reply nobody asked for
        assert_eq!(table.created(3), None);
    }

    #[test]
    fn window_gone_before_its_context() {
        let mut table = ContextTable::default();
        table.requested(10);
        table.requested(20);
        assert_eq!(table.forget(10), None);

        // the context created for the destroyed window is not attached
        assert_eq!(table.created(1), None);
        assert_eq!(table.created(2), Some(20));
        assert_eq!(table.window(1), None);
    }

    #[test]
    fn forgetting_returns_the_context() {
        let mut table = ContextTable::default();
        table.requested(10);
        table.created(4);
        assert_eq!(table.forget(10), Some(4));
        assert_eq!(table.context(10), None);
        assert_eq!(table.forget(10), None);
    }

    #[test]
    fn waiting_windows() {
        let mut table = ContextTable::default();
        table.defer(10);
        table.defer(20);
        table.forget(10);
        assert_eq!(table.take_waiting(), vec![20]);
        assert!(table.take_waiting().is_empty());
    }

    #[test]
    fn server_side_destruction() {
        let mut table = ContextTable::default();
        table.requested(10);
        table.created(4);
        table.destroyed(4);
        assert_eq!(table.context(10), None);
    }

    #[test]
    fn clearing_returns_every_context() {
        let mut table = ContextTable::default();
        table.requested(10);
        table.requested(20);
        table.created(1);
        table.created(2);
        table.defer(30);

        let mut contexts = table.clear();
        contexts.sort_unstable();
        assert_eq!(contexts, vec![1, 2]);
        assert!(table.take_waiting().is_empty());
        assert_eq!(table.created(3), None);
    }

    #[test]
    fn deferred_until_open() {
        let mut handler = ImeHandler::new(String::from("C"));
        assert_eq!(handler.input_method(), None);
        handler.contexts.defer(10);
        assert_eq!(handler.contexts.take_waiting(), vec![10]);
    }
}
