//! Translation of X11 events into backend state changes and [`X11Event`]s.

use tracing::{debug, trace, warn};
use x11rb::{
    connection::Connection,
    protocol::{
        xinput::RawMotionEvent,
        xproto::{
            Atom, AtomEnum, ButtonPressEvent, ClientMessageEvent, ConfigureNotifyEvent, ConnectionExt as _, EnterNotifyEvent,
            EventMask, KeyPressEvent, Mapping, MotionNotifyEvent, NotifyMode, Property, PropertyNotifyEvent,
            SelectionNotifyEvent, Window,
        },
        Event,
    },
    NONE,
};

use super::{
    cursor::{disabled_motion, raw_motion_delta, CursorMode},
    dnd::{parse_uri_list, position_of, DndAction},
    input::{button_action, is_repeat_release, is_scroll_button, modifiers, ButtonAction},
    window::ICONIC_STATE,
    Atoms, VideoMode, WindowId, X11Backend, X11Error, X11Event,
};
use crate::{
    backend::input::{ButtonState, KeyState},
    utils::{Logical, Point},
};

type Callback<'a> = &'a mut dyn FnMut(X11Event);

/// Whether an event was sent by a client rather than the server.
fn is_synthetic(response_type: u8) -> bool {
    response_type & 0x80 != 0
}

impl X11Backend {
    /// Handles a single event, reporting failures to the error callback.
    pub(crate) fn process_event(&mut self, event: Event, callback: Callback<'_>) {
        if self.filter_input_method(&event, callback) {
            return;
        }
        if let Err(err) = self.dispatch(event, callback) {
            self.report(&err);
        }
    }

    fn dispatch(&mut self, event: Event, callback: Callback<'_>) -> Result<(), X11Error> {
        match event {
            Event::Error(err) => self.report_protocol_error(&err),

            Event::KeyPress(event) => self.on_key_press(event, callback),
            Event::KeyRelease(event) => self.on_key_release(event, callback)?,
            Event::ButtonPress(event) => self.on_button(event, ButtonState::Pressed, callback),
            Event::ButtonRelease(event) => self.on_button(event, ButtonState::Released, callback),
            Event::MotionNotify(event) => self.on_motion(event, callback),
            Event::XinputRawMotion(event) => self.on_raw_motion(event, callback),
            Event::EnterNotify(event) => self.on_enter(event, callback)?,
            Event::LeaveNotify(event) => {
                if self.windows.contains_key(&event.event) {
                    callback(X11Event::CursorEntered {
                        window: WindowId(event.event),
                        entered: false,
                    });
                }
            }

            Event::FocusIn(event) => {
                // grabs are not focus changes the user cares about
                if matches!(event.mode, NotifyMode::GRAB | NotifyMode::UNGRAB) || !self.windows.contains_key(&event.event)
                {
                    return Ok(());
                }
                self.pointer_focus_in(event.event)?;
                self.focus_input_context(event.event, true);
                callback(X11Event::Focus {
                    window: WindowId(event.event),
                    focused: true,
                });
            }
            Event::FocusOut(event) => {
                if matches!(event.mode, NotifyMode::GRAB | NotifyMode::UNGRAB) || !self.windows.contains_key(&event.event)
                {
                    return Ok(());
                }
                self.pointer_focus_out(event.event)?;
                self.focus_input_context(event.event, false);
                callback(X11Event::Focus {
                    window: WindowId(event.event),
                    focused: false,
                });
            }

            Event::Expose(event) => {
                if event.count == 0 && self.windows.contains_key(&event.window) {
                    callback(X11Event::Refresh {
                        window: WindowId(event.window),
                    });
                }
            }
            Event::ConfigureNotify(event) => self.on_configure(event, callback)?,
            Event::PropertyNotify(event) => self.on_property(event, callback)?,
            Event::ClientMessage(event) => self.on_client_message(event, callback)?,

            Event::SelectionRequest(event) => self.handle_selection_request(&event)?,
            Event::SelectionClear(event) => self.handle_selection_clear(&event),
            Event::SelectionNotify(event) => self.on_selection_notify(event, callback)?,

            Event::RandrNotify(_) => {
                let changes = self.poll_monitors_inner()?;
                for monitor in changes.disconnected {
                    callback(X11Event::MonitorDisconnected { monitor });
                }
                for monitor in changes.connected {
                    callback(X11Event::MonitorConnected { monitor });
                }
            }

            Event::XkbStateNotify(event) => {
                self.keyboard.group = u8::from(event.group);
            }
            Event::XkbNewKeyboardNotify(_) | Event::XkbMapNotify(_) => {
                debug!("Keyboard layout changed");
                self.keyboard.reload(&*self.conn, true)?;
            }
            Event::MappingNotify(event) => {
                if event.request != Mapping::POINTER {
                    let xkb_available = self.extensions.xkb.is_some();
                    self.keyboard.reload(&*self.conn, xkb_available)?;
                }
            }

            event => trace!(?event, "Ignoring event"),
        }
        Ok(())
    }

    fn on_key_press(&mut self, event: KeyPressEvent, callback: Callback<'_>) {
        let scancode = event.detail;
        let Some(record) = self.windows.get_mut(&event.event) else {
            return;
        };
        let Some(state) = record.keys.press(scancode, event.time) else {
            trace!(scancode, time = event.time, "Dropping duplicate key press");
            return;
        };

        let window = WindowId(event.event);
        let mods = modifiers(event.state);
        callback(X11Event::Key {
            window,
            key: self.keyboard.table.key(scancode),
            scancode,
            state,
            mods,
        });

        // the input method commits text, or hands the key back for keymap text
        if self.forward_to_input_method(&event) {
            return;
        }
        if let Some(ch) = self.keyboard.keymap.text(scancode, self.keyboard.group, mods) {
            callback(X11Event::Text { window, ch, mods });
        }
    }

    fn on_key_release(&mut self, event: KeyPressEvent, callback: Callback<'_>) -> Result<(), X11Error> {
        if !self.windows.contains_key(&event.event) {
            return Ok(());
        }

        // Without detectable auto-repeat, the server repeats a held key as release and press pairs.
        let detectable = self.keyboard.detectable_repeat;
        if !detectable && is_repeat_release(&event, self.peek_event()?, detectable) {
            trace!(scancode = event.detail, "Dropping auto-repeat release");
            return Ok(());
        }

        let key = self.keyboard.table.key(event.detail);
        if let Some(record) = self.windows.get_mut(&event.event) {
            record.keys.release(event.detail);
        }
        callback(X11Event::Key {
            window: WindowId(event.event),
            key,
            scancode: event.detail,
            state: KeyState::Released,
            mods: modifiers(event.state),
        });
        Ok(())
    }

    /// The event `next_event` will return next, without taking it.
    fn peek_event(&mut self) -> Result<Option<&Event>, X11Error> {
        if self.deferred.is_empty() {
            if let Some(event) = self.conn.poll_for_event()? {
                self.deferred.push_back(event);
            }
        }
        Ok(self.deferred.front())
    }

    fn on_button(&mut self, event: ButtonPressEvent, state: ButtonState, callback: Callback<'_>) {
        if !self.windows.contains_key(&event.event) {
            return;
        }
        let window = WindowId(event.event);
        let mods = modifiers(event.state);

        match button_action(event.detail) {
            ButtonAction::Button(button) => callback(X11Event::MouseButton {
                window,
                button,
                state,
                mods,
            }),
            ButtonAction::Scroll { axis, amount } if state == ButtonState::Pressed => {
                callback(X11Event::Scroll { window, axis, amount })
            }
            ButtonAction::Scroll { .. } => debug_assert!(is_scroll_button(event.detail)),
            ButtonAction::Ignore => {}
        }
    }

    fn on_motion(&mut self, event: MotionNotifyEvent, callback: Callback<'_>) {
        let disabled_window = self.pointer.disabled;
        let Some(record) = self.windows.get_mut(&event.event) else {
            return;
        };
        let window = WindowId(event.event);
        let position: Point<i32, Logical> = (i32::from(event.event_x), i32::from(event.event_y)).into();

        // motion caused by our own warps is not reported
        if record.warp_target != Some(position) {
            if record.cursor_mode == CursorMode::Disabled {
                if disabled_window != Some(event.event) || record.raw_motion {
                    return;
                }
                let virtual_position =
                    disabled_motion(record.virtual_cursor_position, record.last_cursor_position, position);
                record.virtual_cursor_position = virtual_position;
                callback(X11Event::CursorMoved {
                    window,
                    position: virtual_position,
                });
            } else {
                record.virtual_cursor_position = position.to_f64();
                callback(X11Event::CursorMoved {
                    window,
                    position: position.to_f64(),
                });
            }
        }
        record.last_cursor_position = position;
    }

    fn on_raw_motion(&mut self, event: RawMotionEvent, callback: Callback<'_>) {
        let Some(window) = self.pointer.disabled else {
            return;
        };
        let Some(record) = self.windows.get_mut(&window) else {
            return;
        };
        if !record.raw_motion {
            return;
        }

        let delta = raw_motion_delta(&event.valuator_mask, &event.axisvalues_raw);
        record.virtual_cursor_position = record.virtual_cursor_position + delta;
        callback(X11Event::CursorMoved {
            window: WindowId(window),
            position: record.virtual_cursor_position,
        });
    }

    fn on_enter(&mut self, event: EnterNotifyEvent, callback: Callback<'_>) -> Result<(), X11Error> {
        let Some(record) = self.windows.get(&event.event) else {
            return Ok(());
        };
        // some window managers ignore the cursor defined for hidden mode until the pointer enters
        if record.cursor_mode == CursorMode::Hidden {
            self.update_cursor_image(event.event)?;
        }

        let window = WindowId(event.event);
        let position: Point<i32, Logical> = (i32::from(event.event_x), i32::from(event.event_y)).into();
        callback(X11Event::CursorEntered { window, entered: true });
        callback(X11Event::CursorMoved {
            window,
            position: position.to_f64(),
        });
        if let Some(record) = self.windows.get_mut(&event.event) {
            record.last_cursor_position = position;
        }
        Ok(())
    }

    fn on_configure(&mut self, event: ConfigureNotifyEvent, callback: Callback<'_>) -> Result<(), X11Error> {
        let Some(record) = self.windows.get(&event.window) else {
            return Ok(());
        };
        let window = WindowId(event.window);
        let geometry = record.geometry.clone();

        let size = (i32::from(event.width), i32::from(event.height)).into();
        if geometry.set_size(size) {
            callback(X11Event::Resized { window, size });
        }

        // Real ConfigureNotify events are relative to the parent, which is the frame of a reparenting
        // window manager. Synthetic ones and override-redirect windows use root coordinates.
        let position = if is_synthetic(event.response_type) || record.override_redirect {
            (i32::from(event.x), i32::from(event.y)).into()
        } else {
            self.query_position(event.window)?
        };
        if geometry.set_position(position) {
            callback(X11Event::Moved { window, position });
        }
        Ok(())
    }

    fn on_property(&mut self, event: PropertyNotifyEvent, callback: Callback<'_>) -> Result<(), X11Error> {
        if self.selection.is_transfer_event(&event) {
            return self.handle_transfer_property(&event);
        }

        if event.window == self.root {
            if event.atom == u32::from(AtomEnum::RESOURCE_MANAGER) {
                if let Some(scale) = self.reload_content_scale()? {
                    callback(X11Event::ContentScale { scale });
                }
            }
            return Ok(());
        }

        if event.state != Property::NEW_VALUE || !self.windows.contains_key(&event.window) {
            return Ok(());
        }
        let window = event.window;

        if event.atom == self.atoms.WM_STATE {
            let Some(minimized) = minimized_from_wm_state(self.query_wm_state(window)?) else {
                return Ok(());
            };
            let Some(record) = self.windows.get_mut(&window) else {
                return Ok(());
            };
            if !update_flag(&mut record.minimized, minimized) {
                return Ok(());
            }

            // an iconified fullscreen window gives its monitor back
            if let Some(fullscreen) = record.fullscreen {
                if minimized {
                    self.release_monitor(window)?;
                } else {
                    let mode = (!fullscreen.borderless).then(|| {
                        let size = fullscreen_size(self, window);
                        VideoMode {
                            width: size.0,
                            height: size.1,
                            ..VideoMode::default()
                        }
                    });
                    self.acquire_monitor(window, fullscreen.monitor, mode)?;
                }
            }
            callback(X11Event::Minimized {
                window: WindowId(window),
                minimized,
            });
        } else if Some(event.atom) == self.wm.wm_state {
            let state = self.query_net_wm_state(window)?;
            let maximized = self.is_maximized_state(&state);
            let Some(record) = self.windows.get_mut(&window) else {
                return Ok(());
            };
            if update_flag(&mut record.maximized, maximized) {
                callback(X11Event::Maximized {
                    window: WindowId(window),
                    maximized,
                });
            }
        }
        Ok(())
    }

    fn on_client_message(&mut self, event: ClientMessageEvent, callback: Callback<'_>) -> Result<(), X11Error> {
        if event.format != 32 || !self.windows.contains_key(&event.window) {
            return Ok(());
        }
        let window = event.window;
        let data = event.data.as_data32();
        let atoms = self.atoms;

        match classify_client_message(event.type_, &data, &atoms) {
            ClientMessageKind::Close => callback(X11Event::CloseRequested {
                window: WindowId(window),
            }),
            ClientMessageKind::Ping => {
                // The window manager checks whether we are still responsive.
                let mut reply = event;
                reply.window = self.root;
                self.conn.send_event(
                    false,
                    self.root,
                    EventMask::SUBSTRUCTURE_NOTIFY | EventMask::SUBSTRUCTURE_REDIRECT,
                    reply,
                )?;
                self.conn.flush()?;
            }
            ClientMessageKind::DndEnter => {
                let conn = self.conn.clone();
                self.dnd.enter(data, &atoms, |source| {
                    let reply = conn
                        .get_property(false, source, atoms.XdndTypeList, AtomEnum::ATOM, 0, u32::MAX / 4)?
                        .reply()?;
                    Ok(reply.value32().map(Iterator::collect).unwrap_or_default())
                })?;
            }
            ClientMessageKind::DndPosition => {
                let (x, y) = position_of(data);
                let translated = self.conn.translate_coordinates(self.root, window, x, y)?.reply()?;
                callback(X11Event::CursorMoved {
                    window: WindowId(window),
                    position: (f64::from(translated.dst_x), f64::from(translated.dst_y)).into(),
                });

                if let Some(action) = self.dnd.position(window, data, &atoms) {
                    self.perform_dnd_action(window, action)?;
                }
            }
            ClientMessageKind::DndDrop => {
                if let Some(action) = self.dnd.drop(window, data, &atoms) {
                    self.perform_dnd_action(window, action)?;
                }
            }
            ClientMessageKind::DndLeave => self.dnd.leave(data),
            ClientMessageKind::Other => trace!(window, type_ = event.type_, "Ignoring client message"),
        }
        Ok(())
    }

    fn perform_dnd_action(&self, target: Window, action: DndAction) -> Result<(), X11Error> {
        match action {
            DndAction::Reply {
                source,
                message_type,
                data,
            } => {
                let message = ClientMessageEvent::new(32, source, message_type, data);
                self.conn.send_event(false, source, EventMask::NO_EVENT, message)?;
            }
            DndAction::Convert { format, time } => {
                self.conn
                    .convert_selection(target, self.atoms.XdndSelection, format, self.atoms.XdndSelection, time)?;
            }
        }
        self.conn.flush()?;
        Ok(())
    }

    fn on_selection_notify(&mut self, event: SelectionNotifyEvent, callback: Callback<'_>) -> Result<(), X11Error> {
        if event.selection != self.atoms.XdndSelection || !self.windows.contains_key(&event.requestor) {
            return Ok(());
        }
        let window = event.requestor;

        let paths = if event.property == NONE {
            warn!(window, "The drag source failed to convert the dropped data");
            Vec::new()
        } else {
            let reply = self
                .conn
                .get_property(true, window, event.property, AtomEnum::ANY, 0, u32::MAX / 4)?
                .reply()?;
            parse_uri_list(&reply.value)
        };

        let success = !paths.is_empty();
        if success {
            debug!(window, count = paths.len(), "Files dropped");
            callback(X11Event::FileDrop {
                window: WindowId(window),
                paths,
            });
        }

        if let Some(action) = self.dnd.finish(window, success, &self.atoms) {
            self.perform_dnd_action(window, action)?;
        }
        Ok(())
    }
}

/// Minimization as reported by a `WM_STATE` value, `None` if the window is withdrawn.
fn minimized_from_wm_state(state: Option<u32>) -> Option<bool> {
    state.map(|state| state == ICONIC_STATE)
}

/// Stores a new state, returning whether it changed.
fn update_flag(flag: &mut bool, value: bool) -> bool {
    let changed = *flag != value;
    *flag = value;
    changed
}

/// What a client message sent to one of our windows asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClientMessageKind {
    Close,
    Ping,
    DndEnter,
    DndPosition,
    DndDrop,
    DndLeave,
    Other,
}

fn classify_client_message(type_: Atom, data: &[u32; 5], atoms: &Atoms) -> ClientMessageKind {
    if type_ == atoms.WM_PROTOCOLS {
        match data[0] {
            protocol if protocol == atoms.WM_DELETE_WINDOW => ClientMessageKind::Close,
            protocol if protocol == atoms._NET_WM_PING => ClientMessageKind::Ping,
            _ => ClientMessageKind::Other,
        }
    } else if type_ == atoms.XdndEnter {
        ClientMessageKind::DndEnter
    } else if type_ == atoms.XdndPosition {
        ClientMessageKind::DndPosition
    } else if type_ == atoms.XdndDrop {
        ClientMessageKind::DndDrop
    } else if type_ == atoms.XdndLeave {
        ClientMessageKind::DndLeave
    } else {
        ClientMessageKind::Other
    }
}

/// The mode size a fullscreen window asks for when it gets its monitor back.
fn fullscreen_size(backend: &X11Backend, window: Window) -> (u32, u32) {
    backend
        .windows
        .get(&window)
        .map(|record| {
            let size = record.geometry.size();
            (size.w.max(0) as u32, size.h.max(0) as u32)
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthetic_events() {
        assert!(is_synthetic(0x80 | 22));
        assert!(!is_synthetic(22));
    }

    #[test]
    fn wm_state_values() {
        assert_eq!(minimized_from_wm_state(Some(ICONIC_STATE)), Some(true));
        assert_eq!(minimized_from_wm_state(Some(1)), Some(false));
        assert_eq!(minimized_from_wm_state(None), None);
    }

    #[test]
    fn state_changes_are_reported_once() {
        let mut minimized = false;
        assert!(update_flag(&mut minimized, true));
        assert!(minimized);
        assert!(!update_flag(&mut minimized, true));
        assert!(update_flag(&mut minimized, false));
        assert!(!update_flag(&mut minimized, false));
    }

    fn atoms() -> Atoms {
        let mut atoms = Atoms::default();
        atoms.WM_PROTOCOLS = 1;
        atoms.WM_DELETE_WINDOW = 2;
        atoms._NET_WM_PING = 3;
        atoms.XdndEnter = 4;
        atoms.XdndPosition = 5;
        atoms.XdndDrop = 6;
        atoms.XdndLeave = 7;
        atoms.XdndStatus = 8;
        atoms
    }

    #[test]
    fn window_manager_protocols() {
        let atoms = atoms();
        assert_eq!(classify_client_message(1, &[2, 0, 0, 0, 0], &atoms), ClientMessageKind::Close);
        assert_eq!(classify_client_message(1, &[3, 0, 0, 0, 0], &atoms), ClientMessageKind::Ping);
        // WM_TAKE_FOCUS and friends are not handled
        assert_eq!(classify_client_message(1, &[99, 0, 0, 0, 0], &atoms), ClientMessageKind::Other);
    }

    #[test]
    fn xdnd_routing() {
        let atoms = atoms();
        let data = [0x0040_0001, 5 << 24, 0, 0, 0];
        assert_eq!(classify_client_message(4, &data, &atoms), ClientMessageKind::DndEnter);
        assert_eq!(classify_client_message(5, &data, &atoms), ClientMessageKind::DndPosition);
        assert_eq!(classify_client_message(6, &data, &atoms), ClientMessageKind::DndDrop);
        assert_eq!(classify_client_message(7, &data, &atoms), ClientMessageKind::DndLeave);
        // messages we only send
        assert_eq!(classify_client_message(8, &data, &atoms), ClientMessageKind::Other);
    }
}
