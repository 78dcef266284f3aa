//! Translation of core X11 input details into backend input types.

use x11rb::protocol::{
    xproto::{KeyButMask, KeyPressEvent, Timestamp},
    Event,
};

use crate::backend::input::{Axis, KeyState, Modifiers, MouseButton};

/// What a core pointer button number stands for.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum ButtonAction {
    /// A real button.
    Button(MouseButton),
    /// One tick of a scroll wheel.
    Scroll { axis: Axis, amount: f64 },
    /// Button 0 is not a thing, but servers can be creative.
    Ignore,
}

// X11 decided to associate scroll wheel with a button, 4, 5, 6 and 7 for
// up, down, left and right. For scrolling, a press event is emitted and a
// release is then immediately followed. This means releases of those buttons
// carry no information and are ignored by the caller.
//
// 1 => MouseButton::Left
// 2 => MouseButton::Middle
// 3 => MouseButton::Right
// 4 => Axis::Vertical +1.0
// 5 => Axis::Vertical -1.0
// 6 => Axis::Horizontal +1.0
// 7 => Axis::Horizontal -1.0
// Others => MouseButton::Other, skipping the four wheel buttons
pub(crate) fn button_action(detail: u8) -> ButtonAction {
    match detail {
        1 => ButtonAction::Button(MouseButton::Left),
        2 => ButtonAction::Button(MouseButton::Middle),
        3 => ButtonAction::Button(MouseButton::Right),
        4 => ButtonAction::Scroll {
            axis: Axis::Vertical,
            amount: 1.0,
        },
        5 => ButtonAction::Scroll {
            axis: Axis::Vertical,
            amount: -1.0,
        },
        6 => ButtonAction::Scroll {
            axis: Axis::Horizontal,
            amount: 1.0,
        },
        7 => ButtonAction::Scroll {
            axis: Axis::Horizontal,
            amount: -1.0,
        },
        0 => ButtonAction::Ignore,
        other => ButtonAction::Button(MouseButton::Other(other - 1 - 4)),
    }
}

/// Whether a button number belongs to a scroll wheel.
pub(crate) fn is_scroll_button(detail: u8) -> bool {
    (4..=7).contains(&detail)
}

pub(crate) fn modifiers(state: KeyButMask) -> Modifiers {
    let mut mods = Modifiers::empty();
    if state.contains(KeyButMask::SHIFT) {
        mods |= Modifiers::SHIFT;
    }
    if state.contains(KeyButMask::CONTROL) {
        mods |= Modifiers::CONTROL;
    }
    if state.contains(KeyButMask::MOD1) {
        mods |= Modifiers::ALT;
    }
    if state.contains(KeyButMask::MOD4) {
        mods |= Modifiers::SUPER;
    }
    if state.contains(KeyButMask::LOCK) {
        mods |= Modifiers::CAPS_LOCK;
    }
    if state.contains(KeyButMask::MOD2) {
        mods |= Modifiers::NUM_LOCK;
    }
    mods
}

/// Decides whether a key press is new, given the time of the last accepted press of that key.
///
/// Timestamps are server milliseconds that wrap around after ~49 days, so the difference is
/// compared instead of the raw values. The server never sends a timestamp of zero, which marks a
/// key that was never pressed.
pub(crate) fn is_new_key_press(time: Timestamp, last_press: Timestamp) -> bool {
    let diff = time.wrapping_sub(last_press);
    diff == time || (diff > 0 && diff < (1 << 31))
}

/// Whether a release directly followed by a press of the same key is server auto-repeat.
pub(crate) fn is_auto_repeat(release_time: Timestamp, next_press_time: Timestamp) -> bool {
    next_press_time.wrapping_sub(release_time) < 20
}

/// Whether a key release is the first half of a server auto-repeat pair.
///
/// `next` is the event queued right behind the release. With detectable auto-repeat the server
/// sends no releases for held keys, so every release is real.
pub(crate) fn is_repeat_release(release: &KeyPressEvent, next: Option<&Event>, detectable: bool) -> bool {
    match next {
        Some(Event::KeyPress(next)) if !detectable => {
            next.event == release.event && next.detail == release.detail && is_auto_repeat(release.time, next.time)
        }
        _ => false,
    }
}

/// Pressed keys of a window, by scancode.
#[derive(Debug, Clone)]
pub(crate) struct KeyTracker {
    press_times: [Timestamp; 256],
    down: [bool; 256],
}

impl Default for KeyTracker {
    fn default() -> Self {
        KeyTracker {
            press_times: [0; 256],
            down: [false; 256],
        }
    }
}

impl KeyTracker {
    /// Records a key press, returning `None` for a duplicate of an already seen press.
    ///
    /// Input methods may resend a press with its original timestamp.
    pub fn press(&mut self, scancode: u8, time: Timestamp) -> Option<KeyState> {
        let index = usize::from(scancode);
        if !is_new_key_press(time, self.press_times[index]) {
            return None;
        }
        self.press_times[index] = time;

        let held = std::mem::replace(&mut self.down[index], true);
        Some(if held { KeyState::Repeated } else { KeyState::Pressed })
    }

    pub fn release(&mut self, scancode: u8) {
        self.down[usize::from(scancode)] = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_buttons() {
        assert_eq!(button_action(1), ButtonAction::Button(MouseButton::Left));
        assert_eq!(button_action(2), ButtonAction::Button(MouseButton::Middle));
        assert_eq!(button_action(3), ButtonAction::Button(MouseButton::Right));
        assert_eq!(button_action(8), ButtonAction::Button(MouseButton::Other(3)));
        assert_eq!(button_action(9), ButtonAction::Button(MouseButton::Other(4)));
    }

    #[test]
    fn wheel_buttons() {
        assert_eq!(
            button_action(4),
            ButtonAction::Scroll {
                axis: Axis::Vertical,
                amount: 1.0
            }
        );
        assert_eq!(
            button_action(5),
            ButtonAction::Scroll {
                axis: Axis::Vertical,
                amount: -1.0
            }
        );
        assert_eq!(
            button_action(6),
            ButtonAction::Scroll {
                axis: Axis::Horizontal,
                amount: 1.0
            }
        );
        assert_eq!(
            button_action(7),
            ButtonAction::Scroll {
                axis: Axis::Horizontal,
                amount: -1.0
            }
        );
        assert!((4..=7).all(is_scroll_button));
        assert!(!is_scroll_button(3));
        assert!(!is_scroll_button(8));
    }

    #[test]
    fn identical_timestamps_collapse() {
        assert!(is_new_key_press(1000, 0));
        assert!(!is_new_key_press(1000, 1000));
        assert!(is_new_key_press(1001, 1000));
    }

    #[test]
    fn older_press_is_rejected() {
        assert!(!is_new_key_press(999, 1000));
    }

    #[test]
    fn press_time_wraps_around() {
        assert!(is_new_key_press(5, u32::MAX - 5));
        assert!(!is_new_key_press(u32::MAX - 5, 5));
    }

    #[test]
    fn auto_repeat_window() {
        assert!(is_auto_repeat(100, 100));
        assert!(is_auto_repeat(100, 119));
        assert!(!is_auto_repeat(100, 120));
    }

    fn key_event(window: u32, scancode: u8, time: Timestamp) -> KeyPressEvent {
        KeyPressEvent {
            event: window,
            detail: scancode,
            time,
            ..KeyPressEvent::default()
        }
    }

    #[test]
    fn duplicate_press_collapses() {
        let mut keys = KeyTracker::default();
        assert_eq!(keys.press(38, 1000), Some(KeyState::Pressed));
        assert_eq!(keys.press(38, 1000), None);
        assert_eq!(keys.press(38, 999), None);
        // another key at the same time is independent
        assert_eq!(keys.press(39, 1000), Some(KeyState::Pressed));
    }

    #[test]
    fn held_key_repeats_until_released() {
        let mut keys = KeyTracker::default();
        assert_eq!(keys.press(38, 1000), Some(KeyState::Pressed));
        assert_eq!(keys.press(38, 1030), Some(KeyState::Repeated));
        assert_eq!(keys.press(38, 1060), Some(KeyState::Repeated));
        keys.release(38);
        assert_eq!(keys.press(38, 2000), Some(KeyState::Pressed));
    }

    #[test]
    fn repeat_release_pairs() {
        let release = key_event(7, 38, 1000);
        let repeat = Event::KeyPress(key_event(7, 38, 1000));
        assert!(is_repeat_release(&release, Some(&repeat), false));

        // detectable auto-repeat sends no fake releases
        assert!(!is_repeat_release(&release, Some(&repeat), true));
        // a later press is the user typing again
        let later = Event::KeyPress(key_event(7, 38, 1200));
        assert!(!is_repeat_release(&release, Some(&later), false));
        // other key or other window
        let other_key = Event::KeyPress(key_event(7, 39, 1000));
        let other_window = Event::KeyPress(key_event(8, 38, 1000));
        assert!(!is_repeat_release(&release, Some(&other_key), false));
        assert!(!is_repeat_release(&release, Some(&other_window), false));
        // nothing queued, or not a press
        assert!(!is_repeat_release(&release, None, false));
        let other_event = Event::KeyRelease(key_event(7, 38, 1000));
        assert!(!is_repeat_release(&release, Some(&other_event), false));
    }

    #[test]
    fn modifier_mask() {
        let mods = modifiers(KeyButMask::SHIFT | KeyButMask::MOD1 | KeyButMask::MOD2);
        assert_eq!(mods, Modifiers::SHIFT | Modifiers::ALT | Modifiers::NUM_LOCK);
    }
}
