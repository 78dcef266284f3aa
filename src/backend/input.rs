//! Input types carried by window events

use bitflags::bitflags;

/// What happened to a key
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub enum KeyState {
    /// The key went up
    Released,
    /// The key went down
    Pressed,
    /// The key is held and the server repeats it
    Repeated,
}

/// A button of a pointer device
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub enum MouseButton {
    /// Primary button
    Left,
    /// Wheel click
    Middle,
    /// Secondary button
    Right,
    /// Any further button, by zero-based index
    ///
    /// Indices 0 to 2 are taken by the buttons above, so the first extra button of a mouse is
    /// reported as `Other(3)`.
    Other(u8),
}

/// Whether a mouse button went down or up
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub enum ButtonState {
    /// The button went up
    Released,
    /// The button went down
    Pressed,
}

/// Direction of a scroll step
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub enum Axis {
    /// Up and down
    Vertical,
    /// Left and right
    Horizontal,
}

bitflags! {
    /// Modifier keys and locks active while an input event happened
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Modifiers: u8 {
        /// Either shift key
        const SHIFT = 1 << 0;
        /// Either control key
        const CONTROL = 1 << 1;
        /// Either alt key
        const ALT = 1 << 2;
        /// Either super (logo) key
        const SUPER = 1 << 3;
        /// Caps lock is active
        const CAPS_LOCK = 1 << 4;
        /// Num lock is active
        const NUM_LOCK = 1 << 5;
    }
}
