//! Windowing backends
//!
//! The [`x11`] module provides a native backend on top of an X11 connection: windows, monitors,
//! the keyboard layout, selections and drag and drop, with every event translated into
//! [`x11::X11Event`]s. The [`input`] module holds the input types those events carry.

pub mod input;
pub mod x11;
