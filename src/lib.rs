#![cfg_attr(docsrs, feature(doc_auto_cfg))]
#![warn(missing_docs, missing_debug_implementations, rust_2018_idioms)]
// Allow acronyms like RandR and XKB
#![allow(clippy::upper_case_acronyms)]

//! # x11-windowing: native X11 windows without Xlib
//!
//! This crate talks to an X server directly over [`x11rb`] and provides what an application needs
//! to open and manage its own windows: window lifecycle and window manager hints, monitors and
//! video modes through RandR, keyboard layouts through XKB, the clipboard and primary selection,
//! file drops over Xdnd, cursor images and raw pointer motion.
//!
//! ## Structure of the crate
//!
//! - [`backend::x11`] contains the [`X11Backend`](backend::x11::X11Backend), the single context
//!   every operation goes through, and the [`X11Event`](backend::x11::X11Event)s it emits.
//! - [`backend::input`] contains the input types carried by those events.
//! - [`utils`] contains geometry types and the [`calloop`] source used to integrate the connection
//!   into an event loop.
//!
//! ### The event loop
//!
//! The backend can be driven by hand with `poll_events` and `wait_events`, or inserted into a
//! [`calloop`] event loop, where it behaves like any other event source.
//!
//! ### Logging
//!
//! Diagnostics go through [`tracing`]: connection setup and extension discovery at `info`, protocol
//! state changes at `debug`, single events at `trace`. The crate never installs a subscriber, that is
//! left to the application. To strip the most verbose levels out of release builds, enable the
//! static level features of [`tracing`] in the binary crate:
//!
//! ```toml
//! [dependencies]
//! tracing = { version = "0.1", features = ["release_max_level_debug"] }
//! ```

pub mod backend;
pub mod utils;
