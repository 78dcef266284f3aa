use std::{cell::Cell, fmt, io};

use x11rb::{
    connection::RequestConnection,
    cookie::{Cookie, VoidCookie},
    rust_connection::{ConnectError, ConnectionError, ReplyError, ReplyOrIdError},
    x11_utils::TryParse,
};

/// Category of a failure, as reported to the error callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A native call failed.
    PlatformError,
    /// An allocation needed to build a request failed.
    OutOfMemory,
    /// A required extension or service is missing for this request.
    ApiUnavailable,
    /// The platform cannot perform this action at all.
    FeatureUnavailable,
    /// A bad scancode, key or parameter was supplied.
    InvalidValue,
    /// No acceptable selection target was offered.
    FormatUnavailable,
    /// No cursor matching the requested shape exists.
    CursorUnavailable,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ErrorKind::PlatformError => "platform error",
            ErrorKind::OutOfMemory => "out of memory",
            ErrorKind::ApiUnavailable => "api unavailable",
            ErrorKind::FeatureUnavailable => "feature unavailable",
            ErrorKind::InvalidValue => "invalid value",
            ErrorKind::FormatUnavailable => "format unavailable",
            ErrorKind::CursorUnavailable => "cursor unavailable",
        })
    }
}

/// An error emitted by the X11 backend.
#[derive(Debug, thiserror::Error)]
pub enum X11Error {
    /// Connecting to the X server failed.
    #[error("Connecting to the X server failed")]
    ConnectionFailed(#[from] ConnectError),

    /// Connection to X server was lost.
    #[error("Connection to the X server was lost")]
    ConnectionLost,

    /// A required X11 extension was not present or has the wrong version.
    #[error("{0}")]
    MissingExtension(#[from] MissingExtensionError),

    /// Some protocol error occurred.
    #[error("X11 protocol error: {0}")]
    Protocol(#[from] ReplyOrIdError),

    /// Creating the window failed.
    #[error("Creating the window failed")]
    CreateWindow(#[from] CreateWindowError),

    /// The window does not exist or was already destroyed.
    #[error("The window {0:#x} is unknown to this backend")]
    InvalidWindow(u32),

    /// The monitor is not (or no longer) connected.
    #[error("The monitor {0:#x} is unknown to this backend")]
    InvalidMonitor(u32),

    /// The cursor does not exist or was already destroyed.
    #[error("The cursor {0:#x} is unknown to this backend")]
    InvalidCursor(u32),

    /// A scancode outside of the valid range was queried.
    #[error("Invalid scancode {0}")]
    InvalidScancode(i32),

    /// A parameter was outside of its accepted range.
    #[error("Invalid value: {0}")]
    InvalidValue(&'static str),

    /// Another client won the race for a selection.
    #[error("Failed to become owner of the {0} selection")]
    SelectionOwnership(&'static str),

    /// The selection owner offered none of the accepted targets.
    #[error("Failed to convert the {0} selection to a string")]
    FormatUnavailable(&'static str),

    /// The selection owner did not answer in time.
    #[error("Timed out waiting for the selection owner")]
    SelectionTimeout,

    /// An incremental selection transfer exceeded the configured byte budget.
    #[error("Selection transfer exceeded {0} bytes")]
    SelectionTooLarge(usize),

    /// An operation requires an extension the X server does not provide.
    #[error("{0} is not available on this X server")]
    ApiUnavailable(&'static str),

    /// An operation requires window manager cooperation that is not available.
    #[error("{0}")]
    WindowManagerRequired(&'static str),

    /// The platform cannot perform this action.
    #[error("{0} is not supported on X11")]
    FeatureUnavailable(&'static str),

    /// No cursor for the requested shape could be found.
    #[error("No cursor found for shape {0}")]
    CursorUnavailable(&'static str),

    /// The X server refused to program a video mode.
    #[error("The X server refused the video mode change")]
    VideoModeRejected,

    /// An image had a size that does not fit its pixel buffer.
    #[error("Image of {width}x{height} does not match a buffer of {len} bytes")]
    InvalidImage {
        /// Width of the image.
        width: u32,
        /// Height of the image.
        height: u32,
        /// Length of the pixel buffer.
        len: usize,
    },

    /// Waiting on the connection descriptors failed.
    #[error("Failed to wait for events")]
    Io(#[from] io::Error),

    /// The input method server failed.
    #[error("Input method error: {0}")]
    InputMethod(String),
}

impl X11Error {
    /// Returns the category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            X11Error::MissingExtension(_) | X11Error::ApiUnavailable(_) => ErrorKind::ApiUnavailable,
            X11Error::Protocol(ReplyOrIdError::IdsExhausted) => ErrorKind::OutOfMemory,
            X11Error::Protocol(ReplyOrIdError::ConnectionError(ConnectionError::InsufficientMemory)) => {
                ErrorKind::OutOfMemory
            }
            X11Error::InvalidWindow(_)
            | X11Error::InvalidMonitor(_)
            | X11Error::InvalidCursor(_)
            | X11Error::InvalidScancode(_)
            | X11Error::InvalidValue(_)
            | X11Error::InvalidImage { .. } => ErrorKind::InvalidValue,
            X11Error::FormatUnavailable(_) => ErrorKind::FormatUnavailable,
            X11Error::FeatureUnavailable(_) => ErrorKind::FeatureUnavailable,
            X11Error::CursorUnavailable(_) => ErrorKind::CursorUnavailable,
            X11Error::ConnectionFailed(_)
            | X11Error::ConnectionLost
            | X11Error::Protocol(_)
            | X11Error::CreateWindow(_)
            | X11Error::SelectionOwnership(_)
            | X11Error::SelectionTimeout
            | X11Error::SelectionTooLarge(_)
            | X11Error::WindowManagerRequired(_)
            | X11Error::VideoModeRejected
            | X11Error::Io(_)
            | X11Error::InputMethod(_) => ErrorKind::PlatformError,
        }
    }
}

impl From<xim::ClientError> for X11Error {
    fn from(err: xim::ClientError) -> Self {
        X11Error::InputMethod(err.to_string())
    }
}

impl From<ReplyError> for X11Error {
    fn from(err: ReplyError) -> Self {
        Self::Protocol(err.into())
    }
}

impl From<ConnectionError> for X11Error {
    fn from(err: ConnectionError) -> Self {
        Self::Protocol(err.into())
    }
}

impl From<rustix::io::Errno> for X11Error {
    fn from(err: rustix::io::Errno) -> Self {
        Self::Io(err.into())
    }
}

/// An error that occurs when a required X11 extension is not present.
#[derive(Debug, thiserror::Error)]
pub enum MissingExtensionError {
    /// An extension was not found.
    #[error("Extension \"{name}\" version {major}.{minor} was not found.")]
    NotFound {
        /// The name of the required extension.
        name: &'static str,
        /// The minimum required major version of extension.
        major: u32,
        /// The minimum required minor version of extension.
        minor: u32,
    },

    /// An extension was present, but the version is too low.
    #[error("Extension \"{name}\" version {required_major}.{required_minor} is required but only version {available_major}.{available_minor} is available.")]
    WrongVersion {
        /// The name of the extension.
        name: &'static str,
        /// The minimum required major version of extension.
        required_major: u32,
        /// The minimum required minor version of extension.
        required_minor: u32,
        /// The major version of the extension available on the X server.
        available_major: u32,
        /// The minor version of the extension available on the X server.
        available_minor: u32,
    },
}

/// An error which may occur when creating an X11 window.
#[derive(Debug, thiserror::Error)]
pub enum CreateWindowError {
    /// No visual fulfilling the requirements was found.
    #[error("No visual fulfilling the requirements was found")]
    NoVisual,

    /// The X server refused to create the window.
    #[error("The X server refused to create the window (error code {0})")]
    Refused(u8),
}

/// Single-slot capture of the last synchronous protocol error.
///
/// Only one [`ErrorGrab`] may be engaged at a time. The grab is released when the guard is
/// dropped, on every exit path.
#[derive(Debug, Default)]
pub(crate) struct ErrorSlot {
    engaged: Cell<bool>,
    last_code: Cell<u8>,
}

impl ErrorSlot {
    /// Engages the grab and clears the recorded code.
    pub fn grab(&self) -> ErrorGrab<'_> {
        debug_assert!(!self.engaged.get(), "error grab is already engaged");
        self.engaged.set(true);
        self.last_code.set(0);
        ErrorGrab { slot: self }
    }

    pub fn is_engaged(&self) -> bool {
        self.engaged.get()
    }

    /// Code of the last error captured by a grab, `0` for success.
    pub fn last_code(&self) -> u8 {
        self.last_code.get()
    }
}

/// Guard returned by [`ErrorSlot::grab`].
#[derive(Debug)]
pub(crate) struct ErrorGrab<'a> {
    slot: &'a ErrorSlot,
}

impl<'a> ErrorGrab<'a> {
    /// Waits for the outcome of a request and records its error code, if any.
    pub fn check<C: RequestConnection>(&self, cookie: VoidCookie<'_, C>) -> Result<(), ReplyError> {
        let result = cookie.check();
        if let Err(ReplyError::X11Error(ref err)) = result {
            self.slot.last_code.set(err.error_code);
        }
        result
    }

    /// Waits for a reply and records the error code of a failed request, if any.
    pub fn reply<C: RequestConnection, R: TryParse>(&self, cookie: Cookie<'_, C, R>) -> Result<R, ReplyError> {
        let result = cookie.reply();
        if let Err(ReplyError::X11Error(ref err)) = result {
            self.slot.last_code.set(err.error_code);
        }
        result
    }

    /// Code captured so far, `0` for success.
    pub fn code(&self) -> u8 {
        self.slot.last_code.get()
    }
}

impl<'a> Drop for ErrorGrab<'a> {
    fn drop(&mut self) {
        self.slot.engaged.set(false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grab_is_released_on_drop() {
        let slot = ErrorSlot::default();
        {
            let _grab = slot.grab();
            assert!(slot.is_engaged());
        }
        assert!(!slot.is_engaged());
    }

    #[test]
    fn grab_is_released_on_early_return() {
        fn failing(slot: &ErrorSlot) -> Result<(), ()> {
            let _grab = slot.grab();
            Err(())
        }

        let slot = ErrorSlot::default();
        assert!(failing(&slot).is_err());
        assert!(!slot.is_engaged());
        // a new grab can be taken afterwards
        let _grab = slot.grab();
    }

    #[test]
    fn error_kinds() {
        assert_eq!(X11Error::SelectionTimeout.kind(), ErrorKind::PlatformError);
        assert_eq!(
            X11Error::InputMethod(String::from("server gone")).kind(),
            ErrorKind::PlatformError
        );
        assert_eq!(
            X11Error::FormatUnavailable("CLIPBOARD").kind(),
            ErrorKind::FormatUnavailable
        );
        assert_eq!(X11Error::InvalidScancode(-1).kind(), ErrorKind::InvalidValue);
        assert_eq!(
            X11Error::Protocol(ReplyOrIdError::IdsExhausted).kind(),
            ErrorKind::OutOfMemory
        );
        assert_eq!(
            X11Error::CursorUnavailable("wait").kind(),
            ErrorKind::CursorUnavailable
        );
    }
}
