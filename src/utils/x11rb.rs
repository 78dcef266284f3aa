//! Helper utilities for using an x11rb connection as an event source in calloop.

use std::{io, os::unix::io::OwnedFd};

use calloop::{generic::Generic, EventSource, Interest, Mode, Poll, PostAction, Readiness, Token, TokenFactory};

/// Readiness of the descriptors an X11 client waits on.
///
/// This watches the connection socket and the read end of a wake-up pipe. Readability of the
/// socket is not enough to see every event: replies to requests can read events into the
/// connection's internal queue, so the owner has to drain that queue whenever this source fires and
/// before going to sleep.
#[derive(Debug)]
pub struct X11Source {
    connection: Generic<OwnedFd>,
    wake: Generic<OwnedFd>,
}

impl X11Source {
    /// Creates a source from duplicates of the connection and wake-up descriptors.
    pub fn new(connection: OwnedFd, wake: OwnedFd) -> Self {
        Self {
            connection: Generic::new(connection, Interest::READ, Mode::Level),
            wake: Generic::new(wake, Interest::READ, Mode::Level),
        }
    }
}

/// Which descriptor became ready.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum X11Readiness {
    /// The connection socket is readable.
    Connection,
    /// Somebody wrote to the wake-up pipe.
    Wake,
}

impl EventSource for X11Source {
    type Event = X11Readiness;
    type Metadata = ();
    type Ret = ();
    type Error = io::Error;

    fn process_events<F>(&mut self, readiness: Readiness, token: Token, mut callback: F) -> io::Result<PostAction>
    where
        F: FnMut(Self::Event, &mut Self::Metadata) -> Self::Ret,
    {
        self.connection.process_events(readiness, token, |_, _| {
            callback(X11Readiness::Connection, &mut ());
            Ok(PostAction::Continue)
        })?;

        self.wake.process_events(readiness, token, |_, _| {
            callback(X11Readiness::Wake, &mut ());
            Ok(PostAction::Continue)
        })
    }

    fn register(&mut self, poll: &mut Poll, token_factory: &mut TokenFactory) -> calloop::Result<()> {
        self.connection.register(poll, token_factory)?;
        self.wake.register(poll, token_factory)
    }

    fn reregister(&mut self, poll: &mut Poll, token_factory: &mut TokenFactory) -> calloop::Result<()> {
        self.connection.reregister(poll, token_factory)?;
        self.wake.reregister(poll, token_factory)
    }

    fn unregister(&mut self, poll: &mut Poll) -> calloop::Result<()> {
        self.wake.unregister(poll)?;
        self.connection.unregister(poll)
    }
}
