//! Waiting for and draining events.

use std::{
    collections::VecDeque,
    os::unix::io::OwnedFd,
    sync::Arc,
    time::{Duration, Instant},
};

use rustix::{
    event::{poll, PollFd, PollFlags},
    io::Errno,
};
use tracing::{debug, trace};
use x11rb::{connection::Connection, protocol::Event};

use super::{X11Backend, X11Error, X11Event};

/// Wakes up a thread blocked in [`X11Backend::wait_events`].
///
/// Can be cloned and sent to other threads.
#[derive(Debug, Clone)]
pub struct EventLoopWaker {
    pipe: Arc<OwnedFd>,
}

impl EventLoopWaker {
    /// Makes the next or current [`X11Backend::wait_events`] return.
    pub fn wake(&self) -> Result<(), X11Error> {
        match rustix::io::write(&*self.pipe, &[0]) {
            // a full pipe already has a wake-up pending
            Ok(_) | Err(Errno::AGAIN) => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

fn poll_timeout(deadline: Option<Instant>) -> i32 {
    match deadline {
        None => -1,
        Some(deadline) => {
            let remaining = deadline.saturating_duration_since(Instant::now());
            // round up, so a sub-millisecond rest does not spin
            let millis = (remaining.as_micros() + 999) / 1000;
            millis.min(i32::MAX as u128) as i32
        }
    }
}

/// Discards everything readable from a non-blocking descriptor.
fn drain(fd: &OwnedFd) {
    let mut buf = [0u8; 64];
    while let Ok(len) = rustix::io::read(fd, &mut buf) {
        if len < buf.len() {
            break;
        }
    }
}

/// Drops queued events matching `predicate`, keeping the others in order.
fn discard_matching<P>(queue: &mut VecDeque<Event>, mut predicate: P) -> usize
where
    P: FnMut(&Event) -> bool,
{
    let before = queue.len();
    queue.retain(|event| !predicate(event));
    before - queue.len()
}

impl X11Backend {
    /// A handle to wake up [`X11Backend::wait_events`] from another thread.
    pub fn waker(&self) -> EventLoopWaker {
        EventLoopWaker {
            pipe: self.wake_write.clone(),
        }
    }

    /// Watches a device hot-plug descriptor, reported as [`X11Event::DeviceHotplug`].
    ///
    /// The descriptor should be non-blocking; pending data is discarded on readiness.
    pub fn set_hotplug_fd(&mut self, fd: Option<OwnedFd>) {
        self.hotplug = fd;
    }

    /// The next deferred or queued event, without blocking.
    pub(crate) fn next_event(&mut self) -> Result<Option<Event>, X11Error> {
        if let Some(event) = self.deferred.pop_front() {
            return Ok(Some(event));
        }
        Ok(self.conn.poll_for_event()?)
    }

    /// Processes every pending event without blocking.
    #[profiling::function]
    pub fn poll_events<F>(&mut self, mut callback: F) -> Result<(), X11Error>
    where
        F: FnMut(X11Event),
    {
        self.checked_mut(|this| {
            drain(&this.wake_read);

            while let Some(event) = this.next_event()? {
                this.process_event(event, &mut callback);
            }

            this.recenter_disabled_cursor()?;
            this.conn.flush()?;
            Ok(())
        })
    }

    /// Waits until an event arrives or `timeout` passes, then processes every pending event.
    ///
    /// `None` waits indefinitely. Returns early when woken through an [`EventLoopWaker`].
    pub fn wait_events<F>(&mut self, timeout: Option<Duration>, mut callback: F) -> Result<(), X11Error>
    where
        F: FnMut(X11Event),
    {
        let hotplug = self.checked_mut(|this| this.wait_for_readiness(timeout))?;
        if hotplug {
            callback(X11Event::DeviceHotplug);
        }
        self.poll_events(callback)
    }

    /// Blocks on the connection, the wake-up pipe and the hot-plug descriptor.
    ///
    /// Returns whether the hot-plug descriptor became readable.
    fn wait_for_readiness(&mut self, timeout: Option<Duration>) -> Result<bool, X11Error> {
        if !self.deferred.is_empty() {
            return Ok(false);
        }
        // events read along with replies never make the socket readable
        if let Some(event) = self.conn.poll_for_queued_event()? {
            self.deferred.push_back(event);
            return Ok(false);
        }
        self.conn.flush()?;

        let deadline = timeout.map(|timeout| Instant::now() + timeout);
        loop {
            let mut fds = vec![
                PollFd::new(self.conn.stream(), PollFlags::IN),
                PollFd::new(&self.wake_read, PollFlags::IN),
            ];
            if let Some(hotplug) = &self.hotplug {
                fds.push(PollFd::new(hotplug, PollFlags::IN));
            }

            match poll(&mut fds, poll_timeout(deadline)) {
                Ok(_) => {
                    let hotplug = fds
                        .get(2)
                        .map_or(false, |fd| fd.revents().contains(PollFlags::IN));
                    drop(fds);

                    if hotplug {
                        if let Some(fd) = &self.hotplug {
                            debug!("Device hot-plug notification");
                            drain(fd);
                        }
                    }
                    return Ok(hotplug);
                }
                Err(Errno::INTR) => continue,
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// Forgets deferred events matching `predicate`.
    pub(crate) fn discard_deferred<P>(&mut self, predicate: P)
    where
        P: FnMut(&Event) -> bool,
    {
        let discarded = discard_matching(&mut self.deferred, predicate);
        if discarded > 0 {
            trace!(discarded, "Discarded stale events");
        }
    }

    /// Waits for the first event matching `predicate`, at most for `timeout`.
    ///
    /// Events that do not match are kept, in order, for the next call to
    /// [`X11Backend::poll_events`]. Returns `None` when the timeout passes.
    pub fn next_matching_event<P>(&mut self, mut predicate: P, timeout: Duration) -> Result<Option<Event>, X11Error>
    where
        P: FnMut(&Event) -> bool,
    {
        if let Some(index) = self.deferred.iter().position(&mut predicate) {
            return Ok(self.deferred.remove(index));
        }
        self.conn.flush()?;

        let deadline = Instant::now() + timeout;
        loop {
            while let Some(event) = self.conn.poll_for_event()? {
                if predicate(&event) {
                    return Ok(Some(event));
                }
                trace!(?event, "Deferring event");
                self.deferred.push_back(event);
            }

            if Instant::now() >= deadline {
                return Ok(None);
            }

            let mut fds = [PollFd::new(self.conn.stream(), PollFlags::IN)];
            match poll(&mut fds, poll_timeout(Some(deadline))) {
                Ok(_) | Err(Errno::INTR) => {}
                Err(err) => return Err(err.into()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustix::pipe::{pipe_with, PipeFlags};

    #[test]
    fn infinite_timeout() {
        assert_eq!(poll_timeout(None), -1);
    }

    #[test]
    fn timeout_rounds_up() {
        let deadline = Instant::now() + Duration::from_micros(1500);
        let timeout = poll_timeout(Some(deadline));
        assert!((1..=2).contains(&timeout));

        // deadline in the past
        assert_eq!(poll_timeout(Some(Instant::now() - Duration::from_secs(1))), 0);
    }

    #[test]
    fn waker_writes_to_pipe() {
        let (read, write) = pipe_with(PipeFlags::NONBLOCK | PipeFlags::CLOEXEC).unwrap();
        let waker = EventLoopWaker { pipe: Arc::new(write) };
        let clone = waker.clone();

        waker.wake().unwrap();
        clone.wake().unwrap();

        let mut buf = [0u8; 8];
        assert_eq!(rustix::io::read(&read, &mut buf).unwrap(), 2);
        drain(&read);
        assert_eq!(rustix::io::read(&read, &mut buf), Err(Errno::AGAIN));
    }

    #[test]
    fn waker_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<EventLoopWaker>();
    }

    #[test]
    fn discarding_keeps_order() {
        use x11rb::protocol::xproto::{ExposeEvent, Property, PropertyNotifyEvent};

        let property = |atom| {
            Event::PropertyNotify(PropertyNotifyEvent {
                window: 1,
                atom,
                state: Property::NEW_VALUE,
                ..Default::default()
            })
        };
        let expose = |window| Event::Expose(ExposeEvent { window, ..Default::default() });

        let mut queue: VecDeque<Event> = vec![expose(1), property(10), expose(2), property(11), property(10)].into();
        let discarded = discard_matching(&mut queue, |event| {
            matches!(event, Event::PropertyNotify(notify) if notify.atom == 10)
        });

        assert_eq!(discarded, 2);
        let windows: Vec<u32> = queue
            .iter()
            .map(|event| match event {
                Event::Expose(expose) => expose.window,
                Event::PropertyNotify(notify) => notify.atom,
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(windows, vec![1, 2, 11]);
    }

    #[test]
    fn full_pipe_is_not_an_error() {
        let (_read, write) = pipe_with(PipeFlags::NONBLOCK | PipeFlags::CLOEXEC).unwrap();
        let waker = EventLoopWaker { pipe: Arc::new(write) };
        // well beyond the default pipe capacity
        for _ in 0..200_000 {
            waker.wake().unwrap();
        }
    }
}
