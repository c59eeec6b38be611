use mio::event::Evented;
use mio::{Events, Poll, PollOpt, Ready, Token};
use std::io;
use std::time::Duration;

/// One readiness report from `Selector::select`.
#[derive(Debug, Copy, Clone)]
pub struct Readiness {
    pub token: usize,
    pub readable: bool,
    pub writable: bool,
}

/// Level-triggered readiness selector over a set of registered sockets.
///
/// Write interest is only armed while a socket has pending output, so a
/// blocking `select` actually parks instead of spinning on the
/// always-writable kernel buffer. Error conditions surface through read
/// readiness: the next read on the affected socket reports the failure.
pub struct Selector {
    poll: Poll,
    events: Events,
}

impl Selector {
    pub fn new() -> io::Result<Selector> {
        Ok(Selector {
            poll: Poll::new()?,
            events: Events::with_capacity(256),
        })
    }

    #[inline]
    pub fn register<E: Evented>(&self, handle: &E, token: usize, writable: bool) -> io::Result<()> {
        self.poll
            .register(handle, Token(token), Self::interest(writable), PollOpt::level())
    }

    #[inline]
    pub fn reregister<E: Evented>(&self, handle: &E, token: usize, writable: bool) -> io::Result<()> {
        self.poll
            .reregister(handle, Token(token), Self::interest(writable), PollOpt::level())
    }

    #[inline]
    pub fn deregister<E: Evented>(&self, handle: &E) -> io::Result<()> {
        self.poll.deregister(handle)
    }

    /// Poll the registered set and report every ready socket. The caller is
    /// responsible for servicing each report before the next call. With
    /// `block = true` the call parks until at least one socket is ready;
    /// with `block = false` it returns immediately.
    pub fn select(&mut self, block: bool) -> io::Result<Vec<Readiness>> {
        let timeout = if block {
            None
        } else {
            Some(Duration::from_millis(0))
        };

        self.poll.poll(&mut self.events, timeout)?;

        let ready = self
            .events
            .iter()
            .map(|event| Readiness {
                token: event.token().0,
                readable: event.readiness().is_readable(),
                writable: event.readiness().is_writable(),
            })
            .collect();

        Ok(ready)
    }

    #[inline]
    fn interest(writable: bool) -> Ready {
        if writable {
            Ready::readable() | Ready::writable()
        } else {
            Ready::readable()
        }
    }
}
