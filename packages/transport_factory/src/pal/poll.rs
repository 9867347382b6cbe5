use std::any::type_name;
use std::fmt::{self, Debug};
use std::io;
use std::time::Duration;

use mio::{Events, Poll, Token, Waker};
use parking_lot::Mutex;

use crate::{Multiplexer, MultiplexerProvider, ProviderIdentity};

/// Token reserved for the waker. Readiness events carrying it are not counted.
const WAKE_TOKEN: Token = Token(0);

/// Capacity of the event buffer a multiplexer polls into.
const EVENT_CAPACITY: usize = 256;

/// The name of the readiness primitive `mio` uses on the target operating system.
const fn native_primitive_name() -> &'static str {
    if cfg!(any(target_os = "linux", target_os = "android")) {
        "epoll"
    } else if cfg!(any(
        target_os = "macos",
        target_os = "ios",
        target_os = "freebsd",
        target_os = "netbsd",
        target_os = "openbsd",
        target_os = "dragonfly"
    )) {
        "kqueue"
    } else if cfg!(windows) {
        "iocp"
    } else {
        "poll"
    }
}

/// The platform-default provider, backed by the native readiness primitive via `mio`.
#[derive(Debug)]
pub(crate) struct PollProvider {
    identity: ProviderIdentity,
}

impl PollProvider {
    pub(crate) fn new() -> Self {
        Self {
            identity: ProviderIdentity::new(native_primitive_name()),
        }
    }
}

impl MultiplexerProvider for PollProvider {
    fn identity(&self) -> &ProviderIdentity {
        &self.identity
    }

    fn open(&self) -> io::Result<Box<dyn Multiplexer>> {
        let poll = Poll::new()?;
        let waker = Waker::new(poll.registry(), WAKE_TOKEN)?;

        Ok(Box::new(PollMultiplexer {
            state: Mutex::new(PollState {
                poll,
                events: Events::with_capacity(EVENT_CAPACITY),
            }),
            waker,
        }))
    }
}

struct PollState {
    poll: Poll,
    events: Events,
}

/// A `mio::Poll` instance plus a waker registered with it.
struct PollMultiplexer {
    // Only the owning loop waits, so this lock is uncontended in practice.
    state: Mutex<PollState>,
    waker: Waker,
}

impl Multiplexer for PollMultiplexer {
    fn wait(&self, timeout: Option<Duration>) -> io::Result<usize> {
        let mut state = self.state.lock();
        let PollState { poll, events } = &mut *state;

        match poll.poll(events, timeout) {
            Ok(()) => Ok(events
                .iter()
                .filter(|event| event.token() != WAKE_TOKEN)
                .count()),
            // A signal arrived. The caller will simply wait again.
            Err(e) if e.kind() == io::ErrorKind::Interrupted => Ok(0),
            Err(e) => Err(e),
        }
    }

    fn wake(&self) -> io::Result<()> {
        self.waker.wake()
    }
}

impl Debug for PollMultiplexer {
    #[cfg_attr(test, mutants::skip)] // Debug output is not part of the contract.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(type_name::<Self>()).finish_non_exhaustive()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::sync::Arc;
    use std::thread;
    use std::time::Instant;

    use super::*;

    #[test]
    fn identity_names_native_primitive() {
        let provider = PollProvider::new();

        assert_eq!(provider.identity().name(), native_primitive_name());
        assert_eq!(provider.identity().version(), None);
    }

    #[test]
    #[cfg_attr(miri, ignore)] // Miri cannot talk to the real platform.
    fn wait_times_out_without_events() {
        let multiplexer = PollProvider::new().open().unwrap();

        let count = multiplexer.wait(Some(Duration::from_millis(10))).unwrap();

        assert_eq!(count, 0);
    }

    #[test]
    #[cfg_attr(miri, ignore)] // Miri cannot talk to the real platform.
    fn wake_before_wait_returns_promptly() {
        let multiplexer = PollProvider::new().open().unwrap();

        multiplexer.wake().unwrap();

        let started = Instant::now();
        multiplexer.wait(Some(Duration::from_secs(30))).unwrap();

        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    #[cfg_attr(miri, ignore)] // Miri cannot talk to the real platform.
    fn wake_from_other_thread_interrupts_wait() {
        let multiplexer: Arc<dyn Multiplexer> = Arc::from(PollProvider::new().open().unwrap());

        let waker = thread::spawn({
            let multiplexer = Arc::clone(&multiplexer);
            move || {
                thread::sleep(Duration::from_millis(50));
                multiplexer.wake().unwrap();
            }
        });

        let started = Instant::now();
        multiplexer.wait(Some(Duration::from_secs(30))).unwrap();
        waker.join().unwrap();

        assert!(started.elapsed() < Duration::from_secs(10));
    }
}
