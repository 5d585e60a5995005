use std::collections::BTreeSet;
use std::fmt;
use std::io::Read;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex, MutexGuard, RwLock};

use crate::consumer::MulteeConsumer;

/// Round buffer capacity used by [`MulteeReader::new`].
pub(crate) const DEFAULT_BUFFER_SIZE: usize = 32 * 1024;

/// Sticky terminal state of the shared stream.
///
/// Once a round carries a terminal, no further source reads happen and every
/// consumer observes the same terminal on and after that round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Terminal {
    /// The source reported end-of-stream.
    Eof,
    /// The source failed. The kind and message are replayed to every
    /// consumer as a fresh [`std::io::Error`].
    Failed {
        kind: std::io::ErrorKind,
        message: String,
    },
}

/// Snapshot of the coordinator handed to a consumer at a round boundary.
pub(crate) struct RoundView {
    pub(crate) round: u64,
    pub(crate) filled: usize,
    pub(crate) terminal: Option<Terminal>,
}

impl RoundView {
    fn of(state: &State) -> Self {
        RoundView {
            round: state.round,
            filled: state.filled,
            terminal: state.terminal.clone(),
        }
    }
}

/// Result of registering a consumer: its ticket plus the view of the round
/// current at registration time.
pub(crate) struct Registration {
    pub(crate) id: u64,
    pub(crate) round: u64,
    pub(crate) filled: usize,
    pub(crate) terminal: Option<Terminal>,
}

/// Live-consumer membership, keyed by integer ticket.
///
/// The expected-arrivals count lives in [`State`] and is maintained in
/// lock-step with this set rather than derived from its size, so in-flight
/// arrivals can never observe the two disagreeing.
#[derive(Debug, Default)]
struct Registry {
    next_ticket: u64,
    live: BTreeSet<u64>,
}

impl Registry {
    fn insert(&mut self) -> u64 {
        let ticket = self.next_ticket;
        self.next_ticket += 1;
        self.live.insert(ticket);
        ticket
    }

    fn remove(&mut self, ticket: u64) {
        self.live.remove(&ticket);
    }

    fn snapshot(&self) -> Vec<u64> {
        self.live.iter().copied().collect()
    }
}

/// Coordinator state, guarded by the single mutex in [`Inner`].
struct State {
    /// Monotonic round number. Round 0 is the empty round before the first
    /// load, so every consumer registered up front starts at a barrier.
    round: u64,
    /// Valid length of the round buffer for the current round.
    filled: usize,
    /// Consumers that have finished draining the current round.
    arrived: usize,
    /// Live consumers expected at the barrier.
    expected: usize,
    /// Set by a close whose deregistration completed the barrier; the first
    /// parked consumer to observe it takes over the load.
    load_pending: bool,
    /// True while a loader is inside the source read, between resetting
    /// `arrived` and publishing the new round. Arrivals in that window
    /// belong to the round being replaced and must not count toward the
    /// next barrier.
    loading: bool,
    terminal: Option<Terminal>,
    registry: Registry,
}

/// Shared hub state: one of these is owned jointly by the [`MulteeReader`]
/// and every consumer handle, through an [`Arc`].
pub(crate) struct Inner<R> {
    state: Mutex<State>,
    round_cv: Condvar,
    /// Only the elected loader of a round touches the source, and only while
    /// the state lock is released.
    source: Mutex<R>,
    /// Write-locked by the loader for the duration of a source read,
    /// read-locked by consumers copying out of the current round. The
    /// barrier makes the write lock uncontended: a load only starts once
    /// every live consumer has drained the previous round.
    buffer: RwLock<Box<[u8]>>,
    #[cfg(feature = "stats")]
    stats: crate::stats::Stats,
}

impl<R> Inner<R> {
    pub(crate) fn register(&self) -> Registration {
        let mut state = self.state.lock();
        let id = state.registry.insert();
        state.expected += 1;
        #[cfg(feature = "stats")]
        self.stats.increment();
        log::trace!("consumer {} registered at round {}", id, state.round);
        Registration {
            id,
            round: state.round,
            filled: state.filled,
            terminal: state.terminal.clone(),
        }
    }

    pub(crate) fn deregister(&self, id: u64) {
        let mut state = self.state.lock();
        state.registry.remove(id);
        state.expected -= 1;
        #[cfg(feature = "stats")]
        self.stats.decrement();
        log::trace!("consumer {} closed, {} remaining", id, state.expected);
        if state.terminal.is_none() && state.arrived > 0 && state.arrived == state.expected {
            // The closer was the last missing arrival. A closing consumer
            // never loads; hand the loader role to a parked arrival instead.
            state.load_pending = true;
            self.round_cv.notify_all();
        }
    }

    /// Copies bytes of the current round into `dst`, starting at cursor
    /// `pos`; `end` is the valid length of the round the caller observed.
    ///
    /// # Panics
    ///
    /// Panics if `pos > end`. A cursor past the end of its round's data
    /// cannot arise from this crate's locking protocol.
    pub(crate) fn copy_round(&self, pos: usize, end: usize, dst: &mut [u8]) -> usize {
        assert!(
            pos <= end,
            "consumer cursor ({}) is beyond the end of round data ({})",
            pos,
            end
        );
        let buffer = self.buffer.read();
        let n = (end - pos).min(dst.len());
        dst[..n].copy_from_slice(&buffer[pos..pos + n]);
        n
    }
}

impl<R: Read> Inner<R> {
    /// Parks the calling consumer until the round it has drained is replaced.
    ///
    /// The last consumer to arrive performs the source read for the next
    /// round; everyone else waits on the condvar and returns once the round
    /// number changes. A terminal short-circuits: the current view is
    /// returned without arriving at the barrier, as is a round the caller
    /// has not observed yet (possible only for consumers registered while a
    /// load was in flight). A caller whose round's load is still in flight
    /// waits for the publish without arriving either: `arrived` has already
    /// been reset for the next barrier, and counting such a straggler there
    /// would let a future round load before every real participant drained
    /// the previous one.
    pub(crate) fn await_next_round(&self, observed_round: u64) -> RoundView {
        let mut state = self.state.lock();

        if state.terminal.is_some() || state.round != observed_round {
            return RoundView::of(&state);
        }

        if state.loading {
            while state.round == observed_round && state.terminal.is_none() {
                self.round_cv.wait(&mut state);
            }
            return RoundView::of(&state);
        }

        state.arrived += 1;
        if state.arrived == state.expected {
            return self.load_next_round(state);
        }

        loop {
            self.round_cv.wait(&mut state);
            if state.round != observed_round || state.terminal.is_some() {
                return RoundView::of(&state);
            }
            if state.load_pending {
                // A close completed the barrier; this waiter loads instead.
                state.load_pending = false;
                return self.load_next_round(state);
            }
        }
    }

    /// Performs the single source read of a round and publishes the result.
    ///
    /// The state lock is released for the duration of the read: the source
    /// may block indefinitely, and holding the lock would prevent `close`
    /// from unblocking the barrier in the meantime.
    fn load_next_round(&self, mut state: MutexGuard<'_, State>) -> RoundView {
        state.arrived = 0;
        state.load_pending = false;
        state.loading = true;
        drop(state);

        let (filled, terminal) = {
            let mut buffer = self.buffer.write();
            let mut source = self.source.lock();
            pull(&mut *source, &mut buffer[..])
        };

        let mut state = self.state.lock();
        state.loading = false;
        state.filled = filled;
        state.terminal = terminal;
        state.round += 1;
        match &state.terminal {
            Some(terminal) => {
                log::debug!("round {} is terminal: {:?}", state.round, terminal)
            }
            None => log::trace!("round {} loaded {} bytes", state.round, filled),
        }
        self.round_cv.notify_all();
        RoundView::of(&state)
    }
}

/// One source read: blocks until the source produces at least one byte or
/// terminates. `Interrupted` errors are retried; any other error becomes the
/// sticky failure replayed to every consumer. Never called again once a
/// terminal has been returned.
fn pull<R: Read>(source: &mut R, buf: &mut [u8]) -> (usize, Option<Terminal>) {
    loop {
        match source.read(buf) {
            Ok(0) => return (0, Some(Terminal::Eof)),
            Ok(n) => return (n, None),
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                return (
                    0,
                    Some(Terminal::Failed {
                        kind: e.kind(),
                        message: e.to_string(),
                    }),
                )
            }
        }
    }
}

/// A multiplexing hub that lets any number of consumers each read the full
/// byte sequence of a single [`Read`] source.
///
/// The source is read exactly once, in rounds of at most one buffer's worth
/// of bytes. All live consumers drain each round before the next one is
/// loaded, so the whole arrangement never buffers more than the configured
/// capacity and the fastest consumer is paced to the slowest. The source
/// needs no [`Seek`](std::io::Seek) support and is never rewound.
///
/// Consumers are created with [`new_consumer`](MulteeReader::new_consumer)
/// and read independently, usually from their own threads:
///
/// ```
/// use multee::MulteeReader;
/// use std::io::Read;
///
/// let multee = MulteeReader::new(&b"foobar"[..]);
/// let mut consumer = multee.new_consumer();
///
/// let mut buf = [0u8; 4];
/// let n = consumer.read(&mut buf).unwrap();
/// assert_eq!(&buf[..n], b"foob");
/// let n = consumer.read(&mut buf).unwrap();
/// assert_eq!(&buf[..n], b"ar");
/// assert_eq!(consumer.read(&mut buf).unwrap(), 0);
/// ```
///
/// Dropping the hub while consumers are still reading is fine; the shared
/// state lives until the last handle goes away. A hub whose consumers have
/// all been closed (or that never had any) stops reading the source and can
/// be discarded without blocking; any bytes the source still held are simply
/// never requested.
pub struct MulteeReader<R> {
    inner: Arc<Inner<R>>,
}

impl<R: Read> MulteeReader<R> {
    /// Creates a hub over `source` with the default 32 KiB round buffer.
    ///
    /// No bytes are read from the source until a consumer asks for them.
    pub fn new(source: R) -> Self {
        Self::with_capacity(DEFAULT_BUFFER_SIZE, source)
    }

    /// Creates a hub over `source` with a round buffer of `capacity` bytes.
    ///
    /// The capacity bounds how much of the stream is resident at any time,
    /// regardless of how many consumers exist or how far they lag each
    /// other. Follows the [`std::io::BufReader::with_capacity`] argument
    /// order.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    ///
    /// # Examples
    ///
    /// ```
    /// use multee::MulteeReader;
    /// use std::io::Read;
    ///
    /// let multee = MulteeReader::with_capacity(2, &b"foobar"[..]);
    /// let mut consumer = multee.new_consumer();
    ///
    /// // A single read spans as many rounds as it needs.
    /// let mut buf = [0u8; 6];
    /// assert_eq!(consumer.read(&mut buf).unwrap(), 6);
    /// assert_eq!(&buf, b"foobar");
    /// ```
    pub fn with_capacity(capacity: usize, source: R) -> Self {
        assert!(capacity >= 1, "round buffer capacity must be at least 1");
        MulteeReader {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    round: 0,
                    filled: 0,
                    arrived: 0,
                    expected: 0,
                    load_pending: false,
                    loading: false,
                    terminal: None,
                    registry: Registry::default(),
                }),
                round_cv: Condvar::new(),
                source: Mutex::new(source),
                buffer: RwLock::new(vec![0u8; capacity].into_boxed_slice()),
                #[cfg(feature = "stats")]
                stats: crate::stats::Stats::new(),
            }),
        }
    }

    /// Registers a new consumer and returns its handle.
    ///
    /// Create all consumers before reading begins if every one of them must
    /// see the stream from the start. Registering later is permitted, but a
    /// late consumer only observes bytes from the round after its
    /// registration onward; everything earlier is gone.
    ///
    /// Every consumer must either be read to end-of-stream or closed (also
    /// done by drop). A consumer that is neither read nor closed holds up
    /// the round barrier for everyone else.
    pub fn new_consumer(&self) -> MulteeConsumer<R> {
        let registration = self.inner.register();
        MulteeConsumer::new(Arc::clone(&self.inner), registration)
    }

    /// Returns a [`Stats`](crate::stats::Stats) handle for this hub.
    ///
    /// # Examples
    ///
    /// ```
    /// use multee::MulteeReader;
    ///
    /// let multee = MulteeReader::new(&b"bytes"[..]);
    /// let stats = multee.stats();
    /// assert_eq!(stats.live_consumers(), 0);
    ///
    /// let a = multee.new_consumer();
    /// let b = multee.new_consumer();
    /// assert_eq!(stats.live_consumers(), 2);
    ///
    /// drop(a);
    /// assert_eq!(stats.live_consumers(), 1);
    /// drop(b);
    /// assert_eq!(stats.live_consumers(), 0);
    /// ```
    #[cfg(feature = "stats")]
    #[cfg_attr(docsrs, doc(cfg(feature = "stats")))]
    pub fn stats(&self) -> crate::stats::Stats {
        self.inner.stats.clone()
    }
}

impl<R> fmt::Debug for MulteeReader<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("MulteeReader")
            .field("round", &state.round)
            .field("filled", &state.filled)
            .field("consumers", &state.registry.snapshot())
            .field("terminal", &state.terminal)
            .finish()
    }
}
