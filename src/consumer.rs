use std::fmt;
use std::io::{self, Read};
use std::sync::Arc;

use crate::error::MulteeError;
use crate::multee::{Inner, Registration, Terminal};

/// One consumer's view of a shared stream.
///
/// Obtained from [`MulteeReader::new_consumer`](crate::MulteeReader::new_consumer).
/// The handle implements [`Read`] and delivers the source's byte sequence
/// from the consumer's registration point to end-of-stream, in order.
///
/// A handle is not meant to be shared: reading takes `&mut self`. It is
/// [`Send`] whenever the source is, so each consumer is typically moved onto
/// its own thread. All consumers of a hub advance through the stream
/// together, one buffer-sized round at a time, so a consumer that stops
/// reading without being closed stalls the others. Dropping the handle
/// closes it.
///
/// ```
/// use multee::MulteeReader;
/// use std::io::Read;
/// use std::thread;
///
/// let multee = MulteeReader::new(&b"fan out"[..]);
/// let mut a = multee.new_consumer();
/// let mut b = multee.new_consumer();
///
/// thread::scope(|s| {
///     for consumer in [&mut a, &mut b] {
///         s.spawn(move || {
///             let mut seen = Vec::new();
///             consumer.read_to_end(&mut seen).unwrap();
///             assert_eq!(seen, b"fan out");
///         });
///     }
/// });
/// ```
pub struct MulteeConsumer<R> {
    inner: Arc<Inner<R>>,
    /// Registry ticket.
    id: u64,
    /// Round this consumer last observed.
    round: u64,
    /// Cursor within the observed round.
    pos: usize,
    /// Valid length of the observed round.
    end: usize,
    /// Terminal carried by the observed round, if any.
    terminal: Option<Terminal>,
    closed: bool,
}

impl<R> MulteeConsumer<R> {
    /// A consumer joins with its registration round already drained, so the
    /// first time it touches the shared buffer is one full barrier after
    /// registration. This keeps it clear of any load in flight at the time.
    pub(crate) fn new(inner: Arc<Inner<R>>, registration: Registration) -> Self {
        MulteeConsumer {
            inner,
            id: registration.id,
            round: registration.round,
            pos: registration.filled,
            end: registration.filled,
            terminal: registration.terminal,
            closed: false,
        }
    }

    /// Withdraws this consumer from the shared stream.
    ///
    /// Closing is how a consumer abandons the stream before end-of-stream:
    /// it removes the consumer from the round barrier, so the remaining
    /// consumers stop waiting on it. Dropping the handle closes it too;
    /// calling `close` explicitly only matters when the error is wanted.
    ///
    /// # Errors
    ///
    /// Returns [`MulteeError::AlreadyClosed`] if the consumer was closed
    /// before.
    ///
    /// # Examples
    ///
    /// ```
    /// use multee::{MulteeError, MulteeReader};
    ///
    /// let multee = MulteeReader::new(&b"data"[..]);
    /// let mut consumer = multee.new_consumer();
    /// assert!(consumer.close().is_ok());
    /// assert_eq!(consumer.close(), Err(MulteeError::AlreadyClosed));
    /// ```
    pub fn close(&mut self) -> Result<(), MulteeError> {
        if self.closed {
            return Err(MulteeError::AlreadyClosed);
        }
        self.closed = true;
        self.inner.deregister(self.id);
        Ok(())
    }
}

/// Blocking read over the shared stream.
///
/// `read` copies bytes into `dst` until it is full or the stream ends, even
/// when that takes several rounds of the shared buffer, so it returns `Ok(0)`
/// only at end-of-stream (or for an empty `dst`). Crossing a round boundary
/// blocks until every other live consumer has drained the round too; expect
/// reads to take as long as the slowest consumer of the hub.
///
/// A source failure is returned as an [`io::Error`] with the source error's
/// kind and message, on every read at and after the failed round. Reading a
/// closed consumer fails with an error of kind `Other` wrapping
/// [`MulteeError::AlreadyClosed`].
impl<R: Read> Read for MulteeConsumer<R> {
    fn read(&mut self, dst: &mut [u8]) -> io::Result<usize> {
        if self.closed {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                MulteeError::AlreadyClosed,
            ));
        }
        let mut copied = 0;
        while copied < dst.len() {
            if self.pos != self.end {
                let n = self.inner.copy_round(self.pos, self.end, &mut dst[copied..]);
                self.pos += n;
                copied += n;
                continue;
            }
            match &self.terminal {
                Some(Terminal::Eof) => break,
                Some(Terminal::Failed { kind, message }) if copied == 0 => {
                    return Err(io::Error::new(*kind, message.clone()));
                }
                // Deliver the bytes copied so far; the failure is returned
                // by the next call.
                Some(Terminal::Failed { .. }) => break,
                None => {
                    let view = self.inner.await_next_round(self.round);
                    if view.round != self.round {
                        self.round = view.round;
                        self.pos = 0;
                        self.end = view.filled;
                    }
                    self.terminal = view.terminal;
                }
            }
        }
        Ok(copied)
    }
}

impl<R> Drop for MulteeConsumer<R> {
    fn drop(&mut self) {
        // An abandoned handle must still leave the barrier, or every other
        // consumer of the hub would wait on it forever.
        if !self.closed {
            let _ = self.close();
        }
    }
}

impl<R> fmt::Debug for MulteeConsumer<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MulteeConsumer")
            .field("id", &self.id)
            .field("round", &self.round)
            .field("pos", &self.pos)
            .field("end", &self.end)
            .field("closed", &self.closed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MulteeReader;

    #[test]
    fn test_empty_input_reports_end_of_stream() {
        let multee = MulteeReader::new(&b""[..]);
        let mut consumer = multee.new_consumer();
        let mut dst = [0u8; 4];
        assert_eq!(consumer.read(&mut dst).unwrap(), 0);
        assert_eq!(consumer.read(&mut dst).unwrap(), 0);
    }

    #[test]
    fn test_short_input_single_read() {
        let multee = MulteeReader::new(&b"foo"[..]);
        let mut consumer = multee.new_consumer();
        let mut dst = [0u8; 4];
        let n = consumer.read(&mut dst).unwrap();
        assert_eq!(&dst[..n], b"foo");
        assert_eq!(consumer.read(&mut dst).unwrap(), 0);
    }

    #[test]
    fn test_short_input_exact_fit() {
        let multee = MulteeReader::new(&b"foo"[..]);
        let mut consumer = multee.new_consumer();
        let mut dst = [0u8; 3];
        let n = consumer.read(&mut dst).unwrap();
        assert_eq!(&dst[..n], b"foo");
        assert_eq!(consumer.read(&mut dst).unwrap(), 0);
    }

    #[test]
    fn test_short_input_multiple_reads() {
        let multee = MulteeReader::new(&b"foobar!"[..]);
        let mut consumer = multee.new_consumer();
        let mut dst = [0u8; 3];
        let n = consumer.read(&mut dst).unwrap();
        assert_eq!(&dst[..n], b"foo");
        let n = consumer.read(&mut dst).unwrap();
        assert_eq!(&dst[..n], b"bar");
        let n = consumer.read(&mut dst).unwrap();
        assert_eq!(&dst[..n], b"!");
        assert_eq!(consumer.read(&mut dst).unwrap(), 0);
    }

    #[test]
    fn test_read_spans_rounds() {
        let multee = MulteeReader::with_capacity(2, &b"foobar"[..]);
        let mut consumer = multee.new_consumer();
        let mut dst = [0u8; 6];
        assert_eq!(consumer.read(&mut dst).unwrap(), 6);
        assert_eq!(&dst, b"foobar");
        assert_eq!(consumer.read(&mut dst).unwrap(), 0);
    }

    #[test]
    fn test_input_length_a_multiple_of_capacity_needs_one_extra_round() {
        let multee = MulteeReader::with_capacity(4, &b"abcdefgh"[..]);
        let mut consumer = multee.new_consumer();
        let mut seen = Vec::new();
        consumer.read_to_end(&mut seen).unwrap();
        assert_eq!(seen, b"abcdefgh");
    }

    #[test]
    fn test_empty_destination_reads_zero_without_touching_the_source() {
        struct UntouchableSource;

        impl Read for UntouchableSource {
            fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
                panic!("an empty destination must not reach the source");
            }
        }

        let multee = MulteeReader::new(UntouchableSource);
        let mut consumer = multee.new_consumer();
        assert_eq!(consumer.read(&mut []).unwrap(), 0);
    }

    #[test]
    fn test_interrupted_source_reads_are_retried() {
        struct InterruptingSource {
            interruptions: usize,
            data: &'static [u8],
        }

        impl Read for InterruptingSource {
            fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
                if self.interruptions > 0 {
                    self.interruptions -= 1;
                    return Err(io::Error::new(io::ErrorKind::Interrupted, "signal"));
                }
                let n = self.data.len().min(buf.len());
                buf[..n].copy_from_slice(&self.data[..n]);
                self.data = &self.data[n..];
                Ok(n)
            }
        }

        let multee = MulteeReader::new(InterruptingSource {
            interruptions: 3,
            data: b"foo",
        });
        let mut consumer = multee.new_consumer();
        let mut dst = [0u8; 8];
        let n = consumer.read(&mut dst).unwrap();
        assert_eq!(&dst[..n], b"foo");
    }

    #[test]
    fn test_source_failure_is_sticky_and_the_source_is_not_read_again() {
        struct ExplodingSource {
            reads: usize,
        }

        impl Read for ExplodingSource {
            fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
                self.reads += 1;
                assert_eq!(self.reads, 1, "source read again after reporting failure");
                Err(io::Error::new(io::ErrorKind::ConnectionReset, "wire gone"))
            }
        }

        let multee = MulteeReader::new(ExplodingSource { reads: 0 });
        let mut consumer = multee.new_consumer();
        let mut dst = [0u8; 4];
        for _ in 0..3 {
            let err = consumer.read(&mut dst).unwrap_err();
            assert_eq!(err.kind(), io::ErrorKind::ConnectionReset);
            assert_eq!(err.to_string(), "wire gone");
        }
    }

    #[test]
    fn test_close_twice_fails() {
        let multee = MulteeReader::new(&b"foo"[..]);
        let mut consumer = multee.new_consumer();
        assert!(consumer.close().is_ok());
        assert_eq!(consumer.close(), Err(MulteeError::AlreadyClosed));
    }

    #[test]
    fn test_read_after_close_fails() {
        let multee = MulteeReader::new(&b"foo"[..]);
        let mut consumer = multee.new_consumer();
        consumer.close().unwrap();
        let mut dst = [0u8; 4];
        let err = consumer.read(&mut dst).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::Other);
        let inner = err.get_ref().and_then(|e| e.downcast_ref::<MulteeError>());
        assert_eq!(inner, Some(&MulteeError::AlreadyClosed));
    }

    #[test]
    fn test_send_and_sync_bounds() {
        // The hub and its consumers move across threads whenever the source
        // itself can; the source does not have to be Sync.
        static_assertions::assert_impl_all!(
            MulteeReader<Box<dyn Read + Send>>: Send, Sync
        );
        static_assertions::assert_impl_all!(
            MulteeConsumer<Box<dyn Read + Send>>: Send
        );
    }
}
