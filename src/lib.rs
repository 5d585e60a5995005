//! A library for reading a single byte stream through multiple readers that
//! each see the full sequence.
//!
//! [`MulteeReader`] wraps any blocking [`Read`](std::io::Read) source and
//! hands out independent consumers, each of which reads every byte of the
//! stream from its registration point onward. The source is read exactly
//! once and never rewound, so it can be anything that cannot seek and whose
//! contents you do not want to hold in memory, such as a pipe, a socket, or
//! a decompressor.
//!
//! # Examples
//!
//! ```
//! use multee::MulteeReader;
//! use std::io::Read;
//! use std::thread;
//!
//! let source: &[u8] = b"every consumer sees every byte";
//! let multee = MulteeReader::new(source);
//!
//! let mut checksum = multee.new_consumer();
//! let mut archive = multee.new_consumer();
//!
//! thread::scope(|s| {
//!     for consumer in [&mut checksum, &mut archive] {
//!         s.spawn(move || {
//!             let mut bytes = Vec::new();
//!             consumer.read_to_end(&mut bytes).unwrap();
//!             assert_eq!(bytes, b"every consumer sees every byte");
//!         });
//!     }
//! });
//! ```
//!
//! # Behavior
//!
//! The stream advances in *rounds*: one fill of a fixed shared buffer
//! (32 KiB by default), drained by every live consumer before the next fill
//! happens. The last consumer to finish a round performs the next source
//! read on behalf of everyone, so only one reader ever touches the source
//! and at most one buffer's worth of the stream is resident at a time. This
//! means:
//!
//! - Backpressure is implicit: the fastest consumer is paced to the slowest,
//!   instead of bytes piling up behind a laggard.
//! - Every consumer must keep reading until end-of-stream or be closed
//!   (dropping a handle closes it). A consumer that just stops reading
//!   stalls all the others at the round barrier.
//! - Consumers registered after reading has begun only see bytes from the
//!   round following their registration; nothing is replayed for them.
//!
//! End-of-stream and source errors are sticky. Every consumer observes the
//! same terminal: `Ok(0)` for a normal end, or an [`std::io::Error`]
//! carrying the source error's kind and message for a failure, on every
//! read from the failed round on.
//!
//! # Thread Safety
//!
//! `MulteeReader` is [`Send`] and [`Sync`], and its consumers are [`Send`],
//! whenever the wrapped source is `Send`; the source does not need to be
//! `Sync`. Consumers are meant to be moved onto separate threads and read
//! concurrently. Two consumers driven from the same thread deadlock as soon
//! as both need to cross a round barrier, so give each its own thread.
//!
//! # Performance Considerations
//!
//! All consumers copy out of one shared buffer, under a read lock that is
//! only ever contended for the microseconds of a `memcpy`. The costs to
//! know about:
//!
//! - Each round boundary is a full barrier across all live consumers.
//!   Many tiny reads cross barriers no more often than few large ones, but
//!   they do take the coordinator lock per round.
//! - A small buffer capacity means more rounds and more synchronization;
//!   the 32 KiB default is a reasonable trade for byte streams.

#![cfg_attr(docsrs, feature(doc_cfg))]

mod consumer;
mod error;
mod ext;
mod multee;
#[cfg(feature = "stats")]
mod stats;

pub use consumer::MulteeConsumer;
pub use error::MulteeError;
pub use ext::MulteeReadExt;
pub use multee::MulteeReader;
#[cfg(feature = "stats")]
pub use stats::Stats;
