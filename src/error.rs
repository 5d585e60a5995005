use thiserror::Error;

/// Errors surfaced by consumer lifecycle operations.
///
/// End-of-stream and source failures are not part of this vocabulary: they
/// travel through the [`std::io::Read`] channel as `Ok(0)` and `Err(..)`
/// respectively.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MulteeError {
    /// The consumer was closed before this call.
    ///
    /// Returned by [`close`](crate::MulteeConsumer::close) on a consumer that
    /// is already closed, and wrapped in an [`std::io::Error`] by `read` on a
    /// closed consumer.
    #[error("consumer is already closed")]
    AlreadyClosed,
}
