//! Extension trait for converting readers into [`MulteeReader`]s.
//!
//! This module provides the `MulteeReadExt` trait which adds an
//! `into_multee` method to any type that implements [`Read`].

use crate::MulteeReader;
use std::io::Read;

/// Extension trait for [`Read`] that provides the `into_multee` method.
pub trait MulteeReadExt: Read {
    /// Wraps this reader in a [`MulteeReader`] with the default buffer
    /// capacity, consuming it.
    ///
    /// Equivalent to [`MulteeReader::new`].
    ///
    /// ```
    /// use multee::MulteeReadExt;
    /// use std::io::Read;
    ///
    /// let source: &[u8] = b"hello";
    /// let multee = source.into_multee();
    ///
    /// let mut consumer = multee.new_consumer();
    /// let mut out = String::new();
    /// consumer.read_to_string(&mut out).unwrap();
    /// assert_eq!(out, "hello");
    /// ```
    fn into_multee(self) -> MulteeReader<Self>
    where
        Self: Sized,
    {
        MulteeReader::new(self)
    }
}

impl<R: Read> MulteeReadExt for R {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_into_multee_trait_works() {
        let multee = (&b"abc"[..]).into_multee();
        let mut consumer = multee.new_consumer();
        let mut seen = Vec::new();
        consumer.read_to_end(&mut seen).unwrap();
        assert_eq!(seen, b"abc");
    }
}
