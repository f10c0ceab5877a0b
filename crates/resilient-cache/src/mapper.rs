//! The body-to-value projection used by [`crate::RefreshCache`].

use std::error::Error as StdError;
use std::fmt;

/// An opaque error produced by a [`Mapper`]. The cache never inspects it
/// beyond logging its `Display` output.
#[derive(Debug)]
pub struct MapperError(Box<dyn StdError + Send + Sync>);

impl MapperError {
    /// Wraps any error as a `MapperError`.
    pub fn new<E>(err: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self(Box::new(err))
    }

    /// Wraps a plain message as a `MapperError`.
    pub fn msg(message: impl Into<String>) -> Self {
        #[derive(Debug)]
        struct Message(String);
        impl fmt::Display for Message {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
        impl StdError for Message {}

        Self(Box::new(Message(message.into())))
    }
}

impl fmt::Display for MapperError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl StdError for MapperError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(self.0.as_ref())
    }
}

/// Deterministic, side-effect-free projection from a response body to a
/// value `V`. The cache never interprets `V` or `MapperError` — a JWKS/JOSE
/// decoder, for instance, would implement this trait downstream.
pub trait Mapper<V>: Send + Sync {
    /// Decodes `bytes` into a `V`, or reports why it couldn't.
    fn map(&self, bytes: &[u8]) -> Result<V, MapperError>;
}

/// Adapts any closure into a [`Mapper`].
impl<V, F> Mapper<V> for F
where
    F: Fn(&[u8]) -> Result<V, MapperError> + Send + Sync,
{
    fn map(&self, bytes: &[u8]) -> Result<V, MapperError> {
        self(bytes)
    }
}
