use thiserror::Error;

use crate::core::{DecodeError, MapError};

/// Whether retrying this operation may succeed.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Transience {
    /// Retry will never help without changing inputs/state.
    Permanent,
    /// Retry may help (transient contention/outage).
    Retryable,
    /// Unknown if retry will help.
    Unknown,
}

impl Transience {
    pub fn is_retryable(self) -> bool {
        matches!(self, Transience::Retryable)
    }
}

/// What we know about side effects when an error is returned.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Effect {
    /// Definitely no side effects occurred.
    None,
    /// Side effects definitely occurred (locally or remotely).
    Some,
    /// We don't know if side effects occurred.
    Unknown,
}

impl Effect {
    pub fn as_str(self) -> &'static str {
        match self {
            Effect::None => "none",
            Effect::Some => "some",
            Effect::Unknown => "unknown",
        }
    }
}

/// Crate-level convenience error.
///
/// A thin wrapper over the canonical capability errors; admin refusals and
/// malformed payloads are pure in-memory rejections, so nothing here is
/// retryable and nothing leaves side effects. Transient conditions (an ANA
/// group with no candidate) are not errors at all: the reconcile sweep is
/// their retry loop.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Map(#[from] MapError),

    #[error(transparent)]
    Decode(#[from] DecodeError),
}

impl Error {
    pub fn transience(&self) -> Transience {
        match self {
            Error::Map(_) | Error::Decode(_) => Transience::Permanent,
        }
    }

    pub fn effect(&self) -> Effect {
        match self {
            Error::Map(_) | Error::Decode(_) => Effect::None,
        }
    }
}
