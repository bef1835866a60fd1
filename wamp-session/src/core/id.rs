use std::fmt::Display;

use async_trait::async_trait;
use futures_util::lock::Mutex;
use thiserror::Error;

use crate::core::types::{
    Integer,
    Value,
};

/// An integer ID, used for identification of sessions, requests, registrations, subscriptions,
/// and publications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct Id(u64);

impl Id {
    /// The minimum allowable value of an ID.
    pub const MIN: Id = Id(1);

    /// The maximum allowable value of an ID.
    pub const MAX: Id = Id(1 << 53);

    /// The raw integer value.
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl Default for Id {
    fn default() -> Self {
        Id::MIN
    }
}

impl Display for Id {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Error for an ID being out of range.
#[derive(Debug, Error)]
#[error("{value} is out of range for IDs")]
pub struct IdOutOfRange {
    value: i128,
}

impl IdOutOfRange {
    fn new<V>(value: V) -> Self
    where
        V: Into<i128>,
    {
        Self {
            value: value.into(),
        }
    }
}

impl TryFrom<u64> for Id {
    type Error = IdOutOfRange;
    fn try_from(value: u64) -> Result<Self, Self::Error> {
        if value < Self::MIN.0 || value > Self::MAX.0 {
            Err(IdOutOfRange::new(value))
        } else {
            Ok(Id(value))
        }
    }
}

impl TryFrom<Integer> for Id {
    type Error = IdOutOfRange;
    fn try_from(value: Integer) -> Result<Self, Self::Error> {
        u64::try_from(value)
            .map_err(|_| IdOutOfRange::new(value))
            .and_then(Id::try_from)
    }
}

impl TryFrom<&Value> for Id {
    type Error = IdOutOfRange;
    fn try_from(value: &Value) -> Result<Self, Self::Error> {
        match value {
            Value::Integer(value) => Id::try_from(*value),
            _ => Err(IdOutOfRange::new(0)),
        }
    }
}

impl From<Id> for Value {
    fn from(value: Id) -> Self {
        // IDs are bounded by 2^53, so they always fit.
        Value::Integer(value.0 as Integer)
    }
}

/// An ID allocator.
#[async_trait]
pub trait IdAllocator: Send + Sync {
    /// Generates a new ID.
    async fn generate_id(&self) -> Id;

    /// Resets the allocator to its initial state.
    async fn reset(&self);
}

/// An ID allocator that draws request IDs uniformly from the 32-bit unsigned range, excluding
/// zero.
///
/// Uniqueness among outstanding requests is enforced by the caller, which redraws on collision.
#[derive(Debug, Default)]
pub struct RandomIdAllocator {}

#[async_trait]
impl IdAllocator for RandomIdAllocator {
    async fn generate_id(&self) -> Id {
        loop {
            let id = rand::random::<u32>();
            if id != 0 {
                return Id(id.into());
            }
        }
    }

    async fn reset(&self) {}
}

/// An ID allocator that generates IDs sequentially.
#[derive(Debug, Default)]
pub struct SequentialIdAllocator {
    next: Mutex<Id>,
}

#[async_trait]
impl IdAllocator for SequentialIdAllocator {
    async fn generate_id(&self) -> Id {
        let mut lock = self.next.lock().await;
        let id = *lock;
        *lock = if id == Id::MAX { Id::MIN } else { Id(id.0 + 1) };
        id
    }

    async fn reset(&self) {
        let mut lock = self.next.lock().await;
        *lock = Id::MIN;
    }
}
