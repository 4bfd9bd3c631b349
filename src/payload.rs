//! The opaque message payload carried by a `Delivery`.
//!
//! A downcast-on-demand `Box<dyn Any + Send>` for the in-process fast path,
//! plus the wire form needed once a message crosses a forked/remote process
//! boundary. The in-process path never pays a serialization cost; only an
//! endpoint that actually writes bytes to a child process or socket calls
//! `to_json`.

use std::any::Any;
use std::fmt;

#[cfg(feature = "serde")]
use serde::{de::DeserializeOwned, Serialize};

/// A value that can travel as a `Delivery` payload.
///
/// Blanket-implemented for anything `Any + Send + 'static`; the `serde`
/// feature additionally requires `Serialize + DeserializeOwned` so the value
/// can be reconstructed on the far side of a forked/remote endpoint.
#[cfg(feature = "serde")]
pub trait Message: Any + Send + Serialize + DeserializeOwned + 'static {}
#[cfg(feature = "serde")]
impl<T: Any + Send + Serialize + DeserializeOwned + 'static> Message for T {}

#[cfg(not(feature = "serde"))]
pub trait Message: Any + Send + 'static {}
#[cfg(not(feature = "serde"))]
impl<T: Any + Send + 'static> Message for T {}

/// A type-erased local value, plus (under `serde`) a thunk captured at
/// construction time that knows how to serialize it. The thunk exists
/// because `Box<dyn Any + Send>` alone forgets everything about `T` except
/// its `TypeId` - by the time an endpoint wants to serialize the value,
/// `T: Serialize` is no longer expressible without having captured it early.
struct LocalValue {
    value: Box<dyn Any + Send>,
    #[cfg(feature = "serde")]
    to_json: fn(&(dyn Any + Send)) -> serde_json::Value,
}

/// A type-erased, at-most-once-downcast message payload.
///
/// Holds either a boxed local value (the fast path, used for in-memory and
/// router endpoints) or a JSON value (the form produced by decoding a wire
/// frame in a forked/remote worker, or produced from a local value the first
/// time a forked/remote endpoint needs to serialize it).
pub enum Payload {
    Local(LocalValue),
    #[cfg(feature = "serde")]
    Json(serde_json::Value),
}

#[derive(Debug)]
pub struct DowncastError;

impl Payload {
    #[cfg(feature = "serde")]
    pub fn new<T: Message>(value: T) -> Self {
        fn to_json<T: Message>(v: &(dyn Any + Send)) -> serde_json::Value {
            let typed = v.downcast_ref::<T>().expect("thunk type matches box type");
            serde_json::to_value(typed).expect("Message values must be representable as JSON")
        }
        Payload::Local(LocalValue {
            value: Box::new(value),
            to_json: to_json::<T>,
        })
    }

    #[cfg(not(feature = "serde"))]
    pub fn new<T: Message>(value: T) -> Self {
        Payload::Local(LocalValue {
            value: Box::new(value),
        })
    }

    /// Attempt to recover a concrete type from the payload.
    pub fn downcast<T: Message>(self) -> Result<T, DowncastError> {
        match self {
            Payload::Local(local) => local
                .value
                .downcast::<T>()
                .map(|b| *b)
                .map_err(|_| DowncastError),
            #[cfg(feature = "serde")]
            Payload::Json(value) => serde_json::from_value(value).map_err(|_| DowncastError),
        }
    }

    /// Borrow a concrete type without consuming the payload, when the local
    /// fast path was used and the type matches (used by routers and
    /// balancers that need to peek at a message before forwarding it).
    pub fn downcast_ref<T: Message>(&self) -> Option<&T> {
        match self {
            Payload::Local(local) => local.value.downcast_ref::<T>(),
            #[cfg(feature = "serde")]
            Payload::Json(_) => None,
        }
    }

    /// Convert to the wire form. Required before crossing a forked/remote
    /// endpoint; serializes a local value lazily using the thunk captured
    /// at `Payload::new`.
    #[cfg(feature = "serde")]
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Payload::Json(v) => v.clone(),
            Payload::Local(local) => (local.to_json)(local.value.as_ref()),
        }
    }

    #[cfg(feature = "serde")]
    pub fn from_json(value: serde_json::Value) -> Self {
        Payload::Json(value)
    }

    /// True when a local value was deposited with type `T`; used by the
    /// dynamic topic tables to decide whether a handler applies without
    /// consuming the payload.
    pub fn is<T: Message>(&self) -> bool {
        match self {
            Payload::Local(local) => local.value.is::<T>(),
            #[cfg(feature = "serde")]
            Payload::Json(_) => true,
        }
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Payload::Local(_) => f.write_str("Payload::Local(..)"),
            #[cfg(feature = "serde")]
            Payload::Json(v) => write!(f, "Payload::Json({v})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_roundtrip() {
        let p = Payload::new(42u32);
        assert_eq!(p.downcast::<u32>().unwrap(), 42);
    }

    #[test]
    fn wrong_type_fails_downcast() {
        let p = Payload::new(42u32);
        assert!(p.downcast::<String>().is_err());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn json_roundtrip() {
        let p = Payload::new("hello".to_string());
        let json = p.to_json();
        assert_eq!(json, serde_json::json!("hello"));
        let back = Payload::from_json(json).downcast::<String>().unwrap();
        assert_eq!(back, "hello");
    }
}
