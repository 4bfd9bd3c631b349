//! Actor identity and addressing.
//!
//! A process-unique opaque id used for equality/lookup, separate from a
//! human-readable slash-joined path used for logging, the supervision tree
//! printer, and error messages.

use std::fmt;
use std::sync::Arc;

use regex::Regex;
use uuid::Uuid;

/// A process-unique opaque actor identity.
///
/// A UUID v4, so that forked and remote workers - which do not share the
/// parent's random state - can mint ids with the same collision
/// characteristics as the parent.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActorId(Uuid);

impl ActorId {
    pub fn new() -> Self {
        ActorId(Uuid::new_v4())
    }

    /// The nil id, used for the synthetic root's "no parent" sentinel and in
    /// tests.
    pub fn nil() -> Self {
        ActorId(Uuid::nil())
    }
}

impl Default for ActorId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ActorId({})", self.0)
    }
}

/// A slash-joined path from the system root, e.g. `/user/worker-pool/0`.
///
/// Cheaply cloneable (an `Arc<str>` under the hood) since every `ActorRef`
/// carries one.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ActorPath(Arc<str>);

impl ActorPath {
    pub fn root() -> Self {
        ActorPath(Arc::from("/"))
    }

    pub fn child(&self, name: &str) -> Self {
        if self.0.as_ref() == "/" {
            ActorPath(Arc::from(format!("/{name}")))
        } else {
            ActorPath(Arc::from(format!("{}/{}", self.0, name)))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Reconstruct a path from its displayed form, e.g. a path string handed
    /// to a forked worker over an environment variable. Does not validate
    /// component names; the string is assumed to have come from a prior
    /// `ActorPath::as_str()`/`Display` call.
    pub fn from_str(s: &str) -> Self {
        ActorPath(Arc::from(s))
    }

    /// This actor's own name - the sibling-unique segment it was given at
    /// `createChild` time, e.g. `/worker-pool/0` -> `"0"`. The root path has
    /// no such segment and returns `""`; callers that need the root's
    /// category key resolve it from the root's configured behavior instead
    /// (§4.2).
    pub fn name(&self) -> &str {
        match self.0.rfind('/') {
            Some(idx) => &self.0[idx + 1..],
            None => &self.0,
        }
    }

    /// The path one level up: `/a/b` -> `/a`, `/a` -> `/`, `/` -> `/`.
    pub fn parent(&self) -> ActorPath {
        match self.0.rfind('/') {
            Some(0) | None => ActorPath::root(),
            Some(idx) => ActorPath(Arc::from(&self.0[..idx])),
        }
    }
}

impl fmt::Display for ActorPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for ActorPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ActorPath({})", self.0)
    }
}

/// An actor name must be unique among siblings and contain only
/// `[a-zA-Z0-9_-]`.
pub fn validate_name(name: &str) -> Result<(), InvalidName> {
    thread_local! {
        static NAME_RE: Regex = Regex::new(r"^[a-zA-Z0-9_-]+$").unwrap();
    }
    let ok = NAME_RE.with(|re| re.is_match(name));
    if ok {
        Ok(())
    } else {
        Err(InvalidName { name: name.into() })
    }
}

#[derive(Debug)]
pub struct InvalidName {
    pub name: String,
}

impl fmt::Display for InvalidName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "\"{}\": actor names may only contain a-Z, 0-9, _, or -",
            self.name
        )
    }
}

impl std::error::Error for InvalidName {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_is_the_last_path_segment() {
        let root = ActorPath::root();
        let child = root.child("worker-pool");
        assert_eq!(child.name(), "worker-pool");
        let grandchild = child.child("0");
        assert_eq!(grandchild.name(), "0");
    }

    #[test]
    fn child_path_joins_with_slash() {
        let root = ActorPath::root();
        let child = root.child("worker");
        assert_eq!(child.as_str(), "/worker");
        let grandchild = child.child("0");
        assert_eq!(grandchild.as_str(), "/worker/0");
    }

    #[test]
    fn name_validation_rejects_slashes() {
        assert!(validate_name("worker-1").is_ok());
        assert!(validate_name("worker/1").is_err());
        assert!(validate_name("").is_err());
    }

    #[test]
    fn distinct_ids_are_not_equal() {
        assert_ne!(ActorId::new(), ActorId::new());
    }
}
