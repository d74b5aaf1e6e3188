use std::collections::HashMap;
use std::fmt::{self, Debug, Display};
use std::sync::Mutex;

use camino::Utf8Path;
use serde::{Deserialize, Serialize};

use crate::Hash32;
use crate::error::TaskError;

/// Content-derived identity of a generation task, used as the primary key
/// for cross-build caching.
///
/// Identical configurations always yield identical identities; any
/// semantically different configuration yields a different one. A collision
/// between distinct logical tasks is a fatal consistency violation, detected
/// by [`IdentityLedger`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity(Hash32);

impl Identity {
    pub fn to_hex(self) -> String {
        self.0.to_hex()
    }
}

impl Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identity({})", self.0.to_hex())
    }
}

impl Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.to_hex())
    }
}

/// Incremental hasher accumulating task configuration in a fixed order.
///
/// Every component is fed as its normalized text followed by a separator
/// byte, so adjacent components can never merge into the same digest input.
pub(crate) struct IdentityHasher {
    inner: blake3::Hasher,
}

impl IdentityHasher {
    pub fn new() -> Self {
        Self {
            inner: blake3::Hasher::new(),
        }
    }

    pub fn update_path(&mut self, path: &Utf8Path) {
        self.update_str(&clean_path(path));
    }

    pub fn update_str(&mut self, value: &str) {
        self.inner.update(value.as_bytes());
        self.inner.update(&[0xff]);
    }

    pub fn finish(self) -> Identity {
        Identity(self.inner.finalize().into())
    }
}

/// Normalize a path to forward slashes so identities compare across hosts.
pub(crate) fn clean_path(path: &Utf8Path) -> String {
    path.as_str().replace('\\', "/")
}

/// Shared ledger counting how often each identity has been claimed within
/// one build.
///
/// The re-run decision engine and the registrar both use the identity as an
/// exclusive key, so observing the same identity twice means the identity
/// function or its inputs are broken. The count check is a correctness
/// assertion, not a performance optimization.
#[derive(Debug, Default)]
pub struct IdentityLedger {
    seen: Mutex<HashMap<Identity, usize>>,
}

impl IdentityLedger {
    /// Claim an identity for one task. Errors on the second claim.
    pub fn record(&self, id: Identity) -> Result<(), TaskError> {
        let mut seen = self.seen.lock().unwrap();
        let count = seen.entry(id).or_insert(0);
        *count += 1;

        if *count > 1 {
            return Err(TaskError::Consistency(id));
        }

        Ok(())
    }
}
