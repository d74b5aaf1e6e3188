#![forbid(unsafe_code)]
#![doc = include_str!("../README.md")]

mod args;
mod env;
mod error;
mod identity;
mod invoke;
mod output;
mod registry;
mod state;
mod status;
mod task;
mod unit;

use std::fmt::Debug;

use serde::{Deserialize, Serialize};

pub use crate::env::{DEFAULT_TAGS_HEADER, GeneratorEnv};
pub use crate::error::{InvokeError, OutputError, TaskError};
pub use crate::identity::{Identity, IdentityLedger};
pub use crate::invoke::{COMMAND_LENGTH_LIMIT, InvokeStrategy};
pub use crate::output::GenRecord;
pub use crate::registry::PathRegistry;
pub use crate::state::{BuildState, TaskState};
pub use crate::status::{RunnableStatus, Staleness};
pub use crate::task::{GenTask, HeaderScanner, NoScan};
pub use crate::unit::{BuildUnit, UnitState};

/// 32 bytes length generic hash
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Hash32([u8; 32]);

impl<T> From<T> for Hash32
where
    T: Into<[u8; 32]>,
{
    fn from(value: T) -> Self {
        Hash32(value.into())
    }
}

impl Hash32 {
    pub fn hash(buffer: impl AsRef<[u8]>) -> Self {
        blake3::Hasher::new()
            .update(buffer.as_ref())
            .finalize()
            .into()
    }

    pub fn hash_file(path: impl AsRef<std::path::Path>) -> std::io::Result<Self> {
        Ok(blake3::Hasher::new()
            .update_mmap_rayon(path)?
            .finalize()
            .into())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(self) -> String {
        const HEX: &[u8; 16] = b"0123456789abcdef";
        let mut acc = vec![0u8; 64];

        for (i, &byte) in self.0.iter().enumerate() {
            acc[i * 2] = HEX[(byte >> 4) as usize];
            acc[i * 2 + 1] = HEX[(byte & 0xF) as usize];
        }

        String::from_utf8(acc).unwrap()
    }
}

impl Debug for Hash32 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Hash32({})", self.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_stable() {
        assert_eq!(Hash32::hash(b"kigen"), Hash32::hash(b"kigen"));
        assert_ne!(Hash32::hash(b"kigen"), Hash32::hash(b"kigen2"));
    }

    #[test]
    fn hex_roundtrip_length() {
        let hex = Hash32::hash(b"abc").to_hex();
        assert_eq!(hex.len(), 64);
        assert!(hex.bytes().all(|b| b.is_ascii_hexdigit()));
    }
}
