//! Global addresses, locality ids, and component types.
//!
//! A [`GlobalAddress`] is 128 bits. The upper 32 bits of `msb` hold the
//! owning locality's id plus one, so the locality can be read off any address
//! without asking the resolver. Zero there marks a malformed address.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ApplierError;

const LOCALITY_SHIFT: u32 = 32;
const LOCALITY_MASK: u64 = 0xFFFF_FFFF;

// ── LocalityId ──────────────────────────────────────────────────────

/// Identifies one process/node of the distributed runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LocalityId(u32);

impl LocalityId {
    /// Reserved id that never names a locality.
    pub const INVALID: Self = Self(u32::MAX);

    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    pub const fn get(self) -> u32 {
        self.0
    }

    pub const fn is_valid(self) -> bool {
        self.0 != u32::MAX
    }
}

impl fmt::Display for LocalityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(f, "L{}", self.0)
        } else {
            write!(f, "L<invalid>")
        }
    }
}

// ── LocalAddress ────────────────────────────────────────────────────

/// A locality-local virtual address, meaningful only on its own locality.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LocalAddress(pub u64);

impl LocalAddress {
    pub const NULL: Self = Self(0);

    pub const fn is_null(self) -> bool {
        self.0 == 0
    }
}

// ── ComponentType ───────────────────────────────────────────────────

/// Kind of component a locality hosts; used to filter locality enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ComponentType(pub u32);

impl ComponentType {
    /// Matches every locality.
    pub const ANY: Self = Self(u32::MAX);

    pub const fn matches(self, other: ComponentType) -> bool {
        self.0 == u32::MAX || self.0 == other.0
    }
}

// ── GlobalAddress ───────────────────────────────────────────────────

/// Uniquely identifies an entity anywhere in the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GlobalAddress {
    pub msb: u64,
    pub lsb: u64,
}

impl GlobalAddress {
    pub const fn new(msb: u64, lsb: u64) -> Self {
        Self { msb, lsb }
    }

    /// The address naming locality `id` itself.
    pub const fn for_locality(id: LocalityId) -> Self {
        Self::on_locality(id, 0)
    }

    /// An address for object `lsb` owned by locality `id`.
    pub const fn on_locality(id: LocalityId, lsb: u64) -> Self {
        let bits = (id.0 as u64 + 1) & LOCALITY_MASK;
        Self {
            msb: bits << LOCALITY_SHIFT,
            lsb,
        }
    }

    /// The owning locality, decoded from the address bits alone.
    pub fn locality(&self) -> Result<LocalityId, ApplierError> {
        match (self.msb >> LOCALITY_SHIFT) & LOCALITY_MASK {
            0 => Err(ApplierError::InvalidTargetAddress(*self)),
            bits => Ok(LocalityId((bits - 1) as u32)),
        }
    }

    /// Whether this is the address of a locality rather than of an object on it.
    pub fn is_locality(&self) -> bool {
        self.lsb == 0 && self.msb & LOCALITY_MASK == 0 && self.locality().is_ok()
    }
}

impl fmt::Display for GlobalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{:016x}, {:016x}}}", self.msb, self.lsb)
    }
}
