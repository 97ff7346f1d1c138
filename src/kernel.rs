use serde::{Deserialize, Serialize};

use crate::scratchpad::CnContext;

/// A Cryptonight-family kernel of some width N. `input` holds N consecutive
/// `work_size`-byte pre-images, `output` receives N×32 digest bytes, and
/// `ctxs` supplies one scratchpad context per lane.
///
/// The AES-NI kernels live outside this crate; the engine only depends on
/// this contract.
pub type CnHashFn = fn(input: &[u8], work_size: usize, output: &mut [u8], ctxs: &mut [CnContext]);

/// Kernel width: how many nonces one invocation hashes in parallel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Multiway {
    Single = 1,
    Double = 2,
    Quad = 4,
    Pent = 5,
    Hex = 6,
}

impl Multiway {
    pub fn ways(self) -> usize {
        self as usize
    }
}

impl TryFrom<u8> for Multiway {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Single),
            2 => Ok(Self::Double),
            4 => Ok(Self::Quad),
            5 => Ok(Self::Pent),
            6 => Ok(Self::Hex),
            other => Err(format!("unsupported multiway width: {other}")),
        }
    }
}

impl From<Multiway> for u8 {
    fn from(value: Multiway) -> Self {
        value as u8
    }
}

/// One kernel per supported width. Workers pick their function once at
/// start; the hot loop calls it as a plain value.
#[derive(Clone, Copy)]
pub struct KernelSet {
    pub single: CnHashFn,
    pub double: CnHashFn,
    pub quad: CnHashFn,
    pub pent: CnHashFn,
    pub hex: CnHashFn,
}

impl KernelSet {
    pub fn for_width(&self, width: Multiway) -> CnHashFn {
        match width {
            Multiway::Single => self.single,
            Multiway::Double => self.double,
            Multiway::Quad => self.quad,
            Multiway::Pent => self.pent,
            Multiway::Hex => self.hex,
        }
    }

    /// One function serving every width. The function still receives the
    /// true lane count through `ctxs`/`input`.
    pub fn uniform(hash_fn: CnHashFn) -> Self {
        Self {
            single: hash_fn,
            double: hash_fn,
            quad: hash_fn,
            pent: hash_fn,
            hex: hash_fn,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn width_round_trips_through_u8() {
        for width in [
            Multiway::Single,
            Multiway::Double,
            Multiway::Quad,
            Multiway::Pent,
            Multiway::Hex,
        ] {
            assert_eq!(Multiway::try_from(u8::from(width)), Ok(width));
        }
        assert!(Multiway::try_from(3).is_err());
        assert!(Multiway::try_from(0).is_err());
    }

    #[test]
    fn ways_matches_discriminant() {
        assert_eq!(Multiway::Single.ways(), 1);
        assert_eq!(Multiway::Hex.ways(), 6);
    }
}
