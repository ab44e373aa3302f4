//! Fixed-width bone sets

use std::fmt;
use std::ops::{BitAnd, BitAndAssign, BitOr, BitOrAssign, Not};

/// A set of at most [`BoneMask::BITS`] bones, one bit per bone index
///
/// Used for selection, for tracking which bones were touched during a frame,
/// for per-vertex bone influences and for the bones an action animates.
/// Armatures larger than the mask width are rejected when they are built.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BoneMask(u32);

impl BoneMask {
    /// Number of bones a mask can address
    pub const BITS: usize = 32;

    /// No bones
    pub const EMPTY: Self = Self(0);

    /// Only the root bone (index 0)
    pub const ROOT: Self = Self(1);

    /// Every addressable bone
    pub const ALL: Self = Self(u32::MAX);

    /// Mask holding a single bone
    pub fn bone(index: usize) -> Self {
        debug_assert!(index < Self::BITS, "bone index {index} exceeds mask width");
        Self(1u32 << index)
    }

    /// Mask holding bones `0..count`
    pub fn first(count: usize) -> Self {
        debug_assert!(count <= Self::BITS);
        if count >= Self::BITS {
            Self::ALL
        } else {
            Self((1u32 << count) - 1)
        }
    }

    /// Build a mask from raw bits
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Raw bits
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Whether the bone is in the set
    pub fn contains(self, index: usize) -> bool {
        index < Self::BITS && self.0 & (1u32 << index) != 0
    }

    /// Add a bone
    pub fn insert(&mut self, index: usize) {
        debug_assert!(index < Self::BITS, "bone index {index} exceeds mask width");
        self.0 |= 1u32 << index;
    }

    /// Remove a bone
    pub fn remove(&mut self, index: usize) {
        if index < Self::BITS {
            self.0 &= !(1u32 << index);
        }
    }

    /// Union of two sets
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Intersection of two sets
    pub const fn intersection(self, other: Self) -> Self {
        Self(self.0 & other.0)
    }

    /// Whether the two sets share at least one bone
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    /// Whether every bone of `other` is also in `self`
    pub const fn contains_all(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Whether the set is empty
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Number of bones in the set
    pub const fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    /// Iterate over the bone indices in ascending order
    pub fn iter(self) -> impl Iterator<Item = usize> {
        let mut bits = self.0;
        std::iter::from_fn(move || {
            if bits == 0 {
                return None;
            }
            let index = bits.trailing_zeros() as usize;
            bits &= bits - 1;
            Some(index)
        })
    }
}

impl BitOr for BoneMask {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

impl BitOrAssign for BoneMask {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for BoneMask {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        self.intersection(rhs)
    }
}

impl BitAndAssign for BoneMask {
    fn bitand_assign(&mut self, rhs: Self) {
        self.0 &= rhs.0;
    }
}

impl Not for BoneMask {
    type Output = Self;

    fn not(self) -> Self {
        Self(!self.0)
    }
}

impl FromIterator<usize> for BoneMask {
    fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
        let mut mask = Self::EMPTY;
        for index in iter {
            mask.insert(index);
        }
        mask
    }
}

impl fmt::Debug for BoneMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BoneMask({:#034b})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_contains_remove() {
        let mut mask = BoneMask::EMPTY;
        mask.insert(3);
        mask.insert(31);
        assert!(mask.contains(3));
        assert!(mask.contains(31));
        assert!(!mask.contains(4));
        assert!(!mask.contains(40));
        mask.remove(3);
        assert!(!mask.contains(3));
        assert_eq!(mask.len(), 1);
    }

    #[test]
    fn test_first() {
        assert_eq!(BoneMask::first(0), BoneMask::EMPTY);
        assert_eq!(BoneMask::first(3).bits(), 0b111);
        assert_eq!(BoneMask::first(32), BoneMask::ALL);
    }

    #[test]
    fn test_set_operations() {
        let a = BoneMask::from_bits(0b0110);
        let b = BoneMask::from_bits(0b0011);
        assert_eq!((a | b).bits(), 0b0111);
        assert_eq!((a & b).bits(), 0b0010);
        assert!(a.intersects(b));
        assert!(!a.intersects(BoneMask::ROOT));
        assert!(BoneMask::first(4).contains_all(a));
    }

    #[test]
    fn test_iter_ascending() {
        let mask: BoneMask = [5, 0, 17].into_iter().collect();
        assert_eq!(mask.iter().collect::<Vec<_>>(), vec![0, 5, 17]);
    }
}
