//! Object-type bitmasks.
//!
//! Pick sensors and pickable groups name the object types they deal in.
//! Each distinct name gets one of 30 bits while anything uses it; once the
//! bits run out, new names share [`EXTENDED_MASK`], which overlaps every
//! allocated bit.

use rustc_hash::FxHashMap;

/// Matches every object type
pub const ALL_MASK: u32 = 0xFFFF_FFFF;
/// Matches nothing
pub const NONE_MASK: u32 = 0;
/// Shared by types allocated after the bits ran out
pub const EXTENDED_MASK: u32 = 0x7FFF_FFFF;

const AVAILABLE_BITS: u32 = 30;

#[derive(Clone, Copy, Debug)]
struct TypeEntry {
    mask: u32,
    refs: u32,
}

/// Reference-counted name → bit allocation
#[derive(Clone, Debug)]
pub struct ObjectTypeMasks {
    types: FxHashMap<String, TypeEntry>,
    /// Bits not held by any type
    free: u32,
}

impl Default for ObjectTypeMasks {
    fn default() -> Self {
        Self {
            types: FxHashMap::default(),
            free: (1u32 << AVAILABLE_BITS) - 1,
        }
    }
}

impl ObjectTypeMasks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take a reference on `name`, returning its mask
    pub fn add(&mut self, name: &str) -> u32 {
        match name {
            "ALL" => return ALL_MASK,
            "NONE" => return NONE_MASK,
            _ => {}
        }
        if let Some(entry) = self.types.get_mut(name) {
            entry.refs += 1;
            return entry.mask;
        }
        let mask = if self.free == 0 {
            tracing::debug!(name, "object type bits exhausted, using extended mask");
            EXTENDED_MASK
        } else {
            let bit = 1u32 << self.free.trailing_zeros();
            self.free &= !bit;
            bit
        };
        self.types
            .insert(name.to_string(), TypeEntry { mask, refs: 1 });
        mask
    }

    /// Drop a reference on `name`; the last one frees its bit.
    /// Returns false for names that were never added.
    pub fn remove(&mut self, name: &str) -> bool {
        let Some(entry) = self.types.get_mut(name) else {
            return false;
        };
        entry.refs -= 1;
        if entry.refs == 0 {
            let mask = entry.mask;
            self.types.remove(name);
            if mask != EXTENDED_MASK {
                self.free |= mask;
            }
        }
        true
    }

    /// Take a reference on each name, returning the combined mask
    pub fn register<S: AsRef<str>>(&mut self, names: &[S]) -> u32 {
        names.iter().fold(NONE_MASK, |acc, n| acc | self.add(n.as_ref()))
    }

    pub fn unregister<S: AsRef<str>>(&mut self, names: &[S]) {
        for name in names {
            self.remove(name.as_ref());
        }
    }

    /// Combined mask of already registered names; unknown names add nothing
    pub fn mask_for<S: AsRef<str>>(&self, names: &[S]) -> u32 {
        names.iter().fold(NONE_MASK, |acc, n| {
            acc | match n.as_ref() {
                "ALL" => ALL_MASK,
                "NONE" => NONE_MASK,
                other => self.types.get(other).map_or(NONE_MASK, |e| e.mask),
            }
        })
    }

    /// Live reference count of `name`
    pub fn refs(&self, name: &str) -> u32 {
        self.types.get(name).map_or(0, |e| e.refs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_special_names() {
        let mut masks = ObjectTypeMasks::new();
        assert_eq!(masks.add("ALL"), ALL_MASK);
        assert_eq!(masks.add("NONE"), NONE_MASK);
        assert_eq!(masks.refs("ALL"), 0);
    }

    #[test]
    fn test_distinct_bits_and_sharing() {
        let mut masks = ObjectTypeMasks::new();
        let a = masks.add("terrain");
        let b = masks.add("vehicle");
        assert_ne!(a, b);
        assert_eq!(a.count_ones(), 1);
        assert_eq!(masks.add("terrain"), a);
        assert_eq!(masks.refs("terrain"), 2);
        assert_eq!(masks.mask_for(&["terrain", "vehicle", "unknown"]), a | b);
    }

    #[test]
    fn test_bit_returns_to_pool() {
        let mut masks = ObjectTypeMasks::new();
        let a = masks.add("a");
        masks.add("a");
        assert!(masks.remove("a"));
        assert_eq!(masks.add("b") & a, 0);
        assert!(masks.remove("a"));
        assert_eq!(masks.add("c"), a);
        assert!(!masks.remove("never"));
    }

    #[test]
    fn test_extended_after_exhaustion() {
        let mut masks = ObjectTypeMasks::new();
        for i in 0..30 {
            assert_ne!(masks.add(&format!("type{i}")), EXTENDED_MASK);
        }
        assert_eq!(masks.add("overflow"), EXTENDED_MASK);
        assert!(masks.remove("overflow"));
        assert_eq!(masks.add("again"), EXTENDED_MASK);
    }
}
