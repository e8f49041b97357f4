use serde::{Deserialize, Serialize};

/// A closed interval [lo, hi] of Modbus register/coil addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressRange {
    pub lo: u16,
    pub hi: u16,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AddressRangeError {
    #[error("address range start {lo} is greater than end {hi}")]
    Inverted { lo: u16, hi: u16 },
}

impl AddressRange {
    pub fn new(lo: u16, hi: u16) -> Result<Self, AddressRangeError> {
        if lo > hi {
            return Err(AddressRangeError::Inverted { lo, hi });
        }
        Ok(Self { lo, hi })
    }

    /// Number of addresses covered, e.g. [0, 9] contains 10.
    pub fn len(&self) -> u32 {
        u32::from(self.hi) - u32::from(self.lo) + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn contains(&self, address: u16) -> bool {
        address >= self.lo && address <= self.hi
    }

    pub fn iter(&self) -> impl Iterator<Item = u16> {
        (self.lo..=self.hi).into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_inverted_range() {
        assert!(AddressRange::new(10, 5).is_err());
    }

    #[test]
    fn len_is_inclusive() {
        assert_eq!(AddressRange::new(0, 9).unwrap().len(), 10);
        assert_eq!(AddressRange::new(5, 5).unwrap().len(), 1);
        assert_eq!(AddressRange::new(0, 65535).unwrap().len(), 65536);
    }
}
