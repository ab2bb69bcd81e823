//! Archive addressing: bits, masks and capability kinds.
//!
//! Every registered archive owns exactly one bit in a fixed index space.
//! Channels and events select their target archives with an [`ArchiveMask`].

use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum number of archives that can be registered.
///
/// Equal to the width of [`ArchiveMask`].
pub const MAX_ARCHIVE_COUNT: usize = 32;

/// Bitset of archive bits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArchiveMask(pub u32);

impl ArchiveMask {
    /// Mask selecting no archive.
    pub const NONE: ArchiveMask = ArchiveMask(0);

    /// Mask selecting every archive.
    pub const ALL: ArchiveMask = ArchiveMask(u32::MAX);

    /// Mask with a single bit set. Bits outside the index space are ignored.
    pub fn from_bit(bit: usize) -> Self {
        ArchiveMask::NONE.with_bit(bit)
    }

    /// Return a copy with `bit` set.
    pub fn with_bit(self, bit: usize) -> Self {
        if bit < MAX_ARCHIVE_COUNT {
            ArchiveMask(self.0 | (1u32 << bit))
        } else {
            self
        }
    }

    /// Whether `bit` is selected.
    pub fn contains(&self, bit: usize) -> bool {
        bit < MAX_ARCHIVE_COUNT && self.0 & (1u32 << bit) != 0
    }

    /// Selected bits in ascending order.
    pub fn bits(&self) -> impl Iterator<Item = usize> + '_ {
        (0..MAX_ARCHIVE_COUNT).filter(move |&bit| self.contains(bit))
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

impl From<u32> for ArchiveMask {
    fn from(mask: u32) -> Self {
        ArchiveMask(mask)
    }
}

impl FromIterator<usize> for ArchiveMask {
    fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
        iter.into_iter()
            .fold(ArchiveMask::NONE, |mask, bit| mask.with_bit(bit))
    }
}

impl fmt::Display for ArchiveMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

/// Capability kind of an archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArchiveKind {
    /// Instantaneous snapshot of current data.
    Current,
    /// Historical trend storage.
    Historical,
    /// Event log.
    Event,
}

impl fmt::Display for ArchiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArchiveKind::Current => write!(f, "current"),
            ArchiveKind::Historical => write!(f, "historical"),
            ArchiveKind::Event => write!(f, "event"),
        }
    }
}

impl std::str::FromStr for ArchiveKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "current" | "cur" => Ok(ArchiveKind::Current),
            "historical" | "hist" | "trend" => Ok(ArchiveKind::Historical),
            "event" | "events" => Ok(ArchiveKind::Event),
            _ => Err(format!("unknown archive kind: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_bits() {
        let mask = ArchiveMask::from_bit(0).with_bit(3).with_bit(31);
        assert_eq!(mask.bits().collect::<Vec<_>>(), vec![0, 3, 31]);
        assert!(mask.contains(3));
        assert!(!mask.contains(4));
        assert!(!mask.contains(32));
    }

    #[test]
    fn test_mask_ignores_out_of_range_bits() {
        let mask = ArchiveMask::from_bit(MAX_ARCHIVE_COUNT);
        assert!(mask.is_empty());
        let mask: ArchiveMask = [1usize, 2, 64].into_iter().collect();
        assert_eq!(mask, ArchiveMask(0b110));
    }

    #[test]
    fn test_mask_display() {
        assert_eq!(ArchiveMask(5).to_string(), "0x00000005");
    }

    #[test]
    fn test_kind_parse() {
        assert_eq!("current".parse::<ArchiveKind>().unwrap(), ArchiveKind::Current);
        assert_eq!("trend".parse::<ArchiveKind>().unwrap(), ArchiveKind::Historical);
        assert_eq!("Events".parse::<ArchiveKind>().unwrap(), ArchiveKind::Event);
        assert!("minute".parse::<ArchiveKind>().is_err());
    }
}
