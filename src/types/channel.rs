//! 2.4 GHz channel numbers

use serde::{Deserialize, Serialize};
use std::fmt;

/// An 802.11 channel in the 2.4 GHz band (1 through 14).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Channel(u8);

impl Channel {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 14;

    /// The lowest channel, where hopping wraps back to.
    pub const FIRST: Channel = Channel(Self::MIN);

    /// Returns `None` for numbers outside 1..=14.
    pub const fn new(number: u8) -> Option<Self> {
        if number >= Self::MIN && number <= Self::MAX { Some(Channel(number)) } else { None }
    }

    pub const fn number(self) -> u8 {
        self.0
    }

    /// Next channel in the cyclic range `1..=max`, wrapping from `max` to 1.
    pub fn next_wrapping(self, max: Channel) -> Channel {
        if self.0 >= max.0 { Channel::FIRST } else { Channel(self.0 + 1) }
    }
}

impl TryFrom<u8> for Channel {
    type Error = String;

    fn try_from(number: u8) -> Result<Self, Self::Error> {
        Channel::new(number).ok_or_else(|| {
            format!("channel {} outside {}..={}", number, Channel::MIN, Channel::MAX)
        })
    }
}

impl From<Channel> for u8 {
    fn from(channel: Channel) -> u8 {
        channel.0
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_out_of_band_numbers() {
        assert!(Channel::new(0).is_none());
        assert!(Channel::new(15).is_none());
        assert_eq!(Channel::new(6).map(Channel::number), Some(6));
    }

    #[test]
    fn wraps_at_max() {
        let max = Channel::new(11).unwrap();
        assert_eq!(Channel::new(10).unwrap().next_wrapping(max).number(), 11);
        assert_eq!(max.next_wrapping(max), Channel::FIRST);
    }

    #[test]
    fn channel_above_max_wraps_to_first() {
        let max = Channel::new(6).unwrap();
        assert_eq!(Channel::new(9).unwrap().next_wrapping(max), Channel::FIRST);
    }

    #[test]
    fn deserializes_with_range_check() {
        let ok: Channel = serde_yaml_ng::from_str("11").unwrap();
        assert_eq!(ok.number(), 11);
        assert!(serde_yaml_ng::from_str::<Channel>("0").is_err());
    }
}
