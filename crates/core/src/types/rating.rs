//! Review rating type.

use serde::{Deserialize, Serialize};

/// Error returned for a rating outside `1..=5`.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("rating must be between {min} and {max}, got {got}", min = Rating::MIN, max = Rating::MAX)]
pub struct RatingError {
    /// The rejected value.
    pub got: i32,
}

/// A review rating, always within `1..=5`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Rating(i16);

impl Rating {
    /// Lowest allowed rating.
    pub const MIN: i16 = 1;
    /// Highest allowed rating.
    pub const MAX: i16 = 5;

    /// Validate a raw rating.
    ///
    /// # Errors
    ///
    /// Returns [`RatingError`] if `value` is outside `1..=5`.
    pub fn new(value: i32) -> Result<Self, RatingError> {
        i16::try_from(value)
            .ok()
            .filter(|v| (Self::MIN..=Self::MAX).contains(v))
            .map(Self)
            .ok_or(RatingError { got: value })
    }

    /// Get the underlying value.
    #[must_use]
    pub const fn get(self) -> i16 {
        self.0
    }
}

impl<'de> Deserialize<'de> for Rating {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = i32::deserialize(deserializer)?;
        Self::new(raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounds_are_inclusive() {
        assert_eq!(Rating::new(1).map(Rating::get), Ok(1));
        assert_eq!(Rating::new(5).map(Rating::get), Ok(5));
    }

    #[test]
    fn test_out_of_range() {
        assert_eq!(Rating::new(0), Err(RatingError { got: 0 }));
        assert_eq!(Rating::new(6), Err(RatingError { got: 6 }));
        assert_eq!(Rating::new(-3), Err(RatingError { got: -3 }));
        assert_eq!(Rating::new(70_000), Err(RatingError { got: 70_000 }));
    }

    #[test]
    fn test_deserialize_validates() {
        assert!(serde_json::from_str::<Rating>("4").is_ok());
        assert!(serde_json::from_str::<Rating>("9").is_err());
    }
}
