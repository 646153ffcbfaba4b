//! The bet record submitted by agencies.

use chrono::NaiveDate;

/// Maximum length in bytes of a first or last name on the wire.
pub const MAX_NAME_LEN: usize = u8::MAX as usize;

/// A single lottery bet.
///
/// Constructed on a successful decode and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bet {
    /// Agency that took the bet (1..=N).
    pub agency: u8,
    pub first_name: String,
    pub last_name: String,
    /// National document number of the bettor.
    pub document: u32,
    pub birthdate: NaiveDate,
    /// The chosen lottery number.
    pub number: u32,
}

impl Bet {
    /// Create a new bet.
    pub fn new(
        agency: u8,
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        document: u32,
        birthdate: NaiveDate,
        number: u32,
    ) -> Self {
        Self {
            agency,
            first_name: first_name.into(),
            last_name: last_name.into(),
            document,
            birthdate,
            number,
        }
    }

    /// Check whether this bet matches the winning number.
    #[inline]
    pub fn has_won(&self, winning_number: u32) -> bool {
        self.number == winning_number
    }
}
