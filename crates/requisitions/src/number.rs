//! Human-readable requisition numbers.

use core::str::FromStr;

use serde::{Deserialize, Serialize};

use procflow_core::{DomainError, DomainResult, ValueObject};

/// Human-readable requisition number.
///
/// The textual form `REQ-YYYY-NNN` is a contract for external consumers that
/// parse it: 4-digit year, sequence zero-padded to at least 3 digits,
/// hyphen-separated ASCII. Sequences restart at 1 each calendar year and
/// strictly increase within a year.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequisitionNumber {
    year: i32,
    sequence: u32,
}

impl RequisitionNumber {
    pub fn new(year: i32, sequence: u32) -> DomainResult<Self> {
        if !(1000..=9999).contains(&year) {
            return Err(DomainError::invalid_id(format!(
                "RequisitionNumber: year {year} is not four digits"
            )));
        }
        if sequence == 0 {
            return Err(DomainError::invalid_id(
                "RequisitionNumber: sequence starts at 1".to_string(),
            ));
        }
        Ok(Self { year, sequence })
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn sequence(&self) -> u32 {
        self.sequence
    }
}

impl core::fmt::Display for RequisitionNumber {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "REQ-{:04}-{:03}", self.year, self.sequence)
    }
}

impl FromStr for RequisitionNumber {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || DomainError::invalid_id(format!("RequisitionNumber: malformed '{s}'"));

        let rest = s.strip_prefix("REQ-").ok_or_else(malformed)?;
        let (year_part, seq_part) = rest.split_once('-').ok_or_else(malformed)?;

        if year_part.len() != 4 || !year_part.bytes().all(|b| b.is_ascii_digit()) {
            return Err(malformed());
        }
        if seq_part.len() < 3 || !seq_part.bytes().all(|b| b.is_ascii_digit()) {
            return Err(malformed());
        }
        // Sequences above 999 grow the field; shorter values stay zero-padded
        // to exactly three digits, so a longer field never starts with '0'.
        if seq_part.len() > 3 && seq_part.starts_with('0') {
            return Err(malformed());
        }

        let year = year_part.parse::<i32>().map_err(|_| malformed())?;
        let sequence = seq_part.parse::<u32>().map_err(|_| malformed())?;
        Self::new(year, sequence)
    }
}

impl ValueObject for RequisitionNumber {}
