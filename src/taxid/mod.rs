//! CNPJ handling: normalization, checksum validation, formatting
//!
//! Validation is fully local. A syntactically invalid tax id never reaches
//! the registry connector and never consumes rate-limit budget.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Length of a CNPJ in digits
const CNPJ_LEN: usize = 14;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum TaxIdError {
    #[error("CNPJ must have 14 digits, got {0}")]
    WrongLength(usize),

    #[error("CNPJ with all digits equal is reserved")]
    RepeatedDigits,

    #[error("CNPJ check digits do not match")]
    ChecksumMismatch,
}

/// A validated CNPJ, stored as 14 digits
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Cnpj(String);

impl Cnpj {
    /// Parse from any common notation ("11.222.333/0001-81" or bare digits).
    /// Non-digit characters are stripped before validation.
    pub fn parse(raw: &str) -> Result<Self, TaxIdError> {
        let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();

        if digits.len() != CNPJ_LEN {
            return Err(TaxIdError::WrongLength(digits.len()));
        }

        let bytes: Vec<u8> = digits.bytes().map(|b| b - b'0').collect();

        // "00000000000000".."99999999999999" with a single repeated digit
        // pass the checksum but are reserved
        if bytes.iter().all(|&d| d == bytes[0]) {
            return Err(TaxIdError::RepeatedDigits);
        }

        let dv1 = check_digit(&bytes[..12]);
        let dv2 = check_digit(&bytes[..13]);

        if bytes[12] != dv1 || bytes[13] != dv2 {
            return Err(TaxIdError::ChecksumMismatch);
        }

        Ok(Cnpj(digits))
    }

    /// The 14 bare digits
    pub fn digits(&self) -> &str {
        &self.0
    }

    /// Standard "XX.XXX.XXX/XXXX-XX" notation
    pub fn formatted(&self) -> String {
        let d = &self.0;
        format!(
            "{}.{}.{}/{}-{}",
            &d[0..2],
            &d[2..5],
            &d[5..8],
            &d[8..12],
            &d[12..14]
        )
    }
}

impl fmt::Display for Cnpj {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Cnpj {
    type Error = TaxIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Cnpj::parse(&value)
    }
}

impl From<Cnpj> for String {
    fn from(cnpj: Cnpj) -> Self {
        cnpj.0
    }
}

/// Weighted sum mod 11 over the leading digits. Weights walk down from
/// `len - 7` to 2 and wrap back to 9, the registry's published scheme.
fn check_digit(digits: &[u8]) -> u8 {
    let mut pos = digits.len() as u32 - 7;
    let mut sum: u32 = 0;

    for &d in digits {
        sum += d as u32 * pos;
        pos = if pos == 2 { 9 } else { pos - 1 };
    }

    let rem = sum % 11;
    if rem < 2 {
        0
    } else {
        (11 - rem) as u8
    }
}
