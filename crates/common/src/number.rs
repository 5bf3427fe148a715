// Human-readable document numbers: `<PREFIX>-<YEAR>-<NNNN>`.
//
// The sequence is padded to four digits and grows naturally beyond 9999.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

pub const SEQUENCE_WIDTH: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocumentNumber {
    pub prefix: String,
    pub year: i32,
    pub sequence: u32,
}

impl DocumentNumber {
    pub fn new(prefix: impl Into<String>, year: i32, sequence: u32) -> Self {
        Self { prefix: prefix.into(), year, sequence }
    }
}

impl fmt::Display for DocumentNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{:0width$}", self.prefix, self.year, self.sequence, width = SEQUENCE_WIDTH)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DocumentNumberError {
    #[error("document number must look like PREFIX-YEAR-NNNN")]
    Shape,
    #[error("document number year is not numeric")]
    Year,
    #[error("document number sequence is not numeric")]
    Sequence,
}

impl FromStr for DocumentNumber {
    type Err = DocumentNumberError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let mut parts = value.rsplitn(3, '-');
        let (Some(sequence), Some(year), Some(prefix)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(DocumentNumberError::Shape);
        };
        if prefix.is_empty() || sequence.len() < SEQUENCE_WIDTH {
            return Err(DocumentNumberError::Shape);
        }

        Ok(Self {
            prefix: prefix.to_owned(),
            year: year.parse().map_err(|_| DocumentNumberError::Year)?,
            sequence: sequence.parse().map_err(|_| DocumentNumberError::Sequence)?,
        })
    }
}
