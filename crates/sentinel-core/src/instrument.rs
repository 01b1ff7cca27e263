//! Broker instrument addressing.
//!
//! An instrument is identified by a numeric security id *within* an
//! exchange segment; the same id can exist in two segments. Segments
//! travel as strings over REST (`"NSE_FNO"`) and as one-byte codes in
//! binary feed packets.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{CoreError, Result};

/// Exchange segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Segment {
    /// Index values (NIFTY, BANKNIFTY spot).
    IdxI,
    NseEq,
    NseFno,
    NseCurrency,
    BseEq,
    McxComm,
    BseCurrency,
    BseFno,
}

impl Segment {
    pub const ALL: [Segment; 8] = [
        Segment::IdxI,
        Segment::NseEq,
        Segment::NseFno,
        Segment::NseCurrency,
        Segment::BseEq,
        Segment::McxComm,
        Segment::BseCurrency,
        Segment::BseFno,
    ];

    /// Wire name used by the REST API.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::IdxI => "IDX_I",
            Self::NseEq => "NSE_EQ",
            Self::NseFno => "NSE_FNO",
            Self::NseCurrency => "NSE_CURRENCY",
            Self::BseEq => "BSE_EQ",
            Self::McxComm => "MCX_COMM",
            Self::BseCurrency => "BSE_CURRENCY",
            Self::BseFno => "BSE_FNO",
        }
    }

    /// Numeric code used in binary feed packets.
    pub fn code(&self) -> u8 {
        match self {
            Self::IdxI => 0,
            Self::NseEq => 1,
            Self::NseFno => 2,
            Self::NseCurrency => 3,
            Self::BseEq => 4,
            Self::McxComm => 5,
            Self::BseCurrency => 7,
            Self::BseFno => 8,
        }
    }

    /// Inverse of [`Segment::code`]. Code 6 is unassigned.
    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.code() == code)
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Segment {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        let upper = s.trim().to_ascii_uppercase();
        Self::ALL
            .into_iter()
            .find(|seg| seg.as_str() == upper)
            .ok_or_else(|| CoreError::UnknownSegment(s.to_string()))
    }
}

/// Broker security id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SecurityId(pub u32);

impl SecurityId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn get(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for SecurityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SecurityId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        s.trim()
            .parse::<u32>()
            .map(Self)
            .map_err(|_| CoreError::InvalidSecurityId(s.to_string()))
    }
}

/// Fully-qualified instrument: security id within a segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct InstrumentRef {
    pub security_id: SecurityId,
    pub segment: Segment,
}

impl InstrumentRef {
    pub fn new(security_id: SecurityId, segment: Segment) -> Self {
        Self {
            security_id,
            segment,
        }
    }
}

impl fmt::Display for InstrumentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.segment, self.security_id)
    }
}
