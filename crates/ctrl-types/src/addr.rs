//! # ISD-AS Addressing
//!
//! Issuer identities used to scope verification.

use crate::errors::AddrParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Largest valid AS number (48 bits).
pub const MAX_AS: u64 = (1 << 48) - 1;

/// AS numbers below this bound are written in decimal.
const MAX_BGP_AS: u64 = (1 << 32) - 1;

/// An isolation-domain / autonomous-system pair.
///
/// Formatted as `isd-as`, e.g. `1-ff00:0:110` or `2-64512`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "WireIsdAs")]
pub struct IsdAs {
    /// Isolation domain number.
    pub isd: u16,
    /// Autonomous system number (48 bits).
    pub asn: u64,
}

/// Unchecked wire form; deserialization goes through `IsdAs::new`.
#[derive(Deserialize)]
struct WireIsdAs {
    isd: u16,
    asn: u64,
}

impl TryFrom<WireIsdAs> for IsdAs {
    type Error = AddrParseError;

    fn try_from(wire: WireIsdAs) -> Result<Self, Self::Error> {
        Self::new(wire.isd, wire.asn)
    }
}

impl IsdAs {
    /// Create a new ISD-AS pair.
    ///
    /// # Errors
    ///
    /// Returns `AddrParseError::AsOutOfRange` if `asn` exceeds 48 bits.
    pub fn new(isd: u16, asn: u64) -> Result<Self, AddrParseError> {
        if asn > MAX_AS {
            return Err(AddrParseError::AsOutOfRange(asn));
        }
        Ok(Self { isd, asn })
    }

    /// Pack into a single 64-bit value (ISD in the top 16 bits).
    #[must_use]
    pub fn to_u64(&self) -> u64 {
        (u64::from(self.isd) << 48) | self.asn
    }

    /// Unpack from the 64-bit representation.
    #[must_use]
    pub fn from_u64(value: u64) -> Self {
        Self {
            isd: (value >> 48) as u16,
            asn: value & MAX_AS,
        }
    }

    /// The wildcard ISD-AS (`0-0`).
    #[must_use]
    pub fn is_wildcard(&self) -> bool {
        self.isd == 0 && self.asn == 0
    }
}

fn parse_as(s: &str) -> Result<u64, AddrParseError> {
    if !s.contains(':') {
        let asn: u64 = s.parse().map_err(|_| AddrParseError::InvalidAs(s.to_string()))?;
        if asn > MAX_BGP_AS {
            return Err(AddrParseError::InvalidAs(s.to_string()));
        }
        return Ok(asn);
    }

    let groups: Vec<&str> = s.split(':').collect();
    if groups.len() != 3 {
        return Err(AddrParseError::InvalidAs(s.to_string()));
    }

    let mut asn = 0u64;
    for group in groups {
        if group.is_empty() || group.len() > 4 {
            return Err(AddrParseError::InvalidAs(s.to_string()));
        }
        let value =
            u16::from_str_radix(group, 16).map_err(|_| AddrParseError::InvalidAs(s.to_string()))?;
        asn = (asn << 16) | u64::from(value);
    }
    Ok(asn)
}

impl FromStr for IsdAs {
    type Err = AddrParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (isd, asn) = s
            .split_once('-')
            .ok_or_else(|| AddrParseError::MissingSeparator(s.to_string()))?;
        let isd: u16 = isd
            .parse()
            .map_err(|_| AddrParseError::InvalidIsd(isd.to_string()))?;
        Self::new(isd, parse_as(asn)?)
    }
}

impl fmt::Display for IsdAs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.asn <= MAX_BGP_AS {
            return write!(f, "{}-{}", self.isd, self.asn);
        }
        write!(
            f,
            "{}-{:x}:{:x}:{:x}",
            self.isd,
            (self.asn >> 32) & 0xffff,
            (self.asn >> 16) & 0xffff,
            self.asn & 0xffff
        )
    }
}
