//! Hardware address type used by the pod-networks annotation.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use thiserror::Error;

/// Octet counts accepted for a hardware address: EUI-48, EUI-64 and
/// 20-octet IP over InfiniBand link-layer addresses.
const VALID_LENGTHS: [usize; 3] = [6, 8, 20];

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid MAC address {0:?}")]
pub struct MacParseError(pub String);

/// A hardware (MAC) address of 6, 8 or 20 octets.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MacAddress(Vec<u8>);

impl MacAddress {
    /// Builds a MAC address from raw octets.
    pub fn from_octets(octets: &[u8]) -> Result<Self, MacParseError> {
        if !VALID_LENGTHS.contains(&octets.len()) {
            return Err(MacParseError(format!("{octets:02x?}")));
        }
        Ok(Self(octets.to_vec()))
    }

    /// Raw octets of the address.
    #[must_use]
    pub fn octets(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; 6]> for MacAddress {
    fn from(value: [u8; 6]) -> Self {
        Self(value.to_vec())
    }
}

impl Display for MacAddress {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for (i, octet) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(":")?;
            }
            write!(f, "{octet:02x}")?;
        }
        Ok(())
    }
}

impl FromStr for MacAddress {
    type Err = MacParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || MacParseError(s.to_string());

        // Separator position decides the notation: 00:00:5e:.. / 00-00-5e-.. / 0000.5e00..
        let (separator, group_len) = match s.as_bytes().get(2) {
            Some(b':') => (':', 2),
            Some(b'-') => ('-', 2),
            _ if s.as_bytes().get(4) == Some(&b'.') => ('.', 4),
            _ => return Err(invalid()),
        };

        let mut octets = Vec::with_capacity(20);
        for group in s.split(separator) {
            if group.len() != group_len || !group.bytes().all(|b| b.is_ascii_hexdigit()) {
                return Err(invalid());
            }
            for pair in group.as_bytes().chunks(2) {
                let pair = std::str::from_utf8(pair).map_err(|_| invalid())?;
                octets.push(u8::from_str_radix(pair, 16).map_err(|_| invalid())?);
            }
        }

        if !VALID_LENGTHS.contains(&octets.len()) {
            return Err(invalid());
        }

        Ok(Self(octets))
    }
}
