//! Object identifiers.

use std::fmt;

use smallvec::SmallVec;

use crate::error::{DecodeErrorKind, Error, Result};

/// Upper bound on sub-identifiers (RFC 2578 3.5).
pub const MAX_OID_LEN: usize = 128;

/// `sysUpTime.0`, the first varbind of every v2c/v3 notification.
pub const SYS_UPTIME: &[u32] = &[1, 3, 6, 1, 2, 1, 1, 3, 0];

/// `snmpTrapOID.0`, the second varbind of every v2c/v3 notification.
pub const SNMP_TRAP_OID: &[u32] = &[1, 3, 6, 1, 6, 3, 1, 1, 4, 1, 0];

/// Object identifier, inline up to 16 arcs.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Oid {
    arcs: SmallVec<[u32; 16]>,
}

impl Oid {
    pub fn new(arcs: impl IntoIterator<Item = u32>) -> Self {
        Self {
            arcs: arcs.into_iter().collect(),
        }
    }

    pub fn from_slice(arcs: &[u32]) -> Self {
        Self {
            arcs: SmallVec::from_slice(arcs),
        }
    }

    /// Parse dotted notation. A leading dot is tolerated (`.1.3.6.1`).
    ///
    /// ```
    /// use netloc::oid::Oid;
    ///
    /// let oid: Oid = "1.3.6.1.2.1.1.3.0".parse().unwrap();
    /// assert_eq!(oid.len(), 9);
    /// assert!("1.3.x".parse::<Oid>().is_err());
    /// ```
    pub fn parse(s: &str) -> Result<Self> {
        s.trim_start_matches('.')
            .split('.')
            .filter(|part| !part.is_empty())
            .map(|part| {
                part.parse::<u32>()
                    .map_err(|_| Error::validation("oid", format!("bad arc {part:?} in {s:?}")))
            })
            .collect::<Result<SmallVec<_>>>()
            .map(|arcs| Self { arcs })
    }

    pub fn arcs(&self) -> &[u32] {
        &self.arcs
    }

    pub fn len(&self) -> usize {
        self.arcs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arcs.is_empty()
    }

    pub fn starts_with(&self, prefix: &Oid) -> bool {
        self.arcs.starts_with(&prefix.arcs)
    }

    /// Content octets of the BER encoding (X.690 8.19).
    pub fn to_ber(&self) -> SmallVec<[u8; 64]> {
        let mut out = SmallVec::new();
        let first = match self.arcs.as_slice() {
            [] => return out,
            [a] => a.saturating_mul(40),
            [a, b, ..] => a.saturating_mul(40).saturating_add(*b),
        };
        push_subidentifier(&mut out, first);
        for &arc in self.arcs.iter().skip(2) {
            push_subidentifier(&mut out, arc);
        }
        out
    }

    /// Decode content octets. `offset` locates `data` for error reporting.
    pub fn from_ber(data: &[u8], offset: usize) -> Result<Self> {
        let mut arcs: SmallVec<[u32; 16]> = SmallVec::new();
        let mut pos = 0;
        while pos < data.len() {
            let (value, used) = read_subidentifier(&data[pos..], offset + pos)?;
            if pos == 0 {
                let (a, b) = match value {
                    0..=39 => (0, value),
                    40..=79 => (1, value - 40),
                    _ => (2, value - 80),
                };
                arcs.push(a);
                arcs.push(b);
            } else {
                arcs.push(value);
            }
            pos += used;
            if arcs.len() > MAX_OID_LEN {
                return Err(Error::decode(
                    offset + pos,
                    DecodeErrorKind::OidTooLong {
                        count: arcs.len(),
                        max: MAX_OID_LEN,
                    },
                ));
            }
        }
        Ok(Self { arcs })
    }
}

fn push_subidentifier(out: &mut SmallVec<[u8; 64]>, value: u32) {
    let groups = (32 - value.leading_zeros()).div_ceil(7).max(1);
    for i in (0..groups).rev() {
        let septet = ((value >> (7 * i)) & 0x7F) as u8;
        out.push(if i > 0 { septet | 0x80 } else { septet });
    }
}

fn read_subidentifier(data: &[u8], offset: usize) -> Result<(u32, usize)> {
    let mut value: u32 = 0;
    for (i, &byte) in data.iter().enumerate() {
        if value > u32::MAX >> 7 {
            return Err(Error::decode(offset + i, DecodeErrorKind::IntegerOverflow));
        }
        value = (value << 7) | u32::from(byte & 0x7F);
        if byte & 0x80 == 0 {
            return Ok((value, i + 1));
        }
    }
    Err(Error::decode(offset + data.len(), DecodeErrorKind::TruncatedData))
}

impl fmt::Display for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, arc) in self.arcs.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{arc}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Oid({self})")
    }
}

impl std::str::FromStr for Oid {
    type Err = Box<Error>;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl From<&[u32]> for Oid {
    fn from(arcs: &[u32]) -> Self {
        Self::from_slice(arcs)
    }
}

impl<const N: usize> From<[u32; N]> for Oid {
    fn from(arcs: [u32; N]) -> Self {
        Self::new(arcs)
    }
}

/// Build an [`Oid`](crate::oid::Oid) from literal arcs.
///
/// ```
/// use netloc::oid;
///
/// let link_down = oid!(1, 3, 6, 1, 6, 3, 1, 1, 5, 3);
/// assert_eq!(link_down.to_string(), "1.3.6.1.6.3.1.1.5.3");
/// ```
#[macro_export]
macro_rules! oid {
    ($($arc:expr),* $(,)?) => {
        $crate::oid::Oid::from_slice(&[$($arc),*])
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ber_encoding() {
        assert_eq!(&oid!(1, 3, 6, 1).to_ber()[..], &[0x2B, 0x06, 0x01]);
        // 2.999 needs a multi-byte first subidentifier
        assert_eq!(&oid!(2, 999).to_ber()[..], &[0x88, 0x37]);
        assert_eq!(&oid!(1, 3, 128).to_ber()[..], &[0x2B, 0x81, 0x00]);
    }

    #[test]
    fn test_ber_decoding() {
        let oid = Oid::from_ber(&[0x2B, 0x06, 0x01, 0x04, 0x01, 0x89, 0x36], 0).unwrap();
        assert_eq!(oid.arcs(), &[1, 3, 6, 1, 4, 1, 1206]);
        assert!(Oid::from_ber(&[0x2B, 0x86], 0).is_err());
    }

    #[test]
    fn test_display_and_parse() {
        let oid = Oid::parse(".1.3.6.1.6.3.1.1.4.1.0").unwrap();
        assert_eq!(oid.arcs(), SNMP_TRAP_OID);
        assert_eq!(oid.to_string(), "1.3.6.1.6.3.1.1.4.1.0");
    }

    #[test]
    fn test_too_many_arcs() {
        let mut data = vec![0x2B];
        data.extend(std::iter::repeat_n(0x01, MAX_OID_LEN));
        assert!(Oid::from_ber(&data, 0).is_err());
    }
}
