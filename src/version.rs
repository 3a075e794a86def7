//! SNMP protocol versions.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{DecodeErrorKind, Error, Result};

/// Version as carried in the message header (`0`, `1`, `3`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Version {
    V1,
    V2c,
    V3,
}

impl Version {
    pub fn as_i32(self) -> i32 {
        match self {
            Version::V1 => 0,
            Version::V2c => 1,
            Version::V3 => 3,
        }
    }

    /// Map a wire value; `offset` is used for the error.
    pub fn from_wire(value: i32, offset: usize) -> Result<Self> {
        match value {
            0 => Ok(Version::V1),
            1 => Ok(Version::V2c),
            3 => Ok(Version::V3),
            other => Err(Error::decode(offset, DecodeErrorKind::UnknownVersion(other))),
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Version::V1 => "v1",
            Version::V2c => "v2c",
            Version::V3 => "v3",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_values() {
        assert_eq!(Version::from_wire(1, 0).unwrap(), Version::V2c);
        assert_eq!(Version::V3.as_i32(), 3);
        assert!(Version::from_wire(2, 4).is_err());
    }
}
