use std::fmt;

use crate::foundation::error::{PcError, PcResult};

/// Size in bytes of cache and pipeline identifiers.
pub const UUID_SIZE: usize = 16;

/// 16-byte identifier used for the cache UUID and per-pipeline identifiers.
pub type Uuid = [u8; UUID_SIZE];

/// Display adapter printing an identifier as `0x` followed by uppercase hex.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HexId<'a>(pub &'a Uuid);

impl fmt::Display for HexId<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("0x")?;
        for b in self.0 {
            write!(f, "{b:02X}")?;
        }
        Ok(())
    }
}

/// Format an identifier in its canonical text form.
pub fn uuid_to_hex(id: &Uuid) -> String {
    HexId(id).to_string()
}

/// Parse 32 hex digits (optionally `0x`-prefixed, any case) into an identifier.
pub fn parse_uuid_hex(s: &str) -> PcResult<Uuid> {
    let digits = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    if digits.len() != UUID_SIZE * 2 {
        return Err(PcError::manifest(format!(
            "identifier '{s}' must have {} hex digits, found {}",
            UUID_SIZE * 2,
            digits.len()
        )));
    }

    let mut out = [0u8; UUID_SIZE];
    for (i, pair) in digits.as_bytes().chunks(2).enumerate() {
        let hi = hex_nibble(pair[0]);
        let lo = hex_nibble(pair[1]);
        match (hi, lo) {
            (Some(hi), Some(lo)) => out[i] = (hi << 4) | lo,
            _ => {
                return Err(PcError::manifest(format!(
                    "identifier '{s}' contains a non-hex digit"
                )));
            }
        }
    }
    Ok(out)
}

fn hex_nibble(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

/// Serde adapter storing a [`Uuid`] as its hex text form.
pub mod uuid_hex {
    use super::{Uuid, parse_uuid_hex, uuid_to_hex};

    /// Serialize as `0x...` hex text.
    pub fn serialize<S: serde::Serializer>(id: &Uuid, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&uuid_to_hex(id))
    }

    /// Deserialize from hex text.
    pub fn deserialize<'de, D: serde::Deserializer<'de>>(d: D) -> Result<Uuid, D::Error> {
        let text: String = serde::Deserialize::deserialize(d)?;
        parse_uuid_hex(&text).map_err(serde::de::Error::custom)
    }
}
