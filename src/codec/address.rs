// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use base58::{FromBase58, ToBase58};
use bech32::{FromBase32, ToBase32, Variant};
use sha2::{Digest, Sha256};

/// Encode an address payload as base58-check: the payload followed by the
/// first 4 bytes of its double-SHA256.
pub fn encode_address(payload: &[u8]) -> String {
    let checksum = Sha256::digest(Sha256::digest(payload));
    let mut data = payload.to_vec();
    data.extend_from_slice(&checksum[..4]);
    data.to_base58()
}

/// Decode a base58-check address and strip the 4 checksum bytes.
///
/// The checksum is not validated here; callers that care compare the decoded
/// payload against known state or hand the string to the node.
pub fn decode_address(s: &str) -> Option<Vec<u8>> {
    let mut data = s.from_base58().ok()?;
    if data.len() <= 4 {
        return None;
    }
    data.truncate(data.len() - 4);
    Some(data)
}

/// Decode a bech32 string, requiring `hrp` and a data part of 2..=40 bytes.
pub fn bech32_decode(hrp: &str, s: &str) -> Option<Vec<u8>> {
    let (got_hrp, data, variant) = bech32::decode(s).ok()?;
    if got_hrp != hrp || variant != Variant::Bech32 {
        return None;
    }
    let bytes = Vec::<u8>::from_base32(&data).ok()?;
    if bytes.len() < 2 || bytes.len() > 40 {
        return None;
    }
    Some(bytes)
}

/// Encode bytes as bech32 under `hrp`. Returns `None` when the result would
/// not survive a round-trip decode.
pub fn bech32_encode(hrp: &str, data: &[u8]) -> Option<String> {
    let encoded = bech32::encode(hrp, data.to_base32(), Variant::Bech32).ok()?;
    bech32_decode(hrp, &encoded)?;
    Some(encoded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base58_check_round_trip() {
        let payload: Vec<u8> = (0u8..33).collect();
        let encoded = encode_address(&payload);
        assert_eq!(decode_address(&encoded).unwrap(), payload);
    }

    #[test]
    fn base58_rejects_short_and_invalid() {
        assert!(decode_address("1").is_none());
        assert!(decode_address("0OIl").is_none());
    }

    #[test]
    fn bech32_round_trip_with_hrp() {
        let data = [7u8; 32];
        let encoded = bech32_encode("pcs", &data).unwrap();
        assert_eq!(bech32_decode("pcs", &encoded).unwrap(), data);
        // Wrong human-readable part must not decode.
        assert!(bech32_decode("tpcs", &encoded).is_none());
    }

    #[test]
    fn bech32_length_limits() {
        assert!(bech32_encode("pcs", &[1u8]).is_none());
        assert!(bech32_encode("pcs", &[1u8; 41]).is_none());
        assert!(bech32_encode("pcs", &[1u8; 2]).is_some());
        assert!(bech32_encode("pcs", &[1u8; 40]).is_some());
    }
}
