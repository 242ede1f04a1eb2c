// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use super::{COIN, Error};

/// Render a satoshi amount as `"d.dddddddd"` with exactly 8 fractional
/// digits. Negative amounts are prefixed with `-`. Never uses scientific
/// notation and never rounds.
pub fn format_coin(i: i128) -> String {
    let n = i.unsigned_abs();
    let sign = if i < 0 { "-" } else { "" };
    format!("{sign}{}.{:08}", n / COIN as u128, n % COIN as u128)
}

/// Render a satoshi×10^8 accumulator amount with 16 fractional digits.
pub fn format_coin16(i: i128) -> String {
    let scale = COIN as u128 * COIN as u128;
    let n = i.unsigned_abs();
    let sign = if i < 0 { "-" } else { "" };
    format!("{sign}{}.{:016}", n / scale, n % scale)
}

/// Parse a coin amount from the node into satoshi.
///
/// The node writes amounts as decimal strings or JSON numbers
/// (e.g. `"0.12345678"`). Parsing is strict fixed-point with at most 8
/// fractional digits; anything beyond the eighth digit is floored away.
pub fn parse_coin(v: &serde_json::Value) -> Result<u64, Error> {
    let s = match v {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Number(n) => n.to_string(),
        other => return Err(Error::BadAmount(other.to_string())),
    };
    parse_coin_str(&s)
}

fn parse_coin_str(s: &str) -> Result<u64, Error> {
    let s = s.trim();
    let (whole, frac) = match s.split_once('.') {
        Some((w, f)) => (w, f),
        None => (s, ""),
    };
    if whole.is_empty() || !whole.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Error::BadAmount(s.to_string()));
    }
    if !frac.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Error::BadAmount(s.to_string()));
    }
    let whole: u64 = whole.parse().map_err(|_| Error::BadAmount(s.to_string()))?;
    let mut sub = 0u64;
    let mut unit = COIN / 10;
    // Digits past the eighth place are dropped, matching floor semantics.
    for b in frac.bytes().take(8) {
        sub += unit * u64::from(b - b'0');
        unit /= 10;
    }
    whole
        .checked_mul(COIN)
        .and_then(|w| w.checked_add(sub))
        .ok_or_else(|| Error::BadAmount(s.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn formats_eight_places() {
        assert_eq!(format_coin(0), "0.00000000");
        assert_eq!(format_coin(1), "0.00000001");
        assert_eq!(format_coin(150_000_000), "1.50000000");
        assert_eq!(format_coin(-3), "-0.00000003");
    }

    #[test]
    fn formats_sixteen_places() {
        assert_eq!(format_coin16(0), "0.0000000000000000");
        assert_eq!(
            format_coin16(97 * 10i128.pow(10)),
            "0.0000970000000000"
        );
    }

    #[test]
    fn parses_strings_and_numbers() {
        assert_eq!(parse_coin(&json!("0.12345678")).unwrap(), 12_345_678);
        assert_eq!(parse_coin(&json!(2)).unwrap(), 200_000_000);
        assert_eq!(parse_coin(&json!(0.5)).unwrap(), 50_000_000);
        assert_eq!(parse_coin(&json!("10")).unwrap(), 1_000_000_000);
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_coin(&json!("1.2.3")).is_err());
        assert!(parse_coin(&json!("-1")).is_err());
        assert!(parse_coin(&json!("abc")).is_err());
        assert!(parse_coin(&json!(null)).is_err());
    }

    #[test]
    fn floors_excess_precision() {
        assert_eq!(parse_coin(&json!("0.123456789")).unwrap(), 12_345_678);
    }

    #[quickcheck_macros::quickcheck]
    fn format_then_parse_is_identity(n: u64) -> bool {
        // keep the whole part inside the checked multiplication range
        let n = n % (u64::MAX / COIN);
        parse_coin(&json!(format_coin(n as i128))).is_ok_and(|v| v == n)
    }
}
