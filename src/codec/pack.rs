// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Fixed-width big-endian packers for database keys and values.

use super::Error;

pub fn pack_i32(v: i32) -> [u8; 4] {
    v.to_be_bytes()
}

pub fn pack_u64(v: u64) -> [u8; 8] {
    v.to_be_bytes()
}

pub fn pack_u128(v: u128) -> [u8; 16] {
    v.to_be_bytes()
}

fn take<const N: usize>(b: &[u8]) -> Result<[u8; N], Error> {
    b.get(..N)
        .and_then(|s| <[u8; N]>::try_from(s).ok())
        .ok_or(Error::Truncated {
            expected: N,
            got: b.len(),
        })
}

pub fn unpack_i32(b: &[u8]) -> Result<i32, Error> {
    take::<4>(b).map(i32::from_be_bytes)
}

pub fn unpack_u64(b: &[u8]) -> Result<u64, Error> {
    take::<8>(b).map(u64::from_be_bytes)
}

pub fn unpack_u128(b: &[u8]) -> Result<u128, Error> {
    take::<16>(b).map(u128::from_be_bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn big_endian_order() {
        assert_eq!(pack_i32(1), [0, 0, 0, 1]);
        assert_eq!(pack_u64(258), [0, 0, 0, 0, 0, 0, 1, 2]);
        assert_eq!(unpack_i32(&pack_i32(-7)).unwrap(), -7);
        assert_eq!(unpack_u128(&pack_u128(u128::MAX)).unwrap(), u128::MAX);
    }

    #[test]
    fn unpack_rejects_short_input() {
        assert!(unpack_u64(&[1, 2, 3]).is_err());
    }
}
