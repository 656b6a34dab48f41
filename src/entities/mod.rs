//! SeaORM entities for the metadata tables
//!
//! Identifiers are stored as the bit pattern of the `u64` in a signed 64-bit
//! column; see [`to_db`] and [`from_db`].

pub mod albums;
pub mod edges;
pub mod images;
pub mod prelude;

/// Reinterpret an id for a signed BIGINT column
pub fn to_db(id: u64) -> i64 {
    id as i64
}

/// Inverse of [`to_db`]
pub fn from_db(id: i64) -> u64 {
    id as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_bit_pattern_survives() {
        for id in [0, 1, i64::MAX as u64, i64::MAX as u64 + 1, u64::MAX] {
            assert_eq!(from_db(to_db(id)), id);
        }
        assert_eq!(to_db(u64::MAX), -1);
    }
}
