//! Sparse row identifiers. Every primary key in the schema comes from here.
//!
//! The store partitions rows into key ranges, so a monotonically increasing
//! key would pin every concurrent insert to the tail range server. Ids are
//! instead drawn uniformly from the positive 63-bit space: no coordination,
//! no counter, and duplicates only at birthday-bound probability. A collision
//! surfaces as an insert conflict in the enclosing transaction and fails that
//! request; it is never papered over by regenerating in place.

use uuid::Uuid;

const ID_MASK: u64 = (1 << 63) - 1;

/// Returns a fresh identifier, uniform over `[0, 2^63)`.
pub fn new_row_id() -> i64 {
    (Uuid::new_v4().as_u128() as u64 & ID_MASK) as i64
}
