//! Wire layout of the cache blob.

pub mod cursor;
pub mod layout;
