// Packet authentication primitives.
// Numan Thabit 2025

pub mod key;
pub mod tag;
