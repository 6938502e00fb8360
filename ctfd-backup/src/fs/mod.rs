//! Local filesystem helpers: hashing, atomic replacement, and safe naming.

pub mod atomic;
pub mod digest;
pub mod paths;
