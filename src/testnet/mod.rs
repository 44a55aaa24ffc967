//! Shared fixtures for unit tests: throwaway ledgers mined at low difficulty.

pub mod test_utils;

pub use test_utils::*;
