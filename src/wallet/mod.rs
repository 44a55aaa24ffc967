//! Key pairs, public-key hashing and printable addresses.
//!
//! The ledger core only sees public-key hashes and the `Signer` trait; this
//! module turns those into something a person can type.

#[allow(clippy::module_inception)]
pub mod wallet;
pub mod wallets;

pub use wallet::{
    address_to_pub_key_hash, convert_address, hash_pub_key, validate_address, Wallet,
    ADDRESS_CHECK_SUM_LEN,
};
pub use wallets::Wallets;
