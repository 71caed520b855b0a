//! # Cryptographic Primitives
//!
//! Boring, audited cryptography only:
//!
//! - **Ed25519** for every signature: transactions, notarisations and
//!   identity certificates.
//! - **SHA-256** for transaction ids.
//!
//! Everything here is a type-safe wrapper over `ed25519-dalek` and `sha2`.

pub mod hash;
pub mod keys;
pub mod signatures;

pub use hash::{double_sha256, sha256, SecureHash};
pub use keys::{KeyError, PartyKeypair, PublicKey, Signature};
pub use signatures::{batch_verify, sign, verify, SignatureError};
