//! Security primitives for key material
//!
//! Secret payloads are held in zeroizing buffers and never formatted.

pub mod secure_bytes;

pub use secure_bytes::SecureBytes;
