//! Secure byte buffer with automatic memory zeroization
//!
//! Wraps a `Vec<u8>` holding key material. The buffer is zeroed on drop and
//! never appears in `Debug` or `Display` output.

use std::fmt;

use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

/// Secret bytes that are zeroed on drop
///
/// # Security Note
/// `PartialEq` is not implemented; use [`SecureBytes::constant_time_eq`] to
/// compare two secrets.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecureBytes {
    inner: Vec<u8>,
}

impl SecureBytes {
    /// Create a new secure buffer, taking ownership of `bytes`
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { inner: bytes }
    }

    /// Copy `bytes` into a new secure buffer
    pub fn from_slice(bytes: &[u8]) -> Self {
        Self { inner: bytes.to_vec() }
    }

    /// Expose the inner bytes (use with caution)
    ///
    /// # Security Warning
    /// The exposed value should not be stored or logged.
    pub fn expose(&self) -> &[u8] {
        &self.inner
    }

    /// Number of secret bytes
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Lower-case hex encoding of the secret, zeroed when dropped
    pub fn to_hex(&self) -> Zeroizing<String> {
        Zeroizing::new(hex::encode(&self.inner))
    }

    /// Compare with another secure buffer in constant time
    pub fn constant_time_eq(&self, other: &Self) -> bool {
        constant_time_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for SecureBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecureBytes({} bytes, ***)", self.inner.len())
    }
}

/// Constant-time comparison to prevent timing attacks
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }

    result == 0
}
