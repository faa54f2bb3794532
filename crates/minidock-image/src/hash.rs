//! SHA-256 content verification.
//!
//! Validates the integrity of downloaded blobs against their registry
//! digests.

use std::io::{self, Write};

use minidock_common::constants::SHA256_HEX_LENGTH;
use minidock_common::error::{MinidockError, Result};
use sha2::{Digest, Sha256};

/// Writer adapter hashing everything written through it.
pub struct HashingWriter<W> {
    inner: W,
    hasher: Sha256,
}

impl<W: Write> HashingWriter<W> {
    /// Wraps `inner`.
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            hasher: Sha256::new(),
        }
    }

    /// Returns the inner writer and the hex digest of all written bytes.
    pub fn finish(self) -> (W, String) {
        (self.inner, format!("{:x}", self.hasher.finalize()))
    }
}

impl<W: Write> Write for HashingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Extracts the hex part of a `sha256:<hex>` digest.
///
/// # Errors
///
/// Returns [`MinidockError::Fetch`] for other algorithms or malformed hex,
/// since digests come from the registry.
pub fn digest_hex(digest: &str) -> Result<&str> {
    let invalid = |message: &str| MinidockError::Fetch {
        reference: digest.to_string(),
        message: message.to_string(),
    };
    let hex = digest
        .strip_prefix("sha256:")
        .ok_or_else(|| invalid("unsupported digest algorithm"))?;
    if hex.len() != SHA256_HEX_LENGTH || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(invalid("invalid SHA-256 digest"));
    }
    Ok(hex)
}

/// Fails unless `actual` equals the hex part of `expected_digest`.
///
/// # Errors
///
/// Returns [`MinidockError::HashMismatch`] on mismatch.
pub fn verify_digest(resource: &str, expected_digest: &str, actual: &str) -> Result<()> {
    let expected = digest_hex(expected_digest)?;
    if !expected.eq_ignore_ascii_case(actual) {
        return Err(MinidockError::HashMismatch {
            resource: resource.to_string(),
            expected: expected.to_string(),
            actual: actual.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const HELLO_SHA256: &str = "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";

    #[test]
    fn hashing_writer_passes_bytes_through() {
        let mut writer = HashingWriter::new(Vec::new());
        writer.write_all(b"hello").expect("write");
        let (inner, digest) = writer.finish();
        assert_eq!(inner, b"hello");
        assert_eq!(digest, HELLO_SHA256);
    }

    #[test]
    fn digest_hex_rejects_other_algorithms() {
        assert!(matches!(
            digest_hex("sha512:abcd"),
            Err(MinidockError::Fetch { .. })
        ));
        assert!(matches!(
            digest_hex("sha256:xyz"),
            Err(MinidockError::Fetch { .. })
        ));
        assert_eq!(
            digest_hex(&format!("sha256:{HELLO_SHA256}")).expect("hex"),
            HELLO_SHA256
        );
    }

    #[test]
    fn verify_digest_reports_mismatch() {
        let expected = format!("sha256:{HELLO_SHA256}");
        assert!(verify_digest("blob", &expected, HELLO_SHA256).is_ok());
        let err = verify_digest("blob", &expected, &"0".repeat(64)).unwrap_err();
        assert!(matches!(err, MinidockError::HashMismatch { .. }));
    }
}
