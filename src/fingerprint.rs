//! Content change detection for feeds whose server does not send a `Last-Modified` header

use std::fmt::{Display, Formatter};
use std::io::{self, BufRead, Read};

use sha2::{Digest, Sha256};

/// An order-sensitive digest of a downloaded feed
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn of(content: &[u8]) -> Self {
        let mut reader = HashingReader::new(content);
        // Reading from a slice cannot fail
        let _ = io::copy(&mut reader, &mut io::sink());
        reader.finish()
    }

    /// Whether `other` describes a different content than `self`. An unknown previous fingerprint always counts as a change.
    pub fn differs_from(&self, other: Option<&Fingerprint>) -> bool {
        other != Some(self)
    }
}

impl Display for Fingerprint {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A reader that hashes every byte that goes through it
///
/// This way, a body can be decoded and fingerprinted in a single pass.
pub struct HashingReader<R> {
    inner: R,
    hasher: Sha256,
}

impl<R: BufRead> HashingReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner, hasher: Sha256::new() }
    }

    /// Hash whatever has not been read yet, and return the fingerprint of the whole stream
    pub fn finish(mut self) -> Fingerprint {
        if let Err(err) = io::copy(&mut self, &mut io::sink()) {
            log::warn!("Unable to read the end of the stream to fingerprint it: {}", err);
        }
        Fingerprint(format!("{:x}", self.hasher.finalize()))
    }
}

impl<R: BufRead> Read for HashingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.hasher.update(&buf[..n]);
        Ok(n)
    }
}

impl<R: BufRead> BufRead for HashingReader<R> {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        self.inner.fill_buf()
    }

    fn consume(&mut self, amt: usize) {
        // Only what is actually consumed is hashed, so that peeked bytes are not counted twice
        if let Ok(buf) = self.inner.fill_buf() {
            let amt = amt.min(buf.len());
            self.hasher.update(&buf[..amt]);
        }
        self.inner.consume(amt);
    }
}
