//! SHA-256 digest engine.
//!
//! Everything is hashed incrementally: readers are drained in fixed-size
//! chunks and push-style producers (the curl write callback) feed a
//! [`StreamDigest`] through `std::io::Write`.

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::Path;

const BUF_SIZE: usize = 64 * 1024;

/// Length of a hex-encoded SHA-256 digest.
pub const HEX_LEN: usize = 64;

/// Incremental SHA-256 state. Feed it with [`StreamDigest::update`] or as an
/// `io::Write` sink, then call [`StreamDigest::finish_hex`].
#[derive(Debug, Clone, Default)]
pub struct StreamDigest {
    hasher: Sha256,
    bytes: u64,
}

impl StreamDigest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
        self.bytes += data.len() as u64;
    }

    /// Number of bytes hashed so far.
    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    /// Consume the state and return the digest as lowercase hex.
    pub fn finish_hex(self) -> String {
        hex::encode(self.hasher.finalize())
    }
}

impl Write for StreamDigest {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Drain `reader` to EOF and return its SHA-256 as lowercase hex.
/// Read errors are returned as-is; `Interrupted` reads are retried.
pub fn sha256_reader<R: Read>(mut reader: R) -> io::Result<String> {
    let mut digest = StreamDigest::new();
    let mut buf = vec![0u8; BUF_SIZE];
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        digest.update(&buf[..n]);
    }
    Ok(digest.finish_hex())
}

/// Compute SHA-256 of a file and return the digest as lowercase hex.
pub fn sha256_path(path: &Path) -> Result<String> {
    let f = File::open(path).with_context(|| format!("open {}", path.display()))?;
    sha256_reader(f).with_context(|| format!("read {}", path.display()))
}
