//! File checksums.

use std::io::{self, Read};
use std::str::FromStr;

use md5::Md5;
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha512};

use crate::error::ResourceError;
use crate::fs::ScopedFs;

const CHUNK_SIZE: usize = 64 * 1024;

/// Supported digest algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumAlgo {
    Md5,
    Sha1,
    Sha256,
    Sha512,
}

impl ChecksumAlgo {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChecksumAlgo::Md5 => "md5",
            ChecksumAlgo::Sha1 => "sha1",
            ChecksumAlgo::Sha256 => "sha256",
            ChecksumAlgo::Sha512 => "sha512",
        }
    }
}

impl FromStr for ChecksumAlgo {
    type Err = ResourceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "md5" => Ok(ChecksumAlgo::Md5),
            "sha1" => Ok(ChecksumAlgo::Sha1),
            "sha256" => Ok(ChecksumAlgo::Sha256),
            "sha512" => Ok(ChecksumAlgo::Sha512),
            other => Err(ResourceError::InvalidOption(format!(
                "unsupported checksum algorithm: {}",
                other
            ))),
        }
    }
}

/// Hex digest of the file at `path`.
pub fn checksum(fs: &dyn ScopedFs, path: &str, algo: ChecksumAlgo) -> io::Result<String> {
    let reader = fs.open(path)?;
    match algo {
        ChecksumAlgo::Md5 => digest::<Md5>(reader),
        ChecksumAlgo::Sha1 => digest::<Sha1>(reader),
        ChecksumAlgo::Sha256 => digest::<Sha256>(reader),
        ChecksumAlgo::Sha512 => digest::<Sha512>(reader),
    }
}

fn digest<D: Digest>(mut reader: impl Read) -> io::Result<String> {
    let mut hasher = D::new();
    let mut buffer = vec![0u8; CHUNK_SIZE];
    loop {
        let n = reader.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}
