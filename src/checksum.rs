// Copyright 2018-2026 the Deno authors. MIT license.

use sha2::Digest as _;
use subtle::ConstantTimeEq as _;

/// Hash function used to checksum framed sections and module bodies.
///
/// The discriminant is the value stored in the archive's options header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Checksum {
  NoChecksum = 0,
  Sha256 = 1,
  XxHash3 = 2,
}

impl Checksum {
  pub(crate) fn from_u8(discriminant: u8) -> Option<Checksum> {
    Some(match discriminant {
      0 => Checksum::NoChecksum,
      1 => Checksum::Sha256,
      2 => Checksum::XxHash3,
      _ => return None,
    })
  }

  /// Size in bytes of this function's digest.
  pub const fn digest_size(self) -> u8 {
    match self {
      Checksum::NoChecksum => 0,
      Checksum::Sha256 => 32,
      Checksum::XxHash3 => 8,
    }
  }

  /// Digest `bytes`. XXH3-64 digests are stored big-endian so the on-disk
  /// bytes do not depend on host endianness.
  pub(crate) fn hash(self, bytes: &[u8]) -> Vec<u8> {
    match self {
      Checksum::NoChecksum => Vec::new(),
      Checksum::Sha256 => sha2::Sha256::digest(bytes).to_vec(),
      Checksum::XxHash3 => {
        xxhash_rust::xxh3::xxh3_64(bytes).to_be_bytes().to_vec()
      }
    }
  }

  /// Whether `digest` matches `bytes`. SHA-256 digests are compared in
  /// constant time; `NoChecksum` always verifies.
  pub(crate) fn verify(self, bytes: &[u8], digest: &[u8]) -> bool {
    match self {
      Checksum::NoChecksum => true,
      Checksum::Sha256 => {
        let actual = sha2::Sha256::digest(bytes);
        actual.as_slice().ct_eq(digest).into()
      }
      Checksum::XxHash3 => self.hash(bytes) == digest,
    }
  }
}
