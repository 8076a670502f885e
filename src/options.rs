// Copyright 2018-2026 the Deno authors. MIT license.

use futures::io::AsyncRead;
use futures::io::AsyncReadExt;

use crate::checksum::Checksum;
use crate::error::ParseError;
use crate::frame::read_u32;
use crate::frame::write_frame;

const MAGIC_V2: &[u8; 8] = b"ESZIP_V2";
const MAGIC_V21: &[u8; 8] = b"ESZIP2.1";
const MAGIC_V22: &[u8; 8] = b"ESZIP2.2";
const MAGIC_V23: &[u8; 8] = b"ESZIP2.3";

/// Binary format revisions, identified by their eight byte magic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Version {
  /// `ESZIP_V2`: modules and redirects only.
  V2,
  /// `ESZIP2.1`: adds the package snapshot section.
  V21,
  /// `ESZIP2.2`: adds the options header.
  V22,
  /// `ESZIP2.3`: framed exactly like V2.2; newer codec extensions are
  /// preserved.
  V23,
}

impl Version {
  pub const LATEST: Version = Version::V23;

  pub fn from_magic(magic: &[u8; 8]) -> Option<Version> {
    match magic {
      MAGIC_V2 => Some(Version::V2),
      MAGIC_V21 => Some(Version::V21),
      MAGIC_V22 => Some(Version::V22),
      MAGIC_V23 => Some(Version::V23),
      _ => None,
    }
  }

  pub fn magic(self) -> &'static [u8; 8] {
    match self {
      Version::V2 => MAGIC_V2,
      Version::V21 => MAGIC_V21,
      Version::V22 => MAGIC_V22,
      Version::V23 => MAGIC_V23,
    }
  }

  /// Whether the modules header may contain package index entries and the
  /// archive carries a packages frame.
  pub fn supports_npm(self) -> bool {
    !matches!(self, Version::V2)
  }

  /// Whether the archive starts with an options header frame.
  pub fn supports_options(self) -> bool {
    matches!(self, Version::V22 | Version::V23)
  }
}

/// The declared checksum configuration of an archive.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Options {
  /// `None` when the archive declares an algorithm this build does not
  /// know; parsing then proceeds without verification.
  pub checksum: Option<Checksum>,
  /// Digest size declared explicitly in the options header. Required to
  /// skip over the digests of an unknown algorithm.
  pub digest_size: Option<u8>,
}

impl Options {
  /// Versions prior to the options header always checksum with SHA-256;
  /// later versions default to no checksum.
  pub fn default_for_version(version: Version) -> Options {
    let checksum = if version.supports_options() {
      Checksum::NoChecksum
    } else {
      Checksum::Sha256
    };
    Options {
      checksum: Some(checksum),
      digest_size: None,
    }
  }

  /// The size in bytes of every digest in the archive, when known.
  pub fn digest_len(self) -> Option<u8> {
    self.digest_size.or_else(|| Some(self.checksum?.digest_size()))
  }
}

const OPTION_CHECKSUM: u8 = 0;
const OPTION_DIGEST_SIZE: u8 = 1;

/// Read and decode the options header: a framed sequence of
/// `(option id, value)` byte pairs whose digest uses the checksum the
/// pairs themselves declare. Unknown option ids are skipped.
pub(crate) async fn read_options_header<R: AsyncRead + Unpin>(
  mut reader: R,
  version: Version,
) -> Result<Options, ParseError> {
  let mut options = Options::default_for_version(version);

  let len = read_u32(&mut reader).await? as usize;
  if len % 2 != 0 {
    return Err(ParseError::InvalidV22OptionsHeader(
      "options are expected to be byte pairs".to_string(),
    ));
  }
  let mut content = vec![0u8; len];
  reader.read_exact(&mut content).await?;

  for pair in content.chunks(2) {
    let (id, value) = (pair[0], pair[1]);
    match id {
      OPTION_CHECKSUM => options.checksum = Checksum::from_u8(value),
      OPTION_DIGEST_SIZE => options.digest_size = Some(value),
      _ => {}
    }
  }

  let Some(digest_len) = options.digest_len() else {
    return Err(ParseError::InvalidV22OptionsHeader(
      "digest size must be known".to_string(),
    ));
  };
  if let (Some(checksum), Some(size)) = (options.checksum, options.digest_size)
  {
    if size != checksum.digest_size() {
      return Err(ParseError::InvalidV22OptionsHeader(format!(
        "digest size {size} does not match the checksum function"
      )));
    }
  }

  if digest_len > 0 {
    let mut digest = vec![0u8; digest_len as usize];
    reader.read_exact(&mut digest).await?;
    let valid = match options.checksum {
      Some(checksum) => checksum.verify(&content, &digest),
      None => true,
    };
    if !valid {
      return Err(ParseError::InvalidV22OptionsHeaderHash);
    }
  }

  Ok(options)
}

/// Append the options header frame declaring `checksum` to `out`.
pub(crate) fn write_options_header(out: &mut Vec<u8>, checksum: Checksum) {
  let content = [
    OPTION_CHECKSUM,
    checksum as u8,
    OPTION_DIGEST_SIZE,
    checksum.digest_size(),
  ];
  write_frame(out, &content, checksum);
}

#[cfg(test)]
mod tests {
  use futures::io::Cursor;

  use super::Options;
  use super::Version;
  use super::read_options_header;
  use super::write_options_header;
  use crate::checksum::Checksum;
  use crate::error::ParseError;

  #[test]
  fn magic_mapping() {
    for version in
      [Version::V2, Version::V21, Version::V22, Version::V23]
    {
      assert_eq!(Version::from_magic(version.magic()), Some(version));
    }
    assert_eq!(Version::from_magic(b"ESZIP_V1"), None);
    assert!(!Version::V2.supports_npm());
    assert!(Version::V21.supports_npm());
    assert!(!Version::V21.supports_options());
    assert!(Version::V23.supports_options());
  }

  #[test]
  fn version_defaults() {
    assert_eq!(
      Options::default_for_version(Version::V2).checksum,
      Some(Checksum::Sha256)
    );
    assert_eq!(
      Options::default_for_version(Version::V23).checksum,
      Some(Checksum::NoChecksum)
    );
    assert_eq!(Options::default_for_version(Version::V2).digest_len(), Some(32));
  }

  async fn read(bytes: Vec<u8>) -> Result<Options, ParseError> {
    read_options_header(Cursor::new(bytes), Version::V23).await
  }

  #[tokio::test]
  async fn written_header_roundtrips() {
    for checksum in
      [Checksum::NoChecksum, Checksum::Sha256, Checksum::XxHash3]
    {
      let mut bytes = Vec::new();
      write_options_header(&mut bytes, checksum);
      let options = read(bytes).await.unwrap();
      assert_eq!(options.checksum, Some(checksum));
      assert_eq!(options.digest_len(), Some(checksum.digest_size()));
    }
  }

  #[tokio::test]
  async fn unknown_option_ids_are_skipped() {
    let content = [0, Checksum::XxHash3 as u8, 9, 7, 1, 8];
    let mut bytes = (content.len() as u32).to_be_bytes().to_vec();
    bytes.extend_from_slice(&content);
    bytes.extend_from_slice(&Checksum::XxHash3.hash(&content));

    let options = read(bytes).await.unwrap();
    assert_eq!(options.checksum, Some(Checksum::XxHash3));
    assert_eq!(options.digest_len(), Some(8));
  }

  #[tokio::test]
  async fn odd_length_is_rejected() {
    let mut bytes = 3u32.to_be_bytes().to_vec();
    bytes.extend_from_slice(&[0, 0, 1]);
    let err = read(bytes).await.unwrap_err();
    assert!(matches!(err, ParseError::InvalidV22OptionsHeader(_)));
  }

  #[tokio::test]
  async fn unknown_checksum_needs_a_digest_size() {
    let content = [0, 99];
    let mut bytes = (content.len() as u32).to_be_bytes().to_vec();
    bytes.extend_from_slice(&content);
    let err = read(bytes).await.unwrap_err();
    assert!(matches!(err, ParseError::InvalidV22OptionsHeader(_)));
  }

  #[tokio::test]
  async fn unknown_checksum_with_digest_size_parses() {
    let content = [0, 99, 1, 4];
    let mut bytes = (content.len() as u32).to_be_bytes().to_vec();
    bytes.extend_from_slice(&content);
    // four digest bytes, skipped unverified
    bytes.extend_from_slice(&[0xaa, 0xbb, 0xcc, 0xdd]);

    let options = read(bytes).await.unwrap();
    assert_eq!(options.checksum, None);
    assert_eq!(options.digest_len(), Some(4));
  }

  #[tokio::test]
  async fn digest_size_must_match_the_checksum() {
    for content in [[0, 1, 1, 8], [0, 2, 1, 0]] {
      let mut bytes = (content.len() as u32).to_be_bytes().to_vec();
      bytes.extend_from_slice(&content);
      let err = read(bytes).await.unwrap_err();
      assert!(matches!(err, ParseError::InvalidV22OptionsHeader(_)));
    }
  }

  #[tokio::test]
  async fn header_digest_is_validated() {
    let content = [0, Checksum::Sha256 as u8, 1, 32];
    let mut bytes = (content.len() as u32).to_be_bytes().to_vec();
    bytes.extend_from_slice(&content);
    bytes.extend_from_slice(&[0u8; 32]);

    let err = read(bytes).await.unwrap_err();
    assert!(matches!(err, ParseError::InvalidV22OptionsHeaderHash));
  }
}
