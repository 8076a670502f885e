// Copyright 2018-2026 the Deno authors. MIT license.

use futures::io::AsyncRead;
use futures::io::AsyncReadExt;

use crate::checksum::Checksum;
use crate::error::ParseError;
use crate::options::Options;

/// A framed byte section: content followed by a digest of the content
/// under the archive's declared checksum.
#[derive(Debug)]
pub(crate) struct Frame {
  content: Vec<u8>,
  digest: Vec<u8>,
}

impl Frame {
  /// Read `u32 length | content | digest`.
  pub async fn read<R: AsyncRead + Unpin>(
    mut reader: R,
    options: Options,
  ) -> Result<Frame, ParseError> {
    let len = read_u32(&mut reader).await? as usize;
    Frame::read_sized(reader, options, len).await
  }

  /// Read `content | digest` where the content length is externally
  /// known (bulk region entries carry their length in the modules
  /// header instead of a prefix).
  pub async fn read_sized<R: AsyncRead + Unpin>(
    mut reader: R,
    options: Options,
    len: usize,
  ) -> Result<Frame, ParseError> {
    let digest_len = options
      .digest_len()
      .expect("digest size must be known before reading frames")
      as usize;
    let mut content = vec![0u8; len];
    reader.read_exact(&mut content).await?;
    let mut digest = vec![0u8; digest_len];
    reader.read_exact(&mut digest).await?;
    Ok(Frame { content, digest })
  }

  pub fn content(&self) -> &[u8] {
    &self.content
  }

  pub fn into_content(self) -> Vec<u8> {
    self.content
  }

  /// Bytes this frame occupied on disk, excluding any length prefix.
  pub fn stored_len(&self) -> usize {
    self.content.len() + self.digest.len()
  }

  /// Verify the trailing digest. Archives declaring a checksum this build
  /// does not know degrade to unverified.
  pub fn is_valid(&self, options: Options) -> bool {
    match options.checksum {
      Some(checksum) => checksum.verify(&self.content, &self.digest),
      None => true,
    }
  }
}

/// Append `u32 length | content | digest` to `out`.
pub(crate) fn write_frame(
  out: &mut Vec<u8>,
  content: &[u8],
  checksum: Checksum,
) {
  out.extend_from_slice(&(content.len() as u32).to_be_bytes());
  out.extend_from_slice(content);
  out.extend_from_slice(&checksum.hash(content));
}

/// Append `content | digest` to a bulk region.
pub(crate) fn write_region_entry(
  out: &mut Vec<u8>,
  content: &[u8],
  checksum: Checksum,
) {
  out.extend_from_slice(content);
  out.extend_from_slice(&checksum.hash(content));
}

pub(crate) async fn read_u32<R: AsyncRead + Unpin>(
  mut reader: R,
) -> Result<u32, ParseError> {
  let mut buf = [0u8; 4];
  reader.read_exact(&mut buf).await?;
  Ok(u32::from_be_bytes(buf))
}

#[cfg(test)]
mod tests {
  use futures::io::Cursor;

  use super::Frame;
  use super::write_frame;
  use super::write_region_entry;
  use crate::checksum::Checksum;
  use crate::error::ParseError;
  use crate::options::Options;

  fn options(checksum: Checksum) -> Options {
    Options {
      checksum: Some(checksum),
      digest_size: None,
    }
  }

  #[tokio::test]
  async fn length_prefixed_roundtrip() {
    let mut bytes = Vec::new();
    write_frame(&mut bytes, b"import './a.ts';", Checksum::XxHash3);
    assert_eq!(bytes.len(), 4 + 16 + 8);

    let frame = Frame::read(Cursor::new(bytes), options(Checksum::XxHash3))
      .await
      .unwrap();
    assert_eq!(frame.content(), b"import './a.ts';");
    assert!(frame.is_valid(options(Checksum::XxHash3)));
    assert_eq!(frame.stored_len(), 16 + 8);
  }

  #[tokio::test]
  async fn sized_region_entry_roundtrip() {
    let mut bytes = Vec::new();
    write_region_entry(&mut bytes, b"body", Checksum::Sha256);
    assert_eq!(bytes.len(), 4 + 32);

    let frame =
      Frame::read_sized(Cursor::new(bytes), options(Checksum::Sha256), 4)
        .await
        .unwrap();
    assert_eq!(frame.content(), b"body");
    assert!(frame.is_valid(options(Checksum::Sha256)));
    assert_eq!(frame.into_content(), b"body");
  }

  #[tokio::test]
  async fn tampered_digest_is_invalid() {
    let mut bytes = Vec::new();
    write_frame(&mut bytes, b"body", Checksum::XxHash3);
    let last = bytes.len() - 1;
    bytes[last] ^= 0xff;

    let frame = Frame::read(Cursor::new(bytes), options(Checksum::XxHash3))
      .await
      .unwrap();
    assert!(!frame.is_valid(options(Checksum::XxHash3)));
  }

  #[tokio::test]
  async fn unknown_checksum_degrades_to_unverified() {
    let unknown = Options {
      checksum: None,
      digest_size: Some(3),
    };
    let frame = Frame::read_sized(Cursor::new(b"bodyxyz".to_vec()), unknown, 4)
      .await
      .unwrap();
    assert_eq!(frame.content(), b"body");
    assert!(frame.is_valid(unknown));
  }

  #[tokio::test]
  async fn truncated_frame_is_an_io_error() {
    let mut bytes = Vec::new();
    write_frame(&mut bytes, b"body", Checksum::Sha256);
    bytes.truncate(bytes.len() - 1);

    let err = Frame::read(Cursor::new(bytes), options(Checksum::Sha256))
      .await
      .unwrap_err();
    assert!(matches!(err, ParseError::Io(_)));
  }
}
