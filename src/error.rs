// Copyright 2018-2026 the Deno authors. MIT license.

use std::sync::Arc;

use thiserror::Error;

/// Errors surfaced while parsing an archive or while loading the module
/// bodies referenced by an already parsed header.
///
/// The type is cheaply cloneable so that a single failure in the data
/// sections can be delivered both to whoever drives the completion future
/// and to every waiter parked on a pending body slot.
#[derive(Debug, Clone, Error)]
pub enum ParseError {
  #[error("invalid v1 archive: {0}")]
  InvalidV1Json(Arc<serde_json::Error>),
  #[error("invalid v1 archive version: got {0}, expected 1")]
  InvalidV1Version(u32),
  #[error("not a v2 archive")]
  InvalidV2,
  #[error("invalid v2 archive header hash")]
  InvalidV2HeaderHash,
  #[error("invalid specifier in v2 archive header at offset {0}")]
  InvalidV2Specifier(usize),
  #[error("invalid entry kind {0} in v2 archive header at offset {1}")]
  InvalidV2EntryKind(u8, usize),
  #[error("invalid module kind {0} in v2 archive header at offset {1}")]
  InvalidV2ModuleKind(u8, usize),
  #[error("invalid v2 archive header: {0}")]
  InvalidV2Header(&'static str),
  #[error("invalid v2 archive source offset ({0})")]
  InvalidV2SourceOffset(usize),
  #[error("invalid v2 archive source hash (specifier {0})")]
  InvalidV2SourceHash(String),
  #[error("invalid v2 archive package snapshot hash")]
  InvalidV2NpmSnapshotHash,
  #[error("invalid npm package in v2 archive at offset {0}")]
  InvalidV2NpmPackageOffset(usize),
  #[error("invalid npm package '{0}' in v2 archive")]
  InvalidV2NpmPackage(String),
  #[error("invalid npm package requirement '{0}' in v2 archive")]
  InvalidV2NpmPackageReq(String),
  #[error("invalid v2.2 options header: {0}")]
  InvalidV22OptionsHeader(String),
  #[error("invalid v2.2 options header hash")]
  InvalidV22OptionsHeaderHash,
  #[error("{0}")]
  Io(Arc<std::io::Error>),
}

impl From<std::io::Error> for ParseError {
  fn from(err: std::io::Error) -> Self {
    ParseError::Io(Arc::new(err))
  }
}

impl From<serde_json::Error> for ParseError {
  fn from(err: serde_json::Error) -> Self {
    ParseError::InvalidV1Json(Arc::new(err))
  }
}
