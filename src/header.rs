// Copyright 2018-2026 the Deno authors. MIT license.

use std::sync::Arc;

use crate::error::ParseError;
use crate::module_map::ModuleEntry;
use crate::module_map::ModuleMap;
use crate::options::Version;
use crate::slot::SourceSlot;
use crate::ModuleKind;

const ENTRY_MODULE: u8 = 0;
const ENTRY_REDIRECT: u8 = 1;
const ENTRY_PACKAGE_INDEX: u8 = 2;

/// Root package requirements found in the header, in on-disk order:
/// `(request, index into the package table)`.
pub(crate) type RootPackageIndexes = Vec<(String, u32)>;

/// Decode the content of the modules header frame into the module map and
/// the package index entries. Every error carries the byte offset at
/// which decoding stopped.
pub(crate) fn decode(
  content: &[u8],
  version: Version,
) -> Result<(ModuleMap, RootPackageIndexes), ParseError> {
  let mut bytes = HeaderBytes { content, read: 0 };
  let mut modules = ModuleMap::default();
  let mut root_packages = Vec::new();

  while !bytes.is_at_end() {
    let specifier_len = bytes.take_u32("specifier length")? as usize;
    let specifier = bytes.take_string(specifier_len, "specifier")?;

    let entry_kind = bytes.take_u8("entry kind")?;
    match entry_kind {
      ENTRY_MODULE => {
        let source_offset = bytes.take_u32("source offset")?;
        let source_len = bytes.take_u32("source length")?;
        let map_offset = bytes.take_u32("source map offset")?;
        let map_len = bytes.take_u32("source map length")?;
        let kind_byte = bytes.take_u8("module kind")?;
        let kind = ModuleKind::from_u8(kind_byte)
          .ok_or(ParseError::InvalidV2ModuleKind(kind_byte, bytes.read))?;
        modules.insert(
          specifier,
          ModuleEntry::Module {
            kind,
            source: body_slot(source_offset, source_len),
            source_map: body_slot(map_offset, map_len),
          },
        );
      }
      ENTRY_REDIRECT => {
        let target_len = bytes.take_u32("redirect target length")? as usize;
        let target = bytes.take_string(target_len, "redirect target")?;
        modules.insert(specifier, ModuleEntry::Redirect { target });
      }
      ENTRY_PACKAGE_INDEX if version.supports_npm() => {
        let index = bytes.take_u32("package index")?;
        root_packages.push((specifier, index));
      }
      kind => {
        return Err(ParseError::InvalidV2EntryKind(kind, bytes.read));
      }
    }
  }

  Ok((modules, root_packages))
}

/// Bodies with both offset and length zero are stored nowhere; they are
/// ready and empty from the start.
fn body_slot(offset: u32, length: u32) -> SourceSlot {
  if offset == 0 && length == 0 {
    SourceSlot::ready(Arc::new([]))
  } else {
    SourceSlot::pending(offset as usize, length as usize)
  }
}

struct HeaderBytes<'a> {
  content: &'a [u8],
  read: usize,
}

impl<'a> HeaderBytes<'a> {
  fn is_at_end(&self) -> bool {
    self.read >= self.content.len()
  }

  fn take(
    &mut self,
    n: usize,
    field: &'static str,
  ) -> Result<&'a [u8], ParseError> {
    if self.read + n > self.content.len() {
      return Err(ParseError::InvalidV2Header(field));
    }
    let bytes = &self.content[self.read..self.read + n];
    self.read += n;
    Ok(bytes)
  }

  fn take_u8(&mut self, field: &'static str) -> Result<u8, ParseError> {
    Ok(self.take(1, field)?[0])
  }

  fn take_u32(&mut self, field: &'static str) -> Result<u32, ParseError> {
    Ok(u32::from_be_bytes(self.take(4, field)?.try_into().unwrap()))
  }

  fn take_string(
    &mut self,
    len: usize,
    field: &'static str,
  ) -> Result<String, ParseError> {
    let bytes = self.take(len, field)?;
    String::from_utf8(bytes.to_vec())
      .map_err(|_| ParseError::InvalidV2Specifier(self.read))
  }
}

pub(crate) fn encode_module_entry(
  header: &mut Vec<u8>,
  specifier: &str,
  kind: ModuleKind,
  source: (u32, u32),
  source_map: (u32, u32),
) {
  append_string(header, specifier);
  header.push(ENTRY_MODULE);
  header.extend_from_slice(&source.0.to_be_bytes());
  header.extend_from_slice(&source.1.to_be_bytes());
  header.extend_from_slice(&source_map.0.to_be_bytes());
  header.extend_from_slice(&source_map.1.to_be_bytes());
  header.push(kind as u8);
}

pub(crate) fn encode_redirect_entry(
  header: &mut Vec<u8>,
  specifier: &str,
  target: &str,
) {
  append_string(header, specifier);
  header.push(ENTRY_REDIRECT);
  append_string(header, target);
}

pub(crate) fn encode_package_index_entry(
  header: &mut Vec<u8>,
  request: &str,
  index: u32,
) {
  append_string(header, request);
  header.push(ENTRY_PACKAGE_INDEX);
  header.extend_from_slice(&index.to_be_bytes());
}

pub(crate) fn append_string(out: &mut Vec<u8>, value: &str) {
  out.extend_from_slice(&(value.len() as u32).to_be_bytes());
  out.extend_from_slice(value.as_bytes());
}

#[cfg(test)]
mod tests {
  use super::append_string;
  use super::decode;
  use super::encode_module_entry;
  use super::encode_package_index_entry;
  use super::encode_redirect_entry;
  use crate::error::ParseError;
  use crate::module_map::ModuleEntry;
  use crate::options::Version;
  use crate::ModuleKind;

  #[test]
  fn module_entries_roundtrip() {
    let mut header = Vec::new();
    encode_module_entry(
      &mut header,
      "file:///main.ts",
      ModuleKind::JavaScript,
      (0, 20),
      (0, 0),
    );
    encode_redirect_entry(&mut header, "file:///alias.ts", "file:///main.ts");

    let (modules, roots) = decode(&header, Version::V23).unwrap();
    assert!(roots.is_empty());
    assert_eq!(
      modules.specifiers().collect::<Vec<_>>(),
      vec!["file:///main.ts", "file:///alias.ts"]
    );

    let Some(ModuleEntry::Module {
      kind,
      source,
      source_map,
    }) = modules.get("file:///main.ts")
    else {
      panic!("expected module entry");
    };
    assert_eq!(*kind, ModuleKind::JavaScript);
    // offset zero with a length is a real region entry
    assert_eq!(source.pending_coords(), Some((0, 20)));
    // both zero means an empty, immediately ready body
    assert_eq!(source_map.pending_coords(), None);

    let Some(ModuleEntry::Redirect { target }) =
      modules.get("file:///alias.ts")
    else {
      panic!("expected redirect entry");
    };
    assert_eq!(target, "file:///main.ts");
  }

  #[test]
  fn package_index_entries_are_version_gated() {
    let mut header = Vec::new();
    encode_package_index_entry(&mut header, "preact@^10.0.0", 7);

    let (modules, roots) = decode(&header, Version::V21).unwrap();
    assert_eq!(modules.len(), 0);
    assert_eq!(roots, vec![("preact@^10.0.0".to_string(), 7)]);

    let err = decode(&header, Version::V2).unwrap_err();
    assert!(matches!(err, ParseError::InvalidV2EntryKind(2, _)));
  }

  #[test]
  fn unknown_entry_kinds_are_rejected_with_their_offset() {
    let mut header = Vec::new();
    append_string(&mut header, "a");
    header.push(7);

    let err = decode(&header, Version::V23).unwrap_err();
    assert!(matches!(err, ParseError::InvalidV2EntryKind(7, 6)));
  }

  #[test]
  fn unknown_module_kinds_are_rejected() {
    let mut header = Vec::new();
    append_string(&mut header, "a");
    header.push(0);
    header.extend_from_slice(&[0u8; 16]);
    header.push(9);

    let err = decode(&header, Version::V23).unwrap_err();
    assert!(matches!(err, ParseError::InvalidV2ModuleKind(9, _)));
  }

  #[test]
  fn invalid_utf8_specifiers_are_rejected() {
    let mut header = Vec::new();
    header.extend_from_slice(&1u32.to_be_bytes());
    header.push(0xff);

    let err = decode(&header, Version::V23).unwrap_err();
    assert!(matches!(err, ParseError::InvalidV2Specifier(_)));
  }

  #[test]
  fn truncated_headers_name_the_missing_field() {
    let mut header = Vec::new();
    append_string(&mut header, "a");
    header.push(0);
    header.extend_from_slice(&[0u8; 3]);

    let err = decode(&header, Version::V23).unwrap_err();
    assert!(matches!(
      err,
      ParseError::InvalidV2Header("source offset")
    ));
  }
}
