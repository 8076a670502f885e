// Copyright 2018-2026 the Deno authors. MIT license.

use std::collections::HashMap;

use futures::io::AsyncRead;
use futures::io::BufReader;

use crate::error::ParseError;
use crate::frame::Frame;
use crate::frame::read_u32;
use crate::module_map::ModuleEntry;
use crate::module_map::ModuleMap;
use crate::options::Options;
use crate::slot::SourceSlot;

/// Offset-keyed index of the pending bodies of one bulk region, built
/// from the modules header before the region arrives.
pub(crate) struct RegionIndex {
  entries: HashMap<usize, (usize, String, SourceSlot)>,
}

impl RegionIndex {
  fn new(
    modules: &ModuleMap,
    select: impl Fn(&ModuleEntry) -> Option<&SourceSlot>,
  ) -> RegionIndex {
    let mut entries = HashMap::with_capacity(modules.len());
    for (specifier, entry) in modules.iter() {
      let Some(slot) = select(entry) else {
        continue;
      };
      if let Some((offset, length)) = slot.pending_coords() {
        entries.insert(offset, (length, specifier.to_string(), slot.clone()));
      }
    }
    RegionIndex { entries }
  }

  pub fn for_sources(modules: &ModuleMap) -> RegionIndex {
    RegionIndex::new(modules, |entry| match entry {
      ModuleEntry::Module { source, .. } => Some(source),
      ModuleEntry::Redirect { .. } => None,
    })
  }

  pub fn for_source_maps(modules: &ModuleMap) -> RegionIndex {
    RegionIndex::new(modules, |entry| match entry {
      ModuleEntry::Module { source_map, .. } => Some(source_map),
      ModuleEntry::Redirect { .. } => None,
    })
  }

  /// Fail every body that never became ready, waking its waiters with
  /// the cause that aborted loading.
  fn fail_pending(&self, err: &ParseError) {
    for (_, _, slot) in self.entries.values() {
      slot.fail(err);
    }
  }
}

/// Drain the sources and source-maps regions of `reader`, filling body
/// slots in on-disk order. Yields the reader back once both regions are
/// done. On failure every slot that never became ready is failed with
/// the same cause before the error is returned.
pub(crate) async fn load<R: AsyncRead + Unpin>(
  mut reader: BufReader<R>,
  options: Options,
  mut sources: RegionIndex,
  mut source_maps: RegionIndex,
) -> Result<BufReader<R>, ParseError> {
  let result = async {
    drain_region(&mut reader, options, &mut sources).await?;
    drain_region(&mut reader, options, &mut source_maps).await
  }
  .await;

  match result {
    Ok(()) => Ok(reader),
    Err(err) => {
      sources.fail_pending(&err);
      source_maps.fail_pending(&err);
      Err(err)
    }
  }
}

async fn drain_region<R: AsyncRead + Unpin>(
  reader: &mut BufReader<R>,
  options: Options,
  index: &mut RegionIndex,
) -> Result<(), ParseError> {
  let total = read_u32(&mut *reader).await? as usize;
  let mut position = 0;

  while position < total {
    let (length, specifier, slot) = index
      .entries
      .remove(&position)
      .ok_or(ParseError::InvalidV2SourceOffset(position))?;

    let frame = Frame::read_sized(&mut *reader, options, length).await?;
    if !frame.is_valid(options) {
      return Err(ParseError::InvalidV2SourceHash(specifier));
    }
    position += frame.stored_len();
    log::debug!("loaded body for '{}' ({} bytes)", specifier, length);
    slot.set_ready(frame.into_content());
  }

  // bodies the region walk can never reach would leave waiters parked
  // forever
  if let Some(&offset) = index.entries.keys().min() {
    return Err(ParseError::InvalidV2SourceOffset(offset));
  }
  Ok(())
}
