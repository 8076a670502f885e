// Copyright 2018-2026 the Deno authors. MIT license.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::sync::Mutex;

use futures::io::AsyncRead;
use futures::io::AsyncReadExt;
use futures::io::BufReader;

use crate::checksum::Checksum;
use crate::error::ParseError;
use crate::frame::Frame;
use crate::frame::write_frame;
use crate::frame::write_region_entry;
use crate::header;
use crate::loader;
use crate::loader::RegionIndex;
use crate::module_map::ModuleEntry;
use crate::module_map::ModuleMap;
use crate::npm;
use crate::npm::NpmSnapshot;
use crate::options;
use crate::options::Options;
use crate::options::Version;
use crate::slot::SourceSlot;
use crate::Module;
use crate::ModuleInner;
use crate::ModuleKind;

/// A binary archive of an ECMAScript module graph.
///
/// Binary layout (latest version):
/// * magic (8 bytes)
/// * options frame: `u32 len | (option id, value)* | digest`
/// * modules frame: `u32 len | entries | digest`
/// * packages frame: `u32 len | package table | digest`
/// * sources region: `u32 total | (body | digest)*`
/// * source maps region: `u32 total | (body | digest)*`
///
/// All integers are big-endian. Parsing completes once the frames are
/// read; the regions stream in afterwards through the returned
/// completion future, so module metadata is available before any body
/// has arrived.
#[derive(Debug)]
pub struct ArchiveV2 {
  modules: Arc<Mutex<ModuleMap>>,
  npm_snapshot: Option<NpmSnapshot>,
  options: Options,
}

impl Default for ArchiveV2 {
  fn default() -> ArchiveV2 {
    ArchiveV2 {
      modules: Default::default(),
      npm_snapshot: None,
      options: Options::default_for_version(Version::LATEST),
    }
  }
}

impl ArchiveV2 {
  /// Whether `buffer` starts with the magic of any supported binary
  /// format revision.
  pub fn has_magic(buffer: &[u8]) -> bool {
    buffer.len() >= 8
      && Version::from_magic(buffer[..8].try_into().unwrap()).is_some()
  }

  /// Parse an archive from an async byte stream. This returns as soon as
  /// the header sections have been read; module bodies arrive through
  /// the returned completion future, which must be polled to fill the
  /// body slots and yields the underlying reader back once the data
  /// sections are drained.
  pub async fn parse<R: AsyncRead + Unpin>(
    mut reader: BufReader<R>,
  ) -> Result<
    (
      ArchiveV2,
      impl Future<Output = Result<BufReader<R>, ParseError>>,
    ),
    ParseError,
  > {
    let mut magic = [0u8; 8];
    reader.read_exact(&mut magic).await?;
    let version = Version::from_magic(&magic).ok_or(ParseError::InvalidV2)?;

    let options = if version.supports_options() {
      options::read_options_header(&mut reader, version).await?
    } else {
      Options::default_for_version(version)
    };

    let modules_header = Frame::read(&mut reader, options).await?;
    if !modules_header.is_valid(options) {
      return Err(ParseError::InvalidV2HeaderHash);
    }
    let (modules, root_packages) =
      header::decode(modules_header.content(), version)?;

    let npm_snapshot = if version.supports_npm() {
      let packages = Frame::read(&mut reader, options).await?;
      if !packages.is_valid(options) {
        return Err(ParseError::InvalidV2NpmSnapshotHash);
      }
      npm::decode(packages.content(), root_packages)?
    } else {
      None
    };

    let sources = RegionIndex::for_sources(&modules);
    let source_maps = RegionIndex::for_source_maps(&modules);
    let fut = loader::load(reader, options, sources, source_maps);

    let archive = ArchiveV2 {
      modules: Arc::new(Mutex::new(modules)),
      npm_snapshot,
      options,
    };
    Ok((archive, fut))
  }

  /// Get a module, following redirects. Import maps stored as JSONC are
  /// hidden from this lookup; use [`get_import_map`](Self::get_import_map)
  /// for those.
  pub fn get_module(&self, specifier: &str) -> Option<Module> {
    let module = self.lookup(specifier)?;
    if module.kind == ModuleKind::Jsonc {
      return None;
    }
    Some(module)
  }

  /// Get an import map. Unlike [`get_module`](Self::get_module) this
  /// returns entries of any kind, including JSONC.
  pub fn get_import_map(&self, specifier: &str) -> Option<Module> {
    self.lookup(specifier)
  }

  fn lookup(&self, specifier: &str) -> Option<Module> {
    let modules = self.modules.lock().unwrap();
    let mut specifier = specifier;
    let mut visited = HashSet::new();
    loop {
      visited.insert(specifier);
      match modules.get(specifier)? {
        ModuleEntry::Module {
          kind,
          source,
          source_map,
        } => {
          return Some(Module {
            specifier: specifier.to_string(),
            kind: *kind,
            inner: ModuleInner::Slots {
              source: source.clone(),
              source_map: source_map.clone(),
            },
          });
        }
        ModuleEntry::Redirect { target } => {
          specifier = target;
          if visited.contains(specifier) {
            return None;
          }
        }
      }
    }
  }

  /// All specifiers, in the archive's order.
  pub fn specifiers(&self) -> Vec<String> {
    let modules = self.modules.lock().unwrap();
    modules.specifiers().map(str::to_string).collect()
  }

  /// Add a module with its body and source map.
  pub fn add_module(
    &mut self,
    specifier: String,
    kind: ModuleKind,
    source: Arc<[u8]>,
    source_map: Arc<[u8]>,
  ) {
    log::debug!("adding module '{}' ({:?})", specifier, kind);
    let mut modules = self.modules.lock().unwrap();
    modules.insert(
      specifier,
      ModuleEntry::Module {
        kind,
        source: SourceSlot::ready(source),
        source_map: SourceSlot::ready(source_map),
      },
    );
  }

  /// Add opaque data: stored and addressed like a module body, but never
  /// loadable as code.
  pub fn add_opaque_data(&mut self, specifier: String, data: Arc<[u8]>) {
    log::debug!("adding opaque data '{}'", specifier);
    let mut modules = self.modules.lock().unwrap();
    modules.insert(
      specifier,
      ModuleEntry::Module {
        kind: ModuleKind::OpaqueData,
        source: SourceSlot::ready(data),
        source_map: SourceSlot::ready(Arc::new([])),
      },
    );
  }

  /// Add a redirect entry.
  pub fn add_redirect(&mut self, specifier: String, target: String) {
    log::debug!("adding redirect '{}' -> '{}'", specifier, target);
    let mut modules = self.modules.lock().unwrap();
    modules.insert(specifier, ModuleEntry::Redirect { target });
  }

  /// Add an import map, placed at the front of the archive so it can be
  /// read before the modules it describes. If the specifier is already
  /// present only its position changes.
  pub fn add_import_map(
    &mut self,
    kind: ModuleKind,
    specifier: String,
    source: Arc<[u8]>,
  ) {
    debug_assert!(matches!(kind, ModuleKind::Json | ModuleKind::Jsonc));
    log::debug!("adding import map '{}'", specifier);
    let mut modules = self.modules.lock().unwrap();
    if modules.contains(&specifier) {
      modules.move_to_front(&specifier);
      return;
    }
    modules.insert_front(
      specifier,
      ModuleEntry::Module {
        kind,
        source: SourceSlot::ready(source),
        source_map: SourceSlot::ready(Arc::new([])),
      },
    );
  }

  /// Add a resolved package snapshot. Empty snapshots are not stored.
  pub fn add_npm_snapshot(&mut self, snapshot: NpmSnapshot) {
    if !snapshot.packages.is_empty() {
      self.npm_snapshot = Some(snapshot);
    }
  }

  /// Take the package snapshot out of the archive; later calls return
  /// `None`.
  pub fn take_npm_snapshot(&mut self) -> Option<NpmSnapshot> {
    self.npm_snapshot.take()
  }

  /// Configure the checksum function for a subsequent serialization. The
  /// digest size follows the function.
  pub fn set_checksum(&mut self, checksum: Checksum) {
    self.options = Options {
      checksum: Some(checksum),
      digest_size: None,
    };
  }

  /// Whether the archive's contents were (or will be) verified. `false`
  /// for archives declaring a checksum function this build does not
  /// know; those parse unverified.
  pub fn is_checksumed(&self) -> bool {
    self.should_be_checksumed() && self.options.checksum.is_some()
  }

  /// Whether the archive declares any checksum function at all.
  pub fn should_be_checksumed(&self) -> bool {
    self.options.checksum != Some(Checksum::NoChecksum)
  }

  /// Serialize the archive, emitting the latest format revision. All
  /// module bodies must be loaded.
  pub fn into_bytes(self) -> Vec<u8> {
    let checksum = self
      .options
      .checksum
      .expect("checksum function must be known to serialize");

    let mut bytes = Version::LATEST.magic().to_vec();
    options::write_options_header(&mut bytes, checksum);

    let mut modules_header: Vec<u8> = Vec::new();
    let mut sources: Vec<u8> = Vec::new();
    let mut source_maps: Vec<u8> = Vec::new();

    let modules = self.modules.lock().unwrap();
    for (specifier, entry) in modules.iter() {
      match entry {
        ModuleEntry::Module {
          kind,
          source,
          source_map,
        } => {
          let source_coords =
            append_body(&mut sources, &source.bytes(), checksum);
          let map_coords =
            append_body(&mut source_maps, &source_map.bytes(), checksum);
          header::encode_module_entry(
            &mut modules_header,
            specifier,
            *kind,
            source_coords,
            map_coords,
          );
        }
        ModuleEntry::Redirect { target } => {
          header::encode_redirect_entry(&mut modules_header, specifier, target);
        }
      }
    }

    let mut packages: Vec<u8> = Vec::new();
    if let Some(snapshot) = &self.npm_snapshot {
      npm::encode(snapshot, &mut modules_header, &mut packages);
    }

    write_frame(&mut bytes, &modules_header, checksum);
    write_frame(&mut bytes, &packages, checksum);

    bytes.extend_from_slice(&(sources.len() as u32).to_be_bytes());
    bytes.extend_from_slice(&sources);
    bytes.extend_from_slice(&(source_maps.len() as u32).to_be_bytes());
    bytes.extend_from_slice(&source_maps);

    bytes
  }
}

/// Append one body and its digest to a bulk region, returning the
/// `(offset, length)` header coordinates. Empty bodies occupy no region
/// bytes and get the all-zero coordinates.
fn append_body(
  region: &mut Vec<u8>,
  bytes: &[u8],
  checksum: Checksum,
) -> (u32, u32) {
  if bytes.is_empty() {
    return (0, 0);
  }
  let offset = region.len() as u32;
  write_region_entry(region, bytes, checksum);
  (offset, bytes.len() as u32)
}

/// Iterate over all modules (including an import map, if any), resolving
/// redirects. The iteration covers a snapshot of the specifiers taken
/// when the iterator is created.
impl IntoIterator for ArchiveV2 {
  type Item = (String, Module);
  type IntoIter = std::vec::IntoIter<Self::Item>;

  fn into_iter(self) -> Self::IntoIter {
    let specifiers = self.specifiers();
    let mut modules = Vec::with_capacity(specifiers.len());
    for specifier in specifiers {
      let Some(module) = self.lookup(&specifier) else {
        continue;
      };
      modules.push((specifier, module));
    }
    modules.into_iter()
  }
}
