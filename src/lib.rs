// Copyright 2018-2026 the Deno authors. MIT license.

//! A compact, streaming-capable binary archive for ECMAScript module
//! graphs: fetched sources, their redirects and, optionally, a resolved
//! package snapshot in a single byte stream.
//!
//! Parsing is two-phase: [`Archive::parse`] returns once the header is
//! read, so module metadata and handles are available immediately, while
//! the returned completion future streams the module bodies into their
//! slots in the background. Waiting on one module's body never blocks
//! another's.

mod archive;
mod checksum;
mod error;
mod frame;
mod header;
mod json;
mod loader;
mod module_map;
mod npm;
mod options;
mod slot;

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::Mutex;

use futures::io::AsyncBufReadExt;
use futures::io::AsyncRead;
use futures::io::AsyncReadExt;
use futures::io::BufReader;
use url::Url;

pub use crate::archive::ArchiveV2;
pub use crate::checksum::Checksum;
pub use crate::error::ParseError;
pub use crate::json::ArchiveV1;
pub use crate::json::JsonModule;
pub use crate::json::JsonSource;
pub use crate::npm::NpmPackage;
pub use crate::npm::NpmPackageId;
pub use crate::npm::NpmSnapshot;
pub use crate::options::Version;

use crate::slot::SourceSlot;

/// A parsed archive of either supported format.
pub enum Archive {
  V1(ArchiveV1),
  V2(ArchiveV2),
}

/// Drives the data sections of a binary archive and resolves to the
/// underlying reader once every body slot is filled.
pub type CompletionFuture<R> =
  Pin<Box<dyn Future<Output = Result<BufReader<R>, ParseError>> + Send>>;

impl Archive {
  /// Parse an archive, sniffing the format from the first bytes. Returns
  /// when the header is available; the second tuple slot must be polled
  /// to drive the data sections.
  pub async fn parse<R: AsyncRead + Unpin + Send + 'static>(
    reader: R,
  ) -> Result<(Archive, CompletionFuture<R>), ParseError> {
    let mut reader = BufReader::new(reader);
    reader.fill_buf().await?;
    if ArchiveV2::has_magic(reader.buffer()) {
      let (archive, fut) = ArchiveV2::parse(reader).await?;
      Ok((Archive::V2(archive), Box::pin(fut)))
    } else {
      let mut buffer = Vec::new();
      reader.read_to_end(&mut buffer).await?;
      let archive = ArchiveV1::parse(&buffer)?;
      let fut = async move { Ok::<_, ParseError>(reader) };
      Ok((Archive::V1(archive), Box::pin(fut)))
    }
  }

  /// Get a module, following redirects. Import maps stored as JSONC are
  /// hidden from this lookup.
  pub fn get_module(&self, specifier: &str) -> Option<Module> {
    match self {
      Archive::V1(archive) => archive.get_module(specifier),
      Archive::V2(archive) => archive.get_module(specifier),
    }
  }

  /// Get an import map for the given specifier.
  pub fn get_import_map(&self, specifier: &str) -> Option<Module> {
    match self {
      Archive::V1(archive) => archive.get_import_map(specifier),
      Archive::V2(archive) => archive.get_import_map(specifier),
    }
  }

  /// Take the package snapshot out of the archive. The legacy JSON format
  /// has none.
  pub fn take_npm_snapshot(&mut self) -> Option<NpmSnapshot> {
    match self {
      Archive::V1(_) => None,
      Archive::V2(archive) => archive.take_npm_snapshot(),
    }
  }
}

/// Iterate over all modules, resolving redirects.
impl IntoIterator for Archive {
  type Item = (String, Module);
  type IntoIter = std::vec::IntoIter<Self::Item>;

  fn into_iter(self) -> Self::IntoIter {
    match self {
      Archive::V1(archive) => {
        let specifiers = archive.specifiers();
        let mut modules = Vec::with_capacity(specifiers.len());
        for specifier in specifiers {
          let Some(module) = archive.get_module(&specifier) else {
            continue;
          };
          modules.push((specifier, module));
        }
        modules.into_iter()
      }
      Archive::V2(archive) => archive.into_iter(),
    }
  }
}

/// A handle to one module of a parsed archive.
///
/// The body accessors await the streaming loader when the body has not
/// arrived yet, and fail with the loader's error when the archive's data
/// sections could not be read.
pub struct Module {
  pub specifier: String,
  pub kind: ModuleKind,
  pub(crate) inner: ModuleInner,
}

pub(crate) enum ModuleInner {
  Json {
    specifier: Url,
    modules: Arc<Mutex<HashMap<Url, JsonModule>>>,
  },
  Slots {
    source: SourceSlot,
    source_map: SourceSlot,
  },
}

impl Module {
  /// Get the module body. `Ok(None)` once the body has been taken.
  pub async fn source(&self) -> Result<Option<Arc<[u8]>>, ParseError> {
    match &self.inner {
      ModuleInner::Json { specifier, modules } => {
        Ok(json::get_source(modules, specifier))
      }
      ModuleInner::Slots { source, .. } => source.get().await,
    }
  }

  /// Take the module body out of memory; later calls return `Ok(None)`.
  /// In the legacy JSON format this also removes the module from the
  /// archive.
  pub async fn take_source(&self) -> Result<Option<Arc<[u8]>>, ParseError> {
    match &self.inner {
      ModuleInner::Json { specifier, modules } => {
        Ok(json::take_source(modules, specifier))
      }
      ModuleInner::Slots { source, .. } => source.take().await,
    }
  }

  /// Get the source map. Modules without one have an empty body here; the
  /// legacy JSON format has no source maps at all.
  pub async fn source_map(&self) -> Result<Option<Arc<[u8]>>, ParseError> {
    match &self.inner {
      ModuleInner::Json { .. } => Ok(None),
      ModuleInner::Slots { source_map, .. } => source_map.get().await,
    }
  }

  /// Take the source map out of memory; later calls return `Ok(None)`.
  pub async fn take_source_map(
    &self,
  ) -> Result<Option<Arc<[u8]>>, ParseError> {
    match &self.inner {
      ModuleInner::Json { .. } => Ok(None),
      ModuleInner::Slots { source_map, .. } => source_map.take().await,
    }
  }
}

/// The kind of a stored module body.
///
/// `Jsonc` is reserved for import maps embedded from configuration files
/// and is hidden from ordinary module lookup.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleKind {
  JavaScript = 0,
  Json = 1,
  Jsonc = 2,
  OpaqueData = 3,
  Wasm = 4,
}

impl ModuleKind {
  pub(crate) fn from_u8(kind: u8) -> Option<ModuleKind> {
    Some(match kind {
      0 => ModuleKind::JavaScript,
      1 => ModuleKind::Json,
      2 => ModuleKind::Jsonc,
      3 => ModuleKind::OpaqueData,
      4 => ModuleKind::Wasm,
      _ => return None,
    })
  }
}
