// Copyright 2018-2026 the Deno authors. MIT license.

use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::Mutex;

use serde::Deserialize;
use url::Url;

use crate::error::ParseError;
use crate::Module;
use crate::ModuleInner;
use crate::ModuleKind;

const SUPPORTED_VERSION: u32 = 1;

#[derive(Debug, Deserialize)]
struct JsonDocument {
  version: u32,
  modules: HashMap<Url, JsonModule>,
}

/// One entry of the obsolete JSON graph document.
#[derive(Debug, Clone, Deserialize)]
pub enum JsonModule {
  Redirect(Url),
  Source(JsonSource),
}

#[derive(Debug, Clone, Deserialize)]
pub struct JsonSource {
  pub source: String,
  pub transpiled: Option<String>,
  pub content_type: Option<String>,
  pub deps: Vec<Url>,
}

/// The obsolete JSON graph format. Read-only: such archives can be parsed
/// and queried but are never produced.
#[derive(Debug, Clone)]
pub struct ArchiveV1 {
  modules: Arc<Mutex<HashMap<Url, JsonModule>>>,
}

impl ArchiveV1 {
  pub fn parse(data: &[u8]) -> Result<ArchiveV1, ParseError> {
    let document: JsonDocument = serde_json::from_slice(data)?;
    if document.version != SUPPORTED_VERSION {
      return Err(ParseError::InvalidV1Version(document.version));
    }
    Ok(ArchiveV1 {
      modules: Arc::new(Mutex::new(document.modules)),
    })
  }

  /// Get a module, following redirects. All modules of this format are
  /// JavaScript.
  pub fn get_module(&self, specifier: &str) -> Option<Module> {
    let specifier = Url::parse(specifier).ok()?;
    let modules = self.modules.lock().unwrap();
    let resolved = resolve(&modules, &specifier)?;
    Some(Module {
      specifier: resolved.to_string(),
      kind: ModuleKind::JavaScript,
      inner: ModuleInner::Json {
        specifier: resolved,
        modules: self.modules.clone(),
      },
    })
  }

  /// This format does not distinguish import maps from modules.
  pub fn get_import_map(&self, specifier: &str) -> Option<Module> {
    self.get_module(specifier)
  }

  /// All specifiers, in no particular order.
  pub fn specifiers(&self) -> Vec<String> {
    let modules = self.modules.lock().unwrap();
    modules.keys().map(Url::to_string).collect()
  }
}

fn resolve(
  modules: &HashMap<Url, JsonModule>,
  specifier: &Url,
) -> Option<Url> {
  let mut visited = HashSet::new();
  let mut current = specifier;
  loop {
    visited.insert(current);
    match modules.get(current)? {
      JsonModule::Redirect(target) => {
        current = target;
        if visited.contains(current) {
          return None;
        }
      }
      JsonModule::Source(_) => return Some(current.clone()),
    }
  }
}

/// The transpiled body is preferred over the original source when both
/// are present.
pub(crate) fn get_source(
  modules: &Mutex<HashMap<Url, JsonModule>>,
  specifier: &Url,
) -> Option<Arc<[u8]>> {
  let modules = modules.lock().unwrap();
  match modules.get(specifier)? {
    JsonModule::Source(source) => Some(source_bytes(source)),
    JsonModule::Redirect(_) => None,
  }
}

/// Takes the source and removes the whole entry: afterwards the module is
/// gone from the archive, which is observable through lookups.
pub(crate) fn take_source(
  modules: &Mutex<HashMap<Url, JsonModule>>,
  specifier: &Url,
) -> Option<Arc<[u8]>> {
  let mut modules = modules.lock().unwrap();
  if !matches!(modules.get(specifier), Some(JsonModule::Source(_))) {
    return None;
  }
  let Some(JsonModule::Source(source)) = modules.remove(specifier) else {
    unreachable!()
  };
  Some(source_bytes(&source))
}

fn source_bytes(source: &JsonSource) -> Arc<[u8]> {
  let text = source.transpiled.as_ref().unwrap_or(&source.source);
  Arc::from(text.as_bytes())
}
