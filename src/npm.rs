// Copyright 2018-2026 the Deno authors. MIT license.

use std::collections::HashMap;

use crate::error::ParseError;
use crate::header;

/// Identifier of a resolved package: a name and an exact version,
/// serialized as `name@version`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NpmPackageId {
  pub name: String,
  pub version: String,
}

impl NpmPackageId {
  /// Parse `name@version`. Names may themselves start with `@` and
  /// contain `/` (scoped packages), so the version starts at the *last*
  /// `@`. An empty name or version is rejected.
  pub fn from_serialized(id: &str) -> Option<NpmPackageId> {
    let (name, version) = id.rsplit_once('@')?;
    if name.is_empty() || version.is_empty() {
      return None;
    }
    Some(NpmPackageId {
      name: name.to_string(),
      version: version.to_string(),
    })
  }

  pub fn as_serialized(&self) -> String {
    format!("{}@{}", self.name, self.version)
  }
}

/// One resolved package and its resolved dependency edges, keyed by the
/// request string found in the depending package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NpmPackage {
  pub id: NpmPackageId,
  pub dependencies: HashMap<String, NpmPackageId>,
}

/// A resolved package closure embedded in an archive: the package table
/// plus the requests the module graph itself maps to packages.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NpmSnapshot {
  pub packages: Vec<NpmPackage>,
  pub root_packages: HashMap<String, NpmPackageId>,
}

struct RawPackage {
  id: String,
  dependencies: Vec<(String, u32)>,
}

/// Decode the content of the packages frame. On the wire every package
/// reference is an index into the table; decoding resolves all indexes to
/// ids and rejects dangling ones.
pub(crate) fn decode(
  content: &[u8],
  root_indexes: header::RootPackageIndexes,
) -> Result<Option<NpmSnapshot>, ParseError> {
  if content.is_empty() && root_indexes.is_empty() {
    return Ok(None);
  }

  let mut raw = Vec::new();
  let mut bytes = content;
  while !bytes.is_empty() {
    let offset = content.len() - bytes.len();
    let (rest, package) = parse_package(bytes)
      .ok_or(ParseError::InvalidV2NpmPackageOffset(offset))?;
    bytes = rest;
    raw.push(package);
  }

  // first pass: the id of every table position
  let mut index_to_id = Vec::with_capacity(raw.len());
  for package in &raw {
    let id = NpmPackageId::from_serialized(&package.id)
      .ok_or_else(|| ParseError::InvalidV2NpmPackage(package.id.clone()))?;
    index_to_id.push(id);
  }

  // second pass: rewrite dependency indexes to ids
  let mut packages = Vec::with_capacity(raw.len());
  for (i, package) in raw.into_iter().enumerate() {
    let mut dependencies = HashMap::with_capacity(package.dependencies.len());
    for (request, index) in package.dependencies {
      let id = index_to_id
        .get(index as usize)
        .ok_or_else(|| ParseError::InvalidV2NpmPackage(package.id.clone()))?;
      dependencies.insert(request, id.clone());
    }
    packages.push(NpmPackage {
      id: index_to_id[i].clone(),
      dependencies,
    });
  }

  let mut root_packages = HashMap::with_capacity(root_indexes.len());
  for (request, index) in root_indexes {
    let id = index_to_id
      .get(index as usize)
      .ok_or_else(|| ParseError::InvalidV2NpmPackageReq(request.clone()))?;
    root_packages.insert(request, id.clone());
  }

  Ok(Some(NpmSnapshot {
    packages,
    root_packages,
  }))
}

/// Append the snapshot's root entries to the modules header and its
/// package table to `packages_bytes`. Packages are emitted in
/// lexicographic order of their serialized id, dependency and root maps
/// in lexicographic order of their request, so equal snapshots serialize
/// to equal bytes.
pub(crate) fn encode(
  snapshot: &NpmSnapshot,
  modules_header: &mut Vec<u8>,
  packages_bytes: &mut Vec<u8>,
) {
  let mut packages: Vec<&NpmPackage> = snapshot.packages.iter().collect();
  packages.sort_by_key(|package| package.id.as_serialized());

  let id_to_index: HashMap<&NpmPackageId, u32> = packages
    .iter()
    .enumerate()
    .map(|(i, package)| (&package.id, i as u32))
    .collect();

  let mut root_packages: Vec<_> = snapshot.root_packages.iter().collect();
  root_packages.sort_by(|(a, _), (b, _)| a.cmp(b));
  for (request, id) in root_packages {
    header::encode_package_index_entry(
      modules_header,
      request,
      id_to_index[id],
    );
  }

  for package in &packages {
    header::append_string(packages_bytes, &package.id.as_serialized());
    let mut dependencies: Vec<_> = package.dependencies.iter().collect();
    dependencies.sort_by(|(a, _), (b, _)| a.cmp(b));
    packages_bytes
      .extend_from_slice(&(dependencies.len() as u32).to_be_bytes());
    for (request, id) in dependencies {
      header::append_string(packages_bytes, request);
      packages_bytes.extend_from_slice(&id_to_index[id].to_be_bytes());
    }
  }
}

fn parse_package(input: &[u8]) -> Option<(&[u8], RawPackage)> {
  let (input, id) = parse_string(input)?;
  let (mut input, dependency_count) = parse_u32(input)?;
  let mut dependencies = Vec::with_capacity(dependency_count as usize);
  for _ in 0..dependency_count {
    let (rest, request) = parse_string(input)?;
    let (rest, index) = parse_u32(rest)?;
    dependencies.push((request, index));
    input = rest;
  }
  Some((input, RawPackage { id, dependencies }))
}

fn parse_string(input: &[u8]) -> Option<(&[u8], String)> {
  let (input, len) = parse_u32(input)?;
  if input.len() < len as usize {
    return None;
  }
  let (bytes, input) = input.split_at(len as usize);
  let text = String::from_utf8(bytes.to_vec()).ok()?;
  Some((input, text))
}

fn parse_u32(input: &[u8]) -> Option<(&[u8], u32)> {
  if input.len() < 4 {
    return None;
  }
  let (bytes, input) = input.split_at(4);
  Some((input, u32::from_be_bytes(bytes.try_into().unwrap())))
}
