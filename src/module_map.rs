// Copyright 2018-2026 the Deno authors. MIT license.

use indexmap::IndexMap;

use crate::slot::SourceSlot;
use crate::ModuleKind;

/// One entry of the module map.
#[derive(Debug)]
pub(crate) enum ModuleEntry {
  Module {
    kind: ModuleKind,
    source: SourceSlot,
    source_map: SourceSlot,
  },
  Redirect {
    target: String,
  },
}

/// Specifier-keyed map that preserves insertion order. The iteration
/// order is the archive's on-disk order, so it survives a
/// serialize/parse roundtrip.
#[derive(Debug, Default)]
pub(crate) struct ModuleMap(IndexMap<String, ModuleEntry>);

impl ModuleMap {
  pub fn insert(&mut self, specifier: String, entry: ModuleEntry) {
    self.0.insert(specifier, entry);
  }

  /// Insert at the front of the map. An existing entry for the specifier
  /// is replaced and relocated.
  pub fn insert_front(&mut self, specifier: String, entry: ModuleEntry) {
    self.remove(&specifier);
    self.0.shift_insert(0, specifier, entry);
  }

  /// Move an existing entry to the front, keeping its value.
  pub fn move_to_front(&mut self, specifier: &str) {
    if let Some(index) = self.0.get_index_of(specifier) {
      self.0.move_index(index, 0);
    }
  }

  pub fn contains(&self, specifier: &str) -> bool {
    self.0.contains_key(specifier)
  }

  pub fn get(&self, specifier: &str) -> Option<&ModuleEntry> {
    self.0.get(specifier)
  }

  pub fn remove(&mut self, specifier: &str) -> Option<ModuleEntry> {
    self.0.shift_remove(specifier)
  }

  pub fn specifiers(&self) -> impl Iterator<Item = &str> {
    self.0.keys().map(|specifier| specifier.as_str())
  }

  pub fn iter(&self) -> impl Iterator<Item = (&str, &ModuleEntry)> {
    self.0.iter().map(|(specifier, entry)| (specifier.as_str(), entry))
  }

  pub fn len(&self) -> usize {
    self.0.len()
  }
}

#[cfg(test)]
mod tests {
  use super::ModuleEntry;
  use super::ModuleMap;

  fn redirect(target: &str) -> ModuleEntry {
    ModuleEntry::Redirect {
      target: target.to_string(),
    }
  }

  fn specifiers(map: &ModuleMap) -> Vec<&str> {
    map.specifiers().collect()
  }

  #[test]
  fn preserves_insertion_order() {
    let mut map = ModuleMap::default();
    map.insert("file:///c.ts".to_string(), redirect("c"));
    map.insert("file:///a.ts".to_string(), redirect("a"));
    map.insert("file:///b.ts".to_string(), redirect("b"));
    assert_eq!(
      specifiers(&map),
      vec!["file:///c.ts", "file:///a.ts", "file:///b.ts"]
    );
    assert_eq!(map.len(), 3);
  }

  #[test]
  fn insert_front_relocates_existing_entries() {
    let mut map = ModuleMap::default();
    map.insert("a".to_string(), redirect("1"));
    map.insert("b".to_string(), redirect("2"));
    map.insert_front("b".to_string(), redirect("3"));
    assert_eq!(specifiers(&map), vec!["b", "a"]);
    let Some(ModuleEntry::Redirect { target }) = map.get("b") else {
      panic!("expected redirect");
    };
    assert_eq!(target, "3");

    map.insert_front("c".to_string(), redirect("4"));
    assert_eq!(specifiers(&map), vec!["c", "b", "a"]);
  }

  #[test]
  fn move_to_front_keeps_the_value() {
    let mut map = ModuleMap::default();
    map.insert("a".to_string(), redirect("1"));
    map.insert("b".to_string(), redirect("2"));
    map.move_to_front("b");
    assert_eq!(specifiers(&map), vec!["b", "a"]);
    let Some(ModuleEntry::Redirect { target }) = map.get("b") else {
      panic!("expected redirect");
    };
    assert_eq!(target, "2");
  }

  #[test]
  fn remove_keeps_the_order_of_the_rest() {
    let mut map = ModuleMap::default();
    map.insert("a".to_string(), redirect("1"));
    map.insert("b".to_string(), redirect("2"));
    map.insert("c".to_string(), redirect("3"));
    assert!(map.remove("b").is_some());
    assert!(map.remove("b").is_none());
    assert!(!map.contains("b"));
    assert_eq!(specifiers(&map), vec!["a", "c"]);
  }
}
