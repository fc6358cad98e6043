use std::hash::Hasher;

use xxhash_rust::xxh3::Xxh3;
use xxhash_rust::xxh3::xxh3_64;

/// Atlaspack needs to use a hasher for generating certain identifiers used in caches.
///
/// The hashes don't need to be incredibly fast, but they should be stable across
/// runs, machines, platforms and versions.
///
/// Bundle ids are derived from these hashes, so a change in the hashing scheme
/// invalidates every cached bundle.
pub type IdentifierHasher = Xxh3;

pub fn hash_string(s: String) -> String {
  hash_bytes(s.as_bytes())
}

pub fn hash_bytes(s: &[u8]) -> String {
  let res = xxh3_64(s);
  format!("{:016x}", res)
}

/// Hash an identifier as a number, used where a stable numeric bucket is needed.
pub fn hash_u64(s: &str) -> u64 {
  let mut hasher = IdentifierHasher::default();
  hasher.write(s.as_bytes());
  hasher.finish()
}

#[cfg(test)]
mod tests {
  use pretty_assertions::assert_eq;

  use super::*;

  #[test]
  fn hashes_are_sixteen_hex_characters() {
    let hash = hash_string(String::from("bundle:index.js"));

    assert_eq!(hash.len(), 16);
    assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
  }

  #[test]
  fn hashes_are_stable() {
    assert_eq!(hash_string(String::from("a")), hash_bytes(b"a"));
    assert_eq!(hash_u64("asset"), hash_u64("asset"));
    assert_eq!(format!("{:016x}", hash_u64("asset")), hash_string(String::from("asset")));
  }
}
