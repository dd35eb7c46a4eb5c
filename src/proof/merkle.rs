//! Merkle batching over sealed proof events.
//!
//! A batch of event hashes is folded into a single root; each leaf gets an
//! inclusion path so a caller can later prove membership against the
//! recorded root alone. Odd levels duplicate their last node, the usual
//! fixed-shape construction.

use serde::{Deserialize, Serialize};

use crate::canonical::sha256_hex;

/// One step of an inclusion path: the sibling hash and which side it sits on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PathStep {
    pub sibling: String,
    /// True when the sibling is the left operand of the pair hash.
    pub sibling_is_left: bool,
}

/// Inclusion path for one leaf, bottom-up.
pub type MerklePath = Vec<PathStep>;

/// Compute the Merkle root of a list of hex-encoded leaf hashes.
///
/// Returns `None` for an empty batch.
#[must_use]
pub fn merkle_root(leaves: &[String]) -> Option<String> {
    if leaves.is_empty() {
        return None;
    }
    let mut level: Vec<String> = leaves.to_vec();
    while level.len() > 1 {
        level = fold_level(&level);
    }
    level.pop()
}

/// Compute the root plus one inclusion path per leaf, in leaf order.
#[must_use]
pub fn merkle_root_with_paths(leaves: &[String]) -> Option<(String, Vec<MerklePath>)> {
    if leaves.is_empty() {
        return None;
    }
    let mut paths: Vec<MerklePath> = vec![Vec::new(); leaves.len()];
    // Track which level-node each original leaf currently maps to.
    let mut positions: Vec<usize> = (0..leaves.len()).collect();
    let mut level: Vec<String> = leaves.to_vec();

    while level.len() > 1 {
        for (leaf, pos) in positions.iter_mut().enumerate() {
            let sibling_idx = *pos ^ 1;
            let sibling = if sibling_idx < level.len() {
                level[sibling_idx].clone()
            } else {
                // Odd level: the last node is paired with itself.
                level[*pos].clone()
            };
            paths[leaf].push(PathStep {
                sibling,
                sibling_is_left: *pos % 2 == 1,
            });
            *pos /= 2;
        }
        level = fold_level(&level);
    }

    let root = level.pop()?;
    Some((root, paths))
}

/// Verify a leaf hash against a root using its inclusion path.
#[must_use]
pub fn verify_inclusion(leaf: &str, path: &MerklePath, root: &str) -> bool {
    let mut current = leaf.to_string();
    for step in path {
        current = if step.sibling_is_left {
            pair_hash(&step.sibling, &current)
        } else {
            pair_hash(&current, &step.sibling)
        };
    }
    current == root
}

fn fold_level(level: &[String]) -> Vec<String> {
    level
        .chunks(2)
        .map(|pair| match pair {
            [left, right] => pair_hash(left, right),
            [only] => pair_hash(only, only),
            _ => unreachable!("chunks(2) yields one or two items"),
        })
        .collect()
}

fn pair_hash(left: &str, right: &str) -> String {
    sha256_hex(&format!("{left}{right}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaves(n: usize) -> Vec<String> {
        (0..n).map(|i| sha256_hex(&format!("leaf-{i}"))).collect()
    }

    #[test]
    fn empty_batch_has_no_root() {
        assert!(merkle_root(&[]).is_none());
    }

    #[test]
    fn single_leaf_root_is_the_leaf() {
        let l = leaves(1);
        assert_eq!(merkle_root(&l).unwrap(), l[0]);
    }

    #[test]
    fn all_paths_verify() {
        for n in 1..=9 {
            let l = leaves(n);
            let (root, paths) = merkle_root_with_paths(&l).unwrap();
            assert_eq!(root, merkle_root(&l).unwrap());
            for (leaf, path) in l.iter().zip(&paths) {
                assert!(verify_inclusion(leaf, path, &root), "n={n}");
            }
        }
    }

    #[test]
    fn wrong_leaf_fails_verification() {
        let l = leaves(8);
        let (root, paths) = merkle_root_with_paths(&l).unwrap();
        assert!(!verify_inclusion(&l[1], &paths[0], &root));
    }
}
