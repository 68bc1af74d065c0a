//! Merkle tree over cumulative reward leaves
//!
//! # Design
//!
//! - Leaf hash: SHA-256 of `index (32-byte BE) ‖ account (20 bytes) ‖ amount (32-byte BE)`
//! - Internal nodes hash the sorted pair, so proofs carry no directions
//! - Leaves are sorted by index before pairing
//! - Levels are paired left to right; the last node of an odd level pairs
//!   with itself
//! - Every node keeps a parent pointer; a proof walks them to the root

use crate::types::{MerkleLeaf, NodeHash};
use crate::{Error, Result};
use sha2::{Digest, Sha256};
use std::collections::HashMap;

/// Hash a leaf in its canonical byte layout
pub fn leaf_hash(leaf: &MerkleLeaf) -> NodeHash {
    let mut index = [0u8; 32];
    index[24..].copy_from_slice(&leaf.index.to_be_bytes());
    let mut amount = [0u8; 32];
    amount[16..].copy_from_slice(&leaf.amount.to_be_bytes());

    let mut hasher = Sha256::new();
    hasher.update(index);
    hasher.update(leaf.account.as_bytes());
    hasher.update(amount);
    NodeHash(hasher.finalize().into())
}

/// Hash two nodes in ascending order
pub fn hash_pair(a: &NodeHash, b: &NodeHash) -> NodeHash {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    let mut hasher = Sha256::new();
    hasher.update(lo.as_bytes());
    hasher.update(hi.as_bytes());
    NodeHash(hasher.finalize().into())
}

/// Fold a proof from `leaf` upwards and compare with `root`
pub fn verify_proof(proof: &[NodeHash], root: &NodeHash, leaf: &NodeHash) -> bool {
    let computed = proof
        .iter()
        .fold(*leaf, |current, sibling| hash_pair(&current, sibling));
    computed == *root
}

/// Copy of `leaves` in ascending index order; indices must be unique
pub fn sorted_by_index(leaves: &[MerkleLeaf]) -> Result<Vec<MerkleLeaf>> {
    let mut sorted = leaves.to_vec();
    sorted.sort_by_key(|leaf| leaf.index);
    if let Some(pair) = sorted.windows(2).find(|pair| pair[0].index == pair[1].index) {
        return Err(Error::DuplicateLeafIndex(pair[0].index));
    }
    Ok(sorted)
}

/// Merkle tree built once from a fixed leaf set
#[derive(Debug, Clone)]
pub struct MerkleTree {
    /// Leaf hashes first, then each level above them
    nodes: Vec<NodeHash>,
    /// Parent of each node (None for the root)
    parents: Vec<Option<usize>>,
    /// Node hashed together with each node (itself for an unpaired node)
    siblings: Vec<usize>,
    /// Leaf index -> node position
    positions: HashMap<u64, usize>,
    root: usize,
}

impl MerkleTree {
    /// Build a tree from leaves sorted by index, so the root does not depend
    /// on input order
    pub fn build(leaves: &[MerkleLeaf]) -> Result<Self> {
        if leaves.is_empty() {
            return Err(Error::EmptyTree);
        }
        let leaves = sorted_by_index(leaves)?;

        let mut positions = HashMap::with_capacity(leaves.len());
        let mut nodes = Vec::with_capacity(leaves.len() * 2);
        for (pos, leaf) in leaves.iter().enumerate() {
            positions.insert(leaf.index, pos);
            nodes.push(leaf_hash(leaf));
        }

        let mut parents = vec![None; nodes.len()];
        let mut siblings: Vec<usize> = (0..nodes.len()).collect();
        let mut level: Vec<usize> = (0..nodes.len()).collect();

        while level.len() > 1 {
            let mut next = Vec::with_capacity(level.len().div_ceil(2));
            for pair in level.chunks(2) {
                let left = pair[0];
                let right = pair.get(1).copied().unwrap_or(left);

                let hash = hash_pair(&nodes[left], &nodes[right]);
                let parent = nodes.len();
                nodes.push(hash);
                parents.push(None);
                siblings.push(parent);

                parents[left] = Some(parent);
                parents[right] = Some(parent);
                siblings[left] = right;
                siblings[right] = left;
                next.push(parent);
            }
            level = next;
        }

        Ok(Self {
            root: level[0],
            nodes,
            parents,
            siblings,
            positions,
        })
    }

    /// Root hash
    pub fn root(&self) -> NodeHash {
        self.nodes[self.root]
    }

    /// Number of leaves
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// Always false; empty trees are rejected at build time
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Sibling path from the leaf with `index` to the root
    pub fn proof(&self, index: u64) -> Option<Vec<NodeHash>> {
        let mut pos = *self.positions.get(&index)?;
        let mut proof = Vec::new();
        while let Some(parent) = self.parents[pos] {
            proof.push(self.nodes[self.siblings[pos]]);
            pos = parent;
        }
        Some(proof)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use escrow_core::AccountId;

    fn leaf(index: u64, label: &str, amount: u128) -> MerkleLeaf {
        MerkleLeaf {
            index,
            account: AccountId::derive(label),
            amount,
        }
    }

    #[test]
    fn test_leaf_hash_layout() {
        let l = leaf(1, "alice", 5);
        let mut bytes = Vec::with_capacity(84);
        bytes.extend_from_slice(&[0u8; 31]);
        bytes.push(1);
        bytes.extend_from_slice(l.account.as_bytes());
        bytes.extend_from_slice(&[0u8; 31]);
        bytes.push(5);
        let expected: [u8; 32] = Sha256::digest(&bytes).into();

        assert_eq!(leaf_hash(&l), NodeHash(expected));
    }

    #[test]
    fn test_hash_pair_is_order_independent() {
        let a = leaf_hash(&leaf(0, "a", 1));
        let b = leaf_hash(&leaf(1, "b", 2));
        assert_eq!(hash_pair(&a, &b), hash_pair(&b, &a));
    }

    #[test]
    fn test_empty_tree_rejected() {
        assert!(matches!(MerkleTree::build(&[]), Err(Error::EmptyTree)));
    }

    #[test]
    fn test_duplicate_index_rejected() {
        let leaves = [leaf(3, "a", 1), leaf(3, "b", 2)];
        assert!(matches!(
            MerkleTree::build(&leaves),
            Err(Error::DuplicateLeafIndex(3))
        ));
    }

    #[test]
    fn test_single_leaf() {
        let l = leaf(0, "a", 1);
        let tree = MerkleTree::build(&[l]).unwrap();

        assert_eq!(tree.root(), leaf_hash(&l));
        assert_eq!(tree.proof(0).unwrap(), Vec::<NodeHash>::new());
        assert!(verify_proof(&[], &tree.root(), &leaf_hash(&l)));
    }

    #[test]
    fn test_four_leaves() {
        let leaves: Vec<_> = (0..4).map(|i| leaf(i, &format!("acc{}", i), 100)).collect();
        let tree = MerkleTree::build(&leaves).unwrap();

        let h: Vec<_> = leaves.iter().map(leaf_hash).collect();
        let h01 = hash_pair(&h[0], &h[1]);
        let h23 = hash_pair(&h[2], &h[3]);
        assert_eq!(tree.root(), hash_pair(&h01, &h23));

        assert_eq!(tree.proof(2).unwrap(), vec![h[3], h01]);
    }

    #[test]
    fn test_odd_level_pairs_with_itself() {
        let leaves: Vec<_> = (0..3).map(|i| leaf(i, &format!("acc{}", i), 7)).collect();
        let tree = MerkleTree::build(&leaves).unwrap();

        let h: Vec<_> = leaves.iter().map(leaf_hash).collect();
        let h01 = hash_pair(&h[0], &h[1]);
        let h22 = hash_pair(&h[2], &h[2]);
        assert_eq!(tree.root(), hash_pair(&h01, &h22));

        let proof = tree.proof(2).unwrap();
        assert_eq!(proof, vec![h[2], h01]);
        assert!(verify_proof(&proof, &tree.root(), &h[2]));
    }

    #[test]
    fn test_root_independent_of_input_order() {
        let leaves: Vec<_> = (0..4).map(|i| leaf(i, &format!("acc{}", i), 100 + i as u128)).collect();
        let shuffled = [leaves[0], leaves[2], leaves[1], leaves[3]];

        let sorted = MerkleTree::build(&leaves).unwrap();
        let tree = MerkleTree::build(&shuffled).unwrap();
        assert_eq!(tree.root(), sorted.root());
        for l in &shuffled {
            let proof = tree.proof(l.index).unwrap();
            assert!(verify_proof(&proof, &tree.root(), &leaf_hash(l)));
        }
    }

    #[test]
    fn test_proofs_verify_and_reject_tampering() {
        let leaves: Vec<_> = (0..5).map(|i| leaf(i * 10, &format!("acc{}", i), 1_000 + i as u128)).collect();
        let tree = MerkleTree::build(&leaves).unwrap();

        for l in &leaves {
            let proof = tree.proof(l.index).unwrap();
            assert!(verify_proof(&proof, &tree.root(), &leaf_hash(l)));

            let forgeries = [
                MerkleLeaf { amount: l.amount + 1, ..*l },
                MerkleLeaf { index: l.index + 1, ..*l },
                MerkleLeaf { account: AccountId::derive("mallory"), ..*l },
            ];
            for forged in &forgeries {
                assert!(!verify_proof(&proof, &tree.root(), &leaf_hash(forged)));
            }
        }
        assert!(tree.proof(1).is_none());
    }
}
