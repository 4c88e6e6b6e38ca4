use crate::address::{Address, Amount};
use crate::error::SettlementError;
use hex::ToHex;
use rs_merkle::{Hasher, MerkleProof, MerkleTree};

/// Blake3 powered hasher compatible with `rs_merkle`.
#[derive(Debug, Clone, Copy)]
pub struct Blake3;

impl Hasher for Blake3 {
    type Hash = [u8; 32];

    fn hash(data: &[u8]) -> Self::Hash {
        *blake3::hash(data).as_bytes()
    }
}

/// Root reported for a ledger without entries.
pub fn empty_root() -> [u8; 32] {
    *blake3::hash(b"leaf-ledger-empty").as_bytes()
}

/// Leaf commitment for one `(account, amount)` balance.
pub fn balance_leaf(account: &Address, amount: Amount) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new();
    hasher.update(b"leaf-balance");
    hasher.update(account.as_bytes());
    hasher.update(&amount.to_be_bytes());
    *hasher.finalize().as_bytes()
}

/// Merkle tree over account balances, kept in the caller's order.
#[derive(Clone, Debug)]
pub struct BalanceTree {
    leaves: Vec<[u8; 32]>,
    root: Option<[u8; 32]>,
}

impl BalanceTree {
    /// Build a tree from pre-hashed leaves.
    pub fn from_leaves(leaves: Vec<[u8; 32]>) -> Self {
        let tree = MerkleTree::<Blake3>::from_leaves(&leaves);
        Self {
            root: tree.root(),
            leaves,
        }
    }

    /// Hash each balance with [`balance_leaf`] and build the tree.
    pub fn from_balances<'a>(balances: impl IntoIterator<Item = (&'a Address, Amount)>) -> Self {
        let leaves = balances
            .into_iter()
            .map(|(account, amount)| balance_leaf(account, amount))
            .collect();
        Self::from_leaves(leaves)
    }

    /// Merkle root, or [`empty_root`] when there are no leaves.
    pub fn root(&self) -> [u8; 32] {
        self.root.unwrap_or_else(empty_root)
    }

    /// Render the root as a hex encoded string.
    pub fn root_hex(&self) -> String {
        self.root().encode_hex::<String>()
    }

    /// Create an inclusion proof for the specified leaf indices.
    pub fn proof(&self, indices: &[usize]) -> Result<BalanceProof, SettlementError> {
        if let Some(&index) = indices.iter().find(|&&idx| idx >= self.leaves.len()) {
            return Err(SettlementError::IndexOutOfRange {
                index,
                len: self.leaves.len(),
            });
        }
        let tree = MerkleTree::<Blake3>::from_leaves(&self.leaves);
        Ok(BalanceProof {
            proof: tree.proof(indices),
            leaf_indices: indices.to_vec(),
            total_leaves: self.leaves.len(),
        })
    }
}

/// Inclusion proof for one or more balances.
pub struct BalanceProof {
    proof: MerkleProof<Blake3>,
    leaf_indices: Vec<usize>,
    total_leaves: usize,
}

impl BalanceProof {
    pub fn leaf_indices(&self) -> &[usize] {
        &self.leaf_indices
    }

    /// Check that `leaves` (hashed with [`balance_leaf`], in index order)
    /// are committed to by `root`.
    pub fn verify(&self, root: [u8; 32], leaves: &[[u8; 32]]) -> bool {
        self.proof
            .verify(root, &self.leaf_indices, leaves, self.total_leaves)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn proves_membership_and_detects_tampering() {
        let accounts: Vec<Address> = ["alpha", "beta", "gamma", "delta"]
            .iter()
            .map(|label| Address::from_label(label))
            .collect();
        let amounts = [10u128, 20, 30, 40];
        let tree = BalanceTree::from_balances(accounts.iter().zip(amounts));
        let root = tree.root();

        let proof = tree.proof(&[1]).expect("proof");
        let leaf = balance_leaf(&accounts[1], 20);
        assert!(proof.verify(root, &[leaf]));

        let forged = balance_leaf(&accounts[1], 21);
        assert!(!proof.verify(root, &[forged]));

        let mut tampered = root;
        tampered[0] ^= 0xff;
        assert!(!proof.verify(tampered, &[leaf]));
    }

    #[test]
    fn empty_tree_has_fixed_root() {
        let tree = BalanceTree::from_leaves(Vec::new());
        assert_eq!(tree.root(), empty_root());
        assert!(matches!(
            tree.proof(&[0]),
            Err(SettlementError::IndexOutOfRange { index: 0, len: 0 })
        ));
    }
}
