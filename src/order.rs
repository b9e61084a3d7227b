use sha2::{Digest, Sha256};

/// Chained hash of the path from a run's root node to the current node,
/// used to derive collision-resistant [`OrderKey`]s without a global
/// counter shared across concurrent executions.
///
/// `next` is pure: `SHA-256(prev || node_id)`. Computing it requires no
/// lock and no access to any other in-flight node's state, which is what
/// lets node executions within a step run fully in parallel while still
/// producing a deterministic total order over their outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PathHash([u8; 32]);

impl PathHash {
    /// The path hash of a run's implicit root, before any node has run.
    pub fn root() -> Self {
        Self([0u8; 32])
    }

    /// Reconstructs a `PathHash` from its raw bytes, e.g. the value
    /// persisted on a [`crate::frontier::WorkItem`]. Not a substitute for
    /// `next`: it does not itself chain anything, only restores a
    /// previously-derived hash for further chaining.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn next(&self, node_id: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(self.0);
        hasher.update(node_id.as_bytes());
        let digest = hasher.finalize();
        let mut out = [0u8; 32];
        out.copy_from_slice(&digest);
        Self(out)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

/// A node's position in the deterministic total order over a step's
/// outputs: the leading 8 bytes (big-endian) of
/// `SHA-256(path_hash || edge_index)`.
///
/// Ties are not merely assumed negligible: [`crate::frontier::FrontierQueue`]
/// checks for them on insert and reports
/// [`crate::error::EngineError::OrderKeyCollision`] rather than silently
/// picking an order, since a silent tie-break would make I4
/// ("deterministic total order... no two work items compare equal")
/// unverifiable rather than false.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OrderKey(u64);

impl OrderKey {
    pub fn derive(path_hash: &PathHash, edge_index: u32) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(path_hash.as_bytes());
        hasher.update(edge_index.to_be_bytes());
        let digest = hasher.finalize();
        let mut buf = [0u8; 8];
        buf.copy_from_slice(&digest[..8]);
        Self(u64::from_be_bytes(buf))
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for OrderKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_key_is_deterministic() {
        let root = PathHash::root();
        let a = root.next("node_a");
        let k1 = OrderKey::derive(&a, 0);
        let k2 = OrderKey::derive(&a, 0);
        assert_eq!(k1, k2);
    }

    #[test]
    fn order_key_varies_with_edge_index() {
        let root = PathHash::root();
        let a = root.next("node_a");
        let k0 = OrderKey::derive(&a, 0);
        let k1 = OrderKey::derive(&a, 1);
        assert_ne!(k0, k1);
    }

    #[test]
    fn path_hash_chains_distinctly_per_node() {
        let root = PathHash::root();
        let a = root.next("node_a");
        let b = root.next("node_b");
        assert_ne!(a, b);
    }
}
