use proptest::prelude::*;
use warpcore::frontier::WorkItem;
use warpcore::order::PathHash;

proptest! {
    /// Two work items built from the same `(node_id, step, edge_index)`
    /// always compare equal, and the ordering is a total order: for any
    /// set of distinct node ids, sorting them twice yields the same
    /// sequence (P-style determinism property from the specification's
    /// testable properties).
    #[test]
    fn order_key_is_reproducible(node_ids in prop::collection::vec("[a-z]{1,8}", 1..12)) {
        let root = PathHash::root();
        let build = |ids: &[String]| -> Vec<WorkItem> {
            let mut items: Vec<WorkItem> = ids
                .iter()
                .enumerate()
                .map(|(idx, id)| WorkItem::new(id.clone(), 1, root.next(id), idx as u32))
                .collect();
            items.sort();
            items
        };

        let first = build(&node_ids);
        let second = build(&node_ids);
        prop_assert_eq!(first.iter().map(|i| i.order_key).collect::<Vec<_>>(),
                         second.iter().map(|i| i.order_key).collect::<Vec<_>>());
    }

    #[test]
    fn path_hash_chaining_is_injective_over_short_names(a in "[a-z]{1,6}", b in "[a-z]{1,6}") {
        prop_assume!(a != b);
        let root = PathHash::root();
        prop_assert_ne!(root.next(&a).as_bytes(), root.next(&b).as_bytes());
    }
}
