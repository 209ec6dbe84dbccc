use crate::test_helpers::{b, counted_loop, diamond};

use super::*;

#[test]
fn predecessors_of_join() {
    let func = diamond();
    let preds = compute_predecessors(&func);
    assert_eq!(preds[3], vec![1, 2]);
    assert!(preds[0].is_empty());
}

#[test]
fn rpo_starts_at_entry_and_ends_at_exit() {
    let func = diamond();
    let rpo = reverse_postorder(&func);
    assert_eq!(rpo.len(), 4);
    assert_eq!(rpo[0], b(0));
    assert_eq!(rpo[3], b(3));
}

#[test]
fn rpo_skips_unreachable_blocks() {
    let mut func = diamond();
    func.add_block("dead");
    assert_eq!(reverse_postorder(&func).len(), 4);
}

#[test]
fn reachable_until_stops_at_bound() {
    let func = diamond();
    let blocks = reachable_until(&func, b(0), b(3));
    assert_eq!(blocks.len(), 4);
    assert_eq!(blocks[0], b(0));

    let from_then = reachable_until(&func, b(1), b(3));
    assert_eq!(from_then, vec![b(1), b(3)]);
}

#[test]
fn reachable_until_follows_back_edges() {
    let func = counted_loop(8);
    let blocks = reachable_until(&func, b(1), b(3));
    assert_eq!(blocks, vec![b(1), b(2), b(3)]);
}
