use crate::ir::{InstId, InstKind, Value};
use crate::test_helpers::{b, counted_loop, diamond};

use super::*;

#[test]
fn clones_internal_references_and_keeps_external_ones() {
    let mut func = diamond();
    // Clone then/join: %x is internal, %y and `else` are external.
    let copy = clone_subgraph(&mut func, &[b(1), b(3)], ".cf2");

    let then_copy = copy.block(b(1)).unwrap_or(b(99));
    let join_copy = copy.block(b(3)).unwrap_or(b(99));
    assert_eq!(func.block(then_copy).name, "then.cf2");
    assert_eq!(copy.blocks, vec![then_copy, join_copy]);

    // `br join` in the copied `then` targets the copied join.
    assert_eq!(func.successors(then_copy).as_slice(), &[join_copy]);

    let x_copy = copy.value(InstId::new(2)).unwrap_or(InstId::new(99));
    assert_eq!(func.inst(x_copy).name, "x.cf2");

    let m_copy = copy.value(InstId::new(6)).unwrap_or(InstId::new(99));
    let InstKind::Phi { incoming } = func.kind(m_copy) else {
        panic!("expected phi");
    };
    assert_eq!(incoming[0], (Value::Inst(x_copy), then_copy));
    assert_eq!(incoming[1], (Value::Inst(InstId::new(4)), b(2)));
}

#[test]
fn clone_of_loop_keeps_back_edge_inside_copy() {
    let mut func = counted_loop(8);
    let copy = clone_subgraph(&mut func, &[b(1), b(2)], ".cf3");
    let header_copy = copy.block(b(1)).unwrap_or(b(99));
    let body_copy = copy.block(b(2)).unwrap_or(b(99));

    assert_eq!(func.successors(body_copy).as_slice(), &[header_copy]);
    assert_eq!(func.successors(header_copy).as_slice(), &[body_copy, b(3)]);

    // The copied phi still names the original preheader.
    let i_copy = copy.value(InstId::new(1)).unwrap_or(InstId::new(99));
    let InstKind::Phi { incoming } = func.kind(i_copy) else {
        panic!("expected phi");
    };
    assert_eq!(incoming[0].1, b(0));
    assert_eq!(incoming[1].1, body_copy);
}

#[test]
fn anonymous_values_stay_anonymous() {
    assert_eq!(suffixed("", ".cf2"), "");
    assert_eq!(suffixed("tid", ".cf2"), "tid.cf2");
}
