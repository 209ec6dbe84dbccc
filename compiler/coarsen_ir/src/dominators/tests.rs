use crate::test_helpers::{b, counted_loop, diamond};

use super::*;

/// Diamond: entry dominates all; neither arm dominates the join.
#[test]
fn diamond_dominance() {
    let func = diamond();
    let dom = DominatorTree::build(&func);
    assert!(dom.dominates(b(0), b(3)));
    assert!(!dom.dominates(b(1), b(3)));
    assert!(!dom.dominates(b(2), b(3)));
    assert_eq!(dom.idom(b(3)), Some(b(0)));
    assert_eq!(dom.idom(b(0)), None);
}

/// Diamond: the join post-dominates everything; arms post-dominate only themselves.
#[test]
fn diamond_post_dominance() {
    let func = diamond();
    let pdom = PostDominatorTree::build(&func);
    assert_eq!(pdom.immediate_post_dominator(b(0)), Some(b(3)));
    assert_eq!(pdom.immediate_post_dominator(b(1)), Some(b(3)));
    assert_eq!(pdom.immediate_post_dominator(b(3)), None);
    assert!(pdom.post_dominates(b(3), b(0)));
    assert!(!pdom.post_dominates(b(1), b(0)));
}

/// Loop: header dominates body and exit; exit post-dominates the header.
#[test]
fn loop_dominance() {
    let func = counted_loop(8);
    let dom = DominatorTree::build(&func);
    let pdom = PostDominatorTree::build(&func);
    assert!(dom.dominates(b(1), b(2)));
    assert!(dom.dominates(b(1), b(3)));
    assert!(!dom.dominates(b(2), b(1)));
    assert_eq!(pdom.immediate_post_dominator(b(1)), Some(b(3)));
    assert_eq!(pdom.immediate_post_dominator(b(2)), Some(b(1)));
}

/// Two returning blocks: only the virtual exit post-dominates the entry.
#[test]
fn multiple_exits_have_no_real_post_dominator() {
    use crate::builder::FunctionBuilder;
    use crate::ir::Value;

    let mut fb = FunctionBuilder::new("two_exits", vec![]);
    let entry = fb.block("entry");
    let left = fb.block("left");
    let right = fb.block("right");
    fb.switch_to(entry);
    fb.cond_br(Value::Const(1), left, right);
    fb.switch_to(left);
    fb.ret(None);
    fb.switch_to(right);
    fb.ret(None);
    let func = fb.finish();

    let pdom = PostDominatorTree::build(&func);
    assert_eq!(pdom.immediate_post_dominator(entry), None);
}

#[test]
fn instruction_dominance_within_and_across_blocks() {
    let func = diamond();
    let dom = DominatorTree::build(&func);
    let (c, br, x, m) = (InstId::new(0), InstId::new(1), InstId::new(2), InstId::new(6));
    assert!(dom.inst_dominates(&func, c, br));
    assert!(!dom.inst_dominates(&func, br, c));
    assert!(dom.inst_dominates(&func, c, m));
    assert!(!dom.inst_dominates(&func, x, m));
}

#[test]
fn unreachable_block_is_dominated_only_by_itself() {
    let mut func = diamond();
    let dead = func.add_block("dead");
    let dom = DominatorTree::build(&func);
    assert!(!dom.is_reachable(dead));
    assert!(dom.dominates(dead, dead));
    assert!(!dom.dominates(b(0), dead));
}
