//! Structural well-formedness checks.
//!
//! Catches the mistakes CFG surgery tends to make: blocks left without a
//! terminator, phis whose incoming blocks no longer match the predecessors,
//! and operands still naming erased instructions.

use rustc_hash::FxHashSet;

use crate::function::Function;
use crate::graph::{compute_predecessors, reverse_postorder};
use crate::ir::{BlockId, InstKind, Value};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VerifyError {
    #[error("block `{block}` of `{function}` does not end in a terminator")]
    MissingTerminator { function: String, block: String },
    #[error("block `{block}` of `{function}` has a terminator before its end")]
    MisplacedTerminator { function: String, block: String },
    #[error("phi `{value}` in block `{block}` of `{function}` follows a non-phi")]
    MisplacedPhi {
        function: String,
        block: String,
        value: String,
    },
    #[error("phi `{value}` in block `{block}` of `{function}` does not match the block's predecessors")]
    PhiPredecessorMismatch {
        function: String,
        block: String,
        value: String,
    },
    #[error("`{user}` in `{function}` uses an erased instruction")]
    DanglingOperand { function: String, user: String },
}

/// Check `func` for structural errors, reporting the first one found.
pub fn verify_function(func: &Function) -> Result<(), VerifyError> {
    let reachable: FxHashSet<BlockId> = reverse_postorder(func).into_iter().collect();
    let preds = compute_predecessors(func);
    let function = || func.name.clone();
    let block_name = |block: BlockId| func.block_label(block);

    for &block in func.layout() {
        let insts = func.block(block).insts();
        if func.terminator(block).is_none() {
            return Err(VerifyError::MissingTerminator {
                function: function(),
                block: block_name(block),
            });
        }

        let mut seen_non_phi = false;
        for (pos, &inst) in insts.iter().enumerate() {
            let kind = func.kind(inst);
            if kind.is_terminator() && pos + 1 != insts.len() {
                return Err(VerifyError::MisplacedTerminator {
                    function: function(),
                    block: block_name(block),
                });
            }
            if kind.is_phi() && seen_non_phi {
                return Err(VerifyError::MisplacedPhi {
                    function: function(),
                    block: block_name(block),
                    value: func.inst(inst).name.clone(),
                });
            }
            seen_non_phi |= !kind.is_phi();

            for operand in kind.operands() {
                if let Value::Inst(used) = operand {
                    if !func.is_live(used) {
                        return Err(VerifyError::DanglingOperand {
                            function: function(),
                            user: func.inst(inst).name.clone(),
                        });
                    }
                }
            }
        }

        if !reachable.contains(&block) {
            continue;
        }
        let expected: FxHashSet<BlockId> = preds[block.index()]
            .iter()
            .filter_map(|&p| func.layout().iter().copied().find(|b| b.index() == p))
            .filter(|b| reachable.contains(b))
            .collect();
        for phi in func.phis(block) {
            let InstKind::Phi { incoming } = func.kind(phi) else {
                continue;
            };
            let actual: FxHashSet<BlockId> = incoming
                .iter()
                .map(|&(_, b)| b)
                .filter(|b| reachable.contains(b))
                .collect();
            if actual != expected {
                return Err(VerifyError::PhiPredecessorMismatch {
                    function: function(),
                    block: block_name(block),
                    value: func.inst(phi).name.clone(),
                });
            }
        }
    }

    Ok(())
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "tests use unwrap to panic on unexpected state"
)]
