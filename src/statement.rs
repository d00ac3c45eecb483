//! Statement and control-flow recovery (§4.6): tail-pattern matching inside a
//! basic block, "return landing" block matching (including the deliberately
//! non-recursive ternary resolution), and loop-shape classification over
//! back-edges.

use std::collections::{BTreeSet, HashMap, VecDeque};

use zydis::{Mnemonic, Register};

use crate::controlflow::{BasicBlock, ControlFlow, Edge};
use crate::ir::{self, Cond, Expr, IrInstr};
use crate::scope::Scope;
use crate::x86::Operand;

#[derive(Debug, Clone)]
pub enum Statement {
    Assign(Expr, Expr),
    Modify(&'static str, Expr, Expr),
    Increment(Expr),
    Decrement(Expr),
    ExprStatement(Expr),
    Jump(u32),
}

/// Result of matching a block's tail against the statement grammar (§4.6.1).
#[derive(Debug)]
pub struct MatchedBlock {
    pub statements: Vec<Statement>,
    /// `true` when every instruction in the block was accounted for by the
    /// matched statements; `false` forces a raw `__asm` fallback for the
    /// whole block.
    pub fully_matched: bool,
}

fn is_side_effect_free(mnemonic: Mnemonic) -> bool {
    matches!(mnemonic, Mnemonic::NOP | Mnemonic::FNOP)
}

/// Consumes instructions from the tail of a block, matching the statement
/// grammar in §4.6.1. Unmatched leading instructions (other than side-effect
/// free ones) cause the whole block to fall back to inline assembly.
pub fn match_block(block: &BasicBlock, scope: &Scope) -> MatchedBlock {
    let mut trailing_jump = None;
    let mut consumed: BTreeSet<u32> = BTreeSet::new();
    let mut tail: Vec<&IrInstr> = block.instructions.iter().collect();

    if let Some(last) = tail.last() {
        if last.mnemonic == Mnemonic::JMP {
            if let Some(Operand::Immediate(_)) = last.operands.first() {
                trailing_jump = Some(Statement::Jump(last.raw.next_ip()));
                consumed.insert(last.address);
                tail.pop();
            }
        }
    }

    let mut reversed = Vec::new();
    while let Some(insn) = tail.last() {
        let stmt = match insn.mnemonic {
            Mnemonic::MOV => {
                let (dst, src) = (insn.operands.first(), insn.operands.get(1));
                match (dst, &insn.result) {
                    (Some(Operand::Memory(_)), Some(value)) => {
                        Some(Statement::Assign(mem_expr(insn, scope), value.clone()))
                    }
                    _ => {
                        let _ = src;
                        None
                    }
                }
            }
            Mnemonic::ADD if matches!(insn.operands.first(), Some(Operand::Memory(_))) => {
                insn.result.clone().map(|v| Statement::Modify("+", mem_expr(insn, scope), v))
            }
            Mnemonic::SUB if matches!(insn.operands.first(), Some(Operand::Memory(_))) => {
                insn.result.clone().map(|v| Statement::Modify("-", mem_expr(insn, scope), v))
            }
            Mnemonic::INC if matches!(insn.operands.first(), Some(Operand::Memory(_))) => {
                Some(Statement::Increment(mem_expr(insn, scope)))
            }
            Mnemonic::DEC if matches!(insn.operands.first(), Some(Operand::Memory(_))) => {
                Some(Statement::Decrement(mem_expr(insn, scope)))
            }
            Mnemonic::CALL => insn.result.clone().map(Statement::ExprStatement),
            Mnemonic::ADD if matches!(insn.operands.first(), Some(Operand::Register(Register::ESP))) => {
                // Caller cleanup already folded into the call's adjust; drop.
                consumed.insert(insn.address);
                tail.pop();
                continue;
            }
            _ => None,
        };

        match stmt {
            Some(stmt) => {
                consumed.insert(insn.address);
                reversed.push(stmt);
                tail.pop();
            }
            None => break,
        }
    }

    let mut statements: Vec<Statement> = reversed.into_iter().rev().collect();
    statements.extend(trailing_jump);

    let fully_matched = block
        .instructions
        .iter()
        .all(|i| consumed.contains(&i.address) || is_side_effect_free(i.mnemonic));

    MatchedBlock {
        statements,
        fully_matched,
    }
}

fn mem_expr(insn: &IrInstr, scope: &Scope) -> Expr {
    match insn.operands.first() {
        Some(Operand::Memory(m)) => ir::mem_to_expr(m, scope),
        _ => Expr::Const(0),
    }
}

#[derive(Debug, Clone)]
pub enum ReturnKind {
    Void,
    Value(Expr),
    Ternary { cond: Cond, then_expr: Expr, else_expr: Expr },
}

/// Matches the return-landing block (§4.6.2). `landing` is the block whose
/// only successor is the function's single `ret`. Returns the recovered
/// kind plus the set of predecessor blocks that were inlined into it.
pub fn match_return(cf: &ControlFlow, landing: u32, is_void: bool) -> (ReturnKind, BTreeSet<u32>) {
    let mut inlined = BTreeSet::new();
    let Some(block) = cf.blocks.get(&landing) else {
        return (ReturnKind::Value(Expr::Reg(Register::EAX)), inlined);
    };

    if is_void {
        return (ReturnKind::Void, inlined);
    }

    match block.incoming.as_slice() {
        // One predecessor: either it sets the accumulator directly (`xor
        // eax, eax; jmp landing`, `lea eax, [...]; jmp landing`), or it is
        // itself one arm of a ternary whose sibling hangs off the same
        // conditional ancestor.
        [pred] => {
            if let Some(pred_block) = cf.blocks.get(pred) {
                if let Some(value) = accumulator_value(pred_block) {
                    return (ReturnKind::Value(value), inlined);
                }
                if let Some(&cond_pred) = pred_block.fallfrom.first() {
                    if let Some((cond, then_expr, else_expr, then_target, else_target)) = ternary_from_cond(cf, cond_pred) {
                        inlined.insert(then_target);
                        inlined.insert(else_target);
                        return (ReturnKind::Ternary { cond, then_expr, else_expr }, inlined);
                    }
                }
            }
        }
        // Two predecessors: the common diamond shape, where both arms of a
        // conditional merge directly into the return block.
        [a, b] => {
            let candidates: Vec<u32> = cf
                .blocks
                .get(a)
                .into_iter()
                .chain(cf.blocks.get(b))
                .flat_map(|blk| blk.fallfrom.iter().copied())
                .collect();
            for cond_pred in candidates {
                if let Some((cond, then_expr, else_expr, then_target, else_target)) = ternary_from_cond(cf, cond_pred) {
                    let arms: BTreeSet<u32> = [then_target, else_target].into_iter().collect();
                    let landing_preds: BTreeSet<u32> = [*a, *b].into_iter().collect();
                    if arms == landing_preds {
                        inlined.insert(then_target);
                        inlined.insert(else_target);
                        return (ReturnKind::Ternary { cond, then_expr, else_expr }, inlined);
                    }
                }
            }
        }
        _ => {}
    }

    (ReturnKind::Value(Expr::Reg(Register::EAX)), inlined)
}

/// Reads `cond_pred` as the head of a two-armed return ternary (§4.6.2),
/// returning the condition and the value each arm assigns the accumulator,
/// oriented so `then_expr` is the arm taken when `cond` holds. Declines
/// (`None`) when the taken arm is itself another conditional head, rather
/// than recursing into a nested ternary.
fn ternary_from_cond(cf: &ControlFlow, cond_pred: u32) -> Option<(Cond, Expr, Expr, u32, u32)> {
    let cond_block = cf.blocks.get(&cond_pred)?;
    let (cond, fallthrough_target, taken_target) = conditional_tail(cond_block)?;
    if is_ternary_head(cf, &taken_target) {
        return None;
    }
    let fallthrough_expr = cf.blocks.get(&fallthrough_target).and_then(accumulator_value)?;
    let taken_expr = cf.blocks.get(&taken_target).and_then(accumulator_value)?;
    Some((cond, taken_expr, fallthrough_expr, taken_target, fallthrough_target))
}

fn accumulator_value(block: &BasicBlock) -> Option<Expr> {
    block.instructions.iter().rev().find_map(|i| match i.mnemonic {
        Mnemonic::XOR => matches!(i.result, Some(Expr::Const(0))).then(|| Expr::Const(0)),
        Mnemonic::LEA => i.result.clone(),
        Mnemonic::MOV => matches!(i.operands.first(), Some(Operand::Register(Register::EAX))).then(|| i.result.clone()).flatten(),
        _ => None,
    })
}

fn conditional_tail(block: &BasicBlock) -> Option<(Cond, u32, u32)> {
    let Edge::Conditional { target, cond } = block.outgoing.iter().find(|e| matches!(e, Edge::Conditional { .. }))? else {
        return None;
    };
    let fallthrough = block.fallthrough?;
    Some((cond.clone(), fallthrough, *target))
}

fn is_ternary_head(cf: &ControlFlow, block: u32) -> bool {
    cf.blocks
        .get(&block)
        .map(|b| matches!(b.outgoing.iter().find(|e| matches!(e, Edge::Conditional { .. })), Some(_)))
        .unwrap_or(false)
}

#[derive(Debug, Clone)]
pub enum Loop {
    While { head: u32, cond: Cond, body: Vec<u32> },
    DoWhile { head: u32, cond: Cond, body: Vec<u32> },
    For { head: u32, init: Option<Statement>, cond: Cond, step: Option<Statement>, body: Vec<u32> },
    Infinite { head: u32, body: Vec<u32> },
}

/// Visits blocks in a priority order that respects `incoming`/`fallfrom`
/// predecessors, classifying each discovered back-edge (§4.6.3).
pub fn find_loops(cf: &ControlFlow, scope: &Scope) -> Vec<Loop> {
    let mut visited: HashMap<u32, usize> = HashMap::new();
    let mut order = 0usize;
    let mut ready: VecDeque<u32> = cf.blocks.keys().copied().collect();
    let mut back_edges: Vec<(u32, u32)> = Vec::new();

    while let Some(start) = ready.front().copied() {
        if visited.contains_key(&start) {
            ready.pop_front();
            continue;
        }
        let predecessors_done = cf
            .blocks
            .get(&start)
            .map(|b| b.incoming.iter().all(|p| visited.contains_key(p) || *p >= start))
            .unwrap_or(true);
        if !predecessors_done && ready.len() > 1 {
            ready.rotate_left(1);
            continue;
        }
        ready.pop_front();
        visited.insert(start, order);
        order += 1;

        if let Some(block) = cf.blocks.get(&start) {
            for edge in &block.outgoing {
                let target = match edge {
                    Edge::Internal(t) | Edge::Conditional { target: t, .. } => *t,
                    Edge::External(_) => continue,
                };
                if let Some(&target_order) = visited.get(&target) {
                    if target <= start && target_order <= order {
                        back_edges.push((start, target));
                    }
                }
            }
        }
    }

    back_edges
        .into_iter()
        .map(|(end, head)| classify_loop(cf, head, end, scope))
        .collect()
}

fn conditional_edge(block: Option<&BasicBlock>) -> Option<(u32, Cond)> {
    block.and_then(|b| {
        b.outgoing.iter().find_map(|e| match e {
            Edge::Conditional { target, cond } => Some((*target, cond.clone())),
            _ => None,
        })
    })
}

fn classify_loop(cf: &ControlFlow, head: u32, end: u32, scope: &Scope) -> Loop {
    let body: Vec<u32> = cf.blocks.keys().filter(|&&b| b >= head && b <= end).copied().collect();
    let head_block = cf.blocks.get(&head);
    let end_block = cf.blocks.get(&end);

    // The head's *conditional branch target*, not its fallthrough: a while
    // loop's head jumps past the back-edge block when its condition fails,
    // landing exactly on `loop_end.after` (`examples/original_source/controlflow.py`'s
    // `loop_head.outgoing == loop_end.after`).
    let head_branch = conditional_edge(head_block);
    let end_branch = conditional_edge(end_block);
    let end_conditional = end_branch.is_some();
    let head_targets_loop_end = match (&head_branch, end_block) {
        (Some((target, _)), Some(end_block)) => *target == end_block.end,
        _ => false,
    };

    if head_targets_loop_end && !end_conditional {
        let (_, cond) = head_branch.unwrap();
        return Loop::While { head, cond: cond.negate(), body };
    }
    if let Some((_, cond)) = end_branch {
        return Loop::DoWhile { head, cond, body };
    }
    let initializer = cf.blocks.values().find(|b| b.fallthrough == Some(head) && b.start < head);
    if let (Some(initializer), Some((_, cond))) = (initializer, &head_branch) {
        let init = match_block(initializer, scope).statements.pop();
        let step = end_block.map(|b| match_block(b, scope)).and_then(|m| m.statements.into_iter().last());
        return Loop::For {
            head,
            init,
            cond: cond.negate(),
            step,
            body,
        };
    }
    Loop::Infinite { head, body }
}
