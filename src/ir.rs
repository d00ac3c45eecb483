//! Per-block symbolic lifting (§4.5.5-4.5.6): a tiny abstract machine tracks
//! the expression last written to each register, the pending call, and the
//! flag-setting instruction, turning a flat `Instruction` stream into IR
//! nodes the statement matcher can destructure.

use std::collections::HashMap;

use zydis::{Mnemonic, Register};

use crate::scope::Scope;
use crate::x86::{Instruction, MemoryOperand, Operand, SegOverride};

#[derive(Debug, Clone)]
pub enum Expr {
    Reg(Register),
    Const(i64),
    LocalVar { size: u16, bp_disp: i32 },
    MemBaseDisp {
        size: u16,
        base: Option<Register>,
        disp: i64,
        seg: SegOverride,
    },
    MemIndexed {
        size: u16,
        base: Option<Register>,
        index: Register,
        scale: u8,
        disp: i64,
    },
    SegOverride(SegOverride, Box<Expr>),
    FunctionRef(u32),
    BasicBlockRef(u32),
    SignExtend(u16, Box<Expr>),
    ZeroExtend(u16, Box<Expr>),
    Lea(Box<Expr>),
    UnaryOp(&'static str, Box<Expr>),
    BinaryOp(&'static str, Box<Expr>, Box<Expr>),
    Pushed(Box<Expr>),
    Call(Box<CallExpr>),
}

#[derive(Debug, Clone)]
pub struct CallExpr {
    pub target: Expr,
    pub args: Vec<Expr>,
    pub this_expr: Option<Expr>,
    /// Stack bytes the callee pops, once known from its calling convention;
    /// filled in lazily when the matching `add esp, k` is observed (§4.5.5).
    pub adjust: Option<u32>,
}

/// Recovered branch condition (§4.5.6). `ErrorCond` is the deliberate
/// fallback for flag sources this toolchain doesn't model.
#[derive(Debug, Clone)]
pub enum Cond {
    Eq(Expr, Expr),
    Ne(Expr, Expr),
    Gt(Expr, Expr),
    Ge(Expr, Expr),
    Lt(Expr, Expr),
    Le(Expr, Expr),
    IsZero(Expr),
    IsNonZero(Expr),
    BitsClear(Expr, Expr),
    BitsSet(Expr, Expr),
    Negative(Expr),
    ErrorCond(Mnemonic),
}

impl Cond {
    pub fn negate(&self) -> Cond {
        match self {
            Cond::Eq(a, b) => Cond::Ne(a.clone(), b.clone()),
            Cond::Ne(a, b) => Cond::Eq(a.clone(), b.clone()),
            Cond::Gt(a, b) => Cond::Le(a.clone(), b.clone()),
            Cond::Ge(a, b) => Cond::Lt(a.clone(), b.clone()),
            Cond::Lt(a, b) => Cond::Ge(a.clone(), b.clone()),
            Cond::Le(a, b) => Cond::Gt(a.clone(), b.clone()),
            Cond::IsZero(e) => Cond::IsNonZero(e.clone()),
            Cond::IsNonZero(e) => Cond::IsZero(e.clone()),
            Cond::BitsClear(a, b) => Cond::BitsSet(a.clone(), b.clone()),
            Cond::BitsSet(a, b) => Cond::BitsClear(a.clone(), b.clone()),
            Cond::Negative(e) => Cond::IsZero(e.clone()), // approximate: `>= 0`
            Cond::ErrorCond(m) => Cond::ErrorCond(*m),
        }
    }
}

#[derive(Debug, Clone)]
pub struct IrInstr {
    pub address: u32,
    pub mnemonic: Mnemonic,
    pub operands: Vec<Operand>,
    pub result: Option<Expr>,
    pub raw: Instruction,
}

/// The CPU state threaded across a block's instructions during lifting.
#[derive(Debug, Default)]
pub struct State {
    pub reg: HashMap<Register, Expr>,
    pub flags: Option<IrInstr>,
    pub stack: Vec<Expr>,
    pub call: Option<CallExpr>,
}

impl State {
    pub fn new() -> Self {
        Self::default()
    }

    fn reg_expr(&self, reg: Register) -> Expr {
        self.reg.get(&reg).cloned().unwrap_or(Expr::Reg(reg))
    }

    fn set_reg(&mut self, reg: Register, expr: Expr) {
        self.reg.insert(reg, expr);
    }

    fn operand_to_expr(&self, operand: &Operand, scope: &Scope) -> Expr {
        match operand {
            Operand::Register(r) => self.reg_expr(*r),
            Operand::Immediate(v) => Expr::Const(*v),
            Operand::Pointer { segment, offset } => {
                let _ = segment;
                Expr::FunctionRef(*offset)
            }
            Operand::Memory(mem) => mem_to_expr(mem, scope),
        }
    }

    /// Lifts one instruction, updating register/stack/call/flags state per
    /// the write-mapping table (§4.5.5).
    pub fn lift(&mut self, insn: &Instruction, scope: &Scope) -> IrInstr {
        let operands = insn.operands.clone();
        let result = self.apply(insn, scope);
        let lifted = IrInstr {
            address: insn.address,
            mnemonic: insn.mnemonic,
            operands,
            result,
            raw: insn.clone(),
        };
        if is_flag_modifying(insn.mnemonic) {
            self.flags = Some(lifted.clone());
        }
        lifted
    }

    fn apply(&mut self, insn: &Instruction, scope: &Scope) -> Option<Expr> {
        use Mnemonic::*;
        let ops = &insn.operands;
        match insn.mnemonic {
            MOV => {
                let (dst, src) = (ops.first()?, ops.get(1)?);
                let value = self.operand_to_expr(src, scope);
                self.write_result(dst, value.clone(), scope);
                Some(value)
            }
            MOVSX | MOVSXD => {
                let (dst, src) = (ops.first()?, ops.get(1)?);
                let size = operand_size(dst);
                let value = Expr::SignExtend(size, Box::new(self.operand_to_expr(src, scope)));
                self.write_result(dst, value.clone(), scope);
                Some(value)
            }
            MOVZX => {
                let (dst, src) = (ops.first()?, ops.get(1)?);
                let size = operand_size(dst);
                let value = Expr::ZeroExtend(size, Box::new(self.operand_to_expr(src, scope)));
                self.write_result(dst, value.clone(), scope);
                Some(value)
            }
            LEA => {
                let (dst, src) = (ops.first()?, ops.get(1)?);
                let value = Expr::Lea(Box::new(self.operand_to_expr(src, scope)));
                self.write_result(dst, value.clone(), scope);
                Some(value)
            }
            XOR => {
                let (dst, src) = (ops.first()?, ops.get(1)?);
                if dst_equals_src(dst, src) {
                    let value = Expr::Const(0);
                    self.write_result(dst, value.clone(), scope);
                    return Some(value);
                }
                self.binary_op("^", dst, src, scope)
            }
            ADD => self.binary_op("+", ops.first()?, ops.get(1)?, scope),
            SUB => self.binary_op("-", ops.first()?, ops.get(1)?, scope),
            AND => self.binary_op("&", ops.first()?, ops.get(1)?, scope),
            OR => self.binary_op("|", ops.first()?, ops.get(1)?, scope),
            IMUL | MUL if ops.len() >= 2 => self.binary_op("*", &ops[0], &ops[1], scope),
            CMP | TEST => None,
            INC => self.unary_op("++", ops.first()?, scope),
            DEC => self.unary_op("--", ops.first()?, scope),
            NOT => self.unary_op("~", ops.first()?, scope),
            NEG => self.unary_op("-", ops.first()?, scope),
            PUSH => {
                let value = self.operand_to_expr(ops.first()?, scope);
                self.stack.push(Expr::Pushed(Box::new(value.clone())));
                Some(value)
            }
            POP => {
                let dst = ops.first()?;
                let value = self.stack.pop().unwrap_or(Expr::Const(0));
                self.write_result(dst, value.clone(), scope);
                Some(value)
            }
            CALL => {
                let target = self.operand_to_expr(ops.first()?, scope);
                let args = self.stack.drain(..).collect();
                let this_expr = self.reg.get(&Register::ECX).cloned();
                let call = CallExpr {
                    target,
                    args,
                    this_expr,
                    adjust: None,
                };
                self.reg.clear();
                self.call = Some(call.clone());
                let result = Expr::Call(Box::new(call));
                self.set_reg(Register::EAX, result.clone());
                Some(result)
            }
            RET => None,
            _ => None,
        }
    }

    fn write_result(&mut self, dst: &Operand, value: Expr, scope: &Scope) {
        match dst {
            Operand::Register(r) => self.set_reg(*r, value),
            Operand::Memory(m) => {
                let _ = mem_to_expr(m, scope);
            }
            _ => {}
        }
    }

    fn binary_op(&mut self, op: &'static str, dst: &Operand, src: &Operand, scope: &Scope) -> Option<Expr> {
        let before = self.operand_to_expr(dst, scope);
        let rhs = self.operand_to_expr(src, scope);
        let value = Expr::BinaryOp(op, Box::new(before), Box::new(rhs));
        self.write_result(dst, value.clone(), scope);
        Some(value)
    }

    fn unary_op(&mut self, op: &'static str, dst: &Operand, scope: &Scope) -> Option<Expr> {
        let before = self.operand_to_expr(dst, scope);
        let value = Expr::UnaryOp(op, Box::new(before));
        self.write_result(dst, value.clone(), scope);
        Some(value)
    }

    /// Recovers the caller-cleanup adjustment on `add esp, k` matching a
    /// pending call's callee-pop amount (§4.5.5): marks the call as having
    /// its stack already balanced rather than emitting a separate statement.
    pub fn note_caller_cleanup(&mut self, amount: u32) -> bool {
        match &mut self.call {
            Some(call) if call.adjust.is_none() => {
                call.adjust = Some(amount);
                true
            }
            _ => false,
        }
    }
}

fn is_flag_modifying(mnemonic: Mnemonic) -> bool {
    use Mnemonic::*;
    matches!(
        mnemonic,
        CMP | TEST | ADD | SUB | AND | OR | XOR | INC | DEC | NEG | SHL | SHR | SAR
    )
}

fn dst_equals_src(dst: &Operand, src: &Operand) -> bool {
    matches!((dst, src), (Operand::Register(a), Operand::Register(b)) if a == b)
}

fn operand_size(operand: &Operand) -> u16 {
    match operand {
        Operand::Memory(m) => m.size,
        Operand::Register(Register::EAX | Register::ECX | Register::EDX | Register::EBX) => 32,
        Operand::Register(_) => 16,
        Operand::Immediate(_) | Operand::Pointer { .. } => 32,
    }
}

pub(crate) fn mem_to_expr(mem: &MemoryOperand, scope: &Scope) -> Expr {
    if mem.base == Some(Register::EBP) && mem.index.is_none() {
        if scope.frame.find_point(frame_key(mem.disp as i32)).is_some() {
            return Expr::LocalVar {
                size: mem.size,
                bp_disp: mem.disp as i32,
            };
        }
    }
    match mem.index {
        Some(index) => Expr::MemIndexed {
            size: mem.size,
            base: mem.base,
            index,
            scale: mem.scale,
            disp: mem.disp,
        },
        None => Expr::MemBaseDisp {
            size: mem.size,
            base: mem.base,
            disp: mem.disp,
            seg: mem.segment,
        },
    }
}

fn frame_key(offset: i32) -> u32 {
    (offset as i64 - i32::MIN as i64) as u32
}

/// Recovers the branch condition for a conditional jump, given the most
/// recent flag-setting instruction (§4.5.6).
pub fn recover_condition(flags_source: Option<&IrInstr>, branch: Mnemonic, scope: &Scope) -> Cond {
    use Mnemonic::*;
    let Some(src) = flags_source else {
        return Cond::ErrorCond(branch);
    };
    let a = src.operands.first().map(|o| basic_expr(o, scope));
    let b = src.operands.get(1).map(|o| basic_expr(o, scope));

    match (src.mnemonic, a, b) {
        (CMP, Some(a), Some(b)) => match branch {
            JZ => Cond::Eq(a, b),
            JNZ => Cond::Ne(a, b),
            JNBE | JNLE => Cond::Gt(a, b),
            JNB | JNL => Cond::Ge(a, b),
            JB | JL => Cond::Lt(a, b),
            JBE | JLE => Cond::Le(a, b),
            _ => Cond::ErrorCond(branch),
        },
        (TEST, Some(a), Some(b)) => {
            let same = matches!((&a, &b), (Expr::Reg(x), Expr::Reg(y)) if x == y);
            match (same, branch) {
                (true, JZ) => Cond::IsZero(a),
                (true, JNZ) => Cond::IsNonZero(a),
                (false, JZ) => Cond::BitsClear(a, b),
                (false, JNZ) => Cond::BitsSet(a, b),
                _ => Cond::ErrorCond(branch),
            }
        }
        (DEC, _, _) if branch == JS => Cond::Negative(a.unwrap_or(Expr::Const(0))),
        _ => Cond::ErrorCond(branch),
    }
}

fn basic_expr(op: &Operand, scope: &Scope) -> Expr {
    match op {
        Operand::Register(r) => Expr::Reg(*r),
        Operand::Immediate(v) => Expr::Const(*v),
        Operand::Memory(m) => mem_to_expr(m, scope),
        Operand::Pointer { offset, .. } => Expr::FunctionRef(*offset),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ops::Range;

    fn empty_scope() -> Scope {
        Scope {
            code_range: Range { start: 0, end: 0 },
            ..Scope::default()
        }
    }

    #[test]
    fn xor_self_lifts_to_zero_constant() {
        let mut state = State::new();
        let scope = empty_scope();
        let insn = Instruction {
            address: 0,
            length: 2,
            mnemonic: Mnemonic::XOR,
            operands: vec![Operand::Register(Register::EAX), Operand::Register(Register::EAX)],
            raw: vec![0x31, 0xC0],
        };
        let lifted = state.lift(&insn, &scope);
        assert!(matches!(lifted.result, Some(Expr::Const(0))));
        assert!(matches!(state.reg[&Register::EAX], Expr::Const(0)));
    }

    #[test]
    fn cmp_then_je_recovers_equality() {
        let scope = empty_scope();
        let cmp = IrInstr {
            address: 0,
            mnemonic: Mnemonic::CMP,
            operands: vec![Operand::Register(Register::EAX), Operand::Immediate(0)],
            result: None,
            raw: Instruction {
                address: 0,
                length: 3,
                mnemonic: Mnemonic::CMP,
                operands: vec![],
                raw: vec![],
            },
        };
        let cond = recover_condition(Some(&cmp), Mnemonic::JZ, &scope);
        assert!(matches!(cond, Cond::Eq(Expr::Reg(Register::EAX), Expr::Const(0))));
    }
}
