//! Thin wrapper over the external x86 decoder (§4.5.2): turns a code span
//! into a sequence of [`Instruction`]s with operands already classified into
//! the shapes the statement/prologue matchers destructure against.

use zydis::{AddressWidth, MachineMode, Mnemonic, Register, StackWidth};

use crate::result::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegOverride {
    None,
    Fs,
    Gs,
}

#[derive(Debug, Clone, Copy)]
pub struct MemoryOperand {
    pub base: Option<Register>,
    pub index: Option<Register>,
    pub scale: u8,
    pub disp: i64,
    pub size: u16,
    pub segment: SegOverride,
}

#[derive(Debug, Clone, Copy)]
pub enum Operand {
    Register(Register),
    Immediate(i64),
    Memory(MemoryOperand),
    Pointer { segment: u16, offset: u32 },
}

#[derive(Debug, Clone)]
pub struct Instruction {
    pub address: u32,
    pub length: u8,
    pub mnemonic: Mnemonic,
    pub operands: Vec<Operand>,
    pub raw: Vec<u8>,
}

impl Instruction {
    pub fn next_ip(&self) -> u32 {
        self.address + self.length as u32
    }

    /// The single memory operand with a `rip`/base-relative displacement and
    /// no index register, as used by direct-jump-table and `lea` matching.
    pub fn sole_memory_operand(&self) -> Option<&MemoryOperand> {
        match self.operands.as_slice() {
            [Operand::Memory(m)] => Some(m),
            _ => None,
        }
    }
}

/// Decodes 32-bit legacy-mode x86 instructions from a flat byte buffer.
pub struct Decoder {
    inner: zydis::Decoder,
}

impl Decoder {
    pub fn new() -> Result<Self> {
        let inner = zydis::Decoder::new(MachineMode::LEGACY_32, AddressWidth::_32)
            .map_err(|e| Error::DecodeFailed(e.to_string()))?;
        Ok(Self { inner })
    }

    /// Decodes a single instruction starting at `va` within `code`. Returns
    /// `Ok(None)` at end of buffer, matching the caller's linear-scan loop
    /// over a function body (§4.5.2).
    pub fn decode_at(&self, code: &[u8], va: u32) -> Result<Option<Instruction>> {
        if code.is_empty() {
            return Ok(None);
        }
        let decoded = self
            .inner
            .decode_first::<zydis::VisibleOperands>(code)
            .map_err(|e| Error::DecodeFailed(e.to_string()))?;
        let Some((insn, operands)) = decoded else {
            return Ok(None);
        };
        let length = insn.length as u8;
        let raw = code[..length as usize].to_vec();
        let lifted = operands
            .iter()
            .filter(|op| op.visibility != zydis::OperandVisibility::HIDDEN)
            .filter_map(lift_operand)
            .collect();

        Ok(Some(Instruction {
            address: va,
            length,
            mnemonic: insn.mnemonic,
            operands: lifted,
            raw,
        }))
    }
}

fn lift_operand(op: &zydis::DecodedOperand) -> Option<Operand> {
    match op.kind {
        zydis::OperandKind::Register(reg) => Some(Operand::Register(reg)),
        zydis::OperandKind::Immediate(imm) => {
            let value = if imm.is_signed { imm.value as i64 } else { imm.value as i64 };
            Some(Operand::Immediate(value))
        }
        zydis::OperandKind::Memory(mem) => Some(Operand::Memory(MemoryOperand {
            base: non_none_register(mem.base),
            index: non_none_register(mem.index),
            scale: mem.scale,
            disp: mem.disp.displacement,
            size: op.size,
            segment: segment_override(mem.segment),
        })),
        zydis::OperandKind::Pointer(ptr) => Some(Operand::Pointer {
            segment: ptr.segment,
            offset: ptr.offset,
        }),
        zydis::OperandKind::Unused => None,
    }
}

fn non_none_register(reg: Register) -> Option<Register> {
    (reg != Register::NONE).then_some(reg)
}

fn segment_override(reg: Register) -> SegOverride {
    match reg {
        Register::FS => SegOverride::Fs,
        Register::GS => SegOverride::Gs,
        _ => SegOverride::None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_push_ebp() {
        let decoder = Decoder::new().unwrap();
        let insn = decoder.decode_at(&[0x55], 0x1000).unwrap().unwrap();
        assert_eq!(insn.mnemonic, Mnemonic::PUSH);
        assert_eq!(insn.length, 1);
        assert_eq!(insn.next_ip(), 0x1001);
    }

    #[test]
    fn empty_buffer_yields_none() {
        let decoder = Decoder::new().unwrap();
        assert!(decoder.decode_at(&[], 0x1000).unwrap().is_none());
    }
}
