//! Label collection and basic-block discovery (§4.5.1-4.5.3): a linear scan
//! over the decoded instruction stream that partitions a function body into
//! blocks with their incoming/outgoing edges, plus prologue/epilogue
//! matching on the first and last block.

use std::collections::{BTreeMap, BTreeSet};

use zydis::{Mnemonic, Register};

use crate::codeview::symbols::SymbolRecord;
use crate::ir::{self, Cond, IrInstr, State};
use crate::result::Result;
use crate::scope::Scope;
use crate::x86::{Decoder, Instruction, Operand};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackAdjust {
    Fixed(u32),
    /// `call __chkstk` in the prologue: the reserved size isn't a literal
    /// immediate the matcher can read off (§9 Open Questions).
    Dynamic,
}

#[derive(Debug, Clone)]
pub struct Prolog {
    pub line: u32,
    pub stack_adjust: StackAdjust,
    pub this_local: Option<i32>,
    pub cleanup_fn: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct Epilog {
    pub line: u32,
    pub stack_adjust: u32,
}

#[derive(Debug, Clone)]
pub enum Edge {
    Internal(u32),
    External(u32),
    Conditional { target: u32, cond: Cond },
}

#[derive(Debug, Clone, Default)]
pub struct BasicBlock {
    pub start: u32,
    pub end: u32,
    pub instructions: Vec<IrInstr>,
    pub incoming: Vec<u32>,
    pub outgoing: Vec<Edge>,
    pub fallthrough: Option<u32>,
    pub fallfrom: Vec<u32>,
}

#[derive(Debug, Clone)]
pub struct SwitchPointers {
    pub target: u32,
    pub upper_bound: u32,
    pub entries: Vec<u32>,
    /// Byte-indexed case table immediately following the pointer table, when
    /// a `SwitchTable` label was registered there (§4.5.1-4.5.2).
    pub table_data: Option<Vec<u8>>,
}

#[derive(Debug, Default)]
pub struct ControlFlow {
    pub blocks: BTreeMap<u32, BasicBlock>,
    pub switch_tables: Vec<SwitchPointers>,
    pub labels: BTreeMap<u32, String>,
}

/// A user-visible label recovered from a function's CodeView children,
/// distinct from the `_T<offset>` labels `discover` synthesizes for branch
/// targets it finds on its own (§4.5.1).
#[derive(Debug, Clone)]
pub enum UserLabel {
    Named(String),
    /// A local-data child with nil type and empty name: the byte-indexed
    /// case table a compiler emits right after a jump-table's pointer array.
    SwitchTable,
}

/// Walks a function's CodeView children, collecting user labels with `$`
/// rewritten to `_` (§4.5.1). Line-table entries and block start/end markers
/// are left to the caller, which already has the module's C13 line program
/// and scope tree.
pub fn collect_labels(records: &[SymbolRecord]) -> BTreeMap<u32, UserLabel> {
    let mut labels = BTreeMap::new();
    for record in records {
        match record {
            SymbolRecord::Label { code_offset, name, .. } => {
                labels.insert(code_offset.offset, UserLabel::Named(name.as_ref().replace('$', "_")));
            }
            SymbolRecord::Data(data) if data.name.as_ref().is_empty() => {
                labels.insert(data.offset.offset, UserLabel::SwitchTable);
            }
            _ => {}
        }
    }
    labels
}

/// Decodes `code` (mapped at `base_va`) into basic blocks with edges, and
/// recovers any jump-table switches encountered along the way (§4.5.2).
pub fn discover(
    code: &[u8],
    base_va: u32,
    decoder: &Decoder,
    scope: &Scope,
    user_labels: &BTreeMap<u32, UserLabel>,
) -> Result<ControlFlow> {
    let end_va = base_va + code.len() as u32;
    let mut instructions: Vec<Instruction> = Vec::new();
    let mut internal_targets: BTreeSet<u32> = BTreeSet::new();
    let mut no_fallthrough: BTreeSet<u32> = BTreeSet::new();
    let mut switch_tables = Vec::new();
    let mut cursor = base_va;

    let mut named_labels: BTreeMap<u32, String> = BTreeMap::new();
    let mut switch_table_offsets: BTreeSet<u32> = BTreeSet::new();
    for (&offset, label) in user_labels {
        match label {
            UserLabel::Named(name) => {
                named_labels.insert(offset, name.clone());
            }
            UserLabel::SwitchTable => {
                switch_table_offsets.insert(offset);
            }
        }
    }

    while cursor < end_va {
        let slice = &code[(cursor - base_va) as usize..];
        let Some(insn) = decoder.decode_at(slice, cursor)? else {
            break;
        };

        match insn.mnemonic {
            Mnemonic::JMP => {
                if let Some(mem) = insn.sole_memory_operand() {
                    if let Some(table) =
                        try_jump_table(mem, insn.next_ip(), end_va, code, base_va, &switch_table_offsets)
                    {
                        for &addr in &table.entries {
                            if addr >= base_va && addr < end_va {
                                internal_targets.insert(addr);
                            }
                        }
                        switch_tables.push(table);
                        instructions.push(insn);
                        cursor += instructions.last().unwrap().length as u32;
                        continue;
                    }
                }
                if let Some(target) = direct_branch_target(&insn) {
                    internal_targets.insert(target);
                }
                no_fallthrough.insert(insn.next_ip());
            }
            m if is_conditional_branch(m) => {
                if let Some(target) = direct_branch_target(&insn) {
                    internal_targets.insert(target);
                }
                internal_targets.insert(insn.next_ip());
            }
            Mnemonic::RET | Mnemonic::RETF => {
                no_fallthrough.insert(insn.next_ip());
            }
            _ => {}
        }

        cursor = insn.next_ip();
        instructions.push(insn);
    }

    let mut labels: BTreeMap<u32, String> = named_labels;
    for &target in &internal_targets {
        labels.entry(target).or_insert_with(|| format!("_T{target:08x}"));
    }

    let mut boundaries: BTreeSet<u32> = labels.keys().copied().collect();
    boundaries.insert(base_va);
    let boundary_list: Vec<u32> = boundaries.into_iter().collect();

    let mut blocks = BTreeMap::new();
    for (idx, &start) in boundary_list.iter().enumerate() {
        let block_end = boundary_list.get(idx + 1).copied().unwrap_or(end_va);
        let block_insns: Vec<Instruction> = instructions
            .iter()
            .filter(|i| i.address >= start && i.address < block_end)
            .cloned()
            .collect();

        let mut state = State::new();
        let mut lifted = Vec::new();
        for insn in &block_insns {
            lifted.push(state.lift(insn, scope));
        }

        let mut outgoing = Vec::new();
        let mut fallthrough = None;
        if let Some(last) = block_insns.last() {
            match last.mnemonic {
                Mnemonic::JMP => {
                    if let Some(target) = direct_branch_target(last) {
                        outgoing.push(edge_for(target, base_va, end_va));
                    }
                }
                m if is_conditional_branch(m) => {
                    if let Some(target) = direct_branch_target(last) {
                        let cond = ir::recover_condition(state.flags.as_ref(), m, scope);
                        outgoing.push(Edge::Conditional { target, cond });
                    }
                    fallthrough = Some(last.next_ip());
                    outgoing.push(Edge::Internal(last.next_ip()));
                }
                Mnemonic::RET | Mnemonic::RETF => {}
                _ if !no_fallthrough.contains(&block_end) && block_end < end_va => {
                    fallthrough = Some(block_end);
                    outgoing.push(Edge::Internal(block_end));
                }
                _ => {}
            }
        }

        blocks.insert(
            start,
            BasicBlock {
                start,
                end: block_end,
                instructions: lifted,
                incoming: Vec::new(),
                outgoing,
                fallthrough,
                fallfrom: Vec::new(),
            },
        );
    }

    // Wire up incoming/fallfrom from each block's outgoing edges.
    let edges: Vec<(u32, Edge)> = blocks
        .values()
        .flat_map(|b| b.outgoing.iter().map(move |e| (b.start, e.clone())))
        .collect();
    for (from, edge) in edges {
        let (target, is_fallthrough) = match &edge {
            Edge::Internal(t) => (*t, true),
            Edge::Conditional { target, .. } => (*target, false),
            Edge::External(_) => continue,
        };
        if let Some(block) = blocks.get_mut(&target) {
            block.incoming.push(from);
            if is_fallthrough {
                block.fallfrom.push(from);
            }
        }
    }

    Ok(ControlFlow {
        blocks,
        switch_tables,
        labels,
    })
}

fn edge_for(target: u32, base_va: u32, end_va: u32) -> Edge {
    if target >= base_va && target < end_va {
        Edge::Internal(target)
    } else {
        Edge::External(target)
    }
}

fn is_conditional_branch(m: Mnemonic) -> bool {
    use Mnemonic::*;
    matches!(
        m,
        JZ | JNZ | JNBE | JNB | JB | JBE | JNLE | JNL | JL | JLE | JS | JNS | JO | JNO | JP | JNP | JCXZ | JECXZ
    )
}

fn direct_branch_target(insn: &Instruction) -> Option<u32> {
    match insn.operands.first()? {
        Operand::Immediate(rel) => Some((insn.next_ip() as i64 + rel) as u32),
        Operand::Pointer { offset, .. } => Some(*offset),
        _ => None,
    }
}

/// Recognizes `jmp [index*4 + table]` jump-table dispatch and reads the
/// pointer table until a value falls outside the function, shrinking the
/// upper bound as each entry is parsed so a later entry can't claim bytes a
/// smaller entry already proved belong to the next thing in memory (§4.5.2,
/// mirroring `SwitchPointers.__init__`'s `if t < end: end = t`). When a
/// `SwitchTable` label was registered right after the pointer table, the
/// trailing byte-indexed case table is read too.
fn try_jump_table(
    mem: &crate::x86::MemoryOperand,
    after_jmp: u32,
    func_end: u32,
    code: &[u8],
    base_va: u32,
    switch_table_offsets: &BTreeSet<u32>,
) -> Option<SwitchPointers> {
    if mem.index.is_none() || mem.scale != 4 || mem.base.is_some() {
        return None;
    }
    let target = u32::try_from(mem.disp).ok()?;
    if target < after_jmp || target >= func_end {
        return None;
    }
    let mut upper_bound = func_end;
    let mut entries = Vec::new();
    let mut offset = (target - base_va) as usize;
    while offset + 4 <= code.len() && (target + entries.len() as u32 * 4) < upper_bound {
        let bytes: [u8; 4] = code[offset..offset + 4].try_into().ok()?;
        let entry = u32::from_le_bytes(bytes);
        if entry < base_va || entry >= func_end {
            break;
        }
        if entry < upper_bound {
            upper_bound = entry;
        }
        entries.push(entry);
        offset += 4;
    }
    if entries.is_empty() {
        return None;
    }
    let table_end = target + entries.len() as u32 * 4;
    let table_data = switch_table_offsets.contains(&table_end).then(|| {
        let mut data = Vec::new();
        let mut offset = (table_end - base_va) as usize;
        while offset < code.len() {
            let b = code[offset];
            if b as usize >= entries.len() {
                break;
            }
            data.push(b);
            offset += 1;
        }
        data
    });
    Some(SwitchPointers {
        target,
        upper_bound: table_end,
        entries,
        table_data,
    })
}

/// Matches the fixed prologue shape on a function's first block (§4.5.3).
/// Non-match returns `None` and leaves the function un-lifted.
pub fn match_prologue(instructions: &[Instruction], line: u32) -> Option<(Prolog, Vec<Instruction>)> {
    let mut idx = 0;
    let next = |i: usize| instructions.get(i);

    if !matches!(next(idx), Some(Instruction { mnemonic: Mnemonic::PUSH, operands, .. }) if matches!(operands.first(), Some(Operand::Register(Register::EBP))))
    {
        return None;
    }
    idx += 1;

    if !matches!(next(idx), Some(i) if i.mnemonic == Mnemonic::MOV
        && matches!(i.operands.first(), Some(Operand::Register(Register::EBP)))
        && matches!(i.operands.get(1), Some(Operand::Register(Register::ESP))))
    {
        return None;
    }
    idx += 1;

    let mut cleanup_fn = None;
    if matches!(next(idx), Some(i) if i.mnemonic == Mnemonic::PUSH
        && matches!(i.operands.first(), Some(Operand::Immediate(-1))))
    {
        if let Some(Instruction { mnemonic: Mnemonic::PUSH, operands, .. }) = next(idx + 1) {
            if let Some(Operand::Pointer { offset, .. }) = operands.first() {
                cleanup_fn = Some(*offset);
            }
        }
        // `push -1; push cleanup; mov eax, fs:[0]; push eax; mov fs:[0], esp; [sub esp, 4]`
        idx += 5;
        if matches!(next(idx), Some(i) if i.mnemonic == Mnemonic::SUB) {
            idx += 1;
        }
    }

    let mut stack_adjust = StackAdjust::Fixed(0);
    let is_sub_esp = matches!(next(idx), Some(i) if i.mnemonic == Mnemonic::SUB
        && matches!(i.operands.first(), Some(Operand::Register(Register::ESP))));
    let is_mov_eax = matches!(next(idx), Some(i) if i.mnemonic == Mnemonic::MOV
        && matches!(i.operands.first(), Some(Operand::Register(Register::EAX))));
    let is_chkstk_call = matches!(next(idx + 1), Some(i) if i.mnemonic == Mnemonic::CALL);

    if is_sub_esp {
        if let Some(Operand::Immediate(n)) = next(idx).unwrap().operands.get(1) {
            stack_adjust = StackAdjust::Fixed(*n as u32);
        }
        idx += 1;
    } else if is_mov_eax && is_chkstk_call {
        stack_adjust = StackAdjust::Dynamic;
        idx += 2;
    }

    for reg in [Register::EBX, Register::ESI, Register::EDI] {
        if matches!(next(idx), Some(i) if i.mnemonic == Mnemonic::PUSH
            && matches!(i.operands.first(), Some(Operand::Register(r)) if *r == reg))
        {
            idx += 1;
        }
    }

    let mut this_local = None;
    if let Some(i) = next(idx) {
        if i.mnemonic == Mnemonic::MOV {
            if let (Some(Operand::Memory(m)), Some(Operand::Register(Register::ECX))) =
                (i.operands.first(), i.operands.get(1))
            {
                if m.base == Some(Register::EBP) {
                    this_local = Some(m.disp as i32);
                    idx += 1;
                }
            }
        }
    }

    Some((
        Prolog {
            line,
            stack_adjust,
            this_local,
            cleanup_fn,
        },
        instructions[idx..].to_vec(),
    ))
}

/// Matches the fixed epilogue shape on a function's final block (§4.5.3).
pub fn match_epilogue(instructions: &[Instruction], line: u32) -> Option<(Vec<Instruction>, Epilog)> {
    let mut tail = instructions.to_vec();
    for reg in [Register::EDI, Register::ESI, Register::EBX] {
        if matches!(tail.last(), Some(i) if i.mnemonic == Mnemonic::POP
            && matches!(i.operands.first(), Some(Operand::Register(r)) if *r == reg))
        {
            tail.pop();
        }
    }
    if matches!(tail.last(), Some(i) if i.mnemonic == Mnemonic::LEAVE) {
        tail.pop();
    }
    let ret = tail.pop()?;
    if !matches!(ret.mnemonic, Mnemonic::RET | Mnemonic::RETF) {
        return None;
    }
    let stack_adjust = match ret.operands.first() {
        Some(Operand::Immediate(n)) => *n as u32,
        _ => 0,
    };
    Some((tail, Epilog { line, stack_adjust }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reg(r: Register) -> Operand {
        Operand::Register(r)
    }

    #[test]
    fn plain_prologue_matches() {
        let instructions = vec![
            Instruction { address: 0, length: 1, mnemonic: Mnemonic::PUSH, operands: vec![reg(Register::EBP)], raw: vec![] },
            Instruction { address: 1, length: 2, mnemonic: Mnemonic::MOV, operands: vec![reg(Register::EBP), reg(Register::ESP)], raw: vec![] },
            Instruction { address: 3, length: 1, mnemonic: Mnemonic::PUSH, operands: vec![reg(Register::EBX)], raw: vec![] },
            Instruction { address: 4, length: 2, mnemonic: Mnemonic::MOV, operands: vec![reg(Register::EAX), Operand::Immediate(1)], raw: vec![] },
        ];
        let (prolog, remaining) = match_prologue(&instructions, 10).unwrap();
        assert_eq!(prolog.stack_adjust, StackAdjust::Fixed(0));
        assert_eq!(remaining.len(), 1);
    }

    #[test]
    fn chkstk_prologue_is_dynamic_adjust() {
        let instructions = vec![
            Instruction { address: 0, length: 1, mnemonic: Mnemonic::PUSH, operands: vec![reg(Register::EBP)], raw: vec![] },
            Instruction { address: 1, length: 2, mnemonic: Mnemonic::MOV, operands: vec![reg(Register::EBP), reg(Register::ESP)], raw: vec![] },
            Instruction { address: 3, length: 5, mnemonic: Mnemonic::MOV, operands: vec![reg(Register::EAX), Operand::Immediate(0x400)], raw: vec![] },
            Instruction { address: 8, length: 5, mnemonic: Mnemonic::CALL, operands: vec![Operand::Pointer { segment: 0, offset: 0x2000 }], raw: vec![] },
        ];
        let (prolog, _) = match_prologue(&instructions, 10).unwrap();
        assert_eq!(prolog.stack_adjust, StackAdjust::Dynamic);
    }

    #[test]
    fn collect_labels_recognizes_nil_type_empty_name_local_data_as_switch_table() {
        let records = vec![
            SymbolRecord::Label {
                code_offset: crate::codeview::DataRegionOffset::new(0x10, 1),
                properties: crate::codeview::symbols::ProcedureProperties::new(),
                name: crate::utils::StrBuf::new("loc$1"),
            },
            SymbolRecord::Data(crate::codeview::symbols::Data {
                data_type: crate::TypeIndex::try_from(0x1000u32).unwrap(),
                offset: crate::codeview::DataRegionOffset::new(0x20, 1),
                name: crate::utils::StrBuf::new(""),
            }),
            SymbolRecord::Data(crate::codeview::symbols::Data {
                data_type: crate::TypeIndex::try_from(0x1000u32).unwrap(),
                offset: crate::codeview::DataRegionOffset::new(0x30, 1),
                name: crate::utils::StrBuf::new("g_counter"),
            }),
        ];
        let labels = collect_labels(&records);
        assert!(matches!(labels.get(&0x10), Some(UserLabel::Named(n)) if n == "loc_1"));
        assert!(matches!(labels.get(&0x20), Some(UserLabel::SwitchTable)));
        assert!(labels.get(&0x30).is_none());
    }

    #[test]
    fn jump_table_upper_bound_shrinks_as_entries_are_parsed() {
        let base_va = 0x1000u32;
        let func_end = 0x1040u32;
        let mut code = vec![0u8; 0x40];
        code[0x10..0x14].copy_from_slice(&0x1020u32.to_le_bytes());
        // This entry's own value is below `func_end`: the bound must shrink
        // to it instead of staying pinned at the function's end.
        code[0x14..0x18].copy_from_slice(&0x1018u32.to_le_bytes());
        // A plausible-looking target living right after the table; a fixed
        // `func_end` bound would misread it as a third pointer.
        code[0x18..0x1c].copy_from_slice(&0x1005u32.to_le_bytes());

        let mem = crate::x86::MemoryOperand {
            base: None,
            index: Some(Register::EAX),
            scale: 4,
            disp: 0x1010,
            size: 32,
            segment: crate::x86::SegOverride::None,
        };
        let offsets = BTreeSet::new();
        let table = try_jump_table(&mem, 0x1005, func_end, &code, base_va, &offsets).unwrap();
        assert_eq!(table.entries, vec![0x1020, 0x1018]);
        assert_eq!(table.upper_bound, 0x1018);
        assert!(table.table_data.is_none());
    }

    #[test]
    fn jump_table_populates_registered_switch_table() {
        let base_va = 0x1000u32;
        let func_end = 0x1040u32;
        let mut code = vec![0u8; 0x40];
        code[0x10..0x14].copy_from_slice(&0x1020u32.to_le_bytes());
        code[0x14..0x18].copy_from_slice(&0x1018u32.to_le_bytes());
        code[0x18] = 0;
        code[0x19] = 1;
        code[0x1a] = 0;
        code[0x1b] = 2; // >= entries.len(): terminates the case table

        let mem = crate::x86::MemoryOperand {
            base: None,
            index: Some(Register::EAX),
            scale: 4,
            disp: 0x1010,
            size: 32,
            segment: crate::x86::SegOverride::None,
        };
        let mut offsets = BTreeSet::new();
        offsets.insert(0x1018);
        let table = try_jump_table(&mem, 0x1005, func_end, &code, base_va, &offsets).unwrap();
        assert_eq!(table.table_data, Some(vec![0, 1, 0]));
    }
}
