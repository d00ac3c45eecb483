//! Integration tests for the six seeded decompilation scenarios: small,
//! hand-built inputs standing in for the minimal compiler output that should
//! drive each stage of statement/return/loop recovery, plus one test against
//! a fully round-tripped in-memory PDB for string-literal item recovery.

use std::io;

use retrograde_decompiler::builders::PdbBuilder;
use retrograde_decompiler::codeview::symbols::{Public, PublicProperties};
use retrograde_decompiler::codeview::DataRegionOffset;
use retrograde_decompiler::controlflow::{BasicBlock, ControlFlow, Edge};
use retrograde_decompiler::dbi::SectionHeader;
use retrograde_decompiler::ir::{Cond, Expr, State};
use retrograde_decompiler::program::{Item, Program};
use retrograde_decompiler::result::Result;
use retrograde_decompiler::scope::Scope;
use retrograde_decompiler::statement::{self, Loop, ReturnKind, Statement};
use retrograde_decompiler::symbols::Symbols;
use retrograde_decompiler::utils::StrBuf;
use retrograde_decompiler::x86::{Instruction, MemoryOperand, Operand, SegOverride};
use retrograde_decompiler::PdbFile;
use zydis::{Mnemonic, Register};

fn scope_with_locals(locals: &[(&str, i32)]) -> Scope {
    let mut scope = Scope::default();
    for (name, bp_offset) in locals {
        let key = (*bp_offset as i64 - i32::MIN as i64) as u32;
        scope.frame.insert(
            key..key + 4,
            retrograde_decompiler::scope::Local {
                name: name.to_string(),
                ty: retrograde_decompiler::TypeIndex::try_from(0x1000u32).unwrap(),
                bp_offset: *bp_offset,
                hidden: false,
            },
        );
    }
    scope
}

fn mem(base: Register, disp: i64) -> Operand {
    Operand::Memory(MemoryOperand {
        base: Some(base),
        index: None,
        scale: 0,
        disp,
        size: 32,
        segment: SegOverride::None,
    })
}

fn reg(r: Register) -> Operand {
    Operand::Register(r)
}

fn insn(address: u32, length: u8, mnemonic: Mnemonic, operands: Vec<Operand>) -> Instruction {
    Instruction {
        address,
        length,
        mnemonic,
        operands,
        raw: vec![0; length as usize],
    }
}

/// Scenario 1: `mov eax, [ebp-4]; add eax, 2; mov [ebp-8], eax` recovers as
/// the single assignment `local1 = local2 + 2;`, naming both stack slots
/// from the function's scope rather than raw `ebp` displacements.
#[test]
fn mov_add_mov_matches_local_assignment() {
    let scope = scope_with_locals(&[("local2", -4), ("local1", -8)]);
    let mut state = State::new();

    let load = insn(0x1000, 3, Mnemonic::MOV, vec![reg(Register::EAX), mem(Register::EBP, -4)]);
    let add = insn(0x1003, 3, Mnemonic::ADD, vec![reg(Register::EAX), Operand::Immediate(2)]);
    let store = insn(0x1006, 3, Mnemonic::MOV, vec![mem(Register::EBP, -8), reg(Register::EAX)]);

    let instructions = vec![state.lift(&load, &scope), state.lift(&add, &scope), state.lift(&store, &scope)];

    let block = BasicBlock {
        start: 0x1000,
        end: 0x1009,
        instructions,
        ..BasicBlock::default()
    };

    let matched = statement::match_block(&block, &scope);
    assert_eq!(matched.statements.len(), 1);

    let Statement::Assign(dst, src) = &matched.statements[0] else {
        panic!("expected an assignment, got {:?}", matched.statements[0]);
    };
    assert!(matches!(dst, Expr::LocalVar { bp_disp: -8, .. }));
    assert!(matches!(
        src,
        Expr::BinaryOp("+", a, b) if matches!(**a, Expr::LocalVar { bp_disp: -4, .. }) && matches!(**b, Expr::Const(2))
    ));
}

/// Scenario 2: a predecessor block that zeroes `eax` and falls straight
/// through into the return landing block recovers as `return 0;`.
#[test]
fn xor_eax_fallthrough_matches_zero_return() {
    let scope = Scope::default();
    let mut state = State::new();
    let zero = insn(0x2000, 2, Mnemonic::XOR, vec![reg(Register::EAX), reg(Register::EAX)]);
    let pred = BasicBlock {
        start: 0x2000,
        end: 0x2002,
        instructions: vec![state.lift(&zero, &scope)],
        outgoing: vec![Edge::Internal(0x2002)],
        fallthrough: Some(0x2002),
        ..BasicBlock::default()
    };
    let landing = BasicBlock {
        start: 0x2002,
        end: 0x2003,
        instructions: vec![],
        incoming: vec![0x2000],
        fallfrom: vec![0x2000],
        ..BasicBlock::default()
    };

    let mut cf = ControlFlow::default();
    cf.blocks.insert(pred.start, pred);
    cf.blocks.insert(landing.start, landing);

    let (kind, inlined) = statement::match_return(&cf, 0x2002, false);
    assert!(inlined.is_empty());
    assert!(matches!(kind, ReturnKind::Value(Expr::Const(0))));
}

/// Scenario 3: `cmp arg, 0; je else; mov eax,1; jmp land; else: xor eax,eax;
/// land: ret` is the realistic two-predecessor diamond. Both arms merge into
/// the landing block's `incoming`, and the recovered ternary must keep
/// `then_expr` bound to the branch actually taken when the condition holds.
#[test]
fn cmp_je_diamond_matches_ternary_return() {
    let scope = scope_with_locals(&[("arg", 8)]);
    let mut state = State::new();

    let cmp = insn(0x3000, 3, Mnemonic::CMP, vec![mem(Register::EBP, 8), Operand::Immediate(0)]);
    let cmp = state.lift(&cmp, &scope);
    let cond = Cond::Ne(Expr::LocalVar { size: 32, bp_disp: 8 }, Expr::Const(0));

    let cond_block = BasicBlock {
        start: 0x3000,
        end: 0x3005,
        instructions: vec![cmp],
        outgoing: vec![
            Edge::Conditional { target: 0x300a, cond },
            Edge::Internal(0x3005),
        ],
        fallthrough: Some(0x3005),
        ..BasicBlock::default()
    };

    // Fallthrough arm (taken when `cond` is false): zeroes the accumulator.
    let mut fallthrough_state = State::new();
    let zero = insn(0x3005, 2, Mnemonic::XOR, vec![reg(Register::EAX), reg(Register::EAX)]);
    let then_block = BasicBlock {
        start: 0x3005,
        end: 0x300c,
        instructions: vec![fallthrough_state.lift(&zero, &scope)],
        incoming: vec![0x3000],
        fallfrom: vec![0x3000],
        outgoing: vec![Edge::Internal(0x300f)],
        fallthrough: Some(0x300f),
        ..BasicBlock::default()
    };

    // Taken arm (the `je`'s target, reached when `cond` is true): sets the
    // accumulator to 1.
    let mut taken_state = State::new();
    let set_one = insn(0x300a, 5, Mnemonic::MOV, vec![reg(Register::EAX), Operand::Immediate(1)]);
    let else_block = BasicBlock {
        start: 0x300a,
        end: 0x300f,
        instructions: vec![taken_state.lift(&set_one, &scope)],
        incoming: vec![0x3000],
        fallfrom: vec![0x3000],
        outgoing: vec![Edge::Internal(0x300f)],
        fallthrough: Some(0x300f),
        ..BasicBlock::default()
    };

    let landing = BasicBlock {
        start: 0x300f,
        end: 0x3010,
        instructions: vec![],
        incoming: vec![0x3005, 0x300a],
        fallfrom: vec![0x3005, 0x300a],
        ..BasicBlock::default()
    };

    let mut cf = ControlFlow::default();
    for b in [cond_block, then_block, else_block, landing] {
        cf.blocks.insert(b.start, b);
    }

    let (kind, inlined) = statement::match_return(&cf, 0x300f, false);
    assert_eq!(inlined.len(), 2);
    let ReturnKind::Ternary { cond, then_expr, else_expr } = kind else {
        panic!("expected a ternary return");
    };
    assert!(matches!(cond, Cond::Ne(..)));
    assert!(matches!(then_expr, Expr::Const(1)));
    assert!(matches!(else_expr, Expr::Const(0)));
}

/// Scenario 4: a conditional branch whose target is a lower address than
/// its own block, with no loop-entry initializer, is a `while` loop rather
/// than a `do`/`for`.
#[test]
fn conditional_back_edge_without_initializer_is_while_loop() {
    let head = BasicBlock {
        start: 0x4000,
        end: 0x4005,
        outgoing: vec![
            Edge::Conditional { target: 0x400a, cond: Cond::IsZero(Expr::Reg(Register::EAX)) },
            Edge::Internal(0x4005),
        ],
        fallthrough: Some(0x4005),
        incoming: vec![0x4005],
        ..BasicBlock::default()
    };
    let body = BasicBlock {
        start: 0x4005,
        end: 0x400a,
        outgoing: vec![Edge::Internal(0x4000)],
        fallthrough: Some(0x4000),
        incoming: vec![0x4000],
        ..BasicBlock::default()
    };

    let mut cf = ControlFlow::default();
    cf.blocks.insert(head.start, head);
    cf.blocks.insert(body.start, body);

    let loops = statement::find_loops(&cf, &Scope::default());
    assert_eq!(loops.len(), 1);
    assert!(matches!(&loops[0], Loop::While { head: 0x4000, cond: Cond::IsNonZero(_), .. }));
}

/// A back edge whose end block is itself conditional is a `do`/`while`
/// loop: the loop continues on the taken branch, back to the head.
#[test]
fn conditional_back_edge_at_loop_end_is_do_while_loop() {
    let head = BasicBlock {
        start: 0x6000,
        end: 0x6003,
        outgoing: vec![Edge::Internal(0x6003)],
        fallthrough: Some(0x6003),
        incoming: vec![0x6003],
        ..BasicBlock::default()
    };
    let end = BasicBlock {
        start: 0x6003,
        end: 0x6006,
        outgoing: vec![
            Edge::Conditional { target: 0x6000, cond: Cond::IsNonZero(Expr::Reg(Register::ECX)) },
            Edge::Internal(0x6006),
        ],
        fallthrough: Some(0x6006),
        incoming: vec![0x6000],
        ..BasicBlock::default()
    };

    let mut cf = ControlFlow::default();
    cf.blocks.insert(head.start, head);
    cf.blocks.insert(end.start, end);

    let loops = statement::find_loops(&cf, &Scope::default());
    assert_eq!(loops.len(), 1);
    assert!(matches!(&loops[0], Loop::DoWhile { head: 0x6000, cond: Cond::IsNonZero(_), .. }));
}

/// A loop-entry block that falls straight into the head, with the head's
/// branch target landing past the back-edge ("step") block's own end,
/// recovers as a `for` loop rather than `while` (§4.6.3).
#[test]
fn initializer_with_step_block_is_for_loop() {
    let init = BasicBlock {
        start: 0x6900,
        end: 0x6905,
        outgoing: vec![Edge::Internal(0x6910)],
        fallthrough: Some(0x6910),
        ..BasicBlock::default()
    };
    let head = BasicBlock {
        start: 0x6910,
        end: 0x6913,
        outgoing: vec![
            Edge::Conditional { target: 0x6930, cond: Cond::Lt(Expr::Reg(Register::ECX), Expr::Const(10)) },
            Edge::Internal(0x6920),
        ],
        fallthrough: Some(0x6920),
        incoming: vec![0x6900, 0x6920],
        ..BasicBlock::default()
    };
    let step = BasicBlock {
        start: 0x6920,
        end: 0x6925,
        outgoing: vec![Edge::Internal(0x6910)],
        fallthrough: Some(0x6910),
        incoming: vec![0x6910],
        ..BasicBlock::default()
    };

    let mut cf = ControlFlow::default();
    for b in [init, head, step] {
        cf.blocks.insert(b.start, b);
    }

    let loops = statement::find_loops(&cf, &Scope::default());
    assert_eq!(loops.len(), 1);
    assert!(matches!(&loops[0], Loop::For { head: 0x6910, cond: Cond::Ge(..), .. }));
}

/// Scenario 5: `lea eax, [ebp-4]; jmp land; land: ret` recovers as
/// `return &local1;` — the predecessor sets the accumulator directly via
/// `lea`, with no ternary involved.
#[test]
fn lea_fallthrough_matches_address_of_local_return() {
    let scope = scope_with_locals(&[("local1", -4)]);
    let mut state = State::new();
    let take_addr = insn(0x5000, 3, Mnemonic::LEA, vec![reg(Register::EAX), mem(Register::EBP, -4)]);
    let pred = BasicBlock {
        start: 0x5000,
        end: 0x5003,
        instructions: vec![state.lift(&take_addr, &scope)],
        outgoing: vec![Edge::Internal(0x5003)],
        fallthrough: Some(0x5003),
        ..BasicBlock::default()
    };
    let landing = BasicBlock {
        start: 0x5003,
        end: 0x5004,
        incoming: vec![0x5000],
        fallfrom: vec![0x5000],
        ..BasicBlock::default()
    };

    let mut cf = ControlFlow::default();
    cf.blocks.insert(pred.start, pred);
    cf.blocks.insert(landing.start, landing);

    let (kind, _) = statement::match_return(&cf, 0x5003, false);
    let ReturnKind::Value(Expr::Lea(inner)) = kind else {
        panic!("expected a `lea`-based return value, got {kind:?}");
    };
    assert!(matches!(*inner, Expr::LocalVar { bp_disp: -4, .. }));
}

/// Scenario 6: a `??_C@...` public symbol decodes to a `StringLiteral` item
/// retrievable by address, round-tripped through a real in-memory PDB rather
/// than constructed by hand.
#[test]
fn mangled_string_public_decodes_to_string_literal_item() -> Result<()> {
    let mut builder = PdbBuilder::default();
    builder.dbi().add_section_header(SectionHeader {
        name: *b".rdata\0\0",
        virtual_size: 0x1000,
        virtual_address: 0x2000,
        size_of_raw_data: 0x1000,
        pointer_to_raw_data: 0,
        pointer_to_relocations: 0,
        pointer_to_line_numbers: 0,
        number_of_relocations: 0,
        number_of_line_numbers: 0,
        characteristics: 0x4000_0040,
    });
    builder.dbi().symbols().add(Public {
        properties: PublicProperties::new(),
        offset: DataRegionOffset::new(0x40, 1),
        name: StrBuf::new("??_C@_0L@foo@hello"),
    });

    let mut output = io::Cursor::new(Vec::new());
    builder.commit(&mut output)?;
    output.set_position(0);

    let mut pdb = PdbFile::open(output)?;
    let dbi = pdb.get_dbi()?;
    let section_headers = pdb.get_section_headers(&dbi)?;
    let global_symbols: Symbols = pdb.get_symbols(&dbi)?;

    let prog = Program::build(&dbi, &section_headers, &global_symbols, &[]);
    let item = prog.get_item(0x2040).expect("string literal item at 0x2040");
    let Item::StringLiteral { text, .. } = item else {
        panic!("expected a string literal item, got {item:?}");
    };
    assert_eq!(text, "hello");

    Ok(())
}
