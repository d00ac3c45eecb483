//! The function analyzer (§4.5-4.6): orchestrates scope construction, basic
//! block discovery, prologue/epilogue matching, and statement/loop recovery
//! for a single function body.

use zydis::Mnemonic;

use crate::codeview::symbols::SymbolRecord;
use crate::controlflow::{self, ControlFlow, Epilog, Prolog};
use crate::program::Section;
use crate::result::Result;
use crate::scope::{self, Scope};
use crate::statement::{self, Loop, MatchedBlock, ReturnKind};
use crate::x86::Decoder;

#[derive(Debug)]
pub struct AnalyzedBlock {
    pub start: u32,
    pub end: u32,
    pub matched: MatchedBlock,
    pub inlined: bool,
}

#[derive(Debug)]
pub struct Function {
    pub name: String,
    pub va: u32,
    pub scope: Scope,
    pub prolog: Option<Prolog>,
    pub epilog: Option<Epilog>,
    pub cf: ControlFlow,
    pub loops: Vec<Loop>,
    pub return_kind: Option<ReturnKind>,
    pub blocks: Vec<AnalyzedBlock>,
}

impl Function {
    /// `true` when both prologue and epilogue were recognized: the whole
    /// function is a candidate for statement recovery rather than a raw
    /// `__asm` dump (§4.5.3).
    pub fn is_lifted(&self) -> bool {
        self.prolog.is_some() && self.epilog.is_some()
    }
}

/// Runs the full per-function pipeline over `code` (the function's bytes,
/// mapped starting at `va`) using its CodeView children for scope/labels.
pub fn analyze(
    name: String,
    va: u32,
    code: &[u8],
    records: &[SymbolRecord],
    decoder: &Decoder,
    is_void: bool,
    sections: &[Section],
) -> Result<Function> {
    let code_range = va..(va + code.len() as u32);
    let scope = scope::build(records, code_range, sections);
    let labels = controlflow::collect_labels(records);
    let cf = controlflow::discover(code, va, decoder, &scope, &labels)?;

    let first_block = cf.blocks.get(&va);
    let prolog = first_block.and_then(|b| {
        let raw: Vec<_> = b.instructions.iter().map(|i| i.raw.clone()).collect();
        let line = b.start;
        controlflow::match_prologue(&raw, line).map(|(p, _)| p)
    });

    let landing = cf
        .blocks
        .values()
        .find(|b| matches!(b.instructions.last().map(|i| i.mnemonic), Some(Mnemonic::RET | Mnemonic::RETF)));
    let epilog = landing.and_then(|b| {
        let raw: Vec<_> = b.instructions.iter().map(|i| i.raw.clone()).collect();
        controlflow::match_epilogue(&raw, b.start).map(|(_, e)| e)
    });

    let (return_kind, inlined) = match landing {
        Some(block) => {
            let landing_start = block.start;
            let (kind, inlined) = statement::match_return(&cf, landing_start, is_void);
            (Some(kind), inlined)
        }
        None => (None, Default::default()),
    };

    let loops = statement::find_loops(&cf, &scope);

    let mut blocks = Vec::new();
    for block in cf.blocks.values() {
        blocks.push(AnalyzedBlock {
            start: block.start,
            end: block.end,
            matched: statement::match_block(block, &scope),
            inlined: inlined.contains(&block.start),
        });
    }

    Ok(Function {
        name,
        va,
        scope,
        prolog,
        epilog,
        cf,
        loops,
        return_kind,
        blocks,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unreachable_function_has_no_landing_block() {
        let decoder = Decoder::new().unwrap();
        // `ret` immediately: single block, trivially its own landing block.
        let code = [0xC3u8];
        let fun = analyze("f".to_string(), 0x1000, &code, &[], &decoder, true, &[]).unwrap();
        assert!(fun.return_kind.is_some());
        assert!(!fun.is_lifted()); // no prologue present
    }
}
