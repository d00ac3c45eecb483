//! Scope recovery (§4.5.4): the bp-relative stack frame as an interval tree,
//! static locals, typedefs, and the lexical nesting of `S_BLOCK32` children.

use std::ops::Range;

use crate::codeview::symbols::SymbolRecord;
use crate::intervals::IntervalTree;
use crate::program::{self, Section};
use crate::TypeIndex;

const HIDDEN_NAMES: &[&str] = &["this", "__$ReturnUdt", "$initVBases"];

/// Maps a signed bp-relative offset onto the `u32` key space the interval
/// tree expects, preserving order so negative (below-fp locals) and positive
/// (above-fp arguments) offsets never collide.
fn bp_offset_key(offset: i32) -> u32 {
    (offset as i64 - i32::MIN as i64) as u32
}

#[derive(Debug, Clone)]
pub struct Local {
    pub name: String,
    pub ty: TypeIndex,
    pub bp_offset: i32,
    /// Compiler-synthesized locals (`this`, the hidden return-UDT pointer,
    /// virtual-base initialization flag) that source-level code never names.
    pub hidden: bool,
}

#[derive(Debug, Clone)]
pub struct StaticLocal {
    pub name: String,
    pub ty: Option<TypeIndex>,
    pub va: u32,
}

#[derive(Debug, Clone)]
pub struct Typedef {
    pub name: String,
    pub ty: TypeIndex,
}

#[derive(Debug, Default)]
pub struct Scope {
    pub code_range: Range<u32>,
    pub frame: IntervalTree<Local>,
    pub statics: Vec<StaticLocal>,
    pub typedefs: Vec<Typedef>,
    pub children: Vec<Scope>,
}

impl Scope {
    /// Arguments and locals visible directly in this scope, in declaration
    /// order (not sorted by frame offset).
    pub fn locals(&self) -> impl Iterator<Item = &Local> {
        self.frame.iter().map(|(_, local)| local)
    }

    /// A scope inherits the typedefs and static locals of every enclosing
    /// scope (§4.5.4): outer declarations stay visible to inner blocks.
    pub fn visible_typedefs<'a>(&'a self, ancestors: &[&'a Scope]) -> Vec<&'a Typedef> {
        ancestors
            .iter()
            .flat_map(|s| s.typedefs.iter())
            .chain(self.typedefs.iter())
            .collect()
    }

    /// Resolves an absolute address against this scope's static locals,
    /// falling back to any enclosing scope (§3 "a scope also owns a map from
    /// static-local addresses to their local data items").
    pub fn static_at<'a>(&'a self, ancestors: &[&'a Scope], va: u32) -> Option<&'a StaticLocal> {
        self.statics
            .iter()
            .find(|s| s.va == va)
            .or_else(|| ancestors.iter().find_map(|s| s.statics.iter().find(|s| s.va == va)))
    }
}

/// Builds the scope tree for one function/thunk body, given the flat record
/// slice starting immediately after its `Proc`/`GlobalProc` header and ending
/// at the matching close. Nested `S_BLOCK32` scopes are recognized purely by
/// a depth counter over open/close markers; no absolute byte offsets are
/// required since CodeView always balances them. `sections` resolves each
/// static local's module-relative `(segment, offset)` to an absolute VA.
pub fn build(records: &[SymbolRecord], code_range: Range<u32>, sections: &[Section]) -> Scope {
    let mut root = Scope {
        code_range,
        ..Scope::default()
    };
    let mut open_stack: Vec<Scope> = Vec::new();

    for record in records {
        match record {
            SymbolRecord::Block {
                code_size,
                code_offset,
                ..
            } => {
                open_stack.push(Scope {
                    code_range: code_offset.offset..(code_offset.offset + code_size),
                    ..Scope::default()
                });
            }
            SymbolRecord::ScopeEnd | SymbolRecord::ProcEnd => {
                if let Some(finished) = open_stack.pop() {
                    if let Some(parent) = open_stack.last_mut() {
                        parent.children.push(finished);
                    } else {
                        root.children.push(finished);
                    }
                }
            }
            SymbolRecord::BasePointerRelative {
                offset,
                value_type,
                name,
            } => {
                let local = Local {
                    name: name.as_ref().to_string(),
                    ty: *value_type,
                    bp_offset: *offset,
                    hidden: HIDDEN_NAMES.contains(&name.as_ref()),
                };
                let scope = open_stack.last_mut().unwrap_or(&mut root);
                let width = 4u32;
                let start = bp_offset_key(*offset);
                scope.frame.insert(start..start + width, local);
            }
            SymbolRecord::Data(data) => {
                let va = program::resolve_va(sections, &data.offset).unwrap_or(0);
                let scope = open_stack.last_mut().unwrap_or(&mut root);
                scope.statics.push(StaticLocal {
                    name: data.name.as_ref().to_string(),
                    ty: Some(data.data_type),
                    va,
                });
            }
            SymbolRecord::Udt(udt) => {
                let scope = open_stack.last_mut().unwrap_or(&mut root);
                scope.typedefs.push(Typedef {
                    name: udt.name.as_ref().to_string(),
                    ty: udt.udt_type,
                });
            }
            _ => {}
        }
    }

    // Any scopes left open at the end of the slice (malformed input) are
    // folded into the root rather than discarded.
    for leftover in open_stack {
        root.children.push(leftover);
    }
    root
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::StrBuf;
    use crate::TypeIndex;

    fn ti(v: u32) -> TypeIndex {
        TypeIndex::try_from(v).unwrap()
    }

    #[test]
    fn this_pointer_is_flagged_hidden() {
        let records = vec![SymbolRecord::BasePointerRelative {
            offset: 8,
            value_type: ti(0x1000),
            name: StrBuf::new("this"),
        }];
        let scope = build(&records, 0..10, &[]);
        let local = scope.locals().next().unwrap();
        assert!(local.hidden);
    }

    #[test]
    fn named_argument_is_not_hidden() {
        let records = vec![SymbolRecord::BasePointerRelative {
            offset: 8,
            value_type: ti(0x1000),
            name: StrBuf::new("count"),
        }];
        let scope = build(&records, 0..10, &[]);
        assert!(!scope.locals().next().unwrap().hidden);
    }

    #[test]
    fn block_scope_nests_under_root() {
        let records = vec![
            SymbolRecord::Block {
                parent: 0u32.into(),
                end: 0u32.into(),
                code_size: 4,
                code_offset: crate::codeview::DataRegionOffset::new(0, 1),
                name: StrBuf::new(""),
            },
            SymbolRecord::BasePointerRelative {
                offset: -4,
                value_type: ti(0x1000),
                name: StrBuf::new("i"),
            },
            SymbolRecord::ScopeEnd,
        ];
        let scope = build(&records, 0..10, &[]);
        assert_eq!(scope.children.len(), 1);
        assert_eq!(scope.children[0].locals().count(), 1);
    }

    #[test]
    fn static_local_address_resolves_through_section_table() {
        let sections = vec![Section {
            index: 1,
            va: 0x10_0000,
            virtual_size: 0x1000,
            characteristics: 0,
            contributions: IntervalTree::new(),
        }];
        let records = vec![SymbolRecord::Data(crate::codeview::symbols::Data {
            data_type: ti(0x1000),
            offset: crate::codeview::DataRegionOffset::new(0x40, 1),
            name: StrBuf::new("counter"),
        })];
        let scope = build(&records, 0..10, &sections);
        let found = scope.static_at(&[], 0x10_0040).unwrap();
        assert_eq!(found.name, "counter");
    }
}
