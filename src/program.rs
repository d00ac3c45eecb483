//! The program/address-space model (§4.4): PE sections carrying an interval
//! tree of module contributions, and the flat, address-keyed table of
//! recovered items (functions, data, string literals, vtables, thunks).

use crate::codeview::symbols::SymbolRecord;
use crate::codeview::DataRegionOffset;
use crate::dbi::{DbiStream, SectionContrib, SectionHeader, SectionHeaderStream};
use crate::intervals::IntervalTree;
use crate::module::Module;
use crate::symbols::Symbols;
use crate::TypeIndex;

const IMAGE_SCN_CNT_CODE: u32 = 0x0000_0020;
const IMAGE_SCN_CNT_INITIALIZED_DATA: u32 = 0x0000_0040;
const IMAGE_SCN_CNT_UNINITIALIZED_DATA: u32 = 0x0000_0080;
const IMAGE_SCN_MEM_EXECUTE: u32 = 0x2000_0000;
const IMAGE_SCN_MEM_READ: u32 = 0x4000_0000;
const IMAGE_SCN_MEM_WRITE: u32 = 0x8000_0000;

#[derive(Debug, Clone)]
pub struct Contribution {
    pub module: u16,
    pub characteristics: u32,
}

impl Contribution {
    pub fn is_code(&self) -> bool {
        self.characteristics & (IMAGE_SCN_CNT_CODE | IMAGE_SCN_MEM_EXECUTE) != 0
    }

    pub fn is_bss(&self) -> bool {
        self.characteristics & IMAGE_SCN_CNT_UNINITIALIZED_DATA != 0
    }

    pub fn is_data(&self) -> bool {
        self.characteristics & IMAGE_SCN_CNT_INITIALIZED_DATA != 0 && !self.is_code()
    }

    pub fn is_readonly(&self) -> bool {
        self.characteristics & IMAGE_SCN_MEM_WRITE == 0 && self.characteristics & IMAGE_SCN_MEM_READ != 0
    }

    /// Declared section alignment, decoded from the `IMAGE_SCN_ALIGN_*` nibble
    /// (bits 20-23); `0` when unset, matching the PE default (16 bytes).
    pub fn alignment(&self) -> u32 {
        let bits = (self.characteristics >> 20) & 0xF;
        if bits == 0 {
            0
        } else {
            1 << (bits - 1)
        }
    }
}

#[derive(Debug)]
pub struct Section {
    pub index: u16,
    pub va: u32,
    pub virtual_size: u32,
    pub characteristics: u32,
    pub contributions: IntervalTree<Contribution>,
}

impl Section {
    pub fn contains(&self, va: u32) -> bool {
        va >= self.va && va < self.va + self.virtual_size
    }
}

#[derive(Debug, Clone)]
pub struct Function {
    pub name: String,
    pub va: u32,
    pub size: u32,
    pub module: u16,
    pub signature: Option<TypeIndex>,
}

#[derive(Debug, Clone)]
pub struct DataDecl {
    pub name: String,
    pub module: Option<u16>,
}

#[derive(Debug, Clone)]
pub struct DataItem {
    pub name: String,
    pub va: u32,
    pub size: u32,
    pub ty: Option<TypeIndex>,
    /// Other declarations observed at the same address (§4.4 multi-declaration
    /// merging): the same global seen from more than one module/translation
    /// unit collapses into a single item, keeping the extra names around.
    pub alt_defs: Vec<DataDecl>,
}

#[derive(Debug, Clone)]
pub struct VftTable {
    pub name: String,
    pub va: u32,
    pub slots: Vec<u32>,
}

#[derive(Debug, Clone)]
pub struct Thunk {
    pub name: String,
    pub va: u32,
    pub size: u32,
}

#[derive(Debug, Clone)]
pub enum Item {
    Function(Function),
    Data(DataItem),
    StringLiteral { va: u32, size: u32, text: String },
    VftTable(VftTable),
    Thunk(Thunk),
}

impl Item {
    pub fn name(&self) -> &str {
        match self {
            Item::Function(f) => &f.name,
            Item::Data(d) => &d.name,
            Item::StringLiteral { .. } => "",
            Item::VftTable(v) => &v.name,
            Item::Thunk(t) => &t.name,
        }
    }
}

#[derive(Debug, Default)]
pub struct Program {
    pub sections: Vec<Section>,
    items: IntervalTree<Item>,
    /// Public symbols whose address already resolves to a `Function`/`Data`
    /// item: exported names with no item of their own (§4.4).
    pub exported_publics: Vec<String>,
}

impl Program {
    pub fn build(
        dbi: &DbiStream,
        section_headers: &SectionHeaderStream,
        global_symbols: &Symbols,
        modules: &[(u16, Module)],
    ) -> Self {
        let sections = build_sections(dbi, section_headers);
        let va_of = |offset: &DataRegionOffset| resolve_va(&sections, offset);

        let mut staging: std::collections::BTreeMap<u32, Item> = std::collections::BTreeMap::new();

        for (module_index, module) in modules {
            for record in module.symbols() {
                if let Some((proc, offset)) = procedure_symbol(record) {
                    let Some(va) = va_of(offset) else { continue };
                    staging.insert(
                        va,
                        Item::Function(Function {
                            name: proc.name.as_ref().to_string(),
                            va,
                            size: proc.code_size,
                            module: *module_index,
                            signature: Some(proc.function_type),
                        }),
                    );
                }
            }
        }

        let mut exported_publics = Vec::new();
        for record in global_symbols.records() {
            match record {
                SymbolRecord::Data(data) | SymbolRecord::GlobalData(data) => {
                    let Some(va) = va_of(&data.offset) else { continue };
                    let name = data.name.as_ref().to_string();
                    merge_data_decl(&mut staging, va, name, Some(data.data_type));
                }
                SymbolRecord::Public32(public) => {
                    let Some(va) = va_of(&public.offset) else { continue };
                    let name = public.name.as_ref().to_string();
                    if staging.contains_key(&va) {
                        exported_publics.push(name);
                    } else if let Some(text) = decode_string_literal_name(&name) {
                        let size = text.len() as u32 + 1;
                        staging.insert(va, Item::StringLiteral { va, size, text });
                    } else if name.starts_with("??_7") {
                        staging.insert(va, Item::VftTable(VftTable { name, va, slots: Vec::new() }));
                    } else {
                        staging.insert(va, Item::Thunk(Thunk { name, va, size: 0 }));
                    }
                }
                _ => {}
            }
        }

        let mut items = IntervalTree::new();
        for (va, item) in staging {
            let size = item_size(&item).max(1);
            items.insert(va..va + size, item);
        }

        Self {
            sections,
            items,
            exported_publics,
        }
    }

    pub fn get_item(&self, va: u32) -> Option<&Item> {
        self.items.find_point(va)
    }

    pub fn iter_items(&self) -> impl Iterator<Item = &Item> {
        self.items.iter().map(|(_, item)| item)
    }
}

/// Resolves a module-relative `(segment, offset)` pair to an absolute VA
/// against the program's section table. Segment indices are 1-based.
pub fn resolve_va(sections: &[Section], offset: &DataRegionOffset) -> Option<u32> {
    let section = sections.get(offset.segment.checked_sub(1)? as usize)?;
    Some(section.va + offset.offset)
}

fn item_size(item: &Item) -> u32 {
    match item {
        Item::Function(f) => f.size,
        Item::Data(d) => d.size,
        Item::StringLiteral { size, .. } => *size,
        Item::VftTable(v) => v.slots.len() as u32 * 4,
        Item::Thunk(t) => t.size,
    }
}

fn merge_data_decl(
    staging: &mut std::collections::BTreeMap<u32, Item>,
    va: u32,
    name: String,
    ty: Option<TypeIndex>,
) {
    match staging.get_mut(&va) {
        Some(Item::Data(existing)) => {
            if existing.name != name {
                existing.alt_defs.push(DataDecl { name, module: None });
            }
        }
        Some(_) => {}
        None => {
            staging.insert(
                va,
                Item::Data(DataItem {
                    name,
                    va,
                    size: 0,
                    ty,
                    alt_defs: Vec::new(),
                }),
            );
        }
    }
}

/// Recognizes an MSVC string-literal symbol name (`??_C@_0<len>@<hash>@text`)
/// and extracts the text trailing the final `@`.
fn decode_string_literal_name(name: &str) -> Option<String> {
    if !name.starts_with("??_C@") {
        return None;
    }
    name.rsplit('@').next().map(str::to_string)
}

fn build_sections(dbi: &DbiStream, section_headers: &SectionHeaderStream) -> Vec<Section> {
    let mut sections: Vec<Section> = section_headers
        .headers()
        .iter()
        .enumerate()
        .map(|(i, header): (usize, &SectionHeader)| Section {
            index: (i + 1) as u16,
            va: header.virtual_address,
            virtual_size: header.virtual_size,
            characteristics: header.characteristics,
            contributions: IntervalTree::new(),
        })
        .collect();

    for contrib in dbi.section_contribs() {
        let SectionContrib {
            i_sect,
            offset,
            size,
            characteristics,
            i_mod,
            ..
        } = contrib;
        let (i_sect, offset, size, characteristics, i_mod) = (*i_sect, *offset, *size, *characteristics, *i_mod);
        if i_sect == 0 {
            continue;
        }
        if let Some(section) = sections.get_mut(i_sect as usize - 1) {
            let start = offset.max(0) as u32;
            section.contributions.insert(
                start..start + size.max(1),
                Contribution {
                    module: i_mod,
                    characteristics,
                },
            );
        }
    }

    sections
}

pub fn procedure_symbol(record: &SymbolRecord) -> Option<(&crate::codeview::symbols::Procedure, &DataRegionOffset)> {
    let proc = match record {
        SymbolRecord::Proc(p)
        | SymbolRecord::GlobalProc(p)
        | SymbolRecord::ProcId(p)
        | SymbolRecord::GlobalProcId(p)
        | SymbolRecord::DPCProc(p)
        | SymbolRecord::DPCProcId(p) => p,
        _ => return None,
    };
    Some((proc, &proc.code_offset))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contribution_characteristics_classify_code_vs_data() {
        let code = Contribution {
            module: 0,
            characteristics: IMAGE_SCN_CNT_CODE | IMAGE_SCN_MEM_EXECUTE,
        };
        assert!(code.is_code());
        assert!(!code.is_data());

        let rdata = Contribution {
            module: 0,
            characteristics: IMAGE_SCN_CNT_INITIALIZED_DATA | IMAGE_SCN_MEM_READ,
        };
        assert!(rdata.is_data());
        assert!(rdata.is_readonly());
    }

    #[test]
    fn section_alignment_decodes_the_nibble() {
        let c = Contribution {
            module: 0,
            characteristics: 5 << 20,
        };
        assert_eq!(c.alignment(), 16);
    }
}
