//! The type store (§4.1): a dense table indexed by a 16-bit type index,
//! answering `size` / `typestr` / `access` / `deref` queries. Parses the TPI
//! stream in two passes — records first, forward-reference resolution
//! second — exactly as specified.

use std::collections::HashMap;

use tracing::warn;

use crate::class::ClassStore;
use crate::codeview::types::{
    BaseClasRecord, BuiltinType, CallingConvention, MethodListEntry, StructRecord, TypeRecord,
    UnionRecord, VFTableSlotKind, VirtualBaseClasRecord,
};
use crate::types::TpiStream;
use crate::{Integer, TypeIndex};

pub const MINIMUM_TI: u32 = crate::types::FIRST_NON_BUILTIN_TYPE;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    Class,
    Struct,
    Interface,
    Union,
    Enum,
}

#[derive(Debug, Clone)]
pub enum FieldEntry {
    Base {
        base: TypeIndex,
        offset: i64,
    },
    VirtualBase {
        base: TypeIndex,
        vbptr_offset: i64,
        indirect: bool,
    },
    Member {
        ty: Option<TypeIndex>,
        offset: i64,
        name: String,
    },
    StaticMember {
        ty: TypeIndex,
        name: String,
    },
    OneMethod {
        ty: TypeIndex,
        name: String,
        vtable_offset: Option<u32>,
    },
    OverloadedMethods {
        name: String,
        method_list: TypeIndex,
    },
    NestedType {
        ty: TypeIndex,
        name: String,
    },
    VfuncTab {
        table_type: TypeIndex,
    },
}

#[derive(Debug, Clone)]
pub struct MethodEntry {
    pub ty: Option<TypeIndex>,
    pub vtable_offset: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct Record {
    pub kind: RecordKind,
    pub name: String,
    pub byte_size: u32,
    pub forward_ref: bool,
    pub field_list: Option<TypeIndex>,
    pub vtable_shape: Option<TypeIndex>,
    pub derived_list: Option<TypeIndex>,
    /// Populated in pass 2 when `forward_ref` and a concrete twin exists.
    pub definition: Option<TypeIndex>,
}

#[derive(Debug, Clone)]
pub enum Type {
    Modifier {
        is_const: bool,
        is_volatile: bool,
        is_unaligned: bool,
        inner: TypeIndex,
    },
    Pointer {
        inner: TypeIndex,
        width: u32,
    },
    Array {
        element: TypeIndex,
        byte_size: u32,
    },
    Record(Record),
    Enum {
        name: String,
        underlying: TypeIndex,
        /// Field list holding the `Enumerator` entries; fetch via
        /// [`TypeStore::iter_field_list`].
        field_list: TypeIndex,
    },
    Procedure {
        return_type: Option<TypeIndex>,
        calling_conv: CallingConvention,
        arg_list: TypeIndex,
    },
    MemberFunction {
        class_type: Option<TypeIndex>,
        return_type: Option<TypeIndex>,
        this_type: Option<TypeIndex>,
        calling_conv: CallingConvention,
        arg_list: TypeIndex,
    },
    Bitfield {
        underlying: TypeIndex,
        length: u8,
        position: u8,
    },
    VtableShape(Vec<VFTableSlotKind>),
    FieldList(Vec<FieldEntry>),
    ArgList(Vec<TypeIndex>),
    MethodList(Vec<MethodEntry>),
}

/// A simple type index below [`MINIMUM_TI`]: a closed set of primitives plus
/// the pointer variants the toolchain derives mechanically from them (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Primitive {
    pub base: BuiltinType,
    /// 0 = direct value, otherwise a pointer of the given byte width.
    pub pointer_width: u32,
}

impl Primitive {
    pub fn decode(value: u32) -> Option<Self> {
        let mode = (value >> 8) & 0xF;
        let base_byte = value & 0xFF;
        let base = TypeIndex::try_from(base_byte).ok().and_then(|ti| BuiltinType::try_from(ti).ok())?;
        let pointer_width = match mode {
            0x0 => 0,
            0x1 | 0x2 | 0x3 => 4, // legacy 16-bit near/far/huge pointers, treated as 4 bytes
            0x4 => 4,             // 32-bit near pointer
            0x5 => 6,             // 32-bit far pointer (seg:off)
            0x6 => 8,             // 64-bit pointer
            _ => return None,
        };
        Some(Self { base, pointer_width })
    }

    pub fn size(&self) -> u32 {
        if self.pointer_width != 0 {
            return self.pointer_width;
        }
        match self.base {
            BuiltinType::Void | BuiltinType::NotTranslated => 0,
            BuiltinType::HResult => 4,
            BuiltinType::SignedChar
            | BuiltinType::UnsignedChar
            | BuiltinType::NarrowChar
            | BuiltinType::I8
            | BuiltinType::U8
            | BuiltinType::Bool8
            | BuiltinType::Char8 => 1,
            BuiltinType::WideChar
            | BuiltinType::Char16
            | BuiltinType::I16Short
            | BuiltinType::U16Short
            | BuiltinType::I16
            | BuiltinType::U16
            | BuiltinType::Bool16
            | BuiltinType::F16 => 2,
            BuiltinType::Char32
            | BuiltinType::I32Long
            | BuiltinType::U32Long
            | BuiltinType::I32
            | BuiltinType::U32
            | BuiltinType::Bool32
            | BuiltinType::F32
            | BuiltinType::F32PartialPrecision => 4,
            BuiltinType::F48 => 6,
            BuiltinType::I64Quad
            | BuiltinType::U64Quad
            | BuiltinType::I64
            | BuiltinType::U64
            | BuiltinType::Bool64
            | BuiltinType::F64 => 8,
            BuiltinType::F80 => 10,
            BuiltinType::I128Oct | BuiltinType::U128Oct | BuiltinType::I128 | BuiltinType::U128 | BuiltinType::Bool128 | BuiltinType::F128 => 16,
            _ => 8,
        }
    }

    pub fn name(&self) -> &'static str {
        if self.pointer_width != 0 {
            return match self.base {
                BuiltinType::Void => "void*",
                _ => "intptr_t*",
            };
        }
        match self.base {
            BuiltinType::Void => "void",
            BuiltinType::SignedChar => "signed char",
            BuiltinType::UnsignedChar => "unsigned char",
            BuiltinType::NarrowChar => "char",
            BuiltinType::WideChar => "wchar_t",
            BuiltinType::I8 => "int8_t",
            BuiltinType::U8 => "uint8_t",
            BuiltinType::I16 | BuiltinType::I16Short => "short",
            BuiltinType::U16 | BuiltinType::U16Short => "unsigned short",
            BuiltinType::I32 | BuiltinType::I32Long => "int",
            BuiltinType::U32 | BuiltinType::U32Long => "unsigned int",
            BuiltinType::I64 | BuiltinType::I64Quad => "__int64",
            BuiltinType::U64 | BuiltinType::U64Quad => "unsigned __int64",
            BuiltinType::F32 | BuiltinType::F32PartialPrecision => "float",
            BuiltinType::F64 => "double",
            BuiltinType::F80 => "long double",
            BuiltinType::Bool8 | BuiltinType::Bool16 | BuiltinType::Bool32 | BuiltinType::Bool64 => "bool",
            BuiltinType::HResult => "HRESULT",
            _ => "int",
        }
    }
}

fn integer_value(i: &Integer) -> i64 {
    i.as_i64()
}

/// The dense, name-indexed table of parsed type records.
#[derive(Debug)]
pub struct TypeStore {
    /// Indexed by `ti - MINIMUM_TI`; `None` means an unparsed/missing slot.
    types: Vec<Option<Type>>,
    by_name: HashMap<(String, Option<RecordKind>), Vec<TypeIndex>>,
}

impl TypeStore {
    pub fn build(tpi: &TpiStream) -> Self {
        let mut types = Vec::with_capacity(tpi.records().len());
        let mut by_name: HashMap<(String, Option<RecordKind>), Vec<TypeIndex>> = HashMap::new();

        for (i, record) in tpi.records().iter().enumerate() {
            let ti = TypeIndex::try_from(MINIMUM_TI + i as u32).ok();
            let ty = convert_record(record);
            if let (Some(ti), Some(Type::Record(r))) = (ti, &ty) {
                by_name
                    .entry((r.name.clone(), Some(r.kind)))
                    .or_default()
                    .push(ti);
            }
            types.push(ty);
        }

        let mut store = Self { types, by_name };
        store.resolve_forward_refs();
        store
    }

    fn resolve_forward_refs(&mut self) {
        let indices: Vec<usize> = (0..self.types.len()).collect();
        for i in indices {
            let (name, kind, forward_ref, byte_size) = match &self.types[i] {
                Some(Type::Record(r)) if r.forward_ref => (r.name.clone(), r.kind, true, r.byte_size),
                _ => continue,
            };
            if !forward_ref {
                continue;
            }
            let twin = self
                .by_name
                .get(&(name.clone(), Some(kind)))
                .into_iter()
                .flatten()
                .copied()
                .find(|&ti| {
                    let idx = (u32::from(ti) - MINIMUM_TI) as usize;
                    !matches!(&self.types.get(idx), Some(Some(Type::Record(r))) if r.forward_ref)
                        && self.types.get(idx).is_some()
                });
            if let Some(Type::Record(r)) = &mut self.types[i] {
                r.definition = twin;
            }
            if twin.is_none() && byte_size != 0 {
                warn!(record = %name, "forward reference without a matching definition");
            }
        }
    }

    pub fn get(&self, ti: TypeIndex) -> Option<&Type> {
        let idx = u32::from(ti).checked_sub(MINIMUM_TI)? as usize;
        self.types.get(idx).and_then(Option::as_ref)
    }

    /// Follows `Record::definition` through a forward reference, if any.
    pub fn resolve(&self, ti: TypeIndex) -> Option<(TypeIndex, &Type)> {
        match self.get(ti)? {
            Type::Record(r) if r.forward_ref => {
                let def = r.definition?;
                self.get(def).map(|t| (def, t))
            }
            other => Some((ti, other)),
        }
    }

    pub fn type_size(&self, ti: TypeIndex) -> u32 {
        if let Some(prim) = Primitive::decode(u32::from(ti)) {
            return prim.size();
        }
        match self.resolve(ti) {
            Some((_, Type::Record(r))) => r.byte_size,
            Some((_, Type::Array { byte_size, .. })) => *byte_size,
            Some((_, Type::Pointer { width, .. })) => *width,
            Some((_, Type::Modifier { inner, .. })) => self.type_size(*inner),
            Some((_, Type::Enum { underlying, .. })) => self.type_size(*underlying),
            Some((_, Type::Bitfield { underlying, .. })) => self.type_size(*underlying),
            _ => 0,
        }
    }

    pub fn typestr(&self, ti: TypeIndex, name: Option<&str>) -> String {
        let suffix = name.map(|n| format!(" {n}")).unwrap_or_default();
        if let Some(prim) = Primitive::decode(u32::from(ti)) {
            return format!("{}{}", prim.name(), suffix);
        }
        match self.get(ti) {
            Some(Type::Modifier {
                is_const,
                is_volatile,
                inner,
                ..
            }) => {
                let mut prefix = String::new();
                if *is_const {
                    prefix.push_str("const ");
                }
                if *is_volatile {
                    prefix.push_str("volatile ");
                }
                format!("{}{}", prefix, self.typestr(*inner, name))
            }
            Some(Type::Pointer { inner, .. }) => format!("{}*{}", self.typestr(*inner, None), suffix),
            Some(Type::Array { element, byte_size }) => {
                let elem_size = self.type_size(*element).max(1);
                let count = byte_size / elem_size;
                format!("{}{}[{}]", self.typestr(*element, None), suffix, count)
            }
            Some(Type::Record(r)) => format!("{}{}", r.name, suffix),
            Some(Type::Enum { name: n, .. }) => format!("{}{}", n, suffix),
            Some(Type::Procedure { return_type, .. }) => {
                let ret = return_type
                    .map(|r| self.typestr(r, None))
                    .unwrap_or_else(|| "void".to_string());
                format!("{}(*{})()", ret, suffix)
            }
            _ => format!("/* ti={} */{}", u32::from(ti), suffix),
        }
    }

    /// `access(prefix, offset, size)` (§3): the record case delegates to the
    /// class builder; everything else is answered locally.
    pub fn access(&self, classes: &ClassStore, ti: TypeIndex, prefix: &str, offset: i64, size: u32) -> String {
        if let Some(prim) = Primitive::decode(u32::from(ti)) {
            return primitive_access(&prim, prefix, offset, size);
        }
        match self.resolve(ti) {
            Some((def_ti, Type::Record(_))) => classes.access(self, def_ti, prefix, offset, size),
            Some((_, Type::Array { element, .. })) => {
                let elem_size = self.type_size(*element).max(1) as i64;
                let index = offset / elem_size;
                let inner_offset = offset % elem_size;
                let indexed = format!("{prefix}[{index}]");
                if inner_offset == 0 && size as i64 == elem_size {
                    indexed
                } else {
                    self.access(classes, *element, &indexed, inner_offset, size)
                }
            }
            Some((_, Type::Modifier { inner, .. })) => self.access(classes, *inner, prefix, offset, size),
            Some((ti, other)) if offset == 0 && size == self.type_size(ti) => {
                let _ = other;
                prefix.to_string()
            }
            _ => reinterpret(prefix, offset, size),
        }
    }

    /// `deref(prefix, offset, size)` (§3): dereferences a pointer-like prefix.
    pub fn deref(&self, classes: &ClassStore, ti: TypeIndex, prefix: &str, offset: i64, size: u32) -> String {
        match self.resolve(ti) {
            Some((_, Type::Pointer { inner, .. })) => {
                if offset == 0 && size == self.type_size(*inner) {
                    format!("(*{prefix})")
                } else {
                    arrow_access(self, classes, *inner, prefix, offset, size)
                }
            }
            Some((_, Type::Modifier { inner, .. })) => self.deref(classes, *inner, prefix, offset, size),
            _ => format!("(*({prefix} + {offset}))"),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (TypeIndex, &Type)> {
        self.types.iter().enumerate().filter_map(|(i, t)| {
            t.as_ref()
                .map(|t| (TypeIndex::try_from(MINIMUM_TI + i as u32).unwrap(), t))
        })
    }

    pub fn iter_field_list(&self, field_list: TypeIndex) -> Vec<FieldEntry> {
        match self.get(field_list) {
            Some(Type::FieldList(fields)) => fields.clone(),
            _ => Vec::new(),
        }
    }

    pub fn iter_method_list(&self, method_list: TypeIndex) -> Vec<MethodEntry> {
        match self.get(method_list) {
            Some(Type::MethodList(methods)) => methods.clone(),
            _ => Vec::new(),
        }
    }
}

fn arrow_access(store: &TypeStore, classes: &ClassStore, inner: TypeIndex, prefix: &str, offset: i64, size: u32) -> String {
    // Member access through a pointer: `prefix->field` rather than `.field`.
    let placeholder = format!("{prefix}->");
    match store.resolve(inner) {
        Some((def_ti, Type::Record(_))) => classes.access(store, def_ti, &placeholder, offset, size),
        _ => reinterpret(&placeholder, offset, size),
    }
}

fn primitive_access(prim: &Primitive, prefix: &str, offset: i64, size: u32) -> String {
    if offset == 0 && size == prim.size() {
        prefix.to_string()
    } else {
        reinterpret(prefix, offset, size)
    }
}

pub(crate) fn reinterpret(prefix: &str, offset: i64, size: u32) -> String {
    let ty = match size {
        1 => "uint8_t",
        2 => "uint16_t",
        4 => "uint32_t",
        8 => "uint64_t",
        _ => "uint8_t",
    };
    format!("(*({ty}*)((char*)&{prefix} + {offset}))")
}

fn record_kind(record: &TypeRecord) -> Option<RecordKind> {
    match record {
        TypeRecord::Class(_) => Some(RecordKind::Class),
        TypeRecord::Struct(_) => Some(RecordKind::Struct),
        TypeRecord::Interface(_) => Some(RecordKind::Interface),
        TypeRecord::Union(_) => Some(RecordKind::Union),
        TypeRecord::Enum(_) => Some(RecordKind::Enum),
        _ => None,
    }
}

fn struct_record(kind: RecordKind, r: &StructRecord) -> Type {
    Type::Record(Record {
        kind,
        name: r.name.as_ref().to_string(),
        byte_size: integer_value(&r.size).max(0) as u32,
        forward_ref: r.properties.is_forward_ref(),
        field_list: r.field_list,
        vtable_shape: r.vtable_shape,
        derived_list: r.derivation_list,
        definition: None,
    })
}

fn union_record(r: &UnionRecord) -> Type {
    Type::Record(Record {
        kind: RecordKind::Union,
        name: r.name.as_ref().to_string(),
        byte_size: integer_value(&r.size).max(0) as u32,
        forward_ref: r.properties.is_forward_ref(),
        field_list: r.field_list,
        vtable_shape: None,
        derived_list: None,
        definition: None,
    })
}

fn convert_record(record: &TypeRecord) -> Option<Type> {
    if let Some(kind) = record_kind(record) {
        return Some(match (kind, record) {
            (RecordKind::Union, TypeRecord::Union(r)) => union_record(r),
            (_, TypeRecord::Class(r)) => struct_record(kind, r),
            (_, TypeRecord::Struct(r)) => struct_record(kind, r),
            (_, TypeRecord::Interface(r)) => struct_record(kind, r),
            (_, TypeRecord::Enum(r)) => {
                return Some(Type::Enum {
                    name: r.name.as_ref().to_string(),
                    underlying: r.underlying_type,
                    field_list: r.field_list,
                })
            }
            _ => unreachable!(),
        });
    }
    match record {
        TypeRecord::Modifier {
            modified_type,
            properties,
        } => Some(Type::Modifier {
            is_const: properties.is_const(),
            is_volatile: properties.is_volatile(),
            is_unaligned: properties.is_unaligned(),
            inner: *modified_type,
        }),
        TypeRecord::Pointer { referent, properties, .. } => Some(Type::Pointer {
            inner: *referent,
            width: properties.size() as u32,
        }),
        TypeRecord::Array {
            element_type,
            dimensions,
            ..
        } => Some(Type::Array {
            element: *element_type,
            byte_size: dimensions.first().map(integer_value).unwrap_or(0).max(0) as u32,
        }),
        TypeRecord::Procedure {
            return_type,
            calling_conv,
            arg_list,
            ..
        } => Some(Type::Procedure {
            return_type: *return_type,
            calling_conv: *calling_conv,
            arg_list: *arg_list,
        }),
        TypeRecord::MemberFunction {
            return_type,
            class_type,
            this_type,
            calling_conv,
            arg_list,
            ..
        } => Some(Type::MemberFunction {
            class_type: *class_type,
            return_type: *return_type,
            this_type: *this_type,
            calling_conv: *calling_conv,
            arg_list: *arg_list,
        }),
        TypeRecord::BitField {
            field_type,
            bit_size,
            bit_offset,
        } => Some(Type::Bitfield {
            underlying: *field_type,
            length: *bit_size,
            position: *bit_offset,
        }),
        TypeRecord::VfTableShape(shape) => Some(Type::VtableShape(shape.slots.clone())),
        TypeRecord::ArgList { arg_list, .. } => Some(Type::ArgList(
            arg_list.iter().filter_map(|&i| TypeIndex::try_from(i).ok()).collect(),
        )),
        TypeRecord::MethodList { methods } => Some(Type::MethodList(
            methods
                .iter()
                .map(|m: &MethodListEntry| MethodEntry {
                    ty: Some(m.method_type),
                    vtable_offset: m.vtable_offset,
                })
                .collect(),
        )),
        TypeRecord::FieldList { fields } => Some(Type::FieldList(
            fields.iter().filter_map(convert_field_entry).collect(),
        )),
        _ => None,
    }
}

fn convert_field_entry(record: &TypeRecord) -> Option<FieldEntry> {
    match record {
        TypeRecord::BaseClass(BaseClasRecord { base_type, offset, .. }) => Some(FieldEntry::Base {
            base: *base_type,
            offset: integer_value(offset),
        }),
        TypeRecord::BaseInterface(BaseClasRecord { base_type, offset, .. }) => Some(FieldEntry::Base {
            base: *base_type,
            offset: integer_value(offset),
        }),
        TypeRecord::VirtualBaseClass(VirtualBaseClasRecord {
            base_type,
            vbptr_offset,
            ..
        }) => Some(FieldEntry::VirtualBase {
            base: *base_type,
            vbptr_offset: integer_value(vbptr_offset),
            indirect: false,
        }),
        TypeRecord::IndirectVirtualBaseClass(VirtualBaseClasRecord {
            base_type,
            vbptr_offset,
            ..
        }) => Some(FieldEntry::VirtualBase {
            base: *base_type,
            vbptr_offset: integer_value(vbptr_offset),
            indirect: true,
        }),
        TypeRecord::DataMember {
            field_type,
            offset,
            name,
            ..
        } => Some(FieldEntry::Member {
            ty: *field_type,
            offset: integer_value(offset),
            name: name.as_ref().to_string(),
        }),
        TypeRecord::StaticDataMember { field_type, name, .. } => Some(FieldEntry::StaticMember {
            ty: *field_type,
            name: name.as_ref().to_string(),
        }),
        TypeRecord::OneMethod {
            method_type,
            name,
            vtable_offset,
            ..
        } => Some(FieldEntry::OneMethod {
            ty: *method_type,
            name: name.as_ref().to_string(),
            vtable_offset: *vtable_offset,
        }),
        TypeRecord::OverloadedMethod { method_list, name, .. } => Some(FieldEntry::OverloadedMethods {
            name: name.as_ref().to_string(),
            method_list: *method_list,
        }),
        TypeRecord::NestedType {
            nested_type, name, ..
        } => Some(FieldEntry::NestedType {
            ty: *nested_type,
            name: name.as_ref().to_string(),
        }),
        TypeRecord::VFPtr { table_type, .. } => Some(FieldEntry::VfuncTab {
            table_type: *table_type,
        }),
        TypeRecord::Enumerator { value, name, .. } => Some(FieldEntry::Member {
            ty: None,
            offset: integer_value(value),
            name: name.as_ref().to_string(),
        }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitive_pointer_is_derived_mechanically() {
        let direct = Primitive::decode(0x0074).unwrap(); // T_INT4
        assert_eq!(direct.size(), 4);
        let near32 = Primitive::decode(0x0474).unwrap(); // T_32PINT4
        assert_eq!(near32.size(), 4);
        let far32 = Primitive::decode(0x0574).unwrap();
        assert_eq!(far32.size(), 6);
    }

    #[test]
    fn reinterpret_cast_carries_offset_and_size() {
        let out = reinterpret("obj", 4, 2);
        assert!(out.contains("uint16_t"));
        assert!(out.contains('4'));
    }
}
