//! The class builder (§4.3): walks a record's field list once, building an
//! offset-keyed layout tree plus ordered field/base/method lists. Overlap in
//! the layout tree is a type-store invariant violation unless the record's
//! fully-qualified name is on the configured allow-list (§9 Open Questions).

use std::collections::HashMap;

use tracing::warn;

use crate::codeview::types::MemberAccess;
use crate::config::Config;
use crate::result::{Error, Result};
use crate::typestore::{FieldEntry, Record, RecordKind, Type, TypeStore};
use crate::TypeIndex;

#[derive(Debug, Clone)]
pub enum LayoutSlot {
    Field(usize),
    VfPtr,
}

#[derive(Debug, Clone)]
pub struct Field {
    pub name: String,
    pub ty: Option<TypeIndex>,
    pub offset: i64,
    pub access: MemberAccess,
    /// The direct base this field was flattened in from, `base_offset +=
    /// base.offset` already folded into `offset` (§4.3). `None` for a
    /// member the record declares itself.
    pub owner: Option<TypeIndex>,
}

#[derive(Debug, Clone)]
pub struct StaticField {
    pub name: String,
    pub ty: TypeIndex,
}

#[derive(Debug, Clone)]
pub struct BaseInfo {
    pub ty: TypeIndex,
    pub offset: i64,
    pub virtual_base: bool,
}

#[derive(Debug, Clone)]
pub struct Method {
    pub name: String,
    pub ty: TypeIndex,
    pub vtable_offset: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct NestedType {
    pub name: String,
    pub ty: TypeIndex,
}

#[derive(Debug, Clone)]
pub struct VtableInfo {
    pub table_type: TypeIndex,
    pub offset: i64,
}

#[derive(Debug, Clone)]
pub struct Class {
    pub name: String,
    pub kind: RecordKind,
    pub byte_size: u32,
    pub layout: crate::intervals::IntervalTree<LayoutSlot>,
    pub fields: Vec<Field>,
    pub statics: Vec<StaticField>,
    pub bases: Vec<BaseInfo>,
    pub methods: Vec<Method>,
    pub nested_types: Vec<NestedType>,
    pub vtable: Option<VtableInfo>,
}

/// All classes built from a [`TypeStore`], keyed by type index.
#[derive(Debug, Default)]
pub struct ClassStore {
    classes: HashMap<TypeIndex, Class>,
}

impl ClassStore {
    pub fn build(types: &TypeStore, config: &Config) -> Self {
        let mut cache: HashMap<TypeIndex, Class> = HashMap::new();
        for (ti, ty) in types.iter() {
            let Type::Record(record) = ty else { continue };
            if record.forward_ref || cache.contains_key(&ti) {
                continue;
            }
            if let Err(err) = build_class_cached(types, config, ti, &mut cache) {
                warn!(record = %record.name, error = %err, "skipping class layout");
            }
        }
        Self { classes: cache }
    }

    pub fn get(&self, ti: TypeIndex) -> Option<&Class> {
        self.classes.get(&ti)
    }

    /// `access(prefix, offset, size)` for a record type (§3): resolves the
    /// single layout slot covering `[offset, offset+size)` and either names
    /// the field directly or recurses into a base subobject.
    pub fn access(&self, store: &TypeStore, ti: TypeIndex, prefix: &str, offset: i64, size: u32) -> String {
        let Some(class) = self.get(ti) else {
            return crate::typestore::reinterpret(prefix, offset, size);
        };
        let point = offset.max(0) as u32;
        let slot = class
            .layout
            .query_point(point)
            .map(|(_, slot)| slot)
            .next();
        match slot {
            Some(LayoutSlot::Field(idx)) => {
                let field = &class.fields[idx];
                let child_offset = offset - field.offset;
                let child_prefix = format!("{prefix}.{}", field.name);
                match field.ty {
                    Some(ty) if child_offset == 0 && size == store.type_size(ty) => child_prefix,
                    Some(ty) => store.access(self, ty, &child_prefix, child_offset, size),
                    None => child_prefix,
                }
            }
            Some(LayoutSlot::VfPtr) => format!("{prefix}.__vfptr"),
            None => crate::typestore::reinterpret(prefix, offset, size),
        }
    }
}

/// Builds (and caches) the `Class` for `ti`, recursing into its non-virtual
/// bases first so their flattened field lists are available to fold into
/// this one (§4.3). Returns a cheap clone when `ti` is already cached,
/// which also covers a base shared by several derived records.
fn build_class_cached(types: &TypeStore, config: &Config, ti: TypeIndex, cache: &mut HashMap<TypeIndex, Class>) -> Result<Class> {
    if let Some(class) = cache.get(&ti) {
        return Ok(class.clone());
    }
    let Some((_, Type::Record(record))) = types.resolve(ti) else {
        return Err(Error::TypeStoreInvariant(format!("{ti:?} does not resolve to a record")));
    };
    let record = record.clone();
    let class = build_class(types, config, &record, cache)?;
    cache.insert(ti, class.clone());
    Ok(class)
}

/// Flattens a base subobject's direct fields into the derived layout at
/// `base_offset`, tagging each with `owner: Some(base)` so the emitter can
/// tell a member declared by the record itself from one inherited (§4.3).
/// Only non-virtual bases reach this: a virtual base is found through its
/// vbase pointer instead and never folded into the static layout.
fn flatten_base_fields(base_class: &Class, base: TypeIndex, base_offset: i64) -> Vec<Field> {
    base_class
        .fields
        .iter()
        .map(|f| Field {
            name: f.name.clone(),
            ty: f.ty,
            offset: base_offset + f.offset,
            access: f.access,
            owner: Some(base),
        })
        .collect()
}

fn build_class(types: &TypeStore, config: &Config, record: &Record, cache: &mut HashMap<TypeIndex, Class>) -> Result<Class> {
    let mut layout = crate::intervals::IntervalTree::new();
    let mut fields = Vec::new();
    let mut statics = Vec::new();
    let mut bases = Vec::new();
    let mut methods = Vec::new();
    let mut nested_types = Vec::new();
    let mut vtable = None;

    let Some(field_list) = record.field_list else {
        return Ok(Class {
            name: record.name.clone(),
            kind: record.kind,
            byte_size: record.byte_size,
            layout,
            fields,
            statics,
            bases,
            methods,
            nested_types,
            vtable,
        });
    };

    for entry in types.iter_field_list(field_list) {
        match entry {
            FieldEntry::Base { base, offset } => {
                let base_class = build_class_cached(types, config, base, cache)?;
                for flattened in flatten_base_fields(&base_class, base, offset) {
                    let size = flattened.ty.map(|t| types.type_size(t)).unwrap_or(1);
                    let range = flattened.offset as u32..(flattened.offset as u32 + size.max(1));
                    check_overlap(&layout, &range, config, &record.name)?;
                    layout.insert(range, LayoutSlot::Field(fields.len()));
                    fields.push(flattened);
                }
                bases.push(BaseInfo {
                    ty: base,
                    offset,
                    virtual_base: false,
                });
            }
            FieldEntry::VirtualBase { base, vbptr_offset, .. } => {
                // Reached only through the vbase pointer; not placed in the
                // direct-offset layout tree.
                bases.push(BaseInfo {
                    ty: base,
                    offset: vbptr_offset,
                    virtual_base: true,
                });
            }
            FieldEntry::Member { ty, offset, name } => {
                let size = ty.map(|t| types.type_size(t)).unwrap_or(1);
                let range = offset as u32..(offset as u32 + size.max(1));
                check_overlap(&layout, &range, config, &record.name)?;
                layout.insert(range, LayoutSlot::Field(fields.len()));
                fields.push(Field {
                    name,
                    ty,
                    offset,
                    access: MemberAccess::Public,
                    owner: None,
                });
            }
            FieldEntry::StaticMember { ty, name } => statics.push(StaticField { name, ty }),
            FieldEntry::OneMethod { ty, name, vtable_offset } => methods.push(Method {
                name,
                ty,
                vtable_offset,
            }),
            FieldEntry::OverloadedMethods { name, method_list } => {
                for entry in types.iter_method_list(method_list) {
                    if let Some(ty) = entry.ty {
                        methods.push(Method {
                            name: name.clone(),
                            ty,
                            vtable_offset: entry.vtable_offset,
                        });
                    }
                }
            }
            FieldEntry::NestedType { ty, name } => nested_types.push(NestedType { name, ty }),
            FieldEntry::VfuncTab { table_type } => {
                let range = 0u32..4;
                check_overlap(&layout, &range, config, &record.name)?;
                layout.insert(range, LayoutSlot::VfPtr);
                vtable = Some(VtableInfo {
                    table_type,
                    offset: 0,
                });
            }
        }
    }

    Ok(Class {
        name: record.name.clone(),
        kind: record.kind,
        byte_size: record.byte_size,
        layout,
        fields,
        statics,
        bases,
        methods,
        nested_types,
        vtable,
    })
}

fn check_overlap(
    layout: &crate::intervals::IntervalTree<LayoutSlot>,
    range: &std::ops::Range<u32>,
    config: &Config,
    record_name: &str,
) -> Result<()> {
    if layout.overlaps(range) && !config.allows_overlap(record_name) {
        return Err(Error::TypeStoreInvariant(format!(
            "{record_name}: member at {:?} overlaps existing layout",
            range
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::typestore::RecordKind;

    fn stub_record(name: &str) -> Record {
        Record {
            kind: RecordKind::Struct,
            name: name.to_string(),
            byte_size: 8,
            forward_ref: false,
            field_list: None,
            vtable_shape: None,
            derived_list: None,
            definition: None,
        }
    }

    #[test]
    fn disallowed_overlap_is_rejected() {
        let mut layout = crate::intervals::IntervalTree::new();
        layout.insert(0..4, LayoutSlot::Field(0));
        let config = Config::new("a.exe".into(), "a.pdb".into(), "out".into());
        let err = check_overlap(&layout, &(2..6), &config, "MyStruct").unwrap_err();
        assert!(matches!(err, Error::TypeStoreInvariant(_)));
    }

    #[test]
    fn allow_listed_overlap_is_tolerated() {
        let mut layout = crate::intervals::IntervalTree::new();
        layout.insert(0..4, LayoutSlot::Field(0));
        let mut config = Config::new("a.exe".into(), "a.pdb".into(), "out".into());
        config.overlap_allow_list.push("_DDBLTFX".to_string());
        check_overlap(&layout, &(2..6), &config, "_DDBLTFX").unwrap();
    }

    #[test]
    fn record_without_field_list_still_builds() {
        let types = stub_record("Empty");
        assert_eq!(types.byte_size, 8);
    }

    fn empty_class(name: &str) -> Class {
        Class {
            name: name.to_string(),
            kind: RecordKind::Struct,
            byte_size: 8,
            layout: crate::intervals::IntervalTree::new(),
            fields: Vec::new(),
            statics: Vec::new(),
            bases: Vec::new(),
            methods: Vec::new(),
            nested_types: Vec::new(),
            vtable: None,
        }
    }

    #[test]
    fn flatten_base_fields_offsets_by_base_offset_and_tags_owner() {
        let base_ti = crate::TypeIndex::try_from(0x1000u32).unwrap();
        let mut base = empty_class("Base");
        base.fields.push(Field {
            name: "x".to_string(),
            ty: None,
            offset: 0,
            access: MemberAccess::Public,
            owner: None,
        });
        base.fields.push(Field {
            name: "y".to_string(),
            ty: None,
            offset: 4,
            access: MemberAccess::Public,
            owner: None,
        });

        let flattened = flatten_base_fields(&base, base_ti, 8);
        assert_eq!(flattened.len(), 2);
        assert_eq!(flattened[0].name, "x");
        assert_eq!(flattened[0].offset, 8);
        assert_eq!(flattened[0].owner, Some(base_ti));
        assert_eq!(flattened[1].name, "y");
        assert_eq!(flattened[1].offset, 12);
        assert_eq!(flattened[1].owner, Some(base_ti));
    }
}
