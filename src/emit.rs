//! Text emission (§4.6.4, §6 "Emitted source"): renders recovered classes
//! and functions as C/C++-ish surface syntax, falling back to annotated
//! inline assembly wherever recovery didn't fully match.

use std::fmt::Write as _;

use crate::class::{BaseInfo, Class};
use crate::codeview::types::MemberAccess;
use crate::function::{AnalyzedBlock, Function as Analysis};
use crate::ir::{Cond, Expr};
use crate::program::Function as FunctionItem;
use crate::scope::Scope;
use crate::statement::{Loop, ReturnKind, Statement};
use crate::typestore::{RecordKind, Type, TypeStore};
use crate::x86::SegOverride;

fn access_keyword(access: MemberAccess) -> &'static str {
    match access {
        MemberAccess::Private => "private",
        MemberAccess::Protected => "protected",
        MemberAccess::Public | MemberAccess::None => "public",
    }
}

fn render_base(types: &TypeStore, base: &BaseInfo) -> String {
    let name = types.typestr(base.ty, None);
    if base.virtual_base {
        format!("virtual public {name}")
    } else {
        format!("public {name}")
    }
}

/// Renders one record's declaration (§6 "Emitted source"): the
/// `class`/`struct`/`union` header, base list, nested typedefs, and members.
pub fn render_class(types: &TypeStore, class: &Class) -> String {
    let keyword = match class.kind {
        RecordKind::Class => "class",
        RecordKind::Struct => "struct",
        RecordKind::Interface => "__interface",
        RecordKind::Union => "union",
        RecordKind::Enum => "enum",
    };

    let mut out = String::new();
    write!(out, "{keyword} {}", class.name).unwrap();
    if !class.bases.is_empty() {
        let bases: Vec<String> = class.bases.iter().map(|b| render_base(types, b)).collect();
        write!(out, " : {}", bases.join(", ")).unwrap();
    }
    out.push_str(" {\n");

    for nested in &class.nested_types {
        writeln!(out, "    typedef {};", types.typestr(nested.ty, Some(&nested.name))).unwrap();
    }
    if class.vtable.is_some() {
        out.push_str("    void** __vfptr;\n");
    }
    for field in class.fields.iter().filter(|f| f.owner.is_none()) {
        let decl = match field.ty {
            Some(ty) => types.typestr(ty, Some(&field.name)),
            None => format!("/* unresolved */ {}", field.name),
        };
        writeln!(out, "    {}: {decl}; // offset {:#x}", access_keyword(field.access), field.offset).unwrap();
    }
    for method in &class.methods {
        writeln!(out, "    {};", types.typestr(method.ty, Some(&method.name))).unwrap();
    }
    writeln!(out, "}}; // size {:#x}", class.byte_size).unwrap();
    out
}

fn register_name(reg: zydis::Register) -> String {
    format!("{reg:?}").to_lowercase()
}

fn segment_prefix(seg: SegOverride) -> &'static str {
    match seg {
        SegOverride::None => "",
        SegOverride::Fs => "fs:",
        SegOverride::Gs => "gs:",
    }
}

/// Renders an `S_BLOCK32` local by its declared name rather than a raw
/// `[ebp+n]` offset, falling back to the raw displacement when the scope has
/// no local covering it (e.g. a spilled temporary, not a source-level var).
fn local_name(scope: &Scope, bp_disp: i32) -> String {
    let key = (bp_disp as i64 - i32::MIN as i64) as u32;
    match scope.frame.find_point(key) {
        Some(local) if !local.hidden => local.name.clone(),
        Some(local) => format!("/* {} */ local_{bp_disp:#x}", local.name),
        None => format!("local_{bp_disp:#x}"),
    }
}

pub fn render_expr(expr: &Expr, scope: &Scope) -> String {
    match expr {
        Expr::Reg(r) => register_name(*r),
        Expr::Const(v) => v.to_string(),
        Expr::LocalVar { bp_disp, .. } => local_name(scope, *bp_disp),
        Expr::MemBaseDisp { base, disp, seg, .. } => match base {
            Some(b) => format!("*({}{}{:+#x})", segment_prefix(*seg), register_name(*b), disp),
            None => match u32::try_from(*disp).ok().and_then(|va| scope.static_at(&[], va)) {
                Some(local) => local.name.clone(),
                None => format!("*({}{:#x})", segment_prefix(*seg), disp),
            },
        },
        Expr::MemIndexed { base, index, scale, disp, .. } => {
            let base_str = base.map(register_name).unwrap_or_default();
            format!("*({base_str}+{}*{scale}{disp:+#x})", register_name(*index))
        }
        Expr::SegOverride(seg, inner) => format!("{}{}", segment_prefix(*seg), render_expr(inner, scope)),
        Expr::FunctionRef(va) => format!("sub_{va:08x}"),
        Expr::BasicBlockRef(va) => format!("loc_{va:08x}"),
        Expr::SignExtend(_, inner) | Expr::ZeroExtend(_, inner) => render_expr(inner, scope),
        Expr::Lea(inner) => format!("&{}", render_expr(inner, scope)),
        Expr::UnaryOp(op, inner) => format!("{op}{}", render_expr(inner, scope)),
        Expr::BinaryOp(op, a, b) => format!("({} {op} {})", render_expr(a, scope), render_expr(b, scope)),
        Expr::Pushed(inner) => render_expr(inner, scope),
        Expr::Call(call) => {
            let args: Vec<String> = call.args.iter().map(|a| render_expr(a, scope)).collect();
            format!("{}({})", render_expr(&call.target, scope), args.join(", "))
        }
    }
}

pub fn render_cond(cond: &Cond, scope: &Scope) -> String {
    let bin = |op: &str, a: &Expr, b: &Expr| format!("{} {op} {}", render_expr(a, scope), render_expr(b, scope));
    match cond {
        Cond::Eq(a, b) => bin("==", a, b),
        Cond::Ne(a, b) => bin("!=", a, b),
        Cond::Gt(a, b) => bin(">", a, b),
        Cond::Ge(a, b) => bin(">=", a, b),
        Cond::Lt(a, b) => bin("<", a, b),
        Cond::Le(a, b) => bin("<=", a, b),
        Cond::IsZero(e) => format!("!{}", render_expr(e, scope)),
        Cond::IsNonZero(e) => render_expr(e, scope),
        Cond::BitsClear(a, b) => format!("!({} & {})", render_expr(a, scope), render_expr(b, scope)),
        Cond::BitsSet(a, b) => format!("({} & {})", render_expr(a, scope), render_expr(b, scope)),
        Cond::Negative(e) => format!("{} < 0", render_expr(e, scope)),
        Cond::ErrorCond(m) => format!("/* ErrorCond({m:?}) */ true"),
    }
}

fn statement_text(stmt: &Statement, scope: &Scope) -> String {
    match stmt {
        Statement::Assign(dst, src) => format!("{} = {}", render_expr(dst, scope), render_expr(src, scope)),
        Statement::Modify(op, dst, src) => format!("{} {op}= {}", render_expr(dst, scope), render_expr(src, scope)),
        Statement::Increment(e) => format!("{}++", render_expr(e, scope)),
        Statement::Decrement(e) => format!("{}--", render_expr(e, scope)),
        Statement::ExprStatement(e) => render_expr(e, scope),
        Statement::Jump(target) => format!("goto loc_{target:08x}"),
    }
}

fn render_statement(out: &mut String, stmt: &Statement, scope: &Scope) {
    writeln!(out, "    {};", statement_text(stmt, scope)).unwrap();
}

fn render_analyzed_block(out: &mut String, block: &AnalyzedBlock, scope: &Scope) {
    writeln!(out, "loc_{:08x}:", block.start).unwrap();
    if !block.matched.fully_matched {
        writeln!(out, "    __asm {{ /* couldn't fully match block {:#x}..{:#x} */ }};", block.start, block.end).unwrap();
    }
    for stmt in &block.matched.statements {
        render_statement(out, stmt, scope);
    }
}

fn loop_body(l: &Loop) -> &[u32] {
    match l {
        Loop::While { body, .. } | Loop::DoWhile { body, .. } | Loop::For { body, .. } | Loop::Infinite { body, .. } => body,
    }
}

/// Renders a run of sibling blocks (§4.6.3 "loops recurse"), nesting a loop's
/// body inside its `while`/`do`/`for`/labelled-block construct instead of
/// dumping every block as one flat sequence. `starts` is a contiguous slice
/// of block addresses (the function's top level, or one loop's own body);
/// since a loop's `body` is itself a contiguous run of the same address
/// space, recursing into it just narrows the slice.
fn render_block_run(
    out: &mut String,
    starts: &[u32],
    blocks: &std::collections::BTreeMap<u32, &AnalyzedBlock>,
    loops_by_head: &std::collections::HashMap<u32, &Loop>,
    scope: &Scope,
) {
    let mut i = 0;
    while i < starts.len() {
        let start = starts[i];
        if let Some(&l) = loops_by_head.get(&start) {
            let body = loop_body(l);
            render_loop(out, l, body, blocks, loops_by_head, scope);
            i += body.len().max(1);
            continue;
        }
        if let Some(&block) = blocks.get(&start) {
            render_analyzed_block(out, block, scope);
        }
        i += 1;
    }
}

fn render_loop(
    out: &mut String,
    l: &Loop,
    body: &[u32],
    blocks: &std::collections::BTreeMap<u32, &AnalyzedBlock>,
    loops_by_head: &std::collections::HashMap<u32, &Loop>,
    scope: &Scope,
) {
    // `body[0]` is always the loop's own head; render it as a plain block
    // (whatever statements precede the recovered condition test) rather than
    // re-dispatching through `loops_by_head`, which would just match this
    // same loop again and recurse forever.
    let rest = body.get(1..).unwrap_or(&[]);
    let render_head_then_rest = |out: &mut String| {
        if let Some(&block) = body.first().and_then(|head| blocks.get(head)) {
            render_analyzed_block(out, block, scope);
        }
        render_block_run(out, rest, blocks, loops_by_head, scope);
    };
    match l {
        Loop::While { cond, .. } => {
            writeln!(out, "    while ({}) {{", render_cond(cond, scope)).unwrap();
            render_head_then_rest(out);
            out.push_str("    }\n");
        }
        Loop::DoWhile { cond, .. } => {
            out.push_str("    do {\n");
            render_head_then_rest(out);
            writeln!(out, "    }} while ({});", render_cond(cond, scope)).unwrap();
        }
        Loop::For { init, cond, step, .. } => {
            let init_str = init.as_ref().map(|s| statement_text(s, scope)).unwrap_or_default();
            let step_str = step.as_ref().map(|s| statement_text(s, scope)).unwrap_or_default();
            writeln!(out, "    for ({init_str}; {}; {step_str}) {{", render_cond(cond, scope)).unwrap();
            render_head_then_rest(out);
            out.push_str("    }\n");
        }
        Loop::Infinite { head, .. } => {
            writeln!(out, "    LOOP_{head:08x}: {{").unwrap();
            render_head_then_rest(out);
            out.push_str("    }\n");
        }
    }
}

/// Renders one function per §6/§7: a provenance comment, the signature
/// line, then either recovered statements/loops or, when the body could not
/// be analyzed or its prologue/epilogue didn't match the fixed shape, an
/// annotated fallback.
pub fn render_function(item: &FunctionItem, analysis: Option<&Analysis>, types: &TypeStore, exe_name: &str) -> String {
    let mut out = String::new();
    match analysis {
        None => {
            writeln!(out, "// FUNCTION: {exe_name} {:#010x}", item.va).unwrap();
            writeln!(out, "// Couldn't analyze function body").unwrap();
            writeln!(out, "{} {{ __asm {{ /* not decoded */ }}; }}", function_signature(item, types)).unwrap();
            return out;
        }
        Some(a) if a.name.starts_with("$") || a.name.starts_with("??_") => {
            writeln!(out, "// SYNTHETIC: {}", a.name).unwrap();
        }
        Some(_) => {
            writeln!(out, "// FUNCTION: {exe_name} {:#010x}", item.va).unwrap();
        }
    }

    let analysis = analysis.unwrap();
    writeln!(out, "{} {{", function_signature(item, types)).unwrap();

    if !analysis.is_lifted() {
        writeln!(out, "    // Couldn't match prolog/epilog").unwrap();
        for block in &analysis.blocks {
            render_analyzed_block(&mut out, block, &analysis.scope);
        }
        out.push_str("}\n");
        return out;
    }

    let starts: Vec<u32> = analysis.blocks.iter().map(|b| b.start).collect();
    let blocks_by_start: std::collections::BTreeMap<u32, &AnalyzedBlock> =
        analysis.blocks.iter().filter(|b| !b.inlined).map(|b| (b.start, b)).collect();
    let loops_by_head: std::collections::HashMap<u32, &Loop> = analysis.loops.iter().map(|l| (loop_body(l)[0], l)).collect();
    render_block_run(&mut out, &starts, &blocks_by_start, &loops_by_head, &analysis.scope);

    match &analysis.return_kind {
        Some(ReturnKind::Void) => writeln!(out, "    return;").unwrap(),
        Some(ReturnKind::Value(e)) => writeln!(out, "    return {};", render_expr(e, &analysis.scope)).unwrap(),
        Some(ReturnKind::Ternary { cond, then_expr, else_expr }) => writeln!(
            out,
            "    return {} ? {} : {};",
            render_cond(cond, &analysis.scope),
            render_expr(then_expr, &analysis.scope),
            render_expr(else_expr, &analysis.scope)
        )
        .unwrap(),
        None => {}
    }

    out.push_str("}\n");
    out
}

fn function_signature(item: &FunctionItem, types: &TypeStore) -> String {
    let return_type = item.signature.and_then(|ti| match types.get(ti) {
        Some(Type::Procedure { return_type, .. }) => Some(*return_type),
        Some(Type::MemberFunction { return_type, .. }) => Some(*return_type),
        _ => None,
    });
    match return_type.flatten() {
        Some(ret) => types.typestr(ret, Some(&format!("{}()", item.name))),
        None => format!("void {}()", item.name),
    }
}

/// `// Switch table` / `// Switch pointers` comments for a recovered jump
/// table (§6 "Emitted source").
pub fn render_switch_table(target: u32, entries: &[u32]) -> String {
    let mut out = String::new();
    writeln!(out, "// Switch table at {target:#010x}").unwrap();
    out.push_str("// Switch pointers: ");
    let labels: Vec<String> = entries.iter().map(|e| format!("loc_{e:08x}")).collect();
    out.push_str(&labels.join(", "));
    out.push('\n');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Expr;
    use std::ops::Range;

    fn empty_scope() -> Scope {
        Scope {
            code_range: Range { start: 0, end: 0 },
            ..Scope::default()
        }
    }

    #[test]
    fn renders_constant_return() {
        let scope = empty_scope();
        assert_eq!(render_expr(&Expr::Const(0), &scope), "0");
    }

    #[test]
    fn renders_ternary_condition() {
        let scope = empty_scope();
        let cond = Cond::Eq(Expr::Reg(zydis::Register::EAX), Expr::Const(0));
        assert_eq!(render_cond(&cond, &scope), "eax == 0");
    }

    #[test]
    fn absolute_memory_reference_resolves_to_static_local_name() {
        let mut scope = empty_scope();
        scope.statics.push(crate::scope::StaticLocal {
            name: "g_counter".to_string(),
            ty: None,
            va: 0x10_0040,
        });
        let expr = Expr::MemBaseDisp { size: 32, base: None, disp: 0x10_0040, seg: SegOverride::None };
        assert_eq!(render_expr(&expr, &scope), "g_counter");
    }
}
