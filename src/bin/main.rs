//! CLI entry point (§6 "CLI surface"): wires `Config` → `tracing_subscriber`
//! → the full pipeline → the emitted source tree written to `output_dir`.
//! The binary is the only place the library's pipeline stages are driven
//! end to end; the stages themselves stay independently testable.

use std::fs;
use std::io;
use std::path::Path;

use clap::Parser;
use declio::ctx::Endian;
use declio::{Decode, Encode};
use object::{Object, ObjectSection};
use tracing::{info, warn};

use retrograde_decompiler::cache::{CacheKey, SnapshotCache};
use retrograde_decompiler::class::ClassStore;
use retrograde_decompiler::codeview::symbols::SymbolRecord;
use retrograde_decompiler::config::Config;
use retrograde_decompiler::module::Module;
use retrograde_decompiler::program::{self, Item, Program};
use retrograde_decompiler::result::{Error, Result};
use retrograde_decompiler::typestore::{Type, TypeStore};
use retrograde_decompiler::x86::Decoder;
use retrograde_decompiler::{function, emit, PdbFile, TypeIndex};

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let config = Config::parse();

    let cache = (!config.no_cache)
        .then(|| SnapshotCache::new(config.cache_dir.clone().unwrap_or_else(SnapshotCache::default_dir)));
    let key = CacheKey::compute(&config.pdb_path, &config.exe_path).ok();

    if let (Some(cache), Some(key)) = (&cache, &key) {
        if let Some(snapshot) = cache.load::<Snapshot>(key) {
            info!("serving cached snapshot, skipping re-parse");
            return write_files(&config.output_dir, &snapshot.files);
        }
    }

    let files = run_pipeline(&config)?;

    if let (Some(cache), Some(key)) = (&cache, &key) {
        let snapshot = Snapshot { files: files.clone() };
        if let Err(err) = cache.store(key, &snapshot) {
            warn!(error = %err, "failed to persist snapshot cache");
        }
    }

    write_files(&config.output_dir, &files)
}

fn run_pipeline(config: &Config) -> Result<Vec<(String, String)>> {
    let mut pdb = PdbFile::open(fs::File::open(&config.pdb_path)?)?;
    let exe_bytes = fs::read(&config.exe_path)?;
    let obj = object::File::parse(&*exe_bytes).map_err(|e| Error::DecodeFailed(e.to_string()))?;

    let dbi = pdb.get_dbi()?;
    let tpi = pdb.get_tpi()?;
    let types = TypeStore::build(&tpi);
    let classes = ClassStore::build(&types, config);

    let section_headers = pdb.get_section_headers(&dbi)?;
    let global_symbols = pdb.get_symbols(&dbi)?;

    let mut modules: Vec<(u16, Module)> = Vec::new();
    for (index, module_info) in dbi.modules().iter().enumerate() {
        match pdb.get_module(module_info) {
            Ok(module) => modules.push((index as u16, module)),
            Err(err) => warn!(module = %module_info.module_name.as_ref(), error = %err, "skipping module"),
        }
    }

    let prog = Program::build(&dbi, &section_headers, &global_symbols, &modules);
    let decoder = Decoder::new()?;
    let exe_name = config
        .exe_path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    let mut files = Vec::new();

    for (ti, ty) in types.iter() {
        if let Type::Record(record) = ty {
            if !record.forward_ref {
                if let Some(class) = classes.get(ti) {
                    files.push((format!("types/{}.h", sanitize(&class.name)), emit::render_class(&types, class)));
                }
            }
        }
    }

    for item in prog.iter_items() {
        let Item::Function(func) = item else { continue };
        let records = function_records(&modules, func.module, func.va, &prog);
        let is_void = is_void_return(&types, func.signature);
        let analysis = function_bytes(&obj, func.va, func.size).and_then(|code| {
            match function::analyze(func.name.clone(), func.va, code, records, &decoder, is_void, &prog.sections) {
                Ok(analysis) => Some(analysis),
                Err(err) => {
                    warn!(function = %func.name, address = format_args!("{:#x}", func.va), error = %err, "couldn't analyze function body");
                    None
                }
            }
        });
        let text = emit::render_function(func, analysis.as_ref(), &types, &exe_name);
        files.push((format!("functions/{}.cpp", sanitize(&func.name)), text));
    }

    Ok(files)
}

fn sanitize(name: &str) -> String {
    name.chars().map(|c| if c.is_alphanumeric() || c == '_' { c } else { '_' }).collect()
}

fn is_void_return(types: &TypeStore, signature: Option<TypeIndex>) -> bool {
    let return_type = signature.and_then(|ti| match types.get(ti) {
        Some(Type::Procedure { return_type, .. }) => Some(*return_type),
        Some(Type::MemberFunction { return_type, .. }) => Some(*return_type),
        _ => None,
    });
    return_type.flatten().is_none()
}

/// Slices the CodeView child records belonging to one procedure: from just
/// after its `Proc`/`GlobalProc` header to the matching `ProcEnd`, tracking
/// nested `S_BLOCK32` scopes so an inner scope's end doesn't close the
/// procedure early.
fn function_records<'a>(modules: &'a [(u16, Module)], module_idx: u16, va: u32, prog: &Program) -> &'a [SymbolRecord] {
    let Some((_, module)) = modules.iter().find(|(i, _)| *i == module_idx) else {
        return &[];
    };
    let symbols = module.symbols();
    let mut start = None;
    let mut depth = 0i32;

    for (idx, record) in symbols.iter().enumerate() {
        match start {
            None => {
                if let Some((_, offset)) = program::procedure_symbol(record) {
                    if program::resolve_va(&prog.sections, offset) == Some(va) {
                        start = Some(idx + 1);
                    }
                }
            }
            Some(s) => match record {
                SymbolRecord::Block { .. } => depth += 1,
                SymbolRecord::ScopeEnd => depth -= 1,
                SymbolRecord::ProcEnd if depth == 0 => return &symbols[s..idx],
                SymbolRecord::ProcEnd => depth -= 1,
                _ => {}
            },
        }
    }
    match start {
        Some(s) => &symbols[s..],
        None => &[],
    }
}

fn function_bytes<'a>(obj: &'a object::File<'a>, va: u32, size: u32) -> Option<&'a [u8]> {
    for section in obj.sections() {
        let addr = section.address();
        let sec_size = section.size();
        if (va as u64) < addr || (va as u64) >= addr + sec_size {
            continue;
        }
        let data = section.data().ok()?;
        let start = (va as u64 - addr) as usize;
        let end = (start + size as usize).min(data.len());
        return data.get(start..end);
    }
    None
}

fn write_files(output_dir: &Path, files: &[(String, String)]) -> Result<()> {
    for (relative, text) in files {
        let path = output_dir.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, text)?;
    }
    info!(count = files.len(), "wrote emitted source tree");
    Ok(())
}

/// Cache payload (§5): the fully emitted source tree, the expensive output
/// of the whole pipeline, keyed against input mtimes by [`CacheKey`].
#[derive(Debug, Clone)]
struct Snapshot {
    files: Vec<(String, String)>,
}

fn write_string<W: io::Write>(s: &str, writer: &mut W) -> std::result::Result<(), declio::Error> {
    (s.len() as u32).encode(Endian::Little, writer)?;
    writer.write_all(s.as_bytes())?;
    Ok(())
}

fn read_string<R: io::Read>(reader: &mut R) -> std::result::Result<String, declio::Error> {
    let len = u32::decode(Endian::Little, reader)? as usize;
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf)?;
    String::from_utf8(buf).map_err(|e| declio::Error::new(e.to_string()))
}

impl Encode<()> for Snapshot {
    fn encode<W: io::Write>(&self, _ctx: (), writer: &mut W) -> std::result::Result<(), declio::Error> {
        (self.files.len() as u32).encode(Endian::Little, writer)?;
        for (path, text) in &self.files {
            write_string(path, writer)?;
            write_string(text, writer)?;
        }
        Ok(())
    }
}

impl Decode<()> for Snapshot {
    fn decode<R: io::Read>(_ctx: (), reader: &mut R) -> std::result::Result<Self, declio::Error> {
        let count = u32::decode(Endian::Little, reader)? as usize;
        let mut files = Vec::with_capacity(count);
        for _ in 0..count {
            let path = read_string(reader)?;
            let text = read_string(reader)?;
            files.push((path, text));
        }
        Ok(Self { files })
    }
}
