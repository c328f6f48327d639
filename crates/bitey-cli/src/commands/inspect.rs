use crate::error::CliError;
use crate::manifest::Manifest;
use bitey_rt::{Module, SymbolKind, TypeDescriptor};
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Serialize)]
struct SymbolRow {
    ordinal: usize,
    name: String,
    kind: &'static str,
    #[serde(rename = "type")]
    ty: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    size: Option<u64>,
}

#[derive(Debug, Serialize)]
struct SkippedRow {
    name: String,
    reason: String,
}

#[derive(Debug, Serialize)]
struct Report {
    module: String,
    host: String,
    symbols: Vec<SymbolRow>,
    skipped: Vec<SkippedRow>,
    structs: Vec<StructRow>,
}

#[derive(Debug, Serialize)]
struct StructRow {
    name: String,
    size: Option<u64>,
    align: Option<u64>,
}

fn report(module: &Module) -> Report {
    let symbols = module
        .symbols()
        .iter()
        .map(|entry| SymbolRow {
            ordinal: entry.ordinal,
            name: entry.name.clone(),
            kind: match entry.kind {
                SymbolKind::Function => "function",
                SymbolKind::Variable => "variable",
            },
            ty: entry.descriptor.to_string(),
            size: match entry.kind {
                SymbolKind::Variable => module.layout_of(&entry.descriptor).ok().map(|layout| layout.size),
                SymbolKind::Function => None,
            },
        })
        .collect();
    let skipped = module
        .extraction_errors()
        .iter()
        .map(|err| SkippedRow {
            name: err.symbol().unwrap_or_default().to_string(),
            reason: err.to_string(),
        })
        .collect();

    let mut names: Vec<&str> = module.structs().names().collect();
    names.sort_unstable();
    let structs = names
        .into_iter()
        .map(|name| {
            let layout = module.layout_of(&TypeDescriptor::struct_ref(name)).ok();
            StructRow {
                name: name.to_string(),
                size: layout.as_ref().map(|l| l.size),
                align: layout.as_ref().map(|l| l.align),
            }
        })
        .collect();

    Report {
        module: module.name().to_string(),
        host: target_lexicon::HOST.to_string(),
        symbols,
        skipped,
        structs,
    }
}

pub fn handle_inspect(manifest: &Path, search_paths: &[PathBuf], json: bool) -> Result<(), CliError> {
    let module = bitey_rt::load(Manifest::artifact(manifest, search_paths)?)?;
    let report = report(&module);

    if json {
        let text = serde_json::to_string_pretty(&report).map_err(CliError::OutputError)?;
        println!("{}", text);
    } else {
        println!("module {} ({})", report.module, report.host);
        for row in &report.symbols {
            match row.size {
                Some(size) => println!("  {:>3} {:<8} {}: {} ({} bytes)", row.ordinal, row.kind, row.name, row.ty, size),
                None => println!("  {:>3} {:<8} {}: {}", row.ordinal, row.kind, row.name, row.ty),
            }
        }
        for row in &report.structs {
            match (row.size, row.align) {
                (Some(size), Some(align)) => println!("  struct {}: size {}, align {}", row.name, size, align),
                _ => println!("  struct {}: no layout", row.name),
            }
        }
        for row in &report.skipped {
            println!("  skipped {}: {}", row.name, row.reason);
        }
    }
    bitey_rt::unload(&module);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitey_meta::{Encoding, Member, TypeNode};
    use bitey_rt::{Artifact, MetadataBuilder};
    use std::fs;

    #[repr(C)]
    struct Pair {
        left: i16,
        right: i64,
    }

    static ORIGIN: Pair = Pair { left: 0, right: 0 };

    extern "C" fn sum(a: i32, b: i32) -> i32 {
        a + b
    }

    fn module() -> Module {
        let mut builder = MetadataBuilder::new();
        let short = builder.base("short", Encoding::Signed, 16);
        let int = builder.base("int", Encoding::Signed, 32);
        let long = builder.base("long", Encoding::Signed, 64);
        let pair = builder.structure(Some("Pair"), &[("left", short), ("right", long)]);
        let number = builder.node(TypeNode::Union {
            name: Some("Number".to_string()),
            size_bits: Some(64),
            members: Some(vec![Member { name: "i".to_string(), ty: long, offset_bits: Some(0), bit_size: None }]),
        });
        let sum_ty = builder.subroutine(&[int, int], Some(int), false);
        let widen_ty = builder.subroutine(&[number], Some(long), false);
        builder.function("sum", sum_ty).function("widen", widen_ty).variable("origin", pair);
        let exports = [("sum", sum as *const u8), ("origin", std::ptr::addr_of!(ORIGIN) as *const u8)];
        bitey_rt::load(Artifact::host("pairs", builder.finish(), exports)).unwrap()
    }

    #[test]
    fn test_report_keeps_export_ordinals() {
        let report = report(&module());
        assert_eq!(report.module, "pairs");

        let rows: Vec<_> = report.symbols.iter().map(|row| (row.ordinal, row.name.as_str(), row.kind)).collect();
        assert_eq!(rows, [(0, "sum", "function"), (2, "origin", "variable")]);
        assert_eq!(report.symbols[0].size, None);
        assert_eq!(report.symbols[1].size, Some(16));
    }

    #[test]
    fn test_report_lists_skipped_symbols_with_reason() {
        let report = report(&module());
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].name, "widen");
        assert!(report.skipped[0].reason.contains("union Number"), "{}", report.skipped[0].reason);
    }

    #[test]
    fn test_report_struct_layouts() {
        let report = report(&module());
        assert_eq!(report.structs.len(), 1);
        let row = &report.structs[0];
        assert_eq!((row.name.as_str(), row.size, row.align), ("Pair", Some(16), Some(8)));
    }

    #[test]
    fn test_report_json_names_the_type_column() {
        let json = serde_json::to_value(report(&module())).unwrap();
        assert_eq!(json["symbols"][0]["type"], "fn(i32, i32) -> i32");
        assert!(json["symbols"][0].get("size").is_none());
        assert_eq!(json["skipped"][0]["name"], "widen");
    }

    #[test]
    fn test_handle_inspect_reports_malformed_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pairs.json");
        fs::write(&path, "{ not json").unwrap();

        let err = handle_inspect(&path, &[], true).unwrap_err();
        assert!(matches!(err, CliError::ManifestError { .. }), "{err:?}");
    }
}
