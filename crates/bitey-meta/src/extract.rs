use crate::error::MetadataError;
use crate::metadata::{Encoding, Member, ModuleMetadata, SymbolKind, TypeId, TypeNode};
use bitey_types::{Field, FunctionType, StructTable, StructType, TypeDescriptor};
use rustc_hash::{FxHashMap, FxHashSet};

/// One exported symbol with its fully resolved descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedSymbol {
    pub name: String,
    pub kind: SymbolKind,
    pub descriptor: TypeDescriptor,
    /// Position in the module's native export order.
    pub ordinal: usize,
}

/// Result of walking a module's metadata.
#[derive(Debug, Default)]
pub struct Extraction {
    /// Successfully extracted symbols, in export order.
    pub symbols: Vec<ExtractedSymbol>,
    /// Per-symbol failures.
    pub errors: Vec<MetadataError>,
    /// Every named struct reached while walking.
    pub structs: StructTable,
}

/// Walks `metadata` and produces a descriptor for every exported symbol.
pub fn extract(metadata: &ModuleMetadata) -> Extraction {
    let mut walker = TypeWalker::new(metadata);
    let mut extraction = Extraction::default();
    let mut seen: FxHashSet<&str> = FxHashSet::default();

    for (ordinal, record) in metadata.symbols.iter().enumerate() {
        if !seen.insert(record.name.as_str()) {
            log::warn!("Duplicate export `{}` in metadata; keeping the first", record.name);
            extraction.errors.push(MetadataError::DuplicateSymbol { symbol: record.name.clone() });
            continue;
        }

        let lowered = walker.lower(record.ty).and_then(|descriptor| {
            match (record.kind, &descriptor) {
                (SymbolKind::Function, TypeDescriptor::Function(_)) => Ok(descriptor),
                (SymbolKind::Function, other) => {
                    Err(format!("function symbol has non-function type {}", other))
                }
                (SymbolKind::Variable, TypeDescriptor::Function(_)) => {
                    Err("variable symbol has a function type".to_string())
                }
                (SymbolKind::Variable, TypeDescriptor::Void) => {
                    Err("variable symbol has type void".to_string())
                }
                (SymbolKind::Variable, _) => Ok(descriptor),
            }
        });

        match lowered {
            Ok(descriptor) => {
                log::trace!("Extracted `{}`: {}", record.name, descriptor);
                extraction.symbols.push(ExtractedSymbol {
                    name: record.name.clone(),
                    kind: record.kind,
                    descriptor,
                    ordinal,
                });
            }
            Err(cause) => {
                log::debug!("Skipping `{}`: {}", record.name, cause);
                extraction.errors.push(MetadataError::UnsupportedType {
                    symbol: record.name.clone(),
                    cause,
                });
            }
        }
    }

    extraction.structs = walker.structs;
    log::debug!(
        "Extracted {} symbols ({} failed, {} named structs)",
        extraction.symbols.len(),
        extraction.errors.len(),
        extraction.structs.len()
    );
    extraction
}

/// Lowers metadata type nodes into descriptors.
///
/// Structs are memoized by node id. A struct reached again while its own
/// members are still being lowered becomes a [`TypeDescriptor::StructRef`].
/// Any other node reached again before the enclosing struct is left is a
/// cycle with no finite descriptor.
struct TypeWalker<'m> {
    metadata: &'m ModuleMetadata,
    structs: StructTable,
    cache: FxHashMap<TypeId, TypeDescriptor>,
    in_progress: FxHashSet<TypeId>,
    /// Non-struct nodes on the current path since the innermost struct.
    visiting: FxHashSet<TypeId>,
    /// Anonymous structs that were referenced by name and need one.
    named_anonymous: FxHashSet<TypeId>,
}

impl<'m> TypeWalker<'m> {
    fn new(metadata: &'m ModuleMetadata) -> Self {
        TypeWalker {
            metadata,
            structs: StructTable::new(),
            cache: FxHashMap::default(),
            in_progress: FxHashSet::default(),
            visiting: FxHashSet::default(),
            named_anonymous: FxHashSet::default(),
        }
    }

    fn node(&self, id: TypeId) -> Result<&'m TypeNode, String> {
        self.metadata
            .node(id)
            .ok_or_else(|| format!("dangling type reference #{}", id))
    }

    fn lower(&mut self, id: TypeId) -> Result<TypeDescriptor, String> {
        if let TypeNode::Struct { .. } = self.node(id)? {
            return self.lower_struct(id);
        }
        self.enter(id)?;
        let lowered = self.lower_node(id);
        self.visiting.remove(&id);
        lowered
    }

    fn enter(&mut self, id: TypeId) -> Result<(), String> {
        if self.visiting.insert(id) {
            Ok(())
        } else {
            Err(format!("cyclic type reference #{}", id))
        }
    }

    fn lower_node(&mut self, id: TypeId) -> Result<TypeDescriptor, String> {
        match self.node(id)? {
            TypeNode::Base { name, encoding, size_bits } => lower_base(name, *encoding, *size_bits),
            TypeNode::Pointer { pointee: None } => Ok(TypeDescriptor::void_pointer()),
            TypeNode::Pointer { pointee: Some(target) } => {
                Ok(TypeDescriptor::pointer_to(self.lower_pointee(*target)?))
            }
            TypeNode::Typedef { target, .. } | TypeNode::Qualified { target, .. } => {
                self.lower(*target)
            }
            TypeNode::Array { element, count: Some(count) } => {
                Ok(TypeDescriptor::array_of(self.lower(*element)?, *count))
            }
            TypeNode::Array { count: None, .. } => {
                Err("arrays without a length are only supported behind pointers".to_string())
            }
            TypeNode::Struct { .. } => self.lower_struct(id),
            TypeNode::Union { name, .. } => Err(format!(
                "union {} is not supported",
                name.as_deref().unwrap_or("<anonymous>")
            )),
            TypeNode::Vector { count, .. } => {
                Err(format!("vector (SIMD) type with {} lanes is not supported", count))
            }
            TypeNode::Enum { name, underlying } => match self.lower(*underlying)? {
                int @ TypeDescriptor::Int { .. } => Ok(int),
                other => Err(format!(
                    "enum {} has non-integer underlying type {}",
                    name.as_deref().unwrap_or("<anonymous>"),
                    other
                )),
            },
            TypeNode::Subroutine { params, ret, variadic } => {
                let params = params
                    .iter()
                    .map(|param| self.lower(*param))
                    .collect::<Result<Vec<_>, _>>()?;
                let ret = match ret {
                    Some(ret) => self.lower(*ret)?,
                    None => TypeDescriptor::Void,
                };
                Ok(TypeDescriptor::Function(FunctionType {
                    params,
                    ret: Box::new(ret),
                    variadic: *variadic,
                }))
            }
        }
    }

    /// Lowers the target of a pointer. Pointers only need the pointee for
    /// compatibility checks, so types that have no descriptor of their own
    /// degrade instead of failing the whole symbol.
    fn lower_pointee(&mut self, id: TypeId) -> Result<TypeDescriptor, String> {
        let next = match self.node(id)? {
            TypeNode::Typedef { target, .. } | TypeNode::Qualified { target, .. } => Some(*target),
            TypeNode::Array { element, count: None } => Some(*element),
            _ => None,
        };
        if let Some(next) = next {
            self.enter(id)?;
            let lowered = self.lower_pointee(next);
            self.visiting.remove(&id);
            return lowered;
        }
        match self.node(id)? {
            TypeNode::Union { name, .. } => {
                log::debug!(
                    "Pointer to union {} lowered to void pointer",
                    name.as_deref().unwrap_or("<anonymous>")
                );
                Ok(TypeDescriptor::Void)
            }
            TypeNode::Vector { .. } => Ok(TypeDescriptor::Void),
            _ => self.lower(id),
        }
    }

    fn struct_name(&mut self, id: TypeId, name: &Option<String>) -> String {
        match name {
            Some(name) => name.clone(),
            None => {
                self.named_anonymous.insert(id);
                anonymous_name(id)
            }
        }
    }

    fn lower_struct(&mut self, id: TypeId) -> Result<TypeDescriptor, String> {
        let TypeNode::Struct { name, size_bits, align_bits, members } = self.node(id)? else {
            return Err(format!("type #{} is not a struct", id));
        };

        if self.in_progress.contains(&id) {
            return Ok(TypeDescriptor::struct_ref(self.struct_name(id, name)));
        }
        if let Some(cached) = self.cache.get(&id) {
            return Ok(cached.clone());
        }

        self.in_progress.insert(id);
        let outer = std::mem::take(&mut self.visiting);
        let fields = match members {
            Some(members) => self.lower_members(members).map(Some),
            None => Ok(None),
        };
        self.visiting = outer;
        self.in_progress.remove(&id);
        let fields = fields?;

        let name = match name {
            Some(name) => Some(name.clone()),
            None if self.named_anonymous.contains(&id) => Some(anonymous_name(id)),
            None => None,
        };
        let def = StructType {
            name,
            fields,
            size: bits_to_bytes(*size_bits, "struct size")?,
            align: bits_to_bytes(*align_bits, "struct alignment")?,
        };
        if def.name.is_some() {
            self.structs.insert(def.clone()).map_err(|e| e.to_string())?;
        }

        let descriptor = TypeDescriptor::Struct(def);
        self.cache.insert(id, descriptor.clone());
        Ok(descriptor)
    }

    fn lower_members(&mut self, members: &[Member]) -> Result<Vec<Field>, String> {
        members
            .iter()
            .map(|member| {
                if member.bit_size.is_some() {
                    return Err(format!("bit-field member `{}` is not supported", member.name));
                }
                Ok(Field {
                    name: member.name.clone(),
                    ty: self.lower(member.ty)?,
                    offset: bits_to_bytes(member.offset_bits, "member offset")?,
                })
            })
            .collect()
    }
}

fn lower_base(name: &str, encoding: Encoding, size_bits: u64) -> Result<TypeDescriptor, String> {
    let width = u16::try_from(size_bits)
        .map_err(|_| format!("base type `{}` is {} bits wide", name, size_bits))?;
    Ok(match encoding {
        Encoding::Signed => TypeDescriptor::int(width, true),
        Encoding::Unsigned => TypeDescriptor::int(width, false),
        Encoding::SignedChar => TypeDescriptor::i8(),
        Encoding::UnsignedChar => TypeDescriptor::u8(),
        // C `_Bool` occupies one byte holding 0 or 1.
        Encoding::Boolean => TypeDescriptor::u8(),
        Encoding::Float => TypeDescriptor::float(width),
    })
}

fn bits_to_bytes(bits: Option<u64>, what: &str) -> Result<Option<u64>, String> {
    match bits {
        Some(bits) if bits % 8 != 0 => Err(format!("{} of {} bits is not byte aligned", what, bits)),
        Some(bits) => Ok(Some(bits / 8)),
        None => Ok(None),
    }
}

fn anonymous_name(id: TypeId) -> String {
    format!("anon.{}", id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{MetadataBuilder, Qualifier};

    #[test]
    fn test_extract_preserves_export_order() {
        let mut builder = MetadataBuilder::new();
        let int = builder.base("int", Encoding::Signed, 32);
        let sig = builder.subroutine(&[int, int], Some(int), false);
        builder.function("zeta", sig).function("alpha", sig).variable("middle", int);
        let extraction = extract(&builder.finish());

        let names: Vec<_> = extraction.symbols.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["zeta", "alpha", "middle"]);
        assert_eq!(extraction.symbols[1].ordinal, 1);
        assert_eq!(
            extraction.symbols[0].descriptor,
            TypeDescriptor::function(
                vec![TypeDescriptor::i32(), TypeDescriptor::i32()],
                TypeDescriptor::i32()
            )
        );
        assert!(extraction.errors.is_empty());
    }

    #[test]
    fn test_unsupported_symbol_does_not_abort_extraction() {
        let mut builder = MetadataBuilder::new();
        let float = builder.base("float", Encoding::Float, 32);
        let v4 = builder.node(TypeNode::Vector { element: float, count: 4 });
        let simd_fn = builder.subroutine(&[v4], Some(v4), false);
        let union = builder.node(TypeNode::Union { name: Some("U".into()), size_bits: Some(32), members: None });
        let union_fn = builder.subroutine(&[union], None, false);
        let scale = builder.subroutine(&[float], Some(float), false);
        builder.function("simd", simd_fn).function("by_union", union_fn).function("scale", scale);

        let extraction = extract(&builder.finish());
        assert_eq!(extraction.symbols.len(), 1);
        assert_eq!(extraction.symbols[0].name, "scale");
        assert_eq!(extraction.symbols[0].ordinal, 2);
        let failed: Vec<_> = extraction.errors.iter().filter_map(|e| e.symbol()).collect();
        assert_eq!(failed, ["simd", "by_union"]);
        assert!(extraction
            .errors
            .iter()
            .all(|e| matches!(e, MetadataError::UnsupportedType { .. })));
    }

    #[test]
    fn test_typedefs_qualifiers_and_enums_are_transparent() {
        let mut builder = MetadataBuilder::new();
        let uint = builder.base("unsigned int", Encoding::Unsigned, 32);
        let size_t = builder.typedef("size_t", uint);
        let const_size = builder.qualified(Qualifier::Const, size_t);
        let color = builder.node(TypeNode::Enum { name: Some("color".into()), underlying: uint });
        let boolean = builder.base("_Bool", Encoding::Boolean, 8);
        let sig = builder.subroutine(&[const_size, color], Some(boolean), false);
        builder.function("check", sig);

        let extraction = extract(&builder.finish());
        assert_eq!(
            extraction.symbols[0].descriptor,
            TypeDescriptor::function(
                vec![TypeDescriptor::u32(), TypeDescriptor::u32()],
                TypeDescriptor::u8()
            )
        );
    }

    #[test]
    fn test_self_referential_struct_uses_back_reference() {
        let mut builder = MetadataBuilder::new();
        let int = builder.base("int", Encoding::Signed, 32);
        let node = builder.declare_struct(Some("Node"));
        let node_ptr = builder.pointer(Some(node));
        builder.define_struct(node, &[("value", int), ("next", node_ptr)]);
        let sig = builder.subroutine(&[node_ptr], Some(int), false);
        builder.function("list_sum", sig);

        let extraction = extract(&builder.finish());
        let expected_node = TypeDescriptor::structure(
            Some("Node"),
            [
                ("value", TypeDescriptor::i32()),
                ("next", TypeDescriptor::pointer_to(TypeDescriptor::struct_ref("Node"))),
            ],
        );
        assert_eq!(
            extraction.symbols[0].descriptor,
            TypeDescriptor::function(
                vec![TypeDescriptor::pointer_to(expected_node.clone())],
                TypeDescriptor::i32()
            )
        );
        assert_eq!(
            extraction.structs.resolve(&TypeDescriptor::struct_ref("Node")).unwrap(),
            &expected_node
        );
    }

    #[test]
    fn test_anonymous_recursive_struct_gets_synthetic_name() {
        let mut builder = MetadataBuilder::new();
        let anon = builder.declare_struct(None);
        let ptr = builder.pointer(Some(anon));
        builder.define_struct(anon, &[("self_ptr", ptr)]);
        builder.variable("head", anon);

        let extraction = extract(&builder.finish());
        let name = format!("anon.{}", anon);
        assert_eq!(extraction.symbols[0].descriptor.struct_name(), Some(name.as_str()));
        assert!(extraction.structs.get(&name).is_some());
    }

    #[test]
    fn test_authoritative_layout_is_carried_in_bytes() {
        let mut builder = MetadataBuilder::new();
        let int = builder.base("int", Encoding::Signed, 32);
        let point = builder.node(TypeNode::Struct {
            name: Some("Point".into()),
            size_bits: Some(64),
            align_bits: Some(32),
            members: Some(vec![
                Member { name: "x".into(), ty: int, offset_bits: Some(0), bit_size: None },
                Member { name: "y".into(), ty: int, offset_bits: Some(32), bit_size: None },
            ]),
        });
        builder.variable("origin", point);

        let extraction = extract(&builder.finish());
        let TypeDescriptor::Struct(def) = &extraction.symbols[0].descriptor else {
            panic!("expected struct");
        };
        assert_eq!(def.size, Some(8));
        assert_eq!(def.align, Some(4));
        assert_eq!(def.field("y").unwrap().offset, Some(4));
    }

    #[test]
    fn test_bitfields_flexible_arrays_and_bad_references_fail_per_symbol() {
        let mut builder = MetadataBuilder::new();
        let int = builder.base("int", Encoding::Signed, 32);
        let flags = builder.node(TypeNode::Struct {
            name: Some("Flags".into()),
            size_bits: Some(32),
            align_bits: None,
            members: Some(vec![Member { name: "a".into(), ty: int, offset_bits: Some(0), bit_size: Some(3) }]),
        });
        let flexible = builder.array(int, None);
        let flexible_ptr = builder.pointer(Some(flexible));
        builder
            .variable("flags", flags)
            .variable("tail", flexible)
            .variable("dangling", 999)
            .variable("tail_ptr", flexible_ptr)
            .variable("flags", int);

        let extraction = extract(&builder.finish());
        assert_eq!(extraction.symbols.len(), 1);
        assert_eq!(extraction.symbols[0].descriptor, TypeDescriptor::pointer_to(TypeDescriptor::i32()));
        assert_eq!(extraction.errors.len(), 4);
        assert!(matches!(extraction.errors[3], MetadataError::DuplicateSymbol { .. }));
    }

    #[test]
    fn test_variadic_signature_is_representable() {
        let mut builder = MetadataBuilder::new();
        let int = builder.base("int", Encoding::Signed, 32);
        let chr = builder.base("char", Encoding::SignedChar, 8);
        let const_chr = builder.qualified(Qualifier::Const, chr);
        let fmt = builder.pointer(Some(const_chr));
        let sig = builder.subroutine(&[fmt], Some(int), true);
        builder.function("printf", sig);

        let extraction = extract(&builder.finish());
        assert!(extraction.symbols[0].descriptor.is_variadic());
    }

    #[test]
    fn test_cyclic_type_chain_fails_only_its_symbol() {
        let mut builder = MetadataBuilder::new();
        let int = builder.base("int", Encoding::Signed, 32);
        // typedef loop_t loop_t;
        let looped = builder.typedef("loop_t", 1);
        // A pointer whose pointee is a const-qualified version of itself.
        let ptr = builder.pointer(Some(3));
        let const_ptr = builder.qualified(Qualifier::Const, ptr);
        let good = builder.subroutine(&[int], Some(int), false);
        builder
            .variable("bad", looped)
            .variable("worse", const_ptr)
            .function("good", good);

        let extraction = extract(&builder.finish());
        assert_eq!(extraction.symbols.len(), 1);
        assert_eq!(extraction.symbols[0].name, "good");
        assert_eq!(extraction.errors.len(), 2);
        for err in &extraction.errors {
            assert!(
                matches!(err, MetadataError::UnsupportedType { cause, .. } if cause.starts_with("cyclic type reference")),
                "{err:?}"
            );
        }
    }

    #[test]
    fn test_struct_reached_through_typedef_twice_is_not_a_cycle() {
        let mut builder = MetadataBuilder::new();
        let int = builder.base("int", Encoding::Signed, 32);
        let node = builder.declare_struct(Some("Node"));
        let node_t = builder.typedef("node_t", node);
        let node_ptr = builder.pointer(Some(node_t));
        let pair = builder.array(node_ptr, Some(2));
        builder.define_struct(node, &[("value", int), ("children", pair)]);
        builder.variable("root", node_t);

        let extraction = extract(&builder.finish());
        assert!(extraction.errors.is_empty(), "{:?}", extraction.errors);
        let TypeDescriptor::Struct(def) = &extraction.symbols[0].descriptor else {
            panic!("expected a struct, got {}", extraction.symbols[0].descriptor);
        };
        let children = def.field("children").unwrap();
        assert_eq!(
            children.ty,
            TypeDescriptor::array_of(TypeDescriptor::pointer_to(TypeDescriptor::struct_ref("Node")), 2)
        );
    }
}
