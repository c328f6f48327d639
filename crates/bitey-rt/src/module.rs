use crate::bound::BoundFunction;
use crate::loader::{Artifact, LoadedImage};
use crate::BindError;
use bitey_layout::{Layout, LayoutResolver};
use bitey_meta::SymbolKind;
use bitey_native::{read_native, NativeCall, NativeError, TrampolineCompiler, Value};
use bitey_types::{FunctionType, StructTable, TypeDescriptor};
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_MODULE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a loaded module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleId(u64);

impl ModuleId {
    fn next() -> Self {
        ModuleId(NEXT_MODULE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One exported symbol of a loaded module.
#[derive(Debug, Clone, PartialEq)]
pub struct SymbolEntry {
    pub name: String,
    pub kind: SymbolKind,
    pub descriptor: TypeDescriptor,
    /// Position in the module's export order.
    pub ordinal: usize,
    /// Entry point (functions) or storage (variables), resolved at load.
    pub address: usize,
}

pub(crate) struct ModuleState {
    pub(crate) loaded: bool,
    image: Option<LoadedImage>,
}

/// Everything synthesis needs, guarded by one mutex so that each symbol is
/// bound at most once.
pub(crate) struct Binder {
    resolver: LayoutResolver,
    compiler: Option<TrampolineCompiler>,
    pub(crate) bound: FxHashMap<String, Arc<BoundFunction>>,
}

impl Binder {
    pub(crate) fn prepare(&mut self, func: &FunctionType) -> Result<NativeCall, NativeError> {
        // Created on first bind so that loading never needs a JIT.
        let compiler = match self.compiler.take() {
            Some(compiler) => compiler,
            None => TrampolineCompiler::new()?,
        };
        let compiler = self.compiler.insert(compiler);
        NativeCall::prepare(func, &mut self.resolver, compiler)
    }

    pub(crate) fn trampolines(&self) -> usize {
        self.compiler.as_ref().map_or(0, TrampolineCompiler::len)
    }
}

pub(crate) struct ModuleShared {
    pub(crate) id: ModuleId,
    pub(crate) name: String,
    pub(crate) symbols: Vec<SymbolEntry>,
    index: FxHashMap<String, usize>,
    pub(crate) errors: Vec<BindError>,
    pub(crate) structs: Arc<StructTable>,
    pub(crate) state: RwLock<ModuleState>,
    pub(crate) binder: Mutex<Binder>,
}

impl ModuleShared {
    pub(crate) fn lookup(&self, name: &str) -> Result<&SymbolEntry, BindError> {
        self.lookup_index(name).map(|index| &self.symbols[index])
    }

    pub(crate) fn lookup_index(&self, name: &str) -> Result<usize, BindError> {
        if let Some(&index) = self.index.get(name) {
            return Ok(index);
        }
        // A symbol dropped during extraction reports why.
        if let Some(err) = self.errors.iter().find(|err| err.symbol() == Some(name)) {
            return Err(err.clone());
        }
        Err(BindError::SymbolNotFound { symbol: name.to_string(), module: self.name.clone() })
    }

    pub(crate) fn stale(&self, symbol: &str) -> BindError {
        BindError::StaleModule { symbol: symbol.to_string(), module: self.name.clone() }
    }
}

/// Handle to a loaded artifact. Clones share the same module.
#[derive(Clone)]
pub struct Module {
    pub(crate) shared: Arc<ModuleShared>,
}

impl fmt::Debug for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Module")
            .field("id", &self.shared.id)
            .field("name", &self.shared.name)
            .field("symbols", &self.shared.symbols.len())
            .field("loaded", &self.is_loaded())
            .finish()
    }
}

impl Module {
    /// Opens the artifact's image, extracts its metadata and resolves the
    /// address of every extracted symbol.
    pub fn load(artifact: Artifact) -> Result<Module, BindError> {
        let Artifact { name, image, metadata } = artifact;
        let load_error = |cause: String| BindError::LoadError { module: name.clone(), cause };

        log::info!("Loading module `{}` ({} exports)", name, metadata.symbols.len());
        let image = LoadedImage::open(image).map_err(load_error)?;
        let extraction = bitey_meta::extract(&metadata);

        let mut symbols = Vec::with_capacity(extraction.symbols.len());
        let mut index = FxHashMap::default();
        for extracted in extraction.symbols {
            let address = image.resolve(&extracted.name).map_err(load_error)?;
            index.insert(extracted.name.clone(), symbols.len());
            symbols.push(SymbolEntry {
                name: extracted.name,
                kind: extracted.kind,
                descriptor: extracted.descriptor,
                ordinal: extracted.ordinal,
                address,
            });
        }
        let errors: Vec<BindError> = extraction.errors.iter().filter_map(BindError::from_metadata).collect();
        for err in &errors {
            log::warn!("Module `{}`: {}", name, err);
        }

        let structs = Arc::new(extraction.structs);
        let resolver = LayoutResolver::new(structs.clone()).map_err(|e| load_error(e.to_string()))?;
        let id = ModuleId::next();
        log::debug!("Module `{}` loaded as {} with {} symbols", name, id, symbols.len());

        Ok(Module {
            shared: Arc::new(ModuleShared {
                id,
                name,
                symbols,
                index,
                errors,
                structs,
                state: RwLock::new(ModuleState { loaded: true, image: Some(image) }),
                binder: Mutex::new(Binder { resolver, compiler: None, bound: FxHashMap::default() }),
            }),
        })
    }

    pub fn id(&self) -> ModuleId {
        self.shared.id
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn is_loaded(&self) -> bool {
        self.shared.state.read_recursive().loaded
    }

    /// Extracted symbols in export order.
    pub fn symbols(&self) -> &[SymbolEntry] {
        &self.shared.symbols
    }

    pub fn symbol(&self, name: &str) -> Option<&SymbolEntry> {
        self.shared.lookup(name).ok()
    }

    /// Symbols that could not be extracted, with the reason.
    pub fn extraction_errors(&self) -> &[BindError] {
        &self.shared.errors
    }

    pub fn structs(&self) -> &StructTable {
        &self.shared.structs
    }

    /// Layout of `ty` under this module's struct definitions.
    pub fn layout_of(&self, ty: &TypeDescriptor) -> Result<Arc<Layout>, BindError> {
        self.shared
            .binder
            .lock()
            .resolver
            .resolve(ty)
            .map_err(|e| BindError::from_layout(&ty.to_string(), e))
    }

    /// Returns the binding for `name`, synthesizing it on first use.
    pub fn bind(&self, name: &str) -> Result<Arc<BoundFunction>, BindError> {
        crate::registry::get_or_bind(&self.shared, name)
    }

    /// Number of distinct trampolines compiled for this module.
    pub fn trampolines(&self) -> usize {
        self.shared.binder.lock().trampolines()
    }

    /// Reads the current value of an exported variable.
    pub fn read_global(&self, name: &str) -> Result<Value, BindError> {
        let state = self.shared.state.read_recursive();
        if !state.loaded {
            return Err(self.shared.stale(name));
        }
        let entry = self.shared.lookup(name)?;
        if entry.kind != SymbolKind::Variable {
            return Err(BindError::UnsupportedType {
                symbol: name.to_string(),
                cause: format!("`{}` is a function, not a variable", entry.descriptor),
            });
        }
        if entry.address == 0 {
            return Err(BindError::NativeInvocationFault {
                symbol: name.to_string(),
                cause: "variable has a null address".to_string(),
            });
        }
        let layout = self.layout_of(&entry.descriptor).map_err(|err| match err {
            BindError::UnsupportedType { cause, .. } => BindError::UnsupportedType { symbol: name.to_string(), cause },
            BindError::LayoutMismatch { cause, .. } => BindError::LayoutMismatch { symbol: name.to_string(), cause },
            other => other,
        })?;
        // SAFETY: the address was resolved from the loaded image, which stays
        // mapped while the state lock is held.
        unsafe { read_native(entry.address as *const u8, &entry.descriptor, &layout, &self.shared.structs) }.map_err(
            |e| BindError::UnsupportedType { symbol: name.to_string(), cause: e.to_string() },
        )
    }

    /// Unloads the module: drops every binding, the compiled trampolines and
    /// the native image. Waits for in-flight calls. Idempotent.
    pub fn unload(&self) {
        let mut state = self.shared.state.write();
        if !state.loaded {
            return;
        }
        state.loaded = false;
        let mut binder = self.shared.binder.lock();
        let bindings = binder.bound.len();
        binder.bound.clear();
        binder.compiler = None;
        state.image = None;
        log::info!("Unloaded module `{}` ({} bindings invalidated)", self.shared.name, bindings);
    }
}
