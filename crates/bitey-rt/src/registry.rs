//! Per-module cache of bound functions.

use crate::bound::BoundFunction;
use crate::module::ModuleShared;
use crate::BindError;
use bitey_meta::SymbolKind;
use std::sync::Arc;

/// Returns the cached binding for `name` or synthesizes, caches and returns
/// a new one.
///
/// The state read lock and the registry mutex are held for the whole
/// synthesis: a concurrent `unload` waits, and concurrent callers for the
/// same symbol all observe the same `Arc`.
pub(crate) fn get_or_bind(shared: &Arc<ModuleShared>, name: &str) -> Result<Arc<BoundFunction>, BindError> {
    let state = shared.state.read_recursive();
    if !state.loaded {
        return Err(shared.stale(name));
    }
    let mut binder = shared.binder.lock();
    if let Some(bound) = binder.bound.get(name) {
        return Ok(bound.clone());
    }

    let index = shared.lookup_index(name)?;
    let entry = &shared.symbols[index];
    let func = match (entry.kind, entry.descriptor.as_function()) {
        (SymbolKind::Function, Some(func)) => func,
        _ => {
            return Err(BindError::UnsupportedType {
                symbol: name.to_string(),
                cause: format!("`{}` is a variable, not a function", entry.descriptor),
            })
        }
    };

    let call = binder
        .prepare(func)
        .map_err(|err| BindError::from_native(name, entry.descriptor.to_string(), err))?;
    log::debug!("Bound `{}` in module `{}`: {}", name, shared.name, entry.descriptor);

    let bound = Arc::new(BoundFunction {
        module: Arc::downgrade(shared),
        module_id: shared.id,
        module_name: shared.name.clone(),
        symbol: name.to_string(),
        index,
        descriptor: entry.descriptor.clone(),
        call,
    });
    binder.bound.insert(name.to_string(), bound.clone());
    Ok(bound)
}
