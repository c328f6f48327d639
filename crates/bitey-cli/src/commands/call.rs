use crate::args::parse_argument;
use crate::error::CliError;
use crate::manifest::Manifest;
use bitey_rt::{Module, Value};
use std::path::{Path, PathBuf};

pub fn handle_call(manifest: &Path, search_paths: &[PathBuf], symbol: &str, args: &[String]) -> Result<(), CliError> {
    let module = bitey_rt::load(Manifest::artifact(manifest, search_paths)?)?;
    let result = call_symbol(&module, symbol, args);
    bitey_rt::unload(&module);
    println!("{}", result?);
    Ok(())
}

/// Binds `symbol`, converts `args` by its parameter types and calls it once.
fn call_symbol(module: &Module, symbol: &str, args: &[String]) -> Result<Value, CliError> {
    let bound = bitey_rt::bind(module, symbol)?;

    // `bind` only succeeds for functions.
    let params = bound.signature().map(|func| func.params.as_slice()).unwrap_or_default();
    if params.len() != args.len() {
        return Err(CliError::ArgumentCount { symbol: symbol.to_string(), expected: params.len(), found: args.len() });
    }
    let values = args
        .iter()
        .zip(params)
        .enumerate()
        .map(|(index, (text, ty))| parse_argument(index, text, ty, module.structs()))
        .collect::<Result<Vec<_>, _>>()?;

    log::info!("Calling `{}` ({})", symbol, bound.descriptor());
    Ok(bitey_rt::call(&bound, &values)?)
}
