//! `stitch weave`: rewrite a compiled module against native memory

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use stitch_bytecode::{flags, DebugMap, Module};
use stitch_sdk::NativeMetadata;
use stitch_weaver::{HelperLibrary, WeaveConfig, WeaveErrors, Weaver};
use tracing::{debug, info};

use super::read_module;
use crate::output::StyledOutput;
use crate::WeaveArgs;

/// Companion debug map path of a module: `<module>.dbg`
pub fn companion_debug_map(module: &Path) -> PathBuf {
    let mut path = OsString::from(module.as_os_str());
    path.push(".dbg");
    PathBuf::from(path)
}

pub fn execute(args: &WeaveArgs, out: &mut StyledOutput) -> anyhow::Result<ExitCode> {
    let mut config = match &args.config {
        Some(path) => WeaveConfig::load(path)?,
        None => WeaveConfig::default(),
    };
    if let Some(jobs) = args.jobs {
        config.jobs = jobs;
    }

    let mut module = read_module(&args.input)?;
    let companion = companion_debug_map(&args.input);
    if companion.is_file() {
        let bytes = std::fs::read(&companion).with_context(|| format!("cannot read {}", companion.display()))?;
        let map = DebugMap::decode(&bytes).with_context(|| format!("cannot decode {}", companion.display()))?;
        debug!(rows = map.rows.len(), "applying companion debug map");
        module.apply_debug_map(&map);
    }

    let metadata = match &args.metadata {
        Some(path) => NativeMetadata::load(path)?,
        None => NativeMetadata::new(),
    };
    let helpers = match &args.helpers {
        Some(path) => HelperLibrary::from_module(&read_module(path)?, &config),
        None => HelperLibrary::standard(&config),
    };
    info!(
        input = %args.input.display(),
        native_types = metadata.len(),
        jobs = config.worker_count(),
        "weaving"
    );

    let weaver = Weaver::new(config, helpers, metadata);
    let report = match weaver.weave(&mut module) {
        Ok(report) => report,
        Err(errors) => {
            print_errors(&errors, out);
            return Ok(ExitCode::from(1));
        }
    };

    let output = args.output.as_deref().unwrap_or(args.input.as_path());
    let debug_map = debug_map_target(args, weaver.config(), output, &module)?;
    if debug_map.is_some() {
        module.flags |= flags::HAS_DEBUG_MAP;
    }
    let encoded = module.encode()?;
    let report = report.with_digest(&module)?;

    // The module goes last so a failed side write leaves the input unwoven
    if let Some((path, map)) = debug_map {
        std::fs::write(&path, map.encode()).with_context(|| format!("cannot write {}", path.display()))?;
    }
    if let Some(path) = &args.report {
        std::fs::write(path, report.to_json()?).with_context(|| format!("cannot write {}", path.display()))?;
    }
    std::fs::write(output, encoded).with_context(|| format!("cannot write {}", output.display()))?;

    out.success("Woven");
    out.plain(&format!(
        " {} ({} members rewritten, {} types synthesized) -> ",
        report.module,
        report.rewritten_members.len(),
        report.synthesized_types.len()
    ));
    out.info(&output.display().to_string());
    out.newline();
    Ok(ExitCode::SUCCESS)
}

/// Debug map to write alongside the output, if any
///
/// An explicit `--debug-map` always produces a file. Otherwise the companion
/// map is written when enabled in the configuration and the module carries
/// sequence points.
fn debug_map_target(
    args: &WeaveArgs,
    config: &WeaveConfig,
    output: &Path,
    module: &Module,
) -> anyhow::Result<Option<(PathBuf, DebugMap)>> {
    if let Some(path) = &args.debug_map {
        return Ok(Some((path.clone(), module.debug_map()?)));
    }
    if !config.debug_map {
        return Ok(None);
    }
    let map = module.debug_map()?;
    if map.rows.is_empty() {
        return Ok(None);
    }
    Ok(Some((companion_debug_map(output), map)))
}

fn print_errors(errors: &WeaveErrors, out: &mut StyledOutput) {
    for error in errors.iter() {
        out.stderr_error("error");
        out.stderr_plain(&format!(": {}\n", error));
    }
    out.stderr_error("weave failed");
    out.stderr_plain(&format!(": {} error(s)\n", errors.len()));
}
