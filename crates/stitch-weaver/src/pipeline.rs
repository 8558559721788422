//! The weave pipeline
//!
//! 1. index the module and check the structural rules of exposed types
//! 2. promote exposed plain fields to properties
//! 3. order the records and rewrite them one at a time
//! 4. check enums
//! 5. run classes, interfaces and callable signatures as independent units
//!    on a work-stealing pool
//! 6. reassemble in declaration order, append synthesized types, verify
//!
//! The weave works on a copy of the module and only replaces the caller's
//! module when every step succeeded. A metadata-consistency error stops the
//! pipeline after the phase that raised it; other errors are collected
//! until the end so one run reports as many as it can.

use std::sync::Arc;

use crossbeam_deque::{Injector, Steal, Stealer, Worker};
use parking_lot::Mutex;
use rustc_hash::FxHashSet;
use stitch_bytecode::{flags, verify_module, ConstantPool, Module, TypeDef, TypeKind};
use stitch_sdk::NativeMetadata;
use tracing::{debug, info, info_span};

use crate::config::WeaveConfig;
use crate::context::{Registry, Unit, WeaveContext};
use crate::emit::StringTable;
use crate::error::{WeaveError, WeaveErrors};
use crate::helpers::HelperLibrary;
use crate::index::TypeIndex;
use crate::markers;
use crate::orchestrate::{
    check_enum, check_type, is_woven_record, plan_records, promote_exposed_fields, rewrite_record, weave_unit,
    UnitKind,
};
use crate::report::WeaveReport;
use crate::strategy::StrategyCache;

/// Post-compilation weaver
#[derive(Debug, Clone)]
pub struct Weaver {
    config: WeaveConfig,
    helpers: HelperLibrary,
    metadata: NativeMetadata,
}

/// One independent unit waiting for a worker
struct Job {
    position: usize,
    kind: UnitKind,
    ty: TypeDef,
}

/// What a finished unit hands back
struct Finished {
    position: usize,
    ty: TypeDef,
    strings: StringTable,
    errors: WeaveErrors,
    rewritten: Vec<String>,
    synthesized: Vec<TypeDef>,
}

/// Everything the pipeline accumulates across phases
#[derive(Default)]
struct Outcome {
    errors: WeaveErrors,
    rewritten: Vec<String>,
    synthesized: Vec<TypeDef>,
}

impl Outcome {
    /// Fold a unit's strings into the module pool and keep its results
    fn absorb(&mut self, done: Finished, pool: &mut ConstantPool) -> TypeDef {
        let Finished {
            mut ty,
            strings,
            errors,
            rewritten,
            mut synthesized,
            ..
        } = done;
        if !strings.is_unchanged() {
            for body in ty.methods.iter_mut().filter_map(|m| m.body.as_mut()) {
                strings.commit(&mut body.instrs, pool);
            }
            for extra in &mut synthesized {
                for body in extra.methods.iter_mut().filter_map(|m| m.body.as_mut()) {
                    strings.commit(&mut body.instrs, pool);
                }
            }
        }
        self.errors.extend(errors.0);
        self.rewritten.extend(rewritten);
        self.synthesized.append(&mut synthesized);
        ty
    }

    /// Stop here if a metadata-consistency error was raised
    fn checkpoint(&mut self) -> Result<(), WeaveErrors> {
        if self.errors.has_fatal() {
            Err(std::mem::take(&mut self.errors))
        } else {
            Ok(())
        }
    }
}

impl Weaver {
    /// Weaver over a helper library and native descriptor table
    pub fn new(config: WeaveConfig, helpers: HelperLibrary, metadata: NativeMetadata) -> Self {
        Self {
            config,
            helpers,
            metadata,
        }
    }

    /// Weaver with the built-in helper library and no descriptor table
    pub fn standard(config: WeaveConfig) -> Self {
        let helpers = HelperLibrary::standard(&config);
        Self::new(config, helpers, NativeMetadata::new())
    }

    /// Configuration in use
    pub fn config(&self) -> &WeaveConfig {
        &self.config
    }

    /// Weave `module` in place
    ///
    /// On failure the module is left untouched and every collected error is
    /// returned.
    pub fn weave(&self, module: &mut Module) -> Result<WeaveReport, WeaveErrors> {
        let name = module.metadata.name.clone();
        let _span = info_span!("weave", module = %name).entered();
        if module.flags & flags::WOVEN != 0 {
            return Err(WeaveError::invariant(&name, "module is already woven").into());
        }

        let mut work = module.clone();
        let mut index = TypeIndex::build(&work, &self.helpers)?;
        let strategies = StrategyCache::new();
        let registry = Registry::new();
        let mut outcome = Outcome::default();

        // Structural rules; a type that breaks one is not rewritten
        let mut broken = FxHashSet::default();
        for ty in &work.types {
            let mut errors = check_type(ty, &index, &self.helpers);
            if ty.kind == TypeKind::Enum && markers::is_exposed(ty) {
                errors.extend(check_enum(ty));
            }
            if !errors.is_empty() {
                broken.insert(ty.name.clone());
                outcome.errors.extend(errors);
            }
        }
        outcome.checkpoint()?;

        let promoted = promote_exposed_fields(&mut work, &mut outcome.errors);
        debug!(promoted, "promoted exposed fields");

        let order = plan_records(&work, &index)?;
        info!(records = order.len(), "record order computed");
        for record in order.iter().filter(|r| !broken.contains(*r)) {
            let Some(position) = work.types.iter().position(|t| &t.name == record && is_woven_record(t)) else {
                continue;
            };
            let _span = info_span!("record", type_name = %record).entered();
            let ty = work.types[position].clone();
            let (done, layout) = {
                let ctx = self.context(&index, &strategies, &registry);
                let mut unit = Unit::new(&ctx, &work.constants);
                let mut ty = ty;
                let layout = match rewrite_record(&mut unit, &mut ty) {
                    Ok(layout) => layout,
                    Err(e) => {
                        unit.errors.push(e);
                        None
                    }
                };
                (finish(unit, position, ty), layout)
            };
            if done.errors.is_empty() {
                registry.export(record);
            }
            work.types[position] = outcome.absorb(done, &mut work.constants);
            index.set_record_layout(record, layout);
        }
        outcome.checkpoint()?;

        for ty in work
            .types
            .iter()
            .filter(|t| t.kind == TypeKind::Enum && markers::is_exposed(t) && !broken.contains(&t.name))
        {
            registry.export(&ty.name);
        }

        let jobs: Vec<Job> = work
            .types
            .iter()
            .enumerate()
            .filter(|(_, t)| !broken.contains(&t.name))
            .filter_map(|(position, t)| {
                UnitKind::of(t).map(|kind| Job {
                    position,
                    kind,
                    ty: t.clone(),
                })
            })
            .collect();
        let finished = {
            let ctx = self.context(&index, &strategies, &registry);
            run_units(&ctx, &work.constants, jobs, self.config.worker_count())?
        };
        for done in finished {
            let position = done.position;
            work.types[position] = outcome.absorb(done, &mut work.constants);
        }
        outcome.checkpoint()?;
        outcome.errors.clone().into_result()?;

        // Synthesized types go last, by name
        let mut synthesized = std::mem::take(&mut outcome.synthesized);
        synthesized.sort_by(|a, b| a.name.cmp(&b.name));
        let mut names: FxHashSet<String> = work.types.iter().map(|t| t.name.clone()).collect();
        for ty in &synthesized {
            if !names.insert(ty.name.clone()) {
                outcome
                    .errors
                    .push(WeaveError::invariant(&ty.name, "synthesized type collides with a declared type"));
            }
        }
        outcome.errors.clone().into_result()?;
        let synthesized_types = synthesized.iter().map(|t| t.name.clone()).collect();
        work.types.extend(synthesized);
        work.flags |= flags::WOVEN;

        if self.config.verify {
            verify_module(&work).map_err(|e| WeaveError::invariant(&name, e.to_string()))?;
        }

        let report = WeaveReport {
            module: name,
            exported_types: registry.exported(),
            extension_methods: registry.extensions(),
            records_in_order: order,
            rewritten_members: outcome.rewritten,
            synthesized_types,
            strategies: strategies.len(),
            digest: None,
        };
        info!(
            rewritten = report.rewritten_members.len(),
            synthesized = report.synthesized_types.len(),
            "weave complete"
        );
        *module = work;
        Ok(report)
    }

    fn context<'a>(
        &'a self,
        index: &'a TypeIndex,
        strategies: &'a StrategyCache,
        registry: &'a Registry,
    ) -> WeaveContext<'a> {
        WeaveContext {
            config: &self.config,
            helpers: &self.helpers,
            index,
            metadata: &self.metadata,
            strategies,
            registry,
        }
    }
}

fn finish(unit: Unit<'_>, position: usize, ty: TypeDef) -> Finished {
    Finished {
        position,
        ty,
        strings: unit.strings,
        errors: unit.errors,
        rewritten: unit.rewritten,
        synthesized: unit.synthesized,
    }
}

/// Run every job on a work-stealing pool; results come back in declaration
/// order
fn run_units(
    ctx: &WeaveContext<'_>,
    pool: &ConstantPool,
    jobs: Vec<Job>,
    workers: usize,
) -> Result<Vec<Finished>, WeaveErrors> {
    if jobs.is_empty() {
        return Ok(Vec::new());
    }
    let workers = workers.clamp(1, jobs.len());
    let injector = Arc::new(Injector::new());
    for job in jobs {
        injector.push(job);
    }

    let locals: Vec<Worker<Job>> = (0..workers).map(|_| Worker::new_fifo()).collect();
    let stealers: Vec<Stealer<Job>> = locals.iter().map(Worker::stealer).collect();
    let results = Mutex::new(Vec::new());

    let scope = crossbeam::scope(|s| {
        for (id, local) in locals.into_iter().enumerate() {
            let injector = Arc::clone(&injector);
            let stealers = &stealers;
            let results = &results;
            s.spawn(move |_| {
                while let Some(job) = find_work(&local, stealers, &injector) {
                    let _span = info_span!("unit", worker = id, type_name = %job.ty.name).entered();
                    let mut unit = Unit::new(ctx, pool);
                    let mut ty = job.ty;
                    weave_unit(&mut unit, &mut ty, job.kind);
                    let done = finish(unit, job.position, ty);
                    results.lock().push(done);
                }
            });
        }
    });
    if scope.is_err() {
        return Err(WeaveError::invariant("weave", "a weave worker panicked").into());
    }

    let mut finished = results.into_inner();
    finished.sort_by_key(|f| f.position);
    Ok(finished)
}

/// Local queue first, then the global injector, then the other workers
fn find_work(local: &Worker<Job>, stealers: &[Stealer<Job>], injector: &Injector<Job>) -> Option<Job> {
    if let Some(job) = local.pop() {
        return Some(job);
    }
    loop {
        match injector.steal_batch_and_pop(local) {
            Steal::Success(job) => return Some(job),
            Steal::Retry => continue,
            Steal::Empty => {}
        }
        let stolen: Steal<Job> = stealers.iter().map(Stealer::steal).collect();
        match stolen {
            Steal::Success(job) => return Some(job),
            Steal::Retry => continue,
            Steal::Empty => return None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCategory;
    use stitch_bytecode::{Attribute, FieldDef, MethodDef, ParamDef, PropertyDef, TypeSig};

    fn module() -> Module {
        let mut module = Module::new("game");

        let mut vec2 = TypeDef::new("Game.Vec2", TypeKind::Struct);
        vec2.attributes.push(Attribute::new(markers::EXPOSED_STRUCT));
        vec2.fields.push(FieldDef::new("x", TypeSig::F32));
        vec2.fields.push(FieldDef::new("y", TypeSig::F32));
        module.types.push(vec2);

        for name in ["Game.Actor", "Game.Pawn", "Game.Light"] {
            let mut ty = TypeDef::new(name, TypeKind::Class);
            ty.base = Some("Host.CoreObject".into());
            ty.attributes.push(Attribute::new(markers::EXPOSED_CLASS));
            let mut pos = PropertyDef::new("Position", TypeSig::Struct("Game.Vec2".into()));
            pos.attributes.push(Attribute::new(markers::EXPOSED_PROPERTY));
            ty.properties.push(pos);
            ty.methods.push(MethodDef::new("get_Position", vec![], TypeSig::Struct("Game.Vec2".into())));
            ty.methods.push(MethodDef::new(
                "set_Position",
                vec![ParamDef::new("value", TypeSig::Struct("Game.Vec2".into()))],
                TypeSig::Void,
            ));
            let mut say = MethodDef::new("Say", vec![ParamDef::new("text", TypeSig::String)], TypeSig::Void);
            say.attributes.push(Attribute::new(markers::EXPOSED_FUNCTION));
            ty.methods.push(say);
            module.types.push(ty);
        }

        let mut iface = TypeDef::new("Game.IUsable", TypeKind::Interface);
        iface.attributes.push(Attribute::new(markers::EXPOSED_INTERFACE));
        iface.methods.push(MethodDef::new("Use", vec![], TypeSig::Void));
        module.types.push(iface);
        module
    }

    fn weaver(jobs: usize) -> Weaver {
        Weaver::standard(WeaveConfig {
            jobs,
            ..WeaveConfig::default()
        })
    }

    #[test]
    fn test_weave_marks_module_and_reports() {
        let mut module = module();
        let report = weaver(2).weave(&mut module).unwrap();
        assert!(module.flags & flags::WOVEN != 0);
        assert_eq!(report.records_in_order, ["Game.Vec2"]);
        assert_eq!(report.synthesized_types, ["Game.IUsableProxy"]);
        assert_eq!(
            report.exported_types,
            ["Game.Actor", "Game.IUsable", "Game.Light", "Game.Pawn", "Game.Vec2"]
        );
        assert_eq!(report.rewritten_members[0], "Game.Vec2::x");
        assert_eq!(module.types.last().unwrap().name, "Game.IUsableProxy");
    }

    #[test]
    fn test_output_is_independent_of_worker_count() {
        let mut one = module();
        let mut many = module();
        weaver(1).weave(&mut one).unwrap();
        weaver(4).weave(&mut many).unwrap();
        assert_eq!(one.encode().unwrap(), many.encode().unwrap());
    }

    #[test]
    fn test_rewoven_module_is_rejected() {
        let mut module = module();
        let weaver = weaver(1);
        weaver.weave(&mut module).unwrap();
        let errors = weaver.weave(&mut module).unwrap_err();
        assert_eq!(errors.0[0].category, ErrorCategory::InvariantViolation);
    }

    #[test]
    fn test_failed_weave_leaves_module_untouched() {
        let mut module = module();
        module.types[1].base = Some("Engine.Unknown".into());
        let before = module.clone();
        let errors = weaver(2).weave(&mut module).unwrap_err();
        assert!(errors.has_fatal());
        assert_eq!(module.types, before.types);
    }
}
