//! The instantiation driver.
//!
//! [`Instantiator`] walks one generic body for one concrete signature and
//! produces the typed IR of that instance. Calls found along the way are
//! resolved against their overload sets and instantiated on the spot, so a
//! single request compiles everything reachable from it.
//!
//! Every body runs inside its own type-table layer: parameters and generics
//! are bound into the layer from the signature, the walk types the
//! remaining registers, and the layer is committed when the body compiled
//! and discarded when it did not.
//!
//! Compilation errors are reported once and poison the register they were
//! found on; the walk continues so later errors still surface. Faults
//! unwind the whole request.

mod calls;
mod frame;
mod names;
mod ops;

use rustc_hash::{FxHashMap, FxHashSet};
use sable_core::{
    CompilationError, DeclId, Diagnostic, DiagnosticSink, Fault, InstanceId, InternalError,
    IrLocation, IrModule, ModuleId, ShapeError, Signature, SlotId, StringId, TypeKey, TypeRecord,
    TypedOp,
};
use sable_registry::{DeclFlags, Declaration, DeclarationGraph, Probe, TypeTable};
use tracing::{debug, trace, warn};

pub(crate) use frame::Frame;

use crate::options::InstantiationOptions;
use crate::overload::{self, CandidateMatch};

type Result<T> = std::result::Result<T, Fault>;

/// Counters kept across requests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InstantiationStats {
    /// Generic bodies walked.
    pub body_walks: usize,
    /// Requests served from an instance cache.
    pub cache_hits: usize,
    /// Speculative instantiations made to break overload ties.
    pub probes: usize,
    /// Special members generated by the engine.
    pub synthesized: usize,
    /// Declarations cloned for a new set of captured types.
    pub clones: usize,
}

/// Engine state that outlives a single request.
#[derive(Debug, Default)]
pub struct InstantiationState {
    pub(crate) stats: InstantiationStats,
    /// Instances that failed while diagnostics were suppressed.
    pub(crate) silenced: FxHashSet<InstanceId>,
}

impl InstantiationState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> InstantiationStats {
        self.stats
    }
}

/// Result of one instantiation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Compiled {
        instance: InstanceId,
        return_type: TypeKey,
    },
    /// The body did not compile; diagnostics have been reported.
    Failed,
}

impl Outcome {
    pub fn instance(&self) -> Option<InstanceId> {
        match self {
            Outcome::Compiled { instance, .. } => Some(*instance),
            Outcome::Failed => None,
        }
    }

    pub fn is_compiled(&self) -> bool {
        matches!(self, Outcome::Compiled { .. })
    }
}

/// Walks generic bodies into typed instances.
pub struct Instantiator<'a> {
    pub(crate) graph: &'a mut DeclarationGraph,
    pub(crate) types: &'a mut TypeTable,
    modules: &'a FxHashMap<ModuleId, IrModule>,
    pub(crate) options: InstantiationOptions,
    sink: &'a mut dyn DiagnosticSink,
    pub(crate) state: &'a mut InstantiationState,
    pub(crate) frames: Vec<Frame>,
    /// Nesting of speculative instantiations; diagnostics are dropped while
    /// non-zero.
    probe_depth: u32,
    /// The declaration whose body faulted has been marked.
    fault_marked: bool,
}

impl<'a> Instantiator<'a> {
    pub fn new(
        graph: &'a mut DeclarationGraph,
        types: &'a mut TypeTable,
        modules: &'a FxHashMap<ModuleId, IrModule>,
        options: InstantiationOptions,
        sink: &'a mut dyn DiagnosticSink,
        state: &'a mut InstantiationState,
    ) -> Self {
        Self {
            graph,
            types,
            modules,
            options,
            sink,
            state,
            frames: Vec::new(),
            probe_depth: 0,
            fault_marked: false,
        }
    }

    /// Instantiate `decl` for `signature`, or return the cached instance.
    ///
    /// A signature already under construction further up the frame stack
    /// is a recursive call: it resolves to the pending instance when the
    /// signature is concrete and the return type is already known.
    ///
    /// A cached failure first found while probing is reported to the first
    /// request made with diagnostics on.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn instantiate(&mut self, decl: DeclId, signature: Signature) -> Result<Outcome> {
        let declaration = self.graph.get(decl)?;
        if declaration.has_flag(DeclFlags::ERROR) {
            return Ok(Outcome::Failed);
        }
        let body = declaration.body;
        match declaration.instances.is_valid(&signature) {
            Probe::Valid {
                id, return_type, ..
            } => {
                self.state.stats.cache_hits += 1;
                trace!(target: "sable::instantiate", decl = %decl, instance = %id, "cache hit");
                return Ok(Outcome::Compiled {
                    instance: id,
                    return_type,
                });
            }
            Probe::Failed => {
                self.surface_silenced(decl, &signature)?;
                return Ok(Outcome::Failed);
            }
            Probe::Pending(id) => return self.recursive_call(decl, id),
            Probe::Indeterminate => {}
        }

        let body = body.ok_or(InternalError::MissingBody(decl))?;
        let modules = self.modules;
        let module = modules
            .get(&body.module)
            .ok_or(InternalError::MissingModule(body.module))?;

        let instance = self.graph.create_instance(decl, signature.clone())?;
        self.graph.add_flags(decl, DeclFlags::INSTANTIATING)?;
        self.state.stats.body_walks += 1;
        debug!(
            target: "sable::instantiate",
            decl = %decl,
            signature = %signature,
            depth = self.frames.len(),
            probing = self.probe_depth > 0,
            "walking body"
        );

        let layer = self.types.begin_layer(decl);
        self.frames
            .push(Frame::new(decl, instance, body.module, body.offset));
        let walked = self
            .bind_signature(decl, &signature)
            .and_then(|()| self.walk(module));
        let frame = self.frames.pop();
        let failed = walked.is_err() || frame.as_ref().is_none_or(|frame| frame.failed);
        let closed = if failed {
            self.types.discard(layer)
        } else {
            self.types.commit(layer)
        };
        self.graph.remove_flags(decl, DeclFlags::INSTANTIATING)?;

        if let Err(fault) = walked {
            self.graph.invalidate_instance(instance)?;
            if !self.fault_marked {
                self.graph.add_flags(decl, DeclFlags::ERROR)?;
                self.fault_marked = true;
            }
            warn!(target: "sable::instantiate", decl = %decl, %fault, "instantiation aborted");
            return Err(fault);
        }
        closed?;
        let frame = frame.ok_or(InternalError::FrameUnderflow)?;

        if frame.failed {
            self.graph.invalidate_instance(instance)?;
            if self.probe_depth > 0 {
                self.state.silenced.insert(instance);
            }
            debug!(target: "sable::instantiate", decl = %decl, instance = %instance, "instantiation failed");
            return Ok(Outcome::Failed);
        }

        let return_type = frame.return_type.unwrap_or(TypeKey::VOID);
        let symbol = signature.symbol_name(&self.graph.qualified_name(decl));
        debug!(
            target: "sable::instantiate",
            decl = %decl,
            instance = %instance,
            symbol = %symbol,
            ops = frame.chunk.len(),
            "compiled"
        );
        self.graph
            .update_instance(instance, symbol, return_type, frame.chunk)?;
        Ok(Outcome::Compiled {
            instance,
            return_type,
        })
    }

    fn recursive_call(&mut self, decl: DeclId, id: InstanceId) -> Result<Outcome> {
        let concrete = self
            .graph
            .instance(id)
            .is_some_and(|instance| instance.signature.is_concrete());
        let known = self
            .frames
            .iter()
            .rev()
            .find(|frame| frame.instance == id)
            .and_then(|frame| frame.return_type);
        match known {
            Some(return_type) if concrete => {
                self.graph.add_flags(decl, DeclFlags::RECURSIVE)?;
                trace!(target: "sable::instantiate", decl = %decl, instance = %id, "recursive call");
                Ok(Outcome::Compiled {
                    instance: id,
                    return_type,
                })
            }
            // Probing a pending candidate only rules it out.
            _ if self.probe_depth > 0 => {
                trace!(target: "sable::overload", decl = %decl, instance = %id, "pending candidate");
                Ok(Outcome::Failed)
            }
            _ => {
                let name = self.graph.qualified_name(decl);
                let location = self.location();
                self.report_error(CompilationError::RecursiveNotDefined { name, location });
                Ok(Outcome::Failed)
            }
        }
    }

    /// Report, once, a cached failure that was found while diagnostics
    /// were suppressed.
    fn surface_silenced(&mut self, decl: DeclId, signature: &Signature) -> Result<()> {
        if self.probe_depth > 0 {
            return Ok(());
        }
        let silenced = self
            .graph
            .get(decl)?
            .instances
            .find(signature)
            .is_some_and(|instance| self.state.silenced.remove(&instance.id));
        if silenced {
            let name = overload::describe_candidate(self.graph, self.types, decl);
            let location = self.location();
            self.report_error(CompilationError::FailedInstantiation { name, location });
        }
        Ok(())
    }

    /// Bind parameters, generics and the declared return type into the
    /// fresh layer.
    fn bind_signature(&mut self, decl: DeclId, signature: &Signature) -> Result<()> {
        let declaration = self.graph.get(decl)?;
        let params = declaration.params.clone();
        let generics = declaration.generics.clone();
        let is_method = declaration
            .parent
            .is_some_and(|parent| self.is_class(parent));
        let entries = signature.entries();
        if entries.len() != params.len() + generics.len() {
            return Err(ShapeError::new(
                "signature",
                format!(
                    "{} entries for {} parameters and {} generics",
                    entries.len(),
                    params.len(),
                    generics.len()
                ),
                self.location(),
            )
            .into());
        }

        for (param, key) in params.iter().zip(entries) {
            let local = self.own_local(decl, param.slot)?;
            *self.types.substitute_mut(local)? = TypeRecord::from_key(*key);
            self.types.pin(local)?;
            self.frame_mut()?
                .scopes
                .declare_param(local, param.name.clone());
        }
        for (generic, key) in generics.iter().zip(&entries[params.len()..]) {
            let local = self.own_local(decl, generic.slot)?;
            *self.types.substitute_mut(local)? = TypeRecord::from_key(*key).synthetic();
            self.types.pin(local)?;
        }

        let declared = self.types.resolve(decl.return_slot())?.clone();
        let declared = declared.is_concrete().then(|| declared.key());
        let returns = self.types.substitute_mut(SlotId::RETURN)?;
        if let Some(key) = declared {
            *returns = TypeRecord::from_key(key);
        }
        self.types.pin(SlotId::RETURN)?;

        let frame = self.frame_mut()?;
        frame.return_type = declared;
        frame.return_declared = declared.is_some();
        if is_method {
            frame.self_reg = params
                .first()
                .filter(|param| param.name == "self")
                .map(|param| param.slot.local);
        }
        Ok(())
    }

    fn own_local(&self, decl: DeclId, slot: SlotId) -> Result<u32> {
        if slot.decl != decl {
            return Err(ShapeError::new(
                "signature",
                format!("parameter slot {slot} belongs to another declaration"),
                self.location(),
            )
            .into());
        }
        Ok(slot.local)
    }

    fn walk(&mut self, module: &IrModule) -> Result<()> {
        loop {
            let pc = self.frame()?.pc;
            let op = module
                .op_at(pc)
                .ok_or_else(|| ShapeError::new("end", "body runs past the module", self.location()))?;
            trace!(target: "sable::walk", pc, %op);
            if self.options.emits_trace_diagnostics() {
                let location = self.location();
                self.report(Diagnostic::trace(op.to_string()).at(location));
            }

            self.step(module, op)?;

            let frame = self.frame_mut()?;
            if frame.done {
                return Ok(());
            }
            frame.pc += 1;
        }
    }

    /// Instantiate a chosen callee from inside a body walk.
    ///
    /// A failure fails the calling body too.
    pub(crate) fn call_instance(
        &mut self,
        decl: DeclId,
        signature: Signature,
    ) -> Result<Option<(InstanceId, TypeKey)>> {
        match self.instantiate(decl, signature)? {
            Outcome::Compiled {
                instance,
                return_type,
            } => Ok(Some((instance, return_type))),
            Outcome::Failed => {
                if let Some(frame) = self.frames.last_mut() {
                    frame.failed = true;
                }
                Ok(None)
            }
        }
    }

    /// Speculatively instantiate a tied candidate with diagnostics off.
    pub(crate) fn probe(&mut self, candidate: &CandidateMatch) -> Result<bool> {
        self.state.stats.probes += 1;
        self.probe_depth += 1;
        let outcome = self.instantiate(candidate.decl, candidate.signature.clone());
        self.probe_depth -= 1;
        let compiled = outcome?.is_compiled();
        trace!(target: "sable::overload", candidate = %candidate.decl, compiled, "probed");
        Ok(compiled)
    }

    // ========================================================================
    // Reporting
    // ========================================================================

    pub(crate) fn report(&mut self, diagnostic: Diagnostic) {
        if self.probe_depth == 0 {
            self.sink.report(diagnostic);
        }
    }

    /// Report a compilation error and fail the current body.
    pub(crate) fn report_error(&mut self, error: CompilationError) {
        debug!(
            target: "sable::instantiate",
            %error,
            suppressed = self.probe_depth > 0,
            "compilation error"
        );
        if let Some(frame) = self.frames.last_mut() {
            frame.failed = true;
        }
        if self.probe_depth == 0 {
            self.sink.report(Diagnostic::from(&error));
        }
    }

    /// Report an error and poison `dst`.
    pub(crate) fn fail(&mut self, dst: u32, error: CompilationError) {
        self.poison(dst);
        self.report_error(error);
    }

    // ========================================================================
    // Frame access
    // ========================================================================

    pub(crate) fn frame(&self) -> Result<&Frame> {
        self.frames
            .last()
            .ok_or(Fault::Internal(InternalError::FrameUnderflow))
    }

    pub(crate) fn frame_mut(&mut self) -> Result<&mut Frame> {
        self.frames
            .last_mut()
            .ok_or(Fault::Internal(InternalError::FrameUnderflow))
    }

    pub(crate) fn location(&self) -> IrLocation {
        self.frames.last().map(Frame::location).unwrap_or_default()
    }

    pub(crate) fn decl(&self) -> Result<DeclId> {
        Ok(self.frame()?.decl)
    }

    pub(crate) fn emit(&mut self, op: TypedOp) -> Result<()> {
        self.frame_mut()?.chunk.push(op);
        Ok(())
    }

    pub(crate) fn poison(&mut self, reg: u32) {
        if let Some(frame) = self.frames.last_mut() {
            frame.poison(reg);
        }
    }

    pub(crate) fn is_poisoned(&self, reg: u32) -> bool {
        self.frames
            .last()
            .is_some_and(|frame| frame.is_poisoned(reg))
    }

    pub(crate) fn string(&self, module: &IrModule, id: StringId) -> Result<String> {
        module.string(id).map(str::to_string).ok_or_else(|| {
            ShapeError::new("string", format!("unknown string ${}", id.index()), self.location())
                .into()
        })
    }

    // ========================================================================
    // Registers
    // ========================================================================

    pub(crate) fn slot(&self, reg: u32) -> Result<SlotId> {
        Ok(self.decl()?.slot(reg))
    }

    /// Register a read of `reg` actually lands on.
    pub(crate) fn target(&self, reg: u32) -> Result<u32> {
        let decl = self.decl()?;
        let slot = self.types.resolve_alias(decl.slot(reg))?;
        if slot.decl != decl {
            return Err(ShapeError::new(
                "register",
                format!("r{reg} aliases {slot} outside the body"),
                self.location(),
            )
            .into());
        }
        Ok(slot.local)
    }

    pub(crate) fn record(&self, reg: u32) -> Result<TypeRecord> {
        Ok(self.types.read(self.slot(reg)?)?.clone())
    }

    pub(crate) fn set_type(&mut self, reg: u32, record: TypeRecord) -> Result<()> {
        *self.types.substitute_mut(reg)? = record;
        Ok(())
    }

    pub(crate) fn is_class(&self, decl: DeclId) -> bool {
        self.graph.get(decl).is_ok_and(Declaration::is_class)
    }

    /// Whether `reg` holds a reference-counted class instance.
    pub(crate) fn is_managed(&self, reg: u32) -> Result<bool> {
        let record = self.record(reg)?;
        Ok(record.instance && record.kind.linked().is_some_and(|decl| self.is_class(decl)))
    }

    pub(crate) fn type_name(&self, key: TypeKey) -> String {
        overload::type_name(self.graph, key)
    }
}
