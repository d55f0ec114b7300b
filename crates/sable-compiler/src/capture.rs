//! Closure classes.
//!
//! A class declared inside a function body may refer to locals of that
//! body. Such a class carries the `CAPTURES` flag and the list of names it
//! refers to. At each construction site the names are bound to the locals
//! visible there and the class is promoted: every captured name becomes a
//! hidden member variable, and every constructor gains a hidden
//! parameter of the captured type.
//!
//! The first construction promotes the class itself. A construction that
//! captures different types gets a clone of the class, promoted the same
//! way. The class's instance cache maps each set of captured types to the
//! declaration serving it.

use sable_core::{
    CompilationError, DeclId, Fault, InternalError, Signature, TypeKey, TypeRecord,
};
use sable_registry::{CAPTURED_PREFIX, CTOR_NAME, DeclKind, Param, Probe};
use tracing::debug;

use crate::driver::Instantiator;
use crate::overload::CallArg;

type Result<T> = std::result::Result<T, Fault>;

impl Instantiator<'_> {
    /// Declaration to construct for a capturing `class` at the current
    /// site, with the captured locals as named constructor arguments.
    ///
    /// `None` means an error was reported.
    pub(crate) fn capture_site(
        &mut self,
        class: DeclId,
    ) -> Result<Option<(DeclId, Vec<CallArg>)>> {
        let names = self.graph.get(class)?.pending_captures.clone();
        let location = self.location();
        let decl = self.decl()?;

        let mut keys = Vec::with_capacity(names.len());
        let mut args = Vec::with_capacity(names.len());
        for name in &names {
            let Some(local) = self.frame()?.scopes.lookup(name) else {
                self.report_error(CompilationError::UnboundCapture {
                    name: name.clone(),
                    location,
                });
                return Ok(None);
            };
            if self.is_poisoned(local) {
                return Ok(None);
            }
            let record = self.record(local)?;
            if record.is_any() {
                self.report_error(CompilationError::UnresolvedType {
                    name: name.clone(),
                    location,
                });
                return Ok(None);
            }
            self.frame_mut()?.scopes.mark_used(local);
            keys.push(TypeKey::new(record.kind));
            args.push(CallArg::named(
                local,
                decl.slot(local),
                format!("{CAPTURED_PREFIX}{name}"),
            ));
        }

        let signature = Signature::new(keys.clone());
        let target = match self.graph.probe_instance(class, &signature)? {
            Probe::Valid {
                remap: Some(target),
                ..
            } => {
                self.state.stats.cache_hits += 1;
                target
            }
            _ => {
                let target = if self.graph.get(class)?.instances.has_remaps() {
                    self.state.stats.clones += 1;
                    self.graph.clone_declaration(class, self.types)?
                } else {
                    class
                };
                self.promote(target, &names, &keys)?;
                self.graph.create_remap(class, signature, target)?;
                debug!(
                    target: "sable::capture",
                    class = %class,
                    served_by = %target,
                    captures = names.len(),
                    "promoted closure class"
                );
                target
            }
        };
        Ok(Some((target, args)))
    }

    /// Turn captured names into hidden members and constructor parameters
    /// of the given types. Synthesized constructors are included.
    fn promote(&mut self, class: DeclId, names: &[String], keys: &[TypeKey]) -> Result<()> {
        let ctors = self.graph.lookup_children(class, CTOR_NAME);

        for (name, key) in names.iter().zip(keys) {
            let hidden = format!("{CAPTURED_PREFIX}{name}");
            let member = match self.graph.lookup_children(class, &hidden).first() {
                Some(&member) => member,
                None => {
                    let member = self
                        .graph
                        .create(Some(class), &hidden, DeclKind::Variable)
                        .map_err(|_| InternalError::InvalidDeclaration(class))?;
                    self.types
                        .bulk_create(member, 1)
                        .map_err(|_| InternalError::InvalidDeclaration(member))?;
                    member
                }
            };
            self.types
                .set(member.return_slot(), TypeRecord::from_key(*key))?;

            for &ctor in &ctors {
                let existing = self
                    .graph
                    .get(ctor)?
                    .param(&hidden)
                    .map(|(_, param)| param.slot);
                let slot = match existing {
                    Some(slot) => slot,
                    None => {
                        let local = self.types.bulk_append(ctor, 1);
                        let slot = ctor.slot(local);
                        self.graph
                            .get_mut(ctor)?
                            .params
                            .push(Param::new(hidden.clone(), slot));
                        slot
                    }
                };
                self.types.set(slot, TypeRecord::from_key(*key))?;
            }
        }
        Ok(())
    }
}
