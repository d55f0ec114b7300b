//! Program-building helpers shared by the integration tests and benchmarks.
//!
//! A [`Program`] declares namespaces, classes and functions through the
//! build-phase [`SymbolGraphBuilder`] and writes their bodies into one IR
//! module. Register slots are sized from the bodies when the program is
//! finished into a [`Session`].

#![allow(dead_code)]

use rustc_hash::FxHashMap;
use sable::prelude::*;

pub const MODULE: ModuleId = ModuleId::new(0);

/// Declared type of a parameter or return value.
#[derive(Debug, Clone)]
pub enum Ty {
    /// Inferred from the signature or the first return.
    Any,
    Void,
    Builtin(BuiltinKind),
    Class(DeclId),
    /// Bound to the named generic parameter of the same function.
    Generic(&'static str),
}

impl Ty {
    pub fn key(&self) -> TypeKey {
        match self {
            Ty::Builtin(kind) => TypeKey::builtin(*kind),
            Ty::Class(decl) => TypeKey::linked(*decl),
            Ty::Void => TypeKey::VOID,
            Ty::Any | Ty::Generic(_) => TypeKey::ANY,
        }
    }
}

pub fn key(kind: BuiltinKind) -> TypeKey {
    TypeKey::builtin(kind)
}

pub fn int(value: i64, kind: BuiltinKind) -> Literal {
    Literal::Int(value, kind)
}

pub struct Program {
    builder: SymbolGraphBuilder,
    module: ModuleBuilder,
    /// Locals allocated per declaration.
    slots: FxHashMap<DeclId, u32>,
    bodies: Vec<(DeclId, u32)>,
}

impl Default for Program {
    fn default() -> Self {
        Self::new()
    }
}

impl Program {
    pub fn new() -> Self {
        Self {
            builder: SymbolGraphBuilder::new(),
            module: ModuleBuilder::new(MODULE),
            slots: FxHashMap::default(),
            bodies: Vec::new(),
        }
    }

    pub fn builder(&self) -> &SymbolGraphBuilder {
        &self.builder
    }

    pub fn namespace(&self, parent: Option<DeclId>, name: &str) -> DeclId {
        self.builder
            .create(parent, name, DeclKind::Namespace)
            .unwrap()
    }

    pub fn class(&self, parent: DeclId, name: &str) -> DeclId {
        self.builder
            .create(Some(parent), name, DeclKind::Class)
            .unwrap()
    }

    /// A class whose methods refer to the given locals of its construction site.
    pub fn closure_class(&self, parent: DeclId, name: &str, captures: &[&str]) -> DeclId {
        let class = self.class(parent, name);
        self.builder.add_flags(class, DeclFlags::CAPTURES).unwrap();
        self.builder
            .set_pending_captures(class, captures.iter().map(|c| c.to_string()).collect())
            .unwrap();
        class
    }

    pub fn variable(&mut self, parent: DeclId, name: &str, ty: Ty) -> DeclId {
        let decl = self
            .builder
            .create(Some(parent), name, DeclKind::Variable)
            .unwrap();
        self.builder.bulk_create(decl, 1).unwrap();
        self.slots.insert(decl, 1);
        self.builder
            .set_slot(decl.return_slot(), record(&ty, decl, &[]))
            .unwrap();
        decl
    }

    /// A function without generic parameters. Parameters occupy registers
    /// 2, 3, ... in order.
    pub fn function(
        &mut self,
        parent: DeclId,
        name: &str,
        params: &[(&str, Ty)],
        returns: Ty,
        body: impl FnOnce(&mut ModuleBuilder),
    ) -> DeclId {
        self.generic_function(parent, name, &[], params, returns, body)
    }

    /// A function whose generic parameters follow its parameters' registers.
    pub fn generic_function(
        &mut self,
        parent: DeclId,
        name: &str,
        generics: &[&'static str],
        params: &[(&str, Ty)],
        returns: Ty,
        body: impl FnOnce(&mut ModuleBuilder),
    ) -> DeclId {
        let decl = self
            .builder
            .create(Some(parent), name, DeclKind::Function)
            .unwrap();
        let count = 1 + params.len() as u32 + generics.len() as u32;
        self.builder.bulk_create(decl, count).unwrap();
        self.slots.insert(decl, count);

        let generic_params: Vec<GenericParam> = generics
            .iter()
            .enumerate()
            .map(|(index, name)| {
                GenericParam::new(*name, decl.slot(2 + (params.len() + index) as u32))
            })
            .collect();
        let params: Vec<Param> = params
            .iter()
            .enumerate()
            .map(|(index, (name, ty))| {
                let slot = decl.slot(2 + index as u32);
                self.builder
                    .set_slot(slot, record(ty, decl, &generic_params))
                    .unwrap();
                Param::new(*name, slot)
            })
            .collect();
        self.builder
            .set_slot(decl.return_slot(), record(&returns, decl, &generic_params))
            .unwrap();
        self.builder.set_params(decl, params).unwrap();
        self.builder.set_generics(decl, generic_params).unwrap();

        let offset = self.module.begin_body();
        body(&mut self.module);
        self.builder
            .set_body(decl, BodyRef::new(MODULE, offset))
            .unwrap();
        self.bodies.push((decl, offset));
        decl
    }

    /// Size every body's registers and hand the program to a session.
    pub fn finish(self, options: InstantiationOptions) -> Session {
        let Program {
            builder,
            module,
            slots,
            bodies,
        } = self;
        let module = module.finish();
        for (decl, offset) in bodies {
            let end = module.body_end(offset).unwrap();
            let highest = (offset..=end)
                .filter_map(|at| module.op_at(at).and_then(Op::destination))
                .max()
                .unwrap_or(0);
            let allocated = slots[&decl];
            if highest > allocated {
                builder.bulk_append(decl, highest - allocated);
            }
        }
        Session::from_builder(builder, [module], options)
    }

    pub fn session(self) -> Session {
        self.finish(InstantiationOptions::default())
    }
}

fn record(ty: &Ty, decl: DeclId, generics: &[GenericParam]) -> TypeRecord {
    match ty {
        Ty::Any => TypeRecord::any(),
        Ty::Void => TypeRecord::void(),
        Ty::Builtin(kind) => TypeRecord::builtin(*kind),
        Ty::Class(class) => TypeRecord::linked(*class),
        Ty::Generic(name) => {
            let generic = generics
                .iter()
                .find(|generic| generic.name == *name)
                .unwrap_or_else(|| panic!("{decl} has no generic parameter '{name}'"));
            TypeRecord::any().with_extends(vec![generic.slot])
        }
    }
}

/// Typed code of an instance.
pub fn code(session: &Session, instance: InstanceId) -> &[TypedOp] {
    session.instance(instance).unwrap().code.ops()
}

/// Registers released by `unref`, in emission order.
pub fn unrefs(ops: &[TypedOp]) -> Vec<u32> {
    ops.iter()
        .filter_map(|op| match op {
            TypedOp::Unref { reg } => Some(*reg),
            _ => None,
        })
        .collect()
}

/// Call targets, in emission order.
pub fn calls(ops: &[TypedOp]) -> Vec<InstanceRef> {
    ops.iter()
        .filter_map(|op| match op {
            TypedOp::Call { target, .. } => Some(*target),
            _ => None,
        })
        .collect()
}
