//! Integration tests for the instantiation engine, driven through `Session`.
//!
//! Each test declares a small program with the helpers in `common`, then
//! instantiates an entry point and inspects the typed code, the instance
//! caches and the reported diagnostics.

mod common;

use common::{Program, Ty, calls, code, int, key, unrefs};
use sable::prelude::BuiltinKind::{F64, I32, U8, U16, U32};
use sable::prelude::*;

fn run(session: &mut Session, decl: DeclId, args: &[TypeKey]) -> (Instantiation, Diagnostics) {
    let mut diagnostics = Diagnostics::new();
    let result = session.instantiate(decl, args, &mut diagnostics);
    (result, diagnostics)
}

fn messages(diagnostics: &Diagnostics) -> Vec<String> {
    diagnostics.errors().map(|d| d.message.clone()).collect()
}

/// `id(x: i32): i32 { return x; }`
fn identity(program: &mut Program, parent: DeclId) -> DeclId {
    program.function(parent, "id", &[("x", Ty::Builtin(I32))], Ty::Builtin(I32), |b| {
        b.ret(Some(2)).end();
    })
}

// =============================================================================
// Calls and caching
// =============================================================================

#[test]
fn calls_with_equal_signatures_share_one_instance() {
    let mut program = Program::new();
    let app = program.namespace(None, "app");
    let id = identity(&mut program, app);
    let main = program.function(app, "main", &[], Ty::Void, |b| {
        b.identify(2, "id")
            .literal(3, int(1, I32))
            .push_arg(3)
            .call(4, 2)
            .identify(5, "id")
            .literal(6, int(2, I32))
            .push_arg(6)
            .call(7, 5)
            .ret(None)
            .end();
    });

    let mut session = program.session();
    let (result, diagnostics) = run(&mut session, main, &[]);
    assert!(result.success, "{:?}", messages(&diagnostics));
    assert!(diagnostics.is_empty());

    let ops = code(&session, result.instance.unwrap());
    let targets = calls(ops);
    assert_eq!(targets.len(), 2);
    assert_eq!(targets[0], targets[1]);
    assert_eq!(targets[0].decl, id);
    assert!(!ops.iter().any(TypedOp::is_ownership));

    assert_eq!(session.graph().get(id).unwrap().instances.len(), 1);
    let callee = session.instance(targets[0].instance).unwrap();
    assert_eq!(callee.signature, Signature::new(vec![key(I32)]));
    assert_eq!(callee.return_type, key(I32));
    assert_eq!(callee.code.ownership_ops(), 0);

    assert_eq!(session.stats().body_walks, 2);
    assert_eq!(session.stats().cache_hits, 1);
}

#[test]
fn repeated_requests_hit_the_cache() {
    let mut program = Program::new();
    let app = program.namespace(None, "app");
    let id = identity(&mut program, app);
    let mut session = program.session();

    let (first, _) = run(&mut session, id, &[key(I32)]);
    let (second, _) = run(&mut session, id, &[key(I32)]);
    assert!(first.success);
    assert_eq!(first, second);
    assert_eq!(session.stats().body_walks, 1);
    assert_eq!(session.stats().cache_hits, 1);
    assert!(!session.instance(first.instance.unwrap()).unwrap().symbol.is_empty());
}

#[test]
fn entry_arguments_take_the_declared_type() {
    let mut program = Program::new();
    let app = program.namespace(None, "app");
    let id = identity(&mut program, app);
    let mut session = program.session();

    let (exact, _) = run(&mut session, id, &[key(I32)]);
    let (narrow, diagnostics) = run(&mut session, id, &[key(BuiltinKind::I8)]);
    assert!(narrow.success, "{:?}", messages(&diagnostics));
    assert_eq!(exact.instance, narrow.instance);

    let (wrong, diagnostics) = run(&mut session, id, &[key(F64)]);
    assert!(!wrong.success);
    assert!(messages(&diagnostics)[0].contains("parameter 'x' of 'app::id'"));

    let (missing, diagnostics) = run(&mut session, id, &[]);
    assert!(!missing.success);
    assert!(messages(&diagnostics)[0].contains("takes 1 argument types, 0 given"));
    assert!(!session.succeeded());
}

#[test]
fn failures_are_sticky_across_call_sites() {
    let mut program = Program::new();
    let app = program.namespace(None, "app");
    let broken = program.function(app, "broken", &[], Ty::Any, |b| {
        b.identify(2, "missing").ret(Some(2)).end();
    });
    let first = program.function(app, "first", &[], Ty::Void, |b| {
        b.identify(2, "broken").call(3, 2).ret(None).end();
    });
    let second = program.function(app, "second", &[], Ty::Void, |b| {
        b.identify(2, "broken").call(3, 2).ret(None).end();
    });
    let mut session = program.session();

    let (result, diagnostics) = run(&mut session, first, &[]);
    assert!(!result.success);
    assert_eq!(diagnostics.error_count(), 1);
    assert!(messages(&diagnostics)[0].contains("'missing' is not declared"));

    let (result, diagnostics) = run(&mut session, second, &[]);
    assert!(!result.success);
    assert!(diagnostics.is_empty());

    let (result, diagnostics) = run(&mut session, broken, &[]);
    assert!(!result.success);
    assert!(diagnostics.is_empty());

    // first, broken and second; broken is walked once.
    assert_eq!(session.stats().body_walks, 3);
    assert!(!session.succeeded());
}

#[test]
fn generic_functions_instantiate_once_per_signature() {
    let mut program = Program::new();
    let app = program.namespace(None, "app");
    let first = program.generic_function(
        app,
        "first",
        &["T"],
        &[("x", Ty::Generic("T"))],
        Ty::Generic("T"),
        |b| {
            b.ret(Some(2)).end();
        },
    );
    let main = program.function(app, "main", &[], Ty::Void, |b| {
        b.identify(2, "first")
            .literal(3, int(7, U8))
            .push_arg(3)
            .call(4, 2)
            .identify(5, "first")
            .literal(6, Literal::Float(2.5.into(), F64))
            .push_arg(6)
            .call(7, 5)
            .identify(8, "first")
            .literal(9, int(9, U8))
            .push_arg(9)
            .call(10, 8)
            .ret(None)
            .end();
    });
    let mut session = program.session();

    let (result, diagnostics) = run(&mut session, main, &[]);
    assert!(result.success, "{:?}", messages(&diagnostics));
    let targets = calls(code(&session, result.instance.unwrap()));
    assert_eq!(targets.len(), 3);
    assert_ne!(targets[0], targets[1]);
    assert_eq!(targets[0], targets[2]);

    let instances = &session.graph().get(first).unwrap().instances;
    assert_eq!(instances.len(), 2);
    let returns: Vec<TypeKey> = instances.iter().map(|i| i.return_type).collect();
    assert_eq!(returns, vec![key(U8), key(F64)]);
    assert_eq!(
        instances.iter().next().unwrap().signature,
        Signature::new(vec![key(U8), key(U8)])
    );
}

// =============================================================================
// Recursion
// =============================================================================

#[test]
fn annotated_recursion_reuses_the_pending_instance() {
    let mut program = Program::new();
    let app = program.namespace(None, "app");
    let count = program.function(app, "count", &[("n", Ty::Builtin(I32))], Ty::Builtin(I32), |b| {
        b.identify(3, "count").push_arg(2).call(4, 3).ret(Some(4)).end();
    });
    let mut session = program.session();

    let (result, diagnostics) = run(&mut session, count, &[key(I32)]);
    assert!(result.success, "{:?}", messages(&diagnostics));
    let instance = result.instance.unwrap();
    let targets = calls(code(&session, instance));
    assert_eq!(targets, vec![InstanceRef::new(count, instance)]);
    assert!(session.graph().get(count).unwrap().has_flag(DeclFlags::RECURSIVE));
    assert_eq!(session.stats().body_walks, 1);
}

#[test]
fn inferred_recursion_must_be_fully_defined() {
    let mut program = Program::new();
    let app = program.namespace(None, "app");
    let spin = program.function(app, "spin", &[("n", Ty::Any)], Ty::Any, |b| {
        b.identify(3, "spin").push_arg(2).call(4, 3).ret(Some(4)).end();
    });
    let mut session = program.session();

    let (result, diagnostics) = run(&mut session, spin, &[key(I32)]);
    assert!(!result.success);
    let errors = messages(&diagnostics);
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("recursive function 'app::spin' must be fully defined"));
}

// =============================================================================
// Classes and ownership
// =============================================================================

#[test]
fn default_special_members_are_synthesized_once() {
    let mut program = Program::new();
    let app = program.namespace(None, "app");
    let pair = program.class(app, "Pair");
    let a = program.variable(pair, "a", Ty::Builtin(I32));
    let b_member = program.variable(pair, "b", Ty::Builtin(F64));
    let main = program.function(app, "main", &[], Ty::Void, |b| {
        b.identify(2, "Pair")
            .new_object(3, 2)
            .identify(4, "Pair")
            .new_object(5, 4)
            .ret(None)
            .end();
    });
    let mut session = program.session();

    let (result, diagnostics) = run(&mut session, main, &[]);
    assert!(result.success, "{:?}", messages(&diagnostics));
    let ops = code(&session, result.instance.unwrap());

    let ctors: Vec<InstanceRef> = ops
        .iter()
        .filter_map(|op| match op {
            TypedOp::New { class, ctor, .. } => {
                assert_eq!(*class, pair);
                Some(*ctor)
            }
            _ => None,
        })
        .collect();
    assert_eq!(ctors.len(), 2);
    assert_eq!(ctors[0], ctors[1]);
    assert_eq!(unrefs(ops), vec![5, 3]);

    let graph = session.graph();
    for name in ["new", "drop"] {
        let found = graph.lookup_children(pair, name);
        assert_eq!(found.len(), 1, "{name}");
        assert!(graph.get(found[0]).unwrap().has_flag(DeclFlags::SYNTHESIZED));
    }
    assert_eq!(session.stats().synthesized, 2);

    let ctor = code(&session, ctors[0].instance);
    assert!(matches!(ctor[0], TypedOp::InitMember { member, .. } if member == a));
    assert!(matches!(ctor[1], TypedOp::InitMember { member, .. } if member == b_member));
    let dtor = graph.lookup_children(pair, "drop")[0];
    let dtor = graph.get(dtor).unwrap().instances.iter().next().unwrap();
    assert!(matches!(dtor.code.ops()[0], TypedOp::ReleaseMember { member, .. } if member == b_member));
}

#[test]
fn nested_members_reuse_the_inner_special_members() {
    let mut program = Program::new();
    let app = program.namespace(None, "app");
    let point = program.class(app, "Point");
    program.variable(point, "x", Ty::Builtin(F64));
    let line = program.class(app, "Line");
    program.variable(line, "start", Ty::Class(point));
    program.variable(line, "end", Ty::Class(point));
    let main = program.function(app, "main", &[], Ty::Void, |b| {
        b.identify(2, "Line").new_object(3, 2).ret(None).end();
    });
    let mut session = program.session();

    let (result, diagnostics) = run(&mut session, main, &[]);
    assert!(result.success, "{:?}", messages(&diagnostics));
    assert_eq!(session.stats().synthesized, 4);

    let ctor = code(&session, result.instance.unwrap())
        .iter()
        .find_map(|op| match op {
            TypedOp::New { ctor, .. } => Some(*ctor),
            _ => None,
        })
        .unwrap();
    let inner: Vec<Option<InstanceRef>> = code(&session, ctor.instance)
        .iter()
        .filter_map(|op| match op {
            TypedOp::InitMember { ctor, .. } => Some(*ctor),
            _ => None,
        })
        .collect();
    assert_eq!(inner.len(), 2);
    assert!(inner[0].is_some());
    assert_eq!(inner[0], inner[1]);
}

#[test]
fn clones_are_synthesized_on_request() {
    let mut program = Program::new();
    let app = program.namespace(None, "app");
    let point = program.class(app, "Point");
    program.variable(point, "x", Ty::Builtin(F64));
    let line = program.class(app, "Line");
    let start = program.variable(line, "start", Ty::Class(point));
    let mut session = program.session();

    let mut diagnostics = Diagnostics::new();
    let clone = session
        .special_member(line, SpecialMember::Clone, &mut diagnostics)
        .unwrap();
    assert!(diagnostics.is_empty());
    assert!(session.succeeded());

    let instance = session.instance(clone.instance).unwrap();
    assert_eq!(instance.return_type, TypeKey::linked(line));
    let inner = match instance.code.ops()[0] {
        TypedOp::CloneMember {
            member,
            clone: Some(inner),
        } => {
            assert_eq!(member, start);
            inner
        }
        ref other => panic!("unexpected {other}"),
    };
    assert_eq!(
        session.special_member(point, SpecialMember::Clone, &mut diagnostics),
        Some(inner)
    );
    assert_eq!(session.stats().synthesized, 2);
}

#[test]
fn scope_exit_releases_newest_first() {
    let mut program = Program::new();
    let app = program.namespace(None, "app");
    program.class(app, "Pair");
    let main = program.function(app, "main", &[], Ty::Void, |b| {
        b.identify(2, "Pair")
            .scope_begin()
            .local(3, DeclType::Of(2), "v1")
            .new_object(4, 2)
            .assign(3, 4)
            .local(5, DeclType::Of(2), "v2")
            .new_object(6, 2)
            .assign(5, 6)
            .local(7, DeclType::Of(2), "v3")
            .new_object(8, 2)
            .assign(7, 8)
            .scope_end()
            .ret(None)
            .end();
    });
    let mut session = program.finish(InstantiationOptions::new().warn_unused_variables(false));

    let (result, diagnostics) = run(&mut session, main, &[]);
    assert!(result.success, "{:?}", messages(&diagnostics));
    let ops = code(&session, result.instance.unwrap());
    assert_eq!(unrefs(ops), vec![7, 5, 3]);
    // Moved temporaries are neither retained nor released.
    assert!(!ops.iter().any(|op| matches!(op, TypedOp::Ref { .. })));
}

#[test]
fn reassigning_a_managed_local_releases_the_old_value() {
    let mut program = Program::new();
    let app = program.namespace(None, "app");
    program.class(app, "Pair");
    let main = program.function(app, "main", &[], Ty::Void, |b| {
        b.identify(2, "Pair")
            .local(3, DeclType::Of(2), "current")
            .local(4, DeclType::Of(2), "other")
            .new_object(5, 2)
            .assign(3, 5)
            .new_object(6, 2)
            .assign(4, 6)
            .identify(7, "other")
            .assign(3, 7)
            .identify(8, "current")
            .ret(Some(8))
            .end();
    });
    let mut session = program.session();

    let (result, diagnostics) = run(&mut session, main, &[]);
    assert!(result.success, "{:?}", messages(&diagnostics));
    let ops = code(&session, result.instance.unwrap());
    // The overwritten value, then `other` on return; `current` is returned.
    assert_eq!(unrefs(ops), vec![3, 4]);
    assert!(ops.contains(&TypedOp::Ref { reg: 3 }));
}

#[test]
fn unknown_members_suggest_close_names() {
    let mut program = Program::new();
    let app = program.namespace(None, "app");
    let pair = program.class(app, "Pair");
    program.variable(pair, "length", Ty::Builtin(U32));
    let main = program.function(app, "main", &[], Ty::Void, |b| {
        b.identify(2, "Pair")
            .new_object(3, 2)
            .member(4, 3, "lenght")
            .ret(None)
            .end();
    });
    let mut session = program.session();

    let (result, diagnostics) = run(&mut session, main, &[]);
    assert!(!result.success);
    let errors = messages(&diagnostics);
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("'app::Pair.lenght' is not declared; did you mean 'length'?"));
}

/// Class, constructor and arguments of the first `new` in an instance.
fn constructed(session: &Session, result: Instantiation) -> (DeclId, InstanceRef, Vec<u32>) {
    code(session, result.instance.unwrap())
        .iter()
        .find_map(|op| match op {
            TypedOp::New {
                class, ctor, args, ..
            } => Some((*class, *ctor, args.clone())),
            _ => None,
        })
        .unwrap()
}

#[test]
fn captured_locals_become_hidden_members() {
    let mut program = Program::new();
    let app = program.namespace(None, "app");
    let counter = program.closure_class(app, "Counter", &["step"]);
    program.function(counter, "get", &[("self", Ty::Class(counter))], Ty::Any, |b| {
        b.identify(3, "step").ret(Some(3)).end();
    });
    let site = |kind: BuiltinKind, value: Literal| {
        move |b: &mut ModuleBuilder| {
            b.local(2, DeclType::Builtin(kind), "step")
                .literal(3, value)
                .assign(2, 3)
                .identify(4, "Counter")
                .new_object(5, 4)
                .member(6, 5, "get")
                .call(7, 6)
                .ret(Some(7))
                .end();
        }
    };
    let ints = program.function(app, "ints", &[], Ty::Any, site(I32, int(1, I32)));
    let floats = program.function(
        app,
        "floats",
        &[],
        Ty::Any,
        site(F64, Literal::Float(0.5.into(), F64)),
    );
    let more = program.function(app, "more", &[], Ty::Any, site(I32, int(2, I32)));
    let mut session = program.session();

    let (result, diagnostics) = run(&mut session, ints, &[]);
    assert!(result.success, "{:?}", messages(&diagnostics));
    let (class, ctor, args) = constructed(&session, result);
    assert_eq!(class, counter);
    assert_eq!(args, vec![2]);
    assert_eq!(session.instance(result.instance.unwrap()).unwrap().return_type, key(I32));
    let step = session.graph().lookup_children(counter, "$step");
    assert_eq!(step.len(), 1);

    // The synthesized constructor takes the captured value and stores it.
    let params = &session.graph().get(ctor.decl).unwrap().params;
    let names: Vec<&str> = params.iter().map(|param| param.name.as_str()).collect();
    assert_eq!(names, ["self", "$step"]);
    assert_eq!(args.len(), params.len() - 1);
    assert_eq!(
        code(&session, ctor.instance)[0],
        TypedOp::InitMember {
            member: step[0],
            ty: key(I32),
            src: Some(params[1].slot.local),
            ctor: None,
        }
    );

    let (result, diagnostics) = run(&mut session, floats, &[]);
    assert!(result.success, "{:?}", messages(&diagnostics));
    let (clone, ctor, args) = constructed(&session, result);
    assert_ne!(clone, counter);
    assert_eq!(session.instance(result.instance.unwrap()).unwrap().return_type, key(F64));
    assert_eq!(session.stats().clones, 1);
    let params = &session.graph().get(ctor.decl).unwrap().params;
    assert_eq!(params.len(), 2);
    assert_eq!(args.len(), 1);
    assert_eq!(session.types().raw_read(params[1].slot).unwrap().key(), key(F64));
    assert_eq!(session.graph().lookup_from_enclosing(app, "Counter"), vec![counter]);

    let (result, diagnostics) = run(&mut session, more, &[]);
    assert!(result.success, "{:?}", messages(&diagnostics));
    let (class, _, _) = constructed(&session, result);
    assert_eq!(class, counter);
    assert_eq!(session.stats().clones, 1);
}

#[test]
fn user_constructors_gain_hidden_capture_parameters() {
    let mut program = Program::new();
    let app = program.namespace(None, "app");
    let counter = program.closure_class(app, "Counter", &["step"]);
    let new = program.function(counter, "new", &[("self", Ty::Class(counter))], Ty::Void, |b| {
        b.ret(None).end();
    });
    let site = program.function(app, "site", &[], Ty::Void, |b| {
        b.local(2, DeclType::Builtin(I32), "step")
            .literal(3, int(4, I32))
            .assign(2, 3)
            .identify(4, "Counter")
            .new_object(5, 4)
            .ret(None)
            .end();
    });
    let mut session = program.session();

    let (result, diagnostics) = run(&mut session, site, &[]);
    assert!(result.success, "{:?}", messages(&diagnostics));
    let (class, ctor, args) = constructed(&session, result);
    assert_eq!(class, counter);
    assert_eq!(ctor.decl, new);
    assert_eq!(args, vec![2]);

    let params = &session.graph().get(new).unwrap().params;
    let names: Vec<&str> = params.iter().map(|param| param.name.as_str()).collect();
    assert_eq!(names, ["self", "$step"]);
    assert_eq!(session.types().raw_read(params[1].slot).unwrap().key(), key(I32));
    let instance = session.instance(ctor.instance).unwrap();
    assert_eq!(
        instance.signature.entries(),
        &[TypeKey::linked(counter), key(I32)]
    );
}

// =============================================================================
// Overload resolution
// =============================================================================

/// Three `pick` overloads over `(u8, u16, u16)`, `(u8, u8, u16)` and `third`,
/// called with three `u8` values.
fn scoring_program(third: [BuiltinKind; 3], options: InstantiationOptions) -> (Session, [DeclId; 4]) {
    let mut program = Program::new();
    let app = program.namespace(None, "app");
    let mut pick = |kinds: [BuiltinKind; 3]| {
        program.function(
            app,
            "pick",
            &[
                ("a", Ty::Builtin(kinds[0])),
                ("b", Ty::Builtin(kinds[1])),
                ("c", Ty::Builtin(kinds[2])),
            ],
            Ty::Void,
            |b| {
                b.ret(None).end();
            },
        )
    };
    let one = pick([U8, U16, U16]);
    let two = pick([U8, U8, U16]);
    let other = pick(third);
    let main = program.function(app, "main", &[], Ty::Void, |b| {
        b.identify(2, "pick")
            .literal(3, int(1, U8))
            .literal(4, int(2, U8))
            .literal(5, int(3, U8))
            .push_arg(3)
            .push_arg(4)
            .push_arg(5)
            .call(6, 2)
            .ret(None)
            .end();
    });
    (program.finish(options), [one, two, other, main])
}

#[test]
fn highest_score_wins() {
    let (mut session, [_, two, _, main]) =
        scoring_program([U16, U16, U16], InstantiationOptions::default());
    let (result, diagnostics) = run(&mut session, main, &[]);
    assert!(result.success, "{:?}", messages(&diagnostics));
    let targets = calls(code(&session, result.instance.unwrap()));
    assert_eq!(targets.len(), 1);
    assert_eq!(targets[0].decl, two);
    assert_eq!(session.stats().probes, 0);
}

#[test]
fn tied_scores_are_ambiguous() {
    let (mut session, [_, _, _, main]) =
        scoring_program([U8, U16, U8], InstantiationOptions::default());
    let (result, diagnostics) = run(&mut session, main, &[]);
    assert!(!result.success);
    let errors = messages(&diagnostics);
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("ambiguous call to 'pick'"));
    assert_eq!(session.stats().probes, 2);
}

#[test]
fn ties_are_not_probed_when_disabled() {
    let options = InstantiationOptions::new().probe_ambiguous_overloads(false);
    let (mut session, [_, _, _, main]) = scoring_program([U8, U16, U8], options);
    let (result, diagnostics) = run(&mut session, main, &[]);
    assert!(!result.success);
    assert!(messages(&diagnostics)[0].contains("ambiguous call to 'pick'"));
    assert_eq!(session.stats().probes, 0);
}

#[test]
fn probing_discards_candidates_that_fail_to_compile() {
    let mut program = Program::new();
    let app = program.namespace(None, "app");
    program.function(app, "show", &[("x", Ty::Any)], Ty::Void, |b| {
        b.identify(3, "missing").ret(None).end();
    });
    let working = program.function(app, "show", &[("x", Ty::Any)], Ty::Void, |b| {
        b.ret(None).end();
    });
    let main = program.function(app, "main", &[], Ty::Void, |b| {
        b.identify(2, "show")
            .literal(3, int(1, I32))
            .push_arg(3)
            .call(4, 2)
            .ret(None)
            .end();
    });
    let mut session = program.session();

    let (result, diagnostics) = run(&mut session, main, &[]);
    assert!(result.success, "{:?}", messages(&diagnostics));
    assert!(diagnostics.is_empty());
    let targets = calls(code(&session, result.instance.unwrap()));
    assert_eq!(targets[0].decl, working);
    assert_eq!(session.stats().probes, 2);
}

#[test]
fn failures_hidden_by_probing_surface_on_direct_requests() {
    let mut program = Program::new();
    let app = program.namespace(None, "app");
    let broken = program.function(app, "show", &[("x", Ty::Any)], Ty::Void, |b| {
        b.identify(3, "missing").ret(None).end();
    });
    program.function(app, "show", &[("x", Ty::Any)], Ty::Void, |b| {
        b.ret(None).end();
    });
    let main = program.function(app, "main", &[], Ty::Void, |b| {
        b.identify(2, "show")
            .literal(3, int(1, I32))
            .push_arg(3)
            .call(4, 2)
            .ret(None)
            .end();
    });
    let mut session = program.session();
    let (result, _) = run(&mut session, main, &[]);
    assert!(result.success);

    let (direct, diagnostics) = run(&mut session, broken, &[key(I32)]);
    assert!(!direct.success);
    let errors = messages(&diagnostics);
    assert_eq!(errors.len(), 1, "{errors:?}");
    assert!(errors[0].contains("'app::show("), "{}", errors[0]);
    assert!(errors[0].contains("cannot be instantiated for these argument types"));
    assert!(!session.succeeded());

    // Reported once; the cached failure stays quiet afterwards.
    let (again, diagnostics) = run(&mut session, broken, &[key(I32)]);
    assert!(!again.success);
    assert!(diagnostics.is_empty());
    assert_eq!(session.stats().body_walks, 3);
}

#[test]
fn pending_candidates_are_ruled_out_without_failing_the_caller() {
    let mut program = Program::new();
    let app = program.namespace(None, "app");
    // `step(x)` calls `step(x)`, which ties with itself and `done`.
    let step = program.function(app, "step", &[("x", Ty::Any)], Ty::Any, |b| {
        b.identify(3, "step").push_arg(2).call(4, 3).ret(None).end();
    });
    let done = program.function(app, "step", &[("x", Ty::Any)], Ty::Any, |b| {
        b.ret(None).end();
    });
    let mut session = program.session();

    let (result, diagnostics) = run(&mut session, step, &[key(I32)]);
    assert!(result.success, "{:?}", messages(&diagnostics));
    assert!(diagnostics.errors().next().is_none());
    let targets = calls(code(&session, result.instance.unwrap()));
    assert_eq!(targets.len(), 1);
    assert_eq!(targets[0].decl, done);
    assert_eq!(session.stats().probes, 2);
    assert!(!session.graph().get(step).unwrap().has_flag(DeclFlags::RECURSIVE));
}

#[test]
fn named_arguments_bind_by_parameter_name() {
    let mut program = Program::new();
    let app = program.namespace(None, "app");
    program.function(
        app,
        "scale",
        &[("x", Ty::Builtin(I32)), ("factor", Ty::Builtin(I32))],
        Ty::Any,
        |b| {
            b.binary(4, BinaryOp::Mul, 2, 3).ret(Some(4)).end();
        },
    );
    let call_with = |name: &'static str| {
        move |b: &mut ModuleBuilder| {
            b.identify(2, "scale")
                .literal(3, int(2, I32))
                .literal(4, int(5, I32))
                .push_named(4, name)
                .push_arg(3)
                .call(5, 2)
                .ret(Some(5))
                .end();
        }
    };
    let good = program.function(app, "good", &[], Ty::Any, call_with("factor"));
    let typo = program.function(app, "typo", &[], Ty::Any, call_with("fator"));
    let mut session = program.session();

    let (result, diagnostics) = run(&mut session, good, &[]);
    assert!(result.success, "{:?}", messages(&diagnostics));
    let ops = code(&session, result.instance.unwrap());
    assert!(ops.iter().any(|op| matches!(op, TypedOp::Call { args, .. } if args == &vec![3, 4])));

    let (result, diagnostics) = run(&mut session, typo, &[]);
    assert!(!result.success);
    let errors = messages(&diagnostics);
    assert!(errors[0].contains("no matching overload for 'scale'"));
    assert!(errors[0].contains("has no parameter named 'fator'"));
}

#[test]
fn expected_type_selects_among_return_overloads() {
    let mut program = Program::new();
    let app = program.namespace(None, "app");
    program.function(app, "make", &[], Ty::Builtin(I32), |b| {
        b.literal(2, int(1, I32)).ret(Some(2)).end();
    });
    let wide = program.function(app, "make", &[], Ty::Builtin(F64), |b| {
        b.literal(2, Literal::Float(1.0.into(), F64)).ret(Some(2)).end();
    });
    let expecting = program.function(app, "expecting", &[], Ty::Any, |b| {
        b.identify(2, "make")
            .identify(3, "f64")
            .call_expecting(4, 2, 3)
            .ret(Some(4))
            .end();
    });
    let unconstrained = program.function(app, "unconstrained", &[], Ty::Any, |b| {
        b.identify(2, "make").call(3, 2).ret(Some(3)).end();
    });
    let mut session = program.session();

    let (result, diagnostics) = run(&mut session, expecting, &[]);
    assert!(result.success, "{:?}", messages(&diagnostics));
    let instance = session.instance(result.instance.unwrap()).unwrap();
    assert_eq!(instance.return_type, key(F64));
    assert_eq!(calls(instance.code.ops())[0].decl, wide);

    let (result, diagnostics) = run(&mut session, unconstrained, &[]);
    assert!(!result.success);
    assert!(messages(&diagnostics)[0].contains("ambiguous call to 'make'"));
}

#[test]
fn operators_dispatch_to_class_overloads() {
    let mut program = Program::new();
    let app = program.namespace(None, "app");
    let vec2 = program.class(app, "Vec2");
    let plus = program.function(
        vec2,
        "operator+",
        &[("self", Ty::Class(vec2)), ("other", Ty::Class(vec2))],
        Ty::Any,
        |b| {
            b.ret(Some(2)).end();
        },
    );
    let main = program.function(app, "main", &[], Ty::Void, |b| {
        b.identify(2, "Vec2")
            .new_object(3, 2)
            .new_object(4, 2)
            .binary(5, BinaryOp::Add, 3, 4)
            .ret(None)
            .end();
    });
    let mut session = program.session();

    let (result, diagnostics) = run(&mut session, main, &[]);
    assert!(result.success, "{:?}", messages(&diagnostics));
    let ops = code(&session, result.instance.unwrap());
    let targets = calls(ops);
    assert_eq!(targets.len(), 1);
    assert_eq!(targets[0].decl, plus);
    assert_eq!(unrefs(ops), vec![5, 4, 3]);

    // Returning a borrowed receiver retains it for the caller.
    let callee = code(&session, targets[0].instance);
    assert!(callee.contains(&TypedOp::Ref { reg: 2 }));
    assert_eq!(
        session.instance(targets[0].instance).unwrap().return_type,
        TypeKey::linked(vec2)
    );
}

#[test]
fn widening_arguments_are_accepted_and_narrowing_rejected() {
    let mut program = Program::new();
    let app = program.namespace(None, "app");
    program.function(app, "widen", &[("x", Ty::Builtin(U32))], Ty::Void, |b| {
        b.ret(None).end();
    });
    let good = program.function(app, "good", &[], Ty::Void, |b| {
        b.identify(2, "widen")
            .literal(3, int(1, U8))
            .push_arg(3)
            .call(4, 2)
            .ret(None)
            .end();
    });
    let bad = program.function(app, "bad", &[], Ty::Void, |b| {
        b.identify(2, "widen")
            .literal(3, int(1, I32))
            .push_arg(3)
            .call(4, 2)
            .ret(None)
            .end();
    });
    let mut session = program.session();

    let (result, diagnostics) = run(&mut session, good, &[]);
    assert!(result.success, "{:?}", messages(&diagnostics));

    let (result, diagnostics) = run(&mut session, bad, &[]);
    assert!(!result.success);
    let errors = messages(&diagnostics);
    assert!(errors[0].contains("no matching overload for 'widen'"));
}

// =============================================================================
// Operators, returns and intrinsics
// =============================================================================

#[test]
fn builtin_operators_infer_the_return_type() {
    let mut program = Program::new();
    let app = program.namespace(None, "app");
    let add = program.function(
        app,
        "add",
        &[("a", Ty::Builtin(I32)), ("b", Ty::Builtin(I32))],
        Ty::Any,
        |b| {
            b.binary(4, BinaryOp::Add, 2, 3).ret(Some(4)).end();
        },
    );
    let mixed = program.function(
        app,
        "mixed",
        &[("a", Ty::Builtin(I32)), ("b", Ty::Builtin(U32))],
        Ty::Any,
        |b| {
            b.binary(4, BinaryOp::Add, 2, 3).ret(Some(4)).end();
        },
    );
    let mut session = program.session();

    let (result, _) = run(&mut session, add, &[key(I32), key(I32)]);
    assert!(result.success);
    let instance = session.instance(result.instance.unwrap()).unwrap();
    assert_eq!(instance.return_type, key(I32));
    assert!(instance.code.ops().iter().any(|op| matches!(op, TypedOp::Primitive { .. })));

    let (result, diagnostics) = run(&mut session, mixed, &[key(I32), key(U32)]);
    assert!(!result.success);
    assert!(messages(&diagnostics)[0].contains("no operator '+'"));
}

#[test]
fn declared_return_type_is_enforced() {
    let mut program = Program::new();
    let app = program.namespace(None, "app");
    let flag = program.function(app, "flag", &[], Ty::Builtin(BuiltinKind::Bool), |b| {
        b.literal(2, int(1, I32)).ret(Some(2)).end();
    });
    let missing = program.function(app, "missing", &[], Ty::Builtin(I32), |b| {
        b.end();
    });
    let mut session = program.session();

    let (result, diagnostics) = run(&mut session, flag, &[]);
    assert!(!result.success);
    assert!(messages(&diagnostics)[0].contains("expected return type 'bool'"));

    let (result, diagnostics) = run(&mut session, missing, &[]);
    assert!(!result.success);
    assert!(messages(&diagnostics)[0].contains("missing return of 'i32'"));
}

#[test]
fn intrinsic_calls_are_emitted_by_name() {
    let mut program = Program::new();
    let app = program.namespace(None, "app");
    program.function(app, "sqrt", &[("x", Ty::Builtin(F64))], Ty::Builtin(F64), |b| {
        b.intrinsic("sqrt").end();
    });
    let main = program.function(app, "main", &[], Ty::Any, |b| {
        b.identify(2, "sqrt")
            .literal(3, Literal::Float(2.0.into(), F64))
            .push_arg(3)
            .call(4, 2)
            .ret(Some(4))
            .end();
    });
    let mut session = program.session();

    let (result, diagnostics) = run(&mut session, main, &[]);
    assert!(result.success, "{:?}", messages(&diagnostics));
    let ops = code(&session, result.instance.unwrap());
    assert!(ops.iter().any(|op| matches!(
        op,
        TypedOp::Intrinsic { name, args, .. } if name == "sqrt" && args == &vec![3]
    )));
    assert!(calls(ops).is_empty());
}

// =============================================================================
// Diagnostics
// =============================================================================

#[test]
fn unused_locals_are_warned_about() {
    let body = |b: &mut ModuleBuilder| {
        b.local(2, DeclType::Builtin(I32), "unused")
            .literal(3, int(1, I32))
            .assign(2, 3)
            .local(4, DeclType::Builtin(I32), "_ignored")
            .literal(5, int(2, I32))
            .assign(4, 5)
            .ret(None)
            .end();
    };

    let mut program = Program::new();
    let app = program.namespace(None, "app");
    let main = program.function(app, "main", &[], Ty::Void, body);
    let mut session = program.session();
    let (result, diagnostics) = run(&mut session, main, &[]);
    assert!(result.success);
    let warnings: Vec<&Diagnostic> = diagnostics.warnings().collect();
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].message, "unused variable 'unused'");

    let mut program = Program::new();
    let app = program.namespace(None, "app");
    let main = program.function(app, "main", &[], Ty::Void, body);
    let mut session = program.finish(InstantiationOptions::new().warn_unused_variables(false));
    let (result, diagnostics) = run(&mut session, main, &[]);
    assert!(result.success);
    assert!(diagnostics.is_empty());
}

#[test]
fn const_locals_cannot_be_reassigned() {
    let mut program = Program::new();
    let app = program.namespace(None, "app");
    let main = program.function(app, "main", &[], Ty::Any, |b| {
        b.local_with(2, DeclType::Builtin(I32), "limit", Qualifiers::CONST)
            .literal(3, int(1, I32))
            .assign(2, 3)
            .literal(4, int(2, I32))
            .assign(2, 4)
            .identify(5, "limit")
            .ret(Some(5))
            .end();
    });
    let mut session = program.session();

    let (result, diagnostics) = run(&mut session, main, &[]);
    assert!(!result.success);
    let errors = messages(&diagnostics);
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("cannot modify const 'limit'"));
}

#[test]
fn manual_ownership_needs_a_runtime_value() {
    let mut program = Program::new();
    let app = program.namespace(None, "app");
    program.class(app, "Pair");
    let valid = program.function(app, "valid", &[], Ty::Void, |b| {
        b.identify(2, "Pair").new_object(3, 2).add_ref(3).ret(None).end();
    });
    let invalid = program.function(app, "invalid", &[], Ty::Void, |b| {
        b.identify(2, "Pair").add_ref(2).ret(None).end();
    });
    let mut session = program.session();

    let (result, diagnostics) = run(&mut session, valid, &[]);
    assert!(result.success, "{:?}", messages(&diagnostics));
    assert!(code(&session, result.instance.unwrap()).contains(&TypedOp::Ref { reg: 3 }));

    let (result, diagnostics) = run(&mut session, invalid, &[]);
    assert!(!result.success);
    assert!(messages(&diagnostics)[0].contains("'ref' applied to a value that is not a runtime instance"));
}

#[test]
fn faults_are_reported_as_internal_errors() {
    let mut program = Program::new();
    let app = program.namespace(None, "app");
    let broken = program.function(app, "broken", &[], Ty::Void, |b| {
        b.scope_end().end();
    });
    let mut session = program.session();

    let (result, diagnostics) = run(&mut session, broken, &[]);
    assert!(!result.success);
    assert_eq!(diagnostics.count_at(Level::InternalError), 1);
    assert!(session.graph().get(broken).unwrap().has_flag(DeclFlags::ERROR));

    let (result, diagnostics) = run(&mut session, broken, &[]);
    assert!(!result.success);
    assert!(diagnostics.is_empty());
}

#[test]
fn failed_build_phase_fails_the_session() {
    let mut program = Program::new();
    let app = program.namespace(None, "app");
    let id = identity(&mut program, app);
    program.builder().report_failure();
    let mut session = program.session();

    let (result, _) = run(&mut session, id, &[key(I32)]);
    assert!(result.success);
    assert!(!session.succeeded());
}
