// SPDX-License-Identifier: BSD-3-Clause
// To debug or develop a test, try `eprintln!("{:#?}", outs.facts)`

use std::collections::HashSet;

use funcptr::analysis::{pointer, pointer::Options, report, Error};
use funcptr::{ArgId, Callee, FactStore, FuncId, Program, ProgramBuilder, Site, Value};

// ------------------------------------------------------------------
// Helpers

fn run(program: &Program) -> pointer::Outputs {
    pointer::analysis(program, &Options::default()).expect("analysis failed")
}

fn value_set(facts: &FactStore, site: Site) -> HashSet<Value> {
    facts.get(site).expect("site not tracked").iter().collect()
}

fn functions(ids: &[FuncId]) -> HashSet<Value> {
    ids.iter().copied().map(Value::Function).collect()
}

fn report_line(program: &Program, facts: &FactStore, line: u32) -> Vec<String> {
    report::report(program, facts)
        .expect("report failed")
        .records
        .into_iter()
        .find(|r| r.line == line)
        .unwrap_or_else(|| panic!("no record for line {}", line))
        .names
}

/// `f`, `g`, `call_indirect(p) { p() }`, and two outer calls
/// `call_indirect(f)`, `call_indirect(g)`.
fn two_callers() -> (Program, FuncId, FuncId, FuncId) {
    let mut b = ProgramBuilder::new();
    let f = b.function("f", &[], false);
    let g = b.function("g", &[], false);
    let ci = b.function("call_indirect", &[true], false);
    b.call(ci, Callee::Indirect(b.arg(ci, 0)), vec![], Some(5));
    b.ret(ci, None);
    let main = b.function("main", &[], false);
    b.call(main, Callee::Direct(ci), vec![Value::Function(f)], Some(10));
    b.call(main, Callee::Direct(ci), vec![Value::Function(g)], Some(11));
    b.ret(main, None);
    (b.finish(), f, g, ci)
}

/// `selector()` returns a phi of `a` and `b`; `main` calls the selector and
/// then calls its result.
fn selector_program() -> (Program, FuncId, FuncId) {
    let mut b = ProgramBuilder::new();
    let a = b.function("a", &[], false);
    let bb = b.function("b", &[], false);
    let sel = b.function("selector", &[], true);
    let phi = b.phi(
        sel,
        true,
        vec![("then", Value::Function(a)), ("else", Value::Function(bb))],
    );
    b.ret(sel, Some(Value::Phi(phi)));
    let main = b.function("main", &[], false);
    let c1 = b.call(main, Callee::Direct(sel), vec![], Some(9));
    b.call(main, Callee::Indirect(Value::Call(c1)), vec![], Some(10));
    b.ret(main, None);
    (b.finish(), a, bb)
}

// ------------------------------------------------------------------
// Resolution

#[test]
fn direct_call_resolves_to_its_target() {
    let mut b = ProgramBuilder::new();
    let f = b.function("f", &[], false);
    let main = b.function("main", &[], false);
    b.call(main, Callee::Direct(f), vec![], Some(3));
    b.ret(main, None);
    let p = b.finish();

    let outs = run(&p);
    let rep = report::report(&p, &outs.facts).expect("report failed");
    assert_eq!(rep.to_string(), "3: f\n");
}

#[test]
fn two_callers_scenario() {
    let (p, f, g, ci) = two_callers();
    let outs = run(&p);

    // The call inside call_indirect sees both callers' arguments.
    assert_eq!(
        value_set(&outs.facts, Site::Argument(ArgId { func: ci, index: 0 })),
        functions(&[f, g])
    );
    assert_eq!(report_line(&p, &outs.facts, 5), vec!["f", "g"]);
    // The outer calls are direct and resolve to their single target.
    assert_eq!(report_line(&p, &outs.facts, 10), vec!["call_indirect"]);
    assert_eq!(report_line(&p, &outs.facts, 11), vec!["call_indirect"]);
}

#[test]
fn phi_merges_incoming_functions_independent_of_order() {
    for swap in [false, true] {
        let mut b = ProgramBuilder::new();
        let a = b.function("a", &[], false);
        let c = b.function("c", &[], false);
        let main = b.function("main", &[], false);
        let mut incoming = vec![("then", Value::Function(a)), ("else", Value::Function(c))];
        if swap {
            incoming.reverse();
        }
        let phi = b.phi(main, true, incoming);
        b.call(main, Callee::Indirect(Value::Phi(phi)), vec![], Some(7));
        b.ret(main, None);
        let p = b.finish();

        let outs = run(&p);
        assert_eq!(value_set(&outs.facts, Site::Phi(phi)), functions(&[a, c]));
        let mut names = report_line(&p, &outs.facts, 7);
        names.sort();
        assert_eq!(names, vec!["a", "c"]);
    }
}

#[test]
fn phi_chains_flatten_without_storing_phi_values() {
    let mut b = ProgramBuilder::new();
    let a = b.function("a", &[], false);
    let c = b.function("c", &[], false);
    let d = b.function("d", &[], false);
    let main = b.function("main", &[], false);
    let phi1 = b.phi(
        main,
        true,
        vec![("p0", Value::Function(a)), ("p1", Value::Function(c))],
    );
    b.block(main, "join");
    let phi2 = b.phi(
        main,
        true,
        vec![("p2", Value::Phi(phi1)), ("p3", Value::Function(d))],
    );
    b.call(main, Callee::Indirect(Value::Phi(phi2)), vec![], Some(12));
    b.ret(main, None);
    let p = b.finish();

    let outs = run(&p);
    let set = value_set(&outs.facts, Site::Phi(phi2));
    assert_eq!(set, functions(&[a, c, d]));
    assert!(!set.iter().any(|v| matches!(v, Value::Phi(_))));
}

#[test]
fn return_values_propagate_into_call_results() {
    let (p, _a, _b) = selector_program();
    let outs = run(&p);
    let mut names = report_line(&p, &outs.facts, 10);
    names.sort();
    assert_eq!(names, vec!["a", "b"]);
    assert_eq!(report_line(&p, &outs.facts, 9), vec!["selector"]);
}

#[test]
fn directly_returned_function_propagates() {
    let mut b = ProgramBuilder::new();
    let a = b.function("a", &[], false);
    let sel = b.function("selector", &[], true);
    b.ret(sel, Some(Value::Function(a)));
    let main = b.function("main", &[], false);
    let c1 = b.call(main, Callee::Direct(sel), vec![], Some(4));
    b.call(main, Callee::Indirect(Value::Call(c1)), vec![], Some(5));
    b.ret(main, None);
    let p = b.finish();

    let outs = run(&p);
    assert_eq!(report_line(&p, &outs.facts, 5), vec!["a"]);
}

#[test]
fn store_into_parameter_storage_seeds_the_argument() {
    let mut b = ProgramBuilder::new();
    let f = b.function("f", &[], false);
    let h = b.function("h", &[], false);
    let g = b.function("g", &[true], false);
    b.store(g, b.arg(g, 0), Value::Function(h), true);
    b.call(g, Callee::Indirect(b.arg(g, 0)), vec![], Some(8));
    b.ret(g, None);
    let main = b.function("main", &[], false);
    b.call(main, Callee::Direct(g), vec![Value::Function(f)], Some(12));
    b.ret(main, None);
    let p = b.finish();

    let outs = run(&p);
    assert_eq!(
        value_set(&outs.facts, Site::Argument(ArgId { func: g, index: 0 })),
        functions(&[f, h])
    );
    let mut names = report_line(&p, &outs.facts, 8);
    names.sort();
    assert_eq!(names, vec!["f", "h"]);
}

#[test]
fn stores_to_non_parameter_storage_are_not_modeled() {
    let mut b = ProgramBuilder::new();
    let f = b.function("f", &[], false);
    let g = b.function("g", &[true], false);
    // Destination is an untracked location, not the parameter's own storage.
    b.store(g, Value::Opaque, Value::Function(f), true);
    b.call(g, Callee::Indirect(b.arg(g, 0)), vec![], Some(6));
    b.ret(g, None);
    let p = b.finish();

    let outs = run(&p);
    assert_eq!(report_line(&p, &outs.facts, 6), Vec::<String>::new());
}

// ------------------------------------------------------------------
// Report edge cases

#[test]
fn calls_without_debug_location_are_omitted() {
    let mut b = ProgramBuilder::new();
    let f = b.function("f", &[], false);
    let main = b.function("main", &[], false);
    b.call(main, Callee::Direct(f), vec![], None);
    b.call(main, Callee::Direct(f), vec![], Some(21));
    b.ret(main, None);
    let p = b.finish();

    let outs = run(&p);
    let rep = report::report(&p, &outs.facts).expect("report failed");
    assert_eq!(rep.to_string(), "21: f\n");
}

#[test]
fn debug_pseudo_calls_are_skipped() {
    let mut b = ProgramBuilder::new();
    let dbg = b.declaration("llvm.dbg.value", &[false], false);
    let main = b.function("main", &[], false);
    b.debug_call(main, Callee::Direct(dbg), vec![Value::Opaque], Some(2));
    b.ret(main, None);
    let p = b.finish();

    let outs = run(&p);
    let rep = report::report(&p, &outs.facts).expect("report failed");
    assert_eq!(rep.to_string(), "");
}

#[test]
fn unnamed_candidates_print_an_empty_continuation() {
    let mut b = ProgramBuilder::new();
    let anon = b.function("", &[], false);
    let ci = b.function("call_indirect", &[true], false);
    b.call(ci, Callee::Indirect(b.arg(ci, 0)), vec![], Some(5));
    b.ret(ci, None);
    let main = b.function("main", &[], false);
    b.call(main, Callee::Direct(ci), vec![Value::Function(anon)], Some(9));
    b.ret(main, None);
    let p = b.finish();

    let outs = run(&p);
    let rep = report::report(&p, &outs.facts).expect("report failed");
    assert_eq!(rep.to_string(), "5: \n9: call_indirect\n");
}

// ------------------------------------------------------------------
// Errors

#[test]
fn opaque_callee_is_an_unexpected_value_kind() {
    let mut b = ProgramBuilder::new();
    let main = b.function("main", &[], false);
    b.call(main, Callee::Indirect(Value::Opaque), vec![], Some(1));
    b.ret(main, None);
    let p = b.finish();

    let err = pointer::analysis(&p, &Options::default()).unwrap_err();
    assert!(matches!(err, Error::UnexpectedValueKind(_)));
}

#[test]
fn sweep_cap_is_a_diagnostic_not_a_hang() {
    let (p, _f, _g, _ci) = two_callers();
    let opts = Options {
        max_sweeps: Some(1),
    };
    let err = pointer::analysis(&p, &opts).unwrap_err();
    assert_eq!(err, Error::SweepLimit(1));
}

// ------------------------------------------------------------------
// Fixpoint properties

#[test]
fn one_more_sweep_after_convergence_changes_nothing() {
    let (p, _f, _g, _ci) = two_callers();
    let mut outs = run(&p);
    assert!(!pointer::sweep(&p, &mut outs.facts).expect("sweep failed"));
}

#[test]
fn sets_grow_monotonically_across_sweeps() {
    let (p, _f, _g, _ci) = two_callers();
    let mut facts = FactStore::new(&p);
    loop {
        let before: Vec<(Site, funcptr::PointsToSet)> =
            facts.sites().map(|(s, set)| (s, set.clone())).collect();
        let changed = pointer::sweep(&p, &mut facts).expect("sweep failed");
        for (site, old) in &before {
            assert!(old.is_subset_of(facts.get(*site).expect("site vanished")));
        }
        if !changed {
            break;
        }
    }
}

#[test]
fn sweep_count_is_bounded() {
    let (p, _f, _g, _ci) = two_callers();
    let outs = run(&p);
    assert!(outs.sweeps <= outs.facts.len() * p.num_functions() + 1);
}
