//! End-to-end tests: whole scripts run through a fresh [`RunContext`], with
//! output and warnings collected through a [`MemoryWindow`].  Each test
//! exercises one observable behavior of the language rather than a parser
//! production (those live next to the parser).

use kvs::{MemoryWindow, RunContext, Variant};

fn run(src: &str) -> (Vec<String>, Vec<String>, Variant) {
    let (mut ctx, win) = RunContext::collecting();
    let ret = ctx.run(src).expect("script failed");
    (win.lines(), win.warnings(), ret)
}

fn run_err(src: &str) -> (String, MemoryWindow) {
    let (mut ctx, win) = RunContext::collecting();
    let err = ctx.run(src).expect_err("script should have failed");
    (err.to_string(), win)
}

// ── Objects and handles ───────────────────────────────────────────────────────

#[test]
fn deleted_objects_stay_dead() {
    let (err, _) = run_err("%o = $new(object); delete %o; %o->$name()");
    assert!(err.contains("no longer exists"), "got: {err}");
}

#[test]
fn delete_of_a_stale_handle_warns() {
    let (_, warns, _) = run("%o = $new(object); delete %o; delete %o");
    assert!(warns.iter().any(|w| w.contains("no longer exists")));
}

#[test]
fn handles_are_never_reused() {
    let (lines, _, _) = run(
        "%a = $new(object)\n\
         delete %a\n\
         %b = $new(object)\n\
         if (%a != %b) echo distinct",
    );
    assert_eq!(lines, vec!["distinct".to_string()]);
}

#[test]
fn object_tree_is_navigable() {
    let (lines, _, _) = run(
        "%p = $new(object, , root)\n\
         %c = $new(object, %p, kid)\n\
         echo %p->$childCount() %c->$parent()->$name() %c->$className()",
    );
    assert_eq!(lines, vec!["1 root object".to_string()]);
}

#[test]
fn find_child_prefers_immediate_children_over_descendants() {
    let (lines, _, _) = run(
        "%p = $new(object)\n\
         %a = $new(object, %p, inner)\n\
         %deep = $new(object, %a, twin)\n\
         %b = $new(object, %p, twin)\n\
         echo $( %p->$findChild(, twin) == %b )",
    );
    assert_eq!(lines, vec!["1".to_string()]);
}

#[test]
fn find_child_descends_when_no_immediate_match() {
    let (lines, _, _) = run(
        "%p = $new(object)\n\
         %a = $new(object, %p, inner)\n\
         %deep = $new(object, %a, buried)\n\
         echo %p->$findChild(, buried)->$name()",
    );
    assert_eq!(lines, vec!["buried".to_string()]);
}

#[test]
fn unknown_class_is_fatal() {
    let (err, _) = run_err("%o = $new(gadget)");
    assert!(err.contains("gadget"), "got: {err}");
}

// ── Classes ───────────────────────────────────────────────────────────────────

#[test]
fn instance_fields_persist_between_calls() {
    let (lines, _, _) = run(
        "class (counter) { constructor { @%n = 0 } bump { @%n++; return @%n } }\n\
         %c = $new(counter)\n\
         echo %c->$bump() %c->$bump() %c->$bump()",
    );
    assert_eq!(lines, vec!["1 2 3".to_string()]);
}

#[test]
fn function_parameters_are_positional() {
    let (lines, _, _) = run(
        "class (adder) { sum { return $( $0 + $1 ) } }\n\
         %a = $new(adder)\n\
         echo %a->$sum(19, 23)",
    );
    assert_eq!(lines, vec!["42".to_string()]);
}

#[test]
fn inherited_functions_resolve_through_the_parent_chain() {
    let (lines, _, _) = run(
        "class (base) { who { return base } }\n\
         class (derived, base) { }\n\
         %o = $new(derived)\n\
         echo %o->$who()",
    );
    assert_eq!(lines, vec!["base".to_string()]);
}

#[test]
fn qualified_calls_bypass_subclass_overrides() {
    let (lines, _, _) = run(
        "class (base) { who { return base } }\n\
         class (derived, base) { who { return derived } }\n\
         %o = $new(derived)\n\
         echo %o->$who() %o->$base:who()",
    );
    assert_eq!(lines, vec!["derived base".to_string()]);
}

#[test]
fn internal_functions_reject_outside_callers() {
    let src = "class (safe) { internal secret { return hush } go { return @$secret() } }\n\
               %o = $new(safe)\n";
    let (lines, _, _) = run(&format!("{src}echo %o->$go()"));
    assert_eq!(lines, vec!["hush".to_string()]);

    let (err, _) = run_err(&format!("{src}echo %o->$secret()"));
    assert!(err.contains("internal"), "got: {err}");
}

#[test]
fn constructor_failure_yields_a_null_handle() {
    let (lines, _, _) = run(
        "class (broken) { constructor { return 0 } }\n\
         %o = $new(broken)\n\
         if (%o) echo alive\n\
         else echo dead",
    );
    assert_eq!(lines, vec!["dead".to_string()]);
}

#[test]
fn redefining_a_class_destroys_its_instances() {
    let (lines, _, _) = run(
        "class (noisy) { destructor { echo gone } }\n\
         %o = $new(noisy)\n\
         class (noisy) { }\n\
         echo after",
    );
    assert_eq!(lines, vec!["gone".to_string(), "after".to_string()]);
}

#[test]
fn privateimpl_overrides_one_instance_only() {
    let (lines, _, _) = run(
        "class (greeter) { hi { return hello } }\n\
         %a = $new(greeter)\n\
         %b = $new(greeter)\n\
         privateimpl (%a, hi) { return hijacked }\n\
         echo %a->$hi() %b->$hi()",
    );
    assert_eq!(lines, vec!["hijacked hello".to_string()]);
}

#[test]
fn empty_privateimpl_removes_the_override() {
    let (lines, _, _) = run(
        "class (greeter) { hi { return hello } }\n\
         %a = $new(greeter)\n\
         privateimpl (%a, hi) { return hijacked }\n\
         privateimpl (%a, hi) { }\n\
         echo %a->$hi()",
    );
    assert_eq!(lines, vec!["hello".to_string()]);
}

// ── Destruction ───────────────────────────────────────────────────────────────

#[test]
fn parent_destructor_runs_before_the_children_die() {
    let (lines, _, _) = run(
        "class (noisy) { destructor { echo bye @$name() } }\n\
         %p = $new(noisy, , papa)\n\
         %c = $new(noisy, %p, kid)\n\
         delete %p",
    );
    assert_eq!(lines, vec!["bye papa".to_string(), "bye kid".to_string()]);
}

#[test]
fn child_destructor_can_still_reach_the_parent() {
    let (lines, _, _) = run(
        "class (orphan) { destructor { echo leaving @$parent()->$name() } }\n\
         %p = $new(object, , home)\n\
         %c = $new(orphan, %p)\n\
         delete %p",
    );
    assert_eq!(lines, vec!["leaving home".to_string()]);
}

// ── Signals and slots ─────────────────────────────────────────────────────────

#[test]
fn connect_and_emit_from_script() {
    let (lines, _, _) = run(
        "class (rec) { log { echo got $0 } }\n\
         %s = $new(object)\n\
         %r = $new(rec)\n\
         connect %s fired %r log\n\
         echo %s->$emit(fired, 42)\n\
         disconnect %s fired %r log\n\
         echo %s->$emit(fired, 43)",
    );
    assert_eq!(
        lines,
        vec!["got 42".to_string(), "1".to_string(), "0".to_string()]
    );
}

#[test]
fn emitting_to_a_destroyed_target_delivers_nothing() {
    let (lines, _, _) = run(
        "class (rec) { log { echo got $0 } }\n\
         %s = $new(object)\n\
         %r = $new(rec)\n\
         connect %s fired %r log\n\
         delete %r\n\
         echo %s->$emit(fired, 1)",
    );
    assert_eq!(lines, vec!["0".to_string()]);
}

#[test]
fn slot_may_destroy_a_later_pending_target() {
    // The first slot deletes the second slot's object mid-emission; the
    // walk must skip the dead entry instead of failing.
    let (lines, _, _) = run(
        "class (killer) { hit { delete %Victim; echo bang } }\n\
         class (rec) { log { echo got } }\n\
         %s = $new(object)\n\
         %k = $new(killer)\n\
         global %Victim\n\
         %Victim = $new(rec)\n\
         connect %s fired %k hit\n\
         connect %s fired %Victim log\n\
         echo %s->$emit(fired)",
    );
    assert_eq!(lines, vec!["bang".to_string(), "1".to_string()]);
}

#[test]
fn destroyed_signal_fires_from_the_base_destructor() {
    let (lines, _, _) = run(
        "class (rec) { obit { echo dead @$signalSender()->$name() } }\n\
         %o = $new(object, , victim)\n\
         %r = $new(rec)\n\
         connect %o destroyed %r obit\n\
         delete %o",
    );
    assert_eq!(lines, vec!["dead victim".to_string()]);
}

// ── Control flow ──────────────────────────────────────────────────────────────

#[test]
fn switch_falls_through_unconditionally_after_a_match() {
    let src = |subject: i64| {
        format!(
            "switch ({subject}) {{ case(1): echo a; case(2): echo b; default: echo c }}"
        )
    };
    let (lines, _, _) = run(&src(1));
    assert_eq!(lines, vec!["a", "b", "c"]);
    let (lines, _, _) = run(&src(2));
    assert_eq!(lines, vec!["b", "c"]);
    let (lines, _, _) = run(&src(7));
    assert_eq!(lines, vec!["c"]);
}

#[test]
fn switch_break_label_stops_the_fallthrough() {
    let (lines, _, _) = run(
        "switch (1) { case(1): echo a; break; case(2): echo b }",
    );
    assert_eq!(lines, vec!["a".to_string()]);
}

#[test]
fn switch_match_label_uses_wildcards() {
    let (lines, _, _) = run(
        "%w = tiger; switch (%w) { match(t*r): echo wild; break; default: echo tame }",
    );
    assert_eq!(lines, vec!["wild".to_string()]);
}

#[test]
fn break_exits_only_the_innermost_loop() {
    let (lines, _, _) = run(
        "for (%i = 0; %i < 2; %i++) {\n\
             foreach (%x, a, b, c) {\n\
                 if (%x == b) break;\n\
                 echo %i%x;\n\
             }\n\
         }",
    );
    assert_eq!(lines, vec!["0a", "1a"]);
}

#[test]
fn break_outside_a_loop_stops_the_script() {
    // A break nothing absorbs unwinds all the way out, whether it sits
    // inside a block or at the top level.
    let (lines, _, _) = run("echo before\nbreak\necho after");
    assert_eq!(lines, vec!["before".to_string()]);

    let (lines, _, _) = run("{ echo before; break; echo inside }\necho after");
    assert_eq!(lines, vec!["before".to_string()]);
}

#[test]
fn halt_inside_an_object_function_stops_only_that_call() {
    let (lines, _, _) = run(
        "class (c) { f { echo in; halt; echo never } }\n\
         %o = $new(c)\n\
         %o->$f()\n\
         echo out",
    );
    assert_eq!(lines, vec!["in".to_string(), "out".to_string()]);
}

#[test]
fn return_value_of_the_whole_script() {
    let (_, _, ret) = run("%x = 21; return $( %x * 2 )");
    assert_eq!(ret, Variant::Integer(42));
}

// ── Variables ─────────────────────────────────────────────────────────────────

#[test]
fn uppercase_initial_means_global_scope() {
    // %Total written inside an object function is the same storage as at
    // top level; the lowercase %local is not.
    let (lines, _, _) = run(
        "class (c) { f { %Total = 5; %local = 9 } }\n\
         %o = $new(c)\n\
         %o->$f()\n\
         echo %Total $typeof(%local)",
    );
    assert_eq!(lines, vec!["5 nothing".to_string()]);
}

#[test]
fn arrays_autovivify_and_report_length() {
    let (lines, _, _) = run("%a[4] = end; echo $length(%a)");
    assert_eq!(lines, vec!["5".to_string()]);
}

#[test]
fn nested_subscripts() {
    let (lines, _, _) = run("%m{row}[1] = x; echo %m{row}[1] $typeof(%m{row}[0])");
    assert_eq!(lines, vec!["x nothing".to_string()]);
}

#[test]
fn parse_warnings_reach_the_window() {
    let (_, warns, _) = run("unset");
    assert!(warns.iter().any(|w| w.contains("'unset'")));
}
