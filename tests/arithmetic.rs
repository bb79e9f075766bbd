use pascalc::compile;

#[test]
fn integer_to_real_widening_on_mixed_arithmetic() {
    let listing = compile(
        "program p;\nvar i: integer; r: real; t: real;\nbegin\n  i := 2;\n  r := 1.5;\n  t := i + r\nend.\n",
    )
    .unwrap();
    assert!(listing.contains("ITOF"));
    assert!(listing.contains("FADD"));
}

#[test]
fn direct_assignment_of_integer_to_real_does_not_widen() {
    // A known, documented quirk: `real_var := integer_expr` type-checks
    // but does not itself emit ITOF (only call/compare/arithmetic sites do).
    let listing = compile("program p;\nvar r: real;\nbegin\n  r := 3\nend.\n").unwrap();
    assert!(!listing.contains("ITOF"));
    assert!(listing.contains("PUSHI 3"));
    assert!(listing.contains("STOREG 0"));
}

#[test]
fn real_division_always_produces_a_real() {
    let listing = compile(
        "program p;\nvar a: integer; b: integer; r: real;\nbegin\n  a := 7;\n  b := 2;\n  r := a / b\nend.\n",
    )
    .unwrap();
    assert!(listing.contains("FDIV"));
}

#[test]
fn integer_div_and_mod_use_integer_instructions() {
    let listing = compile(
        "program p;\nvar a: integer; q: integer; m: integer;\nbegin\n  a := 7;\n  q := a div 2;\n  m := a mod 2\nend.\n",
    )
    .unwrap();
    assert!(listing.contains("DIV"));
    assert!(listing.contains("MOD"));
}

#[test]
fn relational_on_mixed_numeric_types_widens_and_uses_float_compare() {
    let listing = compile(
        "program p;\nvar i: integer; r: real; b: boolean;\nbegin\n  i := 1;\n  r := 2.0;\n  b := i < r\nend.\n",
    )
    .unwrap();
    assert!(listing.contains("ITOF"));
    assert!(listing.contains("FINF"));
}

#[test]
fn not_equal_is_equal_followed_by_not() {
    let listing =
        compile("program p;\nvar a: integer; b: integer; c: boolean;\nbegin\n  a := 1;\n  b := 2;\n  c := a <> b\nend.\n")
            .unwrap();
    let eq = listing.find("EQUAL").expect("EQUAL must be emitted");
    let not = listing[eq..].find("NOT").expect("NOT must follow EQUAL");
    assert!(not > 0);
}

#[test]
fn unary_minus_on_integer_uses_push_zero_then_sub() {
    let listing = compile("program p;\nvar x: integer;\nbegin\n  x := -5\nend.\n").unwrap();
    assert!(listing.contains("PUSHI 0"));
    assert!(listing.contains("SUB"));
}

#[test]
fn a_whole_valued_real_literal_still_emits_a_decimal_point() {
    let listing = compile("program p;\nvar r: real;\nbegin\n  r := 2.0\nend.\n").unwrap();
    assert!(listing.contains("PUSHF 2.0"));
    assert!(!listing.contains("PUSHF 2\n"));
}

#[test]
fn constant_relational_comparison_still_emits_runtime_code() {
    // Constant folding on `<` seeds future diagnostics; it must not
    // change what is emitted — the comparison is still a runtime INF.
    let listing = compile("program p;\nvar b: boolean;\nbegin\n  b := 1 < 2\nend.\n").unwrap();
    assert!(listing.contains("INF"));
}

#[test]
fn short_circuit_and_or_emit_distinct_labels() {
    let listing = compile(
        "program p;\nvar a: boolean; b: boolean; c: boolean;\nbegin\n  a := true;\n  b := false;\n  c := a and b or a\nend.\n",
    )
    .unwrap();
    assert!(listing.contains("ANDFALSE"));
    assert!(listing.contains("ORRIGHT"));
}
