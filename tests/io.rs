use pascalc::compile;

#[test]
fn writeln_dispatches_on_static_type_per_argument() {
    let listing = compile(
        "program p;\nvar i: integer; r: real; s: string; c: char; b: boolean;\nbegin\n  i := 1;\n  r := 1.0;\n  s := 'hi';\n  c := 'x';\n  b := true;\n  writeln(i, r, s, c, b)\nend.\n",
    )
    .unwrap();
    for needle in ["WRITEI", "WRITEF", "WRITES", "WRITECHR"] {
        assert!(listing.contains(needle), "missing {needle}");
    }
    assert_eq!(listing.matches("WRITELN").count(), 1);
}

#[test]
fn writeln_with_no_arguments_just_emits_writeln() {
    let listing = compile("program p;\nbegin\n  writeln\nend.\n").unwrap();
    assert!(listing.contains("WRITELN"));
}

#[test]
fn writeln_rejects_an_entire_array_argument() {
    let err = compile("program p;\nvar a: array[1..3] of integer;\nbegin\n  writeln(a)\nend.\n").unwrap_err();
    assert!(err.to_string().contains("array"));
}

#[test]
fn readln_into_integer_converts_with_atoi() {
    let listing = compile("program p;\nvar x: integer;\nbegin\n  readln(x)\nend.\n").unwrap();
    assert!(listing.contains("READ"));
    assert!(listing.contains("ATOI"));
    assert!(listing.contains("STOREG 0"));
}

#[test]
fn readln_into_real_converts_with_atof() {
    let listing = compile("program p;\nvar x: real;\nbegin\n  readln(x)\nend.\n").unwrap();
    assert!(listing.contains("ATOF"));
}

#[test]
fn readln_into_string_does_not_convert() {
    let listing = compile("program p;\nvar s: string;\nbegin\n  readln(s)\nend.\n").unwrap();
    assert!(listing.contains("READ"));
    assert!(!listing.contains("ATOI"));
    assert!(!listing.contains("ATOF"));
}

#[test]
fn readln_cannot_target_the_for_control_variable() {
    let err = compile("program p;\nvar i: integer;\nbegin\n  for i := 1 to 3 do readln(i)\nend.\n").unwrap_err();
    assert!(err.to_string().contains("FOR control variable") || err.to_string().contains("read-only"));
}

#[test]
fn readln_into_an_array_element_checks_bounds() {
    let listing = compile(
        "program p;\nvar a: array[1..5] of integer;\nbegin\n  readln(a[1])\nend.\n",
    )
    .unwrap();
    assert!(listing.contains("CHECK 1, 5"));
    assert!(listing.contains("STOREN"));
}
