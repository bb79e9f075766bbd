use pascalc::compile;

#[test]
fn concat_emits_the_concat_instruction() {
    let listing = compile(
        "program p;\nvar a, b, c: string;\nbegin\n  a := 'foo';\n  b := 'bar';\n  c := concat(a, b)\nend.\n",
    )
    .unwrap();
    assert!(listing.contains("CONCAT"));
}

#[test]
fn ord_on_a_char_is_a_no_op_at_runtime() {
    let listing = compile("program p;\nvar c: char; n: integer;\nbegin\n  c := 'x';\n  n := ord(c)\nend.\n").unwrap();
    assert!(!listing.contains("ORD"));
    assert!(listing.contains("PUSHL") || listing.contains("PUSHG"));
}

#[test]
fn a_length_one_string_literal_pushes_its_ascii_code_not_a_string() {
    // A char is an integer ASCII code on this VM: 'x' must compile to
    // PUSHI 120, never PUSHS "x", or ord/chr/CHARAT/WRITECHR would be
    // operating on the wrong representation at runtime.
    let listing = compile("program p;\nvar c: char;\nbegin\n  c := 'x'\nend.\n").unwrap();
    assert!(listing.contains("PUSHI 120"));
    assert!(!listing.contains("PUSHS \"x\""));
}

#[test]
fn chr_on_an_integer_checks_the_byte_range() {
    let listing = compile("program p;\nvar n: integer; c: char;\nbegin\n  n := 65;\n  c := chr(n)\nend.\n").unwrap();
    assert!(listing.contains("CHECK 0, 255"));
}

#[test]
fn string_indexing_reads_via_charat() {
    let listing = compile(
        "program p;\nvar s: string; c: char;\nbegin\n  s := 'hello';\n  c := s[1]\nend.\n",
    )
    .unwrap();
    assert!(listing.contains("CHARAT"));
}

#[test]
fn a_char_literal_and_a_string_literal_are_distinct_types() {
    let err = compile(
        "program p;\nvar c: char;\nbegin\n  c := 'ab'\nend.\n",
    )
    .unwrap_err();
    assert!(err.to_string().contains("char") || err.to_string().contains("type"));
}

#[test]
fn length_of_a_string_uses_strlen_at_runtime() {
    let listing = compile(
        "program p;\nvar s: string; n: integer;\nbegin\n  s := 'hello';\n  n := length(s)\nend.\n",
    )
    .unwrap();
    assert!(listing.contains("STRLEN"));
}

#[test]
fn length_of_an_array_is_a_compile_time_constant() {
    let listing = compile(
        "program p;\nvar a: array[1..10] of integer; n: integer;\nbegin\n  n := length(a)\nend.\n",
    )
    .unwrap();
    assert!(listing.contains("PUSHI 10"));
    assert!(!listing.contains("STRLEN"));
}

#[test]
fn a_double_quote_inside_a_string_literal_is_escaped_in_the_emitted_pushs() {
    // Pascal's quoting uses single quotes, so a literal `"` character
    // passes straight through the lexer and must be escaped on the way
    // out, since the emitted PUSHS operand is itself double-quoted.
    let listing = compile(
        "program p;\nvar s: string;\nbegin\n  s := 'say \"hi\"'\nend.\n",
    )
    .unwrap();
    assert!(listing.contains("PUSHS \"say \\\"hi\\\"\""));
}

#[test]
fn concatenating_a_non_string_argument_is_rejected() {
    let err = compile(
        "program p;\nvar a: string; n: integer; c: string;\nbegin\n  n := 1;\n  c := concat(a, n)\nend.\n",
    )
    .unwrap_err();
    assert!(err.to_string().contains("string") || err.to_string().contains("type"));
}
