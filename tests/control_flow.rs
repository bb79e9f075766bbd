use pascalc::compile;

#[test]
fn if_without_else_emits_a_single_end_label() {
    let listing = compile("program p;\nvar x: integer;\nbegin\n  if x > 0 then x := 1\nend.\n").unwrap();
    assert!(listing.contains("JZ IFEND"));
    assert!(listing.contains("IFEND1:\n"));
}

#[test]
fn if_with_else_emits_else_and_end_labels_in_order() {
    let listing =
        compile("program p;\nvar x: integer;\nbegin\n  if x > 0 then x := 1 else x := 2\nend.\n").unwrap();
    let else_pos = listing.find("IFELSE1:").expect("else label must be emitted");
    let end_pos = listing.find("IFEND2:").expect("end label must be emitted");
    assert!(else_pos < end_pos);
}

#[test]
fn while_loop_emits_condition_check_before_body_and_jumps_back() {
    let listing = compile("program p;\nvar x: integer;\nbegin\n  x := 0;\n  while x < 10 do x := x + 1\nend.\n").unwrap();
    assert!(listing.contains("WSTART1:\n"));
    assert!(listing.contains("JZ WEND2"));
    assert!(listing.contains("JUMP WSTART1"));
}

#[test]
fn for_to_increments_and_for_downto_decrements() {
    let up = compile("program p;\nvar i: integer;\nbegin\n  for i := 1 to 10 do\n  begin\n  end\nend.\n").unwrap();
    assert!(up.contains("SUP") || up.contains("SUPEQ") || up.contains("SUP\n"));

    let down = compile("program p;\nvar i: integer;\nbegin\n  for i := 10 downto 1 do\n  begin\n  end\nend.\n").unwrap();
    assert!(down.contains("INF") || down.contains("INFEQ"));
}

#[test]
fn repeat_until_evaluates_condition_after_the_body() {
    let listing = compile("program p;\nvar x: integer;\nbegin\n  x := 0;\n  repeat\n    x := x + 1\n  until x = 5\nend.\n").unwrap();
    let start = listing.find("RSTART1:\n").expect("repeat start label must be emitted");
    let jz = listing.rfind("JZ RSTART1").expect("conditional back-jump must be emitted");
    assert!(start < jz);
}

#[test]
fn nested_for_loops_over_distinct_control_variables_are_both_readonly_inside_their_own_body() {
    let err = compile(
        "program p;\nvar i: integer; j: integer;\nbegin\n  for i := 1 to 3 do\n    for j := 1 to 3 do\n      i := i + 1\nend.\n",
    )
    .unwrap_err();
    assert!(err.to_string().contains("FOR control variable"));
}
