//! The six literal compile scenarios plus a few additional error paths
//! through the same machinery (redeclaration, builtin shadowing, bad
//! call arity).

use pascalc::{compile, CompileError};

#[test]
fn arithmetic_precedence_emits_mul_before_add() {
    let listing = compile("program p; var x:integer; begin x := 1+2*3; writeln(x) end.\n").unwrap();
    assert!(listing.starts_with("JUMP MAIN\n"));
    assert!(listing.contains("MAIN:\n"));
    assert!(listing.contains("START\n"));
    assert!(listing.trim_end().ends_with("STOP"));

    for needle in ["PUSHI 1", "PUSHI 2", "PUSHI 3", "MUL", "ADD", "STOREG 0", "PUSHG 0", "WRITEI", "WRITELN"] {
        assert!(listing.contains(needle), "missing `{needle}` in:\n{listing}");
    }
    let mul_pos = listing.find("MUL").unwrap();
    let add_pos = listing.find("ADD").unwrap();
    assert!(mul_pos < add_pos, "MUL must be emitted before ADD");
}

#[test]
fn constant_array_index_out_of_range_is_rejected() {
    let err = compile("program p; var a:array[1..3] of integer; begin a[4] := 0 end.\n").unwrap_err();
    assert!(matches!(err, CompileError::Semantic(_)));
    assert!(err.to_string().contains("index out of range"));
}

#[test]
fn function_without_return_assignment_is_rejected() {
    let err = compile("program p; function f(x:integer):integer; begin end;\n").unwrap_err();
    assert!(matches!(err, CompileError::Semantic(_)));
    assert!(err.to_string().contains("does not assign"));
}

#[test]
fn assigning_to_for_control_variable_is_rejected() {
    let err = compile("program p; var i:integer; begin for i:=1 to 3 do i := i+1 end.\n").unwrap_err();
    assert!(matches!(err, CompileError::Semantic(_)));
    assert!(err.to_string().contains("FOR control variable"));
}

#[test]
fn constant_division_by_zero_is_rejected() {
    let err = compile("program p; var r:real; begin r := 1 / 0 end.\n").unwrap_err();
    assert!(matches!(err, CompileError::Semantic(_)));
    assert!(err.to_string().contains("division by zero"));
}

#[test]
fn string_length_emits_strlen_then_writei() {
    let listing = compile("program p; var s:string; begin s := 'ok'; writeln(length(s)) end.\n").unwrap();
    let strlen_pos = listing.find("STRLEN").expect("STRLEN must be emitted");
    let writei_pos = listing.find("WRITEI").expect("WRITEI must be emitted");
    let writeln_pos = listing.rfind("WRITELN").expect("WRITELN must be emitted");
    assert!(strlen_pos < writei_pos && writei_pos < writeln_pos);
}

#[test]
fn redeclaration_in_the_same_scope_is_rejected() {
    let err = compile("program p; var x:integer; var x:real; begin end.\n").unwrap_err();
    assert!(matches!(err, CompileError::Semantic(_)));
    assert!(err.to_string().contains("already declared"));
}

#[test]
fn shadowing_a_builtin_name_is_rejected() {
    let err = compile("program p; var length:integer; begin end.\n").unwrap_err();
    assert!(matches!(err, CompileError::Semantic(_)));
    assert!(err.to_string().contains("reserved"));
}

#[test]
fn calling_a_procedure_with_the_wrong_number_of_args_is_rejected() {
    let src = "program p;\nprocedure greet(who: string);\nbegin writeln(who) end;\nbegin\n  greet()\nend.\n";
    let err = compile(src).unwrap_err();
    assert!(matches!(err, CompileError::Semantic(_)));
}

#[test]
fn assigning_a_real_expression_to_an_integer_variable_is_rejected() {
    let err = compile("program p; var x:integer; begin x := 1.5 end.\n").unwrap_err();
    assert!(matches!(err, CompileError::Semantic(_)));
    assert!(err.to_string().contains("incompatible"));
}

#[test]
fn undeclared_variable_reference_is_rejected() {
    let err = compile("program p; begin y := 1 end.\n").unwrap_err();
    assert!(matches!(err, CompileError::Semantic(_)));
}

#[test]
fn an_empty_range_is_rejected() {
    let err = compile("program p; var a: array[3..1] of integer; begin end.\n").unwrap_err();
    assert!(matches!(err, CompileError::Semantic(_)));
    assert!(err.to_string().contains("invalid range"));
}
