// Integration tests for the Minipas interpreter
//
// Table-driven suites run whole programs through the public pipeline and
// compare either the emitted lines or the first reported error. Focused
// tests below them cover individual language properties.

use minipas::ast::ExprKind;
use minipas::error::{ErrorKind, PascalError};
use minipas::evaluator::{Environment, Evaluator};
use minipas::{interpret, Parser, Type, Value};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// What a test case should produce
#[derive(Debug, Clone)]
pub enum Expected {
    Output(Vec<String>),
    Error {
        kind: ErrorKind,
        contains: String,
    },
}

/// Individual test case
#[derive(Debug, Clone)]
pub struct TestCase {
    pub name: String,
    pub input: String,
    pub expected: Expected,
}

impl TestCase {
    pub fn prints(name: &str, input: &str, lines: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            input: input.to_string(),
            expected: Expected::Output(lines.iter().map(|l| l.to_string()).collect()),
        }
    }

    pub fn fails_with(name: &str, input: &str, kind: ErrorKind, contains: &str) -> Self {
        Self {
            name: name.to_string(),
            input: input.to_string(),
            expected: Expected::Error {
                kind,
                contains: contains.to_string(),
            },
        }
    }
}

/// Test suite containing multiple test cases
#[derive(Debug)]
pub struct TestSuite {
    pub name: String,
    pub tests: Vec<TestCase>,
}

impl TestSuite {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            tests: Vec::new(),
        }
    }

    pub fn add_test(&mut self, test: TestCase) {
        self.tests.push(test);
    }

    /// Run all tests in this suite, returning the failures
    pub fn run(&self) -> Vec<String> {
        println!("Running test suite: {}", self.name);
        println!("{}", "=".repeat(50));

        let mut failures = Vec::new();
        for test in &self.tests {
            match run_single_test(test) {
                Ok(()) => println!("  ✓ {}", test.name),
                Err(msg) => {
                    println!("  ✗ {}: {}", test.name, msg);
                    failures.push(format!("{}/{}: {}", self.name, test.name, msg));
                }
            }
        }
        println!();
        failures
    }
}

fn run_single_test(test: &TestCase) -> Result<(), String> {
    let mut output: Vec<String> = Vec::new();
    let result = interpret(&test.input, &mut output);

    match (&test.expected, result) {
        (Expected::Output(lines), Ok(())) => {
            if &output == lines {
                Ok(())
            } else {
                Err(format!("expected output {:?}, got {:?}", lines, output))
            }
        }
        (Expected::Output(_), Err(error)) => Err(format!("unexpected error: {}", error)),
        (Expected::Error { .. }, Ok(())) => {
            Err(format!("expected an error, but it ran and printed {:?}", output))
        }
        (Expected::Error { kind, contains }, Err(error)) => {
            if error.kind != *kind {
                Err(format!("expected {:?}, got {}", kind, error))
            } else if !error.message.contains(contains.as_str()) {
                Err(format!(
                    "error message '{}' doesn't contain '{}'",
                    error.message, contains
                ))
            } else {
                Ok(())
            }
        }
    }
}

fn run_program(source: &str) -> Vec<String> {
    let mut output: Vec<String> = Vec::new();
    if let Err(error) = interpret(source, &mut output) {
        panic!("program failed: {}", error);
    }
    output
}

fn run_with_environment(source: &str) -> Environment {
    let program = Parser::new(source).parse().unwrap();
    let mut output: Vec<String> = Vec::new();
    Evaluator::new(&program.routines, &mut output)
        .evaluate_program(&program)
        .unwrap()
}

fn evaluate(expression: &str) -> Value {
    let expr = Parser::new(expression).parse_expression().unwrap();
    let mut output: Vec<String> = Vec::new();
    Evaluator::new(&[], &mut output)
        .evaluate_expression(&expr, &Environment::new())
        .unwrap()
}

fn parse_error(source: &str) -> PascalError {
    Parser::new(source).parse().unwrap_err()
}

// ============================================================================
// Test Suite Creation Functions
// ============================================================================

fn create_expression_tests() -> TestSuite {
    let mut suite = TestSuite::new("Expressions");

    suite.add_test(TestCase::prints(
        "precedence",
        "program P; begin writeln(2 + 3 * 4, ' ', (2 + 3) * 4) end.",
        &["14 20"],
    ));
    suite.add_test(TestCase::prints(
        "floor_division",
        "program P; var a: Integer; begin a := 7; writeln(a div 2, ' ', -a div 2, ' ', -a mod 2) end.",
        &["3 -4 1"],
    ));
    suite.add_test(TestCase::prints(
        "real_division",
        "program P; var a: Integer; begin a := 1; writeln(a / 2, ' ', a / 1) end.",
        &["0.5 1.0"],
    ));
    suite.add_test(TestCase::prints(
        "mixed_arithmetic",
        "program P; var r: Real; begin r := 2; writeln(r * 3 + 1) end.",
        &["7.0"],
    ));
    suite.add_test(TestCase::prints(
        "boolean_operators",
        "program P; var b: Boolean; begin b := (1 < 2) and not (3 = 4); writeln(b, ' ', b or false) end.",
        &["true true"],
    ));
    suite.add_test(TestCase::prints(
        "string_equality",
        "program P; begin writeln('ab' = 'ab', ' ', 'ab' = 'ba') end.",
        &["true false"],
    ));
    suite.add_test(TestCase::fails_with(
        "div_requires_integers",
        "program P; var r: Real; begin writeln(r div 2) end.",
        ErrorKind::SemanticError,
        "Operator 'div' cannot be applied to Real and Integer",
    ));
    suite.add_test(TestCase::fails_with(
        "comparison_requires_integers",
        "program P; var r: Real; begin writeln(r < 2) end.",
        ErrorKind::SemanticError,
        "Operator '<' cannot be applied to Real and Integer",
    ));
    suite.add_test(TestCase::prints(
        "not_covers_following_and",
        "program P; var a: Boolean; begin a := false; writeln(not a and a) end.",
        &["true"],
    ));
    suite.add_test(TestCase::prints(
        "not_covers_following_comparison",
        "program P; var x: Integer; begin x := 5; writeln(not x < 3, ' ', (not true) or true) end.",
        &["true true"],
    ));
    suite.add_test(TestCase::fails_with(
        "not_requires_boolean",
        "program P; begin writeln(not 1) end.",
        ErrorKind::SemanticError,
        "Operator 'not' cannot be applied to Integer",
    ));

    suite
}

fn create_statement_tests() -> TestSuite {
    let mut suite = TestSuite::new("Statements");

    suite.add_test(TestCase::prints(
        "if_else",
        "program P; var x: Integer;
         begin
           x := 3;
           if x > 2 then writeln('big') else writeln('small');
           if x > 5 then writeln('never')
         end.",
        &["big"],
    ));
    suite.add_test(TestCase::prints(
        "while_loop",
        "program P; var n, steps: Integer;
         begin
           n := 27; steps := 0;
           while n > 1 do
             begin
               if n mod 2 = 0 then n := n div 2 else n := 3 * n + 1;
               steps := steps + 1
             end;
           writeln(steps)
         end.",
        &["111"],
    ));
    suite.add_test(TestCase::prints(
        "for_loop",
        "program P; var i: Integer; begin for i := 1 to 3 do writeln('i=', i) end.",
        &["i=1", "i=2", "i=3"],
    ));
    suite.add_test(TestCase::prints(
        "for_loop_empty_range",
        "program P; var i: Integer; begin for i := 5 to 1 do writeln(i); writeln(i) end.",
        &["5"],
    ));
    suite.add_test(TestCase::prints(
        "empty_statements_and_comments",
        "program P; { nothing here } begin ; begin end; writeln() ; end.",
        &[""],
    ));
    suite.add_test(TestCase::fails_with(
        "condition_must_be_boolean",
        "program P; begin if 1 then writeln(1) end.",
        ErrorKind::SemanticError,
        "Condition of 'if' must be Boolean",
    ));
    suite.add_test(TestCase::fails_with(
        "loop_variable_must_be_integer",
        "program P; var r: Real; begin for r := 1 to 2 do writeln(r) end.",
        ErrorKind::SemanticError,
        "must be an Integer variable",
    ));
    suite.add_test(TestCase::fails_with(
        "assign_to_constant",
        "program P; const c = 1; begin c := 2 end.",
        ErrorKind::SemanticError,
        "Cannot assign to constant 'c'",
    ));
    suite.add_test(TestCase::fails_with(
        "assignment_type_mismatch",
        "program P; var i: Integer; begin i := 1.5 end.",
        ErrorKind::SemanticError,
        "expected Integer, found Real",
    ));

    suite
}

fn create_declaration_tests() -> TestSuite {
    let mut suite = TestSuite::new("Declarations");

    suite.add_test(TestCase::prints(
        "constants",
        "program P;
         const n = 10; pi: Real = 3.5; greeting = 'hello'; big = n * n;
         begin writeln(greeting, ' ', big, ' ', pi * 2) end.",
        &["hello 100 7.0"],
    ));
    suite.add_test(TestCase::prints(
        "defaults",
        "program P; var i: Integer; r: Real; b: Boolean; begin writeln(i, ' ', r, ' ', b) end.",
        &["0 0.0 false"],
    ));
    suite.add_test(TestCase::prints(
        "arrays_with_constant_bounds",
        "program P;
         const lo = -1; hi = lo + 3;
         var a: Array[lo..hi] of Integer; i: Integer;
         begin
           for i := lo to hi do a[i] := i * i;
           writeln(a[-1], a[0], a[1], a[2])
         end.",
        &["1014"],
    ));
    suite.add_test(TestCase::prints(
        "nested_arrays",
        "program P; var m: Array[1..2] of Array[1..2] of Integer;
         begin m[2][1] := 5; writeln(m[2][1], m[1][2]) end.",
        &["50"],
    ));
    suite.add_test(TestCase::fails_with(
        "redeclaration",
        "program P; var x: Integer; const x = 1; begin end.",
        ErrorKind::SemanticError,
        "'x' is already declared in this scope",
    ));
    suite.add_test(TestCase::fails_with(
        "unknown_type",
        "program P; var x: Str; begin end.",
        ErrorKind::SyntaxError,
        "Expected type, found identifier 'Str'",
    ));
    suite.add_test(TestCase::fails_with(
        "unterminated_string",
        "program P; begin writeln('oops) end.",
        ErrorKind::LexError,
        "Unterminated string",
    ));
    suite.add_test(TestCase::fails_with(
        "unknown_character",
        "program P; begin writeln(1 ? 2) end.",
        ErrorKind::LexError,
        "Unexpected character: '?'",
    ));

    suite
}

fn create_routine_tests() -> TestSuite {
    let mut suite = TestSuite::new("Routines");

    suite.add_test(TestCase::prints(
        "recursive_function",
        "program P;
         function fact(n: Integer): Integer;
         begin
           if n <= 1 then fact := 1 else fact := n * fact(n - 1)
         end;
         begin writeln(fact(10)) end.",
        &["3628800"],
    ));
    suite.add_test(TestCase::prints(
        "procedure_with_params",
        "program P;
         procedure show(label: Integer; flag: Boolean);
         begin writeln(label, ':', flag) end;
         begin show(1, true); show(2, 1 = 2) end.",
        &["1:true", "2:false"],
    ));
    suite.add_test(TestCase::prints(
        "function_result_defaults",
        "program P; function f(): Integer; begin end; begin writeln(f() + f) end.",
        &["0"],
    ));
    suite.add_test(TestCase::prints(
        "integer_argument_widens_to_real",
        "program P; function half(x: Real): Real; begin half := x / 2 end;
         begin writeln(half(3)) end.",
        &["1.5"],
    ));
    suite.add_test(TestCase::prints(
        "nested_routine_reads_enclosing_local",
        "program P;
         procedure outer();
           var secret: Integer;
           procedure inner();
           begin writeln(secret) end;
         begin secret := 42; inner() end;
         begin outer() end.",
        &["42"],
    ));
    suite.add_test(TestCase::prints(
        "global_writes_inside_calls_do_not_flow_back",
        "program P; var g: Integer;
         procedure set(v: Integer); begin g := v; writeln(g) end;
         begin g := 1; set(2); writeln(g) end.",
        &["2", "1"],
    ));
    suite.add_test(TestCase::prints(
        "array_parameter_is_copied",
        "program P; var a: Array[1..3] of Integer;
         function sum(xs: Array[1..3] of Integer): Integer;
           var i, total: Integer;
         begin
           total := 0;
           for i := 1 to 3 do total := total + xs[i];
           xs[1] := 100;
           sum := total
         end;
         begin a[1] := 1; a[2] := 2; a[3] := 3; writeln(sum(a), ' ', a[1]) end.",
        &["6 1"],
    ));
    suite.add_test(TestCase::fails_with(
        "wrong_arity",
        "program P; function f(a: Integer): Integer; begin f := a end; begin writeln(f(1, 2)) end.",
        ErrorKind::SemanticError,
        "'f' expects 1 argument(s), found 2",
    ));
    suite.add_test(TestCase::fails_with(
        "procedure_in_expression",
        "program P; procedure p(); begin end; begin writeln(p) end.",
        ErrorKind::SemanticError,
        "Procedure 'p' does not return a value",
    ));
    suite.add_test(TestCase::fails_with(
        "function_as_statement",
        "program P; function f(): Integer; begin f := 1 end; begin f() end.",
        ErrorKind::SemanticError,
        "cannot be used as a statement",
    ));

    suite
}

fn create_runtime_error_tests() -> TestSuite {
    let mut suite = TestSuite::new("Runtime Errors");

    suite.add_test(TestCase::fails_with(
        "division_by_zero",
        "program P; var z: Real; begin writeln(1 / z) end.",
        ErrorKind::RuntimeError,
        "Division by zero",
    ));
    suite.add_test(TestCase::fails_with(
        "mod_by_zero",
        "program P; var z: Integer; begin writeln(5 mod z) end.",
        ErrorKind::RuntimeError,
        "Division by zero",
    ));
    suite.add_test(TestCase::fails_with(
        "index_below_low_bound",
        "program P; var a: Array[1..3] of Integer; begin writeln(a[0]) end.",
        ErrorKind::RuntimeError,
        "Index 0 is out of bounds 1..3",
    ));
    suite.add_test(TestCase::prints(
        "index_at_top_of_bounds_wider_than_i64",
        "program P; var a: Array[-1..9223372036854775807] of Integer;
         begin writeln(a[9223372036854775807], a[-1]) end.",
        &["00"],
    ));
    suite.add_test(TestCase::prints(
        "single_write_to_huge_array",
        "program P; var a: Array[0..9223372036854775807] of Integer; b: Array[1..100000000] of Integer;
         begin
           a[9223372036854775807] := 1;
           b[100000000] := 2;
           writeln(a[9223372036854775807], a[0], b[100000000], b[1])
         end.",
        &["1020"],
    ));
    suite.add_test(TestCase::prints(
        "for_loop_up_to_max_integer",
        "program P; var i: Integer;
         begin for i := 9223372036854775806 to 9223372036854775807 do writeln(i) end.",
        &["9223372036854775806", "9223372036854775807"],
    ));
    suite.add_test(TestCase::fails_with(
        "negative_index_into_wide_array",
        "program P; var a: Array[0..9223372036854775807] of Integer; begin writeln(a[-1]) end.",
        ErrorKind::RuntimeError,
        "Index -1 is out of bounds 0..9223372036854775807",
    ));
    suite.add_test(TestCase::fails_with(
        "integer_overflow",
        "program P; var x: Integer; begin x := 9223372036854775807; x := x + 1 end.",
        ErrorKind::RuntimeError,
        "Integer overflow",
    ));

    suite
}

// ============================================================================
// Main Test Function
// ============================================================================

#[test]
fn comprehensive_language_tests() {
    init_logging();

    let suites = vec![
        create_expression_tests(),
        create_statement_tests(),
        create_declaration_tests(),
        create_routine_tests(),
        create_runtime_error_tests(),
    ];

    let mut failures = Vec::new();
    for suite in suites {
        failures.extend(suite.run());
    }

    assert!(failures.is_empty(), "failing cases:\n{}", failures.join("\n"));
}

// ============================================================================
// Focused Tests
// ============================================================================

#[test]
fn integer_arithmetic_respects_precedence() {
    assert_eq!(evaluate("2 + 3 * 4"), Value::Integer(14));
    assert_eq!(evaluate("(2 + 3) * 4"), Value::Integer(20));
    assert_eq!(evaluate("10 - 4 - 3"), Value::Integer(3));
}

#[test]
fn integer_division_rounds_toward_negative_infinity() {
    assert_eq!(evaluate("7 div 2"), Value::Integer(3));
    assert_eq!(evaluate("-7 div 2"), Value::Integer(-4));
}

#[test]
fn slash_always_yields_real() {
    let expr = Parser::new("1 / 2").parse_expression().unwrap();
    assert_eq!(expr.ty, Type::Real);
    assert_eq!(evaluate("1 / 2"), Value::Real(0.5));

    let expr = Parser::new("1 div 2").parse_expression().unwrap();
    assert_eq!(expr.ty, Type::Integer);
    assert_eq!(evaluate("1 div 2"), Value::Integer(0));
}

#[test]
fn redeclaration_reports_second_position() {
    let error = parse_error("program P; var x: Integer; var x: Integer; begin end.");
    assert_eq!(error.kind, ErrorKind::SemanticError);
    assert!(error.message.contains("'x'"));
    assert_eq!((error.span.line, error.span.column), (1, 32));
}

#[test]
fn undefined_reference_is_rejected() {
    let error = parse_error("program P; begin y := 1 end.");
    assert_eq!(error.kind, ErrorKind::SemanticError);
    assert!(error.message.contains("Undeclared identifier 'y'"));
    assert_eq!((error.span.line, error.span.column), (1, 18));
}

#[test]
fn function_local_does_not_alias_global() {
    let output = run_program(
        "program P; var x: Integer;
         function f(): Integer;
           var x: Integer;
         begin
           x := 99;
           f := x
         end;
         begin
           x := 1;
           writeln(f());
           writeln(x)
         end.",
    );
    assert_eq!(output, vec!["99", "1"]);
}

#[test]
fn array_round_trip() {
    let env = run_with_environment(
        "program P; var a: Array[1..5] of Integer; x, y: Integer;
         begin a[3] := 7; x := a[3]; y := a[4] end.",
    );
    assert_eq!(env.get("x"), Some(&Value::Integer(7)));
    assert_eq!(env.get("y"), Some(&Value::Integer(0)));
}

#[test]
fn end_to_end_program() {
    init_logging();
    let output =
        run_program("program P; var x: Integer; begin x := 2 + 3 * 4; writeln(x) end.");
    assert_eq!(output, vec!["14"]);
}

#[test]
fn parsing_is_idempotent() {
    let source = "program P;
        const n = 3;
        var a: Array[1..n] of Real; i: Integer;
        function sq(v: Integer): Integer; begin sq := v * v end;
        begin for i := 1 to n do a[i] := sq(i) end.";
    let first = Parser::new(source).parse().unwrap();
    let second = Parser::new(source).parse().unwrap();
    assert_eq!(first, second);
}

#[test]
fn output_before_runtime_error_is_kept() {
    let mut output: Vec<String> = Vec::new();
    let error = interpret(
        "program P; var z: Integer; begin writeln('before'); writeln(1 div z); writeln('after') end.",
        &mut output,
    )
    .unwrap_err();
    assert_eq!(error.kind, ErrorKind::RuntimeError);
    assert_eq!(output, vec!["before"]);
}

#[test]
fn constant_references_are_folded() {
    let expr = Parser::new("2 * (3 + 4) - 1").parse_expression().unwrap();
    assert_eq!(expr.kind, ExprKind::Literal(Value::Integer(13)));
}

#[test]
fn error_display_includes_position() {
    let error = parse_error("program P;\nbegin\n  writeln(1 +)\nend.");
    assert_eq!(error.kind, ErrorKind::SyntaxError);
    assert_eq!(
        error.to_string(),
        "Syntax Error at line 3, column 14: Expected expression, found ')'"
    );
}
