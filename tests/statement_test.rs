mod common;
use common::*;

#[test]
fn test_print_expressions() {
    assert_eq!(run("PRINT \"HELLO\""), "HELLO\n");
    assert_eq!(run("PRINT 2 + 3 * 4"), "14\n");
    assert_eq!(run("PRINT (2 + 3) * 4"), "20\n");
    assert_eq!(run("PRINT 2 ^ 3 ^ 2"), "64\n");
    assert_eq!(run("PRINT -5"), "-5\n");
}

#[test]
fn test_print_separators() {
    assert_eq!(run("PRINT 1; 2"), "12\n");
    assert_eq!(run("PRINT 1, 2"), format!("1{}2\n", " ".repeat(13)));
    assert_eq!(run("PRINT \"A\";\nPRINT \"B\""), "AB\n");
}

#[test]
fn test_integer_operators() {
    assert_eq!(run("PRINT 7 MOD 3"), "1\n");
    assert_eq!(run("PRINT 7 \\ 2"), "3\n");
}

#[test]
fn test_slash_divides_floating_even_on_integers() {
    assert_eq!(run("PRINT 7 / 2"), "3.5\n");
    assert_eq!(run("PRINT 7% / 2%"), "3.5\n");
    assert_eq!(run("PRINT 1 / 3"), format!("{}\n", (1.0f64 / 3.0f64) as f32));
}

#[test]
fn test_comparisons_are_integers() {
    assert_eq!(run("PRINT 1 < 2"), "-1\n");
    assert_eq!(run("PRINT 1 > 2"), "0\n");
    assert_eq!(run("PRINT NOT 0"), "-1\n");
    assert_eq!(run("PRINT 6 AND 3"), "2\n");
    assert_eq!(run("PRINT 6 OR 3"), "7\n");
    assert_eq!(run("PRINT 6& AND 3&"), "2\n");
}

#[test]
fn test_not_negates_a_whole_comparison() {
    assert_eq!(run("PRINT NOT 1 = 1"), "0\n");
    assert_eq!(run("A = 2\nIF NOT A > 5 THEN PRINT \"SMALL\""), "SMALL\n");
}

#[test]
fn test_assignment_casts_to_storage_type() {
    assert_eq!(run("A% = 2.6\nPRINT A%"), "3\n");
    assert_eq!(run("A% = 2.5\nPRINT A%"), "2\n");
    assert_eq!(run("A& = 32768\nPRINT A&"), "32768\n");
}

#[test]
fn test_deftype_changes_default() {
    assert_eq!(run("DEFINT I-N\nI = 2.5\nPRINT I"), "2\n");
    // A suffix beats the DEF range.
    assert_eq!(run("DEFINT A-Z\nX! = 1.5\nPRINT X!"), "1.5\n");
}

#[test]
fn test_const_folds_into_expressions() {
    assert_eq!(run("CONST LIMIT = 10\nPRINT LIMIT * 2"), "20\n");
    assert_eq!(run("CONST GREETING$ = \"HI\"\nPRINT GREETING$"), "HI\n");
}

#[test]
fn test_const_visible_inside_procedures() {
    let source = "\
CONST LIMIT = 10
SHOW
SUB SHOW
PRINT LIMIT
END SUB";
    assert_eq!(run(source), "10\n");
}

#[test]
fn test_swap() {
    assert_eq!(run("A = 1\nB = 2\nSWAP A, B\nPRINT A; B"), "21\n");
    assert_eq!(
        run("A$ = \"X\"\nB$ = \"Y\"\nSWAP A$, B$\nPRINT A$; B$"),
        "YX\n"
    );
}

#[test]
fn test_swap_mixed_numeric_keeps_storage_types() {
    assert_eq!(run("A% = 1\nB# = 2.25\nSWAP A%, B#\nPRINT A%; B#"), "21\n");
}

#[test]
fn test_string_builtins() {
    assert_eq!(run("PRINT LEN(\"HELLO\")"), "5\n");
    assert_eq!(run("PRINT UCASE$(\"aBc\")"), "ABC\n");
    assert_eq!(run("PRINT LCASE$(\"aBc\")"), "abc\n");
    assert_eq!(run("PRINT LEFT$(\"HELLO\", 2)"), "HE\n");
    assert_eq!(run("PRINT RIGHT$(\"HELLO\", 2)"), "LO\n");
    assert_eq!(run("PRINT MID$(\"HELLO\", 2, 3)"), "ELL\n");
    assert_eq!(run("PRINT INSTR(\"HELLO\", \"LL\")"), "3\n");
    assert_eq!(run("PRINT LTRIM$(\"  A\")"), "A\n");
    assert_eq!(run("PRINT STRING$(3, \"AB\")"), "AAA\n");
    assert_eq!(run("PRINT SPACE$(2); \"X\""), "  X\n");
    assert_eq!(run("PRINT CHR$(65)"), "A\n");
    assert_eq!(run("PRINT ASC(\"A\")"), "65\n");
}

#[test]
fn test_numeric_builtins() {
    assert_eq!(run("PRINT ABS(-3)"), "3\n");
    assert_eq!(run("PRINT SGN(-9)"), "-1\n");
    assert_eq!(run("PRINT SQR(25)"), "5\n");
    assert_eq!(run("PRINT INT(-2.5)"), "-3\n");
    assert_eq!(run("PRINT FIX(-2.5)"), "-2\n");
    assert_eq!(run("PRINT CINT(2.5)"), "2\n");
    assert_eq!(run("PRINT CINT(3.5)"), "4\n");
    assert_eq!(run("PRINT CLNG(100000.4)"), "100000\n");
}

#[test]
fn test_val_and_str() {
    assert_eq!(run("PRINT VAL(\"42XYZ\")"), "42\n");
    assert_eq!(run("PRINT VAL(\"NOPE\")"), "0\n");
    assert_eq!(run("PRINT STR$(5)"), " 5\n");
    assert_eq!(run("PRINT STR$(-5)"), "-5\n");
}

#[test]
fn test_input_with_prompt() {
    assert_eq!(
        run_with("INPUT \"NAME\"; N$\nPRINT \"HI \"; N$", &["JOE"]),
        "NAME? \nHI JOE\n"
    );
}

#[test]
fn test_line_input_keeps_commas() {
    assert_eq!(
        run_with("LINE INPUT S$\nPRINT S$", &["A, B"]),
        "\nA, B\n"
    );
}

#[test]
fn test_print_using() {
    assert_eq!(run("PRINT USING \"##.##\"; 3.14159"), " 3.14\n");
    assert_eq!(run("PRINT USING \"#,###,###\"; 1234567"), "1,234,567\n");
    assert_eq!(run("PRINT USING \"TOTAL: ###\"; 42"), "TOTAL:  42\n");
}
