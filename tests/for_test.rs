mod common;
use common::*;

#[test]
fn test_counts_up() {
    assert_eq!(run("FOR I = 1 TO 3\nPRINT I\nNEXT I"), "1\n2\n3\n");
}

#[test]
fn test_step() {
    assert_eq!(run("FOR I = 1 TO 7 STEP 3\nPRINT I\nNEXT"), "1\n4\n7\n");
    assert_eq!(run("FOR I = 3 TO 1 STEP -1\nPRINT I\nNEXT"), "3\n2\n1\n");
    assert_eq!(run("FOR X = 1 TO 2 STEP .5\nPRINT X\nNEXT"), "1\n1.5\n2\n");
}

#[test]
fn test_zero_iterations() {
    assert_eq!(run("FOR I = 5 TO 1\nPRINT I\nNEXT\nPRINT \"DONE\""), "DONE\n");
}

#[test]
fn test_counter_holds_overshoot_after_loop() {
    assert_eq!(run("FOR I = 1 TO 3\nNEXT\nPRINT I"), "4\n");
}

#[test]
fn test_limit_evaluates_once() {
    let source = "\
N = 3
FOR I = 1 TO N
N = 10
PRINT I
NEXT";
    assert_eq!(run(source), "1\n2\n3\n");
}

#[test]
fn test_nested_loops() {
    let source = "\
FOR I = 1 TO 2
FOR J = 1 TO 2
PRINT I * 10 + J
NEXT J
NEXT I";
    assert_eq!(run(source), "11\n12\n21\n22\n");
}

#[test]
fn test_next_with_two_counters() {
    let source = "\
FOR I = 1 TO 2
FOR J = 1 TO 2
PRINT I * 10 + J
NEXT J, I";
    assert_eq!(run(source), "11\n12\n21\n22\n");
}

#[test]
fn test_exit_for() {
    let source = "\
FOR I = 1 TO 10
IF I = 3 THEN EXIT FOR
PRINT I
NEXT
PRINT \"OUT\"";
    assert_eq!(run(source), "1\n2\nOUT\n");
}

#[test]
fn test_integer_counter_truncates() {
    assert_eq!(run("DEFINT I-N\nFOR I = 1 TO 2 STEP 1\nPRINT I\nNEXT"), "1\n2\n");
}
