mod common;
use common::*;

#[test]
fn test_goto_skips_statements() {
    let source = "\
GOTO DONE
PRINT \"SKIPPED\"
DONE:
PRINT \"HERE\"";
    assert_eq!(run(source), "HERE\n");
}

#[test]
fn test_goto_backward_makes_a_loop() {
    let source = "\
I = 0
AGAIN:
I = I + 1
PRINT I
IF I < 3 THEN GOTO AGAIN";
    assert_eq!(run(source), "1\n2\n3\n");
}

#[test]
fn test_single_line_if_with_else() {
    assert_eq!(run("IF 1 THEN PRINT \"T\" ELSE PRINT \"F\""), "T\n");
    assert_eq!(run("IF 0 THEN PRINT \"T\" ELSE PRINT \"F\""), "F\n");
}

#[test]
fn test_block_if_elseif_chain() {
    let source = "\
FOR I = 1 TO 3
IF I = 1 THEN
PRINT \"ONE\"
ELSEIF I = 2 THEN
PRINT \"TWO\"
ELSE
PRINT \"MANY\"
END IF
NEXT";
    assert_eq!(run(source), "ONE\nTWO\nMANY\n");
}

#[test]
fn test_select_case_forms() {
    let source = "\
FOR I = 1 TO 6
SELECT CASE I
CASE 1, 2
PRINT \"LOW\"
CASE 3 TO 4
PRINT \"MID\"
CASE IS > 5
PRINT \"TOP\"
CASE ELSE
PRINT \"OTHER\"
END SELECT
NEXT";
    assert_eq!(run(source), "LOW\nLOW\nMID\nMID\nOTHER\nTOP\n");
}

#[test]
fn test_select_case_on_strings() {
    let source = "\
W$ = \"NO\"
SELECT CASE W$
CASE \"YES\"
PRINT 1
CASE \"NO\"
PRINT 2
END SELECT";
    assert_eq!(run(source), "2\n");
}

#[test]
fn test_do_while_pre_test() {
    assert_eq!(
        run("I = 0\nDO WHILE I < 3\nI = I + 1\nLOOP\nPRINT I"),
        "3\n"
    );
    // A false pre-test skips the body entirely.
    assert_eq!(run("DO WHILE 0\nPRINT \"NEVER\"\nLOOP\nPRINT \"OK\""), "OK\n");
}

#[test]
fn test_do_until_post_test_runs_once() {
    assert_eq!(run("I = 9\nDO\nPRINT I\nLOOP UNTIL I = 9"), "9\n");
}

#[test]
fn test_while_wend() {
    assert_eq!(
        run("I = 3\nWHILE I > 0\nPRINT I\nI = I - 1\nWEND"),
        "3\n2\n1\n"
    );
}

#[test]
fn test_exit_do_leaves_innermost_loop() {
    let source = "\
I = 0
DO
I = I + 1
DO
EXIT DO
LOOP
IF I = 2 THEN EXIT DO
LOOP
PRINT I";
    assert_eq!(run(source), "2\n");
}

#[test]
fn test_nested_gosub() {
    let source = "\
GOSUB OUTER
END
OUTER:
PRINT \"O\"
GOSUB INNER
RETURN
INNER:
PRINT \"I\"
RETURN";
    assert_eq!(run(source), "O\nI\n");
}

#[test]
fn test_return_to_label() {
    let source = "\
GOSUB WORK
PRINT \"SKIPPED\"
AFTER:
PRINT \"AFTER\"
END
WORK:
RETURN AFTER";
    assert_eq!(run(source), "AFTER\n");
}
