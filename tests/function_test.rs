mod common;
use common::*;

#[test]
fn test_function_returns_through_its_name() {
    let source = "\
PRINT TWICE(21)
FUNCTION TWICE (N)
TWICE = N * 2
END FUNCTION";
    assert_eq!(run(source), "42\n");
}

#[test]
fn test_zero_argument_function_called_bare() {
    let source = "\
PRINT ANSWER + 1
FUNCTION ANSWER
ANSWER = 41
END FUNCTION";
    assert_eq!(run(source), "42\n");
}

#[test]
fn test_string_function() {
    let source = "\
PRINT SHOUT$(\"hey\")
FUNCTION SHOUT$ (S$)
SHOUT$ = UCASE$(S$) + \"!\"
END FUNCTION";
    assert_eq!(run(source), "HEY!\n");
}

#[test]
fn test_recursion() {
    let source = "\
PRINT FIB(10)
FUNCTION FIB (N)
IF N < 2 THEN
FIB = N
ELSE
FIB = FIB(N - 1) + FIB(N - 2)
END IF
END FUNCTION";
    assert_eq!(run(source), "55\n");
}

#[test]
fn test_functions_compose() {
    let source = "\
PRINT ADD(MUL(2, 3), 4)
FUNCTION ADD (A, B)
ADD = A + B
END FUNCTION
FUNCTION MUL (A, B)
MUL = A * B
END FUNCTION";
    assert_eq!(run(source), "10\n");
}

#[test]
fn test_unset_return_is_zero() {
    let source = "\
PRINT NOTHING(5)
FUNCTION NOTHING (N)
END FUNCTION";
    assert_eq!(run(source), "0\n");
}

#[test]
fn test_function_in_condition() {
    let source = "\
IF BIGGER(3, 2) THEN PRINT \"YES\"
FUNCTION BIGGER (A, B)
BIGGER = A > B
END FUNCTION";
    assert_eq!(run(source), "YES\n");
}

#[test]
fn test_byref_through_function_call() {
    let source = "\
A = 1
X = STEAL(A)
PRINT A; X
FUNCTION STEAL (N)
N = 0
STEAL = 7
END FUNCTION";
    assert_eq!(run(source), "07\n");
}
