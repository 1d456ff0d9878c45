mod common;
use common::*;

#[test]
fn test_default_lower_bound_is_zero() {
    let source = "\
DIM A(5)
FOR I = 0 TO 5
A(I) = I * 10
NEXT
PRINT A(0); A(5)";
    assert_eq!(run(source), "050\n");
}

#[test]
fn test_explicit_bounds() {
    let source = "\
DIM A(1 TO 3)
A(1) = 10
A(3) = 30
PRINT A(1) + A(3)";
    assert_eq!(run(source), "40\n");
}

#[test]
fn test_two_dimensions() {
    let source = "\
DIM G(1 TO 3, 0 TO 2)
FOR I = 1 TO 3
FOR J = 0 TO 2
G(I, J) = I * 10 + J
NEXT J, I
PRINT G(1, 0); G(2, 1); G(3, 2)";
    assert_eq!(run(source), "102132\n");
}

#[test]
fn test_runtime_bounds() {
    let source = "\
N = 4
DIM A(N)
A(N) = 7
PRINT A(4)";
    assert_eq!(run(source), "7\n");
}

#[test]
fn test_subscript_below_lower_bound() {
    assert_eq!(run_code("DIM A(1 TO 3)\nA(0) = 1"), 9);
}

#[test]
fn test_subscript_above_upper_bound() {
    assert_eq!(run_code("DIM A(5)\nPRINT A(6)"), 9);
}

#[test]
fn test_wrong_rank_rejected() {
    assert_eq!(run_code("DIM A(5)\nPRINT A(1, 2)"), 9);
}

#[test]
fn test_typed_elements() {
    let source = "\
DIM A(2) AS INTEGER
A(0) = 2.6
PRINT A(0)";
    assert_eq!(run(source), "3\n");
}

#[test]
fn test_shared_array_visible_in_proc() {
    let source = "\
DIM SHARED A(3)
FILL
PRINT A(2)
SUB FILL
FOR I = 0 TO 3
A(I) = I * 5
NEXT
END SUB";
    assert_eq!(run(source), "10\n");
}

#[test]
fn test_swap_elements() {
    let source = "\
DIM A(2)
A(0) = 1
A(1) = 2
SWAP A(0), A(1)
PRINT A(0); A(1)";
    assert_eq!(run(source), "21\n");
}
