//! Arithmetic, comparison, and logic on runtime values.
//!
//! Result types follow the numeric coercion table; integral results use
//! checked arithmetic so overflow surfaces as an error instead of
//! wrapping.

use super::value::Val;
use crate::error;
use crate::lang::{coerce, ElementaryType, Error};
use std::cmp::Ordering;

fn elem_of(val: &Val) -> Option<ElementaryType> {
    match val {
        Val::Integer(_) => Some(ElementaryType::Integer),
        Val::Long(_) => Some(ElementaryType::Long),
        Val::Single(_) => Some(ElementaryType::Single),
        Val::Double(_) => Some(ElementaryType::Double),
        Val::String(_) => Some(ElementaryType::String),
        _ => None,
    }
}

fn numeric_pair(lhs: &Val, rhs: &Val) -> Result<ElementaryType, Error> {
    match (elem_of(lhs), elem_of(rhs)) {
        (Some(l), Some(r)) => coerce(l, r).ok_or_else(|| error!(TypeMismatch)),
        _ => Err(error!(TypeMismatch)),
    }
}

pub fn add(lhs: &Val, rhs: &Val) -> Result<Val, Error> {
    if let (Val::String(a), Val::String(b)) = (lhs, rhs) {
        let mut s = String::with_capacity(a.len() + b.len());
        s.push_str(a);
        s.push_str(b);
        return Ok(Val::String(s.as_str().into()));
    }
    match numeric_pair(lhs, rhs)? {
        ElementaryType::Integer => lhs
            .as_i16()?
            .checked_add(rhs.as_i16()?)
            .map(Val::Integer)
            .ok_or_else(|| error!(Overflow)),
        ElementaryType::Long => lhs
            .as_i32()?
            .checked_add(rhs.as_i32()?)
            .map(Val::Long)
            .ok_or_else(|| error!(Overflow)),
        ElementaryType::Single => Ok(Val::Single((lhs.as_f64()? + rhs.as_f64()?) as f32)),
        _ => Ok(Val::Double(lhs.as_f64()? + rhs.as_f64()?)),
    }
}

pub fn sub(lhs: &Val, rhs: &Val) -> Result<Val, Error> {
    match numeric_pair(lhs, rhs)? {
        ElementaryType::Integer => lhs
            .as_i16()?
            .checked_sub(rhs.as_i16()?)
            .map(Val::Integer)
            .ok_or_else(|| error!(Overflow)),
        ElementaryType::Long => lhs
            .as_i32()?
            .checked_sub(rhs.as_i32()?)
            .map(Val::Long)
            .ok_or_else(|| error!(Overflow)),
        ElementaryType::Single => Ok(Val::Single((lhs.as_f64()? - rhs.as_f64()?) as f32)),
        _ => Ok(Val::Double(lhs.as_f64()? - rhs.as_f64()?)),
    }
}

pub fn mul(lhs: &Val, rhs: &Val) -> Result<Val, Error> {
    match numeric_pair(lhs, rhs)? {
        ElementaryType::Integer => lhs
            .as_i16()?
            .checked_mul(rhs.as_i16()?)
            .map(Val::Integer)
            .ok_or_else(|| error!(Overflow)),
        ElementaryType::Long => lhs
            .as_i32()?
            .checked_mul(rhs.as_i32()?)
            .map(Val::Long)
            .ok_or_else(|| error!(Overflow)),
        ElementaryType::Single => Ok(Val::Single((lhs.as_f64()? * rhs.as_f64()?) as f32)),
        _ => Ok(Val::Double(lhs.as_f64()? * rhs.as_f64()?)),
    }
}

/// `/` is always floating point: Double when a Double operand is
/// present, Single otherwise. `\` is the integral division.
pub fn div(lhs: &Val, rhs: &Val) -> Result<Val, Error> {
    numeric_pair(lhs, rhs)?;
    let divisor = rhs.as_f64()?;
    if divisor == 0.0 {
        return Err(error!(DivisionByZero));
    }
    let quotient = lhs.as_f64()? / divisor;
    if matches!(lhs, Val::Double(_)) || matches!(rhs, Val::Double(_)) {
        Ok(Val::Double(quotient))
    } else {
        Ok(Val::Single(quotient as f32))
    }
}

/// `\` rounds both operands to integers first.
pub fn idiv(lhs: &Val, rhs: &Val) -> Result<Val, Error> {
    numeric_pair(lhs, rhs)?;
    let divisor = rhs.as_i32()?;
    if divisor == 0 {
        return Err(error!(DivisionByZero));
    }
    let quotient = lhs
        .as_i32()?
        .checked_div(divisor)
        .ok_or_else(|| error!(Overflow))?;
    integral_result(lhs, rhs, quotient)
}

pub fn modulus(lhs: &Val, rhs: &Val) -> Result<Val, Error> {
    numeric_pair(lhs, rhs)?;
    let divisor = rhs.as_i32()?;
    if divisor == 0 {
        return Err(error!(DivisionByZero));
    }
    let remainder = lhs
        .as_i32()?
        .checked_rem(divisor)
        .ok_or_else(|| error!(Overflow))?;
    integral_result(lhs, rhs, remainder)
}

/// `^` is floating point: Double when a Double operand is present,
/// Single otherwise.
pub fn pow(lhs: &Val, rhs: &Val) -> Result<Val, Error> {
    numeric_pair(lhs, rhs)?;
    let result = lhs.as_f64()?.powf(rhs.as_f64()?);
    if !result.is_finite() {
        return Err(error!(Overflow));
    }
    if matches!(lhs, Val::Double(_)) || matches!(rhs, Val::Double(_)) {
        Ok(Val::Double(result))
    } else {
        Ok(Val::Single(result as f32))
    }
}

pub fn neg(val: &Val) -> Result<Val, Error> {
    match val {
        Val::Integer(n) => n
            .checked_neg()
            .map(Val::Integer)
            .ok_or_else(|| error!(Overflow)),
        Val::Long(n) => n
            .checked_neg()
            .map(Val::Long)
            .ok_or_else(|| error!(Overflow)),
        Val::Single(n) => Ok(Val::Single(-n)),
        Val::Double(n) => Ok(Val::Double(-n)),
        _ => Err(error!(TypeMismatch)),
    }
}

pub fn compare(lhs: &Val, rhs: &Val) -> Result<Ordering, Error> {
    if let (Val::String(a), Val::String(b)) = (lhs, rhs) {
        return Ok(a.as_bytes().cmp(b.as_bytes()));
    }
    numeric_pair(lhs, rhs)?;
    lhs.as_f64()?
        .partial_cmp(&rhs.as_f64()?)
        .ok_or_else(|| error!(InternalError))
}

/// Bitwise AND over operands coerced to INTEGER.
pub fn and(lhs: &Val, rhs: &Val) -> Result<Val, Error> {
    numeric_pair(lhs, rhs)?;
    Ok(Val::Integer(lhs.as_i16()? & rhs.as_i16()?))
}

pub fn or(lhs: &Val, rhs: &Val) -> Result<Val, Error> {
    numeric_pair(lhs, rhs)?;
    Ok(Val::Integer(lhs.as_i16()? | rhs.as_i16()?))
}

pub fn not(val: &Val) -> Result<Val, Error> {
    match val {
        Val::Integer(n) => Ok(Val::Integer(!n)),
        _ => Ok(Val::Long(!val.as_i32()?)),
    }
}

/// Integral operations stay INTEGER for INTEGER operands and widen to
/// LONG otherwise.
fn integral_result(lhs: &Val, rhs: &Val, n: i32) -> Result<Val, Error> {
    if let (Val::Integer(_), Val::Integer(_)) = (lhs, rhs) {
        if n >= i32::from(i16::MIN) && n <= i32::from(i16::MAX) {
            return Ok(Val::Integer(n as i16));
        }
    }
    Ok(Val::Long(n))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_follows_coercion_table() {
        assert!(matches!(
            add(&Val::Integer(1), &Val::Integer(2)),
            Ok(Val::Integer(3))
        ));
        assert!(matches!(
            add(&Val::Integer(1), &Val::Long(2)),
            Ok(Val::Long(3))
        ));
        assert!(matches!(
            add(&Val::Long(1), &Val::Single(0.5)),
            Ok(Val::Single(n)) if n == 1.5
        ));
        assert!(matches!(
            add(&Val::Single(1.0), &Val::Double(0.25)),
            Ok(Val::Double(n)) if n == 1.25
        ));
    }

    #[test]
    fn test_integer_overflow() {
        assert!(add(&Val::Integer(32767), &Val::Integer(1)).is_err());
        assert!(matches!(
            add(&Val::Long(32767), &Val::Integer(1)),
            Ok(Val::Long(32768))
        ));
        assert!(mul(&Val::Integer(1000), &Val::Integer(1000)).is_err());
    }

    #[test]
    fn test_string_concat_and_mismatch() {
        assert!(matches!(
            add(&Val::String("AB".into()), &Val::String("CD".into())),
            Ok(Val::String(s)) if &*s == "ABCD"
        ));
        assert!(add(&Val::String("A".into()), &Val::Integer(1)).is_err());
        assert!(sub(&Val::String("A".into()), &Val::String("B".into())).is_err());
    }

    #[test]
    fn test_division_is_floating() {
        assert!(matches!(
            div(&Val::Integer(7), &Val::Integer(2)),
            Ok(Val::Single(n)) if n == 3.5
        ));
        assert!(matches!(
            div(&Val::Double(7.0), &Val::Integer(2)),
            Ok(Val::Double(n)) if n == 3.5
        ));
        assert!(div(&Val::Integer(1), &Val::Integer(0)).is_err());
        assert!(div(&Val::Double(1.0), &Val::Double(0.0)).is_err());
    }

    #[test]
    fn test_idiv_and_mod_round_operands() {
        assert!(matches!(idiv(&Val::Single(7.6), &Val::Integer(2)), Ok(Val::Long(4))));
        assert!(matches!(idiv(&Val::Integer(7), &Val::Integer(2)), Ok(Val::Integer(3))));
        assert!(matches!(modulus(&Val::Integer(7), &Val::Integer(3)), Ok(Val::Integer(1))));
        assert!(matches!(modulus(&Val::Long(7), &Val::Integer(3)), Ok(Val::Long(1))));
        assert!(modulus(&Val::Integer(7), &Val::Integer(0)).is_err());
    }

    #[test]
    fn test_compare_strings_bytewise() {
        assert_eq!(
            compare(&Val::String("ABC".into()), &Val::String("ABD".into())).unwrap(),
            Ordering::Less
        );
        assert_eq!(
            compare(&Val::Integer(2), &Val::Double(2.0)).unwrap(),
            Ordering::Equal
        );
        assert!(compare(&Val::String("A".into()), &Val::Integer(1)).is_err());
    }

    #[test]
    fn test_logic_is_bitwise_integer() {
        assert!(matches!(and(&Val::Integer(6), &Val::Integer(3)), Ok(Val::Integer(2))));
        assert!(matches!(or(&Val::Integer(6), &Val::Integer(3)), Ok(Val::Integer(7))));
        assert!(matches!(and(&Val::Long(6), &Val::Long(3)), Ok(Val::Integer(2))));
        assert!(and(&Val::Long(100_000), &Val::Long(1)).is_err());
        assert!(matches!(not(&Val::Integer(0)), Ok(Val::Integer(-1))));
        assert!(matches!(not(&Val::Integer(-1)), Ok(Val::Integer(0))));
    }

    #[test]
    fn test_pow() {
        assert!(matches!(pow(&Val::Integer(2), &Val::Integer(10)), Ok(Val::Single(n)) if n == 1024.0));
        assert!(matches!(pow(&Val::Double(2.0), &Val::Integer(-1)), Ok(Val::Double(n)) if n == 0.5));
        assert!(pow(&Val::Integer(0), &Val::Integer(-1)).is_err());
    }
}
