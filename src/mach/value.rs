//! Runtime values and storage cells.

use crate::error;
use crate::lang::{DataTypeSpec, ElementaryType, Error};
use std::cell::RefCell;
use std::rc::Rc;

/// A runtime value. Scalars are owned; arrays and records are shared
/// handles so that by-reference argument passing and SWAP observe one
/// underlying object.
#[derive(Debug, Clone)]
pub enum Val {
    Integer(i16),
    Long(i32),
    Single(f32),
    Double(f64),
    String(Rc<str>),
    Array(Rc<RefCell<Array>>),
    Record(Rc<RefCell<Record>>),
}

impl Val {
    /// The zero value for a declared type. Arrays are materialized with
    /// every element defaulted; records default each field recursively.
    pub fn default_for(spec: &DataTypeSpec) -> Val {
        match spec {
            DataTypeSpec::Elementary(t) => match t {
                ElementaryType::Integer => Val::Integer(0),
                ElementaryType::Long => Val::Long(0),
                ElementaryType::Single => Val::Single(0.0),
                ElementaryType::Double => Val::Double(0.0),
                ElementaryType::String => Val::String("".into()),
            },
            DataTypeSpec::Array { elem, dims } => {
                Val::Array(Rc::new(RefCell::new(Array::new(elem, dims.clone()))))
            }
            DataTypeSpec::Udt { name, fields } => {
                Val::Record(Rc::new(RefCell::new(Record::new(name, fields))))
            }
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            Val::Integer(_) | Val::Long(_) | Val::Single(_) | Val::Double(_)
        )
    }

    /// Condition truth: any nonzero number.
    pub fn is_true(&self) -> bool {
        match self {
            Val::Integer(n) => *n != 0,
            Val::Long(n) => *n != 0,
            Val::Single(n) => *n != 0.0,
            Val::Double(n) => *n != 0.0,
            _ => false,
        }
    }

    pub fn from_bool(b: bool) -> Val {
        Val::Integer(if b { -1 } else { 0 })
    }

    pub fn as_f64(&self) -> Result<f64, Error> {
        match self {
            Val::Integer(n) => Ok(f64::from(*n)),
            Val::Long(n) => Ok(f64::from(*n)),
            Val::Single(n) => Ok(f64::from(*n)),
            Val::Double(n) => Ok(*n),
            _ => Err(error!(TypeMismatch)),
        }
    }

    pub fn as_string(&self) -> Result<Rc<str>, Error> {
        match self {
            Val::String(s) => Ok(s.clone()),
            _ => Err(error!(TypeMismatch)),
        }
    }

    /// Rounded integral value; rejects non-numerics and out-of-range.
    pub fn as_i32(&self) -> Result<i32, Error> {
        let n = round_half_even(self.as_f64()?);
        if n < f64::from(i32::MIN) || n > f64::from(i32::MAX) {
            return Err(error!(Overflow));
        }
        Ok(n as i32)
    }

    pub fn as_i16(&self) -> Result<i16, Error> {
        let n = self.as_i32()?;
        if n < i32::from(i16::MIN) || n > i32::from(i16::MAX) {
            return Err(error!(Overflow));
        }
        Ok(n as i16)
    }

    pub fn as_i64(&self) -> Result<i64, Error> {
        Ok(i64::from(self.as_i32()?))
    }

    /// Convert to the storage representation of an elementary type,
    /// rounding and range-checking integral targets.
    pub fn cast_to(&self, target: ElementaryType) -> Result<Val, Error> {
        match target {
            ElementaryType::Integer => Ok(Val::Integer(self.as_i16()?)),
            ElementaryType::Long => Ok(Val::Long(self.as_i32()?)),
            ElementaryType::Single => Ok(Val::Single(self.as_f64()? as f32)),
            ElementaryType::Double => Ok(Val::Double(self.as_f64()?)),
            ElementaryType::String => Ok(Val::String(self.as_string()?)),
        }
    }

    /// Value copy for assignment: scalars copy, arrays and records are
    /// duplicated element by element so the copy shares no storage with
    /// the source.
    pub fn clone_deep(&self) -> Val {
        match self {
            Val::Array(handle) => {
                let array = handle.borrow();
                let vals = array.vals.iter().map(Val::clone_deep).collect();
                Val::Array(Rc::new(RefCell::new(Array {
                    elem: array.elem.clone(),
                    dims: array.dims.clone(),
                    vals,
                })))
            }
            Val::Record(handle) => {
                let record = handle.borrow();
                let fields = record
                    .fields
                    .iter()
                    .map(|(name, val)| (name.clone(), val.clone_deep()))
                    .collect();
                Val::Record(Rc::new(RefCell::new(Record {
                    type_name: record.type_name.clone(),
                    fields,
                })))
            }
            _ => self.clone(),
        }
    }
}

impl PartialEq for Val {
    /// Structural equality over scalars; shared handles never compare
    /// equal. Used for comparing compiled code, not by the language's
    /// own `=` operator.
    fn eq(&self, other: &Val) -> bool {
        match (self, other) {
            (Val::Integer(a), Val::Integer(b)) => a == b,
            (Val::Long(a), Val::Long(b)) => a == b,
            (Val::Single(a), Val::Single(b)) => a == b,
            (Val::Double(a), Val::Double(b)) => a == b,
            (Val::String(a), Val::String(b)) => a == b,
            _ => false,
        }
    }
}

/// QBasic-style rounding: halfway cases go to the even neighbor.
pub fn round_half_even(n: f64) -> f64 {
    let floor = n.floor();
    let frac = n - floor;
    if frac > 0.5 {
        floor + 1.0
    } else if frac < 0.5 {
        floor
    } else if (floor as i64) % 2 == 0 {
        floor
    } else {
        floor + 1.0
    }
}

/// Minimal numeric print form: integral values render without a
/// decimal point, others with however many digits they need.
pub fn format_number(n: f64) -> String {
    if n == n.trunc() && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

impl std::fmt::Display for Val {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Val::Integer(n) => write!(f, "{}", n),
            Val::Long(n) => write!(f, "{}", n),
            // Rust's float Display is shortest-roundtrip and never
            // prints a trailing ".0", which matches the minimal form.
            Val::Single(n) => write!(f, "{}", n),
            Val::Double(n) => write!(f, "{}", n),
            Val::String(s) => write!(f, "{}", s),
            Val::Array(_) => write!(f, "ARRAY"),
            Val::Record(handle) => write!(f, "{}", handle.borrow().type_name),
        }
    }
}

/// Flat storage for a multi-dimensional array. Later dimensions vary
/// fastest; each access translates per-dimension against the declared
/// inclusive bounds.
#[derive(Debug)]
pub struct Array {
    pub elem: DataTypeSpec,
    pub dims: Vec<(i64, i64)>,
    pub vals: Vec<Val>,
}

impl Array {
    pub fn new(elem: &DataTypeSpec, dims: Vec<(i64, i64)>) -> Array {
        let len = dims
            .iter()
            .map(|(min, max)| (max - min + 1).max(0) as usize)
            .product();
        let vals = (0..len).map(|_| Val::default_for(elem)).collect();
        Array {
            elem: elem.clone(),
            dims,
            vals,
        }
    }

    /// Flat offset of a subscript, or SUBSCRIPT OUT OF RANGE.
    pub fn get_idx(&self, indices: &[i64]) -> Result<usize, Error> {
        if indices.len() != self.dims.len() {
            return Err(error!(SubscriptOutOfRange));
        }
        let mut idx = 0usize;
        for (i, (min, max)) in indices.iter().zip(self.dims.iter()) {
            if i < min || i > max {
                return Err(error!(SubscriptOutOfRange));
            }
            let extent = (max - min + 1) as usize;
            idx = idx * extent + (i - min) as usize;
        }
        Ok(idx)
    }
}

/// A user-defined-type instance with fields in declaration order.
#[derive(Debug)]
pub struct Record {
    pub type_name: Rc<str>,
    pub fields: Vec<(Rc<str>, Val)>,
}

impl Record {
    pub fn new(type_name: &Rc<str>, fields: &[(Rc<str>, DataTypeSpec)]) -> Record {
        Record {
            type_name: type_name.clone(),
            fields: fields
                .iter()
                .map(|(name, spec)| (name.clone(), Val::default_for(spec)))
                .collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<Val> {
        self.fields
            .iter()
            .find(|(n, _)| &**n == name)
            .map(|(_, v)| v.clone())
    }

    pub fn set(&mut self, name: &str, val: Val) -> Result<(), Error> {
        match self.fields.iter_mut().find(|(n, _)| &**n == name) {
            Some((_, slot)) => {
                *slot = val;
                Ok(())
            }
            None => Err(error!(InternalError; format!("NO FIELD {}", name))),
        }
    }
}

/// A settable storage location: a variable cell, one array element, or
/// one record field. This is what by-reference arguments and READ/INPUT
/// targets resolve to.
#[derive(Debug, Clone)]
pub enum Ptr {
    Var(Rc<RefCell<Val>>),
    Elem(Rc<RefCell<Array>>, usize),
    Field(Rc<RefCell<Record>>, Rc<str>),
}

impl Ptr {
    pub fn get(&self) -> Result<Val, Error> {
        match self {
            Ptr::Var(cell) => Ok(cell.borrow().clone()),
            Ptr::Elem(array, idx) => array
                .borrow()
                .vals
                .get(*idx)
                .cloned()
                .ok_or_else(|| error!(SubscriptOutOfRange)),
            Ptr::Field(record, name) => record
                .borrow()
                .get(name)
                .ok_or_else(|| error!(InternalError; format!("NO FIELD {}", name))),
        }
    }

    pub fn set(&self, val: Val) -> Result<(), Error> {
        match self {
            Ptr::Var(cell) => {
                *cell.borrow_mut() = val;
                Ok(())
            }
            Ptr::Elem(array, idx) => {
                let mut array = array.borrow_mut();
                match array.vals.get_mut(*idx) {
                    Some(slot) => {
                        *slot = val;
                        Ok(())
                    }
                    None => Err(error!(SubscriptOutOfRange)),
                }
            }
            Ptr::Field(record, name) => record.borrow_mut().set(name, val),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lang::DataTypeSpec::Elementary;
    use crate::lang::ElementaryType::*;

    #[test]
    fn test_array_flat_offsets() {
        let array = Array::new(&Elementary(Integer), vec![(0, 5)]);
        assert_eq!(array.vals.len(), 6);
        assert_eq!(array.get_idx(&[0]).unwrap(), 0);
        assert_eq!(array.get_idx(&[5]).unwrap(), 5);
        assert!(array.get_idx(&[6]).is_err());
        assert!(array.get_idx(&[-1]).is_err());

        let array = Array::new(&Elementary(Integer), vec![(1, 3), (0, 2)]);
        assert_eq!(array.vals.len(), 9);
        assert_eq!(array.get_idx(&[1, 0]).unwrap(), 0);
        assert_eq!(array.get_idx(&[1, 2]).unwrap(), 2);
        assert_eq!(array.get_idx(&[2, 0]).unwrap(), 3);
        assert_eq!(array.get_idx(&[3, 2]).unwrap(), 8);
        assert!(array.get_idx(&[3]).is_err());
    }

    #[test]
    fn test_record_deep_clone_is_independent() {
        let spec = vec![
            (Rc::from("X"), Elementary(Single)),
            (Rc::from("Y"), Elementary(Single)),
        ];
        let original = Val::Record(Rc::new(RefCell::new(Record::new(&Rc::from("POINT"), &spec))));
        let copy = original.clone_deep();
        if let (Val::Record(a), Val::Record(b)) = (&original, &copy) {
            a.borrow_mut().set("X", Val::Single(9.0)).unwrap();
            assert!(matches!(b.borrow().get("X"), Some(Val::Single(n)) if n == 0.0));
        } else {
            panic!("not records");
        }
    }

    #[test]
    fn test_round_half_even() {
        assert_eq!(round_half_even(0.5), 0.0);
        assert_eq!(round_half_even(1.5), 2.0);
        assert_eq!(round_half_even(2.5), 2.0);
        assert_eq!(round_half_even(-0.5), 0.0);
        assert_eq!(round_half_even(-1.5), -2.0);
        assert_eq!(round_half_even(1.4), 1.0);
        assert_eq!(round_half_even(1.6), 2.0);
    }

    #[test]
    fn test_cast_overflow() {
        assert!(Val::Double(40000.0).cast_to(Integer).is_err());
        assert!(matches!(
            Val::Double(40000.0).cast_to(Long),
            Ok(Val::Long(40000))
        ));
        assert!(Val::String("A".into()).cast_to(Double).is_err());
    }

    #[test]
    fn test_number_formatting() {
        assert_eq!(Val::Double(3.0).to_string(), "3");
        assert_eq!(Val::Double(1.5).to_string(), "1.5");
        assert_eq!(Val::Single(-2.5).to_string(), "-2.5");
        assert_eq!(Val::Integer(7).to_string(), "7");
    }

    #[test]
    fn test_ptr_elem_set_get() {
        let array = Rc::new(RefCell::new(Array::new(&Elementary(Long), vec![(0, 2)])));
        let ptr = Ptr::Elem(array.clone(), 1);
        ptr.set(Val::Long(42)).unwrap();
        assert!(matches!(ptr.get(), Ok(Val::Long(42))));
        assert!(matches!(array.borrow().vals[1], Val::Long(42)));
    }
}
