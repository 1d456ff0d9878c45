use std::rc::Rc;

/// The five elementary types of the dialect.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ElementaryType {
    Integer,
    Long,
    Single,
    Double,
    String,
}

impl ElementaryType {
    pub fn is_numeric(self) -> bool {
        !matches!(self, ElementaryType::String)
    }

    /// The suffix character that forces this type on an identifier.
    pub fn suffix(self) -> char {
        use ElementaryType::*;
        match self {
            Integer => '%',
            Long => '&',
            Single => '!',
            Double => '#',
            String => '$',
        }
    }
}

impl std::fmt::Display for ElementaryType {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        use ElementaryType::*;
        let s = match self {
            Integer => "INTEGER",
            Long => "LONG",
            Single => "SINGLE",
            Double => "DOUBLE",
            String => "STRING",
        };
        write!(f, "{}", s)
    }
}

/// Result type of mixed numeric arithmetic.
///
/// Written as the complete pairwise table rather than a lattice max so
/// each pairing is explicit and individually testable.
pub fn coerce(lhs: ElementaryType, rhs: ElementaryType) -> Option<ElementaryType> {
    use ElementaryType::*;
    match (lhs, rhs) {
        (Integer, Integer) => Some(Integer),
        (Integer, Long) => Some(Long),
        (Integer, Single) => Some(Single),
        (Integer, Double) => Some(Double),
        (Long, Integer) => Some(Long),
        (Long, Long) => Some(Long),
        (Long, Single) => Some(Single),
        (Long, Double) => Some(Double),
        (Single, Integer) => Some(Single),
        (Single, Long) => Some(Single),
        (Single, Single) => Some(Single),
        (Single, Double) => Some(Double),
        (Double, Integer) => Some(Double),
        (Double, Long) => Some(Double),
        (Double, Single) => Some(Double),
        (Double, Double) => Some(Double),
        (String, _) | (_, String) => None,
    }
}

/// A variable or expression type: elementary, array, or user-defined
/// record. Array bounds are inclusive `[min, max]` pairs per dimension.
#[derive(Debug, PartialEq, Clone)]
pub enum DataTypeSpec {
    Elementary(ElementaryType),
    Array {
        elem: Box<DataTypeSpec>,
        dims: Vec<(i64, i64)>,
    },
    Udt {
        name: Rc<str>,
        fields: Vec<(Rc<str>, DataTypeSpec)>,
    },
}

impl DataTypeSpec {
    pub fn elementary(&self) -> Option<ElementaryType> {
        match self {
            DataTypeSpec::Elementary(t) => Some(*t),
            _ => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self.elementary(), Some(t) if t.is_numeric())
    }

    pub fn is_string(&self) -> bool {
        self.elementary() == Some(ElementaryType::String)
    }

    pub fn is_array(&self) -> bool {
        matches!(self, DataTypeSpec::Array { .. })
    }

    pub fn is_udt(&self) -> bool {
        matches!(self, DataTypeSpec::Udt { .. })
    }

    /// Any non-array type.
    pub fn is_singular(&self) -> bool {
        !self.is_array()
    }

    /// Assignment/SWAP compatibility: numeric-to-numeric with implicit
    /// coercion, exact string match, or structurally identical
    /// UDT specs. Arrays are never assignable as a whole.
    pub fn assignable_from(&self, other: &DataTypeSpec) -> bool {
        match (self, other) {
            (DataTypeSpec::Elementary(l), DataTypeSpec::Elementary(r)) => {
                (l.is_numeric() && r.is_numeric()) || l == r
            }
            (DataTypeSpec::Udt { name: l, .. }, DataTypeSpec::Udt { name: r, .. }) => l == r,
            _ => false,
        }
    }

    /// Comparison compatibility: both numeric or both string.
    pub fn comparable_with(&self, other: &DataTypeSpec) -> bool {
        (self.is_numeric() && other.is_numeric()) || (self.is_string() && other.is_string())
    }
}

impl std::fmt::Display for DataTypeSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            DataTypeSpec::Elementary(t) => write!(f, "{}", t),
            DataTypeSpec::Array { elem, dims } => {
                write!(f, "{}(", elem)?;
                for (i, (min, max)) in dims.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{} TO {}", min, max)?;
                }
                write!(f, ")")
            }
            DataTypeSpec::Udt { name, .. } => write!(f, "{}", name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ElementaryType::*;
    use super::*;

    #[test]
    fn test_coercion_table() {
        // All sixteen numeric pairs.
        let table = [
            (Integer, Integer, Integer),
            (Integer, Long, Long),
            (Integer, Single, Single),
            (Integer, Double, Double),
            (Long, Integer, Long),
            (Long, Long, Long),
            (Long, Single, Single),
            (Long, Double, Double),
            (Single, Integer, Single),
            (Single, Long, Single),
            (Single, Single, Single),
            (Single, Double, Double),
            (Double, Integer, Double),
            (Double, Long, Double),
            (Double, Single, Double),
            (Double, Double, Double),
        ];
        for (lhs, rhs, result) in table.iter() {
            assert_eq!(coerce(*lhs, *rhs), Some(*result), "{} op {}", lhs, rhs);
        }
        assert_eq!(coerce(String, Integer), None);
        assert_eq!(coerce(Single, String), None);
    }

    #[test]
    fn test_assignability() {
        let int = DataTypeSpec::Elementary(Integer);
        let dbl = DataTypeSpec::Elementary(Double);
        let string = DataTypeSpec::Elementary(String);
        assert!(int.assignable_from(&dbl));
        assert!(string.assignable_from(&string));
        assert!(!string.assignable_from(&int));
        let arr = DataTypeSpec::Array {
            elem: Box::new(int.clone()),
            dims: vec![(0, 10)],
        };
        assert!(!arr.assignable_from(&arr));
    }
}
