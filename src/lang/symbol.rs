use super::{DataTypeSpec, Error, Loc};
use std::collections::BTreeMap;
use std::rc::Rc;

/// How a variable's storage behaves.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum StorageKind {
    Var,
    Const,
    StaticVar,
    Arg,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum SymbolScope {
    Local,
    Global,
}

#[derive(Debug, Clone)]
pub struct VarSymbol {
    pub name: Rc<str>,
    pub spec: DataTypeSpec,
    pub storage: StorageKind,
    pub scope: SymbolScope,
}

/// Name-keyed ordered symbol map. Within one table a name denotes at
/// most one symbol.
#[derive(Debug, Default, Clone)]
pub struct SymbolTable {
    symbols: BTreeMap<Rc<str>, VarSymbol>,
}

impl SymbolTable {
    pub fn new() -> SymbolTable {
        SymbolTable::default()
    }

    pub fn lookup(&self, name: &str) -> Option<&VarSymbol> {
        self.symbols.get(name)
    }

    pub fn insert(&mut self, symbol: VarSymbol, loc: Loc) -> Result<(), Error> {
        if self.symbols.contains_key(&symbol.name) {
            return Err(error!(DuplicateDefinition, loc; format!("{}", symbol.name)));
        }
        self.symbols.insert(symbol.name.clone(), symbol);
        Ok(())
    }

    /// SHARED promotion: an existing module-level LOCAL symbol becomes
    /// GLOBAL when the declared spec matches the existing one.
    pub fn promote_to_global(
        &mut self,
        name: &Rc<str>,
        spec: &DataTypeSpec,
        loc: Loc,
    ) -> Result<(), Error> {
        match self.symbols.get_mut(name) {
            Some(symbol) => {
                if &symbol.spec != spec {
                    return Err(error!(DuplicateDefinition, loc;
                        format!("{} ALREADY DECLARED AS {}", name, symbol.spec)));
                }
                symbol.scope = SymbolScope::Global;
                Ok(())
            }
            None => Err(error!(InternalError, loc; "PROMOTION OF UNDECLARED SYMBOL")),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &VarSymbol> {
        self.symbols.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lang::ElementaryType;

    fn symbol(name: &str, spec: DataTypeSpec) -> VarSymbol {
        VarSymbol {
            name: name.into(),
            spec,
            storage: StorageKind::Var,
            scope: SymbolScope::Local,
        }
    }

    #[test]
    fn test_duplicate_rejected() {
        let int = DataTypeSpec::Elementary(ElementaryType::Integer);
        let mut table = SymbolTable::new();
        table.insert(symbol("A", int.clone()), Loc::new(1, 1)).unwrap();
        assert!(table.insert(symbol("A", int), Loc::new(2, 1)).is_err());
    }

    #[test]
    fn test_shared_promotion_requires_matching_spec() {
        let int = DataTypeSpec::Elementary(ElementaryType::Integer);
        let dbl = DataTypeSpec::Elementary(ElementaryType::Double);
        let mut table = SymbolTable::new();
        let name: Rc<str> = "A".into();
        table.insert(symbol("A", int.clone()), Loc::new(1, 1)).unwrap();
        assert!(table.promote_to_global(&name, &dbl, Loc::new(2, 1)).is_err());
        table.promote_to_global(&name, &int, Loc::new(3, 1)).unwrap();
        assert_eq!(table.lookup("A").unwrap().scope, SymbolScope::Global);
    }
}
