//! An IR `Module`: the translation unit holding functions and globals.

use crate::ir::{FuncId, Function, StructId, Type};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Index of a global variable in a `Module`.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct GlobalId(pub(crate) u32);

impl GlobalId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A module-level global variable.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct Global {
    name: String,
    ty: Type,
}

impl Global {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ty(&self) -> Type {
        self.ty
    }
}

/// A module owns the functions produced for one translation unit.
///
/// Functions for code addresses are created on demand and named
/// `fn_<hex>`; until a `FunctionTranslator` fills one in it stays a
/// declaration. Runtime-support functions (e.g. the register-set diff
/// helper) are declared by name.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Module {
    name: String,
    functions: Vec<Function>,
    by_addr: BTreeMap<u64, FuncId>,
    by_name: BTreeMap<String, FuncId>,
    globals: Vec<Global>,
    global_names: BTreeMap<String, GlobalId>,
    struct_names: Vec<String>,
}

impl Module {
    pub fn new<S: Into<String>>(name: S) -> Module {
        Module {
            name: name.into(),
            functions: Vec::new(),
            by_addr: BTreeMap::new(),
            by_name: BTreeMap::new(),
            globals: Vec::new(),
            global_names: BTreeMap::new(),
            struct_names: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the function translating the code at `addr`, creating an
    /// empty declaration `fn_<hex>` if none exists yet.
    ///
    /// Every address function has the translated-code signature:
    /// `void fn(ptr)`, the single parameter being the register set.
    pub fn get_or_create_function(&mut self, addr: u64) -> FuncId {
        if let Some(id) = self.by_addr.get(&addr) {
            return *id;
        }
        let name = format!("fn_{:x}", addr);
        let mut function = Function::new(name.clone(), vec![Type::Ptr], Type::Void);
        function.set_address(Some(addr));
        let id = FuncId(self.functions.len() as u32);
        self.functions.push(function);
        self.by_addr.insert(addr, id);
        self.by_name.insert(name, id);
        id
    }

    /// Declare (or look up) a runtime-support function by name.
    pub fn declare_function<S: Into<String>>(
        &mut self,
        name: S,
        params: Vec<Type>,
        ret: Type,
    ) -> FuncId {
        let name = name.into();
        if let Some(id) = self.by_name.get(&name) {
            return *id;
        }
        let id = FuncId(self.functions.len() as u32);
        self.functions.push(Function::new(name.clone(), params, ret));
        self.by_name.insert(name, id);
        id
    }

    pub fn function(&self, id: FuncId) -> &Function {
        &self.functions[id.index()]
    }

    pub fn function_mut(&mut self, id: FuncId) -> &mut Function {
        &mut self.functions[id.index()]
    }

    pub fn function_by_address(&self, addr: u64) -> Option<FuncId> {
        self.by_addr.get(&addr).copied()
    }

    pub fn function_by_name(&self, name: &str) -> Option<FuncId> {
        self.by_name.get(name).copied()
    }

    pub fn functions(&self) -> impl Iterator<Item = (FuncId, &Function)> {
        self.functions
            .iter()
            .enumerate()
            .map(|(i, f)| (FuncId(i as u32), f))
    }

    /// Get or create a named global of the given type.
    pub fn get_or_create_global<S: Into<String>>(&mut self, name: S, ty: Type) -> GlobalId {
        let name = name.into();
        if let Some(id) = self.global_names.get(&name) {
            return *id;
        }
        let id = GlobalId(self.globals.len() as u32);
        self.globals.push(Global {
            name: name.clone(),
            ty,
        });
        self.global_names.insert(name, id);
        id
    }

    pub fn global(&self, id: GlobalId) -> &Global {
        &self.globals[id.index()]
    }

    /// Register a named opaque struct type.
    pub fn add_struct_type<S: Into<String>>(&mut self, name: S) -> StructId {
        let id = StructId(self.struct_names.len() as u32);
        self.struct_names.push(name.into());
        id
    }

    pub fn struct_name(&self, id: StructId) -> &str {
        &self.struct_names[id.index()]
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "; module {}", self.name)?;
        for global in &self.globals {
            writeln!(f, "@{} = global {}", global.name(), global.ty())?;
        }
        for function in &self.functions {
            writeln!(f, "{}", function)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn function_identity() {
        let mut module = Module::new("t");
        let a = module.get_or_create_function(0x1000);
        let b = module.get_or_create_function(0x1000);
        assert_eq!(a, b);
        assert_eq!(module.function(a).name(), "fn_1000");
        assert!(module.function(a).is_declaration());
    }

    #[test]
    fn globals() {
        let mut module = Module::new("t");
        let a = module.get_or_create_global("sink", Type::int(64));
        let b = module.get_or_create_global("sink", Type::int(64));
        assert_eq!(a, b);
        assert_eq!(module.global(a).name(), "sink");
    }
}
