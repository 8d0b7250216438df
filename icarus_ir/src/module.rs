//! A compilation unit: the function table, the process-wide string table,
//! and the process-wide global constants table that `Address::Global`
//! indexes into.

use crate::function::{Func, FuncId};
use icarus_types::Type;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Append-only, content-deduplicating interner for string constants
/// referenced by `Immediate::StringRef`. Backed by `indexmap` so entries
/// keep a stable index as more strings are interned (spec: "String table
/// ... append-only with pointer-stable entries").
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StringTable {
    entries: IndexMap<String, u32>,
}

impl StringTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(&mut self, s: impl Into<String>) -> u32 {
        let s = s.into();
        if let Some(existing) = self.entries.get(&s) {
            return *existing;
        }
        let index = self.entries.len() as u32;
        self.entries.insert(s, index);
        index
    }

    pub fn get(&self, index: u32) -> Option<&str> {
        self.entries.iter().find(|(_, i)| **i == index).map(|(s, _)| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// One compiler-initialized constant, addressable via `Address::Global`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalConstant {
    pub ty: Type,
    pub bytes: Vec<u8>,
}

/// Append-only table of global constants, initialized by the compiler
/// before interpretation begins and read-only once interpretation starts
/// (spec §5: "append-only during compilation and read-only during
/// interpretation; no locking needed").
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GlobalTable {
    entries: Vec<GlobalConstant>,
}

impl GlobalTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, ty: Type, bytes: Vec<u8>) -> u32 {
        let index = self.entries.len() as u32;
        self.entries.push(GlobalConstant { ty, bytes });
        index
    }

    pub fn get(&self, index: u32) -> &GlobalConstant {
        &self.entries[index as usize]
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// A complete compilation unit handed to the interpreter: the functions the
/// elaborator has built, plus the string and global tables they reference.
/// Everything here is in-memory and discarded at process exit (spec §6,
/// Persisted state: "None").
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Module {
    functions: Vec<Func>,
    pub strings: StringTable,
    pub globals: GlobalTable,
}

impl Module {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_function(&mut self, func: Func) -> FuncId {
        let id = FuncId(self.functions.len() as u32);
        self.functions.push(func);
        id
    }

    pub fn function(&self, id: FuncId) -> &Func {
        &self.functions[id.0 as usize]
    }

    pub fn function_mut(&mut self, id: FuncId) -> &mut Func {
        &mut self.functions[id.0 as usize]
    }

    pub fn functions(&self) -> impl Iterator<Item = (FuncId, &Func)> {
        self.functions.iter().enumerate().map(|(i, f)| (FuncId(i as u32), f))
    }

    pub fn function_count(&self) -> usize {
        self.functions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_interning_deduplicates_by_content() {
        let mut table = StringTable::new();
        let a = table.intern("hello");
        let b = table.intern("world");
        let c = table.intern("hello");
        assert_eq!(a, c);
        assert_ne!(a, b);
        assert_eq!(table.get(a), Some("hello"));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn global_table_assigns_sequential_indices() {
        let mut globals = GlobalTable::new();
        let i0 = globals.push(Type::Primitive(icarus_types::PrimType::I32), vec![1, 0, 0, 0]);
        let i1 = globals.push(Type::Primitive(icarus_types::PrimType::I32), vec![2, 0, 0, 0]);
        assert_eq!(i0, 0);
        assert_eq!(i1, 1);
        assert_eq!(globals.get(i1).bytes, vec![2, 0, 0, 0]);
    }

    #[test]
    fn module_assigns_function_ids_in_insertion_order() {
        let mut module = Module::new();
        let f0 = module.add_function(Func::new("a", vec![], vec![], icarus_types::layout::Arch::X86_64));
        let f1 = module.add_function(Func::new("b", vec![], vec![], icarus_types::layout::Arch::X86_64));
        assert_eq!(f0, FuncId(0));
        assert_eq!(f1, FuncId(1));
        assert_eq!(module.function(f0).name, "a");
        assert_eq!(module.function(f1).name, "b");
    }
}
