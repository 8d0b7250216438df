//! Lexical scoping for `Let`/`Var` and the direct-call function table,
//! carried on `EmitContext` across one `emit_ir` traversal.

use icarus_ir::{FuncId, Register};
use icarus_types::Type;
use std::collections::HashMap;

/// Where a `Let`-bound name lives: the stack address produced by its
/// `Alloca`, and the type it was declared at.
#[derive(Debug, Clone)]
pub struct Binding {
    pub addr: Register,
    pub ty: Type,
}

/// A block-structured name scope. Each `Let` pushes a fresh scope for its
/// body and pops it on the way out, so an inner `Let` of the same name
/// shadows rather than clobbers the outer one.
#[derive(Debug, Default)]
pub struct Env {
    scopes: Vec<HashMap<String, Binding>>,
}

impl Env {
    pub fn new() -> Self {
        Env { scopes: vec![HashMap::new()] }
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    pub fn pop_scope(&mut self) {
        self.scopes.pop();
        assert!(!self.scopes.is_empty(), "popped the outermost scope");
    }

    pub fn bind(&mut self, name: impl Into<String>, binding: Binding) {
        self.scopes.last_mut().expect("at least one scope").insert(name.into(), binding);
    }

    pub fn lookup(&self, name: &str) -> Option<&Binding> {
        self.scopes.iter().rev().find_map(|scope| scope.get(name))
    }
}

/// A function callable by name from a `Call` expression: its `FuncId` in
/// whatever `Module` the emitting context is building into, plus the
/// parameter/output types needed to shape the call's argument and
/// out-param packs.
#[derive(Debug, Clone)]
pub struct FunctionSignature {
    pub id: FuncId,
    pub params: Vec<Type>,
    pub outputs: Vec<Type>,
}
