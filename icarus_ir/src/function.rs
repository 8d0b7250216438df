//! `Func`: a function's blocks, frame layout, register bookkeeping, and
//! allocation table.

use crate::block::{BasicBlock, BlockId};
use crate::register::{Register, RegisterKind};
use icarus_types::layout::{self, Arch};
use icarus_types::Type;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Index of a function within its owning module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FuncId(pub u32);

/// An append-only, deduplicating interner for the `Type`s an IR function
/// references (`Alloca`, `Bytes`, `Align`, type-constructor operands).
/// Lets the packed buffer carry a compact index instead of an inline,
/// recursively-encoded type.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TypeTable {
    types: Vec<Type>,
}

impl TypeTable {
    pub fn intern(&mut self, ty: Type) -> u32 {
        if let Some(i) = self.types.iter().position(|existing| existing == &ty) {
            return i as u32;
        }
        self.types.push(ty);
        (self.types.len() - 1) as u32
    }

    pub fn get(&self, index: u32) -> &Type {
        &self.types[index as usize]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FuncState {
    Built,
    Executable,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Func {
    pub name: String,
    pub input_types: Vec<Type>,
    pub output_types: Vec<Type>,
    pub blocks: Vec<BasicBlock>,
    pub types: TypeTable,

    pub frame_size: u32,
    pub frame_align: u32,
    next_ordinary: u64,

    /// Byte offset within the frame of every parameter and ordinary
    /// register that has been reserved so far.
    register_offsets: IndexMap<Register, u32>,
    /// The type each such register was reserved at.
    register_types: IndexMap<Register, Type>,
    /// Reverse map from an ordinary register to the instruction that
    /// defines it. Parameter registers have no defining instruction.
    reverse_map: IndexMap<Register, (BlockId, usize)>,
    /// `(register, type)` for every `Alloca` in the function, consulted by
    /// the inliner when merging a callee's stack allocations into a
    /// caller.
    pub allocations: Vec<(Register, Type)>,
    /// Predicate sub-functions checked by an external property analysis;
    /// the core only stores and iterates them.
    pub preconditions: Vec<Func>,

    #[serde(skip, default = "default_state")]
    pub state: FuncState,
}

fn default_state() -> FuncState {
    FuncState::Built
}

impl Func {
    /// Construct a function with a single empty entry block and reserve
    /// parameter registers, aligned to their types, occupying the initial
    /// prefix of the frame.
    pub fn new(name: impl Into<String>, input_types: Vec<Type>, output_types: Vec<Type>, arch: Arch) -> Self {
        let mut func = Func {
            name: name.into(),
            input_types: input_types.clone(),
            output_types,
            blocks: vec![BasicBlock::new()],
            types: TypeTable::default(),
            frame_size: 0,
            frame_align: 1,
            next_ordinary: 0,
            register_offsets: IndexMap::new(),
            register_types: IndexMap::new(),
            reverse_map: IndexMap::new(),
            allocations: Vec::new(),
            preconditions: Vec::new(),
            state: FuncState::Built,
        };
        for (i, ty) in input_types.iter().enumerate() {
            let reg = Register::parameter(i as u32);
            func.place_register(reg, ty, arch);
        }
        func
    }

    fn place_register(&mut self, reg: Register, ty: &Type, arch: Arch) {
        let a = layout::align(ty, arch);
        let offset = layout::move_forward_to_alignment(self.frame_size, a);
        self.frame_size = offset + layout::size(ty, arch);
        self.frame_align = self.frame_align.max(a);
        self.register_offsets.insert(reg, offset);
        self.register_types.insert(reg, ty.clone());
    }

    /// Reserve a fresh ordinary register of type `ty`, advancing the frame
    /// size and aligning its offset to `ty`'s alignment.
    pub fn reserve(&mut self, ty: &Type, arch: Arch) -> Register {
        let reg = Register::ordinary(self.next_ordinary);
        self.next_ordinary += 1;
        self.place_register(reg, ty, arch);
        reg
    }

    /// Record that `reg` (just reserved) is defined by the instruction
    /// about to be appended at `(block, index)`.
    pub fn record_definition(&mut self, reg: Register, block: BlockId, index: usize) {
        if matches!(reg.kind(), RegisterKind::Ordinary(_)) {
            self.reverse_map.insert(reg, (block, index));
        }
    }

    pub fn offset_of(&self, reg: Register) -> Option<u32> {
        self.register_offsets.get(&reg).copied()
    }

    pub fn type_of(&self, reg: Register) -> Option<&Type> {
        self.register_types.get(&reg)
    }

    pub fn defining_site(&self, reg: Register) -> Option<(BlockId, usize)> {
        self.reverse_map.get(&reg).copied()
    }

    /// Number of ordinary registers reserved so far. The inliner uses this
    /// to walk every ordinary register of a callee and reserve a
    /// corresponding fresh slot in the caller (see `inliner`).
    pub fn ordinary_register_count(&self) -> u64 {
        self.next_ordinary
    }

    pub fn entry_block(&self) -> BlockId {
        BlockId(0)
    }

    pub fn block(&self, id: BlockId) -> &BasicBlock {
        &self.blocks[id.0 as usize]
    }

    pub fn block_mut(&mut self, id: BlockId) -> &mut BasicBlock {
        &mut self.blocks[id.0 as usize]
    }

    pub fn add_block(&mut self) -> BlockId {
        self.blocks.push(BasicBlock::new());
        BlockId((self.blocks.len() - 1) as u32)
    }

    /// Every register reservation so far, in reservation order, with its
    /// kind and type. Used by `Func::validate` and by tests asserting the
    /// "no orphan registers, no duplicates" universal invariant.
    pub fn registers(&self) -> impl Iterator<Item = (Register, &Type)> {
        self.register_types.iter().map(|(r, t)| (*r, t))
    }

    /// Pretty-prints every block's structured instructions, one per line,
    /// prefixed with the block id. Meant for `log::trace!`, not for
    /// round-tripping back into IR; callers who need the packed form's own
    /// rendering should use `CmdBuffer`'s `Display` impl instead.
    pub fn dump(&self) -> String {
        use std::fmt::Write as _;
        let mut out = String::new();
        let _ = writeln!(out, "func {} {{", self.name);
        for (i, block) in self.blocks.iter().enumerate() {
            let _ = writeln!(out, "  block{i}:");
            for cmd in &block.instructions {
                let _ = writeln!(out, "    {cmd:?}");
            }
        }
        let _ = write!(out, "}}");
        out
    }

    /// Checks the universal invariant that every ordinary register's
    /// reverse-map entry actually names an instruction that writes it.
    pub fn validate(&self) -> Result<(), crate::error::IrError> {
        for block in &self.blocks {
            if !block.is_terminated() {
                return Err(crate::error::IrError::MissingTerminator);
            }
        }
        for (reg, (block_id, index)) in &self.reverse_map {
            let block = self.block(*block_id);
            match block.instructions.get(*index) {
                Some(cmd) if cmd.dst() == Some(*reg) => {}
                _ => return Err(crate::error::IrError::OrphanRegister(*reg)),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use icarus_types::PrimType;

    #[test]
    fn parameters_occupy_the_aligned_frame_prefix() {
        let func = Func::new(
            "f",
            vec![Type::Primitive(PrimType::I8), Type::Primitive(PrimType::I32)],
            vec![],
            Arch::X86_64,
        );
        assert_eq!(func.offset_of(Register::parameter(0)), Some(0));
        assert_eq!(func.offset_of(Register::parameter(1)), Some(4));
        assert_eq!(func.frame_size, 8);
    }

    #[test]
    fn reserve_assigns_monotonic_ordinary_ids() {
        let mut func = Func::new("f", vec![], vec![], Arch::X86_64);
        let r0 = func.reserve(&Type::Primitive(PrimType::I32), Arch::X86_64);
        let r1 = func.reserve(&Type::Primitive(PrimType::I32), Arch::X86_64);
        assert_eq!(r0, Register::ordinary(0));
        assert_eq!(r1, Register::ordinary(1));
    }
}
