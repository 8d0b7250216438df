//! Basic blocks: an ordered sequence of non-branching instructions
//! followed by exactly one terminator, plus the append-only side tables
//! that back call-argument packs, out-parameter packs, phi-argument
//! tables, and type-constructor operand packs.

use crate::cmd::{Cmd, CmdBuffer, OutDest};
use crate::operand::Operand;
use serde::{Deserialize, Serialize};

/// Index of a block within its owning function's block list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockId(pub u32);

impl std::fmt::Display for BlockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "block{}", self.0)
    }
}

/// One of a block's phi nodes' incoming-value table: pairs of (incoming
/// block, value), exactly one of which must match `Frame::prev` at
/// execution time.
pub type PhiTable = Vec<(BlockId, Operand)>;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BasicBlock {
    pub instructions: Vec<Cmd>,
    pub buffer: CmdBuffer,

    /// Backing storage for phi-argument tables referenced by index from
    /// `Cmd::Phi::table`. Index-addressed rather than pointer-stable (see
    /// DESIGN.md), append-only.
    pub phi_tables: Vec<PhiTable>,
    /// Backing storage for call argument packs referenced by
    /// `Cmd::Call::args`.
    pub call_arg_packs: Vec<Vec<Operand>>,
    /// Backing storage for call out-parameter packs referenced by
    /// `Cmd::Call::out_params`.
    pub out_param_packs: Vec<Vec<OutDest>>,
    /// Backing storage for type-constructor operand packs referenced by
    /// `Cmd::TypeCtor::args`.
    pub type_ctor_packs: Vec<Vec<Operand>>,
}

impl BasicBlock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_terminated(&self) -> bool {
        self.instructions.last().is_some_and(Cmd::is_terminator)
    }

    /// Append `cmd` to both the structured and packed forms. Panics if the
    /// block is already terminated: appending after a terminator is a
    /// programmer error in the builder, not a recoverable user error (spec
    /// ref: Builder API error conditions).
    pub fn push(&mut self, cmd: Cmd) {
        assert!(!self.is_terminated(), "cannot append {cmd:?} after a block's terminator");
        self.buffer.append(&cmd);
        self.instructions.push(cmd);
    }

    pub fn push_phi_table(&mut self, table: PhiTable) -> u32 {
        self.phi_tables.push(table);
        (self.phi_tables.len() - 1) as u32
    }

    pub fn push_call_args(&mut self, args: Vec<Operand>) -> u32 {
        self.call_arg_packs.push(args);
        (self.call_arg_packs.len() - 1) as u32
    }

    pub fn push_out_params(&mut self, out_params: Vec<OutDest>) -> u32 {
        self.out_param_packs.push(out_params);
        (self.out_param_packs.len() - 1) as u32
    }

    pub fn push_type_ctor_args(&mut self, args: Vec<Operand>) -> u32 {
        self.type_ctor_packs.push(args);
        (self.type_ctor_packs.len() - 1) as u32
    }

    /// Block indices this block can transfer control to. Computed lazily
    /// from the terminator rather than stored, per the spec's "successors
    /// compute this lazily" note.
    pub fn successors(&self) -> Vec<BlockId> {
        match self.instructions.last() {
            Some(Cmd::UncondJump { target }) => vec![*target],
            Some(Cmd::CondJump { if_true, if_false, .. }) => vec![*if_true, *if_false],
            Some(Cmd::ReturnJump) | None => Vec::new(),
            Some(_) => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_block_is_not_terminated() {
        assert!(!BasicBlock::new().is_terminated());
    }

    #[test]
    #[should_panic(expected = "cannot append")]
    fn pushing_after_a_terminator_panics() {
        let mut block = BasicBlock::new();
        block.push(Cmd::ReturnJump);
        block.push(Cmd::ReturnJump);
    }

    #[test]
    fn successors_reflect_the_terminator() {
        let mut block = BasicBlock::new();
        block.push(Cmd::UncondJump { target: BlockId(3) });
        assert_eq!(block.successors(), vec![BlockId(3)]);
    }
}
