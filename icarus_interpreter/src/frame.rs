//! A single activation record: one function's register file plus the
//! bookkeeping `execute_block` needs to resolve phis and release stack
//! allocations on return.

use icarus_ir::{BlockId, Func, Register};

/// One call's worth of interpreter state. The register file is a flat byte
/// buffer sized to `func.frame_size`, indexed by `func.offset_of`; `prev`
/// is consulted by `Phi` to pick the incoming value that matches the block
/// control actually arrived from.
pub struct Frame<'f> {
    pub func: &'f Func,
    pub current: BlockId,
    pub prev: Option<BlockId>,
    pub registers: Vec<u8>,
    /// The process-wide stack arena's length when this frame was entered;
    /// every `Alloca` this frame makes lives above this line, and it is
    /// where the interpreter truncates the stack back to on return.
    pub stack_watermark: u32,
    /// Accumulates `SetReturn`s as they execute, indexed by output slot.
    /// A function can reach its `ReturnJump` from any block, so this has
    /// to live on the frame rather than be collected at the one exit site.
    pub return_values: Vec<Option<Vec<u8>>>,
}

impl<'f> Frame<'f> {
    pub fn new(func: &'f Func, stack_watermark: u32) -> Self {
        Frame {
            func,
            current: func.entry_block(),
            prev: None,
            registers: vec![0u8; func.frame_size as usize],
            stack_watermark,
            return_values: vec![None; func.output_types.len()],
        }
    }

    pub fn read_register(&self, reg: Register, width: u32) -> &[u8] {
        let offset = self
            .func
            .offset_of(reg)
            .unwrap_or_else(|| panic!("{reg} has no frame offset in {}", self.func.name));
        &self.registers[offset as usize..offset as usize + width as usize]
    }

    pub fn write_register(&mut self, reg: Register, bytes: &[u8]) {
        let offset = self
            .func
            .offset_of(reg)
            .unwrap_or_else(|| panic!("{reg} has no frame offset in {}", self.func.name));
        self.registers[offset as usize..offset as usize + bytes.len()].copy_from_slice(bytes);
    }
}
