//! The register-based bytecode interpreter: one function call at a time,
//! reading each block's packed `CmdBuffer` while consulting the structured
//! form only to recover a real span for a fault (see `Cmd::span`).
//!
//! Foreign calls (`interp::call_foreign`) and type-constructor handles
//! (`interp::exec_type_ctor`) are implemented here, at the paths
//! `icarus_ir::cmd::CallTarget::Foreign` and `icarus_ir::opcode::TypeCtorKind`
//! already name in their own doc comments.

use crate::arena::Arena;
use crate::error::{InterpreterError, Result};
use crate::frame::Frame;
use crate::scalar::{self, Scalar};
use icarus_ir::{
    Address, ArithOp, BasicBlock, BitOp, CallTarget, Cmd, CmpOp, Func, FuncId, Immediate, Module,
    Operand, OutDest, Register,
};
use icarus_support::Span;
use icarus_types::layout::{self, Arch};
use icarus_types::{PrimType, Type};

const DEFAULT_STACK_CAPACITY: usize = 1 << 20;

enum BlockOutcome {
    Jump(icarus_ir::BlockId),
    Return,
}

/// One interpretation session over a `Module`. Owns the stack and heap
/// arenas and the monotonic type-handle counter; a single `Interpreter` can
/// run any number of top-level `execute` calls against the same module.
pub struct Interpreter<'m> {
    arch: Arch,
    module: &'m Module,
    stack: Arena,
    heap: Arena,
    stack_limit: u32,
    step_limit: Option<u64>,
    step_count: u64,
    next_type_handle: u32,
    output: Vec<String>,
}

impl<'m> Interpreter<'m> {
    pub fn new(arch: Arch, module: &'m Module) -> Self {
        Self::with_stack_capacity(arch, module, DEFAULT_STACK_CAPACITY)
    }

    pub fn with_stack_capacity(arch: Arch, module: &'m Module, capacity: usize) -> Self {
        Interpreter {
            arch,
            module,
            stack: Arena::with_capacity(capacity),
            heap: Arena::default(),
            stack_limit: capacity as u32,
            step_limit: None,
            step_count: 0,
            next_type_handle: 0,
            output: Vec::new(),
        }
    }

    pub fn with_step_limit(mut self, limit: u64) -> Self {
        self.step_limit = Some(limit);
        self
    }

    pub fn arch(&self) -> Arch {
        self.arch
    }

    pub fn output(&self) -> &[String] {
        &self.output
    }

    pub fn take_output(&mut self) -> Vec<String> {
        std::mem::take(&mut self.output)
    }

    pub fn heap_alloc(&mut self, size: u32, align: u32) -> u32 {
        self.heap.alloc(size, align)
    }

    pub fn write_heap(&mut self, offset: u32, bytes: &[u8]) {
        self.heap.write(offset, bytes).expect("heap_alloc'd region");
    }

    pub fn read_heap(&self, offset: u32, len: u32) -> Option<&[u8]> {
        self.heap.read(offset, len)
    }

    /// Runs `func` to completion with `args[i]` the exact bytes of parameter
    /// `i` and `rets[i]` the address `func`'s output `i` is written to.
    pub fn execute(&mut self, func: &Func, args: &[Vec<u8>], rets: &[Address]) -> Result<()> {
        debug_assert_eq!(args.len(), func.input_types.len());
        debug_assert_eq!(rets.len(), func.output_types.len());

        let watermark = self.stack.len();
        let mut frame = Frame::new(func, watermark);
        for (i, bytes) in args.iter().enumerate() {
            frame.write_register(Register::parameter(i as u32), bytes);
        }

        loop {
            match self.execute_block(&mut frame)? {
                BlockOutcome::Jump(next) => {
                    frame.prev = Some(frame.current);
                    frame.current = next;
                }
                BlockOutcome::Return => break,
            }
        }

        for (i, addr) in rets.iter().enumerate() {
            let ty = &func.output_types[i];
            let width = layout::size(ty, self.arch);
            let bytes = frame.return_values[i].clone().unwrap_or_else(|| vec![0u8; width as usize]);
            self.write_bytes(*addr, &bytes, Span::synthetic())?;
        }

        self.stack.truncate(frame.stack_watermark);
        Ok(())
    }

    /// Checks every precondition sub-function attached to `func`, short
    /// circuiting on the first one that returns `false`. Each precondition
    /// is itself a nullary-output-aside `Func` over the same arguments.
    pub fn check_preconditions(&mut self, func: &Func, args: &[Vec<u8>]) -> Result<bool> {
        for precondition in &func.preconditions {
            let offset = self.stack_alloc(1, 1)?;
            let addr = Address::Stack(offset);
            self.execute(precondition, args, std::slice::from_ref(&addr))?;
            let byte = self.stack.read(offset, 1).expect("just written")[0];
            self.stack.truncate(offset);
            if byte == 0 {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn execute_block(&mut self, frame: &mut Frame) -> Result<BlockOutcome> {
        let block: &BasicBlock = frame.func.block(frame.current);
        let mut cursor = block.buffer.cursor();
        let mut index = 0usize;
        loop {
            self.step_count += 1;
            if let Some(limit) = self.step_limit {
                if self.step_count > limit {
                    return Err(InterpreterError::StepLimitExceeded);
                }
            }
            let cmd = cursor
                .read_next()
                .ok_or_else(|| InterpreterError::Malformed {
                    reason: format!("{} fell off the end of its buffer without a terminator", frame.current),
                })?;
            let span = block.instructions.get(index).map(Cmd::span).unwrap_or_else(Span::synthetic);
            index += 1;
            log::trace!("{}/{}: {:?}", frame.func.name, frame.current, cmd);

            match cmd {
                Cmd::UncondJump { target } => return Ok(BlockOutcome::Jump(target)),
                Cmd::CondJump { cond, if_true, if_false } => {
                    let taken = self.read_operand_scalar(frame, cond, PrimType::Bool).as_bool();
                    return Ok(BlockOutcome::Jump(if taken { if_true } else { if_false }));
                }
                Cmd::ReturnJump => return Ok(BlockOutcome::Return),
                other => self.exec_one(frame, block, other, span)?,
            }
        }
    }

    fn exec_one(&mut self, frame: &mut Frame, block: &BasicBlock, cmd: Cmd, span: Span) -> Result<()> {
        match cmd {
            Cmd::Arith { op, prim, lhs, rhs, dst, .. } => {
                let l = self.read_operand_scalar(frame, lhs, prim);
                let r = self.read_operand_scalar(frame, rhs, prim);
                let result = eval_arith(op, prim, l, r, span)?;
                self.write_scalar_to_dst(frame, dst, prim, result);
            }
            Cmd::Cmp { op, prim, lhs, rhs, dst, .. } => {
                let l = self.read_operand_scalar(frame, lhs, prim);
                let r = self.read_operand_scalar(frame, rhs, prim);
                let result = eval_cmp(op, prim, l, r);
                self.write_scalar_to_dst(frame, dst, PrimType::Bool, Scalar::Bool(result));
            }
            Cmd::Not { value, dst, .. } => {
                let v = self.read_operand_scalar(frame, value, PrimType::Bool).as_bool();
                self.write_scalar_to_dst(frame, dst, PrimType::Bool, Scalar::Bool(!v));
            }
            Cmd::Bit { op, lhs, rhs, dst, .. } => {
                // `Builder::bit` always reserves a one-byte boolean dst, even
                // on the unfolded path; integer bitwise only ever survives to
                // a runtime `Cmd::Bit` by folding to an immediate first.
                let l = self.read_operand_scalar(frame, lhs, PrimType::Bool).as_bool();
                let r = self.read_operand_scalar(frame, rhs, PrimType::Bool).as_bool();
                let result = match op {
                    BitOp::And => l && r,
                    BitOp::Or => l || r,
                    BitOp::Xor => l ^ r,
                };
                self.write_scalar_to_dst(frame, dst, PrimType::Bool, Scalar::Bool(result));
            }

            Cmd::Alloca { type_index, dst, .. } => {
                let ty = frame.func.types.get(type_index).clone();
                let size = layout::size(&ty, self.arch);
                let align = layout::align(&ty, self.arch);
                let offset = self.stack_alloc(size, align)?;
                self.write_addr_to_dst(frame, dst, Address::Stack(offset));
            }
            Cmd::Load { prim, addr, dst, .. } => {
                let address = self.read_operand_addr(frame, addr);
                let width = layout::size(&Type::Primitive(prim), self.arch);
                let bytes = self.read_bytes(address, width, span)?;
                let value = scalar::read(&bytes, prim);
                self.write_scalar_to_dst(frame, dst, prim, value);
            }
            Cmd::Store { prim, addr, value, .. } => {
                let address = self.read_operand_addr(frame, addr);
                let v = self.read_operand_scalar(frame, value, prim);
                let bytes = scalar::write(prim, v);
                self.write_bytes(address, &bytes, span)?;
            }
            Cmd::PtrIncr { ptr, count, stride, dst, .. } => {
                let base = self.read_operand_addr(frame, ptr);
                let n = self.read_operand_index(frame, count);
                let result = base.offset_by(n * stride as i64);
                self.write_addr_to_dst(frame, dst, result);
            }
            Cmd::Field { base, offset, dst, .. } => {
                let base_addr = self.read_operand_addr(frame, base);
                let result = base_addr.offset_by(offset as i64);
                self.write_addr_to_dst(frame, dst, result);
            }
            Cmd::VariantType { ptr, dst, .. } => {
                let address = self.read_operand_addr(frame, ptr);
                let width = self.arch.pointer_size();
                let bytes = self.read_bytes(address, width, span)?;
                let tag = read_word_le(&bytes);
                self.write_scalar_to_dst(frame, dst, PrimType::U64, Scalar::U(tag));
            }
            Cmd::VariantValue { ptr, payload_offset, dst, .. } => {
                let address = self.read_operand_addr(frame, ptr);
                let result = address.offset_by(payload_offset as i64);
                self.write_addr_to_dst(frame, dst, result);
            }
            Cmd::ArrayLength { ptr, dst, .. } => {
                let address = self.read_operand_addr(frame, ptr);
                let bytes = self.read_bytes(address, 4, span)?;
                let len = u32::from_le_bytes(bytes.try_into().unwrap());
                self.write_scalar_to_dst(frame, dst, PrimType::U32, Scalar::U(len as u64));
            }
            Cmd::ArrayData { ptr, dst, .. } => {
                let address = self.read_operand_addr(frame, ptr);
                let ptr_offset = layout::move_forward_to_alignment(4, self.arch.pointer_size());
                let result = address.offset_by(ptr_offset as i64);
                self.write_addr_to_dst(frame, dst, result);
            }

            Cmd::TypeCtor { dst, .. } => {
                let handle = self.next_type_handle;
                self.next_type_handle += 1;
                self.write_scalar_to_dst(frame, dst, PrimType::U32, Scalar::U(handle as u64));
            }

            Cmd::Phi { table, dst, .. } => {
                let prev = frame.prev.expect("a phi executed with no recorded predecessor");
                let entries = &block.phi_tables[table as usize];
                let value = entries
                    .iter()
                    .find(|(from, _)| *from == prev)
                    .map(|(_, op)| *op)
                    .unwrap_or_else(|| panic!("phi table has no entry for predecessor {prev}"));
                let ty = frame.func.type_of(dst).cloned().unwrap_or(Type::Primitive(PrimType::U64));
                let bytes = self.encode_operand_bytes(frame, &ty, value);
                frame.write_register(dst, &bytes);
            }

            Cmd::Call { target, args, out_params, .. } => {
                self.exec_call(frame, block, target, args, out_params, span)?;
            }
            Cmd::SetReturn { index, value, .. } => {
                let ty = frame.func.output_types[index as usize].clone();
                let bytes = self.encode_operand_bytes(frame, &ty, value);
                frame.return_values[index as usize] = Some(bytes);
            }

            Cmd::Print { prim, value, .. } => {
                let v = self.read_operand_scalar(frame, value, prim);
                let text = scalar::format(v);
                log::debug!("print: {text}");
                self.output.push(text);
            }
            Cmd::Bytes { type_index, dst } => {
                let ty = frame.func.types.get(type_index).clone();
                let size = layout::size(&ty, self.arch);
                self.write_scalar_to_dst(frame, dst, PrimType::U32, Scalar::U(size as u64));
            }
            Cmd::Align { type_index, dst } => {
                let ty = frame.func.types.get(type_index).clone();
                let align = layout::align(&ty, self.arch);
                self.write_scalar_to_dst(frame, dst, PrimType::U32, Scalar::U(align as u64));
            }
            Cmd::Cast { from, to, value, dst, .. } => {
                let v = self.read_operand_scalar(frame, value, from);
                let result = convert_scalar(from, to, v);
                self.write_scalar_to_dst(frame, dst, to, result);
            }
            Cmd::Trunc { to, value, dst, .. } => {
                // A register operand already holds its wider source type's
                // byte pattern in little-endian order, so reading just the
                // low `to`-width bytes back out *is* the truncation. An
                // immediate has no bytes to slice, so mask it explicitly.
                let result = match value {
                    Operand::Imm(imm) => trunc_scalar(to, Scalar::from(imm)),
                    Operand::Reg(r) => {
                        let width = layout::size(&Type::Primitive(to), self.arch);
                        scalar::read(frame.read_register(r, width), to)
                    }
                };
                self.write_scalar_to_dst(frame, dst, to, result);
            }
            Cmd::Extend { from, to, value, dst, .. } => {
                let v = self.read_operand_scalar(frame, value, from);
                let result = extend_scalar(from, v);
                self.write_scalar_to_dst(frame, dst, to, result);
            }
            Cmd::DebugIr => {
                log::trace!("{}", frame.func.dump());
            }
            Cmd::Move { value, dst, .. } => {
                let ty = frame.func.type_of(dst).cloned().unwrap_or(Type::Primitive(PrimType::U64));
                let bytes = self.encode_operand_bytes(frame, &ty, value);
                frame.write_register(dst, &bytes);
            }

            Cmd::UncondJump { .. } | Cmd::CondJump { .. } | Cmd::ReturnJump => {
                unreachable!("terminators are handled by execute_block")
            }
        }
        Ok(())
    }

    fn exec_call(
        &mut self,
        frame: &mut Frame,
        block: &BasicBlock,
        target: CallTarget,
        args_index: u32,
        out_index: Option<u32>,
        span: Span,
    ) -> Result<()> {
        let arg_ops = block.call_arg_packs[args_index as usize].clone();
        let out_dests: Vec<OutDest> =
            out_index.map(|i| block.out_param_packs[i as usize].clone()).unwrap_or_default();

        match target {
            CallTarget::Direct(id) => {
                let callee = self.module.function(id);
                self.invoke(frame, callee, &arg_ops, &out_dests, span)
            }
            CallTarget::Indirect(op) => {
                let raw = match op {
                    Operand::Imm(Immediate::FuncRef(i)) => i,
                    Operand::Reg(r) => {
                        let width = self.arch.pointer_size();
                        read_word_le(frame.read_register(r, width)) as u32
                    }
                    Operand::Imm(other) => panic!("{other:?} is not a function reference"),
                };
                if raw as usize >= self.module.function_count() {
                    return Err(InterpreterError::UnresolvedFunction { span });
                }
                let callee = self.module.function(FuncId(raw));
                self.invoke(frame, callee, &arg_ops, &out_dests, span)
            }
            CallTarget::Foreign(name) => self.call_foreign(frame, &name, &arg_ops, &out_dests, span),
        }
    }

    fn invoke(
        &mut self,
        caller: &mut Frame,
        callee: &Func,
        arg_ops: &[Operand],
        out_dests: &[OutDest],
        span: Span,
    ) -> Result<()> {
        if arg_ops.len() != callee.input_types.len() || out_dests.len() != callee.output_types.len() {
            return Err(InterpreterError::ArgumentCountMismatch {
                expected: callee.input_types.len(),
                actual: arg_ops.len(),
                span,
            });
        }

        let args: Vec<Vec<u8>> = callee
            .input_types
            .iter()
            .zip(arg_ops.iter())
            .map(|(ty, op)| self.encode_operand_bytes(caller, ty, *op))
            .collect();

        if !self.check_preconditions(callee, &args)? {
            return Err(InterpreterError::Malformed {
                reason: format!("precondition failed calling `{}`", callee.name),
            });
        }

        let offsets = layout::field_offsets(&callee.output_types, self.arch);
        let total = layout::size(&Type::Tuple(callee.output_types.clone()), self.arch);
        let align = layout::align(&Type::Tuple(callee.output_types.clone()), self.arch);
        let scratch_base = self.stack_alloc(total, align)?;
        let rets: Vec<Address> = offsets.iter().map(|o| Address::Stack(scratch_base + o)).collect();

        self.execute(callee, &args, &rets)?;

        for (i, dest) in out_dests.iter().enumerate() {
            let ty = &callee.output_types[i];
            let width = layout::size(ty, self.arch);
            let bytes = self.stack.read(scratch_base + offsets[i], width).expect("scratch just written").to_vec();
            match dest {
                OutDest::Reg(r) => caller.write_register(*r, &bytes),
                OutDest::Ptr(op) => {
                    let addr = self.read_operand_addr(caller, *op);
                    self.write_bytes(addr, &bytes, span)?;
                }
            }
        }
        self.stack.truncate(scratch_base);
        Ok(())
    }

    /// The fixed table of foreign intrinsics the interpreter implements
    /// directly rather than resolving to a compiled function. Anything else
    /// is the "unresolved function called at compile time" fatal error.
    fn call_foreign(
        &mut self,
        frame: &mut Frame,
        name: &str,
        arg_ops: &[Operand],
        out_dests: &[OutDest],
        span: Span,
    ) -> Result<()> {
        let _ = out_dests;
        match name {
            "memcpy" => {
                if arg_ops.len() != 3 {
                    return Err(InterpreterError::ArgumentCountMismatch { expected: 3, actual: arg_ops.len(), span });
                }
                let dst_addr = self.read_operand_addr(frame, arg_ops[0]);
                let src_addr = self.read_operand_addr(frame, arg_ops[1]);
                let len = self.read_operand_index(frame, arg_ops[2]) as u32;
                let bytes = self.read_bytes(src_addr, len, span)?;
                self.write_bytes(dst_addr, &bytes, span)
            }
            "print" => {
                if let Some(op) = arg_ops.first() {
                    let text = match op {
                        Operand::Imm(imm) => imm.to_string(),
                        Operand::Reg(r) => {
                            let width = self.arch.pointer_size();
                            read_word_le(frame.read_register(*r, width)).to_string()
                        }
                    };
                    log::debug!("print: {text}");
                    self.output.push(text);
                }
                Ok(())
            }
            _ => {
                log::warn!("unresolved foreign function `{name}` called at compile time");
                Err(InterpreterError::UnresolvedFunction { span })
            }
        }
    }

    fn stack_alloc(&mut self, size: u32, align: u32) -> Result<u32> {
        let projected = layout::move_forward_to_alignment(self.stack.len(), align.max(1)) + size;
        if projected > self.stack_limit {
            return Err(InterpreterError::StackOverflow {
                requested: size,
                available: self.stack_limit.saturating_sub(self.stack.len()),
            });
        }
        Ok(self.stack.alloc(size, align))
    }

    fn read_bytes(&self, address: Address, len: u32, span: Span) -> Result<Vec<u8>> {
        match address {
            Address::Null => Err(InterpreterError::NullDereference { span }),
            Address::Stack(o) => {
                self.stack.read(o, len).map(<[u8]>::to_vec).ok_or(InterpreterError::OutOfRangeAddress { address })
            }
            Address::Heap(o) => {
                self.heap.read(o, len).map(<[u8]>::to_vec).ok_or(InterpreterError::OutOfRangeAddress { address })
            }
            Address::Global(i) => {
                if i as usize >= self.module.globals.len() {
                    return Err(InterpreterError::OutOfRangeAddress { address });
                }
                let constant = self.module.globals.get(i);
                constant
                    .bytes
                    .get(..len as usize)
                    .map(<[u8]>::to_vec)
                    .ok_or(InterpreterError::OutOfRangeAddress { address })
            }
        }
    }

    fn write_bytes(&mut self, address: Address, bytes: &[u8], span: Span) -> Result<()> {
        match address {
            Address::Null => Err(InterpreterError::NullDereference { span }),
            Address::Stack(o) => self.stack.write(o, bytes).ok_or(InterpreterError::OutOfRangeAddress { address }),
            Address::Heap(o) => self.heap.write(o, bytes).ok_or(InterpreterError::OutOfRangeAddress { address }),
            Address::Global(_) => Err(InterpreterError::GlobalWriteForbidden { span }),
        }
    }

    fn read_operand_scalar(&self, frame: &Frame, op: Operand, prim: PrimType) -> Scalar {
        match op {
            Operand::Imm(imm) => Scalar::from(imm),
            Operand::Reg(r) => {
                let width = layout::size(&Type::Primitive(prim), self.arch);
                scalar::read(frame.read_register(r, width), prim)
            }
        }
    }

    fn write_scalar_to_dst(&self, frame: &mut Frame, dst: Register, prim: PrimType, value: Scalar) {
        frame.write_register(dst, &scalar::write(prim, value));
    }

    fn read_operand_addr(&self, frame: &Frame, op: Operand) -> Address {
        match op {
            Operand::Imm(Immediate::Addr(a)) => a,
            Operand::Imm(other) => panic!("{other:?} used where an address operand was expected"),
            Operand::Reg(r) => {
                let width = self.arch.pointer_size();
                Address::from_word(read_word_le(frame.read_register(r, width)), self.arch)
            }
        }
    }

    fn write_addr_to_dst(&self, frame: &mut Frame, dst: Register, addr: Address) {
        let width = self.arch.pointer_size() as usize;
        let word = addr.to_word(self.arch);
        frame.write_register(dst, &word.to_le_bytes()[..width]);
    }

    /// Indices and byte counts (`PtrIncr`'s count, `memcpy`'s length) are,
    /// by the convention every builder call site that emits them follows,
    /// always i64-wide when register-valued.
    fn read_operand_index(&self, frame: &Frame, op: Operand) -> i64 {
        match op {
            Operand::Imm(imm) => imm.as_i64().unwrap_or(0),
            Operand::Reg(r) => i64::from_le_bytes(frame.read_register(r, 8).try_into().unwrap()),
        }
    }

    fn encode_operand_bytes(&self, frame: &Frame, ty: &Type, value: Operand) -> Vec<u8> {
        let width = layout::size(ty, self.arch);
        match ty.as_prim() {
            Some(prim) => scalar::write(prim, self.read_operand_scalar(frame, value, prim)),
            None => match value {
                Operand::Reg(r) => frame.read_register(r, width).to_vec(),
                Operand::Imm(imm) => immediate_raw_bytes(imm, width, self.arch),
            },
        }
    }
}

fn immediate_raw_bytes(imm: Immediate, width: u32, arch: Arch) -> Vec<u8> {
    match imm {
        Immediate::Addr(a) => a.to_word(arch).to_le_bytes()[..width as usize].to_vec(),
        Immediate::FuncRef(i) | Immediate::TypeHandle(i) | Immediate::StringRef(i) => {
            (i as u64).to_le_bytes()[..width as usize].to_vec()
        }
        other => scalar::write(other.prim_type().expect("non-scalar immediate without a prim_type"), Scalar::from(other)),
    }
}

fn read_word_le(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf[..bytes.len()].copy_from_slice(bytes);
    u64::from_le_bytes(buf)
}

fn unsigned_of(s: Scalar) -> u64 {
    match s {
        Scalar::U(v) => v,
        other => other.as_i64() as u64,
    }
}

fn eval_arith(op: ArithOp, prim: PrimType, l: Scalar, r: Scalar, span: Span) -> Result<Scalar> {
    if prim.is_float() {
        let (a, b) = (l.as_f64(), r.as_f64());
        return Ok(Scalar::F(match op {
            ArithOp::Add => a + b,
            ArithOp::Sub => a - b,
            ArithOp::Mul => a * b,
            ArithOp::Div => a / b,
            ArithOp::Mod => a % b,
        }));
    }
    if prim.is_signed() {
        let (a, b) = (l.as_i64(), r.as_i64());
        if matches!(op, ArithOp::Div | ArithOp::Mod) && b == 0 {
            return Err(InterpreterError::DivisionByZero { span });
        }
        Ok(Scalar::I(match op {
            ArithOp::Add => a.wrapping_add(b),
            ArithOp::Sub => a.wrapping_sub(b),
            ArithOp::Mul => a.wrapping_mul(b),
            ArithOp::Div => a.wrapping_div(b),
            ArithOp::Mod => a.wrapping_rem(b),
        }))
    } else {
        let (a, b) = (unsigned_of(l), unsigned_of(r));
        if matches!(op, ArithOp::Div | ArithOp::Mod) && b == 0 {
            return Err(InterpreterError::DivisionByZero { span });
        }
        Ok(Scalar::U(match op {
            ArithOp::Add => a.wrapping_add(b),
            ArithOp::Sub => a.wrapping_sub(b),
            ArithOp::Mul => a.wrapping_mul(b),
            ArithOp::Div => a.wrapping_div(b),
            ArithOp::Mod => a.wrapping_rem(b),
        }))
    }
}

fn eval_cmp(op: CmpOp, prim: PrimType, l: Scalar, r: Scalar) -> bool {
    if prim.is_float() {
        let (a, b) = (l.as_f64(), r.as_f64());
        return match op {
            CmpOp::Eq => a == b,
            CmpOp::Ne => a != b,
            CmpOp::Lt => a < b,
            CmpOp::Le => a <= b,
            CmpOp::Gt => a > b,
            CmpOp::Ge => a >= b,
        };
    }
    if prim.is_signed() {
        let (a, b) = (l.as_i64(), r.as_i64());
        match op {
            CmpOp::Eq => a == b,
            CmpOp::Ne => a != b,
            CmpOp::Lt => a < b,
            CmpOp::Le => a <= b,
            CmpOp::Gt => a > b,
            CmpOp::Ge => a >= b,
        }
    } else {
        let (a, b) = (unsigned_of(l), unsigned_of(r));
        match op {
            CmpOp::Eq => a == b,
            CmpOp::Ne => a != b,
            CmpOp::Lt => a < b,
            CmpOp::Le => a <= b,
            CmpOp::Gt => a > b,
            CmpOp::Ge => a >= b,
        }
    }
}

fn convert_scalar(from: PrimType, to: PrimType, v: Scalar) -> Scalar {
    if to.is_float() {
        return Scalar::F(if from.is_float() { v.as_f64() } else { v.as_i64() as f64 });
    }
    let raw = if from.is_float() { v.as_f64() as i64 } else { v.as_i64() };
    match to {
        PrimType::Bool => Scalar::Bool(raw != 0),
        PrimType::Char => Scalar::Char(char::from_u32(raw as u32).unwrap_or('\u{FFFD}')),
        _ if to.is_signed() => Scalar::I(raw),
        _ => Scalar::U(raw as u64),
    }
}

fn trunc_scalar(to: PrimType, v: Scalar) -> Scalar {
    let raw = unsigned_of(v);
    let width_bits = (layout::size(&Type::Primitive(to), Arch::X86_64) * 8).min(64);
    let masked = if width_bits >= 64 { raw } else { raw & ((1u64 << width_bits) - 1) };
    if to.is_signed() {
        let shift = 64 - width_bits;
        Scalar::I(((masked << shift) as i64) >> shift)
    } else {
        Scalar::U(masked)
    }
}

fn extend_scalar(from: PrimType, v: Scalar) -> Scalar {
    if from.is_signed() {
        Scalar::I(v.as_i64())
    } else {
        Scalar::U(unsigned_of(v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use icarus_ir::{Builder, CallTarget as CT};
    use icarus_types::layout::Arch;

    fn module() -> Module {
        Module::new()
    }

    #[test]
    fn executes_straight_line_arithmetic_and_returns_it() {
        let m = module();
        let mut func = Func::new("add_one", vec![Type::Primitive(PrimType::I32)], vec![Type::Primitive(PrimType::I32)], Arch::X86_64);
        {
            let mut b = Builder::new(&mut func, Arch::X86_64);
            let arg = Operand::Reg(Register::parameter(0));
            let sum = b.arith(ArithOp::Add, PrimType::I32, arg, Operand::Imm(Immediate::I32(1)), Span::synthetic());
            b.set_return(0, sum, Span::synthetic());
            b.return_jump();
        }
        let mut interp = Interpreter::new(Arch::X86_64, &m);
        let args = vec![4i32.to_le_bytes().to_vec()];
        let offset = interp.heap_alloc(4, 4);
        interp.execute(&func, &args, &[Address::Heap(offset)]).unwrap();
        let bytes = interp.read_heap(offset, 4).unwrap();
        assert_eq!(i32::from_le_bytes(bytes.try_into().unwrap()), 5);
    }

    #[test]
    fn division_by_zero_is_a_runtime_fault() {
        let m = module();
        let mut func = Func::new("bad_div", vec![], vec![Type::Primitive(PrimType::I32)], Arch::X86_64);
        {
            let mut b = Builder::new(&mut func, Arch::X86_64);
            let one = Operand::Imm(Immediate::I32(1));
            let zero_reg_src = Operand::Reg(Register::ordinary(999));
            let _ = zero_reg_src;
            let zero = b.arith(ArithOp::Mul, PrimType::I32, Operand::Imm(Immediate::I32(0)), one, Span::synthetic());
            // force this through the non-folded path by loading it from a register
            let addr = b.alloca(Type::Primitive(PrimType::I32), Span::synthetic());
            b.store(PrimType::I32, Operand::Reg(addr), zero, Span::synthetic());
            let loaded = b.load(PrimType::I32, Operand::Reg(addr), Span::synthetic());
            let result = b.arith(ArithOp::Div, PrimType::I32, one, Operand::Reg(loaded), Span::synthetic());
            b.set_return(0, result, Span::synthetic());
            b.return_jump();
        }
        let mut interp = Interpreter::new(Arch::X86_64, &m);
        let offset = interp.heap_alloc(4, 4);
        let err = interp.execute(&func, &[], &[Address::Heap(offset)]).unwrap_err();
        assert!(matches!(err, InterpreterError::DivisionByZero { .. }));
    }

    #[test]
    fn null_dereference_is_a_runtime_fault() {
        let m = module();
        let mut func = Func::new("bad_load", vec![], vec![Type::Primitive(PrimType::I32)], Arch::X86_64);
        {
            let mut b = Builder::new(&mut func, Arch::X86_64);
            let loaded = b.load(PrimType::I32, Operand::Imm(Immediate::Addr(Address::Null)), Span::synthetic());
            b.set_return(0, Operand::Reg(loaded), Span::synthetic());
            b.return_jump();
        }
        let mut interp = Interpreter::new(Arch::X86_64, &m);
        let offset = interp.heap_alloc(4, 4);
        let err = interp.execute(&func, &[], &[Address::Heap(offset)]).unwrap_err();
        assert!(matches!(err, InterpreterError::NullDereference { .. }));
    }

    #[test]
    fn step_limit_aborts_a_runaway_loop() {
        let m = module();
        let mut func = Func::new("spin", vec![], vec![], Arch::X86_64);
        let loop_block = func.add_block();
        {
            let mut b = Builder::new(&mut func, Arch::X86_64);
            b.jump(loop_block);
            b.set_current(loop_block);
            b.debug_ir();
            b.jump(loop_block);
        }
        let mut interp = Interpreter::new(Arch::X86_64, &m).with_step_limit(50);
        let err = interp.execute(&func, &[], &[]).unwrap_err();
        assert!(matches!(err, InterpreterError::StepLimitExceeded));
    }

    #[test]
    fn call_direct_marshals_args_and_out_params() {
        let mut m = module();
        let mut doubler = Func::new("double", vec![Type::Primitive(PrimType::I32)], vec![Type::Primitive(PrimType::I32)], Arch::X86_64);
        {
            let mut b = Builder::new(&mut doubler, Arch::X86_64);
            let arg = Operand::Reg(Register::parameter(0));
            let doubled = b.arith(ArithOp::Add, PrimType::I32, arg, arg, Span::synthetic());
            b.set_return(0, doubled, Span::synthetic());
            b.return_jump();
        }
        let callee_id = m.add_function(doubler);

        let mut caller = Func::new("call_double", vec![], vec![Type::Primitive(PrimType::I32)], Arch::X86_64);
        {
            let mut b = Builder::new(&mut caller, Arch::X86_64);
            let out = b.reserve(&Type::Primitive(PrimType::I32));
            b.call(CT::Direct(callee_id), vec![Operand::Imm(Immediate::I32(21))], vec![OutDest::Reg(out)], Span::synthetic());
            b.set_return(0, Operand::Reg(out), Span::synthetic());
            b.return_jump();
        }

        let mut interp = Interpreter::new(Arch::X86_64, &m);
        let offset = interp.heap_alloc(4, 4);
        interp.execute(&caller, &[], &[Address::Heap(offset)]).unwrap();
        let bytes = interp.read_heap(offset, 4).unwrap();
        assert_eq!(i32::from_le_bytes(bytes.try_into().unwrap()), 42);
    }

    #[test]
    fn foreign_print_appends_to_the_output_sink() {
        let m = module();
        let mut func = Func::new("greet", vec![], vec![], Arch::X86_64);
        {
            let mut b = Builder::new(&mut func, Arch::X86_64);
            b.call(CT::Foreign("print".into()), vec![Operand::Imm(Immediate::I32(7))], vec![], Span::synthetic());
            b.return_jump();
        }
        let mut interp = Interpreter::new(Arch::X86_64, &m);
        interp.execute(&func, &[], &[]).unwrap();
        assert_eq!(interp.output(), &["7i32".to_string()]);
    }

    #[test]
    fn unresolved_foreign_name_is_a_fatal_error() {
        let m = module();
        let mut func = Func::new("mystery", vec![], vec![], Arch::X86_64);
        {
            let mut b = Builder::new(&mut func, Arch::X86_64);
            b.call(CT::Foreign("launch_missiles".into()), vec![], vec![], Span::synthetic());
            b.return_jump();
        }
        let mut interp = Interpreter::new(Arch::X86_64, &m);
        let err = interp.execute(&func, &[], &[]).unwrap_err();
        assert!(matches!(err, InterpreterError::UnresolvedFunction { .. }));
    }
}
