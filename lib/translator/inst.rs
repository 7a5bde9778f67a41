//! The per-instruction semantics interpreter.
//!
//! Given a decoded instruction, walk its semantics in the tape and emit
//! the IR operations it describes, keeping the in-flight operand values
//! on a small stack. The program counter is advanced before any other
//! effect, so semantics that read it observe the post-increment value.

use crate::error::Error;
use crate::ir::{AtomicOrdering, BinaryOp, CastOp, SyncScope, Type, Value};
use crate::mc::McDecodedInst;
use crate::translator::function::FunctionTranslator;
use crate::translator::sema::{pred, IrOpcode, PseudoOp, SemaOp};
use crate::translator::{RegisterSema, TargetSemantics};
use log::{debug, error};

impl<'a, R: RegisterSema> FunctionTranslator<'a, R> {
    /// Translate one decoded instruction into the current block.
    ///
    /// With the `unknown_to_undef` option set, unknown instructions,
    /// opcodes and predicates are replaced by `trap; unreachable` and
    /// reported as success; otherwise they fail the translation.
    pub fn translate_inst<T>(
        &mut self,
        target: &mut T,
        inst: &McDecodedInst,
    ) -> Result<(), Error>
    where
        T: TargetSemantics<R> + ?Sized,
    {
        debug!("translating {}", inst);
        self.inst = Some(inst.clone());
        self.rsi.switch_to_inst(inst);

        if self.options.inst_addr_save() {
            let block = self.block.expect("no basic block is open for insertion");
            self.store_debug_sink(block, crate::CURRENT_INSTR_SYMBOL, inst.address())?;
        }

        let result = match self.try_translate_inst(target) {
            Ok(()) => Ok(()),
            Err(err) if err.is_unknown() && self.options.unknown_to_undef() => {
                error!(
                    "couldn't translate instruction {} ({}): {}",
                    self.rsi.inst_name(inst.opcode()),
                    inst,
                    err
                );
                let (mut b, _) = self.parts();
                b.trap();
                b.unreachable();
                Ok(())
            }
            Err(err) => Err(err),
        };

        self.vals.clear();
        self.inst = None;
        self.cursor = None;
        result
    }

    fn try_translate_inst<T>(&mut self, target: &mut T) -> Result<(), Error>
    where
        T: TargetSemantics<R> + ?Sized,
    {
        if target.translate_inst(self)? {
            return Ok(());
        }

        let (opcode, size) = {
            let inst = self.current_inst();
            (inst.opcode(), inst.size())
        };
        let index = self
            .tables
            .sema_index(opcode)
            .ok_or_else(|| Error::UnknownInstruction(self.rsi.inst_name(opcode)))?;
        self.cursor = Some(self.tables.cursor(index));

        // Increment the PC before anything.
        self.advance_pc(size)?;

        loop {
            let token = self.next_token();
            if token == PseudoOp::EndOfInstruction as u16 {
                break;
            }
            self.translate_opcode(target, token)?;
        }
        debug_assert!(
            self.vals.is_empty(),
            "values left on the operand stack at end of instruction"
        );
        Ok(())
    }

    /// Emit `PC <- PC + size`.
    ///
    /// Targets that take over whole-instruction translation must call
    /// this themselves before emitting other effects.
    pub fn advance_pc(&mut self, size: u8) -> Result<(), Error> {
        let pc = self.rsi.program_counter();
        let (mut b, rsi) = self.parts();
        let old = rsi.get_reg(&mut b, pc)?;
        let ty = b.value_type(old);
        let step = b.iconst(ty, size as u64);
        let new = b.binop(BinaryOp::Add, old, step)?;
        rsi.set_reg(&mut b, pc, new)
    }

    /// The next raw semantics token.
    pub fn next_token(&mut self) -> u16 {
        self.cursor
            .as_mut()
            .expect("no semantics cursor is active")
            .next()
    }

    /// The next semantics token, decoded as a value type.
    pub fn next_value_type(&mut self) -> Type {
        self.cursor
            .as_mut()
            .expect("no semantics cursor is active")
            .next_vt()
    }

    /// The result type of the semantic opcode being translated.
    pub fn result_type(&self) -> Type {
        self.res_ty
    }

    /// Pop the most recently produced semantic value.
    pub fn pop_operand(&mut self) -> Result<Value, Error> {
        self.vals
            .pop()
            .ok_or_else(|| Error::MalformedSemantics("operand stack underflow".into()))
    }

    /// Push a semantic result value.
    pub fn push_result(&mut self, value: Value) {
        self.vals.push(value);
    }

    /// Translate one semantic opcode. The token is followed in the tape
    /// by the result value type and any inline operands.
    pub fn translate_opcode<T>(&mut self, target: &mut T, token: u16) -> Result<(), Error>
    where
        T: TargetSemantics<R> + ?Sized,
    {
        self.res_ty = self.next_value_type();
        let op = match SemaOp::decode(token) {
            Ok(op) => op,
            Err(_) => return Err(self.unknown_opcode(token)),
        };
        match op {
            SemaOp::Target(raw) => {
                if target.translate_opcode(self, raw)? {
                    Ok(())
                } else {
                    Err(self.unknown_opcode(raw))
                }
            }
            SemaOp::Ir(ir) => self.translate_ir_opcode(ir),
            SemaOp::Pseudo(pseudo) => self.translate_pseudo(target, pseudo),
        }
    }

    fn unknown_opcode(&self, opcode: u16) -> Error {
        let inst = self
            .inst
            .as_ref()
            .map(|inst| self.rsi.inst_name(inst.opcode()))
            .unwrap_or_default();
        error!("couldn't translate opcode {:#x} for {}", opcode, inst);
        Error::UnknownOpcode { opcode, inst }
    }

    fn translate_ir_opcode(&mut self, op: IrOpcode) -> Result<(), Error> {
        match op {
            IrOpcode::Add => self.translate_binop(BinaryOp::Add),
            IrOpcode::Sub => self.translate_binop(BinaryOp::Sub),
            IrOpcode::Mul => self.translate_binop(BinaryOp::Mul),
            IrOpcode::UDiv => self.translate_binop(BinaryOp::UDiv),
            IrOpcode::SDiv => self.translate_binop(BinaryOp::SDiv),
            IrOpcode::URem => self.translate_binop(BinaryOp::URem),
            IrOpcode::SRem => self.translate_binop(BinaryOp::SRem),
            IrOpcode::And => self.translate_binop(BinaryOp::And),
            IrOpcode::Or => self.translate_binop(BinaryOp::Or),
            IrOpcode::Xor => self.translate_binop(BinaryOp::Xor),
            IrOpcode::Shl => self.translate_binop(BinaryOp::Shl),
            IrOpcode::Srl => self.translate_binop(BinaryOp::LShr),
            IrOpcode::Sra => self.translate_binop(BinaryOp::AShr),
            IrOpcode::FAdd => self.translate_binop(BinaryOp::FAdd),
            IrOpcode::FSub => self.translate_binop(BinaryOp::FSub),
            IrOpcode::FMul => self.translate_binop(BinaryOp::FMul),
            IrOpcode::FDiv => self.translate_binop(BinaryOp::FDiv),
            IrOpcode::FRem => self.translate_binop(BinaryOp::FRem),
            IrOpcode::Rotl => self.translate_rotl(),
            IrOpcode::Truncate => self.translate_cast(CastOp::Trunc),
            IrOpcode::BitCast => self.translate_cast(CastOp::BitCast),
            IrOpcode::ZeroExtend => self.translate_cast(CastOp::ZExt),
            IrOpcode::SignExtend => self.translate_cast(CastOp::SExt),
            IrOpcode::FpToUint => self.translate_cast(CastOp::FpToUi),
            IrOpcode::FpToSint => self.translate_cast(CastOp::FpToSi),
            IrOpcode::UintToFp => self.translate_cast(CastOp::UiToFp),
            IrOpcode::SintToFp => self.translate_cast(CastOp::SiToFp),
            IrOpcode::FpRound => self.translate_cast(CastOp::FpTrunc),
            IrOpcode::FpExtend => self.translate_cast(CastOp::FpExt),
            IrOpcode::FSqrt => {
                let value = self.pop_operand()?;
                let result = {
                    let (mut b, _) = self.parts();
                    b.sqrt(value)
                };
                self.push_result(result);
                Ok(())
            }
            IrOpcode::Bswap => {
                let value = self.pop_operand()?;
                let result = {
                    let (mut b, _) = self.parts();
                    b.bswap(value)
                };
                self.push_result(result);
                Ok(())
            }
            IrOpcode::InsertVectorElt => {
                let index = self.pop_operand()?;
                let element = self.pop_operand()?;
                let vector = self.pop_operand()?;
                let result = {
                    let (mut b, _) = self.parts();
                    b.insert_element(vector, element, index)?
                };
                self.push_result(result);
                Ok(())
            }
            IrOpcode::ExtractVectorElt => {
                let index = self.pop_operand()?;
                let vector = self.pop_operand()?;
                let result = {
                    let (mut b, _) = self.parts();
                    b.extract_element(vector, index)?
                };
                self.push_result(result);
                Ok(())
            }
            IrOpcode::SMulLoHi => self.translate_mul_lohi(true),
            IrOpcode::UMulLoHi => self.translate_mul_lohi(false),
            IrOpcode::Load => self.translate_load(),
            IrOpcode::Store => self.translate_store(),
            IrOpcode::Br => {
                let target = self.pop_operand()?;
                let addr = self
                    .module
                    .function(self.func)
                    .value_as_const_int(target)
                    .ok_or_else(|| {
                        Error::MalformedSemantics("direct branch to a non-constant".into())
                    })?;
                let pc = self.rsi.program_counter();
                {
                    let (mut b, rsi) = self.parts();
                    rsi.set_reg(&mut b, pc, target)?;
                }
                let dest = self.get_or_create_block(addr);
                let (mut b, _) = self.parts();
                b.br(dest);
                Ok(())
            }
            IrOpcode::BrInd => {
                // An indirect transfer doubles as a call through a
                // register: call through `translate_at`, then leave via
                // the exit block.
                let target = self.pop_operand()?;
                let pc = self.rsi.program_counter();
                {
                    let (mut b, rsi) = self.parts();
                    rsi.set_reg(&mut b, pc, target)?;
                }
                self.insert_call(target)?;
                let exit = self.exit;
                let (mut b, _) = self.parts();
                b.br(exit);
                Ok(())
            }
            IrOpcode::Trap => {
                let (mut b, _) = self.parts();
                b.trap();
                Ok(())
            }
            IrOpcode::AtomicFence => self.translate_fence(),
        }
    }

    fn translate_binop(&mut self, op: BinaryOp) -> Result<(), Error> {
        let rhs = self.pop_operand()?;
        let lhs = self.pop_operand()?;
        let result = {
            let (mut b, _) = self.parts();
            let lhs_ty = b.value_type(lhs);
            let rhs = if op.is_shift() && b.value_type(rhs) != lhs_ty {
                b.zext(rhs, lhs_ty)?
            } else {
                rhs
            };
            b.binop(op, lhs, rhs)?
        };
        self.push_result(result);
        Ok(())
    }

    fn translate_cast(&mut self, op: CastOp) -> Result<(), Error> {
        let value = self.pop_operand()?;
        let ty = self.res_ty;
        let result = {
            let (mut b, _) = self.parts();
            b.cast(op, value, ty)?
        };
        self.push_result(result);
        Ok(())
    }

    fn translate_rotl(&mut self) -> Result<(), Error> {
        let rhs = self.pop_operand()?;
        let lhs = self.pop_operand()?;
        let result = {
            let (mut b, _) = self.parts();
            let ty = b.value_type(lhs);
            assert!(ty.is_int(), "rotate of a non-integer");
            let rhs = if b.value_type(rhs) != ty {
                b.zext(rhs, ty)?
            } else {
                rhs
            };
            // TODO: mask the amount; rotates by 0 or the full width make
            // the complementary shift undefined.
            let left = b.binop(BinaryOp::Shl, lhs, rhs)?;
            let width = b.iconst(ty, ty.bits() as u64);
            let back = b.binop(BinaryOp::Sub, width, rhs)?;
            let right = b.binop(BinaryOp::LShr, lhs, back)?;
            b.binop(BinaryOp::Or, left, right)?
        };
        self.push_result(result);
        Ok(())
    }

    /// Wide multiplies produce two results: the low half typed by the
    /// primary result type and the high half by a second type read from
    /// the tape.
    fn translate_mul_lohi(&mut self, signed: bool) -> Result<(), Error> {
        let hi_ty = self.next_value_type();
        let lo_ty = self.res_ty;
        assert!(
            lo_ty.is_int() && hi_ty.is_int(),
            "wide multiply of non-integers"
        );
        let rhs = self.pop_operand()?;
        let lhs = self.pop_operand()?;
        let (lo, hi) = {
            let (mut b, _) = self.parts();
            let full_ty = Type::int(lo_ty.bits() + hi_ty.bits());
            let cast = if signed { CastOp::SExt } else { CastOp::ZExt };
            let lhs = b.cast(cast, lhs, full_ty)?;
            let rhs = b.cast(cast, rhs, full_ty)?;
            let full = b.binop(BinaryOp::Mul, lhs, rhs)?;
            let lo = b.trunc(full, lo_ty)?;
            let shift = b.iconst(full_ty, lo_ty.bits() as u64);
            let shifted = b.binop(BinaryOp::LShr, full, shift)?;
            let hi = b.trunc(shifted, hi_ty)?;
            (lo, hi)
        };
        self.push_result(lo);
        self.push_result(hi);
        Ok(())
    }

    fn translate_load(&mut self) -> Result<(), Error> {
        let ptr = self.pop_operand()?;
        let ty = self.res_ty;
        let result = {
            let (mut b, _) = self.parts();
            let ptr = if b.value_type(ptr).is_ptr() {
                ptr
            } else {
                b.int_to_ptr(ptr)?
            };
            b.load(ty, ptr, 1)?
        };
        self.push_result(result);
        Ok(())
    }

    fn translate_store(&mut self) -> Result<(), Error> {
        let ptr = self.pop_operand()?;
        let value = self.pop_operand()?;
        let (mut b, _) = self.parts();
        let ptr = if b.value_type(ptr).is_ptr() {
            ptr
        } else {
            b.int_to_ptr(ptr)?
        };
        b.store(value, ptr, 1)
    }

    fn translate_ext_load(&mut self, mem_ty: Type, sign_extend: bool) -> Result<(), Error> {
        let ptr = self.pop_operand()?;
        let res_ty = self.res_ty;
        let result = {
            let (mut b, _) = self.parts();
            let ptr = if b.value_type(ptr).is_ptr() {
                ptr
            } else {
                b.int_to_ptr(ptr)?
            };
            let loaded = b.load(mem_ty, ptr, 1)?;
            if sign_extend {
                b.sext(loaded, res_ty)?
            } else {
                b.zext(loaded, res_ty)?
            }
        };
        self.push_result(result);
        Ok(())
    }

    fn translate_fence(&mut self) -> Result<(), Error> {
        let scope = self.pop_operand()?;
        let ordering = self.pop_operand()?;
        let func = self.module.function(self.func);
        let ordering = func.value_as_const_int(ordering).ok_or_else(|| {
            Error::MalformedSemantics("fence ordering must be a constant".into())
        })?;
        let scope = func
            .value_as_const_int(scope)
            .ok_or_else(|| Error::MalformedSemantics("fence scope must be a constant".into()))?;
        let ordering = match AtomicOrdering::from_token(ordering) {
            Some(ordering) => ordering,
            None => unreachable!("invalid atomic ordering {}", ordering),
        };
        let scope = match SyncScope::from_token(scope) {
            Some(scope) => scope,
            None => unreachable!("invalid synchronization scope {}", scope),
        };
        let (mut b, _) = self.parts();
        b.fence(ordering, scope);
        Ok(())
    }

    fn translate_pseudo<T>(&mut self, target: &mut T, pseudo: PseudoOp) -> Result<(), Error>
    where
        T: TargetSemantics<R> + ?Sized,
    {
        match pseudo {
            PseudoOp::EndOfInstruction => Err(Error::MalformedSemantics(
                "end of instruction inside opcode dispatch".into(),
            )),
            PseudoOp::PutRc => {
                let operand_no = self.next_token() as usize;
                let reg = self.current_inst().reg_op(operand_no)?;
                let value = self.pop_operand()?;
                self.put_reg_coerced(reg, value)
            }
            PseudoOp::PutReg => {
                let reg = u32::from(self.next_token());
                let value = self.pop_operand()?;
                let (mut b, rsi) = self.parts();
                rsi.set_reg(&mut b, reg, value)
            }
            PseudoOp::GetRc => {
                let operand_no = self.next_token() as usize;
                let reg = self.current_inst().reg_op(operand_no)?;
                let res_ty = self.res_ty;
                let result = {
                    let (mut b, rsi) = self.parts();
                    let mut value = rsi.get_reg_as_int(&mut b, reg)?;
                    if res_ty.bits() < b.value_type(value).bits() {
                        value = b.trunc(value, Type::int(res_ty.bits()))?;
                    }
                    if !res_ty.is_int() {
                        value = b.bitcast(value, res_ty)?;
                    }
                    value
                };
                self.push_result(result);
                Ok(())
            }
            PseudoOp::GetReg => {
                let reg = u32::from(self.next_token());
                let result = {
                    let (mut b, rsi) = self.parts();
                    rsi.get_reg(&mut b, reg)?
                };
                self.push_result(result);
                Ok(())
            }
            PseudoOp::CustomOp => {
                let op_type = self.next_token();
                let operand_no = self.next_token() as usize;
                match target.translate_custom_operand(self, op_type, operand_no)? {
                    Some(value) => {
                        self.push_result(value);
                        Ok(())
                    }
                    None => Err(Error::UnknownCustomOperand(op_type)),
                }
            }
            PseudoOp::ComplexPattern => {
                let pattern = self.next_token();
                match target.translate_complex_pattern(self, pattern)? {
                    Some(value) => {
                        self.push_result(value);
                        Ok(())
                    }
                    None => Err(Error::UnknownComplexPattern(pattern)),
                }
            }
            PseudoOp::Predicate => {
                let predicate = self.next_token();
                self.translate_predicate(predicate)
            }
            PseudoOp::ConstantOp => {
                let operand_no = self.next_token() as usize;
                let imm = self.current_inst().imm_op(operand_no)?;
                let ty = self.res_ty;
                let result = {
                    let (mut b, _) = self.parts();
                    b.iconst(ty, imm as u64)
                };
                self.push_result(result);
                Ok(())
            }
            PseudoOp::MovConstant => {
                let index = self.next_token() as usize;
                let value = self.tables.constant(index);
                let ty = self.res_ty;
                let result = {
                    let (mut b, _) = self.parts();
                    b.iconst(ty, value)
                };
                self.push_result(result);
                Ok(())
            }
            PseudoOp::Implicit => {
                let reg = u32::from(self.next_token());
                if target.translate_implicit(self, reg)? {
                    Ok(())
                } else {
                    Err(Error::UnknownImplicit(self.rsi.reg_name(reg)))
                }
            }
        }
    }

    /// Write a semantic value to the register named by a machine
    /// operand, coercing it to the register's integer type: pointers go
    /// through ptrtoint, other non-integers through a same-width
    /// bitcast, and narrower values are inserted into the register's
    /// current contents as a sub-register update.
    fn put_reg_coerced(&mut self, reg: u32, value: Value) -> Result<(), Error> {
        let reg_ty = self.rsi.reg_int_type(reg);
        let (mut b, rsi) = self.parts();
        let mut value = value;
        if b.value_type(value).is_ptr() {
            value = b.ptr_to_int(value, reg_ty)?;
        }
        if !b.value_type(value).is_int() {
            let bits = b.value_type(value).bits();
            value = b.bitcast(value, Type::int(bits))?;
        }
        if b.value_type(value).bits() < reg_ty.bits() {
            let whole = rsi.get_reg_as_int(&mut b, reg)?;
            value = rsi.insert_bits_in_value(&mut b, whole, value)?;
        }
        assert_eq!(
            b.value_type(value),
            reg_ty,
            "register write with a mismatched type"
        );
        rsi.set_reg(&mut b, reg, value)
    }

    /// Predicates name memory access patterns and composite operations;
    /// they reuse the load/store and binop codepaths.
    fn translate_predicate(&mut self, predicate: u16) -> Result<(), Error> {
        match predicate {
            pred::MEMOP
            | pred::LOADI16
            | pred::LOADI32
            | pred::ALIGNEDLOAD
            | pred::ALIGNEDLOAD256
            | pred::ALIGNEDLOAD512
            | pred::LOAD => self.translate_load(),
            pred::ALIGNEDNONTEMPORALSTORE
            | pred::NONTEMPORALSTORE
            | pred::ALIGNEDSTORE
            | pred::ALIGNEDSTORE256
            | pred::ALIGNEDSTORE512
            | pred::STORE => self.translate_store(),
            pred::ZEXTLOADI8 => self.translate_ext_load(Type::int(8), false),
            pred::ZEXTLOADI16 => self.translate_ext_load(Type::int(16), false),
            pred::SEXTLOADI8 => self.translate_ext_load(Type::int(8), true),
            pred::SEXTLOADI16 => self.translate_ext_load(Type::int(16), true),
            pred::SEXTLOADI32 => self.translate_ext_load(Type::int(32), true),
            pred::AND_SU => self.translate_binop(BinaryOp::And),
            unknown => {
                error!("unknown predicate {}", unknown);
                Err(Error::UnknownPredicate(unknown))
            }
        }
    }
}
