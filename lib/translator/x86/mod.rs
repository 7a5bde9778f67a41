//! x86-64 register semantics and target hooks.
//!
//! This is the reference target: it models the x86-64 register file over
//! a flat register-set struct and plugs in the handful of
//! target-specific semantic constructs the shared opcode set cannot
//! express (vector compares, addressing-mode patterns, sign-extended
//! immediate operands, implicit flag clobbers).

use crate::error::Error;
use crate::ir::{
    BinaryOp, BlockId, Builder, CmpPredicate, Constant, FuncId, Function, Module, Type, Value,
};
use crate::mc::McDecodedInst;
use crate::translator::sema::BUILTIN_OP_END;
use crate::translator::{FunctionTranslator, RegisterSema, TargetSemantics};

pub mod registers;
#[cfg(test)]
mod test;

pub use self::registers::reg;
use self::registers::{field_type, get_register};

/// Semantic opcodes in the target range.
pub mod opcodes {
    use super::BUILTIN_OP_END;

    /// Packed integer compare-equal: lanewise `icmp eq` materialized as
    /// all-ones / all-zero lanes.
    pub const PCMPEQ: u16 = BUILTIN_OP_END;
}

/// Complex pattern identifiers.
pub mod patterns {
    /// `base + index * scale + disp`, encoded in the tape as the index
    /// of the first of the four machine operands (base reg, scale imm,
    /// index reg, displacement imm).
    pub const ADDR64: u16 = 1;
}

/// Custom operand types.
pub mod custom_ops {
    /// An 8-bit immediate, sign-extended to the result type.
    pub const I8IMM: u16 = 1;
}

/// The decoder's opcode number for `nop`, the one instruction this
/// target translates without semantics.
pub const NOOP: u32 = 0x90;

/// x86-64 implementation of the register semantics interface.
///
/// Registers live in a flat struct of full-width fields; reads and
/// writes go straight through the register-set pointer, so there is no
/// block-local state to spill around calls. Sub-register reads
/// shift-and-truncate; sub-register writes read-modify-write, except
/// writes to the 32-bit aliases which architecturally zero the upper
/// half.
pub struct X86RegisterSema {
    regset_ty: Type,
    diff_fn: Option<FuncId>,
}

impl X86RegisterSema {
    pub fn new(module: &mut Module) -> X86RegisterSema {
        let id = module.add_struct_type("regset.x86_64");
        X86RegisterSema {
            regset_ty: Type::Struct(id),
            diff_fn: None,
        }
    }

    /// Load the full register containing `reg`.
    fn load_full(&self, b: &mut Builder, reg: u32) -> Result<Value, Error> {
        let r = get_register(reg)?;
        let regset = b.function().arg(0);
        let addr = b.field_addr(regset, r.field)?;
        b.load(field_type(r.field), addr, 0)
    }
}

impl RegisterSema for X86RegisterSema {
    fn switch_to_inst(&mut self, _inst: &McDecodedInst) {}

    fn switch_to_bb(&mut self, _block: BlockId) {}

    fn finalize_bb(&mut self) {}

    fn finalize_function(&mut self, _func: &mut Function, _exit: BlockId) -> Result<(), Error> {
        Ok(())
    }

    fn get_reg(&mut self, b: &mut Builder, reg: u32) -> Result<Value, Error> {
        let r = get_register(reg)?;
        let full = self.load_full(b, reg)?;
        if r.is_full() {
            return Ok(full);
        }
        let mut value = full;
        if r.offset > 0 {
            let shift = b.iconst(Type::int(r.full_bits), r.offset as u64);
            value = b.binop(BinaryOp::LShr, value, shift)?;
        }
        b.trunc(value, Type::int(r.bits))
    }

    fn set_reg(&mut self, b: &mut Builder, reg: u32, value: Value) -> Result<(), Error> {
        let r = get_register(reg)?;
        if b.value_type(value) != Type::int(r.bits) {
            return Err(Error::Type(format!(
                "writing {} to {}-bit register {}",
                b.value_type(value),
                r.bits,
                r.name
            )));
        }
        let regset = b.function().arg(0);
        let addr = b.field_addr(regset, r.field)?;
        if r.is_full() {
            return b.store(value, addr, 0);
        }
        let full_ty = Type::int(r.full_bits);
        if r.bits == 32 && r.offset == 0 {
            // Writes to the 32-bit aliases zero the upper half.
            let wide = b.zext(value, full_ty)?;
            return b.store(wide, addr, 0);
        }
        let full = b.load(full_ty, addr, 0)?;
        let mask = !(((1u64 << r.bits) - 1) << r.offset);
        let mask = b.iconst(full_ty, mask);
        let kept = b.binop(BinaryOp::And, full, mask)?;
        let mut wide = b.zext(value, full_ty)?;
        if r.offset > 0 {
            let shift = b.iconst(full_ty, r.offset as u64);
            wide = b.binop(BinaryOp::Shl, wide, shift)?;
        }
        let merged = b.binop(BinaryOp::Or, kept, wide)?;
        b.store(merged, addr, 0)
    }

    fn get_reg_as_int(&mut self, b: &mut Builder, reg: u32) -> Result<Value, Error> {
        // Every register already reads as an integer of its width.
        self.get_reg(b, reg)
    }

    fn insert_bits_in_value(
        &mut self,
        b: &mut Builder,
        whole: Value,
        narrow: Value,
    ) -> Result<Value, Error> {
        let whole_ty = b.value_type(whole);
        let bits = b.value_type(narrow).bits();
        assert!(
            whole_ty.is_int() && bits < whole_ty.bits(),
            "inserting {} bits into {}",
            bits,
            whole_ty
        );
        let mask = Constant::int(whole_ty, !(((1u128 << bits) - 1)));
        let mask = b.const_value(mask);
        let kept = b.binop(BinaryOp::And, whole, mask)?;
        let wide = b.zext(narrow, whole_ty)?;
        b.binop(BinaryOp::Or, kept, wide)
    }

    fn reg_int_type(&self, reg: u32) -> Type {
        match get_register(reg) {
            Ok(r) => Type::int(r.bits),
            Err(_) => Type::Void,
        }
    }

    fn reg_type(&self, reg: u32) -> Type {
        self.reg_int_type(reg)
    }

    fn reg_set_type(&self) -> Type {
        self.regset_ty
    }

    fn get_or_create_regset_diff_function(&mut self, module: &mut Module) -> FuncId {
        if let Some(id) = self.diff_fn {
            return id;
        }
        let id = module.declare_function(
            "saker_regset_diff",
            vec![Type::Ptr, Type::Ptr, Type::Ptr],
            Type::Void,
        );
        self.diff_fn = Some(id);
        id
    }

    fn save_all_local_regs(&mut self, _b: &mut Builder) -> Result<(), Error> {
        // Register accesses go straight through the register-set
        // pointer; nothing is cached per block.
        Ok(())
    }

    fn restore_local_regs(&mut self, _b: &mut Builder) -> Result<(), Error> {
        Ok(())
    }

    fn program_counter(&self) -> u32 {
        reg::RIP
    }

    fn reg_name(&self, reg: u32) -> String {
        match get_register(reg) {
            Ok(r) => r.name.to_string(),
            Err(_) => format!("r{}", reg),
        }
    }
}

/// x86-64 target hooks.
#[derive(Clone, Debug, Default)]
pub struct X86TargetSemantics;

impl X86TargetSemantics {
    pub fn new() -> X86TargetSemantics {
        X86TargetSemantics
    }
}

impl TargetSemantics<X86RegisterSema> for X86TargetSemantics {
    fn translate_inst(
        &mut self,
        ft: &mut FunctionTranslator<X86RegisterSema>,
    ) -> Result<bool, Error> {
        let (opcode, size) = {
            let inst = ft.current_inst();
            (inst.opcode(), inst.size())
        };
        if opcode == NOOP {
            ft.advance_pc(size)?;
            return Ok(true);
        }
        Ok(false)
    }

    fn translate_opcode(
        &mut self,
        ft: &mut FunctionTranslator<X86RegisterSema>,
        opcode: u16,
    ) -> Result<bool, Error> {
        match opcode {
            opcodes::PCMPEQ => {
                let rhs = ft.pop_operand()?;
                let lhs = ft.pop_operand()?;
                let res_ty = ft.result_type();
                let result = {
                    let (mut b, _) = ft.parts();
                    let cmp = b.icmp(CmpPredicate::Eq, lhs, rhs)?;
                    let ones = b.const_value(Constant::all_ones(res_ty));
                    let zero = b.const_value(Constant::zero(res_ty));
                    b.select(cmp, ones, zero)?
                };
                ft.push_result(result);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn translate_complex_pattern(
        &mut self,
        ft: &mut FunctionTranslator<X86RegisterSema>,
        pattern: u16,
    ) -> Result<Option<Value>, Error> {
        match pattern {
            patterns::ADDR64 => {
                let operand_no = ft.next_token() as usize;
                let inst = ft.current_inst().clone();
                let base = inst.reg_op(operand_no)?;
                let scale = inst.imm_op(operand_no + 1)?;
                let index = inst.reg_op(operand_no + 2)?;
                let disp = inst.imm_op(operand_no + 3)?;
                let (mut b, rsi) = ft.parts();
                let base = rsi.get_reg(&mut b, base)?;
                let ty = b.value_type(base);
                let mut offset = b.iconst(ty, disp as u64);
                if index != reg::NONE {
                    let index = rsi.get_reg(&mut b, index)?;
                    let scale = b.iconst(ty, scale as u64);
                    let scaled = b.binop(BinaryOp::Mul, index, scale)?;
                    offset = b.binop(BinaryOp::Add, scaled, offset)?;
                }
                Ok(Some(b.binop(BinaryOp::Add, base, offset)?))
            }
            _ => Ok(None),
        }
    }

    fn translate_custom_operand(
        &mut self,
        ft: &mut FunctionTranslator<X86RegisterSema>,
        op_type: u16,
        operand_no: usize,
    ) -> Result<Option<Value>, Error> {
        match op_type {
            custom_ops::I8IMM => {
                let imm = ft.current_inst().imm_op(operand_no)? as i8;
                let ty = ft.result_type();
                let (mut b, _) = ft.parts();
                Ok(Some(b.iconst(ty, imm as i64 as u64)))
            }
            _ => Ok(None),
        }
    }

    fn translate_implicit(
        &mut self,
        ft: &mut FunctionTranslator<X86RegisterSema>,
        reg_no: u32,
    ) -> Result<bool, Error> {
        if reg_no == reg::EFLAGS {
            // Semantics that name the flags implicitly clobber them.
            let (mut b, rsi) = ft.parts();
            let zero = b.iconst(Type::int(64), 0);
            rsi.set_reg(&mut b, reg::EFLAGS, zero)?;
            return Ok(true);
        }
        Ok(false)
    }
}
