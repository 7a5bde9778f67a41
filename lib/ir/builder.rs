//! A typed builder over one basic block.
//!
//! The builder is a thin facade exposing exactly the IR operations the
//! translator needs. Constructors type-check their operands and fail with
//! `Error::Type` on a sort mismatch, so malformed semantics surface at
//! build time instead of producing ill-typed IR.

use crate::error::Error;
use crate::ir::{
    AtomicOrdering, BinaryOp, BlockId, CallTarget, CastOp, CmpPredicate, Constant, FuncId,
    Function, InstId, InstKind, Intrinsic, SyncScope, Type, Value,
};

/// Inserts instructions into one block of a function, either appending
/// or at a fixed position (used when wrapping recorded call blocks).
pub struct Builder<'f> {
    func: &'f mut Function,
    block: BlockId,
    at: Option<usize>,
}

impl<'f> Builder<'f> {
    /// A builder appending to the end of `block`.
    pub fn new(func: &'f mut Function, block: BlockId) -> Builder<'f> {
        Builder {
            func,
            block,
            at: None,
        }
    }

    /// A builder inserting before the instruction at `index`.
    pub fn at(func: &'f mut Function, block: BlockId, index: usize) -> Builder<'f> {
        Builder {
            func,
            block,
            at: Some(index),
        }
    }

    pub fn block(&self) -> BlockId {
        self.block
    }

    pub fn function(&self) -> &Function {
        self.func
    }

    pub fn value_type(&self, value: Value) -> Type {
        self.func.value_type(value)
    }

    fn push(&mut self, kind: InstKind, result_ty: Type) -> Option<Value> {
        let (inst, result) = self.func.create_inst(kind, result_ty);
        self.func.place_inst(self.block, inst, self.at);
        if let Some(index) = self.at.as_mut() {
            *index += 1;
        }
        result
    }

    fn push_value(&mut self, kind: InstKind, result_ty: Type) -> Value {
        self.push(kind, result_ty)
            .expect("instruction unexpectedly produced no value")
    }

    fn ensure_sort(&self, lhs: Value, rhs: Value) -> Result<(), Error> {
        let (lt, rt) = (self.value_type(lhs), self.value_type(rhs));
        if lt != rt {
            return Err(Error::Type(format!(
                "operand sorts differ: {} vs {}",
                lt, rt
            )));
        }
        Ok(())
    }

    /// Get the interned value for `constant`.
    pub fn const_value(&mut self, constant: Constant) -> Value {
        self.func.constant(constant)
    }

    /// An integer constant of type `ty`.
    pub fn iconst(&mut self, ty: Type, value: u64) -> Value {
        self.func.constant(Constant::int(ty, value as u128))
    }

    pub fn binop(&mut self, op: BinaryOp, lhs: Value, rhs: Value) -> Result<Value, Error> {
        self.ensure_sort(lhs, rhs)?;
        let ty = self.value_type(lhs);
        if op.is_float() && !ty.is_float_or_float_vector() {
            return Err(Error::Type(format!("float op {} on {}", op.mnemonic(), ty)));
        }
        Ok(self.push_value(InstKind::Binary { op, lhs, rhs }, ty))
    }

    pub fn cast(&mut self, op: CastOp, value: Value, ty: Type) -> Result<Value, Error> {
        let from = self.value_type(value);
        let ok = match op {
            CastOp::Trunc => from.bits() > ty.bits(),
            CastOp::ZExt | CastOp::SExt => from.bits() < ty.bits(),
            CastOp::BitCast => from.bits() == ty.bits(),
            CastOp::PtrToInt => from.is_ptr() && ty.is_int(),
            CastOp::IntToPtr => from.is_int() && ty.is_ptr(),
            CastOp::FpToUi | CastOp::FpToSi => from.is_float_or_float_vector(),
            CastOp::UiToFp | CastOp::SiToFp => ty.is_float_or_float_vector(),
            CastOp::FpTrunc => from.is_float() && ty.is_float() && from.bits() > ty.bits(),
            CastOp::FpExt => from.is_float() && ty.is_float() && from.bits() < ty.bits(),
        };
        if !ok {
            return Err(Error::Type(format!(
                "invalid {} from {} to {}",
                op.mnemonic(),
                from,
                ty
            )));
        }
        Ok(self.push_value(InstKind::Cast { op, value, ty }, ty))
    }

    pub fn trunc(&mut self, value: Value, ty: Type) -> Result<Value, Error> {
        self.cast(CastOp::Trunc, value, ty)
    }

    pub fn zext(&mut self, value: Value, ty: Type) -> Result<Value, Error> {
        self.cast(CastOp::ZExt, value, ty)
    }

    pub fn sext(&mut self, value: Value, ty: Type) -> Result<Value, Error> {
        self.cast(CastOp::SExt, value, ty)
    }

    pub fn bitcast(&mut self, value: Value, ty: Type) -> Result<Value, Error> {
        self.cast(CastOp::BitCast, value, ty)
    }

    pub fn int_to_ptr(&mut self, value: Value) -> Result<Value, Error> {
        self.cast(CastOp::IntToPtr, value, Type::Ptr)
    }

    pub fn ptr_to_int(&mut self, value: Value, ty: Type) -> Result<Value, Error> {
        self.cast(CastOp::PtrToInt, value, ty)
    }

    pub fn icmp(&mut self, pred: CmpPredicate, lhs: Value, rhs: Value) -> Result<Value, Error> {
        self.ensure_sort(lhs, rhs)?;
        let ty = self.value_type(lhs);
        let result_ty = match ty.lanes() {
            Some(lanes) => Type::vector(1, lanes, false),
            None => Type::int(1),
        };
        Ok(self.push_value(InstKind::ICmp { pred, lhs, rhs }, result_ty))
    }

    pub fn select(&mut self, cond: Value, on_true: Value, on_false: Value) -> Result<Value, Error> {
        self.ensure_sort(on_true, on_false)?;
        let ty = self.value_type(on_true);
        Ok(self.push_value(
            InstKind::Select {
                cond,
                on_true,
                on_false,
            },
            ty,
        ))
    }

    pub fn load(&mut self, ty: Type, ptr: Value, align: u32) -> Result<Value, Error> {
        if !self.value_type(ptr).is_ptr() {
            return Err(Error::Type("load address is not a pointer".into()));
        }
        Ok(self.push_value(
            InstKind::Load {
                ty,
                ptr,
                align,
                volatile: false,
            },
            ty,
        ))
    }

    pub fn store(&mut self, value: Value, ptr: Value, align: u32) -> Result<(), Error> {
        self.store_impl(value, ptr, align, false)
    }

    pub fn volatile_store(&mut self, value: Value, ptr: Value) -> Result<(), Error> {
        self.store_impl(value, ptr, 0, true)
    }

    fn store_impl(
        &mut self,
        value: Value,
        ptr: Value,
        align: u32,
        volatile: bool,
    ) -> Result<(), Error> {
        if !self.value_type(ptr).is_ptr() {
            return Err(Error::Type("store address is not a pointer".into()));
        }
        self.push(
            InstKind::Store {
                value,
                ptr,
                align,
                volatile,
            },
            Type::Void,
        );
        Ok(())
    }

    pub fn insert_element(
        &mut self,
        vector: Value,
        element: Value,
        index: Value,
    ) -> Result<Value, Error> {
        let ty = self.value_type(vector);
        if ty.elem() != Some(self.value_type(element)) {
            return Err(Error::Type("inserted element sort mismatch".into()));
        }
        Ok(self.push_value(
            InstKind::InsertElement {
                vector,
                element,
                index,
            },
            ty,
        ))
    }

    pub fn extract_element(&mut self, vector: Value, index: Value) -> Result<Value, Error> {
        let elem = self
            .value_type(vector)
            .elem()
            .ok_or_else(|| Error::Type("extract from a non-vector".into()))?;
        Ok(self.push_value(InstKind::ExtractElement { vector, index }, elem))
    }

    pub fn alloca(&mut self, ty: Type) -> Value {
        self.push_value(InstKind::Alloca { ty }, Type::Ptr)
    }

    /// Address of field `field` of the struct pointed to by `base`.
    pub fn field_addr(&mut self, base: Value, field: u32) -> Result<Value, Error> {
        if !self.value_type(base).is_ptr() {
            return Err(Error::Type("field address of a non-pointer".into()));
        }
        Ok(self.push_value(InstKind::FieldAddr { base, field }, Type::Ptr))
    }

    pub fn call(&mut self, target: FuncId, args: Vec<Value>) {
        self.push(
            InstKind::Call {
                target: CallTarget::Direct(target),
                args,
            },
            Type::Void,
        );
    }

    pub fn call_indirect(&mut self, callee: Value, args: Vec<Value>) {
        self.push(
            InstKind::Call {
                target: CallTarget::Indirect(callee),
                args,
            },
            Type::Void,
        );
    }

    /// A call to the trap intrinsic.
    pub fn trap(&mut self) {
        self.push(
            InstKind::IntrinsicCall {
                intrinsic: Intrinsic::Trap,
                args: Vec::new(),
            },
            Type::Void,
        );
    }

    /// Byte-swap, typed by its operand.
    pub fn bswap(&mut self, value: Value) -> Value {
        let ty = self.value_type(value);
        self.push_value(
            InstKind::IntrinsicCall {
                intrinsic: Intrinsic::Bswap,
                args: vec![value],
            },
            ty,
        )
    }

    /// Square root, typed by its operand.
    pub fn sqrt(&mut self, value: Value) -> Value {
        let ty = self.value_type(value);
        self.push_value(
            InstKind::IntrinsicCall {
                intrinsic: Intrinsic::Sqrt,
                args: vec![value],
            },
            ty,
        )
    }

    /// Call `translate_at` on a code-address pointer; yields the
    /// translated function pointer.
    pub fn translate_at(&mut self, ptr: Value) -> Result<Value, Error> {
        if !self.value_type(ptr).is_ptr() {
            return Err(Error::Type("translate_at takes a pointer".into()));
        }
        Ok(self.push_value(
            InstKind::IntrinsicCall {
                intrinsic: Intrinsic::TranslateAt,
                args: vec![ptr],
            },
            Type::Ptr,
        ))
    }

    pub fn fence(&mut self, ordering: AtomicOrdering, scope: SyncScope) {
        self.push(InstKind::Fence { ordering, scope }, Type::Void);
    }

    pub fn br(&mut self, target: BlockId) {
        self.push(InstKind::Br { target }, Type::Void);
    }

    pub fn ret(&mut self) {
        self.push(InstKind::Ret, Type::Void);
    }

    pub fn unreachable(&mut self) {
        self.push(InstKind::Unreachable, Type::Void);
    }

    /// The id of the last instruction inserted through this builder's
    /// block, for callers that need to inspect placement.
    pub fn last_inst(&self) -> Option<InstId> {
        self.func.block(self.block).insts().last().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Module;

    #[test]
    fn sort_mismatch() {
        let mut module = Module::new("t");
        let id = module.get_or_create_function(0);
        let func = module.function_mut(id);
        let block = func.add_block("b");
        let mut b = Builder::new(func, block);
        let lhs = b.iconst(Type::int(32), 1);
        let rhs = b.iconst(Type::int(64), 1);
        assert!(b.binop(BinaryOp::Add, lhs, rhs).is_err());
    }

    #[test]
    fn insert_at_position() {
        let mut module = Module::new("t");
        let id = module.get_or_create_function(0);
        let func = module.function_mut(id);
        let block = func.add_block("b");
        let mut b = Builder::new(func, block);
        b.trap();
        b.ret();
        let mut b = Builder::at(func, block, 1);
        b.unreachable();
        let kinds: Vec<bool> = func
            .block(block)
            .insts()
            .iter()
            .map(|i| func.inst(*i).kind().is_terminator())
            .collect();
        assert_eq!(kinds, vec![false, true, true]);
    }
}
