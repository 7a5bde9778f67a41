//! IR instructions.

use crate::ir::{BlockId, FuncId, Type, Value};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Two-operand arithmetic and bitwise operations.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    UDiv,
    SDiv,
    URem,
    SRem,
    And,
    Or,
    Xor,
    Shl,
    LShr,
    AShr,
    FAdd,
    FSub,
    FMul,
    FDiv,
    FRem,
}

impl BinaryOp {
    pub fn is_shift(&self) -> bool {
        matches!(self, BinaryOp::Shl | BinaryOp::LShr | BinaryOp::AShr)
    }

    pub fn is_float(&self) -> bool {
        matches!(
            self,
            BinaryOp::FAdd | BinaryOp::FSub | BinaryOp::FMul | BinaryOp::FDiv | BinaryOp::FRem
        )
    }

    pub fn mnemonic(&self) -> &'static str {
        match self {
            BinaryOp::Add => "add",
            BinaryOp::Sub => "sub",
            BinaryOp::Mul => "mul",
            BinaryOp::UDiv => "udiv",
            BinaryOp::SDiv => "sdiv",
            BinaryOp::URem => "urem",
            BinaryOp::SRem => "srem",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
            BinaryOp::Xor => "xor",
            BinaryOp::Shl => "shl",
            BinaryOp::LShr => "lshr",
            BinaryOp::AShr => "ashr",
            BinaryOp::FAdd => "fadd",
            BinaryOp::FSub => "fsub",
            BinaryOp::FMul => "fmul",
            BinaryOp::FDiv => "fdiv",
            BinaryOp::FRem => "frem",
        }
    }
}

/// Value conversions.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum CastOp {
    Trunc,
    ZExt,
    SExt,
    BitCast,
    PtrToInt,
    IntToPtr,
    FpToUi,
    FpToSi,
    UiToFp,
    SiToFp,
    FpTrunc,
    FpExt,
}

impl CastOp {
    pub fn mnemonic(&self) -> &'static str {
        match self {
            CastOp::Trunc => "trunc",
            CastOp::ZExt => "zext",
            CastOp::SExt => "sext",
            CastOp::BitCast => "bitcast",
            CastOp::PtrToInt => "ptrtoint",
            CastOp::IntToPtr => "inttoptr",
            CastOp::FpToUi => "fptoui",
            CastOp::FpToSi => "fptosi",
            CastOp::UiToFp => "uitofp",
            CastOp::SiToFp => "sitofp",
            CastOp::FpTrunc => "fptrunc",
            CastOp::FpExt => "fpext",
        }
    }
}

/// Integer comparison predicates.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum CmpPredicate {
    Eq,
    Ne,
    Ult,
    Ule,
    Ugt,
    Uge,
    Slt,
    Sle,
    Sgt,
    Sge,
}

impl CmpPredicate {
    pub fn mnemonic(&self) -> &'static str {
        match self {
            CmpPredicate::Eq => "eq",
            CmpPredicate::Ne => "ne",
            CmpPredicate::Ult => "ult",
            CmpPredicate::Ule => "ule",
            CmpPredicate::Ugt => "ugt",
            CmpPredicate::Uge => "uge",
            CmpPredicate::Slt => "slt",
            CmpPredicate::Sle => "sle",
            CmpPredicate::Sgt => "sgt",
            CmpPredicate::Sge => "sge",
        }
    }
}

/// Memory ordering for fences.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum AtomicOrdering {
    Unordered,
    Monotonic,
    Acquire,
    Release,
    AcqRel,
    SeqCst,
}

impl AtomicOrdering {
    /// Decode a semantics-tape ordering token.
    pub fn from_token(token: u64) -> Option<AtomicOrdering> {
        match token {
            1 => Some(AtomicOrdering::Unordered),
            2 => Some(AtomicOrdering::Monotonic),
            4 => Some(AtomicOrdering::Acquire),
            5 => Some(AtomicOrdering::Release),
            6 => Some(AtomicOrdering::AcqRel),
            7 => Some(AtomicOrdering::SeqCst),
            _ => None,
        }
    }
}

/// Synchronization scope for fences.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum SyncScope {
    SingleThread,
    System,
}

impl SyncScope {
    /// Decode a semantics-tape scope token.
    pub fn from_token(token: u64) -> Option<SyncScope> {
        match token {
            0 => Some(SyncScope::SingleThread),
            1 => Some(SyncScope::System),
            _ => None,
        }
    }
}

/// The runtime-support intrinsics the translator emits calls to.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum Intrinsic {
    /// Abort execution.
    Trap,
    /// Byte-swap an integer.
    Bswap,
    /// Floating-point square root.
    Sqrt,
    /// `translate_at(ptr) -> ptr`: resolved by the embedder at runtime
    /// to the translated function for a target code address.
    TranslateAt,
}

impl Intrinsic {
    pub fn name(&self) -> &'static str {
        match self {
            Intrinsic::Trap => "trap",
            Intrinsic::Bswap => "bswap",
            Intrinsic::Sqrt => "sqrt",
            Intrinsic::TranslateAt => "translate_at",
        }
    }
}

/// The callee of a `Call` instruction.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum CallTarget {
    Direct(FuncId),
    Indirect(Value),
}

/// An IR instruction.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum InstKind {
    Binary {
        op: BinaryOp,
        lhs: Value,
        rhs: Value,
    },
    Cast {
        op: CastOp,
        value: Value,
        ty: Type,
    },
    ICmp {
        pred: CmpPredicate,
        lhs: Value,
        rhs: Value,
    },
    Select {
        cond: Value,
        on_true: Value,
        on_false: Value,
    },
    Load {
        ty: Type,
        ptr: Value,
        align: u32,
        volatile: bool,
    },
    Store {
        value: Value,
        ptr: Value,
        align: u32,
        volatile: bool,
    },
    InsertElement {
        vector: Value,
        element: Value,
        index: Value,
    },
    ExtractElement {
        vector: Value,
        index: Value,
    },
    Alloca {
        ty: Type,
    },
    /// Address of a field of a module struct type, used to access the
    /// register-set the translated function receives.
    FieldAddr {
        base: Value,
        field: u32,
    },
    Call {
        target: CallTarget,
        args: Vec<Value>,
    },
    IntrinsicCall {
        intrinsic: Intrinsic,
        args: Vec<Value>,
    },
    Fence {
        ordering: AtomicOrdering,
        scope: SyncScope,
    },
    Br {
        target: BlockId,
    },
    Ret,
    Unreachable,
}

impl InstKind {
    /// True if this instruction ends a basic block.
    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            InstKind::Br { .. } | InstKind::Ret | InstKind::Unreachable
        )
    }

    pub fn is_call(&self) -> bool {
        matches!(self, InstKind::Call { .. })
    }
}

/// An instruction plus its result value, if it produces one.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct Inst {
    kind: InstKind,
    result: Option<Value>,
}

impl Inst {
    pub(crate) fn new(kind: InstKind, result: Option<Value>) -> Inst {
        Inst { kind, result }
    }

    pub fn kind(&self) -> &InstKind {
        &self.kind
    }

    pub fn result(&self) -> Option<Value> {
        self.result
    }
}

impl fmt::Display for Intrinsic {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}
