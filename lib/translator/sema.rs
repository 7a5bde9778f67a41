//! The semantic tape: generator-produced tables describing instruction
//! semantics.
//!
//! An offline table generator compiles each target instruction's effect
//! on the register file into three parallel arrays:
//!
//! * `opcode_to_sema_idx[target_opcode]` — start index of the
//!   instruction's semantics in the tape, or `NO_SEMANTICS`;
//! * `semantics` — a flat stream of 16-bit tokens interleaving semantic
//!   opcodes and their inline operands (machine-operand indices,
//!   register numbers, constant-pool indices, value-type tags);
//! * `constants` — a pool of 64-bit constants referenced by
//!   `MOV_CONSTANT`.
//!
//! Each instruction's semantics is the subsequence ending at the next
//! `END_OF_INSTRUCTION` token. The layout is ABI between the generator
//! and this translator; both must be regenerated together.

use crate::error::Error;
use crate::ir::Type;
use serde::{Deserialize, Serialize};

/// Sentinel in `opcode_to_sema_idx`: the opcode has no semantics.
pub const NO_SEMANTICS: u32 = u32::MAX;

/// First semantic opcode value reserved for target-specific operations.
pub const BUILTIN_OP_END: u16 = 0x0100;

/// First semantic opcode value of the pseudo-opcode namespace.
pub const PSEUDO_OP_START: u16 = 0x0200;

/// The shared, target-independent semantic opcodes.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[repr(u16)]
pub enum IrOpcode {
    Add = 0x01,
    Sub = 0x02,
    Mul = 0x03,
    UDiv = 0x04,
    SDiv = 0x05,
    URem = 0x06,
    SRem = 0x07,
    And = 0x08,
    Or = 0x09,
    Xor = 0x0a,
    Shl = 0x0b,
    Srl = 0x0c,
    Sra = 0x0d,
    Rotl = 0x0e,
    FAdd = 0x0f,
    FSub = 0x10,
    FMul = 0x11,
    FDiv = 0x12,
    FRem = 0x13,
    Truncate = 0x14,
    BitCast = 0x15,
    ZeroExtend = 0x16,
    SignExtend = 0x17,
    FpToUint = 0x18,
    FpToSint = 0x19,
    UintToFp = 0x1a,
    SintToFp = 0x1b,
    FpRound = 0x1c,
    FpExtend = 0x1d,
    FSqrt = 0x1e,
    Bswap = 0x1f,
    InsertVectorElt = 0x20,
    ExtractVectorElt = 0x21,
    SMulLoHi = 0x22,
    UMulLoHi = 0x23,
    Load = 0x24,
    Store = 0x25,
    Br = 0x26,
    BrInd = 0x27,
    Trap = 0x28,
    AtomicFence = 0x29,
}

impl IrOpcode {
    pub fn from_raw(raw: u16) -> Option<IrOpcode> {
        use IrOpcode::*;
        Some(match raw {
            0x01 => Add,
            0x02 => Sub,
            0x03 => Mul,
            0x04 => UDiv,
            0x05 => SDiv,
            0x06 => URem,
            0x07 => SRem,
            0x08 => And,
            0x09 => Or,
            0x0a => Xor,
            0x0b => Shl,
            0x0c => Srl,
            0x0d => Sra,
            0x0e => Rotl,
            0x0f => FAdd,
            0x10 => FSub,
            0x11 => FMul,
            0x12 => FDiv,
            0x13 => FRem,
            0x14 => Truncate,
            0x15 => BitCast,
            0x16 => ZeroExtend,
            0x17 => SignExtend,
            0x18 => FpToUint,
            0x19 => FpToSint,
            0x1a => UintToFp,
            0x1b => SintToFp,
            0x1c => FpRound,
            0x1d => FpExtend,
            0x1e => FSqrt,
            0x1f => Bswap,
            0x20 => InsertVectorElt,
            0x21 => ExtractVectorElt,
            0x22 => SMulLoHi,
            0x23 => UMulLoHi,
            0x24 => Load,
            0x25 => Store,
            0x26 => Br,
            0x27 => BrInd,
            0x28 => Trap,
            0x29 => AtomicFence,
            _ => return None,
        })
    }
}

/// Pseudo-opcodes: tape constructs with no direct IR counterpart.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[repr(u16)]
pub enum PseudoOp {
    EndOfInstruction = PSEUDO_OP_START,
    PutRc = 0x0201,
    PutReg = 0x0202,
    GetRc = 0x0203,
    GetReg = 0x0204,
    CustomOp = 0x0205,
    ComplexPattern = 0x0206,
    Predicate = 0x0207,
    ConstantOp = 0x0208,
    MovConstant = 0x0209,
    Implicit = 0x020a,
}

impl PseudoOp {
    pub fn from_raw(raw: u16) -> Option<PseudoOp> {
        use PseudoOp::*;
        Some(match raw {
            0x0200 => EndOfInstruction,
            0x0201 => PutRc,
            0x0202 => PutReg,
            0x0203 => GetRc,
            0x0204 => GetReg,
            0x0205 => CustomOp,
            0x0206 => ComplexPattern,
            0x0207 => Predicate,
            0x0208 => ConstantOp,
            0x0209 => MovConstant,
            0x020a => Implicit,
            _ => return None,
        })
    }
}

/// A decoded semantic opcode token.
///
/// The raw token space splits into three ranges: shared IR-level
/// opcodes below `BUILTIN_OP_END`, target-specific opcodes up to
/// `PSEUDO_OP_START`, and pseudo-opcodes above.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SemaOp {
    Ir(IrOpcode),
    Target(u16),
    Pseudo(PseudoOp),
}

impl SemaOp {
    pub fn decode(raw: u16) -> Result<SemaOp, Error> {
        if raw >= PSEUDO_OP_START {
            PseudoOp::from_raw(raw).map(SemaOp::Pseudo)
        } else if raw >= BUILTIN_OP_END {
            Some(SemaOp::Target(raw))
        } else {
            IrOpcode::from_raw(raw).map(SemaOp::Ir)
        }
        .ok_or(Error::UnknownOpcode {
            opcode: raw,
            inst: String::new(),
        })
    }
}

/// Value-type tags appearing in the tape after every semantic opcode.
pub mod vt {
    /// No result (void).
    pub const NONE: u16 = 0;
    pub const I1: u16 = 1;
    pub const I8: u16 = 2;
    pub const I16: u16 = 3;
    pub const I32: u16 = 4;
    pub const I64: u16 = 5;
    pub const I128: u16 = 6;
    pub const F32: u16 = 7;
    pub const F64: u16 = 8;
    pub const V16I8: u16 = 9;
    pub const V8I16: u16 = 10;
    pub const V4I32: u16 = 11;
    pub const V2I64: u16 = 12;
    pub const V4F32: u16 = 13;
    pub const V2F64: u16 = 14;
    pub const V32I8: u16 = 15;
    pub const V16I16: u16 = 16;
    pub const V8I32: u16 = 17;
    pub const V4I64: u16 = 18;
    pub const V8F32: u16 = 19;
    pub const V4F64: u16 = 20;
    /// Pointer-sized integer. Resolved to a 64-bit integer; the module
    /// data layout is not consulted.
    pub const IPTR: u16 = 31;
}

/// Decode a value-type tag. Returns `None` for tags the generator never
/// produces.
pub fn decode_vt(tag: u16) -> Option<Type> {
    Some(match tag {
        vt::NONE => Type::Void,
        vt::I1 => Type::int(1),
        vt::I8 => Type::int(8),
        vt::I16 => Type::int(16),
        vt::I32 => Type::int(32),
        vt::I64 => Type::int(64),
        vt::I128 => Type::int(128),
        vt::F32 => Type::float(32),
        vt::F64 => Type::float(64),
        vt::V16I8 => Type::vector(8, 16, false),
        vt::V8I16 => Type::vector(16, 8, false),
        vt::V4I32 => Type::vector(32, 4, false),
        vt::V2I64 => Type::vector(64, 2, false),
        vt::V4F32 => Type::vector(32, 4, true),
        vt::V2F64 => Type::vector(64, 2, true),
        vt::V32I8 => Type::vector(8, 32, false),
        vt::V16I16 => Type::vector(16, 16, false),
        vt::V8I32 => Type::vector(32, 8, false),
        vt::V4I64 => Type::vector(64, 4, false),
        vt::V8F32 => Type::vector(32, 8, true),
        vt::V4F64 => Type::vector(64, 4, true),
        vt::IPTR => Type::int(64),
        _ => return None,
    })
}

/// Predicate identifiers: named memory access patterns and composite
/// operations referenced by `PREDICATE` tokens.
pub mod pred {
    pub const MEMOP: u16 = 1;
    pub const LOADI16: u16 = 2;
    pub const LOADI32: u16 = 3;
    pub const ALIGNEDLOAD: u16 = 4;
    pub const ALIGNEDLOAD256: u16 = 5;
    pub const ALIGNEDLOAD512: u16 = 6;
    pub const LOAD: u16 = 7;
    pub const ALIGNEDNONTEMPORALSTORE: u16 = 8;
    pub const NONTEMPORALSTORE: u16 = 9;
    pub const ALIGNEDSTORE: u16 = 10;
    pub const ALIGNEDSTORE256: u16 = 11;
    pub const ALIGNEDSTORE512: u16 = 12;
    pub const STORE: u16 = 13;
    pub const ZEXTLOADI8: u16 = 14;
    pub const ZEXTLOADI16: u16 = 15;
    pub const SEXTLOADI8: u16 = 16;
    pub const SEXTLOADI16: u16 = 17;
    pub const SEXTLOADI32: u16 = 18;
    pub const AND_SU: u16 = 19;
}

/// The three parallel semantics arrays, borrowed read-only for the
/// lifetime of a translation.
#[derive(Clone, Copy, Debug)]
pub struct SemanticsTable<'a> {
    opcode_to_sema_idx: &'a [u32],
    semantics: &'a [u16],
    constants: &'a [u64],
}

impl<'a> SemanticsTable<'a> {
    pub fn new(
        opcode_to_sema_idx: &'a [u32],
        semantics: &'a [u16],
        constants: &'a [u64],
    ) -> SemanticsTable<'a> {
        SemanticsTable {
            opcode_to_sema_idx,
            semantics,
            constants,
        }
    }

    /// The tape index of an instruction's semantics, or `None` when the
    /// opcode is out of range or marked `NO_SEMANTICS`.
    pub fn sema_index(&self, mc_opcode: u32) -> Option<usize> {
        match self.opcode_to_sema_idx.get(mc_opcode as usize) {
            Some(&idx) if idx != NO_SEMANTICS => Some(idx as usize),
            _ => None,
        }
    }

    /// A constant-pool entry. The generator guarantees indices are in
    /// range.
    pub fn constant(&self, index: usize) -> u64 {
        self.constants[index]
    }

    /// A cursor positioned at `index` in the semantics stream.
    pub fn cursor(&self, index: usize) -> TapeCursor<'a> {
        TapeCursor {
            tape: self.semantics,
            idx: index,
        }
    }
}

/// A stateful cursor over the semantics stream.
///
/// The generator guarantees every instruction's stream is terminated by
/// `END_OF_INSTRUCTION`; reading past the end of a well-formed stream is
/// a generator bug and panics.
#[derive(Clone, Debug)]
pub struct TapeCursor<'a> {
    tape: &'a [u16],
    idx: usize,
}

impl<'a> TapeCursor<'a> {
    /// The next raw token.
    pub fn next(&mut self) -> u16 {
        let token = self.tape[self.idx];
        self.idx += 1;
        token
    }

    /// Decode the next token as a value type.
    pub fn next_vt(&mut self) -> Type {
        let tag = self.next();
        match decode_vt(tag) {
            Some(ty) => ty,
            None => panic!("malformed semantics: unknown value type tag {:#x}", tag),
        }
    }

    /// The current position in the stream.
    pub fn index(&self) -> usize {
        self.idx
    }
}
