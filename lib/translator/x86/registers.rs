//! The x86-64 register file as seen by the translator.
//!
//! Registers are numbered by their index in `REGISTERS`. Each entry
//! knows its containing full-width register, its bit offset inside it,
//! and which register-set field the full register lives in.

use crate::error::Error;
use crate::ir::Type;

/// Register numbers. These index `REGISTERS`.
#[rustfmt::skip]
pub mod reg {
    pub const RAX: u32 = 0;  pub const EAX: u32 = 1;  pub const AX: u32 = 2;  pub const AH: u32 = 3;  pub const AL: u32 = 4;
    pub const RBX: u32 = 5;  pub const EBX: u32 = 6;  pub const BX: u32 = 7;  pub const BH: u32 = 8;  pub const BL: u32 = 9;
    pub const RCX: u32 = 10; pub const ECX: u32 = 11; pub const CX: u32 = 12; pub const CH: u32 = 13; pub const CL: u32 = 14;
    pub const RDX: u32 = 15; pub const EDX: u32 = 16; pub const DX: u32 = 17; pub const DH: u32 = 18; pub const DL: u32 = 19;
    pub const RSI: u32 = 20; pub const ESI: u32 = 21; pub const SI: u32 = 22;
    pub const RDI: u32 = 23; pub const EDI: u32 = 24; pub const DI: u32 = 25;
    pub const RSP: u32 = 26; pub const ESP: u32 = 27; pub const SP: u32 = 28;
    pub const RBP: u32 = 29; pub const EBP: u32 = 30; pub const BP: u32 = 31;
    pub const R8: u32 = 32;  pub const R8D: u32 = 33;
    pub const R9: u32 = 34;  pub const R9D: u32 = 35;
    pub const R10: u32 = 36; pub const R10D: u32 = 37;
    pub const R11: u32 = 38; pub const R11D: u32 = 39;
    pub const R12: u32 = 40; pub const R12D: u32 = 41;
    pub const R13: u32 = 42; pub const R13D: u32 = 43;
    pub const R14: u32 = 44; pub const R14D: u32 = 45;
    pub const R15: u32 = 46; pub const R15D: u32 = 47;
    pub const RIP: u32 = 48;
    pub const EFLAGS: u32 = 49;
    pub const XMM0: u32 = 50;  pub const XMM1: u32 = 51;  pub const XMM2: u32 = 52;  pub const XMM3: u32 = 53;
    pub const XMM4: u32 = 54;  pub const XMM5: u32 = 55;  pub const XMM6: u32 = 56;  pub const XMM7: u32 = 57;
    pub const XMM8: u32 = 58;  pub const XMM9: u32 = 59;  pub const XMM10: u32 = 60; pub const XMM11: u32 = 61;
    pub const XMM12: u32 = 62; pub const XMM13: u32 = 63; pub const XMM14: u32 = 64; pub const XMM15: u32 = 65;

    /// "No register": used where an addressing mode has no index.
    pub const NONE: u32 = u32::MAX;
}

/// Struct for dealing with x86-64 registers.
pub(crate) struct X86Register {
    pub name: &'static str,
    /// The full register. For example, `rax` is the full register for
    /// `al`.
    pub full: u32,
    /// The register-set field holding the full register.
    pub field: u32,
    /// The offset of this register. For example, `ah` is offset 8 bits
    /// into `rax`.
    pub offset: u32,
    /// The size of this register in bits.
    pub bits: u32,
    /// The size of the full register in bits.
    pub full_bits: u32,
}

impl X86Register {
    /// Returns true if this is a full-width register (i.e. rax, rbx,
    /// etc).
    pub fn is_full(&self) -> bool {
        self.bits == self.full_bits
    }
}

use self::reg::*;

#[rustfmt::skip]
pub(crate) const REGISTERS: &[X86Register] = &[
    X86Register { name: "rax",    full: RAX, field: 0,  offset: 0, bits: 64,  full_bits: 64 },
    X86Register { name: "eax",    full: RAX, field: 0,  offset: 0, bits: 32,  full_bits: 64 },
    X86Register { name: "ax",     full: RAX, field: 0,  offset: 0, bits: 16,  full_bits: 64 },
    X86Register { name: "ah",     full: RAX, field: 0,  offset: 8, bits: 8,   full_bits: 64 },
    X86Register { name: "al",     full: RAX, field: 0,  offset: 0, bits: 8,   full_bits: 64 },
    X86Register { name: "rbx",    full: RBX, field: 1,  offset: 0, bits: 64,  full_bits: 64 },
    X86Register { name: "ebx",    full: RBX, field: 1,  offset: 0, bits: 32,  full_bits: 64 },
    X86Register { name: "bx",     full: RBX, field: 1,  offset: 0, bits: 16,  full_bits: 64 },
    X86Register { name: "bh",     full: RBX, field: 1,  offset: 8, bits: 8,   full_bits: 64 },
    X86Register { name: "bl",     full: RBX, field: 1,  offset: 0, bits: 8,   full_bits: 64 },
    X86Register { name: "rcx",    full: RCX, field: 2,  offset: 0, bits: 64,  full_bits: 64 },
    X86Register { name: "ecx",    full: RCX, field: 2,  offset: 0, bits: 32,  full_bits: 64 },
    X86Register { name: "cx",     full: RCX, field: 2,  offset: 0, bits: 16,  full_bits: 64 },
    X86Register { name: "ch",     full: RCX, field: 2,  offset: 8, bits: 8,   full_bits: 64 },
    X86Register { name: "cl",     full: RCX, field: 2,  offset: 0, bits: 8,   full_bits: 64 },
    X86Register { name: "rdx",    full: RDX, field: 3,  offset: 0, bits: 64,  full_bits: 64 },
    X86Register { name: "edx",    full: RDX, field: 3,  offset: 0, bits: 32,  full_bits: 64 },
    X86Register { name: "dx",     full: RDX, field: 3,  offset: 0, bits: 16,  full_bits: 64 },
    X86Register { name: "dh",     full: RDX, field: 3,  offset: 8, bits: 8,   full_bits: 64 },
    X86Register { name: "dl",     full: RDX, field: 3,  offset: 0, bits: 8,   full_bits: 64 },
    X86Register { name: "rsi",    full: RSI, field: 4,  offset: 0, bits: 64,  full_bits: 64 },
    X86Register { name: "esi",    full: RSI, field: 4,  offset: 0, bits: 32,  full_bits: 64 },
    X86Register { name: "si",     full: RSI, field: 4,  offset: 0, bits: 16,  full_bits: 64 },
    X86Register { name: "rdi",    full: RDI, field: 5,  offset: 0, bits: 64,  full_bits: 64 },
    X86Register { name: "edi",    full: RDI, field: 5,  offset: 0, bits: 32,  full_bits: 64 },
    X86Register { name: "di",     full: RDI, field: 5,  offset: 0, bits: 16,  full_bits: 64 },
    X86Register { name: "rsp",    full: RSP, field: 6,  offset: 0, bits: 64,  full_bits: 64 },
    X86Register { name: "esp",    full: RSP, field: 6,  offset: 0, bits: 32,  full_bits: 64 },
    X86Register { name: "sp",     full: RSP, field: 6,  offset: 0, bits: 16,  full_bits: 64 },
    X86Register { name: "rbp",    full: RBP, field: 7,  offset: 0, bits: 64,  full_bits: 64 },
    X86Register { name: "ebp",    full: RBP, field: 7,  offset: 0, bits: 32,  full_bits: 64 },
    X86Register { name: "bp",     full: RBP, field: 7,  offset: 0, bits: 16,  full_bits: 64 },
    X86Register { name: "r8",     full: R8,  field: 8,  offset: 0, bits: 64,  full_bits: 64 },
    X86Register { name: "r8d",    full: R8,  field: 8,  offset: 0, bits: 32,  full_bits: 64 },
    X86Register { name: "r9",     full: R9,  field: 9,  offset: 0, bits: 64,  full_bits: 64 },
    X86Register { name: "r9d",    full: R9,  field: 9,  offset: 0, bits: 32,  full_bits: 64 },
    X86Register { name: "r10",    full: R10, field: 10, offset: 0, bits: 64,  full_bits: 64 },
    X86Register { name: "r10d",   full: R10, field: 10, offset: 0, bits: 32,  full_bits: 64 },
    X86Register { name: "r11",    full: R11, field: 11, offset: 0, bits: 64,  full_bits: 64 },
    X86Register { name: "r11d",   full: R11, field: 11, offset: 0, bits: 32,  full_bits: 64 },
    X86Register { name: "r12",    full: R12, field: 12, offset: 0, bits: 64,  full_bits: 64 },
    X86Register { name: "r12d",   full: R12, field: 12, offset: 0, bits: 32,  full_bits: 64 },
    X86Register { name: "r13",    full: R13, field: 13, offset: 0, bits: 64,  full_bits: 64 },
    X86Register { name: "r13d",   full: R13, field: 13, offset: 0, bits: 32,  full_bits: 64 },
    X86Register { name: "r14",    full: R14, field: 14, offset: 0, bits: 64,  full_bits: 64 },
    X86Register { name: "r14d",   full: R14, field: 14, offset: 0, bits: 32,  full_bits: 64 },
    X86Register { name: "r15",    full: R15, field: 15, offset: 0, bits: 64,  full_bits: 64 },
    X86Register { name: "r15d",   full: R15, field: 15, offset: 0, bits: 32,  full_bits: 64 },
    X86Register { name: "rip",    full: RIP, field: 16, offset: 0, bits: 64,  full_bits: 64 },
    X86Register { name: "eflags", full: EFLAGS, field: 17, offset: 0, bits: 64, full_bits: 64 },
    X86Register { name: "xmm0",   full: XMM0,  field: 18, offset: 0, bits: 128, full_bits: 128 },
    X86Register { name: "xmm1",   full: XMM1,  field: 19, offset: 0, bits: 128, full_bits: 128 },
    X86Register { name: "xmm2",   full: XMM2,  field: 20, offset: 0, bits: 128, full_bits: 128 },
    X86Register { name: "xmm3",   full: XMM3,  field: 21, offset: 0, bits: 128, full_bits: 128 },
    X86Register { name: "xmm4",   full: XMM4,  field: 22, offset: 0, bits: 128, full_bits: 128 },
    X86Register { name: "xmm5",   full: XMM5,  field: 23, offset: 0, bits: 128, full_bits: 128 },
    X86Register { name: "xmm6",   full: XMM6,  field: 24, offset: 0, bits: 128, full_bits: 128 },
    X86Register { name: "xmm7",   full: XMM7,  field: 25, offset: 0, bits: 128, full_bits: 128 },
    X86Register { name: "xmm8",   full: XMM8,  field: 26, offset: 0, bits: 128, full_bits: 128 },
    X86Register { name: "xmm9",   full: XMM9,  field: 27, offset: 0, bits: 128, full_bits: 128 },
    X86Register { name: "xmm10",  full: XMM10, field: 28, offset: 0, bits: 128, full_bits: 128 },
    X86Register { name: "xmm11",  full: XMM11, field: 29, offset: 0, bits: 128, full_bits: 128 },
    X86Register { name: "xmm12",  full: XMM12, field: 30, offset: 0, bits: 128, full_bits: 128 },
    X86Register { name: "xmm13",  full: XMM13, field: 31, offset: 0, bits: 128, full_bits: 128 },
    X86Register { name: "xmm14",  full: XMM14, field: 32, offset: 0, bits: 128, full_bits: 128 },
    X86Register { name: "xmm15",  full: XMM15, field: 33, offset: 0, bits: 128, full_bits: 128 },
];

/// The number of register-set fields.
pub const REG_SET_NUM_FIELDS: u32 = 34;

/// The type of a register-set field.
pub fn field_type(field: u32) -> Type {
    if field >= 18 {
        Type::int(128)
    } else {
        Type::int(64)
    }
}

/// Takes a register number and returns an `X86Register`.
pub(crate) fn get_register(reg: u32) -> Result<&'static X86Register, Error> {
    REGISTERS
        .get(reg as usize)
        .ok_or_else(|| format!("Could not find register {}", reg).into())
}
