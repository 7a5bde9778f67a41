//! Decoded machine code.
//!
//! The translator does not decode machine code itself: a decoder hands it
//! functions of already-decoded instructions, grouped into basic blocks
//! with known start and end code addresses. These types are that handoff
//! format.

use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// One operand of a decoded instruction.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
pub enum McOperand {
    Reg(u32),
    Imm(i64),
    Fp(f64),
}

/// One decoded instruction: target opcode, byte size and operand list.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct McDecodedInst {
    address: u64,
    size: u8,
    opcode: u32,
    operands: Vec<McOperand>,
}

impl McDecodedInst {
    pub fn new(address: u64, size: u8, opcode: u32, operands: Vec<McOperand>) -> McDecodedInst {
        McDecodedInst {
            address,
            size,
            opcode,
            operands,
        }
    }

    pub fn address(&self) -> u64 {
        self.address
    }

    pub fn size(&self) -> u8 {
        self.size
    }

    pub fn opcode(&self) -> u32 {
        self.opcode
    }

    pub fn operands(&self) -> &[McOperand] {
        &self.operands
    }

    pub fn operand(&self, index: usize) -> Option<&McOperand> {
        self.operands.get(index)
    }

    /// The register number of operand `index`.
    pub fn reg_op(&self, index: usize) -> Result<u32, Error> {
        match self.operands.get(index) {
            Some(McOperand::Reg(reg)) => Ok(*reg),
            _ => Err(Error::BadOperand {
                index,
                inst: self.to_string(),
            }),
        }
    }

    /// The immediate value of operand `index`.
    pub fn imm_op(&self, index: usize) -> Result<i64, Error> {
        match self.operands.get(index) {
            Some(McOperand::Imm(imm)) => Ok(*imm),
            _ => Err(Error::BadOperand {
                index,
                inst: self.to_string(),
            }),
        }
    }
}

impl fmt::Display for McDecodedInst {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:x}: opc{}", self.address, self.opcode)?;
        for (i, op) in self.operands.iter().enumerate() {
            let sep = if i == 0 { ' ' } else { ',' };
            match op {
                McOperand::Reg(r) => write!(f, "{}r{}", sep, r)?,
                McOperand::Imm(v) => write!(f, "{}{}", sep, v)?,
                McOperand::Fp(v) => write!(f, "{}{}", sep, v)?,
            }
        }
        Ok(())
    }
}

/// A decoded basic block: a linear run of instructions from `start` up
/// to (exclusive) `end`, the fall-through address.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct McBasicBlock {
    start: u64,
    end: u64,
    insts: Vec<McDecodedInst>,
}

impl McBasicBlock {
    pub fn new(start: u64, end: u64, insts: Vec<McDecodedInst>) -> McBasicBlock {
        McBasicBlock { start, end, insts }
    }

    pub fn start(&self) -> u64 {
        self.start
    }

    /// The first address past this block: where execution falls through.
    pub fn end(&self) -> u64 {
        self.end
    }

    pub fn insts(&self) -> &[McDecodedInst] {
        &self.insts
    }
}

/// A decoded function: basic blocks keyed by start address.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct McFunction {
    start_addr: u64,
    blocks: BTreeMap<u64, McBasicBlock>,
}

impl McFunction {
    pub fn new(start_addr: u64) -> McFunction {
        McFunction {
            start_addr,
            blocks: BTreeMap::new(),
        }
    }

    pub fn start_addr(&self) -> u64 {
        self.start_addr
    }

    pub fn add_block(&mut self, block: McBasicBlock) {
        self.blocks.insert(block.start(), block);
    }

    pub fn block(&self, start: u64) -> Option<&McBasicBlock> {
        self.blocks.get(&start)
    }

    pub fn blocks(&self) -> impl Iterator<Item = &McBasicBlock> {
        self.blocks.values()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}
