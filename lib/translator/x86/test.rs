use crate::ir::{
    BinaryOp, BlockId, CastOp, Function, InstKind, Module, Type,
};
use crate::mc::{McBasicBlock, McDecodedInst, McFunction, McOperand};
use crate::translator::sema::{vt, IrOpcode, PseudoOp, SemanticsTable};
use crate::translator::x86::registers::REGISTERS;
use crate::translator::x86::{
    custom_ops, opcodes, patterns, reg, X86RegisterSema, X86TargetSemantics, NOOP,
};
use crate::translator::{FunctionTranslator, Options};

const END: u16 = PseudoOp::EndOfInstruction as u16;
const GET_RC: u16 = PseudoOp::GetRc as u16;
const PUT_RC: u16 = PseudoOp::PutRc as u16;
const CUSTOM_OP: u16 = PseudoOp::CustomOp as u16;
const COMPLEX_PATTERN: u16 = PseudoOp::ComplexPattern as u16;
const IMPLICIT: u16 = PseudoOp::Implicit as u16;

// Decoder opcode numbers for the instructions under test. The real
// numbering comes from the decoder's generated tables; tests only need
// the translator and the index table to agree.
const PCMPEQQ_RR: u32 = 1;
const PCMPEQQ_RM: u32 = 2;
const ADD8RI: u32 = 3;
const CLOBBER_FLAGS: u32 = 4;

// Filler for opcodes without semantics in a test table.
const NOOP_PAD: u32 = crate::translator::sema::NO_SEMANTICS;

struct Tables {
    idx: Vec<u32>,
    sema: Vec<u16>,
    consts: Vec<u64>,
}

impl Tables {
    fn table(&self) -> SemanticsTable {
        SemanticsTable::new(&self.idx, &self.sema, &self.consts)
    }
}

fn translate(tables: &Tables, insts: Vec<McDecodedInst>) -> Module {
    let table = tables.table();
    let start = insts[0].address();
    let end = insts
        .last()
        .map(|inst| inst.address() + inst.size() as u64)
        .unwrap();
    let mut mc_fn = McFunction::new(start);
    mc_fn.add_block(McBasicBlock::new(start, end, insts));

    let mut module = Module::new("x86-test");
    let mut rsi = X86RegisterSema::new(&mut module);
    let mut target = X86TargetSemantics::new();
    let options = Options::new();
    let mut ft =
        FunctionTranslator::new(&mut module, &mc_fn, &table, &mut rsi, &options).unwrap();
    ft.translate(&mut target).unwrap();
    ft.finalize().unwrap();
    module
}

fn body<'f>(func: &'f Function, name: &str) -> (BlockId, Vec<&'f InstKind>) {
    let block = func.block_by_name(name).unwrap();
    let kinds = func
        .block(block)
        .insts()
        .iter()
        .map(|id| func.inst(*id).kind())
        .collect();
    (block, kinds)
}

fn xmm_field(xmm: u32) -> u32 {
    REGISTERS[xmm as usize].field
}

#[test]
fn pcmpeqq_register_register() {
    // pcmpeqq %xmm10, %xmm8 (6 bytes)
    let tables = Tables {
        idx: vec![NOOP_PAD, 0, NOOP_PAD, NOOP_PAD, NOOP_PAD],
        sema: vec![
            GET_RC, vt::V2I64, 1,
            GET_RC, vt::V2I64, 2,
            opcodes::PCMPEQ, vt::V2I64,
            PUT_RC, vt::NONE, 0,
            END,
        ],
        consts: vec![],
    };
    let module = translate(
        &tables,
        vec![McDecodedInst::new(
            0x1000,
            6,
            PCMPEQQ_RR,
            vec![
                McOperand::Reg(reg::XMM8),
                McOperand::Reg(reg::XMM8),
                McOperand::Reg(reg::XMM10),
            ],
        )],
    );

    let func = module.function(module.function_by_address(0x1000).unwrap());
    func.verify().unwrap();
    let (_, kinds) = body(func, "bb_1000");

    // RIP seed (2) and RIP += 6 (5) come first.
    assert!(matches!(kinds[2], InstKind::FieldAddr { field: 16, .. }));
    assert!(matches!(
        kinds[4],
        InstKind::Binary { op: BinaryOp::Add, .. }
    ));

    // Then: both sources read as i128 and bitcast to <2 x i64>, the
    // lanewise compare-and-select, a bitcast back to i128, and the
    // store to xmm8.
    let v2i64 = Type::vector(64, 2, false);
    let i128 = Type::int(128);
    assert!(matches!(kinds[7], InstKind::FieldAddr { field, .. } if *field == xmm_field(reg::XMM8)));
    assert!(matches!(kinds[8], InstKind::Load { ty, .. } if *ty == i128));
    assert!(matches!(kinds[9], InstKind::Cast { op: CastOp::BitCast, ty, .. } if *ty == v2i64));
    assert!(
        matches!(kinds[10], InstKind::FieldAddr { field, .. } if *field == xmm_field(reg::XMM10))
    );
    assert!(matches!(kinds[11], InstKind::Load { ty, .. } if *ty == i128));
    assert!(matches!(kinds[12], InstKind::Cast { op: CastOp::BitCast, ty, .. } if *ty == v2i64));
    assert!(matches!(kinds[13], InstKind::ICmp { .. }));
    assert!(matches!(kinds[14], InstKind::Select { .. }));
    assert!(matches!(kinds[15], InstKind::Cast { op: CastOp::BitCast, ty, .. } if *ty == i128));
    assert!(
        matches!(kinds[16], InstKind::FieldAddr { field, .. } if *field == xmm_field(reg::XMM8))
    );
    assert!(matches!(kinds[17], InstKind::Store { .. }));
}

#[test]
fn pcmpeqq_register_memory() {
    // pcmpeqq 2(%r14,%r15,2), %xmm8 (8 bytes): the second source is
    // loaded through the base+index*scale+disp pattern.
    let tables = Tables {
        idx: vec![NOOP_PAD, NOOP_PAD, 0, NOOP_PAD, NOOP_PAD],
        sema: vec![
            GET_RC, vt::V2I64, 1,
            COMPLEX_PATTERN, vt::I64, patterns::ADDR64, 2,
            IrOpcode::Load as u16, vt::V2I64,
            opcodes::PCMPEQ, vt::V2I64,
            PUT_RC, vt::NONE, 0,
            END,
        ],
        consts: vec![],
    };
    let module = translate(
        &tables,
        vec![McDecodedInst::new(
            0x1000,
            8,
            PCMPEQQ_RM,
            vec![
                McOperand::Reg(reg::XMM8),
                McOperand::Reg(reg::XMM8),
                McOperand::Reg(reg::R14),
                McOperand::Imm(2),
                McOperand::Reg(reg::R15),
                McOperand::Imm(2),
            ],
        )],
    );

    let func = module.function(module.function_by_address(0x1000).unwrap());
    func.verify().unwrap();
    let (_, kinds) = body(func, "bb_1000");

    // The address computation multiplies the index by the scale and
    // adds the displacement and base.
    assert!(kinds
        .iter()
        .any(|k| matches!(k, InstKind::Binary { op: BinaryOp::Mul, .. })));
    // The computed address is turned into a pointer for an align-1
    // vector load.
    let load_at = kinds
        .iter()
        .position(|k| {
            matches!(
                k,
                InstKind::Load { ty, align: 1, .. } if *ty == Type::vector(64, 2, false)
            )
        })
        .unwrap();
    assert!(matches!(
        kinds[load_at - 1],
        InstKind::Cast {
            op: CastOp::IntToPtr,
            ..
        }
    ));
    assert!(kinds.iter().any(|k| matches!(k, InstKind::Select { .. })));
}

#[test]
fn nop_is_handled_by_the_target_override() {
    let tables = Tables {
        idx: vec![NOOP_PAD; (NOOP + 1) as usize],
        sema: vec![],
        consts: vec![],
    };
    let module = translate(
        &tables,
        vec![McDecodedInst::new(0x1000, 1, NOOP, vec![])],
    );

    let func = module.function(module.function_by_address(0x1000).unwrap());
    func.verify().unwrap();
    let (block, kinds) = body(func, "bb_1000");
    // RIP seed, RIP += 1 and the fall-through branch; nothing else.
    assert_eq!(func.block(block).len(), 8);
    assert!(matches!(kinds[7], InstKind::Br { .. }));
}

#[test]
fn custom_operand_sign_extends_immediates() {
    // An add-immediate whose 8-bit immediate is sign-extended by the
    // custom operand hook: al += imm8.
    let tables = Tables {
        idx: vec![NOOP_PAD, NOOP_PAD, NOOP_PAD, 0, NOOP_PAD],
        sema: vec![
            GET_RC, vt::I8, 1,
            CUSTOM_OP, vt::I8, custom_ops::I8IMM, 2,
            IrOpcode::Add as u16, vt::I8,
            PUT_RC, vt::NONE, 0,
            END,
        ],
        consts: vec![],
    };
    let module = translate(
        &tables,
        vec![McDecodedInst::new(
            0x1000,
            2,
            ADD8RI,
            vec![
                McOperand::Reg(reg::AL),
                McOperand::Reg(reg::AL),
                McOperand::Imm(-1),
            ],
        )],
    );

    let func = module.function(module.function_by_address(0x1000).unwrap());
    func.verify().unwrap();
    let (_, kinds) = body(func, "bb_1000");

    // al reads truncate rax; the write read-modify-writes rax.
    assert!(kinds
        .iter()
        .any(|k| matches!(k, InstKind::Cast { op: CastOp::Trunc, ty, .. } if *ty == Type::int(8))));
    let ands = kinds
        .iter()
        .filter(|k| matches!(k, InstKind::Binary { op: BinaryOp::And, .. }))
        .count();
    assert!(ands >= 1);
}

#[test]
fn implicit_operands_reach_the_target() {
    let tables = Tables {
        idx: vec![NOOP_PAD, NOOP_PAD, NOOP_PAD, NOOP_PAD, 0],
        sema: vec![
            IMPLICIT, vt::NONE, reg::EFLAGS as u16,
            END,
        ],
        consts: vec![],
    };
    let module = translate(
        &tables,
        vec![McDecodedInst::new(0x1000, 3, CLOBBER_FLAGS, vec![])],
    );

    let func = module.function(module.function_by_address(0x1000).unwrap());
    func.verify().unwrap();
    let (_, kinds) = body(func, "bb_1000");
    // The hook clobbered the flags register: a store to its field.
    let eflags_field = REGISTERS[reg::EFLAGS as usize].field;
    assert!(kinds
        .iter()
        .any(|k| matches!(k, InstKind::FieldAddr { field, .. } if *field == eflags_field)));
}
