use crate::error::Error;
use crate::ir::{
    AtomicOrdering, BinaryOp, BlockId, Builder, Constant, FuncId, Function, InstKind, Intrinsic,
    Module, ParamAttrs, SyncScope, Type, Value,
};
use crate::mc::{McBasicBlock, McDecodedInst, McFunction, McOperand};
use crate::translator::sema::{vt, IrOpcode, PseudoOp, SemanticsTable, NO_SEMANTICS};
use crate::translator::{FunctionTranslator, NoTarget, Options, OptionsBuilder, RegisterSema};

// A synthetic little register file: four 64-bit registers plus the
// program counter, one register-set field each. Calls are bracketed by
// fence markers so save/restore placement is observable.
const R0: u32 = 0;
const R1: u32 = 1;
const R2: u32 = 2;
const R3: u32 = 3;
const PC: u32 = 4;

struct TestSema {
    regset_ty: Type,
}

impl TestSema {
    fn new(module: &mut Module) -> TestSema {
        TestSema {
            regset_ty: Type::Struct(module.add_struct_type("regset.test")),
        }
    }
}

impl RegisterSema for TestSema {
    fn switch_to_inst(&mut self, _inst: &McDecodedInst) {}
    fn switch_to_bb(&mut self, _block: BlockId) {}
    fn finalize_bb(&mut self) {}

    fn finalize_function(&mut self, _func: &mut Function, _exit: BlockId) -> Result<(), Error> {
        Ok(())
    }

    fn get_reg(&mut self, b: &mut Builder, reg: u32) -> Result<Value, Error> {
        let regset = b.function().arg(0);
        let addr = b.field_addr(regset, reg)?;
        b.load(Type::int(64), addr, 0)
    }

    fn set_reg(&mut self, b: &mut Builder, reg: u32, value: Value) -> Result<(), Error> {
        if b.value_type(value) != Type::int(64) {
            return Err(Error::Type("register write must be 64-bit".into()));
        }
        let regset = b.function().arg(0);
        let addr = b.field_addr(regset, reg)?;
        b.store(value, addr, 0)
    }

    fn get_reg_as_int(&mut self, b: &mut Builder, reg: u32) -> Result<Value, Error> {
        self.get_reg(b, reg)
    }

    fn insert_bits_in_value(
        &mut self,
        b: &mut Builder,
        whole: Value,
        narrow: Value,
    ) -> Result<Value, Error> {
        let ty = b.value_type(whole);
        let bits = b.value_type(narrow).bits();
        let mask = b.const_value(Constant::int(ty, !((1u128 << bits) - 1)));
        let kept = b.binop(BinaryOp::And, whole, mask)?;
        let wide = b.zext(narrow, ty)?;
        b.binop(BinaryOp::Or, kept, wide)
    }

    fn reg_int_type(&self, _reg: u32) -> Type {
        Type::int(64)
    }

    fn reg_type(&self, _reg: u32) -> Type {
        Type::int(64)
    }

    fn reg_set_type(&self) -> Type {
        self.regset_ty
    }

    fn get_or_create_regset_diff_function(&mut self, module: &mut Module) -> FuncId {
        module.declare_function(
            "saker_regset_diff",
            vec![Type::Ptr, Type::Ptr, Type::Ptr],
            Type::Void,
        )
    }

    fn save_all_local_regs(&mut self, b: &mut Builder) -> Result<(), Error> {
        b.fence(AtomicOrdering::SeqCst, SyncScope::System);
        Ok(())
    }

    fn restore_local_regs(&mut self, b: &mut Builder) -> Result<(), Error> {
        b.fence(AtomicOrdering::SeqCst, SyncScope::System);
        Ok(())
    }

    fn program_counter(&self) -> u32 {
        PC
    }
}

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

const END: u16 = PseudoOp::EndOfInstruction as u16;
const GET_RC: u16 = PseudoOp::GetRc as u16;
const PUT_RC: u16 = PseudoOp::PutRc as u16;
const GET_REG: u16 = PseudoOp::GetReg as u16;
const MOV_CONSTANT: u16 = PseudoOp::MovConstant as u16;

fn linear_fn(start: u64, insts: Vec<McDecodedInst>) -> McFunction {
    let end = insts
        .last()
        .map(|inst| inst.address() + inst.size() as u64)
        .unwrap_or(start);
    let mut mc_fn = McFunction::new(start);
    mc_fn.add_block(McBasicBlock::new(start, end, insts));
    mc_fn
}

fn kinds(func: &Function, block: BlockId) -> Vec<&InstKind> {
    func.block(block)
        .insts()
        .iter()
        .map(|id| func.inst(*id).kind())
        .collect()
}

// GET_RC r1; GET_RC r2; 32-bit add; PUT_RC r0. The destination register
// class is wider than the result, forcing a sub-register insert.
fn add32_tables() -> Tables {
    Tables {
        idx: vec![0],
        sema: vec![
            GET_RC, vt::I32, 1,
            GET_RC, vt::I32, 2,
            IrOpcode::Add as u16, vt::I32,
            PUT_RC, vt::NONE, 0,
            END,
        ],
        consts: vec![],
    }
}

#[test]
fn pc_advances_before_any_other_effect() {
    let tables = add32_tables();
    let table = tables.table();
    let mc_fn = linear_fn(
        0x1000,
        vec![McDecodedInst::new(
            0x1000,
            4,
            0,
            vec![
                McOperand::Reg(R3),
                McOperand::Reg(R1),
                McOperand::Reg(R2),
            ],
        )],
    );

    let mut module = Module::new("t");
    let mut rsi = TestSema::new(&mut module);
    let options = Options::new();
    let mut ft =
        FunctionTranslator::new(&mut module, &mc_fn, &table, &mut rsi, &options).unwrap();
    ft.translate(&mut NoTarget).unwrap();
    ft.finalize().unwrap();

    let func = module.function(module.function_by_address(0x1000).unwrap());
    func.verify().unwrap();

    let block = func.block_by_name("bb_1000").unwrap();
    let kinds = kinds(func, block);

    // Block open seeds the PC with the block address: fieldaddr + store.
    assert!(matches!(kinds[0], InstKind::FieldAddr { field: PC, .. }));
    assert!(matches!(kinds[1], InstKind::Store { .. }));
    // The first effect of the instruction itself is PC += size.
    assert!(matches!(kinds[2], InstKind::FieldAddr { field: PC, .. }));
    assert!(matches!(kinds[3], InstKind::Load { .. }));
    assert!(matches!(
        kinds[4],
        InstKind::Binary {
            op: BinaryOp::Add,
            ..
        }
    ));
    assert!(matches!(kinds[5], InstKind::FieldAddr { field: PC, .. }));
    assert!(matches!(kinds[6], InstKind::Store { .. }));
}

#[test]
fn sub_register_write_inserts_bits() {
    let tables = add32_tables();
    let table = tables.table();
    let mc_fn = linear_fn(
        0x1000,
        vec![McDecodedInst::new(
            0x1000,
            4,
            0,
            vec![
                McOperand::Reg(R3),
                McOperand::Reg(R1),
                McOperand::Reg(R2),
            ],
        )],
    );

    let mut module = Module::new("t");
    let mut rsi = TestSema::new(&mut module);
    let options = Options::new();
    let mut ft =
        FunctionTranslator::new(&mut module, &mc_fn, &table, &mut rsi, &options).unwrap();
    ft.translate(&mut NoTarget).unwrap();
    assert!(ft.vals.is_empty());
    ft.finalize().unwrap();

    let func = module.function(module.function_by_address(0x1000).unwrap());
    let block = func.block_by_name("bb_1000").unwrap();
    let kinds = kinds(func, block);

    // The i32 result is merged into r3's current contents: and, zext,
    // or, then the register store.
    let and = kinds.iter().position(|k| {
        matches!(
            k,
            InstKind::Binary {
                op: BinaryOp::And,
                ..
            }
        )
    });
    let or = kinds.iter().position(|k| {
        matches!(
            k,
            InstKind::Binary {
                op: BinaryOp::Or,
                ..
            }
        )
    });
    assert!(and.is_some() && or.is_some() && and < or);
    // Two 32-bit truncating register reads feed the add.
    let truncs = kinds
        .iter()
        .filter(|k| matches!(k, InstKind::Cast { ty, .. } if *ty == Type::int(32)))
        .count();
    assert_eq!(truncs, 2);
}

#[test]
fn block_map_is_unique_and_placeholders_trap() {
    let tables = add32_tables();
    let table = tables.table();
    let mc_fn = linear_fn(
        0x1000,
        vec![McDecodedInst::new(0x1000, 4, 0, vec![
            McOperand::Reg(R3),
            McOperand::Reg(R1),
            McOperand::Reg(R2),
        ])],
    );

    let mut module = Module::new("t");
    let mut rsi = TestSema::new(&mut module);
    let options = Options::new();
    let mut ft =
        FunctionTranslator::new(&mut module, &mc_fn, &table, &mut rsi, &options).unwrap();

    let a = ft.get_or_create_block(0x2000);
    let b = ft.get_or_create_block(0x2000);
    assert_eq!(a, b);

    let func = ft.module().function(ft.func_id());
    let kinds = kinds(func, a);
    assert_eq!(kinds.len(), 2);
    assert!(matches!(
        kinds[0],
        InstKind::IntrinsicCall {
            intrinsic: Intrinsic::Trap,
            ..
        }
    ));
    assert!(matches!(kinds[1], InstKind::Unreachable));

    ft.translate(&mut NoTarget).unwrap();
    ft.finalize().unwrap();
}

#[test]
fn linear_block_falls_through() {
    let tables = add32_tables();
    let table = tables.table();
    let mc_fn = linear_fn(
        0x1000,
        vec![McDecodedInst::new(0x1000, 4, 0, vec![
            McOperand::Reg(R3),
            McOperand::Reg(R1),
            McOperand::Reg(R2),
        ])],
    );

    let mut module = Module::new("t");
    let mut rsi = TestSema::new(&mut module);
    let options = Options::new();
    let mut ft =
        FunctionTranslator::new(&mut module, &mc_fn, &table, &mut rsi, &options).unwrap();
    ft.translate(&mut NoTarget).unwrap();
    ft.finalize().unwrap();

    let func = module.function(module.function_by_address(0x1000).unwrap());
    let block = func.block_by_name("bb_1000").unwrap();
    let last = *func.block(block).insts().last().unwrap();
    let fallthrough = func.block_by_name("bb_1004").unwrap();
    assert!(matches!(
        func.inst(last).kind(),
        InstKind::Br { target } if *target == fallthrough
    ));
    // The fall-through block is still an untranslated placeholder.
    assert_eq!(func.block(fallthrough).len(), 2);
}

// MOV_CONSTANT of the branch target followed by a direct branch.
fn br_tables(target: u64) -> Tables {
    Tables {
        idx: vec![0],
        sema: vec![
            MOV_CONSTANT, vt::I64, 0,
            IrOpcode::Br as u16, vt::NONE,
            END,
        ],
        consts: vec![target],
    }
}

#[test]
fn direct_branch_resolves_to_block() {
    let tables = br_tables(0x1000);
    let table = tables.table();
    // A branch back to the function start: the target block already
    // exists and must be reused, not duplicated.
    let mc_fn = linear_fn(0x1000, vec![McDecodedInst::new(0x1000, 2, 0, vec![])]);

    let mut module = Module::new("t");
    let mut rsi = TestSema::new(&mut module);
    let options = Options::new();
    let mut ft =
        FunctionTranslator::new(&mut module, &mc_fn, &table, &mut rsi, &options).unwrap();
    ft.translate(&mut NoTarget).unwrap();
    ft.finalize().unwrap();

    let func = module.function(module.function_by_address(0x1000).unwrap());
    let block = func.block_by_name("bb_1000").unwrap();
    let last = *func.block(block).insts().last().unwrap();
    assert!(matches!(
        func.inst(last).kind(),
        InstKind::Br { target } if *target == block
    ));
    // No address was computed at runtime.
    let translate_ats = func
        .blocks()
        .flat_map(|(_, b)| b.insts())
        .filter(|id| {
            matches!(
                func.inst(**id).kind(),
                InstKind::IntrinsicCall {
                    intrinsic: Intrinsic::TranslateAt,
                    ..
                }
            )
        })
        .count();
    assert_eq!(translate_ats, 0);
}

// Read a register and branch through it.
fn brind_tables() -> Tables {
    Tables {
        idx: vec![0],
        sema: vec![
            GET_REG, vt::I64, R0 as u16,
            IrOpcode::BrInd as u16, vt::NONE,
            END,
        ],
        consts: vec![],
    }
}

#[test]
fn indirect_branch_calls_translate_at_then_exits() {
    let tables = brind_tables();
    let table = tables.table();
    let mc_fn = linear_fn(0x1000, vec![McDecodedInst::new(0x1000, 2, 0, vec![])]);

    let mut module = Module::new("t");
    let mut rsi = TestSema::new(&mut module);
    let options = Options::new();
    let mut ft =
        FunctionTranslator::new(&mut module, &mc_fn, &table, &mut rsi, &options).unwrap();
    let exit = ft.exit_block();
    ft.translate(&mut NoTarget).unwrap();
    assert_eq!(ft.call_blocks.len(), 1);
    let call_bb = ft.call_blocks[0];
    // Before post-processing the call block is exactly {call, br}.
    assert_eq!(ft.module().function(ft.func_id()).block(call_bb).len(), 2);
    ft.finalize().unwrap();

    let func = module.function(module.function_by_address(0x1000).unwrap());
    func.verify().unwrap();

    // The computed target goes through the translate_at intrinsic...
    let block = func.block_by_name("bb_1000").unwrap();
    assert!(kinds(func, block).iter().any(|k| matches!(
        k,
        InstKind::IntrinsicCall {
            intrinsic: Intrinsic::TranslateAt,
            ..
        }
    )));
    // ...the call block got wrapped in save/restore markers...
    let call_kinds = kinds(func, call_bb);
    assert!(matches!(call_kinds[0], InstKind::Fence { .. }));
    assert!(matches!(call_kinds[1], InstKind::Call { .. }));
    assert!(matches!(call_kinds[2], InstKind::Fence { .. }));
    assert!(matches!(call_kinds[3], InstKind::Br { .. }));
    // ...and the successor leaves through the exit block.
    let successor = func.block_by_name("bb_1000_c1000").unwrap();
    let last = *func.block(successor).insts().last().unwrap();
    assert!(matches!(
        func.inst(last).kind(),
        InstKind::Br { target } if *target == exit
    ));
}

#[test]
fn constant_call_target_resolves_to_function() {
    let tables = Tables {
        idx: vec![0],
        sema: vec![
            MOV_CONSTANT, vt::I64, 0,
            IrOpcode::BrInd as u16, vt::NONE,
            END,
        ],
        consts: vec![0x2000],
    };
    let table = tables.table();
    let mc_fn = linear_fn(0x1000, vec![McDecodedInst::new(0x1000, 2, 0, vec![])]);

    let mut module = Module::new("t");
    let mut rsi = TestSema::new(&mut module);
    let options = Options::new();
    let mut ft =
        FunctionTranslator::new(&mut module, &mc_fn, &table, &mut rsi, &options).unwrap();
    ft.translate(&mut NoTarget).unwrap();
    ft.finalize().unwrap();

    // The constant target resolved to a declaration for fn_2000, with
    // no translate_at call.
    let callee = module.function_by_address(0x2000).unwrap();
    assert!(module.function(callee).is_declaration());
    let func = module.function(module.function_by_address(0x1000).unwrap());
    let calls: Vec<_> = func
        .blocks()
        .flat_map(|(_, b)| b.insts())
        .filter_map(|id| match func.inst(*id).kind() {
            InstKind::Call { target, .. } => Some(*target),
            _ => None,
        })
        .collect();
    assert_eq!(calls.len(), 1);
    assert!(matches!(
        calls[0],
        crate::ir::CallTarget::Direct(id) if id == callee
    ));
}

#[test]
fn unknown_instruction_fails_or_traps_by_policy() {
    let tables = Tables {
        idx: vec![NO_SEMANTICS],
        sema: vec![],
        consts: vec![],
    };
    let table = tables.table();
    let mc_fn = linear_fn(0x1000, vec![McDecodedInst::new(0x1000, 3, 0, vec![])]);

    // Default policy: the translation fails.
    let mut module = Module::new("t");
    let mut rsi = TestSema::new(&mut module);
    let options = Options::new();
    let mut ft =
        FunctionTranslator::new(&mut module, &mc_fn, &table, &mut rsi, &options).unwrap();
    let err = ft.translate(&mut NoTarget).unwrap_err();
    assert!(matches!(err, Error::UnknownInstruction(_)));
    drop(ft);

    // With unknown-to-undef, it traps and carries on.
    let mut module = Module::new("t");
    let mut rsi = TestSema::new(&mut module);
    let options = OptionsBuilder::new().unknown_to_undef(true).build();
    let mut ft =
        FunctionTranslator::new(&mut module, &mc_fn, &table, &mut rsi, &options).unwrap();
    ft.translate(&mut NoTarget).unwrap();
    ft.finalize().unwrap();

    let func = module.function(module.function_by_address(0x1000).unwrap());
    func.verify().unwrap();
    let block = func.block_by_name("bb_1000").unwrap();
    let kinds = kinds(func, block);
    assert!(matches!(
        kinds[kinds.len() - 2],
        InstKind::IntrinsicCall {
            intrinsic: Intrinsic::Trap,
            ..
        }
    ));
    assert!(matches!(kinds[kinds.len() - 1], InstKind::Unreachable));
}

fn count_diff_calls(module: &Module, addr: u64) -> usize {
    let diff = module.function_by_name("saker_regset_diff");
    let func = module.function(module.function_by_address(addr).unwrap());
    func.blocks()
        .flat_map(|(_, b)| b.insts())
        .filter(|id| match func.inst(**id).kind() {
            InstKind::Call { target, .. } => {
                matches!(target, crate::ir::CallTarget::Direct(f) if Some(*f) == diff)
            }
            _ => false,
        })
        .count()
}

#[test]
fn regset_diff_wraps_every_return() {
    let tables = add32_tables();
    let table = tables.table();
    let mc_fn = linear_fn(
        0x1000,
        vec![McDecodedInst::new(0x1000, 4, 0, vec![
            McOperand::Reg(R3),
            McOperand::Reg(R1),
            McOperand::Reg(R2),
        ])],
    );

    let mut module = Module::new("t");
    let mut rsi = TestSema::new(&mut module);
    let options = OptionsBuilder::new().regset_diff(true).build();
    let mut ft =
        FunctionTranslator::new(&mut module, &mc_fn, &table, &mut rsi, &options).unwrap();
    ft.translate(&mut NoTarget).unwrap();
    ft.finalize().unwrap();

    assert_eq!(count_diff_calls(&module, 0x1000), 1);
    let func = module.function(module.function_by_address(0x1000).unwrap());
    // The primary exit branches into the diff block, which returns.
    let exit = func.block_by_name("exit_fn_1000").unwrap();
    let diff_exit = func.block_by_name("diff_exit_fn_1000").unwrap();
    let last = *func.block(exit).insts().last().unwrap();
    assert!(matches!(
        func.inst(last).kind(),
        InstKind::Br { target } if *target == diff_exit
    ));
    let last = *func.block(diff_exit).insts().last().unwrap();
    assert!(matches!(func.inst(last).kind(), InstKind::Ret));

    // Without the option, no diff call is emitted.
    let mut module = Module::new("t");
    let mut rsi = TestSema::new(&mut module);
    let options = Options::new();
    let mut ft =
        FunctionTranslator::new(&mut module, &mc_fn, &table, &mut rsi, &options).unwrap();
    ft.translate(&mut NoTarget).unwrap();
    ft.finalize().unwrap();
    assert_eq!(count_diff_calls(&module, 0x1000), 0);
}

#[test]
fn external_tail_call_returns_directly() {
    let tables = add32_tables();
    let table = tables.table();
    let mc_fn = linear_fn(
        0x1000,
        vec![McDecodedInst::new(0x1000, 4, 0, vec![
            McOperand::Reg(R3),
            McOperand::Reg(R1),
            McOperand::Reg(R2),
        ])],
    );

    let mut module = Module::new("t");
    let mut rsi = TestSema::new(&mut module);
    let options = Options::new();
    let mut ft =
        FunctionTranslator::new(&mut module, &mc_fn, &table, &mut rsi, &options).unwrap();
    ft.translate(&mut NoTarget).unwrap();
    // Pretend the decoder discovered a tail call to 0x3000.
    ft.get_or_create_block(0x3000);
    ft.create_external_tail_call_bb(0x3000).unwrap();
    ft.finalize().unwrap();

    let func = module.function(module.function_by_address(0x1000).unwrap());
    let successor = func.block_by_name("bb_3000_c").unwrap();
    let last = *func.block(successor).insts().last().unwrap();
    // The tail call path returns directly, bypassing the exit block.
    assert!(matches!(func.inst(last).kind(), InstKind::Ret));
}

#[test]
fn finalization_runs_on_drop() {
    let tables = brind_tables();
    let table = tables.table();
    let mc_fn = linear_fn(0x1000, vec![McDecodedInst::new(0x1000, 2, 0, vec![])]);

    let mut module = Module::new("t");
    let mut rsi = TestSema::new(&mut module);
    let options = Options::new();
    let call_bb = {
        let mut ft =
            FunctionTranslator::new(&mut module, &mc_fn, &table, &mut rsi, &options).unwrap();
        ft.translate(&mut NoTarget).unwrap();
        ft.call_blocks[0]
        // Dropped without an explicit finalize.
    };

    let func = module.function(module.function_by_address(0x1000).unwrap());
    let call_kinds = kinds(func, call_bb);
    assert_eq!(call_kinds.len(), 4);
    assert!(matches!(call_kinds[0], InstKind::Fence { .. }));
    assert!(matches!(call_kinds[2], InstKind::Fence { .. }));
}

#[test]
fn regset_param_is_noalias_nocapture() {
    let tables = add32_tables();
    let table = tables.table();
    let mc_fn = linear_fn(
        0x1000,
        vec![McDecodedInst::new(0x1000, 4, 0, vec![
            McOperand::Reg(R3),
            McOperand::Reg(R1),
            McOperand::Reg(R2),
        ])],
    );

    let mut module = Module::new("t");
    let mut rsi = TestSema::new(&mut module);
    let options = Options::new();
    let mut ft =
        FunctionTranslator::new(&mut module, &mc_fn, &table, &mut rsi, &options).unwrap();
    ft.translate(&mut NoTarget).unwrap();
    ft.finalize().unwrap();

    let func = module.function(module.function_by_address(0x1000).unwrap());
    assert_eq!(func.param_attrs(0), ParamAttrs::NOALIAS | ParamAttrs::NOCAPTURE);
}
