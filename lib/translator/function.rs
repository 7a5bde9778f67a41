//! Per-function translation orchestration.
//!
//! A `FunctionTranslator` owns one IR function while it is being built:
//! it materializes basic blocks at code addresses, walks the decoded
//! basic blocks feeding each instruction to the semantics interpreter,
//! splits out call blocks, and post-processes them during finalization.

use crate::error::Error;
use crate::ir::{
    BlockId, Builder, CallTarget, FuncId, InstKind, Module, ParamAttrs, Type, Value,
};
use crate::mc::{McBasicBlock, McDecodedInst, McFunction};
use crate::translator::sema::{SemanticsTable, TapeCursor};
use crate::translator::{Options, RegisterSema, TargetSemantics};
use log::error;
use std::collections::BTreeMap;

/// Translates one decoded function into IR.
///
/// The translator exclusively owns the IR function under construction,
/// the address-to-block map and the semantic value stack; the register
/// semantics object is an externally owned collaborator that outlives
/// the translation. Finalization (call-block save/restore wrapping and
/// the register semantics' function epilogue) runs on every exit path:
/// explicitly through `finalize`, or from `Drop` if translation was
/// abandoned part way.
pub struct FunctionTranslator<'a, R: RegisterSema> {
    pub(super) module: &'a mut Module,
    pub(super) func: FuncId,
    pub(super) tables: &'a SemanticsTable<'a>,
    pub(super) rsi: &'a mut R,
    pub(super) options: &'a Options,
    pub(super) mc_fn: &'a McFunction,
    pub(super) blocks_by_addr: BTreeMap<u64, BlockId>,
    pub(super) entry: BlockId,
    pub(super) exit: BlockId,
    pub(super) call_blocks: Vec<BlockId>,
    pub(super) block: Option<BlockId>,
    pub(super) mc_block: Option<(u64, u64)>,
    pub(super) cursor: Option<TapeCursor<'a>>,
    pub(super) vals: Vec<Value>,
    pub(super) res_ty: Type,
    pub(super) inst: Option<McDecodedInst>,
    pub(super) finalized: bool,
}

impl<'a, R: RegisterSema> FunctionTranslator<'a, R> {
    /// Set up translation of `mc_fn` into `module`.
    ///
    /// Creates the entry and exit blocks (and, with register-set diffing
    /// enabled, the save buffer and diff-exit block), and branches the
    /// entry block to the block at the function's start address.
    pub fn new(
        module: &'a mut Module,
        mc_fn: &'a McFunction,
        tables: &'a SemanticsTable<'a>,
        rsi: &'a mut R,
        options: &'a Options,
    ) -> Result<FunctionTranslator<'a, R>, Error> {
        assert!(!mc_fn.is_empty(), "trying to translate empty MC function");
        let start = mc_fn.start_addr();

        let func = module.get_or_create_function(start);
        assert!(
            module.function(func).is_declaration(),
            "translating into non-empty function"
        );
        module
            .function_mut(func)
            .set_param_attrs(0, ParamAttrs::NOALIAS | ParamAttrs::NOCAPTURE);

        let (entry, exit) = {
            let f = module.function_mut(func);
            (
                f.add_block(format!("entry_fn_{:x}", start)),
                f.add_block(format!("exit_fn_{:x}", start)),
            )
        };

        if options.regset_diff() {
            let regset_ty = rsi.reg_set_type();
            let diff_fn = rsi.get_or_create_regset_diff_function(module);
            let f = module.function_mut(func);
            let diff_exit = f.add_block(format!("diff_exit_fn_{:x}", start));
            let regset = f.arg(0);

            // Save the incoming register set in the entry block.
            let mut b = Builder::new(f, entry);
            let saved = b.alloca(regset_ty);
            let live = b.load(regset_ty, regset, 0)?;
            b.store(live, saved, 0)?;

            // The diff call lives in its own exit block so the primary
            // exit can just branch into it.
            let mut b = Builder::new(f, diff_exit);
            let addr = b.iconst(Type::int(64), start);
            let fn_addr = b.int_to_ptr(addr)?;
            b.call(diff_fn, vec![fn_addr, saved, regset]);
            b.ret();

            Builder::new(f, exit).br(diff_exit);
        } else {
            Builder::new(module.function_mut(func), exit).ret();
        }

        let mut ft = FunctionTranslator {
            module,
            func,
            tables,
            rsi,
            options,
            mc_fn,
            blocks_by_addr: BTreeMap::new(),
            entry,
            exit,
            call_blocks: Vec::new(),
            block: None,
            mc_block: None,
            cursor: None,
            vals: Vec::new(),
            res_ty: Type::Void,
            inst: None,
            finalized: false,
        };

        if ft.options.inst_addr_save() {
            ft.store_debug_sink(entry, crate::CURRENT_FN_SYMBOL, start)?;
        }

        let first = ft.get_or_create_block(start);
        Builder::new(ft.module.function_mut(ft.func), ft.entry).br(first);

        Ok(ft)
    }

    /// The module being translated into.
    pub fn module(&self) -> &Module {
        self.module
    }

    pub fn module_mut(&mut self) -> &mut Module {
        self.module
    }

    /// The IR function under construction.
    pub fn func_id(&self) -> FuncId {
        self.func
    }

    pub fn exit_block(&self) -> BlockId {
        self.exit
    }

    /// The IR block currently open for insertion.
    pub fn current_block(&self) -> Option<BlockId> {
        self.block
    }

    /// The instruction currently being translated.
    pub fn current_inst(&self) -> &McDecodedInst {
        self.inst
            .as_ref()
            .expect("no instruction is being translated")
    }

    /// A builder over the current block plus the register semantics,
    /// borrowed together so hooks can emit register accesses.
    pub fn parts(&mut self) -> (Builder<'_>, &mut R) {
        let block = self.block.expect("no basic block is open for insertion");
        let func = self.module.function_mut(self.func);
        (Builder::new(func, block), &mut *self.rsi)
    }

    /// Look up the IR block for a code address, creating a placeholder
    /// if none exists.
    ///
    /// Placeholder blocks contain `trap(); unreachable`: a safety net
    /// that faults at runtime if control reaches an address the
    /// translator has not modeled.
    pub fn get_or_create_block(&mut self, addr: u64) -> BlockId {
        if let Some(block) = self.blocks_by_addr.get(&addr) {
            return *block;
        }
        let func = self.module.function_mut(self.func);
        let block = func.add_block(format!("bb_{:x}", addr));
        let mut b = Builder::new(func, block);
        b.trap();
        b.unreachable();
        self.blocks_by_addr.insert(addr, block);
        block
    }

    /// Erase a placeholder body so the block can be filled in.
    fn prepare_for_insertion(&mut self, block: BlockId) {
        let func = self.module.function_mut(self.func);
        {
            let insts = func.block(block).insts();
            assert!(
                insts.len() == 2
                    && matches!(func.inst(insts[1]).kind(), InstKind::Unreachable),
                "several basic blocks at the same address?"
            );
        }
        func.remove_leading_insts(block, 2);
    }

    /// Open the IR block for a decoded basic block and seed the program
    /// counter with its start address.
    pub fn switch_to_bb(&mut self, mc_bb: &McBasicBlock) -> Result<(), Error> {
        self.mc_block = Some((mc_bb.start(), mc_bb.end()));
        self.switch_to_addr(mc_bb.start())
    }

    fn switch_to_addr(&mut self, addr: u64) -> Result<(), Error> {
        let block = self.get_or_create_block(addr);
        self.prepare_for_insertion(block);
        self.block = Some(block);
        self.rsi.switch_to_bb(block);

        if self.options.inst_addr_save() {
            self.store_debug_sink(block, crate::CURRENT_BB_SYMBOL, addr)?;
        }

        // The PC at the start of the basic block is known, just set it.
        let pc = self.rsi.program_counter();
        let ty = self.rsi.reg_type(pc);
        let func = self.module.function_mut(self.func);
        let mut b = Builder::new(func, block);
        let value = b.iconst(ty, addr);
        self.rsi.set_reg(&mut b, pc, value)?;
        Ok(())
    }

    /// Close the current block: blocks without a terminator fall
    /// through to the block at the decoded block's end address.
    pub fn finalize_bb(&mut self) -> Result<(), Error> {
        let block = self
            .block
            .expect("finalizing without an open basic block");
        if !self.module.function(self.func).has_terminator(block) {
            let end = self
                .mc_block
                .expect("finalizing without an MC basic block")
                .1;
            let target = self.get_or_create_block(end);
            Builder::new(self.module.function_mut(self.func), block).br(target);
        }
        self.rsi.finalize_bb();
        self.block = None;
        self.mc_block = None;
        Ok(())
    }

    /// Emit a call to the `translate_at` intrinsic for a computed code
    /// address, yielding a callable function pointer.
    fn insert_translate_at(&mut self, target: Value) -> Result<Value, Error> {
        let block = self.block.expect("no basic block is open for insertion");
        let func = self.module.function_mut(self.func);
        let mut b = Builder::new(func, block);
        let ptr = if b.value_type(target).is_ptr() {
            target
        } else {
            b.int_to_ptr(target)?
        };
        b.translate_at(ptr)
    }

    /// Emit a call to the code at `target`.
    ///
    /// Compile-time-constant targets resolve directly to the IR function
    /// at that address; anything else goes through `translate_at`.
    pub fn insert_call(&mut self, target: Value) -> Result<(), Error> {
        let const_addr = self.module.function(self.func).value_as_const_int(target);
        let callee = match const_addr {
            Some(addr) => CallTarget::Direct(self.module.get_or_create_function(addr)),
            None => CallTarget::Indirect(self.insert_translate_at(target)?),
        };
        self.insert_call_bb(callee)
    }

    /// Split the current block around a call.
    ///
    /// The call lands alone in a `<parent>_call` sibling block, so the
    /// finalization pass can wrap it with register save/restore code;
    /// translation resumes in a `<parent>_c<addr>` successor.
    pub fn insert_call_bb(&mut self, target: CallTarget) -> Result<(), Error> {
        let current = self.block.expect("call outside of a basic block");
        let inst_addr = self
            .inst
            .as_ref()
            .map(|inst| format!("{:x}", inst.address()))
            .unwrap_or_default();

        let func = self.module.function_mut(self.func);
        let parent_name = func.block(current).name().to_string();
        let succ_name = format!("{}_c{}", call_base_name(&parent_name), inst_addr);

        let call_bb = func.add_block(format!("{}_call", parent_name));
        let regset = func.arg(0);
        {
            let mut b = Builder::new(func, call_bb);
            match target {
                CallTarget::Direct(id) => b.call(id, vec![regset]),
                CallTarget::Indirect(callee) => b.call_indirect(callee, vec![regset]),
            }
        }
        Builder::new(func, current).br(call_bb);

        let successor = func.add_block(succ_name);
        Builder::new(func, call_bb).br(successor);

        self.rsi.finalize_bb();
        self.rsi.switch_to_bb(successor);
        self.block = Some(successor);
        self.call_blocks.push(call_bb);
        // TODO: check the return address when the call comes back, so
        // a callee returning somewhere unexpected unwinds to the
        // translator instead of running the recorded successor.
        Ok(())
    }

    /// Open the block at `addr` as a tail call to an external function:
    /// call it, then return directly, bypassing the exit block.
    pub fn create_external_tail_call_bb(&mut self, addr: u64) -> Result<(), Error> {
        self.switch_to_addr(addr)?;
        let callee = self.module.get_or_create_function(addr);
        self.insert_call_bb(CallTarget::Direct(callee))?;
        let block = self.block.expect("no basic block is open for insertion");
        Builder::new(self.module.function_mut(self.func), block).ret();
        Ok(())
    }

    /// Translate every decoded basic block of the function.
    pub fn translate<T>(&mut self, target: &mut T) -> Result<(), Error>
    where
        T: TargetSemantics<R> + ?Sized,
    {
        let blocks: Vec<McBasicBlock> = self.mc_fn.blocks().cloned().collect();
        for mc_bb in &blocks {
            self.switch_to_bb(mc_bb)?;
            for inst in mc_bb.insts() {
                self.translate_inst(target, inst)?;
            }
            self.finalize_bb()?;
        }
        Ok(())
    }

    /// Run the end-of-function post-processing: wrap every recorded
    /// call block with register save/restore code, then hand the exit
    /// block to the register semantics.
    pub fn finalize(mut self) -> Result<(), Error> {
        let result = self.run_finalization();
        self.finalized = true;
        result
    }

    fn run_finalization(&mut self) -> Result<(), Error> {
        let call_blocks = std::mem::take(&mut self.call_blocks);
        for call_bb in call_blocks {
            let func = self.module.function_mut(self.func);
            {
                let insts = func.block(call_bb).insts();
                assert!(
                    insts.len() == 2 && func.inst(insts[0]).kind().is_call(),
                    "call basic block has wrong number of instructions"
                );
            }
            self.rsi
                .save_all_local_regs(&mut Builder::at(func, call_bb, 0))?;

            let func = self.module.function_mut(self.func);
            let call_index = func.block(call_bb).len() - 2;
            self.rsi
                .restore_local_regs(&mut Builder::at(func, call_bb, call_index + 1))?;
        }
        let exit = self.exit;
        self.rsi.finalize_function(self.module.function_mut(self.func), exit)
    }

    pub(super) fn store_debug_sink(
        &mut self,
        block: BlockId,
        symbol: &str,
        value: u64,
    ) -> Result<(), Error> {
        let global = self.module.get_or_create_global(symbol, Type::int(64));
        let func = self.module.function_mut(self.func);
        let sink = func.global_ref(global, symbol);
        let mut b = Builder::new(func, block);
        let value = b.iconst(Type::int(64), value);
        b.volatile_store(value, sink)
    }
}

impl<'a, R: RegisterSema> Drop for FunctionTranslator<'a, R> {
    fn drop(&mut self) {
        if self.finalized {
            return;
        }
        self.finalized = true;
        if let Err(err) = self.run_finalization() {
            error!("failed to finalize abandoned translation: {}", err);
        }
    }
}

/// The parent block name stripped of any `_c<addr>` suffix a previous
/// call split appended, so successor names don't accumulate suffixes.
/// The search skips the `bb_` prefix: a block at an address starting
/// with `c` is not a call successor.
fn call_base_name(name: &str) -> &str {
    let skip = name.len().min(3);
    match name[skip..].find("_c") {
        Some(pos) => &name[..skip + pos],
        None => name,
    }
}
