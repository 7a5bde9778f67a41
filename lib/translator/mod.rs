//! Translates decoded machine code to Saker IR.
//!
//! The entry point is `FunctionTranslator`, which walks a decoded
//! `McFunction` and emits IR into a `Module`, driven by generator-produced
//! semantic tapes (`sema`). The architectural register file is handled by
//! an external collaborator through the `RegisterSema` trait, and targets
//! plug instruction-set specifics in through `TargetSemantics`.

use crate::error::Error;
use crate::ir::{BlockId, Builder, FuncId, Function, Module, Type, Value};
use crate::mc::McDecodedInst;

pub mod function;
mod inst;
pub mod sema;
pub mod x86;

#[cfg(test)]
mod test;

pub use self::function::FunctionTranslator;
pub use self::sema::{SemanticsTable, TapeCursor};

/// The contract the translator requires of the register-file
/// collaborator.
///
/// The register semantics object knows how the architectural register
/// file is laid out in the register-set struct, how aliased sub-registers
/// are read and written, and what must happen around call boundaries. It
/// outlives any single function translation. Operations that emit IR
/// receive a `Builder` positioned in the block being filled.
pub trait RegisterSema {
    /// Called before each instruction is translated.
    fn switch_to_inst(&mut self, inst: &McDecodedInst);

    /// Called when the translator opens an IR block for insertion.
    fn switch_to_bb(&mut self, block: BlockId);

    /// Called when the current IR block is finalized.
    fn finalize_bb(&mut self);

    /// Called once per function, after call-block post-processing.
    fn finalize_function(&mut self, func: &mut Function, exit: BlockId) -> Result<(), Error>;

    /// Read a register, typed by `reg_type`.
    fn get_reg(&mut self, b: &mut Builder, reg: u32) -> Result<Value, Error>;

    /// Write a register. `value` must have the register's type.
    fn set_reg(&mut self, b: &mut Builder, reg: u32, value: Value) -> Result<(), Error>;

    /// Read a register as an integer of its full width.
    fn get_reg_as_int(&mut self, b: &mut Builder, reg: u32) -> Result<Value, Error>;

    /// Insert `narrow` into the low bits of `whole` (sub-register
    /// update), yielding the combined full-width value.
    fn insert_bits_in_value(
        &mut self,
        b: &mut Builder,
        whole: Value,
        narrow: Value,
    ) -> Result<Value, Error>;

    /// The integer type holding the register's full contents.
    fn reg_int_type(&self, reg: u32) -> Type;

    /// The natural type of the register.
    fn reg_type(&self, reg: u32) -> Type;

    /// The opaque struct type of the register set.
    fn reg_set_type(&self) -> Type;

    /// The register-state diff helper used when diffing is enabled:
    /// `void diff(ptr fn_addr, ptr saved, ptr live)`.
    fn get_or_create_regset_diff_function(&mut self, module: &mut Module) -> FuncId;

    /// Spill block-local register state before a call. The builder is
    /// positioned immediately before the call instruction.
    fn save_all_local_regs(&mut self, b: &mut Builder) -> Result<(), Error>;

    /// Reload register state after a call. The builder is positioned
    /// immediately after the call instruction.
    fn restore_local_regs(&mut self, b: &mut Builder) -> Result<(), Error>;

    /// The register number of the architectural program counter.
    fn program_counter(&self) -> u32;

    /// Register name for diagnostics.
    fn reg_name(&self, reg: u32) -> String {
        format!("r{}", reg)
    }

    /// Instruction name for diagnostics.
    fn inst_name(&self, opcode: u32) -> String {
        format!("opc{}", opcode)
    }
}

/// The hook surface a target plugs into the translator.
///
/// Every hook may decline (`false` / `None`), in which case the
/// translator falls back to its generic handling or reports the
/// construct as unknown. Hooks receive the whole `FunctionTranslator`
/// so they can read further tape tokens, consume and produce semantic
/// values, and emit IR exactly like built-in opcodes do.
pub trait TargetSemantics<R: RegisterSema> {
    /// Whole-instruction override; bypasses tape interpretation when it
    /// returns `true`.
    fn translate_inst(&mut self, ft: &mut FunctionTranslator<R>) -> Result<bool, Error> {
        let _ = ft;
        Ok(false)
    }

    /// Handle a semantic opcode in the target range.
    fn translate_opcode(
        &mut self,
        ft: &mut FunctionTranslator<R>,
        opcode: u16,
    ) -> Result<bool, Error> {
        let _ = (ft, opcode);
        Ok(false)
    }

    /// Compute the value of a named addressing/operand pattern.
    fn translate_complex_pattern(
        &mut self,
        ft: &mut FunctionTranslator<R>,
        pattern: u16,
    ) -> Result<Option<Value>, Error> {
        let _ = (ft, pattern);
        Ok(None)
    }

    /// Compute the value of a custom operand.
    fn translate_custom_operand(
        &mut self,
        ft: &mut FunctionTranslator<R>,
        op_type: u16,
        operand_no: usize,
    ) -> Result<Option<Value>, Error> {
        let _ = (ft, op_type, operand_no);
        Ok(None)
    }

    /// Perform the side effects of an implicit operand.
    fn translate_implicit(
        &mut self,
        ft: &mut FunctionTranslator<R>,
        reg: u32,
    ) -> Result<bool, Error> {
        let _ = (ft, reg);
        Ok(false)
    }
}

/// A target with no overrides; every construct outside the shared
/// opcode set is reported as unknown.
#[derive(Clone, Debug, Default)]
pub struct NoTarget;

impl<R: RegisterSema> TargetSemantics<R> for NoTarget {}

/// Various options that can be passed to the translator. Options will
/// change the behavior of the translator.
#[derive(Clone, Debug, Default)]
pub struct Options {
    regset_diff: bool,
    inst_addr_save: bool,
    unknown_to_undef: bool,
}

impl Options {
    /// Create a new set of Options with the default settings.
    pub fn new() -> Options {
        Options::default()
    }

    /// Whether every translated function compares its register state at
    /// entry against the state at return, through the diff helper
    /// provided by the register semantics.
    pub fn regset_diff(&self) -> bool {
        self.regset_diff
    }

    pub fn set_regset_diff(&mut self, regset_diff: bool) {
        self.regset_diff = regset_diff;
    }

    /// Whether generated code volatile-stores the address of the
    /// function, block and instruction being executed to the exported
    /// debug sinks.
    pub fn inst_addr_save(&self) -> bool {
        self.inst_addr_save
    }

    pub fn set_inst_addr_save(&mut self, inst_addr_save: bool) {
        self.inst_addr_save = inst_addr_save;
    }

    /// Whether an unknown instruction, semantic opcode or predicate is
    /// translated as `trap; unreachable` instead of failing the
    /// translation.
    ///
    /// By default the translator throws an error when it encounters an
    /// instruction for which it has no semantics. That is not
    /// appropriate for all uses. Sometimes we just want as much of the
    /// program translated as we can get, with untranslatable spots
    /// faulting at runtime instead. This flag enables that behavior.
    pub fn unknown_to_undef(&self) -> bool {
        self.unknown_to_undef
    }

    pub fn set_unknown_to_undef(&mut self, unknown_to_undef: bool) {
        self.unknown_to_undef = unknown_to_undef;
    }
}

/// Create your options with the builder pattern.
///
/// For more details on the options, see `translator::Options`.
#[derive(Default)]
pub struct OptionsBuilder {
    options: Options,
}

impl OptionsBuilder {
    /// Create a new builder for translator options.
    pub fn new() -> OptionsBuilder {
        OptionsBuilder {
            options: Options::default(),
        }
    }

    /// Set the register-set diffing option. By default this is false.
    pub fn regset_diff(mut self, regset_diff: bool) -> OptionsBuilder {
        self.options.regset_diff = regset_diff;
        self
    }

    /// Set the instruction-address saving option. By default this is
    /// false.
    pub fn inst_addr_save(mut self, inst_addr_save: bool) -> OptionsBuilder {
        self.options.inst_addr_save = inst_addr_save;
        self
    }

    /// Set the unknown-to-undef option. By default this is false.
    pub fn unknown_to_undef(mut self, unknown_to_undef: bool) -> OptionsBuilder {
        self.options.unknown_to_undef = unknown_to_undef;
        self
    }

    pub fn build(self) -> Options {
        self.options
    }
}
