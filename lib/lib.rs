//! Saker: a static binary translation framework in Rust.
//!
//! Saker consumes already-decoded machine instructions and emits
//! equivalent code in a typed, SSA-form intermediate representation for
//! a downstream optimizing compiler to process. A quick synopsis of
//! Saker's modules:
//!
//! * **ir** - The typed intermediate representation the translator
//!   emits: modules, functions, blocks, values and a typed builder.
//! * **mc** - The decoded machine-code data model handed over by an
//!   external decoder.
//! * **translator** - The translation core: the semantic tape format,
//!   the per-function/per-instruction translation engine, the register
//!   semantics and target hook interfaces, and the x86-64 reference
//!   target.
//!
//! Translation is driven per function:
//!
//! ```
//! use saker::ir::Module;
//! use saker::mc::{McBasicBlock, McDecodedInst, McFunction};
//! use saker::translator::sema::{PseudoOp, SemanticsTable};
//! use saker::translator::x86::{X86RegisterSema, X86TargetSemantics};
//! use saker::translator::{FunctionTranslator, Options};
//!
//! # fn example() -> Result<(), saker::Error> {
//! // Semantic tables normally come from the offline table generator.
//! let opcode_to_sema_idx = [0u32];
//! let semantics = [PseudoOp::EndOfInstruction as u16];
//! let tables = SemanticsTable::new(&opcode_to_sema_idx, &semantics, &[]);
//!
//! let mut mc_fn = McFunction::new(0x1000);
//! mc_fn.add_block(McBasicBlock::new(
//!     0x1000,
//!     0x1001,
//!     vec![McDecodedInst::new(0x1000, 1, 0, vec![])],
//! ));
//!
//! let mut module = Module::new("example");
//! let mut rsi = X86RegisterSema::new(&mut module);
//! let mut target = X86TargetSemantics::new();
//! let options = Options::new();
//!
//! let mut ft = FunctionTranslator::new(&mut module, &mc_fn, &tables, &mut rsi, &options)?;
//! ft.translate(&mut target)?;
//! ft.finalize()?;
//! # Ok(())
//! # }
//! ```

use std::sync::atomic::AtomicU64;

pub mod error;
pub mod ir;
pub mod mc;
pub mod translator;

pub use crate::error::Error;

/// Symbol generated code stores the current function address to when
/// instruction-address saving is enabled.
pub const CURRENT_FN_SYMBOL: &str = "saker_current_fn";

/// Symbol generated code stores the current basic block address to.
pub const CURRENT_BB_SYMBOL: &str = "saker_current_bb";

/// Symbol generated code stores the current instruction address to.
pub const CURRENT_INSTR_SYMBOL: &str = "saker_current_instr";

// The in-process storage behind the debug sinks. Generated code refers
// to these by symbol name, so they are exported unmangled for the
// embedder and debuggers to locate. Concurrent generated programs
// sharing them race by design; they are a debugging aid, not a
// correctness channel.

#[allow(non_upper_case_globals)]
#[no_mangle]
pub static saker_current_fn: AtomicU64 = AtomicU64::new(0);

#[allow(non_upper_case_globals)]
#[no_mangle]
pub static saker_current_bb: AtomicU64 = AtomicU64::new(0);

#[allow(non_upper_case_globals)]
#[no_mangle]
pub static saker_current_instr: AtomicU64 = AtomicU64::new(0);
