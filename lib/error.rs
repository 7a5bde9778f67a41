//! Saker error types.

use thiserror::Error;

/// Errors raised while translating machine code into IR.
#[derive(Clone, Debug, Error)]
pub enum Error {
    /// The instruction has no semantics entry and no target override
    /// claimed it.
    #[error("unknown target instruction {0}")]
    UnknownInstruction(String),
    /// A semantic opcode inside a known instruction's tape is not
    /// understood by the interpreter or the target.
    #[error("unknown semantic opcode {opcode:#x} in {inst}")]
    UnknownOpcode { opcode: u16, inst: String },
    /// A predicate identifier the interpreter has no expansion for.
    #[error("unknown predicate {0}")]
    UnknownPredicate(u16),
    /// A complex pattern the target declined to compute.
    #[error("unknown complex pattern {0}")]
    UnknownComplexPattern(u16),
    /// A custom operand type the target declined to compute.
    #[error("unknown custom operand type {0}")]
    UnknownCustomOperand(u16),
    /// An implicit operand the target declined to handle.
    #[error("unhandled implicit operand {0}")]
    UnknownImplicit(String),
    /// The semantics stream itself is inconsistent, e.g. it consumes
    /// operands that were never produced.
    #[error("malformed semantics: {0}")]
    MalformedSemantics(String),
    /// An IR typing rule was violated while building an operation.
    #[error("type error: {0}")]
    Type(String),
    /// A machine operand was not of the kind the semantics expected.
    #[error("bad machine operand {index} of {inst}")]
    BadOperand { index: usize, inst: String },
    #[error("Custom error: {0}")]
    Custom(String),
}

impl Error {
    /// True for the error kinds that the `unknown_to_undef` policy is
    /// allowed to recover from by emitting `trap; unreachable`.
    pub fn is_unknown(&self) -> bool {
        matches!(
            self,
            Error::UnknownInstruction(_)
                | Error::UnknownOpcode { .. }
                | Error::UnknownPredicate(_)
                | Error::UnknownComplexPattern(_)
                | Error::UnknownCustomOperand(_)
                | Error::UnknownImplicit(_)
        )
    }
}

impl From<String> for Error {
    fn from(s: String) -> Error {
        Error::Custom(s)
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Error {
        Error::Custom(s.to_string())
    }
}
