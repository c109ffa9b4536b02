use thiserror::Error;

use crate::constants::Word;

use super::arguments::ArgError;
use super::memory::MemoryError;

/// Fatal conditions raised while executing an instruction
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exception {
    #[error("stack underflow")]
    StackUnderflow,

    #[error("stack overflow")]
    StackOverflow,

    #[error("division by zero")]
    DivByZero,

    #[error("invalid instruction (opcode {opcode})")]
    InvalidInstruction { opcode: Word },

    #[error("invalid memory access ({0})")]
    InvalidMemoryAccess(#[from] MemoryError),

    #[error("invalid argument ({0})")]
    InvalidArgument(#[from] ArgError),

    #[error("invalid character code {value}")]
    InvalidCharacter { value: u32 },
}

impl Exception {
    /// Whether the exception comes from an out-of-range address or operand
    #[must_use]
    pub const fn is_address_fault(&self) -> bool {
        matches!(
            self,
            Exception::InvalidMemoryAccess(_)
                | Exception::InvalidArgument(_)
                | Exception::InvalidCharacter { .. }
        )
    }
}
