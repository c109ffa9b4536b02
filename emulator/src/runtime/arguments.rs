//! Structures to represent instruction operands
//!
//! A raw operand word is interpreted in one of two ways, depending on its
//! position in the instruction:
//!
//!   - in a read position, it is a [`Value`]: either a literal (`0..=32767`)
//!     or the current content of a register (`32768..=32775`);
//!   - in a write position, it is a [`Target`]: either a memory address or a
//!     register. The target is never dereferenced.
//!
//! Anything above `32775` is rejected in both cases.

use parse_display::Display;
use thiserror::Error;

use super::registers::{Reg, Registers};
use crate::constants as C;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ArgError {
    #[error("invalid operand {raw}: neither a literal nor a register")]
    InvalidOperand { raw: C::Word },

    #[error("invalid operand {raw}: expected a register")]
    ExpectedRegister { raw: C::Word },
}

/// Decode a raw operand word into a typed operand
pub trait DecodeOperand: Sized {
    /// # Errors
    ///
    /// Fails if the raw word does not fit this kind of operand
    fn decode(raw: C::Word) -> Result<Self, ArgError>;
}

/// An operand in read position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Value {
    #[display("{0}")]
    Imm(C::Word),
    #[display("{0}")]
    Reg(Reg),
}

impl Value {
    /// Resolve the effective value of the operand
    #[must_use]
    pub fn resolve(self, registers: &Registers) -> C::Word {
        match self {
            Value::Imm(word) => word,
            Value::Reg(reg) => registers.get(reg),
        }
    }
}

impl DecodeOperand for Value {
    fn decode(raw: C::Word) -> Result<Self, ArgError> {
        if raw < C::REGISTER_BASE {
            Ok(Value::Imm(raw))
        } else {
            Reg::from_selector(raw)
                .map(Value::Reg)
                .ok_or(ArgError::InvalidOperand { raw })
        }
    }
}

/// An operand in write position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Target {
    #[display("[{0}]")]
    Memory(C::Address),
    #[display("{0}")]
    Reg(Reg),
}

impl DecodeOperand for Target {
    fn decode(raw: C::Word) -> Result<Self, ArgError> {
        if raw < C::REGISTER_BASE {
            Ok(Target::Memory(raw))
        } else {
            Reg::from_selector(raw)
                .map(Target::Reg)
                .ok_or(ArgError::InvalidOperand { raw })
        }
    }
}

impl DecodeOperand for Reg {
    fn decode(raw: C::Word) -> Result<Self, ArgError> {
        match Target::decode(raw)? {
            Target::Reg(reg) => Ok(reg),
            Target::Memory(_) => Err(ArgError::ExpectedRegister { raw }),
        }
    }
}
