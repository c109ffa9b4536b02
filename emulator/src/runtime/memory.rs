use thiserror::Error;

use crate::constants::{Address, Word, MEMORY_SIZE};

/// Represents errors related to memory manipulations
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum MemoryError {
    /// The given address was invalid
    #[error("invalid address {0}")]
    InvalidAddress(Address),

    /// The program does not fit in memory
    #[error("program of {0} words does not fit in memory")]
    ProgramTooLarge(usize),
}

/// Holds the memory cells of the computer.
///
/// It has 32768 cells, all zeroed on creation.
#[derive(Clone, PartialEq, Eq)]
pub struct Memory {
    inner: Box<[Word; MEMORY_SIZE]>,
}

impl std::fmt::Debug for Memory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Memory {{ [{MEMORY_SIZE} words] }}")
    }
}

impl Default for Memory {
    fn default() -> Self {
        Self {
            inner: Box::new([0; MEMORY_SIZE]),
        }
    }
}

impl Memory {
    /// Create a memory with the program copied at address 0
    ///
    /// # Errors
    ///
    /// It fails if the program is bigger than the memory.
    pub fn from_image(program: &[Word]) -> Result<Self, MemoryError> {
        let mut memory = Self::default();
        memory
            .inner
            .get_mut(..program.len())
            .ok_or(MemoryError::ProgramTooLarge(program.len()))?
            .copy_from_slice(program);
        Ok(memory)
    }

    /// Get the word at an address
    ///
    /// # Errors
    ///
    /// It fails if the address is out of bounds.
    pub fn get(&self, address: Address) -> Result<Word, MemoryError> {
        self.inner
            .get(usize::from(address))
            .copied()
            .ok_or(MemoryError::InvalidAddress(address))
    }

    /// Get a mutable reference to the word at an address
    ///
    /// # Errors
    ///
    /// It fails if the address is out of bounds.
    pub fn get_mut(&mut self, address: Address) -> Result<&mut Word, MemoryError> {
        self.inner
            .get_mut(usize::from(address))
            .ok_or(MemoryError::InvalidAddress(address))
    }
}
