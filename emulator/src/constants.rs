pub type Address = u16;
pub type Word = u16;

/// Total size of the computer memory
pub const MEMORY_SIZE: usize = 32768;

/// Number of general purpose registers
pub const REGISTER_COUNT: usize = 8;

/// First raw value designating a register instead of a literal
pub const REGISTER_BASE: Word = 32768;

/// Last raw value designating a register
pub const REGISTER_LAST: Word = 32775;

/// Arithmetic results are taken modulo this value
pub const MODULUS: u32 = 32768;

/// Mask of the 15 bits making up a value
pub const VALUE_MASK: Word = 0x7FFF;

/// Default number of cycles the CLI runs a program for
pub const DEFAULT_STEP_BUDGET: usize = 1_000_000_000;

/// Maximum depth of the call stack
pub const STACK_LIMIT: usize = 1 << 20;
