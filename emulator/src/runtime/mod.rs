use std::io::{BufRead, Write};

use thiserror::Error;
use tracing::{debug, info};

use crate::constants as C;

mod arguments;
mod exception;
mod instructions;
mod io;
mod memory;
mod registers;

pub use self::arguments::{ArgError, DecodeOperand, Target, Value};
pub use self::exception::Exception;
pub use self::instructions::{Instruction, Opcode};
pub use self::io::Io;
pub use self::memory::{Memory, MemoryError};
pub use self::registers::{Reg, Registers};

#[derive(Error, Debug)]
pub enum ProcessorError {
    #[error("CPU exception: {0}")]
    Exception(#[from] Exception),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("input source exhausted")]
    EndOfInput,
}

// Implement a MemoryError -> ProcessorError conversion to simplify code
impl From<MemoryError> for ProcessorError {
    fn from(e: MemoryError) -> Self {
        Self::Exception(Exception::InvalidMemoryAccess(e))
    }
}

impl From<ArgError> for ProcessorError {
    fn from(e: ArgError) -> Self {
        Self::Exception(Exception::InvalidArgument(e))
    }
}

impl ProcessorError {
    /// Get the underlying CPU exception, if any
    #[must_use]
    pub const fn exception(&self) -> Option<&Exception> {
        match self {
            Self::Exception(e) => Some(e),
            _ => None,
        }
    }
}

type Result<T> = std::result::Result<T, ProcessorError>;

/// Result of a single fetch-decode-execute cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Continue,
    Halted,
}

/// Why a call to [`Computer::run`] returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The program executed a `halt` instruction
    Halted { steps: usize },

    /// The step budget was spent before the program halted
    BudgetExhausted { steps: usize },
}

impl RunOutcome {
    /// Number of cycles executed during the run
    #[must_use]
    pub const fn steps(&self) -> usize {
        match self {
            Self::Halted { steps } | Self::BudgetExhausted { steps } => *steps,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
enum State {
    #[default]
    Running,
    Halted,
}

#[derive(Default)]
pub struct Computer {
    pub registers: Registers,
    pub memory: Memory,
    pub stack: Vec<C::Word>,
    pub pc: C::Address,
    pub cycles: usize,
    pub io: Io,
    state: State,
}

impl std::fmt::Debug for Computer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Computer {{ registers: {:?}, pc: {}, stack: {:?}, memory: [...] }}",
            self.registers, self.pc, self.stack
        )
    }
}

impl Computer {
    /// Create a computer with the program loaded at address 0
    ///
    /// # Errors
    ///
    /// It fails if the program does not fit in memory.
    pub fn new(program: &[C::Word]) -> std::result::Result<Self, MemoryError> {
        Ok(Self {
            memory: Memory::from_image(program)?,
            ..Self::default()
        })
    }

    /// Queue characters to be consumed by `in` before reading any line from
    /// the input source
    #[must_use]
    pub fn with_input(mut self, input: impl IntoIterator<Item = char>) -> Self {
        self.io.seed(input);
        self
    }

    /// Source of input lines once the queued input is exhausted
    #[must_use]
    pub fn with_line_source(mut self, source: impl BufRead + 'static) -> Self {
        self.io.set_source(source);
        self
    }

    /// Sink every output character is mirrored to
    #[must_use]
    pub fn with_mirror(mut self, mirror: impl Write + 'static) -> Self {
        self.io.set_mirror(mirror);
        self
    }

    /// Everything the program wrote so far
    #[must_use]
    pub fn output(&self) -> &str {
        self.io.output()
    }

    #[must_use]
    pub fn is_halted(&self) -> bool {
        self.state == State::Halted
    }

    /// Resolve the effective value of an operand
    pub(crate) fn value(&self, value: Value) -> C::Word {
        value.resolve(&self.registers)
    }

    /// Check that a word is a valid memory address
    pub(crate) fn check_address(word: C::Word) -> std::result::Result<C::Address, Exception> {
        if usize::from(word) < C::MEMORY_SIZE {
            Ok(word)
        } else {
            Err(MemoryError::InvalidAddress(word).into())
        }
    }

    /// Resolve an operand used as a memory address
    pub(crate) fn memory_address(
        &self,
        value: Value,
    ) -> std::result::Result<C::Address, Exception> {
        Self::check_address(self.value(value))
    }

    pub(crate) fn write(&mut self, target: Target, value: C::Word) -> Result<()> {
        match target {
            Target::Memory(address) => *self.memory.get_mut(address)? = value,
            Target::Reg(reg) => self.registers.set(reg, value),
        }
        Ok(())
    }

    fn jump(&mut self, address: C::Word) -> Result<()> {
        let address = Self::check_address(address)?;
        debug!("Jumping to address {}", address);
        self.pc = address;
        Ok(())
    }

    fn push(&mut self, value: C::Word) -> std::result::Result<(), Exception> {
        if self.stack.len() >= C::STACK_LIMIT {
            return Err(Exception::StackOverflow);
        }
        self.stack.push(value);
        Ok(())
    }

    /// Read the top of the stack without popping it
    fn peek_stack(&self) -> std::result::Result<C::Word, Exception> {
        self.stack.last().copied().ok_or(Exception::StackUnderflow)
    }

    #[tracing::instrument(skip(self), level = "trace", err)]
    fn decode_instruction(&self) -> Result<Instruction> {
        let opcode = Opcode::try_from(self.memory.get(self.pc)?)?;

        let mut operands = [0; Opcode::MAX_ARITY];
        for (offset, operand) in (1..).zip(operands.iter_mut()).take(opcode.arity()) {
            *operand = self.memory.get(self.pc.saturating_add(offset))?;
        }

        Ok(Instruction::decode(opcode, operands)?)
    }

    /// Run a single fetch-decode-execute cycle
    ///
    /// # Errors
    ///
    /// Returns an error if the instruction could not be decoded or executed.
    /// The state of the computer is left as it was before the cycle.
    #[tracing::instrument(skip(self), level = "debug")]
    pub fn step(&mut self) -> Result<Step> {
        if self.is_halted() {
            return Ok(Step::Halted);
        }

        let inst = self.decode_instruction()?;
        debug!(pc = self.pc, opcode = %inst.opcode(), "Executing instruction \"{}\"", inst);
        let step = inst.execute(self)?;
        self.cycles += 1;

        if step == Step::Halted {
            info!(pc = self.pc, cycles = self.cycles, "Computer halted");
            self.state = State::Halted;
        }

        Ok(step)
    }

    /// Run the program for at most `max_steps` cycles
    ///
    /// # Errors
    ///
    /// Stops at the first fatal condition and returns it.
    #[tracing::instrument(skip(self))]
    pub fn run(&mut self, max_steps: usize) -> Result<RunOutcome> {
        let start = self.cycles;

        for _ in 0..max_steps {
            if self.step()? == Step::Halted {
                return Ok(RunOutcome::Halted {
                    steps: self.cycles - start,
                });
            }
        }

        if self.is_halted() {
            return Ok(RunOutcome::Halted {
                steps: self.cycles - start,
            });
        }

        let steps = self.cycles - start;
        info!(steps, pc = self.pc, "Step budget exhausted");
        Ok(RunOutcome::BudgetExhausted { steps })
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    /// Build a computer with the given program and run it until it halts
    fn run(program: &[C::Word]) -> Computer {
        let mut computer = Computer::new(program).unwrap();
        let outcome = computer.run(10_000).unwrap();
        assert!(matches!(outcome, RunOutcome::Halted { .. }));
        computer
    }

    const R0: C::Word = 32768;
    const R1: C::Word = 32769;
    const R2: C::Word = 32770;

    #[test]
    fn add_test() {
        let computer = run(&[9, R1, 1, 1, 0]);
        assert_eq!(computer.registers.get(Reg::R1), 2);
        assert_eq!(computer.pc, 4);
    }

    #[test]
    fn add_wraps_test() {
        let computer = run(&[9, R0, 32767, 2, 0]);
        assert_eq!(computer.registers.get(Reg::R0), 1);
    }

    #[test]
    fn mult_wraps_test() {
        let computer = run(&[10, R0, 20000, 20000, 0]);
        assert_eq!(
            u32::from(computer.registers.get(Reg::R0)),
            (20000 * 20000) % 32768
        );
    }

    #[test]
    fn mod_test() {
        let computer = run(&[11, R0, 17, 5, 0]);
        assert_eq!(computer.registers.get(Reg::R0), 2);
    }

    #[test]
    fn mod_by_zero_test() {
        let mut computer = Computer::new(&[11, R0, 17, 0]).unwrap();
        let err = computer.step().unwrap_err();
        assert!(matches!(
            err,
            ProcessorError::Exception(Exception::DivByZero)
        ));
        assert_eq!(computer.pc, 0);
        assert_eq!(computer.registers.get(Reg::R0), 0);
    }

    #[test]
    fn bitwise_test() {
        let computer = run(&[
            12, R0, 0b1100, 0b1010, // and
            13, R1, 0b1100, 0b1010, // or
            14, R2, 0, // not
            0,
        ]);
        assert_eq!(computer.registers.get(Reg::R0), 0b1000);
        assert_eq!(computer.registers.get(Reg::R1), 0b1110);
        assert_eq!(computer.registers.get(Reg::R2), 0x7FFF);
    }

    #[test]
    fn not_twice_is_identity_test() {
        let mut computer = Computer::new(&[14, R1, R0, 14, R2, R1, 0]).unwrap();
        for v in (0..=32767).step_by(7).chain([32767]) {
            computer.registers.set(Reg::R0, v);
            computer.pc = 0;
            computer.step().unwrap();
            computer.step().unwrap();
            assert_eq!(computer.registers.get(Reg::R1), !v & 0x7FFF);
            assert_eq!(computer.registers.get(Reg::R2), v);
        }
    }

    #[test]
    fn comparison_test() {
        let computer = run(&[
            4, R0, 3, 3, // eq
            4, R1, 3, 4, // eq
            5, R2, 4, 3, // gt
            5, 100, 3, 4, // gt, to memory
            0,
        ]);
        assert_eq!(computer.registers.get(Reg::R0), 1);
        assert_eq!(computer.registers.get(Reg::R1), 0);
        assert_eq!(computer.registers.get(Reg::R2), 1);
        assert_eq!(computer.memory.get(100), Ok(0));
    }

    #[test]
    fn set_reads_register_test() {
        let computer = run(&[1, R0, 42, 1, R1, R0, 0]);
        assert_eq!(computer.registers.get(Reg::R0), 42);
        assert_eq!(computer.registers.get(Reg::R1), 42);
    }

    #[test]
    fn rmem_test() {
        // memory -> memory
        let mut computer = Computer::new(&[15, 1, 0]).unwrap();
        computer.step().unwrap();
        assert_eq!(computer.memory.get(1), Ok(15));

        // memory -> register
        let mut computer = Computer::new(&[15, R0, 0]).unwrap();
        computer.step().unwrap();
        assert_eq!(computer.registers.get(Reg::R0), 15);

        // register -> memory
        let mut computer = Computer::new(&[15, 1, R0]).unwrap();
        computer.registers.set(Reg::R0, 2);
        computer.step().unwrap();
        assert_eq!(computer.memory.get(1), Ok(R0));

        // register -> register
        let mut computer = Computer::new(&[15, R1, R0]).unwrap();
        computer.registers.set(Reg::R0, 1);
        computer.step().unwrap();
        assert_eq!(computer.registers.get(Reg::R1), R1);
        assert_eq!(computer.pc, 3);
    }

    #[test]
    fn wmem_test() {
        // literal address, literal value
        let computer = run(&[16, 100, 7, 0]);
        assert_eq!(computer.memory.get(100), Ok(7));

        // address and value from registers
        let mut computer = Computer::new(&[16, R0, R1, 0]).unwrap();
        computer.registers.set(Reg::R0, 200);
        computer.registers.set(Reg::R1, 9);
        computer.run(10).unwrap();
        assert_eq!(computer.memory.get(200), Ok(9));
        assert_eq!(computer.memory.get(R0).ok(), None);
    }

    #[test]
    fn wmem_then_rmem_test() {
        let computer = run(&[
            16, 500, 1234, // wmem 500, 1234
            15, R0, 500, // rmem %r0, 500
            1, R1, 600, // set %r1, 600
            16, R1, R0, // wmem %r1, %r0
            15, 700, R1, // rmem [700], %r1
            0,
        ]);
        assert_eq!(computer.registers.get(Reg::R0), 1234);
        assert_eq!(computer.memory.get(600), Ok(1234));
        assert_eq!(computer.memory.get(700), Ok(1234));
    }

    #[test]
    fn stack_discipline_test() {
        let computer = run(&[2, 10, 2, 20, 3, R0, 3, R1, 0]);
        assert_eq!(computer.registers.get(Reg::R0), 20);
        assert_eq!(computer.registers.get(Reg::R1), 10);
        assert!(computer.stack.is_empty());
    }

    #[test]
    fn pop_empty_stack_test() {
        let mut computer = Computer::new(&[3, R0]).unwrap();
        computer.registers.set(Reg::R0, 5);
        let err = computer.step().unwrap_err();
        assert!(matches!(
            err.exception(),
            Some(Exception::StackUnderflow)
        ));
        assert_eq!(computer.registers.get(Reg::R0), 5);
        assert_eq!(computer.pc, 0);
        assert_eq!(computer.cycles, 0);
    }

    #[test]
    fn ret_empty_stack_test() {
        let mut computer = Computer::new(&[18]).unwrap();
        let err = computer.run(10).unwrap_err();
        assert!(matches!(
            err.exception(),
            Some(Exception::StackUnderflow)
        ));
        assert_eq!(computer.pc, 0);
    }

    #[test]
    fn rmem_out_of_memory_test() {
        let mut computer = Computer::new(&[15, R1, R0]).unwrap();
        computer.registers.set(Reg::R0, 40000);
        computer.registers.set(Reg::R1, 7);
        let err = computer.step().unwrap_err();
        assert!(matches!(
            err.exception(),
            Some(Exception::InvalidMemoryAccess(MemoryError::InvalidAddress(
                40000
            )))
        ));
        assert_eq!(computer.registers.get(Reg::R1), 7);
        assert_eq!(computer.pc, 0);
    }

    #[test]
    fn wmem_out_of_memory_test() {
        let mut computer = Computer::new(&[16, R0, 1234]).unwrap();
        computer.registers.set(Reg::R0, 40000);
        let err = computer.step().unwrap_err();
        assert!(matches!(
            err.exception(),
            Some(Exception::InvalidMemoryAccess(MemoryError::InvalidAddress(
                40000
            )))
        ));
        assert_eq!(computer.pc, 0);
    }

    #[test]
    fn call_out_of_memory_test() {
        let mut computer = Computer::new(&[17, R0]).unwrap();
        computer.registers.set(Reg::R0, 40000);
        let err = computer.step().unwrap_err();
        assert!(err.exception().is_some_and(Exception::is_address_fault));
        assert!(computer.stack.is_empty());
        assert_eq!(computer.pc, 0);
    }

    #[test]
    fn ret_out_of_memory_test() {
        let mut computer = Computer::new(&[18]).unwrap();
        computer.stack.push(40000);
        let err = computer.step().unwrap_err();
        assert!(err.exception().is_some_and(Exception::is_address_fault));
        assert_eq!(computer.stack, vec![40000]);
        assert_eq!(computer.pc, 0);
    }

    #[test]
    fn stack_overflow_test() {
        let mut computer = Computer::new(&[2, 1]).unwrap();
        computer.stack.resize(C::STACK_LIMIT, 0);
        let err = computer.step().unwrap_err();
        assert!(matches!(err.exception(), Some(Exception::StackOverflow)));
        assert_eq!(computer.stack.len(), C::STACK_LIMIT);
        assert_eq!(computer.pc, 0);
    }

    #[test]
    fn jt_jf_test() {
        let mut computer = Computer::new(&[7, 0, 100]).unwrap();
        computer.step().unwrap();
        assert_eq!(computer.pc, 3);

        let mut computer = Computer::new(&[7, 1, 100]).unwrap();
        computer.step().unwrap();
        assert_eq!(computer.pc, 100);

        let mut computer = Computer::new(&[8, 0, 100]).unwrap();
        computer.step().unwrap();
        assert_eq!(computer.pc, 100);

        let mut computer = Computer::new(&[8, 1, 100]).unwrap();
        computer.step().unwrap();
        assert_eq!(computer.pc, 3);
    }

    #[test]
    fn jmp_register_test() {
        let mut computer = Computer::new(&[6, R0]).unwrap();
        computer.registers.set(Reg::R0, 1234);
        computer.step().unwrap();
        assert_eq!(computer.pc, 1234);
    }

    #[test]
    fn jump_out_of_memory_test() {
        let mut computer = Computer::new(&[6, R0]).unwrap();
        computer.registers.set(Reg::R0, 40000);
        let err = computer.step().unwrap_err();
        assert!(err.exception().is_some_and(Exception::is_address_fault));
        assert_eq!(computer.pc, 0);
    }

    #[test]
    fn call_ret_test() {
        let computer = run(&[
            17, 6, // call 6
            1, R1, 2, // set %r1, 2
            0, // halt
            1, R0, 1, // 6: set %r0, 1
            18, // ret
        ]);
        assert_eq!(computer.registers.get(Reg::R0), 1);
        assert_eq!(computer.registers.get(Reg::R1), 2);
        assert_eq!(computer.pc, 5);
        assert!(computer.stack.is_empty());
    }

    #[test]
    fn call_pushes_return_address_test() {
        let mut computer = Computer::new(&[21, 17, 50]).unwrap();
        computer.run(2).unwrap();
        assert_eq!(computer.stack, vec![3]);
        assert_eq!(computer.pc, 50);
    }

    #[test]
    fn noop_test() {
        let mut computer = Computer::new(&[21, 21]).unwrap();
        computer.step().unwrap();
        assert_eq!(computer.pc, 1);
    }

    #[test]
    fn out_test() {
        let mut computer = Computer::new(&[19, 104, 19, R0, 0]).unwrap();
        computer.registers.set(Reg::R0, u16::from(b'i'));
        computer.run(10).unwrap();
        assert_eq!(computer.output(), "hi");
    }

    #[test]
    fn out_register_range_test() {
        let mut computer = Computer::new(&[19, R0, 0]).unwrap();
        computer.registers.set(Reg::R0, 40000);
        let err = computer.step().unwrap_err();
        assert!(matches!(
            err.exception(),
            Some(Exception::InvalidCharacter { value: 40000 })
        ));
        assert_eq!(computer.output(), "");
        assert_eq!(computer.pc, 0);
    }

    /// Sink refusing every write
    struct BrokenPipe;

    impl Write for BrokenPipe {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::ErrorKind::BrokenPipe.into())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn out_broken_mirror_test() {
        let mut computer = Computer::new(&[19, 65, 0]).unwrap().with_mirror(BrokenPipe);
        assert!(matches!(computer.step(), Err(ProcessorError::Io(_))));
        assert!(matches!(computer.step(), Err(ProcessorError::Io(_))));
        assert_eq!(computer.output(), "");
        assert_eq!(computer.pc, 0);
        assert_eq!(computer.cycles, 0);
    }

    #[test]
    fn in_test() {
        let mut computer = Computer::new(&[20, R0, 20, 100, 20, R1, 0])
            .unwrap()
            .with_input("ab".chars())
            .with_line_source(std::io::Cursor::new("z\n"));
        computer.run(10).unwrap();
        assert_eq!(computer.registers.get(Reg::R0), u16::from(b'a'));
        assert_eq!(computer.memory.get(100), Ok(u16::from(b'b')));
        assert_eq!(computer.registers.get(Reg::R1), u16::from(b'z'));
        assert_eq!(computer.io.pending_input().iter().collect::<String>(), "\n");
    }

    #[test]
    fn in_character_out_of_range_test() {
        let mut computer = Computer::new(&[20, R0])
            .unwrap()
            .with_input("\u{9c40}".chars());
        computer.registers.set(Reg::R0, 5);
        let err = computer.step().unwrap_err();
        assert!(matches!(
            err.exception(),
            Some(Exception::InvalidCharacter { value: 40000 })
        ));
        assert_eq!(computer.registers.get(Reg::R0), 5);
        assert_eq!(computer.io.pending_input().len(), 1);
        assert_eq!(computer.pc, 0);
    }

    #[test]
    fn in_end_of_input_test() {
        let mut computer = Computer::new(&[20, R0]).unwrap();
        let err = computer.step().unwrap_err();
        assert!(matches!(err, ProcessorError::EndOfInput));
        assert_eq!(computer.pc, 0);
    }

    #[test]
    fn invalid_opcode_test() {
        let mut computer = Computer::new(&[21, 42]).unwrap();
        let err = computer.run(10).unwrap_err();
        assert!(matches!(
            err.exception(),
            Some(Exception::InvalidInstruction { opcode: 42 })
        ));
        assert_eq!(computer.pc, 1);
        assert_eq!(computer.cycles, 1);
    }

    #[test]
    fn invalid_operand_test() {
        let mut computer = Computer::new(&[9, 32776, 1, 1]).unwrap();
        let err = computer.step().unwrap_err();
        assert!(err.exception().is_some_and(Exception::is_address_fault));
    }

    #[test]
    fn operand_past_end_of_memory_test() {
        let mut computer = Computer::default();
        *computer.memory.get_mut(32767).unwrap() = 2; // push, missing its operand
        computer.pc = 32767;
        let err = computer.step().unwrap_err();
        assert!(matches!(
            err.exception(),
            Some(Exception::InvalidMemoryAccess(MemoryError::InvalidAddress(
                32768
            )))
        ));
    }

    #[test]
    fn step_budget_test() {
        // jmp 0, forever
        let mut computer = Computer::new(&[6, 0]).unwrap();
        let outcome = computer.run(1234).unwrap();
        assert_eq!(outcome, RunOutcome::BudgetExhausted { steps: 1234 });
        assert_eq!(computer.cycles, 1234);
        assert!(!computer.is_halted());
    }

    #[test]
    fn halt_stops_immediately_test() {
        let mut computer = Computer::new(&[19, 97, 0, 19, 98]).unwrap();
        let outcome = computer.run(100).unwrap();
        assert_eq!(outcome, RunOutcome::Halted { steps: 2 });
        assert_eq!(computer.output(), "a");
        assert_eq!(computer.pc, 2);

        // Halting is permanent
        let outcome = computer.run(100).unwrap();
        assert_eq!(outcome, RunOutcome::Halted { steps: 0 });
        assert_eq!(computer.step().unwrap(), Step::Halted);
        assert_eq!(computer.output(), "a");
        assert_eq!(computer.pc, 2);
        assert_eq!(computer.cycles, 2);
    }

    #[test]
    fn instances_do_not_share_output_test() {
        let a = run(&[19, 97, 0]);
        let b = run(&[19, 98, 0]);
        assert_eq!(a.output(), "a");
        assert_eq!(b.output(), "b");
    }
}
