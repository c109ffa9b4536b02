use parse_display::Display;
use tracing::debug;

use crate::constants as C;

use super::{
    arguments::{DecodeOperand, Target, Value},
    exception::Exception,
    registers::Reg,
    Computer, ProcessorError, Step,
};

/// Numeric tag of an instruction, as found in memory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[display(style = "lowercase")]
#[repr(u16)]
pub enum Opcode {
    Halt = 0,
    Set = 1,
    Push = 2,
    Pop = 3,
    Eq = 4,
    Gt = 5,
    Jmp = 6,
    Jt = 7,
    Jf = 8,
    Add = 9,
    Mult = 10,
    Mod = 11,
    And = 12,
    Or = 13,
    Not = 14,
    Rmem = 15,
    Wmem = 16,
    Call = 17,
    Ret = 18,
    Out = 19,
    In = 20,
    Noop = 21,
}

impl Opcode {
    /// Largest number of operands an instruction takes
    pub const MAX_ARITY: usize = 3;

    /// Number of operand words following the opcode
    #[must_use]
    pub const fn arity(self) -> usize {
        match self {
            Opcode::Halt | Opcode::Ret | Opcode::Noop => 0,
            Opcode::Push
            | Opcode::Pop
            | Opcode::Jmp
            | Opcode::Call
            | Opcode::Out
            | Opcode::In => 1,
            Opcode::Set
            | Opcode::Jt
            | Opcode::Jf
            | Opcode::Not
            | Opcode::Rmem
            | Opcode::Wmem => 2,
            Opcode::Eq
            | Opcode::Gt
            | Opcode::Add
            | Opcode::Mult
            | Opcode::Mod
            | Opcode::And
            | Opcode::Or => 3,
        }
    }

    /// Number of words the whole instruction spans
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn width(self) -> C::Word {
        self.arity() as C::Word + 1
    }
}

impl TryFrom<C::Word> for Opcode {
    type Error = Exception;

    fn try_from(opcode: C::Word) -> Result<Self, Self::Error> {
        Ok(match opcode {
            0 => Opcode::Halt,
            1 => Opcode::Set,
            2 => Opcode::Push,
            3 => Opcode::Pop,
            4 => Opcode::Eq,
            5 => Opcode::Gt,
            6 => Opcode::Jmp,
            7 => Opcode::Jt,
            8 => Opcode::Jf,
            9 => Opcode::Add,
            10 => Opcode::Mult,
            11 => Opcode::Mod,
            12 => Opcode::And,
            13 => Opcode::Or,
            14 => Opcode::Not,
            15 => Opcode::Rmem,
            16 => Opcode::Wmem,
            17 => Opcode::Call,
            18 => Opcode::Ret,
            19 => Opcode::Out,
            20 => Opcode::In,
            21 => Opcode::Noop,
            _ => return Err(Exception::InvalidInstruction { opcode }),
        })
    }
}

/// A decoded instruction, with typed operands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Instruction {
    /// Stop the execution
    #[display("halt")]
    Halt,

    /// Load a register with a value
    #[display("set  {0}, {1}")]
    Set(Reg, Value),

    /// Push a value onto the stack
    #[display("push {0}")]
    Push(Value),

    /// Pop a value from the stack
    #[display("pop  {0}")]
    Pop(Target),

    /// Store 1 if both values are equal, 0 otherwise
    #[display("eq   {0}, {1}, {2}")]
    Eq(Target, Value, Value),

    /// Store 1 if the first value is strictly greater, 0 otherwise
    #[display("gt   {0}, {1}, {2}")]
    Gt(Target, Value, Value),

    /// Unconditional jump
    #[display("jmp  {0}")]
    Jmp(Value),

    /// Jump if the value is non-zero
    #[display("jt   {0}, {1}")]
    Jt(Value, Value),

    /// Jump if the value is zero
    #[display("jf   {0}, {1}")]
    Jf(Value, Value),

    #[display("add  {0}, {1}, {2}")]
    Add(Target, Value, Value),

    #[display("mult {0}, {1}, {2}")]
    Mult(Target, Value, Value),

    #[display("mod  {0}, {1}, {2}")]
    Mod(Target, Value, Value),

    #[display("and  {0}, {1}, {2}")]
    And(Target, Value, Value),

    #[display("or   {0}, {1}, {2}")]
    Or(Target, Value, Value),

    /// 15-bit bitwise negation
    #[display("not  {0}, {1}")]
    Not(Target, Value),

    /// Read the memory cell at the address given by the value
    #[display("rmem {0}, {1}")]
    Rmem(Target, Value),

    /// Write the second value at the address given by the first one
    #[display("wmem {0}, {1}")]
    Wmem(Value, Value),

    /// Push the address of the next instruction and jump
    #[display("call {0}")]
    Call(Value),

    /// Pop an address from the stack and jump to it
    #[display("ret")]
    Ret,

    /// Write a character
    #[display("out  {0}")]
    Out(Value),

    /// Read a character
    #[display("in   {0}")]
    In(Target),

    #[display("noop")]
    Noop,
}

fn operand<T: DecodeOperand>(raw: C::Word) -> Result<T, Exception> {
    Ok(T::decode(raw)?)
}

/// Reduce an arithmetic result to the 15-bit value space
#[allow(clippy::cast_possible_truncation)]
const fn wrap(value: u32) -> C::Word {
    (value % C::MODULUS) as C::Word
}

impl Instruction {
    /// Build an instruction from its opcode and the words following it
    ///
    /// Operands past the arity of the opcode are ignored.
    ///
    /// # Errors
    ///
    /// Fails if an operand is out of range for its position.
    pub fn decode(
        opcode: Opcode,
        [a, b, c]: [C::Word; Opcode::MAX_ARITY],
    ) -> Result<Self, Exception> {
        Ok(match opcode {
            Opcode::Halt => Self::Halt,
            Opcode::Set => Self::Set(operand(a)?, operand(b)?),
            Opcode::Push => Self::Push(operand(a)?),
            Opcode::Pop => Self::Pop(operand(a)?),
            Opcode::Eq => Self::Eq(operand(a)?, operand(b)?, operand(c)?),
            Opcode::Gt => Self::Gt(operand(a)?, operand(b)?, operand(c)?),
            Opcode::Jmp => Self::Jmp(operand(a)?),
            Opcode::Jt => Self::Jt(operand(a)?, operand(b)?),
            Opcode::Jf => Self::Jf(operand(a)?, operand(b)?),
            Opcode::Add => Self::Add(operand(a)?, operand(b)?, operand(c)?),
            Opcode::Mult => Self::Mult(operand(a)?, operand(b)?, operand(c)?),
            Opcode::Mod => Self::Mod(operand(a)?, operand(b)?, operand(c)?),
            Opcode::And => Self::And(operand(a)?, operand(b)?, operand(c)?),
            Opcode::Or => Self::Or(operand(a)?, operand(b)?, operand(c)?),
            Opcode::Not => Self::Not(operand(a)?, operand(b)?),
            Opcode::Rmem => Self::Rmem(operand(a)?, operand(b)?),
            Opcode::Wmem => Self::Wmem(operand(a)?, operand(b)?),
            Opcode::Call => Self::Call(operand(a)?),
            Opcode::Ret => Self::Ret,
            Opcode::Out => Self::Out(operand(a)?),
            Opcode::In => Self::In(operand(a)?),
            Opcode::Noop => Self::Noop,
        })
    }

    #[must_use]
    pub const fn opcode(&self) -> Opcode {
        match self {
            Self::Halt => Opcode::Halt,
            Self::Set(..) => Opcode::Set,
            Self::Push(_) => Opcode::Push,
            Self::Pop(_) => Opcode::Pop,
            Self::Eq(..) => Opcode::Eq,
            Self::Gt(..) => Opcode::Gt,
            Self::Jmp(_) => Opcode::Jmp,
            Self::Jt(..) => Opcode::Jt,
            Self::Jf(..) => Opcode::Jf,
            Self::Add(..) => Opcode::Add,
            Self::Mult(..) => Opcode::Mult,
            Self::Mod(..) => Opcode::Mod,
            Self::And(..) => Opcode::And,
            Self::Or(..) => Opcode::Or,
            Self::Not(..) => Opcode::Not,
            Self::Rmem(..) => Opcode::Rmem,
            Self::Wmem(..) => Opcode::Wmem,
            Self::Call(_) => Opcode::Call,
            Self::Ret => Opcode::Ret,
            Self::Out(_) => Opcode::Out,
            Self::In(_) => Opcode::In,
            Self::Noop => Opcode::Noop,
        }
    }

    /// Execute the instruction
    ///
    /// Every fallible check happens before the computer is mutated, so a
    /// failing instruction leaves the state untouched.
    #[tracing::instrument(skip(computer), level = "trace")]
    #[allow(clippy::too_many_lines)]
    pub(crate) fn execute(&self, computer: &mut Computer) -> Result<Step, ProcessorError> {
        use Instruction::*;

        let next = computer.pc + self.opcode().width();

        match *self {
            Halt => return Ok(Step::Halted),

            Set(reg, value) => {
                let value = computer.value(value);
                debug!("{} <- {}", reg, value);
                computer.registers.set(reg, value);
            }

            Push(value) => {
                let value = computer.value(value);
                debug!("push({})", value);
                computer.push(value)?;
            }

            Pop(target) => {
                let value = computer.peek_stack()?;
                computer.write(target, value)?;
                computer.stack.pop();
                debug!("pop => {}", value);
            }

            Eq(target, a, b) => {
                let (a, b) = (computer.value(a), computer.value(b));
                let res = C::Word::from(a == b);
                debug!("{} == {} => {}", a, b, res);
                computer.write(target, res)?;
            }

            Gt(target, a, b) => {
                let (a, b) = (computer.value(a), computer.value(b));
                let res = C::Word::from(a > b);
                debug!("{} > {} => {}", a, b, res);
                computer.write(target, res)?;
            }

            Jmp(address) => {
                let address = computer.value(address);
                computer.jump(address)?;
                return Ok(Step::Continue);
            }

            Jt(cond, address) => {
                if computer.value(cond) != 0 {
                    let address = computer.value(address);
                    computer.jump(address)?;
                    return Ok(Step::Continue);
                }
            }

            Jf(cond, address) => {
                if computer.value(cond) == 0 {
                    let address = computer.value(address);
                    computer.jump(address)?;
                    return Ok(Step::Continue);
                }
            }

            Add(target, a, b) => {
                let (a, b) = (computer.value(a), computer.value(b));
                let res = wrap(u32::from(a) + u32::from(b));
                debug!("{} + {} = {}", a, b, res);
                computer.write(target, res)?;
            }

            Mult(target, a, b) => {
                let (a, b) = (computer.value(a), computer.value(b));
                let res = wrap(u32::from(a) * u32::from(b));
                debug!("{} * {} = {}", a, b, res);
                computer.write(target, res)?;
            }

            Mod(target, a, b) => {
                let (a, b) = (computer.value(a), computer.value(b));
                let res = a.checked_rem(b).ok_or(Exception::DivByZero)?;
                let res = wrap(u32::from(res));
                debug!("{} % {} = {}", a, b, res);
                computer.write(target, res)?;
            }

            And(target, a, b) => {
                let (a, b) = (computer.value(a), computer.value(b));
                let res = a & b & C::VALUE_MASK;
                debug!("{} & {} = {}", a, b, res);
                computer.write(target, res)?;
            }

            Or(target, a, b) => {
                let (a, b) = (computer.value(a), computer.value(b));
                let res = (a | b) & C::VALUE_MASK;
                debug!("{} | {} = {}", a, b, res);
                computer.write(target, res)?;
            }

            Not(target, a) => {
                let a = computer.value(a);
                let res = !a & C::VALUE_MASK;
                debug!("!{} = {}", a, res);
                computer.write(target, res)?;
            }

            Rmem(target, address) => {
                let address = computer.memory_address(address)?;
                let value = computer.memory.get(address)?;
                debug!("[{}] => {}", address, value);
                computer.write(target, value)?;
            }

            Wmem(address, value) => {
                let address = computer.memory_address(address)?;
                let value = computer.value(value);
                debug!("[{}] <- {}", address, value);
                computer.write(Target::Memory(address), value)?;
            }

            Call(address) => {
                let address = computer.value(address);
                let address = Computer::check_address(address)?;
                computer.push(next)?;
                computer.jump(address)?;
                return Ok(Step::Continue);
            }

            Ret => {
                let address = computer.peek_stack()?;
                let address = Computer::check_address(address)?;
                computer.stack.pop();
                debug!("Returning to {}", address);
                computer.jump(address)?;
                return Ok(Step::Continue);
            }

            Out(value) => {
                let value = computer.value(value);
                let c = Some(value)
                    .filter(|v| *v < C::REGISTER_BASE)
                    .and_then(|v| char::from_u32(u32::from(v)))
                    .ok_or(Exception::InvalidCharacter {
                        value: u32::from(value),
                    })?;
                computer.io.write(c)?;
            }

            In(target) => {
                let c = computer.io.peek()?.ok_or(ProcessorError::EndOfInput)?;
                let code = u32::from(c);
                let value = C::Word::try_from(code)
                    .ok()
                    .filter(|v| *v < C::REGISTER_BASE)
                    .ok_or(Exception::InvalidCharacter { value: code })?;
                computer.write(target, value)?;
                computer.io.advance();
                debug!("in => {:?}", c);
            }

            Noop => {}
        };

        computer.pc = next;
        Ok(Step::Continue)
    }
}
