use parse_display::Display;

use crate::constants as C;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Registers {
    inner: [C::Word; C::REGISTER_COUNT],
}

impl Registers {
    #[must_use]
    pub fn get(&self, reg: Reg) -> C::Word {
        self.inner[reg.index()]
    }

    pub fn set(&mut self, reg: Reg, value: C::Word) {
        self.inner[reg.index()] = value;
    }
}

impl std::fmt::Display for Registers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, reg) in Reg::ALL.iter().enumerate() {
            if i > 0 {
                write!(f, " | ")?;
            }
            write!(f, "{reg} = {}", self.get(*reg))?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[display("%{}", style = "lowercase")]
#[repr(u16)]
pub enum Reg {
    R0,
    R1,
    R2,
    R3,
    R4,
    R5,
    R6,
    R7,
}

impl Reg {
    pub const ALL: [Reg; C::REGISTER_COUNT] = [
        Reg::R0,
        Reg::R1,
        Reg::R2,
        Reg::R3,
        Reg::R4,
        Reg::R5,
        Reg::R6,
        Reg::R7,
    ];

    /// Decode a register selector (`32768..=32775`)
    #[must_use]
    pub fn from_selector(raw: C::Word) -> Option<Self> {
        let index = raw.checked_sub(C::REGISTER_BASE)?;
        Self::ALL.get(usize::from(index)).copied()
    }

    /// The raw selector designating this register
    #[must_use]
    pub const fn selector(self) -> C::Word {
        C::REGISTER_BASE + self as C::Word
    }

    const fn index(self) -> usize {
        self as usize
    }
}
