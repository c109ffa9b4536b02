use anyhow::Context;
use camino::{Utf8Path, Utf8PathBuf};
use clap::{Parser, ValueHint};
use synacor_emulator::constants::DEFAULT_STEP_BUDGET;
use synacor_emulator::runtime::RunOutcome;
use synacor_emulator::{decode, Computer};
use tracing::{debug, info, warn};

#[derive(Parser, Debug)]
pub struct RunOpt {
    /// Program image, a sequence of little-endian 16-bit words
    #[clap(value_parser, value_hint = ValueHint::FilePath)]
    input: Utf8PathBuf,

    /// Maximum number of instructions to execute
    #[clap(short, long, default_value_t = DEFAULT_STEP_BUDGET)]
    steps: usize,

    /// Transcript fed to the program before reading from the terminal.
    /// Can be used multiple times.
    #[clap(long, value_hint = ValueHint::FilePath)]
    script: Vec<Utf8PathBuf>,
}

/// Read a transcript file, making sure its last line is terminated
fn read_script(path: &Utf8Path) -> anyhow::Result<String> {
    let mut script = std::fs::read_to_string(path)
        .with_context(|| format!("could not read script {path}"))?;
    if !script.is_empty() && !script.ends_with('\n') {
        script.push('\n');
    }
    Ok(script)
}

impl RunOpt {
    pub fn exec(self) -> anyhow::Result<()> {
        info!(path = %self.input, "Reading program");
        let bytes = std::fs::read(&self.input)
            .with_context(|| format!("could not read program image {}", self.input))?;
        let program = decode(&bytes).context("invalid program image")?;
        debug!(words = program.len(), "Loaded program image");

        let mut input = String::new();
        for path in &self.script {
            info!(%path, "Reading script");
            input.push_str(&read_script(path)?);
        }

        let mut computer = Computer::new(&program)
            .context("could not load program")?
            .with_input(input.chars())
            .with_line_source(std::io::stdin().lock())
            .with_mirror(std::io::stdout());

        info!(steps = self.steps, "Running program");
        let outcome = computer
            .run(self.steps)
            .with_context(|| format!("execution stopped at address {}", computer.pc))?;

        match outcome {
            RunOutcome::Halted { steps } => info!(steps, "Program halted"),
            RunOutcome::BudgetExhausted { steps } => {
                warn!(steps, pc = computer.pc, "Step budget exhausted");
            }
        }
        debug!(registers = %computer.registers, stack = ?computer.stack, "End of program");

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[test]
    fn parse_defaults_test() {
        let opt = RunOpt::try_parse_from(["run", "challenge.bin"]).unwrap();
        assert_eq!(opt.input, "challenge.bin");
        assert_eq!(opt.steps, DEFAULT_STEP_BUDGET);
        assert!(opt.script.is_empty());
    }

    #[test]
    fn parse_scripts_test() {
        let opt = RunOpt::try_parse_from([
            "run", "challenge.bin", "--steps", "42", "--script", "a.txt", "--script", "b.txt",
        ])
        .unwrap();
        assert_eq!(opt.steps, 42);
        assert_eq!(opt.script, vec!["a.txt", "b.txt"]);
    }
}
