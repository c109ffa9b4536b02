use std::io::Write;

use anyhow::Context;
use clap::{CommandFactory, Parser};
use clap_complete::{generate, Shell};

use crate::Opt;

#[derive(Parser, Debug)]
pub struct CompletionOpt {
    /// Shell to generate the completion script for
    #[clap(value_enum)]
    shell: Shell,

    /// Name the completed binary is invoked as
    #[clap(long, default_value = "synacor")]
    bin_name: String,
}

impl CompletionOpt {
    /// Write the completion script for the whole command line
    fn write_script(&self, out: &mut dyn Write) {
        generate(self.shell, &mut Opt::command(), self.bin_name.as_str(), out);
    }

    pub fn exec(&self) -> anyhow::Result<()> {
        let mut stdout = std::io::stdout().lock();
        self.write_script(&mut stdout);
        stdout
            .flush()
            .context("Could not write the completion script")
    }
}
