//! Character I/O of the computer
//!
//! Output characters are accumulated in a buffer owned by the computer and
//! mirrored to a live sink. Input characters are taken from a queue, which is
//! refilled one line at a time from an external source once empty.

use std::collections::VecDeque;
use std::io::{BufRead, Write};

use tracing::trace;

pub struct Io {
    output: String,
    input: VecDeque<char>,
    source: Box<dyn BufRead>,
    mirror: Box<dyn Write>,
}

impl std::fmt::Debug for Io {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Io")
            .field("output", &self.output)
            .field("input", &self.input)
            .finish_non_exhaustive()
    }
}

impl Default for Io {
    fn default() -> Self {
        Self {
            output: String::new(),
            input: VecDeque::new(),
            source: Box::new(std::io::empty()),
            mirror: Box::new(std::io::sink()),
        }
    }
}

impl Io {
    pub(crate) fn set_source(&mut self, source: impl BufRead + 'static) {
        self.source = Box::new(source);
    }

    pub(crate) fn set_mirror(&mut self, mirror: impl Write + 'static) {
        self.mirror = Box::new(mirror);
    }

    /// Queue characters to be read before anything from the external source
    pub(crate) fn seed(&mut self, chars: impl IntoIterator<Item = char>) {
        self.input.extend(chars);
    }

    /// Everything written by the program so far
    #[must_use]
    pub fn output(&self) -> &str {
        &self.output
    }

    /// Characters waiting to be read by the program
    #[must_use]
    pub fn pending_input(&self) -> &VecDeque<char> {
        &self.input
    }

    /// Forward a character to the mirror, then append it to the output
    ///
    /// Nothing is recorded if the mirror fails.
    pub(crate) fn write(&mut self, c: char) -> std::io::Result<()> {
        write!(self.mirror, "{c}")?;
        self.mirror.flush()?;
        self.output.push(c);
        Ok(())
    }

    /// Look at the next input character, blocking on the external source if
    /// the queue is empty
    ///
    /// Returns `None` once the external source is exhausted.
    pub(crate) fn peek(&mut self) -> std::io::Result<Option<char>> {
        if self.input.is_empty() {
            self.refill()?;
        }
        Ok(self.input.front().copied())
    }

    /// Consume the next input character
    pub(crate) fn advance(&mut self) -> Option<char> {
        self.input.pop_front()
    }

    fn refill(&mut self) -> std::io::Result<()> {
        let mut line = String::new();
        let read = self.source.read_line(&mut line)?;
        if read == 0 {
            trace!("Input source exhausted");
            return Ok(());
        }

        let line = line
            .strip_suffix('\n')
            .map_or(line.as_str(), |l| l.strip_suffix('\r').unwrap_or(l));
        trace!(line, "Refilling input queue");
        self.input.extend(line.chars());
        self.input.push_back('\n');
        Ok(())
    }
}
