//! Virtual terminal for checking what the readout leaves on screen.
//!
//! Wraps a `vt100::Parser` to simulate a real terminal: backspaces move the
//! cursor, printed characters overwrite cells.

use std::fmt;
use std::io::{self, Write};

pub struct VirtualTerminal {
    parser: vt100::Parser,
}

impl VirtualTerminal {
    pub fn new(width: u16, height: u16) -> Self {
        Self {
            parser: vt100::Parser::new(height, width, 0),
        }
    }

    /// Cursor position as (row, column).
    pub fn cursor(&self) -> (u16, u16) {
        self.parser.screen().cursor_position()
    }

    pub fn contents(&self) -> String {
        self.parser.screen().contents()
    }
}

impl Write for VirtualTerminal {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.parser.process(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl fmt::Display for VirtualTerminal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.contents())
    }
}
