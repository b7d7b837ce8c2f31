//! Line output for script programs
//!
//! Text is treated as a NUL-terminated byte sequence: everything from the
//! first NUL on is dropped, the way `puts` would see a C string.

use std::io::{self, Write};

/// Length of `text` up to its first NUL byte
pub fn strlen(text: &[u8]) -> usize {
    text.iter().position(|&b| b == 0).unwrap_or(text.len())
}

#[derive(Debug)]
pub struct Console<W> {
    out: W,
}

impl<W: Write> Console<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn print(&mut self, text: &[u8]) -> io::Result<()> {
        self.out.write_all(&text[..strlen(text)])
    }

    pub fn puts(&mut self, text: &[u8]) -> io::Result<()> {
        self.print(text)?;
        self.out.write_all(b"\n")
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strlen_stops_at_nul() {
        assert_eq!(strlen(b"hello"), 5);
        assert_eq!(strlen(b"he\0llo"), 2);
        assert_eq!(strlen(b""), 0);
    }

    #[test]
    fn test_puts_appends_newline() {
        let mut console = Console::new(Vec::new());
        console.puts(b"start").unwrap();
        console.print(b"a").unwrap();
        console.print(b"b\0ignored").unwrap();
        console.puts(b"").unwrap();
        assert_eq!(console.into_inner(), b"start\nab\n");
    }
}
