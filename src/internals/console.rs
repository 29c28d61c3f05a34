/// Console and REPL
///
/// The output stream, the interactive loop, and the I/O word set. The REPL
/// prints OK: while reading from the console, hands each logical line to
/// the token processor, and on error prints `Error: <message>` to stderr,
/// clears the stacks and carries on. The dispatcher in front of evaluation
/// handles the shell commands BYE/EXIT, LOAD, HELP and WORDS.
///
use std::io::{self, IsTerminal, Write};
use std::path::Path;

use crate::engine::ForthEngine;
use crate::errors::fault;
use crate::internals::terminal;
use crate::internals::tokenizer::Tokenizer;
use crate::internals::words::{decode_addr, Flow, Step};
use crate::kernel::Cell;

/// Where word output goes: the process stdout, or a capture buffer.
pub enum OutStream {
    Stdout,
    Captured(Vec<u8>),
}

impl Write for OutStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            OutStream::Stdout => io::stdout().write(buf),
            OutStream::Captured(data) => {
                data.extend_from_slice(buf);
                Ok(buf.len())
            }
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            OutStream::Stdout => io::stdout().flush(),
            OutStream::Captured(_) => Ok(()),
        }
    }
}

impl OutStream {
    pub fn take_captured(&mut self) -> String {
        match self {
            OutStream::Captured(data) => String::from_utf8_lossy(&std::mem::take(data)).into_owned(),
            OutStream::Stdout => String::new(),
        }
    }
}

macro_rules! pop_cell {
    ($self:ident, $word:expr) => {
        match $self.data.pop() {
            Ok(c) => c,
            Err(f) => return Err(fault($word, f)),
        }
    };
}
macro_rules! push_cell {
    ($self:ident, $word:expr, $val:expr) => {
        if let Err(f) = $self.data.push($val) {
            return Err(fault($word, f));
        }
    };
}

impl ForthEngine {
    /// The outer interpreter: read, dispatch, evaluate, recover.
    pub fn repl(&mut self) {
        let tokenizer = Tokenizer::new(self.case_insensitive);
        loop {
            if self.should_exit() {
                break;
            }
            if self.interactive() && !self.compiling() {
                print!("OK: ");
                io::stdout().flush().ok();
            }
            match tokenizer.next_tokens(&mut self.reader) {
                None => break,
                Some(tokens) => {
                    if tokens.is_empty() {
                        continue;
                    }
                    if self.interactive() && !self.compiling() && self.special_command(&tokens) {
                        continue;
                    }
                    if let Err(e) = self.eval_tokens(&tokens) {
                        eprintln!("Error: {}", e);
                        self.recover();
                    }
                }
            }
            self.flush_out();
        }
    }

    fn interactive(&self) -> bool {
        self.reader.last().map(|r| r.is_console()).unwrap_or(false)
    }

    /// Shell commands, matched on the first token only.
    fn special_command(&mut self, tokens: &[String]) -> bool {
        let first = tokens[0].to_uppercase();
        if first.contains("BYE") || first.contains("EXIT") {
            self.exit_flag = true;
            true
        } else if first.contains("LOAD") {
            self.load_prompted();
            true
        } else if first.contains("HELP") {
            self.print_help();
            true
        } else if first.contains("WORDS") {
            self.print_words();
            true
        } else {
            false
        }
    }

    /// LOAD: ask for a path and push the file as the active source.
    fn load_prompted(&mut self) {
        print!("File path: ");
        io::stdout().flush().ok();
        if let Some(line) = self.reader.last_mut().and_then(|r| r.get_line()) {
            let path = line.trim().to_string();
            if !path.is_empty() {
                self.load_file(Path::new(&path));
            }
        }
    }

    /// WORDS: the dictionary, alphabetical, with immediate flags and
    /// comments.
    pub fn print_words(&mut self) {
        let lines: Vec<String> = self
            .dict
            .iter_sorted()
            .iter()
            .map(|(name, entry)| {
                let flag = if entry.immediate { "I" } else { " " };
                let comment = entry.comment.lines().next().unwrap_or("");
                format!("{:<16} {} {}\n", name, flag, comment)
            })
            .collect();
        for line in lines {
            self.emit_str(&line);
        }
        let count = format!("{} words\n", self.dict.len());
        self.emit_str(&count);
    }

    pub fn print_help(&mut self) {
        self.emit_str(
            "rforth - an interactive Forth environment\n\
             Type Forth words separated by blanks; a line is evaluated when entered.\n\
             Shell commands: BYE or EXIT to quit, LOAD to read a source file,\n\
             WORDS to list the dictionary, HELP for this text.\n",
        );
    }

    // ---- output words ----

    /// EMIT ( c -- ) send one character to the output
    pub fn f_emit(&mut self) -> Step {
        let c = pop_cell!(self, "EMIT").to_char();
        self.emit_str(&(c as char).to_string());
        Ok(Flow::Continue)
    }

    /// TYPE ( a u -- ) write u bytes from address a
    pub fn f_type(&mut self) -> Step {
        let len = pop_cell!(self, "TYPE").to_int() as usize;
        let addr = pop_cell!(self, "TYPE");
        let bytes = self.read_bytes("TYPE", addr, len)?;
        let text = String::from_utf8_lossy(&bytes).into_owned();
        self.emit_str(&text);
        Ok(Flow::Continue)
    }

    /// . ( n -- ) print the top of stack under the current BASE
    pub fn f_dot(&mut self) -> Step {
        let val = pop_cell!(self, ".");
        let text = self.format_int(val.to_int());
        self.emit_str(&text);
        Ok(Flow::Continue)
    }

    /// .S ( -- ) print the whole stack, bottom first
    pub fn f_dot_s(&mut self) -> Step {
        let text = self
            .data
            .data()
            .iter()
            .map(|c| self.format_int(c.to_int()))
            .collect::<Vec<_>>()
            .join(" ");
        self.emit_str(&text);
        Ok(Flow::Continue)
    }

    pub fn f_cr(&mut self) -> Step {
        self.emit_str("\n");
        Ok(Flow::Continue)
    }

    pub fn f_tab(&mut self) -> Step {
        self.emit_str("\t");
        Ok(Flow::Continue)
    }

    pub fn f_space(&mut self) -> Step {
        self.emit_str(" ");
        Ok(Flow::Continue)
    }

    /// DUMP ( a u -- ) hex dump, sixteen bytes per line
    pub fn f_dump(&mut self) -> Step {
        let len = pop_cell!(self, "DUMP").to_int() as usize;
        let addr = pop_cell!(self, "DUMP");
        let bytes = self.read_bytes("DUMP", addr, len)?;
        let (_, base_offset) = decode_addr(addr);
        let mut text = String::new();
        for (i, chunk) in bytes.chunks(16).enumerate() {
            let hex: String = chunk.iter().map(|b| format!("{:02X} ", b)).collect();
            let ascii: String = chunk
                .iter()
                .map(|b| if b.is_ascii_graphic() || *b == b' ' { *b as char } else { '.' })
                .collect();
            text.push_str(&format!("{:08X}  {:<48} |{}|\n", base_offset + i * 16, hex, ascii));
        }
        self.emit_str(&text);
        Ok(Flow::Continue)
    }

    // ---- input words ----

    /// KEY ( -- c | 0 ) one character from the input source. On a real
    /// console this reads a single keystroke in raw mode.
    pub fn f_key(&mut self) -> Step {
        let console = self.interactive() && io::stdin().is_terminal();
        let byte = if console {
            terminal::read_key().ok()
        } else {
            self.reader.last_mut().and_then(|r| r.read_byte())
        };
        push_cell!(self, "KEY", Cell::from_char(byte.unwrap_or(0)));
        Ok(Flow::Continue)
    }

    /// ACCEPT ( a u1 -- a u2 ) read a line of up to u1 characters into the
    /// buffer at a, returning the count actually stored
    pub fn f_accept(&mut self) -> Step {
        let max = pop_cell!(self, "ACCEPT").to_int() as usize;
        let addr = self.data.peek().map_err(|f| fault("ACCEPT", f))?;
        let line = self.reader.last_mut().and_then(|r| r.get_line());
        let count = match line {
            Some(line) => {
                let text = line.trim_end_matches(['\n', '\r']);
                let len = text.len().min(max);
                self.write_bytes("ACCEPT", addr, &text.as_bytes()[..len])?;
                len
            }
            None => 0,
        };
        push_cell!(self, "ACCEPT", Cell::from_int(count as i64));
        Ok(Flow::Continue)
    }
}

//////////////////////////////////////////////
/// TESTS
///
#[cfg(test)]
mod tests {
    use super::*;

    fn run(src: &str) -> (ForthEngine, String) {
        let mut e = ForthEngine::default();
        e.capture_output();
        e.cold_start();
        e.interpret_source(src);
        let out = e.take_output();
        (e, out)
    }

    #[test]
    fn test_emit_and_spacing() {
        let (_, out) = run("65 EMIT SPACE 66 EMIT TAB 67 EMIT CR");
        assert_eq!(out, "A B\tC\n");
    }

    #[test]
    fn test_dot_s_bottom_first() {
        let (_, out) = run("1 2 3 .S");
        assert_eq!(out, "1 2 3");
    }

    #[test]
    fn test_dot_s_respects_base() {
        let (_, out) = run("255 HEX .S");
        assert_eq!(out, "0xFF");
    }

    #[test]
    fn test_type_writes_buffer_bytes() {
        let (_, out) = run("S\" forth\" TYPE");
        assert_eq!(out, "forth");
    }

    #[test]
    fn test_dump_formats_hex_lines() {
        let (_, out) = run("CREATE T 65 C, 66 C, T 2 DUMP");
        assert!(out.contains("41 42"));
        assert!(out.contains("|AB|"));
    }

    #[test]
    fn test_key_reads_from_source() {
        let (_, out) = run("KEY .\nX");
        assert_eq!(out, "88");
    }

    #[test]
    fn test_key_pushes_zero_at_eof() {
        let (e, _) = run("KEY");
        assert_eq!(e.data.data()[0].to_int(), 0);
    }

    #[test]
    fn test_accept_reads_line() {
        let (_, out) = run("PAD 100 ACCEPT TYPE\nhello");
        assert_eq!(out, "hello");
    }

    #[test]
    fn test_accept_truncates_to_max() {
        let (_, out) = run("PAD 3 ACCEPT TYPE\nhello");
        assert_eq!(out, "hel");
    }

    #[test]
    fn test_words_listing() {
        let mut e = ForthEngine::default();
        e.capture_output();
        e.cold_start();
        e.print_words();
        let out = e.take_output();
        assert!(out.contains("DUP"));
        assert!(out.contains("words"));
    }
}
