// Input sources for the tokenizer: stdin, a source file, or in-memory text.
// Sources stack; a LOAD pushes a file handle and EOF pops back to the
// previous one.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::path::Path;

use crate::internals::messages::Msg;

#[derive(Debug)]
pub enum FType {
    Stdin,
    BReader(BufReader<File>),
    Text(VecDeque<String>),
}

#[derive(Debug)]
pub struct FileHandle {
    pub source: FType,
    msg: Msg,
}

/// FileHandle hands lines to the tokenizer, one at a time.
///
///     Stdin blocks until the user provides a line. A Text source is used
///     for boot code and tests; it never blocks.
impl FileHandle {
    pub fn stdin(msg: Msg) -> FileHandle {
        FileHandle { source: FType::Stdin, msg }
    }

    pub fn open(file_path: &Path, msg: Msg) -> Option<FileHandle> {
        match File::open(file_path) {
            Ok(file) => Some(FileHandle { source: FType::BReader(BufReader::new(file)), msg }),
            Err(_) => {
                msg.error("FileHandle::open", "Unable to open file", Some(file_path));
                None
            }
        }
    }

    pub fn text(source: &str, msg: Msg) -> FileHandle {
        let lines = source.lines().map(|l| l.to_string()).collect();
        FileHandle { source: FType::Text(lines), msg }
    }

    /// True when this handle reads the interactive console.
    pub fn is_console(&self) -> bool {
        matches!(self.source, FType::Stdin)
    }

    /// get_line returns the next line of text, or None at end of input.
    ///
    pub fn get_line(&mut self) -> Option<String> {
        let mut new_line = String::new();
        let result = match self.source {
            FType::Stdin => {
                io::stdout().flush().ok();
                io::stdin().read_line(&mut new_line)
            }
            FType::BReader(ref mut br) => br.read_line(&mut new_line),
            FType::Text(ref mut lines) => return lines.pop_front(),
        };
        match result {
            Ok(chars) => {
                if chars > 0 {
                    Some(new_line)
                } else {
                    None
                }
            }
            Err(e) => {
                self.msg.error("get_line", "read_line error", Some(e.to_string()));
                None
            }
        }
    }

    /// read_byte gets a single byte from the input, for KEY on non-console
    /// sources. Returns None at end of input.
    ///
    pub fn read_byte(&mut self) -> Option<u8> {
        let mut buf = [0; 1];
        match self.source {
            FType::Stdin => {
                let mut handle = io::stdin().lock();
                match handle.read(&mut buf) {
                    Ok(n) if n > 0 => Some(buf[0]),
                    _ => None,
                }
            }
            FType::BReader(ref mut br) => match br.read(&mut buf) {
                Ok(n) if n > 0 => Some(buf[0]),
                _ => None,
            },
            FType::Text(ref mut lines) => {
                let line = lines.front_mut()?;
                if line.is_empty() {
                    lines.pop_front();
                    return Some(b'\n');
                }
                Some(line.remove(0) as u8)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_source_lines() {
        let mut fh = FileHandle::text("1 2 +\n.\n", Msg::new());
        assert_eq!(fh.get_line().unwrap(), "1 2 +");
        assert_eq!(fh.get_line().unwrap(), ".");
        assert_eq!(fh.get_line(), None);
    }

    #[test]
    fn test_text_source_bytes() {
        let mut fh = FileHandle::text("ab", Msg::new());
        assert_eq!(fh.read_byte(), Some(b'a'));
        assert_eq!(fh.read_byte(), Some(b'b'));
        assert_eq!(fh.read_byte(), Some(b'\n'));
        assert_eq!(fh.read_byte(), None);
    }

    #[test]
    fn test_open_missing_file() {
        assert!(FileHandle::open(Path::new("/no/such/file.fs"), Msg::new()).is_none());
    }

    #[test]
    fn test_console_flag() {
        assert!(FileHandle::stdin(Msg::new()).is_console());
        assert!(!FileHandle::text("", Msg::new()).is_console());
    }
}
