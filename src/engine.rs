//////////////////////////////////////////////////////////////////
/// engine.rs
///
/// Forth Engine
///
/// This module defines the ForthEngine struct, which owns the state of the
/// interpreter: both stacks, the node repository, the dictionary, the
/// structural (compile-time) stack, the input source stack and the output
/// stream. It also provides cold_start, which installs the boot variables,
/// the builtin word set and the core Forth definitions.
///
use std::io::Write;
use std::path::Path;
use std::time::Instant;

use rand_mt::Mt19937GenRand64;

use crate::errors::ForthError;
use crate::files::FileHandle;
use crate::internals::builtin::BuiltinFn;
use crate::internals::console::OutStream;
use crate::internals::messages::Msg;
use crate::internals::tokenizer::Tokenizer;
use crate::internals::words::{
    decode_addr, DictEntry, Dictionary, Frame, NodeId, Pending, Repository, Step, WordNode,
};
use crate::kernel::{Cell, Stack, CELL_BYTES, STACK_CELLS};

// Scratch buffer size for PAD
pub const PAD_SIZE: usize = 132;

/// Core definitions fed through the interpreter before the first prompt.
/// The defining words are ordinary colon definitions built on CREATE/DOES>.
const CORE_WORDS: &str = "\
: VARIABLE ( -- ) CREATE 1 CELLS ALLOT DOES> ;
: CONSTANT ( n -- ) CREATE , DOES> @ ;
: ARRAY ( n -- ) CREATE DUP , CELLS ALLOT DOES> SWAP 1+ CELLS + ;
: HEX ( -- ) 16 BASE ! ;
: DEC ( -- ) 10 BASE ! ;
";

pub struct ForthEngine {
    pub data: Stack,                // the calculation stack
    pub ret: Stack,                 // the return stack
    pub repo: Repository,           // owns every word node
    pub dict: Dictionary,           // name -> entry
    pub builtins: Vec<BuiltinFn>,   // primitive function table
    pub structural: Vec<Frame>,     // compile-time control matching
    pub pending: Option<Pending>,   // definition under construction
    pub all_immediate: bool,        // inside [ ... ] in a definition
    pub base_id: NodeId,            // BASE's buffer, for numeric I/O
    pub pad_id: NodeId,             // scratch buffer
    pub reader: Vec<FileHandle>,    // allows for nested file processing
    pub out: OutStream,
    pub msg: Msg,
    pub rng: Mt19937GenRand64,      // for the random word set
    pub timer: Instant,             // for timing things
    pub exit_flag: bool,            // set when the BYE word is executed
    pub case_insensitive: bool,
}

impl ForthEngine {
    pub fn new(stack_cells: usize, case_insensitive: bool) -> ForthEngine {
        let msg = Msg::new();
        ForthEngine {
            data: Stack::new(stack_cells),
            ret: Stack::new(stack_cells),
            repo: Repository::new(),
            dict: Dictionary::new(),
            builtins: Vec::new(),
            structural: Vec::new(),
            pending: None,
            all_immediate: false,
            base_id: 0,
            pad_id: 0,
            reader: vec![FileHandle::stdin(msg)],
            out: OutStream::Stdout,
            msg,
            rng: Mt19937GenRand64::new(rand::random()),
            timer: Instant::now(),
            exit_flag: false,
            case_insensitive,
        }
    }

    /// cold_start is where the interpreter begins, installing the boot
    /// variables, the builtin functions, and the core Forth definitions.
    pub fn cold_start(&mut self) {
        self.insert_variables();
        self.compile_builtins();
        self.insert_code();
    }

    /// Install the boot variables whose buffers Rust needs direct access to.
    pub fn insert_variables(&mut self) {
        let base = self.repo.append(WordNode::Buffer(10u64.to_le_bytes().to_vec()));
        self.base_id = base;
        let mut entry = DictEntry::new(base);
        entry.comment = "( -- a ) current numeric radix, 10 or 16".to_string();
        self.dict.insert("BASE", entry);

        let pad = self.repo.append(WordNode::Buffer(vec![0; PAD_SIZE]));
        self.pad_id = pad;
        let mut entry = DictEntry::new(pad);
        entry.comment = "( -- a ) scratch buffer".to_string();
        self.dict.insert("PAD", entry);
    }

    /// Run the core Forth definitions through the interpreter.
    pub fn insert_code(&mut self) {
        self.interpret_source(CORE_WORDS);
    }

    /// add_builtin registers a primitive: a slot in the builtins table, a
    /// Primitive node in the repository, and a dictionary entry carrying the
    /// doc string as its comment.
    pub fn add_builtin(&mut self, name: &str, code: fn(&mut ForthEngine) -> Step, doc: &str) -> NodeId {
        let index = self.builtins.len();
        self.builtins.push(BuiltinFn::new(name.to_string(), code, doc.to_string()));
        let node = self.repo.append(WordNode::Primitive(index));
        let mut entry = DictEntry::new(node);
        entry.comment = doc.to_string();
        if self.dict.insert(name, entry) {
            self.msg.warning("add_builtin", "Overwriting existing definition", Some(name));
        }
        node
    }

    /// Feed a complete source text through the tokenizer and the two-mode
    /// token processor, reporting and recovering from errors per line.
    pub fn interpret_source(&mut self, text: &str) {
        self.reader.push(FileHandle::text(text, self.msg));
        let tokenizer = Tokenizer::new(self.case_insensitive);
        let depth = self.reader.len();
        while self.reader.len() >= depth {
            match tokenizer.next_tokens(&mut self.reader) {
                None => break,
                Some(tokens) => {
                    if tokens.is_empty() {
                        continue;
                    }
                    if let Err(e) = self.eval_tokens(&tokens) {
                        eprintln!("Error: {}", e);
                        self.recover();
                    }
                }
            }
        }
    }

    /// Push a source file onto the reader stack; the main loop drains it.
    pub fn load_file(&mut self, path: &Path) -> bool {
        match FileHandle::open(path, self.msg) {
            Some(fh) => {
                self.msg.info("load_file", "Loading", Some(path));
                self.reader.push(fh);
                true
            }
            None => false,
        }
    }

    /// True while a colon definition is being assembled.
    pub fn compiling(&self) -> bool {
        self.pending.is_some()
    }

    /// Error recovery: clear all three stacks and abandon any half-built
    /// definition. The dictionary and node repository are left alone.
    pub fn recover(&mut self) {
        self.data.clear();
        self.ret.clear();
        self.structural.clear();
        self.pending = None;
        self.all_immediate = false;
    }

    /// should_exit determines whether or not the user has executed BYE
    pub fn should_exit(&self) -> bool {
        self.exit_flag
    }

    // ---- numeric radix ----

    /// The lexing/printing radix, read from BASE's first byte on every use.
    pub fn radix(&self) -> u32 {
        match self.repo.buffer(self.base_id).map(|b| b[0]) {
            Some(2) => 2,
            Some(8) => 8,
            Some(16) => 16,
            _ => 10,
        }
    }

    /// Format an integer under the current BASE. Hex output carries the same
    /// 0x prefix the lexer accepts, so print-then-parse round-trips.
    pub fn format_int(&self, v: i64) -> String {
        match self.radix() {
            16 => {
                if v < 0 {
                    format!("-0x{:X}", v.unsigned_abs())
                } else {
                    format!("0x{:X}", v)
                }
            }
            2 => {
                if v < 0 {
                    format!("-{:b}", v.unsigned_abs())
                } else {
                    format!("{:b}", v)
                }
            }
            8 => {
                if v < 0 {
                    format!("-{:o}", v.unsigned_abs())
                } else {
                    format!("{:o}", v)
                }
            }
            _ => v.to_string(),
        }
    }

    pub fn format_float(v: f64) -> String {
        if v.is_finite() && v.fract() == 0.0 {
            format!("{:.1}", v)
        } else {
            format!("{}", v)
        }
    }

    // ---- output ----

    pub fn emit_str(&mut self, text: &str) {
        let _ = self.out.write_all(text.as_bytes());
    }

    pub fn flush_out(&mut self) {
        let _ = self.out.flush();
    }

    /// Redirect output into an in-memory buffer. Tests read it back with
    /// take_output.
    #[allow(dead_code)]
    pub fn capture_output(&mut self) {
        self.out = OutStream::Captured(Vec::new());
    }

    #[allow(dead_code)]
    pub fn take_output(&mut self) -> String {
        self.out.take_captured()
    }

    // ---- addressed memory access ----
    //
    // A cell address names a byte range inside one Buffer node. Every access
    // re-validates the node and the range; a stray cell dereferences to an
    // error, never to another node's bytes.

    fn buffer_check(&self, word: &str, addr: Cell, len: usize) -> Result<(NodeId, usize), ForthError> {
        let (node, offset) = decode_addr(addr);
        match self.repo.node(node) {
            Some(WordNode::Buffer(bytes)) if offset + len <= bytes.len() => Ok((node, offset)),
            _ => Err(ForthError::IndexOutOfRange { word: word.to_string() }),
        }
    }

    pub fn read_bytes(&self, word: &str, addr: Cell, len: usize) -> Result<Vec<u8>, ForthError> {
        let (node, offset) = self.buffer_check(word, addr, len)?;
        let bytes = self.repo.buffer(node).unwrap();
        Ok(bytes[offset..offset + len].to_vec())
    }

    pub fn write_bytes(&mut self, word: &str, addr: Cell, data: &[u8]) -> Result<(), ForthError> {
        let (node, offset) = self.buffer_check(word, addr, data.len())?;
        let bytes = self.repo.buffer_mut(node).unwrap();
        bytes[offset..offset + data.len()].copy_from_slice(data);
        Ok(())
    }

    pub fn read_cell_at(&self, word: &str, addr: Cell) -> Result<Cell, ForthError> {
        let bytes = self.read_bytes(word, addr, CELL_BYTES)?;
        Ok(Cell::from_uint(u64::from_le_bytes(bytes.try_into().unwrap())))
    }

    pub fn write_cell_at(&mut self, word: &str, addr: Cell, val: Cell) -> Result<(), ForthError> {
        self.write_bytes(word, addr, &val.to_uint().to_le_bytes())
    }

    pub fn read_byte_at(&self, word: &str, addr: Cell) -> Result<u8, ForthError> {
        Ok(self.read_bytes(word, addr, 1)?[0])
    }

    pub fn write_byte_at(&mut self, word: &str, addr: Cell, val: u8) -> Result<(), ForthError> {
        self.write_bytes(word, addr, &[val])
    }

    /// The buffer that `,` `C,` `,"` and ALLOT extend: the one made by the
    /// most recent CREATE.
    pub fn latest_buffer_mut(&mut self, word: &str) -> Result<&mut Vec<u8>, ForthError> {
        let id = self
            .repo
            .latest_buffer()
            .ok_or(ForthError::MissingCreate { word: word.to_string() })?;
        self.repo
            .buffer_mut(id)
            .ok_or(ForthError::MissingCreate { word: word.to_string() })
    }
}

impl Default for ForthEngine {
    fn default() -> ForthEngine {
        ForthEngine::new(STACK_CELLS, true)
    }
}

//////////////////////////////////////////////
/// TESTS
///
#[cfg(test)]
mod tests {
    use super::*;
    use crate::internals::words::encode_addr;

    fn cold_engine() -> ForthEngine {
        let mut e = ForthEngine::default();
        e.capture_output();
        e.cold_start();
        e
    }

    #[test]
    fn test_cold_start_installs_base_and_pad() {
        let e = cold_engine();
        assert!(e.dict.lookup("BASE").is_some());
        assert!(e.dict.lookup("PAD").is_some());
        assert_eq!(e.radix(), 10);
    }

    #[test]
    fn test_cold_start_installs_core_definitions() {
        let e = cold_engine();
        for name in ["VARIABLE", "CONSTANT", "ARRAY", "HEX", "DEC", "DUP", "+"] {
            assert!(e.dict.lookup(name).is_some(), "missing {name}");
        }
    }

    #[test]
    fn test_radix_tracks_base_buffer() {
        let mut e = cold_engine();
        let addr = encode_addr(e.base_id, 0);
        e.write_cell_at("!", addr, Cell::from_int(16)).unwrap();
        assert_eq!(e.radix(), 16);
        // unsupported values lex as decimal but read back unchanged
        e.write_cell_at("!", addr, Cell::from_int(5)).unwrap();
        assert_eq!(e.radix(), 10);
        assert_eq!(e.read_cell_at("@", addr).unwrap().to_int(), 5);
    }

    #[test]
    fn test_format_int_per_base() {
        let mut e = cold_engine();
        assert_eq!(e.format_int(255), "255");
        let addr = encode_addr(e.base_id, 0);
        e.write_cell_at("!", addr, Cell::from_int(16)).unwrap();
        assert_eq!(e.format_int(255), "0xFF");
        assert_eq!(e.format_int(-1), "-0x1");
    }

    #[test]
    fn test_memory_access_validates_range() {
        let mut e = cold_engine();
        let pad = encode_addr(e.pad_id, 0);
        e.write_cell_at("!", pad, Cell::from_int(99)).unwrap();
        assert_eq!(e.read_cell_at("@", pad).unwrap().to_int(), 99);

        let past_end = encode_addr(e.pad_id, PAD_SIZE);
        assert_eq!(
            e.read_cell_at("@", past_end),
            Err(ForthError::IndexOutOfRange { word: "@".to_string() })
        );
        // a plain integer is not a buffer address
        assert!(e.read_cell_at("@", Cell::from_int(42)).is_err());
    }

    #[test]
    fn test_recover_clears_stacks_only() {
        let mut e = cold_engine();
        e.data.push(Cell::from_int(1)).unwrap();
        e.ret.push(Cell::from_int(2)).unwrap();
        let words = e.dict.len();
        e.recover();
        assert_eq!(e.data.size(), 0);
        assert_eq!(e.ret.size(), 0);
        assert_eq!(e.dict.len(), words);
    }

    #[test]
    fn test_should_exit() {
        let mut e = ForthEngine::default();
        assert!(!e.should_exit());
        e.exit_flag = true;
        assert!(e.should_exit());
    }
}
