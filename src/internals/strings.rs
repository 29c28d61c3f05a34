/// String and memory words
///
/// Addressed access into buffer nodes (@ ! C@ C! C+!), the CREATE data
/// protocol (, C, ALLOT extending the newest buffer), and the block words
/// FILL ERASE BLANK MOVE COMPARE SEARCH. Addresses are validated on every
/// access; a cell that does not name bytes inside a live buffer reports
/// address-out-of-range instead of touching anything.
///
use crate::engine::ForthEngine;
use crate::errors::fault;
use crate::internals::words::{decode_addr, encode_addr, Flow, Step};
use crate::kernel::Cell;

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
    /// @ ( a -- v ) load the cell at address a
    pub fn f_get(&mut self) -> Step {
        let addr = pop_cell!(self, "@");
        let val = self.read_cell_at("@", addr)?;
        push_cell!(self, "@", val);
        Ok(Flow::Continue)
    }

    /// ! ( v a -- ) store v at address a
    pub fn f_store(&mut self) -> Step {
        let addr = pop_cell!(self, "!");
        let val = pop_cell!(self, "!");
        self.write_cell_at("!", addr, val)?;
        Ok(Flow::Continue)
    }

    /// C@ ( a -- c ) load the byte at address a
    pub fn f_c_get(&mut self) -> Step {
        let addr = pop_cell!(self, "C@");
        let val = self.read_byte_at("C@", addr)?;
        push_cell!(self, "C@", Cell::from_char(val));
        Ok(Flow::Continue)
    }

    /// C! ( c a -- ) store the low byte of c at address a
    pub fn f_c_store(&mut self) -> Step {
        let addr = pop_cell!(self, "C!");
        let val = pop_cell!(self, "C!");
        self.write_byte_at("C!", addr, val.to_char())?;
        Ok(Flow::Continue)
    }

    /// C+! ( n a -- ) add n to the byte at address a
    pub fn f_c_plus_store(&mut self) -> Step {
        let addr = pop_cell!(self, "C+!");
        let val = pop_cell!(self, "C+!");
        let old = self.read_byte_at("C+!", addr)?;
        self.write_byte_at("C+!", addr, old.wrapping_add(val.to_char()))?;
        Ok(Flow::Continue)
    }

    /// CREATE as a primitive: allocate a fresh empty buffer. The creation
    /// branch of a defining word calls this; the interpreter supplies the
    /// name.
    pub fn f_create(&mut self) -> Step {
        self.repo.append_create_buffer();
        Ok(Flow::Continue)
    }

    /// , ( n -- ) append a cell to the newest CREATE buffer
    pub fn f_comma(&mut self) -> Step {
        let val = pop_cell!(self, ",");
        let buf = self.latest_buffer_mut(",")?;
        buf.extend_from_slice(&val.to_uint().to_le_bytes());
        Ok(Flow::Continue)
    }

    /// C, ( c -- ) append a byte to the newest CREATE buffer
    pub fn f_c_comma(&mut self) -> Step {
        let val = pop_cell!(self, "C,");
        let buf = self.latest_buffer_mut("C,")?;
        buf.push(val.to_char());
        Ok(Flow::Continue)
    }

    /// ALLOT ( n -- ) reserve zeroed space; a negative count releases
    pub fn f_allot(&mut self) -> Step {
        let count = pop_cell!(self, "ALLOT").to_int();
        let buf = self.latest_buffer_mut("ALLOT")?;
        if count >= 0 {
            buf.resize(buf.len() + count as usize, 0);
        } else {
            let keep = buf.len().saturating_sub(count.unsigned_abs() as usize);
            buf.truncate(keep);
        }
        Ok(Flow::Continue)
    }

    /// FILL ( a u c -- ) store byte c into u bytes starting at a
    pub fn f_fill(&mut self) -> Step {
        let c = pop_cell!(self, "FILL").to_char();
        let len = pop_cell!(self, "FILL").to_int() as usize;
        let addr = pop_cell!(self, "FILL");
        self.write_bytes("FILL", addr, &vec![c; len])?;
        Ok(Flow::Continue)
    }

    /// ERASE ( a u -- ) zero u bytes starting at a
    pub fn f_erase(&mut self) -> Step {
        let len = pop_cell!(self, "ERASE").to_int() as usize;
        let addr = pop_cell!(self, "ERASE");
        self.write_bytes("ERASE", addr, &vec![0; len])?;
        Ok(Flow::Continue)
    }

    /// BLANK ( a u -- ) fill u bytes starting at a with blanks
    pub fn f_blank(&mut self) -> Step {
        let len = pop_cell!(self, "BLANK").to_int() as usize;
        let addr = pop_cell!(self, "BLANK");
        self.write_bytes("BLANK", addr, &vec![b' '; len])?;
        Ok(Flow::Continue)
    }

    /// MOVE ( a1 a2 u -- ) copy u bytes from a1 to a2; overlap is safe
    pub fn f_move(&mut self) -> Step {
        let len = pop_cell!(self, "MOVE").to_int() as usize;
        let dest = pop_cell!(self, "MOVE");
        let src = pop_cell!(self, "MOVE");
        let bytes = self.read_bytes("MOVE", src, len)?;
        self.write_bytes("MOVE", dest, &bytes)?;
        Ok(Flow::Continue)
    }

    /// COMPARE ( a1 u1 a2 u2 -- n ) lexicographic order, -1 0 or 1
    pub fn f_compare(&mut self) -> Step {
        let len2 = pop_cell!(self, "COMPARE").to_int() as usize;
        let addr2 = pop_cell!(self, "COMPARE");
        let len1 = pop_cell!(self, "COMPARE").to_int() as usize;
        let addr1 = pop_cell!(self, "COMPARE");
        let s1 = self.read_bytes("COMPARE", addr1, len1)?;
        let s2 = self.read_bytes("COMPARE", addr2, len2)?;
        let order = match s1.cmp(&s2) {
            std::cmp::Ordering::Less => -1,
            std::cmp::Ordering::Equal => 0,
            std::cmp::Ordering::Greater => 1,
        };
        push_cell!(self, "COMPARE", Cell::from_int(order));
        Ok(Flow::Continue)
    }

    /// SEARCH ( a1 u1 a2 u2 -- a3 u3 b ) look for the second string inside
    /// the first; on a hit a3/u3 address the match and the remainder
    pub fn f_search(&mut self) -> Step {
        let len2 = pop_cell!(self, "SEARCH").to_int() as usize;
        let addr2 = pop_cell!(self, "SEARCH");
        let len1 = pop_cell!(self, "SEARCH").to_int() as usize;
        let addr1 = pop_cell!(self, "SEARCH");
        let hay = self.read_bytes("SEARCH", addr1, len1)?;
        let needle = self.read_bytes("SEARCH", addr2, len2)?;
        let hit = if needle.is_empty() {
            Some(0)
        } else {
            hay.windows(needle.len()).position(|w| w == needle)
        };
        match hit {
            Some(i) => {
                let (node, offset) = decode_addr(addr1);
                push_cell!(self, "SEARCH", encode_addr(node, offset + i));
                push_cell!(self, "SEARCH", Cell::from_int((len1 - i) as i64));
                push_cell!(self, "SEARCH", Cell::from_bool(true));
            }
            None => {
                push_cell!(self, "SEARCH", addr1);
                push_cell!(self, "SEARCH", Cell::from_int(len1 as i64));
                push_cell!(self, "SEARCH", Cell::from_bool(false));
            }
        }
        Ok(Flow::Continue)
    }
}

//////////////////////////////////////////////
/// TESTS
///
#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ForthError;

    fn engine_with(src: &str) -> ForthEngine {
        let mut e = ForthEngine::default();
        e.capture_output();
        e.cold_start();
        e.interpret_source(src);
        e
    }

    fn stack(e: &ForthEngine) -> Vec<i64> {
        e.data.data().iter().map(|c| c.to_int()).collect()
    }

    #[test]
    fn test_store_and_fetch() {
        let e = engine_with("VARIABLE V 123 V ! V @");
        assert_eq!(stack(&e), vec![123]);
    }

    #[test]
    fn test_byte_store_masks_to_char() {
        let e = engine_with("VARIABLE V 0x1FF V C! V C@");
        assert_eq!(stack(&e), vec![0xFF]);
    }

    #[test]
    fn test_c_plus_store_accumulates() {
        let e = engine_with("VARIABLE V 7 V C! 3 V C+! V C@");
        assert_eq!(stack(&e), vec![10]);
    }

    #[test]
    fn test_comma_appends_cells() {
        let e = engine_with("CREATE T 10 , 20 , T CELL+ @ T @");
        assert_eq!(stack(&e), vec![20, 10]);
    }

    #[test]
    fn test_c_comma_appends_bytes() {
        let e = engine_with("CREATE T 65 C, 66 C, T C@ T 1 + C@");
        assert_eq!(stack(&e), vec![65, 66]);
    }

    #[test]
    fn test_negative_allot_releases() {
        let e = engine_with("CREATE T 16 ALLOT -8 ALLOT");
        let node = e.dict.lookup("T").unwrap().node;
        assert_eq!(e.repo.buffer(node).unwrap().len(), 8);
    }

    #[test]
    fn test_fill_erase_blank() {
        let e = engine_with("CREATE T 4 ALLOT T 4 42 FILL T C@ T 3 + C@");
        assert_eq!(stack(&e), vec![42, 42]);
        let e = engine_with("CREATE T 4 ALLOT T 4 42 FILL T 4 ERASE T C@");
        assert_eq!(stack(&e), vec![0]);
        let e = engine_with("CREATE T 2 ALLOT T 2 BLANK T C@");
        assert_eq!(stack(&e), vec![32]);
    }

    #[test]
    fn test_move_between_buffers() {
        let e = engine_with(
            "CREATE SRC 65 C, 66 C, 67 C, CREATE DST 3 ALLOT SRC DST 3 MOVE DST 2 + C@",
        );
        assert_eq!(stack(&e), vec![67]);
    }

    #[test]
    fn test_compare_orders() {
        let e = engine_with("S\" abc\" S\" abd\" COMPARE");
        assert_eq!(stack(&e), vec![-1]);
        let e = engine_with("S\" same\" S\" same\" COMPARE");
        assert_eq!(stack(&e), vec![0]);
        let e = engine_with("S\" b\" S\" a\" COMPARE");
        assert_eq!(stack(&e), vec![1]);
    }

    #[test]
    fn test_search_finds_substring() {
        let mut e = engine_with("S\" needle in hay\" S\" in\" SEARCH");
        assert_eq!(e.data.pop().unwrap().to_int(), 1); // found
        assert_eq!(e.data.pop().unwrap().to_int(), 6); // remaining length
    }

    #[test]
    fn test_search_miss_leaves_original() {
        let mut e = engine_with("S\" hay\" S\" xyz\" SEARCH");
        assert_eq!(e.data.pop().unwrap().to_int(), 0);
        assert_eq!(e.data.pop().unwrap().to_int(), 3);
    }

    #[test]
    fn test_fetch_bad_address_errors() {
        let mut e = ForthEngine::default();
        e.capture_output();
        e.cold_start();
        e.data.push(Cell::from_int(1234)).unwrap();
        assert_eq!(e.f_get(), Err(ForthError::IndexOutOfRange { word: "@".to_string() }));
    }
}
