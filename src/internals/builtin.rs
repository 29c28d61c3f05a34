/// Builtin words
///
/// The table of primitives: each builtin pairs a Rust function with a name
/// and a doc string, and is wired into the dictionary through a Primitive
/// node. The core arithmetic, stack and return-stack words live here; the
/// I/O, memory, float, random and time word sets are implemented in their
/// own modules and registered below.
///
use crate::engine::ForthEngine;
use crate::errors::{fault, ForthError};
use crate::internals::messages::DebugLevel;
use crate::internals::words::{Flow, Step};
use crate::kernel::{Cell, FALSE, TRUE};

/// The internal format for builtins: a name, code pointer, and documentation
/// string shown by WORDS.
pub struct BuiltinFn {
    pub name: String,
    pub code: fn(&mut ForthEngine) -> Step,
    pub doc: String,
}

impl BuiltinFn {
    pub fn new(name: String, code: fn(&mut ForthEngine) -> Step, doc: String) -> BuiltinFn {
        BuiltinFn { name, code, doc }
    }
}

macro_rules! kernel_op {
    ($self:ident, $word:expr, $call:expr) => {
        if let Err(f) = $call {
            return Err(fault($word, f));
        }
    };
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
    // ---- core arithmetic and stack words, fused in the kernel ----

    pub fn f_plus(&mut self) -> Step {
        kernel_op!(self, "+", self.data.f_add());
        Ok(Flow::Continue)
    }

    pub fn f_minus(&mut self) -> Step {
        kernel_op!(self, "-", self.data.f_sub());
        Ok(Flow::Continue)
    }

    pub fn f_times(&mut self) -> Step {
        kernel_op!(self, "*", self.data.f_mul());
        Ok(Flow::Continue)
    }

    pub fn f_divide(&mut self) -> Step {
        kernel_op!(self, "/", self.data.f_div());
        Ok(Flow::Continue)
    }

    pub fn f_mod(&mut self) -> Step {
        kernel_op!(self, "MOD", self.data.f_mod());
        Ok(Flow::Continue)
    }

    pub fn f_equal(&mut self) -> Step {
        kernel_op!(self, "=", self.data.f_eq());
        Ok(Flow::Continue)
    }

    pub fn f_not_equal(&mut self) -> Step {
        kernel_op!(self, "<>", self.data.f_ne());
        Ok(Flow::Continue)
    }

    pub fn f_less(&mut self) -> Step {
        kernel_op!(self, "<", self.data.f_lt());
        Ok(Flow::Continue)
    }

    pub fn f_less_equal(&mut self) -> Step {
        kernel_op!(self, "<=", self.data.f_le());
        Ok(Flow::Continue)
    }

    pub fn f_greater(&mut self) -> Step {
        kernel_op!(self, ">", self.data.f_gt());
        Ok(Flow::Continue)
    }

    pub fn f_greater_equal(&mut self) -> Step {
        kernel_op!(self, ">=", self.data.f_ge());
        Ok(Flow::Continue)
    }

    pub fn f_0equal(&mut self) -> Step {
        kernel_op!(self, "0=", self.data.f_zero_eq());
        Ok(Flow::Continue)
    }

    pub fn f_0not_equal(&mut self) -> Step {
        kernel_op!(self, "0<>", self.data.f_zero_ne());
        Ok(Flow::Continue)
    }

    pub fn f_0less(&mut self) -> Step {
        kernel_op!(self, "0<", self.data.f_zero_lt());
        Ok(Flow::Continue)
    }

    pub fn f_0less_equal(&mut self) -> Step {
        kernel_op!(self, "0<=", self.data.f_zero_le());
        Ok(Flow::Continue)
    }

    pub fn f_0greater(&mut self) -> Step {
        kernel_op!(self, "0>", self.data.f_zero_gt());
        Ok(Flow::Continue)
    }

    pub fn f_0greater_equal(&mut self) -> Step {
        kernel_op!(self, "0>=", self.data.f_zero_ge());
        Ok(Flow::Continue)
    }

    pub fn f_one_plus(&mut self) -> Step {
        kernel_op!(self, "1+", self.data.f_one_plus());
        Ok(Flow::Continue)
    }

    pub fn f_one_minus(&mut self) -> Step {
        kernel_op!(self, "1-", self.data.f_one_minus());
        Ok(Flow::Continue)
    }

    pub fn f_two_plus(&mut self) -> Step {
        kernel_op!(self, "2+", self.data.f_two_plus());
        Ok(Flow::Continue)
    }

    pub fn f_two_minus(&mut self) -> Step {
        kernel_op!(self, "2-", self.data.f_two_minus());
        Ok(Flow::Continue)
    }

    pub fn f_two_star(&mut self) -> Step {
        kernel_op!(self, "2*", self.data.f_two_star());
        Ok(Flow::Continue)
    }

    pub fn f_and(&mut self) -> Step {
        kernel_op!(self, "AND", self.data.f_and());
        Ok(Flow::Continue)
    }

    pub fn f_or(&mut self) -> Step {
        kernel_op!(self, "OR", self.data.f_or());
        Ok(Flow::Continue)
    }

    pub fn f_xor(&mut self) -> Step {
        kernel_op!(self, "XOR", self.data.f_xor());
        Ok(Flow::Continue)
    }

    pub fn f_not(&mut self) -> Step {
        kernel_op!(self, "NOT", self.data.f_not());
        Ok(Flow::Continue)
    }

    pub fn f_drop(&mut self) -> Step {
        kernel_op!(self, "DROP", self.data.f_drop());
        Ok(Flow::Continue)
    }

    pub fn f_dup(&mut self) -> Step {
        kernel_op!(self, "DUP", self.data.f_dup());
        Ok(Flow::Continue)
    }

    pub fn f_over(&mut self) -> Step {
        kernel_op!(self, "OVER", self.data.f_over());
        Ok(Flow::Continue)
    }

    pub fn f_swap(&mut self) -> Step {
        kernel_op!(self, "SWAP", self.data.f_swap());
        Ok(Flow::Continue)
    }

    pub fn f_rot(&mut self) -> Step {
        kernel_op!(self, "ROT", self.data.f_rot());
        Ok(Flow::Continue)
    }

    pub fn f_cells(&mut self) -> Step {
        kernel_op!(self, "CELLS", self.data.f_cells());
        Ok(Flow::Continue)
    }

    pub fn f_cell_plus(&mut self) -> Step {
        kernel_op!(self, "CELL+", self.data.f_cell_plus());
        Ok(Flow::Continue)
    }

    pub fn f_true(&mut self) -> Step {
        push_cell!(self, "TRUE", Cell::from_int(TRUE));
        Ok(Flow::Continue)
    }

    pub fn f_false(&mut self) -> Step {
        push_cell!(self, "FALSE", Cell::from_int(FALSE));
        Ok(Flow::Continue)
    }

    pub fn f_depth(&mut self) -> Step {
        let depth = self.data.size() as i64;
        push_cell!(self, "DEPTH", Cell::from_int(depth));
        Ok(Flow::Continue)
    }

    // ---- return stack ----

    pub fn f_to_r(&mut self) -> Step {
        let val = pop_cell!(self, ">R");
        if let Err(f) = self.ret.push(val) {
            return Err(fault(">R", f));
        }
        Ok(Flow::Continue)
    }

    pub fn f_r_from(&mut self) -> Step {
        let val = self.ret.pop().map_err(|f| fault("R>", f))?;
        push_cell!(self, "R>", val);
        Ok(Flow::Continue)
    }

    pub fn f_r_get(&mut self) -> Step {
        let val = self.ret.peek().map_err(|f| fault("R@", f))?;
        push_cell!(self, "R@", val);
        Ok(Flow::Continue)
    }

    // ---- control ----

    /// LEAVE unwinds to the nearest loop; it is control flow, not an error.
    pub fn f_leave(&mut self) -> Step {
        Ok(Flow::Leave)
    }

    pub fn f_abort(&mut self) -> Step {
        Err(ForthError::Abort("aborted".to_string()))
    }

    /// EXECUTE ( xt -- ) invoke the word whose handle is on the stack
    pub fn f_execute(&mut self) -> Step {
        let xt = pop_cell!(self, "EXECUTE").to_int();
        if xt < 0 || xt as usize >= self.repo.len() {
            return Err(ForthError::IndexOutOfRange { word: "EXECUTE".to_string() });
        }
        self.invoke(xt as usize)
    }

    /// IMMEDIATE flags the most recent definition
    pub fn f_immediate(&mut self) -> Step {
        if let Some(name) = self.dict.last_inserted().map(|n| n.to_string()) {
            if let Some(entry) = self.dict.lookup_mut(&name) {
                entry.immediate = true;
            }
        }
        Ok(Flow::Continue)
    }

    pub fn f_bye(&mut self) -> Step {
        self.exit_flag = true;
        Ok(Flow::Continue)
    }

    /// dbg ( n -- ) sets the current debug level used by the message module
    pub fn f_dbg(&mut self) -> Step {
        match pop_cell!(self, "DBG").to_int() {
            0 => self.msg.set_level(DebugLevel::Error),
            1 => self.msg.set_level(DebugLevel::Warning),
            2 => self.msg.set_level(DebugLevel::Info),
            _ => self.msg.set_level(DebugLevel::Debug),
        }
        Ok(Flow::Continue)
    }

    /// Set up all the words that are implemented in Rust.
    ///     Each one gets a dictionary entry and a slot in the builtins table.
    pub fn compile_builtins(&mut self) {
        // arithmetic and comparison
        self.add_builtin("+", ForthEngine::f_plus, "+ ( j k -- j+k ) Push j+k on the stack");
        self.add_builtin("-", ForthEngine::f_minus, "- ( j k -- j-k ) Push j-k on the stack");
        self.add_builtin("*", ForthEngine::f_times, "* ( j k -- j*k ) Push j*k on the stack");
        self.add_builtin("/", ForthEngine::f_divide, "/ ( j k -- j/k ) Push j/k on the stack");
        self.add_builtin("MOD", ForthEngine::f_mod, "MOD ( j k -- j%k ) Push j mod k on the stack");
        self.add_builtin("=", ForthEngine::f_equal, "= ( j k -- b ) If j == k push 1 else 0");
        self.add_builtin("<>", ForthEngine::f_not_equal, "<> ( j k -- b ) If j != k push 1 else 0");
        self.add_builtin("<", ForthEngine::f_less, "< ( j k -- b ) If j < k push 1 else 0");
        self.add_builtin("<=", ForthEngine::f_less_equal, "<= ( j k -- b ) If j <= k push 1 else 0");
        self.add_builtin(">", ForthEngine::f_greater, "> ( j k -- b ) If j > k push 1 else 0");
        self.add_builtin(
            ">=",
            ForthEngine::f_greater_equal,
            ">= ( j k -- b ) If j >= k push 1 else 0",
        );
        self.add_builtin("0=", ForthEngine::f_0equal, "0= ( j -- b ) If j == 0 push 1 else 0");
        self.add_builtin("0<>", ForthEngine::f_0not_equal, "0<> ( j -- b ) If j != 0 push 1 else 0");
        self.add_builtin("0<", ForthEngine::f_0less, "0< ( j -- b ) If j < 0 push 1 else 0");
        self.add_builtin("0<=", ForthEngine::f_0less_equal, "0<= ( j -- b ) If j <= 0 push 1 else 0");
        self.add_builtin("0>", ForthEngine::f_0greater, "0> ( j -- b ) If j > 0 push 1 else 0");
        self.add_builtin(
            "0>=",
            ForthEngine::f_0greater_equal,
            "0>= ( j -- b ) If j >= 0 push 1 else 0",
        );
        self.add_builtin("1+", ForthEngine::f_one_plus, "1+ ( n -- n+1 )");
        self.add_builtin("1-", ForthEngine::f_one_minus, "1- ( n -- n-1 )");
        self.add_builtin("2+", ForthEngine::f_two_plus, "2+ ( n -- n+2 )");
        self.add_builtin("2-", ForthEngine::f_two_minus, "2- ( n -- n-2 )");
        self.add_builtin("2*", ForthEngine::f_two_star, "2* ( n -- n*2 )");
        self.add_builtin("AND", ForthEngine::f_and, "AND ( a b -- a&b ) Bitwise and");
        self.add_builtin("OR", ForthEngine::f_or, "OR ( a b -- a|b ) Bitwise or");
        self.add_builtin("XOR", ForthEngine::f_xor, "XOR ( a b -- a^b ) Bitwise exclusive or");
        self.add_builtin("NOT", ForthEngine::f_not, "NOT ( a -- ~a ) Bitwise complement");
        self.add_builtin("TRUE", ForthEngine::f_true, "TRUE ( -- 1 ) Push the canonical true value");
        self.add_builtin(
            "FALSE",
            ForthEngine::f_false,
            "FALSE ( -- 0 ) Push the canonical false value",
        );

        // stack shuffle
        self.add_builtin("DUP", ForthEngine::f_dup, "DUP ( n -- n n ) Push a second copy of the top of stack");
        self.add_builtin("DROP", ForthEngine::f_drop, "DROP ( n -- ) Pop the top element off the stack");
        self.add_builtin(
            "SWAP",
            ForthEngine::f_swap,
            "SWAP ( m n -- n m ) Reverse the order of the top two stack elements",
        );
        self.add_builtin(
            "OVER",
            ForthEngine::f_over,
            "OVER ( m n -- m n m ) Push a copy of the second item on the stack",
        );
        self.add_builtin(
            "ROT",
            ForthEngine::f_rot,
            "ROT ( x y z -- y z x ) Move the third stack item to the top",
        );
        self.add_builtin("DEPTH", ForthEngine::f_depth, "DEPTH ( -- n ) Push the current stack depth");
        self.add_builtin("CELLS", ForthEngine::f_cells, "CELLS ( n -- n*8 ) Scale a count by the cell size");
        self.add_builtin("CELL+", ForthEngine::f_cell_plus, "CELL+ ( a -- a+8 ) Advance an address by one cell");

        // return stack
        self.add_builtin(">R", ForthEngine::f_to_r, ">R ( n -- ) Pop stack and push value to return stack");
        self.add_builtin(
            "R>",
            ForthEngine::f_r_from,
            "R> ( -- n ) Pop return stack and push value to calculation stack",
        );
        self.add_builtin(
            "R@",
            ForthEngine::f_r_get,
            "R@ ( -- n ) Copy the top of the return stack to the calculation stack",
        );

        // memory and data definition
        self.add_builtin("@", ForthEngine::f_get, "@ ( a -- v ) Push the cell stored at address a");
        self.add_builtin("!", ForthEngine::f_store, "! ( v a -- ) Store v at address a");
        self.add_builtin("C@", ForthEngine::f_c_get, "C@ ( a -- c ) Push the byte stored at address a");
        self.add_builtin("C!", ForthEngine::f_c_store, "C! ( c a -- ) Store byte c at address a");
        self.add_builtin("C+!", ForthEngine::f_c_plus_store, "C+! ( n a -- ) Add n to the byte at address a");
        self.add_builtin(
            "CREATE",
            ForthEngine::f_create,
            "CREATE <name> ( -- ) Allocate a fresh buffer; subsequent , C, ALLOT extend it",
        );
        self.add_builtin(",", ForthEngine::f_comma, ", ( n -- ) Append a cell to the newest CREATE buffer");
        self.add_builtin("C,", ForthEngine::f_c_comma, "C, ( c -- ) Append a byte to the newest CREATE buffer");
        self.add_builtin(
            "ALLOT",
            ForthEngine::f_allot,
            "ALLOT ( n -- ) Reserve n zeroed bytes in the newest CREATE buffer",
        );
        self.add_builtin("FILL", ForthEngine::f_fill, "FILL ( a u c -- ) Store byte c in u bytes from a");
        self.add_builtin("ERASE", ForthEngine::f_erase, "ERASE ( a u -- ) Zero u bytes from a");
        self.add_builtin("BLANK", ForthEngine::f_blank, "BLANK ( a u -- ) Store blanks in u bytes from a");
        self.add_builtin("MOVE", ForthEngine::f_move, "MOVE ( a1 a2 u -- ) Copy u bytes from a1 to a2");
        self.add_builtin(
            "COMPARE",
            ForthEngine::f_compare,
            "COMPARE ( a1 u1 a2 u2 -- n ) Lexicographic comparison, -1 0 or 1",
        );
        self.add_builtin(
            "SEARCH",
            ForthEngine::f_search,
            "SEARCH ( a1 u1 a2 u2 -- a3 u3 b ) Find string two inside string one",
        );

        // console I/O
        self.add_builtin("EMIT", ForthEngine::f_emit, "EMIT ( c -- ) Send character c to the output");
        self.add_builtin("TYPE", ForthEngine::f_type, "TYPE ( a u -- ) Write u bytes from address a");
        self.add_builtin(".", ForthEngine::f_dot, ". ( n -- ) Print the top of stack under BASE");
        self.add_builtin(".S", ForthEngine::f_dot_s, ".S ( -- ) Print the contents of the calculation stack");
        self.add_builtin("CR", ForthEngine::f_cr, "CR ( -- ) Output a newline");
        self.add_builtin("TAB", ForthEngine::f_tab, "TAB ( -- ) Output a tab");
        self.add_builtin("SPACE", ForthEngine::f_space, "SPACE ( -- ) Output a blank");
        self.add_builtin(
            "KEY",
            ForthEngine::f_key,
            "KEY ( -- c | 0 ) Read one character from the input, or zero if none",
        );
        self.add_builtin(
            "ACCEPT",
            ForthEngine::f_accept,
            "ACCEPT ( a u1 -- a u2 ) Read a line of up to u1 characters to address a",
        );
        self.add_builtin("DUMP", ForthEngine::f_dump, "DUMP ( a u -- ) Hex dump of u bytes from address a");

        // floats, on reinterpreted cells
        self.add_builtin("F+", ForthEngine::f_f_plus, "F+ ( f g -- f+g ) Float add");
        self.add_builtin("F-", ForthEngine::f_f_minus, "F- ( f g -- f-g ) Float subtract");
        self.add_builtin("F*", ForthEngine::f_f_times, "F* ( f g -- f*g ) Float multiply");
        self.add_builtin("F/", ForthEngine::f_f_divide, "F/ ( f g -- f/g ) Float divide");
        self.add_builtin("F=", ForthEngine::f_f_equal, "F= ( f g -- b ) Float equality");
        self.add_builtin("F<>", ForthEngine::f_f_not_equal, "F<> ( f g -- b ) Float inequality");
        self.add_builtin("F<", ForthEngine::f_f_less, "F< ( f g -- b ) Float less-than");
        self.add_builtin("F<=", ForthEngine::f_f_less_equal, "F<= ( f g -- b ) Float at-most");
        self.add_builtin("F>", ForthEngine::f_f_greater, "F> ( f g -- b ) Float greater-than");
        self.add_builtin("F>=", ForthEngine::f_f_greater_equal, "F>= ( f g -- b ) Float at-least");
        self.add_builtin("SQRT", ForthEngine::f_sqrt, "SQRT ( f -- g ) Square root");
        self.add_builtin("POW", ForthEngine::f_pow, "POW ( f g -- f^g ) Raise f to the g");
        self.add_builtin("SIN", ForthEngine::f_sin, "SIN ( f -- g ) Sine, radians");
        self.add_builtin("COS", ForthEngine::f_cos, "COS ( f -- g ) Cosine, radians");
        self.add_builtin("TAN", ForthEngine::f_tan, "TAN ( f -- g ) Tangent, radians");
        self.add_builtin("2INT", ForthEngine::f_2int, "2INT ( f -- n ) Truncate a float to an integer");
        self.add_builtin("2FP", ForthEngine::f_2fp, "2FP ( n -- f ) Convert an integer to a float");
        self.add_builtin(".F", ForthEngine::f_dot_f, ".F ( f -- ) Print the top of stack as a float");
        self.add_builtin(".FS", ForthEngine::f_dot_fs, ".FS ( -- ) Print the stack as floats");

        // random numbers, Mersenne Twister
        self.add_builtin("RAND", ForthEngine::f_rand, "RAND ( -- n ) Push a random non-negative integer");
        self.add_builtin("FRAND", ForthEngine::f_frand, "FRAND ( -- f ) Push a random float in [0,1)");
        self.add_builtin(
            "FNRAND",
            ForthEngine::f_fnrand,
            "FNRAND ( f -- g ) Push a random float in [0,f)",
        );

        // timing
        self.add_builtin("TIMER_START", ForthEngine::f_timer_start, "TIMER_START ( -- ) Start the timer");
        self.add_builtin(
            "TIMER_END",
            ForthEngine::f_timer_end,
            "TIMER_END ( -- n ) Microseconds since TIMER_START",
        );
        self.add_builtin("GET_TIME", ForthEngine::f_get_time, "GET_TIME ( -- ) Print the wall-clock time");
        self.add_builtin("MS", ForthEngine::f_ms, "MS ( n -- ) Sleep for n milliseconds");

        // system
        self.add_builtin("LEAVE", ForthEngine::f_leave, "LEAVE ( -- ) Exit the enclosing loop");
        self.add_builtin(
            "ABORT",
            ForthEngine::f_abort,
            "ABORT ( -- ) End execution of the current word and clear the stacks",
        );
        self.add_builtin(
            "EXECUTE",
            ForthEngine::f_execute,
            "EXECUTE ( xt -- ) Invoke the word whose handle is on the stack",
        );
        self.add_builtin(
            "IMMEDIATE",
            ForthEngine::f_immediate,
            "IMMEDIATE ( -- ) Flag the most recent definition to run during compilation",
        );
        self.add_builtin("BYE", ForthEngine::f_bye, "BYE ( -- ) Exit to the operating system");
        self.add_builtin("DBG", ForthEngine::f_dbg, "DBG ( n -- ) Set the diagnostic level, 0 to 3");
    }
}

//////////////////////////////////////////////
/// TESTS
///
#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> ForthEngine {
        let mut e = ForthEngine::default();
        e.capture_output();
        e.cold_start();
        e
    }

    #[test]
    fn test_compile_builtins_registers_core_words() {
        let e = engine();
        for name in ["+", "MOD", "DUP", "ROT", ">R", "EMIT", "F+", "RAND", "TIMER_START"] {
            assert!(e.dict.lookup(name).is_some(), "missing {name}");
        }
    }

    #[test]
    fn test_builtin_invocation_through_node() {
        let mut e = engine();
        e.data.push(Cell::from_int(10)).unwrap();
        e.data.push(Cell::from_int(32)).unwrap();
        let node = e.dict.lookup("+").unwrap().node;
        e.invoke(node).unwrap();
        assert_eq!(e.data.pop().unwrap().to_int(), 42);
    }

    #[test]
    fn test_word_errors_carry_word_name() {
        let mut e = engine();
        assert_eq!(e.f_swap(), Err(ForthError::StackUnderflow { word: "SWAP".to_string() }));
        e.data.push(Cell::from_int(1)).unwrap();
        e.data.push(Cell::from_int(0)).unwrap();
        assert_eq!(e.f_divide(), Err(ForthError::DivisionByZero { word: "/".to_string() }));
    }

    #[test]
    fn test_return_stack_roundtrip() {
        let mut e = engine();
        e.data.push(Cell::from_int(9)).unwrap();
        e.f_to_r().unwrap();
        assert_eq!(e.ret.size(), 1);
        e.f_r_get().unwrap();
        e.f_r_from().unwrap();
        assert_eq!(e.data.pop().unwrap().to_int(), 9);
        assert_eq!(e.data.pop().unwrap().to_int(), 9);
        assert_eq!(e.ret.size(), 0);
    }

    #[test]
    fn test_execute_validates_handle() {
        let mut e = engine();
        e.data.push(Cell::from_int(-3)).unwrap();
        assert_eq!(
            e.f_execute(),
            Err(ForthError::IndexOutOfRange { word: "EXECUTE".to_string() })
        );
        e.data.push(Cell::from_int(1_000_000)).unwrap();
        assert!(e.f_execute().is_err());
    }

    #[test]
    fn test_immediate_flags_last_definition() {
        let mut e = engine();
        e.interpret_source(": W 1 ; IMMEDIATE");
        assert!(e.dict.lookup("W").unwrap().immediate);
    }

    #[test]
    fn test_bye_sets_exit_flag() {
        let mut e = engine();
        e.f_bye().unwrap();
        assert!(e.should_exit());
    }
}
