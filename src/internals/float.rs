/// Floating-point words
///
/// Floats share the data stack with everything else: a float is a cell
/// holding f64 bits, reinterpreted on use. 2INT and 2FP convert between the
/// two integer readings of a cell.
///
use crate::engine::ForthEngine;
use crate::errors::fault;
use crate::internals::words::{Flow, Step};
use crate::kernel::Cell;

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
    pub fn f_f_plus(&mut self) -> Step {
        kernel_op!(self, "F+", self.data.f_fadd());
        Ok(Flow::Continue)
    }

    pub fn f_f_minus(&mut self) -> Step {
        kernel_op!(self, "F-", self.data.f_fsub());
        Ok(Flow::Continue)
    }

    pub fn f_f_times(&mut self) -> Step {
        kernel_op!(self, "F*", self.data.f_fmul());
        Ok(Flow::Continue)
    }

    pub fn f_f_divide(&mut self) -> Step {
        kernel_op!(self, "F/", self.data.f_fdiv());
        Ok(Flow::Continue)
    }

    pub fn f_f_equal(&mut self) -> Step {
        kernel_op!(self, "F=", self.data.f_feq());
        Ok(Flow::Continue)
    }

    pub fn f_f_not_equal(&mut self) -> Step {
        kernel_op!(self, "F<>", self.data.f_fne());
        Ok(Flow::Continue)
    }

    pub fn f_f_less(&mut self) -> Step {
        kernel_op!(self, "F<", self.data.f_flt());
        Ok(Flow::Continue)
    }

    pub fn f_f_less_equal(&mut self) -> Step {
        kernel_op!(self, "F<=", self.data.f_fle());
        Ok(Flow::Continue)
    }

    pub fn f_f_greater(&mut self) -> Step {
        kernel_op!(self, "F>", self.data.f_fgt());
        Ok(Flow::Continue)
    }

    pub fn f_f_greater_equal(&mut self) -> Step {
        kernel_op!(self, "F>=", self.data.f_fge());
        Ok(Flow::Continue)
    }

    pub fn f_sqrt(&mut self) -> Step {
        let f = pop_cell!(self, "SQRT").to_float();
        push_cell!(self, "SQRT", Cell::from_float(f.sqrt()));
        Ok(Flow::Continue)
    }

    pub fn f_pow(&mut self) -> Step {
        let exp = pop_cell!(self, "POW").to_float();
        let base = pop_cell!(self, "POW").to_float();
        push_cell!(self, "POW", Cell::from_float(base.powf(exp)));
        Ok(Flow::Continue)
    }

    pub fn f_sin(&mut self) -> Step {
        let f = pop_cell!(self, "SIN").to_float();
        push_cell!(self, "SIN", Cell::from_float(f.sin()));
        Ok(Flow::Continue)
    }

    pub fn f_cos(&mut self) -> Step {
        let f = pop_cell!(self, "COS").to_float();
        push_cell!(self, "COS", Cell::from_float(f.cos()));
        Ok(Flow::Continue)
    }

    pub fn f_tan(&mut self) -> Step {
        let f = pop_cell!(self, "TAN").to_float();
        push_cell!(self, "TAN", Cell::from_float(f.tan()));
        Ok(Flow::Continue)
    }

    /// 2INT ( f -- n ) truncate a float reading into an integer reading
    pub fn f_2int(&mut self) -> Step {
        let f = pop_cell!(self, "2INT").to_float();
        push_cell!(self, "2INT", Cell::from_int(f as i64));
        Ok(Flow::Continue)
    }

    /// 2FP ( n -- f ) integer reading into float reading
    pub fn f_2fp(&mut self) -> Step {
        let n = pop_cell!(self, "2FP").to_int();
        push_cell!(self, "2FP", Cell::from_float(n as f64));
        Ok(Flow::Continue)
    }

    /// .F ( f -- ) print the top of stack as a float
    pub fn f_dot_f(&mut self) -> Step {
        let f = pop_cell!(self, ".F").to_float();
        let text = ForthEngine::format_float(f);
        self.emit_str(&text);
        Ok(Flow::Continue)
    }

    /// .FS ( -- ) print the whole stack as floats, bottom first
    pub fn f_dot_fs(&mut self) -> Step {
        let text = self
            .data
            .data()
            .iter()
            .map(|c| ForthEngine::format_float(c.to_float()))
            .collect::<Vec<_>>()
            .join(" ");
        self.emit_str(&text);
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

    fn top_float(e: &ForthEngine) -> f64 {
        e.data.data().last().unwrap().to_float()
    }

    #[test]
    fn test_float_arithmetic() {
        let (e, _) = run("1.5 0.25 F-");
        assert_eq!(top_float(&e), 1.25);
        let (e, _) = run("2.0 3.0 POW");
        assert_eq!(top_float(&e), 8.0);
        let (e, _) = run("16.0 SQRT");
        assert_eq!(top_float(&e), 4.0);
    }

    #[test]
    fn test_float_comparisons_push_canonical() {
        let (e, _) = run("1.5 1.5 F=");
        assert_eq!(e.data.data()[0].to_int(), 1);
        let (e, _) = run("1.5 2.5 F>");
        assert_eq!(e.data.data()[0].to_int(), 0);
    }

    #[test]
    fn test_trig_identity() {
        let (e, _) = run("0.0 SIN");
        assert_eq!(top_float(&e), 0.0);
        let (e, _) = run("0.0 COS");
        assert_eq!(top_float(&e), 1.0);
    }

    #[test]
    fn test_conversions() {
        let (e, _) = run("3.75 2INT");
        assert_eq!(e.data.data()[0].to_int(), 3);
        let (e, _) = run("4 2FP");
        assert_eq!(top_float(&e), 4.0);
    }

    #[test]
    fn test_float_printing() {
        let (_, out) = run("2.5 .F");
        assert_eq!(out, "2.5");
        let (_, out) = run("4.0 .F");
        assert_eq!(out, "4.0");
        let (_, out) = run("1.0 2.5 .FS");
        assert_eq!(out, "1.0 2.5");
    }
}
