/// Random-number words, backed by a Mersenne Twister engine seeded once at
/// startup from OS entropy.
///
use rand::RngCore;

use crate::engine::ForthEngine;
use crate::errors::fault;
use crate::internals::words::{Flow, Step};
use crate::kernel::Cell;

// 2^53, the float mantissa span used to map a draw into [0,1)
const FLOAT_SPAN: f64 = 9007199254740992.0;

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
    /// RAND ( -- n ) a random non-negative integer
    pub fn f_rand(&mut self) -> Step {
        let draw = (RngCore::next_u64(&mut self.rng) >> 1) as i64;
        push_cell!(self, "RAND", Cell::from_int(draw));
        Ok(Flow::Continue)
    }

    /// FRAND ( -- f ) a random float in [0,1)
    pub fn f_frand(&mut self) -> Step {
        let draw = self.uniform();
        push_cell!(self, "FRAND", Cell::from_float(draw));
        Ok(Flow::Continue)
    }

    /// FNRAND ( f -- g ) a random float in [0,f)
    pub fn f_fnrand(&mut self) -> Step {
        let bound = pop_cell!(self, "FNRAND").to_float();
        let draw = self.uniform() * bound;
        push_cell!(self, "FNRAND", Cell::from_float(draw));
        Ok(Flow::Continue)
    }

    fn uniform(&mut self) -> f64 {
        (RngCore::next_u64(&mut self.rng) >> 11) as f64 / FLOAT_SPAN
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
    fn test_rand_non_negative() {
        let mut e = engine();
        for _ in 0..100 {
            e.f_rand().unwrap();
            assert!(e.data.pop().unwrap().to_int() >= 0);
        }
    }

    #[test]
    fn test_frand_in_unit_interval() {
        let mut e = engine();
        for _ in 0..100 {
            e.f_frand().unwrap();
            let f = e.data.pop().unwrap().to_float();
            assert!((0.0..1.0).contains(&f));
        }
    }

    #[test]
    fn test_fnrand_scales_bound() {
        let mut e = engine();
        for _ in 0..100 {
            e.data.push(Cell::from_float(10.0)).unwrap();
            e.f_fnrand().unwrap();
            let f = e.data.pop().unwrap().to_float();
            assert!((0.0..10.0).contains(&f));
        }
    }
}
