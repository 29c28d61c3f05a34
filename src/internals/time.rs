/// Timing words
///
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::engine::ForthEngine;
use crate::errors::fault;
use crate::internals::words::{Flow, Step};
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
    /// TIMER_START ( -- ) start the timer
    pub fn f_timer_start(&mut self) -> Step {
        self.timer = std::time::Instant::now();
        Ok(Flow::Continue)
    }

    /// TIMER_END ( -- n ) microseconds since TIMER_START
    pub fn f_timer_end(&mut self) -> Step {
        let elapsed = self.timer.elapsed().as_micros() as i64;
        push_cell!(self, "TIMER_END", Cell::from_int(elapsed));
        Ok(Flow::Continue)
    }

    /// GET_TIME ( -- ) print the wall-clock time as HH:MM:SS, UTC
    pub fn f_get_time(&mut self) -> Step {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        let text = format!("{:02}:{:02}:{:02}", (secs / 3600) % 24, (secs / 60) % 60, secs % 60);
        self.emit_str(&text);
        Ok(Flow::Continue)
    }

    /// MS ( n -- ) sleep for n milliseconds
    pub fn f_ms(&mut self) -> Step {
        let delay = pop_cell!(self, "MS").to_int().max(0) as u64;
        thread::sleep(Duration::from_millis(delay));
        Ok(Flow::Continue)
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
    fn test_timer_measures_elapsed() {
        let mut e = engine();
        e.f_timer_start().unwrap();
        e.data.push(Cell::from_int(5)).unwrap();
        e.f_ms().unwrap();
        e.f_timer_end().unwrap();
        let micros = e.data.pop().unwrap().to_int();
        assert!(micros >= 5_000);
    }

    #[test]
    fn test_get_time_formats_clock() {
        let mut e = engine();
        e.f_get_time().unwrap();
        let out = e.take_output();
        assert_eq!(out.len(), 8);
        assert_eq!(&out[2..3], ":");
        assert_eq!(&out[5..6], ":");
    }
}
