// Runtime and compile-time error taxonomy.
//
// Every word invocation returns Result<Flow, ForthError>; the REPL's
// per-iteration handler prints the message and clears the stacks.

use std::fmt;
use thiserror::Error;

use crate::kernel::StackFault;

/// Which control structure a mismatch was detected in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Structure {
    IfThen,
    DoLoop,
    BeginAgain,
    BeginUntil,
    BeginWhileRepeat,
    CaseEndcase,
    Interspersed,
}

impl fmt::Display for Structure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Structure::IfThen => write!(f, "unbalanced IF ... THEN"),
            Structure::DoLoop => write!(f, "unbalanced DO ... LOOP"),
            Structure::BeginAgain => write!(f, "unbalanced BEGIN ... AGAIN"),
            Structure::BeginUntil => write!(f, "unbalanced BEGIN ... UNTIL"),
            Structure::BeginWhileRepeat => write!(f, "unbalanced BEGIN ... WHILE ... REPEAT"),
            Structure::CaseEndcase => write!(f, "unbalanced CASE ... ENDCASE"),
            Structure::Interspersed => write!(f, "interspersed control flow"),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ForthError {
    #[error("stack underflow in {word}")]
    StackUnderflow { word: String },

    #[error("stack overflow in {word}")]
    StackOverflow { word: String },

    #[error("unknown word: {0}")]
    UnknownWord(String),

    #[error("bad numeric literal: {0}")]
    BadLiteral(String),

    #[error("division by zero in {word}")]
    DivisionByZero { word: String },

    #[error("{0}")]
    Unmatched(Structure),

    #[error("unterminated quote")]
    UnterminatedQuote,

    #[error("unterminated ( comment")]
    UnterminatedParen,

    #[error("{word} without CREATE")]
    MissingCreate { word: String },

    #[error("{name} is not a value")]
    UndefinedValue { name: String },

    #[error("address out of range in {word}")]
    IndexOutOfRange { word: String },

    #[error("{0}")]
    Abort(String),
}

/// Attach the reporting word to a kernel stack fault.
pub fn fault(word: &str, f: StackFault) -> ForthError {
    match f {
        StackFault::Underflow => ForthError::StackUnderflow { word: word.to_string() },
        StackFault::Overflow => ForthError::StackOverflow { word: word.to_string() },
        StackFault::DivZero => ForthError::DivisionByZero { word: word.to_string() },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let e = ForthError::StackUnderflow { word: "DUP".to_string() };
        assert_eq!(e.to_string(), "stack underflow in DUP");
        let e = ForthError::Unmatched(Structure::BeginWhileRepeat);
        assert_eq!(e.to_string(), "unbalanced BEGIN ... WHILE ... REPEAT");
        let e = ForthError::Abort("index out of range".to_string());
        assert_eq!(e.to_string(), "index out of range");
    }

    #[test]
    fn test_fault_conversion() {
        assert_eq!(
            fault("/", StackFault::DivZero),
            ForthError::DivisionByZero { word: "/".to_string() }
        );
        assert_eq!(
            fault("SWAP", StackFault::Underflow),
            ForthError::StackUnderflow { word: "SWAP".to_string() }
        );
    }
}
