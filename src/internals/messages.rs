// Leveled diagnostic messages.
//
// Warnings and internal diagnostics go through here to stderr, gated by the
// current DebugLevel. Runtime Forth errors are reported by the REPL's own
// handler; this module is for everything else (overwrite warnings, file
// problems, trace output).

use std::fmt::Debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DebugLevel {
    Error,
    Warning,
    Info,
    Debug,
}

#[derive(Debug, Clone, Copy)]
pub struct Msg {
    level: DebugLevel,
}

impl Msg {
    pub fn new() -> Msg {
        Msg { level: DebugLevel::Error }
    }

    pub fn set_level(&mut self, level: DebugLevel) {
        self.level = level;
    }

    pub fn get_level(&self) -> DebugLevel {
        self.level
    }

    fn emit<T: Debug>(tag: &str, source: &str, text: &str, value: Option<T>) {
        match value {
            Some(v) => eprintln!("{tag} {source}: {text} {v:?}"),
            None => eprintln!("{tag} {source}: {text}"),
        }
    }

    /// Errors are always shown.
    pub fn error<T: Debug>(&self, source: &str, text: &str, value: Option<T>) {
        Msg::emit("ERROR", source, text, value);
    }

    pub fn warning<T: Debug>(&self, source: &str, text: &str, value: Option<T>) {
        if self.level >= DebugLevel::Warning {
            Msg::emit("WARNING", source, text, value);
        }
    }

    pub fn info<T: Debug>(&self, source: &str, text: &str, value: Option<T>) {
        if self.level >= DebugLevel::Info {
            Msg::emit("INFO", source, text, value);
        }
    }

    pub fn debug<T: Debug>(&self, source: &str, text: &str, value: Option<T>) {
        if self.level >= DebugLevel::Debug {
            Msg::emit("DEBUG", source, text, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_ordering() {
        assert!(DebugLevel::Debug > DebugLevel::Info);
        assert!(DebugLevel::Info > DebugLevel::Warning);
        assert!(DebugLevel::Warning > DebugLevel::Error);
    }

    #[test]
    fn test_set_level() {
        let mut msg = Msg::new();
        assert_eq!(msg.get_level(), DebugLevel::Error);
        msg.set_level(DebugLevel::Debug);
        assert_eq!(msg.get_level(), DebugLevel::Debug);
    }
}
