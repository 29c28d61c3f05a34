// system configuration and command line processing

use ::clap::{arg, value_parser, Command};
use std::path::Path;

use crate::engine::ForthEngine;
use crate::internals::messages::DebugLevel;
use crate::kernel::STACK_CELLS;

pub const VERSION: &str = "0.1.0";

pub struct Config {
    pub debug_level: DebugLevel,
    pub loaded_file: String,
    pub no_core: bool,
    pub stack_size: usize,
    pub case_sensitive: bool,
    pub run: bool,
}

impl Config {
    pub fn new() -> Config {
        Config {
            debug_level: DebugLevel::Error,
            loaded_file: "".to_owned(),
            no_core: false,
            stack_size: STACK_CELLS,
            case_sensitive: false,
            run: true,
        }
    }

    /// process_args handles command line argument processing using the clap library
    ///
    pub fn process_args(&mut self) -> &Config {
        let arguments = Command::new("rforth")
            .version(VERSION)
            .about("An interactive, incrementally compiling Forth environment")
            .arg(
                arg!(--debuglevel <VALUE>)
                    .required(false)
                    .value_parser(["error", "warning", "info", "debug"]),
            )
            .arg(arg!(-f --file <VALUE> "source file loaded before the prompt").required(false))
            .arg(arg!(-n --nocore "skip the boot definitions").required(false))
            .arg(
                arg!(--"stack-size" <CELLS> "data and return stack capacity")
                    .required(false)
                    .value_parser(value_parser!(usize)),
            )
            .arg(arg!(--"case-sensitive" "do not fold tokens to upper case").required(false))
            .get_matches();

        let debuglevel = arguments.get_one::<String>("debuglevel");
        if let Some(debuglevel) = debuglevel {
            match debuglevel.as_str() {
                "debug" => self.debug_level = DebugLevel::Debug,
                "info" => self.debug_level = DebugLevel::Info,
                "warning" => self.debug_level = DebugLevel::Warning,
                _ => self.debug_level = DebugLevel::Error,
            }
        }

        let file = arguments.get_one::<String>("file");
        if let Some(file) = file {
            self.loaded_file = file.clone();
        }

        let nocore = arguments.get_one::<bool>("nocore");
        if let Some(nc) = nocore {
            self.no_core = *nc;
        }

        let stack_size = arguments.get_one::<usize>("stack-size");
        if let Some(cells) = stack_size {
            self.stack_size = *cells;
        }

        let case_sensitive = arguments.get_one::<bool>("case-sensitive");
        if let Some(cs) = case_sensitive {
            self.case_sensitive = *cs;
        }
        self
    }

    /// run_forth builds the engine, performs the cold start, loads any file
    /// named on the command line, and enters the interactive loop.
    pub fn run_forth(&self) {
        let mut engine = ForthEngine::new(self.stack_size, !self.case_sensitive);
        engine.msg.set_level(self.debug_level);
        engine.insert_variables();
        engine.compile_builtins();
        if !self.no_core {
            engine.insert_code();
        }
        if !self.loaded_file.is_empty() && !engine.load_file(Path::new(&self.loaded_file)) {
            return;
        }
        engine.repl();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::new();
        assert_eq!(config.debug_level, DebugLevel::Error);
        assert_eq!(config.stack_size, STACK_CELLS);
        assert!(!config.no_core);
        assert!(!config.case_sensitive);
        assert!(config.run);
    }
}
