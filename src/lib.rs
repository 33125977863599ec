//! The lib crate for a tiny assembly-language interpreter.
//!
//! ```
//! let program = "mov a, 5\ninc a\ncall f\nmsg '(5+1)/2 = ', a\nend\nf:\ndiv a, 2\nret";
//! let output = tinyasm::run(program).unwrap();
//! assert_eq!(output.as_text(), Some("(5+1)/2 = 3"));
//! ```
#![warn(missing_debug_implementations, missing_docs, rust_2018_idioms)]

/// vm is the bits about running code.
pub mod vm;

/// scanner splits a source line into tokens.
pub mod scanner;

/// Takes source lines from the scanner and builds a program.
pub mod compiler;

/// Load and run options.
pub mod config;

pub use compiler::SyntaxError;
pub use config::Config;
pub use vm::{AsmError, Output, RuntimeError, Vm};

/// Load and run a program with the default configuration.
pub fn run(source: &str) -> Result<Output, AsmError> {
    run_with_config(source, &Config::default())
}

/// Load and run a program. Every call gets a fresh machine.
pub fn run_with_config(source: &str, config: &Config) -> Result<Output, AsmError> {
    let program = compiler::compile(source, config)?;
    Vm::with_config(program, config).interpret()
}
