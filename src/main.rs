use std::io::Read;

use log::LevelFilter;
use simple_logger::SimpleLogger;
use tinyasm::{compiler, Config, Vm};

const USAGE: &str = "usage: tinyasm [--disassemble] [--strict] [PATH | -]";

fn main() -> Result<(), Box<dyn std::error::Error>> {
    SimpleLogger::new()
        .with_level(LevelFilter::Warn)
        .env()
        .init()?;

    let mut config = Config::default();
    let mut disassemble = false;
    let mut path = None;
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--disassemble" => disassemble = true,
            "--strict" => config.strict = true,
            "-h" | "--help" => {
                println!("{}", USAGE);
                return Ok(());
            }
            _ if path.is_none() => path = Some(arg),
            _ => return Err(USAGE.into()),
        }
    }

    let source = match path.as_deref() {
        None | Some("-") => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            buf
        }
        Some(p) => std::fs::read_to_string(p)?,
    };

    let program = compiler::compile(&source, &config)?;
    if disassemble {
        print!("{}", program.disassemble(path.as_deref().unwrap_or("<stdin>")));
    }
    let output = Vm::with_config(program, &config).interpret()?;
    println!("{}", output);
    Ok(())
}
