// Turns program text into a `Program`. Each source line is scanned on its own and
// parsed into at most one instruction; there are no expressions that span lines.

use thiserror::Error;

use crate::{
    config::Config,
    scanner::{Scanner, Token, TokenType},
    vm::{Condition, Instruction, MsgArg, Operand, Program},
};

/// Problems found while loading a program, before anything runs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyntaxError {
    /// The command needs more operands than the line has.
    #[error("line {line}: `{command}` is missing an operand")]
    MissingOperand {
        /// 1-based source line.
        line: usize,
        /// The command being parsed.
        command: String,
    },
    /// The line has operands left over after the command was satisfied.
    #[error("line {line}: too many operands for `{command}`")]
    ExtraOperand {
        /// 1-based source line.
        line: usize,
        /// The command being parsed.
        command: String,
    },
    /// Only reported in strict mode; otherwise unknown commands load as no-ops.
    #[error("line {line}: unknown command `{command}`")]
    UnknownCommand {
        /// 1-based source line.
        line: usize,
        /// The unrecognised first token.
        command: String,
    },
}

// Parser takes the tokens of one line, after its first token, and builds operands.
#[derive(Debug)]
struct Parser<'a, T> {
    tokens: T,
    command: Token<'a>,
    line: usize,
}

impl<'a, T> Parser<'a, T>
where
    T: Iterator<Item = Token<'a>>,
{
    fn advance(&mut self) -> Result<Token<'a>, SyntaxError> {
        self.tokens.next().ok_or_else(|| SyntaxError::MissingOperand {
            line: self.line,
            command: self.command.raw.to_string(),
        })
    }

    fn register(&mut self) -> Result<String, SyntaxError> {
        Ok(self.advance()?.raw.to_string())
    }

    fn operand(&mut self) -> Result<Operand, SyntaxError> {
        Ok(Operand::from(self.advance()?.raw))
    }

    // `jmp loop:` is tolerated as `jmp loop`.
    fn label(&mut self) -> Result<String, SyntaxError> {
        let token = self.advance()?;
        Ok(token.label_name().unwrap_or(token.raw).to_string())
    }

    fn msg_args(&mut self) -> Vec<MsgArg> {
        self.tokens
            .by_ref()
            .map(|token| match token.typ {
                TokenType::Word => MsgArg::Word(token.raw.to_string()),
                _ => MsgArg::Text(token.raw.trim_matches('\'').to_string()),
            })
            .collect()
    }

    // Wraps up a line, complaining if anything is left over.
    fn finish(mut self, instruction: Instruction) -> Result<Instruction, SyntaxError> {
        match self.tokens.next() {
            Some(_) => Err(SyntaxError::ExtraOperand {
                line: self.line,
                command: self.command.raw.to_string(),
            }),
            None => Ok(instruction),
        }
    }

    fn parse(mut self, strict: bool) -> Result<Instruction, SyntaxError> {
        if let Some(name) = self.command.label_name() {
            let label = Instruction::Label(name.to_string());
            // `here: inc a` still defines `here`; the rest of the line is ignored.
            return if strict { self.finish(label) } else { Ok(label) };
        }
        let command = self.command.raw;
        let instruction = match command {
            "mov" => Instruction::Mov(self.register()?, self.operand()?),
            "inc" => Instruction::Inc(self.register()?),
            "dec" => Instruction::Dec(self.register()?),
            "add" => Instruction::Add(self.register()?, self.operand()?),
            "sub" => Instruction::Sub(self.register()?, self.operand()?),
            "mul" => Instruction::Mul(self.register()?, self.operand()?),
            "div" => Instruction::Div(self.register()?, self.operand()?),
            "jmp" => Instruction::Jmp(self.label()?),
            "cmp" => Instruction::Cmp(self.operand()?, self.operand()?),
            "jne" => Instruction::Jump(Condition::NotEqual, self.label()?),
            "je" => Instruction::Jump(Condition::Equal, self.label()?),
            "jge" => Instruction::Jump(Condition::GreaterEqual, self.label()?),
            "jg" => Instruction::Jump(Condition::Greater, self.label()?),
            "jle" => Instruction::Jump(Condition::LessEqual, self.label()?),
            "jl" => Instruction::Jump(Condition::Less, self.label()?),
            "call" => Instruction::Call(self.label()?),
            "ret" => Instruction::Ret,
            "msg" => Instruction::Msg(self.msg_args()),
            "end" => Instruction::End,
            "jnz" => Instruction::Jnz(self.operand()?, self.operand()?),
            other if strict => {
                return Err(SyntaxError::UnknownCommand {
                    line: self.line,
                    command: other.to_string(),
                })
            }
            // Unknown commands swallow their operands.
            other => return Ok(Instruction::Nop(other.to_string())),
        };
        self.finish(instruction)
    }
}

/// Parse a whole program. Blank and comment-only lines are dropped; every other line
/// becomes exactly one instruction, in order, tagged with its 1-based source line.
pub fn compile(source: &str, config: &Config) -> Result<Program, SyntaxError> {
    let mut program = Program::new();
    for (idx, text) in source.lines().enumerate() {
        let line = idx + 1;
        let mut tokens = Scanner::new(text);
        let command = match tokens.next() {
            Some(token) => token,
            None => continue,
        };
        let parser = Parser {
            tokens,
            command,
            line,
        };
        program.write_instruction(parser.parse(config.strict)?, line);
    }
    Ok(program)
}
