use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::fmt::{Display, Write};

use log::debug;
use thiserror::Error;

use crate::compiler::SyntaxError;
use crate::config::Config;

// Applies a checked i64 method to a register and the value of an operand, e.g.
// `register_arithmetic!(self, x, y, checked_add)` is `register[x] += value(y)`.
macro_rules! register_arithmetic {
    ($self:ident, $reg:expr, $operand:expr, $op:ident) => {{
        let rhs = $self.value($operand)?;
        $self.update_register($reg, |lhs| lhs.$op(rhs))
    }};
}

/// An instruction argument that evaluates to an integer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    /// A literal integer, used as-is.
    Immediate(i64),
    /// A register name, looked up when the instruction runs.
    Register(String),
}

impl From<&str> for Operand {
    fn from(raw: &str) -> Self {
        match raw.parse() {
            Ok(n) => Operand::Immediate(n),
            Err(_) => Operand::Register(raw.to_string()),
        }
    }
}

impl Display for Operand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operand::Immediate(n) => write!(f, "{}", n),
            Operand::Register(r) => write!(f, "{}", r),
        }
    }
}

/// One argument of `msg`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MsgArg {
    /// A bare word: the register's value if that register is set, otherwise the word itself.
    Word(String),
    /// Literal text, quotes already removed.
    Text(String),
}

impl Display for MsgArg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MsgArg::Word(w) => write!(f, "{}", w),
            MsgArg::Text(t) => write!(f, "'{}'", t),
        }
    }
}

/// The predicate of a conditional jump, tested against the result of the pending `cmp`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Condition {
    /// `jne`
    NotEqual,
    /// `je`
    Equal,
    /// `jge`
    GreaterEqual,
    /// `jg`
    Greater,
    /// `jle`
    LessEqual,
    /// `jl`
    Less,
}

impl Condition {
    /// Whether a comparison that came out as `ordering` satisfies this condition.
    pub fn holds(self, ordering: Ordering) -> bool {
        match self {
            Condition::NotEqual => ordering != Ordering::Equal,
            Condition::Equal => ordering == Ordering::Equal,
            Condition::GreaterEqual => ordering != Ordering::Less,
            Condition::Greater => ordering == Ordering::Greater,
            Condition::LessEqual => ordering != Ordering::Greater,
            Condition::Less => ordering == Ordering::Less,
        }
    }

    /// The mnemonic this condition is written as.
    pub fn mnemonic(self) -> &'static str {
        match self {
            Condition::NotEqual => "jne",
            Condition::Equal => "je",
            Condition::GreaterEqual => "jge",
            Condition::Greater => "jg",
            Condition::LessEqual => "jle",
            Condition::Less => "jl",
        }
    }
}

/// A single instruction, in a parsed/type-safe format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
    /// `mov x, y`: register[x] = value(y)
    Mov(String, Operand),
    /// `inc x`
    Inc(String),
    /// `dec x`
    Dec(String),
    /// `add x, y`
    Add(String, Operand),
    /// `sub x, y`
    Sub(String, Operand),
    /// `mul x, y`
    Mul(String, Operand),
    /// `div x, y`, truncating toward zero
    Div(String, Operand),
    /// `jmp lbl`
    Jmp(String),
    /// `cmp x, y`: push the ordering of value(x) against value(y)
    Cmp(Operand, Operand),
    /// One of the six conditional jumps; pops the pending comparison.
    Jump(Condition, String),
    /// `call lbl`
    Call(String),
    /// `ret`
    Ret,
    /// `msg a1, a2, ...`
    Msg(Vec<MsgArg>),
    /// `end`: stop and hand back the output
    End,
    /// `jnz x, y`: jump y lines relative to this one if value(x) is not zero
    Jnz(Operand, Operand),
    /// `name:` defines a jump target. Does nothing when executed.
    Label(String),
    /// A command nobody recognised. Does nothing when executed.
    Nop(String),
}

impl Display for Instruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Instruction::Mov(x, y) => write!(f, "mov {}, {}", x, y),
            Instruction::Inc(x) => write!(f, "inc {}", x),
            Instruction::Dec(x) => write!(f, "dec {}", x),
            Instruction::Add(x, y) => write!(f, "add {}, {}", x, y),
            Instruction::Sub(x, y) => write!(f, "sub {}, {}", x, y),
            Instruction::Mul(x, y) => write!(f, "mul {}, {}", x, y),
            Instruction::Div(x, y) => write!(f, "div {}, {}", x, y),
            Instruction::Jmp(l) => write!(f, "jmp {}", l),
            Instruction::Cmp(x, y) => write!(f, "cmp {}, {}", x, y),
            Instruction::Jump(c, l) => write!(f, "{} {}", c.mnemonic(), l),
            Instruction::Call(l) => write!(f, "call {}", l),
            Instruction::Ret => write!(f, "ret"),
            Instruction::Msg(args) => {
                write!(f, "msg")?;
                for (i, arg) in args.iter().enumerate() {
                    let sep = if i == 0 { " " } else { ", " };
                    write!(f, "{}{}", sep, arg)?;
                }
                Ok(())
            }
            Instruction::End => write!(f, "end"),
            Instruction::Jnz(x, y) => write!(f, "jnz {}, {}", x, y),
            Instruction::Label(l) => write!(f, "{}:", l),
            Instruction::Nop(cmd) => write!(f, "; nop ({})", cmd),
        }
    }
}

/// A program is the unit of execution for the VM: the parsed lines in order, plus
/// the label positions discovered so far.
#[derive(Debug)]
pub struct Program {
    code: Vec<Instruction>,
    lines: Vec<usize>,
    labels: HashMap<String, usize>,
}

impl Program {
    /// A new program is empty.
    pub fn new() -> Self {
        Program {
            code: Vec::new(),
            lines: Vec::new(),
            labels: HashMap::new(),
        }
    }

    /// Add an instruction to the program, remembering the source line it came from.
    pub fn write_instruction(&mut self, instruction: Instruction, line: usize) {
        self.code.push(instruction);
        self.lines.push(line);
    }

    /// Number of instructions.
    pub fn len(&self) -> usize {
        self.code.len()
    }

    /// True if there is nothing to run.
    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    /// The instruction at `idx`, if there is one.
    pub fn get(&self, idx: usize) -> Option<&Instruction> {
        self.code.get(idx)
    }

    /// The 1-based source line the instruction at `idx` was parsed from.
    pub fn source_line(&self, idx: usize) -> usize {
        self.lines.get(idx).copied().unwrap_or(0)
    }

    /// Find the index of the line defining `label`.
    ///
    /// Labels are found lazily: the first lookup scans forward from `from` (no wrap
    /// around) and caches the hit, later lookups come straight from the cache.
    pub fn resolve(&mut self, label: &str, from: usize) -> Result<usize, RuntimeError> {
        if let Some(&idx) = self.labels.get(label) {
            debug!("label {} cached at {}", label, idx);
            return Ok(idx);
        }
        let idx = self
            .code
            .iter()
            .enumerate()
            .skip(from)
            .find_map(|(i, instruction)| match instruction {
                Instruction::Label(name) if name == label => Some(i),
                _ => None,
            })
            .ok_or_else(|| RuntimeError::UnresolvedLabel(label.to_string()))?;
        debug!("label {} resolved to {} scanning from {}", label, idx, from);
        self.labels.insert(label.to_string(), idx);
        Ok(idx)
    }

    /// One line of listing for the instruction at `ip`.
    pub fn disassemble_instruction(&self, ip: usize) -> String {
        match self.code.get(ip) {
            Some(instruction) => format!("i{:04} {:04} {}", ip, self.source_line(ip), instruction),
            None => format!("i{:04} <out of program>", ip),
        }
    }

    /// Return a human-readable listing of the whole program.
    pub fn disassemble(&self, title: &str) -> String {
        let mut ret = format!("== {} ==\n", title);
        for i in 0..self.code.len() {
            ret.push_str(&self.disassemble_instruction(i));
            ret.push('\n');
        }
        ret
    }
}

impl Default for Program {
    fn default() -> Self {
        Self::new()
    }
}

/// What a finished run hands back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Output {
    /// `end` was reached; this is everything `msg` produced.
    Ended(String),
    /// Execution ran off the program without reaching `end`.
    Exhausted,
}

impl Output {
    /// The text of the output, if the program ended properly.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Output::Ended(s) => Some(s),
            Output::Exhausted => None,
        }
    }
}

impl Display for Output {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Output::Ended(s) => write!(f, "{}", s),
            Output::Exhausted => write!(f, "-1"),
        }
    }
}

impl From<Output> for Option<String> {
    fn from(output: Output) -> Self {
        match output {
            Output::Ended(s) => Some(s),
            Output::Exhausted => None,
        }
    }
}

/// Which of the VM's stacks an underflow happened on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackKind {
    /// Results of `cmp`, popped by conditional jumps.
    Comparison,
    /// Return addresses, popped by `ret`.
    Call,
}

impl Display for StackKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StackKind::Comparison => write!(f, "comparison"),
            StackKind::Call => write!(f, "call"),
        }
    }
}

/// Errors that can be returned by loading or running a program.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AsmError {
    /// The program text could not be parsed.
    #[error("syntax error: {0}")]
    Syntax(#[from] SyntaxError),
    /// An instruction failed while running.
    #[error("runtime error on line {line}: {source}")]
    Runtime {
        /// 1-based source line of the failing instruction.
        line: usize,
        /// What went wrong.
        source: RuntimeError,
    },
}

/// Everything that can abort a running program.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeError {
    /// No line defining the label was found.
    #[error("label `{0}` not found")]
    UnresolvedLabel(String),
    /// A register was read before anything was `mov`ed into it.
    #[error("register `{0}` read before it was set")]
    UnsetRegister(String),
    /// Popped from an empty stack.
    #[error("{0} stack underflow")]
    StackUnderflow(StackKind),
    /// Too many nested calls.
    #[error("call stack overflow")]
    StackOverflow,
    /// `div` by zero.
    #[error("division by zero")]
    DivisionByZero,
    /// An arithmetic result does not fit in a register.
    #[error("arithmetic overflow")]
    Overflow,
}

// What the dispatcher should do once a handler returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    // Go on to the next line.
    Continue,
    // Fetch this line next; no extra increment.
    JumpTo(usize),
    // A relative jump landed outside the program.
    Exit,
    Halt,
}

/// A Vm is a stateful executor of a single program.
#[derive(Debug)]
pub struct Vm {
    program: Program,
    ip: usize,
    registers: HashMap<String, i64>,
    comparisons: Vec<Ordering>,
    calls: Vec<usize>,
    output: String,
    max_call_depth: Option<usize>,
}

impl Vm {
    /// The VM must be initialized with some code to run.
    pub fn new(program: Program) -> Self {
        Self::with_config(program, &Config::default())
    }

    /// New Vm with limits taken from `config`.
    pub fn with_config(program: Program, config: &Config) -> Self {
        Vm {
            program,
            ip: 0,
            registers: HashMap::new(),
            comparisons: Vec::new(),
            calls: Vec::new(),
            output: String::new(),
            max_call_depth: config.max_call_depth,
        }
    }

    /// The program being run, including any labels resolved so far.
    pub fn program(&self) -> &Program {
        &self.program
    }

    /// Snapshot of every register that has been set, sorted by name.
    pub fn registers(&self) -> BTreeMap<String, i64> {
        self.registers
            .iter()
            .map(|(name, value)| (name.clone(), *value))
            .collect()
    }

    /// Run the interpreter until `end`, until the pointer leaves the program, or
    /// until an instruction fails.
    pub fn interpret(&mut self) -> Result<Output, AsmError> {
        debug!("running {} instructions", self.program.len());
        loop {
            if let Some(output) = self.step()? {
                return Ok(output);
            }
        }
    }

    // Fetch and run the line under the pointer, then move the pointer. Returns the
    // output once the run is over.
    fn step(&mut self) -> Result<Option<Output>, AsmError> {
        if self.ip >= self.program.len() {
            debug!("ran off the program at i{:04}", self.ip);
            return Ok(Some(Output::Exhausted));
        }
        #[cfg(feature = "trace")]
        self.trace();
        let step = self.execute().map_err(|source| AsmError::Runtime {
            line: self.program.source_line(self.ip),
            source,
        })?;
        match step {
            Step::Continue => self.ip += 1,
            Step::JumpTo(target) => self.ip = target,
            Step::Exit => {
                debug!("jumped off the program from i{:04}", self.ip);
                return Ok(Some(Output::Exhausted));
            }
            Step::Halt => {
                debug!("end reached at i{:04}", self.ip);
                return Ok(Some(Output::Ended(std::mem::take(&mut self.output))));
            }
        }
        Ok(None)
    }

    #[cfg(feature = "trace")]
    fn trace(&self) {
        if !log::log_enabled!(log::Level::Trace) {
            return;
        }
        let mut regs = String::new();
        for (name, value) in self.registers() {
            let _ = write!(regs, "{}={} ", name, value);
        }
        log::trace!(
            "[ {}] cmp={:?} calls={:?}",
            regs,
            self.comparisons,
            self.calls
        );
        log::trace!("{}", self.program.disassemble_instruction(self.ip));
    }

    fn execute(&mut self) -> Result<Step, RuntimeError> {
        // The instruction is cloned out so handlers are free to borrow the VM mutably.
        let instruction = match self.program.get(self.ip) {
            Some(instruction) => instruction.clone(),
            None => return Ok(Step::Exit),
        };
        match &instruction {
            Instruction::Mov(x, y) => {
                let value = self.value(y)?;
                self.registers.insert(x.clone(), value);
            }
            Instruction::Inc(x) => self.update_register(x, |v| v.checked_add(1))?,
            Instruction::Dec(x) => self.update_register(x, |v| v.checked_sub(1))?,
            Instruction::Add(x, y) => register_arithmetic!(self, x, y, checked_add)?,
            Instruction::Sub(x, y) => register_arithmetic!(self, x, y, checked_sub)?,
            Instruction::Mul(x, y) => register_arithmetic!(self, x, y, checked_mul)?,
            Instruction::Div(x, y) => {
                // the target must be set before the divisor is looked at
                self.register(x)?;
                if self.value(y)? == 0 {
                    return Err(RuntimeError::DivisionByZero);
                }
                register_arithmetic!(self, x, y, checked_div)?
            }
            Instruction::Jmp(label) => return self.jump(label),
            Instruction::Cmp(x, y) => {
                let ordering = self.value(x)?.cmp(&self.value(y)?);
                self.comparisons.push(ordering);
            }
            Instruction::Jump(condition, label) => {
                let ordering = self
                    .comparisons
                    .pop()
                    .ok_or(RuntimeError::StackUnderflow(StackKind::Comparison))?;
                if condition.holds(ordering) {
                    return self.jump(label);
                }
            }
            Instruction::Call(label) => {
                if let Some(max) = self.max_call_depth {
                    if self.calls.len() >= max {
                        return Err(RuntimeError::StackOverflow);
                    }
                }
                let step = self.jump(label)?;
                self.calls.push(self.ip + 1);
                debug!("call {} depth {}", label, self.calls.len());
                return Ok(step);
            }
            Instruction::Ret => {
                let target = self
                    .calls
                    .pop()
                    .ok_or(RuntimeError::StackUnderflow(StackKind::Call))?;
                debug!("ret to i{:04} depth {}", target, self.calls.len());
                return Ok(Step::JumpTo(target));
            }
            Instruction::Msg(args) => {
                for arg in args {
                    match arg {
                        MsgArg::Word(w) => match self.registers.get(w) {
                            Some(value) => {
                                let _ = write!(self.output, "{}", value);
                            }
                            None => self.output.push_str(w),
                        },
                        MsgArg::Text(t) => self.output.push_str(t),
                    }
                }
            }
            Instruction::End => return Ok(Step::Halt),
            Instruction::Jnz(x, y) => {
                if self.value(x)? != 0 {
                    let offset = self.value(y)?;
                    return Ok(relative_step(self.ip, offset, self.program.len()));
                }
            }
            Instruction::Label(_) | Instruction::Nop(_) => {}
        }
        Ok(Step::Continue)
    }

    fn jump(&mut self, label: &str) -> Result<Step, RuntimeError> {
        self.program.resolve(label, self.ip).map(Step::JumpTo)
    }

    fn value(&self, operand: &Operand) -> Result<i64, RuntimeError> {
        match operand {
            Operand::Immediate(n) => Ok(*n),
            Operand::Register(name) => self.register(name),
        }
    }

    fn register(&self, name: &str) -> Result<i64, RuntimeError> {
        self.registers
            .get(name)
            .copied()
            .ok_or_else(|| RuntimeError::UnsetRegister(name.to_string()))
    }

    fn update_register<F>(&mut self, name: &str, f: F) -> Result<(), RuntimeError>
    where
        F: FnOnce(i64) -> Option<i64>,
    {
        let slot = self
            .registers
            .get_mut(name)
            .ok_or_else(|| RuntimeError::UnsetRegister(name.to_string()))?;
        *slot = f(*slot).ok_or(RuntimeError::Overflow)?;
        Ok(())
    }
}

fn relative_step(ip: usize, offset: i64, len: usize) -> Step {
    let target = i64::try_from(ip)
        .ok()
        .and_then(|ip| ip.checked_add(offset))
        .and_then(|t| usize::try_from(t).ok());
    match target {
        Some(t) if t < len => Step::JumpTo(t),
        _ => Step::Exit,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::compiler::compile;

    fn vm_for(source: &str) -> Vm {
        Vm::new(compile(source, &Config::default()).expect("compiling succeeds"))
    }

    fn run(source: &str) -> Result<Output, AsmError> {
        vm_for(source).interpret()
    }

    fn runtime_error(source: &str) -> RuntimeError {
        match run(source) {
            Err(AsmError::Runtime { source, .. }) => source,
            other => panic!("expected a runtime error, got {:?}", other),
        }
    }

    fn ended(s: &str) -> Result<Output, AsmError> {
        Ok(Output::Ended(s.to_string()))
    }

    #[test]
    fn test_arithmetic() {
        let mut vm = vm_for(
            "mov a, 7\nmov b, a\ninc a\ndec b\ndec b\nadd a, b\nsub b, -4\nmul a, 3\nmov c, a\ndiv c, 4",
        );
        assert_eq!(vm.interpret(), Ok(Output::Exhausted));
        let regs = vm.registers();
        assert_eq!(regs["a"], 39);
        assert_eq!(regs["b"], 9);
        assert_eq!(regs["c"], 9);
    }

    #[test]
    fn test_div_truncates() {
        let mut vm = vm_for("mov a, 5\ndiv a, 2\nmov b, -5\ndiv b, 2\nmov c, 7\ndiv c, -7");
        vm.interpret().unwrap();
        let regs = vm.registers();
        assert_eq!(regs["a"], 2);
        assert_eq!(regs["b"], -2);
        assert_eq!(regs["c"], -1);
    }

    #[test]
    fn test_condition_table() {
        let table = [
            (Condition::NotEqual, [true, false, true]),
            (Condition::Equal, [false, true, false]),
            (Condition::GreaterEqual, [false, true, true]),
            (Condition::Greater, [false, false, true]),
            (Condition::LessEqual, [true, true, false]),
            (Condition::Less, [true, false, false]),
        ];
        let orderings = [Ordering::Less, Ordering::Equal, Ordering::Greater];
        for (condition, expected) in table {
            for (ordering, want) in orderings.into_iter().zip(expected) {
                assert_eq!(condition.holds(ordering), want, "{:?} {:?}", condition, ordering);
            }
        }
    }

    #[test]
    fn test_conditional_jumps_end_to_end() {
        // (mnemonic, [taken for 1 vs 2, taken for 2 vs 2, taken for 3 vs 2])
        let cases = [
            ("jne", [true, false, true]),
            ("je", [false, true, false]),
            ("jge", [false, true, true]),
            ("jg", [false, false, true]),
            ("jle", [true, true, false]),
            ("jl", [true, false, false]),
        ];
        for (mnemonic, expected) in cases {
            for (lhs, taken) in [1, 2, 3].into_iter().zip(expected) {
                let source = format!(
                    "mov x, {}\ncmp x, 2\n{} yes\nmsg 'no'\nend\nyes:\nmsg 'yes'\nend",
                    lhs, mnemonic
                );
                let want = if taken { "yes" } else { "no" };
                assert_eq!(run(&source), ended(want), "{} with x = {}", mnemonic, lhs);
            }
        }
    }

    #[test]
    fn test_jump_lands_on_target() {
        let mut vm = vm_for("mov a, 1\njmp there\ninc a\nthere:\nmsg a\nend");
        assert_eq!(vm.step(), Ok(None));
        assert_eq!(vm.ip, 1);
        assert_eq!(vm.step(), Ok(None));
        assert_eq!(vm.ip, 3);
        assert_eq!(vm.program().get(vm.ip), Some(&Instruction::Label("there".to_string())));
        assert_eq!(vm.interpret(), ended("1"));
    }

    #[test]
    fn test_call_and_ret_land_exactly() {
        let mut vm = vm_for("mov a, 1\ncall f\nmsg a\nend\nf:\ninc a\nret");
        vm.step().unwrap();
        vm.step().unwrap();
        assert_eq!(vm.ip, 4);
        assert_eq!(vm.calls, vec![2]);
        vm.step().unwrap();
        vm.step().unwrap();
        assert_eq!(vm.ip, 6);
        vm.step().unwrap();
        assert_eq!(vm.ip, 2);
        assert!(vm.calls.is_empty());
        assert_eq!(vm.interpret(), ended("2"));
    }

    #[test]
    fn test_taken_and_untaken_conditional_jump_pointer() {
        let mut vm = vm_for("cmp 1, 2\njg far\ncmp 1, 2\njl far\nnop\nfar:\nend");
        vm.step().unwrap();
        vm.step().unwrap();
        assert_eq!(vm.ip, 2);
        vm.step().unwrap();
        vm.step().unwrap();
        assert_eq!(vm.ip, 5);
    }

    #[test]
    fn test_label_resolution_is_idempotent() {
        let mut program = compile("jmp b\na:\nb:\nend", &Config::default()).unwrap();
        let first = program.resolve("b", 0).unwrap();
        let second = program.resolve("b", 0).unwrap();
        assert_eq!(first, 2);
        assert_eq!(first, second);
        // once cached, the scan position no longer matters
        assert_eq!(program.resolve("b", 3).unwrap(), 2);
    }

    #[test]
    fn test_label_scan_is_forward_only() {
        assert_eq!(
            runtime_error("back:\nmov a, 1\njmp back"),
            RuntimeError::UnresolvedLabel("back".to_string())
        );
        assert_eq!(
            runtime_error("jmp nowhere\nend"),
            RuntimeError::UnresolvedLabel("nowhere".to_string())
        );
    }

    #[test]
    fn test_backward_jump_after_caching() {
        // The forward jump caches `top`, so the later backward jump finds it.
        let source = "\
mov i, 0
jmp top
top:
inc i
cmp i, 3
jl top
msg 'i = ', i
end";
        assert_eq!(run(source), ended("i = 3"));
    }

    #[test]
    fn test_call_and_ret_nested() {
        let source = "\
mov a, 1
call outer
msg 'a = ', a
end
outer:
  mul a, 10
  call inner
  add a, 1
  ret
inner:
  add a, 5
  ret";
        assert_eq!(run(source), ended("a = 16"));
    }

    #[test]
    fn test_recursive_call() {
        // countdown via recursion; `down` is cached on the first call
        let source = "\
mov n, 4
call down
msg 'done ', n
end
down:
  msg n
  dec n
  cmp n, 0
  je out
  call down
out:
  ret";
        assert_eq!(run(source), ended("4321done 0"));
    }

    #[test]
    fn test_call_depth_limit() {
        let program = compile("call f\nend\nf:\ncall f", &Config::default()).unwrap();
        let config = Config {
            max_call_depth: Some(3),
            ..Config::default()
        };
        let result = Vm::with_config(program, &config).interpret();
        assert_eq!(
            result,
            Err(AsmError::Runtime {
                line: 4,
                source: RuntimeError::StackOverflow
            })
        );
    }

    #[test]
    fn test_msg_substitutes_registers() {
        let source = "mov a, 3\nmsg 'a=', a, ' b=', b, ' ', 42\nmov a, -1\nmsg ' ', a\nend";
        assert_eq!(run(source), ended("a=3 b=b 42 -1"));
    }

    #[test]
    fn test_empty_msg_and_empty_output() {
        assert_eq!(run("msg\nend"), ended(""));
    }

    #[test]
    fn test_falls_off_the_end() {
        assert_eq!(run("mov a, 1\ninc a"), Ok(Output::Exhausted));
        assert_eq!(run(""), Ok(Output::Exhausted));
    }

    #[test]
    fn test_labels_and_unknown_commands_are_noops() {
        assert_eq!(run("start:\nfrobnicate a, b\nmsg 'ok'\nend"), ended("ok"));
        assert_eq!(run("jmp l\nmsg 'skipped'\nl: msg 'ignored'\nmsg 'ok'\nend"), ended("ok"));
    }

    #[test]
    fn test_fatal_errors() {
        assert_eq!(runtime_error("inc a"), RuntimeError::UnsetRegister("a".to_string()));
        assert_eq!(
            runtime_error("mov a, b"),
            RuntimeError::UnsetRegister("b".to_string())
        );
        assert_eq!(
            runtime_error("mov a, 1\ndiv a, 0"),
            RuntimeError::DivisionByZero
        );
        assert_eq!(
            runtime_error("div a, 0"),
            RuntimeError::UnsetRegister("a".to_string())
        );
        assert_eq!(
            runtime_error("je x\nx:"),
            RuntimeError::StackUnderflow(StackKind::Comparison)
        );
        assert_eq!(
            runtime_error("ret"),
            RuntimeError::StackUnderflow(StackKind::Call)
        );
        assert_eq!(
            runtime_error("mov a, 9223372036854775807\ninc a"),
            RuntimeError::Overflow
        );
        assert_eq!(
            runtime_error("mov a, -9223372036854775808\ndiv a, -1"),
            RuntimeError::Overflow
        );
    }

    #[test]
    fn test_error_carries_source_line() {
        let result = run("; header\n\nmov a, 1\n\n  div a, 0 ; boom");
        assert_eq!(
            result,
            Err(AsmError::Runtime {
                line: 5,
                source: RuntimeError::DivisionByZero
            })
        );
    }

    #[test]
    fn test_jnz_relative() {
        let mut vm = vm_for("mov a, 5\ndec a\njnz a, -1");
        assert_eq!(vm.interpret(), Ok(Output::Exhausted));
        assert_eq!(vm.registers()["a"], 0);

        // skipping past the last line is a normal exit
        assert_eq!(run("mov a, 1\njnz a, 10\nend"), Ok(Output::Exhausted));
        assert_eq!(run("mov a, 1\njnz a, -10\nend"), Ok(Output::Exhausted));
        assert_eq!(run("mov a, 0\njnz a, 10\nmsg 'fell through'\nend"), ended("fell through"));
    }

    #[test]
    fn test_disassemble() {
        let program = compile(
            "; comment\nmov a, 5\nloop:\n  msg 'x = ', a\n  jle loop\n  end",
            &Config::default(),
        )
        .unwrap();
        let expected = "\
== test ==
i0000 0002 mov a, 5
i0001 0003 loop:
i0002 0004 msg 'x = ', a
i0003 0005 jle loop
i0004 0006 end
";
        pretty_assertions::assert_eq!(program.disassemble("test"), expected);
    }
}
