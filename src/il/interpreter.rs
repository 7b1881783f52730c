//! A direct interpreter for three-address code, used to run programs without
//! assembling them and to check that optimisations preserve behaviour.

use std::collections::HashMap;

use thiserror::Error;

use crate::{builtins::Builtin, prelude::*};

use super::{Instr, Label, Opcode, Operand, Temp, TacProcedure, TacProgram};

/// Instructions executed before a run is abandoned.
pub const DEFAULT_STEP_LIMIT: u64 = 10_000_000;
const MAX_CALL_DEPTH: usize = 1_000;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExecError {
    #[error("division by zero in @{0}")]
    DivisionByZero(String),
    #[error("call to undeclared procedure @{0}")]
    UndeclaredProcedure(String),
    #[error("read of undeclared global @{0}")]
    UndeclaredGlobal(String),
    #[error("jump to undefined label {0} in @{1}")]
    UndefinedLabel(String, String),
    #[error("phi in @{0} has no value for the block entered from")]
    PhiWithoutPredecessor(String),
    #[error("gave up after {0} steps")]
    StepLimit(u64),
    #[error("call depth exceeded {0}")]
    CallDepth(usize),
}

/// What a finished run produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Execution {
    pub output: Vec<String>,
    pub return_value: i64,
}

/// Run `entry` in the given program with the default step budget.
pub fn execute(program: &TacProgram, entry: &str) -> Result<Execution, ExecError> {
    execute_with_limit(program, entry, DEFAULT_STEP_LIMIT)
}

pub fn execute_with_limit(
    program: &TacProgram,
    entry: &str,
    step_limit: u64,
) -> Result<Execution, ExecError> {
    let mut interpreter = Interpreter {
        program,
        globals: program
            .globals
            .iter()
            .map(|g| (g.name.as_str(), g.init))
            .collect(),
        labels: HashMap::new(),
        output: vec![],
        steps: 0,
        step_limit,
        depth: 0,
    };
    let return_value = interpreter.call(entry, vec![])?;
    debug!("Executed @{} in {} steps", entry, interpreter.steps);

    Ok(Execution {
        output: interpreter.output,
        return_value,
    })
}

struct Interpreter<'p> {
    program: &'p TacProgram,
    globals: HashMap<&'p str, i64>,
    /// Label positions, per procedure, built on first call.
    labels: HashMap<&'p str, HashMap<&'p Label, usize>>,
    output: Vec<String>,
    steps: u64,
    step_limit: u64,
    depth: usize,
}

/// The state of one procedure activation.
struct Frame<'p> {
    procedure: &'p TacProcedure,
    temps: HashMap<Temp, i64>,
    params: Vec<(i64, i64)>,
    current_block: Option<&'p Label>,
    previous_block: Option<&'p Label>,
}
impl<'p> Frame<'p> {
    fn read(&self, operand: &Operand, globals: &HashMap<&str, i64>) -> Result<i64, ExecError> {
        match operand {
            Operand::Int(i) => Ok(*i),
            // Nothing has written the temporary yet.
            Operand::Temp(t) => Ok(self.temps.get(t).copied().unwrap_or(0)),
            Operand::Global(g) => globals
                .get(g.as_str())
                .copied()
                .ok_or_else(|| ExecError::UndeclaredGlobal(g.clone())),
            Operand::Label(_) => Ok(0),
        }
    }

    fn enter(&mut self, label: &'p Label) {
        self.previous_block = self.current_block.replace(label);
    }
}

impl<'p> Interpreter<'p> {
    fn call(&mut self, name: &str, args: Vec<i64>) -> Result<i64, ExecError> {
        if let Some(builtin) = Builtin::from_symbol(name) {
            let value = args.first().copied().unwrap_or(0);
            self.output.push(builtin.render(value));
            return Ok(0);
        }

        let program = self.program;
        let procedure = program
            .procedure(name)
            .ok_or_else(|| ExecError::UndeclaredProcedure(name.to_string()))?;

        if self.depth >= MAX_CALL_DEPTH {
            return Err(ExecError::CallDepth(MAX_CALL_DEPTH));
        }
        self.depth += 1;
        let result = self.run(procedure, args);
        self.depth -= 1;
        result
    }

    fn label_index(&mut self, procedure: &'p TacProcedure) -> &HashMap<&'p Label, usize> {
        self.labels.entry(procedure.name.as_str()).or_insert_with(|| {
            procedure
                .body
                .iter_lines()
                .filter_map(|(pos, instr)| instr.defined_label().map(|l| (l, pos.0)))
                .collect()
        })
    }

    fn jump(&mut self, procedure: &'p TacProcedure, label: &Label) -> Result<usize, ExecError> {
        self.label_index(procedure)
            .get(label)
            .copied()
            .ok_or_else(|| ExecError::UndefinedLabel(label.to_string(), procedure.name.clone()))
    }

    fn run(&mut self, procedure: &'p TacProcedure, args: Vec<i64>) -> Result<i64, ExecError> {
        let mut frame = Frame {
            procedure,
            temps: procedure.params.iter().copied().zip(args).collect(),
            params: vec![],
            current_block: None,
            previous_block: None,
        };
        let body = procedure.body.as_slice();
        let mut pc = 0;

        while let Some(instr) = body.get(pc) {
            self.steps += 1;
            if self.steps > self.step_limit {
                return Err(ExecError::StepLimit(self.step_limit));
            }
            pc += 1;

            match instr.opcode {
                Opcode::Label => {
                    if let Some(label) = instr.defined_label() {
                        frame.enter(label);
                    }
                }
                Opcode::Phi => {
                    pc = self.run_phis(&mut frame, pc - 1)?;
                }
                Opcode::Jmp => {
                    if let Some(target) = instr.jump_target() {
                        pc = self.jump(procedure, target)?;
                    }
                }
                op if op.is_conditional_jump() => {
                    let tested = self.operand(&frame, &instr.args[0])?;
                    let taken = match op {
                        Opcode::Jz => tested == 0,
                        Opcode::Jnz => tested != 0,
                        Opcode::Jl => tested < 0,
                        Opcode::Jle => tested <= 0,
                        Opcode::Jg => tested > 0,
                        _ => tested >= 0,
                    };
                    if let (true, Some(target)) = (taken, instr.jump_target()) {
                        pc = self.jump(procedure, target)?;
                    }
                }
                Opcode::Param => {
                    let index = self.operand(&frame, &instr.args[0])?;
                    let value = self.operand(&frame, &instr.args[1])?;
                    frame.params.push((index, value));
                }
                Opcode::Call => {
                    let callee = instr.args[0].as_global().unwrap_or_default();
                    let count = self.operand(&frame, &instr.args[1])?.max(0) as usize;
                    let mut args = vec![0; count];
                    for (index, value) in frame.params.drain(..) {
                        if let Some(slot) = args.get_mut((index - 1).max(0) as usize) {
                            *slot = value;
                        }
                    }
                    let value = self.call(callee, args)?;
                    self.store(&mut frame, instr, value);
                }
                Opcode::Ret => {
                    return match instr.args.first() {
                        Some(value) => self.operand(&frame, value),
                        None => Ok(0),
                    };
                }
                Opcode::Print => {
                    let value = self.operand(&frame, &instr.args[0])?;
                    self.output.push(Builtin::PrintInt.render(value));
                }
                Opcode::Nop => (),
                _ => {
                    let value = self.evaluate(&frame, instr)?;
                    self.store(&mut frame, instr, value);
                }
            }
        }

        Ok(0)
    }

    /// Evaluate the run of phis starting at `start` as one parallel assignment. Returns the
    /// position after the run.
    fn run_phis(&mut self, frame: &mut Frame<'p>, start: usize) -> Result<usize, ExecError> {
        let body = frame.procedure.body.as_slice();
        let mut assignments = vec![];
        let mut pc = start;
        while let Some(phi) = body.get(pc).filter(|i| i.opcode == Opcode::Phi) {
            let incoming = phi
                .phi_incoming()
                .find(|(label, _)| Some(*label) == frame.previous_block)
                .map(|(_, value)| value)
                .ok_or_else(|| ExecError::PhiWithoutPredecessor(frame.procedure.name.clone()))?;
            assignments.push((phi, self.operand(frame, incoming)?));
            pc += 1;
        }
        for (phi, value) in assignments {
            self.store(frame, phi, value);
        }
        Ok(pc)
    }

    fn operand(&self, frame: &Frame<'p>, operand: &Operand) -> Result<i64, ExecError> {
        frame.read(operand, &self.globals)
    }

    fn evaluate(&self, frame: &Frame<'p>, instr: &Instr) -> Result<i64, ExecError> {
        let arg = |i: usize| match instr.args.get(i) {
            Some(operand) => self.operand(frame, operand),
            None => Ok(0),
        };
        let lhs = arg(0)?;
        let value = match instr.opcode {
            Opcode::Const | Opcode::Copy => lhs,
            Opcode::Neg => lhs.wrapping_neg(),
            Opcode::Not => !lhs,
            op => {
                let rhs = arg(1)?;
                match op {
                    Opcode::Add => lhs.wrapping_add(rhs),
                    Opcode::Sub => lhs.wrapping_sub(rhs),
                    Opcode::Mul => lhs.wrapping_mul(rhs),
                    Opcode::Div | Opcode::Mod if rhs == 0 => {
                        return Err(ExecError::DivisionByZero(frame.procedure.name.clone()))
                    }
                    Opcode::Div => lhs.wrapping_div(rhs),
                    Opcode::Mod => lhs.wrapping_rem(rhs),
                    Opcode::And => lhs & rhs,
                    Opcode::Or => lhs | rhs,
                    Opcode::Xor => lhs ^ rhs,
                    Opcode::Shl => lhs.wrapping_shl(rhs as u32),
                    Opcode::Shr => lhs.wrapping_shr(rhs as u32),
                    _ => 0,
                }
            }
        };
        Ok(value)
    }

    fn store(&mut self, frame: &mut Frame<'p>, instr: &Instr, value: i64) {
        match &instr.result {
            Some(Operand::Temp(t)) => {
                frame.temps.insert(*t, value);
            }
            Some(Operand::Global(g)) => {
                if let Some(slot) = self.globals.get_mut(g.as_str()) {
                    *slot = value;
                }
            }
            _ => (),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::il::{record, TacGlobal};

    use super::*;

    fn t(id: u32) -> Operand {
        Temp::new(id).into()
    }

    fn program(instrs: Vec<Instr>) -> TacProgram {
        TacProgram {
            globals: vec![],
            procedures: vec![TacProcedure::new("main", vec![], instrs.into())],
        }
    }

    #[test]
    fn arithmetic_wraps() {
        let prog = program(vec![
            Instr::constant(i64::MAX, t(0)),
            Instr::constant(1, t(1)),
            Instr::new(Opcode::Add, vec![t(0), t(1)], Some(t(2))),
            Instr::new(Opcode::Print, vec![t(2)], None),
            Instr::constant(-7, t(3)),
            Instr::constant(2, t(4)),
            Instr::new(Opcode::Mod, vec![t(3), t(4)], Some(t(5))),
            Instr::new(Opcode::Print, vec![t(5)], None),
            Instr::new(Opcode::Shr, vec![t(3), t(1)], Some(t(6))),
            Instr::ret(Some(t(6))),
        ]);
        let run = execute(&prog, "main").unwrap();

        assert_eq!(vec![i64::MIN.to_string(), "-1".to_string()], run.output);
        assert_eq!(-4, run.return_value);
    }

    #[test]
    fn loops_and_calls() {
        let prog = record::from_json(
            r#"[
                {"var": "@total", "init": 0},
                {"proc": "@add", "args": ["%0", "%1"], "body": [
                    {"opcode": "add", "args": ["%0", "%1"], "result": "%2"},
                    {"opcode": "ret", "args": ["%2"], "result": null}
                ]},
                {"proc": "@main", "args": [], "body": [
                    {"opcode": "const", "args": [3], "result": "%0"},
                    {"opcode": "label", "args": [".L0"], "result": null},
                    {"opcode": "jz", "args": ["%0", ".L1"], "result": null},
                    {"opcode": "param", "args": [1, "@total"], "result": null},
                    {"opcode": "param", "args": [2, "%0"], "result": null},
                    {"opcode": "call", "args": ["@add", 2], "result": "@total"},
                    {"opcode": "const", "args": [1], "result": "%1"},
                    {"opcode": "sub", "args": ["%0", "%1"], "result": "%0"},
                    {"opcode": "jmp", "args": [".L0"], "result": null},
                    {"opcode": "label", "args": [".L1"], "result": null},
                    {"opcode": "param", "args": [1, "@total"], "result": null},
                    {"opcode": "call", "args": ["@bx_print_int", 1], "result": null},
                    {"opcode": "param", "args": [1, "%0"], "result": null},
                    {"opcode": "call", "args": ["@bx_print_bool", 1], "result": null},
                    {"opcode": "ret", "args": [], "result": null}
                ]}
            ]"#,
        )
        .unwrap();

        assert_eq!(
            vec!["6".to_string(), "false".to_string()],
            execute(&prog, "main").unwrap().output
        );
    }

    #[test]
    fn phis_read_the_block_entered_from() {
        let l = |name: &str| Label::new(name);
        let prog = program(vec![
            Instr::label(l(".L0")),
            Instr::constant(1, t(0)),
            Instr::constant(2, t(1)),
            Instr::cond_jump(Opcode::Jz, t(0), l(".L2")),
            Instr::jmp(l(".L1")),
            Instr::label(l(".L1")),
            Instr::jmp(l(".L2")),
            Instr::label(l(".L2")),
            // Swaps through parallel evaluation when entered from .L1.
            Instr::phi(Temp::versioned(0, 1), [(l(".L0"), t(0)), (l(".L1"), t(1))]),
            Instr::phi(Temp::versioned(1, 1), [(l(".L0"), t(1)), (l(".L1"), t(0))]),
            Instr::new(Opcode::Print, vec![Temp::versioned(0, 1).into()], None),
            Instr::new(Opcode::Print, vec![Temp::versioned(1, 1).into()], None),
            Instr::ret(None),
        ]);

        assert_eq!(vec!["2", "1"], execute(&prog, "main").unwrap().output);
    }

    #[test]
    fn division_by_zero_is_reported() {
        let prog = program(vec![
            Instr::constant(0, t(0)),
            Instr::new(Opcode::Div, vec![t(0), t(0)], Some(t(1))),
        ]);

        assert_eq!(
            Err(ExecError::DivisionByZero("main".to_string())),
            execute(&prog, "main")
        );
    }

    #[test]
    fn runaway_loops_hit_the_step_limit() {
        let prog = program(vec![
            Instr::label(Label::new(".L0")),
            Instr::jmp(Label::new(".L0")),
        ]);

        assert_eq!(
            Err(ExecError::StepLimit(100)),
            execute_with_limit(&prog, "main", 100)
        );
    }

    #[test]
    fn globals_keep_their_stores() {
        let mut prog = program(vec![
            Instr::constant(4, Operand::global("g")),
            Instr::new(Opcode::Print, vec![Operand::global("g")], None),
        ]);
        prog.globals.push(TacGlobal {
            name: "g".to_string(),
            init: 1,
        });

        assert_eq!(vec!["4"], execute(&prog, "main").unwrap().output);
        assert_eq!(
            Err(ExecError::UndeclaredProcedure("missing".to_string())),
            execute(&prog, "missing")
        );
    }
}
