use std::{
    collections::{HashMap, HashSet},
    marker::PhantomData,
};

use crate::{
    builtins::Builtin,
    error::{malformed, Malformed, ResourceShape},
    il::{Instr as TacInstr, LabelGenerator, Opcode, Operand as TacOperand, TacProcedure, Temp},
    prelude::*,
};

use super::{
    assembly::*,
    calling_convention::SystemV64,
    stack_convention::{make_procedure, StackConvention},
    x86::*,
};

use Op::*;
use Operand::*;
use Register::*;

const SLOT_SIZE: usize = 8;

/// Lowers one TAC procedure to assembly, keeping every temporary in its own stack slot.
pub struct ProcedureCompiler<'p, C: StackConvention> {
    tac: &'p TacProcedure,
    callees: &'p HashSet<&'p str>,
    calling_convention: SystemV64,
    slots: HashMap<Temp, usize>,
    body: Block,
    pending_params: Vec<(i64, TacOperand)>,
    exit_label: String,
    _phantom: PhantomData<*const C>,
}
impl<'p, C: StackConvention> ProcedureCompiler<'p, C> {
    /// Compile a procedure. `callees` holds every procedure name a call may target.
    pub fn compile(
        tac: &'p TacProcedure,
        callees: &'p HashSet<&'p str>,
    ) -> CompileResult<Procedure> {
        let existing = tac
            .body
            .iter_instructions()
            .filter_map(TacInstr::defined_label)
            .cloned();
        let exit_label = LabelGenerator::avoiding(existing)
            .next_label("exit")
            .to_string();

        let mut compiler = Self {
            tac,
            callees,
            calling_convention: SystemV64,
            slots: allocate_slots(tac),
            body: Block::new(),
            pending_params: vec![],
            exit_label,
            _phantom: PhantomData,
        };
        let frame_size = compiler.frame_size()?;

        compiler.spill_params()?;
        for instr in tac.body.iter_instructions() {
            compiler.compile_instr(instr)?;
        }

        let mut procedure = make_procedure::<_, C>(&tac.name, frame_size, &compiler.exit_label);
        procedure.body = compiler.body;
        trace!("Compiled @{} with a {} byte frame", tac.name, frame_size);
        Ok(procedure)
    }

    /// The frame holds one slot per temporary, rounded up to keep the stack aligned.
    fn frame_size(&self) -> CompileResult<usize> {
        let bytes = (self.slots.len() * SLOT_SIZE + 15) / 16 * 16;
        if bytes > i32::MAX as usize {
            return Err(ResourceShape::FrameTooLarge {
                procedure: format!("@{}", self.tac.name),
                bytes: bytes as u64,
            }
            .into());
        }
        Ok(bytes)
    }

    /// Copy incoming parameters into their slots.
    fn spill_params(&mut self) -> CompileResult<()> {
        for (index, param) in self.tac.params.iter().enumerate() {
            let slot = self.slot(param)?;
            match self.calling_convention.param_register(index) {
                Some(reg) => {
                    self.emit_cmt(Mov, [slot, Reg(reg)], format!("<param> {}", param));
                }
                None => {
                    let offset = self.calling_convention.stack_param_offset(index);
                    self.emit_cmt(
                        Mov,
                        [Reg(R11), Mem(Memory::Frame(offset))],
                        format!("<param> {}", param),
                    );
                    self.emit(Mov, [slot, Reg(R11)]);
                }
            }
        }
        Ok(())
    }

    /// Compile a single TAC instruction.
    fn compile_instr(&mut self, instr: &TacInstr) -> CompileResult<()> {
        instr.validate()?;
        let comment = instr.to_string();
        match instr.opcode {
            Opcode::Label => {
                if let Some(label) = instr.defined_label() {
                    self.body.push_label(label.name());
                }
            }
            Opcode::Const => {
                let value = instr.args[0]
                    .as_int()
                    .ok_or_else(|| instr.shape_error("an integer and a result"))?;
                let dest = self.result(instr)?;
                if i32::try_from(value).is_ok() {
                    self.emit_cmt(Mov, [dest, Lit(value)], comment);
                } else {
                    self.emit_cmt(Mov, [Reg(R11), Lit(value)], comment);
                    self.emit(Mov, [dest, Reg(R11)]);
                }
            }
            Opcode::Copy => {
                let source = self.operand(&instr.args[0])?;
                self.emit_cmt(Mov, [Reg(R11), source], comment);
                self.emit(Mov, [self.result(instr)?, Reg(R11)]);
            }
            Opcode::Add | Opcode::Sub | Opcode::And | Opcode::Or | Opcode::Xor => {
                let op = match instr.opcode {
                    Opcode::Add => Add,
                    Opcode::Sub => Sub,
                    Opcode::And => And,
                    Opcode::Or => Or,
                    _ => Xor,
                };
                self.emit_cmt(Mov, [Reg(R11), self.operand(&instr.args[0])?], comment);
                self.emit(op, [Reg(R11), self.operand(&instr.args[1])?]);
                self.emit(Mov, [self.result(instr)?, Reg(R11)]);
            }
            Opcode::Mul => {
                self.emit_cmt(Mov, [Reg(Rax), self.operand(&instr.args[0])?], comment);
                self.emit(Imul, [self.operand(&instr.args[1])?]);
                self.emit(Mov, [self.result(instr)?, Reg(Rax)]);
            }
            Opcode::Div | Opcode::Mod => {
                let quotient_or_remainder = match instr.opcode {
                    Opcode::Div => Rax,
                    _ => Rdx,
                };
                self.emit_cmt(Mov, [Reg(Rax), self.operand(&instr.args[0])?], comment);
                self.emit(Cqo, []);
                self.emit(Idiv, [self.operand(&instr.args[1])?]);
                self.emit(Mov, [self.result(instr)?, Reg(quotient_or_remainder)]);
            }
            Opcode::Shl | Opcode::Shr => {
                let op = match instr.opcode {
                    Opcode::Shl => Sal,
                    _ => Sar,
                };
                self.emit_cmt(Mov, [Reg(R11), self.operand(&instr.args[0])?], comment);
                self.emit(Mov, [Reg(Rcx), self.operand(&instr.args[1])?]);
                self.emit(op, [Reg(R11), Reg(Cl)]);
                self.emit(Mov, [self.result(instr)?, Reg(R11)]);
            }
            Opcode::Neg | Opcode::Not => {
                let op = match instr.opcode {
                    Opcode::Neg => Neg,
                    _ => Not,
                };
                self.emit_cmt(Mov, [Reg(R11), self.operand(&instr.args[0])?], comment);
                self.emit(op, [Reg(R11)]);
                self.emit(Mov, [self.result(instr)?, Reg(R11)]);
            }
            Opcode::Jmp => {
                let target = self.label(instr)?;
                self.emit_cmt(Jmp, [target], comment);
            }
            Opcode::Jz | Opcode::Jnz | Opcode::Jl | Opcode::Jle | Opcode::Jg | Opcode::Jge => {
                let op = match instr.opcode {
                    Opcode::Jz => Jz,
                    Opcode::Jnz => Jnz,
                    Opcode::Jl => Jl,
                    Opcode::Jle => Jle,
                    Opcode::Jg => Jg,
                    _ => Jge,
                };
                self.emit_cmt(Cmp, [self.operand(&instr.args[0])?, Lit(0)], comment);
                self.emit(op, [self.label(instr)?]);
            }
            Opcode::Param => {
                let index = instr.args[0]
                    .as_int()
                    .ok_or_else(|| instr.shape_error("an index and a value"))?;
                self.pending_params.push((index, instr.args[1].clone()));
            }
            Opcode::Call => self.compile_call(instr, comment)?,
            Opcode::Ret => {
                let ret_reg = self.calling_convention.return_register();
                match instr.args.first() {
                    Some(value) => {
                        self.emit_cmt(Mov, [Reg(ret_reg), self.operand(value)?], comment)
                    }
                    None => self.emit_cmt(Xor, [Reg(ret_reg), Reg(ret_reg)], comment),
                };
                self.emit(Jmp, [Id(self.exit_label.clone())]);
            }
            Opcode::Print => {
                self.emit_cmt(Mov, [Reg(Rdi), self.operand(&instr.args[0])?], comment);
                self.emit(Call, [Id(Builtin::PrintInt.symbol().to_string())]);
            }
            // Phis are lowered to copies before code generation.
            Opcode::Phi => return malformed(Malformed::UnloweredPhi(comment)),
            Opcode::Nop => (),
        }
        Ok(())
    }

    /// Pass the collected parameters and call. Register arguments are loaded, the rest are
    /// pushed from the last one down, so that the seventh argument ends up on top.
    fn compile_call(&mut self, instr: &TacInstr, comment: String) -> CompileResult<()> {
        let callee = instr.args[0]
            .as_global()
            .ok_or_else(|| instr.shape_error("a procedure and an argument count"))?
            .to_string();
        if !self.callees.contains(callee.as_str()) {
            return Err(ResourceShape::UndeclaredProcedure(format!("@{}", callee)).into());
        }

        let mut params = std::mem::take(&mut self.pending_params);
        params.sort_by_key(|(index, _)| *index);
        let reg_count = self.calling_convention.reg_param_count();
        let (in_regs, on_stack) = params.split_at(params.len().min(reg_count));

        self.body.comment(format!("<call> {}", comment));
        for (index, value) in in_regs {
            let reg = usize::try_from(*index)
                .ok()
                .and_then(|i| i.checked_sub(1))
                .and_then(|i| self.calling_convention.param_register(i))
                .ok_or_else(|| Malformed::Operand(format!("param {}", index)))?;
            self.emit(Mov, [Reg(reg), self.operand(value)?]);
        }

        let padding = on_stack.len() % 2;
        if padding == 1 {
            self.emit_cmt(Sub, [Reg(Rsp), Lit(8)], "keep the stack aligned");
        }
        for (_, value) in on_stack.iter().rev() {
            self.emit(Push, [self.operand(value)?]);
        }
        self.emit(Call, [Id(callee)]);
        let pushed = (on_stack.len() + padding) * SLOT_SIZE;
        if pushed > 0 {
            self.emit(Add, [Reg(Rsp), Lit(pushed as i64)]);
        }

        if instr.result.is_some() {
            self.emit(Mov, [self.result(instr)?, Reg(Rax)]);
        }
        Ok(())
    }

    fn slot(&self, temp: &Temp) -> CompileResult<Operand> {
        match self.slots.get(temp) {
            Some(index) => Ok(Mem(Memory::Frame(-(((index + 1) * SLOT_SIZE) as i64)))),
            None => malformed(Malformed::Operand(temp.to_string())),
        }
    }

    fn operand(&self, operand: &TacOperand) -> CompileResult<Operand> {
        Ok(match operand {
            TacOperand::Temp(t) => self.slot(t)?,
            TacOperand::Global(g) => Mem(Memory::Global(g.clone())),
            TacOperand::Int(i) => Lit(*i),
            TacOperand::Label(l) => Id(l.to_string()),
        })
    }

    fn result(&self, instr: &TacInstr) -> CompileResult<Operand> {
        match &instr.result {
            Some(result) => self.operand(result),
            None => Ok(Reg(R11)),
        }
    }

    fn label(&self, instr: &TacInstr) -> CompileResult<Operand> {
        instr
            .jump_target()
            .map(|l| Id(l.to_string()))
            .ok_or_else(|| instr.shape_error("a label"))
    }

    /// Emit an instruction, adding it to the body.
    fn emit<const N: usize>(&mut self, op: Op, operands: [Operand; N]) {
        self.body.push(op, operands);
    }

    /// Emit an instruction with a comment, adding it to the body.
    fn emit_cmt<S: Into<String>, const N: usize>(
        &mut self,
        op: Op,
        operands: [Operand; N],
        comment: S,
    ) {
        self.body.push_cmt(op, operands, comment);
    }
}

/// Give every temporary a slot index: parameters first, then in the order temporaries
/// appear in the body.
fn allocate_slots(tac: &TacProcedure) -> HashMap<Temp, usize> {
    let mut slots = HashMap::new();
    let temps = tac.params.iter().copied().chain(
        tac.body
            .iter_instructions()
            .flat_map(|i| i.uses().chain(i.defines())),
    );
    for temp in temps {
        let next = slots.len();
        slots.entry(temp).or_insert(next);
    }
    slots
}
