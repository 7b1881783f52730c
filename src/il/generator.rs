use crate::{
    ast::{typed::*, TypeSpec},
    builtins::{self, Builtin},
    error::{malformed, Malformed},
    prelude::*,
};

use super::{
    label_generator::*, name_generator::*, tac::*, TacGlobal, TacListing, TacProcedure,
    TacProgram,
};

/// How expressions are broken down into instructions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum Munch {
    /// Operands are lowered first; every operator writes a fresh temporary, and
    /// variables are used in place.
    #[default]
    BottomUp,
    /// Every expression is lowered into a target chosen by its parent.
    TopDown,
}

/// Generate three-address code for a validated program.
pub fn generate(program: &Program, munch: Munch) -> CompileResult<TacProgram> {
    let mut tac = TacProgram::default();

    for global in program.globals() {
        if tac.global(&global.name).is_some() {
            return malformed(Malformed::DuplicateDeclaration(format!("@{}", global.name)));
        }
        tac.globals.push(TacGlobal {
            name: global.name.clone(),
            init: global.init.value(),
        });
    }

    let global_names: Vec<_> = tac.globals.iter().map(|g| g.name.clone()).collect();
    for procedure in program.procedures() {
        if tac.procedure(&procedure.name).is_some() {
            return malformed(Malformed::DuplicateDeclaration(format!("@{}", procedure.name)));
        }
        let compiled = ProcedureContext::generate(procedure, &global_names, munch)?;
        debug!(
            "Generated {} instructions for @{}",
            compiled.body.iter_instructions().count(),
            compiled.name
        );
        tac.procedures.push(compiled);
    }

    Ok(tac)
}

/// Per-procedure generator state. Nothing survives from one procedure to the next.
struct ProcedureContext {
    name: String,
    munch: Munch,
    names: NameGenerator,
    labels: LabelGenerator,
    body: TacListing,
    break_stack: Vec<Label>,
    continue_stack: Vec<Label>,
}
impl ProcedureContext {
    /// Generate a three-address code listing for a procedure.
    fn generate(decl: &ProcDecl, globals: &[String], munch: Munch) -> CompileResult<TacProcedure> {
        let mut generator = Self {
            name: decl.name.clone(),
            munch,
            names: NameGenerator::new(globals.iter().map(String::as_str)),
            labels: LabelGenerator::new(),
            body: TacListing::new(),
            break_stack: vec![],
            continue_stack: vec![],
        };

        debug!("Lowering {}", decl);
        let params = decl
            .params
            .iter()
            .map(|param| {
                let temp = generator.names.next_temp();
                generator.names.bind(&param.name, temp);
                temp
            })
            .collect();

        generator.lower_block(&decl.body)?;

        Ok(TacProcedure::new(decl.name.clone(), params, generator.body))
    }

    /// Lower a block of statements in its own scope.
    fn lower_block(&mut self, block: &Block) -> CompileResult<()> {
        self.names.push_scope();
        for stmt in &block.stmts {
            self.lower_stmt(stmt)?;
        }
        self.names.pop_scope();
        Ok(())
    }

    fn lower_stmt(&mut self, stmt: &Stmt) -> CompileResult<()> {
        match stmt {
            Stmt::VarDecl { name, ty, init } => {
                // The initialiser still sees any outer binding of the name.
                let temp = self.names.next_temp();
                trace!("{} : {} lives in {}", name, ty, temp);
                self.lower_expr_into(init, temp.into())?;
                self.names.bind(name, temp);
            }
            Stmt::Assign { name, value } => {
                let target = self.lookup(name)?;
                self.lower_expr_into(value, target)?;
            }
            Stmt::Eval(expr) => match &expr.kind {
                ExprKind::Call(name, args) => self.lower_call(name, args, None)?,
                _ => {
                    self.lower_expr(expr)?;
                }
            },
            Stmt::Block(block) => self.lower_block(block)?,
            Stmt::IfElse {
                cond,
                then_block,
                else_branch,
            } => self.lower_if(cond, then_block, else_branch.as_deref())?,
            Stmt::While { cond, body } => self.lower_while(cond, body)?,
            Stmt::Break => {
                let target = self.innermost(true)?;
                self.emit(Instr::jmp(target));
            }
            Stmt::Continue => {
                let target = self.innermost(false)?;
                self.emit(Instr::jmp(target));
            }
            Stmt::Return(Some(expr)) => {
                let value = self.lower_expr(expr)?;
                self.emit(Instr::ret(Some(value)));
            }
            Stmt::Return(None) => {
                let cleared = self.names.next_temp();
                self.emit(Instr::constant(0, cleared.into()));
                self.emit(Instr::ret(Some(cleared.into())));
            }
        }
        Ok(())
    }

    /// Lower an if-statement to a conditional jump into one of two branches, both of which
    /// continue at a shared exit label.
    fn lower_if(
        &mut self,
        cond: &Expr,
        then_block: &Block,
        else_branch: Option<&Stmt>,
    ) -> CompileResult<()> {
        let true_lbl = self.labels.next_label("");
        let false_lbl = self.labels.next_label("");
        let exit_lbl = self.labels.next_label("");

        self.lower_cond(cond, &true_lbl, &false_lbl)?;
        self.emit(Instr::label(true_lbl));
        self.lower_block(then_block)?;
        self.emit(Instr::jmp(exit_lbl.clone()));
        self.emit(Instr::label(false_lbl));
        if let Some(else_branch) = else_branch {
            self.lower_stmt(else_branch)?;
        }
        self.emit(Instr::label(exit_lbl));
        Ok(())
    }

    fn lower_while(&mut self, cond: &Expr, body: &Block) -> CompileResult<()> {
        let head_lbl = self.labels.next_label("");
        let body_lbl = self.labels.next_label("");
        let end_lbl = self.labels.next_label("");

        self.break_stack.push(end_lbl.clone());
        self.continue_stack.push(head_lbl.clone());

        self.emit(Instr::label(head_lbl.clone()));
        self.lower_cond(cond, &body_lbl, &end_lbl)?;
        self.emit(Instr::label(body_lbl));
        self.lower_block(body)?;
        self.emit(Instr::jmp(head_lbl));
        self.emit(Instr::label(end_lbl));

        self.break_stack.pop();
        self.continue_stack.pop();
        Ok(())
    }

    /// Lower an expression to an operand holding its value.
    fn lower_expr(&mut self, expr: &Expr) -> CompileResult<Operand> {
        if let (Munch::BottomUp, ExprKind::Variable(name)) = (self.munch, &expr.kind) {
            match self.lookup(name)? {
                local @ Operand::Temp(_) => return Ok(local),
                // Globals are read into a temporary so that a later call cannot change the
                // value this expression saw.
                _ => (),
            }
        }
        let target = self.names.next_temp();
        self.lower_expr_into(expr, target.into())?;
        Ok(target.into())
    }

    /// Lower an expression, writing its value to `target`.
    fn lower_expr_into(&mut self, expr: &Expr, target: Operand) -> CompileResult<()> {
        match &expr.kind {
            ExprKind::Variable(name) => {
                let source = self.lookup(name)?;
                if source != target {
                    self.emit(Instr::copy(source, target));
                }
            }
            ExprKind::Int(value) => self.emit(Instr::constant(*value, target)),
            ExprKind::Bool(value) => self.emit(Instr::constant(*value as i64, target)),
            ExprKind::Unary(UnOp::Not, _) => self.lower_bool_value(expr, target)?,
            ExprKind::Unary(op, operand) => {
                let operand = self.lower_expr(operand)?;
                let opcode = match op {
                    UnOp::Negate => Opcode::Neg,
                    UnOp::BitNot | UnOp::Not => Opcode::Not,
                };
                self.emit(Instr::new(opcode, vec![operand], Some(target)));
            }
            ExprKind::Binary(op, _, _) if op.is_comparison() || is_boolean(*op) => {
                self.lower_bool_value(expr, target)?
            }
            ExprKind::Binary(op, lhs, rhs) => {
                let lhs = self.lower_expr(lhs)?;
                let rhs = self.lower_expr(rhs)?;
                self.emit(Instr::new(arith_opcode(*op), vec![lhs, rhs], Some(target)));
            }
            ExprKind::Call(name, args) => self.lower_call(name, args, Some(target))?,
        }
        Ok(())
    }

    /// Materialise a boolean expression as 1 or 0 by branching on it.
    fn lower_bool_value(&mut self, expr: &Expr, target: Operand) -> CompileResult<()> {
        let true_lbl = self.labels.next_label("");
        let false_lbl = self.labels.next_label("");
        let exit_lbl = self.labels.next_label("");

        self.lower_cond(expr, &true_lbl, &false_lbl)?;
        self.emit(Instr::label(true_lbl));
        self.emit(Instr::constant(1, target.clone()));
        self.emit(Instr::jmp(exit_lbl.clone()));
        self.emit(Instr::label(false_lbl));
        self.emit(Instr::constant(0, target));
        self.emit(Instr::label(exit_lbl));
        Ok(())
    }

    /// Lower a boolean expression to control flow: jump to `true_lbl` if it holds, and to
    /// `false_lbl` otherwise.
    fn lower_cond(
        &mut self,
        expr: &Expr,
        true_lbl: &Label,
        false_lbl: &Label,
    ) -> CompileResult<()> {
        match &expr.kind {
            ExprKind::Bool(true) => self.emit(Instr::jmp(true_lbl.clone())),
            ExprKind::Bool(false) => self.emit(Instr::jmp(false_lbl.clone())),
            ExprKind::Unary(UnOp::Not, inner) => self.lower_cond(inner, false_lbl, true_lbl)?,
            ExprKind::Binary(BinOp::And, lhs, rhs) => {
                let middle = self.labels.next_label("");
                self.lower_cond(lhs, &middle, false_lbl)?;
                self.emit(Instr::label(middle));
                self.lower_cond(rhs, true_lbl, false_lbl)?;
            }
            ExprKind::Binary(BinOp::Or, lhs, rhs) => {
                let middle = self.labels.next_label("");
                self.lower_cond(lhs, true_lbl, &middle)?;
                self.emit(Instr::label(middle));
                self.lower_cond(rhs, true_lbl, false_lbl)?;
            }
            ExprKind::Binary(op, lhs, rhs) if op.is_comparison() => {
                let lhs = self.lower_expr(lhs)?;
                let rhs = self.lower_expr(rhs)?;
                let difference = self.names.next_temp();
                self.emit(Instr::new(
                    Opcode::Sub,
                    vec![lhs, rhs],
                    Some(difference.into()),
                ));
                self.emit(Instr::cond_jump(
                    comparison_jump(*op),
                    difference.into(),
                    true_lbl.clone(),
                ));
                self.emit(Instr::jmp(false_lbl.clone()));
            }
            _ => {
                let value = self.lower_expr(expr)?;
                self.emit(Instr::cond_jump(Opcode::Jz, value, false_lbl.clone()));
                self.emit(Instr::jmp(true_lbl.clone()));
            }
        }
        Ok(())
    }

    /// Lower a procedure call. Arguments are evaluated left to right before any `param` is
    /// emitted, so a call nested in an argument cannot interleave with this one. The first
    /// six are then passed in order and the rest from the last one backwards, which is the
    /// order they are pushed in.
    fn lower_call(
        &mut self,
        name: &str,
        args: &[Expr],
        target: Option<Operand>,
    ) -> CompileResult<()> {
        if name == builtins::PRINT {
            return self.lower_print(args);
        }

        let values = args
            .iter()
            .map(|arg| self.lower_expr(arg))
            .collect::<CompileResult<Vec<_>>>()?;
        let register_args = values.len().min(6);
        let order = (0..register_args).chain((register_args..values.len()).rev());
        for index in order {
            self.emit(Instr::new(
                Opcode::Param,
                vec![Operand::Int(index as i64 + 1), values[index].clone()],
                None,
            ));
        }
        self.emit(Instr::new(
            Opcode::Call,
            vec![Operand::global(name), Operand::Int(args.len() as i64)],
            target,
        ));
        Ok(())
    }

    fn lower_print(&mut self, args: &[Expr]) -> CompileResult<()> {
        for arg in args {
            let value = self.lower_expr(arg)?;
            match arg.ty {
                TypeSpec::Bool => {
                    self.emit(Instr::new(Opcode::Param, vec![Operand::Int(1), value], None));
                    self.emit(Instr::new(
                        Opcode::Call,
                        vec![
                            Operand::global(Builtin::PrintBool.symbol()),
                            Operand::Int(1),
                        ],
                        None,
                    ));
                }
                _ => self.emit(Instr::new(Opcode::Print, vec![value], None)),
            }
        }
        Ok(())
    }

    fn lookup(&self, name: &str) -> CompileResult<Operand> {
        match self.names.lookup(name) {
            Some(operand) => Ok(operand.clone()),
            None => malformed(Malformed::UnboundVariable(
                name.to_string(),
                format!("@{}", self.name),
            )),
        }
    }

    /// The innermost loop's exit label (for `break`) or head label (for `continue`).
    fn innermost(&self, exit: bool) -> CompileResult<Label> {
        let (stack, stmt) = match exit {
            true => (&self.break_stack, "break"),
            false => (&self.continue_stack, "continue"),
        };
        match stack.last() {
            Some(label) => Ok(label.clone()),
            None => malformed(Malformed::StrayJump(stmt, format!("@{}", self.name))),
        }
    }

    /// Emit an instruction, adding it to the listing.
    fn emit(&mut self, instr: Instr) {
        trace!("@{}: {}", self.name, instr);
        self.body.push(instr);
    }
}

fn is_boolean(op: BinOp) -> bool {
    matches!(op, BinOp::And | BinOp::Or)
}

fn arith_opcode(op: BinOp) -> Opcode {
    match op {
        BinOp::Add => Opcode::Add,
        BinOp::Subtract => Opcode::Sub,
        BinOp::Multiply => Opcode::Mul,
        BinOp::Divide => Opcode::Div,
        BinOp::Modulus => Opcode::Mod,
        BinOp::BitAnd => Opcode::And,
        BinOp::BitOr => Opcode::Or,
        BinOp::BitXor => Opcode::Xor,
        BinOp::Shl => Opcode::Shl,
        BinOp::Shr => Opcode::Shr,
        other => unreachable!("{} is lowered through control flow", other),
    }
}

/// The jump taken when `lhs - rhs` satisfies the comparison.
fn comparison_jump(op: BinOp) -> Opcode {
    match op {
        BinOp::Equal => Opcode::Jz,
        BinOp::NotEqual => Opcode::Jnz,
        BinOp::Less => Opcode::Jl,
        BinOp::LessEqual => Opcode::Jle,
        BinOp::Greater => Opcode::Jg,
        BinOp::GreaterEqual => Opcode::Jge,
        other => unreachable!("{} is not a comparison", other),
    }
}

#[cfg(test)]
mod tests {
    use crate::{ast::build::*, error::CompileError};

    use super::*;

    macro_rules! assert_generates {
        ($munch:expr, $stmts:expr, $il:expr) => {{
            let program = main_program($stmts);
            let tac = generate(&program, $munch).unwrap();
            let instr_lines: Vec<_> = tac.procedures[0]
                .body
                .iter_instructions()
                .map(ToString::to_string)
                .collect();

            assert_eq!(&$il[..], instr_lines)
        }};
    }

    #[test]
    fn bottom_up_uses_variables_in_place() {
        assert_generates!(
            Munch::BottomUp,
            vec![
                decl("x", int(1)),
                decl("y", bin(BinOp::Add, var("x"), int(2))),
                print(var("y")),
            ],
            [
                "%0 = const 1",
                "%2 = const 2",
                "%1 = add %0, %2",
                "print %1",
            ]
        )
    }

    #[test]
    fn top_down_copies_into_fresh_operands() {
        assert_generates!(
            Munch::TopDown,
            vec![
                decl("x", int(1)),
                decl("y", bin(BinOp::Add, var("x"), int(2))),
                print(var("y")),
            ],
            [
                "%0 = const 1",
                "%2 = copy %0",
                "%3 = const 2",
                "%1 = add %2, %3",
                "%4 = copy %1",
                "print %4",
            ]
        )
    }

    #[test]
    fn comparison_lowers_to_subtraction_and_jump() {
        assert_generates!(
            Munch::BottomUp,
            vec![
                decl("x", int(1)),
                if_else(bin(BinOp::Less, var("x"), int(5)), vec![print(int(1))], vec![]),
            ],
            [
                "%0 = const 1",
                "%1 = const 5",
                "%2 = sub %0, %1",
                "jl %2, .L0",
                "jmp .L1",
                ".L0:",
                "%3 = const 1",
                "print %3",
                "jmp .L2",
                ".L1:",
                ".L2:",
            ]
        )
    }

    #[test]
    fn conjunction_chains_through_intermediate_label() {
        assert_generates!(
            Munch::BottomUp,
            vec![
                decl("b", boolean(true)),
                while_loop(
                    bin(BinOp::And, bool_var("b"), not(bool_var("b"))),
                    vec![Stmt::Break]
                ),
            ],
            [
                "%0 = const 1",
                ".L0:",
                "jz %0, .L2",
                "jmp .L3",
                ".L3:",
                "jz %0, .L1",
                "jmp .L2",
                ".L1:",
                "jmp .L2",
                "jmp .L0",
                ".L2:",
            ]
        )
    }

    #[test]
    fn boolean_value_is_materialised_through_labels() {
        assert_generates!(
            Munch::BottomUp,
            vec![decl("b", bin(BinOp::Or, boolean(false), boolean(true)))],
            [
                "jmp .L3",
                ".L3:",
                "jmp .L0",
                ".L0:",
                "%0 = const 1",
                "jmp .L2",
                ".L1:",
                "%0 = const 0",
                ".L2:",
            ]
        )
    }

    #[test]
    fn calls_pass_stack_arguments_in_reverse() {
        let args: Vec<_> = (1..=8).map(int).collect();
        let params = ["a", "b", "c", "d", "e", "f", "g", "h"];
        let program = Program {
            decls: vec![
                procedure("f", &params, TypeSpec::Int, vec![ret(Some(var("h")))]),
                procedure(
                    "main",
                    &[],
                    TypeSpec::Void,
                    vec![print(call("f", args, TypeSpec::Int))],
                ),
            ],
        };
        let tac = generate(&program, Munch::BottomUp).unwrap();
        let params: Vec<_> = tac
            .procedure("main")
            .unwrap()
            .body
            .iter_instructions()
            .filter(|i| i.opcode == Opcode::Param)
            .map(|i| i.args[0].as_int().unwrap())
            .collect();

        assert_eq!(vec![1, 2, 3, 4, 5, 6, 8, 7], params);
        let last = tac.procedure("f").unwrap().body.iter_instructions().last().unwrap();
        assert_eq!("ret %7", last.to_string());
    }

    #[test]
    fn nested_call_is_finished_before_outer_params() {
        let inner = call("minus", vec![int(3), int(1)], TypeSpec::Int);
        let program = main_program(vec![print(call(
            "minus",
            vec![int(10), inner],
            TypeSpec::Int,
        ))]);
        let tac = generate(&program, Munch::BottomUp).unwrap();
        let opcodes: Vec<_> = tac.procedures[0]
            .body
            .iter_instructions()
            .map(|i| i.opcode)
            .filter(|op| *op != Opcode::Const)
            .collect();

        use Opcode::*;
        assert_eq!(vec![Param, Param, Call, Param, Param, Call, Print], opcodes);
    }

    #[test]
    fn bare_return_clears_a_temporary() {
        assert_generates!(Munch::BottomUp, vec![ret(None)], ["%0 = const 0", "ret %0"])
    }

    #[test]
    fn globals_are_read_through_a_temporary() {
        let program = Program {
            decls: vec![
                global("g", 5),
                procedure(
                    "main",
                    &[],
                    TypeSpec::Void,
                    vec![assign("g", bin(BinOp::Multiply, var("g"), int(2)))],
                ),
            ],
        };
        let tac = generate(&program, Munch::BottomUp).unwrap();
        let lines: Vec<_> = tac.procedures[0]
            .body
            .iter_instructions()
            .map(ToString::to_string)
            .collect();

        assert_eq!(vec!["%0 = copy @g", "%1 = const 2", "@g = mul %0, %1"], lines);
    }

    #[test]
    fn printing_a_boolean_calls_the_runtime() {
        assert_generates!(
            Munch::BottomUp,
            vec![print(boolean(true))],
            ["%0 = const 1", "param 1, %0", "call @bx_print_bool, 1"]
        )
    }

    #[test]
    fn break_outside_loop_is_malformed() {
        let program = main_program(vec![Stmt::Break]);

        assert_eq!(
            Err(CompileError::Malformed(Malformed::StrayJump(
                "break",
                "@main".to_string()
            ))),
            generate(&program, Munch::BottomUp)
        );
    }

    #[test]
    fn unbound_variable_is_malformed() {
        let program = main_program(vec![print(var("nope"))]);

        assert!(matches!(
            generate(&program, Munch::BottomUp),
            Err(CompileError::Malformed(Malformed::UnboundVariable(..)))
        ));
    }

    #[test]
    fn shadowing_declaration_gets_its_own_temporary() {
        assert_generates!(
            Munch::BottomUp,
            vec![
                decl("x", int(1)),
                Stmt::Block(block(vec![decl("x", var("x")), print(var("x"))])),
                print(var("x")),
            ],
            ["%0 = const 1", "%1 = copy %0", "print %1", "print %0"]
        )
    }
}
