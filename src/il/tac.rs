//! Three-Address Code

use std::{
    fmt::{self, Display, Formatter},
    str::FromStr,
};

use crate::error::{malformed, CompileError, CompileResult, Malformed};

/// The fixed set of TAC opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    Const,
    Copy,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    Neg,
    Not,
    Jmp,
    Jz,
    Jnz,
    Jl,
    Jle,
    Jg,
    Jge,
    Label,
    Param,
    Call,
    Ret,
    Print,
    Phi,
    Nop,
}
impl Opcode {
    pub const ALL: [Opcode; 28] = {
        use Opcode::*;
        [
            Const, Copy, Add, Sub, Mul, Div, Mod, And, Or, Xor, Shl, Shr, Neg, Not, Jmp, Jz, Jnz,
            Jl, Jle, Jg, Jge, Label, Param, Call, Ret, Print, Phi, Nop,
        ]
    };

    pub fn as_str(&self) -> &'static str {
        use Opcode::*;
        match self {
            Const => "const",
            Copy => "copy",
            Add => "add",
            Sub => "sub",
            Mul => "mul",
            Div => "div",
            Mod => "mod",
            And => "and",
            Or => "or",
            Xor => "xor",
            Shl => "shl",
            Shr => "shr",
            Neg => "neg",
            Not => "not",
            Jmp => "jmp",
            Jz => "jz",
            Jnz => "jnz",
            Jl => "jl",
            Jle => "jle",
            Jg => "jg",
            Jge => "jge",
            Label => "label",
            Param => "param",
            Call => "call",
            Ret => "ret",
            Print => "print",
            Phi => "phi",
            Nop => "nop",
        }
    }

    pub fn is_conditional_jump(&self) -> bool {
        use Opcode::*;
        matches!(self, Jz | Jnz | Jl | Jle | Jg | Jge)
    }

    /// Whether this opcode transfers control, conditionally or not.
    pub fn is_jump(&self) -> bool {
        *self == Opcode::Jmp || self.is_conditional_jump()
    }

    /// Whether control never continues with the next instruction.
    pub fn ends_block(&self) -> bool {
        matches!(self, Opcode::Jmp | Opcode::Ret)
    }

    /// Whether executing the instruction can be observed beyond the value it writes.
    /// Division traps on a zero divisor, and a call may do anything.
    pub fn has_side_effect(&self) -> bool {
        use Opcode::*;
        match self {
            Div | Mod | Call => true,
            Jmp | Jz | Jnz | Jl | Jle | Jg | Jge | Label | Param | Ret | Print | Nop => true,
            Const | Copy | Add | Sub | Mul | And | Or | Xor | Shl | Shr | Neg | Not | Phi => false,
        }
    }
}
impl Display for Opcode {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
impl FromStr for Opcode {
    type Err = CompileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Opcode::ALL
            .iter()
            .copied()
            .find(|op| op.as_str() == s)
            .ok_or_else(|| Malformed::UnknownOpcode(s.to_string()).into())
    }
}

/// A temporary. Temporaries are numbered per procedure; SSA construction gives every
/// definition site its own version. Version 0 is the value a temporary has on entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Temp {
    pub id: u32,
    pub version: u32,
}
impl Temp {
    pub fn new(id: u32) -> Self {
        Self { id, version: 0 }
    }

    pub fn versioned(id: u32, version: u32) -> Self {
        Self { id, version }
    }
}
impl Display for Temp {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self.version {
            0 => write!(f, "%{}", self.id),
            v => write!(f, "%{}.{}", self.id, v),
        }
    }
}
impl FromStr for Temp {
    type Err = CompileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || CompileError::from(Malformed::Operand(s.to_string()));
        let body = s.strip_prefix('%').ok_or_else(invalid)?;
        let (id, version) = match body.split_once('.') {
            Some((id, version)) => (id, version.parse().map_err(|_| invalid())?),
            None => (body, 0),
        };
        Ok(Temp::versioned(id.parse().map_err(|_| invalid())?, version))
    }
}

/// A jump target, unique within its procedure.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Label(String);
impl Label {
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}
impl Display for Label {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An instruction operand.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Operand {
    Int(i64),
    Temp(Temp),
    /// A global variable or procedure, named without its `@` sigil.
    Global(String),
    Label(Label),
}
impl Operand {
    pub fn global<S: Into<String>>(name: S) -> Self {
        Operand::Global(name.into())
    }

    pub fn as_temp(&self) -> Option<&Temp> {
        match self {
            Operand::Temp(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_label(&self) -> Option<&Label> {
        match self {
            Operand::Label(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Operand::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_global(&self) -> Option<&str> {
        match self {
            Operand::Global(g) => Some(g),
            _ => None,
        }
    }

    pub fn is_global(&self) -> bool {
        matches!(self, Operand::Global(_))
    }

    /// Whether this operand names a value: a temporary or a global.
    pub fn is_value(&self) -> bool {
        matches!(self, Operand::Temp(_) | Operand::Global(_))
    }
}
impl From<Temp> for Operand {
    fn from(temp: Temp) -> Self {
        Operand::Temp(temp)
    }
}
impl From<Label> for Operand {
    fn from(label: Label) -> Self {
        Operand::Label(label)
    }
}
impl Display for Operand {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Operand::Int(i) => write!(f, "{}", i),
            Operand::Temp(t) => write!(f, "{}", t),
            Operand::Global(g) => write!(f, "@{}", g),
            Operand::Label(l) => write!(f, "{}", l),
        }
    }
}
impl FromStr for Operand {
    type Err = CompileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.starts_with('%') {
            Ok(Operand::Temp(s.parse()?))
        } else if let Some(name) = s.strip_prefix('@').filter(|n| !n.is_empty()) {
            Ok(Operand::global(name))
        } else if s.starts_with(".L") {
            Ok(Operand::Label(Label::new(s)))
        } else if let Ok(i) = s.parse() {
            Ok(Operand::Int(i))
        } else {
            malformed(Malformed::Operand(s.to_string()))
        }
    }
}

/// A single TAC instruction. Instructions are values: optimisation passes rewrite an
/// instruction by building a new one and putting it in the old one's place.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Instr {
    pub opcode: Opcode,
    pub args: Vec<Operand>,
    pub result: Option<Operand>,
}
impl Instr {
    pub fn new(opcode: Opcode, args: Vec<Operand>, result: Option<Operand>) -> Self {
        Self {
            opcode,
            args,
            result,
        }
    }

    pub fn label(label: Label) -> Self {
        Self::new(Opcode::Label, vec![label.into()], None)
    }

    pub fn jmp(target: Label) -> Self {
        Self::new(Opcode::Jmp, vec![target.into()], None)
    }

    pub fn cond_jump(opcode: Opcode, tested: Operand, target: Label) -> Self {
        debug_assert!(opcode.is_conditional_jump());
        Self::new(opcode, vec![tested, target.into()], None)
    }

    pub fn constant(value: i64, target: Operand) -> Self {
        Self::new(Opcode::Const, vec![Operand::Int(value)], Some(target))
    }

    pub fn copy(source: Operand, target: Operand) -> Self {
        Self::new(Opcode::Copy, vec![source], Some(target))
    }

    pub fn ret(value: Option<Operand>) -> Self {
        Self::new(Opcode::Ret, value.into_iter().collect(), None)
    }

    /// Build a phi instruction from `(predecessor label, incoming value)` pairs.
    pub fn phi<I: IntoIterator<Item = (Label, Operand)>>(target: Temp, incoming: I) -> Self {
        let args = incoming
            .into_iter()
            .flat_map(|(label, value)| [Operand::Label(label), value])
            .collect();
        Self::new(Opcode::Phi, args, Some(target.into()))
    }

    pub fn is_label(&self) -> bool {
        self.opcode == Opcode::Label
    }

    /// The label this instruction marks, if it is a label marker.
    pub fn defined_label(&self) -> Option<&Label> {
        match self.opcode {
            Opcode::Label => self.args.first().and_then(Operand::as_label),
            _ => None,
        }
    }

    /// The label this instruction may jump to.
    pub fn jump_target(&self) -> Option<&Label> {
        match self.opcode {
            Opcode::Jmp => self.args.first().and_then(Operand::as_label),
            op if op.is_conditional_jump() => self.args.get(1).and_then(Operand::as_label),
            _ => None,
        }
    }

    /// The operand tested by a conditional jump.
    pub fn tested(&self) -> Option<&Operand> {
        match self.opcode {
            op if op.is_conditional_jump() => self.args.first(),
            _ => None,
        }
    }

    /// The incoming `(predecessor label, value)` pairs of a phi instruction.
    pub fn phi_incoming(&self) -> impl Iterator<Item = (&Label, &Operand)> {
        let args: &[Operand] = match self.opcode {
            Opcode::Phi => &self.args,
            _ => &[],
        };
        args.chunks(2).filter_map(|pair| match pair {
            [Operand::Label(l), value] => Some((l, value)),
            _ => None,
        })
    }

    /// The temporary written by this instruction.
    pub fn defines(&self) -> Option<Temp> {
        self.result.as_ref().and_then(Operand::as_temp).copied()
    }

    /// The temporaries read by this instruction, phi arguments included.
    pub fn uses(&self) -> impl Iterator<Item = Temp> + '_ {
        self.args.iter().filter_map(Operand::as_temp).copied()
    }

    pub fn touches_global(&self) -> bool {
        self.args.iter().chain(self.result.iter()).any(|op| match op {
            Operand::Global(_) => !self.is_callee(op),
            _ => false,
        })
    }

    fn is_callee(&self, operand: &Operand) -> bool {
        self.opcode == Opcode::Call && self.args.first() == Some(operand)
    }

    /// Rewrite every read of a temporary. The destination is left alone.
    pub fn map_uses<F: FnMut(Temp) -> Operand>(&self, mut f: F) -> Instr {
        let args = self
            .args
            .iter()
            .map(|op| match op {
                Operand::Temp(t) => f(*t),
                other => other.clone(),
            })
            .collect();
        Instr::new(self.opcode, args, self.result.clone())
    }

    /// Rewrite the destination temporary.
    pub fn with_result(&self, result: Operand) -> Instr {
        Instr::new(self.opcode, self.args.clone(), Some(result))
    }

    /// Point a jump at a different label. Other instructions are returned unchanged.
    pub fn retarget(&self, to: &Label) -> Instr {
        let mut args = self.args.clone();
        match self.opcode {
            Opcode::Jmp => args[0] = to.clone().into(),
            op if op.is_conditional_jump() => args[1] = to.clone().into(),
            _ => (),
        }
        Instr::new(self.opcode, args, self.result.clone())
    }

    /// Checks that the operands have the shape required by the opcode.
    pub fn validate(&self) -> CompileResult<()> {
        use Opcode::*;
        let args = &self.args;
        let value = |i: usize| args.get(i).map_or(false, Operand::is_value);
        let label = |i: usize| args.get(i).map_or(false, |a| a.as_label().is_some());
        let int = |i: usize| args.get(i).map_or(false, |a| a.as_int().is_some());
        let has_result = self.result.as_ref().map_or(false, Operand::is_value);

        let (ok, expected) = match self.opcode {
            Const => (args.len() == 1 && int(0) && has_result, "an integer and a result"),
            Copy | Neg | Not => (
                args.len() == 1 && value(0) && has_result,
                "one value and a result",
            ),
            Add | Sub | Mul | Div | Mod | And | Or | Xor | Shl | Shr => (
                args.len() == 2 && value(0) && value(1) && has_result,
                "two values and a result",
            ),
            Jmp => (args.len() == 1 && label(0), "a label"),
            Jz | Jnz | Jl | Jle | Jg | Jge => {
                (args.len() == 2 && value(0) && label(1), "a value and a label")
            }
            Label => (args.len() == 1 && label(0) && self.result.is_none(), "a label"),
            Param => (args.len() == 2 && int(0) && value(1), "an index and a value"),
            Call => (
                args.len() == 2 && args[0].is_global() && int(1),
                "a procedure and an argument count",
            ),
            Ret => (args.len() <= 1 && (args.is_empty() || value(0)), "an optional value"),
            Print => (args.len() == 1 && value(0), "one value"),
            Phi => (
                args.len() % 2 == 0 && self.phi_incoming().count() * 2 == args.len() && has_result,
                "label/value pairs and a result",
            ),
            Nop => (args.is_empty(), "no operands"),
        };

        if ok {
            Ok(())
        } else {
            Err(self.shape_error(expected))
        }
    }

    /// The error for operands that do not fit this instruction's opcode.
    pub fn shape_error(&self, expected: &'static str) -> CompileError {
        Malformed::OperandShape {
            opcode: self.opcode.to_string(),
            expected,
            found: self
                .args
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", "),
        }
        .into()
    }
}
impl Display for Instr {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        if let Some(label) = self.defined_label() {
            return write!(f, "{}:", label);
        }
        if let Some(result) = &self.result {
            write!(f, "{} = ", result)?;
        }
        if self.opcode == Opcode::Phi {
            let incoming = self
                .phi_incoming()
                .map(|(l, v)| format!("{}: {}", l, v))
                .collect::<Vec<_>>()
                .join(", ");
            return write!(f, "phi({})", incoming);
        }
        f.write_str(self.opcode.as_str())?;
        let args = self
            .args
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        if !args.is_empty() {
            write!(f, " {}", args)?;
        }
        Ok(())
    }
}
