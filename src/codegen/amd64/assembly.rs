//! General assembly definitions. Some of these are specific to NASM.

use std::fmt::{self, Display, Formatter};

use super::x86::{Op, Register};

/// A complete assembly file, containing declarations and sections.
pub struct Assembly {
    declarations: Vec<Decl>,
    pub text: Text,
    pub rodata: Data,
    pub data: Data,
}
impl Assembly {
    pub fn new() -> Self {
        Self {
            declarations: vec![],
            text: Text::new(),
            rodata: Data::new(".rodata"),
            data: Data::new(".data"),
        }
    }

    pub fn push_decl(&mut self, decl: Decl) -> &mut Self {
        self.declarations.push(decl);
        self
    }
}
impl Display for Assembly {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        for decl in &self.declarations {
            writeln!(f, "{}", decl)?;
        }
        writeln!(f)?;

        write!(f, "{}", self.text)?;
        write!(f, "{}", self.rodata)?;
        write!(f, "{}", self.data)
    }
}

/// A section of assembly code, such as `.text` or `.data`.
pub trait Section {
    fn name(&self) -> &str;
}

/// A data section holding one quadword per global.
pub struct Data {
    name: &'static str,
    lines: Vec<Line<Directive>>,
}
impl Data {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            lines: vec![],
        }
    }

    pub fn dq<S: Into<String>>(&mut self, name: S, value: i64) -> &mut Self {
        self.lines.push(Line::new(Directive::Dq(name.into(), value)));
        self
    }
}
impl Section for Data {
    fn name(&self) -> &str {
        self.name
    }
}
impl Display for Data {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        if self.lines.is_empty() {
            return Ok(());
        }
        writeln!(f, "section {}", self.name())?;
        for line in &self.lines {
            writeln!(f, "{}", line)?;
        }

        Ok(())
    }
}

/// The `.text` section.
pub struct Text {
    pub procedures: Vec<Procedure>,
}
impl Text {
    pub fn new() -> Self {
        Self { procedures: vec![] }
    }
}
impl Section for Text {
    fn name(&self) -> &str {
        ".text"
    }
}
impl Display for Text {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        writeln!(f, "section {}", self.name())?;
        for proc in &self.procedures {
            writeln!(f, "{}", proc)?;
        }

        Ok(())
    }
}

/// An assembly procedure, marked by a label and surrounded by a prologue and epilogue.
pub struct Procedure {
    pub name: String,
    pub prologue: Block,
    pub body: Block,
    pub epilogue: Block,
}
impl Procedure {
    pub fn new(name: String, prologue: Block, epilogue: Block) -> Self {
        Self {
            name,
            prologue,
            body: Block::new(),
            epilogue,
        }
    }
}
impl Display for Procedure {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        writeln!(f, "{}:", self.name)?;
        write!(f, "{}", self.prologue)?;
        write!(f, "{}", self.body)?;
        write!(f, "{}", self.epilogue)
    }
}

/// A declaration, used to provide hints to the assembler.
pub enum Decl {
    Bits(usize),
    Extern(&'static str),
    Global(String),
}
impl Display for Decl {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Decl::Extern(e) => write!(f, "extern {}", e),
            Decl::Global(g) => write!(f, "global {}", g),
            Decl::Bits(b) => write!(f, "bits {}", b),
        }
    }
}

/// A block of assembly code.
pub struct Block {
    lines: Vec<Line<Code>>,
}
impl Block {
    pub fn new() -> Self {
        Self { lines: vec![] }
    }

    pub fn push<const N: usize>(&mut self, op: Op, operands: [Operand; N]) -> &mut Self {
        self.lines.push(Line::new(Code::Instr(Instr::new(op, operands.into()))));
        self
    }

    pub fn push_cmt<S: Into<String>, const N: usize>(
        &mut self,
        op: Op,
        operands: [Operand; N],
        comment: S,
    ) -> &mut Self {
        self.lines.push(Line::new_cmt(
            Code::Instr(Instr::new(op, operands.into())),
            comment.into(),
        ));
        self
    }

    pub fn push_label<S: Into<String>>(&mut self, label: S) -> &mut Self {
        self.lines.push(Line::new(Code::Label(label.into())));
        self
    }

    /// Add a line holding only a comment.
    pub fn comment<S: Into<String>>(&mut self, comment: S) -> &mut Self {
        self.lines.push(Line::new_comment(comment.into()));
        self
    }

    pub fn blank(&mut self) -> &mut Self {
        self.lines.push(Line::new_blank());
        self
    }

    /// The instructions in this block, comments and labels left out.
    #[cfg(test)]
    pub fn instructions(&self) -> impl Iterator<Item = &Instr> {
        self.lines.iter().filter_map(|l| match &l.line {
            Some(Code::Instr(instr)) => Some(instr),
            _ => None,
        })
    }
}
impl Display for Block {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        for line in &self.lines {
            writeln!(f, "{}", line)?;
        }
        Ok(())
    }
}

/// A line of assembly, consisting of an optional instruction and optional comment.
/// When both are [`None`], an empty line is emitted.
pub struct Line<T> {
    line: Option<T>,
    comment: Option<String>,
}
impl<T> Line<T> {
    /// Construct a new line without comment.
    pub fn new(dir: T) -> Self {
        Self {
            line: Some(dir),
            comment: None,
        }
    }
    /// Construct a new line with a comment.
    pub fn new_cmt(dir: T, comment: String) -> Self {
        Self {
            line: Some(dir),
            comment: Some(comment),
        }
    }

    pub fn new_comment(comment: String) -> Self {
        Self {
            line: None,
            comment: Some(comment),
        }
    }

    /// Construct an empty line.
    pub fn new_blank() -> Self {
        Self {
            line: None,
            comment: None,
        }
    }
}
impl<T: Display> Display for Line<T> {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match (&self.line, self.comment.as_ref()) {
            (None, None) => Ok(()),
            (None, Some(cmt)) => write!(f, "{:40}; {}", "", cmt),
            (Some(dir), None) => {
                write!(f, "{}", dir)
            }
            (Some(dir), Some(cmt)) => {
                write!(f, "{:40}; {}", dir.to_string(), cmt)
            }
        }
    }
}

/// What a line of code holds.
pub enum Code {
    Instr(Instr),
    Label(String),
}
impl Display for Code {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Code::Instr(instr) => write!(f, "{}", instr),
            Code::Label(label) => write!(f, "{}:", label),
        }
    }
}

/// A data directive.
pub enum Directive {
    Dq(String, i64),
}
impl Display for Directive {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Directive::Dq(name, value) => write!(f, "{}: dq {}", name, value),
        }
    }
}

/// A single instruction, consisting of an operator and zero or more operands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instr {
    operator: Op,
    operands: Vec<Operand>,
}
impl Instr {
    pub fn new(operator: Op, operands: Vec<Operand>) -> Instr {
        Self {
            operator,
            operands,
        }
    }
}
impl Display for Instr {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        let operator = self.operator.to_string();
        if self.operands.is_empty() {
            return write!(f, "    {}", operator);
        }
        write!(f, "    {:7} ", operator)?;
        let operands = self
            .operands
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        f.write_str(&operands)
    }
}

/// A quadword in memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Memory {
    /// Relative to the base pointer.
    Frame(i64),
    /// A global, addressed relative to the instruction pointer.
    Global(String),
}
impl Display for Memory {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Memory::Frame(offset) if *offset < 0 => write!(f, "qword [rbp - {}]", -offset),
            Memory::Frame(offset) => write!(f, "qword [rbp + {}]", offset),
            Memory::Global(name) => write!(f, "qword [rel {}]", name),
        }
    }
}

/// An operand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    /// A register
    Reg(Register),
    /// An immediate value
    Lit(i64),
    /// An identifier
    Id(String),
    /// A memory location
    Mem(Memory),
}
impl Display for Operand {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Operand::Reg(reg) => write!(f, "{}", reg),
            Operand::Lit(lit) => write!(f, "{}", lit),
            Operand::Id(id) => f.write_str(id),
            Operand::Mem(mem) => write!(f, "{}", mem),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use Operand::*;
    use Register::*;

    #[test]
    pub fn instr_serializes_correctly() {
        let instr = Instr::new(Op::Mov, vec![Reg(Rax), Reg(Rcx)]);

        assert_eq!("    mov     rax, rcx", instr.to_string());
    }

    #[test]
    pub fn memory_operands_carry_their_size() {
        let load = Instr::new(Op::Mov, vec![Reg(R11), Mem(Memory::Frame(-16))]);
        let store = Instr::new(Op::Mov, vec![Mem(Memory::Global("g".to_string())), Reg(R11)]);

        assert_eq!("    mov     r11, qword [rbp - 16]", load.to_string());
        assert_eq!("    mov     qword [rel g], r11", store.to_string());
    }

    #[test]
    pub fn empty_sections_are_left_out() {
        let mut asm = Assembly::new();
        asm.push_decl(Decl::Bits(64));
        asm.data.dq("counter", 3);

        assert_eq!(
            "bits 64\n\nsection .text\nsection .data\ncounter: dq 3\n",
            asm.to_string()
        );
    }
}
