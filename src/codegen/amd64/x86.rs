use std::fmt::{self, Display, Formatter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Register {
    Rbp,
    Rsp,
    Rdi,
    Rsi,
    Rax,
    Rcx,
    Rdx,
    R8,
    R9,
    R11,
    /// The low byte of `rcx`, used as a shift count.
    Cl,
}
impl Display for Register {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.write_str(match self {
            Register::Rbp => "rbp",
            Register::Rsp => "rsp",
            Register::Rdi => "rdi",
            Register::Rsi => "rsi",
            Register::Rax => "rax",
            Register::Rcx => "rcx",
            Register::Rdx => "rdx",
            Register::R8 => "r8",
            Register::R9 => "r9",
            Register::R11 => "r11",
            Register::Cl => "cl",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    // Stack manipulation
    Push,
    Pop,
    Call,
    Ret,
    // Copies
    Mov,
    // Arithmetic
    Add,
    Sub,
    Imul,
    Idiv,
    Cqo,
    Neg,
    // Bitwise operations
    And,
    Or,
    Xor,
    Not,
    Sal,
    Sar,
    // Comparison
    Cmp,
    // Jumps
    Jmp,
    Jz,
    Jnz,
    Jl,
    Jle,
    Jg,
    Jge,
}
impl Display for Op {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.write_str(match self {
            Op::Push => "push",
            Op::Pop => "pop",
            Op::Call => "call",
            Op::Ret => "ret",
            Op::Mov => "mov",
            Op::Add => "add",
            Op::Sub => "sub",
            Op::Imul => "imul",
            Op::Idiv => "idiv",
            Op::Cqo => "cqo",
            Op::Neg => "neg",
            Op::And => "and",
            Op::Or => "or",
            Op::Xor => "xor",
            Op::Not => "not",
            Op::Sal => "sal",
            Op::Sar => "sar",
            Op::Cmp => "cmp",
            Op::Jmp => "jmp",
            Op::Jz => "jz",
            Op::Jnz => "jnz",
            Op::Jl => "jl",
            Op::Jle => "jle",
            Op::Jg => "jg",
            Op::Jge => "jge",
        })
    }
}
