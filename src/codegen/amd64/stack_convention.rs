//! Conventions for stack usage.
use super::assembly::*;
use super::x86::*;

use Op::*;
use Operand::*;
use Register::*;

pub trait StackConvention {
    fn add_prologue(block: &mut Block, frame_size: usize);
    fn add_epilogue(block: &mut Block, exit_label: &str);

    fn prologue(frame_size: usize) -> Block {
        let mut block = Block::new();
        Self::add_prologue(&mut block, frame_size);
        block
    }
    fn epilogue(exit_label: &str) -> Block {
        let mut block = Block::new();
        Self::add_epilogue(&mut block, exit_label);
        block
    }
}

/// A frame addressed through `rbp`, with all locals allocated at entry.
pub struct Linux64;
impl StackConvention for Linux64 {
    fn add_prologue(block: &mut Block, frame_size: usize) {
        block
            .push_cmt(Push, [Reg(Rbp)], "store base pointer")
            .push_cmt(Mov, [Reg(Rbp), Reg(Rsp)], "move base pointer down");
        if frame_size > 0 {
            block.push_cmt(
                Sub,
                [Reg(Rsp), Lit(frame_size as i64)],
                "allocate stack slots",
            );
        }
        block.blank();
    }

    fn add_epilogue(block: &mut Block, exit_label: &str) {
        block
            .blank()
            .push_label(exit_label)
            .push_cmt(Mov, [Reg(Rsp), Reg(Rbp)], "move stack pointer back up")
            .push_cmt(Pop, [Reg(Rbp)], "restore previous base pointer")
            .push_cmt(Ret, [], "return to caller");
    }
}

pub fn make_procedure<S: Into<String>, C: StackConvention>(
    name: S,
    frame_size: usize,
    exit_label: &str,
) -> Procedure {
    Procedure::new(name.into(), C::prologue(frame_size), C::epilogue(exit_label))
}
