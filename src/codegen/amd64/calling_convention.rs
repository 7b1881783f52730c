use super::x86::Register::{self, *};

const SYSTEM_V_PARAMS: &[Register] = &[Rdi, Rsi, Rdx, Rcx, R8, R9];

/// Bytes between the base pointer and the first stack-passed argument: the saved base
/// pointer and the return address.
const STACK_ARGS_OFFSET: i64 = 16;

/// The System V AMD64 ABI, restricted to integer arguments.
pub struct SystemV64;

impl SystemV64 {
    /// Gets the maximum amount of parameters that can be passed via registers.
    pub fn reg_param_count(&self) -> usize {
        SYSTEM_V_PARAMS.len()
    }

    /// The register carrying the parameter at the given zero-based index, if any.
    pub fn param_register(&self, index: usize) -> Option<Register> {
        SYSTEM_V_PARAMS.get(index).copied()
    }

    /// The offset from the base pointer at which the callee finds a stack-passed
    /// parameter, by zero-based index.
    pub fn stack_param_offset(&self, index: usize) -> i64 {
        let stack_index = (index - self.reg_param_count()) as i64;
        STACK_ARGS_OFFSET + 8 * stack_index
    }

    pub fn return_register(&self) -> Register {
        Rax
    }
}
