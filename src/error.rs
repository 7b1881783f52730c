use thiserror::Error;

pub type CompileResult<T> = Result<T, CompileError>;

/// A fatal compilation error. Every error aborts the whole run: the front end is trusted,
/// so anything that ends up here means its contract was violated, or the program does not
/// fit the shape the back end can lower.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CompileError {
    #[error("malformed input: {0}")]
    Malformed(#[from] Malformed),
    #[error("cannot lower program: {0}")]
    ResourceShape(#[from] ResourceShape),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum Malformed {
    #[error("unknown opcode '{0}'")]
    UnknownOpcode(String),
    #[error("invalid operand '{0}'")]
    Operand(String),
    #[error("'{opcode}' expects {expected}, found [{found}]")]
    OperandShape {
        opcode: String,
        expected: &'static str,
        found: String,
    },
    #[error("unbound variable '{0}' in procedure {1}")]
    UnboundVariable(String, String),
    #[error("'{0}' outside of a loop in procedure {1}")]
    StrayJump(&'static str, String),
    #[error("jump to undefined label {0} in procedure {1}")]
    UndefinedLabel(String, String),
    #[error("phi instruction {0} reached code generation")]
    UnloweredPhi(String),
    #[error("invalid TAC record: {0}")]
    Record(String),
    #[error("duplicate declaration of {0}")]
    DuplicateDeclaration(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResourceShape {
    #[error("call to undeclared procedure {0}")]
    UndeclaredProcedure(String),
    #[error("stack frame of {bytes} bytes in {procedure} cannot be addressed")]
    FrameTooLarge { procedure: String, bytes: u64 },
}

/// Construct a malformed-input error result.
pub fn malformed<T>(kind: Malformed) -> CompileResult<T> {
    Err(CompileError::Malformed(kind))
}
