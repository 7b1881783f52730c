//! Runtime support routines. These are linked in externally; the compiler only emits
//! calls to them.

/// The name of the source-level printing procedure.
pub const PRINT: &str = "print";

#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub enum Builtin {
    PrintInt,
    PrintBool,
}
impl Builtin {
    pub fn all() -> [Builtin; 2] {
        [Builtin::PrintInt, Builtin::PrintBool]
    }

    /// The symbol the routine is linked under.
    pub fn symbol(&self) -> &'static str {
        match self {
            Builtin::PrintInt => "bx_print_int",
            Builtin::PrintBool => "bx_print_bool",
        }
    }

    pub fn from_symbol(symbol: &str) -> Option<Builtin> {
        Builtin::all().into_iter().find(|b| b.symbol() == symbol)
    }

    /// How the routine renders its single argument.
    pub fn render(&self, value: i64) -> String {
        match self {
            Builtin::PrintInt => value.to_string(),
            Builtin::PrintBool => (value != 0).to_string(),
        }
    }
}
