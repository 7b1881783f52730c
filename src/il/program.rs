use std::{
    collections::HashSet,
    fmt::{self, Display, Formatter},
};

use crate::listing::Listing;

use super::{Instr, Opcode, Operand, Temp};

pub type TacListing = Listing<Instr>;

/// A global variable with its constant initialiser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TacGlobal {
    pub name: String,
    pub init: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TacProcedure {
    pub name: String,
    pub params: Vec<Temp>,
    pub body: TacListing,
}
impl TacProcedure {
    pub fn new<S: Into<String>>(name: S, params: Vec<Temp>, body: TacListing) -> Self {
        Self {
            name: name.into(),
            params,
            body,
        }
    }
}
impl Display for TacProcedure {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        let params = self
            .params
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        writeln!(f, "proc @{}({}):", self.name, params)?;
        for instr in self.body.iter_instructions() {
            if instr.is_label() {
                writeln!(f, "    {}", instr)?;
            } else {
                writeln!(f, "        {}", instr)?;
            }
        }
        Ok(())
    }
}

/// A whole program in three-address code.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TacProgram {
    pub globals: Vec<TacGlobal>,
    pub procedures: Vec<TacProcedure>,
}
impl TacProgram {
    pub fn procedure(&self, name: &str) -> Option<&TacProcedure> {
        self.procedures.iter().find(|p| p.name == name)
    }

    pub fn global(&self, name: &str) -> Option<&TacGlobal> {
        self.globals.iter().find(|g| g.name == name)
    }

    /// Globals that some instruction writes to.
    pub fn stored_globals(&self) -> HashSet<&str> {
        self.procedures
            .iter()
            .flat_map(|p| p.body.iter_instructions())
            .filter_map(|i| i.result.as_ref().and_then(Operand::as_global))
            .collect()
    }

    /// Total number of instructions, labels excluded.
    pub fn instruction_count(&self) -> usize {
        self.procedures
            .iter()
            .flat_map(|p| p.body.iter_instructions())
            .filter(|i| i.opcode != Opcode::Label)
            .count()
    }
}
impl Display for TacProgram {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        for global in &self.globals {
            writeln!(f, "var @{} = {};", global.name, global.init)?;
        }
        for procedure in &self.procedures {
            write!(f, "{}", procedure)?;
        }
        Ok(())
    }
}
