use std::collections::HashMap;

use super::{Operand, Temp};

/// Hands out temporaries and tracks which temporary (or global) each source-level
/// name is bound to in the current lexical scope.
pub struct NameGenerator {
    index: u32,
    scopes: Vec<HashMap<String, Operand>>,
}

impl NameGenerator {
    /// Construct a generator whose outermost scope holds the given globals.
    pub fn new<'g, I: IntoIterator<Item = &'g str>>(globals: I) -> Self {
        let globals = globals
            .into_iter()
            .map(|g| (g.to_string(), Operand::global(g)))
            .collect();
        Self {
            index: 0,
            scopes: vec![globals, HashMap::new()],
        }
    }

    /// Generates a new unique temporary.
    pub fn next_temp(&mut self) -> Temp {
        let temp = Temp::new(self.index);
        self.index += 1;
        temp
    }

    /// Binds a name in the innermost scope to the given temporary, shadowing any outer
    /// binding.
    pub fn bind(&mut self, name: &str, temp: Temp) {
        self.scopes
            .last_mut()
            .expect("the global scope is never popped")
            .insert(name.to_string(), temp.into());
    }

    /// Returns the operand a name is bound to, searching from the innermost scope out.
    pub fn lookup(&self, name: &str) -> Option<&Operand> {
        self.scopes.iter().rev().find_map(|scope| scope.get(name))
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    pub fn pop_scope(&mut self) {
        debug_assert!(self.scopes.len() > 2, "popped the parameter scope");
        self.scopes.pop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_temp_generates_ascending_temp_values() {
        let mut name_gen = NameGenerator::new(["g"]);

        assert_eq!("%0", name_gen.next_temp().to_string());
        assert_eq!("%1", name_gen.next_temp().to_string());
    }

    #[test]
    fn globals_are_visible_until_shadowed() {
        let mut name_gen = NameGenerator::new(["x"]);
        assert_eq!(Some(&Operand::global("x")), name_gen.lookup("x"));

        name_gen.push_scope();
        let local = name_gen.next_temp();
        name_gen.bind("x", local);
        assert_eq!(Some(&Operand::Temp(local)), name_gen.lookup("x"));

        name_gen.pop_scope();
        assert_eq!(Some(&Operand::global("x")), name_gen.lookup("x"));
    }

    #[test]
    fn unbound_names_are_not_found() {
        let name_gen = NameGenerator::new(["g"]);

        assert_eq!(None, name_gen.lookup("y"));
    }
}
