use std::collections::HashSet;

use super::Label;

/// Generates labels that are unique within one procedure.
#[derive(Debug, Clone)]
pub struct LabelGenerator {
    next: usize,
    reserved: HashSet<Label>,
}
impl LabelGenerator {
    pub fn new() -> Self {
        Self {
            next: 0,
            reserved: HashSet::new(),
        }
    }

    /// A generator that never produces any of the given labels.
    pub fn avoiding<I: IntoIterator<Item = Label>>(existing: I) -> Self {
        Self {
            next: 0,
            reserved: existing.into_iter().collect(),
        }
    }

    /// Generates a new unique label. The hint is only there to make listings readable.
    pub fn next_label(&mut self, hint: &str) -> Label {
        loop {
            let label = Label::new(format!(".L{}{}", hint, self.next));
            self.next += 1;
            if self.reserved.insert(label.clone()) {
                return label;
            }
        }
    }
}
