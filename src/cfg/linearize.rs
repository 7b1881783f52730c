use std::collections::HashSet;

use crate::il::{Instr, Opcode, TacProcedure};

use super::{BlockId, Cfg};

/// Flatten a graph back into an instruction stream. Blocks are laid out in depth-first
/// order from the entry, preferring each block's fall-through successor, and jumps to the
/// label that immediately follows are removed.
pub fn linearize(cfg: &Cfg) -> TacProcedure {
    let body: Vec<_> = layout(cfg)
        .into_iter()
        .flat_map(|id| cfg.block(id).body.iter().cloned())
        .collect();

    let body = body
        .iter()
        .enumerate()
        .filter(|(index, instr)| !jumps_to_next(instr, body.get(index + 1)))
        .map(|(_, instr)| instr.clone())
        .collect();

    TacProcedure::new(cfg.name.clone(), cfg.params.clone(), body)
}

fn jumps_to_next(instr: &Instr, next: Option<&Instr>) -> bool {
    instr.opcode == Opcode::Jmp && instr.jump_target().is_some()
        && instr.jump_target() == next.and_then(Instr::defined_label)
}

/// Block order: depth-first preorder from the entry, then any block that could not be
/// reached in the order it was created.
fn layout(cfg: &Cfg) -> Vec<BlockId> {
    let mut order = vec![];
    let mut visited = HashSet::new();
    let mut stack = vec![cfg.entry()];

    while let Some(id) = stack.pop() {
        if !visited.insert(id) {
            continue;
        }
        order.push(id);
        let block = cfg.block(id);
        // The fall-through goes on top so that it is placed next.
        let jumped_to = block
            .conditional()
            .and_then(Instr::jump_target)
            .and_then(|l| cfg.lookup(l));
        let fall_through = block.fall_through().and_then(|l| cfg.lookup(l));
        stack.extend(jumped_to.into_iter().chain(fall_through));
    }

    order.extend(cfg.ids().into_iter().filter(|id| !visited.contains(id)));
    order
}
