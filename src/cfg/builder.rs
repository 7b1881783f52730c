use std::collections::HashSet;

use crate::{
    error::{malformed, Malformed},
    il::{Instr, LabelGenerator, Opcode, TacProcedure},
    prelude::*,
};

use super::{BasicBlock, Cfg};

/// Build the control-flow graph of a procedure.
///
/// The instruction stream is normalised first, so that every block starts with a label
/// and ends with `ret`, `jmp L`, or a conditional jump followed by the `jmp` naming its
/// fall-through.
pub fn build(procedure: &TacProcedure) -> CompileResult<Cfg> {
    let existing = procedure
        .body
        .iter_instructions()
        .filter_map(Instr::defined_label)
        .cloned();
    let mut labels = LabelGenerator::avoiding(existing);

    let instrs = normalise(procedure.body.as_slice(), &mut labels);
    let mut cfg = Cfg::new(procedure.name.clone(), procedure.params.clone(), labels);

    let mut seen = HashSet::new();
    let mut current: Option<BasicBlock> = None;
    for instr in instrs {
        if let Some(label) = instr.defined_label() {
            if !seen.insert(label.clone()) {
                return malformed(Malformed::DuplicateDeclaration(format!(
                    "{} in @{}",
                    label, procedure.name
                )));
            }
            current = Some(BasicBlock::new(label.clone()));
            continue;
        }
        // Normalisation puts a label after every block end.
        let Some(block) = current.as_mut() else { continue };
        let closes = instr.opcode.ends_block();
        block.body.push(instr);
        if closes {
            if let Some(block) = current.take() {
                cfg.add_block(block);
            }
        }
    }

    let jumps: Vec<_> = cfg
        .blocks()
        .flat_map(|(id, block)| block.jump_targets().map(move |t| (id, t.clone())))
        .collect();
    for (id, target) in jumps {
        match cfg.lookup(&target) {
            Some(target) => cfg.add_edge(id, target),
            None => {
                return malformed(Malformed::UndefinedLabel(
                    target.to_string(),
                    format!("@{}", procedure.name),
                ))
            }
        }
    }

    debug!("Built CFG for @{} with {} blocks", cfg.name, cfg.len());
    Ok(cfg)
}

/// Rewrite an instruction stream so that block boundaries are explicit.
fn normalise(body: &[Instr], labels: &mut LabelGenerator) -> Vec<Instr> {
    let mut out = Vec::with_capacity(body.len() + 2);

    if !body.first().map_or(false, Instr::is_label) {
        out.push(Instr::label(labels.next_label("entry")));
    }

    for (index, instr) in body.iter().enumerate() {
        if let Some(label) = instr.defined_label() {
            if !out.last().map_or(true, |i: &Instr| i.opcode.ends_block()) {
                out.push(Instr::jmp(label.clone()));
            }
            out.push(instr.clone());
            continue;
        }
        out.push(instr.clone());

        let next = body.get(index + 1);
        let next_is_label = next.map_or(false, Instr::is_label);
        let next_is_jmp = next.map_or(false, |n| n.opcode == Opcode::Jmp);
        if instr.opcode.is_conditional_jump() && !next_is_jmp && !next_is_label {
            let fall_through = labels.next_label("syn");
            out.push(Instr::jmp(fall_through.clone()));
            out.push(Instr::label(fall_through));
        } else if instr.opcode.ends_block() && next.is_some() && !next_is_label {
            out.push(Instr::label(labels.next_label("syn")));
        }
    }

    if !out.last().map_or(false, |i| i.opcode.ends_block()) {
        out.push(Instr::ret(None));
    }
    out
}
