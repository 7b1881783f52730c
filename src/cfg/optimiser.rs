use std::collections::HashSet;

use crate::{
    il::{Instr, Label, Opcode, Operand, Temp},
    prelude::*,
};

use super::{BlockId, Cfg};

/// Simplify the control flow of a procedure until nothing changes. Returns the number of
/// rounds that were needed.
pub fn optimise(cfg: &mut Cfg) -> usize {
    let mut rounds = 0;
    loop {
        rounds += 1;
        let threaded = thread_jumps(cfg);
        let removed = remove_unreachable(cfg);
        let coalesced = coalesce(cfg);
        if !(threaded || removed || coalesced) {
            break;
        }
    }
    debug!(
        "Optimised CFG of @{} in {} rounds, {} blocks left",
        cfg.name,
        rounds,
        cfg.len()
    );
    rounds
}

/// Shorten jumps through empty blocks and resolve conditional jumps whose outcome is
/// already known.
fn thread_jumps(cfg: &mut Cfg) -> bool {
    let mut changed = false;
    for id in cfg.ids() {
        if !cfg.contains(id) {
            continue;
        }
        changed |= skip_empty_blocks(cfg, id);
        changed |= drop_redundant_condition(cfg, id);
        changed |= thread_condition(cfg, id);
    }
    changed
}

/// Point every jump in the block past chains of empty single-predecessor blocks.
fn skip_empty_blocks(cfg: &mut Cfg, id: BlockId) -> bool {
    let mut changed = false;
    for pos in 1..cfg.block(id).body.len() {
        let instr = &cfg.block(id).body[pos];
        let Some(target) = instr.jump_target() else {
            continue;
        };
        let end = chain_end(cfg, target);
        if &end != target {
            trace!("@{}: {} now jumps to {}", cfg.name, instr, end);
            let retargeted = instr.retarget(&end);
            cfg.block_mut(id).body[pos] = retargeted;
            changed = true;
        }
    }
    if changed {
        cfg.refresh_edges(id);
    }
    changed
}

/// Follow a label through blocks that consist of a single jump and have no other
/// predecessor.
fn chain_end(cfg: &Cfg, start: &Label) -> Label {
    let mut current = start.clone();
    let mut visited = HashSet::new();
    while let Some(id) = cfg.lookup(&current) {
        let block = cfg.block(id);
        if !block.is_empty_jump() || block.preds.len() != 1 || !visited.insert(id) {
            break;
        }
        match block.fall_through() {
            Some(next) => current = next.clone(),
            None => break,
        }
    }
    current
}

/// `jcc t, L; jmp L` is just `jmp L`.
fn drop_redundant_condition(cfg: &mut Cfg, id: BlockId) -> bool {
    let block = cfg.block(id);
    let redundant = match (block.conditional(), block.fall_through()) {
        (Some(cond), Some(fall_through)) => cond.jump_target() == Some(fall_through),
        _ => false,
    };
    if redundant {
        let block = cfg.block_mut(id);
        let len = block.body.len();
        block.body.remove(len - 2);
    }
    redundant
}

/// When a block's conditional jump leads to a block that only it can reach, and that block
/// repeats the same test on the same temporary, the outcome of the repeated test is known.
fn thread_condition(cfg: &mut Cfg, id: BlockId) -> bool {
    let block = cfg.block(id);
    let (Some(cond), Some(fall_through)) = (block.conditional(), block.fall_through()) else {
        return false;
    };
    let Some(Operand::Temp(tested)) = cond.tested() else {
        return false;
    };
    let (Some(taken), Some(not_taken)) = (
        cond.jump_target().and_then(|l| cfg.lookup(l)),
        cfg.lookup(fall_through),
    ) else {
        return false;
    };
    if taken == not_taken {
        return false;
    }
    let (opcode, tested) = (cond.opcode, *tested);

    let mut changed = false;
    if let Some(target) = repeated_test(cfg, id, taken, opcode, tested) {
        trace!("@{}: test in {} is always taken", cfg.name, cfg.block(taken).label);
        let body = &mut cfg.block_mut(taken).body;
        body.truncate(body.len() - 2);
        body.push(Instr::jmp(target));
        cfg.refresh_edges(taken);
        changed = true;
    }
    if repeated_test(cfg, id, not_taken, opcode, tested).is_some() {
        trace!("@{}: test in {} is never taken", cfg.name, cfg.block(not_taken).label);
        let body = &mut cfg.block_mut(not_taken).body;
        body.remove(body.len() - 2);
        cfg.refresh_edges(not_taken);
        changed = true;
    }
    changed
}

/// If `block` is reached only from `pred`, and ends by testing `tested` the same way
/// without writing it first, return the label that test jumps to.
fn repeated_test(
    cfg: &Cfg,
    pred: BlockId,
    block: BlockId,
    opcode: Opcode,
    tested: Temp,
) -> Option<Label> {
    if block == pred || block == cfg.entry() {
        return None;
    }
    let candidate = cfg.block(block);
    if candidate.preds.len() != 1 || !candidate.preds.contains(&pred) {
        return None;
    }
    let cond = candidate.conditional()?;
    if cond.opcode != opcode || cond.tested() != Some(&Operand::Temp(tested)) {
        return None;
    }
    let before = &candidate.body[1..candidate.body.len() - 2];
    if before.iter().any(|i| i.defines() == Some(tested)) {
        return None;
    }
    cond.jump_target().cloned()
}

/// Drop every block that cannot be reached from the entry.
fn remove_unreachable(cfg: &mut Cfg) -> bool {
    let mut reached = HashSet::new();
    let mut stack = vec![cfg.entry()];
    while let Some(id) = stack.pop() {
        if reached.insert(id) {
            stack.extend(cfg.block(id).succs.iter().copied());
        }
    }

    let unreachable: Vec<_> = cfg
        .ids()
        .into_iter()
        .filter(|id| !reached.contains(id))
        .collect();
    for &id in &unreachable {
        trace!("@{}: removing unreachable {}", cfg.name, cfg.block(id).label);
        cfg.remove_block(id);
    }
    !unreachable.is_empty()
}

/// Merge a block into its only successor when it is that successor's only predecessor.
fn coalesce(cfg: &mut Cfg) -> bool {
    let mut changed = false;
    for id in cfg.ids() {
        while cfg.contains(id) {
            let block = cfg.block(id);
            let Some(&next) = block.succs.iter().next().filter(|_| block.succs.len() == 1) else {
                break;
            };
            if next == id || next == cfg.entry() || cfg.block(next).preds.len() != 1 {
                break;
            }

            trace!(
                "@{}: merging {} into {}",
                cfg.name,
                cfg.block(next).label,
                block.label
            );
            let tail = cfg.block(next).instructions().to_vec();
            cfg.remove_block(next);
            let body = &mut cfg.block_mut(id).body;
            while body.last().map_or(false, |i| i.opcode.is_jump()) {
                body.pop();
            }
            body.extend(tail);
            cfg.refresh_edges(id);
            changed = true;
        }
    }
    changed
}

#[cfg(test)]
mod tests {
    use crate::{
        ast::{build::*, typed::*},
        cfg::{build, linearize},
        il::{self, interpreter, record, Munch},
    };

    use super::*;

    fn lines(cfg: &Cfg) -> Vec<String> {
        cfg.to_string().lines().map(|l| l.trim().to_string()).collect()
    }

    #[test]
    fn loop_that_never_runs_loses_its_body() {
        let program = main_program(vec![
            while_loop(boolean(false), vec![print(int(1))]),
            print(int(2)),
        ]);
        let tac = il::generate(&program, Munch::BottomUp).unwrap();
        let mut cfg = build(&tac.procedures[0]).unwrap();
        assert_eq!(3, cfg.len());

        optimise(&mut cfg);

        assert_eq!(vec![".L0:", "%1 = const 2", "print %1", "ret"], lines(&cfg));
        assert!(cfg.edges_are_symmetric());
    }

    const REPEATED_TEST: &str = r#"[{"proc": "@main", "args": ["%0"], "body": [
        {"opcode": "label", "args": [".L0"], "result": null},
        {"opcode": "jz", "args": ["%0", ".L1"], "result": null},
        {"opcode": "jmp", "args": [".L2"], "result": null},
        {"opcode": "label", "args": [".L1"], "result": null},
        {"opcode": "print", "args": ["%0"], "result": null},
        {"opcode": "jz", "args": ["%0", ".L3"], "result": null},
        {"opcode": "jmp", "args": [".L4"], "result": null},
        {"opcode": "label", "args": [".L2"], "result": null},
        {"opcode": "jz", "args": ["%0", ".L3"], "result": null},
        {"opcode": "jmp", "args": [".L4"], "result": null},
        {"opcode": "label", "args": [".L3"], "result": null},
        {"opcode": "ret", "args": ["%0"], "result": null},
        {"opcode": "label", "args": [".L4"], "result": null},
        {"opcode": "const", "args": [7], "result": "%1"},
        {"opcode": "ret", "args": ["%1"], "result": null}
    ]}]"#;

    #[test]
    fn repeated_tests_are_resolved() {
        let tac = record::from_json(REPEATED_TEST).unwrap();
        let mut cfg = build(&tac.procedures[0]).unwrap();

        optimise(&mut cfg);

        assert_eq!(
            vec![
                ".L0:",
                "jz %0, .L1",
                "jmp .L2",
                ".L1:",
                "print %0",
                "ret %0",
                ".L2:",
                "%1 = const 7",
                "ret %1",
            ],
            lines(&cfg)
        );
        assert!(cfg.edges_are_symmetric());
    }

    #[test]
    fn test_is_kept_when_the_temporary_changes() {
        let json = REPEATED_TEST.replace(
            r#"{"opcode": "print", "args": ["%0"], "result": null}"#,
            r#"{"opcode": "const", "args": [5], "result": "%0"}"#,
        );
        let tac = record::from_json(&json).unwrap();
        let mut cfg = build(&tac.procedures[0]).unwrap();

        optimise(&mut cfg);

        assert!(lines(&cfg).contains(&"jz %0, .L3".to_string()));
    }

    #[test]
    fn optimising_again_changes_nothing() {
        let tac = record::from_json(REPEATED_TEST).unwrap();
        let mut cfg = build(&tac.procedures[0]).unwrap();
        optimise(&mut cfg);
        let once = cfg.to_string();

        assert_eq!(1, optimise(&mut cfg));
        assert_eq!(once, cfg.to_string());
    }

    #[test]
    fn optimised_code_behaves_the_same() {
        let program = main_program(vec![
            decl("i", int(0)),
            decl("sum", int(0)),
            while_loop(
                bin(BinOp::Less, var("i"), int(10)),
                vec![
                    assign("i", bin(BinOp::Add, var("i"), int(1))),
                    if_else(
                        bin(
                            BinOp::And,
                            bin(BinOp::Equal, bin(BinOp::Modulus, var("i"), int(2)), int(0)),
                            not(bin(BinOp::Greater, var("i"), int(6))),
                        ),
                        vec![Stmt::Continue],
                        vec![assign("sum", bin(BinOp::Add, var("sum"), var("i")))],
                    ),
                ],
            ),
            print(var("sum")),
        ]);
        let mut tac = il::generate(&program, Munch::TopDown).unwrap();
        let before = interpreter::execute(&tac, "main").unwrap();

        let mut cfg = build(&tac.procedures[0]).unwrap();
        optimise(&mut cfg);
        tac.procedures[0] = linearize(&cfg);
        let after = interpreter::execute(&tac, "main").unwrap();

        assert_eq!(vec!["43"], after.output);
        assert_eq!(before, after);
    }
}
