use crate::{
    cfg::{BasicBlock, BlockId, Cfg},
    il::{Instr, Operand, Temp},
    prelude::*,
};

/// Leave SSA form: every phi becomes a copy at the end of each predecessor. Edges out of
/// blocks that end in a conditional jump are split first, so that the copies only run on
/// the edge they belong to.
pub fn destruct(cfg: &mut Cfg) {
    let mut next_temp = cfg.next_free_temp();
    let mut lowered = 0;

    for id in cfg.ids() {
        let phi_end = cfg.block(id).phi_end();
        if phi_end == 1 {
            continue;
        }
        let phis: Vec<_> = cfg.block_mut(id).body.drain(1..phi_end).collect();
        lowered += phis.len();

        let preds: Vec<_> = cfg.block(id).preds.iter().copied().collect();
        for pred in preds {
            let pred_label = cfg.block(pred).label.clone();
            let moves: Vec<_> = phis
                .iter()
                .filter_map(|phi| {
                    let (_, value) = phi.phi_incoming().find(|(l, _)| **l == pred_label)?;
                    Some((phi.defines()?, value.clone()))
                })
                .collect();

            let from = match cfg.block(pred).conditional() {
                Some(_) => split_edge(cfg, pred, id),
                None => pred,
            };
            let copies = sequentialise(moves, &mut next_temp);
            let body = &mut cfg.block_mut(from).body;
            let at = body.len() - 1;
            body.splice(at..at, copies);
        }
    }

    debug!("Lowered {} phis in @{}", lowered, cfg.name);
}

/// Put a new block on the edge `from -> to`.
fn split_edge(cfg: &mut Cfg, from: BlockId, to: BlockId) -> BlockId {
    let target = cfg.block(to).label.clone();
    let label = cfg.fresh_label("split");

    let mut block = BasicBlock::new(label.clone());
    block.body.push(Instr::jmp(target.clone()));
    let split = cfg.add_block(block);

    for instr in cfg.block_mut(from).body.iter_mut() {
        if instr.jump_target() == Some(&target) {
            *instr = instr.retarget(&label);
        }
    }
    cfg.refresh_edges(from);
    cfg.refresh_edges(split);
    split
}

/// Copies that perform all `(target, value)` assignments as if at once. With more than one
/// assignment, every value is saved to a fresh temporary before any target is written.
fn sequentialise(moves: Vec<(Temp, Operand)>, next_temp: &mut u32) -> Vec<Instr> {
    let moves: Vec<_> = moves
        .into_iter()
        .filter(|(target, value)| value.as_temp() != Some(target))
        .collect();
    if moves.len() < 2 {
        return moves
            .into_iter()
            .map(|(target, value)| Instr::copy(value, target.into()))
            .collect();
    }

    let mut saves = vec![];
    let mut restores = vec![];
    for (target, value) in moves {
        let saved = Temp::new(*next_temp);
        *next_temp += 1;
        saves.push(Instr::copy(value, saved.into()));
        restores.push(Instr::copy(saved.into(), target.into()));
    }
    saves.extend(restores);
    saves
}

#[cfg(test)]
mod tests {
    use crate::{cfg, il::record};

    use super::*;

    fn lines(cfg: &Cfg) -> Vec<String> {
        cfg.to_string().lines().map(|l| l.trim().to_string()).collect()
    }

    #[test]
    fn swapping_phis_copy_through_fresh_temporaries() {
        let tac = record::from_json(
            r#"[{"proc": "@main", "args": ["%0", "%1"], "body": [
                {"opcode": "label", "args": [".L0"], "result": null},
                {"opcode": "jz", "args": ["%0", ".L2"], "result": null},
                {"opcode": "jmp", "args": [".L1"], "result": null},
                {"opcode": "label", "args": [".L1"], "result": null},
                {"opcode": "jmp", "args": [".L2"], "result": null},
                {"opcode": "label", "args": [".L2"], "result": null},
                {"opcode": "phi", "args": [".L0", "%0", ".L1", "%1"], "result": "%2"},
                {"opcode": "phi", "args": [".L0", "%1", ".L1", "%0"], "result": "%3"},
                {"opcode": "sub", "args": ["%2", "%3"], "result": "%4"},
                {"opcode": "ret", "args": ["%4"], "result": null}
            ]}]"#,
        )
        .unwrap();
        let mut cfg = cfg::build(&tac.procedures[0]).unwrap();

        destruct(&mut cfg);

        assert_eq!(
            vec![
                ".L0:",
                "jz %0, .Lsplit0",
                "jmp .L1",
                ".L1:",
                "%7 = copy %1",
                "%8 = copy %0",
                "%2 = copy %7",
                "%3 = copy %8",
                "jmp .L2",
                ".L2:",
                "%4 = sub %2, %3",
                "ret %4",
                ".Lsplit0:",
                "%5 = copy %0",
                "%6 = copy %1",
                "%2 = copy %5",
                "%3 = copy %6",
                "jmp .L2",
            ],
            lines(&cfg)
        );
        assert!(cfg.edges_are_symmetric());
    }

    #[test]
    fn single_phi_copies_directly() {
        let tac = record::from_json(
            r#"[{"proc": "@main", "args": ["%0"], "body": [
                {"opcode": "label", "args": [".L0"], "result": null},
                {"opcode": "jmp", "args": [".L1"], "result": null},
                {"opcode": "label", "args": [".L1"], "result": null},
                {"opcode": "phi", "args": [".L0", "%0", ".L1", "%2"], "result": "%1"},
                {"opcode": "add", "args": ["%1", "%1"], "result": "%2"},
                {"opcode": "jmp", "args": [".L1"], "result": null}
            ]}]"#,
        )
        .unwrap();
        let mut cfg = cfg::build(&tac.procedures[0]).unwrap();

        destruct(&mut cfg);

        assert_eq!(
            vec![
                ".L0:",
                "%1 = copy %0",
                "jmp .L1",
                ".L1:",
                "%2 = add %1, %1",
                "%1 = copy %2",
                "jmp .L1",
            ],
            lines(&cfg)
        );
    }
}
