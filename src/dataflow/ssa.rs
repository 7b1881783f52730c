use std::collections::HashMap;

use crate::{
    cfg::{BasicBlock, BlockId, Cfg},
    il::{Instr, Opcode, Operand, Temp},
    prelude::*,
};

use super::Liveness;

/// The name each variable has at a point. A variable that was never written keeps its
/// own name.
type Versions = HashMap<Temp, Temp>;

/// Convert a procedure to single-assignment form. Every block with more than one
/// predecessor gets a phi for each temporary live into it, and every definition writes a
/// fresh version.
pub fn construct(cfg: &mut Cfg) {
    split_entry(cfg);
    let phis = insert_phis(cfg);
    rename(cfg);
    debug!("Converted @{} to SSA form with {} phis", cfg.name, phis);
}

/// Make sure nothing jumps to the entry block, so that it has no phis.
fn split_entry(cfg: &mut Cfg) {
    let entry = cfg.entry();
    if cfg.block(entry).preds.is_empty() {
        return;
    }
    let target = cfg.block(entry).label.clone();
    let mut block = BasicBlock::new(cfg.fresh_label("entry"));
    block.body.push(Instr::jmp(target));
    let id = cfg.add_block(block);
    cfg.refresh_edges(id);
    cfg.set_entry(id);
}

fn insert_phis(cfg: &mut Cfg) -> usize {
    let liveness = Liveness::analyse(cfg);
    let mut inserted = 0;
    for id in cfg.ids() {
        let block = cfg.block(id);
        if block.preds.len() < 2 {
            continue;
        }
        let preds: Vec<_> = block
            .preds
            .iter()
            .map(|p| cfg.block(*p).label.clone())
            .collect();
        let mut live: Vec<_> = liveness.live_in(id).into_iter().collect();
        live.sort();

        let phis: Vec<_> = live
            .into_iter()
            .map(|t| Instr::phi(t, preds.iter().map(|l| (l.clone(), t.into()))))
            .collect();
        inserted += phis.len();
        cfg.block_mut(id).body.splice(1..1, phis);
    }
    inserted
}

fn rename(cfg: &mut Cfg) {
    let mut order = cfg.preorder();
    let unreached: Vec<_> = cfg
        .ids()
        .into_iter()
        .filter(|id| !order.contains(id))
        .collect();
    order.extend(unreached);

    // Versioned input (already optimised code) may hold several variables per id. New
    // versions are numbered above every existing one so that none of them is reused.
    let mut counters = highest_versions(cfg);
    let mut exits: HashMap<BlockId, Versions> = HashMap::new();
    for id in order {
        let block = cfg.block(id);
        let mut current = match (block.preds.len(), block.preds.iter().next()) {
            (1, Some(pred)) => exits.get(pred).cloned().unwrap_or_default(),
            _ => Versions::new(),
        };

        let mut body = Vec::with_capacity(block.body.len());
        for instr in &block.body {
            let renamed = match instr.opcode {
                // Phi arguments are filled in once every predecessor is done.
                Opcode::Phi => instr.clone(),
                _ => instr.map_uses(|t| reaching(&current, t).into()),
            };
            let renamed = match renamed.defines() {
                Some(def) => {
                    let version = counters.entry(def.id).or_insert(0);
                    *version += 1;
                    let name = Temp::versioned(def.id, *version);
                    current.insert(def, name);
                    renamed.with_result(name.into())
                }
                None => renamed,
            };
            body.push(renamed);
        }

        cfg.block_mut(id).body = body;
        exits.insert(id, current);
    }

    for id in cfg.ids() {
        for pos in 1..cfg.block(id).phi_end() {
            let phi = &cfg.block(id).body[pos];
            let target = phi.defines();
            let incoming: Vec<_> = phi
                .phi_incoming()
                .map(|(label, value)| {
                    let exit = cfg.lookup(label).and_then(|p| exits.get(&p));
                    let value = match (value, exit) {
                        (Operand::Temp(t), Some(exit)) => reaching(exit, *t).into(),
                        (Operand::Temp(t), None) => (*t).into(),
                        (other, _) => other.clone(),
                    };
                    (label.clone(), value)
                })
                .collect();
            if let Some(target) = target {
                cfg.block_mut(id).body[pos] = Instr::phi(target, incoming);
            }
        }
    }
}

fn reaching(versions: &Versions, temp: Temp) -> Temp {
    versions.get(&temp).copied().unwrap_or(temp)
}

fn highest_versions(cfg: &Cfg) -> HashMap<u32, u32> {
    let mut highest: HashMap<u32, u32> = HashMap::new();
    let temps = cfg
        .blocks()
        .flat_map(|(_, b)| b.body.iter())
        .flat_map(|i| i.uses().chain(i.defines()))
        .chain(cfg.params.iter().copied());
    for temp in temps {
        let version = highest.entry(temp.id).or_insert(0);
        *version = (*version).max(temp.version);
    }
    highest
}

#[cfg(test)]
mod tests {
    use crate::{
        ast::{build::*, typed::*},
        cfg,
        il::{self, record, Munch},
    };

    use super::*;

    fn lines(cfg: &Cfg) -> Vec<String> {
        cfg.to_string().lines().map(|l| l.trim().to_string()).collect()
    }

    #[test]
    fn loop_variable_gets_a_phi_at_the_head() {
        let program = main_program(vec![
            decl("x", int(0)),
            while_loop(
                bin(BinOp::Less, var("x"), int(3)),
                vec![assign("x", bin(BinOp::Add, var("x"), int(1)))],
            ),
            print(var("x")),
        ]);
        let tac = il::generate(&program, Munch::BottomUp).unwrap();
        let mut cfg = cfg::build(&tac.procedures[0]).unwrap();

        construct(&mut cfg);

        assert_eq!(
            vec![
                ".Lentry0:",
                "%0.1 = const 0",
                "jmp .L0",
                ".L0:",
                "%0.2 = phi(.Lentry0: %0.1, .L1: %0.3)",
                "%1.1 = const 3",
                "%2.1 = sub %0.2, %1.1",
                "jl %2.1, .L1",
                "jmp .L2",
                ".L1:",
                "%3.1 = const 1",
                "%0.3 = add %0.2, %3.1",
                "jmp .L0",
                ".L2:",
                "print %0.2",
                "ret",
            ],
            lines(&cfg)
        );
    }

    #[test]
    fn versions_of_one_id_stay_separate_variables() {
        let tac = record::from_json(
            r#"[{"proc": "@main", "args": [], "body": [
                {"opcode": "const", "args": [1], "result": "%0.1"},
                {"opcode": "const", "args": [2], "result": "%0.2"},
                {"opcode": "print", "args": ["%0.1"], "result": null},
                {"opcode": "print", "args": ["%0.2"], "result": null}
            ]}]"#,
        )
        .unwrap();
        let mut cfg = cfg::build(&tac.procedures[0]).unwrap();

        construct(&mut cfg);

        assert_eq!(
            vec![
                ".Lentry0:",
                "%0.3 = const 1",
                "%0.4 = const 2",
                "print %0.3",
                "print %0.4",
                "ret",
            ],
            lines(&cfg)
        );
    }

    #[test]
    fn entry_with_predecessors_is_split() {
        let tac = record::from_json(
            r#"[{"proc": "@main", "args": ["%0"], "body": [
                {"opcode": "label", "args": [".L0"], "result": null},
                {"opcode": "jz", "args": ["%0", ".L1"], "result": null},
                {"opcode": "jmp", "args": [".L0"], "result": null},
                {"opcode": "label", "args": [".L1"], "result": null},
                {"opcode": "ret", "args": ["%0"], "result": null}
            ]}]"#,
        )
        .unwrap();
        let mut cfg = cfg::build(&tac.procedures[0]).unwrap();

        construct(&mut cfg);

        let entry = cfg.block(cfg.entry());
        assert_eq!(".Lentry0", entry.label.name());
        assert!(entry.preds.is_empty());
        assert!(cfg.edges_are_symmetric());
        assert!(lines(&cfg).contains(&"%0.1 = phi(.L0: %0.1, .Lentry0: %0)".to_string()));
        assert!(lines(&cfg).contains(&"ret %0.1".to_string()));
    }
}
