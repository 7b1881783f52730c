use std::collections::HashMap;

use crate::{
    cfg::Cfg,
    il::{Opcode, Operand, Temp},
    prelude::*,
};

/// Replace every temporary that is a copy of another temporary with the original, and
/// delete the copies. The graph must be in SSA form. Copies to or from globals stay.
pub fn propagate_copies(cfg: &mut Cfg) -> usize {
    let mut copies = HashMap::new();
    for (_, block) in cfg.blocks() {
        for instr in &block.body {
            if let (Opcode::Copy, Some(Operand::Temp(source)), Some(dest)) =
                (instr.opcode, instr.args.first(), instr.defines())
            {
                copies.insert(dest, *source);
            }
        }
    }
    if copies.is_empty() {
        return 0;
    }

    let original = |mut temp: Temp| {
        // Chains are finite in SSA form; the bound guards against malformed input.
        for _ in 0..copies.len() {
            match copies.get(&temp) {
                Some(&source) => temp = source,
                None => break,
            }
        }
        temp
    };

    for id in cfg.ids() {
        let body = cfg
            .block(id)
            .body
            .iter()
            .filter(|i| {
                let propagated = i.defines().map_or(false, |d| copies.contains_key(&d));
                !(i.opcode == Opcode::Copy && propagated)
            })
            .map(|i| i.map_uses(|t| original(t).into()))
            .collect();
        cfg.block_mut(id).body = body;
    }

    debug!("Propagated {} copies in @{}", copies.len(), cfg.name);
    copies.len()
}

#[cfg(test)]
mod tests {
    use crate::{cfg, dataflow::ssa, il::record};

    use super::*;

    #[test]
    fn copies_are_replaced_by_their_source() {
        let tac = record::from_json(
            r#"[{"var": "@g", "init": 0},
                {"proc": "@main", "args": ["%0"], "body": [
                {"opcode": "copy", "args": ["%0"], "result": "%1"},
                {"opcode": "copy", "args": ["%1"], "result": "%2"},
                {"opcode": "jz", "args": ["%2", ".L1"], "result": null},
                {"opcode": "copy", "args": ["%2"], "result": "@g"},
                {"opcode": "label", "args": [".L1"], "result": null},
                {"opcode": "copy", "args": ["@g"], "result": "%3"},
                {"opcode": "add", "args": ["%3", "%1"], "result": "%4"},
                {"opcode": "ret", "args": ["%4"], "result": null}
            ]}]"#,
        )
        .unwrap();
        let mut cfg = cfg::build(&tac.procedures[0]).unwrap();
        ssa::construct(&mut cfg);

        assert_eq!(2, propagate_copies(&mut cfg));

        let lines: Vec<_> = cfg.to_string().lines().map(|l| l.trim().to_string()).collect();
        assert_eq!(
            vec![
                ".Lentry0:",
                "jz %0, .L1",
                "jmp .Lsyn1",
                ".Lsyn1:",
                "@g = copy %0",
                "jmp .L1",
                ".L1:",
                "%1.2 = phi(.Lentry0: %0, .Lsyn1: %0)",
                "%3.1 = copy @g",
                "%4.1 = add %3.1, %1.2",
                "ret %4.1",
            ],
            lines
        );
    }
}
