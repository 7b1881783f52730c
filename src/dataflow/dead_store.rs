use std::collections::HashSet;

use crate::{
    cfg::Cfg,
    il::{Instr, Temp},
    prelude::*,
};

use super::Liveness;

/// Delete instructions whose result is never read, until there are none left. Returns the
/// number of instructions deleted.
///
/// Instructions that can trap or have effects beyond their result (`div`, `mod`, `call`)
/// are kept, as is anything that reads or writes a global.
pub fn eliminate_dead_stores(cfg: &mut Cfg) -> usize {
    let mut removed = 0;
    loop {
        let liveness = Liveness::analyse(cfg);
        let mut round = 0;
        for id in cfg.ids() {
            let live_after = liveness.live_after(cfg, id);
            let block = cfg.block(id);
            let kept: Vec<_> = block
                .body
                .iter()
                .zip(&live_after)
                .filter(|(instr, live)| !is_dead(instr, live))
                .map(|(instr, _)| instr.clone())
                .collect();
            round += block.body.len() - kept.len();
            cfg.block_mut(id).body = kept;
        }
        if round == 0 {
            break;
        }
        removed += round;
    }
    debug!("Removed {} dead stores from @{}", removed, cfg.name);
    removed
}

fn is_dead(instr: &Instr, live_after: &HashSet<Temp>) -> bool {
    match instr.defines() {
        Some(def) => {
            !live_after.contains(&def) && !instr.opcode.has_side_effect() && !instr.touches_global()
        }
        None => false,
    }
}
