use std::collections::{HashMap, HashSet};

use crate::{
    cfg::{BasicBlock, BlockId, Cfg},
    il::{Opcode, Temp},
};

/// The temporaries live on entry to and exit from every block.
#[derive(Debug, Default)]
pub struct Liveness {
    live_in: HashMap<BlockId, HashSet<Temp>>,
    live_out: HashMap<BlockId, HashSet<Temp>>,
}
impl Liveness {
    /// Solve the liveness equations for a graph. A phi argument is only live out of the
    /// predecessor it comes from, never into the phi's own block.
    pub fn analyse(cfg: &Cfg) -> Self {
        let mut liveness = Self::default();
        let mut ids = cfg.ids();
        ids.reverse();

        let mut changed = true;
        while changed {
            changed = false;
            for &id in &ids {
                let block = cfg.block(id);
                let mut live_out = HashSet::new();
                for &succ in &block.succs {
                    let succ_block = cfg.block(succ);
                    live_out.extend(liveness.live_in(succ));
                    live_out.extend(phi_uses_from(succ_block, block));
                }

                let live_in = transfer(block, &live_out);
                if liveness.live_out.get(&id) != Some(&live_out)
                    || liveness.live_in.get(&id) != Some(&live_in)
                {
                    liveness.live_out.insert(id, live_out);
                    liveness.live_in.insert(id, live_in);
                    changed = true;
                }
            }
        }
        liveness
    }

    pub fn live_in(&self, id: BlockId) -> HashSet<Temp> {
        self.live_in.get(&id).cloned().unwrap_or_default()
    }

    pub fn live_out(&self, id: BlockId) -> HashSet<Temp> {
        self.live_out.get(&id).cloned().unwrap_or_default()
    }

    /// For each instruction of the block, the temporaries live right after it.
    pub fn live_after(&self, cfg: &Cfg, id: BlockId) -> Vec<HashSet<Temp>> {
        let block = cfg.block(id);
        let mut live = self.live_out(id);
        let mut after = vec![HashSet::new(); block.body.len()];
        for (pos, instr) in block.body.iter().enumerate().rev() {
            after[pos] = live.clone();
            if let Some(def) = instr.defines() {
                live.remove(&def);
            }
            if instr.opcode != Opcode::Phi {
                live.extend(instr.uses());
            }
        }
        after
    }
}

/// The values the phis of `succ` take when entered from `pred`.
fn phi_uses_from<'a>(
    succ: &'a BasicBlock,
    pred: &'a BasicBlock,
) -> impl Iterator<Item = Temp> + 'a {
    succ.body
        .iter()
        .flat_map(|instr| instr.phi_incoming())
        .filter(move |(label, _)| **label == pred.label)
        .filter_map(|(_, value)| value.as_temp().copied())
}

/// `live_in = (live_out - defs) + uses`, walking the block backwards.
fn transfer(block: &BasicBlock, live_out: &HashSet<Temp>) -> HashSet<Temp> {
    let mut live = live_out.clone();
    for instr in block.body.iter().rev() {
        if let Some(def) = instr.defines() {
            live.remove(&def);
        }
        if instr.opcode != Opcode::Phi {
            live.extend(instr.uses());
        }
    }
    live
}
