use std::{
    collections::{BTreeSet, HashMap, HashSet},
    fmt::{self, Display, Formatter},
};

use crate::il::{Instr, Label, LabelGenerator, Opcode, Temp};

/// Index of a block in the [`Cfg`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockId(pub usize);

/// A maximal straight-line run of instructions. The first instruction is always the
/// marker for `label`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicBlock {
    pub label: Label,
    pub body: Vec<Instr>,
    pub preds: BTreeSet<BlockId>,
    pub succs: BTreeSet<BlockId>,
}
impl BasicBlock {
    pub fn new(label: Label) -> Self {
        Self {
            body: vec![Instr::label(label.clone())],
            label,
            preds: BTreeSet::new(),
            succs: BTreeSet::new(),
        }
    }

    /// The instructions after the label marker.
    pub fn instructions(&self) -> &[Instr] {
        &self.body[1..]
    }

    /// The target of the closing `jmp`.
    pub fn fall_through(&self) -> Option<&Label> {
        self.body
            .last()
            .filter(|i| i.opcode == Opcode::Jmp)
            .and_then(Instr::jump_target)
    }

    /// The conditional jump right before the closing `jmp`, if there is one.
    pub fn conditional(&self) -> Option<&Instr> {
        match self.body.len() {
            len if len >= 3 => Some(&self.body[len - 2]).filter(|i| i.opcode.is_conditional_jump()),
            _ => None,
        }
    }

    /// Whether the block does nothing but jump elsewhere.
    pub fn is_empty_jump(&self) -> bool {
        self.body.len() == 2 && self.fall_through().is_some()
    }

    /// Labels of all blocks this block may jump to.
    pub fn jump_targets(&self) -> impl Iterator<Item = &Label> {
        self.body.iter().filter_map(Instr::jump_target)
    }

    /// Position of the first instruction that is not a phi.
    pub fn phi_end(&self) -> usize {
        1 + self
            .instructions()
            .iter()
            .take_while(|i| i.opcode == Opcode::Phi)
            .count()
    }
}

/// The control-flow graph of a single procedure. Blocks live in an arena and refer to
/// each other by id; removed blocks leave a hole so that ids stay stable.
#[derive(Debug, Clone)]
pub struct Cfg {
    pub name: String,
    pub params: Vec<Temp>,
    entry: BlockId,
    blocks: Vec<Option<BasicBlock>>,
    by_label: HashMap<Label, BlockId>,
    labels: LabelGenerator,
}
impl Cfg {
    pub(super) fn new(name: String, params: Vec<Temp>, labels: LabelGenerator) -> Self {
        Self {
            name,
            params,
            entry: BlockId(0),
            blocks: vec![],
            by_label: HashMap::new(),
            labels,
        }
    }

    pub fn entry(&self) -> BlockId {
        self.entry
    }

    pub fn set_entry(&mut self, id: BlockId) {
        self.entry = id;
    }

    /// Ids of all blocks, in the order they were added.
    pub fn ids(&self) -> Vec<BlockId> {
        self.blocks
            .iter()
            .enumerate()
            .filter(|(_, b)| b.is_some())
            .map(|(i, _)| BlockId(i))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.blocks.iter().flatten().count()
    }

    pub fn contains(&self, id: BlockId) -> bool {
        matches!(self.blocks.get(id.0), Some(Some(_)))
    }

    /// # Panics
    /// Panics if the block was removed.
    pub fn block(&self, id: BlockId) -> &BasicBlock {
        self.blocks[id.0].as_ref().expect("block was removed")
    }

    /// # Panics
    /// Panics if the block was removed.
    pub fn block_mut(&mut self, id: BlockId) -> &mut BasicBlock {
        self.blocks[id.0].as_mut().expect("block was removed")
    }

    pub fn blocks(&self) -> impl Iterator<Item = (BlockId, &BasicBlock)> {
        self.blocks
            .iter()
            .enumerate()
            .filter_map(|(i, b)| b.as_ref().map(|b| (BlockId(i), b)))
    }

    /// Blocks reachable from the entry, in depth-first preorder. Every block comes after at
    /// least one of its predecessors.
    pub fn preorder(&self) -> Vec<BlockId> {
        let mut order = vec![];
        let mut visited = HashSet::new();
        let mut stack = vec![self.entry];
        while let Some(id) = stack.pop() {
            if visited.insert(id) {
                order.push(id);
                stack.extend(self.block(id).succs.iter().rev().copied());
            }
        }
        order
    }

    pub fn lookup(&self, label: &Label) -> Option<BlockId> {
        self.by_label.get(label).copied()
    }

    /// A label not used anywhere in the procedure.
    pub fn fresh_label(&mut self, hint: &str) -> Label {
        self.labels.next_label(hint)
    }

    /// Add a block without any edges.
    pub fn add_block(&mut self, block: BasicBlock) -> BlockId {
        let id = BlockId(self.blocks.len());
        self.by_label.insert(block.label.clone(), id);
        self.blocks.push(Some(block));
        id
    }

    /// Remove a block along with all edges touching it.
    pub fn remove_block(&mut self, id: BlockId) {
        if let Some(block) = self.blocks[id.0].take() {
            for succ in &block.succs {
                if let Some(Some(succ)) = self.blocks.get_mut(succ.0) {
                    succ.preds.remove(&id);
                }
            }
            for pred in &block.preds {
                if let Some(Some(pred)) = self.blocks.get_mut(pred.0) {
                    pred.succs.remove(&id);
                }
            }
            self.by_label.remove(&block.label);
        }
    }

    pub fn add_edge(&mut self, from: BlockId, to: BlockId) {
        self.block_mut(from).succs.insert(to);
        self.block_mut(to).preds.insert(from);
    }

    /// Recompute the outgoing edges of a block from the jumps in its body. Targets must
    /// name blocks in this graph.
    pub fn refresh_edges(&mut self, id: BlockId) {
        let old = std::mem::take(&mut self.block_mut(id).succs);
        for succ in old {
            self.block_mut(succ).preds.remove(&id);
        }
        let targets: Vec<_> = self
            .block(id)
            .jump_targets()
            .filter_map(|l| self.lookup(l))
            .collect();
        for target in targets {
            self.add_edge(id, target);
        }
    }

    /// The largest temporary id in use, plus one.
    pub fn next_free_temp(&self) -> u32 {
        self.blocks()
            .flat_map(|(_, b)| b.body.iter())
            .flat_map(|i| i.uses().chain(i.defines()))
            .chain(self.params.iter().copied())
            .map(|t| t.id + 1)
            .max()
            .unwrap_or(0)
    }

    #[cfg(test)]
    /// Every edge `from -> to` recorded as a successor is also recorded as a predecessor,
    /// and the other way around.
    pub fn edges_are_symmetric(&self) -> bool {
        self.blocks().all(|(id, block)| {
            block
                .succs
                .iter()
                .all(|s| self.contains(*s) && self.block(*s).preds.contains(&id))
                && block
                    .preds
                    .iter()
                    .all(|p| self.contains(*p) && self.block(*p).succs.contains(&id))
        })
    }
}
impl Display for Cfg {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        for (_, block) in self.blocks() {
            for instr in &block.body {
                match instr.is_label() {
                    true => writeln!(f, "{}", instr)?,
                    false => writeln!(f, "    {}", instr)?,
                }
            }
        }
        Ok(())
    }
}
