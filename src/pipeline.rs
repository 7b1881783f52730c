//! The stages a program goes through, from syntax tree to assembly.

use crate::{
    ast::typed::Program,
    cfg, codegen, dataflow,
    il::{self, Munch, TacProcedure, TacProgram},
    prelude::*,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineOptions {
    pub munch: Munch,
    /// Simplify the control-flow graph.
    pub optimise_cfg: bool,
    /// Run the SSA-based optimisations.
    pub optimise_dataflow: bool,
}
impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            munch: Munch::default(),
            optimise_cfg: true,
            optimise_dataflow: true,
        }
    }
}
impl PipelineOptions {
    pub fn unoptimised(munch: Munch) -> Self {
        Self {
            munch,
            optimise_cfg: false,
            optimise_dataflow: false,
        }
    }
}

pub fn generate(program: &Program, options: &PipelineOptions) -> CompileResult<TacProgram> {
    let tac = il::generate(program, options.munch)?;
    info!(
        "Generated {} instructions ({:?})",
        tac.instruction_count(),
        options.munch
    );
    Ok(tac)
}

/// Optimise every procedure of a program. The result never contains phis.
pub fn optimise(program: &TacProgram, options: &PipelineOptions) -> CompileResult<TacProgram> {
    if !options.optimise_cfg && !options.optimise_dataflow {
        return Ok(program.clone());
    }

    let procedures = program
        .procedures
        .iter()
        .map(|p| optimise_procedure(p, options))
        .collect::<CompileResult<_>>()?;
    let optimised = TacProgram {
        globals: program.globals.clone(),
        procedures,
    };
    info!(
        "Optimised {} instructions down to {}",
        program.instruction_count(),
        optimised.instruction_count()
    );
    Ok(optimised)
}

fn optimise_procedure(
    procedure: &TacProcedure,
    options: &PipelineOptions,
) -> CompileResult<TacProcedure> {
    let mut graph = cfg::build(procedure)?;
    if options.optimise_cfg {
        cfg::optimise(&mut graph);
    }
    if options.optimise_dataflow {
        dataflow::construct_ssa(&mut graph);
        dataflow::eliminate_dead_stores(&mut graph);
        dataflow::propagate_copies(&mut graph);
        dataflow::eliminate_dead_stores(&mut graph);
        dataflow::destruct_ssa(&mut graph);
        if options.optimise_cfg {
            // Tidy up the blocks that edge splitting left behind.
            cfg::optimise(&mut graph);
        }
    }
    Ok(cfg::linearize(&graph))
}

pub fn compile(program: &TacProgram) -> CompileResult<String> {
    codegen::generate_assembly(program)
}
