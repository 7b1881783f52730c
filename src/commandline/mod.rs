use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::{il::Munch, pipeline::PipelineOptions};

#[derive(Debug, Parser)]
#[clap(about = "A compiler back end for BX: TAC generation, optimisation and x64 code")]
pub struct Options {
    #[clap(subcommand)]
    pub operation: Operation,
    /// Increase logging verbosity (may be repeated)
    #[clap(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Debug, Subcommand)]
pub enum Operation {
    /// Lower a syntax tree to a TAC record
    Tac {
        file: PathBuf,
        #[clap(long, value_enum, default_value_t)]
        munch: Munch,
        #[clap(short, long)]
        output: Option<PathBuf>,
    },
    /// Optimise a TAC record
    Optimise {
        file: PathBuf,
        #[clap(short, long)]
        output: Option<PathBuf>,
    },
    /// Compile a syntax tree or TAC record to assembly
    Compile {
        file: PathBuf,
        #[clap(flatten)]
        backend: BackendOptions,
        /// Also write the intermediate TAC records next to the input
        #[clap(long)]
        keep_tac: bool,
        #[clap(short, long)]
        output: Option<PathBuf>,
    },
    /// Interpret a program and print its output
    Run {
        file: PathBuf,
        #[clap(flatten)]
        backend: BackendOptions,
    },
}

#[derive(Debug, Args)]
pub struct BackendOptions {
    #[clap(long, value_enum, default_value_t)]
    munch: Munch,
    #[clap(short, long)]
    /// Do not optimise the generated code
    no_optimise: bool,
}

impl BackendOptions {
    pub fn pipeline(&self) -> PipelineOptions {
        PipelineOptions {
            munch: self.munch,
            optimise_cfg: !self.no_optimise,
            optimise_dataflow: !self.no_optimise,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compile_flags_map_to_pipeline_options() {
        let options =
            Options::parse_from(["bxc", "-vv", "compile", "a.json", "--munch", "top-down", "-n"]);
        assert_eq!(2, options.verbose);
        match options.operation {
            Operation::Compile { backend, keep_tac, .. } => {
                assert!(!keep_tac);
                assert_eq!(
                    PipelineOptions {
                        munch: Munch::TopDown,
                        optimise_cfg: false,
                        optimise_dataflow: false,
                    },
                    backend.pipeline()
                );
            }
            other => panic!("unexpected operation {:?}", other),
        }
    }

    #[test]
    fn optimisation_is_on_by_default() {
        let options = Options::parse_from(["bxc", "run", "a.json"]);
        match options.operation {
            Operation::Run { backend, .. } => {
                assert_eq!(PipelineOptions::default(), backend.pipeline())
            }
            other => panic!("unexpected operation {:?}", other),
        }
    }
}
