use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use clap::Parser;

use crate::{
    ast::typed::Program,
    commandline::{Operation, Options},
    il::{interpreter, record, Munch, TacProgram},
    pipeline::PipelineOptions,
    prelude::*,
};

mod ast;
mod builtins;
mod cfg;
mod codegen;
mod commandline;
mod dataflow;
mod error;
mod il;
mod listing;
mod pipeline;
mod prelude;

const TAC_EXTENSION: &str = ".tac.json";

fn main() -> Result<()> {
    let options = Options::parse();

    stderrlog::new()
        .module(module_path!())
        .verbosity(1 + options.verbose as usize)
        .init()?;

    run(options.operation)
}

fn run(operation: Operation) -> Result<()> {
    match operation {
        Operation::Tac {
            file,
            munch,
            output,
        } => {
            let tac = load_ast(&file, munch)?;
            emit(output.as_deref(), &record::to_json(&tac)?)
        }
        Operation::Optimise { file, output } => {
            let tac = load_tac(&file)?;
            let optimised = pipeline::optimise(&tac, &PipelineOptions::default())?;
            emit(output.as_deref(), &record::to_json(&optimised)?)
        }
        Operation::Compile {
            file,
            backend,
            keep_tac,
            output,
        } => {
            let options = backend.pipeline();
            let tac = load(&file, options.munch)?;
            let optimised = pipeline::optimise(&tac, &options)?;
            if keep_tac {
                let stem = stem(&file);
                write(&with_suffix(&stem, TAC_EXTENSION), &record::to_json(&tac)?)?;
                write(
                    &with_suffix(&stem, ".opt.tac.json"),
                    &record::to_json(&optimised)?,
                )?;
            }

            let assembly = pipeline::compile(&optimised)?;
            let output = output.unwrap_or_else(|| with_suffix(&stem(&file), ".s"));
            write(&output, &assembly)
        }
        Operation::Run { file, backend } => {
            let options = backend.pipeline();
            let tac = pipeline::optimise(&load(&file, options.munch)?, &options)?;
            let execution = interpreter::execute(&tac, "main")?;
            for line in &execution.output {
                println!("{}", line);
            }
            info!("main returned {}", execution.return_value);
            Ok(())
        }
    }
}

/// Load either a TAC record or a syntax tree, depending on the file name.
fn load(path: &Path, munch: Munch) -> Result<TacProgram> {
    if is_tac_record(path) {
        load_tac(path)
    } else {
        load_ast(path, munch)
    }
}

fn load_ast(path: &Path, munch: Munch) -> Result<TacProgram> {
    let json = read(path)?;
    let program: Program = serde_json::from_str(&json)
        .with_context(|| format!("{} is not a valid syntax tree", path.display()))?;
    Ok(pipeline::generate(
        &program,
        &PipelineOptions::unoptimised(munch),
    )?)
}

fn load_tac(path: &Path) -> Result<TacProgram> {
    let json = read(path)?;
    record::from_json(&json).with_context(|| format!("could not load {}", path.display()))
}

fn is_tac_record(path: &Path) -> bool {
    path.to_string_lossy().ends_with(TAC_EXTENSION)
}

/// The input path with its extension (`.json` or `.tac.json`) removed.
fn stem(path: &Path) -> PathBuf {
    let name = path.to_string_lossy();
    let trimmed = name
        .strip_suffix(TAC_EXTENSION)
        .or_else(|| name.strip_suffix(".json"));
    match trimmed {
        Some(stem) => PathBuf::from(stem),
        None => path.with_extension(""),
    }
}

fn with_suffix(stem: &Path, suffix: &str) -> PathBuf {
    PathBuf::from(format!("{}{}", stem.display(), suffix))
}

fn read(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("could not read {}", path.display()))
}

fn write(path: &Path, content: &str) -> Result<()> {
    debug!("Writing {}", path.display());
    fs::write(path, content).with_context(|| format!("could not write {}", path.display()))
}

fn emit(output: Option<&Path>, content: &str) -> Result<()> {
    match output {
        Some(path) => write(path, content),
        None => {
            println!("{}", content);
            Ok(())
        }
    }
}
