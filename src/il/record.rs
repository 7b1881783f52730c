//! The JSON record form of a TAC program, used as an on-disk checkpoint between stages.
use serde::{Deserialize, Serialize};

use crate::error::{malformed, CompileResult, Malformed};

use super::{Instr, Operand, TacGlobal, TacProcedure, TacProgram, Temp};

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum DeclRecord {
    Global {
        var: String,
        init: i64,
    },
    Procedure {
        proc: String,
        args: Vec<String>,
        body: Vec<InstrRecord>,
    },
}

#[derive(Debug, Serialize, Deserialize)]
struct InstrRecord {
    opcode: String,
    args: Vec<ArgRecord>,
    result: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum ArgRecord {
    Int(i64),
    Name(String),
}

/// Serialize a program to its JSON record form.
pub fn to_json(program: &TacProgram) -> serde_json::Result<String> {
    let records: Vec<_> = program
        .globals
        .iter()
        .map(|g| DeclRecord::Global {
            var: format!("@{}", g.name),
            init: g.init,
        })
        .chain(program.procedures.iter().map(|p| DeclRecord::Procedure {
            proc: format!("@{}", p.name),
            args: p.params.iter().map(ToString::to_string).collect(),
            body: p.body.iter_instructions().map(to_record).collect(),
        }))
        .collect();
    serde_json::to_string_pretty(&records)
}

/// Load a program from its JSON record form, checking every opcode and operand.
pub fn from_json(json: &str) -> CompileResult<TacProgram> {
    let records: Vec<DeclRecord> = serde_json::from_str(json)
        .map_err(|e| Malformed::Record(e.to_string()))?;

    let mut program = TacProgram::default();
    for record in records {
        match record {
            DeclRecord::Global { var, init } => program.globals.push(TacGlobal {
                name: strip_sigil(&var)?,
                init,
            }),
            DeclRecord::Procedure { proc, args, body } => {
                let params = args
                    .iter()
                    .map(|a| a.parse::<Temp>())
                    .collect::<CompileResult<_>>()?;
                let body = body
                    .into_iter()
                    .map(from_record)
                    .collect::<CompileResult<_>>()?;
                program
                    .procedures
                    .push(TacProcedure::new(strip_sigil(&proc)?, params, body));
            }
        }
    }
    Ok(program)
}

fn strip_sigil(name: &str) -> CompileResult<String> {
    match name.strip_prefix('@') {
        Some(stripped) if !stripped.is_empty() => Ok(stripped.to_string()),
        _ => malformed(Malformed::Operand(name.to_string())),
    }
}

fn to_record(instr: &Instr) -> InstrRecord {
    InstrRecord {
        opcode: instr.opcode.to_string(),
        args: instr
            .args
            .iter()
            .map(|a| match a {
                Operand::Int(i) => ArgRecord::Int(*i),
                other => ArgRecord::Name(other.to_string()),
            })
            .collect(),
        result: instr.result.as_ref().map(ToString::to_string),
    }
}

fn from_record(record: InstrRecord) -> CompileResult<Instr> {
    let opcode = record.opcode.parse()?;
    let args = record
        .args
        .into_iter()
        .map(|a| match a {
            ArgRecord::Int(i) => Ok(Operand::Int(i)),
            ArgRecord::Name(name) => name.parse(),
        })
        .collect::<CompileResult<_>>()?;
    let result = record.result.map(|r| r.parse()).transpose()?;
    let instr = Instr::new(opcode, args, result);
    instr.validate()?;
    Ok(instr)
}
