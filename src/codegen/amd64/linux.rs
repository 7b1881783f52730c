//! Native code generation for 64-bit Linux.

use std::collections::HashSet;

use crate::{builtins::Builtin, il::TacProgram, prelude::*};

use super::{
    assembly::*,
    procedure_compiler::ProcedureCompiler,
    stack_convention::Linux64,
};

pub fn compile(prog: &TacProgram) -> CompileResult<Assembly> {
    use Decl::*;
    let mut asm = Assembly::new();

    asm.push_decl(Bits(64));
    for builtin in Builtin::all() {
        asm.push_decl(Extern(builtin.symbol()));
    }

    let callees: HashSet<&str> = prog
        .procedures
        .iter()
        .map(|p| p.name.as_str())
        .chain(Builtin::all().into_iter().map(|b| b.symbol()))
        .collect();
    for procedure in &prog.procedures {
        asm.push_decl(Global(procedure.name.clone()));
        let compiled = ProcedureCompiler::<Linux64>::compile(procedure, &callees)?;
        asm.text.procedures.push(compiled);
    }

    // Globals nothing writes to can live in read-only memory.
    let stored = prog.stored_globals();
    for global in &prog.globals {
        let section = match stored.contains(global.name.as_str()) {
            true => &mut asm.data,
            false => &mut asm.rodata,
        };
        section.dq(global.name.as_str(), global.init);
    }

    debug!(
        "Generated assembly for {} procedures and {} globals",
        prog.procedures.len(),
        prog.globals.len()
    );
    Ok(asm)
}

#[cfg(test)]
mod tests {
    use crate::il::record;

    use super::*;

    #[test]
    fn program_compiles_to_nasm() {
        let program = record::from_json(
            r#"[{"var": "@limit", "init": 10},
                {"var": "@count", "init": 0},
                {"proc": "@main", "args": [], "body": [
                    {"opcode": "copy", "args": ["@limit"], "result": "%0"},
                    {"opcode": "copy", "args": ["%0"], "result": "@count"},
                    {"opcode": "print", "args": ["@count"], "result": null},
                    {"opcode": "ret", "args": [], "result": null}
                ]}]"#,
        )
        .unwrap();

        let asm = compile(&program).unwrap().to_string();
        let lines: Vec<_> = asm.lines().map(str::trim_end).collect();

        assert_eq!(
            vec![
                "bits 64",
                "extern bx_print_int",
                "extern bx_print_bool",
                "global main",
                "",
                "section .text",
                "main:",
                "    push    rbp                         ; store base pointer",
                "    mov     rbp, rsp                    ; move base pointer down",
                "    sub     rsp, 16                     ; allocate stack slots",
                "",
                "    mov     r11, qword [rel limit]      ; %0 = copy @limit",
                "    mov     qword [rbp - 8], r11",
                "    mov     r11, qword [rbp - 8]        ; @count = copy %0",
                "    mov     qword [rel count], r11",
                "    mov     rdi, qword [rel count]      ; print @count",
                "    call    bx_print_int",
                "    xor     rax, rax                    ; ret",
                "    jmp     .Lexit0",
                "",
                ".Lexit0:",
                "    mov     rsp, rbp                    ; move stack pointer back up",
                "    pop     rbp                         ; restore previous base pointer",
                "    ret                                 ; return to caller",
                "",
                "section .rodata",
                "limit: dq 10",
                "section .data",
                "count: dq 0",
            ],
            lines
        );
    }
}
