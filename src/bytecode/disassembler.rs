//! Bytecode disassembler for debugging.

use std::fmt::Write;

use crate::bytecode::instruction::{lookup, read_operands, OpCode};
use crate::value::Value;

/// One decoded instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedInstruction {
    pub offset: usize,
    pub op: OpCode,
    pub operands: Vec<usize>,
}

/// Decode a whole stream, failing on the first malformed instruction.
pub fn decode(instructions: &[u8]) -> Result<Vec<DecodedInstruction>, String> {
    let mut decoded = Vec::new();
    let mut offset = 0;

    while offset < instructions.len() {
        let (op, def) = lookup(instructions[offset])?;
        if offset + def.instruction_len() > instructions.len() {
            return Err(format!(
                "truncated {} at offset {}",
                def.name, offset
            ));
        }
        let (operands, read) = read_operands(&def, &instructions[offset + 1..]);
        decoded.push(DecodedInstruction {
            offset,
            op,
            operands,
        });
        offset += 1 + read;
    }

    Ok(decoded)
}

/// Disassemble a stream into `%04d Name operand...` lines.
pub fn disassemble(instructions: &[u8]) -> String {
    let mut output = String::new();
    let mut offset = 0;

    while offset < instructions.len() {
        offset = disassemble_instruction(instructions, offset, None, &mut output);
    }

    output
}

/// Disassemble a stream, annotating constant loads with the constant's value
/// and appending the body of every function in the pool it references.
pub fn disassemble_with_constants(instructions: &[u8], constants: &[Value]) -> String {
    let mut output = String::new();
    let mut offset = 0;

    while offset < instructions.len() {
        offset = disassemble_instruction(instructions, offset, Some(constants), &mut output);
    }

    // Nested function bodies
    if let Ok(decoded) = decode(instructions) {
        for ins in decoded.iter().filter(|d| d.op == OpCode::MakeClosure) {
            if let Some(Value::CompiledFunction(func)) = constants.get(ins.operands[0]) {
                let _ = writeln!(
                    output,
                    "\n== fn {} (arity: {}, locals: {}) ==",
                    func.display_name(),
                    func.num_parameters,
                    func.num_locals
                );
                output.push_str(&disassemble_with_constants(&func.instructions, constants));
            }
        }
    }

    output
}

/// Disassemble a single instruction, returning the offset of the next one.
///
/// A malformed instruction writes an `ERROR:` line and resumes at the next
/// byte.
pub fn disassemble_instruction(
    instructions: &[u8],
    offset: usize,
    constants: Option<&[Value]>,
    output: &mut String,
) -> usize {
    match format_instruction(instructions, offset, constants) {
        Ok((text, next)) => {
            let _ = writeln!(output, "{:04} {}", offset, text);
            next
        }
        Err(message) => {
            let _ = writeln!(output, "ERROR: {}", message);
            offset + 1
        }
    }
}

/// Render the instruction at `offset` without its offset prefix.
pub fn format_instruction(
    instructions: &[u8],
    offset: usize,
    constants: Option<&[Value]>,
) -> Result<(String, usize), String> {
    let (op, def) = lookup(instructions[offset])?;
    let end = offset + def.instruction_len();
    if end > instructions.len() {
        return Err(format!(
            "{} at {:04} wants {} operand bytes, found {}",
            def.name,
            offset,
            def.instruction_len() - 1,
            instructions.len() - offset - 1
        ));
    }

    let (operands, _) = read_operands(&def, &instructions[offset + 1..]);
    let mut text = String::from(def.name);
    for operand in &operands {
        let _ = write!(text, " {}", operand);
    }

    if let (OpCode::LoadConstant, Some(constants)) = (op, constants) {
        if let Some(constant) = constants.get(operands[0]) {
            let _ = write!(text, " ({})", constant.inspect());
        }
    }

    Ok((text, end))
}

/// Print disassembly to stdout.
pub fn print_disassembly(instructions: &[u8], constants: &[Value]) {
    print!("{}", disassemble_with_constants(instructions, constants));
}
