//! Bytecode compiler and virtual machine for monkey.
//!
//! # Architecture
//!
//! - `instruction`: opcode definitions, operand widths, encode/decode
//! - `symbol_table`: name resolution across nested scopes
//! - `compiler`: transforms the AST into bytecode
//! - `state`: constants, globals and symbols shared across runs
//! - `frame`: call frames
//! - `vm`: stack-based virtual machine for executing bytecode
//! - `disassembler`: debug output for bytecode inspection

pub mod compiler;
pub mod disassembler;
pub mod frame;
pub mod instruction;
pub mod state;
pub mod symbol_table;
pub mod vm;

pub use compiler::{Bytecode, Compiler};
pub use disassembler::{disassemble, disassemble_with_constants, print_disassembly};
pub use instruction::{make, Instructions, OpCode};
pub use state::VmState;
pub use symbol_table::{Symbol, SymbolScope, SymbolTable};
pub use vm::Vm;
