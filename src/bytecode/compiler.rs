//! Bytecode compiler: lowers the AST to instructions plus constants.
//!
//! The compiler borrows the session's [`VmState`] for its whole lifetime. The
//! global symbol table is moved out of the state on construction and put back
//! on drop, so a failed compile still leaves earlier definitions in place.

use std::mem;
use std::rc::Rc;

use crate::ast::{Expr, ExprKind, InfixOp, PrefixOp, Program, Stmt, StmtKind};
use crate::bytecode::instruction::{make, Instructions, OpCode};
use crate::bytecode::state::{VmState, GLOBALS_SIZE};
use crate::bytecode::symbol_table::{Symbol, SymbolScope, SymbolTable};
use crate::error::CompileError;
use crate::span::Span;
use crate::value::{CompiledFunction, Value};

/// Result type for compilation.
pub type CompileResult<T> = Result<T, CompileError>;

const MAX_CONSTANTS: usize = 65535;
const MAX_LOCALS: usize = 256;
const MAX_FREE: usize = 255;
const MAX_ARGUMENTS: usize = 255;
const MAX_ELEMENTS: usize = u16::MAX as usize;

/// Jump operand written before the target is known.
const PLACEHOLDER: usize = 0xFFFF;

/// Instructions for one compilation unit plus the constant pool they index.
#[derive(Debug, Clone)]
pub struct Bytecode {
    pub instructions: Instructions,
    pub constants: Vec<Value>,
}

#[derive(Debug, Clone, Copy)]
struct EmittedInstruction {
    opcode: OpCode,
    position: usize,
}

/// Instruction buffer for the function body being compiled.
#[derive(Debug, Default)]
struct CompilationScope {
    instructions: Instructions,
    last_instruction: Option<EmittedInstruction>,
    previous_instruction: Option<EmittedInstruction>,
}

/// The bytecode compiler.
pub struct Compiler<'a> {
    state: &'a mut VmState,
    /// Scope of the function being compiled
    current: CompilationScope,
    /// Scopes of the enclosing functions, innermost last
    enclosing: Vec<CompilationScope>,
    symbol_table: SymbolTable,
}

impl<'a> Compiler<'a> {
    pub fn new(state: &'a mut VmState) -> Self {
        let symbol_table = mem::take(&mut state.symbol_table);
        Self {
            state,
            current: CompilationScope::default(),
            enclosing: Vec::new(),
            symbol_table,
        }
    }

    /// Compile a program into a unit that runs against the same state.
    pub fn compile(&mut self, program: &Program) -> CompileResult<Bytecode> {
        for stmt in &program.statements {
            self.compile_statement(stmt)?;
        }

        let scope = mem::take(&mut self.current);
        Ok(Bytecode {
            instructions: scope.instructions,
            constants: self.state.constants.clone(),
        })
    }

    fn compile_block(&mut self, statements: &[Stmt]) -> CompileResult<()> {
        for stmt in statements {
            self.compile_statement(stmt)?;
        }
        Ok(())
    }

    fn compile_statement(&mut self, stmt: &Stmt) -> CompileResult<()> {
        match &stmt.kind {
            StmtKind::Expression(expr) => {
                self.compile_expression(expr)?;
                self.emit(OpCode::Pop, &[]);
            }
            StmtKind::Return(Some(expr)) => {
                self.compile_expression(expr)?;
                self.emit(OpCode::ReturnValue, &[]);
            }
            StmtKind::Return(None) => {
                self.emit(OpCode::Return, &[]);
            }
        }
        Ok(())
    }

    fn compile_expression(&mut self, expr: &Expr) -> CompileResult<()> {
        let span = expr.span;

        match &expr.kind {
            ExprKind::IntLiteral(n) => {
                let index = self.add_constant(Value::Integer(*n), span)?;
                self.emit(OpCode::LoadConstant, &[index]);
            }

            ExprKind::StringLiteral(s) => {
                let index = self.add_constant(Value::string(s.clone()), span)?;
                self.emit(OpCode::LoadConstant, &[index]);
            }

            ExprKind::BoolLiteral(true) => {
                self.emit(OpCode::LoadTrue, &[]);
            }

            ExprKind::BoolLiteral(false) => {
                self.emit(OpCode::LoadFalse, &[]);
            }

            ExprKind::Null => {
                self.emit(OpCode::LoadNull, &[]);
            }

            ExprKind::Identifier(name) => {
                let symbol = self
                    .symbol_table
                    .resolve(name)
                    .ok_or_else(|| CompileError::undefined_variable(name, span))?;
                self.load_symbol(&symbol);
            }

            ExprKind::Prefix { operator, operand } => {
                self.compile_expression(operand)?;
                let op = match operator {
                    PrefixOp::Negate => OpCode::Minus,
                    PrefixOp::Not => OpCode::Not,
                    PrefixOp::BitNot => OpCode::BitwiseNOT,
                };
                self.emit(op, &[]);
            }

            ExprKind::Infix {
                left,
                operator,
                right,
            } => self.compile_infix(left, *operator, right)?,

            ExprKind::If {
                condition,
                consequence,
                alternative,
            } => self.compile_if(condition, consequence, alternative.as_deref(), span)?,

            ExprKind::While { condition, body } => self.compile_while(condition, body, span)?,

            ExprKind::Function { name, params, body } => {
                self.compile_function(name.as_deref(), params, body, span)?
            }

            ExprKind::Call { callee, arguments } => {
                if arguments.len() > MAX_ARGUMENTS {
                    return Err(CompileError::new(
                        format!("too many arguments ({}, limit {})", arguments.len(), MAX_ARGUMENTS),
                        span,
                    ));
                }
                self.compile_expression(callee)?;
                for argument in arguments {
                    self.compile_expression(argument)?;
                }
                self.emit(OpCode::Call, &[arguments.len()]);
            }

            ExprKind::Array(elements) => {
                if elements.len() > MAX_ELEMENTS {
                    return Err(CompileError::new("array literal too large", span));
                }
                for element in elements {
                    self.compile_expression(element)?;
                }
                self.emit(OpCode::MakeArray, &[elements.len()]);
            }

            ExprKind::Hash(pairs) => {
                if pairs.len() > MAX_ELEMENTS {
                    return Err(CompileError::new("hash literal too large", span));
                }
                for (key, value) in pairs {
                    if key.is_unhashable_literal() {
                        let type_name = match key.kind {
                            ExprKind::Array(_) => "array",
                            ExprKind::Hash(_) => "hash",
                            _ => "closure",
                        };
                        return Err(CompileError::UnhashableKey(type_name.to_string(), key.span));
                    }
                    self.compile_expression(key)?;
                    self.compile_expression(value)?;
                }
                self.emit(OpCode::MakeHash, &[pairs.len()]);
            }

            ExprKind::Index { object, index } => {
                self.compile_expression(object)?;
                self.compile_expression(index)?;
                self.emit(OpCode::GetItem, &[]);
            }

            ExprKind::Bind { name, value } => self.compile_bind(name, value, span)?,

            ExprKind::Assign { target, value } => self.compile_assign(target, value, span)?,

            ExprKind::Import(name) => {
                self.compile_expression(name)?;
                self.emit(OpCode::LoadModule, &[]);
            }
        }

        Ok(())
    }

    fn compile_infix(&mut self, left: &Expr, operator: InfixOp, right: &Expr) -> CompileResult<()> {
        // There are no less-than opcodes: swap the operands instead.
        let op = match operator {
            InfixOp::Less | InfixOp::LessEqual => {
                self.compile_expression(right)?;
                self.compile_expression(left)?;
                let op = if operator == InfixOp::Less {
                    OpCode::GreaterThan
                } else {
                    OpCode::GreaterThanEqual
                };
                self.emit(op, &[]);
                return Ok(());
            }
            InfixOp::Add => OpCode::Add,
            InfixOp::Subtract => OpCode::Sub,
            InfixOp::Multiply => OpCode::Mul,
            InfixOp::Divide => OpCode::Div,
            InfixOp::Modulo => OpCode::Mod,
            InfixOp::BitOr => OpCode::BitwiseOR,
            InfixOp::BitXor => OpCode::BitwiseXOR,
            InfixOp::BitAnd => OpCode::BitwiseAND,
            InfixOp::ShiftLeft => OpCode::LeftShift,
            InfixOp::ShiftRight => OpCode::RightShift,
            InfixOp::Equal => OpCode::Equal,
            InfixOp::NotEqual => OpCode::NotEqual,
            InfixOp::Greater => OpCode::GreaterThan,
            InfixOp::GreaterEqual => OpCode::GreaterThanEqual,
            InfixOp::And => OpCode::And,
            InfixOp::Or => OpCode::Or,
        };

        self.compile_expression(left)?;
        self.compile_expression(right)?;
        self.emit(op, &[]);
        Ok(())
    }

    fn compile_if(
        &mut self,
        condition: &Expr,
        consequence: &[Stmt],
        alternative: Option<&[Stmt]>,
        span: Span,
    ) -> CompileResult<()> {
        self.compile_expression(condition)?;
        let jump_if_false = self.emit(OpCode::JumpIfFalse, &[PLACEHOLDER]);

        self.compile_branch(consequence)?;
        let jump = self.emit(OpCode::Jump, &[PLACEHOLDER]);

        self.patch_jump(jump_if_false, span)?;
        match alternative {
            Some(block) => self.compile_branch(block)?,
            None => {
                self.emit(OpCode::LoadNull, &[]);
            }
        }
        self.patch_jump(jump, span)
    }

    /// Compile one arm of an `if` so it leaves exactly one value behind.
    fn compile_branch(&mut self, block: &[Stmt]) -> CompileResult<()> {
        self.compile_block(block)?;

        match block.last().map(|stmt| &stmt.kind) {
            Some(StmtKind::Expression(_)) => {
                if self.last_instruction_is(OpCode::Pop) {
                    self.remove_last_pop();
                }
            }
            // Control leaves the frame, nothing reaches the join point.
            Some(StmtKind::Return(_)) => {}
            None => {
                self.emit(OpCode::LoadNull, &[]);
            }
        }
        Ok(())
    }

    fn compile_while(&mut self, condition: &Expr, body: &[Stmt], span: Span) -> CompileResult<()> {
        let loop_start = self.jump_target(self.current.instructions.len(), span)?;

        self.compile_expression(condition)?;
        let exit_jump = self.emit(OpCode::JumpIfFalse, &[PLACEHOLDER]);

        self.compile_block(body)?;
        self.emit(OpCode::Jump, &[loop_start]);

        self.patch_jump(exit_jump, span)?;
        self.emit(OpCode::LoadNull, &[]);
        Ok(())
    }

    fn compile_function(
        &mut self,
        name: Option<&str>,
        params: &[String],
        body: &[Stmt],
        span: Span,
    ) -> CompileResult<()> {
        self.enter_scope();

        if let Some(name) = name {
            let this = self.symbol_table.define_self(name);
            self.emit(OpCode::SetSelf, &[this.index]);
        }
        for param in params {
            self.define_symbol(param, span)?;
        }

        self.compile_block(body)?;

        if self.last_instruction_is(OpCode::Pop) {
            self.replace_last_pop_with_return();
        }
        if !self.last_instruction_is(OpCode::ReturnValue) && !self.last_instruction_is(OpCode::Return)
        {
            self.emit(OpCode::Return, &[]);
        }

        let free_symbols = self.symbol_table.free_symbols().to_vec();
        let num_locals = self.symbol_table.len();
        let instructions = self.leave_scope();

        if free_symbols.len() > MAX_FREE {
            return Err(CompileError::new(
                format!("too many free variables ({}, limit {})", free_symbols.len(), MAX_FREE),
                span,
            ));
        }

        for symbol in &free_symbols {
            self.load_symbol(symbol);
        }

        let function = CompiledFunction {
            instructions,
            num_locals,
            num_parameters: params.len(),
            name: name.map(str::to_string),
        };
        let index = self.add_constant(Value::CompiledFunction(Rc::new(function)), span)?;
        self.emit(OpCode::MakeClosure, &[index, free_symbols.len()]);
        Ok(())
    }

    fn compile_bind(&mut self, name: &str, value: &Expr, span: Span) -> CompileResult<()> {
        self.compile_expression(value)?;

        // Rebinding a name in the same scope reuses its slot.
        let symbol = match self.symbol_table.get(name) {
            Some(existing) if matches!(existing.scope, SymbolScope::Global | SymbolScope::Local) => {
                existing.clone()
            }
            _ => self.define_symbol(name, span)?,
        };

        let op = if symbol.scope == SymbolScope::Global {
            OpCode::BindGlobal
        } else {
            OpCode::BindLocal
        };
        self.emit(op, &[symbol.index]);
        self.emit(OpCode::LoadNull, &[]);
        Ok(())
    }

    fn compile_assign(&mut self, target: &Expr, value: &Expr, span: Span) -> CompileResult<()> {
        match &target.kind {
            ExprKind::Identifier(name) => {
                let symbol = self
                    .symbol_table
                    .resolve(name)
                    .ok_or_else(|| CompileError::undefined_variable(name, target.span))?;

                let op = match symbol.scope {
                    SymbolScope::Global => OpCode::AssignGlobal,
                    SymbolScope::Local => OpCode::AssignLocal,
                    SymbolScope::Free | SymbolScope::Function => {
                        return Err(CompileError::InvalidAssignment {
                            kind: "captured variable",
                            name: name.clone(),
                            span,
                        })
                    }
                    SymbolScope::Builtin => {
                        return Err(CompileError::InvalidAssignment {
                            kind: "builtin",
                            name: name.clone(),
                            span,
                        })
                    }
                };

                self.compile_expression(value)?;
                self.emit(op, &[symbol.index]);
                self.emit(OpCode::LoadNull, &[]);
            }

            // SetItem pushes its own null.
            ExprKind::Index { object, index } => {
                self.compile_expression(object)?;
                self.compile_expression(index)?;
                self.compile_expression(value)?;
                self.emit(OpCode::SetItem, &[]);
            }

            _ => return Err(CompileError::new("invalid assignment target", span)),
        }

        Ok(())
    }

    fn load_symbol(&mut self, symbol: &Symbol) {
        match symbol.scope {
            SymbolScope::Global => self.emit(OpCode::LoadGlobal, &[symbol.index]),
            SymbolScope::Local => self.emit(OpCode::LoadLocal, &[symbol.index]),
            SymbolScope::Free => self.emit(OpCode::LoadFree, &[symbol.index]),
            SymbolScope::Builtin => self.emit(OpCode::LoadBuiltin, &[symbol.index]),
            // Filled in by SetSelf once the closure exists.
            SymbolScope::Function => self.emit(OpCode::LoadNull, &[]),
        };
    }

    fn define_symbol(&mut self, name: &str, span: Span) -> CompileResult<Symbol> {
        let symbol = self.symbol_table.define(name);
        let (limit, kind) = if symbol.scope == SymbolScope::Global {
            (GLOBALS_SIZE, "global")
        } else {
            (MAX_LOCALS, "local")
        };
        if symbol.index >= limit {
            return Err(CompileError::new(
                format!("too many {} variables (limit {})", kind, limit),
                span,
            ));
        }
        Ok(symbol)
    }

    // ===== Scopes =====

    fn enter_scope(&mut self) {
        let outer_scope = mem::take(&mut self.current);
        self.enclosing.push(outer_scope);

        let outer_table = mem::take(&mut self.symbol_table);
        self.symbol_table = SymbolTable::new_enclosed(outer_table);
    }

    fn leave_scope(&mut self) -> Instructions {
        let outer_scope = self.enclosing.pop().unwrap_or_default();
        let scope = mem::replace(&mut self.current, outer_scope);

        let table = mem::take(&mut self.symbol_table);
        self.symbol_table = table.into_outer().unwrap_or_default();

        scope.instructions
    }

    // ===== Bytecode emission =====

    fn emit(&mut self, op: OpCode, operands: &[usize]) -> usize {
        let instruction = make(op, operands);
        let position = self.current.instructions.len();
        self.current.instructions.extend_from_slice(&instruction);

        self.current.previous_instruction = self.current.last_instruction.take();
        self.current.last_instruction = Some(EmittedInstruction {
            opcode: op,
            position,
        });
        position
    }

    fn last_instruction_is(&self, op: OpCode) -> bool {
        self.current
            .last_instruction
            .map_or(false, |last| last.opcode == op)
    }

    fn remove_last_pop(&mut self) {
        if let Some(last) = self.current.last_instruction {
            self.current.instructions.truncate(last.position);
            self.current.last_instruction = self.current.previous_instruction.take();
        }
    }

    fn replace_last_pop_with_return(&mut self) {
        if let Some(last) = self.current.last_instruction.as_mut() {
            self.current.instructions[last.position] = u8::from(OpCode::ReturnValue);
            last.opcode = OpCode::ReturnValue;
        }
    }

    /// Point the jump at `position` to the end of the current buffer.
    fn patch_jump(&mut self, position: usize, span: Span) -> CompileResult<()> {
        let target = self.jump_target(self.current.instructions.len(), span)?;
        let bytes = (target as u16).to_be_bytes();
        self.current.instructions[position + 1] = bytes[0];
        self.current.instructions[position + 2] = bytes[1];
        Ok(())
    }

    fn jump_target(&self, offset: usize, span: Span) -> CompileResult<usize> {
        if offset > u16::MAX as usize {
            return Err(CompileError::new("function body too large to jump within", span));
        }
        Ok(offset)
    }

    fn add_constant(&mut self, value: Value, span: Span) -> CompileResult<usize> {
        if self.state.constants.len() >= MAX_CONSTANTS {
            return Err(CompileError::new(
                format!("too many constants (limit {})", MAX_CONSTANTS),
                span,
            ));
        }
        self.state.constants.push(value);
        Ok(self.state.constants.len() - 1)
    }
}

impl Drop for Compiler<'_> {
    fn drop(&mut self) {
        let table = mem::take(&mut self.symbol_table);
        self.state.symbol_table = table.into_global();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::disassembler::disassemble;
    use crate::lexer::Scanner;
    use crate::parser::Parser;
    use crate::value::builtins;
    use pretty_assertions::assert_eq;

    fn compile_source(state: &mut VmState, source: &str) -> CompileResult<Bytecode> {
        let tokens = Scanner::new(source).scan_tokens().expect("source lexes");
        let program = Parser::new(tokens).parse().expect("source parses");
        Compiler::new(state).compile(&program)
    }

    fn compile_ok(source: &str) -> Bytecode {
        let mut state = VmState::new();
        compile_source(&mut state, source).expect("source compiles")
    }

    fn concat(parts: &[Instructions]) -> Instructions {
        parts.concat()
    }

    fn function_constant(bytecode: &Bytecode, index: usize) -> Rc<CompiledFunction> {
        match &bytecode.constants[index] {
            Value::CompiledFunction(func) => func.clone(),
            other => panic!("constant {} is not a function: {:?}", index, other),
        }
    }

    #[test]
    fn test_integer_arithmetic() {
        let bytecode = compile_ok("1 + 2");
        assert_eq!(
            bytecode.instructions,
            concat(&[
                make(OpCode::LoadConstant, &[0]),
                make(OpCode::LoadConstant, &[1]),
                make(OpCode::Add, &[]),
                make(OpCode::Pop, &[]),
            ])
        );
        assert_eq!(bytecode.constants, vec![Value::Integer(1), Value::Integer(2)]);
    }

    #[test]
    fn test_less_than_swaps_operands() {
        let bytecode = compile_ok("1 < 2");
        assert_eq!(
            bytecode.instructions,
            concat(&[
                make(OpCode::LoadConstant, &[0]),
                make(OpCode::LoadConstant, &[1]),
                make(OpCode::GreaterThan, &[]),
                make(OpCode::Pop, &[]),
            ])
        );
        assert_eq!(bytecode.constants, vec![Value::Integer(2), Value::Integer(1)]);
    }

    #[test]
    fn test_conditional_without_alternative() {
        let bytecode = compile_ok("if (true) { 10 }; 3333;");
        assert_eq!(
            disassemble(&bytecode.instructions),
            "0000 LoadTrue\n\
             0001 JumpIfFalse 10\n\
             0004 LoadConstant 0\n\
             0007 Jump 11\n\
             0010 LoadNull\n\
             0011 Pop\n\
             0012 LoadConstant 1\n\
             0015 Pop\n"
        );
    }

    #[test]
    fn test_conditional_with_alternative() {
        let bytecode = compile_ok("if (true) { 10 } else { 20 }");
        assert_eq!(
            disassemble(&bytecode.instructions),
            "0000 LoadTrue\n\
             0001 JumpIfFalse 10\n\
             0004 LoadConstant 0\n\
             0007 Jump 13\n\
             0010 LoadConstant 1\n\
             0013 Pop\n"
        );
    }

    #[test]
    fn test_while_loop() {
        let bytecode = compile_ok("while (false) { 1 }");
        assert_eq!(
            disassemble(&bytecode.instructions),
            "0000 LoadFalse\n\
             0001 JumpIfFalse 11\n\
             0004 LoadConstant 0\n\
             0007 Pop\n\
             0008 Jump 0\n\
             0011 LoadNull\n\
             0012 Pop\n"
        );
    }

    #[test]
    fn test_global_bind() {
        let bytecode = compile_ok("one := 1; two := one;");
        assert_eq!(
            bytecode.instructions,
            concat(&[
                make(OpCode::LoadConstant, &[0]),
                make(OpCode::BindGlobal, &[0]),
                make(OpCode::LoadNull, &[]),
                make(OpCode::Pop, &[]),
                make(OpCode::LoadGlobal, &[0]),
                make(OpCode::BindGlobal, &[1]),
                make(OpCode::LoadNull, &[]),
                make(OpCode::Pop, &[]),
            ])
        );
    }

    #[test]
    fn test_rebind_reuses_slot() {
        let bytecode = compile_ok("a := 1; a := 2;");
        assert_eq!(
            bytecode.instructions,
            concat(&[
                make(OpCode::LoadConstant, &[0]),
                make(OpCode::BindGlobal, &[0]),
                make(OpCode::LoadNull, &[]),
                make(OpCode::Pop, &[]),
                make(OpCode::LoadConstant, &[1]),
                make(OpCode::BindGlobal, &[0]),
                make(OpCode::LoadNull, &[]),
                make(OpCode::Pop, &[]),
            ])
        );
    }

    #[test]
    fn test_function_implicit_return() {
        let bytecode = compile_ok("fn() { 5 + 10 }");
        let func = function_constant(&bytecode, 2);
        assert_eq!(
            func.instructions,
            concat(&[
                make(OpCode::LoadConstant, &[0]),
                make(OpCode::LoadConstant, &[1]),
                make(OpCode::Add, &[]),
                make(OpCode::ReturnValue, &[]),
            ])
        );
        assert_eq!(
            bytecode.instructions,
            concat(&[make(OpCode::MakeClosure, &[2, 0]), make(OpCode::Pop, &[])])
        );
    }

    #[test]
    fn test_empty_function_returns_null() {
        let bytecode = compile_ok("fn() { }");
        let func = function_constant(&bytecode, 0);
        assert_eq!(func.instructions, make(OpCode::Return, &[]));
        assert_eq!(func.num_locals, 0);
    }

    #[test]
    fn test_local_bind_shadows_global() {
        let bytecode = compile_ok("x := 1; fn() { x := 2; x }");
        let func = function_constant(&bytecode, 2);
        assert_eq!(
            func.instructions,
            concat(&[
                make(OpCode::LoadConstant, &[1]),
                make(OpCode::BindLocal, &[0]),
                make(OpCode::LoadNull, &[]),
                make(OpCode::Pop, &[]),
                make(OpCode::LoadLocal, &[0]),
                make(OpCode::ReturnValue, &[]),
            ])
        );
        assert_eq!(func.num_locals, 1);
    }

    #[test]
    fn test_closure_captures_free_variable() {
        let bytecode = compile_ok("fn(a) { fn(b) { a + b } }");
        let inner = function_constant(&bytecode, 0);
        let outer = function_constant(&bytecode, 1);

        assert_eq!(
            inner.instructions,
            concat(&[
                make(OpCode::LoadFree, &[0]),
                make(OpCode::LoadLocal, &[0]),
                make(OpCode::Add, &[]),
                make(OpCode::ReturnValue, &[]),
            ])
        );
        assert_eq!(
            outer.instructions,
            concat(&[
                make(OpCode::LoadLocal, &[0]),
                make(OpCode::MakeClosure, &[0, 1]),
                make(OpCode::ReturnValue, &[]),
            ])
        );
    }

    #[test]
    fn test_named_function_refers_to_itself() {
        let bytecode = compile_ok("countdown := fn(x) { countdown(x - 1) }");
        let func = function_constant(&bytecode, 1);

        assert_eq!(func.name.as_deref(), Some("countdown"));
        assert_eq!(
            func.instructions,
            concat(&[
                make(OpCode::SetSelf, &[0]),
                make(OpCode::LoadFree, &[0]),
                make(OpCode::LoadLocal, &[0]),
                make(OpCode::LoadConstant, &[0]),
                make(OpCode::Sub, &[]),
                make(OpCode::Call, &[1]),
                make(OpCode::ReturnValue, &[]),
            ])
        );
        assert_eq!(
            bytecode.instructions,
            concat(&[
                make(OpCode::LoadNull, &[]),
                make(OpCode::MakeClosure, &[1, 1]),
                make(OpCode::BindGlobal, &[0]),
                make(OpCode::LoadNull, &[]),
                make(OpCode::Pop, &[]),
            ])
        );
    }

    #[test]
    fn test_builtin_call() {
        let (len_index, _) = builtins::lookup("len").expect("len is a builtin");
        let bytecode = compile_ok("len([])");
        assert_eq!(
            bytecode.instructions,
            concat(&[
                make(OpCode::LoadBuiltin, &[len_index]),
                make(OpCode::MakeArray, &[0]),
                make(OpCode::Call, &[1]),
                make(OpCode::Pop, &[]),
            ])
        );
    }

    #[test]
    fn test_index_assignment_and_dot_access() {
        let bytecode = compile_ok("h := {}; h.a = 1");
        assert_eq!(
            disassemble(&bytecode.instructions),
            "0000 MakeHash 0\n\
             0003 BindGlobal 0\n\
             0006 LoadNull\n\
             0007 Pop\n\
             0008 LoadGlobal 0\n\
             0011 LoadConstant 0\n\
             0014 LoadConstant 1\n\
             0017 SetItem\n\
             0018 Pop\n"
        );
    }

    #[test]
    fn test_definitions_persist_across_units() {
        let mut state = VmState::new();
        compile_source(&mut state, "a := 1;").unwrap();
        let bytecode = compile_source(&mut state, "a").unwrap();
        assert_eq!(
            bytecode.instructions,
            concat(&[make(OpCode::LoadGlobal, &[0]), make(OpCode::Pop, &[])])
        );
        assert_eq!(bytecode.constants.len(), 1);
    }

    #[test]
    fn test_undefined_variable() {
        let mut state = VmState::new();
        let err = compile_source(&mut state, "fn() { missing }").unwrap_err();
        assert!(matches!(err, CompileError::UndefinedVariable(ref name, _) if name == "missing"));
        assert!(state.symbol_table.is_global());
        assert!(state.symbol_table.get("len").is_some());
    }

    #[test]
    fn test_assign_errors() {
        let mut state = VmState::new();

        let err = compile_source(&mut state, "len = 1").unwrap_err();
        assert!(matches!(err, CompileError::InvalidAssignment { kind: "builtin", .. }));

        let err = compile_source(&mut state, "fn(a) { fn() { a = 2 } }").unwrap_err();
        assert!(matches!(
            err,
            CompileError::InvalidAssignment {
                kind: "captured variable",
                ..
            }
        ));

        let err = compile_source(&mut state, "b = 1").unwrap_err();
        assert!(matches!(err, CompileError::UndefinedVariable(..)));
    }

    #[test]
    fn test_unhashable_literal_key() {
        let mut state = VmState::new();
        let err = compile_source(&mut state, "{[1]: 2}").unwrap_err();
        assert!(matches!(err, CompileError::UnhashableKey(ref t, _) if t == "array"));
    }
}
