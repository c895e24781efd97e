//! Stack-based virtual machine for executing bytecode.
//!
//! A VM runs one compiled unit against a borrowed [`VmState`]. Globals and
//! constants live in the state, so definitions survive the VM. The operand
//! stack and call frames belong to the VM alone and are discarded with it.

use std::mem;
use std::rc::Rc;

use colored::Colorize;

use crate::bytecode::compiler::Bytecode;
use crate::bytecode::disassembler::format_instruction;
use crate::bytecode::frame::Frame;
use crate::bytecode::instruction::{read_u16, read_u8, OpCode};
use crate::bytecode::state::VmState;
use crate::error::RuntimeError;
use crate::module;
use crate::value::{builtins, ArrayRef, Closure, CompiledFunction, HashKey, HashPair, HashRef, HashTable, Value};

/// Result type for VM operations.
pub type VmResult<T> = Result<T, RuntimeError>;

/// Maximum operand stack depth.
pub const STACK_MAX: usize = 2048;
/// Maximum call depth.
pub const FRAMES_MAX: usize = 1024;
/// Longest array or string that `*` may produce.
pub const MAX_REPEAT_LEN: usize = isize::MAX as usize / mem::size_of::<Value>();

/// The bytecode virtual machine.
pub struct Vm<'a> {
    state: &'a mut VmState,
    /// The operand stack. Slots at and above `sp` are free.
    stack: Vec<Value>,
    sp: usize,
    /// Call frames, innermost last
    frames: Vec<Frame>,
    last_popped: Value,
    halted: bool,
    trace: bool,
}

impl<'a> Vm<'a> {
    /// Create a VM whose outermost frame runs `bytecode`.
    pub fn new(state: &'a mut VmState, bytecode: Bytecode) -> Self {
        let main = CompiledFunction {
            instructions: bytecode.instructions,
            num_locals: 0,
            num_parameters: 0,
            name: Some("<main>".to_string()),
        };
        let closure = Rc::new(Closure::new(Rc::new(main), Vec::new()));

        let mut frames = Vec::with_capacity(FRAMES_MAX);
        frames.push(Frame::new(closure, 0));

        let trace = state.trace;
        Self {
            state,
            stack: vec![Value::Null; STACK_MAX],
            sp: 0,
            frames,
            last_popped: Value::Null,
            halted: false,
            trace,
        }
    }

    /// The value most recently removed from the stack by `Pop` or by a
    /// top-level return.
    pub fn last_popped(&self) -> Value {
        self.last_popped.clone()
    }

    /// Live stack contents, bottom first.
    pub fn stack(&self) -> &[Value] {
        &self.stack[..self.sp]
    }

    /// Run to completion. A VM runs once; later calls do nothing.
    pub fn run(&mut self) -> VmResult<()> {
        if self.halted {
            return Ok(());
        }
        let result = self.execute();
        self.halted = true;
        result
    }

    /// Main execution loop.
    fn execute(&mut self) -> VmResult<()> {
        loop {
            let frame = self.current_frame_mut()?;
            frame.ip += 1;
            let ip = frame.ip as usize;
            let byte = frame.instructions().get(ip).copied();

            let byte = match byte {
                Some(byte) => byte,
                // Ran off the end of the body. The outermost frame halts and
                // keeps the last popped value.
                None => {
                    if self.frames.len() <= 1 {
                        self.frames.clear();
                        return Ok(());
                    }
                    self.return_from_frame(Value::Null)?;
                    continue;
                }
            };

            let opcode = OpCode::from_u8(byte)
                .ok_or_else(|| RuntimeError::Decode(format!("undefined opcode {}", byte)))?;

            if self.trace {
                self.trace_instruction(ip);
            }

            match opcode {
                // ============ Loads & Stores ============
                OpCode::LoadConstant => {
                    let index = self.read_u16_operand()?;
                    let value = self.state.constants.get(index).cloned().ok_or_else(|| {
                        RuntimeError::Decode(format!("constant index {} out of range", index))
                    })?;
                    self.push(value)?;
                }

                OpCode::LoadBuiltin => {
                    let index = self.read_u8_operand()?;
                    let builtin = builtins::get(index).ok_or_else(|| {
                        RuntimeError::Decode(format!("builtin index {} out of range", index))
                    })?;
                    self.push(Value::Builtin(builtin))?;
                }

                OpCode::LoadGlobal => {
                    let index = self.read_u16_operand()?;
                    let value = self.state.globals[index].clone();
                    self.push(value)?;
                }

                OpCode::BindGlobal => {
                    let index = self.read_u16_operand()?;
                    let value = self.pop()?;
                    self.state.globals[index] = value.bind_copy();
                }

                OpCode::AssignGlobal => {
                    let index = self.read_u16_operand()?;
                    let value = self.pop()?;
                    self.state.globals[index] = value;
                }

                OpCode::LoadLocal => {
                    let slot = self.local_slot()?;
                    let value = self.stack[slot].clone();
                    self.push(value)?;
                }

                OpCode::BindLocal => {
                    let slot = self.local_slot()?;
                    let value = self.pop()?;
                    self.stack[slot] = value.bind_copy();
                }

                OpCode::AssignLocal => {
                    let slot = self.local_slot()?;
                    let value = self.pop()?;
                    self.stack[slot] = value;
                }

                OpCode::LoadFree => {
                    let index = self.read_u8_operand()?;
                    let value = {
                        let frame = self.current_frame()?;
                        let free = frame.closure.free.borrow();
                        free.get(index).cloned()
                    };
                    let value = value.ok_or_else(|| {
                        RuntimeError::Decode(format!("free variable {} out of range", index))
                    })?;
                    self.push(value)?;
                }

                OpCode::SetSelf => {
                    let index = self.read_u8_operand()?;
                    let closure = self.current_frame()?.closure.clone();
                    let mut free = closure.free.borrow_mut();
                    let slot = free.get_mut(index).ok_or_else(|| {
                        RuntimeError::Decode(format!("free variable {} out of range", index))
                    })?;
                    *slot = Value::Closure(closure.clone());
                }

                OpCode::LoadModule => {
                    let name = match self.pop()? {
                        Value::String(name) => name,
                        other => {
                            return Err(RuntimeError::module(format!(
                                "TypeError: import() expected argument #1 to be `str` got `{}`",
                                other.type_name()
                            )))
                        }
                    };
                    let module = module::load(self.state, &name)?;
                    self.push(module)?;
                }

                OpCode::LoadTrue => self.push(Value::Boolean(true))?,
                OpCode::LoadFalse => self.push(Value::Boolean(false))?,
                OpCode::LoadNull => self.push(Value::Null)?,

                // ============ Arithmetic & Bitwise ============
                OpCode::Add
                | OpCode::Sub
                | OpCode::Mul
                | OpCode::Div
                | OpCode::Mod
                | OpCode::Or
                | OpCode::And
                | OpCode::BitwiseOR
                | OpCode::BitwiseXOR
                | OpCode::BitwiseAND
                | OpCode::LeftShift
                | OpCode::RightShift => {
                    let right = self.pop()?;
                    let left = self.pop()?;
                    let result = binary_op(opcode, &left, &right)?;
                    self.push(result)?;
                }

                // ============ Comparison ============
                OpCode::Equal | OpCode::NotEqual | OpCode::GreaterThan | OpCode::GreaterThanEqual => {
                    let right = self.pop()?;
                    let left = self.pop()?;
                    let ordering = left.compare(&right);
                    let result = match opcode {
                        OpCode::Equal => ordering == 0,
                        OpCode::NotEqual => ordering != 0,
                        OpCode::GreaterThan => ordering == 1,
                        _ => ordering > -1,
                    };
                    self.push(Value::Boolean(result))?;
                }

                // ============ Unary ============
                OpCode::Minus => {
                    let value = match self.pop()? {
                        Value::Integer(n) => Value::Integer(n.wrapping_neg()),
                        other => return Err(unsupported_operand("-", &other)),
                    };
                    self.push(value)?;
                }

                OpCode::BitwiseNOT => {
                    let value = match self.pop()? {
                        Value::Integer(n) => Value::Integer(!n),
                        other => return Err(unsupported_operand("~", &other)),
                    };
                    self.push(value)?;
                }

                OpCode::Not => {
                    let value = match self.pop()? {
                        Value::Boolean(b) => !b,
                        Value::Null => true,
                        _ => false,
                    };
                    self.push(Value::Boolean(value))?;
                }

                // ============ Containers ============
                OpCode::GetItem => {
                    let index = self.pop()?;
                    let left = self.pop()?;
                    let value = get_item(&left, &index)?;
                    self.push(value)?;
                }

                OpCode::SetItem => {
                    let value = self.pop()?;
                    let index = self.pop()?;
                    let left = self.pop()?;
                    set_item(&left, index, value)?;
                    self.push(Value::Null)?;
                }

                OpCode::MakeArray => {
                    let count = self.read_u16_operand()?;
                    let elements = self.take_top(count)?;
                    self.push(Value::array(elements))?;
                }

                OpCode::MakeHash => {
                    let pairs = self.read_u16_operand()?;
                    let entries = self.take_top(pairs * 2)?;
                    let mut table = HashTable::with_capacity_and_hasher(pairs, Default::default());

                    let mut entries = entries.into_iter();
                    while let (Some(key), Some(value)) = (entries.next(), entries.next()) {
                        let hash_key = HashKey::from_value(&key).ok_or_else(|| {
                            RuntimeError::UnhashableKey(key.type_name().to_string())
                        })?;
                        table.insert(hash_key, HashPair { key, value });
                    }
                    self.push(Value::hash(table))?;
                }

                // ============ Control Flow ============
                OpCode::Jump => {
                    let target = self.read_u16_operand()?;
                    self.current_frame_mut()?.ip = target as isize - 1;
                }

                OpCode::JumpIfFalse => {
                    let target = self.read_u16_operand()?;
                    let condition = self.pop()?;
                    if !condition.is_truthy() {
                        self.current_frame_mut()?.ip = target as isize - 1;
                    }
                }

                // ============ Functions ============
                OpCode::Call => {
                    let arg_count = self.read_u8_operand()?;
                    self.call_value(arg_count)?;
                }

                OpCode::ReturnValue => {
                    let value = self.pop()?;
                    if self.return_from_frame(value)? {
                        return Ok(());
                    }
                }

                OpCode::Return => {
                    if self.return_from_frame(Value::Null)? {
                        return Ok(());
                    }
                }

                OpCode::MakeClosure => {
                    let const_index = self.read_u16_operand()?;
                    let free_count = self.read_u8_operand()?;

                    let func = match self.state.constants.get(const_index) {
                        Some(Value::CompiledFunction(func)) => func.clone(),
                        Some(other) => return Err(RuntimeError::NotAFunction(other.type_name().to_string())),
                        None => {
                            return Err(RuntimeError::Decode(format!(
                                "constant index {} out of range",
                                const_index
                            )))
                        }
                    };
                    let free = self.take_top(free_count)?;
                    self.push(Value::Closure(Rc::new(Closure::new(func, free))))?;
                }

                OpCode::Pop => {
                    self.last_popped = self.pop()?;
                }
            }
        }
    }

    // ===== Calls =====

    fn call_value(&mut self, arg_count: usize) -> VmResult<()> {
        if self.sp < arg_count + 1 {
            return Err(RuntimeError::StackUnderflow);
        }
        let callee = self.stack[self.sp - 1 - arg_count].clone();

        match callee {
            Value::Closure(closure) => self.call_closure(closure, arg_count),
            Value::Builtin(builtin) => {
                let result = builtin.call(&self.stack[self.sp - arg_count..self.sp]);
                self.sp -= arg_count + 1;
                self.push(result.unwrap_or(Value::Null))
            }
            other => Err(RuntimeError::NotCallable(other.type_name().to_string())),
        }
    }

    fn call_closure(&mut self, closure: Rc<Closure>, arg_count: usize) -> VmResult<()> {
        let func = closure.func.clone();
        if arg_count != func.num_parameters {
            return Err(RuntimeError::wrong_arity(func.num_parameters, arg_count));
        }

        let frame = self.current_frame()?;
        let next = frame
            .instructions()
            .get(frame.ip as usize + 1)
            .copied()
            .and_then(OpCode::from_u8);
        let is_tail_call = Rc::ptr_eq(&frame.closure.func, &func)
            && matches!(next, Some(OpCode::ReturnValue) | Some(OpCode::Return));

        if is_tail_call {
            // Reuse the current frame: arguments move down over the old ones.
            let base = frame.base_pointer;
            let args_start = self.sp - arg_count;
            for i in 0..arg_count {
                self.stack[base + i] = mem::replace(&mut self.stack[args_start + i], Value::Null);
            }
            // Old locals, the callee and its arguments are released.
            let sp = base + func.num_locals;
            let used = self.sp.max(sp);
            for slot in &mut self.stack[base + arg_count..used] {
                *slot = Value::Null;
            }
            self.sp = sp;

            let frame = self.current_frame_mut()?;
            frame.closure = closure;
            frame.ip = -1;
            return Ok(());
        }

        if self.frames.len() >= FRAMES_MAX {
            return Err(RuntimeError::StackOverflow);
        }
        let base = self.sp - arg_count;
        let sp = base + func.num_locals;
        if sp >= STACK_MAX {
            return Err(RuntimeError::StackOverflow);
        }

        for slot in &mut self.stack[base + arg_count..sp] {
            *slot = Value::Null;
        }
        self.frames.push(Frame::new(closure, base));
        self.sp = sp;
        Ok(())
    }

    /// Pop the current frame and hand `value` to the caller. Returns true
    /// when the outermost frame returned and the VM halts.
    fn return_from_frame(&mut self, value: Value) -> VmResult<bool> {
        if self.frames.len() <= 1 {
            self.frames.clear();
            self.last_popped = value;
            return Ok(true);
        }

        let frame = self.frames.pop().ok_or(RuntimeError::StackUnderflow)?;
        self.sp = frame.base_pointer.saturating_sub(1);
        self.push(value)?;
        Ok(false)
    }

    // ===== Frames & operands =====

    fn current_frame(&self) -> VmResult<&Frame> {
        self.frames
            .last()
            .ok_or_else(|| RuntimeError::Decode("no active call frame".to_string()))
    }

    fn current_frame_mut(&mut self) -> VmResult<&mut Frame> {
        self.frames
            .last_mut()
            .ok_or_else(|| RuntimeError::Decode("no active call frame".to_string()))
    }

    fn read_u8_operand(&mut self) -> VmResult<usize> {
        let frame = self.current_frame_mut()?;
        let offset = frame.ip as usize + 1;
        if offset >= frame.instructions().len() {
            return Err(RuntimeError::Decode("truncated instruction".to_string()));
        }
        let value = read_u8(frame.instructions(), offset);
        frame.ip += 1;
        Ok(value as usize)
    }

    fn read_u16_operand(&mut self) -> VmResult<usize> {
        let frame = self.current_frame_mut()?;
        let offset = frame.ip as usize + 1;
        if offset + 2 > frame.instructions().len() {
            return Err(RuntimeError::Decode("truncated instruction".to_string()));
        }
        let value = read_u16(frame.instructions(), offset);
        frame.ip += 2;
        Ok(value as usize)
    }

    /// Decode a local slot operand into an absolute stack index.
    fn local_slot(&mut self) -> VmResult<usize> {
        let index = self.read_u8_operand()?;
        let slot = self.current_frame()?.base_pointer + index;
        if slot >= STACK_MAX {
            return Err(RuntimeError::StackOverflow);
        }
        Ok(slot)
    }

    // ===== Stack =====

    fn push(&mut self, value: Value) -> VmResult<()> {
        if self.sp >= STACK_MAX {
            return Err(RuntimeError::StackOverflow);
        }
        self.stack[self.sp] = value;
        self.sp += 1;
        Ok(())
    }

    fn pop(&mut self) -> VmResult<Value> {
        if self.sp == 0 {
            return Err(RuntimeError::StackUnderflow);
        }
        self.sp -= 1;
        Ok(mem::replace(&mut self.stack[self.sp], Value::Null))
    }

    /// Remove the top `count` values, bottom first.
    fn take_top(&mut self, count: usize) -> VmResult<Vec<Value>> {
        if count > self.sp {
            return Err(RuntimeError::StackUnderflow);
        }
        let start = self.sp - count;
        let values = self.stack[start..self.sp]
            .iter_mut()
            .map(|slot| mem::replace(slot, Value::Null))
            .collect();
        self.sp = start;
        Ok(values)
    }

    fn trace_instruction(&self, ip: usize) {
        let Some(frame) = self.frames.last() else {
            return;
        };
        match format_instruction(frame.instructions(), ip, Some(&self.state.constants)) {
            Ok((text, _)) => {
                let (name, operands) = text.split_once(' ').unwrap_or((text.as_str(), ""));
                let position = format!(
                    "[ip={} fp={} sp={}]",
                    ip,
                    self.frames.len() - 1,
                    self.sp
                );
                eprintln!("{:04} {} {} {}", ip, name.cyan(), operands, position.dimmed());
            }
            Err(message) => eprintln!("{} {}", "ERROR:".red(), message),
        }
    }
}

// ===== Operators =====

fn unsupported_operand(op: &'static str, operand: &Value) -> RuntimeError {
    RuntimeError::UnsupportedOperand {
        op,
        operand: operand.type_name().to_string(),
    }
}

fn binary_op(op: OpCode, left: &Value, right: &Value) -> VmResult<Value> {
    match (left, right) {
        (Value::Integer(l), Value::Integer(r)) => integer_op(op, *l, *r),

        (Value::Hash(l), Value::Hash(r)) if op == OpCode::Add => {
            let mut merged = l.borrow().clone();
            for (key, pair) in r.borrow().iter() {
                merged.insert(*key, pair.clone());
            }
            Ok(Value::hash(merged))
        }

        (Value::Array(l), Value::Array(r)) if op == OpCode::Add => {
            let mut elements = l.borrow().clone();
            elements.extend(r.borrow().iter().cloned());
            Ok(Value::array(elements))
        }

        (Value::Array(array), Value::Integer(n)) | (Value::Integer(n), Value::Array(array))
            if op == OpCode::Mul =>
        {
            repeat_array(array, *n)
        }

        (Value::String(s), Value::Integer(n)) | (Value::Integer(n), Value::String(s))
            if op == OpCode::Mul =>
        {
            repeat_string(s, *n)
        }

        (Value::String(l), Value::String(r)) if op == OpCode::Add => {
            let mut joined = String::with_capacity(l.len() + r.len());
            joined.push_str(l);
            joined.push_str(r);
            Ok(Value::String(joined))
        }

        (Value::Boolean(l), Value::Boolean(r)) if op == OpCode::Or => Ok(Value::Boolean(*l || *r)),
        (Value::Boolean(l), Value::Boolean(r)) if op == OpCode::And => Ok(Value::Boolean(*l && *r)),

        _ => Err(RuntimeError::unsupported_operands(
            left.type_name(),
            right.type_name(),
        )),
    }
}

/// Length of the repeated result, or `RepeatTooLarge` when it exceeds
/// `MAX_REPEAT_LEN`.
fn repeat_len(len: usize, n: i64) -> VmResult<usize> {
    len.checked_mul(n as usize)
        .filter(|total| *total <= MAX_REPEAT_LEN)
        .ok_or(RuntimeError::RepeatTooLarge(n))
}

fn repeat_array(array: &ArrayRef, n: i64) -> VmResult<Value> {
    let elements = array.borrow();
    if n <= 1 {
        return Ok(Value::Array(array.clone()));
    }
    if elements.is_empty() {
        return Ok(Value::array(Vec::new()));
    }

    let total = repeat_len(elements.len(), n)?;
    let mut repeated = Vec::new();
    repeated
        .try_reserve_exact(total)
        .map_err(|_| RuntimeError::RepeatTooLarge(n))?;
    for _ in 0..n {
        repeated.extend(elements.iter().cloned());
    }
    Ok(Value::array(repeated))
}

fn repeat_string(s: &str, n: i64) -> VmResult<Value> {
    if n <= 1 {
        return Ok(Value::String(s.to_string()));
    }
    if s.is_empty() {
        return Ok(Value::String(String::new()));
    }

    let total = repeat_len(s.len(), n)?;
    let mut repeated = String::new();
    repeated
        .try_reserve_exact(total)
        .map_err(|_| RuntimeError::RepeatTooLarge(n))?;
    for _ in 0..n {
        repeated.push_str(s);
    }
    Ok(Value::String(repeated))
}

fn integer_op(op: OpCode, l: i64, r: i64) -> VmResult<Value> {
    let result = match op {
        OpCode::Add => l.wrapping_add(r),
        OpCode::Sub => l.wrapping_sub(r),
        OpCode::Mul => l.wrapping_mul(r),
        OpCode::Div => {
            if r == 0 {
                return Err(RuntimeError::DivisionByZero);
            }
            l.wrapping_div(r)
        }
        OpCode::Mod => {
            if r == 0 {
                return Err(RuntimeError::DivisionByZero);
            }
            l.wrapping_rem(r)
        }
        OpCode::BitwiseOR => l | r,
        OpCode::BitwiseXOR => l ^ r,
        OpCode::BitwiseAND => l & r,
        OpCode::LeftShift => {
            if r < 0 {
                return Err(RuntimeError::NegativeShift(r));
            }
            if r >= 64 {
                0
            } else {
                l.wrapping_shl(r as u32)
            }
        }
        OpCode::RightShift => {
            if r < 0 {
                return Err(RuntimeError::NegativeShift(r));
            }
            if r >= 64 {
                if l < 0 {
                    -1
                } else {
                    0
                }
            } else {
                l >> r
            }
        }
        _ => return Err(RuntimeError::unsupported_operands("int", "int")),
    };
    Ok(Value::Integer(result))
}

// ===== Indexing =====

fn get_item(left: &Value, index: &Value) -> VmResult<Value> {
    match (left, index) {
        (Value::String(s), Value::Integer(i)) => {
            let byte = usize::try_from(*i).ok().and_then(|i| s.as_bytes().get(i));
            Ok(Value::String(
                byte.map(|b| char::from(*b).to_string()).unwrap_or_default(),
            ))
        }
        (Value::String(s), Value::String(needle)) => Ok(Value::Integer(
            s.find(needle.as_str()).map_or(-1, |position| position as i64),
        )),
        (Value::Array(elements), Value::Integer(i)) => {
            let elements = elements.borrow();
            let value = usize::try_from(*i).ok().and_then(|i| elements.get(i)).cloned();
            Ok(value.unwrap_or(Value::Null))
        }
        (Value::Hash(hash), key) => hash_lookup(hash, key),
        (Value::Module(module), key) => hash_lookup(&module.attrs, key),
        _ => Err(RuntimeError::IndexNotSupported {
            left: left.type_name().to_string(),
            index: index.type_name().to_string(),
        }),
    }
}

fn hash_lookup(hash: &HashRef, key: &Value) -> VmResult<Value> {
    let hash_key = HashKey::from_value(key)
        .ok_or_else(|| RuntimeError::UnhashableKey(key.type_name().to_string()))?;
    let table = hash.borrow();
    let value = table.get(&hash_key).map(|pair| pair.value.clone());
    Ok(value.unwrap_or(Value::Null))
}

fn set_item(left: &Value, index: Value, value: Value) -> VmResult<()> {
    match left {
        Value::Array(elements) => {
            let i = match index {
                Value::Integer(i) => i,
                other => {
                    return Err(RuntimeError::SetItemNotSupported {
                        left: left.type_name().to_string(),
                        index: other.type_name().to_string(),
                    })
                }
            };
            let mut elements = elements.borrow_mut();
            let slot = usize::try_from(i)
                .ok()
                .and_then(|i| elements.get_mut(i))
                .ok_or(RuntimeError::IndexOutOfBounds(i))?;
            *slot = value;
            Ok(())
        }
        Value::Hash(hash) => {
            let hash_key = HashKey::from_value(&index)
                .ok_or_else(|| RuntimeError::UnhashableKey(index.type_name().to_string()))?;
            hash.borrow_mut().insert(hash_key, HashPair { key: index, value });
            Ok(())
        }
        _ => Err(RuntimeError::SetItemNotSupported {
            left: left.type_name().to_string(),
            index: index.type_name().to_string(),
        }),
    }
}
