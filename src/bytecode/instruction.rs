//! Bytecode instruction definitions: opcodes, operand widths, encoding and
//! decoding.
//!
//! An instruction is one opcode byte followed by its operands. Operands are
//! one or two bytes wide and two-byte operands are big-endian.

/// A flat stream of encoded instructions.
pub type Instructions = Vec<u8>;

/// Opcodes for the virtual machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OpCode {
    // ============ Loads & Stores ============
    /// Push a constant: LoadConstant <index:u16>
    LoadConstant = 0,
    /// Push a builtin: LoadBuiltin <index:u8>
    LoadBuiltin,
    /// Push a global: LoadGlobal <index:u16>
    LoadGlobal,
    /// Pop into a global, copying value types: BindGlobal <index:u16>
    BindGlobal,
    /// Pop into an existing global as-is: AssignGlobal <index:u16>
    AssignGlobal,
    /// Push a local: LoadLocal <slot:u8>
    LoadLocal,
    /// Pop into a local, copying value types: BindLocal <slot:u8>
    BindLocal,
    /// Pop into an existing local as-is: AssignLocal <slot:u8>
    AssignLocal,
    /// Push a captured value of the current closure: LoadFree <index:u8>
    LoadFree,
    /// Store the current closure into its own free slot: SetSelf <index:u8>
    SetSelf,
    /// Pop a module name and push the loaded module
    LoadModule,
    /// Push true
    LoadTrue,
    /// Push false
    LoadFalse,
    /// Push null
    LoadNull,

    // ============ Arithmetic & Bitwise ============
    /// a + b
    Add,
    /// a - b
    Sub,
    /// a * b
    Mul,
    /// a / b
    Div,
    /// a % b
    Mod,
    /// a || b on booleans
    Or,
    /// a && b on booleans
    And,
    /// a | b
    BitwiseOR,
    /// a ^ b
    BitwiseXOR,
    /// a & b
    BitwiseAND,
    /// a << b
    LeftShift,
    /// a >> b
    RightShift,

    // ============ Comparison ============
    /// a == b
    Equal,
    /// a != b
    NotEqual,
    /// a > b. `<` is compiled by swapping the operands.
    GreaterThan,
    /// a >= b. `<=` is compiled by swapping the operands.
    GreaterThanEqual,

    // ============ Unary ============
    /// -a
    Minus,
    /// !a
    Not,
    /// ~a
    BitwiseNOT,

    // ============ Containers ============
    /// Pop index and container, push container[index]
    GetItem,
    /// Pop value, index and container, store container[index] = value
    SetItem,
    /// Build an array from the top N values: MakeArray <count:u16>
    MakeArray,
    /// Build a hash from the top N key/value pairs: MakeHash <pairs:u16>
    MakeHash,

    // ============ Control Flow ============
    /// Jump to an absolute offset: Jump <target:u16>
    Jump,
    /// Pop and jump when falsy: JumpIfFalse <target:u16>
    JumpIfFalse,

    // ============ Functions ============
    /// Call the value below the arguments: Call <arg_count:u8>
    Call,
    /// Return null from the current frame
    Return,
    /// Pop and return a value from the current frame
    ReturnValue,
    /// Build a closure: MakeClosure <const_index:u16> <free_count:u8>
    MakeClosure,

    /// Discard the top of the stack
    Pop,
}

/// Every opcode, indexed by its byte value.
const ALL_OPCODES: [OpCode; 44] = [
    OpCode::LoadConstant,
    OpCode::LoadBuiltin,
    OpCode::LoadGlobal,
    OpCode::BindGlobal,
    OpCode::AssignGlobal,
    OpCode::LoadLocal,
    OpCode::BindLocal,
    OpCode::AssignLocal,
    OpCode::LoadFree,
    OpCode::SetSelf,
    OpCode::LoadModule,
    OpCode::LoadTrue,
    OpCode::LoadFalse,
    OpCode::LoadNull,
    OpCode::Add,
    OpCode::Sub,
    OpCode::Mul,
    OpCode::Div,
    OpCode::Mod,
    OpCode::Or,
    OpCode::And,
    OpCode::BitwiseOR,
    OpCode::BitwiseXOR,
    OpCode::BitwiseAND,
    OpCode::LeftShift,
    OpCode::RightShift,
    OpCode::Equal,
    OpCode::NotEqual,
    OpCode::GreaterThan,
    OpCode::GreaterThanEqual,
    OpCode::Minus,
    OpCode::Not,
    OpCode::BitwiseNOT,
    OpCode::GetItem,
    OpCode::SetItem,
    OpCode::MakeArray,
    OpCode::MakeHash,
    OpCode::Jump,
    OpCode::JumpIfFalse,
    OpCode::Call,
    OpCode::Return,
    OpCode::ReturnValue,
    OpCode::MakeClosure,
    OpCode::Pop,
];

const NO_OPERANDS: &[usize] = &[];
const U8_OPERAND: &[usize] = &[1];
const U16_OPERAND: &[usize] = &[2];
const CLOSURE_OPERANDS: &[usize] = &[2, 1];

/// Name and operand layout of an opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Definition {
    pub name: &'static str,
    pub operand_widths: &'static [usize],
}

impl Definition {
    /// Total size of the instruction in bytes, opcode included.
    pub fn instruction_len(&self) -> usize {
        1 + self.operand_widths.iter().sum::<usize>()
    }
}

impl OpCode {
    pub fn definition(self) -> Definition {
        let (name, operand_widths) = match self {
            OpCode::LoadConstant => ("LoadConstant", U16_OPERAND),
            OpCode::LoadBuiltin => ("LoadBuiltin", U8_OPERAND),
            OpCode::LoadGlobal => ("LoadGlobal", U16_OPERAND),
            OpCode::BindGlobal => ("BindGlobal", U16_OPERAND),
            OpCode::AssignGlobal => ("AssignGlobal", U16_OPERAND),
            OpCode::LoadLocal => ("LoadLocal", U8_OPERAND),
            OpCode::BindLocal => ("BindLocal", U8_OPERAND),
            OpCode::AssignLocal => ("AssignLocal", U8_OPERAND),
            OpCode::LoadFree => ("LoadFree", U8_OPERAND),
            OpCode::SetSelf => ("SetSelf", U8_OPERAND),
            OpCode::LoadModule => ("LoadModule", NO_OPERANDS),
            OpCode::LoadTrue => ("LoadTrue", NO_OPERANDS),
            OpCode::LoadFalse => ("LoadFalse", NO_OPERANDS),
            OpCode::LoadNull => ("LoadNull", NO_OPERANDS),
            OpCode::Add => ("Add", NO_OPERANDS),
            OpCode::Sub => ("Sub", NO_OPERANDS),
            OpCode::Mul => ("Mul", NO_OPERANDS),
            OpCode::Div => ("Div", NO_OPERANDS),
            OpCode::Mod => ("Mod", NO_OPERANDS),
            OpCode::Or => ("Or", NO_OPERANDS),
            OpCode::And => ("And", NO_OPERANDS),
            OpCode::BitwiseOR => ("BitwiseOR", NO_OPERANDS),
            OpCode::BitwiseXOR => ("BitwiseXOR", NO_OPERANDS),
            OpCode::BitwiseAND => ("BitwiseAND", NO_OPERANDS),
            OpCode::LeftShift => ("LeftShift", NO_OPERANDS),
            OpCode::RightShift => ("RightShift", NO_OPERANDS),
            OpCode::Equal => ("Equal", NO_OPERANDS),
            OpCode::NotEqual => ("NotEqual", NO_OPERANDS),
            OpCode::GreaterThan => ("GreaterThan", NO_OPERANDS),
            OpCode::GreaterThanEqual => ("GreaterThanEqual", NO_OPERANDS),
            OpCode::Minus => ("Minus", NO_OPERANDS),
            OpCode::Not => ("Not", NO_OPERANDS),
            OpCode::BitwiseNOT => ("BitwiseNOT", NO_OPERANDS),
            OpCode::GetItem => ("GetItem", NO_OPERANDS),
            OpCode::SetItem => ("SetItem", NO_OPERANDS),
            OpCode::MakeArray => ("MakeArray", U16_OPERAND),
            OpCode::MakeHash => ("MakeHash", U16_OPERAND),
            OpCode::Jump => ("Jump", U16_OPERAND),
            OpCode::JumpIfFalse => ("JumpIfFalse", U16_OPERAND),
            OpCode::Call => ("Call", U8_OPERAND),
            OpCode::Return => ("Return", NO_OPERANDS),
            OpCode::ReturnValue => ("ReturnValue", NO_OPERANDS),
            OpCode::MakeClosure => ("MakeClosure", CLOSURE_OPERANDS),
            OpCode::Pop => ("Pop", NO_OPERANDS),
        };
        Definition {
            name,
            operand_widths,
        }
    }

    /// Convert from u8 to OpCode.
    pub fn from_u8(byte: u8) -> Option<OpCode> {
        ALL_OPCODES.get(byte as usize).copied()
    }
}

impl From<OpCode> for u8 {
    fn from(op: OpCode) -> u8 {
        op as u8
    }
}

/// Decode an opcode byte into its definition.
pub fn lookup(byte: u8) -> Result<(OpCode, Definition), String> {
    OpCode::from_u8(byte)
        .map(|op| (op, op.definition()))
        .ok_or_else(|| format!("undefined opcode {}", byte))
}

/// Encode one instruction.
///
/// Returns an empty sequence when `operands` does not match the opcode's
/// operand count.
pub fn make(op: OpCode, operands: &[usize]) -> Instructions {
    let def = op.definition();
    if operands.len() != def.operand_widths.len() {
        return Vec::new();
    }

    let mut instruction = Vec::with_capacity(def.instruction_len());
    instruction.push(u8::from(op));

    for (operand, width) in operands.iter().zip(def.operand_widths) {
        match width {
            2 => instruction.extend_from_slice(&(*operand as u16).to_be_bytes()),
            _ => instruction.push(*operand as u8),
        }
    }

    instruction
}

/// Decode the operands of one instruction from `bytes`, which starts right
/// after the opcode. Returns the operands and the number of bytes read.
pub fn read_operands(def: &Definition, bytes: &[u8]) -> (Vec<usize>, usize) {
    let mut operands = Vec::with_capacity(def.operand_widths.len());
    let mut offset = 0;

    for width in def.operand_widths {
        match width {
            2 => operands.push(read_u16(bytes, offset) as usize),
            _ => operands.push(read_u8(bytes, offset) as usize),
        }
        offset += width;
    }

    (operands, offset)
}

/// Read a big-endian u16 at `offset`. Missing bytes read as zero.
#[inline]
pub fn read_u16(bytes: &[u8], offset: usize) -> u16 {
    let hi = bytes.get(offset).copied().unwrap_or(0);
    let lo = bytes.get(offset + 1).copied().unwrap_or(0);
    u16::from_be_bytes([hi, lo])
}

#[inline]
pub fn read_u8(bytes: &[u8], offset: usize) -> u8 {
    bytes.get(offset).copied().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_roundtrip() {
        for i in 0..=OpCode::Pop as u8 {
            let op = OpCode::from_u8(i).expect("valid opcode");
            assert_eq!(i, op as u8);
        }
    }

    #[test]
    fn test_invalid_opcode() {
        assert!(OpCode::from_u8(255).is_none());
        assert_eq!(lookup(200).unwrap_err(), "undefined opcode 200");
    }

    #[test]
    fn test_make() {
        assert_eq!(
            make(OpCode::LoadConstant, &[65534]),
            vec![OpCode::LoadConstant as u8, 255, 254]
        );
        assert_eq!(make(OpCode::Add, &[]), vec![OpCode::Add as u8]);
        assert_eq!(make(OpCode::LoadLocal, &[255]), vec![OpCode::LoadLocal as u8, 255]);
        assert_eq!(
            make(OpCode::MakeClosure, &[65534, 255]),
            vec![OpCode::MakeClosure as u8, 255, 254, 255]
        );
    }

    #[test]
    fn test_make_with_wrong_operand_count_is_empty() {
        assert!(make(OpCode::LoadConstant, &[]).is_empty());
        assert!(make(OpCode::Add, &[1]).is_empty());
    }

    #[test]
    fn test_read_operands_inverts_make() {
        let cases: &[(OpCode, &[usize])] = &[
            (OpCode::LoadConstant, &[65535]),
            (OpCode::LoadLocal, &[255]),
            (OpCode::MakeClosure, &[65535, 255]),
            (OpCode::Call, &[3]),
            (OpCode::Pop, &[]),
        ];

        for (op, operands) in cases {
            let instruction = make(*op, operands);
            let def = op.definition();
            let (read, n) = read_operands(&def, &instruction[1..]);
            assert_eq!(n, def.instruction_len() - 1);
            assert_eq!(read.as_slice(), *operands);
        }
    }
}
