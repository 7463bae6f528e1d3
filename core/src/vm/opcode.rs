use std::fmt;

use once_cell::sync::Lazy;
use rustc_hash::FxHashMap;

/// One-byte opcodes of the stack VM. Every instruction is two bytes wide:
/// the opcode followed by an 8-bit argument, widened by `EXTENDED_ARG`
/// prefixes when needed. Discriminants double as the encoded byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    Nop = 0,
    PopTop = 1,
    LoadConst = 2,
    LoadFast = 3,
    StoreFast = 4,
    LoadGlobal = 5,
    StoreGlobal = 6,
    BinaryAdd = 7,
    BinarySubtract = 8,
    BinarySubscr = 9,
    StoreSubscr = 10,
    BuildMap = 11,
    CompareOp = 12,
    PopJumpIfFalse = 13,
    PopJumpIfTrue = 14,
    JumpAbsolute = 15,
    GetIter = 16,
    ForIter = 17,
    CallFunction = 18,
    ReturnValue = 19,
    RaiseAssertion = 20,
    ExtendedArg = 21,
}

impl Opcode {
    /// Indexed by encoded byte.
    pub const ALL: [Opcode; 22] = [
        Opcode::Nop,
        Opcode::PopTop,
        Opcode::LoadConst,
        Opcode::LoadFast,
        Opcode::StoreFast,
        Opcode::LoadGlobal,
        Opcode::StoreGlobal,
        Opcode::BinaryAdd,
        Opcode::BinarySubtract,
        Opcode::BinarySubscr,
        Opcode::StoreSubscr,
        Opcode::BuildMap,
        Opcode::CompareOp,
        Opcode::PopJumpIfFalse,
        Opcode::PopJumpIfTrue,
        Opcode::JumpAbsolute,
        Opcode::GetIter,
        Opcode::ForIter,
        Opcode::CallFunction,
        Opcode::ReturnValue,
        Opcode::RaiseAssertion,
        Opcode::ExtendedArg,
    ];

    #[inline]
    pub fn from_byte(byte: u8) -> Option<Self> {
        Self::ALL.get(byte as usize).copied()
    }

    pub fn from_name(name: &str) -> Option<Self> {
        OPCODE_BY_NAME.get(name).copied()
    }

    pub fn name(self) -> &'static str {
        match self {
            Opcode::Nop => "NOP",
            Opcode::PopTop => "POP_TOP",
            Opcode::LoadConst => "LOAD_CONST",
            Opcode::LoadFast => "LOAD_FAST",
            Opcode::StoreFast => "STORE_FAST",
            Opcode::LoadGlobal => "LOAD_GLOBAL",
            Opcode::StoreGlobal => "STORE_GLOBAL",
            Opcode::BinaryAdd => "BINARY_ADD",
            Opcode::BinarySubtract => "BINARY_SUBTRACT",
            Opcode::BinarySubscr => "BINARY_SUBSCR",
            Opcode::StoreSubscr => "STORE_SUBSCR",
            Opcode::BuildMap => "BUILD_MAP",
            Opcode::CompareOp => "COMPARE_OP",
            Opcode::PopJumpIfFalse => "POP_JUMP_IF_FALSE",
            Opcode::PopJumpIfTrue => "POP_JUMP_IF_TRUE",
            Opcode::JumpAbsolute => "JUMP_ABSOLUTE",
            Opcode::GetIter => "GET_ITER",
            Opcode::ForIter => "FOR_ITER",
            Opcode::CallFunction => "CALL_FUNCTION",
            Opcode::ReturnValue => "RETURN_VALUE",
            Opcode::RaiseAssertion => "RAISE_ASSERTION",
            Opcode::ExtendedArg => "EXTENDED_ARG",
        }
    }

    /// Whether the argument byte carries meaning. Arg-less opcodes are still
    /// encoded with a zero argument byte.
    pub fn has_arg(self) -> bool {
        !matches!(
            self,
            Opcode::Nop
                | Opcode::PopTop
                | Opcode::BinaryAdd
                | Opcode::BinarySubtract
                | Opcode::BinarySubscr
                | Opcode::StoreSubscr
                | Opcode::GetIter
                | Opcode::ReturnValue
        )
    }

    /// Jump arguments are absolute instruction indices.
    pub fn is_jump(self) -> bool {
        matches!(
            self,
            Opcode::PopJumpIfFalse | Opcode::PopJumpIfTrue | Opcode::JumpAbsolute | Opcode::ForIter
        )
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

static OPCODE_BY_NAME: Lazy<FxHashMap<&'static str, Opcode>> =
    Lazy::new(|| Opcode::ALL.iter().map(|op| (op.name(), *op)).collect());

/// Human-readable name for a raw opcode byte.
pub fn opname(byte: u8) -> &'static str {
    Opcode::from_byte(byte).map(Opcode::name).unwrap_or("<unknown>")
}

/// `COMPARE_OP` argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CmpOp {
    Lt = 0,
    Le = 1,
    Eq = 2,
    Ne = 3,
    Gt = 4,
    Ge = 5,
}

impl CmpOp {
    pub fn from_arg(arg: u32) -> Option<Self> {
        match arg {
            0 => Some(CmpOp::Lt),
            1 => Some(CmpOp::Le),
            2 => Some(CmpOp::Eq),
            3 => Some(CmpOp::Ne),
            4 => Some(CmpOp::Gt),
            5 => Some(CmpOp::Ge),
            _ => None,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
            CmpOp::Eq => "==",
            CmpOp::Ne => "!=",
            CmpOp::Gt => ">",
            CmpOp::Ge => ">=",
        }
    }
}
