use std::fmt::{self, Write as _};
use std::rc::Rc;

use super::opcode::{CmpOp, Opcode};
use super::value::Value;

/// Maps the instruction starting at byte `start` (and everything after it,
/// up to the next entry) to a source line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineEntry {
    pub start: usize,
    pub line: u32,
}

/// Immutable compiled function body. Produced by
/// [`CodeBuilder`](super::CodeBuilder); the wordcode is validated there.
pub struct Code {
    pub(super) name: Rc<str>,
    pub(super) argcount: usize,
    pub(super) varnames: Vec<Rc<str>>,
    pub(super) names: Vec<Rc<str>>,
    pub(super) consts: Vec<Value>,
    pub(super) bytes: Vec<u8>,
    pub(super) lines: Vec<LineEntry>,
}

impl Code {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn argcount(&self) -> usize {
        self.argcount
    }

    pub fn nlocals(&self) -> usize {
        self.varnames.len()
    }

    pub fn varnames(&self) -> &[Rc<str>] {
        &self.varnames
    }

    pub fn names(&self) -> &[Rc<str>] {
        &self.names
    }

    pub fn consts(&self) -> &[Value] {
        &self.consts
    }

    /// Raw wordcode: `[opcode, arg, opcode, arg, ...]`.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn lines(&self) -> &[LineEntry] {
        &self.lines
    }

    /// Number of encoded instructions, `EXTENDED_ARG` prefixes included.
    pub fn instruction_count(&self) -> usize {
        self.bytes.len() / 2
    }

    pub fn line_at(&self, offset: usize) -> u32 {
        let idx = self.lines.partition_point(|entry| entry.start <= offset);
        match idx.checked_sub(1) {
            Some(i) => self.lines[i].line,
            None => 0,
        }
    }

    pub fn is_line_start(&self, offset: usize) -> bool {
        self.lines.binary_search_by_key(&offset, |entry| entry.start).is_ok()
    }

    pub fn instructions(&self) -> Instructions<'_> {
        Instructions {
            bytes: &self.bytes,
            offset: 0,
            ext: 0,
        }
    }

    pub fn disassemble(&self) -> String {
        let mut out = String::new();
        let mut last_line = None;
        for ins in self.instructions() {
            let line = self.line_at(ins.offset);
            if last_line != Some(line) {
                if last_line.is_some() {
                    out.push('\n');
                }
                let _ = write!(out, "{:>4}", line);
                last_line = Some(line);
            } else {
                out.push_str("    ");
            }
            let _ = write!(out, " {:>6} {:<18}", ins.offset, ins.opcode.name());
            if ins.opcode.has_arg() {
                let _ = write!(out, " {}", ins.arg);
                if let Some(note) = self.annotate(&ins) {
                    let _ = write!(out, " ({})", note);
                }
            }
            out.push('\n');
        }
        out
    }

    fn annotate(&self, ins: &Instruction) -> Option<String> {
        let idx = ins.arg as usize;
        match ins.opcode {
            Opcode::LoadConst | Opcode::RaiseAssertion => self.consts.get(idx).map(|v| format!("{:?}", v)),
            Opcode::LoadFast | Opcode::StoreFast => self.varnames.get(idx).map(|n| n.to_string()),
            Opcode::LoadGlobal | Opcode::StoreGlobal => self.names.get(idx).map(|n| n.to_string()),
            Opcode::CompareOp => CmpOp::from_arg(ins.arg).map(|op| op.symbol().to_string()),
            op if op.is_jump() => Some(format!("to {}", idx * 2)),
            _ => None,
        }
    }
}

impl fmt::Debug for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Code")
            .field("name", &self.name)
            .field("argcount", &self.argcount)
            .field("nlocals", &self.varnames.len())
            .field("instructions", &self.instruction_count())
            .finish()
    }
}

/// Decoded instruction. `arg` already has preceding `EXTENDED_ARG` bytes
/// folded in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    pub offset: usize,
    pub opcode: Opcode,
    pub arg: u32,
}

pub struct Instructions<'a> {
    bytes: &'a [u8],
    offset: usize,
    ext: u32,
}

impl Iterator for Instructions<'_> {
    type Item = Instruction;

    fn next(&mut self) -> Option<Instruction> {
        let &[op, low] = self.bytes.get(self.offset..self.offset + 2)? else {
            return None;
        };
        let opcode = Opcode::from_byte(op)?;
        let arg = self.ext | u32::from(low);
        let ins = Instruction {
            offset: self.offset,
            opcode,
            arg,
        };
        self.ext = if opcode == Opcode::ExtendedArg { arg << 8 } else { 0 };
        self.offset += 2;
        Some(ins)
    }
}
