//! Assembler for [`Code`] objects.
//!
//! Instructions are collected with symbolic operands and resolved in
//! [`CodeBuilder::build`]. Jump targets are instruction indices, so an
//! operand that outgrows one byte needs `EXTENDED_ARG` prefixes, which in turn
//! shift every later target. Sizes are recomputed until they stop growing.

use std::fmt;
use std::rc::Rc;

use super::code::{Code, LineEntry};
use super::opcode::{CmpOp, Opcode};
use super::value::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
    UnboundLabel(usize),
    LabelRebound(usize),
    MissingOperand(Opcode),
    UnexpectedOperand(Opcode),
    NotAJump(Opcode),
    DuplicateParam(String),
    ParamAfterLocal(String),
}

impl fmt::Display for BuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildError::UnboundLabel(id) => write!(f, "label {} was never bound", id),
            BuildError::LabelRebound(id) => write!(f, "label {} bound more than once", id),
            BuildError::MissingOperand(op) => write!(f, "{} requires an argument", op),
            BuildError::UnexpectedOperand(op) => write!(f, "{} takes no argument", op),
            BuildError::NotAJump(op) => write!(f, "{} cannot take a label", op),
            BuildError::DuplicateParam(name) => write!(f, "duplicate parameter '{}'", name),
            BuildError::ParamAfterLocal(name) => {
                write!(f, "parameter '{}' declared after a local", name)
            }
        }
    }
}

impl std::error::Error for BuildError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Label(usize);

#[derive(Debug, Clone, Copy)]
enum Operand {
    None,
    Imm(u32),
    Label(Label),
}

#[derive(Debug, Clone, Copy)]
struct Pending {
    op: Opcode,
    operand: Operand,
    line: u32,
}

pub struct CodeBuilder {
    name: Rc<str>,
    argcount: usize,
    varnames: Vec<Rc<str>>,
    names: Vec<Rc<str>>,
    consts: Vec<Value>,
    items: Vec<Pending>,
    labels: Vec<Option<usize>>,
    line: u32,
    error: Option<BuildError>,
}

impl CodeBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            name: Rc::from(name),
            argcount: 0,
            varnames: Vec::new(),
            names: Vec::new(),
            consts: Vec::new(),
            items: Vec::new(),
            labels: Vec::new(),
            line: 1,
            error: None,
        }
    }

    fn fail(&mut self, err: BuildError) {
        if self.error.is_none() {
            self.error = Some(err);
        }
    }

    /// Declares the next positional parameter. Parameters occupy the first
    /// local slots, so they must precede any other local.
    pub fn param(&mut self, name: &str) -> &mut Self {
        if self.varnames.iter().any(|v| &**v == name) {
            self.fail(BuildError::DuplicateParam(name.to_string()));
        } else if self.varnames.len() != self.argcount {
            self.fail(BuildError::ParamAfterLocal(name.to_string()));
        } else {
            self.varnames.push(Rc::from(name));
            self.argcount += 1;
        }
        self
    }

    pub fn local(&mut self, name: &str) -> u32 {
        intern(&mut self.varnames, name)
    }

    pub fn name(&mut self, name: &str) -> u32 {
        intern(&mut self.names, name)
    }

    /// Adds a constant, reusing an equal one already in the pool.
    pub fn constant(&mut self, value: Value) -> u32 {
        if let Some(idx) = self.consts.iter().position(|c| *c == value) {
            return idx as u32;
        }
        self.consts.push(value);
        (self.consts.len() - 1) as u32
    }

    /// Sets the source line recorded for subsequent instructions.
    pub fn line(&mut self, line: u32) -> &mut Self {
        self.line = line;
        self
    }

    pub fn new_label(&mut self) -> Label {
        self.labels.push(None);
        Label(self.labels.len() - 1)
    }

    /// Binds `label` to the next emitted instruction.
    pub fn bind(&mut self, label: Label) -> &mut Self {
        let next = self.items.len();
        let bound = match self.labels.get_mut(label.0) {
            Some(slot) if slot.is_none() => {
                *slot = Some(next);
                true
            }
            _ => false,
        };
        if !bound {
            self.fail(BuildError::LabelRebound(label.0));
        }
        self
    }

    pub fn emit(&mut self, op: Opcode) -> &mut Self {
        if op.has_arg() {
            self.fail(BuildError::MissingOperand(op));
        }
        self.push(op, Operand::None)
    }

    pub fn emit_arg(&mut self, op: Opcode, arg: u32) -> &mut Self {
        if !op.has_arg() {
            self.fail(BuildError::UnexpectedOperand(op));
        }
        self.push(op, Operand::Imm(arg))
    }

    pub fn emit_jump(&mut self, op: Opcode, target: Label) -> &mut Self {
        if !op.is_jump() {
            self.fail(BuildError::NotAJump(op));
        }
        self.push(op, Operand::Label(target))
    }

    fn push(&mut self, op: Opcode, operand: Operand) -> &mut Self {
        self.items.push(Pending {
            op,
            operand,
            line: self.line,
        });
        self
    }

    pub fn load_const(&mut self, value: Value) -> &mut Self {
        let idx = self.constant(value);
        self.emit_arg(Opcode::LoadConst, idx)
    }

    pub fn load_fast(&mut self, name: &str) -> &mut Self {
        let idx = self.local(name);
        self.emit_arg(Opcode::LoadFast, idx)
    }

    pub fn store_fast(&mut self, name: &str) -> &mut Self {
        let idx = self.local(name);
        self.emit_arg(Opcode::StoreFast, idx)
    }

    pub fn load_global(&mut self, name: &str) -> &mut Self {
        let idx = self.name(name);
        self.emit_arg(Opcode::LoadGlobal, idx)
    }

    pub fn store_global(&mut self, name: &str) -> &mut Self {
        let idx = self.name(name);
        self.emit_arg(Opcode::StoreGlobal, idx)
    }

    pub fn compare(&mut self, op: CmpOp) -> &mut Self {
        self.emit_arg(Opcode::CompareOp, op as u32)
    }

    pub fn call(&mut self, argc: u32) -> &mut Self {
        self.emit_arg(Opcode::CallFunction, argc)
    }

    pub fn ret(&mut self) -> &mut Self {
        self.emit(Opcode::ReturnValue)
    }

    pub fn raise_assertion(&mut self, message: &str) -> &mut Self {
        let idx = self.constant(Value::from(message));
        self.emit_arg(Opcode::RaiseAssertion, idx)
    }

    pub fn build(self) -> Result<Code, BuildError> {
        if let Some(err) = self.error {
            return Err(err);
        }
        let mut label_items = Vec::with_capacity(self.labels.len());
        for (id, slot) in self.labels.iter().enumerate() {
            label_items.push(slot.ok_or(BuildError::UnboundLabel(id))?);
        }

        // Each item occupies `units[i]` instructions: itself plus prefixes.
        let mut units = vec![1usize; self.items.len()];
        let mut starts = vec![0usize; self.items.len() + 1];
        loop {
            for i in 0..self.items.len() {
                starts[i + 1] = starts[i] + units[i];
            }
            let mut grew = false;
            for (i, item) in self.items.iter().enumerate() {
                let arg = resolve(item.operand, &label_items, &starts);
                let need = units_for(arg);
                if need > units[i] {
                    units[i] = need;
                    grew = true;
                }
            }
            if !grew {
                break;
            }
        }

        let mut bytes = Vec::with_capacity(starts[self.items.len()] * 2);
        let mut lines: Vec<LineEntry> = Vec::new();
        for (i, item) in self.items.iter().enumerate() {
            if lines.last().map(|entry| entry.line) != Some(item.line) {
                lines.push(LineEntry {
                    start: bytes.len(),
                    line: item.line,
                });
            }
            let arg = resolve(item.operand, &label_items, &starts);
            for shift in (1..units[i]).rev() {
                bytes.push(Opcode::ExtendedArg as u8);
                bytes.push(((arg >> (8 * shift)) & 0xFF) as u8);
            }
            bytes.push(item.op as u8);
            bytes.push((arg & 0xFF) as u8);
        }

        Ok(Code {
            name: self.name,
            argcount: self.argcount,
            varnames: self.varnames,
            names: self.names,
            consts: self.consts,
            bytes,
            lines,
        })
    }
}

fn intern(table: &mut Vec<Rc<str>>, name: &str) -> u32 {
    if let Some(idx) = table.iter().position(|n| &**n == name) {
        return idx as u32;
    }
    table.push(Rc::from(name));
    (table.len() - 1) as u32
}

fn resolve(operand: Operand, label_items: &[usize], starts: &[usize]) -> u32 {
    match operand {
        Operand::None => 0,
        Operand::Imm(arg) => arg,
        Operand::Label(Label(id)) => starts[label_items[id]] as u32,
    }
}

fn units_for(arg: u32) -> usize {
    match arg {
        0..=0xFF => 1,
        0x100..=0xFFFF => 2,
        0x1_0000..=0xFF_FFFF => 3,
        _ => 4,
    }
}
