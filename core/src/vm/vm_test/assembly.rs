use super::*;

fn const_fn(value: i64) -> Code {
    let mut b = CodeBuilder::new("f");
    b.load_const(Value::Int(value)).ret();
    b.build().unwrap()
}

#[test]
fn test_simple_code_layout() {
    let code = const_fn(42);
    assert_eq!(code.bytes(), &[Opcode::LoadConst as u8, 0, Opcode::ReturnValue as u8, 0]);
    assert_eq!(code.instruction_count(), 2);
    assert_eq!(code.consts(), &[Value::Int(42)]);
    assert_eq!(code.argcount(), 0);
}

#[test]
fn test_constants_are_deduplicated() {
    let mut b = CodeBuilder::new("f");
    let a = b.constant(Value::Int(1));
    let s = b.constant(Value::from("x"));
    let again = b.constant(Value::Int(1));
    let other = b.constant(Value::Bool(true));
    assert_eq!(a, again);
    assert_ne!(a, s);
    assert_ne!(a, other);
}

#[test]
fn test_params_come_first_in_locals() {
    let mut b = CodeBuilder::new("f");
    b.param("a").param("b");
    assert_eq!(b.local("tmp"), 2);
    assert_eq!(b.local("a"), 0);
    b.load_fast("b").ret();
    let code = b.build().unwrap();
    assert_eq!(code.argcount(), 2);
    assert_eq!(code.nlocals(), 3);
    assert_eq!(&*code.varnames()[1], "b");
}

#[test]
fn test_labels_resolve_to_instruction_indices() {
    let mut b = CodeBuilder::new("f");
    let skip = b.new_label();
    b.load_const(Value::Bool(false))
        .emit_jump(Opcode::PopJumpIfFalse, skip)
        .load_const(Value::Int(1))
        .ret()
        .bind(skip)
        .load_const(Value::Int(2))
        .ret();
    let code = b.build().unwrap();
    let jump = code.instructions().nth(1).unwrap();
    assert_eq!(jump.opcode, Opcode::PopJumpIfFalse);
    assert_eq!(jump.arg, 4);

    let mut vm = Vm::new();
    let f = install(&mut vm, code);
    assert_eq!(vm.call(&f, vec![]).unwrap(), Value::Int(2));
}

#[test]
fn test_large_constant_index_uses_extended_arg() {
    let mut b = CodeBuilder::new("f");
    for i in 0..300 {
        b.constant(Value::Int(i));
    }
    b.load_const(Value::Int(299)).ret();
    let fresh = b.constant(Value::Int(1_000));
    assert_eq!(fresh, 300);
    let code = b.build().unwrap();

    let ops: Vec<Opcode> = code.instructions().map(|ins| ins.opcode).collect();
    assert_eq!(ops, vec![Opcode::ExtendedArg, Opcode::LoadConst, Opcode::ReturnValue]);
    let load = code.instructions().nth(1).unwrap();
    assert_eq!(load.arg, 299);

    let mut vm = Vm::new();
    let f = install(&mut vm, code);
    assert_eq!(vm.call(&f, vec![]).unwrap(), Value::Int(299));
}

#[test]
fn test_long_forward_jump_grows_prefix() {
    let mut b = CodeBuilder::new("f");
    let end = b.new_label();
    b.emit_jump(Opcode::JumpAbsolute, end);
    for _ in 0..300 {
        b.emit(Opcode::Nop);
    }
    b.bind(end).load_const(Value::Int(7)).ret();
    let code = b.build().unwrap();

    let first: Vec<_> = code.instructions().take(2).collect();
    assert_eq!(first[0].opcode, Opcode::ExtendedArg);
    assert_eq!(first[1].opcode, Opcode::JumpAbsolute);
    // Prefix + jump + 300 nops.
    assert_eq!(first[1].arg, 302);

    let mut vm = Vm::new();
    let f = install(&mut vm, code);
    assert_eq!(vm.call(&f, vec![]).unwrap(), Value::Int(7));
    assert_eq!(vm.instructions_executed(), 4);
}

#[test]
fn test_unbound_label_is_rejected() {
    let mut b = CodeBuilder::new("f");
    let nowhere = b.new_label();
    b.emit_jump(Opcode::JumpAbsolute, nowhere);
    assert_eq!(b.build().unwrap_err(), BuildError::UnboundLabel(0));
}

#[test]
fn test_label_bound_twice_is_rejected() {
    let mut b = CodeBuilder::new("f");
    let here = b.new_label();
    b.bind(here).emit(Opcode::Nop).bind(here).load_const(Value::None).ret();
    assert_eq!(b.build().unwrap_err(), BuildError::LabelRebound(0));
}

#[test]
fn test_operand_mismatches_are_rejected() {
    let mut b = CodeBuilder::new("f");
    b.emit(Opcode::LoadConst);
    assert_eq!(b.build().unwrap_err(), BuildError::MissingOperand(Opcode::LoadConst));

    let mut b = CodeBuilder::new("f");
    b.emit_arg(Opcode::PopTop, 3);
    assert_eq!(b.build().unwrap_err(), BuildError::UnexpectedOperand(Opcode::PopTop));

    let mut b = CodeBuilder::new("f");
    let l = b.new_label();
    b.bind(l).emit_jump(Opcode::LoadFast, l);
    assert_eq!(b.build().unwrap_err(), BuildError::NotAJump(Opcode::LoadFast));
}

#[test]
fn test_param_errors() {
    let mut b = CodeBuilder::new("f");
    b.param("n").param("n");
    assert_eq!(b.build().unwrap_err(), BuildError::DuplicateParam("n".into()));

    let mut b = CodeBuilder::new("f");
    b.local("x");
    b.param("n");
    assert_eq!(b.build().unwrap_err(), BuildError::ParamAfterLocal("n".into()));
}

#[test]
fn test_line_table() {
    let mut b = CodeBuilder::new("f");
    b.line(10).load_const(Value::Int(1)).emit(Opcode::PopTop);
    b.line(11).emit(Opcode::Nop);
    b.line(11).load_const(Value::None);
    b.line(12).ret();
    let code = b.build().unwrap();

    let starts: Vec<(usize, u32)> = code.lines().iter().map(|e| (e.start, e.line)).collect();
    assert_eq!(starts, vec![(0, 10), (4, 11), (8, 12)]);
    assert_eq!(code.line_at(0), 10);
    assert_eq!(code.line_at(2), 10);
    assert_eq!(code.line_at(6), 11);
    assert_eq!(code.line_at(8), 12);
    assert!(code.is_line_start(4));
    assert!(!code.is_line_start(6));
}

#[test]
fn test_disassembly_annotates_operands() {
    let mut b = CodeBuilder::new("f");
    b.param("n");
    let out = b.new_label();
    b.line(1)
        .load_fast("n")
        .load_const(Value::Int(3))
        .compare(CmpOp::Lt)
        .emit_jump(Opcode::PopJumpIfFalse, out);
    b.line(2).load_global("print").load_fast("n").call(1).emit(Opcode::PopTop);
    b.line(3).bind(out).load_const(Value::None).ret();
    let text = b.build().unwrap().disassemble();

    for expected in [
        format!("{:<18} 0 (n)", "LOAD_FAST"),
        format!("{:<18} 0 (<)", "COMPARE_OP"),
        format!("{:<18} 8 (to 16)", "POP_JUMP_IF_FALSE"),
        format!("{:<18} 0 (print)", "LOAD_GLOBAL"),
    ] {
        assert!(text.contains(&expected), "missing {:?} in\n{}", expected, text);
    }
    assert!(text.trim_end().ends_with("RETURN_VALUE"), "{}", text);
    assert_eq!(text.lines().filter(|l| l.is_empty()).count(), 2);
}
