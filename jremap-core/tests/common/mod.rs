//! Snapshot Builders
//!
//! Small constructors for hand-written class, method and instruction records
//! shared by the integration tests.

#![allow(dead_code)]

use jremap_core::remapper::bytecode::{access, opcodes, Constant, Insn};
use jremap_core::remapper::model::{ClassRecord, FieldRecord, MethodRecord, Snapshot};

pub fn simple(op: u8) -> Insn {
    Insn::Simple { op }
}

pub fn var(op: u8, var: u16) -> Insn {
    Insn::Var { op, var }
}

pub fn push_int(value: i32) -> Insn {
    match value {
        -1..=5 => Insn::Simple { op: (opcodes::ICONST_0 as i32 + value) as u8 },
        -128..=127 => Insn::Int { op: opcodes::BIPUSH, operand: value },
        -32768..=32767 => Insn::Int { op: opcodes::SIPUSH, operand: value },
        _ => Insn::Ldc { value: Constant::Int(value) },
    }
}

pub fn ldc_string(text: &str) -> Insn {
    Insn::Ldc { value: Constant::String(text.to_string()) }
}

pub fn new_object(class: &str) -> Insn {
    Insn::Type { op: opcodes::NEW, desc: class.to_string() }
}

pub fn call(op: u8, owner: &str, name: &str, desc: &str) -> Insn {
    Insn::Method {
        op,
        owner: owner.to_string(),
        name: name.to_string(),
        desc: desc.to_string(),
    }
}

pub fn invoke_static(owner: &str, name: &str, desc: &str) -> Insn {
    call(opcodes::INVOKESTATIC, owner, name, desc)
}

pub fn invoke_virtual(owner: &str, name: &str, desc: &str) -> Insn {
    call(opcodes::INVOKEVIRTUAL, owner, name, desc)
}

pub fn field_insn(op: u8, owner: &str, name: &str, desc: &str) -> Insn {
    Insn::Field {
        op,
        owner: owner.to_string(),
        name: name.to_string(),
        desc: desc.to_string(),
    }
}

pub fn method(name: &str, desc: &str, flags: u16, instructions: Vec<Insn>) -> MethodRecord {
    MethodRecord {
        name: name.to_string(),
        descriptor: desc.to_string(),
        access: flags,
        instructions,
        try_catch_blocks: vec![],
    }
}

pub fn field(name: &str, desc: &str, flags: u16) -> FieldRecord {
    FieldRecord {
        name: name.to_string(),
        descriptor: desc.to_string(),
        access: flags,
    }
}

/// Fluent builder for one `ClassRecord`.
pub struct ClassBuilder {
    record: ClassRecord,
}

impl ClassBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            record: ClassRecord {
                name: name.to_string(),
                super_name: Some("java/lang/Object".to_string()),
                interfaces: vec![],
                access: access::PUBLIC,
                methods: vec![],
                fields: vec![],
            },
        }
    }

    pub fn extends(mut self, super_name: &str) -> Self {
        self.record.super_name = Some(super_name.to_string());
        self
    }

    pub fn method(mut self, method: MethodRecord) -> Self {
        self.record.methods.push(method);
        self
    }

    pub fn field(mut self, field: FieldRecord) -> Self {
        self.record.fields.push(field);
        self
    }

    pub fn build(self) -> ClassRecord {
        self.record
    }
}

/// A method body that returns after calling each `(owner, name, desc)` and
/// loading each string.
pub fn body(calls: &[(&str, &str, &str)], strings: &[&str]) -> Vec<Insn> {
    let mut code: Vec<Insn> = Vec::new();
    for text in strings {
        code.push(ldc_string(text));
        code.push(simple(opcodes::POP));
    }
    for (owner, name, desc) in calls {
        code.push(invoke_static(owner, name, desc));
    }
    code.push(simple(opcodes::RETURN));
    code
}

pub fn snapshot(classes: Vec<ClassRecord>) -> Snapshot {
    Snapshot::new(classes)
}
