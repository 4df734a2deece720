//! Constant Stack Simulation
//!
//! Straight-line abstract interpretation of a window of JVM instructions,
//! tracking only which operand-stack slots and locals hold a known `int`.
//!
//! # Model
//! - Int constants (`ICONST_*`, `BIPUSH`, `SIPUSH`, `LDC int`) push `Known`
//! - Loads push the tracked local, or `Unknown`
//! - Stores keep a known value in the local and forget it otherwise
//! - Binary arithmetic pops two and pushes `Unknown`; negation keeps `Known`
//! - Field reads push `Unknown`, field writes pop their operands
//! - Array loads, comparisons and conversions push `Unknown`; array stores,
//!   conditional jumps and switches pop their operands
//! - Invokes pop their arguments (and receiver) and push `Unknown` for a
//!   non-void return
//!
//! Control flow is ignored: the window is treated as one basic block, and
//! instructions the model does not cover leave the frame unchanged.

use crate::remapper::bytecode::{opcodes, Insn};
use crate::remapper::descriptor::{parse_method_descriptor, JvmType};
use std::collections::HashMap;

/// Instructions simulated before a call site.
pub const WINDOW: usize = 300;

/// Abstract operand value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Value {
    Known(i32),
    Unknown,
}

impl Value {
    #[inline]
    pub fn known(self) -> Option<i32> {
        match self {
            Value::Known(v) => Some(v),
            Value::Unknown => None,
        }
    }
}

/// Operand stack plus the locals currently holding known constants.
#[derive(Debug, Default, Clone)]
pub struct Frame {
    stack: Vec<Value>,
    locals: HashMap<u16, Value>,
}

impl Frame {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn top(&self) -> Option<Value> {
        self.stack.last().copied()
    }

    #[inline]
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    #[inline]
    fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    /// Popping an empty stack is a no-op; the window may start mid-expression.
    #[inline]
    fn pop(&mut self) -> Option<Value> {
        self.stack.pop()
    }

    fn pop_n(&mut self, n: usize) {
        let keep = self.stack.len().saturating_sub(n);
        self.stack.truncate(keep);
    }

    fn invoke(&mut self, desc: &str, has_receiver: bool) {
        let Ok(method) = parse_method_descriptor(desc) else {
            log::debug!("Stack simulation: unparsable call descriptor {}", desc);
            return;
        };
        self.pop_n(method.params.len() + usize::from(has_receiver));
        if method.ret != JvmType::Void {
            self.push(Value::Unknown);
        }
    }

    /// Apply one instruction to the frame.
    pub fn step(&mut self, insn: &Insn) {
        if let Some(v) = insn.int_constant() {
            self.push(Value::Known(v));
            return;
        }

        match insn {
            Insn::Label { .. } => {}
            Insn::Ldc { .. } => self.push(Value::Unknown),
            Insn::Var { op, var } => match *op {
                opcodes::ILOAD | opcodes::LLOAD | opcodes::FLOAD | opcodes::DLOAD | opcodes::ALOAD => {
                    let value = self.locals.get(var).copied().unwrap_or(Value::Unknown);
                    self.push(value);
                }
                opcodes::ISTORE | opcodes::LSTORE | opcodes::FSTORE | opcodes::DSTORE | opcodes::ASTORE => {
                    match self.pop() {
                        Some(value @ Value::Known(_)) => {
                            self.locals.insert(*var, value);
                        }
                        Some(Value::Unknown) => {
                            self.locals.remove(var);
                        }
                        None => {}
                    }
                }
                _ => {}
            },
            Insn::Iinc { var, .. } => {
                self.locals.remove(var);
            }
            Insn::Simple { op } => self.simple(*op),
            Insn::Type { op, .. } => match *op {
                opcodes::NEW => self.push(Value::Unknown),
                opcodes::ANEWARRAY | opcodes::INSTANCEOF => {
                    self.pop();
                    self.push(Value::Unknown);
                }
                _ => {}
            },
            Insn::Int { op, .. } if *op == opcodes::NEWARRAY => {
                self.pop();
                self.push(Value::Unknown);
            }
            Insn::MultiANewArray { dims, .. } => {
                self.pop_n(usize::from(*dims));
                self.push(Value::Unknown);
            }
            Insn::Jump { op, .. } => match *op {
                opcodes::IFEQ..=opcodes::IFLE | opcodes::IFNULL | opcodes::IFNONNULL => self.pop_n(1),
                opcodes::IF_ICMPEQ..=opcodes::IF_ACMPNE => self.pop_n(2),
                opcodes::JSR => self.push(Value::Unknown),
                _ => {}
            },
            Insn::Switch { .. } => self.pop_n(1),
            Insn::Field { op, .. } => match *op {
                opcodes::GETSTATIC => self.push(Value::Unknown),
                opcodes::GETFIELD => {
                    self.pop();
                    self.push(Value::Unknown);
                }
                opcodes::PUTSTATIC => self.pop_n(1),
                opcodes::PUTFIELD => self.pop_n(2),
                _ => {}
            },
            Insn::Method { op, desc, .. } => self.invoke(desc, *op != opcodes::INVOKESTATIC),
            Insn::InvokeDynamic { desc, .. } => self.invoke(desc, false),
            _ => {}
        }
    }

    fn simple(&mut self, op: u8) {
        match op {
            opcodes::ACONST_NULL
            | opcodes::LCONST_0
            | opcodes::LCONST_1
            | opcodes::FCONST_0
            | opcodes::FCONST_1
            | opcodes::FCONST_2
            | opcodes::DCONST_0
            | opcodes::DCONST_1 => self.push(Value::Unknown),
            opcodes::IALOAD..=opcodes::SALOAD => {
                self.pop_n(2);
                self.push(Value::Unknown);
            }
            opcodes::IASTORE..=opcodes::SASTORE => self.pop_n(3),
            opcodes::LCMP..=opcodes::DCMPG => {
                self.pop_n(2);
                self.push(Value::Unknown);
            }
            opcodes::I2L..=opcodes::I2S | opcodes::ARRAYLENGTH => {
                self.pop();
                self.push(Value::Unknown);
            }
            opcodes::IRETURN..=opcodes::ARETURN | opcodes::ATHROW | opcodes::MONITORENTER | opcodes::MONITOREXIT => {
                self.pop_n(1)
            }
            opcodes::IADD..=opcodes::DREM
            | opcodes::ISHL..=opcodes::LXOR => {
                self.pop_n(2);
                self.push(Value::Unknown);
            }
            opcodes::INEG | opcodes::LNEG | opcodes::FNEG | opcodes::DNEG => {
                if let Some(value) = self.pop() {
                    self.push(value);
                }
            }
            opcodes::DUP => {
                if let Some(value) = self.top() {
                    self.push(value);
                }
            }
            opcodes::POP => self.pop_n(1),
            opcodes::POP2 => self.pop_n(2),
            opcodes::SWAP => {
                let len = self.stack.len();
                if len >= 2 {
                    self.stack.swap(len - 1, len - 2);
                }
            }
            _ => {}
        }
    }
}

/// Known value on top of the stack just before `instructions[index]`,
/// simulating at most [`WINDOW`] preceding instructions.
pub fn constant_before(instructions: &[Insn], index: usize) -> Option<i32> {
    let end = index.min(instructions.len());
    let start = end.saturating_sub(WINDOW);
    let mut frame = Frame::new();
    for insn in &instructions[start..end] {
        frame.step(insn);
    }
    frame.top().and_then(Value::known)
}
