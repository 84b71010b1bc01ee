//! Bytecode interpreter
//!
//! The [`Vm`] owns the frame-template registry, the call stack, the heap,
//! and the collector. `run()` instantiates `main` and dispatches
//! instructions until the call stack empties or the current frame's pc
//! falls past its last instruction, then prints the final heap contents.
//!
//! Collection runs at exactly two points. On `RET`, after the callee frame
//! is popped and the return value pushed, the caller's next opcode is
//! examined: if it would bind the value into a surviving location
//! (`STORE`/`SETF`/`SETI`), collection is deferred with a one-shot flag;
//! otherwise it runs immediately. A deferred collection runs right after
//! that bind completes, once the bound handle has been rooted and any
//! graph edge recorded.

use crate::error::{VmError, VmErrorKind};
use crate::frame::Frame;
use crate::gc::{Collector, GcStats};
use crate::heap::Heap;
use crate::value::Value;
use opal_bytecode::{FrameTemplate, Instruction, Opcode, Program};
use rustc_hash::FxHashMap;
use std::io::{self, BufRead, Write};
use std::rc::Rc;

/// The Opal virtual machine.
pub struct Vm {
    templates: FxHashMap<String, Rc<FrameTemplate>>,
    heap: Heap,
    collector: Collector,
    call_stack: Vec<Frame>,
    gc_deferred: bool,
    output: Box<dyn Write>,
    input: Box<dyn BufRead>,
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

impl Vm {
    /// Create a VM wired to stdin/stdout.
    pub fn new() -> Self {
        Self::with_io(
            Box::new(io::stdout()),
            Box::new(io::BufReader::new(io::stdin())),
        )
    }

    /// Create a VM with explicit I/O, e.g. capture buffers in tests.
    pub fn with_io(output: Box<dyn Write>, input: Box<dyn BufRead>) -> Self {
        Self {
            templates: FxHashMap::default(),
            heap: Heap::new(),
            collector: Collector::new(),
            call_stack: Vec::new(),
            gc_deferred: false,
            output,
            input,
        }
    }

    /// Register one frame template.
    pub fn add_template(&mut self, template: FrameTemplate) {
        self.templates
            .insert(template.name.clone(), Rc::new(template));
    }

    /// Register every template of a compiled program.
    pub fn load_program(&mut self, program: Program) {
        for template in program.templates {
            self.add_template(template);
        }
    }

    /// The heap, for inspection after a run.
    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    /// Collector statistics.
    pub fn gc_stats(&self) -> GcStats {
        self.collector.stats()
    }

    /// Run the program from `main` to completion.
    pub fn run(&mut self) -> Result<(), VmError> {
        let main = self
            .templates
            .get("main")
            .cloned()
            .ok_or_else(|| VmError::bare(VmErrorKind::MissingMain))?;
        self.call_stack.push(Frame::new(main));

        loop {
            let instruction = {
                let Some(frame) = self.call_stack.last_mut() else {
                    break;
                };
                if frame.pc >= frame.template.instructions.len() {
                    break;
                }
                let instruction = frame.template.instructions[frame.pc].clone();
                frame.pc += 1;
                instruction
            };
            if let Err(kind) = self.execute(instruction) {
                return Err(self.locate(kind));
            }
        }

        writeln!(self.output, "{}", self.heap.summary())
            .map_err(|e| VmError::bare(VmErrorKind::Io(e.to_string())))?;
        Ok(())
    }

    /// Attach the current frame's context to an error kind.
    fn locate(&self, kind: VmErrorKind) -> VmError {
        match self.call_stack.last() {
            Some(frame) => {
                let pc = frame.pc.saturating_sub(1);
                VmError::located(
                    kind,
                    frame.template.name.clone(),
                    pc,
                    frame.template.opcode_at(pc),
                )
            }
            None => VmError::bare(kind),
        }
    }

    fn frame_mut(&mut self) -> Result<&mut Frame, VmErrorKind> {
        self.call_stack.last_mut().ok_or(VmErrorKind::StackUnderflow)
    }

    fn pop(&mut self) -> Result<Value, VmErrorKind> {
        self.frame_mut()?.pop()
    }

    fn push(&mut self, value: Value) -> Result<(), VmErrorKind> {
        self.frame_mut()?.push(value);
        Ok(())
    }

    /// Run the deferred collection once a yellow-lit bind has completed.
    fn after_bind(&mut self) {
        if self.gc_deferred {
            self.collector.collect(&mut self.heap);
            self.gc_deferred = false;
        }
    }

    fn execute(&mut self, instruction: Instruction) -> Result<(), VmErrorKind> {
        match instruction {
            // ===== Literals and Variables =====
            Instruction::Push(literal) => self.push(Value::from(literal)),
            Instruction::Pop => self.pop().map(|_| ()),
            Instruction::Load(slot) => {
                let value = self.frame_mut()?.load(slot)?;
                self.push(value)
            }
            Instruction::Store(slot) => {
                let value = self.pop()?;
                self.collector.record_root(&value);
                self.frame_mut()?.store(slot, value);
                self.after_bind();
                Ok(())
            }

            // ===== Arithmetic and Logic =====
            Instruction::Add => self.binary_arith(Opcode::Add),
            Instruction::Sub => self.binary_arith(Opcode::Sub),
            Instruction::Mul => self.binary_arith(Opcode::Mul),
            Instruction::Div => self.binary_arith(Opcode::Div),
            Instruction::And | Instruction::Or => {
                let op = if matches!(instruction, Instruction::And) {
                    Opcode::And
                } else {
                    Opcode::Or
                };
                let b = self.pop()?;
                let a = self.pop()?;
                if a.is_null() || b.is_null() {
                    return Err(VmErrorKind::NullLogical);
                }
                match (a, b) {
                    (Value::Bool(x), Value::Bool(y)) => {
                        let result = if op == Opcode::And { x && y } else { x || y };
                        self.push(Value::Bool(result))
                    }
                    _ => Err(VmErrorKind::UnsupportedOperands { op }),
                }
            }
            Instruction::Not => {
                let value = self.pop()?;
                match value {
                    Value::Null => Err(VmErrorKind::NullLogical),
                    Value::Bool(b) => self.push(Value::Bool(!b)),
                    _ => Err(VmErrorKind::UnsupportedOperands { op: Opcode::Not }),
                }
            }

            // ===== Comparison =====
            Instruction::CmpLt => self.binary_order(Opcode::CmpLt),
            Instruction::CmpLe => self.binary_order(Opcode::CmpLe),
            Instruction::CmpEq => {
                let b = self.pop()?;
                let a = self.pop()?;
                self.push(Value::Bool(a.equals(&b)))
            }
            Instruction::CmpNe => {
                let b = self.pop()?;
                let a = self.pop()?;
                self.push(Value::Bool(!a.equals(&b)))
            }

            // ===== Control Flow =====
            Instruction::Jmp(target) => {
                self.frame_mut()?.pc = target;
                Ok(())
            }
            Instruction::JmpF(target) => {
                let condition = self.pop()?;
                if condition == Value::Bool(false) {
                    self.frame_mut()?.pc = target;
                }
                Ok(())
            }
            Instruction::Nop => Ok(()),

            // ===== Functions =====
            Instruction::Call(name) => {
                let template = self
                    .templates
                    .get(&name)
                    .cloned()
                    .ok_or_else(|| VmErrorKind::UnknownFunction { name: name.clone() })?;
                let mut callee = Frame::new(template);
                let arg_count = callee.template.arg_count;
                let caller = self.frame_mut()?;
                for _ in 0..arg_count {
                    let arg = caller.pop()?;
                    callee.operand_stack.push(arg);
                }
                self.call_stack.push(callee);
                self.collector.enter_call();
                Ok(())
            }
            Instruction::Ret => {
                let return_value = self.frame_mut()?.pop()?;
                self.call_stack.pop();
                if let Some(caller) = self.call_stack.last_mut() {
                    caller.push(return_value);
                    let binds = caller
                        .template
                        .opcode_at(caller.pc)
                        .is_some_and(|op| op.binds_value());
                    self.collector.unwind_call();
                    if binds {
                        self.gc_deferred = true;
                    } else {
                        self.collector.collect(&mut self.heap);
                    }
                }
                Ok(())
            }

            // ===== Built-ins =====
            Instruction::Write => {
                let value = self.pop()?;
                write!(self.output, "{}", value)
                    .and_then(|_| self.output.flush())
                    .map_err(|e| VmErrorKind::Io(e.to_string()))
            }
            Instruction::Read => {
                let mut line = String::new();
                let read = self
                    .input
                    .read_line(&mut line)
                    .map_err(|e| VmErrorKind::Io(e.to_string()))?;
                if read == 0 {
                    return Err(VmErrorKind::EndOfInput);
                }
                while line.ends_with('\n') || line.ends_with('\r') {
                    line.pop();
                }
                self.push(Value::Str(line))
            }
            Instruction::Len => {
                let value = self.pop()?;
                match value {
                    Value::Null => Err(VmErrorKind::NullArgument),
                    Value::Str(s) => self.push(Value::Int(s.chars().count() as i64)),
                    Value::Handle(oid) => {
                        let len = self.heap.array(oid)?.len();
                        self.push(Value::Int(len as i64))
                    }
                    _ => Err(VmErrorKind::UnsupportedOperands { op: Opcode::Len }),
                }
            }
            Instruction::GetChar => {
                let string = self.pop()?;
                let index = self.pop()?;
                if index.is_null() {
                    return Err(VmErrorKind::NullIndex);
                }
                if string.is_null() {
                    return Err(VmErrorKind::NullArgument);
                }
                match (string, index) {
                    (Value::Str(s), Value::Int(i)) => {
                        let len = s.chars().count();
                        // Both bounds are checked explicitly, so a negative
                        // index on an empty string is still rejected.
                        if i < 0 || i as usize >= len {
                            return Err(VmErrorKind::IndexOutOfBounds { index: i, len });
                        }
                        match s.chars().nth(i as usize) {
                            Some(c) => self.push(Value::Str(c.to_string())),
                            None => Err(VmErrorKind::IndexOutOfBounds { index: i, len }),
                        }
                    }
                    _ => Err(VmErrorKind::UnsupportedOperands { op: Opcode::GetChar }),
                }
            }
            Instruction::ToInt => {
                let value = self.pop()?;
                match value {
                    Value::Null => Err(VmErrorKind::NullArgument),
                    Value::Int(i) => self.push(Value::Int(i)),
                    Value::Double(d) => self.push(Value::Int(d.trunc() as i64)),
                    Value::Str(s) => match s.trim().parse::<i64>() {
                        Ok(i) => self.push(Value::Int(i)),
                        Err(_) => Err(VmErrorKind::InvalidConversion),
                    },
                    _ => Err(VmErrorKind::InvalidConversion),
                }
            }
            Instruction::ToDbl => {
                let value = self.pop()?;
                match value {
                    Value::Null => Err(VmErrorKind::NullArgument),
                    Value::Int(i) => self.push(Value::Double(i as f64)),
                    Value::Double(d) => self.push(Value::Double(d)),
                    Value::Str(s) => match s.trim().parse::<f64>() {
                        Ok(d) => self.push(Value::Double(d)),
                        Err(_) => Err(VmErrorKind::InvalidConversion),
                    },
                    _ => Err(VmErrorKind::InvalidConversion),
                }
            }
            Instruction::ToStr => {
                let value = self.pop()?;
                match value {
                    Value::Null => Err(VmErrorKind::NullArgument),
                    other => self.push(Value::Str(other.to_string())),
                }
            }

            // ===== Heap =====
            Instruction::AllocStruct => {
                let oid = self.heap.alloc_record();
                self.push(Value::Handle(oid))
            }
            Instruction::AllocArray => {
                let length = self.pop()?;
                match length {
                    Value::Null => Err(VmErrorKind::NullArrayLength),
                    Value::Int(n) if n < 0 => Err(VmErrorKind::NegativeArrayLength),
                    Value::Int(n) => {
                        let oid = self.heap.alloc_array(n as usize);
                        self.push(Value::Handle(oid))
                    }
                    _ => Err(VmErrorKind::UnsupportedOperands {
                        op: Opcode::AllocArray,
                    }),
                }
            }
            Instruction::SetField(name) => {
                let value = self.pop()?;
                let target = self.pop()?;
                let oid = match target {
                    Value::Handle(oid) => oid,
                    Value::Null => return Err(VmErrorKind::NullObject),
                    _ => return Err(VmErrorKind::NotARecord),
                };
                self.heap.set_field(oid, &name, value.clone())?;
                if let Some(child) = value.as_handle() {
                    self.heap.add_edge(oid, child);
                }
                self.collector.record_root(&value);
                self.after_bind();
                Ok(())
            }
            Instruction::GetField(name) => {
                let target = self.pop()?;
                let oid = match target {
                    Value::Handle(oid) => oid,
                    Value::Null => return Err(VmErrorKind::NullObject),
                    _ => return Err(VmErrorKind::NotARecord),
                };
                let value = self.heap.get_field(oid, &name)?;
                self.push(value)
            }
            Instruction::SetIndex => {
                let value = self.pop()?;
                let index = self.pop()?;
                let target = self.pop()?;
                let oid = match target {
                    Value::Handle(oid) => oid,
                    Value::Null => return Err(VmErrorKind::NullObject),
                    _ => return Err(VmErrorKind::NotAnArray),
                };
                let index = match index {
                    Value::Int(i) => i,
                    Value::Null => return Err(VmErrorKind::NullIndex),
                    _ => {
                        return Err(VmErrorKind::UnsupportedOperands {
                            op: Opcode::SetIndex,
                        })
                    }
                };
                {
                    let array = self.heap.array_mut(oid)?;
                    if index < 0 || index as usize >= array.len() {
                        return Err(VmErrorKind::IndexOutOfBounds {
                            index,
                            len: array.len(),
                        });
                    }
                    array[index as usize] = value.clone();
                }
                if let Some(child) = value.as_handle() {
                    self.heap.add_edge(oid, child);
                }
                self.collector.record_root(&value);
                self.after_bind();
                Ok(())
            }
            Instruction::GetIndex => {
                let index = self.pop()?;
                let target = self.pop()?;
                let oid = match target {
                    Value::Handle(oid) => oid,
                    Value::Null => return Err(VmErrorKind::NullObject),
                    _ => return Err(VmErrorKind::NotAnArray),
                };
                let index = match index {
                    Value::Int(i) => i,
                    Value::Null => return Err(VmErrorKind::NullIndex),
                    _ => {
                        return Err(VmErrorKind::UnsupportedOperands {
                            op: Opcode::GetIndex,
                        })
                    }
                };
                let array = self.heap.array(oid)?;
                if index < 0 || index as usize >= array.len() {
                    return Err(VmErrorKind::IndexOutOfBounds {
                        index,
                        len: array.len(),
                    });
                }
                let value = array[index as usize].clone();
                self.push(value)
            }

            // ===== Special =====
            Instruction::Dup => {
                let value = self.pop()?;
                self.push(value.clone())?;
                self.push(value)
            }
        }
    }

    fn binary_arith(&mut self, op: Opcode) -> Result<(), VmErrorKind> {
        let b = self.pop()?;
        let a = self.pop()?;
        if a.is_null() || b.is_null() {
            return Err(VmErrorKind::NullArithmetic);
        }
        let result = match (a, b) {
            (Value::Int(x), Value::Int(y)) => match op {
                Opcode::Add => Value::Int(x.wrapping_add(y)),
                Opcode::Sub => Value::Int(x.wrapping_sub(y)),
                Opcode::Mul => Value::Int(x.wrapping_mul(y)),
                // Integer division truncates toward zero.
                Opcode::Div => {
                    if y == 0 {
                        return Err(VmErrorKind::DivisionByZero);
                    }
                    Value::Int(x.wrapping_div(y))
                }
                _ => return Err(VmErrorKind::UnsupportedOperands { op }),
            },
            (Value::Str(x), Value::Str(y)) if op == Opcode::Add => Value::Str(x + &y),
            (a, b) => {
                let (Some(x), Some(y)) = (number(&a), number(&b)) else {
                    return Err(VmErrorKind::UnsupportedOperands { op });
                };
                match op {
                    Opcode::Add => Value::Double(x + y),
                    Opcode::Sub => Value::Double(x - y),
                    Opcode::Mul => Value::Double(x * y),
                    Opcode::Div => {
                        if y == 0.0 {
                            return Err(VmErrorKind::DivisionByZero);
                        }
                        Value::Double(x / y)
                    }
                    _ => return Err(VmErrorKind::UnsupportedOperands { op }),
                }
            }
        };
        self.push(result)
    }

    fn binary_order(&mut self, op: Opcode) -> Result<(), VmErrorKind> {
        let b = self.pop()?;
        let a = self.pop()?;
        if a.is_null() || b.is_null() {
            return Err(VmErrorKind::NullComparison);
        }
        let result = match (&a, &b) {
            (Value::Str(x), Value::Str(y)) => {
                if op == Opcode::CmpLt {
                    x < y
                } else {
                    x <= y
                }
            }
            _ => {
                let (Some(x), Some(y)) = (number(&a), number(&b)) else {
                    return Err(VmErrorKind::UnsupportedOperands { op });
                };
                if op == Opcode::CmpLt {
                    x < y
                } else {
                    x <= y
                }
            }
        };
        self.push(Value::Bool(result))
    }
}

/// Numeric view of a value, for mixed int/double arithmetic.
fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Int(i) => Some(*i as f64),
        Value::Double(d) => Some(*d),
        _ => None,
    }
}
