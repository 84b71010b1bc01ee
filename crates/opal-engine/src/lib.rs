//! Opal virtual machine
//!
//! This crate implements the execution core of the Opal toolchain:
//! - [`Value`]: tagged runtime values, including heap handles
//! - [`Frame`]: activation frames with per-call operand stacks and locals
//! - [`Heap`]: segregated record/array heaps plus the object graph
//! - [`Collector`]: mark-sweep garbage collection triggered on function
//!   return, with a one-shot deferral when the returned value is about to
//!   be bound into a surviving location
//! - [`Vm`]: the bytecode interpreter driving all of the above

mod error;
mod frame;
mod gc;
mod heap;
mod interpreter;
mod value;

pub use error::{VmError, VmErrorKind};
pub use frame::Frame;
pub use gc::{Collector, GcStats};
pub use heap::{GraphNode, Heap};
pub use interpreter::Vm;
pub use value::{ObjectId, Value};
