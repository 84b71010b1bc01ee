//! Heap and object graph
//!
//! The heap is segregated by object kind: records (`oid` to an
//! insertion-ordered field map) and arrays (`oid` to a fixed-length value
//! vector). Alongside the heaps lives the object graph: per-object parent
//! and reference adjacency lists, maintained by handle-typed field and
//! array-cell writes and consumed by the collector. Object ids come from a
//! monotonic allocator and are never reused.

use crate::error::VmErrorKind;
use crate::value::{ObjectId, Value};
use rustc_hash::FxHashMap;

/// First object id handed out by the allocator.
pub const FIRST_OBJECT_ID: u64 = 2024;

/// Adjacency lists of one heap object.
///
/// Both lists are append-only for the object's lifetime; duplicates are
/// permitted.
#[derive(Debug, Clone, Default)]
pub struct GraphNode {
    /// Objects currently holding a reference to this one
    pub parents: Vec<ObjectId>,
    /// Objects this one points at
    pub references: Vec<ObjectId>,
}

/// Segregated record/array heaps with their object graph.
#[derive(Debug)]
pub struct Heap {
    records: FxHashMap<ObjectId, Vec<(String, Value)>>,
    arrays: FxHashMap<ObjectId, Vec<Value>>,
    graph: FxHashMap<ObjectId, GraphNode>,
    next_id: u64,
}

impl Default for Heap {
    fn default() -> Self {
        Self::new()
    }
}

impl Heap {
    /// Create an empty heap.
    pub fn new() -> Self {
        Self {
            records: FxHashMap::default(),
            arrays: FxHashMap::default(),
            graph: FxHashMap::default(),
            next_id: FIRST_OBJECT_ID,
        }
    }

    fn fresh_id(&mut self) -> ObjectId {
        let oid = ObjectId(self.next_id);
        self.next_id += 1;
        self.graph.insert(oid, GraphNode::default());
        oid
    }

    /// Allocate an empty record, returning its id.
    pub fn alloc_record(&mut self) -> ObjectId {
        let oid = self.fresh_id();
        self.records.insert(oid, Vec::new());
        oid
    }

    /// Allocate a null-filled array of the given length, returning its id.
    pub fn alloc_array(&mut self, len: usize) -> ObjectId {
        let oid = self.fresh_id();
        self.arrays.insert(oid, vec![Value::Null; len]);
        oid
    }

    /// Write a record field, keeping field insertion order.
    pub fn set_field(
        &mut self,
        oid: ObjectId,
        name: &str,
        value: Value,
    ) -> Result<(), VmErrorKind> {
        let record = self.records.get_mut(&oid).ok_or(VmErrorKind::NotARecord)?;
        match record.iter_mut().find(|(field, _)| field == name) {
            Some((_, slot)) => *slot = value,
            None => record.push((name.to_string(), value)),
        }
        Ok(())
    }

    /// Read a record field.
    pub fn get_field(&self, oid: ObjectId, name: &str) -> Result<Value, VmErrorKind> {
        let record = self.records.get(&oid).ok_or(VmErrorKind::NotARecord)?;
        record
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value.clone())
            .ok_or_else(|| VmErrorKind::UnknownField {
                name: name.to_string(),
            })
    }

    /// Borrow an array.
    pub fn array(&self, oid: ObjectId) -> Result<&Vec<Value>, VmErrorKind> {
        self.arrays.get(&oid).ok_or(VmErrorKind::NotAnArray)
    }

    /// Mutably borrow an array.
    pub fn array_mut(&mut self, oid: ObjectId) -> Result<&mut Vec<Value>, VmErrorKind> {
        self.arrays.get_mut(&oid).ok_or(VmErrorKind::NotAnArray)
    }

    /// Record that `owner` now holds a reference to `target`.
    pub fn add_edge(&mut self, owner: ObjectId, target: ObjectId) {
        if let Some(node) = self.graph.get_mut(&owner) {
            node.references.push(target);
        }
        if let Some(node) = self.graph.get_mut(&target) {
            node.parents.push(owner);
        }
    }

    /// The graph node of a live object.
    pub fn node(&self, oid: ObjectId) -> Option<&GraphNode> {
        self.graph.get(&oid)
    }

    /// Ids of every object currently in the graph.
    pub fn graph_ids(&self) -> Vec<ObjectId> {
        self.graph.keys().copied().collect()
    }

    /// True if the id names a live object of either kind.
    pub fn contains(&self, oid: ObjectId) -> bool {
        self.graph.contains_key(&oid)
    }

    /// Remove an object from its heap and the graph. Reclamation is
    /// terminal: the id is never reused.
    pub fn remove(&mut self, oid: ObjectId) {
        self.records.remove(&oid);
        self.arrays.remove(&oid);
        self.graph.remove(&oid);
    }

    /// Live record ids in allocation order.
    pub fn record_ids(&self) -> Vec<ObjectId> {
        let mut ids: Vec<ObjectId> = self.records.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Live array ids in allocation order.
    pub fn array_ids(&self) -> Vec<ObjectId> {
        let mut ids: Vec<ObjectId> = self.arrays.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Number of live objects.
    pub fn len(&self) -> usize {
        self.graph.len()
    }

    /// True when no objects are live.
    pub fn is_empty(&self) -> bool {
        self.graph.is_empty()
    }

    /// End-of-run heap listing: `struct: [ids] , array: [ids]`.
    pub fn summary(&self) -> String {
        fn list(ids: &[ObjectId]) -> String {
            let parts: Vec<String> = ids.iter().map(ObjectId::to_string).collect();
            format!("[{}]", parts.join(", "))
        }
        format!(
            "struct: {} , array: {}",
            list(&self.record_ids()),
            list(&self.array_ids())
        )
    }
}
