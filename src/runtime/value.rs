use crate::language::ast::Stmt;
use crate::runtime::environment::Environment;
use crate::runtime::error::RuntimeResult;
use crate::runtime::heap::{Heap, HeapAddress};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex};

/// Runtime value. Plain `Clone` hands out another handle to the shared
/// interior of lists and structs; `copy` is the value-semantics
/// duplicate used whenever a value enters a binding, field, or
/// argument slot.
#[derive(Clone, Debug)]
pub enum Value {
    Null,
    Int(i32),
    Bool(bool),
    Str(String),
    Atom(String),
    Tuple(Vec<Value>),
    List(ListValue),
    Map(MapValue),
    Struct(StructValue),
    ClassRef(ClassRef),
    Function(FunctionValue),
    Native(NativeFn),
    Pointer(PointerValue),
}

impl Value {
    /// Value-semantics duplicate. Tuples, lists, maps, and structs are
    /// deep-copied; class references produce a new handle to the same
    /// address; everything else keeps its aliasing contract.
    pub fn copy(&self) -> Value {
        match self {
            Value::Tuple(elements) => Value::Tuple(elements.iter().map(Value::copy).collect()),
            Value::List(list) => Value::List(list.copy()),
            Value::Map(map) => Value::Map(map.copy()),
            Value::Struct(instance) => Value::Struct(instance.copy()),
            Value::ClassRef(reference) => Value::ClassRef(reference.clone()),
            other => other.clone(),
        }
    }

    pub fn retain(&self, heap: &Heap) {
        match self {
            Value::ClassRef(reference) => heap.retain(reference.address),
            Value::Tuple(elements) => {
                for element in elements {
                    element.retain(heap);
                }
            }
            Value::List(list) => list.retain(heap),
            Value::Map(map) => map.retain(heap),
            Value::Struct(instance) => instance.retain(heap),
            _ => {}
        }
    }

    pub fn release(&self, heap: &Heap) -> RuntimeResult<()> {
        match self {
            Value::ClassRef(reference) => heap.release(reference.address),
            Value::Tuple(elements) => {
                for element in elements {
                    element.release(heap)?;
                }
                Ok(())
            }
            Value::List(list) => list.release(heap),
            Value::Map(map) => map.release(heap),
            Value::Struct(instance) => instance.release_fields(heap),
            _ => Ok(()),
        }
    }

    /// False only for the integer zero and the boolean false.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Bool(value) => *value,
            Value::Int(value) => *value != 0,
            _ => true,
        }
    }

    /// Structural equality: primitives, atoms, tuples, lists, and maps
    /// by content; structs by type name and fields; class references
    /// by address; pointers by scope identity and name. Functions and
    /// natives never compare equal.
    pub fn eq_value(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Atom(a), Value::Atom(b)) => a == b,
            (Value::Tuple(a), Value::Tuple(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.eq_value(y))
            }
            (Value::List(a), Value::List(b)) => {
                let left = a.snapshot();
                let right = b.snapshot();
                left.len() == right.len()
                    && left.iter().zip(&right).all(|(x, y)| x.eq_value(y))
            }
            (Value::Map(a), Value::Map(b)) => {
                a.len() == b.len()
                    && a.entries()
                        .iter()
                        .all(|(key, value)| b.get(key).is_some_and(|v| v.eq_value(value)))
            }
            (Value::Struct(a), Value::Struct(b)) => {
                if a.type_name != b.type_name {
                    return false;
                }
                let left = a.fields();
                let right = b.fields();
                left.len() == right.len()
                    && left.iter().all(|(name, value)| {
                        right.get(name).is_some_and(|v| v.eq_value(value))
                    })
            }
            (Value::ClassRef(a), Value::ClassRef(b)) => a.address == b.address,
            (Value::Pointer(a), Value::Pointer(b)) => {
                a.name == b.name && Environment::ptr_eq(&a.scope, &b.scope)
            }
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "nil"),
            Value::Int(value) => write!(f, "{value}"),
            Value::Bool(value) => write!(f, "{value}"),
            // The two print-time escapes; string contents are stored raw.
            Value::Str(value) => write!(f, "{}", value.replace("\\n", "\n").replace("\\t", "\t")),
            Value::Atom(name) => write!(f, "@{name}"),
            Value::Tuple(elements) => {
                write!(f, "{{")?;
                for (idx, element) in elements.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{element}")?;
                }
                write!(f, "}}")
            }
            Value::List(list) => {
                write!(f, "[")?;
                for (idx, element) in list.snapshot().iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{element}")?;
                }
                write!(f, "]")
            }
            Value::Map(map) => {
                write!(f, "#{{")?;
                for (idx, (key, value)) in map.entries().iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{key} => {value}")?;
                }
                write!(f, "}}")
            }
            Value::Struct(instance) => write!(f, "{instance}"),
            Value::ClassRef(reference) => {
                write!(f, "ref<{}:{}>", reference.address, reference.type_name)
            }
            Value::Function(_) => write!(f, "<fn>"),
            Value::Native(native) => write!(f, "<native fn {}>", native.name()),
            Value::Pointer(pointer) => write!(f, "<ptr {}>", pointer.name),
        }
    }
}

/// Growable sequence with value semantics at assignment boundaries.
/// The element vector is shared between handles so `push` through one
/// handle is visible through the binding that produced it.
#[derive(Clone, Debug)]
pub struct ListValue {
    items: Arc<Mutex<Vec<Value>>>,
}

impl ListValue {
    pub fn new() -> Self {
        Self::from_vec(Vec::new())
    }

    pub fn from_vec(items: Vec<Value>) -> Self {
        Self {
            items: Arc::new(Mutex::new(items)),
        }
    }

    pub fn push(&self, value: Value) {
        self.items.lock().unwrap().push(value);
    }

    pub fn len(&self) -> usize {
        self.items.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: usize) -> Option<Value> {
        self.items.lock().unwrap().get(index).cloned()
    }

    pub fn snapshot(&self) -> Vec<Value> {
        self.items.lock().unwrap().clone()
    }

    fn copy(&self) -> ListValue {
        ListValue::from_vec(self.snapshot().iter().map(Value::copy).collect())
    }

    fn retain(&self, heap: &Heap) {
        for value in self.snapshot() {
            value.retain(heap);
        }
    }

    fn release(&self, heap: &Heap) -> RuntimeResult<()> {
        for value in self.snapshot() {
            value.release(heap)?;
        }
        Ok(())
    }
}

impl Default for ListValue {
    fn default() -> Self {
        Self::new()
    }
}

/// Association with structural key equality; entries keep insertion
/// order, which also fixes the print order.
#[derive(Clone, Debug, Default)]
pub struct MapValue {
    entries: Vec<(Value, Value)>,
}

impl MapValue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: Value, value: Value) {
        if let Some(entry) = self.entries.iter_mut().find(|(k, _)| k.eq_value(&key)) {
            entry.1 = value;
        } else {
            self.entries.push((key, value));
        }
    }

    pub fn get(&self, key: &Value) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_value(key))
            .map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[(Value, Value)] {
        &self.entries
    }

    fn copy(&self) -> MapValue {
        MapValue {
            entries: self
                .entries
                .iter()
                .map(|(k, v)| (k.copy(), v.copy()))
                .collect(),
        }
    }

    fn retain(&self, heap: &Heap) {
        for (key, value) in &self.entries {
            key.retain(heap);
            value.retain(heap);
        }
    }

    fn release(&self, heap: &Heap) -> RuntimeResult<()> {
        for (key, value) in &self.entries {
            key.release(heap)?;
            value.release(heap)?;
        }
        Ok(())
    }
}

/// Named-field aggregate. Used both for value-semantics struct
/// instances and as the payload of heap-allocated class instances;
/// the field map is shared between handles so field writes reach the
/// stored instance.
#[derive(Clone, Debug)]
pub struct StructValue {
    pub type_name: String,
    fields: Arc<Mutex<BTreeMap<String, Value>>>,
}

impl StructValue {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            fields: Arc::new(Mutex::new(BTreeMap::new())),
        }
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.fields.lock().unwrap().get(name).cloned()
    }

    /// Stores a field, returning the displaced occupant.
    pub fn set(&self, name: &str, value: Value) -> Option<Value> {
        self.fields.lock().unwrap().insert(name.to_string(), value)
    }

    pub fn fields(&self) -> BTreeMap<String, Value> {
        self.fields.lock().unwrap().clone()
    }

    pub fn copy(&self) -> StructValue {
        let copied = self
            .fields()
            .into_iter()
            .map(|(name, value)| (name, value.copy()))
            .collect();
        StructValue {
            type_name: self.type_name.clone(),
            fields: Arc::new(Mutex::new(copied)),
        }
    }

    pub(crate) fn retain(&self, heap: &Heap) {
        for value in self.fields().values() {
            value.retain(heap);
        }
    }

    pub(crate) fn release_fields(&self, heap: &Heap) -> RuntimeResult<()> {
        for value in self.fields().values() {
            value.release(heap)?;
        }
        Ok(())
    }
}

impl fmt::Display for StructValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{{", self.type_name)?;
        let mut first = true;
        for (name, value) in self.fields() {
            if !first {
                write!(f, ", ")?;
            }
            first = false;
            write!(f, "{name}: {value}")?;
        }
        write!(f, "}}")
    }
}

/// Handle to a class instance living on the heap.
#[derive(Clone, Debug)]
pub struct ClassRef {
    pub address: HeapAddress,
    pub type_name: String,
}

/// First-class function: parameters, body, and the captured scope.
/// Copying shares all three; the closure stays alive as long as any
/// handle does.
#[derive(Clone, Debug)]
pub struct FunctionValue {
    pub params: Arc<Vec<String>>,
    pub body: Arc<Vec<Stmt>>,
    pub closure: Environment,
}

/// The built-in functions, dispatched by tag in the evaluator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NativeFn {
    Time,
    Len,
    Push,
    Get,
    Sleep,
    Spawn,
}

impl NativeFn {
    pub fn name(&self) -> &'static str {
        match self {
            NativeFn::Time => "time",
            NativeFn::Len => "len",
            NativeFn::Push => "push",
            NativeFn::Get => "get",
            NativeFn::Sleep => "sleep",
            NativeFn::Spawn => "spawn",
        }
    }
}

/// Aliasing handle to a named binding in a specific scope.
#[derive(Clone, Debug)]
pub struct PointerValue {
    pub scope: Environment,
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copy_detaches_list_interiors() {
        let original = Value::List(ListValue::from_vec(vec![Value::Int(1)]));
        let duplicate = original.copy();
        if let Value::List(list) = &original {
            list.push(Value::Int(2));
        }
        let Value::List(copied) = &duplicate else {
            panic!("expected list");
        };
        assert_eq!(copied.len(), 1, "copy must not alias the original");
    }

    #[test]
    fn clone_aliases_list_interiors() {
        let original = ListValue::from_vec(vec![Value::Int(1)]);
        let alias = Value::List(original.clone());
        if let Value::List(list) = &alias {
            list.push(Value::Int(2));
        }
        assert_eq!(original.len(), 2, "clone shares the element vector");
    }

    #[test]
    fn copy_detaches_struct_fields() {
        let instance = StructValue::new("P");
        instance.set("x", Value::Int(1));
        let duplicate = instance.copy();
        instance.set("x", Value::Int(99));
        assert!(duplicate.get("x").unwrap().eq_value(&Value::Int(1)));
    }

    #[test]
    fn copy_detaches_nested_collections() {
        let inner = ListValue::from_vec(vec![Value::Int(1)]);
        let original = Value::Tuple(vec![Value::List(inner.clone())]);
        let _duplicate = original.copy();
        inner.push(Value::Int(2));
        let Value::Tuple(elements) = &_duplicate else {
            panic!("expected tuple");
        };
        let Value::List(copied) = &elements[0] else {
            panic!("expected list");
        };
        assert_eq!(copied.len(), 1);
    }

    #[test]
    fn truthiness_follows_the_value_model() {
        assert!(!Value::Int(0).is_truthy());
        assert!(!Value::Bool(false).is_truthy());
        assert!(Value::Int(-1).is_truthy());
        assert!(Value::Str(String::new()).is_truthy());
        assert!(Value::List(ListValue::new()).is_truthy());
        assert!(Value::Null.is_truthy());
    }

    #[test]
    fn atoms_compare_by_name() {
        assert!(Value::Atom("ok".into()).eq_value(&Value::Atom("ok".into())));
        assert!(!Value::Atom("ok".into()).eq_value(&Value::Atom("error".into())));
        assert!(!Value::Atom("ok".into()).eq_value(&Value::Str("ok".into())));
    }

    #[test]
    fn tuples_and_maps_compare_structurally() {
        let a = Value::Tuple(vec![Value::Atom("ok".into()), Value::Int(200)]);
        let b = Value::Tuple(vec![Value::Atom("ok".into()), Value::Int(200)]);
        assert!(a.eq_value(&b));

        let mut left = MapValue::new();
        left.insert(Value::Atom("a".into()), Value::Int(1));
        left.insert(Value::Atom("b".into()), Value::Int(2));
        let mut right = MapValue::new();
        right.insert(Value::Atom("b".into()), Value::Int(2));
        right.insert(Value::Atom("a".into()), Value::Int(1));
        assert!(Value::Map(left).eq_value(&Value::Map(right)), "order-independent");
    }

    #[test]
    fn map_insert_replaces_structural_duplicates() {
        let mut map = MapValue::new();
        map.insert(Value::Atom("a".into()), Value::Int(1));
        map.insert(Value::Atom("a".into()), Value::Int(2));
        assert_eq!(map.len(), 1);
        assert!(map
            .get(&Value::Atom("a".into()))
            .unwrap()
            .eq_value(&Value::Int(2)));
    }

    #[test]
    fn display_matches_source_flavor() {
        let tuple = Value::Tuple(vec![
            Value::Atom("ok".into()),
            Value::Int(200),
            Value::Str("OK".into()),
        ]);
        assert_eq!(tuple.to_string(), "{@ok, 200, OK}");

        let mut map = MapValue::new();
        map.insert(Value::Atom("a".into()), Value::Int(1));
        map.insert(Value::Atom("b".into()), Value::Int(2));
        assert_eq!(Value::Map(map).to_string(), "#{@a => 1, @b => 2}");

        assert_eq!(Value::Null.to_string(), "nil");
        assert_eq!(
            Value::List(ListValue::from_vec(vec![Value::Int(1), Value::Int(2)])).to_string(),
            "[1, 2]"
        );
    }

    #[test]
    fn print_time_escapes_are_interpreted() {
        let value = Value::Str("a\\nb\\tc".into());
        assert_eq!(value.to_string(), "a\nb\tc");
    }
}
