use crate::runtime::error::{RuntimeError, RuntimeResult};
use crate::runtime::value::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

struct Binding {
    value: Value,
    mutable: bool,
    /// Type tag inferred at definition and enforced on every assign.
    ty: String,
}

struct ScopeData {
    bindings: HashMap<String, Binding>,
    enclosing: Option<Environment>,
}

/// Handle to a lexical scope. Cloning the handle aliases the scope;
/// scopes chain outward through `enclosing`. Handles are shared with
/// closures and pointers, so the data sits behind a lock.
#[derive(Clone)]
pub struct Environment {
    inner: Arc<Mutex<ScopeData>>,
}

impl Environment {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(ScopeData {
                bindings: HashMap::new(),
                enclosing: None,
            })),
        }
    }

    pub fn with_enclosing(enclosing: Environment) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ScopeData {
                bindings: HashMap::new(),
                enclosing: Some(enclosing),
            })),
        }
    }

    /// Scope identity; two handles are the same scope iff they share
    /// storage. This is what pointer equality compares.
    pub fn ptr_eq(a: &Environment, b: &Environment) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }

    /// Defines `name` in this scope, locking its type tag, and returns
    /// any displaced prior value so the caller can release it.
    /// Redefinition at the same level is not an error.
    pub fn define(&self, name: &str, value: Value, mutable: bool) -> Option<Value> {
        let ty = infer_type(&value).to_string();
        self.inner
            .lock()
            .unwrap()
            .bindings
            .insert(name.to_string(), Binding { value, mutable, ty })
            .map(|binding| binding.value)
    }

    pub fn get(&self, name: &str) -> RuntimeResult<Value> {
        let mut scope = self.clone();
        loop {
            let next = {
                let data = scope.inner.lock().unwrap();
                if let Some(binding) = data.bindings.get(name) {
                    return Ok(binding.value.clone());
                }
                data.enclosing.clone()
            };
            match next {
                Some(parent) => scope = parent,
                None => {
                    return Err(RuntimeError::UndefinedVariable {
                        name: name.to_string(),
                    });
                }
            }
        }
    }

    /// Replaces the stored value in the owning scope, enforcing
    /// mutability and the locked type tag. Nothing is displaced on
    /// failure; on success the old value is returned for release.
    pub fn assign(&self, name: &str, value: Value) -> RuntimeResult<Value> {
        let Some(owner) = self.resolve(name) else {
            return Err(RuntimeError::UndefinedVariable {
                name: name.to_string(),
            });
        };
        let mut data = owner.inner.lock().unwrap();
        let Some(binding) = data.bindings.get_mut(name) else {
            return Err(RuntimeError::UndefinedVariable {
                name: name.to_string(),
            });
        };
        if !binding.mutable {
            return Err(RuntimeError::ImmutableBinding {
                name: name.to_string(),
            });
        }
        let actual = infer_type(&value);
        if binding.ty != actual {
            return Err(RuntimeError::TypeMismatch {
                name: name.to_string(),
                expected: binding.ty.clone(),
                actual: actual.to_string(),
            });
        }
        Ok(std::mem::replace(&mut binding.value, value))
    }

    /// Walks outward to the scope owning `name`, if any. Address-of
    /// builds pointers from the returned handle.
    pub fn resolve(&self, name: &str) -> Option<Environment> {
        let mut scope = self.clone();
        loop {
            let next = {
                let data = scope.inner.lock().unwrap();
                if data.bindings.contains_key(name) {
                    return Some(scope.clone());
                }
                data.enclosing.clone()
            };
            scope = next?;
        }
    }

    /// Snapshot of this scope's direct bindings, for module export.
    pub fn exports(&self) -> Vec<(String, Value)> {
        self.inner
            .lock()
            .unwrap()
            .bindings
            .iter()
            .map(|(name, binding)| (name.clone(), binding.value.clone()))
            .collect()
    }

    /// Drains this scope's own bindings, returning their values so the
    /// caller can release them against the heap. A drained scope
    /// resolves nothing; pointers into it report an undefined variable.
    pub fn take_locals(&self) -> Vec<Value> {
        self.inner
            .lock()
            .unwrap()
            .bindings
            .drain()
            .map(|(_, binding)| binding.value)
            .collect()
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Scope chains can be cyclic through closures; stay opaque.
        write!(f, "Environment")
    }
}

/// Infers the locked type tag for a value. Every uncategorized value
/// shares the "unknown" bucket.
pub fn infer_type(value: &Value) -> &str {
    match value {
        Value::Int(_) => "int",
        Value::Str(_) => "string",
        Value::Bool(_) => "bool",
        Value::Struct(instance) => instance.type_name.as_str(),
        Value::ClassRef(reference) => reference.type_name.as_str(),
        _ => "unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn define_then_get_walks_outward() {
        let global = Environment::new();
        global.define("x", Value::Int(1), false);
        let inner = Environment::with_enclosing(global.clone());
        assert!(inner.get("x").unwrap().eq_value(&Value::Int(1)));
        assert!(inner.get("missing").is_err());
    }

    #[test]
    fn assign_rejects_immutable_bindings() {
        let scope = Environment::new();
        scope.define("x", Value::Int(1), false);
        let err = scope.assign("x", Value::Int(2)).expect_err("immutable");
        assert!(err.to_string().contains("immutable"));
        // Binding is unchanged.
        assert!(scope.get("x").unwrap().eq_value(&Value::Int(1)));
    }

    #[test]
    fn assign_enforces_the_locked_type_tag() {
        let scope = Environment::new();
        scope.define("x", Value::Int(1), true);
        let err = scope
            .assign("x", Value::Str("two".into()))
            .expect_err("type mismatch");
        assert!(err.to_string().contains("Type mismatch"));
        assert!(scope.get("x").unwrap().eq_value(&Value::Int(1)));

        let old = scope.assign("x", Value::Int(2)).expect("same type");
        assert!(old.eq_value(&Value::Int(1)));
    }

    #[test]
    fn unknown_typed_values_share_a_bucket() {
        let scope = Environment::new();
        scope.define("x", Value::Atom("ok".into()), true);
        assert!(scope.assign("x", Value::Null).is_ok());
    }

    #[test]
    fn assign_walks_to_the_owning_scope() {
        let global = Environment::new();
        global.define("x", Value::Int(1), true);
        let inner = Environment::with_enclosing(global.clone());
        inner.assign("x", Value::Int(5)).expect("assign outward");
        assert!(global.get("x").unwrap().eq_value(&Value::Int(5)));
    }

    #[test]
    fn shadowing_keeps_the_outer_binding() {
        let global = Environment::new();
        global.define("x", Value::Int(1), false);
        let inner = Environment::with_enclosing(global.clone());
        inner.define("x", Value::Int(2), false);
        assert!(inner.get("x").unwrap().eq_value(&Value::Int(2)));
        assert!(global.get("x").unwrap().eq_value(&Value::Int(1)));
    }

    #[test]
    fn resolve_returns_the_owning_scope() {
        let global = Environment::new();
        global.define("x", Value::Int(1), false);
        let inner = Environment::with_enclosing(global.clone());
        let owner = inner.resolve("x").expect("found");
        assert!(Environment::ptr_eq(&owner, &global));
        assert!(inner.resolve("missing").is_none());
    }

    #[test]
    fn take_locals_empties_the_scope() {
        let scope = Environment::new();
        scope.define("a", Value::Int(1), false);
        scope.define("b", Value::Int(2), false);
        let locals = scope.take_locals();
        assert_eq!(locals.len(), 2);
        assert!(scope.get("a").is_err());
    }

    #[test]
    fn exports_snapshot_direct_bindings_only() {
        let global = Environment::new();
        global.define("hidden", Value::Int(1), false);
        let module = Environment::with_enclosing(global);
        module.define("visible", Value::Int(2), false);
        let exports = module.exports();
        assert_eq!(exports.len(), 1);
        assert_eq!(exports[0].0, "visible");
    }

    #[test]
    fn redefinition_displaces_the_prior_value() {
        let scope = Environment::new();
        assert!(scope.define("x", Value::Int(1), false).is_none());
        let prior = scope.define("x", Value::Int(2), false);
        assert!(prior.unwrap().eq_value(&Value::Int(1)));
    }
}
