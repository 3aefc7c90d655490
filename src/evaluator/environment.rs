use std::collections::HashMap;
use std::fmt;

use gc::{Finalize, Gc, GcCell, Trace};

use crate::Error;
use crate::ast::{Symbol, Value};

/// One level of the environment chain.
#[derive(Trace, Finalize)]
struct Frame {
    vars: HashMap<Symbol, Value>,
    outer: Option<Environment>,
}

/// A handle to a shared, mutable frame and, through it, every enclosing frame.
///
/// Cloning the handle shares the frame: a procedure value keeps its defining
/// frame alive, and a procedure stored in that same frame forms a cycle that
/// the collector reclaims once nothing else refers to it.
#[derive(Clone, Trace, Finalize)]
pub struct Environment(Gc<GcCell<Frame>>);

impl Environment {
    /// Create an empty frame with no outer frame (the global frame)
    pub fn new() -> Self {
        Environment(Gc::new(GcCell::new(Frame {
            vars: HashMap::new(),
            outer: None,
        })))
    }

    /// Create an empty frame whose outer frame is `outer`
    pub fn with_outer(outer: &Environment) -> Self {
        Environment(Gc::new(GcCell::new(Frame {
            vars: HashMap::new(),
            outer: Some(outer.clone()),
        })))
    }

    /// Find the innermost frame that binds `name`
    pub fn find(&self, name: &Symbol) -> Option<Environment> {
        let mut current = self.clone();
        loop {
            let outer = {
                let frame = current.0.borrow();
                if frame.vars.contains_key(name) {
                    None
                } else {
                    match &frame.outer {
                        Some(outer) => Some(outer.clone()),
                        None => return None,
                    }
                }
            };
            match outer {
                Some(outer) => current = outer,
                None => return Some(current),
            }
        }
    }

    /// Look up the value bound to `name` anywhere in the chain
    pub fn lookup(&self, name: &Symbol) -> Result<Value, Error> {
        let Some(frame) = self.find(name) else {
            return Err(Error::UnboundSymbol(name.to_string()));
        };
        let value = frame.0.borrow().vars.get(name).cloned();
        value.ok_or_else(|| Error::UnboundSymbol(name.to_string()))
    }

    /// Bind `name` in this frame, shadowing any outer binding
    pub fn define(&self, name: Symbol, value: Value) {
        self.0.borrow_mut().vars.insert(name, value);
    }

    /// Rebind `name` in the frame where it is currently bound
    pub fn set(&self, name: &Symbol, value: Value) -> Result<(), Error> {
        match self.find(name) {
            Some(frame) => {
                frame.0.borrow_mut().vars.insert(name.clone(), value);
                Ok(())
            }
            None => Err(Error::UnboundSymbol(format!("{name} (in set!)"))),
        }
    }

    /// Check whether two handles refer to the same frame
    pub fn ptr_eq(&self, other: &Environment) -> bool {
        Gc::ptr_eq(&self.0, &other.0)
    }

    /// Get all bindings visible from this frame, sorted by name
    pub fn get_all_bindings(&self) -> Vec<(Symbol, Value)> {
        let mut bindings = HashMap::new();
        let frame = self.0.borrow();

        if let Some(outer) = &frame.outer {
            for (name, value) in outer.get_all_bindings() {
                bindings.insert(name, value);
            }
        }

        for (name, value) in &frame.vars {
            bindings.insert(name.clone(), value.clone());
        }

        let mut result: Vec<_> = bindings.into_iter().collect();
        result.sort_by(|a, b| a.0.cmp(&b.0));
        result
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let frame = self.0.borrow();
        write!(
            f,
            "Environment({} bindings, outer: {})",
            frame.vars.len(),
            frame.outer.is_some()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::val;

    fn name(s: &str) -> Symbol {
        Symbol::new(s)
    }

    #[test]
    fn test_define_shadows_outer_binding() {
        let global = Environment::new();
        global.define(name("x"), val(1));
        let inner = Environment::with_outer(&global);
        inner.define(name("x"), val(2));

        assert_eq!(inner.lookup(&name("x")), Ok(val(2)));
        assert_eq!(global.lookup(&name("x")), Ok(val(1)));
    }

    #[test]
    fn test_set_mutates_owning_frame() {
        let global = Environment::new();
        global.define(name("counter"), val(0));
        let inner = Environment::with_outer(&global);

        assert_eq!(inner.set(&name("counter"), val(5)), Ok(()));
        assert_eq!(global.lookup(&name("counter")), Ok(val(5)));
        assert!(inner.find(&name("counter")).is_some_and(|f| f.ptr_eq(&global)));
    }

    #[test]
    fn test_unbound_symbols() {
        let global = Environment::new();
        let inner = Environment::with_outer(&global);

        assert!(inner.find(&name("nope")).is_none());
        assert!(matches!(inner.lookup(&name("nope")), Err(Error::UnboundSymbol(_))));
        assert!(matches!(inner.set(&name("nope"), val(1)), Err(Error::UnboundSymbol(_))));
        assert!(global.find(&name("nope")).is_none());
    }

    #[test]
    fn test_get_all_bindings_prefers_inner() {
        let global = Environment::new();
        global.define(name("a"), val(1));
        global.define(name("b"), val(2));
        let inner = Environment::with_outer(&global);
        inner.define(name("b"), val(3));

        let bindings = inner.get_all_bindings();
        assert_eq!(bindings.len(), 2);
        assert_eq!(bindings[0], (name("a"), val(1)));
        assert_eq!(bindings[1], (name("b"), val(3)));
    }
}
