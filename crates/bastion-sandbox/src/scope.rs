use parking_lot::Mutex;
use std::collections::BTreeMap;
use thiserror::Error;

/// Value held by a global. Hardening only needs to tell `undefined` apart
/// from "something".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JsValue {
    Undefined,
    Opaque(String),
}

/// A data property descriptor, as in `Object.getOwnPropertyDescriptor`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyDescriptor {
    pub value: JsValue,
    pub writable: bool,
    pub enumerable: bool,
    pub configurable: bool,
}

impl PropertyDescriptor {
    /// What a plain assignment `globalThis.x = v` creates.
    pub fn data(value: JsValue) -> Self {
        Self {
            value,
            writable: true,
            enumerable: true,
            configurable: true,
        }
    }

    /// Whether this is the scrubbed shape: undefined, frozen in place.
    pub fn is_scrubbed(&self) -> bool {
        self.value == JsValue::Undefined && !self.writable && !self.configurable
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("cannot redefine property: {name}")]
pub struct DefineError {
    pub name: String,
}

/// The global object of an extension's execution context.
pub trait GlobalScope: Send + Sync {
    fn get_own_property(&self, name: &str) -> Option<PropertyDescriptor>;

    /// `Object.defineProperty(globalThis, name, desc)`.
    fn define_property(&self, name: &str, desc: PropertyDescriptor) -> Result<(), DefineError>;

    fn get(&self, name: &str) -> JsValue {
        self.get_own_property(name)
            .map(|d| d.value)
            .unwrap_or(JsValue::Undefined)
    }
}

/// A global object held in memory, enforcing the redefinition rules of
/// `Object.defineProperty` for data properties.
#[derive(Debug, Default)]
pub struct InMemoryScope {
    props: Mutex<BTreeMap<String, PropertyDescriptor>>,
}

impl InMemoryScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Host-side injection that ignores redefinition rules.
    pub fn inject(&self, name: &str, desc: PropertyDescriptor) {
        self.props.lock().insert(name.to_string(), desc);
    }

    pub fn names(&self) -> Vec<String> {
        self.props.lock().keys().cloned().collect()
    }
}

impl GlobalScope for InMemoryScope {
    fn get_own_property(&self, name: &str) -> Option<PropertyDescriptor> {
        self.props.lock().get(name).cloned()
    }

    fn define_property(&self, name: &str, desc: PropertyDescriptor) -> Result<(), DefineError> {
        let mut props = self.props.lock();
        if let Some(current) = props.get(name) {
            if !current.configurable {
                let rejected = desc.configurable
                    || desc.enumerable != current.enumerable
                    || (!current.writable && (desc.writable || desc.value != current.value));
                if rejected {
                    return Err(DefineError {
                        name: name.to_string(),
                    });
                }
            }
        }
        props.insert(name.to_string(), desc);
        Ok(())
    }
}
