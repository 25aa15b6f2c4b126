use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::ast::Node;
use crate::interp::{Abort, AsyncHandle, Interpreter, NativeCall};
use crate::scope::ScopeRef;

pub(crate) type JsStr = Rc<str>;

/// A value in the interpreted world. Objects are arena indices into the
/// interpreter's heap, so cyclic property graphs are representable.
#[derive(Debug, Clone)]
pub enum Value {
    Undefined,
    Null,
    Boolean(bool),
    Number(f64),
    String(Rc<str>),
    Object(ObjectRef),
}

impl Value {
    /// Builds an interpreted string value.
    pub fn string(s: impl AsRef<str>) -> Value {
        Value::String(Rc::from(s.as_ref()))
    }

    pub fn is_object(&self) -> bool {
        matches!(self, Value::Object(_))
    }

    pub fn as_object(&self) -> Option<ObjectRef> {
        match self {
            Value::Object(obj) => Some(*obj),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectRef(pub(crate) u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ClassTag {
    Object,
    Function,
    Array,
    Error,
    RegExp,
    Date,
    String,
    Number,
    Boolean,
}

impl ClassTag {
    pub(crate) fn name(self) -> &'static str {
        match self {
            ClassTag::Object => "Object",
            ClassTag::Function => "Function",
            ClassTag::Array => "Array",
            ClassTag::Error => "Error",
            ClassTag::RegExp => "RegExp",
            ClassTag::Date => "Date",
            ClassTag::String => "String",
            ClassTag::Number => "Number",
            ClassTag::Boolean => "Boolean",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RegexFlags {
    pub(crate) global: bool,
    pub(crate) ignore_case: bool,
    pub(crate) multiline: bool,
}

impl RegexFlags {
    pub(crate) fn parse(flags: &str) -> Option<RegexFlags> {
        let mut out = RegexFlags {
            global: false,
            ignore_case: false,
            multiline: false,
        };
        for flag in flags.chars() {
            match flag {
                'g' if !out.global => out.global = true,
                'i' if !out.ignore_case => out.ignore_case = true,
                'm' if !out.multiline => out.multiline = true,
                _ => return None,
            }
        }
        Some(out)
    }

    pub(crate) fn text(&self) -> String {
        let mut out = String::new();
        if self.global {
            out.push('g');
        }
        if self.ignore_case {
            out.push('i');
        }
        if self.multiline {
            out.push('m');
        }
        out
    }
}

#[derive(Debug, Clone)]
pub(crate) struct RegExpData {
    pub(crate) source: JsStr,
    pub(crate) flags: RegexFlags,
}

/// Host-side backing value for boxed primitives, dates and compiled regular
/// expressions (the object's `data` slot).
#[derive(Debug, Clone)]
pub(crate) enum BackingData {
    Boolean(bool),
    Number(f64),
    String(JsStr),
    Date(f64),
    RegExp(RegExpData),
}

pub(crate) type NativeFnBox =
    dyn Fn(&mut Interpreter, NativeCall) -> Result<Value, Abort>;
pub(crate) type AsyncFnBox =
    dyn Fn(&mut Interpreter, NativeCall, AsyncHandle) -> Result<(), Abort>;

#[derive(Clone)]
pub(crate) enum Callable {
    Ast {
        node: Rc<Node>,
        parent_scope: ScopeRef,
    },
    Native {
        id: u64,
        func: Rc<NativeFnBox>,
    },
    Async {
        id: u64,
        func: Rc<AsyncFnBox>,
    },
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Callable::Ast { parent_scope, .. } => f
                .debug_struct("Ast")
                .field("parent_scope", parent_scope)
                .finish_non_exhaustive(),
            Callable::Native { id, .. } => {
                f.debug_struct("Native").field("id", id).finish_non_exhaustive()
            }
            Callable::Async { id, .. } => {
                f.debug_struct("Async").field("id", id).finish_non_exhaustive()
            }
        }
    }
}

/// Fixed attribute triples used when installing properties.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Attributes {
    pub(crate) configurable: bool,
    pub(crate) enumerable: bool,
    pub(crate) writable: bool,
}

pub(crate) const VARIABLE: Attributes = Attributes {
    configurable: false,
    enumerable: true,
    writable: true,
};
pub(crate) const READONLY: Attributes = Attributes {
    configurable: true,
    enumerable: true,
    writable: false,
};
pub(crate) const NONENUMERABLE: Attributes = Attributes {
    configurable: true,
    enumerable: false,
    writable: true,
};
pub(crate) const READONLY_NONENUMERABLE: Attributes = Attributes {
    configurable: true,
    enumerable: false,
    writable: false,
};
pub(crate) const NONCONFIGURABLE_READONLY_NONENUMERABLE: Attributes = Attributes {
    configurable: false,
    enumerable: false,
    writable: false,
};
pub(crate) const DEFAULT: Attributes = Attributes {
    configurable: true,
    enumerable: true,
    writable: true,
};

/// An explicit descriptor supplied to `set_property`, mirroring the shape of
/// `Object.defineProperty` input: absent fields keep or default.
#[derive(Debug, Clone, Default)]
pub(crate) struct Descriptor {
    pub(crate) value: Option<Value>,
    pub(crate) writable: Option<bool>,
    pub(crate) enumerable: Option<bool>,
    pub(crate) configurable: Option<bool>,
    pub(crate) getter: Option<Value>,
    pub(crate) setter: Option<Value>,
}

impl Descriptor {
    pub(crate) fn from_attributes(attributes: Attributes) -> Descriptor {
        Descriptor {
            value: None,
            writable: Some(attributes.writable),
            enumerable: Some(attributes.enumerable),
            configurable: Some(attributes.configurable),
            getter: None,
            setter: None,
        }
    }

    pub(crate) fn has_accessor(&self) -> bool {
        self.getter.is_some() || self.setter.is_some()
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Property {
    pub(crate) value: Value,
    pub(crate) writable: bool,
    pub(crate) enumerable: bool,
    pub(crate) configurable: bool,
    pub(crate) getter: Option<ObjectRef>,
    pub(crate) setter: Option<ObjectRef>,
}

impl Property {
    pub(crate) fn with_attributes(value: Value, attributes: Attributes) -> Property {
        Property {
            value,
            writable: attributes.writable,
            enumerable: attributes.enumerable,
            configurable: attributes.configurable,
            getter: None,
            setter: None,
        }
    }

    pub(crate) fn plain(value: Value) -> Property {
        Property::with_attributes(value, DEFAULT)
    }

    pub(crate) fn is_accessor(&self) -> bool {
        self.getter.is_some() || self.setter.is_some()
    }
}

/// Insertion-ordered property storage: a dense entry list plus a key index,
/// so `for-in` reproduces creation order.
#[derive(Debug, Default, Clone)]
pub(crate) struct PropertyMap {
    entries: Vec<(JsStr, Property)>,
    index_by_key: HashMap<JsStr, usize>,
}

impl PropertyMap {
    pub(crate) fn get(&self, key: &str) -> Option<&Property> {
        self.index_by_key
            .get(key)
            .and_then(|index| self.entries.get(*index))
            .map(|(_, property)| property)
    }

    pub(crate) fn get_mut(&mut self, key: &str) -> Option<&mut Property> {
        let index = *self.index_by_key.get(key)?;
        self.entries.get_mut(index).map(|(_, property)| property)
    }

    pub(crate) fn contains(&self, key: &str) -> bool {
        self.index_by_key.contains_key(key)
    }

    pub(crate) fn set(&mut self, key: JsStr, property: Property) {
        if let Some(index) = self.index_by_key.get(&key).copied() {
            if let Some((_, existing)) = self.entries.get_mut(index) {
                *existing = property;
                return;
            }
        }
        let index = self.entries.len();
        self.entries.push((Rc::clone(&key), property));
        self.index_by_key.insert(key, index);
    }

    pub(crate) fn remove(&mut self, key: &str) -> bool {
        let Some(index) = self.index_by_key.remove(key) else {
            return false;
        };
        self.entries.remove(index);
        for (_, slot) in self.index_by_key.iter_mut() {
            if *slot > index {
                *slot -= 1;
            }
        }
        true
    }

    pub(crate) fn keys(&self) -> impl Iterator<Item = &JsStr> {
        self.entries.iter().map(|(key, _)| key)
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (&JsStr, &Property)> {
        self.entries.iter().map(|(key, property)| (key, property))
    }
}

#[derive(Debug)]
pub(crate) struct JsObject {
    pub(crate) properties: PropertyMap,
    pub(crate) proto: Option<ObjectRef>,
    pub(crate) class: ClassTag,
    pub(crate) data: Option<BackingData>,
    pub(crate) prevent_extensions: bool,
    pub(crate) illegal_constructor: bool,
    pub(crate) is_eval: bool,
    pub(crate) callable: Option<Callable>,
}

impl JsObject {
    pub(crate) fn with_proto(proto: Option<ObjectRef>) -> JsObject {
        JsObject {
            properties: PropertyMap::default(),
            proto,
            class: ClassTag::Object,
            data: None,
            prevent_extensions: false,
            illegal_constructor: false,
            is_eval: false,
            callable: None,
        }
    }

    pub(crate) fn is_callable(&self) -> bool {
        self.callable.is_some() || self.is_eval
    }

    /// Raw own-slot read, never consulting getters. Natives use this; the
    /// evaluator goes through the trapping property protocol instead.
    pub(crate) fn peek(&self, key: &str) -> Option<&Value> {
        self.properties.get(key).map(|property| &property.value)
    }
}

/// Arena of interpreted objects. Slots are never reused; everything is
/// released when the interpreter is dropped.
#[derive(Debug, Default)]
pub(crate) struct Heap {
    objects: Vec<JsObject>,
}

impl Heap {
    pub(crate) fn alloc(&mut self, object: JsObject) -> ObjectRef {
        let index = self.objects.len();
        self.objects.push(object);
        ObjectRef(index as u32)
    }

    pub(crate) fn get(&self, obj: ObjectRef) -> &JsObject {
        &self.objects[obj.0 as usize]
    }

    pub(crate) fn get_mut(&mut self, obj: ObjectRef) -> &mut JsObject {
        &mut self.objects[obj.0 as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn property_map_preserves_insertion_order() {
        let mut map = PropertyMap::default();
        map.set(Rc::from("b"), Property::plain(Value::Number(1.0)));
        map.set(Rc::from("a"), Property::plain(Value::Number(2.0)));
        map.set(Rc::from("c"), Property::plain(Value::Number(3.0)));
        let keys: Vec<&str> = map.keys().map(|k| &**k).collect();
        assert_eq!(keys, vec!["b", "a", "c"]);
    }

    #[test]
    fn property_map_remove_keeps_index_consistent() {
        let mut map = PropertyMap::default();
        map.set(Rc::from("a"), Property::plain(Value::Number(1.0)));
        map.set(Rc::from("b"), Property::plain(Value::Number(2.0)));
        map.set(Rc::from("c"), Property::plain(Value::Number(3.0)));
        assert!(map.remove("b"));
        assert!(!map.remove("b"));
        assert!(map.contains("a"));
        assert!(map.contains("c"));
        let keys: Vec<&str> = map.keys().map(|k| &**k).collect();
        assert_eq!(keys, vec!["a", "c"]);
        match map.get("c") {
            Some(property) => match property.value {
                Value::Number(n) => assert_eq!(n, 3.0),
                _ => panic!("wrong value"),
            },
            None => panic!("c missing"),
        }
    }

    #[test]
    fn regex_flags_round_trip() {
        let flags = RegexFlags::parse("gim").unwrap();
        assert_eq!(flags.text(), "gim");
        assert!(RegexFlags::parse("gg").is_none());
        assert!(RegexFlags::parse("u").is_none());
    }

    #[test]
    fn heap_alloc_returns_distinct_refs() {
        let mut heap = Heap::default();
        let a = heap.alloc(JsObject::with_proto(None));
        let b = heap.alloc(JsObject::with_proto(Some(a)));
        assert_ne!(a, b);
        assert_eq!(heap.get(b).proto, Some(a));
    }
}
