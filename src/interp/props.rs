use std::rc::Rc;

use super::convert::{array_index, strict_equals, to_uint32};
use super::frame::{RefBase, Reference};
use super::{Abort, Interpreter};
use crate::scope::ScopeRef;
use crate::value::{
    BackingData, ClassTag, Descriptor, JsStr, ObjectRef, Property, Value, DEFAULT,
};

/// Result of a trapping read: either the value, or a getter that the
/// evaluator must invoke through a synthesized call frame.
#[derive(Debug)]
pub(crate) enum PropGet {
    Value(Value),
    Getter { getter: ObjectRef, this: Value },
}

/// Result of a trapping write: done, or a setter to invoke.
#[derive(Debug)]
pub(crate) enum PropSet {
    Done,
    Setter {
        setter: ObjectRef,
        this: Value,
        value: Value,
    },
}

fn string_char(s: &str, index: u32) -> Option<Value> {
    s.chars()
        .nth(index as usize)
        .map(|c| Value::string(c.to_string()))
}

impl Interpreter {
    fn proto_of_primitive(&self, value: &Value) -> Option<ObjectRef> {
        match value {
            Value::String(_) => Some(self.protos.string_proto),
            Value::Number(_) => Some(self.protos.number_proto),
            Value::Boolean(_) => Some(self.protos.boolean_proto),
            Value::Object(obj) => self.heap.get(*obj).proto,
            _ => None,
        }
    }

    /// The boxed or primitive string behind a value, when there is one.
    fn string_data(&self, value: &Value) -> Option<JsStr> {
        match value {
            Value::String(s) => Some(Rc::clone(s)),
            Value::Object(obj) => match &self.heap.get(*obj).data {
                Some(BackingData::String(s)) if self.heap.get(*obj).class == ClassTag::String => {
                    Some(Rc::clone(s))
                }
                _ => None,
            },
            _ => None,
        }
    }

    pub(crate) fn prop_get(&mut self, value: &Value, name: &str) -> Result<PropGet, Abort> {
        match value {
            Value::Undefined | Value::Null => {
                let target = if matches!(value, Value::Undefined) {
                    "undefined"
                } else {
                    "null"
                };
                Err(self.throw_type_error(format!(
                    "Cannot read property '{}' of {}",
                    name, target
                )))
            }
            _ => {
                if let Some(s) = self.string_data(value) {
                    if name == "length" {
                        return Ok(PropGet::Value(Value::Number(s.chars().count() as f64)));
                    }
                    if let Some(index) = array_index(name) {
                        if let Some(ch) = string_char(&s, index) {
                            return Ok(PropGet::Value(ch));
                        }
                        // Fall through: expando properties and the
                        // prototype chain still apply past the end.
                    }
                }
                let mut current = match value {
                    Value::Object(obj) => Some(*obj),
                    _ => self.proto_of_primitive(value),
                };
                while let Some(obj) = current {
                    let object = self.heap.get(obj);
                    if let Some(property) = object.properties.get(name) {
                        if let Some(getter) = property.getter {
                            return Ok(PropGet::Getter {
                                getter,
                                this: value.clone(),
                            });
                        }
                        if property.is_accessor() {
                            // Setter-only property reads as undefined.
                            return Ok(PropGet::Value(Value::Undefined));
                        }
                        return Ok(PropGet::Value(property.value.clone()));
                    }
                    current = object.proto;
                }
                Ok(PropGet::Value(Value::Undefined))
            }
        }
    }

    pub(crate) fn prop_set(
        &mut self,
        value: &Value,
        name: &str,
        new_value: Value,
        descriptor: Option<Descriptor>,
        strict: bool,
    ) -> Result<PropSet, Abort> {
        let obj = match value {
            Value::Undefined | Value::Null => {
                let target = if matches!(value, Value::Undefined) {
                    "undefined"
                } else {
                    "null"
                };
                return Err(self.throw_type_error(format!(
                    "Cannot set property '{}' of {}",
                    name, target
                )));
            }
            Value::Object(obj) => *obj,
            _ => {
                // Property writes on primitives vanish (or throw in strict
                // mode); the transient wrapper is gone either way.
                if strict {
                    return Err(self.throw_type_error(format!(
                        "Cannot create property '{}' on a primitive",
                        name
                    )));
                }
                return Ok(PropSet::Done);
            }
        };

        let class = self.heap.get(obj).class;

        // String boxes: character indices and length are read-only.
        if class == ClassTag::String {
            if let Some(BackingData::String(s)) = &self.heap.get(obj).data {
                let char_len = s.chars().count() as u32;
                let hits_string_slot = name == "length"
                    || array_index(name).map(|i| i < char_len).unwrap_or(false);
                if hits_string_slot {
                    if strict {
                        return Err(self.throw_type_error(format!(
                            "Cannot assign to read only property '{}' of String",
                            name
                        )));
                    }
                    return Ok(PropSet::Done);
                }
            }
        }

        // Array length invariant: writes to `length` truncate, index writes
        // lift `length`.
        if class == ClassTag::Array {
            if name == "length" {
                let requested = match descriptor.as_ref().and_then(|d| d.value.clone()) {
                    Some(v) => v,
                    None => new_value.clone(),
                };
                let n = self.to_number(&requested);
                let len = to_uint32(n);
                if len as f64 != n {
                    return Err(self.throw_range_error("Invalid array length"));
                }
                self.truncate_array(obj, len);
                if let Some(property) = self.heap.get_mut(obj).properties.get_mut("length") {
                    property.value = Value::Number(len as f64);
                }
                return Ok(PropSet::Done);
            }
            if let Some(index) = array_index(name) {
                let current_len = self
                    .heap
                    .get(obj)
                    .peek("length")
                    .map(|v| self.value_to_length(v))
                    .unwrap_or(0) as u64;
                if (index as u64) + 1 > current_len {
                    if let Some(property) = self.heap.get_mut(obj).properties.get_mut("length")
                    {
                        property.value = Value::Number((index as f64) + 1.0);
                    }
                }
            }
        }

        if self.heap.get(obj).prevent_extensions && !self.heap.get(obj).properties.contains(name)
        {
            if strict {
                return Err(self.throw_type_error(format!(
                    "Can't add property '{}', object is not extensible",
                    name
                )));
            }
            return Ok(PropSet::Done);
        }

        if let Some(descriptor) = descriptor {
            self.apply_descriptor(obj, name, new_value, descriptor)?;
            return Ok(PropSet::Done);
        }

        // Plain assignment: hunt the prototype chain for an accessor or a
        // read-only blocker before writing the receiver's own slot.
        let mut check = Some(obj);
        while let Some(c) = check {
            let object = self.heap.get(c);
            if let Some(property) = object.properties.get(name) {
                if let Some(setter) = property.setter {
                    return Ok(PropSet::Setter {
                        setter,
                        this: value.clone(),
                        value: new_value,
                    });
                }
                if property.getter.is_some() {
                    if strict {
                        return Err(self.throw_type_error(format!(
                            "Cannot set property '{}' which has only a getter",
                            name
                        )));
                    }
                    return Ok(PropSet::Done);
                }
                if !property.writable {
                    if strict {
                        return Err(self.throw_type_error(format!(
                            "Cannot assign to read only property '{}'",
                            name
                        )));
                    }
                    return Ok(PropSet::Done);
                }
                break;
            }
            check = object.proto;
        }

        let properties = &mut self.heap.get_mut(obj).properties;
        if properties.contains(name) {
            if let Some(existing) = properties.get_mut(name) {
                existing.value = new_value;
            }
        } else {
            properties.set(Rc::from(name), Property::plain(new_value));
        }
        Ok(PropSet::Done)
    }

    fn accessor_ref(&mut self, value: &Option<Value>) -> Result<Option<ObjectRef>, Abort> {
        match value {
            None | Some(Value::Undefined) => Ok(None),
            Some(Value::Object(obj)) if self.heap.get(*obj).is_callable() => Ok(Some(*obj)),
            Some(_) => Err(self.throw_type_error("Getter/setter must be callable")),
        }
    }

    /// `Object.defineProperty` semantics: merge attributes, install
    /// accessors, reject incompatible redefinition.
    fn apply_descriptor(
        &mut self,
        obj: ObjectRef,
        name: &str,
        fallback_value: Value,
        descriptor: Descriptor,
    ) -> Result<(), Abort> {
        if descriptor.has_accessor()
            && (descriptor.value.is_some() || descriptor.writable.is_some())
        {
            return Err(self.throw_type_error(
                "Cannot both specify accessors and a value or writable attribute",
            ));
        }
        let getter = self.accessor_ref(&descriptor.getter)?;
        let setter = self.accessor_ref(&descriptor.setter)?;

        let existing = self.heap.get(obj).properties.get(name).cloned();
        if let Some(existing) = &existing {
            if !existing.configurable {
                let changes_shape = descriptor.configurable == Some(true)
                    || descriptor
                        .enumerable
                        .map(|e| e != existing.enumerable)
                        .unwrap_or(false)
                    || (descriptor.has_accessor() != existing.is_accessor()
                        && (descriptor.has_accessor() || descriptor.value.is_some()))
                    || (descriptor.has_accessor()
                        && (getter != existing.getter || setter != existing.setter))
                    || (!existing.is_accessor()
                        && !existing.writable
                        && (descriptor.writable == Some(true)
                            || descriptor
                                .value
                                .as_ref()
                                .map(|v| !strict_equals(v, &existing.value))
                                .unwrap_or(false)));
                if changes_shape {
                    return Err(self.throw_type_error(format!(
                        "Cannot redefine property: {}",
                        name
                    )));
                }
            }
        }

        let base = existing.clone().unwrap_or(Property {
            value: Value::Undefined,
            writable: false,
            enumerable: false,
            configurable: false,
            getter: None,
            setter: None,
        });
        let accessor = descriptor.has_accessor();
        let property = Property {
            value: descriptor.value.unwrap_or(if existing.is_some() {
                base.value
            } else {
                fallback_value
            }),
            writable: descriptor.writable.unwrap_or(base.writable),
            enumerable: descriptor.enumerable.unwrap_or(base.enumerable),
            configurable: descriptor.configurable.unwrap_or(base.configurable),
            getter: if accessor { getter } else { None },
            setter: if accessor { setter } else { None },
        };
        self.heap
            .get_mut(obj)
            .properties
            .set(Rc::from(name), property);
        Ok(())
    }

    fn truncate_array(&mut self, obj: ObjectRef, new_length: u32) {
        let doomed: Vec<JsStr> = self
            .heap
            .get(obj)
            .properties
            .keys()
            .filter(|key| array_index(key).map(|i| i >= new_length).unwrap_or(false))
            .cloned()
            .collect();
        let properties = &mut self.heap.get_mut(obj).properties;
        for key in doomed {
            properties.remove(&key);
        }
    }

    /// Untrapped data-property define used by literals, natives and host
    /// wiring; still maintains the array length invariant.
    pub(crate) fn define_data_property(&mut self, obj: ObjectRef, name: JsStr, value: Value) {
        let class = self.heap.get(obj).class;
        if class == ClassTag::Array {
            if &*name == "length" {
                if let Value::Number(n) = value {
                    let len = to_uint32(n);
                    self.truncate_array(obj, len);
                    if let Some(property) = self.heap.get_mut(obj).properties.get_mut("length") {
                        property.value = Value::Number(len as f64);
                        return;
                    }
                }
            } else if let Some(index) = array_index(&name) {
                let current_len = self
                    .heap
                    .get(obj)
                    .peek("length")
                    .map(|v| self.value_to_length(v))
                    .unwrap_or(0) as u64;
                if (index as u64) + 1 > current_len {
                    if let Some(property) = self.heap.get_mut(obj).properties.get_mut("length")
                    {
                        property.value = Value::Number((index as f64) + 1.0);
                    }
                }
            }
        }
        let properties = &mut self.heap.get_mut(obj).properties;
        if properties.contains(&name) {
            if let Some(existing) = properties.get_mut(&name) {
                existing.value = value;
                existing.getter = None;
                existing.setter = None;
            }
        } else {
            properties.set(name, Property::with_attributes(value, DEFAULT));
        }
    }

    pub(crate) fn has_property(&self, value: &Value, name: &str) -> bool {
        if let Some(s) = self.string_data(value) {
            if name == "length" {
                return true;
            }
            if let Some(index) = array_index(name) {
                if (index as usize) < s.chars().count() {
                    return true;
                }
            }
        }
        let mut current = match value {
            Value::Object(obj) => Some(*obj),
            _ => self.proto_of_primitive(value),
        };
        while let Some(obj) = current {
            let object = self.heap.get(obj);
            if object.properties.contains(name) {
                return true;
            }
            current = object.proto;
        }
        false
    }

    pub(crate) fn delete_prop(
        &mut self,
        value: &Value,
        name: &str,
        strict: bool,
    ) -> Result<bool, Abort> {
        let Value::Object(obj) = value else {
            return Ok(true);
        };
        let Some(property) = self.heap.get(*obj).properties.get(name) else {
            return Ok(true);
        };
        if !property.configurable {
            if strict {
                return Err(self.throw_type_error(format!(
                    "Cannot delete property '{}'",
                    name
                )));
            }
            return Ok(false);
        }
        self.heap.get_mut(*obj).properties.remove(name);
        Ok(true)
    }

    // ---- scope resolution ------------------------------------------------

    /// Innermost-out own-property walk; `with` targets and the global
    /// scope fall through to the trapping prototype-aware read.
    pub(crate) fn scope_get(
        &mut self,
        start: ScopeRef,
        name: &str,
        typeof_ok: bool,
    ) -> Result<PropGet, Abort> {
        let mut cursor = Some(start);
        while let Some(scope_ref) = cursor {
            let scope = self.scopes.get(scope_ref);
            let object = scope.object;
            let parent = scope.parent;
            let with_scope = scope.with_scope;
            if parent.is_none() {
                // Global scope: inherited properties and getters apply.
                let global = Value::Object(object);
                if self.has_property(&global, name) {
                    return self.prop_get(&global, name);
                }
                break;
            }
            if with_scope {
                // A with target resolves like an ordinary property read:
                // its prototype chain and accessors are in play.
                let target = Value::Object(object);
                if self.has_property(&target, name) {
                    return self.prop_get(&target, name);
                }
            } else if let Some(property) = self.heap.get(object).properties.get(name) {
                if let Some(getter) = property.getter {
                    return Ok(PropGet::Getter {
                        getter,
                        this: Value::Object(object),
                    });
                }
                return Ok(PropGet::Value(property.value.clone()));
            }
            cursor = parent;
        }
        if typeof_ok {
            return Ok(PropGet::Value(Value::Undefined));
        }
        Err(self.throw_reference_error(format!("{} is not defined", name)))
    }

    /// Assignment walk: writes the nearest binding, falling back to the
    /// global object (implicit creation is a strict-mode ReferenceError).
    pub(crate) fn scope_set(
        &mut self,
        start: ScopeRef,
        name: &str,
        value: Value,
    ) -> Result<PropSet, Abort> {
        let strict = self.scopes.get(start).strict;
        let mut cursor = Some(start);
        while let Some(scope_ref) = cursor {
            let scope = self.scopes.get(scope_ref);
            let object = scope.object;
            let parent = scope.parent;
            let with_scope = scope.with_scope;
            if parent.is_none() {
                let global = Value::Object(object);
                if !strict || self.has_property(&global, name) {
                    return self.prop_set(&global, name, value, None, strict);
                }
                break;
            }
            if with_scope {
                // Writes through a with target honor inherited setters and
                // read-only properties on its prototype chain.
                let target = Value::Object(object);
                if self.has_property(&target, name) {
                    return self.prop_set(&target, name, value, None, strict);
                }
                cursor = parent;
                continue;
            }
            if self.heap.get(object).properties.contains(name) {
                let property = self.heap.get(object).properties.get(name).cloned();
                if let Some(property) = property {
                    if let Some(setter) = property.setter {
                        return Ok(PropSet::Setter {
                            setter,
                            this: Value::Object(object),
                            value,
                        });
                    }
                }
                if let Some(slot) = self.heap.get_mut(object).properties.get_mut(name) {
                    if slot.writable {
                        slot.value = value;
                    }
                }
                return Ok(PropSet::Done);
            }
            cursor = parent;
        }
        Err(self.throw_reference_error(format!("{} is not defined", name)))
    }

    /// Declaration writes bypass setters entirely.
    pub(crate) fn scope_declare_assign(&mut self, start: ScopeRef, name: &str, value: Value) {
        let mut cursor = Some(start);
        while let Some(scope_ref) = cursor {
            let scope = self.scopes.get(scope_ref);
            let object = scope.object;
            let parent = scope.parent;
            if self.heap.get(object).properties.contains(name) {
                if let Some(slot) = self.heap.get_mut(object).properties.get_mut(name) {
                    if slot.writable {
                        slot.value = value;
                        slot.getter = None;
                        slot.setter = None;
                    }
                }
                return;
            }
            if parent.is_none() {
                // Hoisting has normally created the binding already; a
                // missing one lands on the global object.
                self.define_data_property(object, Rc::from(name), value);
                return;
            }
            cursor = parent;
        }
    }

    pub(crate) fn ref_get(
        &mut self,
        reference: &Reference,
        scope: ScopeRef,
        typeof_ok: bool,
    ) -> Result<PropGet, Abort> {
        match &reference.base {
            RefBase::Scope => self.scope_get(scope, &reference.name, typeof_ok),
            RefBase::Value(base) => {
                let base = base.clone();
                self.prop_get(&base, &reference.name)
            }
        }
    }

    pub(crate) fn ref_set(
        &mut self,
        reference: &Reference,
        value: Value,
        scope: ScopeRef,
    ) -> Result<PropSet, Abort> {
        match &reference.base {
            RefBase::Scope => self.scope_set(scope, &reference.name, value),
            RefBase::Value(base) => {
                let base = base.clone();
                let strict = self.scopes.get(scope).strict;
                self.prop_set(&base, &reference.name, value, None, strict)
            }
        }
    }
}
