//! Runtime values
//!
//! A [`Value`] is one of:
//! - `Empty`: a slot that has never been assigned,
//! - `Direct`: a type plus a payload (scalar or array),
//! - `Alias`: a non-owning reference to another slot, used for by-reference
//!   arguments and indexed assignment targets.
//!
//! Array payloads are reference counted and copy-on-write. Plain clones share
//! storage; any in-place mutation must go through [`Value::detach_array`] or
//! [`Value::make_unique`] first.

use crate::type_data::{TypeKind, TypeRef, TypeRegistry};
use std::fmt;
use std::rc::Rc;

/// Handle to an execution frame: a pool index plus the generation the slot
/// had when the handle was issued. A handle whose generation no longer
/// matches refers to a recycled frame and must be rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameId {
    pub index: u32,
    pub generation: u32,
}

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}@{}", self.index, self.generation)
    }
}

/// Location an alias points at
///
/// Slots are resolved by the machine at each use. Frame handles are
/// generation checked, stack entries must still carry the push tag recorded
/// when the alias was taken, and element positions are bounds checked, so an
/// alias can never observe storage that has been reused or reallocated.
#[derive(Debug, Clone, PartialEq)]
pub enum SlotRef {
    /// Local variable `index` of a frame
    Variable { frame: FrameId, index: usize },
    /// Operand stack position `index` (from the bottom) of a frame, valid
    /// while that position holds the entry pushed under `tag`
    Stack { frame: FrameId, index: usize, tag: u64 },
    /// Element `index` of the array stored at `base`
    Element { base: Box<SlotRef>, index: usize },
}

impl fmt::Display for SlotRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotRef::Variable { frame, index } => write!(f, "var[{}]{}", index, frame),
            SlotRef::Stack { frame, index, .. } => write!(f, "stack[{}]{}", index, frame),
            SlotRef::Element { base, index } => write!(f, "{}[{}]", base, index),
        }
    }
}

/// Payload of a direct value
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Int(i64),
    Float(f64),
    Char(char),
    Boolean(bool),
    /// Shared, copy-on-write element storage
    Array(Rc<Vec<Value>>),
}

/// A runtime value
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// Never assigned
    #[default]
    Empty,
    /// Typed data. An array type always pairs with an array payload.
    Direct(TypeRef, Payload),
    /// Reference to another slot
    Alias(SlotRef),
}

impl Value {
    /// Build a direct value, checking the type/payload shape invariant
    pub fn new(ty: TypeRef, payload: Payload) -> Self {
        debug_assert_eq!(
            ty.is_array(),
            matches!(payload, Payload::Array(_)),
            "array type must pair with array payload"
        );
        Value::Direct(ty, payload)
    }

    pub fn alias(slot: SlotRef) -> Self {
        Value::Alias(slot)
    }

    pub fn has_data(&self) -> bool {
        !matches!(self, Value::Empty)
    }

    /// Bound type of a direct value
    pub fn type_ref(&self) -> Option<&TypeRef> {
        match self {
            Value::Direct(ty, _) => Some(ty),
            _ => None,
        }
    }

    /// Kind of the value; `Null` when empty, `Pointer` for aliases
    pub fn kind(&self) -> TypeKind {
        match self {
            Value::Empty => TypeKind::Null,
            Value::Direct(ty, _) => ty.kind(),
            Value::Alias(_) => TypeKind::Pointer,
        }
    }

    /// Identity check against a canonical type
    pub fn is_type(&self, ty: &TypeRef) -> bool {
        self.type_ref() == Some(ty)
    }

    pub fn is_array(&self) -> bool {
        self.kind() == TypeKind::Array
    }

    pub fn is_alias(&self) -> bool {
        matches!(self, Value::Alias(_))
    }

    pub fn as_alias(&self) -> Option<&SlotRef> {
        match self {
            Value::Alias(slot) => Some(slot),
            _ => None,
        }
    }

    pub fn payload(&self) -> Option<&Payload> {
        match self {
            Value::Direct(_, payload) => Some(payload),
            _ => None,
        }
    }

    pub fn as_int(&self) -> i64 {
        match self.payload() {
            Some(Payload::Int(i)) => *i,
            Some(Payload::Float(f)) => *f as i64,
            Some(Payload::Char(c)) => *c as i64,
            Some(Payload::Boolean(b)) => *b as i64,
            _ => 0,
        }
    }

    pub fn as_float(&self) -> f64 {
        match self.payload() {
            Some(Payload::Int(i)) => *i as f64,
            Some(Payload::Float(f)) => *f,
            Some(Payload::Char(c)) => *c as u32 as f64,
            Some(Payload::Boolean(b)) => *b as i64 as f64,
            _ => 0.0,
        }
    }

    pub fn as_char(&self) -> char {
        match self.payload() {
            Some(Payload::Char(c)) => *c,
            Some(Payload::Int(_)) | Some(Payload::Float(_)) | Some(Payload::Boolean(_)) => {
                u32::try_from(self.as_int())
                    .ok()
                    .and_then(char::from_u32)
                    .unwrap_or('\0')
            }
            _ => '\0',
        }
    }

    pub fn as_boolean(&self) -> bool {
        match self {
            Value::Empty => false,
            Value::Alias(_) => true,
            Value::Direct(_, payload) => match payload {
                Payload::Int(i) => *i != 0,
                Payload::Float(f) => *f != 0.0,
                Payload::Char(c) => *c != '\0',
                Payload::Boolean(b) => *b,
                Payload::Array(items) => !items.is_empty(),
            },
        }
    }

    /// Elements of an array value
    pub fn array_items(&self) -> Option<&[Value]> {
        match self.payload() {
            Some(Payload::Array(items)) => Some(items.as_slice()),
            _ => None,
        }
    }

    /// Length of an array value, 0 for anything else
    pub fn length_as_array(&self) -> usize {
        self.array_items().map(|items| items.len()).unwrap_or(0)
    }

    pub fn index_as_array(&self, index: usize) -> Option<&Value> {
        self.array_items().and_then(|items| items.get(index))
    }

    /// Private, mutable element storage of an array value
    ///
    /// Detaches this level of the array from any other value sharing it.
    /// Nested arrays stay shared until they are detached themselves.
    pub fn detach_array(&mut self) -> Option<&mut Vec<Value>> {
        match self {
            Value::Direct(_, Payload::Array(items)) => Some(Rc::make_mut(items)),
            _ => None,
        }
    }

    /// Force a private deep copy of any shared array storage
    pub fn make_unique(&mut self) {
        if let Some(items) = self.detach_array() {
            for item in items.iter_mut() {
                item.make_unique();
            }
        }
    }

    /// Whether two array values currently share element storage
    pub fn shares_storage_with(&self, other: &Value) -> bool {
        match (self.payload(), other.payload()) {
            (Some(Payload::Array(a)), Some(Payload::Array(b))) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Replace type and payload in place
    pub fn reset(&mut self, ty: TypeRef, payload: Payload) {
        *self = Value::new(ty, payload);
    }

    /// Human readable rendering; strings render as their text
    pub fn to_display_string(&self) -> String {
        match self {
            Value::Empty => "null".to_string(),
            Value::Alias(slot) => format!("<ref {}>", slot),
            Value::Direct(ty, payload) => match payload {
                Payload::Int(i) => i.to_string(),
                Payload::Float(f) => f.to_string(),
                Payload::Char(c) => c.to_string(),
                Payload::Boolean(b) => b.to_string(),
                Payload::Array(items) if ty.is_string() => {
                    items.iter().map(|c| c.as_char()).collect()
                }
                Payload::Array(items) => {
                    let parts: Vec<String> =
                        items.iter().map(|item| item.to_display_string()).collect();
                    format!("[{}]", parts.join(", "))
                }
            },
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_display_string())
    }
}

// Value constructors bound to a registry
impl TypeRegistry {
    pub fn int_value(&self, i: i64) -> Value {
        Value::new(self.int_type().clone(), Payload::Int(i))
    }

    pub fn float_value(&self, f: f64) -> Value {
        Value::new(self.float_type().clone(), Payload::Float(f))
    }

    pub fn char_value(&self, c: char) -> Value {
        Value::new(self.char_type().clone(), Payload::Char(c))
    }

    pub fn boolean_value(&self, b: bool) -> Value {
        Value::new(self.boolean_type().clone(), Payload::Boolean(b))
    }

    pub fn string_value(&self, s: &str) -> Value {
        let chars = s.chars().map(|c| self.char_value(c)).collect();
        Value::new(self.string_type().clone(), Payload::Array(Rc::new(chars)))
    }

    /// Array value with an explicit element type
    ///
    /// The caller guarantees every item already has `element` as its type.
    pub fn array_value(&self, element: &TypeRef, items: Vec<Value>) -> Value {
        Value::new(self.get_array_type(element), Payload::Array(Rc::new(items)))
    }

    /// Zero-length array of the untyped array type
    pub fn empty_array(&self) -> Value {
        Value::new(self.null_array_type().clone(), Payload::Array(Rc::new(Vec::new())))
    }

    // Predicates compare canonical type identity

    pub fn is_int(&self, value: &Value) -> bool {
        value.is_type(self.int_type())
    }

    pub fn is_float(&self, value: &Value) -> bool {
        value.is_type(self.float_type())
    }

    pub fn is_boolean(&self, value: &Value) -> bool {
        value.is_type(self.boolean_type())
    }

    pub fn is_string(&self, value: &Value) -> bool {
        value.is_type(self.string_type())
    }

    pub fn is_array_of(&self, value: &Value, element: &TypeRef) -> bool {
        value.is_type(&self.get_array_type(element))
    }
}
