//! Interned type descriptors
//!
//! Every runtime value carries a [`TypeRef`] that points into a
//! [`TypeRegistry`]. The registry deduplicates descriptors by shape, so two
//! values have the same type exactly when their `TypeRef`s are the same
//! object. Descriptors are never removed once created.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

/// Kind of a type descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TypeKind {
    Null,
    Int,
    Float,
    Char,
    Boolean,
    Pointer,
    Array,
}

impl TypeKind {
    /// Scalar kinds take part in implicit numeric conversions
    pub fn is_scalar(self) -> bool {
        matches!(
            self,
            TypeKind::Int | TypeKind::Float | TypeKind::Char | TypeKind::Boolean
        )
    }
}

/// A type descriptor: a kind plus, for arrays, the element type
#[derive(Debug)]
pub struct TypeData {
    kind: TypeKind,
    element: Option<TypeRef>,
}

impl TypeData {
    pub fn kind(&self) -> TypeKind {
        self.kind
    }

    /// Element type of an array type. `None` for scalars and for the
    /// untyped empty-array type.
    pub fn element(&self) -> Option<&TypeRef> {
        self.element.as_ref()
    }
}

/// Shared handle to an interned [`TypeData`]
///
/// Equality and hashing are by identity, never by structure.
#[derive(Clone)]
pub struct TypeRef(Rc<TypeData>);

impl TypeRef {
    pub fn kind(&self) -> TypeKind {
        self.0.kind
    }

    pub fn element(&self) -> Option<&TypeRef> {
        self.0.element.as_ref()
    }

    pub fn is_array(&self) -> bool {
        self.0.kind == TypeKind::Array
    }

    /// The untyped array type used for `[]` literals
    pub fn is_null_array(&self) -> bool {
        self.0.kind == TypeKind::Array && self.0.element.is_none()
    }

    /// Array of char, the string type
    pub fn is_string(&self) -> bool {
        self.element()
            .map(|e| e.kind() == TypeKind::Char)
            .unwrap_or(false)
    }

    fn addr(&self) -> usize {
        Rc::as_ptr(&self.0) as usize
    }
}

impl PartialEq for TypeRef {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for TypeRef {}

impl Hash for TypeRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.addr().hash(state);
    }
}

impl fmt::Debug for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind() {
            TypeKind::Null => write!(f, "null"),
            TypeKind::Int => write!(f, "int"),
            TypeKind::Float => write!(f, "float"),
            TypeKind::Char => write!(f, "char"),
            TypeKind::Boolean => write!(f, "bool"),
            TypeKind::Pointer => write!(f, "pointer"),
            TypeKind::Array => match self.element() {
                None => write!(f, "array"),
                Some(e) if e.kind() == TypeKind::Char => write!(f, "string"),
                Some(e) => write!(f, "array[{}]", e),
            },
        }
    }
}

/// Interning key: kind plus the identity of the element type
type TypeKey = (TypeKind, Option<usize>);

/// Canonical table of type descriptors
///
/// The registry is explicit state owned by a compiled program and shared
/// (by `Rc`) with every machine running it. The base types are created
/// eagerly; array types are interned lazily on first request. The table
/// only grows.
pub struct TypeRegistry {
    types: RefCell<HashMap<TypeKey, TypeRef>>,

    null_type: TypeRef,
    int_type: TypeRef,
    float_type: TypeRef,
    char_type: TypeRef,
    boolean_type: TypeRef,
    pointer_type: TypeRef,
    null_array_type: TypeRef,
    string_type: TypeRef,
    int_array_type: TypeRef,
    float_array_type: TypeRef,
}

impl TypeRegistry {
    /// Create a registry populated with the base types
    pub fn new() -> Self {
        let mut table = HashMap::new();

        let mut base = |kind: TypeKind| {
            let ty = TypeRef(Rc::new(TypeData {
                kind,
                element: None,
            }));
            table.insert((kind, None), ty.clone());
            ty
        };

        let null_type = base(TypeKind::Null);
        let int_type = base(TypeKind::Int);
        let float_type = base(TypeKind::Float);
        let char_type = base(TypeKind::Char);
        let boolean_type = base(TypeKind::Boolean);
        let pointer_type = base(TypeKind::Pointer);
        let null_array_type = base(TypeKind::Array);

        let mut array_of = |element: &TypeRef| {
            let ty = TypeRef(Rc::new(TypeData {
                kind: TypeKind::Array,
                element: Some(element.clone()),
            }));
            table.insert((TypeKind::Array, Some(element.addr())), ty.clone());
            ty
        };

        let string_type = array_of(&char_type);
        let int_array_type = array_of(&int_type);
        let float_array_type = array_of(&float_type);
        array_of(&boolean_type);
        array_of(&string_type);

        Self {
            types: RefCell::new(table),
            null_type,
            int_type,
            float_type,
            char_type,
            boolean_type,
            pointer_type,
            null_array_type,
            string_type,
            int_array_type,
            float_array_type,
        }
    }

    /// Canonical descriptor for a non-array kind
    ///
    /// `TypeKind::Array` yields the untyped array type.
    pub fn get_type(&self, kind: TypeKind) -> TypeRef {
        match kind {
            TypeKind::Null => self.null_type.clone(),
            TypeKind::Int => self.int_type.clone(),
            TypeKind::Float => self.float_type.clone(),
            TypeKind::Char => self.char_type.clone(),
            TypeKind::Boolean => self.boolean_type.clone(),
            TypeKind::Pointer => self.pointer_type.clone(),
            TypeKind::Array => self.null_array_type.clone(),
        }
    }

    /// Canonical array-of-`element` descriptor, interned on first request
    pub fn get_array_type(&self, element: &TypeRef) -> TypeRef {
        let key = (TypeKind::Array, Some(element.addr()));
        self.types
            .borrow_mut()
            .entry(key)
            .or_insert_with(|| {
                TypeRef(Rc::new(TypeData {
                    kind: TypeKind::Array,
                    element: Some(element.clone()),
                }))
            })
            .clone()
    }

    pub fn null_type(&self) -> &TypeRef {
        &self.null_type
    }

    pub fn int_type(&self) -> &TypeRef {
        &self.int_type
    }

    pub fn float_type(&self) -> &TypeRef {
        &self.float_type
    }

    pub fn char_type(&self) -> &TypeRef {
        &self.char_type
    }

    pub fn boolean_type(&self) -> &TypeRef {
        &self.boolean_type
    }

    pub fn pointer_type(&self) -> &TypeRef {
        &self.pointer_type
    }

    pub fn null_array_type(&self) -> &TypeRef {
        &self.null_array_type
    }

    pub fn string_type(&self) -> &TypeRef {
        &self.string_type
    }

    pub fn int_array_type(&self) -> &TypeRef {
        &self.int_array_type
    }

    pub fn float_array_type(&self) -> &TypeRef {
        &self.float_array_type
    }

    /// Number of interned descriptors
    pub fn len(&self) -> usize {
        self.types.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.borrow().is_empty()
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeRegistry")
            .field("types", &self.len())
            .finish()
    }
}
