//! Value operation helpers
//!
//! The arithmetic, comparison, array and cast rules shared by the inline
//! opcodes and the core natives. Both paths go through [`ValueOps`], so a
//! fast-path opcode can never disagree with the native it shortcuts.
//!
//! Numeric rules: int op int stays int (wrapping), any other scalar pairing
//! is computed in double precision. Arrays of equal length combine element
//! by element.

use crate::error::VmError;
use stagescript_types::{Payload, TypeKind, TypeRef, TypeRegistry, Value};
use std::cmp::Ordering;

/// Operand pair after numeric promotion
enum Operands {
    Int(i64, i64),
    Float(f64, f64),
}

type IntOp<'f> = &'f dyn Fn(i64, i64) -> Result<i64, VmError>;
type FloatOp<'f> = &'f dyn Fn(f64, f64) -> f64;

/// Human readable type of a value, for error messages
pub(crate) fn type_name(value: &Value) -> String {
    match value {
        Value::Empty => "null".to_string(),
        Value::Alias(_) => "reference".to_string(),
        Value::Direct(ty, _) => ty.to_string(),
    }
}

fn is_scalar(value: &Value) -> bool {
    value.kind().is_scalar()
}

fn ordering_value(ordering: Ordering) -> i64 {
    ordering as i64
}

/// Value operations bound to a type registry
#[derive(Clone, Copy)]
pub struct ValueOps<'a> {
    types: &'a TypeRegistry,
}

impl<'a> ValueOps<'a> {
    pub fn new(types: &'a TypeRegistry) -> Self {
        Self { types }
    }

    pub fn types(&self) -> &'a TypeRegistry {
        self.types
    }

    fn numbers(&self, operation: &str, left: &Value, right: &Value) -> Result<Operands, VmError> {
        match (left.payload(), right.payload()) {
            (Some(Payload::Int(a)), Some(Payload::Int(b))) => Ok(Operands::Int(*a, *b)),
            _ if is_scalar(left) && is_scalar(right) => {
                Ok(Operands::Float(left.as_float(), right.as_float()))
            }
            _ => Err(VmError::type_error(
                operation,
                "numeric operands",
                format!("{} and {}", type_name(left), type_name(right)),
            )),
        }
    }

    /// Combine two arrays of equal length element by element
    fn elementwise(
        &self,
        operation: &str,
        left: &Value,
        right: &Value,
        op: &dyn Fn(&Value, &Value) -> Result<Value, VmError>,
    ) -> Result<Value, VmError> {
        let (Some(a), Some(b)) = (left.array_items(), right.array_items()) else {
            return Err(VmError::type_error(
                operation,
                "two arrays or two scalars",
                format!("{} and {}", type_name(left), type_name(right)),
            ));
        };
        if a.len() != b.len() {
            return Err(VmError::type_error(
                operation,
                "arrays of equal length",
                format!("lengths {} and {}", a.len(), b.len()),
            ));
        }

        let items = a
            .iter()
            .zip(b.iter())
            .map(|(x, y)| op(x, y))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(self.array_from_items(left, items))
    }

    fn map_elements(
        &self,
        value: &Value,
        op: &dyn Fn(&Value) -> Result<Value, VmError>,
    ) -> Result<Value, VmError> {
        let items = value
            .array_items()
            .unwrap_or_default()
            .iter()
            .map(op)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(self.array_from_items(value, items))
    }

    /// Array typed after its first element, or after `template` when empty
    fn array_from_items(&self, template: &Value, items: Vec<Value>) -> Value {
        let element = items.first().and_then(|item| item.type_ref()).cloned();
        match element {
            Some(element) => self.types.array_value(&element, items),
            None => match template.type_ref() {
                Some(ty) => Value::new(ty.clone(), Payload::Array(items.into())),
                None => self.types.empty_array(),
            },
        }
    }

    fn arithmetic(
        &self,
        operation: &str,
        left: &Value,
        right: &Value,
        int_op: IntOp<'_>,
        float_op: FloatOp<'_>,
    ) -> Result<Value, VmError> {
        if left.is_array() || right.is_array() {
            return self.elementwise(operation, left, right, &|a, b| {
                self.arithmetic(operation, a, b, int_op, float_op)
            });
        }
        match self.numbers(operation, left, right)? {
            Operands::Int(a, b) => Ok(self.types.int_value(int_op(a, b)?)),
            Operands::Float(a, b) => Ok(self.types.float_value(float_op(a, b))),
        }
    }

    pub fn add(&self, left: &Value, right: &Value) -> Result<Value, VmError> {
        self.arithmetic("addition", left, right, &|a, b| Ok(a.wrapping_add(b)), &|a, b| a + b)
    }

    pub fn subtract(&self, left: &Value, right: &Value) -> Result<Value, VmError> {
        self.arithmetic("subtraction", left, right, &|a, b| Ok(a.wrapping_sub(b)), &|a, b| a - b)
    }

    pub fn multiply(&self, left: &Value, right: &Value) -> Result<Value, VmError> {
        self.arithmetic("multiplication", left, right, &|a, b| Ok(a.wrapping_mul(b)), &|a, b| a * b)
    }

    /// Truncating integer division; IEEE division for floats
    pub fn divide(&self, left: &Value, right: &Value) -> Result<Value, VmError> {
        self.arithmetic(
            "division",
            left,
            right,
            &|a, b| {
                if b == 0 {
                    Err(VmError::DivisionByZero)
                } else {
                    Ok(a.wrapping_div(b))
                }
            },
            &|a, b| a / b,
        )
    }

    /// Division rounded toward negative infinity
    pub fn fdivide(&self, left: &Value, right: &Value) -> Result<Value, VmError> {
        self.arithmetic(
            "floor division",
            left,
            right,
            &|a, b| {
                if b == 0 {
                    return Err(VmError::DivisionByZero);
                }
                let q = a.wrapping_div(b);
                if a.wrapping_rem(b) != 0 && ((a < 0) != (b < 0)) {
                    Ok(q - 1)
                } else {
                    Ok(q)
                }
            },
            &|a, b| (a / b).floor(),
        )
    }

    /// Remainder with the sign of the dividend
    pub fn remainder(&self, left: &Value, right: &Value) -> Result<Value, VmError> {
        self.arithmetic(
            "remainder",
            left,
            right,
            &|a, b| {
                if b == 0 {
                    Err(VmError::DivisionByZero)
                } else {
                    Ok(a.wrapping_rem(b))
                }
            },
            &|a, b| a % b,
        )
    }

    /// Integer power for non-negative int exponents, float power otherwise
    pub fn power(&self, left: &Value, right: &Value) -> Result<Value, VmError> {
        if left.is_array() || right.is_array() {
            return self.elementwise("power", left, right, &|a, b| self.power(a, b));
        }
        match self.numbers("power", left, right)? {
            Operands::Int(a, b) => match u32::try_from(b) {
                Ok(exp) => Ok(self.types.int_value(a.wrapping_pow(exp))),
                Err(_) => Ok(self.types.float_value((a as f64).powf(b as f64))),
            },
            Operands::Float(a, b) => Ok(self.types.float_value(a.powf(b))),
        }
    }

    pub fn negative(&self, value: &Value) -> Result<Value, VmError> {
        match value.payload() {
            Some(Payload::Int(i)) => Ok(self.types.int_value(i.wrapping_neg())),
            Some(Payload::Float(f)) => Ok(self.types.float_value(-f)),
            Some(Payload::Char(_)) | Some(Payload::Boolean(_)) => {
                Ok(self.types.int_value(value.as_int().wrapping_neg()))
            }
            Some(Payload::Array(_)) => self.map_elements(value, &|item| self.negative(item)),
            None => Err(VmError::type_error("negation", "numeric operand", type_name(value))),
        }
    }

    pub fn not(&self, value: &Value) -> Result<Value, VmError> {
        if !value.has_data() {
            return Err(VmError::type_error("not", "a value", type_name(value)));
        }
        Ok(self.types.boolean_value(!value.as_boolean()))
    }

    pub fn absolute(&self, value: &Value) -> Result<Value, VmError> {
        match value.payload() {
            Some(Payload::Int(i)) => Ok(self.types.int_value(i.wrapping_abs())),
            Some(Payload::Float(f)) => Ok(self.types.float_value(f.abs())),
            Some(Payload::Char(_)) | Some(Payload::Boolean(_)) => {
                Ok(self.types.int_value(value.as_int().wrapping_abs()))
            }
            Some(Payload::Array(_)) => self.map_elements(value, &|item| self.absolute(item)),
            None => Err(VmError::type_error("absolute", "numeric operand", type_name(value))),
        }
    }

    fn step(&self, operation: &str, value: &Value, delta: i64) -> Result<Value, VmError> {
        match value.payload() {
            Some(Payload::Int(i)) => Ok(self.types.int_value(i.wrapping_add(delta))),
            Some(Payload::Float(f)) => Ok(self.types.float_value(f + delta as f64)),
            Some(Payload::Char(c)) => (*c as i64)
                .checked_add(delta)
                .and_then(|code| u32::try_from(code).ok())
                .and_then(char::from_u32)
                .map(|c| self.types.char_value(c))
                .ok_or_else(|| VmError::type_error(operation, "a valid character", c.escape_debug())),
            Some(Payload::Boolean(_)) => Ok(self.types.boolean_value(delta > 0)),
            _ => Err(VmError::type_error(operation, "scalar operand", type_name(value))),
        }
    }

    pub fn successor(&self, value: &Value) -> Result<Value, VmError> {
        self.step("increment", value, 1)
    }

    pub fn predecessor(&self, value: &Value) -> Result<Value, VmError> {
        self.step("decrement", value, -1)
    }

    /// Three-way comparison: -1, 0 or 1
    ///
    /// Arrays compare element by element, then by length. Unordered floats
    /// compare equal.
    pub fn compare(&self, left: &Value, right: &Value) -> Result<i64, VmError> {
        match (left.payload(), right.payload()) {
            (Some(Payload::Array(a)), Some(Payload::Array(b))) => {
                for (x, y) in a.iter().zip(b.iter()) {
                    let r = self.compare(x, y)?;
                    if r != 0 {
                        return Ok(r);
                    }
                }
                Ok(ordering_value(a.len().cmp(&b.len())))
            }
            (Some(Payload::Int(a)), Some(Payload::Int(b))) => Ok(ordering_value(a.cmp(b))),
            (Some(Payload::Char(a)), Some(Payload::Char(b))) => Ok(ordering_value(a.cmp(b))),
            (Some(Payload::Boolean(a)), Some(Payload::Boolean(b))) => Ok(ordering_value(a.cmp(b))),
            _ if is_scalar(left) && is_scalar(right) => Ok(left
                .as_float()
                .partial_cmp(&right.as_float())
                .map(ordering_value)
                .unwrap_or(0)),
            _ => Err(VmError::type_error(
                "comparison",
                "comparable operands",
                format!("{} and {}", type_name(left), type_name(right)),
            )),
        }
    }

    /// Whether a value of type `src` may be stored where `dest` is declared
    pub fn check_assignable(&self, src: &TypeRef, dest: &TypeRef) -> Result<(), VmError> {
        if src == dest || (src.kind().is_scalar() && dest.kind().is_scalar()) {
            return Ok(());
        }
        if src.is_array() && dest.is_array() {
            return match (src.element(), dest.element()) {
                (Some(s), Some(d)) => self
                    .check_assignable(s, d)
                    .map_err(|_| self.mismatch(dest, src)),
                _ => Ok(()),
            };
        }
        Err(self.mismatch(dest, src))
    }

    fn mismatch(&self, expected: &TypeRef, found: &TypeRef) -> VmError {
        VmError::TypeMismatch {
            expected: expected.to_string(),
            found: found.to_string(),
        }
    }

    /// Assignment check between values; untyped slots accept anything
    pub fn type_assign_check(&self, src: &Value, dest: &Value) -> Result<(), VmError> {
        match (src.type_ref(), dest.type_ref()) {
            (Some(s), Some(d)) => self.check_assignable(s, d),
            _ => Ok(()),
        }
    }

    /// Array type resulting from appending `element` to an `array_type`
    ///
    /// The untyped array adopts the element's type.
    pub fn append_check(&self, array_type: &TypeRef, element: &Value) -> Result<TypeRef, VmError> {
        let Some(element_type) = element.type_ref() else {
            return Err(VmError::type_error("append", "a typed value", type_name(element)));
        };
        match array_type.element() {
            None => Ok(self.types.get_array_type(element_type)),
            Some(existing) => {
                self.check_assignable(element_type, existing)?;
                Ok(array_type.clone())
            }
        }
    }

    /// Coerce an element to the array's element type when kinds differ
    fn coerce_element(&self, item: &Value, element_type: Option<&TypeRef>) -> Result<Value, VmError> {
        match element_type {
            Some(ty) if item.kind() != ty.kind() => self.cast(item, ty),
            _ => Ok(item.clone()),
        }
    }

    /// Append in place, detaching shared storage first
    pub fn append_into(&self, array: &mut Value, element: &Value) -> Result<(), VmError> {
        let Some(array_type) = array.type_ref().filter(|ty| ty.is_array()) else {
            return Err(VmError::type_error("append", "array", type_name(array)));
        };
        let result_type = self.append_check(array_type, element)?;
        let item = self.coerce_element(element, result_type.element())?;

        if let Value::Direct(ty, _) = array {
            *ty = result_type;
        }
        if let Some(items) = array.detach_array() {
            items.push(item);
        }
        Ok(())
    }

    pub fn append(&self, array: Value, element: &Value) -> Result<Value, VmError> {
        let mut array = array;
        self.append_into(&mut array, element)?;
        Ok(array)
    }

    /// Concatenate in place, detaching shared storage first
    pub fn concatenate_into(&self, left: &mut Value, right: &Value) -> Result<(), VmError> {
        let (Some(lt), Some(rt)) = (
            left.type_ref().filter(|ty| ty.is_array()),
            right.type_ref().filter(|ty| ty.is_array()),
        ) else {
            return Err(VmError::type_error(
                "concatenation",
                "two arrays",
                format!("{} and {}", type_name(left), type_name(right)),
            ));
        };

        let result_type = if lt.is_null_array() {
            rt.clone()
        } else if rt.is_null_array() {
            lt.clone()
        } else {
            self.check_assignable(rt, lt)?;
            lt.clone()
        };
        let extra = right
            .array_items()
            .unwrap_or_default()
            .iter()
            .map(|item| self.coerce_element(item, result_type.element()))
            .collect::<Result<Vec<_>, _>>()?;

        if let Value::Direct(ty, _) = left {
            *ty = result_type;
        }
        if let Some(items) = left.detach_array() {
            items.extend(extra);
        }
        Ok(())
    }

    pub fn concatenate(&self, left: Value, right: &Value) -> Result<Value, VmError> {
        let mut left = left;
        self.concatenate_into(&mut left, right)?;
        Ok(left)
    }

    /// Validated element position for `index` in an array of `length`
    pub fn index_position(&self, index: &Value, length: usize) -> Result<usize, VmError> {
        if !is_scalar(index) {
            return Err(VmError::type_error("indexing", "numeric index", type_name(index)));
        }
        let i = index.as_int();
        usize::try_from(i)
            .ok()
            .filter(|&i| i < length)
            .ok_or(VmError::IndexOutOfBounds { index: i, length })
    }

    pub fn index<'v>(&self, array: &'v Value, index: &Value) -> Result<&'v Value, VmError> {
        let items = array
            .array_items()
            .ok_or_else(|| VmError::type_error("indexing", "array", type_name(array)))?;
        let i = self.index_position(index, items.len())?;
        Ok(&items[i])
    }

    pub fn length(&self, value: &Value) -> Value {
        self.types.int_value(value.length_as_array() as i64)
    }

    /// Convert a value to `target`
    ///
    /// Scalars convert freely among themselves. Arrays convert element by
    /// element. A scalar cast to string renders as text. Empty values and
    /// aliases pass through unchanged.
    pub fn cast(&self, value: &Value, target: &TypeRef) -> Result<Value, VmError> {
        if !matches!(value, Value::Direct(..)) || value.type_ref() == Some(target) {
            return Ok(value.clone());
        }
        let types = self.types;
        match target.kind() {
            TypeKind::Int if is_scalar(value) => Ok(types.int_value(value.as_int())),
            TypeKind::Float if is_scalar(value) => Ok(types.float_value(value.as_float())),
            TypeKind::Char if is_scalar(value) => Ok(types.char_value(value.as_char())),
            TypeKind::Boolean if is_scalar(value) => Ok(types.boolean_value(value.as_boolean())),
            TypeKind::Array if value.is_array() => match target.element() {
                None => Ok(value.clone()),
                Some(element) => {
                    let items = value
                        .array_items()
                        .unwrap_or_default()
                        .iter()
                        .map(|item| self.cast(item, element))
                        .collect::<Result<Vec<_>, _>>()?;
                    Ok(types.array_value(element, items))
                }
            },
            TypeKind::Array if target.is_string() && is_scalar(value) => {
                Ok(types.string_value(&value.to_display_string()))
            }
            _ => Err(VmError::TypeMismatch {
                expected: target.to_string(),
                found: type_name(value),
            }),
        }
    }
}
