//! Stagescript runtime data model
//!
//! This crate holds the two leaf components every other part of the engine
//! depends on:
//!
//! - `type_data`: the interned type lattice (null, int, float, char, boolean,
//!   pointer and array-of-T). Types are canonicalized by a [`TypeRegistry`],
//!   so identity comparison of two [`TypeRef`]s is the only type check used
//!   at runtime.
//! - `value`: the tagged runtime [`Value`], carrying either a scalar payload,
//!   a copy-on-write array payload, or an alias to another slot.

pub mod type_data;
pub mod value;

// Re-exports
pub use type_data::{TypeData, TypeKind, TypeRef, TypeRegistry};
pub use value::{FrameId, Payload, SlotRef, Value};
