//! Managed object model: values, objects, the ordered registry and the shipped modules.

pub mod modules;
pub mod object;
pub mod registry;
pub mod value;

pub use modules::{MibModule, Modules};
pub use object::{Access, ManagedObject, ValueSource};
pub use registry::{MibRegistry, SharedRegistry, DEFAULT_CONTEXT};
pub use value::{ScalarKind, ScalarValue};
