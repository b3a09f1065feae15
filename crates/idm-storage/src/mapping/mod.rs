//! Entity mapping layer.
//!
//! Domain values are stored as [`EntityRecord`]s: one root row plus child,
//! attribute, and member rows. The [`MappingRegistry`] translates between
//! the two forms; backends only ever see records.

pub mod descriptor;
pub mod mapped;
pub mod record;
pub mod registry;
pub mod value;

pub use descriptor::{
    CollectionMapping, EntityMapping, FieldDescriptor, FieldRole, TypeKey, TypeMapping,
    ID_PROPERTY,
};
pub use mapped::{property, Mapped, MappedParts, PropertyMap};
pub use record::{EntityRecord, PhysicalRecord};
pub use registry::{
    is_valid_identifier, standard, standard_mappings, ColumnSchema, MappingRegistry,
    MappingRegistryBuilder, UnitSchema,
};
pub use value::{FieldKind, FieldValue};
