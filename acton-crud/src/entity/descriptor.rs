//! Field classification of an entity type

use std::collections::HashSet;

use super::document::ID_FIELD;
use super::schema::{CollectionKind, EntitySchema, FieldShape, RelationKind};
use crate::error::{Error, Result};

/// How a declared field relates to other entities
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Not a relationship
    Scalar,
    /// Reference to a single entity
    ToOne {
        /// Target entity name
        target: &'static str,
        /// Declared multiplicity
        relation: RelationKind,
        /// Owning field on the target, for an inverse side
        mapped_by: Option<&'static str>,
    },
    /// Collection of entities
    ToMany {
        /// Target (element) entity name
        target: &'static str,
        /// Declared multiplicity
        relation: RelationKind,
        /// Collection flavour
        collection: CollectionKind,
        /// Owning field on the target, for an inverse side
        mapped_by: Option<&'static str>,
    },
}

impl FieldKind {
    /// Target entity name, if the field is a relationship
    pub fn target(&self) -> Option<&'static str> {
        match self {
            Self::Scalar => None,
            Self::ToOne { target, .. } | Self::ToMany { target, .. } => Some(target),
        }
    }

    /// Whether the field references other entities
    pub fn is_relationship(&self) -> bool {
        !matches!(self, Self::Scalar)
    }
}

/// One classified field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    /// Position in declaration order, used for alias naming
    pub index: usize,
    /// Serialized field name
    pub name: &'static str,
    /// Classification
    pub kind: FieldKind,
}

impl FieldDescriptor {
    /// Classify this field against the set of types already traversed
    pub fn traversal(&self, visited: &HashSet<&'static str>) -> Traversal {
        match self.kind {
            FieldKind::Scalar => Traversal::Terminal,
            FieldKind::ToOne { target, .. } if visited.contains(target) => {
                Traversal::ClosingOne { target }
            }
            FieldKind::ToOne { target, .. } => Traversal::ToOne { target },
            FieldKind::ToMany { target, .. } if visited.contains(target) => {
                Traversal::ClosingMany { target }
            }
            FieldKind::ToMany { target, .. } => Traversal::ToMany { target },
        }
    }
}

/// Classification of a field relative to the types already traversed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Traversal {
    /// A plain value
    Terminal,
    /// A to-one whose target was already visited; must be loaded but not joined
    ClosingOne {
        /// Target entity name
        target: &'static str,
    },
    /// A to-many whose target was already visited; must be loaded but not joined
    ClosingMany {
        /// Target entity name
        target: &'static str,
    },
    /// A to-one that can be traversed
    ToOne {
        /// Target entity name
        target: &'static str,
    },
    /// A to-many that can be traversed
    ToMany {
        /// Target entity name
        target: &'static str,
    },
}

/// Immutable field classification of one entity type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityDescriptor {
    name: &'static str,
    fields: Vec<FieldDescriptor>,
}

impl EntityDescriptor {
    /// Classify a declared schema
    ///
    /// Fails with `BadRequest` when a field is declared twice, when a field
    /// shadows the identifier, or when the relation annotation contradicts the
    /// field shape.
    pub fn from_schema(schema: &EntitySchema) -> Result<Self> {
        let mut seen = HashSet::new();
        let mut fields = Vec::with_capacity(schema.fields.len());

        for (index, decl) in schema.fields.iter().enumerate() {
            if decl.name == ID_FIELD {
                return Err(Error::BadRequest(format!(
                    "{}.{} is reserved for the identifier",
                    schema.name, decl.name
                )));
            }
            if !seen.insert(decl.name) {
                return Err(Error::BadRequest(format!(
                    "{}.{} is declared more than once",
                    schema.name, decl.name
                )));
            }

            let kind = match (decl.shape, decl.relation) {
                (FieldShape::Value, None) => FieldKind::Scalar,
                (FieldShape::Single(target), Some(relation)) if relation.kind.is_to_one() => {
                    FieldKind::ToOne {
                        target,
                        relation: relation.kind,
                        mapped_by: relation.mapped_by,
                    }
                }
                (FieldShape::Collection(collection, target), Some(relation))
                    if relation.kind.is_to_many() =>
                {
                    FieldKind::ToMany {
                        target,
                        relation: relation.kind,
                        collection,
                        mapped_by: relation.mapped_by,
                    }
                }
                (shape, relation) => {
                    return Err(Error::BadRequest(format!(
                        "{}.{}: relation {} does not fit field shape {:?}",
                        schema.name,
                        decl.name,
                        relation.map_or_else(|| "none".to_string(), |r| r.kind.to_string()),
                        shape
                    )))
                }
            };

            fields.push(FieldDescriptor {
                index,
                name: decl.name,
                kind,
            });
        }

        Ok(Self {
            name: schema.name,
            fields,
        })
    }

    /// Entity name
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// All fields in declaration order
    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    /// Look up a field by name
    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Relationship fields in declaration order
    pub fn relationships(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields.iter().filter(|f| f.kind.is_relationship())
    }

    /// Whether any field references another entity
    pub fn has_relationships(&self) -> bool {
        self.relationships().next().is_some()
    }

    /// Classify every field against the set of types already traversed
    ///
    /// Pure: the visited set is only read.
    pub fn classify<'a>(
        &'a self,
        visited: &HashSet<&'static str>,
    ) -> Vec<(&'a FieldDescriptor, Traversal)> {
        self.fields
            .iter()
            .map(|field| (field, field.traversal(visited)))
            .collect()
    }
}
