//! Declared entity fields

use std::fmt;

/// Multiplicity annotation of a relationship field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelationKind {
    /// One-to-one
    OneToOne,
    /// Many-to-one
    ManyToOne,
    /// One-to-many
    OneToMany,
    /// Many-to-many
    ManyToMany,
}

impl RelationKind {
    /// Whether the relationship targets a single entity
    pub fn is_to_one(self) -> bool {
        matches!(self, Self::OneToOne | Self::ManyToOne)
    }

    /// Whether the relationship targets a collection of entities
    pub fn is_to_many(self) -> bool {
        !self.is_to_one()
    }
}

impl fmt::Display for RelationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OneToOne => write!(f, "one-to-one"),
            Self::ManyToOne => write!(f, "many-to-one"),
            Self::OneToMany => write!(f, "one-to-many"),
            Self::ManyToMany => write!(f, "many-to-many"),
        }
    }
}

/// Relationship annotation of a field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Relation {
    /// Multiplicity
    pub kind: RelationKind,
    /// Owning field on the other side, for the inverse side of a relationship
    pub mapped_by: Option<&'static str>,
}

impl Relation {
    /// One-to-one relationship
    pub const fn one_to_one() -> Self {
        Self::new(RelationKind::OneToOne)
    }

    /// Many-to-one relationship
    pub const fn many_to_one() -> Self {
        Self::new(RelationKind::ManyToOne)
    }

    /// One-to-many relationship
    pub const fn one_to_many() -> Self {
        Self::new(RelationKind::OneToMany)
    }

    /// Many-to-many relationship
    pub const fn many_to_many() -> Self {
        Self::new(RelationKind::ManyToMany)
    }

    const fn new(kind: RelationKind) -> Self {
        Self {
            kind,
            mapped_by: None,
        }
    }

    /// Mark this side as the inverse of `field` on the target entity
    #[must_use]
    pub const fn mapped_by(mut self, field: &'static str) -> Self {
        self.mapped_by = Some(field);
        self
    }
}

/// Collection flavour of a to-many field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CollectionKind {
    /// Unordered, no duplicates
    Set,
    /// Ordered
    List,
}

/// Shape of the value stored in a field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldShape {
    /// Plain value
    Value,
    /// A single value of the named entity type
    Single(&'static str),
    /// A collection of the named entity type
    Collection(CollectionKind, &'static str),
}

/// One declared field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDecl {
    /// Field name as serialized
    pub name: &'static str,
    /// Value shape
    pub shape: FieldShape,
    /// Relationship annotation, if any
    pub relation: Option<Relation>,
}

/// Declared fields of an entity type, in declaration order
///
/// The identifier field is implicit and must serialize as `"id"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntitySchema {
    /// Entity name
    pub name: &'static str,
    /// Fields in declaration order
    pub fields: Vec<FieldDecl>,
}

impl EntitySchema {
    /// Start a schema for the named entity
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            fields: Vec::new(),
        }
    }

    /// Declare a plain field
    #[must_use]
    pub fn scalar(self, name: &'static str) -> Self {
        self.field(FieldDecl {
            name,
            shape: FieldShape::Value,
            relation: None,
        })
    }

    /// Declare a relationship to a single entity
    #[must_use]
    pub fn to_one(self, name: &'static str, target: &'static str, relation: Relation) -> Self {
        self.field(FieldDecl {
            name,
            shape: FieldShape::Single(target),
            relation: Some(relation),
        })
    }

    /// Declare a relationship to a collection of entities
    #[must_use]
    pub fn to_many(
        self,
        name: &'static str,
        target: &'static str,
        relation: Relation,
        collection: CollectionKind,
    ) -> Self {
        self.field(FieldDecl {
            name,
            shape: FieldShape::Collection(collection, target),
            relation: Some(relation),
        })
    }

    /// Declare an arbitrary field
    #[must_use]
    pub fn field(mut self, field: FieldDecl) -> Self {
        self.fields.push(field);
        self
    }
}
