//! Static index layout of the single table
//!
//! Every entity kind maps to an ordered list of indexes; the first entry is
//! the primary key. Key templates are `LABEL#value` pairs joined with `#`.

use std::fmt;

use cataloguer_core::AppError;
use serde_json::{Map, Value};

/// Separator between labels and values in composite keys.
pub const KEY_SEPARATOR: char = '#';

/// Width of zero-padded integer attributes inside keys.
pub const NUMERIC_KEY_WIDTH: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Organization,
    Membership,
    Catalogue,
    CatalogueItem,
    CatalogueItemImage,
    Invitation,
    User,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Organization => "organization",
            EntityKind::Membership => "membership",
            EntityKind::Catalogue => "catalogue",
            EntityKind::CatalogueItem => "catalogueItem",
            EntityKind::CatalogueItemImage => "catalogueItemImage",
            EntityKind::Invitation => "invitation",
            EntityKind::User => "user",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        ALL_KINDS.iter().copied().find(|k| k.as_str() == value)
    }

    pub fn layout(&self) -> &'static EntityLayout {
        match self {
            EntityKind::Organization => &ORGANIZATION,
            EntityKind::Membership => &MEMBERSHIP,
            EntityKind::Catalogue => &CATALOGUE,
            EntityKind::CatalogueItem => &CATALOGUE_ITEM,
            EntityKind::CatalogueItemImage => &CATALOGUE_ITEM_IMAGE,
            EntityKind::Invitation => &INVITATION,
            EntityKind::User => &USER,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub const ALL_KINDS: [EntityKind; 7] = [
    EntityKind::Organization,
    EntityKind::Membership,
    EntityKind::Catalogue,
    EntityKind::CatalogueItem,
    EntityKind::CatalogueItemImage,
    EntityKind::Invitation,
    EntityKind::User,
];

/// Physical key columns of the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PhysicalIndex {
    Primary,
    Gsi1,
    Gsi2,
    Gsi3,
    Gsi4,
}

impl PhysicalIndex {
    pub const SECONDARY: [PhysicalIndex; 4] = [
        PhysicalIndex::Gsi1,
        PhysicalIndex::Gsi2,
        PhysicalIndex::Gsi3,
        PhysicalIndex::Gsi4,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PhysicalIndex::Primary => "primary",
            PhysicalIndex::Gsi1 => "gsi1",
            PhysicalIndex::Gsi2 => "gsi2",
            PhysicalIndex::Gsi3 => "gsi3",
            PhysicalIndex::Gsi4 => "gsi4",
        }
    }

    /// Slot of a secondary index in `StoredRecord::indexes`.
    pub fn slot(&self) -> Option<usize> {
        match self {
            PhysicalIndex::Primary => None,
            PhysicalIndex::Gsi1 => Some(0),
            PhysicalIndex::Gsi2 => Some(1),
            PhysicalIndex::Gsi3 => Some(2),
            PhysicalIndex::Gsi4 => Some(3),
        }
    }
}

/// A composite key template: ordered `(label, attribute)` pairs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyTemplate {
    pub parts: &'static [(&'static str, &'static str)],
}

impl KeyTemplate {
    /// Render the full key from a record's attributes.
    ///
    /// Returns `None` when an attribute is missing; the record then does not
    /// appear in the index.
    pub fn render(&self, attributes: &Map<String, Value>) -> Option<String> {
        let mut segments = Vec::with_capacity(self.parts.len() * 2);
        for (label, attribute) in self.parts {
            segments.push((*label).to_string());
            segments.push(render_attribute(attributes.get(*attribute)?)?);
        }
        Some(segments.join("#"))
    }

    /// Render the leading pairs covered by `values`, in template order.
    pub fn render_leading(&self, values: &[String]) -> Result<String, AppError> {
        if values.len() > self.parts.len() {
            return Err(AppError::Validation(format!(
                "Key template accepts at most {} values, got {}",
                self.parts.len(),
                values.len()
            )));
        }
        if values.is_empty() {
            return Ok(self.parts.first().map(|(label, _)| format!("{}#", label)).unwrap_or_default());
        }
        let mut segments = Vec::with_capacity(values.len() * 2);
        for ((label, _), value) in self.parts.iter().zip(values) {
            segments.push((*label).to_string());
            segments.push(value.clone());
        }
        Ok(segments.join("#"))
    }

    /// Prefix shared by every key whose leading attributes equal `values`.
    pub fn prefix(&self, values: &[String]) -> Result<String, AppError> {
        let leading = self.render_leading(values)?;
        if values.is_empty() || values.len() == self.parts.len() {
            return Ok(leading);
        }
        let (next_label, _) = self.parts[values.len()];
        Ok(format!("{}#{}#", leading, next_label))
    }

    /// Smallest string sorting after every key that starts with `values`.
    pub fn upper_bound(&self, values: &[String]) -> Result<String, AppError> {
        let leading = self.render_leading(values)?;
        if values.is_empty() {
            return Ok(format!("{}{}", leading, char::MAX));
        }
        Ok(format!("{}{}{}", leading, KEY_SEPARATOR, char::MAX))
    }

    /// Render the full key from named values, for point lookups and partitions.
    pub fn render_from(&self, values: &[(&str, &str)]) -> Result<String, AppError> {
        let attributes: Map<String, Value> = values
            .iter()
            .map(|(name, value)| ((*name).to_string(), Value::String((*value).to_string())))
            .collect();
        self.render(&attributes).ok_or_else(|| {
            let expected: Vec<&str> = self.parts.iter().map(|(_, attr)| *attr).collect();
            AppError::Validation(format!(
                "Key requires attributes [{}]",
                expected.join(", ")
            ))
        })
    }
}

/// Render one attribute value as a key segment.
///
/// Strings are used as-is; integers are zero-padded so they sort numerically.
pub fn render_attribute(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => n
            .as_u64()
            .map(|v| format!("{:0width$}", v, width = NUMERIC_KEY_WIDTH)),
        _ => None,
    }
}

/// One access path of an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexLayout {
    pub name: &'static str,
    pub physical: PhysicalIndex,
    pub partition: KeyTemplate,
    pub sort: KeyTemplate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityLayout {
    pub kind: EntityKind,
    pub indexes: &'static [IndexLayout],
}

impl EntityLayout {
    pub fn primary(&self) -> &'static IndexLayout {
        &self.indexes[0]
    }

    pub fn index(&self, name: &str) -> Result<&'static IndexLayout, AppError> {
        self.indexes
            .iter()
            .find(|index| index.name == name)
            .ok_or_else(|| {
                AppError::Validation(format!("Unknown index '{}' for {}", name, self.kind))
            })
    }
}

const fn template(parts: &'static [(&'static str, &'static str)]) -> KeyTemplate {
    KeyTemplate { parts }
}

const fn index(
    name: &'static str,
    physical: PhysicalIndex,
    partition: &'static [(&'static str, &'static str)],
    sort: &'static [(&'static str, &'static str)],
) -> IndexLayout {
    IndexLayout {
        name,
        physical,
        partition: template(partition),
        sort: template(sort),
    }
}

pub const PRIMARY: &str = "primary";

static ORGANIZATION: EntityLayout = EntityLayout {
    kind: EntityKind::Organization,
    indexes: &[index(
        PRIMARY,
        PhysicalIndex::Primary,
        &[("ORG", "orgId")],
        &[("ORG", "orgId")],
    )],
};

static MEMBERSHIP: EntityLayout = EntityLayout {
    kind: EntityKind::Membership,
    indexes: &[
        index(
            PRIMARY,
            PhysicalIndex::Primary,
            &[("ORG", "orgId")],
            &[("MEMBER", "userId")],
        ),
        index(
            "byUser",
            PhysicalIndex::Gsi1,
            &[("USER", "userId")],
            &[("ORG", "orgId")],
        ),
    ],
};

static CATALOGUE: EntityLayout = EntityLayout {
    kind: EntityKind::Catalogue,
    indexes: &[
        index(
            PRIMARY,
            PhysicalIndex::Primary,
            &[("CAT", "catalogueId")],
            &[("CAT", "catalogueId")],
        ),
        index(
            "byOrg",
            PhysicalIndex::Gsi1,
            &[("ORG", "orgId")],
            &[("CAT", "catalogueId")],
        ),
    ],
};

static CATALOGUE_ITEM: EntityLayout = EntityLayout {
    kind: EntityKind::CatalogueItem,
    indexes: &[
        index(
            PRIMARY,
            PhysicalIndex::Primary,
            &[("ITEM", "itemId")],
            &[("ITEM", "itemId")],
        ),
        index(
            "byCatalogue",
            PhysicalIndex::Gsi1,
            &[("CAT", "catalogueId")],
            &[("ITEM", "itemId")],
        ),
        index(
            "byCataloguePrice",
            PhysicalIndex::Gsi2,
            &[("CAT", "catalogueId")],
            &[("PRICE", "priceSortKey"), ("ITEM", "itemId")],
        ),
        index(
            "byOrg",
            PhysicalIndex::Gsi3,
            &[("ORG", "orgId")],
            &[("ITEM", "itemId")],
        ),
        index(
            "byOrgPrice",
            PhysicalIndex::Gsi4,
            &[("ORG", "orgId")],
            &[("PRICE", "priceSortKey"), ("ITEM", "itemId")],
        ),
    ],
};

static CATALOGUE_ITEM_IMAGE: EntityLayout = EntityLayout {
    kind: EntityKind::CatalogueItemImage,
    indexes: &[
        index(
            PRIMARY,
            PhysicalIndex::Primary,
            &[("ITEM", "itemId")],
            &[("IMAGE", "imageId")],
        ),
        index(
            "byCatalogue",
            PhysicalIndex::Gsi1,
            &[("CAT", "catalogueId")],
            &[("IMAGE", "createdAt"), ("ID", "imageId")],
        ),
        index(
            "byOrg",
            PhysicalIndex::Gsi3,
            &[("ORG", "orgId")],
            &[("IMAGE", "imageId")],
        ),
    ],
};

static INVITATION: EntityLayout = EntityLayout {
    kind: EntityKind::Invitation,
    indexes: &[
        index(
            PRIMARY,
            PhysicalIndex::Primary,
            &[("ORG", "orgId")],
            &[("INVITATION", "invitationId")],
        ),
        index(
            "byCode",
            PhysicalIndex::Gsi1,
            &[("CODE", "code")],
            &[("INVITATION", "invitationId")],
        ),
    ],
};

static USER: EntityLayout = EntityLayout {
    kind: EntityKind::User,
    indexes: &[
        index(
            PRIMARY,
            PhysicalIndex::Primary,
            &[("USER", "userId")],
            &[("USER", "userId")],
        ),
        index(
            "byEmail",
            PhysicalIndex::Gsi1,
            &[("EMAIL", "email")],
            &[("USER", "userId")],
        ),
    ],
};
