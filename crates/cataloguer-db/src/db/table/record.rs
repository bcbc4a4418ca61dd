//! Record codec between domain models and stored table rows

use cataloguer_core::models::{
    Catalogue, CatalogueItem, CatalogueItemImage, Invitation, Membership, Organization, User,
};
use cataloguer_core::AppError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::layout::{EntityKind, IndexLayout, PhysicalIndex};

/// Primary key of a row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PrimaryKey {
    pub pk: String,
    pub sk: String,
}

impl PrimaryKey {
    pub fn new(pk: impl Into<String>, sk: impl Into<String>) -> Self {
        Self {
            pk: pk.into(),
            sk: sk.into(),
        }
    }

    /// Primary key of an entity from its identifying attributes.
    pub fn of(kind: EntityKind, values: &[(&str, &str)]) -> Result<Self, AppError> {
        let primary = kind.layout().primary();
        Ok(Self {
            pk: primary.partition.render_from(values)?,
            sk: primary.sort.render_from(values)?,
        })
    }
}

/// Key of a row in one secondary index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexKey {
    pub pk: String,
    pub sk: String,
}

/// Where a row sits in an index; ties on the index sort key break on the primary key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Position {
    pub index_sk: String,
    pub pk: String,
    pub sk: String,
}

/// One physical row of the table
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    pub pk: String,
    pub sk: String,
    pub entity: EntityKind,
    /// Secondary keys in `gsi1..gsi4` order; `None` keeps the row out of that index.
    pub indexes: [Option<IndexKey>; 4],
    pub data: Value,
}

impl StoredRecord {
    pub fn primary_key(&self) -> PrimaryKey {
        PrimaryKey::new(self.pk.clone(), self.sk.clone())
    }

    /// Partition and sort key of this row in `index`, if it appears there.
    pub fn index_key(&self, index: PhysicalIndex) -> Option<(&str, &str)> {
        match index.slot() {
            None => Some((self.pk.as_str(), self.sk.as_str())),
            Some(slot) => self.indexes[slot]
                .as_ref()
                .map(|key| (key.pk.as_str(), key.sk.as_str())),
        }
    }

    pub fn position(&self, index: PhysicalIndex) -> Option<Position> {
        self.index_key(index).map(|(_, sk)| Position {
            index_sk: sk.to_string(),
            pk: self.pk.clone(),
            sk: self.sk.clone(),
        })
    }

    pub fn attributes(&self) -> Option<&Map<String, Value>> {
        self.data.as_object()
    }
}

/// A domain model persisted in the table
pub trait Entity: Serialize + DeserializeOwned + Send + Sync + 'static {
    const KIND: EntityKind;

    /// Encode into a row, deriving every key from the layout.
    fn to_record(&self) -> Result<StoredRecord, AppError> {
        encode(Self::KIND, serde_json::to_value(self)?)
    }

    fn from_record(record: StoredRecord) -> Result<Self, AppError> {
        if record.entity != Self::KIND {
            return Err(AppError::Internal(format!(
                "Row {}/{} holds a {} but a {} was expected",
                record.pk,
                record.sk,
                record.entity,
                Self::KIND
            )));
        }
        Ok(serde_json::from_value(record.data)?)
    }
}

impl Entity for Organization {
    const KIND: EntityKind = EntityKind::Organization;
}

impl Entity for Membership {
    const KIND: EntityKind = EntityKind::Membership;
}

impl Entity for Catalogue {
    const KIND: EntityKind = EntityKind::Catalogue;
}

impl Entity for CatalogueItem {
    const KIND: EntityKind = EntityKind::CatalogueItem;
}

impl Entity for CatalogueItemImage {
    const KIND: EntityKind = EntityKind::CatalogueItemImage;
}

impl Entity for Invitation {
    const KIND: EntityKind = EntityKind::Invitation;
}

impl Entity for User {
    const KIND: EntityKind = EntityKind::User;
}

fn render_index(
    index: &IndexLayout,
    attributes: &Map<String, Value>,
) -> Option<IndexKey> {
    Some(IndexKey {
        pk: index.partition.render(attributes)?,
        sk: index.sort.render(attributes)?,
    })
}

/// Build a row from an entity's serialized attributes.
pub fn encode(kind: EntityKind, data: Value) -> Result<StoredRecord, AppError> {
    let attributes = data.as_object().ok_or_else(|| {
        AppError::Internal(format!("{} did not serialize to an object", kind))
    })?;
    let layout = kind.layout();
    let primary = render_index(layout.primary(), attributes).ok_or_else(|| {
        AppError::Validation(format!("{} is missing a primary key attribute", kind))
    })?;

    let mut indexes: [Option<IndexKey>; 4] = Default::default();
    for index in &layout.indexes[1..] {
        if let Some(slot) = index.physical.slot() {
            indexes[slot] = render_index(index, attributes);
        }
    }

    Ok(StoredRecord {
        pk: primary.pk,
        sk: primary.sk,
        entity: kind,
        indexes,
        data,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn image() -> CatalogueItemImage {
        CatalogueItemImage {
            image_id: "img1".to_string(),
            item_id: "item1".to_string(),
            catalogue_id: "cat1".to_string(),
            org_id: "org1".to_string(),
            image_url: "https://cdn/x.png".to_string(),
            placeholder_hash: None,
            created_at: Utc.timestamp_millis_opt(1_700_000_000_123).unwrap(),
            deleted_at: None,
        }
    }

    #[test]
    fn test_image_record_keys() {
        let record = image().to_record().unwrap();
        assert_eq!(record.pk, "ITEM#item1");
        assert_eq!(record.sk, "IMAGE#img1");
        assert_eq!(
            record.index_key(PhysicalIndex::Gsi1),
            Some(("CAT#cat1", "IMAGE#0001700000000123#ID#img1"))
        );
        assert_eq!(record.index_key(PhysicalIndex::Gsi2), None);
        assert_eq!(
            record.index_key(PhysicalIndex::Gsi3),
            Some(("ORG#org1", "IMAGE#img1"))
        );
    }

    #[test]
    fn test_decode_rejects_other_kind() {
        let mut record = image().to_record().unwrap();
        record.entity = EntityKind::CatalogueItem;
        assert!(CatalogueItemImage::from_record(record).is_err());
    }

    #[test]
    fn test_decode_round_trips_entity() {
        let record = image().to_record().unwrap();
        assert_eq!(CatalogueItemImage::from_record(record).unwrap(), image());
    }

    #[test]
    fn test_primary_key_of() {
        let key = PrimaryKey::of(EntityKind::Membership, &[("orgId", "o1"), ("userId", "u1")]).unwrap();
        assert_eq!(key, PrimaryKey::new("ORG#o1", "MEMBER#u1"));
        assert!(PrimaryKey::of(EntityKind::Membership, &[("orgId", "o1")]).is_err());
    }

    #[test]
    fn test_encode_requires_primary_attributes() {
        let result = encode(EntityKind::Catalogue, json!({"name": "x"}));
        assert!(matches!(result, Err(AppError::Validation(_))));
    }
}
