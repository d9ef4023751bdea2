//! The storable change-set: an ordered mapping from field/reference name to
//! an (old, new) value pair.
//!
//! The persisted shape mirrors the historical draft format and is a
//! permanent contract:
//!
//! ```json
//! {
//!   "name":    ["old", "new"],
//!   "manager": [null, {"type": "Person", "id": "p1"}]
//! }
//! ```
//!
//! Reference values are `{"type", "id"}` objects; those two key names are
//! written to storage and cannot be renamed without migrating all existing
//! draft data. A reference whose `type` is the reserved name [`DRAFT_TYPE`]
//! points at another pending draft rather than a real entity.

use std::collections::BTreeMap;

use serde::ser::SerializeTuple;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Reserved reference type name denoting a pending draft target.
///
/// Written to storage; permanent. Host entity types may not register
/// under this name.
pub const DRAFT_TYPE: &str = "Draft";

use crate::model::draft::DraftId;

/// An association target captured in a change-set
///
/// The variant is decided once, at capture time: either the target was a
/// real persisted entity, or it was an unpersisted entity standing behind
/// its own pending draft. Resolution never re-derives this by inspection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawReference", into = "RawReference")]
pub enum Reference {
    /// A real persisted entity of the named type
    Entity { entity_type: String, id: String },
    /// Another draft whose materialization has not yet produced an entity
    Draft { draft_id: DraftId },
}

impl Reference {
    /// The persisted `{"type", "id"}` shape as a JSON value
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Reference::Entity { entity_type, id } => {
                serde_json::json!({ "type": entity_type, "id": id })
            }
            Reference::Draft { draft_id } => {
                serde_json::json!({ "type": DRAFT_TYPE, "id": draft_id.as_str() })
            }
        }
    }
}

/// Wire form of a reference. Key names are permanent storage contracts.
#[derive(Serialize, Deserialize)]
struct RawReference {
    #[serde(rename = "type")]
    ref_type: String,
    id: String,
}

impl From<RawReference> for Reference {
    fn from(raw: RawReference) -> Self {
        if raw.ref_type == DRAFT_TYPE {
            Reference::Draft {
                draft_id: DraftId::from(raw.id),
            }
        } else {
            Reference::Entity {
                entity_type: raw.ref_type,
                id: raw.id,
            }
        }
    }
}

impl From<Reference> for RawReference {
    fn from(reference: Reference) -> Self {
        match reference {
            Reference::Entity { entity_type, id } => RawReference {
                ref_type: entity_type,
                id,
            },
            Reference::Draft { draft_id } => RawReference {
                ref_type: DRAFT_TYPE.to_string(),
                id: draft_id.as_str().to_string(),
            },
        }
    }
}

/// One side of an (old, new) pair
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeValue {
    /// No value (empty reference target, or a null scalar)
    Absent,
    /// A scalar field value, stored verbatim
    Scalar(serde_json::Value),
    /// An association target
    Reference(Reference),
}

impl ChangeValue {
    /// Classify a raw JSON value read from storage.
    ///
    /// `null` is absent; an object holding exactly the reference keys is a
    /// reference; everything else is a scalar passed through verbatim.
    pub fn from_json(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => ChangeValue::Absent,
            serde_json::Value::Object(map)
                if map.len() == 2
                    && map.get("type").is_some_and(|v| v.is_string())
                    && map.get("id").is_some_and(|v| v.is_string()) =>
            {
                let ref_type = map["type"].as_str().unwrap_or_default().to_string();
                let id = map["id"].as_str().unwrap_or_default().to_string();
                ChangeValue::Reference(Reference::from(RawReference { ref_type, id }))
            }
            other => ChangeValue::Scalar(other),
        }
    }

    /// The raw JSON this value persists as
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            ChangeValue::Absent => serde_json::Value::Null,
            ChangeValue::Scalar(v) => v.clone(),
            ChangeValue::Reference(r) => r.to_json(),
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, ChangeValue::Absent)
    }
}

impl Serialize for ChangeValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            ChangeValue::Absent => serializer.serialize_unit(),
            ChangeValue::Scalar(v) => v.serialize(serializer),
            ChangeValue::Reference(r) => r.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for ChangeValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = serde_json::Value::deserialize(deserializer)?;
        Ok(ChangeValue::from_json(raw))
    }
}

/// An (old, new) pair for one field. Persisted as a two-element array.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldChange {
    pub old: ChangeValue,
    pub new: ChangeValue,
}

impl FieldChange {
    pub fn new(old: ChangeValue, new: ChangeValue) -> Self {
        FieldChange { old, new }
    }

    /// True when the pair records no actual change
    pub fn is_noop(&self) -> bool {
        self.old == self.new
    }
}

impl Serialize for FieldChange {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut tuple = serializer.serialize_tuple(2)?;
        tuple.serialize_element(&self.old)?;
        tuple.serialize_element(&self.new)?;
        tuple.end()
    }
}

impl<'de> Deserialize<'de> for FieldChange {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let (old, new) = <(ChangeValue, ChangeValue)>::deserialize(deserializer)?;
        Ok(FieldChange { old, new })
    }
}

/// Ordered mapping of field name to (old, new) pair
///
/// Backed by a `BTreeMap` so iteration and serialization order is
/// deterministic (field-name order) regardless of insertion order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChangeSet {
    entries: BTreeMap<String, FieldChange>,
}

impl ChangeSet {
    /// Create an empty change-set
    pub fn new() -> Self {
        ChangeSet {
            entries: BTreeMap::new(),
        }
    }

    /// Record the (old, new) pair for a field, replacing any existing entry
    pub fn insert(&mut self, field: impl Into<String>, change: FieldChange) {
        self.entries.insert(field.into(), change);
    }

    /// Look up the recorded change for a field
    pub fn get(&self, field: &str) -> Option<&FieldChange> {
        self.entries.get(field)
    }

    /// Iterate entries in deterministic (field-name) order
    pub fn iter(&self) -> impl Iterator<Item = (&String, &FieldChange)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn scalar(v: serde_json::Value) -> ChangeValue {
        ChangeValue::Scalar(v)
    }

    #[test]
    fn test_scalar_pair_persists_as_array() {
        let mut changes = ChangeSet::new();
        changes.insert(
            "name",
            FieldChange::new(scalar(json!("old")), scalar(json!("new"))),
        );

        let encoded = serde_json::to_value(&changes).unwrap();
        assert_eq!(encoded, json!({ "name": ["old", "new"] }));
    }

    #[test]
    fn test_entity_reference_persists_as_type_id_object() {
        let reference = Reference::Entity {
            entity_type: "Person".to_string(),
            id: "p1".to_string(),
        };
        let encoded = serde_json::to_value(&reference).unwrap();
        assert_eq!(encoded, json!({ "type": "Person", "id": "p1" }));
    }

    #[test]
    fn test_draft_reference_uses_reserved_type_name() {
        let reference = Reference::Draft {
            draft_id: DraftId::from("d1"),
        };
        let encoded = serde_json::to_value(&reference).unwrap();
        assert_eq!(encoded, json!({ "type": "Draft", "id": "d1" }));

        let back: Reference = serde_json::from_value(encoded).unwrap();
        assert_eq!(back, reference);
    }

    #[test]
    fn test_absent_persists_as_null() {
        let change = FieldChange::new(
            ChangeValue::Absent,
            ChangeValue::Reference(Reference::Entity {
                entity_type: "Person".to_string(),
                id: "p1".to_string(),
            }),
        );
        let encoded = serde_json::to_value(&change).unwrap();
        assert_eq!(encoded, json!([null, { "type": "Person", "id": "p1" }]));
    }

    #[test]
    fn test_change_set_round_trip() {
        let mut changes = ChangeSet::new();
        changes.insert(
            "manager",
            FieldChange::new(
                ChangeValue::Absent,
                ChangeValue::Reference(Reference::Draft {
                    draft_id: DraftId::from("d9"),
                }),
            ),
        );
        changes.insert(
            "name",
            FieldChange::new(scalar(json!("a")), scalar(json!("b"))),
        );

        let encoded = serde_json::to_string(&changes).unwrap();
        let back: ChangeSet = serde_json::from_str(&encoded).unwrap();
        assert_eq!(back, changes);
    }

    #[test]
    fn test_from_json_classifies_values() {
        assert_eq!(
            ChangeValue::from_json(json!(null)),
            ChangeValue::Absent
        );
        assert_eq!(
            ChangeValue::from_json(json!(42)),
            ChangeValue::Scalar(json!(42))
        );
        assert_eq!(
            ChangeValue::from_json(json!({ "type": "Role", "id": "r1" })),
            ChangeValue::Reference(Reference::Entity {
                entity_type: "Role".to_string(),
                id: "r1".to_string(),
            })
        );
        // Object without the exact reference shape stays a scalar
        assert_eq!(
            ChangeValue::from_json(json!({ "type": "Role", "id": "r1", "extra": 1 })),
            ChangeValue::Scalar(json!({ "type": "Role", "id": "r1", "extra": 1 }))
        );
    }

    #[test]
    fn test_iteration_order_is_field_name_order() {
        let mut changes = ChangeSet::new();
        changes.insert("zeta", FieldChange::new(scalar(json!(1)), scalar(json!(2))));
        changes.insert("alpha", FieldChange::new(scalar(json!(1)), scalar(json!(2))));

        let fields: Vec<&String> = changes.iter().map(|(name, _)| name).collect();
        assert_eq!(fields, ["alpha", "zeta"]);
    }

    proptest! {
        // Encoding must not depend on insertion order
        #[test]
        fn prop_encoding_is_insertion_order_independent(
            mut entries in proptest::collection::vec(("[a-z]{1,8}", "[a-z]{0,8}"), 1..8)
        ) {
            let mut forward = ChangeSet::new();
            for (field, value) in &entries {
                forward.insert(
                    field.clone(),
                    FieldChange::new(ChangeValue::Absent, scalar(json!(value))),
                );
            }

            entries.reverse();
            let mut backward = ChangeSet::new();
            for (field, value) in &entries {
                backward.insert(
                    field.clone(),
                    FieldChange::new(ChangeValue::Absent, scalar(json!(value))),
                );
            }

            let a = serde_json::to_string(&forward).unwrap();
            let b = serde_json::to_string(&backward).unwrap();
            prop_assert_eq!(a, b);
        }
    }
}
