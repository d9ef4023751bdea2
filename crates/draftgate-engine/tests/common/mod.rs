use std::collections::BTreeMap;

use serde_json::{json, Value};

use draftgate_core::errors::{DraftError, Result};
use draftgate_core::host::{
    DraftableEntity, EntityBackend, EntityRef, FieldValues, ReferenceState, ResolvedValue,
};
use draftgate_core::registry::{EntityDescriptor, ReferenceField, TypeRegistry};

/// A registry with the entity types the integration tests share:
/// `Role { name }` and `Person { role -> Role, name }`
#[allow(dead_code)]
pub fn test_registry() -> TypeRegistry {
    let mut registry = TypeRegistry::new();
    registry
        .register(EntityDescriptor::new("Role").with_scalar("name"))
        .unwrap();
    registry
        .register(
            EntityDescriptor::new("Person")
                .with_reference(ReferenceField::to("role", "Role"))
                .with_scalar("name"),
        )
        .unwrap();
    registry
}

/// In-memory host world: records stored as JSON field maps, ids handed
/// out sequentially per create. `Clone` deep-copies, so the engine's
/// snapshot-restore approval works against it.
#[derive(Debug, Default, Clone)]
pub struct TestWorld {
    records: BTreeMap<(String, String), BTreeMap<String, Value>>,
    next_id: u64,
}

#[allow(dead_code)]
impl TestWorld {
    pub fn new() -> Self {
        TestWorld::default()
    }

    pub fn seed(&mut self, entity_type: &str, id: &str, fields: &[(&str, Value)]) {
        let record = fields
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect();
        self.records
            .insert((entity_type.to_string(), id.to_string()), record);
    }

    pub fn record(&self, entity_type: &str, id: &str) -> Option<&BTreeMap<String, Value>> {
        self.records
            .get(&(entity_type.to_string(), id.to_string()))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }
}

fn to_json(value: &ResolvedValue) -> Value {
    match value {
        ResolvedValue::Null => Value::Null,
        ResolvedValue::Scalar(v) => v.clone(),
        ResolvedValue::Entity(r) => json!({ "type": r.entity_type, "id": r.id }),
    }
}

impl EntityBackend for TestWorld {
    fn exists(&self, entity_type: &str, id: &str) -> Result<bool> {
        Ok(self
            .records
            .contains_key(&(entity_type.to_string(), id.to_string())))
    }

    fn create(&mut self, entity_type: &str, values: &FieldValues) -> Result<String> {
        self.next_id += 1;
        let id = format!("{}-{}", entity_type.to_lowercase(), self.next_id);
        let record = values.iter().map(|(k, v)| (k.clone(), to_json(v))).collect();
        self.records
            .insert((entity_type.to_string(), id.clone()), record);
        Ok(id)
    }

    fn update(&mut self, entity_type: &str, id: &str, values: &FieldValues) -> Result<()> {
        let record = self
            .records
            .get_mut(&(entity_type.to_string(), id.to_string()))
            .ok_or_else(|| DraftError::Storage {
                message: format!("{} {} missing", entity_type, id),
            })?;
        for (field, value) in values {
            record.insert(field.clone(), to_json(value));
        }
        Ok(())
    }

    fn delete(&mut self, entity_type: &str, id: &str) -> Result<()> {
        self.records
            .remove(&(entity_type.to_string(), id.to_string()));
        Ok(())
    }
}

/// Builder-style entity double implementing the capture contract
#[derive(Debug, Clone)]
pub struct TestEntity {
    entity_type: String,
    id: Option<String>,
    persisted: bool,
    scalars: BTreeMap<String, (Value, Value)>,
    refs_current: BTreeMap<String, ReferenceState>,
    refs_prior: BTreeMap<String, EntityRef>,
}

#[allow(dead_code)]
impl TestEntity {
    pub fn unpersisted(entity_type: &str) -> Self {
        TestEntity {
            entity_type: entity_type.to_string(),
            id: None,
            persisted: false,
            scalars: BTreeMap::new(),
            refs_current: BTreeMap::new(),
            refs_prior: BTreeMap::new(),
        }
    }

    pub fn persisted(entity_type: &str, id: &str) -> Self {
        TestEntity {
            entity_type: entity_type.to_string(),
            id: Some(id.to_string()),
            persisted: true,
            scalars: BTreeMap::new(),
            refs_current: BTreeMap::new(),
            refs_prior: BTreeMap::new(),
        }
    }

    pub fn scalar(mut self, field: &str, old: Value, new: Value) -> Self {
        self.scalars.insert(field.to_string(), (old, new));
        self
    }

    pub fn reference(mut self, field: &str, state: ReferenceState) -> Self {
        self.refs_current.insert(field.to_string(), state);
        self
    }

    pub fn prior_reference(mut self, field: &str, target: EntityRef) -> Self {
        self.refs_prior.insert(field.to_string(), target);
        self
    }
}

impl DraftableEntity for TestEntity {
    fn entity_type(&self) -> &str {
        &self.entity_type
    }

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn is_persisted(&self) -> bool {
        self.persisted
    }

    fn reference_prior(&self, field: &str) -> Result<Option<EntityRef>> {
        Ok(self.refs_prior.get(field).cloned())
    }

    fn reference_current(&self, field: &str) -> Result<ReferenceState> {
        Ok(self
            .refs_current
            .get(field)
            .cloned()
            .unwrap_or(ReferenceState::Empty))
    }

    fn scalar_change(&self, field: &str) -> Result<Option<(Value, Value)>> {
        Ok(self.scalars.get(field).cloned())
    }
}

/// Separate the ids of drafts created back to back; draft ids are
/// time-ordered with millisecond precision
#[allow(dead_code)]
pub fn next_tick() {
    std::thread::sleep(std::time::Duration::from_millis(2));
}
