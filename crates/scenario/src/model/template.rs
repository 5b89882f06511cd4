use super::element::{Element, ValidateError, ValidateErrorCode, ValidateMode};
use super::entities::{EntityHandle, EntityKind, EntityRegistry};
use super::ident::{process_keys, IdRef};
use super::master::SectionId;
use super::variables::{validate_var_map, VarKind, VarMap, VariableRegistry};

/// Per-instance override of an entity class: optional display name, a frame
/// offset into the class's catalog range, and amounts overriding the class
/// defaults.
#[derive(Debug, Clone)]
pub struct EntityTemplate {
    kind: EntityKind,
    pub class: IdRef<EntityHandle>,
    pub name: Option<String>,
    pub frame_offset: i32,
    pub attributes: VarMap,
    pub counters: VarMap,
    pub resources: VarMap,
}

impl EntityTemplate {
    pub fn new(kind: EntityKind, class_id: impl Into<String>) -> Self {
        Self {
            kind,
            class: IdRef::new(class_id),
            name: None,
            frame_offset: 0,
            attributes: VarMap::new(),
            counters: VarMap::new(),
            resources: VarMap::new(),
        }
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn with_frame_offset(mut self, frame_offset: i32) -> Self {
        self.frame_offset = frame_offset;
        self
    }

    /// The owning class's category. Denormalized: validate re-syncs it from
    /// the resolved class.
    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub(crate) fn validate(
        &mut self,
        section: SectionId,
        owner: &str,
        entities: &EntityRegistry,
        variables: &VariableRegistry,
        mode: ValidateMode,
    ) -> Result<(), ValidateError> {
        match self.class.resolve_with(|id| entities.find(id)) {
            Some(handle) => {
                self.kind = handle.kind;
            }
            None => {
                if mode.is_strict() {
                    let (code, message) = if self.class.is_empty() {
                        (
                            ValidateErrorCode::MissingClassReference,
                            "template names no entity class".to_string(),
                        )
                    } else {
                        (
                            ValidateErrorCode::UnresolvedEntity,
                            format!("entity class '{}' does not resolve", self.class.id()),
                        )
                    };
                    return Err(ValidateError {
                        code,
                        section,
                        owner: owner.to_string(),
                        field: "templates",
                        identifier: self.class.id().to_string(),
                        message,
                    });
                }
            }
        }
        let maps: [(&'static str, VarKind, &mut VarMap); 3] = [
            ("attributes", VarKind::Attribute, &mut self.attributes),
            ("counters", VarKind::Counter, &mut self.counters),
            ("resources", VarKind::Resource, &mut self.resources),
        ];
        for (field, kind, map) in maps {
            validate_var_map(section, owner, field, kind, map, variables, mode)?;
        }
        Ok(())
    }
}

// The category tag is excluded: class ids are unique across categories, so
// two templates naming the same class are the same template.
impl PartialEq for EntityTemplate {
    fn eq(&self, other: &Self) -> bool {
        self.class == other.class
            && self.name == other.name
            && self.frame_offset == other.frame_offset
            && self.attributes == other.attributes
            && self.counters == other.counters
            && self.resources == other.resources
    }
}

impl Eq for EntityTemplate {}

impl Element for EntityTemplate {
    fn process_identifier(&mut self, old_id: &str, new_id: Option<&str>) -> usize {
        let mut count = self.class.process(old_id, new_id);
        count += process_keys(&mut self.attributes, old_id, new_id);
        count += process_keys(&mut self.counters, old_id, new_id);
        count += process_keys(&mut self.resources, old_id, new_id);
        count
    }
}
