use std::collections::BTreeMap;

use super::element::{process_all, Element, ValidateError, ValidateErrorCode, ValidateMode};
use super::entities::{EntityHandle, EntityKind, EntityRegistry};
use super::ident::process_keys;
use super::master::SectionId;
use super::template::EntityTemplate;
use super::variables::{validate_var_map, VarKind, VarMap, VariableRegistry};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FactionHandle(pub u32);

/// Buildable dictionaries are keyed by entity class id; the value is the
/// binding re-established by validate.
pub type BuildMap = BTreeMap<String, Option<EntityHandle>>;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FactionClass {
    pub id: String,
    pub name: String,
    pub resources: VarMap,
    pub buildable_units: BuildMap,
    pub buildable_upgrades: BuildMap,
    pub templates: Vec<EntityTemplate>,
}

impl FactionClass {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn label(&self) -> String {
        format!("faction '{}'", self.id)
    }

    pub(crate) fn validate(
        &mut self,
        entities: &EntityRegistry,
        variables: &VariableRegistry,
        mode: ValidateMode,
    ) -> Result<(), ValidateError> {
        let owner = self.label();
        validate_var_map(
            SectionId::Factions,
            &owner,
            "resources",
            VarKind::Resource,
            &mut self.resources,
            variables,
            mode,
        )?;
        validate_buildables(
            &owner,
            "buildable_units",
            EntityKind::Unit,
            &mut self.buildable_units,
            entities,
            mode,
        )?;
        validate_buildables(
            &owner,
            "buildable_upgrades",
            EntityKind::Upgrade,
            &mut self.buildable_upgrades,
            entities,
            mode,
        )?;
        for template in &mut self.templates {
            template.validate(SectionId::Factions, &owner, entities, variables, mode)?;
        }
        Ok(())
    }
}

fn validate_buildables(
    owner: &str,
    field: &'static str,
    want: EntityKind,
    table: &mut BuildMap,
    entities: &EntityRegistry,
    mode: ValidateMode,
) -> Result<(), ValidateError> {
    for (id, binding) in table.iter_mut() {
        match entities.find(id) {
            Some(handle) if handle.kind == want => {
                *binding = Some(handle);
            }
            Some(handle) => {
                *binding = None;
                if mode.is_strict() {
                    return Err(ValidateError {
                        code: ValidateErrorCode::CategoryMismatch,
                        section: SectionId::Factions,
                        owner: owner.to_string(),
                        field,
                        identifier: id.clone(),
                        message: format!(
                            "'{}' is a {}, expected a {}",
                            id,
                            handle.kind.label(),
                            want.label()
                        ),
                    });
                }
            }
            None => {
                *binding = None;
                if mode.is_strict() {
                    return Err(ValidateError {
                        code: ValidateErrorCode::UnresolvedEntity,
                        section: SectionId::Factions,
                        owner: owner.to_string(),
                        field,
                        identifier: id.clone(),
                        message: format!("{} '{}' does not resolve", want.label(), id),
                    });
                }
            }
        }
    }
    Ok(())
}

impl Element for FactionClass {
    fn process_identifier(&mut self, old_id: &str, new_id: Option<&str>) -> usize {
        let mut count = process_keys(&mut self.resources, old_id, new_id);
        count += process_keys(&mut self.buildable_units, old_id, new_id);
        count += process_keys(&mut self.buildable_upgrades, old_id, new_id);
        count += process_all(&mut self.templates, old_id, new_id);
        if new_id.is_none() {
            // A template whose class was just deleted has nothing left to
            // instantiate; drop the container too.
            self.templates.retain(|template| !template.class.is_empty());
        }
        count
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FactionRegistry {
    factions: Vec<FactionClass>,
}

impl FactionRegistry {
    pub fn insert(&mut self, class: FactionClass) -> FactionHandle {
        self.factions.push(class);
        FactionHandle((self.factions.len() - 1) as u32)
    }

    pub fn get(&self, handle: FactionHandle) -> Option<&FactionClass> {
        self.factions.get(handle.0 as usize)
    }

    pub fn get_mut(&mut self, handle: FactionHandle) -> Option<&mut FactionClass> {
        self.factions.get_mut(handle.0 as usize)
    }

    pub fn remove(&mut self, handle: FactionHandle) -> Option<FactionClass> {
        if (handle.0 as usize) < self.factions.len() {
            Some(self.factions.remove(handle.0 as usize))
        } else {
            None
        }
    }

    pub fn find(&self, id: &str) -> Option<FactionHandle> {
        if id.is_empty() {
            return None;
        }
        self.factions
            .iter()
            .position(|class| class.id == id)
            .map(|slot| FactionHandle(slot as u32))
    }

    pub fn classes(&self) -> &[FactionClass] {
        &self.factions
    }

    pub fn classes_mut(&mut self) -> &mut [FactionClass] {
        &mut self.factions
    }

    pub fn len(&self) -> usize {
        self.factions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factions.is_empty()
    }

    pub(crate) fn validate(
        &mut self,
        entities: &EntityRegistry,
        variables: &VariableRegistry,
        mode: ValidateMode,
    ) -> Result<(), ValidateError> {
        for faction in &mut self.factions {
            faction.validate(entities, variables, mode)?;
        }
        Ok(())
    }
}

impl Element for FactionRegistry {
    fn process_identifier(&mut self, old_id: &str, new_id: Option<&str>) -> usize {
        process_all(&mut self.factions, old_id, new_id)
    }
}
