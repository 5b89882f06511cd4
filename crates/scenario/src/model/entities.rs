use super::element::{Element, ValidateError, ValidateErrorCode, ValidateMode};
use super::ident::{process_keys, IdRef};
use super::images::{ImageHandle, ImageRegistry};
use super::master::SectionId;
use super::variables::{validate_var_map, VarKind, VarMap, VariableRegistry};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Unit,
    Terrain,
    Effect,
    Upgrade,
}

impl EntityKind {
    pub const ALL: [EntityKind; 4] = [
        EntityKind::Unit,
        EntityKind::Terrain,
        EntityKind::Effect,
        EntityKind::Upgrade,
    ];

    pub fn label(self) -> &'static str {
        match self {
            EntityKind::Unit => "unit",
            EntityKind::Terrain => "terrain",
            EntityKind::Effect => "effect",
            EntityKind::Upgrade => "upgrade",
        }
    }
}

/// Category-specific payload. The variant decides the class category; the
/// registry re-checks the pairing during validate so a payload swap after
/// insertion cannot go unnoticed.
#[derive(Debug, Clone, PartialEq)]
pub enum EntityPayload {
    Unit { speed: i32, vision: i32 },
    Terrain { background: bool, passable: bool },
    Effect { duration: i32 },
    Upgrade { repeatable: bool },
}

impl EntityPayload {
    pub fn kind(&self) -> EntityKind {
        match self {
            EntityPayload::Unit { .. } => EntityKind::Unit,
            EntityPayload::Terrain { .. } => EntityKind::Terrain,
            EntityPayload::Effect { .. } => EntityKind::Effect,
            EntityPayload::Upgrade { .. } => EntityKind::Upgrade,
        }
    }

    pub fn default_for(kind: EntityKind) -> Self {
        match kind {
            EntityKind::Unit => EntityPayload::Unit {
                speed: 0,
                vision: 0,
            },
            EntityKind::Terrain => EntityPayload::Terrain {
                background: false,
                passable: true,
            },
            EntityKind::Effect => EntityPayload::Effect { duration: 0 },
            EntityKind::Upgrade => EntityPayload::Upgrade { repeatable: false },
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EntityClass {
    pub id: String,
    pub name: String,
    pub frame_index: i32,
    pub frame_count: i32,
    pub images: Vec<IdRef<ImageHandle>>,
    pub attributes: VarMap,
    pub counters: VarMap,
    pub resources: VarMap,
    pub attribute_mods: VarMap,
    pub counter_mods: VarMap,
    pub resource_mods: VarMap,
    pub payload: EntityPayload,
}

impl EntityClass {
    pub fn new(kind: EntityKind, id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            frame_index: 0,
            frame_count: 0,
            images: Vec::new(),
            attributes: VarMap::new(),
            counters: VarMap::new(),
            resources: VarMap::new(),
            attribute_mods: VarMap::new(),
            counter_mods: VarMap::new(),
            resource_mods: VarMap::new(),
            payload: EntityPayload::default_for(kind),
        }
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn with_frames(mut self, frame_index: i32, frame_count: i32) -> Self {
        self.frame_index = frame_index;
        self.frame_count = frame_count;
        self
    }

    pub fn with_payload(mut self, payload: EntityPayload) -> Self {
        self.payload = payload;
        self
    }

    pub fn kind(&self) -> EntityKind {
        self.payload.kind()
    }

    pub fn label(&self) -> String {
        format!("{} '{}'", self.kind().label(), self.id)
    }

    /// Half-open catalog range covered by this class, or `None` when either
    /// frame field is non-positive.
    pub fn frame_range(&self) -> Option<(i32, i32)> {
        if self.frame_index <= 0 || self.frame_count <= 0 {
            return None;
        }
        Some((
            self.frame_index,
            self.frame_index.saturating_add(self.frame_count),
        ))
    }

    pub(crate) fn validate(
        &mut self,
        variables: &VariableRegistry,
        images: &ImageRegistry,
        mode: ValidateMode,
    ) -> Result<(), ValidateError> {
        let owner = self.label();
        let maps: [(&'static str, VarKind, &mut VarMap); 6] = [
            ("attributes", VarKind::Attribute, &mut self.attributes),
            ("counters", VarKind::Counter, &mut self.counters),
            ("resources", VarKind::Resource, &mut self.resources),
            ("attribute_mods", VarKind::Attribute, &mut self.attribute_mods),
            ("counter_mods", VarKind::Counter, &mut self.counter_mods),
            ("resource_mods", VarKind::Resource, &mut self.resource_mods),
        ];
        for (field, kind, map) in maps {
            validate_var_map(SectionId::Entities, &owner, field, kind, map, variables, mode)?;
        }
        for image in &mut self.images {
            let resolved = image.resolve_with(|id| images.find(id));
            if mode.is_strict() && !image.is_empty() && resolved.is_none() {
                return Err(ValidateError {
                    code: ValidateErrorCode::UnresolvedImage,
                    section: SectionId::Entities,
                    owner: owner.clone(),
                    field: "images",
                    identifier: image.id().to_string(),
                    message: format!("image '{}' does not resolve", image.id()),
                });
            }
        }
        Ok(())
    }
}

impl Element for EntityClass {
    fn process_identifier(&mut self, old_id: &str, new_id: Option<&str>) -> usize {
        let mut count = 0;
        for map in [
            &mut self.attributes,
            &mut self.counters,
            &mut self.resources,
            &mut self.attribute_mods,
            &mut self.counter_mods,
            &mut self.resource_mods,
        ] {
            count += process_keys(map, old_id, new_id);
        }
        for image in &mut self.images {
            count += image.process(old_id, new_id);
        }
        if new_id.is_none() {
            self.images.retain(|image| !image.is_empty());
        }
        count
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntityHandle {
    pub kind: EntityKind,
    pub slot: u32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityRegistry {
    units: Vec<EntityClass>,
    terrains: Vec<EntityClass>,
    effects: Vec<EntityClass>,
    upgrades: Vec<EntityClass>,
}

impl EntityRegistry {
    pub fn insert(&mut self, class: EntityClass) -> EntityHandle {
        let kind = class.kind();
        let list = self.list_mut(kind);
        list.push(class);
        EntityHandle {
            kind,
            slot: (list.len() - 1) as u32,
        }
    }

    pub fn get(&self, handle: EntityHandle) -> Option<&EntityClass> {
        self.list(handle.kind).get(handle.slot as usize)
    }

    pub fn get_mut(&mut self, handle: EntityHandle) -> Option<&mut EntityClass> {
        self.list_mut(handle.kind).get_mut(handle.slot as usize)
    }

    /// Removal shifts later slots, so handles issued earlier may drift until
    /// the next validate pass.
    pub fn remove(&mut self, handle: EntityHandle) -> Option<EntityClass> {
        let list = self.list_mut(handle.kind);
        if (handle.slot as usize) < list.len() {
            Some(list.remove(handle.slot as usize))
        } else {
            None
        }
    }

    /// Lookup across all categories; ids are globally unique, so the fixed
    /// category order only decides which duplicate wins in a broken document.
    pub fn find(&self, id: &str) -> Option<EntityHandle> {
        EntityKind::ALL
            .into_iter()
            .find_map(|kind| self.find_kind(kind, id))
    }

    pub fn find_kind(&self, kind: EntityKind, id: &str) -> Option<EntityHandle> {
        if id.is_empty() {
            return None;
        }
        self.list(kind)
            .iter()
            .position(|class| class.id == id)
            .map(|slot| EntityHandle {
                kind,
                slot: slot as u32,
            })
    }

    /// Catalog lookup: the first class whose `[frame_index, frame_index +
    /// frame_count)` range contains `frame`, scanning categories in fixed
    /// order and skipping classes with a non-positive range field.
    pub fn class_at_frame(&self, frame: i32) -> Option<EntityHandle> {
        for kind in EntityKind::ALL {
            for (slot, class) in self.list(kind).iter().enumerate() {
                let Some((start, end)) = class.frame_range() else {
                    continue;
                };
                if frame >= start && frame < end {
                    return Some(EntityHandle {
                        kind,
                        slot: slot as u32,
                    });
                }
            }
        }
        None
    }

    pub fn of_kind(&self, kind: EntityKind) -> &[EntityClass] {
        self.list(kind)
    }

    pub fn len(&self) -> usize {
        EntityKind::ALL
            .into_iter()
            .map(|kind| self.list(kind).len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = (EntityHandle, &EntityClass)> {
        EntityKind::ALL.into_iter().flat_map(move |kind| {
            self.list(kind).iter().enumerate().map(move |(slot, class)| {
                (
                    EntityHandle {
                        kind,
                        slot: slot as u32,
                    },
                    class,
                )
            })
        })
    }

    pub(crate) fn validate(
        &mut self,
        variables: &VariableRegistry,
        images: &ImageRegistry,
        mode: ValidateMode,
    ) -> Result<(), ValidateError> {
        for kind in EntityKind::ALL {
            for class in self.list_mut(kind) {
                // Not mode-gated: a payload that disagrees with its category
                // list means the registry itself is corrupt.
                if class.kind() != kind {
                    return Err(ValidateError {
                        code: ValidateErrorCode::CategoryMismatch,
                        section: SectionId::Entities,
                        owner: class.label(),
                        field: "payload",
                        identifier: class.id.clone(),
                        message: format!(
                            "class '{}' is stored as {} but carries a {} payload",
                            class.id,
                            kind.label(),
                            class.kind().label()
                        ),
                    });
                }
                class.validate(variables, images, mode)?;
            }
        }
        Ok(())
    }

    fn list(&self, kind: EntityKind) -> &Vec<EntityClass> {
        match kind {
            EntityKind::Unit => &self.units,
            EntityKind::Terrain => &self.terrains,
            EntityKind::Effect => &self.effects,
            EntityKind::Upgrade => &self.upgrades,
        }
    }

    fn list_mut(&mut self, kind: EntityKind) -> &mut Vec<EntityClass> {
        match kind {
            EntityKind::Unit => &mut self.units,
            EntityKind::Terrain => &mut self.terrains,
            EntityKind::Effect => &mut self.effects,
            EntityKind::Upgrade => &mut self.upgrades,
        }
    }
}

impl Element for EntityRegistry {
    fn process_identifier(&mut self, old_id: &str, new_id: Option<&str>) -> usize {
        let mut count = 0;
        for kind in EntityKind::ALL {
            for class in self.list_mut(kind) {
                count += class.process_identifier(old_id, new_id);
            }
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::images::ImageClass;
    use crate::model::variables::{VarValue, VariableClass};

    fn pikeman() -> EntityClass {
        let mut class = EntityClass::new(EntityKind::Unit, "pikeman").with_name("Pikeman");
        class.attributes.insert("morale".to_string(), VarValue::new(60));
        class.attribute_mods.insert("morale".to_string(), VarValue::new(-10));
        class.resources.insert("iron".to_string(), VarValue::new(2));
        class.images.push(IdRef::new("inf"));
        class
    }

    fn full_registries() -> (VariableRegistry, ImageRegistry) {
        let mut variables = VariableRegistry::default();
        variables.insert(
            VariableClass::new(VarKind::Attribute, "morale").with_range(-100, 100),
        );
        variables.insert(VariableClass::new(VarKind::Resource, "iron").with_range(0, 1000));
        let mut images = ImageRegistry::default();
        images.insert(ImageClass::new("inf", "units/infantry.png"));
        (variables, images)
    }

    #[test]
    fn find_prefers_earlier_categories() {
        let mut registry = EntityRegistry::default();
        registry.insert(EntityClass::new(EntityKind::Terrain, "marsh"));
        let unit = registry.insert(EntityClass::new(EntityKind::Unit, "marsh"));

        assert_eq!(registry.find("marsh"), Some(unit));
    }

    #[test]
    fn class_at_frame_uses_half_open_range() {
        let mut registry = EntityRegistry::default();
        let handle =
            registry.insert(EntityClass::new(EntityKind::Unit, "pikeman").with_frames(10, 4));

        assert_eq!(registry.class_at_frame(10), Some(handle));
        assert_eq!(registry.class_at_frame(13), Some(handle));
        assert_eq!(registry.class_at_frame(14), None);
        assert_eq!(registry.class_at_frame(9), None);
    }

    #[test]
    fn class_at_frame_skips_non_positive_ranges() {
        let mut registry = EntityRegistry::default();
        registry.insert(EntityClass::new(EntityKind::Unit, "ghost").with_frames(0, 4));
        registry.insert(EntityClass::new(EntityKind::Unit, "husk").with_frames(3, 0));
        let real = registry.insert(EntityClass::new(EntityKind::Terrain, "grass").with_frames(3, 2));

        assert_eq!(registry.class_at_frame(3), Some(real));
    }

    #[test]
    fn process_identifier_covers_every_owned_table() {
        let mut class = pikeman();

        assert_eq!(class.process_identifier("morale", Some("morale")), 2);
        assert_eq!(class.process_identifier("morale", Some("grit")), 2);
        assert!(class.attributes.contains_key("grit"));
        assert!(class.attribute_mods.contains_key("grit"));
        assert!(!class.attributes.contains_key("morale"));
    }

    #[test]
    fn image_delete_prunes_the_stack_entry() {
        let mut class = pikeman();

        assert_eq!(class.process_identifier("inf", None), 1);
        assert!(class.images.is_empty());
    }

    #[test]
    fn image_rename_keeps_the_entry_and_clears_binding() {
        let (variables, images) = full_registries();
        let mut class = pikeman();
        class
            .validate(&variables, &images, ValidateMode::Strict)
            .expect("validates");
        assert!(class.images[0].resolved().is_some());

        assert_eq!(class.process_identifier("inf", Some("cav")), 1);
        assert_eq!(class.images[0].id(), "cav");
        assert_eq!(class.images[0].resolved(), None);
    }

    #[test]
    fn validate_binds_variable_entries() {
        let (variables, images) = full_registries();
        let mut class = pikeman();

        class
            .validate(&variables, &images, ValidateMode::Strict)
            .expect("validates");
        let handle = class.attributes["morale"].resolved().expect("bound");
        assert_eq!(handle.kind, VarKind::Attribute);
    }

    #[test]
    fn validate_reports_category_in_owner_label() {
        let (variables, images) = full_registries();
        let mut class = pikeman();
        class.counters.insert("kills".to_string(), VarValue::new(0));

        let error = class
            .validate(&variables, &images, ValidateMode::Strict)
            .expect_err("unresolved counter");
        assert_eq!(error.code, ValidateErrorCode::UnresolvedVariable);
        assert_eq!(error.owner, "unit 'pikeman'");

        class
            .validate(&variables, &images, ValidateMode::Editor)
            .expect("editor tolerates");
        assert_eq!(class.counters["kills"].resolved(), None);
    }

    #[test]
    fn validate_rejects_payload_outside_its_category_list() {
        let mut registry = EntityRegistry::default();
        let handle = registry.insert(EntityClass::new(EntityKind::Unit, "pikeman"));
        if let Some(class) = registry.get_mut(handle) {
            class.payload = EntityPayload::default_for(EntityKind::Effect);
        }
        let (variables, images) = full_registries();

        let error = registry
            .validate(&variables, &images, ValidateMode::Editor)
            .expect_err("partition drift");
        assert_eq!(error.code, ValidateErrorCode::CategoryMismatch);
    }

    #[test]
    fn registry_iter_walks_categories_in_order() {
        let mut registry = EntityRegistry::default();
        registry.insert(EntityClass::new(EntityKind::Upgrade, "steel_arms"));
        registry.insert(EntityClass::new(EntityKind::Unit, "pikeman"));

        let ids: Vec<&str> = registry.iter().map(|(_, class)| class.id.as_str()).collect();
        assert_eq!(ids, vec!["pikeman", "steel_arms"]);
    }
}
