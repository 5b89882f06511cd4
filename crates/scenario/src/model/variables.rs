use std::collections::BTreeMap;

use super::element::{Element, ValidateError, ValidateErrorCode, ValidateMode};
use super::ident::Binding;
use super::master::SectionId;

/// Absolute bounds every variable range must sit inside.
pub const VAR_RANGE_MIN: i32 = -1_000_000;
pub const VAR_RANGE_MAX: i32 = 1_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VarKind {
    Attribute,
    Counter,
    Resource,
}

impl VarKind {
    pub const ALL: [VarKind; 3] = [VarKind::Attribute, VarKind::Counter, VarKind::Resource];

    pub fn label(self) -> &'static str {
        match self {
            VarKind::Attribute => "attribute",
            VarKind::Counter => "counter",
            VarKind::Resource => "resource",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VarHandle {
    pub kind: VarKind,
    pub slot: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VariableClass {
    kind: VarKind,
    pub id: String,
    pub name: String,
    minimum: i32,
    maximum: i32,
    pub scale: i32,
}

impl VariableClass {
    pub fn new(kind: VarKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
            name: String::new(),
            minimum: 0,
            maximum: 100,
            scale: 0,
        }
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn with_range(mut self, minimum: i32, maximum: i32) -> Self {
        self.set_range(minimum, maximum);
        self
    }

    pub fn with_scale(mut self, scale: i32) -> Self {
        self.scale = scale;
        self
    }

    pub fn kind(&self) -> VarKind {
        self.kind
    }

    pub fn minimum(&self) -> i32 {
        self.minimum
    }

    pub fn maximum(&self) -> i32 {
        self.maximum
    }

    pub fn set_range(&mut self, minimum: i32, maximum: i32) {
        let minimum = minimum.clamp(VAR_RANGE_MIN, VAR_RANGE_MAX);
        let maximum = maximum.clamp(minimum, VAR_RANGE_MAX);
        self.minimum = minimum;
        self.maximum = maximum;
    }

    pub fn contains(&self, amount: i32) -> bool {
        (self.minimum..=self.maximum).contains(&amount)
    }

    pub fn clamp_amount(&self, amount: i32) -> i32 {
        amount.clamp(self.minimum, self.maximum)
    }
}

/// One entry of a variable table: the amount plus the binding re-established
/// by validate. Equality ignores the binding.
#[derive(Debug, Clone, Default)]
pub struct VarValue {
    pub amount: i32,
    resolved: Option<VarHandle>,
}

impl VarValue {
    pub fn new(amount: i32) -> Self {
        Self {
            amount,
            resolved: None,
        }
    }

    pub fn resolved(&self) -> Option<VarHandle> {
        self.resolved
    }

    pub(crate) fn bind(&mut self, handle: Option<VarHandle>) {
        self.resolved = handle;
    }
}

impl PartialEq for VarValue {
    fn eq(&self, other: &Self) -> bool {
        self.amount == other.amount
    }
}

impl Eq for VarValue {}

impl Binding for VarValue {
    fn clear_binding(&mut self) {
        self.resolved = None;
    }
}

pub type VarMap = BTreeMap<String, VarValue>;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct VariableRegistry {
    attributes: Vec<VariableClass>,
    counters: Vec<VariableClass>,
    resources: Vec<VariableClass>,
}

impl VariableRegistry {
    pub fn insert(&mut self, class: VariableClass) -> VarHandle {
        let kind = class.kind();
        let list = self.list_mut(kind);
        list.push(class);
        VarHandle {
            kind,
            slot: (list.len() - 1) as u32,
        }
    }

    pub fn get(&self, handle: VarHandle) -> Option<&VariableClass> {
        self.list(handle.kind).get(handle.slot as usize)
    }

    pub fn get_mut(&mut self, handle: VarHandle) -> Option<&mut VariableClass> {
        self.list_mut(handle.kind).get_mut(handle.slot as usize)
    }

    /// Removal shifts later slots, so handles issued earlier may drift until
    /// the next validate pass.
    pub fn remove(&mut self, handle: VarHandle) -> Option<VariableClass> {
        let list = self.list_mut(handle.kind);
        if (handle.slot as usize) < list.len() {
            Some(list.remove(handle.slot as usize))
        } else {
            None
        }
    }

    pub fn find(&self, id: &str) -> Option<VarHandle> {
        VarKind::ALL
            .into_iter()
            .find_map(|kind| self.find_kind(kind, id))
    }

    pub fn find_kind(&self, kind: VarKind, id: &str) -> Option<VarHandle> {
        if id.is_empty() {
            return None;
        }
        self.list(kind)
            .iter()
            .position(|class| class.id == id)
            .map(|slot| VarHandle {
                kind,
                slot: slot as u32,
            })
    }

    pub fn of_kind(&self, kind: VarKind) -> &[VariableClass] {
        self.list(kind)
    }

    pub fn len(&self) -> usize {
        self.attributes.len() + self.counters.len() + self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = &VariableClass> {
        self.attributes
            .iter()
            .chain(self.counters.iter())
            .chain(self.resources.iter())
    }

    pub(crate) fn validate(&self, mode: ValidateMode) -> Result<(), ValidateError> {
        if !mode.is_strict() {
            return Ok(());
        }
        for class in self.iter() {
            if class.id.is_empty() {
                return Err(ValidateError {
                    code: ValidateErrorCode::EmptyIdentifier,
                    section: SectionId::Variables,
                    owner: class.name.clone(),
                    field: "id",
                    identifier: String::new(),
                    message: format!("{} class has an empty id", class.kind().label()),
                });
            }
        }
        Ok(())
    }

    fn list(&self, kind: VarKind) -> &Vec<VariableClass> {
        match kind {
            VarKind::Attribute => &self.attributes,
            VarKind::Counter => &self.counters,
            VarKind::Resource => &self.resources,
        }
    }

    fn list_mut(&mut self, kind: VarKind) -> &mut Vec<VariableClass> {
        match kind {
            VarKind::Attribute => &mut self.attributes,
            VarKind::Counter => &mut self.counters,
            VarKind::Resource => &mut self.resources,
        }
    }
}

/// Variable classes define identifiers but hold no references to other
/// classes, so the document-wide cascade always reports zero here.
impl Element for VariableRegistry {
    fn process_identifier(&mut self, _old_id: &str, _new_id: Option<&str>) -> usize {
        0
    }
}

/// Resolves every entry of a variable table against the registry, binding the
/// handle (or `None`). In strict mode an unresolved key or an amount outside
/// the variable's range is an error.
pub(crate) fn validate_var_map(
    section: SectionId,
    owner: &str,
    field: &'static str,
    kind: VarKind,
    map: &mut VarMap,
    variables: &VariableRegistry,
    mode: ValidateMode,
) -> Result<(), ValidateError> {
    for (id, value) in map.iter_mut() {
        let handle = variables.find_kind(kind, id);
        value.bind(handle);
        let Some(handle) = handle else {
            if mode.is_strict() {
                return Err(ValidateError {
                    code: ValidateErrorCode::UnresolvedVariable,
                    section,
                    owner: owner.to_string(),
                    field,
                    identifier: id.clone(),
                    message: format!("{} '{}' does not resolve", kind.label(), id),
                });
            }
            continue;
        };
        if mode.is_strict() {
            if let Some(class) = variables.get(handle) {
                if !class.contains(value.amount) {
                    return Err(ValidateError {
                        code: ValidateErrorCode::ValueOutOfRange,
                        section,
                        owner: owner.to_string(),
                        field,
                        identifier: id.clone(),
                        message: format!(
                            "value {} for {} '{}' is outside [{}, {}]",
                            value.amount,
                            kind.label(),
                            id,
                            class.minimum(),
                            class.maximum()
                        ),
                    });
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry_with_morale() -> VariableRegistry {
        let mut registry = VariableRegistry::default();
        registry.insert(
            VariableClass::new(VarKind::Attribute, "morale")
                .with_name("Morale")
                .with_range(0, 100),
        );
        registry
    }

    #[test]
    fn range_is_clamped_to_absolute_limits() {
        let class = VariableClass::new(VarKind::Counter, "kills").with_range(-9_000_000, 9_000_000);

        assert_eq!(class.minimum(), VAR_RANGE_MIN);
        assert_eq!(class.maximum(), VAR_RANGE_MAX);
    }

    #[test]
    fn range_keeps_minimum_at_or_below_maximum() {
        let class = VariableClass::new(VarKind::Counter, "kills").with_range(50, 10);

        assert_eq!(class.minimum(), 50);
        assert_eq!(class.maximum(), 50);
        assert!(class.contains(50));
        assert!(!class.contains(49));
        assert_eq!(class.clamp_amount(200), 50);
    }

    #[test]
    fn find_searches_kinds_in_fixed_order() {
        let mut registry = VariableRegistry::default();
        registry.insert(VariableClass::new(VarKind::Resource, "power"));
        let counter = registry.insert(VariableClass::new(VarKind::Counter, "power"));

        assert_eq!(registry.find("power"), Some(counter));
        assert_eq!(registry.find(""), None);
    }

    #[test]
    fn remove_shifts_later_slots() {
        let mut registry = VariableRegistry::default();
        let first = registry.insert(VariableClass::new(VarKind::Resource, "iron"));
        registry.insert(VariableClass::new(VarKind::Resource, "wood"));

        let removed = registry.remove(first).map(|class| class.id);
        assert_eq!(removed.as_deref(), Some("iron"));
        assert_eq!(
            registry.find("wood"),
            Some(VarHandle {
                kind: VarKind::Resource,
                slot: 0,
            })
        );
    }

    #[test]
    fn var_value_equality_ignores_binding() {
        let mut bound = VarValue::new(5);
        bound.bind(Some(VarHandle {
            kind: VarKind::Attribute,
            slot: 2,
        }));

        assert_eq!(bound, VarValue::new(5));
        assert_ne!(bound, VarValue::new(6));
    }

    #[test]
    fn validate_rejects_empty_id_in_strict_mode_only() {
        let mut registry = VariableRegistry::default();
        registry.insert(VariableClass::new(VarKind::Attribute, ""));

        let error = registry
            .validate(ValidateMode::Strict)
            .expect_err("strict error");
        assert_eq!(error.code, ValidateErrorCode::EmptyIdentifier);
        assert!(registry.validate(ValidateMode::Editor).is_ok());
    }

    #[test]
    fn var_map_validation_binds_resolved_entries() {
        let registry = registry_with_morale();
        let mut map = VarMap::new();
        map.insert("morale".to_string(), VarValue::new(60));

        validate_var_map(
            SectionId::Entities,
            "pikeman",
            "attributes",
            VarKind::Attribute,
            &mut map,
            &registry,
            ValidateMode::Strict,
        )
        .expect("validates");

        let handle = map["morale"].resolved().expect("bound");
        assert_eq!(handle.kind, VarKind::Attribute);
    }

    #[test]
    fn var_map_validation_fails_on_unresolved_key_in_strict_mode() {
        let registry = registry_with_morale();
        let mut map = VarMap::new();
        map.insert("courage".to_string(), VarValue::new(1));

        let error = validate_var_map(
            SectionId::Entities,
            "pikeman",
            "attributes",
            VarKind::Attribute,
            &mut map,
            &registry,
            ValidateMode::Strict,
        )
        .expect_err("unresolved");
        assert_eq!(error.code, ValidateErrorCode::UnresolvedVariable);
        assert_eq!(error.identifier, "courage");

        validate_var_map(
            SectionId::Entities,
            "pikeman",
            "attributes",
            VarKind::Attribute,
            &mut map,
            &registry,
            ValidateMode::Editor,
        )
        .expect("editor tolerates");
        assert_eq!(map["courage"].resolved(), None);
    }

    #[test]
    fn var_map_validation_checks_range_in_strict_mode() {
        let registry = registry_with_morale();
        let mut map = VarMap::new();
        map.insert("morale".to_string(), VarValue::new(250));

        let error = validate_var_map(
            SectionId::Entities,
            "pikeman",
            "attributes",
            VarKind::Attribute,
            &mut map,
            &registry,
            ValidateMode::Strict,
        )
        .expect_err("out of range");
        assert_eq!(error.code, ValidateErrorCode::ValueOutOfRange);

        validate_var_map(
            SectionId::Entities,
            "pikeman",
            "attributes",
            VarKind::Attribute,
            &mut map,
            &registry,
            ValidateMode::Editor,
        )
        .expect("editor tolerates");
    }

    #[test]
    fn kind_resolution_does_not_cross_namespaces() {
        let mut registry = VariableRegistry::default();
        registry.insert(VariableClass::new(VarKind::Resource, "morale"));
        let mut map = VarMap::new();
        map.insert("morale".to_string(), VarValue::new(1));

        let error = validate_var_map(
            SectionId::Entities,
            "pikeman",
            "attributes",
            VarKind::Attribute,
            &mut map,
            &registry,
            ValidateMode::Strict,
        )
        .expect_err("wrong kind");
        assert_eq!(error.code, ValidateErrorCode::UnresolvedVariable);
    }
}
