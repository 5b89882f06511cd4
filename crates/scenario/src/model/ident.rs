use std::collections::BTreeMap;

/// Reference binding convention:
/// - `resolved` is filled by a validate pass and goes stale on any rename.
/// - It must only be trusted immediately after a successful validate on the
///   owning section.
/// - The empty identifier is the canonical "absent" value.
#[derive(Debug, Clone)]
pub struct IdRef<H> {
    id: String,
    resolved: Option<H>,
}

impl<H: Copy> IdRef<H> {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            resolved: None,
        }
    }

    pub fn empty() -> Self {
        Self {
            id: String::new(),
            resolved: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_empty(&self) -> bool {
        self.id.is_empty()
    }

    pub fn set_id(&mut self, id: impl Into<String>) {
        self.id = id.into();
        self.resolved = None;
    }

    pub fn resolved(&self) -> Option<H> {
        self.resolved
    }

    /// Re-establishes the binding from a registry lookup. Stores `None` both
    /// for the absent identifier and for a lookup miss; the caller decides
    /// whether a miss is an error.
    pub fn resolve_with<F>(&mut self, lookup: F) -> Option<H>
    where
        F: FnOnce(&str) -> Option<H>,
    {
        self.resolved = if self.id.is_empty() {
            None
        } else {
            lookup(&self.id)
        };
        self.resolved
    }

    /// Count/rename/delete contract for a single stored identifier:
    /// - `new_id == Some(old_id)`: count only, no mutation.
    /// - `new_id == Some(other)`: rename, binding cleared.
    /// - `new_id == None`: delete (the id becomes absent), binding cleared.
    pub fn process(&mut self, old_id: &str, new_id: Option<&str>) -> usize {
        if old_id.is_empty() || self.id != old_id {
            return 0;
        }
        match new_id {
            Some(new_id) if new_id == old_id => {}
            Some(new_id) => {
                self.id = new_id.to_string();
                self.resolved = None;
            }
            None => {
                self.id.clear();
                self.resolved = None;
            }
        }
        1
    }
}

impl<H> Default for IdRef<H> {
    fn default() -> Self {
        Self {
            id: String::new(),
            resolved: None,
        }
    }
}

impl<H> PartialEq for IdRef<H> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<H> Eq for IdRef<H> {}

/// Implemented by table values that cache a resolved handle, so a rename can
/// drop the stale binding instead of carrying it to the new key.
pub trait Binding {
    fn clear_binding(&mut self);
}

impl<H> Binding for Option<H> {
    fn clear_binding(&mut self) {
        *self = None;
    }
}

/// The identifier-table contract over a keyed table. Mode selection matches
/// `IdRef::process`. A rename onto a key that already exists replaces the
/// existing entry. The table never cascades into other tables; cascading is
/// the owning element's job so every object is visited exactly once.
pub fn process_keys<V: Binding>(
    table: &mut BTreeMap<String, V>,
    old_id: &str,
    new_id: Option<&str>,
) -> usize {
    if old_id.is_empty() {
        return 0;
    }
    match new_id {
        Some(new_id) if new_id == old_id => usize::from(table.contains_key(old_id)),
        Some(new_id) => match table.remove(old_id) {
            Some(mut value) => {
                value.clear_binding();
                table.insert(new_id.to_string(), value);
                1
            }
            None => 0,
        },
        None => usize::from(table.remove(old_id).is_some()),
    }
}
