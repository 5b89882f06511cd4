use std::collections::HashSet;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};

use super::area::{pack_areas, unpack_areas, AreaList};
use super::element::{Element, ValidateError, ValidateErrorCode, ValidateMode};
use super::entities::{EntityHandle, EntityRegistry};
use super::factions::{FactionHandle, FactionRegistry};
use super::grid::GridError;
use super::images::{ImageHandle, ImageRegistry};
use super::variables::{VarHandle, VariableRegistry};

pub const SECTION_COUNT: usize = 5;

/// Top-level sections in validation order. The dependency chain between
/// sections is fixed and small, so it is spelled out by hand instead of
/// derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionId {
    Variables,
    Images,
    Entities,
    Factions,
    Areas,
}

impl SectionId {
    pub const ALL: [SectionId; SECTION_COUNT] = [
        SectionId::Variables,
        SectionId::Images,
        SectionId::Entities,
        SectionId::Factions,
        SectionId::Areas,
    ];

    pub fn label(self) -> &'static str {
        match self {
            SectionId::Variables => "variables",
            SectionId::Images => "images",
            SectionId::Entities => "entities",
            SectionId::Factions => "factions",
            SectionId::Areas => "areas",
        }
    }

    /// Sections whose validity depends on this one, transitively, in
    /// validation order.
    pub fn dependents(self) -> &'static [SectionId] {
        match self {
            SectionId::Variables => &[SectionId::Entities, SectionId::Factions, SectionId::Areas],
            SectionId::Images => &[SectionId::Entities, SectionId::Factions, SectionId::Areas],
            SectionId::Entities => &[SectionId::Factions, SectionId::Areas],
            SectionId::Factions => &[SectionId::Areas],
            SectionId::Areas => &[],
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioHeader {
    pub name: String,
    pub description: String,
    pub map_width: u32,
    pub map_height: u32,
}

impl Default for ScenarioHeader {
    fn default() -> Self {
        Self {
            name: "untitled".to_string(),
            description: String::new(),
            map_width: 64,
            map_height: 48,
        }
    }
}

/// Where a loaded document came from: the root file, the relative include
/// path recorded for each included section, and the content hash taken over
/// root plus includes at load time.
#[derive(Debug, Clone, PartialEq)]
pub struct DocSource {
    pub root: PathBuf,
    pub includes: Vec<(SectionId, PathBuf)>,
    pub content_hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EditError {
    #[error("identifier must not be empty")]
    EmptyIdentifier,
    #[error("identifier '{0}' is not defined")]
    UnknownIdentifier(String),
    #[error("identifier '{0}' is already defined")]
    IdentifierTaken(String),
}

/// The whole scenario document: one instance of every section collection
/// plus file bookkeeping. Callers thread `&mut Scenario` through edits and
/// validation; exclusive access is ownership's problem, not this type's.
#[derive(Debug, Clone, Default)]
pub struct Scenario {
    pub header: ScenarioHeader,
    pub variables: VariableRegistry,
    pub images: ImageRegistry,
    pub entities: EntityRegistry,
    pub factions: FactionRegistry,
    pub areas: AreaList,
    source: Option<DocSource>,
}

enum DefinitionHandle {
    Variable(VarHandle),
    Image(ImageHandle),
    Entity(EntityHandle),
    Faction(FactionHandle),
}

impl Scenario {
    pub fn new(header: ScenarioHeader) -> Self {
        Self {
            header,
            ..Self::default()
        }
    }

    pub fn source(&self) -> Option<&DocSource> {
        self.source.as_ref()
    }

    pub(crate) fn set_source(&mut self, source: DocSource) {
        self.source = Some(source);
    }

    pub fn content_hash(&self) -> Option<&str> {
        self.source.as_ref().map(|source| source.content_hash.as_str())
    }

    pub fn include_path(&self, section: SectionId) -> Option<&Path> {
        self.source.as_ref().and_then(|source| {
            source
                .includes
                .iter()
                .find(|(included, _)| *included == section)
                .map(|(_, path)| path.as_path())
        })
    }

    /// Validates one section and then every section transitively dependent
    /// on it, in the fixed order.
    pub fn validate_section(
        &mut self,
        section: SectionId,
        mode: ValidateMode,
    ) -> Result<(), ValidateError> {
        if mode.is_strict() {
            self.check_unique_identifiers()?;
        }
        self.validate_one(section, mode)?;
        for &dependent in section.dependents() {
            self.validate_one(dependent, mode)?;
        }
        Ok(())
    }

    pub fn validate_all(&mut self, mode: ValidateMode) -> Result<(), ValidateError> {
        if mode.is_strict() {
            self.check_unique_identifiers()?;
        }
        for section in SectionId::ALL {
            self.validate_one(section, mode)?;
        }
        Ok(())
    }

    /// Bulk pass for reporting: keeps going past failing sections and
    /// returns the first error of each, in section order.
    pub fn validate_report(&mut self, mode: ValidateMode) -> Vec<ValidateError> {
        let mut errors = Vec::new();
        if mode.is_strict() {
            if let Err(error) = self.check_unique_identifiers() {
                errors.push(error);
            }
        }
        for section in SectionId::ALL {
            if let Err(error) = self.validate_one(section, mode) {
                errors.push(error);
            }
        }
        errors
    }

    fn validate_one(&mut self, section: SectionId, mode: ValidateMode) -> Result<(), ValidateError> {
        match section {
            SectionId::Variables => self.variables.validate(mode)?,
            SectionId::Images => self.images.validate(mode)?,
            SectionId::Entities => self.entities.validate(&self.variables, &self.images, mode)?,
            SectionId::Factions => self.factions.validate(&self.entities, &self.variables, mode)?,
            SectionId::Areas => {
                self.areas
                    .validate(&self.factions, &self.entities, &self.variables, mode)?
            }
        }
        debug!(section = section.label(), mode = ?mode, "section_validated");
        Ok(())
    }

    // Entity, variable, faction and image ids share one namespace; a
    // duplicate anywhere breaks resolution determinism.
    fn check_unique_identifiers(&self) -> Result<(), ValidateError> {
        fn claim<'a>(
            seen: &mut HashSet<&'a str>,
            id: &'a str,
            owner: String,
            section: SectionId,
        ) -> Result<(), ValidateError> {
            if id.is_empty() || seen.insert(id) {
                return Ok(());
            }
            Err(ValidateError {
                code: ValidateErrorCode::DuplicateIdentifier,
                section,
                owner,
                field: "id",
                identifier: id.to_string(),
                message: format!("identifier '{id}' is defined more than once"),
            })
        }

        let mut seen = HashSet::<&str>::new();
        for class in self.variables.iter() {
            let owner = format!("{} '{}'", class.kind().label(), class.id);
            claim(&mut seen, &class.id, owner, SectionId::Variables)?;
        }
        for class in self.images.classes() {
            let owner = format!("image '{}'", class.id);
            claim(&mut seen, &class.id, owner, SectionId::Images)?;
        }
        for (_, class) in self.entities.iter() {
            claim(&mut seen, &class.id, class.label(), SectionId::Entities)?;
        }
        for faction in self.factions.classes() {
            claim(&mut seen, &faction.id, faction.label(), SectionId::Factions)?;
        }
        Ok(())
    }

    /// Count, rename, or delete every occurrence of an identifier across
    /// the whole document. The aggregated count covers references only;
    /// defining classes keep their ids (see `rename_definition`).
    pub fn process_identifier(&mut self, old_id: &str, new_id: Option<&str>) -> usize {
        self.process_identifier_by_section(old_id, new_id)
            .into_iter()
            .map(|(_, count)| count)
            .sum()
    }

    pub fn process_identifier_by_section(
        &mut self,
        old_id: &str,
        new_id: Option<&str>,
    ) -> [(SectionId, usize); SECTION_COUNT] {
        [
            (
                SectionId::Variables,
                self.variables.process_identifier(old_id, new_id),
            ),
            (
                SectionId::Images,
                self.images.process_identifier(old_id, new_id),
            ),
            (
                SectionId::Entities,
                self.entities.process_identifier(old_id, new_id),
            ),
            (
                SectionId::Factions,
                self.factions.process_identifier(old_id, new_id),
            ),
            (
                SectionId::Areas,
                self.areas.process_identifier(old_id, new_id),
            ),
        ]
    }

    /// Occurrence count without mutation.
    pub fn occurrences(&mut self, id: &str) -> usize {
        self.process_identifier(id, Some(id))
    }

    /// Renames a defining class and cascades the rename through every
    /// reference. Returns the reference count.
    pub fn rename_definition(&mut self, old_id: &str, new_id: &str) -> Result<usize, EditError> {
        if old_id.is_empty() || new_id.is_empty() {
            return Err(EditError::EmptyIdentifier);
        }
        if old_id == new_id {
            return Ok(self.occurrences(old_id));
        }
        if self.find_definition(new_id).is_some() {
            return Err(EditError::IdentifierTaken(new_id.to_string()));
        }
        let handle = self
            .find_definition(old_id)
            .ok_or_else(|| EditError::UnknownIdentifier(old_id.to_string()))?;
        self.set_definition_id(handle, new_id);
        let count = self.process_identifier(old_id, Some(new_id));
        info!(old_id = old_id, new_id = new_id, count = count, "identifier_renamed");
        Ok(count)
    }

    /// Deletes a defining class, scrubbing every reference first so nothing
    /// dangles. Returns the count of references removed.
    pub fn delete_definition(&mut self, id: &str) -> Result<usize, EditError> {
        if id.is_empty() {
            return Err(EditError::EmptyIdentifier);
        }
        let handle = self
            .find_definition(id)
            .ok_or_else(|| EditError::UnknownIdentifier(id.to_string()))?;
        let count = self.process_identifier(id, None);
        self.remove_definition(handle);
        info!(id = id, count = count, "identifier_deleted");
        Ok(count)
    }

    /// Expands every area onto the map grid and packs the grid again,
    /// normalizing hand-authored rectangles into the packer's canonical
    /// shape.
    pub fn repack_areas(&mut self) -> Result<(), GridError> {
        let mut grid = unpack_areas(
            self.header.map_width,
            self.header.map_height,
            self.areas.areas(),
        )?;
        let packed = pack_areas(&mut grid);
        info!(
            areas = packed.len(),
            rects = packed.iter().map(|area| area.rects.len()).sum::<usize>(),
            "areas_repacked"
        );
        self.areas.set_areas(packed);
        Ok(())
    }

    fn find_definition(&self, id: &str) -> Option<DefinitionHandle> {
        if let Some(handle) = self.variables.find(id) {
            return Some(DefinitionHandle::Variable(handle));
        }
        if let Some(handle) = self.images.find(id) {
            return Some(DefinitionHandle::Image(handle));
        }
        if let Some(handle) = self.entities.find(id) {
            return Some(DefinitionHandle::Entity(handle));
        }
        self.factions.find(id).map(DefinitionHandle::Faction)
    }

    fn set_definition_id(&mut self, handle: DefinitionHandle, new_id: &str) {
        match handle {
            DefinitionHandle::Variable(handle) => {
                if let Some(class) = self.variables.get_mut(handle) {
                    class.id = new_id.to_string();
                }
            }
            DefinitionHandle::Image(handle) => {
                if let Some(class) = self.images.get_mut(handle) {
                    class.id = new_id.to_string();
                }
            }
            DefinitionHandle::Entity(handle) => {
                if let Some(class) = self.entities.get_mut(handle) {
                    class.id = new_id.to_string();
                }
            }
            DefinitionHandle::Faction(handle) => {
                if let Some(class) = self.factions.get_mut(handle) {
                    class.id = new_id.to_string();
                }
            }
        }
    }

    fn remove_definition(&mut self, handle: DefinitionHandle) {
        match handle {
            DefinitionHandle::Variable(handle) => {
                self.variables.remove(handle);
            }
            DefinitionHandle::Image(handle) => {
                self.images.remove(handle);
            }
            DefinitionHandle::Entity(handle) => {
                self.entities.remove(handle);
            }
            DefinitionHandle::Faction(handle) => {
                self.factions.remove(handle);
            }
        }
    }
}
