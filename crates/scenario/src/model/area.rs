use super::element::{process_all, Element, ValidateError, ValidateErrorCode, ValidateMode};
use super::entities::{EntityKind, EntityPayload, EntityRegistry};
use super::factions::{FactionHandle, FactionRegistry};
use super::grid::{pack_cells, rect_in_bounds, CellContent, Grid, GridError, Rect};
use super::ident::IdRef;
use super::master::SectionId;
use super::template::EntityTemplate;
use super::variables::VariableRegistry;

/// One cell of the authoring grid: the template stack instantiated there
/// plus the home faction claiming the cell. This is the content type the
/// packer compares, so two cells merge only when both parts are equal.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AreaCell {
    pub stack: Vec<EntityTemplate>,
    pub faction: IdRef<FactionHandle>,
}

impl CellContent for AreaCell {
    fn is_empty(&self) -> bool {
        self.stack.is_empty() && self.faction.is_empty()
    }

    fn clear(&mut self) {
        self.stack.clear();
        self.faction = IdRef::empty();
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Area {
    pub rects: Vec<Rect>,
    pub stack: Vec<EntityTemplate>,
    pub faction: IdRef<FactionHandle>,
}

impl Area {
    pub fn cell(&self) -> AreaCell {
        AreaCell {
            stack: self.stack.clone(),
            faction: self.faction.clone(),
        }
    }

    pub fn cell_count(&self) -> usize {
        self.rects.iter().map(Rect::cell_count).sum()
    }

    pub(crate) fn validate(
        &mut self,
        index: usize,
        factions: &FactionRegistry,
        entities: &EntityRegistry,
        variables: &VariableRegistry,
        mode: ValidateMode,
    ) -> Result<(), ValidateError> {
        let owner = format!("area {index}");
        let resolved = self.faction.resolve_with(|id| factions.find(id));
        if mode.is_strict() && !self.faction.is_empty() && resolved.is_none() {
            return Err(ValidateError {
                code: ValidateErrorCode::UnresolvedFaction,
                section: SectionId::Areas,
                owner,
                field: "faction",
                identifier: self.faction.id().to_string(),
                message: format!("faction '{}' does not resolve", self.faction.id()),
            });
        }
        for template in &mut self.stack {
            template.validate(SectionId::Areas, &owner, entities, variables, mode)?;
        }
        if mode.is_strict() {
            // The ground layer must come first: whichever terrain template
            // sits lowest in the stack has to be a background terrain.
            let first_terrain = self.stack.iter().find_map(|template| {
                template
                    .class
                    .resolved()
                    .and_then(|handle| entities.get(handle))
                    .filter(|class| class.kind() == EntityKind::Terrain)
            });
            if let Some(class) = first_terrain {
                let background = matches!(
                    class.payload,
                    EntityPayload::Terrain {
                        background: true,
                        ..
                    }
                );
                if !background {
                    return Err(ValidateError {
                        code: ValidateErrorCode::TerrainStackOrder,
                        section: SectionId::Areas,
                        owner,
                        field: "stack",
                        identifier: class.id.clone(),
                        message: format!(
                            "first terrain in the stack must be a background terrain, got '{}'",
                            class.id
                        ),
                    });
                }
            }
        }
        Ok(())
    }
}

impl Element for Area {
    fn process_identifier(&mut self, old_id: &str, new_id: Option<&str>) -> usize {
        let mut count = self.faction.process(old_id, new_id);
        count += process_all(&mut self.stack, old_id, new_id);
        if new_id.is_none() {
            self.stack.retain(|template| !template.class.is_empty());
        }
        count
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AreaList {
    areas: Vec<Area>,
}

impl AreaList {
    pub fn push(&mut self, area: Area) {
        self.areas.push(area);
    }

    pub fn areas(&self) -> &[Area] {
        &self.areas
    }

    pub fn areas_mut(&mut self) -> &mut [Area] {
        &mut self.areas
    }

    pub fn set_areas(&mut self, areas: Vec<Area>) {
        self.areas = areas;
    }

    pub fn len(&self) -> usize {
        self.areas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.areas.is_empty()
    }

    pub fn rect_count(&self) -> usize {
        self.areas.iter().map(|area| area.rects.len()).sum()
    }

    pub fn covered_cells(&self) -> usize {
        self.areas.iter().map(Area::cell_count).sum()
    }

    pub(crate) fn validate(
        &mut self,
        factions: &FactionRegistry,
        entities: &EntityRegistry,
        variables: &VariableRegistry,
        mode: ValidateMode,
    ) -> Result<(), ValidateError> {
        for (index, area) in self.areas.iter_mut().enumerate() {
            area.validate(index, factions, entities, variables, mode)?;
        }
        Ok(())
    }
}

impl Element for AreaList {
    fn process_identifier(&mut self, old_id: &str, new_id: Option<&str>) -> usize {
        process_all(&mut self.areas, old_id, new_id)
    }
}

pub fn pack_areas(grid: &mut Grid<AreaCell>) -> Vec<Area> {
    pack_cells(grid)
        .into_iter()
        .map(|(cell, rects)| Area {
            rects,
            stack: cell.stack,
            faction: cell.faction,
        })
        .collect()
}

/// Expands areas back onto a cell grid. Overlapping areas accumulate:
/// stacks are appended in area order and the last claiming faction wins.
pub fn unpack_areas(width: u32, height: u32, areas: &[Area]) -> Result<Grid<AreaCell>, GridError> {
    let mut grid: Grid<AreaCell> = Grid::filled(width, height)?;
    for area in areas {
        for rect in &area.rects {
            if !rect_in_bounds(*rect, width, height) {
                return Err(GridError::RectOutOfBounds {
                    rect: *rect,
                    width,
                    height,
                });
            }
            for y in rect.y..rect.bottom() {
                for x in rect.x..rect.right() {
                    if let Some(cell) = grid.cell_at_mut(x, y) {
                        cell.stack.extend(area.stack.iter().cloned());
                        if !area.faction.is_empty() {
                            cell.faction = area.faction.clone();
                        }
                    }
                }
            }
        }
    }
    Ok(grid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::entities::EntityClass;
    use crate::model::factions::FactionClass;

    fn grass_cell() -> AreaCell {
        AreaCell {
            stack: vec![EntityTemplate::new(EntityKind::Terrain, "grass")],
            faction: IdRef::empty(),
        }
    }

    fn rect(x: u32, y: u32, width: u32, height: u32) -> Rect {
        Rect {
            x,
            y,
            width,
            height,
        }
    }

    fn registries_with_terrain() -> (FactionRegistry, EntityRegistry, VariableRegistry) {
        let mut factions = FactionRegistry::default();
        factions.insert(FactionClass::new("north"));
        let mut entities = EntityRegistry::default();
        entities.insert(
            EntityClass::new(EntityKind::Terrain, "grass").with_payload(EntityPayload::Terrain {
                background: true,
                passable: true,
            }),
        );
        entities.insert(
            EntityClass::new(EntityKind::Terrain, "rocks").with_payload(EntityPayload::Terrain {
                background: false,
                passable: false,
            }),
        );
        entities.insert(EntityClass::new(EntityKind::Unit, "pikeman"));
        (factions, entities, VariableRegistry::default())
    }

    #[test]
    fn equal_stacks_merge_into_one_area() {
        let empty = AreaCell::default();
        let cells = vec![grass_cell(), grass_cell(), empty, grass_cell()];
        let mut grid = Grid::new(4, 1, cells).expect("grid");

        let areas = pack_areas(&mut grid);

        assert_eq!(areas.len(), 1);
        assert_eq!(areas[0].rects, vec![rect(0, 0, 2, 1), rect(3, 0, 1, 1)]);
        assert_eq!(areas[0].stack.len(), 1);
    }

    #[test]
    fn differing_factions_do_not_merge() {
        let mut north = grass_cell();
        north.faction = IdRef::new("north");
        let mut south = grass_cell();
        south.faction = IdRef::new("south");
        let mut grid = Grid::new(2, 1, vec![north, south]).expect("grid");

        let areas = pack_areas(&mut grid);

        assert_eq!(areas.len(), 2);
        assert_eq!(areas[0].faction.id(), "north");
        assert_eq!(areas[1].faction.id(), "south");
    }

    #[test]
    fn faction_only_cells_survive_packing() {
        let mut claim = AreaCell::default();
        claim.faction = IdRef::new("north");
        let mut grid = Grid::new(2, 1, vec![claim, AreaCell::default()]).expect("grid");

        let areas = pack_areas(&mut grid);

        assert_eq!(areas.len(), 1);
        assert!(areas[0].stack.is_empty());
        assert_eq!(areas[0].faction.id(), "north");
    }

    #[test]
    fn unpack_accumulates_overlapping_stacks() {
        let base = Area {
            rects: vec![rect(0, 0, 2, 1)],
            stack: vec![EntityTemplate::new(EntityKind::Terrain, "grass")],
            faction: IdRef::empty(),
        };
        let overlay = Area {
            rects: vec![rect(1, 0, 1, 1)],
            stack: vec![EntityTemplate::new(EntityKind::Unit, "pikeman")],
            faction: IdRef::new("north"),
        };

        let grid = unpack_areas(2, 1, &[base, overlay]).expect("unpack");

        let plain = grid.cell_at(0, 0).expect("cell");
        assert_eq!(plain.stack.len(), 1);
        assert!(plain.faction.is_empty());
        let stacked = grid.cell_at(1, 0).expect("cell");
        assert_eq!(stacked.stack.len(), 2);
        assert_eq!(stacked.faction.id(), "north");
    }

    #[test]
    fn pack_then_unpack_round_trips() {
        let empty = AreaCell::default();
        let cells = vec![grass_cell(), grass_cell(), empty, grass_cell()];
        let pristine = Grid::new(4, 1, cells).expect("grid");
        let mut grid = pristine.clone();

        let areas = pack_areas(&mut grid);
        let restored = unpack_areas(4, 1, &areas).expect("unpack");

        assert_eq!(restored, pristine);
    }

    #[test]
    fn unpack_rejects_rects_outside_the_grid() {
        let stray = Area {
            rects: vec![rect(1, 0, 2, 1)],
            stack: vec![EntityTemplate::new(EntityKind::Terrain, "grass")],
            faction: IdRef::empty(),
        };

        let error = unpack_areas(2, 1, &[stray]).expect_err("rect overhangs");
        assert!(matches!(error, GridError::RectOutOfBounds { .. }));
    }

    #[test]
    fn validate_resolves_the_home_faction() {
        let (factions, entities, variables) = registries_with_terrain();
        let mut list = AreaList::default();
        list.push(Area {
            rects: vec![rect(0, 0, 1, 1)],
            stack: Vec::new(),
            faction: IdRef::new("north"),
        });

        list.validate(&factions, &entities, &variables, ValidateMode::Strict)
            .expect("validates");
        assert!(list.areas()[0].faction.resolved().is_some());

        list.areas_mut()[0].faction = IdRef::new("west");
        let error = list
            .validate(&factions, &entities, &variables, ValidateMode::Strict)
            .expect_err("unknown faction");
        assert_eq!(error.code, ValidateErrorCode::UnresolvedFaction);
        assert_eq!(error.owner, "area 0");

        list.validate(&factions, &entities, &variables, ValidateMode::Editor)
            .expect("editor tolerates");
    }

    #[test]
    fn first_terrain_must_be_background_in_strict_mode() {
        let (factions, entities, variables) = registries_with_terrain();
        let mut area = Area {
            rects: vec![rect(0, 0, 1, 1)],
            stack: vec![
                EntityTemplate::new(EntityKind::Unit, "pikeman"),
                EntityTemplate::new(EntityKind::Terrain, "rocks"),
            ],
            faction: IdRef::empty(),
        };

        let error = area
            .validate(0, &factions, &entities, &variables, ValidateMode::Strict)
            .expect_err("overlay terrain first");
        assert_eq!(error.code, ValidateErrorCode::TerrainStackOrder);
        assert_eq!(error.identifier, "rocks");

        area.validate(0, &factions, &entities, &variables, ValidateMode::Editor)
            .expect("editor tolerates");
    }

    #[test]
    fn background_first_stacks_pass_strict_validation() {
        let (factions, entities, variables) = registries_with_terrain();
        let mut grounded = Area {
            rects: vec![rect(0, 0, 1, 1)],
            stack: vec![
                EntityTemplate::new(EntityKind::Terrain, "grass"),
                EntityTemplate::new(EntityKind::Terrain, "rocks"),
            ],
            faction: IdRef::empty(),
        };
        grounded
            .validate(0, &factions, &entities, &variables, ValidateMode::Strict)
            .expect("grass first is fine");

        let mut unit_only = Area {
            rects: vec![rect(0, 0, 1, 1)],
            stack: vec![EntityTemplate::new(EntityKind::Unit, "pikeman")],
            faction: IdRef::empty(),
        };
        unit_only
            .validate(0, &factions, &entities, &variables, ValidateMode::Strict)
            .expect("no terrain at all is fine");
    }

    #[test]
    fn delete_scrubs_faction_refs_and_orphaned_templates() {
        let mut area = Area {
            rects: vec![rect(0, 0, 1, 1)],
            stack: vec![EntityTemplate::new(EntityKind::Unit, "pikeman")],
            faction: IdRef::new("north"),
        };

        assert_eq!(area.process_identifier("north", None), 1);
        assert!(area.faction.is_empty());
        assert_eq!(area.process_identifier("pikeman", None), 1);
        assert!(area.stack.is_empty());
    }
}
