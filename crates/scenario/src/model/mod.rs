mod area;
mod element;
mod entities;
mod factions;
mod grid;
mod ident;
mod images;
mod master;
mod template;
mod variables;

pub use area::{pack_areas, unpack_areas, Area, AreaCell, AreaList};
pub use element::{process_all, Element, ValidateError, ValidateErrorCode, ValidateMode};
pub use entities::{EntityClass, EntityHandle, EntityKind, EntityPayload, EntityRegistry};
pub use factions::{BuildMap, FactionClass, FactionHandle, FactionRegistry};
pub use grid::{
    pack_cells, rect_in_bounds, unpack_cells, CellContent, Grid, GridError, Rect, MAX_GRID_HEIGHT,
    MAX_GRID_WIDTH,
};
pub use ident::{process_keys, Binding, IdRef};
pub use images::{ImageClass, ImageHandle, ImageRegistry};
pub use master::{DocSource, EditError, Scenario, ScenarioHeader, SectionId, SECTION_COUNT};
pub use template::EntityTemplate;
pub use variables::{
    VarHandle, VarKind, VarMap, VarValue, VariableClass, VariableRegistry, VAR_RANGE_MAX,
    VAR_RANGE_MIN,
};
