//! Scenario document model for the strategy-game editor: identifier-keyed
//! class registries with deferred reference resolution, section-level
//! validation with dependency ordering, area rect compression, and the
//! sectioned XML document format with include indirection.

pub mod doc;
pub mod model;

pub use doc::{
    load_scenario, read_scenario, reload_section, render_root, render_section_document,
    save_scenario, save_section, DocError, DocErrorCode, DocReadError, DocWriteError,
    ScenarioSummary, SourceLocation,
};
pub use model::{
    pack_areas, pack_cells, process_all, process_keys, rect_in_bounds, unpack_areas, unpack_cells,
    Area, AreaCell, AreaList, Binding, BuildMap, CellContent, DocSource, EditError, Element,
    EntityClass, EntityHandle, EntityKind, EntityPayload, EntityRegistry, EntityTemplate,
    FactionClass, FactionHandle, FactionRegistry, Grid, GridError, IdRef, ImageClass, ImageHandle,
    ImageRegistry, Rect, Scenario, ScenarioHeader, SectionId, ValidateError, ValidateErrorCode,
    ValidateMode, VarHandle, VarKind, VarMap, VarValue, VariableClass, VariableRegistry,
    MAX_GRID_HEIGHT, MAX_GRID_WIDTH, SECTION_COUNT, VAR_RANGE_MAX, VAR_RANGE_MIN,
};
