use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use roxmltree::{Document, Node};
use thiserror::Error;
use tracing::info;

use crate::model::{
    rect_in_bounds, Area, DocSource, EntityClass, EntityKind, EntityPayload, EntityTemplate,
    FactionClass, IdRef, ImageClass, Rect, Scenario, ScenarioHeader, SectionId, ValidateError,
    ValidateMode, VarKind, VarMap, VarValue, VariableClass, MAX_GRID_HEIGHT, MAX_GRID_WIDTH,
};

use super::hashing::{hash_document_inputs, normalize_rel_path};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceLocation {
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocErrorCode {
    ReadFile,
    XmlMalformed,
    InvalidRoot,
    UnknownSection,
    UnknownElement,
    UnknownAttribute,
    MissingAttribute,
    InvalidValue,
    DuplicateSection,
    DuplicateId,
    DuplicateEntry,
    IncludeNotAllowed,
    MapTooLarge,
    NoSource,
}

#[derive(Debug, Clone)]
pub struct DocReadError {
    pub code: DocErrorCode,
    pub message: String,
    pub path: PathBuf,
    pub location: Option<SourceLocation>,
}

impl fmt::Display for DocReadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.location {
            Some(loc) => write!(
                f,
                "{:?}: {} (file={}, line={}, column={})",
                self.code,
                self.message,
                self.path.display(),
                loc.line,
                loc.column
            ),
            None => write!(
                f,
                "{:?}: {} (file={})",
                self.code,
                self.message,
                self.path.display()
            ),
        }
    }
}

impl std::error::Error for DocReadError {}

#[derive(Debug, Error)]
pub enum DocError {
    #[error(transparent)]
    Read(#[from] DocReadError),
    #[error(transparent)]
    Validate(#[from] ValidateError),
}

/// Reads and validates a scenario document. Editor mode still resolves every
/// reference; it only refrains from treating misses as errors.
pub fn load_scenario(path: &Path, mode: ValidateMode) -> Result<Scenario, DocError> {
    let mut scenario = read_scenario(path)?;
    scenario.validate_all(mode)?;
    info!(
        path = %path.display(),
        variables = scenario.variables.len(),
        images = scenario.images.len(),
        entities = scenario.entities.len(),
        factions = scenario.factions.len(),
        areas = scenario.areas.len(),
        content_hash = scenario.content_hash().unwrap_or(""),
        "scenario_loaded"
    );
    Ok(scenario)
}

/// Parse only. Bindings stay unresolved and category tags untrusted until a
/// validate pass runs; `load_scenario` is the usual entry point.
pub fn read_scenario(path: &Path) -> Result<Scenario, DocReadError> {
    let raw = fs::read_to_string(path).map_err(|source| read_error(path, source))?;
    let mut seen_ids = HashSet::<String>::new();
    let (mut scenario, mut pending) = parse_root_document(path, &raw, &mut seen_ids)?;

    // Includes are read in section order so the content hash does not depend
    // on how the stubs are arranged in the root file.
    pending.sort_by_key(|(section, _)| section_index(*section));
    let dir = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let mut include_inputs = Vec::<(String, Vec<u8>)>::with_capacity(pending.len());
    for (section, rel_path) in &pending {
        let abs_path = dir.join(rel_path);
        let raw_include =
            fs::read_to_string(&abs_path).map_err(|source| read_error(&abs_path, source))?;
        parse_include_document(&mut scenario, *section, &abs_path, &raw_include, &mut seen_ids)?;
        include_inputs.push((normalize_rel_path(rel_path), raw_include.into_bytes()));
    }

    let content_hash = hash_document_inputs(raw.as_bytes(), &include_inputs);
    scenario.set_source(DocSource {
        root: path.to_path_buf(),
        includes: pending,
        content_hash,
    });
    Ok(scenario)
}

/// Re-reads one section from the backing document, replacing the in-memory
/// collection, then validates it together with its dependents. The recorded
/// source and hash are refreshed to match the document on disk.
pub fn reload_section(
    scenario: &mut Scenario,
    section: SectionId,
    mode: ValidateMode,
) -> Result<(), DocError> {
    let Some(root) = scenario.source().map(|source| source.root.clone()) else {
        return Err(DocError::Read(DocReadError {
            code: DocErrorCode::NoSource,
            message: "scenario has no backing document to reload from".to_string(),
            path: PathBuf::new(),
            location: None,
        }));
    };
    let mut fresh = read_scenario(&root)?;
    if let Some(source) = fresh.source().cloned() {
        scenario.set_source(source);
    }
    match section {
        SectionId::Variables => scenario.variables = std::mem::take(&mut fresh.variables),
        SectionId::Images => scenario.images = std::mem::take(&mut fresh.images),
        SectionId::Entities => scenario.entities = std::mem::take(&mut fresh.entities),
        SectionId::Factions => scenario.factions = std::mem::take(&mut fresh.factions),
        SectionId::Areas => scenario.areas = std::mem::take(&mut fresh.areas),
    }
    scenario.validate_section(section, mode)?;
    info!(section = section.label(), path = %root.display(), "section_reloaded");
    Ok(())
}

pub(crate) fn section_tag(section: SectionId) -> &'static str {
    match section {
        SectionId::Variables => "Variables",
        SectionId::Images => "Images",
        SectionId::Entities => "Entities",
        SectionId::Factions => "Factions",
        SectionId::Areas => "Areas",
    }
}

fn section_from_tag(name: &str) -> Option<SectionId> {
    SectionId::ALL
        .into_iter()
        .find(|&section| section_tag(section) == name)
}

fn section_index(section: SectionId) -> usize {
    SectionId::ALL
        .iter()
        .position(|&candidate| candidate == section)
        .unwrap_or(0)
}

fn parse_root_document(
    path: &Path,
    raw: &str,
    seen_ids: &mut HashSet<String>,
) -> Result<(Scenario, Vec<(SectionId, PathBuf)>), DocReadError> {
    let doc = parse_xml(path, raw)?;
    let root = doc.root_element();
    if root.tag_name().name() != "Scenario" {
        return Err(error_at_node(
            DocErrorCode::InvalidRoot,
            "root element must be <Scenario>".to_string(),
            path,
            &doc,
            root,
        ));
    }
    check_attrs(path, &doc, root, &["name", "width", "height"])?;
    let name = required_attr(path, &doc, root, "name")?;
    let map_width = required_u32_attr(path, &doc, root, "width")?;
    let map_height = required_u32_attr(path, &doc, root, "height")?;
    if map_width == 0 || map_height == 0 {
        return Err(error_at_node(
            DocErrorCode::InvalidValue,
            "map dimensions must be at least 1x1".to_string(),
            path,
            &doc,
            root,
        ));
    }
    if map_width > MAX_GRID_WIDTH || map_height > MAX_GRID_HEIGHT {
        return Err(error_at_node(
            DocErrorCode::MapTooLarge,
            format!(
                "map is {map_width}x{map_height}; the limit is {MAX_GRID_WIDTH}x{MAX_GRID_HEIGHT}"
            ),
            path,
            &doc,
            root,
        ));
    }

    let mut scenario = Scenario::new(ScenarioHeader {
        name: name.to_string(),
        description: String::new(),
        map_width,
        map_height,
    });
    let mut seen_description = false;
    let mut seen_sections = [false; SectionId::ALL.len()];
    let mut pending = Vec::<(SectionId, PathBuf)>::new();

    for child in root.children().filter(Node::is_element) {
        let tag = child.tag_name().name();
        if tag == "Description" {
            if seen_description {
                return Err(error_at_node(
                    DocErrorCode::DuplicateSection,
                    "duplicate <Description> element".to_string(),
                    path,
                    &doc,
                    child,
                ));
            }
            seen_description = true;
            check_attrs(path, &doc, child, &[])?;
            scenario.header.description = child.text().map(str::trim).unwrap_or_default().to_string();
            continue;
        }

        let Some(section) = section_from_tag(tag) else {
            return Err(error_at_node(
                DocErrorCode::UnknownSection,
                format!("unknown section <{tag}> in <Scenario>"),
                path,
                &doc,
                child,
            ));
        };
        let index = section_index(section);
        if seen_sections[index] {
            return Err(error_at_node(
                DocErrorCode::DuplicateSection,
                format!("section <{tag}> appears more than once"),
                path,
                &doc,
                child,
            ));
        }
        seen_sections[index] = true;

        if let Some(src) = child.attribute("src") {
            check_attrs(path, &doc, child, &["src"])?;
            if src.is_empty() {
                return Err(error_at_node(
                    DocErrorCode::InvalidValue,
                    "attribute 'src' must not be empty".to_string(),
                    path,
                    &doc,
                    child,
                ));
            }
            if let Some(inline) = child.children().find(|node| node.is_element()) {
                return Err(error_at_node(
                    DocErrorCode::IncludeNotAllowed,
                    format!("included section <{tag}> must not carry inline children"),
                    path,
                    &doc,
                    inline,
                ));
            }
            pending.push((section, PathBuf::from(src)));
        } else {
            check_attrs(path, &doc, child, &[])?;
            parse_section_into(&mut scenario, section, path, &doc, child, seen_ids)?;
        }
    }

    Ok((scenario, pending))
}

fn parse_include_document(
    scenario: &mut Scenario,
    section: SectionId,
    path: &Path,
    raw: &str,
    seen_ids: &mut HashSet<String>,
) -> Result<(), DocReadError> {
    let doc = parse_xml(path, raw)?;
    let root = doc.root_element();
    let expected = section_tag(section);
    if root.tag_name().name() != expected {
        return Err(error_at_node(
            DocErrorCode::InvalidRoot,
            format!("include file root must be <{expected}>"),
            path,
            &doc,
            root,
        ));
    }
    if root.has_attribute("src") {
        return Err(error_at_node(
            DocErrorCode::IncludeNotAllowed,
            "include files cannot include further files".to_string(),
            path,
            &doc,
            root,
        ));
    }
    check_attrs(path, &doc, root, &[])?;
    parse_section_into(scenario, section, path, &doc, root, seen_ids)
}

fn parse_section_into(
    scenario: &mut Scenario,
    section: SectionId,
    path: &Path,
    doc: &Document<'_>,
    node: Node<'_, '_>,
    seen_ids: &mut HashSet<String>,
) -> Result<(), DocReadError> {
    match section {
        SectionId::Variables => parse_variables(scenario, path, doc, node, seen_ids),
        SectionId::Images => parse_images(scenario, path, doc, node, seen_ids),
        SectionId::Entities => parse_entities(scenario, path, doc, node, seen_ids),
        SectionId::Factions => parse_factions(scenario, path, doc, node, seen_ids),
        SectionId::Areas => parse_areas(scenario, path, doc, node),
    }
}

fn parse_variables(
    scenario: &mut Scenario,
    path: &Path,
    doc: &Document<'_>,
    node: Node<'_, '_>,
    seen_ids: &mut HashSet<String>,
) -> Result<(), DocReadError> {
    for child in node.children().filter(Node::is_element) {
        let kind = match child.tag_name().name() {
            "Attribute" => VarKind::Attribute,
            "Counter" => VarKind::Counter,
            "Resource" => VarKind::Resource,
            other => {
                return Err(error_at_node(
                    DocErrorCode::UnknownElement,
                    format!("unknown element <{other}> in <Variables>"),
                    path,
                    doc,
                    child,
                ));
            }
        };
        check_attrs(path, doc, child, &["id", "name", "min", "max", "scale"])?;
        no_children(path, doc, child)?;
        let id = required_id_attr(path, doc, child, "id")?;
        claim_id(seen_ids, path, doc, child, id)?;
        let name = child.attribute("name").unwrap_or_default();
        let min = i32_attr(path, doc, child, "min", 0)?;
        let max = i32_attr(path, doc, child, "max", 100)?;
        let scale = i32_attr(path, doc, child, "scale", 0)?;
        scenario.variables.insert(
            VariableClass::new(kind, id)
                .with_name(name)
                .with_range(min, max)
                .with_scale(scale),
        );
    }
    Ok(())
}

fn parse_images(
    scenario: &mut Scenario,
    path: &Path,
    doc: &Document<'_>,
    node: Node<'_, '_>,
    seen_ids: &mut HashSet<String>,
) -> Result<(), DocReadError> {
    for child in node.children().filter(Node::is_element) {
        if child.tag_name().name() != "Image" {
            return Err(error_at_node(
                DocErrorCode::UnknownElement,
                format!("unknown element <{}> in <Images>", child.tag_name().name()),
                path,
                doc,
                child,
            ));
        }
        check_attrs(path, doc, child, &["id", "file", "frames"])?;
        no_children(path, doc, child)?;
        let id = required_id_attr(path, doc, child, "id")?;
        claim_id(seen_ids, path, doc, child, id)?;
        let file = required_attr(path, doc, child, "file")?;
        let frames = i32_attr(path, doc, child, "frames", 1)?;
        scenario
            .images
            .insert(ImageClass::new(id, file).with_frame_count(frames));
    }
    Ok(())
}

fn parse_entities(
    scenario: &mut Scenario,
    path: &Path,
    doc: &Document<'_>,
    node: Node<'_, '_>,
    seen_ids: &mut HashSet<String>,
) -> Result<(), DocReadError> {
    for child in node.children().filter(Node::is_element) {
        let kind = match child.tag_name().name() {
            "Unit" => EntityKind::Unit,
            "Terrain" => EntityKind::Terrain,
            "Effect" => EntityKind::Effect,
            "Upgrade" => EntityKind::Upgrade,
            other => {
                return Err(error_at_node(
                    DocErrorCode::UnknownElement,
                    format!("unknown element <{other}> in <Entities>"),
                    path,
                    doc,
                    child,
                ));
            }
        };
        let class = parse_entity_class(path, doc, child, kind, seen_ids)?;
        scenario.entities.insert(class);
    }
    Ok(())
}

fn parse_entity_class(
    path: &Path,
    doc: &Document<'_>,
    node: Node<'_, '_>,
    kind: EntityKind,
    seen_ids: &mut HashSet<String>,
) -> Result<EntityClass, DocReadError> {
    let allowed: &[&str] = match kind {
        EntityKind::Unit => &["id", "name", "frame", "frames", "speed", "vision"],
        EntityKind::Terrain => &["id", "name", "frame", "frames", "background", "passable"],
        EntityKind::Effect => &["id", "name", "frame", "frames", "duration"],
        EntityKind::Upgrade => &["id", "name", "frame", "frames", "repeatable"],
    };
    check_attrs(path, doc, node, allowed)?;
    let id = required_id_attr(path, doc, node, "id")?;
    claim_id(seen_ids, path, doc, node, id)?;
    let name = node.attribute("name").unwrap_or_default();
    let frame = i32_attr(path, doc, node, "frame", 0)?;
    let frames = i32_attr(path, doc, node, "frames", 0)?;
    let payload = match kind {
        EntityKind::Unit => EntityPayload::Unit {
            speed: i32_attr(path, doc, node, "speed", 0)?,
            vision: i32_attr(path, doc, node, "vision", 0)?,
        },
        EntityKind::Terrain => EntityPayload::Terrain {
            background: bool_attr(path, doc, node, "background", false)?,
            passable: bool_attr(path, doc, node, "passable", true)?,
        },
        EntityKind::Effect => EntityPayload::Effect {
            duration: i32_attr(path, doc, node, "duration", 0)?,
        },
        EntityKind::Upgrade => EntityPayload::Upgrade {
            repeatable: bool_attr(path, doc, node, "repeatable", false)?,
        },
    };

    let mut class = EntityClass::new(kind, id)
        .with_name(name)
        .with_frames(frame, frames)
        .with_payload(payload);
    for field in node.children().filter(Node::is_element) {
        match field.tag_name().name() {
            "Attribute" => parse_var_entry(&mut class.attributes, path, doc, field)?,
            "Counter" => parse_var_entry(&mut class.counters, path, doc, field)?,
            "Resource" => parse_var_entry(&mut class.resources, path, doc, field)?,
            "AttributeMod" => parse_var_entry(&mut class.attribute_mods, path, doc, field)?,
            "CounterMod" => parse_var_entry(&mut class.counter_mods, path, doc, field)?,
            "ResourceMod" => parse_var_entry(&mut class.resource_mods, path, doc, field)?,
            "Image" => {
                check_attrs(path, doc, field, &["ref"])?;
                no_children(path, doc, field)?;
                let image = required_id_attr(path, doc, field, "ref")?;
                class.images.push(IdRef::new(image));
            }
            other => {
                return Err(error_at_node(
                    DocErrorCode::UnknownElement,
                    format!(
                        "unknown element <{other}> in <{}>",
                        node.tag_name().name()
                    ),
                    path,
                    doc,
                    field,
                ));
            }
        }
    }
    Ok(class)
}

fn parse_factions(
    scenario: &mut Scenario,
    path: &Path,
    doc: &Document<'_>,
    node: Node<'_, '_>,
    seen_ids: &mut HashSet<String>,
) -> Result<(), DocReadError> {
    for child in node.children().filter(Node::is_element) {
        if child.tag_name().name() != "Faction" {
            return Err(error_at_node(
                DocErrorCode::UnknownElement,
                format!("unknown element <{}> in <Factions>", child.tag_name().name()),
                path,
                doc,
                child,
            ));
        }
        check_attrs(path, doc, child, &["id", "name"])?;
        let id = required_id_attr(path, doc, child, "id")?;
        claim_id(seen_ids, path, doc, child, id)?;
        let mut faction = FactionClass::new(id).with_name(child.attribute("name").unwrap_or_default());

        for field in child.children().filter(Node::is_element) {
            match field.tag_name().name() {
                "Resource" => parse_var_entry(&mut faction.resources, path, doc, field)?,
                "Builds" => {
                    check_attrs(path, doc, field, &["unit", "upgrade"])?;
                    no_children(path, doc, field)?;
                    parse_builds_entry(&mut faction, path, doc, field)?;
                }
                "Template" => faction.templates.push(parse_template(path, doc, field)?),
                other => {
                    return Err(error_at_node(
                        DocErrorCode::UnknownElement,
                        format!("unknown element <{other}> in <Faction>"),
                        path,
                        doc,
                        field,
                    ));
                }
            }
        }
        scenario.factions.insert(faction);
    }
    Ok(())
}

fn parse_builds_entry(
    faction: &mut FactionClass,
    path: &Path,
    doc: &Document<'_>,
    node: Node<'_, '_>,
) -> Result<(), DocReadError> {
    let (table, id) = match (node.attribute("unit"), node.attribute("upgrade")) {
        (Some(unit), None) => (&mut faction.buildable_units, unit),
        (None, Some(upgrade)) => (&mut faction.buildable_upgrades, upgrade),
        (Some(_), Some(_)) => {
            return Err(error_at_node(
                DocErrorCode::InvalidValue,
                "<Builds> takes either a unit or an upgrade attribute, not both".to_string(),
                path,
                doc,
                node,
            ));
        }
        (None, None) => {
            return Err(error_at_node(
                DocErrorCode::MissingAttribute,
                "<Builds> requires a unit or upgrade attribute".to_string(),
                path,
                doc,
                node,
            ));
        }
    };
    if id.is_empty() {
        return Err(error_at_node(
            DocErrorCode::InvalidValue,
            "<Builds> reference must not be empty".to_string(),
            path,
            doc,
            node,
        ));
    }
    if table.insert(id.to_string(), None).is_some() {
        return Err(error_at_node(
            DocErrorCode::DuplicateEntry,
            format!("'{id}' is listed as buildable more than once"),
            path,
            doc,
            node,
        ));
    }
    Ok(())
}

fn parse_areas(
    scenario: &mut Scenario,
    path: &Path,
    doc: &Document<'_>,
    node: Node<'_, '_>,
) -> Result<(), DocReadError> {
    let map_width = scenario.header.map_width;
    let map_height = scenario.header.map_height;
    for child in node.children().filter(Node::is_element) {
        if child.tag_name().name() != "Area" {
            return Err(error_at_node(
                DocErrorCode::UnknownElement,
                format!("unknown element <{}> in <Areas>", child.tag_name().name()),
                path,
                doc,
                child,
            ));
        }
        check_attrs(path, doc, child, &["faction"])?;
        let faction = match child.attribute("faction") {
            Some("") => {
                return Err(error_at_node(
                    DocErrorCode::InvalidValue,
                    "attribute 'faction' must not be empty".to_string(),
                    path,
                    doc,
                    child,
                ));
            }
            Some(id) => IdRef::new(id),
            None => IdRef::empty(),
        };

        let mut area = Area {
            rects: Vec::new(),
            stack: Vec::new(),
            faction,
        };
        for field in child.children().filter(Node::is_element) {
            match field.tag_name().name() {
                "Rect" => {
                    check_attrs(path, doc, field, &["x", "y", "width", "height"])?;
                    no_children(path, doc, field)?;
                    let rect = Rect {
                        x: required_u32_attr(path, doc, field, "x")?,
                        y: required_u32_attr(path, doc, field, "y")?,
                        width: required_u32_attr(path, doc, field, "width")?,
                        height: required_u32_attr(path, doc, field, "height")?,
                    };
                    if rect.width == 0 || rect.height == 0 {
                        return Err(error_at_node(
                            DocErrorCode::InvalidValue,
                            "rect must cover at least one cell".to_string(),
                            path,
                            doc,
                            field,
                        ));
                    }
                    if !rect_in_bounds(rect, map_width, map_height) {
                        return Err(error_at_node(
                            DocErrorCode::InvalidValue,
                            format!("rect {rect} exceeds the {map_width}x{map_height} map"),
                            path,
                            doc,
                            field,
                        ));
                    }
                    area.rects.push(rect);
                }
                "Template" => area.stack.push(parse_template(path, doc, field)?),
                other => {
                    return Err(error_at_node(
                        DocErrorCode::UnknownElement,
                        format!("unknown element <{other}> in <Area>"),
                        path,
                        doc,
                        field,
                    ));
                }
            }
        }
        scenario.areas.push(area);
    }
    Ok(())
}

// The category tag is not stored in the document; validate re-syncs it from
// the resolved class, so the placeholder kind here is never observable after
// a load.
fn parse_template(
    path: &Path,
    doc: &Document<'_>,
    node: Node<'_, '_>,
) -> Result<EntityTemplate, DocReadError> {
    check_attrs(path, doc, node, &["class", "name", "offset"])?;
    let class = required_id_attr(path, doc, node, "class")?;
    let offset = i32_attr(path, doc, node, "offset", 0)?;
    let mut template = EntityTemplate::new(EntityKind::Unit, class).with_frame_offset(offset);
    if let Some(name) = node.attribute("name") {
        template.name = Some(name.to_string());
    }
    for field in node.children().filter(Node::is_element) {
        match field.tag_name().name() {
            "Attribute" => parse_var_entry(&mut template.attributes, path, doc, field)?,
            "Counter" => parse_var_entry(&mut template.counters, path, doc, field)?,
            "Resource" => parse_var_entry(&mut template.resources, path, doc, field)?,
            other => {
                return Err(error_at_node(
                    DocErrorCode::UnknownElement,
                    format!("unknown element <{other}> in <Template>"),
                    path,
                    doc,
                    field,
                ));
            }
        }
    }
    Ok(template)
}

fn parse_var_entry(
    map: &mut VarMap,
    path: &Path,
    doc: &Document<'_>,
    node: Node<'_, '_>,
) -> Result<(), DocReadError> {
    check_attrs(path, doc, node, &["var", "value"])?;
    no_children(path, doc, node)?;
    let var = required_id_attr(path, doc, node, "var")?;
    let amount = i32_attr(path, doc, node, "value", 0)?;
    if map.insert(var.to_string(), VarValue::new(amount)).is_some() {
        return Err(error_at_node(
            DocErrorCode::DuplicateEntry,
            format!("duplicate entry for '{var}'"),
            path,
            doc,
            node,
        ));
    }
    Ok(())
}

fn parse_xml<'input>(path: &Path, raw: &'input str) -> Result<Document<'input>, DocReadError> {
    Document::parse(raw).map_err(|error| DocReadError {
        code: DocErrorCode::XmlMalformed,
        message: format!("malformed XML: {error}"),
        path: path.to_path_buf(),
        location: Some(SourceLocation {
            line: error.pos().row as usize,
            column: error.pos().col as usize,
        }),
    })
}

fn check_attrs(
    path: &Path,
    doc: &Document<'_>,
    node: Node<'_, '_>,
    allowed: &[&str],
) -> Result<(), DocReadError> {
    for attribute in node.attributes() {
        let name = attribute.name();
        if !allowed.contains(&name) {
            return Err(error_at_node(
                DocErrorCode::UnknownAttribute,
                format!(
                    "unknown attribute '{}' on <{}>",
                    name,
                    node.tag_name().name()
                ),
                path,
                doc,
                node,
            ));
        }
    }
    Ok(())
}

fn no_children(path: &Path, doc: &Document<'_>, node: Node<'_, '_>) -> Result<(), DocReadError> {
    if let Some(child) = node.children().find(|node| node.is_element()) {
        return Err(error_at_node(
            DocErrorCode::UnknownElement,
            format!(
                "unexpected element <{}> inside <{}>",
                child.tag_name().name(),
                node.tag_name().name()
            ),
            path,
            doc,
            child,
        ));
    }
    Ok(())
}

fn required_attr<'a>(
    path: &Path,
    doc: &Document<'_>,
    node: Node<'a, '_>,
    name: &'static str,
) -> Result<&'a str, DocReadError> {
    let Some(value) = node.attribute(name) else {
        return Err(error_at_node(
            DocErrorCode::MissingAttribute,
            format!(
                "missing required attribute '{}' on <{}>",
                name,
                node.tag_name().name()
            ),
            path,
            doc,
            node,
        ));
    };
    Ok(value)
}

fn required_id_attr<'a>(
    path: &Path,
    doc: &Document<'_>,
    node: Node<'a, '_>,
    name: &'static str,
) -> Result<&'a str, DocReadError> {
    let value = required_attr(path, doc, node, name)?;
    if value.is_empty() {
        return Err(error_at_node(
            DocErrorCode::InvalidValue,
            format!("attribute '{name}' must not be empty"),
            path,
            doc,
            node,
        ));
    }
    Ok(value)
}

fn required_u32_attr(
    path: &Path,
    doc: &Document<'_>,
    node: Node<'_, '_>,
    name: &'static str,
) -> Result<u32, DocReadError> {
    let raw = required_attr(path, doc, node, name)?;
    raw.parse::<u32>().map_err(|_| {
        error_at_node(
            DocErrorCode::InvalidValue,
            format!("attribute '{name}' value '{raw}' is not a valid non-negative integer"),
            path,
            doc,
            node,
        )
    })
}

fn i32_attr(
    path: &Path,
    doc: &Document<'_>,
    node: Node<'_, '_>,
    name: &'static str,
    default: i32,
) -> Result<i32, DocReadError> {
    match node.attribute(name) {
        Some(raw) => raw.parse::<i32>().map_err(|_| {
            error_at_node(
                DocErrorCode::InvalidValue,
                format!("attribute '{name}' value '{raw}' is not a valid integer"),
                path,
                doc,
                node,
            )
        }),
        None => Ok(default),
    }
}

fn bool_attr(
    path: &Path,
    doc: &Document<'_>,
    node: Node<'_, '_>,
    name: &'static str,
    default: bool,
) -> Result<bool, DocReadError> {
    match node.attribute(name) {
        Some("true") => Ok(true),
        Some("false") => Ok(false),
        Some(other) => Err(error_at_node(
            DocErrorCode::InvalidValue,
            format!("attribute '{name}' must be true or false, got '{other}'"),
            path,
            doc,
            node,
        )),
        None => Ok(default),
    }
}

fn claim_id(
    seen_ids: &mut HashSet<String>,
    path: &Path,
    doc: &Document<'_>,
    node: Node<'_, '_>,
    id: &str,
) -> Result<(), DocReadError> {
    if !seen_ids.insert(id.to_string()) {
        return Err(error_at_node(
            DocErrorCode::DuplicateId,
            format!("identifier '{id}' is already defined"),
            path,
            doc,
            node,
        ));
    }
    Ok(())
}

fn error_at_node(
    code: DocErrorCode,
    message: String,
    path: &Path,
    doc: &Document<'_>,
    node: Node<'_, '_>,
) -> DocReadError {
    let pos = doc.text_pos_at(node.range().start);
    DocReadError {
        code,
        message,
        path: path.to_path_buf(),
        location: Some(SourceLocation {
            line: pos.row as usize,
            column: pos.col as usize,
        }),
    }
}

fn read_error(path: &Path, source: std::io::Error) -> DocReadError {
    DocReadError {
        code: DocErrorCode::ReadFile,
        message: format!("failed to read document file: {source}"),
        path: path.to_path_buf(),
        location: None,
    }
}
