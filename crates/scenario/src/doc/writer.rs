use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::info;

use crate::model::{
    Area, EntityClass, EntityKind, EntityPayload, EntityTemplate, FactionClass, ImageClass,
    Scenario, SectionId, VarKind, VarMap, VariableClass,
};

use super::reader::section_tag;

#[derive(Debug, Error)]
pub enum DocWriteError {
    #[error("failed to write document file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("scenario has no backing document to save to")]
    NoSource,
}

/// Writes the scenario under `path`, plus one file per included section next
/// to it. Sections without a recorded include land inline in the root file.
pub fn save_scenario(scenario: &Scenario, path: &Path) -> Result<(), DocWriteError> {
    write_file(path, &render_root(scenario))?;
    if let Some(doc_source) = scenario.source() {
        let dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        for (section, rel_path) in &doc_source.includes {
            let abs_path = dir.join(rel_path);
            write_file(&abs_path, &render_section_document(scenario, *section))?;
        }
    }
    info!(path = %path.display(), "scenario_saved");
    Ok(())
}

/// Writes the smallest file that owns `section`: its include file when the
/// section is included, the whole root document otherwise. Returns the path
/// that was written.
pub fn save_section(scenario: &Scenario, section: SectionId) -> Result<PathBuf, DocWriteError> {
    let Some(doc_source) = scenario.source() else {
        return Err(DocWriteError::NoSource);
    };
    let root = doc_source.root.clone();
    let target = match scenario.include_path(section) {
        Some(rel_path) => {
            let dir = root
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from("."));
            let abs_path = dir.join(rel_path);
            write_file(&abs_path, &render_section_document(scenario, section))?;
            abs_path
        }
        None => {
            write_file(&root, &render_root(scenario))?;
            root
        }
    };
    info!(section = section.label(), path = %target.display(), "section_saved");
    Ok(target)
}

/// Saves through a sibling swap file with a rename as the commit point, so a
/// crash mid-write never leaves a half-written document on disk.
fn write_file(path: &Path, text: &str) -> Result<(), DocWriteError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| write_error(path, source))?;
    }
    let swap = swap_path(path);
    let committed = fs::write(&swap, text.as_bytes()).and_then(|_| commit_swap(&swap, path));
    if let Err(source) = committed {
        let _ = fs::remove_file(&swap);
        return Err(write_error(path, source));
    }
    Ok(())
}

fn commit_swap(swap: &Path, path: &Path) -> io::Result<()> {
    // Windows rename refuses to clobber, so the old document goes first.
    match fs::remove_file(path) {
        Ok(()) => {}
        Err(error) if error.kind() == io::ErrorKind::NotFound => {}
        Err(error) => return Err(error),
    }
    fs::rename(swap, path)
}

fn swap_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("document");
    path.with_file_name(format!("{name}.swap"))
}

fn write_error(path: &Path, source: io::Error) -> DocWriteError {
    DocWriteError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Renders the root document. Attributes equal to the parser defaults are
/// omitted, so saving is a canonicalizing step: saving the saved form again
/// reproduces it byte for byte.
pub fn render_root(scenario: &Scenario) -> String {
    let mut out = String::from("<Scenario");
    push_attr(&mut out, "name", &scenario.header.name);
    push_raw_attr(&mut out, "width", scenario.header.map_width);
    push_raw_attr(&mut out, "height", scenario.header.map_height);

    let mut body = String::new();
    if !scenario.header.description.is_empty() {
        body.push_str("  <Description>");
        push_escaped(&mut body, &scenario.header.description);
        body.push_str("</Description>\n");
    }
    for section in SectionId::ALL {
        if let Some(rel_path) = scenario.include_path(section) {
            body.push_str("  <");
            body.push_str(section_tag(section));
            push_attr(&mut body, "src", &rel_path.to_string_lossy());
            body.push_str("/>\n");
        } else {
            let items = render_section_items(scenario, section, 2);
            if !items.is_empty() {
                body.push_str("  <");
                body.push_str(section_tag(section));
                body.push_str(">\n");
                body.push_str(&items);
                body.push_str("  </");
                body.push_str(section_tag(section));
                body.push_str(">\n");
            }
        }
    }

    if body.is_empty() {
        out.push_str("/>\n");
    } else {
        out.push_str(">\n");
        out.push_str(&body);
        out.push_str("</Scenario>\n");
    }
    out
}

/// Renders one section as a standalone include document.
pub fn render_section_document(scenario: &Scenario, section: SectionId) -> String {
    let tag = section_tag(section);
    let items = render_section_items(scenario, section, 1);
    if items.is_empty() {
        format!("<{tag}/>\n")
    } else {
        format!("<{tag}>\n{items}</{tag}>\n")
    }
}

fn render_section_items(scenario: &Scenario, section: SectionId, depth: usize) -> String {
    let mut out = String::new();
    match section {
        SectionId::Variables => {
            for class in scenario.variables.iter() {
                push_variable(&mut out, depth, class);
            }
        }
        SectionId::Images => {
            for class in scenario.images.classes() {
                push_image(&mut out, depth, class);
            }
        }
        SectionId::Entities => {
            for (_, class) in scenario.entities.iter() {
                push_entity(&mut out, depth, class);
            }
        }
        SectionId::Factions => {
            for faction in scenario.factions.classes() {
                push_faction(&mut out, depth, faction);
            }
        }
        SectionId::Areas => {
            for area in scenario.areas.areas() {
                push_area(&mut out, depth, area);
            }
        }
    }
    out
}

fn push_variable(out: &mut String, depth: usize, class: &VariableClass) {
    push_indent(out, depth);
    out.push('<');
    out.push_str(var_kind_tag(class.kind()));
    push_attr(out, "id", &class.id);
    if !class.name.is_empty() {
        push_attr(out, "name", &class.name);
    }
    if class.minimum() != 0 {
        push_raw_attr(out, "min", class.minimum());
    }
    if class.maximum() != 100 {
        push_raw_attr(out, "max", class.maximum());
    }
    if class.scale != 0 {
        push_raw_attr(out, "scale", class.scale);
    }
    out.push_str("/>\n");
}

fn push_image(out: &mut String, depth: usize, class: &ImageClass) {
    push_indent(out, depth);
    out.push_str("<Image");
    push_attr(out, "id", &class.id);
    push_attr(out, "file", &class.file);
    if class.frame_count != 1 {
        push_raw_attr(out, "frames", class.frame_count);
    }
    out.push_str("/>\n");
}

fn push_entity(out: &mut String, depth: usize, class: &EntityClass) {
    push_indent(out, depth);
    out.push('<');
    out.push_str(entity_kind_tag(class.kind()));
    push_attr(out, "id", &class.id);
    if !class.name.is_empty() {
        push_attr(out, "name", &class.name);
    }
    if class.frame_index != 0 {
        push_raw_attr(out, "frame", class.frame_index);
    }
    if class.frame_count != 0 {
        push_raw_attr(out, "frames", class.frame_count);
    }
    match &class.payload {
        EntityPayload::Unit { speed, vision } => {
            if *speed != 0 {
                push_raw_attr(out, "speed", speed);
            }
            if *vision != 0 {
                push_raw_attr(out, "vision", vision);
            }
        }
        EntityPayload::Terrain {
            background,
            passable,
        } => {
            if *background {
                push_raw_attr(out, "background", background);
            }
            if !passable {
                push_raw_attr(out, "passable", passable);
            }
        }
        EntityPayload::Effect { duration } => {
            if *duration != 0 {
                push_raw_attr(out, "duration", duration);
            }
        }
        EntityPayload::Upgrade { repeatable } => {
            if *repeatable {
                push_raw_attr(out, "repeatable", repeatable);
            }
        }
    }

    let mut children = String::new();
    push_var_entries(&mut children, depth + 1, "Attribute", &class.attributes);
    push_var_entries(&mut children, depth + 1, "Counter", &class.counters);
    push_var_entries(&mut children, depth + 1, "Resource", &class.resources);
    push_var_entries(&mut children, depth + 1, "AttributeMod", &class.attribute_mods);
    push_var_entries(&mut children, depth + 1, "CounterMod", &class.counter_mods);
    push_var_entries(&mut children, depth + 1, "ResourceMod", &class.resource_mods);
    for image in &class.images {
        push_indent(&mut children, depth + 1);
        children.push_str("<Image");
        push_attr(&mut children, "ref", image.id());
        children.push_str("/>\n");
    }
    close_element(out, depth, entity_kind_tag(class.kind()), &children);
}

fn push_faction(out: &mut String, depth: usize, faction: &FactionClass) {
    push_indent(out, depth);
    out.push_str("<Faction");
    push_attr(out, "id", &faction.id);
    if !faction.name.is_empty() {
        push_attr(out, "name", &faction.name);
    }

    let mut children = String::new();
    push_var_entries(&mut children, depth + 1, "Resource", &faction.resources);
    for unit in faction.buildable_units.keys() {
        push_indent(&mut children, depth + 1);
        children.push_str("<Builds");
        push_attr(&mut children, "unit", unit);
        children.push_str("/>\n");
    }
    for upgrade in faction.buildable_upgrades.keys() {
        push_indent(&mut children, depth + 1);
        children.push_str("<Builds");
        push_attr(&mut children, "upgrade", upgrade);
        children.push_str("/>\n");
    }
    for template in &faction.templates {
        push_template(&mut children, depth + 1, template);
    }
    close_element(out, depth, "Faction", &children);
}

fn push_area(out: &mut String, depth: usize, area: &Area) {
    push_indent(out, depth);
    out.push_str("<Area");
    if !area.faction.is_empty() {
        push_attr(out, "faction", area.faction.id());
    }

    let mut children = String::new();
    for rect in &area.rects {
        push_indent(&mut children, depth + 1);
        children.push_str("<Rect");
        push_raw_attr(&mut children, "x", rect.x);
        push_raw_attr(&mut children, "y", rect.y);
        push_raw_attr(&mut children, "width", rect.width);
        push_raw_attr(&mut children, "height", rect.height);
        children.push_str("/>\n");
    }
    for template in &area.stack {
        push_template(&mut children, depth + 1, template);
    }
    close_element(out, depth, "Area", &children);
}

fn push_template(out: &mut String, depth: usize, template: &EntityTemplate) {
    push_indent(out, depth);
    out.push_str("<Template");
    push_attr(out, "class", template.class.id());
    if let Some(name) = &template.name {
        push_attr(out, "name", name);
    }
    if template.frame_offset != 0 {
        push_raw_attr(out, "offset", template.frame_offset);
    }

    let mut children = String::new();
    push_var_entries(&mut children, depth + 1, "Attribute", &template.attributes);
    push_var_entries(&mut children, depth + 1, "Counter", &template.counters);
    push_var_entries(&mut children, depth + 1, "Resource", &template.resources);
    close_element(out, depth, "Template", &children);
}

fn push_var_entries(out: &mut String, depth: usize, tag: &str, entries: &VarMap) {
    for (var, value) in entries {
        push_indent(out, depth);
        out.push('<');
        out.push_str(tag);
        push_attr(out, "var", var);
        if value.amount != 0 {
            push_raw_attr(out, "value", value.amount);
        }
        out.push_str("/>\n");
    }
}

fn var_kind_tag(kind: VarKind) -> &'static str {
    match kind {
        VarKind::Attribute => "Attribute",
        VarKind::Counter => "Counter",
        VarKind::Resource => "Resource",
    }
}

fn entity_kind_tag(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Unit => "Unit",
        EntityKind::Terrain => "Terrain",
        EntityKind::Effect => "Effect",
        EntityKind::Upgrade => "Upgrade",
    }
}

fn close_element(out: &mut String, depth: usize, tag: &str, children: &str) {
    if children.is_empty() {
        out.push_str("/>\n");
    } else {
        out.push_str(">\n");
        out.push_str(children);
        push_indent(out, depth);
        out.push_str("</");
        out.push_str(tag);
        out.push_str(">\n");
    }
}

fn push_indent(out: &mut String, depth: usize) {
    for _ in 0..depth {
        out.push_str("  ");
    }
}

fn push_attr(out: &mut String, name: &str, value: &str) {
    out.push(' ');
    out.push_str(name);
    out.push_str("=\"");
    push_escaped(out, value);
    out.push('"');
}

fn push_raw_attr(out: &mut String, name: &str, value: impl fmt::Display) {
    out.push(' ');
    out.push_str(name);
    out.push_str("=\"");
    out.push_str(&value.to_string());
    out.push('"');
}

fn push_escaped(out: &mut String, raw: &str) {
    for ch in raw.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            other => out.push(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use crate::doc::reader::read_scenario;
    use crate::model::{ScenarioHeader, VariableClass};

    use super::*;

    const RICH_DOC: &str = r#"<Scenario name="Borderlands" width="8" height="4">
  <Description>Two factions contest a river crossing.</Description>
  <Variables>
    <Attribute id="morale" name="Morale" min="-100" max="100"/>
    <Resource id="iron" max="1000" scale="2"/>
  </Variables>
  <Images>
    <Image id="inf" file="units/infantry.png" frames="4"/>
  </Images>
  <Entities>
    <Unit id="pikeman" name="Pikeman" frame="10" frames="4" speed="3" vision="5">
      <Attribute var="morale" value="60"/>
      <ResourceMod var="iron" value="-1"/>
      <Image ref="inf"/>
    </Unit>
    <Effect id="smoke" duration="8"/>
    <Upgrade id="steel_tips" repeatable="true"/>
  </Entities>
  <Factions>
    <Faction id="north" name="Northern League">
      <Resource var="iron" value="12"/>
      <Builds unit="pikeman"/>
      <Builds upgrade="steel_tips"/>
      <Template class="pikeman" name="Guard" offset="1">
        <Attribute var="morale" value="80"/>
      </Template>
    </Faction>
  </Factions>
  <Areas>
    <Area faction="north">
      <Rect x="0" y="0" width="4" height="2"/>
      <Rect x="4" y="0" width="4" height="2"/>
      <Template class="pikeman"/>
    </Area>
    <Area>
      <Rect x="0" y="2" width="8" height="2"/>
    </Area>
  </Areas>
</Scenario>
"#;

    fn write_doc(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("mkdir");
        }
        fs::write(&path, body).expect("write doc");
        path
    }

    #[test]
    fn render_omits_attributes_that_match_parser_defaults() {
        let mut scenario = Scenario::new(ScenarioHeader {
            name: "Ridge".to_string(),
            description: "High ground.".to_string(),
            map_width: 4,
            map_height: 2,
        });
        scenario
            .variables
            .insert(VariableClass::new(VarKind::Resource, "iron").with_range(0, 1000));
        scenario.images.insert(ImageClass::new("inf", "units/infantry.png"));
        scenario.entities.insert(
            EntityClass::new(EntityKind::Terrain, "grass").with_payload(EntityPayload::Terrain {
                background: true,
                passable: true,
            }),
        );

        let expected = "<Scenario name=\"Ridge\" width=\"4\" height=\"2\">\n  \
             <Description>High ground.</Description>\n  \
             <Variables>\n    <Resource id=\"iron\" max=\"1000\"/>\n  </Variables>\n  \
             <Images>\n    <Image id=\"inf\" file=\"units/infantry.png\"/>\n  </Images>\n  \
             <Entities>\n    <Terrain id=\"grass\" background=\"true\"/>\n  </Entities>\n\
             </Scenario>\n";
        assert_eq!(render_root(&scenario), expected);
    }

    #[test]
    fn empty_scenario_renders_as_a_single_element() {
        let scenario = Scenario::new(ScenarioHeader {
            name: "Blank".to_string(),
            description: String::new(),
            map_width: 4,
            map_height: 4,
        });
        assert_eq!(render_root(&scenario), "<Scenario name=\"Blank\" width=\"4\" height=\"4\"/>\n");
        assert_eq!(
            render_section_document(&scenario, SectionId::Variables),
            "<Variables/>\n"
        );
    }

    #[test]
    fn special_characters_survive_a_write_and_read_cycle() {
        let temp = TempDir::new().expect("tempdir");
        let mut scenario = Scenario::new(ScenarioHeader {
            name: "Fort \"A\" & <Keep>".to_string(),
            description: "Walls > moats & moats < walls.".to_string(),
            map_width: 4,
            map_height: 4,
        });
        scenario.variables.insert(
            VariableClass::new(VarKind::Counter, "kills").with_name("Kills & \"Losses\""),
        );

        let path = temp.path().join("special.xml");
        save_scenario(&scenario, &path).expect("saves");
        let reread = read_scenario(&path).expect("reads back");

        assert_eq!(reread.header, scenario.header);
        assert_eq!(reread.variables, scenario.variables);
    }

    #[test]
    fn a_loaded_document_round_trips_through_save() {
        let temp = TempDir::new().expect("tempdir");
        let original = write_doc(temp.path(), "map.xml", RICH_DOC);
        let first = read_scenario(&original).expect("read original");

        let copy = temp.path().join("copy.xml");
        save_scenario(&first, &copy).expect("save copy");
        let second = read_scenario(&copy).expect("read copy");

        assert_eq!(second.header, first.header);
        assert_eq!(second.variables, first.variables);
        assert_eq!(second.images, first.images);
        assert_eq!(second.entities, first.entities);
        assert_eq!(second.factions, first.factions);
        assert_eq!(second.areas, first.areas);

        // Saving the saved form again reproduces it byte for byte.
        let third = temp.path().join("third.xml");
        save_scenario(&second, &third).expect("save again");
        let third_doc = read_scenario(&third).expect("read third");
        assert_eq!(third_doc.content_hash(), second.content_hash());
    }

    #[test]
    fn write_file_swaps_content_in_place() {
        let temp = TempDir::new().expect("tempdir");
        let path = temp.path().join("map.xml");
        fs::write(&path, "stale").expect("seed");

        write_file(&path, "fresh").expect("write");

        assert_eq!(fs::read_to_string(&path).expect("read"), "fresh");
        assert!(!swap_path(&path).exists());
    }

    #[test]
    fn write_file_creates_missing_parent_directories() {
        let temp = TempDir::new().expect("tempdir");
        let path = temp.path().join("nested").join("map.xml");

        write_file(&path, "<Scenario/>").expect("write");

        assert_eq!(fs::read_to_string(&path).expect("read"), "<Scenario/>");
    }

    #[test]
    fn included_sections_are_saved_to_their_recorded_files() {
        let temp = TempDir::new().expect("tempdir");
        write_doc(
            temp.path(),
            "from/sections/entities.xml",
            "<Entities>\n  <Unit id=\"pikeman\" speed=\"3\"/>\n</Entities>\n",
        );
        let root = write_doc(
            temp.path(),
            "from/map.xml",
            "<Scenario name=\"Split\" width=\"4\" height=\"4\">\n  <Entities src=\"sections/entities.xml\"/>\n</Scenario>\n",
        );
        let scenario = read_scenario(&root).expect("read");

        let target = temp.path().join("to/map.xml");
        save_scenario(&scenario, &target).expect("save");

        let saved_root = fs::read_to_string(&target).expect("root text");
        assert!(saved_root.contains("<Entities src=\"sections/entities.xml\"/>"));
        assert!(!saved_root.contains("<Unit"));
        let reread = read_scenario(&target).expect("read back");
        assert_eq!(reread.entities, scenario.entities);
    }

    #[test]
    fn save_section_rewrites_only_the_include_file() {
        let temp = TempDir::new().expect("tempdir");
        write_doc(
            temp.path(),
            "vars.xml",
            "<Variables>\n  <Resource id=\"gold\"/>\n</Variables>\n",
        );
        let root = write_doc(
            temp.path(),
            "map.xml",
            "<Scenario name=\"Split\" width=\"4\" height=\"4\">\n  <Variables src=\"vars.xml\"/>\n</Scenario>\n",
        );
        let mut scenario = read_scenario(&root).expect("read");
        let root_before = fs::read_to_string(&root).expect("root text");

        scenario
            .variables
            .insert(VariableClass::new(VarKind::Resource, "wood"));
        let written = save_section(&scenario, SectionId::Variables).expect("save section");

        assert!(written.ends_with("vars.xml"));
        assert_eq!(fs::read_to_string(&root).expect("root text"), root_before);
        let reread = read_scenario(&root).expect("read back");
        assert!(reread.variables.find("wood").is_some());
    }

    #[test]
    fn save_section_rewrites_the_root_when_the_section_is_inline() {
        let temp = TempDir::new().expect("tempdir");
        let root = write_doc(
            temp.path(),
            "map.xml",
            "<Scenario name=\"Inline\" width=\"4\" height=\"4\">\n  <Variables>\n    <Resource id=\"gold\"/>\n  </Variables>\n</Scenario>\n",
        );
        let mut scenario = read_scenario(&root).expect("read");

        scenario
            .variables
            .insert(VariableClass::new(VarKind::Resource, "wood"));
        let written = save_section(&scenario, SectionId::Variables).expect("save section");

        assert_eq!(written, root);
        let reread = read_scenario(&root).expect("read back");
        assert!(reread.variables.find("wood").is_some());
    }

    #[test]
    fn saving_a_section_without_a_backing_document_is_an_error() {
        let scenario = Scenario::default();
        assert!(matches!(
            save_section(&scenario, SectionId::Variables),
            Err(DocWriteError::NoSource)
        ));
    }
}
