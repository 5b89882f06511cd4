use serde::Serialize;

use crate::model::Scenario;

/// Document-level counts captured at one point in time, for terminal display
/// or JSON output.
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioSummary {
    pub name: String,
    pub map_width: u32,
    pub map_height: u32,
    pub content_hash: Option<String>,
    pub variables: usize,
    pub images: usize,
    pub entities: usize,
    pub factions: usize,
    pub areas: usize,
    pub area_rects: usize,
    pub covered_cells: usize,
}

impl ScenarioSummary {
    pub fn capture(scenario: &Scenario) -> Self {
        Self {
            name: scenario.header.name.clone(),
            map_width: scenario.header.map_width,
            map_height: scenario.header.map_height,
            content_hash: scenario.content_hash().map(str::to_string),
            variables: scenario.variables.len(),
            images: scenario.images.len(),
            entities: scenario.entities.len(),
            factions: scenario.factions.len(),
            areas: scenario.areas.len(),
            area_rects: scenario.areas.rect_count(),
            covered_cells: scenario.areas.covered_cells(),
        }
    }

    pub fn render_human(&self) -> String {
        let mut lines = vec![
            format!("name={}", self.name),
            format!("map={}x{}", self.map_width, self.map_height),
        ];
        if let Some(hash) = &self.content_hash {
            lines.push(format!("content_hash={hash}"));
        }
        lines.push(format!("variables={}", self.variables));
        lines.push(format!("images={}", self.images));
        lines.push(format!("entities={}", self.entities));
        lines.push(format!("factions={}", self.factions));
        lines.push(format!(
            "areas={} rects={} cells={}",
            self.areas, self.area_rects, self.covered_cells
        ));
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use crate::model::{
        Area, EntityClass, EntityKind, Rect, Scenario, ScenarioHeader, VarKind, VariableClass,
    };

    use super::*;

    fn sample() -> Scenario {
        let mut scenario = Scenario::new(ScenarioHeader {
            name: "Ridge".to_string(),
            description: String::new(),
            map_width: 8,
            map_height: 4,
        });
        scenario
            .variables
            .insert(VariableClass::new(VarKind::Resource, "iron"));
        scenario
            .entities
            .insert(EntityClass::new(EntityKind::Terrain, "grass"));
        scenario.areas.push(Area {
            rects: vec![
                Rect {
                    x: 0,
                    y: 0,
                    width: 4,
                    height: 2,
                },
                Rect {
                    x: 4,
                    y: 0,
                    width: 2,
                    height: 1,
                },
            ],
            ..Default::default()
        });
        scenario
    }

    #[test]
    fn capture_counts_every_collection() {
        let summary = ScenarioSummary::capture(&sample());

        assert_eq!(summary.name, "Ridge");
        assert_eq!(summary.variables, 1);
        assert_eq!(summary.entities, 1);
        assert_eq!(summary.areas, 1);
        assert_eq!(summary.area_rects, 2);
        assert_eq!(summary.covered_cells, 10);
        assert_eq!(summary.content_hash, None);
    }

    #[test]
    fn human_rendering_is_one_key_value_pair_per_line() {
        let rendered = ScenarioSummary::capture(&sample()).render_human();

        assert!(rendered.starts_with("name=Ridge\nmap=8x4\n"));
        assert!(rendered.contains("\nvariables=1\n"));
        assert!(rendered.ends_with("areas=1 rects=2 cells=10"));
        // Without a load there is no hash line at all.
        assert!(!rendered.contains("content_hash"));
    }

    #[test]
    fn summaries_serialize_to_flat_json() {
        let value = serde_json::to_value(ScenarioSummary::capture(&sample())).expect("to json");

        assert_eq!(value["map_width"], 8);
        assert_eq!(value["entities"], 1);
        assert!(value["content_hash"].is_null());
    }
}
