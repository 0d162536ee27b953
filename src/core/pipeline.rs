//! Repository and pipeline domain model

use crate::core::config::{PipelineConfig, RepositoryConfig};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use uuid::Uuid;

const SNAPSHOT_ID_NAMESPACE: Uuid = Uuid::from_u128(0x736e_6170_7368_4f74_a1c3_52de_90b7_6e41);

/// A loaded repository
#[derive(Debug, Clone)]
pub struct RepositoryDefinition {
    /// Repository name
    pub name: String,

    /// Symbol code pointers use to address this repository
    pub symbol: String,

    pub description: Option<String>,

    /// Pipelines keyed by name
    pipelines: BTreeMap<String, PipelineDefinition>,
}

impl RepositoryDefinition {
    pub fn from_config(config: &RepositoryConfig) -> Self {
        let pipelines = config
            .pipelines
            .iter()
            .map(|p| (p.name.clone(), p.to_definition()))
            .collect();

        RepositoryDefinition {
            name: config.repository.clone(),
            symbol: config.symbol.clone(),
            description: config.description.clone(),
            pipelines,
        }
    }

    pub fn pipeline(&self, name: &str) -> Option<&PipelineDefinition> {
        self.pipelines.get(name)
    }

    pub fn has_pipeline(&self, name: &str) -> bool {
        self.pipelines.contains_key(name)
    }

    /// Pipeline names in sorted order
    pub fn pipeline_names(&self) -> Vec<String> {
        self.pipelines.keys().cloned().collect()
    }

    pub fn pipelines(&self) -> impl Iterator<Item = &PipelineDefinition> {
        self.pipelines.values()
    }
}

/// A solid inside a pipeline definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SolidDefinition {
    pub name: String,
    pub description: Option<String>,
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
    pub depends_on: Vec<String>,
}

/// A pipeline definition
#[derive(Debug, Clone)]
pub struct PipelineDefinition {
    pub name: String,
    pub description: Option<String>,
    pub modes: Vec<String>,
    pub tags: BTreeMap<String, String>,
    pub solids: HashMap<String, SolidDefinition>,

    /// Solid execution order (topological sort)
    execution_order: Vec<String>,
}

impl PipelineDefinition {
    pub fn from_config(config: &PipelineConfig) -> Self {
        let solids: HashMap<String, SolidDefinition> = config
            .solids
            .iter()
            .map(|s| {
                let solid = SolidDefinition {
                    name: s.name.clone(),
                    description: s.description.clone(),
                    inputs: s.inputs.clone(),
                    outputs: s.outputs.clone(),
                    depends_on: s.depends_on.clone(),
                };
                (solid.name.clone(), solid)
            })
            .collect();

        let execution_order = Self::topological_sort(&solids);

        PipelineDefinition {
            name: config.name.clone(),
            description: config.description.clone(),
            modes: config.modes.clone(),
            tags: config.tags.clone(),
            solids,
            execution_order,
        }
    }

    pub fn solid(&self, name: &str) -> Option<&SolidDefinition> {
        self.solids.get(name)
    }

    /// Get execution order (topological sort)
    pub fn execution_order(&self) -> &[String] {
        &self.execution_order
    }

    fn topological_sort(solids: &HashMap<String, SolidDefinition>) -> Vec<String> {
        let mut result = Vec::new();
        let mut visited = HashSet::new();

        // Sort for deterministic order
        let mut names: Vec<_> = solids.keys().cloned().collect();
        names.sort();

        for name in names {
            Self::visit(&name, solids, &mut visited, &mut result);
        }

        result
    }

    fn visit(
        name: &str,
        solids: &HashMap<String, SolidDefinition>,
        visited: &mut HashSet<String>,
        result: &mut Vec<String>,
    ) {
        if !visited.insert(name.to_string()) {
            return;
        }

        if let Some(solid) = solids.get(name) {
            let mut deps = solid.depends_on.clone();
            deps.sort();
            for dep in &deps {
                Self::visit(dep, solids, visited, result);
            }
        }

        result.push(name.to_string());
    }

    /// Capture the structure of this pipeline as seen from outside its process
    pub fn snapshot(&self) -> PipelineSnapshot {
        let solids = self
            .execution_order
            .iter()
            .filter_map(|name| self.solids.get(name))
            .cloned()
            .collect();

        PipelineSnapshot::new(
            self.name.clone(),
            self.description.clone(),
            self.modes.clone(),
            self.tags.clone(),
            solids,
        )
    }
}

/// Serializable structure of a pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineSnapshot {
    pub name: String,
    pub description: Option<String>,
    pub modes: Vec<String>,
    pub tags: BTreeMap<String, String>,

    /// Solids in execution order
    pub solids: Vec<SolidDefinition>,

    /// Content hash of everything above
    pub snapshot_id: Uuid,
}

#[derive(Serialize)]
struct SnapshotContent<'a> {
    name: &'a str,
    description: &'a Option<String>,
    modes: &'a [String],
    tags: &'a BTreeMap<String, String>,
    solids: &'a [SolidDefinition],
}

impl PipelineSnapshot {
    fn new(
        name: String,
        description: Option<String>,
        modes: Vec<String>,
        tags: BTreeMap<String, String>,
        solids: Vec<SolidDefinition>,
    ) -> Self {
        let content = SnapshotContent {
            name: &name,
            description: &description,
            modes: &modes,
            tags: &tags,
            solids: &solids,
        };
        // Snapshot content is plain data with string keys; serializing cannot fail
        let body = serde_json::to_string(&content).expect("snapshot content serializes to JSON");
        let snapshot_id = Uuid::new_v5(&SNAPSHOT_ID_NAMESPACE, body.as_bytes());

        Self {
            name,
            description,
            modes,
            tags,
            solids,
            snapshot_id,
        }
    }

    pub fn solid_names(&self) -> Vec<&str> {
        self.solids.iter().map(|s| s.name.as_str()).collect()
    }
}
