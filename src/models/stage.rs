use serde::{Deserialize, Serialize};
use crate::engine::EngineError;

/// Workflow stage identifier
///
/// Declaration order is workflow order: every successor of a stage is declared
/// after it, which keeps the graph acyclic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    Planning,
    MaterialIssue,
    SemiQc,
    PhosphatingQc,
    AssemblyA,
    AssemblyB,
    AssemblyC,
    AssemblyD,
    #[serde(rename = "testing-1")]
    Testing1,
    #[serde(rename = "testing-2")]
    Testing2,
    Svs,
    #[serde(rename = "marking-1")]
    Marking1,
    #[serde(rename = "marking-2")]
    Marking2,
    #[serde(rename = "pdi-1")]
    Pdi1,
    #[serde(rename = "pdi-2")]
    Pdi2,
    Tpi,
    Dispatch,
}

const ALL_STAGES: &[Stage] = &[
    Stage::Planning,
    Stage::MaterialIssue,
    Stage::SemiQc,
    Stage::PhosphatingQc,
    Stage::AssemblyA,
    Stage::AssemblyB,
    Stage::AssemblyC,
    Stage::AssemblyD,
    Stage::Testing1,
    Stage::Testing2,
    Stage::Svs,
    Stage::Marking1,
    Stage::Marking2,
    Stage::Pdi1,
    Stage::Pdi2,
    Stage::Tpi,
    Stage::Dispatch,
];

const ASSEMBLY_OR_TESTING: &[Stage] = &[
    Stage::AssemblyA,
    Stage::AssemblyB,
    Stage::AssemblyC,
    Stage::AssemblyD,
    Stage::Testing1,
    Stage::Testing2,
];

impl Stage {
    /// Stable identifier used in storage, filters and the CLI
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Planning => "planning",
            Stage::MaterialIssue => "material-issue",
            Stage::SemiQc => "semi-qc",
            Stage::PhosphatingQc => "phosphating-qc",
            Stage::AssemblyA => "assembly-a",
            Stage::AssemblyB => "assembly-b",
            Stage::AssemblyC => "assembly-c",
            Stage::AssemblyD => "assembly-d",
            Stage::Testing1 => "testing-1",
            Stage::Testing2 => "testing-2",
            Stage::Svs => "svs",
            Stage::Marking1 => "marking-1",
            Stage::Marking2 => "marking-2",
            Stage::Pdi1 => "pdi-1",
            Stage::Pdi2 => "pdi-2",
            Stage::Tpi => "tpi",
            Stage::Dispatch => "dispatch",
        }
    }

    /// Human-readable label
    pub fn label(&self) -> &'static str {
        match self {
            Stage::Planning => "Planning",
            Stage::MaterialIssue => "Material Issue",
            Stage::SemiQc => "Semi QC",
            Stage::PhosphatingQc => "Phosphating QC",
            Stage::AssemblyA => "Assembly A",
            Stage::AssemblyB => "Assembly B",
            Stage::AssemblyC => "Assembly C",
            Stage::AssemblyD => "Assembly D",
            Stage::Testing1 => "Testing 1",
            Stage::Testing2 => "Testing 2",
            Stage::Svs => "SVS",
            Stage::Marking1 => "Marking 1",
            Stage::Marking2 => "Marking 2",
            Stage::Pdi1 => "PDI 1",
            Stage::Pdi2 => "PDI 2",
            Stage::Tpi => "TPI",
            Stage::Dispatch => "Dispatch",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        let key = normalize_stage_key(s);
        ALL_STAGES.iter().copied().find(|stage| {
            normalize_stage_key(stage.as_str()) == key || normalize_stage_key(stage.label()) == key
        })
    }

    fn successors(&self) -> &'static [Stage] {
        match self {
            Stage::Planning => &[Stage::MaterialIssue, Stage::SemiQc, Stage::PhosphatingQc],
            Stage::MaterialIssue => &[Stage::SemiQc, Stage::PhosphatingQc],
            Stage::SemiQc => &[
                Stage::PhosphatingQc,
                Stage::AssemblyA,
                Stage::AssemblyB,
                Stage::AssemblyC,
                Stage::AssemblyD,
                Stage::Testing1,
                Stage::Testing2,
            ],
            // Finished valves skip assembly and go straight to testing
            Stage::PhosphatingQc => ASSEMBLY_OR_TESTING,
            Stage::AssemblyA | Stage::AssemblyB | Stage::AssemblyC | Stage::AssemblyD => {
                &[Stage::Testing1, Stage::Testing2]
            }
            Stage::Testing1 | Stage::Testing2 => &[Stage::Svs],
            Stage::Svs => &[Stage::Marking1, Stage::Marking2],
            Stage::Marking1 | Stage::Marking2 => &[Stage::Pdi1, Stage::Pdi2],
            Stage::Pdi1 | Stage::Pdi2 => &[Stage::Tpi, Stage::Dispatch],
            Stage::Tpi => &[Stage::Dispatch],
            Stage::Dispatch => &[],
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Lowercase and collapse spaces, underscores and hyphens so that
/// "Semi QC", "semi_qc" and "semi-qc" resolve to the same stage.
fn normalize_stage_key(s: &str) -> String {
    s.trim()
        .chars()
        .filter(|c| !matches!(c, ' ' | '_' | '-'))
        .flat_map(|c| c.to_lowercase())
        .collect()
}

/// The fixed workflow graph
pub struct StageGraph;

impl StageGraph {
    /// Every stage in workflow order
    pub fn ordered() -> &'static [Stage] {
        ALL_STAGES
    }

    /// Resolve a stage identifier (slug or label)
    pub fn parse(id: &str) -> Result<Stage, EngineError> {
        Stage::from_str(id).ok_or_else(|| EngineError::UnknownStage(id.to_string()))
    }

    /// Stages legally reachable from `stage`, in operator display order.
    /// Empty iff `stage` is terminal.
    pub fn successors(stage: Stage) -> &'static [Stage] {
        stage.successors()
    }

    /// Successors looked up by identifier
    pub fn successors_of(id: &str) -> Result<&'static [Stage], EngineError> {
        Ok(Self::successors(Self::parse(id)?))
    }

    pub fn label(stage: Stage) -> &'static str {
        stage.label()
    }

    pub fn is_terminal(stage: Stage) -> bool {
        stage.successors().is_empty()
    }

    /// Whether `to` directly follows `from`
    pub fn can_reach(from: Stage, to: Stage) -> bool {
        from.successors().contains(&to)
    }
}
