//! Chain definitions: ordered, uniquely named steps with fixed instructions.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::error::RunError;

pub const EXTRACT_STEP: &str = "extract";
pub const SORT_STEP: &str = "sort";
pub const FORMAT_STEP: &str = "format";

pub const EXTRACT_INSTRUCTION: &str = "Extract only the numerical values and their associated metrics from the text. Format each as 'metric name: metric' on a new line.";
pub const SORT_INSTRUCTION: &str = "Sort all lines in descending order by numerical value.";
pub const FORMAT_INSTRUCTION: &str =
    "Format the sorted data as a markdown table with columns 'Metric Name' and 'Value'.";

/// One step of a chain. Its input is the previous step's output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainStep {
    pub name: String,
    pub instruction: String,
}

/// An ordered list of steps with unique, non-empty names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chain {
    steps: Vec<ChainStep>,
}

#[derive(Deserialize)]
struct ChainFile {
    steps: Vec<ChainStep>,
}

impl Chain {
    pub fn new(steps: Vec<ChainStep>) -> Result<Self, RunError> {
        if steps.is_empty() {
            return Err(RunError::InvalidInput("a chain needs at least one step".into()));
        }
        let mut seen = HashSet::new();
        for step in &steps {
            if step.name.trim().is_empty() {
                return Err(RunError::InvalidInput("step names cannot be empty".into()));
            }
            if step.instruction.trim().is_empty() {
                return Err(RunError::InvalidInput(format!(
                    "step '{}' has an empty instruction",
                    step.name
                )));
            }
            if !seen.insert(step.name.as_str()) {
                return Err(RunError::InvalidInput(format!(
                    "duplicate step name '{}'",
                    step.name
                )));
            }
        }
        Ok(Self { steps })
    }

    /// Builds a chain from `(name, instruction)` pairs.
    pub fn from_pairs<N, I>(pairs: impl IntoIterator<Item = (N, I)>) -> Result<Self, RunError>
    where
        N: Into<String>,
        I: Into<String>,
    {
        Self::new(
            pairs
                .into_iter()
                .map(|(name, instruction)| ChainStep {
                    name: name.into(),
                    instruction: instruction.into(),
                })
                .collect(),
        )
    }

    /// Parses a YAML definition of the form `steps: [{ name, instruction }]`.
    pub fn from_yaml(yaml: &str) -> Result<Self, RunError> {
        let file: ChainFile = serde_yaml::from_str(yaml)
            .map_err(|e| RunError::InvalidInput(format!("invalid chain definition: {}", e)))?;
        Self::new(file.steps)
    }

    /// Extract metrics, sort them descending, render them as a markdown table.
    pub fn metrics_report() -> Self {
        Self {
            steps: vec![
                ChainStep {
                    name: EXTRACT_STEP.to_string(),
                    instruction: EXTRACT_INSTRUCTION.to_string(),
                },
                ChainStep {
                    name: SORT_STEP.to_string(),
                    instruction: SORT_INSTRUCTION.to_string(),
                },
                ChainStep {
                    name: FORMAT_STEP.to_string(),
                    instruction: FORMAT_INSTRUCTION.to_string(),
                },
            ],
        }
    }

    pub fn steps(&self) -> &[ChainStep] {
        &self.steps
    }

    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_report_has_fixed_order() {
        let chain = Chain::metrics_report();
        assert_eq!(chain.step_names(), vec!["extract", "sort", "format"]);
        assert!(chain.steps()[2].instruction.contains("'Metric Name' and 'Value'"));
    }

    #[test]
    fn duplicate_and_empty_names_are_rejected() {
        assert!(matches!(
            Chain::from_pairs([("a", "x"), ("a", "y")]),
            Err(RunError::InvalidInput(_))
        ));
        assert!(matches!(
            Chain::from_pairs([(" ", "x")]),
            Err(RunError::InvalidInput(_))
        ));
        assert!(matches!(
            Chain::from_pairs([("a", "")]),
            Err(RunError::InvalidInput(_))
        ));
        assert!(matches!(
            Chain::new(Vec::new()),
            Err(RunError::InvalidInput(_))
        ));
    }

    #[test]
    fn yaml_definition_is_parsed_in_order() {
        let chain = Chain::from_yaml(
            r#"
steps:
  - name: extract
    instruction: Extract only the numerical values.
  - name: percent
    instruction: Convert all numerical values to percentages where possible.
  - name: table
    instruction: Format the data as a markdown table.
"#,
        )
        .unwrap();
        assert_eq!(chain.step_names(), vec!["extract", "percent", "table"]);
    }

    #[test]
    fn malformed_yaml_is_invalid_input() {
        assert!(matches!(
            Chain::from_yaml("steps: nope"),
            Err(RunError::InvalidInput(_))
        ));
    }
}
