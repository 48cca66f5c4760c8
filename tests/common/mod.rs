#![allow(dead_code)]

use async_trait::async_trait;
use durable_chain::api::{
    CompletionBackend, ProviderError, EXTRACT_INSTRUCTION, FORMAT_INSTRUCTION, SORT_INSTRUCTION,
};
use regex::Regex;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

pub const Q3_REPORT: &str = "Q3 Performance Summary:
Our customer satisfaction score rose to 92 points this quarter.
Revenue grew by 45% compared to last year.
Market share is now at 23% in our primary market.
Customer churn decreased to 5% from 8%.";

pub fn instruction_for(step: &str) -> &'static str {
    match step {
        "extract" => EXTRACT_INSTRUCTION,
        "sort" => SORT_INSTRUCTION,
        "format" => FORMAT_INSTRUCTION,
        other => panic!("unknown step {other}"),
    }
}

fn step_for(instruction: &str) -> Option<&'static str> {
    ["extract", "sort", "format"]
        .into_iter()
        .find(|s| instruction_for(s) == instruction)
}

/// Deterministic stand-in for a chat model that really extracts, sorts and formats.
#[derive(Default)]
pub struct ScriptedBackend {
    calls: Mutex<Vec<(String, String)>>,
    failures: Mutex<HashMap<String, u32>>,
    delays: Mutex<HashMap<String, Duration>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next `times` calls of `step` fail.
    pub fn fail(self, step: &str, times: u32) -> Self {
        self.failures
            .lock()
            .unwrap()
            .insert(step.to_string(), times);
        self
    }

    /// Calls of `step` sleep for `delay` first.
    pub fn delay(self, step: &str, delay: Duration) -> Self {
        self.delays.lock().unwrap().insert(step.to_string(), delay);
        self
    }

    pub fn calls(&self, step: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(s, _)| s == step)
            .count()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn inputs(&self, step: &str) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(s, _)| s == step)
            .map(|(_, input)| input.clone())
            .collect()
    }
}

fn number(value: &str) -> f64 {
    let re = Regex::new(r"-?\d+(?:\.\d+)?").unwrap();
    re.find(value)
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(f64::MIN)
}

fn extract(text: &str) -> String {
    let re = Regex::new(r"^(.*?)\s*(\d+(?:\.\d+)?(?:%| points)?)").unwrap();
    text.lines()
        .filter_map(|line| re.captures(line.trim()))
        .filter(|caps| !caps[1].is_empty())
        .map(|caps| format!("{}: {}", caps[1].trim_end_matches(':'), &caps[2]))
        .collect::<Vec<_>>()
        .join("\n")
}

fn sort(lines: &str) -> String {
    let mut rows: Vec<&str> = lines.lines().filter(|l| l.contains(':')).collect();
    rows.sort_by(|a, b| {
        let va = number(a.rsplit(':').next().unwrap_or(""));
        let vb = number(b.rsplit(':').next().unwrap_or(""));
        vb.partial_cmp(&va).unwrap()
    });
    rows.join("\n")
}

fn format_table(lines: &str) -> String {
    let mut out = String::from("| Metric Name | Value |\n|---|---|\n");
    for line in lines.lines() {
        if let Some((name, value)) = line.rsplit_once(':') {
            out.push_str(&format!("| {} | {} |\n", name.trim(), value.trim()));
        }
    }
    out
}

#[async_trait]
impl CompletionBackend for ScriptedBackend {
    async fn complete(&self, instruction: &str, input: &str) -> Result<String, ProviderError> {
        let step = step_for(instruction)
            .ok_or_else(|| ProviderError::Call(format!("unexpected instruction: {instruction}")))?;
        self.calls
            .lock()
            .unwrap()
            .push((step.to_string(), input.to_string()));

        let delay = self.delays.lock().unwrap().get(step).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        {
            let mut failures = self.failures.lock().unwrap();
            if let Some(left) = failures.get_mut(step) {
                if *left > 0 {
                    *left -= 1;
                    return Err(ProviderError::Call(format!("{step} unavailable")));
                }
            }
        }

        Ok(match step {
            "extract" => extract(input),
            "sort" => sort(input),
            _ => format_table(input),
        })
    }
}
