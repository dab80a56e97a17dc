//! Structural checks for tool definitions.
//!
//! The engine interprets whatever the catalog serves, so a malformed document
//! surfaces as a confusing runtime state several steps in. These checks catch
//! the common authoring mistakes up front: duplicate identifiers, dangling step
//! references, grid steps with nothing to read from, incomplete actions, and
//! field dependency cycles.

use std::collections::{HashMap, HashSet};

use anyhow::{Result, bail};

use super::{ActionKind, StepKind, ToolDefinition};

/// Validates a tool definition, failing on the first structural problem.
pub fn validate_tool_definition(tool: &ToolDefinition) -> Result<()> {
    if tool.id.trim().is_empty() {
        bail!("tool is missing an id");
    }
    if tool.steps.is_empty() {
        bail!("tool '{}' declares no steps", tool.id);
    }

    let mut step_ids = HashSet::new();
    for step in &tool.steps {
        if step.id.trim().is_empty() {
            bail!("tool '{}' has a step without an id", tool.id);
        }
        if !step_ids.insert(step.id.as_str()) {
            bail!("tool '{}' declares step '{}' more than once", tool.id, step.id);
        }
    }

    let produced_aliases: HashSet<&str> = tool
        .steps
        .iter()
        .flat_map(|step| step.on_submit.iter())
        .filter_map(|action| action.result_alias())
        .collect();

    for step in &tool.steps {
        if let Some(next_id) = step.next_step_id.as_deref()
            && !step_ids.contains(next_id)
        {
            bail!("step '{}' points nextStepId at unknown step '{}'", step.id, next_id);
        }

        if step.kind == StepKind::Grid
            && let Some(alias) = step.data_source.as_deref()
            && !produced_aliases.contains(alias)
        {
            bail!("grid step '{}' reads dataSource '{}' which no action stores", step.id, alias);
        }

        let mut field_ids = HashSet::new();
        for field in &step.fields {
            if !field_ids.insert(field.id.as_str()) {
                bail!("step '{}' declares field '{}' more than once", step.id, field.id);
            }
        }
        for field in &step.fields {
            for driver in field.drivers() {
                if !field_ids.contains(driver) {
                    bail!("field '{}' on step '{}' depends on unknown field '{}'", field.id, step.id, driver);
                }
            }
        }
        detect_dependency_cycle(&step.id, step.fields.iter().map(|field| (field.id.as_str(), field.drivers())))?;

        for (index, action) in step.on_submit.iter().enumerate() {
            match action.action {
                ActionKind::CallApi | ActionKind::GetSheetInfo if action.api_endpoint.as_deref().is_none_or(str::is_empty) => {
                    bail!("step '{}' action {} ({}) is missing apiEndpoint", step.id, index, action.action.as_str());
                }
                ActionKind::Worker if action.action_id.as_deref().is_none_or(str::is_empty) => {
                    bail!("step '{}' worker action {} is missing actionId", step.id, index);
                }
                ActionKind::Navigation => match action.go_to_step.as_deref() {
                    None => bail!("step '{}' navigation action {} is missing goToStep", step.id, index),
                    Some(target) if !step_ids.contains(target) => {
                        bail!("step '{}' navigation action {} targets unknown step '{}'", step.id, index, target)
                    }
                    Some(_) => {}
                },
                _ => {}
            }
            if let Some(route) = &action.on_error
                && !step_ids.contains(route.go_to_step.as_str())
            {
                bail!("step '{}' action {} routes errors to unknown step '{}'", step.id, index, route.go_to_step);
            }
        }
    }

    Ok(())
}

fn detect_dependency_cycle<'a>(step_id: &str, edges: impl Iterator<Item = (&'a str, Vec<&'a str>)>) -> Result<()> {
    let graph: HashMap<&str, Vec<&str>> = edges.collect();
    let mut visiting = HashSet::new();
    let mut done = HashSet::new();

    fn visit<'a>(
        node: &'a str,
        graph: &HashMap<&'a str, Vec<&'a str>>,
        visiting: &mut HashSet<&'a str>,
        done: &mut HashSet<&'a str>,
    ) -> Option<&'a str> {
        if done.contains(node) {
            return None;
        }
        if !visiting.insert(node) {
            return Some(node);
        }
        for driver in graph.get(node).into_iter().flatten() {
            if let Some(cycle_at) = visit(driver, graph, visiting, done) {
                return Some(cycle_at);
            }
        }
        visiting.remove(node);
        done.insert(node);
        None
    }

    let mut nodes: Vec<&str> = graph.keys().copied().collect();
    nodes.sort_unstable();
    for node in nodes {
        if let Some(cycle_at) = visit(node, &graph, &mut visiting, &mut done) {
            bail!("step '{}' has a field dependency cycle through '{}'", step_id, cycle_at);
        }
    }
    Ok(())
}
