//! Input resolution for command-line runs: canned answers from a file, with
//! an optional interactive prompt on stdin.

use anyhow::{Context, Result};
use async_trait::async_trait;
use canvascore::{
    FieldKind, InputAbandoned, InputPort, InputRequest, InputResolver, InputSubmission, NodeId,
    Value, Workflow,
};
use std::collections::HashMap;
use std::io::Write;
use std::path::Path;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::Mutex;

pub struct AnswerResolver {
    answers: HashMap<NodeId, HashMap<String, Value>>,
    prompt: Option<Mutex<Lines<BufReader<Stdin>>>>,
}

impl AnswerResolver {
    pub fn new(answers: HashMap<NodeId, HashMap<String, Value>>, interactive: bool) -> Self {
        Self {
            answers,
            prompt: interactive.then(|| Mutex::new(BufReader::new(tokio::io::stdin()).lines())),
        }
    }

    /// Read an answers file keyed by node id or node name.
    ///
    /// ```json
    /// { "Ask for JSON": { "text": "[1, 2, 3]" } }
    /// ```
    pub fn load(path: &Path, workflow: &Workflow) -> Result<HashMap<NodeId, HashMap<String, Value>>> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading answers from {}", path.display()))?;
        let json: serde_json::Value = serde_json::from_str(&raw)?;
        let serde_json::Value::Object(entries) = json else {
            anyhow::bail!("answers file must be a JSON object");
        };

        let mut answers = HashMap::new();
        for (key, fields) in entries {
            let node = workflow
                .nodes
                .iter()
                .find(|n| n.id.to_string() == key || n.name.as_deref() == Some(key.as_str()))
                .with_context(|| format!("answers refer to unknown node '{}'", key))?;
            let serde_json::Value::Object(fields) = fields else {
                anyhow::bail!("answers for '{}' must be an object of field values", key);
            };
            let values = fields
                .into_iter()
                .map(|(field, value)| (field, Value::from_plain_json(value)))
                .collect();
            answers.insert(node.id, values);
        }
        Ok(answers)
    }

    async fn ask(&self, request: &InputRequest) -> Option<HashMap<String, Value>> {
        let lines = self.prompt.as_ref()?;
        let mut lines = lines.lock().await;

        println!("  ⌨️  Node {} needs input", request.node_id);
        let mut values = HashMap::new();
        for port in &request.schema {
            let current = request
                .prefill
                .get(&port.name)
                .map(|v| format!(" [{}]", v.to_plain_json()))
                .unwrap_or_default();
            print!("     {}{}{}: ", port.name, if port.required { "*" } else { "" }, current);
            let _ = std::io::stdout().flush();

            let line = lines.next_line().await.ok().flatten()?;
            let line = line.trim();
            if !line.is_empty() {
                values.insert(port.name.clone(), parse_field(port, line));
            }
        }
        Some(values)
    }
}

#[async_trait]
impl InputResolver for AnswerResolver {
    async fn request(&self, request: InputRequest) -> Result<InputSubmission, InputAbandoned> {
        let node_id = request.node_id;
        if let Some(values) = self.answers.get(&node_id) {
            tracing::debug!(node = %node_id, "answering from file");
            return Ok(InputSubmission {
                node_id,
                values: values.clone(),
            });
        }
        match self.ask(&request).await {
            Some(values) => Ok(InputSubmission { node_id, values }),
            None => Err(InputAbandoned::Dismissed(node_id)),
        }
    }
}

fn parse_field(port: &InputPort, raw: &str) -> Value {
    match port.kind {
        FieldKind::Number => raw
            .parse::<f64>()
            .map(Value::Number)
            .unwrap_or_else(|_| Value::from(raw)),
        FieldKind::Boolean => match raw {
            "true" | "yes" | "y" => Value::Bool(true),
            "false" | "no" | "n" => Value::Bool(false),
            other => Value::from(other),
        },
        FieldKind::MultiSelect | FieldKind::File => Value::Array(
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(Value::from)
                .collect(),
        ),
        FieldKind::Any | FieldKind::Text | FieldKind::Json => Value::from(raw),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multiselect_answers_split_on_commas() {
        let port = InputPort::new("tags", FieldKind::MultiSelect);
        assert_eq!(
            parse_field(&port, "a, b,,c"),
            Value::Array(vec![Value::from("a"), Value::from("b"), Value::from("c")])
        );
    }

    #[test]
    fn unparseable_number_is_left_for_validation() {
        let port = InputPort::new("n", FieldKind::Number);
        assert_eq!(parse_field(&port, "4.5"), Value::Number(4.5));
        assert_eq!(parse_field(&port, "four"), Value::from("four"));
    }
}
