//! Dataset tools
//!
//! The fixed, read-only set of operations a model may ask the agent to run.
//! Each model turn carries one JSON object tagged by `action`; the agent
//! executes it against the dataset and feeds the observation back.

use serde::Deserialize;

use crate::dataset::Dataset;

const DEFAULT_ROWS: usize = 5;
const MAX_ROWS: usize = 50;
const DEFAULT_COUNTS: usize = 20;
const MAX_UNIQUE_LISTED: usize = 100;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ToolCall {
    Shape,
    Columns,
    Head {
        #[serde(default)]
        n: Option<usize>,
    },
    Tail {
        #[serde(default)]
        n: Option<usize>,
    },
    Describe {
        #[serde(default)]
        columns: Option<Vec<String>>,
    },
    ValueCounts {
        column: String,
        #[serde(default)]
        limit: Option<usize>,
    },
    Unique {
        column: String,
    },
    MissingValues,
    Correlation {
        left: String,
        right: String,
    },
    FinalAnswer {
        answer: String,
    },
}

/// What the model said in one turn.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelTurn {
    Call(ToolCall),
    /// Plain text with no action object.
    Text(String),
    /// An object was present but did not name a valid action.
    Invalid(String),
}

pub const PROTOCOL: &str = r#"Reply with exactly one JSON object and nothing else. Available actions:
{"action": "shape"}
{"action": "columns"}
{"action": "head", "n": 5}
{"action": "tail", "n": 5}
{"action": "describe", "columns": ["optional", "column", "names"]}
{"action": "value_counts", "column": "name", "limit": 20}
{"action": "unique", "column": "name"}
{"action": "missing_values"}
{"action": "correlation", "left": "column_a", "right": "column_b"}
{"action": "final_answer", "answer": "your answer for the user"}
Use the tools to look at the data before answering. When you know the answer, use final_answer."#;

/// Parse a model reply, tolerating markdown fences and surrounding prose.
pub fn parse_turn(reply: &str) -> ModelTurn {
    let Some(action) = find_action_object(reply) else {
        return ModelTurn::Text(reply.trim().to_string());
    };
    match serde_json::from_value::<ToolCall>(action) {
        Ok(call) => ModelTurn::Call(call),
        Err(e) => ModelTurn::Invalid(e.to_string()),
    }
}

/// First balanced `{...}` span that parses as a JSON object carrying an
/// `action` key. Braces in prose before it are skipped.
fn find_action_object(text: &str) -> Option<serde_json::Value> {
    text.match_indices('{').find_map(|(start, _)| {
        let span = balanced_span(&text[start..])?;
        match serde_json::from_str::<serde_json::Value>(span) {
            Ok(value) if value.get("action").is_some() => Some(value),
            _ => None,
        }
    })
}

/// Balanced `{...}` prefix of `text`, skipping braces inside JSON strings.
fn balanced_span(text: &str) -> Option<&str> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, ch) in text.char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(&text[..offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

impl ToolCall {
    pub fn name(&self) -> &'static str {
        match self {
            ToolCall::Shape => "shape",
            ToolCall::Columns => "columns",
            ToolCall::Head { .. } => "head",
            ToolCall::Tail { .. } => "tail",
            ToolCall::Describe { .. } => "describe",
            ToolCall::ValueCounts { .. } => "value_counts",
            ToolCall::Unique { .. } => "unique",
            ToolCall::MissingValues => "missing_values",
            ToolCall::Correlation { .. } => "correlation",
            ToolCall::FinalAnswer { .. } => "final_answer",
        }
    }

    /// Run a tool against the dataset. Failures become error observations
    /// the model can react to.
    pub fn execute(&self, dataset: &Dataset) -> String {
        let result = match self {
            ToolCall::Shape => {
                let (rows, cols) = dataset.shape();
                Ok(format!("({}, {}): {} rows and {} columns", rows, cols, rows, cols))
            }
            ToolCall::Columns => Ok(dataset
                .columns()
                .iter()
                .map(|c| format!("{}: {}", c.name, c.kind.dtype()))
                .collect::<Vec<_>>()
                .join("\n")),
            ToolCall::Head { n } => Ok(Dataset::render(&dataset.head(clamp_rows(*n)))),
            ToolCall::Tail { n } => Ok(Dataset::render(&dataset.tail(clamp_rows(*n)))),
            ToolCall::Describe { columns } => dataset.describe(columns.as_deref()).map(|rows| {
                if rows.is_empty() {
                    return "No numeric columns to describe".to_string();
                }
                let mut out = String::from("column  count  mean  std  min  25%  50%  75%  max\n");
                for r in rows {
                    out.push_str(&format!(
                        "{}  {}  {:.4}  {:.4}  {}  {}  {}  {}  {}\n",
                        r.column, r.count, r.mean, r.std_dev, r.min, r.q25, r.median, r.q75, r.max
                    ));
                }
                out
            }),
            ToolCall::ValueCounts { column, limit } => dataset
                .value_counts(column, limit.unwrap_or(DEFAULT_COUNTS))
                .map(|counts| {
                    counts
                        .into_iter()
                        .map(|(value, n)| format!("{}: {}", value, n))
                        .collect::<Vec<_>>()
                        .join("\n")
                }),
            ToolCall::Unique { column } => dataset.unique(column).map(|values| {
                let total = values.len();
                let listed: Vec<String> = values.into_iter().take(MAX_UNIQUE_LISTED).collect();
                if total > MAX_UNIQUE_LISTED {
                    format!("{} unique values, first {}: {}", total, MAX_UNIQUE_LISTED, listed.join(", "))
                } else {
                    format!("{} unique values: {}", total, listed.join(", "))
                }
            }),
            ToolCall::MissingValues => Ok(dataset
                .missing_values()
                .into_iter()
                .map(|s| format!("{} ({}): {} missing, {} non-null", s.column, s.dtype, s.missing, s.non_null))
                .collect::<Vec<_>>()
                .join("\n")),
            ToolCall::Correlation { left, right } => dataset
                .correlation(left, right)
                .map(|r| format!("Pearson correlation between {} and {}: {:.4}", left, right, r)),
            ToolCall::FinalAnswer { answer } => Ok(answer.clone()),
        };
        match result {
            Ok(text) => text,
            Err(e) => format!("Error: {}", e),
        }
    }
}

fn clamp_rows(n: Option<usize>) -> usize {
    n.unwrap_or(DEFAULT_ROWS).clamp(1, MAX_ROWS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_fenced_action() {
        let reply = "Let me look.\n```json\n{\"action\": \"head\", \"n\": 3}\n```";
        assert_eq!(parse_turn(reply), ModelTurn::Call(ToolCall::Head { n: Some(3) }));

        let reply = "I will inspect the {units} column first.\n```json\n{\"action\": \"describe\", \"columns\": [\"units\"]}\n```";
        assert_eq!(
            parse_turn(reply),
            ModelTurn::Call(ToolCall::Describe { columns: Some(vec!["units".to_string()]) })
        );

        let reply = "Sample row: {\"units\": 4}. Next: {\"action\": \"shape\"}";
        assert_eq!(parse_turn(reply), ModelTurn::Call(ToolCall::Shape));
    }

    #[test]
    fn test_parse_unit_action_and_braces_in_strings() {
        assert_eq!(parse_turn(r#"{"action":"shape"}"#), ModelTurn::Call(ToolCall::Shape));
        let reply = r#"{"action":"final_answer","answer":"use {braces} freely"}"#;
        assert_eq!(
            parse_turn(reply),
            ModelTurn::Call(ToolCall::FinalAnswer { answer: "use {braces} freely".to_string() })
        );
    }

    #[test]
    fn test_parse_plain_text_and_invalid_action() {
        assert_eq!(
            parse_turn("The dataset has 3 rows."),
            ModelTurn::Text("The dataset has 3 rows.".to_string())
        );
        assert!(matches!(parse_turn(r#"{"action":"plot","column":"x"}"#), ModelTurn::Invalid(_)));
    }

    #[test]
    fn test_execute_reports_errors_as_observations() {
        let ds = Dataset::from_csv_bytes("t.csv", b"a,b\n1,x\n2,y\n").unwrap();
        let out = ToolCall::Unique { column: "missing".to_string() }.execute(&ds);
        assert!(out.starts_with("Error: Column 'missing' not found"));
        assert_eq!(ToolCall::Shape.execute(&ds), "(2, 2): 2 rows and 2 columns");
        assert!(ToolCall::Columns.execute(&ds).contains("b: object"));
    }

    #[test]
    fn test_head_is_clamped() {
        assert_eq!(clamp_rows(Some(0)), 1);
        assert_eq!(clamp_rows(Some(10_000)), MAX_ROWS);
        assert_eq!(clamp_rows(None), DEFAULT_ROWS);
    }
}
