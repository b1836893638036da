// SYNOID Agent Protocol
// Copyright (c) 2026 Xing_The_Creator | SYNOID
//
// The contract with the upstream editing agent. The agent is asked for a
// JSON object with `segments`, `events`, `edits`, `steps` and a
// `final_answer`; models routinely wrap it in prose or code fences, write
// numbers as strings, or only describe edits as tool calls in their steps.
// Everything here is lenient: a bad entry is skipped, never fatal.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::timeline::analysis::MediaFeatures;
use crate::timeline::models::{
    EditOperation, FadeDirection, Segment, SegmentTags, TextPosition, Transform,
    DEFAULT_BGM_VOLUME,
};

const DEFAULT_SEGMENT_ENERGY: f64 = 0.5;
const DEFAULT_SLOW_RATE: f64 = 0.5;

/// What the agent is told about the media it is editing
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RequestContext {
    pub duration_seconds: f64,
    pub existing_segments: Vec<Segment>,
}

impl RequestContext {
    pub fn new(duration_seconds: f64, existing_segments: Vec<Segment>) -> Self {
        Self {
            duration_seconds,
            existing_segments,
        }
    }

    /// Parse the agent's reply to this request. A reply that only carries
    /// edits keeps the segments the agent was given.
    pub fn parse_response(&self, text: &str) -> Option<AgentAnalysis> {
        let mut analysis = parse_agent_response(text, self.duration_seconds)?;
        if analysis.features.segments.is_empty() && !self.existing_segments.is_empty() {
            debug!(
                "[AGENT] Reply has no segments, keeping {} existing",
                self.existing_segments.len()
            );
            let duration = if self.duration_seconds > 0.0 {
                self.duration_seconds
            } else {
                self.existing_segments
                    .iter()
                    .map(|s| s.end)
                    .fold(analysis.media_duration(), f64::max)
            };
            analysis.features = MediaFeatures::from_segments(duration, self.existing_segments.clone());
        }
        Some(analysis)
    }
}

/// One Thought / Action / Observation round
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentStep {
    pub thought: String,
    pub action: String,
    pub observation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentEvent {
    pub label: String,
    pub start: f64,
    pub end: f64,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentAnalysis {
    #[serde(flatten)]
    pub features: MediaFeatures,
    pub events: Vec<AgentEvent>,
    pub edits: Vec<EditOperation>,
    pub summary: Option<String>,
    pub steps: Vec<AgentStep>,
}

impl AgentAnalysis {
    pub fn media_duration(&self) -> f64 {
        self.features.duration
    }
}

/// Strip code fences and parse the outermost `{...}` in the text.
pub fn extract_json_object(text: &str) -> Option<Value> {
    let cleaned = text.replace("```json", "").replace("```JSON", "").replace("```", "");
    let first = cleaned.find('{')?;
    let last = cleaned.rfind('}')?;
    if last <= first {
        return None;
    }
    serde_json::from_str(&cleaned[first..=last]).ok()
}

/// A number, or a string holding one
fn number(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    parsed.filter(|n| n.is_finite())
}

fn field(value: &Value, key: &str) -> Option<f64> {
    value.get(key).and_then(number)
}

fn text_field<'v>(value: &'v Value, keys: &[&str]) -> Option<&'v str> {
    keys.iter().find_map(|key| value.get(*key).and_then(Value::as_str))
}

fn parse_direction(value: &str) -> Option<FadeDirection> {
    match value.trim().to_lowercase().as_str() {
        "in" | "fade_in" | "fadein" => Some(FadeDirection::In),
        "out" | "fade_out" | "fadeout" => Some(FadeDirection::Out),
        _ => None,
    }
}

/// Read one edit object. `None` (with a warning) for anything unusable.
pub fn edit_from_value(value: &Value) -> Option<EditOperation> {
    let kind = value.get("type").and_then(Value::as_str)?.trim().to_lowercase();
    let start = field(value, "start");
    let end = field(value, "end");
    let range = || Some((start?, end?));

    let edit = match kind.as_str() {
        "split" => {
            let start = start?;
            EditOperation::Split {
                start,
                end: end.unwrap_or(start),
            }
        }
        "speed" | "slow" => {
            let (start, end) = range()?;
            let fallback = if kind == "slow" { DEFAULT_SLOW_RATE } else { 1.0 };
            let rate = field(value, "rate")
                .or_else(|| field(value, "speed"))
                .unwrap_or(fallback);
            EditOperation::Speed { start, end, rate }
        }
        "delete" => {
            let (start, end) = range()?;
            EditOperation::Delete { start, end }
        }
        "text" => {
            let (start, end) = range()?;
            let text = text_field(value, &["text", "content"])?.to_string();
            let position = text_field(value, &["position"])
                .and_then(TextPosition::parse)
                .unwrap_or_default();
            EditOperation::Text {
                start,
                end,
                text,
                position,
            }
        }
        "fade" => {
            let (start, end) = range()?;
            let direction = text_field(value, &["direction"]).and_then(parse_direction)?;
            EditOperation::Fade {
                start,
                end,
                direction,
            }
        }
        "volume" => {
            let (start, end) = range()?;
            EditOperation::Volume {
                start,
                end,
                volume: field(value, "volume").unwrap_or(1.0),
            }
        }
        "transform" => {
            let (start, end) = range()?;
            let transform = value
                .get("transform")
                .cloned()
                .map(serde_json::from_value::<Transform>)
                .transpose()
                .ok()?
                .unwrap_or_default();
            EditOperation::Transform {
                start,
                end,
                transform,
            }
        }
        "bgm" => EditOperation::Bgm {
            keywords: text_field(value, &["keywords", "query"])?.to_string(),
            volume: field(value, "volume").unwrap_or(DEFAULT_BGM_VOLUME),
        },
        other => {
            warn!("[AGENT] Skipping edit with unknown type '{}'", other);
            return None;
        }
    };
    Some(edit)
}

/// Split tool-call arguments on commas outside quotes, unquoting each.
fn split_args(args: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;

    for c in args.chars() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), c) => current.push(c),
            (None, '"' | '\'') => quote = Some(c),
            (None, ',') => parts.push(std::mem::take(&mut current).trim().to_string()),
            (None, c) => current.push(c),
        }
    }
    let last = current.trim().to_string();
    if !last.is_empty() || !parts.is_empty() {
        parts.push(last);
    }
    parts
}

/// Read one `tool_name(args)` action from an agent step.
pub fn parse_action_call(action: &str) -> Option<EditOperation> {
    let action = action.trim();
    let action = action.strip_prefix("Action:").unwrap_or(action).trim();
    let open = action.find('(')?;
    let close = action.rfind(')')?;
    if close < open {
        return None;
    }
    let name = action[..open].trim();
    let args = split_args(&action[open + 1..close]);
    let num = |i: usize| args.get(i).and_then(|a| a.parse::<f64>().ok()).filter(|n| n.is_finite());
    let arg = |i: usize| args.get(i).map(String::as_str).filter(|a| !a.is_empty());

    let edit = match name {
        "split_video" => EditOperation::Split {
            start: num(0)?,
            end: num(1).or(num(0))?,
        },
        "adjust_speed" => EditOperation::Speed {
            start: num(0)?,
            end: num(1)?,
            rate: num(2)?,
        },
        "delete_segment" => EditOperation::Delete {
            start: num(0)?,
            end: num(1)?,
        },
        "add_text" => EditOperation::Text {
            start: num(0)?,
            end: num(1)?,
            text: arg(2)?.to_string(),
            position: arg(3).and_then(TextPosition::parse).unwrap_or_default(),
        },
        "fade_in" | "fade_out" => {
            let start = num(0)?;
            let duration = num(1)?;
            EditOperation::Fade {
                start,
                end: start + duration,
                direction: if name == "fade_in" {
                    FadeDirection::In
                } else {
                    FadeDirection::Out
                },
            }
        }
        "add_bgm" => EditOperation::Bgm {
            keywords: arg(0)?.to_string(),
            volume: num(1).unwrap_or(DEFAULT_BGM_VOLUME),
        },
        other => {
            debug!("[AGENT] Action '{}' is not an edit", other);
            return None;
        }
    };
    Some(edit)
}

fn segment_from_value(value: &Value) -> Option<Segment> {
    let start = field(value, "start")?;
    let end = field(value, "end")?;
    // Zero energy reads as "not provided"
    let energy = field(value, "energy")
        .filter(|e| *e != 0.0)
        .unwrap_or(DEFAULT_SEGMENT_ENERGY);
    let tags = value
        .get("tags")
        .cloned()
        .and_then(|t| serde_json::from_value::<SegmentTags>(t).ok())
        .unwrap_or_default();
    Some(Segment::new(start, end, energy, tags))
}

fn event_from_value(value: &Value) -> Option<AgentEvent> {
    Some(AgentEvent {
        label: text_field(value, &["label"]).unwrap_or_default().to_string(),
        start: field(value, "start")?,
        end: field(value, "end")?,
        confidence: field(value, "confidence").unwrap_or(1.0),
    })
}

fn step_from_value(value: &Value) -> AgentStep {
    let text = |key: &str| text_field(value, &[key]).unwrap_or_default().to_string();
    AgentStep {
        thought: text("thought"),
        action: text("action"),
        observation: match value.get("observation") {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        },
    }
}

fn array<'v>(payload: &'v Value, key: &str) -> &'v [Value] {
    payload
        .get(key)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

/// Parse a raw agent response for media of `duration` seconds (`<= 0` when
/// unknown). `None` when there is no JSON object, or it holds neither a
/// usable segment nor an edit.
pub fn parse_agent_response(text: &str, duration: f64) -> Option<AgentAnalysis> {
    let Some(payload) = extract_json_object(text) else {
        warn!("[AGENT] No JSON object in agent response");
        return None;
    };

    let segments: Vec<Segment> = array(&payload, "segments")
        .iter()
        .filter_map(segment_from_value)
        .collect();
    let events: Vec<AgentEvent> = array(&payload, "events")
        .iter()
        .filter_map(event_from_value)
        .collect();
    let steps: Vec<AgentStep> = array(&payload, "steps").iter().map(step_from_value).collect();

    let mut edits: Vec<EditOperation> = array(&payload, "edits")
        .iter()
        .filter_map(edit_from_value)
        .collect();
    if edits.is_empty() {
        edits = steps
            .iter()
            .filter_map(|step| parse_action_call(&step.action))
            .collect();
        if !edits.is_empty() {
            debug!("[AGENT] Recovered {} edits from step actions", edits.len());
        }
    }

    if segments.is_empty() && edits.is_empty() {
        warn!("[AGENT] Response has no usable segments or edits");
        return None;
    }

    let media_duration = if duration.is_finite() && duration > 0.0 {
        duration
    } else {
        segments
            .iter()
            .map(|s| s.end)
            .chain(edits.iter().filter_map(|e| e.range().map(|(_, end)| end)))
            .fold(0.0, f64::max)
    };

    let summary = text_field(&payload, &["final_answer", "summary"]).map(str::to_string);
    info!(
        "[AGENT] Parsed {} segments, {} events, {} edits",
        segments.len(),
        events.len(),
        edits.len()
    );

    Some(AgentAnalysis {
        features: MediaFeatures::from_segments(media_duration, segments),
        events,
        edits,
        summary,
        steps,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delete_recovered_from_steps() {
        let text = r#"{
            "steps": [{"thought": "drop the dull part", "action": "delete_segment(10, 20)", "observation": "OK"}],
            "segments": [{"start": 0, "end": 30, "energy": 0.5, "label": "All"}]
        }"#;
        let analysis = parse_agent_response(text, 30.0).unwrap();
        assert_eq!(analysis.edits[0], EditOperation::Delete { start: 10.0, end: 20.0 });
        assert_eq!(analysis.media_duration(), 30.0);
        assert_eq!(analysis.features.segments[0].id, "0.00-30.00");
    }

    #[test]
    fn test_fenced_response_with_prose() {
        let text = "Sure! Here is the plan:\n```json\n{\"edits\":[{\"type\":\"fade\",\"start\":0,\"end\":1.5,\"direction\":\"in\"}],\"final_answer\":\"done\"}\n```";
        let analysis = parse_agent_response(text, 0.0).unwrap();
        assert_eq!(
            analysis.edits,
            vec![EditOperation::Fade { start: 0.0, end: 1.5, direction: FadeDirection::In }]
        );
        assert_eq!(analysis.summary.as_deref(), Some("done"));
        assert_eq!(analysis.media_duration(), 1.5);
    }

    #[test]
    fn test_lenient_edit_fields() {
        let value: Value = serde_json::json!({"type": "Speed", "start": "3.0", "end": 8.75, "rate": "2"});
        assert_eq!(
            edit_from_value(&value),
            Some(EditOperation::Speed { start: 3.0, end: 8.75, rate: 2.0 })
        );

        let slow: Value = serde_json::json!({"type": "slow", "start": 1, "end": 2});
        assert_eq!(
            edit_from_value(&slow),
            Some(EditOperation::Speed { start: 1.0, end: 2.0, rate: 0.5 })
        );

        let split: Value = serde_json::json!({"type": "split", "start": 4});
        assert_eq!(edit_from_value(&split), Some(EditOperation::Split { start: 4.0, end: 4.0 }));

        assert_eq!(edit_from_value(&serde_json::json!({"type": "zoom", "start": 1, "end": 2})), None);
        assert_eq!(edit_from_value(&serde_json::json!({"type": "delete", "start": "abc", "end": 2})), None);
    }

    #[test]
    fn test_action_calls() {
        assert_eq!(
            parse_action_call(r#"add_text(8.0, 15.0, "Best, moment", "top")"#),
            Some(EditOperation::Text {
                start: 8.0,
                end: 15.0,
                text: "Best, moment".into(),
                position: TextPosition::Top,
            })
        );
        assert_eq!(
            parse_action_call("Action: fade_out(28.5, 1.5)"),
            Some(EditOperation::Fade { start: 28.5, end: 30.0, direction: FadeDirection::Out })
        );
        assert_eq!(
            parse_action_call("add_bgm('calm piano ambient')"),
            Some(EditOperation::Bgm { keywords: "calm piano ambient".into(), volume: DEFAULT_BGM_VOLUME })
        );
        assert_eq!(parse_action_call(r#"find_events("eggs being mashed")"#), None);
        assert_eq!(parse_action_call("adjust_speed(3.0, 8.75)"), None);
    }

    #[test]
    fn test_explicit_edits_win_over_steps() {
        let text = r#"{
            "steps": [{"action": "delete_segment(0, 4)"}],
            "edits": [{"type": "split", "start": 3.0, "end": 8.75}, {"type": "teleport"}],
            "events": [{"label": "eggs", "start": 3.0, "end": 8.75, "confidence": 0.9}, {"label": "bad"}]
        }"#;
        let analysis = parse_agent_response(text, 30.0).unwrap();
        assert_eq!(analysis.edits, vec![EditOperation::Split { start: 3.0, end: 8.75 }]);
        assert_eq!(analysis.events.len(), 1);
        assert_eq!(analysis.steps[0].action, "delete_segment(0, 4)");
    }

    #[test]
    fn test_rejects_empty_or_missing_json() {
        assert!(parse_agent_response("I could not analyse this video.", 10.0).is_none());
        assert!(parse_agent_response(r#"{"segments": [{"start": "x"}]}"#, 10.0).is_none());
    }

    #[test]
    fn test_zero_energy_defaults() {
        let analysis =
            parse_agent_response(r#"{"segments":[{"start":0,"end":5,"energy":0}]}"#, 0.0).unwrap();
        assert_eq!(analysis.features.segments[0].energy, 0.5);
        assert_eq!(analysis.features.rhythm_score, 0.5);
    }

    #[test]
    fn test_edit_only_reply_keeps_existing_segments() {
        let existing = vec![
            Segment::new(0.0, 6.0, 0.4, SegmentTags::default()),
            Segment::new(6.0, 12.0, 0.8, SegmentTags::default()),
        ];
        let context = RequestContext::new(0.0, existing.clone());
        let reply = r#"{"edits":[{"type":"delete","start":2,"end":4}]}"#;

        let analysis = context.parse_response(reply).unwrap();
        assert_eq!(analysis.features.segments, existing);
        assert_eq!(analysis.media_duration(), 12.0);
        assert_eq!(analysis.edits, vec![EditOperation::Delete { start: 2.0, end: 4.0 }]);

        let revised = r#"{"segments":[{"start":0,"end":3,"energy":0.9}]}"#;
        let analysis = context.parse_response(revised).unwrap();
        assert_eq!(analysis.features.segments.len(), 1);
        assert!(context.parse_response("no json here").is_none());
    }
}
