//! Memory item data model
//!
//! Pure data types: no I/O, no persistence. Validation lives here so every
//! store enforces the same rules at its boundary.

use chrono::{DateTime, Utc};
use sdk::errors::EngineError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of fact a memory records. Fixed when the memory is created.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MemoryType {
    Assumption,
    Decision,
    CustomerConvo,
    Evidence,
    Contradiction,
    Lesson,
    Milestone,
}

impl MemoryType {
    pub const ALL: [MemoryType; 7] = [
        MemoryType::Assumption,
        MemoryType::Decision,
        MemoryType::CustomerConvo,
        MemoryType::Evidence,
        MemoryType::Contradiction,
        MemoryType::Lesson,
        MemoryType::Milestone,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryType::Assumption => "ASSUMPTION",
            MemoryType::Decision => "DECISION",
            MemoryType::CustomerConvo => "CUSTOMER_CONVO",
            MemoryType::Evidence => "EVIDENCE",
            MemoryType::Contradiction => "CONTRADICTION",
            MemoryType::Lesson => "LESSON",
            MemoryType::Milestone => "MILESTONE",
        }
    }
}

impl fmt::Display for MemoryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MemoryType {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_uppercase().replace(['-', ' '], "_");
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == normalized)
            .ok_or_else(|| EngineError::Validation(format!("Unknown memory type: {}", s)))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EvidenceQuality {
    None,
    Weak,
    Moderate,
    Strong,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MoneySignal {
    No,
    Maybe,
    Yes,
}

/// Optional qualitative signals attached to a memory
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Signals {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence_quality: Option<EvidenceQuality>,

    /// Confidence in [0, 1]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub money_signal: Option<MoneySignal>,
}

/// Named things a memory is about. Each list behaves as a set.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Entities {
    #[serde(default)]
    pub ideas: Vec<String>,
    #[serde(default)]
    pub customers: Vec<String>,
    #[serde(default)]
    pub artifacts: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Entities {
    /// Trim entries, drop empty ones and remove duplicates keeping first occurrence
    pub fn normalized(mut self) -> Self {
        for list in [
            &mut self.ideas,
            &mut self.customers,
            &mut self.artifacts,
            &mut self.tags,
        ] {
            let mut seen = Vec::with_capacity(list.len());
            for entry in list.drain(..) {
                let entry = entry.trim().to_string();
                if !entry.is_empty() && !seen.contains(&entry) {
                    seen.push(entry);
                }
            }
            *list = seen;
        }
        self
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceKind {
    UserAction,
    SystemRule,
    AgentOutput,
}

/// Where a memory came from
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MemorySource {
    pub kind: SourceKind,

    /// Free-form pointer to the origin, e.g. a workspace path
    #[serde(rename = "ref", default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
}

impl MemorySource {
    pub fn user_action() -> Self {
        Self {
            kind: SourceKind::UserAction,
            reference: None,
        }
    }

    pub fn system_rule(reference: impl Into<String>) -> Self {
        Self {
            kind: SourceKind::SystemRule,
            reference: Some(reference.into()),
        }
    }
}

impl Default for MemorySource {
    fn default() -> Self {
        Self::user_action()
    }
}

/// A durable fact scored for relevance
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MemoryItem {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub memory_type: MemoryType,
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(default)]
    pub entities: Entities,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signals: Option<Signals>,
    pub importance: f64,
    #[serde(default)]
    pub source: MemorySource,
}

pub const DEFAULT_IMPORTANCE: f64 = 0.5;

/// Input for creating a memory
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewMemory {
    #[serde(default)]
    pub memory_type: Option<MemoryType>,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub details: Option<String>,
    #[serde(default)]
    pub entities: Entities,
    #[serde(default)]
    pub signals: Option<Signals>,
    #[serde(default)]
    pub importance: Option<f64>,
    #[serde(default)]
    pub source: Option<MemorySource>,
}

impl NewMemory {
    pub fn new(memory_type: MemoryType, summary: impl Into<String>) -> Self {
        Self {
            memory_type: Some(memory_type),
            summary: summary.into(),
            ..Default::default()
        }
    }

    /// Check required fields and ranges, then build the item
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Validation` when the type is missing, the summary
    /// is blank, or importance/confidence fall outside [0, 1].
    pub fn into_item(self, id: String, now: DateTime<Utc>) -> Result<MemoryItem, EngineError> {
        let memory_type = self
            .memory_type
            .ok_or_else(|| EngineError::Validation("memory_type is required".to_string()))?;

        let summary = validate_summary(&self.summary)?;
        let importance = self.importance.unwrap_or(DEFAULT_IMPORTANCE);
        validate_unit("importance", importance)?;
        if let Some(signals) = &self.signals {
            validate_signals(signals)?;
        }

        Ok(MemoryItem {
            id,
            created_at: now,
            updated_at: now,
            memory_type,
            summary,
            details: non_blank(self.details),
            entities: self.entities.normalized(),
            signals: self.signals,
            importance,
            source: self.source.unwrap_or_default(),
        })
    }
}

/// Partial update of a memory. `id`, `created_at` and `memory_type` are not patchable.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryPatch {
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub details: Option<String>,
    #[serde(default)]
    pub entities: Option<Entities>,
    #[serde(default)]
    pub signals: Option<Signals>,
    #[serde(default)]
    pub importance: Option<f64>,
    #[serde(default)]
    pub source: Option<MemorySource>,
}

impl MemoryItem {
    /// Apply a patch, validating the new values and refreshing `updated_at`
    pub fn apply(&mut self, patch: MemoryPatch, now: DateTime<Utc>) -> Result<(), EngineError> {
        if let Some(importance) = patch.importance {
            validate_unit("importance", importance)?;
        }
        if let Some(signals) = &patch.signals {
            validate_signals(signals)?;
        }
        let summary = patch.summary.as_deref().map(validate_summary).transpose()?;

        if let Some(summary) = summary {
            self.summary = summary;
        }
        if let Some(details) = patch.details {
            self.details = non_blank(Some(details));
        }
        if let Some(entities) = patch.entities {
            self.entities = entities.normalized();
        }
        if let Some(signals) = patch.signals {
            self.signals = Some(signals);
        }
        if let Some(importance) = patch.importance {
            self.importance = importance;
        }
        if let Some(source) = patch.source {
            self.source = source;
        }
        self.updated_at = now;

        Ok(())
    }
}

fn validate_summary(summary: &str) -> Result<String, EngineError> {
    let trimmed = summary.trim();
    if trimmed.is_empty() {
        return Err(EngineError::Validation("summary is required".to_string()));
    }
    Ok(trimmed.to_string())
}

fn validate_unit(field: &str, value: f64) -> Result<(), EngineError> {
    if !(0.0..=1.0).contains(&value) {
        return Err(EngineError::Validation(format!(
            "{} must be between 0 and 1, got {}",
            field, value
        )));
    }
    Ok(())
}

fn validate_signals(signals: &Signals) -> Result<(), EngineError> {
    match signals.confidence {
        Some(confidence) => validate_unit("confidence", confidence),
        None => Ok(()),
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_type_parsing() {
        assert_eq!("decision".parse::<MemoryType>().unwrap(), MemoryType::Decision);
        assert_eq!(
            "customer-convo".parse::<MemoryType>().unwrap(),
            MemoryType::CustomerConvo
        );
        assert!("opinion".parse::<MemoryType>().is_err());
    }

    #[test]
    fn test_memory_type_serializes_screaming_case() {
        let json = serde_json::to_string(&MemoryType::CustomerConvo).unwrap();
        assert_eq!(json, "\"CUSTOMER_CONVO\"");
    }

    #[test]
    fn test_new_memory_defaults() {
        let now = Utc::now();
        let item = NewMemory::new(MemoryType::Lesson, "  Ship smaller  ")
            .into_item("id-1".to_string(), now)
            .unwrap();

        assert_eq!(item.summary, "Ship smaller");
        assert_eq!(item.importance, DEFAULT_IMPORTANCE);
        assert_eq!(item.source.kind, SourceKind::UserAction);
        assert_eq!(item.created_at, item.updated_at);
    }

    #[test]
    fn test_new_memory_requires_type_and_summary() {
        let now = Utc::now();
        let missing_type = NewMemory {
            summary: "x".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            missing_type.into_item("a".to_string(), now),
            Err(EngineError::Validation(_))
        ));

        let blank = NewMemory::new(MemoryType::Decision, "   ");
        assert!(matches!(
            blank.into_item("b".to_string(), now),
            Err(EngineError::Validation(_))
        ));
    }

    #[test]
    fn test_out_of_range_values_rejected() {
        let now = Utc::now();
        let mut input = NewMemory::new(MemoryType::Evidence, "Survey");
        input.importance = Some(1.5);
        assert!(input.into_item("a".to_string(), now).is_err());

        let mut input = NewMemory::new(MemoryType::Evidence, "Survey");
        input.signals = Some(Signals {
            confidence: Some(-0.1),
            ..Default::default()
        });
        assert!(input.into_item("b".to_string(), now).is_err());
    }

    #[test]
    fn test_entities_deduplicated() {
        let entities = Entities {
            ideas: vec!["widget".into(), " widget ".into(), "".into(), "gadget".into()],
            ..Default::default()
        }
        .normalized();
        assert_eq!(entities.ideas, vec!["widget", "gadget"]);
    }

    #[test]
    fn test_patch_keeps_identity() {
        let created = Utc::now() - chrono::Duration::days(3);
        let mut item = NewMemory::new(MemoryType::Decision, "Use Postgres")
            .into_item("id-1".to_string(), created)
            .unwrap();

        let now = Utc::now();
        item.apply(
            MemoryPatch {
                summary: Some("Use SQLite".to_string()),
                importance: Some(0.9),
                ..Default::default()
            },
            now,
        )
        .unwrap();

        assert_eq!(item.id, "id-1");
        assert_eq!(item.created_at, created);
        assert_eq!(item.memory_type, MemoryType::Decision);
        assert_eq!(item.summary, "Use SQLite");
        assert_eq!(item.updated_at, now);
    }

    #[test]
    fn test_invalid_patch_leaves_item_untouched() {
        let now = Utc::now();
        let mut item = NewMemory::new(MemoryType::Decision, "Keep")
            .into_item("id".to_string(), now)
            .unwrap();
        let before = item.clone();

        let result = item.apply(
            MemoryPatch {
                summary: Some("Changed".to_string()),
                importance: Some(2.0),
                ..Default::default()
            },
            Utc::now(),
        );

        assert!(result.is_err());
        assert_eq!(item, before);
    }
}
