//! Data models for the analysis pipeline.
//!
//! This module contains the request/response types, the per-request data
//! context gathered from the business sources, and the widget schema the
//! presentation layer consumes.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::warn;

/// One backend data collection queried by the aggregator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Leads,
    Partners,
    Products,
    Orders,
}

impl SourceKind {
    /// All sources, in the order they appear in the prompt.
    pub const ALL: [SourceKind; 4] = [
        SourceKind::Leads,
        SourceKind::Partners,
        SourceKind::Products,
        SourceKind::Orders,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            SourceKind::Leads => "leads",
            SourceKind::Partners => "partners",
            SourceKind::Products => "products",
            SourceKind::Orders => "orders",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The actor on whose behalf data is fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Identity {
    #[default]
    Anonymous,
    User(i64),
}

impl Identity {
    /// Numeric id passed to the sources. Anonymous requests scope as 0.
    pub fn scope_id(&self) -> i64 {
        match self {
            Identity::Anonymous => 0,
            Identity::User(id) => *id,
        }
    }

    /// Decode the `user` session cookie (`{"id": 42}`).
    ///
    /// Anything that cannot be decoded degrades to [`Identity::Anonymous`].
    pub fn from_session_cookie(raw: &str) -> Self {
        let Ok(value) = serde_json::from_str::<Value>(raw.trim()) else {
            return Identity::Anonymous;
        };

        match value.get("id") {
            Some(Value::Number(n)) => n
                .as_i64()
                .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
                .map_or(Identity::Anonymous, Identity::User),
            Some(Value::String(s)) => s
                .trim()
                .parse()
                .map_or(Identity::Anonymous, Identity::User),
            _ => Identity::Anonymous,
        }
    }
}

/// A natural-language question scoped to an actor.
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub question: String,
    pub identity: Identity,
}

impl AnalysisRequest {
    pub fn new(question: impl Into<String>, identity: Identity) -> Self {
        Self {
            question: question.into(),
            identity,
        }
    }
}

/// Everything the sources returned for one request.
///
/// Every slot is always a sequence; a failed source leaves its slot empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AnalysisContext {
    pub leads: Vec<Value>,
    pub partners: Vec<Value>,
    pub products: Vec<Value>,
    pub orders: Vec<Value>,
}

impl AnalysisContext {
    pub fn slot(&self, source: SourceKind) -> &[Value] {
        match source {
            SourceKind::Leads => &self.leads,
            SourceKind::Partners => &self.partners,
            SourceKind::Products => &self.products,
            SourceKind::Orders => &self.orders,
        }
    }

    pub fn record_counts(&self) -> RecordCounts {
        RecordCounts {
            leads: self.leads.len(),
            partners: self.partners.len(),
            products: self.products.len(),
            orders: self.orders.len(),
        }
    }
}

/// Number of records each source contributed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordCounts {
    pub leads: usize,
    pub partners: usize,
    pub products: usize,
    pub orders: usize,
}

impl RecordCounts {
    pub fn total(&self) -> usize {
        self.leads + self.partners + self.products + self.orders
    }
}

/// Kind of visualization widget, using the names the dashboard expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WidgetKind {
    #[serde(rename = "explicacao")]
    Explanation,
    #[serde(rename = "card")]
    Card,
    #[serde(rename = "grafico_barras")]
    BarChart,
    #[serde(rename = "grafico_linha")]
    LineChart,
    #[serde(rename = "grafico_area")]
    AreaChart,
    #[serde(rename = "grafico_pizza")]
    PieChart,
    #[serde(rename = "grafico_scatter")]
    ScatterChart,
    #[serde(rename = "grafico_radar")]
    RadarChart,
    #[serde(rename = "tabela")]
    Table,
}

impl WidgetKind {
    pub fn wire_name(&self) -> &'static str {
        match self {
            WidgetKind::Explanation => "explicacao",
            WidgetKind::Card => "card",
            WidgetKind::BarChart => "grafico_barras",
            WidgetKind::LineChart => "grafico_linha",
            WidgetKind::AreaChart => "grafico_area",
            WidgetKind::PieChart => "grafico_pizza",
            WidgetKind::ScatterChart => "grafico_scatter",
            WidgetKind::RadarChart => "grafico_radar",
            WidgetKind::Table => "tabela",
        }
    }
}

impl fmt::Display for WidgetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

impl FromStr for WidgetKind {
    type Err = WidgetRejection;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "explicacao" | "explanation" => Ok(WidgetKind::Explanation),
            "card" => Ok(WidgetKind::Card),
            "grafico_barras" | "bar-chart" => Ok(WidgetKind::BarChart),
            "grafico_linha" | "line-chart" => Ok(WidgetKind::LineChart),
            "grafico_area" | "area-chart" => Ok(WidgetKind::AreaChart),
            "grafico_pizza" | "pie-chart" => Ok(WidgetKind::PieChart),
            "grafico_scatter" | "scatter-chart" => Ok(WidgetKind::ScatterChart),
            "grafico_radar" | "radar-chart" => Ok(WidgetKind::RadarChart),
            "tabela" | "table" => Ok(WidgetKind::Table),
            other => Err(WidgetRejection::UnknownKind(other.to_string())),
        }
    }
}

/// Why a widget emitted by the model was not accepted.
#[derive(Debug, Error)]
pub enum WidgetRejection {
    #[error("unknown widget kind '{0}'")]
    UnknownKind(String),

    #[error("payload does not match kind '{kind}': {source}")]
    Payload {
        kind: WidgetKind,
        #[source]
        source: serde_json::Error,
    },

    #[error("{labels} labels but {values} values")]
    LengthMismatch { labels: usize, values: usize },

    #[error("radar value {0} outside [0, 100]")]
    OutOfRange(f64),

    #[error("row {row} has {len} cells but the table has {columns} columns")]
    RaggedRow {
        row: usize,
        len: usize,
        columns: usize,
    },
}

/// One typed unit of visualization output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawWidget")]
pub struct WidgetSpec {
    #[serde(rename = "tipo")]
    pub kind: WidgetKind,
    #[serde(rename = "titulo")]
    pub title: String,
    #[serde(rename = "dados")]
    pub payload: WidgetPayload,
    #[serde(rename = "metadados", skip_serializing_if = "Option::is_none")]
    pub metadata: Option<WidgetMetadata>,
}

#[cfg(test)]
impl WidgetSpec {
    pub fn explanation(title: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            kind: WidgetKind::Explanation,
            title: title.into(),
            payload: WidgetPayload::Explanation(ExplanationData { text: text.into() }),
            metadata: None,
        }
    }
}

/// A widget as it arrives from the model, before validation.
#[derive(Debug, Clone, Deserialize)]
pub struct RawWidget {
    #[serde(rename = "tipo", alias = "kind")]
    pub kind: String,
    #[serde(rename = "titulo", alias = "title", default, deserialize_with = "lenient_text")]
    pub title: String,
    #[serde(rename = "dados", alias = "payload", default)]
    pub payload: Value,
    /// Hints stay raw here; a bad hint must not cost the widget.
    #[serde(rename = "metadados", alias = "metadata", default)]
    pub metadata: Option<Value>,
}

impl TryFrom<RawWidget> for WidgetSpec {
    type Error = WidgetRejection;

    fn try_from(raw: RawWidget) -> Result<Self, Self::Error> {
        let kind: WidgetKind = raw.kind.parse()?;
        let payload = WidgetPayload::decode(kind, raw.payload)?;
        payload.check(kind)?;

        let metadata = raw.metadata.and_then(|value| match value {
            Value::Null => None,
            value => serde_json::from_value::<WidgetMetadata>(value)
                .map_err(|e| warn!("Ignoring metadata of '{}': {}", raw.title, e))
                .ok(),
        });

        Ok(Self {
            kind,
            title: raw.title,
            payload,
            metadata,
        })
    }
}

/// Kind-specific widget data.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum WidgetPayload {
    Explanation(ExplanationData),
    Card(CardData),
    Series(SeriesData),
    Scatter(ScatterData),
    Table(TableData),
}

impl WidgetPayload {
    fn decode(kind: WidgetKind, value: Value) -> Result<Self, WidgetRejection> {
        let wrap = |source| WidgetRejection::Payload { kind, source };

        let payload = match kind {
            WidgetKind::Explanation => {
                WidgetPayload::Explanation(serde_json::from_value(value).map_err(wrap)?)
            }
            WidgetKind::Card => WidgetPayload::Card(serde_json::from_value(value).map_err(wrap)?),
            WidgetKind::ScatterChart => {
                WidgetPayload::Scatter(serde_json::from_value(value).map_err(wrap)?)
            }
            WidgetKind::Table => WidgetPayload::Table(serde_json::from_value(value).map_err(wrap)?),
            _ => WidgetPayload::Series(serde_json::from_value(value).map_err(wrap)?),
        };

        Ok(payload)
    }

    /// Enforce the structural invariants of each payload shape.
    fn check(&self, kind: WidgetKind) -> Result<(), WidgetRejection> {
        match self {
            WidgetPayload::Series(series) => {
                if series.labels.len() != series.values.len() {
                    return Err(WidgetRejection::LengthMismatch {
                        labels: series.labels.len(),
                        values: series.values.len(),
                    });
                }
                if kind == WidgetKind::RadarChart {
                    if let Some(v) = series.values.iter().find(|v| !(0.0..=100.0).contains(*v)) {
                        return Err(WidgetRejection::OutOfRange(*v));
                    }
                }
                Ok(())
            }
            WidgetPayload::Table(table) => {
                let columns = table.columns.len();
                match table.rows.iter().position(|row| row.len() != columns) {
                    Some(row) => Err(WidgetRejection::RaggedRow {
                        row,
                        len: table.rows[row].len(),
                        columns,
                    }),
                    None => Ok(()),
                }
            }
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExplanationData {
    #[serde(rename = "texto", alias = "text")]
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardData {
    #[serde(rename = "valor", alias = "value", deserialize_with = "text_or_number")]
    pub value: String,
    #[serde(
        rename = "variacao",
        alias = "delta",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub delta: Option<String>,
    #[serde(
        rename = "subtitulo",
        alias = "caption",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub caption: Option<String>,
}

/// Parallel label/value arrays shared by bar, line, area, pie and radar charts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesData {
    #[serde(deserialize_with = "text_labels")]
    pub labels: Vec<String>,
    pub values: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScatterPoint {
    pub x: f64,
    pub y: f64,
    #[serde(rename = "nome", alias = "name", default)]
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScatterData {
    #[serde(rename = "pontos", alias = "points")]
    pub points: Vec<ScatterPoint>,
    #[serde(rename = "labelX", default)]
    pub label_x: String,
    #[serde(rename = "labelY", default)]
    pub label_y: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableData {
    #[serde(rename = "colunas", alias = "columns", deserialize_with = "text_labels")]
    pub columns: Vec<String>,
    #[serde(rename = "linhas", alias = "rows")]
    pub rows: Vec<Vec<Value>>,
}

/// Rendering hints attached to a widget.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WidgetMetadata {
    /// Values are amounts of money (rendered as R$).
    #[serde(rename = "formatoMonetario", default, deserialize_with = "lenient_flag")]
    pub currency: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The uniform response shape: widgets on success, an error and no widgets otherwise.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub widgets: Vec<WidgetSpec>,
}

impl AnalysisResult {
    pub fn success(widgets: Vec<WidgetSpec>) -> Self {
        Self {
            error: None,
            widgets,
        }
    }

    pub fn degraded(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            widgets: Vec::new(),
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.error.is_some()
    }
}

fn scalar_to_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Models sometimes emit card values as bare numbers.
fn text_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    scalar_to_text(&value)
        .ok_or_else(|| serde::de::Error::custom("expected a string or number"))
}

/// Titles are cosmetic: null or structured values become empty text.
fn lenient_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(scalar_to_text(&value).unwrap_or_default())
}

/// Accepts `true`, `"true"` and friends.
fn lenient_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Bool(b) => b,
        Value::String(s) => matches!(s.trim().to_ascii_lowercase().as_str(), "true" | "sim" | "1"),
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        _ => false,
    })
}

/// Labels such as years often arrive as numbers.
fn text_labels<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let values = Vec::<Value>::deserialize(deserializer)?;
    values
        .iter()
        .map(|v| scalar_to_text(v).ok_or_else(|| serde::de::Error::custom("label must be text")))
        .collect()
}
