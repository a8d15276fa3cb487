//! Core data types for the restomod configurator
//!
//! These types are shared between the daemon and the CLI.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// What the user is asking about: a whole vehicle, or a part with an
/// optional companion vehicle.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Subject {
    Vehicle {
        model: String,
    },
    Part {
        part: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        model: Option<String>,
    },
}

impl Subject {
    /// Wire name of the subject type (`vehicle` or `part`).
    pub fn subject_type(&self) -> &'static str {
        match self {
            Subject::Vehicle { .. } => "vehicle",
            Subject::Part { .. } => "part",
        }
    }

    /// The vehicle model, if the subject carries one.
    pub fn vehicle_model(&self) -> Option<&str> {
        match self {
            Subject::Vehicle { model } => Some(model),
            Subject::Part { model, .. } => model.as_deref(),
        }
    }

    /// The part name, if this is a part subject.
    pub fn part_name(&self) -> Option<&str> {
        match self {
            Subject::Vehicle { .. } => None,
            Subject::Part { part, .. } => Some(part),
        }
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Subject::Vehicle { model } => write!(f, "{}", model),
            Subject::Part { part, model: Some(model) } => write!(f, "{} for {}", part, model),
            Subject::Part { part, model: None } => write!(f, "{}", part),
        }
    }
}

/// Normalized research request; doubles as the cache key.
///
/// Values are trimmed but keep their case, so `"1967 Ford Mustang"` and
/// `"1967 ford mustang"` are distinct keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ResearchQuery {
    subject: Subject,
}

impl ResearchQuery {
    /// Normalize a subject into a query.
    ///
    /// # Errors
    /// Returns `Error::NoSubjectSelected` if the vehicle model or part name
    /// is blank.
    pub fn new(subject: Subject) -> Result<Self> {
        let subject = match subject {
            Subject::Vehicle { model } => Subject::Vehicle {
                model: non_blank(&model).ok_or(Error::NoSubjectSelected)?,
            },
            Subject::Part { part, model } => Subject::Part {
                part: non_blank(&part).ok_or(Error::NoSubjectSelected)?,
                model: model.as_deref().and_then(non_blank),
            },
        };
        Ok(Self { subject })
    }

    pub fn vehicle(model: &str) -> Result<Self> {
        Self::new(Subject::Vehicle {
            model: model.to_string(),
        })
    }

    pub fn part(part: &str, model: Option<&str>) -> Result<Self> {
        Self::new(Subject::Part {
            part: part.to_string(),
            model: model.map(str::to_string),
        })
    }

    pub fn subject(&self) -> &Subject {
        &self.subject
    }

    /// Flat key used in logs, e.g. `part:Brakes:general`.
    pub fn cache_key(&self) -> String {
        match &self.subject {
            Subject::Vehicle { model } => format!("vehicle:{}", model),
            Subject::Part { part, model } => {
                format!("part:{}:{}", part, model.as_deref().unwrap_or("general"))
            }
        }
    }
}

impl fmt::Display for ResearchQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.subject.fmt(f)
    }
}

fn non_blank(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Research payload handed to the presentation layer.
///
/// Only a successful fetch produces one. Every field except `overview` is
/// optional and omitted from JSON when absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResearchResult {
    pub overview: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub market_trends: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_range: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub specifications: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub common_upgrades: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restomod_options: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommended_parts: Option<Vec<String>>,
    /// Part subjects only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compatibility: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub factors_affecting_value: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_moments: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notable_examples: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub investment_potential: Option<String>,
    /// Image embedded by the research endpoint, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

impl ResearchResult {
    pub fn with_overview(overview: impl Into<String>) -> Self {
        Self {
            overview: overview.into(),
            ..Self::default()
        }
    }
}

/// Rendering style requested from the image generator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageStyle {
    #[default]
    Realistic,
    Vintage,
    Blueprint,
    Modern,
}

impl ImageStyle {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageStyle::Realistic => "realistic",
            ImageStyle::Vintage => "vintage",
            ImageStyle::Blueprint => "blueprint",
            ImageStyle::Modern => "modern",
        }
    }
}

impl FromStr for ImageStyle {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "realistic" => Ok(ImageStyle::Realistic),
            "vintage" => Ok(ImageStyle::Vintage),
            "blueprint" => Ok(ImageStyle::Blueprint),
            "modern" => Ok(ImageStyle::Modern),
            other => Err(Error::Other(format!("Unknown image style: {}", other))),
        }
    }
}

/// Configurator status, bound directly by the presentation layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResearchStatus {
    #[default]
    Idle,
    Loading,
    Success,
    Error,
}

impl ResearchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResearchStatus::Idle => "idle",
            ResearchStatus::Loading => "loading",
            ResearchStatus::Success => "success",
            ResearchStatus::Error => "error",
        }
    }

    /// True for `Success` and `Error`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ResearchStatus::Success | ResearchStatus::Error)
    }
}

/// Render-ready view of a configurator session.
///
/// # Fields
/// - `seq`: Sequence number of the selection this snapshot belongs to.
/// - `subject`: Currently selected subject, if any.
/// - `status`: Idle, loading, success or error.
/// - `data`: Research payload, present only on success.
/// - `error`: Human-readable error message, present only on error.
/// - `image_url`: Image shown for the subject; set in both terminal states.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfiguratorSnapshot {
    pub seq: u64,
    pub subject: Option<Subject>,
    pub status: ResearchStatus,
    pub data: Option<ResearchResult>,
    pub error: Option<String>,
    pub image_url: Option<String>,
}

/// IPC message between CLI and daemon.
///
/// Messages are serialized to JSON and sent over the Unix socket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum IpcMessage {
    /// Health check
    Ping,

    /// Shutdown daemon
    Shutdown,

    /// Select a subject in a configurator session and wait for it to settle
    Select {
        session: String,
        subject: Subject,
        /// Image style; the daemon's configured default when absent
        #[serde(default, skip_serializing_if = "Option::is_none")]
        style: Option<ImageStyle>,
    },

    /// Re-fetch the current subject of a session, bypassing the cache
    Regenerate { session: String },

    /// Current snapshot of a session
    Status { session: String },

    /// Return a session to idle
    Reset { session: String },

    /// Drop one cached research entry
    Invalidate { subject: Subject },

    /// Drop every cached research entry
    ClearCache,

    /// Resolve a fallback image without any network I/O
    FallbackImage { subject: Subject },
}

/// Response from daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum IpcResponse {
    Ok,
    Error(String),
    Pong {
        uptime_secs: u64,
        cached_entries: u64,
    },
    Configurator(ConfiguratorSnapshot),
    Image {
        url: String,
    },
}
