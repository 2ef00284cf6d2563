//! Records read from a flow source, one JSON object per line.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which payload a command observes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Flows,
    AgentEvents,
    DebugEvents,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::Flows => write!(f, "flows"),
            EventKind::AgentEvents => write!(f, "agent events"),
            EventKind::DebugEvents => write!(f, "debug events"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub time: DateTime<Utc>,
    #[serde(default)]
    pub node_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flow: Option<Flow>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_event: Option<AgentEvent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug_event: Option<DebugEvent>,
}

impl Record {
    pub fn kind(&self) -> Option<EventKind> {
        match (&self.flow, &self.agent_event, &self.debug_event) {
            (Some(_), None, None) => Some(EventKind::Flows),
            (None, Some(_), None) => Some(EventKind::AgentEvents),
            (None, None, Some(_)) => Some(EventKind::DebugEvents),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flow {
    pub source: Endpoint,
    pub destination: Endpoint,
    #[serde(default)]
    pub protocol: String,
    #[serde(default)]
    pub verdict: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub summary: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub ip: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod_name: Option<String>,
}

impl Endpoint {
    /// `namespace/pod` when the endpoint belongs to a known pod.
    pub fn pod(&self) -> Option<String> {
        self.pod_name.as_ref().map(|pod| {
            format!(
                "{}/{}",
                self.namespace.as_deref().unwrap_or("default"),
                pod
            )
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebugEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<u32>,
    #[serde(default)]
    pub message: String,
}
