//! Event-group to topic routing
//!
//! Publishers and consumers refer to event categories symbolically. The
//! router turns a category into the concrete topic name for this deployment:
//!
//! ```text
//! {environment}.{resource}.{group}     e.g. "prod.en-0.blockgroup"
//! ```

use std::fmt;
use std::str::FromStr;

use super::error::KafkaError;
use crate::config::KafkaConfig;

/// Symbolic event categories published by the chain-data fetcher
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventGroup {
    /// Blocks with their transactions and receipts
    Block,
    /// Internal call traces
    Trace,
}

impl EventGroup {
    /// Every known group, in declaration order
    pub const ALL: [EventGroup; 2] = [EventGroup::Block, EventGroup::Trace];

    /// Wire name of the group
    pub fn as_str(&self) -> &'static str {
        match self {
            EventGroup::Block => "blockgroup",
            EventGroup::Trace => "tracegroup",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|g| g.as_str() == s)
    }
}

impl fmt::Display for EventGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventGroup {
    type Err = KafkaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| KafkaError::UnknownEventGroup(s.to_string()))
    }
}

/// Maps event groups to concrete topic names
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicRouter {
    environment: String,
    resource: String,
}

impl TopicRouter {
    pub fn new(environment: impl Into<String>, resource: impl Into<String>) -> Self {
        Self {
            environment: environment.into(),
            resource: resource.into(),
        }
    }

    pub fn from_config(config: &KafkaConfig) -> Self {
        Self::new(&config.topic_environment, &config.topic_resource)
    }

    /// Concrete topic of an event group
    pub fn topic_name(&self, group: EventGroup) -> String {
        format!("{}.{}.{}", self.environment, self.resource, group.as_str())
    }

    /// Resolve a symbolic group name, rejecting unknown names
    pub fn resolve(&self, group_name: &str) -> Result<String, KafkaError> {
        let group: EventGroup = group_name.parse()?;
        Ok(self.topic_name(group))
    }
}
