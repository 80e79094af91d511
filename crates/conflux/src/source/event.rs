//! Events emitted by sources
//!
//! Every capability fires a before/after/fail triad; `transform` fires once
//! per newly logged transform.

use conflux_core::{
    Capabilities, Capability, ConfluxError, Event, LogLevel, PayloadKind, Query, Transform,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// An event together with its arguments
#[derive(Debug, Clone)]
pub enum SourceEvent {
    /// A transform was appended to the source's log
    Transform(Transform),

    BeforePush(Transform),
    Push(Transform, Vec<Transform>),
    PushFail(Transform, ConfluxError),

    BeforePull(Query),
    Pull(Query, Vec<Transform>),
    PullFail(Query, ConfluxError),

    BeforeUpdate(Transform),
    Update(Transform, Value),
    UpdateFail(Transform, ConfluxError),

    BeforeQuery(Query),
    Query(Query, Value),
    QueryFail(Query, ConfluxError),

    BeforeSync(Transform),
    Sync(Transform),
    SyncFail(Transform, ConfluxError),
}

impl SourceEvent {
    /// Transform carried as the first argument, if any
    pub fn transform(&self) -> Option<&Transform> {
        match self {
            SourceEvent::Transform(t)
            | SourceEvent::BeforePush(t)
            | SourceEvent::Push(t, _)
            | SourceEvent::PushFail(t, _)
            | SourceEvent::BeforeUpdate(t)
            | SourceEvent::Update(t, _)
            | SourceEvent::UpdateFail(t, _)
            | SourceEvent::BeforeSync(t)
            | SourceEvent::Sync(t)
            | SourceEvent::SyncFail(t, _) => Some(t),
            _ => None,
        }
    }

    /// Query carried as the first argument, if any
    pub fn query(&self) -> Option<&Query> {
        match self {
            SourceEvent::BeforePull(q)
            | SourceEvent::Pull(q, _)
            | SourceEvent::PullFail(q, _)
            | SourceEvent::BeforeQuery(q)
            | SourceEvent::Query(q, _)
            | SourceEvent::QueryFail(q, _) => Some(q),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&ConfluxError> {
        match self {
            SourceEvent::PushFail(_, e)
            | SourceEvent::PullFail(_, e)
            | SourceEvent::UpdateFail(_, e)
            | SourceEvent::QueryFail(_, e)
            | SourceEvent::SyncFail(_, e) => Some(e),
            _ => None,
        }
    }

    /// Arguments as JSON, in the order listeners receive them
    pub fn args(&self) -> Vec<Value> {
        fn json<T: Serialize>(value: &T) -> Value {
            serde_json::to_value(value).unwrap_or(Value::Null)
        }
        fn error(e: &ConfluxError) -> Value {
            Value::String(e.to_string())
        }

        match self {
            SourceEvent::Transform(t)
            | SourceEvent::BeforePush(t)
            | SourceEvent::BeforeUpdate(t)
            | SourceEvent::BeforeSync(t)
            | SourceEvent::Sync(t) => vec![json(t)],
            SourceEvent::Push(t, result) => vec![json(t), json(result)],
            SourceEvent::Update(t, data) => vec![json(t), data.clone()],
            SourceEvent::BeforePull(q) | SourceEvent::BeforeQuery(q) => vec![json(q)],
            SourceEvent::Pull(q, result) => vec![json(q), json(result)],
            SourceEvent::Query(q, data) => vec![json(q), data.clone()],
            SourceEvent::PushFail(t, e)
            | SourceEvent::UpdateFail(t, e)
            | SourceEvent::SyncFail(t, e) => vec![json(t), error(e)],
            SourceEvent::PullFail(q, e) | SourceEvent::QueryFail(q, e) => vec![json(q), error(e)],
        }
    }
}

impl Event for SourceEvent {
    type Kind = EventKind;

    fn kind(&self) -> EventKind {
        match self {
            SourceEvent::Transform(_) => EventKind::Transform,
            SourceEvent::BeforePush(_) => EventKind::BeforePush,
            SourceEvent::Push(..) => EventKind::Push,
            SourceEvent::PushFail(..) => EventKind::PushFail,
            SourceEvent::BeforePull(_) => EventKind::BeforePull,
            SourceEvent::Pull(..) => EventKind::Pull,
            SourceEvent::PullFail(..) => EventKind::PullFail,
            SourceEvent::BeforeUpdate(_) => EventKind::BeforeUpdate,
            SourceEvent::Update(..) => EventKind::Update,
            SourceEvent::UpdateFail(..) => EventKind::UpdateFail,
            SourceEvent::BeforeQuery(_) => EventKind::BeforeQuery,
            SourceEvent::Query(..) => EventKind::Query,
            SourceEvent::QueryFail(..) => EventKind::QueryFail,
            SourceEvent::BeforeSync(_) => EventKind::BeforeSync,
            SourceEvent::Sync(_) => EventKind::Sync,
            SourceEvent::SyncFail(..) => EventKind::SyncFail,
        }
    }
}

/// Name of a source event, used to register listeners
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EventKind {
    Transform,
    BeforePush,
    Push,
    PushFail,
    BeforePull,
    Pull,
    PullFail,
    BeforeUpdate,
    Update,
    UpdateFail,
    BeforeQuery,
    Query,
    QueryFail,
    BeforeSync,
    Sync,
    SyncFail,
}

impl EventKind {
    pub const ALL: [EventKind; 16] = [
        EventKind::Transform,
        EventKind::BeforePush,
        EventKind::Push,
        EventKind::PushFail,
        EventKind::BeforePull,
        EventKind::Pull,
        EventKind::PullFail,
        EventKind::BeforeUpdate,
        EventKind::Update,
        EventKind::UpdateFail,
        EventKind::BeforeQuery,
        EventKind::Query,
        EventKind::QueryFail,
        EventKind::BeforeSync,
        EventKind::Sync,
        EventKind::SyncFail,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Transform => "transform",
            EventKind::BeforePush => "beforePush",
            EventKind::Push => "push",
            EventKind::PushFail => "pushFail",
            EventKind::BeforePull => "beforePull",
            EventKind::Pull => "pull",
            EventKind::PullFail => "pullFail",
            EventKind::BeforeUpdate => "beforeUpdate",
            EventKind::Update => "update",
            EventKind::UpdateFail => "updateFail",
            EventKind::BeforeQuery => "beforeQuery",
            EventKind::Query => "query",
            EventKind::QueryFail => "queryFail",
            EventKind::BeforeSync => "beforeSync",
            EventKind::Sync => "sync",
            EventKind::SyncFail => "syncFail",
        }
    }

    /// The before/after/fail triad of a capability
    pub fn for_capability(capability: Capability) -> [EventKind; 3] {
        match capability {
            Capability::Push => [EventKind::BeforePush, EventKind::Push, EventKind::PushFail],
            Capability::Pull => [EventKind::BeforePull, EventKind::Pull, EventKind::PullFail],
            Capability::Update => [
                EventKind::BeforeUpdate,
                EventKind::Update,
                EventKind::UpdateFail,
            ],
            Capability::Query => [
                EventKind::BeforeQuery,
                EventKind::Query,
                EventKind::QueryFail,
            ],
            Capability::Sync => [EventKind::BeforeSync, EventKind::Sync, EventKind::SyncFail],
        }
    }

    /// Capability whose triad this event belongs to
    pub fn capability(&self) -> Option<Capability> {
        Capability::ALL
            .into_iter()
            .find(|c| EventKind::for_capability(*c).contains(self))
    }

    /// Kind of the event's first argument
    pub fn payload(&self) -> PayloadKind {
        match self.capability() {
            Some(capability) => capability.payload(),
            None => PayloadKind::Transform,
        }
    }

    pub fn is_fail(&self) -> bool {
        matches!(
            self,
            EventKind::PushFail
                | EventKind::PullFail
                | EventKind::UpdateFail
                | EventKind::QueryFail
                | EventKind::SyncFail
        )
    }

    pub fn is_before(&self) -> bool {
        matches!(
            self,
            EventKind::BeforePush
                | EventKind::BeforePull
                | EventKind::BeforeUpdate
                | EventKind::BeforeQuery
                | EventKind::BeforeSync
        )
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = ConfluxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| ConfluxError::config(format!("Unknown event '{}'", s)))
    }
}

/// A group of events a source exposes: the bare `transform` event, or one
/// capability's triad
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Interface {
    Transformable,
    Pullable,
    Pushable,
    Queryable,
    Syncable,
    Updatable,
}

impl Interface {
    pub fn capability(&self) -> Option<Capability> {
        match self {
            Interface::Transformable => None,
            Interface::Pullable => Some(Capability::Pull),
            Interface::Pushable => Some(Capability::Push),
            Interface::Queryable => Some(Capability::Query),
            Interface::Syncable => Some(Capability::Sync),
            Interface::Updatable => Some(Capability::Update),
        }
    }

    pub fn from_capability(capability: Capability) -> Self {
        match capability {
            Capability::Pull => Interface::Pullable,
            Capability::Push => Interface::Pushable,
            Capability::Query => Interface::Queryable,
            Capability::Sync => Interface::Syncable,
            Capability::Update => Interface::Updatable,
        }
    }

    /// Interfaces implied by a capability set; every source is transformable
    pub fn for_capabilities(capabilities: &Capabilities) -> Vec<Interface> {
        std::iter::once(Interface::Transformable)
            .chain(capabilities.iter().map(Interface::from_capability))
            .collect()
    }

    /// Events worth watching at `level`.
    ///
    /// `info` watches everything; lower levels other than `none` only watch
    /// failures.
    pub fn events(&self, level: LogLevel) -> Vec<EventKind> {
        match (self.capability(), level) {
            (_, LogLevel::None) => Vec::new(),
            (None, LogLevel::Info) => vec![EventKind::Transform],
            (None, _) => Vec::new(),
            (Some(capability), LogLevel::Info) => EventKind::for_capability(capability).to_vec(),
            (Some(capability), _) => EventKind::for_capability(capability)
                .into_iter()
                .filter(EventKind::is_fail)
                .collect(),
        }
    }
}

impl FromStr for Interface {
    type Err = ConfluxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "transformable" => Ok(Interface::Transformable),
            "pullable" => Ok(Interface::Pullable),
            "pushable" => Ok(Interface::Pushable),
            "queryable" => Ok(Interface::Queryable),
            "syncable" => Ok(Interface::Syncable),
            "updatable" => Ok(Interface::Updatable),
            other => Err(ConfluxError::config(format!("Unknown interface '{}'", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_names() {
        assert_eq!(EventKind::BeforePush.to_string(), "beforePush");
        assert_eq!("syncFail".parse::<EventKind>().unwrap(), EventKind::SyncFail);
        assert!("__push__".parse::<EventKind>().unwrap_err().is_config());
        assert_eq!(
            serde_json::to_string(&EventKind::QueryFail).unwrap(),
            "\"queryFail\""
        );
    }

    #[test]
    fn test_payload_kinds() {
        assert_eq!(EventKind::Transform.payload(), PayloadKind::Transform);
        assert_eq!(EventKind::BeforePull.payload(), PayloadKind::Query);
        assert_eq!(EventKind::UpdateFail.payload(), PayloadKind::Transform);
        assert_eq!(EventKind::Transform.capability(), None);
    }

    #[test]
    fn test_interface_levels() {
        assert_eq!(
            Interface::Pushable.events(LogLevel::Info),
            vec![EventKind::BeforePush, EventKind::Push, EventKind::PushFail]
        );
        assert_eq!(
            Interface::Pushable.events(LogLevel::Errors),
            vec![EventKind::PushFail]
        );
        assert_eq!(
            Interface::Transformable.events(LogLevel::Info),
            vec![EventKind::Transform]
        );
        assert!(Interface::Transformable.events(LogLevel::Warnings).is_empty());
        assert!(Interface::Syncable.events(LogLevel::None).is_empty());
    }

    #[test]
    fn test_interfaces_from_capabilities() {
        let caps = Capabilities::none()
            .with(Capability::Push)
            .with(Capability::Sync);
        assert_eq!(
            Interface::for_capabilities(&caps),
            vec![
                Interface::Transformable,
                Interface::Pushable,
                Interface::Syncable
            ]
        );
    }

    #[test]
    fn test_args() {
        let t = Transform::new("t1", vec![]);
        let event = SourceEvent::PushFail(t, ConfluxError::operation("boom"));
        let args = event.args();
        assert_eq!(args.len(), 2);
        assert_eq!(args[0]["id"], "t1");
        assert_eq!(args[1], "Operation failed: boom");
        assert_eq!(event.kind(), EventKind::PushFail);
    }
}
