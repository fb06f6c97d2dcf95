//! Generic access to status conditions.
//!
//! Many API types declare the same condition shape (type, status, reason,
//! message, timestamps, observed generation) without sharing a type.
//! [`Accessor`] manipulates any value implementing [`Record`], addressing
//! fields by their serialized names, and keeps `lastTransitionTime` /
//! `lastUpdateTime` consistent when conditions are updated.
use chrono::{DateTime, Utc};
use k8s_openapi::{
    api::{
        apps::v1::{
            DaemonSetCondition, DeploymentCondition, ReplicaSetCondition, StatefulSetCondition,
        },
        batch::v1::JobCondition,
        core::v1::{
            NamespaceCondition, NodeCondition, PersistentVolumeClaimCondition, PodCondition,
        },
    },
    apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinitionCondition,
    apimachinery::pkg::apis::meta::v1::{Condition, Time},
};
use kube::api::Resource;
use parking_lot::Mutex;
use std::{borrow::Cow, sync::Arc};

pub const DEFAULT_TYPE_FIELD: &str = "type";
pub const DEFAULT_STATUS_FIELD: &str = "status";
pub const DEFAULT_LAST_UPDATE_TIME_FIELD: &str = "lastUpdateTime";
pub const DEFAULT_LAST_TRANSITION_TIME_FIELD: &str = "lastTransitionTime";
pub const DEFAULT_REASON_FIELD: &str = "reason";
pub const DEFAULT_MESSAGE_FIELD: &str = "message";
pub const DEFAULT_OBSERVED_GENERATION_FIELD: &str = "observedGeneration";

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("cannot access field {field}: {type_name} is not a record")]
    NotARecord { field: String, type_name: String },
    #[error("{type_name} has no field {field}")]
    MissingField { field: String, type_name: String },
    #[error("field {field} of {type_name}: expected {expected}, got {found}")]
    Convert {
        field: String,
        type_name: String,
        expected: &'static str,
        found: String,
    },
    #[error("[index {index}]: {source}")]
    Index {
        index: usize,
        #[source]
        source: Box<Error>,
    },
}

/// Tri-state condition status
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumString, strum::Display, strum::AsRefStr,
)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

impl From<bool> for ConditionStatus {
    fn from(b: bool) -> Self {
        if b {
            ConditionStatus::True
        } else {
            ConditionStatus::False
        }
    }
}

/// Value of a single record field
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// The field exists but holds no value
    Null,
    String(String),
    Int(i64),
    Time(Time),
    /// A JSON value none of the other variants can represent
    Other(serde_json::Value),
}

impl FieldValue {
    fn describe(&self) -> String {
        match self {
            FieldValue::Null => "null".to_string(),
            FieldValue::String(s) => format!("string {:?}", s),
            FieldValue::Int(i) => format!("integer {}", i),
            FieldValue::Time(_) => "timestamp".to_string(),
            FieldValue::Other(v) => format!("JSON value {}", v),
        }
    }

    fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => FieldValue::Null,
            serde_json::Value::String(s) => FieldValue::String(s.clone()),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => FieldValue::Int(i),
                None => FieldValue::Other(value.clone()),
            },
            other => FieldValue::Other(other.clone()),
        }
    }

    fn into_json(self) -> serde_json::Value {
        match self {
            FieldValue::Null => serde_json::Value::Null,
            FieldValue::String(s) => s.into(),
            FieldValue::Int(i) => i.into(),
            FieldValue::Time(t) => t.0.to_rfc3339_opts(chrono::SecondsFormat::Secs, true).into(),
            FieldValue::Other(v) => v,
        }
    }
}

/// Why a record refused a field assignment
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldError {
    NotARecord,
    Missing,
    Mismatch { expected: &'static str },
}

/// A value shaped like a record with named fields.
pub trait Record {
    /// Name used in error messages
    fn type_name(&self) -> Cow<'_, str>;

    fn is_record(&self) -> bool {
        true
    }

    /// Returns `None` if the record has no field with this name.
    fn field(&self, name: &str) -> Option<FieldValue>;

    fn set_field(&mut self, name: &str, value: FieldValue) -> Result<(), FieldError>;

    /// Blank record used when a condition has to be appended to a slice.
    /// Required timestamps start at `now`.
    fn new_record(now: &Time) -> Self
    where
        Self: Sized;
}

/// Rust types that can back a record field.
pub trait FieldType: Sized {
    const EXPECTED: &'static str;

    fn to_field(&self) -> FieldValue;

    fn from_field(value: FieldValue) -> Option<Self>;
}

fn parse_time(s: &str) -> Option<Time> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|t| Time(t.with_timezone(&Utc)))
}

impl FieldType for String {
    const EXPECTED: &'static str = "string";

    fn to_field(&self) -> FieldValue {
        FieldValue::String(self.clone())
    }

    fn from_field(value: FieldValue) -> Option<Self> {
        match value {
            FieldValue::String(s) => Some(s),
            FieldValue::Null => Some(String::new()),
            _ => None,
        }
    }
}

impl FieldType for Option<String> {
    const EXPECTED: &'static str = "optional string";

    fn to_field(&self) -> FieldValue {
        match self {
            Some(s) => FieldValue::String(s.clone()),
            None => FieldValue::Null,
        }
    }

    fn from_field(value: FieldValue) -> Option<Self> {
        match value {
            FieldValue::String(s) => Some(Some(s)),
            FieldValue::Null => Some(None),
            _ => None,
        }
    }
}

impl FieldType for Time {
    const EXPECTED: &'static str = "timestamp";

    fn to_field(&self) -> FieldValue {
        FieldValue::Time(self.clone())
    }

    fn from_field(value: FieldValue) -> Option<Self> {
        match value {
            FieldValue::Time(t) => Some(t),
            FieldValue::String(s) => parse_time(&s),
            _ => None,
        }
    }
}

impl FieldType for Option<Time> {
    const EXPECTED: &'static str = "optional timestamp";

    fn to_field(&self) -> FieldValue {
        match self {
            Some(t) => FieldValue::Time(t.clone()),
            None => FieldValue::Null,
        }
    }

    fn from_field(value: FieldValue) -> Option<Self> {
        match value {
            FieldValue::Null => Some(None),
            other => Time::from_field(other).map(Some),
        }
    }
}

impl FieldType for i64 {
    const EXPECTED: &'static str = "integer";

    fn to_field(&self) -> FieldValue {
        FieldValue::Int(*self)
    }

    fn from_field(value: FieldValue) -> Option<Self> {
        match value {
            FieldValue::Int(i) => Some(i),
            _ => None,
        }
    }
}

impl FieldType for Option<i64> {
    const EXPECTED: &'static str = "optional integer";

    fn to_field(&self) -> FieldValue {
        match self {
            Some(i) => FieldValue::Int(*i),
            None => FieldValue::Null,
        }
    }

    fn from_field(value: FieldValue) -> Option<Self> {
        match value {
            FieldValue::Int(i) => Some(Some(i)),
            FieldValue::Null => Some(None),
            _ => None,
        }
    }
}

fn assign<T: FieldType>(slot: &mut T, value: FieldValue) -> Result<(), FieldError> {
    *slot = T::from_field(value).ok_or(FieldError::Mismatch {
        expected: T::EXPECTED,
    })?;
    Ok(())
}

macro_rules! impl_record {
    ($ty:ident { $($name:literal => $field:ident),* $(,)? } new($now:ident) $new:block) => {
        impl Record for $ty {
            fn type_name(&self) -> Cow<'_, str> {
                Cow::Borrowed(stringify!($ty))
            }

            fn field(&self, name: &str) -> Option<FieldValue> {
                match name {
                    $($name => Some(FieldType::to_field(&self.$field)),)*
                    _ => None,
                }
            }

            fn set_field(&mut self, name: &str, value: FieldValue) -> Result<(), FieldError> {
                match name {
                    $($name => assign(&mut self.$field, value),)*
                    _ => Err(FieldError::Missing),
                }
            }

            fn new_record($now: &Time) -> Self $new
        }
    };
    ($ty:ident { $($name:literal => $field:ident),* $(,)? }) => {
        impl_record!($ty { $($name => $field),* } new(_now) { $ty::default() });
    };
}

impl_record!(Condition {
    "type" => type_,
    "status" => status,
    "reason" => reason,
    "message" => message,
    "lastTransitionTime" => last_transition_time,
    "observedGeneration" => observed_generation,
} new(now) {
    Condition {
        type_: String::new(),
        status: String::new(),
        reason: String::new(),
        message: String::new(),
        last_transition_time: now.clone(),
        observed_generation: None,
    }
});

impl_record!(DeploymentCondition {
    "type" => type_,
    "status" => status,
    "reason" => reason,
    "message" => message,
    "lastTransitionTime" => last_transition_time,
    "lastUpdateTime" => last_update_time,
});

impl_record!(ReplicaSetCondition {
    "type" => type_,
    "status" => status,
    "reason" => reason,
    "message" => message,
    "lastTransitionTime" => last_transition_time,
});

impl_record!(StatefulSetCondition {
    "type" => type_,
    "status" => status,
    "reason" => reason,
    "message" => message,
    "lastTransitionTime" => last_transition_time,
});

impl_record!(DaemonSetCondition {
    "type" => type_,
    "status" => status,
    "reason" => reason,
    "message" => message,
    "lastTransitionTime" => last_transition_time,
});

impl_record!(PodCondition {
    "type" => type_,
    "status" => status,
    "reason" => reason,
    "message" => message,
    "lastTransitionTime" => last_transition_time,
    "lastProbeTime" => last_probe_time,
});

impl_record!(NodeCondition {
    "type" => type_,
    "status" => status,
    "reason" => reason,
    "message" => message,
    "lastTransitionTime" => last_transition_time,
    "lastHeartbeatTime" => last_heartbeat_time,
});

impl_record!(JobCondition {
    "type" => type_,
    "status" => status,
    "reason" => reason,
    "message" => message,
    "lastTransitionTime" => last_transition_time,
    "lastProbeTime" => last_probe_time,
});

impl_record!(NamespaceCondition {
    "type" => type_,
    "status" => status,
    "reason" => reason,
    "message" => message,
    "lastTransitionTime" => last_transition_time,
});

impl_record!(PersistentVolumeClaimCondition {
    "type" => type_,
    "status" => status,
    "reason" => reason,
    "message" => message,
    "lastTransitionTime" => last_transition_time,
    "lastProbeTime" => last_probe_time,
});

impl_record!(CustomResourceDefinitionCondition {
    "type" => type_,
    "status" => status,
    "reason" => reason,
    "message" => message,
    "lastTransitionTime" => last_transition_time,
});

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

/// JSON objects are open records: every field exists, absent keys read as null.
impl Record for serde_json::Map<String, serde_json::Value> {
    fn type_name(&self) -> Cow<'_, str> {
        Cow::Borrowed("JSON object")
    }

    fn field(&self, name: &str) -> Option<FieldValue> {
        Some(
            self.get(name)
                .map(FieldValue::from_json)
                .unwrap_or(FieldValue::Null),
        )
    }

    fn set_field(&mut self, name: &str, value: FieldValue) -> Result<(), FieldError> {
        self.insert(name.to_string(), value.into_json());
        Ok(())
    }

    fn new_record(_now: &Time) -> Self {
        serde_json::Map::new()
    }
}

impl Record for serde_json::Value {
    fn type_name(&self) -> Cow<'_, str> {
        Cow::Owned(format!("JSON {}", json_kind(self)))
    }

    fn is_record(&self) -> bool {
        self.is_object()
    }

    fn field(&self, name: &str) -> Option<FieldValue> {
        self.as_object().and_then(|o| o.field(name))
    }

    fn set_field(&mut self, name: &str, value: FieldValue) -> Result<(), FieldError> {
        match self.as_object_mut() {
            Some(o) => o.set_field(name, value),
            None => Err(FieldError::NotARecord),
        }
    }

    fn new_record(_now: &Time) -> Self {
        serde_json::Value::Object(serde_json::Map::new())
    }
}

/// Source of the current time
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct RealClock;

impl Clock for RealClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to. Meant for tests.
#[derive(Debug)]
pub struct FakeClock(Mutex<DateTime<Utc>>);

impl FakeClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        FakeClock(Mutex::new(now))
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.0.lock() = now;
    }

    pub fn step(&self, by: chrono::Duration) {
        let mut now = self.0.lock();
        *now = *now + by;
    }
}

impl Clock for FakeClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock()
    }
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    fn now(&self) -> DateTime<Utc> {
        (**self).now()
    }
}

/// Decides whether a condition transitioned, i.e. whether
/// `lastTransitionTime` has to be bumped.
pub trait Transition: Send + Sync {
    /// Captures the current state of `cond`.
    fn checkpoint(
        &self,
        acc: &Accessor,
        cond: &dyn Record,
    ) -> Result<Box<dyn TransitionCheckpoint>, Error>;
}

pub trait TransitionCheckpoint {
    /// Reports whether `cond` differs from the captured state.
    fn transitioned(&self, acc: &Accessor, cond: &dyn Record) -> Result<bool, Error>;
}

/// Transition computed from a subset of status, reason and message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldsTransition {
    pub include_status: bool,
    pub include_reason: bool,
    /// Usually causes a lot of transitions.
    pub include_message: bool,
}

impl Default for FieldsTransition {
    fn default() -> Self {
        FieldsTransition {
            include_status: true,
            include_reason: false,
            include_message: false,
        }
    }
}

impl FieldsTransition {
    fn values(&self, acc: &Accessor, cond: &dyn Record) -> Result<Vec<String>, Error> {
        let fields = [
            (self.include_status, &acc.status_field),
            (self.include_reason, &acc.reason_field),
            (self.include_message, &acc.message_field),
        ];
        fields
            .iter()
            .filter(|(included, _)| *included)
            .map(|(_, field)| {
                acc.get::<Option<String>, _>(cond, field)
                    .map(Option::unwrap_or_default)
            })
            .collect()
    }
}

struct FieldsCheckpoint {
    transition: FieldsTransition,
    values: Vec<String>,
}

impl Transition for FieldsTransition {
    fn checkpoint(
        &self,
        acc: &Accessor,
        cond: &dyn Record,
    ) -> Result<Box<dyn TransitionCheckpoint>, Error> {
        Ok(Box::new(FieldsCheckpoint {
            transition: *self,
            values: self.values(acc, cond)?,
        }))
    }
}

impl TransitionCheckpoint for FieldsCheckpoint {
    fn transitioned(&self, acc: &Accessor, cond: &dyn Record) -> Result<bool, Error> {
        Ok(self.transition.values(acc, cond)? != self.values)
    }
}

/// Modification applied to a single condition
pub trait Update {
    fn apply(&self, acc: &Accessor, cond: &mut dyn Record) -> Result<(), Error>;
}

#[derive(Debug, Clone, Copy)]
pub struct UpdateStatus(pub ConditionStatus);

impl Update for UpdateStatus {
    fn apply(&self, acc: &Accessor, cond: &mut dyn Record) -> Result<(), Error> {
        acc.set_status(cond, self.0)
    }
}

#[derive(Debug, Clone)]
pub struct UpdateReason(pub String);

impl Update for UpdateReason {
    fn apply(&self, acc: &Accessor, cond: &mut dyn Record) -> Result<(), Error> {
        acc.set_reason(cond, &self.0)
    }
}

#[derive(Debug, Clone)]
pub struct UpdateMessage(pub String);

impl Update for UpdateMessage {
    fn apply(&self, acc: &Accessor, cond: &mut dyn Record) -> Result<(), Error> {
        acc.set_message(cond, &self.0)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct UpdateObservedGeneration(pub i64);

impl Update for UpdateObservedGeneration {
    fn apply(&self, acc: &Accessor, cond: &mut dyn Record) -> Result<(), Error> {
        acc.set_observed_generation(cond, self.0)
    }
}

/// Sets the observed generation to the generation of `obj`.
pub fn update_observed<K: Resource>(obj: &K) -> UpdateObservedGeneration {
    UpdateObservedGeneration(obj.meta().generation.unwrap_or_default())
}

/// Copies status, reason, message and (if present) observed generation
/// from another condition. Type and timestamps are left alone.
pub struct UpdateFromCondition<'a> {
    /// Reads `condition`. Defaults to the accessor performing the update.
    pub accessor: Option<&'a Accessor>,
    pub condition: &'a dyn Record,
}

impl Update for UpdateFromCondition<'_> {
    fn apply(&self, acc: &Accessor, cond: &mut dyn Record) -> Result<(), Error> {
        let src = self.accessor.unwrap_or(acc);
        acc.set_status(cond, src.status(self.condition)?)?;
        acc.set_reason(cond, &src.reason(self.condition)?)?;
        acc.set_message(cond, &src.message(self.condition)?)?;
        if src.has_observed_generation(self.condition)? {
            acc.set_observed_generation(cond, src.observed_generation(self.condition)?)?;
        }
        Ok(())
    }
}

/// Runs `updates` and maintains the timestamps afterwards: `lastTransitionTime`
/// only if `transition` reports a transition, `lastUpdateTime` always.
/// Both are only set if the record has them.
pub struct UpdateTimestamps<'a> {
    pub transition: &'a dyn Transition,
    pub clock: &'a dyn Clock,
    pub updates: &'a [&'a dyn Update],
}

impl Update for UpdateTimestamps<'_> {
    fn apply(&self, acc: &Accessor, cond: &mut dyn Record) -> Result<(), Error> {
        let checkpoint = self.transition.checkpoint(acc, &*cond)?;
        for update in self.updates {
            update.apply(acc, cond)?;
        }

        let now = Time(self.clock.now());
        if checkpoint.transitioned(acc, &*cond)? {
            acc.set_last_transition_time_if_exists(cond, now.clone())?;
        }
        acc.set_last_update_time_if_exists(cond, now)?;
        Ok(())
    }
}

/// Options to create an [`Accessor`].
#[derive(Clone)]
pub struct AccessorOptions {
    pub type_field: String,
    pub status_field: String,
    pub last_update_time_field: String,
    pub last_transition_time_field: String,
    pub reason_field: String,
    pub message_field: String,
    pub observed_generation_field: String,

    pub disable_timestamp_updates: bool,
    pub transition: Arc<dyn Transition>,
    pub clock: Arc<dyn Clock>,
}

impl Default for AccessorOptions {
    fn default() -> Self {
        AccessorOptions {
            type_field: DEFAULT_TYPE_FIELD.to_string(),
            status_field: DEFAULT_STATUS_FIELD.to_string(),
            last_update_time_field: DEFAULT_LAST_UPDATE_TIME_FIELD.to_string(),
            last_transition_time_field: DEFAULT_LAST_TRANSITION_TIME_FIELD.to_string(),
            reason_field: DEFAULT_REASON_FIELD.to_string(),
            message_field: DEFAULT_MESSAGE_FIELD.to_string(),
            observed_generation_field: DEFAULT_OBSERVED_GENERATION_FIELD.to_string(),
            disable_timestamp_updates: false,
            transition: Arc::new(FieldsTransition::default()),
            clock: Arc::new(RealClock),
        }
    }
}

/// Reads, writes and updates conditions and condition slices.
#[derive(Clone)]
pub struct Accessor {
    type_field: String,
    status_field: String,
    last_update_time_field: String,
    last_transition_time_field: String,
    reason_field: String,
    message_field: String,
    observed_generation_field: String,

    disable_timestamp_updates: bool,
    transition: Arc<dyn Transition>,
    clock: Arc<dyn Clock>,
}

impl Default for Accessor {
    fn default() -> Self {
        Accessor::new(AccessorOptions::default())
    }
}

fn must<T>(res: Result<T, Error>) -> T {
    res.unwrap_or_else(|err| panic!("{}", err))
}

impl Accessor {
    pub fn new(opts: AccessorOptions) -> Self {
        Accessor {
            type_field: opts.type_field,
            status_field: opts.status_field,
            last_update_time_field: opts.last_update_time_field,
            last_transition_time_field: opts.last_transition_time_field,
            reason_field: opts.reason_field,
            message_field: opts.message_field,
            observed_generation_field: opts.observed_generation_field,
            disable_timestamp_updates: opts.disable_timestamp_updates,
            transition: opts.transition,
            clock: opts.clock,
        }
    }

    fn ensure_record<C: Record + ?Sized>(cond: &C, field: &str) -> Result<(), Error> {
        if cond.is_record() {
            Ok(())
        } else {
            Err(Error::NotARecord {
                field: field.to_string(),
                type_name: cond.type_name().into_owned(),
            })
        }
    }

    fn get<T: FieldType, C: Record + ?Sized>(&self, cond: &C, field: &str) -> Result<T, Error> {
        Self::ensure_record(cond, field)?;
        let value = cond.field(field).ok_or_else(|| Error::MissingField {
            field: field.to_string(),
            type_name: cond.type_name().into_owned(),
        })?;
        let found = value.describe();
        T::from_field(value).ok_or_else(|| Error::Convert {
            field: field.to_string(),
            type_name: cond.type_name().into_owned(),
            expected: T::EXPECTED,
            found,
        })
    }

    fn set<T: FieldType, C: Record + ?Sized>(
        &self,
        cond: &mut C,
        field: &str,
        value: T,
    ) -> Result<(), Error> {
        Self::ensure_record(cond, field)?;
        let value = value.to_field();
        let found = value.describe();
        cond.set_field(field, value).map_err(|err| match err {
            FieldError::NotARecord => Error::NotARecord {
                field: field.to_string(),
                type_name: cond.type_name().into_owned(),
            },
            FieldError::Missing => Error::MissingField {
                field: field.to_string(),
                type_name: cond.type_name().into_owned(),
            },
            FieldError::Mismatch { expected } => Error::Convert {
                field: field.to_string(),
                type_name: cond.type_name().into_owned(),
                expected,
                found,
            },
        })
    }

    fn has<C: Record + ?Sized>(&self, cond: &C, field: &str) -> Result<bool, Error> {
        Self::ensure_record(cond, field)?;
        Ok(cond.field(field).is_some())
    }

    pub fn type_<C: Record + ?Sized>(&self, cond: &C) -> Result<String, Error> {
        self.get::<Option<String>, _>(cond, &self.type_field)
            .map(Option::unwrap_or_default)
    }

    pub fn must_type<C: Record + ?Sized>(&self, cond: &C) -> String {
        must(self.type_(cond))
    }

    pub fn set_type<C: Record + ?Sized>(&self, cond: &mut C, typ: &str) -> Result<(), Error> {
        self.set(cond, &self.type_field, typ.to_string())
    }

    pub fn must_set_type<C: Record + ?Sized>(&self, cond: &mut C, typ: &str) {
        must(self.set_type(cond, typ))
    }

    /// Status of `cond`. An empty or unset status reads as `Unknown`.
    pub fn status<C: Record + ?Sized>(&self, cond: &C) -> Result<ConditionStatus, Error> {
        let field = &self.status_field;
        let raw = match self.get::<Option<String>, _>(cond, field)? {
            Some(raw) if !raw.is_empty() => raw,
            _ => return Ok(ConditionStatus::Unknown),
        };
        raw.parse().map_err(|_| Error::Convert {
            field: field.clone(),
            type_name: cond.type_name().into_owned(),
            expected: "one of True, False, Unknown",
            found: format!("{:?}", raw),
        })
    }

    pub fn must_status<C: Record + ?Sized>(&self, cond: &C) -> ConditionStatus {
        must(self.status(cond))
    }

    pub fn set_status<C: Record + ?Sized>(
        &self,
        cond: &mut C,
        status: ConditionStatus,
    ) -> Result<(), Error> {
        self.set(cond, &self.status_field, status.to_string())
    }

    pub fn must_set_status<C: Record + ?Sized>(&self, cond: &mut C, status: ConditionStatus) {
        must(self.set_status(cond, status))
    }

    pub fn has_last_update_time<C: Record + ?Sized>(&self, cond: &C) -> Result<bool, Error> {
        self.has(cond, &self.last_update_time_field)
    }

    pub fn must_has_last_update_time<C: Record + ?Sized>(&self, cond: &C) -> bool {
        must(self.has_last_update_time(cond))
    }

    pub fn last_update_time<C: Record + ?Sized>(&self, cond: &C) -> Result<Option<Time>, Error> {
        self.get(cond, &self.last_update_time_field)
    }

    pub fn must_last_update_time<C: Record + ?Sized>(&self, cond: &C) -> Option<Time> {
        must(self.last_update_time(cond))
    }

    pub fn set_last_update_time<C: Record + ?Sized>(
        &self,
        cond: &mut C,
        time: Time,
    ) -> Result<(), Error> {
        self.set(cond, &self.last_update_time_field, time)
    }

    pub fn set_last_update_time_if_exists<C: Record + ?Sized>(
        &self,
        cond: &mut C,
        time: Time,
    ) -> Result<(), Error> {
        if self.has_last_update_time(cond)? {
            self.set_last_update_time(cond, time)?;
        }
        Ok(())
    }

    pub fn has_last_transition_time<C: Record + ?Sized>(&self, cond: &C) -> Result<bool, Error> {
        self.has(cond, &self.last_transition_time_field)
    }

    pub fn must_has_last_transition_time<C: Record + ?Sized>(&self, cond: &C) -> bool {
        must(self.has_last_transition_time(cond))
    }

    pub fn last_transition_time<C: Record + ?Sized>(
        &self,
        cond: &C,
    ) -> Result<Option<Time>, Error> {
        self.get(cond, &self.last_transition_time_field)
    }

    pub fn must_last_transition_time<C: Record + ?Sized>(&self, cond: &C) -> Option<Time> {
        must(self.last_transition_time(cond))
    }

    pub fn set_last_transition_time<C: Record + ?Sized>(
        &self,
        cond: &mut C,
        time: Time,
    ) -> Result<(), Error> {
        self.set(cond, &self.last_transition_time_field, time)
    }

    pub fn set_last_transition_time_if_exists<C: Record + ?Sized>(
        &self,
        cond: &mut C,
        time: Time,
    ) -> Result<(), Error> {
        if self.has_last_transition_time(cond)? {
            self.set_last_transition_time(cond, time)?;
        }
        Ok(())
    }

    pub fn reason<C: Record + ?Sized>(&self, cond: &C) -> Result<String, Error> {
        self.get::<Option<String>, _>(cond, &self.reason_field)
            .map(Option::unwrap_or_default)
    }

    pub fn must_reason<C: Record + ?Sized>(&self, cond: &C) -> String {
        must(self.reason(cond))
    }

    pub fn set_reason<C: Record + ?Sized>(&self, cond: &mut C, reason: &str) -> Result<(), Error> {
        self.set(cond, &self.reason_field, reason.to_string())
    }

    pub fn must_set_reason<C: Record + ?Sized>(&self, cond: &mut C, reason: &str) {
        must(self.set_reason(cond, reason))
    }

    pub fn message<C: Record + ?Sized>(&self, cond: &C) -> Result<String, Error> {
        self.get::<Option<String>, _>(cond, &self.message_field)
            .map(Option::unwrap_or_default)
    }

    pub fn must_message<C: Record + ?Sized>(&self, cond: &C) -> String {
        must(self.message(cond))
    }

    pub fn set_message<C: Record + ?Sized>(
        &self,
        cond: &mut C,
        message: &str,
    ) -> Result<(), Error> {
        self.set(cond, &self.message_field, message.to_string())
    }

    pub fn must_set_message<C: Record + ?Sized>(&self, cond: &mut C, message: &str) {
        must(self.set_message(cond, message))
    }

    pub fn has_observed_generation<C: Record + ?Sized>(&self, cond: &C) -> Result<bool, Error> {
        self.has(cond, &self.observed_generation_field)
    }

    pub fn must_has_observed_generation<C: Record + ?Sized>(&self, cond: &C) -> bool {
        must(self.has_observed_generation(cond))
    }

    pub fn observed_generation<C: Record + ?Sized>(&self, cond: &C) -> Result<i64, Error> {
        self.get::<Option<i64>, _>(cond, &self.observed_generation_field)
            .map(Option::unwrap_or_default)
    }

    pub fn must_observed_generation<C: Record + ?Sized>(&self, cond: &C) -> i64 {
        must(self.observed_generation(cond))
    }

    pub fn set_observed_generation<C: Record + ?Sized>(
        &self,
        cond: &mut C,
        generation: i64,
    ) -> Result<(), Error> {
        self.set(cond, &self.observed_generation_field, generation)
    }

    pub fn must_set_observed_generation<C: Record + ?Sized>(&self, cond: &mut C, generation: i64) {
        must(self.set_observed_generation(cond, generation))
    }

    /// Index of the first condition of type `typ`.
    pub fn find_slice_index<C: Record>(
        &self,
        conds: &[C],
        typ: &str,
    ) -> Result<Option<usize>, Error> {
        for (index, cond) in conds.iter().enumerate() {
            let cond_type = self.type_(cond).map_err(|err| Error::Index {
                index,
                source: Box::new(err),
            })?;
            if cond_type == typ {
                return Ok(Some(index));
            }
        }
        Ok(None)
    }

    pub fn must_find_slice_index<C: Record>(&self, conds: &[C], typ: &str) -> Option<usize> {
        must(self.find_slice_index(conds, typ))
    }

    pub fn find_slice<'a, C: Record>(
        &self,
        conds: &'a [C],
        typ: &str,
    ) -> Result<Option<&'a C>, Error> {
        Ok(self.find_slice_index(conds, typ)?.map(|idx| &conds[idx]))
    }

    pub fn must_find_slice<'a, C: Record>(&self, conds: &'a [C], typ: &str) -> Option<&'a C> {
        must(self.find_slice(conds, typ))
    }

    /// Copies the condition of type `typ` into `into`. `into` is left
    /// untouched if there is no such condition.
    pub fn find_slice_into<C: Record + Clone>(
        &self,
        conds: &[C],
        typ: &str,
        into: &mut C,
    ) -> Result<bool, Error> {
        match self.find_slice(conds, typ)? {
            Some(cond) => {
                into.clone_from(cond);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn must_find_slice_into<C: Record + Clone>(
        &self,
        conds: &[C],
        typ: &str,
        into: &mut C,
    ) -> bool {
        must(self.find_slice_into(conds, typ, into))
    }

    /// Status of the condition of type `typ`, `Unknown` if there is none.
    pub fn find_slice_status<C: Record>(
        &self,
        conds: &[C],
        typ: &str,
    ) -> Result<ConditionStatus, Error> {
        match self.find_slice(conds, typ)? {
            Some(cond) => self.status(cond),
            None => Ok(ConditionStatus::Unknown),
        }
    }

    pub fn must_find_slice_status<C: Record>(&self, conds: &[C], typ: &str) -> ConditionStatus {
        must(self.find_slice_status(conds, typ))
    }

    /// Applies `updates` to `cond`, maintaining timestamps unless disabled.
    pub fn update(&self, cond: &mut dyn Record, updates: &[&dyn Update]) -> Result<(), Error> {
        if self.disable_timestamp_updates {
            for update in updates {
                update.apply(self, cond)?;
            }
            return Ok(());
        }

        UpdateTimestamps {
            transition: &*self.transition,
            clock: &*self.clock,
            updates,
        }
        .apply(self, cond)
    }

    pub fn must_update(&self, cond: &mut dyn Record, updates: &[&dyn Update]) {
        must(self.update(cond, updates))
    }

    /// Updates the condition of type `typ`, appending it first if missing.
    /// Appended conditions start with their type and `lastTransitionTime` set.
    pub fn update_slice<C: Record>(
        &self,
        conds: &mut Vec<C>,
        typ: &str,
        updates: &[&dyn Update],
    ) -> Result<(), Error> {
        if let Some(idx) = self.find_slice_index(conds, typ)? {
            return self.update(&mut conds[idx], updates);
        }

        let now = Time(self.clock.now());
        let mut cond = C::new_record(&now);
        self.set_type(&mut cond, typ)?;
        self.set_last_transition_time_if_exists(&mut cond, now)?;
        self.update(&mut cond, updates)?;
        conds.push(cond);
        Ok(())
    }

    pub fn must_update_slice<C: Record>(
        &self,
        conds: &mut Vec<C>,
        typ: &str,
        updates: &[&dyn Update],
    ) {
        must(self.update_slice(conds, typ, updates))
    }

    /// Same as [`Accessor::update_slice`] for the `Option<Vec<_>>` shape of generated status types.
    pub fn update_optional_slice<C: Record>(
        &self,
        conds: &mut Option<Vec<C>>,
        typ: &str,
        updates: &[&dyn Update],
    ) -> Result<(), Error> {
        self.update_slice(conds.get_or_insert_with(Vec::new), typ, updates)
    }
}
