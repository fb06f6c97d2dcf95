//! Registry resolving Rust types to Kubernetes kinds.
//!
//! Typed objects are looked up by their Rust type, `DynamicObject`s carry
//! their kind in `apiVersion`/`kind`.
use k8s_openapi::{
    api::{
        apps::v1::{DaemonSet, Deployment, ReplicaSet, StatefulSet},
        batch::v1::{CronJob, Job},
        coordination::v1::Lease,
        core::v1::{
            ConfigMap, Event, Namespace, Node, PersistentVolume, PersistentVolumeClaim, Pod,
            Secret, Service, ServiceAccount,
        },
        rbac::v1::{ClusterRole, ClusterRoleBinding, Role, RoleBinding},
    },
    apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition,
};
use kube::{
    api::{DynamicObject, GroupVersionKind, Resource},
    core::GroupVersion,
};
use serde::{de::DeserializeOwned, Serialize};
use std::{
    any::{Any, TypeId},
    collections::HashMap,
    fmt::{self, Display, Formatter},
};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("no kind is registered for type {0}")]
    NotRegistered(&'static str),
    #[error("object {0:?} does not specify apiVersion and kind")]
    MissingTypeMeta(String),
    #[error("invalid apiVersion {0:?}")]
    InvalidApiVersion(String),
    #[error("cannot convert {found} into {expected}")]
    KindMismatch { expected: String, found: String },
    #[error("failed to convert object: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// API group and kind, without version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupKind {
    pub group: String,
    pub kind: String,
}

impl GroupKind {
    pub fn new(group: &str, kind: &str) -> Self {
        GroupKind {
            group: group.to_string(),
            kind: kind.to_string(),
        }
    }
}

impl From<&GroupVersionKind> for GroupKind {
    fn from(gvk: &GroupVersionKind) -> Self {
        GroupKind::new(&gvk.group, &gvk.kind)
    }
}

impl Display for GroupKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.group.is_empty() {
            f.write_str(&self.kind)
        } else {
            write!(f, "{}.{}", self.kind, self.group)
        }
    }
}

/// Splits an apiVersion such as `apps/v1` into group and version.
pub fn parse_api_version(api_version: &str) -> Result<(String, String), Error> {
    let gv: GroupVersion = api_version
        .parse()
        .map_err(|_| Error::InvalidApiVersion(api_version.to_string()))?;
    if gv.version.is_empty() {
        return Err(Error::InvalidApiVersion(api_version.to_string()));
    }
    Ok((gv.group, gv.version))
}

/// Resolves the kind of a dynamic object from its type information.
pub fn dynamic_gvk(obj: &DynamicObject) -> Result<GroupVersionKind, Error> {
    let types = obj
        .types
        .as_ref()
        .filter(|t| !t.kind.is_empty() && !t.api_version.is_empty())
        .ok_or_else(|| {
            Error::MissingTypeMeta(obj.metadata.name.clone().unwrap_or_default())
        })?;
    let (group, version) = parse_api_version(&types.api_version)?;
    Ok(GroupVersionKind::gvk(&group, &version, &types.kind))
}

fn is_dynamic<K: 'static>() -> bool {
    TypeId::of::<K>() == TypeId::of::<DynamicObject>()
}

#[derive(Debug, Clone, Default)]
pub struct Scheme {
    types: HashMap<TypeId, GroupVersionKind>,
}

impl Scheme {
    /// Creates an empty scheme
    pub fn new() -> Self {
        Scheme::default()
    }

    /// Creates a scheme knowing the commonly used built-in types
    pub fn with_defaults() -> Self {
        let mut scheme = Scheme::new();
        scheme
            .register::<Pod>()
            .register::<ConfigMap>()
            .register::<Secret>()
            .register::<Service>()
            .register::<ServiceAccount>()
            .register::<Namespace>()
            .register::<Node>()
            .register::<Event>()
            .register::<PersistentVolume>()
            .register::<PersistentVolumeClaim>()
            .register::<Deployment>()
            .register::<StatefulSet>()
            .register::<DaemonSet>()
            .register::<ReplicaSet>()
            .register::<Job>()
            .register::<CronJob>()
            .register::<Role>()
            .register::<RoleBinding>()
            .register::<ClusterRole>()
            .register::<ClusterRoleBinding>()
            .register::<Lease>()
            .register::<CustomResourceDefinition>();
        scheme
    }

    /// Registers a statically typed resource
    pub fn register<K: Resource<DynamicType = ()> + 'static>(&mut self) -> &mut Self {
        let gvk = GroupVersionKind::gvk(&K::group(&()), &K::version(&()), &K::kind(&()));
        self.register_gvk::<K>(gvk)
    }

    /// Registers a type under an explicit kind
    pub fn register_gvk<K: 'static>(&mut self, gvk: GroupVersionKind) -> &mut Self {
        self.types.insert(TypeId::of::<K>(), gvk);
        self
    }

    pub fn is_registered<K: 'static>(&self) -> bool {
        self.types.contains_key(&TypeId::of::<K>())
    }

    /// Kind of a registered static type.
    pub fn gvk<K: 'static>(&self) -> Result<GroupVersionKind, Error> {
        self.types
            .get(&TypeId::of::<K>())
            .cloned()
            .ok_or_else(|| Error::NotRegistered(std::any::type_name::<K>()))
    }

    /// Kind of a concrete object.
    pub fn gvk_for<K: 'static>(&self, obj: &K) -> Result<GroupVersionKind, Error> {
        match (obj as &dyn Any).downcast_ref::<DynamicObject>() {
            Some(dynamic) => dynamic_gvk(dynamic),
            None => self.gvk::<K>(),
        }
    }

    /// Converts an object into its dynamic representation with type information set.
    pub fn to_dynamic<K: Serialize + 'static>(&self, obj: &K) -> Result<DynamicObject, Error> {
        let gvk = self.gvk_for(obj)?;
        let mut value = serde_json::to_value(obj)?;
        if let Some(fields) = value.as_object_mut() {
            fields.insert("apiVersion".into(), gvk.api_version().into());
            fields.insert("kind".into(), gvk.kind.into());
        }
        Ok(serde_json::from_value(value)?)
    }

    /// Converts a dynamic object into `K`.
    /// Fails if `K` is registered for another kind.
    pub fn from_dynamic<K: DeserializeOwned + 'static>(
        &self,
        obj: DynamicObject,
    ) -> Result<K, Error> {
        let found = dynamic_gvk(&obj)?;
        if !is_dynamic::<K>() {
            let expected = self.gvk::<K>()?;
            if GroupKind::from(&expected) != GroupKind::from(&found) {
                return Err(Error::KindMismatch {
                    expected: GroupKind::from(&expected).to_string(),
                    found: GroupKind::from(&found).to_string(),
                });
            }
        }
        let value = serde_json::to_value(obj)?;
        Ok(serde_json::from_value(value)?)
    }
}
