//! In-memory object store implementing [`Client`].
//!
//! Meant for tests. Only a subset of the request options is implemented;
//! requests using any other option are rejected before the store is touched.
//! The store does not know which kinds are namespaced, and patches are not
//! supported at all.
use crate::{
    client::{Client, Error, ListOptions, ObjectKey, ObjectRef},
    labels,
    scheme::{GroupKind, Scheme},
};
use async_trait::async_trait;
use kube::api::{
    DeleteParams, DynamicObject, GroupVersionKind, ListParams, Patch, PatchParams, PostParams,
    ResourceExt,
};
use kube::core::{Selector, SelectorExt};
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};

pub struct Store {
    scheme: Scheme,
    entries: Mutex<HashMap<ObjectRef, DynamicObject>>,
}

fn validate_create(pp: &PostParams) -> Result<(), Error> {
    if pp.dry_run {
        return Err(Error::Unsupported("dry run"));
    }
    Ok(())
}

fn validate_update(pp: &PostParams) -> Result<(), Error> {
    if pp.dry_run {
        return Err(Error::Unsupported("dry run"));
    }
    if pp.field_manager.is_some() {
        return Err(Error::Unsupported("field manager"));
    }
    Ok(())
}

fn validate_list(lp: &ListParams) -> Result<(), Error> {
    if lp.limit.is_some() {
        return Err(Error::Unsupported("limit"));
    }
    if lp.continue_token.is_some() {
        return Err(Error::Unsupported("continue token"));
    }
    if lp.field_selector.is_some() {
        return Err(Error::Unsupported("field selector"));
    }
    Ok(())
}

fn validate_delete(dp: &DeleteParams) -> Result<(), Error> {
    if dp.dry_run {
        return Err(Error::Unsupported("dry run"));
    }
    if dp.grace_period_seconds.is_some() {
        return Err(Error::Unsupported("grace period seconds"));
    }
    if dp.preconditions.is_some() {
        return Err(Error::Unsupported("preconditions"));
    }
    if dp.propagation_policy.is_some() {
        return Err(Error::Unsupported("propagation policy"));
    }
    Ok(())
}

fn set_status(obj: &mut DynamicObject, status: Option<serde_json::Value>) {
    match (obj.data.as_object_mut(), status) {
        (Some(data), Some(status)) => {
            data.insert("status".to_string(), status);
        }
        (Some(data), None) => {
            data.remove("status");
        }
        (None, Some(status)) => obj.data = serde_json::json!({ "status": status }),
        (None, None) => {}
    }
}

/// Namespace and label filter of a list request
struct Filter {
    namespace: Option<String>,
    selector: Selector,
}

impl Filter {
    fn new(opts: &ListOptions) -> Result<Self, Error> {
        let selector = labels::parse(opts.params.label_selector.as_deref().unwrap_or_default())?;
        Ok(Filter {
            namespace: opts.namespace.clone().filter(|ns| !ns.is_empty()),
            selector,
        })
    }

    fn matches(&self, obj: &DynamicObject) -> bool {
        if let Some(ns) = &self.namespace {
            if obj.metadata.namespace.as_ref() != Some(ns) {
                return false;
            }
        }
        self.selector.matches(obj.labels())
    }
}

impl Store {
    /// Creates an empty store. `scheme` resolves the kinds of typed objects.
    pub fn new(scheme: Scheme) -> Self {
        Store {
            scheme,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// All stored objects, ordered by kind and key.
    pub fn objects(&self) -> Vec<DynamicObject> {
        let entries = self.entries.lock();
        let mut refs = entries.keys().collect::<Vec<_>>();
        refs.sort();
        refs.into_iter().map(|r| entries[r].clone()).collect()
    }

    /// Distinct kinds of the stored objects.
    pub fn group_kinds(&self) -> Vec<GroupKind> {
        let entries = self.entries.lock();
        let kinds = entries
            .keys()
            .map(|r| r.group_kind.clone())
            .collect::<BTreeSet<_>>();
        kinds.into_iter().collect()
    }

    /// Stored objects of kind `gk`, ordered by key.
    pub fn group_kind_objects(&self, gk: &GroupKind) -> Vec<DynamicObject> {
        let entries = self.entries.lock();
        let mut matching = entries
            .iter()
            .filter(|(r, _)| &r.group_kind == gk)
            .collect::<Vec<_>>();
        matching.sort_by(|a, b| a.0.cmp(b.0));
        matching.into_iter().map(|(_, obj)| obj.clone()).collect()
    }
}

#[async_trait]
impl Client for Store {
    fn scheme(&self) -> &Scheme {
        &self.scheme
    }

    async fn get(&self, gvk: &GroupVersionKind, key: &ObjectKey) -> Result<DynamicObject, Error> {
        let group_kind = GroupKind::from(gvk);
        let entries = self.entries.lock();
        let entry = ObjectRef {
            group_kind,
            key: key.clone(),
        };
        match entries.get(&entry) {
            Some(obj) => Ok(obj.clone()),
            None => Err(Error::NotFound {
                group_kind: entry.group_kind,
                key: entry.key,
            }),
        }
    }

    async fn list(
        &self,
        gvk: &GroupVersionKind,
        opts: &ListOptions,
    ) -> Result<Vec<DynamicObject>, Error> {
        validate_list(&opts.params)?;
        let filter = Filter::new(opts)?;
        let group_kind = GroupKind::from(gvk);

        let entries = self.entries.lock();
        let mut matching = entries
            .iter()
            .filter(|(r, obj)| r.group_kind == group_kind && filter.matches(obj))
            .collect::<Vec<_>>();
        matching.sort_by(|a, b| a.0.cmp(b.0));
        Ok(matching.into_iter().map(|(_, obj)| obj.clone()).collect())
    }

    async fn create(&self, obj: &DynamicObject, pp: &PostParams) -> Result<DynamicObject, Error> {
        validate_create(pp)?;
        let entry = ObjectRef::from_object(&self.scheme, obj)?;

        let mut entries = self.entries.lock();
        if entries.contains_key(&entry) {
            return Err(Error::AlreadyExists {
                group_kind: entry.group_kind,
                key: entry.key,
            });
        }
        tracing::debug!("store: creating {}", entry);
        entries.insert(entry, obj.clone());
        Ok(obj.clone())
    }

    async fn update(&self, obj: &DynamicObject, pp: &PostParams) -> Result<DynamicObject, Error> {
        validate_update(pp)?;
        let entry = ObjectRef::from_object(&self.scheme, obj)?;

        let mut entries = self.entries.lock();
        match entries.get_mut(&entry) {
            Some(stored) => {
                tracing::debug!("store: updating {}", entry);
                *stored = obj.clone();
                Ok(obj.clone())
            }
            None => Err(Error::NotFound {
                group_kind: entry.group_kind,
                key: entry.key,
            }),
        }
    }

    async fn patch(
        &self,
        _obj: &DynamicObject,
        _patch: &Patch<serde_json::Value>,
        _pp: &PatchParams,
    ) -> Result<DynamicObject, Error> {
        Err(Error::Unsupported("patch"))
    }

    async fn update_status(
        &self,
        obj: &DynamicObject,
        pp: &PostParams,
    ) -> Result<DynamicObject, Error> {
        validate_update(pp)?;
        let entry = ObjectRef::from_object(&self.scheme, obj)?;

        let mut entries = self.entries.lock();
        match entries.get_mut(&entry) {
            Some(stored) => {
                tracing::debug!("store: updating status of {}", entry);
                set_status(stored, obj.data.get("status").cloned());
                Ok(stored.clone())
            }
            None => Err(Error::NotFound {
                group_kind: entry.group_kind,
                key: entry.key,
            }),
        }
    }

    async fn patch_status(
        &self,
        _obj: &DynamicObject,
        _patch: &Patch<serde_json::Value>,
        _pp: &PatchParams,
    ) -> Result<DynamicObject, Error> {
        Err(Error::Unsupported("patch"))
    }

    async fn delete(&self, obj: &DynamicObject, dp: &DeleteParams) -> Result<(), Error> {
        validate_delete(dp)?;
        let entry = ObjectRef::from_object(&self.scheme, obj)?;

        let mut entries = self.entries.lock();
        if entries.remove(&entry).is_none() {
            return Err(Error::NotFound {
                group_kind: entry.group_kind,
                key: entry.key,
            });
        }
        tracing::debug!("store: deleted {}", entry);
        Ok(())
    }

    async fn delete_all_of(
        &self,
        gvk: &GroupVersionKind,
        opts: &ListOptions,
        dp: &DeleteParams,
    ) -> Result<(), Error> {
        validate_list(&opts.params)?;
        validate_delete(dp)?;
        let filter = Filter::new(opts)?;
        let group_kind = GroupKind::from(gvk);

        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|r, obj| !(r.group_kind == group_kind && filter.matches(obj)));
        tracing::debug!(
            "store: deleted {} objects of kind {}",
            before - entries.len(),
            group_kind
        );
        Ok(())
    }
}
