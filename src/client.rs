//! Cluster client abstraction and helpers for working with sets of objects.
//!
//! [`Client`] is an object-safe view of the API server operating on
//! `DynamicObject`s. [`ClientExt`] adds typed variants resolved through the
//! client's [`Scheme`]. [`KubeClient`] talks to a real cluster,
//! [`crate::memorystore::Store`] keeps everything in memory.
use crate::{
    errors::{classify_kube, Classify, ErrorClass},
    labels,
    scheme::{self, dynamic_gvk, GroupKind, Scheme},
    unstructured,
};
use async_trait::async_trait;
use kube::{
    api::{
        Api, ApiResource, DeleteParams, DynamicObject, GroupVersionKind, ListParams, Patch,
        PatchParams, PostParams, Resource, ResourceExt,
    },
    core::TypeMeta,
};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::json;
use std::{
    any::TypeId,
    collections::HashSet,
    fmt::{self, Display, Formatter},
    path::Path,
};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{group_kind} {key} not found")]
    NotFound { group_kind: GroupKind, key: ObjectKey },
    #[error("{group_kind} {key} already exists")]
    AlreadyExists { group_kind: GroupKind, key: ObjectKey },
    #[error("{0} is not supported")]
    Unsupported(&'static str),
    #[error(transparent)]
    Selector(#[from] labels::ParseError),
    #[error(transparent)]
    Scheme(#[from] scheme::Error),
    #[error("api request failed: {0}")]
    Kube(#[from] kube::Error),
    #[error("failed to serialize object: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("error {action} object {key}: {source}")]
    Object {
        action: &'static str,
        key: ObjectKey,
        #[source]
        source: Box<Error>,
    },
    #[error("error reading objects: {0}")]
    Read(#[from] unstructured::Error),
}

impl Error {
    fn for_object(action: &'static str, key: ObjectKey) -> impl FnOnce(Error) -> Error {
        move |source| Error::Object {
            action,
            key,
            source: Box::new(source),
        }
    }
}

impl Classify for Error {
    fn class(&self) -> ErrorClass {
        match self {
            Error::NotFound { .. } => ErrorClass::NotFound,
            Error::AlreadyExists { .. } => ErrorClass::AlreadyExists,
            Error::Unsupported(_) => ErrorClass::Unsupported,
            Error::Selector(_) => ErrorClass::Invalid,
            Error::Kube(e) => classify_kube(e),
            Error::Object { source, .. } => source.class(),
            _ => ErrorClass::Unknown,
        }
    }
}

/// Namespace and name of an object
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct ObjectKey {
    pub namespace: Option<String>,
    pub name: String,
}

impl ObjectKey {
    pub fn namespaced(namespace: &str, name: &str) -> Self {
        ObjectKey {
            namespace: Some(namespace.to_string()),
            name: name.to_string(),
        }
    }

    pub fn cluster(name: &str) -> Self {
        ObjectKey {
            namespace: None,
            name: name.to_string(),
        }
    }

    pub fn from_object<K: Resource>(obj: &K) -> Self {
        let meta = obj.meta();
        ObjectKey {
            namespace: meta.namespace.clone().filter(|ns| !ns.is_empty()),
            name: meta.name.clone().unwrap_or_default(),
        }
    }
}

impl Display for ObjectKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{}/{}", ns, self.name),
            None => f.write_str(&self.name),
        }
    }
}

pub type ObjectKeySet = HashSet<ObjectKey>;

/// References an object regardless of its version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectRef {
    pub group_kind: GroupKind,
    pub key: ObjectKey,
}

impl ObjectRef {
    pub fn from_object<K: Resource + 'static>(
        scheme: &Scheme,
        obj: &K,
    ) -> Result<Self, scheme::Error> {
        let gvk = scheme.gvk_for(obj)?;
        Ok(ObjectRef {
            group_kind: GroupKind::from(&gvk),
            key: ObjectKey::from_object(obj),
        })
    }

    pub fn from_get_request(req: &GetRequest) -> Self {
        ObjectRef {
            group_kind: GroupKind::from(req.gvk()),
            key: req.key.clone(),
        }
    }
}

impl Display for ObjectRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.group_kind, self.key)
    }
}

pub type ObjectRefSet = HashSet<ObjectRef>;

pub fn object_refs_from_objects<'a, K: Resource + 'static>(
    scheme: &Scheme,
    objs: impl IntoIterator<Item = &'a K>,
) -> Result<Vec<ObjectRef>, scheme::Error> {
    objs.into_iter()
        .map(|obj| ObjectRef::from_object(scheme, obj))
        .collect()
}

pub fn object_ref_set_from_objects<'a, K: Resource + 'static>(
    scheme: &Scheme,
    objs: impl IntoIterator<Item = &'a K>,
) -> Result<ObjectRefSet, scheme::Error> {
    objs.into_iter()
        .map(|obj| ObjectRef::from_object(scheme, obj))
        .collect()
}

pub fn object_ref_set_from_get_requests<'a>(
    reqs: impl IntoIterator<Item = &'a GetRequest>,
) -> ObjectRefSet {
    reqs.into_iter().map(ObjectRef::from_get_request).collect()
}

/// Checks whether `set` contains a reference to `obj`.
pub fn references_object<K: Resource + 'static>(
    scheme: &Scheme,
    set: &ObjectRefSet,
    obj: &K,
) -> Result<bool, scheme::Error> {
    Ok(set.contains(&ObjectRef::from_object(scheme, obj)?))
}

pub fn references_get_request(set: &ObjectRefSet, req: &GetRequest) -> bool {
    set.contains(&ObjectRef::from_get_request(req))
}

/// What a [`GetRequest`] asks for.
///
/// Typed requests are identified by their Rust type, dynamic requests by the
/// kind they name, so that the two never collapse in a [`GetRequestSet`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RequestTarget {
    Typed {
        type_id: TypeId,
        gvk: GroupVersionKind,
    },
    Dynamic(GroupVersionKind),
}

/// Request to get the object with a given key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GetRequest {
    pub target: RequestTarget,
    pub key: ObjectKey,
}

impl GetRequest {
    pub fn typed<K: 'static>(scheme: &Scheme, key: ObjectKey) -> Result<Self, scheme::Error> {
        Ok(GetRequest {
            target: RequestTarget::Typed {
                type_id: TypeId::of::<K>(),
                gvk: scheme.gvk::<K>()?,
            },
            key,
        })
    }

    pub fn dynamic(gvk: GroupVersionKind, key: ObjectKey) -> Self {
        GetRequest {
            target: RequestTarget::Dynamic(gvk),
            key,
        }
    }

    /// Builds a request for `obj`, which has to carry its namespace and name.
    pub fn from_object<K: Resource + 'static>(
        scheme: &Scheme,
        obj: &K,
    ) -> Result<Self, scheme::Error> {
        let key = ObjectKey::from_object(obj);
        if let Some(dynamic) = (obj as &dyn std::any::Any).downcast_ref::<DynamicObject>() {
            return Ok(GetRequest::dynamic(dynamic_gvk(dynamic)?, key));
        }
        GetRequest::typed::<K>(scheme, key)
    }

    pub fn gvk(&self) -> &GroupVersionKind {
        match &self.target {
            RequestTarget::Typed { gvk, .. } => gvk,
            RequestTarget::Dynamic(gvk) => gvk,
        }
    }
}

pub type GetRequestSet = HashSet<GetRequest>;

/// Request to patch an object.
pub struct PatchRequest {
    pub object: DynamicObject,
    pub patch: Patch<serde_json::Value>,
}

impl PatchRequest {
    pub fn from_object_and_provider(
        object: DynamicObject,
        provider: &dyn PatchProvider,
    ) -> Result<Self, Error> {
        let patch = provider.patch_for(&object)?;
        Ok(PatchRequest { object, patch })
    }
}

/// Computes the patch to send for an object.
pub trait PatchProvider: Send + Sync {
    fn patch_for(&self, obj: &DynamicObject) -> Result<Patch<serde_json::Value>, Error>;
}

/// Server-side applies every object as it is.
/// The field manager has to be set in the `PatchParams`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApplyAll;

impl PatchProvider for ApplyAll {
    fn patch_for(&self, obj: &DynamicObject) -> Result<Patch<serde_json::Value>, Error> {
        Ok(Patch::Apply(serde_json::to_value(obj)?))
    }
}

/// Options for listing objects
#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    /// Restricts the listing to a single namespace
    pub namespace: Option<String>,
    pub params: ListParams,
}

impl ListOptions {
    pub fn namespaced(namespace: &str) -> Self {
        ListOptions {
            namespace: Some(namespace.to_string()),
            ..Default::default()
        }
    }

    pub fn labels(mut self, selector: &str) -> Self {
        self.params = self.params.labels(selector);
        self
    }
}

#[async_trait]
pub trait Client: Send + Sync {
    /// Scheme used to resolve kinds of typed objects
    fn scheme(&self) -> &Scheme;

    async fn get(&self, gvk: &GroupVersionKind, key: &ObjectKey) -> Result<DynamicObject, Error>;

    async fn list(
        &self,
        gvk: &GroupVersionKind,
        opts: &ListOptions,
    ) -> Result<Vec<DynamicObject>, Error>;

    async fn create(&self, obj: &DynamicObject, pp: &PostParams) -> Result<DynamicObject, Error>;

    async fn update(&self, obj: &DynamicObject, pp: &PostParams) -> Result<DynamicObject, Error>;

    async fn patch(
        &self,
        obj: &DynamicObject,
        patch: &Patch<serde_json::Value>,
        pp: &PatchParams,
    ) -> Result<DynamicObject, Error>;

    /// Writes the status subresource of `obj`. Changes to anything but
    /// `status` are ignored.
    async fn update_status(
        &self,
        obj: &DynamicObject,
        pp: &PostParams,
    ) -> Result<DynamicObject, Error>;

    async fn patch_status(
        &self,
        obj: &DynamicObject,
        patch: &Patch<serde_json::Value>,
        pp: &PatchParams,
    ) -> Result<DynamicObject, Error>;

    async fn delete(&self, obj: &DynamicObject, dp: &DeleteParams) -> Result<(), Error>;

    async fn delete_all_of(
        &self,
        gvk: &GroupVersionKind,
        opts: &ListOptions,
        dp: &DeleteParams,
    ) -> Result<(), Error>;
}

/// Typed access to a [`Client`]
#[async_trait]
pub trait ClientExt: Client {
    async fn get_object<K>(&self, key: &ObjectKey) -> Result<K, Error>
    where
        K: DeserializeOwned + Send + 'static,
    {
        let gvk = self.scheme().gvk::<K>()?;
        let obj = self.get(&gvk, key).await?;
        Ok(self.scheme().from_dynamic(obj)?)
    }

    async fn list_objects<K>(&self, opts: &ListOptions) -> Result<Vec<K>, Error>
    where
        K: DeserializeOwned + Send + 'static,
    {
        let gvk = self.scheme().gvk::<K>()?;
        let objs = self.list(&gvk, opts).await?;
        let mut res = Vec::with_capacity(objs.len());
        for obj in objs {
            res.push(self.scheme().from_dynamic(obj)?);
        }
        Ok(res)
    }

    async fn create_object<K>(&self, obj: &K, pp: &PostParams) -> Result<K, Error>
    where
        K: Serialize + DeserializeOwned + Send + Sync + 'static,
    {
        let dynamic = self.scheme().to_dynamic(obj)?;
        let created = self.create(&dynamic, pp).await?;
        Ok(self.scheme().from_dynamic(created)?)
    }

    async fn update_object<K>(&self, obj: &K, pp: &PostParams) -> Result<K, Error>
    where
        K: Serialize + DeserializeOwned + Send + Sync + 'static,
    {
        let dynamic = self.scheme().to_dynamic(obj)?;
        let updated = self.update(&dynamic, pp).await?;
        Ok(self.scheme().from_dynamic(updated)?)
    }

    async fn update_object_status<K>(&self, obj: &K, pp: &PostParams) -> Result<K, Error>
    where
        K: Serialize + DeserializeOwned + Send + Sync + 'static,
    {
        let dynamic = self.scheme().to_dynamic(obj)?;
        let updated = self.update_status(&dynamic, pp).await?;
        Ok(self.scheme().from_dynamic(updated)?)
    }

    async fn delete_object<K>(&self, obj: &K, dp: &DeleteParams) -> Result<(), Error>
    where
        K: Serialize + Send + Sync + 'static,
    {
        let dynamic = self.scheme().to_dynamic(obj)?;
        self.delete(&dynamic, dp).await
    }

    async fn delete_all_objects<K>(&self, opts: &ListOptions, dp: &DeleteParams) -> Result<(), Error>
    where
        K: 'static,
    {
        let gvk = self.scheme().gvk::<K>()?;
        self.delete_all_of(&gvk, opts, dp).await
    }
}

impl<C: Client + ?Sized> ClientExt for C {}

/// [`Client`] backed by a `kube::Client`.
#[derive(Clone)]
pub struct KubeClient {
    client: kube::Client,
    scheme: Scheme,
}

impl KubeClient {
    pub fn new(client: kube::Client, scheme: Scheme) -> Self {
        KubeClient { client, scheme }
    }

    fn api(&self, gvk: &GroupVersionKind, namespace: Option<&str>) -> Api<DynamicObject> {
        let resource = ApiResource::from_gvk(gvk);
        match namespace {
            Some(ns) => Api::namespaced_with(self.client.clone(), ns, &resource),
            None => Api::all_with(self.client.clone(), &resource),
        }
    }

    fn api_for(&self, obj: &DynamicObject) -> Result<Api<DynamicObject>, Error> {
        let gvk = dynamic_gvk(obj)?;
        Ok(self.api(&gvk, obj.metadata.namespace.as_deref()))
    }
}

#[async_trait]
impl Client for KubeClient {
    fn scheme(&self) -> &Scheme {
        &self.scheme
    }

    async fn get(&self, gvk: &GroupVersionKind, key: &ObjectKey) -> Result<DynamicObject, Error> {
        let api = self.api(gvk, key.namespace.as_deref());
        Ok(api.get(&key.name).await?)
    }

    async fn list(
        &self,
        gvk: &GroupVersionKind,
        opts: &ListOptions,
    ) -> Result<Vec<DynamicObject>, Error> {
        let api = self.api(gvk, opts.namespace.as_deref());
        let list = api.list(&opts.params).await?;
        // list items come without apiVersion and kind
        Ok(list
            .items
            .into_iter()
            .map(|mut obj| {
                obj.types = Some(TypeMeta {
                    api_version: gvk.api_version(),
                    kind: gvk.kind.clone(),
                });
                obj
            })
            .collect())
    }

    async fn create(&self, obj: &DynamicObject, pp: &PostParams) -> Result<DynamicObject, Error> {
        Ok(self.api_for(obj)?.create(pp, obj).await?)
    }

    async fn update(&self, obj: &DynamicObject, pp: &PostParams) -> Result<DynamicObject, Error> {
        Ok(self.api_for(obj)?.replace(&obj.name_any(), pp, obj).await?)
    }

    async fn patch(
        &self,
        obj: &DynamicObject,
        patch: &Patch<serde_json::Value>,
        pp: &PatchParams,
    ) -> Result<DynamicObject, Error> {
        Ok(self.api_for(obj)?.patch(&obj.name_any(), pp, patch).await?)
    }

    async fn update_status(
        &self,
        obj: &DynamicObject,
        pp: &PostParams,
    ) -> Result<DynamicObject, Error> {
        let data = serde_json::to_vec(obj)?;
        Ok(self
            .api_for(obj)?
            .replace_status(&obj.name_any(), pp, data)
            .await?)
    }

    async fn patch_status(
        &self,
        obj: &DynamicObject,
        patch: &Patch<serde_json::Value>,
        pp: &PatchParams,
    ) -> Result<DynamicObject, Error> {
        Ok(self
            .api_for(obj)?
            .patch_status(&obj.name_any(), pp, patch)
            .await?)
    }

    async fn delete(&self, obj: &DynamicObject, dp: &DeleteParams) -> Result<(), Error> {
        self.api_for(obj)?.delete(&obj.name_any(), dp).await?;
        Ok(())
    }

    async fn delete_all_of(
        &self,
        gvk: &GroupVersionKind,
        opts: &ListOptions,
        dp: &DeleteParams,
    ) -> Result<(), Error> {
        let api = self.api(gvk, opts.namespace.as_deref());
        api.delete_collection(dp, &opts.params).await?;
        Ok(())
    }
}

/// Creates `objs` one after another, stopping at the first failure.
pub async fn create_multiple(
    c: &(impl Client + ?Sized),
    objs: &[DynamicObject],
    pp: &PostParams,
) -> Result<Vec<DynamicObject>, Error> {
    let mut created = Vec::with_capacity(objs.len());
    for obj in objs {
        let res = c.create(obj, pp).await;
        created.push(res.map_err(Error::for_object("creating", ObjectKey::from_object(obj)))?);
    }
    Ok(created)
}

/// Reads objects from `path` and creates them.
pub async fn create_multiple_from_file(
    c: &(impl Client + ?Sized),
    path: impl AsRef<Path>,
    pp: &PostParams,
) -> Result<Vec<DynamicObject>, Error> {
    let objs = unstructured::read_file(path)?;
    create_multiple(c, &objs, pp).await
}

/// Gets the object of every request, in order.
pub async fn get_multiple(
    c: &(impl Client + ?Sized),
    reqs: &[GetRequest],
) -> Result<Vec<DynamicObject>, Error> {
    let mut res = Vec::with_capacity(reqs.len());
    for req in reqs {
        let obj = c.get(req.gvk(), &req.key).await;
        res.push(obj.map_err(Error::for_object("getting", req.key.clone()))?);
    }
    Ok(res)
}

/// Reads objects from `path` and fetches their current state.
pub async fn get_multiple_from_file(
    c: &(impl Client + ?Sized),
    path: impl AsRef<Path>,
) -> Result<Vec<DynamicObject>, Error> {
    let objs = unstructured::read_file(path)?;
    let reqs = objs
        .iter()
        .map(|obj| {
            Ok(GetRequest::dynamic(
                dynamic_gvk(obj)?,
                ObjectKey::from_object(obj),
            ))
        })
        .collect::<Result<Vec<_>, Error>>()?;
    get_multiple(c, &reqs).await
}

pub async fn patch_multiple(
    c: &(impl Client + ?Sized),
    reqs: &[PatchRequest],
    pp: &PatchParams,
) -> Result<Vec<DynamicObject>, Error> {
    let mut res = Vec::with_capacity(reqs.len());
    for req in reqs {
        let obj = c.patch(&req.object, &req.patch, pp).await;
        res.push(obj.map_err(Error::for_object("patching", ObjectKey::from_object(&req.object)))?);
    }
    Ok(res)
}

/// Reads objects from `path` and patches each with the patch `provider` computes.
pub async fn patch_multiple_from_file(
    c: &(impl Client + ?Sized),
    path: impl AsRef<Path>,
    provider: &dyn PatchProvider,
    pp: &PatchParams,
) -> Result<Vec<DynamicObject>, Error> {
    let reqs = unstructured::read_file(path)?
        .into_iter()
        .map(|obj| PatchRequest::from_object_and_provider(obj, provider))
        .collect::<Result<Vec<_>, _>>()?;
    patch_multiple(c, &reqs, pp).await
}

pub async fn delete_multiple(
    c: &(impl Client + ?Sized),
    objs: &[DynamicObject],
    dp: &DeleteParams,
) -> Result<(), Error> {
    for obj in objs {
        let res = c.delete(obj, dp).await;
        res.map_err(Error::for_object("deleting", ObjectKey::from_object(obj)))?;
    }
    Ok(())
}

pub async fn delete_multiple_from_file(
    c: &(impl Client + ?Sized),
    path: impl AsRef<Path>,
    dp: &DeleteParams,
) -> Result<(), Error> {
    let objs = unstructured::read_file(path)?;
    delete_multiple(c, &objs, dp).await
}

pub fn has_finalizer<K: Resource>(obj: &K, finalizer: &str) -> bool {
    obj.finalizers().iter().any(|f| f == finalizer)
}

/// Adds `finalizer` unless present. Returns whether `obj` was modified.
pub fn add_finalizer<K: Resource>(obj: &mut K, finalizer: &str) -> bool {
    if has_finalizer(obj, finalizer) {
        return false;
    }
    obj.finalizers_mut().push(finalizer.to_string());
    true
}

/// Removes every occurrence of `finalizer`. Returns whether `obj` was modified.
pub fn remove_finalizer<K: Resource>(obj: &mut K, finalizer: &str) -> bool {
    let finalizers = obj.finalizers_mut();
    let before = finalizers.len();
    finalizers.retain(|f| f != finalizer);
    finalizers.len() != before
}

async fn patch_finalizers(
    c: &(impl Client + ?Sized),
    obj: &mut DynamicObject,
    finalizers: Vec<String>,
) -> Result<(), Error> {
    // resourceVersion turns the merge patch into an optimistic update
    let patch = Patch::Merge(json!({
        "metadata": {
            "finalizers": finalizers,
            "resourceVersion": obj.metadata.resource_version,
        }
    }));
    let key = ObjectKey::from_object(&*obj);
    let patched = c
        .patch(obj, &patch, &PatchParams::default())
        .await
        .map_err(Error::for_object("patching finalizers of", key))?;
    *obj = patched;
    Ok(())
}

/// Adds `finalizer` with a merge patch and stores the patched object in `obj`.
pub async fn patch_add_finalizer(
    c: &(impl Client + ?Sized),
    obj: &mut DynamicObject,
    finalizer: &str,
) -> Result<(), Error> {
    let mut finalizers = obj.finalizers().to_vec();
    finalizers.push(finalizer.to_string());
    patch_finalizers(c, obj, finalizers).await
}

/// Removes `finalizer` with a merge patch and stores the patched object in `obj`.
pub async fn patch_remove_finalizer(
    c: &(impl Client + ?Sized),
    obj: &mut DynamicObject,
    finalizer: &str,
) -> Result<(), Error> {
    let finalizers = obj
        .finalizers()
        .iter()
        .filter(|f| *f != finalizer)
        .cloned()
        .collect();
    patch_finalizers(c, obj, finalizers).await
}

/// Patches `finalizer` in unless present. Returns whether a patch was issued.
pub async fn patch_ensure_finalizer(
    c: &(impl Client + ?Sized),
    obj: &mut DynamicObject,
    finalizer: &str,
) -> Result<bool, Error> {
    if has_finalizer(obj, finalizer) {
        return Ok(false);
    }
    patch_add_finalizer(c, obj, finalizer).await?;
    Ok(true)
}

/// Patches `finalizer` out if present. Returns whether a patch was issued.
pub async fn patch_ensure_no_finalizer(
    c: &(impl Client + ?Sized),
    obj: &mut DynamicObject,
    finalizer: &str,
) -> Result<bool, Error> {
    if !has_finalizer(obj, finalizer) {
        return Ok(false);
    }
    patch_remove_finalizer(c, obj, finalizer).await?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memorystore::Store;
    use k8s_openapi::api::core::v1::{ConfigMap, Secret};
    use kube::api::ObjectMeta;
    use parking_lot::Mutex;

    fn config_map(ns: &str, name: &str) -> ConfigMap {
        ConfigMap {
            metadata: ObjectMeta {
                namespace: Some(ns.into()),
                name: Some(name.into()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn dynamic(value: serde_json::Value) -> DynamicObject {
        serde_json::from_value(value).unwrap()
    }

    /// Answers patches by applying the merge patch's finalizers.
    struct FinalizerPatcher {
        scheme: Scheme,
        patches: Mutex<Vec<serde_json::Value>>,
    }

    #[async_trait]
    impl Client for FinalizerPatcher {
        fn scheme(&self) -> &Scheme {
            &self.scheme
        }

        async fn get(&self, _: &GroupVersionKind, _: &ObjectKey) -> Result<DynamicObject, Error> {
            Err(Error::Unsupported("get"))
        }

        async fn list(
            &self,
            _: &GroupVersionKind,
            _: &ListOptions,
        ) -> Result<Vec<DynamicObject>, Error> {
            Err(Error::Unsupported("list"))
        }

        async fn create(&self, _: &DynamicObject, _: &PostParams) -> Result<DynamicObject, Error> {
            Err(Error::Unsupported("create"))
        }

        async fn update(&self, _: &DynamicObject, _: &PostParams) -> Result<DynamicObject, Error> {
            Err(Error::Unsupported("update"))
        }

        async fn patch(
            &self,
            obj: &DynamicObject,
            patch: &Patch<serde_json::Value>,
            _: &PatchParams,
        ) -> Result<DynamicObject, Error> {
            let body = match patch {
                Patch::Merge(body) => body.clone(),
                _ => return Err(Error::Unsupported("non-merge patch")),
            };
            let finalizers = serde_json::from_value(body["metadata"]["finalizers"].clone())?;
            self.patches.lock().push(body);
            let mut patched = obj.clone();
            patched.metadata.finalizers = Some(finalizers);
            Ok(patched)
        }

        async fn update_status(
            &self,
            _: &DynamicObject,
            _: &PostParams,
        ) -> Result<DynamicObject, Error> {
            Err(Error::Unsupported("update_status"))
        }

        async fn patch_status(
            &self,
            _: &DynamicObject,
            _: &Patch<serde_json::Value>,
            _: &PatchParams,
        ) -> Result<DynamicObject, Error> {
            Err(Error::Unsupported("patch_status"))
        }

        async fn delete(&self, _: &DynamicObject, _: &DeleteParams) -> Result<(), Error> {
            Err(Error::Unsupported("delete"))
        }

        async fn delete_all_of(
            &self,
            _: &GroupVersionKind,
            _: &ListOptions,
            _: &DeleteParams,
        ) -> Result<(), Error> {
            Err(Error::Unsupported("delete_all_of"))
        }
    }

    #[test]
    fn object_key_display() {
        assert_eq!(ObjectKey::namespaced("default", "a").to_string(), "default/a");
        assert_eq!(ObjectKey::cluster("node-1").to_string(), "node-1");
        assert_eq!(
            ObjectKey::from_object(&config_map("ns", "cm")),
            ObjectKey::namespaced("ns", "cm")
        );
    }

    #[test]
    fn object_refs_ignore_versions() {
        let scheme = Scheme::with_defaults();
        let cm = config_map("default", "cm");
        let set = object_ref_set_from_objects(&scheme, [&cm]).unwrap();
        assert!(references_object(&scheme, &set, &cm).unwrap());

        let as_dynamic = dynamic(json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": {"namespace": "default", "name": "cm"},
        }));
        assert!(references_object(&scheme, &set, &as_dynamic).unwrap());

        let secret_req =
            GetRequest::typed::<Secret>(&scheme, ObjectKey::namespaced("default", "cm")).unwrap();
        assert!(!references_get_request(&set, &secret_req));
    }

    #[test]
    fn get_request_set_keeps_typed_and_dynamic_apart() {
        let scheme = Scheme::with_defaults();
        let key = ObjectKey::namespaced("default", "cm");
        let typed = GetRequest::typed::<ConfigMap>(&scheme, key.clone()).unwrap();
        let dynamic = GetRequest::dynamic(GroupVersionKind::gvk("", "v1", "ConfigMap"), key);

        let mut set = GetRequestSet::new();
        set.insert(typed.clone());
        set.insert(typed.clone());
        set.insert(dynamic.clone());
        assert_eq!(set.len(), 2);

        // both refer to the same object though
        let refs = object_ref_set_from_get_requests(&set);
        assert_eq!(refs.len(), 1);

        assert_eq!(
            GetRequest::from_object(&scheme, &config_map("default", "cm")).unwrap(),
            typed
        );
    }

    #[test]
    fn finalizers_on_objects() {
        let mut cm = config_map("default", "cm");
        assert!(add_finalizer(&mut cm, "example.org/cleanup"));
        assert!(!add_finalizer(&mut cm, "example.org/cleanup"));
        assert!(has_finalizer(&cm, "example.org/cleanup"));
        assert!(remove_finalizer(&mut cm, "example.org/cleanup"));
        assert!(!remove_finalizer(&mut cm, "example.org/cleanup"));
        assert!(cm.finalizers().is_empty());
    }

    #[tokio::test]
    async fn ensure_finalizer_patches_only_when_needed() {
        let client = FinalizerPatcher {
            scheme: Scheme::new(),
            patches: Mutex::new(Vec::new()),
        };
        let mut obj = dynamic(json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": {"namespace": "default", "name": "cm", "resourceVersion": "5"},
        }));

        assert!(patch_ensure_finalizer(&client, &mut obj, "a").await.unwrap());
        assert!(!patch_ensure_finalizer(&client, &mut obj, "a").await.unwrap());
        assert_eq!(obj.finalizers(), ["a".to_string()]);
        assert!(patch_ensure_no_finalizer(&client, &mut obj, "a").await.unwrap());
        assert!(!patch_ensure_no_finalizer(&client, &mut obj, "a").await.unwrap());
        assert!(obj.finalizers().is_empty());

        let patches = client.patches.lock();
        assert_eq!(patches.len(), 2);
        assert_eq!(
            patches[0],
            json!({"metadata": {"finalizers": ["a"], "resourceVersion": "5"}})
        );
    }

    #[tokio::test]
    async fn batch_errors_name_the_object() {
        let store = Store::new(Scheme::with_defaults());
        let objs = unstructured::read_str(include_str!("../testdata/objects.yaml")).unwrap();
        let created = create_multiple(&store, &objs, &PostParams::default())
            .await
            .unwrap();
        assert_eq!(created.len(), 2);

        let err = create_multiple(&store, &objs, &PostParams::default())
            .await
            .unwrap_err();
        assert_eq!(err.class(), ErrorClass::AlreadyExists);
        assert!(err.to_string().contains("default/my-secret"));

        let reqs = objs
            .iter()
            .map(|obj| GetRequest::from_object(store.scheme(), obj).unwrap())
            .collect::<Vec<_>>();
        let fetched = get_multiple(&store, &reqs).await.unwrap();
        assert_eq!(fetched, objs);

        delete_multiple(&store, &objs, &DeleteParams::default())
            .await
            .unwrap();
        let err = get_multiple(&store, &reqs).await.unwrap_err();
        assert_eq!(err.class(), ErrorClass::NotFound);
    }

    #[tokio::test]
    async fn patching_the_store_is_unsupported() {
        let store = Store::new(Scheme::with_defaults());
        let objs = unstructured::read_str(include_str!("../testdata/objects.yaml")).unwrap();
        let reqs = objs
            .into_iter()
            .map(|obj| PatchRequest::from_object_and_provider(obj, &ApplyAll).unwrap())
            .collect::<Vec<_>>();
        let err = patch_multiple(&store, &reqs, &PatchParams::apply("test"))
            .await
            .unwrap_err();
        assert_eq!(err.class(), ErrorClass::Unsupported);
    }
}
