//! Field indexes shared between independent users of one cache.
//!
//! Several controllers often want the same index (e.g. pods by node name).
//! They register the extraction function once on a [`SharedFieldIndexer`];
//! whoever needs the index calls [`SharedFieldIndexer::index_field`], and the
//! underlying [`FieldIndexer`] sees each index exactly once.
use crate::scheme::{self, Scheme};
use async_trait::async_trait;
use kube::{
    api::{DynamicObject, GroupVersionKind},
    core::PartialObjectMeta,
};
use std::{
    any::{Any, TypeId},
    collections::HashMap,
    sync::Arc,
};

/// Extracts the values an object is indexed under
pub type IndexerFn<K> = Arc<dyn Fn(&K) -> Vec<String> + Send + Sync>;

/// Object as seen by a metadata-only watch
pub type MetadataObject = PartialObjectMeta<DynamicObject>;

/// Something that can build field indexes, usually an informer cache.
#[async_trait]
pub trait FieldIndexer: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    async fn index_field<K>(
        &self,
        gvk: &GroupVersionKind,
        field: &str,
        extract: IndexerFn<K>,
    ) -> Result<(), Self::Error>
    where
        K: Send + Sync + 'static;
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("indexer for {kind} field {field} already registered")]
    AlreadyRegistered { kind: String, field: String },
    #[error("unknown field {field} for {kind}")]
    UnknownField { kind: String, field: String },
    #[error(transparent)]
    Scheme(#[from] scheme::Error),
    #[error("failed to index {kind} field {field}: {source}")]
    Indexer {
        kind: String,
        field: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// Typed, dynamic and metadata-only objects of the same kind get separate
/// indexes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Representation {
    Typed(TypeId),
    Dynamic,
    Metadata,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct IndexKey {
    representation: Representation,
    gvk: GroupVersionKind,
}

impl IndexKey {
    fn describe(&self) -> String {
        let kind = format!("{}/{}", self.gvk.api_version(), self.gvk.kind);
        match self.representation {
            Representation::Typed(_) => kind,
            Representation::Dynamic => format!("{} (dynamic)", kind),
            Representation::Metadata => format!("{} (metadata)", kind),
        }
    }
}

struct Entry {
    initialized: bool,
    /// `IndexerFn<K>` for the `K` of the key
    extract: Box<dyn Any + Send + Sync>,
}

pub struct SharedFieldIndexer<I> {
    indexer: I,
    scheme: Scheme,
    entries: HashMap<IndexKey, HashMap<String, Entry>>,
}

impl<I: FieldIndexer> SharedFieldIndexer<I> {
    pub fn new(indexer: I, scheme: Scheme) -> Self {
        SharedFieldIndexer {
            indexer,
            scheme,
            entries: HashMap::new(),
        }
    }

    fn typed_key<K: 'static>(&self) -> Result<IndexKey, Error> {
        Ok(IndexKey {
            representation: Representation::Typed(TypeId::of::<K>()),
            gvk: self.scheme.gvk::<K>()?,
        })
    }

    fn dynamic_key(gvk: &GroupVersionKind) -> IndexKey {
        IndexKey {
            representation: Representation::Dynamic,
            gvk: gvk.clone(),
        }
    }

    fn metadata_key(gvk: &GroupVersionKind) -> IndexKey {
        IndexKey {
            representation: Representation::Metadata,
            gvk: gvk.clone(),
        }
    }

    fn insert<K: Send + Sync + 'static>(
        &mut self,
        key: IndexKey,
        field: &str,
        extract: IndexerFn<K>,
    ) -> Result<(), Error> {
        let fields = self.entries.entry(key.clone()).or_default();
        if fields.contains_key(field) {
            return Err(Error::AlreadyRegistered {
                kind: key.describe(),
                field: field.to_string(),
            });
        }
        fields.insert(
            field.to_string(),
            Entry {
                initialized: false,
                extract: Box::new(extract),
            },
        );
        Ok(())
    }

    /// Registers the index `field` for the typed objects `K`.
    pub fn register<K, F>(&mut self, field: &str, extract: F) -> Result<(), Error>
    where
        K: Send + Sync + 'static,
        F: Fn(&K) -> Vec<String> + Send + Sync + 'static,
    {
        let key = self.typed_key::<K>()?;
        self.insert::<K>(key, field, Arc::new(extract))
    }

    pub fn must_register<K, F>(&mut self, field: &str, extract: F)
    where
        K: Send + Sync + 'static,
        F: Fn(&K) -> Vec<String> + Send + Sync + 'static,
    {
        if let Err(err) = self.register(field, extract) {
            panic!("{}", err);
        }
    }

    /// Registers the index `field` for dynamic objects of kind `gvk`.
    pub fn register_dynamic<F>(
        &mut self,
        gvk: &GroupVersionKind,
        field: &str,
        extract: F,
    ) -> Result<(), Error>
    where
        F: Fn(&DynamicObject) -> Vec<String> + Send + Sync + 'static,
    {
        self.insert::<DynamicObject>(Self::dynamic_key(gvk), field, Arc::new(extract))
    }

    pub fn must_register_dynamic<F>(&mut self, gvk: &GroupVersionKind, field: &str, extract: F)
    where
        F: Fn(&DynamicObject) -> Vec<String> + Send + Sync + 'static,
    {
        if let Err(err) = self.register_dynamic(gvk, field, extract) {
            panic!("{}", err);
        }
    }

    /// Registers the index `field` for metadata-only objects of kind `gvk`.
    pub fn register_metadata<F>(
        &mut self,
        gvk: &GroupVersionKind,
        field: &str,
        extract: F,
    ) -> Result<(), Error>
    where
        F: Fn(&MetadataObject) -> Vec<String> + Send + Sync + 'static,
    {
        self.insert::<MetadataObject>(Self::metadata_key(gvk), field, Arc::new(extract))
    }

    pub fn must_register_metadata<F>(&mut self, gvk: &GroupVersionKind, field: &str, extract: F)
    where
        F: Fn(&MetadataObject) -> Vec<String> + Send + Sync + 'static,
    {
        if let Err(err) = self.register_metadata(gvk, field, extract) {
            panic!("{}", err);
        }
    }

    async fn index<K: Send + Sync + 'static>(
        &mut self,
        key: IndexKey,
        field: &str,
    ) -> Result<(), Error> {
        let unknown = || Error::UnknownField {
            kind: key.describe(),
            field: field.to_string(),
        };
        let entry = self
            .entries
            .get_mut(&key)
            .and_then(|fields| fields.get_mut(field))
            .ok_or_else(unknown)?;
        if entry.initialized {
            return Ok(());
        }
        let extract = entry
            .extract
            .downcast_ref::<IndexerFn<K>>()
            .cloned()
            .ok_or_else(unknown)?;

        tracing::debug!("indexing {} field {}", key.describe(), field);
        self.indexer
            .index_field::<K>(&key.gvk, field, extract)
            .await
            .map_err(|source| Error::Indexer {
                kind: key.describe(),
                field: field.to_string(),
                source: Box::new(source),
            })?;
        entry.initialized = true;
        Ok(())
    }

    /// Makes sure the index `field` of `K` exists in the underlying indexer.
    /// Fails if nobody registered it.
    pub async fn index_field<K: Send + Sync + 'static>(&mut self, field: &str) -> Result<(), Error> {
        let key = self.typed_key::<K>()?;
        self.index::<K>(key, field).await
    }

    pub async fn index_dynamic_field(
        &mut self,
        gvk: &GroupVersionKind,
        field: &str,
    ) -> Result<(), Error> {
        self.index::<DynamicObject>(Self::dynamic_key(gvk), field)
            .await
    }

    pub async fn index_metadata_field(
        &mut self,
        gvk: &GroupVersionKind,
        field: &str,
    ) -> Result<(), Error> {
        self.index::<MetadataObject>(Self::metadata_key(gvk), field)
            .await
    }

    pub fn indexer(&self) -> &I {
        &self.indexer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{ConfigMap, Pod};
    use parking_lot::Mutex;

    #[derive(Debug, thiserror::Error)]
    #[error("indexer is broken")]
    struct Broken;

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<String>>,
        fail: bool,
    }

    #[async_trait]
    impl FieldIndexer for Recorder {
        type Error = Broken;

        async fn index_field<K>(
            &self,
            gvk: &GroupVersionKind,
            field: &str,
            _extract: IndexerFn<K>,
        ) -> Result<(), Broken>
        where
            K: Send + Sync + 'static,
        {
            if self.fail {
                return Err(Broken);
            }
            self.calls
                .lock()
                .push(format!("{} {}", gvk.kind, field));
            Ok(())
        }
    }

    fn node_name(pod: &Pod) -> Vec<String> {
        pod.spec
            .as_ref()
            .and_then(|spec| spec.node_name.clone())
            .into_iter()
            .collect()
    }

    fn shared(fail: bool) -> SharedFieldIndexer<Recorder> {
        SharedFieldIndexer::new(
            Recorder {
                fail,
                ..Default::default()
            },
            Scheme::with_defaults(),
        )
    }

    #[tokio::test]
    async fn indexes_once() {
        let mut indexer = shared(false);
        indexer.register::<Pod, _>("spec.nodeName", node_name).unwrap();

        indexer.index_field::<Pod>("spec.nodeName").await.unwrap();
        indexer.index_field::<Pod>("spec.nodeName").await.unwrap();
        assert_eq!(*indexer.indexer().calls.lock(), ["Pod spec.nodeName"]);
    }

    #[tokio::test]
    async fn unknown_fields_fail() {
        let mut indexer = shared(false);
        indexer.register::<Pod, _>("spec.nodeName", node_name).unwrap();

        assert!(matches!(
            indexer.index_field::<Pod>("spec.other").await,
            Err(Error::UnknownField { .. })
        ));
        assert!(matches!(
            indexer.index_field::<ConfigMap>("spec.nodeName").await,
            Err(Error::UnknownField { .. })
        ));
        // the dynamic representation is separate
        let gvk = GroupVersionKind::gvk("", "v1", "Pod");
        assert!(matches!(
            indexer.index_dynamic_field(&gvk, "spec.nodeName").await,
            Err(Error::UnknownField { .. })
        ));
        assert!(indexer.indexer().calls.lock().is_empty());
    }

    #[tokio::test]
    async fn typed_and_dynamic_registrations_are_independent() {
        let mut indexer = shared(false);
        let gvk = GroupVersionKind::gvk("", "v1", "Pod");
        indexer.register::<Pod, _>("spec.nodeName", node_name).unwrap();
        indexer
            .register_dynamic(&gvk, "spec.nodeName", |obj| {
                obj.data["spec"]["nodeName"]
                    .as_str()
                    .map(String::from)
                    .into_iter()
                    .collect()
            })
            .unwrap();

        assert!(matches!(
            indexer.register::<Pod, _>("spec.nodeName", node_name),
            Err(Error::AlreadyRegistered { .. })
        ));

        indexer.index_field::<Pod>("spec.nodeName").await.unwrap();
        indexer.index_dynamic_field(&gvk, "spec.nodeName").await.unwrap();
        assert_eq!(indexer.indexer().calls.lock().len(), 2);
    }

    fn app_label(obj: &MetadataObject) -> Vec<String> {
        obj.metadata
            .labels
            .as_ref()
            .and_then(|labels| labels.get("app").cloned())
            .into_iter()
            .collect()
    }

    #[tokio::test]
    async fn metadata_registrations_are_separate() {
        let mut indexer = shared(false);
        let gvk = GroupVersionKind::gvk("", "v1", "Pod");
        indexer
            .register_dynamic(&gvk, "metadata.labels.app", |obj| {
                obj.metadata
                    .labels
                    .as_ref()
                    .and_then(|labels| labels.get("app").cloned())
                    .into_iter()
                    .collect()
            })
            .unwrap();
        match indexer.index_metadata_field(&gvk, "metadata.labels.app").await {
            Err(Error::UnknownField { kind, .. }) => assert_eq!(kind, "v1/Pod (metadata)"),
            other => panic!("unexpected result {:?}", other),
        }

        indexer
            .register_metadata(&gvk, "metadata.labels.app", app_label)
            .unwrap();
        assert!(matches!(
            indexer.register_metadata(&gvk, "metadata.labels.app", app_label),
            Err(Error::AlreadyRegistered { .. })
        ));

        indexer.index_metadata_field(&gvk, "metadata.labels.app").await.unwrap();
        indexer.index_metadata_field(&gvk, "metadata.labels.app").await.unwrap();
        indexer.index_dynamic_field(&gvk, "metadata.labels.app").await.unwrap();
        assert_eq!(
            *indexer.indexer().calls.lock(),
            ["Pod metadata.labels.app", "Pod metadata.labels.app"]
        );
    }

    #[test]
    #[should_panic(expected = "already registered")]
    fn must_register_metadata_panics_on_duplicates() {
        let mut indexer = shared(false);
        let gvk = GroupVersionKind::gvk("", "v1", "Pod");
        indexer.must_register_metadata(&gvk, "metadata.labels.app", app_label);
        indexer.must_register_metadata(&gvk, "metadata.labels.app", app_label);
    }

    #[test]
    fn unregistered_types_fail() {
        let mut indexer = SharedFieldIndexer::new(Recorder::default(), Scheme::new());
        assert!(matches!(
            indexer.register::<Pod, _>("spec.nodeName", node_name),
            Err(Error::Scheme(_))
        ));
    }

    #[tokio::test]
    async fn failed_indexing_is_retried() {
        let mut indexer = shared(true);
        indexer.register::<Pod, _>("spec.nodeName", node_name).unwrap();
        let err = indexer.index_field::<Pod>("spec.nodeName").await.unwrap_err();
        assert!(err.to_string().contains("indexer is broken"));

        indexer.indexer.fail = false;
        indexer.index_field::<Pod>("spec.nodeName").await.unwrap();
        assert_eq!(indexer.indexer().calls.lock().len(), 1);
    }

    #[test]
    #[should_panic(expected = "already registered")]
    fn must_register_panics_on_duplicates() {
        let mut indexer = shared(false);
        indexer.must_register::<Pod, _>("spec.nodeName", node_name);
        indexer.must_register::<Pod, _>("spec.nodeName", node_name);
    }
}
