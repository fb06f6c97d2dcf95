//! Running `kustomize build` and decoding its output.
use crate::{
    scheme::{self, Scheme},
    toolchain, unstructured,
};
use kube::api::DynamicObject;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Exec(#[from] toolchain::Error),
    #[error("failed to write kustomization: {0}")]
    Write(#[source] std::io::Error),
    #[error("failed to encode kustomization: {0}")]
    Encode(#[from] serde_yaml::Error),
    #[error("invalid kustomize output: {0}")]
    Output(#[from] unstructured::Error),
    #[error("error decoding object: {0}")]
    Decode(#[from] scheme::Error),
}

/// Image override of a kustomization
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Image {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
}

/// Contents of a `kustomization.yaml`.
///
/// Only the commonly used fields are modelled, everything else ends up in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Kustomization {
    pub api_version: String,
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_suffix: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resources: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub components: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub common_labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub common_annotations: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub patches: Vec<serde_yaml::Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<Image>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

impl Default for Kustomization {
    fn default() -> Self {
        Kustomization {
            api_version: "kustomize.config.k8s.io/v1beta1".to_string(),
            kind: "Kustomization".to_string(),
            namespace: None,
            name_prefix: None,
            name_suffix: None,
            resources: Vec::new(),
            components: Vec::new(),
            common_labels: BTreeMap::new(),
            common_annotations: BTreeMap::new(),
            patches: Vec::new(),
            images: Vec::new(),
            extra: BTreeMap::new(),
        }
    }
}

/// Invokes kustomize. The directory to build is passed as last argument.
#[derive(Debug, Clone)]
pub struct Kustomizer {
    pub binary: PathBuf,
    pub args: Vec<String>,
}

impl Default for Kustomizer {
    fn default() -> Self {
        Kustomizer {
            binary: PathBuf::from("kustomize"),
            args: vec!["build".to_string()],
        }
    }
}

impl Kustomizer {
    /// Builds the kustomization in `dir`.
    ///
    /// A failing build ends up as [`toolchain::Error::Command`] carrying
    /// everything kustomize printed.
    pub fn build_dir(&self, dir: impl AsRef<Path>) -> Result<Vec<DynamicObject>, Error> {
        let dir = dir.as_ref().to_string_lossy();
        let mut args = self.args.iter().map(String::as_str).collect::<Vec<_>>();
        args.push(&dir[..]);
        let stdout = toolchain::exec_command_output(None, &self.binary, &args)?;
        Ok(unstructured::read_str(&String::from_utf8_lossy(&stdout))?)
    }

    /// Writes `kustomization` into a temporary directory and builds it.
    /// Relative resource paths therefore only work for remote resources.
    pub fn build(&self, kustomization: &Kustomization) -> Result<Vec<DynamicObject>, Error> {
        let data = serde_yaml::to_string(kustomization)?;
        let dir = tempfile::tempdir().map_err(Error::Write)?;
        std::fs::write(dir.path().join("kustomization.yaml"), data).map_err(Error::Write)?;

        let res = self.build_dir(dir.path());
        if let Err(err) = dir.close() {
            tracing::warn!("failed to remove kustomization directory: {:#}", err);
        }
        res
    }
}

/// Converts built objects into `K`, failing on objects of another kind.
pub fn decode_objects<K: DeserializeOwned + 'static>(
    scheme: &Scheme,
    objs: Vec<DynamicObject>,
) -> Result<Vec<K>, Error> {
    objs.into_iter()
        .map(|obj| scheme.from_dynamic(obj).map_err(Error::from))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::ConfigMap;

    fn fake(script: &str) -> Kustomizer {
        Kustomizer {
            binary: PathBuf::from("sh"),
            args: vec!["-c".to_string(), script.to_string()],
        }
    }

    #[test]
    fn kustomization_yaml_shape() {
        let kustomization = Kustomization {
            namespace: Some("prod".into()),
            resources: vec!["github.com/example/repo/config?ref=v1".into()],
            common_labels: [("app".to_string(), "web".to_string())].into(),
            extra: [(
                "replicas".to_string(),
                serde_yaml::from_str("[{name: web, count: 2}]").unwrap(),
            )]
            .into(),
            ..Default::default()
        };
        let yaml = serde_yaml::to_string(&kustomization).unwrap();
        let value: serde_yaml::Value = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(value["apiVersion"], "kustomize.config.k8s.io/v1beta1");
        assert_eq!(value["kind"], "Kustomization");
        assert_eq!(value["commonLabels"]["app"], "web");
        assert_eq!(value["replicas"][0]["count"], 2);
        assert!(value.get("images").is_none());

        let back: Kustomization = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back, kustomization);
    }

    #[test]
    fn builds_generated_directory() {
        let kustomizer = fake(
            r#"grep -q example/repo "$0/kustomization.yaml" && printf 'apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: built\n'"#,
        );
        let objs = kustomizer
            .build(&Kustomization {
                resources: vec!["github.com/example/repo".into()],
                ..Default::default()
            })
            .unwrap();
        assert_eq!(objs.len(), 1);

        let cms: Vec<ConfigMap> = decode_objects(&Scheme::with_defaults(), objs).unwrap();
        assert_eq!(cms[0].metadata.name.as_deref(), Some("built"));
    }

    #[test]
    fn failing_build_reports_output() {
        let err = fake("echo 'building'; echo 'no kustomization here' >&2; exit 1")
            .build_dir("/tmp")
            .unwrap_err();
        match err {
            Error::Exec(toolchain::Error::Command { command, output }) => {
                assert!(command.ends_with(" /tmp"), "{}", command);
                assert_eq!(output, "building\nno kustomization here\n");
            }
            other => panic!("unexpected error {:?}", other),
        }

        let missing = Kustomizer {
            binary: PathBuf::from("/nonexistent/kustomize"),
            ..Default::default()
        };
        assert!(matches!(
            missing.build_dir("/tmp"),
            Err(Error::Exec(toolchain::Error::Spawn { .. }))
        ));
    }

    #[test]
    fn decoding_rejects_other_kinds() {
        let objs = unstructured::read_str(include_str!("../testdata/objects.yaml")).unwrap();
        assert!(matches!(
            decode_objects::<ConfigMap>(&Scheme::with_defaults(), objs),
            Err(Error::Decode(_))
        ));
    }
}
