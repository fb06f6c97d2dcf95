//! Loading cluster connection settings.
use anyhow::Context as _;
use kube::config::{KubeConfigOptions, Kubeconfig};
use std::path::PathBuf;

const KUBECONFIG_ENV: &str = "KUBECONFIG";

#[derive(Debug, Clone, Default)]
pub struct GetConfigOptions {
    /// Kubeconfig context to use instead of the current one
    pub context: Option<String>,
    /// Explicit kubeconfig file
    pub kubeconfig: Option<PathBuf>,
}

/// Command line flags selecting the kubeconfig.
#[derive(clap::Args, Debug, Clone, Default)]
pub struct KubeconfigArgs {
    /// Path to a kubeconfig file
    #[arg(long)]
    pub kubeconfig: Option<PathBuf>,
    /// Kubeconfig context to use
    #[arg(long)]
    pub context: Option<String>,
}

impl From<KubeconfigArgs> for GetConfigOptions {
    fn from(args: KubeconfigArgs) -> Self {
        GetConfigOptions {
            context: args.context,
            kubeconfig: args.kubeconfig,
        }
    }
}

/// Resolves the configuration to talk to the cluster.
///
/// An explicit kubeconfig always wins. Otherwise the in-cluster configuration
/// is tried unless `KUBECONFIG` is set, and finally the default kubeconfig
/// loading rules apply.
pub async fn get_config(opts: GetConfigOptions) -> anyhow::Result<kube::Config> {
    let kube_opts = KubeConfigOptions {
        context: opts.context.clone(),
        ..Default::default()
    };

    if let Some(path) = &opts.kubeconfig {
        tracing::debug!("loading kubeconfig from {}", path.display());
        let kubeconfig = Kubeconfig::read_from(path)
            .with_context(|| format!("failed to read kubeconfig {}", path.display()))?;
        return kube::Config::from_custom_kubeconfig(kubeconfig, &kube_opts)
            .await
            .context("invalid kubeconfig");
    }

    if std::env::var_os(KUBECONFIG_ENV).map_or(true, |v| v.is_empty()) {
        match kube::Config::incluster() {
            Ok(config) => return Ok(config),
            Err(err) => tracing::debug!("not using in-cluster config: {}", err),
        }
    }

    kube::Config::from_kubeconfig(&kube_opts)
        .await
        .context("failed to load kubeconfig")
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn fixture() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("testdata/kubeconfig.yaml")
    }

    #[tokio::test]
    async fn explicit_kubeconfig() {
        let config = get_config(GetConfigOptions {
            kubeconfig: Some(fixture()),
            ..Default::default()
        })
        .await
        .unwrap();
        assert_eq!(config.cluster_url.host(), Some("alpha.example.com"));
        assert_eq!(config.default_namespace, "alpha-system");

        let config = get_config(GetConfigOptions {
            kubeconfig: Some(fixture()),
            context: Some("beta".into()),
        })
        .await
        .unwrap();
        assert_eq!(config.cluster_url.host(), Some("beta.example.com"));
        assert_eq!(config.default_namespace, "default");
    }

    #[tokio::test]
    async fn bad_explicit_kubeconfig() {
        assert!(get_config(GetConfigOptions {
            kubeconfig: Some(fixture()),
            context: Some("gamma".into()),
        })
        .await
        .is_err());

        assert!(get_config(GetConfigOptions {
            kubeconfig: Some("/nonexistent/kubeconfig".into()),
            ..Default::default()
        })
        .await
        .is_err());
    }

    #[derive(Parser)]
    struct Cli {
        #[command(flatten)]
        kubeconfig: KubeconfigArgs,
    }

    #[test]
    fn flags() {
        let cli = Cli::parse_from(["manager", "--kubeconfig", "/etc/kube.yaml", "--context", "beta"]);
        let opts = GetConfigOptions::from(cli.kubeconfig);
        assert_eq!(opts.kubeconfig, Some(PathBuf::from("/etc/kube.yaml")));
        assert_eq!(opts.context.as_deref(), Some("beta"));
    }
}
