use std::path::PathBuf;

use anyhow::Context as _;
use clap::Parser;
use controller_utils::{
    client::{add_finalizer, create_multiple_from_file, Client, ClientExt, KubeClient, ListOptions},
    conditions::{Accessor, ConditionStatus, UpdateMessage, UpdateReason, UpdateStatus},
    config::{get_config, KubeconfigArgs},
    memorystore::Store,
    scheme::Scheme,
    switches::{self, Switches, SwitchesParser},
};
use k8s_openapi::api::{apps::v1::Deployment, core::v1::ConfigMap};
use kube::api::{PostParams, ResourceExt};

const DEPLOYMENT_CONDITIONS: &str = "deployment-conditions";
const CONFIGMAP_FINALIZER: &str = "configmap-finalizer";

const RECONCILED: &str = "Reconciled";
const FINALIZER: &str = "example.io/protect";
const PROTECT_LABEL: &str = "example.io/protect";

fn controllers() -> Switches {
    Switches::new([
        DEPLOYMENT_CONDITIONS.to_string(),
        switches::disable(CONFIGMAP_FINALIZER),
    ])
}

/// Runs a single reconciliation pass of the enabled controllers.
#[derive(Parser, Debug)]
struct Args {
    /// Controllers to run, e.g. `*,configmap-finalizer`
    #[arg(long, value_parser = SwitchesParser::new(controllers()), default_value = switches::ALL)]
    controllers: Switches,
    /// Print the known controllers and exit
    #[arg(long)]
    list: bool,
    /// Work on an in-memory store seeded from this file instead of a cluster
    #[arg(long)]
    objects: Option<PathBuf>,
    #[arg(long, default_value = "default")]
    namespace: String,
    #[command(flatten)]
    kubeconfig: KubeconfigArgs,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
    let args = Args::parse();

    if args.list {
        let enabled = args.controllers.enabled_by_default();
        for name in args.controllers.all() {
            let default = if enabled.contains(&name) { "on" } else { "off" };
            println!("{} (default: {})", name, default);
        }
        return Ok(());
    }

    let scheme = Scheme::with_defaults();
    let client: Box<dyn Client> = match &args.objects {
        Some(path) => {
            let store = Store::new(scheme);
            create_multiple_from_file(&store, path, &PostParams::default())
                .await
                .with_context(|| format!("failed to load objects from {}", path.display()))?;
            Box::new(store)
        }
        None => {
            let config = get_config(args.kubeconfig.clone().into()).await?;
            let client = kube::Client::try_from(config).context("failed to create client")?;
            Box::new(KubeClient::new(client, scheme))
        }
    };

    tracing::info!("running controllers {}", args.controllers);
    let opts = ListOptions::namespaced(&args.namespace);
    if args.controllers.enabled(DEPLOYMENT_CONDITIONS) {
        reconcile_deployments(&*client, &opts)
            .await
            .context("deployment conditions failed")?;
    }
    if args.controllers.enabled(CONFIGMAP_FINALIZER) {
        protect_configmaps(&*client, &opts)
            .await
            .context("configmap finalizers failed")?;
    }
    Ok(())
}

/// Marks every deployment with a `Reconciled` condition.
async fn reconcile_deployments(client: &dyn Client, opts: &ListOptions) -> anyhow::Result<()> {
    let accessor = Accessor::default();
    for mut deployment in client.list_objects::<Deployment>(opts).await? {
        let available = deployment
            .status
            .as_ref()
            .and_then(|s| s.available_replicas)
            .unwrap_or_default();
        let (status, reason) = if available > 0 {
            (ConditionStatus::True, "Available")
        } else {
            (ConditionStatus::False, "NoReplicas")
        };

        let conditions = &mut deployment.status.get_or_insert_with(Default::default).conditions;
        accessor.update_optional_slice(
            conditions,
            RECONCILED,
            &[
                &UpdateStatus(status),
                &UpdateReason(reason.to_string()),
                &UpdateMessage(format!("{} available replicas", available)),
            ],
        )?;
        client
            .update_object_status(&deployment, &PostParams::default())
            .await?;
        tracing::info!("deployment {}: {} is {}", deployment.name_any(), RECONCILED, status);
    }
    Ok(())
}

/// Adds a finalizer to every labelled config map.
async fn protect_configmaps(client: &dyn Client, opts: &ListOptions) -> anyhow::Result<()> {
    let opts = opts.clone().labels(PROTECT_LABEL);
    for mut cm in client.list_objects::<ConfigMap>(&opts).await? {
        if add_finalizer(&mut cm, FINALIZER) {
            client.update_object(&cm, &PostParams::default()).await?;
            tracing::info!("protected configmap {}", cm.name_any());
        }
    }
    Ok(())
}
