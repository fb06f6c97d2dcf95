//! Helpers working with object metadata.
use crate::scheme::{self, parse_api_version, Scheme};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::api::Resource;

/// The owner reference marked as controller, if any.
pub fn controller_of<K: Resource>(obj: &K) -> Option<&OwnerReference> {
    obj.meta()
        .owner_references
        .as_ref()?
        .iter()
        .find(|r| r.controller == Some(true))
}

/// Checks whether `controlled` has a controller reference pointing at `owner`.
/// Kind, api version, name and uid all have to match.
pub fn is_controlled_by<O, C>(scheme: &Scheme, owner: &O, controlled: &C) -> Result<bool, scheme::Error>
where
    O: Resource + 'static,
    C: Resource,
{
    let controller = match controller_of(controlled) {
        Some(controller) => controller,
        None => return Ok(false),
    };

    let gvk = scheme.gvk_for(owner)?;
    let (group, version) = parse_api_version(&controller.api_version)?;
    let owner_meta = owner.meta();
    Ok(group == gvk.group
        && version == gvk.version
        && controller.kind == gvk.kind
        && owner_meta.name.as_ref() == Some(&controller.name)
        && owner_meta.uid.as_ref() == Some(&controller.uid))
}

/// Keeps the objects controlled by `owner`.
pub fn filter_controlled_by<O, C>(
    scheme: &Scheme,
    owner: &O,
    objects: impl IntoIterator<Item = C>,
) -> Result<Vec<C>, scheme::Error>
where
    O: Resource + 'static,
    C: Resource,
{
    let mut filtered = Vec::new();
    for obj in objects {
        if is_controlled_by(scheme, owner, &obj)? {
            filtered.push(obj);
        }
    }
    Ok(filtered)
}
