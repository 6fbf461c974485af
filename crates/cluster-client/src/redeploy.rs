//! Idempotent redeploy via a host-alias generation marker
//!
//! Changing anything in a Deployment's pod template rolls its pods. The
//! redeploy keeps a synthetic hostname `deployment-<N>.redeploy.local` on the
//! loopback host alias and bumps `<N>` each time, so every call produces a
//! distinct template and therefore a rollout.

use crate::error::ClientError;
use crate::resource_trait::ResourceClient;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::HostAlias;
use tracing::info;

/// Address of the host alias carrying the marker
pub const LOOPBACK: &str = "127.0.0.1";

const MARKER_PREFIX: &str = "deployment-";
const MARKER_SUFFIX: &str = ".redeploy.local";

/// Hostname for generation `n`
pub fn marker_hostname(n: u64) -> String {
    format!("{MARKER_PREFIX}{n}{MARKER_SUFFIX}")
}

/// Generation encoded in `hostname`, if it is a well-formed marker
pub fn parse_marker(hostname: &str) -> Option<u64> {
    let digits = hostname
        .strip_prefix(MARKER_PREFIX)?
        .strip_suffix(MARKER_SUFFIX)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Advance the marker in `aliases` and return the new generation.
///
/// Only the first loopback alias is considered. Within it, the first hostname
/// that parses as a marker is replaced in place; malformed or saturated
/// markers are left untouched and a fresh `deployment-1` is appended instead.
pub fn bump_marker(aliases: &mut Vec<HostAlias>) -> u64 {
    let Some(alias) = aliases.iter_mut().find(|alias| alias.ip == LOOPBACK) else {
        aliases.push(HostAlias {
            ip: LOOPBACK.to_string(),
            hostnames: Some(vec![marker_hostname(1)]),
        });
        return 1;
    };

    let hostnames = alias.hostnames.get_or_insert_with(Vec::new);
    for hostname in hostnames.iter_mut() {
        if let Some(next) = parse_marker(hostname).and_then(|n| n.checked_add(1)) {
            *hostname = marker_hostname(next);
            return next;
        }
    }
    hostnames.push(marker_hostname(1));
    1
}

/// Bump the marker inside a Deployment's pod template
pub fn apply_redeploy(deployment: &mut Deployment) -> Result<u64, ClientError> {
    let name = deployment.metadata.name.clone().unwrap_or_default();
    let pod_spec = deployment
        .spec
        .as_mut()
        .and_then(|spec| spec.template.spec.as_mut())
        .ok_or_else(|| {
            ClientError::InvalidObject(format!("deployment {name} has no pod template spec"))
        })?;
    Ok(bump_marker(pod_spec.host_aliases.get_or_insert_with(Vec::new)))
}

/// Force a rollout of deployment `name`.
///
/// Reads the live object rather than any cache, so the marker always advances
/// from the latest stored value. A concurrent writer surfaces as
/// `ClientError::Conflict`; callers decide whether to retry.
pub async fn redeploy<C>(client: &C, name: &str) -> Result<Deployment, ClientError>
where
    C: ResourceClient<Deployment> + ?Sized,
{
    let mut deployment = client.get(name).await?;
    let generation = apply_redeploy(&mut deployment)?;
    let updated = client.update(&deployment).await?;
    info!(
        "Redeployed deployment {}/{} (generation {})",
        client.namespace(),
        name,
        generation
    );
    Ok(updated)
}
