use crate::config::{StackConfig, Status};
use crate::errors::{RestackError, Result};
use crate::git::VcsGateway;
use std::collections::HashMap;
use tracing::debug;

/// Cross-checks the declared statuses and branches against the remotes.
///
/// Branch-head listings are fetched once per distinct remote URL and cached
/// for the lifetime of this instance, so stacks whose features share a
/// remote cost a single round-trip. The first violation found aborts the
/// run.
pub struct RemoteStatusValidator<'a, G: VcsGateway> {
    gateway: &'a mut G,
    heads_by_url: HashMap<String, Vec<String>>,
}

impl<'a, G: VcsGateway> RemoteStatusValidator<'a, G> {
    pub fn new(gateway: &'a mut G) -> Self {
        Self {
            gateway,
            heads_by_url: HashMap::new(),
        }
    }

    pub fn validate(&mut self, config: &StackConfig) -> Result<()> {
        for feature in &config.features {
            if let Status::Other(status) = &feature.status {
                return Err(RestackError::UnknownStatus {
                    feature: feature.name.clone(),
                    status: status.clone(),
                });
            }
            let url = config.remote_url(&feature.remote)?.to_string();
            if !self.heads_by_url.contains_key(&url) {
                debug!("Fetching branch heads for {}", url);
                let heads = self.gateway.list_remote_branch_heads(&url).map_err(|err| {
                    RestackError::RemoteLookup {
                        branch: feature.name.clone(),
                        remote: feature.remote.clone(),
                        message: err.to_string(),
                    }
                })?;
                self.heads_by_url.insert(url.clone(), heads);
            }
            let heads = &self.heads_by_url[&url];
            if !heads.iter().any(|head| head == &feature.name) {
                return Err(RestackError::RemoteLookup {
                    branch: feature.name.clone(),
                    remote: feature.remote.clone(),
                    message: "branch not found on remote".to_string(),
                });
            }
            debug!("Feature {} present on {}", feature.name, feature.remote);
        }
        Ok(())
    }
}
