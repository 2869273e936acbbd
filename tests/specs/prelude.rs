//! Shared harness for the operator specs.
//!
//! [`Cluster`] wraps the fake store with every reconciler and plays the
//! parts the operator never performs itself: the job controller finishing
//! jobs and the volume controller binding claims.

use k8s_openapi::api::batch::v1::{JobCondition, JobStatus};
use k8s_openapi::api::core::v1::{PersistentVolume, PersistentVolumeClaimStatus};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

pub use k8s_openapi::api::batch::v1::Job;
pub use k8s_openapi::api::core::v1::{PersistentVolumeClaim, Secret};
pub use kube::ResourceExt;
pub use sv_core::status::{condition_true, CONDITION_COMPLETE, CONDITION_FAILED};
pub use sv_core::{
    labels, plugins, test_support, AgentAction, AgentConfig, CredentialSet, FakeClock,
    Installation, ParameterSet, Phase,
};
pub use sv_operator::{
    reconcile_action, reconcile_agent_config, reconcile_credential_set, reconcile_installation,
    reconcile_parameter_set, Context, FakeStore, Settings, Store,
};

/// One in-process cluster: the fake store plus every reconciler.
pub struct Cluster {
    pub ctx: Context<FakeStore, FakeClock>,
}

impl Cluster {
    pub fn new() -> Self {
        Cluster {
            ctx: Context {
                store: FakeStore::new(),
                clock: FakeClock::new(),
                settings: Settings::default(),
            },
        }
    }

    /// Sweep every reconciler over `namespace` until a full sweep writes
    /// nothing. Returns the number of sweeps that wrote something.
    pub async fn converge(&self, namespace: &str) -> usize {
        let store = &self.ctx.store;
        for sweep in 0..25 {
            let before = store.ops().len();
            for name in store.names::<Installation>(namespace) {
                reconcile_installation(&self.ctx, namespace, &name).await.expect("installation");
            }
            for name in store.names::<CredentialSet>(namespace) {
                reconcile_credential_set(&self.ctx, namespace, &name)
                    .await
                    .expect("credential set");
            }
            for name in store.names::<ParameterSet>(namespace) {
                reconcile_parameter_set(&self.ctx, namespace, &name).await.expect("parameter set");
            }
            for name in store.names::<AgentConfig>(namespace) {
                reconcile_agent_config(&self.ctx, namespace, &name).await.expect("agent config");
            }
            for name in store.names::<AgentAction>(namespace) {
                reconcile_action(&self.ctx, namespace, &name).await.expect("action");
            }
            if store.ops().len() == before {
                return sweep;
            }
        }
        panic!("cluster did not converge");
    }

    /// Finish the unfinished job like the job controller would. Returns
    /// the job name.
    pub fn complete_job(&self, namespace: &str) -> String {
        self.finish_job(namespace, "Complete")
    }

    /// Fail the unfinished job.
    pub fn fail_job(&self, namespace: &str) -> String {
        self.finish_job(namespace, "Failed")
    }

    fn finish_job(&self, namespace: &str, outcome: &str) -> String {
        let store = &self.ctx.store;
        let name = store
            .names::<Job>(namespace)
            .into_iter()
            .find(|name| {
                store.object::<Job>(namespace, name).is_some_and(|job| !job_finished(&job))
            })
            .expect("an unfinished job");
        let mut job = store.object::<Job>(namespace, &name).expect("stored job");
        job.status = Some(JobStatus {
            succeeded: (outcome == "Complete").then_some(1),
            failed: (outcome == "Failed").then_some(1),
            conditions: Some(vec![JobCondition {
                type_: outcome.to_string(),
                status: "True".to_string(),
                ..JobCondition::default()
            }]),
            ..JobStatus::default()
        });
        store.insert(&job);
        name
    }

    /// Play the volume controller: bind `claim`, provisioning a volume on
    /// first use. Returns the volume name.
    pub fn bind_claim(&self, namespace: &str, claim: &str) -> String {
        let store = &self.ctx.store;
        let mut stored =
            store.object::<PersistentVolumeClaim>(namespace, claim).expect("claim to bind");
        let volume = stored
            .spec
            .as_ref()
            .and_then(|s| s.volume_name.clone())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| format!("pv-{claim}"));
        stored.spec.get_or_insert_with(Default::default).volume_name = Some(volume.clone());
        stored.status = Some(PersistentVolumeClaimStatus {
            phase: Some("Bound".to_string()),
            ..PersistentVolumeClaimStatus::default()
        });
        store.insert(&stored);

        if store.object::<PersistentVolume>("", &volume).is_none() {
            store.insert(&PersistentVolume {
                metadata: ObjectMeta { name: Some(volume.clone()), ..ObjectMeta::default() },
                ..PersistentVolume::default()
            });
        }
        volume
    }

    /// The secret of `secret_type` created for `action`.
    pub fn action_secret(&self, namespace: &str, action: &str, secret_type: &str) -> Secret {
        let store = &self.ctx.store;
        store
            .names::<Secret>(namespace)
            .into_iter()
            .filter_map(|name| store.object::<Secret>(namespace, &name))
            .find(|secret| {
                let meta = secret.metadata.labels.clone().unwrap_or_default();
                meta.get(labels::RESOURCE_NAME).map(String::as_str) == Some(action)
                    && meta.get(labels::SECRET_TYPE).map(String::as_str) == Some(secret_type)
            })
            .expect("action secret")
    }

    /// Parsed YAML file from the workdir secret of `action`.
    pub fn document_of(&self, namespace: &str, action: &str, file: &str) -> serde_yaml::Value {
        let secret = self.action_secret(namespace, action, labels::SECRET_TYPE_WORKDIR);
        let data = secret.data.unwrap_or_default();
        let bytes = data.get(file).expect("document in workdir secret");
        serde_yaml::from_slice(&bytes.0).expect("document parses")
    }
}

fn job_finished(job: &Job) -> bool {
    job.status.as_ref().and_then(|s| s.conditions.as_ref()).is_some_and(|conditions| {
        conditions
            .iter()
            .any(|c| c.status == "True" && (c.type_ == "Complete" || c.type_ == "Failed"))
    })
}
