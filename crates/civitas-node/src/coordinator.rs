//! C4: drives a registration request through PENDING → {APPROVED,
//! REJECTED, EXPIRED} with the invariants of the data model holding at
//! every step (spec §4.4).

use crate::identity;
use crate::merkle::TreeHandle;
use crate::onchain::OnchainPublisher;
use crate::storage::Storage;
use civitas_crypto::merkle::InclusionProof;
use civitas_types::{
    Attestation, CitizenRecord, CoreError, CoreResult, RejectionReason, RequestRecord, SealedCredentials,
};
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

pub struct Coordinator {
    storage: Arc<Storage>,
    tree: Arc<TreeHandle>,
    admin_salt: [u8; 32],
    auto_approve: bool,
    onchain: OnchainPublisher,
    /// Serialises the whole "append to the tree, then persist" critical
    /// section across concurrent approvals, so the leaf index the tree
    /// assigns and the leaf index storage assigns for the same
    /// commitment can never diverge (spec §5's single transaction
    /// queue for cross-entity commits).
    append_lock: Mutex<()>,
}

fn validate_attestation(attestation: &Attestation, now: i64) -> Option<RejectionReason> {
    if !attestation.valid {
        return Some(RejectionReason::AttestationInvalid);
    }
    if attestation.is_expired(now) {
        return Some(RejectionReason::AttestationExpired);
    }
    if !attestation.adult {
        return Some(RejectionReason::UnderAge);
    }
    None
}

impl Coordinator {
    pub fn new(
        storage: Arc<Storage>,
        tree: Arc<TreeHandle>,
        admin_salt: [u8; 32],
        auto_approve: bool,
        onchain: OnchainPublisher,
    ) -> Self {
        Self {
            storage,
            tree,
            admin_salt,
            auto_approve,
            onchain,
            append_lock: Mutex::new(()),
        }
    }

    /// `submitRegistration` (spec §4.4's Submit). Idempotent on
    /// `userAccount` (P4): a user with an existing APPROVED request
    /// gets `AlreadyRegistered` with their original leaf index rather
    /// than a second identity.
    pub async fn submit(
        &self,
        user_account: String,
        attestation: Attestation,
        now: i64,
    ) -> CoreResult<RequestRecord> {
        if let Some(existing) = self.storage.request_by_user(&user_account).await {
            match &existing {
                RequestRecord::Pending { .. } => return Err(CoreError::DuplicateRequest),
                RequestRecord::Approved { leaf_index, .. } => {
                    return Err(CoreError::AlreadyRegistered {
                        leaf_index: *leaf_index,
                    })
                }
                RequestRecord::Rejected { .. } | RequestRecord::Expired { .. } => {
                    // terminal and non-approved: the user may retry.
                }
            }
        }

        let id = Uuid::new_v4();

        if let Some(reason) = validate_attestation(&attestation, now) {
            let rejected = RequestRecord::Rejected {
                id,
                user_account,
                attestation,
                created_at: now,
                processed_at: now,
                processed_by: None,
                reason,
            };
            self.storage.put_request(rejected.clone()).await?;
            return Ok(rejected);
        }

        if let Some(existing_approved) = self
            .storage
            .approved_request_for_attestation(&attestation.attestation_nullifier)
            .await
        {
            if existing_approved.user_account() != user_account {
                return Err(CoreError::AttestationReuse);
            }
            if let RequestRecord::Approved { leaf_index, .. } = existing_approved {
                return Err(CoreError::AlreadyRegistered { leaf_index });
            }
        }

        let pending = RequestRecord::Pending {
            id,
            user_account,
            attestation,
            created_at: now,
        };
        self.storage.put_request(pending.clone()).await?;

        if self.auto_approve {
            return self.approve(id, now, None).await;
        }
        Ok(pending)
    }

    /// Drive a PENDING request to APPROVED, or to REJECTED if the
    /// attestation has since gone stale. Idempotent: re-approving an
    /// already-APPROVED request returns it unchanged.
    pub async fn approve(&self, request_id: Uuid, now: i64, processed_by: Option<String>) -> CoreResult<RequestRecord> {
        let request = self
            .storage
            .request_by_id(request_id)
            .await
            .ok_or(CoreError::UnknownRequest)?;

        let (user_account, attestation, created_at) = match request {
            RequestRecord::Approved { .. } => return Ok(request),
            RequestRecord::Pending {
                user_account,
                attestation,
                created_at,
                ..
            } => (user_account, attestation, created_at),
            RequestRecord::Rejected { .. } | RequestRecord::Expired { .. } => {
                return Err(CoreError::Internal(
                    "cannot approve a request already in a terminal non-approved state".into(),
                ))
            }
        };

        if let Some(reason) = validate_attestation(&attestation, now) {
            let rejected = RequestRecord::Rejected {
                id: request_id,
                user_account,
                attestation,
                created_at,
                processed_at: now,
                processed_by,
                reason,
            };
            self.storage.put_request(rejected.clone()).await?;
            return Ok(rejected);
        }

        let identity = identity::derive(&attestation.attestation_nullifier, &user_account, &self.admin_salt);

        let _guard = self.append_lock.lock().await;
        let (leaf_index, new_root) = self.tree.append(identity.commitment).await?;

        let citizen = CitizenRecord {
            commitment: identity.commitment,
            leaf_index,
            user_account: user_account.clone(),
            attestation_fingerprint: attestation.attestation_nullifier,
            timestamp: now,
            onchain_tx_id: None,
        };
        let sealed_credentials = identity::seal_for_delivery(&user_account, &identity, leaf_index)?;

        let approved = RequestRecord::Approved {
            id: request_id,
            user_account,
            attestation,
            created_at,
            processed_at: now,
            processed_by,
            identity_commitment: identity.commitment,
            leaf_index,
            sealed_credentials,
        };

        self.storage
            .commit_approval(identity.commitment, citizen, approved.clone())
            .await?;
        self.onchain.spawn_publish(leaf_index, new_root);
        Ok(approved)
    }

    pub async fn reject(
        &self,
        request_id: Uuid,
        reason: RejectionReason,
        now: i64,
        processed_by: Option<String>,
    ) -> CoreResult<RequestRecord> {
        let request = self
            .storage
            .request_by_id(request_id)
            .await
            .ok_or(CoreError::UnknownRequest)?;
        match request {
            RequestRecord::Rejected { .. } => Ok(request),
            RequestRecord::Pending {
                user_account,
                attestation,
                created_at,
                ..
            } => {
                let rejected = RequestRecord::Rejected {
                    id: request_id,
                    user_account,
                    attestation,
                    created_at,
                    processed_at: now,
                    processed_by,
                    reason,
                };
                self.storage.put_request(rejected.clone()).await?;
                Ok(rejected)
            }
            _ => Err(CoreError::Internal(
                "cannot reject a request already in a terminal state".into(),
            )),
        }
    }

    /// `getRegistrationStatus` (spec §4.7).
    pub async fn status_for_user(&self, user_account: &str) -> Option<RequestRecord> {
        self.storage.request_by_user(user_account).await
    }

    /// `getCredentials` (spec §4.7): only an APPROVED request has
    /// credentials to deliver.
    pub async fn credentials_for_user(&self, user_account: &str) -> Option<SealedCredentials> {
        match self.storage.request_by_user(user_account).await? {
            RequestRecord::Approved {
                sealed_credentials, ..
            } => Some(sealed_credentials),
            _ => None,
        }
    }

    /// `getMerkleProof` (spec §4.7): looks the commitment up in the
    /// citizen index, then asks the tree for its inclusion path.
    pub async fn merkle_proof(&self, commitment: [u8; 32]) -> CoreResult<InclusionProof> {
        let leaf_index = self
            .storage
            .leaf_index_of(&commitment)
            .await
            .ok_or(CoreError::UnknownCommitment)?;
        self.tree.inclusion_proof(leaf_index).await
    }

    pub async fn list_pending(&self) -> Vec<RequestRecord> {
        self.storage
            .requests()
            .await
            .into_iter()
            .filter(RequestRecord::is_pending)
            .collect()
    }

    /// Drive every eligible PENDING request to APPROVED — the admin
    /// `autoProcessAll` operation (spec §4.7). Rejections during
    /// processing (stale attestations) are not treated as failures of
    /// the sweep.
    pub async fn auto_process_all(&self, now: i64, processed_by: Option<String>) -> Vec<CoreResult<RequestRecord>> {
        let pending = self.list_pending().await;
        let mut results = Vec::with_capacity(pending.len());
        for request in pending {
            results.push(self.approve(request.id(), now, processed_by.clone()).await);
        }
        results
    }

    /// Periodic sweep: any PENDING request older than `ttl_secs`
    /// becomes EXPIRED. Idempotent — already-expired requests are
    /// simply skipped on the next call since they're no longer
    /// PENDING.
    pub async fn expire_stale(&self, now: i64, ttl_secs: i64) -> CoreResult<usize> {
        let mut expired_count = 0;
        for request in self.storage.requests().await {
            if let RequestRecord::Pending {
                id,
                user_account,
                attestation,
                created_at,
            } = request
            {
                if now.saturating_sub(created_at) >= ttl_secs {
                    let expired = RequestRecord::Expired {
                        id,
                        user_account,
                        attestation,
                        created_at,
                        processed_at: now,
                    };
                    self.storage.put_request(expired).await?;
                    expired_count += 1;
                }
            }
        }
        Ok(expired_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    async fn coordinator(auto_approve: bool) -> Coordinator {
        let mut dir = std::env::temp_dir();
        dir.push(format!("civitas-coordinator-test-{}", Uuid::new_v4()));
        let storage = Arc::new(Storage::open(PathBuf::from(dir)).await.unwrap());
        let tree = Arc::new(TreeHandle::restore(10, &[]).unwrap());
        Coordinator::new(storage, tree, [0u8; 32], auto_approve, OnchainPublisher::disabled())
    }

    fn attestation(adult: bool, nullifier: [u8; 32]) -> Attestation {
        Attestation {
            valid: true,
            adult,
            expires_at: 2_000_000_000,
            attestation_nullifier: nullifier,
        }
    }

    #[tokio::test]
    async fn s1_fresh_registration_and_idempotent_resubmit() {
        let coordinator = coordinator(true).await;
        let request = coordinator
            .submit("user1".into(), attestation(true, [1u8; 32]), 0)
            .await
            .unwrap();
        assert_eq!(request.status_name(), "APPROVED");
        let leaf_index = match &request {
            RequestRecord::Approved { leaf_index, .. } => *leaf_index,
            _ => unreachable!(),
        };
        assert_eq!(leaf_index, 0);

        let result = coordinator
            .submit("user1".into(), attestation(true, [1u8; 32]), 1)
            .await;
        assert!(matches!(
            result,
            Err(CoreError::AlreadyRegistered { leaf_index: 0 })
        ));
    }

    #[tokio::test]
    async fn s2_attestation_reuse_rejected() {
        let coordinator = coordinator(true).await;
        coordinator
            .submit("user1".into(), attestation(true, [1u8; 32]), 0)
            .await
            .unwrap();
        let result = coordinator
            .submit("user2".into(), attestation(true, [1u8; 32]), 0)
            .await;
        assert!(matches!(result, Err(CoreError::AttestationReuse)));
    }

    #[tokio::test]
    async fn s5_under_age_rejected_without_leaf() {
        let coordinator = coordinator(true).await;
        let request = coordinator
            .submit("user3".into(), attestation(false, [3u8; 32]), 0)
            .await
            .unwrap();
        assert_eq!(request.status_name(), "REJECTED");
        assert_eq!(coordinator.tree.leaf_count().await, 0);
    }

    #[tokio::test]
    async fn manual_approval_flow() {
        let coordinator = coordinator(false).await;
        let request = coordinator
            .submit("user4".into(), attestation(true, [4u8; 32]), 0)
            .await
            .unwrap();
        assert_eq!(request.status_name(), "PENDING");

        let approved = coordinator.approve(request.id(), 10, Some("admin".into())).await.unwrap();
        assert_eq!(approved.status_name(), "APPROVED");
    }

    #[tokio::test]
    async fn duplicate_pending_request_rejected() {
        let coordinator = coordinator(false).await;
        coordinator
            .submit("user5".into(), attestation(true, [5u8; 32]), 0)
            .await
            .unwrap();
        let result = coordinator
            .submit("user5".into(), attestation(true, [6u8; 32]), 1)
            .await;
        assert!(matches!(result, Err(CoreError::DuplicateRequest)));
    }

    #[tokio::test]
    async fn expire_stale_sweeps_old_pending_requests() {
        let coordinator = coordinator(false).await;
        let request = coordinator
            .submit("user6".into(), attestation(true, [7u8; 32]), 0)
            .await
            .unwrap();
        let expired = coordinator.expire_stale(1_000_000, 3600).await.unwrap();
        assert_eq!(expired, 1);
        let reloaded = coordinator.storage.request_by_id(request.id()).await.unwrap();
        assert_eq!(reloaded.status_name(), "EXPIRED");
    }

    #[tokio::test]
    async fn rejected_user_can_resubmit() {
        let coordinator = coordinator(true).await;
        let rejected = coordinator
            .submit("user7".into(), attestation(false, [9u8; 32]), 0)
            .await
            .unwrap();
        assert_eq!(rejected.status_name(), "REJECTED");

        let approved = coordinator
            .submit("user7".into(), attestation(true, [10u8; 32]), 1)
            .await
            .unwrap();
        assert_eq!(approved.status_name(), "APPROVED");
    }

    #[tokio::test]
    async fn credentials_and_merkle_proof_available_after_approval() {
        let coordinator = coordinator(true).await;
        let request = coordinator
            .submit("user8".into(), attestation(true, [11u8; 32]), 0)
            .await
            .unwrap();
        let commitment = match &request {
            RequestRecord::Approved {
                identity_commitment, ..
            } => *identity_commitment,
            _ => unreachable!(),
        };

        assert!(coordinator.credentials_for_user("user8").await.is_some());
        assert!(coordinator.merkle_proof(commitment).await.is_ok());
        assert!(matches!(
            coordinator.merkle_proof([0xffu8; 32]).await,
            Err(CoreError::UnknownCommitment)
        ));
    }
}
