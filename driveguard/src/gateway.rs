//! Adapter over the two deployed contracts.
//!
//! The role contract and the policy contract are external systems reached
//! through a wallet provider. They are modelled as [`RoleContract`] and
//! [`PolicyContract`]; [`ContractGateway`] is the single entry point the rest
//! of the crate uses, and it is where failures are logged. Nothing here
//! retries: every operation is user initiated and is retried by resubmitting.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};

use crate::{
    error::Result,
    policy::{NewPolicy, Policy},
};

/// Outcome of a state-changing contract call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxReceipt {
    pub tx_hash: String,
    pub from: String,
    pub to: String,
    /// Native currency attached to the call, in the smallest unit
    pub value: u128,
}

/// Both role flags for an address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RoleCheck {
    pub is_admin: bool,
    pub is_policy_holder: bool,
}

/// Role management contract
#[async_trait]
pub trait RoleContract: Send + Sync {
    async fn is_admin(&self, address: &str) -> Result<bool>;
    async fn is_user(&self, address: &str) -> Result<bool>;
    /// Grants the policy holder role to the signer
    async fn add_user(&self, from: &str) -> Result<TxReceipt>;
}

/// Policy management contract
#[async_trait]
pub trait PolicyContract: Send + Sync {
    async fn view_all_policies(&self) -> Result<Vec<Policy>>;
    async fn policy_count(&self) -> Result<u64>;
    async fn create_policy(&self, from: &str, policy: &NewPolicy) -> Result<TxReceipt>;
    /// Payable: `value` must carry the native equivalent of `amount`
    async fn select_policy(
        &self,
        from: &str,
        policy_id: u64,
        amount: u64,
        value: u128,
    ) -> Result<TxReceipt>;
    async fn usd_to_native(&self, amount: u64) -> Result<u128>;
}

#[derive(Clone)]
pub struct ContractGateway {
    roles: Arc<dyn RoleContract>,
    policies: Arc<dyn PolicyContract>,
}

fn logged<T>(operation: &str, result: Result<T>) -> Result<T> {
    if let Err(e) = &result {
        error!(operation = %operation, kind = e.kind(), error = %e, "Contract call failed");
    }
    result
}

impl ContractGateway {
    pub fn new(roles: Arc<dyn RoleContract>, policies: Arc<dyn PolicyContract>) -> Self {
        Self { roles, policies }
    }

    pub async fn list_policies(&self) -> Result<Vec<Policy>> {
        let policies = logged("list_policies", self.policies.view_all_policies().await)?;
        info!(count = policies.len(), "Fetched policies");
        Ok(policies)
    }

    pub async fn policy_count(&self) -> Result<u64> {
        logged("policy_count", self.policies.policy_count().await)
    }

    pub async fn create_policy(&self, from: &str, policy: &NewPolicy) -> Result<TxReceipt> {
        let receipt = logged(
            "create_policy",
            self.policies.create_policy(from, policy).await,
        )?;
        info!(
            from = %from,
            plan = %policy.plan_name,
            tx_hash = %receipt.tx_hash,
            "Policy created"
        );
        Ok(receipt)
    }

    pub async fn convert_to_native_currency(&self, amount: u64) -> Result<u128> {
        logged(
            "convert_to_native_currency",
            self.policies.usd_to_native(amount).await,
        )
    }

    pub async fn submit_purchase(
        &self,
        from: &str,
        policy_id: u64,
        amount: u64,
        native_value: u128,
    ) -> Result<TxReceipt> {
        let receipt = logged(
            "submit_purchase",
            self.policies
                .select_policy(from, policy_id, amount, native_value)
                .await,
        )?;
        info!(
            from = %from,
            policy_id,
            amount,
            native_value = %native_value,
            tx_hash = %receipt.tx_hash,
            "Policy purchased"
        );
        Ok(receipt)
    }

    /// Admin flag first, then the policy holder flag
    pub async fn check_role(&self, address: &str) -> Result<RoleCheck> {
        let is_admin = logged("is_admin", self.roles.is_admin(address).await)?;
        let is_policy_holder = logged("is_user", self.roles.is_user(address).await)?;
        Ok(RoleCheck {
            is_admin,
            is_policy_holder,
        })
    }

    pub async fn add_user(&self, from: &str) -> Result<TxReceipt> {
        let receipt = logged("add_user", self.roles.add_user(from).await)?;
        info!(from = %from, tx_hash = %receipt.tx_hash, "Policy holder role granted");
        Ok(receipt)
    }
}
