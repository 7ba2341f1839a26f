//! In-process stand-in for the deployed role and policy contracts.
//!
//! Used by the service when no chain is configured and by the tests. It keeps
//! the same observable rules as the deployed contracts: only admins create
//! policies, only registered users buy them, and a purchase must carry exactly
//! the converted native amount.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;
use uuid::Uuid;

use crate::{
    error::{DriveGuardError, Result},
    gateway::{PolicyContract, RoleContract, TxReceipt},
    policy::{NewPolicy, Policy},
};

/// Price the policy contract is deployed with: 8-decimal USD per native coin
pub const DEFAULT_ETH_USD_PRICE: u128 = 200_000_000;

const WEI_PER_ETH: u128 = 1_000_000_000_000_000_000;
const PRICE_FEED_SCALE: u128 = 100_000_000;

/// Deployed contract addresses
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractAddresses {
    pub role_contract: String,
    pub policy_contract: String,
}

impl Default for ContractAddresses {
    fn default() -> Self {
        Self {
            role_contract: "0x9Dc0c9599c2407425CFda8310Fb57C12520Ba117".to_string(),
            policy_contract: "0x17605f9222d17d785aE304A26f1d952CbcD9beF6".to_string(),
        }
    }
}

/// A recorded `selectPolicy` call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Purchase {
    pub buyer: String,
    pub policy_id: u64,
    pub amount: u64,
    pub value: u128,
}

struct ChainState {
    admins: HashSet<String>,
    users: HashSet<String>,
    policies: Vec<Policy>,
    purchases: Vec<Purchase>,
    eth_usd_price: u128,
}

pub struct SimulatedChain {
    addresses: ContractAddresses,
    state: Mutex<ChainState>,
    offline: AtomicBool,
    rejecting: AtomicBool,
}

fn normalize(address: &str) -> String {
    address.trim().to_ascii_lowercase()
}

fn revert(reason: &str) -> DriveGuardError {
    DriveGuardError::NetworkOrContract(format!("execution reverted: {}", reason))
}

fn tx_hash() -> String {
    format!(
        "0x{}{}",
        Uuid::new_v4().simple(),
        Uuid::new_v4().simple()
    )
}

/// `amount × 10^18 × 10^8 / price` without overflowing the intermediate product
fn usd_to_wei(amount: u64, price: u128) -> Result<u128> {
    if price == 0 {
        return Err(revert("price feed returned zero"));
    }
    let scaled = u128::from(amount) * WEI_PER_ETH;
    let whole = (scaled / price)
        .checked_mul(PRICE_FEED_SCALE)
        .ok_or_else(|| revert("conversion overflow"))?;
    let fraction = (scaled % price)
        .checked_mul(PRICE_FEED_SCALE)
        .ok_or_else(|| revert("conversion overflow"))?
        / price;
    whole
        .checked_add(fraction)
        .ok_or_else(|| revert("conversion overflow"))
}

impl SimulatedChain {
    pub fn new(addresses: ContractAddresses, admins: &[String], eth_usd_price: u128) -> Self {
        Self {
            addresses,
            state: Mutex::new(ChainState {
                admins: admins.iter().map(|a| normalize(a)).collect(),
                users: HashSet::new(),
                policies: Vec::new(),
                purchases: Vec::new(),
                eth_usd_price,
            }),
            offline: AtomicBool::new(false),
            rejecting: AtomicBool::new(false),
        }
    }

    pub fn with_admins(admins: &[String]) -> Self {
        Self::new(ContractAddresses::default(), admins, DEFAULT_ETH_USD_PRICE)
    }

    pub fn addresses(&self) -> &ContractAddresses {
        &self.addresses
    }

    /// Simulates a missing wallet provider
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Simulates the user declining every signature request
    pub fn set_rejecting(&self, rejecting: bool) {
        self.rejecting.store(rejecting, Ordering::SeqCst);
    }

    pub fn purchases(&self) -> Result<Vec<Purchase>> {
        Ok(self.lock()?.purchases.clone())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, ChainState>> {
        self.state
            .lock()
            .map_err(|_| DriveGuardError::NetworkOrContract("chain state poisoned".to_string()))
    }

    fn ensure_provider(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(DriveGuardError::ProviderUnavailable(
                "no wallet provider detected".to_string(),
            ));
        }
        Ok(())
    }

    fn ensure_signed(&self, from: &str) -> Result<()> {
        self.ensure_provider()?;
        if self.rejecting.load(Ordering::SeqCst) {
            return Err(DriveGuardError::UserRejected(format!(
                "{} declined the transaction",
                from
            )));
        }
        Ok(())
    }

    fn receipt(&self, from: &str, to: &str, value: u128) -> TxReceipt {
        let receipt = TxReceipt {
            tx_hash: tx_hash(),
            from: from.to_string(),
            to: to.to_string(),
            value,
        };
        debug!(tx_hash = %receipt.tx_hash, to = %to, "Simulated transaction mined");
        receipt
    }
}

#[async_trait]
impl RoleContract for SimulatedChain {
    async fn is_admin(&self, address: &str) -> Result<bool> {
        self.ensure_provider()?;
        Ok(self.lock()?.admins.contains(&normalize(address)))
    }

    async fn is_user(&self, address: &str) -> Result<bool> {
        self.ensure_provider()?;
        Ok(self.lock()?.users.contains(&normalize(address)))
    }

    async fn add_user(&self, from: &str) -> Result<TxReceipt> {
        self.ensure_signed(from)?;
        self.lock()?.users.insert(normalize(from));
        Ok(self.receipt(from, &self.addresses.role_contract, 0))
    }
}

#[async_trait]
impl PolicyContract for SimulatedChain {
    async fn view_all_policies(&self) -> Result<Vec<Policy>> {
        self.ensure_provider()?;
        Ok(self.lock()?.policies.clone())
    }

    async fn policy_count(&self) -> Result<u64> {
        self.ensure_provider()?;
        Ok(self.lock()?.policies.len() as u64)
    }

    async fn create_policy(&self, from: &str, policy: &NewPolicy) -> Result<TxReceipt> {
        self.ensure_signed(from)?;
        {
            let mut state = self.lock()?;
            if !state.admins.contains(&normalize(from)) {
                return Err(revert("caller is not an admin"));
            }
            let policy_id = state.policies.len() as u64 + 1;
            state.policies.push(Policy {
                policy_id,
                plan_name: policy.plan_name.clone(),
                base_rate: policy.base_rate,
                deductible: policy.deductible,
                coverage_amount: policy.coverage_amount,
                third_party_liability: policy.third_party_liability,
                covered_perils: policy.covered_perils.clone(),
            });
        }
        Ok(self.receipt(from, &self.addresses.policy_contract, 0))
    }

    async fn select_policy(
        &self,
        from: &str,
        policy_id: u64,
        amount: u64,
        value: u128,
    ) -> Result<TxReceipt> {
        self.ensure_signed(from)?;
        {
            let mut state = self.lock()?;
            if !state.users.contains(&normalize(from)) {
                return Err(revert("caller is not a policy holder"));
            }
            if !state.policies.iter().any(|p| p.policy_id == policy_id) {
                return Err(revert("policy does not exist"));
            }
            if amount == 0 {
                return Err(revert("premium must be greater than zero"));
            }
            let expected = usd_to_wei(amount, state.eth_usd_price)?;
            if value != expected {
                return Err(revert("incorrect payment amount"));
            }
            state.purchases.push(Purchase {
                buyer: normalize(from),
                policy_id,
                amount,
                value,
            });
        }
        Ok(self.receipt(from, &self.addresses.policy_contract, value))
    }

    async fn usd_to_native(&self, amount: u64) -> Result<u128> {
        self.ensure_provider()?;
        let price = self.lock()?.eth_usd_price;
        usd_to_wei(amount, price)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const ADMIN: &str = "0x00000000000000000000000000000000000000aa";
    const USER: &str = "0x00000000000000000000000000000000000000bb";

    fn chain() -> SimulatedChain {
        SimulatedChain::with_admins(&[ADMIN.to_string()])
    }

    fn new_policy() -> NewPolicy {
        NewPolicy {
            plan_name: "Comprehensive".to_string(),
            base_rate: dec!(0.03),
            deductible: dec!(500),
            coverage_amount: dec!(100000),
            third_party_liability: dec!(100000),
            covered_perils: vec!["Fire".to_string(), "Theft".to_string()],
        }
    }

    #[test]
    fn test_conversion_at_default_price() {
        // $2 per coin, so $1 is half a coin
        assert_eq!(usd_to_wei(1, DEFAULT_ETH_USD_PRICE).unwrap(), WEI_PER_ETH / 2);
        assert_eq!(usd_to_wei(1110, DEFAULT_ETH_USD_PRICE).unwrap(), 555 * WEI_PER_ETH);
    }

    #[test]
    fn test_conversion_keeps_fraction() {
        // $3000 per coin: $1 = 333333333333333 wei (floor)
        assert_eq!(
            usd_to_wei(1, 300_000_000_000).unwrap(),
            333_333_333_333_333
        );
    }

    #[test]
    fn test_conversion_of_large_premium() {
        assert_eq!(
            usd_to_wei(7_000_000_000_000, DEFAULT_ETH_USD_PRICE).unwrap(),
            3_500_000_000_000 * WEI_PER_ETH
        );
        assert!(usd_to_wei(1, 0).is_err());
    }

    #[tokio::test]
    async fn test_roles_are_case_insensitive() {
        let chain = chain();
        assert!(chain.is_admin(&ADMIN.to_uppercase().replace("0X", "0x")).await.unwrap());
        assert!(!chain.is_user(USER).await.unwrap());
        chain.add_user(USER).await.unwrap();
        assert!(chain.is_user(USER).await.unwrap());
    }

    #[tokio::test]
    async fn test_only_admin_creates_policies() {
        let chain = chain();
        let err = chain.create_policy(USER, &new_policy()).await.unwrap_err();
        assert!(matches!(err, DriveGuardError::NetworkOrContract(_)));

        chain.create_policy(ADMIN, &new_policy()).await.unwrap();
        chain.create_policy(ADMIN, &new_policy()).await.unwrap();
        let policies = chain.view_all_policies().await.unwrap();
        assert_eq!(policies.iter().map(|p| p.policy_id).collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(chain.policy_count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_purchase_requires_exact_value() {
        let chain = chain();
        chain.create_policy(ADMIN, &new_policy()).await.unwrap();
        chain.add_user(USER).await.unwrap();

        let value = chain.usd_to_native(1110).await.unwrap();
        assert!(chain.select_policy(USER, 1, 1110, value - 1).await.is_err());
        assert!(chain.select_policy(USER, 9, 1110, value).await.is_err());

        let receipt = chain.select_policy(USER, 1, 1110, value).await.unwrap();
        assert_eq!(receipt.value, value);
        assert_eq!(receipt.to, chain.addresses().policy_contract);
        assert_eq!(chain.purchases().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_offline_and_rejecting() {
        let chain = chain();
        chain.set_offline(true);
        assert!(matches!(
            chain.is_admin(ADMIN).await.unwrap_err(),
            DriveGuardError::ProviderUnavailable(_)
        ));
        chain.set_offline(false);

        chain.set_rejecting(true);
        assert!(matches!(
            chain.add_user(USER).await.unwrap_err(),
            DriveGuardError::UserRejected(_)
        ));
        // reads still work while signatures are declined
        assert!(chain.is_admin(ADMIN).await.unwrap());
    }
}
