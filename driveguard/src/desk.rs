//! InsuranceDesk – loads the caller's session, performs **one** user action, and persists
//! whatever the action changed.
//!
//! Every public method takes the session id the caller was issued at login. The desk never
//! reads a role from anywhere else, and for the two actions that move money or change the
//! policy book (`purchase`, `create_policy`) it asks the role contract again before acting,
//! unless [`DeskConfig::reverify_roles`] is switched off.
//!
//! Premiums are computed on every `quote` and again on `purchase`; nothing is cached between
//! the two, so a policy whose base rate changed in between is charged at the new rate.

use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, LazyLock};
use tracing::{info, warn};

use crate::{
    access::{Route, authorize},
    catalog::VehicleCatalog,
    error::{DriveGuardError, Result},
    gateway::{ContractGateway, TxReceipt},
    policy::{NewPolicy, NewPolicyForm, Policy},
    premium::compute_premium,
    profile::{ProfileStore, UserProfile},
    rating::{RatingForm, RatingInput, compute_risk_factor},
    session::{Role, Session, SessionStorage},
};

static WALLET_ADDRESS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^0x[0-9a-fA-F]{40}$").expect("Invalid regex"));

#[derive(Debug, Clone)]
pub struct DeskConfig {
    /// Ask the role contract again before purchases and policy creation
    pub reverify_roles: bool,
}

impl Default for DeskConfig {
    fn default() -> Self {
        Self {
            reverify_roles: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginOutcome {
    pub session: Session,
    pub redirect: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrationForm {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationOutcome {
    pub profile: UserProfile,
    pub receipt: TxReceipt,
    pub session: Session,
}

/// Vehicle selection plus rating form for `/buy-insurance`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuoteRequest {
    pub car_brand: String,
    pub car_model: String,
    pub manufactured_year: u16,
    #[serde(flatten)]
    pub rating: RatingForm,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyQuote {
    pub policy: Policy,
    pub vehicle_price: Decimal,
    pub risk_factor: Decimal,
    pub premium: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurchaseRequest {
    pub policy_id: u64,
    #[serde(flatten)]
    pub quote: QuoteRequest,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurchaseOutcome {
    pub quote: PolicyQuote,
    pub native_value: u128,
    pub receipt: TxReceipt,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminOverview {
    pub policy_count: u64,
    pub policies: Vec<Policy>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyCreated {
    pub receipt: TxReceipt,
    pub overview: AdminOverview,
}

#[derive(Clone)]
pub struct InsuranceDesk {
    gateway: ContractGateway,
    sessions: Arc<dyn SessionStorage>,
    profiles: Arc<dyn ProfileStore>,
    catalog: Arc<VehicleCatalog>,
    config: DeskConfig,
}

impl InsuranceDesk {
    pub fn new(
        gateway: ContractGateway,
        sessions: Arc<dyn SessionStorage>,
        profiles: Arc<dyn ProfileStore>,
        catalog: VehicleCatalog,
        config: DeskConfig,
    ) -> Self {
        Self {
            gateway,
            sessions,
            profiles,
            catalog: Arc::new(catalog),
            config,
        }
    }

    pub fn catalog(&self) -> &VehicleCatalog {
        &self.catalog
    }

    /// Load a session or fail with `SessionNotFound`
    pub async fn session(&self, session_id: &str) -> Result<Session> {
        self.sessions
            .get(session_id)
            .await?
            .ok_or_else(|| DriveGuardError::SessionNotFound(session_id.to_string()))
    }

    async fn authorized_session(&self, session_id: Option<&str>, route: Route) -> Result<Session> {
        let session = match session_id {
            Some(id) => Some(self.session(id).await?),
            None => None,
        };
        authorize(session.as_ref(), route)?;
        session.ok_or(DriveGuardError::Unauthenticated)
    }

    async fn reverify(&self, session: &Session, route: Route) -> Result<()> {
        if !self.config.reverify_roles {
            return Ok(());
        }
        let check = self.gateway.check_role(&session.wallet_address).await?;
        let still_holds = match session.role {
            Role::Admin => check.is_admin,
            Role::PolicyHolder => check.is_policy_holder,
            Role::None => false,
        };
        if !still_holds {
            warn!(
                session_id = %session.id,
                wallet = %session.wallet_address,
                role = %session.role,
                "Role no longer held on chain"
            );
            return Err(DriveGuardError::AccessDenied(format!(
                "{} no longer holds {} required by {}",
                session.wallet_address,
                session.role,
                route.path()
            )));
        }
        Ok(())
    }

    /// Classify a connected wallet and open a session for it.
    ///
    /// The session carries the address in lowercase; profiles are keyed by that form.
    pub async fn login(&self, wallet_address: &str) -> Result<LoginOutcome> {
        let trimmed = wallet_address.trim();
        if !WALLET_ADDRESS.is_match(trimmed) {
            return Err(DriveGuardError::Validation(format!(
                "'{}' is not a wallet address",
                trimmed
            )));
        }
        let wallet_address = trimmed.to_ascii_lowercase();

        let check = self.gateway.check_role(&wallet_address).await?;
        let role = if check.is_admin {
            Role::Admin
        } else if check.is_policy_holder {
            Role::PolicyHolder
        } else {
            Role::None
        };

        let session = Session::new(&wallet_address, role);
        self.sessions.save(session.clone()).await?;

        let redirect = Route::landing_for(role).path().to_string();
        info!(
            session_id = %session.id,
            wallet = %wallet_address,
            role = %role,
            redirect = %redirect,
            "Login successful"
        );

        Ok(LoginOutcome { session, redirect })
    }

    pub async fn logout(&self, session_id: &str) -> Result<()> {
        self.sessions.delete(session_id).await?;
        info!(session_id = %session_id, "Logged out");
        Ok(())
    }

    /// Grant the policy holder role, then store the profile and upgrade the session
    pub async fn register(
        &self,
        session_id: &str,
        form: RegistrationForm,
    ) -> Result<RegistrationOutcome> {
        let mut session = self.session(session_id).await?;

        let first_name = form.first_name.trim();
        let last_name = form.last_name.trim();
        let email = form.email.trim();
        if first_name.is_empty() || last_name.is_empty() || email.is_empty() {
            return Err(DriveGuardError::Validation(
                "first_name, last_name and email are required".to_string(),
            ));
        }

        // no profile is written unless the chain granted the role
        let receipt = self.gateway.add_user(&session.wallet_address).await?;

        let profile = UserProfile {
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            email: email.to_string(),
            wallet_address: session.wallet_address.clone(),
            role: Role::PolicyHolder,
        };
        self.profiles.put(profile.clone()).await?;

        // an admin registering a profile keeps the admin session
        if session.role != Role::Admin {
            session.role = Role::PolicyHolder;
            self.sessions.save(session.clone()).await?;
        }

        info!(
            session_id = %session.id,
            wallet = %session.wallet_address,
            "Registration successful"
        );

        Ok(RegistrationOutcome {
            profile,
            receipt,
            session,
        })
    }

    pub async fn profile(&self, session_id: &str) -> Result<Option<UserProfile>> {
        let session = self.session(session_id).await?;
        self.profiles.get(&session.wallet_address).await
    }

    /// Policies offered on `/buy-insurance`, before any vehicle is selected
    pub async fn available_policies(&self, session_id: Option<&str>) -> Result<Vec<Policy>> {
        self.authorized_session(session_id, Route::BuyInsurance)
            .await?;
        self.gateway.list_policies().await
    }

    fn price_and_risk(&self, request: &QuoteRequest) -> Result<(Decimal, Decimal)> {
        let rating = RatingInput::try_from(&request.rating)?;
        let vehicle_price = self
            .catalog
            .resolve_price(
                &request.car_brand,
                &request.car_model,
                request.manufactured_year,
            )
            .ok_or_else(|| {
                DriveGuardError::NotFound(format!(
                    "no catalog price for {} {} {}",
                    request.car_brand, request.car_model, request.manufactured_year
                ))
            })?;
        Ok((vehicle_price, compute_risk_factor(&rating)))
    }

    fn quote_policy(
        policy: Policy,
        vehicle_price: Decimal,
        risk_factor: Decimal,
    ) -> Result<PolicyQuote> {
        let premium = compute_premium(policy.base_rate, vehicle_price, risk_factor)?;
        Ok(PolicyQuote {
            policy,
            vehicle_price,
            risk_factor,
            premium,
        })
    }

    /// A premium for every listed policy
    pub async fn quote(
        &self,
        session_id: Option<&str>,
        request: &QuoteRequest,
    ) -> Result<Vec<PolicyQuote>> {
        let session = self
            .authorized_session(session_id, Route::BuyInsurance)
            .await?;
        let (vehicle_price, risk_factor) = self.price_and_risk(request)?;

        let policies = self.gateway.list_policies().await?;
        let quotes = policies
            .into_iter()
            .map(|policy| Self::quote_policy(policy, vehicle_price, risk_factor))
            .collect::<Result<Vec<_>>>()?;

        info!(
            session_id = %session.id,
            vehicle_price = %vehicle_price,
            risk_factor = %risk_factor,
            quotes = quotes.len(),
            "Quoted policies"
        );
        Ok(quotes)
    }

    /// Recompute the premium, convert it to native currency and pay for the policy
    pub async fn purchase(
        &self,
        session_id: Option<&str>,
        request: &PurchaseRequest,
    ) -> Result<PurchaseOutcome> {
        let session = self
            .authorized_session(session_id, Route::BuyInsurance)
            .await?;
        let (vehicle_price, risk_factor) = self.price_and_risk(&request.quote)?;
        self.reverify(&session, Route::BuyInsurance).await?;

        let policy = self
            .gateway
            .list_policies()
            .await?
            .into_iter()
            .find(|p| p.policy_id == request.policy_id)
            .ok_or_else(|| {
                DriveGuardError::NotFound(format!("policy {} does not exist", request.policy_id))
            })?;

        let quote = Self::quote_policy(policy, vehicle_price, risk_factor)?;
        let native_value = self
            .gateway
            .convert_to_native_currency(quote.premium)
            .await?;
        let receipt = self
            .gateway
            .submit_purchase(
                &session.wallet_address,
                quote.policy.policy_id,
                quote.premium,
                native_value,
            )
            .await?;

        Ok(PurchaseOutcome {
            quote,
            native_value,
            receipt,
        })
    }

    async fn overview(&self) -> Result<AdminOverview> {
        let policies = self.gateway.list_policies().await?;
        let policy_count = self.gateway.policy_count().await?;
        Ok(AdminOverview {
            policy_count,
            policies,
        })
    }

    /// Policy book for `/admin` and `/admin-policy`
    pub async fn admin_overview(&self, session_id: Option<&str>) -> Result<AdminOverview> {
        self.authorized_session(session_id, Route::AdminPolicy)
            .await?;
        self.overview().await
    }

    pub async fn create_policy(
        &self,
        session_id: Option<&str>,
        form: NewPolicyForm,
    ) -> Result<PolicyCreated> {
        let session = self
            .authorized_session(session_id, Route::AdminPolicy)
            .await?;
        let policy = NewPolicy::try_from(form)?;
        self.reverify(&session, Route::AdminPolicy).await?;

        let receipt = self
            .gateway
            .create_policy(&session.wallet_address, &policy)
            .await?;
        let overview = self.overview().await?;
        Ok(PolicyCreated { receipt, overview })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        chain::SimulatedChain, gateway::RoleContract, profile::InMemoryProfileStore,
        session::InMemorySessionStorage,
    };
    use rust_decimal_macros::dec;

    const ADMIN: &str = "0x1111111111111111111111111111111111111111";
    const HOLDER: &str = "0x2222222222222222222222222222222222222222";

    fn desk_with(config: DeskConfig) -> (InsuranceDesk, Arc<SimulatedChain>) {
        let chain = Arc::new(SimulatedChain::with_admins(&[ADMIN.to_string()]));
        let gateway = ContractGateway::new(chain.clone(), chain.clone());
        let desk = InsuranceDesk::new(
            gateway,
            Arc::new(InMemorySessionStorage::new()),
            Arc::new(InMemoryProfileStore::new()),
            VehicleCatalog::bundled(),
            config,
        );
        (desk, chain)
    }

    fn desk() -> (InsuranceDesk, Arc<SimulatedChain>) {
        desk_with(DeskConfig::default())
    }

    fn policy_form(plan: &str, base_rate: Decimal) -> NewPolicyForm {
        NewPolicyForm {
            plan_name: plan.to_string(),
            base_rate: Some(base_rate),
            deductible: dec!(500),
            coverage_amount: dec!(100000),
            third_party_liability: dec!(50000),
            cover: "Fire, Theft".to_string(),
        }
    }

    fn quote_request() -> QuoteRequest {
        QuoteRequest {
            car_brand: "Audi".to_string(),
            car_model: "A3".to_string(),
            manufactured_year: 2021,
            rating: RatingForm {
                vehicle_age: "3".to_string(),
                claim_history: "2".to_string(),
                car_usage_type: "commercial".to_string(),
                car_camera: "Yes".to_string(),
                location: "Bangkok".to_string(),
            },
        }
    }

    async fn registered_holder(desk: &InsuranceDesk) -> String {
        let login = desk.login(HOLDER).await.unwrap();
        desk.register(
            &login.session.id,
            RegistrationForm {
                first_name: "Somchai".to_string(),
                last_name: "Jaidee".to_string(),
                email: "somchai@example.com".to_string(),
            },
        )
        .await
        .unwrap();
        login.session.id
    }

    #[tokio::test]
    async fn test_login_routes_by_role() {
        let (desk, _) = desk();

        let admin = desk.login(ADMIN).await.unwrap();
        assert_eq!(admin.session.role, Role::Admin);
        assert_eq!(admin.redirect, "/admin-policy");

        let stranger = desk.login(HOLDER).await.unwrap();
        assert_eq!(stranger.session.role, Role::None);
        assert_eq!(stranger.redirect, "/register");

        let err = desk.login("not-a-wallet").await.unwrap_err();
        assert!(matches!(err, DriveGuardError::Validation(_)));
    }

    #[tokio::test]
    async fn test_registration_upgrades_session() {
        let (desk, _) = desk();
        let session_id = registered_holder(&desk).await;

        let session = desk.session(&session_id).await.unwrap();
        assert_eq!(session.role, Role::PolicyHolder);

        let profile = desk.profile(&session_id).await.unwrap().unwrap();
        assert_eq!(profile.email, "somchai@example.com");
        assert_eq!(profile.wallet_address, HOLDER);

        // a fresh login now lands on the home page
        let again = desk.login(HOLDER).await.unwrap();
        assert_eq!(again.redirect, "/");
    }

    #[tokio::test]
    async fn test_registration_requires_every_field() {
        let (desk, chain) = desk();
        let login = desk.login(HOLDER).await.unwrap();
        let err = desk
            .register(
                &login.session.id,
                RegistrationForm {
                    first_name: "Somchai".to_string(),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DriveGuardError::Validation(_)));
        assert!(!chain.is_user(HOLDER).await.unwrap());
    }

    #[tokio::test]
    async fn test_quote_and_purchase() {
        let (desk, chain) = desk();
        let admin = desk.login(ADMIN).await.unwrap().session.id;
        desk.create_policy(Some(&admin), policy_form("Comprehensive", dec!(0.03)))
            .await
            .unwrap();
        desk.create_policy(Some(&admin), policy_form("Basic", dec!(0.01)))
            .await
            .unwrap();

        let holder = registered_holder(&desk).await;
        let quotes = desk.quote(Some(&holder), &quote_request()).await.unwrap();
        assert_eq!(quotes.len(), 2);
        assert_eq!(quotes[0].vehicle_price, dec!(37000));
        assert_eq!(quotes[0].risk_factor, dec!(1.35));
        // 0.03 × 37000 × 1.35 = 1498.5
        assert_eq!(quotes[0].premium, 1499);
        // 0.01 × 37000 × 1.35 = 499.5
        assert_eq!(quotes[1].premium, 500);

        let outcome = desk
            .purchase(
                Some(&holder),
                &PurchaseRequest {
                    policy_id: 2,
                    quote: quote_request(),
                },
            )
            .await
            .unwrap();
        assert_eq!(outcome.quote.premium, 500);
        assert_eq!(outcome.native_value, 250 * 1_000_000_000_000_000_000);
        assert_eq!(outcome.receipt.value, outcome.native_value);

        let purchases = chain.purchases().unwrap();
        assert_eq!(purchases.len(), 1);
        assert_eq!(purchases[0].policy_id, 2);
    }

    #[tokio::test]
    async fn test_unknown_vehicle_is_not_found() {
        let (desk, _) = desk();
        let holder = registered_holder(&desk).await;
        let request = QuoteRequest {
            manufactured_year: 1999,
            ..quote_request()
        };
        let err = desk.quote(Some(&holder), &request).await.unwrap_err();
        assert!(matches!(err, DriveGuardError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_purchase_of_missing_policy() {
        let (desk, _) = desk();
        let holder = registered_holder(&desk).await;
        let err = desk
            .purchase(
                Some(&holder),
                &PurchaseRequest {
                    policy_id: 42,
                    quote: quote_request(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DriveGuardError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_access_control() {
        let (desk, _) = desk();
        let holder = registered_holder(&desk).await;
        let admin = desk.login(ADMIN).await.unwrap().session.id;

        assert!(matches!(
            desk.admin_overview(None).await.unwrap_err(),
            DriveGuardError::Unauthenticated
        ));
        assert!(matches!(
            desk.admin_overview(Some(&holder)).await.unwrap_err(),
            DriveGuardError::AccessDenied(_)
        ));
        assert!(matches!(
            desk.quote(Some(&admin), &quote_request()).await.unwrap_err(),
            DriveGuardError::AccessDenied(_)
        ));
        assert!(matches!(
            desk.available_policies(Some("missing")).await.unwrap_err(),
            DriveGuardError::SessionNotFound(_)
        ));

        let overview = desk.admin_overview(Some(&admin)).await.unwrap();
        assert_eq!(overview.policy_count, 0);

        desk.logout(&admin).await.unwrap();
        assert!(desk.admin_overview(Some(&admin)).await.is_err());
    }

    #[tokio::test]
    async fn test_revoked_admin_is_reverified() {
        // the chain only knows ADMIN, so a forged admin session fails the re-check
        let (desk, _) = desk();
        let forged = Session::new(HOLDER, Role::Admin);
        desk.sessions.save(forged.clone()).await.unwrap();

        let err = desk
            .create_policy(Some(&forged.id), policy_form("Forged", dec!(0.05)))
            .await
            .unwrap_err();
        assert!(matches!(err, DriveGuardError::AccessDenied(_)));

        let (trusting, _) = desk_with(DeskConfig {
            reverify_roles: false,
        });
        trusting.sessions.save(forged.clone()).await.unwrap();
        // without the re-check the contract itself reverts
        let err = trusting
            .create_policy(Some(&forged.id), policy_form("Forged", dec!(0.05)))
            .await
            .unwrap_err();
        assert!(matches!(err, DriveGuardError::NetworkOrContract(_)));
    }

    #[tokio::test]
    async fn test_provider_failures_surface() {
        let (desk, chain) = desk();
        chain.set_offline(true);
        assert!(matches!(
            desk.login(ADMIN).await.unwrap_err(),
            DriveGuardError::ProviderUnavailable(_)
        ));
        chain.set_offline(false);

        let login = desk.login(HOLDER).await.unwrap();
        chain.set_rejecting(true);
        let err = desk
            .register(
                &login.session.id,
                RegistrationForm {
                    first_name: "A".to_string(),
                    last_name: "B".to_string(),
                    email: "a@b.c".to_string(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DriveGuardError::UserRejected(_)));
        assert_eq!(
            desk.session(&login.session.id).await.unwrap().role,
            Role::None
        );
        assert!(desk.profile(&login.session.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_wallet_casing_does_not_split_profiles() {
        let (desk, _) = desk();
        let mixed = "0xAbCdEf0123456789aBcDeF0123456789AbCdEf01";

        let first = desk.login(mixed).await.unwrap();
        assert_eq!(first.session.wallet_address, mixed.to_ascii_lowercase());
        desk.register(
            &first.session.id,
            RegistrationForm {
                first_name: "Somchai".to_string(),
                last_name: "Jaidee".to_string(),
                email: "somchai@example.com".to_string(),
            },
        )
        .await
        .unwrap();

        let second = desk.login(&mixed.to_ascii_lowercase()).await.unwrap();
        assert_eq!(second.session.role, Role::PolicyHolder);
        assert_eq!(second.redirect, "/");
        let profile = desk.profile(&second.session.id).await.unwrap().unwrap();
        assert_eq!(profile.email, "somchai@example.com");

        let upper = mixed.to_ascii_uppercase().replacen("0X", "0x", 1);
        let third = desk.login(&upper).await.unwrap();
        assert!(desk.profile(&third.session.id).await.unwrap().is_some());
    }
}
