pub mod access;
pub mod catalog;
pub mod chain;
pub mod desk;
pub mod error;
pub mod gateway;
pub mod policy;
pub mod premium;
pub mod profile;
pub mod rating;
pub mod session;
pub mod storage_postgres;

// Re-export commonly used types
pub use access::{Route, authorize};
pub use catalog::{VehicleCatalog, VehicleCatalogEntry};
pub use chain::{ContractAddresses, DEFAULT_ETH_USD_PRICE, Purchase, SimulatedChain};
pub use desk::{
    AdminOverview, DeskConfig, InsuranceDesk, LoginOutcome, PolicyCreated, PolicyQuote,
    PurchaseOutcome, PurchaseRequest, QuoteRequest, RegistrationForm, RegistrationOutcome,
};
pub use error::{DriveGuardError, Result};
pub use gateway::{ContractGateway, PolicyContract, RoleCheck, RoleContract, TxReceipt};
pub use policy::{NewPolicy, NewPolicyForm, Policy};
pub use premium::compute_premium;
pub use profile::{InMemoryProfileStore, ProfileStore, UserProfile};
pub use rating::{RatingForm, RatingInput, Region, UsageType, compute_risk_factor};
pub use session::{InMemorySessionStorage, Role, Session, SessionStorage};
pub use storage_postgres::{PostgresProfileStore, PostgresSessionStorage};
