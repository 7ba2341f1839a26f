use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{DriveGuardError, Result};

/// Insurance product as recorded by the policy contract
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    pub policy_id: u64,
    pub plan_name: String,
    pub base_rate: Decimal,
    pub deductible: Decimal,
    pub coverage_amount: Decimal,
    pub third_party_liability: Decimal,
    pub covered_perils: Vec<String>,
}

/// Admin form for a new policy
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NewPolicyForm {
    pub plan_name: String,
    pub base_rate: Option<Decimal>,
    pub deductible: Decimal,
    pub coverage_amount: Decimal,
    pub third_party_liability: Decimal,
    /// Comma separated, e.g. "Fire, Theft, Natural Disasters"
    pub cover: String,
}

/// Validated fields submitted to `createPolicy`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPolicy {
    pub plan_name: String,
    pub base_rate: Decimal,
    pub deductible: Decimal,
    pub coverage_amount: Decimal,
    pub third_party_liability: Decimal,
    pub covered_perils: Vec<String>,
}

/// Splits a comma-separated cover list, dropping blank items
pub fn parse_perils(cover: &str) -> Vec<String> {
    cover
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

impl TryFrom<NewPolicyForm> for NewPolicy {
    type Error = DriveGuardError;

    fn try_from(form: NewPolicyForm) -> Result<Self> {
        let plan_name = form.plan_name.trim().to_string();
        if plan_name.is_empty() {
            return Err(DriveGuardError::Validation(
                "plan_name is required".to_string(),
            ));
        }

        let base_rate = form
            .base_rate
            .ok_or_else(|| DriveGuardError::Validation("base_rate is required".to_string()))?;

        let covered_perils = parse_perils(&form.cover);
        if covered_perils.is_empty() {
            return Err(DriveGuardError::Validation(
                "cover must list at least one peril".to_string(),
            ));
        }

        for (name, value) in [
            ("base_rate", base_rate),
            ("deductible", form.deductible),
            ("coverage_amount", form.coverage_amount),
            ("third_party_liability", form.third_party_liability),
        ] {
            if value.is_sign_negative() {
                return Err(DriveGuardError::Validation(format!(
                    "{} must be non-negative, got {}",
                    name, value
                )));
            }
        }

        Ok(Self {
            plan_name,
            base_rate,
            deductible: form.deductible,
            coverage_amount: form.coverage_amount,
            third_party_liability: form.third_party_liability,
            covered_perils,
        })
    }
}
