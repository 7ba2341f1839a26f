use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{DriveGuardError, Result};

/// How the insured vehicle is used
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UsageType {
    Personal,
    Commercial,
}

/// Where the policy holder resides
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Region {
    #[serde(rename = "Bangkok")]
    RegionA,
    #[serde(rename = "Perimeter")]
    RegionB,
    #[serde(rename = "Other")]
    Other,
}

/// Rating factors for a single quote
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatingInput {
    pub vehicle_age_years: u32,
    pub prior_claim_count: u32,
    pub usage_type: UsageType,
    pub has_dashcam: bool,
    pub region: Region,
}

/// Raw rating fields as submitted by the quote form.
///
/// Every field is a string and a missing key deserializes as empty, so that
/// absent or malformed values reach [`RatingInput::try_from`] and are
/// rejected there with the field name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RatingForm {
    pub vehicle_age: String,
    pub claim_history: String,
    pub car_usage_type: String,
    pub car_camera: String,
    pub location: String,
}

fn parse_count(field: &str, raw: &str) -> Result<u32> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(DriveGuardError::Validation(format!("{} is required", field)));
    }
    trimmed.parse::<u32>().map_err(|_| {
        DriveGuardError::Validation(format!(
            "{} must be a non-negative whole number, got '{}'",
            field, raw
        ))
    })
}

impl TryFrom<&RatingForm> for RatingInput {
    type Error = DriveGuardError;

    fn try_from(form: &RatingForm) -> Result<Self> {
        let vehicle_age_years = parse_count("vehicle_age", &form.vehicle_age)?;
        let prior_claim_count = parse_count("claim_history", &form.claim_history)?;

        let usage_type = match form.car_usage_type.trim() {
            "personal" => UsageType::Personal,
            "commercial" => UsageType::Commercial,
            other => {
                return Err(DriveGuardError::Validation(format!(
                    "car_usage_type must be 'personal' or 'commercial', got '{}'",
                    other
                )));
            }
        };

        let has_dashcam = match form.car_camera.trim() {
            "Yes" => true,
            "No" => false,
            other => {
                return Err(DriveGuardError::Validation(format!(
                    "car_camera must be 'Yes' or 'No', got '{}'",
                    other
                )));
            }
        };

        let region = match form.location.trim() {
            "Bangkok" => Region::RegionA,
            "Perimeter" => Region::RegionB,
            "Other" => Region::Other,
            other => {
                return Err(DriveGuardError::Validation(format!(
                    "location must be 'Bangkok', 'Perimeter' or 'Other', got '{}'",
                    other
                )));
            }
        };

        Ok(Self {
            vehicle_age_years,
            prior_claim_count,
            usage_type,
            has_dashcam,
            region,
        })
    }
}

/// Multiplicative risk factor for a quote, never below 1.0
pub fn compute_risk_factor(input: &RatingInput) -> Decimal {
    let mut factor = Decimal::ONE;

    if input.vehicle_age_years > 5 {
        factor += Decimal::new(10, 2);
    }

    factor += Decimal::new(5, 2) * Decimal::from(input.prior_claim_count);

    if input.usage_type == UsageType::Commercial {
        factor += Decimal::new(20, 2);
    }

    if input.has_dashcam {
        factor -= Decimal::new(10, 2);
    }

    factor += match input.region {
        Region::RegionA => Decimal::new(15, 2),
        Region::RegionB => Decimal::new(5, 2),
        Region::Other => Decimal::ZERO,
    };

    factor.max(Decimal::ONE)
}
