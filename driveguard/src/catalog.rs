use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One priced vehicle in the bundled catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VehicleCatalogEntry {
    pub brand: String,
    pub model: String,
    pub year: u16,
    pub price: Decimal,
}

// brand, model, [(year, price)]
const CATALOG: &[(&str, &str, &[(u16, i64)])] = &[
    ("Audi", "A3", &[(2020, 35000), (2021, 37000), (2022, 39000)]),
    ("Audi", "A4", &[(2020, 40000), (2021, 42000), (2022, 44000)]),
    ("BMW", "3 Series", &[(2020, 41000), (2021, 43000), (2022, 45000)]),
    ("BMW", "5 Series", &[(2020, 52000), (2021, 54000), (2022, 56000)]),
    ("Toyota", "Corolla", &[(2020, 20000), (2021, 21000), (2022, 22000)]),
    ("Toyota", "Camry", &[(2020, 25000), (2021, 26000), (2022, 27000)]),
];

/// Static brand → model → year → price reference data
#[derive(Debug, Clone)]
pub struct VehicleCatalog {
    entries: Vec<VehicleCatalogEntry>,
}

impl VehicleCatalog {
    pub fn new(entries: Vec<VehicleCatalogEntry>) -> Self {
        Self { entries }
    }

    /// The catalog shipped with the application
    pub fn bundled() -> Self {
        let entries = CATALOG
            .iter()
            .flat_map(|(brand, model, years)| {
                years.iter().map(move |(year, price)| VehicleCatalogEntry {
                    brand: brand.to_string(),
                    model: model.to_string(),
                    year: *year,
                    price: Decimal::from(*price),
                })
            })
            .collect();
        Self::new(entries)
    }

    /// Price of an exact brand/model/year, `None` when the catalog has no such vehicle
    pub fn resolve_price(&self, brand: &str, model: &str, year: u16) -> Option<Decimal> {
        self.entries
            .iter()
            .find(|e| e.brand == brand && e.model == model && e.year == year)
            .map(|e| e.price)
    }

    pub fn brands(&self) -> Vec<&str> {
        let mut brands: Vec<&str> = Vec::new();
        for entry in &self.entries {
            if !brands.contains(&entry.brand.as_str()) {
                brands.push(&entry.brand);
            }
        }
        brands
    }

    pub fn models(&self, brand: &str) -> Vec<&str> {
        let mut models: Vec<&str> = Vec::new();
        for entry in self.entries.iter().filter(|e| e.brand == brand) {
            if !models.contains(&entry.model.as_str()) {
                models.push(&entry.model);
            }
        }
        models
    }

    pub fn years(&self, brand: &str, model: &str) -> Vec<u16> {
        self.entries
            .iter()
            .filter(|e| e.brand == brand && e.model == model)
            .map(|e| e.year)
            .collect()
    }

    pub fn entries(&self) -> &[VehicleCatalogEntry] {
        &self.entries
    }
}

impl Default for VehicleCatalog {
    fn default() -> Self {
        Self::bundled()
    }
}
