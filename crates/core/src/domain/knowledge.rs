use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub name: String,
    pub price: Option<Decimal>,
    pub description: Option<String>,
    pub features: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    pub name: String,
    pub price: Option<Decimal>,
    pub description: Option<String>,
    pub benefits: Vec<String>,
}

/// Everything a company has told us that the conversation engine may draw on.
/// `custom_script` overrides the generated greeting when present.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyKnowledge {
    pub company_name: Option<String>,
    pub description: Option<String>,
    pub products: Vec<Product>,
    pub services: Vec<Service>,
    pub sales_instructions: Option<String>,
    pub custom_script: Option<String>,
}
