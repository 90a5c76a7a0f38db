//! E-commerce Products API payload shapes

use serde::Deserialize;
use std::collections::HashMap;

pub const PRODUCT_CLASS_COURSE_ENTITLEMENT: &str = "Course Entitlement";
pub const PRODUCT_CLASS_ENROLLMENT_CODE: &str = "Enrollment Code";

/// One sellable product. `structure` distinguishes parent placeholders,
/// children of a course-run product, and standalone products.
#[derive(Debug, Clone, Deserialize)]
pub struct ProductRecord {
    #[serde(default)]
    pub id: Option<String>,
    /// For children, the id of the owning course-run product (the run key)
    #[serde(default)]
    pub parent: Option<String>,
    pub structure: String,
    #[serde(default)]
    pub product_class: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub expires: Option<String>,
    #[serde(default)]
    pub attribute_values: Vec<AttributeValue>,
    #[serde(default)]
    pub stockrecords: Vec<StockRecord>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AttributeValue {
    pub name: String,
    #[serde(default)]
    pub value: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StockRecord {
    pub price_currency: String,
    pub price_excl_tax: String,
    #[serde(default)]
    pub partner_sku: Option<String>,
}

impl ProductRecord {
    pub fn is_parent(&self) -> bool {
        self.structure == "parent"
    }

    pub fn is_child(&self) -> bool {
        self.structure == "child"
    }

    pub fn is_standalone(&self) -> bool {
        self.structure == "standalone"
    }

    /// Attribute list flattened to name → string value
    pub fn attributes(&self) -> HashMap<&str, String> {
        self.attribute_values
            .iter()
            .map(|attr| {
                let value = match &attr.value {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string().trim_matches('"').to_string(),
                };
                (attr.name.as_str(), value)
            })
            .collect()
    }

    /// The single stockrecord carrying price, currency and SKU
    pub fn stockrecord(&self) -> Option<&StockRecord> {
        self.stockrecords.first()
    }
}

impl StockRecord {
    pub fn price(&self) -> Option<f64> {
        self.price_excl_tax.parse().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_child_seat_product() {
        let product: ProductRecord = serde_json::from_str(
            r#"{
                "id": "seat-1",
                "parent": "course-v1:MITx+6.00x+1T2024",
                "structure": "child",
                "product_class": "Seat",
                "attribute_values": [
                    {"name": "certificate_type", "value": "verified"},
                    {"name": "credit_hours", "value": 3}
                ],
                "stockrecords": [
                    {"price_currency": "USD", "price_excl_tax": "49.00", "partner_sku": "S1"}
                ]
            }"#,
        )
        .unwrap();
        assert!(product.is_child());
        let attributes = product.attributes();
        assert_eq!(attributes.get("certificate_type").map(String::as_str), Some("verified"));
        assert_eq!(attributes.get("credit_hours").map(String::as_str), Some("3"));
        assert_eq!(product.stockrecord().unwrap().price(), Some(49.0));
    }

    #[test]
    fn parses_entitlement_product() {
        let product: ProductRecord = serde_json::from_str(
            r#"{
                "structure": "child",
                "product_class": "Course Entitlement",
                "attribute_values": [
                    {"name": "UUID", "value": "3f2ad743-adde-4aa2-92fb-b23a076873a6"},
                    {"name": "certificate_type", "value": "verified"}
                ],
                "stockrecords": [
                    {"price_currency": "USD", "price_excl_tax": "99.00", "partner_sku": "ENT-1"}
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(
            product.product_class.as_deref(),
            Some(PRODUCT_CLASS_COURSE_ENTITLEMENT)
        );
        assert!(product.attributes().contains_key("UUID"));
    }

    #[test]
    fn unparseable_price_is_none() {
        let record = StockRecord {
            price_currency: "USD".to_string(),
            price_excl_tax: "free".to_string(),
            partner_sku: None,
        };
        assert_eq!(record.price(), None);
    }
}
