//! Transaction data structures submitted for fraud scoring

use crate::error::InvalidTransaction;
use serde::{Deserialize, Serialize};

/// A single payment transaction as delivered by the scoring caller.
///
/// Ingestion rejects out-of-range attributes with [`Transaction::validate`].
/// Past that point the scoring core never fails on them, it only decides
/// which risk factors fire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Transaction amount in account currency
    pub amount: f64,

    /// Local hour the transaction was made (0-23)
    pub hour_of_day: u8,

    /// Recent transaction frequency for the account
    pub velocity: f64,

    /// Distance from the previous transaction location, in kilometers
    pub geo_distance: f64,

    /// Optional coordinates of the transaction
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,

    /// Human-readable place name, if a geocoding collaborator resolved one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

impl Transaction {
    /// Create a transaction from the four scoring attributes
    pub fn new(amount: f64, hour_of_day: u8, velocity: f64, geo_distance: f64) -> Self {
        Self {
            amount,
            hour_of_day,
            velocity,
            geo_distance,
            latitude: None,
            longitude: None,
            location: None,
        }
    }

    /// Attach coordinates to the transaction
    pub fn with_coordinates(mut self, latitude: f64, longitude: f64) -> Self {
        self.latitude = Some(latitude);
        self.longitude = Some(longitude);
        self
    }

    /// Attach a resolved location label
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Check attribute ranges: hour in 0-23, non-negative finite amount,
    /// velocity and distance, and coordinates on the globe when present.
    pub fn validate(&self) -> Result<(), InvalidTransaction> {
        if self.hour_of_day > 23 {
            return Err(invalid("hour_of_day", format!("must be 0-23, got {}", self.hour_of_day)));
        }
        for (field, value) in [
            ("amount", self.amount),
            ("velocity", self.velocity),
            ("geo_distance", self.geo_distance),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(invalid(field, format!("must be a non-negative number, got {}", value)));
            }
        }
        if let Some(lat) = self.latitude {
            if !(-90.0..=90.0).contains(&lat) {
                return Err(invalid("latitude", format!("must be within [-90, 90], got {}", lat)));
            }
        }
        if let Some(lon) = self.longitude {
            if !(-180.0..=180.0).contains(&lon) {
                return Err(invalid("longitude", format!("must be within [-180, 180], got {}", lon)));
            }
        }
        Ok(())
    }

    /// Location label for alert payloads
    pub fn location_label(&self) -> &str {
        self.location.as_deref().unwrap_or("Unknown")
    }
}

fn invalid(field: &'static str, reason: String) -> InvalidTransaction {
    InvalidTransaction { field, reason }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transaction_deserialize_minimal() {
        let json = r#"{"amount": 120.5, "hour_of_day": 14, "velocity": 1.0, "geo_distance": 3.2}"#;
        let tx: Transaction = serde_json::from_str(json).unwrap();

        assert_eq!(tx.amount, 120.5);
        assert_eq!(tx.hour_of_day, 14);
        assert!(tx.latitude.is_none());
        assert_eq!(tx.location_label(), "Unknown");
    }

    #[test]
    fn test_optional_fields_are_omitted() {
        let tx = Transaction::new(10.0, 9, 0.0, 0.0);
        let json = serde_json::to_value(&tx).unwrap();

        assert!(json.get("latitude").is_none());
        assert!(json.get("location").is_none());

        let tx = tx.with_coordinates(40.7, -74.0).with_location("New York");
        assert_eq!(tx.location_label(), "New York");
        let json = serde_json::to_value(&tx).unwrap();
        assert_eq!(json["latitude"], 40.7);
    }

    #[test]
    fn test_validate_ranges() {
        assert!(Transaction::new(0.0, 0, 0.0, 0.0).validate().is_ok());
        assert!(Transaction::new(10.0, 23, 1.0, 5.0)
            .with_coordinates(-90.0, 180.0)
            .validate()
            .is_ok());

        let err = Transaction::new(10.0, 24, 1.0, 5.0).validate().unwrap_err();
        assert_eq!(err.field, "hour_of_day");

        let err = Transaction::new(-5.0, 12, 1.0, 5.0).validate().unwrap_err();
        assert_eq!(err.field, "amount");
        assert_eq!(err.to_string(), "invalid transaction: amount must be a non-negative number, got -5");

        let err = Transaction::new(5.0, 12, f64::NAN, 5.0).validate().unwrap_err();
        assert_eq!(err.field, "velocity");

        let err = Transaction::new(5.0, 12, 1.0, -0.1).validate().unwrap_err();
        assert_eq!(err.field, "geo_distance");

        let err = Transaction::new(5.0, 12, 1.0, 1.0)
            .with_coordinates(95.0, 0.0)
            .validate()
            .unwrap_err();
        assert_eq!(err.field, "latitude");
    }
}
