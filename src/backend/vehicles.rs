//! Vehicle lookup client
//!
//! `GET /api/vehicles/{vin}`. Depending on the backend revision the record
//! comes back with lower-camel keys (`vin`, `bodyType`) or the decoder's
//! upper-camel keys (`VIN`, `BodyClass`); the expected shape is a
//! configuration choice, with key-based detection as the default.

use async_trait::async_trait;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{error_for_status, read_json, ApiClient};
use crate::config::VehicleSchema;
use crate::error::{ApiError, LookupError};
use crate::vision::is_vin_shaped;
use crate::workflow::models::VehicleRecord;

/// Resolves a VIN to vehicle attributes
#[async_trait]
pub trait VehicleLookup: Send + Sync {
    async fn lookup(&self, vin: &str) -> Result<VehicleRecord, LookupError>;
}

/// Lookup through the invoicing backend
pub struct HttpVehicleLookup {
    api: Arc<ApiClient>,
    schema: VehicleSchema,
}

impl HttpVehicleLookup {
    pub fn new(api: Arc<ApiClient>, schema: VehicleSchema) -> Self {
        Self { api, schema }
    }
}

#[async_trait]
impl VehicleLookup for HttpVehicleLookup {
    async fn lookup(&self, vin: &str) -> Result<VehicleRecord, LookupError> {
        if !is_vin_shaped(vin) {
            return Err(LookupError::InvalidVin(vin.to_string()));
        }

        let url = self.api.endpoint(&["api", "vehicles", vin])?;
        let response = error_for_status(self.api.get(url).await?).await?;
        let body: Value = read_json(response).await?;

        let record = parse_vehicle(vin, &body, self.schema)?;
        info!(
            "Resolved {} to {} {} {}",
            vin,
            record.year.map(|y| y.to_string()).unwrap_or_default(),
            record.make.as_deref().unwrap_or("?"),
            record.model.as_deref().unwrap_or("?")
        );
        Ok(record)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LowerCamelVehicle {
    vin: Option<String>,
    make: Option<String>,
    model: Option<String>,
    #[serde(default, deserialize_with = "lenient_year")]
    year: Option<i32>,
    body_type: Option<String>,
    fuel_type: Option<String>,
    manufacturer: Option<String>,
    plant_country: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct UpperCamelVehicle {
    #[serde(rename = "VIN")]
    vin: Option<String>,
    make: Option<String>,
    model: Option<String>,
    #[serde(default, deserialize_with = "lenient_year")]
    model_year: Option<i32>,
    body_class: Option<String>,
    fuel_type_primary: Option<String>,
    #[serde(alias = "ManufacturerName")]
    manufacturer: Option<String>,
    plant_country: Option<String>,
}

/// Build a [`VehicleRecord`] for `vin` from a lookup response
pub fn parse_vehicle(vin: &str, body: &Value, schema: VehicleSchema) -> Result<VehicleRecord, LookupError> {
    if !body.is_object() {
        return Err(ApiError::Decode(format!("expected a vehicle object, got {}", body)).into());
    }

    let schema = match schema {
        VehicleSchema::Auto => detect_schema(body),
        fixed => fixed,
    };
    debug!("Parsing vehicle response as {:?}", schema);

    let decode = |e: serde_json::Error| LookupError::Api(ApiError::Decode(e.to_string()));
    let mut record = VehicleRecord::new(vin)?;

    let returned_vin = match schema {
        VehicleSchema::UpperCamel => {
            let wire = UpperCamelVehicle::deserialize(body).map_err(decode)?;
            record.make = non_empty(wire.make);
            record.model = non_empty(wire.model);
            record.year = wire.model_year;
            record.body_type = non_empty(wire.body_class);
            record.fuel_type = non_empty(wire.fuel_type_primary);
            record.manufacturer = non_empty(wire.manufacturer);
            record.plant_country = non_empty(wire.plant_country);
            wire.vin
        }
        VehicleSchema::LowerCamel | VehicleSchema::Auto => {
            let wire = LowerCamelVehicle::deserialize(body).map_err(decode)?;
            record.make = non_empty(wire.make);
            record.model = non_empty(wire.model);
            record.year = wire.year;
            record.body_type = non_empty(wire.body_type);
            record.fuel_type = non_empty(wire.fuel_type);
            record.manufacturer = non_empty(wire.manufacturer);
            record.plant_country = non_empty(wire.plant_country);
            wire.vin
        }
    };

    if let Some(returned) = non_empty(returned_vin) {
        if returned != vin {
            warn!("Lookup for {} answered with VIN {}; keeping the scanned VIN", vin, returned);
        }
    }

    Ok(record)
}

fn detect_schema(body: &Value) -> VehicleSchema {
    const UPPER_KEYS: &[&str] = &["VIN", "Make", "ModelYear", "BodyClass"];
    const LOWER_KEYS: &[&str] = &["vin", "make", "year", "bodyType"];

    let has_any = |keys: &[&str]| keys.iter().any(|k| body.get(*k).is_some());
    if has_any(LOWER_KEYS) {
        VehicleSchema::LowerCamel
    } else if has_any(UPPER_KEYS) {
        VehicleSchema::UpperCamel
    } else {
        VehicleSchema::LowerCamel
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Year as a number, a numeric string, empty or null
fn lenient_year<'de, D>(deserializer: D) -> Result<Option<i32>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(n)) => n.as_i64().and_then(|y| i32::try_from(y).ok()),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}
