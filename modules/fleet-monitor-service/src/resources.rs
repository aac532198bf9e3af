//! Resource provisioning and lookup.

use crate::db::{self, Db};
use crate::error::{FleetError, FleetResult};
use crate::health;
use fleet_monitor_types::*;

pub fn create_resource(db: &Db, new: &NewResource) -> FleetResult<Resource> {
    validate_new_resource(new)?;
    let assessed = health::score(&TelemetrySnapshot {
        cpu_usage: new.cpu_usage,
        memory_usage: new.memory_usage,
        storage_usage: new.storage_usage,
        connections_active: new.connections_active,
        connections_max: new.connections_max,
    });
    db.transaction(|tx| {
        let id = db::resources::insert(tx, new, assessed.score, assessed.status, chrono::Utc::now())?;
        db::resources::require(tx, id)
    })
}

pub fn get_resource(db: &Db, id: i64) -> FleetResult<Resource> {
    db.read(|conn| db::resources::require(conn, id))
}

pub fn list_resources(db: &Db, filter: &ResourceFilter) -> FleetResult<Vec<Resource>> {
    db.read(|conn| Ok(db::resources::list(conn, filter)?))
}

/// Removes the resource; its issues, billing records and samples go with it.
pub fn delete_resource(db: &Db, id: i64) -> FleetResult<()> {
    db.transaction(|tx| {
        if db::resources::delete(tx, id)? {
            Ok(())
        } else {
            Err(FleetError::not_found("Resource", id))
        }
    })
}

fn validate_new_resource(new: &NewResource) -> FleetResult<()> {
    if new.name.trim().is_empty() {
        return Err(FleetError::validation("name must not be empty"));
    }
    if new.region.trim().is_empty() {
        return Err(FleetError::validation("region must not be empty"));
    }
    if new.connections_max < 1 {
        return Err(FleetError::validation("connections_max must be at least 1"));
    }
    if new.connections_active < 0 {
        return Err(FleetError::validation("connections_active must not be negative"));
    }
    for (field, value) in [
        ("cpu_usage", new.cpu_usage),
        ("memory_usage", new.memory_usage),
        ("storage_usage", new.storage_usage),
    ] {
        validate_percentage(field, value)?;
    }
    if !new.monthly_cost.is_finite() || new.monthly_cost < 0.0 {
        return Err(FleetError::validation("monthly_cost must be a non-negative number"));
    }
    Ok(())
}

pub(crate) fn validate_percentage(field: &str, value: f64) -> FleetResult<()> {
    if !value.is_finite() || !(0.0..=100.0).contains(&value) {
        return Err(FleetError::validation(format!(
            "{} must be within [0, 100], got {}",
            field, value
        )));
    }
    Ok(())
}
