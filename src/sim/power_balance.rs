//! Site power balance settlement.

/// Realized flows at the point of common coupling for one step.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GridFlows {
    /// Grid import (kW, >= 0).
    pub import_kw: f64,
    /// Grid export (kW, >= 0).
    pub export_kw: f64,
    /// Demand left unserved while islanded (kW, >= 0).
    pub unserved_kw: f64,
    /// Generation curtailed while islanded (kW, >= 0).
    pub curtailed_kw: f64,
}

/// Net grid power required to balance the site.
///
/// Battery power follows the battery convention (positive = charge), so a
/// charging battery adds to the grid draw and a discharging one reduces it.
///
/// # Arguments
///
/// * `load_kw` - Load demand (kW, >= 0)
/// * `solar_kw` - PV generation (kW, >= 0)
/// * `battery_kw` - Realized battery power (positive=charge, negative=discharge)
///
/// # Returns
///
/// Net grid power in kW (positive=import, negative=export)
pub fn net_grid_kw(load_kw: f64, solar_kw: f64, battery_kw: f64) -> f64 {
    load_kw - solar_kw + battery_kw
}

/// Splits the net grid power into directional flows.
///
/// With the grid available the whole residual goes to import or export.
/// Without it the residual becomes unserved demand or curtailed generation.
pub fn settle(load_kw: f64, solar_kw: f64, battery_kw: f64, grid_available: bool) -> GridFlows {
    let net = net_grid_kw(load_kw, solar_kw, battery_kw);
    let (deficit, surplus) = (net.max(0.0), (-net).max(0.0));

    if grid_available {
        GridFlows {
            import_kw: deficit,
            export_kw: surplus,
            ..GridFlows::default()
        }
    } else {
        GridFlows {
            unserved_kw: deficit,
            curtailed_kw: surplus,
            ..GridFlows::default()
        }
    }
}
