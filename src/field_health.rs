//! Multi-source satellite aggregation for the field-health report.
//!
//! One parameterized pipeline, run per request: buffer the query point to an
//! AOI, pick the best scene from each of three independent archives inside a
//! trailing 90-day window, derive per-pixel indices, and reduce each to a
//! single averaged value plus a renderable tile layer.
//!
//! Sources are independent: an archive with no matching scene simply omits
//! its outputs from the report (partial-result tolerance). The soil-carbon
//! reduction runs unconditionally against a static global dataset. Any
//! upstream error propagates out of [`build_report`]; the HTTP layer catches
//! it and answers `{"error": message}` with HTTP 200.

use anyhow::Result;

use crate::aoi::{trailing_window, Aoi};
use crate::config::EarthEngineConfig;
use crate::ee::expr::{self, Expr};
use crate::ee::{EarthEngineClient, VisParams};
use crate::models::{FieldHealthReport, HealthStatus};

// Source archives.
const S2_COLLECTION: &str = "COPERNICUS/S2_SR_HARMONIZED";
const S1_COLLECTION: &str = "COPERNICUS/S1_GRD";
const LANDSAT8_COLLECTION: &str = "LANDSAT/LC08/C02/T1_L2";
const LANDSAT9_COLLECTION: &str = "LANDSAT/LC09/C02/T1_L2";
const SOC_IMAGE: &str = "projects/soilgrids-isric/soc_mean";
const SOC_BAND: &str = "soc_0-5cm_mean";

// Reduction scales, meters per pixel.
const S2_SCALE: f64 = 10.0;
const LST_SCALE: f64 = 30.0;
const SOC_SCALE: f64 = 250.0;

// Landsat Collection 2 Level-2 ST_B10 calibration: digital number to Kelvin,
// then Kelvin to Celsius.
const LST_GAIN: f64 = 0.003_418_02;
const LST_OFFSET: f64 = 149.0;
const KELVIN_TO_CELSIUS: f64 = 273.15;

const NDVI_VIS: VisParams = VisParams {
    min: -0.2,
    max: 0.8,
    palette: &["red", "yellow", "green"],
};
const NDWI_VIS: VisParams = VisParams {
    min: -0.6,
    max: 0.6,
    palette: &["brown", "yellow", "cyan", "blue"],
};
const RADAR_VIS: VisParams = VisParams {
    min: -25.0,
    max: 0.0,
    palette: &["red", "orange", "yellow", "cyan", "blue"],
};
const LST_VIS: VisParams = VisParams {
    min: 15.0,
    max: 45.0,
    palette: &["blue", "cyan", "green", "yellow", "orange", "red"],
};

/// Landsat ST_B10 digital number to Celsius.
pub fn lst_digital_to_celsius(digital: f64) -> f64 {
    digital * LST_GAIN + LST_OFFSET - KELVIN_TO_CELSIUS
}

/// Format a raw SoilGrids soc value (g/kg × 10) as a percentage string.
pub fn format_soil_carbon(raw: f64) -> String {
    format!("{:.2}%", raw / 10.0)
}

/// Round a temperature to one decimal place for display.
pub fn round_temperature(celsius: f64) -> f64 {
    (celsius * 10.0).round() / 10.0
}

/// Raw per-source readings gathered from the raster provider, before
/// assembly into the response shape. Every field except `soil_carbon` is
/// absent when its source had no scene in the window.
#[derive(Debug, Clone, Default)]
pub struct SourceReadings {
    pub avg_ndvi: Option<f64>,
    pub ndvi_map_url: Option<String>,
    pub ndwi_map_url: Option<String>,
    pub soil_moisture_map_url: Option<String>,
    pub avg_lst_celsius: Option<f64>,
    pub lst_map_url: Option<String>,
    pub soil_carbon: Option<f64>,
}

/// Assemble the response from raw readings. Pure, so the no-scene and
/// threshold behaviors are testable without a network.
pub fn assemble_report(aoi: &Aoi, readings: &SourceReadings) -> FieldHealthReport {
    FieldHealthReport {
        health_status: readings
            .avg_ndvi
            .map(HealthStatus::from_ndvi)
            .unwrap_or(HealthStatus::Analyzing),
        avg_temp_celsius: readings.avg_lst_celsius.map(round_temperature),
        soil_organic_carbon: readings.soil_carbon.map(format_soil_carbon),
        ndvi_map_url: readings.ndvi_map_url.clone(),
        ndwi_map_url: readings.ndwi_map_url.clone(),
        soil_moisture_map_url: readings.soil_moisture_map_url.clone(),
        lst_map_url: readings.lst_map_url.clone(),
        field_boundary: aoi.field_boundary(),
    }
}

/// Run the full aggregation for a point and build the report.
pub async fn build_report(
    client: &EarthEngineClient,
    config: &EarthEngineConfig,
    lat: f64,
    lon: f64,
) -> Result<FieldHealthReport> {
    let aoi = Aoi::new(lat, lon, config.buffer_meters);
    let (start_ms, end_ms) = trailing_window(config.window_days);
    let geometry = expr::bbox(&aoi.bounds);

    let mut readings = SourceReadings::default();

    // Sentinel-2: least-cloudy optical scene -> NDVI mean + NDVI/NDWI tiles.
    let s2 = client
        .best_scene(optical_collection(&geometry, start_ms, end_ms))
        .await?;
    if let Some(scene) = s2 {
        let ndvi = scene
            .clone()
            .normalized_difference("B8", "B4")
            .rename("NDVI");

        readings.avg_ndvi = client
            .compute_number(
                ndvi.clone()
                    .reduce_region_mean(&geometry, S2_SCALE)
                    .get("NDVI"),
            )
            .await?;
        readings.ndvi_map_url = Some(client.map_tile_url(ndvi, &NDVI_VIS).await?);

        let ndwi = scene.normalized_difference("B3", "B8").rename("NDWI");
        readings.ndwi_map_url = Some(client.map_tile_url(ndwi, &NDWI_VIS).await?);
    }

    // Sentinel-1: most recent VV radar scene -> backscatter tile.
    let s1 = client
        .best_scene(radar_collection(&geometry, start_ms, end_ms))
        .await?;
    if let Some(scene) = s1 {
        let vv = scene.select("VV");
        readings.soil_moisture_map_url = Some(client.map_tile_url(vv, &RADAR_VIS).await?);
    }

    // Landsat 8/9: least-cloudy thermal scene -> surface temperature.
    let landsat = client
        .best_scene(thermal_collection(&geometry, start_ms, end_ms))
        .await?;
    if let Some(scene) = landsat {
        let lst_celsius = scene
            .select("ST_B10")
            .multiply(LST_GAIN)
            .add(LST_OFFSET)
            .subtract(KELVIN_TO_CELSIUS);

        readings.avg_lst_celsius = client
            .compute_number(
                lst_celsius
                    .clone()
                    .reduce_region_mean(&geometry, LST_SCALE)
                    .get("ST_B10"),
            )
            .await?;
        readings.lst_map_url = Some(client.map_tile_url(lst_celsius, &LST_VIS).await?);
    }

    // SoilGrids: static global dataset, always present.
    readings.soil_carbon = client
        .compute_number(
            expr::image(SOC_IMAGE)
                .select(SOC_BAND)
                .reduce_region_mean(&geometry, SOC_SCALE)
                .get(SOC_BAND),
        )
        .await?;

    Ok(assemble_report(&aoi, &readings))
}

fn optical_collection(geometry: &Expr, start_ms: i64, end_ms: i64) -> Expr {
    expr::image_collection(S2_COLLECTION)
        .filter_bounds(geometry)
        .filter_date(start_ms, end_ms)
        .sort("CLOUDY_PIXEL_PERCENTAGE", true)
}

fn radar_collection(geometry: &Expr, start_ms: i64, end_ms: i64) -> Expr {
    expr::image_collection(S1_COLLECTION)
        .filter_bounds(geometry)
        .filter_date(start_ms, end_ms)
        .filter_eq("instrumentMode", serde_json::json!("IW"))
        .filter_list_contains("transmitterReceiverPolarisation", serde_json::json!("VV"))
        .sort("system:time_start", false)
}

fn thermal_collection(geometry: &Expr, start_ms: i64, end_ms: i64) -> Expr {
    expr::image_collection(LANDSAT8_COLLECTION)
        .merge(expr::image_collection(LANDSAT9_COLLECTION))
        .filter_bounds(geometry)
        .filter_date(start_ms, end_ms)
        .sort("CLOUD_COVER", true)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_aoi() -> Aoi {
        Aoi::new(0.0, 0.0, 50.0)
    }

    #[test]
    fn no_scenes_leaves_defaults() {
        let report = assemble_report(&test_aoi(), &SourceReadings::default());
        assert_eq!(report.health_status, HealthStatus::Analyzing);
        assert!(report.avg_temp_celsius.is_none());
        assert!(report.soil_organic_carbon.is_none());
        assert!(report.ndvi_map_url.is_none());
        assert!(report.ndwi_map_url.is_none());
        assert!(report.soil_moisture_map_url.is_none());
        assert!(report.lst_map_url.is_none());
    }

    #[test]
    fn ndvi_reading_drives_status_bucket() {
        let readings = SourceReadings {
            avg_ndvi: Some(0.45),
            ..Default::default()
        };
        let report = assemble_report(&test_aoi(), &readings);
        assert_eq!(report.health_status, HealthStatus::Healthy);
    }

    #[test]
    fn missing_optical_scene_keeps_other_sources() {
        let readings = SourceReadings {
            soil_moisture_map_url: Some("https://tiles/s1".to_string()),
            avg_lst_celsius: Some(21.37),
            lst_map_url: Some("https://tiles/lst".to_string()),
            soil_carbon: Some(23.456),
            ..Default::default()
        };
        let report = assemble_report(&test_aoi(), &readings);
        assert_eq!(report.health_status, HealthStatus::Analyzing);
        assert!(report.ndvi_map_url.is_none());
        assert_eq!(report.avg_temp_celsius, Some(21.4));
        assert_eq!(report.soil_organic_carbon.as_deref(), Some("2.35%"));
        assert!(report.soil_moisture_map_url.is_some());
    }

    #[test]
    fn soil_carbon_formatting() {
        assert_eq!(format_soil_carbon(23.456), "2.35%");
        assert_eq!(format_soil_carbon(0.0), "0.00%");
        assert_eq!(format_soil_carbon(100.0), "10.00%");
    }

    #[test]
    fn lst_calibration_is_exact() {
        // d * 0.00341802 + 149.0 - 273.15
        let c = lst_digital_to_celsius(40_000.0);
        assert!((c - (40_000.0 * 0.00341802 + 149.0 - 273.15)).abs() < 1e-12);
        assert!((c - 12.5708).abs() < 1e-4);

        // Digital value that lands at exactly 0 °C.
        let zero_dn = (273.15 - 149.0) / 0.00341802;
        assert!(lst_digital_to_celsius(zero_dn).abs() < 1e-9);
    }

    #[test]
    fn temperature_rounds_to_one_decimal() {
        assert_eq!(round_temperature(21.37), 21.4);
        assert_eq!(round_temperature(-5.04), -5.0);
    }

    #[test]
    fn report_includes_field_boundary() {
        let aoi = Aoi::new(10.0, 20.0, 50.0);
        let report = assemble_report(&aoi, &SourceReadings::default());
        assert_eq!(report.field_boundary, aoi.field_boundary());
    }

    #[test]
    fn collection_pipelines_build() {
        let aoi = test_aoi();
        let geometry = expr::bbox(&aoi.bounds);
        // Smoke-check the three query shapes serialize.
        let optical = optical_collection(&geometry, 0, 1).into_expression();
        assert_eq!(optical["result"], "0");
        let radar = radar_collection(&geometry, 0, 1).into_expression();
        assert!(radar["values"]["0"]["functionInvocationValue"].is_object());
        let thermal = thermal_collection(&geometry, 0, 1).into_expression();
        assert!(thermal["values"]["0"]["functionInvocationValue"].is_object());
    }
}
