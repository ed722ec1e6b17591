//! Pilot report normalization.
//!
//! AviationWeather serves PIREPs in two shapes: the legacy XML dataserver document
//! (`<AircraftReport>` elements with attribute-encoded conditions, altitudes in feet) and a GeoJSON
//! FeatureCollection (flat `camelCase` properties, altitudes in hundreds of feet, `[lon, lat]`
//! positions). Both are lifted into one set of [`ReportFields`] in feet and (lat, lon) order, and a
//! single composition pipeline turns those into a [`NewPirep`].

use anyhow::{Context, Result, bail};
use chrono::{DateTime, TimeZone, Utc};
use geojson::GeoJson;
use serde::{Deserialize, Deserializer};
use uuid::Uuid;

use crate::geofence::{point_in_region, reverse_pair};
use crate::pireps::{NewPirep, retention_cutoff};
use crate::region::Region;

const ROUTINE_REPORT: &str = "PIREP";
const URGENT_REPORT: &str = "Urgent PIREP";

/// Legacy dataserver `<response>` document
#[derive(Debug, Default, Deserialize)]
struct LegacyResponse {
    #[serde(default)]
    data: LegacyData,
}

#[derive(Debug, Default, Deserialize)]
struct LegacyData {
    #[serde(rename = "AircraftReport", default)]
    reports: Vec<LegacyAircraftReport>,
}

/// One `<AircraftReport>` element
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct LegacyAircraftReport {
    #[serde(default)]
    pub observation_time: Option<String>,
    #[serde(default)]
    pub aircraft_ref: Option<String>,
    #[serde(default)]
    pub latitude: Option<String>,
    #[serde(default)]
    pub longitude: Option<String>,
    #[serde(default)]
    pub altitude_ft_msl: Option<String>,
    #[serde(default)]
    pub sky_condition: Vec<LegacySkyCondition>,
    #[serde(default)]
    pub turbulence_condition: Vec<LegacyTurbulenceCondition>,
    #[serde(default)]
    pub icing_condition: Vec<LegacyIcingCondition>,
    #[serde(default)]
    pub visibility_statute_mi: Option<String>,
    #[serde(default)]
    pub temp_c: Option<String>,
    #[serde(default)]
    pub wind_dir_degrees: Option<String>,
    #[serde(default)]
    pub wind_speed_kt: Option<String>,
    #[serde(default)]
    pub raw_text: Option<String>,
    #[serde(default)]
    pub report_type: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct LegacySkyCondition {
    #[serde(rename = "@sky_cover", default)]
    pub sky_cover: Option<String>,
    #[serde(rename = "@cloud_base_ft_msl", default)]
    pub cloud_base_ft_msl: Option<String>,
    #[serde(rename = "@cloud_top_ft_msl", default)]
    pub cloud_top_ft_msl: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct LegacyTurbulenceCondition {
    #[serde(rename = "@turbulence_intensity", default)]
    pub turbulence_intensity: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct LegacyIcingCondition {
    #[serde(rename = "@icing_intensity", default)]
    pub icing_intensity: Option<String>,
    #[serde(rename = "@icing_base_ft_msl", default)]
    pub icing_base_ft_msl: Option<String>,
    #[serde(rename = "@icing_top_ft_msl", default)]
    pub icing_top_ft_msl: Option<String>,
}

/// Properties of one GeoJSON report feature
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct GeoJsonReport {
    /// `[longitude, latitude]` as delivered
    #[serde(skip)]
    pub coordinates: Option<[f64; 2]>,
    #[serde(rename = "obsTime", default, deserialize_with = "lenient_text")]
    pub obs_time: Option<String>,
    #[serde(rename = "acType", default, deserialize_with = "lenient_text")]
    pub ac_type: Option<String>,
    /// Hundreds of feet
    #[serde(rename = "fltLvl", default, deserialize_with = "lenient_text")]
    pub flt_lvl: Option<String>,
    #[serde(rename = "cloudCvg1", default, deserialize_with = "lenient_text")]
    pub cloud_cvg1: Option<String>,
    #[serde(rename = "cloudBas1", default, deserialize_with = "lenient_text")]
    pub cloud_bas1: Option<String>,
    #[serde(rename = "cloudTop1", default, deserialize_with = "lenient_text")]
    pub cloud_top1: Option<String>,
    #[serde(rename = "tbInt1", default, deserialize_with = "lenient_text")]
    pub tb_int1: Option<String>,
    #[serde(rename = "icgInt1", default, deserialize_with = "lenient_text")]
    pub icg_int1: Option<String>,
    #[serde(rename = "icgType1", default, deserialize_with = "lenient_text")]
    pub icg_type1: Option<String>,
    #[serde(rename = "icgBas1", default, deserialize_with = "lenient_text")]
    pub icg_bas1: Option<String>,
    #[serde(rename = "icgTop1", default, deserialize_with = "lenient_text")]
    pub icg_top1: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub visib: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub temp: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub wdir: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub wspd: Option<String>,
    #[serde(rename = "rawOb", default, deserialize_with = "lenient_text")]
    pub raw_ob: Option<String>,
    #[serde(rename = "airepType", default, deserialize_with = "lenient_text")]
    pub airep_type: Option<String>,
}

/// Accept strings or numbers; blank strings and nulls are absent
fn lenient_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(
        match Option::<serde_json::Value>::deserialize(deserializer)? {
            Some(serde_json::Value::String(text)) => non_empty(Some(text)),
            Some(serde_json::Value::Number(number)) => Some(number.to_string()),
            _ => None,
        },
    )
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// A report as delivered by either upstream shape
#[derive(Debug, Clone, PartialEq)]
pub enum RawReport {
    Legacy(LegacyAircraftReport),
    GeoJson(GeoJsonReport),
}

impl RawReport {
    /// Parse a response body, picking the shape from its first significant character
    pub fn parse_batch(body: &str) -> Result<Vec<RawReport>> {
        let trimmed = body.trim_start();
        if trimmed.starts_with('<') {
            Self::parse_legacy(trimmed)
        } else if trimmed.starts_with('{') {
            Self::parse_geojson(trimmed)
        } else if trimmed.is_empty() {
            Ok(Vec::new())
        } else {
            bail!("Unrecognized PIREP payload")
        }
    }

    fn parse_legacy(body: &str) -> Result<Vec<RawReport>> {
        let response: LegacyResponse =
            quick_xml::de::from_str(body).context("Failed to parse PIREP XML")?;
        Ok(response
            .data
            .reports
            .into_iter()
            .map(RawReport::Legacy)
            .collect())
    }

    fn parse_geojson(body: &str) -> Result<Vec<RawReport>> {
        let geojson: GeoJson = body.parse().context("Failed to parse PIREP GeoJSON")?;
        let GeoJson::FeatureCollection(collection) = geojson else {
            bail!("PIREP GeoJSON is not a FeatureCollection");
        };

        let mut reports = Vec::with_capacity(collection.features.len());
        for feature in collection.features {
            let properties = feature.properties.unwrap_or_default();
            let mut report: GeoJsonReport =
                serde_json::from_value(serde_json::Value::Object(properties))
                    .context("Invalid PIREP feature properties")?;
            report.coordinates = feature.geometry.and_then(|geometry| match geometry.value {
                geojson::Value::Point(position) if position.len() >= 2 => {
                    Some([position[0], position[1]])
                }
                _ => None,
            });
            reports.push(RawReport::GeoJson(report));
        }
        Ok(reports)
    }

    /// Lift either shape into common fields; altitudes in feet, position as (lat, lon)
    pub fn fields(&self) -> ReportFields {
        match self {
            RawReport::Legacy(report) => {
                let sky = report.sky_condition.first();
                let icing = report.icing_condition.first();
                let latitude = parse_number(report.latitude.as_deref());
                let longitude = parse_number(report.longitude.as_deref());

                ReportFields {
                    observed_at: non_empty(report.observation_time.clone()),
                    report_type: non_empty(report.report_type.clone()),
                    raw: non_empty(report.raw_text.clone()),
                    aircraft: non_empty(report.aircraft_ref.clone()),
                    altitude_ft: parse_number(report.altitude_ft_msl.as_deref()),
                    sky_cover: sky.and_then(|s| non_empty(s.sky_cover.clone())),
                    cloud_base_ft: sky.and_then(|s| parse_number(s.cloud_base_ft_msl.as_deref())),
                    cloud_top_ft: sky.and_then(|s| parse_number(s.cloud_top_ft_msl.as_deref())),
                    turbulence: report
                        .turbulence_condition
                        .first()
                        .and_then(|t| non_empty(t.turbulence_intensity.clone())),
                    icing_intensity: icing.and_then(|i| non_empty(i.icing_intensity.clone())),
                    icing_type: None,
                    icing_base_ft: icing.and_then(|i| parse_number(i.icing_base_ft_msl.as_deref())),
                    icing_top_ft: icing.and_then(|i| parse_number(i.icing_top_ft_msl.as_deref())),
                    visibility: non_empty(report.visibility_statute_mi.clone()),
                    temperature: non_empty(report.temp_c.clone()),
                    wind_dir: non_empty(report.wind_dir_degrees.clone()),
                    wind_speed: non_empty(report.wind_speed_kt.clone()),
                    position: latitude.zip(longitude).map(|(lat, lon)| [lat, lon]),
                    geofenced: false,
                }
            }
            RawReport::GeoJson(report) => ReportFields {
                observed_at: report.obs_time.clone(),
                report_type: report.airep_type.clone(),
                raw: report.raw_ob.clone(),
                aircraft: report.ac_type.clone(),
                altitude_ft: hundreds_to_feet(report.flt_lvl.as_deref()),
                sky_cover: report.cloud_cvg1.clone(),
                cloud_base_ft: hundreds_to_feet(report.cloud_bas1.as_deref()),
                cloud_top_ft: hundreds_to_feet(report.cloud_top1.as_deref()),
                turbulence: report.tb_int1.clone(),
                icing_intensity: report.icg_int1.clone(),
                icing_type: report.icg_type1.clone(),
                icing_base_ft: hundreds_to_feet(report.icg_bas1.as_deref()),
                icing_top_ft: hundreds_to_feet(report.icg_top1.as_deref()),
                visibility: report.visib.clone(),
                temperature: report.temp.clone(),
                wind_dir: report.wdir.clone(),
                wind_speed: report.wspd.clone(),
                position: report.coordinates.map(reverse_pair),
                geofenced: true,
            },
        }
    }
}

fn parse_number(text: Option<&str>) -> Option<f64> {
    text.and_then(|t| t.trim().parse::<f64>().ok())
        .filter(|n| n.is_finite())
}

fn hundreds_to_feet(text: Option<&str>) -> Option<f64> {
    parse_number(text).map(|hundreds| hundreds * 100.0)
}

/// Report fields common to both upstream shapes
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReportFields {
    pub observed_at: Option<String>,
    pub report_type: Option<String>,
    pub raw: Option<String>,
    pub aircraft: Option<String>,
    pub altitude_ft: Option<f64>,
    pub sky_cover: Option<String>,
    pub cloud_base_ft: Option<f64>,
    pub cloud_top_ft: Option<f64>,
    pub turbulence: Option<String>,
    pub icing_intensity: Option<String>,
    pub icing_type: Option<String>,
    pub icing_base_ft: Option<f64>,
    pub icing_top_ft: Option<f64>,
    pub visibility: Option<String>,
    pub temperature: Option<String>,
    pub wind_dir: Option<String>,
    pub wind_speed: Option<String>,
    /// (latitude, longitude)
    pub position: Option<[f64; 2]>,
    /// Must fall inside the region polygon to be kept
    pub geofenced: bool,
}

/// Why a report was not stored
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// AIREPs and other non-PIREP report types
    NotPirep(String),
    /// Observed before the retention window
    Stale,
    OutsideRegion,
    /// A required field is missing or unreadable
    Malformed(&'static str),
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::NotPirep(kind) => write!(f, "not a PIREP ({})", kind),
            SkipReason::Stale => write!(f, "older than retention window"),
            SkipReason::OutsideRegion => write!(f, "outside region"),
            SkipReason::Malformed(field) => write!(f, "missing or invalid {}", field),
        }
    }
}

impl std::error::Error for SkipReason {}

impl SkipReason {
    /// Metric label
    pub fn label(&self) -> &'static str {
        match self {
            SkipReason::NotPirep(_) => "not_pirep",
            SkipReason::Stale => "stale",
            SkipReason::OutsideRegion => "outside_region",
            SkipReason::Malformed(_) => "malformed",
        }
    }
}

/// Normalize one report into a row, or say why it is skipped
pub fn normalize(
    raw: &RawReport,
    region: &Region,
    now: DateTime<Utc>,
) -> Result<NewPirep, SkipReason> {
    let fields = raw.fields();

    let report_type = fields
        .report_type
        .as_deref()
        .ok_or(SkipReason::Malformed("report type"))?;
    let urgent = match report_type {
        ROUTINE_REPORT => false,
        URGENT_REPORT => true,
        other => return Err(SkipReason::NotPirep(other.to_string())),
    };

    let report_time = fields
        .observed_at
        .as_deref()
        .and_then(parse_observation_time)
        .ok_or(SkipReason::Malformed("observation time"))?;
    let raw_text = fields
        .raw
        .clone()
        .ok_or(SkipReason::Malformed("raw text"))?;

    if report_time < retention_cutoff(now) {
        return Err(SkipReason::Stale);
    }

    let location = if fields.geofenced {
        let [latitude, longitude] = fields.position.ok_or(SkipReason::Malformed("position"))?;
        if !point_in_region(region, latitude, longitude) {
            return Err(SkipReason::OutsideRegion);
        }
        Some(region.name().to_string())
    } else {
        None
    };

    Ok(NewPirep {
        id: Uuid::now_v7(),
        report_time,
        location,
        aircraft: fields.aircraft.clone().unwrap_or_default(),
        flight_level: fields
            .altitude_ft
            .map(|feet| flight_level(&format!("{}", feet.round() as i64)))
            .unwrap_or_default(),
        sky_cond: sky_condition(
            fields.sky_cover.as_deref(),
            fields.cloud_base_ft,
            fields.cloud_top_ft,
        ),
        turbulence: fields.turbulence.clone().unwrap_or_default(),
        icing: icing(
            fields.icing_intensity.as_deref(),
            fields.icing_type.as_deref(),
            fields.icing_base_ft,
            fields.icing_top_ft,
        ),
        vis: fields.visibility.clone().unwrap_or_default(),
        temp: fields.temperature.clone().unwrap_or_default(),
        wind: wind(fields.wind_dir.as_deref(), fields.wind_speed.as_deref()),
        urgent,
        raw: raw_text,
        manual: false,
    })
}

/// RFC 3339 text or Unix seconds
fn parse_observation_time(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Some(parsed.with_timezone(&Utc));
    }
    text.parse::<i64>()
        .ok()
        .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
}

fn drop_last_two(text: &str) -> String {
    let keep = text.chars().count().saturating_sub(2);
    text.chars().take(keep).collect()
}

/// Altitude in feet to hundreds: "35000" → "350", "9500" → "095"
pub fn flight_level(feet: &str) -> String {
    let feet = feet.trim();
    if feet.is_empty() {
        return String::new();
    }

    let level = drop_last_two(feet);
    if level.chars().count() > 2 {
        level
    } else {
        drop_last_two(&format!("0{}", feet))
    }
}

/// Feet as three-digit hundreds: 8000 → "080"
fn hundreds(feet: f64) -> String {
    format!("{:03}", (feet / 100.0).round() as i64)
}

/// "080-120", "080", "-120", or nothing.
///
/// Base and top are both written as three-digit hundreds of feet, whatever unit the source used,
/// so legacy reports (feet) and GeoJSON reports (hundreds) produce the same text.
fn altitude_band(base_ft: Option<f64>, top_ft: Option<f64>) -> Option<String> {
    match (base_ft, top_ft) {
        (Some(base), Some(top)) => Some(format!("{}-{}", hundreds(base), hundreds(top))),
        (Some(base), None) => Some(hundreds(base)),
        (None, Some(top)) => Some(format!("-{}", hundreds(top))),
        (None, None) => None,
    }
}

/// "OVC 080-120"; empty without a cover
pub fn sky_condition(cover: Option<&str>, base_ft: Option<f64>, top_ft: Option<f64>) -> String {
    let Some(cover) = cover else {
        return String::new();
    };

    match altitude_band(base_ft, top_ft) {
        Some(band) => format!("{} {}", cover, band),
        None => cover.to_string(),
    }
}

/// "LGT RIME 080-120"; empty without an intensity.
///
/// The top is hundreds of feet like the base ("080-120", not "080-12000"); a top without a base
/// is written "-120".
pub fn icing(
    intensity: Option<&str>,
    kind: Option<&str>,
    base_ft: Option<f64>,
    top_ft: Option<f64>,
) -> String {
    let Some(intensity) = intensity else {
        return String::new();
    };

    let mut composed: String = intensity.chars().take(3).collect();
    if let Some(kind) = kind {
        composed.push(' ');
        composed.push_str(kind);
    }
    if let Some(band) = altitude_band(base_ft, top_ft) {
        composed.push(' ');
        composed.push_str(&band);
    }
    composed
}

/// "270@45"; absent components stay empty ("@120")
pub fn wind(direction: Option<&str>, speed: Option<&str>) -> String {
    format!("{}@{}", direction.unwrap_or(""), speed.unwrap_or(""))
}
