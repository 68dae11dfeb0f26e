//! Typed per-operation job parameters.
//!
//! The queue never interprets these; they travel with the job to the
//! runner. Each job type has its own parameter struct and `Generic`
//! carries an open map for custom operations.

use std::path::PathBuf;

use schemars::JsonSchema;
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::job::{JobType, SpecError};

/// Inpainting / replacement quality trade-off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum QualityMode {
    Fast,
    #[default]
    Balanced,
    Quality,
}

/// Export container format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExportFormat {
    #[default]
    Jpeg,
    Png,
    Tiff,
    Webp,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Jpeg => "jpg",
            ExportFormat::Png => "png",
            ExportFormat::Tiff => "tiff",
            ExportFormat::Webp => "webp",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SuperResOptions {
    /// 2x, 4x or 8x
    #[serde(default = "default_scale_factor")]
    pub scale_factor: u8,
    #[serde(default = "default_upscale_model")]
    pub model: String,
    #[serde(default)]
    pub enhance_face: bool,
    #[serde(default = "default_true")]
    pub denoise: bool,
}

impl Default for SuperResOptions {
    fn default() -> Self {
        Self {
            scale_factor: default_scale_factor(),
            model: default_upscale_model(),
            enhance_face: false,
            denoise: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct InpaintOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mask_path: Option<PathBuf>,
    /// Polygon points `[x, y]` outlining the region to fill
    #[serde(default)]
    pub mask_coordinates: Vec<[i32; 2]>,
    #[serde(default)]
    pub quality_mode: QualityMode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ObjectDetectOptions {
    #[serde(default = "default_confidence")]
    pub confidence_threshold: f32,
    #[serde(default = "default_detect_model")]
    pub model: String,
}

impl Default for ObjectDetectOptions {
    fn default() -> Self {
        Self {
            confidence_threshold: default_confidence(),
            model: default_detect_model(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct ObjectReplaceOptions {
    /// `[x, y, width, height]`
    pub object_bbox: [i32; 4],
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(default)]
    pub quality_mode: QualityMode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ExportOptions {
    #[serde(default)]
    pub format: ExportFormat,
    /// 1-100, only meaningful for lossy formats
    #[serde(default = "default_quality")]
    pub quality: u8,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            format: ExportFormat::default(),
            quality: default_quality(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ImportOptions {
    #[serde(default = "default_true")]
    pub preserve_metadata: bool,
    #[serde(default)]
    pub auto_white_balance: bool,
    #[serde(default)]
    pub exposure_compensation: f32,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            preserve_metadata: true,
            auto_white_balance: false,
            exposure_compensation: 0.0,
        }
    }
}

/// Operation parameters, tagged by `kind`.
///
/// Generic parameters are an open map and may carry their own `kind` key;
/// only the typed variant names are reserved as tags.
#[derive(Debug, Clone, PartialEq, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobOptions {
    SuperRes(SuperResOptions),
    Inpaint(InpaintOptions),
    ObjectDetect(ObjectDetectOptions),
    ObjectReplace(ObjectReplaceOptions),
    Export(ExportOptions),
    Import(ImportOptions),
    /// Untyped parameters; accepted for every job type
    Generic(Map<String, Value>),
}

/// Borrowed view of the typed variants, serialized with their tag.
#[derive(Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum TypedOptionsRef<'a> {
    SuperRes(&'a SuperResOptions),
    Inpaint(&'a InpaintOptions),
    ObjectDetect(&'a ObjectDetectOptions),
    ObjectReplace(&'a ObjectReplaceOptions),
    Export(&'a ExportOptions),
    Import(&'a ImportOptions),
}

impl Serialize for JobOptions {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let typed = match self {
            JobOptions::SuperRes(o) => TypedOptionsRef::SuperRes(o),
            JobOptions::Inpaint(o) => TypedOptionsRef::Inpaint(o),
            JobOptions::ObjectDetect(o) => TypedOptionsRef::ObjectDetect(o),
            JobOptions::ObjectReplace(o) => TypedOptionsRef::ObjectReplace(o),
            JobOptions::Export(o) => TypedOptionsRef::Export(o),
            JobOptions::Import(o) => TypedOptionsRef::Import(o),
            JobOptions::Generic(params) => {
                // A caller-supplied `kind` is kept as is instead of the tag
                let mut map = serializer.serialize_map(Some(params.len() + 1))?;
                if !params.contains_key("kind") {
                    map.serialize_entry("kind", "generic")?;
                }
                for (key, value) in params {
                    map.serialize_entry(key, value)?;
                }
                return map.end();
            }
        };
        typed.serialize(serializer)
    }
}

impl Default for JobOptions {
    fn default() -> Self {
        JobOptions::Generic(Map::new())
    }
}

impl JobOptions {
    /// The `kind` tag of these options.
    pub fn kind(&self) -> &'static str {
        match self {
            JobOptions::SuperRes(_) => "super_res",
            JobOptions::Inpaint(_) => "inpaint",
            JobOptions::ObjectDetect(_) => "object_detect",
            JobOptions::ObjectReplace(_) => "object_replace",
            JobOptions::Export(_) => "export",
            JobOptions::Import(_) => "import",
            JobOptions::Generic(_) => "generic",
        }
    }

    /// Whether these options can accompany a job of `job_type`.
    pub fn applies_to(&self, job_type: JobType) -> bool {
        matches!(
            (self, job_type),
            (JobOptions::Generic(_), _)
                | (JobOptions::SuperRes(_), JobType::SuperRes)
                | (JobOptions::Inpaint(_), JobType::Inpaint)
                | (JobOptions::ObjectDetect(_), JobType::ObjectDetect)
                | (JobOptions::ObjectReplace(_), JobType::ObjectReplace)
                | (JobOptions::Export(_), JobType::Export)
                | (JobOptions::Import(_), JobType::Import)
        )
    }

    /// Range checks on typed parameters.
    pub fn validate(&self) -> Result<(), SpecError> {
        match self {
            JobOptions::SuperRes(o) if ![2, 4, 8].contains(&o.scale_factor) => Err(
                SpecError::InvalidOption(format!("scale_factor must be 2, 4 or 8, got {}", o.scale_factor)),
            ),
            JobOptions::ObjectDetect(o) if !(0.0..=1.0).contains(&o.confidence_threshold) => {
                Err(SpecError::InvalidOption(format!(
                    "confidence_threshold must be within 0..=1, got {}",
                    o.confidence_threshold
                )))
            }
            JobOptions::Export(o) if !(1..=100).contains(&o.quality) => Err(
                SpecError::InvalidOption(format!("quality must be within 1..=100, got {}", o.quality)),
            ),
            _ => Ok(()),
        }
    }

    /// Look up a parameter in generic options.
    pub fn generic(&self, key: &str) -> Option<&Value> {
        match self {
            JobOptions::Generic(map) => map.get(key),
            _ => None,
        }
    }
}

/// Tags that select a typed [`JobOptions`] variant.
const OPTION_KINDS: [&str; 7] = [
    "super_res",
    "inpaint",
    "object_detect",
    "object_replace",
    "export",
    "import",
    "generic",
];

/// Deserialize options, treating any map whose `kind` is not a known
/// variant name (or that has no `kind`) as generic parameters.
pub fn deserialize_lenient<'de, D>(deserializer: D) -> Result<JobOptions, D::Error>
where
    D: Deserializer<'de>,
{
    let map = Map::<String, Value>::deserialize(deserializer)?;
    let tagged = map
        .get("kind")
        .and_then(Value::as_str)
        .is_some_and(|kind| OPTION_KINDS.contains(&kind));
    if !tagged {
        return Ok(JobOptions::Generic(map));
    }
    JobOptions::deserialize(Value::Object(map)).map_err(serde::de::Error::custom)
}

fn default_scale_factor() -> u8 {
    2
}

fn default_upscale_model() -> String {
    "esrgan".to_string()
}

fn default_detect_model() -> String {
    "yolov8n".to_string()
}

fn default_confidence() -> f32 {
    0.5
}

fn default_quality() -> u8 {
    95
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::JobSpec;

    #[test]
    fn test_typed_options_fill_defaults() {
        let spec: JobSpec =
            serde_json::from_str(r#"{"type":"super_res","options":{"kind":"super_res","scale_factor":4}}"#)
                .unwrap();
        match spec.options {
            JobOptions::SuperRes(o) => {
                assert_eq!(o.scale_factor, 4);
                assert_eq!(o.model, "esrgan");
                assert!(o.denoise);
            }
            other => panic!("unexpected options: {:?}", other),
        }
    }

    #[test]
    fn test_untagged_map_becomes_generic() {
        let spec: JobSpec =
            serde_json::from_str(r#"{"type":"custom","options":{"strength":0.7}}"#).unwrap();
        assert_eq!(spec.options.kind(), "generic");
        assert_eq!(spec.options.generic("strength"), Some(&serde_json::json!(0.7)));
    }

    #[test]
    fn test_unknown_kind_stays_in_generic_params() {
        let spec: JobSpec = serde_json::from_str(
            r#"{"type":"custom","options":{"kind":"sharpen","amount":2}}"#,
        )
        .unwrap();
        assert_eq!(spec.options.kind(), "generic");
        assert_eq!(spec.options.generic("kind"), Some(&serde_json::json!("sharpen")));
        assert_eq!(spec.options.generic("amount"), Some(&serde_json::json!(2)));
        assert!(spec.validate().is_ok());

        let json = serde_json::to_value(&spec.options).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "sharpen", "amount": 2}));

        let job = crate::job::Job::from_spec(spec);
        let reparsed: crate::job::Job =
            serde_json::from_value(serde_json::to_value(&job).unwrap()).unwrap();
        assert_eq!(reparsed.options, job.options);
    }

    #[test]
    fn test_options_serialize_with_tag() {
        let json = serde_json::to_value(JobOptions::default()).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "generic"}));

        let json = serde_json::to_value(JobOptions::Export(ExportOptions::default())).unwrap();
        assert_eq!(json["kind"], "export");
        assert_eq!(json["quality"], 95);
    }

    #[test]
    fn test_invalid_typed_option_is_not_swallowed() {
        let parsed: Result<JobSpec, _> = serde_json::from_str(
            r#"{"type":"export","options":{"kind":"export","format":"bmp"}}"#,
        );
        assert!(parsed.is_err());
    }

    #[test]
    fn test_range_validation() {
        let opts = JobOptions::Export(ExportOptions { format: ExportFormat::Png, quality: 0 });
        assert!(opts.validate().is_err());

        let opts = JobOptions::SuperRes(SuperResOptions { scale_factor: 3, ..Default::default() });
        assert!(opts.validate().is_err());

        let opts = JobOptions::ObjectDetect(ObjectDetectOptions::default());
        assert!(opts.validate().is_ok());
    }

    #[test]
    fn test_generic_applies_to_every_type() {
        let opts = JobOptions::default();
        assert!(JobType::ALL.into_iter().all(|t| opts.applies_to(t)));
    }
}
