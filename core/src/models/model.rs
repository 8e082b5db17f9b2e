use crate::money::Credits;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Capability flags and option sets for one synthesis model in the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Model {
    pub id: i64,
    pub model_key: String,
    pub display_name: String,
    pub provider_name: String,
    pub supports_text_to_image: bool,
    pub supports_image_to_image: bool,
    pub supports_aspect_ratio: bool,
    pub supports_size: bool,
    pub supports_resolution: bool,
    pub supports_quality: bool,
    pub supports_reference: bool,
    pub size_options: Vec<String>,
    pub aspect_ratio_options: Vec<String>,
    pub resolution_options: Vec<String>,
    pub quality_options: Vec<String>,
    pub input_fidelity_options: Vec<String>,
    pub is_active: bool,
}

impl Model {
    /// Whether this model advertises support for the named parameter.
    pub fn supports(&self, param: &str) -> bool {
        match param {
            "size" => self.supports_size,
            "aspect_ratio" => self.supports_aspect_ratio,
            "resolution" => self.supports_resolution,
            "quality" => self.supports_quality,
            // Not its own capability flag in the catalog; input_fidelity only ever
            // applies to image-to-image requests, so it rides on supports_reference.
            "input_fidelity" => self.supports_reference,
            _ => false,
        }
    }

    /// Enumerated option set for the named parameter, if any is configured.
    pub fn options_for(&self, param: &str) -> &[String] {
        match param {
            "size" => &self.size_options,
            "aspect_ratio" => &self.aspect_ratio_options,
            "resolution" => &self.resolution_options,
            "quality" => &self.quality_options,
            "input_fidelity" => &self.input_fidelity_options,
            _ => &[],
        }
    }
}

/// A priced variant of a model, keyed only by `is_active`; the latest active
/// price is used when no dynamic-pricing-table entry matches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelPrice {
    pub id: i64,
    pub model_id: i64,
    pub unit_credits: Credits,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}
