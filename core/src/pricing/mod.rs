//! Parameter normalization, validation, and pricing.

use std::collections::HashMap;

use crate::error::CoreError;
use crate::models::{GenerationParams, Model};
use crate::money::{apply_markup, Credits};
use crate::store::ModelRepo;

type NormalizeFn = fn(&Model, &mut GenerationParams);

/// Per-model parameter rewrites, externalized as a table rather than a
/// chain of `if model_key == ...` branches. Seeded with the one rewrite
/// currently needed: seedream-v4's `size` → `resolution` aliasing.
fn normalization_table() -> &'static HashMap<&'static str, NormalizeFn> {
    static TABLE: std::sync::OnceLock<HashMap<&'static str, NormalizeFn>> = std::sync::OnceLock::new();
    TABLE.get_or_init(|| {
        let mut table: HashMap<&'static str, NormalizeFn> = HashMap::new();
        table.insert("seedream-v4", seedream_v4_size_to_resolution);
        table
    })
}

fn seedream_v4_size_to_resolution(model: &Model, params: &mut GenerationParams) {
    if model.supports_resolution
        && !model.supports_size
        && params.resolution.is_none()
    {
        if let Some(size) = params.size.take() {
            params.resolution = Some(size);
        }
    }
}

/// Applies the per-model rewrite table, if one exists for `model.model_key`.
pub fn normalize_params(model: &Model, params: &GenerationParams) -> GenerationParams {
    let mut normalized = params.clone();
    if let Some(f) = normalization_table().get(model.model_key.as_str()) {
        f(model, &mut normalized);
    }
    normalized
}

const MIN_DIMENSION: u32 = 1024;
const MAX_DIMENSION: u32 = 4096;

/// Validates capability and enum/range rules for each supplied parameter.
pub fn validate_params(model: &Model, params: &GenerationParams) -> Result<(), CoreError> {
    validate_field(model, "size", params.size.as_deref(), validate_size)?;
    validate_field(model, "aspect_ratio", params.aspect_ratio.as_deref(), validate_enum)?;
    validate_field(model, "resolution", params.resolution.as_deref(), validate_size)?;
    validate_field(model, "quality", params.quality.as_deref(), validate_enum)?;
    validate_field(
        model,
        "input_fidelity",
        params.input_fidelity.as_deref(),
        validate_enum,
    )?;
    Ok(())
}

fn validate_field(
    model: &Model,
    name: &str,
    value: Option<&str>,
    check: fn(&Model, &str, &str) -> Result<(), CoreError>,
) -> Result<(), CoreError> {
    let Some(value) = value else { return Ok(()) };
    if !model.supports(name) {
        return Err(CoreError::Validation(format!(
            "parameter_not_supported: {name}"
        )));
    }
    check(model, name, value)
}

fn validate_enum(model: &Model, name: &str, value: &str) -> Result<(), CoreError> {
    let options = model.options_for(name);
    if options.is_empty() || options.iter().any(|o| o == value) {
        Ok(())
    } else {
        Err(CoreError::Validation(format!(
            "parameter_invalid: {name}={value}"
        )))
    }
}

/// `WxH`/`W*H` sizes (or the literal `auto`) with each dimension in
/// `[1024, 4096]`. Used for both `size` and `resolution`, since both carry
/// the same wire format.
fn validate_size(model: &Model, name: &str, value: &str) -> Result<(), CoreError> {
    if value == "auto" {
        return Ok(());
    }
    let options = model.options_for(name);
    if !options.is_empty() {
        return validate_enum(model, name, value);
    }
    let (w, h) = parse_dimensions(value)
        .ok_or_else(|| CoreError::Validation(format!("parameter_invalid: {name}={value}")))?;
    if (MIN_DIMENSION..=MAX_DIMENSION).contains(&w) && (MIN_DIMENSION..=MAX_DIMENSION).contains(&h)
    {
        Ok(())
    } else {
        Err(CoreError::Validation(format!(
            "parameter_invalid: {name}={value}"
        )))
    }
}

fn parse_dimensions(value: &str) -> Option<(u32, u32)> {
    let sep = if value.contains('x') {
        'x'
    } else if value.contains('*') {
        '*'
    } else {
        return None;
    };
    let mut parts = value.splitn(2, sep);
    let w: u32 = parts.next()?.trim().parse().ok()?;
    let h: u32 = parts.next()?.trim().parse().ok()?;
    Some((w, h))
}

/// Resolves the credit cost for `(model, params)`: dynamic-pricing table
/// first, then the latest active flat `ModelPrice`, then `price_not_found`.
/// `markup` is applied on top of whichever base price was found.
pub async fn price_for(
    models: &ModelRepo,
    model: &Model,
    params: &GenerationParams,
    markup: Credits,
) -> Result<Credits, CoreError> {
    let dynamic = models
        .dynamic_price(
            &model.model_key,
            params.size.as_deref(),
            params.resolution.as_deref(),
            params.quality.as_deref(),
        )
        .await?;
    let base = match dynamic {
        Some(price) => price,
        None => {
            let flat = models
                .latest_price(model.id)
                .await?
                .ok_or(CoreError::PriceNotFound)?;
            flat.unit_credits
        }
    };
    Ok(apply_markup(base, markup))
}
