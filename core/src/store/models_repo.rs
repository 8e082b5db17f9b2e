use chrono::Utc;
use rusqlite::{params, OptionalExtension};

use crate::error::CoreError;
use crate::models::{Model, ModelPrice};
use crate::money::Credits;

use super::{fmt_dt, parse_dt, Db};

#[derive(Clone)]
pub struct ModelRepo {
    db: Db,
}

impl ModelRepo {
    pub fn new(db: Db) -> Self {
        ModelRepo { db }
    }

    pub async fn find_by_key(&self, model_key: &str) -> Result<Option<Model>, CoreError> {
        let model_key = model_key.to_string();
        self.db
            .with_conn(move |conn| {
                conn.query_row(
                    "SELECT id, model_key, display_name, provider_name,
                            supports_text_to_image, supports_image_to_image,
                            supports_aspect_ratio, supports_size, supports_resolution,
                            supports_quality, supports_reference,
                            size_options, aspect_ratio_options, resolution_options,
                            quality_options, input_fidelity_options, is_active
                     FROM models WHERE model_key = ?1 AND is_active = 1",
                    params![model_key],
                    row_to_model,
                )
                .optional()
                .map_err(CoreError::from)
            })
            .await?
    }

    pub async fn list_active(&self) -> Result<Vec<Model>, CoreError> {
        self.db
            .with_conn(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, model_key, display_name, provider_name,
                            supports_text_to_image, supports_image_to_image,
                            supports_aspect_ratio, supports_size, supports_resolution,
                            supports_quality, supports_reference,
                            size_options, aspect_ratio_options, resolution_options,
                            quality_options, input_fidelity_options, is_active
                     FROM models WHERE is_active = 1 ORDER BY id",
                )?;
                let rows = stmt
                    .query_map([], row_to_model)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await?
    }

    /// Inserts or replaces the catalog row for `model_key`, keyed by that column.
    pub async fn upsert(&self, model: Model) -> Result<(), CoreError> {
        self.db
            .with_conn(move |conn| {
                conn.execute(
                    "INSERT INTO models
                        (model_key, display_name, provider_name,
                         supports_text_to_image, supports_image_to_image,
                         supports_aspect_ratio, supports_size, supports_resolution,
                         supports_quality, supports_reference,
                         size_options, aspect_ratio_options, resolution_options,
                         quality_options, input_fidelity_options, is_active)
                     VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16)
                     ON CONFLICT (model_key) DO UPDATE SET
                        display_name = excluded.display_name,
                        provider_name = excluded.provider_name,
                        supports_text_to_image = excluded.supports_text_to_image,
                        supports_image_to_image = excluded.supports_image_to_image,
                        supports_aspect_ratio = excluded.supports_aspect_ratio,
                        supports_size = excluded.supports_size,
                        supports_resolution = excluded.supports_resolution,
                        supports_quality = excluded.supports_quality,
                        supports_reference = excluded.supports_reference,
                        size_options = excluded.size_options,
                        aspect_ratio_options = excluded.aspect_ratio_options,
                        resolution_options = excluded.resolution_options,
                        quality_options = excluded.quality_options,
                        input_fidelity_options = excluded.input_fidelity_options,
                        is_active = excluded.is_active",
                    params![
                        model.model_key,
                        model.display_name,
                        model.provider_name,
                        model.supports_text_to_image as i64,
                        model.supports_image_to_image as i64,
                        model.supports_aspect_ratio as i64,
                        model.supports_size as i64,
                        model.supports_resolution as i64,
                        model.supports_quality as i64,
                        model.supports_reference as i64,
                        serde_json::to_string(&model.size_options).unwrap_or_default(),
                        serde_json::to_string(&model.aspect_ratio_options).unwrap_or_default(),
                        serde_json::to_string(&model.resolution_options).unwrap_or_default(),
                        serde_json::to_string(&model.quality_options).unwrap_or_default(),
                        serde_json::to_string(&model.input_fidelity_options).unwrap_or_default(),
                        model.is_active as i64,
                    ],
                )?;
                Ok(())
            })
            .await?
    }

    pub async fn latest_price(&self, model_id: i64) -> Result<Option<ModelPrice>, CoreError> {
        self.db
            .with_conn(move |conn| {
                conn.query_row(
                    "SELECT id, model_id, unit_credits, is_active, created_at
                     FROM model_prices WHERE model_id = ?1 AND is_active = 1
                     ORDER BY id DESC LIMIT 1",
                    params![model_id],
                    row_to_price,
                )
                .optional()
                .map_err(CoreError::from)
            })
            .await?
    }

    pub async fn insert_price(
        &self,
        model_id: i64,
        unit_credits: Credits,
    ) -> Result<ModelPrice, CoreError> {
        let now = Utc::now();
        self.db
            .with_conn(move |conn| {
                conn.execute(
                    "INSERT INTO model_prices (model_id, unit_credits, is_active, created_at)
                     VALUES (?1, ?2, 1, ?3)",
                    params![model_id, unit_credits.0, fmt_dt(now)],
                )?;
                let id = conn.last_insert_rowid();
                Ok(ModelPrice {
                    id,
                    model_id,
                    unit_credits,
                    is_active: true,
                    created_at: now,
                })
            })
            .await?
    }

    /// Looks up a dynamic per-variant price if the catalog defines one for
    /// this `(model_key, size, resolution, quality)` tuple; falls back to
    /// the flat [`ModelPrice`] otherwise.
    pub async fn dynamic_price(
        &self,
        model_key: &str,
        size: Option<&str>,
        resolution: Option<&str>,
        quality: Option<&str>,
    ) -> Result<Option<Credits>, CoreError> {
        let model_key = model_key.to_string();
        let size = size.map(str::to_string);
        let resolution = resolution.map(str::to_string);
        let quality = quality.map(str::to_string);
        self.db
            .with_conn(move |conn| {
                conn.query_row(
                    "SELECT unit_credits FROM dynamic_prices
                     WHERE model_key = ?1
                       AND size IS ?2 AND resolution IS ?3 AND quality IS ?4",
                    params![model_key, size, resolution, quality],
                    |r| r.get::<_, i64>(0),
                )
                .optional()
                .map(|opt| opt.map(Credits))
                .map_err(CoreError::from)
            })
            .await?
    }
}

fn row_to_model(row: &rusqlite::Row<'_>) -> rusqlite::Result<Model> {
    let parse_opts = |raw: String| -> Vec<String> { serde_json::from_str(&raw).unwrap_or_default() };
    Ok(Model {
        id: row.get(0)?,
        model_key: row.get(1)?,
        display_name: row.get(2)?,
        provider_name: row.get(3)?,
        supports_text_to_image: row.get::<_, i64>(4)? != 0,
        supports_image_to_image: row.get::<_, i64>(5)? != 0,
        supports_aspect_ratio: row.get::<_, i64>(6)? != 0,
        supports_size: row.get::<_, i64>(7)? != 0,
        supports_resolution: row.get::<_, i64>(8)? != 0,
        supports_quality: row.get::<_, i64>(9)? != 0,
        supports_reference: row.get::<_, i64>(10)? != 0,
        size_options: parse_opts(row.get(11)?),
        aspect_ratio_options: parse_opts(row.get(12)?),
        resolution_options: parse_opts(row.get(13)?),
        quality_options: parse_opts(row.get(14)?),
        input_fidelity_options: parse_opts(row.get(15)?),
        is_active: row.get::<_, i64>(16)? != 0,
    })
}

fn row_to_price(row: &rusqlite::Row<'_>) -> rusqlite::Result<ModelPrice> {
    let created_raw: String = row.get(4)?;
    Ok(ModelPrice {
        id: row.get(0)?,
        model_id: row.get(1)?,
        unit_credits: Credits(row.get(2)?),
        is_active: row.get::<_, i64>(3)? != 0,
        created_at: parse_dt(&created_raw).unwrap_or_else(|_| Utc::now()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_model(key: &str) -> Model {
        Model {
            id: 0,
            model_key: key.into(),
            display_name: "Nano Banana Pro".into(),
            provider_name: "wavespeed".into(),
            supports_text_to_image: true,
            supports_image_to_image: true,
            supports_aspect_ratio: true,
            supports_size: false,
            supports_resolution: false,
            supports_quality: false,
            supports_reference: true,
            size_options: vec![],
            aspect_ratio_options: vec!["1:1".into(), "16:9".into()],
            resolution_options: vec![],
            quality_options: vec![],
            input_fidelity_options: vec!["low".into(), "high".into()],
            is_active: true,
        }
    }

    #[tokio::test]
    async fn upsert_then_find_round_trips_option_vecs() {
        let db = Db::open_in_memory().unwrap();
        let repo = ModelRepo::new(db);
        repo.upsert(sample_model("nano-banana-pro")).await.unwrap();
        let found = repo
            .find_by_key("nano-banana-pro")
            .await
            .unwrap()
            .expect("model present");
        assert_eq!(found.aspect_ratio_options, vec!["1:1", "16:9"]);
        assert!(found.supports(&"aspect_ratio".to_string()));
    }

    #[tokio::test]
    async fn latest_price_returns_most_recent_active() {
        let db = Db::open_in_memory().unwrap();
        let repo = ModelRepo::new(db);
        repo.upsert(sample_model("nano-banana-pro")).await.unwrap();
        let model = repo.find_by_key("nano-banana-pro").await.unwrap().unwrap();
        repo.insert_price(model.id, Credits(40)).await.unwrap();
        repo.insert_price(model.id, Credits(50)).await.unwrap();
        let price = repo.latest_price(model.id).await.unwrap().unwrap();
        assert_eq!(price.unit_credits, Credits(50));
    }
}
