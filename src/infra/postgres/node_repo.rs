use {
    crate::domain::error::CoreError,
    crate::domain::routing::{CertificationLevel, NodeSnapshot, WeightPolicy},
    sqlx::PgPool,
    std::collections::HashMap,
};

/// Load the level → weight mapping from reference data.
pub async fn load_weight_policy(pool: &PgPool) -> Result<WeightPolicy, CoreError> {
    let rows = sqlx::query_as::<_, (String, f64)>(
        "SELECT level, weight FROM certification_weights",
    )
    .fetch_all(pool)
    .await?;

    let weights: HashMap<String, f64> = rows.into_iter().collect();
    Ok(WeightPolicy::new(weights))
}

#[derive(Debug, sqlx::FromRow)]
struct EligibleRow {
    id: String,
    name: String,
    location: String,
    weekly_capacity: i32,
    weekly_booked: i32,
    redirect_threshold: f64,
    sla_response_minutes: i32,
    margin_factor: f64,
    certification_level: String,
}

/// Eligible nodes for a procedure at a location, joined with their current
/// valid certification. Deterministic order (primary key) so the ranking's
/// stable sort gives reproducible tie-breaks.
pub async fn load_eligible(
    pool: &PgPool,
    location: &str,
    procedure_id: &str,
    accepts_international: bool,
) -> Result<Vec<NodeSnapshot>, CoreError> {
    let rows = sqlx::query_as::<_, EligibleRow>(
        r#"
        SELECT n.id, n.name, n.location, n.weekly_capacity, n.weekly_booked,
               n.redirect_threshold, n.sla_response_minutes, n.margin_factor,
               c.level AS certification_level
        FROM provider_nodes n
        JOIN certifications c
          ON c.node_id = n.id
         AND c.procedure_id = $2
         AND c.superseded_at IS NULL
         AND c.valid_from <= now()
         AND c.valid_until > now()
        WHERE n.active
          AND n.certified
          AND n.tourism_enabled
          AND n.location = $1
          AND (NOT $3 OR n.accepts_international)
        ORDER BY n.id
        "#,
    )
    .bind(location)
    .bind(procedure_id)
    .bind(accepts_international)
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|r| {
            Ok(NodeSnapshot {
                node_id: r.id,
                name: r.name,
                location: r.location,
                weekly_capacity: r.weekly_capacity,
                weekly_booked: r.weekly_booked,
                redirect_threshold: r.redirect_threshold,
                certification_level: CertificationLevel::try_from(
                    r.certification_level.as_str(),
                )?,
                sla_response_minutes: r.sla_response_minutes,
                margin_factor: r.margin_factor,
            })
        })
        .collect()
}
