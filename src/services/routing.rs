use {
    crate::domain::error::CoreError,
    crate::domain::routing::{self, Candidate},
    crate::infra::postgres::node_repo,
    sqlx::PgPool,
};

/// Ranked eligible provider nodes for a procedure at a location. Pure
/// read: an empty list is a valid answer, the caller decides fallback.
pub async fn find_candidates(
    pool: &PgPool,
    location: &str,
    procedure_id: &str,
    accepts_international: bool,
) -> Result<Vec<Candidate>, CoreError> {
    let policy = node_repo::load_weight_policy(pool).await?;
    let nodes = node_repo::load_eligible(pool, location, procedure_id, accepts_international).await?;
    Ok(routing::rank(nodes, &policy))
}
