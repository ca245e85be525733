//! Scoring engine, invoked only after a persisted `AC` verdict.

use sqlx::SqlitePool;

use crate::store;

/// Applied to the base score of the first accepted solution for a question,
/// system-wide; the product is truncated to an integer.
pub const FIRST_SOLVER_MULTIPLIER: f64 = 1.1;

/// Base score of a question: the integer prefix of its identifier before the
/// first `-`, or 0 when unparseable.
pub fn base_score(question: &str) -> i64 {
    question
        .split('-')
        .next()
        .and_then(|prefix| prefix.parse().ok())
        .unwrap_or(0)
}

/// Awards the score for an accepted submission, at most once per
/// `(username, question)` pair.
///
/// The first-solver check runs before the per-user idempotency guard, same
/// as the original flow: a retried acceptance for an already-scored pair
/// aborts without side effects. The score-record insert and the user-total
/// update are two separate statements (see DESIGN.md); the total is only
/// touched when the insert actually created the record.
pub async fn award(pool: &SqlitePool, username: &str, question: &str) -> sqlx::Result<()> {
    let mut score = base_score(question);

    if !store::question_solved(pool, question).await? {
        score = (score as f64 * FIRST_SOLVER_MULTIPLIER) as i64;
    }

    if store::score_exists(pool, username, question).await? {
        return Ok(());
    }

    if store::insert_score(pool, username, question, score).await? {
        store::add_user_score(pool, username, score).await?;
        log::info!("Awarded {score} to {username} for question {question}");
    }

    Ok(())
}
