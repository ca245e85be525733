//! Job store integration tests: atomic claiming and write-once verdicts.

use sqlx::SqlitePool;
use tempfile::TempDir;
use tokio::task::JoinSet;

use judged::store;
use judged::verdict::Verdict;

async fn test_pool() -> (SqlitePool, TempDir) {
    let dir = tempfile::tempdir().expect("tempdir");
    let pool = store::init_db(dir.path().join("test.sqlite3"))
        .await
        .expect("init_db");
    (pool, dir)
}

#[tokio::test]
async fn claim_returns_none_when_nothing_is_waiting() {
    let (pool, _dir) = test_pool().await;
    assert!(store::claim_next(&pool).await.unwrap().is_none());
}

#[tokio::test]
async fn claim_flips_the_job_to_pending() {
    let (pool, _dir) = test_pool().await;
    let id = store::enqueue(&pool, "alice", "100-fizz", "int main(){}", "c")
        .await
        .unwrap();

    let job = store::claim_next(&pool).await.unwrap().expect("a job");
    assert_eq!(job.id, id);
    assert_eq!(job.username, "alice");
    assert_eq!(job.question, "100-fizz");
    assert_eq!(job.lang, "c");
    assert_eq!(
        store::job_status(&pool, id).await.unwrap().as_deref(),
        Some("pending")
    );

    // The same job is never handed out twice.
    assert!(store::claim_next(&pool).await.unwrap().is_none());
}

#[tokio::test]
async fn claim_hands_out_the_oldest_submission_first() {
    let (pool, _dir) = test_pool().await;
    let first = store::enqueue(&pool, "a", "1-q", "x", "c").await.unwrap();
    let second = store::enqueue(&pool, "b", "2-q", "y", "c").await.unwrap();
    let third = store::enqueue(&pool, "c", "3-q", "z", "c").await.unwrap();

    let order: Vec<i64> = [
        store::claim_next(&pool).await.unwrap().unwrap().id,
        store::claim_next(&pool).await.unwrap().unwrap().id,
        store::claim_next(&pool).await.unwrap().unwrap().id,
    ]
    .into();
    assert_eq!(order, vec![first, second, third]);
}

#[tokio::test]
async fn concurrent_claims_hand_one_job_to_exactly_one_worker() {
    let (pool, _dir) = test_pool().await;
    store::enqueue(&pool, "alice", "100-fizz", "x", "c")
        .await
        .unwrap();

    let mut claimers = JoinSet::new();
    for _ in 0..8 {
        let pool = pool.clone();
        claimers.spawn(async move { store::claim_next(&pool).await.unwrap() });
    }

    let mut claimed = 0;
    while let Some(res) = claimers.join_next().await {
        if res.unwrap().is_some() {
            claimed += 1;
        }
    }
    assert_eq!(claimed, 1);
}

#[tokio::test]
async fn verdict_is_write_once() {
    let (pool, _dir) = test_pool().await;
    let id = store::enqueue(&pool, "alice", "100-fizz", "x", "c")
        .await
        .unwrap();
    store::claim_next(&pool).await.unwrap().unwrap();

    assert!(store::finish(&pool, id, Verdict::WrongAnswer).await.unwrap());
    // A second verdict never overwrites the first.
    assert!(!store::finish(&pool, id, Verdict::Accepted).await.unwrap());
    assert_eq!(
        store::job_status(&pool, id).await.unwrap().as_deref(),
        Some("WA")
    );
}

#[tokio::test]
async fn finish_requires_a_prior_claim() {
    let (pool, _dir) = test_pool().await;
    let id = store::enqueue(&pool, "alice", "100-fizz", "x", "c")
        .await
        .unwrap();

    assert!(!store::finish(&pool, id, Verdict::Accepted).await.unwrap());
    assert_eq!(
        store::job_status(&pool, id).await.unwrap().as_deref(),
        Some("waiting")
    );
}
