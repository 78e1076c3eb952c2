use std::future::Future;

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::{
    dto::{ToolResult, ToolTask},
    worker::AiWorker,
};
use crate::error::ApiError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reservation {
    pub user_id: Uuid,
    pub amount: i64,
    pub remaining: i64,
}

/// Every balance change is a single conditional statement, so concurrent
/// calls for the same user can never overdraw.
#[async_trait]
pub trait CreditLedger: Send + Sync {
    async fn balance(&self, user_id: Uuid) -> anyhow::Result<Option<i64>>;

    /// Take `min(balance, ceiling)`; `None` when the balance is empty or the
    /// user does not exist.
    async fn reserve(&self, user_id: Uuid, ceiling: i64) -> anyhow::Result<Option<Reservation>>;

    /// Return the unused part of `reservation` (or charge the overage),
    /// never going below zero. Returns the new balance.
    async fn settle(&self, reservation: &Reservation, used: i64) -> anyhow::Result<i64>;

    async fn refund(&self, reservation: &Reservation) -> anyhow::Result<i64>;

    async fn grant(&self, user_id: Uuid, amount: i64) -> anyhow::Result<Option<i64>>;
}

pub struct PgCreditLedger {
    db: PgPool,
}

impl PgCreditLedger {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl CreditLedger for PgCreditLedger {
    async fn balance(&self, user_id: Uuid) -> anyhow::Result<Option<i64>> {
        let credits = sqlx::query_scalar::<_, i64>("SELECT ai_credits FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.db)
            .await?;
        Ok(credits)
    }

    async fn reserve(&self, user_id: Uuid, ceiling: i64) -> anyhow::Result<Option<Reservation>> {
        let row = sqlx::query_as::<_, (i64, i64)>(
            r#"
            WITH prev AS (
                SELECT id, ai_credits
                  FROM users
                 WHERE id = $1 AND ai_credits > 0
                   FOR UPDATE
            )
            UPDATE users u
               SET ai_credits = u.ai_credits - LEAST(prev.ai_credits, $2)
              FROM prev
             WHERE u.id = prev.id
            RETURNING LEAST(prev.ai_credits, $2) AS reserved, u.ai_credits AS remaining
            "#,
        )
        .bind(user_id)
        .bind(ceiling.max(1))
        .fetch_optional(&self.db)
        .await?;

        Ok(row.map(|(amount, remaining)| Reservation {
            user_id,
            amount,
            remaining,
        }))
    }

    async fn settle(&self, reservation: &Reservation, used: i64) -> anyhow::Result<i64> {
        let credits = sqlx::query_scalar::<_, i64>(
            r#"
            UPDATE users
               SET ai_credits = GREATEST(ai_credits + $2 - $3, 0)
             WHERE id = $1
            RETURNING ai_credits
            "#,
        )
        .bind(reservation.user_id)
        .bind(reservation.amount)
        .bind(used.max(0))
        .fetch_one(&self.db)
        .await?;
        Ok(credits)
    }

    async fn refund(&self, reservation: &Reservation) -> anyhow::Result<i64> {
        let credits = sqlx::query_scalar::<_, i64>(
            "UPDATE users SET ai_credits = ai_credits + $2 WHERE id = $1 RETURNING ai_credits",
        )
        .bind(reservation.user_id)
        .bind(reservation.amount)
        .fetch_one(&self.db)
        .await?;
        Ok(credits)
    }

    async fn grant(&self, user_id: Uuid, amount: i64) -> anyhow::Result<Option<i64>> {
        let credits = sqlx::query_scalar::<_, i64>(
            "UPDATE users SET ai_credits = ai_credits + $2 WHERE id = $1 RETURNING ai_credits",
        )
        .bind(user_id)
        .bind(amount.max(0))
        .fetch_optional(&self.db)
        .await?;
        Ok(credits)
    }
}

#[derive(Debug)]
pub struct Metered {
    pub result: ToolResult,
    pub used_credits: i64,
    pub remaining_credits: i64,
}

pub async fn metered(
    ledger: &dyn CreditLedger,
    worker: &dyn AiWorker,
    user_id: Uuid,
    ceiling: i64,
    task: &ToolTask,
) -> Result<Metered, ApiError> {
    metered_then(ledger, worker, user_id, ceiling, task, |result| async move {
        Ok(result)
    })
    .await
}

/// Like [`metered`], with `persist` run on the worker result before
/// settlement. An error from `persist` refunds the reservation.
pub async fn metered_then<F, Fut>(
    ledger: &dyn CreditLedger,
    worker: &dyn AiWorker,
    user_id: Uuid,
    ceiling: i64,
    task: &ToolTask,
    persist: F,
) -> Result<Metered, ApiError>
where
    F: FnOnce(ToolResult) -> Fut,
    Fut: Future<Output = Result<ToolResult, ApiError>>,
{
    let tool = task.kind().name();
    let reservation = ledger
        .reserve(user_id, ceiling)
        .await?
        .ok_or(ApiError::InsufficientCredits)?;

    let outcome = match worker.run(task, reservation.amount).await {
        Ok(outcome) => outcome,
        Err(e) => {
            warn!(%user_id, tool, error = %e, "worker call failed, refunding reservation");
            refund(ledger, &reservation, tool).await;
            return Err(e.into());
        }
    };

    let result = match persist(outcome.result).await {
        Ok(result) => result,
        Err(e) => {
            warn!(%user_id, tool, error = %e, "storing result failed, refunding reservation");
            refund(ledger, &reservation, tool).await;
            return Err(e);
        }
    };

    let remaining_credits = match ledger.settle(&reservation, outcome.used_credits).await {
        Ok(balance) => balance,
        Err(e) => {
            error!(%user_id, tool, amount = reservation.amount, used = outcome.used_credits,
                error = %e, "settlement failed, reservation kept");
            reservation.remaining
        }
    };
    info!(%user_id, tool, used = outcome.used_credits, remaining = remaining_credits, "ai tool completed");

    Ok(Metered {
        result,
        used_credits: outcome.used_credits,
        remaining_credits,
    })
}

async fn refund(ledger: &dyn CreditLedger, reservation: &Reservation, tool: &str) {
    if let Err(e) = ledger.refund(reservation).await {
        error!(user_id = %reservation.user_id, tool, amount = reservation.amount, error = %e, "refund failed");
    }
}


#[cfg(test)]
mod tests {
    use super::{memory::MemoryLedger, *};
    use crate::ai::{dto::IdeaRequest, worker::scripted::ScriptedWorker};

    fn task() -> ToolTask {
        IdeaRequest {
            topic: "tools for makers".into(),
            skills: "rust, sql".into(),
            complexity: "any".into(),
        }
        .into_task()
        .unwrap()
    }

    #[tokio::test]
    async fn empty_balance_is_402_without_calling_worker() {
        let user = Uuid::new_v4();
        let ledger = MemoryLedger::with_user(user, 0);
        let worker = ScriptedWorker::spending(10);

        let err = metered(&ledger, &worker, user, 4000, &task()).await.unwrap_err();
        assert!(matches!(err, ApiError::InsufficientCredits));
        assert_eq!(worker.calls(), 0);
        assert_eq!(ledger.get(user), Some(0));
    }

    #[tokio::test]
    async fn unknown_user_cannot_reserve() {
        let ledger = MemoryLedger::default();
        let worker = ScriptedWorker::spending(10);
        let err = metered(&ledger, &worker, Uuid::new_v4(), 4000, &task())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::InsufficientCredits));
        assert_eq!(worker.calls(), 0);
    }

    #[tokio::test]
    async fn success_charges_only_what_was_used() {
        let user = Uuid::new_v4();
        let ledger = MemoryLedger::with_user(user, 10_000);
        let worker = ScriptedWorker::spending(1_234);

        let out = metered(&ledger, &worker, user, 4000, &task()).await.unwrap();
        assert_eq!(*worker.last_budget.lock().unwrap(), Some(4000));
        assert_eq!(out.used_credits, 1_234);
        assert_eq!(out.remaining_credits, 10_000 - 1_234);
        assert_eq!(ledger.get(user), Some(10_000 - 1_234));
    }

    #[tokio::test]
    async fn budget_is_capped_by_balance_and_overage_never_goes_negative() {
        let user = Uuid::new_v4();
        let ledger = MemoryLedger::with_user(user, 300);
        let worker = ScriptedWorker::spending(900);

        let out = metered(&ledger, &worker, user, 4000, &task()).await.unwrap();
        assert_eq!(*worker.last_budget.lock().unwrap(), Some(300));
        assert_eq!(out.remaining_credits, 0);
        assert_eq!(ledger.get(user), Some(0));
    }

    #[tokio::test]
    async fn worker_failure_refunds_the_reservation() {
        let user = Uuid::new_v4();
        let ledger = MemoryLedger::with_user(user, 5_000);
        let worker = ScriptedWorker::failing();

        let err = metered(&ledger, &worker, user, 4000, &task()).await.unwrap_err();
        assert!(matches!(err, ApiError::Upstream(_)));
        assert_eq!(worker.calls(), 1);
        assert_eq!(ledger.get(user), Some(5_000));
    }

    #[tokio::test]
    async fn worker_reported_insufficient_credits_refunds_and_is_402() {
        let user = Uuid::new_v4();
        let ledger = MemoryLedger::with_user(user, 50);
        let worker =
            ScriptedWorker::new(|_| Err(crate::ai::worker::WorkerError::InsufficientCredits));

        let err = metered(&ledger, &worker, user, 4000, &task()).await.unwrap_err();
        assert!(matches!(err, ApiError::InsufficientCredits));
        assert_eq!(ledger.get(user), Some(50));
    }

    #[tokio::test]
    async fn failed_persist_step_refunds_after_the_worker_ran() {
        let user = Uuid::new_v4();
        let ledger = MemoryLedger::with_user(user, 1_000);
        let worker = ScriptedWorker::spending(300);

        let err = metered_then(&ledger, &worker, user, 4000, &task(), |_| async {
            Err(ApiError::not_found("Shard not found"))
        })
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
        assert_eq!(worker.calls(), 1);
        assert_eq!(ledger.get(user), Some(1_000));
    }

    #[tokio::test]
    async fn persist_step_sees_the_result_before_settlement() {
        let user = Uuid::new_v4();
        let ledger = MemoryLedger::with_user(user, 1_000);
        let worker = ScriptedWorker::spending(300);

        let held = &ledger;
        let out = metered_then(&ledger, &worker, user, 4000, &task(), |result| async move {
            assert_eq!(held.get(user), Some(0));
            Ok(result)
        })
        .await
        .unwrap();
        assert_eq!(out.remaining_credits, 700);
        assert_eq!(ledger.get(user), Some(700));
    }

    #[tokio::test]
    async fn grant_adds_credits() {
        let user = Uuid::new_v4();
        let ledger = MemoryLedger::with_user(user, 0);
        assert_eq!(ledger.grant(user, 10).await.unwrap(), Some(10));
        assert_eq!(ledger.grant(Uuid::new_v4(), 10).await.unwrap(), None);
    }
}
