use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::models::Ticket;
use crate::store::{StoreError, TicketStore};

#[derive(Clone)]
pub struct PgTicketStore {
    pool: PgPool,
}

impl PgTicketStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Inserts `quantity` ticket rows inside the caller's transaction. Only
    /// the allocator calls this; ticket rows must never appear outside the
    /// transaction that decremented the inventory counter.
    pub async fn insert_bulk(
        tx: &mut Transaction<'_, Postgres>,
        event_id: Uuid,
        purchase_id: Uuid,
        quantity: i32,
    ) -> Result<Vec<Ticket>, sqlx::Error> {
        let mut tickets = Vec::with_capacity(quantity as usize);
        for _ in 0..quantity {
            let ticket = sqlx::query_as::<_, Ticket>(
                "INSERT INTO tickets (event_id, purchase_id)
                 VALUES ($1, $2)
                 RETURNING id, event_id, purchase_id, issued_at",
            )
            .bind(event_id)
            .bind(purchase_id)
            .fetch_one(&mut **tx)
            .await?;
            tickets.push(ticket);
        }
        Ok(tickets)
    }
}

#[async_trait]
impl TicketStore for PgTicketStore {
    async fn find_by_purchase(&self, purchase_id: Uuid) -> Result<Vec<Ticket>, StoreError> {
        let tickets = sqlx::query_as::<_, Ticket>(
            "SELECT id, event_id, purchase_id, issued_at
             FROM tickets
             WHERE purchase_id = $1
             ORDER BY issued_at ASC",
        )
        .bind(purchase_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(tickets)
    }
}
