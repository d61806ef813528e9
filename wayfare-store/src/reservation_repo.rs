use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{FromRow, Pool, Postgres};
use tracing::{debug, error};
use uuid::Uuid;
use wayfare_reservation::{
    ContactInfo, PaymentStatus, Receipt, Reservation, ReservationDetails, ReservationRepository,
    ReservationStatus, StoreError, StoreResult, WriteGuard,
};
use wayfare_shared::Money;

const COLUMNS: &str = "id, owner_id, details, contact, amount_minor, currency, status, payment_status, \
     payment_session_id, assigned_driver_id, receipt_ref, receipt_issued_at, created_at, updated_at";

#[derive(Debug, FromRow)]
struct ReservationRow {
    id: Uuid,
    owner_id: String,
    details: Json<ReservationDetails>,
    contact: Json<ContactInfo>,
    amount_minor: i64,
    currency: String,
    status: String,
    payment_status: String,
    payment_session_id: Option<String>,
    assigned_driver_id: Option<String>,
    receipt_ref: Option<String>,
    receipt_issued_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ReservationRow> for Reservation {
    type Error = StoreError;

    fn try_from(row: ReservationRow) -> Result<Self, Self::Error> {
        let status = ReservationStatus::parse(&row.status)
            .ok_or_else(|| StoreError::Backend(format!("unknown status {}", row.status)))?;
        let payment_status = PaymentStatus::parse(&row.payment_status)
            .ok_or_else(|| StoreError::Backend(format!("unknown payment status {}", row.payment_status)))?;

        let receipt = match (row.receipt_ref, row.receipt_issued_at) {
            (Some(document_ref), Some(issued_at)) => Some(Receipt { document_ref, issued_at }),
            _ => None,
        };

        Ok(Reservation {
            id: row.id,
            owner_id: row.owner_id,
            details: row.details.0,
            contact: row.contact.0,
            amount: Money::new(row.amount_minor, &row.currency),
            status,
            payment_status,
            payment_session_id: row.payment_session_id,
            assigned_driver_id: row.assigned_driver_id,
            receipt,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn backend(e: sqlx::Error) -> StoreError {
    error!("Reservation store error: {}", e);
    StoreError::Backend(e.to_string())
}

#[derive(Clone)]
pub struct PgReservationRepository {
    pool: Pool<Postgres>,
}

impl PgReservationRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    async fn exists(&self, id: Uuid) -> StoreResult<bool> {
        sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM reservations WHERE id = $1)")
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(backend)
    }

    async fn fetch_many(&self, sql: &str, limit: usize) -> StoreResult<Vec<Reservation>> {
        let rows = sqlx::query_as::<_, ReservationRow>(sql)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;

        rows.into_iter().map(Reservation::try_from).collect()
    }
}

#[async_trait]
impl ReservationRepository for PgReservationRepository {
    async fn insert(&self, reservation: &Reservation) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO reservations (
                id, owner_id, kind, details, contact, amount_minor, currency, status,
                payment_status, payment_session_id, assigned_driver_id, receipt_ref,
                receipt_issued_at, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(reservation.id)
        .bind(&reservation.owner_id)
        .bind(reservation.kind().as_str())
        .bind(Json(&reservation.details))
        .bind(Json(&reservation.contact))
        .bind(reservation.amount.amount_minor)
        .bind(&reservation.amount.currency)
        .bind(reservation.status.as_str())
        .bind(reservation.payment_status.as_str())
        .bind(&reservation.payment_session_id)
        .bind(&reservation.assigned_driver_id)
        .bind(reservation.receipt.as_ref().map(|r| r.document_ref.clone()))
        .bind(reservation.receipt.as_ref().map(|r| r.issued_at))
        .bind(reservation.created_at)
        .bind(reservation.updated_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(StoreError::Duplicate(reservation.id))
            }
            Err(e) => Err(backend(e)),
        }
    }

    async fn get(&self, id: Uuid) -> StoreResult<Option<Reservation>> {
        let row = sqlx::query_as::<_, ReservationRow>(&format!(
            "SELECT {} FROM reservations WHERE id = $1",
            COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        row.map(Reservation::try_from).transpose()
    }

    async fn update_if(&self, guard: &WriteGuard, next: &Reservation) -> StoreResult<Reservation> {
        // The WHERE clause is the guard: zero rows means someone moved the record first
        let sql = format!(
            r#"
            UPDATE reservations SET
                details = $2,
                status = $3,
                payment_status = $4,
                payment_session_id = $5,
                assigned_driver_id = $6,
                receipt_ref = $7,
                receipt_issued_at = $8,
                updated_at = NOW()
            WHERE id = $1
              AND status = $9
              AND payment_status = $10
              AND payment_session_id IS NOT DISTINCT FROM $11
              AND assigned_driver_id IS NOT DISTINCT FROM $12
              AND (receipt_ref IS NOT NULL) = $13
              AND details = $14
            RETURNING {}
            "#,
            COLUMNS
        );

        let row = sqlx::query_as::<_, ReservationRow>(&sql)
            .bind(next.id)
            .bind(Json(&next.details))
            .bind(next.status.as_str())
            .bind(next.payment_status.as_str())
            .bind(&next.payment_session_id)
            .bind(&next.assigned_driver_id)
            .bind(next.receipt.as_ref().map(|r| r.document_ref.clone()))
            .bind(next.receipt.as_ref().map(|r| r.issued_at))
            .bind(guard.status.as_str())
            .bind(guard.payment_status.as_str())
            .bind(&guard.payment_session_id)
            .bind(&guard.assigned_driver_id)
            .bind(guard.receipt_issued)
            .bind(Json(&guard.details))
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;

        match row {
            Some(row) => Reservation::try_from(row),
            None if self.exists(next.id).await? => {
                debug!(reservation_id = %next.id, "Conditional update matched no row");
                Err(StoreError::Conflict(next.id))
            }
            None => Err(StoreError::NotFound(next.id)),
        }
    }

    async fn list_for_owner(&self, owner_id: &str) -> StoreResult<Vec<Reservation>> {
        let rows = sqlx::query_as::<_, ReservationRow>(&format!(
            "SELECT {} FROM reservations WHERE owner_id = $1 ORDER BY created_at DESC",
            COLUMNS
        ))
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        rows.into_iter().map(Reservation::try_from).collect()
    }

    async fn list_awaiting_payment(&self, limit: usize) -> StoreResult<Vec<Reservation>> {
        self.fetch_many(
            &format!(
                "SELECT {} FROM reservations \
                 WHERE status = 'PENDING' AND payment_status = 'PENDING' AND payment_session_id IS NOT NULL \
                 ORDER BY updated_at LIMIT $1",
                COLUMNS
            ),
            limit,
        )
        .await
    }

    async fn list_missing_receipts(&self, limit: usize) -> StoreResult<Vec<Reservation>> {
        self.fetch_many(
            &format!(
                "SELECT {} FROM reservations \
                 WHERE payment_status = 'PAID' AND receipt_ref IS NULL \
                 ORDER BY updated_at LIMIT $1",
                COLUMNS
            ),
            limit,
        )
        .await
    }
}
