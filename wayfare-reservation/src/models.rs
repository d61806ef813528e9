use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;
use wayfare_shared::{Masked, Money};

/// Largest party a single reservation may carry.
pub const MAX_PASSENGERS: u32 = 60;

/// Reservation status in the lifecycle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReservationStatus {
    Pending,
    Confirmed,
    Assigned,
    Completed,
    Cancelled,
}

impl ReservationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Confirmed => "CONFIRMED",
            Self::Assigned => "ASSIGNED",
            Self::Completed => "COMPLETED",
            Self::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "PENDING" => Some(Self::Pending),
            "CONFIRMED" => Some(Self::Confirmed),
            "ASSIGNED" => Some(Self::Assigned),
            "COMPLETED" => Some(Self::Completed),
            "CANCELLED" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// No transition leaves a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

impl fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Paid => "PAID",
            Self::Failed => "FAILED",
            Self::Refunded => "REFUNDED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "PENDING" => Some(Self::Pending),
            "PAID" => Some(Self::Paid),
            "FAILED" => Some(Self::Failed),
            "REFUNDED" => Some(Self::Refunded),
            _ => None,
        }
    }

    /// A settled payment can no longer be re-billed or overwritten.
    pub fn is_final(&self) -> bool {
        matches!(self, Self::Paid | Self::Refunded)
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ReservationKind {
    Ride,
    Tour,
}

impl ReservationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ride => "ride",
            Self::Tour => "tour",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "ride" => Some(Self::Ride),
            "tour" => Some(Self::Tour),
            _ => None,
        }
    }
}

/// When the reservation takes place and for how many people.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub passengers: u32,
}

/// Customer-supplied booking fields, one variant per reservation kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReservationDetails {
    Ride {
        schedule: Schedule,
        pickup: String,
        dropoff: String,
    },
    Tour {
        schedule: Schedule,
        tour_code: String,
    },
}

impl ReservationDetails {
    pub fn kind(&self) -> ReservationKind {
        match self {
            Self::Ride { .. } => ReservationKind::Ride,
            Self::Tour { .. } => ReservationKind::Tour,
        }
    }

    pub fn schedule(&self) -> &Schedule {
        match self {
            Self::Ride { schedule, .. } | Self::Tour { schedule, .. } => schedule,
        }
    }

    /// Short human-readable summary, used for checkout and receipt descriptions.
    pub fn describe(&self) -> String {
        let schedule = self.schedule();
        match self {
            Self::Ride { pickup, dropoff, .. } => format!(
                "Ride {} -> {} on {} at {} ({} pax)",
                pickup,
                dropoff,
                schedule.date,
                schedule.time.format("%H:%M"),
                schedule.passengers
            ),
            Self::Tour { tour_code, .. } => format!(
                "Tour {} on {} at {} ({} pax)",
                tour_code,
                schedule.date,
                schedule.time.format("%H:%M"),
                schedule.passengers
            ),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        let passengers = self.schedule().passengers;
        if passengers == 0 || passengers > MAX_PASSENGERS {
            return Err(format!(
                "passengers must be between 1 and {}, got {}",
                MAX_PASSENGERS, passengers
            ));
        }

        match self {
            Self::Ride { pickup, dropoff, .. } => {
                if pickup.trim().is_empty() || dropoff.trim().is_empty() {
                    return Err("ride requires pickup and dropoff locations".to_string());
                }
            }
            Self::Tour { tour_code, .. } => {
                if tour_code.trim().is_empty() {
                    return Err("tour requires a tour code".to_string());
                }
            }
        }

        Ok(())
    }
}

/// Owner contact details, frozen at creation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactInfo {
    pub name: String,
    pub email: Masked<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub document_ref: String,
    pub issued_at: DateTime<Utc>,
}

/// The single source of truth for a customer's ride or tour booking
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: Uuid,
    pub owner_id: String,
    pub details: ReservationDetails,
    pub contact: ContactInfo,
    pub amount: Money,
    pub status: ReservationStatus,
    pub payment_status: PaymentStatus,
    pub payment_session_id: Option<String>,
    pub assigned_driver_id: Option<String>,
    pub receipt: Option<Receipt>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a reservation.
#[derive(Debug, Clone)]
pub struct NewReservation {
    pub owner_id: String,
    pub details: ReservationDetails,
    pub contact: ContactInfo,
    pub amount: Money,
}

impl Reservation {
    pub fn new(input: NewReservation) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            owner_id: input.owner_id,
            details: input.details,
            contact: input.contact,
            amount: input.amount,
            status: ReservationStatus::Pending,
            payment_status: PaymentStatus::Pending,
            payment_session_id: None,
            assigned_driver_id: None,
            receipt: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn kind(&self) -> ReservationKind {
        self.details.kind()
    }

    pub fn is_assigned_to(&self, driver_id: &str) -> bool {
        self.assigned_driver_id.as_deref() == Some(driver_id)
    }

    /// Checks the record-level invariants every committed state must satisfy.
    pub fn check_invariants(&self) -> Result<(), String> {
        if self.assigned_driver_id.is_some()
            && !matches!(self.status, ReservationStatus::Assigned | ReservationStatus::Completed)
        {
            return Err(format!("driver assigned while {}", self.status));
        }
        if self.receipt.is_some() && self.payment_status != PaymentStatus::Paid {
            return Err(format!("receipt present while payment is {}", self.payment_status));
        }
        Ok(())
    }
}

/// Who is asking for a transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", content = "id", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Actor {
    Customer(String),
    Operator(String),
    Driver(String),
}

impl Actor {
    pub fn id(&self) -> &str {
        match self {
            Actor::Customer(id) | Actor::Operator(id) | Actor::Driver(id) => id,
        }
    }

    pub fn is_operator(&self) -> bool {
        matches!(self, Actor::Operator(_))
    }

    /// Customers cancel their own reservations before a driver is bound,
    /// drivers cancel what they hold, operators cancel anything.
    pub fn may_cancel(&self, reservation: &Reservation) -> bool {
        match self {
            Actor::Operator(_) => true,
            Actor::Customer(id) => {
                *id == reservation.owner_id
                    && matches!(reservation.status, ReservationStatus::Pending | ReservationStatus::Confirmed)
            }
            Actor::Driver(id) => reservation.is_assigned_to(id),
        }
    }

    pub fn may_complete(&self, reservation: &Reservation) -> bool {
        match self {
            Actor::Operator(_) => true,
            Actor::Driver(id) => reservation.is_assigned_to(id),
            Actor::Customer(_) => false,
        }
    }

    pub fn may_modify(&self, reservation: &Reservation) -> bool {
        match self {
            Actor::Operator(_) => true,
            Actor::Customer(id) => *id == reservation.owner_id,
            Actor::Driver(_) => false,
        }
    }

    pub fn may_view(&self, reservation: &Reservation) -> bool {
        match self {
            Actor::Customer(id) => *id == reservation.owner_id,
            Actor::Operator(_) | Actor::Driver(_) => true,
        }
    }
}
