use chrono::Timelike;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;
use wayfare_reservation::ReservationDetails;
use wayfare_shared::Money;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PricingError {
    #[error("Unknown tour: {0}")]
    UnknownTour(String),

    #[error("Invalid party size: {0}")]
    InvalidParty(u32),

    #[error("Quote exceeds representable amount")]
    Overflow,
}

/// Fares for point-to-point rides.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RideFare {
    pub base_minor: i64,
    pub per_passenger_minor: i64,

    /// Added on top of the fare for pickups inside the night window
    #[serde(default)]
    pub night_surcharge_percent: u32,

    #[serde(default = "default_night_starts")]
    pub night_starts_hour: u32,

    #[serde(default = "default_night_ends")]
    pub night_ends_hour: u32,
}

fn default_night_starts() -> u32 {
    22
}

fn default_night_ends() -> u32 {
    6
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TourFare {
    pub name: String,
    #[serde(default)]
    pub base_minor: i64,
    pub per_passenger_minor: i64,
}

/// Fixed price table. Amounts are quoted once, at creation, and never
/// recomputed for an existing reservation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceTable {
    pub currency: String,
    pub ride: RideFare,
    #[serde(default)]
    pub tours: HashMap<String, TourFare>,
}

impl Default for PriceTable {
    fn default() -> Self {
        let mut tours = HashMap::new();
        tours.insert(
            "CASTLE".to_string(),
            TourFare {
                name: "Castle and Old Town".to_string(),
                base_minor: 2_000,
                per_passenger_minor: 3_500,
            },
        );
        tours.insert(
            "VINEYARDS".to_string(),
            TourFare {
                name: "Vineyards Day Trip".to_string(),
                base_minor: 5_000,
                per_passenger_minor: 6_500,
            },
        );

        Self {
            currency: "EUR".to_string(),
            ride: RideFare {
                base_minor: 2_500,
                per_passenger_minor: 1_000,
                night_surcharge_percent: 20,
                night_starts_hour: default_night_starts(),
                night_ends_hour: default_night_ends(),
            },
            tours,
        }
    }
}

impl PriceTable {
    pub fn quote(&self, details: &ReservationDetails) -> Result<Money, PricingError> {
        let schedule = details.schedule();
        if schedule.passengers == 0 {
            return Err(PricingError::InvalidParty(schedule.passengers));
        }
        let passengers = i64::from(schedule.passengers);

        let amount = match details {
            ReservationDetails::Ride { .. } => {
                let fare = self
                    .ride
                    .per_passenger_minor
                    .checked_mul(passengers)
                    .and_then(|p| p.checked_add(self.ride.base_minor))
                    .ok_or(PricingError::Overflow)?;

                if self.is_night(schedule.time.hour()) {
                    let surcharge = fare
                        .checked_mul(i64::from(self.ride.night_surcharge_percent))
                        .ok_or(PricingError::Overflow)?
                        / 100;
                    fare.checked_add(surcharge).ok_or(PricingError::Overflow)?
                } else {
                    fare
                }
            }
            ReservationDetails::Tour { tour_code, .. } => {
                let fare = self
                    .tour(tour_code)
                    .ok_or_else(|| PricingError::UnknownTour(tour_code.clone()))?;
                fare.per_passenger_minor
                    .checked_mul(passengers)
                    .and_then(|p| p.checked_add(fare.base_minor))
                    .ok_or(PricingError::Overflow)?
            }
        };

        debug!(kind = details.kind().as_str(), amount_minor = amount, "Quoted reservation");
        Ok(Money::new(amount, &self.currency))
    }

    /// Tour codes match case-insensitively.
    pub fn tour(&self, code: &str) -> Option<&TourFare> {
        self.tours
            .iter()
            .find(|(known, _)| known.eq_ignore_ascii_case(code.trim()))
            .map(|(_, fare)| fare)
    }

    /// Offered tours sorted by code.
    pub fn tours(&self) -> Vec<(&str, &TourFare)> {
        let mut tours: Vec<_> = self.tours.iter().map(|(code, fare)| (code.as_str(), fare)).collect();
        tours.sort_by(|a, b| a.0.cmp(b.0));
        tours
    }

    fn is_night(&self, hour: u32) -> bool {
        let (starts, ends) = (self.ride.night_starts_hour, self.ride.night_ends_hour);
        if starts == ends {
            return false;
        }
        if starts < ends {
            hour >= starts && hour < ends
        } else {
            hour >= starts || hour < ends
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveTime};
    use wayfare_reservation::Schedule;

    fn schedule(hour: u32, passengers: u32) -> Schedule {
        Schedule {
            date: NaiveDate::from_ymd_opt(2026, 11, 2).unwrap(),
            time: NaiveTime::from_hms_opt(hour, 0, 0).unwrap(),
            passengers,
        }
    }

    fn ride(hour: u32, passengers: u32) -> ReservationDetails {
        ReservationDetails::Ride {
            schedule: schedule(hour, passengers),
            pickup: "Airport".to_string(),
            dropoff: "Centre".to_string(),
        }
    }

    #[test]
    fn test_ride_quote() {
        let table = PriceTable::default();

        // 2500 base + 2 * 1000
        let day = table.quote(&ride(10, 2)).unwrap();
        assert_eq!(day, Money::new(4_500, "EUR"));

        // 20% night surcharge
        let night = table.quote(&ride(23, 2)).unwrap();
        assert_eq!(night.amount_minor, 5_400);
        let early = table.quote(&ride(5, 2)).unwrap();
        assert_eq!(early.amount_minor, 5_400);
        let morning = table.quote(&ride(6, 2)).unwrap();
        assert_eq!(morning.amount_minor, 4_500);
    }

    #[test]
    fn test_tour_quote_is_case_insensitive() {
        let table = PriceTable::default();
        let details = ReservationDetails::Tour {
            schedule: schedule(14, 3),
            tour_code: "castle".to_string(),
        };

        // 2000 base + 3 * 3500, no night rule for tours
        assert_eq!(table.quote(&details).unwrap().amount_minor, 12_500);
    }

    #[test]
    fn test_unknown_tour_is_rejected() {
        let table = PriceTable::default();
        let details = ReservationDetails::Tour {
            schedule: schedule(14, 3),
            tour_code: "ATLANTIS".to_string(),
        };

        assert_eq!(
            table.quote(&details),
            Err(PricingError::UnknownTour("ATLANTIS".to_string()))
        );
    }

    #[test]
    fn test_empty_party_and_overflow() {
        let mut table = PriceTable::default();
        assert_eq!(table.quote(&ride(10, 0)), Err(PricingError::InvalidParty(0)));

        table.ride.per_passenger_minor = i64::MAX;
        assert_eq!(table.quote(&ride(10, 2)), Err(PricingError::Overflow));
    }

    #[test]
    fn test_table_from_json() {
        let table: PriceTable = serde_json::from_value(serde_json::json!({
            "currency": "czk",
            "ride": { "base_minor": 30000, "per_passenger_minor": 5000 },
            "tours": { "PRAGUE": { "name": "Prague Walk", "per_passenger_minor": 40000 } }
        }))
        .unwrap();

        assert_eq!(table.ride.night_surcharge_percent, 0);
        assert_eq!(table.quote(&ride(23, 1)).unwrap(), Money::new(35_000, "CZK"));
        assert_eq!(table.tours().len(), 1);
        assert_eq!(table.tour("prague").unwrap().base_minor, 0);
    }
}
