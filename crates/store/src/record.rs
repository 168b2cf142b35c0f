//! Row types held by the durable store.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::{BookingId, EventId, PaymentId, UnitId, UserId};

/// Row version of a booking, used for optimistic concurrency control.
///
/// A freshly inserted booking is at version 0; every successful update
/// moves it to the next version.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Version(i64);

impl Version {
    /// Creates a version from a raw value.
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    /// Returns the version of a row that has never been updated.
    pub fn initial() -> Self {
        Self(0)
    }

    /// Returns the next version.
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    /// Returns the raw version value.
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Money amount in cents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    /// Creates an amount from cents.
    pub fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    /// Creates an amount from whole currency units.
    pub fn from_major(units: i64) -> Self {
        Self(units * 100)
    }

    /// Returns zero money.
    pub fn zero() -> Self {
        Self(0)
    }

    /// Returns the amount in cents.
    pub fn cents(&self) -> i64 {
        self.0
    }

    /// Returns true if the amount is greater than zero.
    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}{}.{:02}", abs / 100, abs % 100)
    }
}

/// Error returned when a decimal amount cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid amount '{0}': expected a decimal with at most two fractional digits")]
pub struct ParseMoneyError(String);

impl std::str::FromStr for Money {
    type Err = ParseMoneyError;

    /// Parses `"115"`, `"115.5"` or `"115.00"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseMoneyError(s.to_string());
        let trimmed = s.trim();
        let (negative, digits) = match trimmed.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, trimmed),
        };
        let (whole, fraction) = digits.split_once('.').unwrap_or((digits, ""));
        if whole.is_empty()
            || fraction.len() > 2
            || !whole.bytes().all(|b| b.is_ascii_digit())
            || !fraction.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(err());
        }
        let whole: i64 = whole.parse().map_err(|_| err())?;
        let fraction: i64 = match fraction.len() {
            0 => 0,
            1 => fraction.parse::<i64>().map_err(|_| err())? * 10,
            _ => fraction.parse().map_err(|_| err())?,
        };
        let cents = whole
            .checked_mul(100)
            .and_then(|c| c.checked_add(fraction))
            .ok_or_else(err)?;
        Ok(Self(if negative { -cents } else { cents }))
    }
}

/// Inclusive calendar date range `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    /// Creates a range, or `None` if `end` is before `start`.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Option<Self> {
        (end >= start).then_some(Self { start, end })
    }

    /// A range covering a single day.
    pub fn single_day(day: NaiveDate) -> Self {
        Self {
            start: day,
            end: day,
        }
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    /// Returns true if the two ranges share at least one day.
    ///
    /// Ranges that merely touch (one ends on the day the other starts)
    /// overlap, because both ends are inclusive.
    pub fn overlaps(&self, other: &DateRange) -> bool {
        self.end >= other.start && other.end >= self.start
    }

    /// Returns true if `day` falls inside the range.
    pub fn contains(&self, day: NaiveDate) -> bool {
        self.start <= day && day <= self.end
    }
}

/// Kind of inventory unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UnitType {
    Home,
    Flat,
    Apartments,
}

/// Booking lifecycle status.
///
/// ```text
/// PENDING_PAYMENT ──pay──► CONFIRMED
///        │                     │
///        └──cancel / expire────┴──cancel──► CANCELLED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    PendingPayment,
    Confirmed,
    Cancelled,
}

impl BookingStatus {
    /// Active bookings hold their dates against new bookings.
    pub fn is_active(&self) -> bool {
        !matches!(self, BookingStatus::Cancelled)
    }
}

/// Status of the payment attached to a booking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Cancelled,
}

/// Kind of entry in the unit event log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UnitEventType {
    Created,
    Booked,
    Cancelled,
    PaymentConfirmed,
}

/// Implements the textual column encoding shared by the status enums.
macro_rules! column_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            /// Returns the stored column value.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(format!("unknown {} '{}'", stringify!($name), other)),
                }
            }
        }
    };
}

column_enum!(UnitType {
    Home => "HOME",
    Flat => "FLAT",
    Apartments => "APARTMENTS",
});

column_enum!(BookingStatus {
    PendingPayment => "PENDING_PAYMENT",
    Confirmed => "CONFIRMED",
    Cancelled => "CANCELLED",
});

column_enum!(PaymentStatus {
    Pending => "PENDING",
    Paid => "PAID",
    Cancelled => "CANCELLED",
});

column_enum!(UnitEventType {
    Created => "CREATED",
    Booked => "BOOKED",
    Cancelled => "CANCELLED",
    PaymentConfirmed => "PAYMENT_CONFIRMED",
});

/// A reservable inventory unit. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unit {
    pub id: UnitId,
    pub rooms: i32,
    pub unit_type: UnitType,
    pub floor: i32,
    pub description: String,
    pub base_cost: Money,
    pub created_at: DateTime<Utc>,
}

/// A booking party.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

/// A reservation of one unit for an inclusive date range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: BookingId,
    pub unit_id: UnitId,
    pub user_id: UserId,
    pub dates: DateRange,
    pub status: BookingStatus,
    pub total_cost: Money,
    /// End of the payment window; only set while payment is pending.
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: Version,
}

impl Booking {
    /// Returns true if the payment window is set and has elapsed at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= now)
    }
}

/// The payment record paired 1:1 with a booking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub booking_id: BookingId,
    pub status: PaymentStatus,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// An append-only audit entry for a unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitEvent {
    pub id: EventId,
    pub unit_id: UnitId,
    pub event_type: UnitEventType,
    pub details: String,
    pub created_at: DateTime<Utc>,
}

impl UnitEvent {
    /// Creates a new event stamped with `at`.
    pub fn new(
        unit_id: UnitId,
        event_type: UnitEventType,
        details: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: EventId::new(),
            unit_id,
            event_type,
            details: details.into(),
            created_at: at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, d).unwrap()
    }

    #[test]
    fn date_range_rejects_end_before_start() {
        assert!(DateRange::new(day(2), day(1)).is_none());
        assert!(DateRange::new(day(1), day(1)).is_some());
    }

    #[test]
    fn touching_ranges_overlap() {
        let a = DateRange::new(day(1), day(2)).unwrap();
        let b = DateRange::new(day(2), day(3)).unwrap();
        assert!(a.overlaps(&b));
        assert!(b.overlaps(&a));
    }

    #[test]
    fn disjoint_ranges_do_not_overlap() {
        let a = DateRange::new(day(1), day(2)).unwrap();
        let b = DateRange::new(day(3), day(4)).unwrap();
        assert!(!a.overlaps(&b));
        assert!(!b.overlaps(&a));
    }

    #[test]
    fn enclosing_range_overlaps() {
        let outer = DateRange::new(day(1), day(10)).unwrap();
        let inner = DateRange::new(day(4), day(5)).unwrap();
        assert!(outer.overlaps(&inner));
        assert!(inner.overlaps(&outer));
    }

    #[test]
    fn contains_is_inclusive() {
        let range = DateRange::new(day(3), day(5)).unwrap();
        assert!(range.contains(day(3)));
        assert!(range.contains(day(5)));
        assert!(!range.contains(day(2)));
        assert!(!range.contains(day(6)));
    }

    #[test]
    fn money_parses_decimal_strings() {
        assert_eq!("100".parse::<Money>().unwrap(), Money::from_cents(10_000));
        assert_eq!("100.5".parse::<Money>().unwrap(), Money::from_cents(10_050));
        assert_eq!("100.05".parse::<Money>().unwrap(), Money::from_cents(10_005));
        assert!("100.055".parse::<Money>().is_err());
        assert!("abc".parse::<Money>().is_err());
        assert!(".5".parse::<Money>().is_err());
    }

    #[test]
    fn money_displays_two_decimals() {
        assert_eq!(Money::from_cents(11_500).to_string(), "115.00");
        assert_eq!(Money::from_cents(5).to_string(), "0.05");
        assert_eq!(Money::from_cents(-250).to_string(), "-2.50");
    }

    #[test]
    fn status_column_encoding() {
        assert_eq!(BookingStatus::PendingPayment.as_str(), "PENDING_PAYMENT");
        assert_eq!(
            "PAYMENT_CONFIRMED".parse::<UnitEventType>().unwrap(),
            UnitEventType::PaymentConfirmed
        );
        assert!("LOST".parse::<PaymentStatus>().is_err());
        let json = serde_json::to_string(&UnitType::Apartments).unwrap();
        assert_eq!(json, "\"APARTMENTS\"");
    }

    #[test]
    fn only_cancelled_bookings_are_inactive() {
        assert!(BookingStatus::PendingPayment.is_active());
        assert!(BookingStatus::Confirmed.is_active());
        assert!(!BookingStatus::Cancelled.is_active());
    }

    #[test]
    fn version_increments() {
        assert_eq!(Version::initial().next(), Version::new(1));
    }
}
