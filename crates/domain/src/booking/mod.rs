//! Booking lifecycle: creation, payment, cancellation and expiry.

mod service;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use store::{
    Booking, BookingId, BookingStatus, Money, Payment, PaymentStatus, UnitId, UserId,
};

pub use service::BookingService;

/// Event detail recorded when a booking is created.
pub const BOOKED_DETAILS: &str = "Booking created and pending payment";
/// Event detail recorded when a booking is cancelled on request.
pub const CANCELLED_DETAILS: &str = "Booking cancelled";
/// Event detail recorded when the sweep cancels an unpaid booking.
pub const EXPIRED_DETAILS: &str = "Cancelled by TTL";
/// Event detail recorded when payment is confirmed.
pub const PAID_DETAILS: &str = "Payment received";

/// Command to reserve a unit for an inclusive date range.
#[derive(Debug, Clone, Copy)]
pub struct CreateBooking {
    pub unit_id: UnitId,
    pub user_id: UserId,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

/// A booking together with the status of its payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BookingView {
    pub id: BookingId,
    pub unit_id: UnitId,
    pub user_id: UserId,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub status: BookingStatus,
    pub payment_status: PaymentStatus,
    pub total_cost: Money,
    pub expires_at: Option<DateTime<Utc>>,
}

impl BookingView {
    pub fn new(booking: &Booking, payment: &Payment) -> Self {
        Self {
            id: booking.id,
            unit_id: booking.unit_id,
            user_id: booking.user_id,
            start_date: booking.dates.start(),
            end_date: booking.dates.end(),
            status: booking.status,
            payment_status: payment.status,
            total_cost: booking.total_cost,
            expires_at: booking.expires_at,
        }
    }
}
