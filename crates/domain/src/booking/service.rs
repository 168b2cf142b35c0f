//! Booking service enforcing the lifecycle state machine.

use std::sync::Arc;

use store::{
    Booking, BookingId, BookingStatus, BookingStore, DateRange, Payment, PaymentId, PaymentStatus,
    StoreTransaction, UnitEventType, Version,
};
use tracing::{info, warn};

use super::{
    BOOKED_DETAILS, BookingView, CANCELLED_DETAILS, CreateBooking, EXPIRED_DETAILS, PAID_DETAILS,
};
use crate::availability::AvailabilityService;
use crate::clock::Clock;
use crate::error::{DomainError, Result};
use crate::events::EventRecorder;
use crate::policy::BookingPolicy;

/// Service for the booking lifecycle.
///
/// Every operation runs in a single store transaction. Creation locks the
/// unit row, so attempts against the same unit are serialized; payment and
/// cancellation lock the booking row. The availability counter is adjusted
/// only after the transaction has committed, and only for bookings whose
/// range covers today.
#[derive(Clone)]
pub struct BookingService {
    store: Arc<dyn BookingStore>,
    availability: AvailabilityService,
    events: EventRecorder,
    clock: Arc<dyn Clock>,
    policy: BookingPolicy,
}

impl BookingService {
    pub fn new(
        store: Arc<dyn BookingStore>,
        availability: AvailabilityService,
        clock: Arc<dyn Clock>,
        policy: BookingPolicy,
    ) -> Self {
        Self {
            store,
            availability,
            events: EventRecorder::new(clock.clone()),
            clock,
            policy,
        }
    }

    pub fn policy(&self) -> &BookingPolicy {
        &self.policy
    }

    /// Reserves a unit for the requested dates, pending payment.
    #[tracing::instrument(skip(self), fields(unit_id = %cmd.unit_id, user_id = %cmd.user_id))]
    pub async fn create_booking(&self, cmd: CreateBooking) -> Result<BookingView> {
        let dates = DateRange::new(cmd.start_date, cmd.end_date)
            .ok_or_else(|| DomainError::invalid("end_date must be on or after start_date"))?;
        info!(start = %cmd.start_date, end = %cmd.end_date, "Creating booking");

        let affects_today = self.affects_today(&dates);
        if affects_today {
            self.prime_counter().await;
        }

        let mut tx = self.store.begin().await?;
        let unit = tx
            .lock_unit(cmd.unit_id)
            .await?
            .ok_or_else(|| DomainError::not_found("Unit not found"))?;

        if tx.exists_active_booking(unit.id, dates).await? {
            warn!(start = %cmd.start_date, end = %cmd.end_date, "Availability check failed");
            metrics::counter!("booking_conflicts_total").increment(1);
            return Err(DomainError::conflict(
                "Unit is unavailable for the selected dates",
            ));
        }

        let user = tx
            .find_user(cmd.user_id)
            .await?
            .ok_or_else(|| DomainError::not_found("User not found"))?;

        let total_cost = self
            .policy
            .markup
            .apply(unit.base_cost)
            .ok_or_else(|| DomainError::invalid("Unit cost is out of range"))?;

        let now = self.clock.now();
        let booking = Booking {
            id: BookingId::new(),
            unit_id: unit.id,
            user_id: user.id,
            dates,
            status: BookingStatus::PendingPayment,
            total_cost,
            expires_at: Some(now + self.policy.payment_window),
            created_at: now,
            updated_at: now,
            version: Version::initial(),
        };
        tx.insert_booking(&booking).await?;

        let payment = Payment {
            id: PaymentId::new(),
            booking_id: booking.id,
            status: PaymentStatus::Pending,
            paid_at: None,
            created_at: now,
        };
        tx.insert_payment(&payment).await?;

        self.events
            .record(tx.as_mut(), unit.id, UnitEventType::Booked, BOOKED_DETAILS)
            .await?;
        tx.commit().await?;
        metrics::counter!("bookings_created_total").increment(1);

        if affects_today
            && let Err(e) = self.availability.decrease_if_possible().await
        {
            warn!(error = %e, "Availability counter not decreased after booking");
        }

        info!(booking_id = %booking.id, payment_id = %payment.id, "Booking created");
        Ok(BookingView::new(&booking, &payment))
    }

    /// Cancels a booking. Cancelling a cancelled booking returns it unchanged.
    #[tracing::instrument(skip(self))]
    pub async fn cancel_booking(&self, booking_id: BookingId) -> Result<BookingView> {
        // The dates are only known under the lock, so prime regardless.
        self.prime_counter().await;
        let mut tx = self.store.begin().await?;
        let booking = tx
            .lock_booking(booking_id)
            .await?
            .ok_or_else(|| DomainError::not_found("Booking not found"))?;
        let mut payment = tx
            .find_payment_for_booking(booking_id)
            .await?
            .ok_or_else(|| DomainError::not_found("Payment record missing"))?;

        if booking.status == BookingStatus::Cancelled {
            warn!("Cancel requested for already cancelled booking");
            tx.rollback().await?;
            return Ok(BookingView::new(&booking, &payment));
        }

        info!("Cancelling booking");
        let now = self.clock.now();
        let booking = tx
            .update_booking(&Booking {
                status: BookingStatus::Cancelled,
                expires_at: None,
                updated_at: now,
                ..booking
            })
            .await?;

        payment.status = PaymentStatus::Cancelled;
        tx.update_payment(&payment).await?;

        self.events
            .record(
                tx.as_mut(),
                booking.unit_id,
                UnitEventType::Cancelled,
                CANCELLED_DETAILS,
            )
            .await?;
        tx.commit().await?;
        metrics::counter!("bookings_cancelled_total").increment(1);

        if self.affects_today(&booking.dates)
            && let Err(e) = self.availability.increase().await
        {
            warn!(error = %e, "Availability counter not increased after cancellation");
        }

        info!(payment_id = %payment.id, "Booking cancelled");
        Ok(BookingView::new(&booking, &payment))
    }

    /// Confirms payment for a pending booking.
    ///
    /// Fails if the booking is cancelled or its payment window has elapsed;
    /// in both cases the payment record is left untouched. Confirming an
    /// already confirmed booking returns it unchanged. Never adjusts the
    /// availability counter.
    #[tracing::instrument(skip(self))]
    pub async fn confirm_payment(&self, booking_id: BookingId) -> Result<BookingView> {
        let mut tx = self.store.begin().await?;
        let booking = tx
            .lock_booking(booking_id)
            .await?
            .ok_or_else(|| DomainError::not_found("Booking not found"))?;

        let now = self.clock.now();
        match booking.status {
            BookingStatus::Cancelled => {
                return Err(DomainError::conflict("Cannot pay for cancelled booking"));
            }
            BookingStatus::PendingPayment if booking.is_expired_at(now) => {
                return Err(DomainError::conflict("Payment window has expired"));
            }
            _ => {}
        }

        let mut payment = tx
            .find_payment_for_booking(booking_id)
            .await?
            .ok_or_else(|| DomainError::not_found("Payment record missing"))?;

        if booking.status == BookingStatus::Confirmed {
            tx.rollback().await?;
            return Ok(BookingView::new(&booking, &payment));
        }

        info!("Confirming payment");
        let booking = tx
            .update_booking(&Booking {
                status: BookingStatus::Confirmed,
                expires_at: None,
                updated_at: now,
                ..booking
            })
            .await?;

        payment.status = PaymentStatus::Paid;
        payment.paid_at = Some(now);
        tx.update_payment(&payment).await?;

        self.events
            .record(
                tx.as_mut(),
                booking.unit_id,
                UnitEventType::PaymentConfirmed,
                PAID_DETAILS,
            )
            .await?;
        tx.commit().await?;
        metrics::counter!("bookings_confirmed_total").increment(1);

        info!(payment_id = %payment.id, "Payment confirmed");
        Ok(BookingView::new(&booking, &payment))
    }

    /// Cancels every pending booking whose payment window has elapsed.
    ///
    /// Returns the number of bookings cancelled. The availability counter
    /// receives a single batched increase for those covering today.
    #[tracing::instrument(skip(self))]
    pub async fn cancel_expired_bookings(&self) -> Result<u64> {
        let now = self.clock.now();
        self.prime_counter().await;
        let mut tx = self.store.begin().await?;
        let expired = tx.lock_expired_bookings(now).await?;
        if expired.is_empty() {
            tx.rollback().await?;
            return Ok(0);
        }

        let mut affecting_today = 0;
        for booking in expired.iter().cloned() {
            if self.affects_today(&booking.dates) {
                affecting_today += 1;
            }
            self.expire(tx.as_mut(), booking).await?;
        }

        tx.commit().await?;

        let cancelled = expired.len() as u64;
        metrics::counter!("bookings_expired_total").increment(cancelled);

        if let Err(e) = self.availability.increase_by(affecting_today).await {
            warn!(error = %e, count = affecting_today, "Availability counter not increased after expiry");
        }

        info!(cancelled, "Expired booking cancellation run completed");
        Ok(cancelled)
    }

    /// Applies the cancellation effects to one expired booking.
    ///
    /// A missing payment is logged and skipped so one damaged row does not
    /// stall the whole sweep.
    async fn expire(&self, tx: &mut dyn StoreTransaction, booking: Booking) -> Result<()> {
        let booking_id = booking.id;
        let booking = tx
            .update_booking(&Booking {
                status: BookingStatus::Cancelled,
                expires_at: None,
                updated_at: self.clock.now(),
                ..booking
            })
            .await?;

        match tx.find_payment_for_booking(booking_id).await? {
            Some(mut payment) => {
                payment.status = PaymentStatus::Cancelled;
                tx.update_payment(&payment).await?;
            }
            None => warn!(%booking_id, "Payment record missing for expired booking"),
        }

        self.events
            .record(tx, booking.unit_id, UnitEventType::Cancelled, EXPIRED_DETAILS)
            .await?;
        Ok(())
    }

    fn affects_today(&self, dates: &DateRange) -> bool {
        dates.contains(self.clock.today())
    }

    /// Initializes an empty counter before the operation's transaction
    /// begins, so the adjustment made after commit is not counted twice.
    ///
    /// Runs outside the transaction: a baseline count taken while row locks
    /// are held would need a second pool connection.
    async fn prime_counter(&self) {
        if let Err(e) = self.availability.initialize_if_absent().await {
            warn!(error = %e, "Availability counter could not be initialized");
        }
    }
}
