//! Pure order lifecycle rules: the transition table, the revision
//! sub-machine, the working-day calendar and escrow amounts.
//!
//! Nothing here touches the database; `services::orders` re-checks the
//! same rules inside its compare-and-set updates.

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use rust_decimal::Decimal;

use crate::entities::sea_orm_active_enums::{OrderStatus, RevisionStatus};
use crate::error::EscrowError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderAction {
    Accept,
    Deliver,
    Dispute,
    Complete,
}

impl OrderAction {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Accept => "accept",
            Self::Deliver => "deliver",
            Self::Dispute => "dispute",
            Self::Complete => "complete",
        }
    }

    /// The only status the action may be applied from
    pub const fn required_status(&self) -> OrderStatus {
        match self {
            Self::Accept => OrderStatus::Pending,
            Self::Deliver => OrderStatus::Accepted,
            Self::Dispute | Self::Complete => OrderStatus::Delivered,
        }
    }

    pub const fn target_status(&self) -> OrderStatus {
        match self {
            Self::Accept => OrderStatus::Accepted,
            Self::Deliver => OrderStatus::Delivered,
            Self::Dispute => OrderStatus::Disputed,
            Self::Complete => OrderStatus::Approved,
        }
    }
}

/// Status after applying `action` to an order in `current`
pub fn transition(current: OrderStatus, action: OrderAction) -> Result<OrderStatus, EscrowError> {
    let allowed = matches!(
        (current, action),
        (OrderStatus::Pending, OrderAction::Accept)
            | (OrderStatus::Accepted, OrderAction::Deliver)
            | (OrderStatus::Delivered, OrderAction::Dispute)
            | (OrderStatus::Delivered, OrderAction::Complete)
    );

    if !allowed {
        return Err(EscrowError::conflict(format!(
            "cannot {} an order that is {}",
            action.as_str(),
            current.as_str()
        )));
    }
    Ok(action.target_status())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevisionAction {
    Request,
    Start,
    Complete,
}

impl RevisionAction {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Request => "request",
            Self::Start => "start",
            Self::Complete => "complete",
        }
    }

    pub const fn required_status(&self) -> RevisionStatus {
        match self {
            Self::Request => RevisionStatus::None,
            Self::Start => RevisionStatus::Requested,
            Self::Complete => RevisionStatus::InProgress,
        }
    }
}

/// Revision sub-state after `action`; only legal on a delivered order
pub fn revision_transition(
    order_status: OrderStatus,
    current: RevisionStatus,
    action: RevisionAction,
) -> Result<RevisionStatus, EscrowError> {
    if order_status != OrderStatus::Delivered {
        return Err(EscrowError::conflict(format!(
            "revisions need a delivered order, this one is {}",
            order_status.as_str()
        )));
    }

    match (current, action) {
        (RevisionStatus::None, RevisionAction::Request) => Ok(RevisionStatus::Requested),
        (RevisionStatus::Requested, RevisionAction::Start) => Ok(RevisionStatus::InProgress),
        (RevisionStatus::InProgress, RevisionAction::Complete) => Ok(RevisionStatus::Completed),
        _ => Err(EscrowError::conflict(format!(
            "cannot {} a revision that is {}",
            action.as_str(),
            current.as_str()
        ))),
    }
}

fn is_working_day(date: NaiveDate) -> bool {
    !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// Weekdays strictly after `from` up to and including `to`
pub fn working_days_between(from: NaiveDate, to: NaiveDate) -> u32 {
    let mut count = 0;
    let mut day = from;
    while day < to {
        day += Duration::days(1);
        if is_working_day(day) {
            count += 1;
        }
    }
    count
}

/// The date `days` working days after `from`
pub fn add_working_days(from: NaiveDate, days: u32) -> NaiveDate {
    let mut remaining = days;
    let mut day = from;
    while remaining > 0 {
        day += Duration::days(1);
        if is_working_day(day) {
            remaining -= 1;
        }
    }
    day
}

/// Whether a revision asked for on `today` is inside the window after delivery
pub fn within_revision_window(delivered: NaiveDate, today: NaiveDate, window_days: u32) -> bool {
    today >= delivered && working_days_between(delivered, today) <= window_days
}

/// Fee and escrow for an order: `(platform_fee, escrow_held)`
pub fn escrow_amounts(
    total_amount: Decimal,
    fee_rate: Decimal,
) -> Result<(Decimal, Decimal), EscrowError> {
    if total_amount <= Decimal::ZERO {
        return Err(EscrowError::validation("totalAmount must be a positive number"));
    }
    if fee_rate < Decimal::ZERO || fee_rate >= Decimal::ONE {
        return Err(EscrowError::validation("feeRate must be in [0, 1)"));
    }

    let platform_fee = (total_amount * fee_rate).round_dp(4);
    Ok((platform_fee, total_amount + platform_fee))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_happy_path_transitions() {
        assert_eq!(transition(OrderStatus::Pending, OrderAction::Accept).unwrap(), OrderStatus::Accepted);
        assert_eq!(transition(OrderStatus::Accepted, OrderAction::Deliver).unwrap(), OrderStatus::Delivered);
        assert_eq!(transition(OrderStatus::Delivered, OrderAction::Dispute).unwrap(), OrderStatus::Disputed);
        assert_eq!(transition(OrderStatus::Delivered, OrderAction::Complete).unwrap(), OrderStatus::Approved);
    }

    #[test]
    fn test_every_other_transition_is_a_conflict() {
        let statuses = [
            OrderStatus::Pending,
            OrderStatus::Accepted,
            OrderStatus::Delivered,
            OrderStatus::Disputed,
            OrderStatus::Approved,
        ];
        let actions = [
            OrderAction::Accept,
            OrderAction::Deliver,
            OrderAction::Dispute,
            OrderAction::Complete,
        ];

        for status in statuses {
            for action in actions {
                let result = transition(status, action);
                if status == action.required_status() {
                    assert!(result.is_ok(), "{:?} + {:?}", status, action);
                } else {
                    assert_eq!(result.unwrap_err().code(), "CONFLICT", "{:?} + {:?}", status, action);
                }
            }
        }
    }

    #[test]
    fn test_deliver_on_pending_is_conflict() {
        let err = transition(OrderStatus::Pending, OrderAction::Deliver).unwrap_err();
        assert!(matches!(err, EscrowError::Conflict(_)));
    }

    #[test]
    fn test_revision_sub_machine() {
        let d = OrderStatus::Delivered;
        assert_eq!(
            revision_transition(d, RevisionStatus::None, RevisionAction::Request).unwrap(),
            RevisionStatus::Requested
        );
        assert_eq!(
            revision_transition(d, RevisionStatus::Requested, RevisionAction::Start).unwrap(),
            RevisionStatus::InProgress
        );
        assert_eq!(
            revision_transition(d, RevisionStatus::InProgress, RevisionAction::Complete).unwrap(),
            RevisionStatus::Completed
        );
        assert!(revision_transition(d, RevisionStatus::Completed, RevisionAction::Request).is_err());
        assert!(revision_transition(d, RevisionStatus::None, RevisionAction::Complete).is_err());
        assert!(
            revision_transition(OrderStatus::Accepted, RevisionStatus::None, RevisionAction::Request)
                .is_err()
        );
    }

    #[test]
    fn test_working_days_skip_weekends() {
        // 2026-10-02 is a Friday
        let friday = date(2026, 10, 2);
        assert_eq!(working_days_between(friday, date(2026, 10, 4)), 0);
        assert_eq!(working_days_between(friday, date(2026, 10, 5)), 1);
        assert_eq!(working_days_between(friday, friday), 0);
        assert_eq!(add_working_days(friday, 1), date(2026, 10, 5));
        assert_eq!(add_working_days(friday, 5), date(2026, 10, 9));
    }

    #[test]
    fn test_revision_window_five_working_days() {
        // Delivered Monday 2026-10-05
        let delivered = date(2026, 10, 5);
        assert!(within_revision_window(delivered, date(2026, 10, 12), 5));
        assert!(!within_revision_window(delivered, date(2026, 10, 13), 5));
        // Weekend days do not count
        assert!(within_revision_window(delivered, date(2026, 10, 11), 5));
        assert!(within_revision_window(delivered, delivered, 5));
    }

    #[test]
    fn test_escrow_amounts() {
        assert_eq!(escrow_amounts(dec!(100), dec!(0.1)).unwrap(), (dec!(10), dec!(110)));
        assert_eq!(escrow_amounts(dec!(100), dec!(0)).unwrap(), (dec!(0), dec!(100)));
        assert!(escrow_amounts(dec!(0), dec!(0.1)).is_err());
        assert!(escrow_amounts(dec!(-5), dec!(0.1)).is_err());
        assert!(escrow_amounts(dec!(100), dec!(1)).is_err());
    }
}
