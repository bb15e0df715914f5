// ==========================================
// Dental Lab Flow - Delivery Date Estimation
// ==========================================
// Urgent orders are promised in 3 business days, normal orders in 7.
// Weekends are skipped; holidays are out of scope for the core.
// ==========================================

use chrono::{Datelike, Duration, NaiveDate, Weekday};

/// Business days promised for an urgent order
pub const URGENT_BUSINESS_DAYS: u32 = 3;
/// Business days promised for a normal order
pub const NORMAL_BUSINESS_DAYS: u32 = 7;

fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// Add `days` business days to `from`, skipping Saturdays and Sundays.
/// The start date itself does not count.
pub fn add_business_days(from: NaiveDate, days: u32) -> NaiveDate {
    let mut date = from;
    let mut remaining = days;
    while remaining > 0 {
        date += Duration::days(1);
        if !is_weekend(date) {
            remaining -= 1;
        }
    }
    date
}

/// Estimated delivery for an order created on `start`
pub fn estimated_delivery(start: NaiveDate, urgent: bool) -> NaiveDate {
    estimated_delivery_with(start, urgent, URGENT_BUSINESS_DAYS, NORMAL_BUSINESS_DAYS)
}

/// Estimated delivery with configured lead days per urgency class
pub fn estimated_delivery_with(
    start: NaiveDate,
    urgent: bool,
    urgent_days: u32,
    normal_days: u32,
) -> NaiveDate {
    let days = if urgent { urgent_days } else { normal_days };
    add_business_days(start, days)
}
