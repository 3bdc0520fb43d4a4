//! Send-time preference filtering. Decides, per participant and
//! channel, whether a notification fires now — it never defers or
//! reschedules; suppressed sends are logged and counted as delivered.

use crate::model::*;

/// Minute from local midnight for a UTC instant and a fixed
/// business-zone offset.
pub fn minute_of_day(t: Ms, utc_offset_min: i32) -> u16 {
    let minutes = t.div_euclid(MINUTE_MS) + utc_offset_min as i64;
    minutes.rem_euclid(24 * 60) as u16
}

/// True when the channel is globally off, the category toggle is off,
/// or `minute` falls inside the user's quiet hours.
pub fn should_suppress(
    pref: &NotificationPreference,
    channel: Channel,
    category: EventCategory,
    minute: u16,
) -> bool {
    if !pref.channel_enabled(channel) {
        return true;
    }
    if !pref.categories.enabled(category) {
        return true;
    }
    if let Some(quiet) = pref.quiet_hours
        && quiet.contains(minute) {
            return true;
        }
    false
}
